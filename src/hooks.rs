//! Step hooks: callbacks the evaluator invokes around every evaluation step.
//!
//! A hook receives a [`StepContext`] describing the step and a [`StepControl`]
//! through which it can ask the evaluator to stop. Hooks are passed into a
//! single evaluation (see [`crate::Engine::eval_string_with_hook`]) and are
//! detached when it returns.

use crate::ast::Value;
use crate::evaluator::Environment;

/// Read-only view of the evaluator at one step
pub struct StepContext<'a> {
    depth: usize,
    caller: Option<&'a str>,
    code: &'a Value,
    env: &'a Environment,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        depth: usize,
        caller: Option<&'a str>,
        code: &'a Value,
        env: &'a Environment,
    ) -> Self {
        StepContext {
            depth,
            caller,
            code,
            env,
        }
    }

    /// Nesting depth of this step; the top-level expression is at depth 0
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Name of the innermost named function being applied, if any
    pub fn caller(&self) -> Option<&'a str> {
        self.caller
    }

    /// Expression evaluated by this step
    pub fn code(&self) -> &'a Value {
        self.code
    }

    pub fn environment(&self) -> &'a Environment {
        self.env
    }

    /// Bindings of the innermost environment frame as a list of `(name value)`
    pub fn environment_list(&self) -> Value {
        self.env.frame_to_list()
    }
}

/// Stop capability handed to hooks
#[derive(Debug, Default)]
pub struct StepControl {
    stop: bool,
}

impl StepControl {
    /// Ask the evaluator to stop at this step boundary
    pub fn request_stop(&mut self) {
        self.stop = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.stop
    }
}

pub trait StepHook {
    /// Called before the step's expression is evaluated
    fn before_step(&mut self, step: &StepContext<'_>, control: &mut StepControl);

    /// Called with the step's result after it evaluated successfully
    fn after_step(&mut self, step: &StepContext<'_>, result: &Value, control: &mut StepControl) {
        let _ = (step, result, control);
    }
}
