//! Script execution gateway.
//!
//! [`ScriptGateway`] is what a host application talks to. It owns one
//! [`Engine`] with the `sleep` host primitive registered, evaluates command
//! strings synchronously, and keeps the output and error text of the most
//! recent call.
//!
//! Each call redirects the engine's error port to a capture port, evaluates
//! with the gateway's step hook attached (tracing plus interrupt polling),
//! renders the result, drains the captured diagnostics, and restores the
//! previous port. Engine errors never surface as Rust errors: they come back
//! as error text.

use std::thread;
use tracing::debug;

use crate::ast::Value;
use crate::builtinops::Arity;
use crate::config::GatewayConfig;
use crate::engine::Engine;
use crate::hooks::{StepContext, StepControl, StepHook};
use crate::interrupt::{Debounced, InterruptSource, NeverInterrupt};
use crate::trace::Tracer;

/// Result of one gateway evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvalOutcome {
    /// Display form of the value the command evaluated to
    pub output: String,
    /// Diagnostic text the engine wrote during the call; empty if none
    pub error: String,
    /// The call was stopped early by the interrupt source
    pub interrupted: bool,
}

impl EvalOutcome {
    /// Always true: the gateway reports engine errors as text, never as a
    /// failed call. Check [`EvalOutcome::has_error`] instead.
    pub fn is_success(&self) -> bool {
        true
    }

    pub fn has_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// Hook attached for the duration of one call
struct GatewayHook<'a> {
    tracer: &'a mut Tracer,
    interrupts: &'a mut dyn InterruptSource,
    interrupted: bool,
}

impl StepHook for GatewayHook<'_> {
    fn before_step(&mut self, step: &StepContext<'_>, control: &mut StepControl) {
        self.tracer.step_begin(step);
        if self.interrupts.poll() {
            debug!(depth = step.depth(), "interrupt requested, stopping evaluation");
            self.interrupted = true;
            control.request_stop();
        }
    }

    fn after_step(&mut self, step: &StepContext<'_>, result: &Value, _control: &mut StepControl) {
        self.tracer.step_end(step, result);
    }
}

pub struct ScriptGateway {
    engine: Engine,
    tracer: Tracer,
    interrupts: Box<dyn InterruptSource + Send>,
    config: GatewayConfig,
    last: EvalOutcome,
}

impl Default for ScriptGateway {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

impl ScriptGateway {
    /// Create the engine and register the `sleep` primitive
    pub fn new(config: GatewayConfig) -> Self {
        let mut engine = Engine::new();
        let interval = config.sleep_interval;
        engine.define_function("sleep", Arity::Exact(0), "(sleep) sleeps", move |_args| {
            thread::sleep(interval);
            Ok(Value::Bool(false))
        });

        debug!(?config, "script gateway initialized");
        ScriptGateway {
            engine,
            tracer: Tracer::new(config.trace_verbosity),
            interrupts: Box::new(NeverInterrupt),
            config,
            last: EvalOutcome::default(),
        }
    }

    /// Send trace lines somewhere other than stdout
    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }

    /// Interrupt source polled by [`ScriptGateway::evaluate`]
    pub fn with_interrupt_source(mut self, source: impl InterruptSource + Send + 'static) -> Self {
        self.interrupts = Box::new(source);
        self
    }

    /// Like [`ScriptGateway::with_interrupt_source`], ignoring repeats within
    /// the configured debounce window
    pub fn with_debounced_interrupts(self, source: impl InterruptSource + Send + 'static) -> Self {
        let window = self.config.interrupt_debounce;
        self.with_interrupt_source(Debounced::new(source, window))
    }

    /// Evaluate `command`, polling the gateway's own interrupt source
    pub fn evaluate(&mut self, command: &str) -> EvalOutcome {
        self.last = EvalOutcome::default();
        let outcome = run(
            &mut self.engine,
            &mut self.tracer,
            self.interrupts.as_mut(),
            command,
        );
        self.last = outcome.clone();
        outcome
    }

    /// Evaluate `command`, polling `interrupts` for this call only
    pub fn evaluate_with(
        &mut self,
        command: &str,
        interrupts: &mut dyn InterruptSource,
    ) -> EvalOutcome {
        self.last = EvalOutcome::default();
        let outcome = run(&mut self.engine, &mut self.tracer, interrupts, command);
        self.last = outcome.clone();
        outcome
    }

    /// Output of the most recent call
    pub fn output(&self) -> &str {
        &self.last.output
    }

    /// Error text of the most recent call
    pub fn error(&self) -> &str {
        &self.last.error
    }

    pub fn clear_output(&mut self) {
        self.last.output.clear();
    }

    pub fn clear_error(&mut self) {
        self.last.error.clear();
    }

    pub fn last_outcome(&self) -> &EvalOutcome {
        &self.last
    }

    pub fn trace_verbosity(&self) -> u8 {
        self.tracer.verbosity()
    }

    pub fn set_trace_verbosity(&mut self, verbosity: u8) {
        self.tracer.set_verbosity(verbosity);
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Shut the gateway down, dropping the engine
    pub fn close(self) {
        debug!("script gateway closed");
    }
}

#[tracing::instrument(level = "debug", skip_all, fields(input_len = command.len()))]
fn run(
    engine: &mut Engine,
    tracer: &mut Tracer,
    interrupts: &mut dyn InterruptSource,
    command: &str,
) -> EvalOutcome {
    let mut hook = GatewayHook {
        tracer,
        interrupts,
        interrupted: false,
    };

    let mut capture = engine.capture_errors();
    let value = capture.eval_string_with_hook(command, &mut hook);
    let error = capture.finish();

    if !error.is_empty() {
        debug!(error = error.trim_end(), "captured engine error");
    }

    EvalOutcome {
        output: value.to_string(),
        error,
        interrupted: hook.interrupted,
    }
}
