use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use schemegate::{GatewayConfig, InterruptFlag, ScriptGateway, Value};
use std::panic;
use std::process;
use std::thread;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() {
    // Respects RUST_LOG; logs go to stderr so they don't mix with results
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let result = panic::catch_unwind(run_repl);

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

fn run_repl() {
    println!("schemegate script console");
    println!("Enter S-expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = DefaultEditor::new().expect("Could not initialize REPL");
    let interrupts = InterruptFlag::new();
    spawn_ctrl_c_listener(interrupts.clone());
    let mut gateway =
        ScriptGateway::new(GatewayConfig::from_env()).with_debounced_interrupts(interrupts);

    loop {
        match rl.readline("schemegate> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help(&gateway);
                        continue;
                    }
                    ":env" => {
                        print_environment(&gateway);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                if let Some(level) = line.strip_prefix(":trace") {
                    match level.trim().parse::<u8>() {
                        Ok(level) => {
                            gateway.set_trace_verbosity(level);
                            println!("Trace verbosity set to {level}");
                        }
                        Err(_) => println!("Usage: :trace N (current: {})", gateway.trace_verbosity()),
                    }
                    continue;
                }

                let outcome = gateway.evaluate(line);
                if outcome.has_error() {
                    print!("{}", outcome.error);
                }
                if outcome.interrupted {
                    println!("(interrupted)");
                }
                println!("{}", outcome.output);
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }

    gateway.close();
}

/// Raise `flag` on every Ctrl+C so a running script stops at its next step
fn spawn_ctrl_c_listener(flag: InterruptFlag) {
    thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(error = %err, "no signal runtime, Ctrl+C will not interrupt scripts");
                return;
            }
        };

        runtime.block_on(async {
            while tokio::signal::ctrl_c().await.is_ok() {
                debug!("Ctrl+C received, interrupting evaluation");
                flag.raise();
            }
        });
    });
}

fn print_help(gateway: &ScriptGateway) {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show top-level definitions");
    println!("  :trace N   - Set step trace verbosity (0 disables)");
    println!("  :quit      - Exit the console");
    println!("  :exit      - Exit the console");
    println!("  Ctrl+C     - Interrupt a running script");
    println!();
    println!("Host primitives:");
    if let Some(doc) = gateway.engine().documentation("sleep") {
        println!("  {doc}");
    }
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (define square (lambda (x) (* x x)))");
    println!("  (square 12)");
    println!("  (if (> 5 3) \"yes\" \"no\")");
    println!();
}

fn print_environment(gateway: &ScriptGateway) {
    let bindings = gateway.engine().bindings();

    if bindings.is_empty() {
        println!("No definitions yet.");
        return;
    }

    println!("Definitions ({} total):", bindings.len());
    for (name, value) in bindings {
        match value {
            Value::Function { params, .. } => println!("  {name} = (lambda ({}))", params.join(" ")),
            _ => println!("  {name} = {value}"),
        }
    }
}
