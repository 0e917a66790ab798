//! Demo host: runs a simulated rule program under the debug server.
//!
//! Main thread (thread 0) is suspended at its first call until a client resumes it. Workers then
//! fire the rules of `rules.clp` and the main thread finally calls `exit`, which ends the session.

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use ruledbg::config::DebugConfig;
use ruledbg::debugger::{DebugController, Error};
use ruledbg::server;
use ruledbg::sim::{Function, SimEngine};
use std::sync::Arc;
use std::thread;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a config file, `~/.config/ruledbg/config.toml` by default
    #[clap(long)]
    config: Option<String>,

    /// Command channel port, overrides config
    #[clap(long, env = "RULEDBG_COMMAND_PORT")]
    command_port: Option<u16>,

    /// Event channel port, overrides config
    #[clap(long, env = "RULEDBG_EVENT_PORT")]
    event_port: Option<u16>,

    /// Number of worker threads
    #[clap(long, default_value_t = 2)]
    workers: u32,

    /// How many times each worker fires the rules
    #[clap(long, default_value_t = 3)]
    rounds: u32,
}

const RULES_FILE: &str = "rules.clp";

/// One firing of the `greet` rule followed by the `score` rule.
fn rules(worker: u32, round: u32) -> Function {
    let name = format!("person-{worker}");
    let age = (20 + worker * 5 + round).to_string();

    let greet = Function::new("greet", RULES_FILE, 3)
        .bind("?name", &name)
        .bind("?age", &age)
        .calls(Function::new("printout", RULES_FILE, 4).bind("?name", &name))
        .calls(Function::new("assert", RULES_FILE, 5));
    let score = Function::new("score", RULES_FILE, 8)
        .bind("?age", &age)
        .bind("?round", round.to_string())
        .calls(Function::new("modify", RULES_FILE, 9));

    Function::new("run", RULES_FILE, 1).calls(greet).calls(score)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = DebugConfig::from_file(args.config.as_deref()).unwrap_or_default();
    if let Some(port) = args.command_port {
        config.command_port = port;
    }
    if let Some(port) = args.event_port {
        config.event_port = port;
    }

    let engine = Arc::new(SimEngine::new());
    for worker in 0..args.workers {
        let name = format!("person-{worker}");
        let id = engine.assert_fact("person", &[("name", name.as_str()), ("age", "20")]);
        engine.add_activation(SimEngine::MAIN_MODULE, &format!("greet: f-{id}"));
    }
    engine.add_activation("SCORING", "score: f-1");
    engine.select_activation(Some("greet: f-1"));

    // main thread becomes thread 0
    let controller = Arc::new(DebugController::new(engine.clone(), config.clone()));
    let dispatcher = server::serve(controller.clone(), &config).context("start debug server")?;
    engine.set_listener(controller.clone());

    if let Err(e) = engine.invoke(&Function::new("reset", RULES_FILE, 1), None) {
        warn!(target: "debugger", "reset: {e}");
    }

    let workers = (0..args.workers)
        .map(|worker| {
            let engine = engine.clone();
            let rounds = args.rounds;
            thread::Builder::new()
                .name(format!("worker-{worker}"))
                .spawn(move || {
                    for round in 0..rounds {
                        match engine.invoke(&rules(worker, round), None) {
                            Ok(()) => {}
                            Err(Error::SessionTerminated) => break,
                            Err(e) => {
                                warn!(target: "debugger", "worker {worker}: {e}");
                                break;
                            }
                        }
                    }
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    for worker in workers {
        if worker.join().is_err() {
            warn!(target: "debugger", "worker panicked");
        }
    }

    info!(target: "debugger", "all rules fired");
    if let Err(e) = engine.invoke(&Function::builtin(&config.exit_function), None) {
        info!(target: "debugger", "exit: {e}");
    }

    dispatcher
        .join()
        .map_err(|_| anyhow::anyhow!("dispatcher panicked"))
}
