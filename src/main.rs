// Module declarations
mod agent_log;
mod assistant;
mod cli;
mod config;
mod config_file;
mod error;
mod gemini;
mod local;
mod math;
mod memory;
mod router;
mod services;
mod session;
mod speech;
mod tool_args;
mod tool_defs;
mod tool_exec;
mod triggers;
mod types;
mod util;
mod verify;

// Crate-root re-exports so modules can refer to each other as `crate::Item`.
#[allow(unused_imports)]
pub(crate) use agent_log::*;
#[allow(unused_imports)]
pub(crate) use assistant::*;
#[allow(unused_imports)]
pub(crate) use cli::*;
#[allow(unused_imports)]
pub(crate) use config::*;
#[allow(unused_imports)]
pub(crate) use error::*;
#[allow(unused_imports)]
pub(crate) use gemini::*;
#[allow(unused_imports)]
pub(crate) use router::*;
#[allow(unused_imports)]
pub(crate) use services::build_http_agent;
#[allow(unused_imports)]
pub(crate) use session::*;
#[allow(unused_imports)]
pub(crate) use speech::*;
#[allow(unused_imports)]
pub(crate) use tool_defs::*;
#[allow(unused_imports)]
pub(crate) use tool_exec::*;
#[allow(unused_imports)]
pub(crate) use triggers::*;
#[allow(unused_imports)]
pub(crate) use types::*;
#[allow(unused_imports)]
pub(crate) use util::*;
#[allow(unused_imports)]
pub(crate) use verify::*;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::DateTime;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config_file::{load_file_config, resolve_config_path, save_file_config, FileConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.clone());

    match cli.command {
        Command::Run { typed, skip_verify } => {
            let config = load_file_config(&config_path)?.with_env_secrets();
            let (input, output): (Box<dyn SpeechInput>, Box<dyn SpeechOutput>) = if typed {
                (
                    Box::new(ConsoleInput::stdin()),
                    Box::new(ConsoleOutput::stdout()),
                )
            } else {
                (
                    create_speech_input(&config.speech),
                    create_speech_output(&config.speech)?,
                )
            };
            tracing::info!(
                input = input.name(),
                output = output.name(),
                config = %config_path.display(),
                "starting session"
            );
            let verifier = build_verifier(config.verify.as_ref(), skip_verify);
            let session_loop = SessionLoop::new(
                config,
                input,
                output,
                verifier,
                Box::new(|cfg: &FileConfig| build_reasoning_service(&cfg.model)),
            );
            let summary = spawn_worker(session_loop)?.join()?;
            if let Some(err) = summary.startup_error {
                eprintln!("{err}");
                std::process::exit(1);
            }
            Ok(())
        }

        Command::Route { utterance, json } => {
            let config = load_file_config(&config_path)?.with_env_secrets();
            let service = build_reasoning_service(&config.model).unwrap_or_else(|err| {
                tracing::warn!(%err, "reasoning service unavailable; local commands only");
                Box::new(UnavailableService(err.to_string())) as Box<dyn ReasoningService>
            });
            let running = Arc::new(AtomicBool::new(true));
            let mut assistant = Assistant::assemble(&config, running, service);
            let utterance = utterance.join(" ");
            let outcome = assistant.handle(&utterance);
            if json {
                let payload = serde_json::json!({
                    "utterance": utterance,
                    "route": outcome.label(),
                    "reply": outcome.speech(),
                    "quota_used": assistant.session.quota_used(),
                    "turns": assistant.session.turns().len(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                match outcome.speech() {
                    Some(reply) => println!("[{}] {reply}", outcome.label()),
                    None => println!("[ignored] no activation word"),
                }
            }
            Ok(())
        }

        Command::Exec { capability, args } => {
            let config = load_file_config(&config_path)?.with_env_secrets();
            let value: serde_json::Value = serde_json::from_str(&args)?;
            let Some(arguments) = value.as_object().cloned() else {
                eprintln!("--args must be a JSON object");
                std::process::exit(2);
            };
            let running = Arc::new(AtomicBool::new(true));
            let executor =
                CapabilityExecutor::new(CapabilityContext::from_config(&config, running));
            match executor.execute(&capability, arguments) {
                InvocationResult::Success(text) => {
                    println!("{text}");
                    Ok(())
                }
                InvocationResult::Failure(err) => {
                    println!("{}", err.apology());
                    eprintln!("{err}");
                    std::process::exit(1);
                }
            }
        }

        Command::Tools { json } => {
            let registry = capability_registry();
            if json {
                let schemas = capability_schemas(&registry);
                println!("{}", serde_json::to_string_pretty(&schemas)?);
                return Ok(());
            }
            for cap in &registry {
                let params: Vec<String> = cap
                    .parameters
                    .iter()
                    .map(|p| {
                        if p.required {
                            p.name.to_string()
                        } else {
                            format!("{}?", p.name)
                        }
                    })
                    .collect();
                println!("{}({}) - {}", cap.name, params.join(", "), cap.description);
            }
            println!();
            println!(
                "Local triggers: {}",
                TriggerTable::with_defaults().prefixes().join(", ")
            );
            Ok(())
        }

        Command::Hook { provider } => match provider {
            HookCommand::Gemini => {
                let config = load_file_config(&config_path)?.with_env_secrets();
                run_gemini_hook(&config.model)
            }
        },

        Command::History { limit, json } => {
            let config = load_file_config(&config_path)?;
            let entries = load_recent_transcript(&config.log.dir, limit);
            if entries.is_empty() {
                eprintln!("No transcript entries in {}", config.log.dir.display());
                return Ok(());
            }
            for entry in &entries {
                if json {
                    println!("{}", serde_json::to_string(entry)?);
                    continue;
                }
                let when = DateTime::from_timestamp(entry.ts_utc, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| entry.ts_utc.to_string());
                match &entry.reply {
                    Some(reply) => println!(
                        "{when} [{}] {} -> {reply}",
                        entry.route, entry.utterance
                    ),
                    None => println!("{when} [{}] {}", entry.route, entry.utterance),
                }
            }
            Ok(())
        }

        Command::InitConfig { path, force } => {
            let path = path.unwrap_or(config_path);
            if path.exists() && !force {
                eprintln!(
                    "Refusing to overwrite existing file: {} (use --force)",
                    path.display()
                );
                std::process::exit(2);
            }
            save_file_config(&path, &FileConfig::default())?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}
