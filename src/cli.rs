use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "friday")]
#[command(
    about = "Voice assistant with a local command table and a tool-calling model",
    long_about = None
)]
#[command(version)]
pub(crate) struct Cli {
    /// Config file (default: $FRIDAY_CONFIG or ./friday.json)
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the assistant: verify, greet, then listen until "friday sleep".
    Run {
        /// Read utterances from stdin and print replies, ignoring configured speech hooks.
        #[arg(long)]
        typed: bool,
        /// Skip identity verification even if a verifier is configured.
        #[arg(long)]
        skip_verify: bool,
    },

    /// Route a single utterance and print the outcome.
    Route {
        #[arg(required = true, num_args = 1..)]
        utterance: Vec<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },

    /// Invoke one capability directly through the executor.
    Exec {
        capability: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// List the capability catalog.
    Tools {
        /// Output the wire schema as JSON
        #[arg(long)]
        json: bool,
    },

    /// Model-hook adapters (JSON ModelRequest on stdin, ModelResponse on stdout).
    Hook {
        #[command(subcommand)]
        provider: HookCommand,
    },

    /// Print recent transcript entries.
    History {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
        /// Output JSONL
        #[arg(long)]
        json: bool,
    },

    /// Write a config file populated with defaults.
    InitConfig {
        /// Destination (defaults to the resolved config path)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub(crate) enum HookCommand {
    Gemini,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_route_with_global_config() {
        let cli = Cli::try_parse_from([
            "friday", "route", "friday", "what", "time", "--config", "alt.json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("alt.json")));
        match cli.command {
            Command::Route { utterance, json } => {
                assert_eq!(utterance.join(" "), "friday what time");
                assert!(!json);
            }
            _ => panic!("expected route"),
        }
    }

    #[test]
    fn run_flags() {
        let cli = Cli::try_parse_from(["friday", "run", "--typed", "--skip-verify"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Run {
                typed: true,
                skip_verify: true
            }
        ));
    }
}
