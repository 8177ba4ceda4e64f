use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use serde::Deserialize;

use crate::config_file::SpeechConfig;
use crate::{
    command_spec_is, command_spec_to_argv, command_spec_to_vec, run_command_with_timeout,
    run_hook_command, substitute_args, CommandSpec, SpeechError,
};

const SPEAK_TIMEOUT_MS: u64 = 120_000;
const LISTEN_GRACE_MS: u64 = 10_000;

/// What one listen cycle produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Heard {
    Utterance(String),
    /// Nothing said before the timeout; re-listen.
    NoInput,
    /// The input source is closed for good.
    EndOfInput,
}

pub(crate) trait SpeechInput: Send {
    fn next_utterance(&mut self, timeout: Duration) -> Result<Heard, SpeechError>;

    fn name(&self) -> &str;
}

pub(crate) trait SpeechOutput: Send + Sync {
    /// Fire-and-forget; failures are logged, never raised.
    fn speak(&self, text: &str);

    fn name(&self) -> &str;
}

// === Console ===

/// Reads lines on a background thread so listening can time out.
pub(crate) struct ConsoleInput {
    lines: Receiver<Option<String>>,
}

impl ConsoleInput {
    pub(crate) fn stdin() -> Self {
        Self::from_reader(io::BufReader::new(io::stdin()))
    }

    pub(crate) fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(Some(line)).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%err, "console input read failed");
                        break;
                    }
                }
            }
            let _ = tx.send(None);
        });
        Self { lines: rx }
    }
}

impl SpeechInput for ConsoleInput {
    fn next_utterance(&mut self, timeout: Duration) -> Result<Heard, SpeechError> {
        match self.lines.recv_timeout(timeout) {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    Ok(Heard::NoInput)
                } else {
                    Ok(Heard::Utterance(line.to_string()))
                }
            }
            Ok(None) | Err(RecvTimeoutError::Disconnected) => Ok(Heard::EndOfInput),
            Err(RecvTimeoutError::Timeout) => Ok(Heard::NoInput),
        }
    }

    fn name(&self) -> &str {
        "console"
    }
}

pub(crate) struct ConsoleOutput {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleOutput {
    pub(crate) fn stdout() -> Self {
        Self::to_writer(Box::new(io::stdout()))
    }

    pub(crate) fn to_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(writer),
        }
    }
}

impl SpeechOutput for ConsoleOutput {
    fn speak(&self, text: &str) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(err) = writeln!(out, "Friday: {text}").and_then(|_| out.flush()) {
            tracing::warn!(%err, "console output failed");
        }
    }

    fn name(&self) -> &str {
        "console"
    }
}

// === Command hooks ===

#[derive(Debug, Deserialize)]
struct SttHookOutput {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// Speech-to-text through an external program speaking JSON on stdin/stdout.
pub(crate) struct SttCommand {
    command: Vec<String>,
    language: String,
}

impl SttCommand {
    pub(crate) fn new(spec: &CommandSpec, language: &str) -> Self {
        Self {
            command: command_spec_to_vec(spec),
            language: language.to_string(),
        }
    }
}

impl SpeechInput for SttCommand {
    fn next_utterance(&mut self, timeout: Duration) -> Result<Heard, SpeechError> {
        let timeout_ms = timeout.as_millis() as u64;
        let input = serde_json::json!({
            "timeout_ms": timeout_ms,
            "language": self.language,
        });
        let raw = run_hook_command(&self.command, &input, timeout_ms + LISTEN_GRACE_MS, "stt")
            .map_err(SpeechError::Unavailable)?;
        let output: SttHookOutput = serde_json::from_str(&raw)
            .map_err(|e| SpeechError::Unavailable(format!("stt output: {e}")))?;
        match output.status.as_deref() {
            Some("no_input") | Some("timeout") => return Ok(Heard::NoInput),
            Some("unrecognized") => return Err(SpeechError::Unrecognized),
            Some("closed") | Some("eof") => return Ok(Heard::EndOfInput),
            _ => {}
        }
        match output.text.map(|t| t.trim().to_string()) {
            Some(text) if !text.is_empty() => Ok(Heard::Utterance(text)),
            _ => Ok(Heard::NoInput),
        }
    }

    fn name(&self) -> &str {
        "command"
    }
}

/// Text-to-speech through an external program; `{text}` is substituted,
/// otherwise the text is written to stdin.
pub(crate) struct TtsCommand {
    argv: Vec<String>,
}

impl TtsCommand {
    pub(crate) fn new(spec: &CommandSpec) -> Result<Self, String> {
        let argv = command_spec_to_argv(spec)?;
        if argv.is_empty() {
            return Err("speech output command is empty".to_string());
        }
        Ok(Self { argv })
    }
}

impl SpeechOutput for TtsCommand {
    fn speak(&self, text: &str) {
        let (argv, substituted) = substitute_args(&self.argv, "text", text);
        let stdin = if substituted { None } else { Some(text.as_bytes()) };
        match run_command_with_timeout(&argv, stdin, SPEAK_TIMEOUT_MS, "tts") {
            Ok(output) if output.success => {}
            Ok(output) => {
                tracing::warn!(code = ?output.code, stderr = %output.stderr, "tts command failed")
            }
            Err(err) => tracing::warn!(%err, "tts command failed"),
        }
    }

    fn name(&self) -> &str {
        "command"
    }
}

pub(crate) fn create_speech_input(cfg: &SpeechConfig) -> Box<dyn SpeechInput> {
    if command_spec_is(&cfg.input, "console") {
        return Box::new(ConsoleInput::stdin());
    }
    Box::new(SttCommand::new(&cfg.input, &cfg.language))
}

pub(crate) fn create_speech_output(cfg: &SpeechConfig) -> Result<Box<dyn SpeechOutput>, String> {
    if command_spec_is(&cfg.output, "console") {
        return Ok(Box::new(ConsoleOutput::stdout()));
    }
    Ok(Box::new(TtsCommand::new(&cfg.output)?))
}
