use std::io::{Read, Write};
use std::process::Stdio;
use std::thread;
use std::time::{Duration, Instant};

use super::{build_external_command, CommandSpec, HookSpec};

pub(crate) const NO_DEADLINE_TIMEOUT_MS: u64 = u64::MAX;
const HOOK_STREAM_CAP_BYTES: usize = 256 * 1024;
const HOOK_STREAM_READ_SLEEP_MS: u64 = 10;

/// Shell form for strings, verbatim argv for arrays.
pub(crate) fn command_spec_to_vec(spec: &CommandSpec) -> Vec<String> {
    match spec {
        CommandSpec::Array(items) => items.clone(),
        CommandSpec::String(cmd) => {
            if cfg!(windows) {
                vec!["cmd".to_string(), "/C".to_string(), cmd.clone()]
            } else {
                vec!["sh".to_string(), "-c".to_string(), cmd.clone()]
            }
        }
    }
}

/// Word-split a command so extra arguments can be appended or substituted.
pub(crate) fn command_spec_to_argv(spec: &CommandSpec) -> Result<Vec<String>, String> {
    match spec {
        CommandSpec::Array(items) => Ok(items.clone()),
        CommandSpec::String(cmd) => {
            shlex::split(cmd).ok_or_else(|| format!("could not parse command: {cmd}"))
        }
    }
}

/// True when the command names one of the in-process backends (`console`, `builtin:*`).
pub(crate) fn command_spec_is(spec: &CommandSpec, keyword: &str) -> bool {
    match spec {
        CommandSpec::String(s) => s.trim().eq_ignore_ascii_case(keyword),
        CommandSpec::Array(items) => {
            items.len() == 1 && items[0].trim().eq_ignore_ascii_case(keyword)
        }
    }
}

/// Replace `{key}` placeholders in every argv entry.
pub(crate) fn substitute_args(argv: &[String], key: &str, value: &str) -> (Vec<String>, bool) {
    let needle = format!("{{{key}}}");
    let mut found = false;
    let out = argv
        .iter()
        .map(|arg| {
            if arg.contains(&needle) {
                found = true;
                arg.replace(&needle, value)
            } else {
                arg.clone()
            }
        })
        .collect();
    (out, found)
}

#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub(crate) success: bool,
    pub(crate) code: Option<i32>,
    pub(crate) stdout: String,
    pub(crate) stdout_truncated: bool,
    pub(crate) stderr: String,
}

fn spawn_capture<R: Read + Send + 'static>(reader: R) -> thread::JoinHandle<(Vec<u8>, bool)> {
    thread::spawn(move || {
        let mut captured: Vec<u8> = Vec::new();
        let mut truncated = false;
        let mut buffer = [0_u8; 4096];
        let mut reader = reader;
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    let remaining = HOOK_STREAM_CAP_BYTES.saturating_sub(captured.len());
                    if remaining > 0 {
                        let take = remaining.min(n);
                        captured.extend_from_slice(&buffer[..take]);
                        if n > take {
                            truncated = true;
                        }
                    } else {
                        truncated = true;
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        (captured, truncated)
    })
}

/// Run a command to completion, feeding `stdin` and capturing both streams.
pub(crate) fn run_command_with_timeout(
    command: &[String],
    stdin: Option<&[u8]>,
    timeout_ms: u64,
    kind: &str,
) -> Result<CommandOutput, String> {
    if command.is_empty() {
        return Err(format!("{kind} command is empty"));
    }
    let mut cmd = build_external_command(&command[0], &command[1..]);
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .env("FRIDAY_HOOK", kind);

    let mut child = cmd.spawn().map_err(|e| format!("spawn failed: {e}"))?;
    if let (Some(mut pipe), Some(payload)) = (child.stdin.take(), stdin) {
        pipe.write_all(payload)
            .and_then(|_| pipe.flush())
            .map_err(|e| format!("write stdin: {e}"))?;
    }

    let effective_timeout_ms = timeout_ms.max(1);
    let timeout = if timeout_ms == NO_DEADLINE_TIMEOUT_MS {
        None
    } else {
        Some(Duration::from_millis(effective_timeout_ms))
    };
    let start = Instant::now();
    let mut stdout_handle = child.stdout.take().map(spawn_capture);
    let mut stderr_handle = child.stderr.take().map(spawn_capture);

    let mut timed_out = false;
    let status = loop {
        if let Some(timeout) = timeout {
            if start.elapsed() >= timeout {
                timed_out = true;
                let _ = child.kill();
                break child.wait().map_err(|e| format!("{kind} wait failed: {e}"));
            }
        }

        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) => {
                thread::sleep(Duration::from_millis(HOOK_STREAM_READ_SLEEP_MS));
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                break Err(format!("{kind} wait failed: {e}"));
            }
        }
    };

    let collect =
        |handle: &mut Option<thread::JoinHandle<(Vec<u8>, bool)>>| -> (Vec<u8>, bool) {
            handle
                .take()
                .and_then(|join| join.join().ok())
                .unwrap_or_else(|| (Vec::new(), false))
        };
    let (stdout, stdout_truncated) = collect(&mut stdout_handle);
    let (stderr, stderr_truncated) = collect(&mut stderr_handle);

    if timed_out {
        return Err(format!("{kind} timed out after {effective_timeout_ms}ms"));
    }

    let status = status?;
    let mut stderr = String::from_utf8_lossy(&stderr).trim().to_string();
    if stderr_truncated {
        stderr.push_str(" (stderr output truncated)");
    }
    Ok(CommandOutput {
        success: status.success(),
        code: status.code(),
        stdout: String::from_utf8_lossy(&stdout).trim().to_string(),
        stdout_truncated,
        stderr,
    })
}

/// JSON in on stdin, non-empty JSON text expected back on stdout.
pub(crate) fn run_hook_command(
    command: &[String],
    input: &serde_json::Value,
    timeout_ms: u64,
    kind: &str,
) -> Result<String, String> {
    let payload = serde_json::to_vec(input).map_err(|e| format!("encode input: {e}"))?;
    let output = run_command_with_timeout(command, Some(&payload), timeout_ms, kind)?;
    if !output.success {
        if output.stderr.is_empty() {
            return Err(format!("hook '{kind}' exited with error"));
        }
        return Err(format!("hook error: {}", output.stderr));
    }
    if output.stdout_truncated {
        return Err(format!("hook '{kind}' output exceeded capture limit"));
    }
    if output.stdout.is_empty() {
        return Err(format!("hook '{kind}' returned empty output"));
    }
    Ok(output.stdout)
}

/// Run a fire-and-forget style action command and fail on non-zero exit.
pub(crate) fn run_action_command(
    argv: &[String],
    timeout_ms: u64,
    kind: &str,
) -> Result<(), String> {
    let output = run_command_with_timeout(argv, None, timeout_ms, kind)?;
    if output.success {
        return Ok(());
    }
    let detail = if output.stderr.is_empty() {
        match output.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        }
    } else {
        output.stderr
    };
    Err(format!("{kind} failed: {detail}"))
}

pub(crate) fn hook_timeout(hook: &HookSpec, default_ms: u64) -> u64 {
    hook.timeout_ms.unwrap_or(default_ms)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        command_spec_to_vec(&CommandSpec::String(script.to_string()))
    }

    #[test]
    fn hook_echoes_stdin() {
        let out =
            run_hook_command(&sh("cat"), &serde_json::json!({"a": 1}), 5_000, "test").unwrap();
        assert_eq!(out, r#"{"a":1}"#);
    }

    #[test]
    fn hook_empty_output_is_error() {
        let err = run_hook_command(&sh("cat >/dev/null"), &serde_json::json!({}), 5_000, "test")
            .unwrap_err();
        assert!(err.contains("empty output"));
    }

    #[test]
    fn hook_failure_surfaces_stderr() {
        let script = "echo boom >&2; exit 3";
        let err =
            run_hook_command(&sh(script), &serde_json::json!({}), 5_000, "test").unwrap_err();
        assert!(err.contains("boom"));
    }

    #[test]
    fn oversized_hook_output_is_reported() {
        let script = "cat >/dev/null; yes a | head -c 300000";
        let err =
            run_hook_command(&sh(script), &serde_json::json!({}), 5_000, "model").unwrap_err();
        assert!(err.contains("exceeded capture limit"), "{err}");
    }

    #[test]
    fn hook_timeout_is_reported() {
        let err =
            run_hook_command(&sh("sleep 5"), &serde_json::json!({}), 100, "slow").unwrap_err();
        assert!(err.contains("timed out"));
    }

    #[test]
    fn action_command_reports_exit_code() {
        let err = run_action_command(&sh("exit 2"), 5_000, "volume").unwrap_err();
        assert!(err.contains("exit code 2"));
    }

    #[test]
    fn argv_split_and_substitute() {
        let spec = CommandSpec::String("espeak -v en '{text}'".into());
        let argv = command_spec_to_argv(&spec).unwrap();
        assert_eq!(argv, vec!["espeak", "-v", "en", "{text}"]);
        let (out, found) = substitute_args(&argv, "text", "hello there");
        assert!(found);
        assert_eq!(out[3], "hello there");
    }

    #[test]
    fn keyword_specs() {
        assert!(command_spec_is(&CommandSpec::String(" Console ".into()), "console"));
        assert!(command_spec_is(
            &CommandSpec::Array(vec!["builtin:gemini".into()]),
            "builtin:gemini"
        ));
        assert!(!command_spec_is(&CommandSpec::String("espeak".into()), "console"));
    }
}
