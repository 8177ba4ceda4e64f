use crate::{command_spec_to_vec, hook_timeout, run_command_with_timeout, HookSpec, StartupError};

const DEFAULT_VERIFY_TIMEOUT_MS: u64 = 60_000;

/// Identity check run once before the greeting.
pub(crate) trait Verifier: Send {
    fn verify(&self) -> Result<(), StartupError>;
}

pub(crate) struct SkipVerifier;

impl Verifier for SkipVerifier {
    fn verify(&self) -> Result<(), StartupError> {
        tracing::warn!("identity verification is not configured; skipping");
        Ok(())
    }
}

/// Exit status 0 means verified. Stdout, if any, is logged as the reason.
pub(crate) struct CommandVerifier {
    command: Vec<String>,
    timeout_ms: u64,
}

impl CommandVerifier {
    pub(crate) fn new(hook: &HookSpec) -> Self {
        Self {
            command: command_spec_to_vec(&hook.command),
            timeout_ms: hook_timeout(hook, DEFAULT_VERIFY_TIMEOUT_MS),
        }
    }
}

impl Verifier for CommandVerifier {
    fn verify(&self) -> Result<(), StartupError> {
        let output = run_command_with_timeout(&self.command, None, self.timeout_ms, "verify")
            .map_err(StartupError::Verification)?;
        if output.success {
            tracing::info!("identity verified");
            return Ok(());
        }
        let reason = [output.stdout.as_str(), output.stderr.as_str()]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| match output.code {
                Some(code) => format!("verifier exited with code {code}"),
                None => "verifier terminated by signal".to_string(),
            });
        Err(StartupError::Verification(reason))
    }
}

pub(crate) fn build_verifier(hook: Option<&HookSpec>, skip: bool) -> Box<dyn Verifier> {
    match hook {
        Some(hook) if !skip => Box::new(CommandVerifier::new(hook)),
        _ => Box::new(SkipVerifier),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommandSpec;

    #[test]
    fn missing_or_skipped_verifier_passes() {
        assert!(build_verifier(None, false).verify().is_ok());
        let hook = HookSpec::new(CommandSpec::String("exit 1".into()));
        assert!(build_verifier(Some(&hook), true).verify().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn command_exit_status_decides() {
        let ok = HookSpec::new(CommandSpec::String("exit 0".into()));
        assert!(build_verifier(Some(&ok), false).verify().is_ok());

        let denied = HookSpec::new(CommandSpec::String(
            "echo 'face not recognized'; exit 3".into(),
        ));
        match build_verifier(Some(&denied), false).verify() {
            Err(StartupError::Verification(reason)) => assert_eq!(reason, "face not recognized"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
