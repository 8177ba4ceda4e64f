use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::{
    collapse_whitespace, normalize_utterance, CapabilityExecutor, RouterOutcome,
    ToolCallingSession, TriggerTable, GENERIC_APOLOGY,
};

/// Activation gate, then the local fast path, then the reasoning service.
pub(crate) struct HybridRouter {
    activation_word: String,
    triggers: TriggerTable,
}

impl HybridRouter {
    pub(crate) fn new(activation_word: &str, triggers: TriggerTable) -> Self {
        Self {
            activation_word: activation_word.trim().to_lowercase(),
            triggers,
        }
    }

    /// `None` when the utterance does not address the assistant.
    pub(crate) fn clean_query(&self, utterance: &str) -> Option<String> {
        let folded = normalize_utterance(utterance);
        if self.activation_word.is_empty() || !folded.contains(&self.activation_word) {
            return None;
        }
        let stripped = collapse_whitespace(&folded.replace(&self.activation_word, " "));
        Some(
            stripped
                .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
                .to_string(),
        )
    }

    pub(crate) fn route(
        &self,
        utterance: &str,
        executor: &CapabilityExecutor,
        session: &mut ToolCallingSession,
    ) -> RouterOutcome {
        let Some(query) = self.clean_query(utterance) else {
            tracing::trace!("no activation word; ignoring");
            return RouterOutcome::Ignored;
        };

        if let Some(entry) = self.triggers.find(&query) {
            tracing::info!(trigger = %entry.prefix, "local trigger matched");
            let reply = catch_unwind(AssertUnwindSafe(|| entry.handle(&query, executor)))
                .unwrap_or_else(|_| {
                    tracing::error!(trigger = %entry.prefix, "trigger handler panicked");
                    GENERIC_APOLOGY.to_string()
                });
            return RouterOutcome::LocalReply(reply);
        }

        tracing::info!("no local trigger; escalating to reasoning service");
        RouterOutcome::RemoteReply(session.send(utterance, executor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::ScriptedService;
    use crate::{test_executor, ModelMessage};
    use std::sync::atomic::Ordering;

    fn router() -> HybridRouter {
        HybridRouter::new("friday", TriggerTable::with_defaults())
    }

    #[test]
    fn utterance_without_activation_word_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let exec = test_executor(dir.path());
        let service = ScriptedService::new(vec![]);
        let calls = service.calls();
        let mut session = ToolCallingSession::new(Box::new(service), exec.schemas(), "sys", 8);
        let outcome = router().route("what is the time", &exec, &mut session);
        assert_eq!(outcome, RouterOutcome::Ignored);
        assert_eq!(calls.lock().unwrap().len(), 0);
        assert_eq!(session.quota_used(), 0);
    }

    #[test]
    fn clean_query_strips_activation_word() {
        let r = router();
        assert_eq!(r.clean_query("Friday, what TIME is it").as_deref(), Some("what time is it"));
        assert_eq!(r.clean_query("hey FRIDAY   sleep").as_deref(), Some("hey sleep"));
        assert_eq!(r.clean_query("good morning"), None);
    }

    #[test]
    fn sleep_is_local_and_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let exec = test_executor(dir.path());
        let mut session = ToolCallingSession::new(
            Box::new(ScriptedService::new(vec![])),
            exec.schemas(),
            "sys",
            8,
        );
        let outcome = router().route("friday sleep", &exec, &mut session);
        assert!(matches!(outcome, RouterOutcome::LocalReply(_)));
        assert!(!exec.running_flag().load(Ordering::SeqCst));
        assert_eq!(session.quota_used(), 0);
    }

    #[test]
    fn unmatched_query_escalates_raw_utterance() {
        let dir = tempfile::tempdir().unwrap();
        let exec = test_executor(dir.path());
        let service = ScriptedService::new(vec![Ok(ModelMessage::assistant("It is noon."))]);
        let calls = service.calls();
        let mut session = ToolCallingSession::new(Box::new(service), exec.schemas(), "sys", 8);
        let outcome = router().route("Friday what time is it", &exec, &mut session);
        assert_eq!(outcome, RouterOutcome::RemoteReply("It is noon.".to_string()));
        assert_eq!(session.quota_used(), 1);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].messages[0].content.as_deref(),
            Some("Friday what time is it")
        );
    }

    #[test]
    fn panicking_trigger_becomes_generic_apology() {
        let dir = tempfile::tempdir().unwrap();
        let exec = test_executor(dir.path());
        let mut table = TriggerTable::new();
        table.register_fn("explode", |_, _| panic!("boom"));
        let r = HybridRouter::new("friday", table);
        let mut session = ToolCallingSession::new(
            Box::new(ScriptedService::new(vec![])),
            exec.schemas(),
            "sys",
            8,
        );
        assert_eq!(
            r.route("friday explode", &exec, &mut session),
            RouterOutcome::LocalReply(GENERIC_APOLOGY.to_string())
        );
    }
}
