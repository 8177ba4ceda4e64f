use crate::{
    Arguments, CapabilityExecutor, CapabilitySchema, ConversationTurn, ModelMessage, ModelRequest,
    RemoteError, REMOTE_APOLOGY,
};

pub(crate) const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// A remote reasoning backend: one request in, one assistant message out.
pub(crate) trait ReasoningService: Send {
    fn generate(&self, request: &ModelRequest) -> Result<ModelMessage, RemoteError>;

    fn name(&self) -> &str {
        "model"
    }
}

/// Stands in when no backend could be built; every turn fails with the reason.
pub(crate) struct UnavailableService(pub(crate) String);

impl ReasoningService for UnavailableService {
    fn generate(&self, _request: &ModelRequest) -> Result<ModelMessage, RemoteError> {
        Err(RemoteError::Transport(self.0.clone()))
    }

    fn name(&self) -> &str {
        "unavailable"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TurnState {
    Idle,
    AwaitingModelReply,
    InvokingCapability,
}

/// Conversation with the reasoning service, driven as an explicit
/// request / execute / continue loop.
pub(crate) struct ToolCallingSession {
    service: Box<dyn ReasoningService>,
    tools: Vec<CapabilitySchema>,
    system: String,
    max_rounds: usize,
    turns: Vec<ConversationTurn>,
    quota_used: u64,
    state: TurnState,
}

impl ToolCallingSession {
    pub(crate) fn new(
        service: Box<dyn ReasoningService>,
        tools: Vec<CapabilitySchema>,
        system: &str,
        max_rounds: usize,
    ) -> Self {
        Self {
            service,
            tools,
            system: system.to_string(),
            max_rounds: max_rounds.max(1),
            turns: Vec::new(),
            quota_used: 0,
            state: TurnState::Idle,
        }
    }

    pub(crate) fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// One unit per escalated utterance, regardless of tool rounds.
    pub(crate) fn quota_used(&self) -> u64 {
        self.quota_used
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> TurnState {
        self.state
    }

    fn enter(&mut self, next: TurnState) {
        if self.state != next {
            tracing::trace!(from = ?self.state, to = ?next, "turn state");
            self.state = next;
        }
    }

    /// Run one full turn. A failed turn is dropped so the next send starts clean.
    pub(crate) fn send(&mut self, utterance: &str, executor: &CapabilityExecutor) -> String {
        self.quota_used += 1;
        let outcome = self.run_turn(utterance, executor);
        self.enter(TurnState::Idle);
        match outcome {
            Ok((reply, messages)) => {
                tracing::info!(
                    backend = self.service.name(),
                    messages = messages.len(),
                    turns = self.turns.len() + 1,
                    "turn committed"
                );
                self.turns.push(ConversationTurn { messages });
                reply
            }
            Err(err) => {
                tracing::warn!(backend = self.service.name(), %err, "turn dropped");
                REMOTE_APOLOGY.to_string()
            }
        }
    }

    fn history(&self) -> Vec<ModelMessage> {
        self.turns
            .iter()
            .flat_map(|turn| turn.messages.iter().cloned())
            .collect()
    }

    fn run_turn(
        &mut self,
        utterance: &str,
        executor: &CapabilityExecutor,
    ) -> Result<(String, Vec<ModelMessage>), RemoteError> {
        let history = self.history();
        let mut staged = vec![ModelMessage::user(utterance)];

        for round in 0..self.max_rounds {
            self.enter(TurnState::AwaitingModelReply);
            let mut messages = history.clone();
            messages.extend(staged.iter().cloned());
            let request = ModelRequest {
                system: self.system.clone(),
                messages,
                tools: self.tools.clone(),
            };
            let mut message = self.service.generate(&request)?;
            message.role = "assistant".to_string();
            for (i, call) in message.tool_calls.iter_mut().enumerate() {
                if call.id.trim().is_empty() {
                    call.id = format!("call_{round}_{i}");
                }
            }
            let calls = message.tool_calls.clone();

            if calls.is_empty() {
                let text = message
                    .content
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or_default()
                    .to_string();
                if text.is_empty() {
                    return Err(RemoteError::Empty);
                }
                staged.push(message);
                return Ok((text, staged));
            }

            staged.push(message);
            self.enter(TurnState::InvokingCapability);
            for call in &calls {
                let args: Arguments = call.args.as_object().cloned().unwrap_or_default();
                tracing::debug!(round, capability = %call.name, "model requested capability");
                let result = executor.execute(&call.name, args);
                let is_error = !result.is_success();
                staged.push(ModelMessage::tool_result(call, result.into_speech(), is_error));
            }
        }

        Err(RemoteError::TooManyRounds(self.max_rounds))
    }
}
