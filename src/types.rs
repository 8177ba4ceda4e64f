use serde::{Deserialize, Serialize};

use crate::CapabilityError;

/// Argument bag for one invocation, as emitted by a trigger or by the model.
pub(crate) type Arguments = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParameterKind {
    String,
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone)]
pub(crate) struct ParameterSpec {
    pub(crate) name: &'static str,
    pub(crate) kind: ParameterKind,
    pub(crate) required: bool,
    pub(crate) description: &'static str,
}

/// One entry of the capability catalog.
///
/// `apology` completes the sentence "Sorry, I couldn't ..." and is only used
/// locally when an invocation fails; it never goes over the wire.
#[derive(Debug, Clone)]
pub(crate) struct Capability {
    pub(crate) name: &'static str,
    pub(crate) description: &'static str,
    pub(crate) parameters: Vec<ParameterSpec>,
    pub(crate) apology: &'static str,
}

impl Capability {
    #[cfg(test)]
    pub(crate) fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Wire form of a capability, the contract shared with every reasoning backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CapabilitySchema {
    pub(crate) name: String,
    pub(crate) description: String,
    pub(crate) parameters: Vec<ParameterSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ParameterSchema {
    pub(crate) name: String,
    #[serde(rename = "type")]
    pub(crate) kind: String,
    pub(crate) required: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) description: String,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub(crate) values: Vec<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct InvocationRequest {
    pub(crate) capability: String,
    pub(crate) arguments: Arguments,
}

impl InvocationRequest {
    pub(crate) fn new(capability: &str) -> Self {
        Self {
            capability: capability.to_string(),
            arguments: Arguments::new(),
        }
    }

    pub(crate) fn with_arg(mut self, name: &str, value: impl Into<String>) -> Self {
        self.arguments
            .insert(name.to_string(), serde_json::Value::String(value.into()));
        self
    }
}

#[derive(Debug)]
pub(crate) enum InvocationResult {
    Success(String),
    Failure(CapabilityError),
}

impl InvocationResult {
    pub(crate) fn is_success(&self) -> bool {
        matches!(self, InvocationResult::Success(_))
    }

    /// Reduce to the text that may be spoken to the user.
    pub(crate) fn into_speech(self) -> String {
        match self {
            InvocationResult::Success(text) => text,
            InvocationResult::Failure(err) => err.apology(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RouterOutcome {
    Ignored,
    LocalReply(String),
    RemoteReply(String),
}

impl RouterOutcome {
    pub(crate) fn speech(&self) -> Option<&str> {
        match self {
            RouterOutcome::Ignored => None,
            RouterOutcome::LocalReply(text) | RouterOutcome::RemoteReply(text) => Some(text),
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            RouterOutcome::Ignored => "ignored",
            RouterOutcome::LocalReply(_) => "local",
            RouterOutcome::RemoteReply(_) => "remote",
        }
    }
}

// === Model conversation ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ModelMessage {
    pub(crate) role: String,
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default)]
    pub(crate) tool_calls: Vec<ModelToolCall>,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) is_error: Option<bool>,
}

impl ModelMessage {
    pub(crate) fn user(text: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(text.to_string()),
            tool_calls: Vec::new(),
            name: None,
            tool_call_id: None,
            is_error: None,
        }
    }

    pub(crate) fn assistant(text: &str) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(text.to_string()),
            tool_calls: Vec::new(),
            name: None,
            tool_call_id: None,
            is_error: None,
        }
    }

    pub(crate) fn tool_result(call: &ModelToolCall, output: String, is_error: bool) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(output),
            tool_calls: Vec::new(),
            name: Some(call.name.clone()),
            tool_call_id: Some(call.id.clone()),
            is_error: Some(is_error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ModelToolCall {
    pub(crate) id: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) args: serde_json::Value,
    /// Opaque provider token that must be echoed back with the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ModelRequest {
    pub(crate) system: String,
    pub(crate) messages: Vec<ModelMessage>,
    pub(crate) tools: Vec<CapabilitySchema>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ModelResponse {
    pub(crate) message: ModelMessage,
}

/// A completed exchange: the utterance, every model reply, every tool result.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ConversationTurn {
    pub(crate) messages: Vec<ModelMessage>,
}

// === External commands ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum CommandSpec {
    String(String),
    Array(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct HookSpec {
    pub(crate) command: CommandSpec,
    #[serde(default)]
    pub(crate) timeout_ms: Option<u64>,
}

impl HookSpec {
    pub(crate) fn new(command: CommandSpec) -> Self {
        Self {
            command,
            timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TranscriptEntry {
    pub(crate) ts_utc: i64,
    pub(crate) route: String,
    pub(crate) utterance: String,
    #[serde(default)]
    pub(crate) reply: Option<String>,
}

pub(crate) const DEFAULT_ACTIVATION_WORD: &str = "friday";
pub(crate) const DEFAULT_CONFIG_FILE: &str = "friday.json";
pub(crate) const GENERIC_APOLOGY: &str = "Sorry, something went wrong. Please try again.";
pub(crate) const REMOTE_APOLOGY: &str =
    "Sorry, I couldn't reach my AI brain right now. Please try again.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_request_builder_sets_string_args() {
        let req = InvocationRequest::new("handle_volume").with_arg("direction", "up");
        assert_eq!(req.capability, "handle_volume");
        assert_eq!(req.arguments.get("direction"), Some(&serde_json::json!("up")));
    }

    #[test]
    fn ignored_outcome_has_no_speech() {
        assert_eq!(RouterOutcome::Ignored.speech(), None);
        assert_eq!(
            RouterOutcome::LocalReply("ok".into()).speech(),
            Some("ok")
        );
        assert_eq!(RouterOutcome::RemoteReply("x".into()).label(), "remote");
    }

    #[test]
    fn command_spec_accepts_string_or_array() {
        let s: CommandSpec = serde_json::from_str("\"espeak\"").unwrap();
        assert_eq!(s, CommandSpec::String("espeak".into()));
        let a: CommandSpec = serde_json::from_str("[\"espeak\", \"{text}\"]").unwrap();
        assert_eq!(
            a,
            CommandSpec::Array(vec!["espeak".into(), "{text}".into()])
        );
    }
}
