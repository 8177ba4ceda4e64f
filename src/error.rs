use thiserror::Error;

/// Why a capability invocation did not produce a result.
#[derive(Debug, Error)]
pub(crate) enum CapabilityError {
    #[error("unknown capability '{0}'")]
    UnknownCapability(String),
    #[error("capability '{capability}' is missing required parameter '{parameter}'")]
    MissingRequiredParameter {
        capability: String,
        parameter: String,
    },
    #[error("capability '{capability}' got an invalid '{parameter}': {reason}")]
    InvalidArgument {
        capability: String,
        parameter: String,
        reason: String,
    },
    #[error("capability '{capability}' failed: {reason}")]
    Failed {
        capability: String,
        /// Completes "Sorry, I couldn't ...".
        action: String,
        reason: String,
    },
}

impl CapabilityError {
    /// Speakable rendering; never leaks the internal error shape.
    pub(crate) fn apology(&self) -> String {
        match self {
            CapabilityError::UnknownCapability(_) => {
                "Sorry, I don't know how to do that yet.".to_string()
            }
            CapabilityError::MissingRequiredParameter { parameter, .. } => {
                format!(
                    "Sorry, I need the {} to do that.",
                    parameter.replace('_', " ")
                )
            }
            CapabilityError::InvalidArgument { parameter, .. } => {
                format!(
                    "Sorry, I didn't understand the {} you gave me.",
                    parameter.replace('_', " ")
                )
            }
            CapabilityError::Failed { action, reason, .. } => {
                if reason.is_empty() {
                    format!("Sorry, I couldn't {action}.")
                } else {
                    format!("Sorry, I couldn't {action}. {reason}")
                }
            }
        }
    }
}

/// Failure inside a capability adapter (network, OS, file).
#[derive(Debug, Error)]
pub(crate) enum ServiceError {
    #[error("{0}")]
    Http(String),
    #[error("{0}")]
    Api(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("could not read the PDF: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("{0}")]
    Unsupported(String),
    #[error("{0}")]
    Command(String),
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    /// Text safe to speak. Transport, file, PDF and command detail stays in the logs.
    pub(crate) fn user_message(&self) -> Option<String> {
        match self {
            ServiceError::Api(_)
            | ServiceError::InvalidInput(_)
            | ServiceError::NotConfigured(_)
            | ServiceError::Unsupported(_) => Some(self.to_string()),
            ServiceError::Http(_)
            | ServiceError::Io(_)
            | ServiceError::Pdf(_)
            | ServiceError::Command(_)
            | ServiceError::Internal(_) => None,
        }
    }
}

impl From<ureq::Error> for ServiceError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, resp) => {
                let body = resp.into_string().unwrap_or_default();
                let message = serde_json::from_str::<serde_json::Value>(&body)
                    .ok()
                    .and_then(|v| {
                        v.get("message")
                            .and_then(|m| m.as_str())
                            .map(|m| m.to_string())
                    })
                    .unwrap_or_else(|| format!("the service answered with HTTP {code}"));
                ServiceError::Api(message)
            }
            ureq::Error::Transport(t) => {
                ServiceError::Http(format!("could not connect to the service ({t})"))
            }
        }
    }
}

/// Failure of the remote reasoning service for one turn.
#[derive(Debug, Error)]
pub(crate) enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("response blocked: {0}")]
    Blocked(String),
    #[error("response had neither text nor tool calls")]
    Empty,
    #[error("model hook failed: {0}")]
    Hook(String),
    #[error("turn exceeded {0} tool rounds")]
    TooManyRounds(usize),
}

#[derive(Debug, Error)]
pub(crate) enum SpeechError {
    #[error("speech service unavailable: {0}")]
    Unavailable(String),
    #[error("speech was not recognized")]
    Unrecognized,
}

/// Errors that keep the Session Loop from ever reaching `Listening`.
#[derive(Debug, Error)]
pub(crate) enum StartupError {
    #[error("fatal initialization failure: {0}")]
    FatalInitialization(String),
    #[error("verification failed: {0}")]
    Verification(String),
    #[error("invalid configuration at {path}: {reason}")]
    Config { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parameter_apology_names_the_parameter() {
        let err = CapabilityError::MissingRequiredParameter {
            capability: "handle_weather".into(),
            parameter: "city".into(),
        };
        assert_eq!(err.apology(), "Sorry, I need the city to do that.");
    }

    #[test]
    fn failed_apology_includes_action_and_reason() {
        let err = CapabilityError::Failed {
            capability: "handle_battery".into(),
            action: "retrieve battery information".into(),
            reason: "no battery found".into(),
        };
        assert_eq!(
            err.apology(),
            "Sorry, I couldn't retrieve battery information. no battery found"
        );
    }

    #[test]
    fn apology_hides_capability_identifiers() {
        let err = CapabilityError::UnknownCapability("handle_teleport".into());
        assert!(!err.apology().contains("handle_teleport"));
    }

    #[test]
    fn only_user_facing_service_errors_are_spoken() {
        let missing = ServiceError::NotConfigured("The weather API key");
        assert_eq!(
            missing.user_message().as_deref(),
            Some("The weather API key is not configured")
        );
        let io = ServiceError::Io(std::io::Error::other("disk on fire"));
        assert_eq!(io.user_message(), None);
        let cmd = ServiceError::Command("could not start pactl: No such file".into());
        assert_eq!(cmd.user_message(), None);
        let transport = ServiceError::Http("could not connect to the service (dns)".into());
        assert_eq!(transport.user_message(), None);
    }
}
