use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config_file::{CommandConfig, FileConfig, PathConfig, ServiceConfig};
use crate::memory::MemorySlot;
use crate::tool_args::*;
use crate::{
    build_http_agent, capability_registry, capability_schemas, local, math, services, Arguments,
    Capability, CapabilityError, CapabilitySchema, InvocationRequest, InvocationResult,
    ParameterKind, ServiceError,
};

type Handler = fn(&CapabilityContext, Value) -> Result<String, ServiceError>;

pub(crate) const SLEEP_REPLY: &str = "Thanks for using me sir, have a good day. Bye.";

/// Everything a capability adapter may touch.
pub(crate) struct CapabilityContext {
    pub(crate) services: ServiceConfig,
    pub(crate) paths: PathConfig,
    pub(crate) commands: CommandConfig,
    pub(crate) memory: MemorySlot,
    /// Cleared by `handle_sleep`; the Session Loop stops when it reads false.
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) http: ureq::Agent,
}

impl CapabilityContext {
    pub(crate) fn from_config(config: &FileConfig, running: Arc<AtomicBool>) -> Self {
        Self {
            services: config.services.clone(),
            paths: config.paths.clone(),
            commands: config.commands.clone(),
            memory: MemorySlot::new(config.paths.memory_file.clone()),
            running,
            http: build_http_agent(config.services.http_timeout_secs),
        }
    }
}

pub(crate) struct CapabilityExecutor {
    registry: Vec<Capability>,
    index: HashMap<&'static str, usize>,
    ctx: CapabilityContext,
}

impl CapabilityExecutor {
    pub(crate) fn new(ctx: CapabilityContext) -> Self {
        let registry = capability_registry();
        let index = registry
            .iter()
            .enumerate()
            .map(|(i, cap)| (cap.name, i))
            .collect();
        Self {
            registry,
            index,
            ctx,
        }
    }

    pub(crate) fn schemas(&self) -> Vec<CapabilitySchema> {
        capability_schemas(&self.registry)
    }

    pub(crate) fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ctx.running)
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Capability> {
        self.index.get(name).map(|&i| &self.registry[i])
    }

    pub(crate) fn execute_request(&self, request: InvocationRequest) -> InvocationResult {
        self.execute(&request.capability, request.arguments)
    }

    /// Validate, dispatch and normalize one invocation. Never panics.
    pub(crate) fn execute(&self, name: &str, args: Arguments) -> InvocationResult {
        let Some(capability) = self.lookup(name) else {
            tracing::warn!(capability = name, "unknown capability requested");
            return InvocationResult::Failure(CapabilityError::UnknownCapability(name.to_string()));
        };
        let normalized = match validate_arguments(capability, args) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(capability = name, %err, "invocation rejected");
                return InvocationResult::Failure(err);
            }
        };
        let Some(handler) = handler_for(name) else {
            return InvocationResult::Failure(CapabilityError::UnknownCapability(name.to_string()));
        };

        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| handler(&self.ctx, normalized)));
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok(text)) => {
                tracing::info!(capability = name, elapsed_ms, "capability succeeded");
                InvocationResult::Success(text)
            }
            Ok(Err(err)) => {
                tracing::warn!(capability = name, elapsed_ms, %err, "capability failed");
                InvocationResult::Failure(CapabilityError::Failed {
                    capability: name.to_string(),
                    action: capability.apology.to_string(),
                    reason: err.user_message().unwrap_or_default(),
                })
            }
            Err(_) => {
                tracing::error!(capability = name, elapsed_ms, "capability panicked");
                InvocationResult::Failure(CapabilityError::Failed {
                    capability: name.to_string(),
                    action: capability.apology.to_string(),
                    reason: String::new(),
                })
            }
        }
    }

    pub(crate) fn execute_to_text(&self, name: &str, args: Arguments) -> String {
        self.execute(name, args).into_speech()
    }
}

/// Check presence and kind of every declared parameter; drop undeclared ones.
pub(crate) fn validate_arguments(
    capability: &Capability,
    mut args: Arguments,
) -> Result<Value, CapabilityError> {
    let mut normalized = serde_json::Map::new();
    for param in &capability.parameters {
        let value = match args.remove(param.name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(Value::String(s)) => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(Value::Bool(b)) => Some(b.to_string()),
            Some(other) => {
                return Err(CapabilityError::InvalidArgument {
                    capability: capability.name.to_string(),
                    parameter: param.name.to_string(),
                    reason: format!("expected text, got {other}"),
                });
            }
        };
        let Some(value) = value else {
            if param.required {
                return Err(CapabilityError::MissingRequiredParameter {
                    capability: capability.name.to_string(),
                    parameter: param.name.to_string(),
                });
            }
            continue;
        };
        let value = match param.kind {
            ParameterKind::String => value,
            ParameterKind::Enum(allowed) => {
                let lowered = value.to_lowercase();
                if !allowed.contains(&lowered.as_str()) {
                    return Err(CapabilityError::InvalidArgument {
                        capability: capability.name.to_string(),
                        parameter: param.name.to_string(),
                        reason: format!("expected one of {}", allowed.join(", ")),
                    });
                }
                lowered
            }
        };
        normalized.insert(param.name.to_string(), Value::String(value));
    }
    if !args.is_empty() {
        let extra: Vec<&String> = args.keys().collect();
        tracing::debug!(capability = capability.name, ?extra, "ignoring undeclared arguments");
    }
    Ok(Value::Object(normalized))
}

fn parse<T: DeserializeOwned>(args: Value) -> Result<T, ServiceError> {
    serde_json::from_value(args).map_err(|e| ServiceError::Internal(format!("args: {e}")))
}

pub(crate) fn time_reply(now: DateTime<Local>) -> String {
    format!("Sir, the time is {}", now.format("%I:%M %p"))
}

pub(crate) fn handler_for(name: &str) -> Option<Handler> {
    let handler: Handler = match name {
        "handle_wikipedia" => |ctx, args| {
            let parsed: WikipediaArgs = parse(args)?;
            services::wikipedia_summary(&ctx.http, &parsed.topic)
        },
        "handle_youtube" => |ctx, args| {
            let parsed: SearchArgs = parse(args)?;
            local::open_youtube(&ctx.commands, &parsed.search_query)
        },
        "handle_google" => |ctx, args| {
            let parsed: SearchArgs = parse(args)?;
            local::open_google(&ctx.commands, &parsed.search_query)
        },
        "handle_open_web" => |ctx, args| {
            let parsed: OpenWebArgs = parse(args)?;
            local::open_website(&ctx.commands, &parsed.site_name)
        },
        "handle_open_app" => |ctx, args| {
            let parsed: OpenAppArgs = parse(args)?;
            local::open_app(&ctx.commands, &parsed.app_name)
        },
        "handle_open_camera" => |ctx, _| local::open_camera(&ctx.commands),
        "handle_battery" => |_, _| local::battery_report(),
        "handle_internet_speed" => |ctx, _| services::measure_speed(&ctx.http, &ctx.services),
        "handle_screenshot" => |ctx, _| local::take_screenshot(&ctx.commands, &ctx.paths),
        "handle_volume" => |ctx, args| {
            let parsed: VolumeArgs = parse(args)?;
            local::adjust_volume(&ctx.commands, &parsed.direction)
        },
        "handle_sleep" => |ctx, _| {
            ctx.running.store(false, Ordering::SeqCst);
            tracing::info!("sleep requested; stopping after this turn");
            Ok(SLEEP_REPLY.to_string())
        },
        "handle_time" => |_, _| Ok(time_reply(Local::now())),
        "handle_calculate" => |_, args| {
            let parsed: CalculateArgs = parse(args)?;
            Ok(math::calculate(&parsed.expression))
        },
        "handle_convert" => |_, args| {
            let parsed: ConvertArgs = parse(args)?;
            math::convert_units(&parsed.conversion_query)
        },
        "handle_translate" => |ctx, args| {
            let parsed: TranslateArgs = parse(args)?;
            services::translate(&ctx.http, &parsed.text, &parsed.target_language)
        },
        "handle_remember" => |ctx, args| {
            let parsed: RememberArgs = parse(args)?;
            ctx.memory.remember(&parsed.text_to_remember)
        },
        "handle_recall" => |ctx, _| ctx.memory.recall(),
        "handle_read_pdf" => |ctx, args| {
            let parsed: ReadPdfArgs = parse(args)?;
            local::read_named_pdf(&ctx.paths, &parsed.pdf_name)
        },
        "handle_weather" => |ctx, args| {
            let parsed: WeatherArgs = parse(args)?;
            services::get_weather(&ctx.http, &ctx.services, &parsed.city)
        },
        "handle_news" => |ctx, args| {
            let parsed: NewsArgs = parse(args)?;
            services::get_news(
                &ctx.http,
                &ctx.services,
                parsed.category.as_deref(),
                parsed.country.as_deref(),
            )
        },
        "handle_play_music" => |ctx, _| local::play_music(&ctx.commands, &ctx.paths),
        "handle_joke" => |_, _| Ok(local::random_joke()),
        "handle_wikihow" => |ctx, args| {
            let parsed: WikihowArgs = parse(args)?;
            services::wikihow_search(&ctx.http, &parsed.task)
        },
        _ => return None,
    };
    Some(handler)
}

#[cfg(test)]
pub(crate) fn test_executor(dir: &std::path::Path) -> CapabilityExecutor {
    let mut config = FileConfig::default();
    config.paths.memory_file = dir.join("data.txt");
    config.paths.pdf_dir = dir.join("pdfs");
    config.paths.music_dir = dir.join("music");
    config.paths.screenshot_dir = dir.join("screenshots");
    config.services.weather_api_key = None;
    config.services.news_api_key = None;
    let running = Arc::new(AtomicBool::new(true));
    CapabilityExecutor::new(CapabilityContext::from_config(&config, running))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap_or_default()
    }

    fn looks_like_clock(text: &str) -> bool {
        text.as_bytes().windows(5).any(|w| {
            w[0].is_ascii_digit()
                && w[1].is_ascii_digit()
                && w[2] == b':'
                && w[3].is_ascii_digit()
                && w[4].is_ascii_digit()
        })
    }

    #[test]
    fn every_capability_has_a_handler() {
        for cap in capability_registry() {
            assert!(handler_for(cap.name).is_some(), "{} has no handler", cap.name);
        }
        assert!(handler_for("handle_teleport").is_none());
    }

    #[test]
    fn time_contains_clock() {
        let dir = tempfile::tempdir().unwrap();
        let exec = test_executor(dir.path());
        let reply = exec.execute_to_text("handle_time", Arguments::new());
        assert!(reply.starts_with("Sir, the time is "));
        assert!(looks_like_clock(&reply), "{reply}");
    }

    #[test]
    fn unknown_capability_is_an_apology() {
        let dir = tempfile::tempdir().unwrap();
        let exec = test_executor(dir.path());
        let result = exec.execute("handle_teleport", Arguments::new());
        assert!(matches!(
            result,
            InvocationResult::Failure(CapabilityError::UnknownCapability(_))
        ));
    }

    #[test]
    fn weather_without_city_is_rejected_before_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let exec = test_executor(dir.path());
        match exec.execute("handle_weather", Arguments::new()) {
            InvocationResult::Failure(CapabilityError::MissingRequiredParameter {
                parameter, ..
            }) => assert_eq!(parameter, "city"),
            other => panic!("unexpected {other:?}"),
        }
        let blank = exec.execute("handle_weather", args(json!({"city": "  "})));
        assert!(!blank.is_success());
    }

    #[test]
    fn handler_failure_becomes_apology() {
        let dir = tempfile::tempdir().unwrap();
        let exec = test_executor(dir.path());
        let reply = exec.execute_to_text("handle_weather", args(json!({"city": "Pune"})));
        assert_eq!(
            reply,
            "Sorry, I couldn't get the weather. The weather API key is not configured"
        );
    }

    #[test]
    fn corrupt_pdf_apology_hides_parser_detail() {
        let dir = tempfile::tempdir().unwrap();
        let exec = test_executor(dir.path());
        std::fs::create_dir_all(dir.path().join("pdfs")).unwrap();
        std::fs::write(dir.path().join("pdfs").join("notes.pdf"), "just some text").unwrap();
        let reply = exec.execute_to_text("handle_read_pdf", args(json!({"pdf_name": "notes"})));
        assert!(reply.starts_with("Sorry, I couldn't"), "{reply}");
        assert!(reply.ends_with('.'), "{reply}");
        assert!(!reply.contains("PDF:"), "{reply}");
        assert!(!reply.to_lowercase().contains("parse"), "{reply}");
        assert!(!reply.to_lowercase().contains("header"), "{reply}");
    }

    #[test]
    fn memory_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let exec = test_executor(dir.path());
        assert_eq!(
            exec.execute_to_text("handle_recall", Arguments::new()),
            "Sorry, I don't remember anything."
        );
        exec.execute_to_text(
            "handle_remember",
            args(json!({"text_to_remember": "keys are under the mat"})),
        );
        assert_eq!(
            exec.execute_to_text("handle_recall", Arguments::new()),
            "You told me to remember that: keys are under the mat"
        );
    }

    #[test]
    fn sleep_clears_running_flag() {
        let dir = tempfile::tempdir().unwrap();
        let exec = test_executor(dir.path());
        let flag = exec.running_flag();
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(exec.execute_to_text("handle_sleep", Arguments::new()), SLEEP_REPLY);
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn enum_arguments_are_checked() {
        let dir = tempfile::tempdir().unwrap();
        let exec = test_executor(dir.path());
        let result = exec.execute("handle_volume", args(json!({"direction": "sideways"})));
        match result {
            InvocationResult::Failure(err @ CapabilityError::InvalidArgument { .. }) => {
                assert_eq!(err.apology(), "Sorry, I didn't understand the direction you gave me.");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn numbers_are_coerced_and_extras_dropped() {
        let cap = capability_registry()
            .into_iter()
            .find(|c| c.name == "handle_calculate")
            .unwrap();
        let value = validate_arguments(
            &cap,
            args(json!({"expression": 42, "verbose": true})),
        )
        .unwrap();
        assert_eq!(value, json!({"expression": "42"}));
    }

    #[test]
    fn optional_enum_may_be_absent() {
        let cap = capability_registry()
            .into_iter()
            .find(|c| c.name == "handle_news")
            .unwrap();
        let value = validate_arguments(&cap, args(json!({"category": "Sports"}))).unwrap();
        assert_eq!(value, json!({"category": "sports"}));
    }

    #[test]
    fn calculate_through_executor() {
        let dir = tempfile::tempdir().unwrap();
        let exec = test_executor(dir.path());
        assert_eq!(
            exec.execute_to_text("handle_calculate", args(json!({"expression": "6 times 7"}))),
            "The result is 42"
        );
    }
}
