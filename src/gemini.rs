use std::io::{self, Read};
use std::time::Duration;

use serde_json::{json, Value};

use crate::config_file::ModelConfig;
use crate::{
    command_spec_is, command_spec_to_vec, run_hook_command, schema_to_declaration,
    CapabilitySchema, CommandSpec, HookSpec, ModelMessage, ModelRequest, ModelResponse,
    ModelToolCall,
    ReasoningService, RemoteError, StartupError, NO_DEADLINE_TIMEOUT_MS,
};

const BUILTIN_GEMINI: &str = "builtin:gemini";
const HARM_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

fn function_response_part(msg: &ModelMessage) -> Value {
    let output = msg.content.clone().unwrap_or_default();
    let response = if msg.is_error.unwrap_or(false) {
        json!({ "error": output })
    } else {
        json!({ "result": output })
    };
    json!({
        "functionResponse": {
            "name": msg.name.clone().unwrap_or_default(),
            "response": response,
        }
    })
}

fn is_function_response_block(content: &Value) -> bool {
    content.get("role").and_then(|r| r.as_str()) == Some("user")
        && content
            .get("parts")
            .and_then(|p| p.as_array())
            .map(|parts| {
                !parts.is_empty() && parts.iter().all(|p| p.get("functionResponse").is_some())
            })
            .unwrap_or(false)
}

/// Map the neutral conversation onto Gemini `contents`. Consecutive tool
/// results collapse into a single user block, as the API requires.
pub(crate) fn to_gemini_contents(messages: &[ModelMessage]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for msg in messages {
        match msg.role.as_str() {
            "user" => {
                out.push(json!({
                    "role": "user",
                    "parts": [{ "text": msg.content.clone().unwrap_or_default() }]
                }));
            }
            "assistant" => {
                let mut parts = Vec::new();
                if let Some(text) = &msg.content {
                    if !text.is_empty() {
                        parts.push(json!({ "text": text }));
                    }
                }
                for call in &msg.tool_calls {
                    let mut part = json!({
                        "functionCall": { "name": call.name, "args": call.args }
                    });
                    if let Some(sig) = &call.signature {
                        part["thoughtSignature"] = json!(sig);
                    }
                    parts.push(part);
                }
                if parts.is_empty() {
                    parts.push(json!({ "text": "" }));
                }
                out.push(json!({ "role": "model", "parts": parts }));
            }
            "tool" => {
                let part = function_response_part(msg);
                if let Some(last) = out.last_mut() {
                    if is_function_response_block(last) {
                        if let Some(parts) = last["parts"].as_array_mut() {
                            parts.push(part);
                            continue;
                        }
                    }
                }
                out.push(json!({ "role": "user", "parts": [part] }));
            }
            _ => {}
        }
    }
    out
}

pub(crate) fn to_gemini_tools(tools: &[CapabilitySchema]) -> Value {
    let declarations: Vec<Value> = tools.iter().map(schema_to_declaration).collect();
    json!([{ "functionDeclarations": declarations }])
}

pub(crate) fn build_gemini_payload(request: &ModelRequest) -> Value {
    let safety: Vec<Value> = HARM_CATEGORIES
        .iter()
        .map(|category| json!({ "category": category, "threshold": "BLOCK_ONLY_HIGH" }))
        .collect();
    let mut payload = json!({
        "contents": to_gemini_contents(&request.messages),
        "safetySettings": safety,
    });
    if !request.system.trim().is_empty() {
        payload["systemInstruction"] = json!({ "parts": [{ "text": request.system }] });
    }
    if !request.tools.is_empty() {
        payload["tools"] = to_gemini_tools(&request.tools);
        payload["toolConfig"] = json!({ "functionCallingConfig": { "mode": "AUTO" } });
    }
    payload
}

pub(crate) fn parse_gemini_response(payload: &Value) -> Result<ModelMessage, RemoteError> {
    if let Some(reason) = payload
        .pointer("/promptFeedback/blockReason")
        .and_then(|r| r.as_str())
    {
        return Err(RemoteError::Blocked(reason.to_string()));
    }
    let candidate = payload
        .pointer("/candidates/0")
        .ok_or_else(|| RemoteError::Decode("response has no candidates".to_string()))?;
    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .cloned()
        .unwrap_or_default();

    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();
    for part in &parts {
        if part.get("thought").and_then(|t| t.as_bool()) == Some(true) {
            continue;
        }
        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            if !text.is_empty() {
                text_parts.push(text.to_string());
            }
        }
        if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or("")
                .to_string();
            let args = call.get("args").cloned().unwrap_or_else(|| json!({}));
            let signature = part
                .get("thoughtSignature")
                .and_then(|s| s.as_str())
                .map(|s| s.to_string());
            tool_calls.push(ModelToolCall {
                id: String::new(),
                name,
                args,
                signature,
            });
        }
    }

    if text_parts.is_empty() && tool_calls.is_empty() {
        let finish = candidate
            .get("finishReason")
            .and_then(|f| f.as_str())
            .unwrap_or("");
        if matches!(finish, "SAFETY" | "BLOCKLIST" | "PROHIBITED_CONTENT") {
            return Err(RemoteError::Blocked(finish.to_string()));
        }
        return Err(RemoteError::Empty);
    }

    let mut message = ModelMessage::assistant(&text_parts.join(""));
    if text_parts.is_empty() {
        message.content = None;
    }
    message.tool_calls = tool_calls;
    Ok(message)
}

#[derive(Debug, Clone)]
pub(crate) struct GeminiConfig {
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) base_url: String,
    pub(crate) timeout_secs: u64,
}

impl GeminiConfig {
    pub(crate) fn from_model_config(cfg: &ModelConfig) -> Result<Self, StartupError> {
        let api_key = cfg
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                StartupError::FatalInitialization(
                    "GEMINI_API_KEY is not set and model.api_key is empty".to_string(),
                )
            })?;
        Ok(Self {
            api_key,
            model: cfg.model.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            timeout_secs: cfg.timeout_secs.max(1),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

pub(crate) struct GeminiClient {
    config: GeminiConfig,
    agent: ureq::Agent,
}

impl GeminiClient {
    pub(crate) fn new(config: GeminiConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_secs);
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        Self { config, agent }
    }
}

impl ReasoningService for GeminiClient {
    /// One POST per model round; a failed call is reported, never repeated.
    fn generate(&self, request: &ModelRequest) -> Result<ModelMessage, RemoteError> {
        let payload = build_gemini_payload(request);
        let response = self
            .agent
            .post(&self.config.endpoint())
            .set("content-type", "application/json")
            .set("x-goog-api-key", &self.config.api_key)
            .send_json(payload);
        let body: Value = match response {
            Ok(resp) => resp
                .into_json()
                .map_err(|e| RemoteError::Decode(e.to_string()))?,
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                tracing::warn!(code, "gemini request failed");
                return Err(RemoteError::Status { code, body });
            }
            Err(ureq::Error::Transport(err)) => {
                tracing::warn!(%err, "gemini transport error");
                return Err(RemoteError::Transport(err.to_string()));
            }
        };
        parse_gemini_response(&body)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

/// Any external program that reads a `ModelRequest` and prints a `ModelResponse`.
pub(crate) struct HookModel {
    hook: HookSpec,
}

impl HookModel {
    pub(crate) fn new(hook: HookSpec) -> Self {
        Self { hook }
    }
}

impl ReasoningService for HookModel {
    fn generate(&self, request: &ModelRequest) -> Result<ModelMessage, RemoteError> {
        let cmd = command_spec_to_vec(&self.hook.command);
        let timeout = self.hook.timeout_ms.unwrap_or(NO_DEADLINE_TIMEOUT_MS);
        let value = serde_json::to_value(request)
            .map_err(|e| RemoteError::Hook(format!("hook input: {e}")))?;
        let raw = run_hook_command(&cmd, &value, timeout, "model").map_err(RemoteError::Hook)?;
        let response: ModelResponse = serde_json::from_str(&raw)
            .map_err(|e| RemoteError::Hook(format!("hook output: {e}")))?;
        Ok(response.message)
    }

    fn name(&self) -> &str {
        "hook"
    }
}

pub(crate) fn build_reasoning_service(
    cfg: &ModelConfig,
) -> Result<Box<dyn ReasoningService>, StartupError> {
    if command_spec_is(&cfg.backend, BUILTIN_GEMINI) {
        let config = GeminiConfig::from_model_config(cfg)?;
        tracing::info!(model = %config.model, "using builtin gemini backend");
        return Ok(Box::new(GeminiClient::new(config)));
    }
    let hook = HookSpec {
        timeout_ms: Some(cfg.timeout_secs.saturating_mul(1000)),
        ..HookSpec::new(cfg.backend.clone())
    };
    let empty = match &hook.command {
        CommandSpec::String(cmd) => cmd.trim().is_empty(),
        CommandSpec::Array(items) => items.is_empty(),
    };
    if empty {
        return Err(StartupError::FatalInitialization(
            "model.backend is empty".to_string(),
        ));
    }
    tracing::info!("using model hook backend");
    Ok(Box::new(HookModel::new(hook)))
}

/// `friday hook gemini`: expose the builtin client over the hook protocol.
pub(crate) fn run_gemini_hook(cfg: &ModelConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    if input.trim().is_empty() {
        return Err("Gemini hook received empty input".into());
    }
    let request: ModelRequest = serde_json::from_str(&input)?;
    let client = GeminiClient::new(GeminiConfig::from_model_config(cfg)?);
    let message = client.generate(&request)?;
    println!("{}", serde_json::to_string(&ModelResponse { message })?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{capability_registry, capability_schemas};

    fn call(name: &str, args: Value, sig: Option<&str>) -> ModelToolCall {
        ModelToolCall {
            id: "call_0_0".into(),
            name: name.into(),
            args,
            signature: sig.map(|s| s.to_string()),
        }
    }

    #[test]
    fn tool_results_merge_into_one_user_block() {
        let c1 = call("handle_time", json!({}), Some("sig-1"));
        let c2 = call("handle_battery", json!({}), None);
        let mut assistant = ModelMessage::assistant("");
        assistant.content = None;
        assistant.tool_calls = vec![c1.clone(), c2.clone()];
        let messages = vec![
            ModelMessage::user("friday status"),
            assistant,
            ModelMessage::tool_result(&c1, "Sir, the time is 10:00 AM".into(), false),
            ModelMessage::tool_result(&c2, "Sorry, no battery".into(), true),
        ];
        let contents = to_gemini_contents(&messages);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["thoughtSignature"], "sig-1");
        assert!(contents[1]["parts"][1].get("thoughtSignature").is_none());
        let responses = contents[2]["parts"].as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(
            responses[0]["functionResponse"]["response"]["result"],
            "Sir, the time is 10:00 AM"
        );
        assert_eq!(
            responses[1]["functionResponse"]["response"]["error"],
            "Sorry, no battery"
        );
    }

    #[test]
    fn payload_carries_tools_and_safety() {
        let request = ModelRequest {
            system: "be brief".into(),
            messages: vec![ModelMessage::user("hi")],
            tools: capability_schemas(&capability_registry()),
        };
        let payload = build_gemini_payload(&request);
        assert_eq!(payload["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(
            payload["tools"][0]["functionDeclarations"].as_array().unwrap().len(),
            23
        );
        assert_eq!(payload["toolConfig"]["functionCallingConfig"]["mode"], "AUTO");
        let safety = payload["safetySettings"].as_array().unwrap();
        assert_eq!(safety.len(), 4);
        assert!(safety.iter().all(|s| s["threshold"] == "BLOCK_ONLY_HIGH"));
    }

    #[test]
    fn parses_function_calls_with_signature() {
        let payload = json!({"candidates": [{"content": {"role": "model", "parts": [
            {"functionCall": {"name": "handle_weather", "args": {"city": "Delhi"}},
             "thoughtSignature": "abc"}
        ]}}]});
        let msg = parse_gemini_response(&payload).unwrap();
        assert!(msg.content.is_none());
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].name, "handle_weather");
        assert_eq!(msg.tool_calls[0].args["city"], "Delhi");
        assert_eq!(msg.tool_calls[0].signature.as_deref(), Some("abc"));
    }

    #[test]
    fn parses_text_and_skips_thoughts() {
        let payload = json!({"candidates": [{"content": {"parts": [
            {"text": "planning...", "thought": true},
            {"text": "It is sunny."}
        ]}}]});
        let msg = parse_gemini_response(&payload).unwrap();
        assert_eq!(msg.content.as_deref(), Some("It is sunny."));
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn blocked_and_empty_responses_are_errors() {
        let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        assert!(matches!(
            parse_gemini_response(&blocked),
            Err(RemoteError::Blocked(_))
        ));
        let empty = json!({"candidates": [{"content": {"parts": []}, "finishReason": "STOP"}]});
        assert!(matches!(parse_gemini_response(&empty), Err(RemoteError::Empty)));
        assert!(matches!(
            parse_gemini_response(&json!({})),
            Err(RemoteError::Decode(_))
        ));
    }

    #[test]
    fn builtin_backend_requires_api_key() {
        let cfg = ModelConfig {
            api_key: None,
            ..ModelConfig::default()
        };
        assert!(matches!(
            build_reasoning_service(&cfg),
            Err(StartupError::FatalInitialization(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn hook_backend_round_trips_protocol() {
        let cfg = ModelConfig {
            backend: CommandSpec::String(
                r#"cat >/dev/null; echo '{"message":{"role":"assistant","content":"hi from hook"}}'"#
                    .to_string(),
            ),
            ..ModelConfig::default()
        };
        let service = build_reasoning_service(&cfg).unwrap();
        let request = ModelRequest {
            system: String::new(),
            messages: vec![ModelMessage::user("friday hello")],
            tools: Vec::new(),
        };
        let reply = service.generate(&request).unwrap();
        assert_eq!(reply.content.as_deref(), Some("hi from hook"));
        assert_eq!(service.name(), "hook");
    }

    /// Serve `count` connections with a fixed HTTP status, returning how many arrived.
    fn status_server(status: &str, count: usize) -> (String, std::thread::JoinHandle<usize>) {
        use std::io::Write;
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        listener.set_nonblocking(true).unwrap();
        let status = status.to_string();
        let handle = std::thread::spawn(move || {
            let deadline = std::time::Instant::now() + Duration::from_secs(3);
            let mut hits = 0;
            while std::time::Instant::now() < deadline && hits < count {
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        stream.set_nonblocking(false).unwrap();
                        stream
                            .set_read_timeout(Some(Duration::from_millis(200)))
                            .unwrap();
                        let mut buf = [0u8; 65536];
                        let _ = stream.read(&mut buf);
                        let body = "{\"error\":\"overloaded\"}";
                        let reply = format!(
                            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\n\
                             retry-after: 3\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                            body.len()
                        );
                        let _ = stream.write_all(reply.as_bytes());
                        hits += 1;
                    }
                    Err(_) => std::thread::sleep(Duration::from_millis(10)),
                }
            }
            hits
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn overloaded_backend_gets_exactly_one_request() {
        // Allow a second connection so a repeated call would be counted.
        let (base_url, server) = status_server("503 Service Unavailable", 2);
        let client = GeminiClient::new(GeminiConfig {
            api_key: "test-key".to_string(),
            model: "gemini-test".to_string(),
            base_url,
            timeout_secs: 2,
        });
        let request = ModelRequest {
            system: String::new(),
            messages: vec![ModelMessage::user("friday hello")],
            tools: Vec::new(),
        };
        let started = std::time::Instant::now();
        let result = client.generate(&request);
        assert!(matches!(result, Err(RemoteError::Status { code: 503, .. })));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(server.join().unwrap(), 1);
    }
}
