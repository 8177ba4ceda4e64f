use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{env_bool, env_optional, CommandSpec, HookSpec, StartupError, DEFAULT_ACTIVATION_WORD};

const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are Friday, a helpful and professional \
personal assistant. Your responses should be concise and helpful, suitable for being \
read aloud.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct FileConfig {
    pub(crate) activation_word: String,
    pub(crate) model: ModelConfig,
    pub(crate) speech: SpeechConfig,
    /// Identity check run before the greeting. `None` skips verification.
    pub(crate) verify: Option<HookSpec>,
    pub(crate) services: ServiceConfig,
    pub(crate) paths: PathConfig,
    pub(crate) commands: CommandConfig,
    pub(crate) log: LogConfig,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            activation_word: DEFAULT_ACTIVATION_WORD.to_string(),
            model: ModelConfig::default(),
            speech: SpeechConfig::default(),
            verify: None,
            services: ServiceConfig::default(),
            paths: PathConfig::default(),
            commands: CommandConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ModelConfig {
    /// `builtin:gemini`, or any command speaking the model-hook protocol.
    pub(crate) backend: CommandSpec,
    pub(crate) model: String,
    pub(crate) api_key: Option<String>,
    pub(crate) base_url: String,
    pub(crate) timeout_secs: u64,
    pub(crate) max_tool_rounds: usize,
    pub(crate) system_instruction: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: CommandSpec::String("builtin:gemini".to_string()),
            model: "gemini-2.5-pro".to_string(),
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 60,
            max_tool_rounds: 8,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct SpeechConfig {
    /// `console`, or an STT command hook.
    pub(crate) input: CommandSpec,
    pub(crate) listen_timeout_secs: u64,
    /// `console`, or a TTS command; `{text}` in an array arg is substituted.
    pub(crate) output: CommandSpec,
    pub(crate) language: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            input: CommandSpec::String("console".to_string()),
            listen_timeout_secs: 5,
            output: CommandSpec::String("console".to_string()),
            language: "en-in".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ServiceConfig {
    pub(crate) weather_api_key: Option<String>,
    pub(crate) news_api_key: Option<String>,
    pub(crate) news_country: String,
    pub(crate) news_category: String,
    pub(crate) news_articles: usize,
    pub(crate) http_timeout_secs: u64,
    pub(crate) speed_download_url: String,
    pub(crate) speed_upload_url: String,
    pub(crate) speed_upload_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            weather_api_key: None,
            news_api_key: None,
            news_country: "in".to_string(),
            news_category: "general".to_string(),
            news_articles: 3,
            http_timeout_secs: 15,
            speed_download_url: "https://speed.cloudflare.com/__down?bytes=10000000".to_string(),
            speed_upload_url: "https://speed.cloudflare.com/__up".to_string(),
            speed_upload_bytes: 2_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct PathConfig {
    pub(crate) memory_file: PathBuf,
    pub(crate) pdf_dir: PathBuf,
    pub(crate) music_dir: PathBuf,
    pub(crate) screenshot_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            memory_file: PathBuf::from("data.txt"),
            pdf_dir: PathBuf::from("pdfs"),
            music_dir: PathBuf::from("music"),
            screenshot_dir: PathBuf::from("screenshot"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct CommandConfig {
    /// Program used to open URLs and media files; the target is appended.
    pub(crate) opener: Option<CommandSpec>,
    /// Application launchers, matched by substring of the requested name.
    pub(crate) apps: BTreeMap<String, CommandSpec>,
    pub(crate) volume_up: Option<CommandSpec>,
    pub(crate) volume_down: Option<CommandSpec>,
    pub(crate) volume_mute: Option<CommandSpec>,
    /// `{path}` is replaced with the destination file.
    pub(crate) screenshot: Option<CommandSpec>,
    pub(crate) camera: Option<CommandSpec>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        let mut apps = BTreeMap::new();
        apps.insert("code".to_string(), CommandSpec::Array(vec!["code".to_string()]));
        let notepad = if cfg!(windows) { "notepad" } else { "gedit" };
        apps.insert(
            "notepad".to_string(),
            CommandSpec::Array(vec![notepad.to_string()]),
        );
        let (up, down, mute, screenshot) = if cfg!(target_os = "macos") {
            (
                "osascript -e 'set volume output volume ((output volume of (get volume settings)) + 10)'",
                "osascript -e 'set volume output volume ((output volume of (get volume settings)) - 10)'",
                "osascript -e 'set volume with output muted'",
                vec!["screencapture", "-x", "{path}"],
            )
        } else {
            (
                "pactl set-sink-volume @DEFAULT_SINK@ +10%",
                "pactl set-sink-volume @DEFAULT_SINK@ -10%",
                "pactl set-sink-mute @DEFAULT_SINK@ toggle",
                vec!["gnome-screenshot", "-f", "{path}"],
            )
        };
        Self {
            opener: None,
            apps,
            volume_up: Some(CommandSpec::String(up.to_string())),
            volume_down: Some(CommandSpec::String(down.to_string())),
            volume_mute: Some(CommandSpec::String(mute.to_string())),
            screenshot: Some(CommandSpec::Array(
                screenshot.into_iter().map(|s| s.to_string()).collect(),
            )),
            camera: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct LogConfig {
    pub(crate) transcript: bool,
    pub(crate) dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            transcript: false,
            dir: PathBuf::from("logs"),
        }
    }
}

impl FileConfig {
    /// Fill secrets the file leaves out from the environment.
    pub(crate) fn with_env_secrets(mut self) -> Self {
        self.log.transcript = env_bool("FRIDAY_TRANSCRIPT", self.log.transcript);
        if self.model.api_key.is_none() {
            self.model.api_key = env_optional("GEMINI_API_KEY");
        }
        if self.services.weather_api_key.is_none() {
            self.services.weather_api_key = env_optional("WEATHER_API_KEY");
        }
        if self.services.news_api_key.is_none() {
            self.services.news_api_key = env_optional("NEWS_API_KEY");
        }
        self
    }
}

pub(crate) fn resolve_config_path(cli: Option<PathBuf>) -> PathBuf {
    cli.or_else(|| env_optional("FRIDAY_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(crate::DEFAULT_CONFIG_FILE))
}

/// A missing file yields defaults; a malformed one is an error.
pub(crate) fn load_file_config(path: &Path) -> Result<FileConfig, StartupError> {
    match std::fs::read_to_string(path) {
        Ok(data) => serde_json::from_str(&data).map_err(|e| StartupError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
        Err(err) => Err(StartupError::Config {
            path: path.display().to_string(),
            reason: err.to_string(),
        }),
    }
}

pub(crate) fn save_file_config(
    path: &Path,
    config: &FileConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_file_config(&dir.path().join("nope.json")).unwrap();
        assert_eq!(cfg.activation_word, "friday");
        assert_eq!(cfg.model.max_tool_rounds, 8);
        assert_eq!(cfg.speech.listen_timeout_secs, 5);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("friday.json");
        std::fs::write(
            &path,
            r#"{"activation_word": "jarvis", "services": {"news_country": "us"}}"#,
        )
        .unwrap();
        let cfg = load_file_config(&path).unwrap();
        assert_eq!(cfg.activation_word, "jarvis");
        assert_eq!(cfg.services.news_country, "us");
        assert_eq!(cfg.services.news_category, "general");
        assert_eq!(cfg.paths.memory_file, PathBuf::from("data.txt"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("friday.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_file_config(&path),
            Err(StartupError::Config { .. })
        ));
    }

    #[test]
    fn save_then_load_preserves_apps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("friday.json");
        let cfg = FileConfig::default();
        save_file_config(&path, &cfg).unwrap();
        let loaded = load_file_config(&path).unwrap();
        assert!(loaded.commands.apps.contains_key("code"));
        assert!(loaded.commands.apps.contains_key("notepad"));
    }
}
