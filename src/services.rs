use std::io::Read;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;

use crate::config_file::ServiceConfig;
use crate::{strip_html, ServiceError};

const WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";
const NEWS_URL: &str = "https://newsapi.org/v2/top-headlines";
const WIKIPEDIA_SUMMARY_URL: &str = "https://en.wikipedia.org/api/rest_v1/page/summary";
const WIKIPEDIA_API_URL: &str = "https://en.wikipedia.org/w/api.php";
const WIKIHOW_API_URL: &str = "https://www.wikihow.com/api.php";
const TRANSLATE_URL: &str = "https://translate.googleapis.com/translate_a/single";

pub(crate) fn build_http_agent(timeout_secs: u64) -> ureq::Agent {
    let timeout = Duration::from_secs(timeout_secs.max(1));
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent(concat!("friday/", env!("CARGO_PKG_VERSION")))
        .build()
}

// === Weather ===

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    weather: Vec<WeatherCondition>,
    main: WeatherMain,
}

#[derive(Debug, Deserialize)]
struct WeatherCondition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct WeatherMain {
    temp: f64,
    humidity: f64,
}

fn describe_weather(city: &str, body: &Value) -> Result<String, ServiceError> {
    let parsed: WeatherResponse = serde_json::from_value(body.clone())
        .map_err(|e| ServiceError::Internal(format!("unexpected weather response: {e}")))?;
    let description = parsed
        .weather
        .first()
        .map(|w| w.description.as_str())
        .unwrap_or("unknown");
    Ok(format!(
        "The weather in {city} is {description}. The temperature is {} degrees Celsius, \
         with {} percent humidity.",
        parsed.main.temp, parsed.main.humidity
    ))
}

pub(crate) fn get_weather(
    agent: &ureq::Agent,
    cfg: &ServiceConfig,
    city: &str,
) -> Result<String, ServiceError> {
    let key = cfg
        .weather_api_key
        .as_deref()
        .ok_or(ServiceError::NotConfigured("The weather API key"))?;
    let body: Value = agent
        .get(WEATHER_URL)
        .query("q", city)
        .query("appid", key)
        .query("units", "metric")
        .call()?
        .into_json()?;
    describe_weather(city, &body)
}

// === News ===

fn format_headlines(body: &Value) -> String {
    let titles: Vec<&str> = body
        .get("articles")
        .and_then(|a| a.as_array())
        .map(|articles| {
            articles
                .iter()
                .map(|a| a.get("title").and_then(|t| t.as_str()).unwrap_or("No Title"))
                .collect()
        })
        .unwrap_or_default();
    if titles.is_empty() {
        return "No news articles found.".to_string();
    }
    let mut parts = vec!["Here are the top headlines:".to_string()];
    for (i, title) in titles.iter().enumerate() {
        parts.push(format!("Headline {}: {title}.", i + 1));
    }
    parts.join(" ")
}

pub(crate) fn get_news(
    agent: &ureq::Agent,
    cfg: &ServiceConfig,
    category: Option<&str>,
    country: Option<&str>,
) -> Result<String, ServiceError> {
    let key = cfg
        .news_api_key
        .as_deref()
        .ok_or(ServiceError::NotConfigured("The news API key"))?;
    let category = category.unwrap_or(&cfg.news_category).to_lowercase();
    let country = country.unwrap_or(&cfg.news_country).to_lowercase();
    let body: Value = agent
        .get(NEWS_URL)
        .query("apiKey", key)
        .query("country", &country)
        .query("category", &category)
        .query("pageSize", &cfg.news_articles.to_string())
        .call()?
        .into_json()?;
    Ok(format_headlines(&body))
}

// === Wikipedia ===

/// First `count` sentences, split on ". " boundaries.
pub(crate) fn first_sentences(text: &str, count: usize) -> String {
    let mut out = String::new();
    let mut taken = 0;
    let mut rest = text.trim();
    while taken < count && !rest.is_empty() {
        match rest.find(". ") {
            Some(idx) => {
                out.push_str(&rest[..=idx]);
                rest = rest[idx + 1..].trim_start();
                taken += 1;
                if taken < count && !rest.is_empty() {
                    out.push(' ');
                }
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out.trim().to_string()
}

fn wikipedia_alternatives(agent: &ureq::Agent, topic: &str) -> Vec<String> {
    let body: Option<Value> = agent
        .get(WIKIPEDIA_API_URL)
        .query("action", "opensearch")
        .query("search", topic)
        .query("limit", "3")
        .query("format", "json")
        .call()
        .ok()
        .and_then(|resp| resp.into_json().ok());
    body.as_ref()
        .and_then(|v| v.get(1))
        .and_then(|v| v.as_array())
        .map(|titles| {
            titles
                .iter()
                .filter_map(|t| t.as_str())
                .filter(|t| !t.eq_ignore_ascii_case(topic))
                .map(|t| t.to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn ambiguity_reply(topic: &str, options: &[String]) -> String {
    match options {
        [first, second, ..] => {
            format!("That topic is ambiguous. It could mean: {first}, or {second}.")
        }
        [only] => format!("That topic is ambiguous. Did you mean {only}?"),
        [] => format!("That topic is ambiguous. Please be more specific about {topic}."),
    }
}

pub(crate) fn wikipedia_summary(agent: &ureq::Agent, topic: &str) -> Result<String, ServiceError> {
    let title = topic.trim().replace(' ', "_");
    let url = format!("{WIKIPEDIA_SUMMARY_URL}/{}", urlencoding::encode(&title));
    let body: Value = match agent.get(&url).call() {
        Ok(resp) => resp.into_json()?,
        Err(ureq::Error::Status(404, _)) => {
            return Ok(format!(
                "Sorry, I could not find any Wikipedia page for {topic}."
            ));
        }
        Err(err) => return Err(err.into()),
    };
    if body.get("type").and_then(|t| t.as_str()) == Some("disambiguation") {
        return Ok(ambiguity_reply(topic, &wikipedia_alternatives(agent, topic)));
    }
    let extract = body.get("extract").and_then(|e| e.as_str()).unwrap_or("");
    if extract.trim().is_empty() {
        return Ok(format!(
            "Sorry, I could not find any Wikipedia page for {topic}."
        ));
    }
    Ok(format!("According to Wikipedia, {}", first_sentences(extract, 2)))
}

// === wikiHow ===

fn summarize_wikihow(task: &str, body: &Value) -> String {
    let hit = body
        .pointer("/query/search/0")
        .and_then(|h| h.as_object());
    match hit {
        Some(hit) => {
            let title = hit.get("title").and_then(|t| t.as_str()).unwrap_or(task);
            let snippet = hit
                .get("snippet")
                .and_then(|s| s.as_str())
                .map(strip_html)
                .unwrap_or_default();
            if snippet.is_empty() {
                format!("Here is a summary for {task}: How to {title}.")
            } else {
                format!("Here is a summary for {task}: How to {title}. {snippet}")
            }
        }
        None => format!("Sorry, I couldn't find a how-to guide for {task}."),
    }
}

pub(crate) fn wikihow_search(agent: &ureq::Agent, task: &str) -> Result<String, ServiceError> {
    let body: Value = agent
        .get(WIKIHOW_API_URL)
        .query("action", "query")
        .query("list", "search")
        .query("srsearch", task)
        .query("srlimit", "1")
        .query("format", "json")
        .call()?
        .into_json()?;
    Ok(summarize_wikihow(task, &body))
}

// === Translation ===

const LANGUAGES: &[(&str, &str)] = &[
    ("arabic", "ar"),
    ("bengali", "bn"),
    ("chinese", "zh-CN"),
    ("dutch", "nl"),
    ("english", "en"),
    ("french", "fr"),
    ("german", "de"),
    ("greek", "el"),
    ("gujarati", "gu"),
    ("hindi", "hi"),
    ("italian", "it"),
    ("japanese", "ja"),
    ("kannada", "kn"),
    ("korean", "ko"),
    ("malayalam", "ml"),
    ("marathi", "mr"),
    ("nepali", "ne"),
    ("portuguese", "pt"),
    ("punjabi", "pa"),
    ("russian", "ru"),
    ("spanish", "es"),
    ("tamil", "ta"),
    ("telugu", "te"),
    ("turkish", "tr"),
    ("urdu", "ur"),
];

pub(crate) fn language_code(language: &str) -> Option<String> {
    let language = language.trim().to_lowercase();
    if let Some((_, code)) = LANGUAGES.iter().find(|(name, _)| *name == language) {
        return Some(code.to_string());
    }
    LANGUAGES
        .iter()
        .find(|(_, code)| code.eq_ignore_ascii_case(&language))
        .map(|(_, code)| code.to_string())
}

fn parse_translation(body: &Value) -> Option<String> {
    let segments = body.get(0)?.as_array()?;
    let text: String = segments
        .iter()
        .filter_map(|seg| seg.get(0).and_then(|s| s.as_str()))
        .collect();
    if text.trim().is_empty() { None } else { Some(text) }
}

pub(crate) fn translate(
    agent: &ureq::Agent,
    text: &str,
    target_language: &str,
) -> Result<String, ServiceError> {
    let code = language_code(target_language).ok_or_else(|| {
        ServiceError::InvalidInput(format!("I don't know the language {target_language}."))
    })?;
    let body: Value = agent
        .get(TRANSLATE_URL)
        .query("client", "gtx")
        .query("sl", "auto")
        .query("tl", &code)
        .query("dt", "t")
        .query("q", text)
        .call()?
        .into_json()?;
    let translated = parse_translation(&body)
        .ok_or_else(|| ServiceError::Api("the translation came back empty".to_string()))?;
    Ok(format!("The translation is: {translated}"))
}

// === Internet speed ===

fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64().max(1e-3);
    let raw = bytes as f64 * 8.0 / secs / 1_000_000.0;
    (raw * 100.0).round() / 100.0
}

pub(crate) fn measure_speed(
    agent: &ureq::Agent,
    cfg: &ServiceConfig,
) -> Result<String, ServiceError> {
    let started = Instant::now();
    let resp = agent.get(&cfg.speed_download_url).call()?;
    let mut reader = resp.into_reader();
    let mut buffer = [0_u8; 64 * 1024];
    let mut downloaded: u64 = 0;
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        downloaded += n as u64;
    }
    let download = mbps(downloaded, started.elapsed());

    let payload = vec![0_u8; cfg.speed_upload_bytes];
    let started = Instant::now();
    agent
        .post(&cfg.speed_upload_url)
        .set("content-type", "application/octet-stream")
        .send_bytes(&payload)?;
    let upload = mbps(payload.len() as u64, started.elapsed());
    tracing::info!(download, upload, "speed test finished");

    Ok(format!(
        "Sir, we have {download} megabits per second downloading speed and \
         {upload} megabits per second uploading speed"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn weather_sentence() {
        let body = json!({
            "weather": [{"description": "light rain"}],
            "main": {"temp": 21.5, "humidity": 80}
        });
        assert_eq!(
            describe_weather("Pune", &body).unwrap(),
            "The weather in Pune is light rain. The temperature is 21.5 degrees Celsius, with 80 percent humidity."
        );
    }

    #[test]
    fn headlines_are_numbered() {
        let body = json!({"articles": [{"title": "A"}, {"title": "B"}, {}]});
        assert_eq!(
            format_headlines(&body),
            "Here are the top headlines: Headline 1: A. Headline 2: B. Headline 3: No Title."
        );
        assert_eq!(format_headlines(&json!({"articles": []})), "No news articles found.");
    }

    #[test]
    fn first_two_sentences() {
        let text = "Rust is a language. It is fast. It is safe.";
        assert_eq!(first_sentences(text, 2), "Rust is a language. It is fast.");
        assert_eq!(first_sentences("Only one", 2), "Only one");
    }

    #[test]
    fn ambiguity_names_options() {
        let opts = vec!["Mercury (planet)".to_string(), "Mercury (element)".to_string()];
        assert_eq!(
            ambiguity_reply("mercury", &opts),
            "That topic is ambiguous. It could mean: Mercury (planet), or Mercury (element)."
        );
    }

    #[test]
    fn wikihow_summary_strips_markup() {
        let body = json!({"query": {"search": [
            {"title": "Tie a Tie", "snippet": "Drape the <span>tie</span> around your neck"}
        ]}});
        assert_eq!(
            summarize_wikihow("tie a tie", &body),
            "Here is a summary for tie a tie: How to Tie a Tie. Drape the tie around your neck"
        );
        assert_eq!(
            summarize_wikihow("fly", &json!({"query": {"search": []}})),
            "Sorry, I couldn't find a how-to guide for fly."
        );
    }

    #[test]
    fn translation_segments_are_joined() {
        let body = json!([[["Bonjour ", "Hello ", null], ["le monde", "world", null]], null, "en"]);
        assert_eq!(parse_translation(&body).as_deref(), Some("Bonjour le monde"));
    }

    #[test]
    fn language_names_and_codes() {
        assert_eq!(language_code("Hindi").as_deref(), Some("hi"));
        assert_eq!(language_code("fr").as_deref(), Some("fr"));
        assert_eq!(language_code("klingon"), None);
    }

    #[test]
    fn speed_is_rounded_megabits() {
        assert_eq!(mbps(1_250_000, Duration::from_secs(1)), 10.0);
        assert_eq!(mbps(1_000_000, Duration::from_secs(3)), 2.67);
    }
}
