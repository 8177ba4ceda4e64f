use crate::{Capability, CapabilitySchema, ParameterKind, ParameterSchema, ParameterSpec};

pub(crate) const VOLUME_DIRECTIONS: &[&str] = &["up", "down", "mute"];
pub(crate) const NEWS_CATEGORIES: &[&str] = &[
    "general",
    "business",
    "entertainment",
    "health",
    "science",
    "sports",
    "technology",
];

const fn string(name: &'static str, required: bool, description: &'static str) -> ParameterSpec {
    ParameterSpec {
        name,
        kind: ParameterKind::String,
        required,
        description,
    }
}

const fn one_of(
    name: &'static str,
    values: &'static [&'static str],
    required: bool,
    description: &'static str,
) -> ParameterSpec {
    ParameterSpec {
        name,
        kind: ParameterKind::Enum(values),
        required,
        description,
    }
}

fn capability(
    name: &'static str,
    description: &'static str,
    apology: &'static str,
    parameters: Vec<ParameterSpec>,
) -> Capability {
    Capability {
        name,
        description,
        parameters,
        apology,
    }
}

/// Every capability the reasoning service may invoke, in catalog order.
pub(crate) fn capability_registry() -> Vec<Capability> {
    vec![
        // Web & search
        capability(
            "handle_wikipedia",
            "Get a brief summary of a topic from Wikipedia.",
            "find that on Wikipedia",
            vec![string("topic", true, "The topic to search for")],
        ),
        capability(
            "handle_youtube",
            "Open YouTube and search for a video.",
            "open YouTube",
            vec![string("search_query", true, "The search term for the video")],
        ),
        capability(
            "handle_google",
            "Perform a Google search in the browser for a given query.",
            "perform the Google search",
            vec![string("search_query", true, "The term to search on Google")],
        ),
        capability(
            "handle_open_web",
            "Open a specific website in the browser.",
            "open that website",
            vec![string(
                "site_name",
                true,
                "The name of the site (e.g., 'google', 'gmail')",
            )],
        ),
        // System & OS
        capability(
            "handle_open_app",
            "Opens a local application like VS Code or Notepad.",
            "open that app",
            vec![string(
                "app_name",
                true,
                "The name of the app (e.g., 'code', 'notepad')",
            )],
        ),
        capability(
            "handle_open_camera",
            "Open the computer's webcam.",
            "open the camera",
            Vec::new(),
        ),
        capability(
            "handle_battery",
            "Get the current battery percentage of the laptop.",
            "retrieve battery information",
            Vec::new(),
        ),
        capability(
            "handle_internet_speed",
            "Test the current internet download and upload speed.",
            "test the internet speed",
            Vec::new(),
        ),
        capability(
            "handle_screenshot",
            "Take a screenshot of the entire screen and save it.",
            "take a screenshot",
            Vec::new(),
        ),
        capability(
            "handle_volume",
            "Adjust the system volume.",
            "change the volume",
            vec![one_of(
                "direction",
                VOLUME_DIRECTIONS,
                true,
                "e.g., 'up', 'down', or 'mute'",
            )],
        ),
        capability(
            "handle_sleep",
            "Stop the assistant and put it in sleep mode.",
            "go to sleep",
            Vec::new(),
        ),
        // Productivity
        capability(
            "handle_time",
            "Get the current time.",
            "tell the time",
            Vec::new(),
        ),
        capability(
            "handle_calculate",
            "Calculate a simple arithmetic expression (e.g., '5 plus 2').",
            "calculate that",
            vec![string(
                "expression",
                true,
                "The expression to calculate, e.g., '10 times 5'",
            )],
        ),
        capability(
            "handle_convert",
            "Perform a unit conversion.",
            "convert those units",
            vec![string(
                "conversion_query",
                true,
                "The conversion to perform, e.g., '10 meters to feet'",
            )],
        ),
        capability(
            "handle_translate",
            "Translate text from English to another language.",
            "translate that",
            vec![
                string("text", true, "The text to translate"),
                string(
                    "target_language",
                    true,
                    "The target language (e.g., 'hindi', 'french')",
                ),
            ],
        ),
        capability(
            "handle_remember",
            "Remember a short piece of information.",
            "write that to my memory",
            vec![string("text_to_remember", true, "The information to save")],
        ),
        capability(
            "handle_recall",
            "Retrieve the information that was saved.",
            "recall that",
            Vec::new(),
        ),
        capability(
            "handle_read_pdf",
            "Read the first page of a PDF file from the local PDF directory.",
            "read that PDF",
            vec![string(
                "pdf_name",
                true,
                "The name of the PDF file (without .pdf)",
            )],
        ),
        // Information & fun
        capability(
            "handle_weather",
            "Get the current weather for a specific city.",
            "get the weather",
            vec![string("city", true, "The city name")],
        ),
        capability(
            "handle_news",
            "Get the top news headlines.",
            "get the news",
            vec![
                one_of(
                    "category",
                    NEWS_CATEGORIES,
                    false,
                    "e.g., 'general', 'business', 'technology'",
                ),
                string("country", false, "e.g., 'in' (India), 'us' (USA)"),
            ],
        ),
        capability(
            "handle_play_music",
            "Play a random song from the user's music directory.",
            "play music",
            Vec::new(),
        ),
        capability(
            "handle_joke",
            "Tell a random programming joke.",
            "think of a joke",
            Vec::new(),
        ),
        capability(
            "handle_wikihow",
            "Find a 'how-to' guide from WikiHow.",
            "find this on WikiHow",
            vec![string("task", true, "The task to learn, e.g., 'tie a tie'")],
        ),
    ]
}

/// The provider-neutral wire schema; stable for the life of a session.
pub(crate) fn capability_schemas(registry: &[Capability]) -> Vec<CapabilitySchema> {
    registry
        .iter()
        .map(|cap| CapabilitySchema {
            name: cap.name.to_string(),
            description: cap.description.to_string(),
            parameters: cap
                .parameters
                .iter()
                .map(|p| {
                    let (kind, values) = match p.kind {
                        ParameterKind::String => ("string", Vec::new()),
                        ParameterKind::Enum(values) => {
                            ("enum", values.iter().map(|v| v.to_string()).collect())
                        }
                    };
                    ParameterSchema {
                        name: p.name.to_string(),
                        kind: kind.to_string(),
                        required: p.required,
                        description: p.description.to_string(),
                        values,
                    }
                })
                .collect(),
        })
        .collect()
}

/// JSON-schema style declaration, shape shared by function-calling providers.
pub(crate) fn schema_to_declaration(schema: &CapabilitySchema) -> serde_json::Value {
    let mut decl = serde_json::json!({
        "name": schema.name,
        "description": schema.description,
    });
    if schema.parameters.is_empty() {
        return decl;
    }
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for param in &schema.parameters {
        let mut prop = serde_json::json!({
            "type": "STRING",
            "description": param.description,
        });
        if !param.values.is_empty() {
            prop["format"] = serde_json::json!("enum");
            prop["enum"] = serde_json::json!(param.values);
        }
        properties.insert(param.name.clone(), prop);
        if param.required {
            required.push(param.name.clone());
        }
    }
    decl["parameters"] = serde_json::json!({
        "type": "OBJECT",
        "properties": properties,
        "required": required,
    });
    decl
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn capability_names_are_unique() {
        let registry = capability_registry();
        let names: HashSet<_> = registry.iter().map(|c| c.name).collect();
        assert_eq!(names.len(), registry.len());
        assert_eq!(registry.len(), 23);
    }

    #[test]
    fn weather_requires_city() {
        let registry = capability_registry();
        let weather = registry.iter().find(|c| c.name == "handle_weather").unwrap();
        let city = weather.parameter("city").expect("city param");
        assert!(city.required);
    }

    #[test]
    fn news_parameters_are_optional() {
        let registry = capability_registry();
        let news = registry.iter().find(|c| c.name == "handle_news").unwrap();
        assert!(news.parameters.iter().all(|p| !p.required));
    }

    #[test]
    fn parameterless_declaration_omits_parameters() {
        let schemas = capability_schemas(&capability_registry());
        let time = schemas.iter().find(|s| s.name == "handle_time").unwrap();
        let decl = schema_to_declaration(time);
        assert!(decl.get("parameters").is_none());
        assert_eq!(decl["name"], "handle_time");
    }

    #[test]
    fn enum_parameter_declares_values() {
        let schemas = capability_schemas(&capability_registry());
        let volume = schemas.iter().find(|s| s.name == "handle_volume").unwrap();
        assert_eq!(volume.parameters[0].kind, "enum");
        let decl = schema_to_declaration(volume);
        assert_eq!(
            decl["parameters"]["properties"]["direction"]["enum"],
            serde_json::json!(["up", "down", "mute"])
        );
        assert_eq!(decl["parameters"]["required"], serde_json::json!(["direction"]));
    }

    #[test]
    fn schema_serializes_as_wire_records() {
        let schemas = capability_schemas(&capability_registry());
        let weather = schemas.iter().find(|s| s.name == "handle_weather").unwrap();
        let value = serde_json::to_value(weather).unwrap();
        assert_eq!(
            value["parameters"][0],
            serde_json::json!({
                "name": "city",
                "type": "string",
                "required": true,
                "description": "The city name"
            })
        );
    }
}
