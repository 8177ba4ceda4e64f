use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct WikipediaArgs {
    pub(crate) topic: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchArgs {
    pub(crate) search_query: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenWebArgs {
    pub(crate) site_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAppArgs {
    pub(crate) app_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VolumeArgs {
    pub(crate) direction: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CalculateArgs {
    pub(crate) expression: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConvertArgs {
    pub(crate) conversion_query: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TranslateArgs {
    pub(crate) text: String,
    pub(crate) target_language: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RememberArgs {
    pub(crate) text_to_remember: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReadPdfArgs {
    pub(crate) pdf_name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WeatherArgs {
    pub(crate) city: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewsArgs {
    #[serde(default)]
    pub(crate) category: Option<String>,
    #[serde(default)]
    pub(crate) country: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WikihowArgs {
    pub(crate) task: String,
}
