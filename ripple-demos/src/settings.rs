//! Demo settings.
//!
//! Read from the process environment after loading a `.env` file from the
//! working directory, if one exists. Keys are matched case-insensitively.

use crate::error::DemoError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

impl Settings {
    /// Load `.env` (if present) and read the environment.
    pub fn load() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_vars(std::env::vars())
    }

    /// Build settings from `(key, value)` pairs. Unknown keys are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut settings = Self::default();
        for (key, value) in vars {
            let key = key.as_ref().to_ascii_uppercase();
            match key.as_str() {
                "OPENAI_API_KEY" => settings.openai_api_key = Some(value.into()),
                "OPENAI_BASE_URL" => settings.openai_base_url = value.into(),
                "OPENAI_MODEL" => settings.model = value.into(),
                _ => {}
            }
        }
        settings
    }

    /// The API key, if set to something non-blank.
    pub fn api_key(&self) -> Result<&str, DemoError> {
        self.openai_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(DemoError::MissingApiKey)
    }
}
