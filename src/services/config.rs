use std::env;
use std::fs;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(String),
    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Application settings. Every field has a default so an empty file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub geocoding: GeocodingConfig,
    pub weather: WeatherConfig,
    pub economic: EconomicConfig,
    pub demographics: DemographicsConfig,
    pub llm: LlmConfig,
    pub model_service: ModelServiceConfig,
    pub context: ContextConfig,
}

impl AppConfig {
    pub fn from_yaml_file(filepath: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(filepath).map_err(|err| ConfigError::Io(err.to_string()))?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    pub fn load(filepath: Option<&str>) -> Result<Self, ConfigError> {
        match filepath {
            Some(path) => Self::from_yaml_file(path),
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    pub search_url: String,
    pub country_codes: String,
    pub user_agent: String,
    pub min_interval_ms: u64,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub bbox_ttl_secs: u64,
    pub use_fallback: bool,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            search_url: "https://nominatim.openstreetmap.org/search".to_string(),
            country_codes: "mg".to_string(),
            user_agent: "revsim/0.1 (municipal revenue simulation)".to_string(),
            min_interval_ms: 1000,
            timeout_secs: 10,
            max_attempts: 3,
            bbox_ttl_secs: 3600,
            use_fallback: true,
        }
    }
}

impl GeocodingConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub current_url: String,
    pub units: String,
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            current_url: "https://api.openweathermap.org/data/2.5/weather".to_string(),
            units: "metric".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomicConfig {
    /// `{country}` and `{indicator}` are substituted.
    pub indicator_url_template: String,
    pub canonical_url_template: String,
    pub imf_url_template: Option<String>,
    pub timeout_secs: u64,
    pub recent_points: usize,
    pub target_year: i32,
}

impl Default for EconomicConfig {
    fn default() -> Self {
        Self {
            indicator_url_template:
                "https://api.worldbank.org/v2/country/{country}/indicator/{indicator}?format=json&per_page=100"
                    .to_string(),
            canonical_url_template:
                "https://api.worldbank.org/v2/country/{country}/indicator/{indicator}?format=json&per_page=100"
                    .to_string(),
            imf_url_template: None,
            timeout_secs: 12,
            recent_points: 3,
            target_year: 2024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemographicsConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for DemographicsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://restcountries.com/v3.1".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    #[default]
    Gemini,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub openai_url: String,
    pub openai_model: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProviderKind::Gemini,
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            gemini_model: "gemini-2.5-flash".to_string(),
            openai_url: "https://api.openai.com/v1/chat/completions".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            max_retries: 3,
            timeout_secs: 30,
            temperature: 0.2,
            max_output_tokens: 800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelServiceConfig {
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ModelServiceConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub cache_ttl_secs: u64,
    pub default_currency: String,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            default_currency: "MGA".to_string(),
        }
    }
}

/// Provider secrets. Only ever read from the environment.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub openweather: Option<String>,
    pub gemini: Option<String>,
    pub openai: Option<String>,
    pub imf: Option<String>,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        Self {
            openweather: non_empty_var("OPENWEATHER_API_KEY"),
            gemini: non_empty_var("GEMINI_API_KEY"),
            openai: non_empty_var("OPENAI_API_KEY"),
            imf: non_empty_var("IMF_API_KEY"),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
