//! Incoming generation request

use serde::{de, Deserialize, Deserializer, Serialize};

pub const DEFAULT_MAX_TOKENS: i64 = 150;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TOP_P: f64 = 0.8;
pub const DEFAULT_TOP_K: i64 = 50;

/// A single ask request.
///
/// Numeric fields are kept signed and unvalidated here so that out-of-range
/// values reach [`crate::generation::map_params`] and fail there as
/// `InvalidParameter`. Missing or `null` fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawGenerationRequest")]
pub struct GenerationRequest {
    pub prompt: String,
    pub nearby_place: Option<String>,
    pub max_tokens: i64,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: i64,
}

#[derive(Deserialize)]
struct RawGenerationRequest {
    prompt: String,
    #[serde(default)]
    nearby_place: Option<String>,
    #[serde(default, deserialize_with = "whole_number")]
    max_tokens: Option<i64>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    top_p: Option<f64>,
    #[serde(default, deserialize_with = "whole_number")]
    top_k: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Int(i64),
    Float(f64),
}

/// Integer field that also accepts a float with no fractional part, e.g. `100.0`
fn whole_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Number>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Number::Int(value)) => Ok(Some(value)),
        Some(Number::Float(value))
            if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 =>
        {
            Ok(Some(value as i64))
        }
        Some(Number::Float(value)) => Err(de::Error::custom(format!(
            "expected an integer, got {}",
            value
        ))),
    }
}

impl From<RawGenerationRequest> for GenerationRequest {
    fn from(raw: RawGenerationRequest) -> Self {
        Self {
            prompt: raw.prompt,
            nearby_place: raw.nearby_place,
            max_tokens: raw.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: raw.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            top_p: raw.top_p.unwrap_or(DEFAULT_TOP_P),
            top_k: raw.top_k.unwrap_or(DEFAULT_TOP_K),
        }
    }
}

impl GenerationRequest {
    /// Create a request with default sampling controls and no place hint
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            nearby_place: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Attach a nearby place hint
    pub fn with_nearby_place(mut self, place: impl Into<String>) -> Self {
        self.nearby_place = Some(place.into());
        self
    }

    /// The nearby place hint, if any
    pub fn nearby_place(&self) -> Option<&str> {
        self.nearby_place.as_deref()
    }
}
