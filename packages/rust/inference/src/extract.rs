//! Response-unwrapping parser for model output.
//!
//! Models return JSON wrapped in markdown fences, prose preambles, or
//! nothing at all. Every stage funnels raw text through here: locate the
//! outermost brace-delimited object, parse it, and surface a typed error
//! the caller records as its fallback reason.

use serde::de::DeserializeOwned;

/// Why a raw model response yielded no usable payload.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The response contains no brace-delimited object at all.
    #[error("no JSON object in model response")]
    NoPayload,

    /// A candidate object was found but did not parse or deserialize.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Extract the outermost JSON object from a raw model response.
///
/// Handles bare objects, ```-fenced blocks (with or without a language
/// tag), and prose-wrapped payloads by slicing from the first `{` to the
/// last `}`.
pub fn extract_json_payload(raw: &str) -> Result<serde_json::Value, ExtractError> {
    let start = raw.find('{').ok_or(ExtractError::NoPayload)?;
    let end = raw.rfind('}').ok_or(ExtractError::NoPayload)?;
    if end < start {
        return Err(ExtractError::NoPayload);
    }

    serde_json::from_str(&raw[start..=end]).map_err(|e| ExtractError::Malformed(e.to_string()))
}

/// Extract and deserialize a stage payload in one step. Missing or
/// mistyped keys are [`ExtractError::Malformed`].
pub fn parse_stage<T: DeserializeOwned>(raw: &str) -> Result<T, ExtractError> {
    let value = extract_json_payload(raw)?;
    serde_json::from_value(value).map_err(|e| ExtractError::Malformed(e.to_string()))
}
