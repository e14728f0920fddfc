//! Embedded `data:` URIs.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use crate::asset::percent_decode;
use crate::error::ParseError;

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);
const URL_SAFE: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);

pub fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

/// Decode `data:[<mime>][;base64],<payload>` into bytes.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, ParseError> {
    let rest = uri.strip_prefix("data:").ok_or_else(|| ParseError::DataUri {
        detail: "missing data: scheme".to_string(),
    })?;
    let (header, payload) = rest.split_once(',').ok_or_else(|| ParseError::DataUri {
        detail: "missing ',' separator".to_string(),
    })?;
    if header.ends_with(";base64") {
        decode_base64(payload)
    } else {
        Ok(percent_decode(payload).into_bytes())
    }
}

/// Standard or URL-safe alphabet, padding optional.
fn decode_base64(payload: &str) -> Result<Vec<u8>, ParseError> {
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let engine = if compact.contains(['-', '_']) {
        &URL_SAFE
    } else {
        &STANDARD
    };
    engine.decode(compact).map_err(|e| ParseError::DataUri {
        detail: e.to_string(),
    })
}
