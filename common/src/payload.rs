// Payload transport decoding (raw or base64)

use crate::errors::PayloadError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Payload format value selecting raw (unencoded) transport
pub const PAYLOAD_FORMAT_RAW: &str = "raw";

/// Transport encoding of the payload flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// JSON passed as-is on the command line
    Raw,
    /// Standard base64 of the JSON document
    #[default]
    Base64,
}

impl PayloadFormat {
    /// Only the exact value `raw` selects raw transport; everything else is base64
    pub fn parse(value: &str) -> Self {
        if value == PAYLOAD_FORMAT_RAW {
            PayloadFormat::Raw
        } else {
            PayloadFormat::Base64
        }
    }
}

impl FromStr for PayloadFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadFormat::Raw => f.write_str("raw"),
            PayloadFormat::Base64 => f.write_str("base64"),
        }
    }
}

/// Remove the transport encoding; no JSON interpretation happens here
pub fn decode(payload: &str, format: PayloadFormat) -> Result<Vec<u8>, PayloadError> {
    match format {
        PayloadFormat::Raw => Ok(payload.as_bytes().to_vec()),
        PayloadFormat::Base64 => Ok(STANDARD.decode(payload)?),
    }
}
