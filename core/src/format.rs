//! Response decoding selected by the client's return format.
//!
//! The set of decoders is closed: parsed JSON, raw text, or nothing.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::DdError;

/// How response bodies are handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnFormat {
    #[default]
    Json,
    Text,
    None,
}

impl ReturnFormat {
    pub fn decode(self, body: &str) -> Result<DdResponse, DdError> {
        match self {
            ReturnFormat::Json => serde_json::from_str(body)
                .map(DdResponse::Json)
                .map_err(|e| DdError::Deserialization(e.to_string())),
            ReturnFormat::Text => Ok(DdResponse::Text(body.to_string())),
            ReturnFormat::None => Ok(DdResponse::None),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReturnFormat::Json => "json",
            ReturnFormat::Text => "text",
            ReturnFormat::None => "none",
        }
    }
}

impl fmt::Display for ReturnFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnFormat {
    type Err = DdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ReturnFormat::Json),
            "text" => Ok(ReturnFormat::Text),
            "none" => Ok(ReturnFormat::None),
            _ => Err(DdError::InvalidReturnFormat(s.to_string())),
        }
    }
}

/// Numeric codes 0, 1, 2 for json, text, none.
impl TryFrom<u8> for ReturnFormat {
    type Error = DdError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(ReturnFormat::Json),
            1 => Ok(ReturnFormat::Text),
            2 => Ok(ReturnFormat::None),
            other => Err(DdError::InvalidReturnFormat(other.to_string())),
        }
    }
}

/// A decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum DdResponse {
    Json(Value),
    Text(String),
    None,
}

impl DdResponse {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            DdResponse::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_json(self) -> Option<Value> {
        match self {
            DdResponse::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DdResponse::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, DdResponse::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{"status":{"code":200,"msg":"OK"}}"#;

    #[test]
    fn json_format_parses_body() {
        let decoded = ReturnFormat::Json.decode(BODY).unwrap();
        assert_eq!(decoded.as_json().unwrap()["status"]["code"], 200);
    }

    #[test]
    fn text_format_keeps_raw_body() {
        let decoded = ReturnFormat::Text.decode(BODY).unwrap();
        assert_eq!(decoded.as_text(), Some(BODY));
    }

    #[test]
    fn none_format_discards_body() {
        assert!(ReturnFormat::None.decode(BODY).unwrap().is_none());
        assert!(ReturnFormat::None.decode("not json").unwrap().is_none());
    }

    #[test]
    fn json_format_rejects_bad_body() {
        let err = ReturnFormat::Json.decode("not json").unwrap_err();
        assert!(matches!(err, DdError::Deserialization(_)));
    }

    #[test]
    fn parse_accepts_known_names_only() {
        assert_eq!("JSON".parse::<ReturnFormat>().unwrap(), ReturnFormat::Json);
        assert_eq!("text".parse::<ReturnFormat>().unwrap(), ReturnFormat::Text);
        assert_eq!("none".parse::<ReturnFormat>().unwrap(), ReturnFormat::None);
        let err = "xml".parse::<ReturnFormat>().unwrap_err();
        assert!(matches!(err, DdError::InvalidReturnFormat(_)));
    }

    #[test]
    fn numeric_codes_match_legacy_constants() {
        assert_eq!(ReturnFormat::try_from(0).unwrap(), ReturnFormat::Json);
        assert_eq!(ReturnFormat::try_from(1).unwrap(), ReturnFormat::Text);
        assert_eq!(ReturnFormat::try_from(2).unwrap(), ReturnFormat::None);
        assert!(ReturnFormat::try_from(3).unwrap_err().is_config_error());
    }
}
