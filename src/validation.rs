//! Request validation utilities.

use crate::types::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decode tool arguments into a parameter struct.
///
/// Missing arguments (`null`) decode as an empty object, so structs whose
/// fields are all optional accept a bare call.
pub fn parse_params<T: DeserializeOwned>(args: Value) -> Result<T> {
    let args = match args {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(args).map_err(|e| Error::invalid_params(e.to_string()))
}

/// Validate that a string is not empty.
pub fn validate_non_empty(s: &str, field: &str) -> Result<()> {
    if s.is_empty() {
        return Err(Error::invalid_params(format!("{} is required", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Params {
        name: String,
        #[serde(default)]
        limit: Option<u32>,
    }

    #[derive(Debug, Deserialize, Default)]
    struct Optional {
        #[serde(default)]
        limit: Option<u32>,
    }

    #[test]
    fn test_parse_params() {
        let p: Params = parse_params(json!({"name": "orders", "node": "beta@host"})).unwrap();
        assert_eq!(p.name, "orders");
        assert_eq!(p.limit, None);

        let err = parse_params::<Params>(json!({"limit": 3})).unwrap_err();
        assert!(matches!(err, Error::InvalidParams(_)));

        let p: Optional = parse_params(Value::Null).unwrap();
        assert_eq!(p.limit, None);
    }

    #[test]
    fn test_validate_non_empty() {
        assert!(validate_non_empty("x", "tool").is_ok());
        assert_eq!(
            validate_non_empty("", "tool").unwrap_err().to_string(),
            "invalid params: tool is required"
        );
    }
}
