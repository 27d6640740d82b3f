//! Helpers shared by the editable forms of every entity.

use bauxite_utils::{BauxiteError, BauxiteResult};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use validator::ValidationError;

/// Overlays the keys present in `changes` on the current form. A `null`
/// clears an optional field; absent keys keep their value.
pub fn merge_changes<T>(current: &T, changes: &Map<String, Value>) -> BauxiteResult<T>
where
    T: Serialize + DeserializeOwned,
{
    let mut merged = match serde_json::to_value(current)? {
        Value::Object(map) => map,
        _ => return Err(BauxiteError::internal("Form did not serialize to an object")),
    };

    for (key, value) in changes {
        if merged.contains_key(key) {
            merged.insert(key.clone(), value.clone());
        }
    }

    serde_json::from_value(Value::Object(merged)).map_err(|error| {
        BauxiteError::validation(format!("Invalid update payload: {}", error))
    })
}

pub(crate) fn validate_code_chars(code: &str) -> Result<(), ValidationError> {
    if bauxite_utils::is_valid_code(code) {
        Ok(())
    } else {
        Err(ValidationError::new("code_format"))
    }
}

pub(crate) fn default_one() -> i32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Form {
        name: String,
        code: Option<String>,
        berths: i32,
    }

    #[test]
    fn test_merge_overlays_and_clears() {
        let current = Form {
            name: "Sangaredi".to_string(),
            code: Some("SNG".to_string()),
            berths: 2,
        };
        let changes = json!({"code": null, "berths": 3, "unknown": true});
        let merged = merge_changes(&current, changes.as_object().unwrap()).unwrap();

        assert_eq!(
            merged,
            Form {
                name: "Sangaredi".to_string(),
                code: None,
                berths: 3,
            }
        );
    }

    #[test]
    fn test_merge_rejects_wrong_types() {
        let current = Form {
            name: "Sangaredi".to_string(),
            code: None,
            berths: 2,
        };
        let changes = json!({"berths": "many"});
        let error = merge_changes(&current, changes.as_object().unwrap()).unwrap_err();
        assert_eq!(error.http_status_code(), 400);
    }

    #[test]
    fn test_code_chars() {
        assert!(validate_code_chars("SNG-01").is_ok());
        assert!(validate_code_chars("SNG 01").is_err());
    }
}
