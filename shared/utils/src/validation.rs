use crate::error::{BauxiteError, BauxiteResult};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

static CODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("code pattern is a valid regex")
});

pub fn validate_model<T: Validate>(model: &T) -> BauxiteResult<()> {
    match model.validate() {
        Ok(()) => Ok(()),
        Err(errors) => Err(BauxiteError::validation_errors(format_validation_errors(
            &errors,
        ))),
    }
}

/// Flattens validator output into human readable messages, nested structs
/// and list items included. Output is sorted so responses are stable.
pub fn format_validation_errors(errors: &ValidationErrors) -> Vec<String> {
    let mut messages = Vec::new();
    collect_messages(None, errors, &mut messages);
    messages.sort();
    messages
}

fn collect_messages(prefix: Option<&str>, errors: &ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = match prefix {
            Some(prefix) if *field == "__all__" => prefix.to_string(),
            Some(prefix) => format!("{}.{}", prefix, field),
            None => field.to_string(),
        };

        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    if let Some(message) = &error.message {
                        out.push(message.to_string());
                        continue;
                    }
                    let message = match &*error.code {
                        "length" => format!("Length validation failed for field '{}'", path),
                        "range" => format!("Value out of range for field '{}'", path),
                        "required" => format!("Field '{}' is required", path),
                        "regex" => format!("Invalid format for field '{}'", path),
                        code => format!("Validation failed for field '{}': {}", path, code),
                    };
                    out.push(message);
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_messages(Some(&path), nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    let item_path = format!("{}[{}]", path, index);
                    collect_messages(Some(&item_path), nested, out);
                }
            }
        }
    }
}

/// Trims every string in a JSON document. Empty strings become `null` so
/// optional fields sent as `""` are treated as absent.
pub fn sanitize_json(value: Value) -> Value {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Value::Null
            } else {
                Value::String(trimmed.to_string())
            }
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_json).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, sanitize_json(value)))
                .collect(),
        ),
        other => other,
    }
}

pub fn is_valid_code(code: &str) -> bool {
    CODE_REGEX.is_match(code)
}

pub fn validate_code_format(field: &str, code: &str) -> BauxiteResult<()> {
    if !is_valid_code(code) {
        return Err(BauxiteError::validation(format!(
            "{} may only contain letters, digits, '.', '_' and '-'",
            field
        )));
    }
    Ok(())
}

pub fn validate_date_range(start_date: NaiveDate, end_date: NaiveDate) -> BauxiteResult<()> {
    if start_date >= end_date {
        return Err(BauxiteError::validation("start_date must be before end_date"));
    }

    Ok(())
}

pub fn validate_required_fields(data: &Map<String, Value>, required_fields: &[&str]) -> BauxiteResult<()> {
    let missing_fields: Vec<&str> = required_fields
        .iter()
        .filter(|field| data.get(**field).map_or(true, Value::is_null))
        .copied()
        .collect();

    if !missing_fields.is_empty() {
        return Err(BauxiteError::validation(format!(
            "Missing required fields: {}",
            missing_fields.join(", ")
        )));
    }

    Ok(())
}

/// Values appearing more than once, in sorted order.
pub fn find_duplicates<'a, I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for value in values {
        if !seen.insert(value) {
            duplicates.insert(value.to_string());
        }
    }
    duplicates.into_iter().collect()
}

/// Validates a free-text search request and clamps its limit.
pub fn normalize_search(query: Option<&str>, limit: Option<u32>, max_limit: u32) -> BauxiteResult<(String, u32)> {
    let query = query.map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(BauxiteError::validation("Search query 'q' is required"));
    }
    let limit = limit.unwrap_or(10).clamp(1, max_limit);
    Ok((query.to_string(), limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1, max = 5, message = "name must be 1-5 characters"))]
        name: String,
        #[validate(range(min = 0, max = 10))]
        berths: i32,
    }

    #[test]
    fn test_validate_model_collects_messages() {
        let sample = Sample {
            name: "too long".to_string(),
            berths: 12,
        };
        let error = validate_model(&sample).unwrap_err();
        match error {
            BauxiteError::Validation { errors } => {
                assert_eq!(errors.len(), 2);
                assert!(errors.contains(&"name must be 1-5 characters".to_string()));
                assert!(errors.contains(&"Value out of range for field 'berths'".to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_sanitize_trims_nested_strings() {
        let raw = json!({
            "name": "  Sangaredi ",
            "code": "   ",
            "products": [{"name": " CBG "}],
            "port_berths": 2
        });
        let clean = sanitize_json(raw);
        assert_eq!(clean["name"], "Sangaredi");
        assert!(clean["code"].is_null());
        assert_eq!(clean["products"][0]["name"], "CBG");
        assert_eq!(clean["port_berths"], 2);
    }

    #[test]
    fn test_code_format() {
        assert!(is_valid_code("SNG-01"));
        assert!(is_valid_code("cbg_3.2"));
        assert!(!is_valid_code("has space"));
        assert!(validate_code_format("code", "bad/code").is_err());
    }

    #[test]
    fn test_date_range() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        assert!(validate_date_range(start, end).is_ok());
        assert!(validate_date_range(end, start).is_err());
        assert!(validate_date_range(start, start).is_err());
    }

    #[test]
    fn test_required_fields_treat_null_as_missing() {
        let data = json!({"mine": {"name": "x"}, "products": null});
        let map = data.as_object().unwrap();
        let error = validate_required_fields(map, &["mine", "products"]).unwrap_err();
        assert_eq!(
            error.messages(),
            vec!["Missing required fields: products".to_string()]
        );
    }

    #[test]
    fn test_find_duplicates() {
        let names = ["CBG", "BAX", "CBG", "LOW", "BAX"];
        assert_eq!(find_duplicates(names.iter().copied()), vec!["BAX", "CBG"]);
        assert!(find_duplicates(["a", "b"].iter().copied()).is_empty());
    }

    #[test]
    fn test_normalize_search() {
        assert!(normalize_search(None, None, 50).is_err());
        assert!(normalize_search(Some("  "), None, 50).is_err());
        assert_eq!(normalize_search(Some("bok"), None, 50).unwrap(), ("bok".to_string(), 10));
        assert_eq!(normalize_search(Some("bok"), Some(500), 50).unwrap().1, 50);
    }
}
