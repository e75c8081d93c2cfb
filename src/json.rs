//! Field accessors over `serde_json` trees.
//!
//! The service is loose with its types, so every accessor treats a field of
//! the wrong kind exactly like a missing one.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::errors::SteamError;

pub fn parse(body: &str) -> Result<Value, SteamError> {
    serde_json::from_str(body).map_err(|err| SteamError::Parse(err.to_string()))
}

pub fn get_bool(json: &Value, name: &str) -> bool {
    json.get(name).and_then(Value::as_bool).unwrap_or(false)
}

pub fn get_int(json: &Value, name: &str) -> Option<i64> {
    json.get(name).and_then(Value::as_i64)
}

/// Empty strings count as absent.
pub fn get_str<'a>(json: &'a Value, name: &str) -> Option<&'a str> {
    json.get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Case-insensitive comparison of a string field. Absent fields never match.
pub fn str_eq(json: &Value, name: &str, expected: &str) -> bool {
    get_str(json, name).is_some_and(|s| s.eq_ignore_ascii_case(expected))
}

pub fn get_array<'a>(json: &'a Value, name: &str) -> Option<&'a Vec<Value>> {
    json.get(name).and_then(Value::as_array)
}

pub fn get_object<'a>(json: &'a Value, name: &str) -> Option<&'a Map<String, Value>> {
    json.get(name).and_then(Value::as_object)
}

/// Flattens an object into `field -> value`.
///
/// Nested objects and arrays are walked; scalars land under the name of the
/// innermost field holding them. Repeated names are joined with commas.
pub fn flatten(json: &Value) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();

    if json.is_object() {
        flatten_into(&mut map, None, json);
    }

    map
}

fn flatten_into(map: &mut BTreeMap<String, String>, key: Option<&str>, json: &Value) {
    let value = match json {
        Value::Object(fields) => {
            for (name, value) in fields {
                flatten_into(map, Some(name), value);
            }
            return;
        }
        Value::Array(values) => {
            for value in values {
                flatten_into(map, key, value);
            }
            return;
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => format!("{:.6}", n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
    };

    let Some(key) = key else {
        return;
    };

    map.entry(key.to_string())
        .and_modify(|existing| {
            existing.push(',');
            existing.push_str(&value);
        })
        .or_insert(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_strings_are_absent() {
        let value = json!({ "a": "", "b": "x", "c": 5 });
        assert_eq!(get_str(&value, "a"), None);
        assert_eq!(get_str(&value, "b"), Some("x"));
        assert_eq!(get_str(&value, "c"), None);
        assert_eq!(get_str(&value, "missing"), None);
    }

    #[test]
    fn str_eq_ignores_case() {
        let value = json!({ "error": "not logged on" });
        assert!(str_eq(&value, "error", "Not Logged On"));
        assert!(!str_eq(&value, "error", "OK"));
        assert!(!str_eq(&value, "missing", "OK"));
    }

    #[test]
    fn wrong_kinds_read_as_defaults() {
        let value = json!({ "flag": "true", "n": "5" });
        assert!(!get_bool(&value, "flag"));
        assert_eq!(get_int(&value, "n"), None);
        assert!(get_array(&value, "flag").is_none());
        assert!(get_object(&value, "n").is_none());

        let nested = json!({ "inner": { "a": 1 } });
        assert_eq!(get_object(&nested, "inner").map(|o| o.len()), Some(1));
    }

    #[test]
    fn flatten_merges_nested_fields() {
        let value = json!({
            "oauth_token": "T",
            "steamid": "76561197960265729",
            "webcookie": 42,
            "wgtoken": { "inner": true, "steamid": "2" },
            "list": ["a", "b"],
            "nothing": null
        });

        let map = flatten(&value);
        assert_eq!(map["oauth_token"], "T");
        assert_eq!(map["steamid"], "76561197960265729,2");
        assert_eq!(map["webcookie"], "42");
        assert_eq!(map["inner"], "true");
        assert_eq!(map["list"], "a,b");
        assert_eq!(map["nothing"], "null");
        assert!(!map.contains_key("wgtoken"));
    }

    #[test]
    fn flatten_ignores_non_objects() {
        assert!(flatten(&json!(["a", "b"])).is_empty());
        assert!(flatten(&json!("scalar")).is_empty());
    }

    #[test]
    fn parse_reports_errors() {
        assert!(matches!(parse("{not json"), Err(SteamError::Parse(_))));
        assert!(parse("{}").is_ok());
    }
}
