//! Layered value scopes.
//!
//! Values are plain JSON objects. Layers are combined with [`merge`], where
//! later layers win and nested mappings merge key by key.

use crate::error::{Error, Result};
use serde_json::Value;

/// A nested mapping of template values.
pub type Values = serde_json::Map<String, Value>;

/// Merge `overrides` onto a copy of `base`; precedence rises left to right.
///
/// Inputs are never modified. Nested mappings merge recursively, anything
/// else (scalars, sequences, mismatched kinds) is replaced wholesale.
pub fn merge(base: &Values, overrides: &[&Values]) -> Values {
    let mut result = base.clone();
    for layer in overrides {
        merge_into(&mut result, layer);
    }
    result
}

/// Merge `src` into `dst` in place.
pub fn merge_into(dst: &mut Values, src: &Values) {
    for (key, incoming) in src {
        match (dst.get_mut(key), incoming) {
            (Some(Value::Object(existing)), Value::Object(nested)) => merge_into(existing, nested),
            _ => {
                dst.insert(key.clone(), incoming.clone());
            }
        }
    }
}

/// Parse a YAML mapping; empty or null input yields empty values.
pub fn from_yaml(text: &str) -> Result<Values> {
    let value: Value = serde_yaml::from_str(text)?;
    from_value(value)
}

/// Interpret a parsed document as values.
pub fn from_value(value: Value) -> Result<Values> {
    match value {
        Value::Null => Ok(Values::new()),
        Value::Object(map) => Ok(map),
        other => Err(Error::NotAMapping(kind_of(&other).to_string())),
    }
}

/// Apply a `dotted.key=value` assignment; intermediate mappings are
/// created, and non-mapping values on the way are replaced.
pub fn set_value(values: &mut Values, assignment: &str) -> Result<()> {
    let (key, value) = assignment
        .split_once('=')
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| Error::Assignment(assignment.to_string()))?;

    let mut segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Error::Assignment(assignment.to_string()));
    }
    let Some(leaf) = segments.pop() else {
        return Err(Error::Assignment(assignment.to_string()));
    };

    let mut current = values;
    for segment in segments {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Values::new()));
        if !slot.is_object() {
            *slot = Value::Object(Values::new());
        }
        current = slot
            .as_object_mut()
            .ok_or_else(|| Error::Assignment(assignment.to_string()))?;
    }
    current.insert(leaf.to_string(), Value::String(value.to_string()));
    Ok(())
}

/// Look up a nested value by path.
pub fn lookup<'a>(values: &'a Values, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    rest.iter()
        .try_fold(values.get(*first)?, |v, key| v.as_object()?.get(*key))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(v: Value) -> Values {
        from_value(v).unwrap()
    }

    #[test]
    fn test_merge_nested() {
        let base = values(json!({"a": {"x": 1, "y": 2}}));
        let over = values(json!({"a": {"y": 3}}));

        let merged = merge(&base, &[&over]);

        assert_eq!(Value::Object(merged), json!({"a": {"x": 1, "y": 3}}));
    }

    #[test]
    fn test_merge_does_not_mutate_inputs() {
        let base = values(json!({"a": {"x": 1}, "list": [1, 2]}));
        let over = values(json!({"a": {"x": 2, "z": 9}, "list": [3]}));
        let base_before = base.clone();
        let over_before = over.clone();

        let merged = merge(&base, &[&over]);

        assert_eq!(base, base_before);
        assert_eq!(over, over_before);
        assert_eq!(Value::Object(merged), json!({"a": {"x": 2, "z": 9}, "list": [3]}));
    }

    #[test]
    fn test_merge_precedence_left_to_right() {
        let defaults = values(json!({"audience": "all", "team": {"lead": "klukkluk"}}));
        let step = values(json!({"team": {"lead": "pipo"}}));
        let global = values(json!({"audience": "world"}));

        let merged = merge(&defaults, &[&step, &global]);

        assert_eq!(
            Value::Object(merged),
            json!({"audience": "world", "team": {"lead": "pipo"}})
        );
    }

    #[test]
    fn test_merge_scalar_replaces_mapping() {
        let base = values(json!({"a": {"x": 1}}));
        let over = values(json!({"a": "flat"}));
        assert_eq!(Value::Object(merge(&base, &[&over])), json!({"a": "flat"}));
    }

    #[test]
    fn test_from_yaml() {
        assert!(from_yaml("").unwrap().is_empty());
        assert!(from_yaml("~").unwrap().is_empty());
        assert_eq!(from_yaml("a:\n  b: c\n").unwrap()["a"]["b"], json!("c"));
        assert!(matches!(from_yaml("- a"), Err(Error::NotAMapping(_))));
    }

    #[test]
    fn test_set_value_nests_dotted_keys() {
        let mut v = Values::new();
        set_value(&mut v, "team.lead=pipo").unwrap();
        set_value(&mut v, "team.size=3").unwrap();
        set_value(&mut v, "url=http://x?a=b").unwrap();

        assert_eq!(
            Value::Object(v),
            json!({"team": {"lead": "pipo", "size": "3"}, "url": "http://x?a=b"})
        );
    }

    #[test]
    fn test_set_value_rejects_malformed() {
        let mut v = Values::new();
        assert!(set_value(&mut v, "novalue").is_err());
        assert!(set_value(&mut v, "=x").is_err());
        assert!(set_value(&mut v, "a..b=x").is_err());
    }

    #[test]
    fn test_lookup() {
        let v = values(json!({"secret": {"ns": {"db": {"data": {"pw": "c2VjcmV0"}}}}}));
        assert_eq!(
            lookup(&v, &["secret", "ns", "db", "data", "pw"]),
            Some(&json!("c2VjcmV0"))
        );
        assert_eq!(lookup(&v, &["secret", "other"]), None);
        assert_eq!(lookup(&v, &[]), None);
    }
}
