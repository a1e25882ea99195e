//! Functions and filters registered in every template environment.
//!
//! Conversion helpers are available both as filters (`{{ x | toYaml }}`)
//! and as functions (`{{ toYaml(x) }}`).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use minijinja::value::{Rest, Value};
use minijinja::{Environment, Error, ErrorKind};

fn invalid(message: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::InvalidOperation, message.to_string())
}

macro_rules! filter_and_function {
    ($env:expr, $name:literal, $f:expr) => {
        $env.add_filter($name, $f);
        $env.add_function($name, $f);
    };
}

/// Register the conversion, encoding and path helpers on `env`.
pub fn register(env: &mut Environment<'static>) {
    filter_and_function!(env, "toYaml", to_yaml);
    filter_and_function!(env, "fromYaml", from_yaml);
    filter_and_function!(env, "toJson", to_json);
    filter_and_function!(env, "fromJson", from_json);
    filter_and_function!(env, "toToml", to_toml);
    filter_and_function!(env, "fromToml", from_toml);
    filter_and_function!(env, "b64enc", b64enc);
    filter_and_function!(env, "b64dec", b64dec);
    filter_and_function!(env, "filebase", filebase);
    filter_and_function!(env, "filedir", filedir);
    filter_and_function!(env, "fileext", fileext);
    filter_and_function!(env, "fileclean", fileclean);
    env.add_function("indexOrDefault", index_or_default);
    env.add_function("expandenv", expandenv);
}

// ============================================================================
// Conversions
// ============================================================================

fn to_yaml(value: Value) -> Result<String, Error> {
    serde_yaml::to_string(&value).map_err(invalid)
}

fn from_yaml(text: String) -> Result<Value, Error> {
    let parsed: serde_json::Value = serde_yaml::from_str(&text).map_err(invalid)?;
    Ok(Value::from_serialize(&parsed))
}

fn to_json(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value).map_err(invalid)
}

fn from_json(text: String) -> Result<Value, Error> {
    let parsed: serde_json::Value = serde_json::from_str(&text).map_err(invalid)?;
    Ok(Value::from_serialize(&parsed))
}

fn to_toml(value: Value) -> Result<String, Error> {
    toml::to_string(&value).map_err(invalid)
}

fn from_toml(text: String) -> Result<Value, Error> {
    let parsed: serde_json::Value = toml::from_str(&text).map_err(invalid)?;
    Ok(Value::from_serialize(&parsed))
}

fn b64enc(text: String) -> String {
    STANDARD.encode(text)
}

fn b64dec(text: String) -> Result<String, Error> {
    let bytes = STANDARD.decode(text.trim()).map_err(invalid)?;
    String::from_utf8(bytes).map_err(invalid)
}

// ============================================================================
// Lookups
// ============================================================================

/// `indexOrDefault(default, obj, key...)`: walk `obj` by keys, falling back
/// to `default` when any step is missing.
fn index_or_default(default: Value, obj: Value, keys: Rest<Value>) -> Value {
    let mut current = obj;
    for key in keys.iter() {
        match current.get_item(key) {
            Ok(next) if !next.is_undefined() && !next.is_none() => current = next,
            _ => return default,
        }
    }
    current
}

fn expandenv(_text: String) -> Result<String, Error> {
    Err(invalid("expandenv is not supported"))
}

// ============================================================================
// Paths (always `/` separated)
// ============================================================================

/// Lexically clean a path: collapse separators, drop `.`, resolve `..`.
pub fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            _ => parts.push(part),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

fn filebase(path: String) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.is_empty() { "." } else { "/" }.to_string();
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
}

fn filedir(path: String) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(i) => clean_path(&path[..i]),
        None => ".".to_string(),
    }
}

fn fileext(path: String) -> String {
    let base = path.rsplit('/').next().unwrap_or(&path);
    base.rfind('.')
        .map_or_else(String::new, |i| base[i..].to_string())
}

fn fileclean(path: String) -> String {
    clean_path(&path)
}
