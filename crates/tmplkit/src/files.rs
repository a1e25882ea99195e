//! File access for templates.
//!
//! Templates see a `Files` object rooted at their own directory:
//!
//! ```text
//! {{ Files.get("config/app.ini") }}
//! {% for name, content in Files.glob("examples/*.yaml")|items %}...{% endfor %}
//! {{ Files.glob("examples/*.yaml").as_config() | indent(4) }}
//! {{ Files.glob("secrets/*").as_secrets() }}
//! ```
//!
//! Paths are not sanitized; `..` escapes the template directory.

use crate::error::{Error, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use globset::GlobBuilder;
use minijinja::value::{Enumerator, Object, ObjectRepr, Value, from_args};
use minijinja::{ErrorKind, State};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Read `name` relative to `root`.
pub fn read(root: &Path, name: &str) -> Result<String> {
    let path = root.join(name);
    std::fs::read_to_string(&path).map_err(|source| Error::Read { path, source })
}

/// Read every file under `root` whose relative path matches `pattern`.
///
/// Keys are `/`-separated paths relative to `root`; `*` does not cross
/// directory boundaries, `**` does.
pub fn glob(root: &Path, pattern: &str) -> Result<BTreeMap<String, String>> {
    let matcher = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()?
        .compile_matcher();

    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| Error::Read {
            path: root.to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if matcher.is_match(&key) {
            let content = std::fs::read_to_string(entry.path()).map_err(|source| Error::Read {
                path: entry.path().to_path_buf(),
                source,
            })?;
            files.insert(key, content);
        }
    }

    Ok(files)
}

/// Render files as a YAML mapping of base name to content, the shape of a
/// ConfigMap's `data`.
pub fn as_config(files: &BTreeMap<String, String>) -> Result<String> {
    let data: BTreeMap<&str, &str> = files
        .iter()
        .map(|(k, v)| (base_name(k), v.as_str()))
        .collect();
    Ok(serde_yaml::to_string(&data)?)
}

/// Like [`as_config`] with base64 encoded contents, the shape of a
/// Secret's `data`.
pub fn as_secrets(files: &BTreeMap<String, String>) -> Result<String> {
    let data: BTreeMap<&str, String> = files
        .iter()
        .map(|(k, v)| (base_name(k), STANDARD.encode(v)))
        .collect();
    Ok(serde_yaml::to_string(&data)?)
}

fn base_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

fn engine_error(e: &Error) -> minijinja::Error {
    minijinja::Error::new(ErrorKind::InvalidOperation, e.to_string())
}

// ============================================================================
// Template objects
// ============================================================================

/// The `Files` object bound into every render.
#[derive(Debug)]
pub struct FilesDir {
    root: PathBuf,
}

impl FilesDir {
    /// Files rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Object for FilesDir {
    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> std::result::Result<Value, minijinja::Error> {
        match method {
            "get" => {
                let (name,): (String,) = from_args(args)?;
                read(&self.root, &name)
                    .map(Value::from)
                    .map_err(|e| engine_error(&e))
            }
            "glob" => {
                let (pattern,): (String,) = from_args(args)?;
                let files = glob(&self.root, &pattern).map_err(|e| engine_error(&e))?;
                Ok(Value::from_object(FileSet { files }))
            }
            "lines" => {
                let (name,): (String,) = from_args(args)?;
                let text = read(&self.root, &name).map_err(|e| engine_error(&e))?;
                Ok(Value::from(
                    text.lines().map(Value::from).collect::<Vec<_>>(),
                ))
            }
            _ => Err(minijinja::Error::from(ErrorKind::UnknownMethod)),
        }
    }
}

/// Result of `Files.glob`: a mapping of relative path to content.
#[derive(Debug)]
pub struct FileSet {
    files: BTreeMap<String, String>,
}

impl Object for FileSet {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        self.files.get(key.as_str()?).map(|v| Value::from(v.as_str()))
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(self.files.keys().map(|k| Value::from(k.as_str())).collect())
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State<'_, '_>,
        method: &str,
        args: &[Value],
    ) -> std::result::Result<Value, minijinja::Error> {
        let () = from_args(args)?;
        let rendered = match method {
            "as_config" => as_config(&self.files),
            "as_secrets" => as_secrets(&self.files),
            _ => return Err(minijinja::Error::from(ErrorKind::UnknownMethod)),
        };
        rendered.map(Value::from).map_err(|e| engine_error(&e))
    }
}
