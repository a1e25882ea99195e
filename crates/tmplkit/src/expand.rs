//! Template expansion.
//!
//! A [`Renderer`] owns one template environment with the helper functions,
//! a frozen environment-variable snapshot and a secret backend. Each render
//! binds three names:
//!
//! - `Values`: the merged value scope of the step
//! - `Get`: values passed on by earlier actions
//! - `Files`: file access rooted at the template's directory
//!
//! Undefined names and missing keys are errors, never empty strings.

use crate::error::{Error, Result};
use crate::files::FilesDir;
use crate::functions;
use crate::secrets::SecretBackend;
use crate::values::Values;
use minijinja::value::Value;
use minijinja::{AutoEscape, Environment, UndefinedBehavior, context};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Expands templates and evaluates postcondition expressions.
#[derive(Debug)]
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    /// Create a renderer reading `env(...)` from the current process
    /// environment, captured now.
    pub fn new(secrets: Arc<dyn SecretBackend>) -> Self {
        Self::with_environment(secrets, std::env::vars().collect())
    }

    /// Create a renderer with an explicit environment snapshot.
    pub fn with_environment(
        secrets: Arc<dyn SecretBackend>,
        environ: BTreeMap<String, String>,
    ) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        functions::register(&mut env);

        let environ = Arc::new(environ);
        env.add_function("env", move |name: String| {
            environ.get(&name).cloned().unwrap_or_default()
        });

        env.add_function(
            "vault",
            move |key: String, field: Option<String>| -> std::result::Result<String, minijinja::Error> {
                secrets
                    .get(&key, field.as_deref().unwrap_or_default())
                    .map_err(|e| {
                        minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, e.to_string())
                    })
            },
        );

        Self { env }
    }

    /// Expand `text`, read from `path`, against `values` and `passed`.
    pub fn render(&self, path: &Path, text: &str, values: &Values, passed: &Values) -> Result<String> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let ctx = context! {
            Values => Value::from_serialize(values),
            Get => Value::from_serialize(passed),
            Files => Value::from_object(FilesDir::new(dir)),
        };

        let name = path.display().to_string();
        self.env
            .render_named_str(&name, text, ctx)
            .map_err(|e| Error::Render {
                template: name,
                message: describe(&e),
            })
    }

    /// Evaluate a boolean expression (no delimiters) against `data`.
    ///
    /// An empty expression is true. Otherwise the expression holds when it
    /// renders as `true`.
    pub fn evaluate(&self, expr: &str, data: &serde_json::Value) -> Result<bool> {
        if expr.trim().is_empty() {
            return Ok(true);
        }

        let source = format!("{{{{ {expr} }}}}");
        let rendered = self
            .env
            .render_named_str("postCondition", &source, Value::from_serialize(data))
            .map_err(|e| Error::Expression {
                expr: expr.to_string(),
                message: describe(&e),
            })?;

        Ok(rendered.trim() == "true")
    }
}

/// Flatten an engine error and its causes into one line.
fn describe(e: &minijinja::Error) -> String {
    let mut message = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::{FileVault, NoSecrets};
    use serde_json::json;
    use tempfile::TempDir;

    fn renderer() -> Renderer {
        let vault = FileVault::new(BTreeMap::from([(
            "xyz".to_string(),
            r#"{"name":"superman"}"#.to_string(),
        )]));
        let environ = BTreeMap::from([("STAGE".to_string(), "test".to_string())]);
        Renderer::with_environment(Arc::new(vault), environ)
    }

    fn values(v: serde_json::Value) -> Values {
        crate::values::from_value(v).unwrap()
    }

    fn render(text: &str, v: serde_json::Value, passed: serde_json::Value) -> Result<String> {
        renderer().render(Path::new("testdata/t.yaml"), text, &values(v), &values(passed))
    }

    #[test]
    fn test_values_and_defaults() {
        let out = render(
            "{{ Values.team.lead }} says hello {{ Values.audience }}!",
            json!({"team": {"lead": "pipo"}, "audience": "all"}),
            json!({}),
        )
        .unwrap();
        assert_eq!(out, "pipo says hello all!");
    }

    #[test]
    fn test_passed_values_via_get() {
        let out = render("{{ Get.name }}", json!({}), json!({"name": "hotstuff"})).unwrap();
        assert_eq!(out, "hotstuff");
    }

    #[test]
    fn test_key_containing_dash() {
        let out = render(
            r#"{{ Values["dash-ed"].name }}"#,
            json!({"dash-ed": {"name": "peppers"}}),
            json!({}),
        )
        .unwrap();
        assert_eq!(out, "peppers");
    }

    #[test]
    fn test_chained_lookup() {
        let out = render(
            "{{ Get[Values.namespace].name }}",
            json!({"namespace": "dash-ed"}),
            json!({"dash-ed": {"name": "peppers"}}),
        )
        .unwrap();
        assert_eq!(out, "peppers");
    }

    #[test]
    fn test_missing_key_is_error() {
        let err = render("{{ Values.nope }}", json!({}), json!({})).unwrap_err();
        assert!(matches!(err, Error::Render { .. }));
        assert!(render("{{ Values.a.b }}", json!({"a": {}}), json!({})).is_err());
    }

    #[test]
    fn test_trailing_newline_kept() {
        let out = render("a: {{ Values.a }}\n", json!({"a": 1}), json!({})).unwrap();
        assert_eq!(out, "a: 1\n");
    }

    #[test]
    fn test_env_uses_snapshot() {
        assert_eq!(render("{{ env('STAGE') }}", json!({}), json!({})).unwrap(), "test");
        assert_eq!(render("{{ env('NOT_SET_ANYWHERE') }}", json!({}), json!({})).unwrap(), "");
    }

    #[test]
    fn test_vault_lookup() {
        assert_eq!(render("{{ vault('xyz', 'name') }}", json!({}), json!({})).unwrap(), "superman");
        assert_eq!(
            render("{{ vault('xyz') }}", json!({}), json!({})).unwrap(),
            r#"{"name":"superman"}"#
        );
        assert!(render("{{ vault('missing', '') }}", json!({}), json!({})).is_err());
    }

    #[test]
    fn test_vault_without_backend_fails() {
        let r = Renderer::with_environment(Arc::new(NoSecrets), BTreeMap::new());
        let out = r.render(Path::new("t"), "{{ vault('x') }}", &Values::new(), &Values::new());
        assert!(out.is_err());
    }

    #[test]
    fn test_files_relative_to_template_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("conf")).unwrap();
        std::fs::write(dir.path().join("conf/app.ini"), "debug=true").unwrap();
        std::fs::write(dir.path().join("conf/db.ini"), "host=db").unwrap();
        let tpl = dir.path().join("deploy.yaml");

        let r = renderer();
        let get = r
            .render(&tpl, r#"{{ Files.get("conf/app.ini") }}"#, &Values::new(), &Values::new())
            .unwrap();
        assert_eq!(get, "debug=true");

        let names = r
            .render(
                &tpl,
                r#"{% for name, _ in Files.glob("conf/*.ini")|items %}{{ name|filebase }} {% endfor %}"#,
                &Values::new(),
                &Values::new(),
            )
            .unwrap();
        assert_eq!(names, "app.ini db.ini ");

        let config = r
            .render(
                &tpl,
                r#"{{ Files.glob("conf/*.ini").as_config() }}"#,
                &Values::new(),
                &Values::new(),
            )
            .unwrap();
        assert_eq!(config, "app.ini: debug=true\ndb.ini: host=db\n");
    }

    #[test]
    fn test_evaluate() {
        let secret = json!({"data": {"een": "Zmlyc3Qta3YtdmFsdWU=", "twee": "c2Vjb25kLWt2LXZhbHVl"}});
        let r = renderer();

        assert!(r.evaluate("", &secret).unwrap());
        assert!(r.evaluate("data.een | length > 10", &secret).unwrap());
        assert!(!r.evaluate("data.een | length > 100", &secret).unwrap());
        assert!(r.evaluate("data.drie | length > 1", &secret).is_err());
    }
}
