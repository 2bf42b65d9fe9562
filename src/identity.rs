//! The application identity stored under `app.*`.
//!
//! ```toml
//! [app]
//! env = "production"   # required
//! name = "shop"        # required
//! namespace = "{app.tags.project}.{app.env}"
//!
//! [app.tags]
//! project = "commerce"
//! ```
//!
//! [`AppIdentity::format`] renders resource names from it:
//! `"{app.namespace}-{app.name}"` with delimiter `-` gives
//! `commerce-production-shop`.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ConfigError;
use crate::node::Node;
use crate::store::ConfigStore;

static PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^}]+)\}").expect("identity pattern is valid"));

static NAMESPACE_PARTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{[^}]+\}|[^.]+").expect("namespace pattern is valid"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppIdentity {
    pub env: String,
    pub name: String,
    pub tags: HashMap<String, String>,
    /// Dot separated, may reference the other identity placeholders. Taken
    /// verbatim from the store.
    pub namespace: String,
    namespace_parts: Vec<String>,
}

impl AppIdentity {
    /// Read the identity from `store`. `app.name` and `app.env` must be set
    /// and non-empty.
    pub fn from_config(store: &ConfigStore) -> Result<Self, ConfigError> {
        let mut identity = Self::default();
        identity.pad_from_config(store)?;
        Ok(identity)
    }

    /// Fill the empty fields from `store`. Tags already present are kept;
    /// missing ones are added.
    pub fn pad_from_config(&mut self, store: &ConfigStore) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            self.name = required(store, "app.name")?;
        }
        if self.env.is_empty() {
            self.env = required(store, "app.env")?;
        }

        let configured = store.get_string_map_string("app.tags", Some(HashMap::new()))?;
        for (key, value) in configured {
            self.tags.entry(key).or_insert(value);
        }

        if self.namespace.is_empty() {
            self.namespace = match store.get_raw("app.namespace") {
                None => String::new(),
                Some(Node::String(s)) => s,
                Some(other) => {
                    return Err(ConfigError::Identity(format!(
                        "app.namespace must be a string, found {}",
                        other.kind_name()
                    )));
                }
            };
        }

        self.namespace_parts = NAMESPACE_PARTS
            .find_iter(&self.namespace)
            .map(|m| m.as_str().to_string())
            .collect();

        Ok(())
    }

    /// Render `pattern`. The namespace parts are joined with `delimiter`.
    pub fn format(&self, pattern: &str, delimiter: &str) -> Result<String, ConfigError> {
        self.format_with(pattern, delimiter, &HashMap::new())
    }

    /// Like [`format`](Self::format), with extra placeholder values that
    /// override the identity's own.
    pub fn format_with(
        &self,
        pattern: &str,
        delimiter: &str,
        args: &HashMap<String, String>,
    ) -> Result<String, ConfigError> {
        let values = self.placeholders(delimiter, args)?;
        let result = render(pattern, &values)?.trim().to_string();

        if result.is_empty() {
            return Err(ConfigError::Identity(format!(
                "formatted result is empty for pattern '{pattern}'"
            )));
        }
        Ok(result)
    }

    /// The rendered namespace, empty when none is configured.
    pub fn format_namespace(&self, delimiter: &str) -> Result<String, ConfigError> {
        let mut values = self.placeholders(delimiter, &HashMap::new())?;
        Ok(values.remove("app.namespace").unwrap_or_default())
    }

    /// Every placeholder value: `app.name`, `app.env`, `app.tags.*` and the
    /// rendered `app.namespace`.
    pub fn placeholders(
        &self,
        delimiter: &str,
        args: &HashMap<String, String>,
    ) -> Result<HashMap<String, String>, ConfigError> {
        let mut values = HashMap::from([
            ("app.name".to_string(), self.name.clone()),
            ("app.env".to_string(), self.env.clone()),
        ]);
        for (key, value) in &self.tags {
            values.insert(format!("app.tags.{key}"), value.clone());
        }
        values.extend(args.iter().map(|(k, v)| (k.clone(), v.clone())));

        let namespace = render(&self.namespace_parts.join(delimiter), &values).map_err(|e| {
            ConfigError::Identity(format!("failed to format app.namespace: {e}"))
        })?;
        values.insert("app.namespace".to_string(), namespace);

        Ok(values)
    }
}

fn required(store: &ConfigStore, key: &str) -> Result<String, ConfigError> {
    let value = store.get_string(key, None)?.trim().to_string();
    if value.is_empty() {
        return Err(ConfigError::Identity(format!("{key}: value is empty")));
    }
    Ok(value)
}

fn render(pattern: &str, values: &HashMap<String, String>) -> Result<String, ConfigError> {
    let mut result = pattern.to_string();

    for caps in PATTERN.captures_iter(pattern) {
        let (Some(token), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = values.get(key.as_str()).ok_or_else(|| {
            ConfigError::Identity(format!(
                "unknown placeholder {} in pattern '{pattern}'",
                token.as_str()
            ))
        })?;
        if value.is_empty() {
            return Err(ConfigError::Identity(format!(
                "placeholder {} resolved to an empty value in pattern '{pattern}'",
                token.as_str()
            )));
        }
        result = result.replace(token.as_str(), value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MemoryEnvProvider;
    use crate::node;
    use crate::pathmap::MergeOptions;
    use std::sync::Arc;

    fn store(app: Node) -> ConfigStore {
        let store = ConfigStore::with_env_provider(Arc::new(MemoryEnvProvider::new()));
        store
            .merge(".", node! { "app" => app }, MergeOptions::default())
            .unwrap();
        store
    }

    fn configured() -> AppIdentity {
        let store = store(node! {
            "name" => "my-app",
            "env" => "dev",
            "tags" => node! { "project" => "gosoline" },
            "namespace" => "{app.tags.project}.{app.env}.{app.name}",
        });
        AppIdentity::from_config(&store).unwrap()
    }

    #[test]
    fn reads_identity() {
        let store = store(node! {
            "name" => "name",
            "env" => "test",
            "tags" => node! { "project" => "prj", "family" => "fam" },
        });
        let identity = AppIdentity::from_config(&store).unwrap();
        assert_eq!(identity.name, "name");
        assert_eq!(identity.env, "test");
        assert_eq!(identity.tags["project"], "prj");
        assert_eq!(identity.tags["family"], "fam");
    }

    #[test]
    fn padding_keeps_existing_values() {
        let store = store(node! {
            "name" => "from-config",
            "env" => "test",
            "tags" => node! { "project" => "config", "group" => "grp" },
        });
        let mut identity = AppIdentity {
            name: "explicit".into(),
            tags: HashMap::from([("project".to_string(), "explicit".to_string())]),
            ..Default::default()
        };
        identity.pad_from_config(&store).unwrap();
        assert_eq!(identity.name, "explicit");
        assert_eq!(identity.env, "test");
        assert_eq!(identity.tags["project"], "explicit");
        assert_eq!(identity.tags["group"], "grp");
    }

    #[test]
    fn name_and_env_are_required() {
        let err = AppIdentity::from_config(&store(node! { "name" => "x" })).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref key) if key == "app.env"));

        let err = AppIdentity::from_config(&store(node! { "name" => " ", "env" => "dev" }))
            .unwrap_err();
        assert!(err.to_string().contains("app.name: value is empty"));
    }

    #[test]
    fn formats_patterns() {
        let identity = configured();
        assert_eq!(identity.format("{app.name}-{app.env}", "-").unwrap(), "my-app-dev");
        assert_eq!(
            identity.format("{app.tags.project}-{app.name}", "-").unwrap(),
            "gosoline-my-app"
        );
        assert_eq!(
            identity.format("prefix-{app.namespace}-suffix", "-").unwrap(),
            "prefix-gosoline-dev-my-app-suffix"
        );
        assert_eq!(identity.format("static-string", "-").unwrap(), "static-string");
    }

    #[test]
    fn format_errors() {
        let identity = configured();
        assert!(identity.format("{app.unknown}-{app.name}", "-").is_err());
        assert!(identity.format("{app.tags.missing}-{app.name}", "-").is_err());
        assert!(identity.format("", "-").is_err());
    }

    #[test]
    fn placeholders_include_rendered_namespace() {
        let placeholders = configured().placeholders("-", &HashMap::new()).unwrap();
        assert_eq!(
            placeholders,
            HashMap::from([
                ("app.name".to_string(), "my-app".to_string()),
                ("app.env".to_string(), "dev".to_string()),
                ("app.tags.project".to_string(), "gosoline".to_string()),
                ("app.namespace".to_string(), "gosoline-dev-my-app".to_string()),
            ])
        );
    }

    #[test]
    fn empty_values_are_rejected() {
        let store = store(node! {
            "name" => "my-app",
            "env" => "dev",
            "tags" => node! { "project" => "" },
        });
        let identity = AppIdentity::from_config(&store).unwrap();
        assert_eq!(identity.format_namespace("-").unwrap(), "");

        let err = identity.format("{app.tags.project}-{app.name}", "-").unwrap_err();
        assert!(err.to_string().contains("resolved to an empty value"));

        let err = identity.format("{app.namespace}-{app.name}", "-").unwrap_err();
        assert!(err.to_string().contains("resolved to an empty value"));
    }

    #[test]
    fn args_override_identity_values() {
        let identity = configured();
        let args = HashMap::from([("app.name".to_string(), "other".to_string())]);
        assert_eq!(
            identity.format_with("{app.namespace}", ".", &args).unwrap(),
            "gosoline.dev.other"
        );
    }
}
