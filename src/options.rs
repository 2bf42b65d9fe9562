//! Constructing a store.
//!
//! [`ConfigStoreBuilder`] covers the usual setup in one expression:
//!
//! ```ignore
//! let store = ConfigStore::builder()
//!     .env_prefix("shop")
//!     .sanitizer(TimeSanitizer)
//!     .config_file("config.dist.toml")
//!     .optional_config_file("config.local.toml")
//!     .config_setting("app.env", "dev")
//!     .post_processor(FnPostProcessor::new("derive", 0, derive_urls))
//!     .build()?;
//! ```
//!
//! The `with_*` functions produce the same steps as boxed [`ConfigOption`]s
//! for [`ConfigStore::apply`], so a store can be extended after the fact.
//! Options run in the order given; a failing option stops the chain and its
//! error is returned.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::env::{EnvKeyReplacer, EnvProvider, MemoryEnvProvider, OsEnvProvider};
use crate::error::ConfigError;
use crate::file::{self, FileFormat};
use crate::handler::ErrorHandler;
use crate::pathmap::MergeOptions;
use crate::postprocess::{PostProcessor, PostProcessors};
use crate::sanitize::Sanitizer;
use crate::ser::to_node;
use crate::store::ConfigStore;

/// One construction step.
pub type ConfigOption = Box<dyn FnOnce(&ConfigStore) -> Result<(), ConfigError> + Send>;

/// Merge the file at `path` into the root. The format comes from the
/// extension.
pub fn with_config_file(path: impl Into<PathBuf>) -> ConfigOption {
    with_config_file_format(path, None)
}

pub fn with_config_file_format(
    path: impl Into<PathBuf>,
    format: Option<FileFormat>,
) -> ConfigOption {
    let path = path.into();
    Box::new(move |store| {
        let node = file::load_file(&path, format)?;
        store.merge(".", node, MergeOptions::default())
    })
}

/// Like [`with_config_file`], but a missing file is skipped.
pub fn with_optional_config_file(path: impl Into<PathBuf>) -> ConfigOption {
    let path = path.into();
    Box::new(move |store| match file::load_optional_file(&path, None)? {
        Some(node) => store.merge(".", node, MergeOptions::default()),
        None => Ok(()),
    })
}

/// Merge any serializable map or struct into the root.
pub fn with_config_map(values: impl Serialize) -> ConfigOption {
    with_config_map_options(values, MergeOptions::default())
}

/// Like [`with_config_map`]. With [`MergeOptions::skip_existing`] only
/// keys that are not set yet are filled in.
pub fn with_config_map_options(values: impl Serialize, options: MergeOptions) -> ConfigOption {
    let node = to_node(&values);
    Box::new(move |store| {
        let node = node?;
        if !node.is_mapping() {
            return Err(ConfigError::Option(format!(
                "a config map must be a mapping, got {}",
                node.kind_name()
            )));
        }
        store.merge(".", node, options)
    })
}

/// Merge a single value at `key`.
pub fn with_config_setting(key: impl Into<String>, value: impl Serialize) -> ConfigOption {
    with_config_setting_options(key, value, MergeOptions::default())
}

pub fn with_config_setting_options(
    key: impl Into<String>,
    value: impl Serialize,
    options: MergeOptions,
) -> ConfigOption {
    let key = key.into();
    let node = to_node(&value);
    Box::new(move |store| store.merge(&key, node?, options))
}

pub fn with_env_key_prefix(prefix: impl Into<String>) -> ConfigOption {
    let prefix = prefix.into();
    Box::new(move |store| {
        store.set_env_prefix(prefix);
        Ok(())
    })
}

pub fn with_env_key_replacer(replacer: EnvKeyReplacer) -> ConfigOption {
    Box::new(move |store| {
        store.set_env_replacer(replacer);
        Ok(())
    })
}

pub fn with_env_provider(env: Arc<dyn EnvProvider>) -> ConfigOption {
    Box::new(move |store| {
        store.set_env_provider(env);
        Ok(())
    })
}

/// Replace the error handler chain used by [`ConfigStore::checked`].
pub fn with_error_handlers(handlers: Vec<Arc<dyn ErrorHandler>>) -> ConfigOption {
    Box::new(move |store| {
        store.set_error_handlers(handlers);
        Ok(())
    })
}

/// Replace the sanitizers applied to every later merge and set.
pub fn with_sanitizers(sanitizers: Vec<Arc<dyn Sanitizer>>) -> ConfigOption {
    Box::new(move |store| {
        store.set_sanitizers(sanitizers);
        Ok(())
    })
}

/// Builder for a [`ConfigStore`].
///
/// Engine settings (environment, sanitizers, error handlers) are applied
/// first regardless of call order, so sanitizers see every value. Content
/// steps then run in call order; later content wins. Post-processors run
/// last.
#[derive(Default)]
pub struct ConfigStoreBuilder {
    env: Option<Arc<dyn EnvProvider>>,
    env_prefix: Option<String>,
    env_replacer: Option<EnvKeyReplacer>,
    sanitizers: Vec<Arc<dyn Sanitizer>>,
    error_handlers: Option<Vec<Arc<dyn ErrorHandler>>>,
    steps: Vec<ConfigOption>,
    post_processors: PostProcessors,
}

impl ConfigStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read environment variables from `env` instead of the process.
    pub fn env_provider(mut self, env: Arc<dyn EnvProvider>) -> Self {
        self.env = Some(env);
        self
    }

    /// Ignore the process environment entirely.
    pub fn no_env(self) -> Self {
        self.env_provider(Arc::new(MemoryEnvProvider::new()))
    }

    /// Prefix for derived environment variable names (`shop` turns
    /// `redis.addr` into `SHOP_REDIS_ADDR`).
    pub fn env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self
    }

    pub fn env_key_replacer(mut self, replacer: EnvKeyReplacer) -> Self {
        self.env_replacer = Some(replacer);
        self
    }

    /// Append a sanitizer.
    pub fn sanitizer(mut self, sanitizer: impl Sanitizer + 'static) -> Self {
        self.sanitizers.push(Arc::new(sanitizer));
        self
    }

    /// Append an error handler. The first call replaces the default
    /// panicking handler.
    pub fn error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.error_handlers
            .get_or_insert_with(Vec::new)
            .push(Arc::new(handler));
        self
    }

    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.steps.push(with_config_file(path));
        self
    }

    pub fn config_file_format(mut self, path: impl Into<PathBuf>, format: FileFormat) -> Self {
        self.steps.push(with_config_file_format(path, Some(format)));
        self
    }

    pub fn optional_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.steps.push(with_optional_config_file(path));
        self
    }

    pub fn config_map(mut self, values: impl Serialize) -> Self {
        self.steps.push(with_config_map(values));
        self
    }

    /// Merge `values` with explicit options, e.g. defaults that must not
    /// replace what earlier steps loaded.
    pub fn config_map_with(mut self, values: impl Serialize, options: MergeOptions) -> Self {
        self.steps.push(with_config_map_options(values, options));
        self
    }

    pub fn config_setting(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.steps.push(with_config_setting(key, value));
        self
    }

    pub fn config_setting_with(
        mut self,
        key: impl Into<String>,
        value: impl Serialize,
        options: MergeOptions,
    ) -> Self {
        self.steps.push(with_config_setting_options(key, value, options));
        self
    }

    /// Add an arbitrary step.
    pub fn option(mut self, option: ConfigOption) -> Self {
        self.steps.push(option);
        self
    }

    pub fn post_processor(mut self, processor: impl PostProcessor + 'static) -> Self {
        self.post_processors.push(processor);
        self
    }

    pub fn build(self) -> Result<ConfigStore, ConfigError> {
        let store = ConfigStore::with_env_provider(self.env.unwrap_or_else(|| Arc::new(OsEnvProvider)));

        if let Some(prefix) = self.env_prefix {
            store.set_env_prefix(prefix);
        }
        if let Some(replacer) = self.env_replacer {
            store.set_env_replacer(replacer);
        }
        if !self.sanitizers.is_empty() {
            store.set_sanitizers(self.sanitizers);
        }
        if let Some(handlers) = self.error_handlers {
            store.set_error_handlers(handlers);
        }

        let steps = self.steps.len();
        store.apply(self.steps)?;
        debug!(steps, env_prefix = %store.env_prefix(), "applied config options");

        if !self.post_processors.is_empty() {
            let applied = self.post_processors.run(&store)?;
            debug!(?applied, "ran post-processors");
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::CollectingErrorHandler;
    use crate::node::Node;
    use crate::postprocess::FnPostProcessor;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn memory_env(pairs: &[(&str, &str)]) -> Arc<MemoryEnvProvider> {
        Arc::new(pairs.iter().copied().collect())
    }

    #[test]
    fn later_content_wins() {
        let store = ConfigStore::builder()
            .no_env()
            .config_map(HashMap::from([("port", 80), ("workers", 4)]))
            .config_setting("port", 8080)
            .build()
            .unwrap();
        assert_eq!(store.get_int("port", None).unwrap(), 8080);
        assert_eq!(store.get_int("workers", None).unwrap(), 4);
    }

    #[test]
    fn files_then_optional_override() {
        let dir = TempDir::new().unwrap();
        let dist = dir.path().join("config.dist.toml");
        fs::write(&dist, "port = 80\nhost = \"dist\"\n").unwrap();
        let local = dir.path().join("config.local.json");
        fs::write(&local, r#"{"host": "local"}"#).unwrap();

        let store = ConfigStore::builder()
            .no_env()
            .config_file(&dist)
            .optional_config_file(&local)
            .optional_config_file(dir.path().join("absent.toml"))
            .build()
            .unwrap();
        assert_eq!(store.get_int("port", None).unwrap(), 80);
        assert_eq!(store.get_string("host", None).unwrap(), "local");
    }

    #[test]
    fn missing_required_file_fails_build() {
        let dir = TempDir::new().unwrap();
        let err = ConfigStore::builder()
            .no_env()
            .config_file(dir.path().join("absent.toml"))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn skip_existing_keeps_earlier_values() {
        let store = ConfigStore::builder()
            .no_env()
            .config_map(HashMap::from([("port", 80)]))
            .config_map_with(
                HashMap::from([("port", 8080), ("workers", 4)]),
                MergeOptions::skip_existing(),
            )
            .config_setting_with("port", 9090, MergeOptions::skip_existing())
            .config_setting_with("host", "localhost", MergeOptions::skip_existing())
            .build()
            .unwrap();
        assert_eq!(store.get_int("port", None).unwrap(), 80);
        assert_eq!(store.get_int("workers", None).unwrap(), 4);
        assert_eq!(store.get_string("host", None).unwrap(), "localhost");
    }

    #[test]
    fn apply_with_options() {
        let store = ConfigStore::builder()
            .no_env()
            .config_setting("redis", HashMap::from([("addr", "redis:6379")]))
            .build()
            .unwrap();
        store
            .apply([
                with_config_setting_options(
                    "redis",
                    HashMap::from([("addr", "localhost:6379"), ("db", "2")]),
                    MergeOptions::skip_existing(),
                ),
                with_config_map_options(
                    HashMap::from([("region", "eu")]),
                    MergeOptions::default(),
                ),
            ])
            .unwrap();
        assert_eq!(store.get_string("redis.addr", None).unwrap(), "redis:6379");
        assert_eq!(store.get_int("redis.db", None).unwrap(), 2);
        assert_eq!(store.get_string("region", None).unwrap(), "eu");
    }

    #[test]
    fn scalar_config_map_is_rejected() {
        let err = ConfigStore::builder()
            .no_env()
            .config_map(5)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Option(_)));
    }

    #[test]
    fn engine_settings_apply_before_content() {
        let upper = |path: &str, value: Node| -> Result<Node, ConfigError> {
            Ok(match value {
                Node::String(s) if path == "region" => Node::String(s.to_uppercase()),
                other => other,
            })
        };
        let store = ConfigStore::builder()
            .config_setting("region", "eu-west-1")
            .sanitizer(upper)
            .env_provider(memory_env(&[("SHOP_PORT", "9000")]))
            .env_prefix("shop")
            .config_setting("port", 80)
            .build()
            .unwrap();
        assert_eq!(
            store.all_settings()["region"],
            Node::String("EU-WEST-1".into())
        );
        assert_eq!(store.get_int("port", None).unwrap(), 9000);
    }

    #[test]
    fn custom_replacer() {
        let store = ConfigStore::builder()
            .env_provider(memory_env(&[("DB__POOL_SIZE", "12")]))
            .env_key_replacer(EnvKeyReplacer::new([(".", "__"), ("-", "_")]))
            .config_setting("db", HashMap::from([("pool-size", 4)]))
            .build()
            .unwrap();
        assert_eq!(store.get_int("db.pool-size", None).unwrap(), 12);
    }

    #[test]
    fn error_handlers_replace_default() {
        let collecting = CollectingErrorHandler::new();
        let store = ConfigStore::builder()
            .no_env()
            .error_handler(collecting.clone())
            .build()
            .unwrap();
        assert_eq!(store.checked().get_string("missing", None), "");
        assert_eq!(collecting.errors().len(), 1);
    }

    #[test]
    fn post_processors_run_after_content() {
        let store = ConfigStore::builder()
            .no_env()
            .config_setting("host", "a.com")
            .post_processor(FnPostProcessor::new("url", 0, |store: &ConfigStore| {
                let host = store.get_string("host", None)?;
                store.set("url", format!("https://{host}"))?;
                Ok(true)
            }))
            .build()
            .unwrap();
        assert_eq!(store.get_string("url", None).unwrap(), "https://a.com");
    }

    #[test]
    fn apply_extends_an_existing_store() {
        let store = ConfigStore::builder().no_env().build().unwrap();
        store
            .apply([
                with_env_key_prefix("app"),
                with_env_provider(memory_env(&[("APP_NAME", "env-name")])),
                with_config_map(HashMap::from([("name", "map-name")])),
            ])
            .unwrap();
        assert_eq!(store.get_string("name", None).unwrap(), "env-name");
    }
}
