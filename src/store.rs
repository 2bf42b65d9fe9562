//! The config store: settings of record plus a live environment overlay,
//! placeholder expansion and typed access.
//!
//! Every read consults the environment first. A variable derived from the
//! requested path (see [`derive_env_key`]) wins over the stored value, and
//! the combined result is written back so later reads are stable.
//!
//! ```ignore
//! let store = ConfigStore::builder()
//!     .config_map(node! { "port" => 80, "host" => "localhost" })
//!     .build()?;
//!
//! assert_eq!(store.get_int("port", None)?, 80);
//! std::env::set_var("PORT", "88");
//! assert_eq!(store.get_int("port", None)?, 88);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::binder::{self, BindContext, Bindable, Binder, Decoder, Kind, Settings, StructKey};
use crate::checked::Checked;
use crate::env::{EnvKeyReplacer, EnvProvider, OsEnvProvider, derive_env_key};
use crate::error::{BindError, ConfigError, PathMapError};
use crate::handler::{ErrorHandler, PanicErrorHandler};
use crate::node::{Mapping, Node};
use crate::options::{ConfigOption, ConfigStoreBuilder};
use crate::path::Path;
use crate::pathmap::{MergeOptions, PathMap, SetOptions};
use crate::sanitize::{Sanitizer, sanitize_tree};
use crate::template;
use crate::validate;

/// A callback layering extra defaults underneath the stored settings of an
/// `unmarshal_*` call. It receives the store (to look up other keys) and the
/// settings assembled so far (zeros and field defaults).
pub type AdditionalDefaults =
    Box<dyn Fn(&ConfigStore, &PathMap) -> Result<(), ConfigError> + Send + Sync>;

/// Use the settings stored at `source_key` as defaults for `target_path`
/// of the record being unmarshalled.
pub fn defaults_from_key(
    source_key: impl Into<String>,
    target_path: impl Into<String>,
) -> AdditionalDefaults {
    let source_key = source_key.into();
    let target_path = target_path.into();

    Box::new(move |store, settings| {
        let value = store.get(&source_key, None)?;
        settings.merge(target_path.as_str(), value, MergeOptions::default());
        Ok(())
    })
}

#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<Inner>,
}

struct Inner {
    settings: PathMap,
    env: RwLock<Arc<dyn EnvProvider>>,
    env_prefix: RwLock<String>,
    env_replacer: RwLock<EnvKeyReplacer>,
    sanitizers: RwLock<Vec<Arc<dyn Sanitizer>>>,
    error_handlers: RwLock<Vec<Arc<dyn ErrorHandler>>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigStore")
            .field("env_prefix", &*self.inner.env_prefix.read())
            .field("settings", &self.inner.settings.data())
            .finish()
    }
}

impl ConfigStore {
    /// An empty store reading the process environment.
    pub fn new() -> Self {
        Self::with_env_provider(Arc::new(OsEnvProvider))
    }

    pub fn with_env_provider(env: Arc<dyn EnvProvider>) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings: PathMap::new(),
                env: RwLock::new(env),
                env_prefix: RwLock::new(String::new()),
                env_replacer: RwLock::new(EnvKeyReplacer::default()),
                sanitizers: RwLock::new(Vec::new()),
                error_handlers: RwLock::new(vec![Arc::new(PanicErrorHandler)]),
            }),
        }
    }

    pub fn builder() -> ConfigStoreBuilder {
        ConfigStoreBuilder::default()
    }

    /// Apply options in order. Stops at the first failing option.
    pub fn apply(&self, options: impl IntoIterator<Item = ConfigOption>) -> Result<(), ConfigError> {
        for option in options {
            option(self)?;
        }
        Ok(())
    }

    /// Getters that report failures to the error handlers instead of
    /// returning them.
    pub fn checked(&self) -> Checked<'_> {
        Checked::new(self)
    }

    // -- engine settings ------------------------------------------------------

    pub(crate) fn set_env_provider(&self, env: Arc<dyn EnvProvider>) {
        *self.inner.env.write() = env;
    }

    pub(crate) fn set_env_prefix(&self, prefix: impl Into<String>) {
        *self.inner.env_prefix.write() = prefix.into();
    }

    pub(crate) fn set_env_replacer(&self, replacer: EnvKeyReplacer) {
        *self.inner.env_replacer.write() = replacer;
    }

    pub(crate) fn set_sanitizers(&self, sanitizers: Vec<Arc<dyn Sanitizer>>) {
        *self.inner.sanitizers.write() = sanitizers;
    }

    pub(crate) fn set_error_handlers(&self, handlers: Vec<Arc<dyn ErrorHandler>>) {
        *self.inner.error_handlers.write() = handlers;
    }

    pub(crate) fn error_handlers(&self) -> Vec<Arc<dyn ErrorHandler>> {
        self.inner.error_handlers.read().clone()
    }

    pub fn env_prefix(&self) -> String {
        self.inner.env_prefix.read().clone()
    }

    /// The environment variable consulted for `key`.
    pub fn env_key(&self, key: &str) -> String {
        derive_env_key(&self.inner.env_prefix.read(), key, &self.inner.env_replacer.read())
    }

    /// Like [`env_key`](Self::env_key), but the root maps to the bare prefix.
    fn env_key_of(&self, key: &str) -> String {
        if Path::from(key).is_root() {
            self.env_prefix()
        } else {
            self.env_key(key)
        }
    }

    fn env_key_under(&self, prefix: &str, key: &str) -> String {
        derive_env_key(prefix, key, &self.inner.env_replacer.read())
    }

    fn lookup_env(&self, env_key: &str) -> Option<String> {
        self.inner.env.read().lookup_env(env_key)
    }

    // -- presence -------------------------------------------------------------

    /// Whether `key` has a value, either stored or through its environment
    /// variable.
    pub fn is_set(&self, key: &str) -> bool {
        self.lookup_env(&self.env_key(key)).is_some() || self.inner.settings.has(key)
    }

    /// Whether anything is configured below `prefix`: an environment variable
    /// starting with the derived name, or a stored value.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        let env_prefix = self.env_key(prefix);
        self.inner.env.read().prefix_exists(&env_prefix) || self.is_set(prefix)
    }

    pub fn all_keys(&self) -> Vec<String> {
        self.inner.settings.keys()
    }

    /// Snapshot of every stored setting. Environment variables are not
    /// included unless they have been read before.
    pub fn all_settings(&self) -> Mapping {
        self.inner.settings.mapping().unwrap_or_default()
    }

    // -- mutation -------------------------------------------------------------

    /// Merge `value` into `path` after running it through the sanitizers.
    pub fn merge(
        &self,
        path: &str,
        value: impl Into<Node>,
        options: MergeOptions,
    ) -> Result<(), ConfigError> {
        let value = self.sanitize(path, value.into())?;
        self.inner.settings.merge(path, value, options);
        Ok(())
    }

    /// Replace the value at `path` after running it through the sanitizers.
    pub fn set(&self, path: &str, value: impl Into<Node>) -> Result<(), ConfigError> {
        let value = self.sanitize(path, value.into())?;
        self.inner.settings.set(path, value, SetOptions::default());
        Ok(())
    }

    /// Merge the keyed fields of `record` into `path`.
    pub fn merge_settings<R: Settings>(&self, path: &str, record: &R) -> Result<(), ConfigError> {
        let values = Binder::new().read(record).data();
        self.merge(path, values, MergeOptions::default())
    }

    fn sanitize(&self, path: &str, value: Node) -> Result<Node, ConfigError> {
        let sanitizers = self.inner.sanitizers.read().clone();
        sanitize_tree(&sanitizers, path, value)
    }

    // -- reads ----------------------------------------------------------------

    /// The value at `key` with its environment overlay applied, or `None`
    /// when neither is present. The overlay is persisted.
    fn lookup(&self, key: &str) -> Option<Node> {
        if !self.is_set(key) {
            return None;
        }

        let stored = self.inner.settings.get(key).unwrap_or_default();
        let value = self.overlay_env(&self.env_key_of(key), stored);
        self.inner
            .settings
            .set(key, value.clone(), SetOptions::default());

        Some(value)
    }

    fn binder(&self, depth: usize) -> Binder {
        Binder::new().decoder(PlaceholderDecoder {
            store: self.clone(),
            depth,
        })
    }

    fn get_at<T: Bindable>(
        &self,
        key: &str,
        default: Option<T>,
        depth: usize,
    ) -> Result<T, ConfigError> {
        let node = match (self.lookup(key), default) {
            (Some(node), _) => node,
            (None, Some(default)) => default.to_node(),
            (None, None) => return Err(ConfigError::MissingKey(key.to_string())),
        };

        let binder = self.binder(depth);
        let ctx = BindContext::new(&binder).entry(key);
        T::from_node(node, &ctx).map_err(|e| getter_error(key, e))
    }

    /// Read `key` as any bindable type.
    pub fn get_as<T: Bindable>(&self, key: &str, default: Option<T>) -> Result<T, ConfigError> {
        self.get_at(key, default, 0)
    }

    /// The node at `key` with its environment overlay but without
    /// placeholder expansion.
    pub fn get_raw(&self, key: &str) -> Option<Node> {
        self.lookup(key)
    }

    /// The node at `key`, with placeholders expanded in every string.
    pub fn get(&self, key: &str, default: Option<Node>) -> Result<Node, ConfigError> {
        self.get_as(key, default)
    }

    pub fn get_string(&self, key: &str, default: Option<&str>) -> Result<String, ConfigError> {
        self.get_as(key, default.map(str::to_string))
    }

    fn get_string_at(&self, key: &str, depth: usize) -> Result<String, ConfigError> {
        self.get_at(key, None, depth)
    }

    pub fn get_int(&self, key: &str, default: Option<i32>) -> Result<i32, ConfigError> {
        self.get_as(key, default)
    }

    pub fn get_i64(&self, key: &str, default: Option<i64>) -> Result<i64, ConfigError> {
        self.get_as(key, default)
    }

    pub fn get_bool(&self, key: &str, default: Option<bool>) -> Result<bool, ConfigError> {
        self.get_as(key, default)
    }

    pub fn get_float(&self, key: &str, default: Option<f64>) -> Result<f64, ConfigError> {
        self.get_as(key, default)
    }

    pub fn get_duration(
        &self,
        key: &str,
        default: Option<Duration>,
    ) -> Result<Duration, ConfigError> {
        self.get_as(key, default)
    }

    pub fn get_time(
        &self,
        key: &str,
        default: Option<DateTime<Utc>>,
    ) -> Result<DateTime<Utc>, ConfigError> {
        self.get_as(key, default)
    }

    /// A comma separated string is split and trimmed.
    pub fn get_string_slice(
        &self,
        key: &str,
        default: Option<Vec<String>>,
    ) -> Result<Vec<String>, ConfigError> {
        self.get_as(key, default)
    }

    pub fn get_int_slice(
        &self,
        key: &str,
        default: Option<Vec<i64>>,
    ) -> Result<Vec<i64>, ConfigError> {
        self.get_as(key, default)
    }

    /// Only string values directly below `key` are expanded; nested
    /// mappings and sequences are returned as stored.
    pub fn get_string_map(
        &self,
        key: &str,
        default: Option<Mapping>,
    ) -> Result<Mapping, ConfigError> {
        let mut entries = self.get_unexpanded::<BTreeMap<String, Node>>(key, default)?;
        self.expand_top_level(&mut entries)?;
        Ok(entries)
    }

    pub fn get_string_map_string(
        &self,
        key: &str,
        default: Option<HashMap<String, String>>,
    ) -> Result<HashMap<String, String>, ConfigError> {
        self.get_as(key, default)
    }

    /// Like [`get_string_map`](Self::get_string_map) for every element.
    pub fn get_mapping_slice(
        &self,
        key: &str,
        default: Option<Vec<Mapping>>,
    ) -> Result<Vec<Mapping>, ConfigError> {
        let mut items = self.get_unexpanded::<Vec<BTreeMap<String, Node>>>(key, default)?;
        for entries in &mut items {
            self.expand_top_level(entries)?;
        }
        Ok(items)
    }

    fn get_unexpanded<T: Bindable>(&self, key: &str, default: Option<T>) -> Result<T, ConfigError> {
        let node = match (self.lookup(key), default) {
            (Some(node), _) => node,
            (None, Some(default)) => return Ok(default),
            (None, None) => return Err(ConfigError::MissingKey(key.to_string())),
        };

        let binder = Binder::new();
        let ctx = BindContext::new(&binder).entry(key);
        T::from_node(node, &ctx).map_err(|e| getter_error(key, e))
    }

    fn expand_top_level(&self, entries: &mut Mapping) -> Result<(), ConfigError> {
        for value in entries.values_mut() {
            match value {
                Node::String(s) if template::needs_expansion(s.as_str()) => {
                    *s = self.expand_at(s, &HashMap::new(), 0)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Expand the placeholders in `pattern`. Entries of `args` win over
    /// stored keys of the same name.
    pub fn format_string(
        &self,
        pattern: &str,
        args: &HashMap<String, String>,
    ) -> Result<String, ConfigError> {
        self.expand_at(pattern, args, 0)
    }

    fn expand_at(
        &self,
        raw: &str,
        args: &HashMap<String, String>,
        depth: usize,
    ) -> Result<String, ConfigError> {
        template::expand_with(raw, args, depth, |key, depth| {
            self.get_string_at(key, depth)
        })
    }

    fn expand_node(&self, node: Node, depth: usize) -> Result<Node, ConfigError> {
        match node {
            Node::String(s) if template::needs_expansion(&s) => {
                self.expand_at(&s, &HashMap::new(), depth).map(Node::String)
            }
            Node::Mapping(entries) => Ok(Node::Mapping(
                entries
                    .into_iter()
                    .map(|(k, v)| self.expand_node(v, depth).map(|v| (k, v)))
                    .collect::<Result<_, _>>()?,
            )),
            Node::Sequence(items) => Ok(Node::Sequence(
                items
                    .into_iter()
                    .map(|v| self.expand_node(v, depth))
                    .collect::<Result<_, _>>()?,
            )),
            other => Ok(other),
        }
    }

    // -- unmarshalling --------------------------------------------------------

    /// Populate `record` from the settings at `key`.
    ///
    /// Layers, lowest first: zero values, field defaults, `defaults`, the
    /// stored settings, then environment variables found through the
    /// record's keys and through the merged values. The layered result is
    /// persisted at `key` before it is written into `record` and validated.
    pub fn unmarshal_key<R: Settings>(
        &self,
        key: &str,
        record: &mut R,
        defaults: &[AdditionalDefaults],
    ) -> Result<(), ConfigError> {
        let layered = self.layer_defaults::<R>(key, defaults)?;

        if let Some(stored) = self.inner.settings.get(key) {
            if !stored.is_mapping() {
                return Err(PathMapError::NotAMapping {
                    path: key.to_string(),
                    found: stored.kind_name(),
                }
                .into());
            }
            layered.merge(".", stored, MergeOptions::default());
        }

        let env_prefix = self.env_key_of(key);
        let from_keys = self.env_from_struct_keys(&env_prefix, &R::descriptor().keys());
        layered.merge(".", from_keys, MergeOptions::default());
        let layered = PathMap::from_node(self.overlay_env(&env_prefix, layered.data()));

        self.inner
            .settings
            .set(key, layered.data(), SetOptions::default());

        self.write_record(key, record, &layered)?;

        validate::validate(record).map_err(|source| ConfigError::Validation {
            key: key.to_string(),
            source,
        })?;

        debug!(key, record = R::descriptor().type_name, "unmarshalled settings");
        Ok(())
    }

    /// Populate `record` from zero values and defaults only.
    pub fn unmarshal_defaults<R: Settings>(
        &self,
        record: &mut R,
        defaults: &[AdditionalDefaults],
    ) -> Result<(), ConfigError> {
        let layered = self.layer_defaults::<R>(".", defaults)?;
        self.write_record(".", record, &layered)
    }

    /// Unmarshal every element of the sequence at `key`. An absent key
    /// yields an empty vector.
    pub fn unmarshal_key_seq<R: Settings>(
        &self,
        key: &str,
        out: &mut Vec<R>,
        defaults: &[AdditionalDefaults],
    ) -> Result<(), ConfigError> {
        let len = match self.inner.settings.get(key) {
            None => 0,
            Some(Node::Sequence(items)) => items.len(),
            Some(other) => {
                return Err(PathMapError::NotASequence {
                    path: key.to_string(),
                    found: other.kind_name(),
                }
                .into());
            }
        };

        out.clear();
        for i in 0..len {
            let mut element = R::default();
            self.unmarshal_key(&format!("{key}[{i}]"), &mut element, defaults)?;
            out.push(element);
        }
        Ok(())
    }

    /// Unmarshal every entry of the mapping at `key`.
    pub fn unmarshal_key_map<R: Settings>(
        &self,
        key: &str,
        out: &mut HashMap<String, R>,
        defaults: &[AdditionalDefaults],
    ) -> Result<(), ConfigError> {
        let names = match self.get_raw(key) {
            None => return Err(ConfigError::MissingKey(key.to_string())),
            Some(Node::Mapping(entries)) => entries,
            Some(other) => {
                return Err(PathMapError::NotAMapping {
                    path: key.to_string(),
                    found: other.kind_name(),
                }
                .into());
            }
        };

        out.clear();
        for name in names.keys() {
            let mut element = R::default();
            self.unmarshal_key(&format!("{key}.{name}"), &mut element, defaults)?;
            out.insert(name.clone(), element);
        }
        Ok(())
    }

    fn layer_defaults<R: Settings>(
        &self,
        key: &str,
        defaults: &[AdditionalDefaults],
    ) -> Result<PathMap, ConfigError> {
        let (zeros, field_defaults) = Binder::new()
            .read_zero_and_default_values::<R>()
            .map_err(|source| ConfigError::Bind {
                key: key.to_string(),
                source,
            })?;

        let layered = PathMap::new();
        layered.merge(".", zeros.data(), MergeOptions::default());
        layered.merge(".", field_defaults.data(), MergeOptions::default());

        for default in defaults {
            default(self, &layered)?;
        }

        Ok(layered)
    }

    fn write_record<R: Settings>(
        &self,
        key: &str,
        record: &mut R,
        source: &PathMap,
    ) -> Result<(), ConfigError> {
        let binder = self.binder(0);
        let ctx = BindContext::new(&binder).entry(key);
        binder::record_write_node(record, source.data(), &ctx).map_err(|e| unwrap_decode(key, e))
    }

    // -- environment overlay --------------------------------------------------

    /// Probe the variables named after `keys`. Sequences are probed index by
    /// index until the first missing one.
    fn env_from_struct_keys(&self, prefix: &str, keys: &[StructKey]) -> Node {
        let found = PathMap::new();

        for struct_key in keys {
            match (struct_key.kind, struct_key.sub_keys.is_empty()) {
                (Kind::Sequence, false) => {
                    for i in 0.. {
                        let indexed = format!("{}[{i}]", struct_key.key);
                        let element_prefix = self.env_key_under(prefix, &indexed);
                        let element = self.env_from_struct_keys(&element_prefix, &struct_key.sub_keys);
                        if element.as_mapping().is_none_or(|m| m.is_empty()) {
                            break;
                        }
                        found.set(indexed.as_str(), element, SetOptions::default());
                    }
                }
                (Kind::Sequence, true) => {
                    for i in 0.. {
                        let indexed = format!("{}[{i}]", struct_key.key);
                        let env_key = self.env_key_under(prefix, &indexed);
                        let Some(value) = self.lookup_env(&env_key) else {
                            break;
                        };
                        trace!(env_key, "environment override");
                        found.set(indexed.as_str(), value, SetOptions::default());
                    }
                }
                _ => {
                    let env_key = self.env_key_under(prefix, &struct_key.key);
                    if let Some(value) = self.lookup_env(&env_key) {
                        trace!(env_key, "environment override");
                        found.set(struct_key.key.as_str(), value, SetOptions::default());
                    }
                }
            }
        }

        found.data()
    }

    /// `value` with every leaf replaced by its environment variable, if set.
    /// `env_key` is the variable of `value` itself. A sequence is replaced
    /// whole when its own variable is set, otherwise element by element.
    fn overlay_env(&self, env_key: &str, value: Node) -> Node {
        match value {
            Node::Mapping(entries) => Node::Mapping(
                entries
                    .into_iter()
                    .map(|(key, nested)| {
                        let nested_key = self.env_key_under(env_key, &key);
                        (key, self.overlay_env(&nested_key, nested))
                    })
                    .collect(),
            ),
            Node::Sequence(items) => match self.env_value(env_key) {
                Some(value) => value,
                None => Node::Sequence(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, item)| {
                            let item_key = self.env_key_under(env_key, &i.to_string());
                            self.overlay_env(&item_key, item)
                        })
                        .collect(),
                ),
            },
            leaf => self.env_value(env_key).unwrap_or(leaf),
        }
    }

    fn env_value(&self, env_key: &str) -> Option<Node> {
        let value = self.lookup_env(env_key)?;
        trace!(env_key, "environment override");
        Some(Node::String(value))
    }
}

/// Expands placeholders in the leaves written by the binder.
struct PlaceholderDecoder {
    store: ConfigStore,
    depth: usize,
}

impl Decoder for PlaceholderDecoder {
    fn decode(&self, value: Node) -> Result<Node, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.store.expand_node(value, self.depth)?)
    }
}

/// Placeholder failures surface as themselves rather than wrapped in a
/// binding error.
fn unwrap_decode(key: &str, err: BindError) -> ConfigError {
    match err {
        BindError::Decode { path, source } => match source.downcast::<ConfigError>() {
            Ok(inner) => *inner,
            Err(source) => ConfigError::Bind {
                key: key.to_string(),
                source: BindError::Decode { path, source },
            },
        },
        other => ConfigError::Bind {
            key: key.to_string(),
            source: other,
        },
    }
}

fn getter_error(key: &str, err: BindError) -> ConfigError {
    match err {
        BindError::TypeMismatch {
            path,
            expected,
            found,
            value,
        } => ConfigError::TypeMismatch {
            key: key.to_string(),
            expected,
            reason: format!("{found} value '{value}' at '{path}'"),
        },
        other => unwrap_decode(key, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MemoryEnvProvider;
    use crate::error::ErrorCategory;
    use crate::fixtures::test::{Backoff, RedisSettings, Route, Validated};
    use crate::node;

    fn store_with(values: Node) -> (ConfigStore, Arc<MemoryEnvProvider>) {
        let env = Arc::new(MemoryEnvProvider::new());
        let store = ConfigStore::with_env_provider(env.clone());
        store.merge(".", values, MergeOptions::default()).unwrap();
        (store, env)
    }

    #[test]
    fn environment_overrides_on_next_read() {
        let (store, env) = store_with(node! { "port" => 80, "host" => "localhost" });
        assert_eq!(store.get_int("port", None).unwrap(), 80);
        assert_eq!(store.get_string("host", None).unwrap(), "localhost");

        env.set_env("PORT", "88");
        assert_eq!(store.get_int("port", None).unwrap(), 88);
    }

    #[test]
    fn environment_only_key_is_set() {
        let (store, env) = store_with(node! {});
        assert!(!store.is_set("region"));
        env.set_env("REGION", "eu-central-1");
        assert!(store.is_set("region"));
        assert_eq!(store.get_string("region", None).unwrap(), "eu-central-1");
    }

    #[test]
    fn env_prefix_and_replacer_apply() {
        let (store, env) = store_with(node! { "http-server" => node! { "port" => 80 } });
        store.set_env_prefix("app");
        env.set_env("APP_HTTP_SERVER_PORT", "9000");
        assert_eq!(store.get_int("http-server.port", None).unwrap(), 9000);
    }

    #[test]
    fn missing_key_without_default() {
        let (store, _) = store_with(node! {});
        let err = store.get_string("nope", None).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MissingKey);
        assert_eq!(store.get_string("nope", Some("fallback")).unwrap(), "fallback");
    }

    #[test]
    fn defaults_are_expanded_too() {
        let (store, _) = store_with(node! { "app_project" => "shop" });
        assert_eq!(
            store.get_string("queue", Some("{app_project}-events")).unwrap(),
            "shop-events"
        );
    }

    #[test]
    fn placeholders_expand_from_other_keys() {
        let (store, _) = store_with(node! { "host" => "a.com", "url" => "http://{host}/x" });
        assert_eq!(store.get_string("url", None).unwrap(), "http://a.com/x");
    }

    #[test]
    fn unresolvable_placeholder_fails_the_getter() {
        let (store, _) = store_with(node! { "url" => "http://{host}/x" });
        let err = store.get_string("url", None).unwrap_err();
        assert!(matches!(err, ConfigError::Placeholder { ref placeholder, .. } if placeholder == "host"));
    }

    #[test]
    fn placeholder_in_environment_value_expands() {
        let (store, env) = store_with(node! { "host" => "a.com", "url" => "x" });
        env.set_env("URL", "https://{host}");
        assert_eq!(store.get_string("url", None).unwrap(), "https://a.com");
    }

    #[test]
    fn type_mismatch_from_getter() {
        let (store, _) = store_with(node! { "port" => "eighty" });
        let err = store.get_int("port", None).unwrap_err();
        assert!(matches!(err, ConfigError::TypeMismatch { expected: "integer", .. }));
    }

    #[test]
    fn string_slice_from_comma_list() {
        let (store, env) = store_with(node! { "tags" => vec!["a"] });
        assert_eq!(store.get_string_slice("tags", None).unwrap(), vec!["a"]);
        env.set_env("TAGS", "x, y");
        assert_eq!(store.get_string_slice("tags", None).unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn string_map_string() {
        let (store, _) = store_with(node! {
            "host" => "h",
            "labels" => node! { "a" => "{host}", "b" => 2 },
        });
        let labels = store.get_string_map_string("labels", None).unwrap();
        assert_eq!(labels["a"], "h");
        assert_eq!(labels["b"], "2");
    }

    #[test]
    fn string_map_expands_only_direct_strings() {
        let (store, _) = store_with(node! {
            "host" => "h",
            "m" => node! { "url" => "{host}", "nested" => node! { "raw" => "{id}" } },
            "list" => vec![node! { "url" => "{host}/a", "nested" => node! { "raw" => "{seq}" } }],
        });

        let m = store.get_string_map("m", None).unwrap();
        assert_eq!(m["url"], Node::from("h"));
        assert_eq!(m["nested"], node! { "raw" => "{id}" });

        let list = store.get_mapping_slice("list", None).unwrap();
        assert_eq!(list[0]["url"], Node::from("h/a"));
        assert_eq!(list[0]["nested"], node! { "raw" => "{seq}" });
    }

    #[test]
    fn environment_overrides_indexed_path() {
        let (store, env) = store_with(node! { "servers" => vec![node! { "port" => 80 }] });
        assert_eq!(store.get_int("servers[0].port", None).unwrap(), 80);

        env.set_env("SERVERS_0_PORT", "90");
        assert_eq!(store.get_int("servers[0].port", None).unwrap(), 90);

        let servers = store.get_mapping_slice("servers", None).unwrap();
        assert_eq!(servers[0]["port"], Node::from("90"));
    }

    #[test]
    fn environment_only_indexed_key_agrees_with_is_set() {
        let (store, env) = store_with(node! {});
        env.set_env("EXTRA_0", "7");
        assert!(store.is_set("extra[0]"));
        assert_eq!(store.get_int("extra[0]", None).unwrap(), 7);
    }

    #[test]
    fn env_overlay_is_persisted() {
        let (store, env) = store_with(node! { "port" => 80 });
        env.set_env("PORT", "88");
        store.get_int("port", None).unwrap();
        env.unset_env("PORT");
        assert_eq!(store.get_int("port", None).unwrap(), 88);
    }

    #[test]
    fn has_prefix_checks_env_and_settings() {
        let (store, env) = store_with(node! { "redis" => node! { "addr" => "x" } });
        assert!(store.has_prefix("redis"));
        assert!(!store.has_prefix("kafka"));
        env.set_env("KAFKA_BROKERS", "b:9092");
        assert!(store.has_prefix("kafka"));
    }

    #[test]
    fn unmarshal_layers_defaults_settings_and_env() {
        let (store, env) = store_with(node! {
            "redis" => node! { "addr" => "redis:6379", "backoff" => node! { "attempts" => 3 } },
        });

        let mut settings = RedisSettings::default();
        store.unmarshal_key("redis", &mut settings, &[]).unwrap();
        assert_eq!(settings.addr, "redis:6379");
        assert_eq!(settings.db, 0);
        assert_eq!(settings.backoff.attempts, 3);
        assert_eq!(settings.backoff.max_elapsed_time, Duration::from_secs(600));
        assert_eq!(settings.tags, vec!["a", "b"]);

        env.set_env("REDIS_ADDR", "env:6379");
        env.set_env("REDIS_BACKOFF_MAX_ELAPSED_TIME", "30s");
        let mut settings = RedisSettings::default();
        store.unmarshal_key("redis", &mut settings, &[]).unwrap();
        assert_eq!(settings.addr, "env:6379");
        assert_eq!(settings.backoff.max_elapsed_time, Duration::from_secs(30));
    }

    #[test]
    fn unmarshal_probes_indexed_environment() {
        let (store, env) = store_with(node! { "redis" => node! {} });
        env.set_env("REDIS_TAGS_0", "x");
        env.set_env("REDIS_TAGS_1", "y");
        env.set_env("REDIS_ENDPOINTS_0_NAME", "primary");
        env.set_env("REDIS_ENDPOINTS_0_PORT", "7000");

        let mut settings = RedisSettings::default();
        store.unmarshal_key("redis", &mut settings, &[]).unwrap();
        assert_eq!(settings.tags, vec!["x", "y"]);
        assert_eq!(settings.endpoints.len(), 1);
        assert_eq!(settings.endpoints[0].name, "primary");
        assert_eq!(settings.endpoints[0].address.port, 7000);
    }

    #[test]
    fn unmarshal_persists_layered_settings() {
        let (store, _) = store_with(node! {});
        let mut settings = RedisSettings::default();
        store.unmarshal_key("redis", &mut settings, &[]).unwrap();
        assert_eq!(
            store.get_string("redis.addr", None).unwrap(),
            "localhost:6379"
        );
    }

    #[test]
    fn unmarshal_with_defaults_from_key() {
        let (store, _) = store_with(node! {
            "redis" => node! { "backoff" => node! { "attempts" => 2 } },
            "backoff_defaults" => node! { "attempts" => 9, "max_elapsed_time" => "5s" },
        });

        let mut settings = RedisSettings::default();
        store
            .unmarshal_key(
                "redis",
                &mut settings,
                &[defaults_from_key("backoff_defaults", "backoff")],
            )
            .unwrap();
        assert_eq!(settings.backoff.attempts, 2);
        assert_eq!(settings.backoff.max_elapsed_time, Duration::from_secs(5));
    }

    #[test]
    fn unmarshal_reports_every_validation_failure() {
        let (store, _) = store_with(node! {
            "v" => node! { "mode" => "fast", "name" => "x", "queue" => "jobs" },
        });
        let mut validated = Validated::default();
        let err = store.unmarshal_key("v", &mut validated, &[]).unwrap_err();
        let ConfigError::Validation { source, .. } = err else {
            panic!("expected validation error, got {err}");
        };
        assert_eq!(source.len(), 2);
    }

    #[test]
    fn unmarshal_defaults_ignores_settings() {
        let (store, _) = store_with(node! { "attempts" => 7 });
        let mut backoff = Backoff::default();
        store.unmarshal_defaults(&mut backoff, &[]).unwrap();
        assert_eq!(backoff.attempts, 0);
        assert_eq!(backoff.max_elapsed_time, Duration::from_secs(600));
    }

    #[test]
    fn unmarshal_sequence_and_map() {
        let (store, _) = store_with(node! {
            "list" => vec![node! { "attempts" => 1 }, node! { "attempts" => 2 }],
            "named" => node! { "a" => node! { "attempts" => 3 } },
        });

        let mut list: Vec<Backoff> = Vec::new();
        store.unmarshal_key_seq("list", &mut list, &[]).unwrap();
        assert_eq!(list.iter().map(|b| b.attempts).collect::<Vec<_>>(), vec![1, 2]);

        let mut named: HashMap<String, Backoff> = HashMap::new();
        store.unmarshal_key_map("named", &mut named, &[]).unwrap();
        assert_eq!(named["a"].attempts, 3);
        assert_eq!(named["a"].max_elapsed_time, Duration::from_secs(600));
    }

    #[test]
    fn unmarshal_collections_honor_nodecode() {
        let (store, _) = store_with(node! {
            "app" => node! { "name" => "shop" },
            "routes" => node! {
                "a" => node! { "name" => "{app.name}-a", "pattern" => "{id}-{seq}" },
            },
            "route_list" => vec![node! { "name" => "{app.name}-b", "pattern" => "{id}" }],
        });

        let mut routes: HashMap<String, Route> = HashMap::new();
        store.unmarshal_key_map("routes", &mut routes, &[]).unwrap();
        assert_eq!(routes["a"].name, "shop-a");
        assert_eq!(routes["a"].pattern, "{id}-{seq}");

        let mut list: Vec<Route> = Vec::new();
        store.unmarshal_key_seq("route_list", &mut list, &[]).unwrap();
        assert_eq!(list[0].name, "shop-b");
        assert_eq!(list[0].pattern, "{id}");
    }

    #[test]
    fn unmarshal_sequence_element_reads_indexed_environment() {
        let (store, env) = store_with(node! {
            "list" => vec![node! { "attempts" => 1 }, node! { "attempts" => 2 }],
        });
        env.set_env("LIST_1_ATTEMPTS", "5");

        let mut list: Vec<Backoff> = Vec::new();
        store.unmarshal_key_seq("list", &mut list, &[]).unwrap();
        assert_eq!(list.iter().map(|b| b.attempts).collect::<Vec<_>>(), vec![1, 5]);
    }

    #[test]
    fn unmarshal_map_of_scalar_is_a_shape_error() {
        let (store, _) = store_with(node! { "routes" => "oops" });
        let mut routes: HashMap<String, Route> = HashMap::new();
        let err = store.unmarshal_key_map("routes", &mut routes, &[]).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Shape);
    }

    #[test]
    fn unmarshal_scalar_key_is_a_shape_error() {
        let (store, _) = store_with(node! { "redis" => "oops" });
        let mut settings = RedisSettings::default();
        let err = store.unmarshal_key("redis", &mut settings, &[]).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Shape);
    }

    #[test]
    fn merge_settings_reads_record() {
        let (store, _) = store_with(node! {});
        let backoff = Backoff {
            attempts: 4,
            max_elapsed_time: Duration::from_secs(1),
        };
        store.merge_settings("retry", &backoff).unwrap();
        assert_eq!(store.get_int("retry.attempts", None).unwrap(), 4);
        assert_eq!(
            store.get_duration("retry.max_elapsed_time", None).unwrap(),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn format_string_prefers_args() {
        let (store, _) = store_with(node! { "env" => "prod", "name" => "shop" });
        let args = HashMap::from([("name".to_string(), "billing".to_string())]);
        assert_eq!(
            store.format_string("{env}-{name}", &args).unwrap(),
            "prod-billing"
        );
    }
}
