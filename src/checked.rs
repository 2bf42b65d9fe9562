//! Getters without `Result`. Failures go to the store's error handlers and
//! the caller gets the type's zero value.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::binder::{Bindable, Settings};
use crate::error::ConfigError;
use crate::handler::dispatch;
use crate::node::Mapping;
use crate::store::{AdditionalDefaults, ConfigStore};

/// Borrowed from [`ConfigStore::checked`].
#[derive(Debug, Clone, Copy)]
pub struct Checked<'a> {
    store: &'a ConfigStore,
}

impl<'a> Checked<'a> {
    pub(crate) fn new(store: &'a ConfigStore) -> Self {
        Self { store }
    }

    fn handle<T: Default>(&self, result: Result<T, ConfigError>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => {
                dispatch(&self.store.error_handlers(), &err);
                T::default()
            }
        }
    }

    pub fn get_as<T: Bindable + Default>(&self, key: &str, default: Option<T>) -> T {
        self.handle(self.store.get_as(key, default))
    }

    pub fn get_string(&self, key: &str, default: Option<&str>) -> String {
        self.handle(self.store.get_string(key, default))
    }

    pub fn get_int(&self, key: &str, default: Option<i32>) -> i32 {
        self.handle(self.store.get_int(key, default))
    }

    pub fn get_i64(&self, key: &str, default: Option<i64>) -> i64 {
        self.handle(self.store.get_i64(key, default))
    }

    pub fn get_bool(&self, key: &str, default: Option<bool>) -> bool {
        self.handle(self.store.get_bool(key, default))
    }

    pub fn get_float(&self, key: &str, default: Option<f64>) -> f64 {
        self.handle(self.store.get_float(key, default))
    }

    pub fn get_duration(&self, key: &str, default: Option<Duration>) -> Duration {
        self.handle(self.store.get_duration(key, default))
    }

    /// The Unix epoch on failure.
    pub fn get_time(&self, key: &str, default: Option<DateTime<Utc>>) -> DateTime<Utc> {
        self.handle(self.store.get_time(key, default))
    }

    pub fn get_string_slice(&self, key: &str, default: Option<Vec<String>>) -> Vec<String> {
        self.handle(self.store.get_string_slice(key, default))
    }

    pub fn get_int_slice(&self, key: &str, default: Option<Vec<i64>>) -> Vec<i64> {
        self.handle(self.store.get_int_slice(key, default))
    }

    pub fn get_string_map(&self, key: &str, default: Option<Mapping>) -> Mapping {
        self.handle(self.store.get_string_map(key, default))
    }

    pub fn get_mapping_slice(&self, key: &str, default: Option<Vec<Mapping>>) -> Vec<Mapping> {
        self.handle(self.store.get_mapping_slice(key, default))
    }

    pub fn get_string_map_string(
        &self,
        key: &str,
        default: Option<HashMap<String, String>>,
    ) -> HashMap<String, String> {
        self.handle(self.store.get_string_map_string(key, default))
    }

    /// Unmarshal into `record`, reporting failures to the handlers. The
    /// record may be partially written when binding fails midway.
    pub fn unmarshal_key<R: Settings>(
        &self,
        key: &str,
        record: &mut R,
        defaults: &[AdditionalDefaults],
    ) {
        self.handle(self.store.unmarshal_key(key, record, defaults))
    }

    pub fn unmarshal_defaults<R: Settings>(&self, record: &mut R, defaults: &[AdditionalDefaults]) {
        self.handle(self.store.unmarshal_defaults(record, defaults))
    }

    pub fn unmarshal_key_seq<R: Settings>(
        &self,
        key: &str,
        out: &mut Vec<R>,
        defaults: &[AdditionalDefaults],
    ) {
        self.handle(self.store.unmarshal_key_seq(key, out, defaults))
    }

    pub fn unmarshal_key_map<R: Settings>(
        &self,
        key: &str,
        out: &mut HashMap<String, R>,
        defaults: &[AdditionalDefaults],
    ) {
        self.handle(self.store.unmarshal_key_map(key, out, defaults))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MemoryEnvProvider;
    use crate::fixtures::test::BrokenDefault;
    use crate::handler::{CollectingErrorHandler, ErrorHandler};
    use crate::node;
    use crate::pathmap::MergeOptions;
    use std::sync::Arc;

    fn collecting_store() -> (ConfigStore, CollectingErrorHandler) {
        let store = ConfigStore::with_env_provider(Arc::new(MemoryEnvProvider::new()));
        let collecting = CollectingErrorHandler::new();
        let handlers: Vec<Arc<dyn ErrorHandler>> = vec![Arc::new(collecting.clone())];
        store.set_error_handlers(handlers);
        store
            .merge(".", node! { "port" => "eighty", "name" => "shop" }, MergeOptions::default())
            .unwrap();
        (store, collecting)
    }

    #[test]
    fn failures_yield_zero_and_reach_handlers() {
        let (store, collecting) = collecting_store();
        assert_eq!(store.checked().get_int("port", None), 0);
        assert_eq!(store.checked().get_string("missing", None), "");
        assert_eq!(collecting.errors().len(), 2);
    }

    #[test]
    fn every_getter_routes_to_handlers() {
        let (store, collecting) = collecting_store();
        let checked = store.checked();

        assert_eq!(checked.get_i64("port", None), 0);
        assert_eq!(checked.get_time("missing", None), DateTime::<Utc>::default());
        assert!(checked.get_int_slice("port", None).is_empty());
        assert!(checked.get_string_map("name", None).is_empty());
        assert!(checked.get_mapping_slice("missing", None).is_empty());

        let mut broken = BrokenDefault::default();
        checked.unmarshal_defaults(&mut broken, &[]);

        let mut named: HashMap<String, BrokenDefault> = HashMap::new();
        checked.unmarshal_key_map("name", &mut named, &[]);

        assert_eq!(collecting.errors().len(), 7);
    }

    #[test]
    fn successes_bypass_handlers() {
        let (store, collecting) = collecting_store();
        assert_eq!(store.checked().get_string("name", None), "shop");
        assert!(collecting.is_empty());
    }

    #[test]
    #[should_panic(expected = "config error")]
    fn default_handler_panics() {
        let store = ConfigStore::with_env_provider(Arc::new(MemoryEnvProvider::new()));
        store.checked().get_string("missing", None);
    }
}
