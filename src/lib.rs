//! Path-addressable configuration with typed records, a live environment
//! overlay and `{key}` placeholders.
//!
//! ```ignore
//! use cfgkit::{ConfigStore, Settings};
//!
//! #[derive(Settings, Default)]
//! struct RedisSettings {
//!     #[config(key = "addr", default = "localhost:6379")]
//!     addr: String,
//!     #[config(key = "db", default = "0", validate = "lte=15")]
//!     db: u8,
//! }
//!
//! let store = ConfigStore::builder()
//!     .config_file("config.dist.toml")
//!     .optional_config_file("config.local.toml")
//!     .build()?;
//!
//! let mut redis = RedisSettings::default();
//! store.unmarshal_key("redis.default", &mut redis, &[])?;
//! let port = store.get_int("httpserver.port", Some(8080))?;
//! ```
//!
//! # The store
//!
//! A [`ConfigStore`] holds one tree of [`Node`]s addressed by dotted paths
//! (`redis.default.addr`, `servers[1].port`, `a\.b` for a literal dot). Files,
//! maps and single settings are merged into it at construction time.
//!
//! Every read consults the environment first. The variable for a path is
//! derived by prefixing, turning indices into segments, replacing `.` and
//! `-` with `_` and upper-casing:
//!
//! ```text
//! redis.default.backoff.max_elapsed_time  ->  REDIS_DEFAULT_BACKOFF_MAX_ELAPSED_TIME
//! ```
//!
//! Whatever a read sees is written back, so a value picked up from the
//! environment stays after the variable goes away.
//!
//! # Records
//!
//! `#[derive(Settings)]` describes a struct to the binder. Only fields with a
//! `key` (or `flatten`) take part:
//!
//! | attribute          | meaning                                              |
//! |--------------------|------------------------------------------------------|
//! | `key = "..."`      | path segment of the field                            |
//! | `default = "..."`  | literal cast into the field type when nothing is set |
//! | `validate = "..."` | rules checked after binding, see [`validate`]        |
//! | `nocast`           | take the value as-is, no conversion                  |
//! | `nodecode`         | no placeholder expansion                             |
//! | `flatten`          | the nested record's fields live in this namespace    |
//!
//! [`ConfigStore::unmarshal_key`] layers zero values, field defaults, extra
//! defaults, the stored settings and the environment, in that order, then
//! writes the record and validates it.
//!
//! # Placeholders
//!
//! A string value may reference other keys: `"http://{host}:{port}/"`.
//! Expansion is recursive and happens on read. A value starting with
//! `!nodecode ` is returned verbatim without the flag.
//!
//! # Errors
//!
//! Everything returns `Result<_, ConfigError>`. For call sites that would
//! rather not, [`ConfigStore::checked`] hands failures to the configured
//! [`ErrorHandler`]s (panicking by default) and returns zero values.

extern crate self as cfgkit;

pub mod binder;
pub mod error;
pub mod file;
pub mod handler;
pub mod identity;
pub mod options;
pub mod path;
pub mod pathmap;
pub mod postprocess;
pub mod sanitize;
pub mod template;
pub mod validate;

mod checked;
mod env;
mod node;
mod ser;
mod store;

#[cfg(test)]
mod fixtures;

pub use binder::{
    BindContext, Bindable, Binder, Caster, Decoder, DurationCaster, FieldDescriptor, FieldFlags,
    Kind, ScalarType, Settings, StructDescriptor, StructKey, TimeCaster,
};
pub use cfgkit_derive::Settings;
pub use checked::Checked;
pub use env::{EnvKeyReplacer, EnvProvider, MemoryEnvProvider, OsEnvProvider, derive_env_key};
pub use error::{BindError, ConfigError, ErrorCategory, PathMapError, ValidationError, ValidationErrors};
pub use file::FileFormat;
pub use handler::{
    CollectingErrorHandler, ErrorHandler, FnErrorHandler, LogErrorHandler, PanicErrorHandler,
};
pub use identity::AppIdentity;
pub use node::{Mapping, Node};
pub use options::{
    ConfigOption, ConfigStoreBuilder, with_config_file, with_config_file_format, with_config_map,
    with_config_map_options, with_config_setting, with_config_setting_options, with_env_key_prefix,
    with_env_key_replacer, with_env_provider, with_error_handlers, with_optional_config_file,
    with_sanitizers,
};
pub use path::Path;
pub use pathmap::{MergeOptions, PathMap, SetOptions};
pub use postprocess::{FnPostProcessor, PostProcessor, PostProcessors};
pub use sanitize::{Sanitizer, TimeSanitizer};
pub use ser::to_node;
pub use store::{AdditionalDefaults, ConfigStore, defaults_from_key};
