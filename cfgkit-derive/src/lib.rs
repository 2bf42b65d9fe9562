//! Derive macro for cfgkit settings records.
//!
//! `#[derive(Settings)]` describes a struct to the cfgkit binder: which
//! fields are bound, under which key, with which default literal and which
//! validation rules. It implements both `cfgkit::Settings` and
//! `cfgkit::Bindable` for the struct, so records nest inside other records,
//! sequences and mappings.
//!
//! # Field attributes
//!
//! - `#[config(key = "port")]` binds the field under `port`. Fields without a
//!   key are ignored by the binder.
//! - `#[config(default = "8080")]` is cast into the field's type like any
//!   other value and used when nothing else provides one.
//! - `#[config(validate = "required,min=1")]` lists rules checked after the
//!   record has been populated.
//! - `#[config(nocast)]` skips the caster chain, `#[config(nodecode)]` skips
//!   the decoder chain (placeholder expansion in a config store).
//! - `#[config(flatten)]` promotes a nested record: its fields are read from
//!   and written to the parent's namespace.
//!
//! ```ignore
//! #[derive(Default, Settings)]
//! pub struct RedisSettings {
//!     #[config(key = "addr", default = "localhost:6379")]
//!     pub addr: String,
//!     #[config(key = "db", default = "0", validate = "max=15")]
//!     pub db: u8,
//!     #[config(flatten)]
//!     pub backoff: BackoffSettings,
//! }
//! ```

mod settings;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

#[proc_macro_derive(Settings, attributes(config))]
pub fn derive_settings(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    settings::generate_impl(&input).into()
}
