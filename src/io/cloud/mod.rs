//! Provider-agnostic object storage.
//!
//! Shard stores and catalogs talk to [`ObjectIO`]; real backends (S3, GCS and
//! so on) implement it outside this crate and are attached to a URL scheme via
//! [`crate::store::Stores::register_scheme`]. [`FakeObjectIO`] keeps everything
//! in memory.

pub mod fake;
pub mod helpers;
pub mod traits;

pub use fake::FakeObjectIO;
pub use helpers::{ObjectUrl, parse_object_url, url_scheme};
pub use traits::*;
