//! Bundled OFX aggregate types.
//!
//! These are passive data holders; all wire behavior lives in their
//! registrations, collected by [`build_registry`]. Enumerated elements are
//! stored as the raw wire string with a derived accessor that maps the
//! well-known tokens and yields `None` for anything else.

pub mod common;
pub mod investment;
pub mod seclist;
pub mod signon;

use once_cell::sync::Lazy;

use crate::error::Result;
use crate::meta::Registry;

/// Build a registry containing every aggregate type bundled with this crate.
pub fn build_registry() -> Result<Registry> {
    let mut builder = Registry::builder();
    common::register(&mut builder)?;
    seclist::register(&mut builder)?;
    signon::register(&mut builder)?;
    investment::register(&mut builder)?;
    builder.build()
}

static DEFAULT_REGISTRY: Lazy<Registry> = Lazy::new(|| match build_registry() {
    Ok(registry) => registry,
    // The bundled registrations are validated by tests; failing here means
    // the crate itself is broken.
    Err(e) => panic!("bundled OFX metadata is invalid: {e}"),
});

/// The shared registry of bundled types, built once on first use.
pub fn default_registry() -> &'static Registry {
    &DEFAULT_REGISTRY
}
