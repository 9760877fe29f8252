//! Media byte-range cache.
//!
//! Convenience entry point for hosts that want a single dependency. With the
//! default `desktop-shims` feature this re-exports [`core_service`], whose
//! `MediaCacheContext` wires the index, chunk store, fetch pipeline and
//! cache manager together over the native bridges.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
