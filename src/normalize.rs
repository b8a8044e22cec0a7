//! Canonical package identity.
//!
//! NuGet package ids are case-insensitive. Every map lookup, cache path and
//! identity comparison in this crate goes through [`normalize_name`].

/// Case-folds a package id into its canonical lookup key.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase()
}

/// Case-folds a version string the way the global packages cache does.
pub fn normalize_version(version: &str) -> String {
    version.to_lowercase()
}
