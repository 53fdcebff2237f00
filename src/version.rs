//! Version information.

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name from Cargo.toml.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// `{name}/{version}`, as sent in HTTP `User-Agent` headers.
pub fn user_agent() -> String {
    format!("{PKG_NAME}/{PKG_VERSION}")
}
