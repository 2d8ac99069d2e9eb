//! Version information.

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git commit SHA supplied by the build environment, or "unknown".
pub const GIT_SHA: &str = match option_env!("CHAINRELAY_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

/// Full version string: `{version}` or `{version}+{sha}` when a commit SHA
/// was supplied at build time.
///
/// Examples:
/// - `0.1.0`
/// - `0.1.0+abc1234`
pub fn version_string() -> String {
    if GIT_SHA == "unknown" {
        PKG_VERSION.to_string()
    } else {
        format!("{PKG_VERSION}+{}", &GIT_SHA[..7.min(GIT_SHA.len())])
    }
}
