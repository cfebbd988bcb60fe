//! Build script for mai-worker
//!
//! Exposes `GIT_HASH`, `BUILD_TIMESTAMP` and `BUILD_PROFILE` to the binary,
//! which logs them at startup.

use std::process::Command;

const UNKNOWN: &str = "unknown";

fn main() {
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| UNKNOWN.to_string());
    let built_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    for (key, value) in [
        ("GIT_HASH", short_commit()),
        ("BUILD_TIMESTAMP", built_at),
        ("BUILD_PROFILE", profile),
    ] {
        println!("cargo:rustc-env={}={}", key, value);
    }
}

/// Abbreviated HEAD commit, or `unknown` outside a git checkout
fn short_commit() -> String {
    let Ok(output) = Command::new("git").args(["rev-parse", "--short=8", "HEAD"]).output() else {
        return UNKNOWN.to_string();
    };
    if !output.status.success() {
        return UNKNOWN.to_string();
    }
    String::from_utf8(output.stdout)
        .map(|hash| hash.trim().to_string())
        .unwrap_or_else(|_| UNKNOWN.to_string())
}
