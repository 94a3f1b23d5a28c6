//! Stamps the binary with a build identifier
//!
//! `ENRICH_BUILD_ID` is `<short git hash>-<profile>`, reported by the startup
//! log and `GET /health`. `ENRICH_BUILD_TIME` is the UTC compile time.

use std::process::Command;

fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    let hash = hash.trim();
    (!hash.is_empty()).then(|| hash.to_string())
}

fn main() {
    let hash = git_short_hash().unwrap_or_else(|| "nogit".to_string());
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let built_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    println!("cargo:rustc-env=ENRICH_BUILD_ID={}-{}", hash, profile);
    println!("cargo:rustc-env=ENRICH_BUILD_TIME={}", built_at);
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../.git/HEAD");
}
