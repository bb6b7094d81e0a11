//! Stamps `csb doctor` output with when and from which commit csb was built.
//!
//! `CSB_BUILD_TIMESTAMP` is RFC 3339 UTC to the second. `CSB_GIT_COMMIT` is the
//! abbreviated `HEAD` hash, or `unknown` for builds outside a checkout (such as
//! a crates.io tarball).

use std::process::Command;

fn main() {
    for tracked in [".git/HEAD", ".git/index"] {
        println!("cargo:rerun-if-changed={tracked}");
    }

    let built = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let commit = head_commit().unwrap_or_else(|| String::from("unknown"));

    println!("cargo:rustc-env=CSB_BUILD_TIMESTAMP={built}");
    println!("cargo:rustc-env=CSB_GIT_COMMIT={commit}");
}

/// `git rev-parse --short HEAD`, when git is installed and this is a checkout.
fn head_commit() -> Option<String> {
    let out = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())?;
    let hash = String::from_utf8(out.stdout).ok()?;
    let hash = hash.trim();
    (!hash.is_empty()).then(|| hash.to_string())
}
