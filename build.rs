//! Embeds commit and build-time metadata for the version surfaces.

use std::env;
use std::fs;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    watch_current_branch_ref();
    println!("cargo:rerun-if-env-changed=SHOPMATE_BUILD_GIT_HASH");
    println!("cargo:rerun-if-env-changed=SHOPMATE_BUILD_TIMESTAMP");

    // Release pipelines may pin both values; local builds derive them.
    let commit = env::var("SHOPMATE_BUILD_GIT_HASH")
        .ok()
        .or_else(|| command_stdout("git", &["rev-parse", "--short=12", "HEAD"]))
        .unwrap_or_else(|| "unknown".to_string());
    let timestamp = env::var("SHOPMATE_BUILD_TIMESTAMP")
        .ok()
        .or_else(|| command_stdout("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"]))
        .unwrap_or_else(epoch_seconds_marker);

    println!("cargo:rustc-env=SHOPMATE_BUILD_GIT_HASH={commit}");
    println!("cargo:rustc-env=SHOPMATE_BUILD_TIMESTAMP={timestamp}");
}

/// Re-run when the checked-out branch advances, not just when HEAD moves.
fn watch_current_branch_ref() {
    if let Ok(head) = fs::read_to_string(".git/HEAD") {
        if let Some(reference) = head.trim().strip_prefix("ref: ") {
            println!("cargo:rerun-if-changed=.git/{reference}");
        }
    }
}

fn epoch_seconds_marker() -> String {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|delta| delta.as_secs())
        .unwrap_or(0);
    format!("unix:{seconds}")
}

fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
