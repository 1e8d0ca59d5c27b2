//! Process-environment detection shared by tests and the CLI's hardware-test gate.

use std::env;

/// Checks if the application is running in a CI environment.
pub fn is_ci() -> bool {
    env::var("CI").is_ok()
        || env::var("CONTINUOUS_INTEGRATION").is_ok()
        || env::var("GITHUB_ACTIONS").is_ok()
        || env::var("GITLAB_CI").is_ok()
        || env::var("BUILDKITE").is_ok()
}

/// Checks if the caller opted into hardware-dependent integration tests
/// (§10.4: gated behind `CAPTURE_RUN_HARDWARE_TESTS=1`, mirroring how such tests
/// are skipped rather than failed when the real audio stack is unavailable).
pub fn hardware_tests_enabled() -> bool {
    env::var("CAPTURE_RUN_HARDWARE_TESTS").ok().as_deref() == Some("1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_tests_disabled_by_default() {
        // Best-effort: only asserts when the var is genuinely unset in this process.
        if env::var("CAPTURE_RUN_HARDWARE_TESTS").is_err() {
            assert!(!hardware_tests_enabled());
        }
    }
}
