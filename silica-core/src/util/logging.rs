//! Diagnostics gating.
//!
//! Verbose iteration tables are driven by the `verbose` configuration
//! flag; the deeper numeric traces on stderr are enabled per process via
//! environment variables, checked once.

use std::sync::OnceLock;

/// Whether stderr numeric diagnostics are enabled.
///
/// `SILICA_VERBOSE` at level 2 or higher turns them on; the standalone
/// `SILICA_DIAGNOSTICS` switch is honored as well.
pub fn diagnostics_enabled() -> bool {
    static ENABLED: OnceLock<bool> = OnceLock::new();
    *ENABLED.get_or_init(|| {
        let verbose_trace = std::env::var("SILICA_VERBOSE")
            .ok()
            .and_then(|v| v.parse::<u8>().ok())
            .map(|n| n >= 2)
            .unwrap_or(false);
        let switch = std::env::var("SILICA_DIAGNOSTICS")
            .map(|v| v != "0" && v.to_lowercase() != "false")
            .unwrap_or(false);
        verbose_trace || switch
    })
}
