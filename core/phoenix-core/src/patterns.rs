//! Compiled regex patterns for parsing assistant output and hook payloads.
//!
//! Compiled once on first use. Update these when the generator's completion
//! line or the session directory naming scheme changes.

use once_cell::sync::Lazy;
use regex::Regex;

// ═══════════════════════════════════════════════════════════════════════════════
// Completion Signal
// ═══════════════════════════════════════════════════════════════════════════════

/// `✅ **AGENT_CREATED**: <name> specialized for <purpose>`
///
/// Case-insensitive. The purpose runs to the end of its line and must be non-empty.
pub static RE_AGENT_CREATED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)✅\s*\*\*AGENT_CREATED\*\*:\s*([\w-]+)\s+specialized\s+for[ \t]+([^\r\n]+)")
        .unwrap()
});

// ═══════════════════════════════════════════════════════════════════════════════
// Session Directory Names
// ═══════════════════════════════════════════════════════════════════════════════

/// `session_<YYYYmmdd>_<HHMMSS>_<id>`; captures the stamp and the id.
pub static RE_TIMESTAMPED_SESSION_DIR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^session_(\d{8}_\d{6})_(.+)$").unwrap());
