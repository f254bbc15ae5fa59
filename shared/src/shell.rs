//! Device Shell Arguments
//!
//! Property keys, setting keys and interface names are spliced into a
//! command line run by the device shell, so only plain identifiers pass.

use std::sync::LazyLock;

use regex::Regex;

static SAFE_ARGUMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("shell argument pattern"));

/// Whether `arg` can be passed to the device shell unquoted
pub fn is_safe_argument(arg: &str) -> bool {
    SAFE_ARGUMENT.is_match(arg)
}
