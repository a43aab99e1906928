//! Sendbox carrier format.
//!
//! Sendbox returns its complete event history on every tracking response and
//! every webhook, newest event first.

mod format;

pub use format::SendboxFormat;

/// Provider key.
pub const NAME: &str = "sendbox";
