//! Cargoplug carrier format.

mod format;

pub use format::CargoplugFormat;

/// Provider key.
pub const NAME: &str = "cargoplug";
