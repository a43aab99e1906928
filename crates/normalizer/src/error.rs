//! Error types for payload normalization.

use thiserror::Error;

/// Result type alias for normalization operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Normalization errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The carrier returned nothing usable.
    #[error("{carrier} response data is empty")]
    EmptyResponse { carrier: &'static str },

    /// A webhook payload lacks a field needed to identify the shipment.
    #[error("{carrier} webhook payload is missing {field}")]
    MissingField {
        carrier: &'static str,
        field: &'static str,
    },
}
