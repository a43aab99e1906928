//! Error types for webhook reconciliation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Reading or writing the shipment failed. Retried by the worker.
    #[error(transparent)]
    Store(#[from] external_services::Error),

    /// A webhook failed on every allowed attempt.
    #[error("Reconciliation of webhook {webhook_id} gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        webhook_id: String,
        attempts: u32,
        last_error: String,
    },

    /// The worker is gone; nothing drains the queue.
    #[error("Reconciliation queue is closed")]
    QueueClosed,
}
