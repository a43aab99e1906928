//! Webhook reconciliation into durable shipment history.
//!
//! This crate provides:
//! - `Reconciler` merging webhook observations and tracking results into
//!   shipments, idempotently
//! - `RetryPolicy` with escalating backoff for failed units
//! - A background worker draining a bounded queue of stored webhooks
//!
//! # Usage
//!
//! ```ignore
//! use reconciler::{worker, Reconciler, RetryPolicy};
//! use std::sync::Arc;
//!
//! let reconciler = Arc::new(Reconciler::with_defaults(shipments));
//! let (queue, handle) = worker::spawn(reconciler, RetryPolicy::default(), 1024);
//!
//! webhooks.record(&webhook).await?;
//! queue.enqueue(webhook).await?;
//! ```

pub mod error;
pub mod reconciler;
pub mod retry;
pub mod worker;

pub use error::{Error, Result};
pub use reconciler::{Outcome, Reconciler};
pub use retry::{RetryDecision, RetryPolicy};
pub use worker::ReconcileQueue;
