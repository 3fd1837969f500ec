//! Image compression worker
//!
//! Consumes image jobs from a RabbitMQ queue, fetches the referenced original
//! from blob storage, recompresses it as JPEG and writes the result next to
//! the original under a mapped directory. Failures are acked, requeued or
//! discarded depending on whether a retry could ever succeed.

pub mod alert;
pub mod app;
pub mod error;
pub mod image;
pub mod job;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod storage;
pub mod worker;

pub use error::{Error, Result};
