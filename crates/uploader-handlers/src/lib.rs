//! # Uploader Handlers - The Ingestion Pipeline
//!
//! The request-facing layer of the uploader: validates envelopes, enforces
//! authorization, and routes event batches through the synchronous (locked)
//! or asynchronous (queued) pipeline. The pipeline itself merges the batch
//! into the current table, publishes a new immutable edition, rewrites the
//! `latest` pointer, registers a distribution, and notifies schema-drift
//! subscribers.
//!
//! All collaborators are passed in through a [`Registry`], built once at
//! process startup.

pub mod consumer;
pub mod events;
pub mod push;
pub mod registry;
pub mod upload;

pub use consumer::handle_queue_message;
pub use events::{add_to_dataset, handle_events};
pub use push::push_dataset_events;
pub use registry::Registry;
pub use upload::generate_signed_post;
