#![deny(missing_docs)]

//! Core library for the Medisum prescription summarization service.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Prescription document extraction client.
pub mod extraction;
/// Summary generation client abstraction and adapters.
pub mod generation;
/// Vector index backends.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Retrieval-augmented summarization pipeline.
pub mod pipeline;
/// Bookkeeping store for processed documents.
pub mod store;
