//! Resumable chunked-upload session server.
//!
//! Clients upload large files in independently-transmitted chunks, resume
//! interrupted uploads, and trigger server-side reassembly once all chunks
//! arrive. Session metadata lives in SQLite; chunk bytes live on local disk;
//! a bounded admission gate fronts every upload operation.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
