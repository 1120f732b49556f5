//! Core data models for the chunked-upload service.
//!
//! A `Session` tracks one file upload from creation through completion or
//! cancellation. Records persist as fixed, versioned rows via `sqlx::FromRow`
//! and serialize naturally as JSON via `serde`.

pub mod session;
