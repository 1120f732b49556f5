//! Service layer: stores, assembly, admission control, and the session
//! service that orchestrates them.

pub mod admission;
pub mod assembler;
pub mod chunk_store;
pub mod session_store;
pub mod upload_service;

pub use upload_service::AppService;
