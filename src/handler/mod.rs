//! Request handler module
//!
//! Responsible for request routing dispatch: the landing page, both
//! ingestion endpoints and short-link streaming.

pub mod router;
pub mod static_files;

// Re-export main entry point
pub use router::handle_request;
