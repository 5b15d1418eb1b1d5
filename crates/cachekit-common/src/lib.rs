//! # CacheKit Common
//!
//! Shared plumbing for the CacheKit workspace.
//!
//! ## Features
//!
//! - Logging configuration and setup (`tracing` + `tracing-subscriber`)
//! - Retry with exponential backoff
//! - Timeout wrapper for async operations

pub mod logging;
pub mod retry;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use retry::{retry_with_backoff, with_timeout, RetryConfig, TimeoutExpired};
