//! # alifa-guard
//!
//! The checks every user-generated write goes through before it reaches storage:
//! a sliding-window rate limiter, per-form field schemas, HTML and filename
//! sanitization, and file type/size/signature validation.

pub mod clock;
pub mod files;
pub mod rate_limit;
pub mod sanitize;
pub mod schema;

pub use clock::{ManualClock, SystemClock};
pub use files::{validate_file_signature, validate_file_size, validate_file_type};
pub use rate_limit::{RateLimitKey, RateLimiter};
pub use sanitize::{sanitize_content, sanitize_filename};
pub use schema::{validate, validate_serialized, ParsedRecord, SchemaName};
