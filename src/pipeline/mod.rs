//! Pipeline stages for bill extraction.
//!
//! Each submodule implements exactly one step, so each can be tested without
//! the other and the model backend can change without touching the loader.
//!
//! ## Data Flow
//!
//! ```text
//! load ──▶ extract
//! (bytes)  (VLM → BillExtraction)
//! ```
//!
//! 1. [`load`]    — read the file, detect its MIME type; the only disk I/O
//! 2. [`extract`] — drive the model call with optional timeout and retry;
//!    the only network I/O

pub mod extract;
pub mod load;
