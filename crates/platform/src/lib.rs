//! # Skiff Platform
//!
//! Core platform types and utilities for the Skiff protocol stack.
//!
//! This crate provides:
//! - Unified error types (`SkiffError`, `SkiffResult`)
//!
//! # Examples
//!
//! ```
//! use skiff_platform::{SkiffError, SkiffResult};
//!
//! fn example_function() -> SkiffResult<String> {
//!     Ok("Hello, Skiff!".to_string())
//! }
//!
//! # fn main() -> SkiffResult<()> {
//! let result = example_function()?;
//! assert_eq!(result, "Hello, Skiff!");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;

pub use error::{SkiffError, SkiffResult};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
