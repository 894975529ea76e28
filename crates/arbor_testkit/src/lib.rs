//! # Arbor Testkit
//!
//! Test utilities for Arbor.
//!
//! This crate provides:
//! - A value node kind with named child slots, and helpers to write it
//! - Recording history and observer implementations
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use arbor_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_nodes() {
//!     let app = Application::new();
//!     let nodes = value_pool(&app, 3);
//!     app.write_context(|tx| set_value(tx, &nodes[0], 7)).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use arbor_core::Application;
}

pub use fixtures::*;
pub use generators::*;
