//! # tablemirror testkit
//!
//! Test utilities for tablemirror.
//!
//! This crate provides:
//! - Temporary on-disk stores and upstream/webhook fixtures
//! - Property-based test generators using proptest
//! - Webhook signature test vectors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tablemirror_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_store() {
//!     let mirror = TestMirror::sqlite();
//!     let body = webhook_body("appBASE", &ChangeSet::new());
//!     let signature = sign("secret", "1700000000", &body);
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::vectors::*;
}

pub use fixtures::*;
pub use generators::*;
pub use vectors::*;
