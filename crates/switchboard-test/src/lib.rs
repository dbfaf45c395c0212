//! Switchboard Test - Shared test utilities for the Switchboard broker.
//!
//! This crate provides mock implementations and test helpers that can be
//! used across multiple Switchboard crates as a dev-dependency.
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! switchboard-test.workspace = true
//! ```
//!
//! Then use in your tests:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use switchboard_broker::BrokerBuilder;
//! use switchboard_test::{MockResolver, MockRunner, test_manifest};
//!
//! #[tokio::test]
//! async fn test_launch() {
//!     let resolver = Arc::new(MockResolver::new().with_manifest(test_manifest("b")));
//!     let runner = Arc::new(MockRunner::new());
//!     let broker = BrokerBuilder::new(resolver, runner.clone()).spawn();
//!     // ...
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
