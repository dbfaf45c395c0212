//! Prelude module - commonly used test utilities.
//!
//! Use `use switchboard_test::prelude::*;` to import all essential helpers.

pub use crate::fixtures::*;
pub use crate::harness::{PackageDir, eventually, setup_test_logging, test_dir, within};
pub use crate::mocks::{
    Launch, ListenerCall, MOCK_PACKAGE_ROOT, MockResolver, MockRunner, MockService,
    MockServiceHandle, RecordedConnect, RecordingListener,
};
