//! Process-wide tracing setup shared by daemons and tests.

pub mod subscriber;

pub use subscriber::{DEFAULT_FILTER, init, init_for_tests, init_with_default_filter};
