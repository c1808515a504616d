//! Testing utilities and mock implementations
//!
//! This module provides mocks for exercising the session workers and shell
//! commands without a running MQTT broker.

pub mod mocks;

pub use mocks::*;
