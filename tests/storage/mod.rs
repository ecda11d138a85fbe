//! Shared storage integration tests.
//!
//! Tests the ChannelStore and BinderStore interfaces against all
//! implementations. Each implementation module imports these test functions
//! and runs them.

pub mod binder_store_tests;
pub mod channel_store_tests;
