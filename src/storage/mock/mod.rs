//! Mock storage implementations for testing and the `memory` backend.

mod binder_store;
mod channel_store;

pub use binder_store::{MockBinder, MockBinderStore};
pub use channel_store::MockChannelStore;
