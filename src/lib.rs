//! Ledgerline - event-sourcing message broker
//!
//! Producers append documents to named channels and receive gap-free,
//! durable sequence numbers. Subscribers receive each channel's events in
//! order on a single affinity context, with credit-based flow control.
//! Named queries filter binder (key/document) read models on demand.

pub mod broker;
pub mod config;
pub mod document;
pub mod event;
pub mod query;
pub mod sink;
pub mod storage;
pub mod subscription;
pub mod utils;

pub use broker::{Broker, Producer};
pub use config::Config;
pub use document::Document;
pub use event::Event;
pub use query::{KeyVal, QueryError};
pub use sink::{EventSink, SinkError};
pub use subscription::{AffinityContext, ReceivedEvent, StartPosition, Subscription};
