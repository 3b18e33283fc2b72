//! Channel orchestration: per-channel serialization and message routing.

pub mod channel_registry;
pub mod dispatcher;

pub use channel_registry::{ChannelPermit, ChannelRegistry};
pub use dispatcher::{Dispatch, Dispatcher};
