//! `volumetra-middleware` – message passing between pipeline layers.
//!
//! Routes operator commands into the measurement loop and measurement
//! reports out of it without either side holding a reference to the other.
//!
//! # Modules
//!
//! - [`bus`] – typed, topic-based publish/subscribe event bus built on Tokio
//!   broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
