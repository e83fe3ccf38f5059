//! Event bus for the NeuroGuard Consent Ledger (NCL).
//!
//! Fans committed consent updates out to subscribers:
//! - Events are released in strictly increasing sequence order, with a
//!   bounded reorder buffer for publishers that race each other
//! - Every subscriber has its own bounded queue; on overflow the oldest
//!   undelivered event is dropped and counted, and the publisher never waits
//! - Delivery is at-least-once; a [`Subscription`] discards anything at or
//!   below the last sequence it yielded

pub mod bus;
pub mod config;
pub mod error;
pub mod filter;
pub mod subscription;

mod queue;

pub use bus::{EventBus, PublishReport};
pub use config::BusConfig;
pub use error::{BusError, Result, TryRecvError};
pub use filter::EventFilter;
pub use subscription::Subscription;
