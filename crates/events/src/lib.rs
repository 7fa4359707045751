//! `athanor-events` — in-process event distribution.
//!
//! One [`EventHub`] per process fans serialized [`EventEnvelope`]s out
//! to bounded subscriber mailboxes. Delivery is best-effort: slow
//! subscribers lose messages instead of slowing anyone down.

pub mod envelope;
pub mod hub;

pub use envelope::{EventEnvelope, event_types};
pub use hub::{EventHub, MAILBOX_CAPACITY, Subscriber};
