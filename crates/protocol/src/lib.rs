//! Serde shapes spoken with the native conversation engine.
//!
//! Outgoing traffic is a [`Submission`] carrying one [`Op`]; incoming traffic
//! is an [`EventEnvelope`] whose [`EventMsg`] keeps its `type` tag and raw
//! fields, so event kinds this crate has never heard of still round-trip.
//! Typed payloads exist only for the kinds the bridge routes, and are reached
//! through [`EventMsg::decode`].
//!
//! Policy enums in [`policy`] double as configuration values and parse from
//! their wire spelling.

pub mod event;
pub mod policy;
pub mod submission;

pub use event::*;
pub use policy::*;
pub use submission::*;
