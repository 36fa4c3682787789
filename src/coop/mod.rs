//! Single-flight cooperation
//!
//! Many callers wanting the logically same expensive, idempotent result
//! share one execution: the first becomes the lead and actually performs it,
//! the rest wait on the shared outcome with bounded, staggered timeouts and
//! a takeover path for stuck leads.

pub mod builder;
pub mod cell;
pub mod flight;
pub mod registry;

pub use builder::CooperationBuilder;
pub use cell::ResultCell;
pub use flight::CooperatingFlight;
pub use registry::Cooperation;
