// Core infrastructure modules
pub mod core {
    pub mod context;
    pub mod errors;
    pub mod policy;
}

// Cooperation facility
pub mod coop;

// Re-exports for convenience
pub use crate::coop::{CooperatingFlight, Cooperation, CooperationBuilder, ResultCell};
pub use crate::core::context::{Attempt, CallContext};
pub use crate::core::errors::ConvoyError;
pub use crate::core::policy::Policy;
