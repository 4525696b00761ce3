//! Service layer for business logic with dependency injection.
//!
//! Services accept trait-based dependencies so they can be tested against
//! in-memory implementations.

pub mod landed;
pub mod retarget;
pub mod sync;

#[cfg(test)]
pub mod test_mocks;

pub use landed::{Landed, LandedService};
pub use retarget::RetargetService;
pub use sync::SyncStackService;
