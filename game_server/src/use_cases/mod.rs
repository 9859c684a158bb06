// Use cases layer: live game workflows on top of the domain ports.

pub mod context;
pub mod fanout;
pub mod latch;
pub mod live_point;
pub mod point_manager;
pub mod registry;
pub mod runtime;
pub mod user_manager;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::{GameContext, LiveSettings, Ports};
pub use live_point::{Delivery, LivePoint, RangeUpdate};
pub use point_manager::{PointManager, PointRef};
pub use registry::GameRegistry;
pub use runtime::{GameRuntime, LocationOutcome};
pub use user_manager::UserManager;
