//! Gateway implementation

mod builder;
mod orchestrator;

pub use builder::{Bifrost, BifrostBuilder};
pub use orchestrator::Gateway;
