pub mod active;
pub mod projection;

pub use active::{ActiveView, SharedActiveView};
pub use projection::{
    InsertOutcome, LoadState, ProjectionEntry, ProjectionStore, SharedProjection,
};
