//! # Wireplan Cache
//!
//! 髒標記追蹤與增量目標值快取

pub mod dirty_tracking;
pub mod incremental;

// Re-export 主要類型
pub use dirty_tracking::DirtyTracker;
pub use incremental::{IncrementalObjective, MachineScore, Proposal};
