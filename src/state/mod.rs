//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `PaginationState`: the per-category pagination state machine's states
//! - `HostState` / `HostPacer`: per-host politeness slots

mod host_state;
mod pagination_state;

// Re-export main types
pub use host_state::{HostPacer, HostState};
pub use pagination_state::PaginationState;
