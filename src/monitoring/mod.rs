//! Run Monitoring Module
//!
//! Provides utilities for tracking job execution timing during
//! workflow runs.
//!
//! # Components
//!
//! - [`ExecutionTimeline`]: Job start/end timing for Gantt charts

pub mod timeline;

pub use timeline::{EventType, ExecutionTimeline, TimelineEvent};
