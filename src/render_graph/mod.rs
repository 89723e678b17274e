//! Frame Graph System
//!
//! A declarative system for defining render passes and their resources as a
//! graph. The graph fixes execution order at compile time, realizes
//! transient GPU resources lazily on first write, and inserts the layout and
//! memory transitions producers and consumers need.

pub mod barrier;
pub mod graph;
pub mod pass;
pub mod resource;

pub use barrier::*;
pub use graph::*;
pub use pass::*;
pub use resource::*;
