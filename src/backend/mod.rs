//! Backend abstraction layer
//!
//! The frame graph talks to the GPU through the [`RenderBackend`] trait;
//! [`vulkan::VulkanBackend`] is the production implementation.

pub mod traits;
pub mod types;
pub mod vulkan;

pub use traits::*;
pub use types::*;
