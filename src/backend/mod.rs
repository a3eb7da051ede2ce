// Backend module - Vulkan abstraction layer
//
// Design: Thin wrapper around ash with safety and ergonomics

pub mod buffer;
pub mod device;
pub mod pipeline;
pub mod shader;

pub use buffer::StorageBuffer;
pub use device::ComputeDevice;
pub use pipeline::{ComputePipeline, DescriptorBindings};
