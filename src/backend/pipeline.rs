// Compute pipeline creation and descriptor bindings
//
// The pipeline binds a single compute shader stage; the descriptor set
// exposes two storage buffers (input at binding 0, output at binding 1).

use anyhow::{Context, Result};
use ash::vk;
use std::ffi::CString;
use super::ComputeDevice;

/// Compute pipeline plus the layout objects it was built from
pub struct ComputePipeline {
    pub set_layout: vk::DescriptorSetLayout,
    pub layout: vk::PipelineLayout,
    pub cache: vk::PipelineCache,
    pub pipeline: vk::Pipeline,
}

impl ComputePipeline {
    pub fn new(
        device: &ComputeDevice,
        shader: vk::ShaderModule,
        entry_point: &str,
    ) -> Result<Self> {
        // Two storage buffers visible to the compute stage
        let bindings = [
            vk::DescriptorSetLayoutBinding::default()
                .binding(0)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::COMPUTE),
            vk::DescriptorSetLayoutBinding::default()
                .binding(1)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::COMPUTE),
        ];

        let set_layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let set_layout = unsafe {
            device
                .device
                .create_descriptor_set_layout(&set_layout_info, None)
                .context("Failed to create descriptor set layout")?
        };

        let set_layouts = [set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let layout = unsafe {
            device
                .device
                .create_pipeline_layout(&layout_info, None)
                .context("Failed to create pipeline layout")?
        };

        let cache = unsafe {
            device
                .device
                .create_pipeline_cache(&vk::PipelineCacheCreateInfo::default(), None)
                .context("Failed to create pipeline cache")?
        };

        let entry = CString::new(entry_point)?;
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader)
            .name(&entry);

        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(layout);

        let pipelines = unsafe {
            device
                .device
                .create_compute_pipelines(cache, &[pipeline_info], None)
                .map_err(|(_, e)| e)
                .context("Failed to create compute pipeline")?
        };

        Ok(Self {
            set_layout,
            layout,
            cache,
            pipeline: pipelines[0],
        })
    }

    pub fn destroy(&self, device: &ComputeDevice) {
        unsafe {
            device.device.destroy_pipeline(self.pipeline, None);
            device.device.destroy_pipeline_cache(self.cache, None);
            device.device.destroy_pipeline_layout(self.layout, None);
            device.device.destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}

/// Descriptor pool and the single set binding both buffers
pub struct DescriptorBindings {
    pub pool: vk::DescriptorPool,
    pub set: vk::DescriptorSet,
}

impl DescriptorBindings {
    pub fn new(
        device: &ComputeDevice,
        set_layout: vk::DescriptorSetLayout,
        in_buffer: vk::Buffer,
        out_buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) -> Result<Self> {
        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count(2)];

        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(1)
            .pool_sizes(&pool_sizes);

        let pool = unsafe {
            device
                .device
                .create_descriptor_pool(&pool_info, None)
                .context("Failed to create descriptor pool")?
        };

        let set_layouts = [set_layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&set_layouts);

        let set = unsafe {
            device
                .device
                .allocate_descriptor_sets(&alloc_info)
                .context("Failed to allocate descriptor set")?[0]
        };

        let in_info = [vk::DescriptorBufferInfo::default()
            .buffer(in_buffer)
            .offset(0)
            .range(range)];
        let out_info = [vk::DescriptorBufferInfo::default()
            .buffer(out_buffer)
            .offset(0)
            .range(range)];

        let writes = [
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .buffer_info(&in_info),
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(1)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .buffer_info(&out_info),
        ];

        unsafe {
            device.device.update_descriptor_sets(&writes, &[]);
        }

        Ok(Self { pool, set })
    }

    pub fn destroy(&self, device: &ComputeDevice) {
        // Frees the set as well
        unsafe {
            device.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}
