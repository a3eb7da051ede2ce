// =============================================================================
// VULKAN COMPUTE DEMO
// =============================================================================
//
// A linear demonstration of headless Vulkan compute:
//
// 1. Create a Vulkan instance and pick the first compute-capable GPU
// 2. Allocate two storage buffers (input filled with 0..n by the host)
// 3. Load a precompiled SPIR-V kernel and build a compute pipeline
// 4. Record one dispatch, submit it, and block on a fence
// 5. Read both buffers back and print them
// 6. Dump allocator statistics to disk
// 7. Tear everything down in reverse-acquisition order
//
// Any failure aborts the sequence; it is logged and the process still
// exits 0.
//
// =============================================================================

mod backend;
mod config;

use anyhow::{Context, Result};
use ash::vk;
use backend::{ComputeDevice, ComputePipeline, DescriptorBindings, StorageBuffer};
use config::Config;
use gpu_allocator::MemoryLocation;

const MB: vk::DeviceSize = 1024 * 1024;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() {
    // Load configuration from config.toml
    let config = Config::load();

    // Initialize logging
    init_logging();
    log::info!("Starting Vulkan compute demo");

    // Errors are reported on the console only; the exit code stays 0
    if let Err(e) = run(&config) {
        log::error!("Error: {:#}", e);
    }
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

// =============================================================================
// DEMO SEQUENCE
// =============================================================================

fn run(config: &Config) -> Result<()> {
    // ─────────────────────────────────────────────────────────────────────────
    // STEP 1: Device, compute queue, allocator
    // ─────────────────────────────────────────────────────────────────────────
    let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
    let device = ComputeDevice::new("VulkanCompute", enable_validation)?;

    // ─────────────────────────────────────────────────────────────────────────
    // STEP 2: Storage buffers, input filled from the host
    // ─────────────────────────────────────────────────────────────────────────
    let count = config.demo.element_count;
    let buffer_size = (count as usize * std::mem::size_of::<i32>()) as vk::DeviceSize;

    let (mut in_buffer, out_buffer) = if config.demo.use_allocator {
        (
            StorageBuffer::managed(&device, "in_buffer", buffer_size, MemoryLocation::CpuToGpu)?,
            StorageBuffer::managed(&device, "out_buffer", buffer_size, MemoryLocation::GpuToCpu)?,
        )
    } else {
        (
            StorageBuffer::host_visible(&device, buffer_size)?,
            StorageBuffer::host_visible(&device, buffer_size)?,
        )
    };

    in_buffer.write_i32s(&device, &input_sequence(count))?;

    // ─────────────────────────────────────────────────────────────────────────
    // STEP 3: Kernel, pipeline, descriptor set
    // ─────────────────────────────────────────────────────────────────────────
    let spirv = backend::shader::read_spirv(&config.demo.shader_path)?;
    let shader = backend::shader::create_shader_module(&device, &spirv)?;
    let pipeline = ComputePipeline::new(&device, shader, "main")?;
    let bindings = DescriptorBindings::new(
        &device,
        pipeline.set_layout,
        in_buffer.buffer,
        out_buffer.buffer,
        buffer_size,
    )?;

    // ─────────────────────────────────────────────────────────────────────────
    // STEP 4: Record and submit one batch of work, block on the fence
    // ─────────────────────────────────────────────────────────────────────────
    let pool_info =
        vk::CommandPoolCreateInfo::default().queue_family_index(device.compute_queue_family);
    let command_pool = unsafe { device.device.create_command_pool(&pool_info, None) }
        .context("Failed to create command pool")?;

    let alloc_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let cmd = unsafe { device.device.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate command buffer")?[0];

    record_dispatch(&device, cmd, &pipeline, &bindings, count)?;

    let fence = unsafe { device.device.create_fence(&vk::FenceCreateInfo::default(), None) }
        .context("Failed to create fence")?;

    let command_buffers = [cmd];
    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

    unsafe {
        device
            .device
            .queue_submit(device.compute_queue, &[submit_info], fence)
            .context("Failed to submit compute work")?;
        device
            .device
            .wait_for_fences(&[fence], true, u64::MAX)
            .context("Failed waiting for compute fence")?;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // STEP 5: Read back and print both buffers
    // ─────────────────────────────────────────────────────────────────────────
    println!("Input : {}", format_row(&in_buffer.read_i32s(&device, count as usize)?));
    println!("Output: {}", format_row(&out_buffer.read_i32s(&device, count as usize)?));

    // ─────────────────────────────────────────────────────────────────────────
    // STEP 6: Allocator diagnostics (managed path only)
    // ─────────────────────────────────────────────────────────────────────────
    if config.demo.use_allocator {
        write_allocator_diagnostics(&device, config)?;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // STEP 7: Teardown in reverse-acquisition order
    // ─────────────────────────────────────────────────────────────────────────
    // The device wrapper releases the allocator, logical device and
    // instance when it drops.
    in_buffer.destroy(&device);
    out_buffer.destroy(&device);
    unsafe {
        device.device.destroy_fence(fence, None);
    }
    bindings.destroy(&device);
    pipeline.destroy(&device);
    unsafe {
        device.device.destroy_shader_module(shader, None);
        device.device.destroy_command_pool(command_pool, None);
    }

    log::info!("Compute demo finished");
    Ok(())
}

/// Host-side contents written to the input buffer before dispatch
fn input_sequence(count: u32) -> Vec<i32> {
    (0..count as i32).collect()
}

fn format_row(values: &[i32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Record a one-time-submit command buffer: bind pipeline and descriptor
/// set, dispatch one invocation per element.
fn record_dispatch(
    device: &ComputeDevice,
    cmd: vk::CommandBuffer,
    pipeline: &ComputePipeline,
    bindings: &DescriptorBindings,
    count: u32,
) -> Result<()> {
    let begin_info = vk::CommandBufferBeginInfo::default()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        device.device.begin_command_buffer(cmd, &begin_info)?;
        device
            .device
            .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, pipeline.pipeline);
        device.device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::COMPUTE,
            pipeline.layout,
            0,
            &[bindings.set],
            &[],
        );
        device.device.cmd_dispatch(cmd, count, 1, 1);
        device.device.end_command_buffer(cmd)?;
    }

    Ok(())
}

// =============================================================================
// ALLOCATOR DIAGNOSTICS
// =============================================================================

/// Allocate a few scratch buffers to see how the allocator lays them out,
/// then dump its statistics to the configured report files.
fn write_allocator_diagnostics(device: &ComputeDevice, config: &Config) -> Result<()> {
    let scratch = [
        ("scratch_host_to_gpu", 4 * MB, MemoryLocation::CpuToGpu),
        ("scratch_gpu_to_host", 10 * MB, MemoryLocation::GpuToCpu),
        ("scratch_gpu_only", 20 * MB, MemoryLocation::GpuOnly),
        ("scratch_host_side", 100 * MB, MemoryLocation::CpuToGpu),
    ];

    let mut buffers = Vec::with_capacity(scratch.len());
    for (name, size, location) in scratch {
        buffers.push(StorageBuffer::managed(device, name, size, location)?);
    }

    // First report while the scratch buffers are live
    write_allocator_report(device, &config.debug.scratch_report)?;

    for buffer in buffers {
        buffer.destroy(device);
    }

    // Second report with only the demo buffers remaining
    write_allocator_report(device, &config.debug.allocator_report)
}

/// Overwrites any existing file of the same name
fn write_allocator_report(device: &ComputeDevice, path: &str) -> Result<()> {
    let report = device.allocator.lock().generate_report();
    std::fs::write(path, format!("{:#?}\n", report))
        .with_context(|| format!("Failed to write allocator report to {}", path))?;
    log::info!("Wrote allocator report to {}", path);
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_sequence_counts_from_zero() {
        assert_eq!(input_sequence(10), vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert!(input_sequence(0).is_empty());
    }

    #[test]
    fn rows_are_space_separated() {
        assert_eq!(format_row(&[0, 1, 4, 9]), "0 1 4 9");
        assert_eq!(format_row(&[]), "");
    }
}
