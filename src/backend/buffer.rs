// Storage buffer utilities
//
// Two backing paths for host-accessible storage buffers: memory managed by
// gpu-allocator (persistently mapped), or a manual allocation against the
// first host-visible + host-coherent memory type (mapped around each access).

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use super::ComputeDevice;

/// A storage buffer plus the memory backing it
pub struct StorageBuffer {
    pub buffer: vk::Buffer,
    backing: Backing,
    size: vk::DeviceSize,
}

enum Backing {
    /// gpu-allocator owned; host-visible locations stay mapped for the
    /// allocation's lifetime
    Managed(Allocation),
    /// Manual vkAllocateMemory, mapped/unmapped per access
    Raw(vk::DeviceMemory),
}

impl StorageBuffer {
    /// Create a storage buffer backed by the device's memory allocator
    pub fn managed(
        device: &ComputeDevice,
        name: &str,
        size: vk::DeviceSize,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer = create_storage_buffer(device, size)?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let allocation = device
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .with_context(|| format!("Failed to allocate memory for '{}'", name))?;

        unsafe {
            device
                .device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .context("Failed to bind buffer memory")?;
        }

        Ok(Self {
            buffer,
            backing: Backing::Managed(allocation),
            size,
        })
    }

    /// Create a storage buffer with manually allocated host-visible memory
    pub fn host_visible(device: &ComputeDevice, size: vk::DeviceSize) -> Result<Self> {
        let buffer = create_storage_buffer(device, size)?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

        let (memory_type_index, heap_size) = find_host_visible_memory_type(
            device,
            requirements.memory_type_bits,
        )?;
        log::info!("Memory type index: {}", memory_type_index);
        log::info!("Memory heap size : {} GB", heap_size / 1024 / 1024 / 1024);

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            device
                .device
                .allocate_memory(&alloc_info, None)
                .context("Failed to allocate buffer memory")?
        };

        unsafe {
            device
                .device
                .bind_buffer_memory(buffer, memory, 0)
                .context("Failed to bind buffer memory")?;
        }

        Ok(Self {
            buffer,
            backing: Backing::Raw(memory),
            size,
        })
    }

    /// Copy host data into the buffer
    pub fn write_i32s(&mut self, device: &ComputeDevice, data: &[i32]) -> Result<()> {
        match &mut self.backing {
            Backing::Managed(allocation) => {
                let mapped = allocation
                    .mapped_slice_mut()
                    .context("Buffer memory is not host mapped")?;
                copy_i32s_to_bytes(data, mapped);
            }
            Backing::Raw(memory) => unsafe {
                let ptr = device
                    .device
                    .map_memory(*memory, 0, self.size, vk::MemoryMapFlags::empty())?
                    as *mut i32;
                ptr.copy_from_nonoverlapping(data.as_ptr(), data.len());
                device.device.unmap_memory(*memory);
            },
        }
        Ok(())
    }

    /// Read `count` values back from the buffer
    pub fn read_i32s(&self, device: &ComputeDevice, count: usize) -> Result<Vec<i32>> {
        match &self.backing {
            Backing::Managed(allocation) => {
                let mapped = allocation
                    .mapped_slice()
                    .context("Buffer memory is not host mapped")?;
                Ok(i32s_from_bytes(mapped, count))
            }
            Backing::Raw(memory) => unsafe {
                let ptr = device
                    .device
                    .map_memory(*memory, 0, self.size, vk::MemoryMapFlags::empty())?
                    as *const i32;
                let values = std::slice::from_raw_parts(ptr, count).to_vec();
                device.device.unmap_memory(*memory);
                Ok(values)
            },
        }
    }

    /// Destroy buffer and release its memory
    pub fn destroy(self, device: &ComputeDevice) {
        unsafe {
            device.device.destroy_buffer(self.buffer, None);
        }
        match self.backing {
            Backing::Managed(allocation) => {
                if let Err(e) = device.allocator.lock().free(allocation) {
                    log::error!("Failed to free buffer allocation: {}", e);
                }
            }
            Backing::Raw(memory) => unsafe {
                device.device.free_memory(memory, None);
            },
        }
    }
}

fn create_storage_buffer(device: &ComputeDevice, size: vk::DeviceSize) -> Result<vk::Buffer> {
    let buffer_info = vk::BufferCreateInfo::default()
        .size(size)
        .usage(vk::BufferUsageFlags::STORAGE_BUFFER)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    unsafe {
        device
            .device
            .create_buffer(&buffer_info, None)
            .context("Failed to create buffer")
    }
}

/// First memory type advertising HOST_VISIBLE | HOST_COHERENT within the
/// buffer's allowed type bits, encounter order. Returns the type index and
/// the size of its backing heap.
fn find_host_visible_memory_type(
    device: &ComputeDevice,
    type_filter: u32,
) -> Result<(u32, vk::DeviceSize)> {
    let mem_properties = unsafe {
        device
            .instance
            .get_physical_device_memory_properties(device.physical_device)
    };
    let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

    for i in 0..mem_properties.memory_type_count {
        let memory_type = mem_properties.memory_types[i as usize];
        let has_type = (type_filter & (1 << i)) != 0;

        if has_type && memory_type.property_flags.contains(wanted) {
            let heap = mem_properties.memory_heaps[memory_type.heap_index as usize];
            return Ok((i, heap.size));
        }
    }

    anyhow::bail!("Failed to find a host-visible memory type")
}

fn copy_i32s_to_bytes(values: &[i32], out: &mut [u8]) {
    for (chunk, value) in out.chunks_exact_mut(4).zip(values) {
        chunk.copy_from_slice(&value.to_ne_bytes());
    }
}

fn i32s_from_bytes(bytes: &[u8], count: usize) -> Vec<i32> {
    bytes
        .chunks_exact(4)
        .take(count)
        .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i32s_survive_byte_conversion() {
        let values = [0, 1, -7, i32::MAX, i32::MIN];
        let mut bytes = vec![0u8; values.len() * 4];
        copy_i32s_to_bytes(&values, &mut bytes);
        assert_eq!(i32s_from_bytes(&bytes, values.len()), values);
    }

    #[test]
    fn readback_is_limited_to_count() {
        let values = [3, 4, 5, 6];
        let mut bytes = vec![0u8; values.len() * 4];
        copy_i32s_to_bytes(&values, &mut bytes);
        assert_eq!(i32s_from_bytes(&bytes, 2), vec![3, 4]);
    }
}
