// Compute kernel loading
//
// Vulkan uses SPIR-V bytecode for shaders. Kernels are read from disk at
// program start and wrapped in a shader module.

use anyhow::{Context, Result};
use ash::util::read_spv;
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use super::ComputeDevice;

/// Read a SPIR-V binary into 4-byte words.
///
/// Truncated files (length not a multiple of 4) and files without the
/// SPIR-V magic number are rejected.
pub fn read_spirv<P: AsRef<Path>>(path: P) -> Result<Vec<u32>> {
    let path = path.as_ref();

    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read shader file: {:?}", path))?;

    read_spv(&mut Cursor::new(bytes))
        .with_context(|| format!("Invalid SPIR-V in {:?}", path))
}

/// Create a shader module from SPIR-V words
pub fn create_shader_module(device: &ComputeDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(code);

    unsafe {
        device
            .device
            .create_shader_module(&create_info, None)
            .context("Failed to create shader module")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("vulkan-compute-{}-{}", std::process::id(), name))
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = read_spirv("no/such/kernel.spv").unwrap_err();
        assert!(err.to_string().contains("Failed to read shader file"));
    }

    #[test]
    fn truncated_file_is_an_error() {
        let path = temp_path("truncated.spv");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&SPIRV_MAGIC.to_le_bytes()).unwrap();
        file.write_all(&[0xff]).unwrap(); // 5 bytes total
        drop(file);

        assert!(read_spirv(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn valid_words_round_trip() {
        let path = temp_path("valid.spv");
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&SPIRV_MAGIC.to_le_bytes());
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let words = read_spirv(&path).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
        std::fs::remove_file(&path).unwrap();
    }
}
