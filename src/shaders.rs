use anyhow::{anyhow, Context};
use std::path::Path;
use vulkanalia::bytecode::Bytecode;
use vulkanalia::vk::{DeviceV1_0, HasBuilder};
use vulkanalia::{vk, Device};

/// Reads a compiled SPIR-V binary from disk.
pub fn load_shader(path: &Path) -> Result<Vec<u8>, anyhow::Error> {
    std::fs::read(path).with_context(|| format!("Failed to read shader `{}`", path.display()))
}

/// Wraps shader code loaded via `load_shader` in a ShaderModule, so that it may be loaded into the
/// render pipeline.
pub fn create_shader_module(
    device: &Device,
    code: &[u8],
) -> Result<vk::ShaderModule, anyhow::Error> {
    let bytecode = Bytecode::new(code).map_err(|e| anyhow!(e))?;

    let create_info = vk::ShaderModuleCreateInfo::builder()
        .code_size(bytecode.code_size())
        .code(bytecode.code());

    unsafe {
        device
            .create_shader_module(&create_info, None)
            .map_err(|e| anyhow!(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_shader_names_the_path() {
        let error = load_shader(Path::new("shaders/does-not-exist.spv")).unwrap_err();
        assert!(error.to_string().contains("shaders/does-not-exist.spv"));
    }
}
