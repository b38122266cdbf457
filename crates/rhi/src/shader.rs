//! Shader compilation and module management.
//!
//! Shaders reach the pipeline registry as SPIR-V words produced by a
//! [`ShaderCompiler`]. [`WgslCompiler`] translates WGSL with naga,
//! [`SpirvLoader`] reads precompiled `.spv` files. The words are cached
//! by the caller and turned into [`ShaderModule`]s on every pipeline build.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use lantern_rhi::device::Device;
//! use lantern_rhi::shader::{compiler_for_path, ShaderModule, ShaderStage, VERTEX_ENTRY};
//!
//! # fn example(device: Arc<Device>) -> Result<(), lantern_rhi::RhiError> {
//! let path = Path::new("shaders/model.wgsl");
//! let compiler = compiler_for_path(path);
//! let words = compiler.compile(path, ShaderStage::Vertex, VERTEX_ENTRY)?;
//! let module = ShaderModule::from_words(device, &words, ShaderStage::Vertex, VERTEX_ENTRY)?;
//! let _stage_info = module.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Entry point name of the vertex stage.
pub const VERTEX_ENTRY: &str = "vs_main";

/// Entry point name of the fragment stage.
pub const FRAGMENT_ENTRY: &str = "fs_main";

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Shader stage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    fn to_naga(self) -> naga::ShaderStage {
        match self {
            ShaderStage::Vertex => naga::ShaderStage::Vertex,
            ShaderStage::Fragment => naga::ShaderStage::Fragment,
        }
    }

    /// File suffix used for precompiled binaries (`model.vert.spv`).
    pub fn spirv_suffix(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Produces SPIR-V words for one stage of a shader source.
pub trait ShaderCompiler {
    fn compile(&self, path: &Path, stage: ShaderStage, entry_point: &str)
    -> RhiResult<Vec<u32>>;
}

/// Picks [`WgslCompiler`] for `.wgsl` paths and [`SpirvLoader`] otherwise.
pub fn compiler_for_path(path: &Path) -> Box<dyn ShaderCompiler> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("wgsl") => Box::new(WgslCompiler),
        _ => Box::new(SpirvLoader),
    }
}

/// Compiles WGSL to SPIR-V through naga.
#[derive(Clone, Copy, Debug, Default)]
pub struct WgslCompiler;

impl WgslCompiler {
    /// Compiles in-memory WGSL source.
    pub fn compile_source(
        &self,
        source: &str,
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Vec<u32>> {
        let module = naga::front::wgsl::parse_str(source)
            .map_err(|e| RhiError::ShaderError(format!("WGSL parse error: {e}")))?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        let info = validator
            .validate(&module)
            .map_err(|e| RhiError::ShaderError(format!("Validation error: {e}")))?;

        let naga_stage = stage.to_naga();
        if !module
            .entry_points
            .iter()
            .any(|ep| ep.name == entry_point && ep.stage == naga_stage)
        {
            return Err(RhiError::ShaderError(format!(
                "Entry point '{}' not found for {} stage",
                entry_point, stage
            )));
        }

        let options = naga::back::spv::Options {
            lang_version: (1, 0),
            flags: naga::back::spv::WriterFlags::empty(),
            capabilities: None,
            bounds_check_policies: naga::proc::BoundsCheckPolicies::default(),
            binding_map: Default::default(),
            debug_info: None,
            zero_initialize_workgroup_memory:
                naga::back::spv::ZeroInitializeWorkgroupMemoryMode::None,
        };
        let pipeline_options = naga::back::spv::PipelineOptions {
            shader_stage: naga_stage,
            entry_point: entry_point.to_string(),
        };

        naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))
            .map_err(|e| RhiError::ShaderError(format!("SPIR-V generation error: {e}")))
    }
}

impl ShaderCompiler for WgslCompiler {
    fn compile(
        &self,
        path: &Path,
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Vec<u32>> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;

        let words = self
            .compile_source(&source, stage, entry_point)
            .inspect_err(|e| error!("Failed to compile {:?} ({} stage): {}", path, stage, e))?;

        info!(
            "Compiled {} stage of {:?}: {} words",
            stage,
            path,
            words.len()
        );
        Ok(words)
    }
}

/// Loads precompiled SPIR-V.
///
/// For a source path `shaders/model.spv` the stages are read from
/// `shaders/model.vert.spv` and `shaders/model.frag.spv`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SpirvLoader;

impl SpirvLoader {
    pub fn stage_path(path: &Path, stage: ShaderStage) -> PathBuf {
        path.with_extension(format!("{}.spv", stage.spirv_suffix()))
    }
}

impl ShaderCompiler for SpirvLoader {
    fn compile(
        &self,
        path: &Path,
        stage: ShaderStage,
        _entry_point: &str,
    ) -> RhiResult<Vec<u32>> {
        let stage_path = Self::stage_path(path, stage);
        debug!("Loading {} shader from {:?}", stage, stage_path);

        let bytes = std::fs::read(&stage_path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", stage_path, e))
        })?;
        words_from_bytes(&bytes)
    }
}

/// Converts a little-endian SPIR-V binary to words.
pub fn words_from_bytes(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if !bytes.len().is_multiple_of(4) {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be 4-byte aligned, got {} bytes",
            bytes.len()
        )));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        _ => Err(RhiError::ShaderError(
            "Missing SPIR-V magic number".to_string(),
        )),
    }
}

/// `VkShaderModule` with its stage and entry point.
pub struct ShaderModule {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl ShaderModule {
    pub fn from_words(
        device: Arc<Device>,
        words: &[u32],
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let entry_point = CString::new(entry_point)
            .map_err(|e| RhiError::ShaderError(format!("Invalid entry point name: {}", e)))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(words);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        debug!("Created {} shader module ({:?})", stage, entry_point);

        Ok(Self {
            device,
            module,
            stage,
            entry_point,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    #[inline]
    pub fn entry_point(&self) -> &CStr {
        &self.entry_point
    }

    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL_SHADER: &str = include_str!("../../../shaders/model.wgsl");

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(format!("{}", ShaderStage::Vertex), "vertex");
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_model_shader_compiles() {
        let compiler = WgslCompiler;
        let vertex = compiler
            .compile_source(MODEL_SHADER, ShaderStage::Vertex, VERTEX_ENTRY)
            .unwrap();
        let fragment = compiler
            .compile_source(MODEL_SHADER, ShaderStage::Fragment, FRAGMENT_ENTRY)
            .unwrap();
        assert_eq!(vertex[0], SPIRV_MAGIC);
        assert_eq!(fragment[0], SPIRV_MAGIC);
    }

    #[test]
    fn test_missing_entry_point() {
        let result =
            WgslCompiler.compile_source(MODEL_SHADER, ShaderStage::Fragment, VERTEX_ENTRY);
        assert!(matches!(result, Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_invalid_wgsl() {
        let result = WgslCompiler.compile_source("fn broken(", ShaderStage::Vertex, "main");
        assert!(matches!(result, Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_words_from_bytes() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0, 0, 1, 0]);
        assert_eq!(words_from_bytes(&bytes).unwrap(), vec![SPIRV_MAGIC, 0x0001_0000]);

        assert!(words_from_bytes(&[0u8; 5]).is_err());
        assert!(words_from_bytes(&[0u8; 8]).is_err());
    }

    #[test]
    fn test_spirv_stage_paths() {
        let path = Path::new("shaders/model.spv");
        assert_eq!(
            SpirvLoader::stage_path(path, ShaderStage::Vertex),
            PathBuf::from("shaders/model.vert.spv")
        );
        assert_eq!(
            SpirvLoader::stage_path(path, ShaderStage::Fragment),
            PathBuf::from("shaders/model.frag.spv")
        );
    }

    #[test]
    fn test_compiler_for_missing_file() {
        let path = Path::new("does/not/exist.wgsl");
        let result = compiler_for_path(path).compile(path, ShaderStage::Vertex, VERTEX_ENTRY);
        assert!(matches!(result, Err(RhiError::ShaderError(_))));
    }
}
