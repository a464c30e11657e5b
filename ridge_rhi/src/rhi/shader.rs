//! Shader trait and the cross-backend shader bundle format
//!
//! A bundle starts with five little-endian `u64` blob lengths, in the order of
//! [`ShaderBlob`], followed by the blobs themselves packed back to back in the
//! same order. A zero length marks an absent blob.

use std::path::Path;
use crate::error::Result;
use crate::rhi::rendering_resource::{validate_name, RenderingResource};
use crate::{ridge_bail, ridge_ensure, ridge_err};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Vertex,
    Fragment,
    Compute,
}

/// Compiled shader variants a bundle may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderBlob {
    SpirV,
    MacOsMetalLib,
    IosMetalLib,
    IosSimulatorMetalLib,
    Dxil,
}

impl ShaderBlob {
    pub const ALL: [ShaderBlob; 5] = [
        ShaderBlob::SpirV,
        ShaderBlob::MacOsMetalLib,
        ShaderBlob::IosMetalLib,
        ShaderBlob::IosSimulatorMetalLib,
        ShaderBlob::Dxil,
    ];

    fn slot(self) -> usize {
        match self {
            ShaderBlob::SpirV => 0,
            ShaderBlob::MacOsMetalLib => 1,
            ShaderBlob::IosMetalLib => 2,
            ShaderBlob::IosSimulatorMetalLib => 3,
            ShaderBlob::Dxil => 4,
        }
    }

    /// Metal library variant matching the compilation target
    pub fn native_metal_lib() -> ShaderBlob {
        if cfg!(all(target_os = "ios", target_abi = "sim")) {
            ShaderBlob::IosSimulatorMetalLib
        } else if cfg!(target_os = "ios") {
            ShaderBlob::IosMetalLib
        } else {
            ShaderBlob::MacOsMetalLib
        }
    }
}

/// Size in bytes of the bundle header
pub const SHADER_BUNDLE_HEADER_SIZE: usize = ShaderBlob::ALL.len() * std::mem::size_of::<u64>();

/// Borrowed view over a shader bundle
#[derive(Debug, Clone, Copy)]
pub struct ShaderBundle<'a> {
    blobs: [&'a [u8]; 5],
}

impl<'a> ShaderBundle<'a> {
    /// Parse the header of `bytes` and check every declared blob fits
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        ridge_ensure!(
            bytes.len() >= SHADER_BUNDLE_HEADER_SIZE,
            "ridge::rhi::Shader",
            UnexpectedSize,
            "Shader bundle of {} bytes is smaller than its {} byte header",
            bytes.len(),
            SHADER_BUNDLE_HEADER_SIZE
        );

        let mut blobs: [&'a [u8]; 5] = [&[]; 5];
        let mut offset = SHADER_BUNDLE_HEADER_SIZE;
        for (slot, blob) in blobs.iter_mut().enumerate() {
            let start = slot * 8;
            let mut length = [0u8; 8];
            length.copy_from_slice(&bytes[start..start + 8]);
            let length = u64::from_le_bytes(length);

            let end = usize::try_from(length)
                .ok()
                .and_then(|length| offset.checked_add(length))
                .filter(|&end| end <= bytes.len())
                .ok_or_else(|| {
                    ridge_err!(
                        "ridge::rhi::Shader",
                        UnexpectedSize,
                        "Shader bundle declares a {:?} blob of {} bytes at offset {}, but only {} bytes are present",
                        ShaderBlob::ALL[slot],
                        length,
                        offset,
                        bytes.len()
                    )
                })?;
            *blob = &bytes[offset..end];
            offset = end;
        }

        Ok(Self { blobs })
    }

    /// Blob bytes, `None` when the bundle does not carry that variant
    pub fn blob(&self, kind: ShaderBlob) -> Option<&'a [u8]> {
        let blob = self.blobs[kind.slot()];
        (!blob.is_empty()).then_some(blob)
    }

    /// Like [`ShaderBundle::blob`], but a missing variant is an `UnsupportedFeature` error
    pub fn require_blob(&self, kind: ShaderBlob, shader_name: &str) -> Result<&'a [u8]> {
        match self.blob(kind) {
            Some(blob) => Ok(blob),
            None => ridge_bail!(
                "ridge::rhi::Shader",
                UnsupportedFeature,
                "Shader '{}' was not compiled to {:?}",
                shader_name,
                kind
            ),
        }
    }

    /// Serialize a bundle from the given blobs
    pub fn pack(blobs: &[(ShaderBlob, &[u8])]) -> Vec<u8> {
        let mut ordered: [&[u8]; 5] = [&[]; 5];
        for &(kind, bytes) in blobs {
            ordered[kind.slot()] = bytes;
        }

        let total: usize = ordered.iter().map(|blob| blob.len()).sum();
        let mut out = Vec::with_capacity(SHADER_BUNDLE_HEADER_SIZE + total);
        for blob in &ordered {
            out.extend_from_slice(&(blob.len() as u64).to_le_bytes());
        }
        for blob in &ordered {
            out.extend_from_slice(blob);
        }
        out
    }

    /// Read a whole bundle file into memory
    pub fn read_file(path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(|e| {
            ridge_err!(
                "ridge::rhi::Shader",
                InvalidValue,
                "Could not read shader bundle '{}': {}",
                path.display(),
                e
            )
        })
    }
}

/// Descriptor for creating a shader
#[derive(Debug, Clone)]
pub struct ShaderDesc<'a> {
    pub name: &'a str,
    /// Raw bundle bytes; the backend picks its own blob
    pub bundle: &'a [u8],
    pub shader_type: ShaderType,
}

impl ShaderDesc<'_> {
    pub fn validate(&self) -> Result<()> {
        validate_name("Shader", self.name)
    }
}

/// Shader module trait
pub trait Shader: RenderingResource {
    fn shader_type(&self) -> ShaderType;
}

#[cfg(test)]
#[path = "shader_tests.rs"]
mod tests;
