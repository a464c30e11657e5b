/// MetalRenderingContext - Metal implementation of the RenderingContext trait
///
/// Metal has no instance object: the context only records configuration
/// shared by the devices it creates. Off Apple platforms creation fails with
/// `UnsupportedFeature`.

use ridge_rhi::ridge::rhi::{Device, DeviceDesc, RenderingContext, RenderingContextDesc, ValidationStats};
use ridge_rhi::ridge::Result;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[cfg(target_vendor = "apple")]
use crate::metal_device::MetalDevice;
use crate::metal_layout::SOURCE;

/// Settings every device of a context shares
#[derive(Debug, Default)]
pub(crate) struct MetalInstance {
    /// API validation was requested; command buffers report encoder status
    pub validation: bool,
    pub stats_enabled: bool,
    /// Command buffers that completed with an error
    pub failed_command_buffers: AtomicU32,
}

impl MetalInstance {
    pub fn record_failure(&self) {
        if self.stats_enabled {
            self.failed_command_buffers.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Metal rendering context
pub struct MetalRenderingContext {
    name: String,
    instance: Arc<MetalInstance>,
}

impl MetalRenderingContext {
    pub fn new(desc: &RenderingContextDesc) -> Result<Self> {
        desc.validate()?;
        ensure_platform(desc.name)?;

        let config = &desc.config;
        if config.enable_validation {
            enable_api_validation();
        }
        ridge_rhi::ridge_info!(
            SOURCE,
            "Rendering context '{}' created (validation {})",
            desc.name,
            if config.enable_validation { "on" } else { "off" }
        );
        Ok(Self {
            name: desc.name.to_string(),
            instance: Arc::new(MetalInstance {
                validation: config.enable_validation,
                stats_enabled: config.enable_validation_stats,
                failed_command_buffers: AtomicU32::new(0),
            }),
        })
    }
}

#[cfg(target_vendor = "apple")]
fn ensure_platform(_name: &str) -> Result<()> {
    Ok(())
}

#[cfg(not(target_vendor = "apple"))]
fn ensure_platform(name: &str) -> Result<()> {
    Err(ridge_rhi::ridge_err!(
        SOURCE,
        UnsupportedFeature,
        "Cannot create rendering context '{}': Metal is only available on Apple platforms",
        name
    ))
}

/// Turn on the Metal API validation layer for devices created from now on.
/// An explicit `MTL_DEBUG_LAYER` in the environment wins.
fn enable_api_validation() {
    if std::env::var_os("MTL_DEBUG_LAYER").is_none() {
        std::env::set_var("MTL_DEBUG_LAYER", "1");
    }
}

crate::metal_resource!(MetalRenderingContext);

impl RenderingContext for MetalRenderingContext {
    #[cfg(target_vendor = "apple")]
    fn create_device(&self, desc: &DeviceDesc) -> Result<Box<dyn Device>> {
        desc.validate()?;
        Ok(Box::new(MetalDevice::new(Arc::clone(&self.instance), desc)?))
    }

    #[cfg(not(target_vendor = "apple"))]
    fn create_device(&self, desc: &DeviceDesc) -> Result<Box<dyn Device>> {
        desc.validate()?;
        ensure_platform(&self.name)?;
        Err(ridge_rhi::ridge_err!(SOURCE, UnsupportedFeature, "Cannot create device '{}' without Metal", desc.name))
    }

    fn validation_stats(&self) -> ValidationStats {
        ValidationStats {
            errors: self.instance.failed_command_buffers.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}
