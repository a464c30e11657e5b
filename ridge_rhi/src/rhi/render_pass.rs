/// Render pass trait and render pass descriptor
///
/// A render pass is created from *template* images that fix the attachment
/// formats, sampling and extent. The images actually rendered to are given
/// each time the pass begins, so one pass serves every swapchain image.

use glam::Vec4;
use crate::error::Result;
use crate::rhi::device::DeviceLimits;
use crate::rhi::image::{Image, ImageUsage};
use crate::rhi::rendering_resource::{validate_name, RenderingResource};
use crate::ridge_ensure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentType {
    Color,
    Depth,
}

/// What happens to an attachment's contents when the pass begins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttachmentLoadOperation {
    #[default]
    Clear,
    Load,
}

/// What happens to an attachment's contents when the pass ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttachmentStoreOperation {
    #[default]
    Store,
    Discard,
}

/// One attachment of a render pass
#[derive(Clone, Copy)]
pub struct RenderPassAttachment<'a> {
    pub template_output_image: &'a dyn Image,
    /// Multisampled image rendered into, resolved into the output at the end of the pass
    pub template_resolver_image: Option<&'a dyn Image>,
    pub attachment_type: AttachmentType,
    pub load_operation: AttachmentLoadOperation,
    pub store_operation: AttachmentStoreOperation,
}

/// Attachment indices a subpass writes and reads
#[derive(Debug, Clone, Copy, Default)]
pub struct SubpassDesc<'a> {
    pub render_targets: &'a [u32],
    pub inputs: &'a [u32],
}

/// Descriptor for creating a render pass
#[derive(Clone, Copy)]
pub struct RenderPassDesc<'a> {
    pub name: &'a str,
    pub attachments: &'a [RenderPassAttachment<'a>],
    pub subpass_descs: &'a [SubpassDesc<'a>],
}

impl RenderPassDesc<'_> {
    /// Check the descriptor and return the shared attachment extent
    pub fn validate(&self, limits: &DeviceLimits) -> Result<(u32, u32)> {
        const SOURCE: &str = "ridge::rhi::RenderPass";
        validate_name("Render pass", self.name)?;

        ridge_ensure!(
            !self.attachments.is_empty(),
            SOURCE,
            InvalidValue,
            "Render pass '{}' must have at least one attachment",
            self.name
        );
        ridge_ensure!(
            !self.subpass_descs.is_empty(),
            SOURCE,
            InvalidValue,
            "Render pass '{}' must have at least one subpass",
            self.name
        );

        let first = self.attachments[0].template_output_image;
        let (width, height) = (first.width(), first.height());
        ridge_ensure!(
            width > 0 && height > 0,
            SOURCE,
            InvalidValue,
            "Attachments of render pass '{}' must not have a zero dimension",
            self.name
        );
        ridge_ensure!(
            width <= limits.max_render_pass_width && height <= limits.max_render_pass_height,
            SOURCE,
            ValueOutOfRange,
            "Render pass '{}' extent {}x{} exceeds the device maximum of {}x{}",
            self.name,
            width,
            height,
            limits.max_render_pass_width,
            limits.max_render_pass_height
        );

        let mut depth_count = 0;
        for (index, attachment) in self.attachments.iter().enumerate() {
            let image = attachment.template_output_image;
            ridge_ensure!(
                image.width() == width && image.height() == height,
                SOURCE,
                UnexpectedSize,
                "Attachment {} ('{}') of render pass '{}' is {}x{}, expected {}x{}",
                index,
                image.name(),
                self.name,
                image.width(),
                image.height(),
                width,
                height
            );

            let required = match attachment.attachment_type {
                AttachmentType::Color => ImageUsage::COLOR_ATTACHMENT,
                AttachmentType::Depth => {
                    depth_count += 1;
                    ImageUsage::DEPTH_ATTACHMENT
                }
            };
            ridge_ensure!(
                image.usage().contains(required),
                SOURCE,
                InvalidConfiguration,
                "Attachment {} ('{}') of render pass '{}' lacks {:?} usage",
                index,
                image.name(),
                self.name,
                required
            );

            if let Some(resolver) = attachment.template_resolver_image {
                ridge_ensure!(
                    resolver.width() == width && resolver.height() == height,
                    SOURCE,
                    UnexpectedSize,
                    "Resolver image '{}' of render pass '{}' must match the {}x{} attachment extent",
                    resolver.name(),
                    self.name,
                    width,
                    height
                );
                ridge_ensure!(
                    resolver.usage().contains(ImageUsage::RESOLVER_ATTACHMENT),
                    SOURCE,
                    InvalidConfiguration,
                    "Resolver image '{}' of render pass '{}' lacks RESOLVER_ATTACHMENT usage",
                    resolver.name(),
                    self.name
                );
            }
        }
        ridge_ensure!(
            depth_count <= 1,
            SOURCE,
            InvalidConfiguration,
            "Render pass '{}' declares {} depth attachments, at most one is allowed",
            self.name,
            depth_count
        );

        let attachment_count = self.attachments.len() as u32;
        for (subpass, desc) in self.subpass_descs.iter().enumerate() {
            for &index in desc.render_targets.iter().chain(desc.inputs) {
                ridge_ensure!(
                    index < attachment_count,
                    SOURCE,
                    ValueOutOfRange,
                    "Subpass {} of render pass '{}' references attachment {} but only {} exist",
                    subpass,
                    self.name,
                    index,
                    attachment_count
                );
            }
        }

        Ok((width, height))
    }
}

/// Image bound to one attachment when the pass begins
#[derive(Clone, Copy)]
pub struct RenderPassBeginAttachment<'a> {
    pub output_image: &'a dyn Image,
    pub resolver_image: Option<&'a dyn Image>,
    /// RGBA clear value (depth attachments use `x`)
    pub clear_color: Vec4,
}

impl<'a> RenderPassBeginAttachment<'a> {
    pub fn new(output_image: &'a dyn Image) -> Self {
        Self {
            output_image,
            resolver_image: None,
            clear_color: Vec4::ZERO,
        }
    }

    pub fn with_clear_color(mut self, clear_color: Vec4) -> Self {
        self.clear_color = clear_color;
        self
    }

    pub fn with_resolver(mut self, resolver_image: &'a dyn Image) -> Self {
        self.resolver_image = Some(resolver_image);
        self
    }
}

/// Render pass resource trait
pub trait RenderPass: RenderingResource {
    fn attachment_count(&self) -> u32;

    fn color_attachment_count(&self) -> u32;

    fn has_depth_attachment(&self) -> bool;

    fn subpass_count(&self) -> u32;

    /// Width and height shared by every attachment
    fn extent(&self) -> (u32, u32);
}

#[cfg(test)]
#[path = "render_pass_tests.rs"]
mod tests;
