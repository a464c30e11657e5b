/// RenderPass - Metal implementation of the RenderPass trait
///
/// Metal has no render pass object. The pass keeps the subpass plan and
/// builds one `MTLRenderPassDescriptor` per subpass when it begins. Attachments
/// with a resolver render into the multisampled resolver and resolve into the
/// output image on their last use.

use objc2::rc::Retained;
use objc2_metal::{
    MTLClearColor, MTLLoadAction, MTLPixelFormat, MTLRenderPassDescriptor, MTLStoreAction,
};
use ridge_rhi::ridge::rhi::{
    downcast_resource, AttachmentType, GraphicsApi, Image, RenderPass, RenderPassBeginAttachment, RenderPassDesc,
    RenderingResource,
};
use ridge_rhi::ridge::Result;
use ridge_rhi::{ridge_bail, ridge_ensure, ridge_err};
use std::sync::Arc;

use crate::metal_context::MetalContext;
use crate::metal_format::pixel_format;
use crate::metal_image::MetalImage;
use crate::metal_layout::SOURCE;
use crate::metal_subpass::{plan_subpasses, AttachmentOps, AttachmentSlot, LoadAction, StoreAction, SubpassPlan};

/// Pixel formats a pipeline must match to draw in one subpass
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SubpassFormats {
    pub colors: Vec<MTLPixelFormat>,
    pub depth: Option<MTLPixelFormat>,
}

#[derive(Debug, Clone, Copy)]
struct AttachmentInfo {
    ops: AttachmentOps,
    /// Format of the image rendered into
    format: MTLPixelFormat,
}

fn load_action(action: LoadAction) -> MTLLoadAction {
    match action {
        LoadAction::Clear => MTLLoadAction::Clear,
        LoadAction::Load => MTLLoadAction::Load,
    }
}

fn store_action(action: StoreAction) -> MTLStoreAction {
    match action {
        StoreAction::Store => MTLStoreAction::Store,
        StoreAction::Discard => MTLStoreAction::DontCare,
        StoreAction::Resolve => MTLStoreAction::MultisampleResolve,
        StoreAction::StoreAndResolve => MTLStoreAction::StoreAndMultisampleResolve,
    }
}

/// Metal render pass implementation
pub struct MetalRenderPass {
    _ctx: Arc<MetalContext>,
    name: String,
    attachments: Vec<AttachmentInfo>,
    plans: Vec<SubpassPlan>,
    extent: (u32, u32),
}

impl MetalRenderPass {
    /// `extent` comes from the validated descriptor
    pub(crate) fn new(ctx: Arc<MetalContext>, desc: &RenderPassDesc, extent: (u32, u32)) -> Result<Self> {
        let mut attachments = Vec::with_capacity(desc.attachments.len());
        for (index, attachment) in desc.attachments.iter().enumerate() {
            let output = downcast_resource::<MetalImage, _>(attachment.template_output_image, GraphicsApi::Metal)?;
            let rendered: &dyn Image = match attachment.template_resolver_image {
                Some(resolver) => {
                    ridge_ensure!(
                        attachment.attachment_type == AttachmentType::Color,
                        SOURCE,
                        UnsupportedFeature,
                        "Depth attachment {} of render pass '{}' cannot be resolved",
                        index,
                        desc.name
                    );
                    downcast_resource::<MetalImage, _>(resolver, GraphicsApi::Metal)?
                }
                None => output,
            };
            let format = pixel_format(rendered.format()).ok_or_else(|| {
                ridge_err!(
                    SOURCE,
                    UnsupportedFeature,
                    "Format {:?} of attachment {} of render pass '{}' has no Metal equivalent",
                    rendered.format(),
                    index,
                    desc.name
                )
            })?;
            attachments.push(AttachmentInfo {
                ops: AttachmentOps::from(attachment),
                format,
            });
        }

        let ops: Vec<AttachmentOps> = attachments.iter().map(|info| info.ops).collect();
        let plans = plan_subpasses(&ops, desc.subpass_descs);

        Ok(Self {
            _ctx: ctx,
            name: desc.name.to_string(),
            attachments,
            plans,
            extent,
        })
    }

    /// Formats a pipeline drawing in `subpass` renders to
    pub(crate) fn subpass_formats(&self, subpass: u32) -> SubpassFormats {
        let Some(plan) = self.plans.get(subpass as usize) else {
            return SubpassFormats {
                colors: Vec::new(),
                depth: None,
            };
        };
        let mut colors = vec![MTLPixelFormat::Invalid; plan.color_count as usize];
        let mut depth = None;
        for planned in &plan.attachments {
            let format = self.attachments[planned.attachment as usize].format;
            match planned.slot {
                AttachmentSlot::Color(slot) => colors[slot as usize] = format,
                AttachmentSlot::Depth => depth = Some(format),
            }
        }
        SubpassFormats { colors, depth }
    }

    /// Native descriptor of `subpass` over the images given at begin
    pub(crate) fn subpass_descriptor(
        &self,
        subpass: u32,
        attachments: &[RenderPassBeginAttachment],
    ) -> Result<Retained<MTLRenderPassDescriptor>> {
        let plan = self.plans.get(subpass as usize).ok_or_else(|| {
            ridge_err!(SOURCE, ValueOutOfRange, "Render pass '{}' has no subpass {}", self.name, subpass)
        })?;
        let descriptor = unsafe { MTLRenderPassDescriptor::new() };

        for planned in &plan.attachments {
            let index = planned.attachment as usize;
            let info = self.attachments[index];
            let attachment = attachments.get(index).ok_or_else(|| {
                ridge_err!(
                    SOURCE,
                    InvalidConfiguration,
                    "Render pass '{}' expects {} attachments, got {}",
                    self.name,
                    self.attachments.len(),
                    attachments.len()
                )
            })?;
            let output = downcast_resource::<MetalImage, _>(attachment.output_image, GraphicsApi::Metal)?;
            let resolver = match (info.ops.resolved, attachment.resolver_image) {
                (true, Some(resolver)) => Some(downcast_resource::<MetalImage, _>(resolver, GraphicsApi::Metal)?),
                (true, None) => ridge_bail!(
                    SOURCE,
                    InvalidConfiguration,
                    "Attachment {} of render pass '{}' requires a resolver image",
                    index,
                    self.name
                ),
                (false, Some(resolver)) => ridge_bail!(
                    SOURCE,
                    InvalidConfiguration,
                    "Attachment {} of render pass '{}' was created without a resolver, got '{}'",
                    index,
                    self.name,
                    resolver.name()
                ),
                (false, None) => None,
            };
            let color = attachment.clear_color;

            match planned.slot {
                AttachmentSlot::Color(slot) => unsafe {
                    let native = descriptor.colorAttachments().objectAtIndexedSubscript(slot as usize);
                    match resolver {
                        Some(resolver) => {
                            native.setTexture(Some(&resolver.texture));
                            native.setResolveTexture(Some(&output.texture));
                        }
                        None => native.setTexture(Some(&output.texture)),
                    }
                    native.setLoadAction(load_action(planned.load));
                    native.setStoreAction(store_action(planned.store));
                    native.setClearColor(MTLClearColor {
                        red: color.x as f64,
                        green: color.y as f64,
                        blue: color.z as f64,
                        alpha: color.w as f64,
                    });
                },
                AttachmentSlot::Depth => unsafe {
                    let native = descriptor.depthAttachment();
                    native.setTexture(Some(&output.texture));
                    native.setLoadAction(load_action(planned.load));
                    native.setStoreAction(store_action(planned.store));
                    native.setClearDepth(color.x as f64);
                },
            }
        }
        Ok(descriptor)
    }
}

crate::metal_resource!(MetalRenderPass);

impl RenderPass for MetalRenderPass {
    fn attachment_count(&self) -> u32 {
        self.attachments.len() as u32
    }

    fn color_attachment_count(&self) -> u32 {
        self.attachments
            .iter()
            .filter(|info| info.ops.attachment_type == AttachmentType::Color)
            .count() as u32
    }

    fn has_depth_attachment(&self) -> bool {
        self.attachments
            .iter()
            .any(|info| info.ops.attachment_type == AttachmentType::Depth)
    }

    fn subpass_count(&self) -> u32 {
        self.plans.len() as u32
    }

    fn extent(&self) -> (u32, u32) {
        self.extent
    }
}
