/// RenderPass - Vulkan implementation of the RenderPass trait
///
/// Attachment `i` of the descriptor is native attachment `i`. Multisampled
/// resolver images are appended after them in declaration order: subpasses
/// render into the resolver and the output image receives the resolve.

use ash::vk;
use ridge_rhi::ridge::rhi::{
    downcast_resource, AttachmentLoadOperation, AttachmentStoreOperation, AttachmentType, GraphicsApi, Image,
    RenderPass, RenderPassBeginAttachment, RenderPassDesc, RenderingResource,
};
use ridge_rhi::ridge::Result;
use ridge_rhi::{ridge_bail, ridge_ensure};
use std::sync::Arc;

use crate::vulkan_context::{vk_error, GpuContext, SOURCE};
use crate::vulkan_format::{image_format_to_vk, sampling_to_vk};
use crate::vulkan_image::VulkanImage;

#[derive(Debug, Clone, Copy)]
struct AttachmentInfo {
    attachment_type: AttachmentType,
    /// Native index of the multisampled resolver
    resolver_index: Option<u32>,
}

/// Vulkan render pass implementation
pub struct VulkanRenderPass {
    ctx: Arc<GpuContext>,
    name: String,
    pub(crate) render_pass: vk::RenderPass,
    attachments: Vec<AttachmentInfo>,
    resolver_count: u32,
    /// Color target count and depth use of each subpass
    subpass_targets: Vec<(u32, bool)>,
    extent: (u32, u32),
}

fn load_op_to_vk(operation: AttachmentLoadOperation) -> vk::AttachmentLoadOp {
    match operation {
        AttachmentLoadOperation::Clear => vk::AttachmentLoadOp::CLEAR,
        AttachmentLoadOperation::Load => vk::AttachmentLoadOp::LOAD,
    }
}

fn store_op_to_vk(operation: AttachmentStoreOperation) -> vk::AttachmentStoreOp {
    match operation {
        AttachmentStoreOperation::Store => vk::AttachmentStoreOp::STORE,
        AttachmentStoreOperation::Discard => vk::AttachmentStoreOp::DONT_CARE,
    }
}

fn attachment_layout(attachment_type: AttachmentType) -> vk::ImageLayout {
    match attachment_type {
        AttachmentType::Color => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        AttachmentType::Depth => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    }
}

/// Cleared attachments start from undefined contents, loaded ones must
/// already be in their attachment layout (`ColorWrite` / `DepthWrite` usage)
fn initial_layout(attachment_type: AttachmentType, load_operation: AttachmentLoadOperation) -> vk::ImageLayout {
    match load_operation {
        AttachmentLoadOperation::Clear => vk::ImageLayout::UNDEFINED,
        AttachmentLoadOperation::Load => attachment_layout(attachment_type),
    }
}

/// Dependencies around and between subpasses
fn subpass_dependencies(subpass_count: u32) -> Vec<vk::SubpassDependency> {
    let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
        | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    let attachment_access = vk::AccessFlags::COLOR_ATTACHMENT_READ
        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;

    let mut dependencies = Vec::with_capacity(subpass_count as usize + 1);
    dependencies.push(
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(attachment_stages)
            .dst_stage_mask(attachment_stages)
            .src_access_mask(attachment_access)
            .dst_access_mask(attachment_access)
            .dependency_flags(vk::DependencyFlags::BY_REGION),
    );
    for subpass in 1..subpass_count {
        dependencies.push(
            vk::SubpassDependency::default()
                .src_subpass(subpass - 1)
                .dst_subpass(subpass)
                .src_stage_mask(attachment_stages)
                .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER | attachment_stages)
                .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
                .dst_access_mask(vk::AccessFlags::INPUT_ATTACHMENT_READ | vk::AccessFlags::SHADER_READ | attachment_access)
                .dependency_flags(vk::DependencyFlags::BY_REGION),
        );
    }
    dependencies.push(
        vk::SubpassDependency::default()
            .src_subpass(subpass_count - 1)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(attachment_stages)
            .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .src_access_mask(attachment_access)
            .dst_access_mask(vk::AccessFlags::empty())
            .dependency_flags(vk::DependencyFlags::BY_REGION),
    );
    dependencies
}

impl VulkanRenderPass {
    /// `extent` comes from the validated descriptor
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &RenderPassDesc, extent: (u32, u32)) -> Result<Self> {
        let attachment_count = desc.attachments.len() as u32;
        let mut descriptions = Vec::with_capacity(desc.attachments.len() * 2);
        let mut resolver_descriptions = Vec::new();
        let mut attachments = Vec::with_capacity(desc.attachments.len());

        for (index, attachment) in desc.attachments.iter().enumerate() {
            let output = downcast_resource::<VulkanImage, _>(attachment.template_output_image, GraphicsApi::Vulkan)?;
            let layout = attachment_layout(attachment.attachment_type);
            let load_op = load_op_to_vk(attachment.load_operation);
            let store_op = store_op_to_vk(attachment.store_operation);

            descriptions.push(
                vk::AttachmentDescription::default()
                    .format(image_format_to_vk(output.format()))
                    .samples(sampling_to_vk(output.sampling()))
                    .load_op(load_op)
                    .store_op(store_op)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(initial_layout(attachment.attachment_type, attachment.load_operation))
                    .final_layout(layout),
            );

            let resolver_index = match attachment.template_resolver_image {
                Some(resolver) => {
                    ridge_ensure!(
                        attachment.attachment_type == AttachmentType::Color,
                        SOURCE,
                        UnsupportedFeature,
                        "Depth attachment {} of render pass '{}' cannot be resolved",
                        index,
                        desc.name
                    );
                    let resolver = downcast_resource::<VulkanImage, _>(resolver, GraphicsApi::Vulkan)?;
                    resolver_descriptions.push(
                        vk::AttachmentDescription::default()
                            .format(image_format_to_vk(resolver.format()))
                            .samples(sampling_to_vk(resolver.sampling()))
                            .load_op(load_op)
                            .store_op(store_op)
                            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                            .initial_layout(initial_layout(attachment.attachment_type, attachment.load_operation))
                            .final_layout(layout),
                    );
                    Some(attachment_count + resolver_descriptions.len() as u32 - 1)
                }
                None => None,
            };

            attachments.push(AttachmentInfo {
                attachment_type: attachment.attachment_type,
                resolver_index,
            });
        }
        let resolver_count = resolver_descriptions.len() as u32;
        descriptions.extend(resolver_descriptions);

        // References must outlive the subpass descriptions pointing at them
        let mut color_references = Vec::with_capacity(desc.subpass_descs.len());
        let mut resolve_references = Vec::with_capacity(desc.subpass_descs.len());
        let mut depth_references = Vec::with_capacity(desc.subpass_descs.len());
        let mut input_references = Vec::with_capacity(desc.subpass_descs.len());
        for subpass in desc.subpass_descs {
            let mut colors = Vec::new();
            let mut resolves = Vec::new();
            let mut depth = None;
            for &target in subpass.render_targets {
                let info = attachments[target as usize];
                match info.attachment_type {
                    AttachmentType::Color => {
                        let layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
                        match info.resolver_index {
                            Some(resolver_index) => {
                                colors.push(vk::AttachmentReference { attachment: resolver_index, layout });
                                resolves.push(vk::AttachmentReference { attachment: target, layout });
                            }
                            None => {
                                colors.push(vk::AttachmentReference { attachment: target, layout });
                                resolves.push(vk::AttachmentReference {
                                    attachment: vk::ATTACHMENT_UNUSED,
                                    layout: vk::ImageLayout::UNDEFINED,
                                });
                            }
                        }
                    }
                    AttachmentType::Depth => {
                        depth = Some(vk::AttachmentReference {
                            attachment: target,
                            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                        });
                    }
                }
            }
            // Resolve references are only given when something is resolved
            if resolves.iter().all(|reference| reference.attachment == vk::ATTACHMENT_UNUSED) {
                resolves.clear();
            }
            let inputs: Vec<_> = subpass
                .inputs
                .iter()
                .map(|&input| vk::AttachmentReference {
                    attachment: input,
                    layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                })
                .collect();

            color_references.push(colors);
            resolve_references.push(resolves);
            depth_references.push(depth);
            input_references.push(inputs);
        }

        let subpasses: Vec<vk::SubpassDescription> = (0..desc.subpass_descs.len())
            .map(|i| {
                let mut subpass = vk::SubpassDescription::default()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .color_attachments(&color_references[i])
                    .input_attachments(&input_references[i]);
                if !resolve_references[i].is_empty() {
                    subpass = subpass.resolve_attachments(&resolve_references[i]);
                }
                if let Some(depth) = &depth_references[i] {
                    subpass = subpass.depth_stencil_attachment(depth);
                }
                subpass
            })
            .collect();

        let subpass_targets = color_references
            .iter()
            .zip(&depth_references)
            .map(|(colors, depth)| (colors.len() as u32, depth.is_some()))
            .collect();
        let subpass_count = desc.subpass_descs.len() as u32;
        let dependencies = subpass_dependencies(subpass_count);
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&descriptions)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { ctx.device.create_render_pass(&create_info, None) }
            .map_err(|e| vk_error(format_args!("create render pass '{}'", desc.name), e))?;
        ctx.set_object_name(render_pass, desc.name);

        Ok(Self {
            ctx,
            name: desc.name.to_string(),
            render_pass,
            attachments,
            resolver_count,
            subpass_targets,
            extent,
        })
    }

    /// Color target count of `subpass` and whether it writes depth
    pub(crate) fn subpass_targets(&self, subpass: u32) -> (u32, bool) {
        self.subpass_targets
            .get(subpass as usize)
            .copied()
            .unwrap_or((0, false))
    }

    /// Native views in attachment order, and one clear value per native attachment
    pub(crate) fn begin_views(
        &self,
        attachments: &[RenderPassBeginAttachment],
    ) -> Result<(Vec<vk::ImageView>, Vec<vk::ClearValue>)> {
        let total = self.attachments.len() + self.resolver_count as usize;
        let mut views = vec![vk::ImageView::null(); total];
        let mut clear_values = vec![vk::ClearValue::default(); total];

        for (index, (info, attachment)) in self.attachments.iter().zip(attachments).enumerate() {
            let output = downcast_resource::<VulkanImage, _>(attachment.output_image, GraphicsApi::Vulkan)?;
            views[index] = output.view;

            let color = attachment.clear_color;
            let clear_value = match info.attachment_type {
                AttachmentType::Color => vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: color.to_array(),
                    },
                },
                AttachmentType::Depth => vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth: color.x, stencil: 0 },
                },
            };
            clear_values[index] = clear_value;

            match (info.resolver_index, attachment.resolver_image) {
                (Some(resolver_index), Some(resolver)) => {
                    let resolver = downcast_resource::<VulkanImage, _>(resolver, GraphicsApi::Vulkan)?;
                    views[resolver_index as usize] = resolver.view;
                    clear_values[resolver_index as usize] = clear_value;
                }
                (Some(_), None) => ridge_bail!(
                    SOURCE,
                    InvalidConfiguration,
                    "Attachment {} of render pass '{}' requires a resolver image",
                    index,
                    self.name
                ),
                (None, Some(resolver)) => ridge_bail!(
                    SOURCE,
                    InvalidConfiguration,
                    "Attachment {} of render pass '{}' was created without a resolver, got '{}'",
                    index,
                    self.name,
                    resolver.name()
                ),
                (None, None) => {}
            }
        }
        Ok((views, clear_values))
    }
}

crate::vulkan_resource!(VulkanRenderPass);

impl RenderPass for VulkanRenderPass {
    fn attachment_count(&self) -> u32 {
        self.attachments.len() as u32
    }

    fn color_attachment_count(&self) -> u32 {
        self.attachments
            .iter()
            .filter(|info| info.attachment_type == AttachmentType::Color)
            .count() as u32
    }

    fn has_depth_attachment(&self) -> bool {
        self.attachments
            .iter()
            .any(|info| info.attachment_type == AttachmentType::Depth)
    }

    fn subpass_count(&self) -> u32 {
        self.subpass_targets.len() as u32
    }

    fn extent(&self) -> (u32, u32) {
        self.extent
    }
}

impl Drop for VulkanRenderPass {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_render_pass(self.render_pass, None);
        }
    }
}
