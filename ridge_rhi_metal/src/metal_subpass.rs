//! Subpass planning
//!
//! Metal has no subpass objects: every subpass becomes its own render
//! encoder. Each encoder needs load and store actions that keep attachment
//! contents alive between subpasses, so the descriptor's operations only
//! apply to the first and last subpass touching an attachment.

use ridge_rhi::ridge::rhi::{
    AttachmentLoadOperation, AttachmentStoreOperation, AttachmentType, RenderPassAttachment, SubpassDesc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadAction {
    Clear,
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    Store,
    Discard,
    /// Resolve into the output image, drop the multisampled contents
    Resolve,
    StoreAndResolve,
}

/// Where an attachment is bound inside one encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentSlot {
    Color(u32),
    Depth,
}

/// Creation-time operations of one attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentOps {
    pub attachment_type: AttachmentType,
    pub load_operation: AttachmentLoadOperation,
    pub store_operation: AttachmentStoreOperation,
    /// Rendered multisampled into the resolver, resolved into the output
    pub resolved: bool,
}

impl From<&RenderPassAttachment<'_>> for AttachmentOps {
    fn from(attachment: &RenderPassAttachment<'_>) -> Self {
        Self {
            attachment_type: attachment.attachment_type,
            load_operation: attachment.load_operation,
            store_operation: attachment.store_operation,
            resolved: attachment.template_resolver_image.is_some(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedAttachment {
    pub attachment: u32,
    pub slot: AttachmentSlot,
    pub load: LoadAction,
    pub store: StoreAction,
}

/// Attachments bound by one subpass encoder
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubpassPlan {
    pub attachments: Vec<PlannedAttachment>,
    pub color_count: u32,
    pub depth_attachment: Option<u32>,
}

/// Attachments bound by subpass `desc`: render targets first, then inputs
/// not already targeted. Inputs stay bound so shaders can fetch them from
/// the framebuffer.
fn subpass_attachments(desc: &SubpassDesc) -> Vec<u32> {
    let mut attachments: Vec<u32> = Vec::with_capacity(desc.render_targets.len() + desc.inputs.len());
    for &index in desc.render_targets.iter().chain(desc.inputs) {
        if !attachments.contains(&index) {
            attachments.push(index);
        }
    }
    attachments
}

/// Plan every subpass encoder of a render pass
///
/// Attachment indices must already be validated against `attachments`.
pub fn plan_subpasses(attachments: &[AttachmentOps], subpasses: &[SubpassDesc]) -> Vec<SubpassPlan> {
    let used: Vec<Vec<u32>> = subpasses.iter().map(subpass_attachments).collect();
    let first_use = |attachment: u32| used.iter().position(|list| list.contains(&attachment));
    let last_use = |attachment: u32| used.iter().rposition(|list| list.contains(&attachment));

    used.iter()
        .enumerate()
        .map(|(subpass, list)| {
            let mut plan = SubpassPlan::default();
            for &attachment in list {
                let ops = attachments[attachment as usize];
                let slot = match ops.attachment_type {
                    AttachmentType::Color => {
                        plan.color_count += 1;
                        AttachmentSlot::Color(plan.color_count - 1)
                    }
                    AttachmentType::Depth => {
                        plan.depth_attachment = Some(attachment);
                        AttachmentSlot::Depth
                    }
                };

                let load = if first_use(attachment) == Some(subpass) {
                    match ops.load_operation {
                        AttachmentLoadOperation::Clear => LoadAction::Clear,
                        AttachmentLoadOperation::Load => LoadAction::Load,
                    }
                } else {
                    LoadAction::Load
                };
                let store = if last_use(attachment) == Some(subpass) {
                    match (ops.store_operation, ops.resolved) {
                        (AttachmentStoreOperation::Store, false) => StoreAction::Store,
                        (AttachmentStoreOperation::Discard, false) => StoreAction::Discard,
                        (AttachmentStoreOperation::Store, true) => StoreAction::StoreAndResolve,
                        (AttachmentStoreOperation::Discard, true) => StoreAction::Resolve,
                    }
                } else {
                    StoreAction::Store
                };

                plan.attachments.push(PlannedAttachment {
                    attachment,
                    slot,
                    load,
                    store,
                });
            }
            plan
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color(load_operation: AttachmentLoadOperation, store_operation: AttachmentStoreOperation) -> AttachmentOps {
        AttachmentOps {
            attachment_type: AttachmentType::Color,
            load_operation,
            store_operation,
            resolved: false,
        }
    }

    fn depth() -> AttachmentOps {
        AttachmentOps {
            attachment_type: AttachmentType::Depth,
            ..color(AttachmentLoadOperation::Clear, AttachmentStoreOperation::Discard)
        }
    }

    #[test]
    fn test_single_subpass_uses_descriptor_operations() {
        let attachments = [
            color(AttachmentLoadOperation::Clear, AttachmentStoreOperation::Store),
            depth(),
        ];
        let plans = plan_subpasses(&attachments, &[SubpassDesc { render_targets: &[0, 1], inputs: &[] }]);

        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].color_count, 1);
        assert_eq!(plans[0].depth_attachment, Some(1));
        assert_eq!(
            plans[0].attachments,
            vec![
                PlannedAttachment {
                    attachment: 0,
                    slot: AttachmentSlot::Color(0),
                    load: LoadAction::Clear,
                    store: StoreAction::Store,
                },
                PlannedAttachment {
                    attachment: 1,
                    slot: AttachmentSlot::Depth,
                    load: LoadAction::Clear,
                    store: StoreAction::Discard,
                },
            ]
        );
    }

    #[test]
    fn test_contents_survive_between_subpasses() {
        let attachments = [
            color(AttachmentLoadOperation::Clear, AttachmentStoreOperation::Discard),
            color(AttachmentLoadOperation::Clear, AttachmentStoreOperation::Store),
        ];
        let subpasses = [
            SubpassDesc { render_targets: &[0], inputs: &[] },
            SubpassDesc { render_targets: &[1], inputs: &[0] },
        ];
        let plans = plan_subpasses(&attachments, &subpasses);

        // Written in subpass 0, read in subpass 1: stored then loaded
        assert_eq!(plans[0].attachments[0].store, StoreAction::Store);
        let gbuffer = plans[1].attachments.iter().find(|planned| planned.attachment == 0).unwrap();
        assert_eq!(gbuffer.load, LoadAction::Load);
        assert_eq!(gbuffer.store, StoreAction::Discard);

        // Targets come before inputs in slot order
        assert_eq!(plans[1].attachments[0].attachment, 1);
        assert_eq!(plans[1].attachments[0].slot, AttachmentSlot::Color(0));
        assert_eq!(gbuffer.slot, AttachmentSlot::Color(1));
        assert_eq!(plans[1].color_count, 2);
    }

    #[test]
    fn test_resolve_happens_on_last_use_only() {
        let attachments = [AttachmentOps {
            resolved: true,
            ..color(AttachmentLoadOperation::Load, AttachmentStoreOperation::Discard)
        }];
        let subpasses = [
            SubpassDesc { render_targets: &[0], inputs: &[] },
            SubpassDesc { render_targets: &[0], inputs: &[] },
        ];
        let plans = plan_subpasses(&attachments, &subpasses);

        assert_eq!(plans[0].attachments[0].load, LoadAction::Load);
        assert_eq!(plans[0].attachments[0].store, StoreAction::Store);
        assert_eq!(plans[1].attachments[0].load, LoadAction::Load);
        assert_eq!(plans[1].attachments[0].store, StoreAction::Resolve);
    }

    #[test]
    fn test_stored_resolve() {
        let attachments = [AttachmentOps {
            resolved: true,
            ..color(AttachmentLoadOperation::Clear, AttachmentStoreOperation::Store)
        }];
        let plans = plan_subpasses(&attachments, &[SubpassDesc { render_targets: &[0], inputs: &[] }]);
        assert_eq!(plans[0].attachments[0].store, StoreAction::StoreAndResolve);
    }

    #[test]
    fn test_duplicate_references_bind_once() {
        let attachments = [color(AttachmentLoadOperation::Clear, AttachmentStoreOperation::Store)];
        let plans = plan_subpasses(&attachments, &[SubpassDesc { render_targets: &[0], inputs: &[0] }]);
        assert_eq!(plans[0].attachments.len(), 1);
        assert_eq!(plans[0].color_count, 1);
    }

    #[test]
    fn test_unreferenced_attachment_is_not_bound() {
        let attachments = [
            color(AttachmentLoadOperation::Clear, AttachmentStoreOperation::Store),
            color(AttachmentLoadOperation::Clear, AttachmentStoreOperation::Store),
        ];
        let plans = plan_subpasses(&attachments, &[SubpassDesc { render_targets: &[1], inputs: &[] }]);
        assert_eq!(plans[0].attachments.len(), 1);
        assert_eq!(plans[0].attachments[0].attachment, 1);
    }
}
