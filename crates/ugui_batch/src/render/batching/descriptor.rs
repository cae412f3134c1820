//! Identity and contents of one batch produced by a merge pass

use bitflags::bitflags;

use super::batch_buffer::BatchBuffer;
use crate::foundation::collections::ProxyKey;
use crate::foundation::math::{Box2, Rect};
use crate::render::proxy::ProxyInfo;
use crate::render::types::{ExternalProxyId, GraphicType, MaterialId, TextureId};
use crate::ui::handle::RenderableHandle;

bitflags! {
    /// State snapshotted from the handle that opened the batch
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BatchFlags: u8 {
        /// Clip rect is active
        const RECT_CLIPPING = 1 << 0;
        /// Anti-aliased path
        const ANTI_ALIASING = 1 << 1;
        /// Text element
        const TEXT = 1 << 2;
        /// Rendered by a host-supplied proxy
        const EXTERNAL_PROXY = 1 << 3;
    }
}

/// One batch of a merge pass
///
/// Descriptors are rebuilt every pass. Only `owner_proxy` carries state
/// across passes, through the handles' proxy bindings.
#[derive(Debug, Clone)]
pub struct BatchDescriptor {
    /// Material of the first handle
    pub material: Option<MaterialId>,
    /// `material`, or the configured default when absent
    pub base_material: MaterialId,
    /// Texture of the first handle
    pub texture: Option<TextureId>,
    /// Clip rect
    pub clip_rect: Rect,
    /// Clip softness rect
    pub clip_softness: Rect,
    /// Render path
    pub graphic_type: GraphicType,
    /// Snapshotted flags
    pub flags: BatchFlags,
    /// Paint section the batch belongs to
    pub section: u32,
    /// Camera layer mask
    pub layer_mask: u32,
    /// Canvas-space box of every appended handle, not unioned
    pub bounds: Vec<Box2>,
    /// Lowest draw instruction in the batch
    pub min_instruction: u32,
    /// Highest draw instruction in the batch
    pub max_instruction: u32,
    /// Running vertex total
    pub vertex_count: u32,
    /// Running index total
    pub index_count: u32,
    /// Pooled proxy that will render the batch
    pub owner_proxy: Option<ProxyKey>,
    /// Host proxy for custom-proxy batches
    pub external_proxy: Option<ExternalProxyId>,
    /// Whether the proxy must rebuild its merged buffer
    pub dirty: bool,
    /// Handle to section table
    pub proxy_info: ProxyInfo,
    /// Sections to merge; empty for custom-proxy batches
    pub batch: BatchBuffer,
}

impl BatchDescriptor {
    /// Open a batch with `handle`'s identity
    pub fn from_handle(
        handle: &RenderableHandle,
        section: u32,
        base_material: MaterialId,
        capacity: usize,
    ) -> Self {
        let mut flags = BatchFlags::empty();
        flags.set(BatchFlags::RECT_CLIPPING, handle.is_rect_clipping());
        flags.set(BatchFlags::ANTI_ALIASING, handle.is_anti_aliasing());
        flags.set(BatchFlags::TEXT, handle.is_text());
        flags.set(BatchFlags::EXTERNAL_PROXY, handle.uses_custom_proxy());

        Self {
            material: handle.material(),
            base_material,
            texture: handle.texture(),
            clip_rect: *handle.clip_rect(),
            clip_softness: *handle.clip_softness(),
            graphic_type: handle.graphic_type(),
            flags,
            section,
            layer_mask: handle.layer_mask(),
            bounds: Vec::with_capacity(capacity),
            min_instruction: u32::MAX,
            max_instruction: 0,
            vertex_count: 0,
            index_count: 0,
            owner_proxy: None,
            external_proxy: None,
            dirty: false,
            proxy_info: ProxyInfo::default(),
            batch: BatchBuffer::new(),
        }
    }

    /// Whether a host proxy renders this batch
    pub fn is_external(&self) -> bool {
        self.flags.contains(BatchFlags::EXTERNAL_PROXY)
    }

    /// Whether `handle` in paint `section` may join this batch
    pub fn can_merge(&self, handle: &RenderableHandle, section: u32, use_layer_mask: bool) -> bool {
        if section > self.section || self.is_external() || handle.uses_custom_proxy() {
            return false;
        }

        if self.graphic_type != GraphicType::Mesh || handle.graphic_type() != self.graphic_type {
            return false;
        }

        let rect_clipping = self.flags.contains(BatchFlags::RECT_CLIPPING);
        if self.flags.contains(BatchFlags::TEXT) != handle.is_text()
            || self.material != handle.material()
            || self.texture != handle.texture()
            || rect_clipping != handle.is_rect_clipping()
            || self.flags.contains(BatchFlags::ANTI_ALIASING) != handle.is_anti_aliasing()
        {
            return false;
        }

        if rect_clipping
            && (self.clip_rect != *handle.clip_rect()
                || self.clip_softness != *handle.clip_softness())
        {
            return false;
        }

        !use_layer_mask || self.layer_mask == handle.layer_mask()
    }

    /// Whether `bounds` overlaps any handle already in the batch
    pub fn intersects(&self, bounds: &Box2) -> bool {
        self.bounds.iter().any(|b| b.intersects(bounds))
    }

    /// Widen the draw instruction range
    pub fn include_instruction(&mut self, instruction: u32) {
        self.min_instruction = self.min_instruction.min(instruction);
        self.max_instruction = self.max_instruction.max(instruction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Vec2, Vec3};
    use crate::render::vertex_buffer::VertexBuffer;

    fn handle() -> RenderableHandle {
        let mut handle = RenderableHandle::new();
        let mut mesh = VertexBuffer::new();
        mesh.add_vertex(Vec3::zeros(), [255; 4], [0.0, 0.0]);
        handle.fill_mesh(&mut mesh);
        handle.set_material(Some(MaterialId(7)));
        handle.set_texture(Some(TextureId(1)));
        handle
    }

    fn descriptor_for(handle: &RenderableHandle, section: u32) -> BatchDescriptor {
        BatchDescriptor::from_handle(handle, section, MaterialId(7), 4)
    }

    #[test]
    fn test_identical_handles_merge() {
        let first = handle();
        let desc = descriptor_for(&first, 0);
        assert!(desc.can_merge(&handle(), 0, false));
    }

    #[test]
    fn test_later_section_never_merges() {
        let desc = descriptor_for(&handle(), 1);
        assert!(desc.can_merge(&handle(), 1, false));
        assert!(desc.can_merge(&handle(), 0, false));
        assert!(!desc.can_merge(&handle(), 2, false));
    }

    #[test]
    fn test_state_mismatches_block_merge() {
        let desc = descriptor_for(&handle(), 0);

        let mut other = handle();
        other.set_texture(Some(TextureId(2)));
        assert!(!desc.can_merge(&other, 0, false));

        let mut other = handle();
        other.set_anti_aliasing(true);
        assert!(!desc.can_merge(&other, 0, false));

        let mut other = handle();
        other.enable_rect_clipping(Rect::new(0.0, 0.0, 1.0, 1.0), Rect::new(0.0, 0.0, 1.0, 1.0));
        assert!(!desc.can_merge(&other, 0, false));

        let mut other = handle();
        other.set_use_custom_proxy(true);
        assert!(!desc.can_merge(&other, 0, false));
    }

    #[test]
    fn test_non_mesh_types_never_merge() {
        let mut text = handle();
        text.set_graphic_type(GraphicType::Text);
        let desc = descriptor_for(&text, 0);
        assert!(!desc.can_merge(&text.clone(), 0, false));

        let mut blur = handle();
        blur.set_graphic_type(GraphicType::PostProcessBlur);
        assert!(!descriptor_for(&handle(), 0).can_merge(&blur, 0, false));
    }

    #[test]
    fn test_clip_rects_compared_only_when_clipping() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let mut first = handle();
        first.enable_rect_clipping(rect, rect);
        let desc = descriptor_for(&first, 0);

        let mut same = handle();
        same.enable_rect_clipping(rect, rect);
        assert!(desc.can_merge(&same, 0, false));

        let mut softer = handle();
        softer.enable_rect_clipping(rect, Rect::new(1.0, 1.0, 9.0, 9.0));
        assert!(!desc.can_merge(&softer, 0, false));
    }

    #[test]
    fn test_layer_mask_only_when_enabled() {
        let desc = descriptor_for(&handle(), 0);
        let mut other = handle();
        other.set_layer_mask(0b10);
        assert!(desc.can_merge(&other, 0, false));
        assert!(!desc.can_merge(&other, 0, true));
    }

    #[test]
    fn test_intersects_checks_every_box() {
        let mut desc = descriptor_for(&handle(), 0);
        desc.bounds.push(Box2::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0)));
        desc.bounds.push(Box2::new(Vec2::new(10.0, 10.0), Vec2::new(11.0, 11.0)));
        assert!(!desc.intersects(&Box2::new(Vec2::new(4.0, 4.0), Vec2::new(6.0, 6.0))));
        assert!(desc.intersects(&Box2::new(Vec2::new(10.5, 10.5), Vec2::new(12.0, 12.0))));
    }
}
