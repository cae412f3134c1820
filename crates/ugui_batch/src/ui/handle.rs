//! Per-widget render state
//!
//! A [`RenderableHandle`] is what the merge pass consumes: geometry plus the
//! color, material, clip and flag state that decide which batch it joins.
//! Setters are no-ops when the value is unchanged. Changes that affect
//! batch membership raise the handle's refresh flag; color, alpha and UV1
//! changes only record pending [`PatchFlags`] so the bound proxy can patch
//! its buffer in place.
//!
//! Handles are mutated through [`Canvas::handle_mut`](super::canvas::Canvas::handle_mut),
//! whose guard forwards these signals to the canvas and proxy bookkeeping.

use std::sync::Arc;

use bitflags::bitflags;

use crate::foundation::collections::ProxyKey;
use crate::foundation::math::{Rect, Transform};
use crate::render::color::LinearColor;
use crate::render::types::{ExternalProxyId, GraphicType, MaterialId, TextureId};
use crate::render::vertex_buffer::VertexBuffer;

bitflags! {
    /// Boolean render state of a handle
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RendererFlags: u16 {
        /// Culled by its parent; not drawn
        const SHOULD_CULL = 1 << 0;
        /// Uses the anti-aliased material path
        const ANTI_ALIASING = 1 << 1;
        /// Text element
        const TEXT = 1 << 2;
        /// Kept for raycasts but not drawn
        const HIDE_PRIMITIVE = 1 << 3;
        /// Draws through a host-supplied proxy
        const USE_CUSTOM_PROXY = 1 << 4;
        /// Clip rect is active
        const RECT_CLIPPING = 1 << 5;
    }
}

bitflags! {
    /// Incremental buffer patches a handle is waiting for
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PatchFlags: u8 {
        /// Re-blend vertex colors
        const COLOR = 1 << 0;
        /// Rewrite the secondary UV channel
        const UV1 = 1 << 1;
    }
}

/// Placement of the widget in the scene
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attachment {
    /// Renderer-to-world transform
    pub renderer_to_world: Transform,
    /// Widget rect in renderer-local space
    pub local_rect: Rect,
}

/// Proxy and section that served a handle in the last pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyBinding {
    /// Proxy owning the handle's section
    pub proxy: ProxyKey,
    /// Section index inside that proxy's batch
    pub section: usize,
}

/// Render state of one widget
#[derive(Debug, Clone)]
pub struct RenderableHandle {
    color: LinearColor,
    inherited_alpha: f32,
    active: bool,
    material: Option<MaterialId>,
    texture: Option<TextureId>,
    clip_rect: Rect,
    clip_softness: Rect,
    graphic_type: GraphicType,
    flags: RendererFlags,
    layer_mask: u32,
    custom_proxy: Option<ExternalProxyId>,
    mesh: Arc<VertexBuffer>,
    attachment: Option<Attachment>,
    binding: Option<ProxyBinding>,
    refresh: bool,
    pending: PatchFlags,
}

impl Default for RenderableHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderableHandle {
    /// Create an active, empty handle
    pub fn new() -> Self {
        Self {
            color: LinearColor::WHITE,
            inherited_alpha: 1.0,
            active: true,
            material: None,
            texture: None,
            clip_rect: Rect::default(),
            clip_softness: Rect::default(),
            graphic_type: GraphicType::Mesh,
            flags: RendererFlags::empty(),
            layer_mask: u32::MAX,
            custom_proxy: None,
            mesh: Arc::new(VertexBuffer::new()),
            attachment: None,
            binding: None,
            refresh: true,
            pending: PatchFlags::empty(),
        }
    }

    /// Whether this handle contributes to a batch this pass
    pub fn can_render(&self, epsilon: f32) -> bool {
        self.active
            && !self.flags.intersects(RendererFlags::SHOULD_CULL | RendererFlags::HIDE_PRIMITIVE)
            && self.color.a * self.inherited_alpha > epsilon
            && (self.uses_custom_proxy() || !self.mesh.is_empty())
    }

    /// Handle color
    pub fn color(&self) -> LinearColor {
        self.color
    }

    /// Opacity inherited from ancestors
    pub fn inherited_alpha(&self) -> f32 {
        self.inherited_alpha
    }

    /// Whether the owning widget is enabled
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Material, if any
    pub fn material(&self) -> Option<MaterialId> {
        self.material
    }

    /// Texture, if any
    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    /// Clip rect
    pub fn clip_rect(&self) -> &Rect {
        &self.clip_rect
    }

    /// Clip softness rect, always inside the clip rect
    pub fn clip_softness(&self) -> &Rect {
        &self.clip_softness
    }

    /// Render path
    pub fn graphic_type(&self) -> GraphicType {
        self.graphic_type
    }

    /// Flag set
    pub fn flags(&self) -> RendererFlags {
        self.flags
    }

    /// Whether rect clipping is enabled
    pub fn is_rect_clipping(&self) -> bool {
        self.flags.contains(RendererFlags::RECT_CLIPPING)
    }

    /// Whether the anti-aliased path is used
    pub fn is_anti_aliasing(&self) -> bool {
        self.flags.contains(RendererFlags::ANTI_ALIASING)
    }

    /// Whether this is a text element
    pub fn is_text(&self) -> bool {
        self.flags.contains(RendererFlags::TEXT)
    }

    /// Whether a host-supplied proxy draws this handle
    pub fn uses_custom_proxy(&self) -> bool {
        self.flags.contains(RendererFlags::USE_CUSTOM_PROXY)
    }

    /// Host-supplied proxy
    pub fn custom_proxy(&self) -> Option<ExternalProxyId> {
        self.custom_proxy
    }

    /// Camera layer mask
    pub fn layer_mask(&self) -> u32 {
        self.layer_mask
    }

    /// Current geometry
    pub fn mesh(&self) -> &Arc<VertexBuffer> {
        &self.mesh
    }

    /// Scene placement; `None` once the widget is detached
    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Proxy and section from the last merge pass
    pub fn binding(&self) -> Option<ProxyBinding> {
        self.binding
    }

    /// Whether a structural change is waiting for the next merge pass
    pub fn needs_refresh(&self) -> bool {
        self.refresh
    }

    pub(crate) fn set_binding(&mut self, binding: Option<ProxyBinding>) {
        self.binding = binding;
    }

    /// Patches recorded since the canvas last drained them
    pub fn pending_patches(&self) -> PatchFlags {
        self.pending
    }

    pub(crate) fn clear_refresh(&mut self) {
        self.refresh = false;
    }

    pub(crate) fn take_pending(&mut self) -> PatchFlags {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn mark_refresh(&mut self) -> bool {
        self.refresh = true;
        true
    }

    fn mark_patch(&mut self, flags: PatchFlags) -> bool {
        self.pending |= flags;
        true
    }

    /// Set the handle color
    pub fn set_color(&mut self, color: LinearColor) -> bool {
        if self.color == color {
            return false;
        }
        self.color = color;
        self.mark_patch(PatchFlags::COLOR)
    }

    /// Set only the alpha of the handle color
    pub fn set_alpha(&mut self, alpha: f32) -> bool {
        self.set_color(self.color.with_alpha(alpha))
    }

    /// Set the opacity inherited from ancestors
    pub fn set_inherited_alpha(&mut self, alpha: f32) -> bool {
        if (self.inherited_alpha - alpha).abs() <= f32::EPSILON {
            return false;
        }
        self.inherited_alpha = alpha;
        self.mark_patch(PatchFlags::COLOR)
    }

    /// Set the secondary UV on every vertex of the current mesh
    pub fn update_mesh_uv1(&mut self, uv1: [f32; 2]) -> bool {
        if self.mesh.vertices().iter().all(|v| v.uv1() == uv1) {
            return false;
        }
        Arc::make_mut(&mut self.mesh).update_all_uv1(uv1);
        self.mark_patch(PatchFlags::UV1)
    }

    /// Enable or disable the widget
    pub fn set_active(&mut self, active: bool) -> bool {
        if self.active == active {
            return false;
        }
        self.active = active;
        self.mark_refresh()
    }

    /// Set or clear the material
    pub fn set_material(&mut self, material: Option<MaterialId>) -> bool {
        if self.material == material {
            return false;
        }
        self.material = material;
        self.mark_refresh()
    }

    /// Set or clear the texture
    pub fn set_texture(&mut self, texture: Option<TextureId>) -> bool {
        if self.texture == texture {
            return false;
        }
        self.texture = texture;
        self.mark_refresh()
    }

    /// Set the render path
    pub fn set_graphic_type(&mut self, graphic_type: GraphicType) -> bool {
        if self.graphic_type == graphic_type {
            return false;
        }
        self.graphic_type = graphic_type;
        self.mark_refresh()
    }

    /// Set the camera layer mask
    pub fn set_layer_mask(&mut self, layer_mask: u32) -> bool {
        if self.layer_mask == layer_mask {
            return false;
        }
        self.layer_mask = layer_mask;
        self.mark_refresh()
    }

    fn set_flag(&mut self, flag: RendererFlags, value: bool) -> bool {
        if self.flags.contains(flag) == value {
            return false;
        }
        self.flags.set(flag, value);
        self.mark_refresh()
    }

    /// Cull or un-cull the handle
    pub fn set_should_cull(&mut self, cull: bool) -> bool {
        self.set_flag(RendererFlags::SHOULD_CULL, cull)
    }

    /// Toggle the anti-aliased path
    pub fn set_anti_aliasing(&mut self, anti_aliasing: bool) -> bool {
        self.set_flag(RendererFlags::ANTI_ALIASING, anti_aliasing)
    }

    /// Mark the handle as a text element
    pub fn set_text_element(&mut self, is_text: bool) -> bool {
        self.set_flag(RendererFlags::TEXT, is_text)
    }

    /// Hide the primitive without disabling the widget
    pub fn set_hide_primitive(&mut self, hide: bool) -> bool {
        self.set_flag(RendererFlags::HIDE_PRIMITIVE, hide)
    }

    /// Route drawing through a host-supplied proxy
    pub fn set_use_custom_proxy(&mut self, use_custom: bool) -> bool {
        self.set_flag(RendererFlags::USE_CUSTOM_PROXY, use_custom)
    }

    /// Set the host-supplied proxy
    pub fn set_custom_proxy(&mut self, proxy: Option<ExternalProxyId>) -> bool {
        if self.custom_proxy == proxy {
            return false;
        }
        self.custom_proxy = proxy;
        self.mark_refresh()
    }

    /// Clip to `rect`, with the softness rect clamped inside it
    pub fn enable_rect_clipping(&mut self, rect: Rect, softness: Rect) -> bool {
        let softness = softness.clamped_to(&rect);
        if self.is_rect_clipping() && self.clip_rect == rect && self.clip_softness == softness {
            return false;
        }
        self.flags.insert(RendererFlags::RECT_CLIPPING);
        self.clip_rect = rect;
        self.clip_softness = softness;
        self.mark_refresh()
    }

    /// Stop clipping
    pub fn disable_rect_clipping(&mut self) -> bool {
        self.set_flag(RendererFlags::RECT_CLIPPING, false)
    }

    /// Move `vertices` into the handle's mesh, leaving `vertices` empty
    pub fn fill_mesh(&mut self, vertices: &mut VertexBuffer) -> bool {
        Arc::make_mut(&mut self.mesh).move_from(vertices);
        self.mark_refresh()
    }

    /// Place the widget in the scene, or detach it with `None`
    pub fn set_attachment(&mut self, attachment: Option<Attachment>) -> bool {
        if self.attachment == attachment {
            return false;
        }
        self.attachment = attachment;
        self.mark_refresh()
    }

    /// Empty the mesh and drop material and texture
    ///
    /// Only call once the handle is no longer tracked by any batch.
    pub fn clear(&mut self) -> bool {
        match Arc::get_mut(&mut self.mesh) {
            Some(mesh) => mesh.reset(),
            None => self.mesh = Arc::new(VertexBuffer::new()),
        }
        self.material = None;
        self.texture = None;
        self.binding = None;
        self.mark_refresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    fn filled() -> RenderableHandle {
        let mut handle = RenderableHandle::new();
        let mut mesh = VertexBuffer::new();
        mesh.add_vertex(Vec3::zeros(), [255; 4], [0.0, 0.0]);
        handle.fill_mesh(&mut mesh);
        handle.clear_refresh();
        handle
    }

    #[test]
    fn test_setters_noop_when_unchanged() {
        let mut handle = filled();
        assert!(!handle.set_color(LinearColor::WHITE));
        assert!(!handle.set_inherited_alpha(1.0));
        assert!(!handle.set_material(None));
        assert!(!handle.set_anti_aliasing(false));
        assert!(!handle.needs_refresh());
        assert!(handle.pending_patches().is_empty());
    }

    #[test]
    fn test_color_changes_request_patch_not_refresh() {
        let mut handle = filled();
        assert!(handle.set_alpha(0.5));
        assert_eq!(handle.take_pending(), PatchFlags::COLOR);
        assert!(handle.set_inherited_alpha(0.25));
        assert!(handle.update_mesh_uv1([0.5, 0.5]));
        assert!(!handle.update_mesh_uv1([0.5, 0.5]));
        assert_eq!(handle.take_pending(), PatchFlags::COLOR | PatchFlags::UV1);
        assert!(handle.take_pending().is_empty());
        assert!(!handle.needs_refresh());
    }

    #[test]
    fn test_structural_setters_refresh() {
        let mut handle = filled();
        assert!(handle.set_material(Some(MaterialId(3))));
        assert!(handle.needs_refresh());
        handle.clear_refresh();
        assert!(handle.set_text_element(true));
        assert!(handle.needs_refresh());
    }

    #[test]
    fn test_can_render_rules() {
        let epsilon = 1e-4;
        let mut handle = RenderableHandle::new();
        assert!(!handle.can_render(epsilon), "empty mesh");
        handle.set_use_custom_proxy(true);
        assert!(handle.can_render(epsilon), "custom proxy needs no mesh");

        let mut handle = filled();
        assert!(handle.can_render(epsilon));
        handle.set_inherited_alpha(0.5);
        handle.set_alpha(1e-4);
        assert!(!handle.can_render(epsilon));
        handle.set_alpha(1.0);
        handle.set_hide_primitive(true);
        assert!(!handle.can_render(epsilon));
        handle.set_hide_primitive(false);
        handle.set_active(false);
        assert!(!handle.can_render(epsilon));
    }

    #[test]
    fn test_clip_softness_clamped_into_clip_rect() {
        let mut handle = filled();
        let rect = Rect::new(10.0, 10.0, 50.0, 40.0);
        for softness in [
            Rect::new(0.0, 0.0, 100.0, 100.0),
            Rect::new(20.0, -5.0, 45.0, 60.0),
            Rect::new(60.0, 50.0, 5.0, 0.0),
        ] {
            handle.enable_rect_clipping(rect, softness);
            let stored = handle.clip_softness();
            for v in [stored.min, stored.max] {
                assert!(v.x >= rect.min.x && v.x <= rect.max.x);
                assert!(v.y >= rect.min.y && v.y <= rect.max.y);
            }
        }
    }

    #[test]
    fn test_rect_clipping_noop_when_identical() {
        let mut handle = filled();
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(handle.enable_rect_clipping(rect, Rect::new(-1.0, 0.0, 5.0, 5.0)));
        handle.clear_refresh();
        assert!(!handle.enable_rect_clipping(rect, Rect::new(-2.0, 0.0, 5.0, 5.0)));
        assert!(handle.disable_rect_clipping());
        assert!(!handle.disable_rect_clipping());
    }

    #[test]
    fn test_uv1_update_does_not_touch_shared_mesh() {
        let mut handle = filled();
        let snapshot = Arc::clone(handle.mesh());
        handle.update_mesh_uv1([1.0, 0.0]);
        assert_eq!(snapshot.vertex(0).unwrap().uv1(), [0.0, 0.0]);
        assert_eq!(handle.mesh().vertex(0).unwrap().uv1(), [1.0, 0.0]);
    }

    #[test]
    fn test_clear_empties_mesh_and_resources() {
        let mut handle = filled();
        handle.set_material(Some(MaterialId(1)));
        handle.set_texture(Some(TextureId(2)));
        handle.clear();
        assert!(handle.mesh().is_empty());
        assert_eq!(handle.material(), None);
        assert_eq!(handle.texture(), None);
        assert!(handle.needs_refresh());
    }
}
