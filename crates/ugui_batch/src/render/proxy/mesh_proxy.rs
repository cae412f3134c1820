//! Long-lived render proxy for one batch
//!
//! A [`MeshProxy`] owns the published [`MergedBuffer`] of the batch it is
//! bound to. Published buffers are never edited: rebuilds and patches
//! produce a new buffer and swap the `Arc`, so a reader holding the old one
//! keeps a complete, unchanged copy.
//!
//! ```text
//!   Unbound ──setup──▶ Clean ──handle mutated──▶ Dirty
//!      ▲                 ▲                          │
//!      │                 └──────patches applied─────┘
//!      └──────────────── released to pool
//! ```

use std::sync::Arc;

use log::trace;

use crate::foundation::collections::{HandleKey, HandleMap, Pool, ProxyKey};
use crate::foundation::math::Rect;
use crate::render::batching::{BatchBuffer, BatchDescriptor, BatchFlags, BatchStats, MergedBuffer};
use crate::render::proxy::ProxyInfo;
use crate::render::types::{GraphicType, MaterialId, RenderMode, TextureId};
use crate::ui::handle::{PatchFlags, RenderableHandle};

/// Lifecycle of a pooled proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    /// In the pool, not rendering anything
    Unbound,
    /// Bound and in sync with its handles
    Clean,
    /// Bound with handle patches waiting
    Dirty,
}

/// Material and clip state a proxy draws with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProxyMaterial {
    /// Resolved material
    pub material: MaterialId,
    /// Main texture
    pub texture: Option<TextureId>,
    /// Clip rect
    pub clip_rect: Rect,
    /// Clip softness rect
    pub clip_softness: Rect,
    /// Whether clipping is active
    pub rect_clipping: bool,
    /// Render path
    pub graphic_type: GraphicType,
}

impl From<&BatchDescriptor> for ProxyMaterial {
    fn from(descriptor: &BatchDescriptor) -> Self {
        Self {
            material: descriptor.base_material,
            texture: descriptor.texture,
            clip_rect: descriptor.clip_rect,
            clip_softness: descriptor.clip_softness,
            rect_clipping: descriptor.flags.contains(BatchFlags::RECT_CLIPPING),
            graphic_type: descriptor.graphic_type,
        }
    }
}

/// Proxy rendering one batch
#[derive(Debug)]
pub struct MeshProxy {
    state: ProxyState,
    pub(crate) batch_index: Option<usize>,
    material: Option<ProxyMaterial>,
    render_mode: RenderMode,
    proxy_info: ProxyInfo,
    batch: Option<BatchBuffer>,
    buffer: Option<Arc<MergedBuffer>>,
    vertex_count: u32,
    index_count: u32,
    min_instruction: u32,
    max_instruction: u32,
    dirty_handles: Vec<(HandleKey, PatchFlags)>,
    render_data_dirty: bool,
}

impl Default for MeshProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshProxy {
    /// Create an unbound proxy
    pub fn new() -> Self {
        Self {
            state: ProxyState::Unbound,
            batch_index: None,
            material: None,
            render_mode: RenderMode::default(),
            proxy_info: ProxyInfo::default(),
            batch: None,
            buffer: None,
            vertex_count: 0,
            index_count: 0,
            min_instruction: u32::MAX,
            max_instruction: 0,
            dirty_handles: Vec::new(),
            render_data_dirty: false,
        }
    }

    /// Lifecycle state
    pub fn state(&self) -> ProxyState {
        self.state
    }

    /// Descriptor that claimed this proxy in the current pass
    pub fn batch_index(&self) -> Option<usize> {
        self.batch_index
    }

    /// Material state; `None` while unbound
    pub fn material(&self) -> Option<&ProxyMaterial> {
        self.material.as_ref()
    }

    /// Mode the proxy renders in
    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    /// Handle to section table of the bound batch
    pub fn proxy_info(&self) -> &ProxyInfo {
        &self.proxy_info
    }

    /// Sections of the bound batch
    pub fn batch(&self) -> Option<&BatchBuffer> {
        self.batch.as_ref()
    }

    /// Currently published merged buffer
    pub fn buffer(&self) -> Option<&Arc<MergedBuffer>> {
        self.buffer.as_ref()
    }

    /// Vertex and index totals of the bound batch
    pub fn counts(&self) -> (u32, u32) {
        (self.vertex_count, self.index_count)
    }

    /// Draw instruction range, for sorting against other canvases
    pub fn instruction_range(&self) -> (u32, u32) {
        (self.min_instruction, self.max_instruction)
    }

    /// Handles with patches waiting
    pub fn dirty_handles(&self) -> &[(HandleKey, PatchFlags)] {
        &self.dirty_handles
    }

    /// Whether published data changed since the last render update
    pub fn is_render_data_dirty(&self) -> bool {
        self.render_data_dirty
    }

    /// Switch render mode; the next material setup rebuilds the buffer
    pub fn set_render_mode(&mut self, mode: RenderMode) -> bool {
        if self.render_mode == mode {
            return false;
        }
        self.render_mode = mode;
        true
    }

    /// Bind to a freshly merged batch
    ///
    /// Returns true when the handle count no longer matches the sections the
    /// proxy previously held, which forces a rebuild even if every
    /// descriptor field looks unchanged.
    pub fn setup_canvas(
        &mut self,
        key: ProxyKey,
        mut proxy_info: ProxyInfo,
        batch: BatchBuffer,
        vertex_count: u32,
        index_count: u32,
        instructions: (u32, u32),
    ) -> bool {
        proxy_info.set_owner(Some(key));
        let drift = self
            .batch
            .as_ref()
            .is_some_and(|previous| previous.len() != proxy_info.len());

        self.proxy_info = proxy_info;
        self.batch = Some(batch);
        self.vertex_count = vertex_count;
        self.index_count = index_count;
        (self.min_instruction, self.max_instruction) = instructions;
        if self.state == ProxyState::Unbound {
            self.state = ProxyState::Clean;
        }
        drift
    }

    /// Apply material state and rebuild the merged buffer when needed
    ///
    /// Returns true if the buffer was rebuilt.
    pub fn set_ui_material(
        &mut self,
        material: ProxyMaterial,
        refresh: bool,
        containers: &mut Pool<MergedBuffer>,
    ) -> bool {
        if self.material != Some(material) {
            self.material = Some(material);
            self.render_data_dirty = true;
        }

        let stale_layout = self
            .buffer
            .as_ref()
            .map_or(true, |buffer| buffer.render_mode() != self.render_mode);
        if !refresh && !stale_layout {
            return false;
        }

        let Some(batch) = self.batch.as_ref() else {
            return false;
        };
        let mut merged = containers.acquire_or_else(MergedBuffer::default);
        batch.merge_into(self.render_mode, &mut merged);
        self.publish(merged, containers);

        self.dirty_handles.clear();
        self.state = ProxyState::Clean;
        true
    }

    /// Queue an incremental patch for `handle`
    pub fn mark_handle_dirty(&mut self, handle: HandleKey, flags: PatchFlags) {
        if self.state == ProxyState::Unbound || flags.is_empty() {
            return;
        }
        match self.dirty_handles.iter_mut().find(|(key, _)| *key == handle) {
            Some((_, pending)) => *pending |= flags,
            None => self.dirty_handles.push((handle, flags)),
        }
        self.state = ProxyState::Dirty;
    }

    /// Apply queued patches against a private copy and publish it
    ///
    /// Patches whose handle no longer resolves to a section of this batch
    /// are dropped; the next full merge corrects them.
    pub fn update_dirty_handles(
        &mut self,
        handles: &HandleMap<HandleKey, RenderableHandle>,
        containers: &mut Pool<MergedBuffer>,
        stats: &mut BatchStats,
    ) {
        if self.dirty_handles.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.dirty_handles);
        if self.state == ProxyState::Dirty {
            self.state = ProxyState::Clean;
        }

        let (Some(published), Some(batch)) = (self.buffer.as_ref(), self.batch.as_mut()) else {
            stats.patches_dropped += pending.len();
            return;
        };

        let mut next: Option<MergedBuffer> = None;
        for (key, flags) in pending {
            let resolved = match (handles.get(key), self.proxy_info.section_of(key)) {
                (Some(handle), Some(index)) => batch
                    .section_mut(index)
                    .filter(|section| section.handle == key)
                    .map(|section| (handle, section)),
                _ => None,
            };
            let Some((handle, section)) = resolved else {
                trace!("Dropping patch for unresolved handle {key:?}");
                stats.patches_dropped += 1;
                continue;
            };

            let target = next.get_or_insert_with(|| {
                let mut copy = containers.acquire_or_else(MergedBuffer::default);
                copy.copy_from(published);
                copy
            });

            let mut applied = true;
            if flags.contains(PatchFlags::UV1) {
                let uv = handle.mesh().vertex(0).map(|v| v.uv1());
                match uv {
                    Some(uv) if handle.mesh().vertex_count() == section.mesh.vertex_count() => {
                        section.mesh = Arc::clone(handle.mesh());
                        applied &= target.rewrite_uv1(section.vertex_range(), uv);
                    }
                    _ => applied = false,
                }
            }
            if flags.contains(PatchFlags::COLOR) {
                section.color = handle.color();
                section.inherited_alpha = handle.inherited_alpha();
                applied &= target.recolor_section(section);
            }

            if applied {
                stats.patches_applied += 1;
            } else {
                stats.patches_dropped += 1;
            }
        }

        if let Some(next) = next {
            self.publish(next, containers);
        }
    }

    fn publish(&mut self, merged: MergedBuffer, containers: &mut Pool<MergedBuffer>) {
        if let Some(old) = self.buffer.replace(Arc::new(merged)) {
            recycle(old, containers);
        }
        self.render_data_dirty = true;
    }

    /// Drop the batch and return to the unbound state
    pub fn clear(&mut self, containers: &mut Pool<MergedBuffer>) {
        if let Some(old) = self.buffer.take() {
            recycle(old, containers);
        }
        self.state = ProxyState::Unbound;
        self.batch_index = None;
        self.material = None;
        self.proxy_info.clear();
        self.batch = None;
        self.vertex_count = 0;
        self.index_count = 0;
        self.min_instruction = u32::MAX;
        self.max_instruction = 0;
        self.dirty_handles.clear();
        self.render_data_dirty = false;
    }

    pub(crate) fn take_render_data_dirty(&mut self) -> bool {
        std::mem::take(&mut self.render_data_dirty)
    }
}

fn recycle(buffer: Arc<MergedBuffer>, containers: &mut Pool<MergedBuffer>) {
    if let Ok(buffer) = Arc::try_unwrap(buffer) {
        containers.release(buffer);
    }
}
