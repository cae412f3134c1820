//! # Canvas
//!
//! A canvas owns the renderable handles of one UI root and drives the
//! batching pipeline for them once per frame:
//!
//! 1. Handles are mutated through [`Canvas::handle_mut`]. The returned guard
//!    forwards structural changes to the canvas and color or UV1 changes to
//!    the proxy that rendered the handle last.
//! 2. [`Canvas::update`] re-runs the merge pass when anything structural
//!    changed, binds the descriptors to proxies, then applies queued patches.
//! 3. The host drains [`Canvas::collect_render_updates`] and uploads.
//!
//! Draw order is explicit. Nested canvases take part only as markers: one
//! that has batches of its own starts a new paint section, so later handles
//! never merge into batches painted before it.

use std::ops::{Deref, DerefMut};

use log::debug;

use crate::config::BatchingConfig;
use crate::foundation::collections::{HandleKey, HandleMap};
use crate::foundation::math::Transform;
use crate::render::batching::{BatchDescriptor, BatchMergeEngine, BatchStats, Placement};
use crate::render::proxy::{RenderProxyBridge, RenderUpdate};
use crate::render::types::RenderMode;
use crate::ui::handle::{ProxyBinding, RenderableHandle};

/// One step of the canvas paint order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawItem {
    /// A renderer owned by this canvas
    Renderer(HandleKey),
    /// A nested canvas that batches separately
    NestedCanvas {
        /// Whether the nested canvas produced any batch
        has_batches: bool,
    },
}

#[derive(Debug, Default, Clone, Copy)]
struct CanvasDirty {
    batch_dirty: bool,
    patches_pending: bool,
    refresh_all: bool,
}

/// Batching root for a tree of UI renderers
#[derive(Debug)]
pub struct Canvas {
    config: BatchingConfig,
    handles: HandleMap<HandleKey, RenderableHandle>,
    draw_order: Vec<DrawItem>,
    world_to_canvas: Transform,
    render_mode: RenderMode,
    dirty: CanvasDirty,
    engine: BatchMergeEngine,
    bridge: RenderProxyBridge,
    placements: Vec<(HandleKey, Placement)>,
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(BatchingConfig::default())
    }
}

impl Canvas {
    /// Create an empty canvas
    pub fn new(config: BatchingConfig) -> Self {
        Self {
            engine: BatchMergeEngine::new(&config),
            bridge: RenderProxyBridge::new(&config),
            handles: HandleMap::with_key(),
            draw_order: Vec::new(),
            world_to_canvas: Transform::identity(),
            render_mode: RenderMode::default(),
            dirty: CanvasDirty::default(),
            placements: Vec::new(),
            config,
        }
    }

    /// Batching settings
    pub fn config(&self) -> &BatchingConfig {
        &self.config
    }

    /// Add a handle at the end of the draw order
    pub fn create_handle(&mut self) -> HandleKey {
        let key = self.handles.insert(RenderableHandle::new());
        self.draw_order.push(DrawItem::Renderer(key));
        self.dirty.batch_dirty = true;
        key
    }

    /// Append a nested canvas marker to the draw order
    pub fn push_nested_canvas(&mut self, has_batches: bool) {
        self.draw_order.push(DrawItem::NestedCanvas { has_batches });
        self.dirty.batch_dirty = true;
    }

    /// Replace the draw order
    ///
    /// Renderer entries whose handle does not exist are skipped by the merge
    /// pass.
    pub fn set_draw_order(&mut self, order: Vec<DrawItem>) {
        if self.draw_order != order {
            self.draw_order = order;
            self.dirty.batch_dirty = true;
        }
    }

    /// Current draw order
    pub fn draw_order(&self) -> &[DrawItem] {
        &self.draw_order
    }

    /// Remove a handle from the draw order and the canvas
    pub fn remove_handle(&mut self, key: HandleKey) -> bool {
        self.draw_order.retain(|item| *item != DrawItem::Renderer(key));
        let Some(mut handle) = self.handles.remove(key) else {
            return false;
        };
        handle.clear();
        self.dirty.batch_dirty = true;
        true
    }

    /// Handle by key
    pub fn handle(&self, key: HandleKey) -> Option<&RenderableHandle> {
        self.handles.get(key)
    }

    /// All handles of the canvas
    pub fn handles(&self) -> &HandleMap<HandleKey, RenderableHandle> {
        &self.handles
    }

    /// Mutable access to a handle
    ///
    /// Changes are reported to the canvas when the guard drops.
    pub fn handle_mut(&mut self, key: HandleKey) -> Option<HandleMut<'_>> {
        let epsilon = self.config.visibility_epsilon;
        let handle = self.handles.get_mut(key)?;
        let was_renderable = handle.can_render(epsilon);
        Some(HandleMut {
            key,
            handle,
            dirty: &mut self.dirty,
            bridge: &mut self.bridge,
            epsilon,
            was_renderable,
        })
    }

    /// Render mode
    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    /// Switch render mode; every proxy rebuilds in the new layout
    pub fn set_render_mode(&mut self, mode: RenderMode) {
        if self.render_mode != mode {
            self.render_mode = mode;
            self.dirty.batch_dirty = true;
        }
    }

    /// World-to-canvas transform
    pub fn world_to_canvas(&self) -> &Transform {
        &self.world_to_canvas
    }

    /// Move the canvas; every batch is rebuilt on the next update
    pub fn set_world_to_canvas(&mut self, transform: Transform) {
        if self.world_to_canvas != transform {
            self.world_to_canvas = transform;
            self.dirty.refresh_all = true;
        }
    }

    /// Place the canvas in the world by its canvas-to-world transform
    pub fn set_canvas_to_world(&mut self, canvas_to_world: &Transform) {
        self.set_world_to_canvas(canvas_to_world.inverse());
    }

    /// Descriptors of the last merge pass
    ///
    /// Their batch data has moved into the proxies; counts, bounds and
    /// proxy assignment remain.
    pub fn descriptors(&self) -> &[BatchDescriptor] {
        self.engine.descriptors()
    }

    /// Whether the last pass produced any batch
    pub fn has_batches(&self) -> bool {
        !self.engine.descriptors().is_empty()
    }

    /// Proxy bridge
    pub fn bridge(&self) -> &RenderProxyBridge {
        &self.bridge
    }

    /// Mutable proxy bridge
    pub fn bridge_mut(&mut self) -> &mut RenderProxyBridge {
        &mut self.bridge
    }

    /// Drain render updates from every proxy
    pub fn collect_render_updates(&mut self) -> Vec<RenderUpdate> {
        self.bridge.collect_render_updates()
    }

    /// Run pending merge and patch work
    pub fn update(&mut self) -> BatchStats {
        let mut stats = BatchStats::default();
        if self.dirty.batch_dirty || self.dirty.refresh_all {
            self.rebuild(&mut stats);
        }
        if self.dirty.patches_pending {
            self.bridge.update_dirty_handles(&self.handles, &mut stats);
        }
        self.dirty = CanvasDirty::default();
        stats
    }

    fn rebuild(&mut self, stats: &mut BatchStats) {
        self.bridge.begin_pass();
        self.engine.begin_pass();
        self.placements.clear();

        let epsilon = self.config.visibility_epsilon;
        let mut section = 0;
        for (instruction, item) in self.draw_order.iter().enumerate() {
            match *item {
                DrawItem::NestedCanvas { has_batches } => {
                    if has_batches {
                        section += 1;
                    }
                }
                DrawItem::Renderer(key) => {
                    let Some(handle) = self.handles.get(key) else {
                        continue;
                    };
                    stats.handles_visited += 1;
                    if !handle.can_render(epsilon) {
                        stats.handles_skipped += 1;
                        continue;
                    }
                    let placed = self.engine.merge(
                        key,
                        handle,
                        instruction as u32,
                        section,
                        &self.world_to_canvas,
                        &mut self.bridge,
                    );
                    match placed {
                        Some(placement) => {
                            stats.handles_merged += 1;
                            self.placements.push((key, placement));
                        }
                        None => stats.handles_skipped += 1,
                    }
                }
            }
        }

        if self.dirty.refresh_all {
            for descriptor in self.engine.descriptors_mut() {
                descriptor.dirty = true;
            }
        }
        stats.descriptors = self.engine.descriptors().len();
        self.bridge.sync(self.engine.descriptors_mut(), self.render_mode, stats);

        for handle in self.handles.values_mut() {
            handle.set_binding(None);
            handle.clear_refresh();
        }
        let descriptors = self.engine.descriptors();
        for (key, placement) in self.placements.drain(..) {
            let proxy = descriptors.get(placement.descriptor).and_then(|d| d.owner_proxy);
            if let (Some(handle), Some(proxy)) = (self.handles.get_mut(key), proxy) {
                handle.set_binding(Some(ProxyBinding {
                    proxy,
                    section: placement.section,
                }));
            }
        }

        debug!(
            "Canvas rebuilt: {} handles into {} batches ({} rebuilt, {} reused, {} released)",
            stats.handles_merged,
            stats.descriptors,
            stats.proxies_rebuilt,
            stats.proxies_reused,
            stats.proxies_released
        );
    }
}

/// Write guard for a [`RenderableHandle`] owned by a [`Canvas`]
#[derive(Debug)]
pub struct HandleMut<'a> {
    key: HandleKey,
    handle: &'a mut RenderableHandle,
    dirty: &'a mut CanvasDirty,
    bridge: &'a mut RenderProxyBridge,
    epsilon: f32,
    was_renderable: bool,
}

impl HandleMut<'_> {
    /// Key of the guarded handle
    pub fn key(&self) -> HandleKey {
        self.key
    }
}

impl Deref for HandleMut<'_> {
    type Target = RenderableHandle;

    fn deref(&self) -> &RenderableHandle {
        &*self.handle
    }
}

impl DerefMut for HandleMut<'_> {
    fn deref_mut(&mut self) -> &mut RenderableHandle {
        &mut *self.handle
    }
}

impl Drop for HandleMut<'_> {
    fn drop(&mut self) {
        if self.handle.can_render(self.epsilon) != self.was_renderable {
            self.handle.mark_refresh();
        }
        if self.handle.needs_refresh() {
            self.dirty.batch_dirty = true;
        }

        let pending = self.handle.take_pending();
        if pending.is_empty() {
            return;
        }
        if let Some(binding) = self.handle.binding() {
            self.bridge.mark_handle_dirty(binding.proxy, self.key, pending);
            self.dirty.patches_pending = true;
        }
    }
}
