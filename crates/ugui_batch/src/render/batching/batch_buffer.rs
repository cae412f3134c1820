//! # Batch Buffer
//!
//! Turns the ordered sections of one batch into a single vertex buffer and
//! a single index buffer ready for upload.
//!
//! ## Layouts
//!
//! - **World space**: [`WorldVertex`] with tangent frame, eight UV channels
//!   and the canvas-space XY copied into the screen-position channel. The
//!   local bounding box is always accumulated.
//! - **Screen space**: [`ScreenVertex`]. Sections whose tint is opaque white
//!   copy vertex colors without blending. Overlay canvases skip the local
//!   bounding box.
//!
//! Both layouts share one merge loop parameterized over [`VertexWriter`].
//!
//! ## Incremental patches
//!
//! [`MergedBuffer::recolor_section`] and [`MergedBuffer::rewrite_uv1`] edit a
//! single section's vertex range in place. Callers apply them to a private
//! copy, never to a buffer that has already been published.

use std::ops::Range;
use std::sync::Arc;

use crate::foundation::collections::HandleKey;
use crate::foundation::math::{Box3, Transform, Vec3};
use crate::render::color::{blend, LinearColor, Rgba8};
use crate::render::types::RenderMode;
use crate::render::vertex::{ScreenVertex, UiVertex, VertexWriter, WorldVertex};
use crate::render::vertex_buffer::VertexBuffer;

/// One handle's contribution to a batch
#[derive(Debug, Clone)]
pub struct BatchSection {
    /// Handle that produced the geometry
    pub handle: HandleKey,
    /// Snapshot of the handle's mesh
    pub mesh: Arc<VertexBuffer>,
    /// Renderer-to-canvas transform
    pub transform: Transform,
    /// Handle color
    pub color: LinearColor,
    /// Opacity inherited from ancestors
    pub inherited_alpha: f32,
    /// First vertex of this section in the merged buffer
    pub vertex_start: u32,
    /// First index of this section in the merged buffer
    pub index_start: u32,
}

impl BatchSection {
    /// Color multiplied into every vertex of the section
    pub fn tint(&self) -> LinearColor {
        self.color.tint(self.inherited_alpha)
    }

    /// Vertex range covered in the merged buffer
    pub fn vertex_range(&self) -> Range<usize> {
        let start = self.vertex_start as usize;
        start..start + self.mesh.vertex_count()
    }
}

/// Ordered sections of one batch
#[derive(Debug, Clone, Default)]
pub struct BatchBuffer {
    sections: Vec<BatchSection>,
}

impl BatchBuffer {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a section
    pub fn push(&mut self, section: BatchSection) {
        self.sections.push(section);
    }

    /// All sections in merge order
    pub fn sections(&self) -> &[BatchSection] {
        &self.sections
    }

    /// Section at `index`
    pub fn section(&self, index: usize) -> Option<&BatchSection> {
        self.sections.get(index)
    }

    /// Mutable section at `index`
    pub fn section_mut(&mut self, index: usize) -> Option<&mut BatchSection> {
        self.sections.get_mut(index)
    }

    /// Number of sections
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Whether the batch has no sections
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Total vertices across sections
    pub fn vertex_count(&self) -> usize {
        self.sections.iter().map(|s| s.mesh.vertex_count()).sum()
    }

    /// Total indices across sections
    pub fn index_count(&self) -> usize {
        self.sections.iter().map(|s| s.mesh.index_count()).sum()
    }

    /// Merge every section into `target`, replacing its contents
    pub fn merge_into(&self, mode: RenderMode, target: &mut MergedBuffer) {
        target.reset(mode);
        let MergedBuffer {
            vertices,
            indices,
            local_box,
            ..
        } = target;
        let bounds = if mode.tracks_bounds() { Some(local_box) } else { None };

        let total = self.vertex_count();
        match vertices {
            MergedVertices::Screen(out) => merge_vertices(&self.sections, out, total, bounds, true),
            MergedVertices::World(out) => merge_vertices(&self.sections, out, total, bounds, false),
        }
        merge_indices(&self.sections, indices, self.index_count());
    }

    /// Merge into a freshly allocated buffer
    pub fn merge(&self, mode: RenderMode) -> MergedBuffer {
        let mut target = MergedBuffer::new(mode);
        self.merge_into(mode, &mut target);
        target
    }
}

fn merge_vertices<V: VertexWriter>(
    sections: &[BatchSection],
    out: &mut Vec<V>,
    total: usize,
    mut bounds: Option<&mut Box3>,
    skip_identity_blend: bool,
) {
    out.resize(total, V::default());

    for section in sections {
        let tint = section.tint();
        let copy_colors = skip_identity_blend && tint.is_identity();
        let start = section.vertex_start as usize;

        for (local, source) in section.mesh.vertices().iter().enumerate() {
            let position = section.transform.transform_point(&Vec3::from(source.position));
            let vertex = &mut out[start + local];

            vertex.write_attributes(source, &section.transform);
            vertex.write_position(&position);
            vertex.write_extra_uv(&position);
            vertex.write_color(if copy_colors {
                source.color
            } else {
                blend(source.color, &tint)
            });

            if let Some(bounds) = bounds.as_deref_mut() {
                bounds.add_point(&position);
            }
        }
    }
}

fn merge_indices(sections: &[BatchSection], out: &mut Vec<u32>, total: usize) {
    out.resize(total, 0);

    for section in sections {
        let source = section.mesh.indices();
        let start = section.index_start as usize;
        let base = section.vertex_start;
        let target = &mut out[start..start + source.len()];

        let mut target_chunks = target.chunks_exact_mut(4);
        let mut source_chunks = source.chunks_exact(4);
        for (dst, src) in (&mut target_chunks).zip(&mut source_chunks) {
            dst[0] = src[0] + base;
            dst[1] = src[1] + base;
            dst[2] = src[2] + base;
            dst[3] = src[3] + base;
        }
        for (dst, src) in target_chunks
            .into_remainder()
            .iter_mut()
            .zip(source_chunks.remainder())
        {
            *dst = *src + base;
        }
    }
}

/// Merged vertices in the layout chosen for the batch
#[derive(Debug, Clone, PartialEq)]
pub enum MergedVertices {
    /// Screen-space layout
    Screen(Vec<ScreenVertex>),
    /// World-space layout
    World(Vec<WorldVertex>),
}

/// Upload-ready output of a batch merge
#[derive(Debug, Clone, PartialEq)]
pub struct MergedBuffer {
    vertices: MergedVertices,
    indices: Vec<u32>,
    local_box: Box3,
    render_mode: RenderMode,
}

impl Default for MergedBuffer {
    fn default() -> Self {
        Self::new(RenderMode::default())
    }
}

impl MergedBuffer {
    /// Empty buffer laid out for `mode`
    pub fn new(mode: RenderMode) -> Self {
        Self {
            vertices: Self::empty_vertices(mode),
            indices: Vec::new(),
            local_box: Box3::empty(),
            render_mode: mode,
        }
    }

    fn empty_vertices(mode: RenderMode) -> MergedVertices {
        if mode.is_world_space() {
            MergedVertices::World(Vec::new())
        } else {
            MergedVertices::Screen(Vec::new())
        }
    }

    /// Clear contents, keeping allocations when the layout is unchanged
    pub fn reset(&mut self, mode: RenderMode) {
        match (&mut self.vertices, mode.is_world_space()) {
            (MergedVertices::World(v), true) => v.clear(),
            (MergedVertices::Screen(v), false) => v.clear(),
            _ => self.vertices = Self::empty_vertices(mode),
        }
        self.indices.clear();
        self.local_box = Box3::empty();
        self.render_mode = mode;
    }

    /// Overwrite this buffer with a copy of `other`, reusing allocations
    pub fn copy_from(&mut self, other: &MergedBuffer) {
        match (&mut self.vertices, &other.vertices) {
            (MergedVertices::World(dst), MergedVertices::World(src)) => dst.clone_from(src),
            (MergedVertices::Screen(dst), MergedVertices::Screen(src)) => dst.clone_from(src),
            (dst, src) => *dst = src.clone(),
        }
        self.indices.clone_from(&other.indices);
        self.local_box = other.local_box;
        self.render_mode = other.render_mode;
    }

    /// Re-blend one section's vertex colors with its current tint
    ///
    /// Returns false, leaving the buffer untouched, when the section's range
    /// is not inside this buffer.
    pub fn recolor_section(&mut self, section: &BatchSection) -> bool {
        let range = section.vertex_range();
        if range.end > self.vertex_count() {
            return false;
        }
        let tint = section.tint();
        let sources = section.mesh.vertices();
        match &mut self.vertices {
            MergedVertices::Screen(v) => recolor(&mut v[range], sources, &tint),
            MergedVertices::World(v) => recolor(&mut v[range], sources, &tint),
        }
        true
    }

    /// Set the secondary UV over a vertex range
    ///
    /// Returns false, leaving the buffer untouched, when the range is not
    /// inside this buffer.
    pub fn rewrite_uv1(&mut self, range: Range<usize>, uv: [f32; 2]) -> bool {
        if range.start > range.end || range.end > self.vertex_count() {
            return false;
        }
        match &mut self.vertices {
            MergedVertices::Screen(v) => v[range].iter_mut().for_each(|x| x.write_uv1(uv)),
            MergedVertices::World(v) => v[range].iter_mut().for_each(|x| x.write_uv1(uv)),
        }
        true
    }

    /// Number of merged vertices
    pub fn vertex_count(&self) -> usize {
        match &self.vertices {
            MergedVertices::Screen(v) => v.len(),
            MergedVertices::World(v) => v.len(),
        }
    }

    /// Number of merged indices
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Merged vertices
    pub fn vertices(&self) -> &MergedVertices {
        &self.vertices
    }

    /// Merged indices
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Canvas-local bounds; invalid when the mode skips bounds
    pub fn local_box(&self) -> &Box3 {
        &self.local_box
    }

    /// Mode the buffer was laid out for
    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    /// Color of vertex `index`
    pub fn color_at(&self, index: usize) -> Option<Rgba8> {
        match &self.vertices {
            MergedVertices::Screen(v) => v.get(index).map(VertexWriter::color),
            MergedVertices::World(v) => v.get(index).map(VertexWriter::color),
        }
    }

    /// Position of vertex `index`
    pub fn position_at(&self, index: usize) -> Option<[f32; 3]> {
        match &self.vertices {
            MergedVertices::Screen(v) => v.get(index).map(VertexWriter::position),
            MergedVertices::World(v) => v.get(index).map(VertexWriter::position),
        }
    }

    /// Secondary UV of vertex `index`
    pub fn uv1_at(&self, index: usize) -> Option<[f32; 2]> {
        match &self.vertices {
            MergedVertices::Screen(v) => v.get(index).map(VertexWriter::uv1),
            MergedVertices::World(v) => v.get(index).map(VertexWriter::uv1),
        }
    }

    /// Vertex data as raw bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        match &self.vertices {
            MergedVertices::Screen(v) => bytemuck::cast_slice(v),
            MergedVertices::World(v) => bytemuck::cast_slice(v),
        }
    }

    /// Index data as raw bytes
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

fn recolor<V: VertexWriter>(target: &mut [V], sources: &[UiVertex], tint: &LinearColor) {
    for (vertex, source) in target.iter_mut().zip(sources) {
        vertex.write_color(blend(source.color, tint));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Quat;
    use crate::render::vertex::SCREEN_POSITION_UV;
    use approx::assert_relative_eq;
    use slotmap::SlotMap;

    fn quad_mesh(color: Rgba8) -> Arc<VertexBuffer> {
        let mut mesh = VertexBuffer::new();
        mesh.add_quad([
            UiVertex::new(Vec3::new(0.0, 0.0, 0.0), color, [0.0, 0.0]),
            UiVertex::new(Vec3::new(1.0, 0.0, 0.0), color, [1.0, 0.0]),
            UiVertex::new(Vec3::new(1.0, 1.0, 0.0), color, [1.0, 1.0]),
            UiVertex::new(Vec3::new(0.0, 1.0, 0.0), color, [0.0, 1.0]),
        ]);
        Arc::new(mesh)
    }

    fn batch_of(count: usize, color: LinearColor) -> BatchBuffer {
        let mut keys: SlotMap<HandleKey, ()> = SlotMap::with_key();
        let mut batch = BatchBuffer::new();
        let (mut vertex_start, mut index_start) = (0, 0);
        for i in 0..count {
            let mesh = quad_mesh([200, 100, 50, 255]);
            let (vertices, indices) = (mesh.vertex_count() as u32, mesh.index_count() as u32);
            batch.push(BatchSection {
                handle: keys.insert(()),
                mesh,
                transform: Transform::from_position(Vec3::new(i as f32 * 10.0, 0.0, 0.0)),
                color,
                inherited_alpha: 1.0,
                vertex_start,
                index_start,
            });
            vertex_start += vertices;
            index_start += indices;
        }
        batch
    }

    #[test]
    fn test_merged_sizes_match_section_sums() {
        let batch = batch_of(3, LinearColor::WHITE);
        for mode in [
            RenderMode::ScreenSpaceOverlay,
            RenderMode::ScreenSpaceFree,
            RenderMode::WorldSpace,
        ] {
            let merged = batch.merge(mode);
            assert_eq!(merged.vertex_count(), 12);
            assert_eq!(merged.index_count(), 18);
            assert_eq!(merged.vertex_bytes().len() % 4, 0);
            assert_eq!(merged.index_bytes().len(), 18 * 4);
        }
    }

    #[test]
    fn test_indices_rebased_per_section() {
        let batch = batch_of(3, LinearColor::WHITE);
        let merged = batch.merge(RenderMode::ScreenSpaceOverlay);
        for section in batch.sections() {
            let start = section.index_start as usize;
            let rebuilt: Vec<u32> = merged.indices()[start..start + section.mesh.index_count()]
                .iter()
                .map(|i| i - section.vertex_start)
                .collect();
            assert_eq!(rebuilt, section.mesh.indices());
        }
        assert_eq!(&merged.indices()[12..], &[8, 10, 9, 10, 8, 11]);
    }

    #[test]
    fn test_index_remainder_loop() {
        let mut mesh = VertexBuffer::new();
        for _ in 0..3 {
            mesh.add_vertex(Vec3::zeros(), [255; 4], [0.0, 0.0]);
        }
        mesh.add_triangle(0, 1, 2);
        mesh.add_triangle(2, 1, 0);
        mesh.add_index(1);
        let mut keys: SlotMap<HandleKey, ()> = SlotMap::with_key();
        let mut batch = BatchBuffer::new();
        batch.push(BatchSection {
            handle: keys.insert(()),
            mesh: Arc::new(mesh),
            transform: Transform::identity(),
            color: LinearColor::WHITE,
            inherited_alpha: 1.0,
            vertex_start: 5,
            index_start: 0,
        });
        let mut merged = MergedBuffer::new(RenderMode::ScreenSpaceOverlay);
        merge_indices(batch.sections(), &mut merged.indices, 7);
        assert_eq!(merged.indices(), &[5, 6, 7, 7, 6, 5, 6]);
    }

    #[test]
    fn test_world_space_positions_bounds_and_screen_uv() {
        let mut batch = batch_of(1, LinearColor::WHITE);
        if let Some(section) = batch.section_mut(0) {
            section.transform = Transform::new(
                Vec3::new(5.0, 5.0, 0.0),
                Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_2),
                Vec3::new(2.0, 2.0, 1.0),
            );
        }
        let merged = batch.merge(RenderMode::WorldSpace);

        // (1, 0) scaled to (2, 0), rotated to (0, 2), moved to (5, 7)
        let p = merged.position_at(1).unwrap();
        assert_relative_eq!(p[0], 5.0, epsilon = 1e-5);
        assert_relative_eq!(p[1], 7.0, epsilon = 1e-5);

        let MergedVertices::World(vertices) = merged.vertices() else {
            panic!("expected world layout");
        };
        assert_relative_eq!(vertices[1].tex_coords[SCREEN_POSITION_UV][0], 5.0, epsilon = 1e-5);
        assert_relative_eq!(vertices[1].tex_coords[SCREEN_POSITION_UV][1], 7.0, epsilon = 1e-5);

        let bounds = merged.local_box();
        assert!(bounds.valid);
        assert_relative_eq!(bounds.min.x, 3.0, epsilon = 1e-5);
        assert_relative_eq!(bounds.max.y, 7.0, epsilon = 1e-5);
    }

    #[test]
    fn test_overlay_skips_bounds_free_tracks_them() {
        let batch = batch_of(2, LinearColor::WHITE);
        assert!(!batch.merge(RenderMode::ScreenSpaceOverlay).local_box().valid);
        assert!(batch.merge(RenderMode::ScreenSpaceFree).local_box().valid);
    }

    #[test]
    fn test_identity_tint_copies_colors_and_tint_blends() {
        let white = batch_of(1, LinearColor::WHITE).merge(RenderMode::ScreenSpaceOverlay);
        assert_eq!(white.color_at(0), Some([200, 100, 50, 255]));

        let tinted =
            batch_of(1, LinearColor::new(0.5, 1.0, 1.0, 0.5)).merge(RenderMode::WorldSpace);
        assert_eq!(tinted.color_at(0), Some([100, 100, 50, 127]));
    }

    #[test]
    fn test_recolor_matches_full_merge() {
        let mut batch = batch_of(2, LinearColor::WHITE);
        let mut patched = batch.merge(RenderMode::ScreenSpaceFree);

        let section = batch.section_mut(1).unwrap();
        section.color = LinearColor::new(0.3, 0.6, 0.9, 1.0);
        section.inherited_alpha = 0.37;
        let section = section.clone();
        assert!(patched.recolor_section(&section));

        let rebuilt = batch.merge(RenderMode::ScreenSpaceFree);
        assert_eq!(patched, rebuilt);
    }

    #[test]
    fn test_patches_reject_out_of_range() {
        let batch = batch_of(1, LinearColor::WHITE);
        let mut merged = batch.merge(RenderMode::ScreenSpaceOverlay);
        let before = merged.clone();
        let mut stray = batch.sections()[0].clone();
        stray.vertex_start = 2;
        assert!(!merged.recolor_section(&stray));
        assert!(!merged.rewrite_uv1(2..6, [1.0, 1.0]));
        assert_eq!(merged, before);
    }

    #[test]
    fn test_copy_from_and_reset_switch_layouts() {
        let batch = batch_of(1, LinearColor::WHITE);
        let world = batch.merge(RenderMode::WorldSpace);
        let mut container = MergedBuffer::new(RenderMode::ScreenSpaceOverlay);
        container.copy_from(&world);
        assert_eq!(container, world);

        batch.merge_into(RenderMode::ScreenSpaceOverlay, &mut container);
        assert!(matches!(container.vertices(), MergedVertices::Screen(_)));
        assert_eq!(container.render_mode(), RenderMode::ScreenSpaceOverlay);
    }
}
