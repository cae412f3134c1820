//! Per-widget vertex and index stream
//!
//! Widgets lay out their geometry into a [`VertexBuffer`], which is the unit
//! of input to batching. Indices are local to the buffer; merging rebases
//! them. Triangle winding is the caller's responsibility.

use super::color::Rgba8;
use super::vertex::UiVertex;
use crate::foundation::math::Vec3;

/// Mutable vertex/index stream owned by one widget
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexBuffer {
    vertices: Vec<UiVertex>,
    indices: Vec<u32>,
}

impl VertexBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for the given counts
    pub fn with_capacity(vertex_count: usize, index_count: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_count),
            indices: Vec::with_capacity(index_count),
        }
    }

    /// Reserve room for additional vertices and indices
    pub fn reserve(&mut self, vertex_count: usize, index_count: usize) {
        self.vertices.reserve(vertex_count);
        self.indices.reserve(index_count);
    }

    /// Append a vertex and return its index
    pub fn add_vertex(&mut self, position: Vec3, color: Rgba8, uv0: [f32; 2]) -> u32 {
        self.add_ui_vertex(UiVertex::new(position, color, uv0))
    }

    /// Append a vertex with a secondary UV and return its index
    pub fn add_vertex_with_uv1(
        &mut self,
        position: Vec3,
        color: Rgba8,
        uv0: [f32; 2],
        uv1: [f32; 2],
    ) -> u32 {
        let mut vertex = UiVertex::new(position, color, uv0);
        vertex.uvs[1] = uv1;
        self.add_ui_vertex(vertex)
    }

    /// Append a fully specified vertex and return its index
    pub fn add_ui_vertex(&mut self, vertex: UiVertex) -> u32 {
        let index = self.vertices.len() as u32;
        self.vertices.push(vertex);
        index
    }

    /// Append one triangle
    pub fn add_triangle(&mut self, i0: u32, i1: u32, i2: u32) {
        self.indices.extend_from_slice(&[i0, i1, i2]);
    }

    /// Append a raw index
    pub fn add_index(&mut self, index: u32) {
        self.indices.push(index);
    }

    /// Append four vertices and the two triangles covering them
    pub fn add_quad(&mut self, quad: [UiVertex; 4]) {
        let start = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&quad);
        self.add_triangle(start, start + 2, start + 1);
        self.add_triangle(start + 2, start, start + 3);
    }

    /// Drop all vertices and indices, keeping the allocations
    pub fn reset(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of indices
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Whether the buffer holds no vertices
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Take the contents of `other`, leaving it empty
    pub fn move_from(&mut self, other: &mut VertexBuffer) {
        self.vertices = std::mem::take(&mut other.vertices);
        self.indices = std::mem::take(&mut other.indices);
    }

    /// Set the secondary UV on every vertex
    pub fn update_all_uv1(&mut self, uv1: [f32; 2]) {
        for vertex in &mut self.vertices {
            vertex.uvs[1] = uv1;
        }
    }

    /// Vertex at `index`, if in range
    pub fn vertex(&self, index: usize) -> Option<&UiVertex> {
        self.vertices.get(index)
    }

    /// Replace the vertex at `index`; returns false when out of range
    pub fn set_vertex(&mut self, index: usize, vertex: UiVertex) -> bool {
        match self.vertices.get_mut(index) {
            Some(slot) => {
                *slot = vertex;
                true
            }
            None => false,
        }
    }

    /// All vertices
    pub fn vertices(&self) -> &[UiVertex] {
        &self.vertices
    }

    /// All indices
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
}
