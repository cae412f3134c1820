//! Vertex layouts for UI geometry
//!
//! [`UiVertex`] is what widgets fill in. Merging writes one of two packed
//! output layouts through the [`VertexWriter`] trait: [`ScreenVertex`] for
//! screen-space canvases and [`WorldVertex`] for world-space canvases.

use bytemuck::{Pod, Zeroable};

use super::color::Rgba8;
use crate::foundation::math::{Transform, Vec3};

/// Number of texture coordinate channels on input and world-space vertices
pub const UV_CHANNELS: usize = 8;

/// UV channel that world-space vertices use for the canvas-space XY position
pub const SCREEN_POSITION_UV: usize = 3;

/// Default normal for flat UI geometry
pub const DEFAULT_NORMAL: [f32; 3] = [0.0, 0.0, -1.0];

/// Default tangent for flat UI geometry
pub const DEFAULT_TANGENT: [f32; 3] = [1.0, 0.0, 0.0];

/// Per-widget input vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UiVertex {
    /// Position in the widget's local space
    pub position: [f32; 3],
    /// Untinted vertex color
    pub color: Rgba8,
    /// Texture coordinates; channel 3 is overwritten on world-space output
    pub uvs: [[f32; 2]; UV_CHANNELS],
    /// Surface normal
    pub normal: [f32; 3],
    /// Surface tangent
    pub tangent: [f32; 3],
}

impl Default for UiVertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            color: [255; 4],
            uvs: [[0.0; 2]; UV_CHANNELS],
            normal: DEFAULT_NORMAL,
            tangent: DEFAULT_TANGENT,
        }
    }
}

impl UiVertex {
    /// Vertex with position, color and primary UV
    pub fn new(position: Vec3, color: Rgba8, uv0: [f32; 2]) -> Self {
        let mut uvs = [[0.0; 2]; UV_CHANNELS];
        uvs[0] = uv0;
        Self {
            position: position.into(),
            color,
            uvs,
            ..Default::default()
        }
    }

    /// Secondary texture coordinates
    pub fn uv1(&self) -> [f32; 2] {
        self.uvs[1]
    }
}

/// Compact vertex consumed by the screen-space UI pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct ScreenVertex {
    /// Canvas-space position
    pub position: [f32; 3],
    /// Tinted color
    pub color: Rgba8,
    /// Primary texture coordinates
    pub uv0: [f32; 2],
    /// Secondary texture coordinates
    pub uv1: [f32; 2],
}

/// Full dynamic-mesh vertex for world-space canvases
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct WorldVertex {
    /// Canvas-space position
    pub position: [f32; 3],
    /// Tangent, w unused
    pub tangent_x: [f32; 4],
    /// Normal, w holds the binormal sign
    pub tangent_z: [f32; 4],
    /// Tinted color
    pub color: Rgba8,
    /// Texture coordinates
    pub tex_coords: [[f32; 2]; UV_CHANNELS],
}

/// Output-layout strategy for the merge loop
pub trait VertexWriter: Pod + Default {
    /// Copy everything except position and color from the source vertex
    fn write_attributes(&mut self, source: &UiVertex, transform: &Transform);

    /// Store the transformed position
    fn write_position(&mut self, position: &Vec3);

    /// Store the tinted color
    fn write_color(&mut self, color: Rgba8);

    /// Layout-specific extra channel derived from the transformed position
    fn write_extra_uv(&mut self, position: &Vec3);

    /// Overwrite the secondary UV channel
    fn write_uv1(&mut self, uv: [f32; 2]);

    /// Stored color
    fn color(&self) -> Rgba8;

    /// Stored position
    fn position(&self) -> [f32; 3];

    /// Stored secondary UV
    fn uv1(&self) -> [f32; 2];
}

impl VertexWriter for ScreenVertex {
    fn write_attributes(&mut self, source: &UiVertex, _transform: &Transform) {
        self.uv0 = source.uvs[0];
        self.uv1 = source.uvs[1];
    }

    fn write_position(&mut self, position: &Vec3) {
        self.position = (*position).into();
    }

    fn write_color(&mut self, color: Rgba8) {
        self.color = color;
    }

    fn write_extra_uv(&mut self, _position: &Vec3) {}

    fn write_uv1(&mut self, uv: [f32; 2]) {
        self.uv1 = uv;
    }

    fn color(&self) -> Rgba8 {
        self.color
    }

    fn position(&self) -> [f32; 3] {
        self.position
    }

    fn uv1(&self) -> [f32; 2] {
        self.uv1
    }
}

impl VertexWriter for WorldVertex {
    fn write_attributes(&mut self, source: &UiVertex, transform: &Transform) {
        let tangent = transform.rotate_vector(&Vec3::from(source.tangent));
        let normal = transform.rotate_vector(&Vec3::from(source.normal));
        self.tangent_x = [tangent.x, tangent.y, tangent.z, 0.0];
        self.tangent_z = [normal.x, normal.y, normal.z, 1.0];
        self.tex_coords = source.uvs;
    }

    fn write_position(&mut self, position: &Vec3) {
        self.position = (*position).into();
    }

    fn write_color(&mut self, color: Rgba8) {
        self.color = color;
    }

    fn write_extra_uv(&mut self, position: &Vec3) {
        self.tex_coords[SCREEN_POSITION_UV] = [position.x, position.y];
    }

    fn write_uv1(&mut self, uv: [f32; 2]) {
        self.tex_coords[1] = uv;
    }

    fn color(&self) -> Rgba8 {
        self.color
    }

    fn position(&self) -> [f32; 3] {
        self.position
    }

    fn uv1(&self) -> [f32; 2] {
        self.tex_coords[1]
    }
}
