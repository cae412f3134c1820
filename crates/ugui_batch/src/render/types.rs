//! Opaque resource ids and render enums shared across the batching layers

use serde::{Deserialize, Serialize};

/// Opaque material reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialId(pub u32);

/// Opaque texture reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextureId(pub u32);

/// Reference to a render proxy supplied by the host instead of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExternalProxyId(pub u64);

/// Render path a handle's geometry goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GraphicType {
    /// Plain UI mesh; the only type that merges with others
    #[default]
    Mesh,
    /// Glyph quads
    Text,
    /// Background blur effect
    PostProcessBlur,
    /// Glitch effect
    PostProcessGlitch,
    /// Particle or other effect geometry
    Fx,
    /// Static mesh drawn inside the canvas
    StaticMesh,
}

/// How a canvas is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RenderMode {
    /// Drawn over the viewport, no culling
    #[default]
    ScreenSpaceOverlay,
    /// Screen space but culled against bounds
    ScreenSpaceFree,
    /// Placed in the world like any other primitive
    WorldSpace,
}

impl RenderMode {
    /// Whether merged vertices use the world-space layout
    pub fn is_world_space(self) -> bool {
        matches!(self, Self::WorldSpace)
    }

    /// Whether a local bounding box must be accumulated during a merge
    pub fn tracks_bounds(self) -> bool {
        !matches!(self, Self::ScreenSpaceOverlay)
    }
}
