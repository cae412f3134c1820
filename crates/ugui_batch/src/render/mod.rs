//! Rendering data: vertex streams, batching and render proxies
//!
//! The merge pipeline runs bottom-up through these modules:
//!
//! ```text
//! VertexBuffer (per widget)
//!         ↓
//! BatchMergeEngine  → BatchDescriptor list
//!         ↓
//! BatchBuffer::merge → MergedBuffer (screen or world layout)
//!         ↓
//! RenderProxyBridge → MeshProxy → RenderUpdate packets
//! ```

pub mod batching;
pub mod color;
pub mod proxy;
pub mod types;
pub mod vertex;
pub mod vertex_buffer;

pub use batching::{BatchBuffer, BatchDescriptor, BatchMergeEngine, BatchSection, MergedBuffer};
pub use color::{LinearColor, Rgba8};
pub use proxy::{MeshProxy, ProxyInfo, ProxyState, RenderProxyBridge, RenderUpdate};
pub use types::{ExternalProxyId, GraphicType, MaterialId, RenderMode, TextureId};
pub use vertex::{ScreenVertex, UiVertex, VertexWriter, WorldVertex};
pub use vertex_buffer::VertexBuffer;
