//! # UGUI Batch
//!
//! Mesh batching and render-proxy synchronization for retained-mode UI.
//!
//! ## Features
//!
//! - **Greedy Batch Merging**: Paint-order aware merge with overlap blocking
//! - **Two Vertex Layouts**: Compact screen-space and tangent-frame world-space
//! - **Pooled Render Proxies**: Proxies and buffers are recycled across passes
//! - **Incremental Patches**: Color and UV1 changes skip the full merge
//! - **Copy-on-Write Publishing**: Render-side readers never see a half-written buffer
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ugui_batch::prelude::*;
//!
//! let mut canvas = Canvas::new(BatchingConfig::default());
//! let key = canvas.create_handle();
//!
//! let mut mesh = VertexBuffer::new();
//! mesh.add_vertex(Vec3::new(0.0, 0.0, 0.0), [255; 4], [0.0, 0.0]);
//! mesh.add_vertex(Vec3::new(0.0, 10.0, 0.0), [255; 4], [0.0, 1.0]);
//! mesh.add_vertex(Vec3::new(10.0, 10.0, 0.0), [255; 4], [1.0, 1.0]);
//! mesh.add_triangle(0, 1, 2);
//!
//! if let Some(mut handle) = canvas.handle_mut(key) {
//!     handle.fill_mesh(&mut mesh);
//!     handle.set_attachment(Some(Attachment {
//!         renderer_to_world: Transform::identity(),
//!         local_rect: Rect::new(0.0, 0.0, 10.0, 10.0),
//!     }));
//! }
//!
//! let stats = canvas.update();
//! for update in canvas.collect_render_updates() {
//!     let _bytes = update.buffer.vertex_bytes();
//! }
//! println!("{} batches", stats.descriptors);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod ui;

/// Common imports for crate users
pub mod prelude {
    pub use crate::{
        config::{BatchingConfig, Config, ConfigError, DefaultMaterials},
        foundation::{
            collections::{HandleKey, ProxyKey},
            math::{Rect, Transform, Vec3},
        },
        render::{
            batching::BatchStats,
            proxy::{DrawEntry, RenderUpdate},
            ExternalProxyId, GraphicType, LinearColor, MaterialId, MergedBuffer, RenderMode,
            TextureId, VertexBuffer,
        },
        ui::{
            canvas::{Canvas, DrawItem, HandleMut},
            handle::{Attachment, RenderableHandle},
        },
    };
}
