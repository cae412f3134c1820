//! Canvas-level batching tests


use crate::foundation::collections::{HandleKey, ProxyKey};
use crate::foundation::logging;
use crate::foundation::math::{Rect, Transform, Vec3};
use crate::render::batching::MergedBuffer;
use crate::render::color::Rgba8;
use crate::render::proxy::MeshProxy;
use crate::render::types::MaterialId;
use crate::render::vertex::UiVertex;
use crate::render::vertex_buffer::VertexBuffer;
use crate::ui::canvas::Canvas;
use crate::ui::handle::Attachment;

/// 10x10 quad with 4 vertices and 6 indices
fn quad_mesh(color: Rgba8) -> VertexBuffer {
    let mut mesh = VertexBuffer::new();
    mesh.add_quad([
        UiVertex::new(Vec3::new(0.0, 0.0, 0.0), color, [0.0, 0.0]),
        UiVertex::new(Vec3::new(10.0, 0.0, 0.0), color, [1.0, 0.0]),
        UiVertex::new(Vec3::new(10.0, 10.0, 0.0), color, [1.0, 1.0]),
        UiVertex::new(Vec3::new(0.0, 10.0, 0.0), color, [0.0, 1.0]),
    ]);
    mesh
}

fn attachment_at(x: f32, y: f32) -> Attachment {
    Attachment {
        renderer_to_world: Transform::from_position(Vec3::new(x, y, 0.0)),
        local_rect: Rect::new(0.0, 0.0, 10.0, 10.0),
    }
}

/// Append a quad handle placed at (`x`, `y`) with `material`
fn add_quad(canvas: &mut Canvas, x: f32, y: f32, material: u32) -> HandleKey {
    add_colored_quad(canvas, x, y, material, [255; 4])
}

fn add_colored_quad(canvas: &mut Canvas, x: f32, y: f32, material: u32, color: Rgba8) -> HandleKey {
    logging::init_for_tests();
    let key = canvas.create_handle();
    if let Some(mut handle) = canvas.handle_mut(key) {
        handle.fill_mesh(&mut quad_mesh(color));
        handle.set_material(Some(MaterialId(material)));
        handle.set_attachment(Some(attachment_at(x, y)));
    }
    key
}

fn bound_proxy(canvas: &Canvas, key: HandleKey) -> ProxyKey {
    canvas
        .handle(key)
        .and_then(|h| h.binding())
        .map(|b| b.proxy)
        .expect("handle should be bound after update")
}

fn proxy(canvas: &Canvas, key: ProxyKey) -> &MeshProxy {
    canvas.bridge().proxy(key).expect("proxy exists")
}

fn published(canvas: &Canvas, key: ProxyKey) -> &MergedBuffer {
    proxy(canvas, key).buffer().expect("proxy has a published buffer")
}
