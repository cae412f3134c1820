//! UI-side state: renderable handles and the canvas that batches them

pub mod canvas;
pub mod handle;

#[cfg(test)]
mod tests;

pub use canvas::{Canvas, DrawItem, HandleMut};
pub use handle::{Attachment, PatchFlags, ProxyBinding, RenderableHandle, RendererFlags};
