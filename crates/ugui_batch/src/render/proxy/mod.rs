//! Render proxies and the bridge that binds batches to them

pub mod bridge;
pub mod mesh_proxy;
pub mod proxy_info;

pub use bridge::{DrawEntry, RenderProxyBridge, RenderUpdate};
pub use mesh_proxy::{MeshProxy, ProxyMaterial, ProxyState};
pub use proxy_info::ProxyInfo;
