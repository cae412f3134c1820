//! # Render Proxy Bridge
//!
//! Connects one canvas's merge passes to the objects that own GPU-facing
//! buffers. The bridge owns every [`MeshProxy`] of the canvas, a pool of
//! unused proxies and a pool of merged-buffer containers, so UI that
//! shows and hides elements often does not keep allocating.
//!
//! # Architecture
//!
//! ```text
//! BatchMergeEngine ── claims ──▶ RenderProxyBridge
//!                                  ├── proxies (SlotMap<ProxyKey, MeshProxy>)
//!                                  ├── unused proxies (Pool<ProxyKey>)
//!                                  └── mesh containers (Pool<MergedBuffer>)
//!                                          ↓
//!                              draw list + RenderUpdate packets
//! ```
//!
//! Everything here runs on the update side. The render side only sees
//! [`RenderUpdate`] packets, which carry `Arc`s to buffers that are never
//! edited again.

use std::sync::Arc;

use log::trace;

use super::mesh_proxy::{MeshProxy, ProxyMaterial, ProxyState};
use crate::config::BatchingConfig;
use crate::foundation::collections::{HandleKey, HandleMap, Pool, ProxyKey};
use crate::render::batching::{BatchDescriptor, BatchStats, MergedBuffer, ProxyDirectory};
use crate::render::types::{ExternalProxyId, MaterialId, RenderMode};
use crate::ui::handle::{PatchFlags, RenderableHandle};

/// One entry of the canvas draw list, in paint order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawEntry {
    /// Batch rendered by a pooled proxy
    Pooled(ProxyKey),
    /// Batch rendered by a host-supplied proxy
    External(ExternalProxyId),
}

/// Published proxy data for the render side
#[derive(Debug, Clone)]
pub struct RenderUpdate {
    /// Proxy that changed
    pub proxy: ProxyKey,
    /// Merged buffer to upload
    pub buffer: Arc<MergedBuffer>,
    /// Material and clip state
    pub material: ProxyMaterial,
    /// Render mode the buffer was laid out for
    pub render_mode: RenderMode,
    /// Draw instruction range
    pub instructions: (u32, u32),
}

/// Proxy arena and pools of one canvas
#[derive(Debug)]
pub struct RenderProxyBridge {
    proxies: HandleMap<ProxyKey, MeshProxy>,
    unused_proxies: Pool<ProxyKey>,
    mesh_containers: Pool<MergedBuffer>,
    draw_list: Vec<DrawEntry>,
}

impl Default for RenderProxyBridge {
    fn default() -> Self {
        Self::new(&BatchingConfig::default())
    }
}

impl RenderProxyBridge {
    /// Create a bridge with pools prewarmed per `config`
    pub fn new(config: &BatchingConfig) -> Self {
        let mut proxies = HandleMap::with_capacity_and_key(config.prewarm_proxies);
        let unused_proxies =
            Pool::prewarmed(config.prewarm_proxies, || proxies.insert(MeshProxy::new()));
        Self {
            proxies,
            unused_proxies,
            mesh_containers: Pool::prewarmed(config.prewarm_mesh_containers, MergedBuffer::default),
            draw_list: Vec::with_capacity(config.descriptor_capacity),
        }
    }

    /// Proxy by key
    pub fn proxy(&self, key: ProxyKey) -> Option<&MeshProxy> {
        self.proxies.get(key)
    }

    /// All proxies, bound or not
    pub fn proxies(&self) -> impl Iterator<Item = (ProxyKey, &MeshProxy)> {
        self.proxies.iter()
    }

    /// Batches of the last pass in paint order
    pub fn draw_list(&self) -> &[DrawEntry] {
        &self.draw_list
    }

    /// Proxies waiting in the pool
    pub fn unused_proxy_count(&self) -> usize {
        self.unused_proxies.len()
    }

    /// Merged-buffer containers waiting in the pool
    pub fn mesh_container_count(&self) -> usize {
        self.mesh_containers.len()
    }

    /// Take a proxy from the pool, creating one when it is empty
    pub fn acquire_unused_proxy(&mut self) -> ProxyKey {
        let proxies = &mut self.proxies;
        self.unused_proxies
            .acquire_or_else(|| proxies.insert(MeshProxy::new()))
    }

    /// Unbind a proxy and return it to the pool
    ///
    /// Returns false if the key is unknown or the proxy is already unbound.
    pub fn release_proxy(&mut self, key: ProxyKey) -> bool {
        let Some(proxy) = self.proxies.get_mut(key) else {
            return false;
        };
        if proxy.state() == ProxyState::Unbound {
            return false;
        }
        proxy.clear(&mut self.mesh_containers);
        self.unused_proxies.release(key);
        true
    }

    /// Take a merged-buffer container from the pool
    pub fn acquire_unused_mesh_container(&mut self) -> MergedBuffer {
        self.mesh_containers.acquire_or_else(MergedBuffer::default)
    }

    /// Return a merged-buffer container for reuse
    pub fn release_mesh_container(&mut self, container: MergedBuffer) {
        self.mesh_containers.release(container);
    }

    /// Forget which descriptor claimed each proxy
    pub fn begin_pass(&mut self) {
        for proxy in self.proxies.values_mut() {
            proxy.batch_index = None;
        }
    }

    /// Bind the descriptors of a finished merge pass to proxies
    ///
    /// Bound proxies no descriptor claimed are released first, so they can
    /// serve descriptors that still need a proxy.
    pub fn sync(
        &mut self,
        descriptors: &mut [BatchDescriptor],
        render_mode: RenderMode,
        stats: &mut BatchStats,
    ) {
        let unclaimed: Vec<ProxyKey> = self
            .proxies
            .iter()
            .filter(|(_, p)| p.state() != ProxyState::Unbound && p.batch_index().is_none())
            .map(|(key, _)| key)
            .collect();
        for key in unclaimed {
            if self.release_proxy(key) {
                stats.proxies_released += 1;
            }
        }

        self.draw_list.clear();
        for (index, descriptor) in descriptors.iter_mut().enumerate() {
            if let Some(external) = descriptor.external_proxy {
                self.draw_list.push(DrawEntry::External(external));
                continue;
            }

            let key = match descriptor.owner_proxy {
                Some(key) => key,
                None => {
                    let key = self.acquire_unused_proxy();
                    descriptor.owner_proxy = Some(key);
                    key
                }
            };
            let Some(proxy) = self.proxies.get_mut(key) else {
                continue;
            };

            proxy.batch_index = Some(index);
            proxy.set_render_mode(render_mode);
            let drift = proxy.setup_canvas(
                key,
                std::mem::take(&mut descriptor.proxy_info),
                std::mem::take(&mut descriptor.batch),
                descriptor.vertex_count,
                descriptor.index_count,
                (descriptor.min_instruction, descriptor.max_instruction),
            );
            let material = ProxyMaterial::from(&*descriptor);
            let refresh = drift || descriptor.dirty;
            if proxy.set_ui_material(material, refresh, &mut self.mesh_containers) {
                stats.proxies_rebuilt += 1;
            } else {
                stats.proxies_reused += 1;
            }
            self.draw_list.push(DrawEntry::Pooled(key));
        }
    }

    /// Queue a patch for `handle` on the proxy that renders it
    pub fn mark_handle_dirty(&mut self, proxy: ProxyKey, handle: HandleKey, flags: PatchFlags) {
        if let Some(proxy) = self.proxies.get_mut(proxy) {
            proxy.mark_handle_dirty(handle, flags);
        }
    }

    /// Apply queued patches on every dirty proxy
    pub fn update_dirty_handles(
        &mut self,
        handles: &HandleMap<HandleKey, RenderableHandle>,
        stats: &mut BatchStats,
    ) {
        for (key, proxy) in &mut self.proxies {
            if proxy.dirty_handles().is_empty() {
                continue;
            }
            trace!("Patching {} handles on proxy {key:?}", proxy.dirty_handles().len());
            proxy.update_dirty_handles(handles, &mut self.mesh_containers, stats);
        }
    }

    /// Drain render updates for proxies whose published data changed
    pub fn collect_render_updates(&mut self) -> Vec<RenderUpdate> {
        let mut updates = Vec::new();
        for (key, proxy) in &mut self.proxies {
            if !proxy.take_render_data_dirty() {
                continue;
            }
            let (Some(buffer), Some(material)) = (proxy.buffer(), proxy.material()) else {
                continue;
            };
            updates.push(RenderUpdate {
                proxy: key,
                buffer: Arc::clone(buffer),
                material: *material,
                render_mode: proxy.render_mode(),
                instructions: proxy.instruction_range(),
            });
        }
        updates
    }
}

impl ProxyDirectory for RenderProxyBridge {
    fn claimed_by(&self, proxy: ProxyKey) -> Option<usize> {
        self.proxies.get(proxy).and_then(MeshProxy::batch_index)
    }

    fn material_of(&self, proxy: ProxyKey) -> Option<MaterialId> {
        self.proxies
            .get(proxy)
            .filter(|p| p.state() != ProxyState::Unbound)
            .and_then(|p| p.material().map(|m| m.material))
    }

    fn claim(&mut self, proxy: ProxyKey, descriptor: usize) {
        if let Some(proxy) = self.proxies.get_mut(proxy) {
            proxy.batch_index = Some(descriptor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prewarmed_pools() {
        let config = BatchingConfig {
            prewarm_proxies: 3,
            prewarm_mesh_containers: 2,
            ..Default::default()
        };
        let bridge = RenderProxyBridge::new(&config);
        assert_eq!(bridge.unused_proxy_count(), 3);
        assert_eq!(bridge.mesh_container_count(), 2);
        assert_eq!(bridge.proxies().count(), 3);
    }

    #[test]
    fn test_acquire_reuses_pooled_proxy() {
        let mut bridge = RenderProxyBridge::default();
        let first = bridge.acquire_unused_proxy();
        assert_eq!(bridge.proxies().count(), 1);
        assert!(!bridge.release_proxy(first), "unbound proxies are not pooled twice");

        bridge.unused_proxies.release(first);
        assert_eq!(bridge.acquire_unused_proxy(), first);
        assert_eq!(bridge.unused_proxy_count(), 0);
    }

    #[test]
    fn test_unbound_proxy_has_no_material() {
        let mut bridge = RenderProxyBridge::default();
        let key = bridge.acquire_unused_proxy();
        assert_eq!(bridge.material_of(key), None);
        assert_eq!(bridge.claimed_by(key), None);
        bridge.claim(key, 4);
        assert_eq!(bridge.claimed_by(key), Some(4));
        bridge.begin_pass();
        assert_eq!(bridge.claimed_by(key), None);
    }

    #[test]
    fn test_mesh_container_round_trip() {
        let mut bridge = RenderProxyBridge::default();
        let container = bridge.acquire_unused_mesh_container();
        assert_eq!(container.vertex_count(), 0);
        bridge.release_mesh_container(container);
        assert_eq!(bridge.mesh_container_count(), 1);
    }
}
