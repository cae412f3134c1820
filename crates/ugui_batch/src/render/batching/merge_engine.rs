//! # Batch Merge Engine
//!
//! Greedy assignment of handles, in paint order, to batch descriptors.
//!
//! For each handle the engine scans the existing descriptors newest first.
//! The first compatible descriptor takes the handle. An incompatible
//! descriptor whose bounds overlap the handle stops the scan, since merging
//! past it would draw the handle underneath geometry painted before it.
//! A handle in a later paint section than the newest descriptor never
//! scans at all.
//!
//! While assigning, the engine also decides which pooled proxy each
//! descriptor reuses and which descriptors must rebuild their buffers.
//! When unsure it marks the descriptor dirty; that only costs a rebuild.

use std::sync::Arc;

use log::{trace, warn};

use super::batch_buffer::BatchSection;
use super::descriptor::BatchDescriptor;
use crate::config::{BatchingConfig, DefaultMaterials};
use crate::foundation::collections::{HandleKey, ProxyKey};
use crate::foundation::math::{Box2, Transform};
use crate::render::proxy::ProxyInfo;
use crate::render::types::MaterialId;
use crate::ui::handle::RenderableHandle;

/// Proxy bookkeeping the engine needs during a pass
pub trait ProxyDirectory {
    /// Descriptor index that claimed `proxy` this pass
    fn claimed_by(&self, proxy: ProxyKey) -> Option<usize>;

    /// Material `proxy` was last set up with; `None` for unbound proxies
    fn material_of(&self, proxy: ProxyKey) -> Option<MaterialId>;

    /// Record that `descriptor` adopts `proxy`
    fn claim(&mut self, proxy: ProxyKey, descriptor: usize);
}

/// Where a handle landed in the current pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Descriptor index
    pub descriptor: usize,
    /// Section index inside the descriptor
    pub section: usize,
}

/// Builds the descriptor list for one canvas pass
#[derive(Debug)]
pub struct BatchMergeEngine {
    descriptors: Vec<BatchDescriptor>,
    default_materials: DefaultMaterials,
    use_layer_mask: bool,
    capacity: usize,
}

impl BatchMergeEngine {
    /// Create an engine from batching settings
    pub fn new(config: &BatchingConfig) -> Self {
        Self {
            descriptors: Vec::with_capacity(config.descriptor_capacity),
            default_materials: config.default_materials,
            use_layer_mask: config.use_layer_mask,
            capacity: config.descriptor_capacity,
        }
    }

    /// Drop the previous pass's descriptors
    pub fn begin_pass(&mut self) {
        self.descriptors.clear();
    }

    /// Descriptors built so far, in paint order
    pub fn descriptors(&self) -> &[BatchDescriptor] {
        &self.descriptors
    }

    /// Mutable access for proxy synchronization
    pub fn descriptors_mut(&mut self) -> &mut [BatchDescriptor] {
        &mut self.descriptors
    }

    /// Resolve the material a descriptor opened by `handle` renders with
    pub fn base_material(&self, handle: &RenderableHandle) -> MaterialId {
        handle.material().unwrap_or_else(|| {
            self.default_materials
                .resolve(handle.is_anti_aliasing(), handle.is_text())
        })
    }

    /// Assign `handle` to a descriptor
    ///
    /// Returns `None` when the handle is skipped: it has no scene attachment,
    /// or it asks for a custom proxy without supplying one.
    pub fn merge(
        &mut self,
        key: HandleKey,
        handle: &RenderableHandle,
        instruction: u32,
        section: u32,
        world_to_canvas: &Transform,
        proxies: &mut impl ProxyDirectory,
    ) -> Option<Placement> {
        let Some(attachment) = handle.attachment() else {
            trace!("Skipping detached handle {key:?}");
            return None;
        };

        let to_canvas = world_to_canvas.combine(&attachment.renderer_to_world);
        let corners = attachment.local_rect.corners().map(|c| to_canvas.transform_point(&c));
        let bounds = Box2::from_points(&corners);

        let target = self.find_target(handle, section, &bounds);
        match target {
            Some(index) => Some(self.append(
                index,
                key,
                handle,
                to_canvas,
                bounds,
                instruction,
                proxies,
            )),
            None => self.open(key, handle, to_canvas, bounds, instruction, section, proxies),
        }
    }

    fn find_target(&self, handle: &RenderableHandle, section: u32, bounds: &Box2) -> Option<usize> {
        let last = self.descriptors.last()?;
        if section > last.section {
            return None;
        }

        for (index, descriptor) in self.descriptors.iter().enumerate().rev() {
            if descriptor.can_merge(handle, section, self.use_layer_mask) {
                return Some(index);
            }
            if descriptor.intersects(bounds) {
                return None;
            }
        }
        None
    }

    fn append(
        &mut self,
        index: usize,
        key: HandleKey,
        handle: &RenderableHandle,
        to_canvas: Transform,
        bounds: Box2,
        instruction: u32,
        proxies: &mut impl ProxyDirectory,
    ) -> Placement {
        let section_index = self.descriptors[index].batch.len();
        let owner = self.descriptors[index].owner_proxy;

        match handle.binding() {
            Some(previous) if Some(previous.proxy) != owner => {
                let claimed = proxies.claimed_by(previous.proxy);
                if let Some(other) = claimed {
                    self.descriptors[other].dirty = true;
                }

                let descriptor = &mut self.descriptors[index];
                if owner.is_some() {
                    descriptor.dirty = true;
                } else if claimed.is_none()
                    && proxies.material_of(previous.proxy) == Some(descriptor.base_material)
                {
                    descriptor.owner_proxy = Some(previous.proxy);
                    proxies.claim(previous.proxy, index);
                    trace!("Descriptor {index} adopts proxy {:?}", previous.proxy);
                }
            }
            Some(previous) => {
                if previous.section != section_index {
                    self.descriptors[index].dirty = true;
                }
            }
            None => {
                if owner.is_some() {
                    self.descriptors[index].dirty = true;
                }
            }
        }

        let descriptor = &mut self.descriptors[index];
        descriptor.dirty |= handle.needs_refresh();
        descriptor.bounds.push(bounds);
        descriptor.include_instruction(instruction);
        push_section(descriptor, key, handle, to_canvas);

        trace!("Merged handle {key:?} into descriptor {index} at section {section_index}");
        Placement {
            descriptor: index,
            section: section_index,
        }
    }

    fn open(
        &mut self,
        key: HandleKey,
        handle: &RenderableHandle,
        to_canvas: Transform,
        bounds: Box2,
        instruction: u32,
        section: u32,
        proxies: &mut impl ProxyDirectory,
    ) -> Option<Placement> {
        let index = self.descriptors.len();
        let mut descriptor = BatchDescriptor::from_handle(
            handle,
            section,
            self.base_material(handle),
            self.capacity,
        );
        descriptor.bounds.push(bounds);
        descriptor.include_instruction(instruction);
        descriptor.dirty = handle.needs_refresh();

        if handle.uses_custom_proxy() {
            let Some(external) = handle.custom_proxy() else {
                warn!("Handle {key:?} uses a custom proxy but has none set; skipping");
                return None;
            };
            descriptor.external_proxy = Some(external);
            descriptor.dirty = true;
            self.descriptors.push(descriptor);
            return Some(Placement {
                descriptor: index,
                section: 0,
            });
        }

        if let Some(previous) = handle.binding() {
            if let Some(other) = proxies.claimed_by(previous.proxy) {
                self.descriptors[other].dirty = true;
            } else if proxies.material_of(previous.proxy) == Some(descriptor.base_material) {
                descriptor.owner_proxy = Some(previous.proxy);
                descriptor.dirty |= previous.section != 0;
            }
        }

        descriptor.proxy_info = ProxyInfo::with_capacity(self.capacity);
        push_section(&mut descriptor, key, handle, to_canvas);

        match descriptor.owner_proxy {
            Some(proxy) => proxies.claim(proxy, index),
            None => descriptor.dirty = true,
        }

        trace!("Opened descriptor {index} for handle {key:?} in section {section}");
        self.descriptors.push(descriptor);
        Some(Placement {
            descriptor: index,
            section: 0,
        })
    }
}

fn push_section(
    descriptor: &mut BatchDescriptor,
    key: HandleKey,
    handle: &RenderableHandle,
    to_canvas: Transform,
) {
    let mesh = Arc::clone(handle.mesh());
    let (vertices, indices) = (mesh.vertex_count() as u32, mesh.index_count() as u32);

    descriptor.proxy_info.insert(key, descriptor.batch.len());
    descriptor.batch.push(BatchSection {
        handle: key,
        mesh,
        transform: to_canvas,
        color: handle.color(),
        inherited_alpha: handle.inherited_alpha(),
        vertex_start: descriptor.vertex_count,
        index_start: descriptor.index_count,
    });
    descriptor.vertex_count += vertices;
    descriptor.index_count += indices;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Rect, Vec3};
    use crate::render::vertex::UiVertex;
    use crate::render::vertex_buffer::VertexBuffer;
    use crate::ui::handle::{Attachment, ProxyBinding};
    use slotmap::SlotMap;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Directory {
        materials: HashMap<ProxyKey, MaterialId>,
        claims: HashMap<ProxyKey, usize>,
    }

    impl ProxyDirectory for Directory {
        fn claimed_by(&self, proxy: ProxyKey) -> Option<usize> {
            self.claims.get(&proxy).copied()
        }

        fn material_of(&self, proxy: ProxyKey) -> Option<MaterialId> {
            self.materials.get(&proxy).copied()
        }

        fn claim(&mut self, proxy: ProxyKey, descriptor: usize) {
            self.claims.insert(proxy, descriptor);
        }
    }

    fn quad_handle(x: f32, material: u32) -> RenderableHandle {
        let mut mesh = VertexBuffer::new();
        mesh.add_quad([
            UiVertex::new(Vec3::new(0.0, 0.0, 0.0), [255; 4], [0.0, 0.0]),
            UiVertex::new(Vec3::new(10.0, 0.0, 0.0), [255; 4], [1.0, 0.0]),
            UiVertex::new(Vec3::new(10.0, 10.0, 0.0), [255; 4], [1.0, 1.0]),
            UiVertex::new(Vec3::new(0.0, 10.0, 0.0), [255; 4], [0.0, 1.0]),
        ]);
        let mut handle = RenderableHandle::new();
        handle.fill_mesh(&mut mesh);
        handle.set_material(Some(MaterialId(material)));
        handle.set_attachment(Some(Attachment {
            renderer_to_world: Transform::from_position(Vec3::new(x, 0.0, 0.0)),
            local_rect: Rect::new(0.0, 0.0, 10.0, 10.0),
        }));
        handle
    }

    struct Fixture {
        engine: BatchMergeEngine,
        keys: SlotMap<HandleKey, ()>,
        directory: Directory,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                engine: BatchMergeEngine::new(&BatchingConfig::default()),
                keys: SlotMap::with_key(),
                directory: Directory::default(),
            }
        }

        fn merge(
            &mut self,
            handle: &RenderableHandle,
            instruction: u32,
            section: u32,
        ) -> Option<Placement> {
            let key = self.keys.insert(());
            self.engine
                .merge(
                    key,
                    handle,
                    instruction,
                    section,
                    &Transform::identity(),
                    &mut self.directory,
                )
        }
    }

    #[test]
    fn test_compatible_disjoint_handles_share_one_descriptor() {
        let mut fixture = Fixture::new();
        for i in 0..3 {
            let placement = fixture.merge(&quad_handle(i as f32 * 20.0, 1), i, 0).unwrap();
            assert_eq!(placement, Placement { descriptor: 0, section: i as usize });
        }

        let descriptors = fixture.engine.descriptors();
        assert_eq!(descriptors.len(), 1);
        let descriptor = &descriptors[0];
        assert_eq!(descriptor.vertex_count, 12);
        assert_eq!(descriptor.index_count, 18);
        assert_eq!(descriptor.bounds.len(), 3);
        assert_eq!((descriptor.min_instruction, descriptor.max_instruction), (0, 2));
        let starts: Vec<u32> = descriptor.batch.sections().iter().map(|s| s.vertex_start).collect();
        assert_eq!(starts, vec![0, 4, 8]);
        assert!(descriptor.dirty, "no proxy yet");
    }

    #[test]
    fn test_intersecting_incompatible_descriptor_blocks_merge() {
        let mut fixture = Fixture::new();
        fixture.merge(&quad_handle(0.0, 1), 0, 0);
        fixture.merge(&quad_handle(5.0, 2), 1, 0);
        let placement = fixture.merge(&quad_handle(8.0, 1), 2, 0).unwrap();
        assert_eq!(placement.descriptor, 2);
        assert_eq!(fixture.engine.descriptors().len(), 3);
    }

    #[test]
    fn test_disjoint_incompatible_descriptor_is_skipped_over() {
        let mut fixture = Fixture::new();
        fixture.merge(&quad_handle(0.0, 1), 0, 0);
        fixture.merge(&quad_handle(100.0, 2), 1, 0);
        let placement = fixture.merge(&quad_handle(20.0, 1), 2, 0).unwrap();
        assert_eq!(placement, Placement { descriptor: 0, section: 1 });
    }

    #[test]
    fn test_later_section_opens_new_descriptor() {
        let mut fixture = Fixture::new();
        fixture.merge(&quad_handle(0.0, 1), 0, 1);
        let placement = fixture.merge(&quad_handle(50.0, 1), 1, 2).unwrap();
        assert_eq!(placement.descriptor, 1);
        assert_eq!(fixture.engine.descriptors()[1].section, 2);
    }

    #[test]
    fn test_detached_handle_skipped() {
        let mut fixture = Fixture::new();
        let mut handle = quad_handle(0.0, 1);
        handle.set_attachment(None);
        assert!(fixture.merge(&handle, 0, 0).is_none());
        assert!(fixture.engine.descriptors().is_empty());
    }

    #[test]
    fn test_missing_material_resolves_default() {
        let mut fixture = Fixture::new();
        let mut handle = quad_handle(0.0, 1);
        handle.set_material(None);
        handle.set_text_element(true);
        fixture.merge(&handle, 0, 0);
        let defaults = BatchingConfig::default().default_materials;
        assert_eq!(fixture.engine.descriptors()[0].base_material, defaults.text);
    }

    #[test]
    fn test_custom_proxy_handles_get_external_descriptors() {
        use crate::render::types::ExternalProxyId;

        let mut fixture = Fixture::new();
        let mut handle = quad_handle(0.0, 1);
        handle.set_use_custom_proxy(true);
        assert!(fixture.merge(&handle, 0, 0).is_none(), "no proxy supplied");

        handle.set_custom_proxy(Some(ExternalProxyId(9)));
        fixture.merge(&handle, 1, 0);
        fixture.merge(&handle, 2, 0);
        let descriptors = fixture.engine.descriptors();
        assert_eq!(descriptors.len(), 2);
        assert!(descriptors.iter().all(|d| d.is_external() && d.dirty && d.batch.is_empty()));
        assert_eq!(descriptors[0].external_proxy, Some(ExternalProxyId(9)));
    }

    #[test]
    fn test_previous_proxy_adopted_when_material_matches() {
        let mut fixture = Fixture::new();
        let mut proxies: SlotMap<ProxyKey, ()> = SlotMap::with_key();
        let proxy = proxies.insert(());
        fixture.directory.materials.insert(proxy, MaterialId(1));

        let mut handle = quad_handle(0.0, 1);
        handle.set_binding(Some(ProxyBinding { proxy, section: 0 }));
        handle.clear_refresh();
        fixture.merge(&handle, 0, 0);

        let descriptor = &fixture.engine.descriptors()[0];
        assert_eq!(descriptor.owner_proxy, Some(proxy));
        assert!(!descriptor.dirty);
        assert_eq!(fixture.directory.claimed_by(proxy), Some(0));
    }

    #[test]
    fn test_moving_between_proxies_dirties_both() {
        let mut fixture = Fixture::new();
        let mut proxies: SlotMap<ProxyKey, ()> = SlotMap::with_key();
        let (a, b) = (proxies.insert(()), proxies.insert(()));
        fixture.directory.materials.insert(a, MaterialId(1));
        fixture.directory.materials.insert(b, MaterialId(2));

        let mut first = quad_handle(0.0, 1);
        first.set_binding(Some(ProxyBinding { proxy: a, section: 0 }));
        first.clear_refresh();
        let mut second = quad_handle(50.0, 2);
        second.set_binding(Some(ProxyBinding { proxy: b, section: 0 }));
        second.clear_refresh();
        fixture.merge(&first, 0, 0);
        fixture.merge(&second, 1, 0);
        assert_eq!(fixture.engine.descriptors()[0].owner_proxy, Some(a));
        assert_eq!(fixture.engine.descriptors()[1].owner_proxy, Some(b));
        fixture.engine.descriptors_mut()[0].dirty = false;
        fixture.engine.descriptors_mut()[1].dirty = false;

        // Was served by `b`, now joins the descriptor that owns `a`
        let mut mover = quad_handle(100.0, 1);
        mover.set_binding(Some(ProxyBinding { proxy: b, section: 1 }));
        mover.clear_refresh();
        fixture.merge(&mover, 2, 0);

        let descriptors = fixture.engine.descriptors();
        assert!(descriptors[0].dirty);
        assert!(descriptors[1].dirty);
    }
}
