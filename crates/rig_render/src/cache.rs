//! Per-entity render cache.
//!
//! Holds, for every entity the renderer has drawn, the device objects built
//! for it: one pipeline per [`CacheSlot`], the uploaded primitive, the image
//! sources created from its material, and the subscriptions that report
//! changes to any of those back to the renderer.
//!
//! Nothing here talks to the device directly. Handles that fall out of the
//! cache are queued and handed back through [`PipelineCache::drain_released`]
//! so the renderer can release them on the device.

use rig_core::{PipelineHandle, PrimitiveHandle};
use rig_scene::{EntityKey, ImageSource, Scene, SourceType, Subscription};
use slotmap::SecondaryMap;
use smallvec::SmallVec;

use crate::pass::CacheSlot;

/// A device object no longer referenced by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    Pipeline(PipelineHandle),
    Primitive(PrimitiveHandle),
}

#[derive(Debug)]
struct CachedSource {
    source: ImageSource,
    _subscriptions: SmallVec<[Subscription; 2]>,
}

#[derive(Debug, Default)]
struct EntityRenderCache {
    pipelines: [Option<PipelineHandle>; CacheSlot::COUNT],
    primitive: Option<PrimitiveHandle>,
    sources: [Option<CachedSource>; 3],
    geometry_subscription: Option<Subscription>,
}

impl EntityRenderCache {
    fn is_empty(&self) -> bool {
        self.pipelines.iter().all(Option::is_none)
            && self.primitive.is_none()
            && self.sources.iter().all(Option::is_none)
            && self.geometry_subscription.is_none()
    }
}

/// Pipeline, primitive and image-source cache keyed by entity.
///
/// Absence is a cache miss, never an error.
#[derive(Debug, Default)]
pub struct PipelineCache {
    entities: SecondaryMap<EntityKey, EntityRenderCache>,
    released: Vec<Released>,
}

impl PipelineCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Pipelines ────────────────────────────────────────────────────────────

    #[must_use]
    pub fn get_cached(&self, entity: EntityKey, slot: CacheSlot) -> Option<PipelineHandle> {
        self.entities
            .get(entity)
            .and_then(|cache| cache.pipelines[slot.index()])
    }

    /// Stores `pipeline` in `slot`, queueing any previous occupant for
    /// release.
    pub fn set_cached(&mut self, entity: EntityKey, slot: CacheSlot, pipeline: PipelineHandle) {
        let Some(cache) = self.entry(entity) else {
            return;
        };
        let previous = cache.pipelines[slot.index()].replace(pipeline);
        if let Some(old) = previous
            && old != pipeline
        {
            self.released.push(Released::Pipeline(old));
        }
    }

    // ── Primitive ────────────────────────────────────────────────────────────

    #[must_use]
    pub fn get_primitive(&self, entity: EntityKey) -> Option<PrimitiveHandle> {
        self.entities.get(entity).and_then(|cache| cache.primitive)
    }

    pub fn set_primitive(&mut self, entity: EntityKey, primitive: PrimitiveHandle) {
        let Some(cache) = self.entry(entity) else {
            return;
        };
        let previous = cache.primitive.replace(primitive);
        if let Some(old) = previous
            && old != primitive
        {
            self.released.push(Released::Primitive(old));
        }
    }

    // ── Image sources ────────────────────────────────────────────────────────

    #[must_use]
    pub fn image_source(&self, entity: EntityKey, role: SourceType) -> Option<&ImageSource> {
        self.entities
            .get(entity)
            .and_then(|cache| cache.sources[role.index()].as_ref())
            .map(|cached| &cached.source)
    }

    /// Caches `source` for `role` together with the subscriptions watching
    /// it. A previously cached source and its subscriptions are dropped
    /// first.
    pub fn set_image_source(
        &mut self,
        entity: EntityKey,
        role: SourceType,
        source: ImageSource,
        subscriptions: SmallVec<[Subscription; 2]>,
    ) {
        let Some(cache) = self.entry(entity) else {
            return;
        };
        cache.sources[role.index()] = None;
        cache.sources[role.index()] = Some(CachedSource {
            source,
            _subscriptions: subscriptions,
        });
    }

    /// Polls every cached image source, raising their ready and changed
    /// notifications.
    pub fn poll_image_sources(&mut self) {
        for (_, cache) in &mut self.entities {
            for cached in cache.sources.iter_mut().flatten() {
                cached.source.poll();
            }
        }
    }

    // ── Geometry ─────────────────────────────────────────────────────────────

    /// Replaces the subscription watching the entity's geometry. The old one
    /// is dropped before the new one is stored.
    pub fn watch_geometry(&mut self, entity: EntityKey, subscription: Subscription) {
        let Some(cache) = self.entry(entity) else {
            return;
        };
        cache.geometry_subscription = None;
        cache.geometry_subscription = Some(subscription);
    }

    #[must_use]
    pub fn is_watching_geometry(&self, entity: EntityKey) -> bool {
        self.entities
            .get(entity)
            .is_some_and(|cache| cache.geometry_subscription.is_some())
    }

    // ── Invalidation ─────────────────────────────────────────────────────────

    /// Drops every pipeline slot, the primitive, every image source and
    /// every subscription held for `entity`, as one step.
    pub fn invalidate_all(&mut self, entity: EntityKey) {
        let Some(cache) = self.entities.remove(entity) else {
            return;
        };
        log::trace!("Invalidating render cache of {entity:?}");
        self.release_entry(cache);
    }

    /// Drops only the pipeline slots; image sources and their subscriptions
    /// survive, so a ready notification cannot recreate itself.
    pub(crate) fn dirty_pipelines(&mut self, entity: EntityKey) {
        let Some(cache) = self.entities.get_mut(entity) else {
            return;
        };
        for pipeline in cache.pipelines.iter_mut().filter_map(Option::take) {
            self.released.push(Released::Pipeline(pipeline));
        }
    }

    /// [`dirty_pipelines`](Self::dirty_pipelines) for every cached entity.
    pub(crate) fn dirty_all_pipelines(&mut self) {
        for cache in self.entities.values_mut() {
            self.released
                .extend(cache.pipelines.iter_mut().filter_map(Option::take).map(Released::Pipeline));
        }
    }

    pub(crate) fn dirty_primitive(&mut self, entity: EntityKey) {
        let Some(primitive) = self
            .entities
            .get_mut(entity)
            .and_then(|cache| cache.primitive.take())
        else {
            return;
        };
        self.released.push(Released::Primitive(primitive));
    }

    /// Releases the caches of entities no longer in `scene`. Returns how
    /// many were dropped.
    pub fn prune(&mut self, scene: &Scene) -> usize {
        let dead: SmallVec<[EntityKey; 8]> = self
            .entities
            .keys()
            .filter(|key| !scene.contains(*key))
            .collect();
        for key in &dead {
            self.invalidate_all(*key);
        }
        if !dead.is_empty() {
            log::debug!("Pruned render caches of {} removed entities", dead.len());
        }
        dead.len()
    }

    /// Takes the handles queued for release since the last call.
    pub fn drain_released(&mut self) -> std::vec::Drain<'_, Released> {
        self.released.drain(..)
    }

    /// Entities with any cached state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.values().filter(|cache| !cache.is_empty()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn entry(&mut self, entity: EntityKey) -> Option<&mut EntityRenderCache> {
        // Only fails for keys from a removed slot whose version is stale.
        self.entities
            .entry(entity)
            .map(|entry| entry.or_insert_with(EntityRenderCache::default))
    }

    fn release_entry(&mut self, cache: EntityRenderCache) {
        let EntityRenderCache {
            pipelines,
            primitive,
            sources,
            geometry_subscription,
        } = cache;
        drop(geometry_subscription);
        drop(sources);
        self.released
            .extend(pipelines.into_iter().flatten().map(Released::Pipeline));
        self.released.extend(primitive.map(Released::Primitive));
    }
}
