//! Scene graph storage and depth-first traversal.

use glam::{Mat4, Vec3};
use slotmap::SlotMap;

use crate::components::{Camera, Geometry, Hair, Light, Material};
use crate::entity::{Entity, EntityKey};

/// What a [`SceneVisitor`] wants to happen after visiting a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitFlow {
    Continue,
    /// Do not descend into this node's children. Its post-visit still runs.
    SkipChildren,
}

/// Callbacks for [`Scene::traverse`].
///
/// `pre_visit` runs before a node's children, `post_visit` after them. Every
/// entity is transformable, so visitors that accumulate transforms push in
/// `pre_visit` and pop in `post_visit`.
pub trait SceneVisitor {
    fn pre_visit(&mut self, key: EntityKey, entity: &Entity, depth: usize) -> VisitFlow;

    fn post_visit(&mut self, _key: EntityKey, _entity: &Entity, _depth: usize) {}
}

/// Entity hierarchy.
///
/// The scene owns entities. Parent/child links are keys, so removing a
/// subtree never leaves a dangling reference; stale keys simply stop
/// resolving.
#[derive(Debug, Default)]
pub struct Scene {
    entities: SlotMap<EntityKey, Entity>,
    roots: Vec<EntityKey>,

    /// Light whose camera renders the shadow map.
    pub active_light: Option<EntityKey>,
    /// Camera the color passes render through.
    pub active_camera: Option<EntityKey>,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build_entity(&'_ mut self, label: &str) -> EntityBuilder<'_> {
        EntityBuilder::new(self, label)
    }

    /// Adds `entity` as a new root.
    pub fn add_entity(&mut self, mut entity: Entity) -> EntityKey {
        entity.parent = None;
        entity.children.clear();
        let key = self.entities.insert(entity);
        self.roots.push(key);
        key
    }

    /// Adds `entity` under `parent`. Falls back to a root if `parent` is gone.
    pub fn add_to_parent(&mut self, entity: Entity, parent: EntityKey) -> EntityKey {
        let key = self.add_entity(entity);
        self.attach(key, parent);
        key
    }

    /// Re-parents `child` under `parent`. Refuses (and logs) cycles.
    pub fn attach(&mut self, child: EntityKey, parent: EntityKey) {
        if !self.entities.contains_key(child) || !self.entities.contains_key(parent) {
            return;
        }
        if self.is_ancestor_or_self(child, parent) {
            log::warn!("Refusing to attach {child:?} under its own descendant {parent:?}");
            return;
        }

        self.detach(child);
        self.roots.retain(|k| *k != child);
        if let Some(p) = self.entities.get_mut(parent) {
            p.children.push(child);
        }
        if let Some(c) = self.entities.get_mut(child) {
            c.parent = Some(parent);
        }
    }

    fn detach(&mut self, child: EntityKey) {
        let Some(old_parent) = self.entities.get(child).and_then(|c| c.parent) else {
            return;
        };
        if let Some(p) = self.entities.get_mut(old_parent) {
            p.children.retain(|k| *k != child);
        }
        if let Some(c) = self.entities.get_mut(child) {
            c.parent = None;
        }
        self.roots.push(child);
    }

    fn is_ancestor_or_self(&self, ancestor: EntityKey, mut node: EntityKey) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.entities.get(node).and_then(|e| e.parent) {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    /// Removes `key` and its whole subtree. Returns the number of entities
    /// removed.
    pub fn remove_entity(&mut self, key: EntityKey) -> usize {
        if !self.entities.contains_key(key) {
            return 0;
        }
        self.detach(key);
        self.roots.retain(|k| *k != key);

        let mut removed = 0;
        let mut stack = vec![key];
        while let Some(next) = stack.pop() {
            if let Some(entity) = self.entities.remove(next) {
                stack.extend(entity.children.iter().copied());
                removed += 1;
            }
        }

        if self.active_light.is_some_and(|k| !self.entities.contains_key(k)) {
            self.active_light = None;
        }
        if self.active_camera.is_some_and(|k| !self.entities.contains_key(k)) {
            self.active_camera = None;
        }
        removed
    }

    #[inline]
    #[must_use]
    pub fn get(&self, key: EntityKey) -> Option<&Entity> {
        self.entities.get(key)
    }

    #[inline]
    pub fn get_mut(&mut self, key: EntityKey) -> Option<&mut Entity> {
        self.entities.get_mut(key)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, key: EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn roots(&self) -> &[EntityKey] {
        &self.roots
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &Entity)> {
        self.entities.iter()
    }

    /// Accumulated model transform of `key`, root first.
    #[must_use]
    pub fn world_transform(&self, key: EntityKey) -> Mat4 {
        let mut world = Mat4::IDENTITY;
        let mut cursor = Some(key);
        while let Some(k) = cursor {
            let Some(entity) = self.entities.get(k) else {
                break;
            };
            world = entity.transform.matrix() * world;
            cursor = entity.parent;
        }
        world
    }

    /// Depth-first traversal from every root, in insertion order.
    pub fn traverse<V: SceneVisitor + ?Sized>(&self, visitor: &mut V) {
        for &root in &self.roots {
            self.traverse_from(root, 0, visitor);
        }
    }

    fn traverse_from<V: SceneVisitor + ?Sized>(&self, key: EntityKey, depth: usize, visitor: &mut V) {
        let Some(entity) = self.entities.get(key) else {
            return;
        };
        if visitor.pre_visit(key, entity, depth) == VisitFlow::Continue {
            for &child in &entity.children {
                self.traverse_from(child, depth + 1, visitor);
            }
        }
        visitor.post_visit(key, entity, depth);
    }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

pub struct EntityBuilder<'a> {
    scene: &'a mut Scene,
    entity: Entity,
    parent: Option<EntityKey>,
}

impl<'a> EntityBuilder<'a> {
    pub fn new(scene: &'a mut Scene, label: &str) -> Self {
        Self {
            scene,
            entity: Entity::new(label),
            parent: None,
        }
    }

    #[must_use]
    pub fn with_position(mut self, x: f32, y: f32, z: f32) -> Self {
        self.entity.transform.position = Vec3::new(x, y, z);
        self
    }

    #[must_use]
    pub fn with_scale(mut self, s: f32) -> Self {
        self.entity.transform.scale = Vec3::splat(s);
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: EntityKey) -> Self {
        self.parent = Some(parent);
        self
    }

    #[must_use]
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.entity.geometry = Some(geometry);
        self
    }

    #[must_use]
    pub fn with_material(mut self, material: Material) -> Self {
        self.entity.material = Some(material);
        self
    }

    #[must_use]
    pub fn with_hair(mut self, hair: Hair) -> Self {
        self.entity.hair = Some(hair);
        self
    }

    #[must_use]
    pub fn with_camera(mut self, camera: Camera) -> Self {
        self.entity.camera = Some(camera);
        self
    }

    #[must_use]
    pub fn with_light(mut self, light: Light) -> Self {
        self.entity.light = Some(light);
        self
    }

    #[must_use]
    pub fn cast_shadow(mut self, value: bool) -> Self {
        self.entity.set_cast_shadow(value);
        self
    }

    #[must_use]
    pub fn receive_shadow(mut self, value: bool) -> Self {
        self.entity.set_receive_shadow(value);
        self
    }

    #[must_use]
    pub fn visible(mut self, value: bool) -> Self {
        self.entity.set_visible(value);
        self
    }

    pub fn build(self) -> EntityKey {
        match self.parent {
            Some(parent) => self.scene.add_to_parent(self.entity, parent),
            None => self.scene.add_entity(self.entity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder(Vec<(String, usize, bool)>);

    impl SceneVisitor for Recorder {
        fn pre_visit(&mut self, _key: EntityKey, entity: &Entity, depth: usize) -> VisitFlow {
            self.0.push((entity.label.clone(), depth, true));
            if entity.label == "skip" {
                VisitFlow::SkipChildren
            } else {
                VisitFlow::Continue
            }
        }

        fn post_visit(&mut self, _key: EntityKey, entity: &Entity, depth: usize) {
            self.0.push((entity.label.clone(), depth, false));
        }
    }

    #[test]
    fn traversal_is_depth_first_with_balanced_post_visits() {
        let mut scene = Scene::new();
        let a = scene.build_entity("a").build();
        let _b = scene.build_entity("b").with_parent(a).build();
        let skip = scene.build_entity("skip").with_parent(a).build();
        let _hidden = scene.build_entity("hidden").with_parent(skip).build();

        let mut rec = Recorder(Vec::new());
        scene.traverse(&mut rec);
        let order: Vec<_> = rec.0.iter().map(|(l, d, pre)| (l.as_str(), *d, *pre)).collect();
        assert_eq!(
            order,
            vec![
                ("a", 0, true),
                ("b", 1, true),
                ("b", 1, false),
                ("skip", 1, true),
                ("skip", 1, false),
                ("a", 0, false),
            ]
        );
    }

    #[test]
    fn world_transform_composes_parents() {
        let mut scene = Scene::new();
        let a = scene.build_entity("a").with_position(1.0, 0.0, 0.0).build();
        let b = scene
            .build_entity("b")
            .with_parent(a)
            .with_position(0.0, 0.0, -2.0)
            .build();
        let p = scene.world_transform(b).transform_point3(Vec3::ZERO);
        assert_eq!(p, Vec3::new(1.0, 0.0, -2.0));
    }

    #[test]
    fn remove_subtree_clears_links_and_designations() {
        let mut scene = Scene::new();
        let a = scene.build_entity("a").build();
        let b = scene.build_entity("b").with_parent(a).build();
        scene.active_camera = Some(b);

        assert_eq!(scene.remove_entity(a), 2);
        assert!(scene.is_empty());
        assert!(scene.roots().is_empty());
        assert_eq!(scene.active_camera, None);
    }

    #[test]
    fn attach_refuses_cycles() {
        let mut scene = Scene::new();
        let a = scene.build_entity("a").build();
        let b = scene.build_entity("b").with_parent(a).build();
        scene.attach(a, b);
        assert_eq!(scene.get(b).unwrap().parent(), Some(a));
        assert_eq!(scene.roots(), &[a]);
    }
}
