//! Scene storage for renderable objects.
//!
//! Objects live in a generation-counted arena. An `ObjectHandle` names one
//! object identity: replacing or removing the object invalidates the handle,
//! while in-place edits (transform, visibility) keep it and bump the
//! object's revision instead.

use stao_math::Aabb;

use crate::object::{RenderableObject, Transform};

/// Identity of an object in a `Scene`, compared by value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    pub index: u32,
    pub generation: u32,
}

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    revision: u64,
    object: Option<RenderableObject>,
}

/// A collection of renderable objects.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    /// Scene name (usually from filename)
    pub name: String,
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Scene {
    /// Create an empty scene.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add an object and return its handle.
    pub fn insert(&mut self, object: RenderableObject) -> ObjectHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation += 1;
            slot.revision = 0;
            slot.object = Some(object);
            return ObjectHandle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            revision: 0,
            object: Some(object),
        });
        ObjectHandle {
            index,
            generation: 0,
        }
    }

    /// Remove an object. Returns it if the handle was live.
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<RenderableObject> {
        let slot = self.live_slot_mut(handle)?;
        let object = slot.object.take();
        self.free.push(handle.index);
        object
    }

    /// Swap in a new object at the same slot. The old handle becomes stale.
    pub fn replace(&mut self, handle: ObjectHandle, object: RenderableObject) -> Option<ObjectHandle> {
        let slot = self.live_slot_mut(handle)?;
        slot.generation += 1;
        slot.revision = 0;
        slot.object = Some(object);
        Some(ObjectHandle {
            index: handle.index,
            generation: slot.generation,
        })
    }

    pub fn get(&self, handle: ObjectHandle) -> Option<&RenderableObject> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.object.as_ref())
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Revision counter of a live object; bumped by in-place edits.
    pub fn revision(&self, handle: ObjectHandle) -> Option<u64> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.object.is_some())
            .map(|slot| slot.revision)
    }

    /// Set the modeling transform. Returns false for a stale handle.
    pub fn set_transform(&mut self, handle: ObjectHandle, transform: Transform) -> bool {
        self.edit(handle, |object| object.transform = transform)
    }

    /// Show or hide an object. Returns false for a stale handle.
    pub fn set_visible(&mut self, handle: ObjectHandle, visible: bool) -> bool {
        self.edit(handle, |object| object.visible = visible)
    }

    /// Iterate over live objects.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectHandle, &RenderableObject)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.object.as_ref().map(|object| {
                (
                    ObjectHandle {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    object,
                )
            })
        })
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.object.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// World-space bounding box of all visible objects.
    pub fn world_bounds(&self) -> Aabb {
        self.iter()
            .filter(|(_, object)| object.visible)
            .map(|(_, object)| object.world_bounds())
            .filter(|bounds| !bounds.is_empty())
            .fold(Aabb::empty(), |acc, bounds| Aabb::surrounding(&acc, &bounds))
    }

    fn live_slot_mut(&mut self, handle: ObjectHandle) -> Option<&mut Slot> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.object.is_some())
    }

    fn edit<F: FnOnce(&mut RenderableObject)>(&mut self, handle: ObjectHandle, f: F) -> bool {
        match self.live_slot_mut(handle) {
            Some(slot) => {
                if let Some(object) = slot.object.as_mut() {
                    f(object);
                }
                slot.revision += 1;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stao_math::Vec3;
    use crate::mesh::PolygonMesh;
    use crate::object::Geometry;

    fn triangle(name: &str) -> RenderableObject {
        let mesh = PolygonMesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2]);
        RenderableObject::new(name, Geometry::Polygon(mesh))
    }

    #[test]
    fn test_insert_and_get() {
        let mut scene = Scene::new("test");
        let a = scene.insert(triangle("a"));
        let b = scene.insert(triangle("b"));

        assert_ne!(a, b);
        assert_eq!(scene.len(), 2);
        assert_eq!(scene.get(a).map(|o| o.name.as_str()), Some("a"));
        assert_eq!(scene.get(b).map(|o| o.name.as_str()), Some("b"));
    }

    #[test]
    fn test_replace_changes_identity() {
        let mut scene = Scene::new("test");
        let a = scene.insert(triangle("a"));
        let b = scene.replace(a, triangle("b")).unwrap();

        assert_eq!(a.index, b.index);
        assert_ne!(a, b);
        assert!(scene.get(a).is_none());
        assert_eq!(scene.get(b).map(|o| o.name.as_str()), Some("b"));
    }

    #[test]
    fn test_removed_slot_reused_with_new_generation() {
        let mut scene = Scene::new("test");
        let a = scene.insert(triangle("a"));
        assert!(scene.remove(a).is_some());
        assert!(scene.remove(a).is_none());
        assert!(scene.is_empty());

        let c = scene.insert(triangle("c"));
        assert_eq!(c.index, a.index);
        assert_ne!(c.generation, a.generation);
        assert!(!scene.contains(a));
    }

    #[test]
    fn test_edits_bump_revision_not_identity() {
        let mut scene = Scene::new("test");
        let a = scene.insert(triangle("a"));
        assert_eq!(scene.revision(a), Some(0));

        assert!(scene.set_visible(a, false));
        assert!(scene.set_transform(a, Transform::from_translation(Vec3::X)));
        assert_eq!(scene.revision(a), Some(2));
        assert!(scene.contains(a));
        assert!(!scene.get(a).unwrap().visible);
    }

    #[test]
    fn test_world_bounds_skips_hidden() {
        let mut scene = Scene::new("test");
        let _a = scene.insert(triangle("a"));
        let b = scene.insert(
            triangle("b").with_transform(Transform::from_translation(Vec3::new(10.0, 0.0, 0.0))),
        );

        assert!(scene.world_bounds().max().x > 10.0);
        scene.set_visible(b, false);
        assert!(scene.world_bounds().max().x < 2.0);
    }
}
