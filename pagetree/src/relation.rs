//! The object collection an index is built over.
//!
//! Trees never own the indexed objects. Spatial trees copy coordinates into
//! their leaves, metric trees store only ids and look objects up here whenever
//! a distance has to be computed.

use std::sync::Arc;

use crate::errors::{IndexError, IndexResult};
use crate::types::ObjectId;

/// An ordered collection of objects addressable by id.
pub trait Relation {
    type Object: ?Sized;

    /// Returns the object stored under `id`, if any.
    fn get(&self, id: ObjectId) -> Option<&Self::Object>;

    /// Number of objects in the relation.
    fn size(&self) -> usize;

    /// All ids, in relation order.
    fn ids(&self) -> Vec<ObjectId>;

    /// Like [`Relation::get`], failing with `ObjectNotFound`.
    fn fetch(&self, id: ObjectId) -> IndexResult<&Self::Object> {
        self.get(id).ok_or(IndexError::ObjectNotFound(id))
    }
}

/// A relation backed by a vector; ids are positions. Removed objects leave
/// a hole so that the remaining ids stay stable.
#[derive(Debug, Clone)]
pub struct VecRelation<O> {
    objects: Vec<Option<O>>,
    len: usize,
}

impl<O> Default for VecRelation<O> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<O> VecRelation<O> {
    pub fn new(objects: Vec<O>) -> Self {
        let len = objects.len();
        Self {
            objects: objects.into_iter().map(Some).collect(),
            len,
        }
    }

    /// Appends an object and returns its id.
    pub fn push(&mut self, object: O) -> ObjectId {
        self.objects.push(Some(object));
        self.len += 1;
        (self.objects.len() - 1) as ObjectId
    }

    /// Takes the object out of the relation. Its id is not reused.
    pub fn remove(&mut self, id: ObjectId) -> Option<O> {
        let slot = usize::try_from(id).ok().and_then(|i| self.objects.get_mut(i))?;
        let object = slot.take();
        if object.is_some() {
            self.len -= 1;
        }
        object
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &O)> {
        self.objects
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.as_ref().map(|o| (i as ObjectId, o)))
    }
}

impl<O> FromIterator<O> for VecRelation<O> {
    fn from_iter<T: IntoIterator<Item = O>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<O> Relation for VecRelation<O> {
    type Object = O;

    fn get(&self, id: ObjectId) -> Option<&O> {
        usize::try_from(id)
            .ok()
            .and_then(|i| self.objects.get(i))
            .and_then(Option::as_ref)
    }

    fn size(&self) -> usize {
        self.len
    }

    fn ids(&self) -> Vec<ObjectId> {
        self.iter().map(|(id, _)| id).collect()
    }
}

impl<R: Relation + ?Sized> Relation for Arc<R> {
    type Object = R::Object;

    fn get(&self, id: ObjectId) -> Option<&Self::Object> {
        (**self).get(id)
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn ids(&self) -> Vec<ObjectId> {
        (**self).ids()
    }
}

impl<R: Relation + ?Sized> Relation for &R {
    type Object = R::Object;

    fn get(&self, id: ObjectId) -> Option<&Self::Object> {
        (**self).get(id)
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn ids(&self) -> Vec<ObjectId> {
        (**self).ids()
    }
}
