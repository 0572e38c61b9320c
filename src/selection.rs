use crate::registry::ObjectId;

/// The selected-object set, in selection order. Ids are plain handles; the
/// tracked list's reference counts keep the slots alive, and deletion and
/// snapshot restore both prune this set.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    ids: Vec<ObjectId>,
}

impl Selection {
    pub fn set(&mut self, id: ObjectId) {
        self.ids.clear();
        self.ids.push(id);
    }

    pub fn add(&mut self, id: ObjectId) {
        if !self.ids.contains(&id) {
            self.ids.push(id);
        }
    }

    pub fn remove(&mut self, id: ObjectId) {
        self.ids.retain(|selected| *selected != id);
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.ids.contains(&id)
    }

    pub fn ids(&self) -> &[ObjectId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
