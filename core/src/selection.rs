use crate::job::PostId;

/// Posts chosen by the operator. Unique members, insertion order kept.
///
/// Client-local only; the owning session clears it whenever the active
/// group changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    members: Vec<PostId>,
}

impl Selection {
    /// Build from a stored list, dropping duplicates.
    pub fn from_members<I: IntoIterator<Item = PostId>>(ids: I) -> Self {
        let mut s = Self::default();
        for id in ids {
            s.add(id);
        }
        s
    }

    /// Add `id`; returns `false` if it was already selected.
    pub fn add(&mut self, id: PostId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.members.push(id);
        true
    }

    /// Remove `id`; returns `false` if it was not selected.
    pub fn remove(&mut self, id: PostId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| *m != id);
        self.members.len() != before
    }

    /// Drop every member.
    pub fn clear(&mut self) { self.members.clear(); }

    /// Members in insertion order.
    pub fn members(&self) -> &[PostId] { &self.members }

    /// First selected post, if any.
    pub fn first(&self) -> Option<PostId> { self.members.first().copied() }

    /// Membership test.
    pub fn contains(&self, id: PostId) -> bool { self.members.contains(&id) }

    /// Number of members.
    pub fn len(&self) -> usize { self.members.len() }

    /// `true` when nothing is selected.
    pub fn is_empty(&self) -> bool { self.members.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_unique_and_ordered() {
        let mut s = Selection::default();
        assert!(s.add(5));
        assert!(s.add(2));
        assert!(!s.add(5));
        assert!(s.add(9));
        assert_eq!(s.members(), &[5, 2, 9]);
        assert_eq!(s.first(), Some(5));
    }

    #[test]
    fn remove_and_clear() {
        let mut s = Selection::from_members([1, 2, 2, 3]);
        assert_eq!(s.len(), 3);
        assert!(s.remove(2));
        assert!(!s.remove(2));
        assert_eq!(s.members(), &[1, 3]);
        s.clear();
        assert!(s.is_empty());
        assert_eq!(s.first(), None);
    }
}
