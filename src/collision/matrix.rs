//! Which body pairs are touching, keyed by unordered [`BodyId`] pair.

use std::collections::HashSet;

use crate::dynamics::BodyId;

#[derive(Debug, Clone, Default)]
pub struct CollisionMatrix {
    pairs: HashSet<(BodyId, BodyId)>,
}

impl CollisionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn key(a: BodyId, b: BodyId) -> (BodyId, BodyId) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub fn get(&self, a: BodyId, b: BodyId) -> bool {
        self.pairs.contains(&Self::key(a, b))
    }

    pub fn set(&mut self, a: BodyId, b: BodyId, colliding: bool) {
        let key = Self::key(a, b);
        if colliding {
            self.pairs.insert(key);
        } else {
            self.pairs.remove(&key);
        }
    }

    /// Drop every entry involving `body`.
    pub fn remove_body(&mut self, body: BodyId) {
        self.pairs.retain(|&(a, b)| a != body && b != body);
    }

    pub fn reset(&mut self) {
        self.pairs.clear();
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pairs as `(smaller, larger)`, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (BodyId, BodyId)> + '_ {
        self.pairs.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unordered_get_set() {
        let mut m = CollisionMatrix::new();
        m.set(BodyId(3), BodyId(1), true);
        assert!(m.get(BodyId(1), BodyId(3)));
        assert!(m.get(BodyId(3), BodyId(1)));
        assert!(!m.get(BodyId(1), BodyId(2)));
        assert_eq!(m.iter().collect::<Vec<_>>(), vec![(BodyId(1), BodyId(3))]);

        m.set(BodyId(1), BodyId(3), false);
        assert!(m.is_empty());
    }

    #[test]
    fn test_remove_body_and_reset() {
        let mut m = CollisionMatrix::new();
        m.set(BodyId(0), BodyId(1), true);
        m.set(BodyId(1), BodyId(2), true);
        m.set(BodyId(2), BodyId(3), true);
        m.remove_body(BodyId(1));
        assert_eq!(m.len(), 1);
        assert!(m.get(BodyId(2), BodyId(3)));

        m.reset();
        assert!(m.is_empty());
    }
}
