use bitvec::vec::BitVec;

/// A set of (`usize`, T) pairs where keys are unique.
///
/// Pairs can be iterated in insertion order, and membership is checked with
/// a bitmap indexed by key, so keys are expected to be small and dense,
/// like state or transition indexes. The bitmap grows as needed.
///
/// Inserting a pair whose key already exists is a no-op, the value of the
/// first insertion is kept.
#[derive(Debug, Default)]
pub(crate) struct BitmapSet<T> {
    // (key,value) pairs in insertion order.
    items: Vec<(usize, T)>,
    // One bit per key, set if the key is in `items`.
    bitmap: BitVec<usize>,
}

impl<T> BitmapSet<T> {
    /// Creates a set with room for keys in `0..capacity` without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { items: Vec::new(), bitmap: BitVec::repeat(false, capacity) }
    }

    /// Adds a (key,value) pair to the set.
    ///
    /// Returns `true` if the key didn't exist and the pair was added.
    #[inline]
    pub fn insert(&mut self, key: usize, value: T) -> bool {
        if key >= self.bitmap.len() {
            self.bitmap.resize(key + 1, false);
        }
        if self.bitmap[key] {
            return false;
        }
        self.bitmap.set(key, true);
        self.items.push((key, value));
        true
    }

    /// True if the key is in the set.
    #[inline]
    pub fn contains(&self, key: usize) -> bool {
        self.bitmap.get(key).is_some_and(|bit| *bit)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Removes all values in the set.
    #[inline]
    pub fn clear(&mut self) {
        for (key, _) in self.items.drain(0..) {
            self.bitmap.set(key, false);
        }
    }

    /// Returns an iterator for the items in the set.
    ///
    /// Items are returned in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &(usize, T)> {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::BitmapSet;

    #[test]
    fn thread_set() {
        let mut s = BitmapSet::with_capacity(8);

        assert!(s.insert(4, 'a'));
        assert!(s.insert(2, 'b'));
        assert!(s.insert(3, 'c'));
        assert!(s.insert(10, 'd'));
        assert!(s.insert(0, 'e'));
        assert!(s.insert(2000, 'f'));

        assert!(!s.insert(4, 'x'));
        assert!(!s.insert(2, 'x'));
        assert!(!s.insert(2000, 'x'));
        assert!(s.contains(10));
        assert!(!s.contains(11));
        assert!(!s.contains(5000));

        assert_eq!(
            s.iter().copied().collect::<Vec<_>>(),
            vec![(4, 'a'), (2, 'b'), (3, 'c'), (10, 'd'), (0, 'e'), (2000, 'f')]
        );

        s.clear();

        assert!(s.is_empty());
        assert_eq!(s.bitmap.count_ones(), 0);

        assert!(s.insert(200, 'a'));
        assert!(s.insert(3, 'b'));
        assert_eq!(s.len(), 2);
    }
}
