// Brltab Sorted Vector
// One generic sorted array with binary search, shared by every table

use std::cmp::Ordering;

/// A vector kept sorted under a fixed comparator.
///
/// Every table in a key table (key names, bindings, hotkeys, mapped keys)
/// is one of these: built incrementally at compile time, binary-searched at
/// both compile time and runtime, and read-only once compilation finishes.
/// Insertion is O(n); that is fine because mutation only happens while a
/// table is being compiled.
#[derive(Debug, Clone)]
pub struct SortedVec<T> {
    items: Vec<T>,
    cmp: fn(&T, &T) -> Ordering,
}

impl<T> SortedVec<T> {
    pub fn new(cmp: fn(&T, &T) -> Ordering) -> Self {
        Self {
            items: Vec::new(),
            cmp,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Binary search with an arbitrary probe function.
    ///
    /// `probe` must be consistent with the vector's comparator. Returns the
    /// index of a matching element, or the insertion point. When several
    /// elements compare equal, the returned match is the first of the run.
    pub fn find_by(&self, probe: impl Fn(&T) -> Ordering) -> Result<usize, usize> {
        match self.items.binary_search_by(|item| probe(item)) {
            Ok(mut index) => {
                while index > 0 && probe(&self.items[index - 1]) == Ordering::Equal {
                    index -= 1;
                }
                Ok(index)
            }
            Err(index) => Err(index),
        }
    }

    /// Look up an element equal to `probe` under the table comparator.
    pub fn find(&self, probe: &T) -> Result<usize, usize> {
        self.find_by(|item| (self.cmp)(item, probe))
    }

    /// Insert preserving sort order, placing `item` after any equal run so
    /// that the first-authored entry of a duplicate pair stays effective.
    /// Returns the index the item landed at.
    pub fn insert(&mut self, item: T) -> usize {
        let index = self
            .items
            .partition_point(|existing| (self.cmp)(existing, &item) != Ordering::Greater);
        self.items.insert(index, item);
        index
    }

    /// Whether the vector is strictly ordered under its comparator,
    /// allowing equal runs. Used by tests to assert the sort invariant.
    pub fn is_sorted(&self) -> bool {
        self.items
            .windows(2)
            .all(|pair| (self.cmp)(&pair[0], &pair[1]) != Ordering::Greater)
    }
}

impl<'a, T> IntoIterator for &'a SortedVec<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_value(a: &u32, b: &u32) -> Ordering {
        a.cmp(b)
    }

    #[test]
    fn test_insert_keeps_order() {
        let mut v = SortedVec::new(by_value);
        for n in [5u32, 1, 9, 3, 7] {
            v.insert(n);
        }
        assert_eq!(v.as_slice(), &[1, 3, 5, 7, 9]);
        assert!(v.is_sorted());
    }

    #[test]
    fn test_find_present_and_missing() {
        let mut v = SortedVec::new(by_value);
        for n in [2u32, 4, 6] {
            v.insert(n);
        }
        assert_eq!(v.find(&4), Ok(1));
        assert_eq!(v.find(&5), Err(2));
        assert_eq!(v.find(&1), Err(0));
        assert_eq!(v.find(&9), Err(3));
    }

    #[test]
    fn test_duplicates_insert_after_first() {
        let mut v = SortedVec::new(|a: &(u32, char), b: &(u32, char)| a.0.cmp(&b.0));
        v.insert((1, 'a'));
        v.insert((1, 'b'));
        v.insert((1, 'c'));
        // Later equals land after earlier ones, and find returns the first.
        assert_eq!(v.as_slice(), &[(1, 'a'), (1, 'b'), (1, 'c')]);
        assert_eq!(v.find(&(1, 'z')), Ok(0));
    }

    #[test]
    fn test_every_inserted_element_findable() {
        let mut v = SortedVec::new(by_value);
        for n in 0..50u32 {
            v.insert((n * 37) % 101);
        }
        for item in v.as_slice().to_vec() {
            assert!(v.find(&item).is_ok());
        }
    }
}
