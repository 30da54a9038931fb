#[cfg(feature = "tree-json")]
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
    ops::{Index, IndexMut},
};

/// A type-safe index into an [`Arena`].
///
/// An `ArenaId<Mode>` cannot address an `Arena<Node>`. The raw index doubles as the
/// stable numeric id of the element, which the code generator uses to derive names.
#[cfg_attr(feature = "tree-json", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "tree-json", serde(transparent))]
pub struct ArenaId<T> {
    id: u32,
    #[cfg_attr(feature = "tree-json", serde(skip))]
    _phantom_data: PhantomData<fn() -> T>,
}

impl<T> Copy for ArenaId<T> {}

impl<T> Clone for ArenaId<T> {
    #[inline(always)]
    fn clone(&self) -> ArenaId<T> {
        *self
    }
}

impl<T> PartialEq for ArenaId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for ArenaId<T> {}

impl<T> PartialOrd for ArenaId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ArenaId<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl<T> Hash for ArenaId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for ArenaId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.id)
    }
}

impl<T> fmt::Display for ArenaId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl<T> From<u32> for ArenaId<T> {
    fn from(id: u32) -> Self {
        Self::new(id)
    }
}

impl<T> From<usize> for ArenaId<T> {
    fn from(id: usize) -> Self {
        Self::new(id as u32)
    }
}

impl<T> ArenaId<T> {
    pub const fn new(id: u32) -> ArenaId<T> {
        Self {
            id,
            _phantom_data: PhantomData,
        }
    }

    /// The raw index, used as the element's numeric id.
    pub const fn number(self) -> u32 {
        self.id
    }
}

/// Sequential storage handing out [`ArenaId`]s.
///
/// Elements are never removed, so ids stay valid for the arena's lifetime.
#[cfg_attr(feature = "tree-json", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "tree-json", serde(transparent))]
#[derive(Debug, Clone)]
pub struct Arena<T> {
    items: Vec<T>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Arena<T> {
    pub fn new(size: usize) -> Self {
        Arena {
            items: Vec::with_capacity(size),
        }
    }

    pub fn alloc(&mut self, value: T) -> ArenaId<T> {
        let arena_id = self.items.len() as u32;
        self.items.push(value);
        ArenaId::new(arena_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: ArenaId<T>) -> Option<&T> {
        self.items.get(id.id as usize)
    }

    pub fn get_mut(&mut self, id: ArenaId<T>) -> Option<&mut T> {
        self.items.get_mut(id.id as usize)
    }

    /// Iterates over `(id, element)` pairs in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (ArenaId<T>, &T)> {
        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| (ArenaId::new(i as u32), item))
    }
}

impl<T> Index<ArenaId<T>> for Arena<T> {
    type Output = T;

    fn index(&self, index: ArenaId<T>) -> &Self::Output {
        &self.items[index.id as usize]
    }
}

impl<T> IndexMut<ArenaId<T>> for Arena<T> {
    fn index_mut(&mut self, index: ArenaId<T>) -> &mut Self::Output {
        &mut self.items[index.id as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(vec![1, 2, 3], 1, 2)]
    #[case(vec![1, 2, 3], 0, 1)]
    #[case(vec![1, 2, 3], 2, 3)]
    fn test_index(#[case] values: Vec<i32>, #[case] index: u32, #[case] expected: i32) {
        let mut arena = Arena::new(values.len());
        for v in values {
            arena.alloc(v);
        }
        assert_eq!(arena[ArenaId::new(index)], expected);
    }

    #[rstest]
    #[case(vec![1, 2, 3], 3, None)]
    #[case(vec![1, 2, 3], 1, Some(2))]
    #[case(Vec::new(), 0, None)]
    fn test_get(#[case] values: Vec<i32>, #[case] index: u32, #[case] expected: Option<i32>) {
        let mut arena = Arena::new(values.len());
        for v in values {
            arena.alloc(v);
        }
        assert_eq!(arena.get(ArenaId::new(index)).copied(), expected);
    }

    #[test]
    fn test_index_mut_and_iter() {
        let mut arena = Arena::default();
        let a = arena.alloc(10);
        let b = arena.alloc(20);
        arena[b] += 1;
        assert_eq!(
            arena.iter().map(|(id, v)| (id.number(), *v)).collect::<Vec<_>>(),
            vec![(a.number(), 10), (b.number(), 21)]
        );
        assert!(!arena.is_empty());
    }

    #[test]
    fn test_ids_of_different_arenas_compare_by_number() {
        let id: ArenaId<i32> = 5u32.into();
        let other: ArenaId<i32> = 5usize.into();
        assert_eq!(id, other);
        assert_eq!(format!("{id:?}"), "#5");
    }
}
