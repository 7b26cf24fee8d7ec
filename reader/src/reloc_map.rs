//! Per-segment relocation-site map.
//!
//! The original keeps relocation sites in a hash keyed by position; since
//! every consumer is a sequential row-by-row hex dump, a sorted array
//! searched by lower-bound serves the same purpose and keeps iteration
//! order (and therefore test fixtures) deterministic.

use std::collections::BTreeMap;

/// Maps a byte position within a segment/section to the width (in bytes)
/// of the relocated field starting there.
#[derive(Debug, Clone, Default)]
pub struct RelocMap {
    sites: BTreeMap<usize, usize>,
    duplicates_warned: std::collections::HashSet<usize>,
}

impl RelocMap {
    pub fn new() -> Self {
        RelocMap::default()
    }

    /// Record a relocation of `width` bytes at `position`. A second
    /// relocation at the same position is reported once via `log::warn!`
    /// but does not replace the first or suppress the dump.
    pub fn insert(&mut self, position: usize, width: usize) {
        if self.sites.insert(position, width).is_some() && self.duplicates_warned.insert(position) {
            log::warn!("duplicate relocation at position {position:#x}");
        }
    }

    /// The width of the relocation starting exactly at `position`, if any.
    /// This is the callback `HexDumpFormatter` queries per byte position.
    pub fn width_at(&self, position: usize) -> Option<usize> {
        self.sites.get(&position).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.sites.iter().map(|(&pos, &width)| (pos, width))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_misses_return_none() {
        let map = RelocMap::new();
        assert_eq!(map.width_at(4), None);
    }

    #[test]
    fn insert_and_lookup() {
        let mut map = RelocMap::new();
        map.insert(0x10, 4);
        map.insert(0x20, 2);
        assert_eq!(map.width_at(0x10), Some(4));
        assert_eq!(map.width_at(0x20), Some(2));
        assert_eq!(map.width_at(0x11), None);
    }

    #[test]
    fn duplicate_insert_keeps_dump_going() {
        let mut map = RelocMap::new();
        map.insert(0x10, 4);
        map.insert(0x10, 4);
        assert_eq!(map.len(), 1);
        assert_eq!(map.width_at(0x10), Some(4));
    }

    #[test]
    fn iteration_is_sorted() {
        let mut map = RelocMap::new();
        map.insert(0x30, 2);
        map.insert(0x10, 2);
        map.insert(0x20, 2);
        let positions: Vec<usize> = map.iter().map(|(p, _)| p).collect();
        assert_eq!(positions, vec![0x10, 0x20, 0x30]);
    }
}
