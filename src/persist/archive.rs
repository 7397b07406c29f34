//! Edits of a sector the observer has left.
//!
//! Modified and player-built structures are kept encoded; placement ids that
//! were already realized are remembered so re-entering the sector does not
//! spawn them a second time.

use std::collections::HashSet;

use crate::core::types::Result;
use crate::generation::placement::PlacementId;
use crate::persist::codec::{decode_structure, encode_structure};
use crate::persist::snapshot::StructureSnapshot;

#[derive(Clone, Debug, Default)]
pub struct SectorArchive {
    structures: Vec<Vec<u8>>,
    realized: HashSet<PlacementId>,
}

impl SectorArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_structure(&mut self, snapshot: &StructureSnapshot) -> Result<()> {
        self.structures.push(encode_structure(snapshot)?);
        Ok(())
    }

    pub fn mark_realized(&mut self, id: PlacementId) {
        self.realized.insert(id);
    }

    pub fn is_realized(&self, id: PlacementId) -> bool {
        self.realized.contains(&id)
    }

    pub fn realized(&self) -> impl Iterator<Item = PlacementId> + '_ {
        self.realized.iter().copied()
    }

    pub fn structure_count(&self) -> usize {
        self.structures.len()
    }

    /// Encoded size of all stored structures
    pub fn byte_size(&self) -> usize {
        self.structures.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.structures.is_empty() && self.realized.is_empty()
    }

    pub fn decode_structures(&self) -> Result<Vec<StructureSnapshot>> {
        self.structures.iter().map(|bytes| decode_structure(bytes)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::snapshot::SNAPSHOT_VERSION;

    #[test]
    fn test_archive_keeps_structures_and_ids() {
        let mut archive = SectorArchive::new();
        assert!(archive.is_empty());

        let snapshot = StructureSnapshot {
            version: SNAPSHOT_VERSION,
            uid: 7,
            position: [0.0; 3],
            placement: None,
            archetype: Some("ship".into()),
            modified: true,
            chunks: Vec::new(),
        };
        archive.add_structure(&snapshot).unwrap();
        archive.mark_realized(PlacementId(7));

        assert!(!archive.is_empty());
        assert!(archive.is_realized(PlacementId(7)));
        assert!(!archive.is_realized(PlacementId(8)));
        assert_eq!(archive.structure_count(), 1);
        assert!(archive.byte_size() > 0);
        assert_eq!(archive.decode_structures().unwrap(), vec![snapshot]);
    }
}
