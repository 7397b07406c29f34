//! Snapshot encoding: rkyv archive, LZ4 compressed with the size prepended.

use crate::core::types::Result;
use crate::core::Error;
use crate::persist::snapshot::{ArchivedStructureSnapshot, StructureSnapshot, SNAPSHOT_VERSION};

pub fn encode_structure(snapshot: &StructureSnapshot) -> Result<Vec<u8>> {
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(snapshot)
        .map_err(|e| Error::Persist(format!("archive failed: {}", e)))?;
    Ok(lz4_flex::compress_prepend_size(&bytes))
}

pub fn decode_structure(data: &[u8]) -> Result<StructureSnapshot> {
    let decompressed = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::Persist(format!("LZ4 decompression failed: {}", e)))?;

    let archived = rkyv::access::<ArchivedStructureSnapshot, rkyv::rancor::Error>(&decompressed)
        .map_err(|e| Error::Persist(e.to_string()))?;

    let snapshot: StructureSnapshot =
        rkyv::deserialize::<StructureSnapshot, rkyv::rancor::Error>(archived)
            .map_err(|e| Error::Persist(e.to_string()))?;

    if snapshot.version != SNAPSHOT_VERSION {
        return Err(Error::Persist(format!(
            "snapshot version mismatch: expected {}, got {}",
            SNAPSHOT_VERSION, snapshot.version
        )));
    }
    Ok(snapshot)
}
