//! Persistence boundary: snapshots, their encoding and per-sector archives.

pub mod archive;
pub mod codec;
pub mod snapshot;

pub use archive::SectorArchive;
pub use codec::{decode_structure, encode_structure};
pub use snapshot::{ChunkSnapshot, StructureSnapshot, SNAPSHOT_VERSION};
