//! Block (voxel) data type and the registry of per-id properties

use std::path::Path;

use bytemuck::{Pod, Zeroable};
use rkyv::{Archive, Deserialize, Serialize};

use crate::core::types::Result;
use crate::core::Error;

/// Block identifier. `0` is air.
pub type BlockId = u16;

/// Identifiers of the built-in block set.
pub mod ids {
    use super::BlockId;

    pub const AIR: BlockId = 0;
    pub const STONE: BlockId = 1;
    pub const REGOLITH: BlockId = 2;
    pub const ICE: BlockId = 3;
    pub const IRON_ORE: BlockId = 4;
    pub const GOLD_ORE: BlockId = 5;
    pub const CRYSTAL: BlockId = 6;
    pub const HULL: BlockId = 7;
    pub const GLASS: BlockId = 8;
    pub const CABLE: BlockId = 9;
    pub const BATTERY: BlockId = 10;
}

/// Highest light level a block can carry or emit.
pub const MAX_LIGHT: u8 = 15;

/// Convert RGB888 to RGB565
pub fn rgb_to_565(r: u8, g: u8, b: u8) -> u16 {
    let r5 = (r as u16 >> 3) & 0x1F;
    let g6 = (g as u16 >> 2) & 0x3F;
    let b5 = (b as u16 >> 3) & 0x1F;
    (r5 << 11) | (g6 << 5) | b5
}

/// Convert RGB565 to RGB888
pub fn rgb565_to_rgb(color: u16) -> (u8, u8, u8) {
    let r5 = (color >> 11) & 0x1F;
    let g6 = (color >> 5) & 0x3F;
    let b5 = color & 0x1F;
    (
        ((r5 << 3) | (r5 >> 2)) as u8,
        ((g6 << 2) | (g6 >> 4)) as u8,
        ((b5 << 3) | (b5 >> 2)) as u8,
    )
}

/// Single block - exactly 6 bytes.
///
/// Mass and transparency are not stored: they are properties of the id and
/// are looked up in a [`BlockRegistry`]. Durability and light are per instance.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Archive, Deserialize, Serialize)]
pub struct Block {
    /// Block type
    pub id: BlockId,
    /// RGB565 encoded light colour
    pub light_color: u16,
    /// Remaining hit points
    pub durability: u8,
    /// Light level (0..=MAX_LIGHT)
    pub light: u8,
}

impl Block {
    /// Empty/air block
    pub const AIR: Block = Block {
        id: ids::AIR,
        light_color: 0,
        durability: 0,
        light: 0,
    };

    /// Bare block of the given type (no light, zero durability).
    ///
    /// Prefer [`BlockRegistry::create`] for blocks that enter the world.
    pub fn new(id: BlockId) -> Self {
        Self { id, ..Self::AIR }
    }

    /// Check if block is air
    pub fn is_air(&self) -> bool {
        self.id == ids::AIR
    }

    /// Get RGB888 light colour
    pub fn light_rgb(&self) -> (u8, u8, u8) {
        rgb565_to_rgb(self.light_color)
    }

    /// Copy with a different light level and colour
    pub fn with_light(self, level: u8, color: u16) -> Self {
        Self {
            light: level.min(MAX_LIGHT),
            light_color: color,
            ..self
        }
    }
}

/// Static properties shared by every block with the same id.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlockProperties {
    pub name: String,
    /// Mass contribution of one block
    pub mass: f32,
    pub transparent: bool,
    /// Durability a freshly placed block starts with
    pub max_durability: u8,
    /// Light level emitted (0 = none)
    #[serde(default)]
    pub light_emission: u8,
    #[serde(default)]
    pub light_color: [u8; 3],
    /// Participates in the electrical network
    #[serde(default)]
    pub electrical: bool,
}

impl BlockProperties {
    fn solid(name: &str, mass: f32, max_durability: u8) -> Self {
        Self {
            name: name.to_string(),
            mass,
            transparent: false,
            max_durability,
            light_emission: 0,
            light_color: [0, 0, 0],
            electrical: false,
        }
    }
}

/// Lookup table from [`BlockId`] to [`BlockProperties`].
///
/// Injected wherever block semantics are needed; there is no global instance.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct BlockRegistry {
    blocks: Vec<BlockProperties>,
}

impl BlockRegistry {
    /// Build a registry from an explicit table. Index 0 must be air.
    pub fn new(blocks: Vec<BlockProperties>) -> Result<Self> {
        let registry = Self { blocks };
        registry.validate()?;
        Ok(registry)
    }

    /// Parse a registry from JSON (`{"blocks": [...]}`)
    pub fn from_json_str(json: &str) -> Result<Self> {
        let registry: Self = serde_json::from_str(json)?;
        registry.validate()?;
        Ok(registry)
    }

    /// Load a registry from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<()> {
        let Some(air) = self.blocks.first() else {
            return Err(Error::Config("block registry is empty".into()));
        };
        if air.mass != 0.0 || !air.transparent {
            return Err(Error::Config("block 0 must be massless transparent air".into()));
        }
        for (id, props) in self.blocks.iter().enumerate().skip(1) {
            if !(props.mass > 0.0) || !props.mass.is_finite() {
                return Err(Error::Config(format!(
                    "block {} ({}) must have positive finite mass",
                    id, props.name
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, id: BlockId) -> Option<&BlockProperties> {
        self.blocks.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn id_by_name(&self, name: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .position(|p| p.name == name)
            .map(|i| i as BlockId)
    }

    /// Mass of a block; unknown ids weigh nothing.
    pub fn mass_of(&self, block: Block) -> f32 {
        self.get(block.id).map_or(0.0, |p| p.mass)
    }

    /// Whether light and visibility pass through the block. Unknown ids are opaque.
    pub fn is_transparent(&self, block: Block) -> bool {
        self.get(block.id).map_or(false, |p| p.transparent)
    }

    pub fn is_electrical(&self, block: Block) -> bool {
        self.get(block.id).is_some_and(|p| p.electrical)
    }

    pub fn light_emission(&self, block: Block) -> u8 {
        self.get(block.id).map_or(0, |p| p.light_emission.min(MAX_LIGHT))
    }

    /// A fresh block of type `id` with full durability and its own emission.
    pub fn create(&self, id: BlockId) -> Block {
        match self.get(id) {
            Some(props) => {
                let [r, g, b] = props.light_color;
                Block {
                    id,
                    light_color: rgb_to_565(r, g, b),
                    durability: props.max_durability,
                    light: props.light_emission.min(MAX_LIGHT),
                }
            }
            None => {
                log::warn!("creating block with unregistered id {}", id);
                Block::new(id)
            }
        }
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        let air = BlockProperties {
            name: "air".into(),
            mass: 0.0,
            transparent: true,
            max_durability: 0,
            light_emission: 0,
            light_color: [0, 0, 0],
            electrical: false,
        };
        let crystal = BlockProperties {
            light_emission: 12,
            light_color: [140, 200, 255],
            ..BlockProperties::solid("crystal", 1.8, 6)
        };
        let glass = BlockProperties {
            transparent: true,
            ..BlockProperties::solid("glass", 1.2, 3)
        };
        let cable = BlockProperties {
            electrical: true,
            ..BlockProperties::solid("cable", 0.6, 4)
        };
        let battery = BlockProperties {
            electrical: true,
            light_emission: 4,
            light_color: [120, 255, 120],
            ..BlockProperties::solid("battery", 3.0, 8)
        };

        Self {
            blocks: vec![
                air,
                BlockProperties::solid("stone", 2.5, 10),
                BlockProperties::solid("regolith", 1.6, 4),
                BlockProperties::solid("ice", 0.9, 3),
                BlockProperties::solid("iron_ore", 4.2, 14),
                BlockProperties::solid("gold_ore", 6.0, 12),
                crystal,
                BlockProperties::solid("hull", 3.5, 20),
                glass,
                cable,
                battery,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size() {
        assert_eq!(std::mem::size_of::<Block>(), 6);
    }

    #[test]
    fn test_rgb565_roundtrip() {
        for (r, g, b) in [(255, 0, 0), (0, 255, 0), (0, 0, 255), (128, 128, 128)] {
            let color = rgb_to_565(r, g, b);
            let (r2, g2, b2) = rgb565_to_rgb(color);
            // Allow small error due to bit depth reduction
            assert!((r as i32 - r2 as i32).abs() <= 8);
            assert!((g as i32 - g2 as i32).abs() <= 4);
            assert!((b as i32 - b2 as i32).abs() <= 8);
        }
    }

    #[test]
    fn test_air() {
        assert!(Block::AIR.is_air());
        assert!(!Block::new(ids::STONE).is_air());
    }

    #[test]
    fn test_default_registry_properties() {
        let reg = BlockRegistry::default();
        assert_eq!(reg.mass_of(Block::AIR), 0.0);
        assert!(reg.is_transparent(Block::AIR));
        assert!(reg.mass_of(Block::new(ids::STONE)) > 0.0);
        assert!(!reg.is_transparent(Block::new(ids::STONE)));
        assert!(reg.is_transparent(Block::new(ids::GLASS)));
        assert!(reg.is_electrical(Block::new(ids::CABLE)));
        assert!(!reg.is_electrical(Block::new(ids::HULL)));
        assert_eq!(reg.id_by_name("gold_ore"), Some(ids::GOLD_ORE));
    }

    #[test]
    fn test_mass_depends_only_on_id() {
        let reg = BlockRegistry::default();
        let a = reg.create(ids::IRON_ORE);
        let mut b = a;
        b.durability = 1;
        b.light = 9;
        assert_eq!(reg.mass_of(a), reg.mass_of(b));
        assert_eq!(reg.is_transparent(a), reg.is_transparent(b));
    }

    #[test]
    fn test_create_uses_properties() {
        let reg = BlockRegistry::default();
        let crystal = reg.create(ids::CRYSTAL);
        assert_eq!(crystal.durability, 6);
        assert_eq!(crystal.light, 12);
        assert_ne!(crystal.light_color, 0);
    }

    #[test]
    fn test_json_registry_validation() {
        let bad = r#"{"blocks":[{"name":"rock","mass":1.0,"transparent":false,"max_durability":1}]}"#;
        assert!(BlockRegistry::from_json_str(bad).is_err());

        let good = r#"{"blocks":[
            {"name":"air","mass":0.0,"transparent":true,"max_durability":0},
            {"name":"rock","mass":2.0,"transparent":false,"max_durability":5}
        ]}"#;
        let reg = BlockRegistry::from_json_str(good).unwrap();
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.mass_of(Block::new(1)), 2.0);
    }
}
