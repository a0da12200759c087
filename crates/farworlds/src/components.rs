//! # Map Components
//!
//! Plain data attached to map entities. None of these carry behavior; the
//! systems in [`crate::systems`] interpret them.

use std::fmt;

use farworlds_core::{Component, EcsResult, Manager};
use uuid::Uuid;

/// Globally unique, human-readable identity of an entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Guid(String);

impl Guid {
    /// A fresh random (v4) GUID.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Component for Guid {
    fn name() -> &'static str {
        "Guid"
    }
}

/// Placement of an item on the map grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MapItem {
    /// Tile column inside the chunk.
    pub tile_x: u8,
    /// Tile row inside the chunk.
    pub tile_y: u8,
    /// Tile layer.
    pub tile_z: u8,
    /// Chunk column.
    pub chunk_x: u8,
    /// Chunk row.
    pub chunk_y: u8,
    /// Map the item lives on.
    pub map_id: u8,
}

impl Component for MapItem {
    fn name() -> &'static str {
        "MapItem"
    }
}

/// Footprint of an item, in tiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapItemBlock {
    /// Width.
    pub size_x: u8,
    /// Depth.
    pub size_y: u8,
    /// Height.
    pub size_z: u8,
}

impl Default for MapItemBlock {
    fn default() -> Self {
        Self {
            size_x: 1,
            size_y: 1,
            size_z: 1,
        }
    }
}

impl Component for MapItemBlock {
    fn name() -> &'static str {
        "MapItemBlock"
    }
}

/// A one-tile step in progress.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MapItemMovement {
    /// Step along x (-1, 0 or 1).
    pub move_x: i8,
    /// Step along y.
    pub move_y: i8,
    /// Step along z.
    pub move_z: i8,
    /// Completed fraction of the step, 0..1.
    pub progress: f32,
}

impl MapItemMovement {
    /// A step in the given direction with no progress yet.
    #[must_use]
    pub const fn towards(move_x: i8, move_y: i8, move_z: i8) -> Self {
        Self {
            move_x,
            move_y,
            move_z,
            progress: 0.0,
        }
    }

    /// Returns `true` if the step has a direction.
    #[must_use]
    pub const fn is_moving(&self) -> bool {
        self.move_x != 0 || self.move_y != 0 || self.move_z != 0
    }
}

impl Component for MapItemMovement {
    fn name() -> &'static str {
        "MapItemMovement"
    }
}

/// World-space tile position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Position {
    /// X coordinate.
    pub x: i32,
    /// Y coordinate.
    pub y: i32,
    /// Z coordinate.
    pub z: i32,
}

impl Position {
    /// Creates a position.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl Component for Position {
    fn name() -> &'static str {
        "Position"
    }
}

/// Registers every map component with the manager.
///
/// # Errors
///
/// Propagates registration failures (component limit reached).
pub fn register_components(manager: &mut Manager) -> EcsResult<()> {
    manager.register_component::<Guid>()?;
    manager.register_component::<MapItem>()?;
    manager.register_component::<MapItemBlock>()?;
    manager.register_component::<MapItemMovement>()?;
    manager.register_component::<Position>()?;
    Ok(())
}
