//! The `--paint x,y,id` brush.

use std::str::FromStr;

use tilefort_world::{Tile, TilePosition};

/// One tile to place once its chunk is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paint {
    pub position: TilePosition,
    pub tile: Tile,
}

impl FromStr for Paint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let [x, y, id] = parts.as_slice() else {
            return Err(format!("expected x,y,id but got {s:?}"));
        };
        let x = x.parse::<i32>().map_err(|e| format!("bad x {x:?}: {e}"))?;
        let y = y.parse::<i32>().map_err(|e| format!("bad y {y:?}: {e}"))?;
        let id = id.parse::<u16>().map_err(|e| format!("bad tile id {id:?}: {e}"))?;
        Ok(Self {
            position: TilePosition::new(x, y),
            tile: Tile::new(id),
        })
    }
}
