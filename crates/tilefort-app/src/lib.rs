//! Process scaffolding shared by the Tile Fortress binaries: the fixed-rate
//! ticker and platform directory resolution.

pub mod platform;
pub mod ticker;

pub use platform::{PlatformDirs, PlatformError};
pub use ticker::{StopHandle, TickClock, TickTime, Ticker};
