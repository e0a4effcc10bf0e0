//! Typed message-kind tags.
//!
//! A data message starts with its kind: one width-selector byte followed by
//! the kind value in that width.
//!
//! ```text
//! +-----------+----------------------------+
//! | selector  | value (1, 2, 4 or 8 bytes) |
//! | u8        | little-endian              |
//! +-----------+----------------------------+
//! ```
//!
//! Writers use the width their kind enum declares; readers accept any
//! selector, so a peer whose enum grew wider is still understood. Values
//! that do not map to a known kind decode as [`Kind::Unknown`].

use crate::buffer::{NetReader, NetWriter, ReadError};

/// Integer width of an encoded kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagWidth {
    U8 = 0,
    U16 = 1,
    U32 = 2,
    U64 = 3,
}

impl TagWidth {
    /// Smallest width able to hold `max`.
    pub const fn for_max(max: u64) -> Self {
        if max <= u8::MAX as u64 {
            Self::U8
        } else if max <= u16::MAX as u64 {
            Self::U16
        } else if max <= u32::MAX as u64 {
            Self::U32
        } else {
            Self::U64
        }
    }

    fn from_selector(selector: u8) -> Result<Self, ReadError> {
        match selector {
            0 => Ok(Self::U8),
            1 => Ok(Self::U16),
            2 => Ok(Self::U32),
            3 => Ok(Self::U64),
            other => Err(ReadError::InvalidWidth(other)),
        }
    }
}

/// An enum that can be written as a message-kind tag.
pub trait WireEnum: Copy + std::fmt::Debug + Send + 'static {
    /// Width used when writing. Usually `TagWidth::for_max(<largest variant>)`.
    const WIDTH: TagWidth;

    fn to_raw(self) -> u64;

    fn from_raw(raw: u64) -> Option<Self>;
}

/// A decoded kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind<T> {
    Known(T),
    /// A value this peer does not know, passed through for graceful handling.
    Unknown(u64),
}

/// Writes `kind` using its declared width.
pub fn write_kind<T: WireEnum>(writer: &mut NetWriter, kind: T) {
    let raw = kind.to_raw();
    writer.write_u8(T::WIDTH as u8);
    match T::WIDTH {
        TagWidth::U8 => writer.write_u8(raw as u8),
        TagWidth::U16 => writer.write_u16(raw as u16),
        TagWidth::U32 => writer.write_u32(raw as u32),
        TagWidth::U64 => writer.write_u64(raw),
    }
}

/// Starts a data message: a writer holding `kind`'s tag, ready for the body.
pub fn message_writer<T: WireEnum>(kind: T) -> NetWriter {
    let mut writer = NetWriter::new();
    write_kind(&mut writer, kind);
    writer
}

/// Reads a kind tag of any width.
pub fn read_kind<T: WireEnum>(reader: &mut NetReader<'_>) -> Result<Kind<T>, ReadError> {
    let raw = match TagWidth::from_selector(reader.read_u8()?)? {
        TagWidth::U8 => u64::from(reader.read_u8()?),
        TagWidth::U16 => u64::from(reader.read_u16()?),
        TagWidth::U32 => u64::from(reader.read_u32()?),
        TagWidth::U64 => reader.read_u64()?,
    };
    Ok(T::from_raw(raw).map_or(Kind::Unknown(raw), Kind::Known))
}
