//! Cartridge ROM images.
//!
//! Dumps come in three byte orders, told apart by the first word of the image:
//!
//! | format | magic         | order                  |
//! |--------|---------------|------------------------|
//! | `.z64` | `80 37 12 40` | big endian (canonical) |
//! | `.v64` | `37 80 40 12` | 16-bit words swapped   |
//! | `.n64` | `40 12 37 80` | 32-bit words reversed  |

use std::{
    io::{Cursor, Read},
    path::Path,
};

use binrw::{BinRead, BinWrite};
use easyerr::{Error, ResultExt};

/// Size of the boot segment, which also holds the header.
pub const BOOT_SIZE: usize = 0x1000;

/// Byte order of a ROM dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// `.z64`
    BigEndian,
    /// `.v64`
    ByteSwapped,
    /// `.n64`
    LittleEndian,
}

impl ByteOrder {
    pub fn detect(magic: [u8; 4]) -> Option<Self> {
        Some(match magic {
            [0x80, 0x37, 0x12, 0x40] => Self::BigEndian,
            [0x37, 0x80, 0x40, 0x12] => Self::ByteSwapped,
            [0x40, 0x12, 0x37, 0x80] => Self::LittleEndian,
            _ => return None,
        })
    }

    /// Converts `data` in place from this byte order to big endian. Trailing bytes which do not
    /// fill a whole word are left untouched.
    pub fn normalize(self, data: &mut [u8]) {
        match self {
            Self::BigEndian => (),
            Self::ByteSwapped => data.chunks_exact_mut(2).for_each(|c| c.swap(0, 1)),
            Self::LittleEndian => data.chunks_exact_mut(4).for_each(|c| c.reverse()),
        }
    }
}

/// The header at the start of every ROM image.
#[derive(Debug, Clone, Default, BinRead, BinWrite)]
#[brw(big)]
pub struct Header {
    /// PI domain 1 latency configuration. Doubles as the byte order magic.
    pub pi_config: u32,
    pub clock_rate: u32,
    /// Address the boot code jumps to once the game is loaded.
    pub entry: u32,
    pub release: u32,
    pub crc1: u32,
    pub crc2: u32,
    #[brw(pad_before = 8)]
    pub title: [u8; 20],
    /// Media type, two character game id and region.
    #[brw(pad_before = 7)]
    pub game_code: [u8; 4],
    pub version: u8,
}

impl Header {
    pub const SIZE: usize = 0x40;

    /// The title, with trailing padding removed.
    pub fn title(&self) -> String {
        String::from_utf8_lossy(&self.title)
            .trim_end_matches(['\0', ' '])
            .to_owned()
    }

    pub fn game_id(&self) -> String {
        String::from_utf8_lossy(&self.game_code).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum RomError {
    #[error("image is too small ({size} bytes) to contain a boot segment")]
    TooSmall { size: usize },
    #[error("unknown image format (magic {magic:02X?})")]
    UnknownFormat { magic: [u8; 4] },
    #[error(transparent)]
    Io { source: std::io::Error },
    #[error(transparent)]
    Header { source: binrw::Error },
}

/// A ROM image, normalized to big endian.
#[derive(Debug, Clone)]
pub struct Rom {
    pub header: Header,
    /// Byte order of the original dump.
    pub order: ByteOrder,
    data: Box<[u8]>,
}

impl Rom {
    pub fn new(mut data: Vec<u8>) -> Result<Self, RomError> {
        if data.len() < BOOT_SIZE {
            return Err(RomError::TooSmall { size: data.len() });
        }

        let magic = [data[0], data[1], data[2], data[3]];
        let order = ByteOrder::detect(magic).ok_or(RomError::UnknownFormat { magic })?;
        order.normalize(&mut data);

        let header = Header::read(&mut Cursor::new(&data[..Header::SIZE])).context(RomCtx::Header)?;
        tracing::info!(
            title = header.title(),
            game = header.game_id(),
            ?order,
            size = data.len(),
            "loaded rom"
        );

        Ok(Self {
            header,
            order,
            data: data.into_boxed_slice(),
        })
    }

    pub fn read(mut reader: impl Read) -> Result<Self, RomError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).context(RomCtx::Io)?;
        Self::new(data)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, RomError> {
        let data = std::fs::read(path).context(RomCtx::Io)?;
        Self::new(data)
    }

    #[inline(always)]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The boot segment, loaded by the PIF into SP DMEM.
    pub fn boot(&self) -> &[u8] {
        &self.data[..BOOT_SIZE]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn image(order: ByteOrder) -> Vec<u8> {
        let mut data = vec![0u8; BOOT_SIZE];
        data[..4].copy_from_slice(&[0x80, 0x37, 0x12, 0x40]);
        data[0x08..0x0C].copy_from_slice(&0x8000_0400u32.to_be_bytes());
        data[0x20..0x28].copy_from_slice(b"UMBRA   ");
        data[0x3B..0x3F].copy_from_slice(b"NUMP");
        data[0x40] = 0xAB;
        data[0x41] = 0xCD;

        // converting from big endian is the inverse of normalizing for both swaps
        order.normalize(&mut data);
        data
    }

    #[test]
    fn big_endian_is_untouched() {
        let data = image(ByteOrder::BigEndian);
        let rom = Rom::new(data.clone()).unwrap();

        assert_eq!(rom.order, ByteOrder::BigEndian);
        assert_eq!(rom.data(), &data[..]);
        assert_eq!(rom.header.entry, 0x8000_0400);
        assert_eq!(rom.header.title(), "UMBRA");
        assert_eq!(rom.header.game_id(), "NUMP");
    }

    #[test]
    fn byte_swapped_is_normalized() {
        let data = image(ByteOrder::ByteSwapped);
        assert_eq!(&data[..4], &[0x37, 0x80, 0x40, 0x12]);

        let rom = Rom::new(data).unwrap();
        assert_eq!(rom.order, ByteOrder::ByteSwapped);
        assert_eq!(rom.data()[0], 0x80);
        assert_eq!(&rom.data()[0x40..0x42], &[0xAB, 0xCD]);
        assert_eq!(rom.header.entry, 0x8000_0400);
    }

    #[test]
    fn little_endian_is_normalized() {
        let data = image(ByteOrder::LittleEndian);
        assert_eq!(&data[..4], &[0x40, 0x12, 0x37, 0x80]);

        let rom = Rom::new(data).unwrap();
        assert_eq!(rom.order, ByteOrder::LittleEndian);
        assert_eq!(&rom.data()[..4], &[0x80, 0x37, 0x12, 0x40]);
        assert_eq!(rom.header.title(), "UMBRA");
    }

    #[test]
    fn rejects_bad_images() {
        assert!(matches!(
            Rom::new(vec![0x80, 0x37, 0x12, 0x40]),
            Err(RomError::TooSmall { size: 4 })
        ));

        let mut data = image(ByteOrder::BigEndian);
        data[0] = 0x12;
        assert!(matches!(
            Rom::new(data),
            Err(RomError::UnknownFormat { magic: [0x12, 0x37, 0x12, 0x40] })
        ));
    }
}
