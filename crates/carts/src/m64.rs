//! Input movies in the `.m64` format.
//!
//! A movie is a 1024-byte little endian header followed by one 4-byte sample per controller poll.

use std::io::{Cursor, Read};

use binrw::{BinRead, BinWrite};
use easyerr::{Error, ResultExt};

const HEADER_SIZE: usize = 0x400;
const SUPPORTED_VERSION: u32 = 3;

/// Where a movie starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead, BinWrite)]
#[brw(little, repr = u16)]
pub enum StartType {
    Snapshot = 1,
    PowerOn = 2,
    Eeprom = 4,
}

#[derive(Debug, Clone, BinRead, BinWrite)]
#[brw(little, magic = b"M64\x1A")]
pub struct Header {
    pub version: u32,
    pub uid: u32,
    pub vi_frames: u32,
    pub rerecords: u32,
    pub fps: u8,
    pub controllers: u8,
    #[brw(pad_before = 2)]
    pub samples: u32,
    pub start: StartType,
    #[brw(pad_before = 2)]
    pub controller_flags: u32,
    #[brw(pad_before = 160)]
    pub rom_name: [u8; 32],
    pub rom_crc: u32,
    pub country: u16,
    #[brw(pad_before = 56 + 4 * 64)]
    pub author: [u8; 222],
    pub description: [u8; 256],
}

fn text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

impl Header {
    pub fn rom_name(&self) -> String {
        text(&self.rom_name)
    }

    pub fn author(&self) -> String {
        text(&self.author)
    }

    pub fn description(&self) -> String {
        text(&self.description)
    }
}

/// Controller state for a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sample {
    /// Buttons, D-pad right at bit 0 up to L trigger at bit 13.
    pub buttons: u16,
    pub x: i8,
    pub y: i8,
}

impl Sample {
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            buttons: u16::from_le_bytes([bytes[0], bytes[1]]),
            x: bytes[2] as i8,
            y: bytes[3] as i8,
        }
    }

    /// The sample as the four bytes a controller answers a joybus read with.
    pub fn to_joybus(self) -> [u8; 4] {
        let [lo, hi] = self.buttons.to_le_bytes();
        [lo, hi, self.x as u8, self.y as u8]
    }
}

#[derive(Debug, Error)]
pub enum MovieError {
    #[error(transparent)]
    Io { source: std::io::Error },
    #[error(transparent)]
    Header { source: binrw::Error },
    #[error("unsupported movie version {version}")]
    UnsupportedVersion { version: u32 },
    #[error("movies with {count} controllers are not supported")]
    MultipleControllers { count: u8 },
    #[error("movies starting from a snapshot are not supported")]
    StartsFromSnapshot,
    #[error("movie has {found} samples, header claims {expected}")]
    Truncated { expected: u32, found: usize },
}

#[derive(Debug, Clone)]
pub struct Movie {
    pub header: Header,
    pub samples: Vec<Sample>,
}

impl Movie {
    pub fn read(mut reader: impl Read) -> Result<Self, MovieError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).context(MovieCtx::Io)?;

        let header = Header::read(&mut Cursor::new(&data)).context(MovieCtx::Header)?;
        if header.version != SUPPORTED_VERSION {
            return Err(MovieError::UnsupportedVersion {
                version: header.version,
            });
        }

        if header.controllers > 1 {
            return Err(MovieError::MultipleControllers {
                count: header.controllers,
            });
        }

        if header.start == StartType::Snapshot {
            return Err(MovieError::StartsFromSnapshot);
        }

        let body = data.get(HEADER_SIZE..).unwrap_or_default();
        let found = body.len() / 4;
        if found < header.samples as usize {
            return Err(MovieError::Truncated {
                expected: header.samples,
                found,
            });
        }

        let samples = body
            .chunks_exact(4)
            .take(header.samples as usize)
            .map(|c| Sample::from_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        tracing::info!(
            rom = header.rom_name(),
            author = header.author(),
            samples = header.samples,
            "loaded movie"
        );

        Ok(Self { header, samples })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn movie(version: u32, controllers: u8, samples: &[[u8; 4]], declared: u32) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_SIZE];
        data[..4].copy_from_slice(b"M64\x1A");
        data[0x04..0x08].copy_from_slice(&version.to_le_bytes());
        data[0x14] = 60;
        data[0x15] = controllers;
        data[0x18..0x1C].copy_from_slice(&declared.to_le_bytes());
        data[0x1C..0x1E].copy_from_slice(&2u16.to_le_bytes());
        data[0xC4..0xC9].copy_from_slice(b"UMBRA");
        data[0x222..0x225].copy_from_slice(b"doe");

        for sample in samples {
            data.extend_from_slice(sample);
        }

        data
    }

    #[test]
    fn header_layout() {
        let data = movie(3, 1, &[], 0);
        let header = Header::read(&mut Cursor::new(&data)).unwrap();

        assert_eq!(header.fps, 60);
        assert_eq!(header.start, StartType::PowerOn);
        assert_eq!(header.rom_name(), "UMBRA");
        assert_eq!(header.author(), "doe");
    }

    #[test]
    fn reads_samples() {
        let data = movie(3, 1, &[[0x80, 0x00, 0x10, 0xF0], [0x00, 0x20, 0, 0]], 2);
        let movie = Movie::read(&data[..]).unwrap();

        assert_eq!(movie.samples.len(), 2);
        assert_eq!(movie.samples[0].buttons, 0x0080);
        assert_eq!(movie.samples[0].x, 16);
        assert_eq!(movie.samples[0].y, -16);
        assert_eq!(movie.samples[1].to_joybus(), [0x00, 0x20, 0, 0]);
    }

    #[test]
    fn rejects_unsupported_movies() {
        let data = movie(2, 1, &[], 0);
        assert!(matches!(
            Movie::read(&data[..]),
            Err(MovieError::UnsupportedVersion { version: 2 })
        ));

        let data = movie(3, 2, &[], 0);
        assert!(matches!(
            Movie::read(&data[..]),
            Err(MovieError::MultipleControllers { count: 2 })
        ));

        let data = movie(3, 1, &[[0; 4]], 3);
        assert!(matches!(
            Movie::read(&data[..]),
            Err(MovieError::Truncated {
                expected: 3,
                found: 1
            })
        ));

        let mut data = movie(3, 1, &[], 0);
        data[0] = b'X';
        assert!(matches!(Movie::read(&data[..]), Err(MovieError::Header { .. })));
    }
}
