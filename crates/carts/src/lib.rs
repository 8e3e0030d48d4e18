//! Parsers for Nintendo 64 file formats.

pub mod m64;
pub mod rom;

pub use binrw;
