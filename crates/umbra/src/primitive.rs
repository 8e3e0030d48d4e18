use zerocopy::{FromBytes, Immutable, IntoBytes};

/// Trait for memory primitives.
///
/// A primitive is either a byte, half-word, word or double word.
/// That is, [`u8`], [`i8`], [`u16`], [`i16`], [`u32`], [`i32`], [`u64`] or [`i64`].
pub trait Primitive:
    std::fmt::Debug
    + std::fmt::UpperHex
    + Copy
    + Immutable
    + FromBytes
    + IntoBytes
    + Default
    + Send
    + Sync
    + 'static
{
    /// Reads a value of this primitive from the bytes of a buffer (in big endian). If `buf` does
    /// not contain enough data, it's going to be completed with zeros.
    fn read_be_bytes(buf: &[u8]) -> Self;

    /// Writes this primitive to the given buffer (in big endian). If `buf` is not big enough,
    /// remaining bytes are going to be silently dropped.
    fn write_be_bytes(self, buf: &mut [u8]);

    /// Zero extends this primitive into a `u64`.
    fn zext(self) -> u64;

    /// Truncates a `u64` into this primitive.
    fn truncate(value: u64) -> Self;
}

macro_rules! impl_primitive {
    ($($type:ty => $unsigned:ty),*) => {
        $(
            impl Primitive for $type {
                #[inline(always)]
                fn read_be_bytes(buf: &[u8]) -> Self {
                    const SELF_SIZE: usize = size_of::<$type>();

                    /// Unhappy path for when `buf` is too small.
                    #[cold]
                    #[inline(never)]
                    fn read_unhappy(buf: &[u8]) -> $type {
                        let mut read_buf = [0u8; SELF_SIZE];
                        read_buf[..buf.len()].copy_from_slice(buf);
                        <$type>::from_be_bytes(read_buf)
                    }

                    match buf.first_chunk::<SELF_SIZE>() {
                        Some(bytes) => <$type>::from_be_bytes(*bytes),
                        None => read_unhappy(buf),
                    }
                }

                #[inline(always)]
                fn write_be_bytes(self, buf: &mut [u8]) {
                    const SELF_SIZE: usize = size_of::<$type>();

                    /// Unhappy path for when `buf` is too small.
                    #[cold]
                    #[inline(never)]
                    fn write_unhappy(value: $type, buf: &mut [u8]) {
                        let bytes = value.to_be_bytes();
                        let len = buf.len();
                        buf.copy_from_slice(&bytes[..len]);
                    }

                    match buf.first_chunk_mut::<SELF_SIZE>() {
                        Some(bytes) => *bytes = self.to_be_bytes(),
                        None => write_unhappy(self, buf),
                    }
                }

                #[inline(always)]
                fn zext(self) -> u64 {
                    self as $unsigned as u64
                }

                #[inline(always)]
                fn truncate(value: u64) -> Self {
                    value as $type
                }
            }
        )*
    };
}

impl_primitive!(
    u8 => u8,
    i8 => u8,
    u16 => u16,
    i16 => u16,
    u32 => u32,
    i32 => u32,
    u64 => u64,
    i64 => u64
);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn short_buffers() {
        assert_eq!(u32::read_be_bytes(&[0x12, 0x34]), 0x1234_0000);

        let mut buf = [0u8; 2];
        0xAABB_CCDDu32.write_be_bytes(&mut buf);
        assert_eq!(buf, [0xAA, 0xBB]);
    }

    #[test]
    fn extension() {
        assert_eq!((-1i8).zext(), 0xFF);
        assert_eq!(i16::truncate(0x1_8000), i16::MIN);
    }
}
