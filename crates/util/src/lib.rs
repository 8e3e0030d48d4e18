/// Returns a `Box<[T; LEN]>` filled with `elem`.
#[inline(always)]
pub fn boxed_array<T: Clone, const LEN: usize>(elem: T) -> Box<[T; LEN]> {
    let boxed = vec![elem; LEN].into_boxed_slice();
    match boxed.try_into() {
        Ok(array) => array,
        Err(_) => unreachable!("boxed slice has exactly LEN elements"),
    }
}

/// Returns a zeroed, heap allocated byte buffer of length `len`.
#[inline(always)]
pub fn boxed_bytes(len: usize) -> Box<[u8]> {
    vec![0; len].into_boxed_slice()
}

/// Sign extension of an unsigned value into a 64-bit register value.
pub trait SignExtend: Copy {
    fn sext(self) -> u64;
}

macro_rules! impl_sext {
    ($($unsigned:ty => $signed:ty),*) => {
        $(
            impl SignExtend for $unsigned {
                #[inline(always)]
                fn sext(self) -> u64 {
                    self as $signed as i64 as u64
                }
            }
        )*
    };
}

impl_sext! {
    u8 => i8,
    u16 => i16,
    u32 => i32
}
