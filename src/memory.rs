//! Fixed-size memory images read from the chip.
//!
//! Both images are immutable once built. Construction is the only place the
//! length invariant is checked, so analyzers and exporters can rely on it.

use crate::error::{AppResult, ReaderError};

/// Size of the main data memory.
pub const DATA_MEMORY_SIZE: usize = 8192;
/// Size of the status memory.
pub const STATUS_MEMORY_SIZE: usize = 256;
/// Usage and protection granularity.
pub const PAGE_SIZE: usize = 32;
/// Pages in the data memory.
pub const PAGE_COUNT: usize = DATA_MEMORY_SIZE / PAGE_SIZE;

/// The 8 KiB data memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataImage(Vec<u8>);

/// The 256-byte status memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusImage(Vec<u8>);

macro_rules! fixed_image {
    ($ty:ident, $size:expr, $kind:literal) => {
        impl $ty {
            pub const SIZE: usize = $size;
            pub const KIND: &'static str = $kind;

            /// Take ownership of `bytes` if it has exactly the image size.
            pub fn new(bytes: Vec<u8>) -> AppResult<Self> {
                if bytes.len() != Self::SIZE {
                    return Err(ReaderError::LengthMismatch {
                        kind: Self::KIND,
                        expected: Self::SIZE,
                        actual: bytes.len(),
                    });
                }
                Ok(Self(bytes))
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn into_bytes(self) -> Vec<u8> {
                self.0
            }
        }

        impl TryFrom<Vec<u8>> for $ty {
            type Error = ReaderError;

            fn try_from(bytes: Vec<u8>) -> AppResult<Self> {
                Self::new(bytes)
            }
        }

        impl AsRef<[u8]> for $ty {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

fixed_image!(DataImage, DATA_MEMORY_SIZE, "data memory");
fixed_image!(StatusImage, STATUS_MEMORY_SIZE, "status memory");

impl DataImage {
    /// An unprogrammed chip: every bit still 1.
    pub fn blank() -> Self {
        Self(vec![0xFF; DATA_MEMORY_SIZE])
    }

    /// The 32 bytes of `page`, if it exists.
    pub fn page(&self, page: usize) -> Option<&[u8]> {
        let start = page.checked_mul(PAGE_SIZE)?;
        self.0.get(start..start + PAGE_SIZE)
    }
}

impl StatusImage {
    /// Status memory with no protection or redirection set.
    pub fn blank() -> Self {
        Self(vec![0xFF; STATUS_MEMORY_SIZE])
    }
}
