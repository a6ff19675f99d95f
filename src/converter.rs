//! Fixed-width integer codec.
//!
//! The binary protocol stores every multi-byte integer in network (big-endian)
//! order. [`ByteConverter`] reads and writes those integers at explicit offsets
//! inside a caller owned buffer, which is how operations assemble their extras.
//!
//! # Example
//! ```rust
//! use floe::converter::{ByteConverter, DefaultConverter};
//!
//! let mut extras = [0_u8; 4];
//! DefaultConverter.from_u32(3600, &mut extras, 0);
//! assert_eq!(extras, [0x00, 0x00, 0x0e, 0x10]);
//! assert_eq!(DefaultConverter.to_u32(&extras, 0), 3600);
//! ```
//!
//! # Panics
//!
//! Offsets are computed by the framing code from fixed layouts, so an offset
//! that does not leave room for the integer is a programming error and panics.

const U16_SIZE: usize = size_of::<u16>();
const U32_SIZE: usize = size_of::<u32>();
const U64_SIZE: usize = size_of::<u64>();

/// Encodes and decodes integers at byte offsets in protocol order.
pub trait ByteConverter: Send + Sync {
    fn from_u16(&self, value: u16, buf: &mut [u8], offset: usize);
    fn from_u32(&self, value: u32, buf: &mut [u8], offset: usize);
    fn from_u64(&self, value: u64, buf: &mut [u8], offset: usize);

    fn to_u16(&self, buf: &[u8], offset: usize) -> u16;
    fn to_u32(&self, buf: &[u8], offset: usize) -> u32;
    fn to_u64(&self, buf: &[u8], offset: usize) -> u64;
}

/// Big-endian converter used by the binary protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConverter;

impl ByteConverter for DefaultConverter {
    fn from_u16(&self, value: u16, buf: &mut [u8], offset: usize) {
        buf[offset..offset + U16_SIZE].clone_from_slice(value.to_be_bytes().as_ref());
    }

    fn from_u32(&self, value: u32, buf: &mut [u8], offset: usize) {
        buf[offset..offset + U32_SIZE].clone_from_slice(value.to_be_bytes().as_ref());
    }

    fn from_u64(&self, value: u64, buf: &mut [u8], offset: usize) {
        buf[offset..offset + U64_SIZE].clone_from_slice(value.to_be_bytes().as_ref());
    }

    fn to_u16(&self, buf: &[u8], offset: usize) -> u16 {
        u16::from_be_bytes(
            buf[offset..offset + U16_SIZE]
                .try_into()
                .expect("slice is exactly two bytes"),
        )
    }

    fn to_u32(&self, buf: &[u8], offset: usize) -> u32 {
        u32::from_be_bytes(
            buf[offset..offset + U32_SIZE]
                .try_into()
                .expect("slice is exactly four bytes"),
        )
    }

    fn to_u64(&self, buf: &[u8], offset: usize) -> u64 {
        u64::from_be_bytes(
            buf[offset..offset + U64_SIZE]
                .try_into()
                .expect("slice is exactly eight bytes"),
        )
    }
}
