//! Fixed-layout binary codec
//!
//! Records are packed field by field with explicit widths and no padding.
//! Packing always happens in host-native byte order; when a record crosses
//! the network its [`Schema`] converts the packed bytes to network order.
//! Local persistence (ring store, configuration file) keeps the native layout.

mod schema;

pub use schema::{Descriptor, Field, Kind, Schema};

use thiserror_no_std::Error;

/// Byte order of a packed buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Big-endian, used for everything sent over CSP
    Network,
    /// Host byte order, used for records that never leave the device
    Native,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated input: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("unknown beacon type flags {0:#04x}")]
    UnknownType(u8),
    #[error("path is not valid UTF-8 or too long")]
    InvalidPath,
    #[error("unknown command {0}")]
    UnknownCommand(u8),
}

/// Sequential writer of native-order fields into a fixed buffer
pub struct Packer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Packer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes written so far
    pub fn position(&self) -> usize {
        self.pos
    }

    fn put<const N: usize>(&mut self, bytes: [u8; N]) {
        self.buf[self.pos..self.pos + N].copy_from_slice(&bytes);
        self.pos += N;
    }

    pub fn u8(&mut self, v: u8) {
        self.put([v]);
    }

    pub fn i8(&mut self, v: i8) {
        self.put(v.to_ne_bytes());
    }

    pub fn u16(&mut self, v: u16) {
        self.put(v.to_ne_bytes());
    }

    pub fn i16(&mut self, v: i16) {
        self.put(v.to_ne_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.put(v.to_ne_bytes());
    }

    pub fn i32(&mut self, v: i32) {
        self.put(v.to_ne_bytes());
    }

    pub fn f32(&mut self, v: f32) {
        self.put(v.to_ne_bytes());
    }

    pub fn bytes(&mut self, v: &[u8]) {
        self.buf[self.pos..self.pos + v.len()].copy_from_slice(v);
        self.pos += v.len();
    }
}

/// Sequential reader of native-order fields out of a fixed buffer
pub struct Unpacker<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Unpacker<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    pub fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    pub fn i8(&mut self) -> i8 {
        i8::from_ne_bytes(self.take())
    }

    pub fn u16(&mut self) -> u16 {
        u16::from_ne_bytes(self.take())
    }

    pub fn i16(&mut self) -> i16 {
        i16::from_ne_bytes(self.take())
    }

    pub fn u32(&mut self) -> u32 {
        u32::from_ne_bytes(self.take())
    }

    pub fn i32(&mut self) -> i32 {
        i32::from_ne_bytes(self.take())
    }

    pub fn f32(&mut self) -> f32 {
        f32::from_ne_bytes(self.take())
    }

    pub fn bytes<const N: usize>(&mut self) -> [u8; N] {
        self.take()
    }
}

/// A fixed-layout record described by a [`Schema`].
///
/// Implementors only write their fields in schema order; sizing, bounds
/// checks and byte-order conversion are provided.
pub trait Section: Sized + Copy + Default {
    const SCHEMA: Schema;
    const SIZE: usize = Self::SCHEMA.size();

    fn pack(&self, p: &mut Packer<'_>);
    fn unpack(u: &mut Unpacker<'_>) -> Self;

    /// Encode into the first [`Section::SIZE`] bytes of `out`.
    ///
    /// Panics if `out` is shorter than [`Section::SIZE`].
    fn encode_into(&self, out: &mut [u8], order: ByteOrder) {
        let out = &mut out[..Self::SIZE];
        let mut p = Packer::new(out);
        self.pack(&mut p);
        debug_assert_eq!(p.position(), Self::SIZE, "pack does not match schema");
        if order == ByteOrder::Network {
            Self::SCHEMA.to_network(out);
        }
    }

    /// Decode from the first [`Section::SIZE`] bytes of `input`
    fn decode_from(input: &[u8], order: ByteOrder) -> Result<Self, DecodeError> {
        if input.len() < Self::SIZE {
            return Err(DecodeError::Truncated {
                expected: Self::SIZE,
                actual: input.len(),
            });
        }

        // Sections are small; swap a stack copy rather than the caller's buffer
        let mut scratch = [0u8; MAX_SECTION_SIZE];
        let scratch = &mut scratch[..Self::SIZE];
        scratch.copy_from_slice(&input[..Self::SIZE]);
        if order == ByteOrder::Network {
            Self::SCHEMA.to_host(scratch);
        }

        let mut u = Unpacker::new(scratch);
        let value = Self::unpack(&mut u);
        debug_assert_eq!(u.position(), Self::SIZE, "unpack does not match schema");
        Ok(value)
    }
}

/// Upper bound on the packed size of any single [`Section`]
pub const MAX_SECTION_SIZE: usize = 128;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Probe {
        a: u8,
        b: i16,
        c: u32,
        d: f32,
    }

    impl Section for Probe {
        const SCHEMA: Schema = Schema::new(&[
            Field::new("a", Kind::U8),
            Field::new("b", Kind::I16),
            Field::new("c", Kind::U32),
            Field::new("d", Kind::F32),
        ]);

        fn pack(&self, p: &mut Packer<'_>) {
            p.u8(self.a);
            p.i16(self.b);
            p.u32(self.c);
            p.f32(self.d);
        }

        fn unpack(u: &mut Unpacker<'_>) -> Self {
            Self {
                a: u.u8(),
                b: u.i16(),
                c: u.u32(),
                d: u.f32(),
            }
        }
    }

    #[test]
    fn test_network_encoding_is_big_endian() {
        let probe = Probe {
            a: 7,
            b: -2,
            c: 0xDEAD_BEEF,
            d: 0.25,
        };
        let mut buf = [0u8; 11];
        probe.encode_into(&mut buf, ByteOrder::Network);

        assert_eq!(buf[0], 7);
        assert_eq!(&buf[1..3], &[0xFF, 0xFE]);
        assert_eq!(&buf[3..7], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(&buf[7..11], &0.25f32.to_be_bytes());
    }

    #[test]
    fn test_native_encoding_matches_host_layout() {
        let probe = Probe {
            a: 1,
            b: 0x0102,
            c: 3,
            d: 4.0,
        };
        let mut buf = [0u8; 11];
        probe.encode_into(&mut buf, ByteOrder::Native);
        assert_eq!(&buf[1..3], &0x0102i16.to_ne_bytes());
        assert_eq!(Probe::decode_from(&buf, ByteOrder::Native), Ok(probe));
    }

    #[test]
    fn test_decode_rejects_truncated_input() {
        let buf = [0u8; 10];
        assert_eq!(
            Probe::decode_from(&buf, ByteOrder::Network),
            Err(DecodeError::Truncated {
                expected: 11,
                actual: 10
            })
        );
    }
}
