//! Field descriptors for fixed-layout records.
//!
//! Every record that crosses the network is described once, as a static list
//! of fields. The list gives the packed size of the record and drives the
//! byte-order conversion between host-native layout (used on local storage)
//! and network order (big-endian).

/// Primitive field kinds that can appear in a packed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    /// IEEE-754 single, swapped as a 32-bit word
    F32,
}

impl Kind {
    /// Width of one element of this kind in bytes
    pub const fn width(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
        }
    }
}

/// A named field, possibly a fixed-length array of `count` elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: Kind,
    pub count: usize,
}

impl Field {
    pub const fn new(name: &'static str, kind: Kind) -> Self {
        Self {
            name,
            kind,
            count: 1,
        }
    }

    pub const fn array(name: &'static str, kind: Kind, count: usize) -> Self {
        Self { name, kind, count }
    }

    /// Packed size of the whole field in bytes
    pub const fn size(&self) -> usize {
        self.kind.width() * self.count
    }
}

/// One flattened element of a schema: where it lives and how wide it is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub offset: usize,
    pub width: usize,
    pub kind: Kind,
}

/// Packed layout of a record: fields laid out back to back, no padding
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    fields: &'static [Field],
}

impl Schema {
    pub const fn new(fields: &'static [Field]) -> Self {
        Self { fields }
    }

    pub const fn fields(&self) -> &'static [Field] {
        self.fields
    }

    /// Total packed size in bytes
    pub const fn size(&self) -> usize {
        let mut total = 0;
        let mut i = 0;
        while i < self.fields.len() {
            total += self.fields[i].size();
            i += 1;
        }
        total
    }

    /// Iterate the flattened `(offset, width, kind)` element descriptors
    pub fn descriptors(&self) -> impl Iterator<Item = Descriptor> + '_ {
        let mut offset = 0;
        self.fields.iter().flat_map(move |field| {
            let start = offset;
            offset += field.size();
            (0..field.count).map(move |i| Descriptor {
                offset: start + i * field.kind.width(),
                width: field.kind.width(),
                kind: field.kind,
            })
        })
    }

    /// Reverse the byte order of every multi-byte element in `buf`.
    ///
    /// `buf` must be at least [`Schema::size`] bytes long; trailing bytes are
    /// left untouched.
    pub fn swap(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= self.size());
        for d in self.descriptors() {
            if d.width > 1 {
                buf[d.offset..d.offset + d.width].reverse();
            }
        }
    }

    /// Convert a host-native packed buffer to network order in place
    pub fn to_network(&self, buf: &mut [u8]) {
        if cfg!(target_endian = "little") {
            self.swap(buf);
        }
    }

    /// Convert a network-order packed buffer to host-native order in place
    pub fn to_host(&self, buf: &mut [u8]) {
        if cfg!(target_endian = "little") {
            self.swap(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: Schema = Schema::new(&[
        Field::new("flag", Kind::U8),
        Field::new("count", Kind::U16),
        Field::array("values", Kind::I32, 2),
        Field::new("gain", Kind::F32),
    ]);

    #[test]
    fn test_size_is_packed_sum() {
        assert_eq!(SAMPLE.size(), 1 + 2 + 8 + 4);
    }

    #[test]
    fn test_descriptors_are_contiguous() {
        let descriptors: Vec<_> = SAMPLE.descriptors().collect();
        assert_eq!(descriptors.len(), 5);

        let mut expected_offset = 0;
        for d in &descriptors {
            assert_eq!(d.offset, expected_offset);
            expected_offset += d.width;
        }
        assert_eq!(expected_offset, SAMPLE.size());
        assert_eq!(descriptors[2].kind, Kind::I32);
        assert_eq!(descriptors[2].offset, 3);
        assert_eq!(descriptors[3].offset, 7);
    }

    #[test]
    fn test_to_network_produces_big_endian() {
        let mut buf = [0u8; 15];
        buf[0] = 0xAA;
        buf[1..3].copy_from_slice(&0x1234u16.to_ne_bytes());
        buf[3..7].copy_from_slice(&(-2i32).to_ne_bytes());
        buf[7..11].copy_from_slice(&0x0102_0304i32.to_ne_bytes());
        buf[11..15].copy_from_slice(&1.5f32.to_ne_bytes());

        SAMPLE.to_network(&mut buf);

        assert_eq!(buf[0], 0xAA);
        assert_eq!(&buf[1..3], &[0x12, 0x34]);
        assert_eq!(&buf[3..7], &(-2i32).to_be_bytes());
        assert_eq!(&buf[7..11], &[1, 2, 3, 4]);
        assert_eq!(&buf[11..15], &1.5f32.to_be_bytes());

        SAMPLE.to_host(&mut buf);
        assert_eq!(u16::from_ne_bytes([buf[1], buf[2]]), 0x1234);
    }

    const WORD: Schema = Schema::new(&[Field::new("word", Kind::U16)]);

    #[test]
    fn test_swap_leaves_trailing_padding_alone() {
        let mut buf = [1, 2, 9, 9];
        WORD.swap(&mut buf);
        assert_eq!(buf, [2, 1, 9, 9]);
    }
}
