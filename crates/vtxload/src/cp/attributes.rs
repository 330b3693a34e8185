//! Vertex attribute table (VAT) records.
use bitos::{bitos, integer::u5};

#[bitos(1)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionKind {
    /// Two components (x, y).
    #[default]
    Vec2 = 0b0,
    /// Three components (x, y, z).
    Vec3 = 0b1,
}

#[bitos(3)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordsFormat {
    #[default]
    U8 = 0b000,
    I8 = 0b001,
    U16 = 0b010,
    I16 = 0b011,
    F32 = 0b100,
    Reserved0 = 0b101,
    Reserved1 = 0b110,
    Reserved2 = 0b111,
}

impl CoordsFormat {
    /// Size of a single component in this format, or `None` if the format is reserved.
    pub fn size(self) -> Option<u32> {
        Some(match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::F32 => 4,
            _ => return None,
        })
    }
}

#[bitos(9)]
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionDescriptor {
    #[bits(0)]
    pub kind: PositionKind,
    #[bits(1..4)]
    pub format: CoordsFormat,
    #[bits(4..9)]
    pub shift: u5,
}

impl PositionDescriptor {
    pub fn components(&self) -> u32 {
        match self.kind() {
            PositionKind::Vec2 => 2,
            PositionKind::Vec3 => 3,
        }
    }

    /// Size of a direct position in an attribute stream.
    pub fn size(&self) -> u32 {
        self.components() * self.format().size().unwrap_or(0)
    }
}

#[bitos(1)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalKind {
    /// A single normal.
    #[default]
    N3 = 0b0,
    /// Normal, binormal and tangent.
    N9 = 0b1,
}

#[bitos(3)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NormalFormat {
    Reserved0 = 0b000,
    #[default]
    I8 = 0b001,
    Reserved1 = 0b010,
    I16 = 0b011,
    F32 = 0b100,
    Reserved2 = 0b101,
    Reserved3 = 0b110,
    Reserved4 = 0b111,
}

impl NormalFormat {
    pub fn size(self) -> Option<u32> {
        Some(match self {
            Self::I8 => 1,
            Self::I16 => 2,
            Self::F32 => 4,
            _ => return None,
        })
    }
}

#[bitos(4)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalDescriptor {
    #[bits(0)]
    pub kind: NormalKind,
    #[bits(1..4)]
    pub format: NormalFormat,
}

impl NormalDescriptor {
    /// How many vectors this descriptor describes.
    pub fn vectors(&self) -> u32 {
        match self.kind() {
            NormalKind::N3 => 1,
            NormalKind::N9 => 3,
        }
    }

    pub fn size(&self) -> u32 {
        3 * self.vectors() * self.format().size().unwrap_or(0)
    }
}

#[bitos(1)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorKind {
    /// Three components (r, g, b).
    #[default]
    Rgb = 0b0,
    /// Four components (r, g, b, a).
    Rgba = 0b1,
}

#[bitos(3)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorFormat {
    #[default]
    Rgb565 = 0b000,
    Rgb888 = 0b001,
    Rgb888x = 0b010,
    Rgba4444 = 0b011,
    Rgba6666 = 0b100,
    Rgba8888 = 0b101,
    Reserved0 = 0b110,
    Reserved1 = 0b111,
}

impl ColorFormat {
    pub fn size(self) -> Option<u32> {
        Some(match self {
            Self::Rgb565 | Self::Rgba4444 => 2,
            Self::Rgb888 | Self::Rgba6666 => 3,
            Self::Rgb888x | Self::Rgba8888 => 4,
            _ => return None,
        })
    }
}

#[bitos(4)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ColorDescriptor {
    #[bits(0)]
    pub kind: ColorKind,
    #[bits(1..4)]
    pub format: ColorFormat,
}

impl ColorDescriptor {
    pub fn size(&self) -> u32 {
        self.format().size().unwrap_or(0)
    }
}

#[bitos(1)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TexCoordsKind {
    /// One component (s).
    #[default]
    Vec1 = 0b0,
    /// Two components (s, t).
    Vec2 = 0b1,
}

#[bitos(9)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TexCoordsDescriptor {
    #[bits(0)]
    pub kind: TexCoordsKind,
    #[bits(1..4)]
    pub format: CoordsFormat,
    #[bits(4..9)]
    pub shift: u5,
}

impl TexCoordsDescriptor {
    pub fn components(&self) -> u32 {
        match self.kind() {
            TexCoordsKind::Vec1 => 1,
            TexCoordsKind::Vec2 => 2,
        }
    }

    pub fn size(&self) -> u32 {
        self.components() * self.format().size().unwrap_or(0)
    }
}

/// First VAT record (`0x70 + group`).
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexAttributeTableA {
    #[bits(0..9)]
    pub position: PositionDescriptor,
    #[bits(9..13)]
    pub normal: NormalDescriptor,
    #[bits(13..17)]
    pub diffuse: ColorDescriptor,
    #[bits(17..21)]
    pub specular: ColorDescriptor,
    #[bits(21..30)]
    pub tex0: TexCoordsDescriptor,
    #[bits(30)]
    pub byte_dequant: bool,
    #[bits(31)]
    pub normal_index: bool,
}

/// Second VAT record (`0x80 + group`).
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexAttributeTableB {
    #[bits(0..27)]
    pub tex1to3: [TexCoordsDescriptor; 3],

    #[bits(27)]
    pub tex4_kind: TexCoordsKind,
    #[bits(28..31)]
    pub tex4_format: CoordsFormat,

    #[bits(31)]
    pub vcache_enhance: bool,
}

/// Third VAT record (`0x90 + group`).
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexAttributeTableC {
    #[bits(0..5)]
    pub tex4_shift: u5,
    #[bits(5..32)]
    pub tex5to7: [TexCoordsDescriptor; 3],
}

/// Which of the three records of a VAT group a register write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableRecord {
    A,
    B,
    C,
}

/// The attribute format of a single vertex attribute group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexAttributeTable {
    pub a: VertexAttributeTableA,
    pub b: VertexAttributeTableB,
    pub c: VertexAttributeTableC,
}

impl VertexAttributeTable {
    pub fn set(&mut self, record: TableRecord, value: u32) {
        match record {
            TableRecord::A => self.a = VertexAttributeTableA::from_bits(value),
            TableRecord::B => self.b = VertexAttributeTableB::from_bits(value),
            TableRecord::C => self.c = VertexAttributeTableC::from_bits(value),
        }
    }

    pub fn get(&self, record: TableRecord) -> u32 {
        match record {
            TableRecord::A => self.a.to_bits(),
            TableRecord::B => self.b.to_bits(),
            TableRecord::C => self.c.to_bits(),
        }
    }

    /// Returns the descriptor of the texture coordinate attribute with the given index.
    pub fn tex(&self, index: usize) -> Option<TexCoordsDescriptor> {
        Some(match index {
            0 => self.a.tex0(),
            1..4 => self.b.tex1to3_at(index - 1)?,
            4 => TexCoordsDescriptor::default()
                .with_kind(self.b.tex4_kind())
                .with_format(self.b.tex4_format())
                .with_shift(self.c.tex4_shift()),
            5..8 => self.c.tex5to7_at(index - 5)?,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn records_round_trip_through_registers() {
        let mut vat = VertexAttributeTable::default();
        vat.set(TableRecord::A, 0x4000_0009);
        vat.set(TableRecord::B, 0x8000_0001);
        vat.set(TableRecord::C, 0x0000_001F);

        assert_eq!(vat.get(TableRecord::A), 0x4000_0009);
        assert_eq!(vat.get(TableRecord::B), 0x8000_0001);
        assert_eq!(vat.get(TableRecord::C), 0x0000_001F);
    }

    #[test]
    fn float_vec3_position() {
        // kind = vec3, format = f32
        let vat = VertexAttributeTable {
            a: VertexAttributeTableA::from_bits(0b1001),
            ..Default::default()
        };

        let position = vat.a.position();
        assert_eq!(position.kind(), PositionKind::Vec3);
        assert_eq!(position.format(), CoordsFormat::F32);
        assert_eq!(position.size(), 12);
    }

    #[test]
    fn tex4_is_split_across_records() {
        // tex4: vec2, i16, shift 7
        let vat = VertexAttributeTable {
            b: VertexAttributeTableB::from_bits((1 << 27) | (0b011 << 28)),
            c: VertexAttributeTableC::from_bits(7),
            ..Default::default()
        };

        let tex4 = vat.tex(4).unwrap();
        assert_eq!(tex4.kind(), TexCoordsKind::Vec2);
        assert_eq!(tex4.format(), CoordsFormat::I16);
        assert_eq!(tex4.shift().value(), 7);
        assert_eq!(tex4.size(), 4);
        assert!(vat.tex(8).is_none());
    }

    #[test]
    fn reserved_formats_have_no_size() {
        assert_eq!(CoordsFormat::Reserved1.size(), None);
        assert_eq!(NormalFormat::Reserved0.size(), None);
        assert_eq!(ColorFormat::Reserved1.size(), None);
    }
}
