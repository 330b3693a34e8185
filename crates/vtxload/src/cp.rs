//! Command processor vertex state.
//!
//! Each execution context (primary and preprocessing) owns one [`CpState`]. Register writes mutate
//! it and mark the affected vertex attribute groups as dirty, so that the next draw through a group
//! re-resolves its loader.
pub mod attributes;

use crate::{Address, loader::Loader};
use attributes::{TableRecord, VertexAttributeTable};
use bitos::bitos;
use std::sync::Arc;
use strum::FromRepr;

/// Number of vertex attribute groups (VAT entries).
pub const GROUP_COUNT: usize = 8;

/// Number of vertex arrays.
pub const ARRAY_COUNT: usize = 16;

/// Bits of the descriptor held by the low register.
const VCD_LOW_MASK: u32 = 0x1_FFFF;

/// Bits of the descriptor held by the high register.
const VCD_HIGH_MASK: u32 = 0xFFFF;

/// Base of a command processor register range. The low nibble of a sub-command selects a group or
/// an array inside the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum Reg {
    MatIndexLow = 0x30,
    MatIndexHigh = 0x40,
    VcdLow = 0x50,
    VcdHigh = 0x60,
    VatA = 0x70,
    VatB = 0x80,
    VatC = 0x90,
    ArrayBase = 0xA0,
    ArrayStride = 0xB0,
}

impl Reg {
    /// Address of this register (or of the first register of the range) in the register file.
    pub fn address(self) -> usize {
        self as usize
    }
}

/// A decoded command processor register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Write {
    MatrixIndexA,
    MatrixIndexB,
    VcdLow,
    VcdHigh,
    Vat { group: usize, record: TableRecord },
    ArrayBase(usize),
    ArrayStride(usize),
}

impl Write {
    /// Decodes a sub-command. Returns `None` for ranges this state does not care about.
    ///
    /// # Panics
    /// Panics if a VAT write targets a group outside `0..8`: the group comes from a 3 bit field,
    /// so anything else means the command stream is corrupted.
    pub fn decode(sub_cmd: u8) -> Option<Self> {
        let index = (sub_cmd & 0x0F) as usize;
        let vat = |record| {
            assert!(
                index < GROUP_COUNT,
                "invalid vertex attribute group in CP register write 0x{sub_cmd:02X}"
            );

            Write::Vat {
                group: index,
                record,
            }
        };

        Some(match Reg::from_repr(sub_cmd & 0xF0)? {
            Reg::MatIndexLow => Write::MatrixIndexA,
            Reg::MatIndexHigh => Write::MatrixIndexB,
            Reg::VcdLow => Write::VcdLow,
            Reg::VcdHigh => Write::VcdHigh,
            Reg::VatA => vat(TableRecord::A),
            Reg::VatB => vat(TableRecord::B),
            Reg::VatC => vat(TableRecord::C),
            Reg::ArrayBase => Write::ArrayBase(index),
            Reg::ArrayStride => Write::ArrayStride(index),
        })
    }
}

#[bitos(2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeMode {
    /// Not present
    #[default]
    None = 0b00,
    /// Directly in the vertex attribute stream
    Direct = 0b01,
    /// Indirectly through a 8 bit index in the vertex attribute stream
    Index8 = 0b10,
    /// Indirectly through a 16 bit index in the vertex attribute stream
    Index16 = 0b11,
}

impl AttributeMode {
    pub fn present(self) -> bool {
        self != AttributeMode::None
    }

    /// Size of the attribute in the stream, or `None` if it's direct (and therefore depends on the
    /// attribute format).
    pub fn size(self) -> Option<u32> {
        match self {
            Self::None => Some(0),
            Self::Direct => None,
            Self::Index8 => Some(1),
            Self::Index16 => Some(2),
        }
    }
}

/// Low half of the vertex descriptor (`0x50`).
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VcdLow {
    /// Whether the position/normal matrix index is present.
    #[bits(0)]
    pub pos_mat_index: bool,
    /// Whether the texture coordinate matrix N index is present.
    #[bits(1..9)]
    pub tex_coord_mat_index: [bool; 8],
    #[bits(9..11)]
    pub position: AttributeMode,
    #[bits(11..13)]
    pub normal: AttributeMode,
    #[bits(13..15)]
    pub diffuse: AttributeMode,
    #[bits(15..17)]
    pub specular: AttributeMode,
}

/// High half of the vertex descriptor (`0x60`).
#[bitos(32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VcdHigh {
    #[bits(0..16)]
    pub tex_coord: [AttributeMode; 8],
}

/// Describes which attributes are present in the vertices of primitives and how they are present.
///
/// The descriptor is 33 bits wide and is written through two registers, so it is kept as the pair
/// of records those registers hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexDescriptor {
    pub low: VcdLow,
    pub high: VcdHigh,
}

impl VertexDescriptor {
    pub fn set_low(&mut self, value: u32) {
        self.low = VcdLow::from_bits(value & VCD_LOW_MASK);
    }

    pub fn set_high(&mut self, value: u32) {
        self.high = VcdHigh::from_bits(value & VCD_HIGH_MASK);
    }

    pub fn tex_coord(&self, index: usize) -> AttributeMode {
        self.high.tex_coord_at(index).unwrap()
    }

    pub fn tex_coord_mat_index(&self, index: usize) -> bool {
        self.low.tex_coord_mat_index_at(index).unwrap()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayDescriptor {
    pub address: Address,
    pub stride: u32,
}

/// The vertex array table.
#[derive(Debug, Clone, Copy, Default)]
pub struct Arrays(pub [ArrayDescriptor; ARRAY_COUNT]);

/// Set of vertex attribute groups whose loader needs to be resolved again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtySet(u8);

impl DirtySet {
    pub const ALL: Self = Self(0xFF);

    pub fn mark_all(&mut self) {
        *self = Self::ALL;
    }

    pub fn mark(&mut self, group: usize) {
        self.0 |= 1 << group;
    }

    pub fn clear(&mut self, group: usize) {
        self.0 &= !(1 << group);
    }

    pub fn is_dirty(&self, group: usize) -> bool {
        self.0 & (1 << group) != 0
    }

    pub fn bits(&self) -> u8 {
        self.0
    }
}

/// Vertex related command processor state of a single execution context.
#[derive(Debug, Default)]
pub struct CpState {
    pub vertex_descriptor: VertexDescriptor,
    pub vertex_attr_tables: [VertexAttributeTable; GROUP_COUNT],
    pub arrays: Arrays,
    pub matrix_index_a: u32,
    pub matrix_index_b: u32,
    pub dirty: DirtySet,
    /// Resolved loader of each group. Only meaningful while the group is not dirty.
    pub(crate) loaders: [Option<Arc<Loader>>; GROUP_COUNT],
    /// Generation of the loader cache the resolved loaders belong to.
    pub(crate) generation: u64,
}

impl CpState {
    pub fn new() -> Self {
        Self {
            dirty: DirtySet::ALL,
            ..Default::default()
        }
    }

    /// Drops every resolved loader and marks all groups as dirty.
    pub fn reset_loaders(&mut self) {
        self.loaders = Default::default();
        self.dirty.mark_all();
    }

    /// Applies a register write. Returns the decoded write so the owner of this state can apply
    /// context specific side effects, or `None` if the sub-command was ignored.
    pub fn write(&mut self, sub_cmd: u8, value: u32) -> Option<Write> {
        let Some(write) = Write::decode(sub_cmd) else {
            tracing::trace!("ignoring write to CP register 0x{sub_cmd:02X}");
            return None;
        };

        match write {
            Write::MatrixIndexA => self.matrix_index_a = value,
            Write::MatrixIndexB => self.matrix_index_b = value,
            Write::VcdLow => {
                self.vertex_descriptor.set_low(value);
                self.dirty.mark_all();
            }
            Write::VcdHigh => {
                self.vertex_descriptor.set_high(value);
                self.dirty.mark_all();
            }
            Write::Vat { group, record } => {
                self.vertex_attr_tables[group].set(record, value);
                self.dirty.mark(group);
            }
            Write::ArrayBase(index) => self.arrays.0[index].address = Address(value),
            Write::ArrayStride(index) => self.arrays.0[index].stride = value & 0xFF,
        }

        Some(write)
    }
}
