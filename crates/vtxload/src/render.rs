//! Interfaces of the collaborators the vertex loader manager drives.
//!
//! These are implemented by the renderer and by the emulator core. None of them perform emulation
//! themselves.
use crate::{Address, loader::PortableVertexDeclaration};
use bitos::bitos;
use std::any::Any;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    QuadList,
    TriangleList,
    TriangleStrip,
    TriangleFan,
    LineList,
    LineStrip,
    PointList,
}

impl Topology {
    /// Whether primitives of this topology have a face and can therefore be culled.
    pub fn is_polygon(self) -> bool {
        matches!(
            self,
            Self::QuadList | Self::TriangleList | Self::TriangleStrip | Self::TriangleFan
        )
    }
}

#[bitos(2)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullingMode {
    #[default]
    None = 0b00,
    Negative = 0b01,
    Positive = 0b10,
    All = 0b11,
}

/// The renderer side of vertex loading: native format creation and the vertex batch.
pub trait VertexSink: Send {
    /// Creates the renderer object backing a native vertex format with the given declaration.
    fn create_native_format(
        &mut self,
        declaration: &PortableVertexDeclaration,
    ) -> Box<dyn Any + Send + Sync>;

    /// Returns a buffer with room for `count` vertices of the given stride, appended to the
    /// current batch.
    fn prepare(&mut self, topology: Topology, count: u32, stride: u32) -> &mut [u8];

    /// Commits `count` vertices written to the buffer returned by the last [`prepare`].
    ///
    /// [`prepare`]: VertexSink::prepare
    fn commit(&mut self, count: u32, stride: u32);

    /// Flushes the current batch.
    fn flush(&mut self);
}

/// Generates indices for the vertices of the current batch.
pub trait IndexGenerator: Send {
    fn add_indices(&mut self, topology: Topology, count: u32);
}

/// Emulated memory, as seen by vertex arrays.
pub trait Memory: Send {
    /// Translates an emulated address into an offset in [`Memory::host`].
    fn translate(&self, address: Address) -> Option<usize>;

    /// Host memory backing the emulated memory.
    fn host(&self) -> &[u8];
}

/// Receives the matrix index registers, which the transform unit cares about.
pub trait TexMatrixNotifier: Send {
    fn matrix_index_a_changed(&mut self, value: u32);
    fn matrix_index_b_changed(&mut self, value: u32);
}

/// An implementation of [`TexMatrixNotifier`] that does nothing.
pub struct NopTexMatrixNotifier;

impl TexMatrixNotifier for NopTexMatrixNotifier {
    fn matrix_index_a_changed(&mut self, _: u32) {}
    fn matrix_index_b_changed(&mut self, _: u32) {}
}

/// An implementation of [`Memory`] over a flat RAM buffer, mapped at the physical and cached
/// address spaces.
pub struct FlatMemory {
    ram: Vec<u8>,
}

impl FlatMemory {
    pub fn new(ram: Vec<u8>) -> Self {
        Self { ram }
    }
}

impl Memory for FlatMemory {
    fn translate(&self, address: Address) -> Option<usize> {
        // strip the segment bits, physical and virtual mirrors map to the same bytes
        let offset = (address.0 & 0x3FFF_FFFF) as usize;
        (offset < self.ram.len()).then_some(offset)
    }

    fn host(&self) -> &[u8] {
        &self.ram
    }
}
