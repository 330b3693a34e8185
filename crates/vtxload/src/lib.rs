//! Vertex loader manager.
//!
//! Turns command processor register writes and raw vertex attribute streams into native vertex
//! data for the renderer. Loaders (vertex decoding routines) are cached by configuration and
//! native vertex formats by layout, both in a [`LoaderCache`](cache::LoaderCache) shared by the
//! primary context ([`VertexLoaderManager`]) and the preprocessing context ([`Preprocessor`]).
pub mod cache;
pub mod cp;
pub mod interpreter;
pub mod loader;
pub mod render;

mod manager;
mod preprocess;

use render::{IndexGenerator, Memory, TexMatrixNotifier, VertexSink};

pub use manager::{FrameStats, RunError, VertexLoaderManager};
pub use preprocess::Preprocessor;

/// A memory address. This is a thin wrapper around a [`u32`].
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Address(pub u32);

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "0x{:04X}_{:04X}",
            (self.0 & 0xFFFF_0000) >> 16,
            self.0 & 0xFFFF
        )
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// Collaborators of the primary context.
pub struct Modules {
    pub sink: Box<dyn VertexSink>,
    pub indices: Box<dyn IndexGenerator>,
    pub memory: Box<dyn Memory>,
    pub tex_matrices: Box<dyn TexMatrixNotifier>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Whether polygons are dropped without decoding when the culling mode culls everything.
    pub skip_culled_polygons: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            skip_culled_polygons: true,
        }
    }
}
