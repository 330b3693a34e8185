//! Vertex loaders: routines decoding a raw vertex attribute stream into a native vertex format.
use crate::{
    cache::NativeVertexFormat,
    cp::{ARRAY_COUNT, VertexDescriptor, attributes::VertexAttributeTable},
    render::Topology,
};
use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicU64, Ordering},
};

/// Identity of a vertex loader: the vertex descriptor together with the attribute table of one
/// group. Two configurations with the same bits always map to the same loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LoaderUid {
    pub vcd: VertexDescriptor,
    pub vat: VertexAttributeTable,
}

/// Type of the components of an attribute in a native vertex format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComponentType {
    #[default]
    U8,
    I8,
    U16,
    I16,
    F32,
}

impl ComponentType {
    pub fn size(self) -> u32 {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::F32 => 4,
        }
    }
}

/// Placement of a single attribute inside a native vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AttributeFormat {
    pub ty: ComponentType,
    pub components: u32,
    pub offset: u32,
    pub enabled: bool,
    /// Whether the attribute is read as an integer rather than normalized.
    pub integer: bool,
}

impl AttributeFormat {
    pub fn size(&self) -> u32 {
        self.ty.size() * self.components
    }
}

/// Renderer agnostic description of a native vertex. Native formats are deduplicated by this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PortableVertexDeclaration {
    pub stride: u32,
    pub position: AttributeFormat,
    pub normals: [AttributeFormat; 3],
    pub colors: [AttributeFormat; 2],
    pub tex_coords: [AttributeFormat; 8],
    pub pos_mat_index: AttributeFormat,
}

/// Which channels a loader writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Components {
    pub pos_mat_index: bool,
    pub tex_mat_index: [bool; 8],
    pub position: bool,
    pub normals: [bool; 3],
    pub colors: [bool; 2],
    pub tex_coords: [bool; 8],
}

/// A vertex array, translated to host memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArrayRef {
    /// Offset of the array in host memory, if the base address is mapped.
    pub base: Option<usize>,
    pub stride: u32,
}

/// Context in which a loader runs.
#[derive(Clone, Copy)]
pub struct Ctx<'ctx> {
    /// Host memory indexed attributes are read from.
    pub ram: &'ctx [u8],
    pub arrays: &'ctx [ArrayRef; ARRAY_COUNT],
}

/// A routine which decodes vertices of a single configuration.
pub trait VertexLoader: Send + Sync {
    /// Size of a vertex in the attribute stream.
    fn vertex_size(&self) -> u32;

    /// Layout of the vertices this loader writes.
    fn declaration(&self) -> &PortableVertexDeclaration;

    fn components(&self) -> Components;

    /// Decodes `count` vertices from `src` into `dst`, returning how many vertices were written.
    ///
    /// `src` holds at least `count * vertex_size()` bytes and `dst` at least `count` native
    /// vertices.
    fn run(&self, ctx: Ctx<'_>, topology: Topology, count: u32, src: &[u8], dst: &mut [u8]) -> u32;

    /// A short human readable description, used for diagnostics.
    fn describe(&self) -> String;
}

/// Creates vertex loaders for configurations.
pub trait DecoderFactory: Send + Sync {
    fn create(&self, uid: &LoaderUid) -> Box<dyn VertexLoader>;
}

/// A cached vertex loader.
pub struct Loader {
    uid: LoaderUid,
    inner: Box<dyn VertexLoader>,
    native: OnceLock<Arc<NativeVertexFormat>>,
    loaded: AtomicU64,
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("uid", &self.uid)
            .field("loader", &self.inner.describe())
            .field("native", &self.native.get().is_some())
            .field("loaded", &self.loaded())
            .finish()
    }
}

impl Loader {
    pub(crate) fn new(uid: LoaderUid, inner: Box<dyn VertexLoader>) -> Self {
        Self {
            uid,
            inner,
            native: OnceLock::new(),
            loaded: AtomicU64::new(0),
        }
    }

    pub fn uid(&self) -> &LoaderUid {
        &self.uid
    }

    pub fn vertex_size(&self) -> u32 {
        self.inner.vertex_size()
    }

    pub fn declaration(&self) -> &PortableVertexDeclaration {
        self.inner.declaration()
    }

    pub fn components(&self) -> Components {
        self.inner.components()
    }

    pub fn describe(&self) -> String {
        self.inner.describe()
    }

    /// The native format of this loader. Only set once the loader has been resolved by the
    /// primary context.
    pub fn native_format(&self) -> Option<&Arc<NativeVertexFormat>> {
        self.native.get()
    }

    /// Attaches a native format. Must only be called with the cache lock held.
    pub(crate) fn attach_native_format(&self, format: Arc<NativeVertexFormat>) {
        let attached = self.native.set(format).is_ok();
        debug_assert!(attached, "native format attached twice");
    }

    /// How many vertices have been loaded through this loader.
    pub fn loaded(&self) -> u64 {
        self.loaded.load(Ordering::Relaxed)
    }

    pub(crate) fn run(
        &self,
        ctx: Ctx<'_>,
        topology: Topology,
        count: u32,
        src: &[u8],
        dst: &mut [u8],
    ) -> u32 {
        let emitted = self.inner.run(ctx, topology, count, src, dst);
        self.loaded.fetch_add(emitted as u64, Ordering::Relaxed);
        emitted
    }
}
