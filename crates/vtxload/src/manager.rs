use crate::{
    Address, Config, Modules,
    cache::{Context, LoaderCache, NativeVertexFormat},
    cp::{ARRAY_COUNT, CpState, Reg, Write, attributes::TableRecord},
    loader::{ArrayRef, Ctx, Loader},
    render::{CullingMode, Topology},
};
use easyerr::Error;
use std::sync::Arc;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("vertex stream needs {required} bytes but only {available} are available")]
    InsufficientData { required: usize, available: usize },
}

/// Per frame statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    /// Vertices sent to the renderer.
    pub primitives: u64,
    /// Batches of vertices sent to the renderer.
    pub primitive_joins: u64,
}

/// The primary vertex loading context. Owns the renderer side of vertex loading.
pub struct VertexLoaderManager {
    cache: Arc<LoaderCache>,
    modules: Modules,
    config: Config,
    state: CpState,
    culling_mode: CullingMode,
    /// Native format of the batch currently being built.
    current_format: Option<Arc<NativeVertexFormat>>,
    /// Array bases translated to host memory.
    array_bases: [Option<usize>; ARRAY_COUNT],
    frame: FrameStats,
}

impl VertexLoaderManager {
    pub fn new(cache: Arc<LoaderCache>, modules: Modules, config: Config) -> Self {
        let mut manager = Self {
            cache,
            modules,
            config,
            state: CpState::new(),
            culling_mode: CullingMode::None,
            current_format: None,
            array_bases: [None; ARRAY_COUNT],
            frame: FrameStats::default(),
        };

        manager.init();
        manager
    }

    /// Drops the resolved loaders of every context sharing this cache and recomputes the array
    /// bases. Must be called after the register state was replaced wholesale, e.g. by a state load.
    pub fn init(&mut self) {
        self.cache.invalidate();
        self.state.reset_loaders();
        self.recompute_array_bases();
    }

    /// Clears the shared caches. Loaders and native formats obtained before this call must not be
    /// used anymore.
    pub fn shutdown(&mut self) {
        self.cache.clear();
        self.state.reset_loaders();
        self.current_format = None;
    }

    pub fn cache(&self) -> &Arc<LoaderCache> {
        &self.cache
    }

    pub fn state(&self) -> &CpState {
        &self.state
    }

    /// Marks every group of the primary context as dirty. Use [`VertexLoaderManager::init`] to
    /// reach every context sharing the cache.
    pub fn mark_all_dirty(&mut self) {
        self.state.dirty.mark_all();
    }

    pub fn set_culling_mode(&mut self, mode: CullingMode) {
        self.culling_mode = mode;
    }

    /// Native format of the batch currently being built.
    pub fn current_format(&self) -> Option<&Arc<NativeVertexFormat>> {
        self.current_format.as_ref()
    }

    /// Host memory offset of the given vertex array.
    pub fn array_base(&self, index: usize) -> Option<usize> {
        self.array_bases[index]
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.frame
    }

    /// Returns the statistics of the current frame and starts a new one.
    pub fn take_frame_stats(&mut self) -> FrameStats {
        std::mem::take(&mut self.frame)
    }

    /// Writes to a command processor register.
    pub fn load_cp_reg(&mut self, sub_cmd: u8, value: u32) {
        match self.state.write(sub_cmd, value) {
            Some(Write::MatrixIndexA) => self.modules.tex_matrices.matrix_index_a_changed(value),
            Some(Write::MatrixIndexB) => self.modules.tex_matrices.matrix_index_b_changed(value),
            Some(Write::ArrayBase(index)) => {
                self.array_bases[index] = self.modules.memory.translate(Address(value));
            }
            _ => (),
        }
    }

    fn refresh(&mut self, group: usize) -> Arc<Loader> {
        self.cache.refresh(
            &mut self.state,
            group,
            Context::Primary(&mut *self.modules.sink),
        )
    }

    /// Size of a vertex of the given group in the attribute stream.
    pub fn vertex_size(&mut self, group: usize) -> u32 {
        self.refresh(group).vertex_size()
    }

    /// Decodes `count` vertices of the given group from `src` and sends them to the renderer.
    ///
    /// Returns how many bytes of `src` the vertices occupy, which is also the case when they end
    /// up not being drawn. If `src` does not hold all of them, nothing happens and
    /// [`RunError::InsufficientData`] is returned.
    pub fn run_vertices(
        &mut self,
        group: usize,
        topology: Topology,
        count: u32,
        src: &[u8],
        skip_drawing: bool,
    ) -> Result<usize, RunError> {
        if count == 0 {
            return Ok(0);
        }

        let loader = self.refresh(group);
        let required = count as usize * loader.vertex_size() as usize;
        if src.len() < required {
            return Err(RunError::InsufficientData {
                required,
                available: src.len(),
            });
        }

        let culled = self.config.skip_culled_polygons
            && self.culling_mode == CullingMode::All
            && topology.is_polygon();

        if skip_drawing || culled {
            return Ok(required);
        }

        let format = loader
            .native_format()
            .cloned()
            .expect("loaders resolved by the primary context have a native format");

        // a new format needs a new batch
        let same_format = self
            .current_format
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &format));

        if !same_format {
            tracing::trace!(stride = format.stride(), "native vertex format changed, flushing");
            self.modules.sink.flush();
        }

        let stride = format.stride();
        self.current_format = Some(format);

        let arrays: [ArrayRef; ARRAY_COUNT] = std::array::from_fn(|i| ArrayRef {
            base: self.array_bases[i],
            stride: self.state.arrays.0[i].stride,
        });

        let ctx = Ctx {
            ram: self.modules.memory.host(),
            arrays: &arrays,
        };

        let dst = self.modules.sink.prepare(topology, count, stride);
        let emitted = loader.run(ctx, topology, count, &src[..required], dst);

        self.modules.indices.add_indices(topology, emitted);
        self.modules.sink.commit(emitted, stride);

        self.frame.primitives += emitted as u64;
        self.frame.primitive_joins += 1;

        Ok(required)
    }

    /// Returns the primary register state laid out by register address.
    pub fn fill_cp_memory(&self) -> [u32; 0x100] {
        let mut memory = [0; 0x100];
        let state = &self.state;

        memory[Reg::MatIndexLow.address()] = state.matrix_index_a;
        memory[Reg::MatIndexHigh.address()] = state.matrix_index_b;
        memory[Reg::VcdLow.address()] = state.vertex_descriptor.low.to_bits();
        memory[Reg::VcdHigh.address()] = state.vertex_descriptor.high.to_bits();

        for (group, table) in state.vertex_attr_tables.iter().enumerate() {
            memory[Reg::VatA.address() + group] = table.get(TableRecord::A);
            memory[Reg::VatB.address() + group] = table.get(TableRecord::B);
            memory[Reg::VatC.address() + group] = table.get(TableRecord::C);
        }

        for (index, array) in state.arrays.0.iter().enumerate() {
            memory[Reg::ArrayBase.address() + index] = array.address.0;
            memory[Reg::ArrayStride.address() + index] = array.stride;
        }

        memory
    }

    /// Translates every array base again. Must be called whenever the memory mapping changes.
    pub fn recompute_array_bases(&mut self) {
        for (base, array) in self.array_bases.iter_mut().zip(&self.state.arrays.0) {
            *base = self.modules.memory.translate(array.address);
        }
    }
}
