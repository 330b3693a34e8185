use crate::{
    RunError,
    cache::{Context, LoaderCache},
    cp::CpState,
    loader::Loader,
};
use std::sync::Arc;

/// The preprocessing vertex loading context.
///
/// Tracks its own copy of the command processor state and resolves loaders through the shared
/// cache, but never creates native formats nor talks to the renderer. This makes it suitable for
/// walking a command stream ahead of the primary context, on another thread.
pub struct Preprocessor {
    cache: Arc<LoaderCache>,
    state: CpState,
}

impl Preprocessor {
    pub fn new(cache: Arc<LoaderCache>) -> Self {
        Self {
            cache,
            state: CpState::new(),
        }
    }

    pub fn state(&self) -> &CpState {
        &self.state
    }

    /// Marks every group of this context as dirty. The primary context is not affected.
    pub fn mark_all_dirty(&mut self) {
        self.state.dirty.mark_all();
    }

    /// Writes to a command processor register.
    pub fn load_cp_reg(&mut self, sub_cmd: u8, value: u32) {
        self.state.write(sub_cmd, value);
    }

    pub fn loader(&mut self, group: usize) -> Arc<Loader> {
        self.cache.refresh(&mut self.state, group, Context::Preprocess)
    }

    /// Size of a vertex of the given group in the attribute stream.
    pub fn vertex_size(&mut self, group: usize) -> u32 {
        self.loader(group).vertex_size()
    }

    /// Returns how many bytes `count` vertices of the given group occupy in `src`, without
    /// decoding them.
    pub fn skip_vertices(&mut self, group: usize, count: u32, src: &[u8]) -> Result<usize, RunError> {
        if count == 0 {
            return Ok(0);
        }

        let required = count as usize * self.vertex_size(group) as usize;
        if src.len() < required {
            return Err(RunError::InsufficientData {
                required,
                available: src.len(),
            });
        }

        Ok(required)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        Config, Modules, VertexLoaderManager,
        cp::attributes::TableRecord,
        interpreter::InterpreterFactory,
        loader::PortableVertexDeclaration,
        render::{FlatMemory, IndexGenerator, NopTexMatrixNotifier, Topology, VertexSink},
    };
    use std::any::Any;

    #[derive(Default)]
    struct NullSink {
        buffer: Vec<u8>,
    }

    impl VertexSink for NullSink {
        fn create_native_format(
            &mut self,
            _: &PortableVertexDeclaration,
        ) -> Box<dyn Any + Send + Sync> {
            Box::new(())
        }

        fn prepare(&mut self, _: Topology, count: u32, stride: u32) -> &mut [u8] {
            self.buffer.resize((count * stride) as usize, 0);
            &mut self.buffer
        }

        fn commit(&mut self, _: u32, _: u32) {}
        fn flush(&mut self) {}
    }

    struct NullIndices;

    impl IndexGenerator for NullIndices {
        fn add_indices(&mut self, _: Topology, _: u32) {}
    }

    fn manager(cache: Arc<LoaderCache>) -> VertexLoaderManager {
        let modules = Modules {
            sink: Box::new(NullSink::default()),
            indices: Box::new(NullIndices),
            memory: Box::new(FlatMemory::new(vec![0; 0x100])),
            tex_matrices: Box::new(NopTexMatrixNotifier),
        };

        VertexLoaderManager::new(cache, modules, Config::default())
    }

    #[test]
    fn primary_init_drops_stale_loaders() {
        let cache = Arc::new(LoaderCache::new(InterpreterFactory));
        let mut manager = manager(cache.clone());
        let mut preprocessor = Preprocessor::new(cache.clone());

        // position direct, vec3 f32
        preprocessor.load_cp_reg(0x50, 1 << 9);
        preprocessor.load_cp_reg(0x70, 0b1001);
        assert_eq!(preprocessor.vertex_size(0), 12);

        // a state load replaces the registers without going through register writes
        preprocessor.state.vertex_attr_tables[0].set(TableRecord::A, 0b0111);
        assert_eq!(preprocessor.vertex_size(0), 12);

        manager.init();
        assert_eq!(preprocessor.vertex_size(0), 6);
        assert_eq!(cache.loaders_created(), 2);
    }

    #[test]
    fn skipping_needs_whole_vertices() {
        let cache = Arc::new(LoaderCache::new(InterpreterFactory));
        let mut preprocessor = Preprocessor::new(cache.clone());

        // position direct, vec3 f32
        preprocessor.load_cp_reg(0x50, 1 << 9);
        preprocessor.load_cp_reg(0x70, 0b1001);

        assert_eq!(preprocessor.skip_vertices(0, 0, &[]).unwrap(), 0);
        assert_eq!(preprocessor.skip_vertices(0, 2, &[0; 30]).unwrap(), 24);
        assert!(matches!(
            preprocessor.skip_vertices(0, 3, &[0; 30]),
            Err(RunError::InsufficientData {
                required: 36,
                available: 30
            })
        ));

        assert_eq!(cache.loaders_created(), 1);
        assert_eq!(cache.native_format_count(), 0);
    }
}
