//! Shared caches of vertex loaders and native vertex formats.
use crate::{
    cp::{CpState, GROUP_COUNT},
    loader::{Components, DecoderFactory, Loader, LoaderUid, PortableVertexDeclaration},
    render::VertexSink,
};
use rustc_hash::FxHashMap;
use std::{
    any::Any,
    collections::hash_map::Entry,
    fmt::Write,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

/// A renderer facing vertex format. Shared by every loader with the same output layout.
pub struct NativeVertexFormat {
    declaration: PortableVertexDeclaration,
    components: Components,
    backend: Box<dyn Any + Send + Sync>,
}

impl std::fmt::Debug for NativeVertexFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeVertexFormat")
            .field("declaration", &self.declaration)
            .field("components", &self.components)
            .finish_non_exhaustive()
    }
}

impl NativeVertexFormat {
    fn new(
        declaration: PortableVertexDeclaration,
        components: Components,
        backend: Box<dyn Any + Send + Sync>,
    ) -> Self {
        Self {
            declaration,
            components,
            backend,
        }
    }

    pub fn declaration(&self) -> &PortableVertexDeclaration {
        &self.declaration
    }

    /// Components of the loader this format was first created for.
    pub fn components(&self) -> Components {
        self.components
    }

    pub fn stride(&self) -> u32 {
        self.declaration.stride
    }

    /// The renderer object backing this format.
    pub fn backend<T: Any>(&self) -> Option<&T> {
        self.backend.downcast_ref()
    }
}

/// The execution context a loader is resolved from.
///
/// Only the primary context owns the renderer, so only it may create native formats.
pub enum Context<'a> {
    Primary(&'a mut dyn VertexSink),
    Preprocess,
}

#[derive(Default)]
struct Inner {
    loaders: FxHashMap<LoaderUid, Arc<Loader>>,
    native_formats: FxHashMap<PortableVertexDeclaration, Arc<NativeVertexFormat>>,
    created: u64,
}

/// Cache of vertex loaders, keyed by configuration, and of native vertex formats, keyed by their
/// declaration.
///
/// Both maps live behind a single lock which is held for a whole lookup-or-create.
pub struct LoaderCache {
    factory: Box<dyn DecoderFactory>,
    inner: Mutex<Inner>,
    /// Bumped whenever the cache is cleared, so that states holding loaders from before the clear
    /// know they are stale.
    generation: AtomicU64,
}

impl LoaderCache {
    pub fn new(factory: impl DecoderFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            inner: Mutex::new(Inner::default()),
            generation: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the loader currently valid for `group` in the given state, creating it (and, in the
    /// primary context, its native format) if needed.
    pub fn refresh(&self, state: &mut CpState, group: usize, ctx: Context<'_>) -> Arc<Loader> {
        assert!(group < GROUP_COUNT);

        let generation = self.generation.load(Ordering::Acquire);
        if state.generation != generation {
            state.reset_loaders();
            state.generation = generation;
        }

        if !state.dirty.is_dirty(group) {
            if let Some(loader) = &state.loaders[group] {
                return loader.clone();
            }
        }

        let uid = LoaderUid {
            vcd: state.vertex_descriptor,
            vat: state.vertex_attr_tables[group],
        };

        let mut guard = self.lock();
        let inner = &mut *guard;

        let loader = match inner.loaders.entry(uid) {
            Entry::Occupied(o) => o.get().clone(),
            Entry::Vacant(v) => {
                let loader = Arc::new(Loader::new(uid, self.factory.create(&uid)));
                inner.created += 1;
                tracing::debug!(
                    group,
                    size = loader.vertex_size(),
                    "created vertex loader {}",
                    loader.describe()
                );

                v.insert(loader).clone()
            }
        };

        if let Context::Primary(sink) = ctx {
            if loader.native_format().is_none() {
                let declaration = *loader.declaration();
                let format = inner
                    .native_formats
                    .entry(declaration)
                    .or_insert_with(|| {
                        tracing::debug!(
                            stride = declaration.stride,
                            "created native vertex format"
                        );

                        let backend = sink.create_native_format(&declaration);
                        Arc::new(NativeVertexFormat::new(
                            declaration,
                            loader.components(),
                            backend,
                        ))
                    })
                    .clone();

                loader.attach_native_format(format);
            }
        }

        state.loaders[group] = Some(loader.clone());
        state.dirty.clear(group);

        loader
    }

    /// How many loaders have been created since this cache was built.
    pub fn loaders_created(&self) -> u64 {
        self.lock().created
    }

    pub fn loader_count(&self) -> usize {
        self.lock().loaders.len()
    }

    pub fn native_format_count(&self) -> usize {
        self.lock().native_formats.len()
    }

    /// Drops every loader and native format. Handles obtained before this call are stale.
    pub fn clear(&self) {
        let mut inner = self.lock();
        tracing::info!(
            loaders = inner.loaders.len(),
            native_formats = inner.native_formats.len(),
            "clearing vertex loader cache"
        );

        inner.loaders.clear();
        inner.native_formats.clear();
        self.invalidate();
    }

    /// Makes every context drop its resolved loaders on its next resolution, without touching the
    /// cached loaders themselves.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Lists every cached loader, most used first.
    pub fn report(&self) -> String {
        let entries = {
            let inner = self.lock();
            let mut entries = inner
                .loaders
                .values()
                .map(|loader| (loader.describe(), loader.loaded()))
                .collect::<Vec<_>>();

            entries.sort_by(|a, b| b.1.cmp(&a.1));
            entries
        };

        let mut out = String::new();
        for (description, loaded) in entries {
            _ = writeln!(out, "{description}: {loaded} vertices");
        }

        out
    }
}
