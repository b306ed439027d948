//! Compiled programs keyed by filter identity or generated source
//!
//! Static filters get one program per instance. Filters that generate their
//! source ([`ProgramIdentity::Source`]) share a program with every other filter
//! that produces the same text. A failed compile is logged with its full
//! diagnostic and the pass-through program is cached in its place, so a
//! broken filter costs one compile per session rather than one per frame.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::backend::{Capabilities, ProgramId, RenderBackend};
use crate::filter::{FilterId, FilterRef, ProgramIdentity};
use crate::shader::ProgramSource;

/// Statistics for program cache usage
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgramCacheStats {
    pub hits: u64,
    pub compiles: u64,
    pub failures: u64,
    pub programs: usize,
}

#[derive(Debug, Default)]
pub struct ProgramCache {
    by_filter: FxHashMap<FilterId, ProgramId>,
    by_source: FxHashMap<ProgramSource, ProgramId>,
    /// Every program this cache compiled, destroyed once on clear
    owned: Vec<ProgramId>,
    pass_through: Option<ProgramId>,
    initialized: FxHashSet<FilterId>,
    hits: u64,
    compiles: u64,
    failures: u64,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Program used when none is given or when a filter fails to compile
    pub fn pass_through(&mut self, backend: &mut dyn RenderBackend) -> Option<ProgramId> {
        if let Some(program) = self.pass_through {
            return Some(program);
        }
        match backend.compile_program(&ProgramSource::pass_through()) {
            Ok(program) => {
                self.compiles += 1;
                self.owned.push(program);
                self.pass_through = Some(program);
                Some(program)
            }
            Err(err) => {
                self.failures += 1;
                tracing::error!("Pass-through program failed to compile: {}", err);
                None
            }
        }
    }

    /// Resolve the program for `filter`, compiling on a miss. The filter's
    /// one-time setup runs the first time it is resolved.
    pub fn program_for(
        &mut self,
        backend: &mut dyn RenderBackend,
        caps: &Capabilities,
        filter: &FilterRef,
    ) -> Option<ProgramId> {
        let identity = filter.borrow().program_identity();
        let program = match identity {
            ProgramIdentity::Instance => match self.by_filter.get(&filter.id()) {
                Some(&program) => {
                    self.hits += 1;
                    Some(program)
                }
                None => {
                    let source = filter.borrow_mut().program_source(caps);
                    let program = self.compile_or_fallback(backend, &source);
                    if let Some(program) = program {
                        self.by_filter.insert(filter.id(), program);
                    }
                    program
                }
            },
            ProgramIdentity::Source => {
                let source = filter.borrow_mut().program_source(caps);
                match self.by_source.get(&source) {
                    Some(&program) => {
                        self.hits += 1;
                        Some(program)
                    }
                    None => {
                        let program = self.compile_or_fallback(backend, &source);
                        if let Some(program) = program {
                            self.by_source.insert(source, program);
                        }
                        program
                    }
                }
            }
        }?;

        if self.initialized.insert(filter.id()) {
            filter.borrow_mut().initialize(backend, program);
        }
        Some(program)
    }

    fn compile_or_fallback(
        &mut self,
        backend: &mut dyn RenderBackend,
        source: &ProgramSource,
    ) -> Option<ProgramId> {
        match backend.compile_program(source) {
            Ok(program) => {
                tracing::debug!("Compiled program '{}'", source.label);
                self.compiles += 1;
                self.owned.push(program);
                Some(program)
            }
            Err(err) => {
                self.failures += 1;
                tracing::error!("{}\n{}", err, source.compose());
                self.pass_through(backend)
            }
        }
    }

    /// Whether the filter's one-time setup already ran
    pub fn is_initialized(&self, filter: FilterId) -> bool {
        self.initialized.contains(&filter)
    }

    /// Destroy every compiled program
    pub fn clear(&mut self, backend: &mut dyn RenderBackend) {
        for program in self.owned.drain(..) {
            backend.destroy_program(program);
        }
        self.forget();
    }

    /// Forget every program without touching the device, after context loss.
    /// Filters run their one-time setup again on next use.
    pub fn forget(&mut self) {
        self.by_filter.clear();
        self.by_source.clear();
        self.owned.clear();
        self.pass_through = None;
        self.initialized.clear();
    }

    pub fn stats(&self) -> ProgramCacheStats {
        ProgramCacheStats {
            hits: self.hits,
            compiles: self.compiles,
            failures: self.failures,
            programs: self.owned.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::filter::Filter;
    use crate::filters::{PassThroughFilter, SegmentationFilter, SegmentationMode};
    use crate::headless::HeadlessBackend;

    #[derive(Debug, Default)]
    struct BrokenFilter {
        initialized: u32,
    }

    impl Filter for BrokenFilter {
        fn label(&self) -> &str {
            "broken"
        }

        fn program_source(&mut self, _caps: &Capabilities) -> ProgramSource {
            ProgramSource::fragment("broken", "this is not wgsl")
        }

        fn initialize(&mut self, _backend: &mut dyn RenderBackend, _program: ProgramId) {
            self.initialized += 1;
        }
    }

    fn setup() -> (HeadlessBackend, Capabilities, ProgramCache) {
        let backend = HeadlessBackend::new();
        let caps = backend.capabilities().clone();
        (backend, caps, ProgramCache::new())
    }

    #[test]
    fn test_instance_programs_compile_once() {
        let (mut backend, caps, mut cache) = setup();
        let filter = FilterRef::new(PassThroughFilter::new());
        let a = cache.program_for(&mut backend, &caps, &filter);
        let b = cache.program_for(&mut backend, &caps, &filter);
        assert!(a.is_some());
        assert_eq!(a, b);
        assert_eq!(cache.stats().compiles, 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn test_source_programs_shared_between_instances() {
        let (mut backend, caps, mut cache) = setup();
        let make = || {
            let mut filter = SegmentationFilter::new();
            filter.set_mode(SegmentationMode::ChromaKey);
            FilterRef::new(filter)
        };
        let (a, b) = (make(), make());
        let pa = cache.program_for(&mut backend, &caps, &a);
        let pb = cache.program_for(&mut backend, &caps, &b);
        assert_eq!(pa, pb);
        assert_eq!(cache.stats().compiles, 1);
        assert!(cache.is_initialized(a.id()));
        assert!(cache.is_initialized(b.id()));
    }

    #[test]
    fn test_failed_compile_falls_back_and_is_cached() {
        let (mut backend, caps, mut cache) = setup();
        backend.fail_compiles_containing("not wgsl");
        let typed = Rc::new(RefCell::new(BrokenFilter::default()));
        let filter = FilterRef::from_shared(typed.clone());

        let fallback = cache.pass_through(&mut backend);
        let first = cache.program_for(&mut backend, &caps, &filter);
        let second = cache.program_for(&mut backend, &caps, &filter);
        assert_eq!(first, fallback);
        assert_eq!(second, fallback);
        assert_eq!(cache.stats().failures, 1);
        assert_eq!(typed.borrow().initialized, 1);
    }

    #[test]
    fn test_forget_reruns_initialize() {
        let (mut backend, caps, mut cache) = setup();
        let typed = Rc::new(RefCell::new(BrokenFilter::default()));
        let filter = FilterRef::from_shared(typed.clone());
        cache.program_for(&mut backend, &caps, &filter);
        cache.forget();
        cache.program_for(&mut backend, &caps, &filter);
        assert_eq!(typed.borrow().initialized, 2);
    }

    #[test]
    fn test_clear_destroys_programs() {
        let (mut backend, caps, mut cache) = setup();
        let filter = FilterRef::new(PassThroughFilter::new());
        cache.program_for(&mut backend, &caps, &filter);
        cache.pass_through(&mut backend);
        assert_eq!(backend.live_programs(), 2);
        cache.clear(&mut backend);
        assert_eq!(backend.live_programs(), 0);
        assert_eq!(cache.stats().programs, 0);
    }
}
