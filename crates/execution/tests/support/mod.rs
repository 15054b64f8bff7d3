//! Shared fixtures for pipeline integration tests

pub mod collector;

use cairn_cache::{
    BuildCacheController, BuildInvocationId, CacheKey, CacheKeyBuilder,
    DefaultBuildCacheController, DisabledBuildCacheController, GzipPacker, InMemoryStore,
    OriginMetadata, OutputTree, TarPacker,
};
use cairn_execution::{
    AfterPreviousExecutionState, BoxError, BuildOutputCleanupRegistry,
    DefaultOutputFilesRepository, ExecutionHistoryStore, ExecutionPipeline, ExecutionRequest,
    ExecutionServices, ExecutionStateChanges, FileCollectionFingerprint, UnitOfWork, WorkOutcome,
    detect_changes, fingerprint_outputs,
};
use chrono::TimeDelta;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type Body = Box<dyn Fn(&ExecutionRequest) -> Result<WorkOutcome, BoxError> + Send + Sync>;

/// A unit of work backed by a real execution history
pub struct TestWork {
    pub name: String,
    pub outputs: Vec<OutputTree>,
    pub history: ExecutionHistoryStore,
    pub timeout: Option<TimeDelta>,
    pub delete_outputs: bool,
    pub overlapping: bool,
    body: Body,
    executions: AtomicUsize,
}

impl TestWork {
    pub fn new(
        name: &str,
        history: &Path,
        body: impl Fn(&ExecutionRequest) -> Result<WorkOutcome, BoxError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            outputs: Vec::new(),
            history: ExecutionHistoryStore::new(history).unwrap(),
            timeout: None,
            delete_outputs: false,
            overlapping: false,
            body: Box::new(body),
            executions: AtomicUsize::new(0),
        }
    }

    pub fn with_output(mut self, tree: OutputTree) -> Self {
        self.outputs.push(tree);
        self
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl UnitOfWork for TestWork {
    fn display_name(&self) -> String {
        format!("task '{}'", self.name)
    }

    fn identity(&self) -> String {
        self.name.clone()
    }

    fn visit_outputs(&self, visitor: &mut dyn FnMut(OutputTree)) {
        for tree in &self.outputs {
            visitor(tree.clone());
        }
    }

    fn changes_since_previous_execution(&self) -> Option<ExecutionStateChanges> {
        let previous = self.after_previous_execution_state();
        let current = fingerprint_outputs(self).ok()?;
        detect_changes(previous.as_ref(), &BTreeMap::new(), &current)
    }

    fn execute(&self, request: &ExecutionRequest) -> Result<WorkOutcome, BoxError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        (self.body)(request)
    }

    fn snapshot_after_outputs_generated(
        &self,
    ) -> Result<BTreeMap<String, FileCollectionFingerprint>, BoxError> {
        Ok(fingerprint_outputs(self)?)
    }

    fn persist_result(
        &self,
        final_outputs: &BTreeMap<String, FileCollectionFingerprint>,
        success: bool,
        origin: &OriginMetadata,
    ) -> Result<(), BoxError> {
        let state = AfterPreviousExecutionState {
            input_fingerprints: BTreeMap::new(),
            output_fingerprints: final_outputs.clone(),
            origin: origin.clone(),
            successful: success,
        };
        Ok(self.history.store(&self.name, &state)?)
    }

    fn timeout(&self) -> Option<TimeDelta> {
        self.timeout
    }

    fn delete_outputs_before_execution(&self) -> bool {
        self.delete_outputs
    }

    fn has_overlapping_outputs(&self) -> bool {
        self.overlapping
    }

    fn after_previous_execution_state(&self) -> Option<AfterPreviousExecutionState> {
        self.history.load(&self.name).ok().flatten()
    }
}

/// Build-wide services for one simulated build
pub struct Build {
    pub store: Arc<InMemoryStore>,
    pub output_files: Arc<DefaultOutputFilesRepository>,
    pub cleanup_registry: Arc<BuildOutputCleanupRegistry>,
    pub pipeline: ExecutionPipeline,
}

impl Build {
    /// A build with a gzip-compressed in-memory build cache
    pub fn cached(store: &Arc<InMemoryStore>) -> Self {
        let controller: Arc<dyn BuildCacheController> = Arc::new(
            DefaultBuildCacheController::new(Box::new(GzipPacker::new(TarPacker::new())))
                .with_local(store.clone(), true),
        );
        Self::with_controller(store, controller)
    }

    /// A build without a build cache
    pub fn uncached() -> Self {
        Self::with_controller(
            &Arc::new(InMemoryStore::new()),
            Arc::new(DisabledBuildCacheController),
        )
    }

    fn with_controller(
        store: &Arc<InMemoryStore>,
        controller: Arc<dyn BuildCacheController>,
    ) -> Self {
        let output_files = Arc::new(DefaultOutputFilesRepository::new());
        let cleanup_registry = Arc::new(BuildOutputCleanupRegistry::new());
        let pipeline = ExecutionPipeline::new(ExecutionServices {
            controller,
            output_files: output_files.clone(),
            cleanup_registry: cleanup_registry.clone(),
            build_id: BuildInvocationId::generate(),
        });
        Self {
            store: store.clone(),
            output_files,
            cleanup_registry,
            pipeline,
        }
    }
}

pub fn cache_key(parts: &[&str]) -> CacheKey {
    parts
        .iter()
        .fold(CacheKeyBuilder::new(), |builder, part| builder.put_string(part))
        .build()
}
