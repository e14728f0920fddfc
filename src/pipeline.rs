//! Fetch, decode, classify, build detail levels and normalize, in that order.
//!
//! Every load runs under a [`LoadToken`]. Once a newer token has been issued
//! from the same [`LoadGeneration`], the old load stops at its next stage
//! boundary, reports nothing further to its observer and returns
//! [`LoadError::Superseded`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bon::Builder;
use tracing::{debug, info, info_span, warn};

use crate::asset::{AssetDescriptor, Fetcher, Locator};
use crate::codec::DecoderRegistry;
use crate::config::PipelineConfig;
use crate::error::LoadError;
use crate::loader::SceneLoader;
use crate::models::{NodePath, ResourceCounts, SceneGraph};
use crate::optimize::{
    ClassSummary, LodContainer, LodSettings, MaterialClassifier, Normalization, PresetClassifier,
    Simplifier, StrideDecimator, build_lod, classify_scene, normalize, prepare_culling,
    prepare_meshes,
};

/// Share of the progress range given to the network transfer. Parsing
/// accounts for the rest.
const FETCH_PROGRESS_SHARE: u64 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Probing,
    Fetching,
    Decoding,
    Classifying,
    BuildingLods,
    Normalizing,
}

impl LoadPhase {
    pub fn label(&self) -> &'static str {
        match self {
            LoadPhase::Probing => "Checking model",
            LoadPhase::Fetching => "Downloading model",
            LoadPhase::Decoding => "Decoding geometry",
            LoadPhase::Classifying => "Applying materials",
            LoadPhase::BuildingLods => "Optimizing",
            LoadPhase::Normalizing => "Positioning",
        }
    }
}

/// Receives out-of-band signals from one load attempt.
///
/// Progress values never decrease. Exactly one of `on_success` / `on_error`
/// is called for every load that is not superseded; superseded loads call
/// neither.
pub trait LoadObserver {
    fn on_phase(&mut self, _phase: LoadPhase) {}

    fn on_progress(&mut self, percent: u8);

    fn on_success(&mut self, model: &PreparedModel);

    fn on_error(&mut self, error: &LoadError);
}

/// Observer for callers that only want the returned result.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl LoadObserver for NoopObserver {
    fn on_progress(&mut self, _percent: u8) {}

    fn on_success(&mut self, _model: &PreparedModel) {}

    fn on_error(&mut self, _error: &LoadError) {}
}

/// Issues load tokens. Cloning shares the counter.
#[derive(Debug, Clone, Default)]
pub struct LoadGeneration(Arc<AtomicU64>);

impl LoadGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new load, superseding every earlier token.
    pub fn next(&self) -> LoadToken {
        let id = self.0.fetch_add(1, Ordering::AcqRel) + 1;
        LoadToken {
            generation: Arc::clone(&self.0),
            id,
        }
    }

    /// Supersede every outstanding token without starting a load.
    pub fn invalidate(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
pub struct LoadToken {
    generation: Arc<AtomicU64>,
    id: u64,
}

impl LoadToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::Acquire) == self.id
    }

    fn check(&self) -> Result<(), LoadError> {
        if self.is_current() {
            Ok(())
        } else {
            Err(LoadError::Superseded {
                generation: self.id,
            })
        }
    }
}

/// What a successful load produced.
#[derive(Debug, Clone)]
pub enum ModelContent {
    Single(SceneGraph),
    Lod(LodContainer),
}

impl ModelContent {
    /// The graph currently selected for rendering.
    pub fn active_graph(&self) -> Option<&SceneGraph> {
        match self {
            ModelContent::Single(graph) => Some(graph),
            ModelContent::Lod(lod) => lod.active().map(|level| &level.graph),
        }
    }

    pub fn graphs(&self) -> Vec<&SceneGraph> {
        match self {
            ModelContent::Single(graph) => vec![graph],
            ModelContent::Lod(lod) => lod.levels().iter().map(|l| &l.graph).collect(),
        }
    }

    /// Select the detail level for a camera distance. Returns whether it changed.
    pub fn update_lod(&mut self, camera_distance: f32) -> bool {
        match self {
            ModelContent::Single(_) => false,
            ModelContent::Lod(lod) => lod.update(camera_distance),
        }
    }

    pub fn resource_counts(&self) -> ResourceCounts {
        match self {
            ModelContent::Single(graph) => graph.resource_counts(),
            ModelContent::Lod(lod) => lod.resource_counts(),
        }
    }

    pub fn dispose(self) -> ResourceCounts {
        match self {
            ModelContent::Single(graph) => graph.dispose(),
            ModelContent::Lod(lod) => lod.dispose(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreparedModel {
    pub locator: Locator,
    pub content: ModelContent,
    /// Every mesh node of the full-detail graph.
    pub meshes: Vec<NodePath>,
    pub classes: ClassSummary,
    pub normalization: Option<Normalization>,
}

/// Outcome of warming the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadSummary {
    pub fetched: usize,
    pub failed: usize,
}

/// Forwards to the observer while the token is current, keeping progress
/// monotonic. Consumed by the terminal call.
struct Reporter<'o, 't> {
    observer: &'o mut dyn LoadObserver,
    token: &'t LoadToken,
    last: Option<u8>,
}

impl<'o, 't> Reporter<'o, 't> {
    fn new(observer: &'o mut dyn LoadObserver, token: &'t LoadToken) -> Self {
        Self {
            observer,
            token,
            last: None,
        }
    }

    fn phase(&mut self, phase: LoadPhase) {
        if self.token.is_current() {
            debug!(phase = phase.label(), "load phase");
            self.observer.on_phase(phase);
        }
    }

    fn progress(&mut self, percent: u8) {
        let percent = percent.min(100);
        if self.last.is_some_and(|last| percent <= last) || !self.token.is_current() {
            return;
        }
        self.last = Some(percent);
        self.observer.on_progress(percent);
    }

    fn success(mut self, model: &PreparedModel) {
        self.progress(100);
        self.observer.on_success(model);
    }

    fn error(self, error: &LoadError) {
        self.observer.on_error(error);
    }
}

#[derive(Builder)]
pub struct ModelPipeline {
    fetcher: Box<dyn Fetcher>,
    #[builder(default)]
    decoders: DecoderRegistry,
    /// Defaults to the preset classifier configured from `config`.
    classifier: Option<Box<dyn MaterialClassifier>>,
    /// Defaults to stride decimation with the configured vertex floor.
    simplifier: Option<Box<dyn Simplifier>>,
    #[builder(default)]
    config: PipelineConfig,
}

impl ModelPipeline {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &dyn Fetcher {
        self.fetcher.as_ref()
    }

    /// Run one load attempt, reporting to `observer`.
    pub fn load(
        &self,
        descriptor: &AssetDescriptor,
        token: &LoadToken,
        observer: &mut dyn LoadObserver,
    ) -> Result<PreparedModel, LoadError> {
        let locator = descriptor.locator();
        let span = info_span!("load", %locator, token = token.id());
        let _guard = span.enter();

        let mut reporter = Reporter::new(observer, token);
        let outcome = self.run(locator, token, &mut reporter).and_then(|model| {
            token.check()?;
            Ok(model)
        });

        match outcome {
            Ok(model) => {
                info!(
                    meshes = model.meshes.len(),
                    triangles = model.content.active_graph().map_or(0, SceneGraph::triangle_count),
                    "model ready"
                );
                reporter.success(&model);
                Ok(model)
            }
            Err(error) if error.is_superseded() || !token.is_current() => {
                debug!(cause = error.label(), "discarding superseded load");
                Err(LoadError::Superseded {
                    generation: token.id(),
                })
            }
            Err(error) => {
                warn!(cause = error.label(), %error, "load failed");
                reporter.error(&error);
                Err(error)
            }
        }
    }

    fn run(
        &self,
        locator: &Locator,
        token: &LoadToken,
        reporter: &mut Reporter<'_, '_>,
    ) -> Result<PreparedModel, LoadError> {
        reporter.progress(0);

        if self.config.probe {
            reporter.phase(LoadPhase::Probing);
            let length = self.fetcher.probe(locator)?;
            debug!(?length, "probe succeeded");
        }

        reporter.phase(LoadPhase::Fetching);
        let bytes = self.fetcher.fetch(locator, &mut |received, total| {
            if let Some(total) = total.filter(|&t| t > 0) {
                let share = received.min(total) * FETCH_PROGRESS_SHARE / total;
                reporter.progress(share as u8);
            }
        })?;
        debug!(bytes = bytes.len(), "fetched asset");
        token.check()?;

        reporter.phase(LoadPhase::Decoding);
        let loaded = SceneLoader::new(self.fetcher.as_ref(), &self.decoders).load(&bytes, locator)?;
        reporter.progress(100);
        token.check()?;

        let mut graph = loaded.graph;
        prepare_meshes(&mut graph, self.config.shadow_size_threshold);

        reporter.phase(LoadPhase::Classifying);
        let classes = match &self.classifier {
            Some(classifier) => classify_scene(&mut graph, classifier.as_ref()),
            None => classify_scene(&mut graph, &PresetClassifier::from_config(&self.config)),
        };

        let mut content = if self.config.build_lods {
            reporter.phase(LoadPhase::BuildingLods);
            let settings = LodSettings::from_config(&self.config);
            let lod = match &self.simplifier {
                Some(simplifier) => build_lod(graph, &settings, simplifier.as_ref())?,
                None => {
                    let decimator = StrideDecimator {
                        floor: self.config.minimum_vertex_floor,
                    };
                    build_lod(graph, &settings, &decimator)?
                }
            };
            ModelContent::Lod(lod)
        } else {
            ModelContent::Single(graph)
        };

        reporter.phase(LoadPhase::Normalizing);
        let normalization = match &mut content {
            ModelContent::Single(graph) => normalize(graph, self.config.canonical_size),
            ModelContent::Lod(lod) => {
                let mut graphs = lod.graphs_mut();
                let first = graphs
                    .next()
                    .and_then(|g| normalize(g, self.config.canonical_size));
                if let Some(n) = &first {
                    graphs.for_each(|g| n.apply(g));
                }
                first
            }
        };

        match &mut content {
            ModelContent::Single(graph) => prepare_culling(graph, self.config.culling_padding),
            ModelContent::Lod(lod) => lod
                .graphs_mut()
                .for_each(|g| prepare_culling(g, self.config.culling_padding)),
        }

        Ok(PreparedModel {
            locator: locator.clone(),
            content,
            meshes: loaded.meshes,
            classes,
            normalization,
        })
    }

    /// Fetch each asset once so later loads hit the cache. Failures are
    /// logged and counted, never fatal.
    pub fn preload(&self, locators: &[Locator]) -> PreloadSummary {
        let mut summary = PreloadSummary::default();
        for locator in locators {
            match self.fetcher.fetch(locator, &mut |_, _| {}) {
                Ok(bytes) => {
                    debug!(%locator, bytes = bytes.len(), "preloaded");
                    summary.fetched += 1;
                }
                Err(error) => {
                    warn!(%locator, %error, "preload failed");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}
