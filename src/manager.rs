//! Store, select, and retile façade over a catalog.
//!
//! The manager keeps the published [`TileLocationProvider`] of every video it
//! has touched behind a lock that is only held for the pointer swap, so
//! queries in flight keep reading the version they started with while a
//! retile publishes the next one.

use crate::catalog::{Catalog, TiledEntry};
use crate::config::{Config, RetileConfig, ScanConfig};
use crate::encode::{TileEncodeRequest, TileEncoder, TileOutput};
use crate::operators::{
    EncodedFrames, Operator, ScanFullFramesFromTiledVideoOperator,
    ScanTileAndRectangleInformationOperator, ScanTiledVideoOperator,
};
use crate::regret::{RegretAccumulator, RetileState};
use crate::semantic::{MetadataSelection, SemanticDataManager, SemanticIndex, TemporalSelection};
use crate::tiles::{TileLayout, TileLocationProvider, VersionManifest};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use panotile_common::{LayoutVersion, Rectangle, RetileJobId, SelectStrategy, VideoGeometry};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

/// How a retile job ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetileOutcome {
    Running,
    Published { version: LayoutVersion },
    /// Another retile of the same video was already in flight.
    Skipped,
    Failed { reason: String },
}

/// Bookkeeping for one retile, background or synchronous.
#[derive(Debug, Clone, Serialize)]
pub struct RetileRecord {
    pub id: RetileJobId,
    pub video: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: RetileOutcome,
}

type ProviderSlot = Arc<RwLock<Arc<TileLocationProvider>>>;

struct Inner {
    catalog: Catalog,
    encoder: Arc<dyn TileEncoder>,
    index: Arc<dyn SemanticIndex>,
    scan: ScanConfig,
    retile: RetileConfig,
    gop_length: u32,
    providers: DashMap<String, ProviderSlot>,
    regret: DashMap<String, Arc<Mutex<RegretAccumulator>>>,
    jobs: DashMap<RetileJobId, RetileRecord>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// Entry point for storing and querying tiled videos.
#[derive(Clone)]
pub struct VideoManager {
    inner: Arc<Inner>,
}

impl VideoManager {
    pub fn new(
        catalog: Catalog,
        encoder: Arc<dyn TileEncoder>,
        index: Arc<dyn SemanticIndex>,
        config: &Config,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                catalog,
                encoder,
                index,
                scan: config.scan.clone(),
                retile: config.retile.clone(),
                gop_length: config.encoder.gop_length.max(1),
                providers: DashMap::new(),
                regret: DashMap::new(),
                jobs: DashMap::new(),
                handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub fn semantic_index(&self) -> &Arc<dyn SemanticIndex> {
        &self.inner.index
    }

    pub fn entry(&self, name: &str, metadata_identifier: Option<&str>) -> Result<TiledEntry> {
        self.inner.catalog.entry(name, metadata_identifier)
    }

    /// Store `source` under a uniform `rows` x `columns` layout.
    pub fn store(&self, name: &str, source: &Path, rows: u32, columns: u32) -> Result<LayoutVersion> {
        let entry = self.entry(name, None)?;
        let geometry = self.inner.encoder.probe(source)?;
        let layout = TileLayout::uniform(geometry.width, geometry.height, rows, columns)?;
        self.write_version(
            &entry,
            source,
            geometry,
            vec![(0, geometry.frame_count, layout)],
        )
    }

    /// Store `source` with layouts fitted, GOP by GOP, to the `label` boxes.
    pub fn store_fitted(
        &self,
        name: &str,
        source: &Path,
        metadata_identifier: Option<&str>,
        label: &str,
    ) -> Result<LayoutVersion> {
        let entry = self.entry(name, metadata_identifier)?;
        let geometry = self.inner.encoder.probe(source)?;

        let video = entry.metadata_identifier();
        let boxes: Vec<(u32, Rectangle)> = self
            .inner
            .index
            .frames(video, label)
            .into_iter()
            .filter(|&frame| frame < geometry.frame_count)
            .flat_map(|frame| {
                self.inner
                    .index
                    .bounding_boxes(video, label, frame)
                    .into_iter()
                    .map(move |b| (frame, b))
            })
            .collect();

        let spans = self
            .inner
            .retile
            .fitter()
            .fit_spans(geometry, self.inner.gop_length, &boxes)?;
        self.write_version(&entry, source, geometry, spans)
    }

    /// Encode every span, write the header and manifest, then publish.
    ///
    /// Files of a version that fails part-way are removed; the previous
    /// version stays current.
    fn write_version(
        &self,
        entry: &TiledEntry,
        source: &Path,
        geometry: VideoGeometry,
        spans: Vec<(u32, u32, TileLayout)>,
    ) -> Result<LayoutVersion> {
        let version = entry.next_tile_layout_version()?;
        let manifest = VersionManifest::new(version, geometry, self.inner.gop_length, spans)
            .with_source(source);
        manifest.validate()?;

        if let Err(e) = self.encode_version(entry, source, &manifest) {
            tracing::error!(entry = %entry.name(), %version, "Failed to write layout version: {e}");
            if let Err(cleanup) = entry.remove_version(version) {
                tracing::warn!(entry = %entry.name(), %version, "Cleanup failed: {cleanup}");
            }
            return Err(e);
        }

        let published = entry.increment_tile_version()?;
        if published != version {
            return Err(Error::CorruptVersion {
                entry: entry.name().to_string(),
                version: published,
                reason: format!("expected to publish version {version}"),
            });
        }

        let provider = TileLocationProvider::new(entry.version_directory(), manifest)?;
        tracing::info!(
            entry = %entry.name(),
            %version,
            spans = provider.manifest().spans.len(),
            streams = provider.manifest().stream_count(),
            "Stored tiled video"
        );
        self.publish(entry.name(), provider);
        Ok(version)
    }

    fn encode_version(&self, entry: &TiledEntry, source: &Path, manifest: &VersionManifest) -> Result<()> {
        for span in &manifest.spans {
            let outputs = span
                .layout
                .rectangles()
                .into_iter()
                .map(|rectangle| TileOutput {
                    path: entry.stream_path(manifest.version, span.stream_index(rectangle.id)),
                    rectangle,
                })
                .collect();
            self.inner.encoder.encode_tiles(&TileEncodeRequest {
                source: source.to_path_buf(),
                first_frame: span.first_frame,
                last_frame: span.last_frame,
                gop_length: manifest.gop_length,
                outputs,
            })?;
        }
        self.inner
            .encoder
            .encode_header(source, &entry.metadata_path(manifest.version))?;
        manifest.save(&entry.layout_path(manifest.version))
    }

    /// Swap in a new provider. Readers holding the old `Arc` are unaffected.
    fn publish(&self, name: &str, provider: TileLocationProvider) {
        let provider = Arc::new(provider);
        let slot = self
            .inner
            .providers
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(provider.clone())))
            .clone();
        *slot.write() = provider;
    }

    /// The current provider of `name`, loading it from disk on first use.
    pub fn provider(&self, name: &str) -> Result<Arc<TileLocationProvider>> {
        if let Some(slot) = self.inner.providers.get(name) {
            return Ok(slot.read().clone());
        }
        let provider = self.entry(name, None)?.location_provider()?;
        self.publish(name, provider);
        self.inner
            .providers
            .get(name)
            .map(|slot| slot.read().clone())
            .ok_or_else(|| Error::NotStored(name.to_string()))
    }

    pub fn manifest(&self, name: &str) -> Result<VersionManifest> {
        Ok(self.provider(name)?.manifest().clone())
    }

    fn semantic(
        &self,
        entry: &TiledEntry,
        selection: MetadataSelection,
        temporal: TemporalSelection,
    ) -> SemanticDataManager {
        SemanticDataManager::new(
            self.inner.index.clone(),
            entry.metadata_identifier(),
            selection,
            temporal,
        )
    }

    /// Build the operator answering a query, without consuming it.
    pub fn scan(
        &self,
        name: &str,
        metadata_identifier: Option<&str>,
        selection: MetadataSelection,
        temporal: TemporalSelection,
        strategy: SelectStrategy,
    ) -> Result<Box<dyn Operator<Item = EncodedFrames>>> {
        let entry = self.entry(name, metadata_identifier)?;
        let provider = self.provider(name)?;
        let semantic = self.semantic(&entry, selection, temporal);
        self.build_operator(&entry, semantic, provider, strategy)
    }

    fn build_operator(
        &self,
        entry: &TiledEntry,
        semantic: SemanticDataManager,
        provider: Arc<TileLocationProvider>,
        strategy: SelectStrategy,
    ) -> Result<Box<dyn Operator<Item = EncodedFrames>>> {
        let mut options = self.inner.scan.options();
        Ok(match strategy {
            SelectStrategy::Objects => {
                options.require_single_tile_objects = true;
                Box::new(ScanTiledVideoOperator::new(entry, semantic, provider, options)?)
            }
            SelectStrategy::Tiles => {
                Box::new(ScanTiledVideoOperator::new(entry, semantic, provider, options)?)
            }
            SelectStrategy::Frames => Box::new(ScanFullFramesFromTiledVideoOperator::new(
                entry, &semantic, provider,
            )),
        })
    }

    /// Answer a query in full and account for its regret.
    pub fn select(
        &self,
        name: &str,
        metadata_identifier: Option<&str>,
        selection: MetadataSelection,
        temporal: TemporalSelection,
        strategy: SelectStrategy,
    ) -> Result<Vec<EncodedFrames>> {
        let entry = self.entry(name, metadata_identifier)?;
        let provider = self.provider(name)?;
        let semantic = self.semantic(&entry, selection, temporal);

        let mut operator =
            self.build_operator(&entry, semantic.clone(), provider.clone(), strategy)?;
        let mut results = Vec::new();
        while let Some(frames) = operator.next()? {
            results.push(frames);
        }

        self.record_query(&entry, &provider, &semantic)?;
        Ok(results)
    }

    /// Tiles a query touches and their boxes, without reading payload.
    pub fn tiles(
        &self,
        name: &str,
        metadata_identifier: Option<&str>,
        selection: MetadataSelection,
        temporal: TemporalSelection,
    ) -> Result<ScanTileAndRectangleInformationOperator> {
        let entry = self.entry(name, metadata_identifier)?;
        let provider = self.provider(name)?;
        let semantic = self.semantic(&entry, selection, temporal);
        ScanTileAndRectangleInformationOperator::new(&entry, semantic, &provider)
    }

    fn record_query(
        &self,
        entry: &TiledEntry,
        provider: &TileLocationProvider,
        semantic: &SemanticDataManager,
    ) -> Result<()> {
        let Some(accumulator) = self.accumulator(entry.name()) else {
            return Ok(());
        };
        let triggered = {
            let mut acc = accumulator.lock();
            if acc.metadata_identifier() != entry.metadata_identifier() {
                return Ok(());
            }
            acc.add_query(provider, semantic)?
        };
        if triggered && self.inner.retile.automatic {
            self.spawn_retile(entry.name())?;
        }
        Ok(())
    }

    fn accumulator(&self, video: &str) -> Option<Arc<Mutex<RegretAccumulator>>> {
        self.inner.regret.get(video).map(|acc| acc.clone())
    }

    /// Start accounting regret for `video` against queries on `metadata_identifier`.
    pub fn activate_regret_based_retiling(
        &self,
        video: &str,
        metadata_identifier: Option<&str>,
        threshold: Option<f64>,
    ) -> Result<()> {
        let geometry = self.provider(video)?.manifest().geometry();
        let metadata_identifier = metadata_identifier.unwrap_or(video);
        let threshold = threshold.unwrap_or(self.inner.retile.threshold);
        let accumulator = RegretAccumulator::new(video, metadata_identifier, geometry, threshold);
        self.inner
            .regret
            .insert(video.to_string(), Arc::new(Mutex::new(accumulator)));
        tracing::info!(video, metadata = metadata_identifier, threshold, "Regret-based retiling active");
        Ok(())
    }

    /// Stop accounting regret for `video`. Returns false if it was not active.
    pub fn deactivate_regret_based_retiling(&self, video: &str) -> bool {
        let removed = self.inner.regret.remove(video).is_some();
        if removed {
            tracing::info!(video, "Regret-based retiling deactivated");
        }
        removed
    }

    /// Current state and regret of `video`, if accounting is active.
    pub fn regret(&self, video: &str) -> Option<(RetileState, u64)> {
        self.accumulator(video).map(|acc| {
            let acc = acc.lock();
            (acc.state(), acc.regret())
        })
    }

    /// Retile `video` to a layout fitted to the boxes queried since the last
    /// publish, and publish it.
    ///
    /// Returns `Ok(None)` when another retile of the video is already running.
    pub fn retile_video_based_on_regret(&self, video: &str) -> Result<Option<LayoutVersion>> {
        let accumulator = self
            .accumulator(video)
            .ok_or_else(|| Error::invalid_argument(format!("regret retiling is not active for '{video}'")))?;

        let (history, metadata_identifier) = {
            let mut acc = accumulator.lock();
            if !acc.begin_retile() {
                tracing::debug!(video, "Retile already in flight");
                return Ok(None);
            }
            (acc.history().to_vec(), acc.metadata_identifier().to_string())
        };

        let result = self.retile(video, &metadata_identifier, &history);
        accumulator.lock().finish_retile(result.is_ok());

        match result {
            Ok(version) => {
                tracing::info!(video, %version, boxes = history.len(), "Retile published");
                Ok(Some(version))
            }
            Err(e) => {
                tracing::error!(video, "Retile failed: {e}");
                Err(Error::retile_failed(video, e))
            }
        }
    }

    /// Account one whole-video query on `label`, then retile on the
    /// accumulated history. Regret accounting is activated for `video` with
    /// the configured threshold when it is not already active.
    pub fn retile_for_label(
        &self,
        video: &str,
        metadata_identifier: Option<&str>,
        label: &str,
    ) -> Result<Option<LayoutVersion>> {
        let metadata_identifier = metadata_identifier.unwrap_or(video);
        let active = match self.accumulator(video) {
            Some(acc) => {
                let acc = acc.lock();
                acc.metadata_identifier() == metadata_identifier
            }
            None => false,
        };
        if !active {
            self.activate_regret_based_retiling(video, Some(metadata_identifier), None)?;
        }
        let accumulator = self
            .accumulator(video)
            .ok_or_else(|| Error::invalid_argument(format!("regret retiling is not active for '{video}'")))?;

        let entry = self.entry(video, Some(metadata_identifier))?;
        let provider = self.provider(video)?;
        let semantic = self.semantic(&entry, label.into(), TemporalSelection::None);
        accumulator.lock().add_query(&provider, &semantic)?;

        self.retile_video_based_on_regret(video)
    }

    fn retile(
        &self,
        video: &str,
        metadata_identifier: &str,
        history: &[(u32, Rectangle)],
    ) -> Result<LayoutVersion> {
        let entry = self.entry(video, Some(metadata_identifier))?;
        let current = self.provider(video)?;
        let source = current
            .manifest()
            .source
            .clone()
            .ok_or_else(|| Error::invalid_argument("current version records no source video"))?;
        let geometry = current.manifest().geometry();
        let spans = self
            .inner
            .retile
            .fitter()
            .fit_spans(geometry, self.inner.gop_length, history)?;
        self.write_version(&entry, &source, geometry, spans)
    }

    /// Run a retile of `video` on a background thread.
    pub fn spawn_retile(&self, video: &str) -> Result<RetileJobId> {
        let id = RetileJobId::new();
        self.inner.jobs.insert(
            id,
            RetileRecord {
                id,
                video: video.to_string(),
                started_at: Utc::now(),
                finished_at: None,
                outcome: RetileOutcome::Running,
            },
        );

        let manager = self.clone();
        let name = video.to_string();
        let handle = std::thread::Builder::new()
            .name(format!("retile-{video}"))
            .spawn(move || {
                let outcome = match manager.retile_video_based_on_regret(&name) {
                    Ok(Some(version)) => RetileOutcome::Published { version },
                    Ok(None) => RetileOutcome::Skipped,
                    Err(e) => RetileOutcome::Failed {
                        reason: e.to_string(),
                    },
                };
                if let Some(mut record) = manager.inner.jobs.get_mut(&id) {
                    record.finished_at = Some(Utc::now());
                    record.outcome = outcome;
                }
            })?;

        self.inner.handles.lock().push(handle);
        tracing::info!(video, job = %id, "Background retile started");
        Ok(id)
    }

    /// Block until every background retile started so far has finished.
    pub fn join_background_retiles(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.inner.handles.lock());
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("Background retile thread panicked");
            }
        }
    }

    pub fn retile_job(&self, id: RetileJobId) -> Option<RetileRecord> {
        self.inner.jobs.get(&id).map(|record| record.clone())
    }

    /// All retile jobs, oldest first.
    pub fn retile_jobs(&self) -> Vec<RetileRecord> {
        let mut jobs: Vec<RetileRecord> = self.inner.jobs.iter().map(|r| r.clone()).collect();
        jobs.sort_by_key(|r| r.started_at);
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::FfmpegTileEncoder;
    use crate::semantic::InMemorySemanticIndex;
    use assert_matches::assert_matches;

    fn manager(dir: &Path) -> VideoManager {
        let config = Config::default();
        VideoManager::new(
            Catalog::open(dir).unwrap(),
            Arc::new(FfmpegTileEncoder::new(config.encoder.clone())),
            Arc::new(InMemorySemanticIndex::new()),
            &config,
        )
    }

    #[test]
    fn test_unstored_video() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        assert_matches!(manager.provider("pano"), Err(Error::NotStored(_)));
        assert_matches!(
            manager.select(
                "pano",
                None,
                "car".into(),
                TemporalSelection::None,
                SelectStrategy::Objects
            ),
            Err(Error::NotStored(_))
        );
        assert!(manager.activate_regret_based_retiling("pano", None, None).is_err());
    }

    #[test]
    fn test_regret_registry() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        assert!(!manager.deactivate_regret_based_retiling("pano"));
        assert!(manager.regret("pano").is_none());
        assert_matches!(
            manager.retile_video_based_on_regret("pano"),
            Err(Error::InvalidArgument(_))
        );
        assert!(manager.retile_jobs().is_empty());
    }
}
