//! The gallery facade.
//!
//! `Gallery` owns the whole pipeline: source loading, grouping, ranking,
//! filtering, pagination, engagement counts and the modal viewer. Callers
//! drive it with loads, queries, load-more signals and viewer commands, and
//! read the result back through `view()`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::GalleryConfig;
use crate::engagement::{Engagement, FetchReport, Metric, MetricsClient, OfflineMetrics};
use crate::error::{GalleryError, Result};
use crate::models::{GalleryItem, ProjectRecord, RawRecord, TargetKind};
use crate::ranking::{
    filter_items, group, list_identity, EngagementCounts, EngagementSource, Pagination,
    RankingScorer, RankingSession, SearchDebounce,
};
use crate::source::{
    EventBus, EventReceiver, LoadFilter, LoadStats, ManifestSource, ProjectClient, RecordStore,
    SourceBatch, SourceEvent, SourceLoader, UrlSigner,
};
use crate::viewer::{
    History, HistoryEntry, MemoryHistory, ProjectDetail, ProjectDetailCache, Step, Transition,
    UrlSync, ViewerNavigator, ViewerState,
};

/// Load status. `Loading` covers the window before the first result so
/// callers never render an empty state prematurely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryStatus {
    Loading,
    Empty,
    Ready,
}

/// Snapshot handed to the renderer.
#[derive(Debug)]
pub struct GalleryView<'a> {
    pub visible_items: &'a [GalleryItem],
    pub status: GalleryStatus,
    pub viewer: ViewerState,
    /// Length of the filtered list the window is taken from.
    pub total: usize,
    pub has_more: bool,
}

/// A started load. Run it (possibly on another task) and hand the outcome
/// back to `Gallery::apply_load`.
pub struct PendingLoad {
    generation: u64,
    loader: Arc<SourceLoader>,
    filter: LoadFilter,
}

impl PendingLoad {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn run(self) -> LoadOutcome {
        let result = self.loader.load(&self.filter).await;
        LoadOutcome {
            generation: self.generation,
            result,
        }
    }
}

pub struct LoadOutcome {
    generation: u64,
    result: Result<SourceBatch>,
}

pub struct Gallery<H: History = MemoryHistory> {
    loader: Arc<SourceLoader>,
    scorer: RankingScorer,
    engagement: Engagement,
    projects: Option<ProjectDetailCache>,
    events: Option<EventReceiver>,
    filter: LoadFilter,
    records: Vec<RawRecord>,
    source_projects: Vec<ProjectRecord>,
    ranked: Vec<GalleryItem>,
    filtered: Arc<Vec<GalleryItem>>,
    query: String,
    debounce: SearchDebounce,
    pagination: Pagination,
    navigator: ViewerNavigator,
    url_sync: UrlSync<H>,
    generation: u64,
    loading: bool,
    last_stats: Option<LoadStats>,
}

impl Gallery<MemoryHistory> {
    pub fn builder(store: Arc<dyn RecordStore>) -> GalleryBuilder<MemoryHistory> {
        GalleryBuilder::new(store)
    }
}

impl<H: History> Gallery<H> {
    // =========================================================================
    // Loading
    // =========================================================================

    /// Starts a load for the current filter. Any load started earlier becomes
    /// stale.
    pub fn begin_load(&mut self) -> PendingLoad {
        self.generation += 1;
        self.loading = true;
        debug!(generation = self.generation, filter = ?self.filter, "Starting load");
        PendingLoad {
            generation: self.generation,
            loader: self.loader.clone(),
            filter: self.filter.clone(),
        }
    }

    /// Applies a finished load. Returns `Ok(false)` for a stale outcome, which
    /// is discarded. A failed listing clears the items and leaves the gallery
    /// in the `Empty` state.
    pub fn apply_load(&mut self, outcome: LoadOutcome) -> Result<bool> {
        if outcome.generation != self.generation {
            debug!(
                stale = outcome.generation,
                current = self.generation,
                "Discarding stale load"
            );
            return Ok(false);
        }
        self.loading = false;

        match outcome.result {
            Ok(batch) => {
                self.records = batch.records;
                self.source_projects = batch.projects;
                self.last_stats = Some(batch.stats);
                self.rebuild();
                info!(items = self.ranked.len(), "Gallery ready");
                Ok(true)
            }
            Err(e) => {
                warn!("Load failed: {}", e);
                self.records.clear();
                self.source_projects.clear();
                self.last_stats = None;
                self.rebuild();
                Err(e)
            }
        }
    }

    /// Loads and applies in one step.
    pub async fn refresh(&mut self) -> Result<()> {
        let outcome = self.begin_load().run().await;
        self.apply_load(outcome).map(|_| ())
    }

    /// Switches between the public feed and the personal library. Returns the
    /// load to run when the filter changed.
    pub fn set_public_only(&mut self, public_only: bool) -> Option<PendingLoad> {
        if self.filter.public_only == public_only {
            return None;
        }
        self.filter.public_only = public_only;
        Some(self.begin_load())
    }

    pub fn set_owner(&mut self, owner: Option<String>) -> Option<PendingLoad> {
        if self.filter.owner == owner {
            return None;
        }
        self.filter.owner = owner;
        Some(self.begin_load())
    }

    pub fn filter(&self) -> &LoadFilter {
        &self.filter
    }

    pub fn last_stats(&self) -> Option<&LoadStats> {
        self.last_stats.as_ref()
    }

    // =========================================================================
    // Pipeline
    // =========================================================================

    /// Regroups and reranks from the current records.
    fn rebuild(&mut self) {
        let items = group(self.records.clone(), self.source_projects.clone());
        self.ranked = self.scorer.rank(&items, &self.engagement, Utc::now());
        self.refilter();
    }

    /// Reranks the current items with whatever engagement is cached now.
    pub fn rerank(&mut self) {
        self.ranked = self.scorer.rank(&self.ranked, &self.engagement, Utc::now());
        self.refilter();
    }

    fn refilter(&mut self) {
        self.filtered = Arc::new(filter_items(&self.ranked, &self.query));
        let identity = list_identity(&self.filtered, &self.query);
        if self.pagination.sync(identity, self.filtered.len()) {
            debug!(len = self.filtered.len(), "List identity changed, window reset");
        }
        if self.navigator.state().is_open() {
            let transition = self.navigator.rebase(self.filtered.clone());
            self.url_sync.apply(&transition, &self.navigator);
        }
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Applies `query` immediately, dropping any pending debounced input.
    pub fn set_query(&mut self, query: &str) {
        self.debounce.cancel();
        self.apply_query(query);
    }

    /// Records a keystroke; the query is applied once typing pauses.
    pub fn type_query(&mut self, query: &str, now: Instant) {
        self.debounce.input(query, now);
    }

    /// Applies the pending query if its debounce window has passed.
    pub fn poll_query(&mut self, now: Instant) -> bool {
        match self.debounce.poll(now) {
            Some(query) => {
                self.apply_query(&query);
                true
            }
            None => false,
        }
    }

    /// Waits out the debounce window and applies the trailing query.
    pub async fn settle_query(&mut self) -> bool {
        while let Some(deadline) = self.debounce.deadline() {
            tokio::time::sleep_until(deadline).await;
            if self.poll_query(Instant::now()) {
                return true;
            }
        }
        false
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    fn apply_query(&mut self, query: &str) {
        let query = query.trim();
        if query == self.query {
            return;
        }
        self.query = query.to_string();
        self.refilter();
    }

    // =========================================================================
    // Window
    // =========================================================================

    /// The load-more sentinel entered the viewport.
    pub fn on_sentinel_visible(&mut self) -> usize {
        self.pagination.load_more()
    }

    pub fn visible_items(&self) -> &[GalleryItem] {
        self.pagination.window(&self.filtered)
    }

    pub fn status(&self) -> GalleryStatus {
        if self.loading {
            GalleryStatus::Loading
        } else if self.filtered.is_empty() {
            GalleryStatus::Empty
        } else {
            GalleryStatus::Ready
        }
    }

    pub fn view(&self) -> GalleryView<'_> {
        GalleryView {
            visible_items: self.visible_items(),
            status: self.status(),
            viewer: self.navigator.state(),
            total: self.filtered.len(),
            has_more: self.pagination.has_more(),
        }
    }

    // =========================================================================
    // Engagement
    // =========================================================================

    /// Fetches counts for the ids in the visible window that were not
    /// fetched yet.
    pub async fn refresh_engagement(&self) -> FetchReport {
        self.engagement.fetch_for(self.visible_items()).await
    }

    pub async fn refetch_engagement(&self) -> FetchReport {
        self.engagement.refetch().await
    }

    pub fn engagement_for(&self, item: &GalleryItem) -> EngagementCounts {
        item.engagement_id()
            .map(|id| self.engagement.counts(item.kind(), id))
            .unwrap_or_default()
    }

    pub fn record_view(&self, kind: TargetKind, id: &str) -> u64 {
        self.engagement.cache(kind).update_count(Metric::Views, id, 1)
    }

    /// Optimistic like toggle.
    pub fn toggle_like(&self, kind: TargetKind, id: &str, liked: bool) -> u64 {
        let delta = if liked { 1 } else { -1 };
        self.engagement.cache(kind).update_count(Metric::Likes, id, delta)
    }

    pub fn confirm_likes(&self, kind: TargetKind, id: &str, absolute: u64) -> u64 {
        self.engagement.cache(kind).set_confirmed_likes(id, absolute)
    }

    // =========================================================================
    // Patches and events
    // =========================================================================

    /// Replaces a record by id everywhere it appears, keeping positions.
    pub fn patch_record(&mut self, record: &RawRecord) -> bool {
        let mut replaced = false;
        for existing in self.records.iter_mut().filter(|r| r.same_id(record)) {
            *existing = record.clone();
            replaced = true;
        }
        for item in self.ranked.iter_mut() {
            replaced |= item.replace_record(record);
        }
        for item in Arc::make_mut(&mut self.filtered).iter_mut() {
            item.replace_record(record);
        }
        if replaced {
            self.resnapshot_viewer();
        }
        replaced
    }

    /// Replaces a project by id, keeping its position.
    pub fn patch_project(&mut self, project: &ProjectRecord) -> bool {
        let mut replaced = false;
        for existing in self.source_projects.iter_mut().filter(|p| p.id == project.id) {
            *existing = project.clone();
            replaced = true;
        }
        for item in self.ranked.iter_mut() {
            replaced |= item.replace_project(project);
        }
        for item in Arc::make_mut(&mut self.filtered).iter_mut() {
            item.replace_project(project);
        }
        if replaced {
            self.resnapshot_viewer();
        }
        replaced
    }

    /// Inserts a newly created project at the front unless already present.
    pub fn insert_project(&mut self, project: ProjectRecord) -> bool {
        if !self.filter.public_only || self.source_projects.iter().any(|p| p.id == project.id) {
            return false;
        }
        self.source_projects.insert(0, project.clone());
        self.ranked.insert(0, GalleryItem::Project { project });
        self.refilter();
        true
    }

    /// Inserts a newly uploaded record at the front of the personal library,
    /// or into the item already holding its `group_id`. Ignored for the
    /// public feed and for paths already present.
    pub fn insert_record(&mut self, record: RawRecord) -> bool {
        if self.filter.public_only || self.records.iter().any(|r| r.path == record.path) {
            return false;
        }
        self.records.insert(0, record.clone());

        let Some(group_id) = record.group_id.clone() else {
            self.prepend_single(record);
            self.refilter();
            return true;
        };
        // The group may have degraded to a single when only one member loaded.
        let pos = self.ranked.iter().position(|item| match item {
            GalleryItem::Group { group_id: existing, .. } => *existing == group_id,
            GalleryItem::Single { image, .. } => image.group_id.as_deref() == Some(&group_id),
            GalleryItem::Project { .. } => false,
        });
        let Some(pos) = pos else {
            self.prepend_single(record);
            self.refilter();
            return true;
        };
        if let GalleryItem::Group { images, .. } = &mut self.ranked[pos] {
            images.push(record);
            images.sort_by_key(|m| m.group_index.unwrap_or(0));
        } else if let GalleryItem::Single { image, collection } = &self.ranked[pos] {
            let collection = collection.clone();
            let mut images = vec![image.clone(), record];
            images.sort_by_key(|m| m.group_index.unwrap_or(0));
            debug!("Upload promoted {} to a group", group_id);
            self.ranked[pos] = GalleryItem::Group {
                images,
                collection,
                group_id,
            };
        }
        self.refilter();
        true
    }

    fn prepend_single(&mut self, image: RawRecord) {
        let collection = image.collection.clone();
        self.ranked.insert(0, GalleryItem::Single { image, collection });
    }

    pub fn subscribe(&mut self, bus: &EventBus) {
        self.events = Some(bus.subscribe());
    }

    /// Applies every queued event. Returns how many changed the list.
    pub fn drain_events(&mut self) -> usize {
        let Some(events) = self.events.as_ref().map(EventReceiver::drain) else {
            return 0;
        };
        let mut applied = 0;
        for event in events {
            let changed = match event {
                SourceEvent::ProjectCreated(project) => self.insert_project(project),
                SourceEvent::ProjectUpdated(project) => {
                    if let Some(cache) = &self.projects {
                        cache.invalidate(&project.id);
                    }
                    self.patch_project(&project)
                }
                SourceEvent::RecordUpdated(record) => self.patch_record(&record),
                SourceEvent::RecordUploaded(record) => self.insert_record(record),
            };
            if changed {
                applied += 1;
            }
        }
        applied
    }

    // =========================================================================
    // Viewer
    // =========================================================================

    /// Opens the viewer at `index` of the filtered list.
    pub fn open_viewer(&mut self, index: usize, sub_index: usize) -> ViewerState {
        let transition = self.navigator.open(self.filtered.clone(), index, sub_index);
        self.sync_history(transition)
    }

    pub fn step_within_group(&mut self, step: Step) -> ViewerState {
        let transition = self.navigator.step_within_group(step);
        self.sync_history(transition)
    }

    pub fn step_across_items(&mut self, step: Step) -> ViewerState {
        let transition = self.navigator.step_across_items(step);
        self.sync_history(transition)
    }

    pub fn close_viewer(&mut self) -> ViewerState {
        let transition = self.navigator.close();
        self.sync_history(transition)
    }

    /// Call after the history moved back or forward outside the viewer.
    pub fn handle_pop(&mut self) -> ViewerState {
        self.url_sync.on_pop(&mut self.navigator);
        self.navigator.state()
    }

    pub fn viewer_state(&self) -> ViewerState {
        self.navigator.state()
    }

    pub fn viewer_item(&self) -> Option<&GalleryItem> {
        self.navigator.current_item()
    }

    pub fn viewer_image(&self) -> Option<&RawRecord> {
        self.navigator.current_image()
    }

    /// Detail of the project on screen, `None` unless viewing a project.
    pub async fn viewer_project(&self) -> Result<Option<Arc<ProjectDetail>>> {
        let Some(GalleryItem::Project { project }) = self.navigator.current_item() else {
            return Ok(None);
        };
        let Some(cache) = &self.projects else {
            return Err(GalleryError::ProjectUnavailable {
                id: project.id.clone(),
                reason: "no project client configured".to_string(),
            });
        };
        cache.get(&project.id).await.map(Some)
    }

    pub fn history(&self) -> &H {
        self.url_sync.history()
    }

    pub fn history_mut(&mut self) -> &mut H {
        self.url_sync.history_mut()
    }

    fn sync_history(&mut self, transition: Transition) -> ViewerState {
        self.url_sync.apply(&transition, &self.navigator);
        self.navigator.state()
    }

    /// Points the navigator at the patched list. Positions are unchanged, so
    /// this never touches history.
    fn resnapshot_viewer(&mut self) {
        if self.navigator.state().is_open() {
            self.navigator.rebase(self.filtered.clone());
        }
    }
}

/// Assembles a `Gallery` from its collaborators.
pub struct GalleryBuilder<H> {
    store: Arc<dyn RecordStore>,
    manifest: Option<Arc<dyn ManifestSource>>,
    signer: Option<Arc<dyn UrlSigner>>,
    metrics: Option<Arc<dyn MetricsClient>>,
    project_client: Option<Arc<dyn ProjectClient>>,
    session: Option<Arc<RankingSession>>,
    config: GalleryConfig,
    filter: LoadFilter,
    history: H,
}

impl GalleryBuilder<MemoryHistory> {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        let config = GalleryConfig::default();
        let history = MemoryHistory::new(HistoryEntry::page(config.viewer.base_path.clone()));
        Self {
            store,
            manifest: None,
            signer: None,
            metrics: None,
            project_client: None,
            session: None,
            config,
            filter: LoadFilter::public(),
            history,
        }
    }

    /// Replaces the config. The default history starts at the new base path.
    pub fn config(mut self, config: GalleryConfig) -> Self {
        self.history = MemoryHistory::new(HistoryEntry::page(config.viewer.base_path.clone()));
        self.config = config;
        self
    }
}

impl<H: History> GalleryBuilder<H> {
    pub fn manifest(mut self, manifest: Arc<dyn ManifestSource>) -> Self {
        self.manifest = Some(manifest);
        self
    }

    pub fn signer(mut self, signer: Arc<dyn UrlSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsClient>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn project_client(mut self, client: Arc<dyn ProjectClient>) -> Self {
        self.project_client = Some(client);
        self
    }

    /// Shares an existing session (seed and fetched ids).
    pub fn session(mut self, session: Arc<RankingSession>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn filter(mut self, filter: LoadFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn history<H2: History>(self, history: H2) -> GalleryBuilder<H2> {
        GalleryBuilder {
            store: self.store,
            manifest: self.manifest,
            signer: self.signer,
            metrics: self.metrics,
            project_client: self.project_client,
            session: self.session,
            config: self.config,
            filter: self.filter,
            history,
        }
    }

    pub fn build(self) -> Gallery<H> {
        let config = self.config;
        let session = self.session.unwrap_or_else(|| Arc::new(RankingSession::new()));

        let mut loader = SourceLoader::new(self.store).with_config(config.sources.clone());
        if let Some(manifest) = self.manifest {
            loader = loader.with_manifest(manifest);
        }
        if let Some(signer) = self.signer {
            loader = loader.with_signer(signer);
        }

        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(OfflineMetrics) as Arc<dyn MetricsClient>);
        let projects = self
            .project_client
            .map(|client| ProjectDetailCache::new(client, config.viewer.project_cache_capacity));

        Gallery {
            loader: Arc::new(loader),
            scorer: RankingScorer::new(session.clone(), config.ranking.clone()),
            engagement: Engagement::new(metrics, session, config.metrics.batch_limit),
            projects,
            events: None,
            filter: self.filter,
            records: Vec::new(),
            source_projects: Vec::new(),
            ranked: Vec::new(),
            filtered: Arc::new(Vec::new()),
            query: String::new(),
            debounce: SearchDebounce::new(Duration::from_millis(config.search.debounce_ms)),
            pagination: Pagination::new(&config.pagination),
            navigator: ViewerNavigator::new(),
            url_sync: UrlSync::new(self.history, config.viewer.base_path.clone()),
            generation: 0,
            loading: true,
            last_stats: None,
        }
    }
}
