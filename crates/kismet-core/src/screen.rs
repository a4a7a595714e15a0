//! One generation screen: input handling, the state cell, image resolution
//! and the save toggle for a single [`ContentKind`].
//!
//! All state transitions go through [`reduce`]. Work started by a generation
//! or a resolution carries the generation sequence number it belongs to;
//! completions from an older generation, or from after [`Screen::teardown`],
//! are dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::error::{ErrorKind, KismetError, Result};
use crate::export::export_story;
use crate::files::FileStore;
use crate::imagegen::ImageGenerator;
use crate::kind::{ContentKind, StoryKind};
use crate::llm::TextGenerator;
use crate::model::{AssetRef, GenerationResult, SavedImage, Segment, SegmentId};
use crate::parse::{IdSource, UuidIds};
use crate::state::{reduce, Event, Phase, UiError, UiState};
use crate::storage::{LiveQuery, Record, Repository, SqliteStorage};
use crate::view::{project, ViewState};

/// Natural keys remembered for prompt composition.
const HISTORY_LIMIT: usize = 50;
const NOTICE_CAPACITY: usize = 32;

pub const EMPTY_PROMPT: &str = "Prompt cannot be empty";
pub const EMPTY_RESPONSE: &str = "The service returned an empty response. Please try again!";
pub const NO_IMAGE: &str = "No image was generated. Please try again!";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Screen<K: ContentKind, T: TextGenerator, I: ImageGenerator> {
    inner: Arc<Inner<K, T, I>>,
}

struct Inner<K: ContentKind, T: TextGenerator, I: ImageGenerator> {
    kind: K,
    text: T,
    images: I,
    repo: Repository<K::Record>,
    image_cache: Repository<SavedImage>,
    files: FileStore,
    state: watch::Sender<UiState>,
    saved: watch::Sender<bool>,
    notices: broadcast::Sender<String>,
    filters: Mutex<K::Filters>,
    last_input: Mutex<Option<String>>,
    ids: Mutex<Box<dyn IdSource>>,
    history: Mutex<Vec<String>>,
    /// Segment id to the generation sequence its resolution belongs to.
    in_flight: Mutex<HashMap<SegmentId, u64>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    seq: AtomicU64,
    closed: AtomicBool,
}

impl<K: ContentKind, T: TextGenerator, I: ImageGenerator> Screen<K, T, I> {
    /// `files` provides the root; the screen gets its own cache directory.
    pub fn new(kind: K, text: T, images: I, storage: SqliteStorage, files: &FileStore) -> Self {
        let (state, _) = watch::channel(UiState::default());
        let (saved, _) = watch::channel(false);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                kind,
                text,
                images,
                repo: Repository::new(storage.clone()),
                image_cache: Repository::new(storage),
                files: files.for_session(),
                state,
                saved,
                notices,
                filters: Mutex::new(K::Filters::default()),
                last_input: Mutex::new(None),
                ids: Mutex::new(Box::new(UuidIds)),
                history: Mutex::new(Vec::new()),
                in_flight: Mutex::new(HashMap::new()),
                tasks: Mutex::new(Vec::new()),
                seq: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Replace the segment id source.
    pub fn with_ids(self, ids: impl IdSource + 'static) -> Self {
        *lock(&self.inner.ids) = Box::new(ids);
        self
    }

    pub fn with_filters(self, filters: K::Filters) -> Self {
        *lock(&self.inner.filters) = filters;
        self
    }

    pub fn kind(&self) -> &K {
        &self.inner.kind
    }

    pub fn state(&self) -> UiState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.inner.state.subscribe()
    }

    pub fn is_saved(&self) -> bool {
        *self.inner.saved.borrow()
    }

    pub fn saved(&self) -> watch::Receiver<bool> {
        self.inner.saved.subscribe()
    }

    /// Short user-facing messages (errors, "Saved", ...).
    pub fn notices(&self) -> broadcast::Receiver<String> {
        self.inner.notices.subscribe()
    }

    pub fn filters(&self) -> K::Filters {
        lock(&self.inner.filters).clone()
    }

    pub fn view(&self) -> ViewState {
        project(&self.state(), &self.filters())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Generate from user input. Blank input is rejected without contacting
    /// the text service.
    pub async fn submit(&self, input: &str) -> UiState {
        if self.is_closed() {
            return self.state();
        }
        let input = input.trim();
        if input.is_empty() {
            let err = KismetError::InvalidInput(EMPTY_PROMPT.into());
            self.inner.notify(err.user_message());
            self.inner.apply(Event::Rejected(UiError::from(&err)));
            return self.state();
        }
        *lock(&self.inner.last_input) = Some(input.to_string());
        self.generate(input).await
    }

    /// Generate again from the last input, or the kind's default input.
    pub async fn refresh(&self) -> UiState {
        if self.is_closed() {
            return self.state();
        }
        let input = lock(&self.inner.last_input)
            .clone()
            .unwrap_or_else(|| self.inner.kind.default_input().to_string());
        self.generate(&input).await
    }

    /// Replace the filters and generate with them.
    pub async fn apply_filter(&self, filters: K::Filters) -> UiState {
        *lock(&self.inner.filters) = filters;
        self.refresh().await
    }

    async fn generate(&self, input: &str) -> UiState {
        let inner = &self.inner;
        let seq = inner.seq.fetch_add(1, Ordering::SeqCst) + 1;
        inner.cancel_resolutions();
        inner.set_saved(false);
        inner.apply(Event::Started);
        tracing::debug!(kind = K::NAME, seq, "generation started");

        let filters = self.filters();
        let outcome = inner.produce(input, &filters).await;

        if !inner.is_current(seq) {
            tracing::debug!(kind = K::NAME, seq, "stale generation dropped");
            return self.state();
        }

        match outcome {
            Ok(result) => {
                let key = inner.kind.natural_key(&result);
                if let Some(key) = &key {
                    inner.remember(key);
                }
                let prompts = if inner.kind.auto_resolve() {
                    result.unresolved_prompts()
                } else {
                    Vec::new()
                };
                tracing::info!(
                    kind = K::NAME,
                    segments = result.segments.len(),
                    "generation finished"
                );
                inner.apply(Event::Generated(result));
                if let Some(key) = key {
                    inner.refresh_saved_flag(&key, seq).await;
                }
                for (id, prompt) in prompts {
                    self.resolve_segment(id, prompt);
                }
            }
            Err(err) => {
                tracing::warn!(kind = K::NAME, "generation failed: {err}");
                let error = inner.ui_error(&err);
                inner.notify(error.message.clone());
                inner.apply(Event::Failed(error));
            }
        }
        self.state()
    }

    /// Start resolving an image segment of the current result.
    ///
    /// Returns `false` when nothing was dispatched: the segment is unknown,
    /// not an image, or already being resolved. Must be called from within a
    /// Tokio runtime.
    pub fn resolve_segment(&self, id: SegmentId, prompt: impl Into<String>) -> bool {
        let inner = &self.inner;
        let prompt = prompt.into();
        if self.is_closed() || prompt.trim().is_empty() {
            return false;
        }
        let resolving = {
            let state = inner.state.borrow();
            if state.phase != Phase::Success {
                None
            } else {
                state
                    .result
                    .as_ref()
                    .and_then(|r| r.segment(&id))
                    .and_then(|s| match s {
                        Segment::ImagePrompt { resolving, .. } => Some(*resolving),
                        _ => None,
                    })
            }
        };
        match resolving {
            None => {
                tracing::debug!(segment = %id, "resolution requested for unknown segment");
                return false;
            }
            Some(true) => {
                tracing::debug!(segment = %id, "segment is already resolving");
                return false;
            }
            Some(false) => {}
        }

        let seq = inner.seq.load(Ordering::SeqCst);
        {
            let mut in_flight = lock(&inner.in_flight);
            if in_flight.get(&id) == Some(&seq) {
                tracing::debug!(segment = %id, "resolution already in flight");
                return false;
            }
            in_flight.insert(id.clone(), seq);
        }

        inner.apply(Event::ResolutionStarted(id.clone()));
        let task_inner = Arc::clone(inner);
        let handle = tokio::spawn(async move {
            let outcome = task_inner.fetch_image(&prompt).await;
            task_inner.finish_resolution(seq, id, outcome);
        });

        let mut tasks = lock(&inner.tasks);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
        true
    }

    /// Save the displayed result. Resolved images are copied out of the
    /// session cache so the record only references permanent files.
    pub async fn save(&self) -> Result<i64> {
        let inner = &self.inner;
        let result = self
            .displayed()
            .ok_or_else(|| KismetError::InvalidInput("Nothing to save yet".into()))?;
        let key = inner.kind.natural_key(&result).ok_or_else(|| {
            KismetError::InvalidInput(format!("This {} cannot be saved", K::NAME))
        })?;

        let mut assets = HashMap::new();
        for segment in &result.segments {
            if let Segment::ImagePrompt {
                id,
                resolved: Some(asset),
                ..
            } = segment
            {
                let path = inner
                    .files
                    .persist(asset, inner.kind.asset_dir(), &key)
                    .await?;
                assets.insert(id.clone(), path);
            }
        }

        let filters = self.filters();
        let record = inner.kind.to_record(&result, &filters, &assets)?;
        let id = inner.repo.save(&record).await?;
        inner.set_saved(true);
        inner.notify("Saved".to_string());
        Ok(id)
    }

    /// Delete the saved record matching the displayed result, if any.
    pub async fn unsave(&self) -> Result<()> {
        let inner = &self.inner;
        let key = self
            .displayed()
            .and_then(|r| inner.kind.natural_key(&r))
            .ok_or_else(|| KismetError::InvalidInput("Nothing to remove".into()))?;
        if let Some(record) = inner.repo.get_by_key(&key).await? {
            inner.repo.delete(&record).await?;
        }
        inner.set_saved(false);
        inner.notify("Removed from saved".to_string());
        Ok(())
    }

    /// Save or unsave depending on the current flag. Returns the new flag.
    pub async fn toggle_saved(&self) -> Result<bool> {
        if self.is_saved() {
            self.unsave().await?;
            Ok(false)
        } else {
            self.save().await?;
            Ok(true)
        }
    }

    /// Delete a saved record. Clears the saved flag when it is the one on screen.
    pub async fn delete(&self, record: &K::Record) -> Result<()> {
        let inner = &self.inner;
        inner.repo.delete(record).await?;
        let displayed = self.displayed().and_then(|r| inner.kind.natural_key(&r));
        if displayed.as_deref() == Some(record.natural_key()) {
            inner.set_saved(false);
        }
        Ok(())
    }

    /// Show the most recently saved record, or generate when there is none.
    pub async fn restore_or_generate(&self) -> UiState {
        match self.inner.repo.get_latest().await {
            Ok(Some(record)) => {
                self.show(&record);
                return self.state();
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(kind = K::NAME, "failed to load last saved record: {e}"),
        }
        self.refresh().await
    }

    /// Display a saved record by row id.
    pub async fn show_saved(&self, id: i64) -> Result<UiState> {
        let record = self
            .inner
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| KismetError::NotFound(format!("{} {id}", K::NAME)))?;
        self.show(&record);
        Ok(self.state())
    }

    /// Display a saved record. Cancels any generation in progress.
    pub fn show(&self, record: &K::Record) {
        let inner = &self.inner;
        if self.is_closed() {
            return;
        }
        inner.seq.fetch_add(1, Ordering::SeqCst);
        inner.cancel_resolutions();
        let (result, filters) = inner.kind.from_record(record);
        let prompts = if inner.kind.auto_resolve() {
            result.unresolved_prompts()
        } else {
            Vec::new()
        };
        *lock(&inner.filters) = filters;
        inner.apply(Event::Restored(result));
        inner.set_saved(true);
        for (id, prompt) in prompts {
            self.resolve_segment(id, prompt);
        }
    }

    /// Every saved record of this kind, newest first, re-emitted on change.
    pub fn saved_items(&self) -> LiveQuery<Vec<K::Record>> {
        self.inner.repo.watch_all()
    }

    /// Saved records whose key contains `query` (case-insensitive).
    pub fn search_saved(&self, query: &str) -> LiveQuery<Vec<K::Record>> {
        self.inner.repo.watch_search(query)
    }

    pub fn repository(&self) -> &Repository<K::Record> {
        &self.inner.repo
    }

    /// Stop all work. Late completions are ignored and the session's cached
    /// images are removed. Safe to call more than once.
    pub fn teardown(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.cancel_resolutions();
        inner.files.purge_cache();
        tracing::debug!(kind = K::NAME, "screen torn down");
    }

    fn displayed(&self) -> Option<GenerationResult> {
        let state = self.inner.state.borrow();
        match (state.phase, &state.result) {
            (Phase::Success, Some(result)) => Some(result.clone()),
            _ => None,
        }
    }
}

impl<T: TextGenerator, I: ImageGenerator> Screen<StoryKind, T, I> {
    /// Export the displayed story as HTML. The outcome is also sent as a notice.
    pub async fn export(&self, out: Option<&Path>) -> Result<PathBuf> {
        let outcome = self.export_displayed(out).await;
        match &outcome {
            Ok(path) => self
                .inner
                .notify(format!("Story exported to {}", path.display())),
            Err(e) => self.inner.notify(format!("Export failed: {}", e.user_message())),
        }
        outcome
    }

    async fn export_displayed(&self, out: Option<&Path>) -> Result<PathBuf> {
        let inner = &self.inner;
        let result = self
            .displayed()
            .ok_or_else(|| KismetError::InvalidInput("Nothing to export yet".into()))?;
        let assets: HashMap<SegmentId, PathBuf> = result
            .segments
            .iter()
            .filter_map(|s| match s {
                Segment::ImagePrompt {
                    id,
                    resolved: Some(asset),
                    ..
                } => Some((id.clone(), asset.path().to_path_buf())),
                _ => None,
            })
            .collect();
        let story = inner.kind.to_record(&result, &self.filters(), &assets)?;
        export_story(&inner.files, &story, out).await
    }
}

impl<K: ContentKind, T: TextGenerator, I: ImageGenerator> Drop for Screen<K, T, I> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<K: ContentKind, T: TextGenerator, I: ImageGenerator> Inner<K, T, I> {
    fn apply(&self, event: Event) {
        self.state.send_if_modified(|state| {
            let next = reduce(state, event);
            if next == *state {
                false
            } else {
                *state = next;
                true
            }
        });
    }

    fn set_saved(&self, value: bool) {
        self.saved.send_if_modified(|saved| {
            let changed = *saved != value;
            *saved = value;
            changed
        });
    }

    /// Abort resolutions started for an earlier result.
    fn cancel_resolutions(&self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        lock(&self.in_flight).clear();
    }

    fn notify(&self, message: String) {
        let _ = self.notices.send(message);
    }

    fn is_current(&self, seq: u64) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.seq.load(Ordering::SeqCst) == seq
    }

    fn remember(&self, key: &str) {
        let mut history = lock(&self.history);
        history.retain(|k| k != key);
        history.push(key.to_string());
        if history.len() > HISTORY_LIMIT {
            let excess = history.len() - HISTORY_LIMIT;
            history.drain(..excess);
        }
    }

    fn ui_error(&self, err: &KismetError) -> UiError {
        let mut error = UiError::from(err);
        if error.kind == ErrorKind::ParseFailure {
            error.message = self.kind.parse_failure_message().to_string();
        }
        error
    }

    async fn produce(&self, input: &str, filters: &K::Filters) -> Result<GenerationResult> {
        let direct = {
            let mut ids = lock(&self.ids);
            self.kind.direct(input, filters, &mut **ids)
        };
        if let Some(result) = direct {
            return Ok(result);
        }

        let history = lock(&self.history).clone();
        let prompt = self.kind.compose(input, filters, &history);
        let response = self.text.generate_text(&prompt).await?;
        if response.trim().is_empty() {
            return Err(KismetError::EmptyResult(EMPTY_RESPONSE.into()));
        }
        let mut ids = lock(&self.ids);
        self.kind.interpret(&response, &mut **ids)
    }

    async fn refresh_saved_flag(&self, key: &str, seq: u64) {
        match self.repo.get_by_key(key).await {
            Ok(found) if self.is_current(seq) => self.set_saved(found.is_some()),
            Ok(_) => {}
            Err(e) => tracing::warn!(kind = K::NAME, "failed to check saved state: {e}"),
        }
    }

    /// A previously saved image with the same prompt is reused; otherwise
    /// the image service is called and the bytes land in the session cache.
    async fn fetch_image(&self, prompt: &str) -> Result<Option<AssetRef>> {
        match self.image_cache.get_by_key(prompt).await {
            Ok(Some(saved)) => {
                if tokio::fs::try_exists(&saved.image_path).await.unwrap_or(false) {
                    tracing::debug!("image reused from saved images");
                    return Ok(Some(AssetRef::new(saved.image_path)));
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("saved image lookup failed: {e}"),
        }

        let Some(bytes) = self.images.generate_image(prompt).await? else {
            return Ok(None);
        };
        self.files.save_cached(&bytes, prompt).await.map(Some)
    }

    fn finish_resolution(&self, seq: u64, id: SegmentId, outcome: Result<Option<AssetRef>>) {
        {
            let mut in_flight = lock(&self.in_flight);
            if in_flight.get(&id) == Some(&seq) {
                in_flight.remove(&id);
            }
        }
        if !self.is_current(seq) {
            tracing::debug!(segment = %id, "stale resolution dropped");
            return;
        }
        match outcome {
            Ok(Some(asset)) => self.apply(Event::Resolved { id, asset }),
            Ok(None) => {
                self.notify(NO_IMAGE.to_string());
                self.apply(Event::ResolutionFailed(id));
            }
            Err(e) => {
                tracing::warn!(segment = %id, "image resolution failed: {e}");
                self.notify(e.user_message());
                self.apply(Event::ResolutionFailed(id));
            }
        }
    }
}
