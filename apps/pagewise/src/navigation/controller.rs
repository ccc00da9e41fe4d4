//! Reader Navigation Controller
//!
//! Owns the live [`ReaderSession`], the [`NavigationState`] and the engine
//! event channel. Engine operations that can take long (loading, location
//! index passes) run as spawned tasks and report back as events tagged with
//! the load generation, so the controller never blocks on them and results
//! from superseded loads are dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::config::ReaderConfig;
use crate::engine::{
    self, EngineEvent, EngineHandle, EventSink, Layout, PageRenderer, PagedAdapter, Position,
    ReaderEngine, ReflowAdapter, ReflowRenderer, TaggedEvent, Viewport,
};
use crate::error::{EngineResult, ReaderError, Result};
use crate::source::{SourceInput, SourceRef, SourceResolver};

use super::state::{NavigationState, NoopReason, ReaderStatus};
use super::view::{Intent, ReaderSnapshot};

/// Outcome of a navigation or style intent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// A command reached the engine; the position commits on confirmation
    Issued,
    Noop(NoopReason),
}

/// One accepted document and the engine handle rendering it
#[derive(Debug)]
pub struct ReaderSession {
    id: Uuid,
    generation: u64,
    source: SourceRef,
    handle: Option<EngineHandle>,
    opened_at: DateTime<Utc>,
}

impl ReaderSession {
    fn new(generation: u64, source: SourceRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation,
            source,
            handle: None,
            opened_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    /// Engine handle, once the load finished
    pub fn handle(&self) -> Option<EngineHandle> {
        self.handle
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }
}

pub struct ReaderController {
    engine: Arc<dyn ReaderEngine>,
    resolver: SourceResolver,
    viewport: Arc<Viewport>,
    config: ReaderConfig,
    state: NavigationState,
    session: Option<ReaderSession>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    events_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    pending: usize,
}

impl ReaderController {
    pub fn new(engine: Arc<dyn ReaderEngine>, config: ReaderConfig) -> Self {
        let resolver = SourceResolver::new(engine.format(), &config.upload);
        Self::with_resolver(engine, resolver, config)
    }

    pub fn with_resolver(
        engine: Arc<dyn ReaderEngine>,
        resolver: SourceResolver,
        config: ReaderConfig,
    ) -> Self {
        let (events_tx, events_rx) = engine::channel();
        let state = NavigationState::new(engine.layout(), config.scale.clone(), config.initial_theme);

        Self {
            viewport: Arc::new(Viewport::new(config.viewport_id.clone())),
            engine,
            resolver,
            config,
            state,
            session: None,
            events_tx,
            events_rx,
            pending: 0,
        }
    }

    /// Controller for a page-indexed (PDF) engine
    pub fn paged<R: PageRenderer + 'static>(renderer: Arc<R>, config: ReaderConfig) -> Self {
        Self::new(Arc::new(PagedAdapter::new(renderer)), config)
    }

    /// Controller for a reflowable (EPUB) engine
    pub fn reflowable<R: ReflowRenderer + 'static>(renderer: Arc<R>, config: ReaderConfig) -> Self {
        Self::new(Arc::new(ReflowAdapter::new(renderer)), config)
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn session(&self) -> Option<&ReaderSession> {
        self.session.as_ref()
    }

    pub fn viewport(&self) -> &Arc<Viewport> {
        &self.viewport
    }

    pub fn resolver(&self) -> &SourceResolver {
        &self.resolver
    }

    pub fn snapshot(&self) -> ReaderSnapshot {
        self.state.snapshot()
    }

    /// Number of spawned engine operations not yet reported back
    pub fn pending_operations(&self) -> usize {
        self.pending
    }

    /// Replace the current document.
    ///
    /// A rejected source returns `InvalidFormat` and leaves the live session
    /// untouched. An accepted one tears the old session down and starts
    /// loading in the background.
    pub async fn open(&mut self, input: SourceInput) -> Result<()> {
        let source = self.resolver.resolve(input)?;

        if source.format() != self.engine.format() {
            source.release();
            return Err(ReaderError::InvalidFormat(format!(
                "{:?} source for a {:?} engine",
                source.format(),
                self.engine.format()
            )));
        }

        self.teardown().await;

        let generation = self.state.begin_session();
        let session = ReaderSession::new(generation, source.clone());

        tracing::info!(
            session_id = %session.id,
            generation,
            source = %source.display_name(),
            "Opening document"
        );

        self.session = Some(session);
        self.spawn_load(generation, source);
        Ok(())
    }

    /// Tear the session down and return to `Empty`
    pub async fn close(&mut self) {
        self.teardown().await;
        self.state.reset();
    }

    pub async fn next(&mut self) -> Navigation {
        let target = match self.state.request_next() {
            Ok(target) => target,
            Err(reason) => return self.noop("next", reason),
        };
        let Some(handle) = self.live_handle() else {
            return self.noop("next", NoopReason::NotReady);
        };

        tracing::debug!(handle = %handle, target, "Next page");
        let result = self.engine.next(handle).await;
        self.issued("next", result)
    }

    pub async fn prev(&mut self) -> Navigation {
        let target = match self.state.request_prev() {
            Ok(target) => target,
            Err(reason) => return self.noop("prev", reason),
        };
        let Some(handle) = self.live_handle() else {
            return self.noop("prev", NoopReason::NotReady);
        };

        tracing::debug!(handle = %handle, target, "Previous page");
        let result = self.engine.prev(handle).await;
        self.issued("prev", result)
    }

    /// Jump to a 1-based position, clamped to the document
    pub async fn go_to(&mut self, position: u32) -> Navigation {
        let target = match self.state.request_go_to(position) {
            Ok(target) => target,
            Err(reason) => return self.noop("go_to", reason),
        };
        let Some(handle) = self.live_handle() else {
            return self.noop("go_to", NoopReason::NotReady);
        };

        let result = self.engine.display_at(handle, &Position::Page(target)).await;
        self.issued("go_to", result)
    }

    pub async fn zoom_in(&mut self) -> Navigation {
        let step = self.config.scale.zoom_step;
        self.zoom_by(step).await
    }

    pub async fn zoom_out(&mut self) -> Navigation {
        let step = self.config.scale.zoom_step;
        self.zoom_by(-step).await
    }

    pub async fn increase_font(&mut self) -> Navigation {
        let step = self.config.scale.font_step;
        self.font_by(step).await
    }

    pub async fn decrease_font(&mut self) -> Navigation {
        let step = self.config.scale.font_step;
        self.font_by(-step).await
    }

    /// Flip the theme; reflowable documents lay out again
    pub async fn toggle_theme(&mut self) -> Navigation {
        if self.state.layout() == Layout::Reflowable && self.relayout_blocked() {
            return self.noop("toggle_theme", NoopReason::NotReady);
        }

        let theme = self.state.toggle_theme();
        tracing::debug!(?theme, "Theme toggled");

        match self.state.layout() {
            Layout::Reflowable => self.relayout().await,
            Layout::Paged => self.restyle().await,
        }
    }

    /// Apply one intent; only `Open` can fail
    pub async fn dispatch(&mut self, intent: Intent) -> Result<()> {
        match intent {
            Intent::Next => {
                self.next().await;
            }
            Intent::Prev => {
                self.prev().await;
            }
            Intent::GoTo(position) => {
                self.go_to(position).await;
            }
            Intent::ZoomIn => {
                self.zoom_in().await;
            }
            Intent::ZoomOut => {
                self.zoom_out().await;
            }
            Intent::IncreaseFont => {
                self.increase_font().await;
            }
            Intent::DecreaseFont => {
                self.decrease_font().await;
            }
            Intent::ToggleTheme => {
                self.toggle_theme().await;
            }
            Intent::Open(input) => self.open(input).await?,
        }
        Ok(())
    }

    /// Apply one engine event
    pub async fn handle_event(&mut self, tagged: TaggedEvent) {
        if tagged.event.completes_operation() {
            self.pending = self.pending.saturating_sub(1);
        }

        if !self.state.is_current(tagged.generation) {
            tracing::debug!(
                generation = tagged.generation,
                current = self.state.generation(),
                event = ?tagged.event,
                "Discarding stale engine event"
            );
            if let EngineEvent::Loaded { handle } = tagged.event {
                // A superseded load still owns engine resources
                if let Err(error) = self.engine.destroy(handle).await {
                    tracing::warn!(handle = %handle, %error, "Failed to destroy superseded handle");
                }
            }
            return;
        }

        match tagged.event {
            EngineEvent::Loaded { handle } => self.on_loaded(handle).await,
            EngineEvent::LoadFailed { message } => {
                tracing::warn!(generation = tagged.generation, %message, "Document failed to load");
                self.state.on_load_error(message);
            }
            EngineEvent::LocationIndexReady { epoch, total } => {
                self.on_location_index(epoch, total).await
            }
            EngineEvent::LocationIndexFailed { epoch, message } => {
                if self.state.on_layout_failed(epoch, message.clone()) {
                    tracing::warn!(epoch, %message, "Location index failed");
                } else {
                    tracing::debug!(epoch, "Discarding stale layout failure");
                }
            }
            EngineEvent::LocationChanged {
                position,
                total,
                location,
            } => {
                if !self.state.on_location_changed(position, total, location) {
                    tracing::debug!(position, status = ?self.state.status(), "Location change ignored");
                }
            }
            EngineEvent::Error { detail } => {
                tracing::warn!(%detail, "Engine error");
                self.state.on_load_error(detail);
            }
        }
    }

    /// Process events until no spawned operation is outstanding
    pub async fn run_until_idle(&mut self) {
        loop {
            while let Ok(event) = self.events_rx.try_recv() {
                self.handle_event(event).await;
            }
            if self.pending == 0 {
                return;
            }
            if let Some(event) = self.events_rx.recv().await {
                self.handle_event(event).await;
            }
        }
    }

    /// Drive the controller from an intent channel, publishing a snapshot
    /// after every change. Returns after `intents` closes and the session was
    /// torn down.
    pub async fn run(
        mut self,
        mut intents: mpsc::Receiver<Intent>,
        snapshots: watch::Sender<ReaderSnapshot>,
    ) {
        snapshots.send_replace(self.snapshot());

        loop {
            tokio::select! {
                intent = intents.recv() => match intent {
                    Some(intent) => {
                        if let Err(error) = self.dispatch(intent).await {
                            tracing::warn!(%error, "Intent rejected");
                        }
                    }
                    None => break,
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
            }

            let snapshot = self.snapshot();
            snapshots.send_if_modified(|current| {
                if *current == snapshot {
                    false
                } else {
                    *current = snapshot;
                    true
                }
            });
        }

        self.close().await;
        snapshots.send_replace(self.snapshot());
        tracing::debug!("Reader controller stopped");
    }

    fn live_handle(&self) -> Option<EngineHandle> {
        self.session.as_ref().and_then(|session| session.handle)
    }

    fn noop(&self, intent: &'static str, reason: NoopReason) -> Navigation {
        tracing::debug!(intent, ?reason, status = ?self.state.status(), "Navigation no-op");
        Navigation::Noop(reason)
    }

    fn issued(&self, intent: &'static str, result: EngineResult<()>) -> Navigation {
        match result {
            Ok(()) => Navigation::Issued,
            Err(error) => {
                tracing::warn!(intent, %error, "Engine rejected command");
                Navigation::Noop(NoopReason::EngineRejected)
            }
        }
    }

    async fn zoom_by(&mut self, delta: f32) -> Navigation {
        match self.state.set_zoom(delta) {
            Ok(zoom) => {
                tracing::debug!(zoom, "Zoom changed");
                self.restyle().await
            }
            Err(reason) => self.noop("zoom", reason),
        }
    }

    async fn font_by(&mut self, delta: i32) -> Navigation {
        if self.state.layout() == Layout::Reflowable && self.relayout_blocked() {
            return self.noop("font_scale", NoopReason::NotReady);
        }

        match self.state.set_font_scale(delta) {
            Ok(percent) => {
                tracing::debug!(percent, "Font scale changed");
                self.relayout().await
            }
            Err(reason) => self.noop("font_scale", reason),
        }
    }

    /// A loaded handle that failed cannot lay out again; the style stays as is
    fn relayout_blocked(&self) -> bool {
        self.live_handle().is_some()
            && !matches!(
                self.state.status(),
                ReaderStatus::Ready | ReaderStatus::Loading
            )
    }

    /// Push the style without invalidating positions
    async fn restyle(&mut self) -> Navigation {
        let Some(handle) = self.live_handle() else {
            return Navigation::Noop(NoopReason::NotReady);
        };
        let style = self.state.style();
        let result = self.engine.apply_style(handle, &style).await;
        self.issued("restyle", result)
    }

    /// Push a reflowing style and regenerate the location index
    async fn relayout(&mut self) -> Navigation {
        let Some(handle) = self.live_handle() else {
            return Navigation::Noop(NoopReason::NotReady);
        };
        if !matches!(
            self.state.status(),
            ReaderStatus::Ready | ReaderStatus::Loading
        ) {
            return self.noop("relayout", NoopReason::NotReady);
        }

        let epoch = self.state.begin_relayout();
        let style = self.state.style();
        tracing::debug!(handle = %handle, epoch, "Re-layout");

        if let Err(error) = self.engine.apply_style(handle, &style).await {
            tracing::warn!(handle = %handle, %error, "Style change failed");
            self.state.on_load_error(error.user_message());
            return Navigation::Noop(NoopReason::EngineRejected);
        }

        self.spawn_location_index(handle, epoch);
        Navigation::Issued
    }

    async fn on_loaded(&mut self, handle: EngineHandle) {
        let Some(session) = self.session.as_mut() else {
            if let Err(error) = self.engine.destroy(handle).await {
                tracing::warn!(handle = %handle, %error, "Failed to destroy orphaned handle");
            }
            return;
        };
        session.handle = Some(handle);

        if let Err(error) = self.engine.mount_to(handle, &self.viewport).await {
            tracing::warn!(handle = %handle, %error, "Mount failed");
            self.state.on_load_error(error.user_message());
            return;
        }

        let style = self.state.style();
        if let Err(error) = self.engine.apply_style(handle, &style).await {
            tracing::warn!(handle = %handle, %error, "Initial style failed");
        }

        let epoch = self.state.begin_layout();
        self.spawn_location_index(handle, epoch);
    }

    async fn on_location_index(&mut self, epoch: u64, total: u32) {
        if !self.state.on_layout_complete(epoch, total) {
            tracing::debug!(epoch, current = self.state.layout_epoch(), "Discarding stale location index");
            return;
        }
        if self.state.status() != ReaderStatus::Ready {
            return;
        }
        let Some(handle) = self.live_handle() else {
            return;
        };

        // Reflowed documents return to the token read before the re-layout
        let target = match (self.state.layout(), self.state.current_location()) {
            (Layout::Reflowable, Some(token)) => Position::Location(token.clone()),
            _ => Position::Page(self.state.current_position()),
        };

        tracing::debug!(handle = %handle, total, position = %target, "Document ready");

        if let Err(error) = self.engine.display_at(handle, &target).await {
            tracing::warn!(handle = %handle, %error, "Initial display failed");
            self.state.on_load_error(error.user_message());
        }
    }

    fn spawn_load(&mut self, generation: u64, source: SourceRef) {
        let engine = Arc::clone(&self.engine);
        let options = self.config.render.clone();
        let events = EventSink::new(generation, self.events_tx.clone());
        self.pending += 1;

        tokio::spawn(async move {
            let event = match engine.load(&source, &options, events.clone()).await {
                Ok(handle) => EngineEvent::Loaded { handle },
                Err(error) => EngineEvent::LoadFailed {
                    message: error.user_message(),
                },
            };
            events.emit(event);
        });
    }

    fn spawn_location_index(&mut self, handle: EngineHandle, epoch: u64) {
        let engine = Arc::clone(&self.engine);
        let granularity = self.config.location_granularity;
        let events = EventSink::new(self.state.generation(), self.events_tx.clone());
        self.pending += 1;

        tokio::spawn(async move {
            let event = match engine.generate_location_index(handle, granularity).await {
                Ok(total) => EngineEvent::LocationIndexReady { epoch, total },
                Err(error) => EngineEvent::LocationIndexFailed {
                    epoch,
                    message: error.user_message(),
                },
            };
            events.emit(event);
        });
    }

    async fn teardown(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        if let Some(handle) = session.handle {
            if let Err(error) = self.engine.destroy(handle).await {
                tracing::warn!(handle = %handle, %error, "Failed to destroy engine handle");
            }
        }
        session.source.release();

        tracing::info!(
            session_id = %session.id,
            generation = session.generation,
            open_for_ms = (Utc::now() - session.opened_at).num_milliseconds(),
            "Reader session closed"
        );
    }
}

impl Drop for ReaderController {
    fn drop(&mut self) {
        // Handles cannot be destroyed without a runtime; release what we can
        if let Some(session) = &self.session {
            session.source.release();
            if let Some(handle) = session.handle {
                self.viewport.release(handle);
                tracing::warn!(handle = %handle, "Controller dropped with a live engine handle");
            }
        }
    }
}
