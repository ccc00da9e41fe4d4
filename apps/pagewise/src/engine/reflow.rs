//! Reflowable engine adapter (EPUB)
//!
//! The raw layout engine reports where the visible range starts as a
//! location token. The adapter owns the generated [`LocationIndex`] per handle
//! and translates every relocation into a 1-based position. Until an index
//! exists (or after a style change invalidated it) relocations are recorded
//! but not reported, so no stale totals leak out.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{EngineError, EngineResult};
use crate::location::{LocationIndex, LocationToken};
use crate::source::{DocumentFormat, SourceRef};

use super::events::EventSink;
use super::traits::{ReaderEngine, ReflowEvent, ReflowListener, ReflowRenderer};
use super::types::{EngineHandle, Layout, Position, RenderOptions, StyleOptions, Viewport};

struct ReflowDocument {
    events: EventSink,
    viewport: Option<Arc<Viewport>>,
    index: Option<LocationIndex>,
    current: Option<LocationToken>,
    /// Bumped by every style change; a table is only valid for one revision
    layout_revision: u64,
}

type DocumentTable = Arc<Mutex<HashMap<EngineHandle, ReflowDocument>>>;

/// [`ReaderEngine`] over a [`ReflowRenderer`]
pub struct ReflowAdapter<R> {
    renderer: Arc<R>,
    documents: DocumentTable,
}

impl<R: ReflowRenderer> ReflowAdapter<R> {
    pub fn new(renderer: Arc<R>) -> Self {
        Self {
            renderer,
            documents: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Handles loaded and not yet destroyed
    pub fn live_handles(&self) -> usize {
        self.documents.lock().len()
    }

    fn with_document<T>(
        &self,
        handle: EngineHandle,
        f: impl FnOnce(&mut ReflowDocument) -> T,
    ) -> EngineResult<T> {
        let mut documents = self.documents.lock();
        let document = documents
            .get_mut(&handle)
            .ok_or(EngineError::UnknownHandle(handle))?;
        Ok(f(document))
    }

    fn ensure_mounted(&self, handle: EngineHandle) -> EngineResult<()> {
        if self.with_document(handle, |doc| doc.viewport.is_some())? {
            Ok(())
        } else {
            Err(EngineError::NotReady(format!("{} is not mounted", handle)))
        }
    }

    fn listener(documents: DocumentTable, handle: EngineHandle) -> ReflowListener {
        Arc::new(move |event: ReflowEvent| {
            let mut documents = documents.lock();
            let Some(document) = documents.get_mut(&handle) else {
                tracing::trace!(handle = %handle, "Event for destroyed handle");
                return;
            };

            match event {
                ReflowEvent::Relocated { start } => {
                    document.current = Some(start.clone());
                    match &document.index {
                        Some(index) => {
                            if let Some(position) = index.locate(&start) {
                                document
                                    .events
                                    .location_changed(position, index.total(), Some(start));
                            }
                        }
                        None => {
                            tracing::trace!(
                                handle = %handle,
                                location = %start,
                                "Relocated before location index"
                            );
                        }
                    }
                }
                ReflowEvent::Failed { detail } => {
                    document.events.error(detail);
                }
            }
        })
    }
}

#[async_trait]
impl<R: ReflowRenderer + 'static> ReaderEngine for ReflowAdapter<R> {
    fn layout(&self) -> Layout {
        Layout::Reflowable
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Epub
    }

    async fn load(
        &self,
        source: &SourceRef,
        options: &RenderOptions,
        events: EventSink,
    ) -> EngineResult<EngineHandle> {
        let handle = self.renderer.open(source, options).await?;

        self.documents.lock().insert(
            handle,
            ReflowDocument {
                events,
                viewport: None,
                index: None,
                current: None,
                layout_revision: 0,
            },
        );

        if let Err(error) = self
            .renderer
            .on(handle, Self::listener(Arc::clone(&self.documents), handle))
        {
            self.documents.lock().remove(&handle);
            self.renderer.close(handle).await.ok();
            return Err(error);
        }

        tracing::debug!(handle = %handle, source = %source.display_name(), "EPUB opened");
        Ok(handle)
    }

    async fn mount_to(&self, handle: EngineHandle, target: &Arc<Viewport>) -> EngineResult<()> {
        if self.with_document(handle, |doc| doc.viewport.is_some())? {
            return Ok(());
        }

        target.claim(handle)?;
        if let Err(error) = self.renderer.render_to(handle, target.id()).await {
            target.release(handle);
            return Err(error);
        }

        self.with_document(handle, |doc| doc.viewport = Some(Arc::clone(target)))
    }

    async fn generate_location_index(
        &self,
        handle: EngineHandle,
        granularity: u32,
    ) -> EngineResult<u32> {
        let revision = self.with_document(handle, |doc| doc.layout_revision)?;

        let tokens = self.renderer.generate_locations(handle, granularity).await?;
        let index = LocationIndex::new(tokens);
        let total = index.total();

        let installed = self.with_document(handle, |doc| {
            if doc.layout_revision != revision {
                return false;
            }
            doc.index = Some(index);
            true
        })?;

        if !installed {
            tracing::debug!(handle = %handle, revision, "Discarding superseded location table");
            return Err(EngineError::NotReady(format!(
                "{} was restyled during the layout pass",
                handle
            )));
        }

        tracing::debug!(handle = %handle, total, granularity, "Location index generated");
        Ok(total)
    }

    async fn display_at(&self, handle: EngineHandle, position: &Position) -> EngineResult<()> {
        self.ensure_mounted(handle)?;

        let target = match position {
            Position::Location(token) => Some(token.clone()),
            Position::Page(page) => {
                let token = self.with_document(handle, |doc| {
                    doc.index.as_ref().map(|index| index.token_at(*page).cloned())
                })?;
                match token {
                    Some(Some(token)) => Some(token),
                    Some(None) => {
                        return Err(EngineError::OutOfRange(format!("location {}", page)));
                    }
                    // Without an index only the start of the book is addressable
                    None if *page == 1 => None,
                    None => {
                        return Err(EngineError::NotReady(format!(
                            "{} has no location index",
                            handle
                        )));
                    }
                }
            }
        };

        self.renderer.display(handle, target.as_ref()).await
    }

    async fn next(&self, handle: EngineHandle) -> EngineResult<()> {
        self.ensure_mounted(handle)?;
        self.renderer.next(handle).await
    }

    async fn prev(&self, handle: EngineHandle) -> EngineResult<()> {
        self.ensure_mounted(handle)?;
        self.renderer.prev(handle).await
    }

    async fn apply_style(&self, handle: EngineHandle, style: &StyleOptions) -> EngineResult<()> {
        // Any reflow invalidates the generated table and passes still running
        self.with_document(handle, |doc| {
            doc.index = None;
            doc.layout_revision += 1;
        })?;
        self.renderer
            .set_style(handle, style.font_scale_percent, style.theme)
            .await
    }

    async fn destroy(&self, handle: EngineHandle) -> EngineResult<()> {
        let document = self
            .documents
            .lock()
            .remove(&handle)
            .ok_or(EngineError::UnknownHandle(handle))?;

        if let Some(viewport) = document.viewport {
            viewport.release(handle);
        }

        self.renderer.close(handle).await?;
        tracing::debug!(handle = %handle, "EPUB handle destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::{channel, EngineEvent, TaggedEvent};
    use crate::engine::sim::SimulatedEpub;
    use crate::engine::types::Theme;
    use crate::source::SourceLocation;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::watch;

    /// Lays out under the style current when a pass starts and can park the
    /// finished pass before reporting it
    struct HeldLayout {
        inner: SimulatedEpub,
        hold_next: Mutex<bool>,
        parked: watch::Sender<bool>,
        release: watch::Sender<bool>,
    }

    impl HeldLayout {
        fn new(inner: SimulatedEpub) -> Self {
            Self {
                inner,
                hold_next: Mutex::new(false),
                parked: watch::channel(false).0,
                release: watch::channel(false).0,
            }
        }
    }

    #[async_trait]
    impl ReflowRenderer for HeldLayout {
        async fn open(&self, source: &SourceRef, options: &RenderOptions) -> EngineResult<EngineHandle> {
            self.inner.open(source, options).await
        }

        fn on(&self, handle: EngineHandle, listener: ReflowListener) -> EngineResult<()> {
            self.inner.on(handle, listener)
        }

        async fn render_to(&self, handle: EngineHandle, target: &str) -> EngineResult<()> {
            self.inner.render_to(handle, target).await
        }

        async fn generate_locations(
            &self,
            handle: EngineHandle,
            granularity: u32,
        ) -> EngineResult<Vec<LocationToken>> {
            let tokens = self.inner.generate_locations(handle, granularity).await?;

            let hold = std::mem::take(&mut *self.hold_next.lock());
            if hold {
                self.parked.send_replace(true);
                let mut release = self.release.subscribe();
                release
                    .wait_for(|open| *open)
                    .await
                    .map_err(|_| EngineError::Layout("release dropped".to_string()))?;
            }
            Ok(tokens)
        }

        async fn display(&self, handle: EngineHandle, target: Option<&LocationToken>) -> EngineResult<()> {
            self.inner.display(handle, target).await
        }

        async fn next(&self, handle: EngineHandle) -> EngineResult<()> {
            self.inner.next(handle).await
        }

        async fn prev(&self, handle: EngineHandle) -> EngineResult<()> {
            self.inner.prev(handle).await
        }

        async fn set_style(
            &self,
            handle: EngineHandle,
            font_scale_percent: u16,
            theme: Theme,
        ) -> EngineResult<()> {
            self.inner.set_style(handle, font_scale_percent, theme).await
        }

        async fn close(&self, handle: EngineHandle) -> EngineResult<()> {
            self.inner.close(handle).await
        }
    }

    fn remote_epub() -> SourceRef {
        let url = "https://example.com/moby-dick.epub".to_string();
        SourceRef::new(DocumentFormat::Epub, SourceLocation::Remote { url: url.clone() }, url)
    }

    fn drain(rx: &mut UnboundedReceiver<TaggedEvent>) -> Vec<EngineEvent> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .map(|tagged| tagged.event)
            .collect()
    }

    async fn opened(
        renderer: &Arc<SimulatedEpub>,
    ) -> (ReflowAdapter<SimulatedEpub>, EngineHandle, UnboundedReceiver<TaggedEvent>) {
        let adapter = ReflowAdapter::new(Arc::clone(renderer));
        let viewport = Arc::new(Viewport::new("viewer"));
        let (tx, rx) = channel();

        let handle = adapter
            .load(&remote_epub(), &RenderOptions::default(), EventSink::new(1, tx))
            .await
            .unwrap();
        adapter.mount_to(handle, &viewport).await.unwrap();
        (adapter, handle, rx)
    }

    #[tokio::test]
    async fn test_relocations_map_to_positions() {
        let renderer = Arc::new(SimulatedEpub::new(2, 4096));
        let (adapter, handle, mut rx) = opened(&renderer).await;

        let total = adapter.generate_location_index(handle, 1024).await.unwrap();
        assert_eq!(total, 8);

        adapter.display_at(handle, &Position::Page(5)).await.unwrap();
        adapter.next(handle).await.unwrap();
        adapter.prev(handle).await.unwrap();

        let events = drain(&mut rx);
        let positions: Vec<u32> = events
            .iter()
            .map(|event| match event {
                EngineEvent::LocationChanged { position, total, location } => {
                    assert_eq!(*total, 8);
                    assert!(location.is_some());
                    *position
                }
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(positions, vec![5, 6, 5]);
    }

    #[tokio::test]
    async fn test_relocation_before_index_is_not_reported() {
        let renderer = Arc::new(SimulatedEpub::new(1, 4096));
        let (adapter, handle, mut rx) = opened(&renderer).await;

        adapter.display_at(handle, &Position::Page(1)).await.unwrap();
        assert!(drain(&mut rx).is_empty());

        assert!(matches!(
            adapter.display_at(handle, &Position::Page(3)).await,
            Err(EngineError::NotReady(_))
        ));
    }

    #[tokio::test]
    async fn test_style_change_invalidates_index() {
        let renderer = Arc::new(SimulatedEpub::new(1, 4096));
        let (adapter, handle, mut rx) = opened(&renderer).await;

        adapter.generate_location_index(handle, 1024).await.unwrap();
        adapter.display_at(handle, &Position::Page(2)).await.unwrap();
        drain(&mut rx);

        let style = StyleOptions {
            font_scale_percent: 200,
            theme: Theme::Dark,
            ..StyleOptions::default()
        };
        adapter.apply_style(handle, &style).await.unwrap();
        assert!(drain(&mut rx).is_empty());
        assert_eq!(renderer.style_of(handle), Some((200, Theme::Dark)));

        assert_eq!(adapter.generate_location_index(handle, 1024).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_rendition_failure_is_reported() {
        let renderer = Arc::new(SimulatedEpub::new(1, 4096));
        let (adapter, handle, mut rx) = opened(&renderer).await;

        renderer.fail_rendition(handle, "section 3 is malformed");
        assert_eq!(
            drain(&mut rx),
            vec![EngineEvent::Error {
                detail: "section 3 is malformed".to_string()
            }]
        );

        adapter.destroy(handle).await.unwrap();
        renderer.fail_rendition(handle, "late");
        assert!(drain(&mut rx).is_empty());
        assert_eq!(renderer.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_superseded_layout_pass_is_not_installed() {
        let renderer = Arc::new(HeldLayout::new(SimulatedEpub::new(4, 4096)));
        let adapter = Arc::new(ReflowAdapter::new(Arc::clone(&renderer)));
        let viewport = Arc::new(Viewport::new("viewer"));
        let (tx, mut rx) = channel();

        let handle = adapter
            .load(&remote_epub(), &RenderOptions::default(), EventSink::new(1, tx))
            .await
            .unwrap();
        adapter.mount_to(handle, &viewport).await.unwrap();

        let font = |percent| StyleOptions {
            font_scale_percent: percent,
            ..StyleOptions::default()
        };

        // First pass lays out at 150% and is parked before reporting
        adapter.apply_style(handle, &font(150)).await.unwrap();
        *renderer.hold_next.lock() = true;
        let mut parked = renderer.parked.subscribe();
        let first = tokio::spawn({
            let adapter = Arc::clone(&adapter);
            async move { adapter.generate_location_index(handle, 1024).await }
        });
        parked.wait_for(|held| *held).await.unwrap();

        // Second pass at 200% finishes first
        adapter.apply_style(handle, &font(200)).await.unwrap();
        assert_eq!(adapter.generate_location_index(handle, 1024).await.unwrap(), 32);

        renderer.release.send_replace(true);
        assert!(matches!(first.await.unwrap(), Err(EngineError::NotReady(_))));

        drain(&mut rx);
        adapter.display_at(handle, &Position::Page(1)).await.unwrap();
        adapter.next(handle).await.unwrap();

        let reported: Vec<(u32, u32)> = drain(&mut rx)
            .into_iter()
            .map(|event| match event {
                EngineEvent::LocationChanged { position, total, .. } => (position, total),
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(reported, vec![(1, 32), (2, 32)]);
    }
}
