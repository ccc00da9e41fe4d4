//! Page-indexed engine adapter (PDF)
//!
//! The raw PDF engine only knows how to render a given page. The adapter
//! keeps the current page per handle, performs next/prev arithmetic and emits
//! `LocationChanged` once a page has actually rendered.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{EngineError, EngineResult};
use crate::source::{DocumentFormat, SourceRef};

use super::events::EventSink;
use super::traits::{PageRenderer, ReaderEngine};
use super::types::{EngineHandle, Layout, Position, RenderOptions, StyleOptions, Viewport};

struct PagedDocument {
    page_count: u32,
    current_page: Option<u32>,
    style: StyleOptions,
    events: EventSink,
    viewport: Option<Arc<Viewport>>,
}

/// [`ReaderEngine`] over a [`PageRenderer`]
pub struct PagedAdapter<R> {
    renderer: Arc<R>,
    documents: Mutex<HashMap<EngineHandle, PagedDocument>>,
}

impl<R: PageRenderer> PagedAdapter<R> {
    pub fn new(renderer: Arc<R>) -> Self {
        Self {
            renderer,
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// Handles loaded and not yet destroyed
    pub fn live_handles(&self) -> usize {
        self.documents.lock().len()
    }

    fn with_document<T>(
        &self,
        handle: EngineHandle,
        f: impl FnOnce(&mut PagedDocument) -> T,
    ) -> EngineResult<T> {
        let mut documents = self.documents.lock();
        let document = documents
            .get_mut(&handle)
            .ok_or(EngineError::UnknownHandle(handle))?;
        Ok(f(document))
    }

    async fn show_page(&self, handle: EngineHandle, page: u32) -> EngineResult<()> {
        let (target, page_count, style) = self.with_document(handle, |doc| {
            (
                doc.viewport.as_ref().map(|viewport| viewport.id().to_string()),
                doc.page_count,
                doc.style,
            )
        })?;

        let target = target.ok_or_else(|| EngineError::NotReady(format!("{} is not mounted", handle)))?;

        if page == 0 || page > page_count {
            return Err(EngineError::OutOfRange(format!(
                "page {} of {}",
                page, page_count
            )));
        }

        self.renderer.render_page(handle, &target, page, &style).await?;

        // The handle may have been destroyed while rendering
        let events = self.with_document(handle, |doc| {
            doc.current_page = Some(page);
            doc.events.clone()
        })?;
        events.location_changed(page, page_count, None);

        Ok(())
    }

    fn current_page(&self, handle: EngineHandle) -> EngineResult<(u32, u32)> {
        let (current, page_count) =
            self.with_document(handle, |doc| (doc.current_page, doc.page_count))?;
        let current = current
            .ok_or_else(|| EngineError::NotReady(format!("{} has not displayed a page", handle)))?;
        Ok((current, page_count))
    }
}

#[async_trait]
impl<R: PageRenderer + 'static> ReaderEngine for PagedAdapter<R> {
    fn layout(&self) -> Layout {
        Layout::Paged
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Pdf
    }

    async fn load(
        &self,
        source: &SourceRef,
        options: &RenderOptions,
        events: EventSink,
    ) -> EngineResult<EngineHandle> {
        let opened = self.renderer.open(source, options).await?;

        tracing::debug!(
            handle = %opened.handle,
            pages = opened.page_count,
            source = %source.display_name(),
            "PDF opened"
        );

        self.documents.lock().insert(
            opened.handle,
            PagedDocument {
                page_count: opened.page_count,
                current_page: None,
                style: StyleOptions::default(),
                events,
                viewport: None,
            },
        );

        Ok(opened.handle)
    }

    async fn mount_to(&self, handle: EngineHandle, target: &Arc<Viewport>) -> EngineResult<()> {
        let already_mounted = self.with_document(handle, |doc| doc.viewport.is_some())?;
        if already_mounted {
            return Ok(());
        }

        target.claim(handle)?;
        self.with_document(handle, |doc| doc.viewport = Some(Arc::clone(target)))
    }

    async fn generate_location_index(
        &self,
        handle: EngineHandle,
        _granularity: u32,
    ) -> EngineResult<u32> {
        // Page count is known as soon as the document parsed
        self.with_document(handle, |doc| doc.page_count)
    }

    async fn display_at(&self, handle: EngineHandle, position: &Position) -> EngineResult<()> {
        match position {
            Position::Page(page) => self.show_page(handle, *page).await,
            Position::Location(token) => Err(EngineError::OutOfRange(format!(
                "page-indexed document cannot display {}",
                token
            ))),
        }
    }

    async fn next(&self, handle: EngineHandle) -> EngineResult<()> {
        let (current, page_count) = self.current_page(handle)?;
        if current >= page_count {
            tracing::debug!(handle = %handle, page = current, "Already on last page");
            return Ok(());
        }
        self.show_page(handle, current + 1).await
    }

    async fn prev(&self, handle: EngineHandle) -> EngineResult<()> {
        let (current, _) = self.current_page(handle)?;
        if current <= 1 {
            tracing::debug!(handle = %handle, "Already on first page");
            return Ok(());
        }
        self.show_page(handle, current - 1).await
    }

    async fn apply_style(&self, handle: EngineHandle, style: &StyleOptions) -> EngineResult<()> {
        let current = self.with_document(handle, |doc| {
            doc.style = *style;
            doc.current_page
        })?;

        // Re-render at the new zoom/theme; page count never changes
        match current {
            Some(page) => self.show_page(handle, page).await,
            None => Ok(()),
        }
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
        tracing::debug!(handle = %handle, "PDF handle destroyed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::{channel, EngineEvent};
    use crate::engine::sim::SimulatedPdf;
    use crate::source::SourceLocation;

    fn remote_pdf() -> SourceRef {
        let url = "https://example.com/paper.pdf".to_string();
        SourceRef::new(DocumentFormat::Pdf, SourceLocation::Remote { url: url.clone() }, url)
    }

    #[tokio::test]
    async fn test_navigation_reports_rendered_pages() {
        let renderer = Arc::new(SimulatedPdf::new(3));
        let adapter = PagedAdapter::new(Arc::clone(&renderer));
        let viewport = Arc::new(Viewport::new("viewer"));
        let (tx, mut rx) = channel();

        let handle = adapter
            .load(&remote_pdf(), &RenderOptions::default(), EventSink::new(1, tx))
            .await
            .unwrap();
        adapter.mount_to(handle, &viewport).await.unwrap();
        assert_eq!(adapter.generate_location_index(handle, 1024).await.unwrap(), 3);

        adapter.display_at(handle, &Position::Page(1)).await.unwrap();
        adapter.next(handle).await.unwrap();
        adapter.next(handle).await.unwrap();
        // Last page: nothing rendered, nothing reported
        adapter.next(handle).await.unwrap();

        let positions: Vec<u32> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|tagged| match tagged.event {
                EngineEvent::LocationChanged { position, total, .. } => {
                    assert_eq!(total, 3);
                    position
                }
                other => panic!("unexpected event {:?}", other),
            })
            .collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(renderer.renders().len(), 3);
    }

    #[tokio::test]
    async fn test_commands_before_display_are_rejected() {
        let renderer = Arc::new(SimulatedPdf::new(3));
        let adapter = PagedAdapter::new(renderer);
        let (tx, _rx) = channel();

        let handle = adapter
            .load(&remote_pdf(), &RenderOptions::default(), EventSink::new(1, tx))
            .await
            .unwrap();

        assert!(matches!(adapter.next(handle).await, Err(EngineError::NotReady(_))));
        assert!(matches!(
            adapter.display_at(handle, &Position::Page(1)).await,
            Err(EngineError::NotReady(_))
        ));
        assert!(matches!(
            adapter.next(EngineHandle(u64::MAX)).await,
            Err(EngineError::UnknownHandle(_))
        ));
    }

    #[tokio::test]
    async fn test_destroy_releases_viewport() {
        let renderer = Arc::new(SimulatedPdf::new(2));
        let adapter = PagedAdapter::new(Arc::clone(&renderer));
        let viewport = Arc::new(Viewport::new("viewer"));
        let (tx, _rx) = channel();

        let first = adapter
            .load(&remote_pdf(), &RenderOptions::default(), EventSink::new(1, tx.clone()))
            .await
            .unwrap();
        adapter.mount_to(first, &viewport).await.unwrap();

        let second = adapter
            .load(&remote_pdf(), &RenderOptions::default(), EventSink::new(2, tx))
            .await
            .unwrap();
        assert!(matches!(
            adapter.mount_to(second, &viewport).await,
            Err(EngineError::ViewportBusy { .. })
        ));

        adapter.destroy(first).await.unwrap();
        assert_eq!(renderer.closed(), vec![first]);
        adapter.mount_to(second, &viewport).await.unwrap();
        assert_eq!(viewport.occupant(), Some(second));
        assert_eq!(adapter.live_handles(), 1);
    }
}
