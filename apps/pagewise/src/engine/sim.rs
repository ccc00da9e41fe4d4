//! In-memory engines
//!
//! Deterministic stand-ins for the browser rendering engines, for headless
//! hosts and the test suite. Both can fail loads on demand, hold loads until
//! released (to exercise superseded sessions) and record what they rendered
//! and released.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{EngineError, EngineResult};
use crate::location::LocationToken;
use crate::source::{SourceLocation, SourceRef};

use super::traits::{OpenedDocument, PageRenderer, ReflowEvent, ReflowListener, ReflowRenderer};
use super::types::{EngineHandle, RenderOptions, StyleOptions, Theme};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

fn allocate_handle() -> EngineHandle {
    EngineHandle(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
}

/// Load gating and failure injection shared by both simulators
struct LoadControls {
    gate: watch::Sender<bool>,
    failure: Mutex<Option<String>>,
}

impl LoadControls {
    fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            gate,
            failure: Mutex::new(None),
        }
    }

    async fn admit(&self, source: &SourceRef) -> EngineResult<()> {
        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| EngineError::Load("load gate closed".to_string()))?;

        if let Some(message) = self.failure.lock().clone() {
            return Err(EngineError::Load(message));
        }

        if let SourceLocation::Blob(object_url) = source.location() {
            if object_url.bytes().is_none() {
                return Err(EngineError::Load(format!(
                    "{} was revoked",
                    object_url.href()
                )));
            }
        }

        Ok(())
    }
}

/// Simulated PDF engine with a fixed page count
pub struct SimulatedPdf {
    page_count: u32,
    controls: LoadControls,
    open: Mutex<HashSet<EngineHandle>>,
    renders: Mutex<Vec<(EngineHandle, u32)>>,
    closed: Mutex<Vec<EngineHandle>>,
}

impl SimulatedPdf {
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            controls: LoadControls::new(),
            open: Mutex::new(HashSet::new()),
            renders: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
        }
    }

    /// Make every following load fail with `message`, or succeed again
    pub fn set_load_failure(&self, message: Option<&str>) {
        *self.controls.failure.lock() = message.map(str::to_string);
    }

    /// Park loads until [`release_loads`](Self::release_loads)
    pub fn hold_loads(&self) {
        self.controls.gate.send_replace(false);
    }

    pub fn release_loads(&self) {
        self.controls.gate.send_replace(true);
    }

    /// Every `(handle, page)` rendered so far
    pub fn renders(&self) -> Vec<(EngineHandle, u32)> {
        self.renders.lock().clone()
    }

    pub fn closed(&self) -> Vec<EngineHandle> {
        self.closed.lock().clone()
    }

    pub fn open_handles(&self) -> usize {
        self.open.lock().len()
    }
}

#[async_trait]
impl PageRenderer for SimulatedPdf {
    async fn open(&self, source: &SourceRef, _options: &RenderOptions) -> EngineResult<OpenedDocument> {
        self.controls.admit(source).await?;

        let handle = allocate_handle();
        self.open.lock().insert(handle);

        Ok(OpenedDocument {
            handle,
            page_count: self.page_count,
        })
    }

    async fn render_page(
        &self,
        handle: EngineHandle,
        _target: &str,
        page: u32,
        _style: &StyleOptions,
    ) -> EngineResult<()> {
        if !self.open.lock().contains(&handle) {
            return Err(EngineError::UnknownHandle(handle));
        }
        if page == 0 || page > self.page_count {
            return Err(EngineError::Render(format!("no page {}", page)));
        }

        self.renders.lock().push((handle, page));
        Ok(())
    }

    async fn close(&self, handle: EngineHandle) -> EngineResult<()> {
        if !self.open.lock().remove(&handle) {
            return Err(EngineError::UnknownHandle(handle));
        }
        self.closed.lock().push(handle);
        Ok(())
    }
}

struct SimulatedBook {
    font_scale_percent: u16,
    theme: Theme,
    granularity: u32,
    current: usize,
    listener: Option<ReflowListener>,
}

/// Simulated EPUB engine
///
/// The book is `chapters` spine items of `chapter_chars` characters. One page
/// holds `granularity * 100 / font_scale_percent` characters, so larger fonts
/// produce more locations.
pub struct SimulatedEpub {
    chapters: u32,
    chapter_chars: u32,
    controls: LoadControls,
    layout_failure: Mutex<Option<String>>,
    books: Mutex<HashMap<EngineHandle, SimulatedBook>>,
    layout_passes: AtomicU64,
    closed: Mutex<Vec<EngineHandle>>,
}

impl SimulatedEpub {
    pub fn new(chapters: u32, chapter_chars: u32) -> Self {
        Self {
            chapters: chapters.max(1),
            chapter_chars,
            controls: LoadControls::new(),
            layout_failure: Mutex::new(None),
            books: Mutex::new(HashMap::new()),
            layout_passes: AtomicU64::new(0),
            closed: Mutex::new(Vec::new()),
        }
    }

    pub fn set_load_failure(&self, message: Option<&str>) {
        *self.controls.failure.lock() = message.map(str::to_string);
    }

    /// Make following layout passes fail with `message`, or succeed again
    pub fn set_layout_failure(&self, message: Option<&str>) {
        *self.layout_failure.lock() = message.map(str::to_string);
    }

    pub fn hold_loads(&self) {
        self.controls.gate.send_replace(false);
    }

    pub fn release_loads(&self) {
        self.controls.gate.send_replace(true);
    }

    /// Number of completed location passes
    pub fn layout_passes(&self) -> u64 {
        self.layout_passes.load(Ordering::Relaxed)
    }

    pub fn closed(&self) -> Vec<EngineHandle> {
        self.closed.lock().clone()
    }

    pub fn open_handles(&self) -> usize {
        self.books.lock().len()
    }

    /// Style currently applied to `handle`
    pub fn style_of(&self, handle: EngineHandle) -> Option<(u16, Theme)> {
        self.books
            .lock()
            .get(&handle)
            .map(|book| (book.font_scale_percent, book.theme))
    }

    /// Simulate a rendering failure after the book opened
    pub fn fail_rendition(&self, handle: EngineHandle, detail: &str) {
        let listener = self
            .books
            .lock()
            .get(&handle)
            .and_then(|book| book.listener.clone());
        if let Some(listener) = listener {
            listener(ReflowEvent::Failed {
                detail: detail.to_string(),
            });
        }
    }

    /// Page starts for the given style, in reading order
    pub fn pages_for(&self, font_scale_percent: u16, granularity: u32) -> Vec<LocationToken> {
        let per_page = (u64::from(granularity) * 100 / u64::from(font_scale_percent.max(1))).max(1);
        let per_page = u32::try_from(per_page).unwrap_or(u32::MAX);

        let mut pages = Vec::new();
        for chapter in 0..self.chapters {
            let mut offset = 0;
            loop {
                pages.push(LocationToken::in_spine(chapter, &[4, 2, 1], Some(offset)));
                offset = offset.saturating_add(per_page);
                if offset >= self.chapter_chars {
                    break;
                }
            }
        }
        pages
    }

    /// Move the book to `target` page and notify outside the lock
    fn relocate(
        &self,
        handle: EngineHandle,
        target: impl FnOnce(&[LocationToken], usize) -> Option<usize>,
    ) -> EngineResult<()> {
        let (listener, start) = {
            let mut books = self.books.lock();
            let book = books
                .get_mut(&handle)
                .ok_or(EngineError::UnknownHandle(handle))?;
            let pages = self.pages_for(book.font_scale_percent, book.granularity);

            match target(&pages, book.current) {
                Some(index) if index < pages.len() => {
                    book.current = index;
                    (book.listener.clone(), pages[index].clone())
                }
                // Boundary: the engine stays put and reports nothing
                _ => return Ok(()),
            }
        };

        if let Some(listener) = listener {
            listener(ReflowEvent::Relocated { start });
        }
        Ok(())
    }
}

fn page_containing(pages: &[LocationToken], token: &LocationToken) -> usize {
    pages.partition_point(|page| page <= token).saturating_sub(1)
}

#[async_trait]
impl ReflowRenderer for SimulatedEpub {
    async fn open(&self, source: &SourceRef, _options: &RenderOptions) -> EngineResult<EngineHandle> {
        self.controls.admit(source).await?;

        let handle = allocate_handle();
        self.books.lock().insert(
            handle,
            SimulatedBook {
                font_scale_percent: 100,
                theme: Theme::Light,
                granularity: crate::config::DEFAULT_LOCATION_GRANULARITY,
                current: 0,
                listener: None,
            },
        );
        Ok(handle)
    }

    fn on(&self, handle: EngineHandle, listener: ReflowListener) -> EngineResult<()> {
        let mut books = self.books.lock();
        let book = books
            .get_mut(&handle)
            .ok_or(EngineError::UnknownHandle(handle))?;
        book.listener = Some(listener);
        Ok(())
    }

    async fn render_to(&self, handle: EngineHandle, _target: &str) -> EngineResult<()> {
        if self.books.lock().contains_key(&handle) {
            Ok(())
        } else {
            Err(EngineError::UnknownHandle(handle))
        }
    }

    async fn generate_locations(
        &self,
        handle: EngineHandle,
        granularity: u32,
    ) -> EngineResult<Vec<LocationToken>> {
        // Yield like a long layout pass would
        tokio::task::yield_now().await;

        if let Some(message) = self.layout_failure.lock().clone() {
            return Err(EngineError::Layout(message));
        }

        let font_scale_percent = {
            let mut books = self.books.lock();
            let book = books
                .get_mut(&handle)
                .ok_or(EngineError::UnknownHandle(handle))?;
            let current = self
                .pages_for(book.font_scale_percent, book.granularity)
                .get(book.current)
                .cloned();
            book.granularity = granularity.max(1);
            if let Some(current) = current {
                let pages = self.pages_for(book.font_scale_percent, book.granularity);
                book.current = page_containing(&pages, &current);
            }
            book.font_scale_percent
        };

        self.layout_passes.fetch_add(1, Ordering::Relaxed);
        Ok(self.pages_for(font_scale_percent, granularity.max(1)))
    }

    async fn display(&self, handle: EngineHandle, target: Option<&LocationToken>) -> EngineResult<()> {
        self.relocate(handle, |pages, _| {
            Some(target.map(|token| page_containing(pages, token)).unwrap_or(0))
        })
    }

    async fn next(&self, handle: EngineHandle) -> EngineResult<()> {
        self.relocate(handle, |_, current| current.checked_add(1))
    }

    async fn prev(&self, handle: EngineHandle) -> EngineResult<()> {
        self.relocate(handle, |_, current| current.checked_sub(1))
    }

    async fn set_style(
        &self,
        handle: EngineHandle,
        font_scale_percent: u16,
        theme: Theme,
    ) -> EngineResult<()> {
        {
            let mut books = self.books.lock();
            let book = books
                .get_mut(&handle)
                .ok_or(EngineError::UnknownHandle(handle))?;

            let previous = self
                .pages_for(book.font_scale_percent, book.granularity)
                .get(book.current)
                .cloned();

            book.font_scale_percent = font_scale_percent;
            book.theme = theme;

            if let Some(previous) = previous {
                let pages = self.pages_for(font_scale_percent, book.granularity);
                book.current = page_containing(&pages, &previous);
            }
        }

        // Reflow re-reports the visible start
        self.relocate(handle, |_, current| Some(current))
    }

    async fn close(&self, handle: EngineHandle) -> EngineResult<()> {
        if self.books.lock().remove(&handle).is_none() {
            return Err(EngineError::UnknownHandle(handle));
        }
        self.closed.lock().push(handle);
        Ok(())
    }
}
