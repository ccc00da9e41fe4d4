//! Navigation state machine
//!
//! ```text
//! Empty ──► Loading ──► Ready
//!              ▲  │       │
//!              │  ▼       │ re-layout / new source
//!              Error ◄────┘
//! ```
//!
//! The machine never talks to an engine. It validates and clamps intents,
//! answers with the target the controller should issue, and commits
//! positions only when the engine confirms them.

use serde::{Deserialize, Serialize};

use crate::config::ScaleConfig;
use crate::engine::{Layout, StyleOptions, Theme};
use crate::location::LocationToken;

use super::view::{ReaderSnapshot, Scale};

/// Message used when a layout pass finds nothing to display
pub const EMPTY_DOCUMENT_MESSAGE: &str = "document has no readable positions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReaderStatus {
    #[default]
    Empty,
    Loading,
    Ready,
    Error,
}

/// Why an intent did not reach the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoopReason {
    /// No document is ready
    NotReady,
    /// Already on the first or last position, or at a scale bound
    AtBoundary,
    /// Already showing the requested position
    Unchanged,
    /// Zoom on reflowable content or font scale on fixed pages
    UnsupportedLayout,
    /// The engine refused the command; logged only
    EngineRejected,
}

/// Observable reader state for one controller
#[derive(Debug, Clone)]
pub struct NavigationState {
    layout: Layout,
    limits: ScaleConfig,
    status: ReaderStatus,
    generation: u64,
    layout_epoch: u64,
    current_position: u32,
    total_positions: u32,
    current_location: Option<LocationToken>,
    error_message: Option<String>,
    zoom: f32,
    font_scale_percent: u16,
    theme: Theme,
}

impl NavigationState {
    pub fn new(layout: Layout, limits: ScaleConfig, theme: Theme) -> Self {
        Self {
            layout,
            zoom: limits.initial_zoom,
            font_scale_percent: limits.initial_font_percent,
            limits,
            status: ReaderStatus::Empty,
            generation: 0,
            layout_epoch: 0,
            current_position: 1,
            total_positions: 0,
            current_location: None,
            error_message: None,
            theme,
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn status(&self) -> ReaderStatus {
        self.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn layout_epoch(&self) -> u64 {
        self.layout_epoch
    }

    pub fn current_position(&self) -> u32 {
        self.current_position
    }

    pub fn total_positions(&self) -> u32 {
        self.total_positions
    }

    pub fn current_location(&self) -> Option<&LocationToken> {
        self.current_location.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn font_scale_percent(&self) -> u16 {
        self.font_scale_percent
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    /// Whether an event tagged with `generation` belongs to the live load
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    /// Style to push to the engine
    pub fn style(&self) -> StyleOptions {
        StyleOptions {
            zoom: self.zoom,
            font_scale_percent: self.font_scale_percent,
            theme: self.theme,
        }
    }

    /// A new source was accepted: forget the old document and start loading.
    ///
    /// Returns the generation every event of this load must carry.
    pub fn begin_session(&mut self) -> u64 {
        self.generation += 1;
        self.current_position = 1;
        self.total_positions = 0;
        self.current_location = None;
        self.on_load_start();
        self.generation
    }

    pub fn on_load_start(&mut self) {
        self.status = ReaderStatus::Loading;
        self.error_message = None;
    }

    pub fn on_load_success(&mut self, total: u32) {
        if total == 0 {
            self.on_load_error(EMPTY_DOCUMENT_MESSAGE);
            return;
        }

        self.status = ReaderStatus::Ready;
        self.error_message = None;
        self.total_positions = total;
        self.current_position = self.current_position.clamp(1, total);
    }

    /// Position and total keep their last valid values
    pub fn on_load_error(&mut self, message: impl Into<String>) {
        self.status = ReaderStatus::Error;
        self.error_message = Some(message.into());
    }

    /// Start a layout pass; results from earlier passes become stale
    pub fn begin_layout(&mut self) -> u64 {
        self.layout_epoch += 1;
        self.layout_epoch
    }

    /// Invalidate the location table after a reflowing style change
    pub fn begin_relayout(&mut self) -> u64 {
        self.on_load_start();
        self.begin_layout()
    }

    /// Apply a finished layout pass; `false` when `epoch` was superseded
    pub fn on_layout_complete(&mut self, epoch: u64, total: u32) -> bool {
        if epoch != self.layout_epoch {
            return false;
        }
        self.on_load_success(total);
        true
    }

    /// Apply a failed layout pass; `false` when `epoch` was superseded
    pub fn on_layout_failed(&mut self, epoch: u64, message: impl Into<String>) -> bool {
        if epoch != self.layout_epoch {
            return false;
        }
        self.on_load_error(message);
        true
    }

    /// Commit an engine-confirmed position; ignored unless `Ready`
    pub fn on_location_changed(
        &mut self,
        position: u32,
        total: u32,
        location: Option<LocationToken>,
    ) -> bool {
        if self.status != ReaderStatus::Ready {
            return false;
        }

        if total > 0 {
            self.total_positions = total;
        }
        self.current_position = position.clamp(1, self.total_positions);
        if location.is_some() {
            self.current_location = location;
        }
        true
    }

    /// Target of a next-page command, if one should be issued
    pub fn request_next(&self) -> Result<u32, NoopReason> {
        self.ensure_ready()?;
        if self.current_position >= self.total_positions {
            return Err(NoopReason::AtBoundary);
        }
        Ok(self.current_position + 1)
    }

    /// Target of a previous-page command, if one should be issued
    pub fn request_prev(&self) -> Result<u32, NoopReason> {
        self.ensure_ready()?;
        if self.current_position <= 1 {
            return Err(NoopReason::AtBoundary);
        }
        Ok(self.current_position - 1)
    }

    /// Clamped target of a jump
    pub fn request_go_to(&self, position: u32) -> Result<u32, NoopReason> {
        self.ensure_ready()?;
        let target = position.clamp(1, self.total_positions);
        if target == self.current_position {
            return Err(NoopReason::Unchanged);
        }
        Ok(target)
    }

    /// Step the zoom factor within bounds, rounded to hundredths
    pub fn set_zoom(&mut self, delta: f32) -> Result<f32, NoopReason> {
        if self.layout != Layout::Paged {
            return Err(NoopReason::UnsupportedLayout);
        }

        let zoom = ((self.zoom + delta) * 100.0).round() / 100.0;
        let zoom = zoom.clamp(self.limits.min_zoom, self.limits.max_zoom);
        if (zoom - self.zoom).abs() < f32::EPSILON {
            return Err(NoopReason::AtBoundary);
        }

        self.zoom = zoom;
        Ok(zoom)
    }

    /// Step the font scale within bounds
    pub fn set_font_scale(&mut self, delta: i32) -> Result<u16, NoopReason> {
        if self.layout != Layout::Reflowable {
            return Err(NoopReason::UnsupportedLayout);
        }

        let min = i32::from(self.limits.min_font_percent);
        let max = i32::from(self.limits.max_font_percent);
        let percent = i32::from(self.font_scale_percent)
            .saturating_add(delta)
            .clamp(min, max);
        let percent = u16::try_from(percent).unwrap_or(self.limits.max_font_percent);

        if percent == self.font_scale_percent {
            return Err(NoopReason::AtBoundary);
        }

        self.font_scale_percent = percent;
        Ok(percent)
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.theme
    }

    /// Back to `Empty`; style survives. Pending events become stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.status = ReaderStatus::Empty;
        self.current_position = 1;
        self.total_positions = 0;
        self.current_location = None;
        self.error_message = None;
    }

    pub fn snapshot(&self) -> ReaderSnapshot {
        ReaderSnapshot {
            status: self.status,
            current_position: self.current_position,
            total_positions: self.total_positions,
            current_location: self.current_location.as_ref().map(ToString::to_string),
            error_message: self.error_message.clone(),
            scale: match self.layout {
                Layout::Paged => Scale::Zoom { factor: self.zoom },
                Layout::Reflowable => Scale::FontScale {
                    percent: self.font_scale_percent,
                },
            },
            theme: self.theme,
        }
    }

    fn ensure_ready(&self) -> Result<(), NoopReason> {
        if self.status == ReaderStatus::Ready {
            Ok(())
        } else {
            Err(NoopReason::NotReady)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paged() -> NavigationState {
        NavigationState::new(Layout::Paged, ScaleConfig::default(), Theme::Light)
    }

    fn reflowable() -> NavigationState {
        NavigationState::new(Layout::Reflowable, ScaleConfig::default(), Theme::Light)
    }

    fn ready(mut state: NavigationState, total: u32) -> NavigationState {
        state.begin_session();
        state.on_load_success(total);
        state
    }

    #[test]
    fn test_initial_state() {
        let state = paged();
        assert_eq!(state.status(), ReaderStatus::Empty);
        assert_eq!(state.current_position(), 1);
        assert_eq!(state.total_positions(), 0);
        assert!(state.error_message().is_none());
        assert_eq!(state.request_next(), Err(NoopReason::NotReady));
    }

    #[test]
    fn test_error_clears_on_retry() {
        let mut state = paged();
        state.begin_session();
        state.on_load_error("network timeout");
        assert_eq!(state.status(), ReaderStatus::Error);
        assert_eq!(state.error_message(), Some("network timeout"));

        state.on_load_start();
        assert!(state.error_message().is_none());
        state.on_load_success(12);
        assert_eq!(state.status(), ReaderStatus::Ready);
        assert_eq!(state.total_positions(), 12);
        assert!(state.error_message().is_none());
    }

    #[test]
    fn test_error_keeps_last_valid_values() {
        let mut state = ready(paged(), 10);
        state.on_location_changed(4, 10, None);
        state.on_load_error("renderer crashed");

        assert_eq!(state.current_position(), 4);
        assert_eq!(state.total_positions(), 10);
        assert_eq!(state.request_next(), Err(NoopReason::NotReady));
        assert_eq!(state.error_message(), Some("renderer crashed"));
    }

    #[test]
    fn test_navigation_stays_in_range() {
        let mut state = ready(paged(), 3);

        assert_eq!(state.request_prev(), Err(NoopReason::AtBoundary));

        for _ in 0..10 {
            if let Ok(target) = state.request_next() {
                state.on_location_changed(target, 3, None);
            }
            assert!((1..=3).contains(&state.current_position()));
        }
        assert_eq!(state.current_position(), 3);
        assert_eq!(state.request_next(), Err(NoopReason::AtBoundary));

        for _ in 0..10 {
            if let Ok(target) = state.request_prev() {
                state.on_location_changed(target, 3, None);
            }
            assert!((1..=3).contains(&state.current_position()));
        }
        assert_eq!(state.current_position(), 1);
    }

    #[test]
    fn test_request_does_not_commit() {
        let state = ready(paged(), 5);
        assert_eq!(state.request_next(), Ok(2));
        assert_eq!(state.current_position(), 1);
    }

    #[test]
    fn test_go_to_clamps() {
        let mut state = ready(paged(), 5);
        assert_eq!(state.request_go_to(40), Ok(5));
        assert_eq!(state.request_go_to(0), Err(NoopReason::Unchanged));

        state.on_location_changed(5, 5, None);
        assert_eq!(state.request_go_to(0), Ok(1));
    }

    #[test]
    fn test_load_success_clamps_position() {
        let mut state = ready(reflowable(), 20);
        state.on_location_changed(18, 20, None);

        state.begin_relayout();
        assert_eq!(state.status(), ReaderStatus::Loading);
        state.on_load_success(9);
        assert_eq!(state.current_position(), 9);
    }

    #[test]
    fn test_empty_document_is_an_error() {
        let mut state = paged();
        state.begin_session();
        state.on_load_success(0);
        assert_eq!(state.status(), ReaderStatus::Error);
        assert_eq!(state.error_message(), Some(EMPTY_DOCUMENT_MESSAGE));
    }

    #[test]
    fn test_font_scale_is_clamped() {
        let mut state = reflowable();
        assert_eq!(state.set_font_scale(1000), Ok(200));

        let mut state = reflowable();
        assert_eq!(state.set_font_scale(-1000), Ok(50));
        assert_eq!(state.set_font_scale(-10), Err(NoopReason::AtBoundary));
        assert_eq!(state.font_scale_percent(), 50);

        assert_eq!(state.set_font_scale(i32::MAX), Ok(200));
        assert_eq!(state.set_font_scale(i32::MIN), Ok(50));
    }

    #[test]
    fn test_zoom_is_clamped_and_rounded() {
        let mut state = paged();
        for _ in 0..3 {
            state.set_zoom(0.1).unwrap();
        }
        assert_eq!(state.zoom(), 1.3);

        assert_eq!(state.set_zoom(100.0), Ok(5.0));
        assert_eq!(state.set_zoom(0.1), Err(NoopReason::AtBoundary));
        assert_eq!(state.set_zoom(-100.0), Ok(0.1));
    }

    #[test]
    fn test_scale_intents_follow_layout() {
        assert_eq!(paged().set_font_scale(10), Err(NoopReason::UnsupportedLayout));
        assert_eq!(reflowable().set_zoom(0.1), Err(NoopReason::UnsupportedLayout));
    }

    #[test]
    fn test_stale_layout_epoch_is_ignored() {
        let mut state = ready(reflowable(), 10);
        let first = state.begin_relayout();
        let second = state.begin_relayout();

        assert!(!state.on_layout_complete(first, 4));
        assert_eq!(state.status(), ReaderStatus::Loading);
        assert!(!state.on_layout_failed(first, "late"));

        assert!(state.on_layout_complete(second, 12));
        assert_eq!(state.status(), ReaderStatus::Ready);
        assert_eq!(state.total_positions(), 12);
    }

    #[test]
    fn test_location_changes_ignored_while_loading() {
        let mut state = ready(reflowable(), 10);
        state.begin_relayout();
        assert!(!state.on_location_changed(7, 10, None));
        assert_eq!(state.current_position(), 1);
    }

    #[test]
    fn test_reset_bumps_generation() {
        let mut state = ready(paged(), 10);
        let generation = state.generation();
        state.toggle_theme();
        state.reset();

        assert!(!state.is_current(generation));
        assert_eq!(state.status(), ReaderStatus::Empty);
        assert_eq!(state.total_positions(), 0);
        assert_eq!(state.theme(), Theme::Dark);
    }
}
