//! Keyboard and touch input
//!
//! Maps arrow keys and horizontal swipes on the viewport to page intents.
//! Short drags stay taps or scrolls.

use crate::config::GestureConfig;
use crate::navigation::Intent;

/// Keys the router understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    Other,
}

impl Key {
    /// Parse a DOM `KeyboardEvent.key` value
    pub fn from_name(name: &str) -> Self {
        match name {
            "ArrowLeft" => Self::ArrowLeft,
            "ArrowRight" => Self::ArrowRight,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GestureRouter {
    threshold_px: f32,
    focused: bool,
    touch_start_x: Option<f32>,
}

impl GestureRouter {
    pub fn new(config: &GestureConfig) -> Self {
        Self {
            threshold_px: config.swipe_threshold_px,
            focused: true,
            touch_start_x: None,
        }
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Keyboard input only counts while the viewport is active
    pub fn on_focus_change(&mut self, focused: bool) {
        self.focused = focused;
    }

    pub fn on_key(&self, key: Key) -> Option<Intent> {
        if !self.focused {
            return None;
        }
        match key {
            Key::ArrowRight => Some(Intent::Next),
            Key::ArrowLeft => Some(Intent::Prev),
            Key::Other => None,
        }
    }

    pub fn touch_start(&mut self, x: f32) {
        self.touch_start_x = Some(x);
    }

    pub fn touch_cancel(&mut self) {
        self.touch_start_x = None;
    }

    /// Finish a touch; swiping left pages forward
    pub fn touch_end(&mut self, x: f32) -> Option<Intent> {
        let start = self.touch_start_x.take()?;
        let delta = start - x;

        if delta > self.threshold_px {
            Some(Intent::Next)
        } else if delta < -self.threshold_px {
            Some(Intent::Prev)
        } else {
            tracing::trace!(delta, "Touch below swipe threshold");
            None
        }
    }
}

impl Default for GestureRouter {
    fn default() -> Self {
        Self::new(&GestureConfig::default())
    }
}
