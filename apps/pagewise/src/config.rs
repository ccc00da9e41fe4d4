//! Configuration management for the reader core

use serde::Deserialize;
use std::env;

use crate::engine::{CrossOriginPolicy, Flow, RenderOptions, Spread, Theme};
use crate::error::ConfigError;

/// Maximum upload size: 500MB
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Characters per generated location on reflowable documents
pub const DEFAULT_LOCATION_GRANULARITY: u32 = 1024;

/// Minimum horizontal travel for a touch to count as a swipe
pub const DEFAULT_SWIPE_THRESHOLD_PX: f32 = 50.0;

#[derive(Debug, Clone, Deserialize)]
pub struct ReaderConfig {
    pub render: RenderOptions,
    pub scale: ScaleConfig,
    pub gesture: GestureConfig,
    pub upload: UploadConfig,
    pub location_granularity: u32,
    pub viewport_id: String,
    pub initial_theme: Theme,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScaleConfig {
    pub zoom_step: f32,
    pub min_zoom: f32,
    pub max_zoom: f32,
    pub initial_zoom: f32,
    pub font_step: i32,
    pub min_font_percent: u16,
    pub max_font_percent: u16,
    pub initial_font_percent: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GestureConfig {
    pub swipe_threshold_px: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    pub max_upload_bytes: u64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        ScaleConfig {
            zoom_step: 0.1,
            min_zoom: 0.1,
            max_zoom: 5.0,
            initial_zoom: 1.0,
            font_step: 10,
            min_font_percent: 50,
            max_font_percent: 200,
            initial_font_percent: 100,
        }
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        GestureConfig {
            swipe_threshold_px: DEFAULT_SWIPE_THRESHOLD_PX,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            render: RenderOptions::default(),
            scale: ScaleConfig::default(),
            gesture: GestureConfig::default(),
            upload: UploadConfig::default(),
            location_granularity: DEFAULT_LOCATION_GRANULARITY,
            viewport_id: "viewer".to_string(),
            initial_theme: Theme::Light,
        }
    }
}

impl ReaderConfig {
    /// Load configuration from `PAGEWISE_*` environment variables.
    ///
    /// A `.env` file is read first when present. Missing or unparsable values
    /// fall back to the defaults; inconsistent bounds are rejected.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = ReaderConfig::default();
        let scale = ScaleConfig {
            zoom_step: env_or("PAGEWISE_ZOOM_STEP", defaults.scale.zoom_step),
            min_zoom: env_or("PAGEWISE_MIN_ZOOM", defaults.scale.min_zoom),
            max_zoom: env_or("PAGEWISE_MAX_ZOOM", defaults.scale.max_zoom),
            initial_zoom: env_or("PAGEWISE_INITIAL_ZOOM", defaults.scale.initial_zoom),
            font_step: env_or("PAGEWISE_FONT_STEP", defaults.scale.font_step),
            min_font_percent: env_or("PAGEWISE_MIN_FONT_PERCENT", defaults.scale.min_font_percent),
            max_font_percent: env_or("PAGEWISE_MAX_FONT_PERCENT", defaults.scale.max_font_percent),
            initial_font_percent: env_or(
                "PAGEWISE_INITIAL_FONT_PERCENT",
                defaults.scale.initial_font_percent,
            ),
        };

        let render = RenderOptions {
            flow: match env::var("PAGEWISE_FLOW").unwrap_or_default().as_str() {
                "scrolled" => Flow::Scrolled,
                _ => Flow::Paginated,
            },
            spread: match env::var("PAGEWISE_SPREAD").unwrap_or_default().as_str() {
                "auto" => Spread::Auto,
                _ => Spread::None,
            },
            scripts_allowed: env_or("PAGEWISE_ALLOW_SCRIPTS", defaults.render.scripts_allowed),
            cross_origin: match env::var("PAGEWISE_CROSS_ORIGIN").unwrap_or_default().as_str() {
                "use-credentials" => CrossOriginPolicy::UseCredentials,
                _ => CrossOriginPolicy::Anonymous,
            },
        };

        let config = ReaderConfig {
            render,
            scale,
            gesture: GestureConfig {
                swipe_threshold_px: env_or(
                    "PAGEWISE_SWIPE_THRESHOLD_PX",
                    defaults.gesture.swipe_threshold_px,
                ),
            },
            upload: UploadConfig {
                max_upload_bytes: env_or(
                    "PAGEWISE_MAX_UPLOAD_BYTES",
                    defaults.upload.max_upload_bytes,
                ),
            },
            location_granularity: env_or(
                "PAGEWISE_LOCATION_GRANULARITY",
                defaults.location_granularity,
            ),
            viewport_id: env::var("PAGEWISE_VIEWPORT_ID").unwrap_or(defaults.viewport_id),
            initial_theme: match env::var("PAGEWISE_THEME").unwrap_or_default().as_str() {
                "dark" => Theme::Dark,
                _ => Theme::Light,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that every bound is consistent
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scale = &self.scale;

        if !(scale.min_zoom > 0.0 && scale.min_zoom <= scale.max_zoom) {
            return Err(invalid(
                "scale.min_zoom",
                format!("{} must be positive and <= max_zoom {}", scale.min_zoom, scale.max_zoom),
            ));
        }
        if !(scale.min_zoom..=scale.max_zoom).contains(&scale.initial_zoom) {
            return Err(invalid(
                "scale.initial_zoom",
                format!("{} outside [{}, {}]", scale.initial_zoom, scale.min_zoom, scale.max_zoom),
            ));
        }
        if scale.zoom_step <= 0.0 {
            return Err(invalid("scale.zoom_step", "must be positive".to_string()));
        }
        if scale.min_font_percent == 0 || scale.min_font_percent > scale.max_font_percent {
            return Err(invalid(
                "scale.min_font_percent",
                format!(
                    "{} must be non-zero and <= max_font_percent {}",
                    scale.min_font_percent, scale.max_font_percent
                ),
            ));
        }
        if !(scale.min_font_percent..=scale.max_font_percent).contains(&scale.initial_font_percent)
        {
            return Err(invalid(
                "scale.initial_font_percent",
                format!(
                    "{} outside [{}, {}]",
                    scale.initial_font_percent, scale.min_font_percent, scale.max_font_percent
                ),
            ));
        }
        if scale.font_step <= 0 {
            return Err(invalid("scale.font_step", "must be positive".to_string()));
        }
        if self.gesture.swipe_threshold_px <= 0.0 {
            return Err(invalid(
                "gesture.swipe_threshold_px",
                "must be positive".to_string(),
            ));
        }
        if self.location_granularity == 0 {
            return Err(invalid("location_granularity", "must be non-zero".to_string()));
        }
        if self.viewport_id.trim().is_empty() {
            return Err(invalid("viewport_id", "must not be empty".to_string()));
        }

        Ok(())
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn invalid(key: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { key, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ReaderConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scale.min_font_percent, 50);
        assert_eq!(config.scale.max_font_percent, 200);
        assert_eq!(config.gesture.swipe_threshold_px, 50.0);
        assert_eq!(config.render.flow, Flow::Paginated);
    }

    #[test]
    fn test_rejects_inverted_zoom_bounds() {
        let mut config = ReaderConfig::default();
        config.scale.min_zoom = 3.0;
        config.scale.max_zoom = 2.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "scale.min_zoom", .. })
        ));
    }

    #[test]
    fn test_rejects_initial_font_outside_bounds() {
        let mut config = ReaderConfig::default();
        config.scale.initial_font_percent = 300;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_granularity() {
        let mut config = ReaderConfig::default();
        config.location_granularity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("PAGEWISE_TEST_ENV_OR", "not-a-number");
        assert_eq!(env_or("PAGEWISE_TEST_ENV_OR", 7u32), 7);
        std::env::set_var("PAGEWISE_TEST_ENV_OR", " 12 ");
        assert_eq!(env_or("PAGEWISE_TEST_ENV_OR", 7u32), 12);
        std::env::remove_var("PAGEWISE_TEST_ENV_OR");
    }

    #[test]
    fn test_deserialize_from_json() {
        let json = r#"{
            "render": {"flow": "scrolled", "spread": "auto", "scriptsAllowed": false, "crossOrigin": "anonymous"},
            "scale": {
                "zoom_step": 0.25, "min_zoom": 0.5, "max_zoom": 4.0, "initial_zoom": 1.0,
                "font_step": 5, "min_font_percent": 60, "max_font_percent": 180, "initial_font_percent": 100
            },
            "gesture": {"swipe_threshold_px": 40.0},
            "upload": {"max_upload_bytes": 1024},
            "location_granularity": 150,
            "viewport_id": "area",
            "initial_theme": "dark"
        }"#;
        let config: ReaderConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.render.flow, Flow::Scrolled);
        assert_eq!(config.render.spread, Spread::Auto);
        assert_eq!(config.initial_theme, Theme::Dark);
        assert!(config.validate().is_ok());
    }
}
