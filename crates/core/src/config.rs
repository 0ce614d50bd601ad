use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SafeVisionError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_f64(profile: &str, key: &str, default: f64) -> f64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Global detection config ───────────────────────────────────

/// Camera geometry, unit conversion and alert suppression settings shared by
/// every rule.
///
/// Durations are whole seconds. `camera_angle` is degrees below horizontal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Meters per pixel for the flat-ground approximation.
    pub pixel_to_meter: f64,
    /// Rule-global cooldown between two alerts of the same rule.
    pub cooldown: u64,
    /// Minimum interval between two alerts for the same entity.
    pub min_violation_interval: u64,
    /// Short window suppressing repeat alerts of a rule within one video.
    pub video_cooldown: u64,

    pub camera_height: f64,
    pub camera_angle: f64,
    pub focal_length: f64,
    pub image_height: f64,
    pub ground_plane_y: f64,
    pub max_detection_distance: f64,
    pub min_detection_distance: f64,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            pixel_to_meter: 0.05,
            cooldown: 60,
            min_violation_interval: 30,
            video_cooldown: 5,
            camera_height: 3.0,
            camera_angle: 15.0,
            focal_length: 1000.0,
            image_height: 1080.0,
            ground_plane_y: 800.0,
            max_detection_distance: 20.0,
            min_detection_distance: 1.0,
        }
    }
}

impl GlobalConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `SAFEVISION_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("SAFEVISION_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        let d = Self::default();
        Self {
            pixel_to_meter: profiled_env_f64(p, "PIXEL_TO_METER", d.pixel_to_meter),
            cooldown: profiled_env_u64(p, "ALERT_COOLDOWN", d.cooldown),
            min_violation_interval: profiled_env_u64(p, "MIN_VIOLATION_INTERVAL", d.min_violation_interval),
            video_cooldown: profiled_env_u64(p, "VIDEO_COOLDOWN", d.video_cooldown),
            camera_height: profiled_env_f64(p, "CAMERA_HEIGHT", d.camera_height),
            camera_angle: profiled_env_f64(p, "CAMERA_ANGLE", d.camera_angle),
            focal_length: profiled_env_f64(p, "FOCAL_LENGTH", d.focal_length),
            image_height: profiled_env_f64(p, "IMAGE_HEIGHT", d.image_height),
            ground_plane_y: profiled_env_f64(p, "GROUND_PLANE_Y", d.ground_plane_y),
            max_detection_distance: profiled_env_f64(p, "MAX_DETECTION_DISTANCE", d.max_detection_distance),
            min_detection_distance: profiled_env_f64(p, "MIN_DETECTION_DISTANCE", d.min_detection_distance),
        }
    }

    /// Parse a JSON or YAML config file, chosen by extension.
    ///
    /// Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, SafeVisionError> {
        let contents = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == "yml" || e == "yaml")
            .unwrap_or(false);

        let config: Self = if is_yaml {
            serde_yaml::from_str(&contents)?
        } else {
            serde_json::from_str(&contents)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every geometry check meaningless.
    pub fn validate(&self) -> Result<(), SafeVisionError> {
        if !(self.pixel_to_meter.is_finite() && self.pixel_to_meter > 0.0) {
            return Err(SafeVisionError::Config(format!(
                "pixel_to_meter must be positive, got {}",
                self.pixel_to_meter
            )));
        }
        if !(self.focal_length.is_finite() && self.focal_length > 0.0) {
            return Err(SafeVisionError::Config(format!(
                "focal_length must be positive, got {}",
                self.focal_length
            )));
        }
        if self.min_detection_distance > self.max_detection_distance {
            return Err(SafeVisionError::Config(format!(
                "min_detection_distance ({}) exceeds max_detection_distance ({})",
                self.min_detection_distance, self.max_detection_distance
            )));
        }
        Ok(())
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Detection config loaded:");
        tracing::info!("  units:       pixel_to_meter={}", self.pixel_to_meter);
        tracing::info!(
            "  cooldowns:   rule={}s, entity={}s, video={}s",
            self.cooldown, self.min_violation_interval, self.video_cooldown
        );
        tracing::info!(
            "  camera:      height={}m, angle={}deg, focal={}px, image_height={}px",
            self.camera_height, self.camera_angle, self.focal_length, self.image_height
        );
        tracing::info!(
            "  range:       {}m..{}m",
            self.min_detection_distance, self.max_detection_distance
        );
    }
}
