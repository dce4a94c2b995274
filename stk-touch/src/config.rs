//! Pipeline configuration table.
//!
//! Loaded from JSON; every field has a default so partial files work.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use stk_core::ConfigError;

/// The filter stages a pipeline can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageKind {
    Smoothing,
    Spatial,
    Hysteresis,
    ExitZone,
    Debounce,
    Chord,
}

impl StageKind {
    pub const DEFAULT_ORDER: [StageKind; 6] = [
        StageKind::Smoothing,
        StageKind::Spatial,
        StageKind::Hysteresis,
        StageKind::ExitZone,
        StageKind::Debounce,
        StageKind::Chord,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StageKind::Smoothing => "smoothing",
            StageKind::Spatial => "spatial",
            StageKind::Hysteresis => "hysteresis",
            StageKind::ExitZone => "exitZone",
            StageKind::Debounce => "debounce",
            StageKind::Chord => "chord",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmoothingConfig {
    pub enabled: bool,
    /// Frames in the rolling depth window.
    pub window: usize,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpatialConfig {
    pub enabled: bool,
    /// Fingertips closer than this (pixels) are treated as one touch.
    pub min_separation_px: f64,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_separation_px: 12.0,
        }
    }
}

/// Press/release pair for one key, centimetres past the contact plane.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub press: f64,
    pub release: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HysteresisConfig {
    pub enabled: bool,
    pub press_threshold: f64,
    pub release_threshold: f64,
    /// Per-key replacements for the default thresholds.
    pub overrides: BTreeMap<usize, Thresholds>,
}

impl Default for HysteresisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            press_threshold: 1.0,
            release_threshold: 0.5,
            overrides: BTreeMap::new(),
        }
    }
}

impl HysteresisConfig {
    pub fn thresholds(&self, key: usize) -> Thresholds {
        self.overrides.get(&key).copied().unwrap_or(Thresholds {
            press: self.press_threshold,
            release: self.release_threshold,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExitZoneConfig {
    pub enabled: bool,
    /// Height of the band above the keyboard's bottom edge, pixels.
    pub margin_px: f64,
    pub grace_ms: u64,
    /// Bottom edge of the keyboard in the reference image. Taken from the
    /// keyboard geometry when not set here.
    pub bottom_edge_y: Option<f64>,
}

impl Default for ExitZoneConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            margin_px: 20.0,
            grace_ms: 120,
            bottom_edge_y: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DebounceConfig {
    pub enabled: bool,
    pub cooldown_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_ms: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChordConfig {
    pub enabled: bool,
}

impl Default for ChordConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    pub key_count: usize,
    /// Execution order. Stages not listed do not run.
    pub order: Vec<StageKind>,
    /// Drop per-finger history after this many frames without the finger.
    pub evict_after_frames: u64,
    pub smoothing: SmoothingConfig,
    pub spatial: SpatialConfig,
    pub hysteresis: HysteresisConfig,
    pub exit_zone: ExitZoneConfig,
    pub debounce: DebounceConfig,
    pub chord: ChordConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            key_count: 14,
            order: StageKind::DEFAULT_ORDER.to_vec(),
            evict_after_frames: 30,
            smoothing: SmoothingConfig::default(),
            spatial: SpatialConfig::default(),
            hysteresis: HysteresisConfig::default(),
            exit_zone: ExitZoneConfig::default(),
            debounce: DebounceConfig::default(),
            chord: ChordConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::Missing(path.to_path_buf()),
            _ => ConfigError::Malformed(format!("{}: {e}", path.display())),
        })?;
        Self::from_json(&text)
    }

    pub fn is_enabled(&self, kind: StageKind) -> bool {
        match kind {
            StageKind::Smoothing => self.smoothing.enabled,
            StageKind::Spatial => self.spatial.enabled,
            StageKind::Hysteresis => self.hysteresis.enabled,
            StageKind::ExitZone => self.exit_zone.enabled,
            StageKind::Debounce => self.debounce.enabled,
            StageKind::Chord => self.chord.enabled,
        }
    }

    /// Enabled stages in execution order.
    pub fn active_stages(&self) -> impl Iterator<Item = StageKind> + '_ {
        self.order.iter().copied().filter(|&kind| self.is_enabled(kind))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.key_count == 0 {
            return invalid("keyCount must be at least 1".into());
        }
        for (i, kind) in self.order.iter().enumerate() {
            if self.order[..i].contains(kind) {
                return invalid(format!("stage {} listed twice in order", kind.name()));
            }
        }
        if self.smoothing.window == 0 {
            return invalid("smoothing window must be at least 1".into());
        }
        if !(self.spatial.min_separation_px >= 0.0) {
            return invalid("spatial minSeparationPx must be non-negative".into());
        }
        if !(self.exit_zone.margin_px >= 0.0) {
            return invalid("exit zone marginPx must be non-negative".into());
        }

        let h = &self.hysteresis;
        let defaults = Thresholds {
            press: h.press_threshold,
            release: h.release_threshold,
        };
        for (label, t) in std::iter::once(("default".to_string(), &defaults))
            .chain(h.overrides.iter().map(|(k, t)| (format!("key {k}"), t)))
        {
            if !t.press.is_finite() || !t.release.is_finite() || t.release >= t.press {
                return invalid(format!(
                    "{label}: release threshold {} must be below press threshold {}",
                    t.release, t.press
                ));
            }
        }
        if let Some(&key) = h.overrides.keys().find(|&&k| k >= self.key_count) {
            return invalid(format!(
                "threshold override for key {key} but only {} keys",
                self.key_count
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.active_stages().count(), 6);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = PipelineConfig::from_json(
            r#"{"keyCount": 8, "debounce": {"cooldownMs": 0}, "smoothing": {"enabled": false}}"#,
        )
        .unwrap();
        assert_eq!(config.key_count, 8);
        assert_eq!(config.debounce.cooldown_ms, 0);
        assert!(config.debounce.enabled);
        assert!(!config.smoothing.enabled);
        assert_eq!(config.smoothing.window, 4);
        assert!(!config.active_stages().any(|k| k == StageKind::Smoothing));
    }

    #[test]
    fn release_must_be_below_press() {
        let err = PipelineConfig::from_json(
            r#"{"hysteresis": {"pressThreshold": 2.0, "releaseThreshold": 2.0}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = PipelineConfig::from_json(
            r#"{"hysteresis": {"overrides": {"3": {"press": 1.0, "release": 1.5}}}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("key 3"));
    }

    #[test]
    fn per_key_overrides_replace_defaults() {
        let config = PipelineConfig::from_json(
            r#"{"hysteresis": {"overrides": {"2": {"press": 4.0, "release": 3.0}}}}"#,
        )
        .unwrap();
        assert_eq!(config.hysteresis.thresholds(2).press, 4.0);
        assert_eq!(config.hysteresis.thresholds(1).press, 1.0);
    }

    #[test]
    fn rejects_bad_order_and_window() {
        assert!(PipelineConfig::from_json(r#"{"order": ["chord", "chord"]}"#).is_err());
        assert!(PipelineConfig::from_json(r#"{"smoothing": {"window": 0}}"#).is_err());
        assert!(PipelineConfig::from_json(r#"{"keyCount": 0}"#).is_err());
        assert!(matches!(
            PipelineConfig::from_json("{ not json"),
            Err(ConfigError::Malformed(_))
        ));
    }

    #[test]
    fn order_subset_skips_stages() {
        let config = PipelineConfig::from_json(r#"{"order": ["hysteresis", "chord"]}"#).unwrap();
        let kinds: Vec<_> = config.active_stages().collect();
        assert_eq!(kinds, vec![StageKind::Hysteresis, StageKind::Chord]);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = PipelineConfig::load(dir.path().join("pipeline.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
    }
}
