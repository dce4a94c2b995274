use std::collections::{BTreeSet, HashMap};

use log::{debug, trace, warn};
use stk_core::ConfigError;

use crate::config::PipelineConfig;
use crate::keyboard::KeyboardGeometry;
use crate::stage::{self, FrameContext, Stage};
use crate::types::{FingerId, FingerObservation, FrameEvents, KeyState};

/// Turns per-frame fingertip observations into key press/release edges.
pub struct TouchPipeline {
    config: PipelineConfig,
    stages: Vec<Box<dyn Stage>>,
    keys: Vec<KeyState>,
    last_seen: HashMap<FingerId, u64>,
    frame: u64,
    bottom_edge_y: Option<f64>,
    last_events: Option<FrameEvents>,
}

impl std::fmt::Debug for TouchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TouchPipeline")
            .field("stages", &self.stage_names())
            .field("keys", &self.keys.len())
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

impl TouchPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let stages: Vec<_> = config
            .active_stages()
            .map(|kind| stage::build(kind, &config))
            .collect();
        let keys = vec![KeyState::default(); config.key_count];
        debug!(
            "touch pipeline: {} keys, stages {:?}",
            config.key_count,
            stages.iter().map(|s| s.kind().name()).collect::<Vec<_>>()
        );
        Ok(Self {
            config,
            stages,
            keys,
            last_seen: HashMap::new(),
            frame: 0,
            bottom_edge_y: None,
            last_events: None,
        })
    }

    /// Take the bottom edge used by the exit zone from `geometry`.
    pub fn with_keyboard(mut self, geometry: &dyn KeyboardGeometry) -> Self {
        if geometry.key_count() != self.config.key_count {
            warn!(
                "keyboard has {} keys but pipeline is configured for {}",
                geometry.key_count(),
                self.config.key_count
            );
        }
        self.bottom_edge_y = Some(geometry.bottom_edge_y());
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.kind().name()).collect()
    }

    pub fn key_state(&self, key: usize) -> Option<&KeyState> {
        self.keys.get(key)
    }

    /// Keys currently held according to the chord stage. Empty when that
    /// stage is disabled.
    pub fn current_chord(&self) -> BTreeSet<usize> {
        self.stages
            .iter()
            .find_map(|s| s.chord())
            .cloned()
            .unwrap_or_default()
    }

    /// Run one frame. A frame with the same timestamp as the previous one
    /// returns the previous result without touching any state.
    pub fn process(
        &mut self,
        detections: Vec<FingerObservation>,
        timestamp_ms: u64,
    ) -> FrameEvents {
        if let Some(last) = self
            .last_events
            .as_ref()
            .filter(|e| e.timestamp_ms == timestamp_ms)
        {
            trace!("frame {timestamp_ms} already processed");
            return last.clone();
        }
        self.frame += 1;

        let key_count = self.config.key_count;
        let mut current = Vec::with_capacity(detections.len());
        for d in detections {
            self.last_seen.insert(d.finger, self.frame);
            match d.key {
                Some(key) if key < key_count => current.push(d),
                key => trace!("dropping {:?} with key {key:?}", d.finger),
            }
        }

        let ctx = FrameContext {
            timestamp_ms,
            frame: self.frame,
            keys: &self.keys,
            bottom_edge_y: self.bottom_edge_y,
        };
        for stage in &mut self.stages {
            current = stage.process(current, &ctx);
        }

        let mut down = vec![false; key_count];
        for key in current.iter().filter_map(|d| d.key) {
            if let Some(slot) = down.get_mut(key) {
                *slot = true;
            }
        }

        let mut events = FrameEvents::empty(timestamp_ms, key_count);
        for (key, state) in self.keys.iter_mut().enumerate() {
            let now = down[key];
            if now != state.pressed {
                events.on_map[key] = now;
                events.off_map[key] = !now;
                state.pressed = now;
                state.last_transition_ms = Some(timestamp_ms);
                debug!("key {key} {}", if now { "down" } else { "up" });
            }
        }

        self.evict();
        self.last_events = Some(events.clone());
        events
    }

    fn evict(&mut self) {
        let limit = self.config.evict_after_frames;
        let frame = self.frame;
        let stale: Vec<FingerId> = self
            .last_seen
            .iter()
            .filter(|&(_, &seen)| frame - seen >= limit)
            .map(|(&finger, _)| finger)
            .collect();
        for finger in stale {
            trace!("evicting {finger:?}");
            self.last_seen.remove(&finger);
            for stage in &mut self.stages {
                stage.forget(finger);
            }
        }
    }

    pub fn tracked_fingers(&self) -> usize {
        self.last_seen.len()
    }

    /// Release every key and forget all history.
    pub fn reset(&mut self) {
        self.keys.fill(KeyState::default());
        for stage in &mut self.stages {
            stage.reset();
        }
        self.last_seen.clear();
        self.last_events = None;
        self.frame = 0;
    }
}
