//! Runtime loop: frames from both cameras, fingertip tracks from a replay
//! file, key events as JSON lines on stdout.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Args;
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stk_camera::{
    CaptureSettings, Frame, ImageSequenceSource, JOIN_TIMEOUT, Orientation, POLL_TIMEOUT,
    StereoCapture,
};
use stk_core::{ConfigError, Resolution, Side};
use stk_depth::{ContactPlane, DepthProvider, FallbackGeometry, TriangulationMethod};
use stk_io::{CalibrationStore, FrameArchive};
use stk_touch::{KeyStrip, KeyboardGeometry, ObservationBuilder, PipelineConfig, TouchPipeline, TrackedLandmark};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Directory of left camera frames.
    #[arg(long)]
    pub left: PathBuf,

    /// Directory of right camera frames.
    #[arg(long)]
    pub right: PathBuf,

    /// JSON-lines file, one tracker result per captured frame.
    #[arg(long)]
    pub landmarks: PathBuf,

    #[arg(long, default_value = "calibration.json")]
    pub calibration: PathBuf,

    /// Touch pipeline configuration (JSON). Defaults apply when omitted.
    #[arg(long)]
    pub pipeline: Option<PathBuf>,

    /// Key strip geometry (JSON). Defaults to the lower third of the frame.
    #[arg(long)]
    pub keyboard: Option<PathBuf>,

    /// Declared optics for approximate depth when no calibration is usable.
    #[arg(long)]
    pub fallback: Option<PathBuf>,

    #[arg(long, default_value = "dlt")]
    pub method: TriangulationMethod,

    /// Distance of the contact surface from the left camera, centimetres.
    #[arg(long, default_value_t = 50.0)]
    pub plane_cm: f64,

    /// Pace of the replayed cameras.
    #[arg(long, default_value_t = 33)]
    pub frame_interval_ms: u64,

    #[arg(long)]
    pub rotate_left: bool,

    #[arg(long)]
    pub rotate_right: bool,

    #[arg(long)]
    pub mirror_left: bool,

    #[arg(long)]
    pub mirror_right: bool,

    /// Write rectified frames here (calibrated depth only).
    #[arg(long)]
    pub rectified_out: Option<PathBuf>,
}

impl RunArgs {
    fn capture_settings(&self) -> [CaptureSettings; 2] {
        let settings = |rotate_180, mirror| CaptureSettings {
            frame_interval_ms: self.frame_interval_ms,
            orientation: Orientation { rotate_180, mirror },
            ..CaptureSettings::default()
        };
        [
            settings(self.rotate_left, self.mirror_left),
            settings(self.rotate_right, self.mirror_right),
        ]
    }
}

/// One line of the landmark replay file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerFrame {
    /// Capture time; the frame's arrival time is used when absent.
    pub timestamp_ms: Option<u64>,
    pub left: Vec<TrackedLandmark>,
    pub right: Vec<TrackedLandmark>,
}

/// Key events of one frame as written to stdout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLine {
    pub timestamp_ms: u64,
    pub pressed: Vec<usize>,
    pub released: Vec<usize>,
    pub chord: Vec<usize>,
    pub degraded: bool,
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn read_tracker_frames(reader: impl BufRead) -> anyhow::Result<Vec<TrackerFrame>> {
    let mut frames = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame = serde_json::from_str(&line)
            .with_context(|| format!("landmark line {}", number + 1))?;
        frames.push(frame);
    }
    Ok(frames)
}

/// Depth, key assignment and touch filtering for one frame at a time.
pub struct Runtime<'a> {
    provider: DepthProvider,
    plane: ContactPlane,
    builder: ObservationBuilder<'a>,
    pipeline: TouchPipeline,
}

impl<'a> Runtime<'a> {
    pub fn new(
        provider: DepthProvider,
        plane: ContactPlane,
        keyboard: &'a dyn KeyboardGeometry,
        config: PipelineConfig,
    ) -> Result<Self, ConfigError> {
        let pipeline = TouchPipeline::new(config)?.with_keyboard(keyboard);
        info!("touch stages: {}", pipeline.stage_names().join(" -> "));
        Ok(Self {
            provider,
            plane,
            builder: ObservationBuilder::new(keyboard),
            pipeline,
        })
    }

    pub fn provider(&self) -> &DepthProvider {
        &self.provider
    }

    /// Run one tracker result through the pipeline. `None` when no key
    /// changed.
    pub fn step(&mut self, tracked: &TrackerFrame, timestamp_ms: u64) -> Option<EventLine> {
        let (provider, plane) = (&self.provider, &self.plane);
        let observations = self.builder.build(&tracked.left, &tracked.right, |l, r| {
            provider.triangulate(l, r).map(|p| plane.signed_distance(&p))
        });
        debug!("{timestamp_ms} ms: {} fingertips with depth", observations.len());

        let events = self.pipeline.process(observations, timestamp_ms);
        if events.is_empty() {
            return None;
        }
        Some(EventLine {
            timestamp_ms,
            pressed: events.pressed(),
            released: events.released(),
            chord: self.pipeline.current_chord().into_iter().collect(),
            degraded: self.provider.is_degraded(),
        })
    }
}

fn default_keyboard(resolution: Resolution, keys: usize) -> KeyStrip {
    let (w, h) = (f64::from(resolution.width), f64::from(resolution.height));
    KeyStrip::new(0.0, h * 2.0 / 3.0, w, h / 3.0, keys)
}

pub fn run(args: &RunArgs) -> anyhow::Result<()> {
    let config = match &args.pipeline {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let fallback: FallbackGeometry = match &args.fallback {
        Some(path) => read_json(path)?,
        None => FallbackGeometry::default(),
    };
    let tracked = {
        let file = fs::File::open(&args.landmarks)
            .with_context(|| format!("opening {}", args.landmarks.display()))?;
        read_tracker_frames(BufReader::new(file))?
    };

    let left_source = ImageSequenceSource::open(&args.left)?;
    let right_source = ImageSequenceSource::open(&args.right)?;

    let loaded = CalibrationStore::new(&args.calibration)
        .load()
        .map_err(ConfigError::from);
    let resolution = match &loaded {
        Ok(record) => record.resolution,
        Err(_) => left_source.resolution()?,
    };
    let provider = DepthProvider::select(loaded, &fallback, resolution).with_method(args.method);

    let keyboard = match &args.keyboard {
        Some(path) => read_json(path)?,
        None => default_keyboard(resolution, config.key_count),
    };
    let mut runtime = Runtime::new(provider, ContactPlane::at_depth(args.plane_cm), &keyboard, config)?;
    let rectified = args.rectified_out.as_ref().map(FrameArchive::new);

    let mut capture = StereoCapture::start(
        Box::new(left_source),
        Box::new(right_source),
        resolution,
        args.capture_settings(),
    );
    let outcome = replay(&mut runtime, &capture, &tracked, rectified.as_ref());
    if !capture.shutdown(JOIN_TIMEOUT) {
        warn!("capture threads did not stop within {JOIN_TIMEOUT:?}");
    }
    outcome
}

/// Pull frame pairs until the left camera reaches the last tracker result.
/// Frames the loop was too slow to see are skipped along with their results.
fn replay(
    runtime: &mut Runtime<'_>,
    capture: &StereoCapture,
    tracked: &[TrackerFrame],
    rectified: Option<&FrameArchive>,
) -> anyhow::Result<()> {
    let started = Instant::now();
    let mut stdout = io::stdout().lock();
    let mut pending: [Option<Arc<Frame>>; 2] = [None, None];
    let mut handled = 0usize;

    loop {
        let frames = capture.poll(POLL_TIMEOUT).context("camera lost")?;
        for (slot, frame) in pending.iter_mut().zip(frames) {
            if !frame.is_blank() {
                *slot = Some(frame);
            }
        }
        let [Some(left), Some(right)] = pending.clone() else {
            continue;
        };

        // Tracker results are indexed by capture sequence, starting at 1.
        let Some(result) = usize::try_from(left.sequence - 1)
            .ok()
            .and_then(|i| tracked.get(i))
        else {
            break;
        };
        let timestamp_ms = result.timestamp_ms.unwrap_or_else(|| {
            u64::try_from(left.captured_at.duration_since(started).as_millis()).unwrap_or(u64::MAX)
        });

        if let (Some(archive), Some(estimator)) = (rectified, runtime.provider().estimator()) {
            for (side, frame) in [(Side::Left, &left), (Side::Right, &right)] {
                let image = estimator.rectify_image(&frame.image, side);
                archive.store(&side.to_string(), handled, &image)?;
            }
        }

        if let Some(line) = runtime.step(result, timestamp_ms) {
            writeln!(stdout, "{}", serde_json::to_string(&line)?)?;
        }
        handled += 1;
        pending = [None, None];
        if left.sequence >= tracked.len() as u64 {
            break;
        }
    }
    info!("replayed {handled} of {} frames", tracked.len());
    Ok(())
}
