use std::sync::Arc;
use std::time::Duration;

use log::info;
use stk_core::{DeviceError, Resolution, Side};

use crate::frame::Frame;
use crate::source::FrameSource;
use crate::worker::{CaptureSettings, CaptureWorker};

/// Default wait for a fresh frame in the main loop.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Bound on how long shutdown waits for each capture thread.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Both capture threads of the rig.
pub struct StereoCapture {
    workers: [CaptureWorker; 2],
    resolution: Resolution,
}

impl StereoCapture {
    pub fn start(
        left: Box<dyn FrameSource>,
        right: Box<dyn FrameSource>,
        resolution: Resolution,
        settings: [CaptureSettings; 2],
    ) -> Self {
        info!("starting capture: left={} right={}", left.id(), right.id());
        let [left_settings, right_settings] = settings;
        Self {
            workers: [
                CaptureWorker::spawn(left, left_settings),
                CaptureWorker::spawn(right, right_settings),
            ],
            resolution,
        }
    }

    pub fn worker(&self, side: Side) -> &CaptureWorker {
        &self.workers[side.index()]
    }

    /// Latest frame of each camera, a blank placeholder where nothing new
    /// arrived within `timeout`. Fails once either camera has given up.
    pub fn poll(&self, timeout: Duration) -> Result<[Arc<Frame>; 2], DeviceError> {
        for worker in &self.workers {
            if let Some(failures) = worker.slot().unavailable() {
                return Err(DeviceError::Unavailable {
                    camera: worker.camera().to_string(),
                    failures,
                });
            }
        }
        let Resolution { width, height } = self.resolution;
        Ok(self
            .workers
            .each_ref()
            .map(|w| w.slot().latest_or_blank(timeout, width, height)))
    }

    /// Stop both threads, waiting at most `timeout` for each. Returns `true`
    /// when both exited.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        let mut clean = true;
        for worker in &mut self.workers {
            clean &= worker.stop(timeout);
        }
        clean
    }
}
