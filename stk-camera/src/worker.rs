use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::frame::{Frame, Orientation};
use crate::slot::FrameSlot;
use crate::source::FrameSource;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureSettings {
    /// Consecutive failed reads before the camera is declared unavailable.
    pub max_read_failures: u32,
    /// Pause after a failed read.
    pub retry_delay_ms: u64,
    /// Minimum time between frames; zero reads as fast as the source allows.
    pub frame_interval_ms: u64,
    pub orientation: Orientation,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_read_failures: 30,
            retry_delay_ms: 10,
            frame_interval_ms: 0,
            orientation: Orientation::default(),
        }
    }
}

/// Background thread reading one camera into a [`FrameSlot`].
pub struct CaptureWorker {
    camera: String,
    slot: Arc<FrameSlot>,
    stop: Arc<AtomicBool>,
    done: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureWorker {
    pub fn spawn(mut source: Box<dyn FrameSource>, settings: CaptureSettings) -> Self {
        let camera = source.id().to_string();
        let slot = Arc::new(FrameSlot::new());
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done) = bounded::<()>(1);

        let handle = {
            let slot = Arc::clone(&slot);
            let stop = Arc::clone(&stop);
            let camera = camera.clone();
            thread::spawn(move || {
                let mut sequence = 0u64;
                let mut failures = 0u32;
                while !stop.load(Ordering::Relaxed) {
                    match source.read() {
                        Ok(image) => {
                            failures = 0;
                            sequence += 1;
                            let image = settings.orientation.apply(image);
                            slot.publish(Frame::new(sequence, image));
                            if settings.frame_interval_ms > 0 {
                                thread::sleep(Duration::from_millis(settings.frame_interval_ms));
                            }
                        }
                        Err(e) => {
                            failures += 1;
                            debug!("{camera}: read failed ({failures}): {e}");
                            if failures >= settings.max_read_failures {
                                error!("{camera}: giving up after {failures} failed reads");
                                slot.mark_unavailable(failures);
                                break;
                            }
                            thread::sleep(Duration::from_millis(settings.retry_delay_ms));
                        }
                    }
                }
                let _ = done_tx.send(());
            })
        };

        Self {
            camera,
            slot,
            stop,
            done,
            handle: Some(handle),
        }
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    pub fn slot(&self) -> &Arc<FrameSlot> {
        &self.slot
    }

    /// Ask the thread to exit and wait at most `timeout` for it. Returns
    /// `false` if the thread did not finish in time.
    pub fn stop(&mut self, timeout: Duration) -> bool {
        self.stop.store(true, Ordering::Relaxed);
        self.wait(timeout)
    }

    /// Wait at most `timeout` for the thread to exit on its own.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("{}: capture thread still running after {timeout:?}", self.camera);
                self.handle = Some(handle);
                false
            }
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.stop(Duration::from_millis(500));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;
    use stk_core::DeviceError;

    struct Counting {
        reads: u32,
        fail_after: Option<u32>,
    }

    impl FrameSource for Counting {
        fn id(&self) -> &str {
            "counting"
        }

        fn read(&mut self) -> Result<GrayImage, DeviceError> {
            self.reads += 1;
            if self.fail_after.is_some_and(|n| self.reads > n) {
                return Err(DeviceError::Stalled("counting".into()));
            }
            Ok(GrayImage::new(4, 2))
        }
    }

    #[test]
    fn publishes_frames_until_stopped() {
        let mut worker = CaptureWorker::spawn(
            Box::new(Counting {
                reads: 0,
                fail_after: None,
            }),
            CaptureSettings {
                frame_interval_ms: 1,
                ..CaptureSettings::default()
            },
        );
        let frame = worker.slot().take_fresh(Duration::from_secs(5)).unwrap();
        assert!(frame.sequence >= 1);
        assert!(worker.stop(Duration::from_secs(5)));
        assert!(worker.stop(Duration::from_millis(1)));
    }

    #[test]
    fn repeated_failures_mark_the_slot_unavailable() {
        let mut worker = CaptureWorker::spawn(
            Box::new(Counting {
                reads: 0,
                fail_after: Some(2),
            }),
            CaptureSettings {
                max_read_failures: 3,
                retry_delay_ms: 1,
                ..CaptureSettings::default()
            },
        );
        assert!(worker.wait(Duration::from_secs(5)));
        assert_eq!(worker.slot().unavailable(), Some(3));
        assert_eq!(worker.slot().peek().unwrap().sequence, 2);
    }
}
