//! Frame acquisition under a drop-latest backpressure policy.
//!
//! The frame source owns the capture device and drives it from a dedicated
//! acquisition thread. Each subscriber gets its own single-slot mailbox, so a
//! consumer that is still busy with the previous frame simply finds the newest
//! one waiting when it comes back. Failed grabs never end the sequence.

use crate::capture::{CaptureBackend, CaptureDevice, VideoSource};
use crate::config::SourceConfig;
use crate::frame::Frame;
use crate::mailbox::{mailbox, MailboxReceiver, MailboxSender};
use crate::vision::ImageBuffer;
use crate::Result;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lazy, non-restartable sequence of frames for one consumer
///
/// Iterating blocks until the next frame; the sequence ends when the source stops.
pub type FrameReceiver<I> = MailboxReceiver<Arc<Frame<I>>>;

type Subscribers<I> = Arc<Mutex<Vec<MailboxSender<Arc<Frame<I>>>>>>;

/// Acquisition counters
#[derive(Debug, Default)]
struct SourceStats {
    delivered: AtomicU64,
    failed_grabs: AtomicU64,
    stale: AtomicU64,
}

/// Snapshot of the acquisition counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCounters {
    /// Frames posted to subscribers
    pub delivered: u64,
    /// Grabs that produced no usable image
    pub failed_grabs: u64,
    /// Frames dropped because the device position did not advance
    pub stale: u64,
}

/// Capture device wrapper producing frames for any number of subscribers
pub struct FrameSource<I: ImageBuffer> {
    backend: Arc<dyn CaptureBackend<I>>,
    source: VideoSource,
    config: SourceConfig,
    subscribers: Subscribers<I>,
    running: Arc<AtomicBool>,
    stats: Arc<SourceStats>,
    handle: Option<JoinHandle<()>>,
}

impl<I: ImageBuffer> FrameSource<I> {
    /// Create a stopped frame source for the configured device
    pub fn new(backend: Arc<dyn CaptureBackend<I>>, config: SourceConfig) -> Self {
        let source = config.device.parse::<VideoSource>().unwrap_or_else(|e| match e {});
        Self {
            backend,
            source,
            config,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(SourceStats::default()),
            handle: None,
        }
    }

    /// Device or stream this source reads from
    pub fn source(&self) -> &VideoSource {
        &self.source
    }

    /// Register a consumer for the next (or current) run
    pub fn subscribe(&self) -> FrameReceiver<I> {
        let (tx, rx) = mailbox();
        self.subscribers.lock().push(tx);
        rx
    }

    /// True while the acquisition thread is running
    pub fn is_running(&self) -> bool {
        self.handle.is_some() && self.running.load(Ordering::Acquire)
    }

    /// Acquisition counters since the source was created
    pub fn counters(&self) -> SourceCounters {
        SourceCounters {
            delivered: self.stats.delivered.load(Ordering::Relaxed),
            failed_grabs: self.stats.failed_grabs.load(Ordering::Relaxed),
            stale: self.stats.stale.load(Ordering::Relaxed),
        }
    }

    /// Open the device and start acquiring frames
    ///
    /// Starting an already running source is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be opened or the acquisition
    /// thread cannot be spawned.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            warn!("Frame source for {} already running", self.source);
            return Ok(());
        }

        info!("Opening {}", self.source);
        let device = self.backend.open(&self.source)?;

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let subscribers = Arc::clone(&self.subscribers);
        let stats = Arc::clone(&self.stats);
        let config = self.config.clone();

        let handle = thread::Builder::new()
            .name("frame-source".to_string())
            .spawn(move || acquire(device, &running, &subscribers, &stats, &config));

        match handle {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::Release);
                Err(e.into())
            }
        }
    }

    /// Stop acquisition and release the device
    ///
    /// Blocks until the acquisition thread has waited out the release grace
    /// period and dropped the device. Every subscriber's sequence ends and
    /// frames still waiting in a mailbox are discarded.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Frame source thread panicked");
            }
            info!("Frame source for {} stopped", self.source);
        }
        close_all(&self.subscribers);
    }
}

impl<I: ImageBuffer> Drop for FrameSource<I> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Acquisition loop: runs on the frame-source thread until `running` clears
fn acquire<I: ImageBuffer>(
    mut device: Box<dyn CaptureDevice<I>>,
    running: &AtomicBool,
    subscribers: &Subscribers<I>,
    stats: &SourceStats,
    config: &SourceConfig,
) {
    let retry = Duration::from_millis(config.retry_interval_ms);
    let pacing = (config.frame_interval_ms > 0).then(|| Duration::from_millis(config.frame_interval_ms));
    let mut sequence = 0_u64;
    let mut last_position: Option<f64> = None;

    debug!("Acquisition loop started");

    while running.load(Ordering::Acquire) {
        let started = Instant::now();

        let image = match device.grab() {
            Ok(Some(image)) if !image.is_empty() => image,
            Ok(_) => {
                stats.failed_grabs.fetch_add(1, Ordering::Relaxed);
                debug!("Grab returned no image");
                thread::sleep(retry);
                continue;
            }
            Err(e) => {
                stats.failed_grabs.fetch_add(1, Ordering::Relaxed);
                debug!("Grab failed: {e}");
                thread::sleep(retry);
                continue;
            }
        };

        let position = device.position();
        if config.drop_stale_frames && position.is_some() && position == last_position {
            stats.stale.fetch_add(1, Ordering::Relaxed);
            debug!("Dropping stale frame at position {position:?}");
            thread::sleep(retry);
            continue;
        }
        last_position = position;

        let frame = Arc::new(Frame::new(sequence, image, position));
        sequence += 1;
        for subscriber in subscribers.lock().iter() {
            subscriber.post(Arc::clone(&frame));
        }
        stats.delivered.fetch_add(1, Ordering::Relaxed);

        if let Some(interval) = pacing {
            if let Some(remaining) = interval.checked_sub(started.elapsed()) {
                thread::sleep(remaining);
            }
        }
    }

    device.stop();
    // Native capture callbacks may still reference the device for a moment
    thread::sleep(Duration::from_millis(config.stop_grace_ms));
    drop(device);
    info!("Capture device released after {sequence} frames");

    close_all(subscribers);
}

/// End every subscriber's sequence, discarding frames nobody took yet
fn close_all<I: ImageBuffer>(subscribers: &Subscribers<I>) {
    for subscriber in subscribers.lock().drain(..) {
        subscriber.close();
    }
}
