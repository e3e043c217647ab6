//! Pipeline orchestration.
//!
//! The `Pipeline` owns the frame source and spawns one worker thread per
//! consumer (tracking, pattern sampling, undistortion). Each worker wakes on
//! its own tick and takes the newest frame from its mailbox, so a slow cycle
//! delays only that consumer. User commands run on a separate long-lived
//! control thread; results come back as [`PipelineEvent`]s.

use crate::calibration::{CalibrationResult, Calibrator, CurrentCalibration, SampleOutcome};
use crate::capture::CaptureBackend;
use crate::config::Config;
use crate::frame::Frame;
use crate::frame_source::{FrameReceiver, FrameSource};
use crate::tracking::{TrackManager, TrackReport};
use crate::undistort::{UndistortedFrame, UndistortionStage};
use crate::vision::Vision;
use crate::{Error, Result};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use crossbeam::select;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// State changes reported to the presentation side
#[derive(Debug, Clone)]
pub enum PipelineEvent<I> {
    /// Acquisition and workers are running
    Started,
    /// Acquisition stopped and the device was released
    Stopped,
    /// Track Manager cycle finished
    Tracks(TrackReport),
    /// One pattern search attempt finished
    PatternSampled {
        /// Frame searched
        sequence: u64,
        /// What happened to the detection
        outcome: SampleOutcome,
        /// Percentage of expected corners found
        quality: u8,
        /// Samples in the window
        count: usize,
        /// Samples required
        target: usize,
        /// Time spent in pattern detection
        elapsed: Duration,
    },
    /// The sample window reached its target
    PatternsComplete {
        /// Samples collected
        count: usize,
    },
    /// A new calibration became current
    CalibrationUpdated(Arc<CalibrationResult>),
    /// Corrected image from the undistortion stage
    Undistorted(UndistortedFrame<I>),
    /// User-visible message (failed command, solver without solution)
    Notice(String),
}

/// Snapshot of the pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PipelineStatus {
    /// Acquisition is running
    pub running: bool,
    /// Pattern search in progress
    pub searching: bool,
    /// Samples in the window
    pub sample_count: usize,
    /// Samples required for intrinsic estimation
    pub target_samples: usize,
    /// Window is full
    pub patterns_available: bool,
    /// A calibration is current
    pub calibration_available: bool,
    /// The current calibration carries a pose
    pub extrinsic_available: bool,
    /// Reprojection error of the current calibration
    pub reprojection_error: Option<f64>,
    /// Quality of the most recent pattern detection
    pub pattern_quality: Option<u8>,
    /// Live tracks after the most recent tracking cycle
    pub live_tracks: usize,
}

#[derive(Debug)]
enum Command {
    FindPatterns,
    CalibrateIntrinsic,
    CalibrateExtrinsic,
    Save(PathBuf),
    Open(PathBuf),
}

/// Non-blocking event publisher; events are dropped when nobody keeps up
struct EventSink<I> {
    tx: Sender<PipelineEvent<I>>,
}

impl<I> Clone for EventSink<I> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<I> EventSink<I> {
    fn emit(&self, event: PipelineEvent<I>) {
        match self.tx.try_send(event) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => debug!("Event channel full, dropping event"),
        }
    }

    fn notice(&self, message: String) {
        info!("{message}");
        self.emit(PipelineEvent::Notice(message));
    }
}

/// Frame source, consumers and control worker wired together
pub struct Pipeline<V: Vision> {
    vision: Arc<V>,
    config: Config,
    source: FrameSource<V::Image>,
    calibrator: Arc<Calibrator<V>>,
    events: EventSink<V::Image>,
    event_rx: Receiver<PipelineEvent<V::Image>>,
    commands: Option<Sender<Command>>,
    control: Option<JoinHandle<()>>,
    shutdown: Option<Sender<()>>,
    workers: Vec<JoinHandle<()>>,
    live_tracks: Arc<AtomicUsize>,
}

impl<V: Vision> Pipeline<V> {
    /// Build a stopped pipeline and start its control worker
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the control
    /// thread cannot be spawned
    pub fn new(vision: Arc<V>, backend: Arc<dyn CaptureBackend<V::Image>>, config: Config) -> Result<Self> {
        config.validate()?;

        let current = Arc::new(CurrentCalibration::new());
        let calibrator = Arc::new(Calibrator::new(
            Arc::clone(&vision),
            config.pattern,
            &config.calibration,
            current,
        ));
        let (event_tx, event_rx) = channel::bounded(config.events.capacity);
        let events = EventSink { tx: event_tx };

        let (command_tx, command_rx) = channel::unbounded();
        let control = {
            let calibrator = Arc::clone(&calibrator);
            let events = events.clone();
            thread::Builder::new()
                .name("pipeline-control".to_string())
                .spawn(move || {
                    for command in command_rx {
                        execute(&calibrator, &events, command);
                    }
                    debug!("Control worker exiting");
                })?
        };

        let source = FrameSource::new(backend, config.source.clone());

        Ok(Self {
            vision,
            config,
            source,
            calibrator,
            events,
            event_rx,
            commands: Some(command_tx),
            control: Some(control),
            shutdown: None,
            workers: Vec::new(),
            live_tracks: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Receiver for pipeline events; clones share one queue
    pub fn events(&self) -> Receiver<PipelineEvent<V::Image>> {
        self.event_rx.clone()
    }

    /// Calibration state shared with the workers
    pub fn calibrator(&self) -> &Arc<Calibrator<V>> {
        &self.calibrator
    }

    /// The calibration consumers currently use
    pub fn current_calibration(&self) -> Option<Arc<CalibrationResult>> {
        self.calibrator.current().load()
    }

    /// True while acquisition is running
    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }

    /// Current pipeline state
    pub fn status(&self) -> PipelineStatus {
        let current = self.current_calibration();
        PipelineStatus {
            running: self.is_running(),
            searching: self.calibrator.is_searching(),
            sample_count: self.calibrator.sample_count(),
            target_samples: self.calibrator.target_samples(),
            patterns_available: self.calibrator.patterns_available(),
            calibration_available: current.is_some(),
            extrinsic_available: current.as_ref().is_some_and(|c| c.has_extrinsics()),
            reprojection_error: current.as_ref().map(|c| c.reprojection_error()),
            pattern_quality: self.calibrator.pattern_quality(),
            live_tracks: self.live_tracks.load(Ordering::Relaxed),
        }
    }

    /// Open the capture device and start every enabled consumer
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be opened or a worker cannot be
    /// spawned; nothing is left running in that case.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            warn!("Pipeline already running");
            return Ok(());
        }

        let tracking_frames = self.config.tracking.enabled.then(|| self.source.subscribe());
        let pattern_frames = self.source.subscribe();
        let undistort_frames = self.config.undistortion.enabled.then(|| self.source.subscribe());

        if let Err(e) = self.source.start() {
            self.source.stop();
            return Err(e);
        }

        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        self.shutdown = Some(shutdown_tx);

        if let Err(e) = self.spawn_workers(tracking_frames, pattern_frames, undistort_frames, &shutdown_rx) {
            error!("Failed to start workers: {e}");
            self.stop();
            return Err(e);
        }

        info!("Pipeline started on {}", self.source.source());
        self.events.emit(PipelineEvent::Started);
        Ok(())
    }

    fn spawn_workers(
        &mut self,
        tracking_frames: Option<FrameReceiver<V::Image>>,
        pattern_frames: FrameReceiver<V::Image>,
        undistort_frames: Option<FrameReceiver<V::Image>>,
        shutdown: &Receiver<()>,
    ) -> Result<()> {
        if let Some(frames) = tracking_frames {
            let vision = Arc::clone(&self.vision);
            let events = self.events.clone();
            let live_tracks = Arc::clone(&self.live_tracks);
            let interval = self.config.tracking.interval();
            let scale = self.config.tracking.processing_scale;
            let shutdown = shutdown.clone();
            self.workers.push(
                thread::Builder::new()
                    .name("tracking".to_string())
                    .spawn(move || {
                        let mut manager = match TrackManager::new(vision, scale) {
                            Ok(manager) => manager,
                            Err(e) => {
                                error!("Tracking worker not started: {e}");
                                return;
                            }
                        };
                        run_consumer(&frames, interval, &shutdown, |frame| match manager.update(frame) {
                            Ok(report) => {
                                live_tracks.store(report.tracks.len(), Ordering::Relaxed);
                                events.emit(PipelineEvent::Tracks(report));
                            }
                            Err(e) => warn!("Tracking cycle failed on frame {}: {e}", frame.sequence),
                        });
                        manager.clear();
                        live_tracks.store(0, Ordering::Relaxed);
                    })?,
            );
        }

        {
            let calibrator = Arc::clone(&self.calibrator);
            let events = self.events.clone();
            let interval = self.config.calibration.search_interval();
            let shutdown = shutdown.clone();
            self.workers.push(
                thread::Builder::new()
                    .name("pattern-sampling".to_string())
                    .spawn(move || {
                        run_consumer(&pattern_frames, interval, &shutdown, |frame| {
                            sample_pattern(&calibrator, &events, frame);
                        });
                    })?,
            );
        }

        if let Some(frames) = undistort_frames {
            let stage = UndistortionStage::new(Arc::clone(&self.vision), Arc::clone(self.calibrator.current()));
            let events = self.events.clone();
            let interval = self.config.undistortion.interval();
            let shutdown = shutdown.clone();
            self.workers.push(
                thread::Builder::new()
                    .name("undistortion".to_string())
                    .spawn(move || {
                        run_consumer(&frames, interval, &shutdown, |frame| match stage.process(frame) {
                            Ok(Some(corrected)) => events.emit(PipelineEvent::Undistorted(corrected)),
                            Ok(None) => {}
                            Err(e) => warn!("Undistortion failed on frame {}: {e}", frame.sequence),
                        });
                    })?,
            );
        }

        Ok(())
    }

    /// Stop acquisition and every consumer
    ///
    /// Blocks until the capture device is released and all workers have
    /// exited; tracker handles are released by the tracking worker.
    pub fn stop(&mut self) {
        if !self.is_running() && self.workers.is_empty() {
            return;
        }

        self.source.stop();
        self.shutdown = None;
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Pipeline worker panicked");
            }
        }

        info!("Pipeline stopped");
        self.events.emit(PipelineEvent::Stopped);
    }

    /// Clear the sample window and start collecting pattern samples
    ///
    /// # Errors
    ///
    /// Returns an error if the control worker is gone
    pub fn find_patterns(&self) -> Result<()> {
        self.send(Command::FindPatterns)
    }

    /// Request intrinsic estimation from the collected samples
    ///
    /// # Errors
    ///
    /// Returns an error if the control worker is gone
    pub fn calibrate_intrinsic(&self) -> Result<()> {
        self.send(Command::CalibrateIntrinsic)
    }

    /// Request extrinsic estimation against the current intrinsics
    ///
    /// # Errors
    ///
    /// Returns an error if the control worker is gone
    pub fn calibrate_extrinsic(&self) -> Result<()> {
        self.send(Command::CalibrateExtrinsic)
    }

    /// Request the current calibration be written to `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the control worker is gone
    pub fn save_calibration<P: Into<PathBuf>>(&self, path: P) -> Result<()> {
        self.send(Command::Save(path.into()))
    }

    /// Request a calibration file be loaded and installed
    ///
    /// # Errors
    ///
    /// Returns an error if the control worker is gone
    pub fn open_calibration<P: Into<PathBuf>>(&self, path: P) -> Result<()> {
        self.send(Command::Open(path.into()))
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .as_ref()
            .ok_or_else(|| Error::Pipeline("Control worker not running".to_string()))?
            .send(command)
            .map_err(|e| Error::Pipeline(format!("Control worker gone: {:?}", e.into_inner())))
    }
}

impl<V: Vision> Drop for Pipeline<V> {
    fn drop(&mut self) {
        self.stop();
        self.commands = None;
        if let Some(control) = self.control.take() {
            if control.join().is_err() {
                error!("Control worker panicked");
            }
        }
    }
}

/// Consumer loop: wait for a tick, then process the newest frame
///
/// Exits when the shutdown sender is dropped or the frame sequence ends.
fn run_consumer<I, F>(frames: &FrameReceiver<I>, interval: Duration, shutdown: &Receiver<()>, mut cycle: F)
where
    F: FnMut(&Arc<Frame<I>>),
{
    let ticker = channel::tick(interval);
    let name = thread::current().name().unwrap_or("consumer").to_string();
    debug!("{name} worker started, interval {interval:?}");

    loop {
        select! {
            recv(ticker) -> _ => {}
            recv(shutdown) -> _ => break,
        }
        match frames.recv() {
            Some(frame) => cycle(&frame),
            None => break,
        }
    }

    debug!("{name} worker exiting");
}

fn sample_pattern<V: Vision>(calibrator: &Calibrator<V>, events: &EventSink<V::Image>, frame: &Frame<V::Image>) {
    let report = match calibrator.sample_frame(frame) {
        Ok(Some(report)) => report,
        Ok(None) => return,
        Err(e) => {
            warn!("Pattern detection failed on frame {}: {e}", frame.sequence);
            return;
        }
    };

    events.emit(PipelineEvent::PatternSampled {
        sequence: report.sequence,
        outcome: report.outcome,
        quality: report.quality,
        count: report.count,
        target: calibrator.target_samples(),
        elapsed: report.elapsed,
    });

    if let SampleOutcome::Completed { count } = report.outcome {
        events.emit(PipelineEvent::PatternsComplete { count });
    }
    match report.calibration {
        Some(Ok(result)) => events.emit(PipelineEvent::CalibrationUpdated(result)),
        Some(Err(e)) => events.notice(format!("Intrinsic calibration failed: {e}")),
        None => {}
    }
}

fn execute<V: Vision>(calibrator: &Calibrator<V>, events: &EventSink<V::Image>, command: Command) {
    debug!("Executing {command:?}");
    match command {
        Command::FindPatterns => {
            calibrator.begin_search();
            events.notice("Searching for calibration pattern".to_string());
        }
        Command::CalibrateIntrinsic => match calibrator.calibrate_intrinsic() {
            Ok(result) => {
                info!("Intrinsic calibration installed, error {:.4}", result.reprojection_error());
                events.emit(PipelineEvent::CalibrationUpdated(result));
            }
            Err(e) => events.notice(format!("Intrinsic calibration failed: {e}")),
        },
        Command::CalibrateExtrinsic => match calibrator.calibrate_extrinsic() {
            Ok(Some(result)) => events.emit(PipelineEvent::CalibrationUpdated(result)),
            Ok(None) => events.notice("Extrinsic calibration found no solution".to_string()),
            Err(e) => events.notice(format!("Extrinsic calibration failed: {e}")),
        },
        Command::Save(path) => match calibrator.save(&path) {
            Ok(()) => events.notice(format!("Calibration saved to {}", path.display())),
            Err(e) => events.notice(format!("Failed to save {}: {e}", path.display())),
        },
        Command::Open(path) => match calibrator.open(&path) {
            Ok(result) => events.emit(PipelineEvent::CalibrationUpdated(result)),
            Err(e) => events.notice(format!("Failed to open {}: {e}", path.display())),
        },
    }
}
