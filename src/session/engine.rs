//! Session engine
//!
//! Owns the capture device for the lifetime of a session, drives the sample
//! timer, and routes every detection result through the alert decisions in
//! [`crate::monitor`]. One `select!` loop multiplexes operator commands, the
//! sample timer and the single outstanding sample.
//!
//! At most one sample is in flight: a tick that fires while the previous
//! sample is still outstanding is skipped. A sample grabs and encodes on the
//! blocking pool and then calls the detection service, so the loop keeps
//! answering commands while either runs. Pausing, hiding or stopping drops
//! the timer and the in-flight sample immediately; its result is lost.

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::capture::{self, CaptureError, DeviceOpener, SharedDevice};
use crate::config::Config;
use crate::detection::{DetectionError, DetectionService, FrameSignal};
use crate::monitor::{
    evaluate_frame, status_texts, ActivityEntry, ActivityLog, AlertEvent, EyeTrackingState,
    Severity, Thresholds,
};
use crate::report::{ReportForwarder, SessionSummary, SessionTally};
use crate::ui::{Counters, Presenter};

use super::{EngineCommand, EngineStatus};

type PendingSample = BoxFuture<'static, Result<FrameSignal, SampleError>>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a session is already active")]
    AlreadyActive,

    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Why a sample produced no signal
#[derive(Debug, thiserror::Error)]
enum SampleError {
    #[error("Frame capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Detection request failed: {0}")]
    Detection(#[from] DetectionError),
}

/// The active proctoring session
struct ActiveSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    device: SharedDevice,
    paused: bool,
    tally: SessionTally,
}

pub struct SessionEngine<D: DetectionService> {
    /// Detection service
    detector: Arc<D>,
    /// Acquires the capture device on start
    open_device: DeviceOpener,
    /// Presentation layer
    presenter: Box<dyn Presenter>,
    /// Best-effort alert and summary delivery
    forwarder: ReportForwarder,
    /// Alert thresholds (cached from config)
    thresholds: Thresholds,
    /// Sample period (cached from config)
    sample_interval: Duration,
    /// JPEG quality for submitted frames
    jpeg_quality: u8,
    /// Command receiver
    cmd_rx: mpsc::Receiver<EngineCommand>,
    /// Status broadcaster
    status_tx: broadcast::Sender<EngineStatus>,
    /// Current session, if any
    session: Option<ActiveSession>,
    /// Whether the host view is hidden
    hidden: bool,
    /// Eye-tracking accumulator
    tracking: EyeTrackingState,
    /// Bounded activity log
    activity: ActivityLog,
    /// Sample timer, present only while sampling
    sample_timer: Option<Interval>,
    /// The outstanding sample
    in_flight: Option<PendingSample>,
}

impl<D: DetectionService> SessionEngine<D> {
    /// Create a new session engine
    pub fn new(
        config: &Config,
        detector: Arc<D>,
        open_device: DeviceOpener,
        presenter: Box<dyn Presenter>,
        cmd_rx: mpsc::Receiver<EngineCommand>,
        status_tx: broadcast::Sender<EngineStatus>,
    ) -> Self {
        Self {
            detector,
            open_device,
            presenter,
            forwarder: ReportForwarder::new(&config.report),
            thresholds: config.thresholds.clone(),
            sample_interval: Duration::from_millis(config.capture.sample_interval_ms.max(1)),
            jpeg_quality: config.capture.jpeg_quality,
            cmd_rx,
            status_tx,
            session: None,
            hidden: false,
            tracking: EyeTrackingState::new(),
            activity: ActivityLog::new(config.thresholds.activity_log_capacity),
            sample_timer: None,
            in_flight: None,
        }
    }

    /// Run the engine main loop
    pub async fn run(&mut self) -> Result<()> {
        info!(
            "Session engine ready (sample interval {:?})",
            self.sample_interval
        );
        self.broadcast_status();

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let keep_running = match cmd {
                        Some(cmd) => self.handle_command(cmd),
                        None => {
                            info!("Command channel closed");
                            self.stop();
                            false
                        }
                    };
                    if !keep_running {
                        break;
                    }
                }

                _ = next_tick(&mut self.sample_timer) => {
                    self.on_tick();
                }

                result = pending_sample(&mut self.in_flight) => {
                    self.in_flight = None;
                    self.apply_sample(result);
                }
            }
        }

        info!("Session engine stopped");
        Ok(())
    }

    /// Apply one command. Returns false once the engine should exit.
    pub fn handle_command(&mut self, cmd: EngineCommand) -> bool {
        match cmd {
            EngineCommand::Start => {
                if let Err(e) = self.start() {
                    error!("Failed to start session: {}", e);
                    self.push_log(Severity::Danger, format!("Could not start monitoring: {}", e));
                    let _ = self.status_tx.send(EngineStatus::Error(e.to_string()));
                }
            }
            EngineCommand::Pause => self.pause(),
            EngineCommand::Resume => self.resume(),
            EngineCommand::Stop => {
                self.stop();
            }
            EngineCommand::SetHidden(hidden) => self.set_hidden(hidden),
            EngineCommand::Status => {
                self.broadcast_status();
                let line = self.status_line();
                self.push_log(Severity::Info, line);
                self.presenter.recent_activity(&self.activity);
            }
            EngineCommand::Shutdown => {
                info!("Shutdown command received");
                self.stop();
                return false;
            }
        }
        true
    }

    /// Acquire the device and begin sampling
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.session.is_some() {
            return Err(SessionError::AlreadyActive);
        }

        let device = (self.open_device)()?;
        info!("Capture device acquired: {}", device.name());

        self.tracking.reset();
        self.spawn_tracking_reset();

        let session = ActiveSession {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            device: Arc::new(Mutex::new(device)),
            paused: false,
            tally: SessionTally::default(),
        };
        info!("Proctoring session {} started", session.id);
        self.session = Some(session);

        if self.hidden {
            debug!("View hidden, sampling deferred until visible");
        } else {
            self.arm_timer();
        }

        self.push_log(Severity::Success, "Monitoring started");
        self.broadcast_status();
        Ok(())
    }

    /// Stop sampling without releasing the device
    pub fn pause(&mut self) {
        let Some(session) = self.session.as_mut() else {
            debug!("Pause ignored, no active session");
            return;
        };
        if session.paused {
            return;
        }

        session.paused = true;
        self.disarm_timer();
        self.push_log(Severity::Info, "Monitoring paused");
        self.broadcast_status();
    }

    /// Resume sampling after a pause
    pub fn resume(&mut self) {
        let Some(session) = self.session.as_mut() else {
            debug!("Resume ignored, no active session");
            return;
        };
        if !session.paused {
            return;
        }

        session.paused = false;
        if !self.hidden {
            self.arm_timer();
        }
        self.push_log(Severity::Info, "Monitoring resumed");
        self.broadcast_status();
    }

    /// Release the device and reset all per-session state
    pub fn stop(&mut self) -> Option<SessionSummary> {
        let session = self.session.take()?;

        self.disarm_timer();
        capture::release_device(session.device);
        self.tracking.reset();
        self.presenter.counters(&Counters::idle());

        let summary = SessionSummary::new(session.id, session.started_at, Utc::now(), &session.tally);
        info!(
            "Session {} stopped after {}s: {} frames, {} failed samples, {} skipped ticks, {} alerts, status {:?}, score {}",
            summary.id,
            summary.duration_secs,
            summary.frames_sampled,
            summary.failed_samples,
            summary.skipped_ticks,
            summary.alerts,
            summary.status,
            summary.score
        );
        self.forwarder.submit_summary(&summary);

        self.push_log(
            Severity::Info,
            format!(
                "Monitoring stopped ({:?}, score {})",
                summary.status, summary.score
            ),
        );
        self.broadcast_status();
        Some(summary)
    }

    /// Host view visibility changed
    pub fn set_hidden(&mut self, hidden: bool) {
        if self.hidden == hidden {
            return;
        }
        self.hidden = hidden;

        let Some(session) = self.session.as_ref() else {
            return;
        };
        if session.paused {
            return;
        }

        if hidden {
            debug!("View hidden, suspending sampling");
            self.disarm_timer();
        } else {
            debug!("View visible, resuming sampling");
            self.arm_timer();
        }
        self.broadcast_status();
    }

    pub fn status(&self) -> EngineStatus {
        match &self.session {
            None => EngineStatus::Idle,
            Some(session) if session.paused => EngineStatus::Paused,
            Some(_) if self.hidden => EngineStatus::Suspended,
            Some(session) => EngineStatus::Sampling {
                frames: session.tally.frames_sampled,
            },
        }
    }

    fn on_tick(&mut self) {
        if self.in_flight.is_some() {
            if let Some(session) = self.session.as_mut() {
                session.tally.skipped_ticks += 1;
            }
            debug!("Previous sample still in flight, skipping tick");
            return;
        }

        self.in_flight = self.sample_future();
    }

    /// Grab, encode and submit one frame; `None` without a session
    fn sample_future(&self) -> Option<PendingSample> {
        let session = self.session.as_ref()?;
        let device = Arc::clone(&session.device);
        let detector = Arc::clone(&self.detector);
        let quality = self.jpeg_quality;

        Some(Box::pin(async move {
            let image = tokio::task::spawn_blocking(move || capture::grab_data_url(&device, quality))
                .await
                .map_err(|e| CaptureError::Frame(e.to_string()))??;
            Ok::<_, SampleError>(detector.process_frame(image).await?)
        }))
    }

    /// Best-effort; the session starts without waiting for it
    fn spawn_tracking_reset(&self) {
        let detector = Arc::clone(&self.detector);
        tokio::spawn(async move {
            if let Err(e) = detector.reset_tracking().await {
                warn!("Failed to reset eye tracking on the detection service: {}", e);
            }
        });
    }

    fn apply_sample(&mut self, result: Result<FrameSignal, SampleError>) {
        let Some(session_id) = self.session.as_ref().map(|session| session.id) else {
            debug!("Discarding sample result, no active session");
            return;
        };

        let signal = match result {
            Ok(signal) => signal,
            Err(e) => {
                warn!("Sample failed: {}", e);
                self.record_failed_sample(e.to_string());
                return;
            }
        };

        let outcome = evaluate_frame(&mut self.tracking, &signal, &self.thresholds, Utc::now());
        let (eye_status, movement_status) = status_texts(&signal, &self.tracking);
        if outcome.calibrated_now {
            info!("Eye tracking calibrated for session {}", session_id);
        }

        if let Some(session) = self.session.as_mut() {
            session.tally.frames_sampled += 1;
            session.tally.last_face_count = signal.face_count;
        }

        self.presenter.counters(&Counters {
            face_count: signal.face_count,
            eye_status,
            movement_status,
        });

        for line in outcome.logs {
            self.push_log(line.severity, line.message);
        }
        for alert in outcome.alerts {
            self.emit_alert(alert);
        }
    }

    fn record_failed_sample(&mut self, message: String) {
        if let Some(session) = self.session.as_mut() {
            session.tally.failed_samples += 1;
        }
        self.push_log(Severity::Danger, message);
    }

    fn push_log(&mut self, severity: Severity, message: impl Into<String>) {
        let message = message.into();
        if let Some(session) = self.session.as_mut() {
            session.tally.record_log(severity);
        }
        self.presenter.log(&message, severity);
        self.activity.push(ActivityEntry {
            time: Utc::now(),
            severity,
            message,
        });
    }

    fn emit_alert(&mut self, alert: AlertEvent) {
        warn!(
            "Alert {} ({}): {}",
            alert.kind,
            alert.level.as_str(),
            alert.message
        );

        if let Some(session) = self.session.as_mut() {
            session.tally.record_alert(alert.kind);
            self.forwarder.forward_alert(session.id, &alert);
        }

        let severity = alert.level.severity();
        self.presenter.log(&alert.message, severity);
        self.presenter.alert(alert.kind, alert.level);
        self.activity.push(ActivityEntry {
            time: alert.timestamp,
            severity,
            message: alert.message,
        });
    }

    fn arm_timer(&mut self) {
        // First sample one full period after arming
        let mut timer =
            tokio::time::interval_at(Instant::now() + self.sample_interval, self.sample_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.sample_timer = Some(timer);
    }

    fn disarm_timer(&mut self) {
        self.sample_timer = None;
        if self.in_flight.take().is_some() {
            debug!("Dropped in-flight sample");
        }
    }

    fn status_line(&self) -> String {
        match &self.session {
            None => "No active session".to_string(),
            Some(session) => format!(
                "Session {}: {:?}, {} frames, {} alerts, {} failed samples",
                session.id,
                self.status(),
                session.tally.frames_sampled,
                session.tally.alerts(),
                session.tally.failed_samples
            ),
        }
    }

    fn broadcast_status(&self) {
        let _ = self.status_tx.send(self.status());
    }
}

/// Resolves on the next tick, or never when no timer is armed
async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Resolves with the in-flight result, or never when nothing is in flight
async fn pending_sample(sample: &mut Option<PendingSample>) -> Result<FrameSignal, SampleError> {
    match sample {
        Some(sample) => sample.await,
        None => std::future::pending().await,
    }
}

/// Create command and status channels for the engine
pub fn create_engine_channels() -> (
    mpsc::Sender<EngineCommand>,
    mpsc::Receiver<EngineCommand>,
    broadcast::Sender<EngineStatus>,
    broadcast::Receiver<EngineStatus>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (status_tx, status_rx) = broadcast::channel(16);
    (cmd_tx, cmd_rx, status_tx, status_rx)
}
