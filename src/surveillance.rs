/// Single-threaded, blocking surveillance loop.
///
/// Per iteration:
///   acquire frame (failure → warn, retry forever)
///     → classify
///     → alert state update (→ SMS on fire)
///     → render + detection log
///     → stop check
///
/// The loop thread owns the camera, the window and the alert state.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::alert::{self, AlertDecision, AlertPolicy, AlertState};
use crate::classifier::{FrameClassifier, FrameResult};
use crate::config::SessionConfig;
use crate::detection_log::DetectionLog;
use crate::face::{FaceEncoder, FaceMatcher};
use crate::gallery::load_gallery;
use crate::notify::{DeliveryStatus, Notifier, INTRUDER_ALERT};

/// Camera-like frame producer. Frames are RGB.
pub trait FrameSource {
    fn read_frame(&mut self) -> Result<RgbImage>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Stop,
}

/// Render surface plus the stop signal (e.g. a keypress).
pub trait Display {
    fn present(&mut self, frame: &RgbImage, result: &FrameResult) -> Result<LoopControl>;

    /// How the person at the terminal ends the session.
    fn stop_hint(&self) -> &'static str;
}

impl<D: Display + ?Sized> Display for Box<D> {
    fn present(&mut self, frame: &RgbImage, result: &FrameResult) -> Result<LoopControl> {
        (**self).present(frame, result)
    }

    fn stop_hint(&self) -> &'static str {
        (**self).stop_hint()
    }
}

/// No window; the loop only ends when the process is signalled.
#[derive(Debug, Default)]
pub struct Headless;

impl Display for Headless {
    fn present(&mut self, _frame: &RgbImage, _result: &FrameResult) -> Result<LoopControl> {
        Ok(LoopControl::Continue)
    }

    fn stop_hint(&self) -> &'static str {
        "Stop it with Ctrl+C."
    }
}

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Frames that were classified.
    pub frames: u64,
    /// Failed acquisitions and failed classifications.
    pub dropped_frames: u64,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
}

pub struct Surveillance<S, E, M, D, N, C = SystemClock> {
    source: S,
    classifier: FrameClassifier<E, M>,
    display: D,
    notifier: N,
    clock: C,
    log: DetectionLog,
    policy: AlertPolicy,
    phone: Option<String>,
    retry_delay: Duration,
}

impl<S, E, M, D, N> Surveillance<S, E, M, D, N, SystemClock>
where
    S: FrameSource,
    E: FaceEncoder,
    M: FaceMatcher,
    D: Display,
    N: Notifier,
{
    pub fn new(
        source: S,
        classifier: FrameClassifier<E, M>,
        display: D,
        notifier: N,
        log: DetectionLog,
        config: &SessionConfig,
    ) -> Self {
        Self {
            source,
            classifier,
            display,
            notifier,
            clock: SystemClock,
            log,
            policy: AlertPolicy::new(
                config.unknown_threshold,
                config.alert_cooldown_secs,
                config.alerts_enabled(),
            ),
            phone: config.alert_phone_number.clone(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl<S, E, M, D, N, C> Surveillance<S, E, M, D, N, C>
where
    S: FrameSource,
    E: FaceEncoder,
    M: FaceMatcher,
    D: Display,
    N: Notifier,
    C: Clock,
{
    pub fn with_clock<C2: Clock>(self, clock: C2) -> Surveillance<S, E, M, D, N, C2> {
        Surveillance {
            source: self.source,
            classifier: self.classifier,
            display: self.display,
            notifier: self.notifier,
            clock,
            log: self.log,
            policy: self.policy,
            phone: self.phone,
            retry_delay: self.retry_delay,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    /// Run until the display reports a stop.
    pub fn run(&mut self) -> SessionSummary {
        let mut state = AlertState::default();
        let mut summary = SessionSummary::default();

        info!(
            "Surveillance active: {} residents, threshold {} frames, cooldown {}s, alerts {}",
            self.classifier.gallery().len(),
            self.policy.unknown_threshold,
            self.policy.cooldown.num_seconds(),
            if self.policy.enabled { "on" } else { "off" },
        );

        loop {
            let frame = match self.source.read_frame() {
                Ok(f) => f,
                Err(e) => {
                    warn!("Failed to grab frame from camera: {}. Retrying...", e);
                    summary.dropped_frames += 1;
                    if !self.retry_delay.is_zero() {
                        std::thread::sleep(self.retry_delay);
                    }
                    continue;
                }
            };

            let result = match self.classifier.classify(&frame) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Frame classification failed: {}", e);
                    summary.dropped_frames += 1;
                    continue;
                }
            };
            summary.frames += 1;

            state = self.observe(state, &result, &mut summary);

            for detection in result.iter() {
                if let Err(e) = self.log.record(&detection.label) {
                    warn!("Detection log write failed ({}): {}", self.log.path().display(), e);
                }
            }

            match self.display.present(&frame, &result) {
                Ok(LoopControl::Stop) => break,
                Ok(LoopControl::Continue) => {}
                Err(e) => warn!("Render error: {}", e),
            }
        }

        info!(
            "Surveillance ended after {} frames ({} dropped), {} alerts sent, {} failed",
            summary.frames, summary.dropped_frames, summary.alerts_sent, summary.alerts_failed
        );
        summary
    }

    /// Alert state update for one frame, sending the SMS when it fires.
    fn observe(
        &self,
        state: AlertState,
        result: &FrameResult,
        summary: &mut SessionSummary,
    ) -> AlertState {
        let (next, decision) = alert::update(state, result, self.clock.now(), &self.policy);
        match decision {
            AlertDecision::Fire { streak } => {
                // Fire implies alerting is enabled, so a number is present.
                if let Some(phone) = self.phone.as_deref() {
                    info!("Unknown presence for {} frames, alerting {}", streak, phone);
                    let status = self.notifier.send(phone, INTRUDER_ALERT);
                    match status {
                        DeliveryStatus::Failed => {
                            summary.alerts_failed += 1;
                            warn!("Alert status: {}", status);
                        }
                        DeliveryStatus::Accepted(_) => {
                            summary.alerts_sent += 1;
                            info!("Alert status: {}", status);
                        }
                    }
                }
            }
            AlertDecision::CoolingDown { streak } => {
                debug!("Unknown streak {} (cooldown active)", streak)
            }
            AlertDecision::Disabled { streak } => {
                debug!("Unknown streak {} (alerts disabled)", streak)
            }
            AlertDecision::Building { streak } => debug!("Unknown streak {}", streak),
            AlertDecision::Clear => {}
        }
        next
    }
}

/// Load the gallery, open the camera and run the loop to completion.
///
/// The camera is opened only after the gallery loaded successfully.
pub fn start<S, E, M, D, N, F>(
    config: &SessionConfig,
    mut encoder: E,
    matcher: M,
    open_camera: F,
    display: D,
    notifier: N,
    log: DetectionLog,
) -> Result<SessionSummary>
where
    S: FrameSource,
    E: FaceEncoder,
    M: FaceMatcher,
    D: Display,
    N: Notifier,
    F: FnOnce(u32) -> Result<S>,
{
    info!("Encoding known faces from {}", config.gallery_path.display());
    let gallery = load_gallery(&config.gallery_path, &mut encoder)
        .context("cannot start surveillance without reference faces")?;

    let source = open_camera(config.camera_id)
        .with_context(|| format!("Failed to open camera (ID: {})", config.camera_id))?;

    let classifier = FrameClassifier::new(encoder, matcher, gallery);
    let mut session = Surveillance::new(source, classifier, display, notifier, log, config);
    Ok(session.run())
}
