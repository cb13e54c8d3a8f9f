//! Capture-and-dispatch loop.
//!
//! A `Session` owns the frame source, the tracking adapter and the reusable
//! frame buffers. Startup validates the device once; afterwards each call to
//! `update()` runs one grab/retrieve/normalize/dispatch cycle. The first
//! terminal condition sticks: a terminated session never touches the device
//! or the engine again.

use anyhow::{anyhow, Context, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::camera::{CameraParameters, DEFAULT_FOCAL_LENGTH_PX};
use crate::classify::{classify, DeviceClass};
use crate::frame::{Dimensions, Frame};
use crate::geometry::GeometryTable;
use crate::ingest::{ChannelOrder, FrameSource, GrayscaleNormalizer};
use crate::sink::PoseSink;
use crate::track::{IdentifierFactory, TrackingAdapter, TrackingEngine};

/// How a session ended.
#[derive(Clone, Debug, PartialEq)]
pub enum TerminationReason {
    /// The device could not be opened.
    DeviceNotOpened(String),
    /// The device reported a zero frame size.
    UnusableDimensions(Dimensions),
    /// The device was recognized as one the harness refuses to drive.
    UnsupportedDevice(DeviceClass),
    /// Camera parameters or sensor registration failed.
    SensorSetupFailed(String),
    RetrieveFailed(String),
    NormalizeFailed(String),
    /// The engine or the sink returned an error.
    DispatchFailed(String),
    /// The engine asked to stop.
    TrackerDone,
    FrameLimitReached(u64),
    Interrupted,
}

impl TerminationReason {
    /// Process exit status for this outcome.
    ///
    /// 0 for orderly stops, 1 when the session never started, 2 when it failed
    /// while running.
    pub fn exit_code(&self) -> u8 {
        match self {
            TerminationReason::TrackerDone
            | TerminationReason::FrameLimitReached(_)
            | TerminationReason::Interrupted => 0,
            TerminationReason::DeviceNotOpened(_)
            | TerminationReason::UnusableDimensions(_)
            | TerminationReason::UnsupportedDevice(_)
            | TerminationReason::SensorSetupFailed(_) => 1,
            TerminationReason::RetrieveFailed(_)
            | TerminationReason::NormalizeFailed(_)
            | TerminationReason::DispatchFailed(_) => 2,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.exit_code() != 0
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::DeviceNotOpened(cause) => {
                write!(f, "could not open capture device: {}", cause)
            }
            TerminationReason::UnusableDimensions(dims) => {
                write!(f, "could not open capture device: frame size is {}", dims)
            }
            TerminationReason::UnsupportedDevice(class) => write!(
                f,
                "{} camera detected; its color format is misreported and it cannot be used",
                class
            ),
            TerminationReason::SensorSetupFailed(cause) => {
                write!(f, "sensor setup failed: {}", cause)
            }
            TerminationReason::RetrieveFailed(cause) => {
                write!(f, "capture device failed to deliver a frame: {}", cause)
            }
            TerminationReason::NormalizeFailed(cause) => {
                write!(f, "frame normalization failed: {}", cause)
            }
            TerminationReason::DispatchFailed(cause) => write!(f, "dispatch failed: {}", cause),
            TerminationReason::TrackerDone => f.write_str("tracker finished"),
            TerminationReason::FrameLimitReached(limit) => {
                write!(f, "frame limit of {} reached", limit)
            }
            TerminationReason::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// Lifecycle of a session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionState {
    Uninitialized,
    /// Validated and registered, no frame captured yet.
    Ready,
    Capturing,
    Reporting,
    Terminated(TerminationReason),
}

impl SessionState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, SessionState::Terminated(_))
    }
}

/// Result of one `update()` call.
#[derive(Clone, Debug, PartialEq)]
pub enum Step {
    /// The device had no frame ready.
    Waiting,
    /// A frame went through the engine and this many poses were reported.
    Processed { poses: usize },
    Terminated(TerminationReason),
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Channel index passed to `retrieve`.
    pub channel: u32,
    pub channel_order: ChannelOrder,
    pub focal_length_px: f64,
    /// Stop after this many processed frames.
    pub max_frames: Option<u64>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            channel: 0,
            channel_order: ChannelOrder::default(),
            focal_length_px: DEFAULT_FOCAL_LENGTH_PX,
            max_frames: None,
        }
    }
}

/// Counters for a finished run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub iterations: u64,
    pub frames_processed: u64,
    pub grab_misses: u64,
    pub poses_reported: u64,
    pub reason: TerminationReason,
}

pub struct Session<S, E> {
    source: S,
    adapter: TrackingAdapter<E>,
    options: SessionOptions,
    normalizer: GrayscaleNormalizer,
    camera: Option<Arc<CameraParameters>>,
    state: SessionState,
    color: Frame,
    gray: Frame,
    interrupt: Option<Arc<AtomicBool>>,
    iterations: u64,
    frames_processed: u64,
    grab_misses: u64,
    poses_reported: u64,
}

impl<S: FrameSource, E: TrackingEngine> Session<S, E> {
    /// Validate `source` and register one sensor per entry of `geometry`.
    ///
    /// Never fails: a device that cannot be used leaves the session terminated
    /// and the first `update()` reports why.
    pub fn start(
        source: S,
        engine: E,
        geometry: &GeometryTable,
        identifiers: &dyn IdentifierFactory,
        options: SessionOptions,
    ) -> Self {
        let mut session = Self {
            source,
            adapter: TrackingAdapter::new(engine),
            normalizer: GrayscaleNormalizer::new(options.channel_order),
            options,
            camera: None,
            state: SessionState::Uninitialized,
            color: Frame::new(),
            gray: Frame::new(),
            interrupt: None,
            iterations: 0,
            frames_processed: 0,
            grab_misses: 0,
            poses_reported: 0,
        };
        session.state = match session.initialize(geometry, identifiers) {
            Ok(()) => SessionState::Ready,
            Err(reason) => {
                log::error!("{}", reason);
                SessionState::Terminated(reason)
            }
        };
        session
    }

    fn initialize(
        &mut self,
        geometry: &GeometryTable,
        identifiers: &dyn IdentifierFactory,
    ) -> std::result::Result<(), TerminationReason> {
        if !self.source.is_opened() {
            let cause = self
                .source
                .last_error()
                .unwrap_or("device unavailable")
                .to_string();
            return Err(TerminationReason::DeviceNotOpened(cause));
        }
        let dims = self.source.dimensions();
        if dims.is_empty() {
            return Err(TerminationReason::UnusableDimensions(dims));
        }
        match classify(dims) {
            DeviceClass::Standard => {}
            class => return Err(TerminationReason::UnsupportedDevice(class)),
        }
        log::info!("Got image of size {}, {}", dims, self.source.describe());

        self.register_sensors(dims, geometry, identifiers)
            .map_err(|e| TerminationReason::SensorSetupFailed(format!("{:#}", e)))
    }

    fn register_sensors(
        &mut self,
        dims: Dimensions,
        geometry: &GeometryTable,
        identifiers: &dyn IdentifierFactory,
    ) -> Result<()> {
        if geometry.is_empty() {
            return Err(anyhow!("geometry table has no sensors"));
        }
        let camera = Arc::new(CameraParameters::from_dimensions(
            dims,
            self.options.focal_length_px,
        )?);
        for (slot, markers) in geometry.iter().enumerate() {
            let identifier = identifiers
                .create(slot)
                .with_context(|| format!("identifier for sensor slot {}", slot))?;
            self.adapter.register_sensor(
                identifier,
                camera.clone(),
                markers.positions.clone(),
                markers.directions.clone(),
            )?;
        }
        log::info!(
            "registered {} sensors (fx={}, fy={})",
            self.adapter.sensor_count(),
            camera.fx,
            camera.fy
        );
        self.camera = Some(camera);
        Ok(())
    }

    /// Poll `flag` at the top of every iteration and stop once it is set.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_valid(&self) -> bool {
        !self.state.is_terminated()
    }

    pub fn camera(&self) -> Option<&CameraParameters> {
        self.camera.as_deref()
    }

    pub fn adapter(&self) -> &TrackingAdapter<E> {
        &self.adapter
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn grab_misses(&self) -> u64 {
        self.grab_misses
    }

    /// Run one capture cycle.
    pub fn update(&mut self, sink: &mut dyn PoseSink) -> Step {
        if let SessionState::Terminated(reason) = &self.state {
            return Step::Terminated(reason.clone());
        }
        if self
            .interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            return self.terminate(TerminationReason::Interrupted);
        }
        self.iterations += 1;
        self.state = SessionState::Capturing;

        if !self.source.grab() {
            self.grab_misses += 1;
            log::trace!("no frame available ({} misses)", self.grab_misses);
            return Step::Waiting;
        }

        if let Err(e) = self.source.retrieve(self.options.channel, &mut self.color) {
            return self.terminate(TerminationReason::RetrieveFailed(format!("{:#}", e)));
        }
        if let Err(e) = self.normalizer.normalize(&self.color, &mut self.gray) {
            return self.terminate(TerminationReason::NormalizeFailed(format!("{:#}", e)));
        }

        self.state = SessionState::Reporting;
        let timestamp = SystemTime::now();
        let dispatch = match self
            .adapter
            .process_frame(&self.color, &self.gray, timestamp, sink)
        {
            Ok(dispatch) => dispatch,
            Err(e) => return self.terminate(TerminationReason::DispatchFailed(format!("{:#}", e))),
        };
        self.frames_processed += 1;
        self.poses_reported += dispatch.poses_reported as u64;
        log::debug!(
            "frame {}: {} poses reported",
            self.frames_processed,
            dispatch.poses_reported
        );

        if dispatch.done {
            self.terminate(TerminationReason::TrackerDone);
        } else if let Some(limit) = self.options.max_frames {
            if self.frames_processed >= limit {
                self.terminate(TerminationReason::FrameLimitReached(limit));
            }
        }
        if !self.state.is_terminated() {
            self.state = SessionState::Capturing;
        }
        Step::Processed {
            poses: dispatch.poses_reported,
        }
    }

    fn terminate(&mut self, reason: TerminationReason) -> Step {
        if reason.is_failure() {
            log::error!("{}", reason);
        } else {
            log::info!("stopping: {}", reason);
        }
        self.state = SessionState::Terminated(reason.clone());
        Step::Terminated(reason)
    }

    /// Drive `update()` until the session terminates, then flush `sink`.
    ///
    /// A flush failure after an orderly stop becomes `DispatchFailed`; after a
    /// failure the original reason is kept.
    pub fn run(&mut self, sink: &mut dyn PoseSink) -> RunSummary {
        let mut reason = loop {
            match self.update(sink) {
                Step::Terminated(reason) => break reason,
                Step::Waiting => std::thread::yield_now(),
                Step::Processed { .. } => {}
            }
        };
        if let Err(e) = sink.flush() {
            let cause = format!("{:#}", e.context("flush pose sink"));
            if reason.is_failure() {
                log::error!("{}", cause);
            } else {
                reason = TerminationReason::DispatchFailed(cause);
                self.terminate(reason.clone());
            }
        }

        let summary = RunSummary {
            iterations: self.iterations,
            frames_processed: self.frames_processed,
            grab_misses: self.grab_misses,
            poses_reported: self.poses_reported,
            reason,
        };
        log::info!(
            "session ended after {} iterations: {} frames, {} misses, {} poses",
            summary.iterations,
            summary.frames_processed,
            summary.grab_misses,
            summary.poses_reported
        );
        summary
    }
}
