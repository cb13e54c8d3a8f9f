use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::time::SystemTime;

use vbtracker_standalone::classify::DeviceClass;
use vbtracker_standalone::ingest::{DeviceSpec, FrameSource};
use vbtracker_standalone::sink::TextSink;
use vbtracker_standalone::track::{
    EngineReport, SensorRegistration, SlotIdentifierFactory, TrackingEngine,
};
use vbtracker_standalone::{
    open_device, Dimensions, Frame, GeometryTable, Pose, SensorPose, Session, SessionOptions,
    SessionState, Step, StubEngine, TerminationReason,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Capture {
    Miss,
    Frame,
    Fail,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Call {
    Grab,
    Retrieve,
}

/// Frame source that follows a fixed script of grab outcomes.
struct ScriptedSource {
    opened: bool,
    dims: Dimensions,
    script: VecDeque<Capture>,
    current: Option<Capture>,
    calls: Vec<Call>,
}

impl ScriptedSource {
    fn new(dims: Dimensions, script: &[Capture]) -> Self {
        Self {
            opened: true,
            dims,
            script: script.iter().copied().collect(),
            current: None,
            calls: Vec::new(),
        }
    }

    fn closed() -> Self {
        Self {
            opened: false,
            ..Self::new(Dimensions::new(640, 480), &[])
        }
    }
}

impl FrameSource for ScriptedSource {
    fn is_opened(&self) -> bool {
        self.opened
    }

    fn last_error(&self) -> Option<&str> {
        (!self.opened).then_some("scripted device closed")
    }

    fn dimensions(&self) -> Dimensions {
        self.dims
    }

    fn describe(&self) -> String {
        "Format RGB3, Mode scripted".to_string()
    }

    fn grab(&mut self) -> bool {
        self.calls.push(Call::Grab);
        self.current = Some(self.script.pop_front().unwrap_or(Capture::Frame));
        self.current != Some(Capture::Miss)
    }

    fn retrieve(&mut self, _channel: u32, frame: &mut Frame) -> Result<()> {
        self.calls.push(Call::Retrieve);
        match self.current.take() {
            Some(Capture::Frame) => {
                frame
                    .reshape(self.dims, vbtracker_standalone::PixelLayout::Rgb8)?
                    .fill(40);
                Ok(())
            }
            _ => Err(anyhow!("scripted retrieve failure")),
        }
    }
}

/// Engine that reports the same sensors every frame, in the given order.
struct ScriptedEngine {
    sensors: Vec<usize>,
    done_after: Option<usize>,
    calls: usize,
}

impl ScriptedEngine {
    fn reporting(sensors: &[usize]) -> Self {
        Self {
            sensors: sensors.to_vec(),
            done_after: None,
            calls: 0,
        }
    }
}

impl TrackingEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn process(
        &mut self,
        sensors: &[SensorRegistration],
        color: &Frame,
        gray: &Frame,
        _timestamp: SystemTime,
    ) -> Result<EngineReport> {
        assert_eq!(sensors.len(), 2);
        assert_eq!(color.dimensions(), gray.dimensions());
        assert_eq!(gray.channels(), 1);
        self.calls += 1;
        Ok(EngineReport {
            poses: self
                .sensors
                .iter()
                .map(|&sensor| SensorPose::new(sensor, Pose::identity()))
                .collect(),
            done: self.done_after.is_some_and(|limit| self.calls >= limit),
        })
    }
}

fn start(
    source: ScriptedSource,
    engine: ScriptedEngine,
) -> Session<ScriptedSource, ScriptedEngine> {
    Session::start(
        source,
        engine,
        &GeometryTable::reference(),
        &SlotIdentifierFactory,
        SessionOptions::default(),
    )
}

#[test]
fn oculus_camera_never_reaches_the_engine() {
    let source = ScriptedSource::new(Dimensions::new(376, 480), &[Capture::Frame]);
    let mut session = start(source, ScriptedEngine::reporting(&[0, 1]));
    let mut sink: Vec<SensorPose> = Vec::new();

    for _ in 0..3 {
        assert_eq!(
            session.update(&mut sink),
            Step::Terminated(TerminationReason::UnsupportedDevice(DeviceClass::OculusDk2))
        );
    }
    assert!(sink.is_empty());
    assert!(session.source().calls.is_empty());
    assert_eq!(session.adapter().engine().calls, 0);
    assert_eq!(session.adapter().sensor_count(), 0);
}

#[test]
fn near_miss_dimensions_are_accepted() {
    for dims in [Dimensions::new(376, 481), Dimensions::new(480, 376), Dimensions::new(640, 480)] {
        let session = start(
            ScriptedSource::new(dims, &[]),
            ScriptedEngine::reporting(&[]),
        );
        assert_eq!(session.state(), &SessionState::Ready, "{}", dims);
    }
}

#[test]
fn unopened_device_and_zero_dimensions_are_invalid() {
    let session = start(ScriptedSource::closed(), ScriptedEngine::reporting(&[]));
    match session.state() {
        SessionState::Terminated(TerminationReason::DeviceNotOpened(cause)) => {
            assert_eq!(cause, "scripted device closed");
        }
        other => panic!("unexpected state {:?}", other),
    }

    let mut session = start(
        ScriptedSource::new(Dimensions::new(0, 0), &[]),
        ScriptedEngine::reporting(&[]),
    );
    let step = session.update(&mut Vec::<SensorPose>::new());
    assert_eq!(
        step,
        Step::Terminated(TerminationReason::UnusableDimensions(Dimensions::new(0, 0)))
    );
    assert!(session.source().calls.is_empty());
}

#[test]
fn grab_misses_only_grab() {
    let script = [Capture::Miss; 10];
    let mut session = start(
        ScriptedSource::new(Dimensions::new(64, 48), &script),
        ScriptedEngine::reporting(&[0]),
    );
    let mut sink: Vec<SensorPose> = Vec::new();

    for _ in 0..10 {
        assert_eq!(session.update(&mut sink), Step::Waiting);
        assert!(session.is_valid());
        assert_eq!(session.state(), &SessionState::Capturing);
    }
    assert_eq!(session.source().calls, vec![Call::Grab; 10]);
    assert_eq!(session.adapter().engine().calls, 0);
    assert_eq!(session.grab_misses(), 10);
    assert!(sink.is_empty());
}

#[test]
fn sensors_are_reported_in_ascending_order() {
    let mut session = start(
        ScriptedSource::new(Dimensions::new(64, 48), &[]),
        ScriptedEngine::reporting(&[1, 0]),
    );
    let mut sink: Vec<SensorPose> = Vec::new();
    for _ in 0..3 {
        assert_eq!(session.update(&mut sink), Step::Processed { poses: 2 });
    }
    for frame in sink.chunks(2) {
        assert_eq!(frame[0].sensor, 0);
        assert_eq!(frame[1].sensor, 1);
    }
}

#[test]
fn miss_then_single_sensor_prints_one_line_and_continues() -> Result<()> {
    let mut session = start(
        ScriptedSource::new(Dimensions::new(640, 480), &[Capture::Miss, Capture::Frame]),
        ScriptedEngine::reporting(&[0]),
    );
    let mut sink = TextSink::new(Vec::new());

    assert_eq!(session.update(&mut sink), Step::Waiting);
    assert_eq!(session.update(&mut sink), Step::Processed { poses: 1 });
    assert!(session.is_valid());
    assert_eq!(session.state(), &SessionState::Capturing);

    let text = String::from_utf8(sink.into_inner())?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec![concat!(
            "Sensor 0: Translation (0.0000, 0.0000, 0.0000) ",
            "rotation (1.0000, 0.0000, 0.0000, 0.0000)"
        )]
    );
    Ok(())
}

#[test]
fn retrieve_failure_on_fifth_iteration_ends_the_run() -> Result<()> {
    let script = [
        Capture::Frame,
        Capture::Frame,
        Capture::Frame,
        Capture::Frame,
        Capture::Fail,
    ];
    let mut session = start(
        ScriptedSource::new(Dimensions::new(640, 480), &script),
        ScriptedEngine::reporting(&[0, 1]),
    );
    let mut sink = TextSink::new(Vec::new());

    let summary = session.run(&mut sink);
    assert!(matches!(summary.reason, TerminationReason::RetrieveFailed(_)));
    assert_eq!(summary.reason.exit_code(), 2);
    assert_eq!(summary.iterations, 5);
    assert_eq!(summary.frames_processed, 4);
    assert_eq!(summary.poses_reported, 8);

    let calls_at_failure = session.source().calls.len();
    assert!(matches!(
        session.update(&mut sink),
        Step::Terminated(TerminationReason::RetrieveFailed(_))
    ));
    assert_eq!(session.source().calls.len(), calls_at_failure);
    assert_eq!(session.adapter().engine().calls, 4);

    let text = String::from_utf8(sink.into_inner())?;
    assert_eq!(text.lines().count(), 8);
    Ok(())
}

#[test]
fn tracker_done_stops_with_success() -> Result<()> {
    let mut engine = ScriptedEngine::reporting(&[0]);
    engine.done_after = Some(2);
    let mut session = start(ScriptedSource::new(Dimensions::new(64, 48), &[]), engine);
    let mut sink: Vec<SensorPose> = Vec::new();

    let summary = session.run(&mut sink);
    assert_eq!(summary.reason, TerminationReason::TrackerDone);
    assert_eq!(summary.reason.exit_code(), 0);
    assert_eq!(summary.frames_processed, 2);
    // The frame that carried the done signal is still reported.
    assert_eq!(sink.len(), 2);
    Ok(())
}

#[test]
fn synthetic_device_runs_end_to_end() -> Result<()> {
    let spec: DeviceSpec = "stub://320x240?format=yuyv&miss_every=3".parse()?;
    let options = SessionOptions {
        max_frames: Some(5),
        ..SessionOptions::default()
    };
    let mut session = Session::start(
        open_device(&spec),
        StubEngine::new(),
        &GeometryTable::reference(),
        &SlotIdentifierFactory,
        options,
    );
    let mut sink = TextSink::new(Vec::new());

    let summary = session.run(&mut sink);
    assert_eq!(summary.reason, TerminationReason::FrameLimitReached(5));
    assert_eq!(summary.frames_processed, 5);
    assert!(summary.grab_misses >= 2);
    assert_eq!(summary.poses_reported, 10);

    let text = String::from_utf8(sink.into_inner())?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 10);
    assert!(lines[0].starts_with("Sensor 0: Translation ("));
    assert!(lines[1].starts_with("Sensor 1: Translation ("));
    Ok(())
}
