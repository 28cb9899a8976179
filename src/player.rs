//! Playback: pulls frames from a source, feeds the tracker, and turns user
//! commands into state changes between frames.

use crate::draw::{draw_text_5x7, fill_circle};
use crate::error::Error;
use crate::features::FeatureDetector;
use crate::flow::FlowEstimator;
use crate::source::{FrameSource, SourceInfo};
use crate::track::TrackState;
use crate::types::{Command, FrameBuffer, Mode, PlaybackState};
use crate::vision::to_gray;
use log::{debug, warn};
use std::ops::ControlFlow;
use std::time::Duration;

/// Radius of the disc drawn on every tracked point.
pub const MARKER_RADIUS: i32 = 3;
pub const MARKER_COLOR: u32 = 0x00_00_FF_00;
const HUD_COLOR: u32 = 0x00_FF_FF_FF;

/// Where the displayed frame sits in a finite source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Scrub {
    pub position: usize,
    pub count: usize,
}

/// The display side of the player.
pub trait Ui {
    fn present(&mut self, screen: &FrameBuffer, scrub: Option<Scrub>) -> Result<(), Error>;

    /// Block for the next command. `None` as timeout waits until one arrives;
    /// `Ok(None)` means the timeout passed without input.
    fn wait_command(&mut self, timeout: Option<Duration>) -> Result<Option<Command>, Error>;
}

pub struct Player<S, D, F> {
    source: S,
    info: SourceInfo,
    tracker: TrackState<D, F>,
    state: PlaybackState,
    night: bool,
    pending: Mode,
    screen: FrameBuffer,
}

impl<S: FrameSource, D: FeatureDetector, F: FlowEstimator> Player<S, D, F> {
    /// Files start paused on their first frame; live sources start running.
    pub fn new(source: S, tracker: TrackState<D, F>) -> Self {
        let info = source.info();
        let state = if info.is_live() { PlaybackState::Running } else { PlaybackState::Stepping };
        let screen = FrameBuffer::black(info.width, info.height);
        Self { source, info, tracker, state, night: false, pending: Mode::None, screen }
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_night(&self) -> bool {
        self.night
    }

    pub fn pending(&self) -> Mode {
        self.pending
    }

    /// The last rendered frame.
    pub fn screen(&self) -> &FrameBuffer {
        &self.screen
    }

    pub fn tracker(&self) -> &TrackState<D, F> {
        &self.tracker
    }

    /// Read and render the next frame. Returns whether a new frame was shown.
    ///
    /// The end of a file, or a frame that will not decode, switches to
    /// stepping and keeps the last frame on screen. A failed camera grab is
    /// logged and retried on the next tick.
    pub fn tick(&mut self) -> Result<bool, Error> {
        match self.source.read() {
            Ok(Some(frame)) => {
                self.show(frame);
                Ok(true)
            }
            Ok(None) => {
                if self.state == PlaybackState::Running {
                    debug!("end of video at frame {}, stepping", self.source.position());
                }
                self.state = PlaybackState::Stepping;
                Ok(false)
            }
            Err(e) if self.info.is_live() => {
                warn!("dropped camera frame: {e}");
                Ok(false)
            }
            Err(e) => {
                warn!("unreadable frame {}: {e}", self.source.position());
                self.state = PlaybackState::Stepping;
                Ok(false)
            }
        }
    }

    fn show(&mut self, mut frame: FrameBuffer) {
        let gray = to_gray(&frame);
        let mode = std::mem::take(&mut self.pending);
        let points = self.tracker.advance_frame(gray, mode);

        if self.night {
            frame.pixels.fill(0);
        }
        for p in points {
            fill_circle(&mut frame, p.x.round() as i32, p.y.round() as i32, MARKER_RADIUS, MARKER_COLOR);
        }
        let tracked = points.len();

        let hud = self.hud_text(tracked);
        draw_text_5x7(&mut frame, 8, 8, &hud, HUD_COLOR);
        self.screen = frame;
    }

    fn hud_text(&self, tracked: usize) -> String {
        let state = match self.state {
            PlaybackState::Running => "RUN",
            PlaybackState::Stepping => "STEP",
        };
        let place = if self.info.is_live() {
            "LIVE".to_string()
        } else {
            format!("{}/{}", self.source.position(), self.info.frame_count)
        };
        let night = if self.night { " | NIGHT" } else { "" };
        format!("{state} | PTS: {tracked} | {place}{night}")
    }

    /// Scrub bar state for finite sources.
    pub fn scrub(&self) -> Option<Scrub> {
        (!self.info.is_live()).then(|| Scrub {
            position: self.source.position().saturating_sub(1),
            count: self.info.frame_count,
        })
    }

    /// How long to wait for input before the next frame; forever when stepping.
    pub fn wait_timeout(&self) -> Option<Duration> {
        match self.state {
            PlaybackState::Running => Some(self.info.frame_delay()),
            PlaybackState::Stepping => None,
        }
    }

    /// Apply one command. Tracking requests replace whatever was pending.
    pub fn dispatch(&mut self, cmd: Command) -> ControlFlow<()> {
        match cmd {
            Command::Quit => return ControlFlow::Break(()),
            Command::Redetect => self.pending = Mode::Redetect,
            Command::Clear => self.pending = Mode::Clear,
            Command::AddPoint(p) => self.pending = Mode::AddPoint(p),
            Command::ToggleNight => self.night = !self.night,
            Command::Run => self.state = PlaybackState::Running,
            Command::Step => self.state = PlaybackState::Stepping,
            Command::Seek(position) => {
                self.source.set_position(position);
                self.state = PlaybackState::Stepping;
            }
        }
        debug!("{cmd:?}: {:?}, pending {:?}", self.state, self.pending);
        ControlFlow::Continue(())
    }

    /// Frame, present, wait, dispatch until the user quits.
    pub fn run<U: Ui>(&mut self, ui: &mut U) -> Result<(), Error> {
        loop {
            self.tick()?;
            ui.present(&self.screen, self.scrub())?;
            if let Some(cmd) = ui.wait_command(self.wait_timeout())? {
                if self.dispatch(cmd).is_break() {
                    return Ok(());
                }
            }
        }
    }
}
