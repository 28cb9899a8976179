//! The tracked point set and its per-frame update.

use crate::features::FeatureDetector;
use crate::flow::FlowEstimator;
use crate::types::{Mode, TrackedPoint};
use image::GrayImage;
use log::debug;

/// Upper bound on the number of tracked points.
pub const MAX_TRACKED_POINTS: usize = 500;

/// Half size of the 31x31 window a clicked point is snapped to a corner in.
pub const CLICK_REFINE_HALF_WIN: u32 = 15;

/// Owns the tracked points and the prior grayscale frame they live in.
pub struct TrackState<D, F> {
    detector: D,
    estimator: F,
    max_points: usize,
    prior_gray: Option<GrayImage>,
    prior_points: Vec<TrackedPoint>,
    points: Vec<TrackedPoint>,
}

impl<D: FeatureDetector, F: FlowEstimator> TrackState<D, F> {
    pub fn new(detector: D, estimator: F, max_points: usize) -> Self {
        Self {
            detector,
            estimator,
            max_points,
            prior_gray: None,
            prior_points: Vec::new(),
            points: Vec::new(),
        }
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    /// Points found in the most recent frame.
    pub fn points(&self) -> &[TrackedPoint] {
        &self.points
    }

    /// Points the next call will flow forward; equal to [`Self::points`]
    /// between calls.
    pub fn prior_points(&self) -> &[TrackedPoint] {
        &self.prior_points
    }

    /// Apply `mode` and move the tracked points into `gray`, returning the
    /// points to draw on this frame.
    ///
    /// On the very first frame the prior frame is taken to be `gray` itself,
    /// so any flow computed then is a zero-motion baseline.
    pub fn advance_frame(&mut self, gray: GrayImage, mode: Mode) -> &[TrackedPoint] {
        let prior_gray = self.prior_gray.take().unwrap_or_else(|| gray.clone());

        match mode {
            Mode::Clear => {
                self.prior_points.clear();
                self.points.clear();
                debug!("cleared all tracking points");
            }
            Mode::Redetect => {
                self.points = self.detector.detect(&gray, self.max_points);
                self.points.truncate(self.max_points);
                debug!("detected {} tracking points", self.points.len());
            }
            Mode::None | Mode::AddPoint(_) => {
                if !self.prior_points.is_empty() {
                    let flow = self.estimator.estimate(&prior_gray, &gray, &self.prior_points);
                    self.points = flow
                        .points
                        .into_iter()
                        .zip(flow.status)
                        .filter_map(|(p, ok)| ok.then_some(p))
                        .collect();
                    debug!("tracked {} of {} points", self.points.len(), self.prior_points.len());
                }
            }
        }

        if let Mode::AddPoint(click) = mode {
            if self.points.len() < self.max_points {
                let p = self.detector.refine(&gray, click, CLICK_REFINE_HALF_WIN);
                debug!("added tracking point ({:.1}, {:.1}) for click ({}, {})", p.x, p.y, click.x, click.y);
                self.points.push(p);
            } else {
                debug!("ignored click at ({}, {}): already tracking {} points", click.x, click.y, self.points.len());
            }
        }

        self.prior_points.clone_from(&self.points);
        self.prior_gray = Some(gray);
        &self.points
    }
}
