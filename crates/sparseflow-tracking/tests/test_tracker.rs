use std::{cell::RefCell, rc::Rc};

use sparseflow_image::{Image, ImageError, ImageSize};
use sparseflow_imgproc::pyramid::Pyramid;
use sparseflow_tracking::{
    CornerDetector, DetectorAlgorithm, FlowFlags, OpticalFlowTracker, SparseOpticalFlow,
    TrackerConfig, TrackerError,
};

/// Returns `frames[n]` on the n-th call and nothing once the script runs out.
struct ScriptedCorners {
    frames: Vec<Vec<[f32; 2]>>,
    calls: usize,
}

impl ScriptedCorners {
    fn new(frames: Vec<Vec<[f32; 2]>>) -> Self {
        Self { frames, calls: 0 }
    }

    fn repeat(corners: Vec<[f32; 2]>, times: usize) -> Self {
        Self::new(vec![corners; times])
    }
}

impl CornerDetector for ScriptedCorners {
    fn detect(
        &mut self,
        _image: &Image<u8, 1>,
        _eig: &mut Image<f32, 1>,
        _tmp: &mut Image<f32, 1>,
        max_corners: usize,
        _threshold: f32,
        _min_distance: f32,
    ) -> Result<Vec<[f32; 2]>, ImageError> {
        let corners = self.frames.get(self.calls).cloned().unwrap_or_default();
        self.calls += 1;
        Ok(corners.into_iter().take(max_corners).collect())
    }
}

/// Moves every point by a constant shift and loses the ones starting right of `lose_beyond`.
struct ShiftFlow {
    shift: [f32; 2],
    lose_beyond: f32,
}

impl ShiftFlow {
    fn still() -> Self {
        Self::moving(0.0, 0.0)
    }

    fn moving(dx: f32, dy: f32) -> Self {
        Self {
            shift: [dx, dy],
            lose_beyond: f32::MAX,
        }
    }
}

impl SparseOpticalFlow for ShiftFlow {
    fn track(
        &mut self,
        _prev_image: &Image<u8, 1>,
        _curr_image: &Image<u8, 1>,
        _prev_pyramid: &mut Pyramid,
        _curr_pyramid: &mut Pyramid,
        points: &[[f32; 2]],
        new_points: &mut [[f32; 2]],
        status: &mut [bool],
        _window_radius: usize,
        _pyramid_levels: usize,
        _flags: FlowFlags,
    ) -> Result<(), ImageError> {
        for ((p, q), s) in points.iter().zip(new_points.iter_mut()).zip(status.iter_mut()) {
            *s = p[0] <= self.lose_beyond;
            if *s {
                *q = [p[0] + self.shift[0], p[1] + self.shift[1]];
            }
        }
        Ok(())
    }
}

struct FailingFlow;

impl SparseOpticalFlow for FailingFlow {
    fn track(
        &mut self,
        _prev_image: &Image<u8, 1>,
        _curr_image: &Image<u8, 1>,
        _prev_pyramid: &mut Pyramid,
        _curr_pyramid: &mut Pyramid,
        _points: &[[f32; 2]],
        _new_points: &mut [[f32; 2]],
        _status: &mut [bool],
        _window_radius: usize,
        _pyramid_levels: usize,
        _flags: FlowFlags,
    ) -> Result<(), ImageError> {
        Err(ImageError::InvalidInput("flow diverged".to_string()))
    }
}

/// Records the flags of every call. Points stay in place when `keep` is set, else all are lost.
struct RecordingFlow {
    calls: Rc<RefCell<Vec<bool>>>,
    keep: bool,
}

impl SparseOpticalFlow for RecordingFlow {
    fn track(
        &mut self,
        _prev_image: &Image<u8, 1>,
        _curr_image: &Image<u8, 1>,
        _prev_pyramid: &mut Pyramid,
        _curr_pyramid: &mut Pyramid,
        points: &[[f32; 2]],
        new_points: &mut [[f32; 2]],
        status: &mut [bool],
        _window_radius: usize,
        _pyramid_levels: usize,
        flags: FlowFlags,
    ) -> Result<(), ImageError> {
        self.calls.borrow_mut().push(flags.prev_pyramid_ready);
        new_points.copy_from_slice(points);
        status.fill(self.keep);
        Ok(())
    }
}

fn black(width: usize, height: usize) -> Image<u8, 1> {
    Image::from_size_val([width, height].into(), 0).unwrap()
}

/// Gaussian blobs on a dark background, shifted right by `shift` pixels.
fn blobs(shift: f64) -> Image<u8, 1> {
    const CENTERS: [(f64, f64); 5] = [
        (30.0, 24.0),
        (42.0, 24.0),
        (30.0, 36.0),
        (42.0, 36.0),
        (70.0, 58.0),
    ];
    let (width, height) = (96, 72);
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let value = CENTERS.iter().fold(20.0, |acc, &(cx, cy)| {
                let (dx, dy) = (x as f64 - cx - shift, y as f64 - cy);
                acc + 200.0 * (-(dx * dx + dy * dy) / 32.0).exp()
            });
            data.push(value.round().min(255.0) as u8);
        }
    }
    Image::new([width, height].into(), data).unwrap()
}

#[test]
fn test_stationary_pair_becomes_good() {
    let corners = ScriptedCorners::repeat(vec![[20.0, 20.0], [28.0, 24.0]], 10);
    let mut tracker = OpticalFlowTracker::with_primitives(corners, ShiftFlow::still());
    let frame = black(64, 48);

    for _ in 0..3 {
        tracker.process_frame(&frame).unwrap();
        assert_eq!(tracker.good_vector_count(), 0);
    }

    tracker.process_frame(&frame).unwrap();
    assert_eq!(tracker.feature_count(), 2);
    assert_eq!(tracker.vector_count(), 2);
    assert_eq!(tracker.max_friends(), 0);
    assert_eq!(tracker.good_vector_count(), 2);
    assert!(tracker.is_good_vector(0) && tracker.is_good_vector(1));

    let indices = tracker.good_vectors().map(|v| v.index).collect::<Vec<_>>();
    assert_eq!(indices, vec![1, 2]);
    assert!(tracker.vectors().iter().all(|v| v.age == 3 && v.friends == 1));
}

#[test]
fn test_close_candidates_are_merged() {
    // 0.05 * 64 = 3.2 px spacing
    let corners = ScriptedCorners::new(vec![
        vec![[10.0, 10.0], [11.0, 11.0], [30.0, 10.0]],
        vec![[10.5, 10.0], [50.0, 40.0]],
    ]);
    let mut tracker = OpticalFlowTracker::with_primitives(corners, ShiftFlow::still());
    tracker.set_min_distance(0.05);
    let frame = black(64, 48);

    tracker.process_frame(&frame).unwrap();
    assert_eq!(tracker.features(), &[[10.0, 10.0], [30.0, 10.0]]);

    tracker.process_frame(&frame).unwrap();
    assert_eq!(tracker.features(), &[[10.0, 10.0], [30.0, 10.0], [50.0, 40.0]]);
    assert_eq!(tracker.feature_index(2), Some(3));
    assert_eq!(tracker.feature_age(0), Some(1));
    assert_eq!(tracker.feature_age(2), Some(0));
}

#[test]
fn test_lost_feature_releases_identifier() {
    let corners = ScriptedCorners::new(vec![vec![[10.0, 10.0], [50.0, 10.0]], vec![[30.0, 30.0]]]);
    let flow = ShiftFlow {
        shift: [0.0, 0.0],
        lose_beyond: 40.0,
    };
    let mut tracker = OpticalFlowTracker::with_primitives(corners, flow);
    let frame = black(64, 48);

    tracker.process_frame(&frame).unwrap();
    assert_eq!(tracker.feature_count(), 2);
    assert_eq!(tracker.status(1), Some(false));
    assert_eq!(tracker.vector_count(), 1);
    assert_eq!(tracker.vector_at(0).map(|v| v.index), Some(1));

    tracker.process_frame(&frame).unwrap();
    assert_eq!(tracker.features(), &[[10.0, 10.0], [30.0, 30.0]]);
    assert_eq!(tracker.feature_index(0), Some(1));
    assert_eq!(tracker.feature_index(1), Some(2));
    assert_eq!(tracker.feature_age(0), Some(1));
    assert_eq!(tracker.feature_age(1), Some(0));
}

#[test]
fn test_feature_next_to_lost_one_is_dropped() {
    let corners = ScriptedCorners::new(vec![vec![[20.0, 20.0], [22.0, 20.0]]]);
    let flow = ShiftFlow {
        shift: [2.0, 0.0],
        lose_beyond: 21.0,
    };
    let mut tracker = OpticalFlowTracker::with_primitives(corners, flow);
    let frame = black(64, 48);

    tracker.process_frame(&frame).unwrap();
    assert_eq!(tracker.new_position(0), Some([22.0, 20.0]));
    assert_eq!(tracker.status(1), Some(false));

    // the tracked feature lands on the stale position of the lost one
    tracker.process_frame(&frame).unwrap();
    assert_eq!(tracker.feature_count(), 0);
    assert_eq!(tracker.vector_count(), 0);
    assert_eq!(tracker.good_vector_count(), 0);
}

#[test]
fn test_moving_vectors_point_backwards() {
    let corners = ScriptedCorners::new(vec![vec![[16.0, 16.0], [24.0, 20.0]]]);
    let mut tracker = OpticalFlowTracker::with_primitives(corners, ShiftFlow::moving(3.0, 0.0));
    let frame = black(64, 48);

    for _ in 0..4 {
        tracker.process_frame(&frame).unwrap();
    }

    assert_eq!(tracker.vector_count(), 2);
    for v in tracker.vectors() {
        approx::assert_abs_diff_eq!(v.alpha, 3.0 / 64.0, epsilon = 1e-6);
        approx::assert_abs_diff_eq!(v.theta, 180.0, epsilon = 0.1);
        approx::assert_abs_diff_eq!((v.x2 - v.x) * 64.0, 3.0, epsilon = 1e-4);
    }
    assert_eq!(tracker.good_vector_count(), 2);
    assert_eq!(tracker.feature(0), Some([25.0, 16.0]));
    assert_eq!(tracker.new_position(0), Some([28.0, 16.0]));
}

#[test]
fn test_failure_is_reported() {
    let corners = ScriptedCorners::repeat(vec![[10.0, 10.0]], 4);
    let mut tracker = OpticalFlowTracker::with_primitives(corners, FailingFlow);
    let frame = black(32, 32);

    let err = tracker.process_frame(&frame).unwrap_err();
    assert!(matches!(err, TrackerError::Image(ImageError::InvalidInput(_))));
    assert_eq!(tracker.last_error(), Some("Invalid input: flow diverged"));
    assert_eq!(tracker.vector_count(), 0);
}

#[test]
fn test_reset_restarts_numbering() {
    let corners = ScriptedCorners::new(vec![
        vec![[10.0, 10.0], [20.0, 10.0]],
        vec![],
        vec![[40.0, 30.0]],
    ]);
    let mut tracker = OpticalFlowTracker::with_primitives(corners, ShiftFlow::still());
    tracker.set_max_age(5);
    let frame = black(64, 48);

    tracker.process_frame(&frame).unwrap();
    tracker.process_frame(&frame).unwrap();
    assert_eq!(tracker.feature_count(), 2);

    tracker.reset();
    assert_eq!(tracker.feature_count(), 0);
    assert_eq!(tracker.vector_count(), 0);
    assert_eq!(tracker.max_age(), 5);

    tracker.process_frame(&frame).unwrap();
    assert_eq!(tracker.features(), &[[40.0, 30.0]]);
    assert_eq!(tracker.feature_index(0), Some(1));
}

#[test]
fn test_fast_detector_finds_nothing() {
    let corners = ScriptedCorners::repeat(vec![[10.0, 10.0]], 4);
    let mut tracker = OpticalFlowTracker::with_primitives(corners, ShiftFlow::still());
    tracker.set_detector_algorithm(DetectorAlgorithm::Fast);

    for _ in 0..3 {
        tracker.process_frame(&black(32, 32)).unwrap();
    }
    assert_eq!(tracker.feature_count(), 0);
    assert!(tracker.last_error().is_none());
}

#[test]
fn test_size_change_keeps_tracking() {
    let corners = ScriptedCorners::new(vec![vec![[8.0, 8.0]]]);
    let mut tracker = OpticalFlowTracker::with_primitives(corners, ShiftFlow::still());
    tracker.set_max_age(0);

    tracker.process_frame(&black(64, 48)).unwrap();
    approx::assert_abs_diff_eq!(tracker.vectors()[0].x, 8.0 / 64.0);

    tracker.process_frame(&black(32, 16)).unwrap();
    assert_eq!(tracker.image_size(), Some(ImageSize::from([32, 16])));
    approx::assert_abs_diff_eq!(tracker.vectors()[0].x, 8.0 / 32.0);
    approx::assert_abs_diff_eq!(tracker.vectors()[0].y, 8.0 / 16.0);
}

#[test]
fn test_real_primitives_static_scene() {
    let config = TrackerConfig {
        min_distance: 0.05,
        ..Default::default()
    };
    let mut tracker = OpticalFlowTracker::with_config(&config);
    let frame = blobs(0.0);
    let size = frame.size();

    // nothing to detect on the blank previous frame
    tracker.process_frame(&frame).unwrap();
    assert_eq!(tracker.feature_count(), 0);

    tracker.process_frame(&frame).unwrap();
    let count = tracker.feature_count();
    assert!(count >= 5, "only {count} features");
    let indices = (0..count).filter_map(|i| tracker.feature_index(i)).collect::<Vec<_>>();

    for _ in 0..3 {
        tracker.process_frame(&frame).unwrap();
    }
    assert_eq!(tracker.feature_count(), count);
    assert_eq!(
        (0..count).filter_map(|i| tracker.feature_index(i)).collect::<Vec<_>>(),
        indices
    );
    assert_eq!(tracker.vector_count(), count);

    for v in tracker.vectors() {
        assert_eq!(v.age, 3);
        approx::assert_abs_diff_eq!(v.alpha, 0.0, epsilon = 1e-5);
    }

    // the lone blob has no neighbours
    let lone = tracker
        .vectors()
        .iter()
        .position(|v| {
            let [x, y] = v.origin_px(size);
            (x - 70.0).abs() < 3.0 && (y - 58.0).abs() < 3.0
        })
        .unwrap();
    assert!(!tracker.is_good_vector(lone));
    assert!(tracker.good_vector_count() >= 4);
    assert!(tracker.good_vector_count() < tracker.vector_count());
}

#[test]
fn test_real_primitives_moving_scene() {
    let config = TrackerConfig {
        min_distance: 0.05,
        ..Default::default()
    };
    let mut tracker = OpticalFlowTracker::with_config(&config);

    for k in 0..5 {
        tracker.process_frame(&blobs(2.0 * k as f64)).unwrap();
        if k == 0 {
            continue;
        }

        assert!(tracker.vector_count() >= 5);
        for v in tracker.vectors() {
            approx::assert_abs_diff_eq!((v.x2 - v.x) * 96.0, 2.0, epsilon = 0.1);
            approx::assert_abs_diff_eq!((v.y2 - v.y) * 72.0, 0.0, epsilon = 0.1);
            let theta = if v.theta > 270.0 { v.theta - 360.0 } else { v.theta };
            approx::assert_abs_diff_eq!(theta, 180.0, epsilon = 3.0);
            assert_eq!(v.age, (k - 1).min(3) as u32);
        }
    }

    // features ride along with the blobs, so nothing is re-detected
    assert_eq!(tracker.vector_count(), tracker.feature_count());
    assert!(tracker.good_vector_count() >= 4);
}

#[test]
fn test_pyramid_reuse_flag_follows_buffers() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let flow = RecordingFlow {
        calls: calls.clone(),
        keep: true,
    };
    let corners = ScriptedCorners::repeat(vec![[8.0, 8.0]], 5);
    let mut tracker = OpticalFlowTracker::with_primitives(corners, flow);

    for _ in 0..3 {
        tracker.process_frame(&black(64, 48)).unwrap();
    }
    for _ in 0..2 {
        tracker.process_frame(&black(32, 16)).unwrap();
    }

    assert_eq!(*calls.borrow(), vec![false, true, true, false, true]);
}

#[test]
fn test_skipped_track_clears_pyramid_flag() {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let flow = RecordingFlow {
        calls: calls.clone(),
        keep: false,
    };
    let corners = ScriptedCorners::new(vec![vec![[10.0, 10.0]], vec![], vec![[20.0, 20.0]]]);
    let mut tracker = OpticalFlowTracker::with_primitives(corners, flow);

    tracker.process_frame(&black(64, 48)).unwrap();
    assert_eq!(*calls.borrow(), vec![false]);

    // the only feature was lost, so nothing is tracked
    tracker.process_frame(&black(64, 48)).unwrap();
    assert_eq!(tracker.feature_count(), 0);
    assert_eq!(calls.borrow().len(), 1);

    tracker.process_frame(&black(64, 48)).unwrap();
    assert_eq!(*calls.borrow(), vec![false, false]);
}
