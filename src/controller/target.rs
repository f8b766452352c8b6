// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the channel through which target poses and wrenches reach the control loop.
//!
//! Messages are handled on the caller's thread. Every accepted message replaces the whole
//! [`TargetState`] with a single atomic swap, and the control loop takes one snapshot per tick,
//! so a tick never observes a partially applied message.
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::warn;

use crate::utils::{all_finite, pose_to_isometry, Frame, Vector6};

/// Frame in which the target wrench of a [`TargetState`] is expressed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum WrenchFrame {
    /// Already in the base frame.
    #[default]
    Base,
    /// In the end effector frame, re-expressed with the rotation of the tick that uses it.
    EndEffector,
}

/// Target of the impedance controller.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetState {
    /// Target end effector frame in base frame.
    pub frame: Frame,
    /// Target wrench superimposed on the spring-damper.
    pub wrench: Vector6,
    /// Frame of `wrench`.
    pub wrench_frame: WrenchFrame,
    /// Whether a target pose was received since the last activation.
    pub received: bool,
    /// First target pose ever received. Kept as a fixed reference.
    pub initial_frame: Option<Frame>,
}

impl TargetState {
    /// A target at `frame` without wrench.
    pub fn at(frame: Frame) -> Self {
        TargetState {
            frame,
            wrench: Vector6::zeros(),
            wrench_frame: WrenchFrame::Base,
            received: false,
            initial_frame: None,
        }
    }
}

/// Stamped target pose.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetPoseMessage {
    /// Frame the pose is expressed in. Must be the base link.
    pub frame_id: String,
    /// Position in \[m\].
    pub position: [f64; 3],
    /// Orientation quaternion as `[x, y, z, w]`.
    pub orientation: [f64; 4],
}

/// Stamped target wrench.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetWrenchMessage {
    /// Frame the wrench is expressed in.
    pub frame_id: String,
    /// Force in \[N\].
    pub force: [f64; 3],
    /// Torque in \[Nm\].
    pub torque: [f64; 3],
}

/// Outcome of handing a message to the [`TargetChannel`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The target was replaced.
    Accepted,
    /// The message was ignored and the previous target retained.
    Dropped {
        /// Whether a warning was emitted for this message.
        warned: bool,
    },
}

/// Lets at most one warning pass per period.
#[derive(Debug)]
pub struct ThrottledWarning {
    period: Duration,
    last: Mutex<Option<Instant>>,
}

impl ThrottledWarning {
    /// Creates a new gate which is open for the first call.
    pub fn new(period: Duration) -> Self {
        ThrottledWarning {
            period,
            last: Mutex::new(None),
        }
    }

    /// Determines whether a warning may be emitted at `now` and closes the gate if so.
    pub fn should_warn(&self, now: Instant) -> bool {
        let mut last = self.last.lock();
        match *last {
            Some(previous) if now.saturating_duration_since(previous) < self.period => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// Receives target messages from any thread and hands consistent snapshots to the control loop.
#[derive(Debug)]
pub struct TargetChannel {
    state: ArcSwap<TargetState>,
    base_link: String,
    end_effector_link: String,
    hand_frame_control: bool,
    pose_warning: ThrottledWarning,
    wrench_warning: ThrottledWarning,
}

impl TargetChannel {
    /// Creates a new channel.
    /// # Arguments
    /// * `base_link` - The only frame accepted for target poses.
    /// * `end_effector_link` - Additionally accepted for target wrenches if `hand_frame_control` is set.
    /// * `hand_frame_control` - Accept wrenches in the end effector frame.
    /// * `warning_period` - Window in which at most one warning per message kind is emitted.
    pub fn new<S: Into<String>>(
        base_link: S,
        end_effector_link: S,
        hand_frame_control: bool,
        warning_period: Duration,
    ) -> Self {
        TargetChannel {
            state: ArcSwap::from_pointee(TargetState::at(Frame::identity())),
            base_link: base_link.into(),
            end_effector_link: end_effector_link.into(),
            hand_frame_control,
            pose_warning: ThrottledWarning::new(warning_period),
            wrench_warning: ThrottledWarning::new(warning_period),
        }
    }

    /// Consistent snapshot of the current target.
    pub fn snapshot(&self) -> Arc<TargetState> {
        self.state.load_full()
    }

    /// Moves the target to `frame` and clears the wrench. The first received frame is retained.
    pub(crate) fn reset(&self, frame: Frame) {
        self.state.rcu(|current| {
            Arc::new(TargetState {
                initial_frame: current.initial_frame,
                ..TargetState::at(frame)
            })
        });
    }

    /// Handles a target pose, see [`on_target_pose_at`](`Self::on_target_pose_at`).
    pub fn on_target_pose(&self, message: &TargetPoseMessage) -> Delivery {
        self.on_target_pose_at(message, Instant::now())
    }

    /// Handles a target pose received at `now`.
    ///
    /// Poses in any frame other than the base link, and poses with non-finite entries or a
    /// zero quaternion, are dropped with a rate-limited warning.
    pub fn on_target_pose_at(&self, message: &TargetPoseMessage, now: Instant) -> Delivery {
        if message.frame_id != self.base_link {
            let warned = self.pose_warning.should_warn(now);
            if warned {
                warn!(
                    expected = %self.base_link,
                    got = %message.frame_id,
                    "Got target pose in wrong reference frame"
                );
            }
            return Delivery::Dropped { warned };
        }
        let frame = match pose_to_isometry(&message.position, &message.orientation) {
            Some(frame) => frame,
            None => {
                let warned = self.pose_warning.should_warn(now);
                if warned {
                    warn!(?message, "Got malformed target pose");
                }
                return Delivery::Dropped { warned };
            }
        };
        self.state.rcu(|current| {
            Arc::new(TargetState {
                frame,
                received: true,
                initial_frame: current.initial_frame.or(Some(frame)),
                ..TargetState::clone(current)
            })
        });
        Delivery::Accepted
    }

    /// Handles a target wrench, see [`on_target_wrench_at`](`Self::on_target_wrench_at`).
    pub fn on_target_wrench(&self, message: &TargetWrenchMessage) -> Delivery {
        self.on_target_wrench_at(message, Instant::now())
    }

    /// Handles a target wrench received at `now`.
    ///
    /// Wrenches in the base link are used as they are. With hand frame control, wrenches in the
    /// end effector link are accepted as well. Any other frame and non-finite entries lead to a
    /// rate-limited warning and the previous wrench is retained.
    pub fn on_target_wrench_at(&self, message: &TargetWrenchMessage, now: Instant) -> Delivery {
        let wrench_frame = if message.frame_id == self.base_link {
            Some(WrenchFrame::Base)
        } else if self.hand_frame_control && message.frame_id == self.end_effector_link {
            Some(WrenchFrame::EndEffector)
        } else {
            None
        };
        let wrench_frame = match wrench_frame {
            Some(wrench_frame) => wrench_frame,
            None => {
                let warned = self.wrench_warning.should_warn(now);
                if warned {
                    warn!(
                        expected = %self.base_link,
                        got = %message.frame_id,
                        hand_frame_control = self.hand_frame_control,
                        "Got target wrench in unsupported reference frame"
                    );
                }
                return Delivery::Dropped { warned };
            }
        };
        let wrench = Vector6::new(
            message.force[0],
            message.force[1],
            message.force[2],
            message.torque[0],
            message.torque[1],
            message.torque[2],
        );
        if !all_finite(&wrench) {
            let warned = self.wrench_warning.should_warn(now);
            if warned {
                warn!(?message, "Got non-finite target wrench");
            }
            return Delivery::Dropped { warned };
        }
        self.state.rcu(|current| {
            Arc::new(TargetState {
                wrench,
                wrench_frame,
                ..TargetState::clone(current)
            })
        });
        Delivery::Accepted
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use crate::controller::target::{
        Delivery, TargetChannel, TargetPoseMessage, TargetWrenchMessage, ThrottledWarning,
        WrenchFrame,
    };
    use crate::utils::Frame;

    fn channel(hand_frame_control: bool) -> TargetChannel {
        TargetChannel::new(
            "base_link",
            "tool0",
            hand_frame_control,
            Duration::from_millis(3000),
        )
    }

    fn pose(frame_id: &str, x: f64) -> TargetPoseMessage {
        TargetPoseMessage {
            frame_id: frame_id.to_string(),
            position: [x, x, x],
            orientation: [0., 0., 0., 1.],
        }
    }

    fn wrench(frame_id: &str) -> TargetWrenchMessage {
        TargetWrenchMessage {
            frame_id: frame_id.to_string(),
            force: [1., 2., 3.],
            torque: [0., 0., 0.5],
        }
    }

    #[test]
    fn throttled_warning_opens_once_per_period() {
        let gate = ThrottledWarning::new(Duration::from_millis(100));
        let start = Instant::now();
        assert!(gate.should_warn(start));
        assert!(!gate.should_warn(start + Duration::from_millis(50)));
        assert!(!gate.should_warn(start + Duration::from_millis(99)));
        assert!(gate.should_warn(start + Duration::from_millis(100)));
        assert!(!gate.should_warn(start + Duration::from_millis(150)));
    }

    #[test]
    fn wrench_in_foreign_frame_warns_once_per_window() {
        let channel = channel(false);
        let before = channel.snapshot();
        let start = Instant::now();
        let mut warnings = 0;
        // one message per 1 ms tick for one second
        for tick in 0..1000 {
            let delivery = channel.on_target_wrench_at(&wrench("tool0"), start + Duration::from_millis(tick));
            match delivery {
                Delivery::Dropped { warned } => warnings += warned as usize,
                Delivery::Accepted => panic!("wrench in foreign frame was accepted"),
            }
        }
        assert_eq!(warnings, 1);
        assert_eq!(*channel.snapshot(), *before);
        assert_eq!(
            channel.on_target_wrench_at(&wrench("camera"), start + Duration::from_millis(3000)),
            Delivery::Dropped { warned: true }
        );
    }

    #[test]
    fn wrench_frames() {
        let channel = channel(true);
        assert_eq!(channel.on_target_wrench(&wrench("base_link")), Delivery::Accepted);
        assert_eq!(channel.snapshot().wrench_frame, WrenchFrame::Base);
        assert_eq!(channel.on_target_wrench(&wrench("tool0")), Delivery::Accepted);
        let snapshot = channel.snapshot();
        assert_eq!(snapshot.wrench_frame, WrenchFrame::EndEffector);
        assert_eq!(snapshot.wrench[2], 3.);
        assert_eq!(snapshot.wrench[5], 0.5);
        assert!(matches!(
            channel.on_target_wrench(&wrench("link3")),
            Delivery::Dropped { .. }
        ));
        let mut invalid = wrench("base_link");
        invalid.force[1] = f64::NAN;
        assert!(matches!(channel.on_target_wrench(&invalid), Delivery::Dropped { .. }));
        assert_eq!(channel.snapshot().wrench_frame, WrenchFrame::EndEffector);
    }

    #[test]
    fn pose_in_wrong_frame_is_dropped() {
        let channel = channel(true);
        let start = Instant::now();
        assert_eq!(
            channel.on_target_pose_at(&pose("tool0", 1.), start),
            Delivery::Dropped { warned: true }
        );
        assert_eq!(
            channel.on_target_pose_at(&pose("tool0", 1.), start + Duration::from_millis(10)),
            Delivery::Dropped { warned: false }
        );
        let mut degenerate = pose("base_link", 1.);
        degenerate.orientation = [0., 0., 0., 0.];
        assert!(matches!(
            channel.on_target_pose_at(&degenerate, start + Duration::from_millis(20)),
            Delivery::Dropped { warned: false }
        ));
        let snapshot = channel.snapshot();
        assert!(!snapshot.received);
        assert_eq!(snapshot.frame, Frame::identity());
    }

    #[test]
    fn first_received_pose_is_kept() {
        let channel = channel(true);
        assert_eq!(channel.on_target_pose(&pose("base_link", 0.5)), Delivery::Accepted);
        assert_eq!(channel.on_target_pose(&pose("base_link", 0.7)), Delivery::Accepted);
        let snapshot = channel.snapshot();
        assert!(snapshot.received);
        assert_eq!(snapshot.frame.translation.vector.x, 0.7);
        assert_eq!(snapshot.initial_frame.unwrap().translation.vector.x, 0.5);

        channel.on_target_wrench(&wrench("base_link"));
        channel.reset(Frame::translation(0., 0., 1.));
        let snapshot = channel.snapshot();
        assert!(!snapshot.received);
        assert_eq!(snapshot.wrench, crate::utils::Vector6::zeros());
        assert_eq!(snapshot.frame.translation.vector.z, 1.);
        assert_eq!(snapshot.initial_frame.unwrap().translation.vector.x, 0.5);
    }

    #[test]
    fn snapshots_are_never_torn() {
        let channel = Arc::new(channel(true));
        let writer = {
            let channel = channel.clone();
            thread::spawn(move || {
                for i in 0..2000 {
                    channel.on_target_pose(&pose("base_link", i as f64));
                }
            })
        };
        for _ in 0..2000 {
            let snapshot = channel.snapshot();
            let position = snapshot.frame.translation.vector;
            assert_eq!(position.x, position.y);
            assert_eq!(position.y, position.z);
        }
        writer.join().unwrap();
        assert_eq!(channel.snapshot().frame.translation.vector.x, 1999.);
    }
}
