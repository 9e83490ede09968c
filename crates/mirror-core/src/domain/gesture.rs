//! Tap vs. drag classification.
//!
//! A pointer gesture is either a *tap* (short, nearly stationary press) or a
//! *drag* (anything else).  The device must see exactly one `tap` for the
//! former and a `touch_down`, throttled `touch_move`s, and a `touch_up` for
//! the latter, never a mix.
//!
//! Because a tap can only be recognised once the pointer is released, the
//! device-side touch-down is held back until the gesture has proven itself a
//! drag: the pointer travelled past the distance threshold, or the press
//! outlived the tap duration.  The held-back touch-down is then issued at the
//! origin coordinate, so the device still sees the full trajectory.
//!
//! Moves are rate limited.  A move that arrives inside the throttle interval
//! replaces the pending position and is flushed by [`GestureClassifier::poll`]
//! once the interval has passed, so the last position is never lost.

use std::time::{Duration, Instant};

use crate::domain::device::DeviceCommand;
use crate::domain::geometry::{CoordinateMapper, DevicePoint, ScreenPoint};

/// Thresholds for gesture classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureConfig {
    /// Minimum spacing between two `touch_move` commands.
    pub move_throttle: Duration,
    /// A press that travels at least this far (UI pixels) is a drag.
    pub tap_max_distance: f64,
    /// A press held at least this long is a drag.
    pub tap_max_duration: Duration,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            move_throttle: Duration::from_millis(50),
            tap_max_distance: 10.0,
            tap_max_duration: Duration::from_millis(200),
        }
    }
}

/// Per-gesture record, alive from pointer-down to pointer-up/leave/cancel.
#[derive(Debug, Clone)]
struct DragState {
    origin: ScreenPoint,
    origin_device: DevicePoint,
    started_at: Instant,
    /// Set once the pointer travelled past the tap distance.
    moved: bool,
    /// Whether the device has been sent `touch_down` for this gesture.
    down_sent: bool,
    /// Most recent mapped position, sent or pending.
    last_device: DevicePoint,
}

/// Converts pointer events into device touch primitives.
#[derive(Debug)]
pub struct GestureClassifier {
    config: GestureConfig,
    drag: Option<DragState>,
    last_move_sent: Option<Instant>,
    pending_move: Option<DevicePoint>,
}

impl GestureClassifier {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            drag: None,
            last_move_sent: None,
            pending_move: None,
        }
    }

    /// `true` between pointer-down and pointer-up/leave/cancel.
    pub fn is_active(&self) -> bool {
        self.drag.is_some()
    }

    /// `true` once the device has seen a `touch_down` for the active gesture.
    pub fn is_touching(&self) -> bool {
        self.drag.as_ref().is_some_and(|d| d.down_sent)
    }

    /// Starts a gesture.  A press outside the video is ignored.
    pub fn down(
        &mut self,
        mapper: &CoordinateMapper,
        point: ScreenPoint,
        now: Instant,
    ) -> Vec<DeviceCommand> {
        // A second down without an up: finish the old gesture first.
        let commands = self.leave();

        if let Some(device) = mapper.map_to_device(point) {
            self.drag = Some(DragState {
                origin: point,
                origin_device: device,
                started_at: now,
                moved: false,
                down_sent: false,
                last_device: device,
            });
            self.last_move_sent = None;
            self.pending_move = None;
        }
        commands
    }

    /// Pointer motion while pressed.
    pub fn moved(
        &mut self,
        mapper: &CoordinateMapper,
        point: ScreenPoint,
        now: Instant,
    ) -> Vec<DeviceCommand> {
        let mut commands = Vec::new();
        let Some(device) = mapper.map_to_device(point) else {
            return commands;
        };
        let threshold = self.config.tap_max_distance;
        let Some(drag) = self.drag.as_mut() else {
            return commands;
        };

        drag.last_device = device;
        if !drag.moved && drag.origin.distance_to(point) >= threshold {
            drag.moved = true;
        }
        if !drag.moved {
            return commands;
        }
        if !drag.down_sent {
            drag.down_sent = true;
            commands.push(DeviceCommand::TouchDown {
                at: drag.origin_device,
            });
        }

        if self.move_allowed(now) {
            self.last_move_sent = Some(now);
            self.pending_move = None;
            commands.push(DeviceCommand::TouchMove { at: device });
        } else {
            self.pending_move = Some(device);
        }
        commands
    }

    /// Ends the gesture with a tap or a touch-up.
    pub fn up(
        &mut self,
        mapper: &CoordinateMapper,
        point: ScreenPoint,
        now: Instant,
    ) -> Vec<DeviceCommand> {
        let Some(drag) = self.drag.take() else {
            return Vec::new();
        };
        let pending = self.pending_move.take();
        self.last_move_sent = None;

        let elapsed = now.saturating_duration_since(drag.started_at);
        let displacement = drag.origin.distance_to(point);
        if !drag.down_sent
            && displacement < self.config.tap_max_distance
            && elapsed < self.config.tap_max_duration
        {
            return vec![DeviceCommand::Tap {
                at: drag.origin_device,
            }];
        }

        let mut commands = Vec::new();
        if !drag.down_sent {
            commands.push(DeviceCommand::TouchDown {
                at: drag.origin_device,
            });
        }
        if let Some(at) = pending {
            commands.push(DeviceCommand::TouchMove { at });
        }
        let at = mapper.map_to_device(point).unwrap_or(drag.last_device);
        commands.push(DeviceCommand::TouchUp { at });
        commands
    }

    /// The pointer left the video mid-gesture.
    ///
    /// Lifts the finger at the last known position so the device is not left
    /// with a stuck touch.  Nothing is sent if the device never saw the down.
    pub fn leave(&mut self) -> Vec<DeviceCommand> {
        let pending = self.pending_move.take();
        self.last_move_sent = None;
        match self.drag.take() {
            Some(drag) if drag.down_sent => vec![DeviceCommand::TouchUp {
                at: pending.unwrap_or(drag.last_device),
            }],
            _ => Vec::new(),
        }
    }

    /// Forgets the active gesture without emitting anything.
    ///
    /// Used when the session that owned the gesture is gone.
    pub fn cancel(&mut self) {
        self.drag = None;
        self.last_move_sent = None;
        self.pending_move = None;
    }

    /// Emits commands whose time has come: a held-back touch-down for a long
    /// press, and a coalesced move once the throttle interval has passed.
    pub fn poll(&mut self, now: Instant) -> Vec<DeviceCommand> {
        let mut commands = Vec::new();
        let tap_max_duration = self.config.tap_max_duration;
        let Some(drag) = self.drag.as_mut() else {
            return commands;
        };

        if !drag.down_sent && now.saturating_duration_since(drag.started_at) >= tap_max_duration {
            drag.down_sent = true;
            commands.push(DeviceCommand::TouchDown {
                at: drag.origin_device,
            });
        }

        if self.pending_move.is_some() && self.move_allowed(now) {
            if let Some(at) = self.pending_move.take() {
                self.last_move_sent = Some(now);
                commands.push(DeviceCommand::TouchMove { at });
            }
        }
        commands
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        let drag = self.drag.as_ref()?;
        let long_press = (!drag.down_sent).then(|| drag.started_at + self.config.tap_max_duration);
        let flush = match (self.pending_move, self.last_move_sent) {
            (Some(_), Some(sent)) => Some(sent + self.config.move_throttle),
            _ => None,
        };
        match (long_press, flush) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn move_allowed(&self, now: Instant) -> bool {
        self.last_move_sent
            .map_or(true, |sent| now.saturating_duration_since(sent) >= self.config.move_throttle)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::Size;

    /// Viewport, stream, and device all 1000x1000: UI pixels equal device pixels.
    fn identity_mapper() -> CoordinateMapper {
        let mut m = CoordinateMapper::new();
        m.set_device_size(Some(Size::new(1000, 1000)));
        m.set_stream_size(Some(Size::new(1000, 1000)));
        m.set_viewport(Some(Size::new(1000, 1000)));
        m
    }

    fn ms(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    fn pt(x: f64, y: f64) -> ScreenPoint {
        ScreenPoint::new(x, y)
    }

    fn dp(x: u32, y: u32) -> DevicePoint {
        DevicePoint::new(x, y)
    }

    #[test]
    fn test_short_still_press_is_a_single_tap() {
        // Arrange
        let m = identity_mapper();
        let mut g = GestureClassifier::new(GestureConfig::default());
        let t0 = Instant::now();

        // Act
        let mut cmds = g.down(&m, pt(100.0, 100.0), t0);
        cmds.extend(g.moved(&m, pt(104.0, 103.0), ms(t0, 30)));
        cmds.extend(g.poll(ms(t0, 60)));
        cmds.extend(g.up(&m, pt(105.0, 102.0), ms(t0, 120)));

        // Assert
        assert_eq!(cmds, vec![DeviceCommand::Tap { at: dp(100, 100) }]);
        assert!(!g.is_active());
    }

    #[test]
    fn test_drag_yields_down_moves_up_and_never_a_tap() {
        // Arrange
        let m = identity_mapper();
        let mut g = GestureClassifier::new(GestureConfig::default());
        let t0 = Instant::now();

        // Act
        let mut cmds = g.down(&m, pt(100.0, 100.0), t0);
        cmds.extend(g.moved(&m, pt(100.0, 150.0), ms(t0, 20)));
        cmds.extend(g.moved(&m, pt(100.0, 200.0), ms(t0, 80)));
        cmds.extend(g.up(&m, pt(100.0, 210.0), ms(t0, 100)));

        // Assert
        assert_eq!(
            cmds,
            vec![
                DeviceCommand::TouchDown { at: dp(100, 100) },
                DeviceCommand::TouchMove { at: dp(100, 150) },
                DeviceCommand::TouchMove { at: dp(100, 200) },
                DeviceCommand::TouchUp { at: dp(100, 210) },
            ]
        );
        assert!(!cmds.iter().any(|c| matches!(c, DeviceCommand::Tap { .. })));
    }

    #[test]
    fn test_moves_inside_throttle_window_coalesce_to_latest() {
        // Arrange
        let m = identity_mapper();
        let mut g = GestureClassifier::new(GestureConfig::default());
        let t0 = Instant::now();
        g.down(&m, pt(0.0, 0.0), t0);

        // Act – ten moves inside 45 ms
        let mut burst = Vec::new();
        for i in 1..=10u64 {
            let p = pt(20.0 * i as f64, 0.0);
            burst.extend(g.moved(&m, p, ms(t0, i * 4 + 5)));
        }
        let deadline = g.next_deadline();
        let early = g.poll(ms(t0, 40));
        let flushed = g.poll(ms(t0, 60));

        // Assert – one move inside the window, the last position flushed after it
        let moves = burst
            .iter()
            .filter(|c| matches!(c, DeviceCommand::TouchMove { .. }))
            .count();
        assert_eq!(moves, 1);
        assert_eq!(deadline, Some(ms(t0, 59)));
        assert!(early.is_empty());
        assert_eq!(flushed, vec![DeviceCommand::TouchMove { at: dp(200, 0) }]);
    }

    #[test]
    fn test_up_flushes_pending_move_before_touch_up() {
        let m = identity_mapper();
        let mut g = GestureClassifier::new(GestureConfig::default());
        let t0 = Instant::now();
        g.down(&m, pt(0.0, 0.0), t0);
        g.moved(&m, pt(50.0, 0.0), ms(t0, 10));
        g.moved(&m, pt(80.0, 0.0), ms(t0, 20));

        let cmds = g.up(&m, pt(90.0, 0.0), ms(t0, 30));

        assert_eq!(
            cmds,
            vec![
                DeviceCommand::TouchMove { at: dp(80, 0) },
                DeviceCommand::TouchUp { at: dp(90, 0) },
            ]
        );
    }

    #[test]
    fn test_long_press_commits_touch_down_on_poll() {
        // Arrange
        let m = identity_mapper();
        let mut g = GestureClassifier::new(GestureConfig::default());
        let t0 = Instant::now();
        g.down(&m, pt(300.0, 300.0), t0);

        // Act
        let before = g.poll(ms(t0, 199));
        let at = g.poll(ms(t0, 200));
        let up = g.up(&m, pt(301.0, 300.0), ms(t0, 600));

        // Assert
        assert!(before.is_empty());
        assert_eq!(at, vec![DeviceCommand::TouchDown { at: dp(300, 300) }]);
        assert_eq!(up, vec![DeviceCommand::TouchUp { at: dp(301, 300) }]);
    }

    #[test]
    fn test_long_press_without_poll_is_not_a_tap() {
        let m = identity_mapper();
        let mut g = GestureClassifier::new(GestureConfig::default());
        let t0 = Instant::now();
        g.down(&m, pt(300.0, 300.0), t0);

        let cmds = g.up(&m, pt(300.0, 300.0), ms(t0, 250));

        assert_eq!(
            cmds,
            vec![
                DeviceCommand::TouchDown { at: dp(300, 300) },
                DeviceCommand::TouchUp { at: dp(300, 300) },
            ]
        );
    }

    #[test]
    fn test_leave_mid_drag_lifts_finger_at_last_position() {
        // Arrange
        let m = identity_mapper();
        let mut g = GestureClassifier::new(GestureConfig::default());
        let t0 = Instant::now();
        g.down(&m, pt(10.0, 10.0), t0);
        g.moved(&m, pt(10.0, 60.0), ms(t0, 10));
        g.moved(&m, pt(10.0, 90.0), ms(t0, 20));

        // Act
        let cmds = g.leave();

        // Assert
        assert_eq!(cmds, vec![DeviceCommand::TouchUp { at: dp(10, 90) }]);
        assert!(!g.is_active());
        assert!(g.poll(ms(t0, 100)).is_empty());
    }

    #[test]
    fn test_leave_before_commit_sends_nothing() {
        let m = identity_mapper();
        let mut g = GestureClassifier::new(GestureConfig::default());
        g.down(&m, pt(10.0, 10.0), Instant::now());

        assert!(g.leave().is_empty());
    }

    #[test]
    fn test_down_in_letterbox_is_ignored() {
        // Arrange – 1000x1000 viewport showing a 500x1000 stream
        let mut m = identity_mapper();
        m.set_stream_size(Some(Size::new(500, 1000)));
        m.set_device_size(Some(Size::new(500, 1000)));
        let mut g = GestureClassifier::new(GestureConfig::default());

        // Act
        let cmds = g.down(&m, pt(10.0, 500.0), Instant::now());

        // Assert
        assert!(cmds.is_empty());
        assert!(!g.is_active());
    }

    #[test]
    fn test_second_down_finishes_previous_drag() {
        let m = identity_mapper();
        let mut g = GestureClassifier::new(GestureConfig::default());
        let t0 = Instant::now();
        g.down(&m, pt(0.0, 0.0), t0);
        g.moved(&m, pt(0.0, 40.0), ms(t0, 10));

        let cmds = g.down(&m, pt(500.0, 500.0), ms(t0, 20));

        assert_eq!(cmds, vec![DeviceCommand::TouchUp { at: dp(0, 40) }]);
        assert!(g.is_active());
        assert!(!g.is_touching());
    }

    #[test]
    fn test_cancel_drops_gesture_silently() {
        let m = identity_mapper();
        let mut g = GestureClassifier::new(GestureConfig::default());
        let t0 = Instant::now();
        g.down(&m, pt(0.0, 0.0), t0);
        g.moved(&m, pt(0.0, 40.0), ms(t0, 10));

        g.cancel();

        assert!(g.up(&m, pt(0.0, 50.0), ms(t0, 20)).is_empty());
        assert_eq!(g.next_deadline(), None);
    }
}
