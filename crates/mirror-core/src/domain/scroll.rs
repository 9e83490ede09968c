//! Mouse-wheel bursts to device swipes.
//!
//! Android has no wheel event reachable through `input`, so scrolling is
//! emulated with a swipe.  Wheel events arrive in rapid bursts; each burst
//! becomes exactly one swipe, emitted once the wheel has been quiet for a
//! short period.  The swipe starts at a smoothed pointer position (an
//! exponentially weighted moving average, which irons out hand jitter) and
//! travels against the scroll direction: scrolling down drags content up.

use std::time::{Duration, Instant};

use crate::domain::device::DeviceCommand;
use crate::domain::geometry::{CoordinateMapper, DevicePoint, ScreenPoint};

/// Tuning for wheel → swipe synthesis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollConfig {
    /// Silence after the last wheel event that closes a burst.
    pub quiet_period: Duration,
    /// Weight of the newest pointer position in the moving average (0..=1).
    pub smoothing: f64,
    /// Multiplier applied to the accumulated wheel delta.
    pub distance_factor: f64,
    /// Swipe duration per device pixel travelled, before clamping.
    pub ms_per_px: f64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_millis(150),
            smoothing: 0.3,
            distance_factor: 1.0,
            ms_per_px: 0.5,
            min_duration_ms: 100,
            max_duration_ms: 400,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Burst {
    /// Smoothed pointer position in device pixels.
    anchor_x: f64,
    anchor_y: f64,
    /// Accumulated wheel delta in UI pixels.
    delta_x: f64,
    delta_y: f64,
    last_event: Instant,
}

/// Accumulates wheel events and emits one swipe per burst.
#[derive(Debug)]
pub struct ScrollTranslator {
    config: ScrollConfig,
    burst: Option<Burst>,
}

impl ScrollTranslator {
    pub fn new(config: ScrollConfig) -> Self {
        Self { config, burst: None }
    }

    /// `true` while a burst is accumulating.
    pub fn is_pending(&self) -> bool {
        self.burst.is_some()
    }

    /// Records one wheel event.  Events over the letterbox are ignored.
    ///
    /// Positive `delta_y` scrolls down, matching browser and winit conventions.
    pub fn wheel(
        &mut self,
        mapper: &CoordinateMapper,
        point: ScreenPoint,
        delta_x: f64,
        delta_y: f64,
        now: Instant,
    ) {
        let Some(device) = mapper.map_to_device(point) else {
            return;
        };
        let (x, y) = (f64::from(device.x), f64::from(device.y));
        let alpha = self.config.smoothing.clamp(0.0, 1.0);

        match self.burst.as_mut() {
            Some(burst) => {
                burst.anchor_x += alpha * (x - burst.anchor_x);
                burst.anchor_y += alpha * (y - burst.anchor_y);
                burst.delta_x += delta_x;
                burst.delta_y += delta_y;
                burst.last_event = now;
            }
            None => {
                self.burst = Some(Burst {
                    anchor_x: x,
                    anchor_y: y,
                    delta_x,
                    delta_y,
                    last_event: now,
                });
            }
        }
    }

    /// Closes the burst once the quiet period has elapsed.
    ///
    /// Returns the swipe for the burst, or `None` while the burst is still
    /// open, when nothing accumulated, or when the geometry is gone.
    pub fn poll(&mut self, mapper: &CoordinateMapper, now: Instant) -> Option<DeviceCommand> {
        let burst = self.burst?;
        if now.saturating_duration_since(burst.last_event) < self.config.quiet_period {
            return None;
        }
        self.burst = None;
        self.swipe_for(mapper, &burst)
    }

    /// Instant at which the open burst will be closed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.burst.map(|b| b.last_event + self.config.quiet_period)
    }

    /// Discards any open burst.
    pub fn reset(&mut self) {
        self.burst = None;
    }

    fn swipe_for(&self, mapper: &CoordinateMapper, burst: &Burst) -> Option<DeviceCommand> {
        let bounds = mapper.device_bounds()?;
        let (scale_x, scale_y) = mapper.device_scale()?;
        let max_x = f64::from(bounds.width.saturating_sub(1));
        let max_y = f64::from(bounds.height.saturating_sub(1));

        let from_x = burst.anchor_x.round().clamp(0.0, max_x);
        let from_y = burst.anchor_y.round().clamp(0.0, max_y);
        let to_x = (from_x - burst.delta_x * self.config.distance_factor * scale_x)
            .round()
            .clamp(0.0, max_x);
        let to_y = (from_y - burst.delta_y * self.config.distance_factor * scale_y)
            .round()
            .clamp(0.0, max_y);

        let distance = (to_x - from_x).hypot(to_y - from_y);
        if distance < 1.0 {
            return None;
        }
        let duration_ms = ((distance * self.config.ms_per_px).round() as u64)
            .clamp(self.config.min_duration_ms, self.config.max_duration_ms);

        Some(DeviceCommand::Swipe {
            from: DevicePoint::new(from_x as u32, from_y as u32),
            to: DevicePoint::new(to_x as u32, to_y as u32),
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::Size;

    fn mapper() -> CoordinateMapper {
        let mut m = CoordinateMapper::new();
        m.set_device_size(Some(Size::new(1000, 2000)));
        m.set_stream_size(Some(Size::new(500, 1000)));
        m.set_viewport(Some(Size::new(500, 1000)));
        m
    }

    fn after(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn test_burst_emits_exactly_one_swipe_after_quiet_period() {
        // Arrange
        let m = mapper();
        let mut s = ScrollTranslator::new(ScrollConfig::default());
        let t0 = Instant::now();

        // Act – five wheel notches, 20 ms apart
        for i in 0..5u64 {
            s.wheel(&m, ScreenPoint::new(250.0, 500.0), 0.0, 20.0, after(t0, i * 20));
        }
        let during = s.poll(&m, after(t0, 100));
        let swipe = s.poll(&m, after(t0, 80 + 150));
        let again = s.poll(&m, after(t0, 1_000));

        // Assert – 100 UI px down at 2x scale ⇒ 200 device px upward
        assert_eq!(during, None);
        assert_eq!(
            swipe,
            Some(DeviceCommand::Swipe {
                from: DevicePoint::new(500, 1000),
                to: DevicePoint::new(500, 800),
                duration_ms: 100,
            })
        );
        assert_eq!(again, None);
    }

    #[test]
    fn test_scroll_up_swipes_downward_with_longer_duration() {
        let m = mapper();
        let mut s = ScrollTranslator::new(ScrollConfig::default());
        let t0 = Instant::now();
        s.wheel(&m, ScreenPoint::new(250.0, 200.0), 0.0, -300.0, t0);

        let swipe = s.poll(&m, after(t0, 150));

        assert_eq!(
            swipe,
            Some(DeviceCommand::Swipe {
                from: DevicePoint::new(500, 400),
                to: DevicePoint::new(500, 1000),
                duration_ms: 300,
            })
        );
    }

    #[test]
    fn test_swipe_end_is_clamped_and_duration_capped() {
        let m = mapper();
        let mut s = ScrollTranslator::new(ScrollConfig::default());
        let t0 = Instant::now();
        s.wheel(&m, ScreenPoint::new(250.0, 10.0), 0.0, -5_000.0, t0);

        let Some(DeviceCommand::Swipe { to, duration_ms, .. }) = s.poll(&m, after(t0, 200)) else {
            panic!("expected a swipe");
        };

        assert_eq!(to, DevicePoint::new(500, 1999));
        assert_eq!(duration_ms, 400);
    }

    #[test]
    fn test_anchor_is_smoothed_towards_new_positions() {
        // Arrange – second event 100 device px to the right of the first
        let m = mapper();
        let mut s = ScrollTranslator::new(ScrollConfig::default());
        let t0 = Instant::now();
        s.wheel(&m, ScreenPoint::new(200.0, 500.0), 0.0, 25.0, t0);
        s.wheel(&m, ScreenPoint::new(250.0, 500.0), 0.0, 25.0, after(t0, 10));

        // Act
        let swipe = s.poll(&m, after(t0, 200));

        // Assert – 400 + 0.3 * (500 - 400) = 430
        let Some(DeviceCommand::Swipe { from, .. }) = swipe else {
            panic!("expected a swipe");
        };
        assert_eq!(from, DevicePoint::new(430, 1000));
    }

    #[test]
    fn test_wheel_over_letterbox_is_ignored() {
        let mut m = mapper();
        m.set_viewport(Some(Size::new(1000, 1000)));
        let mut s = ScrollTranslator::new(ScrollConfig::default());

        s.wheel(&m, ScreenPoint::new(10.0, 500.0), 0.0, 50.0, Instant::now());

        assert!(!s.is_pending());
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn test_cancelled_out_burst_emits_nothing() {
        let m = mapper();
        let mut s = ScrollTranslator::new(ScrollConfig::default());
        let t0 = Instant::now();
        s.wheel(&m, ScreenPoint::new(250.0, 500.0), 0.0, 40.0, t0);
        s.wheel(&m, ScreenPoint::new(250.0, 500.0), 0.0, -40.0, after(t0, 10));

        assert_eq!(s.poll(&m, after(t0, 500)), None);
        assert!(!s.is_pending());
    }
}
