use std::time::{Duration, Instant};

use glam::{Quat, Vec3};

pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Transform {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Builds a transform from wire arrays. A degenerate quaternion maps to
    /// identity instead of NaN.
    pub fn from_arrays(position: [f32; 3], rotation: [f32; 4]) -> Self {
        let rotation = Quat::from_array(rotation);
        let rotation = if rotation.length_squared() > f32::EPSILON {
            rotation.normalize()
        } else {
            Quat::IDENTITY
        };

        Self {
            position: Vec3::from_array(position),
            rotation,
        }
    }
}

/// Smooths one entity between discrete network updates.
///
/// Each update starts a new segment from wherever the entity is currently
/// drawn to the received target, stretched over the measured time between
/// the two most recent updates.
#[derive(Debug, Clone)]
pub struct Interpolation {
    from: Transform,
    to: Transform,
    last_update: Instant,
    interval: Duration,
}

impl Interpolation {
    pub fn new(initial: Transform, now: Instant, initial_interval: Duration) -> Self {
        Self {
            from: initial,
            to: initial,
            last_update: now,
            interval: initial_interval.max(MIN_INTERVAL),
        }
    }

    pub fn push(&mut self, target: Transform, now: Instant, max_interval: Duration) {
        let current = self.sample(now);
        let measured = now.saturating_duration_since(self.last_update);

        self.interval = measured.clamp(MIN_INTERVAL, max_interval.max(MIN_INTERVAL));
        self.from = current;
        self.to = target;
        self.last_update = now;
    }

    /// Jumps straight to `target` with no blending.
    pub fn reset(&mut self, target: Transform, now: Instant) {
        self.from = target;
        self.to = target;
        self.last_update = now;
    }

    pub fn progress(&self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.last_update);
        (elapsed.as_secs_f32() / self.interval.as_secs_f32()).min(1.0)
    }

    pub fn sample(&self, now: Instant) -> Transform {
        let t = self.progress(now);
        if t >= 1.0 {
            return self.to;
        }

        Transform {
            position: self.from.position.lerp(self.to.position, t),
            rotation: self.from.rotation.slerp(self.to.rotation, t),
        }
    }

    pub fn target(&self) -> Transform {
        self.to
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: Duration = Duration::from_secs(1);

    fn at(x: f32) -> Transform {
        Transform::new(Vec3::new(x, 0.0, 0.0), Quat::IDENTITY)
    }

    #[test]
    fn midpoint_and_clamp() {
        let start = Instant::now();
        let mut interp = Interpolation::new(at(0.0), start, Duration::from_millis(100));

        let arrival = start + Duration::from_millis(100);
        interp.push(at(10.0), arrival, MAX);
        assert_eq!(interp.interval(), Duration::from_millis(100));

        let half = interp.sample(arrival + Duration::from_millis(50));
        assert!((half.position.x - 5.0).abs() < 1e-4);

        let done = interp.sample(arrival + Duration::from_millis(100));
        assert_eq!(done, at(10.0));

        let late = interp.sample(arrival + Duration::from_secs(5));
        assert_eq!(late, at(10.0));
        assert_eq!(interp.progress(arrival + Duration::from_secs(5)), 1.0);
    }

    #[test]
    fn new_segment_starts_from_drawn_position() {
        let start = Instant::now();
        let mut interp = Interpolation::new(at(0.0), start, Duration::from_millis(100));
        let first = start + Duration::from_millis(100);
        interp.push(at(10.0), first, MAX);

        // Halfway through, a new update redirects the tank.
        let second = first + Duration::from_millis(50);
        interp.push(at(20.0), second, MAX);

        let now = interp.sample(second);
        assert!((now.position.x - 5.0).abs() < 1e-4);
        assert_eq!(interp.interval(), Duration::from_millis(50));
    }

    #[test]
    fn interval_is_clamped() {
        let start = Instant::now();
        let mut interp = Interpolation::new(at(0.0), start, Duration::from_millis(100));

        interp.push(at(1.0), start, MAX);
        assert_eq!(interp.interval(), MIN_INTERVAL);

        interp.push(at(2.0), start + Duration::from_secs(30), MAX);
        assert_eq!(interp.interval(), MAX);
    }

    #[test]
    fn rotation_takes_the_short_way() {
        let start = Instant::now();
        let a = Quat::from_rotation_y(0.1);
        // Same orientation as `a` rotated slightly, expressed in the
        // opposite hemisphere.
        let b = -Quat::from_rotation_y(0.3);

        let mut interp = Interpolation::new(
            Transform::new(Vec3::ZERO, a),
            start,
            Duration::from_millis(100),
        );
        let arrival = start + Duration::from_millis(100);
        interp.push(Transform::new(Vec3::ZERO, b), arrival, MAX);

        let mid = interp.sample(arrival + Duration::from_millis(50)).rotation;
        let expected = Quat::from_rotation_y(0.2);
        assert!(mid.dot(expected).abs() > 0.9999);
    }

    #[test]
    fn degenerate_rotation_becomes_identity() {
        let t = Transform::from_arrays([1.0, 2.0, 3.0], [0.0; 4]);
        assert_eq!(t.rotation, Quat::IDENTITY);
        assert_eq!(t.position, Vec3::new(1.0, 2.0, 3.0));
    }
}
