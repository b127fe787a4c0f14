use super::scene::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    #[default]
    Linear,
    QuadIn,
    QuadOut,
    CubicIn,
    CubicOut,
    SineInOut,
}

impl Easing {
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::QuadIn => t * t,
            Self::QuadOut => 1.0 - (1.0 - t) * (1.0 - t),
            Self::CubicIn => t * t * t,
            Self::CubicOut => 1.0 - (1.0 - t).powi(3),
            Self::SineInOut => -((std::f32::consts::PI * t).cos() - 1.0) / 2.0,
        }
    }
}

pub trait Lerp: Copy {
    fn lerp(self, to: Self, t: f32) -> Self;
}

impl Lerp for f32 {
    fn lerp(self, to: Self, t: f32) -> Self {
        self + (to - self) * t
    }
}

impl Lerp for Vec3 {
    fn lerp(self, to: Self, t: f32) -> Self {
        self + (to - self) * t
    }
}

/// Fixed-duration interpolation driven by explicit time steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tween<T: Lerp> {
    from: T,
    to: T,
    duration: f32,
    elapsed: f32,
    easing: Easing,
}

impl<T: Lerp> Tween<T> {
    pub fn new(from: T, to: T, duration_seconds: f32, easing: Easing) -> Self {
        Self {
            from,
            to,
            duration: duration_seconds.max(0.0),
            elapsed: 0.0,
            easing,
        }
    }

    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.duration).min(1.0)
        }
    }

    pub fn value(&self) -> T {
        self.from.lerp(self.to, self.easing.apply(self.progress()))
    }

    pub fn target(&self) -> T {
        self.to
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Advances the tween; once it completes, returns the part of `dt` that
    /// was not consumed so a follow-up phase can start without drift.
    pub fn advance(&mut self, dt: f32) -> Option<f32> {
        let dt = dt.max(0.0);
        let remaining = self.duration - self.elapsed;
        if dt >= remaining {
            self.elapsed = self.duration;
            return Some(dt - remaining.max(0.0));
        }
        self.elapsed += dt;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn easing_curves_hit_endpoints() {
        for easing in [
            Easing::Linear,
            Easing::QuadIn,
            Easing::QuadOut,
            Easing::CubicIn,
            Easing::CubicOut,
            Easing::SineInOut,
        ] {
            assert!(easing.apply(0.0).abs() < 1e-6, "{easing:?}");
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-6, "{easing:?}");
        }
        assert!(Easing::QuadOut.apply(0.5) > 0.5);
        assert!(Easing::QuadIn.apply(0.5) < 0.5);
    }

    #[test]
    fn tween_reports_leftover_time_on_completion() {
        let mut tween = Tween::new(0.0_f32, 10.0, 0.5, Easing::Linear);
        assert_eq!(tween.advance(0.25), None);
        assert!((tween.value() - 5.0).abs() < 1e-5);
        let leftover = tween.advance(0.4).expect("finished");
        assert!((leftover - 0.15).abs() < 1e-5);
        assert_eq!(tween.value(), 10.0);
        assert!(tween.is_finished());
    }

    #[test]
    fn zero_duration_tween_finishes_immediately() {
        let mut tween = Tween::new(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0), 0.0, Easing::QuadOut);
        assert_eq!(tween.advance(0.0), Some(0.0));
        assert_eq!(tween.value(), Vec3::new(1.0, 2.0, 3.0));
    }
}
