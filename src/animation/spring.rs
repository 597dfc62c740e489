use crate::foundation::error::{MotionError, MotionResult, ensure_finite};

/// Largest integration step. Longer frame intervals (backgrounded tab, long pause) are truncated
/// to this so a single tick cannot destabilize the integrator.
pub const MAX_STEP_SECS: f64 = 1.0 / 30.0;

/// Damped harmonic oscillator parameters.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpringConfig {
    pub stiffness: f64,
    pub damping: f64,
    pub mass: f64,
    pub rest_delta: f64,
    pub rest_speed: f64,
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self {
            stiffness: 100.0,
            damping: 10.0,
            mass: 1.0,
            rest_delta: 0.01,
            rest_speed: 0.01,
        }
    }
}

impl SpringConfig {
    pub fn validate(&self) -> MotionResult<()> {
        ensure_finite("spring stiffness", self.stiffness)?;
        ensure_finite("spring damping", self.damping)?;
        ensure_finite("spring mass", self.mass)?;
        ensure_finite("spring restDelta", self.rest_delta)?;
        ensure_finite("spring restSpeed", self.rest_speed)?;
        if self.stiffness <= 0.0 {
            return Err(MotionError::configuration("spring stiffness must be > 0"));
        }
        if self.damping < 0.0 {
            return Err(MotionError::configuration("spring damping must be >= 0"));
        }
        if self.mass <= 0.0 {
            return Err(MotionError::configuration("spring mass must be > 0"));
        }
        if self.rest_delta <= 0.0 || self.rest_speed <= 0.0 {
            return Err(MotionError::configuration(
                "spring restDelta and restSpeed must be > 0",
            ));
        }
        Ok(())
    }
}

/// Integrator state owned by one spring node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpringState {
    config: SpringConfig,
    position: f64,
    velocity: f64,
    target: f64,
    settled: bool,
}

impl SpringState {
    /// A spring at rest on `initial`.
    pub fn new(config: SpringConfig, initial: f64) -> MotionResult<Self> {
        Self::with_motion(config, initial, 0.0, initial)
    }

    /// A spring with explicit initial conditions. It is armed unless already at rest on target.
    pub fn with_motion(
        config: SpringConfig,
        position: f64,
        velocity: f64,
        target: f64,
    ) -> MotionResult<Self> {
        config.validate()?;
        ensure_finite("spring position", position)?;
        ensure_finite("spring velocity", velocity)?;
        ensure_finite("spring target", target)?;
        Ok(Self {
            config,
            position,
            velocity,
            target,
            settled: position == target && velocity == 0.0,
        })
    }

    pub fn config(&self) -> &SpringConfig {
        &self.config
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    /// Moves the target, keeping position and velocity as the new initial condition.
    ///
    /// Returns `true` when the spring is armed after the call.
    pub fn retarget(&mut self, target: f64) -> bool {
        self.retarget_with_slack(target, 0.0)
    }

    /// Like [`Self::retarget`], but a settled spring whose new target lies within `slack` of its
    /// position snaps onto the target instead of re-arming.
    pub fn retarget_with_slack(&mut self, target: f64, slack: f64) -> bool {
        if !target.is_finite() || target == self.target {
            return !self.settled;
        }
        if self.settled && (target - self.position).abs() < slack {
            self.position = target;
            self.target = target;
            return false;
        }
        self.target = target;
        self.settled = false;
        true
    }

    /// Places the spring at rest on `value`.
    pub fn jump(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.position = value;
        self.target = value;
        self.velocity = 0.0;
        self.settled = true;
    }

    /// Advances the spring by `dt` seconds (capped at [`MAX_STEP_SECS`]).
    ///
    /// The interval is split into semi-implicit Euler sub-steps short enough for the configured
    /// stiffness and damping. Returns `Ok(true)` when position or velocity changed; a settled
    /// spring never changes. If the state still turns non-finite the spring snaps onto its
    /// target and a transient error is returned.
    pub fn step(&mut self, dt: f64) -> MotionResult<bool> {
        if self.settled || dt.is_nan() || dt <= 0.0 {
            return Ok(false);
        }
        let dt = dt.min(MAX_STEP_SECS);
        let SpringConfig {
            stiffness,
            damping,
            mass,
            rest_delta,
            rest_speed,
        } = self.config;

        let n = substeps(&self.config, dt);
        let h = dt / f64::from(n);
        for _ in 0..n {
            let accel = (stiffness * (self.target - self.position) - damping * self.velocity) / mass;
            self.velocity += accel * h;
            self.position += self.velocity * h;
        }

        if !(self.position.is_finite() && self.velocity.is_finite()) {
            self.snap();
            return Err(MotionError::transient_input(format!(
                "spring diverged, snapped to target {}",
                self.target
            )));
        }
        if (self.target - self.position).abs() < rest_delta && self.velocity.abs() < rest_speed {
            self.snap();
        }
        Ok(true)
    }

    fn snap(&mut self) {
        self.position = self.target;
        self.velocity = 0.0;
        self.settled = true;
    }
}

/// Upper bound on sub-steps per frame.
const MAX_SUBSTEPS: u32 = 1024;

/// Sub-steps needed so each one keeps `omega * h <= 0.5` and `damping * h / mass <= 1`.
fn substeps(config: &SpringConfig, dt: f64) -> u32 {
    let omega = (config.stiffness / config.mass).sqrt();
    let mut h = 0.5 / omega;
    if config.damping > 0.0 {
        h = h.min(config.mass / config.damping);
    }
    // NaN saturates to 0 in the cast.
    ((dt / h).ceil().min(f64::from(MAX_SUBSTEPS)) as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 1.0 / 60.0;

    fn stiff() -> SpringConfig {
        SpringConfig {
            stiffness: 60.0,
            damping: 30.0,
            mass: 1.0,
            rest_delta: 0.001,
            rest_speed: 0.01,
        }
    }

    #[test]
    fn rejects_bad_config() {
        let bad = [
            SpringConfig {
                stiffness: f64::NAN,
                ..SpringConfig::default()
            },
            SpringConfig {
                stiffness: 0.0,
                ..SpringConfig::default()
            },
            SpringConfig {
                mass: 0.0,
                ..SpringConfig::default()
            },
            SpringConfig {
                damping: -1.0,
                ..SpringConfig::default()
            },
            SpringConfig {
                rest_delta: f64::INFINITY,
                ..SpringConfig::default()
            },
        ];
        for cfg in bad {
            assert!(SpringState::new(cfg, 0.0).is_err(), "{cfg:?}");
        }
    }

    #[test]
    fn step_jump_settles_without_instability() {
        let mut s = SpringState::new(stiff(), 0.0).unwrap();
        assert!(s.retarget(1.0));

        let mut max_pos = f64::NEG_INFINITY;
        let mut ticks = 0;
        while !s.is_settled() {
            s.step(DT).unwrap();
            max_pos = max_pos.max(s.position());
            ticks += 1;
            assert!(ticks < 600, "spring failed to settle");
        }
        assert!(max_pos <= 1.05, "overshoot {max_pos}");
        assert_eq!(s.position(), 1.0);
        assert_eq!(s.velocity(), 0.0);
    }

    #[test]
    fn settled_spring_is_idempotent() {
        let mut s = SpringState::new(stiff(), 0.25).unwrap();
        let before = s;
        for _ in 0..10 {
            assert!(!s.step(DT).unwrap());
        }
        assert_eq!(s, before);
        assert!(!s.retarget(0.25));
    }

    #[test]
    fn converges_from_arbitrary_motion() {
        for (pos, vel) in [(-500.0, 1000.0), (3.0, -250.0), (1e4, 0.0)] {
            let mut s =
                SpringState::with_motion(SpringConfig::default(), pos, vel, 3.0).unwrap();
            let mut ticks = 0;
            while !s.is_settled() {
                s.step(DT).unwrap();
                ticks += 1;
                assert!(ticks < 5000, "no convergence from ({pos}, {vel})");
            }
            assert_eq!(s.position(), 3.0);
        }
    }

    #[test]
    fn retarget_preserves_motion() {
        let mut s = SpringState::new(SpringConfig::default(), 0.0).unwrap();
        s.retarget(10.0);
        for _ in 0..5 {
            s.step(DT).unwrap();
        }
        let (p, v) = (s.position(), s.velocity());
        assert!(v != 0.0);
        s.retarget(-4.0);
        assert_eq!(s.position(), p);
        assert_eq!(s.velocity(), v);
        assert_eq!(s.target(), -4.0);
    }

    #[test]
    fn long_frames_are_capped() {
        let mut a = SpringState::new(SpringConfig::default(), 0.0).unwrap();
        let mut b = a;
        a.retarget(1.0);
        b.retarget(1.0);
        a.step(5.0).unwrap();
        b.step(MAX_STEP_SECS).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn slack_skips_redundant_rearm() {
        let mut s = SpringState::new(stiff(), 1.0).unwrap();
        assert!(!s.retarget_with_slack(1.004, 0.01));
        assert!(s.is_settled());
        assert_eq!(s.position(), 1.004);
        assert!(s.retarget_with_slack(1.5, 0.01));
    }

    #[test]
    fn non_positive_dt_is_a_no_op() {
        let mut s = SpringState::new(stiff(), 0.0).unwrap();
        s.retarget(1.0);
        assert!(!s.step(0.0).unwrap());
        assert!(!s.step(-1.0).unwrap());
        assert!(!s.step(f64::NAN).unwrap());
        assert_eq!(s.position(), 0.0);
    }

    #[test]
    fn very_stiff_spring_stays_bounded_at_capped_dt() {
        let cfg = SpringConfig {
            stiffness: 10_000.0,
            damping: 10.0,
            mass: 1.0,
            rest_delta: 0.001,
            rest_speed: 0.01,
        };
        let mut s = SpringState::new(cfg, 0.0).unwrap();
        s.retarget(1.0);

        let mut ticks = 0;
        while !s.is_settled() {
            assert!(s.step(MAX_STEP_SECS).unwrap());
            assert!(s.position().abs() < 2.5, "position {}", s.position());
            assert!(s.velocity().is_finite());
            ticks += 1;
            assert!(ticks < 600, "stiff spring failed to settle");
        }
        assert_eq!(s.position(), 1.0);
        assert_eq!(s.velocity(), 0.0);
    }

    #[test]
    fn diverging_spring_snaps_to_target() {
        let cfg = SpringConfig {
            stiffness: 1e12,
            damping: 0.0,
            ..SpringConfig::default()
        };
        let mut s = SpringState::new(cfg, 0.0).unwrap();
        s.retarget(1.0);

        let err = s.step(MAX_STEP_SECS).unwrap_err();
        assert!(!err.is_fatal());
        assert!(s.is_settled());
        assert_eq!(s.position(), 1.0);
        assert_eq!(s.velocity(), 0.0);
        assert!(!s.step(MAX_STEP_SECS).unwrap());
    }
}
