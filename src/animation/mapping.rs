use crate::animation::ease::Ease;
use crate::foundation::error::{MotionError, MotionResult, ensure_finite};
use smallvec::SmallVec;

/// Two-point linear range mapping.
///
/// Constructed only through [`MappingSpec::new`], which rejects a degenerate domain, so
/// [`MappingSpec::map`] never divides by zero.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MappingSpec {
    domain_low: f64,
    domain_high: f64,
    range_low: f64,
    range_high: f64,
    clamp: bool,
}

impl MappingSpec {
    pub fn new(domain: [f64; 2], range: [f64; 2], clamp: bool) -> MotionResult<Self> {
        let [domain_low, domain_high] = domain;
        let [range_low, range_high] = range;
        ensure_finite("domain low", domain_low)?;
        ensure_finite("domain high", domain_high)?;
        ensure_finite("range low", range_low)?;
        ensure_finite("range high", range_high)?;
        if domain_low == domain_high {
            return Err(MotionError::configuration(format!(
                "degenerate mapping domain [{domain_low}, {domain_high}]"
            )));
        }
        Ok(Self {
            domain_low,
            domain_high,
            range_low,
            range_high,
            clamp,
        })
    }

    pub fn domain(&self) -> [f64; 2] {
        [self.domain_low, self.domain_high]
    }

    pub fn range(&self) -> [f64; 2] {
        [self.range_low, self.range_high]
    }

    pub fn clamp(&self) -> bool {
        self.clamp
    }

    pub fn map(&self, value: f64) -> f64 {
        let t = (value - self.domain_low) / (self.domain_high - self.domain_low);
        let (lo, hi) = (self.range_low, self.range_high);
        if !self.clamp {
            return lo + t * (hi - lo);
        }
        // NaN and anything at or before the domain start resolve to the range start.
        if t.is_nan() || t <= 0.0 {
            return lo;
        }
        if t >= 1.0 {
            return hi;
        }
        (lo + t * (hi - lo)).clamp(lo.min(hi), lo.max(hi))
    }
}

/// Free-function form of [`MappingSpec::map`].
pub fn map(value: f64, spec: &MappingSpec) -> f64 {
    spec.map(value)
}

/// Multi-segment mapping: `N` breakpoints define `N - 1` segments.
///
/// Inputs must be strictly increasing. Within a segment the optional [`Ease`] shapes the
/// interpolation; outside the breakpoints the first/last segment is extrapolated linearly, or the
/// end value is held when `clamp` is set.
#[derive(Clone, Debug, PartialEq)]
pub struct PiecewiseMapping {
    input: SmallVec<[f64; 4]>,
    output: SmallVec<[f64; 4]>,
    clamp: bool,
    ease: Ease,
}

impl PiecewiseMapping {
    pub fn new(input: &[f64], output: &[f64], clamp: bool) -> MotionResult<Self> {
        Self::with_ease(input, output, clamp, Ease::Linear)
    }

    pub fn with_ease(input: &[f64], output: &[f64], clamp: bool, ease: Ease) -> MotionResult<Self> {
        if input.len() < 2 {
            return Err(MotionError::configuration(
                "piecewise mapping needs at least two breakpoints",
            ));
        }
        if input.len() != output.len() {
            return Err(MotionError::configuration(format!(
                "piecewise mapping has {} inputs but {} outputs",
                input.len(),
                output.len()
            )));
        }
        for &v in input.iter().chain(output) {
            ensure_finite("breakpoint", v)?;
        }
        if !input.windows(2).all(|w| w[0] < w[1]) {
            return Err(MotionError::configuration(
                "piecewise mapping inputs must be strictly increasing",
            ));
        }
        ease.validate()?;
        Ok(Self {
            input: input.iter().copied().collect(),
            output: output.iter().copied().collect(),
            clamp,
            ease,
        })
    }

    pub fn map(&self, value: f64) -> f64 {
        let n = self.input.len();
        if value.is_nan() {
            return if self.clamp { self.output[0] } else { value };
        }

        let idx = self.input.partition_point(|&x| x <= value);
        if idx == 0 {
            if self.clamp {
                return self.output[0];
            }
            return self.extrapolate(0, value);
        }
        if idx >= n {
            if self.clamp || value == self.input[n - 1] {
                return self.output[n - 1];
            }
            return self.extrapolate(n - 2, value);
        }

        let (a, b) = (idx - 1, idx);
        let t = (value - self.input[a]) / (self.input[b] - self.input[a]);
        let te = self.ease.apply(t);
        let (y0, y1) = (self.output[a], self.output[b]);
        let y = y0 + (y1 - y0) * te;
        // Overshooting curves (y control points outside [0, 1]) stay inside the segment.
        if self.clamp { y.clamp(y0.min(y1), y0.max(y1)) } else { y }
    }

    fn extrapolate(&self, seg: usize, value: f64) -> f64 {
        let (x0, x1) = (self.input[seg], self.input[seg + 1]);
        let (y0, y1) = (self.output[seg], self.output[seg + 1]);
        y0 + (value - x0) / (x1 - x0) * (y1 - y0)
    }
}

impl From<MappingSpec> for PiecewiseMapping {
    fn from(spec: MappingSpec) -> Self {
        // A reversed domain is reordered so inputs stay increasing.
        let (input, output) = if spec.domain_low < spec.domain_high {
            (
                [spec.domain_low, spec.domain_high],
                [spec.range_low, spec.range_high],
            )
        } else {
            (
                [spec.domain_high, spec.domain_low],
                [spec.range_high, spec.range_low],
            )
        };
        Self {
            input: input.into_iter().collect(),
            output: output.into_iter().collect(),
            clamp: spec.clamp,
            ease: Ease::Linear,
        }
    }
}

/// Runtime mapping carried by a graph node.
#[derive(Clone, Debug, PartialEq)]
pub enum Mapping {
    Linear(MappingSpec),
    Piecewise(PiecewiseMapping),
}

impl Mapping {
    pub fn map(&self, value: f64) -> f64 {
        match self {
            Self::Linear(spec) => spec.map(value),
            Self::Piecewise(pw) => pw.map(value),
        }
    }
}

impl From<MappingSpec> for Mapping {
    fn from(spec: MappingSpec) -> Self {
        Self::Linear(spec)
    }
}

impl From<PiecewiseMapping> for Mapping {
    fn from(pw: PiecewiseMapping) -> Self {
        Self::Piecewise(pw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(range: [f64; 2], clamp: bool) -> MappingSpec {
        MappingSpec::new([0.0, 1.0], range, clamp).unwrap()
    }

    #[test]
    fn degenerate_domain_is_rejected() {
        let err = MappingSpec::new([0.4, 0.4], [0.0, 1.0], true).unwrap_err();
        assert!(matches!(err, MotionError::Configuration(_)));
        assert!(MappingSpec::new([0.0, f64::INFINITY], [0.0, 1.0], true).is_err());
    }

    #[test]
    fn clamped_scenario_values() {
        let spec = unit([0.05, 0.97], true);
        assert_eq!(map(-0.5, &spec), 0.05);
        assert_eq!(map(1.5, &spec), 0.97);
        assert!((map(0.5, &spec) - 0.51).abs() < 1e-12);
    }

    #[test]
    fn clamp_absorbs_non_finite_inputs() {
        let spec = unit([10.0, -10.0], true);
        assert_eq!(spec.map(f64::INFINITY), -10.0);
        assert_eq!(spec.map(f64::NEG_INFINITY), 10.0);
        assert_eq!(spec.map(f64::NAN), 10.0);
    }

    #[test]
    fn clamped_output_stays_in_range() {
        let spec = MappingSpec::new([-3.0, 7.0], [2.0, -4.0], true).unwrap();
        let mut v = -50.0;
        while v <= 50.0 {
            let out = spec.map(v);
            assert!((-4.0..=2.0).contains(&out), "map({v}) = {out}");
            v += 0.37;
        }
    }

    #[test]
    fn unclamped_is_monotonic_and_extrapolates() {
        let spec = unit([1.0, 1.1], false);
        let mut prev = f64::NEG_INFINITY;
        let mut v = -2.0;
        while v <= 3.0 {
            let out = spec.map(v);
            assert!(out >= prev);
            prev = out;
            v += 0.01;
        }
        assert!((spec.map(2.0) - 1.2).abs() < 1e-12);
    }

    #[test]
    fn threshold_reveal() {
        let reveal = PiecewiseMapping::new(&[0.3, 0.32], &[0.0, 1.0], true).unwrap();
        assert_eq!(reveal.map(0.29), 0.0);
        assert_eq!(reveal.map(0.32), 1.0);
        assert_eq!(reveal.map(0.5), 1.0);
        let mid = reveal.map(0.31);
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn multi_segment_hits_every_breakpoint() {
        let pw = PiecewiseMapping::new(&[0.0, 0.5, 0.8, 1.0], &[0.0, 1.0, 1.0, 0.0], false).unwrap();
        assert_eq!(pw.map(0.0), 0.0);
        assert_eq!(pw.map(0.5), 1.0);
        assert_eq!(pw.map(0.65), 1.0);
        assert_eq!(pw.map(1.0), 0.0);
        assert!((pw.map(1.1) - -0.5).abs() < 1e-12);
    }

    #[test]
    fn clamp_holds_overshooting_bezier_in_range() {
        let back = Ease::CubicBezier([0.34, 1.56, 0.64, 1.0]);
        let clamped = PiecewiseMapping::with_ease(&[0.0, 1.0], &[0.0, 1.0], true, back).unwrap();
        let free = PiecewiseMapping::with_ease(&[0.0, 1.0], &[0.0, 1.0], false, back).unwrap();
        let mut overshoot = false;
        for i in 0..=200 {
            let v = f64::from(i) / 200.0;
            let out = clamped.map(v);
            assert!((0.0..=1.0).contains(&out), "map({v}) = {out}");
            overshoot |= free.map(v) > 1.0;
        }
        assert!(overshoot);
    }

    #[test]
    fn eased_segment_keeps_endpoints() {
        let pw = PiecewiseMapping::with_ease(&[0.0, 1.0], &[0.0, 50.0], true, Ease::EaseOut)
            .unwrap();
        assert_eq!(pw.map(0.0), 0.0);
        assert_eq!(pw.map(1.0), 50.0);
        assert!(pw.map(0.5) > 25.0);
    }

    #[test]
    fn piecewise_validation() {
        assert!(PiecewiseMapping::new(&[0.0], &[1.0], true).is_err());
        assert!(PiecewiseMapping::new(&[0.0, 1.0], &[1.0], true).is_err());
        assert!(PiecewiseMapping::new(&[0.5, 0.5], &[0.0, 1.0], true).is_err());
        assert!(PiecewiseMapping::new(&[1.0, 0.0], &[0.0, 1.0], true).is_err());
    }

    #[test]
    fn reversed_domain_converts_to_increasing_breakpoints() {
        let spec = MappingSpec::new([1.0, 0.0], [0.0, 10.0], true).unwrap();
        let pw = PiecewiseMapping::from(spec);
        for v in [-1.0, 0.0, 0.25, 0.5, 1.0, 2.0] {
            assert!((pw.map(v) - spec.map(v)).abs() < 1e-12);
        }
    }
}
