use crate::foundation::error::{MotionError, MotionResult};

/// Easing curve applied inside one mapping segment.
///
/// Named curves follow the CSS/`framer-motion` definitions (`easeOut` is
/// `cubic-bezier(0, 0, 0.58, 1)`).
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Ease {
    #[default]
    Linear,
    EaseIn,
    EaseOut,
    EaseInOut,
    CubicBezier([f64; 4]),
}

impl Ease {
    pub fn validate(self) -> MotionResult<()> {
        if let Self::CubicBezier([x1, y1, x2, y2]) = self {
            if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
                return Err(MotionError::configuration(
                    "cubicBezier control points must be finite",
                ));
            }
            if !(0.0..=1.0).contains(&x1) || !(0.0..=1.0).contains(&x2) {
                return Err(MotionError::configuration(
                    "cubicBezier x control points must lie in [0, 1]",
                ));
            }
        }
        Ok(())
    }

    /// Maps `t` in `[0, 1]` to eased progress. Inputs outside the unit interval are clamped.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::EaseIn => cubic_bezier(t, 0.42, 0.0, 1.0, 1.0),
            Self::EaseOut => cubic_bezier(t, 0.0, 0.0, 0.58, 1.0),
            Self::EaseInOut => cubic_bezier(t, 0.42, 0.0, 0.58, 1.0),
            Self::CubicBezier([x1, y1, x2, y2]) => cubic_bezier(t, x1, y1, x2, y2),
        }
    }
}

fn cubic_bezier(x: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    fn curve(a1: f64, a2: f64, t: f64) -> f64 {
        let omt = 1.0 - t;
        3.0 * omt * omt * t * a1 + 3.0 * omt * t * t * a2 + t * t * t
    }
    fn slope(a1: f64, a2: f64, t: f64) -> f64 {
        let omt = 1.0 - t;
        3.0 * omt * omt * a1 + 6.0 * omt * t * (a2 - a1) + 3.0 * t * t * (1.0 - a2)
    }

    // Solve curve_x(u) = x with Newton steps, falling back to bisection when Newton stalls.
    // Both loops are fixed length.
    let mut u = x;
    for _ in 0..8 {
        let d = slope(x1, x2, u);
        if d.abs() < 1e-7 {
            break;
        }
        u = (u - (curve(x1, x2, u) - x) / d).clamp(0.0, 1.0);
    }

    if (curve(x1, x2, u) - x).abs() > 1e-7 {
        let mut lo = 0.0;
        let mut hi = 1.0;
        for _ in 0..32 {
            u = 0.5 * (lo + hi);
            if curve(x1, x2, u) < x {
                lo = u;
            } else {
                hi = u;
            }
        }
        u = 0.5 * (lo + hi);
    }

    curve(y1, y2, u)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Ease; 5] = [
        Ease::Linear,
        Ease::EaseIn,
        Ease::EaseOut,
        Ease::EaseInOut,
        Ease::CubicBezier([0.25, 0.1, 0.25, 1.0]),
    ];

    #[test]
    fn endpoints_are_stable() {
        for ease in ALL {
            assert_eq!(ease.apply(0.0), 0.0);
            assert_eq!(ease.apply(1.0), 1.0);
            assert_eq!(ease.apply(-3.0), 0.0);
            assert_eq!(ease.apply(7.0), 1.0);
        }
    }

    #[test]
    fn monotonic_spot_check() {
        for ease in ALL {
            let a = ease.apply(0.25);
            let b = ease.apply(0.5);
            let c = ease.apply(0.75);
            assert!(a < b, "{ease:?}");
            assert!(b < c, "{ease:?}");
        }
    }

    #[test]
    fn ease_out_leads_linear() {
        assert!(Ease::EaseOut.apply(0.3) > 0.3);
        assert!(Ease::EaseIn.apply(0.3) < 0.3);
    }

    #[test]
    fn parses_camel_case_names() {
        let e: Ease = serde_json::from_str("\"easeOut\"").unwrap();
        assert_eq!(e, Ease::EaseOut);
        let e: Ease = serde_json::from_str("{\"cubicBezier\": [0.4, 0.0, 0.2, 1.0]}").unwrap();
        assert!(matches!(e, Ease::CubicBezier(_)));
    }

    #[test]
    fn rejects_out_of_range_control_points() {
        assert!(Ease::CubicBezier([1.5, 0.0, 0.2, 1.0]).validate().is_err());
        assert!(Ease::CubicBezier([0.5, f64::NAN, 0.2, 1.0]).validate().is_err());
        assert!(Ease::EaseInOut.validate().is_ok());
    }
}
