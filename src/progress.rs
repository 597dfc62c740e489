//! Scroll progress sampling.
//!
//! A tracked region's progress runs from 0 at its start [`Intersection`] to 1 at its end
//! intersection. Both boundaries are closed: the start offset samples to exactly `0.0` and the end
//! offset to exactly `1.0`. Values outside `[0, 1]` are passed through unclamped.

use crate::foundation::core::RegionGeometry;
use crate::foundation::error::{MotionError, MotionResult};
use std::str::FromStr;

/// A point where a fraction along the region meets a fraction along the viewport.
///
/// Parsed from `framer-motion` style strings: `"start end"` means "the region's start meets the
/// viewport's end". Each token is `start` (0), `center` (0.5), `end` (1) or a number. A single
/// token applies to both sides.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Intersection {
    pub region: f64,
    pub viewport: f64,
}

impl Intersection {
    pub const fn new(region: f64, viewport: f64) -> Self {
        Self { region, viewport }
    }

    /// Scroll offset at which this intersection holds.
    pub fn scroll_offset(self, geometry: RegionGeometry) -> f64 {
        geometry.start + self.region * geometry.extent - self.viewport * geometry.viewport
    }
}

fn parse_edge(tok: &str) -> Result<f64, String> {
    match tok {
        "start" => Ok(0.0),
        "center" => Ok(0.5),
        "end" => Ok(1.0),
        other => match other.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(format!("unknown intersection edge \"{other}\"")),
        },
    }
}

impl FromStr for Intersection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let toks: Vec<&str> = s.split_whitespace().collect();
        match toks.as_slice() {
            [both] => {
                let v = parse_edge(both)?;
                Ok(Self::new(v, v))
            }
            [region, viewport] => Ok(Self::new(parse_edge(region)?, parse_edge(viewport)?)),
            _ => Err(format!("intersection \"{s}\" must have one or two edges")),
        }
    }
}

impl TryFrom<String> for Intersection {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Intersection> for String {
    fn from(i: Intersection) -> Self {
        format!("{} {}", i.region, i.viewport)
    }
}

/// How a region's scroll range is measured.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum OffsetMode {
    /// 0 when the region's leading edge enters the viewport, 1 when its trailing edge leaves.
    #[default]
    CrossViewport,
    /// 0 when the region's start reaches the viewport start, 1 when the scroll range over the
    /// region is exhausted (region end meets viewport end).
    Pinned,
    Custom([Intersection; 2]),
}

impl OffsetMode {
    pub fn intersections(self) -> [Intersection; 2] {
        match self {
            Self::CrossViewport => [Intersection::new(0.0, 1.0), Intersection::new(1.0, 0.0)],
            Self::Pinned => [Intersection::new(0.0, 0.0), Intersection::new(1.0, 1.0)],
            Self::Custom(pair) => pair,
        }
    }
}

impl serde::Serialize for OffsetMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Self::CrossViewport => serializer.serialize_str("cross-viewport"),
            Self::Pinned => serializer.serialize_str("pinned"),
            Self::Custom(pair) => serde::Serialize::serialize(pair, serializer),
        }
    }
}

impl<'de> serde::Deserialize<'de> for OffsetMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Named(String),
            Pair([Intersection; 2]),
        }

        match <Repr as serde::Deserialize>::deserialize(deserializer)? {
            Repr::Named(s) => match s.as_str() {
                "cross-viewport" => Ok(Self::CrossViewport),
                "pinned" => Ok(Self::Pinned),
                other => Err(serde::de::Error::custom(format!(
                    "unknown offset mode \"{other}\""
                ))),
            },
            Repr::Pair(pair) => Ok(Self::Custom(pair)),
        }
    }
}

/// Raw progress for `scroll`, or `None` when it is not a finite number (degenerate scroll range
/// or non-finite input).
pub fn progress_at(mode: OffsetMode, geometry: RegionGeometry, scroll: f64) -> Option<f64> {
    let [from, to] = mode.intersections();
    let s0 = from.scroll_offset(geometry);
    let s1 = to.scroll_offset(geometry);
    let span = s1 - s0;
    if span == 0.0 || !span.is_finite() {
        return None;
    }
    let p = (scroll - s0) / span;
    p.is_finite().then_some(p)
}

/// One sampled progress value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProgressSample {
    pub value: f64,
    /// The raw value was unusable and `value` is the last known-good progress.
    pub substituted: bool,
}

impl ProgressSample {
    /// True when the region is within its tracked range (closed at both ends).
    pub fn is_within(&self) -> bool {
        (0.0..=1.0).contains(&self.value)
    }
}

/// Stateful sampler for one mounted region.
#[derive(Clone, Debug)]
pub struct ProgressSampler {
    mode: OffsetMode,
    geometry: RegionGeometry,
    last_good: f64,
}

impl ProgressSampler {
    pub fn new(mode: OffsetMode, geometry: RegionGeometry) -> MotionResult<Self> {
        if !geometry.is_finite() {
            return Err(MotionError::configuration(format!(
                "region geometry must be finite, got {geometry:?}"
            )));
        }
        for i in mode.intersections() {
            if !i.region.is_finite() || !i.viewport.is_finite() {
                return Err(MotionError::configuration(
                    "offset intersections must be finite",
                ));
            }
        }
        Ok(Self {
            mode,
            geometry,
            last_good: 0.0,
        })
    }

    pub fn mode(&self) -> OffsetMode {
        self.mode
    }

    pub fn geometry(&self) -> RegionGeometry {
        self.geometry
    }

    pub fn last_good(&self) -> f64 {
        self.last_good
    }

    /// Replaces the region geometry. Non-finite geometry is rejected and the old one kept.
    pub fn set_geometry(&mut self, geometry: RegionGeometry) -> MotionResult<()> {
        if !geometry.is_finite() {
            return Err(MotionError::transient_input(format!(
                "non-finite region geometry {geometry:?}"
            )));
        }
        self.geometry = geometry;
        Ok(())
    }

    /// Samples progress at `scroll`. Unusable raw values are replaced by the last known-good one.
    pub fn sample(&mut self, scroll: f64) -> ProgressSample {
        match progress_at(self.mode, self.geometry, scroll) {
            Some(value) => {
                self.last_good = value;
                ProgressSample {
                    value,
                    substituted: false,
                }
            }
            None => ProgressSample {
                value: self.last_good,
                substituted: true,
            },
        }
    }
}
