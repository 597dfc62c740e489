//! JSON configuration surface.
//!
//! These are boundary types: they deserialize leniently, are validated into runtime specs
//! ([`MappingSpec`], [`SpringConfig`], [`ProceduralSpec`]) before anything is mounted, and never
//! reach the graph themselves.

use crate::animation::ease::Ease;
use crate::animation::mapping::{Mapping, MappingSpec, PiecewiseMapping};
use crate::animation::procedural::{ProceduralSpec, Waveform};
use crate::animation::spring::SpringConfig;
use crate::foundation::core::{RegionGeometry, RegionId};
use crate::foundation::error::{MotionError, MotionResult};
use crate::progress::OffsetMode;
use crate::scheduler::FrameScheduler;
use std::collections::BTreeSet;

fn unit_interval() -> Vec<f64> {
    vec![0.0, 1.0]
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProceduralConfig {
    pub frequency: f64,
    #[serde(default)]
    pub phase_offset: f64,
    pub amplitude: f64,
    #[serde(default)]
    pub waveform: Waveform,
}

impl ProceduralConfig {
    pub fn to_spec(&self) -> MotionResult<ProceduralSpec> {
        ProceduralSpec::new(
            self.waveform,
            self.frequency,
            self.phase_offset,
            self.amplitude,
        )
    }
}

/// One animated output of a region.
///
/// Chain order: progress, then `latchAt` (if set), then the domain/range mapping, then
/// `procedural`, then `spring`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackConfig {
    pub property: String,
    /// Input breakpoints. Two values form a plain linear mapping.
    #[serde(default = "unit_interval")]
    pub domain: Vec<f64>,
    #[serde(default = "unit_interval")]
    pub range: Vec<f64>,
    #[serde(default = "default_true")]
    pub clamp: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ease: Option<Ease>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spring: Option<SpringConfig>,
    /// Spring start position; defaults to at rest on its input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub procedural: Option<ProceduralConfig>,
    /// Reveal once: the mapping sees 0 until progress first reaches this value, then 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latch_at: Option<f64>,
}

impl TrackConfig {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            domain: unit_interval(),
            range: unit_interval(),
            clamp: true,
            ease: None,
            spring: None,
            initial: None,
            procedural: None,
            latch_at: None,
        }
    }

    fn compile(&self) -> MotionResult<CompiledTrack> {
        if self.property.trim().is_empty() {
            return Err(MotionError::configuration("track property must be non-empty"));
        }
        let ctx = |e: MotionError| match e {
            MotionError::Configuration(msg) => {
                MotionError::configuration(format!("track \"{}\": {msg}", self.property))
            }
            other => other,
        };

        let mapping: Mapping = match (self.domain.as_slice(), self.range.as_slice(), self.ease) {
            ([d0, d1], [r0, r1], None | Some(Ease::Linear)) => {
                MappingSpec::new([*d0, *d1], [*r0, *r1], self.clamp)
                    .map_err(ctx)?
                    .into()
            }
            (domain, range, ease) => {
                PiecewiseMapping::with_ease(domain, range, self.clamp, ease.unwrap_or_default())
                    .map_err(ctx)?
                    .into()
            }
        };

        let spring = match &self.spring {
            Some(cfg) => {
                cfg.validate().map_err(ctx)?;
                if let Some(v) = self.initial
                    && !v.is_finite()
                {
                    return Err(ctx(MotionError::configuration("initial must be finite")));
                }
                Some((*cfg, self.initial))
            }
            None if self.initial.is_some() => {
                return Err(ctx(MotionError::configuration(
                    "initial requires a spring",
                )));
            }
            None => None,
        };

        let procedural = self
            .procedural
            .as_ref()
            .map(ProceduralConfig::to_spec)
            .transpose()
            .map_err(ctx)?;

        if let Some(t) = self.latch_at
            && !t.is_finite()
        {
            return Err(ctx(MotionError::configuration("latchAt must be finite")));
        }

        Ok(CompiledTrack {
            property: self.property.clone(),
            latch: self.latch_at,
            mapping,
            procedural,
            spring,
        })
    }
}

#[derive(Clone, Debug)]
struct CompiledTrack {
    property: String,
    latch: Option<f64>,
    mapping: Mapping,
    procedural: Option<ProceduralSpec>,
    spring: Option<(SpringConfig, Option<f64>)>,
}

/// Animation of one region: an offset mode shared by one or more tracks.
///
/// Accepts either `{ "offsetMode": ..., "tracks": [...] }` or the flat single-track form
/// `{ "offsetMode": ..., "property": ..., "domain": ..., ... }`.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionConfig {
    pub offset_mode: OffsetMode,
    pub tracks: Vec<TrackConfig>,
}

impl<'de> serde::Deserialize<'de> for RegionConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase", deny_unknown_fields)]
        struct MultiDef {
            #[serde(default)]
            offset_mode: OffsetMode,
            tracks: Vec<TrackConfig>,
        }

        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct SingleDef {
            #[serde(default)]
            offset_mode: OffsetMode,
            #[serde(flatten)]
            track: TrackConfig,
        }

        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Multi(MultiDef),
            Single(SingleDef),
        }

        Ok(match <Repr as serde::Deserialize>::deserialize(deserializer)? {
            Repr::Multi(m) => Self {
                offset_mode: m.offset_mode,
                tracks: m.tracks,
            },
            Repr::Single(s) => Self {
                offset_mode: s.offset_mode,
                tracks: vec![s.track],
            },
        })
    }
}

impl RegionConfig {
    pub fn validate(&self) -> MotionResult<()> {
        self.compile().map(|_| ())
    }

    fn compile(&self) -> MotionResult<Vec<CompiledTrack>> {
        if self.tracks.is_empty() {
            return Err(MotionError::configuration("region has no tracks"));
        }
        let mut seen = BTreeSet::new();
        for t in &self.tracks {
            if !seen.insert(t.property.as_str()) {
                return Err(MotionError::configuration(format!(
                    "duplicate track property \"{}\"",
                    t.property
                )));
            }
        }
        self.tracks.iter().map(TrackConfig::compile).collect()
    }

    /// Validates, mounts a region and builds every track on its progress signal.
    ///
    /// Nothing is left mounted when an error is returned.
    pub fn mount(
        &self,
        sched: &mut FrameScheduler,
        name: &str,
        geometry: RegionGeometry,
    ) -> MotionResult<RegionId> {
        let tracks = self.compile()?;
        let id = sched.mount(name, self.offset_mode, geometry)?;
        if let Err(e) = build_tracks(sched, id, tracks) {
            sched.unmount(id)?;
            return Err(e);
        }
        Ok(id)
    }
}

fn build_tracks(
    sched: &mut FrameScheduler,
    id: RegionId,
    tracks: Vec<CompiledTrack>,
) -> MotionResult<()> {
    let mut b = sched.build(id)?;
    let progress = b.progress();
    for t in tracks {
        let mut sig = progress;
        if let Some(threshold) = t.latch {
            sig = b.latch(sig, threshold)?;
        }
        sig = b.map(sig, t.mapping)?;
        if let Some(spec) = t.procedural {
            sig = b.procedural(sig, spec)?;
        }
        sig = match t.spring {
            Some((cfg, Some(initial))) => b.spring_from(sig, cfg, initial)?,
            Some((cfg, None)) => b.spring(sig, cfg)?,
            None => sig,
        };
        b.bind(sig, t.property)?;
    }
    Ok(())
}

/// A region placed in a scene.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneRegion {
    pub name: String,
    pub start: f64,
    pub extent: f64,
    pub animation: RegionConfig,
}

/// A whole page: one viewport and the regions scrolling through it.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneConfig {
    pub viewport: f64,
    pub regions: Vec<SceneRegion>,
}

impl SceneConfig {
    /// Parses and validates a scene.
    pub fn from_json_str(s: &str) -> MotionResult<Self> {
        let scene: Self = serde_json::from_str(s)?;
        scene.validate()?;
        Ok(scene)
    }

    pub fn validate(&self) -> MotionResult<()> {
        if !(self.viewport.is_finite() && self.viewport > 0.0) {
            return Err(MotionError::configuration(format!(
                "viewport must be finite and > 0, got {}",
                self.viewport
            )));
        }
        let mut names = BTreeSet::new();
        for r in &self.regions {
            if r.name.trim().is_empty() {
                return Err(MotionError::configuration("region name must be non-empty"));
            }
            if !names.insert(r.name.as_str()) {
                return Err(MotionError::configuration(format!(
                    "duplicate region name \"{}\"",
                    r.name
                )));
            }
            if !self.geometry(r).is_finite() {
                return Err(MotionError::configuration(format!(
                    "region \"{}\" has non-finite geometry",
                    r.name
                )));
            }
            r.animation.validate().map_err(|e| match e {
                MotionError::Configuration(msg) => {
                    MotionError::configuration(format!("region \"{}\": {msg}", r.name))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    pub fn geometry(&self, region: &SceneRegion) -> RegionGeometry {
        RegionGeometry::new(region.start, region.extent, self.viewport)
    }

    /// Mounts every region in declaration order. Regions mounted before a failure stay mounted.
    pub fn mount_all(&self, sched: &mut FrameScheduler) -> MotionResult<Vec<RegionId>> {
        self.regions
            .iter()
            .map(|r| r.animation.mount(sched, &r.name, self.geometry(r)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_form_is_a_single_track() {
        let cfg: RegionConfig = serde_json::from_str(
            r#"{ "offsetMode": "pinned", "property": "opacity", "range": [0.05, 0.97] }"#,
        )
        .unwrap();
        assert_eq!(cfg.offset_mode, OffsetMode::Pinned);
        assert_eq!(cfg.tracks.len(), 1);
        let t = &cfg.tracks[0];
        assert_eq!(t.domain, vec![0.0, 1.0]);
        assert!(t.clamp);
        cfg.validate().unwrap();
    }

    #[test]
    fn multi_form_rejects_stray_keys_and_falls_back() {
        // A stray key at the top level is not a valid multi-track region nor a flat track.
        let err = serde_json::from_str::<RegionConfig>(r#"{ "tracks": [], "speed": 2 }"#);
        assert!(err.is_err());

        let cfg: RegionConfig = serde_json::from_str(
            r#"{ "tracks": [{ "property": "y", "range": [0, -120] }, { "property": "scale" }] }"#,
        )
        .unwrap();
        assert_eq!(cfg.offset_mode, OffsetMode::CrossViewport);
        assert_eq!(cfg.tracks.len(), 2);
    }

    #[test]
    fn degenerate_domain_fails_fast() {
        let mut t = TrackConfig::new("x");
        t.domain = vec![0.3, 0.3];
        let cfg = RegionConfig {
            offset_mode: OffsetMode::Pinned,
            tracks: vec![t],
        };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, MotionError::Configuration(_)));
        assert!(err.to_string().contains("track \"x\""));

        let mut sched = FrameScheduler::default();
        assert!(
            cfg.mount(&mut sched, "bad", RegionGeometry::new(0.0, 100.0, 50.0))
                .is_err()
        );
        assert_eq!(sched.regions().count(), 0);
    }

    #[test]
    fn bad_spring_and_dangling_initial_are_rejected() {
        let mut t = TrackConfig::new("x");
        t.spring = Some(SpringConfig {
            stiffness: f64::NAN,
            ..SpringConfig::default()
        });
        assert!(t.compile().is_err());

        let mut t = TrackConfig::new("x");
        t.initial = Some(1.0);
        assert!(t.compile().is_err());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let json = r#"{
            "viewport": 800,
            "regions": [
                { "name": "a", "start": 0, "extent": 400, "animation": { "property": "y" } },
                { "name": "a", "start": 400, "extent": 400, "animation": { "property": "y" } }
            ]
        }"#;
        let err = SceneConfig::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("duplicate region name"));
    }

    #[test]
    fn eased_breakpoints_compile_to_piecewise() {
        let mut t = TrackConfig::new("opacity");
        t.domain = vec![0.3, 0.32];
        t.ease = Some(Ease::EaseOut);
        let c = t.compile().unwrap();
        assert!(matches!(c.mapping, Mapping::Piecewise(_)));
        assert_eq!(c.mapping.map(0.29), 0.0);
        assert_eq!(c.mapping.map(0.5), 1.0);
    }
}
