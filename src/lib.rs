#![forbid(unsafe_code)]
//! Reactive scroll-to-transform animation.
//!
//! A [`FrameScheduler`] owns a [`SignalGraph`] and a set of mounted regions. Each region samples
//! its scroll progress into a source signal, derived nodes (range mappings, springs, procedural
//! waveforms) transform it, and bound outputs are flushed to a [`RenderBinding`] once per tick.
//!
//! ```
//! use scrollmotion::{FrameScheduler, InMemoryBinding, MappingSpec, OffsetMode, RegionGeometry};
//!
//! let mut sched = FrameScheduler::default();
//! let hero = sched.mount("hero", OffsetMode::Pinned, RegionGeometry::new(0.0, 1600.0, 800.0))?;
//! let mut b = sched.build(hero)?;
//! let p = b.progress();
//! let fade = b.map(p, MappingSpec::new([0.0, 1.0], [1.0, 0.0], true)?)?;
//! b.bind(fade, "opacity")?;
//!
//! let mut sink = InMemoryBinding::new();
//! sched.queue_scroll(400.0);
//! sched.tick(1.0 / 60.0, &mut sink)?;
//! assert_eq!(sink.latest(hero, "opacity"), Some(0.5));
//! # Ok::<(), scrollmotion::MotionError>(())
//! ```

mod animation;
pub mod binding;
pub mod config;
mod foundation;
pub mod graph;
pub mod progress;
mod region;
pub mod scheduler;

pub use animation::ease::Ease;
pub use animation::mapping::{Mapping, MappingSpec, PiecewiseMapping, map};
pub use animation::procedural::{ProceduralSpec, Waveform, generate};
pub use animation::spring::{MAX_STEP_SECS, SpringConfig, SpringState};
pub use binding::{InMemoryBinding, PropertyUpdate, RecordedUpdate, RenderBinding};
pub use config::{ProceduralConfig, RegionConfig, SceneConfig, SceneRegion, TrackConfig};
pub use foundation::core::{FrameId, RegionGeometry, RegionId, SignalId};
pub use foundation::error::{MotionError, MotionResult};
pub use graph::{CombineOp, EvalOptions, NodeKind, PropagateStats, Signal, SignalGraph};
pub use progress::{Intersection, OffsetMode, ProgressSample, ProgressSampler, progress_at};
pub use region::RegionBuilder;
pub use scheduler::{
    FrameObserver, FrameScheduler, FrameStats, OverrunReport, RECOVERY_SLACK, SchedulerOptions,
};
