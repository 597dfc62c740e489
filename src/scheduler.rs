//! Frame-driven recomputation.
//!
//! One [`FrameScheduler::tick`] is one rendered frame. Inputs queued between ticks are applied at
//! the start of the next tick, never mid-pass, and all render writes of a tick happen in one batch
//! after the graph has settled.

use crate::animation::spring::MAX_STEP_SECS;
use crate::binding::{PropertyUpdate, RenderBinding};
use crate::foundation::core::{FrameId, RegionGeometry, RegionId, SignalId};
use crate::foundation::error::{MotionError, MotionResult};
use crate::graph::{EvalOptions, SignalGraph};
use crate::progress::{OffsetMode, ProgressSampler};
use crate::region::{RegionBinding, RegionBuilder};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

/// Re-arm threshold multiplier applied to every spring's `restDelta` on the tick after an overrun.
pub const RECOVERY_SLACK: f64 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerOptions {
    /// Wall-clock budget of one tick. Exceeding it is reported, never fatal.
    pub frame_budget: Duration,
    pub recovery_slack: f64,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            frame_budget: Duration::from_micros(16_667),
            recovery_slack: RECOVERY_SLACK,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverrunReport {
    pub frame: FrameId,
    pub elapsed: Duration,
    pub budget: Duration,
}

impl OverrunReport {
    pub fn to_error(&self) -> MotionError {
        MotionError::overrun(format!(
            "frame {} took {:?} (budget {:?})",
            self.frame.0, self.elapsed, self.budget
        ))
    }
}

/// Observability hook. Every method defaults to a no-op.
pub trait FrameObserver {
    fn on_overrun(&mut self, _report: &OverrunReport) {}

    /// A non-finite input was replaced by the last known-good value. `region` is `None` for the
    /// shared scroll offset.
    fn on_transient_input(&mut self, _region: Option<RegionId>, _error: &MotionError) {}
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStats {
    pub frame: FrameId,
    pub regions_sampled: usize,
    pub nodes_evaluated: usize,
    pub springs_active: usize,
    pub updates_flushed: usize,
    pub pruned: usize,
    pub transient_inputs: usize,
    pub overrun: bool,
    #[serde(skip)]
    pub elapsed: Duration,
}

#[derive(Clone, Copy, Debug)]
enum InputEvent {
    Scroll(f64),
    Geometry(RegionId, RegionGeometry),
}

/// Owns the signal graph and every mounted region, and drives them one frame at a time.
pub struct FrameScheduler {
    graph: SignalGraph,
    regions: BTreeMap<RegionId, RegionBinding>,
    /// Owning region of every node in the graph.
    owners: BTreeMap<SignalId, RegionId>,
    next_region: u32,
    scroll: f64,
    pending: Vec<InputEvent>,
    frame: FrameId,
    opts: SchedulerOptions,
    observer: Option<Box<dyn FrameObserver>>,
    recovering: bool,
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(SchedulerOptions::default())
    }
}

impl FrameScheduler {
    pub fn new(opts: SchedulerOptions) -> Self {
        Self {
            graph: SignalGraph::new(),
            regions: BTreeMap::new(),
            owners: BTreeMap::new(),
            next_region: 0,
            scroll: 0.0,
            pending: Vec::new(),
            frame: FrameId::default(),
            opts,
            observer: None,
            recovering: false,
        }
    }

    pub fn with_observer(mut self, observer: impl FrameObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn set_observer(&mut self, observer: Option<Box<dyn FrameObserver>>) {
        self.observer = observer;
    }

    pub fn graph(&self) -> &SignalGraph {
        &self.graph
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Scroll offset as of the last tick.
    pub fn scroll(&self) -> f64 {
        self.scroll
    }

    pub fn options(&self) -> SchedulerOptions {
        self.opts
    }

    /// Mounts a region and samples its progress at the current scroll offset.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn mount(
        &mut self,
        name: &str,
        mode: OffsetMode,
        geometry: RegionGeometry,
    ) -> MotionResult<RegionId> {
        let mut sampler = ProgressSampler::new(mode, geometry)?;
        let initial = sampler.sample(self.scroll).value;
        let id = RegionId(self.next_region);
        self.next_region = self
            .next_region
            .checked_add(1)
            .ok_or_else(|| MotionError::configuration("region ids exhausted"))?;
        let source = self.graph.add_source(initial)?;
        self.owners.insert(source, id);
        self.regions.insert(
            id,
            RegionBinding {
                id,
                name: (!name.is_empty()).then(|| name.to_owned()),
                sampler,
                source,
                nodes: BTreeSet::from([source]),
                outputs: Vec::new(),
                stale: false,
            },
        );
        tracing::debug!(region = id.0, progress = initial, "mounted region");
        Ok(id)
    }

    /// Opens the region's subgraph for construction.
    ///
    /// Nodes that are neither bound nor read by another node are pruned at the start of the next
    /// tick, so a chain should be bound before ticking.
    pub fn build(&mut self, region: RegionId) -> MotionResult<RegionBuilder<'_>> {
        let region = self
            .regions
            .get_mut(&region)
            .ok_or(MotionError::UnknownRegion(region))?;
        Ok(RegionBuilder {
            graph: &mut self.graph,
            region,
            owners: &mut self.owners,
        })
    }

    /// Tears down a region and its whole subgraph. Queued input for it is discarded.
    pub fn unmount(&mut self, region: RegionId) -> MotionResult<()> {
        let binding = self
            .regions
            .remove(&region)
            .ok_or(MotionError::UnknownRegion(region))?;
        self.pending
            .retain(|e| !matches!(e, InputEvent::Geometry(r, _) if *r == region));
        let nodes = binding.nodes.len();
        for id in &binding.nodes {
            self.owners.remove(id);
        }
        binding.teardown(&mut self.graph)?;
        tracing::debug!(region = region.0, nodes, "unmounted region");
        Ok(())
    }

    pub fn is_mounted(&self, region: RegionId) -> bool {
        self.regions.contains_key(&region)
    }

    pub fn regions(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.regions.keys().copied()
    }

    pub fn region_name(&self, region: RegionId) -> Option<&str> {
        self.regions.get(&region)?.name.as_deref()
    }

    /// Queues a new scroll offset for the next tick.
    pub fn queue_scroll(&mut self, offset: f64) {
        self.pending.push(InputEvent::Scroll(offset));
    }

    /// Queues new geometry (resize or layout change) for the next tick.
    pub fn queue_geometry(&mut self, region: RegionId, geometry: RegionGeometry) {
        self.pending.push(InputEvent::Geometry(region, geometry));
    }

    /// Raw progress of `region` as of the last tick.
    pub fn region_progress(&self, region: RegionId) -> MotionResult<f64> {
        let r = self
            .regions
            .get(&region)
            .ok_or(MotionError::UnknownRegion(region))?;
        self.graph.value(r.source)
    }

    /// Signal bound to `property` in `region`.
    pub fn region_signal(&self, region: RegionId, property: &str) -> MotionResult<SignalId> {
        let r = self
            .regions
            .get(&region)
            .ok_or(MotionError::UnknownRegion(region))?;
        r.outputs
            .iter()
            .find(|o| o.property == property)
            .map(|o| o.signal)
            .ok_or_else(|| {
                MotionError::unknown_signal(format!("no \"{property}\" in region {region:?}"))
            })
    }

    /// Current value of `property` in `region`.
    pub fn value(&self, region: RegionId, property: &str) -> MotionResult<f64> {
        self.graph.value(self.region_signal(region, property)?)
    }

    /// True when a tick would do no work: no queued input and no spring in flight.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
            && self.graph.active_springs().next().is_none()
            && self.regions.values().all(|r| !r.stale)
    }

    /// Runs one frame: apply queued input, sample, propagate, then flush changed outputs to
    /// `sink` in a single batch.
    ///
    /// `dt` is the wall-clock interval since the previous tick in seconds. Non-finite or negative
    /// values are treated as zero; large ones are capped by each spring.
    #[tracing::instrument(level = "trace", skip_all, fields(dt = dt))]
    pub fn tick(&mut self, dt: f64, sink: &mut dyn RenderBinding) -> MotionResult<FrameStats> {
        let started = Instant::now();
        self.frame = self.frame.next();
        let frame = self.frame;
        self.graph.begin_frame(frame);
        let mut stats = FrameStats {
            frame,
            ..FrameStats::default()
        };

        let pruned = self.graph.prune_unobserved();
        for id in &pruned {
            if let Some(region) = self.owners.remove(id)
                && let Some(r) = self.regions.get_mut(&region)
            {
                r.nodes.remove(id);
            }
        }
        stats.pruned = pruned.len();

        self.apply_pending(&mut stats);
        self.sample_stale(&mut stats)?;

        let dt = if dt.is_nan() {
            0.0
        } else {
            dt.clamp(0.0, MAX_STEP_SECS)
        };
        let rearm_slack = if self.recovering {
            self.opts.recovery_slack
        } else {
            1.0
        };
        let propagated = self.graph.propagate(EvalOptions { dt, rearm_slack });
        stats.nodes_evaluated = propagated.evaluated;
        stats.springs_active = propagated.springs_active;
        for id in propagated.substituted {
            let err = MotionError::transient_input(format!("non-finite output from {id:?}"));
            self.report_transient(self.owners.get(&id).copied(), &err);
            stats.transient_inputs += 1;
        }
        for id in propagated.diverged {
            let err = MotionError::transient_input(format!(
                "spring {id:?} diverged, snapped to its target"
            ));
            self.report_transient(self.owners.get(&id).copied(), &err);
            stats.transient_inputs += 1;
        }

        stats.updates_flushed = self.flush(frame, sink)?;

        stats.elapsed = started.elapsed();
        stats.overrun = stats.elapsed > self.opts.frame_budget;
        if stats.overrun {
            let report = OverrunReport {
                frame,
                elapsed: stats.elapsed,
                budget: self.opts.frame_budget,
            };
            tracing::warn!(
                frame = frame.0,
                elapsed_us = report.elapsed.as_micros() as u64,
                budget_us = report.budget.as_micros() as u64,
                "frame overrun"
            );
            if let Some(obs) = self.observer.as_mut() {
                obs.on_overrun(&report);
            }
        }
        self.recovering = stats.overrun;

        tracing::trace!(
            frame = frame.0,
            sampled = stats.regions_sampled,
            evaluated = stats.nodes_evaluated,
            flushed = stats.updates_flushed,
            "tick"
        );
        Ok(stats)
    }

    fn apply_pending(&mut self, stats: &mut FrameStats) {
        for event in std::mem::take(&mut self.pending) {
            match event {
                InputEvent::Scroll(offset) if !offset.is_finite() => {
                    let err =
                        MotionError::transient_input(format!("non-finite scroll offset {offset}"));
                    self.report_transient(None, &err);
                    stats.transient_inputs += 1;
                }
                InputEvent::Scroll(offset) => {
                    if offset != self.scroll {
                        self.scroll = offset;
                        for r in self.regions.values_mut() {
                            r.stale = true;
                        }
                    }
                }
                InputEvent::Geometry(region, geometry) => {
                    let Some(r) = self.regions.get_mut(&region) else {
                        continue;
                    };
                    match r.sampler.set_geometry(geometry) {
                        Ok(()) => r.stale = true,
                        Err(err) => {
                            self.report_transient(Some(region), &err);
                            stats.transient_inputs += 1;
                        }
                    }
                }
            }
        }
    }

    fn sample_stale(&mut self, stats: &mut FrameStats) -> MotionResult<()> {
        let mut substituted = Vec::new();
        for r in self.regions.values_mut().filter(|r| r.stale) {
            r.stale = false;
            let sample = r.sampler.sample(self.scroll);
            if sample.substituted {
                substituted.push(r.id);
            }
            self.graph.set_source(r.source, sample.value)?;
            stats.regions_sampled += 1;
        }
        for region in substituted {
            let err = MotionError::transient_input(format!(
                "degenerate progress range in region {region:?}"
            ));
            self.report_transient(Some(region), &err);
            stats.transient_inputs += 1;
        }
        Ok(())
    }

    /// Writes every output whose value differs from what the sink last received.
    ///
    /// A batch that was begun is always ended, even when a write fails. Nothing in a failed batch
    /// is marked as flushed, so the next tick sends it again.
    fn flush(&mut self, frame: FrameId, sink: &mut dyn RenderBinding) -> MotionResult<usize> {
        let mut changed: Vec<(RegionId, usize, f64)> = Vec::new();
        for r in self.regions.values() {
            for (idx, out) in r.outputs.iter().enumerate() {
                let value = self.graph.value(out.signal)?;
                if out.last_flushed != Some(value.to_bits()) {
                    changed.push((r.id, idx, value));
                }
            }
        }
        if changed.is_empty() {
            return Ok(0);
        }

        sink.begin_frame(frame)?;
        let applied = changed.iter().try_for_each(|&(region, idx, value)| {
            match self.regions.get(&region).and_then(|r| r.outputs.get(idx)) {
                Some(out) => sink.apply(&PropertyUpdate {
                    frame,
                    region,
                    property: &out.property,
                    value,
                }),
                None => Ok(()),
            }
        });
        let ended = sink.end_frame(frame);
        if let Err(err) = &applied {
            tracing::warn!(frame = frame.0, error = %err, "render binding rejected an update");
        }
        applied?;
        ended?;

        for &(region, idx, value) in &changed {
            if let Some(out) = self
                .regions
                .get_mut(&region)
                .and_then(|r| r.outputs.get_mut(idx))
            {
                out.last_flushed = Some(value.to_bits());
            }
        }
        Ok(changed.len())
    }

    fn report_transient(&mut self, region: Option<RegionId>, err: &MotionError) {
        tracing::warn!(region = region.map(|r| r.0), error = %err, "substituted last known-good value");
        if let Some(obs) = self.observer.as_mut() {
            obs.on_transient_input(region, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::mapping::MappingSpec;
    use crate::animation::spring::SpringConfig;
    use crate::binding::InMemoryBinding;

    const DT: f64 = 1.0 / 60.0;

    fn pinned(sched: &mut FrameScheduler) -> RegionId {
        sched
            .mount("pinned", OffsetMode::Pinned, RegionGeometry::new(0.0, 1100.0, 100.0))
            .unwrap()
    }

    #[test]
    fn first_tick_flushes_initial_values_then_goes_quiet() {
        let mut sched = FrameScheduler::default();
        let r = pinned(&mut sched);
        let mut b = sched.build(r).unwrap();
        let p = b.progress();
        let m = b
            .map(p, MappingSpec::new([0.0, 1.0], [0.05, 0.97], true).unwrap())
            .unwrap();
        b.bind(m, "opacity").unwrap();

        let mut sink = InMemoryBinding::new();
        let stats = sched.tick(DT, &mut sink).unwrap();
        assert_eq!(stats.updates_flushed, 1);
        assert_eq!(sink.latest(r, "opacity"), Some(0.05));

        let stats = sched.tick(DT, &mut sink).unwrap();
        assert_eq!(stats.updates_flushed, 0);
        assert_eq!(stats.nodes_evaluated, 0);
        assert_eq!(sink.batches(), 1);
        assert!(sched.is_idle());
    }

    #[test]
    fn scroll_is_applied_at_next_tick() {
        let mut sched = FrameScheduler::default();
        let r = pinned(&mut sched);
        sched.queue_scroll(500.0);
        assert_eq!(sched.region_progress(r).unwrap(), 0.0);
        assert!(!sched.is_idle());
        let stats = sched.tick(DT, &mut InMemoryBinding::new()).unwrap();
        assert_eq!(stats.regions_sampled, 1);
        assert_eq!(sched.region_progress(r).unwrap(), 0.5);
    }

    #[test]
    fn unbound_nodes_are_pruned_lazily() {
        let mut sched = FrameScheduler::default();
        let r = pinned(&mut sched);
        let mut b = sched.build(r).unwrap();
        let p = b.progress();
        let dangling = b.spring(p, SpringConfig::default()).unwrap();
        let stats = sched.tick(DT, &mut InMemoryBinding::new()).unwrap();
        assert_eq!(stats.pruned, 1);
        assert!(!sched.graph().contains(dangling));
        assert!(sched.graph().contains(p));
    }

    #[test]
    fn cross_region_inputs_are_rejected() {
        let mut sched = FrameScheduler::default();
        let a = pinned(&mut sched);
        let b = pinned(&mut sched);
        let pa = sched.build(a).unwrap().progress();
        let mut bb = sched.build(b).unwrap();
        let err = bb
            .map(pa, MappingSpec::new([0.0, 1.0], [0.0, 1.0], true).unwrap())
            .unwrap_err();
        assert!(matches!(err, MotionError::UnknownSignal(_)));
    }

    #[test]
    fn duplicate_property_is_rejected() {
        let mut sched = FrameScheduler::default();
        let r = pinned(&mut sched);
        let mut b = sched.build(r).unwrap();
        let p = b.progress();
        b.bind(p, "y").unwrap();
        assert!(b.bind(p, "y").is_err());
    }

    #[test]
    fn unknown_region_handles_fail() {
        let mut sched = FrameScheduler::default();
        let r = pinned(&mut sched);
        sched.unmount(r).unwrap();
        assert!(matches!(sched.unmount(r), Err(MotionError::UnknownRegion(_))));
        assert!(sched.build(r).is_err());
        assert!(sched.region_progress(r).is_err());
    }

    #[test]
    fn node_owners_follow_prune_and_unmount() {
        let mut sched = FrameScheduler::default();
        let a = pinned(&mut sched);
        let b = pinned(&mut sched);
        let mut bb = sched.build(b).unwrap();
        let p = bb.progress();
        let kept = bb
            .map(p, MappingSpec::new([0.0, 1.0], [0.0, 2.0], true).unwrap())
            .unwrap();
        bb.bind(kept, "y").unwrap();
        let dangling = bb
            .map(p, MappingSpec::new([0.0, 1.0], [1.0, 0.0], true).unwrap())
            .unwrap();
        assert_eq!(sched.owners.get(&dangling), Some(&b));

        sched.tick(DT, &mut InMemoryBinding::new()).unwrap();
        assert!(!sched.owners.contains_key(&dangling));
        assert!(!sched.regions[&b].owns(dangling));
        assert_eq!(sched.owners.get(&kept), Some(&b));

        sched.unmount(b).unwrap();
        assert_eq!(sched.owners.values().copied().collect::<Vec<_>>(), vec![a]);
    }
}
