//! Region bindings: the ownership unit for one sampled region and its animation subgraph.

use crate::animation::mapping::Mapping;
use crate::animation::procedural::ProceduralSpec;
use crate::animation::spring::{SpringConfig, SpringState};
use crate::foundation::core::{RegionId, SignalId};
use crate::foundation::error::{MotionError, MotionResult};
use crate::graph::{CombineOp, NodeKind, SignalGraph};
use crate::progress::ProgressSampler;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug)]
pub(crate) struct Output {
    pub(crate) property: String,
    pub(crate) signal: SignalId,
    /// Bits of the last value handed to the render binding.
    pub(crate) last_flushed: Option<u64>,
}

/// A mounted region: its sampler, the progress source it writes, every node built on top of that
/// source, and the render outputs reading from them.
#[derive(Debug)]
pub(crate) struct RegionBinding {
    pub(crate) id: RegionId,
    pub(crate) name: Option<String>,
    pub(crate) sampler: ProgressSampler,
    pub(crate) source: SignalId,
    pub(crate) nodes: BTreeSet<SignalId>,
    pub(crate) outputs: Vec<Output>,
    /// Scroll or geometry changed since the last sample.
    pub(crate) stale: bool,
}

impl RegionBinding {
    pub(crate) fn owns(&self, id: SignalId) -> bool {
        self.nodes.contains(&id)
    }

    /// Releases every subscription and removes the whole subgraph from `graph`.
    pub(crate) fn teardown(self, graph: &mut SignalGraph) -> MotionResult<()> {
        for out in &self.outputs {
            graph.unsubscribe(out.signal);
        }
        let nodes: Vec<SignalId> = self.nodes.into_iter().collect();
        graph.remove_all(&nodes)
    }
}

/// Builds the subgraph of one mounted region.
///
/// Every node created here is owned by the region and may only read signals of the same region,
/// so unmounting removes a closed subgraph.
pub struct RegionBuilder<'a> {
    pub(crate) graph: &'a mut SignalGraph,
    pub(crate) region: &'a mut RegionBinding,
    /// Scheduler-wide node to region index.
    pub(crate) owners: &'a mut BTreeMap<SignalId, RegionId>,
}

impl RegionBuilder<'_> {
    pub fn id(&self) -> RegionId {
        self.region.id
    }

    /// The region's raw progress signal.
    pub fn progress(&self) -> SignalId {
        self.region.source
    }

    pub fn map(&mut self, input: SignalId, mapping: impl Into<Mapping>) -> MotionResult<SignalId> {
        self.node(NodeKind::Map(mapping.into()), &[input])
    }

    /// A spring that follows `input`, starting at rest on its current value.
    pub fn spring(&mut self, input: SignalId, config: SpringConfig) -> MotionResult<SignalId> {
        let state = SpringState::new(config, 0.0)?;
        self.node(NodeKind::Spring(state), &[input])
    }

    /// A spring that starts at `initial` and animates toward `input` from the first tick.
    pub fn spring_from(
        &mut self,
        input: SignalId,
        config: SpringConfig,
        initial: f64,
    ) -> MotionResult<SignalId> {
        self.check_owned(&[input])?;
        let id = self.graph.add_spring_from(input, config, initial)?;
        self.adopt(id);
        Ok(id)
    }

    pub fn procedural(&mut self, input: SignalId, spec: ProceduralSpec) -> MotionResult<SignalId> {
        self.node(NodeKind::Procedural(spec), &[input])
    }

    /// 0 until `input` first reaches `threshold`, then 1.
    pub fn latch(&mut self, input: SignalId, threshold: f64) -> MotionResult<SignalId> {
        if !threshold.is_finite() {
            return Err(MotionError::configuration("latch threshold must be finite"));
        }
        self.node(
            NodeKind::Latch {
                threshold,
                fired: false,
            },
            &[input],
        )
    }

    pub fn combine(&mut self, op: CombineOp, inputs: &[SignalId]) -> MotionResult<SignalId> {
        self.node(NodeKind::Combine(op), inputs)
    }

    /// Publishes `signal` to the render binding under `property`.
    pub fn bind(&mut self, signal: SignalId, property: impl Into<String>) -> MotionResult<()> {
        let property = property.into();
        self.check_owned(&[signal])?;
        if self.region.outputs.iter().any(|o| o.property == property) {
            return Err(MotionError::configuration(format!(
                "property \"{property}\" is already bound in region {:?}",
                self.region.id
            )));
        }
        self.graph.subscribe(signal)?;
        self.region.outputs.push(Output {
            property,
            signal,
            last_flushed: None,
        });
        Ok(())
    }

    fn node(&mut self, kind: NodeKind, inputs: &[SignalId]) -> MotionResult<SignalId> {
        self.check_owned(inputs)?;
        let id = self.graph.add_node(kind, inputs)?;
        self.adopt(id);
        Ok(id)
    }

    fn adopt(&mut self, id: SignalId) {
        self.region.nodes.insert(id);
        self.owners.insert(id, self.region.id);
    }

    fn check_owned(&self, inputs: &[SignalId]) -> MotionResult<()> {
        match inputs.iter().find(|&&i| !self.region.owns(i)) {
            Some(i) => Err(MotionError::unknown_signal(format!(
                "{i:?} does not belong to region {:?}",
                self.region.id
            ))),
            None => Ok(()),
        }
    }
}
