//! Explicit reactive dataflow graph.
//!
//! Every node produces exactly one scalar [`Signal`]. Inputs are declared at construction and must
//! already exist, so node ids are a topological order by construction; the dirty queue is a
//! min-heap over ids and popping it in order evaluates every node after all of its inputs.
//! Removed slots at the end of the node table are released, so a new id is still greater than
//! every live one.
//!
//! Stamps:
//! - `generation`: frame of the node's last evaluation. A node is evaluated at most once per frame
//!   and every dependent of an evaluated node is evaluated in the same frame, so a node's
//!   generation is never behind its inputs'.
//! - `changed_at`: frame in which the value last changed.

use crate::animation::mapping::Mapping;
use crate::animation::procedural::ProceduralSpec;
use crate::animation::spring::{SpringConfig, SpringState};
use crate::foundation::core::{FrameId, SignalId};
use crate::foundation::error::{MotionError, MotionResult};
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};

/// Read-only view of one node's output.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Signal {
    pub value: f64,
    pub generation: FrameId,
    pub changed_at: FrameId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CombineOp {
    Add,
    Multiply,
}

/// Transform carried by a node.
#[derive(Clone, Debug)]
pub enum NodeKind {
    /// Written from outside the graph (a progress sampler).
    Source,
    Map(Mapping),
    Spring(SpringState),
    Procedural(ProceduralSpec),
    /// 0 until the input first reaches `threshold`, then 1 for the rest of the node's life.
    Latch { threshold: f64, fired: bool },
    Combine(CombineOp),
}

impl NodeKind {
    fn arity_ok(&self, n: usize) -> bool {
        match self {
            Self::Source => n == 0,
            Self::Combine(_) => n >= 2,
            _ => n == 1,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Map(_) => "map",
            Self::Spring(_) => "spring",
            Self::Procedural(_) => "procedural",
            Self::Latch { .. } => "latch",
            Self::Combine(_) => "combine",
        }
    }
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    inputs: SmallVec<[SignalId; 2]>,
    dependents: SmallVec<[SignalId; 4]>,
    value: f64,
    generation: FrameId,
    changed_at: FrameId,
    subscribers: u32,
    queued: bool,
}

/// Per-pass knobs supplied by the scheduler.
#[derive(Clone, Copy, Debug)]
pub struct EvalOptions {
    /// Seconds since the previous tick.
    pub dt: f64,
    /// Settled springs whose new target is within `rearm_slack * restDelta` of their position
    /// snap onto it instead of re-arming. Zero re-arms on any change.
    pub rearm_slack: f64,
}

/// What one propagation pass did.
#[derive(Clone, Debug, Default)]
pub struct PropagateStats {
    pub evaluated: usize,
    pub springs_active: usize,
    /// Nodes whose computed value was non-finite and kept their previous value.
    pub substituted: SmallVec<[SignalId; 2]>,
    /// Springs whose integration blew up and were snapped onto their target.
    pub diverged: SmallVec<[SignalId; 2]>,
}

#[derive(Debug, Default)]
pub struct SignalGraph {
    /// Freed slots stay `None`; trailing ones are trimmed so the next id is one past the highest
    /// live node.
    nodes: Vec<Option<Node>>,
    live: usize,
    dirty: BinaryHeap<Reverse<u32>>,
    active_springs: BTreeSet<SignalId>,
    /// Transform nodes that may have lost their last reader since the previous prune.
    prunable: BTreeSet<SignalId>,
    frame: FrameId,
}

impl SignalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> FrameId {
        self.frame
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Allocated slots, live or freed.
    pub fn slots(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: SignalId) -> bool {
        self.node(id).is_some()
    }

    pub fn signal(&self, id: SignalId) -> Option<Signal> {
        self.node(id).map(|n| Signal {
            value: n.value,
            generation: n.generation,
            changed_at: n.changed_at,
        })
    }

    pub fn value(&self, id: SignalId) -> MotionResult<f64> {
        self.node(id)
            .map(|n| n.value)
            .ok_or_else(|| MotionError::unknown_signal(format!("{id:?}")))
    }

    pub fn inputs(&self, id: SignalId) -> Option<&[SignalId]> {
        self.node(id).map(|n| n.inputs.as_slice())
    }

    pub fn dependents(&self, id: SignalId) -> Option<&[SignalId]> {
        self.node(id).map(|n| n.dependents.as_slice())
    }

    pub fn spring(&self, id: SignalId) -> Option<&SpringState> {
        match &self.node(id)?.kind {
            NodeKind::Spring(s) => Some(s),
            _ => None,
        }
    }

    /// Springs that will be re-ticked on the next pass regardless of upstream changes.
    pub fn active_springs(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.active_springs.iter().copied()
    }

    pub fn add_source(&mut self, initial: f64) -> MotionResult<SignalId> {
        if !initial.is_finite() {
            return Err(MotionError::configuration(
                "source initial value must be finite",
            ));
        }
        self.insert(NodeKind::Source, SmallVec::new(), initial)
    }

    /// Adds a transform node over existing `inputs`. Its value is computed immediately from the
    /// inputs' current values; spring nodes start at rest on their input.
    pub fn add_node(&mut self, mut kind: NodeKind, inputs: &[SignalId]) -> MotionResult<SignalId> {
        if matches!(kind, NodeKind::Source) {
            return Err(MotionError::configuration(
                "sources are created with add_source",
            ));
        }
        if !kind.arity_ok(inputs.len()) {
            return Err(MotionError::configuration(format!(
                "{} node cannot take {} inputs",
                kind.label(),
                inputs.len()
            )));
        }
        let mut values = SmallVec::<[f64; 4]>::with_capacity(inputs.len());
        for &i in inputs {
            values.push(self.value(i)?);
        }
        if let NodeKind::Spring(s) = &mut kind {
            s.jump(values[0]);
        }
        let initial = evaluate(&mut kind, &values, EvalOptions::at_rest())
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0);
        self.insert(kind, inputs.iter().copied().collect(), initial)
    }

    /// Adds a spring following `input` that starts at `initial` and animates toward the input.
    pub fn add_spring_from(
        &mut self,
        input: SignalId,
        config: SpringConfig,
        initial: f64,
    ) -> MotionResult<SignalId> {
        let target = self.value(input)?;
        let state = SpringState::with_motion(config, initial, 0.0, target)?;
        let armed = !state.is_settled();
        let id = self.insert(NodeKind::Spring(state), SmallVec::from_slice(&[input]), initial)?;
        if armed {
            self.active_springs.insert(id);
        }
        Ok(id)
    }

    fn insert(
        &mut self,
        kind: NodeKind,
        inputs: SmallVec<[SignalId; 2]>,
        value: f64,
    ) -> MotionResult<SignalId> {
        let idx = u32::try_from(self.nodes.len())
            .map_err(|_| MotionError::configuration("signal graph is full"))?;
        let id = SignalId(idx);
        if let Some(i) = inputs.iter().find(|&&i| !self.contains(i)) {
            return Err(MotionError::unknown_signal(format!("{i:?}")));
        }
        for &i in &inputs {
            if let Some(input) = self.node_mut(i) {
                input.dependents.push(id);
            }
        }
        if !matches!(kind, NodeKind::Source) {
            self.prunable.insert(id);
        }
        self.live += 1;
        self.nodes.push(Some(Node {
            kind,
            inputs,
            dependents: SmallVec::new(),
            value,
            generation: self.frame,
            changed_at: self.frame,
            subscribers: 0,
            queued: false,
        }));
        Ok(id)
    }

    /// Starts a new frame. Source writes and the following [`Self::propagate`] are stamped with
    /// `frame`.
    pub fn begin_frame(&mut self, frame: FrameId) {
        self.frame = frame;
    }

    /// Writes a source value. Dependents are queued only if the value actually changed.
    pub fn set_source(&mut self, id: SignalId, value: f64) -> MotionResult<bool> {
        let frame = self.frame;
        let node = self
            .node_mut(id)
            .ok_or_else(|| MotionError::unknown_signal(format!("{id:?}")))?;
        if !matches!(node.kind, NodeKind::Source) {
            return Err(MotionError::configuration(format!(
                "{id:?} is a {} node, not a source",
                node.kind.label()
            )));
        }
        if !value.is_finite() {
            return Err(MotionError::transient_input(format!(
                "non-finite value {value} for source {id:?}"
            )));
        }
        if node.value == value {
            return Ok(false);
        }
        node.value = value;
        node.generation = frame;
        node.changed_at = frame;
        let deps = node.dependents.clone();
        for d in deps {
            self.enqueue(d);
        }
        Ok(true)
    }

    fn enqueue(&mut self, id: SignalId) {
        if let Some(node) = self.node_mut(id)
            && !node.queued
        {
            node.queued = true;
            self.dirty.push(Reverse(id.0));
        }
    }

    /// Evaluates every dirty node plus all armed springs, each exactly once, in topological order.
    pub fn propagate(&mut self, opts: EvalOptions) -> PropagateStats {
        let mut stats = PropagateStats::default();
        let springs: SmallVec<[SignalId; 8]> = self.active_springs.iter().copied().collect();
        for s in springs {
            self.enqueue(s);
        }

        let frame = self.frame;
        let mut inputs = SmallVec::<[f64; 4]>::new();
        while let Some(Reverse(raw)) = self.dirty.pop() {
            let id = SignalId(raw);
            let Some(node) = self.node_mut(id) else {
                continue;
            };
            node.queued = false;
            // Already evaluated this frame.
            if node.generation == frame {
                continue;
            }

            let input_ids = node.inputs.clone();
            inputs.clear();
            for i in input_ids {
                if let Some(n) = self.node(i) {
                    inputs.push(n.value);
                }
            }

            let Some(node) = self.nodes.get_mut(raw as usize).and_then(Option::as_mut) else {
                continue;
            };
            if inputs.len() != node.inputs.len() {
                continue;
            }

            let next = match evaluate(&mut node.kind, &inputs, opts) {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(signal = raw, error = %err, "spring diverged");
                    stats.diverged.push(id);
                    match &node.kind {
                        NodeKind::Spring(s) => s.position(),
                        _ => node.value,
                    }
                }
            };
            node.generation = frame;
            stats.evaluated += 1;
            if next.is_finite() {
                if next.to_bits() != node.value.to_bits() {
                    node.value = next;
                    node.changed_at = frame;
                }
            } else {
                tracing::warn!(
                    signal = raw,
                    value = next,
                    "non-finite node output, keeping last value"
                );
                stats.substituted.push(id);
            }

            if let NodeKind::Spring(s) = &node.kind {
                if s.is_settled() {
                    self.active_springs.remove(&id);
                } else {
                    self.active_springs.insert(id);
                }
            }

            let deps = node.dependents.clone();
            for d in deps {
                self.enqueue(d);
            }
        }

        stats.springs_active = self.active_springs.len();
        tracing::trace!(
            frame = frame.0,
            evaluated = stats.evaluated,
            springs = stats.springs_active,
            "propagated"
        );
        stats
    }

    /// Registers an external reader (render binding) on `id`.
    pub fn subscribe(&mut self, id: SignalId) -> MotionResult<()> {
        let node = self
            .node_mut(id)
            .ok_or_else(|| MotionError::unknown_signal(format!("{id:?}")))?;
        node.subscribers = node.subscribers.saturating_add(1);
        Ok(())
    }

    pub fn unsubscribe(&mut self, id: SignalId) {
        let Some(node) = self.node_mut(id) else {
            return;
        };
        node.subscribers = node.subscribers.saturating_sub(1);
        if node.subscribers == 0 && !matches!(node.kind, NodeKind::Source) {
            self.prunable.insert(id);
        }
    }

    /// Removes a closed set of nodes: every dependent of a removed node must be removed too.
    pub fn remove_all(&mut self, ids: &[SignalId]) -> MotionResult<()> {
        let set: BTreeSet<SignalId> = ids.iter().copied().filter(|&i| self.contains(i)).collect();
        for &id in &set {
            if let Some(node) = self.node(id)
                && let Some(foreign) = node.dependents.iter().find(|d| !set.contains(d))
            {
                return Err(MotionError::configuration(format!(
                    "cannot remove {id:?}: {foreign:?} still depends on it"
                )));
            }
        }
        for &id in set.iter().rev() {
            self.detach(id);
        }
        self.trim_tail();
        Ok(())
    }

    /// Drops transform nodes nobody reads (no dependents, no subscribers), cascading upstream.
    /// Sources are never pruned. Returns the removed ids in descending order.
    ///
    /// Only nodes created, unsubscribed or left without dependents since the last call are
    /// inspected.
    pub fn prune_unobserved(&mut self) -> Vec<SignalId> {
        let mut pruned = Vec::new();
        // Detaching only adds lower ids, so popping the highest keeps the order descending.
        while let Some(id) = self.prunable.pop_last() {
            let orphan = self
                .node(id)
                .is_some_and(|n| n.dependents.is_empty() && n.subscribers == 0);
            if orphan {
                self.detach(id);
                pruned.push(id);
            }
        }
        if !pruned.is_empty() {
            self.trim_tail();
            tracing::debug!(count = pruned.len(), "pruned unobserved nodes");
        }
        pruned
    }

    fn detach(&mut self, id: SignalId) {
        let Some(slot) = self.nodes.get_mut(id.0 as usize) else {
            return;
        };
        let Some(node) = slot.take() else {
            return;
        };
        self.live -= 1;
        for i in node.inputs {
            if let Some(input) = self.node_mut(i) {
                input.dependents.retain(|d| *d != id);
                if !matches!(input.kind, NodeKind::Source) {
                    self.prunable.insert(i);
                }
            }
        }
        self.active_springs.remove(&id);
        self.prunable.remove(&id);
    }

    fn trim_tail(&mut self) {
        while matches!(self.nodes.last(), Some(None)) {
            self.nodes.pop();
        }
    }

    fn node(&self, id: SignalId) -> Option<&Node> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: SignalId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut)
    }
}

impl EvalOptions {
    pub fn new(dt: f64) -> Self {
        Self {
            dt,
            rearm_slack: 0.0,
        }
    }

    fn at_rest() -> Self {
        Self::new(0.0)
    }
}

/// Computes a node's next value. Fails only when a spring diverged and was snapped to its target.
fn evaluate(kind: &mut NodeKind, inputs: &[f64], opts: EvalOptions) -> MotionResult<f64> {
    let value = match kind {
        NodeKind::Source => f64::NAN,
        NodeKind::Map(m) => m.map(inputs[0]),
        NodeKind::Procedural(spec) => spec.generate(inputs[0]),
        NodeKind::Spring(s) => {
            let slack = opts.rearm_slack * s.config().rest_delta;
            if s.retarget_with_slack(inputs[0], slack) {
                s.step(opts.dt)?;
            }
            s.position()
        }
        NodeKind::Latch { threshold, fired } => {
            if !*fired && inputs[0] >= *threshold {
                *fired = true;
            }
            if *fired { 1.0 } else { 0.0 }
        }
        NodeKind::Combine(CombineOp::Add) => inputs.iter().sum(),
        NodeKind::Combine(CombineOp::Multiply) => inputs.iter().product(),
    };
    Ok(value)
}
