/// Handle to the output signal of one graph node.
///
/// Signal ids are allocated in strictly increasing order and a node may only depend on signals
/// that already exist, so ascending id order is always a valid topological order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalId(pub u32);

/// Handle to a mounted region.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct RegionId(pub u32);

/// Monotonic tick counter. Doubles as the generation stamp of every signal.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize,
)]
pub struct FrameId(pub u64);

impl FrameId {
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Scroll offset and region geometry along the scroll axis, in host units (usually CSS px).
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionGeometry {
    /// Offset of the region's leading edge from the top of the scroll container.
    pub start: f64,
    /// Region length along the scroll axis.
    pub extent: f64,
    /// Visible viewport length along the scroll axis.
    pub viewport: f64,
}

impl RegionGeometry {
    pub fn new(start: f64, extent: f64, viewport: f64) -> Self {
        Self {
            start,
            extent,
            viewport,
        }
    }

    pub fn end(self) -> f64 {
        self.start + self.extent
    }

    pub fn is_finite(self) -> bool {
        self.start.is_finite() && self.extent.is_finite() && self.viewport.is_finite()
    }
}
