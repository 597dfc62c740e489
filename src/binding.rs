use crate::foundation::core::{FrameId, RegionId};
use crate::foundation::error::MotionResult;

/// One property write produced by a tick.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct PropertyUpdate<'a> {
    pub frame: FrameId,
    pub region: RegionId,
    pub property: &'a str,
    pub value: f64,
}

/// Receiver of final numeric values, implemented by the host scene.
///
/// Batch contract: for each tick that has changes, `begin_frame` is called once, then `apply` for
/// every changed output, then `end_frame`. No graph evaluation happens between `begin_frame` and
/// `end_frame`.
pub trait RenderBinding {
    fn begin_frame(&mut self, _frame: FrameId) -> MotionResult<()> {
        Ok(())
    }

    fn apply(&mut self, update: &PropertyUpdate<'_>) -> MotionResult<()>;

    fn end_frame(&mut self, _frame: FrameId) -> MotionResult<()> {
        Ok(())
    }
}

/// Owned copy of a [`PropertyUpdate`].
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct RecordedUpdate {
    pub frame: FrameId,
    pub region: RegionId,
    pub property: String,
    pub value: f64,
}

/// Binding that records every update, for tests and offline simulation.
#[derive(Debug, Default)]
pub struct InMemoryBinding {
    /// Updates in flush order.
    pub updates: Vec<RecordedUpdate>,
    batches: u64,
    open: bool,
}

impl InMemoryBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed flush batches.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Most recent value written to `property` of `region`.
    pub fn latest(&self, region: RegionId, property: &str) -> Option<f64> {
        self.updates
            .iter()
            .rev()
            .find(|u| u.region == region && u.property == property)
            .map(|u| u.value)
    }

    /// Updates written during `frame`.
    pub fn frame_updates(&self, frame: FrameId) -> impl Iterator<Item = &RecordedUpdate> + '_ {
        self.updates.iter().filter(move |u| u.frame == frame)
    }

    pub fn clear(&mut self) {
        self.updates.clear();
    }
}

impl RenderBinding for InMemoryBinding {
    fn begin_frame(&mut self, _frame: FrameId) -> MotionResult<()> {
        self.open = true;
        Ok(())
    }

    fn apply(&mut self, update: &PropertyUpdate<'_>) -> MotionResult<()> {
        debug_assert!(self.open, "apply outside of a frame batch");
        self.updates.push(RecordedUpdate {
            frame: update.frame,
            region: update.region,
            property: update.property.to_owned(),
            value: update.value,
        });
        Ok(())
    }

    fn end_frame(&mut self, _frame: FrameId) -> MotionResult<()> {
        self.open = false;
        self.batches += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_returns_most_recent_write() {
        let mut b = InMemoryBinding::new();
        for (frame, value) in [(1, 0.25), (2, 0.5)] {
            b.begin_frame(FrameId(frame)).unwrap();
            b.apply(&PropertyUpdate {
                frame: FrameId(frame),
                region: RegionId(0),
                property: "opacity",
                value,
            })
            .unwrap();
            b.end_frame(FrameId(frame)).unwrap();
        }
        assert_eq!(b.latest(RegionId(0), "opacity"), Some(0.5));
        assert_eq!(b.latest(RegionId(1), "opacity"), None);
        assert_eq!(b.frame_updates(FrameId(1)).count(), 1);
        assert_eq!(b.batches(), 2);
    }
}
