use crate::foundation::core::RegionId;

/// Result alias used throughout the crate.
pub type MotionResult<T> = Result<T, MotionError>;

/// Errors produced by the animation pipeline.
///
/// Only `Configuration`, `UnknownRegion`, `UnknownSignal`, `Binding` and `Serde` are ever
/// returned from scheduler operations. `TransientInput` and `Overrun` describe conditions the
/// scheduler recovers from on its own; they surface through validation helpers and
/// [`crate::FrameObserver`] reports instead.
#[derive(thiserror::Error, Debug)]
pub enum MotionError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("transient input error: {0}")]
    TransientInput(String),

    #[error("frame overrun: {0}")]
    Overrun(String),

    #[error("unknown region {0:?}")]
    UnknownRegion(RegionId),

    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    #[error("binding error: {0}")]
    Binding(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MotionError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transient_input(msg: impl Into<String>) -> Self {
        Self::TransientInput(msg.into())
    }

    pub fn overrun(msg: impl Into<String>) -> Self {
        Self::Overrun(msg.into())
    }

    pub fn unknown_signal(msg: impl Into<String>) -> Self {
        Self::UnknownSignal(msg.into())
    }

    pub fn binding(msg: impl Into<String>) -> Self {
        Self::Binding(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// True for errors that fail setup and must not be retried with the same input.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::TransientInput(_) | Self::Overrun(_))
    }
}

impl From<serde_json::Error> for MotionError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}

/// Fails with a configuration error unless `v` is finite.
pub(crate) fn ensure_finite(name: &str, v: f64) -> MotionResult<f64> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(MotionError::configuration(format!(
            "{name} must be finite, got {v}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            MotionError::configuration("x")
                .to_string()
                .contains("configuration error:")
        );
        assert!(
            MotionError::transient_input("x")
                .to_string()
                .contains("transient input error:")
        );
        assert!(MotionError::overrun("x").to_string().contains("frame overrun:"));
        assert!(
            MotionError::serde("x")
                .to_string()
                .contains("serialization error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = MotionError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn recoverable_errors_are_not_fatal() {
        assert!(!MotionError::transient_input("nan").is_fatal());
        assert!(!MotionError::overrun("slow").is_fatal());
        assert!(MotionError::configuration("bad").is_fatal());
        assert!(MotionError::UnknownRegion(RegionId(3)).is_fatal());
    }

    #[test]
    fn ensure_finite_rejects_nan_and_infinity() {
        assert_eq!(ensure_finite("x", 1.5).unwrap(), 1.5);
        assert!(ensure_finite("x", f64::NAN).is_err());
        assert!(ensure_finite("x", f64::INFINITY).is_err());
    }
}
