use thiserror::Error;

pub type Result<T, E = VisionError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("enter_frame called while the previous frame is still held")]
    AlreadyEntered,
    #[error("exit_frame called without a held frame")]
    NotEntered,
    #[error("a recording session is already open")]
    AlreadyRecording,
    #[error("tracking lost: no flow points survived")]
    TrackingLost,
    #[error("invalid input to vision primitive: {0}")]
    CapabilityInput(String),
    #[error("frame source unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("recording failed: {0}")]
    Recording(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl VisionError {
    /// Misuse of the enter/exit or recording contract by the caller.
    pub fn is_caller_discipline(&self) -> bool {
        matches!(
            self,
            VisionError::AlreadyEntered | VisionError::NotEntered | VisionError::AlreadyRecording
        )
    }

    pub fn capability(err: opencv::Error) -> Self {
        VisionError::CapabilityInput(err.message)
    }

    pub fn recording(err: opencv::Error) -> Self {
        VisionError::Recording(err.message)
    }

    pub fn device(err: opencv::Error) -> Self {
        VisionError::DeviceUnavailable(err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_taxonomy() {
        assert!(VisionError::AlreadyEntered.is_caller_discipline());
        assert!(VisionError::NotEntered.is_caller_discipline());
        assert!(VisionError::AlreadyRecording.is_caller_discipline());
        assert!(!VisionError::TrackingLost.is_caller_discipline());
        assert!(!VisionError::Recording("no writer".into()).is_caller_discipline());
    }

    #[test]
    fn test_opencv_error_mapping() {
        let err = opencv::Error::new(opencv::core::StsUnmatchedSizes, "sizes differ");
        match VisionError::capability(err) {
            VisionError::CapabilityInput(msg) => assert_eq!(msg, "sizes differ"),
            other => panic!("unexpected {other:?}"),
        }
        let err = opencv::Error::new(opencv::core::StsError, "no encoder");
        assert!(matches!(VisionError::recording(err), VisionError::Recording(_)));
    }
}
