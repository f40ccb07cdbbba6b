//! Error types for headset session and input handling.

use std::fmt;

use thiserror::Error;

/// Result type alias for fallible runtime calls.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Result type alias using the headset error type.
pub type HeadsetResult<T> = std::result::Result<T, HeadsetError>;

/// A single runtime call that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{call} failed: {reason}")]
pub struct RuntimeError {
    pub call: &'static str,
    pub reason: String,
}

impl RuntimeError {
    pub fn new(call: &'static str, reason: impl fmt::Display) -> Self {
        Self {
            call,
            reason: reason.to_string(),
        }
    }

    /// Builds an error from a debug-printable runtime result code.
    pub fn from_debug(call: &'static str, code: impl fmt::Debug) -> Self {
        Self {
            call,
            reason: format!("{code:?}"),
        }
    }
}

/// Construction step of the session/frame coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstructionStage {
    RenderPass,
    Session,
    ReferenceSpace,
    ViewConfiguration,
    SwapchainFormats,
    ColorBuffer,
    DepthBuffer,
    Swapchain,
    SwapchainImages,
    RenderTargets,
    InputPaths,
    ActionSet,
    AttachActionSet,
}

impl ConstructionStage {
    pub const COORDINATOR: [ConstructionStage; 10] = [
        ConstructionStage::RenderPass,
        ConstructionStage::Session,
        ConstructionStage::ReferenceSpace,
        ConstructionStage::ViewConfiguration,
        ConstructionStage::SwapchainFormats,
        ConstructionStage::ColorBuffer,
        ConstructionStage::DepthBuffer,
        ConstructionStage::Swapchain,
        ConstructionStage::SwapchainImages,
        ConstructionStage::RenderTargets,
    ];
}

impl fmt::Display for ConstructionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstructionStage::RenderPass => "render pass",
            ConstructionStage::Session => "session",
            ConstructionStage::ReferenceSpace => "reference space",
            ConstructionStage::ViewConfiguration => "view configuration",
            ConstructionStage::SwapchainFormats => "swapchain formats",
            ConstructionStage::ColorBuffer => "color buffer",
            ConstructionStage::DepthBuffer => "depth buffer",
            ConstructionStage::Swapchain => "swapchain",
            ConstructionStage::SwapchainImages => "swapchain images",
            ConstructionStage::RenderTargets => "render targets",
            ConstructionStage::InputPaths => "input paths",
            ConstructionStage::ActionSet => "action set",
            ConstructionStage::AttachActionSet => "action set attachment",
        };
        f.write_str(name)
    }
}

/// Top-level error type for headset operations.
#[derive(Debug, Error)]
pub enum HeadsetError {
    /// A setup step failed; the object was never handed out.
    #[error("construction failed at {stage}: {source}")]
    Construction {
        stage: ConstructionStage,
        #[source]
        source: RuntimeError,
    },

    /// A capability or format required at construction is missing.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// A per-tick runtime call failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl HeadsetError {
    pub fn construction(stage: ConstructionStage, source: RuntimeError) -> Self {
        Self::Construction { stage, source }
    }

    /// Create an unsupported-feature error from any displayable type.
    pub fn unsupported(msg: impl fmt::Display) -> Self {
        Self::UnsupportedFeature(msg.to_string())
    }

    /// Create a config error from any displayable type.
    pub fn config(msg: impl fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// The construction stage that failed, if this is a construction error.
    pub fn stage(&self) -> Option<ConstructionStage> {
        match self {
            Self::Construction { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Tags a runtime result with the construction stage it belongs to.
pub(crate) trait StageExt<T> {
    fn at(self, stage: ConstructionStage) -> HeadsetResult<T>;
}

impl<T> StageExt<T> for RuntimeResult<T> {
    fn at(self, stage: ConstructionStage) -> HeadsetResult<T> {
        self.map_err(|source| HeadsetError::construction(stage, source))
    }
}
