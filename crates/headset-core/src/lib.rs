//! Backend-independent core of the headset layer: session and frame
//! coordination, controller input, pose math and configuration.
//!
//! Device access goes through the [`FrameRuntime`] and [`InputRuntime`]
//! traits; `headset-openxr` provides the OpenXR + Vulkan implementation.

#![forbid(unsafe_code)]

pub mod bindings;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod input;
pub mod math;
pub mod runtime;
pub mod types;

#[cfg(test)]
mod testing;

pub use bindings::{InputAction, InteractionProfile, INTERACTION_PROFILES};
pub use config::{HapticPulse, HeadsetConfig};
pub use coordinator::{CoordinatorSettings, FrameOutcome, SessionFrameCoordinator};
pub use error::{ConstructionStage, HeadsetError, HeadsetResult, RuntimeError, RuntimeResult};
pub use input::InputSynchronizer;
pub use runtime::{FrameRuntime, InputRuntime};
pub use types::*;

/// Initialize tracing with sensible defaults.
///
/// Log level is controlled by the `RUST_LOG` environment variable.
/// Defaults to `info` if not set.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
