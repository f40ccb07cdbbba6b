//! OpenXR + Vulkan backend for `headset-core`.

pub mod context;
pub mod frame;
pub mod input;
pub mod vulkan;

pub use context::XrContext;
pub use frame::{OpenXrFrameRuntime, OpenXrSession};
pub use input::{OpenXrAction, OpenXrInputRuntime};
