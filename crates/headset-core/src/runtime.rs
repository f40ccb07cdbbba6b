//! Seams between the coordinator/synchronizer and the device runtime.
//!
//! Backends own every handle they hand out; the core only stores them and
//! gives them back through the matching `destroy_*` call.

use glam::Vec2;

use crate::error::RuntimeResult;
use crate::types::{
    ActionState, BlendMode, EyeRenderInfo, Extent2D, FrameState, HapticVibration, ImageFormat,
    LocationFlags, Pose, ReferenceSpaceKind, RuntimeEvent, SpaceLocation, Time, View,
    ViewConfiguration, ViewConfigurationView,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentDesc {
    pub format: ImageFormat,
    pub samples: u32,
    pub load: LoadOp,
    pub store: StoreOp,
}

/// Single-subpass multiview render pass with color, depth and resolve
/// attachments, in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassDesc {
    pub view_mask: u32,
    pub correlation_mask: u32,
    pub color: AttachmentDesc,
    pub depth: AttachmentDesc,
    pub resolve: AttachmentDesc,
}

impl RenderPassDesc {
    pub fn multiview(
        views: ViewConfiguration,
        color_format: ImageFormat,
        depth_format: ImageFormat,
        samples: u32,
    ) -> Self {
        let mask = views.view_mask();
        Self {
            view_mask: mask,
            correlation_mask: mask,
            color: AttachmentDesc {
                format: color_format,
                samples,
                load: LoadOp::Clear,
                store: StoreOp::Store,
            },
            depth: AttachmentDesc {
                format: depth_format,
                samples,
                load: LoadOp::Clear,
                store: StoreOp::DontCare,
            },
            resolve: AttachmentDesc {
                format: color_format,
                samples: 1,
                load: LoadOp::DontCare,
                store: StoreOp::Store,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageUsage {
    ColorAttachment,
    DepthStencilAttachment,
}

/// Layered image shared by every render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBufferDesc {
    pub extent: Extent2D,
    pub format: ImageFormat,
    pub usage: ImageUsage,
    pub samples: u32,
    pub layers: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub format: ImageFormat,
    pub sample_count: u32,
    pub width: u32,
    pub height: u32,
    pub array_size: u32,
    pub face_count: u32,
    pub mip_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetDesc {
    pub extent: Extent2D,
    pub format: ImageFormat,
    pub layers: u32,
}

/// Projection layer submitted at frame end.
#[derive(Debug)]
pub struct ProjectionLayer<'a, S, C> {
    pub space: &'a S,
    pub swapchain: &'a C,
    pub views: &'a [EyeRenderInfo],
}

/// Session, swapchain and frame-timing calls used by
/// [`SessionFrameCoordinator`](crate::SessionFrameCoordinator).
pub trait FrameRuntime {
    type RenderPass;
    type Session;
    type Space;
    type ImageBuffer;
    type Swapchain;
    type SwapchainImage: Copy;
    type RenderTarget;

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> RuntimeResult<Self::RenderPass>;
    fn create_session(&mut self) -> RuntimeResult<Self::Session>;
    fn create_reference_space(
        &mut self,
        session: &Self::Session,
        kind: ReferenceSpaceKind,
        origin: Pose,
    ) -> RuntimeResult<Self::Space>;
    fn view_configuration_views(
        &mut self,
        views: ViewConfiguration,
    ) -> RuntimeResult<Vec<ViewConfigurationView>>;
    fn swapchain_formats(&mut self, session: &Self::Session) -> RuntimeResult<Vec<ImageFormat>>;
    fn create_image_buffer(&mut self, desc: &ImageBufferDesc) -> RuntimeResult<Self::ImageBuffer>;
    fn create_swapchain(
        &mut self,
        session: &Self::Session,
        desc: &SwapchainDesc,
    ) -> RuntimeResult<Self::Swapchain>;
    fn swapchain_images(
        &mut self,
        swapchain: &Self::Swapchain,
    ) -> RuntimeResult<Vec<Self::SwapchainImage>>;
    fn create_render_target(
        &mut self,
        image: Self::SwapchainImage,
        color: &Self::ImageBuffer,
        depth: &Self::ImageBuffer,
        render_pass: &Self::RenderPass,
        desc: &RenderTargetDesc,
    ) -> RuntimeResult<Self::RenderTarget>;

    /// Returns the next queued event without blocking.
    fn poll_event(&mut self) -> RuntimeResult<Option<RuntimeEvent>>;
    fn begin_session(
        &mut self,
        session: &Self::Session,
        views: ViewConfiguration,
    ) -> RuntimeResult<()>;
    fn end_session(&mut self, session: &Self::Session) -> RuntimeResult<()>;

    /// Blocks until the runtime hands out the next frame slot.
    fn wait_frame(&mut self, session: &mut Self::Session) -> RuntimeResult<FrameState>;
    fn begin_frame(&mut self, session: &mut Self::Session) -> RuntimeResult<()>;
    fn locate_views(
        &mut self,
        session: &Self::Session,
        views: ViewConfiguration,
        space: &Self::Space,
        time: Time,
    ) -> RuntimeResult<(LocationFlags, Vec<View>)>;
    fn acquire_image(&mut self, swapchain: &mut Self::Swapchain) -> RuntimeResult<u32>;
    /// Blocks until the acquired image is writable; no timeout.
    fn wait_image(&mut self, swapchain: &mut Self::Swapchain) -> RuntimeResult<()>;
    fn release_image(&mut self, swapchain: &mut Self::Swapchain) -> RuntimeResult<()>;
    fn end_frame(
        &mut self,
        session: &mut Self::Session,
        display_time: Time,
        blend_mode: BlendMode,
        layer: Option<ProjectionLayer<'_, Self::Space, Self::Swapchain>>,
    ) -> RuntimeResult<()>;

    fn destroy_swapchain(&mut self, swapchain: Self::Swapchain);
    fn destroy_render_target(&mut self, target: Self::RenderTarget);
    fn destroy_space(&mut self, space: Self::Space);
    fn destroy_session(&mut self, session: Self::Session);
    fn destroy_image_buffer(&mut self, buffer: Self::ImageBuffer);
    fn destroy_render_pass(&mut self, render_pass: Self::RenderPass);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Pose,
    Float,
    Vector2,
    Boolean,
    Vibration,
}

/// Action, binding and input-state calls used by
/// [`InputSynchronizer`](crate::InputSynchronizer).
pub trait InputRuntime {
    /// Space poses are located against; matches the frame runtime's space.
    type Space;
    type ActionSet;
    type Action;
    type ActionSpace;
    type Path: Copy;

    fn string_to_path(&mut self, path: &str) -> RuntimeResult<Self::Path>;
    fn create_action_set(
        &mut self,
        name: &str,
        localized_name: &str,
        priority: u32,
    ) -> RuntimeResult<Self::ActionSet>;
    fn create_action(
        &mut self,
        set: &Self::ActionSet,
        name: &str,
        localized_name: &str,
        kind: ActionKind,
        subaction_paths: &[Self::Path],
    ) -> RuntimeResult<Self::Action>;
    fn suggest_bindings(
        &mut self,
        profile: Self::Path,
        bindings: &[(&Self::Action, Self::Path)],
    ) -> RuntimeResult<()>;
    fn create_action_space(
        &mut self,
        action: &Self::Action,
        subaction_path: Self::Path,
    ) -> RuntimeResult<Self::ActionSpace>;
    fn attach_action_set(&mut self, set: &Self::ActionSet) -> RuntimeResult<()>;

    fn sync_actions(&mut self, set: &Self::ActionSet) -> RuntimeResult<()>;
    fn pose_active(&mut self, action: &Self::Action, subaction_path: Self::Path)
        -> RuntimeResult<bool>;
    fn locate_space(
        &mut self,
        space: &Self::ActionSpace,
        base: &Self::Space,
        time: Time,
    ) -> RuntimeResult<SpaceLocation>;
    fn float_state(
        &mut self,
        action: &Self::Action,
        subaction_path: Self::Path,
    ) -> RuntimeResult<ActionState<f32>>;
    fn vector2_state(
        &mut self,
        action: &Self::Action,
        subaction_path: Self::Path,
    ) -> RuntimeResult<ActionState<Vec2>>;
    fn boolean_state(
        &mut self,
        action: &Self::Action,
        subaction_path: Self::Path,
    ) -> RuntimeResult<ActionState<bool>>;
    fn apply_haptic(
        &mut self,
        action: &Self::Action,
        subaction_path: Self::Path,
        vibration: HapticVibration,
    ) -> RuntimeResult<()>;
}
