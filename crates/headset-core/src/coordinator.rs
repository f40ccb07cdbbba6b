//! Session life cycle and per-frame timing for a stereo headset.
//!
//! One tick is `begin_frame` → (input sync, draws) → `end_frame`. The
//! coordinator mirrors the runtime's session state from drained events and
//! only ever waits on the frame slot and on the acquired swapchain image.

use glam::Mat4;
use tracing::{debug, info, warn};

use crate::error::{ConstructionStage, HeadsetError, HeadsetResult, RuntimeError, StageExt};
use crate::math::{projection_matrix, view_matrix, FAR_CLIP, NEAR_CLIP};
use crate::runtime::{
    FrameRuntime, ImageBufferDesc, ImageUsage, ProjectionLayer, RenderPassDesc, RenderTargetDesc,
    SwapchainDesc,
};
use crate::types::{
    BlendMode, EyeRenderInfo, Extent2D, FrameState, ImageFormat, LocationFlags, Pose, Rect2D,
    ReferenceSpaceKind, RuntimeEvent, SessionState, SubImage, View, ViewConfiguration,
    ViewConfigurationView,
};

/// Construction parameters supplied by the device-runtime context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub view_configuration: ViewConfiguration,
    pub reference_space: ReferenceSpaceKind,
    pub color_format: ImageFormat,
    pub depth_format: ImageFormat,
    pub multisample_count: u32,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            view_configuration: ViewConfiguration::PrimaryStereo,
            reference_space: ReferenceSpaceKind::Stage,
            color_format: ImageFormat::Rgba8Srgb,
            depth_format: ImageFormat::D32Sfloat,
            multisample_count: 4,
        }
    }
}

/// Result of [`SessionFrameCoordinator::begin_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Nothing this tick: no input sync, no draws, no `end_frame` needed.
    SkipFully,
    /// The frame was begun but must not be drawn; still call `end_frame`.
    SkipRender,
    /// Draw into the render target at this swapchain index, then `end_frame`.
    RenderFully(u32),
    /// A runtime call failed; drop the frame and call `end_frame`.
    Error(RuntimeError),
}

pub struct SessionFrameCoordinator<R: FrameRuntime> {
    runtime: R,
    settings: CoordinatorSettings,

    render_pass: Option<R::RenderPass>,
    session: Option<R::Session>,
    space: Option<R::Space>,
    color_buffer: Option<R::ImageBuffer>,
    depth_buffer: Option<R::ImageBuffer>,
    swapchain: Option<R::Swapchain>,
    render_targets: Vec<R::RenderTarget>,

    eye_count: usize,
    eye_image_infos: Vec<ViewConfigurationView>,
    eye_poses: Vec<View>,
    eye_render_infos: Vec<EyeRenderInfo>,
    eye_view_matrices: Vec<Mat4>,
    eye_projection_matrices: Vec<Mat4>,

    frame_state: FrameState,
    view_state: LocationFlags,
    session_state: SessionState,
    session_running: bool,
    exit_requested: bool,
    frame_in_flight: bool,
    image_acquired: bool,
    image_ready: bool,
}

impl<R: FrameRuntime> SessionFrameCoordinator<R> {
    /// Builds every session resource in order. On failure the resources
    /// created so far are released in reverse order before returning.
    pub fn new(runtime: R, settings: CoordinatorSettings) -> HeadsetResult<Self> {
        let mut this = Self {
            runtime,
            settings,
            render_pass: None,
            session: None,
            space: None,
            color_buffer: None,
            depth_buffer: None,
            swapchain: None,
            render_targets: Vec::new(),
            eye_count: 0,
            eye_image_infos: Vec::new(),
            eye_poses: Vec::new(),
            eye_render_infos: Vec::new(),
            eye_view_matrices: Vec::new(),
            eye_projection_matrices: Vec::new(),
            frame_state: FrameState::default(),
            view_state: LocationFlags::empty(),
            session_state: SessionState::Unknown,
            session_running: false,
            exit_requested: false,
            frame_in_flight: false,
            image_acquired: false,
            image_ready: false,
        };
        // Dropping `this` on an early return runs the tolerant teardown.
        this.build()?;
        Ok(this)
    }

    fn build(&mut self) -> HeadsetResult<()> {
        let views = self.settings.view_configuration;
        let view_count = views.view_count();
        let samples = self.settings.multisample_count;

        let pass_desc = RenderPassDesc::multiview(
            views,
            self.settings.color_format,
            self.settings.depth_format,
            samples,
        );
        let render_pass = self
            .runtime
            .create_render_pass(&pass_desc)
            .at(ConstructionStage::RenderPass)?;
        let render_pass = &*self.render_pass.insert(render_pass);

        let session = self
            .runtime
            .create_session()
            .at(ConstructionStage::Session)?;
        let session = self.session.insert(session);

        let space = self
            .runtime
            .create_reference_space(session, self.settings.reference_space, Pose::IDENTITY)
            .at(ConstructionStage::ReferenceSpace)?;
        self.space = Some(space);

        let eye_image_infos = self
            .runtime
            .view_configuration_views(views)
            .at(ConstructionStage::ViewConfiguration)?;
        if eye_image_infos.len() != view_count {
            return Err(HeadsetError::construction(
                ConstructionStage::ViewConfiguration,
                RuntimeError::new(
                    "view_configuration_views",
                    format!(
                        "runtime reported {} views, {views:?} needs {view_count}",
                        eye_image_infos.len()
                    ),
                ),
            ));
        }
        self.eye_count = view_count;
        self.eye_poses = vec![View::default(); view_count];
        self.eye_image_infos = eye_image_infos;

        let formats = self
            .runtime
            .swapchain_formats(session)
            .at(ConstructionStage::SwapchainFormats)?;
        if !formats.contains(&self.settings.color_format) {
            return Err(HeadsetError::unsupported(format!(
                "swapchain color format {:?} (runtime offers {formats:?})",
                self.settings.color_format
            )));
        }

        let eye_info = self.eye_image_infos[0];
        let eye_extent = Extent2D {
            width: eye_info.recommended_width,
            height: eye_info.recommended_height,
        };
        let layers = view_count as u32;

        let color_buffer = self
            .runtime
            .create_image_buffer(&ImageBufferDesc {
                extent: eye_extent,
                format: self.settings.color_format,
                usage: ImageUsage::ColorAttachment,
                samples,
                layers,
            })
            .at(ConstructionStage::ColorBuffer)?;
        let color_buffer = self.color_buffer.insert(color_buffer);

        let depth_buffer = self
            .runtime
            .create_image_buffer(&ImageBufferDesc {
                extent: eye_extent,
                format: self.settings.depth_format,
                usage: ImageUsage::DepthStencilAttachment,
                samples,
                layers,
            })
            .at(ConstructionStage::DepthBuffer)?;
        let depth_buffer = self.depth_buffer.insert(depth_buffer);

        // One swapchain whose layers hold every eye: single-pass stereo.
        let swapchain = self
            .runtime
            .create_swapchain(
                session,
                &SwapchainDesc {
                    format: self.settings.color_format,
                    sample_count: eye_info.recommended_sample_count,
                    width: eye_info.recommended_width,
                    height: eye_info.recommended_height,
                    array_size: layers,
                    face_count: 1,
                    mip_count: 1,
                },
            )
            .at(ConstructionStage::Swapchain)?;
        let swapchain = self.swapchain.insert(swapchain);

        let images = self
            .runtime
            .swapchain_images(swapchain)
            .at(ConstructionStage::SwapchainImages)?;

        let target_desc = RenderTargetDesc {
            extent: eye_extent,
            format: self.settings.color_format,
            layers,
        };
        for image in images {
            let target = self
                .runtime
                .create_render_target(image, color_buffer, depth_buffer, render_pass, &target_desc)
                .at(ConstructionStage::RenderTargets)?;
            self.render_targets.push(target);
        }

        self.eye_render_infos = self
            .eye_image_infos
            .iter()
            .enumerate()
            .map(|(eye, info)| EyeRenderInfo {
                sub_image: SubImage {
                    array_index: eye as u32,
                    rect: Rect2D {
                        x: 0,
                        y: 0,
                        width: info.recommended_width as i32,
                        height: info.recommended_height as i32,
                    },
                },
                ..EyeRenderInfo::default()
            })
            .collect();
        self.eye_view_matrices = vec![Mat4::IDENTITY; view_count];
        self.eye_projection_matrices = vec![Mat4::IDENTITY; view_count];

        info!(
            eyes = view_count,
            width = eye_extent.width,
            height = eye_extent.height,
            samples,
            images = self.render_targets.len(),
            "headset session resources ready"
        );
        Ok(())
    }

    /// Starts a tick. See [`FrameOutcome`] for what the caller owes afterwards.
    pub fn begin_frame(&mut self) -> FrameOutcome {
        if self.frame_in_flight {
            return FrameOutcome::Error(RuntimeError::new(
                "begin_frame",
                "previous frame was not ended",
            ));
        }

        while let Some(event) = match self.runtime.poll_event() {
            Ok(event) => event,
            Err(err) => return FrameOutcome::Error(err),
        } {
            match event {
                RuntimeEvent::InstanceLossPending => {
                    warn!("runtime instance loss pending");
                    self.exit_requested = true;
                    return FrameOutcome::SkipFully;
                }
                RuntimeEvent::SessionStateChanged(state) => {
                    info!(from = ?self.session_state, to = ?state, "session state changed");
                    self.session_state = state;
                    match state {
                        SessionState::Ready => {
                            if let Err(err) = self.begin_session() {
                                return FrameOutcome::Error(err);
                            }
                        }
                        SessionState::Stopping => {
                            if let Err(err) = self.end_session() {
                                return FrameOutcome::Error(err);
                            }
                        }
                        _ if state.is_terminal() => {
                            self.exit_requested = true;
                            return FrameOutcome::SkipFully;
                        }
                        _ => {}
                    }
                }
                RuntimeEvent::EventsLost(count) => warn!(count, "runtime dropped events"),
                RuntimeEvent::Other => {}
            }
        }

        if !self.session_state.is_active() {
            return FrameOutcome::SkipFully;
        }

        let Some(session) = self.session.as_mut() else {
            return FrameOutcome::Error(RuntimeError::new("begin_frame", "no session"));
        };

        self.view_state = LocationFlags::empty();
        self.frame_state = match self.runtime.wait_frame(session) {
            Ok(state) => state,
            Err(err) => return FrameOutcome::Error(err),
        };
        if let Err(err) = self.runtime.begin_frame(session) {
            return FrameOutcome::Error(err);
        }
        self.frame_in_flight = true;

        if !self.frame_state.should_render {
            return FrameOutcome::SkipRender;
        }

        match self.locate_eyes() {
            Ok(()) => {}
            Err(err) => return FrameOutcome::Error(err),
        }

        let Some(swapchain) = self.swapchain.as_mut() else {
            return FrameOutcome::Error(RuntimeError::new("begin_frame", "no swapchain"));
        };
        let image_index = match self.runtime.acquire_image(swapchain) {
            Ok(index) => index,
            Err(err) => return FrameOutcome::Error(err),
        };
        self.image_acquired = true;
        if let Err(err) = self.runtime.wait_image(swapchain) {
            return FrameOutcome::Error(err);
        }
        self.image_ready = true;

        FrameOutcome::RenderFully(image_index)
    }

    fn locate_eyes(&mut self) -> Result<(), RuntimeError> {
        let (Some(session), Some(space)) = (self.session.as_ref(), self.space.as_ref()) else {
            return Err(RuntimeError::new("locate_views", "no session"));
        };
        let (view_state, views) = self.runtime.locate_views(
            session,
            self.settings.view_configuration,
            space,
            self.frame_state.predicted_display_time,
        )?;
        if views.len() != self.eye_count {
            return Err(RuntimeError::new(
                "locate_views",
                format!("located {} views, expected {}", views.len(), self.eye_count),
            ));
        }

        for (eye, view) in views.into_iter().enumerate() {
            self.eye_poses[eye] = view;
            let info = &mut self.eye_render_infos[eye];
            info.pose = view.pose;
            info.fov = view.fov;
            self.eye_view_matrices[eye] = view_matrix(&view.pose);
            self.eye_projection_matrices[eye] = projection_matrix(&view.fov, NEAR_CLIP, FAR_CLIP);
        }
        self.view_state = view_state;
        Ok(())
    }

    /// Finishes the tick begun by [`begin_frame`](Self::begin_frame).
    ///
    /// Failures are logged and absorbed; the next tick starts clean.
    pub fn end_frame(&mut self) {
        if !self.frame_in_flight {
            return;
        }
        self.frame_in_flight = false;

        let (Some(session), Some(swapchain), Some(space)) = (
            self.session.as_mut(),
            self.swapchain.as_mut(),
            self.space.as_ref(),
        ) else {
            return;
        };

        // Only an image that was acquired, waited on and released this frame
        // may back a projection layer.
        let mut released = false;
        if self.image_acquired {
            self.image_acquired = false;
            match self.runtime.release_image(swapchain) {
                Ok(()) => released = self.image_ready,
                Err(err) => warn!("submitting empty frame: {err}"),
            }
        }
        self.image_ready = false;

        let submit_layer =
            released && self.frame_state.should_render && self.view_state.pose_valid();
        let layer = if submit_layer {
            Some(ProjectionLayer {
                space,
                swapchain: &*swapchain,
                views: &self.eye_render_infos,
            })
        } else {
            None
        };

        if let Err(err) = self.runtime.end_frame(
            session,
            self.frame_state.predicted_display_time,
            BlendMode::Opaque,
            layer,
        ) {
            warn!("frame submission failed: {err}");
        }
    }

    fn begin_session(&mut self) -> Result<(), RuntimeError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| RuntimeError::new("begin_session", "no session"))?;
        self.runtime
            .begin_session(session, self.settings.view_configuration)?;
        self.session_running = true;
        info!("session begun");
        Ok(())
    }

    fn end_session(&mut self) -> Result<(), RuntimeError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| RuntimeError::new("end_session", "no session"))?;
        self.runtime.end_session(session)?;
        self.session_running = false;
        info!("session ended");
        Ok(())
    }

    /// True when every session resource exists.
    pub fn is_valid(&self) -> bool {
        self.render_pass.is_some()
            && self.session.is_some()
            && self.space.is_some()
            && self.color_buffer.is_some()
            && self.depth_buffer.is_some()
            && self.swapchain.is_some()
            && !self.render_targets.is_empty()
    }

    pub fn is_exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn session_state(&self) -> SessionState {
        self.session_state
    }

    pub fn eye_count(&self) -> usize {
        self.eye_count
    }

    pub fn eye_resolution(&self, eye: usize) -> Option<Extent2D> {
        self.eye_image_infos.get(eye).map(|info| Extent2D {
            width: info.recommended_width,
            height: info.recommended_height,
        })
    }

    pub fn eye_view_matrix(&self, eye: usize) -> Option<Mat4> {
        self.eye_view_matrices.get(eye).copied()
    }

    pub fn eye_projection_matrix(&self, eye: usize) -> Option<Mat4> {
        self.eye_projection_matrices.get(eye).copied()
    }

    pub fn eye_view_matrices(&self) -> &[Mat4] {
        &self.eye_view_matrices
    }

    pub fn eye_projection_matrices(&self) -> &[Mat4] {
        &self.eye_projection_matrices
    }

    pub fn eye_poses(&self) -> &[View] {
        &self.eye_poses
    }

    pub fn eye_render_infos(&self) -> &[EyeRenderInfo] {
        &self.eye_render_infos
    }

    pub fn frame_state(&self) -> FrameState {
        self.frame_state
    }

    pub fn render_pass(&self) -> Option<&R::RenderPass> {
        self.render_pass.as_ref()
    }

    pub fn render_target(&self, image_index: u32) -> Option<&R::RenderTarget> {
        self.render_targets.get(image_index as usize)
    }

    pub fn render_target_count(&self) -> usize {
        self.render_targets.len()
    }

    pub fn reference_space(&self) -> Option<&R::Space> {
        self.space.as_ref()
    }

    pub fn session(&self) -> Option<&R::Session> {
        self.session.as_ref()
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }
}

impl<R: FrameRuntime> Drop for SessionFrameCoordinator<R> {
    fn drop(&mut self) {
        if self.session_running {
            if let Some(session) = self.session.as_ref() {
                if let Err(err) = self.runtime.end_session(session) {
                    debug!("end session during teardown: {err}");
                }
            }
            self.session_running = false;
        }
        if let Some(swapchain) = self.swapchain.take() {
            self.runtime.destroy_swapchain(swapchain);
        }
        for target in self.render_targets.drain(..) {
            self.runtime.destroy_render_target(target);
        }
        if let Some(space) = self.space.take() {
            self.runtime.destroy_space(space);
        }
        if let Some(session) = self.session.take() {
            self.runtime.destroy_session(session);
        }
        if let Some(depth) = self.depth_buffer.take() {
            self.runtime.destroy_image_buffer(depth);
        }
        if let Some(color) = self.color_buffer.take() {
            self.runtime.destroy_image_buffer(color);
        }
        if let Some(render_pass) = self.render_pass.take() {
            self.runtime.destroy_render_pass(render_pass);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::pose_to_matrix;
    use crate::testing::{Call, FrameScript, MockFrameRuntime, Resource};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Mock = SessionFrameCoordinator<MockFrameRuntime>;

    fn build(
        script: FrameScript,
        settings: CoordinatorSettings,
    ) -> (HeadsetResult<Mock>, Rc<RefCell<FrameScript>>) {
        let (runtime, script) = MockFrameRuntime::new(script);
        (SessionFrameCoordinator::new(runtime, settings), script)
    }

    /// Stereo coordinator whose first tick moves the session to Ready.
    fn ready() -> (Mock, Rc<RefCell<FrameScript>>) {
        let mut script = FrameScript::stereo();
        script.push_state(SessionState::Ready);
        let (coordinator, script) = build(script, CoordinatorSettings::default());
        (coordinator.unwrap(), script)
    }

    fn fail_key(stage: ConstructionStage) -> &'static str {
        match stage {
            ConstructionStage::RenderPass => "create_render_pass",
            ConstructionStage::Session => "create_session",
            ConstructionStage::ReferenceSpace => "create_reference_space",
            ConstructionStage::ViewConfiguration => "view_configuration_views",
            ConstructionStage::SwapchainFormats => "swapchain_formats",
            ConstructionStage::ColorBuffer => "create_color_buffer",
            ConstructionStage::DepthBuffer => "create_depth_buffer",
            ConstructionStage::Swapchain => "create_swapchain",
            ConstructionStage::SwapchainImages => "swapchain_images",
            ConstructionStage::RenderTargets => "create_render_target",
            other => panic!("{other} is not a coordinator stage"),
        }
    }

    fn teardown_rank(resource: Resource) -> usize {
        match resource {
            Resource::Swapchain => 0,
            Resource::RenderTarget => 1,
            Resource::Space => 2,
            Resource::Session => 3,
            Resource::DepthBuffer => 4,
            Resource::ColorBuffer => 5,
            Resource::RenderPass => 6,
        }
    }

    fn assert_clean_teardown(script: &FrameScript) {
        assert!(script.live.is_empty(), "leaked {:?}", script.live);
        assert!(!script.double_release);
        let ranks: Vec<_> = script.destroyed().into_iter().map(teardown_rank).collect();
        assert!(
            ranks.windows(2).all(|w| w[0] <= w[1]),
            "out of order teardown {:?}",
            script.destroyed()
        );
    }

    #[test]
    fn test_stereo_storage_is_sized_per_eye() {
        let (coordinator, script) = build(FrameScript::stereo(), CoordinatorSettings::default());
        let coordinator = coordinator.unwrap();
        assert!(coordinator.is_valid());
        assert_eq!(coordinator.eye_count(), 2);
        assert_eq!(coordinator.eye_poses().len(), 2);
        assert_eq!(coordinator.eye_view_matrices().len(), 2);
        assert_eq!(coordinator.eye_projection_matrices().len(), 2);
        assert_eq!(coordinator.render_target_count(), 3);
        assert!(coordinator.eye_resolution(2).is_none());

        for (eye, info) in coordinator.eye_render_infos().iter().enumerate() {
            assert_eq!(info.sub_image.array_index, eye as u32);
            assert_eq!(info.sub_image.rect.width, 1832);
            assert_eq!(info.sub_image.rect.height, 1920);
        }

        let script = script.borrow();
        let swapchain = script.swapchain_desc.unwrap();
        assert_eq!(swapchain.array_size, 2);
        assert_eq!(swapchain.format, ImageFormat::Rgba8Srgb);
        assert!(script.image_buffer_descs.iter().all(|d| d.layers == 2 && d.samples == 4));
        let pass = script.render_pass_desc.unwrap();
        assert_eq!(pass.view_mask, 0b11);
        assert_eq!(pass.resolve.samples, 1);
        assert_eq!(
            script
                .created()
                .iter()
                .filter(|r| **r == Resource::Swapchain)
                .count(),
            1
        );
    }

    #[test]
    fn test_mono_uses_single_layer() {
        let settings = CoordinatorSettings {
            view_configuration: ViewConfiguration::Mono,
            ..CoordinatorSettings::default()
        };
        let (coordinator, script) = build(FrameScript::with_views(1), settings);
        let coordinator = coordinator.unwrap();
        assert_eq!(coordinator.eye_count(), 1);
        assert_eq!(script.borrow().swapchain_desc.unwrap().array_size, 1);
        assert_eq!(script.borrow().render_pass_desc.unwrap().view_mask, 1);
    }

    #[test]
    fn test_view_count_mismatch_fails_construction() {
        let (coordinator, script) =
            build(FrameScript::with_views(1), CoordinatorSettings::default());
        let err = coordinator.err().unwrap();
        assert_eq!(err.stage(), Some(ConstructionStage::ViewConfiguration));
        let script = script.borrow();
        assert_eq!(
            script.destroyed(),
            vec![Resource::Space, Resource::Session, Resource::RenderPass]
        );
        assert_clean_teardown(&script);
    }

    #[test]
    fn test_missing_color_format_is_unsupported() {
        let mut script = FrameScript::stereo();
        script.formats = vec![ImageFormat::Bgra8Unorm];
        let (coordinator, script) = build(script, CoordinatorSettings::default());
        assert!(matches!(
            coordinator.err().unwrap(),
            HeadsetError::UnsupportedFeature(_)
        ));
        assert_clean_teardown(&script.borrow());
    }

    #[test]
    fn test_teardown_after_failure_at_every_stage() {
        for stage in ConstructionStage::COORDINATOR {
            let mut script = FrameScript::stereo();
            script.fail.insert(fail_key(stage));
            let (coordinator, script) = build(script, CoordinatorSettings::default());
            let err = coordinator.err().unwrap();
            assert_eq!(err.stage(), Some(stage));
            let script = script.borrow();
            assert_clean_teardown(&script);
            assert_eq!(script.created().len(), script.destroyed().len(), "{stage}");
        }
    }

    #[test]
    fn test_full_teardown_order() {
        let (coordinator, script) = ready();
        drop(coordinator);
        let script = script.borrow();
        assert_eq!(
            script.destroyed(),
            vec![
                Resource::Swapchain,
                Resource::RenderTarget,
                Resource::RenderTarget,
                Resource::RenderTarget,
                Resource::Space,
                Resource::Session,
                Resource::DepthBuffer,
                Resource::ColorBuffer,
                Resource::RenderPass,
            ]
        );
        assert_clean_teardown(&script);
    }

    #[test]
    fn test_drop_ends_running_session_first() {
        let (mut coordinator, script) = ready();
        assert_eq!(coordinator.begin_frame(), FrameOutcome::RenderFully(1));
        coordinator.end_frame();
        script.borrow_mut().clear_calls();
        drop(coordinator);
        let script = script.borrow();
        assert_eq!(script.calls[0], Call::EndSession);
        assert!(matches!(script.calls[1], Call::Destroy(Resource::Swapchain, _)));
    }

    #[test]
    fn test_inactive_states_skip_fully() {
        for state in SessionState::ALL.into_iter().filter(|s| !s.is_active()) {
            let mut script = FrameScript::stereo();
            script.push_state(state);
            let (coordinator, script) = build(script, CoordinatorSettings::default());
            let mut coordinator = coordinator.unwrap();
            assert_eq!(coordinator.begin_frame(), FrameOutcome::SkipFully, "{state:?}");
            assert_eq!(coordinator.session_state(), state);
            coordinator.end_frame();
            let script = script.borrow();
            assert_eq!(script.count(&Call::WaitFrame), 0);
            assert_eq!(script.count(&Call::BeginFrame), 0);
            assert!(script.end_frames().is_empty());
        }
    }

    #[test]
    fn test_no_events_keeps_unknown_state_skipping() {
        let (coordinator, script) = build(FrameScript::stereo(), CoordinatorSettings::default());
        let mut coordinator = coordinator.unwrap();
        assert_eq!(coordinator.begin_frame(), FrameOutcome::SkipFully);
        assert_eq!(coordinator.session_state(), SessionState::Unknown);
        assert_eq!(script.borrow().count(&Call::WaitFrame), 0);
    }

    #[test]
    fn test_ready_begins_session_and_renders() {
        let (mut coordinator, script) = ready();
        assert_eq!(coordinator.begin_frame(), FrameOutcome::RenderFully(1));
        coordinator.end_frame();

        let script = script.borrow();
        assert_eq!(
            script
                .calls
                .iter()
                .filter(|c| !matches!(c, Call::Create(..)))
                .cloned()
                .collect::<Vec<_>>(),
            vec![
                Call::BeginSession,
                Call::WaitFrame,
                Call::BeginFrame,
                Call::LocateViews,
                Call::AcquireImage,
                Call::WaitImage,
                Call::ReleaseImage,
                Call::EndFrame {
                    layer_views: Some(2)
                },
            ]
        );
    }

    #[test]
    fn test_stopping_ends_session() {
        let (mut coordinator, script) = ready();
        assert_eq!(coordinator.begin_frame(), FrameOutcome::RenderFully(1));
        coordinator.end_frame();
        script.borrow_mut().push_state(SessionState::Stopping);
        assert_eq!(coordinator.begin_frame(), FrameOutcome::SkipFully);
        assert_eq!(script.borrow().count(&Call::EndSession), 1);

        // Not running any more, so teardown does not end it again.
        drop(coordinator);
        assert_eq!(script.borrow().count(&Call::EndSession), 1);
    }

    #[test]
    fn test_should_render_false_skips_render() {
        let (mut coordinator, script) = ready();
        script.borrow_mut().frame_state.should_render = false;
        assert_eq!(coordinator.begin_frame(), FrameOutcome::SkipRender);
        coordinator.end_frame();

        let script = script.borrow();
        assert_eq!(script.count(&Call::LocateViews), 0);
        assert_eq!(script.count(&Call::AcquireImage), 0);
        assert_eq!(script.count(&Call::ReleaseImage), 0);
        assert_eq!(script.end_frames(), vec![None]);
    }

    #[test]
    fn test_layer_submitted_only_when_renderable_and_located() {
        for mask in 0..8u8 {
            let should_render = mask & 1 != 0;
            let mut flags = LocationFlags::empty();
            if mask & 2 != 0 {
                flags |= LocationFlags::POSITION_VALID;
            }
            if mask & 4 != 0 {
                flags |= LocationFlags::ORIENTATION_VALID;
            }

            let (mut coordinator, script) = ready();
            {
                let mut script = script.borrow_mut();
                script.frame_state.should_render = should_render;
                script.view_state = flags;
            }
            coordinator.begin_frame();
            coordinator.end_frame();

            let expected = (mask == 7).then_some(2);
            assert_eq!(script.borrow().end_frames(), vec![expected], "mask {mask:#05b}");
        }
    }

    #[test]
    fn test_located_view_count_mismatch_is_error() {
        let (mut coordinator, script) = ready();
        let single = coordinator.eye_poses()[0];
        script.borrow_mut().located_views = Some(vec![single]);
        assert!(matches!(coordinator.begin_frame(), FrameOutcome::Error(_)));
        coordinator.end_frame();

        let script = script.borrow();
        assert_eq!(script.count(&Call::AcquireImage), 0);
        assert_eq!(script.end_frames(), vec![None]);
    }

    #[test]
    fn test_wait_frame_failure_is_error() {
        let (mut coordinator, script) = ready();
        script.borrow_mut().fail.insert("wait_frame");
        match coordinator.begin_frame() {
            FrameOutcome::Error(err) => assert_eq!(err.call, "wait_frame"),
            other => panic!("unexpected {other:?}"),
        }
        coordinator.end_frame();
        assert!(script.borrow().end_frames().is_empty());
    }

    #[test]
    fn test_eye_matrices_follow_located_views() {
        let (mut coordinator, _script) = ready();
        assert_eq!(coordinator.begin_frame(), FrameOutcome::RenderFully(1));
        for eye in 0..coordinator.eye_count() {
            let view = coordinator.eye_poses()[eye];
            let product = coordinator.eye_view_matrix(eye).unwrap() * pose_to_matrix(&view.pose);
            assert!(product.abs_diff_eq(Mat4::IDENTITY, 1e-5));
            assert_eq!(
                coordinator.eye_projection_matrix(eye),
                Some(projection_matrix(&view.fov, NEAR_CLIP, FAR_CLIP))
            );
            assert_eq!(coordinator.eye_render_infos()[eye].pose, view.pose);
        }
        assert_ne!(coordinator.eye_poses()[0].pose, coordinator.eye_poses()[1].pose);
        coordinator.end_frame();
    }

    #[test]
    fn test_begin_twice_without_end_is_error() {
        let (mut coordinator, script) = ready();
        assert_eq!(coordinator.begin_frame(), FrameOutcome::RenderFully(1));
        assert!(matches!(coordinator.begin_frame(), FrameOutcome::Error(_)));
        assert_eq!(script.borrow().count(&Call::WaitFrame), 1);
        coordinator.end_frame();
        assert_eq!(coordinator.begin_frame(), FrameOutcome::RenderFully(1));
    }

    #[test]
    fn test_end_without_begin_is_noop() {
        let (mut coordinator, script) = ready();
        script.borrow_mut().clear_calls();
        coordinator.end_frame();
        assert!(script.borrow().calls.is_empty());
    }

    #[test]
    fn test_release_failure_submits_empty_frame() {
        let (mut coordinator, script) = ready();
        script.borrow_mut().fail.insert("release_image");
        assert_eq!(coordinator.begin_frame(), FrameOutcome::RenderFully(1));
        coordinator.end_frame();
        assert_eq!(script.borrow().end_frames(), vec![None]);

        script.borrow_mut().fail.clear();
        assert_eq!(coordinator.begin_frame(), FrameOutcome::RenderFully(1));
        coordinator.end_frame();
        assert_eq!(script.borrow().end_frames(), vec![None, Some(2)]);
    }

    fn expect_error(outcome: FrameOutcome, call: &str) {
        match outcome {
            FrameOutcome::Error(err) => assert_eq!(err.call, call),
            other => panic!("expected {call} error, got {other:?}"),
        }
    }

    #[test]
    fn test_acquire_failure_submits_empty_frame() {
        let (mut coordinator, script) = ready();
        script.borrow_mut().fail.insert("acquire_image");
        expect_error(coordinator.begin_frame(), "acquire_image");
        coordinator.end_frame();

        let script = script.borrow();
        assert_eq!(script.count(&Call::WaitImage), 0);
        assert_eq!(script.count(&Call::ReleaseImage), 0);
        assert_eq!(script.end_frames(), vec![None]);
    }

    #[test]
    fn test_wait_image_failure_releases_and_submits_empty_frame() {
        let (mut coordinator, script) = ready();
        script.borrow_mut().fail.insert("wait_image");
        expect_error(coordinator.begin_frame(), "wait_image");
        coordinator.end_frame();
        assert_eq!(script.borrow().count(&Call::ReleaseImage), 1);
        assert_eq!(script.borrow().end_frames(), vec![None]);

        script.borrow_mut().fail.clear();
        assert_eq!(coordinator.begin_frame(), FrameOutcome::RenderFully(1));
        coordinator.end_frame();
        assert_eq!(script.borrow().end_frames(), vec![None, Some(2)]);
    }

    #[test]
    fn test_begin_session_failure_is_error_without_retry() {
        let (mut coordinator, script) = ready();
        script.borrow_mut().fail.insert("begin_session");
        expect_error(coordinator.begin_frame(), "begin_session");
        assert_eq!(coordinator.session_state(), SessionState::Ready);
        assert_eq!(script.borrow().count(&Call::WaitFrame), 0);

        // The state is not re-announced, so the next tick runs the frame loop.
        script.borrow_mut().fail.clear();
        assert_eq!(coordinator.begin_frame(), FrameOutcome::RenderFully(1));
        coordinator.end_frame();
        assert_eq!(script.borrow().count(&Call::BeginSession), 1);

        // Never marked running, so teardown does not end it.
        drop(coordinator);
        assert_eq!(script.borrow().count(&Call::EndSession), 0);
    }

    #[test]
    fn test_end_session_failure_is_error() {
        let (mut coordinator, script) = ready();
        assert_eq!(coordinator.begin_frame(), FrameOutcome::RenderFully(1));
        coordinator.end_frame();
        {
            let mut script = script.borrow_mut();
            script.fail.insert("end_session");
            script.push_state(SessionState::Stopping);
        }
        expect_error(coordinator.begin_frame(), "end_session");
        assert_eq!(coordinator.session_state(), SessionState::Stopping);
        assert_eq!(coordinator.begin_frame(), FrameOutcome::SkipFully);
    }

    #[test]
    fn test_poll_event_failure_is_error() {
        let (mut coordinator, script) = ready();
        script.borrow_mut().fail.insert("poll_event");
        expect_error(coordinator.begin_frame(), "poll_event");
        coordinator.end_frame();

        let script = script.borrow();
        assert_eq!(script.count(&Call::WaitFrame), 0);
        assert!(script.end_frames().is_empty());
    }

    #[test]
    fn test_instance_loss_requests_exit() {
        let (mut coordinator, script) = ready();
        script
            .borrow_mut()
            .events
            .push_back(RuntimeEvent::InstanceLossPending);
        // The queued Ready is drained first, then loss cuts the tick short.
        assert_eq!(coordinator.begin_frame(), FrameOutcome::SkipFully);
        assert!(coordinator.is_exit_requested());
        assert_eq!(script.borrow().count(&Call::WaitFrame), 0);
    }

    #[test]
    fn test_terminal_states_request_exit() {
        for state in [SessionState::LossPending, SessionState::Exiting] {
            let (mut coordinator, script) = ready();
            coordinator.begin_frame();
            coordinator.end_frame();
            assert!(!coordinator.is_exit_requested());
            script.borrow_mut().push_state(state);
            assert_eq!(coordinator.begin_frame(), FrameOutcome::SkipFully, "{state:?}");
            assert!(coordinator.is_exit_requested());
        }
    }
}
