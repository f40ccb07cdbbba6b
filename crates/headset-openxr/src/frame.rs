use std::rc::Rc;

use ash::vk::{self, Handle};
use glam::{Quat, Vec3, Vec4};
use openxr as xr;
use tracing::{debug, info};

use headset_core::runtime::{
    FrameRuntime, ImageBufferDesc, ProjectionLayer, RenderPassDesc, RenderTargetDesc,
    SwapchainDesc,
};
use headset_core::{
    BlendMode, Fov, FrameState, ImageFormat, LocationFlags, Pose, ReferenceSpaceKind,
    RuntimeError, RuntimeEvent, RuntimeResult, SessionState, Time, View, ViewConfiguration,
    ViewConfigurationView,
};

use crate::context::{view_configuration_type, XrContext};
use crate::vulkan::{self, ClearPass, ImageBuffer, RenderTarget};

/// Session handle plus the frame-timing halves openxr splits it into.
pub struct OpenXrSession {
    pub session: xr::Session<xr::Vulkan>,
    pub frame_waiter: xr::FrameWaiter,
    pub frame_stream: xr::FrameStream<xr::Vulkan>,
}

pub struct OpenXrFrameRuntime {
    context: Rc<XrContext>,
    event_buffer: xr::EventDataBuffer,
    clear_pass: Option<ClearPass>,
}

impl OpenXrFrameRuntime {
    pub fn new(context: Rc<XrContext>) -> RuntimeResult<Self> {
        let clear_pass = ClearPass::new(&context)?;
        Ok(Self {
            context,
            event_buffer: xr::EventDataBuffer::new(),
            clear_pass: Some(clear_pass),
        })
    }

    pub fn context(&self) -> &Rc<XrContext> {
        &self.context
    }

    /// Clears the acquired render target; stands in for real draw calls.
    pub fn clear(
        &self,
        render_pass: vk::RenderPass,
        target: &RenderTarget,
        color: Vec4,
    ) -> RuntimeResult<()> {
        match self.clear_pass.as_ref() {
            Some(pass) => pass.clear(&self.context, render_pass, target, color),
            None => Ok(()),
        }
    }
}

impl Drop for OpenXrFrameRuntime {
    fn drop(&mut self) {
        if let Some(pass) = self.clear_pass.take() {
            pass.destroy(&self.context);
        }
    }
}

fn xr_err(call: &'static str) -> impl FnOnce(xr::sys::Result) -> RuntimeError {
    move |code| RuntimeError::from_debug(call, code)
}

pub fn to_posef(pose: Pose) -> xr::Posef {
    xr::Posef {
        orientation: xr::Quaternionf {
            x: pose.orientation.x,
            y: pose.orientation.y,
            z: pose.orientation.z,
            w: pose.orientation.w,
        },
        position: xr::Vector3f {
            x: pose.position.x,
            y: pose.position.y,
            z: pose.position.z,
        },
    }
}

pub fn from_posef(pose: xr::Posef) -> Pose {
    Pose {
        position: Vec3::new(pose.position.x, pose.position.y, pose.position.z),
        orientation: Quat::from_xyzw(
            pose.orientation.x,
            pose.orientation.y,
            pose.orientation.z,
            pose.orientation.w,
        ),
    }
}

fn to_fovf(fov: Fov) -> xr::Fovf {
    xr::Fovf {
        angle_left: fov.angle_left,
        angle_right: fov.angle_right,
        angle_up: fov.angle_up,
        angle_down: fov.angle_down,
    }
}

fn from_fovf(fov: xr::Fovf) -> Fov {
    Fov {
        angle_left: fov.angle_left,
        angle_right: fov.angle_right,
        angle_up: fov.angle_up,
        angle_down: fov.angle_down,
    }
}

pub fn session_state(state: xr::SessionState) -> SessionState {
    match state {
        xr::SessionState::IDLE => SessionState::Idle,
        xr::SessionState::READY => SessionState::Ready,
        xr::SessionState::SYNCHRONIZED => SessionState::Synchronized,
        xr::SessionState::VISIBLE => SessionState::Visible,
        xr::SessionState::FOCUSED => SessionState::Focused,
        xr::SessionState::STOPPING => SessionState::Stopping,
        xr::SessionState::LOSS_PENDING => SessionState::LossPending,
        xr::SessionState::EXITING => SessionState::Exiting,
        _ => SessionState::Unknown,
    }
}

pub fn view_state_flags(flags: xr::ViewStateFlags) -> LocationFlags {
    let mut out = LocationFlags::empty();
    out.set(
        LocationFlags::ORIENTATION_VALID,
        flags.contains(xr::ViewStateFlags::ORIENTATION_VALID),
    );
    out.set(
        LocationFlags::POSITION_VALID,
        flags.contains(xr::ViewStateFlags::POSITION_VALID),
    );
    out.set(
        LocationFlags::ORIENTATION_TRACKED,
        flags.contains(xr::ViewStateFlags::ORIENTATION_TRACKED),
    );
    out.set(
        LocationFlags::POSITION_TRACKED,
        flags.contains(xr::ViewStateFlags::POSITION_TRACKED),
    );
    out
}

fn reference_space_type(kind: ReferenceSpaceKind) -> xr::ReferenceSpaceType {
    match kind {
        ReferenceSpaceKind::View => xr::ReferenceSpaceType::VIEW,
        ReferenceSpaceKind::Local => xr::ReferenceSpaceType::LOCAL,
        ReferenceSpaceKind::Stage => xr::ReferenceSpaceType::STAGE,
    }
}

fn describe_vk_swapchain_format(format: u32) -> &'static str {
    match vulkan::image_format(vk::Format::from_raw(format as i32)) {
        Some(ImageFormat::Rgba8Srgb) => "VK_FORMAT_R8G8B8A8_SRGB",
        Some(ImageFormat::Bgra8Srgb) => "VK_FORMAT_B8G8R8A8_SRGB",
        Some(ImageFormat::Rgba8Unorm) => "VK_FORMAT_R8G8B8A8_UNORM",
        Some(ImageFormat::Bgra8Unorm) => "VK_FORMAT_B8G8R8A8_UNORM",
        Some(ImageFormat::D32Sfloat) => "VK_FORMAT_D32_SFLOAT",
        None => "UNKNOWN_VK_FORMAT",
    }
}

impl FrameRuntime for OpenXrFrameRuntime {
    type RenderPass = vk::RenderPass;
    type Session = OpenXrSession;
    type Space = xr::Space;
    type ImageBuffer = ImageBuffer;
    type Swapchain = xr::Swapchain<xr::Vulkan>;
    type SwapchainImage = vk::Image;
    type RenderTarget = RenderTarget;

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> RuntimeResult<vk::RenderPass> {
        vulkan::create_render_pass(&self.context, desc)
    }

    fn create_session(&mut self) -> RuntimeResult<OpenXrSession> {
        let ctx = &self.context;
        let (session, frame_waiter, frame_stream) = unsafe {
            ctx.instance
                .create_session::<xr::Vulkan>(ctx.system, &ctx.session_create_info())
        }
        .map_err(xr_err("create_session"))?;
        Ok(OpenXrSession {
            session,
            frame_waiter,
            frame_stream,
        })
    }

    fn create_reference_space(
        &mut self,
        session: &OpenXrSession,
        kind: ReferenceSpaceKind,
        origin: Pose,
    ) -> RuntimeResult<xr::Space> {
        session
            .session
            .create_reference_space(reference_space_type(kind), to_posef(origin))
            .map_err(xr_err("create_reference_space"))
    }

    fn view_configuration_views(
        &mut self,
        views: ViewConfiguration,
    ) -> RuntimeResult<Vec<ViewConfigurationView>> {
        let ctx = &self.context;
        let views = ctx
            .instance
            .enumerate_view_configuration_views(ctx.system, view_configuration_type(views))
            .map_err(xr_err("enumerate_view_configuration_views"))?;
        Ok(views
            .into_iter()
            .map(|v| ViewConfigurationView {
                recommended_width: v.recommended_image_rect_width,
                recommended_height: v.recommended_image_rect_height,
                recommended_sample_count: v.recommended_swapchain_sample_count,
                max_width: v.max_image_rect_width,
                max_height: v.max_image_rect_height,
                max_sample_count: v.max_swapchain_sample_count,
            })
            .collect())
    }

    fn swapchain_formats(&mut self, session: &OpenXrSession) -> RuntimeResult<Vec<ImageFormat>> {
        let raw = session
            .session
            .enumerate_swapchain_formats()
            .map_err(xr_err("enumerate_swapchain_formats"))?;
        let names: Vec<&str> = raw.iter().map(|&f| describe_vk_swapchain_format(f)).collect();
        debug!(available = ?names, "runtime swapchain formats");
        Ok(raw
            .into_iter()
            .filter_map(|f| vulkan::image_format(vk::Format::from_raw(f as i32)))
            .collect())
    }

    fn create_image_buffer(&mut self, desc: &ImageBufferDesc) -> RuntimeResult<ImageBuffer> {
        vulkan::create_image_buffer(&self.context, desc)
    }

    fn create_swapchain(
        &mut self,
        session: &OpenXrSession,
        desc: &SwapchainDesc,
    ) -> RuntimeResult<xr::Swapchain<xr::Vulkan>> {
        let format = vulkan::vk_format(desc.format).as_raw() as u32;
        info!(
            format = describe_vk_swapchain_format(format),
            width = desc.width,
            height = desc.height,
            layers = desc.array_size,
            "creating swapchain"
        );
        session
            .session
            .create_swapchain(&xr::SwapchainCreateInfo {
                create_flags: xr::SwapchainCreateFlags::EMPTY,
                usage_flags: xr::SwapchainUsageFlags::COLOR_ATTACHMENT
                    | xr::SwapchainUsageFlags::SAMPLED,
                format,
                sample_count: desc.sample_count,
                width: desc.width,
                height: desc.height,
                face_count: desc.face_count,
                array_size: desc.array_size,
                mip_count: desc.mip_count,
            })
            .map_err(xr_err("create_swapchain"))
    }

    fn swapchain_images(
        &mut self,
        swapchain: &xr::Swapchain<xr::Vulkan>,
    ) -> RuntimeResult<Vec<vk::Image>> {
        let images = swapchain
            .enumerate_images()
            .map_err(xr_err("enumerate_swapchain_images"))?;
        Ok(images.into_iter().map(vk::Image::from_raw).collect())
    }

    fn create_render_target(
        &mut self,
        image: vk::Image,
        color: &ImageBuffer,
        depth: &ImageBuffer,
        render_pass: &vk::RenderPass,
        desc: &RenderTargetDesc,
    ) -> RuntimeResult<RenderTarget> {
        vulkan::create_render_target(&self.context, image, color, depth, *render_pass, desc)
    }

    fn poll_event(&mut self) -> RuntimeResult<Option<RuntimeEvent>> {
        let event = self
            .context
            .instance
            .poll_event(&mut self.event_buffer)
            .map_err(xr_err("poll_event"))?;
        Ok(event.map(|event| match event {
            xr::Event::InstanceLossPending(_) => RuntimeEvent::InstanceLossPending,
            xr::Event::SessionStateChanged(e) => {
                RuntimeEvent::SessionStateChanged(session_state(e.state()))
            }
            xr::Event::EventsLost(e) => RuntimeEvent::EventsLost(e.lost_event_count()),
            _ => RuntimeEvent::Other,
        }))
    }

    fn begin_session(
        &mut self,
        session: &OpenXrSession,
        views: ViewConfiguration,
    ) -> RuntimeResult<()> {
        session
            .session
            .begin(view_configuration_type(views))
            .map(|_| ())
            .map_err(xr_err("begin_session"))
    }

    fn end_session(&mut self, session: &OpenXrSession) -> RuntimeResult<()> {
        session
            .session
            .end()
            .map(|_| ())
            .map_err(xr_err("end_session"))
    }

    fn wait_frame(&mut self, session: &mut OpenXrSession) -> RuntimeResult<FrameState> {
        let state = session
            .frame_waiter
            .wait()
            .map_err(xr_err("wait_frame"))?;
        Ok(FrameState {
            predicted_display_time: Time::from_nanos(state.predicted_display_time.as_nanos()),
            predicted_display_period: state.predicted_display_period.as_nanos(),
            should_render: state.should_render,
        })
    }

    fn begin_frame(&mut self, session: &mut OpenXrSession) -> RuntimeResult<()> {
        session
            .frame_stream
            .begin()
            .map(|_| ())
            .map_err(xr_err("begin_frame"))
    }

    fn locate_views(
        &mut self,
        session: &OpenXrSession,
        views: ViewConfiguration,
        space: &xr::Space,
        time: Time,
    ) -> RuntimeResult<(LocationFlags, Vec<View>)> {
        let (flags, located) = session
            .session
            .locate_views(
                view_configuration_type(views),
                xr::Time::from_nanos(time.as_nanos()),
                space,
            )
            .map_err(xr_err("locate_views"))?;
        let located = located
            .into_iter()
            .map(|v| View {
                pose: from_posef(v.pose),
                fov: from_fovf(v.fov),
            })
            .collect();
        Ok((view_state_flags(flags), located))
    }

    fn acquire_image(&mut self, swapchain: &mut xr::Swapchain<xr::Vulkan>) -> RuntimeResult<u32> {
        swapchain.acquire_image().map_err(xr_err("acquire_image"))
    }

    fn wait_image(&mut self, swapchain: &mut xr::Swapchain<xr::Vulkan>) -> RuntimeResult<()> {
        swapchain
            .wait_image(xr::Duration::INFINITE)
            .map_err(xr_err("wait_image"))
    }

    fn release_image(&mut self, swapchain: &mut xr::Swapchain<xr::Vulkan>) -> RuntimeResult<()> {
        swapchain.release_image().map_err(xr_err("release_image"))
    }

    fn end_frame(
        &mut self,
        session: &mut OpenXrSession,
        display_time: Time,
        blend_mode: BlendMode,
        layer: Option<ProjectionLayer<'_, xr::Space, xr::Swapchain<xr::Vulkan>>>,
    ) -> RuntimeResult<()> {
        let time = xr::Time::from_nanos(display_time.as_nanos());
        let blend_mode = match blend_mode {
            BlendMode::Opaque => xr::EnvironmentBlendMode::OPAQUE,
        };

        let Some(layer) = layer else {
            return session
                .frame_stream
                .end(time, blend_mode, &[])
                .map_err(xr_err("end_frame"));
        };

        let views: Vec<xr::CompositionLayerProjectionView<xr::Vulkan>> = layer
            .views
            .iter()
            .map(|info| {
                let rect = info.sub_image.rect;
                xr::CompositionLayerProjectionView::new()
                    .pose(to_posef(info.pose))
                    .fov(to_fovf(info.fov))
                    .sub_image(
                        xr::SwapchainSubImage::new()
                            .swapchain(layer.swapchain)
                            .image_array_index(info.sub_image.array_index)
                            .image_rect(xr::Rect2Di {
                                offset: xr::Offset2Di {
                                    x: rect.x,
                                    y: rect.y,
                                },
                                extent: xr::Extent2Di {
                                    width: rect.width,
                                    height: rect.height,
                                },
                            }),
                    )
            })
            .collect();
        let projection = xr::CompositionLayerProjection::new()
            .space(layer.space)
            .views(&views);
        session
            .frame_stream
            .end(time, blend_mode, &[&projection])
            .map_err(xr_err("end_frame"))
    }

    fn destroy_swapchain(&mut self, swapchain: xr::Swapchain<xr::Vulkan>) {
        // Render targets view swapchain images; nothing may still be using them.
        unsafe {
            let _ = self.context.device.device_wait_idle();
        }
        drop(swapchain);
    }

    fn destroy_render_target(&mut self, target: RenderTarget) {
        vulkan::destroy_render_target(&self.context, target);
    }

    fn destroy_space(&mut self, space: xr::Space) {
        drop(space);
    }

    fn destroy_session(&mut self, session: OpenXrSession) {
        drop(session);
    }

    fn destroy_image_buffer(&mut self, buffer: ImageBuffer) {
        vulkan::destroy_image_buffer(&self.context, buffer);
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        unsafe { self.context.device.destroy_render_pass(render_pass, None) };
    }
}
