//! Scripted in-memory runtimes for unit tests.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::rc::Rc;

use glam::{Quat, Vec2, Vec3};

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::{
    ActionKind, FrameRuntime, ImageBufferDesc, ImageUsage, InputRuntime, ProjectionLayer,
    RenderPassDesc, RenderTargetDesc, SwapchainDesc,
};
use crate::types::{
    ActionState, BlendMode, Fov, FrameState, HapticVibration, ImageFormat, LocationFlags, Pose,
    ReferenceSpaceKind, RuntimeEvent, SessionState, SpaceLocation, Time, View, ViewConfiguration,
    ViewConfigurationView,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    RenderPass,
    Session,
    Space,
    ColorBuffer,
    DepthBuffer,
    Swapchain,
    RenderTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(Resource, u32),
    Destroy(Resource, u32),
    BeginSession,
    EndSession,
    WaitFrame,
    BeginFrame,
    LocateViews,
    AcquireImage,
    WaitImage,
    ReleaseImage,
    EndFrame { layer_views: Option<usize> },
}

#[derive(Debug)]
pub struct Handle {
    resource: Resource,
    id: u32,
}

#[derive(Debug)]
pub struct FrameScript {
    pub fail: HashSet<&'static str>,
    pub view_infos: Vec<ViewConfigurationView>,
    pub formats: Vec<ImageFormat>,
    pub image_count: u32,
    pub events: VecDeque<RuntimeEvent>,
    pub frame_state: FrameState,
    pub view_state: LocationFlags,
    pub located_views: Option<Vec<View>>,
    pub calls: Vec<Call>,
    pub live: BTreeSet<(Resource, u32)>,
    pub double_release: bool,
    pub render_pass_desc: Option<RenderPassDesc>,
    pub image_buffer_descs: Vec<ImageBufferDesc>,
    pub swapchain_desc: Option<SwapchainDesc>,
    next_id: u32,
    targets_created: u32,
}

impl FrameScript {
    pub fn stereo() -> Self {
        Self::with_views(2)
    }

    pub fn with_views(count: usize) -> Self {
        let info = ViewConfigurationView {
            recommended_width: 1832,
            recommended_height: 1920,
            recommended_sample_count: 1,
            max_width: 4096,
            max_height: 4096,
            max_sample_count: 4,
        };
        Self {
            fail: HashSet::new(),
            view_infos: vec![info; count],
            formats: vec![ImageFormat::Bgra8Srgb, ImageFormat::Rgba8Srgb],
            image_count: 3,
            events: VecDeque::new(),
            frame_state: FrameState {
                predicted_display_time: Time::from_nanos(1_000_000),
                predicted_display_period: 11_111_111,
                should_render: true,
            },
            view_state: LocationFlags::POSITION_VALID | LocationFlags::ORIENTATION_VALID,
            located_views: None,
            calls: Vec::new(),
            live: BTreeSet::new(),
            double_release: false,
            render_pass_desc: None,
            image_buffer_descs: Vec::new(),
            swapchain_desc: None,
            next_id: 1,
            targets_created: 0,
        }
    }

    pub fn push_state(&mut self, state: SessionState) {
        self.events.push_back(RuntimeEvent::SessionStateChanged(state));
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    pub fn destroyed(&self) -> Vec<Resource> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Destroy(resource, _) => Some(*resource),
                _ => None,
            })
            .collect()
    }

    pub fn created(&self) -> Vec<Resource> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::Create(resource, _) => Some(*resource),
                _ => None,
            })
            .collect()
    }

    pub fn end_frames(&self) -> Vec<Option<usize>> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::EndFrame { layer_views } => Some(*layer_views),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    fn default_views(&self) -> Vec<View> {
        let half = 45f32.to_radians();
        (0..self.view_infos.len())
            .map(|eye| View {
                pose: Pose {
                    position: Vec3::new(if eye == 0 { -0.032 } else { 0.032 }, 1.6, 0.0),
                    orientation: Quat::from_rotation_y(0.1),
                },
                fov: Fov {
                    angle_left: -half,
                    angle_right: half,
                    angle_up: half,
                    angle_down: -half,
                },
            })
            .collect()
    }
}

pub struct MockFrameRuntime {
    pub script: Rc<RefCell<FrameScript>>,
}

impl MockFrameRuntime {
    pub fn new(script: FrameScript) -> (Self, Rc<RefCell<FrameScript>>) {
        let script = Rc::new(RefCell::new(script));
        (
            Self {
                script: Rc::clone(&script),
            },
            script,
        )
    }

    fn check(&self, call: &'static str) -> RuntimeResult<()> {
        if self.script.borrow().fail.contains(call) {
            Err(RuntimeError::new(call, "injected failure"))
        } else {
            Ok(())
        }
    }

    fn create(&mut self, call: &'static str, resource: Resource) -> RuntimeResult<Handle> {
        self.check(call)?;
        let mut script = self.script.borrow_mut();
        let id = script.next_id;
        script.next_id += 1;
        script.live.insert((resource, id));
        script.calls.push(Call::Create(resource, id));
        Ok(Handle { resource, id })
    }

    fn destroy(&mut self, handle: Handle) {
        let mut script = self.script.borrow_mut();
        if !script.live.remove(&(handle.resource, handle.id)) {
            script.double_release = true;
        }
        script.calls.push(Call::Destroy(handle.resource, handle.id));
    }

    fn record(&mut self, call: Call) {
        self.script.borrow_mut().calls.push(call);
    }
}

impl FrameRuntime for MockFrameRuntime {
    type RenderPass = Handle;
    type Session = Handle;
    type Space = Handle;
    type ImageBuffer = Handle;
    type Swapchain = Handle;
    type SwapchainImage = u32;
    type RenderTarget = Handle;

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> RuntimeResult<Handle> {
        self.script.borrow_mut().render_pass_desc = Some(*desc);
        self.create("create_render_pass", Resource::RenderPass)
    }

    fn create_session(&mut self) -> RuntimeResult<Handle> {
        self.create("create_session", Resource::Session)
    }

    fn create_reference_space(
        &mut self,
        _session: &Handle,
        _kind: ReferenceSpaceKind,
        _origin: Pose,
    ) -> RuntimeResult<Handle> {
        self.create("create_reference_space", Resource::Space)
    }

    fn view_configuration_views(
        &mut self,
        _views: ViewConfiguration,
    ) -> RuntimeResult<Vec<ViewConfigurationView>> {
        self.check("view_configuration_views")?;
        Ok(self.script.borrow().view_infos.clone())
    }

    fn swapchain_formats(&mut self, _session: &Handle) -> RuntimeResult<Vec<ImageFormat>> {
        self.check("swapchain_formats")?;
        Ok(self.script.borrow().formats.clone())
    }

    fn create_image_buffer(&mut self, desc: &ImageBufferDesc) -> RuntimeResult<Handle> {
        self.script.borrow_mut().image_buffer_descs.push(*desc);
        match desc.usage {
            ImageUsage::ColorAttachment => self.create("create_color_buffer", Resource::ColorBuffer),
            ImageUsage::DepthStencilAttachment => {
                self.create("create_depth_buffer", Resource::DepthBuffer)
            }
        }
    }

    fn create_swapchain(&mut self, _session: &Handle, desc: &SwapchainDesc) -> RuntimeResult<Handle> {
        self.script.borrow_mut().swapchain_desc = Some(*desc);
        self.create("create_swapchain", Resource::Swapchain)
    }

    fn swapchain_images(&mut self, _swapchain: &Handle) -> RuntimeResult<Vec<u32>> {
        self.check("swapchain_images")?;
        Ok((0..self.script.borrow().image_count).collect())
    }

    fn create_render_target(
        &mut self,
        _image: u32,
        _color: &Handle,
        _depth: &Handle,
        _render_pass: &Handle,
        _desc: &RenderTargetDesc,
    ) -> RuntimeResult<Handle> {
        {
            let mut script = self.script.borrow_mut();
            // Injected failure hits the last image so earlier targets exist.
            if script.fail.contains("create_render_target")
                && script.targets_created + 1 == script.image_count
            {
                return Err(RuntimeError::new("create_render_target", "injected failure"));
            }
            script.targets_created += 1;
        }
        let mut script = self.script.borrow_mut();
        let id = script.next_id;
        script.next_id += 1;
        script.live.insert((Resource::RenderTarget, id));
        script.calls.push(Call::Create(Resource::RenderTarget, id));
        Ok(Handle {
            resource: Resource::RenderTarget,
            id,
        })
    }

    fn poll_event(&mut self) -> RuntimeResult<Option<RuntimeEvent>> {
        self.check("poll_event")?;
        Ok(self.script.borrow_mut().events.pop_front())
    }

    fn begin_session(&mut self, _session: &Handle, _views: ViewConfiguration) -> RuntimeResult<()> {
        self.record(Call::BeginSession);
        self.check("begin_session")
    }

    fn end_session(&mut self, _session: &Handle) -> RuntimeResult<()> {
        self.record(Call::EndSession);
        self.check("end_session")
    }

    fn wait_frame(&mut self, _session: &mut Handle) -> RuntimeResult<FrameState> {
        self.record(Call::WaitFrame);
        self.check("wait_frame")?;
        Ok(self.script.borrow().frame_state)
    }

    fn begin_frame(&mut self, _session: &mut Handle) -> RuntimeResult<()> {
        self.record(Call::BeginFrame);
        self.check("begin_frame")
    }

    fn locate_views(
        &mut self,
        _session: &Handle,
        _views: ViewConfiguration,
        _space: &Handle,
        _time: Time,
    ) -> RuntimeResult<(LocationFlags, Vec<View>)> {
        self.record(Call::LocateViews);
        self.check("locate_views")?;
        let script = self.script.borrow();
        let views = script
            .located_views
            .clone()
            .unwrap_or_else(|| script.default_views());
        Ok((script.view_state, views))
    }

    fn acquire_image(&mut self, _swapchain: &mut Handle) -> RuntimeResult<u32> {
        self.record(Call::AcquireImage);
        self.check("acquire_image")?;
        Ok(1)
    }

    fn wait_image(&mut self, _swapchain: &mut Handle) -> RuntimeResult<()> {
        self.record(Call::WaitImage);
        self.check("wait_image")
    }

    fn release_image(&mut self, _swapchain: &mut Handle) -> RuntimeResult<()> {
        self.record(Call::ReleaseImage);
        self.check("release_image")
    }

    fn end_frame(
        &mut self,
        _session: &mut Handle,
        _display_time: Time,
        _blend_mode: BlendMode,
        layer: Option<ProjectionLayer<'_, Handle, Handle>>,
    ) -> RuntimeResult<()> {
        self.record(Call::EndFrame {
            layer_views: layer.map(|l| l.views.len()),
        });
        self.check("end_frame")
    }

    fn destroy_swapchain(&mut self, swapchain: Handle) {
        self.destroy(swapchain);
    }

    fn destroy_render_target(&mut self, target: Handle) {
        self.destroy(target);
    }

    fn destroy_space(&mut self, space: Handle) {
        self.destroy(space);
    }

    fn destroy_session(&mut self, session: Handle) {
        self.destroy(session);
    }

    fn destroy_image_buffer(&mut self, buffer: Handle) {
        self.destroy(buffer);
    }

    fn destroy_render_pass(&mut self, render_pass: Handle) {
        self.destroy(render_pass);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputValue {
    Float(f32),
    Boolean(bool),
    Vector2(Vec2),
}

type Key = (String, String);

#[derive(Debug, Default)]
pub struct InputScript {
    pub fail: HashSet<String>,
    pub paths: Vec<String>,
    pub actions: Vec<(String, ActionKind)>,
    pub suggested: Vec<(String, Vec<(String, String)>)>,
    pub attach_count: u32,
    pub sync_count: u32,
    pub disconnected: HashSet<String>,
    pub values: HashMap<Key, InputValue>,
    pub locations: HashMap<Key, SpaceLocation>,
    pub haptics: Vec<(String, String, HapticVibration)>,
    synced: HashMap<Key, InputValue>,
    changed: HashMap<Key, bool>,
    last_change: HashMap<Key, Time>,
}

impl InputScript {
    /// Sets the raw value seen by the next sync for `action` on `hand`.
    pub fn set(&mut self, action: &str, hand: &str, value: InputValue) {
        self.values.insert((action.to_string(), hand.to_string()), value);
    }

    pub fn locate(&mut self, action: &str, hand: &str, location: SpaceLocation) {
        self.locations
            .insert((action.to_string(), hand.to_string()), location);
    }
}

#[derive(Debug)]
pub struct MockAction {
    pub name: String,
    pub kind: ActionKind,
}

pub struct MockInputRuntime {
    pub script: Rc<RefCell<InputScript>>,
}

impl MockInputRuntime {
    pub fn new() -> (Self, Rc<RefCell<InputScript>>) {
        let script = Rc::new(RefCell::new(InputScript::default()));
        (
            Self {
                script: Rc::clone(&script),
            },
            script,
        )
    }

    fn check(&self, call: &str) -> RuntimeResult<()> {
        if self.script.borrow().fail.contains(call) {
            Err(RuntimeError::new("mock", format!("injected failure in {call}")))
        } else {
            Ok(())
        }
    }

    fn path(&self, path: u32) -> String {
        self.script.borrow().paths[path as usize].clone()
    }

    /// Rejects calls made with the wrong kind of action, as a typed runtime
    /// would.
    fn expect_kind(call: &'static str, action: &MockAction, kind: ActionKind) -> RuntimeResult<()> {
        if action.kind == kind {
            Ok(())
        } else {
            Err(RuntimeError::new(
                call,
                format!("{} is a {:?} action, not {kind:?}", action.name, action.kind),
            ))
        }
    }

    fn state<T: Copy + Default>(
        &self,
        action: &MockAction,
        path: u32,
        kind: ActionKind,
        extract: impl Fn(InputValue) -> Option<T>,
    ) -> RuntimeResult<ActionState<T>> {
        self.check(&format!("state:{}", action.name))?;
        Self::expect_kind("get_action_state", action, kind)?;
        let hand = self.path(path);
        let script = self.script.borrow();
        if script.disconnected.contains(&hand) {
            return Ok(ActionState::default());
        }
        let key = (action.name.clone(), hand);
        let Some(value) = script.synced.get(&key).copied().and_then(extract) else {
            return Ok(ActionState::default());
        };
        Ok(ActionState {
            current_state: value,
            changed_since_last_sync: script.changed.get(&key).copied().unwrap_or(false),
            last_change_time: script.last_change.get(&key).copied().unwrap_or_default(),
            is_active: true,
        })
    }
}

impl InputRuntime for MockInputRuntime {
    type Space = Handle;
    type ActionSet = ();
    type Action = MockAction;
    type ActionSpace = (String, String);
    type Path = u32;

    fn string_to_path(&mut self, path: &str) -> RuntimeResult<u32> {
        self.check("string_to_path")?;
        let mut script = self.script.borrow_mut();
        if let Some(index) = script.paths.iter().position(|p| p == path) {
            return Ok(index as u32);
        }
        script.paths.push(path.to_string());
        Ok((script.paths.len() - 1) as u32)
    }

    fn create_action_set(&mut self, _name: &str, _localized: &str, _priority: u32) -> RuntimeResult<()> {
        self.check("create_action_set")
    }

    fn create_action(
        &mut self,
        _set: &(),
        name: &str,
        _localized_name: &str,
        kind: ActionKind,
        _subaction_paths: &[u32],
    ) -> RuntimeResult<MockAction> {
        self.check(&format!("create_action:{name}"))?;
        self.script
            .borrow_mut()
            .actions
            .push((name.to_string(), kind));
        Ok(MockAction {
            name: name.to_string(),
            kind,
        })
    }

    fn suggest_bindings(
        &mut self,
        profile: u32,
        bindings: &[(&MockAction, u32)],
    ) -> RuntimeResult<()> {
        let profile = self.path(profile);
        self.check(&format!("suggest:{profile}"))?;
        let bindings = bindings
            .iter()
            .map(|(action, path)| (action.name.clone(), self.path(*path)))
            .collect();
        self.script.borrow_mut().suggested.push((profile, bindings));
        Ok(())
    }

    fn create_action_space(
        &mut self,
        action: &MockAction,
        subaction_path: u32,
    ) -> RuntimeResult<(String, String)> {
        self.check(&format!("space:{}", action.name))?;
        Self::expect_kind("create_action_space", action, ActionKind::Pose)?;
        Ok((action.name.clone(), self.path(subaction_path)))
    }

    fn attach_action_set(&mut self, _set: &()) -> RuntimeResult<()> {
        self.check("attach_action_set")?;
        self.script.borrow_mut().attach_count += 1;
        Ok(())
    }

    fn sync_actions(&mut self, _set: &()) -> RuntimeResult<()> {
        self.check("sync_actions")?;
        let mut script = self.script.borrow_mut();
        script.sync_count += 1;
        let now = Time::from_nanos(script.sync_count as i64);
        let values: Vec<(Key, InputValue)> = script
            .values
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        for (key, value) in values {
            let changed = script.synced.get(&key) != Some(&value);
            if changed {
                script.last_change.insert(key.clone(), now);
            }
            script.changed.insert(key.clone(), changed);
            script.synced.insert(key, value);
        }
        Ok(())
    }

    fn pose_active(&mut self, action: &MockAction, subaction_path: u32) -> RuntimeResult<bool> {
        Self::expect_kind("get_action_state_pose", action, ActionKind::Pose)?;
        let hand = self.path(subaction_path);
        let script = self.script.borrow();
        Ok(!script.disconnected.contains(&hand)
            && script.locations.contains_key(&(action.name.clone(), hand)))
    }

    fn locate_space(
        &mut self,
        space: &(String, String),
        _base: &Handle,
        _time: Time,
    ) -> RuntimeResult<SpaceLocation> {
        self.check(&format!("locate:{}", space.0))?;
        Ok(self
            .script
            .borrow()
            .locations
            .get(space)
            .copied()
            .unwrap_or_default())
    }

    fn float_state(&mut self, action: &MockAction, path: u32) -> RuntimeResult<ActionState<f32>> {
        self.state(action, path, ActionKind::Float, |v| match v {
            InputValue::Float(f) => Some(f),
            _ => None,
        })
    }

    fn vector2_state(&mut self, action: &MockAction, path: u32) -> RuntimeResult<ActionState<Vec2>> {
        self.state(action, path, ActionKind::Vector2, |v| match v {
            InputValue::Vector2(v) => Some(v),
            _ => None,
        })
    }

    fn boolean_state(&mut self, action: &MockAction, path: u32) -> RuntimeResult<ActionState<bool>> {
        self.state(action, path, ActionKind::Boolean, |v| match v {
            InputValue::Boolean(b) => Some(b),
            _ => None,
        })
    }

    fn apply_haptic(
        &mut self,
        action: &MockAction,
        subaction_path: u32,
        vibration: HapticVibration,
    ) -> RuntimeResult<()> {
        self.check("apply_haptic")?;
        Self::expect_kind("apply_haptic", action, ActionKind::Vibration)?;
        let hand = self.path(subaction_path);
        let mut script = self.script.borrow_mut();
        if !script.disconnected.contains(&hand) {
            script.haptics.push((action.name.clone(), hand, vibration));
        }
        Ok(())
    }
}

/// Reference space handle for input tests.
pub fn reference_space() -> Handle {
    Handle {
        resource: Resource::Space,
        id: 0,
    }
}
