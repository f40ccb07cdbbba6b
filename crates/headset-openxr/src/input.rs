use std::rc::Rc;

use glam::Vec2;
use openxr as xr;

use headset_core::runtime::{ActionKind, InputRuntime};
use headset_core::{
    ActionState, HapticVibration, LocationFlags, RuntimeError, RuntimeResult, SpaceLocation, Time,
};

use crate::context::XrContext;
use crate::frame::{from_posef, OpenXrSession};

/// Typed openxr action behind the kind-erased handle the synchronizer sees.
pub enum OpenXrAction {
    Pose(xr::Action<xr::Posef>),
    Float(xr::Action<f32>),
    Vector2(xr::Action<xr::Vector2f>),
    Boolean(xr::Action<bool>),
    Vibration(xr::Action<xr::Haptic>),
}

impl OpenXrAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            OpenXrAction::Pose(_) => ActionKind::Pose,
            OpenXrAction::Float(_) => ActionKind::Float,
            OpenXrAction::Vector2(_) => ActionKind::Vector2,
            OpenXrAction::Boolean(_) => ActionKind::Boolean,
            OpenXrAction::Vibration(_) => ActionKind::Vibration,
        }
    }

    fn binding(&self, path: xr::Path) -> xr::Binding<'_> {
        match self {
            OpenXrAction::Pose(a) => xr::Binding::new(a, path),
            OpenXrAction::Float(a) => xr::Binding::new(a, path),
            OpenXrAction::Vector2(a) => xr::Binding::new(a, path),
            OpenXrAction::Boolean(a) => xr::Binding::new(a, path),
            OpenXrAction::Vibration(a) => xr::Binding::new(a, path),
        }
    }
}

fn kind_mismatch(call: &'static str, action: &OpenXrAction) -> RuntimeError {
    RuntimeError::new(call, format!("unexpected {:?} action", action.kind()))
}

fn convert_state<T: xr::ActionInput, U>(state: xr::ActionState<T>, map: impl FnOnce(T) -> U) -> ActionState<U> {
    ActionState {
        current_state: map(state.current_state),
        changed_since_last_sync: state.changed_since_last_sync,
        last_change_time: Time::from_nanos(state.last_change_time.as_nanos()),
        is_active: state.is_active,
    }
}

pub fn space_location_flags(flags: xr::SpaceLocationFlags) -> LocationFlags {
    let mut out = LocationFlags::empty();
    out.set(
        LocationFlags::ORIENTATION_VALID,
        flags.contains(xr::SpaceLocationFlags::ORIENTATION_VALID),
    );
    out.set(
        LocationFlags::POSITION_VALID,
        flags.contains(xr::SpaceLocationFlags::POSITION_VALID),
    );
    out.set(
        LocationFlags::ORIENTATION_TRACKED,
        flags.contains(xr::SpaceLocationFlags::ORIENTATION_TRACKED),
    );
    out.set(
        LocationFlags::POSITION_TRACKED,
        flags.contains(xr::SpaceLocationFlags::POSITION_TRACKED),
    );
    out
}

/// Input side of the runtime. Shares the session with the frame runtime, so
/// it must be dropped before the coordinator destroys that session.
pub struct OpenXrInputRuntime {
    context: Rc<XrContext>,
    session: xr::Session<xr::Vulkan>,
}

impl OpenXrInputRuntime {
    pub fn new(context: Rc<XrContext>, session: &OpenXrSession) -> Self {
        Self {
            context,
            session: session.session.clone(),
        }
    }
}

impl InputRuntime for OpenXrInputRuntime {
    type Space = xr::Space;
    type ActionSet = xr::ActionSet;
    type Action = OpenXrAction;
    type ActionSpace = xr::Space;
    type Path = xr::Path;

    fn string_to_path(&mut self, path: &str) -> RuntimeResult<xr::Path> {
        self.context
            .instance
            .string_to_path(path)
            .map_err(|e| RuntimeError::from_debug("string_to_path", e))
    }

    fn create_action_set(
        &mut self,
        name: &str,
        localized_name: &str,
        priority: u32,
    ) -> RuntimeResult<xr::ActionSet> {
        self.context
            .instance
            .create_action_set(name, localized_name, priority)
            .map_err(|e| RuntimeError::from_debug("create_action_set", e))
    }

    fn create_action(
        &mut self,
        set: &xr::ActionSet,
        name: &str,
        localized_name: &str,
        kind: ActionKind,
        subaction_paths: &[xr::Path],
    ) -> RuntimeResult<OpenXrAction> {
        let err = |e| RuntimeError::from_debug("create_action", e);
        Ok(match kind {
            ActionKind::Pose => OpenXrAction::Pose(
                set.create_action(name, localized_name, subaction_paths)
                    .map_err(err)?,
            ),
            ActionKind::Float => OpenXrAction::Float(
                set.create_action(name, localized_name, subaction_paths)
                    .map_err(err)?,
            ),
            ActionKind::Vector2 => OpenXrAction::Vector2(
                set.create_action(name, localized_name, subaction_paths)
                    .map_err(err)?,
            ),
            ActionKind::Boolean => OpenXrAction::Boolean(
                set.create_action(name, localized_name, subaction_paths)
                    .map_err(err)?,
            ),
            ActionKind::Vibration => OpenXrAction::Vibration(
                set.create_action(name, localized_name, subaction_paths)
                    .map_err(err)?,
            ),
        })
    }

    fn suggest_bindings(
        &mut self,
        profile: xr::Path,
        bindings: &[(&OpenXrAction, xr::Path)],
    ) -> RuntimeResult<()> {
        let bindings: Vec<xr::Binding<'_>> = bindings
            .iter()
            .map(|(action, path)| action.binding(*path))
            .collect();
        self.context
            .instance
            .suggest_interaction_profile_bindings(profile, &bindings)
            .map_err(|e| RuntimeError::from_debug("suggest_interaction_profile_bindings", e))
    }

    fn create_action_space(
        &mut self,
        action: &OpenXrAction,
        subaction_path: xr::Path,
    ) -> RuntimeResult<xr::Space> {
        match action {
            OpenXrAction::Pose(a) => a
                .create_space(&self.session, subaction_path, xr::Posef::IDENTITY)
                .map_err(|e| RuntimeError::from_debug("create_action_space", e)),
            other => Err(kind_mismatch("create_action_space", other)),
        }
    }

    fn attach_action_set(&mut self, set: &xr::ActionSet) -> RuntimeResult<()> {
        self.session
            .attach_action_sets(&[set])
            .map_err(|e| RuntimeError::from_debug("attach_session_action_sets", e))
    }

    fn sync_actions(&mut self, set: &xr::ActionSet) -> RuntimeResult<()> {
        self.session
            .sync_actions(&[xr::ActiveActionSet::new(set)])
            .map_err(|e| RuntimeError::from_debug("sync_actions", e))
    }

    fn pose_active(&mut self, action: &OpenXrAction, subaction_path: xr::Path) -> RuntimeResult<bool> {
        match action {
            OpenXrAction::Pose(a) => a
                .is_active(&self.session, subaction_path)
                .map_err(|e| RuntimeError::from_debug("get_action_state_pose", e)),
            other => Err(kind_mismatch("get_action_state_pose", other)),
        }
    }

    fn locate_space(
        &mut self,
        space: &xr::Space,
        base: &xr::Space,
        time: Time,
    ) -> RuntimeResult<SpaceLocation> {
        let location = space
            .locate(base, xr::Time::from_nanos(time.as_nanos()))
            .map_err(|e| RuntimeError::from_debug("locate_space", e))?;
        Ok(SpaceLocation {
            flags: space_location_flags(location.location_flags),
            pose: from_posef(location.pose),
        })
    }

    fn float_state(
        &mut self,
        action: &OpenXrAction,
        subaction_path: xr::Path,
    ) -> RuntimeResult<ActionState<f32>> {
        match action {
            OpenXrAction::Float(a) => a
                .state(&self.session, subaction_path)
                .map(|s| convert_state(s, |v| v))
                .map_err(|e| RuntimeError::from_debug("get_action_state_float", e)),
            other => Err(kind_mismatch("get_action_state_float", other)),
        }
    }

    fn vector2_state(
        &mut self,
        action: &OpenXrAction,
        subaction_path: xr::Path,
    ) -> RuntimeResult<ActionState<Vec2>> {
        match action {
            OpenXrAction::Vector2(a) => a
                .state(&self.session, subaction_path)
                .map(|s| convert_state(s, |v| Vec2::new(v.x, v.y)))
                .map_err(|e| RuntimeError::from_debug("get_action_state_vector2f", e)),
            other => Err(kind_mismatch("get_action_state_vector2f", other)),
        }
    }

    fn boolean_state(
        &mut self,
        action: &OpenXrAction,
        subaction_path: xr::Path,
    ) -> RuntimeResult<ActionState<bool>> {
        match action {
            OpenXrAction::Boolean(a) => a
                .state(&self.session, subaction_path)
                .map(|s| convert_state(s, |v| v))
                .map_err(|e| RuntimeError::from_debug("get_action_state_boolean", e)),
            other => Err(kind_mismatch("get_action_state_boolean", other)),
        }
    }

    fn apply_haptic(
        &mut self,
        action: &OpenXrAction,
        subaction_path: xr::Path,
        vibration: HapticVibration,
    ) -> RuntimeResult<()> {
        let OpenXrAction::Vibration(a) = action else {
            return Err(kind_mismatch("apply_haptic_feedback", action));
        };
        let event = xr::HapticVibration::new()
            .amplitude(vibration.amplitude)
            .duration(xr::Duration::from_nanos(vibration.duration_ns))
            .frequency(vibration.frequency_hz);
        a.apply_feedback(&self.session, subaction_path, &event)
            .map_err(|e| RuntimeError::from_debug("apply_haptic_feedback", e))
    }
}
