//! Controller actions, per-tick input sync and haptics.

use tracing::{debug, info, warn};

use crate::bindings::{InputAction, InteractionProfile, INTERACTION_PROFILES};
use crate::error::{ConstructionStage, HeadsetResult, RuntimeResult, StageExt};
use crate::math::{head_pose, pose_to_matrix};
use crate::runtime::InputRuntime;
use crate::types::{ActionState, HapticVibration, InputData, Pose, SessionState, Side, Time, View};

const ACTION_SET_NAME: &str = "gameplay";
const ACTION_SET_LOCALIZED_NAME: &str = "Gameplay";

pub struct InputSynchronizer<I: InputRuntime> {
    runtime: I,
    action_set: I::ActionSet,
    actions: [Option<I::Action>; InputAction::COUNT],
    controller_paths: [I::Path; Side::COUNT],
    aim_spaces: [Option<I::ActionSpace>; Side::COUNT],
    grip_spaces: [Option<I::ActionSpace>; Side::COUNT],
    input_data: InputData,
}

impl<I: InputRuntime> InputSynchronizer<I> {
    /// Creates the action set, suggests bindings for every known controller
    /// profile and attaches the set to the session.
    pub fn new(mut runtime: I) -> HeadsetResult<Self> {
        let left = runtime
            .string_to_path(Side::Left.hand_path())
            .at(ConstructionStage::InputPaths)?;
        let right = runtime
            .string_to_path(Side::Right.hand_path())
            .at(ConstructionStage::InputPaths)?;
        let controller_paths = [left, right];

        let action_set = runtime
            .create_action_set(ACTION_SET_NAME, ACTION_SET_LOCALIZED_NAME, 0)
            .at(ConstructionStage::ActionSet)?;

        let actions: [Option<I::Action>; InputAction::COUNT] = std::array::from_fn(|i| {
            let action = InputAction::ALL[i];
            match runtime.create_action(
                &action_set,
                action.name(),
                action.localized_name(),
                action.kind(),
                &controller_paths,
            ) {
                Ok(handle) => Some(handle),
                Err(err) => {
                    warn!(action = action.name(), "action left unbound: {err}");
                    None
                }
            }
        });

        for profile in INTERACTION_PROFILES {
            if let Err(err) = Self::suggest_profile(&mut runtime, &actions, profile) {
                warn!(profile = profile.path, "binding suggestion rejected: {err}");
            }
        }

        let mut aim_spaces = [None, None];
        let mut grip_spaces = [None, None];
        for side in Side::ALL {
            let path = controller_paths[side.index()];
            aim_spaces[side.index()] =
                Self::action_space(&mut runtime, &actions, InputAction::AimPose, path);
            grip_spaces[side.index()] =
                Self::action_space(&mut runtime, &actions, InputAction::GripPose, path);
        }

        runtime
            .attach_action_set(&action_set)
            .at(ConstructionStage::AttachActionSet)?;

        let bound = actions.iter().filter(|a| a.is_some()).count();
        info!(bound, total = InputAction::COUNT, "controller actions attached");

        Ok(Self {
            runtime,
            action_set,
            actions,
            controller_paths,
            aim_spaces,
            grip_spaces,
            input_data: InputData::default(),
        })
    }

    fn suggest_profile(
        runtime: &mut I,
        actions: &[Option<I::Action>; InputAction::COUNT],
        profile: &InteractionProfile,
    ) -> RuntimeResult<()> {
        let profile_path = runtime.string_to_path(profile.path)?;
        let mut bindings = Vec::with_capacity(profile.bindings.len() * Side::COUNT);
        for spec in profile.bindings {
            let Some(action) = actions[spec.action.index()].as_ref() else {
                continue;
            };
            for path in spec.paths() {
                bindings.push((action, runtime.string_to_path(&path)?));
            }
        }
        runtime.suggest_bindings(profile_path, &bindings)
    }

    fn action_space(
        runtime: &mut I,
        actions: &[Option<I::Action>; InputAction::COUNT],
        action: InputAction,
        path: I::Path,
    ) -> Option<I::ActionSpace> {
        let handle = actions[action.index()].as_ref()?;
        match runtime.create_action_space(handle, path) {
            Ok(space) => Some(space),
            Err(err) => {
                warn!(action = action.name(), "pose left untracked: {err}");
                None
            }
        }
    }

    /// Pulls the latest action states and poses into the snapshot.
    ///
    /// While the session is inactive only the headset activity state is
    /// recorded. Returns false only when the runtime rejected the action
    /// sync; the previous snapshot is then left as is.
    pub fn sync(
        &mut self,
        reference_space: &I::Space,
        time: Time,
        eye_poses: &[View],
        session_state: SessionState,
    ) -> bool {
        if !session_state.is_active() {
            self.input_data.headset_activity_state = session_state;
            return true;
        }

        if let Err(err) = self.runtime.sync_actions(&self.action_set) {
            warn!("input sync failed: {err}");
            return false;
        }

        for side in Side::ALL {
            self.sync_pose(side, InputAction::AimPose, reference_space, time);
            self.sync_pose(side, InputAction::GripPose, reference_space, time);

            let i = side.index();
            let path = self.controller_paths[i];
            if let Some(action) = self.actions[InputAction::Grab.index()].as_ref() {
                Self::refresh(
                    &mut self.input_data.grab_state[i],
                    self.runtime.float_state(action, path),
                );
            }
            if let Some(action) = self.actions[InputAction::Thumbstick.index()].as_ref() {
                Self::refresh(
                    &mut self.input_data.thumbstick_state[i],
                    self.runtime.vector2_state(action, path),
                );
            }
            if let Some(action) = self.actions[InputAction::MenuClick.index()].as_ref() {
                Self::refresh(
                    &mut self.input_data.menu_click_state[i],
                    self.runtime.boolean_state(action, path),
                );
            }
            if let Some(action) = self.actions[InputAction::SelectClick.index()].as_ref() {
                Self::refresh(
                    &mut self.input_data.select_click_state[i],
                    self.runtime.boolean_state(action, path),
                );
            }
        }

        for (eye, view) in eye_poses.iter().take(Side::COUNT).enumerate() {
            self.input_data.eye_poses[eye] = view.pose;
            self.input_data.eye_pose_matrices[eye] = pose_to_matrix(&view.pose);
        }
        let eyes: Vec<Pose> = eye_poses.iter().map(|view| view.pose).collect();
        if let Some(head) = head_pose(&eyes) {
            self.input_data.head_pose = head;
            self.input_data.head_pose_matrix = pose_to_matrix(&head);
        }
        self.input_data.headset_activity_state = session_state;

        true
    }

    fn sync_pose(&mut self, side: Side, action: InputAction, base: &I::Space, time: Time) {
        let i = side.index();
        let (spaces, poses, matrices, tracked) = match action {
            InputAction::AimPose => (
                &self.aim_spaces,
                &mut self.input_data.controller_aim_poses,
                &mut self.input_data.controller_aim_pose_matrices,
                &mut self.input_data.controller_aim_tracked,
            ),
            _ => (
                &self.grip_spaces,
                &mut self.input_data.controller_grip_poses,
                &mut self.input_data.controller_grip_pose_matrices,
                &mut self.input_data.controller_grip_tracked,
            ),
        };

        tracked[i] = false;
        let handle = self.actions[action.index()].as_ref();
        let (Some(handle), Some(space)) = (handle, spaces[i].as_ref()) else {
            return;
        };

        match self.runtime.pose_active(handle, self.controller_paths[i]) {
            Ok(true) => {}
            Ok(false) => return,
            Err(err) => {
                debug!(action = action.name(), ?side, "pose state query failed: {err}");
                return;
            }
        }

        match self.runtime.locate_space(space, base, time) {
            Ok(location) if location.flags.pose_valid() => {
                poses[i] = location.pose;
                matrices[i] = pose_to_matrix(&location.pose);
                tracked[i] = true;
            }
            Ok(_) => {}
            Err(err) => debug!(action = action.name(), ?side, "pose locate failed: {err}"),
        }
    }

    fn refresh<T>(slot: &mut ActionState<T>, result: RuntimeResult<ActionState<T>>) {
        match result {
            Ok(state) if state.is_active => *slot = state,
            Ok(_) => slot.deactivate(),
            Err(err) => {
                debug!("action state query failed: {err}");
                slot.deactivate();
            }
        }
    }

    /// Fires one vibration pulse on `controller`. Never fails: an unbound
    /// haptic action or a runtime error is only logged.
    pub fn apply_haptic_feedback(
        &mut self,
        controller: Side,
        amplitude: f32,
        duration_ns: i64,
        frequency_hz: f32,
    ) {
        let Some(action) = self.actions[InputAction::Vibrate.index()].as_ref() else {
            debug!(?controller, "haptics unbound");
            return;
        };
        let vibration = HapticVibration {
            amplitude: amplitude.clamp(0.0, 1.0),
            duration_ns,
            frequency_hz,
        };
        if let Err(err) =
            self.runtime
                .apply_haptic(action, self.controller_paths[controller.index()], vibration)
        {
            debug!(?controller, "haptic pulse dropped: {err}");
        }
    }

    /// Copy of the latest snapshot.
    pub fn input_data(&self) -> InputData {
        self.input_data
    }

    /// Whether `action` was created and can receive bindings.
    pub fn is_bound(&self, action: InputAction) -> bool {
        self.actions[action.index()].is_some()
    }

    pub fn runtime(&self) -> &I {
        &self.runtime
    }
}
