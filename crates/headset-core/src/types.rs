use bitflags::bitflags;
use glam::{Mat4, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Runtime timestamp in nanoseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(i64);

impl Time {
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }
}

/// Left/right index for per-eye and per-controller storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left = 0,
    Right = 1,
}

impl Side {
    pub const COUNT: usize = 2;
    pub const ALL: [Side; Side::COUNT] = [Side::Left, Side::Right];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Top-level user path of the hand on this side.
    pub const fn hand_path(self) -> &'static str {
        match self {
            Side::Left => "/user/hand/left",
            Side::Right => "/user/hand/right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Field of view as four half-angles in radians. Left and down are negative
/// for a symmetric frustum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Fov {
    pub angle_left: f32,
    pub angle_right: f32,
    pub angle_up: f32,
    pub angle_down: f32,
}

/// One located view (eye) as reported by the runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct View {
    pub pose: Pose,
    pub fov: Fov,
}

bitflags! {
    /// Validity/tracking bits shared by view-state and space-location results.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct LocationFlags: u32 {
        const ORIENTATION_VALID = 1 << 0;
        const POSITION_VALID = 1 << 1;
        const ORIENTATION_TRACKED = 1 << 2;
        const POSITION_TRACKED = 1 << 3;
    }
}

impl LocationFlags {
    pub fn pose_valid(self) -> bool {
        self.contains(Self::POSITION_VALID | Self::ORIENTATION_VALID)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpaceLocation {
    pub flags: LocationFlags,
    pub pose: Pose,
}

/// Mirror of the runtime-owned session life cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Unknown,
    Idle,
    Ready,
    Synchronized,
    Visible,
    Focused,
    Stopping,
    LossPending,
    Exiting,
}

impl SessionState {
    pub const ALL: [SessionState; 9] = [
        SessionState::Unknown,
        SessionState::Idle,
        SessionState::Ready,
        SessionState::Synchronized,
        SessionState::Visible,
        SessionState::Focused,
        SessionState::Stopping,
        SessionState::LossPending,
        SessionState::Exiting,
    ];

    /// States in which the frame loop runs and input is synced.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Ready
                | SessionState::Synchronized
                | SessionState::Visible
                | SessionState::Focused
        )
    }

    /// States after which the application is expected to exit.
    pub const fn is_terminal(self) -> bool {
        matches!(self, SessionState::LossPending | SessionState::Exiting)
    }
}

/// Events drained from the runtime queue at the start of each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEvent {
    InstanceLossPending,
    SessionStateChanged(SessionState),
    EventsLost(u32),
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameState {
    pub predicted_display_time: Time,
    pub predicted_display_period: i64,
    pub should_render: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewConfiguration {
    Mono,
    #[default]
    PrimaryStereo,
}

impl ViewConfiguration {
    pub const fn view_count(self) -> usize {
        match self {
            ViewConfiguration::Mono => 1,
            ViewConfiguration::PrimaryStereo => 2,
        }
    }

    /// Multiview mask with one bit per view.
    pub const fn view_mask(self) -> u32 {
        (1u32 << self.view_count()) - 1
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSpaceKind {
    View,
    Local,
    #[default]
    Stage,
}

/// Per-view recommendations from the runtime's view configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewConfigurationView {
    pub recommended_width: u32,
    pub recommended_height: u32,
    pub recommended_sample_count: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub max_sample_count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Region of one swapchain array layer used by a single eye.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubImage {
    pub array_index: u32,
    pub rect: Rect2D,
}

/// Everything the compositor needs to display one eye.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EyeRenderInfo {
    pub pose: Pose,
    pub fov: Fov,
    pub sub_image: SubImage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Rgba8Srgb,
    Bgra8Srgb,
    Rgba8Unorm,
    Bgra8Unorm,
    D32Sfloat,
}

impl ImageFormat {
    pub const fn is_depth(self) -> bool {
        matches!(self, ImageFormat::D32Sfloat)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlendMode {
    #[default]
    Opaque,
}

/// Current value of one action plus the bookkeeping the runtime reports.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActionState<T> {
    pub current_state: T,
    pub changed_since_last_sync: bool,
    pub last_change_time: Time,
    pub is_active: bool,
}

impl<T> ActionState<T> {
    /// Drops the active/changed bits while keeping the last known value.
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.changed_since_last_sync = false;
    }
}

/// A single vibration pulse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HapticVibration {
    pub amplitude: f32,
    pub duration_ns: i64,
    pub frequency_hz: f32,
}

/// Per-tick input snapshot handed to game logic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputData {
    pub eye_poses: [Pose; Side::COUNT],
    pub eye_pose_matrices: [Mat4; Side::COUNT],
    pub head_pose: Pose,
    pub head_pose_matrix: Mat4,

    pub controller_aim_poses: [Pose; Side::COUNT],
    pub controller_aim_pose_matrices: [Mat4; Side::COUNT],
    pub controller_aim_tracked: [bool; Side::COUNT],
    pub controller_grip_poses: [Pose; Side::COUNT],
    pub controller_grip_pose_matrices: [Mat4; Side::COUNT],
    pub controller_grip_tracked: [bool; Side::COUNT],

    pub grab_state: [ActionState<f32>; Side::COUNT],
    pub thumbstick_state: [ActionState<Vec2>; Side::COUNT],
    pub menu_click_state: [ActionState<bool>; Side::COUNT],
    pub select_click_state: [ActionState<bool>; Side::COUNT],

    /// Session state at the last sync; doubles as a user-presence signal.
    pub headset_activity_state: SessionState,
}

impl Default for InputData {
    fn default() -> Self {
        Self {
            eye_poses: [Pose::IDENTITY; Side::COUNT],
            eye_pose_matrices: [Mat4::IDENTITY; Side::COUNT],
            head_pose: Pose::IDENTITY,
            head_pose_matrix: Mat4::IDENTITY,
            controller_aim_poses: [Pose::IDENTITY; Side::COUNT],
            controller_aim_pose_matrices: [Mat4::IDENTITY; Side::COUNT],
            controller_aim_tracked: [false; Side::COUNT],
            controller_grip_poses: [Pose::IDENTITY; Side::COUNT],
            controller_grip_pose_matrices: [Mat4::IDENTITY; Side::COUNT],
            controller_grip_tracked: [false; Side::COUNT],
            grab_state: [ActionState::default(); Side::COUNT],
            thumbstick_state: [ActionState::default(); Side::COUNT],
            menu_click_state: [ActionState::default(); Side::COUNT],
            select_click_state: [ActionState::default(); Side::COUNT],
            headset_activity_state: SessionState::Unknown,
        }
    }
}
