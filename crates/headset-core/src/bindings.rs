//! Controller actions and their suggested bindings per interaction profile.

use crate::runtime::ActionKind;
use crate::types::Side;

/// Every action created in the gameplay action set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    AimPose,
    GripPose,
    TriggerValue,
    TriggerClick,
    SqueezeValue,
    SqueezeForce,
    SqueezeClick,
    Thumbstick,
    ThumbstickClick,
    MenuClick,
    SelectClick,
    AClick,
    BClick,
    XClick,
    YClick,
    Vibrate,
    Grab,
}

impl InputAction {
    pub const COUNT: usize = 17;
    pub const ALL: [InputAction; InputAction::COUNT] = [
        InputAction::AimPose,
        InputAction::GripPose,
        InputAction::TriggerValue,
        InputAction::TriggerClick,
        InputAction::SqueezeValue,
        InputAction::SqueezeForce,
        InputAction::SqueezeClick,
        InputAction::Thumbstick,
        InputAction::ThumbstickClick,
        InputAction::MenuClick,
        InputAction::SelectClick,
        InputAction::AClick,
        InputAction::BClick,
        InputAction::XClick,
        InputAction::YClick,
        InputAction::Vibrate,
        InputAction::Grab,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Runtime-facing action name: lowercase, no spaces.
    pub const fn name(self) -> &'static str {
        match self {
            InputAction::AimPose => "aim_pose",
            InputAction::GripPose => "grip_pose",
            InputAction::TriggerValue => "trigger_value",
            InputAction::TriggerClick => "trigger_click",
            InputAction::SqueezeValue => "squeeze_value",
            InputAction::SqueezeForce => "squeeze_force",
            InputAction::SqueezeClick => "squeeze_click",
            InputAction::Thumbstick => "thumbstick",
            InputAction::ThumbstickClick => "thumbstick_click",
            InputAction::MenuClick => "menu_click",
            InputAction::SelectClick => "select_click",
            InputAction::AClick => "a_click",
            InputAction::BClick => "b_click",
            InputAction::XClick => "x_click",
            InputAction::YClick => "y_click",
            InputAction::Vibrate => "vibrate",
            InputAction::Grab => "grab",
        }
    }

    pub const fn localized_name(self) -> &'static str {
        match self {
            InputAction::AimPose => "Aim Pose",
            InputAction::GripPose => "Grip Pose",
            InputAction::TriggerValue => "Trigger Value",
            InputAction::TriggerClick => "Trigger Click",
            InputAction::SqueezeValue => "Squeeze Value",
            InputAction::SqueezeForce => "Squeeze Force",
            InputAction::SqueezeClick => "Squeeze Click",
            InputAction::Thumbstick => "Thumbstick",
            InputAction::ThumbstickClick => "Thumbstick Click",
            InputAction::MenuClick => "Menu Click",
            InputAction::SelectClick => "Select Click",
            InputAction::AClick => "A Click",
            InputAction::BClick => "B Click",
            InputAction::XClick => "X Click",
            InputAction::YClick => "Y Click",
            InputAction::Vibrate => "Vibrate",
            InputAction::Grab => "Grab",
        }
    }

    pub const fn kind(self) -> ActionKind {
        match self {
            InputAction::AimPose | InputAction::GripPose => ActionKind::Pose,
            InputAction::TriggerValue
            | InputAction::SqueezeValue
            | InputAction::SqueezeForce
            | InputAction::Grab => ActionKind::Float,
            InputAction::Thumbstick => ActionKind::Vector2,
            InputAction::Vibrate => ActionKind::Vibration,
            InputAction::TriggerClick
            | InputAction::SqueezeClick
            | InputAction::ThumbstickClick
            | InputAction::MenuClick
            | InputAction::SelectClick
            | InputAction::AClick
            | InputAction::BClick
            | InputAction::XClick
            | InputAction::YClick => ActionKind::Boolean,
        }
    }
}

const BOTH: &[Side] = &[Side::Left, Side::Right];
const LEFT: &[Side] = &[Side::Left];
const RIGHT: &[Side] = &[Side::Right];

/// One action bound to `<hand>/<suffix>` for each listed hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingSpec {
    pub action: InputAction,
    pub hands: &'static [Side],
    pub suffix: &'static str,
}

impl BindingSpec {
    const fn new(action: InputAction, hands: &'static [Side], suffix: &'static str) -> Self {
        Self {
            action,
            hands,
            suffix,
        }
    }

    /// Full input paths, one per bound hand.
    pub fn paths(&self) -> impl Iterator<Item = String> + '_ {
        self.hands
            .iter()
            .map(move |hand| format!("{}/{}", hand.hand_path(), self.suffix))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InteractionProfile {
    pub path: &'static str,
    pub bindings: &'static [BindingSpec],
}

use InputAction as A;

const fn b(action: InputAction, hands: &'static [Side], suffix: &'static str) -> BindingSpec {
    BindingSpec::new(action, hands, suffix)
}

const KHR_SIMPLE: &[BindingSpec] = &[
    b(A::AimPose, BOTH, "input/aim/pose"),
    b(A::GripPose, BOTH, "input/grip/pose"),
    b(A::SelectClick, BOTH, "input/select/click"),
    b(A::MenuClick, BOTH, "input/menu/click"),
    b(A::Grab, BOTH, "input/select/click"),
    b(A::Vibrate, BOTH, "output/haptic"),
];

const OCULUS_TOUCH: &[BindingSpec] = &[
    b(A::AimPose, BOTH, "input/aim/pose"),
    b(A::GripPose, BOTH, "input/grip/pose"),
    b(A::TriggerValue, BOTH, "input/trigger/value"),
    b(A::SelectClick, BOTH, "input/trigger/value"),
    b(A::SqueezeValue, BOTH, "input/squeeze/value"),
    b(A::Thumbstick, BOTH, "input/thumbstick"),
    b(A::ThumbstickClick, BOTH, "input/thumbstick/click"),
    b(A::MenuClick, LEFT, "input/menu/click"),
    b(A::XClick, LEFT, "input/x/click"),
    b(A::YClick, LEFT, "input/y/click"),
    b(A::AClick, RIGHT, "input/a/click"),
    b(A::BClick, RIGHT, "input/b/click"),
    b(A::Grab, BOTH, "input/squeeze/value"),
    b(A::Vibrate, BOTH, "output/haptic"),
];

const VALVE_INDEX: &[BindingSpec] = &[
    b(A::AimPose, BOTH, "input/aim/pose"),
    b(A::GripPose, BOTH, "input/grip/pose"),
    b(A::TriggerValue, BOTH, "input/trigger/value"),
    b(A::TriggerClick, BOTH, "input/trigger/click"),
    b(A::SelectClick, BOTH, "input/trigger/click"),
    b(A::SqueezeValue, BOTH, "input/squeeze/value"),
    b(A::SqueezeForce, BOTH, "input/squeeze/force"),
    b(A::Thumbstick, BOTH, "input/thumbstick"),
    b(A::ThumbstickClick, BOTH, "input/thumbstick/click"),
    b(A::MenuClick, BOTH, "input/b/click"),
    b(A::AClick, BOTH, "input/a/click"),
    b(A::BClick, BOTH, "input/b/click"),
    b(A::Grab, BOTH, "input/squeeze/force"),
    b(A::Vibrate, BOTH, "output/haptic"),
];

const MICROSOFT_MOTION: &[BindingSpec] = &[
    b(A::AimPose, BOTH, "input/aim/pose"),
    b(A::GripPose, BOTH, "input/grip/pose"),
    b(A::TriggerValue, BOTH, "input/trigger/value"),
    b(A::SelectClick, BOTH, "input/trigger/value"),
    b(A::SqueezeClick, BOTH, "input/squeeze/click"),
    b(A::Thumbstick, BOTH, "input/thumbstick"),
    b(A::ThumbstickClick, BOTH, "input/thumbstick/click"),
    b(A::MenuClick, BOTH, "input/menu/click"),
    b(A::Grab, BOTH, "input/squeeze/click"),
    b(A::Vibrate, BOTH, "output/haptic"),
];

const HTC_VIVE: &[BindingSpec] = &[
    b(A::AimPose, BOTH, "input/aim/pose"),
    b(A::GripPose, BOTH, "input/grip/pose"),
    b(A::TriggerValue, BOTH, "input/trigger/value"),
    b(A::TriggerClick, BOTH, "input/trigger/click"),
    b(A::SelectClick, BOTH, "input/trigger/click"),
    b(A::SqueezeClick, BOTH, "input/squeeze/click"),
    b(A::Thumbstick, BOTH, "input/trackpad"),
    b(A::ThumbstickClick, BOTH, "input/trackpad/click"),
    b(A::MenuClick, BOTH, "input/menu/click"),
    b(A::Grab, BOTH, "input/squeeze/click"),
    b(A::Vibrate, BOTH, "output/haptic"),
];

const HP_MIXED_REALITY: &[BindingSpec] = &[
    b(A::AimPose, BOTH, "input/aim/pose"),
    b(A::GripPose, BOTH, "input/grip/pose"),
    b(A::TriggerValue, BOTH, "input/trigger/value"),
    b(A::SelectClick, BOTH, "input/trigger/value"),
    b(A::SqueezeValue, BOTH, "input/squeeze/value"),
    b(A::Thumbstick, BOTH, "input/thumbstick"),
    b(A::ThumbstickClick, BOTH, "input/thumbstick/click"),
    b(A::MenuClick, BOTH, "input/menu/click"),
    b(A::XClick, LEFT, "input/x/click"),
    b(A::YClick, LEFT, "input/y/click"),
    b(A::AClick, RIGHT, "input/a/click"),
    b(A::BClick, RIGHT, "input/b/click"),
    b(A::Grab, BOTH, "input/squeeze/value"),
    b(A::Vibrate, BOTH, "output/haptic"),
];

/// Profiles suggested at startup. The runtime picks whichever matches the
/// connected hardware.
pub const INTERACTION_PROFILES: &[InteractionProfile] = &[
    InteractionProfile {
        path: "/interaction_profiles/khr/simple_controller",
        bindings: KHR_SIMPLE,
    },
    InteractionProfile {
        path: "/interaction_profiles/oculus/touch_controller",
        bindings: OCULUS_TOUCH,
    },
    InteractionProfile {
        path: "/interaction_profiles/valve/index_controller",
        bindings: VALVE_INDEX,
    },
    InteractionProfile {
        path: "/interaction_profiles/microsoft/motion_controller",
        bindings: MICROSOFT_MOTION,
    },
    InteractionProfile {
        path: "/interaction_profiles/htc/vive_controller",
        bindings: HTC_VIVE,
    },
    InteractionProfile {
        path: "/interaction_profiles/hp/mixed_reality_controller",
        bindings: HP_MIXED_REALITY,
    },
];
