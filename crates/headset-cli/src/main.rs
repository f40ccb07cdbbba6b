//! Headset host: runs the frame loop, clears each eye and mirrors
//! controller input to the log.

use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use glam::Vec4;
use tracing::{debug, info, warn};

use headset_core::{
    FrameOutcome, HeadsetConfig, InputData, InputSynchronizer, SessionFrameCoordinator, Side,
};
use headset_openxr::{OpenXrFrameRuntime, OpenXrInputRuntime, XrContext};

/// Pause between polls while the session is not running.
const IDLE_POLL: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "headset")]
#[command(about = "Run a headset session that clears both eyes and tracks controllers")]
struct Args {
    /// JSON config file; defaults apply when omitted
    #[arg(short, long, env = "HEADSET_CONFIG")]
    config: Option<PathBuf>,

    /// Stop after this many rendered frames
    #[arg(short, long, env = "HEADSET_FRAMES")]
    frames: Option<u64>,

    /// Pulse a controller whenever its select button is pressed
    #[arg(long, env = "HEADSET_HAPTICS")]
    haptics: bool,
}

fn main() -> Result<()> {
    headset_core::init_tracing();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => HeadsetConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => HeadsetConfig::default(),
    };
    if args.frames.is_some() {
        config.frame_limit = args.frames;
    }
    info!(?config, "starting headset host");

    let context = Rc::new(XrContext::new(
        &config.application_name,
        config.view_configuration,
        config.multisample_count,
    )?);

    let mut settings = config.coordinator_settings();
    settings.multisample_count = context.sample_count;
    let frame_runtime = OpenXrFrameRuntime::new(Rc::clone(&context))?;
    let mut coordinator = SessionFrameCoordinator::new(frame_runtime, settings)?;

    let session = coordinator
        .session()
        .ok_or_else(|| anyhow!("coordinator has no session"))?;
    // Declared after the coordinator so it is dropped first; it holds a
    // handle to the coordinator's session.
    let mut input = InputSynchronizer::new(OpenXrInputRuntime::new(Rc::clone(&context), session))?;

    let mut rendered: u64 = 0;
    let mut previous = InputData::default();
    while !coordinator.is_exit_requested() {
        if config.frame_limit.is_some_and(|limit| rendered >= limit) {
            info!(rendered, "frame limit reached");
            break;
        }

        let image_index = match coordinator.begin_frame() {
            FrameOutcome::SkipFully => {
                std::thread::sleep(IDLE_POLL);
                continue;
            }
            FrameOutcome::SkipRender => None,
            FrameOutcome::RenderFully(index) => Some(index),
            FrameOutcome::Error(err) => {
                warn!("frame dropped: {err}");
                coordinator.end_frame();
                continue;
            }
        };

        if let Some(space) = coordinator.reference_space() {
            let synced = input.sync(
                space,
                coordinator.frame_state().predicted_display_time,
                coordinator.eye_poses(),
                coordinator.session_state(),
            );
            if !synced {
                debug!("action sync rejected");
            }
        }
        let data = input.input_data();
        if args.haptics {
            for side in Side::ALL {
                let pressed = data.select_click_state[side.index()].current_state;
                if pressed && !previous.select_click_state[side.index()].current_state {
                    let pulse = config.haptic_pulse;
                    input.apply_haptic_feedback(
                        side,
                        pulse.amplitude,
                        pulse.duration_ns,
                        pulse.frequency_hz,
                    );
                }
            }
        }
        log_input_changes(&previous, &data);
        previous = data;

        if let Some(index) = image_index {
            if let (Some(render_pass), Some(target)) =
                (coordinator.render_pass(), coordinator.render_target(index))
            {
                let [left, right] = data.grab_state;
                let grab = left.current_state.max(right.current_state);
                let color = Vec4::new(0.05, 0.05 + 0.4 * grab, 0.1, 1.0);
                if let Err(err) = coordinator.runtime().clear(*render_pass, target, color) {
                    warn!("clear failed: {err}");
                }
            }
            rendered += 1;
        }
        coordinator.end_frame();
    }

    info!(rendered, state = ?coordinator.session_state(), "headset host exiting");
    Ok(())
}

fn log_input_changes(previous: &InputData, current: &InputData) {
    for side in Side::ALL {
        let i = side.index();
        if current.controller_grip_tracked[i] != previous.controller_grip_tracked[i] {
            info!(?side, tracked = current.controller_grip_tracked[i], "controller tracking");
        }
        if current.menu_click_state[i].changed_since_last_sync
            && current.menu_click_state[i].current_state
        {
            info!(?side, "menu pressed");
        }
        let stick = current.thumbstick_state[i];
        if stick.changed_since_last_sync {
            debug!(?side, x = stick.current_state.x, y = stick.current_state.y, "thumbstick");
        }
    }
    if current.headset_activity_state != previous.headset_activity_state {
        info!(state = ?current.headset_activity_state, "headset activity");
    }
}
