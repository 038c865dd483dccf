use log::debug;
use opencv::highgui;

const KEY_ESC: i32 = 27;
const KEY_SPACE: i32 = 32;

/// Discrete requests from the user, polled once per loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartTracking,
    StopTracking,
    StartRecording,
    StopRecording,
    Quit,
}

/// `t` toggles tracking, space toggles recording, `q` or Esc quits.
pub fn command_for_key(key: i32, tracking: bool, recording: bool) -> Option<Command> {
    match key {
        KEY_ESC => Some(Command::Quit),
        KEY_SPACE if recording => Some(Command::StopRecording),
        KEY_SPACE => Some(Command::StartRecording),
        k if k == i32::from(b'q') => Some(Command::Quit),
        k if k == i32::from(b't') && tracking => Some(Command::StopTracking),
        k if k == i32::from(b't') => Some(Command::StartTracking),
        _ => None,
    }
}

pub trait CommandSource {
    /// The command observed this iteration, given what is currently active.
    fn poll(&mut self, tracking: bool, recording: bool) -> Option<Command>;
}

/// Keys pressed in the highgui window.
#[derive(Debug, Default)]
pub struct WindowKeys;

impl CommandSource for WindowKeys {
    fn poll(&mut self, tracking: bool, recording: bool) -> Option<Command> {
        match highgui::wait_key(1) {
            Ok(key) if key >= 0 => command_for_key(key & 0xff, tracking, recording),
            Ok(_) => None,
            Err(e) => {
                debug!("wait_key failed: {}", e);
                None
            }
        }
    }
}

/// No interactive input; the loop runs until the source is exhausted.
#[derive(Debug, Default)]
pub struct NoInput;

impl CommandSource for NoInput {
    fn poll(&mut self, _tracking: bool, _recording: bool) -> Option<Command> {
        None
    }
}
