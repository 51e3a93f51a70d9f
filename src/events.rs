use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Press,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Keyboard,
    Midi,
}

/// A key going down or up on any input device.
#[derive(Debug, Clone, Copy)]
pub struct InputEvent {
    pub pitch: u8,
    pub velocity: u8,
    pub action: KeyAction,
    pub source: InputSource,
    pub received: Instant,
}

impl InputEvent {
    pub fn press(pitch: u8, velocity: u8, source: InputSource, received: Instant) -> Self {
        Self {
            pitch,
            velocity,
            action: KeyAction::Press,
            source,
            received,
        }
    }

    pub fn release(pitch: u8, source: InputSource, received: Instant) -> Self {
        Self {
            pitch,
            velocity: 0,
            action: KeyAction::Release,
            source,
            received,
        }
    }

    pub fn is_press(&self) -> bool {
        self.action == KeyAction::Press
    }
}
