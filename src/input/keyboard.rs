use eframe::egui;
use std::time::Instant;

use crate::events::{InputEvent, InputSource};
use crate::notes::MAX_PITCH;

const KEYBOARD_VELOCITY: u8 = 100;

/// Three piano-like rows: `Z` row from the base note, `Q` row an octave up,
/// `I` row two octaves up. Offsets are semitones from the base note.
const LAYOUT: [(egui::Key, &str, u8); 32] = [
    (egui::Key::Z, "Z", 0),
    (egui::Key::S, "S", 1),
    (egui::Key::X, "X", 2),
    (egui::Key::D, "D", 3),
    (egui::Key::C, "C", 4),
    (egui::Key::V, "V", 5),
    (egui::Key::G, "G", 6),
    (egui::Key::B, "B", 7),
    (egui::Key::H, "H", 8),
    (egui::Key::N, "N", 9),
    (egui::Key::J, "J", 10),
    (egui::Key::M, "M", 11),
    (egui::Key::Q, "Q", 12),
    (egui::Key::Num2, "2", 13),
    (egui::Key::W, "W", 14),
    (egui::Key::Num3, "3", 15),
    (egui::Key::E, "E", 16),
    (egui::Key::R, "R", 17),
    (egui::Key::Num5, "5", 18),
    (egui::Key::T, "T", 19),
    (egui::Key::Num6, "6", 20),
    (egui::Key::Y, "Y", 21),
    (egui::Key::Num7, "7", 22),
    (egui::Key::U, "U", 23),
    (egui::Key::I, "I", 24),
    (egui::Key::Num9, "9", 25),
    (egui::Key::O, "O", 26),
    (egui::Key::Num0, "0", 27),
    (egui::Key::P, "P", 28),
    (egui::Key::OpenBracket, "[", 29),
    (egui::Key::Equals, "=", 30),
    (egui::Key::CloseBracket, "]", 31),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardMapping {
    base_note: u8,
}

impl KeyboardMapping {
    pub fn new(base_note: u8) -> Self {
        Self {
            base_note: base_note.min(MAX_PITCH),
        }
    }

    pub fn pitch_for(&self, key: egui::Key) -> Option<u8> {
        let (_, _, offset) = LAYOUT.iter().find(|(k, _, _)| *k == key)?;
        let pitch = self.base_note as u16 + *offset as u16;
        (pitch <= MAX_PITCH as u16).then_some(pitch as u8)
    }

    /// Label of the computer key that plays `pitch`, if any.
    pub fn key_label(&self, pitch: u8) -> Option<&'static str> {
        let offset = pitch.checked_sub(self.base_note)?;
        LAYOUT
            .iter()
            .find(|(_, _, o)| *o == offset)
            .map(|(_, label, _)| *label)
    }

    /// Key auto-repeat is dropped so holding a key is a single press.
    pub fn translate(&self, event: &egui::Event, received: Instant) -> Option<InputEvent> {
        let egui::Event::Key {
            key,
            pressed,
            repeat: false,
            modifiers,
            ..
        } = event
        else {
            return None;
        };
        if modifiers.command || modifiers.alt {
            return None;
        }

        let pitch = self.pitch_for(*key)?;
        Some(if *pressed {
            InputEvent::press(pitch, KEYBOARD_VELOCITY, InputSource::Keyboard, received)
        } else {
            InputEvent::release(pitch, InputSource::Keyboard, received)
        })
    }
}

impl Default for KeyboardMapping {
    fn default() -> Self {
        Self::new(36)
    }
}
