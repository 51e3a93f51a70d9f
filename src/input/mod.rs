mod keyboard;
mod midi;

pub use keyboard::KeyboardMapping;
pub use midi::{MidiConnection, decode, list_ports};

use crossbeam::channel::{Receiver, Sender};

use crate::error::InputError;
use crate::events::InputEvent;

/// Funnel for every input device. Devices hold a clone of the sender; the UI
/// drains `events` once per frame.
pub struct InputHandle {
    pub events: Receiver<InputEvent>,
    sender: Sender<InputEvent>,
    midi: Option<MidiConnection>,
}

impl InputHandle {
    pub fn new() -> Self {
        let (sender, events) = crossbeam::channel::unbounded();
        Self {
            events,
            sender,
            midi: None,
        }
    }

    pub fn sender(&self) -> Sender<InputEvent> {
        self.sender.clone()
    }

    /// Opens the MIDI port matching `hint`, or the first one, replacing any
    /// previous connection.
    pub fn connect_midi(&mut self, hint: Option<&str>) -> Result<&str, InputError> {
        self.midi = None;
        let connection = midi::connect(hint, self.sender.clone())?;
        Ok(&self.midi.insert(connection).port_name)
    }

    pub fn midi_port(&self) -> Option<&str> {
        self.midi.as_ref().map(|m| m.port_name.as_str())
    }

    pub fn disconnect_midi(&mut self) {
        self.midi = None;
    }
}

impl Default for InputHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InputSource;
    use std::time::Instant;

    #[test]
    fn sender_clones_feed_the_same_queue() {
        let input = InputHandle::new();
        let sender = input.sender();
        sender
            .send(InputEvent::press(60, 100, InputSource::Keyboard, Instant::now()))
            .unwrap();
        sender
            .send(InputEvent::release(60, InputSource::Keyboard, Instant::now()))
            .unwrap();

        let drained: Vec<InputEvent> = input.events.try_iter().collect();
        assert_eq!(drained.len(), 2);
        assert!(drained[0].is_press());
        assert!(!drained[1].is_press());
        assert_eq!(input.midi_port(), None);
    }

    #[test]
    fn disconnect_without_a_port_is_harmless() {
        let mut input = InputHandle::new();
        input.disconnect_midi();
        assert_eq!(input.midi_port(), None);
        input
            .sender()
            .send(InputEvent::press(60, 100, InputSource::Keyboard, Instant::now()))
            .unwrap();
        assert_eq!(input.events.try_iter().count(), 1);
    }
}
