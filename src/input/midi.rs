use crossbeam::channel::Sender;
use midir::{Ignore, MidiInput, MidiInputConnection};
use std::time::Instant;
use tracing::{debug, info, trace};

use crate::error::InputError;
use crate::events::{InputEvent, InputSource};

const CLIENT_NAME: &str = "playalong";

/// Live connection to a MIDI input port. Dropping it closes the port.
pub struct MidiConnection {
    _connection: MidiInputConnection<()>,
    pub port_name: String,
}

pub fn list_ports() -> Result<Vec<String>, InputError> {
    let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| InputError::Init(e.to_string()))?;
    Ok(midi_in
        .ports()
        .iter()
        .map(|port| midi_in.port_name(port).unwrap_or_default())
        .collect())
}

pub(super) fn connect(
    hint: Option<&str>,
    tx: Sender<InputEvent>,
) -> Result<MidiConnection, InputError> {
    let mut midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| InputError::Init(e.to_string()))?;
    midi_in.ignore(Ignore::All);

    let ports = midi_in.ports();
    for (i, port) in ports.iter().enumerate() {
        debug!(index = i, name = %midi_in.port_name(port).unwrap_or_default(), "MIDI input");
    }

    let port = ports
        .iter()
        .find(|p| {
            hint.is_some_and(|hint| midi_in.port_name(p).unwrap_or_default().contains(hint))
        })
        .or_else(|| ports.first())
        .ok_or(InputError::NoPort)?;
    let port_name = midi_in.port_name(port).unwrap_or_default();

    let connection = midi_in
        .connect(
            port,
            "playalong-input",
            move |_, message, _| {
                if let Some(event) = decode(message, Instant::now()) {
                    let _ = tx.send(event);
                }
            },
            (),
        )
        .map_err(|e| InputError::Connect {
            port: port_name.clone(),
            message: e.to_string(),
        })?;

    info!(port = %port_name, "MIDI input connected");
    Ok(MidiConnection {
        _connection: connection,
        port_name,
    })
}

/// Note-on with velocity is a press; note-off and note-on 0 are releases.
pub fn decode(message: &[u8], received: Instant) -> Option<InputEvent> {
    let [status, pitch, velocity, ..] = *message else {
        trace!(?message, "short MIDI message");
        return None;
    };

    match status & 0xF0 {
        0x90 if velocity > 0 => Some(InputEvent::press(
            pitch & 0x7F,
            velocity & 0x7F,
            InputSource::Midi,
            received,
        )),
        0x80 | 0x90 => Some(InputEvent::release(pitch & 0x7F, InputSource::Midi, received)),
        _ => None,
    }
}
