//! MIDI input: every available input port forwards its messages to the UI
//! loop, which hands them to the session.

use std::sync::mpsc::Sender;

use midir::{MidiInput, MidiInputConnection};

use glitchbox::audio::midi_packet;

const CLIENT_NAME: &str = "glitchbox";

/// Open input connections. Dropping this closes them.
pub struct MidiInputs {
    connections: Vec<MidiInputConnection<()>>,
}

impl MidiInputs {
    /// Connect to every input port present right now. Ports that fail to
    /// open are logged and skipped.
    pub fn connect_all(sender: Sender<[u8; 3]>) -> Self {
        let mut connections = Vec::new();

        let scanner = match MidiInput::new(CLIENT_NAME) {
            Ok(scanner) => scanner,
            Err(err) => {
                tracing::warn!(%err, "midi unavailable");
                return Self { connections };
            }
        };

        for port in scanner.ports() {
            let name = scanner
                .port_name(&port)
                .unwrap_or_else(|_| "unknown".into());
            let input = match MidiInput::new(CLIENT_NAME) {
                Ok(input) => input,
                Err(err) => {
                    tracing::warn!(%err, port = %name, "midi unavailable");
                    continue;
                }
            };

            let sender = sender.clone();
            let connection = input.connect(
                &port,
                "glitchbox-input",
                move |_timestamp_us, data, _| {
                    if let Some(packet) = midi_packet(data) {
                        let _ = sender.send(packet);
                    }
                },
                (),
            );
            match connection {
                Ok(connection) => {
                    tracing::info!(port = %name, "opened midi input");
                    connections.push(connection);
                }
                Err(err) => tracing::warn!(%err, port = %name, "failed to open midi input"),
            }
        }

        Self { connections }
    }

    pub fn port_count(&self) -> usize {
        self.connections.len()
    }
}
