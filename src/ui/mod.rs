mod falling_notes;
mod timing_graph;

pub use falling_notes::{FallingNotes, KeyboardLayout};
pub use timing_graph::TimingGraph;

use eframe::egui;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::{self, Settings, SettingsWatcher, VisualizationMode};
use crate::input::{self, InputHandle, KeyboardMapping};
use crate::metrics::Grade;
use crate::midi_file::{self, MidiSong};
use crate::notes::{NoteState, SourceNote};
use crate::session::PracticeSession;
use crate::theory::{self, ChordKind, ScaleKind};

const EXERCISE_STEP_S: f64 = 0.6;
/// How far ahead of the song position the "Next" chord is looked up.
const UPCOMING_WINDOW_S: f64 = 2.0;

fn grade_color(grade: Grade) -> egui::Color32 {
    match grade {
        Grade::Perfect | Grade::Great => egui::Color32::LIGHT_GREEN,
        Grade::Good | Grade::Ok => egui::Color32::YELLOW,
        Grade::Late => egui::Color32::from_rgb(255, 160, 60),
        Grade::Miss => egui::Color32::from_rgb(220, 60, 60),
    }
}

pub struct PlayalongApp {
    settings: Settings,
    settings_path: PathBuf,
    session: PracticeSession,
    input: InputHandle,
    mapping: KeyboardMapping,
    watcher: Option<SettingsWatcher>,
    song: Option<MidiSong>,
    song_path: Option<PathBuf>,
    selected_track: Option<usize>,
    exercise_root: u8,
    error_message: Option<String>,
}

impl PlayalongApp {
    pub fn new(
        settings: Settings,
        settings_path: PathBuf,
        input: InputHandle,
        watcher: Option<SettingsWatcher>,
    ) -> Self {
        Self {
            session: PracticeSession::new(settings.practice.clone()),
            mapping: KeyboardMapping::new(settings.input.keyboard_base_note),
            settings,
            settings_path,
            input,
            watcher,
            song: None,
            song_path: None,
            selected_track: None,
            exercise_root: 60,
            error_message: None,
        }
    }

    fn process_settings_updates(&mut self) {
        let Some(watcher) = &self.watcher else {
            return;
        };
        while let Ok(settings) = watcher.updates.try_recv() {
            if let Err(e) = self.session.set_config(settings.practice.clone()) {
                warn!("keeping previous practice settings: {}", e);
                self.error_message = Some(format!("Invalid practice settings: {}", e));
                continue;
            }
            self.mapping = KeyboardMapping::new(settings.input.keyboard_base_note);
            self.settings = settings;
        }
    }

    fn process_input(&mut self, ctx: &egui::Context) {
        let now = Instant::now();
        let sender = self.input.sender();
        ctx.input(|i| {
            for event in &i.events {
                if let Some(key) = self.mapping.translate(event, now) {
                    let _ = sender.send(key);
                }
            }
        });

        while let Ok(event) = self.input.events.try_recv() {
            self.session.handle(&event);
        }
    }

    fn open_song(&mut self, path: PathBuf) {
        match midi_file::load(&path) {
            Ok(song) => {
                self.selected_track = None;
                self.session.load(song.notes_for_track(None));
                self.song = Some(song);
                self.song_path = Some(path);
                self.error_message = None;
            }
            Err(e) => {
                warn!(path = %path.display(), "failed to load MIDI file: {}", e);
                self.error_message = Some(format!("Failed to load MIDI file: {}", e));
            }
        }
    }

    fn select_track(&mut self, track: Option<usize>) {
        self.selected_track = track;
        if let Some(song) = &self.song {
            self.session.load(song.notes_for_track(track));
        }
    }

    fn start_exercise(&mut self, notes: Vec<SourceNote>, title: String) {
        info!(exercise = %title, notes = notes.len(), "starting exercise");
        self.song = None;
        self.song_path = None;
        self.selected_track = None;
        self.session.load(notes);
        self.session.play(Instant::now());
    }

    fn save_settings(&mut self) {
        if let Err(e) = self.settings.save(&self.settings_path) {
            warn!(path = %self.settings_path.display(), "failed to save settings: {}", e);
            self.error_message = Some(format!("Failed to save settings: {}", e));
            return;
        }
        info!(path = %self.settings_path.display(), "settings saved");
        if self.watcher.is_none() {
            self.watcher = config::watch(&self.settings_path)
                .inspect_err(|e| warn!("settings will not reload live: {}", e))
                .ok();
        }
    }

    fn connect_midi(&mut self, port: Option<&str>) {
        match self.input.connect_midi(port) {
            Ok(port) => {
                info!(port, "listening for MIDI");
                self.error_message = None;
            }
            Err(e) => self.error_message = Some(e.to_string()),
        }
    }

    fn menu_bar(&mut self, ui: &mut egui::Ui) {
        egui::MenuBar::new().ui(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("Open MIDI File...").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .set_title("Open MIDI File")
                        .add_filter("MIDI", &["mid", "midi"])
                        .pick_file()
                    {
                        self.open_song(path);
                    }
                    ui.close();
                }

                if ui.button("Save Settings").clicked() {
                    self.save_settings();
                    ui.close();
                }

                ui.separator();

                if ui.button("Quit").clicked() {
                    ui.ctx().send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });

            ui.menu_button("Exercises", |ui| {
                ui.horizontal(|ui| {
                    ui.label("Root:");
                    ui.add(egui::DragValue::new(&mut self.exercise_root).range(24..=96));
                    ui.label(theory::note_name(self.exercise_root));
                });
                ui.separator();

                let root = self.exercise_root;
                let root_name = theory::note_name(root);

                ui.menu_button("Scales", |ui| {
                    for kind in ScaleKind::ALL {
                        if ui.button(kind.to_string()).clicked() {
                            let notes = theory::scale_exercise(root, kind, 2, EXERCISE_STEP_S);
                            self.start_exercise(notes, format!("{} {}", root_name, kind));
                            ui.close();
                        }
                    }
                });

                ui.menu_button("Chords", |ui| {
                    for kind in ChordKind::ALL {
                        let title = format!("{}{}", root_name, kind);
                        if ui.button(&title).clicked() {
                            let step = EXERCISE_STEP_S * 2.0;
                            let notes = theory::chord_exercise(root, kind, 4, step);
                            self.start_exercise(notes, title);
                            ui.close();
                        }
                    }
                });
            });

            ui.menu_button("View", |ui| {
                for mode in VisualizationMode::ALL {
                    ui.radio_value(&mut self.settings.display.mode, mode, mode.to_string());
                }
                ui.separator();
                ui.checkbox(&mut self.settings.display.show_note_names, "Note names");
                ui.checkbox(&mut self.settings.display.show_octave_markers, "Octave markers");
            });

            ui.menu_button("MIDI Input", |ui| {
                match self.input.midi_port() {
                    Some(port) => ui.label(format!("Connected: {}", port)),
                    None => ui.label("Not connected"),
                };
                ui.separator();

                match input::list_ports() {
                    Ok(ports) if ports.is_empty() => {
                        ui.label("No MIDI ports found");
                    }
                    Ok(ports) => {
                        for port in ports {
                            let connected = self.input.midi_port() == Some(port.as_str());
                            if ui.selectable_label(connected, &port).clicked() {
                                self.connect_midi(Some(&port));
                                ui.close();
                            }
                        }
                    }
                    Err(e) => {
                        ui.label(e.to_string());
                    }
                }
                ui.separator();

                if ui.button("Reconnect").clicked() {
                    let hint = self.settings.input.midi_port_hint.clone();
                    self.connect_midi(hint.as_deref());
                    ui.close();
                }
                if ui
                    .add_enabled(self.input.midi_port().is_some(), egui::Button::new("Disconnect"))
                    .clicked()
                {
                    self.input.disconnect_midi();
                    info!("MIDI input disconnected");
                    ui.close();
                }
            });
        });
    }

    fn transport_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if self.session.is_playing() {
                if ui.button("⏸ Pause").clicked() {
                    self.session.pause(Instant::now());
                }
            } else if ui.button("▶ Play").clicked() {
                self.session.play(Instant::now());
            }

            if ui.button("⏹ Stop").clicked() {
                self.session.stop();
            }
        });
    }

    fn track_selector(&mut self, ui: &mut egui::Ui) {
        let Some(song) = &self.song else {
            return;
        };
        let mut selection = self.selected_track;
        ui.heading("Tracks");
        ui.selectable_value(&mut selection, None, "All tracks");
        for track in song.tracks_with_notes() {
            let name = song.track_names.get(track).cloned().unwrap_or_default();
            ui.selectable_value(&mut selection, Some(track), name);
        }
        if selection != self.selected_track {
            self.select_track(selection);
        }
    }

    fn stats_panel(&self, ui: &mut egui::Ui, position: f64) {
        let stats = self.session.stats();
        let metrics = self.session.metrics();

        ui.heading("Performance");
        ui.label(format!("Score: {}", metrics.score()));
        ui.label(format!("Hit rate: {:.0}%", metrics.hit_percentage()));
        ui.label(format!(
            "Streak: {} (best {})",
            metrics.current_streak(),
            metrics.max_streak()
        ));
        ui.label(format!("Hit: {} / {}", stats.hit, stats.total));
        ui.label(format!("Missed: {}", stats.missed));
        ui.label(format!("Accuracy: {:.0}%", stats.mean_accuracy * 100.0));
        ui.add(egui::ProgressBar::new(stats.completion as f32).text("Completion"));
        if let Some(error) = metrics.average_timing_error() {
            ui.label(format!("Avg timing: {:.0} ms", error));
        }

        ui.separator();
        for grade in Grade::ALL {
            ui.label(format!("{}: {}", grade, metrics.grade_count(grade)));
        }

        TimingGraph::new(metrics).show(ui);

        if let Some(grade) = metrics.last_grade() {
            ui.separator();
            ui.colored_label(grade_color(grade), egui::RichText::new(grade.to_string()).heading());
        }
        if let Some((hit, grade)) = self.session.last_hit() {
            let early_late = if hit.timing_error_ms < 0.0 { "early" } else { "late" };
            ui.colored_label(
                grade_color(grade),
                format!(
                    "{} {} ({:.0} ms {})",
                    theory::note_name(hit.pitch),
                    grade,
                    hit.timing_error_ms.abs(),
                    early_late
                ),
            );
        }

        let waiting = self
            .session
            .manager()
            .notes()
            .iter()
            .filter(|n| n.state() == NoteState::Waiting)
            .count();
        if waiting > 0 {
            ui.colored_label(egui::Color32::YELLOW, format!("Waiting for {} note(s)", waiting));
        }

        if let Some(song) = &self.song {
            ui.separator();
            ui.heading("Song");
            if let Some(path) = &self.song_path {
                ui.label(path.file_name().unwrap_or_default().to_string_lossy().into_owned());
            }

            let song_time = position - self.session.manager().config().lead_in_s;
            let upcoming: Vec<SourceNote> = song
                .notes_in_range(song_time, song_time + UPCOMING_WINDOW_S)
                .into_iter()
                .filter(|n| self.selected_track.is_none_or(|t| n.track == t))
                .filter(|n| n.note.start >= song_time)
                .map(|n| n.note)
                .collect();
            if let Some(chord) = midi_file::group_chords(&upcoming, midi_file::CHORD_THRESHOLD_S)
                .first()
            {
                ui.label(format!("Next: {}", midi_file::chord_label(chord)));
            }

            egui::CollapsingHeader::new("Analysis").show(ui, |ui| {
                for line in song.report() {
                    ui.label(line);
                }
            });
        }
    }
}

impl eframe::App for PlayalongApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_settings_updates();
        self.process_input(ctx);

        let now = Instant::now();
        self.session.tick(now);
        let position = self.session.position(now);

        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            self.menu_bar(ui);
        });

        if let Some(ref error) = self.error_message {
            egui::TopBottomPanel::top("error").show(ctx, |ui| {
                ui.colored_label(egui::Color32::RED, error);
            });
        }

        egui::SidePanel::left("session")
            .min_width(220.0)
            .show(ctx, |ui| {
                self.transport_controls(ui);
                ui.label(format!("Position: {:.1}s", position));
                ui.separator();
                self.track_selector(ui);
                ui.separator();
                self.stats_panel(ui, position);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            if self.session.manager().is_empty() && self.session.fading().is_empty() {
                if self.session.is_complete() {
                    ui.vertical_centered(|ui| {
                        ui.heading("Piece complete");
                        ui.label("Press Play to go again");
                    });
                } else {
                    ui.vertical_centered(|ui| {
                        ui.heading("Nothing to play");
                        ui.label("File → Open MIDI File or pick an exercise to get started");
                    });
                }
                return;
            }
            FallingNotes::new(&mut self.session, &self.settings.display, &self.mapping, position)
                .show(ui);
        });

        ctx.request_repaint();
    }
}
