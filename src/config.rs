use crossbeam::channel::{Receiver, Sender};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::ConfigError;

pub const DEFAULT_SETTINGS_FILE: &str = "playalong.ron";
pub const SETTINGS_ENV_VAR: &str = "PLAYALONG_CONFIG";

/// Timing constants of the falling-notes engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PracticeConfig {
    /// Symmetric tolerance around a note's start, in milliseconds.
    pub hit_window_ms: f64,
    /// How long a note holds at the target line before it is missed.
    /// Zero disables waiting: notes keep falling and are missed once the
    /// hit window has passed.
    pub grace_period_s: f64,
    /// Preparation time added to every scheduled start.
    pub lead_in_s: f64,
    /// How far ahead of its start a note lights up its key.
    pub highlight_window_s: f64,
    /// Fall speed in pixels per second.
    pub fall_speed: f64,
    /// When false, a waiting note accepts a press at any point of its grace
    /// period (scored with zero accuracy once outside the hit window).
    pub strict_timing: bool,
}

impl Default for PracticeConfig {
    fn default() -> Self {
        Self {
            hit_window_ms: 150.0,
            grace_period_s: 5.0,
            lead_in_s: 3.0,
            highlight_window_s: 0.3,
            fall_speed: 200.0,
            strict_timing: true,
        }
    }
}

impl PracticeConfig {
    pub fn hit_window_s(&self) -> f64 {
        self.hit_window_ms / 1000.0
    }

    pub fn waits_at_target(&self) -> bool {
        self.grace_period_s > 0.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("hit_window_ms", self.hit_window_ms),
            ("grace_period_s", self.grace_period_s),
            ("lead_in_s", self.lead_in_s),
            ("highlight_window_s", self.highlight_window_s),
            ("fall_speed", self.fall_speed),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("expected a non-negative number, got {value}"),
                });
            }
        }

        if self.hit_window_ms == 0.0 {
            return Err(ConfigError::Invalid {
                field: "hit_window_ms",
                message: "must be greater than zero".into(),
            });
        }

        if self.waits_at_target() && self.grace_period_s < self.hit_window_s() {
            return Err(ConfigError::Invalid {
                field: "grace_period_s",
                message: format!(
                    "must be 0 or at least the hit window ({}s)",
                    self.hit_window_s()
                ),
            });
        }

        Ok(())
    }
}

/// What the note lane shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisualizationMode {
    /// Falling blocks only.
    #[default]
    Falling,
    /// Keyboard highlights only; notes are still scheduled and graded.
    Highlight,
    Both,
}

impl VisualizationMode {
    pub const ALL: [VisualizationMode; 3] = [
        VisualizationMode::Falling,
        VisualizationMode::Highlight,
        VisualizationMode::Both,
    ];

    pub fn shows_notes(self) -> bool {
        self != VisualizationMode::Highlight
    }

    pub fn shows_highlights(self) -> bool {
        self != VisualizationMode::Falling
    }
}

impl std::fmt::Display for VisualizationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            VisualizationMode::Falling => "Falling notes",
            VisualizationMode::Highlight => "Key highlights",
            VisualizationMode::Both => "Both",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub mode: VisualizationMode,
    pub window_size: (f32, f32),
    pub first_key: u8,
    pub key_count: u8,
    pub show_note_names: bool,
    pub show_octave_markers: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            mode: VisualizationMode::Falling,
            window_size: (1600.0, 900.0),
            first_key: 21,
            key_count: 88,
            show_note_names: false,
            show_octave_markers: true,
        }
    }
}

impl DisplayConfig {
    pub fn last_key(&self) -> u8 {
        (self.first_key as u16 + self.key_count.max(1) as u16 - 1).min(127) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Substring of the MIDI port name to connect to; first port otherwise.
    pub midi_port_hint: Option<String>,
    /// Note played by the `Z` key.
    pub keyboard_base_note: u8,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            midi_port_hint: None,
            keyboard_base_note: 36,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub practice: PracticeConfig,
    pub display: DisplayConfig,
    pub input: InputConfig,
}

impl Settings {
    /// Settings path from the environment, falling back to the working directory.
    pub fn default_path() -> PathBuf {
        std::env::var_os(SETTINGS_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE))
    }

    pub fn from_ron(source: &str) -> Result<Self, ConfigError> {
        let settings: Settings = ron::from_str(source)?;
        settings.practice.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ron(&source)
    }

    /// Loads `path`, or returns the defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let settings = Self::load(path)?;
        info!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let source = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, source)?;
        Ok(())
    }
}

/// Keeps the settings file watched for as long as it is alive.
pub struct SettingsWatcher {
    _watcher: RecommendedWatcher,
    pub updates: Receiver<Settings>,
}

/// Reloads `path` on every modification and forwards valid settings.
pub fn watch(path: &Path) -> Result<SettingsWatcher, ConfigError> {
    let (tx, rx) = crossbeam::channel::unbounded();
    let watched = path.to_path_buf();

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                if event.kind.is_modify() || event.kind.is_create() {
                    reload(&watched, &tx);
                }
            }
            Err(e) => warn!("settings watch error: {}", e),
        },
        Config::default(),
    )?;

    watcher.watch(path, RecursiveMode::NonRecursive)?;
    debug!(path = %path.display(), "watching settings file");

    Ok(SettingsWatcher {
        _watcher: watcher,
        updates: rx,
    })
}

fn reload(path: &Path, tx: &Sender<Settings>) {
    match Settings::load(path) {
        Ok(settings) => {
            info!("settings reloaded");
            let _ = tx.send(settings);
        }
        Err(e) => warn!("ignoring settings change: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_magnitudes() {
        let config = PracticeConfig::default();
        assert_eq!(config.hit_window_ms, 150.0);
        assert_eq!(config.grace_period_s, 5.0);
        assert_eq!(config.lead_in_s, 3.0);
        assert_eq!(config.highlight_window_s, 0.3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let settings = Settings::from_ron("(practice: (hit_window_ms: 200.0))").unwrap();
        assert_eq!(settings.practice.hit_window_ms, 200.0);
        assert_eq!(settings.practice.grace_period_s, 5.0);
        assert_eq!(settings.display, DisplayConfig::default());
    }

    #[test]
    fn rejects_grace_shorter_than_window() {
        let err = Settings::from_ron("(practice: (grace_period_s: 0.1))").unwrap_err();
        assert!(err.to_string().contains("grace_period_s"));
    }

    #[test]
    fn zero_grace_disables_waiting() {
        let settings = Settings::from_ron("(practice: (grace_period_s: 0.0))").unwrap();
        assert!(!settings.practice.waits_at_target());
    }

    #[test]
    fn rejects_negative_and_nan_values() {
        let config = PracticeConfig {
            lead_in_s: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PracticeConfig {
            fall_speed: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let err = Settings::from_ron("(practice: (").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = std::env::temp_dir().join(format!("playalong-settings-{}", std::process::id()));
        let path = dir.join("settings.ron");
        let mut settings = Settings::default();
        settings.input.midi_port_hint = Some("Keystation".into());
        settings.practice.strict_timing = false;

        settings.save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded, settings);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = Path::new("/nonexistent/playalong.ron");
        assert_eq!(Settings::load_or_default(path).unwrap(), Settings::default());
    }

    #[test]
    fn reload_forwards_only_valid_files() {
        let path = std::env::temp_dir()
            .join(format!("playalong-reload-{}.ron", std::process::id()));
        let (tx, rx) = crossbeam::channel::unbounded();

        fs::write(&path, "(practice: (hit_window_ms: 120.0), display: (mode: Both))").unwrap();
        reload(&path, &tx);
        fs::write(&path, "(practice: (hit_window_ms: 0.0))").unwrap();
        reload(&path, &tx);
        fs::write(&path, "(practice: (").unwrap();
        reload(&path, &tx);

        let received: Vec<Settings> = rx.try_iter().collect();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].practice.hit_window_ms, 120.0);
        assert_eq!(received[0].display.mode, VisualizationMode::Both);

        let _ = fs::remove_file(path);
    }

    #[test]
    fn highlight_mode_hides_blocks() {
        assert!(VisualizationMode::Falling.shows_notes());
        assert!(!VisualizationMode::Falling.shows_highlights());
        assert!(!VisualizationMode::Highlight.shows_notes());
        assert!(VisualizationMode::Both.shows_notes());
        assert!(VisualizationMode::Both.shows_highlights());
        assert_eq!(DisplayConfig::default().mode, VisualizationMode::Falling);
    }

    #[test]
    fn last_key_is_clamped() {
        let display = DisplayConfig {
            first_key: 100,
            key_count: 88,
            ..Default::default()
        };
        assert_eq!(display.last_key(), 127);
        assert_eq!(DisplayConfig::default().last_key(), 108);
    }
}
