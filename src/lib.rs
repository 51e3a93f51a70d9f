pub mod config;
pub mod error;
pub mod events;
pub mod input;
pub mod metrics;
pub mod midi_file;
pub mod notes;
pub mod session;
pub mod theory;
pub mod ui;

pub use config::{PracticeConfig, Settings};
pub use error::{ConfigError, InputError, MidiFileError, ScheduleError};
pub use events::{InputEvent, InputSource, KeyAction};
pub use input::InputHandle;
pub use metrics::{Grade, PerformanceMetrics};
pub use notes::{Hit, NoteEvent, NoteId, NoteState, NotesManager, SourceNote, StatsSnapshot};
pub use session::{PlaybackClock, PracticeSession};
pub use ui::PlayalongApp;
