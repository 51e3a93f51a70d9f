use std::time::{Duration, Instant};

use playalong::theory::{ScaleKind, scale_exercise};
use playalong::{
    Grade, InputEvent, InputSource, NoteState, PracticeConfig, PracticeSession, Settings,
    SourceNote,
};

fn at(base: Instant, seconds: f64) -> Instant {
    base + Duration::from_secs_f64(seconds)
}

fn press(pitch: u8, base: Instant, seconds: f64) -> InputEvent {
    InputEvent::press(pitch, 100, InputSource::Keyboard, at(base, seconds))
}

#[test]
fn playing_a_scale_through_the_public_api() {
    let config = PracticeConfig {
        lead_in_s: 1.0,
        ..Default::default()
    };
    let mut session = PracticeSession::new(config);
    let notes = scale_exercise(60, ScaleKind::Major, 1, 0.5);
    let report = session.load(notes.clone());
    assert_eq!(report.accepted, 15);

    let base = Instant::now();
    session.play(base);

    // every note but the last is played 20 ms late
    for note in &notes[..notes.len() - 1] {
        let scheduled = note.start + 1.0;
        session.tick(at(base, scheduled - 0.1));
        let (hit, grade) = session
            .handle(&press(note.pitch, base, scheduled + 0.02))
            .expect("press inside the hit window");
        assert_eq!(hit.pitch, note.pitch);
        assert_eq!(grade, Grade::Perfect);
    }

    session.tick(at(base, 30.0));

    let stats = session.stats();
    assert_eq!(stats.total, 15);
    assert_eq!(stats.hit, 14);
    assert_eq!(stats.missed, 1);
    assert_eq!(stats.completion, 1.0);
    assert!(stats.mean_accuracy > 0.8);
    assert!(session.is_complete());

    let metrics = session.metrics();
    assert_eq!(metrics.max_streak(), 14);
    assert_eq!(metrics.current_streak(), 0);
    assert_eq!(metrics.grade_count(Grade::Miss), 1);
}

#[test]
fn wrong_pitch_is_not_scored() {
    let mut session = PracticeSession::new(PracticeConfig {
        lead_in_s: 0.0,
        ..Default::default()
    });
    session.load(vec![SourceNote::new(1.0, 1.5, 60, 100)]);
    let base = Instant::now();
    session.play(base);
    session.tick(at(base, 1.0));

    assert!(session.handle(&press(61, base, 1.0)).is_none());
    assert_eq!(session.stats().hit, 0);
    assert_eq!(session.manager().notes()[0].state(), NoteState::Waiting);
}

#[test]
fn settings_drive_the_engine() {
    let settings = Settings::from_ron(
        "(practice: (hit_window_ms: 100.0, grace_period_s: 0.0, lead_in_s: 0.0))",
    )
    .unwrap();
    let mut session = PracticeSession::new(settings.practice);
    session.load(vec![SourceNote::new(1.0, 1.5, 60, 100)]);
    let base = Instant::now();
    session.play(base);

    // 120 ms late is outside a 100 ms window
    assert!(session.handle(&press(60, base, 1.12)).is_none());
    let resolved = session.tick(at(base, 1.2));
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].state(), NoteState::Missed);
}
