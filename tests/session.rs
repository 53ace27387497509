//! Integration tests for the event-driven recognition session.

use midi_chord::session::DEFAULT_DEBOUNCE;
use midi_chord::{ChordUpdate, LogSink, NoteEvent, RecognitionSession, ValidationError};
use std::sync::{mpsc, Arc, Mutex};
use std::time::{Duration, Instant};

fn on(pitch: u8) -> NoteEvent {
    NoteEvent::NoteOn {
        pitch,
        velocity: 90,
    }
}

fn off(pitch: u8) -> NoteEvent {
    NoteEvent::NoteOff { pitch }
}

/// Apply every event at the same instant, returning the labels reported.
fn feed(session: &mut RecognitionSession, events: &[NoteEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|&e| session.on_event(e).expect("valid event"))
        .map(|u| u.label().to_string())
        .collect()
}

fn immediate() -> RecognitionSession {
    RecognitionSession::builder()
        .debounce(Duration::ZERO)
        .build()
}

#[test]
fn reports_only_label_changes() {
    let mut session = immediate();

    assert_eq!(feed(&mut session, &[on(60), on(64), on(67)]), vec!["Cmaj"]);
    assert_eq!(session.label(), "Cmaj");
    assert_eq!(session.current().map(|c| c.name.as_str()), Some("Cmaj"));
    assert_eq!(session.history().len(), 1);

    assert_eq!(
        feed(&mut session, &[off(60), off(64), off(67)]),
        vec!["Cmaj/E", "N.C."]
    );
    assert!(session.current().is_none());
    assert!(session.sounding().is_empty());
}

#[test]
fn no_chord_update_carries_sounding_notes() {
    let mut session = RecognitionSession::builder()
        .debounce(Duration::ZERO)
        .min_notes(3)
        .build();
    feed(&mut session, &[on(60), on(64), on(67)]);

    let update = session.on_event(off(67)).expect("valid event");
    match update {
        Some(ChordUpdate::NoChord { pitches, bass }) => {
            assert_eq!(pitches.len(), 2);
            assert_eq!(bass.map(|b| b.to_string()), Some("C".to_string()));
        }
        other => panic!("expected no-chord update, got {other:?}"),
    }
}

#[test]
fn history_keeps_most_recent_chords() {
    let mut session = RecognitionSession::builder()
        .debounce(Duration::ZERO)
        .min_notes(3)
        .history_len(2)
        .build();

    for chord in [[60, 64, 67], [65, 69, 72], [67, 71, 74]] {
        let press: Vec<_> = chord.iter().map(|&p| on(p)).collect();
        let release: Vec<_> = chord.iter().map(|&p| off(p)).collect();
        feed(&mut session, &press);
        feed(&mut session, &release);
    }

    let names: Vec<_> = session.history().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Fmaj", "Gmaj"]);
    assert_eq!(session.label(), "N.C.");
}

#[test]
fn unchanged_sounding_set_skips_recognition() {
    let mut session = immediate();
    feed(&mut session, &[on(60), on(64), on(67)]);

    assert_eq!(session.on_event(on(64)), Ok(None));
    assert_eq!(
        session.on_event(NoteEvent::SustainPedal { down: true }),
        Ok(None)
    );
    assert_eq!(session.history().len(), 1);
}

#[test]
fn debounce_defers_fast_changes_until_poll() {
    let mut session = RecognitionSession::builder().min_notes(3).build();
    let t0 = Instant::now();
    let at = |ms: u64| t0 + Duration::from_millis(ms);

    assert_eq!(session.on_event_at(on(60), at(0)), Ok(None));
    assert_eq!(session.on_event_at(on(64), at(1)), Ok(None));
    assert_eq!(session.on_event_at(on(67), at(2)), Ok(None));
    assert!(session.is_pending());

    assert_eq!(session.poll(at(10)), None);
    assert!(session.is_pending());

    let update = session.poll(at(16)).expect("window elapsed");
    assert_eq!(update.label(), "Cmaj");
    assert!(!session.is_pending());
    assert_eq!(session.poll(at(40)), None);

    let release = session.on_event_at(off(67), at(50)).expect("valid event");
    assert_eq!(release.map(|u| u.label().to_string()), Some("N.C.".to_string()));
}

#[test]
fn default_session_reports_block_chord_on_poll() {
    let mut session = RecognitionSession::new();
    let t0 = Instant::now();

    for (i, pitch) in [60, 64, 67].into_iter().enumerate() {
        let at = t0 + Duration::from_millis(i as u64);
        assert_eq!(session.on_event_at(on(pitch), at), Ok(None));
    }
    assert!(session.is_pending());
    assert_eq!(session.label(), "N.C.");

    let update = session.poll(t0 + DEFAULT_DEBOUNCE).expect("window elapsed");
    assert_eq!(update.label(), "Cmaj");
    assert_eq!(session.current().map(|c| c.score), Some(1.0));
}

#[test]
fn invalid_event_is_reported_and_ignored() {
    let mut session = immediate();
    feed(&mut session, &[on(60), on(64), on(67)]);

    assert_eq!(
        session.on_event(on(130)),
        Err(ValidationError::PitchOutOfRange { pitch: 130 })
    );
    assert_eq!(session.sounding().len(), 3);
    assert_eq!(session.label(), "Cmaj");
}

#[test]
fn changes_reach_channel_sink() {
    let (tx, rx) = mpsc::channel();
    let mut session = RecognitionSession::builder()
        .debounce(Duration::ZERO)
        .min_notes(3)
        .sink(tx)
        .build();

    feed(&mut session, &[on(57), on(60), on(64)]);

    let update = rx.try_recv().expect("one update published");
    let chord = update.chord().expect("a chord");
    assert_eq!(chord.name, "Amin");
    assert!(rx.try_recv().is_err());
}

#[test]
fn changes_reach_closure_sink() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let mut session = RecognitionSession::builder()
        .debounce(Duration::ZERO)
        .min_notes(3)
        .sink(move |update: &ChordUpdate| {
            log.lock().expect("lock").push(update.label().to_string());
        })
        .build();

    let reported = feed(&mut session, &[on(60), on(64), on(67), off(60)]);

    assert_eq!(*seen.lock().expect("lock"), reported);
    assert_eq!(reported, vec!["Cmaj", "N.C."]);
}

#[test]
fn log_sink_accepts_updates() {
    let mut session = RecognitionSession::builder()
        .debounce(Duration::ZERO)
        .sink(LogSink)
        .build();

    assert_eq!(feed(&mut session, &[on(48), on(55)]), vec!["C5"]);
}

#[test]
fn reset_forgets_everything() {
    let mut session = immediate();
    feed(&mut session, &[on(60), on(64), on(67)]);

    session.reset();

    assert_eq!(session.label(), "N.C.");
    assert!(session.history().is_empty());
    assert!(session.sounding().is_empty());
    assert!(session.current().is_none());
    assert_eq!(feed(&mut session, &[on(60), on(63), on(67)]), vec!["Cmin"]);
}
