//! Property-based tests for the tracker, matcher and session using proptest.

use midi_chord::{
    ChordMatcher, GenreMode, NoteEvent, NoteStateTracker, Pitch, RecognitionSession,
};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::time::Duration;

// ============================================================================
// Strategies
// ============================================================================

fn pitch_set(max: u8, size: std::ops::Range<usize>) -> impl Strategy<Value = Vec<Pitch>> {
    prop::collection::btree_set(0u8..=max, size).prop_map(|set| {
        set.into_iter()
            .filter_map(Pitch::new)
            .collect::<Vec<_>>()
    })
}

/// Events over a narrow range of pitches so that keys collide often.
fn event() -> impl Strategy<Value = NoteEvent> {
    prop_oneof![
        (58u8..66, 0u8..=127).prop_map(|(pitch, velocity)| NoteEvent::NoteOn { pitch, velocity }),
        (58u8..66).prop_map(|pitch| NoteEvent::NoteOff { pitch }),
        any::<bool>().prop_map(|down| NoteEvent::SustainPedal { down }),
    ]
}

fn genre() -> impl Strategy<Value = GenreMode> {
    prop_oneof![Just(GenreMode::Standard), Just(GenreMode::Jazz)]
}

/// Reference model of key and pedal state.
#[derive(Default)]
struct Model {
    held: BTreeSet<u8>,
    pedal_only: BTreeSet<u8>,
    sustain: bool,
}

impl Model {
    fn sounding(&self) -> Vec<u8> {
        self.held.union(&self.pedal_only).copied().collect()
    }

    fn apply(&mut self, event: NoteEvent) {
        match event {
            NoteEvent::NoteOn { pitch, velocity } if velocity > 0 => {
                self.held.insert(pitch);
                self.pedal_only.remove(&pitch);
            }
            NoteEvent::NoteOn { pitch, .. } | NoteEvent::NoteOff { pitch } => {
                if self.held.remove(&pitch) && self.sustain {
                    self.pedal_only.insert(pitch);
                } else if !self.sustain {
                    self.pedal_only.remove(&pitch);
                }
            }
            NoteEvent::SustainPedal { down } => {
                self.sustain = down;
                if !down {
                    self.pedal_only.clear();
                }
            }
        }
    }
}

// ============================================================================
// Matcher
// ============================================================================

proptest! {
    /// Too few distinct pitches never match.
    #[test]
    fn below_min_notes_is_no_match(
        pitches in pitch_set(127, 0..6),
        extra in 1usize..6,
    ) {
        let min_notes = pitches.len() + extra;
        prop_assert!(ChordMatcher::new().recognize(&pitches, min_notes, &[]).is_none());
    }

    /// Accepted results carry a score between the threshold and 1.
    #[test]
    fn accepted_scores_are_bounded(
        pitches in pitch_set(127, 1..9),
        genre in genre(),
    ) {
        let matcher = ChordMatcher::builder().genre(genre).build();
        if let Some(chord) = matcher.recognize(&pitches, 1, &[]) {
            prop_assert!(chord.score <= 1.0, "score {} for {:?}", chord.score, pitches);
            prop_assert!(chord.score >= matcher.threshold());
            prop_assert_eq!(chord.bass_pitch, pitches[0]);
        }
    }

    /// Moving every pitch by the same interval keeps the best score.
    #[test]
    fn best_score_is_transposition_invariant(
        pitches in pitch_set(100, 2..7),
        shift in 0u8..=27,
    ) {
        let matcher = ChordMatcher::new();
        let moved: Vec<Pitch> = pitches
            .iter()
            .filter_map(|p| Pitch::new(p.value() + shift))
            .collect();

        let before = matcher.recognize(&pitches, 2, &[]).map(|c| c.score);
        let after = matcher.recognize(&moved, 2, &[]).map(|c| c.score);
        prop_assert_eq!(before, after);
    }

    /// Order and repetition of the input pitches do not matter.
    #[test]
    fn input_order_is_irrelevant(pitches in pitch_set(127, 2..7)) {
        let matcher = ChordMatcher::new();
        let mut shuffled: Vec<Pitch> = pitches.iter().rev().copied().collect();
        shuffled.extend_from_slice(&pitches);

        prop_assert_eq!(
            matcher.recognize(&pitches, 2, &[]),
            matcher.recognize(&shuffled, 2, &[])
        );
    }
}

// ============================================================================
// Tracker
// ============================================================================

proptest! {
    /// The tracker agrees with a set-based model and reports changes exactly
    /// when the sounding set differs.
    #[test]
    fn tracker_matches_model(events in prop::collection::vec(event(), 0..64)) {
        let mut tracker = NoteStateTracker::new();
        let mut model = Model::default();

        for event in events {
            let before = model.sounding();
            model.apply(event);
            let changed = tracker.apply(event).expect("events are in range");

            let sounding: Vec<u8> = tracker.sounding_pitches().iter().map(|p| p.value()).collect();
            prop_assert_eq!(&sounding, &model.sounding(), "after {:?}", event);
            prop_assert_eq!(changed, before != sounding, "after {:?}", event);
            prop_assert_eq!(tracker.sounding_count(), sounding.len());
        }
    }

    /// A repeated note-on never signals a change.
    #[test]
    fn repeated_note_on_is_idempotent(
        events in prop::collection::vec(event(), 0..32),
        pitch in 58u8..66,
        velocity in 1u8..=127,
    ) {
        let mut tracker = NoteStateTracker::new();
        for event in events {
            tracker.apply(event).expect("events are in range");
        }

        let strike = NoteEvent::NoteOn { pitch, velocity };
        tracker.apply(strike).expect("in range");
        prop_assert_eq!(tracker.apply(strike), Ok(false));
    }
}

// ============================================================================
// Session
// ============================================================================

proptest! {
    /// History stays within its cap and every reported label is new.
    #[test]
    fn session_reports_distinct_labels(
        events in prop::collection::vec(event(), 0..64),
        history_len in 0usize..5,
    ) {
        let mut session = RecognitionSession::builder()
            .debounce(Duration::ZERO)
            .history_len(history_len)
            .build();
        let mut last = String::from("N.C.");

        for event in events {
            if let Some(update) = session.on_event(event).expect("events are in range") {
                prop_assert_ne!(update.label(), last.as_str());
                last = update.label().to_string();
            }
            prop_assert!(session.history().len() <= history_len);
            prop_assert_eq!(session.label(), last.as_str());
        }
    }
}
