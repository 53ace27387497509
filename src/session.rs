//! Recognition Session
//!
//! Drives a [`NoteStateTracker`] and a [`ChordMatcher`] from one ordered
//! event stream, keeps a short history of recognized chords for contextual
//! scoring, and reports label changes to the caller and an optional sink.

use crate::matcher::{ChordMatcher, ChordResult};
use crate::pitch::{NoteName, Pitch};
use crate::tracker::{NoteEvent, NoteStateTracker, ValidationError};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

/// Default minimum number of distinct pitches before recognition is tried.
pub const DEFAULT_MIN_NOTES: usize = 2;

/// Default quiet window after a recognition. Changes inside it wait for
/// [`RecognitionSession::poll`].
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(15);

/// Default number of past chords kept for context.
pub const DEFAULT_HISTORY_LEN: usize = 4;

/// Label reported when nothing is recognized.
pub const NO_CHORD: &str = "N.C.";

/// Outcome of a recognition cycle whose label differs from the previous one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChordUpdate {
    /// A chord was recognized.
    Chord(ChordResult),
    /// Nothing reached the threshold, or too few notes sound.
    NoChord {
        /// Sounding pitches, ascending.
        pitches: Vec<Pitch>,
        /// Pitch class of the lowest sounding pitch, if any.
        bass: Option<NoteName>,
    },
}

impl ChordUpdate {
    /// Chord name, or `"N.C."`.
    pub fn label(&self) -> &str {
        match self {
            ChordUpdate::Chord(chord) => &chord.name,
            ChordUpdate::NoChord { .. } => NO_CHORD,
        }
    }

    /// The recognized chord, if any.
    pub fn chord(&self) -> Option<&ChordResult> {
        match self {
            ChordUpdate::Chord(chord) => Some(chord),
            ChordUpdate::NoChord { .. } => None,
        }
    }

    /// Sounding pitches at the time of the update.
    pub fn pitches(&self) -> &[Pitch] {
        match self {
            ChordUpdate::Chord(chord) => &chord.pitches,
            ChordUpdate::NoChord { pitches, .. } => pitches,
        }
    }
}

impl fmt::Display for ChordUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Destination for chord changes.
pub trait ResultSink {
    /// Called once per label change, after the session state is updated.
    fn publish(&mut self, update: &ChordUpdate);
}

impl<F: FnMut(&ChordUpdate)> ResultSink for F {
    fn publish(&mut self, update: &ChordUpdate) {
        self(update)
    }
}

impl ResultSink for Sender<ChordUpdate> {
    fn publish(&mut self, update: &ChordUpdate) {
        if self.send(update.clone()).is_err() {
            log::debug!(target: "session", "result receiver dropped, update {} discarded", update);
        }
    }
}

/// Sink that logs every change at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn publish(&mut self, update: &ChordUpdate) {
        let notes = update
            .pitches()
            .iter()
            .map(Pitch::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        match update {
            ChordUpdate::Chord(chord) => log::info!(
                target: "session",
                "Chord: {} ({}), Score: {:.2}, Notes: [{}]",
                chord.name,
                chord.inversion,
                chord.score,
                notes
            ),
            ChordUpdate::NoChord { .. } => {
                log::info!(target: "session", "Chord: {}, Notes: [{}]", NO_CHORD, notes)
            }
        }
    }
}

/// Builder for [`RecognitionSession`]
pub struct RecognitionSessionBuilder {
    matcher: Option<ChordMatcher>,
    min_notes: usize,
    debounce: Duration,
    history_len: usize,
    sink: Option<Box<dyn ResultSink + Send>>,
}

impl RecognitionSessionBuilder {
    /// Built-in matcher, two notes minimum, 15 ms debounce, four chords of
    /// history, no sink.
    pub fn new() -> Self {
        RecognitionSessionBuilder {
            matcher: None,
            min_notes: DEFAULT_MIN_NOTES,
            debounce: DEFAULT_DEBOUNCE,
            history_len: DEFAULT_HISTORY_LEN,
            sink: None,
        }
    }

    /// Use a preconfigured matcher.
    pub fn matcher(mut self, matcher: ChordMatcher) -> Self {
        self.matcher = Some(matcher);
        self
    }

    /// Minimum distinct pitches for recognition.
    pub fn min_notes(mut self, n: usize) -> Self {
        self.min_notes = n;
        self
    }

    /// Quiet window after a recognition; `Duration::ZERO` disables it.
    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    /// Number of past chords kept for context.
    pub fn history_len(mut self, len: usize) -> Self {
        self.history_len = len;
        self
    }

    /// Where chord changes are published.
    pub fn sink(mut self, sink: impl ResultSink + Send + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Build the `RecognitionSession`
    pub fn build(self) -> RecognitionSession {
        RecognitionSession {
            tracker: NoteStateTracker::new(),
            matcher: self.matcher.unwrap_or_default(),
            min_notes: self.min_notes,
            debounce: self.debounce,
            history: VecDeque::with_capacity(self.history_len),
            history_len: self.history_len,
            label: NO_CHORD.to_string(),
            current: None,
            last_recognition: None,
            pending: false,
            sink: self.sink,
        }
    }
}

impl Default for RecognitionSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// One performer's event stream turned into chord changes.
///
/// With a non-zero debounce window (15 ms by default) only the first change
/// in a burst is recognized straight away; the rest of a block chord is
/// deferred. Hosts must call [`poll`](Self::poll) regularly, e.g. from their
/// event loop, or build the session with `debounce(Duration::ZERO)`.
///
/// Not meant to be shared between threads while in use; run one session per
/// input and feed it events in arrival order.
pub struct RecognitionSession {
    tracker: NoteStateTracker,
    matcher: ChordMatcher,
    min_notes: usize,
    debounce: Duration,
    history: VecDeque<ChordResult>,
    history_len: usize,
    label: String,
    current: Option<ChordResult>,
    last_recognition: Option<Instant>,
    pending: bool,
    sink: Option<Box<dyn ResultSink + Send>>,
}

impl RecognitionSession {
    /// Return a builder to customize the session
    pub fn builder() -> RecognitionSessionBuilder {
        RecognitionSessionBuilder::new()
    }

    /// Session with default settings
    pub fn new() -> Self {
        RecognitionSessionBuilder::new().build()
    }

    /// Apply `event` now. See [`on_event_at`](Self::on_event_at).
    pub fn on_event(&mut self, event: NoteEvent) -> Result<Option<ChordUpdate>, ValidationError> {
        self.on_event_at(event, Instant::now())
    }

    /// Apply `event` at time `now`.
    ///
    /// Returns `Some` only when the sounding set changed, a recognition ran
    /// and its label differs from the previous one. A change inside the
    /// debounce window is deferred until [`poll`](Self::poll).
    pub fn on_event_at(
        &mut self,
        event: NoteEvent,
        now: Instant,
    ) -> Result<Option<ChordUpdate>, ValidationError> {
        let changed = match self.tracker.apply(event) {
            Ok(changed) => changed,
            Err(err) => {
                log::warn!(target: "session", "rejected {:?}: {}", event, err);
                return Err(err);
            }
        };
        if !changed {
            return Ok(None);
        }
        if self.within_debounce(now) {
            self.pending = true;
            log::trace!(target: "session", "change deferred by debounce window");
            return Ok(None);
        }
        Ok(self.recognize(now))
    }

    /// Run a deferred recognition once the debounce window has passed.
    pub fn poll(&mut self, now: Instant) -> Option<ChordUpdate> {
        if !self.pending || self.within_debounce(now) {
            return None;
        }
        self.recognize(now)
    }

    /// True while a change is waiting for the debounce window to close.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    fn within_debounce(&self, now: Instant) -> bool {
        match self.last_recognition {
            Some(at) => now.saturating_duration_since(at) < self.debounce,
            None => false,
        }
    }

    fn recognize(&mut self, now: Instant) -> Option<ChordUpdate> {
        self.pending = false;
        self.last_recognition = Some(now);

        let sounding = self.tracker.sounding_pitches();
        let result = self
            .matcher
            .recognize(&sounding, self.min_notes, self.history.make_contiguous());
        let update = match result {
            Some(chord) => ChordUpdate::Chord(chord),
            None => ChordUpdate::NoChord {
                bass: sounding.first().map(|p| p.note_name()),
                pitches: sounding,
            },
        };
        if update.label() == self.label {
            return None;
        }

        log::info!(target: "session", "chord change: {} -> {}", self.label, update.label());
        self.label = update.label().to_string();
        self.current = update.chord().cloned();
        if let Some(chord) = &self.current {
            self.history.push_back(chord.clone());
            while self.history.len() > self.history_len {
                self.history.pop_front();
            }
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.publish(&update);
        }
        Some(update)
    }

    /// Most recently reported chord, `None` after a change to no chord.
    pub fn current(&self) -> Option<&ChordResult> {
        self.current.as_ref()
    }

    /// Most recently reported label, `"N.C."` initially.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Recognized chords, oldest first.
    pub fn history(&self) -> &VecDeque<ChordResult> {
        &self.history
    }

    /// Pitches sounding right now, ascending.
    pub fn sounding(&self) -> Vec<Pitch> {
        self.tracker.sounding_pitches()
    }

    /// Underlying note tracker.
    pub fn tracker(&self) -> &NoteStateTracker {
        &self.tracker
    }

    /// Matcher in use.
    pub fn matcher(&self) -> &ChordMatcher {
        &self.matcher
    }

    /// Silence all notes and forget history. Nothing is published.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.history.clear();
        self.label = NO_CHORD.to_string();
        self.current = None;
        self.last_recognition = None;
        self.pending = false;
    }
}

impl Default for RecognitionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecognitionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecognitionSession")
            .field("label", &self.label)
            .field("sounding", &self.tracker.sounding_count())
            .field("history", &self.history.len())
            .field("min_notes", &self.min_notes)
            .field("debounce", &self.debounce)
            .field("pending", &self.pending)
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}
