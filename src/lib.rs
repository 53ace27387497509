//! # midi_chord
//!
//! Real-time chord recognition from MIDI performance events: track which
//! notes sound (keys and sustain pedal), match them against chord templates
//! and report chord changes as they happen.
//!
//! ## Example
//! ```rust
//! use midi_chord::{ChordUpdate, NoteEvent, RecognitionSession};
//! use std::time::Duration;
//!
//! fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     // 1) Build a session (no debounce, so every change is reported at once)
//!     let mut session = RecognitionSession::builder()
//!         .debounce(Duration::ZERO)
//!         .build();
//!
//!     // 2) Feed it events, decoded from raw MIDI or built by hand
//!     let mut last = None;
//!     for bytes in [[0x90, 64, 90], [0x90, 67, 90], [0x90, 72, 90]] {
//!         if let Some(event) = NoteEvent::from_midi(&bytes) {
//!             if let Some(update) = session.on_event(event)? {
//!                 last = Some(update);
//!             }
//!         }
//!     }
//!
//!     // 3) E G C reads as C major over E
//!     if let Some(ChordUpdate::Chord(chord)) = last {
//!         assert_eq!(chord.name, "Cmaj/E");
//!         println!("{} ({}), score {:.2}", chord.name, chord.inversion, chord.score);
//!     }
//!
//!     Ok(())
//! }
//! # run().unwrap();
//! ```
//!
//! ## Logging
//! The crate logs through the `log` facade under the targets `templates`,
//! `tracker`, `matcher` and `session`. Install any logger to see them.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rust_2018_idioms)]
#![deny(clippy::all)]

/// Chord matching against a template table.
pub use matcher::{
    ChordMatcher, ChordMatcherBuilder, ChordResult, GenreMode, Inversion, Voicing,
    ACCEPTANCE_THRESHOLD,
};

/// Pitches, pitch classes and interval sets.
pub use pitch::{IntervalSet, NoteName, Pitch};

/// Event-driven recognition.
pub use session::{
    ChordUpdate, LogSink, RecognitionSession, RecognitionSessionBuilder, ResultSink,
};

/// Chord templates and their loading.
pub use templates::{
    ChordFamily, ChordTemplate, ConfigError, IntervalWeights, ParsedTable, TemplateShape,
    TemplateTable,
};

/// Sounding-note tracking.
pub use tracker::{NoteEvent, NoteState, NoteStateTracker, ValidationError};

/// Chord matching module.
pub mod matcher;

/// Pitch primitives module.
pub mod pitch;

/// Recognition session module.
pub mod session;

/// Chord template module.
pub mod templates;

/// Note tracking module.
pub mod tracker;
