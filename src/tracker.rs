//! Note State Tracker
//!
//! Turns a stream of note-on, note-off and sustain-pedal events into the set
//! of pitches currently sounding, keeping track of which notes are held by a
//! key and which only by the pedal.

use crate::pitch::{Pitch, MAX_PITCH};
use serde::Serialize;
use thiserror::Error;

/// Controller number of the sustain (damper) pedal.
pub const SUSTAIN_CONTROLLER: u8 = 64;

const NUM_PITCHES: usize = MAX_PITCH as usize + 1;

/// Errors for events carrying values outside the MIDI data range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Note number above 127.
    #[error("note number {pitch} outside 0..=127")]
    PitchOutOfRange {
        /// The rejected note number.
        pitch: u8,
    },

    /// Velocity above 127.
    #[error("velocity {velocity} for note {pitch} outside 0..=127")]
    VelocityOutOfRange {
        /// Note number the velocity belonged to.
        pitch: u8,
        /// The rejected velocity.
        velocity: u8,
    },
}

/// A decoded performance event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteEvent {
    /// Key pressed. Velocity 0 is treated as a release.
    NoteOn {
        /// MIDI note number
        pitch: u8,
        /// Strike velocity
        velocity: u8,
    },
    /// Key released.
    NoteOff {
        /// MIDI note number
        pitch: u8,
    },
    /// Sustain pedal pressed (`true`) or lifted (`false`).
    SustainPedal {
        /// Pedal position
        down: bool,
    },
}

impl NoteEvent {
    /// Decode a raw channel-voice MIDI message.
    ///
    /// Recognizes note-on (`0x9n`), note-off (`0x8n`) and the sustain
    /// controller (`0xBn`, controller 64, down when the value is 64 or more).
    /// Anything else, including truncated messages, yields `None`. Data bytes
    /// are passed through unmasked so out-of-range values are reported by the
    /// tracker rather than silently wrapped.
    pub fn from_midi(bytes: &[u8]) -> Option<NoteEvent> {
        let [status, data1, data2, ..] = *bytes else {
            return None;
        };
        match status & 0xF0 {
            0x90 => Some(NoteEvent::NoteOn {
                pitch: data1,
                velocity: data2,
            }),
            0x80 => Some(NoteEvent::NoteOff { pitch: data1 }),
            0xB0 if data1 == SUSTAIN_CONTROLLER => Some(NoteEvent::SustainPedal {
                down: data2 >= 64,
            }),
            _ => None,
        }
    }
}

/// Why a pitch is (or is not) sounding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum NoteState {
    /// Not sounding.
    #[default]
    Silent,
    /// Key is held down.
    SoundingByKey,
    /// Key released while the pedal is down.
    SoundingByPedalOnly,
}

impl NoteState {
    /// Held by key or by pedal.
    pub const fn is_sounding(self) -> bool {
        !matches!(self, NoteState::Silent)
    }
}

/// Per-pitch note state plus the sustain pedal position.
///
/// Each pitch is in exactly one [`NoteState`], so a pitch can never appear
/// twice in the sounding set.
#[derive(Debug, Clone)]
pub struct NoteStateTracker {
    states: [NoteState; NUM_PITCHES],
    sustain: bool,
    sounding: usize,
}

impl NoteStateTracker {
    /// All pitches silent, pedal up.
    pub fn new() -> Self {
        NoteStateTracker {
            states: [NoteState::Silent; NUM_PITCHES],
            sustain: false,
            sounding: 0,
        }
    }

    /// Apply one event.
    ///
    /// Returns `Ok(true)` iff the set of sounding pitches differs afterwards.
    /// Out-of-range values return `Err` and leave the state untouched.
    pub fn apply(&mut self, event: NoteEvent) -> Result<bool, ValidationError> {
        match event {
            NoteEvent::NoteOn { pitch, velocity } => {
                let p = validate_pitch(pitch)?;
                if velocity > MAX_PITCH {
                    return Err(ValidationError::VelocityOutOfRange { pitch, velocity });
                }
                if velocity == 0 {
                    Ok(self.note_off(p))
                } else {
                    Ok(self.note_on(p, velocity))
                }
            }
            NoteEvent::NoteOff { pitch } => Ok(self.note_off(validate_pitch(pitch)?)),
            NoteEvent::SustainPedal { down } => Ok(self.pedal(down)),
        }
    }

    fn note_on(&mut self, pitch: Pitch, velocity: u8) -> bool {
        let previous = self.set(pitch, NoteState::SoundingByKey);
        log::debug!(
            target: "tracker",
            "note on {} vel {} ({:?} -> held) | sounding: {}",
            pitch.value(),
            velocity,
            previous,
            self.sounding
        );
        !previous.is_sounding()
    }

    fn note_off(&mut self, pitch: Pitch) -> bool {
        let previous = self.state(pitch);
        if !previous.is_sounding() {
            return false;
        }
        if self.sustain {
            self.set(pitch, NoteState::SoundingByPedalOnly);
            log::debug!(target: "tracker", "note off {} (sustained)", pitch.value());
            false
        } else {
            self.set(pitch, NoteState::Silent);
            log::debug!(
                target: "tracker",
                "note off {} | sounding: {}",
                pitch.value(),
                self.sounding
            );
            true
        }
    }

    fn pedal(&mut self, down: bool) -> bool {
        let was_down = std::mem::replace(&mut self.sustain, down);
        match (was_down, down) {
            (false, true) => {
                log::debug!(target: "tracker", "sustain pedal down | sounding: {}", self.sounding);
                return false;
            }
            (true, false) => {}
            _ => return false,
        }

        let before = self.sounding;
        for state in self.states.iter_mut() {
            if *state == NoteState::SoundingByPedalOnly {
                *state = NoteState::Silent;
            }
        }
        self.sounding = self.states.iter().filter(|s| s.is_sounding()).count();
        log::debug!(
            target: "tracker",
            "sustain pedal up, released {} | sounding: {}",
            before - self.sounding,
            self.sounding
        );
        self.sounding != before
    }

    fn set(&mut self, pitch: Pitch, state: NoteState) -> NoteState {
        let slot = &mut self.states[pitch.value() as usize];
        let previous = std::mem::replace(slot, state);
        match (previous.is_sounding(), state.is_sounding()) {
            (false, true) => self.sounding += 1,
            (true, false) => self.sounding -= 1,
            _ => {}
        }
        previous
    }

    /// Current state of `pitch`.
    pub fn state(&self, pitch: Pitch) -> NoteState {
        self.states[pitch.value() as usize]
    }

    /// Whether the sustain pedal is down.
    pub fn is_sustained(&self) -> bool {
        self.sustain
    }

    /// Number of sounding pitches.
    pub fn sounding_count(&self) -> usize {
        self.sounding
    }

    /// Snapshot of every sounding pitch, ascending.
    pub fn sounding_pitches(&self) -> Vec<Pitch> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_sounding())
            .filter_map(|(i, _)| Pitch::new(i as u8))
            .collect()
    }

    /// Silence every pitch and lift the pedal.
    pub fn reset(&mut self) {
        self.states = [NoteState::Silent; NUM_PITCHES];
        self.sustain = false;
        self.sounding = 0;
    }
}

impl Default for NoteStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_pitch(pitch: u8) -> Result<Pitch, ValidationError> {
    Pitch::new(pitch).ok_or(ValidationError::PitchOutOfRange { pitch })
}
