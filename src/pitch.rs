//! Pitch primitives
//!
//! MIDI note numbers, the twelve pitch classes they reduce to, and a compact
//! bitmask for sets of intervals measured from a root.

use serde::{Serialize, Serializer};
use std::fmt::{self, Display};

/// Number of pitch classes in an octave
pub const SEMITONES: u8 = 12;

/// Highest valid MIDI note number
pub const MAX_PITCH: u8 = 127;

const NOTE_NAMES: [&str; SEMITONES as usize] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

const INTERVAL_NAMES: [&str; SEMITONES as usize] = [
    "R", "b2", "2", "b3", "3", "4", "b5/#4", "5", "#5/b6", "6", "b7", "M7",
];

const EXTENDED_INTERVAL_NAMES: [&str; SEMITONES as usize] = [
    "R", "b9", "9", "m3/#9", "M3", "11/P4", "#11/b5", "P5", "#5/b13", "13/M6", "m7", "M7",
];

/// A MIDI note number in `0..=127`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Pitch(u8);

impl Pitch {
    /// Wrap a raw note number, returning `None` above [`MAX_PITCH`].
    pub const fn new(value: u8) -> Option<Pitch> {
        if value <= MAX_PITCH {
            Some(Pitch(value))
        } else {
            None
        }
    }

    /// The raw MIDI note number.
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Pitch class `0..12`, C = 0.
    pub const fn pitch_class(self) -> u8 {
        self.0 % SEMITONES
    }

    /// Name of this pitch's pitch class.
    pub const fn note_name(self) -> NoteName {
        NoteName::from_pitch_class(self.pitch_class())
    }

    /// Octave number in scientific pitch notation (middle C = 60 = C4).
    pub const fn octave(self) -> i8 {
        (self.0 / SEMITONES) as i8 - 1
    }
}

impl Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.note_name(), self.octave())
    }
}

/// Twelve chromatic pitch classes
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NoteName {
    /// C
    C,
    /// C sharp / D flat
    Cs,
    /// D
    D,
    /// D sharp / E flat
    Ds,
    /// E
    E,
    /// F
    F,
    /// F sharp / G flat
    Fs,
    /// G
    G,
    /// G sharp / A flat
    Gs,
    /// A
    A,
    /// A sharp / B flat
    As,
    /// B
    B,
}

impl NoteName {
    /// Map a pitch class to its name. Values are reduced modulo 12.
    pub const fn from_pitch_class(pc: u8) -> NoteName {
        match pc % SEMITONES {
            0 => NoteName::C,
            1 => NoteName::Cs,
            2 => NoteName::D,
            3 => NoteName::Ds,
            4 => NoteName::E,
            5 => NoteName::F,
            6 => NoteName::Fs,
            7 => NoteName::G,
            8 => NoteName::Gs,
            9 => NoteName::A,
            10 => NoteName::As,
            _ => NoteName::B,
        }
    }

    /// Pitch class `0..12` of this name.
    pub const fn pitch_class(self) -> u8 {
        self as u8
    }

    /// Sharp spelling, e.g. `"C#"`.
    pub const fn as_str(self) -> &'static str {
        NOTE_NAMES[self as usize]
    }
}

impl Display for NoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NoteName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Short label for an interval above a root, e.g. `b3` or `5`.
pub fn interval_name(offset: u8) -> &'static str {
    INTERVAL_NAMES[(offset % SEMITONES) as usize]
}

/// Label for an interval read as an extension, e.g. `b9` or `13/M6`.
pub fn extended_interval_name(offset: u8) -> &'static str {
    EXTENDED_INTERVAL_NAMES[(offset % SEMITONES) as usize]
}

/// Set of pitch-class offsets stored as a 12-bit mask.
///
/// Bit `i` is set when offset `i` (semitones above an implicit root) is a
/// member. Iteration is always ascending.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct IntervalSet(u16);

impl IntervalSet {
    const MASK: u16 = (1 << SEMITONES) - 1;

    /// The empty set.
    pub const EMPTY: IntervalSet = IntervalSet(0);

    /// Build from offsets, reducing each modulo 12.
    pub fn from_offsets<I: IntoIterator<Item = u8>>(offsets: I) -> Self {
        let mut set = Self::EMPTY;
        for offset in offsets {
            set.insert(offset);
        }
        set
    }

    /// Pitch classes of the given pitches.
    pub fn from_pitches(pitches: &[Pitch]) -> Self {
        Self::from_offsets(pitches.iter().map(|p| p.pitch_class()))
    }

    /// Add an offset (reduced modulo 12).
    pub fn insert(&mut self, offset: u8) {
        self.0 |= 1 << (offset % SEMITONES);
    }

    /// Whether `offset` is a member.
    pub const fn contains(self, offset: u8) -> bool {
        offset < SEMITONES && self.0 & (1 << offset) != 0
    }

    /// Number of members.
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// True when no offset is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Members present in either set.
    pub const fn union(self, other: IntervalSet) -> IntervalSet {
        IntervalSet(self.0 | other.0)
    }

    /// Members present in both sets.
    pub const fn intersection(self, other: IntervalSet) -> IntervalSet {
        IntervalSet(self.0 & other.0)
    }

    /// Members of `self` missing from `other`.
    pub const fn difference(self, other: IntervalSet) -> IntervalSet {
        IntervalSet(self.0 & !other.0)
    }

    /// True if every member of `self` is in `other`.
    pub const fn is_subset(self, other: IntervalSet) -> bool {
        self.0 & !other.0 == 0
    }

    /// Re-express the members relative to a new root `semitones` above C.
    pub const fn relative_to(self, root: u8) -> IntervalSet {
        let n = (root % SEMITONES) as u32;
        let rotated = (self.0 >> n) | (self.0 << (SEMITONES as u32 - n));
        IntervalSet(rotated & Self::MASK)
    }

    /// Zero-based rank of `offset` in ascending order, if present.
    pub fn position(self, offset: u8) -> Option<usize> {
        self.iter().position(|o| o == offset)
    }

    /// Members in ascending order.
    pub fn iter(self) -> impl Iterator<Item = u8> {
        (0..SEMITONES).filter(move |&o| self.contains(o))
    }

    /// Members collected into a sorted vector.
    pub fn to_vec(self) -> Vec<u8> {
        self.iter().collect()
    }
}

impl FromIterator<u8> for IntervalSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        Self::from_offsets(iter)
    }
}
