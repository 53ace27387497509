//! Chord templates
//!
//! Named interval patterns the matcher scores played pitch classes against,
//! the consonance-weight vocabulary shared by every template, and loading of
//! template tables from JSON with per-entry rejection.

use crate::pitch::{IntervalSet, SEMITONES};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Built-in chord definitions in definition order:
/// (identifier, display name, core offsets, optional offsets).
///
/// `None` for the optional offsets marks a flat template, scored by set
/// overlap. `Some` marks a core/optional template, scored by weight.
const BUILTIN: &[(&str, &str, &[u8], Option<&[u8]>)] = &[
    // power chord and triads
    ("5", "Power Chord", &[0, 7], None),
    ("maj", "Major Triad", &[0, 4, 7], None),
    ("min", "Minor Triad", &[0, 3, 7], None),
    ("dim", "Diminished Triad", &[0, 3, 6], None),
    ("aug", "Augmented Triad", &[0, 4, 8], None),
    ("sus2", "Suspended 2nd", &[0, 2, 7], None),
    ("sus4", "Suspended 4th", &[0, 5, 7], None),
    ("majb5", "Major Flat 5", &[0, 4, 6], None),
    // major
    ("add4", "Major Add 4", &[0, 4, 5, 7], None),
    ("add9", "Major Add 9", &[0, 2, 4, 7], None),
    ("6", "Major Sixth", &[0, 4, 7, 9], None),
    ("6/9", "Major Six Nine", &[0, 2, 4, 7, 9], None),
    ("maj7", "Major 7th", &[0, 4, 7, 11], None),
    ("maj9", "Major 9th", &[0, 2, 4, 7, 11], None),
    ("maj7#11", "Major 7th Sharp 11th", &[0, 4, 6, 7, 11], None),
    ("maj11", "Major 11th", &[0, 2, 4, 5, 7, 11], None),
    ("maj13", "Major 13th", &[0, 2, 4, 5, 7, 9, 11], None),
    // minor
    ("madd4", "Minor Add 4", &[0, 3, 5, 7], None),
    ("madd9", "Minor Add 9", &[0, 2, 3, 7], None),
    ("min6", "Minor Sixth", &[0, 3, 7, 9], None),
    ("m6/9", "Minor Six Nine", &[0, 2, 3, 7, 9], None),
    ("min7", "Minor 7th", &[0, 3, 7, 10], None),
    ("min9", "Minor 9th", &[0, 2, 3, 7, 10], None),
    ("min11", "Minor 11th", &[0, 2, 3, 5, 7, 10], None),
    ("min13", "Minor 13th", &[0, 2, 3, 5, 7, 9, 10], None),
    ("minMaj7", "Minor Major 7th", &[0, 3, 7, 11], None),
    ("minMaj9", "Minor Major 9th", &[0, 2, 3, 7, 11], None),
    ("min7b5", "Half-Diminished 7th", &[0, 3, 6, 10], None),
    ("dim7", "Diminished 7th", &[0, 3, 6, 9], None),
    // suspended sevenths
    ("7sus4", "Dominant 7th Suspended 4th", &[0, 5, 7, 10], None),
    ("9sus4", "Dominant 9th Suspended 4th", &[0, 2, 5, 7, 10], None),
    // dominant
    ("7", "Dominant 7th", &[0, 4, 10], Some(&[7])),
    ("9", "Dominant 9th", &[0, 2, 4, 10], Some(&[7])),
    ("11", "Dominant 11th", &[0, 4, 5, 10], Some(&[2, 7])),
    ("13", "Dominant 13th", &[0, 4, 9, 10], Some(&[2, 7])),
    // altered dominant
    ("7b5", "Dominant 7th Flat 5", &[0, 4, 6, 10], Some(&[])),
    ("7#5", "Dominant 7th Sharp 5", &[0, 4, 8, 10], Some(&[])),
    ("7b9", "Dominant 7th Flat 9", &[0, 1, 4, 10], Some(&[7])),
    ("7#9", "Dominant 7th Sharp 9", &[0, 3, 4, 10], Some(&[7])),
];

/// Errors raised while building or loading chord templates.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document was not valid JSON.
    #[error("invalid template document: {0}")]
    Parse(#[from] serde_json::Error),

    /// A template file could not be read.
    #[error("could not read `{}`: {source}", path.display())]
    Io {
        /// The file that failed to load.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The top level of the document was not an object of templates.
    #[error("template document must be an object keyed by chord identifier")]
    NotAnObject,

    /// A template entry was not an object.
    #[error("template `{id}`: entry must be an object")]
    MalformedEntry {
        /// Identifier of the rejected template.
        id: String,
    },

    /// A template had no usable display name.
    #[error("template `{id}`: missing `name`")]
    MissingName {
        /// Identifier of the rejected template.
        id: String,
    },

    /// A template had neither `intervals` nor `core`.
    #[error("template `{id}`: missing `intervals` or `core`")]
    MissingIntervals {
        /// Identifier of the rejected template.
        id: String,
    },

    /// An offset list held something other than integers.
    #[error("template `{id}`: offsets must be integers, got {value}")]
    InvalidOffset {
        /// Identifier of the rejected template.
        id: String,
        /// The offending JSON value, rendered.
        value: String,
    },

    /// An offset fell outside `0..12`.
    #[error("template `{id}`: offset {offset} outside 0..=11")]
    OffsetOutOfRange {
        /// Identifier of the rejected template.
        id: String,
        /// The offending offset.
        offset: i64,
    },

    /// An offset was listed twice.
    #[error("template `{id}`: offset {offset} listed more than once")]
    DuplicateOffset {
        /// Identifier of the rejected template.
        id: String,
        /// The repeated offset.
        offset: u8,
    },

    /// An offset was both core and optional.
    #[error("template `{id}`: offset {offset} is both core and optional")]
    OverlappingOffset {
        /// Identifier of the rejected template.
        id: String,
        /// The shared offset.
        offset: u8,
    },

    /// A consonance weight was negative or not finite.
    #[error("interval weight for offset {offset} must be finite and >= 0, got {weight}")]
    InvalidWeight {
        /// Offset whose weight was rejected.
        offset: u8,
        /// The rejected weight.
        weight: f32,
    },

    /// Every entry in the document was rejected.
    #[error("no valid chord templates found")]
    NoValidEntries,
}

/// How a template is scored against played intervals.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum TemplateShape {
    /// Every offset is required; scored by Jaccard overlap.
    Flat,
    /// Core offsets define the chord, optional offsets refine it; scored by
    /// consonance weight.
    Weighted,
}

/// Broad harmonic function of a chord type, derived from its offsets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ChordFamily {
    /// Major third, no minor seventh
    Major,
    /// Minor third, no minor seventh
    Minor,
    /// Major third and minor seventh
    Dominant,
    /// Dominant with a flat/sharp fifth or ninth
    AlteredDominant,
    /// Minor third, perfect fifth and minor seventh
    MinorSeventh,
    /// Minor third, flat fifth and minor seventh
    HalfDiminished,
    /// Minor third and flat fifth without a seventh of its own
    Diminished,
    /// Major third and sharp fifth
    Augmented,
    /// Second or fourth in place of the third
    Suspended,
    /// Root and fifth only
    Power,
    /// Anything else
    Other,
}

impl ChordFamily {
    /// Classify a set of defined offsets.
    pub fn classify(defined: IntervalSet) -> ChordFamily {
        let has = |o| defined.contains(o);
        if has(4) && has(10) {
            if [1, 3, 6, 8].into_iter().any(has) {
                ChordFamily::AlteredDominant
            } else {
                ChordFamily::Dominant
            }
        } else if has(3) && has(10) && !has(4) {
            if has(6) && !has(7) {
                ChordFamily::HalfDiminished
            } else {
                ChordFamily::MinorSeventh
            }
        } else if has(3) && has(6) && !has(7) && !has(4) {
            ChordFamily::Diminished
        } else if has(4) && has(8) && !has(7) {
            ChordFamily::Augmented
        } else if has(4) {
            ChordFamily::Major
        } else if has(3) {
            ChordFamily::Minor
        } else if has(7) && (has(2) || has(5)) {
            ChordFamily::Suspended
        } else if defined == IntervalSet::from_offsets([0, 7]) {
            ChordFamily::Power
        } else {
            ChordFamily::Other
        }
    }

    /// Dominant or altered dominant.
    pub const fn is_dominant(self) -> bool {
        matches!(self, ChordFamily::Dominant | ChordFamily::AlteredDominant)
    }

    /// Minor seventh or half-diminished, the usual "ii" of a ii-V.
    pub const fn is_minor_seventh(self) -> bool {
        matches!(self, ChordFamily::MinorSeventh | ChordFamily::HalfDiminished)
    }
}

/// A named chord type: its interval pattern relative to an implicit root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChordTemplate {
    id: String,
    name: String,
    shape: TemplateShape,
    core: IntervalSet,
    optional: IntervalSet,
    family: ChordFamily,
}

impl ChordTemplate {
    /// A template whose offsets are all required. The root (0) is implied.
    pub fn flat(
        id: impl Into<String>,
        name: impl Into<String>,
        offsets: &[u8],
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        let core = offset_set(&id, offsets)?;
        Self::checked(id, name.into(), TemplateShape::Flat, core, IntervalSet::EMPTY)
    }

    /// A template with required `core` offsets and bonus `optional` ones.
    /// The root (0) is implied as a core offset.
    pub fn weighted(
        id: impl Into<String>,
        name: impl Into<String>,
        core: &[u8],
        optional: &[u8],
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        let core = offset_set(&id, core)?;
        let optional = offset_set(&id, optional)?;
        Self::checked(id, name.into(), TemplateShape::Weighted, core, optional)
    }

    fn checked(
        id: String,
        name: String,
        shape: TemplateShape,
        mut core: IntervalSet,
        optional: IntervalSet,
    ) -> Result<Self, ConfigError> {
        if name.trim().is_empty() {
            return Err(ConfigError::MissingName { id });
        }
        core.insert(0);
        if let Some(offset) = core.intersection(optional).iter().next() {
            return Err(ConfigError::OverlappingOffset { id, offset });
        }
        Ok(Self::from_parts(id, name, shape, core, optional))
    }

    fn from_parts(
        id: String,
        name: String,
        shape: TemplateShape,
        core: IntervalSet,
        optional: IntervalSet,
    ) -> Self {
        let family = ChordFamily::classify(core.union(optional));
        ChordTemplate {
            id,
            name,
            shape,
            core,
            optional,
            family,
        }
    }

    /// Short identifier, appended to the root name (`"maj7"` in `Cmaj7`).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable description, e.g. `"Major 7th"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scoring scheme.
    pub fn shape(&self) -> TemplateShape {
        self.shape
    }

    /// Required offsets, always including the root.
    pub fn core(&self) -> IntervalSet {
        self.core
    }

    /// Bonus offsets. Empty for flat templates.
    pub fn optional(&self) -> IntervalSet {
        self.optional
    }

    /// Core and optional offsets together.
    pub fn defined(&self) -> IntervalSet {
        self.core.union(self.optional)
    }

    /// Harmonic family derived from the defined offsets.
    pub fn family(&self) -> ChordFamily {
        self.family
    }
}

fn offset_set(id: &str, offsets: &[u8]) -> Result<IntervalSet, ConfigError> {
    let mut set = IntervalSet::EMPTY;
    for &offset in offsets {
        if offset >= SEMITONES {
            return Err(ConfigError::OffsetOutOfRange {
                id: id.to_string(),
                offset: offset.into(),
            });
        }
        if set.contains(offset) {
            return Err(ConfigError::DuplicateOffset {
                id: id.to_string(),
                offset,
            });
        }
        set.insert(offset);
    }
    Ok(set)
}

/// Consonance weight of each interval above the root.
///
/// Weights belong to the interval vocabulary, not to individual templates:
/// every weighted template in a table is scored with the same values.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct IntervalWeights([f32; SEMITONES as usize]);

impl IntervalWeights {
    /// Every interval weighs 1.0.
    pub const UNIFORM: IntervalWeights = IntervalWeights([1.0; SEMITONES as usize]);

    /// Custom weights, indexed by offset. Rejects negative or non-finite values.
    pub fn new(weights: [f32; SEMITONES as usize]) -> Result<Self, ConfigError> {
        for (offset, &weight) in weights.iter().enumerate() {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    offset: offset as u8,
                    weight,
                });
            }
        }
        Ok(IntervalWeights(weights))
    }

    /// Weight of a single offset.
    pub fn weight(&self, offset: u8) -> f32 {
        self.0[(offset % SEMITONES) as usize]
    }

    /// Sum of the weights of every member of `set`.
    pub fn total(&self, set: IntervalSet) -> f32 {
        set.iter().map(|o| self.weight(o)).sum()
    }
}

impl Default for IntervalWeights {
    fn default() -> Self {
        Self::UNIFORM
    }
}

/// Result of [`TemplateTable::parse`]: the accepted table and every entry
/// that was turned away.
#[derive(Debug)]
pub struct ParsedTable {
    /// Templates that passed validation, in document order.
    pub table: TemplateTable,
    /// One error per rejected entry.
    pub rejected: Vec<ConfigError>,
}

/// Ordered, immutable collection of chord templates.
///
/// Iteration order is definition order and never changes, which keeps
/// tie-breaking between equally scored templates deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateTable {
    templates: Vec<ChordTemplate>,
    weights: IntervalWeights,
}

impl TemplateTable {
    /// Table over `templates` with uniform weights.
    pub fn new(templates: Vec<ChordTemplate>) -> Self {
        TemplateTable {
            templates,
            weights: IntervalWeights::UNIFORM,
        }
    }

    /// The built-in table: triads, sixths, sevenths, extended and altered
    /// dominants, suspended chords and the power chord.
    pub fn builtin() -> Self {
        let templates = BUILTIN
            .iter()
            .map(|&(id, name, core, optional)| {
                let (shape, optional) = match optional {
                    None => (TemplateShape::Flat, IntervalSet::EMPTY),
                    Some(o) => (
                        TemplateShape::Weighted,
                        IntervalSet::from_offsets(o.iter().copied()),
                    ),
                };
                ChordTemplate::from_parts(
                    id.to_string(),
                    name.to_string(),
                    shape,
                    IntervalSet::from_offsets(core.iter().copied()),
                    optional,
                )
            })
            .collect();
        Self::new(templates)
    }

    /// Replace the consonance weights.
    pub fn with_weights(mut self, weights: IntervalWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Consonance weights used for weighted templates.
    pub fn weights(&self) -> &IntervalWeights {
        &self.weights
    }

    /// Every template, first-defined first.
    pub fn lookup_all(&self) -> &[ChordTemplate] {
        &self.templates
    }

    /// Iterate templates in definition order.
    pub fn iter(&self) -> std::slice::Iter<'_, ChordTemplate> {
        self.templates.iter()
    }

    /// First template with identifier `id`.
    pub fn get(&self, id: &str) -> Option<&ChordTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Number of templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// True when the table holds no templates.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Parse a JSON template document, keeping every valid entry.
    ///
    /// The document is an object keyed by chord identifier. Each entry is
    /// either `{"name": .., "intervals": [..]}` (flat) or
    /// `{"name": .., "core": [..], "optional": [..]}` (weighted).
    ///
    /// Returns `Err` only when the document itself is unusable or no entry
    /// survives; individual bad entries are listed in
    /// [`ParsedTable::rejected`].
    pub fn parse(source: &str) -> Result<ParsedTable, ConfigError> {
        let document: Value = serde_json::from_str(source)?;
        let entries = document.as_object().ok_or(ConfigError::NotAnObject)?;

        let mut templates = Vec::with_capacity(entries.len());
        let mut rejected = Vec::new();
        for (id, value) in entries {
            match parse_entry(id, value) {
                Ok(template) => {
                    log::debug!(
                        target: "templates",
                        "loaded chord `{}` ({}) {:?}",
                        template.id,
                        template.name,
                        template.defined().to_vec()
                    );
                    templates.push(template);
                }
                Err(e) => rejected.push(e),
            }
        }

        if templates.is_empty() {
            return Err(ConfigError::NoValidEntries);
        }
        Ok(ParsedTable {
            table: Self::new(templates),
            rejected,
        })
    }

    /// Parse `source`, logging rejected entries and falling back to
    /// [`TemplateTable::builtin`] when nothing usable remains.
    pub fn load(source: &str) -> Self {
        match Self::parse(source) {
            Ok(ParsedTable { table, rejected }) => {
                for e in &rejected {
                    log::warn!(target: "templates", "skipping chord definition: {e}");
                }
                log::info!(target: "templates", "loaded {} chord definitions", table.len());
                table
            }
            Err(e) => {
                log::error!(target: "templates", "{e}; using built-in chord definitions");
                Self::builtin()
            }
        }
    }

    /// Like [`TemplateTable::load`], reading from a file. A missing or
    /// unreadable file yields the built-in table.
    pub fn load_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            log::info!(
                target: "templates",
                "no chord definitions at {}, using built-in table",
                path.display()
            );
            return Self::builtin();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::load(&contents),
            Err(source) => {
                let e = ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                };
                log::error!(target: "templates", "{e}; using built-in chord definitions");
                Self::builtin()
            }
        }
    }
}

impl Default for TemplateTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl<'a> IntoIterator for &'a TemplateTable {
    type Item = &'a ChordTemplate;
    type IntoIter = std::slice::Iter<'a, ChordTemplate>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn parse_entry(id: &str, value: &Value) -> Result<ChordTemplate, ConfigError> {
    let entry = value.as_object().ok_or_else(|| ConfigError::MalformedEntry {
        id: id.to_string(),
    })?;
    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ConfigError::MissingName { id: id.to_string() })?;

    if let Some(core) = entry.get("core") {
        let core = json_offsets(id, core)?;
        let optional = match entry.get("optional") {
            Some(v) => json_offsets(id, v)?,
            None => Vec::new(),
        };
        ChordTemplate::weighted(id, name, &core, &optional)
    } else if let Some(intervals) = entry.get("intervals") {
        ChordTemplate::flat(id, name, &json_offsets(id, intervals)?)
    } else {
        Err(ConfigError::MissingIntervals { id: id.to_string() })
    }
}

fn json_offsets(id: &str, value: &Value) -> Result<Vec<u8>, ConfigError> {
    let invalid = |v: &Value| ConfigError::InvalidOffset {
        id: id.to_string(),
        value: v.to_string(),
    };
    let items = value.as_array().ok_or_else(|| invalid(value))?;
    items
        .iter()
        .map(|item| {
            let offset = item.as_i64().ok_or_else(|| invalid(item))?;
            u8::try_from(offset)
                .ok()
                .filter(|&o| o < SEMITONES)
                .ok_or_else(|| ConfigError::OffsetOutOfRange {
                    id: id.to_string(),
                    offset,
                })
        })
        .collect()
}
