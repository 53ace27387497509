//! Chord Matcher
//!
//! Finds the best (root, chord type) pair for a set of sounding pitches.
//!
//! Every pitch class is tried as a root against every template in the
//! table. Flat templates are scored by Jaccard overlap, weighted templates by
//! consonance weight with a bonus for optional tones and a capped penalty for
//! unexplained ones. Contextual boosts are applied before the winner is
//! checked against the acceptance threshold.

use crate::pitch::{extended_interval_name, interval_name, IntervalSet, NoteName, Pitch, SEMITONES};
use crate::templates::{ChordFamily, ChordTemplate, IntervalWeights, TemplateShape, TemplateTable};
use serde::Serialize;
use std::fmt::{self, Display};
use std::sync::Arc;

/// Minimum final score for a match to be reported.
pub const ACCEPTANCE_THRESHOLD: f32 = 0.6;

/// Score multiplier for altered dominants under [`GenreMode::Jazz`].
pub const ALTERED_DOMINANT_BOOST: f32 = 1.2;

/// Score multiplier for a dominant a fifth below a preceding minor seventh.
pub const TWO_FIVE_BOOST: f32 = 1.1;

/// Penalty per unexplained pitch class
const EXTRA_PENALTY: f32 = 0.05;

/// Cap on the total unexplained-tone penalty
const MAX_EXTRA_PENALTY: f32 = 0.15;

/// Fraction of an optional tone's weight credited when it is played
const OPTIONAL_BONUS: f32 = 0.5;

/// Weighted templates defining more offsets than this must show every core
/// offset to score at all.
const STRUCTURAL_LIMIT: usize = 3;

/// Tie-break credit per defined offset of the template
const SPECIFICITY_WEIGHT: f32 = 0.1;

/// Semitones from a chord root up to the root of the dominant it resolves
/// from in a ii-V (a fifth below is a fourth above).
const TWO_FIVE_STEP: u8 = 5;

/// Stylistic bias applied while ranking candidates.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub enum GenreMode {
    /// No stylistic bias
    #[default]
    Standard,
    /// Favour altered dominants
    Jazz,
}

/// Where the bass note sits relative to the recognized chord.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Inversion {
    /// Bass is the root.
    RootPosition,
    /// Bass is the second core tone.
    First,
    /// Bass is the third core tone.
    Second,
    /// Bass is the fourth core tone.
    Third,
    /// Bass is a higher core tone; holds the inversion number.
    Nth(usize),
    /// Bass is one of the template's optional tones.
    SlashExtension,
    /// Bass does not belong to the chord.
    SlashUnrelated,
}

impl Inversion {
    fn classify(template: &ChordTemplate, bass_offset: u8) -> Inversion {
        if bass_offset == 0 {
            return Inversion::RootPosition;
        }
        match template.core().position(bass_offset) {
            Some(1) => Inversion::First,
            Some(2) => Inversion::Second,
            Some(3) => Inversion::Third,
            Some(n) => Inversion::Nth(n),
            None if template.optional().contains(bass_offset) => Inversion::SlashExtension,
            None => Inversion::SlashUnrelated,
        }
    }

    /// True for the two slash-chord cases.
    pub const fn is_slash(self) -> bool {
        matches!(self, Inversion::SlashExtension | Inversion::SlashUnrelated)
    }
}

impl Display for Inversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inversion::RootPosition => f.write_str("Root Position"),
            Inversion::First => f.write_str("1st Inversion"),
            Inversion::Second => f.write_str("2nd Inversion"),
            Inversion::Third => f.write_str("3rd Inversion"),
            Inversion::Nth(n) => write!(f, "{n}th Inversion"),
            Inversion::SlashExtension => f.write_str("Slash Chord (bass is an extension)"),
            Inversion::SlashUnrelated => f.write_str("Slash Chord (bass not a chord tone)"),
        }
    }
}

/// How widely the sounding pitches are spread.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Voicing {
    /// One pitch only
    SingleNote,
    /// Exactly two pitches
    Interval,
    /// Span under one octave
    VeryClose,
    /// Span under an octave and a half
    Close,
    /// Span under two and a half octaves
    ModeratelyOpen,
    /// Anything wider
    VeryOpen,
}

impl Voicing {
    /// Classify ascending, de-duplicated pitches.
    pub fn classify(pitches: &[Pitch]) -> Voicing {
        match pitches.len() {
            0 | 1 => Voicing::SingleNote,
            2 => Voicing::Interval,
            _ => {
                let span = octave_span(pitches);
                if span < 1.0 {
                    Voicing::VeryClose
                } else if span < 1.5 {
                    Voicing::Close
                } else if span < 2.5 {
                    Voicing::ModeratelyOpen
                } else {
                    Voicing::VeryOpen
                }
            }
        }
    }
}

impl Display for Voicing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Voicing::SingleNote => "Single Note",
            Voicing::Interval => "Interval",
            Voicing::VeryClose => "Very Close Voicing",
            Voicing::Close => "Close Voicing",
            Voicing::ModeratelyOpen => "Moderately Open Voicing",
            Voicing::VeryOpen => "Very Open (Spread) Voicing",
        })
    }
}

fn octave_span(pitches: &[Pitch]) -> f32 {
    match (pitches.first(), pitches.last()) {
        (Some(lo), Some(hi)) => f32::from(hi.value() - lo.value()) / f32::from(SEMITONES),
        _ => 0.0,
    }
}

/// One recognition: the matched chord plus display facts about the voicing.
///
/// Interval lists are pitch-class offsets, ascending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChordResult {
    /// Full label, e.g. `Cmaj7/E`.
    pub name: String,
    /// Root of the matched chord.
    pub root: NoteName,
    /// Identifier of the matched template.
    pub chord_type: String,
    /// Display name of the matched template.
    pub description: String,
    /// Harmonic family of the matched template.
    pub family: ChordFamily,
    /// Pitch class of the lowest sounding pitch.
    pub bass: NoteName,
    /// Lowest sounding pitch.
    pub bass_pitch: Pitch,
    /// Lowest sounding pitch whose pitch class is the root, if any.
    pub root_pitch: Option<Pitch>,
    /// Position of the bass within the chord.
    pub inversion: Inversion,
    /// Final score in `0.0..=1.0`.
    pub score: f32,
    /// Sounding pitches, ascending.
    pub pitches: Vec<Pitch>,
    /// Distinct pitch classes played.
    pub pitch_classes: Vec<u8>,
    /// Every offset the matched template defines.
    pub defined_intervals: Vec<u8>,
    /// Defined offsets that were played.
    pub matched_intervals: Vec<u8>,
    /// Played offsets the template does not explain.
    pub extra_intervals: Vec<u8>,
    /// All played pitch classes relative to the root.
    pub intervals_from_root: Vec<u8>,
    /// All played pitch classes relative to the bass.
    pub intervals_from_bass: Vec<u8>,
    /// Distance from lowest to highest pitch, in octaves.
    pub octave_span: f32,
    /// Spread classification of the voicing.
    pub voicing: Voicing,
}

impl ChordResult {
    /// Labels of the played intervals above the root (`R`, `3`, `5`...).
    pub fn root_interval_labels(&self) -> Vec<&'static str> {
        self.intervals_from_root.iter().map(|&o| interval_name(o)).collect()
    }

    /// Labels of the played intervals above the bass.
    pub fn bass_interval_labels(&self) -> Vec<&'static str> {
        self.intervals_from_bass.iter().map(|&o| interval_name(o)).collect()
    }

    /// Unexplained tones named as extensions (`b9`, `#11/b5`...).
    pub fn extra_interval_labels(&self) -> Vec<&'static str> {
        self.extra_intervals
            .iter()
            .map(|&o| extended_interval_name(o))
            .collect()
    }
}

impl Display for ChordResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Builder for [`ChordMatcher`]
pub struct ChordMatcherBuilder {
    table: Option<Arc<TemplateTable>>,
    threshold: f32,
    genre: GenreMode,
}

impl ChordMatcherBuilder {
    /// Built-in table, threshold 0.6, no genre bias.
    pub fn new() -> Self {
        ChordMatcherBuilder {
            table: None,
            threshold: ACCEPTANCE_THRESHOLD,
            genre: GenreMode::Standard,
        }
    }

    /// Match against `table` instead of the built-in one. Pass an
    /// `Arc<TemplateTable>` to share one table between matchers.
    pub fn table(mut self, table: impl Into<Arc<TemplateTable>>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Minimum final score for a match.
    pub fn threshold(mut self, value: f32) -> Self {
        self.threshold = value;
        self
    }

    /// Stylistic bias.
    pub fn genre(mut self, genre: GenreMode) -> Self {
        self.genre = genre;
        self
    }

    /// Build the `ChordMatcher`
    pub fn build(self) -> ChordMatcher {
        ChordMatcher {
            table: self
                .table
                .unwrap_or_else(|| Arc::new(TemplateTable::builtin())),
            threshold: self.threshold,
            genre: self.genre,
        }
    }
}

impl Default for ChordMatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-candidate bookkeeping during the root/template search
struct Candidate<'t> {
    root: u8,
    template: &'t ChordTemplate,
    relative: IntervalSet,
    score: f32,
    strength: f32,
}

impl Candidate<'_> {
    fn beats(&self, other: &Candidate<'_>) -> bool {
        self.score > other.score
            || (self.score == other.score && self.score > 0.0 && self.strength > other.strength)
    }
}

/// Stateless chord recognizer over an immutable template table.
///
/// Cloning is cheap; clones share the table.
#[derive(Debug, Clone)]
pub struct ChordMatcher {
    table: Arc<TemplateTable>,
    threshold: f32,
    genre: GenreMode,
}

impl ChordMatcher {
    /// Return a builder to customize table, threshold and genre
    pub fn builder() -> ChordMatcherBuilder {
        ChordMatcherBuilder::new()
    }

    /// Matcher over the built-in table with default settings
    pub fn new() -> Self {
        ChordMatcherBuilder::new().build()
    }

    /// The template table in use.
    pub fn table(&self) -> &TemplateTable {
        &self.table
    }

    /// Acceptance threshold in use.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Genre bias in use.
    pub fn genre(&self) -> GenreMode {
        self.genre
    }

    /// Recognize the chord formed by `sounding`.
    ///
    /// `history` holds earlier results, oldest first; only the most recent
    /// entry is consulted. Returns `None` when fewer than `min_notes`
    /// distinct pitches sound or no candidate reaches the threshold.
    pub fn recognize(
        &self,
        sounding: &[Pitch],
        min_notes: usize,
        history: &[ChordResult],
    ) -> Option<ChordResult> {
        let mut pitches = sounding.to_vec();
        pitches.sort_unstable();
        pitches.dedup();
        if pitches.is_empty() || pitches.len() < min_notes {
            return None;
        }

        let played = IntervalSet::from_pitches(&pitches);
        let previous = history.last();
        let weights = self.table.weights();

        let mut best: Option<Candidate<'_>> = None;
        for root in 0..SEMITONES {
            let relative = played.relative_to(root);
            for template in self.table.iter() {
                let raw = score_template(template, relative, weights);
                let candidate = Candidate {
                    root,
                    template,
                    relative,
                    score: raw * self.context_boost(template, root, previous),
                    strength: match_strength(template, relative),
                };
                let better = match &best {
                    Some(current) => candidate.beats(current),
                    None => true,
                };
                if better {
                    best = Some(candidate);
                }
            }
        }

        let best = best?;
        if best.score < self.threshold {
            log::trace!(
                target: "matcher",
                "best candidate {}{} scored {:.3}, below {:.2}",
                NoteName::from_pitch_class(best.root),
                best.template.id(),
                best.score,
                self.threshold
            );
            return None;
        }
        Some(describe(best, pitches, played))
    }

    fn context_boost(&self, template: &ChordTemplate, root: u8, previous: Option<&ChordResult>) -> f32 {
        let family = template.family();
        let mut boost = 1.0;
        if self.genre == GenreMode::Jazz && family == ChordFamily::AlteredDominant {
            boost *= ALTERED_DOMINANT_BOOST;
        }
        if let Some(prev) = previous {
            let resolves = (prev.root.pitch_class() + TWO_FIVE_STEP) % SEMITONES == root;
            if prev.family.is_minor_seventh() && family.is_dominant() && resolves {
                boost *= TWO_FIVE_BOOST;
            }
        }
        boost
    }
}

impl Default for ChordMatcher {
    fn default() -> Self {
        ChordMatcher::new()
    }
}

/// Score one template against played offsets relative to a candidate root.
fn score_template(template: &ChordTemplate, played: IntervalSet, weights: &IntervalWeights) -> f32 {
    match template.shape() {
        TemplateShape::Flat => {
            let defined = template.core();
            let union = played.union(defined).len();
            if union == 0 {
                return 0.0;
            }
            played.intersection(defined).len() as f32 / union as f32
        }
        TemplateShape::Weighted => {
            let core = template.core();
            let optional = template.optional();
            let defined = core.union(optional);
            if defined.len() > STRUCTURAL_LIMIT && !core.is_subset(played) {
                return 0.0;
            }

            let core_weight = weights.total(core);
            if core_weight <= 0.0 {
                return 0.0;
            }
            let base = weights.total(core.intersection(played)) / core_weight;
            let bonus = OPTIONAL_BONUS * weights.total(optional.intersection(played)) / core_weight;
            let extras = played.difference(defined).len() as f32;
            let penalty = (EXTRA_PENALTY * extras).min(MAX_EXTRA_PENALTY);
            (base + bonus - penalty).clamp(0.0, 1.0)
        }
    }
}

/// Tie-break weight: matched defined offsets, nudged towards larger templates.
fn match_strength(template: &ChordTemplate, played: IntervalSet) -> f32 {
    let defined = template.defined();
    played.intersection(defined).len() as f32 + SPECIFICITY_WEIGHT * defined.len() as f32
}

fn describe(best: Candidate<'_>, pitches: Vec<Pitch>, played: IntervalSet) -> ChordResult {
    let Candidate {
        root,
        template,
        relative,
        score,
        ..
    } = best;

    let root_name = NoteName::from_pitch_class(root);
    let bass_pitch = pitches[0];
    let bass = bass_pitch.note_name();
    let bass_offset = (bass.pitch_class() + SEMITONES - root) % SEMITONES;
    let defined = template.defined();

    let name = if bass_offset == 0 {
        format!("{root_name}{}", template.id())
    } else {
        format!("{root_name}{}/{bass}", template.id())
    };

    ChordResult {
        name,
        root: root_name,
        chord_type: template.id().to_string(),
        description: template.name().to_string(),
        family: template.family(),
        bass,
        bass_pitch,
        root_pitch: pitches.iter().copied().find(|p| p.pitch_class() == root),
        inversion: Inversion::classify(template, bass_offset),
        score: score.min(1.0),
        pitch_classes: played.to_vec(),
        defined_intervals: defined.to_vec(),
        matched_intervals: relative.intersection(defined).to_vec(),
        extra_intervals: relative.difference(defined).to_vec(),
        intervals_from_root: relative.to_vec(),
        intervals_from_bass: played.relative_to(bass.pitch_class()).to_vec(),
        octave_span: octave_span(&pitches),
        voicing: Voicing::classify(&pitches),
        pitches,
    }
}
