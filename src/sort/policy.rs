use crate::songs::normalize::normalize_key;
use crate::songs::tuning::canonical_tuning;
use crate::store::ListEntry;
use serde::Serialize;
use std::cmp::Ordering;

/// A named priority order over tunings, used to group a set so the guitars change as
/// little as possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningRotation {
    StandardFirst,
    DropFirst,
    OpenFirst,
}

const STANDARD_FIRST: &[&str] = &[
    "Standard",
    "Half Step Down",
    "Whole Step Down",
    "C Standard",
    "B Standard",
    "Drop D",
    "Drop C#",
    "Drop C",
    "Drop B",
    "Open G",
    "Open D",
    "Open E",
    "DADGAD",
];

const DROP_FIRST: &[&str] = &[
    "Drop D",
    "Drop C#",
    "Drop C",
    "Drop B",
    "Standard",
    "Half Step Down",
    "Whole Step Down",
    "C Standard",
    "B Standard",
    "Open G",
    "Open D",
    "Open E",
    "DADGAD",
];

const OPEN_FIRST: &[&str] = &[
    "Open G",
    "Open D",
    "Open E",
    "DADGAD",
    "Standard",
    "Half Step Down",
    "Whole Step Down",
    "C Standard",
    "B Standard",
    "Drop D",
    "Drop C#",
    "Drop C",
    "Drop B",
];

impl TuningRotation {
    pub const ALL: [TuningRotation; 3] = [
        TuningRotation::StandardFirst,
        TuningRotation::DropFirst,
        TuningRotation::OpenFirst,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TuningRotation::StandardFirst => "Standard first",
            TuningRotation::DropFirst => "Drop tunings first",
            TuningRotation::OpenFirst => "Open tunings first",
        }
    }

    fn ranking(&self) -> &'static [&'static str] {
        match self {
            TuningRotation::StandardFirst => STANDARD_FIRST,
            TuningRotation::DropFirst => DROP_FIRST,
            TuningRotation::OpenFirst => OPEN_FIRST,
        }
    }

    /// Lower ranks sort first. Missing and unknown tunings share the last rank.
    pub fn rank(&self, tuning: Option<&str>) -> usize {
        let ranking = self.ranking();
        tuning
            .and_then(canonical_tuning)
            .and_then(|canonical| ranking.iter().position(|t| *t == canonical))
            .unwrap_or(ranking.len())
    }
}

/// How a performance list is displayed. The catalog is always alphabetical.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "rotation", rename_all = "snake_case")]
pub enum SortMode {
    /// Stored position order.
    #[default]
    Manual,
    Tuning(TuningRotation),
}

impl SortMode {
    /// Manual, then each rotation in turn, then back to Manual.
    pub fn next(self) -> SortMode {
        match self {
            SortMode::Manual => SortMode::Tuning(TuningRotation::ALL[0]),
            SortMode::Tuning(rotation) => {
                let index = TuningRotation::ALL
                    .iter()
                    .position(|r| *r == rotation)
                    .unwrap_or(0);
                TuningRotation::ALL
                    .get(index + 1)
                    .map(|r| SortMode::Tuning(*r))
                    .unwrap_or(SortMode::Manual)
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortMode::Manual => "Manual",
            SortMode::Tuning(rotation) => rotation.label(),
        }
    }
}

fn by_artist_then_title(a: &ListEntry, b: &ListEntry) -> Ordering {
    normalize_key(&a.song.artist)
        .cmp(&normalize_key(&b.song.artist))
        .then_with(|| normalize_key(&a.song.title).cmp(&normalize_key(&b.song.title)))
        .then_with(|| a.song.id.cmp(&b.song.id))
}

/// Alphabetical by artist, then title, ignoring case and stored positions.
pub fn sort_catalog(entries: &mut [ListEntry]) {
    entries.sort_by(by_artist_then_title);
}

/// Groups entries by the effective tuning on this list, following `rotation`.
pub fn sort_by_tuning(entries: &mut [ListEntry], rotation: TuningRotation) {
    entries.sort_by(|a, b| {
        rotation
            .rank(a.effective_tuning())
            .cmp(&rotation.rank(b.effective_tuning()))
            .then_with(|| by_artist_then_title(a, b))
    });
}
