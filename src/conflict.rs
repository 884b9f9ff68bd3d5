use crate::topology::{EntryId, ExitId};
use itertools::iproduct;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A path through the intersection, from an entry point to an exit point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Movement {
    pub entry: EntryId,
    pub exit: ExitId,
}

/// How the conflict table is derived from the topology.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictMode {
    /// Movements conflict when their paths share an end point or cross.
    Geometric,
    /// Every pair of movements conflicts.
    Conservative,
}

/// Records which pairs of movements may not occupy the intersection at the same time.
#[derive(Clone, Debug)]
pub struct ConflictTable {
    /// How the table was derived.
    mode: ConflictMode,
    /// The valid movements through the intersection.
    movements: Vec<Movement>,
    /// Maps a movement to its row in `conflicts`.
    index: HashMap<Movement, usize>,
    /// Row-major square matrix; `true` where two movements conflict.
    conflicts: Vec<bool>,
}

/// A movement along with the perimeter positions of its two ends.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Chord {
    pub movement: Movement,
    pub ends: [usize; 2],
}

impl ConflictTable {
    /// Builds the conflict table for a set of movements.
    ///
    /// # Parameters
    /// * `chords` - The valid movements with the perimeter positions of their ends.
    /// * `perimeter` - The number of lane ends around the edge of the intersection.
    /// * `mode` - How to decide whether two movements conflict.
    pub(crate) fn new(chords: &[Chord], perimeter: usize, mode: ConflictMode) -> Self {
        let n = chords.len();
        let conflicts = iproduct!(chords, chords)
            .map(|(a, b)| match mode {
                ConflictMode::Conservative => true,
                ConflictMode::Geometric => chords_conflict(a.ends, b.ends, perimeter),
            })
            .collect::<Vec<_>>();
        debug_assert_eq!(conflicts.len(), n * n);

        let movements = chords.iter().map(|c| c.movement).collect::<Vec<_>>();
        let index = movements
            .iter()
            .enumerate()
            .map(|(idx, movement)| (*movement, idx))
            .collect();

        Self {
            mode,
            movements,
            index,
            conflicts,
        }
    }

    /// Gets the mode the table was derived with.
    pub fn mode(&self) -> ConflictMode {
        self.mode
    }

    /// Gets the valid movements through the intersection.
    pub fn movements(&self) -> &[Movement] {
        &self.movements
    }

    /// Returns true if the movements may not use the intersection at the same time.
    /// A movement the table does not know about conflicts with everything.
    pub fn conflicts(&self, a: Movement, b: Movement) -> bool {
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(i), Some(j)) => self.conflicts[i * self.movements.len() + j],
            _ => true,
        }
    }

    /// Returns every unordered pair of distinct movements that may cross simultaneously.
    pub fn compatible_pairs(&self) -> impl Iterator<Item = (Movement, Movement)> + '_ {
        let n = self.movements.len();
        iproduct!(0..n, 0..n)
            .filter(|(i, j)| i < j)
            .filter(move |(i, j)| !self.conflicts[i * n + j])
            .map(move |(i, j)| (self.movements[i], self.movements[j]))
    }
}

/// Checks whether two paths across a convex intersection touch.
/// Each path is a chord between two positions on the perimeter.
fn chords_conflict(a: [usize; 2], b: [usize; 2], perimeter: usize) -> bool {
    if a[0] == b[0] || a[1] == b[1] || a[0] == b[1] || a[1] == b[0] {
        return true;
    }
    let span = (a[1] + perimeter - a[0]) % perimeter;
    let inside = |p: usize| (p + perimeter - a[0]) % perimeter < span;
    inside(b[0]) != inside(b[1])
}

impl fmt::Display for ConflictMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictMode::Geometric => write!(f, "geometric"),
            ConflictMode::Conservative => write!(f, "conservative"),
        }
    }
}

impl FromStr for ConflictMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "geometric" => Ok(ConflictMode::Geometric),
            "conservative" => Ok(ConflictMode::Conservative),
            other => Err(format!("unknown lane conflict mode '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_chords() {
        // Eight lane ends around a four-way, two-lane intersection.
        assert!(!chords_conflict([0, 5], [4, 1], 8));
        assert!(chords_conflict([0, 5], [2, 7], 8));
        assert!(chords_conflict([0, 5], [0, 3], 8));
        assert!(chords_conflict([0, 5], [2, 5], 8));
        assert!(!chords_conflict([0, 7], [2, 1], 8));
    }

    #[test]
    fn unknown_movements_conflict() {
        let m = |entry, exit| Movement {
            entry: EntryId(entry),
            exit: ExitId(exit),
        };
        let chords = [
            Chord { movement: m(0, 2), ends: [0, 5] },
            Chord { movement: m(2, 0), ends: [4, 1] },
        ];
        let table = ConflictTable::new(&chords, 8, ConflictMode::Geometric);
        assert!(!table.conflicts(m(0, 2), m(2, 0)));
        assert!(table.conflicts(m(0, 2), m(9, 9)));
        assert_eq!(table.compatible_pairs().count(), 1);

        let table = ConflictTable::new(&chords, 8, ConflictMode::Conservative);
        assert!(table.conflicts(m(0, 2), m(2, 0)));
        assert_eq!(table.compatible_pairs().count(), 0);
    }
}
