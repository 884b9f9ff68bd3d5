//! The static description of an intersection: its roads, lanes and the movements between them.

use crate::conflict::{Chord, ConflictMode, ConflictTable, Movement};
use crate::error::TopologyError;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// A compass heading. The variants are listed clockwise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Heading {
    N,
    E,
    S,
    W,
}

/// The direction a vehicle turns while crossing the intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Turn {
    Straight,
    Left,
    Right,
}

/// Identifies a lane entering the intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u8);

/// Identifies a lane leaving the intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExitId(pub u8);

/// The lanes a vehicle uses to cross the intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaneSpec {
    /// The lane the vehicle enters from.
    pub entry: EntryId,
    /// The lane the vehicle leaves by.
    pub exit: ExitId,
    /// The vehicle's direction of travel as it enters.
    pub heading: Heading,
}

/// One end of a lane at the edge of the intersection.
#[derive(Clone, Copy, Debug)]
struct LaneEnd {
    /// The road the lane belongs to.
    arm: Heading,
    /// The direction of travel along the lane.
    heading: Heading,
    /// Position along the edge of the intersection, counted clockwise from the north-west corner.
    perimeter: usize,
}

/// Describes an intersection: how many roads meet, how many lanes each has,
/// and which exits can be reached from each entry.
///
/// Vehicles drive on the right. Each road ("way") has half of its lanes
/// entering the intersection and half leaving it.
#[derive(Clone, Debug)]
pub struct Topology {
    /// The number of roads meeting at the intersection.
    ways: u8,
    /// The number of lanes on each road, in both directions.
    lanes_per_way: u8,
    /// The width of the intersection in cm.
    width_cm: u32,
    /// The lanes entering the intersection, indexed by [EntryId].
    entries: Vec<LaneEnd>,
    /// The lanes leaving the intersection, indexed by [ExitId].
    exits: Vec<LaneEnd>,
    /// The exits reachable from each entry.
    exits_from: Vec<SmallVec<[ExitId; 4]>>,
    /// Which movements may cross at the same time.
    conflicts: ConflictTable,
}

impl Heading {
    /// All headings, clockwise from north.
    pub const ALL: [Heading; 4] = [Heading::N, Heading::E, Heading::S, Heading::W];

    fn index(self) -> usize {
        self as usize
    }

    /// The heading pointing the other way.
    pub fn opposite(self) -> Self {
        Self::ALL[(self.index() + 2) % 4]
    }

    /// The heading after a right turn.
    pub fn right(self) -> Self {
        Self::ALL[(self.index() + 1) % 4]
    }

    /// The heading after a left turn.
    pub fn left(self) -> Self {
        Self::ALL[(self.index() + 3) % 4]
    }
}

impl Turn {
    /// Classifies the turn from one direction of travel to another.
    /// Returns `None` for a U-turn.
    pub fn between(from: Heading, to: Heading) -> Option<Turn> {
        if to == from {
            Some(Turn::Straight)
        } else if to == from.right() {
            Some(Turn::Right)
        } else if to == from.left() {
            Some(Turn::Left)
        } else {
            None
        }
    }
}

impl LaneSpec {
    /// The movement through the intersection.
    pub fn movement(&self) -> Movement {
        Movement {
            entry: self.entry,
            exit: self.exit,
        }
    }
}

impl Topology {
    /// Creates the description of an intersection.
    ///
    /// # Parameters
    /// * `ways` - The number of roads, between 2 and 4.
    /// * `lanes_per_way` - The number of lanes per road; must be even.
    /// * `width_cm` - The width of the intersection in cm.
    /// * `mode` - How lane conflicts are derived.
    pub fn new(
        ways: u8,
        lanes_per_way: u8,
        width_cm: u32,
        mode: ConflictMode,
    ) -> Result<Self, TopologyError> {
        if !(2..=4).contains(&ways) {
            return Err(TopologyError::InvalidWays(ways));
        }
        if lanes_per_way < 2 || lanes_per_way % 2 != 0 {
            return Err(TopologyError::InvalidLanes(lanes_per_way));
        }
        Ok(Self::build(ways, lanes_per_way, width_cm, mode))
    }

    /// The intersection used in the demonstrations: four ways with one lane in each direction.
    pub fn four_way(width_cm: u32) -> Self {
        Self::build(4, 2, width_cm, ConflictMode::Geometric)
    }

    fn build(ways: u8, lanes_per_way: u8, width_cm: u32, mode: ConflictMode) -> Self {
        let arms: &[Heading] = match ways {
            2 => &[Heading::N, Heading::S],
            3 => &[Heading::N, Heading::E, Heading::S],
            _ => &Heading::ALL,
        };
        let lanes = lanes_per_way as usize;
        let half = lanes / 2;

        // Along each arm, clockwise: the inbound lanes (curb side first), then the outbound lanes.
        let mut entries = vec![];
        let mut exits = vec![];
        for arm in arms {
            let base = arm.index() * lanes;
            for k in 0..half {
                entries.push(LaneEnd {
                    arm: *arm,
                    heading: arm.opposite(),
                    perimeter: base + k,
                });
            }
            for k in 0..half {
                exits.push(LaneEnd {
                    arm: *arm,
                    heading: *arm,
                    perimeter: base + lanes - 1 - k,
                });
            }
        }

        let exits_from = entries
            .iter()
            .map(|entry| {
                exits
                    .iter()
                    .enumerate()
                    .filter(|(_, exit)| exit.arm != entry.arm)
                    .filter(|(_, exit)| Turn::between(entry.heading, exit.heading).is_some())
                    .map(|(idx, _)| ExitId(idx as u8))
                    .collect()
            })
            .collect::<Vec<SmallVec<[ExitId; 4]>>>();

        let chords = exits_from
            .iter()
            .enumerate()
            .flat_map(|(entry_idx, exit_ids)| {
                let entries = &entries;
                let exits = &exits;
                exit_ids.iter().map(move |exit| Chord {
                    movement: Movement {
                        entry: EntryId(entry_idx as u8),
                        exit: *exit,
                    },
                    ends: [entries[entry_idx].perimeter, exits[exit.0 as usize].perimeter],
                })
            })
            .collect::<Vec<_>>();
        let conflicts = ConflictTable::new(&chords, 4 * lanes, mode);

        Self {
            ways,
            lanes_per_way,
            width_cm,
            entries,
            exits,
            exits_from,
            conflicts,
        }
    }

    /// The number of roads meeting at the intersection.
    pub fn ways(&self) -> u8 {
        self.ways
    }

    /// The number of lanes on each road.
    pub fn lanes_per_way(&self) -> u8 {
        self.lanes_per_way
    }

    /// The width of the intersection in cm.
    pub fn width_cm(&self) -> u32 {
        self.width_cm
    }

    /// The number of lanes entering the intersection.
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// The number of lanes leaving the intersection.
    pub fn num_exits(&self) -> usize {
        self.exits.len()
    }

    /// The direction of travel of a vehicle entering by the given lane.
    pub fn entry_heading(&self, entry: EntryId) -> Result<Heading, TopologyError> {
        self.entry(entry).map(|e| e.heading)
    }

    /// The direction of travel of a vehicle leaving by the given lane.
    pub fn exit_heading(&self, exit: ExitId) -> Result<Heading, TopologyError> {
        self.exits
            .get(exit.0 as usize)
            .map(|e| e.heading)
            .ok_or(TopologyError::UnknownExit(exit))
    }

    /// The road an entry lane belongs to.
    pub fn entry_arm(&self, entry: EntryId) -> Result<Heading, TopologyError> {
        self.entry(entry).map(|e| e.arm)
    }

    /// The exits that can be reached from an entry.
    pub fn valid_exits(&self, entry: EntryId) -> Result<&[ExitId], TopologyError> {
        self.exits_from
            .get(entry.0 as usize)
            .map(|exits| exits.as_slice())
            .ok_or(TopologyError::UnknownEntry(entry))
    }

    /// Classifies the movement from an entry to an exit.
    pub fn turn(&self, entry: EntryId, exit: ExitId) -> Result<Turn, TopologyError> {
        let from = self.entry_heading(entry)?;
        let to = self.exit_heading(exit)?;
        Turn::between(from, to).ok_or(TopologyError::UnreachableExit { entry, exit })
    }

    /// Creates the lane specification for travelling from `entry` to `exit`.
    pub fn lane_spec(&self, entry: EntryId, exit: ExitId) -> Result<LaneSpec, TopologyError> {
        if !self.valid_exits(entry)?.contains(&exit) {
            self.exit_heading(exit)?;
            return Err(TopologyError::UnreachableExit { entry, exit });
        }
        Ok(LaneSpec {
            entry,
            exit,
            heading: self.entry_heading(entry)?,
        })
    }

    /// Creates the lane specification for turning in the given direction from `entry`.
    pub fn lane_spec_for_turn(&self, entry: EntryId, turn: Turn) -> Result<LaneSpec, TopologyError> {
        let from = self.entry_heading(entry)?;
        let exit = self
            .valid_exits(entry)?
            .iter()
            .copied()
            .find(|exit| Turn::between(from, self.exits[exit.0 as usize].heading) == Some(turn))
            .ok_or(TopologyError::NoExitForTurn { entry, turn })?;
        self.lane_spec(entry, exit)
    }

    /// Checks that a lane specification describes a valid movement through this intersection.
    pub fn validate(&self, lane: &LaneSpec) -> Result<(), TopologyError> {
        let expected = self.lane_spec(lane.entry, lane.exit)?;
        if expected.heading != lane.heading {
            return Err(TopologyError::HeadingMismatch(lane.entry));
        }
        Ok(())
    }

    /// Returns true if vehicles using the two lane specifications may not cross at the same time.
    pub fn conflicts(&self, a: &LaneSpec, b: &LaneSpec) -> bool {
        self.conflicts.conflicts(a.movement(), b.movement())
    }

    /// Gets the conflict table.
    pub fn conflict_table(&self) -> &ConflictTable {
        &self.conflicts
    }

    fn entry(&self, entry: EntryId) -> Result<&LaneEnd, TopologyError> {
        self.entries
            .get(entry.0 as usize)
            .ok_or(TopologyError::UnknownEntry(entry))
    }
}

impl fmt::Display for Heading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Heading::N => "N",
            Heading::E => "E",
            Heading::S => "S",
            Heading::W => "W",
        };
        write!(f, "{}", c)
    }
}

impl FromStr for Heading {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "N" | "NORTH" => Ok(Heading::N),
            "E" | "EAST" => Ok(Heading::E),
            "S" | "SOUTH" => Ok(Heading::S),
            "W" | "WEST" => Ok(Heading::W),
            other => Err(format!("unknown heading '{}'", other)),
        }
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Turn::Straight => write!(f, "straight"),
            Turn::Left => write!(f, "left"),
            Turn::Right => write!(f, "right"),
        }
    }
}

impl FromStr for Turn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s" | "straight" => Ok(Turn::Straight),
            "l" | "left" => Ok(Turn::Left),
            "r" | "right" => Ok(Turn::Right),
            other => Err(format!("unknown turn '{}'", other)),
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl fmt::Display for ExitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{}", self.0)
    }
}

impl fmt::Display for LaneSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{} ({})", self.entry, self.exit, self.heading)
    }
}
