//! Identifiers shared between the mesh, the control plane, and the loader
use serde::{Deserialize, Serialize};

/// Position of a node (or aggregator) within the mesh
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub row: u8,
    pub column: u8,
}

impl NodeId {
    pub fn new(row: u8, column: u8) -> Self {
        Self { row, column }
    }
}

/// The four cardinal pipe attachments of a node
///
/// The discriminant order is the clockwise rotation order used when routing
/// falls back from the preferred direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Next direction clockwise (N -> E -> S -> W -> N)
    pub fn clockwise(self) -> Direction {
        Direction::ALL[(self.index() + 1) % 4]
    }
}

/// Two-bit slot selector carried by SIGNAL messages and tile instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemorySlot {
    Preserve = 0,
    Inverse = 1,
    Lower = 2,
    Upper = 3,
}

impl MemorySlot {
    pub fn from_bits(raw: u8) -> Self {
        match raw & 0x3 {
            0 => MemorySlot::Preserve,
            1 => MemorySlot::Inverse,
            2 => MemorySlot::Lower,
            _ => MemorySlot::Upper,
        }
    }

    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Resolve against the tile's current slot bit
    pub fn resolve(self, current: bool) -> bool {
        match self {
            MemorySlot::Preserve => current,
            MemorySlot::Inverse => !current,
            MemorySlot::Lower => false,
            MemorySlot::Upper => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clockwise_rotation_covers_all_directions() {
        let mut dirx = Direction::North;
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(dirx);
            dirx = dirx.clockwise();
        }
        assert_eq!(dirx, Direction::North);
        assert_eq!(seen, Direction::ALL.to_vec());
    }

    #[test]
    fn slot_resolution() {
        assert!(!MemorySlot::Preserve.resolve(false));
        assert!(MemorySlot::Preserve.resolve(true));
        assert!(MemorySlot::Inverse.resolve(false));
        assert!(!MemorySlot::Inverse.resolve(true));
        assert!(!MemorySlot::Lower.resolve(true));
        assert!(MemorySlot::Upper.resolve(false));
    }
}
