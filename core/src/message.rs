//! Bit-exact node-plane message frames
//!
//! Every message travelling inside the mesh packs into a 64-bit entry with the
//! header in the topmost bits:
//!
//! ```text
//! header : row[63:60] column[59:56] command[55:54]
//! LOAD   : address[53:43] slot[42]         data[41:34]
//! SIGNAL : address[53:44] slot_mode[43:42] data[41:34]
//! OUTPUT : bypass[53] -[52] mask[51:44] slot[43:42] data[41:34]
//! ```
//!
//! OUTPUT shares the SIGNAL command: it is the aggregator's reading of the
//! same bits, with the mask and bypass flag overlaying the address field and
//! the output slot index overlaying the slot mode. Packing is plain
//! shift-and-mask, independent of host endianness.
use crate::types::{MemorySlot, NodeId};

const ROW_LSB: u32 = 60;
const COLUMN_LSB: u32 = 56;
const COMMAND_LSB: u32 = 54;

const LOAD_ADDRESS_LSB: u32 = 43;
const LOAD_SLOT_LSB: u32 = 42;

const SIGNAL_ADDRESS_LSB: u32 = 44;
const SIGNAL_SLOT_LSB: u32 = 42;

const OUTPUT_BYPASS_LSB: u32 = 53;
const OUTPUT_MASK_LSB: u32 = 44;
const OUTPUT_SLOT_LSB: u32 = 42;

const DATA_LSB: u32 = 34;

/// Row, column, and command bits occupy the top ten bits of every frame
const HEADER_MASK: u64 = 0x3FF << COMMAND_LSB;

/// Two-bit command field of the node-plane header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCommand {
    /// Instruction memory byte write
    Load = 0,
    /// Data memory / aggregator slot update
    Signal = 1,
    /// Reserved passthrough
    Raw = 2,
}

impl NodeCommand {
    pub fn from_bits(raw: u8) -> Self {
        match raw & 0x3 {
            0 => NodeCommand::Load,
            1 => NodeCommand::Signal,
            _ => NodeCommand::Raw,
        }
    }
}

/// Header present on every node-plane frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHeader {
    pub target: NodeId,
    pub command: NodeCommand,
}

impl NodeHeader {
    pub fn new(target: NodeId, command: NodeCommand) -> Self {
        Self { target, command }
    }

    pub fn pack(&self) -> u64 {
        ((self.target.row as u64 & 0xF) << ROW_LSB)
            | ((self.target.column as u64 & 0xF) << COLUMN_LSB)
            | ((self.command as u64 & 0x3) << COMMAND_LSB)
    }

    pub fn unpack(raw: u64) -> Self {
        Self {
            target: NodeId {
                row: ((raw >> ROW_LSB) & 0xF) as u8,
                column: ((raw >> COLUMN_LSB) & 0xF) as u8,
            },
            command: NodeCommand::from_bits(((raw >> COMMAND_LSB) & 0x3) as u8),
        }
    }
}

/// A message type that packs into a 64-bit node-plane entry
pub trait NodeFrame: Sized {
    /// Command value stamped into the header on enqueue
    fn header(&self) -> NodeHeader;
    fn pack(&self) -> u64;
    fn unpack(raw: u64) -> Self;
}

/// Byte write into a node's instruction memory
///
/// `address` selects a 16-bit half-word (the instruction index is
/// `address >> 1`); `slot` selects the byte within that half-word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLoad {
    pub target: NodeId,
    pub address: u16,
    pub slot: bool,
    pub data: u8,
}

impl NodeFrame for NodeLoad {
    fn header(&self) -> NodeHeader {
        NodeHeader::new(self.target, NodeCommand::Load)
    }

    fn pack(&self) -> u64 {
        self.header().pack()
            | ((self.address as u64 & 0x7FF) << LOAD_ADDRESS_LSB)
            | ((self.slot as u64) << LOAD_SLOT_LSB)
            | ((self.data as u64) << DATA_LSB)
    }

    fn unpack(raw: u64) -> Self {
        let header = NodeHeader::unpack(raw);
        Self {
            target: header.target,
            address: ((raw >> LOAD_ADDRESS_LSB) & 0x7FF) as u16,
            slot: (raw >> LOAD_SLOT_LSB) & 1 != 0,
            data: ((raw >> DATA_LSB) & 0xFF) as u8,
        }
    }
}

/// Byte write into a node's data memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSignal {
    pub target: NodeId,
    pub address: u16,
    pub slot: MemorySlot,
    pub data: u8,
}

impl NodeFrame for NodeSignal {
    fn header(&self) -> NodeHeader {
        NodeHeader::new(self.target, NodeCommand::Signal)
    }

    fn pack(&self) -> u64 {
        self.header().pack()
            | ((self.address as u64 & 0x3FF) << SIGNAL_ADDRESS_LSB)
            | ((self.slot.bits() as u64) << SIGNAL_SLOT_LSB)
            | ((self.data as u64) << DATA_LSB)
    }

    fn unpack(raw: u64) -> Self {
        let header = NodeHeader::unpack(raw);
        Self {
            target: header.target,
            address: ((raw >> SIGNAL_ADDRESS_LSB) & 0x3FF) as u16,
            slot: MemorySlot::from_bits(((raw >> SIGNAL_SLOT_LSB) & 0x3) as u8),
            data: ((raw >> DATA_LSB) & 0xFF) as u8,
        }
    }
}

/// The aggregator's view of a SIGNAL frame: a masked output slot update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeOutput {
    pub target: NodeId,
    pub bypass: bool,
    pub mask: u8,
    pub slot: u8,
    pub data: u8,
}

impl NodeFrame for NodeOutput {
    fn header(&self) -> NodeHeader {
        NodeHeader::new(self.target, NodeCommand::Signal)
    }

    fn pack(&self) -> u64 {
        self.header().pack()
            | ((self.bypass as u64) << OUTPUT_BYPASS_LSB)
            | ((self.mask as u64) << OUTPUT_MASK_LSB)
            | ((self.slot as u64 & 0x3) << OUTPUT_SLOT_LSB)
            | ((self.data as u64) << DATA_LSB)
    }

    fn unpack(raw: u64) -> Self {
        let header = NodeHeader::unpack(raw);
        Self {
            target: header.target,
            bypass: (raw >> OUTPUT_BYPASS_LSB) & 1 != 0,
            mask: ((raw >> OUTPUT_MASK_LSB) & 0xFF) as u8,
            slot: ((raw >> OUTPUT_SLOT_LSB) & 0x3) as u8,
            data: ((raw >> DATA_LSB) & 0xFF) as u8,
        }
    }
}

/// An already-encoded frame, carried verbatim
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRaw {
    pub header: NodeHeader,
    pub payload: u64,
}

impl NodeFrame for NodeRaw {
    fn header(&self) -> NodeHeader {
        self.header
    }

    fn pack(&self) -> u64 {
        // The payload carries the full frame; the header bits are re-stamped
        // so a rewritten header wins over stale payload bits.
        (self.payload & !HEADER_MASK) | self.header.pack()
    }

    fn unpack(raw: u64) -> Self {
        Self {
            header: NodeHeader::unpack(raw),
            payload: raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn load_round_trip() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let msg = NodeLoad {
                target: NodeId::new(rng.gen_range(0..16), rng.gen_range(0..16)),
                address: rng.gen_range(0..0x800),
                slot: rng.gen(),
                data: rng.gen(),
            };
            assert_eq!(NodeLoad::unpack(msg.pack()), msg);
        }
    }

    #[test]
    fn signal_round_trip() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..200 {
            let msg = NodeSignal {
                target: NodeId::new(rng.gen_range(0..16), rng.gen_range(0..16)),
                address: rng.gen_range(0..0x400),
                slot: MemorySlot::from_bits(rng.gen()),
                data: rng.gen(),
            };
            assert_eq!(NodeSignal::unpack(msg.pack()), msg);
        }
    }

    #[test]
    fn output_round_trip() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let msg = NodeOutput {
                target: NodeId::new(rng.gen_range(0..16), rng.gen_range(0..16)),
                bypass: rng.gen(),
                mask: rng.gen(),
                slot: rng.gen_range(0..4),
                data: rng.gen(),
            };
            assert_eq!(NodeOutput::unpack(msg.pack()), msg);
        }
    }

    #[test]
    fn output_is_a_reading_of_signal_bits() {
        // A node SENDs a SIGNAL; the aggregator decodes the same 64 bits as
        // an output update. Slot mode and slot index share a field, the mask
        // rides in the low eight address bits.
        let signal = NodeSignal {
            target: NodeId::new(3, 2),
            address: 0x0FF, // bypass clear, mask 0xFF
            slot: MemorySlot::Inverse, // slot index 1
            data: 0xA5,
        };
        let output = NodeOutput::unpack(signal.pack());
        assert!(!output.bypass);
        assert_eq!(output.mask, 0xFF);
        assert_eq!(output.slot, 1);
        assert_eq!(output.data, 0xA5);
        assert_eq!(output.target, signal.target);
    }

    #[test]
    fn header_survives_raw_passthrough() {
        let msg = NodeLoad {
            target: NodeId::new(7, 1),
            address: 0x123,
            slot: true,
            data: 0x5A,
        };
        let raw = NodeRaw::unpack(msg.pack());
        assert_eq!(raw.header.command, NodeCommand::Load);
        assert_eq!(raw.pack(), msg.pack());
        assert_eq!(NodeLoad::unpack(raw.pack()), msg);
    }
}
