//! The tile instruction set
//!
//! 32-bit instruction words with the opcode in the top three bits. Field
//! positions, LSB-justified:
//!
//! ```text
//! op      : [31:29]  MEMORY=0 TRUTH=1 PICK=2 WAIT=3 SHUFFLE=4/5
//! MEMORY  : mode[28:27] reg[26:24] send_row[23:20] send_col[19:16]
//!           slot[15:14] address[10:0]
//! TRUTH   : src_a[26:24] src_b[23:21] src_c[20:18]
//!           mux_0[17:15] mux_1[14:12] mux_2[11:9] table[7:0]
//! PICK    : slot[28:27] src_a[26:24] mux_0[23:21] mux_1[20:18] mux_2[17:15]
//!           mux_3[14:12] mask[11:8] upper[7] address[6:0]
//! WAIT    : idle[1] pc0[0]
//! SHUFFLE : tgt[29:27] src_a[26:24] mux_7[23:21] ... mux_0[2:0]
//! ```
//!
//! SHUFFLE's target register field spills its top bit into the opcode's LSB,
//! which is why opcodes 4 and 5 decode to the same instruction: a target of
//! 0-3 reads back as opcode 4, a target of 4-6 as opcode 5.
use nexus_core::types::MemorySlot;

const OP_LSB: u32 = 29;

const MEM_MODE_LSB: u32 = 27;
const REG_LSB: u32 = 24;
const SEND_ROW_LSB: u32 = 20;
const SEND_COL_LSB: u32 = 16;
const MEM_SLOT_LSB: u32 = 14;

const TRUTH_SRC_B_LSB: u32 = 21;
const TRUTH_SRC_C_LSB: u32 = 18;
const TRUTH_MUX_0_LSB: u32 = 15;
const TRUTH_MUX_1_LSB: u32 = 12;
const TRUTH_MUX_2_LSB: u32 = 9;

const PICK_SLOT_LSB: u32 = 27;
const PICK_MUX_0_LSB: u32 = 21;
const PICK_MASK_LSB: u32 = 8;
const PICK_UPPER_LSB: u32 = 7;

const WAIT_IDLE_LSB: u32 = 1;
const WAIT_PC0_LSB: u32 = 0;

const SHUFFLE_TGT_LSB: u32 = 27;

/// Sub-operation of the MEMORY opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryMode {
    Load = 0,
    Store = 1,
    Send = 2,
}

impl MemoryMode {
    fn from_bits(raw: u32) -> Option<Self> {
        match raw & 0x3 {
            0 => Some(MemoryMode::Load),
            1 => Some(MemoryMode::Store),
            2 => Some(MemoryMode::Send),
            _ => None,
        }
    }
}

/// One decoded tile instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Memory {
        mode: MemoryMode,
        /// Source register for STORE/SEND, target register for LOAD
        reg: u8,
        /// Target row for SEND; doubles as the store mask's upper nibble
        send_row: u8,
        /// Target column for SEND; doubles as the store mask's lower nibble
        send_col: u8,
        slot: MemorySlot,
        address: u16,
    },
    Truth {
        src_a: u8,
        src_b: u8,
        src_c: u8,
        mux_0: u8,
        mux_1: u8,
        mux_2: u8,
        table: u8,
    },
    Pick {
        slot: MemorySlot,
        src_a: u8,
        mux: [u8; 4],
        mask: u8,
        upper: bool,
        address_6_0: u8,
    },
    Wait { pc0: bool, idle: bool },
    Shuffle { tgt: u8, src_a: u8, mux: [u8; 8] },
}

impl Instruction {
    /// Decode a raw word; `None` for an unknown opcode or memory mode
    pub fn decode(raw: u32) -> Option<Instruction> {
        match (raw >> OP_LSB) & 0x7 {
            0 => Some(Instruction::Memory {
                mode: MemoryMode::from_bits(raw >> MEM_MODE_LSB)?,
                reg: ((raw >> REG_LSB) & 0x7) as u8,
                send_row: ((raw >> SEND_ROW_LSB) & 0xF) as u8,
                send_col: ((raw >> SEND_COL_LSB) & 0xF) as u8,
                slot: MemorySlot::from_bits(((raw >> MEM_SLOT_LSB) & 0x3) as u8),
                address: (raw & 0x7FF) as u16,
            }),
            1 => Some(Instruction::Truth {
                src_a: ((raw >> REG_LSB) & 0x7) as u8,
                src_b: ((raw >> TRUTH_SRC_B_LSB) & 0x7) as u8,
                src_c: ((raw >> TRUTH_SRC_C_LSB) & 0x7) as u8,
                mux_0: ((raw >> TRUTH_MUX_0_LSB) & 0x7) as u8,
                mux_1: ((raw >> TRUTH_MUX_1_LSB) & 0x7) as u8,
                mux_2: ((raw >> TRUTH_MUX_2_LSB) & 0x7) as u8,
                table: (raw & 0xFF) as u8,
            }),
            2 => Some(Instruction::Pick {
                slot: MemorySlot::from_bits(((raw >> PICK_SLOT_LSB) & 0x3) as u8),
                src_a: ((raw >> REG_LSB) & 0x7) as u8,
                mux: [
                    ((raw >> PICK_MUX_0_LSB) & 0x7) as u8,
                    ((raw >> (PICK_MUX_0_LSB - 3)) & 0x7) as u8,
                    ((raw >> (PICK_MUX_0_LSB - 6)) & 0x7) as u8,
                    ((raw >> (PICK_MUX_0_LSB - 9)) & 0x7) as u8,
                ],
                mask: ((raw >> PICK_MASK_LSB) & 0xF) as u8,
                upper: (raw >> PICK_UPPER_LSB) & 1 != 0,
                address_6_0: (raw & 0x7F) as u8,
            }),
            3 => Some(Instruction::Wait {
                pc0: (raw >> WAIT_PC0_LSB) & 1 != 0,
                idle: (raw >> WAIT_IDLE_LSB) & 1 != 0,
            }),
            4 | 5 => {
                let mut mux = [0u8; 8];
                for (position, selector) in mux.iter_mut().enumerate() {
                    *selector = ((raw >> (3 * position)) & 0x7) as u8;
                }
                Some(Instruction::Shuffle {
                    tgt: ((raw >> SHUFFLE_TGT_LSB) & 0x7) as u8,
                    src_a: ((raw >> REG_LSB) & 0x7) as u8,
                    mux,
                })
            }
            _ => None,
        }
    }

    pub fn encode(&self) -> u32 {
        match *self {
            Instruction::Memory {
                mode,
                reg,
                send_row,
                send_col,
                slot,
                address,
            } => {
                ((mode as u32) << MEM_MODE_LSB)
                    | ((reg as u32 & 0x7) << REG_LSB)
                    | ((send_row as u32 & 0xF) << SEND_ROW_LSB)
                    | ((send_col as u32 & 0xF) << SEND_COL_LSB)
                    | ((slot.bits() as u32) << MEM_SLOT_LSB)
                    | (address as u32 & 0x7FF)
            }
            Instruction::Truth {
                src_a,
                src_b,
                src_c,
                mux_0,
                mux_1,
                mux_2,
                table,
            } => {
                (1 << OP_LSB)
                    | ((src_a as u32 & 0x7) << REG_LSB)
                    | ((src_b as u32 & 0x7) << TRUTH_SRC_B_LSB)
                    | ((src_c as u32 & 0x7) << TRUTH_SRC_C_LSB)
                    | ((mux_0 as u32 & 0x7) << TRUTH_MUX_0_LSB)
                    | ((mux_1 as u32 & 0x7) << TRUTH_MUX_1_LSB)
                    | ((mux_2 as u32 & 0x7) << TRUTH_MUX_2_LSB)
                    | (table as u32)
            }
            Instruction::Pick {
                slot,
                src_a,
                mux,
                mask,
                upper,
                address_6_0,
            } => {
                (2 << OP_LSB)
                    | ((slot.bits() as u32) << PICK_SLOT_LSB)
                    | ((src_a as u32 & 0x7) << REG_LSB)
                    | ((mux[0] as u32 & 0x7) << PICK_MUX_0_LSB)
                    | ((mux[1] as u32 & 0x7) << (PICK_MUX_0_LSB - 3))
                    | ((mux[2] as u32 & 0x7) << (PICK_MUX_0_LSB - 6))
                    | ((mux[3] as u32 & 0x7) << (PICK_MUX_0_LSB - 9))
                    | ((mask as u32 & 0xF) << PICK_MASK_LSB)
                    | ((upper as u32) << PICK_UPPER_LSB)
                    | (address_6_0 as u32 & 0x7F)
            }
            Instruction::Wait { pc0, idle } => {
                (3 << OP_LSB) | ((idle as u32) << WAIT_IDLE_LSB) | ((pc0 as u32) << WAIT_PC0_LSB)
            }
            Instruction::Shuffle { tgt, src_a, mux } => {
                let mut raw = (0b10 << 30)
                    | ((tgt as u32 & 0x7) << SHUFFLE_TGT_LSB)
                    | ((src_a as u32 & 0x7) << REG_LSB);
                for (position, selector) in mux.iter().enumerate() {
                    raw |= (*selector as u32 & 0x7) << (3 * position);
                }
                raw
            }
        }
    }
}

/// The word written to instruction address 0 on reset: wait, wrap to 0, idle
pub const RESET_WORD: u32 = (3 << OP_LSB) | (1 << WAIT_IDLE_LSB) | (1 << WAIT_PC0_LSB);
