//! Bit-exact control-plane message frames
//!
//! Host and mesh exchange 128-bit frames. Requests carry a three-bit command
//! in `[127:125]`, responses a three-bit format in the same position; payload
//! fields sit below, with node-plane frames embedded in the low 64 bits.
use crate::params::Parameters;

const OP_LSB: u32 = 125;

// Request payload fields
const TRIGGER_ACTIVE_LSB: u32 = 124;
const MEMORY_WRITE_LSB: u32 = 124;
const MEMORY_ROW_LSB: u32 = 120;
const MEMORY_COLUMN_LSB: u32 = 116;
const MEMORY_ADDRESS_LSB: u32 = 106;
const MEMORY_SLOT_LSB: u32 = 104;
const MEMORY_DATA_LSB: u32 = 96;

// Response payload fields
const PARAMS_ID_LSB: u32 = 101;
const PARAMS_VER_MAJOR_LSB: u32 = 93;
const PARAMS_VER_MINOR_LSB: u32 = 85;
const PARAMS_TIMER_WIDTH_LSB: u32 = 77;
const PARAMS_ROWS_LSB: u32 = 69;
const PARAMS_COLUMNS_LSB: u32 = 61;
const PARAMS_NODE_REGS_LSB: u32 = 53;

const STATUS_ACTIVE_LSB: u32 = 124;
const STATUS_MESH_IDLE_LSB: u32 = 123;
const STATUS_AGG_IDLE_LSB: u32 = 122;
const STATUS_SEEN_LOW_LSB: u32 = 121;
const STATUS_FIRST_TICK_LSB: u32 = 120;
const STATUS_CYCLE_LSB: u32 = 88;
const STATUS_COUNTDOWN_LSB: u32 = 56;

const OUTPUTS_STAMP_LSB: u32 = 105;
const OUTPUTS_INDEX_LSB: u32 = 97;

/// Number of output bytes carried per OUTPUTS response (96-bit section)
pub const OUTPUT_SECTION_BYTES: usize = 12;

/// Request opcodes, host to device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    ReadParams = 0,
    ReadStatus = 1,
    SoftReset = 2,
    Configure = 3,
    Trigger = 4,
    ToMesh = 5,
    Memory = 6,
}

impl RequestKind {
    fn from_bits(raw: u8) -> Option<Self> {
        match raw & 0x7 {
            0 => Some(RequestKind::ReadParams),
            1 => Some(RequestKind::ReadStatus),
            2 => Some(RequestKind::SoftReset),
            3 => Some(RequestKind::Configure),
            4 => Some(RequestKind::Trigger),
            5 => Some(RequestKind::ToMesh),
            6 => Some(RequestKind::Memory),
            _ => None,
        }
    }
}

/// Response opcodes, device to host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Params = 0,
    Status = 1,
    Outputs = 2,
    FromMesh = 3,
    Padding = 4,
}

impl ResponseKind {
    fn from_bits(raw: u8) -> Option<Self> {
        match raw & 0x7 {
            0 => Some(ResponseKind::Params),
            1 => Some(ResponseKind::Status),
            2 => Some(ResponseKind::Outputs),
            3 => Some(ResponseKind::FromMesh),
            4 => Some(ResponseKind::Padding),
            _ => None,
        }
    }
}

/// A host request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    ReadParams,
    ReadStatus,
    SoftReset,
    /// Set the number of cycles a trigger runs for
    Configure { interval: u32 },
    /// Arm or disarm execution
    Trigger { active: bool },
    /// Carry one node-plane frame into the mesh
    ToMesh { message: u64 },
    /// Direct access to a tile's data memory
    Memory {
        write: bool,
        row: u8,
        column: u8,
        address: u16,
        slot: u8,
        data: u8,
    },
}

impl ControlRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            ControlRequest::ReadParams => RequestKind::ReadParams,
            ControlRequest::ReadStatus => RequestKind::ReadStatus,
            ControlRequest::SoftReset => RequestKind::SoftReset,
            ControlRequest::Configure { .. } => RequestKind::Configure,
            ControlRequest::Trigger { .. } => RequestKind::Trigger,
            ControlRequest::ToMesh { .. } => RequestKind::ToMesh,
            ControlRequest::Memory { .. } => RequestKind::Memory,
        }
    }

    pub fn pack(&self) -> u128 {
        let head = (self.kind() as u128) << OP_LSB;
        match *self {
            ControlRequest::ReadParams
            | ControlRequest::ReadStatus
            | ControlRequest::SoftReset => head,
            ControlRequest::Configure { interval } => head | interval as u128,
            ControlRequest::Trigger { active } => {
                head | ((active as u128) << TRIGGER_ACTIVE_LSB)
            }
            ControlRequest::ToMesh { message } => head | message as u128,
            ControlRequest::Memory {
                write,
                row,
                column,
                address,
                slot,
                data,
            } => {
                head | ((write as u128) << MEMORY_WRITE_LSB)
                    | ((row as u128 & 0xF) << MEMORY_ROW_LSB)
                    | ((column as u128 & 0xF) << MEMORY_COLUMN_LSB)
                    | ((address as u128 & 0x3FF) << MEMORY_ADDRESS_LSB)
                    | ((slot as u128 & 0x3) << MEMORY_SLOT_LSB)
                    | ((data as u128) << MEMORY_DATA_LSB)
            }
        }
    }

    /// Decode a raw frame; `None` for a command outside the request set
    pub fn unpack(raw: u128) -> Option<Self> {
        let kind = RequestKind::from_bits((raw >> OP_LSB) as u8)?;
        Some(match kind {
            RequestKind::ReadParams => ControlRequest::ReadParams,
            RequestKind::ReadStatus => ControlRequest::ReadStatus,
            RequestKind::SoftReset => ControlRequest::SoftReset,
            RequestKind::Configure => ControlRequest::Configure {
                interval: raw as u32,
            },
            RequestKind::Trigger => ControlRequest::Trigger {
                active: (raw >> TRIGGER_ACTIVE_LSB) & 1 != 0,
            },
            RequestKind::ToMesh => ControlRequest::ToMesh {
                message: raw as u64,
            },
            RequestKind::Memory => ControlRequest::Memory {
                write: (raw >> MEMORY_WRITE_LSB) & 1 != 0,
                row: ((raw >> MEMORY_ROW_LSB) & 0xF) as u8,
                column: ((raw >> MEMORY_COLUMN_LSB) & 0xF) as u8,
                address: ((raw >> MEMORY_ADDRESS_LSB) & 0x3FF) as u16,
                slot: ((raw >> MEMORY_SLOT_LSB) & 0x3) as u8,
                data: ((raw >> MEMORY_DATA_LSB) & 0xFF) as u8,
            },
        })
    }
}

/// Device status block carried by a STATUS response
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub active: bool,
    pub mesh_idle: bool,
    pub agg_idle: bool,
    pub seen_low: bool,
    pub first_tick: bool,
    pub cycle: u32,
    pub countdown: u32,
}

/// A device response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlResponse {
    Params(Parameters),
    Status(Status),
    /// One 96-bit section of the output buffer
    Outputs { stamp: u32, index: u8, section: [u8; OUTPUT_SECTION_BYTES] },
    /// One node-plane frame forwarded from the mesh
    FromMesh { message: u64 },
    Padding,
}

impl ControlResponse {
    pub fn kind(&self) -> ResponseKind {
        match self {
            ControlResponse::Params(_) => ResponseKind::Params,
            ControlResponse::Status(_) => ResponseKind::Status,
            ControlResponse::Outputs { .. } => ResponseKind::Outputs,
            ControlResponse::FromMesh { .. } => ResponseKind::FromMesh,
            ControlResponse::Padding => ResponseKind::Padding,
        }
    }

    pub fn pack(&self) -> u128 {
        let head = (self.kind() as u128) << OP_LSB;
        match *self {
            ControlResponse::Params(p) => {
                head | ((p.id as u128 & 0xFF_FFFF) << PARAMS_ID_LSB)
                    | ((p.ver_major as u128) << PARAMS_VER_MAJOR_LSB)
                    | ((p.ver_minor as u128) << PARAMS_VER_MINOR_LSB)
                    | ((p.timer_width as u128) << PARAMS_TIMER_WIDTH_LSB)
                    | ((p.rows as u128) << PARAMS_ROWS_LSB)
                    | ((p.columns as u128) << PARAMS_COLUMNS_LSB)
                    | ((p.node_registers as u128) << PARAMS_NODE_REGS_LSB)
            }
            ControlResponse::Status(s) => {
                head | ((s.active as u128) << STATUS_ACTIVE_LSB)
                    | ((s.mesh_idle as u128) << STATUS_MESH_IDLE_LSB)
                    | ((s.agg_idle as u128) << STATUS_AGG_IDLE_LSB)
                    | ((s.seen_low as u128) << STATUS_SEEN_LOW_LSB)
                    | ((s.first_tick as u128) << STATUS_FIRST_TICK_LSB)
                    | ((s.cycle as u128) << STATUS_CYCLE_LSB)
                    | ((s.countdown as u128) << STATUS_COUNTDOWN_LSB)
            }
            ControlResponse::Outputs { stamp, index, section } => {
                let mut packed = head
                    | ((stamp as u128 & 0xF_FFFF) << OUTPUTS_STAMP_LSB)
                    | ((index as u128) << OUTPUTS_INDEX_LSB);
                for (byte, value) in section.iter().enumerate() {
                    packed |= (*value as u128) << (8 * byte);
                }
                packed
            }
            ControlResponse::FromMesh { message } => head | message as u128,
            ControlResponse::Padding => head,
        }
    }

    /// Decode a raw frame; `None` for a format outside the response set
    pub fn unpack(raw: u128) -> Option<Self> {
        let kind = ResponseKind::from_bits((raw >> OP_LSB) as u8)?;
        Some(match kind {
            ResponseKind::Params => ControlResponse::Params(Parameters {
                id: ((raw >> PARAMS_ID_LSB) & 0xFF_FFFF) as u32,
                ver_major: ((raw >> PARAMS_VER_MAJOR_LSB) & 0xFF) as u8,
                ver_minor: ((raw >> PARAMS_VER_MINOR_LSB) & 0xFF) as u8,
                timer_width: ((raw >> PARAMS_TIMER_WIDTH_LSB) & 0xFF) as u8,
                rows: ((raw >> PARAMS_ROWS_LSB) & 0xFF) as u8,
                columns: ((raw >> PARAMS_COLUMNS_LSB) & 0xFF) as u8,
                node_registers: ((raw >> PARAMS_NODE_REGS_LSB) & 0xFF) as u8,
            }),
            ResponseKind::Status => ControlResponse::Status(Status {
                active: (raw >> STATUS_ACTIVE_LSB) & 1 != 0,
                mesh_idle: (raw >> STATUS_MESH_IDLE_LSB) & 1 != 0,
                agg_idle: (raw >> STATUS_AGG_IDLE_LSB) & 1 != 0,
                seen_low: (raw >> STATUS_SEEN_LOW_LSB) & 1 != 0,
                first_tick: (raw >> STATUS_FIRST_TICK_LSB) & 1 != 0,
                cycle: ((raw >> STATUS_CYCLE_LSB) & 0xFFFF_FFFF) as u32,
                countdown: ((raw >> STATUS_COUNTDOWN_LSB) & 0xFFFF_FFFF) as u32,
            }),
            ResponseKind::Outputs => {
                let mut section = [0u8; OUTPUT_SECTION_BYTES];
                for (byte, value) in section.iter_mut().enumerate() {
                    *value = (raw >> (8 * byte)) as u8;
                }
                ControlResponse::Outputs {
                    stamp: ((raw >> OUTPUTS_STAMP_LSB) & 0xF_FFFF) as u32,
                    index: ((raw >> OUTPUTS_INDEX_LSB) & 0xFF) as u8,
                    section,
                }
            }
            ResponseKind::FromMesh => ControlResponse::FromMesh {
                message: raw as u64,
            },
            ResponseKind::Padding => ControlResponse::Padding,
        })
    }
}
