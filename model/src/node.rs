//! One tile of the mesh
//!
//! A node owns its four inbound pipes; outbound handles are attached by the
//! mesh and point at the matching inbound pipes of its neighbours. Execution
//! is a two-phase step: digest inbound messages (writing instruction or data
//! memory, forwarding anything addressed elsewhere), then evaluate the
//! instruction stream until a WAIT.
use std::path::PathBuf;

use nexus_core::message::{NodeCommand, NodeLoad, NodeSignal};
use nexus_core::types::{Direction, NodeId};

use crate::isa::{Instruction, MemoryMode, RESET_WORD};
use crate::memory::Memory;
use crate::{new_pipe, PipeHandle};

pub struct Node {
    id: NodeId,
    inbound: [PipeHandle; 4],
    outbound: [Option<PipeHandle>; 4],
    inst_memory: Memory<u32>,
    data_memory: Memory<u16>,
    en_dump: bool,
    idle: bool,
    waiting: bool,
    cycle: u32,
    pc: u32,
    slot: bool,
    restart_pc: u32,
    next_pc: u32,
    next_slot: bool,
    registers: [u8; 8],
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        let mut node = Self {
            id,
            inbound: [new_pipe(), new_pipe(), new_pipe(), new_pipe()],
            outbound: [None, None, None, None],
            inst_memory: Memory::new(),
            data_memory: Memory::new(),
            en_dump: false,
            idle: true,
            waiting: true,
            cycle: 0,
            pc: 0,
            slot: false,
            restart_pc: 0,
            next_pc: 0,
            next_slot: false,
            registers: [0; 8],
        };
        node.reset();
        node
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Attach an outbound pipe; each direction can be attached once
    pub fn attach(&mut self, dirx: Direction, pipe: PipeHandle) {
        let slot = &mut self.outbound[dirx.index()];
        assert!(slot.is_none(), "outbound pipe attached twice");
        *slot = Some(pipe);
    }

    /// The inbound pipe facing `dirx`, for a neighbour (or the host) to feed
    pub fn inbound_pipe(&self, dirx: Direction) -> PipeHandle {
        self.inbound[dirx.index()].clone()
    }

    /// Zero all state and park an idle wrap-to-zero WAIT at address 0
    pub fn reset(&mut self) {
        self.idle = true;
        self.waiting = true;
        self.cycle = 0;
        self.pc = 0;
        self.slot = false;
        self.restart_pc = 0;
        self.next_pc = 0;
        self.next_slot = false;
        self.registers = [0; 8];
        self.inst_memory.clear();
        self.data_memory.clear();
        for pipe in &self.inbound {
            pipe.borrow_mut().reset();
        }
        self.inst_memory.write_word(0, RESET_WORD);
    }

    /// Idle means parked on an idle WAIT with nothing queued inbound
    pub fn is_idle(&self) -> bool {
        self.idle && self.inbound.iter().all(|pipe| pipe.borrow().is_idle())
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    pub fn set_dumping(&mut self, enable: bool) {
        self.en_dump = enable;
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn slot(&self) -> bool {
        self.slot
    }

    pub fn register(&self, index: usize) -> u8 {
        self.registers[index]
    }

    pub fn inst_memory(&self) -> &Memory<u32> {
        &self.inst_memory
    }

    pub fn data_memory(&self) -> &Memory<u16> {
        &self.data_memory
    }

    pub fn read_data_memory(&self, address: u32) -> u16 {
        self.data_memory.read(address)
    }

    /// One step of execution; `trigger` marks the start of a new tick
    pub fn step(&mut self, trigger: bool) {
        trace!(
            "({}, {}) Step {} trigger",
            self.id.row,
            self.id.column,
            if trigger { "with" } else { "without" }
        );

        // A global trigger adopts the next PC and slot before digesting, so
        // inbound state writes land against the new cycle's slot
        if trigger {
            self.pc = self.next_pc;
            self.restart_pc = self.next_pc;
            self.slot = self.next_slot;
            self.cycle += 1;
            trace!(
                "({}, {}) Triggered @ {:#x} with slot {}",
                self.id.row,
                self.id.column,
                self.pc,
                self.slot as u32
            );
        }

        let comb_inputs = self.digest();

        if trigger || comb_inputs {
            self.evaluate(trigger);
        }
    }

    /// Drain every inbound pipe; returns whether any data-memory input changed
    fn digest(&mut self) -> bool {
        let mut curr_delta = false;

        for index in 0..4 {
            loop {
                let pipe = self.inbound[index].clone();
                let header = {
                    let borrowed = pipe.borrow();
                    if borrowed.is_idle() {
                        break;
                    }
                    borrowed.next_header()
                };

                if header.target != self.id {
                    // Not ours; pass it along towards its target
                    let entry = pipe.borrow_mut().dequeue_raw();
                    self.route(header.target).borrow_mut().enqueue_raw(entry);
                    continue;
                }

                match header.command {
                    NodeCommand::Load => {
                        let msg: NodeLoad = pipe.borrow_mut().dequeue();
                        let half_word = if msg.address & 1 != 0 { 16 } else { 0 };
                        let shift = half_word + if msg.slot { 8 } else { 0 };
                        let address = (msg.address >> 1) as u32;
                        let data = (msg.data as u32) << shift;
                        let mask = 0xFFu32 << shift;
                        trace!(
                            "({}, {}) [INSTR] Writing {:#010x} to {:#x} mask {:#010x}",
                            self.id.row,
                            self.id.column,
                            data,
                            address,
                            mask
                        );
                        self.inst_memory.write(address, data, mask);
                    }
                    NodeCommand::Signal => {
                        let msg: NodeSignal = pipe.borrow_mut().dequeue();
                        let slot = msg.slot.resolve(self.slot);
                        let shift = if slot { 8 } else { 0 };
                        trace!(
                            "({}, {}) [SIGNAL] Writing {:#x} to {:#x} slot {:?} (-> {})",
                            self.id.row,
                            self.id.column,
                            msg.data,
                            msg.address,
                            msg.slot,
                            slot as u32
                        );
                        curr_delta |= self.data_memory.write(
                            msg.address as u32,
                            (msg.data as u16) << shift,
                            0xFFu16 << shift,
                        );
                    }
                    NodeCommand::Raw => panic!(
                        "({}, {}) received an unsupported command",
                        self.id.row, self.id.column
                    ),
                }
            }
        }

        curr_delta
    }

    /// Run the instruction stream until a WAIT sets the waiting flag
    fn evaluate(&mut self, trigger: bool) {
        assert!(self.waiting, "evaluate entered while still executing");

        // Combinational re-entry rewinds to the last triggered PC
        if !trigger {
            self.pc = self.restart_pc;
        }

        self.idle = false;
        self.waiting = false;

        while !self.waiting {
            let raw = self.inst_memory.read(self.pc);
            let instruction = Instruction::decode(raw).unwrap_or_else(|| {
                panic!(
                    "({}, {}) undecodable instruction {:#010x} @ {:#x}",
                    self.id.row, self.id.column, raw, self.pc
                )
            });
            self.execute(instruction);
            self.pc += 1;
        }

        if self.en_dump {
            let path = PathBuf::from(format!("dump_{}_{}.txt", self.id.row, self.id.column));
            if let Err(err) = self.data_memory.dump(&path, self.cycle) {
                warn!("Failed to write memory dump: {err}");
            }
        }
    }

    fn execute(&mut self, instruction: Instruction) {
        match instruction {
            Instruction::Memory {
                mode,
                reg,
                send_row,
                send_col,
                slot,
                address,
            } => {
                let resolved = slot.resolve(self.slot);
                let shift = if resolved { 8 } else { 0 };
                match mode {
                    MemoryMode::Load => {
                        // Loads cannot touch the truth-table shift register
                        assert!(reg != 7, "LOAD targets register 7");
                        let data = self.data_memory.read(address as u32);
                        self.registers[reg as usize] = ((data >> shift) & 0xFF) as u8;
                        trace!(
                            "({}, {}) @ {:#x} Load into R{} from addr={:#x} ({:#04x})",
                            self.id.row,
                            self.id.column,
                            self.pc,
                            reg,
                            address,
                            self.registers[reg as usize]
                        );
                    }
                    MemoryMode::Store => {
                        let data = self.registers[reg as usize] as u16;
                        let mask = (((send_row as u16) << 4) | send_col as u16) & 0xFF;
                        self.data_memory
                            .write(address as u32, data << shift, mask << shift);
                        trace!(
                            "({}, {}) @ {:#x} Store from R{} into addr={:#x} data={:#x} mask={:#x}",
                            self.id.row,
                            self.id.column,
                            self.pc,
                            reg,
                            address,
                            data,
                            mask
                        );
                    }
                    MemoryMode::Send => {
                        let msg = NodeSignal {
                            target: NodeId::new(send_row, send_col),
                            address,
                            // Forwarded unresolved; the receiving tile applies
                            // its own slot state
                            slot,
                            data: self.registers[reg as usize],
                        };
                        trace!(
                            "({}, {}) @ {:#x} Send {:#04x} to ({}, {}) address={:#x}",
                            self.id.row,
                            self.id.column,
                            self.pc,
                            msg.data,
                            send_row,
                            send_col,
                            address
                        );
                        self.route(msg.target).borrow_mut().enqueue(&msg);
                    }
                }
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
                let bit_a = (self.registers[src_a as usize] >> mux_0) & 1 != 0;
                let bit_b = (self.registers[src_b as usize] >> mux_1) & 1 != 0;
                let bit_c = (self.registers[src_c as usize] >> mux_2) & 1 != 0;
                // Successive shifts index the table by (c, b, a)
                let mut shifted = table;
                if bit_a {
                    shifted >>= 1;
                }
                if bit_b {
                    shifted >>= 2;
                }
                if bit_c {
                    shifted >>= 4;
                }
                let result = shifted & 1;
                self.registers[7] = (self.registers[7] << 1) | result;
                trace!(
                    "({}, {}) @ {:#x} Truth table {:#04x} inputs ({}, {}, {}) -> {}",
                    self.id.row,
                    self.id.column,
                    self.pc,
                    table,
                    bit_a as u32,
                    bit_b as u32,
                    bit_c as u32,
                    result
                );
            }
            Instruction::Pick {
                slot,
                src_a,
                mux,
                mask,
                upper,
                address_6_0,
            } => {
                let value = self.registers[src_a as usize];
                let bits: Vec<u16> = mux
                    .iter()
                    .map(|selector| ((value >> selector) & 1) as u16)
                    .collect();
                // The picked nibble lands in both halves of the byte; the
                // mask then selects which half survives
                let nibble = (bits[3] << 3) | (bits[2] << 2) | (bits[1] << 1) | bits[0];
                let picked = (nibble << 4) | nibble;
                let aligned_mask = if upper { (mask as u16) << 4 } else { mask as u16 };
                let resolved = slot.resolve(self.slot);
                let shift = if resolved { 8 } else { 0 };
                let address = 64 + address_6_0 as u32;
                trace!(
                    "({}, {}) @ {:#x} Pick R{} data={:#04x} mask={:#x} bits={} address={:#x}",
                    self.id.row,
                    self.id.column,
                    self.pc,
                    src_a,
                    picked,
                    mask,
                    if upper { "7:4" } else { "3:0" },
                    address
                );
                self.data_memory
                    .write(address, picked << shift, aligned_mask << shift);
            }
            Instruction::Wait { pc0, idle } => {
                self.waiting = true;
                self.idle = idle;
                self.next_pc = if pc0 { 0 } else { self.pc + 1 };
                self.next_slot = !self.slot;
                trace!(
                    "({}, {}) @ {:#x} Waiting to go to {:#x} {} idle",
                    self.id.row,
                    self.id.column,
                    self.pc,
                    self.next_pc,
                    if self.idle { "with" } else { "without" }
                );
            }
            Instruction::Shuffle { tgt, src_a, mux } => {
                // Shuffles cannot touch the truth-table shift register
                assert!(tgt != 7, "SHUFFLE targets register 7");
                let value = self.registers[src_a as usize];
                let mut gathered = 0u8;
                for (position, selector) in mux.iter().enumerate() {
                    gathered |= ((value >> selector) & 1) << position;
                }
                self.registers[tgt as usize] = gathered;
                trace!(
                    "({}, {}) @ {:#x} Shuffle R{} ({:#04x}) -> R{} ({:#04x})",
                    self.id.row,
                    self.id.column,
                    self.pc,
                    src_a,
                    value,
                    tgt,
                    gathered
                );
            }
        }
    }

    /// Pick the outbound pipe for a target, starting from the preferred
    /// direction and rotating clockwise over the connected pipes
    fn route(&self, target: NodeId) -> PipeHandle {
        assert!(target != self.id, "message routed to self");
        let start = if target.column < self.id.column {
            Direction::West
        } else if target.column > self.id.column {
            Direction::East
        } else if target.row < self.id.row {
            Direction::North
        } else {
            Direction::South
        };
        let mut dirx = start;
        for _ in 0..4 {
            if let Some(pipe) = &self.outbound[dirx.index()] {
                return pipe.clone();
            }
            dirx = dirx.clockwise();
        }
        panic!(
            "({}, {}) has no connected pipe towards ({}, {})",
            self.id.row, self.id.column, target.row, target.column
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::message::NodeFrame;
    use nexus_core::types::MemorySlot;

    fn fresh_node() -> Node {
        Node::new(NodeId::new(0, 0))
    }

    fn push_inbound<T: NodeFrame>(node: &Node, msg: &T) {
        node.inbound_pipe(Direction::North).borrow_mut().enqueue(msg);
    }

    #[test]
    fn reset_parks_an_idle_wait() {
        let node = fresh_node();
        assert!(node.is_idle());
        assert!(node.is_waiting());
        assert_eq!(node.inst_memory().read(0), RESET_WORD);
    }

    #[test]
    fn wait_only_node_toggles_slot_every_tick() {
        let mut node = fresh_node();
        // The first trigger adopts the reset slot; each WAIT schedules the
        // opposite slot for the following tick
        node.step(true);
        assert!(!node.slot());
        assert!(node.is_idle());
        node.step(true);
        assert!(node.slot());
        assert!(node.is_idle());
        node.step(true);
        assert!(!node.slot());
        assert!(node.is_idle());
    }

    #[test]
    fn load_sequencing_packs_little_endian() {
        let mut node = fresh_node();
        let bytes = [0xAAu8, 0xBB, 0xCC, 0xDD];
        for (idx, data) in bytes.iter().enumerate() {
            push_inbound(
                &node,
                &NodeLoad {
                    target: NodeId::new(0, 0),
                    address: (idx / 2) as u16,
                    slot: idx % 2 == 1,
                    data: *data,
                },
            );
        }
        node.step(true);
        assert_eq!(node.inst_memory().read(0), 0xDDCCBBAA);
    }

    #[test]
    fn signal_writes_resolve_the_slot() {
        let mut node = fresh_node();
        push_inbound(
            &node,
            &NodeSignal {
                target: NodeId::new(0, 0),
                address: 5,
                slot: MemorySlot::Upper,
                data: 0x7E,
            },
        );
        node.step(true);
        assert_eq!(node.read_data_memory(5), 0x7E00);

        push_inbound(
            &node,
            &NodeSignal {
                target: NodeId::new(0, 0),
                address: 5,
                slot: MemorySlot::Lower,
                data: 0x81,
            },
        );
        node.step(true);
        assert_eq!(node.read_data_memory(5), 0x7E81);
    }

    #[test]
    fn misaddressed_messages_are_forwarded() {
        let mut node = fresh_node();
        let east = new_pipe();
        node.attach(Direction::East, east.clone());
        let msg = NodeSignal {
            target: NodeId::new(0, 3),
            address: 1,
            slot: MemorySlot::Preserve,
            data: 0x11,
        };
        push_inbound(&node, &msg);
        node.step(true);
        assert_eq!(east.borrow_mut().dequeue::<NodeSignal>(), msg);
    }

    #[test]
    fn routing_rotates_clockwise_past_unconnected_pipes() {
        let mut node = Node::new(NodeId::new(1, 1));
        // Only a south pipe is connected; a westward message must still leave
        let south = new_pipe();
        node.attach(Direction::South, south.clone());
        let msg = NodeSignal {
            target: NodeId::new(1, 0),
            address: 0,
            slot: MemorySlot::Preserve,
            data: 0x22,
        };
        push_inbound(&node, &msg);
        node.step(true);
        assert!(!south.borrow().is_idle());
    }

    #[test]
    #[should_panic(expected = "routed to self")]
    fn self_routing_is_a_bug() {
        let node = fresh_node();
        node.route(NodeId::new(0, 0));
    }

    /// Run a program: LOAD a byte from data memory, TRUTH three bits through
    /// an AND table, SEND the shift register, WAIT
    #[test]
    fn executes_a_program_to_the_wait() {
        let mut node = fresh_node();
        let east = new_pipe();
        node.attach(Direction::East, east.clone());

        let program = [
            Instruction::Memory {
                mode: MemoryMode::Load,
                reg: 0,
                send_row: 0,
                send_col: 0,
                slot: MemorySlot::Lower,
                address: 16,
            },
            Instruction::Truth {
                src_a: 0,
                src_b: 0,
                src_c: 0,
                mux_0: 0,
                mux_1: 1,
                mux_2: 2,
                // AND of the three selected bits
                table: 0x80,
            },
            Instruction::Memory {
                mode: MemoryMode::Send,
                reg: 7,
                send_row: 0,
                send_col: 1,
                slot: MemorySlot::Preserve,
                address: 32,
            },
            Instruction::Wait {
                pc0: true,
                idle: true,
            },
        ];
        for (offset, instr) in program.iter().enumerate() {
            node.inst_memory.write_word(offset as u32, instr.encode());
        }
        // All three low bits set so the AND table yields 1
        node.data_memory.write_word(16, 0x0007);

        node.step(true);

        assert!(node.is_waiting());
        assert_eq!(node.register(0), 0x07);
        assert_eq!(node.register(7), 0x01);
        let sent: NodeSignal = east.borrow_mut().dequeue();
        assert_eq!(sent.target, NodeId::new(0, 1));
        assert_eq!(sent.address, 32);
        assert_eq!(sent.data, 0x01);
        // Wrapping WAIT: the next trigger restarts at address 0
        node.step(true);
        assert_eq!(node.register(7), 0x03);
    }

    #[test]
    fn store_with_zero_mask_is_a_no_op() {
        let mut node = fresh_node();
        node.data_memory.write_word(8, 0x1234);
        let program = [
            Instruction::Memory {
                mode: MemoryMode::Store,
                reg: 0,
                send_row: 0,
                send_col: 0,
                slot: MemorySlot::Lower,
                address: 8,
            },
            Instruction::Wait {
                pc0: true,
                idle: true,
            },
        ];
        for (offset, instr) in program.iter().enumerate() {
            node.inst_memory.write_word(offset as u32, instr.encode());
        }
        node.step(true);
        assert_eq!(node.read_data_memory(8), 0x1234);
    }

    #[test]
    fn pick_writes_the_masked_nibble() {
        let mut node = fresh_node();
        let program = [
            Instruction::Memory {
                mode: MemoryMode::Load,
                reg: 1,
                send_row: 0,
                send_col: 0,
                slot: MemorySlot::Lower,
                address: 16,
            },
            Instruction::Pick {
                slot: MemorySlot::Lower,
                src_a: 1,
                mux: [0, 1, 2, 3],
                mask: 0xF,
                upper: false,
                address_6_0: 2,
            },
            Instruction::Wait {
                pc0: true,
                idle: true,
            },
        ];
        for (offset, instr) in program.iter().enumerate() {
            node.inst_memory.write_word(offset as u32, instr.encode());
        }
        node.data_memory.write_word(16, 0x000A);
        node.step(true);
        // Bits 3..0 of 0xA picked in order land as 0b1010 in the low nibble
        assert_eq!(node.read_data_memory(66), 0x000A);
    }

    #[test]
    fn shuffle_rearranges_bits() {
        let mut node = fresh_node();
        let program = [
            Instruction::Memory {
                mode: MemoryMode::Load,
                reg: 2,
                send_row: 0,
                send_col: 0,
                slot: MemorySlot::Lower,
                address: 16,
            },
            Instruction::Shuffle {
                tgt: 3,
                src_a: 2,
                // Reverse the byte
                mux: [7, 6, 5, 4, 3, 2, 1, 0],
            },
            Instruction::Wait {
                pc0: true,
                idle: true,
            },
        ];
        for (offset, instr) in program.iter().enumerate() {
            node.inst_memory.write_word(offset as u32, instr.encode());
        }
        node.data_memory.write_word(16, 0x00B1); // 0b1011_0001
        node.step(true);
        assert_eq!(node.register(3), 0x8D); // 0b1000_1101
    }
}
