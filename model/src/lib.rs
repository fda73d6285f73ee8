#[macro_use]
extern crate log;

use std::cell::RefCell;
use std::rc::Rc;

use nexus_core::pipe::{ControlPipe, MessagePipe};

pub mod aggregator;
pub mod control;
pub mod engine;
pub mod isa;
pub mod loader;
pub mod memory;
pub mod mesh;
pub mod node;

/// Shared handle to a node-plane pipe; the write side belongs to exactly one
/// producer and the read side to exactly one consumer, established when the
/// mesh wires neighbours together
pub type PipeHandle = Rc<RefCell<MessagePipe>>;

/// Shared handle to a control-plane pipe
pub type ControlHandle = Rc<RefCell<ControlPipe>>;

pub fn new_pipe() -> PipeHandle {
    Rc::new(RefCell::new(MessagePipe::new()))
}

pub fn new_control_pipe() -> ControlHandle {
    Rc::new(RefCell::new(ControlPipe::new()))
}
