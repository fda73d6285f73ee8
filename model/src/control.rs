//! Host-facing control plane
//!
//! Bridges the 128-bit host request/response frames onto the node plane.
//! Parameter and status reads answer from local state, mesh-bound requests
//! unwrap into the ingress pipe, and anything the mesh pushes back towards
//! the host is wrapped in FROM_MESH responses. The last pushed output
//! snapshot is held so repeated states stay quiet on the host link.
use nexus_core::control::{
    ControlRequest, ControlResponse, Status, OUTPUT_SECTION_BYTES,
};
use nexus_core::message::{NodeCommand, NodeFrame, NodeRaw, NodeSignal};
use nexus_core::params::Parameters;
use nexus_core::types::{MemorySlot, NodeId};

use crate::{new_control_pipe, ControlHandle, PipeHandle};

pub struct Controller {
    rows: u32,
    columns: u32,
    to_host: ControlHandle,
    from_host: ControlHandle,
    to_mesh: Option<PipeHandle>,
    from_mesh: Option<PipeHandle>,
    last_output: Vec<u8>,
    status: Status,
    soft_reset: bool,
}

impl Controller {
    pub fn new(rows: u32, columns: u32) -> Self {
        Self {
            rows,
            columns,
            to_host: new_control_pipe(),
            from_host: new_control_pipe(),
            to_mesh: None,
            from_mesh: None,
            last_output: Vec::new(),
            status: Status::default(),
            soft_reset: false,
        }
    }

    pub fn attach_to_mesh(&mut self, pipe: PipeHandle) {
        self.to_mesh = Some(pipe);
    }

    pub fn attach_from_mesh(&mut self, pipe: PipeHandle) {
        self.from_mesh = Some(pipe);
    }

    pub fn to_host(&self) -> ControlHandle {
        self.to_host.clone()
    }

    pub fn from_host(&self) -> ControlHandle {
        self.from_host.clone()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn reset(&mut self) {
        self.last_output.clear();
        self.status = Status::default();
        self.to_host.borrow_mut().reset();
        self.from_host.borrow_mut().reset();
        if let Some(pipe) = &self.to_mesh {
            pipe.borrow_mut().reset();
        }
        if let Some(pipe) = &self.from_mesh {
            pipe.borrow_mut().reset();
        }
    }

    /// Host pipes are excluded here as they are not part of the execution loop
    pub fn is_idle(&self) -> bool {
        let to_mesh_idle = self
            .to_mesh
            .as_ref()
            .map(|pipe| pipe.borrow().is_idle())
            .unwrap_or(true);
        let from_mesh_idle = self
            .from_mesh
            .as_ref()
            .map(|pipe| pipe.borrow().is_idle())
            .unwrap_or(true);
        to_mesh_idle && from_mesh_idle
    }

    /// True once per SOFT_RESET request; the engine applies the reset
    pub fn take_soft_reset(&mut self) -> bool {
        std::mem::take(&mut self.soft_reset)
    }

    /// Drop the held output snapshot and status, as a soft reset requires
    pub fn clear_snapshot(&mut self) {
        self.last_output.clear();
        self.status = Status::default();
    }

    /// Called by the engine at the end of every completed cycle
    pub fn end_of_cycle(&mut self, mesh_idle: bool, agg_idle: bool) {
        self.status.mesh_idle = mesh_idle;
        self.status.agg_idle = agg_idle;
        self.status.cycle = self.status.cycle.wrapping_add(1);
        self.status.first_tick = false;
        if self.status.active && self.status.countdown > 0 {
            self.status.countdown -= 1;
            if self.status.countdown == 0 {
                self.status.active = false;
            }
        }
    }

    pub fn step(&mut self) {
        // Digest all requests from the host
        loop {
            let request = {
                let mut pipe = self.from_host.borrow_mut();
                if pipe.is_idle() {
                    break;
                }
                assert!(pipe.next_is_request(), "response arrived on the host inbound");
                trace!("Handling host request {:?}", pipe.next_request());
                pipe.dequeue_request()
            };
            self.handle_request(request);
        }

        // Wrap everything the mesh pushed back and forward it to the host
        loop {
            let entry = {
                let Some(pipe) = &self.from_mesh else { break };
                let mut borrowed = pipe.borrow_mut();
                if borrowed.is_idle() {
                    break;
                }
                let command = borrowed.next_type();
                assert!(
                    matches!(command, NodeCommand::Load | NodeCommand::Signal),
                    "unsupported message from mesh"
                );
                borrowed.dequeue_raw()
            };
            self.to_host
                .borrow_mut()
                .enqueue_response(&ControlResponse::FromMesh {
                    message: entry.encoded,
                });
        }
    }

    fn handle_request(&mut self, request: ControlRequest) {
        match request {
            ControlRequest::ReadParams => {
                let response = ControlResponse::Params(Parameters::for_mesh(
                    self.rows as u8,
                    self.columns as u8,
                ));
                self.to_host.borrow_mut().enqueue_response(&response);
            }
            ControlRequest::ReadStatus => {
                let response = ControlResponse::Status(self.status);
                self.to_host.borrow_mut().enqueue_response(&response);
            }
            ControlRequest::SoftReset => {
                debug!("Soft reset requested");
                self.soft_reset = true;
            }
            ControlRequest::Configure { interval } => {
                debug!("Configured run interval of {interval} cycles");
                self.status.countdown = interval;
            }
            ControlRequest::Trigger { active } => {
                debug!("Trigger {}", if active { "armed" } else { "disarmed" });
                self.status.active = active;
                self.status.first_tick = active;
            }
            ControlRequest::ToMesh { message } => {
                let raw = NodeRaw::unpack(message);
                self.mesh_pipe().borrow_mut().enqueue(&raw);
            }
            ControlRequest::Memory {
                write,
                row,
                column,
                address,
                slot,
                data,
            } => {
                if write {
                    let msg = NodeSignal {
                        target: NodeId::new(row, column),
                        address,
                        slot: MemorySlot::from_bits(slot),
                        data,
                    };
                    self.mesh_pipe().borrow_mut().enqueue(&msg);
                } else {
                    // The modelled hardware has no memory read-back path
                    warn!("Memory read requests are not supported; answering padding");
                    self.to_host
                        .borrow_mut()
                        .enqueue_response(&ControlResponse::Padding);
                }
            }
        }
    }

    fn mesh_pipe(&self) -> PipeHandle {
        self.to_mesh
            .clone()
            .expect("controller stepped without a mesh attachment")
    }

    /// Push OUTPUTS responses covering `outputs` whenever it differs from the
    /// last snapshot, then hold the new state
    pub fn update_outputs(&mut self, outputs: &[u8]) {
        // The reset snapshot is all zeroes
        if self.last_output.len() != outputs.len() {
            self.last_output = vec![0; outputs.len()];
        }
        if self.last_output.as_slice() == outputs {
            return;
        }

        let sections = outputs.len().div_ceil(OUTPUT_SECTION_BYTES);
        for index in 0..sections {
            let offset = index * OUTPUT_SECTION_BYTES;
            let mut section = [0u8; OUTPUT_SECTION_BYTES];
            let take = OUTPUT_SECTION_BYTES.min(outputs.len() - offset);
            section[..take].copy_from_slice(&outputs[offset..offset + take]);
            let response = ControlResponse::Outputs {
                stamp: self.status.cycle & 0xF_FFFF,
                index: index as u8,
                section,
            };
            self.to_host.borrow_mut().enqueue_response(&response);
        }
        self.last_output = outputs.to_vec();
    }
}
