//! Per-column output aggregator
//!
//! Sits on the south edge of its column, absorbing SIGNAL traffic addressed
//! to it as masked writes into a small bank of output slots. Traffic for
//! other columns, bypass-flagged frames, and everything arriving from the
//! neighbouring aggregator is forwarded along the chain towards the host.
use nexus_core::message::{NodeCommand, NodeFrame, NodeOutput};
use nexus_core::params::AGGREGATOR_SLOTS;
use nexus_core::types::NodeId;

use crate::{new_pipe, PipeHandle};

pub struct Aggregator {
    id: NodeId,
    inbound_mesh: PipeHandle,
    inbound_neighbour: PipeHandle,
    outbound: Option<PipeHandle>,
    outputs: [u8; AGGREGATOR_SLOTS],
}

impl Aggregator {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            inbound_mesh: new_pipe(),
            inbound_neighbour: new_pipe(),
            outbound: None,
            outputs: [0; AGGREGATOR_SLOTS],
        }
    }

    pub fn set_node_id(&mut self, id: NodeId) {
        self.id = id;
    }

    /// Attach the outbound pipe (the next aggregator in the chain, or the
    /// host egress for column zero)
    pub fn attach(&mut self, pipe: PipeHandle) {
        self.outbound = Some(pipe);
    }

    pub fn pipe_mesh(&self) -> PipeHandle {
        self.inbound_mesh.clone()
    }

    pub fn pipe_neighbour(&self) -> PipeHandle {
        self.inbound_neighbour.clone()
    }

    pub fn outputs(&self) -> &[u8; AGGREGATOR_SLOTS] {
        &self.outputs
    }

    pub fn reset(&mut self) {
        self.inbound_mesh.borrow_mut().reset();
        self.inbound_neighbour.borrow_mut().reset();
        self.outputs = [0; AGGREGATOR_SLOTS];
    }

    pub fn is_idle(&self) -> bool {
        self.inbound_mesh.borrow().is_idle() && self.inbound_neighbour.borrow().is_idle()
    }

    pub fn step(&mut self) {
        let outbound = self
            .outbound
            .clone()
            .expect("aggregator stepped without an outbound pipe");

        // Digest messages arriving from the mesh
        loop {
            let header = {
                let pipe = self.inbound_mesh.borrow();
                if pipe.is_idle() {
                    break;
                }
                pipe.next_header()
            };
            let entry = self.inbound_mesh.borrow_mut().dequeue_raw();
            if header.target.column == self.id.column && header.command == NodeCommand::Signal {
                let output = NodeOutput::unpack(entry.encoded);
                if output.bypass {
                    // Bypass traffic goes to the host untouched
                    outbound.borrow_mut().enqueue_raw(entry);
                } else {
                    let slot = output.slot as usize % AGGREGATOR_SLOTS;
                    self.outputs[slot] =
                        (output.data & output.mask) | (self.outputs[slot] & !output.mask);
                    trace!(
                        "Aggregator {} slot {} <= {:#04x} mask {:#04x}",
                        self.id.column,
                        slot,
                        output.data,
                        output.mask
                    );
                }
            } else {
                outbound.borrow_mut().enqueue_raw(entry);
            }
        }

        // Forward messages arriving from the neighbour
        loop {
            let entry = {
                let mut pipe = self.inbound_neighbour.borrow_mut();
                if pipe.is_idle() {
                    break;
                }
                pipe.dequeue_raw()
            };
            outbound.borrow_mut().enqueue_raw(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::message::NodeSignal;
    use nexus_core::types::MemorySlot;

    fn harness() -> (Aggregator, PipeHandle) {
        let mut aggregator = Aggregator::new(NodeId::new(3, 2));
        let host = new_pipe();
        aggregator.attach(host.clone());
        (aggregator, host)
    }

    fn output_frame(column: u8, slot: u8, mask: u8, data: u8, bypass: bool) -> NodeOutput {
        NodeOutput {
            target: NodeId::new(3, column),
            bypass,
            mask,
            slot,
            data,
        }
    }

    #[test]
    fn masked_slot_writes() {
        let (mut aggregator, host) = harness();
        aggregator
            .pipe_mesh()
            .borrow_mut()
            .enqueue(&output_frame(2, 0, 0xFF, 0x5A, false));
        aggregator
            .pipe_mesh()
            .borrow_mut()
            .enqueue(&output_frame(2, 1, 0xFF, 0xA5, false));
        aggregator.step();
        assert_eq!(aggregator.outputs()[0], 0x5A);
        assert_eq!(aggregator.outputs()[1], 0xA5);

        // Partial mask merges with the held value
        aggregator
            .pipe_mesh()
            .borrow_mut()
            .enqueue(&output_frame(2, 0, 0x0F, 0x3C, false));
        aggregator.step();
        assert_eq!(aggregator.outputs()[0], 0x5C);
        assert!(host.borrow().is_idle());
    }

    #[test]
    fn bypass_frames_reach_the_host() {
        let (mut aggregator, host) = harness();
        let frame = output_frame(2, 0, 0xFF, 0x99, true);
        aggregator.pipe_mesh().borrow_mut().enqueue(&frame);
        aggregator.step();
        assert_eq!(aggregator.outputs()[0], 0);
        assert_eq!(host.borrow_mut().dequeue::<NodeOutput>(), frame);
    }

    #[test]
    fn other_columns_are_forwarded() {
        let (mut aggregator, host) = harness();
        let msg = NodeSignal {
            target: NodeId::new(3, 0),
            address: 9,
            slot: MemorySlot::Preserve,
            data: 0x42,
        };
        aggregator.pipe_mesh().borrow_mut().enqueue(&msg);
        aggregator.step();
        assert_eq!(host.borrow_mut().dequeue::<NodeSignal>(), msg);
    }

    #[test]
    fn neighbour_traffic_drains_to_the_outbound() {
        let (mut aggregator, host) = harness();
        let msg = NodeSignal {
            target: NodeId::new(3, 1),
            address: 0,
            slot: MemorySlot::Preserve,
            data: 0x10,
        };
        aggregator.pipe_neighbour().borrow_mut().enqueue(&msg);
        aggregator.step();
        assert_eq!(host.borrow_mut().dequeue::<NodeSignal>(), msg);
    }
}
