//! Top-level model: control plane, mesh, and the quiescence loop
//!
//! Each simulated cycle steps the controller and the mesh until both report
//! idle (the first mesh step of a cycle carries the trigger), then harvests
//! the aggregator outputs into the controller and the per-cycle snapshot
//! store. Wall-clock timestamps around a run report the achieved frequency.
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::time::Instant;

use nexus_core::error::{Classify, SystemError, TypedResult};
use nexus_core::params::AGGREGATOR_SLOTS;
use nexus_core::types::Direction;

use crate::control::Controller;
use crate::mesh::Mesh;
use crate::{new_pipe, ControlHandle};

pub struct Nexus {
    rows: u32,
    columns: u32,
    control: Controller,
    mesh: Mesh,
    /// Per-cycle copies of the aggregator output buffer
    output: VecDeque<Vec<u8>>,
}

impl Nexus {
    pub fn new(rows: u32, columns: u32) -> Self {
        let mut mesh = Mesh::new(rows, columns);
        let mut control = Controller::new(rows, columns);
        // Host traffic enters through the north-west corner and leaves
        // through the column-zero aggregator
        let ingress = mesh.node(0, 0).inbound_pipe(Direction::North);
        let egress = new_pipe();
        mesh.aggregator_mut(0).attach(egress.clone());
        control.attach_to_mesh(ingress);
        control.attach_from_mesh(egress);
        Self {
            rows,
            columns,
            control,
            mesh,
            output: VecDeque::new(),
        }
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut Mesh {
        &mut self.mesh
    }

    pub fn control(&self) -> &Controller {
        &self.control
    }

    pub fn from_host(&self) -> ControlHandle {
        self.control.from_host()
    }

    pub fn to_host(&self) -> ControlHandle {
        self.control.to_host()
    }

    /// Reset the entire state (mesh, controller, pipes, snapshots)
    pub fn reset(&mut self) {
        self.control.reset();
        self.mesh.reset();
        self.output.clear();
    }

    /// Step controller and mesh until both are idle, without a trigger
    pub fn settle(&mut self) {
        let mut steps = 0u32;
        loop {
            self.control.step();
            if self.control.take_soft_reset() {
                self.apply_soft_reset();
            }
            self.mesh.step(false);
            steps += 1;
            if self.mesh.is_idle() && self.control.is_idle() {
                break;
            }
        }
        debug!("Settled in {steps} steps");
    }

    /// Run for a number of cycles, recording an output snapshot per cycle
    pub fn run(&mut self, cycles: u32, with_trigger: bool) {
        info!("Running for {cycles} cycles");
        let begin = Instant::now();
        let mut outputs = vec![0u8; self.mesh.output_len()];
        for cycle in 0..cycles {
            trace!("Starting cycle {cycle}");
            let mut steps = 0u32;
            loop {
                self.control.step();
                if self.control.take_soft_reset() {
                    self.apply_soft_reset();
                }
                self.mesh.step(with_trigger && steps == 0);
                steps += 1;
                if self.mesh.is_idle() && self.control.is_idle() {
                    break;
                }
            }
            trace!("Finished cycle {cycle} in {steps} steps");
            self.mesh.get_outputs(&mut outputs);
            self.control.update_outputs(&outputs);
            self.control.end_of_cycle(true, true);
            self.output.push_back(outputs.clone());
        }
        let elapsed = begin.elapsed();
        if cycles > 0 && !elapsed.is_zero() {
            let frequency = cycles as f64 / elapsed.as_secs_f64();
            info!("Achieved frequency of {frequency:.0} Hz");
        }
    }

    fn apply_soft_reset(&mut self) {
        info!("Applying soft reset");
        self.mesh.reset();
        self.control.clear_snapshot();
        self.output.clear();
    }

    pub fn is_output_available(&self) -> bool {
        !self.output.is_empty()
    }

    /// Pop the oldest recorded output snapshot
    pub fn pop_output(&mut self) -> Option<Vec<u8>> {
        self.output.pop_front()
    }

    /// Write the recorded snapshots as a VCD waveform, one 8-bit reg per
    /// aggregator slot plus the cycle counter
    pub fn dump_vcd(&mut self, path: &Path) -> TypedResult<()> {
        info!("Writing VCD to '{}'", path.display());
        let slots = self.columns as usize * AGGREGATOR_SLOTS;
        let mut text = String::new();

        let _ = writeln!(text, "$timescale 1ns $end");
        let _ = writeln!(text, "$scope module dut $end");
        let _ = writeln!(text, "$var integer 32 ! cycle $end");
        for slot in 0..slots {
            let _ = writeln!(
                text,
                "$var reg 8 {} C{}I{} $end",
                vcd_code(slot),
                slot / AGGREGATOR_SLOTS,
                slot % AGGREGATOR_SLOTS
            );
        }
        let _ = writeln!(text, "$upscope $end");
        let _ = writeln!(text, "$enddefinitions $end");

        // Initial values
        let _ = writeln!(text, "#0");
        let _ = writeln!(text, "b{:032b} !", 0);
        for slot in 0..slots {
            let _ = writeln!(text, "b{:08b} {}", 0, vcd_code(slot));
        }

        info!("Recording {} steps", self.output.len());
        let mut step = 1u32;
        while let Some(summary) = self.output.pop_front() {
            let _ = writeln!(text, "#{step}");
            let _ = writeln!(text, "b{step:032b} !");
            for (slot, state) in summary.iter().enumerate() {
                let _ = writeln!(text, "b{state:08b} {}", vcd_code(slot));
            }
            step += 1;
        }

        fs::write(path, text).classify(SystemError::Io)
    }
}

/// Printable short identifier for a VCD variable (the '!' code is the cycle
/// counter, so slot codes start one later)
fn vcd_code(slot: usize) -> String {
    let mut code = String::new();
    let mut value = slot + 1;
    loop {
        code.push(char::from(b'!' + (value % 94) as u8));
        value /= 94;
        if value == 0 {
            break;
        }
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::control::{ControlRequest, ControlResponse};
    use nexus_core::message::{NodeFrame, NodeOutput};
    use nexus_core::types::NodeId;

    #[test]
    fn empty_design_is_immediately_idle() {
        let mut nexus = Nexus::new(1, 1);
        nexus.run(3, true);
        assert!(nexus.mesh().is_idle());
        assert!(nexus.is_output_available());
        assert_eq!(nexus.pop_output(), Some(vec![0u8; AGGREGATOR_SLOTS]));
    }

    #[test]
    fn outputs_flow_to_the_host_as_sections() {
        let mut nexus = Nexus::new(2, 2);
        // Drive an output frame at the column-1 aggregator through the mesh
        let frame = NodeOutput {
            target: NodeId::new(2, 1),
            bypass: false,
            mask: 0xFF,
            slot: 0,
            data: 0x42,
        };
        nexus
            .from_host()
            .borrow_mut()
            .enqueue_request(&ControlRequest::ToMesh {
                message: frame.pack(),
            });
        nexus.run(1, true);

        let snapshot = nexus.pop_output().expect("snapshot recorded");
        assert_eq!(snapshot[AGGREGATOR_SLOTS], 0x42);

        let to_host = nexus.to_host();
        let mut seen_section = false;
        while !to_host.borrow().is_idle() {
            if let ControlResponse::Outputs { section, index, .. } =
                to_host.borrow_mut().dequeue_response()
            {
                if index == 0 {
                    assert_eq!(section[AGGREGATOR_SLOTS], 0x42);
                    seen_section = true;
                }
            }
        }
        assert!(seen_section);
    }

    #[test]
    fn soft_reset_restores_fresh_state() {
        let mut nexus = Nexus::new(2, 2);
        let frame = NodeOutput {
            target: NodeId::new(2, 0),
            bypass: false,
            mask: 0xFF,
            slot: 1,
            data: 0x99,
        };
        nexus
            .from_host()
            .borrow_mut()
            .enqueue_request(&ControlRequest::ToMesh {
                message: frame.pack(),
            });
        nexus.run(1, true);
        assert_eq!(nexus.pop_output().expect("snapshot")[1], 0x99);

        nexus
            .from_host()
            .borrow_mut()
            .enqueue_request(&ControlRequest::SoftReset);
        nexus.run(1, true);
        let snapshot = nexus.pop_output().expect("snapshot after reset");
        assert!(snapshot.iter().all(|byte| *byte == 0));
    }

    #[test]
    fn vcd_dump_covers_every_slot() {
        let mut nexus = Nexus::new(1, 2);
        nexus.run(2, true);
        let path = std::env::temp_dir().join("nexus_model_vcd_test.vcd");
        nexus.dump_vcd(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("$var integer 32 ! cycle $end"));
        assert!(text.contains("C0I0"));
        assert!(text.contains("C1I3"));
        assert!(text.contains("#2"));
        let _ = std::fs::remove_file(&path);
    }
}
