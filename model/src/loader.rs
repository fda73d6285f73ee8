//! Design loading
//!
//! A design file is a JSON document naming the mesh dimensions and, per node,
//! an ASCII-hex instruction stream:
//!
//! ```rust
//! # use nexus_model::loader::Design;
//! # let json = r#"
//! {
//!   "rows": 2,
//!   "columns": 2,
//!   "nodes": [
//!     { "row": 0, "column": 1, "hex": "node_0_1.hex" }
//!   ]
//! }
//! # "#;
//! # serde_json::from_str::<Design>(json).unwrap();
//! ```
//!
//! Each hex file holds one 32-bit word per line. Every word is streamed into
//! the target tile as four LOAD messages (one per byte) wrapped in TO_MESH
//! control requests, and the model is stepped until the mesh drains.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use nexus_core::control::ControlRequest;
use nexus_core::error::{Classify, SystemError, TypedResult};
use nexus_core::message::{NodeFrame, NodeLoad};
use nexus_core::problem;
use nexus_core::types::NodeId;

use crate::engine::Nexus;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Design {
    pub rows: u32,
    pub columns: u32,
    pub nodes: Vec<DesignNode>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DesignNode {
    pub row: u8,
    pub column: u8,
    /// Path to the node's hex stream, relative to the design file
    pub hex: PathBuf,
}

/// Load a design file into the model and wait for the mesh to drain
pub fn load(model: &mut Nexus, path: &Path) -> TypedResult<()> {
    let text = fs::read_to_string(path).classify(SystemError::Io)?;
    let design: Design = serde_json::from_str(&text).classify(SystemError::DesignLoad)?;
    debug!(
        "Opened '{}' - rows: {}, columns: {}",
        path.display(),
        design.rows,
        design.columns
    );

    if design.rows > model.rows() || design.columns > model.columns() {
        problem!(
            DesignLoad,
            "design of {}x{} does not fit the {}x{} model",
            design.rows,
            design.columns,
            model.rows(),
            model.columns()
        );
    }

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for node in &design.nodes {
        if node.row as u32 >= design.rows || node.column as u32 >= design.columns {
            problem!(
                DesignLoad,
                "node ({}, {}) lies outside the design",
                node.row,
                node.column
            );
        }
        let hex_path = base.join(&node.hex);
        let stream = fs::read_to_string(&hex_path).classify(SystemError::Io)?;
        queue_hex(model, NodeId::new(node.row, node.column), &stream)?;
    }

    debug!("All messages queued, waiting for idle");
    model.settle();
    debug!("Model returned to idle, load complete");
    Ok(())
}

/// Queue one node's instruction stream as byte-wise LOAD messages
fn queue_hex(model: &mut Nexus, target: NodeId, stream: &str) -> TypedResult<()> {
    let from_host = model.from_host();
    let mut address = 0u16;
    for line in stream.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let word = match u32::from_str_radix(line, 16) {
            Ok(word) => word,
            Err(_) => problem!(
                DesignLoad,
                "invalid hex word '{line}' for node ({}, {})",
                target.row,
                target.column
            ),
        };
        trace!(
            "Loading row: {}, column: {}, address: {:#x}, instruction: {:#010x}",
            target.row,
            target.column,
            address,
            word
        );
        // One LOAD per byte, split across half-word address and slot
        for idx in 0..4u16 {
            let msg = NodeLoad {
                target,
                address: (address << 1) + idx / 2,
                slot: idx % 2 == 1,
                data: ((word >> (8 * idx)) & 0xFF) as u8,
            };
            from_host
                .borrow_mut()
                .enqueue_request(&ControlRequest::ToMesh {
                    message: msg.pack(),
                });
        }
        address += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_design(dir: &Path, rows: u32, columns: u32, words: &[u32]) -> PathBuf {
        let hex_path = dir.join("node_0_0.hex");
        let mut hex = fs::File::create(&hex_path).unwrap();
        for word in words {
            writeln!(hex, "{word:08x}").unwrap();
        }
        let design_path = dir.join("design.json");
        fs::write(
            &design_path,
            format!(
                r#"{{ "rows": {rows}, "columns": {columns},
                     "nodes": [ {{ "row": 0, "column": 0, "hex": "node_0_0.hex" }} ] }}"#
            ),
        )
        .unwrap();
        design_path
    }

    #[test]
    fn words_arrive_in_instruction_memory() {
        let dir = std::env::temp_dir().join("nexus_loader_words");
        fs::create_dir_all(&dir).unwrap();
        let design = write_design(&dir, 1, 1, &[0xDDCCBBAA, 0x60000003]);
        let mut model = Nexus::new(1, 1);
        load(&mut model, &design).unwrap();
        assert_eq!(model.mesh().node(0, 0).inst_memory().read(0), 0xDDCCBBAA);
        assert_eq!(model.mesh().node(0, 0).inst_memory().read(1), 0x60000003);
        let _ = fs::remove_dir_all(&dir);
    }

    /// A full pass through the stack: a loaded program fills the TRUTH shift
    /// register and sends it to the column aggregator, which the host then
    /// sees as an OUTPUTS section
    #[test]
    fn loaded_program_drives_host_outputs() {
        use crate::isa::{Instruction, MemoryMode};
        use nexus_core::control::ControlResponse;
        use nexus_core::types::MemorySlot;

        let mut words: Vec<u32> = Vec::new();
        for _ in 0..8 {
            words.push(
                Instruction::Truth {
                    src_a: 0,
                    src_b: 0,
                    src_c: 0,
                    mux_0: 0,
                    mux_1: 0,
                    mux_2: 0,
                    // Constant-one table: every shift pushes a set bit
                    table: 0xFF,
                }
                .encode(),
            );
        }
        words.push(
            Instruction::Memory {
                mode: MemoryMode::Send,
                reg: 7,
                send_row: 1,
                send_col: 0,
                slot: MemorySlot::Preserve,
                // Output view: mask 0xFF, slot 0, bypass clear
                address: 0x0FF,
            }
            .encode(),
        );
        words.push(
            Instruction::Wait {
                pc0: true,
                idle: true,
            }
            .encode(),
        );

        let dir = std::env::temp_dir().join("nexus_loader_end_to_end");
        fs::create_dir_all(&dir).unwrap();
        let design = write_design(&dir, 1, 1, &words);
        let mut model = Nexus::new(1, 1);
        load(&mut model, &design).unwrap();
        model.run(1, true);

        let snapshot = model.pop_output().expect("snapshot recorded");
        assert_eq!(snapshot[0], 0xFF);

        let to_host = model.to_host();
        let mut seen = false;
        while !to_host.borrow().is_idle() {
            if let ControlResponse::Outputs { index: 0, section, .. } =
                to_host.borrow_mut().dequeue_response()
            {
                assert_eq!(section[0], 0xFF);
                seen = true;
            }
        }
        assert!(seen, "no OUTPUTS section reached the host");
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn oversized_designs_are_rejected() {
        let dir = std::env::temp_dir().join("nexus_loader_oversize");
        fs::create_dir_all(&dir).unwrap();
        let design = write_design(&dir, 4, 4, &[0x0]);
        let mut model = Nexus::new(2, 2);
        assert!(load(&mut model, &design).is_err());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn bad_hex_is_rejected() {
        let dir = std::env::temp_dir().join("nexus_loader_badhex");
        fs::create_dir_all(&dir).unwrap();
        let hex_path = dir.join("node_0_0.hex");
        fs::write(&hex_path, "not-hex\n").unwrap();
        let design_path = dir.join("design.json");
        fs::write(
            &design_path,
            r#"{ "rows": 1, "columns": 1,
                 "nodes": [ { "row": 0, "column": 0, "hex": "node_0_0.hex" } ] }"#,
        )
        .unwrap();
        let mut model = Nexus::new(1, 1);
        assert!(load(&mut model, &design_path).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
