//! SystemVerilog pretty-printer over the final signal graph
//!
//! One `logic` per port, wire, and flop; one clocked process per flop; one
//! `assign` per driven wire, shaped by the driving gate's operation. Undriven
//! wires become `'dX`, dotted hierarchy names flatten to underscores, and
//! constants print as `'d<value>`.
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use nexus_core::error::{Classify, SystemError, TypedResult};

use crate::module::Module;
use crate::signal::{GateOp, PortDir, SignalId, SignalKind};

/// Printable name of a signal: constants as literals, dots flattened
fn signame(module: &Module, id: SignalId) -> String {
    let signal = module.get(id);
    match signal.kind {
        SignalKind::Constant { value, .. } => format!("'d{value}"),
        _ => signal.name.replace('.', "_"),
    }
}

/// The right-hand side of an `assign`, shaped by the driver's operation
fn gate_expr(module: &Module, gate: SignalId, name_of: &dyn Fn(SignalId) -> String) -> String {
    let signal = module.get(gate);
    let op = signal.gate_op().expect("expression from a non-gate");
    let inputs = &signal.inputs;
    match op {
        GateOp::Assign => {
            assert_eq!(inputs.len(), 1, "ASSIGN gate without exactly one input");
            name_of(inputs[0])
        }
        GateOp::Cond => {
            assert_eq!(inputs.len(), 3, "COND gate without exactly three inputs");
            format!(
                "{} ? {} : {}",
                name_of(inputs[0]),
                name_of(inputs[1]),
                name_of(inputs[2])
            )
        }
        GateOp::And | GateOp::Or | GateOp::Xor | GateOp::Not => {
            let op_str = match op {
                GateOp::And => "&",
                GateOp::Or => "|",
                GateOp::Not => "!",
                _ => "^",
            };
            assert!(!inputs.is_empty(), "gate without inputs");
            if inputs.len() == 1 {
                format!("{op_str}({})", name_of(inputs[0]))
            } else {
                inputs
                    .iter()
                    .map(|input| name_of(*input))
                    .collect::<Vec<_>>()
                    .join(&format!(" {op_str} "))
            }
        }
    }
}

/// Render the whole module as SystemVerilog text
pub fn render(module: &Module) -> String {
    let name_of = |id: SignalId| signame(module, id);
    let mut out = String::new();

    // I/O boundary
    let _ = writeln!(out, "module {} (", module.name);
    for (position, port) in module.ports().enumerate() {
        let leader = if position == 0 { "      " } else { "    , " };
        let direction = match module.get(port).kind {
            SignalKind::Port(PortDir::Input) => "input ",
            SignalKind::Port(PortDir::Output) => "output",
            _ => unreachable!("port iterator yielded a non-port"),
        };
        let _ = writeln!(out, "{leader}{direction} logic {}", name_of(port));
    }
    let _ = writeln!(out, ");");

    let _ = writeln!(out, "\n// Wires\n");
    for wire in module.wires() {
        let _ = writeln!(out, "logic {};", name_of(wire));
    }

    let _ = writeln!(out, "\n// Flops\n");
    for flop in module.flops() {
        let _ = writeln!(out, "logic {};", name_of(flop));
    }

    let _ = writeln!(out, "\n// Processes\n");
    for (position, flop) in module.flops().enumerate() {
        if position != 0 {
            let _ = writeln!(out);
        }
        let signal = module.get(flop);
        let clock = signal.clock.expect("flop without a clock binding");
        let reset = signal.reset.expect("flop without a reset binding");
        let rst_val = signal.rst_val.expect("flop without a reset value");
        let data = signal.inputs[0];
        let _ = writeln!(
            out,
            "always @(posedge {}, posedge {})",
            name_of(clock),
            name_of(reset)
        );
        let _ = writeln!(
            out,
            "    if ({}) {} <= {};",
            name_of(reset),
            name_of(flop),
            name_of(rst_val)
        );
        let _ = writeln!(out, "    else {} <= {};", name_of(flop), name_of(data));
    }

    let _ = writeln!(out, "\n// Gates and Assignments\n");
    for wire in module.wires() {
        let inputs = &module.get(wire).inputs;
        let expr = match inputs.len() {
            // Undriven
            0 => "'dX".to_string(),
            1 if module.get(inputs[0]).kind.is_gate() => gate_expr(module, inputs[0], &name_of),
            1 => name_of(inputs[0]),
            drivers => panic!("wire {} has {drivers} drivers", module.get(wire).name),
        };
        let _ = writeln!(out, "assign {} = {};", name_of(wire), expr);
    }

    let _ = writeln!(out, "\n// Drive Outputs\n");
    for port in module.ports() {
        if module.get(port).kind != SignalKind::Port(PortDir::Output) {
            continue;
        }
        let inputs = &module.get(port).inputs;
        assert_eq!(
            inputs.len(),
            1,
            "output port {} without exactly one driver",
            module.get(port).name
        );
        let driver = inputs[0];
        let expr = if module.get(driver).kind.is_gate() {
            gate_expr(module, driver, &name_of)
        } else {
            name_of(driver)
        };
        let _ = writeln!(out, "assign {} = {};", name_of(port), expr);
    }

    let _ = writeln!(out, "\nendmodule : {}", module.name);
    out
}

/// Render and write to a file
pub fn write(module: &Module, path: &Path) -> TypedResult<()> {
    info!("Dumping '{}' to '{}'", module.name, path.display());
    fs::write(path, render(module)).classify(SystemError::Io)
}
