//! RTL statistics banner
use std::fmt::Write as _;

use crate::module::Module;

pub fn render(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "======================== [ RTL STATISTICS ] ========================"
    );
    let _ = writeln!(out, "Top-Level: {}", module.name);
    let _ = writeln!(out, "Ports    : {}", module.ports().count());
    let _ = writeln!(out, "Gates    : {}", module.gates().count());
    let _ = writeln!(out, "Flops    : {}", module.flops().count());
    let _ = writeln!(out, "Wires    : {}", module.wires().count());
    let _ = writeln!(
        out,
        "===================================================================="
    );
    out
}
