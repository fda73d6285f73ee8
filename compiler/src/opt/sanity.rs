//! Structural sanity checking
//!
//! Verifies that the forward and backward edge lists agree for every signal,
//! allowing for the one sanctioned asymmetry: a flop's clock, reset, and
//! reset-value sources list the flop among their outputs without appearing in
//! its input list. With `allow_const_terms` cleared it additionally rejects
//! any gate still fed by a constant, the state propagation promises.
//!
//! Every violation is reported before the check fails.
use nexus_core::error::TypedResult;

use crate::module::Module;
use nexus_core::problem;

pub fn check(module: &Module, allow_const_terms: bool) -> TypedResult<()> {
    debug!("Performing sanity check on all signals");
    let mut violations = 0usize;
    for id in module.signals() {
        let signal = module.get(id);

        // Each input must list this signal as an output
        for &input in &signal.inputs {
            if input == id {
                continue;
            }
            if !module.get(input).outputs.contains(&id) {
                error!(
                    "Signal {} is missing an output {}",
                    module.get(input).name,
                    signal.name
                );
                violations += 1;
            }
        }

        // Each output must list this signal as an input, unless the output is
        // a flop referencing this signal as clock, reset, or reset value
        for &output in &signal.outputs {
            if output == id {
                continue;
            }
            let consumer = module.get(output);
            if consumer.kind.is_flop()
                && (consumer.clock == Some(id)
                    || consumer.reset == Some(id)
                    || consumer.rst_val == Some(id))
            {
                continue;
            }
            if !consumer.inputs.contains(&id) {
                error!(
                    "Signal {} is missing an input {}",
                    consumer.name, signal.name
                );
                violations += 1;
            }
        }

        // Bound flops carry exactly one data input
        if signal.kind.is_flop() && (signal.clock.is_some() || signal.reset.is_some()) {
            if signal.clock.is_none() || signal.reset.is_none() || signal.inputs.len() != 1 {
                error!(
                    "Flop {} is incompletely bound ({} data inputs)",
                    signal.name,
                    signal.inputs.len()
                );
                violations += 1;
            }
        }

        // After propagation no gate may be fed by a constant
        if !allow_const_terms && signal.kind.is_gate() {
            for &input in &signal.inputs {
                let source = module.get(input);
                if source.kind.is_constant() {
                    error!(
                        "Gate '{}' with operation {} with {} inputs is driven by '{}' which is constant",
                        signal.name,
                        signal.gate_op().expect("gate without op").as_str(),
                        signal.inputs.len(),
                        source.name
                    );
                    violations += 1;
                }
            }
        }
    }
    if violations > 0 {
        problem!(Sanity, "{violations} sanity violations detected");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{GateOp, PortDir};

    #[test]
    fn clean_module_passes() {
        let mut module = Module::new("top");
        let a = module.add_port("a", PortDir::Input);
        let o = module.add_port("o", PortDir::Output);
        let gate = module.add_gate(GateOp::Not);
        module.connect(a, gate);
        module.connect(gate, o);
        check(&module, true).unwrap();
    }

    #[test]
    fn flop_control_asymmetry_is_allowed() {
        let mut module = Module::new("top");
        let clk = module.add_port("clk", PortDir::Input);
        let rst = module.add_port("rst", PortDir::Input);
        let d = module.add_port("d", PortDir::Input);
        let zero = module.add_constant(0, 1);
        let q = module.add_flop("q");
        module.bind_flop(q, clk, rst, zero, d);
        check(&module, false).unwrap();
    }

    #[test]
    fn constant_gate_input_is_reported_when_forbidden() {
        let mut module = Module::new("top");
        let a = module.add_port("a", PortDir::Input);
        let one = module.add_constant(1, 1);
        let gate = module.add_gate(GateOp::And);
        module.connect(a, gate);
        module.connect(one, gate);
        check(&module, true).unwrap();
        assert!(check(&module, false).is_err());
    }
}
