//! Constant propagation
//!
//! Walks every gate, classifying inputs into constant ones, constant zeros,
//! and variables, then folds or reshapes anything a constant decides. Each
//! rewrite builds its replacement with fully linked dual edges, repoints
//! every downstream consumer, detaches the old gate, and queues it for
//! removal at the end of the pass. Passes repeat until one drops nothing, so
//! a second invocation is always a no-op.
use crate::module::Module;
use crate::signal::{GateOp, SignalId};

/// Per-gate classification of constant against variable inputs
#[derive(Debug, Clone, Copy)]
struct InputCensus {
    num_zero: usize,
    num_one: usize,
    num_var: usize,
}

impl InputCensus {
    fn take(module: &Module, inputs: &[SignalId]) -> Self {
        let mut census = InputCensus {
            num_zero: 0,
            num_one: 0,
            num_var: 0,
        };
        for &input in inputs {
            match module.get(input).constant_value() {
                Some(0) => census.num_zero += 1,
                Some(_) => census.num_one += 1,
                None => census.num_var += 1,
            }
        }
        census
    }

    fn any_constant(&self) -> bool {
        self.num_zero > 0 || self.num_one > 0
    }

    fn all_constant(&self) -> bool {
        self.num_var == 0
    }
}

/// Run propagation to a fixed point; returns the total number of dropped gates
pub fn run(module: &mut Module) -> usize {
    let mut passes = 0;
    let mut total_dropped = 0;
    loop {
        passes += 1;
        debug!("Starting gate elimination pass {passes}");

        let mut to_drop = Vec::new();
        let gates: Vec<SignalId> = module.gates().collect();
        for gate in gates {
            let signal = module.get(gate);
            let op = signal
                .gate_op()
                .expect("gate iterator yielded a non-gate");
            // ASSIGN is the identity and is retained for emission
            if op == GateOp::Assign {
                continue;
            }
            let inputs = signal.inputs.clone();
            let census = InputCensus::take(module, &inputs);
            if !census.any_constant() {
                continue;
            }

            let replacement = match op {
                GateOp::Cond => rewrite_cond(module, &inputs),
                _ if inputs.len() == 1 => rewrite_unary(module, op, census),
                _ if inputs.len() == 2 => rewrite_binary(module, op, &inputs, census),
                _ => rewrite_nary(module, op, &inputs, census),
            };

            if let Some(new_driver) = replacement {
                let consumers = module.get(gate).outputs.clone();
                for consumer in consumers {
                    module.replace_consumer_input(consumer, gate, new_driver);
                }
                to_drop.push(gate);
            }
        }

        info!(
            "Optimisation pass {passes} dropped {} gates",
            to_drop.len()
        );
        if to_drop.is_empty() {
            break;
        }
        for gate in to_drop {
            module.detach(gate);
            module.drop_signal(gate);
            total_dropped += 1;
        }
    }
    info!("Completed propagation in {passes} passes");
    total_dropped
}

/// Ternary reshapes: any constant leg collapses or restructures the select
fn rewrite_cond(module: &mut Module, inputs: &[SignalId]) -> Option<SignalId> {
    assert_eq!(inputs.len(), 3, "COND gate without three inputs");
    let (pred, if_true, if_false) = (inputs[0], inputs[1], inputs[2]);
    let pred_const = module.get(pred).constant_value();
    let true_const = module.get(if_true).constant_value();
    let false_const = module.get(if_false).constant_value();

    if let Some(value) = pred_const {
        // Constant predicate selects one leg outright
        return Some(if value != 0 { if_true } else { if_false });
    }

    match (true_const, false_const) {
        (Some(tv), Some(fv)) => {
            if tv == fv {
                // Matching legs make the predicate irrelevant
                Some(if_true)
            } else if tv != 0 {
                // 'p ? 1 : 0' is the predicate itself
                Some(pred)
            } else {
                // 'p ? 0 : 1' is the inverted predicate
                let not_gate = module.add_gate(GateOp::Not);
                module.connect(pred, not_gate);
                Some(not_gate)
            }
        }
        (Some(tv), None) => {
            if tv != 0 {
                // 'p ? 1 : f' becomes 'p | (!p & f)'
                let not_gate = module.add_gate(GateOp::Not);
                module.connect(pred, not_gate);
                let and_gate = module.add_gate(GateOp::And);
                module.connect(not_gate, and_gate);
                module.connect(if_false, and_gate);
                let or_gate = module.add_gate(GateOp::Or);
                module.connect(pred, or_gate);
                module.connect(and_gate, or_gate);
                Some(or_gate)
            } else {
                // 'p ? 0 : f' becomes '!p & f'
                let not_gate = module.add_gate(GateOp::Not);
                module.connect(pred, not_gate);
                let and_gate = module.add_gate(GateOp::And);
                module.connect(not_gate, and_gate);
                module.connect(if_false, and_gate);
                Some(and_gate)
            }
        }
        (None, Some(fv)) => {
            if fv != 0 {
                // 'p ? t : 1' becomes '(p & t) | !p'
                let and_gate = module.add_gate(GateOp::And);
                module.connect(pred, and_gate);
                module.connect(if_true, and_gate);
                let not_gate = module.add_gate(GateOp::Not);
                module.connect(pred, not_gate);
                let or_gate = module.add_gate(GateOp::Or);
                module.connect(and_gate, or_gate);
                module.connect(not_gate, or_gate);
                Some(or_gate)
            } else {
                // 'p ? t : 0' becomes 'p & t'
                let and_gate = module.add_gate(GateOp::And);
                module.connect(pred, and_gate);
                module.connect(if_true, and_gate);
                Some(and_gate)
            }
        }
        (None, None) => None,
    }
}

/// Single-input folds
fn rewrite_unary(module: &mut Module, op: GateOp, census: InputCensus) -> Option<SignalId> {
    let (flatten, value) = match op {
        GateOp::And => (
            census.all_constant() || census.num_zero > 0,
            census.num_zero == 0,
        ),
        GateOp::Or => (
            census.all_constant() || census.num_one > 0,
            census.num_one > 0,
        ),
        GateOp::Not => (census.all_constant(), census.num_one == 0),
        GateOp::Xor => (census.all_constant(), census.num_one % 2 == 1),
        _ => (false, false),
    };
    if !flatten {
        return None;
    }
    Some(module.add_constant(value as u32, 1))
}

/// Two-input folds: full evaluation, or identity/domination by one side
fn rewrite_binary(
    module: &mut Module,
    op: GateOp,
    inputs: &[SignalId],
    census: InputCensus,
) -> Option<SignalId> {
    if census.all_constant() {
        let value = match op {
            GateOp::And => census.num_zero == 0,
            GateOp::Or => census.num_one > 0,
            GateOp::Xor => census.num_one == 1,
            GateOp::Not => census.num_one == 0,
            _ => return None,
        };
        return Some(module.add_constant(value as u32, 1));
    }

    // Exactly one side is constant from here on
    let (constant, other) = match module.get(inputs[0]).constant_value() {
        Some(value) => (value, inputs[1]),
        None => (
            module.get(inputs[1]).constant_value()?,
            inputs[0],
        ),
    };

    match op {
        GateOp::And => Some(if constant != 0 {
            other
        } else {
            module.add_constant(0, 1)
        }),
        GateOp::Or => Some(if constant == 0 {
            other
        } else {
            module.add_constant(1, 1)
        }),
        GateOp::Xor => Some(if constant == 0 {
            other
        } else {
            let not_gate = module.add_gate(GateOp::Not);
            module.connect(other, not_gate);
            not_gate
        }),
        _ => None,
    }
}

/// Reduction gates over three or more inputs: fold dominating constants,
/// otherwise strip the identity constants out into a fresh reduction
fn rewrite_nary(
    module: &mut Module,
    op: GateOp,
    inputs: &[SignalId],
    census: InputCensus,
) -> Option<SignalId> {
    let variables: Vec<SignalId> = inputs
        .iter()
        .copied()
        .filter(|id| module.get(*id).constant_value().is_none())
        .collect();

    match op {
        GateOp::And if census.num_zero > 0 => Some(module.add_constant(0, 1)),
        GateOp::Or if census.num_one > 0 => Some(module.add_constant(1, 1)),
        GateOp::Not if census.num_one > 0 => Some(module.add_constant(0, 1)),
        _ if census.all_constant() => {
            let value = match op {
                GateOp::And => census.num_zero == 0,
                GateOp::Or => census.num_one > 0,
                GateOp::Xor => census.num_one % 2 == 1,
                GateOp::Not => census.num_one == 0,
                _ => return None,
            };
            Some(module.add_constant(value as u32, 1))
        }
        GateOp::And | GateOp::Or | GateOp::Not => {
            // Only identity constants remain; reduce over the variables
            Some(reduce(module, op, &variables))
        }
        GateOp::Xor => {
            let reduced = reduce(module, GateOp::Xor, &variables);
            if census.num_one % 2 == 1 {
                let not_gate = module.add_gate(GateOp::Not);
                module.connect(reduced, not_gate);
                Some(not_gate)
            } else {
                Some(reduced)
            }
        }
        _ => None,
    }
}

/// A reduction over the listed inputs; a single AND/OR input needs no gate
fn reduce(module: &mut Module, op: GateOp, inputs: &[SignalId]) -> SignalId {
    assert!(!inputs.is_empty(), "reduction over no inputs");
    if inputs.len() == 1 && op != GateOp::Not {
        return inputs[0];
    }
    let gate = module.add_gate(op);
    for &input in inputs {
        module.connect(input, gate);
    }
    gate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opt::sanity;
    use crate::signal::PortDir;

    /// Module with a port wired through `builder`'s gate into an output
    fn harness(builder: impl FnOnce(&mut Module, SignalId, SignalId) -> SignalId) -> Module {
        let mut module = Module::new("top");
        let a = module.add_port("a", PortDir::Input);
        let b = module.add_port("b", PortDir::Input);
        let o = module.add_port("o", PortDir::Output);
        let driver = builder(&mut module, a, b);
        module.connect(driver, o);
        module
    }

    #[test]
    fn cond_with_constant_predicate_selects_a_leg() {
        let mut module = harness(|module, a, b| {
            let one = module.add_constant(1, 1);
            let gate = module.add_gate(GateOp::Cond);
            module.connect(one, gate);
            module.connect(a, gate);
            module.connect(b, gate);
            gate
        });
        run(&mut module);
        let a = module.find("a").unwrap();
        let o = module.find("o").unwrap();
        assert_eq!(module.gates().count(), 0);
        assert_eq!(module.get(o).inputs, vec![a]);
        sanity::check(&module, true).unwrap();
    }

    #[test]
    fn cond_with_unit_legs_propagates_the_predicate() {
        let mut module = harness(|module, a, _| {
            let one = module.add_constant(1, 1);
            let zero = module.add_constant(0, 1);
            let gate = module.add_gate(GateOp::Cond);
            module.connect(a, gate);
            module.connect(one, gate);
            module.connect(zero, gate);
            gate
        });
        run(&mut module);
        let a = module.find("a").unwrap();
        let o = module.find("o").unwrap();
        assert_eq!(module.get(o).inputs, vec![a]);
    }

    #[test]
    fn cond_with_inverted_legs_becomes_not() {
        let mut module = harness(|module, a, _| {
            let zero = module.add_constant(0, 1);
            let one = module.add_constant(1, 1);
            let gate = module.add_gate(GateOp::Cond);
            module.connect(a, gate);
            module.connect(zero, gate);
            module.connect(one, gate);
            gate
        });
        run(&mut module);
        let o = module.find("o").unwrap();
        let driver = module.get(o).inputs[0];
        assert_eq!(module.get(driver).gate_op(), Some(GateOp::Not));
        sanity::check(&module, true).unwrap();
    }

    #[test]
    fn cond_with_constant_true_leg_reshapes() {
        // 'a ? 1 : b' becomes 'a | (!a & b)'
        let mut module = harness(|module, a, b| {
            let one = module.add_constant(1, 1);
            let gate = module.add_gate(GateOp::Cond);
            module.connect(a, gate);
            module.connect(one, gate);
            module.connect(b, gate);
            gate
        });
        run(&mut module);
        let o = module.find("o").unwrap();
        let or_gate = module.get(o).inputs[0];
        assert_eq!(module.get(or_gate).gate_op(), Some(GateOp::Or));
        let a = module.find("a").unwrap();
        assert_eq!(module.get(or_gate).inputs[0], a);
        let and_gate = module.get(or_gate).inputs[1];
        assert_eq!(module.get(and_gate).gate_op(), Some(GateOp::And));
        sanity::check(&module, true).unwrap();
    }

    #[test]
    fn xor_with_constant_one_becomes_not() {
        let mut module = harness(|module, a, _| {
            let one = module.add_constant(1, 1);
            let gate = module.add_gate(GateOp::Xor);
            module.connect(a, gate);
            module.connect(one, gate);
            gate
        });
        run(&mut module);
        let a = module.find("a").unwrap();
        let o = module.find("o").unwrap();
        let driver = module.get(o).inputs[0];
        assert_eq!(module.get(driver).gate_op(), Some(GateOp::Not));
        assert_eq!(module.get(driver).inputs, vec![a]);
        sanity::check(&module, false).unwrap();
    }

    #[test]
    fn and_with_zero_dominates() {
        let mut module = harness(|module, a, _| {
            let zero = module.add_constant(0, 1);
            let gate = module.add_gate(GateOp::And);
            module.connect(a, gate);
            module.connect(zero, gate);
            gate
        });
        run(&mut module);
        let o = module.find("o").unwrap();
        let driver = module.get(o).inputs[0];
        assert_eq!(module.get(driver).constant_value(), Some(0));
    }

    #[test]
    fn nary_reduction_strips_identity_constants() {
        let mut module = harness(|module, a, b| {
            let one = module.add_constant(1, 1);
            let gate = module.add_gate(GateOp::And);
            module.connect(a, gate);
            module.connect(one, gate);
            module.connect(b, gate);
            gate
        });
        run(&mut module);
        let o = module.find("o").unwrap();
        let driver = module.get(o).inputs[0];
        assert_eq!(module.get(driver).gate_op(), Some(GateOp::And));
        assert_eq!(module.get(driver).inputs.len(), 2);
        sanity::check(&module, false).unwrap();
    }

    /// Random layered gate graphs with sprinkled constants: after the fixed
    /// point every edge stays dual, no gate sees a constant, and a second
    /// pass is a no-op
    #[test]
    fn random_graphs_converge_clean() {
        use crate::opt::prune;
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(31);
        for _ in 0..25 {
            let mut module = Module::new("fuzz");
            let mut pool: Vec<SignalId> = (0..4)
                .map(|idx| module.add_port(format!("i_{idx}"), PortDir::Input))
                .collect();

            for _ in 0..rng.gen_range(5..40) {
                let constant = rng.gen_bool(0.3);
                let pick = |module: &mut Module, pool: &[SignalId], rng: &mut StdRng| {
                    if rng.gen_bool(0.25) {
                        module.add_constant(rng.gen_range(0..2), 1)
                    } else {
                        pool[rng.gen_range(0..pool.len())]
                    }
                };
                let gate = match rng.gen_range(0..5) {
                    0 => {
                        let gate = module.add_gate(GateOp::Not);
                        let input = if constant {
                            module.add_constant(rng.gen_range(0..2), 1)
                        } else {
                            pool[rng.gen_range(0..pool.len())]
                        };
                        module.connect(input, gate);
                        gate
                    }
                    1 | 2 => {
                        let op = if rng.gen() { GateOp::And } else { GateOp::Or };
                        let gate = module.add_gate(op);
                        for _ in 0..rng.gen_range(2..5) {
                            let input = pick(&mut module, &pool, &mut rng);
                            module.connect(input, gate);
                        }
                        gate
                    }
                    3 => {
                        let gate = module.add_gate(GateOp::Xor);
                        for _ in 0..2 {
                            let input = pick(&mut module, &pool, &mut rng);
                            module.connect(input, gate);
                        }
                        gate
                    }
                    _ => {
                        let gate = module.add_gate(GateOp::Cond);
                        for _ in 0..3 {
                            let input = pick(&mut module, &pool, &mut rng);
                            module.connect(input, gate);
                        }
                        gate
                    }
                };
                pool.push(gate);
            }

            run(&mut module);
            sanity::check(&module, false).unwrap();
            assert_eq!(run(&mut module), 0);
            prune::run(&mut module);
            assert_eq!(prune::run(&mut module), 0);
            sanity::check(&module, false).unwrap();
        }
    }

    #[test]
    fn second_run_drops_nothing() {
        let mut module = harness(|module, a, b| {
            let one = module.add_constant(1, 1);
            let gate = module.add_gate(GateOp::Cond);
            module.connect(a, gate);
            module.connect(one, gate);
            module.connect(b, gate);
            gate
        });
        assert!(run(&mut module) > 0);
        assert_eq!(run(&mut module), 0);
    }
}
