//! Partitioning of the signal graph into per-node clusters
//!
//! Every gate and flop starts in one partition; any partition whose external
//! input or output count exceeds the node budget is bisected, and each split
//! is polished with a bounded Kernighan-Lin swap search that accepts a swap
//! only when it strictly lowers the pair's combined I/O total. Membership is
//! tracked in a side table keyed by signal handle; the table is authoritative
//! and is updated by every add/remove.
//!
//! Iteration order over a partition is the insertion order of its
//! flop-then-gate list, which makes results reproducible.
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use itertools::Itertools;

use crate::module::Module;
use crate::signal::SignalId;

/// One cluster of gates and flops intended to fit a node's I/O budget
#[derive(Debug)]
pub struct Partition {
    pub index: usize,
    pub flops: Vec<SignalId>,
    pub gates: Vec<SignalId>,
}

impl Partition {
    fn new(index: usize) -> Self {
        Self {
            index,
            flops: Vec::new(),
            gates: Vec::new(),
        }
    }

    pub fn announce(&self) -> String {
        format!(
            "Partition {} has {} flops and {} gates",
            self.index,
            self.flops.len(),
            self.gates.len()
        )
    }

    /// Canonical iteration order: flops in insertion order, then gates
    pub fn all_flops_and_gates(&self) -> Vec<SignalId> {
        self.flops
            .iter()
            .chain(self.gates.iter())
            .copied()
            .collect()
    }
}

pub struct Partitioner<'m> {
    module: &'m Module,
    node_inputs: usize,
    node_outputs: usize,
    pub partitions: Vec<Partition>,
    /// Authoritative membership: signal handle to partition index
    partition_of: HashMap<SignalId, usize>,
    /// Signals already swapped in the current KL pass
    swapped: HashSet<SignalId>,
}

impl<'m> Partitioner<'m> {
    pub fn new(module: &'m Module, node_inputs: usize, node_outputs: usize) -> Self {
        Self {
            module,
            node_inputs,
            node_outputs,
            partitions: Vec::new(),
            partition_of: HashMap::new(),
            swapped: HashSet::new(),
        }
    }

    // ------------------------------------------------------------------
    // Graph chasing
    // ------------------------------------------------------------------

    /// Walk backwards through wires to the first significant source
    pub fn chase_to_source(&self, mut id: SignalId) -> SignalId {
        loop {
            let signal = self.module.get(id);
            if !signal.kind.is_wire() || signal.inputs.is_empty() {
                return id;
            }
            id = signal.inputs[0];
        }
    }

    /// Walk forwards through wires (and gates when `thru_gates`), collecting
    /// the significant targets on every branch; gates encountered on the way
    /// are always part of the result
    pub fn chase_to_targets(&self, id: SignalId, thru_gates: bool) -> Vec<SignalId> {
        let signal = self.module.get(id);
        let is_wire = signal.kind.is_wire();
        let is_gate = signal.kind.is_gate();
        if !is_wire && (!thru_gates || !is_gate) {
            return vec![id];
        }
        let mut found = Vec::new();
        if is_gate {
            found.push(id);
        }
        for &output in &signal.outputs {
            found.extend(self.chase_to_targets(output, false));
        }
        found
    }

    /// Sources feeding `root` from outside partition `part`
    fn trace_inputs(&self, part: usize, root: SignalId) -> BTreeSet<SignalId> {
        let mut traced = BTreeSet::new();
        for &input in &self.module.get(root).inputs {
            let source = self.chase_to_source(input);
            let kind = self.module.get(source).kind;
            // Constants travel with the instruction stream; an undriven wire
            // has nothing upstream to route
            if kind.is_constant() || kind.is_wire() {
                continue;
            }
            if self.partition_of.get(&source) != Some(&part) {
                traced.insert(source);
            }
        }
        traced
    }

    /// Consumers of `root` outside partition `part`
    fn trace_outputs(&self, part: usize, root: SignalId) -> BTreeSet<SignalId> {
        let mut traced = BTreeSet::new();
        for &output in &self.module.get(root).outputs {
            for target in self.chase_to_targets(output, false) {
                if self.partition_of.get(&target) != Some(&part) {
                    traced.insert(target);
                }
            }
        }
        traced
    }

    // ------------------------------------------------------------------
    // Budget accounting
    // ------------------------------------------------------------------

    /// Multiset of external sources consumed by the partition. Every flop
    /// contributes its data source whether or not it is looped back inside
    /// the partition; the hardware always routes a flop's input.
    pub fn required_inputs(&self, part: usize) -> BTreeMap<SignalId, usize> {
        let mut external = BTreeMap::new();
        for &gate in &self.partitions[part].gates {
            for input in self.trace_inputs(part, gate) {
                *external.entry(input).or_insert(0) += 1;
            }
        }
        for &flop in &self.partitions[part].flops {
            let source = self.chase_to_source(self.module.get(flop).inputs[0]);
            *external.entry(source).or_insert(0) += 1;
        }
        external
    }

    /// Multiset of external consumers of the partition's flops and gates
    pub fn required_outputs(&self, part: usize) -> BTreeMap<SignalId, usize> {
        let mut external = BTreeMap::new();
        for node in self.partitions[part].all_flops_and_gates() {
            for output in self.trace_outputs(part, node) {
                *external.entry(output).or_insert(0) += 1;
            }
        }
        external
    }

    pub fn fits(&self, part: usize) -> bool {
        self.required_inputs(part).len() <= self.node_inputs
            && self.required_outputs(part).len() <= self.node_outputs
    }

    /// Combined I/O pressure of one partition: the sum of both multisets
    fn io_total(&self, part: usize) -> usize {
        self.required_inputs(part).values().sum::<usize>()
            + self.required_outputs(part).values().sum::<usize>()
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    fn add(&mut self, part: usize, sig: SignalId) {
        self.partition_of.insert(sig, part);
        let target = &mut self.partitions[part];
        if self.module.get(sig).kind.is_flop() {
            target.flops.push(sig);
        } else {
            target.gates.push(sig);
        }
    }

    fn remove(&mut self, part: usize, sig: SignalId) {
        self.partition_of.remove(&sig);
        let source = &mut self.partitions[part];
        let list = if self.module.get(sig).kind.is_flop() {
            &mut source.flops
        } else {
            &mut source.gates
        };
        let position = list
            .iter()
            .position(|entry| *entry == sig)
            .expect("removed a signal from a partition it is not in");
        list.remove(position);
    }

    fn move_signal(&mut self, sig: SignalId, from: usize, to: usize) {
        self.remove(from, sig);
        self.add(to, sig);
    }

    // ------------------------------------------------------------------
    // Main algorithm
    // ------------------------------------------------------------------

    /// Partition the module; returns true when every partition fits
    pub fn run(&mut self) -> bool {
        info!("Forming initial partition");
        self.partitions.push(Partition::new(0));
        let gates: Vec<SignalId> = self.module.gates().collect();
        let flops: Vec<SignalId> = self.module.flops().collect();
        for gate in gates {
            self.add(0, gate);
        }
        for flop in flops {
            self.add(0, flop);
        }

        let initial_count = self.partition_of.len();
        let iteration_bound = (2 * initial_count).max(16);

        let mut all_fit;
        let mut iterations = 0;
        loop {
            iterations += 1;
            all_fit = true;
            let existing = self.partitions.len();
            for lhs in 0..existing {
                if self.fits(lhs) {
                    continue;
                }
                all_fit = false;
                info!("{}", self.partitions[lhs].announce());

                // Split off a sibling with a fresh index
                let rhs = self.partitions.len();
                self.partitions.push(Partition::new(rhs));
                self.bisect(lhs, rhs);

                info!("Pre-optimisation:");
                info!(" - LHS: {}", self.partitions[lhs].announce());
                info!(" - RHS: {}", self.partitions[rhs].announce());

                self.kl_optimise(lhs, rhs);

                info!("Step summary:");
                info!(" - LHS: {}", self.partitions[lhs].announce());
                info!(" - RHS: {}", self.partitions[rhs].announce());
            }
            if all_fit {
                break;
            }
            if iterations >= iteration_bound {
                error!(
                    "Partitioning failed to converge within {iteration_bound} iterations"
                );
                self.report_overages();
                break;
            }
        }

        info!("Partitioning summary:");
        for part in &self.partitions {
            info!(
                " - {}: {}",
                part.announce(),
                if self.fits(part.index) {
                    "FITS"
                } else {
                    "DOESN'T FIT"
                }
            );
        }
        all_fit
    }

    /// Partitions still over budget, with their input/output counts
    pub fn unfit_partitions(&self) -> Vec<(usize, usize, usize)> {
        self.partitions
            .iter()
            .filter(|part| !self.fits(part.index))
            .map(|part| {
                (
                    part.index,
                    self.required_inputs(part.index).len(),
                    self.required_outputs(part.index).len(),
                )
            })
            .collect()
    }

    fn report_overages(&self) {
        let overages = self
            .unfit_partitions()
            .into_iter()
            .map(|(index, inputs, outputs)| {
                format!(
                    "partition {index}: {inputs} inputs (budget {}), {outputs} outputs (budget {})",
                    self.node_inputs, self.node_outputs
                )
            })
            .join("; ");
        error!("Over-budget partitions: {overages}");
    }

    /// Move items from the front of `lhs` until the flop and gate counts are
    /// each within one of the sibling's
    fn bisect(&mut self, lhs: usize, rhs: usize) {
        while self.partitions[lhs].flops.len() > self.partitions[rhs].flops.len() {
            let sig = self.partitions[lhs].flops[0];
            self.move_signal(sig, lhs, rhs);
        }
        while self.partitions[lhs].gates.len() > self.partitions[rhs].gates.len() {
            let sig = self.partitions[lhs].gates[0];
            self.move_signal(sig, lhs, rhs);
        }
    }

    /// Up to ten Kernighan-Lin swap passes over the pair; a swap is accepted
    /// only when the recomputed combined I/O total strictly improves, so the
    /// pair total never increases
    fn kl_optimise(&mut self, lhs: usize, rhs: usize) {
        debug!("Executing KL optimisation");
        for pass in 0..10 {
            let mut swap_count = 0usize;

            let all_lhs = self.partitions[lhs].all_flops_and_gates();
            let all_rhs = self.partitions[rhs].all_flops_and_gates();

            let mut lhs_base = self.io_total(lhs);
            let mut rhs_base = self.io_total(rhs);

            for &l in &all_lhs {
                if self.swapped.contains(&l) {
                    continue;
                }
                self.move_signal(l, lhs, rhs);
                let mut accepted = false;
                for &r in &all_rhs {
                    if self.swapped.contains(&r) {
                        continue;
                    }
                    self.move_signal(r, rhs, lhs);
                    let lhs_cand = self.io_total(lhs);
                    let rhs_cand = self.io_total(rhs);
                    if lhs_cand + rhs_cand < lhs_base + rhs_base {
                        swap_count += 1;
                        lhs_base = lhs_cand;
                        rhs_base = rhs_cand;
                        self.swapped.insert(l);
                        self.swapped.insert(r);
                        accepted = true;
                        break;
                    }
                    self.move_signal(r, lhs, rhs);
                }
                if !accepted {
                    self.move_signal(l, rhs, lhs);
                }
            }

            debug!("KL pass {pass} made {swap_count} swaps:");
            debug!(" - LHS: {}", self.partitions[lhs].announce());
            debug!(" - RHS: {}", self.partitions[rhs].announce());
            if swap_count == 0 {
                break;
            }
            self.swapped.clear();
        }
        self.swapped.clear();
    }
}
