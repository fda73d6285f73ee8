//! Module container: an arena of signals with name lookup and edge helpers
//!
//! Signals are owned by the arena and referenced by [`SignalId`] handles,
//! which stay cheap across the cyclic references a flop feedback path
//! creates. Edge mutation is centralised here; callers never touch the
//! input/output vectors directly, which keeps the dual-edge invariant intact
//! through every rewrite.
use std::collections::HashMap;

use crate::signal::{GateOp, PortDir, Signal, SignalId, SignalKind};

#[derive(Debug, Default)]
pub struct Module {
    pub name: String,
    slots: Vec<Option<Signal>>,
    by_name: HashMap<String, SignalId>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Creation and lookup
    // ------------------------------------------------------------------

    fn add(&mut self, name: String, kind: SignalKind) -> SignalId {
        debug_assert!(
            !self.by_name.contains_key(&name),
            "duplicate signal name {name}"
        );
        let id = SignalId(self.slots.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.slots.push(Some(Signal::new(name, kind)));
        id
    }

    pub fn add_port(&mut self, name: impl Into<String>, dir: PortDir) -> SignalId {
        self.add(name.into(), SignalKind::Port(dir))
    }

    pub fn add_wire(&mut self, name: impl Into<String>) -> SignalId {
        self.add(name.into(), SignalKind::Wire)
    }

    pub fn add_flop(&mut self, name: impl Into<String>) -> SignalId {
        self.add(name.into(), SignalKind::Flop)
    }

    /// Gates are anonymous in the source; they get arena-derived names
    pub fn add_gate(&mut self, op: GateOp) -> SignalId {
        let name = format!("gate_{}", self.slots.len());
        self.add(name, SignalKind::Gate(op))
    }

    pub fn add_constant(&mut self, value: u32, width: u32) -> SignalId {
        let name = format!("const_{}", self.slots.len());
        self.add(name, SignalKind::Constant { value, width })
    }

    pub fn has_signal(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn find(&self, name: &str) -> Option<SignalId> {
        self.by_name.get(name).copied()
    }

    /// Panics on a dangling handle; handles are only invalidated by
    /// [`Module::drop_signal`]
    pub fn get(&self, id: SignalId) -> &Signal {
        self.slots[id.index()]
            .as_ref()
            .expect("dangling signal handle")
    }

    fn get_mut(&mut self, id: SignalId) -> &mut Signal {
        self.slots[id.index()]
            .as_mut()
            .expect("dangling signal handle")
    }

    /// Remove a signal from the arena and the name map
    pub fn drop_signal(&mut self, id: SignalId) {
        let name = self.get(id).name.clone();
        self.by_name.remove(&name);
        self.slots[id.index()] = None;
    }

    pub fn is_live(&self, id: SignalId) -> bool {
        self.slots
            .get(id.index())
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Iteration (arena order == creation order, the canonical order)
    // ------------------------------------------------------------------

    pub fn signals(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|_| SignalId(idx as u32)))
    }

    fn of_kind<'a>(
        &'a self,
        pred: impl Fn(&SignalKind) -> bool + 'a,
    ) -> impl Iterator<Item = SignalId> + 'a {
        self.signals().filter(move |id| pred(&self.get(*id).kind))
    }

    pub fn ports(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.of_kind(|kind| matches!(kind, SignalKind::Port(_)))
    }

    pub fn gates(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.of_kind(SignalKind::is_gate)
    }

    pub fn flops(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.of_kind(SignalKind::is_flop)
    }

    pub fn wires(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.of_kind(SignalKind::is_wire)
    }

    pub fn constants(&self) -> impl Iterator<Item = SignalId> + '_ {
        self.of_kind(SignalKind::is_constant)
    }

    // ------------------------------------------------------------------
    // Edge helpers
    // ------------------------------------------------------------------

    /// Record `src` as the next input of `dst` and `dst` as an output of `src`
    pub fn connect(&mut self, src: SignalId, dst: SignalId) {
        self.get_mut(dst).inputs.push(src);
        self.get_mut(src).outputs.push(dst);
    }

    /// Remove one `src -> dst` edge from both sides
    ///
    /// Edges are a multiset; a repeated input loses a single occurrence.
    pub fn disconnect(&mut self, src: SignalId, dst: SignalId) {
        let inputs = &mut self.get_mut(dst).inputs;
        if let Some(position) = inputs.iter().position(|input| *input == src) {
            inputs.remove(position);
        }
        let outputs = &mut self.get_mut(src).outputs;
        if let Some(position) = outputs.iter().position(|output| *output == dst) {
            outputs.remove(position);
        }
    }

    /// Replace every reference to `old_src` held by `dst` with `new_src`,
    /// registering the new forward edges. Covers the input list slots and,
    /// for flops, the clock/reset/rst_val back-references.
    pub fn replace_consumer_input(&mut self, dst: SignalId, old_src: SignalId, new_src: SignalId) {
        let mut replaced = 0;
        let consumer = self.get_mut(dst);
        for slot in consumer.inputs.iter_mut() {
            if *slot == old_src {
                *slot = new_src;
                replaced += 1;
            }
        }
        for slot in [
            &mut consumer.clock,
            &mut consumer.reset,
            &mut consumer.rst_val,
        ] {
            if *slot == Some(old_src) {
                *slot = Some(new_src);
                replaced += 1;
            }
        }
        for _ in 0..replaced {
            self.get_mut(new_src).outputs.push(dst);
        }
    }

    /// Disconnect every edge driving `id` and clear its output list. The
    /// clock/reset/rst_val back-references of consuming flops are untouched;
    /// callers drop whole flops, not their control inputs.
    pub fn detach(&mut self, id: SignalId) {
        let inputs = self.get(id).inputs.clone();
        for input in inputs {
            self.disconnect(input, id);
        }
        self.get_mut(id).outputs.clear();
    }

    /// Bind a flop's clock, reset, and reset value
    ///
    /// Each source gains a forward edge to the flop so the prune pass sees it
    /// referenced; the flop's input list stays reserved for the data bit.
    pub fn bind_flop(
        &mut self,
        flop: SignalId,
        clock: SignalId,
        reset: SignalId,
        rst_val: SignalId,
        data: SignalId,
    ) {
        debug_assert!(self.get(flop).kind.is_flop());
        {
            let signal = self.get_mut(flop);
            signal.clock = Some(clock);
            signal.reset = Some(reset);
            signal.rst_val = Some(rst_val);
        }
        self.get_mut(clock).outputs.push(flop);
        self.get_mut(reset).outputs.push(flop);
        self.get_mut(rst_val).outputs.push(flop);
        self.connect(data, flop);
    }
}
