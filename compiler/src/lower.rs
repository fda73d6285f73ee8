//! Lowering of the elaborated AST into the bit-level signal graph
//!
//! Multi-bit declarations expand into per-bit signals named `name_<index>`;
//! expressions lower into ordered bit holders; the single supported process
//! shape (`always @(posedge clk, posedge rst) if (rst) ... else ...`) binds
//! clock, reset, reset value, and data onto the flops declared for the
//! assigned storage. Anything outside the supported subset fails with the
//! offending construct named.
use std::collections::{BTreeMap, HashMap, VecDeque};

use nexus_core::error::TypedResult;

use crate::ast::{
    BinaryOperator, BlockKind, DataType, Expression, Instance, Item, PortDirection, Statement,
    Timing, UnaryOperator,
};
use crate::module::Module;
use nexus_core::problem;
use crate::signal::{GateOp, PortDir, SignalId};

/// Ordered list of bit-level signals produced by one expression
type BitHolder = Vec<SignalId>;

/// Lower one elaborated instance into a module graph
pub fn lower(instance: &Instance) -> TypedResult<Module> {
    let mut lowerer = Lowerer::new(&instance.name);
    for item in &instance.items {
        lowerer.item(item)?;
    }
    Ok(lowerer.module)
}

struct Lowerer {
    module: Module,
    /// Declared name to its per-bit expansion, LSB first
    expansions: HashMap<String, Vec<SignalId>>,
    /// Bit holders produced by expression resolution
    operands: VecDeque<BitHolder>,
    in_process: bool,
    pos_trig: Vec<SignalId>,
    /// Non-blocking assignments collected from the current process branch,
    /// keyed by storage bit name (ordered, so flop creation is deterministic)
    proc_asgn: BTreeMap<String, SignalId>,
}

impl Lowerer {
    fn new(name: &str) -> Self {
        debug!("Lowering instance '{name}'");
        Self {
            module: Module::new(name),
            expansions: HashMap::new(),
            operands: VecDeque::new(),
            in_process: false,
            pos_trig: Vec::new(),
            proc_asgn: BTreeMap::new(),
        }
    }

    /// Expand a declaration into its per-bit names, LSB first
    fn bit_names(&self, name: &str, ty: &DataType) -> TypedResult<Vec<String>> {
        match ty {
            DataType::Scalar => Ok(vec![name.to_string()]),
            DataType::Packed { msb, lsb } => {
                let (lo, hi) = (*lsb.min(msb), *lsb.max(msb));
                Ok((lo..=hi).map(|idx| format!("{name}_{idx}")).collect())
            }
            DataType::Other { description } => {
                problem!(Lowering, "'{name}' has unsupported data kind '{description}'")
            }
        }
    }

    fn item(&mut self, item: &Item) -> TypedResult<()> {
        match item {
            Item::Port { name, direction, ty } => {
                let dir = match direction {
                    PortDirection::Input => PortDir::Input,
                    PortDirection::Output => PortDir::Output,
                    PortDirection::Inout => {
                        problem!(Lowering, "port '{name}' has unsupported direction 'inout'")
                    }
                };
                let bits = self.declare(name, ty, |module, bit| module.add_port(bit, dir))?;
                debug!("Declared {}-bit port '{name}'", bits);
            }
            Item::Variable { name, ty } => {
                let bits = self.declare(name, ty, |module, bit| module.add_flop(bit))?;
                debug!("Declared {}-bit storage '{name}'", bits);
            }
            Item::Net { name, ty } => {
                let bits = self.declare(name, ty, |module, bit| module.add_wire(bit))?;
                debug!("Declared {}-bit net '{name}'", bits);
            }
            Item::ContinuousAssign { assign } => {
                if !matches!(assign, Expression::Assignment { .. }) {
                    problem!(
                        Lowering,
                        "continuous assignment holds a {} instead of an assignment",
                        assign.kind_name()
                    );
                }
                self.expression(assign)?;
                self.operands.clear();
            }
            Item::ProceduralBlock { block, body } => {
                if *block != BlockKind::Always {
                    problem!(Lowering, "unsupported procedural block kind {block:?}");
                }
                assert!(!self.in_process, "nested procedural block");
                self.in_process = true;
                let outcome = self.statement(body);
                self.in_process = false;
                self.pos_trig.clear();
                self.proc_asgn.clear();
                self.operands.clear();
                outcome?;
            }
        }
        Ok(())
    }

    fn declare(
        &mut self,
        name: &str,
        ty: &DataType,
        mut add: impl FnMut(&mut Module, String) -> SignalId,
    ) -> TypedResult<usize> {
        if self.expansions.contains_key(name) {
            problem!(Lowering, "'{name}' is declared more than once");
        }
        let mut ids = Vec::new();
        for bit in self.bit_names(name, ty)? {
            if self.module.has_signal(&bit) {
                problem!(Lowering, "bit signal '{bit}' collides with an existing name");
            }
            ids.push(add(&mut self.module, bit));
        }
        let width = ids.len();
        self.expansions.insert(name.to_string(), ids);
        Ok(width)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expression(&mut self, expr: &Expression) -> TypedResult<()> {
        match expr {
            Expression::Assignment { lhs, rhs } => self.assignment(lhs, rhs),
            Expression::NamedValue { name } => {
                let bits = match self.expansions.get(name) {
                    Some(bits) => bits.clone(),
                    None => problem!(Lowering, "reference to unknown name '{name}'"),
                };
                self.operands.push_back(bits);
                Ok(())
            }
            Expression::IntegerLiteral { value, width } => {
                let bits = (0..*width)
                    .map(|idx| self.module.add_constant(((value >> idx) & 1) as u32, 1))
                    .collect();
                self.operands.push_back(bits);
                Ok(())
            }
            Expression::ElementSelect { value, index } => {
                let name = self.named(value, "element select")?;
                let bit = self.select_bit(&name, *index)?;
                self.operands.push_back(vec![bit]);
                Ok(())
            }
            Expression::RangeSelect { value, left, right } => {
                let name = self.named(value, "range select")?;
                let (lo, hi) = (*left.min(right), *left.max(right));
                let mut bits = Vec::new();
                for idx in lo..=hi {
                    bits.push(self.select_bit(&name, idx)?);
                }
                self.operands.push_back(bits);
                Ok(())
            }
            Expression::Concatenation { operands } => {
                let depth = self.operands.len();
                for operand in operands {
                    self.expression(operand)?;
                }
                let joined: BitHolder = self
                    .operands
                    .drain(depth..)
                    .flatten()
                    .collect();
                self.operands.push_back(joined);
                Ok(())
            }
            Expression::Conversion { operand } => self.expression(operand),
            Expression::UnaryOp { op, operand } => self.unary(*op, operand),
            Expression::BinaryOp { op, left, right } => self.binary(*op, left, right),
            Expression::ConditionalOp { pred, left, right } => {
                self.conditional(pred, left, right)
            }
        }
    }

    fn assignment(&mut self, lhs: &Expression, rhs: &Expression) -> TypedResult<()> {
        self.expression(lhs)?;
        let lhs_bits = self.single_holder("assignment left-hand side")?;

        self.expression(rhs)?;
        let rhs_bits: BitHolder = self.operands.drain(..).flatten().collect();

        if lhs_bits.len() != rhs_bits.len() {
            problem!(
                Lowering,
                "assignment width mismatch: left is {} bits, right is {} bits",
                lhs_bits.len(),
                rhs_bits.len()
            );
        }

        for (lhs_bit, rhs_bit) in lhs_bits.iter().zip(rhs_bits.iter()) {
            if self.in_process {
                let name = self.module.get(*lhs_bit).name.clone();
                self.proc_asgn.insert(name, *rhs_bit);
            } else {
                let gate = self.module.add_gate(GateOp::Assign);
                self.module.connect(*rhs_bit, gate);
                self.module.connect(gate, *lhs_bit);
            }
        }

        // An assignment is a property of its block, not an operand
        Ok(())
    }

    fn unary(&mut self, op: UnaryOperator, operand: &Expression) -> TypedResult<()> {
        self.expression(operand)?;
        let bits = self.single_holder("unary operand")?;

        let holder = match op {
            // Bitwise inversion expands per bit
            UnaryOperator::BitNot => bits
                .iter()
                .map(|bit| {
                    let gate = self.module.add_gate(GateOp::Not);
                    self.module.connect(*bit, gate);
                    gate
                })
                .collect(),
            // The reductions collapse every bit into a single gate
            UnaryOperator::LogicNot
            | UnaryOperator::ReduceAnd
            | UnaryOperator::ReduceOr
            | UnaryOperator::ReduceXor => {
                let gate_op = match op {
                    UnaryOperator::LogicNot => GateOp::Not,
                    UnaryOperator::ReduceAnd => GateOp::And,
                    UnaryOperator::ReduceOr => GateOp::Or,
                    _ => GateOp::Xor,
                };
                let gate = self.module.add_gate(gate_op);
                for bit in &bits {
                    self.module.connect(*bit, gate);
                }
                vec![gate]
            }
        };
        self.operands.push_back(holder);
        Ok(())
    }

    fn binary(
        &mut self,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
    ) -> TypedResult<()> {
        self.expression(left)?;
        let lhs = self.single_holder("binary left operand")?;
        self.expression(right)?;
        let rhs = self.single_holder("binary right operand")?;

        if lhs.len() != rhs.len() {
            problem!(
                Lowering,
                "binary operand width mismatch: {} bits against {}",
                lhs.len(),
                rhs.len()
            );
        }

        let gate_op = match op {
            BinaryOperator::And => GateOp::And,
            BinaryOperator::Or => GateOp::Or,
            BinaryOperator::Xor => GateOp::Xor,
        };

        let mut holder = Vec::with_capacity(lhs.len());
        for (l, r) in lhs.iter().zip(rhs.iter()) {
            let gate = self.module.add_gate(gate_op);
            self.module.connect(*l, gate);
            self.module.connect(*r, gate);
            holder.push(gate);
        }
        self.operands.push_back(holder);
        Ok(())
    }

    fn conditional(
        &mut self,
        pred: &Expression,
        left: &Expression,
        right: &Expression,
    ) -> TypedResult<()> {
        self.expression(pred)?;
        let pred_bits = self.single_holder("conditional predicate")?;
        if pred_bits.len() != 1 {
            problem!(
                Lowering,
                "conditional predicate must be one bit, found {}",
                pred_bits.len()
            );
        }
        self.expression(left)?;
        let lhs = self.single_holder("conditional true operand")?;
        self.expression(right)?;
        let rhs = self.single_holder("conditional false operand")?;

        if lhs.len() != rhs.len() {
            problem!(
                Lowering,
                "conditional operand width mismatch: {} bits against {}",
                lhs.len(),
                rhs.len()
            );
        }

        let mut holder = Vec::with_capacity(lhs.len());
        for (l, r) in lhs.iter().zip(rhs.iter()) {
            let gate = self.module.add_gate(GateOp::Cond);
            self.module.connect(pred_bits[0], gate);
            self.module.connect(*l, gate);
            self.module.connect(*r, gate);
            holder.push(gate);
        }
        self.operands.push_back(holder);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements and processes
    // ------------------------------------------------------------------

    fn statement(&mut self, stmt: &Statement) -> TypedResult<()> {
        match stmt {
            Statement::Timed { timing, stmt } => {
                for event in timing {
                    self.timing(event)?;
                }
                self.statement(stmt)
            }
            Statement::Conditional {
                cond,
                if_true,
                if_false,
            } => self.clocked_conditional(cond, if_true, if_false),
            Statement::Expression { expr } => {
                let outcome = self.expression(expr);
                self.operands.clear();
                outcome
            }
        }
    }

    fn timing(&mut self, event: &Timing) -> TypedResult<()> {
        match event {
            Timing::PosEdge { expr } => {
                self.expression(expr)?;
                let bits = self.single_holder("edge trigger")?;
                if bits.len() != 1 {
                    problem!(Lowering, "edge trigger must be one bit, found {}", bits.len());
                }
                self.pos_trig.push(bits[0]);
                Ok(())
            }
            Timing::NegEdge { .. } => {
                problem!(Lowering, "unsupported negative-edge trigger")
            }
        }
    }

    /// The single recognised process body:
    /// `if (rst) q <= rst_val; else q <= d;`
    fn clocked_conditional(
        &mut self,
        cond: &Expression,
        if_true: &Statement,
        if_false: &Statement,
    ) -> TypedResult<()> {
        self.expression(cond)?;
        let cond_bits = self.single_holder("process condition")?;
        if cond_bits.len() != 1 {
            problem!(
                Lowering,
                "process condition must be one bit, found {}",
                cond_bits.len()
            );
        }
        let local_rst = cond_bits[0];

        // The trigger matching the condition is the reset; the remaining
        // trigger is the clock, and exactly one of each must exist.
        let mut proc_clk = None;
        let mut proc_rst = None;
        for trigger in &self.pos_trig {
            if *trigger == local_rst {
                proc_rst = Some(*trigger);
            } else if proc_clk.is_some() {
                problem!(Lowering, "process has more than one clock candidate");
            } else {
                proc_clk = Some(*trigger);
            }
        }
        let (Some(clk), Some(rst)) = (proc_clk, proc_rst) else {
            problem!(Lowering, "process triggers do not name one clock and one reset");
        };

        self.statement(if_true)?;
        let all_true = std::mem::take(&mut self.proc_asgn);
        self.statement(if_false)?;
        let all_false = std::mem::take(&mut self.proc_asgn);

        for name in all_false.keys() {
            if !all_true.contains_key(name) {
                problem!(Lowering, "storage '{name}' is driven but never reset");
            }
        }
        for (name, rst_val) in all_true {
            let Some(data) = all_false.get(&name).copied() else {
                problem!(Lowering, "storage '{name}' is reset but never driven");
            };
            let Some(flop) = self.module.find(&name) else {
                problem!(Lowering, "process assigns unknown storage '{name}'");
            };
            if !self.module.get(flop).kind.is_flop() {
                problem!(Lowering, "process assigns '{name}' which is not storage");
            }
            debug!(
                "Creating flop '{}' - clk: {}, rst: {}, rst_val: {}, D: {}",
                name,
                self.module.get(clk).name,
                self.module.get(rst).name,
                self.module.get(rst_val).name,
                self.module.get(data).name,
            );
            self.module.bind_flop(flop, clk, rst, rst_val, data);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Small helpers
    // ------------------------------------------------------------------

    fn single_holder(&mut self, context: &str) -> TypedResult<BitHolder> {
        if self.operands.len() != 1 {
            problem!(
                Lowering,
                "{context} resolved to {} operands instead of one",
                self.operands.len()
            );
        }
        Ok(self
            .operands
            .pop_front()
            .expect("operand present because the length was just checked"))
    }

    fn named(&self, expr: &Expression, context: &str) -> TypedResult<String> {
        match expr {
            Expression::NamedValue { name } => Ok(name.clone()),
            other => problem!(
                Lowering,
                "{context} must target a named value, found {}",
                other.kind_name()
            ),
        }
    }

    fn select_bit(&self, name: &str, index: u32) -> TypedResult<SignalId> {
        let lookup = format!("{name}_{index}");
        match self.module.find(&lookup) {
            Some(id) => Ok(id),
            None => problem!(Lowering, "no bit signal '{lookup}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast;
    use crate::signal::SignalKind;

    fn named(name: &str) -> Expression {
        Expression::NamedValue { name: name.into() }
    }

    fn assign(lhs: Expression, rhs: Expression) -> Expression {
        Expression::Assignment {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    fn scalar_port(name: &str, direction: PortDirection) -> Item {
        Item::Port {
            name: name.into(),
            direction,
            ty: DataType::Scalar,
        }
    }

    #[test]
    fn packed_declarations_expand_per_bit() {
        let instance = Instance {
            name: "top".into(),
            items: vec![Item::Net {
                name: "bus".into(),
                ty: DataType::Packed { msb: 3, lsb: 0 },
            }],
        };
        let module = lower(&instance).unwrap();
        assert_eq!(module.wires().count(), 4);
        for idx in 0..4 {
            assert!(module.has_signal(&format!("bus_{idx}")));
        }
    }

    #[test]
    fn continuous_assign_builds_assign_gates() {
        let instance = Instance {
            name: "top".into(),
            items: vec![
                scalar_port("a", PortDirection::Input),
                scalar_port("o", PortDirection::Output),
                Item::ContinuousAssign {
                    assign: assign(named("o"), named("a")),
                },
            ],
        };
        let module = lower(&instance).unwrap();
        let gate = module.gates().next().unwrap();
        assert_eq!(module.get(gate).kind, SignalKind::Gate(GateOp::Assign));
        let a = module.find("a").unwrap();
        let o = module.find("o").unwrap();
        assert_eq!(module.get(gate).inputs, vec![a]);
        assert_eq!(module.get(o).inputs, vec![gate]);
    }

    #[test]
    fn binary_op_produces_one_gate_per_bit() {
        let instance = Instance {
            name: "top".into(),
            items: vec![
                Item::Port {
                    name: "a".into(),
                    direction: PortDirection::Input,
                    ty: DataType::Packed { msb: 1, lsb: 0 },
                },
                Item::Port {
                    name: "b".into(),
                    direction: PortDirection::Input,
                    ty: DataType::Packed { msb: 1, lsb: 0 },
                },
                Item::Net {
                    name: "x".into(),
                    ty: DataType::Packed { msb: 1, lsb: 0 },
                },
                Item::ContinuousAssign {
                    assign: assign(
                        named("x"),
                        Expression::BinaryOp {
                            op: BinaryOperator::Xor,
                            left: Box::new(named("a")),
                            right: Box::new(named("b")),
                        },
                    ),
                },
            ],
        };
        let module = lower(&instance).unwrap();
        let xor_gates: Vec<_> = module
            .gates()
            .filter(|id| module.get(*id).gate_op() == Some(GateOp::Xor))
            .collect();
        assert_eq!(xor_gates.len(), 2);
        // Plus one ASSIGN per bit wiring the result into 'x'
        assert_eq!(module.gates().count(), 4);
    }

    #[test]
    fn literal_bits_are_lsb_first() {
        let instance = Instance {
            name: "top".into(),
            items: vec![
                Item::Net {
                    name: "n".into(),
                    ty: DataType::Packed { msb: 2, lsb: 0 },
                },
                Item::ContinuousAssign {
                    assign: assign(
                        named("n"),
                        Expression::IntegerLiteral { value: 0b101, width: 3 },
                    ),
                },
            ],
        };
        let module = lower(&instance).unwrap();
        let values: Vec<u32> = (0..3)
            .map(|idx| {
                let wire = module.find(&format!("n_{idx}")).unwrap();
                let gate = module.get(wire).inputs[0];
                let constant = module.get(gate).inputs[0];
                module.get(constant).constant_value().unwrap()
            })
            .collect();
        assert_eq!(values, vec![1, 0, 1]);
    }

    #[test]
    fn process_binds_flops() {
        let instance = counter_instance();
        let module = lower(&instance).unwrap();
        let q = module.find("q").unwrap();
        let signal = module.get(q);
        assert!(signal.kind.is_flop());
        assert_eq!(signal.clock, module.find("clk"));
        assert_eq!(signal.reset, module.find("rst"));
        assert_eq!(signal.inputs.len(), 1);
        let rst_val = signal.rst_val.unwrap();
        assert_eq!(module.get(rst_val).constant_value(), Some(0));
    }

    #[test]
    fn unsupported_direction_is_named() {
        let instance = Instance {
            name: "top".into(),
            items: vec![scalar_port("x", PortDirection::Inout)],
        };
        let err = lower(&instance).unwrap_err();
        assert!(format!("{err}").contains("inout"));
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let instance = Instance {
            name: "top".into(),
            items: vec![
                Item::Net {
                    name: "n".into(),
                    ty: DataType::Packed { msb: 1, lsb: 0 },
                },
                Item::ContinuousAssign {
                    assign: assign(
                        named("n"),
                        Expression::IntegerLiteral { value: 0, width: 3 },
                    ),
                },
            ],
        };
        assert!(lower(&instance).is_err());
    }

    /// One-bit register with an inverter feedback, the smallest complete
    /// clocked design
    pub(crate) fn counter_instance() -> Instance {
        Instance {
            name: "toggle".into(),
            items: vec![
                scalar_port("clk", PortDirection::Input),
                scalar_port("rst", PortDirection::Input),
                scalar_port("o_bit", PortDirection::Output),
                Item::Variable {
                    name: "q".into(),
                    ty: DataType::Scalar,
                },
                Item::Net {
                    name: "d".into(),
                    ty: DataType::Scalar,
                },
                Item::ContinuousAssign {
                    assign: assign(
                        named("d"),
                        Expression::UnaryOp {
                            op: ast::UnaryOperator::BitNot,
                            operand: Box::new(named("q")),
                        },
                    ),
                },
                Item::ContinuousAssign {
                    assign: assign(named("o_bit"), named("q")),
                },
                Item::ProceduralBlock {
                    block: BlockKind::Always,
                    body: Statement::Timed {
                        timing: vec![
                            Timing::PosEdge { expr: named("clk") },
                            Timing::PosEdge { expr: named("rst") },
                        ],
                        stmt: Box::new(Statement::Conditional {
                            cond: named("rst"),
                            if_true: Box::new(Statement::Expression {
                                expr: assign(
                                    named("q"),
                                    Expression::IntegerLiteral { value: 0, width: 1 },
                                ),
                            }),
                            if_false: Box::new(Statement::Expression {
                                expr: assign(named("q"), named("d")),
                            }),
                        }),
                    },
                },
            ],
        }
    }
}
