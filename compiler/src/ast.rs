//! Elaborated netlist AST consumed by the lowering pass.
//!
//! HDL tokenisation and parsing happen upstream; the compiler receives an
//! already-elaborated instance as a JSON document and deserialises it into
//! these types. Only the constructs the lowering understands are expressible;
//! anything else arrives as `DataType::Other` / an unsupported operator and is
//! rejected with the offending kind named.
//!
//! ```rust
//! # use nexus_compiler::ast::Instance;
//! # let json = r#"
//! {
//!   "name": "counter",
//!   "items": [
//!     { "kind": "port", "name": "clk", "direction": "input", "ty": { "kind": "scalar" } },
//!     { "kind": "port", "name": "rst", "direction": "input", "ty": { "kind": "scalar" } },
//!     { "kind": "port", "name": "o_count", "direction": "output",
//!       "ty": { "kind": "packed", "msb": 1, "lsb": 0 } },
//!     { "kind": "variable", "name": "count_q", "ty": { "kind": "packed", "msb": 1, "lsb": 0 } },
//!     { "kind": "net", "name": "count_d", "ty": { "kind": "packed", "msb": 1, "lsb": 0 } },
//!     { "kind": "continuous_assign", "assign": {
//!         "kind": "assignment",
//!         "lhs": { "kind": "named_value", "name": "count_d" },
//!         "rhs": { "kind": "unary_op", "op": "bit_not",
//!                  "operand": { "kind": "named_value", "name": "count_q" } } } },
//!     { "kind": "continuous_assign", "assign": {
//!         "kind": "assignment",
//!         "lhs": { "kind": "named_value", "name": "o_count" },
//!         "rhs": { "kind": "named_value", "name": "count_q" } } },
//!     { "kind": "procedural_block", "block": "always", "body": {
//!         "kind": "timed",
//!         "timing": [
//!           { "kind": "pos_edge", "expr": { "kind": "named_value", "name": "clk" } },
//!           { "kind": "pos_edge", "expr": { "kind": "named_value", "name": "rst" } }
//!         ],
//!         "stmt": {
//!           "kind": "conditional",
//!           "cond": { "kind": "named_value", "name": "rst" },
//!           "if_true": { "kind": "expression", "expr": {
//!               "kind": "assignment",
//!               "lhs": { "kind": "named_value", "name": "count_q" },
//!               "rhs": { "kind": "integer_literal", "value": 0, "width": 2 } } },
//!           "if_false": { "kind": "expression", "expr": {
//!               "kind": "assignment",
//!               "lhs": { "kind": "named_value", "name": "count_q" },
//!               "rhs": { "kind": "named_value", "name": "count_d" } } }
//!         } } }
//!   ]
//! }
//! # "#;
//! # serde_json::from_str::<Instance>(json).unwrap();
//! ```
use serde::{Deserialize, Serialize};

/// One elaborated module instance
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Instance {
    pub name: String,
    pub items: Vec<Item>,
}

/// Top-level declarations and blocks, in source order
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Item {
    Port {
        name: String,
        direction: PortDirection,
        ty: DataType,
    },
    /// Storage (`reg`); becomes flops bound by the containing process
    Variable { name: String, ty: DataType },
    /// A `wire`
    Net { name: String, ty: DataType },
    ContinuousAssign { assign: Expression },
    ProceduralBlock { block: BlockKind, body: Statement },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
    Inout,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataType {
    /// One bit
    Scalar,
    /// Packed array of scalars spanning `[msb:lsb]`
    Packed { msb: u32, lsb: u32 },
    /// Anything the toolchain does not understand; rejected during lowering
    Other { description: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Always,
    Initial,
    Final,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    /// Event-controlled statement; the timing list feeds the trigger set
    Timed {
        timing: Vec<Timing>,
        stmt: Box<Statement>,
    },
    Conditional {
        cond: Expression,
        if_true: Box<Statement>,
        if_false: Box<Statement>,
    },
    Expression { expr: Expression },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Timing {
    PosEdge { expr: Expression },
    NegEdge { expr: Expression },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expression {
    Assignment {
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    NamedValue { name: String },
    IntegerLiteral { value: u64, width: u32 },
    ElementSelect {
        value: Box<Expression>,
        index: u32,
    },
    RangeSelect {
        value: Box<Expression>,
        left: u32,
        right: u32,
    },
    Concatenation { operands: Vec<Expression> },
    Conversion { operand: Box<Expression> },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    ConditionalOp {
        pred: Box<Expression>,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

impl Expression {
    /// Short name used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            Expression::Assignment { .. } => "assignment",
            Expression::NamedValue { .. } => "named value",
            Expression::IntegerLiteral { .. } => "integer literal",
            Expression::ElementSelect { .. } => "element select",
            Expression::RangeSelect { .. } => "range select",
            Expression::Concatenation { .. } => "concatenation",
            Expression::Conversion { .. } => "conversion",
            Expression::UnaryOp { .. } => "unary op",
            Expression::BinaryOp { .. } => "binary op",
            Expression::ConditionalOp { .. } => "conditional op",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOperator {
    /// `~x`: per-bit inversion
    BitNot,
    /// `!x`: single reduction over all bits
    LogicNot,
    /// `&x`
    ReduceAnd,
    /// `|x`
    ReduceOr,
    /// `^x`
    ReduceXor,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    And,
    Or,
    Xor,
}
