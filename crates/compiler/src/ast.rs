//! Abstract syntax produced by the parser and consumed by codegen.

use oyc_runtime::SourceLocation;

#[derive(Debug, Clone)]
pub struct Program {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expr(Expr),
    Let {
        name: String,
        value: Expr,
    },
    If {
        init: Option<Box<Stmt>>,
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    DoWhile {
        body: Vec<Stmt>,
        cond: Expr,
    },
    ForC {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Vec<Stmt>,
    },
    ForEach {
        key_name: String,
        value_name: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Switch {
        init: Option<Box<Stmt>>,
        subject: Expr,
        cases: Vec<(Expr, Vec<Stmt>)>,
        default: Option<Vec<Stmt>>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Delete(LValue),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone)]
pub enum LValue {
    Ident(String),
    Index(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone)]
pub enum ArrayItem {
    Positional(Expr),
    Indexed(Expr, Expr),
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Array(Vec<ArrayItem>),
    Struct(Vec<(StructKey, Expr)>),
    Function {
        params: Vec<String>,
        body: Vec<Stmt>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Cast(CastKind, Box<Expr>),
    TypeOf(Box<Expr>),
    SizeOf(Box<Expr>),
    Require {
        path: Box<Expr>,
        args: Vec<Expr>,
    },
    Assign {
        target: LValue,
        op: Option<BinaryOp>,
        value: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    PreIncDec {
        op: IncDecOp,
        target: LValue,
    },
    PostIncDec {
        op: IncDecOp,
        target: LValue,
    },
}

#[derive(Debug, Clone)]
pub enum StructKey {
    Ident(String),
    Computed(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

pub use oyc_runtime::CastKind;
