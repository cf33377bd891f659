//! Abstract syntax tree for the plugin scripting language.
//!
//! The language is a small JavaScript-like subset: function and variable
//! declarations, one optional `export default`, structured control flow, and
//! expression forms sufficient for building UI trees. There is no `this`, no
//! prototype chain, and no `try`/`catch`; thrown values always unwind to the
//! host boundary.

/// A parsed top-level program.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

impl Program {
    /// Names bound by top-level `function` and variable declarations, in
    /// declaration order. Used by the host to resolve which binding is the
    /// component when no default export is present.
    pub fn declared_names(&self) -> impl Iterator<Item = &str> {
        self.body.iter().filter_map(|stmt| match stmt {
            Stmt::FunctionDecl { name, .. } => Some(name.as_str()),
            Stmt::VarDecl { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Whether the program contains an `export default` statement.
    #[must_use]
    pub fn has_default_export(&self) -> bool {
        self.body
            .iter()
            .any(|stmt| matches!(stmt, Stmt::ExportDefault { .. }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    FunctionDecl {
        name: String,
        params: Vec<String>,
        body: Vec<Stmt>,
    },
    /// `let`, `const`, and `var` are all treated as a mutable binding;
    /// `const` reassignment is not diagnosed.
    VarDecl {
        name: String,
        init: Option<Expr>,
    },
    ExportDefault {
        value: Expr,
    },
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Return {
        value: Option<Expr>,
    },
    Break,
    Continue,
    Throw {
        value: Expr,
    },
    Expr {
        expr: Expr,
    },
    Block {
        body: Vec<Stmt>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    /// Both `null` and `undefined` in source collapse to this.
    Null,
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    /// Function expressions and arrow functions. Arrows with expression
    /// bodies are desugared to a single `return` statement.
    Function {
        params: Vec<String>,
        body: Vec<Stmt>,
    },
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `new Name(args)`. Only error-style constructors have defined meaning.
    New {
        callee: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `&&` and `||`, short-circuiting and value-preserving.
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then_value: Box<Expr>,
        else_value: Box<Expr>,
    },
    /// `target = value` where target is an identifier, member, or index.
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    TypeOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    StrictEq,
    NotEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}
