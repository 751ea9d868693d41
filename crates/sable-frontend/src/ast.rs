// crates/sable-frontend/src/ast.rs
//! Tree shapes produced by the parser and consumed by semantic analysis.
//!
//! The parser itself lives elsewhere; this module only defines the node
//! types. Every expression, statement and block carries a `NodeId` so that
//! the analysers can attach their results in side tables instead of
//! mutating the tree.

use crate::span::Span;

/// Identifies a single AST node. Unique within a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

/// Hands out fresh `NodeId`s. The parser owns one per compilation; the
/// semantic analyser reuses it when synthesizing thunk bodies.
#[derive(Debug, Default)]
pub struct NodeIdGen {
    next: u32,
}

impl NodeIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

/// The calling-convention qualifier on a member name. Together with the
/// name it forms the unique lookup key for methods and initializers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mood {
    Imperative,
    Interrogative,
    Assertive,
}

/// A parsed (unresolved) type annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// A nominal type reference, possibly with generic arguments.
    Named {
        name: String,
        generic_args: Vec<TypeExpr>,
        span: Span,
    },
    Optional(Box<TypeExpr>, Span),
    Callable {
        params: Vec<TypeExpr>,
        ret: Option<Box<TypeExpr>>,
        span: Span,
    },
    Something(Span),
    Someobject(Span),
}

impl TypeExpr {
    pub fn span(&self) -> Span {
        match self {
            TypeExpr::Named { span, .. }
            | TypeExpr::Optional(_, span)
            | TypeExpr::Callable { span, .. }
            | TypeExpr::Something(span)
            | TypeExpr::Someobject(span) => *span,
        }
    }
}

/// A parameter of a function or closure literal.
#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

/// The body of a closure expression. Analysed as a nested function.
#[derive(Debug, Clone)]
pub struct ClosureLit {
    pub params: Vec<ParamDecl>,
    pub return_type: Option<TypeExpr>,
    pub body: Block,
    /// Whether the closure may outlive the enclosing call frame.
    pub escaping: bool,
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLiteral {
        id: NodeId,
        span: Span,
        value: i64,
    },
    StringLiteral {
        id: NodeId,
        span: Span,
        value: String,
    },
    BoolLiteral {
        id: NodeId,
        span: Span,
        value: bool,
    },
    /// The explicit "no value" literal for optionals.
    NoValue {
        id: NodeId,
        span: Span,
    },
    ListLiteral {
        id: NodeId,
        span: Span,
        elements: Vec<Expr>,
    },
    GetVariable {
        id: NodeId,
        span: Span,
        name: String,
    },
    This {
        id: NodeId,
        span: Span,
    },
    /// A method call on a receiver, or a free-function call when the
    /// receiver is absent.
    Call {
        id: NodeId,
        span: Span,
        receiver: Option<Box<Expr>>,
        name: String,
        mood: Mood,
        args: Vec<Expr>,
    },
    /// A call to a type method, dispatched on the type itself.
    TypeCall {
        id: NodeId,
        span: Span,
        type_name: String,
        name: String,
        mood: Mood,
        args: Vec<Expr>,
    },
    /// Instantiation of a nominal type via one of its initializers.
    /// Heap-allocating for class types until memory-flow analysis decides
    /// otherwise.
    Init {
        id: NodeId,
        span: Span,
        type_name: String,
        name: String,
        args: Vec<Expr>,
    },
    Cast {
        id: NodeId,
        span: Span,
        expr: Box<Expr>,
        target: TypeExpr,
    },
    Closure {
        id: NodeId,
        span: Span,
        closure: Box<ClosureLit>,
    },
}

impl Expr {
    pub fn id(&self) -> NodeId {
        match self {
            Expr::IntLiteral { id, .. }
            | Expr::StringLiteral { id, .. }
            | Expr::BoolLiteral { id, .. }
            | Expr::NoValue { id, .. }
            | Expr::ListLiteral { id, .. }
            | Expr::GetVariable { id, .. }
            | Expr::This { id, .. }
            | Expr::Call { id, .. }
            | Expr::TypeCall { id, .. }
            | Expr::Init { id, .. }
            | Expr::Cast { id, .. }
            | Expr::Closure { id, .. } => *id,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Expr::IntLiteral { span, .. }
            | Expr::StringLiteral { span, .. }
            | Expr::BoolLiteral { span, .. }
            | Expr::NoValue { span, .. }
            | Expr::ListLiteral { span, .. }
            | Expr::GetVariable { span, .. }
            | Expr::This { span, .. }
            | Expr::Call { span, .. }
            | Expr::TypeCall { span, .. }
            | Expr::Init { span, .. }
            | Expr::Cast { span, .. }
            | Expr::Closure { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr {
        id: NodeId,
        expr: Expr,
    },
    /// `decl name: T`: declares without assigning. Optional-typed
    /// variables start out as "no value".
    VarDeclaration {
        id: NodeId,
        span: Span,
        name: String,
        ty: TypeExpr,
    },
    /// `let name = expr` / `var name = expr`.
    VarDeclareAssign {
        id: NodeId,
        span: Span,
        name: String,
        constant: bool,
        expr: Expr,
    },
    Assign {
        id: NodeId,
        span: Span,
        name: String,
        expr: Expr,
    },
    Return {
        id: NodeId,
        span: Span,
        value: Option<Expr>,
    },
    Raise {
        id: NodeId,
        span: Span,
        value: Expr,
    },
    /// A call to a superclass initializer; only legal inside an object
    /// initializer of a class with a superclass.
    SuperInit {
        id: NodeId,
        span: Span,
        name: String,
        args: Vec<Expr>,
    },
    If {
        id: NodeId,
        span: Span,
        conditions: Vec<Expr>,
        blocks: Vec<Block>,
        else_block: Option<Block>,
    },
    While {
        id: NodeId,
        span: Span,
        condition: Expr,
        block: Block,
    },
}

impl Stmt {
    pub fn id(&self) -> NodeId {
        match self {
            Stmt::Expr { id, .. }
            | Stmt::VarDeclaration { id, .. }
            | Stmt::VarDeclareAssign { id, .. }
            | Stmt::Assign { id, .. }
            | Stmt::Return { id, .. }
            | Stmt::Raise { id, .. }
            | Stmt::SuperInit { id, .. }
            | Stmt::If { id, .. }
            | Stmt::While { id, .. } => *id,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Stmt::Expr { expr, .. } => expr.span(),
            Stmt::VarDeclaration { span, .. }
            | Stmt::VarDeclareAssign { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Raise { span, .. }
            | Stmt::SuperInit { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub id: NodeId,
    pub span: Span,
    pub stmts: Vec<Stmt>,
}
