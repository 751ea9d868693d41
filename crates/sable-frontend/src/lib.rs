// crates/sable-frontend/src/lib.rs
//! AST node types and source spans for the Sable compiler.
//!
//! The lexer and parser are external collaborators; semantic analysis only
//! depends on the tree shapes defined here.

pub mod ast;
pub mod span;

pub use ast::{
    Block, ClosureLit, Expr, Mood, NodeId, NodeIdGen, ParamDecl, Stmt, TypeExpr,
};
pub use span::Span;
