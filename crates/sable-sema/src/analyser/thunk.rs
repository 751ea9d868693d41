// crates/sable-sema/src/analyser/thunk.rs
//! Synthesizes boxing thunks.
//!
//! When a type conforms to a protocol but the implementing method's
//! calling convention differs from the protocol's (concrete storage
//! instead of boxes), the dispatch table cannot point at the
//! implementation directly. A thunk with the protocol's exact signature
//! is synthesized instead; its body simply forwards to the real method.
//! The thunk is not registered in the method name table, so the forwarding
//! call inside it resolves to the implementation, and the usual
//! complication machinery inserts the unboxing and boxing conversions.

use sable_frontend::{Block, Expr, Mood, Span, Stmt};
use tracing::debug;

use crate::compilation::Compilation;
use crate::type_def::{Function, FunctionId, FunctionKind, Parameter, TypeDefId};
use crate::types::Type;

pub(crate) fn build_boxing_thunk(
    compilation: &mut Compilation,
    owner: TypeDefId,
    name: &str,
    mood: Mood,
    params: Vec<Type>,
    return_type: Type,
    span: Span,
) -> FunctionId {
    debug!(owner = %compilation.type_defs.get(owner).name, method = name, "building boxing thunk");
    let kind = if compilation.type_defs.get(owner).is_class() {
        FunctionKind::ObjectMethod
    } else {
        FunctionKind::ValueTypeMethod
    };
    let mut function = Function::new(name, mood, kind, Some(owner), span);
    function.params = params
        .iter()
        .enumerate()
        .map(|(index, ty)| Parameter::synthesized(format!("arg{}", index), ty.clone()))
        .collect();
    function.return_type = return_type.clone();
    function.declared = true;
    let id = compilation.functions.alloc(function);

    let args = (0..params.len())
        .map(|index| Expr::GetVariable {
            id: compilation.node_ids.fresh(),
            span,
            name: format!("arg{}", index),
        })
        .collect();
    let call = Expr::Call {
        id: compilation.node_ids.fresh(),
        span,
        receiver: Some(Box::new(Expr::This {
            id: compilation.node_ids.fresh(),
            span,
        })),
        name: name.to_owned(),
        mood,
        args,
    };
    let stmt = if return_type.is_no_return() {
        Stmt::Expr {
            id: compilation.node_ids.fresh(),
            expr: call,
        }
    } else {
        Stmt::Return {
            id: compilation.node_ids.fresh(),
            span,
            value: Some(call),
        }
    };
    let body = Block {
        id: compilation.node_ids.fresh(),
        span,
        stmts: vec![stmt],
    };
    compilation.bodies.insert(id, body);
    id
}
