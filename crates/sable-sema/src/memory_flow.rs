// crates/sable-sema/src/memory_flow.rs
//! Memory-flow analysis.
//!
//! A whole-package pass that runs after semantic analysis. For every
//! function it determines how the receiver and each parameter flow
//! through the body: borrowed for the duration of the call, escaping into
//! longer-lived storage, or leaving through the return value. Results are
//! memoized on the function itself, with `FlowCategory::Unknown` doubling
//! as the "not yet analysed" sentinel, so call cycles terminate: a
//! function observed mid-walk reports the worst-case receiver flow, and
//! variable flows only ever escalate.
//!
//! On top of the signatures the pass decides which allocations provably
//! never escape their scope (candidates for stack placement) and where
//! releases of managed locals belong: at the end of their block, or
//! attached to the return statement that leaves the block early.

use rustc_hash::FxHashMap;
use sable_frontend::{Expr, Stmt};
use smallvec::SmallVec;
use sable_frontend::NodeId;
use tracing::debug;

use crate::compilation::Compilation;
use crate::diagnostics::{MF_DEINIT_ESCAPES, MF_PARAM_PROMISE, MF_THIS_PROMISE};
use crate::expression_data::{ExpressionData, MemoryFlowData, Release};
use crate::type_def::{FunctionId, FunctionKind, VariableId};
use crate::types::{Type, TypeKind};

/// Unoptionalized value types and enums are copied whenever they are
/// read; an escaping read copies the value and leaves the variable's
/// own storage untouched.
fn copied_at_use(ty: &Type) -> bool {
    let unoptionalized = match ty.kind() {
        TypeKind::Optional(inner) => inner.kind(),
        kind => kind,
    };
    matches!(unoptionalized, TypeKind::ValueType(..) | TypeKind::Enum(_))
}

/// How a value flows through a function.
///
/// The variants are ordered by escalation: analysis may only move a flow
/// towards `Escaping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FlowCategory {
    /// Not yet analysed.
    Unknown,
    /// The value is only used for the duration of the call.
    Borrowing,
    /// The value leaves the function through the return value.
    Return,
    /// The value is stored beyond the call (instance variable, capture,
    /// collection, escaping callee parameter).
    Escaping,
}

impl FlowCategory {
    /// Whether the value leaves the function, through the return value or
    /// into longer-lived storage.
    pub fn is_escaping(self) -> bool {
        matches!(self, FlowCategory::Return | FlowCategory::Escaping)
    }

    /// Whether a value with this flow honours a dispatch-site `promise`.
    /// Borrowing honours everything; a leaving flow is only acceptable
    /// when the promise already allows the value to leave.
    pub fn fulfills_promise(self, promise: FlowCategory) -> bool {
        self == FlowCategory::Borrowing || promise.is_escaping()
    }

    /// Treats the sentinel as the weakest real category.
    fn or_borrowing(self) -> FlowCategory {
        if self == FlowCategory::Unknown {
            FlowCategory::Borrowing
        } else {
            self
        }
    }
}

#[derive(Debug)]
struct MfVariable {
    ty: Type,
    category: FlowCategory,
    /// Allocation expressions assigned to this variable outside loops.
    allocations: SmallVec<[NodeId; 1]>,
    param: Option<usize>,
    /// Whether some return statement hands this variable's value to the
    /// caller. Ownership transfers with it, so exit and block releases
    /// must skip the variable.
    returned: bool,
}

struct FunctionState {
    variables: FxHashMap<VariableId, MfVariable>,
    loop_depth: u32,
    /// Whether the receiver was seen in an escaping position.
    this_escapes: bool,
}

pub struct MemoryFlowAnalyser<'a> {
    compilation: &'a mut Compilation,
    expressions: &'a ExpressionData,
    data: &'a mut MemoryFlowData,
}

impl<'a> MemoryFlowAnalyser<'a> {
    pub fn new(
        compilation: &'a mut Compilation,
        expressions: &'a ExpressionData,
        data: &'a mut MemoryFlowData,
    ) -> Self {
        Self {
            compilation,
            expressions,
            data,
        }
    }

    pub fn analyse_package(&mut self) {
        for index in 0..self.compilation.functions.len() {
            self.analyse_if_necessary(FunctionId::new(index as u32));
        }
    }

    fn analyse_if_necessary(&mut self, id: FunctionId) {
        if self.compilation.functions.get(id).this_flow != FlowCategory::Unknown {
            return;
        }
        // Provisional value observed by recursive calls. It must be the
        // worst case: a callee that reads our provisional flow mid-walk
        // caches it, so an optimistic guess here could never be taken
        // back. The real flow replaces it once the walk finishes.
        self.compilation.functions.get_mut(id).this_flow = FlowCategory::Escaping;

        let Some(body) = self.compilation.bodies.remove(&id) else {
            // No body to inspect (protocol requirements, well-known
            // declarations): assume everything escapes.
            let f = self.compilation.functions.get_mut(id);
            f.this_flow = FlowCategory::Escaping;
            for param in &mut f.params {
                param.flow = FlowCategory::Escaping;
            }
            return;
        };
        debug!(function = %self.compilation.functions.get(id).name, "memory-flow analysis");

        let mut state = FunctionState {
            variables: FxHashMap::default(),
            loop_depth: 0,
            this_escapes: false,
        };
        for (index, param) in self.compilation.functions.get(id).params.iter().enumerate() {
            state.variables.insert(
                VariableId::new(index as u32),
                MfVariable {
                    ty: param.ty.clone(),
                    category: FlowCategory::Borrowing,
                    allocations: SmallVec::new(),
                    param: Some(index),
                    returned: false,
                },
            );
        }

        self.analyse_block(&body, &mut state);
        self.compilation.bodies.insert(id, body);

        self.compilation.functions.get_mut(id).this_flow = if state.this_escapes {
            FlowCategory::Escaping
        } else {
            FlowCategory::Borrowing
        };
        for variable in state.variables.values() {
            if let Some(index) = variable.param {
                self.compilation.functions.get_mut(id).params[index].flow = variable.category;
            }
        }

        self.check_deinitializer(id);
        self.check_super_promises(id);
    }

    fn analyse_block(&mut self, block: &sable_frontend::Block, state: &mut FunctionState) {
        let mut declared: Vec<VariableId> = Vec::new();
        // Statements past the block's stop index are dead code; they were
        // type-checked but get no releases or allocations.
        let stop = self
            .expressions
            .block_info
            .get(&block.id)
            .map_or(block.stmts.len(), |info| info.stop);
        for stmt in &block.stmts[..stop] {
            self.analyse_stmt(stmt, state, &mut declared);
        }

        let mut releases = Vec::new();
        for variable_id in &declared {
            let Some(variable) = state.variables.get(variable_id) else {
                continue;
            };
            if variable.category == FlowCategory::Borrowing {
                for allocation in &variable.allocations {
                    self.data.stack_allocations.insert(*allocation);
                }
            }
            if !variable.returned && variable.ty.is_managed(&self.compilation.type_defs) {
                releases.push(Release {
                    in_instance_scope: false,
                    id: *variable_id,
                    ty: variable.ty.clone(),
                });
            }
        }
        let returned_certainly = self
            .expressions
            .block_info
            .get(&block.id)
            .is_some_and(|info| info.returned_certainly);
        if !returned_certainly && !releases.is_empty() {
            self.data.block_releases.insert(block.id, releases);
        }
    }

    fn analyse_stmt(
        &mut self,
        stmt: &Stmt,
        state: &mut FunctionState,
        declared: &mut Vec<VariableId>,
    ) {
        match stmt {
            Stmt::Expr { expr, .. } => {
                self.analyse_expr(expr, FlowCategory::Borrowing, state);
            }
            Stmt::VarDeclaration { id, .. } => {
                if let Some(access) = self.expressions.var_accesses.get(id) {
                    state.variables.insert(
                        access.id,
                        MfVariable {
                            ty: access.ty.clone(),
                            category: FlowCategory::Borrowing,
                            allocations: SmallVec::new(),
                            param: None,
                            returned: false,
                        },
                    );
                    declared.push(access.id);
                }
            }
            Stmt::VarDeclareAssign { id, expr, .. } => {
                let Some(access) = self.expressions.var_accesses.get(id) else {
                    return;
                };
                state.variables.insert(
                    access.id,
                    MfVariable {
                        ty: access.ty.clone(),
                        category: FlowCategory::Borrowing,
                        allocations: SmallVec::new(),
                        param: None,
                        returned: false,
                    },
                );
                declared.push(access.id);
                self.analyse_assignment_value(expr, false, Some(access.id), state);
            }
            Stmt::Assign { id, expr, .. } => {
                let Some(access) = self.expressions.var_accesses.get(id) else {
                    return;
                };
                let target = if access.in_instance_scope {
                    None
                } else {
                    Some(access.id)
                };
                self.analyse_assignment_value(expr, access.in_instance_scope, target, state);
            }
            Stmt::Return { id, value, .. } => {
                if let Some(value) = value {
                    self.analyse_expr(value, FlowCategory::Return, state);
                }
                self.record_exit_releases(*id, state);
            }
            Stmt::Raise { id, value, .. } => {
                self.analyse_expr(value, FlowCategory::Escaping, state);
                self.record_exit_releases(*id, state);
            }
            Stmt::SuperInit { id, args, .. } => {
                let target = self.expressions.call_targets.get(id).copied();
                let (_, param_flows) = self.callee_flows(target);
                for (index, arg) in args.iter().enumerate() {
                    let flow = param_flows
                        .get(index)
                        .copied()
                        .unwrap_or(FlowCategory::Escaping);
                    self.analyse_expr(arg, flow, state);
                }
            }
            Stmt::If {
                conditions,
                blocks,
                else_block,
                ..
            } => {
                for condition in conditions {
                    self.analyse_expr(condition, FlowCategory::Borrowing, state);
                }
                for block in blocks {
                    self.analyse_block(block, state);
                }
                if let Some(else_block) = else_block {
                    self.analyse_block(else_block, state);
                }
            }
            Stmt::While {
                condition, block, ..
            } => {
                self.analyse_expr(condition, FlowCategory::Borrowing, state);
                state.loop_depth += 1;
                self.analyse_block(block, state);
                state.loop_depth -= 1;
            }
        }
    }

    /// Analyses the right-hand side of an assignment. A fresh allocation
    /// assigned outside any loop becomes a stack-placement candidate tied
    /// to the variable's fate; aliasing an existing variable pins both
    /// conservatively.
    fn analyse_assignment_value(
        &mut self,
        expr: &Expr,
        into_instance: bool,
        target: Option<VariableId>,
        state: &mut FunctionState,
    ) {
        if into_instance {
            self.analyse_expr(expr, FlowCategory::Escaping, state);
            return;
        }
        match expr {
            Expr::Init { .. } | Expr::ListLiteral { .. } | Expr::Closure { .. } => {
                self.analyse_expr(expr, FlowCategory::Borrowing, state);
                if state.loop_depth == 0 {
                    if let Some(target) = target {
                        if let Some(variable) = state.variables.get_mut(&target) {
                            variable.allocations.push(expr.id());
                        }
                    }
                }
            }
            Expr::GetVariable { .. } => {
                self.analyse_expr(expr, FlowCategory::Escaping, state);
            }
            _ => {
                self.analyse_expr(expr, FlowCategory::Borrowing, state);
            }
        }
    }

    fn analyse_expr(
        &mut self,
        expr: &Expr,
        category: FlowCategory,
        state: &mut FunctionState,
    ) {
        match expr {
            Expr::IntLiteral { .. }
            | Expr::StringLiteral { .. }
            | Expr::BoolLiteral { .. }
            | Expr::NoValue { .. } => {}
            Expr::GetVariable { id, .. } => {
                let Some(access) = self.expressions.var_accesses.get(id) else {
                    return;
                };
                if access.in_instance_scope {
                    return;
                }
                if let Some(variable) = state.variables.get_mut(&access.id) {
                    if category == FlowCategory::Return {
                        if variable.param.is_some() {
                            // Returning a parameter transfers nothing the
                            // caller does not already own.
                            return;
                        }
                        variable.returned = true;
                    }
                    if category.is_escaping() && !copied_at_use(&variable.ty) {
                        variable.category = variable.category.max(category);
                    }
                }
            }
            Expr::This { .. } => {
                // Returning the receiver hands the caller a reference it
                // already holds; only genuinely escaping uses count.
                if category == FlowCategory::Escaping {
                    state.this_escapes = true;
                }
            }
            Expr::ListLiteral { elements, .. } => {
                for element in elements {
                    self.analyse_expr(element, FlowCategory::Escaping, state);
                }
            }
            Expr::Cast { expr, .. } => {
                self.analyse_expr(expr, category, state);
            }
            Expr::Closure { id, .. } => {
                if let Some(closure_fn) = self.expressions.closure_functions.get(id) {
                    self.analyse_if_necessary(*closure_fn);
                }
                // Captured variables are retained by the closure object.
                if let Some(captures) = self.expressions.captures.get(id) {
                    for capture in captures {
                        if let Some(variable) = state.variables.get_mut(&capture.source_id) {
                            variable.category = FlowCategory::Escaping;
                        }
                    }
                }
                if self.expressions.self_captures.contains(id) {
                    state.this_escapes = true;
                }
            }
            Expr::Call {
                id,
                receiver,
                args,
                ..
            } => {
                let target = self.expressions.call_targets.get(id).copied();
                let (this_flow, param_flows) = self.callee_flows(target);
                if let Some(receiver) = receiver {
                    self.analyse_expr(receiver, this_flow, state);
                }
                self.analyse_arguments(args, &param_flows, state);
            }
            Expr::TypeCall { id, args, .. } | Expr::Init { id, args, .. } => {
                let target = self.expressions.call_targets.get(id).copied();
                let (_, param_flows) = self.callee_flows(target);
                self.analyse_arguments(args, &param_flows, state);
            }
        }
    }

    fn analyse_arguments(
        &mut self,
        args: &[Expr],
        param_flows: &[FlowCategory],
        state: &mut FunctionState,
    ) {
        for (index, arg) in args.iter().enumerate() {
            let flow = param_flows
                .get(index)
                .copied()
                .unwrap_or(FlowCategory::Escaping);
            self.analyse_expr(arg, flow, state);
        }
    }

    /// The receiver and parameter flows of a callee, analysing it first if
    /// necessary. A missing target (callable-value invocation) borrows the
    /// receiver and lets the arguments escape.
    fn callee_flows(&mut self, target: Option<FunctionId>) -> (FlowCategory, Vec<FlowCategory>) {
        let Some(target) = target else {
            return (FlowCategory::Borrowing, Vec::new());
        };
        self.analyse_if_necessary(target);
        let f = self.compilation.functions.get(target);
        let this = f.this_flow.or_borrowing();
        let params = f.params.iter().map(|p| p.flow.or_borrowing()).collect();
        (this, params)
    }

    /// Records the releases belonging to an early exit: every managed
    /// local that is live at this point, except parameters (owned by the
    /// caller) and variables whose values are handed back to the caller.
    fn record_exit_releases(&mut self, stmt_id: NodeId, state: &FunctionState) {
        let mut releases = Vec::new();
        for (variable_id, variable) in &state.variables {
            if variable.param.is_some() || variable.returned {
                continue;
            }
            if variable.ty.is_managed(&self.compilation.type_defs) {
                releases.push(Release {
                    in_instance_scope: false,
                    id: *variable_id,
                    ty: variable.ty.clone(),
                });
            }
        }
        if !releases.is_empty() {
            releases.sort_by_key(|release| release.id);
            self.data.return_releases.insert(stmt_id, releases);
        }
    }

    /// The receiver must not leave a deinitializer: it is being destroyed.
    fn check_deinitializer(&mut self, id: FunctionId) {
        let f = self.compilation.functions.get(id);
        if f.kind == FunctionKind::Deinitializer && f.this_flow == FlowCategory::Escaping {
            let span = f.span;
            self.compilation.diagnostics.emit(
                &MF_DEINIT_ESCAPES,
                span,
                "The instance must not escape its deinitializer.",
            );
        }
    }

    /// An override must not escape what the overridden function promises
    /// to borrow; callers dispatch through the superclass signature.
    fn check_super_promises(&mut self, id: FunctionId) {
        let Some(super_id) = self.compilation.functions.get(id).super_function else {
            return;
        };
        self.analyse_if_necessary(super_id);
        let super_this = self.compilation.functions.get(super_id).this_flow;
        let super_params: Vec<FlowCategory> = self
            .compilation
            .functions
            .get(super_id)
            .params
            .iter()
            .map(|p| p.flow)
            .collect();
        let f = self.compilation.functions.get(id);
        let span = f.span;
        let this_flow = f.this_flow;
        let param_flows: Vec<FlowCategory> = f.params.iter().map(|p| p.flow).collect();

        if !this_flow.fulfills_promise(super_this) {
            self.compilation.diagnostics.emit(
                &MF_THIS_PROMISE,
                span,
                "The overridden method promises not to escape the receiver.",
            );
        }
        for (index, (sub, super_)) in param_flows.iter().zip(&super_params).enumerate() {
            if !sub.fulfills_promise(*super_) {
                self.compilation.diagnostics.emit(
                    &MF_PARAM_PROMISE,
                    span,
                    format!(
                        "Parameter {} escapes, but the overridden method promises to borrow it.",
                        index + 1
                    ),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_categories_only_escalate() {
        assert!(FlowCategory::Borrowing < FlowCategory::Return);
        assert!(FlowCategory::Return < FlowCategory::Escaping);
        assert_eq!(
            FlowCategory::Borrowing.max(FlowCategory::Escaping),
            FlowCategory::Escaping
        );
        assert_eq!(FlowCategory::Unknown.or_borrowing(), FlowCategory::Borrowing);
        assert_eq!(FlowCategory::Escaping.or_borrowing(), FlowCategory::Escaping);
    }

    #[test]
    fn borrowing_fulfills_every_promise() {
        for promise in [
            FlowCategory::Borrowing,
            FlowCategory::Return,
            FlowCategory::Escaping,
        ] {
            assert!(FlowCategory::Borrowing.fulfills_promise(promise));
        }
    }

    #[test]
    fn leaving_flows_need_a_leaving_promise() {
        assert!(!FlowCategory::Return.fulfills_promise(FlowCategory::Borrowing));
        assert!(!FlowCategory::Escaping.fulfills_promise(FlowCategory::Borrowing));
        assert!(FlowCategory::Return.fulfills_promise(FlowCategory::Return));
        assert!(FlowCategory::Escaping.fulfills_promise(FlowCategory::Return));
        assert!(FlowCategory::Escaping.fulfills_promise(FlowCategory::Escaping));
    }
}
