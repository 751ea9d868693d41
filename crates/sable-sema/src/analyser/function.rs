// crates/sable-sema/src/analyser/function.rs
//! Analyses one function body.
//!
//! The analyser owns the function's scope stack and path analyser and
//! writes its findings into the shared side tables. Hard errors abort the
//! function; the package analyser records them and moves on.

use sable_frontend::{Block, Expr, Span, Stmt};
use tracing::trace;

use crate::compilation::Compilation;
use crate::diagnostics::{
    AnalysisResult, CompilerError, SEMA_NOT_MUTATING, SEMA_SUPER_INIT, SEMA_UNINITIALIZED,
    WARN_DEAD_CODE,
};
use crate::expression_data::{Capture, ExpressionData, Release, VarAccess};
use crate::path::{Incident, PathAnalyser};
use crate::scope::{Scope, Scoper, Variable};
use crate::type_def::{FunctionId, FunctionKind, VariableId};
use crate::types::{Type, TypeContext};

/// A variable lookup result, detached from the scoper's borrows.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedAccess {
    pub in_instance_scope: bool,
    pub id: VariableId,
    pub ty: Type,
    pub constant: bool,
}

pub(crate) struct FunctionAnalyser<'a> {
    pub(crate) compilation: &'a mut Compilation,
    pub(crate) data: &'a mut ExpressionData,
    pub(crate) function: FunctionId,
    pub(crate) scoper: Scoper,
    pub(crate) path: PathAnalyser,
    pub(crate) type_context: TypeContext,
    /// Snapshot of the enclosing function's visible locals; present only
    /// when analysing a closure body.
    pub(crate) capture_env: Option<Vec<Variable>>,
    pub(crate) captures: Vec<Capture>,
}

impl<'a> FunctionAnalyser<'a> {
    pub(crate) fn new(
        compilation: &'a mut Compilation,
        data: &'a mut ExpressionData,
        function: FunctionId,
    ) -> Self {
        Self::build(compilation, data, function, None)
    }

    pub(crate) fn for_closure(
        compilation: &'a mut Compilation,
        data: &'a mut ExpressionData,
        function: FunctionId,
        capture_env: Vec<Variable>,
    ) -> Self {
        Self::build(compilation, data, function, Some(capture_env))
    }

    fn build(
        compilation: &'a mut Compilation,
        data: &'a mut ExpressionData,
        function: FunctionId,
        capture_env: Option<Vec<Variable>>,
    ) -> Self {
        let f = compilation.functions.get(function);
        let kind = f.kind;
        let owner = f.owner;

        let type_context = match owner {
            Some(owner) => TypeContext::new(compilation.self_type(owner)),
            None => TypeContext::empty(),
        };

        let instance_scope = match owner {
            Some(owner) if kind.has_this() => {
                let def = compilation.type_defs.get(owner);
                if def.is_protocol() {
                    None
                } else {
                    let mut scope = Scope::default();
                    for (index, ivar) in def.instance_variables.iter().enumerate() {
                        let Some(ty) = ivar.resolved.clone() else {
                            continue;
                        };
                        scope.insert(Variable {
                            name: ivar.name.clone(),
                            ty,
                            id: VariableId::new(index as u32),
                            constant: false,
                            declaration_span: ivar.span,
                        });
                    }
                    Some(scope)
                }
            }
            _ => None,
        };

        let mut scoper = Scoper::new(instance_scope);
        let mut path = PathAnalyser::new();

        let f = compilation.functions.get(function);
        for param in &f.params {
            let variable =
                scoper.declare_unchecked(&param.name, param.ty.clone(), true, f.span);
            path.record(Incident::initialized(false, variable.id));
        }

        // Instance variables count as initialized everywhere except inside
        // an initializer, where initialization is what is being checked.
        if let Some(owner) = owner {
            if kind.has_this() {
                for (index, ivar) in
                    compilation.type_defs.get(owner).instance_variables.iter().enumerate()
                {
                    let pre_initialized = !kind.is_initializer()
                        || ivar.init.is_some()
                        || ivar.resolved.as_ref().is_some_and(|t| t.is_optional());
                    if pre_initialized {
                        path.record(Incident::initialized(true, VariableId::new(index as u32)));
                    }
                }
            }
        }

        Self {
            compilation,
            data,
            function,
            scoper,
            path,
            type_context,
            capture_env,
            captures: Vec::new(),
        }
    }

    pub(crate) fn analyse(&mut self, body: &Block) -> AnalysisResult<()> {
        trace!(
            function = %self.compilation.functions.get(self.function).name,
            "analysing function body"
        );
        self.analyse_block(body)?;
        self.finalize()
    }

    pub(crate) fn analyse_block(&mut self, block: &Block) -> AnalysisResult<()> {
        self.scoper.push_scope();
        let mut stop = None;
        for (index, stmt) in block.stmts.iter().enumerate() {
            if stop.is_none() && self.path.has_certainly(Incident::Returned) {
                // Dead statements are still type-checked but excluded from
                // memory flow and code generation.
                stop = Some(index);
                self.compilation.diagnostics.emit(
                    &WARN_DEAD_CODE,
                    stmt.span(),
                    "Code will never be executed.",
                );
            }
            self.analyse_stmt(stmt)?;
        }
        let stats = self.scoper.pop_scope();
        self.data.block_info.insert(
            block.id,
            crate::expression_data::BlockInfo {
                returned_certainly: self.path.has_certainly(Incident::Returned),
                stop: stop.unwrap_or(block.stmts.len()),
                stats,
            },
        );
        Ok(())
    }

    fn analyse_stmt(&mut self, stmt: &Stmt) -> AnalysisResult<()> {
        match stmt {
            Stmt::Expr { expr, .. } => {
                self.analyse_expr(expr, None)?;
                Ok(())
            }
            Stmt::VarDeclaration { id, span, name, ty } => {
                let owner = self.compilation.functions.get(self.function).owner;
                let ty = self
                    .compilation
                    .resolve_type_expr(ty, owner)?
                    .apply_minimal_boxing();
                let variable = self.scoper.declare(
                    name,
                    ty.clone(),
                    false,
                    *span,
                    &mut self.compilation.diagnostics,
                );
                let variable_id = variable.id;
                // Optionals start out as "no value" and are therefore
                // usable right away.
                if ty.is_optional() {
                    self.path.record(Incident::initialized(false, variable_id));
                }
                self.data.var_accesses.insert(
                    *id,
                    VarAccess {
                        in_instance_scope: false,
                        id: variable_id,
                        ty,
                    },
                );
                Ok(())
            }
            Stmt::VarDeclareAssign {
                id,
                span,
                name,
                constant,
                expr,
            } => {
                let mut ty = self.analyse_expr(expr, None)?;
                if ty.is_no_return() {
                    return Err(CompilerError::new(
                        *span,
                        "The expression does not produce a value.",
                    ));
                }
                ty.set_reference(false);
                let variable = self.scoper.declare(
                    name,
                    ty.clone(),
                    *constant,
                    *span,
                    &mut self.compilation.diagnostics,
                );
                let variable_id = variable.id;
                self.path.record(Incident::initialized(false, variable_id));
                self.data.var_accesses.insert(
                    *id,
                    VarAccess {
                        in_instance_scope: false,
                        id: variable_id,
                        ty,
                    },
                );
                Ok(())
            }
            Stmt::Assign {
                id,
                span,
                name,
                expr,
            } => {
                let access = self.resolve_variable(name, *span)?;
                if access.constant {
                    return Err(CompilerError::new(
                        *span,
                        format!("Cannot assign to constant \"{}\".", name),
                    ));
                }
                if access.in_instance_scope {
                    self.check_instance_mutation(*span);
                }
                self.expect(expr, &access.ty.clone())?;
                self.path
                    .record(Incident::initialized(access.in_instance_scope, access.id));
                self.data.var_accesses.insert(
                    *id,
                    VarAccess {
                        in_instance_scope: access.in_instance_scope,
                        id: access.id,
                        ty: access.ty,
                    },
                );
                Ok(())
            }
            Stmt::Return { span, value, .. } => self.analyse_return(*span, value.as_ref()),
            Stmt::Raise { id, span, value } => self.analyse_raise(*id, *span, value),
            Stmt::SuperInit {
                id,
                span,
                name,
                args,
            } => self.analyse_super_init(*id, *span, name, args),
            Stmt::If {
                conditions,
                blocks,
                else_block,
                ..
            } => {
                let bool_type = self.compilation.bool_type();
                for condition in conditions {
                    self.expect(condition, &bool_type)?;
                }
                for block in blocks {
                    self.path.begin_branch();
                    self.analyse_block(block)?;
                    self.path.end_branch();
                }
                if let Some(else_block) = else_block {
                    self.path.begin_branch();
                    self.analyse_block(else_block)?;
                    self.path.end_branch();
                    self.path.finish_mutually_exclusive_branches();
                } else {
                    self.path.finish_uncertain_branches();
                }
                Ok(())
            }
            Stmt::While {
                condition, block, ..
            } => {
                let bool_type = self.compilation.bool_type();
                self.expect(condition, &bool_type)?;
                self.path.begin_branch();
                self.analyse_block(block)?;
                self.path.end_branch();
                self.path.finish_uncertain_branches();
                Ok(())
            }
        }
    }

    fn analyse_return(&mut self, span: Span, value: Option<&Expr>) -> AnalysisResult<()> {
        let f = self.compilation.functions.get(self.function);
        let kind = f.kind;
        let return_type = f.return_type.clone();
        match value {
            Some(value) => {
                if kind.is_initializer() {
                    return Err(CompilerError::new(
                        span,
                        "An initializer cannot return a value.",
                    ));
                }
                if return_type.is_no_return() {
                    return Err(CompilerError::new(
                        span,
                        "This function does not return a value.",
                    ));
                }
                self.expect(value, &return_type)?;
                if return_type.is_reference() {
                    let returns_instance_variable = matches!(
                        value,
                        Expr::GetVariable { name, .. }
                            if self.scoper.resolve(name).is_some_and(|r| r.in_instance_scope)
                    );
                    if !returns_instance_variable {
                        return Err(CompilerError::new(
                            span,
                            "Only instance variables can be returned by reference.",
                        ));
                    }
                }
            }
            None => {
                if !return_type.is_no_return() && !kind.is_initializer() {
                    return Err(CompilerError::new(span, "A return value is required."));
                }
            }
        }
        self.path.record(Incident::Returned);
        Ok(())
    }

    fn analyse_raise(
        &mut self,
        id: sable_frontend::NodeId,
        span: Span,
        value: &Expr,
    ) -> AnalysisResult<()> {
        let f = self.compilation.functions.get(self.function);
        let kind = f.kind;
        let owner = f.owner;
        let Some(error_type) = f.error_type.clone() else {
            return Err(CompilerError::new(
                span,
                "Only error-prone functions can raise errors.",
            ));
        };
        self.expect(value, &error_type)?;

        // An initializer that raises must release the instance variables
        // it has initialized so far before the instance memory is freed
        // without running the deinitializer.
        if kind == FunctionKind::ObjectInitializer {
            let owner = owner.expect("object initializers have an owner");
            let mut releases = Vec::new();
            for (index, ivar) in self
                .compilation
                .type_defs
                .get(owner)
                .instance_variables
                .iter()
                .enumerate()
            {
                let variable_id = VariableId::new(index as u32);
                let Some(ty) = ivar.resolved.clone() else {
                    continue;
                };
                let initialized = ivar.init.is_some()
                    || self.path.has_certainly(Incident::initialized(true, variable_id));
                if initialized && ty.is_managed(&self.compilation.type_defs) {
                    releases.push(Release {
                        in_instance_scope: true,
                        id: variable_id,
                        ty,
                    });
                }
            }
            self.data.error_releases.insert(id, releases);
        }
        self.path.record(Incident::Returned);
        Ok(())
    }

    fn analyse_super_init(
        &mut self,
        id: sable_frontend::NodeId,
        span: Span,
        name: &str,
        args: &[Expr],
    ) -> AnalysisResult<()> {
        let f = self.compilation.functions.get(self.function);
        if f.kind != FunctionKind::ObjectInitializer {
            return Err(CompilerError::new(
                span,
                "The superclass initializer can only be called from an initializer.",
            ));
        }
        let owner = f.owner.expect("object initializers have an owner");
        let Some(superclass) = self.compilation.type_defs.get(owner).superclass() else {
            return Err(CompilerError::new(
                span,
                "This class has no superclass to initialize.",
            ));
        };
        if self.path.has_potentially(Incident::CalledSuperInitializer) {
            self.compilation.diagnostics.emit(
                &SEMA_SUPER_INIT,
                span,
                "The superclass initializer might be called twice.",
            );
        }
        let Some(target) = self
            .compilation
            .type_defs
            .get(superclass)
            .initializers
            .lookup(name, sable_frontend::Mood::Imperative)
        else {
            return Err(CompilerError::new(
                span,
                format!(
                    "The superclass has no initializer named \"{}\".",
                    name
                ),
            ));
        };
        let ctx = TypeContext::new(self.compilation.self_type(superclass));
        self.check_arguments(target, args, &ctx, span)?;
        self.data.call_targets.insert(id, target);
        self.path.record(Incident::CalledSuperInitializer);
        Ok(())
    }

    /// Assigning through the instance scope requires a mutating context in
    /// value types.
    fn check_instance_mutation(&mut self, span: Span) {
        let f = self.compilation.functions.get(self.function);
        if f.kind == FunctionKind::ValueTypeMethod && !f.mutating {
            self.compilation.diagnostics.emit(
                &SEMA_NOT_MUTATING,
                span,
                "Cannot mutate the instance in a non-mutating method.",
            );
        }
    }

    /// Resolves a name in the local scopes, falling back to the capture
    /// environment inside closures. A capture miss declares a constant
    /// copy in the closure's function scope and records the capture.
    pub(crate) fn resolve_variable(
        &mut self,
        name: &str,
        span: Span,
    ) -> AnalysisResult<ResolvedAccess> {
        if let Some(resolved) = self.scoper.resolve(name) {
            return Ok(ResolvedAccess {
                in_instance_scope: resolved.in_instance_scope,
                id: resolved.variable.id,
                ty: resolved.variable.ty.clone(),
                constant: resolved.variable.constant,
            });
        }
        if let Some(env) = &self.capture_env {
            if let Some(source) = env.iter().find(|v| v.name == name) {
                let source_id = source.id;
                let ty = source.ty.clone();
                let copy = self.scoper.declare_captured(name, ty.clone(), span);
                let copy_id = copy.id;
                self.captures.push(Capture {
                    source_id,
                    captured_id: copy_id,
                    ty: ty.clone(),
                });
                self.path.record(Incident::initialized(false, copy_id));
                return Ok(ResolvedAccess {
                    in_instance_scope: false,
                    id: copy_id,
                    ty,
                    constant: true,
                });
            }
        }
        Err(crate::diagnostics::VariableNotFound {
            span,
            name: name.to_owned(),
        }
        .into())
    }

    fn finalize(&mut self) -> AnalysisResult<()> {
        let variable_count = self.scoper.max_variable_count();
        let f = self.compilation.functions.get_mut(self.function);
        f.variable_count = variable_count;
        let kind = f.kind;
        let return_type = f.return_type.clone();
        let owner = f.owner;
        let span = f.span;

        if !return_type.is_no_return()
            && !kind.is_initializer()
            && !self.path.has_certainly(Incident::Returned)
        {
            self.compilation.diagnostics.emit(
                &crate::diagnostics::SEMA_MISSING_RETURN,
                span,
                "The function is not guaranteed to return a value.",
            );
        }

        if kind == FunctionKind::ObjectInitializer {
            let owner = owner.expect("object initializers have an owner");
            if self.compilation.type_defs.get(owner).superclass().is_some()
                && !self.path.has_certainly(Incident::CalledSuperInitializer)
            {
                self.compilation.diagnostics.emit(
                    &SEMA_SUPER_INIT,
                    span,
                    "The superclass initializer is not called on all paths.",
                );
            }
        }

        if kind.is_initializer() {
            let owner = owner.expect("initializers have an owner");
            let mut missing = Vec::new();
            for (index, ivar) in self
                .compilation
                .type_defs
                .get(owner)
                .instance_variables
                .iter()
                .enumerate()
            {
                let pre_initialized = ivar.init.is_some()
                    || ivar.resolved.as_ref().is_some_and(|t| t.is_optional());
                if !pre_initialized
                    && !self
                        .path
                        .has_certainly(Incident::initialized(true, VariableId::new(index as u32)))
                {
                    missing.push((ivar.name.clone(), ivar.span));
                }
            }
            for (name, ivar_span) in missing {
                self.compilation.diagnostics.emit_with_note(
                    &SEMA_UNINITIALIZED,
                    span,
                    format!(
                        "Instance variable \"{}\" is not initialized on all paths.",
                        name
                    ),
                    ivar_span,
                    "declared here",
                );
            }
        }
        Ok(())
    }
}
