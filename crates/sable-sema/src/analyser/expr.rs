// crates/sable-sema/src/analyser/expr.rs
//! Expression analysis and storage complication.
//!
//! `analyse_expr` computes an expression's type; when an expectation is
//! given, `comply` checks compatibility and records the storage
//! conversions that bridge the value into the expected slot. The final
//! type of every expression lands in the side tables.

use sable_frontend::{ClosureLit, Expr, Mood, NodeId, Span};

use crate::analyser::function::FunctionAnalyser;
use crate::common_type::CommonTypeFinder;
use crate::diagnostics::{
    AnalysisResult, CompilerError, SEMA_CAST_ALWAYS_FAILS,
    SEMA_ESCAPING_SELF_CAPTURE, SEMA_NOT_MUTATING, SEMA_UNNECESSARY_CAST,
};
use crate::expression_data::{Conversion, VarAccess};
use crate::path::Incident;
use crate::type_def::{Function, FunctionId, FunctionKind, Parameter};
use crate::types::{StorageType, Type, TypeContext, TypeKind};

impl FunctionAnalyser<'_> {
    pub(crate) fn analyse_expr(
        &mut self,
        expr: &Expr,
        expectation: Option<&Type>,
    ) -> AnalysisResult<Type> {
        let ty = self.analyse_expr_inner(expr, expectation)?;
        let ty = match expectation {
            Some(expected) => self.comply(expr.id(), expr.span(), ty, expected)?,
            None => ty,
        };
        self.data.set_type(expr.id(), ty.clone());
        Ok(ty)
    }

    pub(crate) fn expect(&mut self, expr: &Expr, expected: &Type) -> AnalysisResult<Type> {
        self.analyse_expr(expr, Some(expected))
    }

    fn analyse_expr_inner(
        &mut self,
        expr: &Expr,
        expectation: Option<&Type>,
    ) -> AnalysisResult<Type> {
        match expr {
            Expr::IntLiteral { .. } => {
                // An integer literal becomes a real when one is expected.
                if let Some(expected) = expectation {
                    let inner = expected.optional_type().unwrap_or(expected);
                    if let TypeKind::ValueType(def, _) = inner.unboxed_kind() {
                        if *def == self.compilation.well_known.real {
                            return Ok(self.compilation.real_type());
                        }
                    }
                }
                Ok(self.compilation.int_type())
            }
            Expr::StringLiteral { .. } => Ok(self.compilation.string_type()),
            Expr::BoolLiteral { .. } => Ok(self.compilation.bool_type()),
            Expr::NoValue { span, .. } => {
                let Some(expected) = expectation else {
                    return Err(CompilerError::new(
                        *span,
                        "The type of \"no value\" cannot be inferred here.",
                    ));
                };
                if !expected.is_optional() {
                    return Err(CompilerError::new(
                        *span,
                        "\"no value\" can only be used where an optional is expected.",
                    ));
                }
                Ok(expected.clone())
            }
            Expr::ListLiteral {
                id,
                span,
                elements,
            } => self.analyse_list(*id, *span, elements, expectation),
            Expr::GetVariable { id, span, name } => {
                let access = self.resolve_variable(name, *span)?;
                if !self
                    .path
                    .has_certainly(Incident::initialized(access.in_instance_scope, access.id))
                {
                    return Err(CompilerError::new(
                        *span,
                        format!("Variable \"{}\" might not have been initialized.", name),
                    ));
                }
                if access.in_instance_scope {
                    self.path.record(Incident::UsedSelf);
                }
                self.data.var_accesses.insert(
                    *id,
                    VarAccess {
                        in_instance_scope: access.in_instance_scope,
                        id: access.id,
                        ty: access.ty.clone(),
                    },
                );
                Ok(access.ty)
            }
            Expr::This { span, .. } => self.analyse_this(*span),
            Expr::Call {
                id,
                span,
                receiver,
                name,
                mood,
                args,
            } => match receiver {
                Some(receiver) => {
                    self.analyse_method_call(*id, *span, receiver, name, *mood, args)
                }
                None => self.analyse_free_call(*id, *span, name, *mood, args),
            },
            Expr::TypeCall {
                id,
                span,
                type_name,
                name,
                mood,
                args,
            } => self.analyse_type_call(*id, *span, type_name, name, *mood, args),
            Expr::Init {
                id,
                span,
                type_name,
                name,
                args,
            } => self.analyse_init(*id, *span, type_name, name, args, expectation),
            Expr::Cast {
                id,
                span,
                expr,
                target,
            } => self.analyse_cast(*id, *span, expr, target),
            Expr::Closure { id, span, closure } => self.analyse_closure(*id, *span, closure),
        }
    }

    fn analyse_this(&mut self, span: Span) -> AnalysisResult<Type> {
        let f = self.compilation.functions.get(self.function);
        let kind = f.kind;
        let Some(owner) = f.owner else {
            return Err(CompilerError::new(span, "\"this\" is not available here."));
        };
        if !kind.has_this() {
            return Err(CompilerError::new(span, "\"this\" is not available here."));
        }
        if kind == FunctionKind::ObjectInitializer
            && self.compilation.type_defs.get(owner).superclass().is_some()
            && !self.path.has_certainly(Incident::CalledSuperInitializer)
        {
            return Err(CompilerError::new(
                span,
                "\"this\" cannot be used before the superclass initializer has been called.",
            ));
        }
        self.path.record(Incident::UsedSelf);
        Ok(self.compilation.self_type(owner))
    }

    fn analyse_list(
        &mut self,
        id: NodeId,
        span: Span,
        elements: &[Expr],
        expectation: Option<&Type>,
    ) -> AnalysisResult<Type> {
        // With a list expectation the element type is dictated, not
        // inferred.
        if let Some(expected) = expectation {
            if let TypeKind::ValueType(def, args) = expected.unboxed_kind() {
                if *def == self.compilation.well_known.list {
                    let element = args[0].clone();
                    for element_expr in elements {
                        self.expect(element_expr, &element)?;
                    }
                    self.data.element_types.insert(id, element);
                    return Ok(expected.unboxed());
                }
            }
        }

        let mut finder = CommonTypeFinder::new();
        let mut element_types = Vec::with_capacity(elements.len());
        for element_expr in elements {
            let ty = self.analyse_expr(element_expr, None)?;
            finder.add_type(&ty, &self.type_context, &self.compilation.type_defs);
            element_types.push(ty);
        }
        let element = finder
            .get_common_type(
                span,
                &mut self.compilation.diagnostics,
                &self.compilation.type_defs,
            )
            .apply_minimal_boxing();
        for (element_expr, ty) in elements.iter().zip(element_types) {
            let complied = self.comply(element_expr.id(), element_expr.span(), ty, &element)?;
            self.data.set_type(element_expr.id(), complied);
        }
        self.data.element_types.insert(id, element.clone());
        Ok(self.compilation.list_of(element))
    }

    fn analyse_method_call(
        &mut self,
        id: NodeId,
        span: Span,
        receiver: &Expr,
        name: &str,
        mood: Mood,
        args: &[Expr],
    ) -> AnalysisResult<Type> {
        let receiver_ty = self.analyse_expr(receiver, None)?;
        if receiver_ty.is_optional() {
            return Err(CompilerError::new(
                span,
                "The optional value must be unwrapped before calling a method on it.",
            ));
        }

        // Callable values understand exactly one message.
        if let TypeKind::Callable { params, ret } = receiver_ty.unboxed_kind() {
            let params = params.clone();
            let ret = (**ret).clone();
            if name != "call" || mood != Mood::Imperative {
                return Err(CompilerError::new(
                    span,
                    format!("A callable has no method \"{}\".", name),
                ));
            }
            if args.len() != params.len() {
                return Err(CompilerError::new(
                    span,
                    format!("{} arguments expected, {} given.", params.len(), args.len()),
                ));
            }
            for (arg, param) in args.iter().zip(params) {
                self.expect(arg, &param)?;
            }
            return Ok(ret);
        }

        let target = self.lookup_callee(&receiver_ty, name, mood, span)?;
        if self.compilation.functions.get(target).mutating {
            self.check_mutating_receiver(receiver, span);
        }
        let ctx = TypeContext::new(receiver_ty);
        let return_type = self.check_arguments(target, args, &ctx, span)?;
        self.data.call_targets.insert(id, target);
        Ok(return_type)
    }

    fn analyse_free_call(
        &mut self,
        id: NodeId,
        span: Span,
        name: &str,
        mood: Mood,
        args: &[Expr],
    ) -> AnalysisResult<Type> {
        let Some(target) = self.compilation.free_functions.lookup(name, mood) else {
            return Err(CompilerError::new(
                span,
                format!("No function named \"{}\" could be found.", name),
            ));
        };
        let ctx = TypeContext::empty();
        let return_type = self.check_arguments(target, args, &ctx, span)?;
        self.data.call_targets.insert(id, target);
        Ok(return_type)
    }

    fn analyse_type_call(
        &mut self,
        id: NodeId,
        span: Span,
        type_name: &str,
        name: &str,
        mood: Mood,
        args: &[Expr],
    ) -> AnalysisResult<Type> {
        let Some(&def) = self.compilation.types_by_name.get(type_name) else {
            return Err(CompilerError::new(
                span,
                format!("Type \"{}\" could not be found.", type_name),
            ));
        };
        let Some(target) = self.compilation.type_defs.get(def).type_methods.lookup(name, mood)
        else {
            return Err(CompilerError::new(
                span,
                format!("\"{}\" has no type method \"{}\".", type_name, name),
            ));
        };
        let ctx = TypeContext::new(self.compilation.self_type(def));
        let return_type = self.check_arguments(target, args, &ctx, span)?;
        self.data.call_targets.insert(id, target);
        Ok(return_type)
    }

    fn analyse_init(
        &mut self,
        id: NodeId,
        span: Span,
        type_name: &str,
        name: &str,
        args: &[Expr],
        expectation: Option<&Type>,
    ) -> AnalysisResult<Type> {
        let Some(&def) = self.compilation.types_by_name.get(type_name) else {
            return Err(CompilerError::new(
                span,
                format!("Type \"{}\" could not be found.", type_name),
            ));
        };
        let definition = self.compilation.type_defs.get(def);
        if !definition.is_class() && !definition.is_value_type() {
            return Err(CompilerError::new(
                span,
                format!("\"{}\" cannot be instantiated.", type_name),
            ));
        }

        let generic_args = if definition.generic_params.is_empty() {
            vec![]
        } else {
            let from_expectation = expectation.and_then(|e| match e.unboxed_kind() {
                TypeKind::Class(d, args) | TypeKind::ValueType(d, args) if *d == def => {
                    Some(args.clone())
                }
                _ => None,
            });
            let Some(args) = from_expectation else {
                return Err(CompilerError::new(
                    span,
                    format!(
                        "The generic arguments of \"{}\" cannot be inferred here.",
                        type_name
                    ),
                ));
            };
            args
        };

        let instance = if definition.is_class() {
            Type::class(def, generic_args)
        } else {
            Type::value_type(def, generic_args)
        };
        let Some(target) = definition.initializers.lookup(name, Mood::Imperative) else {
            return Err(CompilerError::new(
                span,
                format!("\"{}\" has no initializer named \"{}\".", type_name, name),
            ));
        };
        let ctx = TypeContext::new(instance.clone());
        self.check_arguments(target, args, &ctx, span)?;
        self.data.call_targets.insert(id, target);
        Ok(instance)
    }

    fn analyse_cast(
        &mut self,
        id: NodeId,
        span: Span,
        expr: &Expr,
        target: &sable_frontend::TypeExpr,
    ) -> AnalysisResult<Type> {
        let expr_ty = self.analyse_expr(expr, None)?;
        let owner = self.compilation.functions.get(self.function).owner;
        let target_ty = self
            .compilation
            .resolve_type_expr(target, owner)?
            .apply_minimal_boxing();
        self.data.cast_targets.insert(id, target_ty.clone());

        if expr_ty.is_optional() {
            return Err(CompilerError::new(
                span,
                "An optional cannot be cast; unwrap it first.",
            ));
        }
        if let Some(def) = target_ty.type_def() {
            if self.compilation.type_defs.get(def).generic_dynamism_disabled {
                return Err(CompilerError::new(
                    span,
                    format!(
                        "Cannot cast to {}: the type does not track its generic arguments at runtime.",
                        target_ty.display(&self.compilation.type_defs)
                    ),
                ));
            }
        } else {
            return Err(CompilerError::new(
                span,
                format!(
                    "Cannot cast to {}: the target of a cast must be a class, value type, enum or protocol.",
                    target_ty.display(&self.compilation.type_defs)
                ),
            ));
        }

        let defs = &self.compilation.type_defs;
        if expr_ty.compatible_to(&target_ty, &self.type_context, defs) {
            self.compilation.diagnostics.emit(
                &SEMA_UNNECESSARY_CAST,
                span,
                format!(
                    "The expression is already of type {}; the cast always succeeds.",
                    expr_ty.display(&self.compilation.type_defs)
                ),
            );
            return Ok(target_ty);
        }
        let downcast_possible = target_ty.compatible_to(&expr_ty, &self.type_context, defs)
            || matches!(
                expr_ty.unboxed_kind(),
                TypeKind::Something
                    | TypeKind::Someobject
                    | TypeKind::Protocol(_)
                    | TypeKind::MultiProtocol(_)
            );
        if !downcast_possible {
            self.compilation.diagnostics.emit(
                &SEMA_CAST_ALWAYS_FAILS,
                span,
                format!(
                    "A value of type {} can never be of type {}; the cast always fails.",
                    expr_ty.display(&self.compilation.type_defs),
                    target_ty.display(&self.compilation.type_defs)
                ),
            );
        }
        Ok(target_ty.optionalized())
    }

    fn analyse_closure(
        &mut self,
        id: NodeId,
        span: Span,
        closure: &ClosureLit,
    ) -> AnalysisResult<Type> {
        let owner = self.compilation.functions.get(self.function).owner;
        let mut function =
            Function::new("<closure>", Mood::Imperative, FunctionKind::Closure, owner, span);
        let mut param_types = Vec::with_capacity(closure.params.len());
        for param in &closure.params {
            let ty = self
                .compilation
                .resolve_type_expr(&param.ty, owner)?
                .apply_minimal_boxing();
            param_types.push(ty.clone());
            function.params.push(Parameter::synthesized(&param.name, ty));
        }
        let return_type = match &closure.return_type {
            Some(ty) => self.compilation.resolve_type_expr(ty, owner)?.apply_minimal_boxing(),
            None => Type::no_return(),
        };
        function.return_type = return_type.clone();
        function.declared = true;
        let function_id = self.compilation.functions.alloc(function);
        // Keep a copy of the body around for memory-flow analysis.
        self.compilation.bodies.insert(function_id, closure.body.clone());
        self.data.closure_functions.insert(id, function_id);

        let env = self.scoper.visible_locals();
        let (captures, used_self) = {
            let mut inner = FunctionAnalyser::for_closure(
                &mut *self.compilation,
                &mut *self.data,
                function_id,
                env,
            );
            inner.analyse(&closure.body)?;
            let used_self = inner.path.has_potentially(Incident::UsedSelf);
            (std::mem::take(&mut inner.captures), used_self)
        };

        if used_self {
            self.data.self_captures.insert(id);
            self.path.record(Incident::UsedSelf);
            if closure.escaping {
                if let Some(owner) = owner {
                    let def = self.compilation.type_defs.get(owner);
                    if def.is_value_type() || def.is_enum() {
                        self.compilation.diagnostics.emit(
                            &SEMA_ESCAPING_SELF_CAPTURE,
                            span,
                            "An escaping closure cannot capture the receiver of a value type.",
                        );
                    }
                }
            }
        }
        self.data.captures.insert(id, captures);
        Ok(Type::callable(param_types, return_type))
    }

    /// Finds the method `name`/`mood` on the receiver type.
    fn lookup_callee(
        &self,
        receiver: &Type,
        name: &str,
        mood: Mood,
        span: Span,
    ) -> AnalysisResult<FunctionId> {
        let defs = &self.compilation.type_defs;
        let found = match receiver.unboxed_kind() {
            TypeKind::Class(def, _) | TypeKind::ValueType(def, _) | TypeKind::Enum(def) => {
                defs.lookup_method(*def, name, mood)
            }
            TypeKind::Protocol(def) => defs.get(*def).methods.lookup(name, mood),
            TypeKind::MultiProtocol(protocols) => protocols.iter().find_map(|p| {
                p.type_def()
                    .and_then(|def| defs.get(def).methods.lookup(name, mood))
            }),
            _ => None,
        };
        found.ok_or_else(|| {
            CompilerError::new(
                span,
                format!(
                    "Type {} has no method \"{}\".",
                    receiver.display(&self.compilation.type_defs),
                    name
                ),
            )
        })
    }

    /// Calling a mutating method requires a mutable receiver.
    fn check_mutating_receiver(&mut self, receiver: &Expr, span: Span) {
        if let Expr::GetVariable { name, span: var_span, .. } = receiver {
            if let Ok(access) = self.resolve_variable(name, *var_span) {
                if access.constant {
                    self.compilation.diagnostics.emit(
                        &SEMA_NOT_MUTATING,
                        span,
                        format!("Cannot call a mutating method on constant \"{}\".", name),
                    );
                }
            }
        }
    }

    /// Checks an argument list against the callee's signature and handles
    /// error-prone propagation. Returns the resolved return type.
    pub(crate) fn check_arguments(
        &mut self,
        target: FunctionId,
        args: &[Expr],
        ctx: &TypeContext,
        span: Span,
    ) -> AnalysisResult<Type> {
        let callee = self.compilation.functions.get(target);
        let callee_name = callee.name.clone();
        let params: Vec<Type> = callee.params.iter().map(|p| p.ty.clone()).collect();
        let return_type = callee.return_type.clone();
        let callee_error = callee.error_type.clone();

        if args.len() != params.len() {
            return Err(CompilerError::new(
                span,
                format!(
                    "\"{}\" expects {} arguments, {} given.",
                    callee_name,
                    params.len(),
                    args.len()
                ),
            ));
        }
        for (arg, param) in args.iter().zip(params) {
            let expected = param.resolve_on(ctx);
            self.expect(arg, &expected)?;
        }

        if let Some(raised) = callee_error {
            let raised = raised.resolve_on(ctx);
            let ours = self.compilation.functions.get(self.function).error_type.clone();
            let handled = ours.as_ref().is_some_and(|ours| {
                raised.compatible_to(ours, &self.type_context, &self.compilation.type_defs)
            });
            if !handled {
                return Err(CompilerError::new(
                    span,
                    format!(
                        "\"{}\" can raise an error; this function must be error-prone \
                         with a compatible error type.",
                        callee_name
                    ),
                ));
            }
        }
        Ok(return_type.resolve_on(ctx))
    }

    /// Verifies compatibility and records the storage conversions that
    /// bring a value of type `actual` into a slot of type `expected`.
    pub(crate) fn comply(
        &mut self,
        node: NodeId,
        span: Span,
        actual: Type,
        expected: &Type,
    ) -> AnalysisResult<Type> {
        let defs = &self.compilation.type_defs;
        if !actual.compatible_to(expected, &self.type_context, defs) {
            return Err(CompilerError::new(
                span,
                format!(
                    "Type {} is not compatible to {}.",
                    actual.display(defs),
                    expected.display(defs)
                ),
            ));
        }

        use StorageType::*;
        let box_target = || {
            expected
                .boxed_for_type()
                .cloned()
                .unwrap_or_else(|| expected.clone())
        };
        let result = match (actual.storage_type(), expected.storage_type()) {
            (Simple, Simple)
            | (SimpleOptional, SimpleOptional)
            | (PointerOptional, PointerOptional)
            | (SimpleOptional, PointerOptional)
            | (PointerOptional, SimpleOptional) => {
                if actual.identical_to(expected, &self.type_context) {
                    actual
                } else {
                    self.data.add_conversion(node, Conversion::Upcast);
                    expected.clone()
                }
            }
            (Simple, SimpleOptional) | (Simple, PointerOptional) => {
                self.data
                    .add_conversion(node, Conversion::SimpleToSimpleOptional);
                expected.clone()
            }
            (Simple, Box) => {
                self.data.add_conversion(node, Conversion::SimpleToBox);
                actual.boxed_for(box_target())
            }
            (SimpleOptional, Box) | (PointerOptional, Box) => {
                self.data
                    .add_conversion(node, Conversion::SimpleOptionalToBox);
                actual.boxed_for(box_target())
            }
            (Box, Simple) => {
                self.data.add_conversion(node, Conversion::BoxToSimple);
                expected.clone()
            }
            (Box, SimpleOptional) | (Box, PointerOptional) => {
                self.data
                    .add_conversion(node, Conversion::BoxToSimpleOptional);
                expected.clone()
            }
            (Box, Box) => {
                let target = box_target();
                let same_target = actual
                    .boxed_for_type()
                    .is_some_and(|t| t.identical_to(&target, &self.type_context));
                if !same_target {
                    self.data.add_conversion(node, Conversion::Rebox);
                }
                actual.unboxed().boxed_for(target)
            }
            // An optional can never comply to a non-optional; the
            // compatibility check above already rejected it.
            (SimpleOptional, Simple) | (PointerOptional, Simple) => {
                unreachable!("optional cannot be compatible to non-optional")
            }
        };
        Ok(result)
    }
}
