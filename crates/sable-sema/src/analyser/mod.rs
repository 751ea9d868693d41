// crates/sable-sema/src/analyser/mod.rs
//! The package analyser.
//!
//! Analysis proceeds in phases: declaration analysis resolves every
//! signature, instance variable and conformance; overrides are linked and
//! conformance dispatch tables are filled (synthesizing boxing thunks
//! where calling conventions differ); then every function body is taken
//! off a FIFO queue and analysed; finally memory-flow analysis runs over
//! the whole package.

mod expr;
mod function;
mod thunk;

use std::collections::VecDeque;

use sable_frontend::Span;
use tracing::info;

use crate::compilation::{AnalysisOptions, Compilation};
use crate::diagnostics::{
    SEMA_DUPLICATE_CONFORMANCE, SEMA_DUPLICATE_DECLARATION, SEMA_ENTRY_POINT_RETURN,
    SEMA_FINAL_OVERRIDE,
    SEMA_MISSING_PROTOCOL_METHOD, SEMA_NO_ENTRY_POINT, SEMA_PROMISE_VIOLATION,
    WARN_NO_INITIALIZERS,
};
use crate::expression_data::{ExpressionData, MemoryFlowData};
use crate::memory_flow::MemoryFlowAnalyser;
use crate::type_def::{FunctionId, TypeDefId};
use crate::types::{Type, TypeContext, TypeKind};

use function::FunctionAnalyser;
use thunk::build_boxing_thunk;

/// Everything analysis produces besides the mutated compilation itself.
#[derive(Debug)]
pub struct AnalysedPackage {
    pub expressions: ExpressionData,
    pub memory: MemoryFlowData,
}

/// Runs all analysis phases over the compilation. Diagnostics accumulate
/// in `compilation.diagnostics`; the package fails if any of them is an
/// error.
pub fn analyse_package(
    compilation: &mut Compilation,
    options: &AnalysisOptions,
) -> AnalysedPackage {
    info!(
        types = compilation.type_defs.len(),
        functions = compilation.functions.len(),
        "analysing package"
    );
    let mut data = ExpressionData::new();

    declare_types(compilation);
    declare_functions(compilation);
    link_overrides(compilation);
    check_conformances(compilation);
    check_entry_point(compilation, options);

    let mut ids: Vec<FunctionId> = compilation.bodies.keys().copied().collect();
    ids.sort_unstable();
    let mut queue: VecDeque<FunctionId> = VecDeque::new();
    for id in ids {
        compilation.functions.get_mut(id).queued = true;
        queue.push_back(id);
    }
    while let Some(id) = queue.pop_front() {
        let Some(body) = compilation.bodies.remove(&id) else {
            continue;
        };
        let mut analyser = FunctionAnalyser::new(compilation, &mut data, id);
        if let Err(err) = analyser.analyse(&body) {
            compilation.diagnostics.record_error(err);
        }
        compilation.bodies.insert(id, body);
    }

    let mut memory = MemoryFlowData::new();
    MemoryFlowAnalyser::new(compilation, &data, &mut memory).analyse_package();

    AnalysedPackage {
        expressions: data,
        memory,
    }
}

/// Resolves instance variable types and conformance declarations.
fn declare_types(compilation: &mut Compilation) {
    let well_known = compilation.well_known;
    let ids: Vec<TypeDefId> = compilation.type_defs.ids().collect();
    for id in ids {
        let ivar_count = compilation.type_defs.get(id).instance_variables.len();
        for index in 0..ivar_count {
            let (name, span) = {
                let ivar = &compilation.type_defs.get(id).instance_variables[index];
                (ivar.name.clone(), ivar.span)
            };
            let previous = compilation.type_defs.get(id).instance_variables[..index]
                .iter()
                .find(|other| other.name == name)
                .map(|other| other.span);
            if let Some(previous) = previous {
                compilation.diagnostics.emit_with_note(
                    &SEMA_DUPLICATE_DECLARATION,
                    span,
                    format!("Instance variable \"{}\" is declared twice.", name),
                    previous,
                    "first declared here",
                );
            }
        }
        for index in 0..ivar_count {
            let ty_expr = compilation.type_defs.get(id).instance_variables[index]
                .ty_expr
                .clone();
            match compilation.resolve_type_expr(&ty_expr, Some(id)) {
                Ok(ty) => {
                    compilation.type_defs.get_mut(id).instance_variables[index].resolved =
                        Some(ty.apply_minimal_boxing());
                }
                Err(err) => compilation.diagnostics.record_error(err),
            }
        }

        let conformance_count = compilation.type_defs.get(id).conformances.len();
        let mut seen: Vec<(TypeDefId, Span)> = Vec::new();
        for index in 0..conformance_count {
            let (ty_expr, span) = {
                let conformance = &compilation.type_defs.get(id).conformances[index];
                (conformance.ty_expr.clone(), conformance.span)
            };
            let resolved = match compilation.resolve_type_expr(&ty_expr, Some(id)) {
                Ok(ty) => ty,
                Err(err) => {
                    compilation.diagnostics.record_error(err);
                    continue;
                }
            };
            let Some(proto_def) = resolved.type_def() else {
                compilation.diagnostics.record_error(crate::diagnostics::CompilerError::new(
                    span,
                    "Conformance declarations must name a protocol.",
                ));
                continue;
            };
            if !matches!(resolved.kind(), TypeKind::Protocol(_)) {
                compilation.diagnostics.record_error(crate::diagnostics::CompilerError::new(
                    span,
                    "Conformance declarations must name a protocol.",
                ));
                continue;
            }
            if let Some((_, previous)) = seen.iter().find(|(d, _)| *d == proto_def) {
                compilation.diagnostics.emit_with_note(
                    &SEMA_DUPLICATE_CONFORMANCE,
                    span,
                    format!(
                        "Conformance to \"{}\" is declared twice.",
                        compilation.type_defs.get(proto_def).name
                    ),
                    *previous,
                    "first declared here",
                );
                continue;
            }
            seen.push((proto_def, span));
            compilation.type_defs.get_mut(id).conformances[index].resolved = Some(resolved);
        }

        let def = compilation.type_defs.get(id);
        let is_well_known = id == well_known.string || id == well_known.list;
        if def.is_class() && def.initializers.is_empty() && !is_well_known {
            compilation.diagnostics.emit(
                &WARN_NO_INITIALIZERS,
                def.span,
                format!("Class \"{}\" has no initializers.", def.name),
            );
        }
    }
}

/// Resolves every function signature.
fn declare_functions(compilation: &mut Compilation) {
    for index in 0..compilation.functions.len() {
        let id = FunctionId::new(index as u32);
        let owner = compilation.functions.get(id).owner;

        let param_count = compilation.functions.get(id).params.len();
        for p in 0..param_count {
            let Some(ty_expr) = compilation.functions.get(id).params[p].ty_expr.clone() else {
                continue;
            };
            match compilation.resolve_type_expr(&ty_expr, owner) {
                Ok(ty) => {
                    compilation.functions.get_mut(id).params[p].ty = ty.apply_minimal_boxing();
                }
                Err(err) => compilation.diagnostics.record_error(err),
            }
        }
        if let Some(ty_expr) = compilation.functions.get(id).return_type_expr.clone() {
            match compilation.resolve_type_expr(&ty_expr, owner) {
                Ok(ty) => {
                    compilation.functions.get_mut(id).return_type = ty.apply_minimal_boxing();
                }
                Err(err) => compilation.diagnostics.record_error(err),
            }
        }
        if let Some(ty_expr) = compilation.functions.get(id).error_type_expr.clone() {
            match compilation.resolve_type_expr(&ty_expr, owner) {
                Ok(ty) => {
                    compilation.functions.get_mut(id).error_type = Some(ty.apply_minimal_boxing());
                }
                Err(err) => compilation.diagnostics.record_error(err),
            }
        }
        compilation.functions.get_mut(id).declared = true;
    }
}

/// Links each class method to the superclass method it overrides and
/// checks the override's promise.
fn link_overrides(compilation: &mut Compilation) {
    let ids: Vec<TypeDefId> = compilation.type_defs.ids().collect();
    for id in ids {
        let Some(superclass) = compilation.type_defs.get(id).superclass() else {
            continue;
        };
        let methods: Vec<FunctionId> = compilation.type_defs.get(id).methods.iter().collect();
        let ctx = TypeContext::new(compilation.self_type(id));
        for method in methods {
            let (name, mood, span) = {
                let f = compilation.functions.get(method);
                (f.name.clone(), f.mood, f.span)
            };
            let Some(super_method) = compilation.type_defs.lookup_method(superclass, &name, mood)
            else {
                continue;
            };
            compilation.functions.get_mut(method).super_function = Some(super_method);
            let super_span = compilation.functions.get(super_method).span;
            if compilation.functions.get(super_method).final_ {
                compilation.diagnostics.emit_with_note(
                    &SEMA_FINAL_OVERRIDE,
                    span,
                    format!("\"{}\" overrides a final method.", name),
                    super_span,
                    "declared final here",
                );
            }
            if let PromiseOutcome::Violation(message) =
                check_promise(compilation, method, super_method, &ctx)
            {
                compilation.diagnostics.emit_with_note(
                    &SEMA_PROMISE_VIOLATION,
                    span,
                    message,
                    super_span,
                    "overridden declaration is here",
                );
            }
        }
    }
}

/// Fills the dispatch table of every conformance, synthesizing boxing
/// thunks where the implementation's calling convention differs from the
/// protocol's.
fn check_conformances(compilation: &mut Compilation) {
    let ids: Vec<TypeDefId> = compilation.type_defs.ids().collect();
    for id in ids {
        if compilation.type_defs.get(id).is_protocol() {
            continue;
        }
        let conformance_count = compilation.type_defs.get(id).conformances.len();
        for index in 0..conformance_count {
            let (proto_ty, conf_span) = {
                let conformance = &compilation.type_defs.get(id).conformances[index];
                (conformance.resolved.clone(), conformance.span)
            };
            let Some(proto_ty) = proto_ty else { continue };
            let Some(proto_def) = proto_ty.type_def() else { continue };
            let proto_methods: Vec<FunctionId> =
                compilation.type_defs.get(proto_def).methods.iter().collect();
            let ctx = TypeContext::new(compilation.self_type(id));
            let mut implementations = Vec::with_capacity(proto_methods.len());
            for proto_method in proto_methods {
                let (name, mood, proto_span) = {
                    let f = compilation.functions.get(proto_method);
                    (f.name.clone(), f.mood, f.span)
                };
                let Some(implementation) = compilation.type_defs.lookup_method(id, &name, mood)
                else {
                    compilation.diagnostics.emit_with_note(
                        &SEMA_MISSING_PROTOCOL_METHOD,
                        conf_span,
                        format!(
                            "\"{}\" does not implement the protocol method \"{}\".",
                            compilation.type_defs.get(id).name,
                            name
                        ),
                        proto_span,
                        "required by the protocol",
                    );
                    continue;
                };
                match check_promise(compilation, implementation, proto_method, &ctx) {
                    PromiseOutcome::Violation(message) => {
                        compilation.diagnostics.emit_with_note(
                            &SEMA_PROMISE_VIOLATION,
                            compilation.functions.get(implementation).span,
                            message,
                            proto_span,
                            "promised by the protocol",
                        );
                    }
                    PromiseOutcome::Identical => implementations.push(implementation),
                    PromiseOutcome::NeedsThunk => {
                        let params: Vec<Type> = compilation
                            .functions
                            .get(proto_method)
                            .params
                            .iter()
                            .map(|p| p.ty.resolve_on(&ctx))
                            .collect();
                        let return_type = compilation
                            .functions
                            .get(proto_method)
                            .return_type
                            .resolve_on(&ctx);
                        let thunk = build_boxing_thunk(
                            compilation,
                            id,
                            &name,
                            mood,
                            params,
                            return_type,
                            conf_span,
                        );
                        implementations.push(thunk);
                    }
                }
            }
            compilation.type_defs.get_mut(id).conformances[index].implementations =
                implementations;
        }
    }
}

enum PromiseOutcome {
    /// The signatures agree exactly; the implementation can be dispatched
    /// to directly.
    Identical,
    /// Compatible, but parameter or return storage differs.
    NeedsThunk,
    Violation(String),
}

/// Checks that `implementation` keeps every promise `promised` makes to
/// callers: it accepts at least the promised parameters (contravariant)
/// and returns at most the promised return type (covariant).
fn check_promise(
    compilation: &Compilation,
    implementation: FunctionId,
    promised: FunctionId,
    ctx: &TypeContext,
) -> PromiseOutcome {
    let defs = &compilation.type_defs;
    let imp = compilation.functions.get(implementation);
    let promise = compilation.functions.get(promised);

    if imp.params.len() != promise.params.len() {
        return PromiseOutcome::Violation(format!(
            "\"{}\" takes {} parameters but {} are promised.",
            imp.name,
            imp.params.len(),
            promise.params.len()
        ));
    }
    let mut identical = true;
    for (index, (ip, pp)) in imp.params.iter().zip(&promise.params).enumerate() {
        let promised_ty = pp.ty.resolve_on(ctx);
        if !promised_ty.compatible_to(&ip.ty, ctx, defs) {
            return PromiseOutcome::Violation(format!(
                "Parameter {} of type {} does not accept the promised type {}.",
                index + 1,
                ip.ty.display(defs),
                promised_ty.display(defs)
            ));
        }
        if !promised_ty.identical_to(&ip.ty, ctx)
            || promised_ty.storage_type() != ip.ty.storage_type()
        {
            identical = false;
        }
    }
    let promised_ret = promise.return_type.resolve_on(ctx);
    if !imp.return_type.compatible_to(&promised_ret, ctx, defs) {
        return PromiseOutcome::Violation(format!(
            "Return type {} is not compatible to the promised type {}.",
            imp.return_type.display(defs),
            promised_ret.display(defs)
        ));
    }
    if !imp.return_type.identical_to(&promised_ret, ctx)
        || imp.return_type.storage_type() != promised_ret.storage_type()
    {
        identical = false;
    }
    if imp.error_type.is_some() && promise.error_type.is_none() {
        return PromiseOutcome::Violation(format!(
            "\"{}\" may raise an error, which the promise does not allow.",
            imp.name
        ));
    }
    if identical {
        PromiseOutcome::Identical
    } else {
        PromiseOutcome::NeedsThunk
    }
}

fn check_entry_point(compilation: &mut Compilation, options: &AnalysisOptions) {
    if !options.executable {
        return;
    }
    match compilation.entry_point {
        None => compilation.diagnostics.emit(
            &SEMA_NO_ENTRY_POINT,
            Span::none(),
            "An executable package requires a \"main\" function.",
        ),
        Some(id) => {
            let f = compilation.functions.get(id);
            let span = f.span;
            let return_type = f.return_type.clone();
            let int = compilation.int_type();
            let ok = return_type.is_no_return()
                || return_type.identical_to(&int, &TypeContext::empty());
            if !ok {
                compilation.diagnostics.emit(
                    &SEMA_ENTRY_POINT_RETURN,
                    span,
                    "The entry point must return an Int or nothing.",
                );
            }
        }
    }
}
