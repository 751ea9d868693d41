// crates/sable-sema/src/scope.rs
//! Lexical scoping for function analysis.
//!
//! Each function gets a [`Scoper`] that hands out dense frame-slot ids.
//! Instance variables live in a separate scope with its own id space; a
//! resolved variable therefore carries the `in_instance_scope` flag along
//! with its id. Shadowing an outer variable is an error, reported with a
//! note at the shadowed declaration.

use rustc_hash::FxHashMap;
use sable_frontend::Span;

use crate::diagnostics::{Diagnostics, SEMA_SHADOWING};
use crate::type_def::VariableId;
use crate::types::Type;

/// A declared variable.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub id: VariableId,
    pub constant: bool,
    pub declaration_span: Span,
}

/// A name lookup result. Instance variables and locals have separate id
/// spaces, so the flag is part of the variable's identity.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedVariable<'a> {
    pub in_instance_scope: bool,
    pub variable: &'a Variable,
}

/// One lexical scope.
#[derive(Debug, Default)]
pub struct Scope {
    variables: FxHashMap<String, Variable>,
    /// First frame-slot id allocated inside this scope.
    from: u32,
}

impl Scope {
    fn new(from: u32) -> Self {
        Self {
            variables: FxHashMap::default(),
            from,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn insert(&mut self, variable: Variable) {
        self.variables.insert(variable.name.clone(), variable);
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables.values()
    }
}

/// Frame-slot accounting for one popped scope, consumed by code
/// generation to destroy the scope's slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeStats {
    pub from: u32,
    pub count: u32,
}

/// Manages the scope stack of one function under analysis.
#[derive(Debug)]
pub struct Scoper {
    instance_scope: Option<Scope>,
    scopes: Vec<Scope>,
    next_id: u32,
    max_variable_count: u32,
}

impl Scoper {
    /// Creates a scoper with the outermost (parameter) scope already
    /// pushed.
    pub fn new(instance_scope: Option<Scope>) -> Self {
        Self {
            instance_scope,
            scopes: vec![Scope::new(0)],
            next_id: 0,
            max_variable_count: 0,
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope::new(self.next_id));
    }

    /// Pops the innermost scope. Slot ids are never recycled, so every
    /// variable of the function keeps a unique id; later phases key their
    /// facts by it.
    pub fn pop_scope(&mut self) -> ScopeStats {
        let scope = self.scopes.pop().unwrap_or_default();
        self.max_variable_count = self.max_variable_count.max(self.next_id);
        ScopeStats {
            from: scope.from,
            count: self.next_id - scope.from,
        }
    }

    /// Declares a variable in the innermost scope. Shadowing a visible
    /// variable is reported but the declaration proceeds, shadowing the
    /// outer one.
    pub fn declare(
        &mut self,
        name: &str,
        ty: Type,
        constant: bool,
        span: Span,
        diagnostics: &mut Diagnostics,
    ) -> &Variable {
        if let Some(previous) = self.resolve(name) {
            diagnostics.emit_with_note(
                &SEMA_SHADOWING,
                span,
                format!("Declaration of \"{}\" shadows an existing variable.", name),
                previous.variable.declaration_span,
                "shadowed declaration is here",
            );
        }
        let id = VariableId::new(self.next_id);
        self.next_id += 1;
        self.max_variable_count = self.max_variable_count.max(self.next_id);
        let scope = self.scopes.last_mut().unwrap();
        scope.insert(Variable {
            name: name.to_owned(),
            ty,
            id,
            constant,
            declaration_span: span,
        });
        scope.get(name).unwrap()
    }

    /// Declares without a shadowing check. Used for synthesized variables
    /// such as closure capture copies.
    pub fn declare_unchecked(&mut self, name: &str, ty: Type, constant: bool, span: Span) -> &Variable {
        let id = VariableId::new(self.next_id);
        self.next_id += 1;
        self.max_variable_count = self.max_variable_count.max(self.next_id);
        let scope = self.scopes.last_mut().unwrap();
        scope.insert(Variable {
            name: name.to_owned(),
            ty,
            id,
            constant,
            declaration_span: span,
        });
        scope.get(name).unwrap()
    }

    /// Declares in the outermost (function) scope, regardless of the
    /// current nesting. Capture copies live there so they stay visible
    /// for the rest of the closure body.
    pub fn declare_captured(&mut self, name: &str, ty: Type, span: Span) -> &Variable {
        let id = VariableId::new(self.next_id);
        self.next_id += 1;
        self.max_variable_count = self.max_variable_count.max(self.next_id);
        let scope = self.scopes.first_mut().unwrap();
        scope.insert(Variable {
            name: name.to_owned(),
            ty,
            id,
            constant: true,
            declaration_span: span,
        });
        scope.get(name).unwrap()
    }

    /// Resolves a name, innermost scope first, then the instance scope.
    pub fn resolve(&self, name: &str) -> Option<ResolvedVariable<'_>> {
        for scope in self.scopes.iter().rev() {
            if let Some(variable) = scope.get(name) {
                return Some(ResolvedVariable {
                    in_instance_scope: false,
                    variable,
                });
            }
        }
        self.instance_scope
            .as_ref()
            .and_then(|scope| scope.get(name))
            .map(|variable| ResolvedVariable {
                in_instance_scope: true,
                variable,
            })
    }

    /// All locals currently visible, outermost first. Snapshot source for
    /// closure capture environments.
    pub fn visible_locals(&self) -> Vec<Variable> {
        let mut out = Vec::new();
        for scope in &self.scopes {
            out.extend(scope.variables().cloned());
        }
        out
    }

    /// The frame size this function needs.
    pub fn max_variable_count(&self) -> u32 {
        self.max_variable_count.max(self.next_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int() -> Type {
        Type::something()
    }

    #[test]
    fn declares_and_resolves() {
        let mut scoper = Scoper::new(None);
        let mut diagnostics = Diagnostics::new();
        scoper.declare("a", int(), true, Span::none(), &mut diagnostics);
        let resolved = scoper.resolve("a").unwrap();
        assert!(!resolved.in_instance_scope);
        assert_eq!(resolved.variable.id, VariableId::new(0));
        assert!(scoper.resolve("b").is_none());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn shadowing_is_reported() {
        let mut scoper = Scoper::new(None);
        let mut diagnostics = Diagnostics::new();
        scoper.declare("a", int(), true, Span::none(), &mut diagnostics);
        scoper.push_scope();
        scoper.declare("a", int(), true, Span::none(), &mut diagnostics);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn slot_ids_stay_unique_across_sibling_scopes() {
        let mut scoper = Scoper::new(None);
        let mut diagnostics = Diagnostics::new();
        scoper.declare("a", int(), true, Span::none(), &mut diagnostics);
        scoper.push_scope();
        scoper.declare("b", int(), true, Span::none(), &mut diagnostics);
        scoper.declare("c", int(), true, Span::none(), &mut diagnostics);
        let stats = scoper.pop_scope();
        assert_eq!(stats, ScopeStats { from: 1, count: 2 });
        scoper.push_scope();
        let v = scoper
            .declare("d", int(), true, Span::none(), &mut diagnostics)
            .id;
        assert_eq!(v, VariableId::new(3));
        scoper.pop_scope();
        assert_eq!(scoper.max_variable_count(), 4);
    }

    #[test]
    fn captured_declarations_land_in_the_function_scope() {
        let mut scoper = Scoper::new(None);
        scoper.push_scope();
        scoper.declare_captured("outer", int(), Span::none());
        scoper.pop_scope();
        assert!(scoper.resolve("outer").is_some());
    }

    #[test]
    fn instance_scope_is_the_fallback() {
        let mut instance = Scope::default();
        instance.insert(Variable {
            name: "size".to_owned(),
            ty: int(),
            id: VariableId::new(0),
            constant: false,
            declaration_span: Span::none(),
        });
        let mut scoper = Scoper::new(Some(instance));
        let mut diagnostics = Diagnostics::new();
        assert!(scoper.resolve("size").unwrap().in_instance_scope);
        scoper.declare("size", int(), true, Span::none(), &mut diagnostics);
        // A local shadows the instance variable (and is reported).
        assert!(!scoper.resolve("size").unwrap().in_instance_scope);
        assert_eq!(diagnostics.len(), 1);
    }
}
