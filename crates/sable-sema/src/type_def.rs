// crates/sable-sema/src/type_def.rs
//! Arena-allocated type definitions and functions.
//!
//! All definitions live in dense `Vec` arenas and are referred to by index
//! newtypes (`TypeDefId`, `FunctionId`). Member lookup is keyed by the pair
//! of name and mood; there is no overloading beyond the mood qualifier.

use rustc_hash::FxHashMap;
use sable_frontend::{Expr, Mood, Span, TypeExpr};

use crate::memory_flow::FlowCategory;
use crate::types::Type;

/// Index of a type definition in the [`TypeDefArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeDefId(u32);

impl TypeDefId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a function in the [`FunctionArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(u32);

impl FunctionId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a variable within one function's frame, or within one type's
/// instance scope. Dense per owner; the two id spaces are distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(u32);

impl VariableId {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What flavour of definition a [`TypeDefinition`] is.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDefKind {
    Class {
        superclass: Option<TypeDefId>,
        final_: bool,
    },
    ValueType {
        /// Primitive value types (Int, Bool, Real) compile to machine
        /// scalars and are never reference-counted.
        primitive: bool,
        /// Whether instances hold reference-counted content and therefore
        /// need copy/destroy bookkeeping.
        managed: bool,
    },
    Enum {
        values: Vec<String>,
    },
    Protocol,
}

/// A declared instance variable. The type annotation is resolved during
/// declaration analysis; `resolved` is `None` before that point.
#[derive(Debug, Clone)]
pub struct InstanceVariable {
    pub name: String,
    pub span: Span,
    pub ty_expr: TypeExpr,
    pub init: Option<Expr>,
    pub resolved: Option<Type>,
}

/// A declared protocol conformance and its dispatch table.
///
/// `implementations` lists one function per protocol method, in the
/// protocol's method declaration order. Entries are filled in when the
/// conformance is checked; a boxing thunk is synthesized where the
/// implementation's signature does not match the protocol's calling
/// convention exactly.
#[derive(Debug, Clone)]
pub struct ProtocolConformance {
    pub ty_expr: TypeExpr,
    pub span: Span,
    pub resolved: Option<Type>,
    pub implementations: Vec<FunctionId>,
}

/// Member table keyed by (name, mood), preserving declaration order.
#[derive(Debug, Default)]
pub struct FunctionTable {
    by_key: FxHashMap<(String, Mood), FunctionId>,
    ordered: Vec<FunctionId>,
}

impl FunctionTable {
    pub fn lookup(&self, name: &str, mood: Mood) -> Option<FunctionId> {
        self.by_key.get(&(name.to_owned(), mood)).copied()
    }

    /// Registers a member. Returns the previously registered function on a
    /// duplicate (name, mood) pair, leaving the table unchanged.
    pub fn insert(
        &mut self,
        name: &str,
        mood: Mood,
        function: FunctionId,
    ) -> Result<(), FunctionId> {
        match self.by_key.entry((name.to_owned(), mood)) {
            std::collections::hash_map::Entry::Occupied(entry) => Err(*entry.get()),
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(function);
                self.ordered.push(function);
                Ok(())
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.ordered.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

/// A class, value type, enumeration or protocol definition.
#[derive(Debug)]
pub struct TypeDefinition {
    pub name: String,
    pub span: Span,
    pub kind: TypeDefKind,
    /// Names of the generic parameters, in declaration order.
    pub generic_params: Vec<String>,
    pub methods: FunctionTable,
    pub initializers: FunctionTable,
    pub type_methods: FunctionTable,
    pub deinitializer: Option<FunctionId>,
    pub instance_variables: Vec<InstanceVariable>,
    pub conformances: Vec<ProtocolConformance>,
    /// Set for types compiled without runtime generic-argument tracking.
    /// Such types cannot be the target of a cast.
    pub generic_dynamism_disabled: bool,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>, kind: TypeDefKind, span: Span) -> Self {
        Self {
            name: name.into(),
            span,
            kind,
            generic_params: Vec::new(),
            methods: FunctionTable::default(),
            initializers: FunctionTable::default(),
            type_methods: FunctionTable::default(),
            deinitializer: None,
            instance_variables: Vec::new(),
            conformances: Vec::new(),
            generic_dynamism_disabled: false,
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, TypeDefKind::Class { .. })
    }

    pub fn is_value_type(&self) -> bool {
        matches!(self.kind, TypeDefKind::ValueType { .. })
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.kind, TypeDefKind::Enum { .. })
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self.kind, TypeDefKind::Protocol)
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, TypeDefKind::ValueType { primitive: true, .. })
    }

    pub fn superclass(&self) -> Option<TypeDefId> {
        match self.kind {
            TypeDefKind::Class { superclass, .. } => superclass,
            _ => None,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self.kind, TypeDefKind::Class { final_: true, .. })
    }
}

/// The kind of a function, determining its calling convention and which
/// checks apply to its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    /// A free function without a receiver.
    Function,
    ObjectMethod,
    ObjectInitializer,
    ValueTypeMethod,
    ValueTypeInitializer,
    TypeMethod,
    Deinitializer,
    Closure,
}

impl FunctionKind {
    pub fn is_initializer(self) -> bool {
        matches!(
            self,
            FunctionKind::ObjectInitializer | FunctionKind::ValueTypeInitializer
        )
    }

    pub fn has_this(self) -> bool {
        !matches!(self, FunctionKind::Function | FunctionKind::TypeMethod)
    }
}

/// A function parameter. `ty_expr` is absent for synthesized functions
/// whose parameter types are built directly.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub name: String,
    pub ty_expr: Option<TypeExpr>,
    /// Resolved type. `NoReturn` until declaration analysis runs.
    pub ty: Type,
    /// Result of memory-flow analysis for this parameter.
    pub flow: FlowCategory,
}

impl Parameter {
    pub fn declared(name: impl Into<String>, ty_expr: TypeExpr) -> Self {
        Self {
            name: name.into(),
            ty_expr: Some(ty_expr),
            ty: Type::no_return(),
            flow: FlowCategory::Unknown,
        }
    }

    pub fn synthesized(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty_expr: None,
            ty,
            flow: FlowCategory::Unknown,
        }
    }
}

/// A function, method, initializer, deinitializer or closure.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub mood: Mood,
    pub span: Span,
    pub kind: FunctionKind,
    pub owner: Option<TypeDefId>,
    pub params: Vec<Parameter>,
    pub return_type_expr: Option<TypeExpr>,
    /// Resolved return type. `NoReturn` for functions that do not return
    /// a value.
    pub return_type: Type,
    pub error_type_expr: Option<TypeExpr>,
    /// `Some` iff the function is error-prone (may raise).
    pub error_type: Option<Type>,
    pub mutating: bool,
    pub final_: bool,
    /// The overridden superclass function, filled during declaration
    /// analysis of classes.
    pub super_function: Option<FunctionId>,
    /// Number of frame slots this function needs, set after body analysis.
    pub variable_count: u32,
    /// Memory-flow category of the receiver. `Unknown` doubles as the
    /// "not yet analysed" sentinel for memoization.
    pub this_flow: FlowCategory,
    /// Whether the signature has been resolved.
    pub declared: bool,
    /// Whether the body has been pushed onto the analysis queue.
    pub queued: bool,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        mood: Mood,
        kind: FunctionKind,
        owner: Option<TypeDefId>,
        span: Span,
    ) -> Self {
        Self {
            name: name.into(),
            mood,
            span,
            kind,
            owner,
            params: Vec::new(),
            return_type_expr: None,
            return_type: Type::no_return(),
            error_type_expr: None,
            error_type: None,
            mutating: false,
            final_: false,
            super_function: None,
            variable_count: 0,
            this_flow: FlowCategory::Unknown,
            declared: false,
            queued: false,
        }
    }

    pub fn is_error_prone(&self) -> bool {
        self.error_type.is_some()
    }
}

/// Arena of all type definitions in a compilation.
#[derive(Debug, Default)]
pub struct TypeDefArena {
    defs: Vec<TypeDefinition>,
}

impl TypeDefArena {
    pub fn alloc(&mut self, def: TypeDefinition) -> TypeDefId {
        let id = TypeDefId(self.defs.len() as u32);
        self.defs.push(def);
        id
    }

    pub fn get(&self, id: TypeDefId) -> &TypeDefinition {
        &self.defs[id.index()]
    }

    pub fn get_mut(&mut self, id: TypeDefId) -> &mut TypeDefinition {
        &mut self.defs[id.index()]
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = TypeDefId> {
        (0..self.defs.len() as u32).map(TypeDefId)
    }

    /// Whether `sub` is `of` or inherits from it through the superclass
    /// chain.
    pub fn inherits_from(&self, sub: TypeDefId, of: TypeDefId) -> bool {
        let mut current = Some(sub);
        while let Some(id) = current {
            if id == of {
                return true;
            }
            current = self.get(id).superclass();
        }
        false
    }

    /// Looks up an instance method on `def`, walking the superclass chain.
    pub fn lookup_method(&self, def: TypeDefId, name: &str, mood: Mood) -> Option<FunctionId> {
        let mut current = Some(def);
        while let Some(id) = current {
            if let Some(function) = self.get(id).methods.lookup(name, mood) {
                return Some(function);
            }
            current = self.get(id).superclass();
        }
        None
    }

    /// Whether `def` (or a superclass) declares conformance to the protocol
    /// definition `proto`.
    pub fn def_conforms_to(&self, def: TypeDefId, proto: TypeDefId) -> bool {
        let mut current = Some(def);
        while let Some(id) = current {
            for conformance in &self.get(id).conformances {
                if let Some(resolved) = &conformance.resolved {
                    if resolved.mentions_protocol(proto) {
                        return true;
                    }
                }
            }
            current = self.get(id).superclass();
        }
        false
    }

    /// All protocol definitions `def` conforms to, superclasses included.
    pub fn protocols_of(&self, def: TypeDefId) -> Vec<TypeDefId> {
        let mut protocols = Vec::new();
        let mut current = Some(def);
        while let Some(id) = current {
            for conformance in &self.get(id).conformances {
                if let Some(resolved) = &conformance.resolved {
                    resolved.collect_protocols(&mut protocols);
                }
            }
            current = self.get(id).superclass();
        }
        protocols.sort_unstable();
        protocols.dedup();
        protocols
    }
}

/// Arena of all functions in a compilation.
#[derive(Debug, Default)]
pub struct FunctionArena {
    funcs: Vec<Function>,
}

impl FunctionArena {
    pub fn alloc(&mut self, function: Function) -> FunctionId {
        let id = FunctionId(self.funcs.len() as u32);
        self.funcs.push(function);
        id
    }

    pub fn get(&self, id: FunctionId) -> &Function {
        &self.funcs[id.index()]
    }

    pub fn get_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.funcs[id.index()]
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}
