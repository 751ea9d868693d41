// crates/sable-sema/src/compilation.rs
//! The compilation context: every definition, function body and
//! diagnostic of one package under analysis.

use rustc_hash::FxHashMap;
use sable_frontend::{Block, Mood, NodeIdGen, Span, TypeExpr};

use crate::diagnostics::{
    AnalysisResult, CompilerError, Diagnostics, SEMA_DUPLICATE_DECLARATION, SEMA_TYPE_NOT_FOUND,
};
use crate::type_def::{
    Function, FunctionArena, FunctionId, FunctionTable, TypeDefArena, TypeDefId, TypeDefKind,
    TypeDefinition,
};
use crate::types::Type;

/// Options controlling package analysis.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisOptions {
    /// Whether the package is compiled to an executable and therefore
    /// must provide an entry point.
    pub executable: bool,
}

/// Definitions every compilation provides.
#[derive(Debug, Clone, Copy)]
pub struct WellKnown {
    pub int: TypeDefId,
    pub bool_: TypeDefId,
    pub real: TypeDefId,
    pub string: TypeDefId,
    pub list: TypeDefId,
}

/// The name of the entry-point function of executables.
pub const ENTRY_POINT_NAME: &str = "main";

#[derive(Debug)]
pub struct Compilation {
    pub type_defs: TypeDefArena,
    pub functions: FunctionArena,
    /// Function bodies, taken out of the map while under analysis.
    pub bodies: FxHashMap<FunctionId, Block>,
    pub types_by_name: FxHashMap<String, TypeDefId>,
    pub free_functions: FunctionTable,
    pub entry_point: Option<FunctionId>,
    pub diagnostics: Diagnostics,
    pub node_ids: NodeIdGen,
    pub well_known: WellKnown,
}

impl Compilation {
    /// Creates an empty compilation with the well-known definitions
    /// registered.
    pub fn new(node_ids: NodeIdGen) -> Self {
        let mut type_defs = TypeDefArena::default();
        let mut types_by_name = FxHashMap::default();

        let mut primitive = |name: &str, defs: &mut TypeDefArena| {
            let id = defs.alloc(TypeDefinition::new(
                name,
                TypeDefKind::ValueType {
                    primitive: true,
                    managed: false,
                },
                Span::none(),
            ));
            types_by_name.insert(name.to_owned(), id);
            id
        };
        let int = primitive("Int", &mut type_defs);
        let bool_ = primitive("Bool", &mut type_defs);
        let real = primitive("Real", &mut type_defs);

        let string = type_defs.alloc(TypeDefinition::new(
            "String",
            TypeDefKind::Class {
                superclass: None,
                final_: true,
            },
            Span::none(),
        ));
        types_by_name.insert("String".to_owned(), string);

        let list = type_defs.alloc(TypeDefinition::new(
            "List",
            TypeDefKind::ValueType {
                primitive: false,
                managed: true,
            },
            Span::none(),
        ));
        type_defs.get_mut(list).generic_params.push("Element".to_owned());
        types_by_name.insert("List".to_owned(), list);

        Self {
            type_defs,
            functions: FunctionArena::default(),
            bodies: FxHashMap::default(),
            types_by_name,
            free_functions: FunctionTable::default(),
            entry_point: None,
            diagnostics: Diagnostics::new(),
            node_ids,
            well_known: WellKnown {
                int,
                bool_,
                real,
                string,
                list,
            },
        }
    }

    pub fn int_type(&self) -> Type {
        Type::value_type(self.well_known.int, vec![])
    }

    pub fn bool_type(&self) -> Type {
        Type::value_type(self.well_known.bool_, vec![])
    }

    pub fn real_type(&self) -> Type {
        Type::value_type(self.well_known.real, vec![])
    }

    pub fn string_type(&self) -> Type {
        Type::class(self.well_known.string, vec![])
    }

    pub fn list_of(&self, element: Type) -> Type {
        Type::value_type(self.well_known.list, vec![element])
    }

    /// The type of `this` inside members of `def`: the definition applied
    /// to its own generic parameters.
    pub fn self_type(&self, def: TypeDefId) -> Type {
        let definition = self.type_defs.get(def);
        let args = (0..definition.generic_params.len())
            .map(|index| Type::generic_variable(index, def).apply_minimal_boxing())
            .collect();
        match definition.kind {
            TypeDefKind::Class { .. } => Type::class(def, args),
            TypeDefKind::ValueType { .. } => Type::value_type(def, args),
            TypeDefKind::Enum { .. } => Type::enumeration(def),
            TypeDefKind::Protocol => Type::protocol(def),
        }
    }

    /// Registers a type definition under its name.
    pub fn add_type_def(&mut self, def: TypeDefinition) -> AnalysisResult<TypeDefId> {
        if let Some(previous) = self.types_by_name.get(&def.name) {
            return Err(CompilerError::new(
                def.span,
                format!("A type named \"{}\" is already defined.", def.name),
            )
            .with_info(&SEMA_DUPLICATE_DECLARATION)
            .with_note(
                self.type_defs.get(*previous).span,
                "previous definition is here",
            ));
        }
        let name = def.name.clone();
        let id = self.type_defs.alloc(def);
        self.types_by_name.insert(name, id);
        Ok(id)
    }

    /// Registers a free function with its body. A free function named
    /// [`ENTRY_POINT_NAME`] becomes the entry point.
    pub fn add_free_function(
        &mut self,
        function: Function,
        body: Block,
    ) -> AnalysisResult<FunctionId> {
        let name = function.name.clone();
        let mood = function.mood;
        let span = function.span;
        let id = self.functions.alloc(function);
        if let Err(previous) = self.free_functions.insert(&name, mood, id) {
            return Err(self.duplicate_member_error(&name, span, previous));
        }
        self.bodies.insert(id, body);
        if name == ENTRY_POINT_NAME && mood == Mood::Imperative {
            self.entry_point = Some(id);
        }
        Ok(id)
    }

    /// Registers a method on `owner`. The key is the (name, mood) pair.
    pub fn add_method(
        &mut self,
        owner: TypeDefId,
        function: Function,
        body: Option<Block>,
    ) -> AnalysisResult<FunctionId> {
        let name = function.name.clone();
        let mood = function.mood;
        let span = function.span;
        let id = self.functions.alloc(function);
        if let Err(previous) = self.type_defs.get_mut(owner).methods.insert(&name, mood, id) {
            return Err(self.duplicate_member_error(&name, span, previous));
        }
        if let Some(body) = body {
            self.bodies.insert(id, body);
        }
        Ok(id)
    }

    pub fn add_initializer(
        &mut self,
        owner: TypeDefId,
        function: Function,
        body: Block,
    ) -> AnalysisResult<FunctionId> {
        let name = function.name.clone();
        let mood = function.mood;
        let span = function.span;
        let id = self.functions.alloc(function);
        if let Err(previous) = self
            .type_defs
            .get_mut(owner)
            .initializers
            .insert(&name, mood, id)
        {
            return Err(self.duplicate_member_error(&name, span, previous));
        }
        self.bodies.insert(id, body);
        Ok(id)
    }

    pub fn add_type_method(
        &mut self,
        owner: TypeDefId,
        function: Function,
        body: Block,
    ) -> AnalysisResult<FunctionId> {
        let name = function.name.clone();
        let mood = function.mood;
        let span = function.span;
        let id = self.functions.alloc(function);
        if let Err(previous) = self
            .type_defs
            .get_mut(owner)
            .type_methods
            .insert(&name, mood, id)
        {
            return Err(self.duplicate_member_error(&name, span, previous));
        }
        self.bodies.insert(id, body);
        Ok(id)
    }

    pub fn set_deinitializer(
        &mut self,
        owner: TypeDefId,
        function: Function,
        body: Block,
    ) -> FunctionId {
        let id = self.functions.alloc(function);
        self.type_defs.get_mut(owner).deinitializer = Some(id);
        self.bodies.insert(id, body);
        id
    }

    fn duplicate_member_error(
        &self,
        name: &str,
        span: Span,
        previous: FunctionId,
    ) -> CompilerError {
        CompilerError::new(
            span,
            format!("\"{}\" is declared twice with the same mood.", name),
        )
        .with_info(&SEMA_DUPLICATE_DECLARATION)
        .with_note(
            self.functions.get(previous).span,
            "previous declaration is here",
        )
    }

    /// Resolves a parsed type annotation. `owner` provides the generic
    /// parameter namespace when resolving inside a type definition.
    pub fn resolve_type_expr(
        &self,
        expr: &TypeExpr,
        owner: Option<TypeDefId>,
    ) -> AnalysisResult<Type> {
        match expr {
            TypeExpr::Named {
                name,
                generic_args,
                span,
            } => {
                if let Some(owner) = owner {
                    let params = &self.type_defs.get(owner).generic_params;
                    if let Some(index) = params.iter().position(|p| p == name) {
                        if !generic_args.is_empty() {
                            return Err(CompilerError::new(
                                *span,
                                "Generic parameters cannot take generic arguments.",
                            ));
                        }
                        return Ok(Type::generic_variable(index, owner));
                    }
                }
                let Some(&def) = self.types_by_name.get(name) else {
                    return Err(CompilerError::new(
                        *span,
                        format!("Type \"{}\" could not be found.", name),
                    )
                    .with_info(&SEMA_TYPE_NOT_FOUND));
                };
                let definition = self.type_defs.get(def);
                if generic_args.len() != definition.generic_params.len() {
                    return Err(CompilerError::new(
                        *span,
                        format!(
                            "\"{}\" expects {} generic arguments, {} were given.",
                            name,
                            definition.generic_params.len(),
                            generic_args.len()
                        ),
                    ));
                }
                let args = generic_args
                    .iter()
                    .map(|arg| {
                        self.resolve_type_expr(arg, owner)
                            .map(|t| t.apply_minimal_boxing())
                    })
                    .collect::<AnalysisResult<Vec<_>>>()?;
                match definition.kind {
                    TypeDefKind::Class { .. } => Ok(Type::class(def, args)),
                    TypeDefKind::ValueType { .. } => Ok(Type::value_type(def, args)),
                    // Enums and protocols are not generic; their types
                    // carry no argument list, so arguments here would be
                    // silently lost.
                    TypeDefKind::Enum { .. } | TypeDefKind::Protocol if !args.is_empty() => {
                        Err(CompilerError::new(
                            *span,
                            format!("\"{}\" cannot take generic arguments.", name),
                        ))
                    }
                    TypeDefKind::Enum { .. } => Ok(Type::enumeration(def)),
                    TypeDefKind::Protocol => Ok(Type::protocol(def)),
                }
            }
            TypeExpr::Optional(inner, _) => {
                Ok(self.resolve_type_expr(inner, owner)?.optionalized())
            }
            TypeExpr::Callable { params, ret, .. } => {
                let params = params
                    .iter()
                    .map(|p| self.resolve_type_expr(p, owner))
                    .collect::<AnalysisResult<Vec<_>>>()?;
                let ret = match ret {
                    Some(ret) => self.resolve_type_expr(ret, owner)?,
                    None => Type::no_return(),
                };
                Ok(Type::callable(params, ret))
            }
            TypeExpr::Something(_) => Ok(Type::something()),
            TypeExpr::Someobject(_) => Ok(Type::someobject()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeKind;

    fn named(name: &str) -> TypeExpr {
        TypeExpr::Named {
            name: name.to_owned(),
            generic_args: vec![],
            span: Span::none(),
        }
    }

    #[test]
    fn well_known_types_resolve() {
        let compilation = Compilation::new(NodeIdGen::new());
        let int = compilation.resolve_type_expr(&named("Int"), None).unwrap();
        assert_eq!(int, compilation.int_type());
        let string = compilation
            .resolve_type_expr(&named("String"), None)
            .unwrap();
        assert_eq!(string, compilation.string_type());
    }

    #[test]
    fn generic_arity_is_checked() {
        let compilation = Compilation::new(NodeIdGen::new());
        assert!(compilation.resolve_type_expr(&named("List"), None).is_err());
        let list = TypeExpr::Named {
            name: "List".to_owned(),
            generic_args: vec![named("Int")],
            span: Span::none(),
        };
        let resolved = compilation.resolve_type_expr(&list, None).unwrap();
        assert_eq!(resolved, compilation.list_of(compilation.int_type()));
    }

    #[test]
    fn optional_annotations_optionalize() {
        let compilation = Compilation::new(NodeIdGen::new());
        let ty = compilation
            .resolve_type_expr(
                &TypeExpr::Optional(Box::new(named("Int")), Span::none()),
                None,
            )
            .unwrap();
        assert!(matches!(ty.kind(), TypeKind::Optional(_)));
    }

    #[test]
    fn unknown_types_error() {
        let compilation = Compilation::new(NodeIdGen::new());
        assert!(compilation.resolve_type_expr(&named("Ghost"), None).is_err());
    }

    #[test]
    fn protocols_reject_generic_arguments() {
        let mut compilation = Compilation::new(NodeIdGen::new());
        let mut def = TypeDefinition::new("Container", TypeDefKind::Protocol, Span::none());
        def.generic_params.push("T".to_owned());
        compilation.add_type_def(def).unwrap();

        let expr = TypeExpr::Named {
            name: "Container".to_owned(),
            generic_args: vec![named("Int")],
            span: Span::none(),
        };
        let err = compilation.resolve_type_expr(&expr, None).unwrap_err();
        assert!(err.message.contains("generic arguments"));
    }
}
