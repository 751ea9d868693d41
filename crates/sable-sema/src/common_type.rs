// crates/sable-sema/src/common_type.rs
//! Infers the common type of a set of expressions, e.g. the element type
//! of a list literal.
//!
//! The finder keeps one candidate and widens or degrades it as types are
//! added. The candidate only ever moves up the compatibility preorder, so
//! inference is monotone: adding another type never produces a more
//! specific result. When two candidates are incompatible both ways the
//! finder degrades to `someobject` (if both are class instances) or
//! `something`, but keeps intersecting the protocol sets of everything it
//! has seen; a non-empty intersection rescues the result as a protocol
//! (or protocol intersection) type.

use sable_frontend::Span;

use crate::diagnostics::{Diagnostics, WARN_AMBIGUOUS_TYPE, WARN_COMMON_TYPE_TOP};
use crate::type_def::{TypeDefArena, TypeDefId};
use crate::types::{Type, TypeContext, TypeKind};

#[derive(Debug, Default)]
pub struct CommonTypeFinder {
    common: Option<Type>,
    /// Intersection of the protocol sets of all added types. `None` before
    /// the first type.
    protocols: Option<Vec<TypeDefId>>,
}

fn protocols_of(ty: &Type, defs: &TypeDefArena) -> Vec<TypeDefId> {
    match ty.unboxed_kind() {
        TypeKind::Class(def, _) | TypeKind::ValueType(def, _) | TypeKind::Enum(def) => {
            defs.protocols_of(*def)
        }
        TypeKind::Protocol(_) | TypeKind::MultiProtocol(_) => {
            let mut out = Vec::new();
            ty.collect_protocols(&mut out);
            out
        }
        _ => Vec::new(),
    }
}

fn is_object(ty: &Type) -> bool {
    matches!(ty.unboxed_kind(), TypeKind::Class(..) | TypeKind::Someobject)
}

impl CommonTypeFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes another type into account.
    pub fn add_type(&mut self, ty: &Type, ctx: &TypeContext, defs: &TypeDefArena) {
        let mut ty = ty.clone();
        ty.set_reference(false);

        match &mut self.protocols {
            None => self.protocols = Some(protocols_of(&ty, defs)),
            Some(intersection) => {
                let added = protocols_of(&ty, defs);
                intersection.retain(|p| added.contains(p));
            }
        }

        let Some(current) = &mut self.common else {
            self.common = Some(ty);
            return;
        };
        if ty.compatible_to(current, ctx, defs) {
            return;
        }
        if current.compatible_to(&ty, ctx, defs) {
            *current = ty;
            return;
        }
        *current = if is_object(current) && is_object(&ty) {
            Type::someobject()
        } else {
            Type::something()
        };
    }

    /// The inferred common type. Reports a warning if no type was added or
    /// if inference degraded to `someobject` or `something` without a
    /// protocol rescue.
    pub fn get_common_type(
        &self,
        span: Span,
        diagnostics: &mut Diagnostics,
        defs: &TypeDefArena,
    ) -> Type {
        let Some(common) = &self.common else {
            diagnostics.emit(
                &WARN_AMBIGUOUS_TYPE,
                span,
                "The type of this literal is ambiguous; assuming something.",
            );
            return Type::something();
        };
        if matches!(common.kind(), TypeKind::Someobject | TypeKind::Something) {
            if let Some(protocols) = &self.protocols {
                if !protocols.is_empty() {
                    return Type::multi_protocol(
                        protocols.iter().map(|p| Type::protocol(*p)).collect(),
                    );
                }
            }
            diagnostics.emit(
                &WARN_COMMON_TYPE_TOP,
                span,
                format!(
                    "No common type could be found; the common type defaults to {}.",
                    common.display(defs)
                ),
            );
        }
        common.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_def::{ProtocolConformance, TypeDefKind, TypeDefinition};
    use sable_frontend::TypeExpr;

    struct Fixture {
        defs: TypeDefArena,
        animal: TypeDefId,
        cat: TypeDefId,
        dog: TypeDefId,
        int: TypeDefId,
        string: TypeDefId,
        greet: TypeDefId,
    }

    fn fixture() -> Fixture {
        let mut defs = TypeDefArena::default();
        let animal = defs.alloc(TypeDefinition::new(
            "Animal",
            TypeDefKind::Class {
                superclass: None,
                final_: false,
            },
            Span::none(),
        ));
        let cat = defs.alloc(TypeDefinition::new(
            "Cat",
            TypeDefKind::Class {
                superclass: Some(animal),
                final_: false,
            },
            Span::none(),
        ));
        let dog = defs.alloc(TypeDefinition::new(
            "Dog",
            TypeDefKind::Class {
                superclass: None,
                final_: false,
            },
            Span::none(),
        ));
        let int = defs.alloc(TypeDefinition::new(
            "Int",
            TypeDefKind::ValueType {
                primitive: true,
                managed: false,
            },
            Span::none(),
        ));
        let string = defs.alloc(TypeDefinition::new(
            "String",
            TypeDefKind::Class {
                superclass: None,
                final_: false,
            },
            Span::none(),
        ));
        let greet = defs.alloc(TypeDefinition::new(
            "Greetable",
            TypeDefKind::Protocol,
            Span::none(),
        ));
        Fixture {
            defs,
            animal,
            cat,
            dog,
            int,
            string,
            greet,
        }
    }

    fn conform(defs: &mut TypeDefArena, def: TypeDefId, proto: TypeDefId) {
        defs.get_mut(def).conformances.push(ProtocolConformance {
            ty_expr: TypeExpr::Named {
                name: String::new(),
                generic_args: vec![],
                span: Span::none(),
            },
            span: Span::none(),
            resolved: Some(Type::protocol(proto)),
            implementations: Vec::new(),
        });
    }

    #[test]
    fn widens_to_the_superclass() {
        let f = fixture();
        let ctx = TypeContext::empty();
        let mut finder = CommonTypeFinder::new();
        finder.add_type(&Type::class(f.cat, vec![]), &ctx, &f.defs);
        finder.add_type(&Type::class(f.animal, vec![]), &ctx, &f.defs);
        finder.add_type(&Type::class(f.cat, vec![]), &ctx, &f.defs);
        let mut diagnostics = Diagnostics::new();
        let common = finder.get_common_type(Span::none(), &mut diagnostics, &f.defs);
        assert_eq!(common, Type::class(f.animal, vec![]));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn unrelated_classes_degrade_to_someobject_with_warning() {
        let f = fixture();
        let ctx = TypeContext::empty();
        let mut finder = CommonTypeFinder::new();
        finder.add_type(&Type::class(f.cat, vec![]), &ctx, &f.defs);
        finder.add_type(&Type::class(f.dog, vec![]), &ctx, &f.defs);
        let mut diagnostics = Diagnostics::new();
        let common = finder.get_common_type(Span::none(), &mut diagnostics, &f.defs);
        assert_eq!(common, Type::someobject());
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn shared_protocol_rescues_unrelated_types() {
        let mut f = fixture();
        conform(&mut f.defs, f.cat, f.greet);
        conform(&mut f.defs, f.int, f.greet);
        let ctx = TypeContext::empty();
        let mut finder = CommonTypeFinder::new();
        finder.add_type(&Type::class(f.cat, vec![]), &ctx, &f.defs);
        finder.add_type(&Type::value_type(f.int, vec![]), &ctx, &f.defs);
        let mut diagnostics = Diagnostics::new();
        let common = finder.get_common_type(Span::none(), &mut diagnostics, &f.defs);
        assert_eq!(common, Type::protocol(f.greet));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn value_and_object_types_degrade_to_something_with_warning() {
        let f = fixture();
        let ctx = TypeContext::empty();
        let mut finder = CommonTypeFinder::new();
        finder.add_type(&Type::value_type(f.int, vec![]), &ctx, &f.defs);
        finder.add_type(&Type::class(f.string, vec![]), &ctx, &f.defs);
        finder.add_type(&Type::value_type(f.int, vec![]), &ctx, &f.defs);
        let mut diagnostics = Diagnostics::new();
        let common = finder.get_common_type(Span::none(), &mut diagnostics, &f.defs);
        assert_eq!(common, Type::something());
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn inference_is_monotone() {
        let f = fixture();
        let ctx = TypeContext::empty();
        let mut finder = CommonTypeFinder::new();
        finder.add_type(&Type::value_type(f.int, vec![]), &ctx, &f.defs);
        finder.add_type(&Type::class(f.string, vec![]), &ctx, &f.defs);
        // Once the candidate reached the top it must not become more
        // specific again.
        finder.add_type(&Type::value_type(f.int, vec![]), &ctx, &f.defs);
        finder.add_type(&Type::class(f.cat, vec![]), &ctx, &f.defs);
        let mut diagnostics = Diagnostics::new();
        let common = finder.get_common_type(Span::none(), &mut diagnostics, &f.defs);
        assert_eq!(common, Type::something());
    }

    #[test]
    fn empty_finder_warns_and_assumes_something() {
        let f = fixture();
        let finder = CommonTypeFinder::new();
        let mut diagnostics = Diagnostics::new();
        let common = finder.get_common_type(Span::none(), &mut diagnostics, &f.defs);
        assert_eq!(common, Type::something());
        assert_eq!(diagnostics.len(), 1);
    }
}
