// crates/sable-sema/src/types.rs
//! The semantic type representation.
//!
//! A [`Type`] pairs a structural kind with the reference and mutability
//! flags. Boxing is part of the type: `Boxed { inner, boxed_for }` records
//! that a value is stored in the universal box layout because it is being
//! used at the abstract type `boxed_for`. Compatibility always sees through
//! boxes; storage differences are bridged by conversions, not by the type
//! relation.

use crate::type_def::{TypeDefArena, TypeDefId, TypeDefKind};

/// How a value of a type is laid out in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    /// The plain value, exactly as wide as the type requires.
    Simple,
    /// The value preceded by a presence flag.
    SimpleOptional,
    /// An optional represented by a pointer, absence encoded as null.
    PointerOptional,
    /// The universal box: type description pointer plus inline value or
    /// heap pointer.
    Box,
}

/// The structural kind of a type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Class(TypeDefId, Vec<Type>),
    ValueType(TypeDefId, Vec<Type>),
    Enum(TypeDefId),
    Protocol(TypeDefId),
    /// An intersection of protocols, kept sorted by definition id.
    MultiProtocol(Vec<Type>),
    Callable {
        params: Vec<Type>,
        ret: Box<Type>,
    },
    /// A generic parameter of `owner`, identified by its index.
    GenericVariable {
        index: usize,
        owner: TypeDefId,
    },
    Optional(Box<Type>),
    /// A value stored in the universal box layout. `inner` is never itself
    /// boxed; `boxed_for` is the abstract type the box was produced for.
    Boxed {
        inner: Box<Type>,
        boxed_for: Box<Type>,
    },
    /// Supertype of all class instances.
    Someobject,
    /// Supertype of all types.
    Something,
    /// The type of functions that do not return, and the bottom of value
    /// positions.
    NoReturn,
}

/// A semantic type.
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    kind: TypeKind,
    reference: bool,
    mutable: bool,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            reference: false,
            mutable: false,
        }
    }

    pub fn class(def: TypeDefId, generic_args: Vec<Type>) -> Self {
        Self::new(TypeKind::Class(def, generic_args))
    }

    pub fn value_type(def: TypeDefId, generic_args: Vec<Type>) -> Self {
        Self::new(TypeKind::ValueType(def, generic_args))
    }

    pub fn enumeration(def: TypeDefId) -> Self {
        Self::new(TypeKind::Enum(def))
    }

    pub fn protocol(def: TypeDefId) -> Self {
        Self::new(TypeKind::Protocol(def))
    }

    /// Builds a protocol intersection. Protocols are sorted by definition
    /// id and deduplicated so that equal intersections compare equal; a
    /// single protocol collapses to a plain protocol type.
    pub fn multi_protocol(mut protocols: Vec<Type>) -> Self {
        protocols.sort_by_key(|p| match p.kind {
            TypeKind::Protocol(def) => def,
            _ => unreachable!("multi protocol members must be protocols"),
        });
        protocols.dedup();
        if protocols.len() == 1 {
            return protocols.pop().unwrap();
        }
        Self::new(TypeKind::MultiProtocol(protocols))
    }

    pub fn callable(params: Vec<Type>, ret: Type) -> Self {
        Self::new(TypeKind::Callable {
            params,
            ret: Box::new(ret),
        })
    }

    pub fn generic_variable(index: usize, owner: TypeDefId) -> Self {
        Self::new(TypeKind::GenericVariable { index, owner })
    }

    pub fn something() -> Self {
        Self::new(TypeKind::Something)
    }

    pub fn someobject() -> Self {
        Self::new(TypeKind::Someobject)
    }

    pub fn no_return() -> Self {
        Self::new(TypeKind::NoReturn)
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn is_reference(&self) -> bool {
        self.reference
    }

    pub fn set_reference(&mut self, reference: bool) {
        self.reference = reference;
    }

    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    pub fn set_mutable(&mut self, mutable: bool) {
        self.mutable = mutable;
    }

    pub fn is_no_return(&self) -> bool {
        matches!(self.kind, TypeKind::NoReturn)
    }

    pub fn is_optional(&self) -> bool {
        matches!(self.unboxed_kind(), TypeKind::Optional(_))
    }

    /// The definition behind a nominal type, seen through boxes.
    pub fn type_def(&self) -> Option<TypeDefId> {
        match self.unboxed_kind() {
            TypeKind::Class(def, _)
            | TypeKind::ValueType(def, _)
            | TypeKind::Enum(def)
            | TypeKind::Protocol(def) => Some(*def),
            _ => None,
        }
    }

    /// The kind with any box layer removed.
    pub fn unboxed_kind(&self) -> &TypeKind {
        match &self.kind {
            TypeKind::Boxed { inner, .. } => inner.kind(),
            kind => kind,
        }
    }

    /// The type with any box layer removed.
    pub fn unboxed(&self) -> Type {
        match &self.kind {
            TypeKind::Boxed { inner, .. } => (**inner).clone(),
            _ => self.clone(),
        }
    }

    /// Boxes this type for use at the abstract type `for_type`. Boxing an
    /// already boxed type replaces the box, so
    /// `t.boxed_for(d).unboxed() == t` holds for every unboxed `t`.
    pub fn boxed_for(&self, for_type: Type) -> Type {
        Type {
            kind: TypeKind::Boxed {
                inner: Box::new(self.unboxed()),
                boxed_for: Box::new(for_type.unboxed()),
            },
            reference: false,
            mutable: self.mutable,
        }
    }

    /// The abstract type this box was produced for, if this is a box.
    pub fn boxed_for_type(&self) -> Option<&Type> {
        match &self.kind {
            TypeKind::Boxed { boxed_for, .. } => Some(boxed_for),
            _ => None,
        }
    }

    /// Wraps this type in an optional, inside the box if there is one.
    /// Optionalizing an optional is the identity.
    pub fn optionalized(&self) -> Type {
        match &self.kind {
            TypeKind::Optional(_) => self.clone(),
            TypeKind::Boxed { inner, boxed_for } => {
                if matches!(inner.kind, TypeKind::Optional(_)) {
                    self.clone()
                } else {
                    Type {
                        kind: TypeKind::Boxed {
                            inner: Box::new(Type::new(TypeKind::Optional(inner.clone()))),
                            boxed_for: boxed_for.clone(),
                        },
                        reference: self.reference,
                        mutable: self.mutable,
                    }
                }
            }
            _ => Type::new(TypeKind::Optional(Box::new(self.clone()))),
        }
    }

    /// The content type if this is an optional (seen through boxes).
    pub fn optional_type(&self) -> Option<&Type> {
        match self.unboxed_kind() {
            TypeKind::Optional(inner) => Some(inner),
            _ => None,
        }
    }

    /// Whether values of this kind can only exist in the box layout.
    fn requires_box(&self) -> bool {
        match &self.kind {
            TypeKind::Something
            | TypeKind::Protocol(_)
            | TypeKind::MultiProtocol(_)
            | TypeKind::GenericVariable { .. } => true,
            TypeKind::Optional(inner) => inner.requires_box(),
            _ => false,
        }
    }

    /// Applies the least boxing a value of this type needs to exist in a
    /// slot of this type. Abstract types (protocols, `Something`, generic
    /// variables) become boxes for themselves; everything else stays as is.
    pub fn apply_minimal_boxing(&self) -> Type {
        if self.requires_box() && !matches!(self.kind, TypeKind::Boxed { .. }) {
            self.boxed_for(self.clone())
        } else {
            self.clone()
        }
    }

    /// How a value of this type is stored.
    pub fn storage_type(&self) -> StorageType {
        match &self.kind {
            TypeKind::Boxed { .. } => StorageType::Box,
            _ if self.requires_box() => StorageType::Box,
            TypeKind::Optional(inner) => match inner.kind {
                TypeKind::Class(..) | TypeKind::Someobject => StorageType::PointerOptional,
                _ => StorageType::SimpleOptional,
            },
            _ => StorageType::Simple,
        }
    }

    /// Whether a value of this type participates in reference counting and
    /// therefore needs retain/release bookkeeping.
    pub fn is_managed(&self, defs: &TypeDefArena) -> bool {
        match &self.kind {
            TypeKind::Class(..) | TypeKind::Someobject => true,
            TypeKind::ValueType(def, _) => {
                matches!(defs.get(*def).kind, TypeDefKind::ValueType { managed: true, .. })
            }
            TypeKind::Enum(_) | TypeKind::NoReturn => false,
            // Boxes and abstract types may hold anything; assume managed.
            TypeKind::Boxed { .. }
            | TypeKind::Protocol(_)
            | TypeKind::MultiProtocol(_)
            | TypeKind::Something
            | TypeKind::GenericVariable { .. }
            | TypeKind::Callable { .. } => true,
            TypeKind::Optional(inner) => inner.is_managed(defs),
        }
    }

    /// Substitutes generic variables using the calling context's callee
    /// type. Variables whose owner is not the callee's definition are left
    /// untouched.
    pub fn resolve_on(&self, ctx: &TypeContext) -> Type {
        let Some(callee) = ctx.callee() else {
            return self.clone();
        };
        let (callee_def, callee_args) = match callee.unboxed_kind() {
            TypeKind::Class(def, args) | TypeKind::ValueType(def, args) => (*def, args),
            _ => return self.clone(),
        };
        self.substitute(callee_def, callee_args)
    }

    fn substitute(&self, owner: TypeDefId, args: &[Type]) -> Type {
        let kind = match &self.kind {
            TypeKind::GenericVariable { index, owner: o } if *o == owner => {
                if let Some(arg) = args.get(*index) {
                    return arg.clone();
                }
                self.kind.clone()
            }
            TypeKind::Class(def, generic_args) => TypeKind::Class(
                *def,
                generic_args.iter().map(|a| a.substitute(owner, args)).collect(),
            ),
            TypeKind::ValueType(def, generic_args) => TypeKind::ValueType(
                *def,
                generic_args.iter().map(|a| a.substitute(owner, args)).collect(),
            ),
            TypeKind::MultiProtocol(protocols) => TypeKind::MultiProtocol(
                protocols.iter().map(|p| p.substitute(owner, args)).collect(),
            ),
            TypeKind::Callable { params, ret } => TypeKind::Callable {
                params: params.iter().map(|p| p.substitute(owner, args)).collect(),
                ret: Box::new(ret.substitute(owner, args)),
            },
            TypeKind::Optional(inner) => {
                TypeKind::Optional(Box::new(inner.substitute(owner, args)))
            }
            TypeKind::Boxed { inner, boxed_for } => TypeKind::Boxed {
                inner: Box::new(inner.substitute(owner, args)),
                boxed_for: Box::new(boxed_for.substitute(owner, args)),
            },
            other => other.clone(),
        };
        Type {
            kind,
            reference: self.reference,
            mutable: self.mutable,
        }
    }

    /// Whether this (protocol or intersection) type includes the protocol
    /// definition `proto`.
    pub fn mentions_protocol(&self, proto: TypeDefId) -> bool {
        match self.unboxed_kind() {
            TypeKind::Protocol(def) => *def == proto,
            TypeKind::MultiProtocol(protocols) => {
                protocols.iter().any(|p| p.mentions_protocol(proto))
            }
            _ => false,
        }
    }

    /// Appends every protocol definition this type mentions.
    pub fn collect_protocols(&self, out: &mut Vec<TypeDefId>) {
        match self.unboxed_kind() {
            TypeKind::Protocol(def) => out.push(*def),
            TypeKind::MultiProtocol(protocols) => {
                for p in protocols {
                    p.collect_protocols(out);
                }
            }
            _ => {}
        }
    }

    /// The subtyping preorder. Reflexive and transitive; boxes on either
    /// side are transparent.
    pub fn compatible_to(&self, to: &Type, ctx: &TypeContext, defs: &TypeDefArena) -> bool {
        if let TypeKind::Boxed { inner, .. } = &self.kind {
            return inner.compatible_to(to, ctx, defs);
        }
        if let TypeKind::Boxed { inner, .. } = &to.kind {
            return self.compatible_to(inner, ctx, defs);
        }

        if matches!(to.kind, TypeKind::Something) {
            return true;
        }

        if let TypeKind::Optional(self_inner) = &self.kind {
            return match &to.kind {
                TypeKind::Optional(to_inner) => self_inner.compatible_to(to_inner, ctx, defs),
                _ => false,
            };
        }
        if let TypeKind::Optional(to_inner) = &to.kind {
            return self.compatible_to(to_inner, ctx, defs);
        }

        // Resolve generic variables against the calling context. An
        // unresolvable variable is only compatible to itself.
        if let TypeKind::GenericVariable { .. } = &self.kind {
            if self.kind == to.kind {
                return true;
            }
            let resolved = self.resolve_on(ctx);
            if resolved.kind != self.kind {
                return resolved.compatible_to(to, ctx, defs);
            }
            return false;
        }
        if let TypeKind::GenericVariable { .. } = &to.kind {
            let resolved = to.resolve_on(ctx);
            if resolved.kind != to.kind {
                return self.compatible_to(&resolved, ctx, defs);
            }
            return false;
        }

        match &to.kind {
            TypeKind::Class(to_def, to_args) => match &self.kind {
                TypeKind::Class(self_def, self_args) => {
                    if self_def == to_def {
                        self_args.len() == to_args.len()
                            && self_args
                                .iter()
                                .zip(to_args)
                                .all(|(a, b)| a.identical_to(b, ctx))
                    } else {
                        defs.inherits_from(*self_def, *to_def)
                    }
                }
                _ => false,
            },
            TypeKind::ValueType(to_def, to_args) => match &self.kind {
                TypeKind::ValueType(self_def, self_args) => {
                    self_def == to_def
                        && self_args.len() == to_args.len()
                        && self_args
                            .iter()
                            .zip(to_args)
                            .all(|(a, b)| a.identical_to(b, ctx))
                }
                _ => false,
            },
            TypeKind::Enum(to_def) => matches!(&self.kind, TypeKind::Enum(d) if d == to_def),
            TypeKind::Someobject => {
                matches!(self.kind, TypeKind::Class(..) | TypeKind::Someobject)
            }
            TypeKind::Protocol(to_def) => match &self.kind {
                TypeKind::Protocol(def) => def == to_def,
                TypeKind::MultiProtocol(protocols) => {
                    protocols.iter().any(|p| p.compatible_to(to, ctx, defs))
                }
                TypeKind::Class(def, _)
                | TypeKind::ValueType(def, _)
                | TypeKind::Enum(def) => defs.def_conforms_to(*def, *to_def),
                _ => false,
            },
            TypeKind::MultiProtocol(to_protocols) => to_protocols
                .iter()
                .all(|p| self.compatible_to(p, ctx, defs)),
            TypeKind::Callable {
                params: to_params,
                ret: to_ret,
            } => match &self.kind {
                TypeKind::Callable { params, ret } => {
                    // Covariant in the return, contravariant in parameters.
                    params.len() == to_params.len()
                        && ret.compatible_to(to_ret, ctx, defs)
                        && to_params
                            .iter()
                            .zip(params)
                            .all(|(to_p, p)| to_p.compatible_to(p, ctx, defs))
                }
                _ => false,
            },
            TypeKind::NoReturn => matches!(self.kind, TypeKind::NoReturn),
            TypeKind::Something => true,
            TypeKind::Optional(_) | TypeKind::Boxed { .. } | TypeKind::GenericVariable { .. } => {
                unreachable!("handled before the kind dispatch")
            }
        }
    }

    /// Structural identity after generic resolution, ignoring boxing and
    /// the reference and mutability flags.
    pub fn identical_to(&self, to: &Type, ctx: &TypeContext) -> bool {
        self.unboxed().resolve_on(ctx).kind == to.unboxed().resolve_on(ctx).kind
    }

    /// Renders the type for diagnostics.
    pub fn display(&self, defs: &TypeDefArena) -> String {
        match &self.kind {
            TypeKind::Class(def, args) | TypeKind::ValueType(def, args) => {
                let name = &defs.get(*def).name;
                if args.is_empty() {
                    name.clone()
                } else {
                    let args = args
                        .iter()
                        .map(|a| a.display(defs))
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{}<{}>", name, args)
                }
            }
            TypeKind::Enum(def) | TypeKind::Protocol(def) => defs.get(*def).name.clone(),
            TypeKind::MultiProtocol(protocols) => protocols
                .iter()
                .map(|p| p.display(defs))
                .collect::<Vec<_>>()
                .join(" + "),
            TypeKind::Callable { params, ret } => {
                let params = params
                    .iter()
                    .map(|p| p.display(defs))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({}) -> {}", params, ret.display(defs))
            }
            TypeKind::GenericVariable { index, owner } => defs
                .get(*owner)
                .generic_params
                .get(*index)
                .cloned()
                .unwrap_or_else(|| format!("T{}", index)),
            TypeKind::Optional(inner) => format!("{}?", inner.display(defs)),
            TypeKind::Boxed { inner, .. } => inner.display(defs),
            TypeKind::Someobject => "someobject".to_owned(),
            TypeKind::Something => "something".to_owned(),
            TypeKind::NoReturn => "no return".to_owned(),
        }
    }
}

/// The type a body is analysed in, providing the callee type for generic
/// resolution.
#[derive(Debug, Clone, Default)]
pub struct TypeContext {
    callee: Option<Type>,
}

impl TypeContext {
    pub fn new(callee: Type) -> Self {
        Self {
            callee: Some(callee),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn callee(&self) -> Option<&Type> {
        self.callee.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_def::TypeDefinition;
    use sable_frontend::Span;

    fn class_def(defs: &mut TypeDefArena, name: &str, superclass: Option<TypeDefId>) -> TypeDefId {
        defs.alloc(TypeDefinition::new(
            name,
            TypeDefKind::Class {
                superclass,
                final_: false,
            },
            Span::none(),
        ))
    }

    fn sample_types(defs: &mut TypeDefArena) -> Vec<Type> {
        let animal = class_def(defs, "Animal", None);
        let cat = class_def(defs, "Cat", Some(animal));
        let int = defs.alloc(TypeDefinition::new(
            "Int",
            TypeDefKind::ValueType {
                primitive: true,
                managed: false,
            },
            Span::none(),
        ));
        let greet = defs.alloc(TypeDefinition::new(
            "Greetable",
            TypeDefKind::Protocol,
            Span::none(),
        ));
        vec![
            Type::class(animal, vec![]),
            Type::class(cat, vec![]),
            Type::value_type(int, vec![]),
            Type::protocol(greet),
            Type::class(cat, vec![]).optionalized(),
            Type::something(),
            Type::someobject(),
            Type::callable(vec![Type::value_type(int, vec![])], Type::something()),
            Type::protocol(greet).boxed_for(Type::something()),
        ]
    }

    #[test]
    fn compatible_to_is_reflexive() {
        let mut defs = TypeDefArena::default();
        let ctx = TypeContext::empty();
        for ty in sample_types(&mut defs) {
            assert!(
                ty.compatible_to(&ty, &ctx, &defs),
                "{} not compatible to itself",
                ty.display(&defs)
            );
        }
    }

    #[test]
    fn everything_is_compatible_to_something() {
        let mut defs = TypeDefArena::default();
        let ctx = TypeContext::empty();
        let top = Type::something();
        for ty in sample_types(&mut defs) {
            assert!(ty.compatible_to(&top, &ctx, &defs));
        }
    }

    #[test]
    fn subclass_is_compatible_to_superclass() {
        let mut defs = TypeDefArena::default();
        let animal = class_def(&mut defs, "Animal", None);
        let cat = class_def(&mut defs, "Cat", Some(animal));
        let ctx = TypeContext::empty();
        let cat_ty = Type::class(cat, vec![]);
        let animal_ty = Type::class(animal, vec![]);
        assert!(cat_ty.compatible_to(&animal_ty, &ctx, &defs));
        assert!(!animal_ty.compatible_to(&cat_ty, &ctx, &defs));
        assert!(cat_ty.compatible_to(&Type::someobject(), &ctx, &defs));
    }

    #[test]
    fn optionals_are_covariant_but_never_unwrap() {
        let mut defs = TypeDefArena::default();
        let animal = class_def(&mut defs, "Animal", None);
        let cat = class_def(&mut defs, "Cat", Some(animal));
        let ctx = TypeContext::empty();
        let cat_opt = Type::class(cat, vec![]).optionalized();
        let animal_opt = Type::class(animal, vec![]).optionalized();
        assert!(cat_opt.compatible_to(&animal_opt, &ctx, &defs));
        // Non-optional to optional widens, the reverse does not hold.
        assert!(Type::class(cat, vec![]).compatible_to(&animal_opt, &ctx, &defs));
        assert!(!cat_opt.compatible_to(&Type::class(animal, vec![]), &ctx, &defs));
    }

    #[test]
    fn boxing_round_trip_restores_the_type() {
        let mut defs = TypeDefArena::default();
        for ty in sample_types(&mut defs) {
            let unboxed = ty.unboxed();
            let round_tripped = unboxed.boxed_for(Type::something()).unboxed();
            assert_eq!(round_tripped, unboxed);
        }
    }

    #[test]
    fn boxes_are_transparent_to_compatibility() {
        let mut defs = TypeDefArena::default();
        let animal = class_def(&mut defs, "Animal", None);
        let ctx = TypeContext::empty();
        let plain = Type::class(animal, vec![]);
        let boxed = plain.boxed_for(Type::something());
        assert!(boxed.compatible_to(&plain, &ctx, &defs));
        assert!(plain.compatible_to(&boxed, &ctx, &defs));
        assert_eq!(boxed.storage_type(), StorageType::Box);
        assert_eq!(plain.storage_type(), StorageType::Simple);
    }

    #[test]
    fn callable_variance() {
        let mut defs = TypeDefArena::default();
        let animal = class_def(&mut defs, "Animal", None);
        let cat = class_def(&mut defs, "Cat", Some(animal));
        let ctx = TypeContext::empty();
        let animal_ty = Type::class(animal, vec![]);
        let cat_ty = Type::class(cat, vec![]);
        // (Animal) -> Cat is usable where (Cat) -> Animal is expected.
        let general = Type::callable(vec![animal_ty.clone()], cat_ty.clone());
        let expected = Type::callable(vec![cat_ty.clone()], animal_ty.clone());
        assert!(general.compatible_to(&expected, &ctx, &defs));
        assert!(!expected.compatible_to(&general, &ctx, &defs));
    }

    #[test]
    fn multi_protocol_orders_members() {
        let mut defs = TypeDefArena::default();
        let a = defs.alloc(TypeDefinition::new("A", TypeDefKind::Protocol, Span::none()));
        let b = defs.alloc(TypeDefinition::new("B", TypeDefKind::Protocol, Span::none()));
        let ab = Type::multi_protocol(vec![Type::protocol(b), Type::protocol(a)]);
        let ba = Type::multi_protocol(vec![Type::protocol(a), Type::protocol(b)]);
        assert_eq!(ab, ba);
        let ctx = TypeContext::empty();
        assert!(ab.compatible_to(&Type::protocol(a), &ctx, &defs));
        assert!(ab.compatible_to(&Type::protocol(b), &ctx, &defs));
        assert!(!Type::protocol(a).compatible_to(&ab, &ctx, &defs));
    }

    #[test]
    fn generic_variables_resolve_on_the_callee() {
        let mut defs = TypeDefArena::default();
        let animal = class_def(&mut defs, "Animal", None);
        let list = defs.alloc(TypeDefinition::new(
            "List",
            TypeDefKind::ValueType {
                primitive: false,
                managed: true,
            },
            Span::none(),
        ));
        defs.get_mut(list).generic_params.push("Element".to_owned());
        let elem = Type::generic_variable(0, list);
        let callee = Type::value_type(list, vec![Type::class(animal, vec![])]);
        let ctx = TypeContext::new(callee);
        assert_eq!(elem.resolve_on(&ctx), Type::class(animal, vec![]));
        assert!(elem.compatible_to(&Type::class(animal, vec![]), &ctx, &defs));
        // Without a context the variable only matches itself.
        let empty = TypeContext::empty();
        assert!(elem.compatible_to(&elem, &empty, &defs));
        assert!(!elem.compatible_to(&Type::class(animal, vec![]), &empty, &defs));
    }

    #[test]
    fn storage_types() {
        let mut defs = TypeDefArena::default();
        let animal = class_def(&mut defs, "Animal", None);
        let int = defs.alloc(TypeDefinition::new(
            "Int",
            TypeDefKind::ValueType {
                primitive: true,
                managed: false,
            },
            Span::none(),
        ));
        let greet = defs.alloc(TypeDefinition::new(
            "Greetable",
            TypeDefKind::Protocol,
            Span::none(),
        ));
        assert_eq!(Type::class(animal, vec![]).storage_type(), StorageType::Simple);
        assert_eq!(
            Type::class(animal, vec![]).optionalized().storage_type(),
            StorageType::PointerOptional
        );
        assert_eq!(
            Type::value_type(int, vec![]).optionalized().storage_type(),
            StorageType::SimpleOptional
        );
        assert_eq!(Type::protocol(greet).storage_type(), StorageType::Box);
        assert_eq!(
            Type::protocol(greet).apply_minimal_boxing().storage_type(),
            StorageType::Box
        );
        assert_eq!(Type::something().storage_type(), StorageType::Box);
    }
}
