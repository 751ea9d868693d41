// crates/sable-sema/src/expression_data.rs
//! Analysis results, keyed by AST node id.
//!
//! The analysers never mutate the tree. Everything later phases need --
//! expression types, storage conversions, resolved variable accesses, call
//! targets -- is recorded here in side tables.

use rustc_hash::{FxHashMap, FxHashSet};
use sable_frontend::NodeId;
use smallvec::SmallVec;

use crate::scope::ScopeStats;
use crate::type_def::{FunctionId, VariableId};
use crate::types::Type;

/// A storage conversion to apply to an expression's value, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    SimpleToSimpleOptional,
    SimpleToBox,
    SimpleOptionalToBox,
    BoxToSimple,
    BoxToSimpleOptional,
    /// Replace the box's type description because the destination expects
    /// the box produced for a different abstract type.
    Rebox,
    /// Reinterpret a class reference as one of its superclasses.
    Upcast,
}

/// A resolved variable access.
#[derive(Debug, Clone)]
pub struct VarAccess {
    pub in_instance_scope: bool,
    pub id: VariableId,
    pub ty: Type,
}

/// Per-block facts recorded when the block's scope is popped.
#[derive(Debug, Clone, Copy)]
pub struct BlockInfo {
    /// Whether every path through the block returned.
    pub returned_certainly: bool,
    /// Number of live statements. Statements past this index are dead
    /// code and are skipped by memory flow and code generation.
    pub stop: usize,
    pub stats: ScopeStats,
}

/// A variable captured by a closure. The capture is a copy: the closure
/// gets its own slot, filled from the enclosing frame when the closure
/// object is created.
#[derive(Debug, Clone)]
pub struct Capture {
    /// Slot in the enclosing function.
    pub source_id: VariableId,
    /// Slot in the closure's frame.
    pub captured_id: VariableId,
    pub ty: Type,
}

/// A value to release, identified the way variable accesses are.
#[derive(Debug, Clone)]
pub struct Release {
    pub in_instance_scope: bool,
    pub id: VariableId,
    pub ty: Type,
}

/// Side tables written by semantic analysis.
#[derive(Debug, Default)]
pub struct ExpressionData {
    expr_types: FxHashMap<NodeId, Type>,
    conversions: FxHashMap<NodeId, SmallVec<[Conversion; 2]>>,
    pub var_accesses: FxHashMap<NodeId, VarAccess>,
    pub block_info: FxHashMap<NodeId, BlockInfo>,
    /// Closure expression id to its captures.
    pub captures: FxHashMap<NodeId, Vec<Capture>>,
    /// Closures that capture the receiver.
    pub self_captures: FxHashSet<NodeId>,
    /// Closure expression id to the synthesized function.
    pub closure_functions: FxHashMap<NodeId, FunctionId>,
    /// Call and initialization expression id to the resolved callee.
    pub call_targets: FxHashMap<NodeId, FunctionId>,
    /// List literal id to the inferred element type.
    pub element_types: FxHashMap<NodeId, Type>,
    /// Cast expression id to the resolved target type.
    pub cast_targets: FxHashMap<NodeId, Type>,
    /// Raise statement id to the instance variables an initializer must
    /// release before propagating the error.
    pub error_releases: FxHashMap<NodeId, Vec<Release>>,
}

impl ExpressionData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_type(&mut self, node: NodeId, ty: Type) {
        self.expr_types.insert(node, ty);
    }

    pub fn ty(&self, node: NodeId) -> Option<&Type> {
        self.expr_types.get(&node)
    }

    /// Appends a conversion. Conversions apply in recording order.
    pub fn add_conversion(&mut self, node: NodeId, conversion: Conversion) {
        self.conversions.entry(node).or_default().push(conversion);
    }

    pub fn conversions(&self, node: NodeId) -> &[Conversion] {
        self.conversions.get(&node).map_or(&[], |c| c.as_slice())
    }
}

/// Side tables written by memory-flow analysis.
#[derive(Debug, Default)]
pub struct MemoryFlowData {
    /// Allocation expressions proven not to escape; code generation may
    /// place them on the stack.
    pub stack_allocations: FxHashSet<NodeId>,
    /// Block id to the temporaries and locals to release when the block
    /// ends normally.
    pub block_releases: FxHashMap<NodeId, Vec<Release>>,
    /// Return statement id to the releases to perform after the return
    /// value has been evaluated.
    pub return_releases: FxHashMap<NodeId, Vec<Release>>,
}

impl MemoryFlowData {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_keep_recording_order() {
        let mut data = ExpressionData::new();
        let node = NodeId::new(7);
        data.add_conversion(node, Conversion::SimpleToSimpleOptional);
        data.add_conversion(node, Conversion::SimpleOptionalToBox);
        assert_eq!(
            data.conversions(node),
            &[
                Conversion::SimpleToSimpleOptional,
                Conversion::SimpleOptionalToBox
            ]
        );
        assert!(data.conversions(NodeId::new(8)).is_empty());
    }

    #[test]
    fn types_are_per_node() {
        let mut data = ExpressionData::new();
        data.set_type(NodeId::new(1), Type::something());
        assert_eq!(data.ty(NodeId::new(1)), Some(&Type::something()));
        assert_eq!(data.ty(NodeId::new(2)), None);
    }
}
