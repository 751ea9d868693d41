// crates/sable-sema/src/lib.rs
//! Sable semantic analysis: type checking, declaration registries, and
//! memory-flow analysis.

// Public modules (used by codegen and tools)
pub mod common_type;
pub mod compilation;
pub mod diagnostics;
pub mod expression_data;
pub mod memory_flow;
pub mod type_def;
pub mod types;

// Internal modules (not part of the public API)
pub(crate) mod analyser;
pub(crate) mod path;
pub(crate) mod scope;

// Re-exports: public API surface
pub use analyser::{AnalysedPackage, analyse_package};
pub use common_type::CommonTypeFinder;
pub use compilation::{AnalysisOptions, Compilation, ENTRY_POINT_NAME, WellKnown};
pub use diagnostics::{
    AnalysisResult, CompilerError, Diagnostic, Diagnostics, ErrorInfo, Note, Severity,
    VariableNotFound,
};
pub use expression_data::{
    BlockInfo, Capture, Conversion, ExpressionData, MemoryFlowData, Release, VarAccess,
};
pub use memory_flow::{FlowCategory, MemoryFlowAnalyser};
pub use type_def::{
    Function, FunctionArena, FunctionId, FunctionKind, FunctionTable, InstanceVariable, Parameter,
    ProtocolConformance, TypeDefArena, TypeDefId, TypeDefKind, TypeDefinition, VariableId,
};
pub use types::{StorageType, Type, TypeContext, TypeKind};
