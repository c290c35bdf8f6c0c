//! Eval code support
//!
//! Source text, cache keys, the scope/TDZ inputs of the eval compiler, and the
//! bounded per-owner cache of compiled eval units.

pub mod basic;
pub mod cache;
pub mod compiler;
pub mod key;
pub mod scope;
pub mod source;

pub use basic::{BasicCompiler, EvalExecutable};
pub use cache::{EvalCacheStats, EvalCodeCache, DEFAULT_CAPACITY};
pub use compiler::{
    CompileError, CompileParams, CompileRequest, DerivedContextType, EvalCompiler,
    EvalContextType, EvalFlags,
};
pub use key::{CacheKey, CallSiteIndex};
pub use scope::{BindingKind, EmptyScope, LexicalScope, Scope, VariableEnvironment};
pub use source::SourceText;

#[cfg(test)]
mod tests;
