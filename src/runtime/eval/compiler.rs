//! Interface between the eval cache and the code compiler

use serde::Serialize;
use thiserror::Error;

use super::key::CallSiteIndex;
use super::scope::{Scope, VariableEnvironment};
use super::source::SourceText;
use crate::runtime::gc::{OwnerId, GC};
use crate::runtime::memory::Gc;
use crate::util::span::Position;

/// Whether eval runs inside a derived class constructor or method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum DerivedContextType {
    #[default]
    None,
    DerivedConstructorContext,
    DerivedMethodContext,
}

/// Whether eval runs inside a function body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum EvalContextType {
    #[default]
    None,
    FunctionEvalContext,
}

/// Contextual flags of one eval invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct EvalFlags {
    pub in_strict_context: bool,
    pub derived_context_type: DerivedContextType,
    pub is_arrow_function_context: bool,
    pub eval_context_type: EvalContextType,
}

impl EvalFlags {
    pub fn strict() -> Self {
        Self {
            in_strict_context: true,
            ..Self::default()
        }
    }
}

/// Parameters for a cache miss, supplied by the owning context
#[derive(Clone, Copy)]
pub struct CompileParams<'a> {
    pub flags: EvalFlags,
    /// Scope chain at the eval call, consulted only on a miss
    pub scope: &'a dyn Scope,
    pub owner: OwnerId,
}

impl<'a> CompileParams<'a> {
    pub fn new(
        owner: OwnerId,
        flags: EvalFlags,
        scope: &'a dyn Scope,
    ) -> Self {
        Self {
            flags,
            scope,
            owner,
        }
    }
}

/// Everything the compiler receives for one eval source
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    pub source: &'a SourceText,
    pub call_site: CallSiteIndex,
    pub flags: EvalFlags,
    /// Bindings declared but not yet initialized around the call site
    pub variables_under_tdz: &'a VariableEnvironment,
    pub owner: OwnerId,
}

/// Compiles eval source into a unit allocated in `heap`
pub trait EvalCompiler<T> {
    fn compile(
        &mut self,
        heap: &mut GC<T>,
        request: &CompileRequest<'_>,
    ) -> Result<Gc<T>, CompileError>;
}

/// Compile errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("SyntaxError: {message} at {position}")]
    Syntax { message: String, position: Position },

    #[error("SemanticError: {message} at {position}")]
    Semantic { message: String, position: Position },
}

impl CompileError {
    pub fn syntax(
        message: impl Into<String>,
        position: Position,
    ) -> Self {
        CompileError::Syntax {
            message: message.into(),
            position,
        }
    }

    pub fn semantic(
        message: impl Into<String>,
        position: Position,
    ) -> Self {
        CompileError::Semantic {
            message: message.into(),
            position,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            CompileError::Syntax { message, .. } | CompileError::Semantic { message, .. } => {
                message
            }
        }
    }

    pub fn position(&self) -> Position {
        match self {
            CompileError::Syntax { position, .. } | CompileError::Semantic { position, .. } => {
                *position
            }
        }
    }
}
