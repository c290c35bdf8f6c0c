//! evalcache
//!
//! A bounded, lazily populated cache of compiled eval code, keyed by the
//! source text and the call site that evaluates it, plus the small runtime
//! around it: a generational heap, a mark-and-sweep collector with a write
//! barrier, code blocks that own the caches, and an agent that drives them.
//!
//! # Example
//!
//! ```
//! use evalcache::runtime::agent::Agent;
//! use evalcache::runtime::eval::{BasicCompiler, CallSiteIndex, EmptyScope, EvalFlags};
//! use evalcache::util::config::RuntimeConfig;
//!
//! let mut agent = Agent::new(RuntimeConfig::default(), BasicCompiler::new());
//! let main = agent.create_code_block("main");
//! let site = CallSiteIndex::new(0);
//!
//! let first = agent.eval(main, "x + 1", site, EvalFlags::default(), &EmptyScope)?;
//! let again = agent.eval(main, "x + 1", site, EvalFlags::default(), &EmptyScope)?;
//! assert_eq!(first, again);
//! assert_eq!(agent.compiler().compilations(), 1);
//! # Ok::<(), evalcache::runtime::agent::AgentError>(())
//! ```

#![warn(rust_2018_idioms)]

pub mod runtime;
pub mod simulate;
pub mod util;

// Re-exports
pub use anyhow::{Context, Result};
pub use runtime::agent::{Agent, AgentError};
pub use runtime::eval::{CacheKey, CallSiteIndex, EvalCodeCache, SourceText};
pub use simulate::{simulate, SimulationOptions, SimulationReport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = "evalcache";
