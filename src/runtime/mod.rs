//! Runtime system
//!
//! This module contains memory management, the collector, and the eval code
//! caches owned by code blocks.

pub mod agent;
pub mod code_block;
pub mod eval;
pub mod gc;
pub mod memory;
