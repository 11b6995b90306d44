// SPDX-License-Identifier: Apache-2.0

//! Restricted compilation of quantifier and function bodies.
//!
//! While a sandbox is active, the connection routes effects into a
//! [`SandboxState`] instead of the command stream: named subterms become
//! local `let` bindings, fresh unconstrained constants become extra bound
//! variables of the enclosing quantifier, and side conditions are collected
//! for the caller to fold into the formula. Declarations of free source
//! symbols and function definitions are global and still go to the sink.

use std::fmt;

use crate::encoding::Encoding;
use crate::error::{BridgeError, Result};
use crate::term_algebra::SolverTerm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxMode {
    Quantifier,
    /// A function body must be closed: no fresh constants, no side
    /// conditions.
    FunctionBody,
}

impl fmt::Display for SandboxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxMode::Quantifier => write!(f, "quantifier body"),
            SandboxMode::FunctionBody => write!(f, "function body"),
        }
    }
}

#[derive(Debug)]
pub struct SandboxState<T> {
    pub mode: SandboxMode,
    /// What is being compiled, for diagnostics.
    pub context: String,
    pub bound_defs: Vec<(String, T)>,
    pub free_constants: Vec<(String, Encoding)>,
    pub side_conditions: Vec<T>,
}

impl<T> SandboxState<T> {
    pub fn new(mode: SandboxMode, context: String) -> Self {
        SandboxState {
            mode,
            context,
            bound_defs: Vec::new(),
            free_constants: Vec::new(),
            side_conditions: Vec::new(),
        }
    }

    fn violation(&self, what: String) -> BridgeError {
        BridgeError::SandboxViolation {
            context: format!("{} of {}", self.mode, self.context),
            what,
        }
    }

    pub fn add_free_constant(&mut self, name: String, encoding: Encoding) -> Result<()> {
        if self.mode == SandboxMode::FunctionBody {
            return Err(self.violation(format!("fresh constant `{}`", name)));
        }
        self.free_constants.push((name, encoding));
        Ok(())
    }

    pub fn add_side_condition(&mut self, cond: T) -> Result<()>
    where
        T: fmt::Display,
    {
        if self.mode == SandboxMode::FunctionBody {
            return Err(self.violation(format!("side condition {}", cond)));
        }
        self.side_conditions.push(cond);
        Ok(())
    }

    pub fn finish(self, result: SolverTerm<T>) -> SandboxResult<T> {
        SandboxResult {
            result,
            bound_defs: self.bound_defs,
            free_constants: self.free_constants,
            side_conditions: self.side_conditions,
        }
    }
}

/// Everything a sandboxed compilation produced, for the caller to fold into
/// a single term.
#[derive(Debug)]
pub struct SandboxResult<T> {
    pub result: SolverTerm<T>,
    /// Sequential `let` bindings, in dependency order.
    pub bound_defs: Vec<(String, T)>,
    pub free_constants: Vec<(String, Encoding)>,
    pub side_conditions: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_body_rejects_fresh_constants() {
        let mut state: SandboxState<String> =
            SandboxState::new(SandboxMode::FunctionBody, "`f`".to_string());
        let err = state
            .add_free_constant("q!1".to_string(), Encoding::Int)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "sandbox violation while compiling function body of `f`: fresh constant `q!1`"
        );
        assert!(state
            .add_side_condition("(>= q!1 0)".to_string())
            .is_err());
    }

    #[test]
    fn test_quantifier_collects_effects() {
        let mut state: SandboxState<String> =
            SandboxState::new(SandboxMode::Quantifier, "forall".to_string());
        state
            .add_free_constant("k!2".to_string(), Encoding::Int)
            .unwrap();
        state.add_side_condition("(<= k!2 x)".to_string()).unwrap();
        let result = state.finish(SolverTerm::named(Encoding::Bool, "b".to_string()));
        assert_eq!(result.free_constants.len(), 1);
        assert_eq!(result.side_conditions, vec!["(<= k!2 x)".to_string()]);
    }
}
