// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use thiserror::Error;

use crate::expr::ProgramLoc;

/// A solver theory or feature that a capability profile may lack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Theory {
    Integers,
    LinearArithmetic,
    NonlinearArithmetic,
    ComputableReals,
    Complex,
    Arrays,
    Structs,
    Quantifiers,
    DefinedFunctions,
    FunctionArguments,
    ConstantArrays,
    Lambdas,
}

impl fmt::Display for Theory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Theory::Integers => "integer arithmetic",
            Theory::LinearArithmetic => "linear arithmetic",
            Theory::NonlinearArithmetic => "nonlinear arithmetic",
            Theory::ComputableReals => "computable reals",
            Theory::Complex => "complex numbers",
            Theory::Arrays => "arrays",
            Theory::Structs => "structs",
            Theory::Quantifiers => "quantifiers",
            Theory::DefinedFunctions => "defined functions",
            Theory::FunctionArguments => "function-valued arguments",
            Theory::ConstantArrays => "constant arrays",
            Theory::Lambdas => "lambda terms",
        };
        write!(f, "{}", s)
    }
}

fn fmt_loc(loc: &Option<ProgramLoc>) -> String {
    match loc {
        Some(loc) => format!(" (at {})", loc),
        None => String::new(),
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{backend} does not support {theory}: {construct}{}", fmt_loc(.loc))]
    UnsupportedTheory {
        backend: String,
        theory: Theory,
        construct: String,
        loc: Option<ProgramLoc>,
    },

    #[error("encoding mismatch for `{symbol}`: expected {expected}, found {actual}")]
    EncodingMismatch {
        symbol: String,
        expected: String,
        actual: String,
    },

    #[error("scope underflow: cannot pop a scope stack of depth {depth}")]
    ScopeUnderflow { depth: usize },

    #[error("sandbox violation while compiling {context}: {what}")]
    SandboxViolation { context: String, what: String },

    #[error("bound variable `{name}` is not in scope")]
    UnboundVariable { name: String },

    #[error("could not decode model value for `{term}`: {reason}")]
    ModelDecode { term: String, reason: String },

    #[error("expression {expr} was never compiled on this connection")]
    NotCompiled { expr: String },

    #[error("ill-typed {operation}: {detail}")]
    IllTyped { operation: String, detail: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    pub fn unsupported(
        backend: &str,
        theory: Theory,
        construct: impl Into<String>,
        loc: Option<&ProgramLoc>,
    ) -> Self {
        BridgeError::UnsupportedTheory {
            backend: backend.to_string(),
            theory,
            construct: construct.into(),
            loc: loc.cloned(),
        }
    }

    pub fn mismatch(
        symbol: impl Into<String>,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        BridgeError::EncodingMismatch {
            symbol: symbol.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Returns the theory named by an `UnsupportedTheory` error.
    pub fn theory(&self) -> Option<Theory> {
        match self {
            BridgeError::UnsupportedTheory { theory, .. } => Some(*theory),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_theory_message_names_location() {
        let loc = ProgramLoc::new("main.c", 12, 4);
        let e = BridgeError::unsupported("yices", Theory::Complex, "complex literal", Some(&loc));
        assert_eq!(
            e.to_string(),
            "yices does not support complex numbers: complex literal (at main.c:12:4)"
        );
        assert_eq!(e.theory(), Some(Theory::Complex));
    }

    #[test]
    fn test_scope_underflow_message() {
        let e = BridgeError::ScopeUnderflow { depth: 1 };
        assert_eq!(
            e.to_string(),
            "scope underflow: cannot pop a scope stack of depth 1"
        );
        assert_eq!(e.theory(), None);
    }
}
