// SPDX-License-Identifier: Apache-2.0

//! Capability profiles describing which theories and features a solver
//! connection's backend supports.
//!
//! A profile is fixed when the connection is opened. The presets below mirror
//! the command-line configurations commonly used for each solver; callers can
//! start from a preset and adjust it with [`Capabilities::with`] /
//! [`Capabilities::without`] or through a [`crate::config::DriverConfig`].

use bitflags::bitflags;

use crate::error::{BridgeError, Result, Theory};
use crate::expr::ProgramLoc;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProblemFeatures: u32 {
        /// Integer (and natural) sorts.
        const INTEGERS = 1 << 0;
        /// Linear arithmetic over integers and reals.
        const LINEAR_ARITHMETIC = 1 << 1;
        /// Multiplication/division of two non-literal terms.
        const NONLINEAR_ARITHMETIC = 1 << 2;
        /// Irrational real results (e.g. square roots of non-squares).
        const COMPUTABLE_REALS = 1 << 3;
        /// Struct (tuple) sorts.
        const STRUCTS = 1 << 4;
        /// Native theory arrays.
        const ARRAYS = 1 << 5;
        const QUANTIFIERS = 1 << 6;
        /// Named definitions of constants and functions.
        const DEFINED_FUNCTIONS = 1 << 7;
        /// Function-typed values as arguments and results.
        const FUNCTION_ARGUMENTS = 1 << 8;
        /// Native constant-array construction.
        const CONST_ARRAYS = 1 << 9;
        /// Native point update of a function.
        const FUNCTION_UPDATE = 1 << 10;
        /// Anonymous function (lambda) terms.
        const LAMBDAS = 1 << 11;
    }
}

impl ProblemFeatures {
    /// Every flag paired with the name used in configuration files.
    pub const NAMED: [(&'static str, ProblemFeatures); 12] = [
        ("integers", ProblemFeatures::INTEGERS),
        ("linear_arithmetic", ProblemFeatures::LINEAR_ARITHMETIC),
        ("nonlinear_arithmetic", ProblemFeatures::NONLINEAR_ARITHMETIC),
        ("computable_reals", ProblemFeatures::COMPUTABLE_REALS),
        ("structs", ProblemFeatures::STRUCTS),
        ("arrays", ProblemFeatures::ARRAYS),
        ("quantifiers", ProblemFeatures::QUANTIFIERS),
        ("defined_functions", ProblemFeatures::DEFINED_FUNCTIONS),
        ("function_arguments", ProblemFeatures::FUNCTION_ARGUMENTS),
        ("const_arrays", ProblemFeatures::CONST_ARRAYS),
        ("function_update", ProblemFeatures::FUNCTION_UPDATE),
        ("lambdas", ProblemFeatures::LAMBDAS),
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    backend_name: String,
    features: ProblemFeatures,
}

impl Capabilities {
    pub fn new(backend_name: &str, features: ProblemFeatures) -> Self {
        Capabilities {
            backend_name: backend_name.to_string(),
            features,
        }
    }

    /// Z3 through the SMT-LIB 2 backend.
    pub fn z3() -> Self {
        Self::new(
            "z3",
            ProblemFeatures::INTEGERS
                | ProblemFeatures::LINEAR_ARITHMETIC
                | ProblemFeatures::NONLINEAR_ARITHMETIC
                | ProblemFeatures::STRUCTS
                | ProblemFeatures::ARRAYS
                | ProblemFeatures::QUANTIFIERS
                | ProblemFeatures::DEFINED_FUNCTIONS
                | ProblemFeatures::CONST_ARRAYS,
        )
    }

    /// CVC5 through the SMT-LIB 2 backend.
    pub fn cvc5() -> Self {
        Self::new(
            "cvc5",
            ProblemFeatures::INTEGERS
                | ProblemFeatures::LINEAR_ARITHMETIC
                | ProblemFeatures::NONLINEAR_ARITHMETIC
                | ProblemFeatures::COMPUTABLE_REALS
                | ProblemFeatures::STRUCTS
                | ProblemFeatures::ARRAYS
                | ProblemFeatures::QUANTIFIERS
                | ProblemFeatures::DEFINED_FUNCTIONS
                | ProblemFeatures::CONST_ARRAYS,
        )
    }

    /// Yices through its native language: arrays are functions, structs are
    /// tuples.
    pub fn yices() -> Self {
        Self::new(
            "yices",
            ProblemFeatures::INTEGERS
                | ProblemFeatures::LINEAR_ARITHMETIC
                | ProblemFeatures::STRUCTS
                | ProblemFeatures::QUANTIFIERS
                | ProblemFeatures::DEFINED_FUNCTIONS
                | ProblemFeatures::FUNCTION_ARGUMENTS
                | ProblemFeatures::FUNCTION_UPDATE
                | ProblemFeatures::LAMBDAS,
        )
    }

    /// A bit-vector-only SMT-LIB 2 solver (e.g. Boolector, Bitwuzla without
    /// arrays).
    pub fn smtlib2_minimal() -> Self {
        Self::new("smtlib2", ProblemFeatures::DEFINED_FUNCTIONS)
    }

    pub fn with(mut self, features: ProblemFeatures) -> Self {
        self.features |= features;
        self
    }

    pub fn without(mut self, features: ProblemFeatures) -> Self {
        self.features &= !features;
        self
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn features(&self) -> ProblemFeatures {
        self.features
    }

    pub fn supports(&self, features: ProblemFeatures) -> bool {
        self.features.contains(features)
    }

    /// Fails with `UnsupportedTheory` unless every flag in `features` is set.
    pub fn require(
        &self,
        features: ProblemFeatures,
        theory: Theory,
        construct: &str,
        loc: Option<&ProgramLoc>,
    ) -> Result<()> {
        if self.supports(features) {
            Ok(())
        } else {
            Err(BridgeError::unsupported(
                &self.backend_name,
                theory,
                construct,
                loc,
            ))
        }
    }
}

impl std::fmt::Display for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.backend_name)?;
        for (name, flag) in ProblemFeatures::NAMED.iter() {
            if self.features.contains(*flag) {
                write!(f, " {}", name)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_differ_in_array_strategy() {
        assert!(Capabilities::z3().supports(ProblemFeatures::ARRAYS));
        assert!(!Capabilities::yices().supports(ProblemFeatures::ARRAYS));
        assert!(Capabilities::yices().supports(ProblemFeatures::FUNCTION_UPDATE));
    }

    #[test]
    fn test_require_reports_backend_and_theory() {
        let caps = Capabilities::smtlib2_minimal();
        let err = caps
            .require(
                ProblemFeatures::QUANTIFIERS,
                Theory::Quantifiers,
                "forall",
                None,
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "smtlib2 does not support quantifiers: forall");
    }

    #[test]
    fn test_with_and_without() {
        let caps = Capabilities::z3()
            .without(ProblemFeatures::STRUCTS)
            .with(ProblemFeatures::LAMBDAS);
        assert!(!caps.supports(ProblemFeatures::STRUCTS));
        assert!(caps.supports(ProblemFeatures::LAMBDAS | ProblemFeatures::ARRAYS));
        assert!(caps.to_string().starts_with("z3: integers"));
    }
}
