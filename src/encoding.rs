// SPDX-License-Identifier: Apache-2.0

//! Selection of the concrete solver-level representation of each base type.
//!
//! The native encoding is always preferred. Fallbacks are gated on the
//! capability profile:
//!
//! - complex numbers become a struct of two reals, else an array from bool
//!   (`false` is the real part, `true` the imaginary part) to real;
//! - arrays become native theory arrays, else functions from the index
//!   sorts to the element sort.

use std::fmt;

use crate::capabilities::{Capabilities, ProblemFeatures};
use crate::error::{BridgeError, Result, Theory};
use crate::expr::{BaseType, ProgramLoc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayRepr {
    /// A value of the solver's array theory.
    Native,
    /// A function symbol (or lambda term) over the index sorts.
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Encoding {
    Bool,
    BitVec(usize),
    /// Naturals share the integer encoding; their non-negativity is a side
    /// condition.
    Int,
    Real,
    ComplexStruct,
    ComplexArray,
    Array {
        index: Vec<Encoding>,
        element: Box<Encoding>,
        repr: ArrayRepr,
    },
    Struct(Vec<Encoding>),
}

impl Encoding {
    pub fn is_function_array(&self) -> bool {
        matches!(
            self,
            Encoding::Array {
                repr: ArrayRepr::Function,
                ..
            }
        )
    }

    /// Index and element encodings of an array encoding.
    pub fn array_parts(&self) -> Option<(&[Encoding], &Encoding)> {
        match self {
            Encoding::Array { index, element, .. } => Some((index, element)),
            _ => None,
        }
    }

    /// Arity of every struct sort this encoding mentions, including the
    /// struct used as the index of a multi-index native array.
    pub fn struct_arities(&self, out: &mut Vec<usize>) {
        match self {
            Encoding::ComplexStruct => out.push(2),
            Encoding::Struct(fields) => {
                out.push(fields.len());
                for f in fields {
                    f.struct_arities(out);
                }
            }
            Encoding::Array {
                index,
                element,
                repr,
            } => {
                if *repr == ArrayRepr::Native && index.len() > 1 {
                    out.push(index.len());
                }
                for i in index {
                    i.struct_arities(out);
                }
                element.struct_arities(out);
            }
            Encoding::Bool
            | Encoding::BitVec(_)
            | Encoding::Int
            | Encoding::Real
            | Encoding::ComplexArray => {}
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Bool => write!(f, "bool"),
            Encoding::BitVec(w) => write!(f, "bv{}", w),
            Encoding::Int => write!(f, "int"),
            Encoding::Real => write!(f, "real"),
            Encoding::ComplexStruct => write!(f, "complex-as-struct"),
            Encoding::ComplexArray => write!(f, "complex-as-array"),
            Encoding::Array {
                index,
                element,
                repr,
            } => {
                let kind = match repr {
                    ArrayRepr::Native => "array",
                    ArrayRepr::Function => "fn",
                };
                write!(f, "{}[", kind)?;
                for (i, e) in index.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, " -> {}]", element)
            }
            Encoding::Struct(fields) => {
                write!(f, "struct(")?;
                for (i, e) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Picks the encoding of `ty` under `caps`.
pub fn choose_encoding(
    ty: &BaseType,
    caps: &Capabilities,
    loc: Option<&ProgramLoc>,
) -> Result<Encoding> {
    choose(ty, caps, loc, false)
}

/// Like [`choose_encoding`], restricted to encodings that may appear as
/// function arguments and results, struct fields, array elements and
/// quantified variables. Function-encoded arrays are only legal there when
/// the backend accepts function-valued arguments.
pub fn choose_fn_arg_encoding(
    ty: &BaseType,
    caps: &Capabilities,
    loc: Option<&ProgramLoc>,
) -> Result<Encoding> {
    choose(ty, caps, loc, true)
}

fn choose(
    ty: &BaseType,
    caps: &Capabilities,
    loc: Option<&ProgramLoc>,
    as_argument: bool,
) -> Result<Encoding> {
    match ty {
        BaseType::Bool => Ok(Encoding::Bool),
        BaseType::BitVec(w) => {
            ty.check_well_formed()?;
            Ok(Encoding::BitVec(*w))
        }
        BaseType::Nat | BaseType::Integer => {
            caps.require(
                ProblemFeatures::INTEGERS,
                Theory::Integers,
                &format!("{} value", ty),
                loc,
            )?;
            Ok(Encoding::Int)
        }
        BaseType::Real => {
            caps.require(
                ProblemFeatures::LINEAR_ARITHMETIC,
                Theory::LinearArithmetic,
                "real value",
                loc,
            )?;
            Ok(Encoding::Real)
        }
        BaseType::Complex => {
            caps.require(
                ProblemFeatures::LINEAR_ARITHMETIC,
                Theory::LinearArithmetic,
                "complex value",
                loc,
            )?;
            if caps.supports(ProblemFeatures::STRUCTS) {
                Ok(Encoding::ComplexStruct)
            } else if caps.supports(ProblemFeatures::ARRAYS) {
                log::debug!(
                    "{}: encoding complex numbers as arrays from bool to real",
                    caps.backend_name()
                );
                Ok(Encoding::ComplexArray)
            } else {
                Err(BridgeError::unsupported(
                    caps.backend_name(),
                    Theory::Complex,
                    "complex value requires structs or arrays",
                    loc,
                ))
            }
        }
        BaseType::Struct(fields) => {
            caps.require(
                ProblemFeatures::STRUCTS,
                Theory::Structs,
                &format!("{} value", ty),
                loc,
            )?;
            let fields = fields
                .iter()
                .map(|f| choose(f, caps, loc, true))
                .collect::<Result<Vec<_>>>()?;
            Ok(Encoding::Struct(fields))
        }
        BaseType::Array { index, element } => {
            let index_encs = index
                .iter()
                .map(|i| choose(i, caps, loc, true))
                .collect::<Result<Vec<_>>>()?;
            let element_enc = choose(element, caps, loc, true)?;
            let native_ok = caps.supports(ProblemFeatures::ARRAYS)
                && (index.len() == 1 || caps.supports(ProblemFeatures::STRUCTS));
            let repr = if native_ok {
                ArrayRepr::Native
            } else if caps.supports(ProblemFeatures::DEFINED_FUNCTIONS) {
                if as_argument && !caps.supports(ProblemFeatures::FUNCTION_ARGUMENTS) {
                    return Err(BridgeError::unsupported(
                        caps.backend_name(),
                        Theory::FunctionArguments,
                        format!("{} encoded as a function in argument position", ty),
                        loc,
                    ));
                }
                log::debug!(
                    "{}: encoding {} as a function",
                    caps.backend_name(),
                    ty
                );
                ArrayRepr::Function
            } else {
                return Err(BridgeError::unsupported(
                    caps.backend_name(),
                    Theory::Arrays,
                    format!("{} value", ty),
                    loc,
                ));
            };
            Ok(Encoding::Array {
                index: index_encs,
                element: Box::new(element_enc),
                repr,
            })
        }
    }
}

/// Fails with `EncodingMismatch` unless `actual` is exactly `expected`.
pub fn check_encoding(symbol: &str, expected: &Encoding, actual: &Encoding) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(BridgeError::mismatch(symbol, expected, actual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn int_array() -> BaseType {
        BaseType::new_array(vec![BaseType::Integer], BaseType::Integer)
    }

    #[test]
    fn test_complex_prefers_struct() {
        let enc = choose_encoding(&BaseType::Complex, &Capabilities::z3(), None).unwrap();
        assert_eq!(enc, Encoding::ComplexStruct);
    }

    #[test]
    fn test_complex_falls_back_to_array() {
        let caps = Capabilities::z3().without(ProblemFeatures::STRUCTS);
        let enc = choose_encoding(&BaseType::Complex, &caps, None).unwrap();
        assert_eq!(enc, Encoding::ComplexArray);
    }

    #[test]
    fn test_complex_without_structs_or_arrays_names_complex() {
        let caps = Capabilities::z3().without(ProblemFeatures::STRUCTS | ProblemFeatures::ARRAYS);
        let loc = ProgramLoc::new("f.c", 3, 9);
        let err = choose_encoding(&BaseType::Complex, &caps, Some(&loc)).unwrap_err();
        assert_eq!(err.theory(), Some(Theory::Complex));
        assert!(err.to_string().contains("complex"));
        assert!(err.to_string().ends_with("(at f.c:3:9)"));
    }

    #[test]
    fn test_array_as_function_on_yices() {
        let enc = choose_encoding(&int_array(), &Capabilities::yices(), None).unwrap();
        assert!(enc.is_function_array());
        // Yices accepts function-valued arguments.
        assert!(choose_fn_arg_encoding(&int_array(), &Capabilities::yices(), None).is_ok());
    }

    #[test]
    fn test_function_array_rejected_as_argument() {
        let caps = Capabilities::smtlib2_minimal().with(ProblemFeatures::INTEGERS);
        assert!(choose_encoding(&int_array(), &caps, None)
            .unwrap()
            .is_function_array());
        let err = choose_fn_arg_encoding(&int_array(), &caps, None).unwrap_err();
        assert_eq!(err.theory(), Some(Theory::FunctionArguments));
    }

    #[test]
    fn test_multi_index_native_array_declares_index_struct() {
        let ty = BaseType::new_array(vec![BaseType::Integer, BaseType::Bool], BaseType::Real);
        let enc = choose_encoding(&ty, &Capabilities::z3(), None).unwrap();
        let mut arities = Vec::new();
        enc.struct_arities(&mut arities);
        assert_eq!(arities, vec![2]);
    }

    #[test]
    fn test_check_encoding_mismatch() {
        let err = check_encoding("x", &Encoding::Int, &Encoding::Real).unwrap_err();
        assert_eq!(
            err.to_string(),
            "encoding mismatch for `x`: expected int, found real"
        );
    }
}
