// SPDX-License-Identifier: Apache-2.0

//! The combinators every backend supplies. The compiler is written against
//! this trait only; backends are pure term builders and renderers and hold
//! no per-connection state.

use std::fmt;

use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;

use crate::command::Command;
use crate::encoding::Encoding;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BvBinOp {
    Add,
    Sub,
    Mul,
    Udiv,
    Urem,
    Sdiv,
    Srem,
    And,
    Or,
    Xor,
    Shl,
    Lshr,
    Ashr,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BvUnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BvCmp {
    Ult,
    Ule,
    Slt,
    Sle,
}

pub trait TermAlgebra {
    type Term: Clone + fmt::Debug + fmt::Display;

    /// Short backend name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Turns an arbitrary identifier into a legal symbol of this language.
    fn sanitize_symbol(&self, raw: &str) -> String;
    fn sort(&self, encoding: &Encoding) -> String;

    fn symbol(&self, name: &str) -> Self::Term;
    fn bool_lit(&self, value: bool) -> Self::Term;
    fn bv_lit(&self, width: usize, value: &BigUint) -> Self::Term;
    fn int_lit(&self, value: &BigInt) -> Self::Term;
    fn real_lit(&self, value: &BigRational) -> Self::Term;

    fn not(&self, a: &Self::Term) -> Self::Term;
    fn and(&self, xs: &[Self::Term]) -> Self::Term;
    fn or(&self, xs: &[Self::Term]) -> Self::Term;
    fn xor(&self, a: &Self::Term, b: &Self::Term) -> Self::Term;
    fn implies(&self, a: &Self::Term, b: &Self::Term) -> Self::Term;
    fn ite(&self, c: &Self::Term, t: &Self::Term, e: &Self::Term) -> Self::Term;
    fn eq(&self, a: &Self::Term, b: &Self::Term) -> Self::Term;
    fn distinct(&self, xs: &[Self::Term]) -> Self::Term;

    fn le(&self, a: &Self::Term, b: &Self::Term) -> Self::Term;
    fn lt(&self, a: &Self::Term, b: &Self::Term) -> Self::Term;
    fn ge(&self, a: &Self::Term, b: &Self::Term) -> Self::Term {
        self.le(b, a)
    }
    fn add(&self, xs: &[Self::Term]) -> Self::Term;
    fn sub(&self, a: &Self::Term, b: &Self::Term) -> Self::Term;
    fn mul(&self, a: &Self::Term, b: &Self::Term) -> Self::Term;
    fn neg(&self, a: &Self::Term) -> Self::Term;
    fn real_div(&self, a: &Self::Term, b: &Self::Term) -> Self::Term;
    fn int_to_real(&self, a: &Self::Term) -> Self::Term;

    fn bv_binop(&self, op: BvBinOp, a: &Self::Term, b: &Self::Term) -> Self::Term;
    fn bv_unop(&self, op: BvUnOp, a: &Self::Term) -> Self::Term;
    fn bv_cmp(&self, op: BvCmp, a: &Self::Term, b: &Self::Term) -> Self::Term;
    fn bv_extract(&self, a: &Self::Term, high: usize, low: usize) -> Self::Term;
    fn bv_zero_extend(&self, a: &Self::Term, by: usize) -> Self::Term;
    fn bv_sign_extend(&self, a: &Self::Term, by: usize) -> Self::Term;

    fn select(&self, array: &Self::Term, index: &Self::Term) -> Self::Term;
    fn store(&self, array: &Self::Term, index: &Self::Term, value: &Self::Term) -> Self::Term;

    fn mk_struct(&self, fields: &[Self::Term]) -> Self::Term;
    fn struct_field(&self, arity: usize, index: usize, s: &Self::Term) -> Self::Term;

    /// Application of a function term; with no arguments this is `f` itself.
    fn apply(&self, f: &Self::Term, args: &[Self::Term]) -> Self::Term;

    fn forall(&self, vars: &[(String, Encoding)], body: &Self::Term) -> Self::Term;
    fn exists(&self, vars: &[(String, Encoding)], body: &Self::Term) -> Self::Term;
    /// Sequential let: each binding may refer to the ones before it.
    fn let_in(&self, bindings: &[(String, Self::Term)], body: &Self::Term) -> Self::Term;

    /// Native constant array of the given array encoding, if the language
    /// has one. `params` are fresh names, one per index, for languages that
    /// build constant arrays from a binder.
    fn const_array(
        &self,
        _params: &[(String, Encoding)],
        _encoding: &Encoding,
        _value: &Self::Term,
    ) -> Option<Self::Term> {
        None
    }

    /// Native point update of a function-encoded array.
    fn fn_update(
        &self,
        _f: &Self::Term,
        _indices: &[Self::Term],
        _value: &Self::Term,
    ) -> Option<Self::Term> {
        None
    }

    fn lambda(&self, _params: &[(String, Encoding)], _body: &Self::Term) -> Option<Self::Term> {
        None
    }

    /// Lines written when a connection is opened.
    fn preamble(&self) -> Vec<String> {
        Vec::new()
    }

    /// Renders one command; `None` if the command has no textual form in
    /// this language.
    fn render_command(&self, cmd: &Command<Self::Term>) -> Option<String>;

    fn int_const(&self, value: i64) -> Self::Term {
        self.int_lit(&BigInt::from(value))
    }

    fn real_const(&self, value: i64) -> Self::Term {
        self.real_lit(&BigRational::from_integer(BigInt::from(value)))
    }
}

/// How a compiled term is referenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermRepr<T> {
    /// A symbol previously declared or defined (or bound by an enclosing
    /// `let`/quantifier inside a sandbox).
    Name(String),
    /// An expression not bound to any name.
    Inline(T),
}

/// A compiled value tagged with its encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverTerm<T> {
    pub encoding: Encoding,
    pub repr: TermRepr<T>,
}

impl<T: Clone> SolverTerm<T> {
    pub fn named(encoding: Encoding, name: String) -> Self {
        SolverTerm {
            encoding,
            repr: TermRepr::Name(name),
        }
    }

    pub fn inline(encoding: Encoding, term: T) -> Self {
        SolverTerm {
            encoding,
            repr: TermRepr::Inline(term),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match &self.repr {
            TermRepr::Name(n) => Some(n),
            TermRepr::Inline(_) => None,
        }
    }

    /// The term as the backend sees it.
    pub fn term<B: TermAlgebra<Term = T>>(&self, backend: &B) -> T {
        match &self.repr {
            TermRepr::Name(n) => backend.symbol(n),
            TermRepr::Inline(t) => t.clone(),
        }
    }
}
