// SPDX-License-Identifier: Apache-2.0

//! Arithmetic, including the partial operators.
//!
//! A partial operator yields a fresh constant whose meaning is given by side
//! conditions. Where the operation is undefined (division by zero, square
//! root of a negative number) the constant is left unconstrained.

use std::io::Write;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use crate::capabilities::ProblemFeatures;
use crate::connection::Connection;
use crate::encoding::{check_encoding, Encoding};
use crate::error::{BridgeError, Result, Theory};
use crate::expr::{BaseType, Literal, ProgramLoc};
use crate::term_algebra::{SolverTerm, TermAlgebra};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DivOp {
    NatDiv,
    NatMod,
    IntDiv,
    IntMod,
}

impl DivOp {
    fn is_nat(self) -> bool {
        matches!(self, DivOp::NatDiv | DivOp::NatMod)
    }

    fn is_mod(self) -> bool {
        matches!(self, DivOp::NatMod | DivOp::IntMod)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rounding {
    Floor,
    Ceiling,
    /// Ties round away from zero.
    NearestAwayFromZero,
}

/// Exact square root of a non-negative rational, if it is rational.
pub(crate) fn rational_sqrt(value: &BigRational) -> Option<BigRational> {
    if value.is_negative() {
        return None;
    }
    let numer = value.numer().sqrt();
    let denom = value.denom().sqrt();
    if &(&numer * &numer) == value.numer() && &(&denom * &denom) == value.denom() {
        Some(BigRational::new(numer, denom))
    } else {
        None
    }
}

fn literal_int(lit: Option<&Literal>) -> Option<BigInt> {
    match lit {
        Some(Literal::Int(i)) => Some(i.clone()),
        Some(Literal::Nat(n)) => Some(BigInt::from(n.clone())),
        _ => None,
    }
}

impl<B: TermAlgebra, W: Write> Connection<B, W> {
    pub(super) fn compile_mul(
        &mut self,
        a: &SolverTerm<B::Term>,
        b: &SolverTerm<B::Term>,
        has_literal_factor: bool,
        enc: Encoding,
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        check_encoding("mul", &a.encoding, &b.encoding)?;
        if !has_literal_factor {
            self.require(
                ProblemFeatures::NONLINEAR_ARITHMETIC,
                Theory::NonlinearArithmetic,
                "product of two non-literal terms",
                loc,
            )?;
        }
        let t = self.backend().mul(&self.term_of(a), &self.term_of(b));
        self.bind_term("t", enc, t)
    }

    pub(super) fn compile_abs(
        &mut self,
        a: &SolverTerm<B::Term>,
        ty: &BaseType,
        enc: Encoding,
    ) -> Result<SolverTerm<B::Term>> {
        let b = self.backend();
        let x = self.term_of(a);
        let zero = match ty {
            BaseType::Real => b.real_const(0),
            _ => b.int_const(0),
        };
        let t = b.ite(&b.ge(&x, &zero), &x, &b.neg(&x));
        self.bind_term("t", enc, t)
    }

    /// `x div y` / `x mod y` via fresh `q`, `r` with
    /// `y == 0 \/ x == y*q + r`, `0 <= r` and `y == 0 \/ r < |y|`.
    /// Natural division additionally constrains `q >= 0`.
    pub(super) fn compile_division(
        &mut self,
        op: DivOp,
        x: &SolverTerm<B::Term>,
        y: &SolverTerm<B::Term>,
        divisor: Option<&Literal>,
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        check_encoding("division", &x.encoding, &y.encoding)?;
        let divisor = literal_int(divisor);
        if divisor.is_none() {
            self.require(
                ProblemFeatures::NONLINEAR_ARITHMETIC,
                Theory::NonlinearArithmetic,
                "division by a non-literal divisor",
                loc,
            )?;
        }
        let q = self.fresh_constant("q", Encoding::Int)?;
        let r = self.fresh_constant("r", Encoding::Int)?;
        let (xt, yt, qt, rt) = (
            self.term_of(x),
            self.term_of(y),
            self.term_of(&q),
            self.term_of(&r),
        );
        let b = self.backend();
        let zero = b.int_const(0);
        let y_is_zero = b.eq(&yt, &zero);
        let magnitude = if op.is_nat() {
            yt.clone()
        } else {
            match &divisor {
                Some(d) => b.int_lit(&d.abs()),
                None => b.ite(&b.ge(&yt, &zero), &yt, &b.neg(&yt)),
            }
        };
        let mut conditions = vec![
            b.or(&[
                b.eq(&xt, &b.add(&[b.mul(&yt, &qt), rt.clone()])),
                y_is_zero.clone(),
            ]),
            b.le(&zero, &rt),
            b.or(&[b.lt(&rt, &magnitude), y_is_zero]),
        ];
        if op.is_nat() {
            conditions.push(b.ge(&qt, &zero));
        }
        for cond in conditions {
            self.side_condition(cond, loc)?;
        }
        Ok(if op.is_mod() { r } else { q })
    }

    pub(super) fn compile_real_div(
        &mut self,
        x: &SolverTerm<B::Term>,
        y: &SolverTerm<B::Term>,
        divisor: Option<&Literal>,
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        check_encoding("real division", &x.encoding, &y.encoding)?;
        match divisor {
            Some(Literal::Real(d)) if d.is_zero() => self.fresh_constant("q", Encoding::Real),
            Some(_) => {
                let t = self
                    .backend()
                    .real_div(&self.term_of(x), &self.term_of(y));
                self.bind_term("t", Encoding::Real, t)
            }
            None => {
                self.require(
                    ProblemFeatures::NONLINEAR_ARITHMETIC,
                    Theory::NonlinearArithmetic,
                    "division by a non-literal divisor",
                    loc,
                )?;
                let q = self.fresh_constant("q", Encoding::Real)?;
                let (xt, yt, qt) = (self.term_of(x), self.term_of(y), self.term_of(&q));
                let b = self.backend();
                let cond = b.or(&[
                    b.eq(&yt, &b.real_const(0)),
                    b.eq(&b.mul(&yt, &qt), &xt),
                ]);
                self.side_condition(cond, loc)?;
                Ok(q)
            }
        }
    }

    pub(super) fn compile_sqrt(
        &mut self,
        x: &SolverTerm<B::Term>,
        radicand: Option<&Literal>,
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        if let Some(Literal::Real(v)) = radicand {
            if v.is_negative() {
                return self.fresh_constant("sqrt", Encoding::Real);
            }
            if let Some(root) = rational_sqrt(v) {
                let t = self.backend().real_lit(&root);
                return Ok(SolverTerm::inline(Encoding::Real, t));
            }
            self.require(
                ProblemFeatures::COMPUTABLE_REALS,
                Theory::ComputableReals,
                &format!("square root of {}", v),
                loc,
            )?;
        } else {
            self.require(
                ProblemFeatures::NONLINEAR_ARITHMETIC,
                Theory::NonlinearArithmetic,
                "square root of a non-literal",
                loc,
            )?;
        }
        let r = self.fresh_constant("sqrt", Encoding::Real)?;
        let (xt, rt) = (self.term_of(x), self.term_of(&r));
        let b = self.backend();
        let zero = b.real_const(0);
        let root = b.and(&[b.ge(&rt, &zero), b.eq(&b.mul(&rt, &rt), &xt)]);
        let cond = if radicand.is_some() {
            root
        } else {
            b.or(&[b.lt(&xt, &zero), root])
        };
        self.side_condition(cond, loc)?;
        Ok(r)
    }

    /// Rounds `x` to a fresh integer `k`; floor asserts
    /// `k <= x` and `x < k + 1`.
    pub(super) fn compile_rounding(
        &mut self,
        mode: Rounding,
        x: &SolverTerm<B::Term>,
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        check_encoding("rounding", &Encoding::Real, &x.encoding)?;
        let k = self.fresh_constant("k", Encoding::Int)?;
        let (xt, kt) = (self.term_of(x), self.term_of(&k));
        let b = self.backend();
        let kr = b.int_to_real(&kt);
        let one = b.real_const(1);
        let k_plus_one = b.add(&[kr.clone(), one.clone()]);
        let k_minus_one = b.sub(&kr, &one);
        let conditions = match mode {
            Rounding::Floor => vec![b.le(&kr, &xt), b.lt(&xt, &k_plus_one)],
            Rounding::Ceiling => vec![b.lt(&k_minus_one, &xt), b.le(&xt, &kr)],
            Rounding::NearestAwayFromZero => {
                let half = b.real_lit(&BigRational::new(BigInt::one(), BigInt::from(2)));
                let up = b.add(&[xt.clone(), half.clone()]);
                let down = b.sub(&xt, &half);
                let non_negative = b.ge(&xt, &b.real_const(0));
                vec![
                    b.or(&[
                        b.not(&non_negative),
                        b.and(&[b.le(&kr, &up), b.lt(&up, &k_plus_one)]),
                    ]),
                    b.or(&[
                        non_negative,
                        b.and(&[b.lt(&k_minus_one, &down), b.le(&down, &kr)]),
                    ]),
                ]
            }
        };
        for cond in conditions {
            self.side_condition(cond, loc)?;
        }
        Ok(k)
    }

    /// Sum-of-bits value of a bit-vector term. In the signed reading the
    /// most significant bit weighs `-2^(w-1)`.
    pub(super) fn bv_to_int_term(&self, x: &B::Term, width: usize, signed: bool) -> B::Term {
        let b = self.backend();
        let one_bit = b.bv_lit(1, &num_bigint::BigUint::one());
        let zero = b.int_const(0);
        let bits: Vec<B::Term> = (0..width)
            .map(|i| {
                let mut weight = BigInt::one() << i;
                if signed && i + 1 == width {
                    weight = -weight;
                }
                let set = b.eq(&b.bv_extract(x, i, i), &one_bit);
                b.ite(&set, &b.int_lit(&weight), &zero)
            })
            .collect();
        b.add(&bits)
    }

    /// Wrap-around conversion: fresh `v` and `q` with `x == 2^w * q + unsigned(v)`.
    pub(super) fn compile_int_to_bv(
        &mut self,
        x: &SolverTerm<B::Term>,
        width: usize,
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        if x.encoding != Encoding::Int {
            return Err(BridgeError::mismatch("int_to_bv", Encoding::Int, &x.encoding));
        }
        let v = self.fresh_constant("bv", Encoding::BitVec(width))?;
        let q = self.fresh_constant("q", Encoding::Int)?;
        let (xt, vt, qt) = (self.term_of(x), self.term_of(&v), self.term_of(&q));
        let unsigned = self.bv_to_int_term(&vt, width, false);
        let b = self.backend();
        let modulus = b.int_lit(&(BigInt::one() << width));
        let cond = b.eq(&xt, &b.add(&[b.mul(&modulus, &qt), unsigned]));
        self.side_condition(cond, loc)?;
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SmtLib2;
    use crate::capabilities::Capabilities;
    use crate::connection::SymbolBindings;
    use crate::expr::{App, ExprBuilder};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn open(caps: Capabilities) -> Connection<SmtLib2, Vec<u8>> {
        Connection::open(Vec::new(), SmtLib2::new(), caps, SymbolBindings::new()).unwrap()
    }

    fn lines(conn: &Connection<SmtLib2, Vec<u8>>) -> Vec<String> {
        String::from_utf8(conn.sink().clone())
            .unwrap()
            .lines()
            .skip(2)
            .map(|l| l.to_string())
            .collect()
    }

    #[test_case(9, 4, Some((3, 2)); "perfect square")]
    #[test_case(2, 1, None; "irrational")]
    #[test_case(-4, 1, None; "negative")]
    fn test_rational_sqrt(n: i64, d: i64, expected: Option<(i64, i64)>) {
        let v = BigRational::new(BigInt::from(n), BigInt::from(d));
        let want = expected.map(|(a, b)| BigRational::new(BigInt::from(a), BigInt::from(b)));
        assert_eq!(rational_sqrt(&v), want);
    }

    #[test]
    fn test_floor_side_conditions() {
        let mut conn = open(Capabilities::z3());
        let b = ExprBuilder::new();
        let x = b.free_var("x", BaseType::Real);
        let fl = b.app(App::Floor(x)).unwrap();
        let k = conn.compile(&fl).unwrap();
        assert_eq!(k.name(), Some("k!0"));
        assert_eq!(
            lines(&conn),
            vec![
                "(declare-fun x () Real)",
                "(declare-fun k!0 () Int)",
                "(assert (<= (to_real k!0) x))",
                "(assert (< x (+ (to_real k!0) 1.0)))",
            ]
        );
    }

    #[test]
    fn test_nonlinear_division_requires_capability() {
        let caps = Capabilities::z3().without(ProblemFeatures::NONLINEAR_ARITHMETIC);
        let mut conn = open(caps);
        let b = ExprBuilder::new();
        let x = b.free_var("x", BaseType::Integer);
        let y = b.free_var("y", BaseType::Integer);
        let d = b.app(App::IntDiv(x.clone(), y)).unwrap();
        let err = conn.compile(&d).unwrap_err();
        assert_eq!(err.theory(), Some(Theory::NonlinearArithmetic));
        // A literal divisor keeps the problem linear.
        let two = b.literal(Literal::int(-2));
        let d = b.app(App::IntDiv(x, two)).unwrap();
        conn.compile(&d).unwrap();
        let text = lines(&conn).join("\n");
        assert!(text.contains("(assert (or (< r!1 2) (= (- 2) 0)))"));
    }

    #[test]
    fn test_sqrt_of_square_literal_folds() {
        let mut conn = open(Capabilities::z3());
        let b = ExprBuilder::new();
        let lit = b.literal(Literal::real(9, 4));
        let s = b.app(App::Sqrt(lit)).unwrap();
        let t = conn.compile(&s).unwrap();
        assert_eq!(t.term(conn.backend()), "(/ 3.0 2.0)");
        let two = b.literal(Literal::real(2, 1));
        let s = b.app(App::Sqrt(two)).unwrap();
        let err = conn.compile(&s).unwrap_err();
        assert_eq!(err.theory(), Some(Theory::ComputableReals));
    }
}
