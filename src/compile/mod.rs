// SPDX-License-Identifier: Apache-2.0

//! Translation of expression-graph nodes into solver terms.
//!
//! Compilation is memoized by node identity through the connection's frame
//! stack. Literals stay inline; every other node is bound to a fresh name
//! (a definition when live, a `let` binding inside a sandbox) so shared
//! subgraphs are emitted once. Partial operators introduce fresh result
//! constants constrained by side conditions; see [`arith`].

use std::io::Write;
use std::rc::Rc;

use num_bigint::BigInt;

use crate::capabilities::ProblemFeatures;
use crate::connection::{CacheLifetime, Connection};
use crate::encoding::{check_encoding, choose_encoding, Encoding};
use crate::error::{BridgeError, Result, Theory};
use crate::expr::{App, BaseType, BoundVar, ExprKind, ExprRef, Literal, ProgramLoc, VarKind};
use crate::term_algebra::{BvBinOp, BvCmp, BvUnOp, SolverTerm, TermAlgebra};

mod arith;
mod containers;
mod functions;

pub(crate) use arith::{rational_sqrt, DivOp, Rounding};

/// Literal operand `i` of `app`, if that operand is a literal node.
fn literal_operand(app: &App<ExprRef>, i: usize) -> Option<&Literal> {
    app.operands().get(i).and_then(|e| e.as_literal())
}

impl<B: TermAlgebra, W: Write> Connection<B, W> {
    /// Compiles `expr` and returns its term, reusing the term cached for
    /// the same node if one is visible.
    pub fn compile(&mut self, expr: &ExprRef) -> Result<SolverTerm<B::Term>> {
        if let Some(t) = self.lookup_cache(expr.id) {
            return Ok(t.clone());
        }
        let loc = expr.loc.as_ref();
        let term = match &expr.kind {
            ExprKind::Var(var) => return self.compile_var(var, loc),
            ExprKind::Literal(lit) => self.compile_literal(lit, loc)?,
            ExprKind::App(app) => {
                log::trace!("compiling {}", expr.describe());
                self.compile_app(&expr.ty, app, loc)?
            }
            ExprKind::Quantifier {
                quantifier,
                var,
                body,
            } => self.compile_quantifier(*quantifier, var, body, loc)?,
            ExprKind::FnApp { func, args } => self.compile_fn_app(func, args, loc)?,
        };
        self.insert_cache(expr.id, term.clone(), CacheLifetime::PopScoped);
        Ok(term)
    }

    /// Compiles a boolean formula and asserts it.
    pub fn compile_and_assert(&mut self, expr: &ExprRef) -> Result<()> {
        let t = self.compile(expr)?;
        check_encoding("assertion", &Encoding::Bool, &t.encoding)?;
        let term = self.term_of(&t);
        self.assert(term, expr.loc.as_ref())
    }

    pub(crate) fn term_of(&self, t: &SolverTerm<B::Term>) -> B::Term {
        t.term(self.backend())
    }

    pub(crate) fn terms_of(&self, ts: &[SolverTerm<B::Term>]) -> Vec<B::Term> {
        ts.iter().map(|t| self.term_of(t)).collect()
    }

    pub(crate) fn encoding_of(&self, ty: &BaseType, loc: Option<&ProgramLoc>) -> Result<Encoding> {
        choose_encoding(ty, self.capabilities(), loc)
    }

    pub(crate) fn require(
        &self,
        features: ProblemFeatures,
        theory: Theory,
        construct: &str,
        loc: Option<&ProgramLoc>,
    ) -> Result<()> {
        self.capabilities()
            .require(features, theory, construct, loc)
    }

    pub(crate) fn compile_literal(
        &mut self,
        lit: &Literal,
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        let enc = self.encoding_of(&lit.base_type(), loc)?;
        let b = self.backend();
        let t = match lit {
            Literal::Bool(v) => b.bool_lit(*v),
            Literal::BitVec { width, value } => b.bv_lit(*width, value),
            Literal::Nat(n) => b.int_lit(&BigInt::from(n.clone())),
            Literal::Int(i) => b.int_lit(i),
            Literal::Real(r) => b.real_lit(r),
            Literal::Complex(re, im) => {
                let (re, im) = (b.real_lit(re), b.real_lit(im));
                return self.make_complex(re, im, loc);
            }
        };
        Ok(SolverTerm::inline(enc, t))
    }

    fn compile_var(
        &mut self,
        var: &Rc<BoundVar>,
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        if let Some(t) = self.lookup_cache(var.id) {
            return Ok(t.clone());
        }
        if var.kind != VarKind::Uninterpreted {
            return Err(BridgeError::UnboundVariable {
                name: var.name.clone(),
            });
        }
        let loc = var.loc.as_ref().or(loc);
        let enc = self.encoding_of(&var.ty, loc)?;
        let name = self.name_for_symbol(var.id, &var.name);
        log::debug!("declaring `{}` as {} : {}", var.name, name, enc);
        self.declare_value(&name, &enc)?;
        if var.ty == BaseType::Nat {
            let b = self.backend();
            let non_negative = b.ge(&b.symbol(&name), &b.int_const(0));
            self.assert_persistent(non_negative)?;
        }
        let t = SolverTerm::named(enc, name);
        self.insert_cache(var.id, t.clone(), CacheLifetime::Persistent);
        Ok(t)
    }

    fn bind_bool(&mut self, term: B::Term) -> Result<SolverTerm<B::Term>> {
        self.bind_term("t", Encoding::Bool, term)
    }

    fn compile_app(
        &mut self,
        ty: &BaseType,
        app: &App<ExprRef>,
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        let args = app.try_map(|c| self.compile(c))?;
        let enc = self.encoding_of(ty, loc)?;
        let op = app.operator();
        match &args {
            App::Not(a) => {
                let t = self.backend().not(&self.term_of(a));
                self.bind_bool(t)
            }
            App::And(xs) => {
                let t = self.backend().and(&self.terms_of(xs));
                self.bind_bool(t)
            }
            App::Or(xs) => {
                let t = self.backend().or(&self.terms_of(xs));
                self.bind_bool(t)
            }
            App::Xor(a, b) => {
                let t = self.backend().xor(&self.term_of(a), &self.term_of(b));
                self.bind_bool(t)
            }
            App::Implies(a, b) => {
                let t = self.backend().implies(&self.term_of(a), &self.term_of(b));
                self.bind_bool(t)
            }
            App::Ite(c, t, e) => {
                check_encoding(op, &t.encoding, &e.encoding)?;
                if enc.is_function_array() {
                    return self.fn_array_ite(c, t, e, &enc, loc);
                }
                let term =
                    self.backend()
                        .ite(&self.term_of(c), &self.term_of(t), &self.term_of(e));
                self.bind_term("t", enc, term)
            }
            App::Eq(a, b) => self.compile_eq(a, b, loc),
            App::Distinct(xs) => {
                for x in xs.iter().skip(1) {
                    check_encoding(op, &xs[0].encoding, &x.encoding)?;
                }
                if xs.first().is_some_and(|x| x.encoding.is_function_array()) {
                    let mut differ = Vec::new();
                    for i in 0..xs.len() {
                        for j in (i + 1)..xs.len() {
                            let same = self.fn_array_eq(&xs[i], &xs[j], loc)?;
                            differ.push(self.backend().not(&self.term_of(&same)));
                        }
                    }
                    let t = self.backend().and(&differ);
                    return self.bind_bool(t);
                }
                let t = self.backend().distinct(&self.terms_of(xs));
                self.bind_bool(t)
            }
            App::Le(a, b) | App::Lt(a, b) => {
                check_encoding(op, &a.encoding, &b.encoding)?;
                let (x, y) = (self.term_of(a), self.term_of(b));
                let t = match app {
                    App::Le(..) => self.backend().le(&x, &y),
                    _ => self.backend().lt(&x, &y),
                };
                self.bind_bool(t)
            }

            App::Add(xs) => {
                let t = self.backend().add(&self.terms_of(xs));
                self.bind_term("t", enc, t)
            }
            App::Sub(a, b) => {
                let t = self.backend().sub(&self.term_of(a), &self.term_of(b));
                self.bind_term("t", enc, t)
            }
            App::Mul(a, b) => self.compile_mul(
                a,
                b,
                literal_operand(app, 0).is_some() || literal_operand(app, 1).is_some(),
                enc,
                loc,
            ),
            App::Neg(a) => {
                let t = self.backend().neg(&self.term_of(a));
                self.bind_term("t", enc, t)
            }
            App::Abs(a) => self.compile_abs(a, ty, enc),
            App::NatDiv(x, y) => self.compile_division(DivOp::NatDiv, x, y, literal_operand(app, 1), loc),
            App::NatMod(x, y) => self.compile_division(DivOp::NatMod, x, y, literal_operand(app, 1), loc),
            App::IntDiv(x, y) => self.compile_division(DivOp::IntDiv, x, y, literal_operand(app, 1), loc),
            App::IntMod(x, y) => self.compile_division(DivOp::IntMod, x, y, literal_operand(app, 1), loc),
            App::RealDiv(x, y) => self.compile_real_div(x, y, literal_operand(app, 1), loc),
            App::Sqrt(x) => self.compile_sqrt(x, literal_operand(app, 0), loc),
            App::Floor(x) => self.compile_rounding(Rounding::Floor, x, loc),
            App::Ceiling(x) => self.compile_rounding(Rounding::Ceiling, x, loc),
            App::Round(x) => self.compile_rounding(Rounding::NearestAwayFromZero, x, loc),
            App::NatToInt(x) => Ok(x.clone()),
            App::IntToReal(x) => {
                let t = self.backend().int_to_real(&self.term_of(x));
                self.bind_term("t", enc, t)
            }
            App::IntToNat(x) => {
                let b = self.backend();
                let v = self.term_of(x);
                let zero = b.int_const(0);
                let t = b.ite(&b.lt(&v, &zero), &zero, &v);
                self.bind_term("t", enc, t)
            }
            App::BvToInt { arg, signed } => {
                let width = match arg.encoding {
                    Encoding::BitVec(w) => w,
                    ref other => return Err(BridgeError::mismatch(op, "bit-vector", other)),
                };
                let t = self.bv_to_int_term(&self.term_of(arg), width, *signed);
                self.bind_term("t", enc, t)
            }
            App::IntToBv { arg, width } => self.compile_int_to_bv(arg, *width, loc),

            App::BvUlt(a, b) | App::BvUle(a, b) | App::BvSlt(a, b) | App::BvSle(a, b) => {
                check_encoding(op, &a.encoding, &b.encoding)?;
                let cmp = match app {
                    App::BvUlt(..) => BvCmp::Ult,
                    App::BvUle(..) => BvCmp::Ule,
                    App::BvSlt(..) => BvCmp::Slt,
                    _ => BvCmp::Sle,
                };
                let t = self
                    .backend()
                    .bv_cmp(cmp, &self.term_of(a), &self.term_of(b));
                self.bind_bool(t)
            }
            App::BvAdd(a, b) => self.bv_bin(BvBinOp::Add, a, b, enc),
            App::BvSub(a, b) => self.bv_bin(BvBinOp::Sub, a, b, enc),
            App::BvMul(a, b) => self.bv_bin(BvBinOp::Mul, a, b, enc),
            App::BvUdiv(a, b) => self.bv_bin(BvBinOp::Udiv, a, b, enc),
            App::BvUrem(a, b) => self.bv_bin(BvBinOp::Urem, a, b, enc),
            App::BvSdiv(a, b) => self.bv_bin(BvBinOp::Sdiv, a, b, enc),
            App::BvSrem(a, b) => self.bv_bin(BvBinOp::Srem, a, b, enc),
            App::BvAnd(a, b) => self.bv_bin(BvBinOp::And, a, b, enc),
            App::BvOr(a, b) => self.bv_bin(BvBinOp::Or, a, b, enc),
            App::BvXor(a, b) => self.bv_bin(BvBinOp::Xor, a, b, enc),
            App::BvShl(a, b) => self.bv_bin(BvBinOp::Shl, a, b, enc),
            App::BvLshr(a, b) => self.bv_bin(BvBinOp::Lshr, a, b, enc),
            App::BvAshr(a, b) => self.bv_bin(BvBinOp::Ashr, a, b, enc),
            App::BvConcat(a, b) => self.bv_bin(BvBinOp::Concat, a, b, enc),
            App::BvNeg(a) => {
                let t = self.backend().bv_unop(BvUnOp::Neg, &self.term_of(a));
                self.bind_term("t", enc, t)
            }
            App::BvNot(a) => {
                let t = self.backend().bv_unop(BvUnOp::Not, &self.term_of(a));
                self.bind_term("t", enc, t)
            }
            App::BvExtract { arg, high, low } => {
                let t = self.backend().bv_extract(&self.term_of(arg), *high, *low);
                self.bind_term("t", enc, t)
            }
            App::BvZext { arg, width } | App::BvSext { arg, width } => {
                let from = match arg.encoding {
                    Encoding::BitVec(w) => w,
                    ref other => return Err(BridgeError::mismatch(op, "bit-vector", other)),
                };
                let x = self.term_of(arg);
                let t = match app {
                    App::BvZext { .. } => self.backend().bv_zero_extend(&x, width - from),
                    _ => self.backend().bv_sign_extend(&x, width - from),
                };
                self.bind_term("t", enc, t)
            }

            App::Select { array, indices } => self.compile_select(array, indices, enc),
            App::Update {
                array,
                indices,
                value,
            } => {
                let update = (self.terms_of(indices), self.term_of(value));
                self.array_with_updates(array, vec![update], loc)
            }
            App::ArrayMap { base, updates } => self.compile_array_map(base, updates, loc),
            App::ConstArray { value, .. } => self.compile_const_array(value, enc, loc),
            App::MkStruct(fields) => self.compile_mk_struct(fields, enc),
            App::StructField { arg, index } => self.compile_struct_field(arg, *index, enc),
            App::MkComplex(re, im) => {
                let (re, im) = (self.term_of(re), self.term_of(im));
                let c = self.make_complex(re, im, loc)?;
                match c.name() {
                    Some(_) => Ok(c),
                    None => {
                        let t = self.term_of(&c);
                        self.bind_term("t", c.encoding, t)
                    }
                }
            }
            App::RealPart(c) => self.complex_part(c, false),
            App::ImagPart(c) => self.complex_part(c, true),
        }
    }

    fn bv_bin(
        &mut self,
        op: BvBinOp,
        a: &SolverTerm<B::Term>,
        b: &SolverTerm<B::Term>,
        enc: Encoding,
    ) -> Result<SolverTerm<B::Term>> {
        if op != BvBinOp::Concat {
            check_encoding(&format!("{:?}", op), &a.encoding, &b.encoding)?;
        }
        let t = self
            .backend()
            .bv_binop(op, &self.term_of(a), &self.term_of(b));
        self.bind_term("t", enc, t)
    }

    fn compile_eq(
        &mut self,
        a: &SolverTerm<B::Term>,
        b: &SolverTerm<B::Term>,
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        check_encoding("eq", &a.encoding, &b.encoding)?;
        if a.encoding.is_function_array() {
            return self.fn_array_eq(a, b, loc);
        }
        let t = self.backend().eq(&self.term_of(a), &self.term_of(b));
        self.bind_bool(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{SmtLib2, Yices};
    use crate::capabilities::Capabilities;
    use crate::connection::SymbolBindings;
    use crate::expr::ExprBuilder;
    use pretty_assertions::assert_eq;

    fn z3() -> Connection<SmtLib2, Vec<u8>> {
        Connection::open(Vec::new(), SmtLib2::new(), Capabilities::z3(), SymbolBindings::new())
            .unwrap()
    }

    fn body(conn: &Connection<SmtLib2, Vec<u8>>) -> Vec<String> {
        String::from_utf8(conn.sink().clone())
            .unwrap()
            .lines()
            .skip(2)
            .map(|l| l.to_string())
            .collect()
    }

    #[test]
    fn test_shared_subterm_emitted_once() {
        let mut conn = z3();
        let b = ExprBuilder::new();
        let x = b.free_var("x", BaseType::BitVec(8));
        let one = b.literal(Literal::bv(8, 1));
        let sum = b.app(App::BvAdd(x.clone(), one)).unwrap();
        let both = b.app(App::BvMul(sum.clone(), sum)).unwrap();
        let zero = b.literal(Literal::bv(8, 0));
        let root = b.app(App::Eq(both, zero)).unwrap();
        conn.compile_and_assert(&root).unwrap();
        assert_eq!(
            body(&conn),
            vec![
                "(declare-fun x () (_ BitVec 8))",
                "(define-fun t!0 () (_ BitVec 8) (bvadd x #b00000001))",
                "(define-fun t!1 () (_ BitVec 8) (bvmul t!0 t!0))",
                "(define-fun t!2 () Bool (= t!1 #b00000000))",
                "(assert t!2)",
            ]
        );
    }

    #[test]
    fn test_nat_variable_is_non_negative() {
        let mut conn = z3();
        let b = ExprBuilder::new();
        let n = b.free_var("n", BaseType::Nat);
        conn.compile(&n).unwrap();
        conn.compile(&n).unwrap();
        assert_eq!(
            body(&conn),
            vec!["(declare-fun n () Int)", "(assert (>= n 0))"]
        );
    }

    #[test]
    fn test_zero_width_variable_is_not_declared() {
        let mut conn = z3();
        let b = ExprBuilder::new();
        let x = b.free_var("x", BaseType::BitVec(0));
        let err = conn.compile(&x).unwrap_err();
        assert!(matches!(err, BridgeError::IllTyped { .. }));
        assert!(body(&conn).is_empty());
    }

    #[test]
    fn test_unbound_quantified_variable() {
        let mut conn = z3();
        let b = ExprBuilder::new();
        let v = b.new_var("i", BaseType::Integer, VarKind::Quantified);
        let err = conn.compile(&b.var_ref(&v)).unwrap_err();
        assert!(matches!(err, BridgeError::UnboundVariable { ref name } if name == "i"));
    }

    #[test]
    fn test_sign_extend_width() {
        let mut conn = Connection::open(
            Vec::new(),
            Yices::new(),
            Capabilities::yices(),
            SymbolBindings::new(),
        )
        .unwrap();
        let b = ExprBuilder::new();
        let x = b.free_var("x", BaseType::BitVec(4));
        let ext = b.app(App::BvSext { arg: x, width: 8 }).unwrap();
        conn.compile(&ext).unwrap();
        let text = String::from_utf8(conn.sink().clone()).unwrap();
        assert_eq!(
            text,
            "(define x::(bitvector 4))\n(define t!0::(bitvector 8) (bv-sign-extend x 4))\n"
        );
    }
}
