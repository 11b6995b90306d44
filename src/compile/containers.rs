// SPDX-License-Identifier: Apache-2.0

//! Arrays, structs and complex numbers.

use std::io::Write;

use crate::capabilities::ProblemFeatures;
use crate::connection::Connection;
use crate::encoding::{ArrayRepr, Encoding};
use crate::error::{BridgeError, Result, Theory};
use crate::expr::{Literal, ProgramLoc};
use crate::term_algebra::{SolverTerm, TermAlgebra};

fn array_repr<T>(t: &SolverTerm<T>, operation: &str) -> Result<ArrayRepr> {
    match &t.encoding {
        Encoding::Array { repr, .. } => Ok(*repr),
        other => Err(BridgeError::mismatch(operation, "array", other)),
    }
}

impl<B: TermAlgebra, W: Write> Connection<B, W> {
    /// Index term of a native array: the index itself, or a struct of the
    /// indices for multi-index arrays.
    fn native_index(&mut self, indices: &[B::Term]) -> Result<B::Term> {
        if let [single] = indices {
            return Ok(single.clone());
        }
        self.declare_struct_arity(indices.len())?;
        Ok(self.backend().mk_struct(indices))
    }

    fn fresh_params(&mut self, index: &[Encoding]) -> Vec<(String, Encoding)> {
        index
            .iter()
            .map(|e| (self.fresh_name("i"), e.clone()))
            .collect()
    }

    /// The backend's native constant array of `enc`, when both the profile
    /// and the backend have one. Binder-based renderings get fresh index
    /// names so `value` cannot be captured.
    fn native_const_array(&mut self, enc: &Encoding, value: &B::Term) -> Option<B::Term> {
        if !self.capabilities().supports(ProblemFeatures::CONST_ARRAYS) {
            return None;
        }
        let index = match enc {
            Encoding::ComplexArray => vec![Encoding::Bool],
            other => other.array_parts()?.0.to_vec(),
        };
        let params = self.fresh_params(&index);
        self.backend().const_array(&params, enc, value)
    }

    fn param_terms(&self, params: &[(String, Encoding)]) -> Vec<B::Term> {
        params.iter().map(|(n, _)| self.backend().symbol(n)).collect()
    }

    /// Builds a function-encoded array whose value at the parameters is
    /// `body(params)`: a definition when live, a lambda inside a sandbox.
    fn define_array_fn<F>(
        &mut self,
        enc: &Encoding,
        loc: Option<&ProgramLoc>,
        body: F,
    ) -> Result<SolverTerm<B::Term>>
    where
        F: FnOnce(&B, &[B::Term]) -> B::Term,
    {
        let (index, element) = match enc.array_parts() {
            Some((index, element)) => (index.to_vec(), element.clone()),
            None => return Err(BridgeError::mismatch("array function", "array", enc)),
        };
        let params = self.fresh_params(&index);
        let args = self.param_terms(&params);
        let value = body(self.backend(), &args);
        if self.in_sandbox() {
            self.require(
                ProblemFeatures::LAMBDAS,
                Theory::Lambdas,
                "array-valued term under a binder",
                loc,
            )?;
            let lambda = match self.backend().lambda(&params, &value) {
                Some(l) => l,
                None => {
                    return Err(BridgeError::unsupported(
                        self.backend().name(),
                        Theory::Lambdas,
                        "array-valued term under a binder",
                        loc,
                    ))
                }
            };
            return self.bind_term("arr", enc.clone(), lambda);
        }
        let name = self.fresh_name("arr");
        self.define_symbol(&name, &params, &element, value)?;
        Ok(SolverTerm::named(enc.clone(), name))
    }

    pub(super) fn compile_select(
        &mut self,
        array: &SolverTerm<B::Term>,
        indices: &[SolverTerm<B::Term>],
        enc: Encoding,
    ) -> Result<SolverTerm<B::Term>> {
        let a = self.term_of(array);
        let idx = self.terms_of(indices);
        let t = match array_repr(array, "select")? {
            ArrayRepr::Function => self.backend().apply(&a, &idx),
            ArrayRepr::Native => {
                let i = self.native_index(&idx)?;
                self.backend().select(&a, &i)
            }
        };
        self.bind_term("t", enc, t)
    }

    /// `array` with each `(indices, value)` written in order, so a later
    /// update of the same point wins.
    pub(super) fn array_with_updates(
        &mut self,
        array: &SolverTerm<B::Term>,
        updates: Vec<(Vec<B::Term>, B::Term)>,
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        let base = self.term_of(array);
        let enc = array.encoding.clone();
        match array_repr(array, "update")? {
            ArrayRepr::Native => {
                let mut acc = base;
                for (indices, value) in updates {
                    let i = self.native_index(&indices)?;
                    acc = self.backend().store(&acc, &i, &value);
                }
                self.bind_term("arr", enc, acc)
            }
            ArrayRepr::Function => {
                if self.capabilities().supports(ProblemFeatures::FUNCTION_UPDATE) {
                    let b = self.backend();
                    let native = updates.iter().try_fold(base.clone(), |acc, (indices, value)| {
                        b.fn_update(&acc, indices, value)
                    });
                    if let Some(t) = native {
                        return self.bind_term("arr", enc, t);
                    }
                }
                log::debug!("no native function update; emitting {} as an ite chain", enc);
                self.define_array_fn(&enc, loc, |b, params| {
                    updates
                        .iter()
                        .fold(b.apply(&base, params), |acc, (indices, value)| {
                            let hits: Vec<B::Term> = params
                                .iter()
                                .zip(indices)
                                .map(|(p, i)| b.eq(p, i))
                                .collect();
                            b.ite(&b.and(&hits), value, &acc)
                        })
                })
            }
        }
    }

    pub(super) fn compile_array_map(
        &mut self,
        base: &SolverTerm<B::Term>,
        updates: &[(Vec<Literal>, SolverTerm<B::Term>)],
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        let mut points = Vec::with_capacity(updates.len());
        for (indices, value) in updates {
            let mut idx = Vec::with_capacity(indices.len());
            for lit in indices {
                let t = self.compile_literal(lit, loc)?;
                idx.push(self.term_of(&t));
            }
            points.push((idx, self.term_of(value)));
        }
        self.array_with_updates(base, points, loc)
    }

    pub(super) fn compile_const_array(
        &mut self,
        value: &SolverTerm<B::Term>,
        enc: Encoding,
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        let v = self.term_of(value);
        if enc.is_function_array() {
            return self.define_array_fn(&enc, loc, |_, _| v);
        }
        if let Some(t) = self.native_const_array(&enc, &v) {
            return self.bind_term("arr", enc, t);
        }
        log::debug!("no native constant array; quantifying over {}", enc);
        self.require(
            ProblemFeatures::QUANTIFIERS,
            Theory::ConstantArrays,
            "constant array",
            loc,
        )?;
        let index = match enc.array_parts() {
            Some((index, _)) => index.to_vec(),
            None => return Err(BridgeError::mismatch("const_array", "array", &enc)),
        };
        let arr = self.fresh_constant("arr", enc)?;
        let params = self.fresh_params(&index);
        for (_, e) in &params {
            self.ensure_sorts(e)?;
        }
        let idx = self.param_terms(&params);
        let i = self.native_index(&idx)?;
        let b = self.backend();
        let everywhere = b.forall(&params, &b.eq(&b.select(&self.term_of(&arr), &i), &v));
        self.side_condition(everywhere, loc)?;
        Ok(arr)
    }

    pub(super) fn fn_array_ite(
        &mut self,
        c: &SolverTerm<B::Term>,
        t: &SolverTerm<B::Term>,
        e: &SolverTerm<B::Term>,
        enc: &Encoding,
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        let (ct, tt, et) = (self.term_of(c), self.term_of(t), self.term_of(e));
        self.define_array_fn(enc, loc, |b, params| {
            b.ite(&ct, &b.apply(&tt, params), &b.apply(&et, params))
        })
    }

    /// Extensional equality of two function-encoded arrays.
    pub(super) fn fn_array_eq(
        &mut self,
        a: &SolverTerm<B::Term>,
        b: &SolverTerm<B::Term>,
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        let (at, bt) = (self.term_of(a), self.term_of(b));
        if self.capabilities().supports(ProblemFeatures::FUNCTION_ARGUMENTS) {
            let t = self.backend().eq(&at, &bt);
            return self.bind_term("t", Encoding::Bool, t);
        }
        log::debug!("comparing function arrays pointwise");
        self.require(
            ProblemFeatures::QUANTIFIERS,
            Theory::Quantifiers,
            "equality of function-encoded arrays",
            loc,
        )?;
        let index = match a.encoding.array_parts() {
            Some((index, _)) => index.to_vec(),
            None => return Err(BridgeError::mismatch("eq", "array", &a.encoding)),
        };
        let params = self.fresh_params(&index);
        for (_, e) in &params {
            self.ensure_sorts(e)?;
        }
        let args = self.param_terms(&params);
        let backend = self.backend();
        let pointwise = backend.forall(
            &params,
            &backend.eq(&backend.apply(&at, &args), &backend.apply(&bt, &args)),
        );
        self.bind_term("t", Encoding::Bool, pointwise)
    }

    pub(super) fn compile_mk_struct(
        &mut self,
        fields: &[SolverTerm<B::Term>],
        enc: Encoding,
    ) -> Result<SolverTerm<B::Term>> {
        self.ensure_sorts(&enc)?;
        let t = self.backend().mk_struct(&self.terms_of(fields));
        self.bind_term("t", enc, t)
    }

    pub(super) fn compile_struct_field(
        &mut self,
        arg: &SolverTerm<B::Term>,
        index: usize,
        enc: Encoding,
    ) -> Result<SolverTerm<B::Term>> {
        let arity = match &arg.encoding {
            Encoding::Struct(fields) => fields.len(),
            other => return Err(BridgeError::mismatch("struct_field", "struct", other)),
        };
        let t = self
            .backend()
            .struct_field(arity, index, &self.term_of(arg));
        self.bind_term("t", enc, t)
    }

    /// A complex number from its real and imaginary parts. The struct
    /// encoding yields an inline constructor; the array encoding a constant
    /// array with one store, or failing that a fresh array pinned down by
    /// two side conditions.
    pub(crate) fn make_complex(
        &mut self,
        re: B::Term,
        im: B::Term,
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        let enc = self.encoding_of(&crate::expr::BaseType::Complex, loc)?;
        match enc {
            Encoding::ComplexStruct => {
                self.declare_struct_arity(2)?;
                let t = self.backend().mk_struct(&[re, im]);
                Ok(SolverTerm::inline(enc, t))
            }
            Encoding::ComplexArray => {
                if let Some(base) = self.native_const_array(&enc, &re) {
                    let b = self.backend();
                    let t = b.store(&base, &b.bool_lit(true), &im);
                    return Ok(SolverTerm::inline(enc, t));
                }
                let c = self.fresh_constant("cplx", enc)?;
                let ct = self.term_of(&c);
                let b = self.backend();
                let parts = [
                    b.eq(&b.select(&ct, &b.bool_lit(false)), &re),
                    b.eq(&b.select(&ct, &b.bool_lit(true)), &im),
                ];
                for cond in parts {
                    self.side_condition(cond, loc)?;
                }
                Ok(c)
            }
            other => Err(BridgeError::mismatch("complex", "complex", &other)),
        }
    }

    pub(super) fn complex_part(
        &mut self,
        c: &SolverTerm<B::Term>,
        imag: bool,
    ) -> Result<SolverTerm<B::Term>> {
        let ct = self.term_of(c);
        let b = self.backend();
        let t = match c.encoding {
            Encoding::ComplexStruct => b.struct_field(2, usize::from(imag), &ct),
            Encoding::ComplexArray => b.select(&ct, &b.bool_lit(imag)),
            ref other => return Err(BridgeError::mismatch("complex part", "complex", other)),
        };
        self.bind_term("t", Encoding::Real, t)
    }
}

#[cfg(test)]
mod tests {
    use crate::backends::{SmtLib2, Yices};
    use crate::capabilities::{Capabilities, ProblemFeatures};
    use crate::connection::{Connection, SymbolBindings};
    use crate::expr::{App, BaseType, ExprBuilder, Literal, VarKind};
    use crate::term_algebra::TermAlgebra;
    use pretty_assertions::assert_eq;

    fn open<B: TermAlgebra<Term = String>>(backend: B, caps: Capabilities) -> Connection<B, Vec<u8>> {
        Connection::open(Vec::new(), backend, caps, SymbolBindings::new()).unwrap()
    }

    fn text<B: TermAlgebra<Term = String>>(conn: &Connection<B, Vec<u8>>) -> String {
        String::from_utf8(conn.sink().clone()).unwrap()
    }

    #[test]
    fn test_yices_update_uses_native_function_update() {
        let mut conn = open(Yices::new(), Capabilities::yices());
        let b = ExprBuilder::new();
        let a = b.free_var("a", BaseType::new_array(vec![BaseType::Integer], BaseType::Bool));
        let one = b.literal(Literal::int(1));
        let t = b.literal(Literal::Bool(true));
        let upd = b
            .app(App::Update {
                array: a,
                indices: vec![one],
                value: t,
            })
            .unwrap();
        conn.compile(&upd).unwrap();
        assert_eq!(
            text(&conn),
            "(define a::(-> int bool))\n(define arr!0::(-> int bool) (update a (1) true))\n"
        );
    }

    #[test]
    fn test_function_update_without_native_support_defines_ite_chain() {
        let caps = Capabilities::yices().without(ProblemFeatures::FUNCTION_UPDATE);
        let mut conn = open(Yices::new(), caps);
        let b = ExprBuilder::new();
        let a = b.free_var("a", BaseType::new_array(vec![BaseType::Integer], BaseType::Integer));
        let upd = b
            .app(App::ArrayMap {
                base: a,
                updates: vec![
                    (vec![Literal::int(0)], b.literal(Literal::int(5))),
                    (vec![Literal::int(0)], b.literal(Literal::int(6))),
                ],
            })
            .unwrap();
        conn.compile(&upd).unwrap();
        let last = text(&conn).lines().last().unwrap().to_string();
        assert_eq!(
            last,
            "(define arr!1::(-> int int) (lambda (i!0::int) (ite (= i!0 0) 6 (ite (= i!0 0) 5 (a i!0)))))"
        );
    }

    #[test]
    fn test_multi_index_native_select_uses_struct_index() {
        let mut conn = open(SmtLib2::new(), Capabilities::z3());
        let b = ExprBuilder::new();
        let ty = BaseType::new_array(vec![BaseType::Integer, BaseType::Bool], BaseType::Real);
        let a = b.free_var("m", ty);
        let i = b.free_var("i", BaseType::Integer);
        let sel = b
            .app(App::Select {
                array: a,
                indices: vec![i, b.literal(Literal::Bool(false))],
            })
            .unwrap();
        conn.compile(&sel).unwrap();
        let out = text(&conn);
        assert!(out.contains("(declare-fun m () (Array (Struct2 Int Bool) Real))"));
        assert!(out.ends_with("(define-fun t!0 () Real (select m (mk-struct2 i false)))\n"));
    }

    #[test]
    fn test_yices_const_array_does_not_capture_bound_variable() {
        let caps = Capabilities::yices().with(ProblemFeatures::ARRAYS | ProblemFeatures::CONST_ARRAYS);
        let mut conn = open(Yices::new(), caps);
        let b = ExprBuilder::new();
        let i = b.new_var("i", BaseType::Integer, VarKind::Quantified);
        let everywhere_i = b
            .app(App::ConstArray {
                index: vec![BaseType::Integer],
                value: b.var_ref(&i),
            })
            .unwrap();
        let sel = b
            .app(App::Select {
                array: everywhere_i,
                indices: vec![b.literal(Literal::int(5))],
            })
            .unwrap();
        let eq = b.app(App::Eq(sel, b.var_ref(&i))).unwrap();
        conn.compile_and_assert(&b.forall(&i, eq).unwrap()).unwrap();
        let out = text(&conn);
        assert!(out.contains("(forall (i!0::int) "), "{}", out);
        assert!(out.contains("(lambda (i!1::int) i!0)"), "{}", out);
        assert!(!out.contains("(lambda (i!0::int)"), "{}", out);
    }

    #[test]
    fn test_complex_falls_back_to_array_with_side_conditions() {
        let caps = Capabilities::z3().without(ProblemFeatures::STRUCTS | ProblemFeatures::CONST_ARRAYS);
        let mut conn = open(SmtLib2::new(), caps);
        let b = ExprBuilder::new();
        let c = b.literal(Literal::Complex(
            num_rational::BigRational::from_integer(1.into()),
            num_rational::BigRational::from_integer(2.into()),
        ));
        let im = b.app(App::ImagPart(c)).unwrap();
        conn.compile(&im).unwrap();
        let lines: Vec<String> = text(&conn).lines().skip(2).map(|l| l.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "(declare-fun cplx!0 () (Array Bool Real))",
                "(assert (= (select cplx!0 false) 1.0))",
                "(assert (= (select cplx!0 true) 2.0))",
                "(define-fun t!1 () Real (select cplx!0 true))",
            ]
        );
    }
}
