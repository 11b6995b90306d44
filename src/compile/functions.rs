// SPDX-License-Identifier: Apache-2.0

//! Binders: quantifiers and calls of uninterpreted or defined functions.

use std::io::Write;
use std::rc::Rc;

use crate::capabilities::ProblemFeatures;
use crate::connection::{CacheLifetime, Connection};
use crate::encoding::{check_encoding, choose_fn_arg_encoding, Encoding};
use crate::error::{Result, Theory};
use crate::expr::{BaseType, BoundVar, ExprRef, FnBody, FnSymbol, ProgramLoc, Quantifier};
use crate::sandbox::SandboxMode;
use crate::term_algebra::{SolverTerm, TermAlgebra};

fn quantifier_name(q: Quantifier) -> &'static str {
    match q {
        Quantifier::Forall => "forall",
        Quantifier::Exists => "exists",
    }
}

impl<B: TermAlgebra, W: Write> Connection<B, W> {
    /// Compiles `body` in a quantifier sandbox. Fresh constants introduced
    /// by partial operators in the body are bound by the same quantifier,
    /// and its side conditions guard a universal body or join an
    /// existential one.
    pub(super) fn compile_quantifier(
        &mut self,
        quantifier: Quantifier,
        var: &Rc<BoundVar>,
        body: &ExprRef,
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        let kind = quantifier_name(quantifier);
        self.require(
            ProblemFeatures::QUANTIFIERS,
            Theory::Quantifiers,
            &format!("{} over `{}`", kind, var.name),
            loc,
        )?;
        let enc = choose_fn_arg_encoding(&var.ty, self.capabilities(), loc)?;
        self.ensure_sorts(&enc)?;
        let bound = self.fresh_name(&var.name);
        log::trace!("binding `{}` as {} in {}", var.name, bound, kind);

        let bound_term = SolverTerm::named(enc.clone(), bound.clone());
        let sandboxed = self.run_sandboxed(
            SandboxMode::Quantifier,
            format!("{} `{}`", kind, var.name),
            |conn| {
                conn.insert_cache(var.id, bound_term, CacheLifetime::PopScoped);
                conn.compile(body)
            },
        )?;
        check_encoding(kind, &Encoding::Bool, &sandboxed.result.encoding)?;

        let mut guards = Vec::new();
        if var.ty == BaseType::Nat {
            let b = self.backend();
            guards.push(b.ge(&b.symbol(&bound), &b.int_const(0)));
        }
        guards.extend(sandboxed.side_conditions);
        let mut vars = vec![(bound, enc)];
        for (_, e) in &sandboxed.free_constants {
            self.ensure_sorts(e)?;
        }
        vars.extend(sandboxed.free_constants);

        let result = self.term_of(&sandboxed.result);
        let b = self.backend();
        let matrix = match quantifier {
            Quantifier::Forall if guards.is_empty() => result,
            Quantifier::Forall => b.implies(&b.and(&guards), &result),
            Quantifier::Exists => {
                guards.push(result);
                b.and(&guards)
            }
        };
        let matrix = if sandboxed.bound_defs.is_empty() {
            matrix
        } else {
            b.let_in(&sandboxed.bound_defs, &matrix)
        };
        let t = match quantifier {
            Quantifier::Forall => b.forall(&vars, &matrix),
            Quantifier::Exists => b.exists(&vars, &matrix),
        };
        self.bind_term("q", Encoding::Bool, t)
    }

    /// Compiles a call. The callee is declared or defined on first use; a
    /// defined body is compiled once, closed over its parameters.
    pub(super) fn compile_fn_app(
        &mut self,
        func: &Rc<FnSymbol>,
        args: &[ExprRef],
        loc: Option<&ProgramLoc>,
    ) -> Result<SolverTerm<B::Term>> {
        let mut arg_terms = Vec::with_capacity(args.len());
        let mut arg_encodings = Vec::with_capacity(args.len());
        for (arg, ty) in args.iter().zip(&func.arg_types) {
            let t = self.compile(arg)?;
            let enc = choose_fn_arg_encoding(ty, self.capabilities(), loc)?;
            check_encoding(&func.name, &enc, &t.encoding)?;
            arg_terms.push(self.term_of(&t));
            arg_encodings.push(enc);
        }
        let ret = choose_fn_arg_encoding(&func.ret_type, self.capabilities(), loc)?;

        let name = self.get_or_define_function(func, &arg_encodings, &ret, |conn, params| {
            let (vars, body) = match &func.body {
                FnBody::Uninterpreted => return Ok(None),
                FnBody::Defined { params: vars, body } => (vars, body),
            };
            let compiled = conn.run_sandboxed(
                SandboxMode::FunctionBody,
                format!("`{}`", func.name),
                |c| {
                    for (var, (pname, penc)) in vars.iter().zip(params) {
                        c.insert_cache(
                            var.id,
                            SolverTerm::named(penc.clone(), pname.clone()),
                            CacheLifetime::PopScoped,
                        );
                    }
                    c.compile(body)
                },
            )?;
            check_encoding(&func.name, &ret, &compiled.result.encoding)?;
            let result = conn.term_of(&compiled.result);
            Ok(Some(if compiled.bound_defs.is_empty() {
                result
            } else {
                conn.backend().let_in(&compiled.bound_defs, &result)
            }))
        })?;

        let b = self.backend();
        let t = b.apply(&b.symbol(&name), &arg_terms);
        self.bind_term("call", ret, t)
    }
}

#[cfg(test)]
mod tests {
    use crate::backends::SmtLib2;
    use crate::capabilities::{Capabilities, ProblemFeatures};
    use crate::connection::{Connection, SymbolBindings};
    use crate::error::{BridgeError, Theory};
    use crate::expr::{App, BaseType, ExprBuilder, Literal, VarKind};
    use pretty_assertions::assert_eq;

    fn open(caps: Capabilities) -> Connection<SmtLib2, Vec<u8>> {
        Connection::open(Vec::new(), SmtLib2::new(), caps, SymbolBindings::new()).unwrap()
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
    fn test_forall_binds_subterms_locally() {
        let mut conn = open(Capabilities::z3());
        let b = ExprBuilder::new();
        let i = b.new_var("i", BaseType::Integer, VarKind::Quantified);
        let one = b.literal(Literal::int(1));
        let succ = b.app(App::Add(vec![b.var_ref(&i), one])).unwrap();
        let lt = b.app(App::Lt(b.var_ref(&i), succ)).unwrap();
        let all = b.forall(&i, lt).unwrap();
        conn.compile_and_assert(&all).unwrap();
        assert_eq!(
            body(&conn),
            vec![
                "(define-fun q!3 () Bool (forall ((i!0 Int)) (let ((t!1 (+ i!0 1))) (let ((t!2 (< i!0 t!1))) t!2))))",
                "(assert q!3)",
            ]
        );
        // The bound variable is out of scope again.
        let err = conn.compile(&b.var_ref(&i)).unwrap_err();
        assert!(matches!(err, BridgeError::UnboundVariable { .. }));
    }

    #[test]
    fn test_exists_binds_fresh_constants_of_partial_ops() {
        let mut conn = open(Capabilities::z3());
        let b = ExprBuilder::new();
        let x = b.new_var("x", BaseType::Real, VarKind::Quantified);
        let fl = b.app(App::Floor(b.var_ref(&x))).unwrap();
        let three = b.literal(Literal::int(3));
        let eq = b.app(App::Eq(fl, three)).unwrap();
        let ex = b.exists(&x, eq).unwrap();
        conn.compile_and_assert(&ex).unwrap();
        let lines = body(&conn);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("(exists ((x!0 Real) (k!1 Int))"));
        assert!(lines[0].contains("(<= (to_real k!1) x!0)"));
    }

    #[test]
    fn test_quantifiers_require_capability() {
        let mut conn = open(Capabilities::z3().without(ProblemFeatures::QUANTIFIERS));
        let b = ExprBuilder::new();
        let p = b.new_var("p", BaseType::Bool, VarKind::Quantified);
        let all = b.forall(&p, b.var_ref(&p)).unwrap();
        let err = conn.compile(&all).unwrap_err();
        assert_eq!(err.theory(), Some(Theory::Quantifiers));
    }

    #[test]
    fn test_defined_function_is_defined_once() {
        let mut conn = open(Capabilities::z3());
        let b = ExprBuilder::new();
        let a = b.new_var("a", BaseType::Integer, VarKind::FnParam);
        let one = b.literal(Literal::int(1));
        let inc = b
            .defined_fn("f", vec![a.clone()], b.app(App::Add(vec![b.var_ref(&a), one])).unwrap())
            .unwrap();
        let x = b.free_var("x", BaseType::Integer);
        let y = b.free_var("y", BaseType::Integer);
        conn.compile(&b.apply(&inc, vec![x]).unwrap()).unwrap();
        conn.compile(&b.apply(&inc, vec![y]).unwrap()).unwrap();
        assert_eq!(
            body(&conn),
            vec![
                "(declare-fun x () Int)",
                "(define-fun f ((f.arg0!0 Int)) Int (let ((t!1 (+ f.arg0!0 1))) t!1))",
                "(define-fun call!2 () Int (f x))",
                "(declare-fun y () Int)",
                "(define-fun call!3 () Int (f y))",
            ]
        );
    }

    #[test]
    fn test_function_body_must_be_closed() {
        let mut conn = open(Capabilities::z3());
        let b = ExprBuilder::new();
        let a = b.new_var("a", BaseType::Integer, VarKind::FnParam);
        let y = b.free_var("y", BaseType::Integer);
        let div = b.app(App::IntDiv(b.var_ref(&a), y)).unwrap();
        let f = b.defined_fn("f", vec![a], div).unwrap();
        let call = b.apply(&f, vec![b.literal(Literal::int(4))]).unwrap();
        let err = conn.compile(&call).unwrap_err();
        assert!(matches!(err, BridgeError::SandboxViolation { .. }));
        assert!(!conn.in_sandbox());
    }
}
