// SPDX-License-Identifier: Apache-2.0

//! Compiles typed expression graphs into SMT solver command streams and
//! reads concrete values back out of solver models.
//!
//! The usual flow:
//!
//! ```
//! use smtbridge::backends::SmtLib2;
//! use smtbridge::capabilities::Capabilities;
//! use smtbridge::expr::{App, BaseType, ExprBuilder, Literal};
//!
//! let b = ExprBuilder::new();
//! let p = b.free_var("p", BaseType::Bool);
//! let x = b.free_var("x", BaseType::BitVec(8));
//! let five = b.literal(Literal::bv(8, 5u64));
//! let f = b.app(App::Or(vec![p, b.app(App::Eq(x, five)).unwrap()])).unwrap();
//!
//! let mut conn = smtbridge::open_connection(
//!     Vec::new(),
//!     SmtLib2::new(),
//!     Capabilities::z3(),
//!     Default::default(),
//! )
//! .unwrap();
//! smtbridge::compile_and_assert(&mut conn, &f).unwrap();
//! assert_eq!(conn.counts().asserts, 1);
//! ```

pub mod backends;
pub mod capabilities;
pub mod command;
pub mod compile;
pub mod config;
pub mod connection;
pub mod encoding;
pub mod error;
pub mod eval;
pub mod expr;
pub mod graph;
pub mod sandbox;
pub mod term_algebra;
pub mod test_utils;

use std::io::Write;

pub use crate::capabilities::{Capabilities, ProblemFeatures};
pub use crate::connection::{CacheLifetime, Connection, SymbolBindings};
pub use crate::error::{BridgeError, Result, Theory};
pub use crate::eval::{Evaluator, GroundEvalFns, GroundValue};
pub use crate::expr::{ExprBuilder, ExprRef};
pub use crate::term_algebra::TermAlgebra;

/// Opens a connection writing `backend` syntax to `sink`. The preamble is
/// written immediately.
pub fn open_connection<B: TermAlgebra, W: Write>(
    sink: W,
    backend: B,
    caps: Capabilities,
    bindings: SymbolBindings,
) -> Result<Connection<B, W>> {
    Connection::open(sink, backend, caps, bindings)
}

/// Compiles `expr`, which must be boolean, and asserts it on the connection.
pub fn compile_and_assert<B: TermAlgebra, W: Write>(
    conn: &mut Connection<B, W>,
    expr: &ExprRef,
) -> Result<()> {
    conn.compile_and_assert(expr)
}

/// Compiles `expr` without asserting it and returns its solver term.
pub fn compile_formula<B: TermAlgebra, W: Write>(
    conn: &mut Connection<B, W>,
    expr: &ExprRef,
) -> Result<B::Term> {
    let t = conn.compile(expr)?;
    Ok(t.term(conn.backend()))
}

/// Opens a scope. Assertions made inside it are retracted by the matching
/// [`pop_scope`].
pub fn push_scope<B: TermAlgebra, W: Write>(conn: &mut Connection<B, W>) -> Result<()> {
    conn.push_scope()
}

/// Closes the innermost scope, dropping the terms cached inside it and
/// re-asserting persistent facts first asserted there. Fails with
/// [`BridgeError::ScopeUnderflow`] at the outermost scope.
pub fn pop_scope<B: TermAlgebra, W: Write>(conn: &mut Connection<B, W>) -> Result<()> {
    conn.pop_scope()
}

/// Evaluates one expression under the current model. Use an [`Evaluator`]
/// directly to share memoized values across several expressions.
pub fn evaluate_model<B, W, F>(
    conn: &Connection<B, W>,
    fns: &mut F,
    expr: &ExprRef,
) -> Result<GroundValue>
where
    B: TermAlgebra,
    W: Write,
    F: GroundEvalFns<B::Term>,
{
    Evaluator::new().evaluate(conn, fns, expr)
}
