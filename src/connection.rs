// SPDX-License-Identifier: Apache-2.0

//! Per-session solver connection state.
//!
//! A connection owns the command sink and everything that must stay
//! consistent with what the solver has already seen: the fresh-name
//! counter, the stack of identity-keyed caches (one frame per open scope,
//! plus one per active sandbox), the bijection between source symbols and
//! solver names, and the function-declaration cache.

use std::collections::{HashMap, HashSet};
use std::io::Write;

use crate::capabilities::{Capabilities, ProblemFeatures};
use crate::command::{Command, CommandCounts};
use crate::encoding::Encoding;
use crate::error::{BridgeError, Result, Theory};
use crate::expr::{FnSymbol, Nonce, ProgramLoc};
use crate::sandbox::{SandboxMode, SandboxResult, SandboxState};
use crate::term_algebra::{SolverTerm, TermAlgebra};

/// Preferred solver names for source symbols, keyed by the identity of the
/// variable or function symbol.
pub type SymbolBindings = HashMap<Nonce, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLifetime {
    /// Dropped with the innermost frame.
    PopScoped,
    /// Written into every open frame so it survives any later pop.
    Persistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Scope,
    Sandbox(SandboxMode),
}

#[derive(Debug)]
struct Frame<T> {
    kind: FrameKind,
    entries: HashMap<Nonce, SolverTerm<T>>,
}

impl<T> Frame<T> {
    fn new(kind: FrameKind) -> Self {
        Frame {
            kind,
            entries: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct FunctionEntry {
    name: String,
    args: Vec<Encoding>,
    ret: Encoding,
}

fn fmt_encodings(encs: &[Encoding]) -> String {
    let parts: Vec<String> = encs.iter().map(|e| e.to_string()).collect();
    format!("({})", parts.join(", "))
}

pub struct Connection<B: TermAlgebra, W: Write> {
    sink: W,
    backend: B,
    caps: Capabilities,
    next_name: u64,
    frames: Vec<Frame<B::Term>>,
    symbol_names: HashMap<Nonce, String>,
    used_names: HashSet<String>,
    functions: HashMap<Nonce, FunctionEntry>,
    struct_arities: HashSet<usize>,
    /// Global facts (e.g. non-negativity of natural-valued symbols) with the
    /// scope depth they were last asserted at.
    persistent_asserts: Vec<(usize, B::Term)>,
    last_loc: Option<ProgramLoc>,
    sandboxes: Vec<SandboxState<B::Term>>,
    counts: CommandCounts,
}

impl<B: TermAlgebra, W: Write> Connection<B, W> {
    /// Opens a connection and writes the backend preamble to `sink`.
    pub fn open(
        mut sink: W,
        backend: B,
        caps: Capabilities,
        bindings: SymbolBindings,
    ) -> Result<Self> {
        log::debug!("opening {} connection with {}", backend.name(), caps);
        for line in backend.preamble() {
            writeln!(sink, "{}", line)?;
        }
        sink.flush()?;
        let mut conn = Connection {
            sink,
            backend,
            caps,
            next_name: 0,
            frames: vec![Frame::new(FrameKind::Scope)],
            symbol_names: HashMap::new(),
            used_names: HashSet::new(),
            functions: HashMap::new(),
            struct_arities: HashSet::new(),
            persistent_asserts: Vec::new(),
            last_loc: None,
            sandboxes: Vec::new(),
            counts: CommandCounts::default(),
        };
        let mut bindings: Vec<(Nonce, String)> = bindings.into_iter().collect();
        bindings.sort();
        for (id, raw) in bindings {
            let name = conn.backend.sanitize_symbol(&raw);
            if conn.used_names.contains(&name) {
                log::warn!("symbol name `{}` bound twice; {} gets a fresh name", name, id);
                continue;
            }
            conn.used_names.insert(name.clone());
            conn.symbol_names.insert(id, name);
        }
        Ok(conn)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn counts(&self) -> CommandCounts {
        self.counts
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn into_sink(self) -> W {
        self.sink
    }

    /// Number of open solver scopes, counting the outermost one.
    pub fn scope_depth(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| f.kind == FrameKind::Scope)
            .count()
    }

    pub fn in_sandbox(&self) -> bool {
        !self.sandboxes.is_empty()
    }

    /// Solver name chosen for a source symbol, if it has been named.
    pub fn symbol_name(&self, id: Nonce) -> Option<&str> {
        self.symbol_names.get(&id).map(|s| s.as_str())
    }

    fn emit(&mut self, cmd: Command<B::Term>) -> Result<()> {
        if let Some(line) = self.backend.render_command(&cmd) {
            log::trace!("{}", line);
            writeln!(self.sink, "{}", line)?;
            self.sink.flush()?;
            self.counts.record(&cmd);
        }
        Ok(())
    }

    pub fn comment(&mut self, text: &str) -> Result<()> {
        self.emit(Command::Comment(text.to_string()))
    }

    /// A name of the form `prefix!n` not used by any symbol so far.
    pub fn fresh_name(&mut self, prefix: &str) -> String {
        loop {
            let candidate = self
                .backend
                .sanitize_symbol(&format!("{}!{}", prefix, self.next_name));
            self.next_name += 1;
            if self.used_names.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// The solver name of source symbol `id`, choosing one on first use.
    /// Names are never rebound.
    pub fn name_for_symbol(&mut self, id: Nonce, preferred: &str) -> String {
        if let Some(name) = self.symbol_names.get(&id) {
            return name.clone();
        }
        let sanitized = self.backend.sanitize_symbol(preferred);
        let name = if self.used_names.insert(sanitized.clone()) {
            sanitized
        } else {
            self.fresh_name(preferred)
        };
        self.symbol_names.insert(id, name.clone());
        name
    }

    /// Emits the struct declaration for `arity` unless already emitted.
    pub fn declare_struct_arity(&mut self, arity: usize) -> Result<()> {
        if self.struct_arities.insert(arity) {
            self.emit(Command::DeclareStructArity(arity))?;
        }
        Ok(())
    }

    pub(crate) fn ensure_sorts(&mut self, encoding: &Encoding) -> Result<()> {
        let mut arities = Vec::new();
        encoding.struct_arities(&mut arities);
        for arity in arities {
            self.declare_struct_arity(arity)?;
        }
        Ok(())
    }

    pub fn declare_free_symbol(
        &mut self,
        name: &str,
        args: &[Encoding],
        ret: &Encoding,
    ) -> Result<()> {
        for a in args {
            self.ensure_sorts(a)?;
        }
        self.ensure_sorts(ret)?;
        self.emit(Command::DeclareSymbol {
            name: name.to_string(),
            args: args.to_vec(),
            ret: ret.clone(),
        })
    }

    /// Declares an uninterpreted value of the given encoding; a
    /// function-encoded array is declared as a function of its indices.
    pub fn declare_value(&mut self, name: &str, encoding: &Encoding) -> Result<()> {
        match (encoding.is_function_array(), encoding.array_parts()) {
            (true, Some((index, element))) => {
                let (index, element) = (index.to_vec(), element.clone());
                self.declare_free_symbol(name, &index, &element)
            }
            _ => self.declare_free_symbol(name, &[], encoding),
        }
    }

    /// Defines `name`. Without defined-function support the symbol is
    /// declared and its defining equation asserted instead (quantified over
    /// the arguments, if any).
    pub fn define_symbol(
        &mut self,
        name: &str,
        args: &[(String, Encoding)],
        ret: &Encoding,
        body: B::Term,
    ) -> Result<()> {
        for (_, a) in args {
            self.ensure_sorts(a)?;
        }
        self.ensure_sorts(ret)?;
        if self.caps.supports(ProblemFeatures::DEFINED_FUNCTIONS) {
            return self.emit(Command::DefineSymbol {
                name: name.to_string(),
                args: args.to_vec(),
                ret: ret.clone(),
                body,
            });
        }
        let arg_encs: Vec<Encoding> = args.iter().map(|(_, e)| e.clone()).collect();
        if !args.is_empty() {
            self.caps.require(
                ProblemFeatures::QUANTIFIERS,
                Theory::DefinedFunctions,
                &format!("definition of `{}`", name),
                None,
            )?;
        }
        self.declare_free_symbol(name, &arg_encs, ret)?;
        let f = self.backend.symbol(name);
        let params: Vec<B::Term> = args.iter().map(|(n, _)| self.backend.symbol(n)).collect();
        let applied = self.backend.apply(&f, &params);
        let equation = self.backend.eq(&applied, &body);
        let fact = self.backend.forall(args, &equation);
        self.assert_persistent(fact)
    }

    /// Asserts `term`, preceded by a position comment when `loc` differs
    /// from the location of the previous assertion.
    pub fn assert(&mut self, term: B::Term, loc: Option<&ProgramLoc>) -> Result<()> {
        if let Some(loc) = loc {
            if self.last_loc.as_ref() != Some(loc) {
                self.last_loc = Some(loc.clone());
                self.emit(Command::Comment(loc.to_string()))?;
            }
        }
        self.emit(Command::Assert(term))
    }

    /// Asserts a fact that must hold in every scope. It is re-asserted when
    /// the scope it was asserted in is popped.
    pub fn assert_persistent(&mut self, term: B::Term) -> Result<()> {
        let depth = self.scope_depth();
        self.emit(Command::Assert(term.clone()))?;
        self.persistent_asserts.push((depth, term));
        Ok(())
    }

    pub fn push_scope(&mut self) -> Result<()> {
        debug_assert!(!self.in_sandbox());
        self.frames.push(Frame::new(FrameKind::Scope));
        log::debug!("push_scope: depth now {}", self.scope_depth());
        self.emit(Command::Push)
    }

    pub fn pop_scope(&mut self) -> Result<()> {
        let depth = self.scope_depth();
        if depth <= 1 || self.in_sandbox() {
            return Err(BridgeError::ScopeUnderflow { depth });
        }
        self.frames.pop();
        self.emit(Command::Pop)?;
        let new_depth = depth - 1;
        log::debug!("pop_scope: depth now {}", new_depth);
        let mut reassert = Vec::new();
        for (at, term) in self.persistent_asserts.iter_mut() {
            if *at > new_depth {
                *at = new_depth;
                reassert.push(term.clone());
            }
        }
        for term in reassert {
            self.emit(Command::Assert(term))?;
        }
        Ok(())
    }

    /// Searches the frames innermost first. Inside a function-body sandbox,
    /// entries of enclosing sandboxes are local to those sandboxes and are
    /// skipped.
    pub fn lookup_cache(&self, id: Nonce) -> Option<&SolverTerm<B::Term>> {
        let mut skip_sandboxes = false;
        for frame in self.frames.iter().rev() {
            let is_sandbox = matches!(frame.kind, FrameKind::Sandbox(_));
            if skip_sandboxes && is_sandbox {
                continue;
            }
            if let Some(t) = frame.entries.get(&id) {
                return Some(t);
            }
            if frame.kind == FrameKind::Sandbox(SandboxMode::FunctionBody) {
                skip_sandboxes = true;
            }
        }
        None
    }

    pub fn insert_cache(&mut self, id: Nonce, term: SolverTerm<B::Term>, lifetime: CacheLifetime) {
        match lifetime {
            CacheLifetime::PopScoped => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.entries.insert(id, term);
                }
            }
            CacheLifetime::Persistent => {
                for frame in self.frames.iter_mut() {
                    frame.entries.insert(id, term.clone());
                }
            }
        }
    }

    /// Binds `term` to a fresh name: a live definition, or a local `let`
    /// binding inside a sandbox.
    pub fn bind_term(
        &mut self,
        prefix: &str,
        encoding: Encoding,
        term: B::Term,
    ) -> Result<SolverTerm<B::Term>> {
        let name = self.fresh_name(prefix);
        if let Some(sandbox) = self.sandboxes.last_mut() {
            sandbox.bound_defs.push((name.clone(), term));
        } else {
            self.define_symbol(&name, &[], &encoding, term)?;
        }
        Ok(SolverTerm::named(encoding, name))
    }

    /// Introduces an unconstrained constant; inside a sandbox it becomes a
    /// sandbox-local free constant.
    pub fn fresh_constant(
        &mut self,
        prefix: &str,
        encoding: Encoding,
    ) -> Result<SolverTerm<B::Term>> {
        let name = self.fresh_name(prefix);
        if let Some(sandbox) = self.sandboxes.last_mut() {
            sandbox.add_free_constant(name.clone(), encoding.clone())?;
        } else {
            self.declare_value(&name, &encoding)?;
        }
        Ok(SolverTerm::named(encoding, name))
    }

    /// Asserts a side condition now, or records it in the active sandbox.
    pub fn side_condition(&mut self, cond: B::Term, loc: Option<&ProgramLoc>) -> Result<()> {
        if let Some(sandbox) = self.sandboxes.last_mut() {
            sandbox.add_side_condition(cond)
        } else {
            self.assert(cond, loc)
        }
    }

    /// Runs `body` with a fresh cache frame and effect accumulator. Both are
    /// removed again whether or not `body` succeeds.
    pub fn run_sandboxed<F>(
        &mut self,
        mode: SandboxMode,
        context: String,
        body: F,
    ) -> Result<SandboxResult<B::Term>>
    where
        F: FnOnce(&mut Self) -> Result<SolverTerm<B::Term>>,
    {
        self.frames.push(Frame::new(FrameKind::Sandbox(mode)));
        self.sandboxes.push(SandboxState::new(mode, context));
        let result = body(self);
        self.frames.pop();
        let state = self
            .sandboxes
            .pop()
            .expect("sandbox stack is balanced with run_sandboxed");
        Ok(state.finish(result?))
    }

    /// Returns the solver name of `func` for the given argument encodings,
    /// declaring or defining it on first use. `body_compiler` receives the
    /// parameter names and returns the body of a defined function, or `None`
    /// for an uninterpreted one. A later use with different encodings is an
    /// `EncodingMismatch`.
    pub fn get_or_define_function<F>(
        &mut self,
        func: &FnSymbol,
        arg_encodings: &[Encoding],
        ret: &Encoding,
        body_compiler: F,
    ) -> Result<String>
    where
        F: FnOnce(&mut Self, &[(String, Encoding)]) -> Result<Option<B::Term>>,
    {
        if let Some(entry) = self.functions.get(&func.id) {
            if entry.args != arg_encodings || &entry.ret != ret {
                return Err(BridgeError::mismatch(
                    &func.name,
                    format!("{} -> {}", fmt_encodings(&entry.args), entry.ret),
                    format!("{} -> {}", fmt_encodings(arg_encodings), ret),
                ));
            }
            return Ok(entry.name.clone());
        }
        let name = self.name_for_symbol(func.id, &func.name);
        let params: Vec<(String, Encoding)> = arg_encodings
            .iter()
            .enumerate()
            .map(|(i, e)| (self.fresh_name(&format!("{}.arg{}", func.name, i)), e.clone()))
            .collect();
        match body_compiler(self, &params)? {
            Some(body) => {
                log::debug!("defining function `{}` as {}", func.name, name);
                self.define_symbol(&name, &params, ret, body)?;
            }
            None => {
                log::debug!("declaring function `{}` as {}", func.name, name);
                self.declare_free_symbol(&name, arg_encodings, ret)?;
            }
        }
        self.functions.insert(
            func.id,
            FunctionEntry {
                name: name.clone(),
                args: arg_encodings.to_vec(),
                ret: ret.clone(),
            },
        );
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SmtLib2;
    use crate::expr::{BaseType, ExprBuilder};
    use pretty_assertions::assert_eq;

    fn open() -> Connection<SmtLib2, Vec<u8>> {
        Connection::open(Vec::new(), SmtLib2::new(), Capabilities::z3(), SymbolBindings::new())
            .unwrap()
    }

    fn output(conn: &Connection<SmtLib2, Vec<u8>>) -> String {
        String::from_utf8(conn.sink().clone()).unwrap()
    }

    #[test]
    fn test_open_writes_preamble() {
        let conn = open();
        assert_eq!(
            output(&conn),
            "(set-option :produce-models true)\n(set-option :global-declarations true)\n"
        );
        assert_eq!(conn.scope_depth(), 1);
    }

    #[test]
    fn test_pop_of_outermost_scope_underflows() {
        let mut conn = open();
        let err = conn.pop_scope().unwrap_err();
        assert!(matches!(err, BridgeError::ScopeUnderflow { depth: 1 }));
        conn.push_scope().unwrap();
        conn.pop_scope().unwrap();
        assert!(conn.pop_scope().is_err());
    }

    #[test]
    fn test_cache_lifetimes() {
        let mut conn = open();
        let a = Nonce::fresh();
        let b = Nonce::fresh();
        conn.push_scope().unwrap();
        conn.insert_cache(a, SolverTerm::named(Encoding::Bool, "a".to_string()), CacheLifetime::PopScoped);
        conn.insert_cache(b, SolverTerm::named(Encoding::Bool, "b".to_string()), CacheLifetime::Persistent);
        assert!(conn.lookup_cache(a).is_some());
        conn.pop_scope().unwrap();
        assert!(conn.lookup_cache(a).is_none());
        assert_eq!(conn.lookup_cache(b).and_then(|t| t.name()), Some("b"));
    }

    #[test]
    fn test_fresh_names_skip_bound_symbols() {
        let id = Nonce::fresh();
        let bindings: SymbolBindings = maplit::hashmap! { id => "t!0".to_string() };
        let mut conn =
            Connection::open(Vec::new(), SmtLib2::new(), Capabilities::z3(), bindings).unwrap();
        assert_eq!(conn.fresh_name("t"), "t!1");
        assert_eq!(conn.name_for_symbol(id, "ignored"), "t!0");
        let other = Nonce::fresh();
        assert_eq!(conn.name_for_symbol(other, "t!0"), "t!0!2");
    }

    #[test]
    fn test_position_comment_only_on_change() {
        let mut conn = open();
        let loc = ProgramLoc::new("a.c", 1, 2);
        conn.assert("p".to_string(), Some(&loc)).unwrap();
        conn.assert("q".to_string(), Some(&loc)).unwrap();
        let text = output(&conn);
        assert!(text.ends_with("; a.c:1:2\n(assert p)\n(assert q)\n"));
        assert_eq!(conn.counts().comments, 1);
    }

    #[test]
    fn test_persistent_assert_survives_pop() {
        let mut conn = open();
        conn.push_scope().unwrap();
        conn.assert_persistent("(>= n 0)".to_string()).unwrap();
        conn.pop_scope().unwrap();
        assert!(output(&conn).ends_with("(push 1)\n(assert (>= n 0))\n(pop 1)\n(assert (>= n 0))\n"));
    }

    #[test]
    fn test_sandbox_rolls_back_on_error() {
        let mut conn = open();
        let id = Nonce::fresh();
        let res = conn.run_sandboxed(SandboxMode::FunctionBody, "`f`".to_string(), |c| {
            c.insert_cache(id, SolverTerm::named(Encoding::Int, "x".to_string()), CacheLifetime::PopScoped);
            c.fresh_constant("q", Encoding::Int)
        });
        assert!(matches!(res, Err(BridgeError::SandboxViolation { .. })));
        assert!(!conn.in_sandbox());
        assert!(conn.lookup_cache(id).is_none());
        assert_eq!(conn.scope_depth(), 1);
    }

    #[test]
    fn test_function_encodings_are_stable() {
        let mut conn = open();
        let b = ExprBuilder::new();
        let f = b.uninterpreted_fn("f", vec![BaseType::Integer], BaseType::Bool);
        let name = conn
            .get_or_define_function(&f, &[Encoding::Int], &Encoding::Bool, |_, _| Ok(None))
            .unwrap();
        assert_eq!(name, "f");
        let again = conn
            .get_or_define_function(&f, &[Encoding::Int], &Encoding::Bool, |_, _| Ok(None))
            .unwrap();
        assert_eq!(again, "f");
        assert_eq!(conn.counts().declares, 1);
        let err = conn
            .get_or_define_function(&f, &[Encoding::Real], &Encoding::Bool, |_, _| Ok(None))
            .unwrap_err();
        assert!(matches!(err, BridgeError::EncodingMismatch { .. }));
    }
}
