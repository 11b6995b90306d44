// SPDX-License-Identifier: Apache-2.0

//! Extraction of concrete values under a solver-reported model.
//!
//! Subgraphs built only from literals and total operators are computed
//! locally. Anything else is looked up through the connection's caches: a
//! node compiled to a name is queried by that name; a node compiled to an
//! inline term (or not compiled at all) is first computed from its operands
//! and only then queried by its raw term.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::io::Write;

use num_bigint::{BigInt, BigUint};
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::compile::rational_sqrt;
use crate::connection::Connection;
use crate::encoding::{ArrayRepr, Encoding};
use crate::error::{BridgeError, Result};
use crate::expr::{App, BaseType, ExprKind, ExprRef, Literal, Nonce};
use crate::term_algebra::{SolverTerm, TermAlgebra};

/// Largest array index domain decoded by enumeration.
pub const MAX_ENUMERATED_DOMAIN: usize = 256;

/// Primitive model queries, answered by whatever drives the solver process.
pub trait GroundEvalFns<T> {
    fn eval_bool(&mut self, term: &T) -> std::io::Result<bool>;
    /// Unsigned value of a bit-vector term.
    fn eval_bv(&mut self, width: usize, term: &T) -> std::io::Result<BigUint>;
    /// Value of an integer- or real-sorted term.
    fn eval_real(&mut self, term: &T) -> std::io::Result<BigRational>;
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum GroundValue {
    Bool(bool),
    BitVec { width: usize, value: BigUint },
    Nat(BigUint),
    Int(BigInt),
    Real(BigRational),
    Complex(BigRational, BigRational),
    Struct(Vec<GroundValue>),
    /// Explicit points over an optional default. A decoded array lists
    /// every point of its index domain.
    Array {
        default: Option<Box<GroundValue>>,
        entries: BTreeMap<Vec<GroundValue>, GroundValue>,
    },
}

impl GroundValue {
    pub fn from_literal(lit: &Literal) -> Self {
        match lit {
            Literal::Bool(b) => GroundValue::Bool(*b),
            Literal::BitVec { width, value } => GroundValue::BitVec {
                width: *width,
                value: value.clone(),
            },
            Literal::Nat(n) => GroundValue::Nat(n.clone()),
            Literal::Int(i) => GroundValue::Int(i.clone()),
            Literal::Real(r) => GroundValue::Real(r.clone()),
            Literal::Complex(re, im) => GroundValue::Complex(re.clone(), im.clone()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            GroundValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric value of a nat, int or real.
    pub fn as_rational(&self) -> Option<BigRational> {
        match self {
            GroundValue::Nat(n) => Some(BigRational::from_integer(BigInt::from(n.clone()))),
            GroundValue::Int(i) => Some(BigRational::from_integer(i.clone())),
            GroundValue::Real(r) => Some(r.clone()),
            _ => None,
        }
    }

    fn contains_array(&self) -> bool {
        match self {
            GroundValue::Array { .. } => true,
            GroundValue::Struct(fields) => fields.iter().any(|f| f.contains_array()),
            _ => false,
        }
    }
}

impl fmt::Display for GroundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroundValue::Bool(b) => write!(f, "{}", b),
            GroundValue::BitVec { width, value } => write!(f, "{}:bv{}", value, width),
            GroundValue::Nat(n) => write!(f, "{}", n),
            GroundValue::Int(i) => write!(f, "{}", i),
            GroundValue::Real(r) => write!(f, "{}", r),
            GroundValue::Complex(re, im) => write!(f, "({}, {})", re, im),
            GroundValue::Struct(fields) => {
                let parts: Vec<String> = fields.iter().map(|v| v.to_string()).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            GroundValue::Array { default, entries } => {
                let mut parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| {
                        let idx: Vec<String> = k.iter().map(|i| i.to_string()).collect();
                        format!("{} -> {}", idx.join(", "), v)
                    })
                    .collect();
                if let Some(d) = default {
                    parts.push(format!("_ -> {}", d));
                }
                write!(f, "[{}]", parts.join("; "))
            }
        }
    }
}

fn ill_typed(operation: &str, value: &GroundValue) -> BridgeError {
    BridgeError::IllTyped {
        operation: operation.to_string(),
        detail: format!("unexpected operand value {}", value),
    }
}

fn rational(op: &str, v: &GroundValue) -> Result<BigRational> {
    v.as_rational().ok_or_else(|| ill_typed(op, v))
}

fn integer(op: &str, v: &GroundValue) -> Result<BigInt> {
    let r = rational(op, v)?;
    if r.is_integer() {
        Ok(r.to_integer())
    } else {
        Err(ill_typed(op, v))
    }
}

fn boolean(op: &str, v: &GroundValue) -> Result<bool> {
    v.as_bool().ok_or_else(|| ill_typed(op, v))
}

fn bits<'a>(op: &str, v: &'a GroundValue) -> Result<(usize, &'a BigUint)> {
    match v {
        GroundValue::BitVec { width, value } => Ok((*width, value)),
        other => Err(ill_typed(op, other)),
    }
}

fn mask(width: usize) -> BigUint {
    (BigUint::one() << width) - BigUint::one()
}

fn to_signed(width: usize, value: &BigUint) -> BigInt {
    let v = BigInt::from(value.clone());
    if width > 0 && value.bit(width as u64 - 1) {
        v - (BigInt::one() << width)
    } else {
        v
    }
}

fn from_signed(width: usize, value: &BigInt) -> BigUint {
    let modulus = BigInt::one() << width;
    value
        .mod_floor(&modulus)
        .to_biguint()
        .expect("mod_floor by a positive modulus is non-negative")
}

fn bv(width: usize, value: BigUint) -> GroundValue {
    GroundValue::BitVec {
        value: value & mask(width),
        width,
    }
}

/// A numeric result at the type of the node that produced it.
fn numeric(ty: &BaseType, r: BigRational) -> Option<GroundValue> {
    match ty {
        BaseType::Nat if r.is_integer() => r.to_integer().to_biguint().map(GroundValue::Nat),
        BaseType::Integer if r.is_integer() => Some(GroundValue::Int(r.to_integer())),
        BaseType::Real => Some(GroundValue::Real(r)),
        _ => None,
    }
}

/// Applies a total operator to concrete operands. `None` when the operator
/// is undefined at these operands (the solver's model decides the value),
/// or when the result cannot be computed faithfully.
pub fn apply_local(ty: &BaseType, app: &App<GroundValue>) -> Result<Option<GroundValue>> {
    let op = app.operator();
    let v = match app {
        App::Not(a) => GroundValue::Bool(!boolean(op, a)?),
        App::And(xs) => {
            let mut all = true;
            for x in xs {
                all &= boolean(op, x)?;
            }
            GroundValue::Bool(all)
        }
        App::Or(xs) => {
            let mut any = false;
            for x in xs {
                any |= boolean(op, x)?;
            }
            GroundValue::Bool(any)
        }
        App::Xor(a, b) => GroundValue::Bool(boolean(op, a)? != boolean(op, b)?),
        App::Implies(a, b) => GroundValue::Bool(!boolean(op, a)? || boolean(op, b)?),
        App::Ite(c, t, e) => {
            if boolean(op, c)? {
                t.clone()
            } else {
                e.clone()
            }
        }
        App::Eq(a, b) => {
            if a.contains_array() {
                return Ok(None);
            }
            GroundValue::Bool(a == b)
        }
        App::Distinct(xs) => {
            if xs.iter().any(|x| x.contains_array()) {
                return Ok(None);
            }
            let unique: std::collections::BTreeSet<&GroundValue> = xs.iter().collect();
            GroundValue::Bool(unique.len() == xs.len())
        }
        App::Le(a, b) => GroundValue::Bool(rational(op, a)? <= rational(op, b)?),
        App::Lt(a, b) => GroundValue::Bool(rational(op, a)? < rational(op, b)?),

        App::Add(xs) => {
            let mut sum = BigRational::zero();
            for x in xs {
                sum += rational(op, x)?;
            }
            return Ok(numeric(ty, sum));
        }
        App::Sub(a, b) => return Ok(numeric(ty, rational(op, a)? - rational(op, b)?)),
        App::Mul(a, b) => return Ok(numeric(ty, rational(op, a)? * rational(op, b)?)),
        App::Neg(a) => return Ok(numeric(ty, -rational(op, a)?)),
        App::Abs(a) => return Ok(numeric(ty, rational(op, a)?.abs())),
        App::NatDiv(x, y) | App::NatMod(x, y) | App::IntDiv(x, y) | App::IntMod(x, y) => {
            let (x, y) = (integer(op, x)?, integer(op, y)?);
            if y.is_zero() {
                return Ok(None);
            }
            let r = x.mod_floor(&y.abs());
            let q = (&x - &r) / &y;
            let out = match app {
                App::NatDiv(..) | App::IntDiv(..) => q,
                _ => r,
            };
            return Ok(numeric(ty, BigRational::from_integer(out)));
        }
        App::RealDiv(x, y) => {
            let y = rational(op, y)?;
            if y.is_zero() {
                return Ok(None);
            }
            GroundValue::Real(rational(op, x)? / y)
        }
        App::Sqrt(x) => match rational_sqrt(&rational(op, x)?) {
            Some(root) => GroundValue::Real(root),
            None => return Ok(None),
        },
        App::Floor(x) => GroundValue::Int(rational(op, x)?.floor().to_integer()),
        App::Ceiling(x) => GroundValue::Int(rational(op, x)?.ceil().to_integer()),
        App::Round(x) => GroundValue::Int(rational(op, x)?.round().to_integer()),
        App::NatToInt(x) => GroundValue::Int(integer(op, x)?),
        App::IntToReal(x) => GroundValue::Real(rational(op, x)?),
        App::IntToNat(x) => {
            let i = integer(op, x)?;
            GroundValue::Nat(i.to_biguint().unwrap_or_default())
        }
        App::BvToInt { arg, signed } => {
            let (w, v) = bits(op, arg)?;
            if *signed {
                GroundValue::Int(to_signed(w, v))
            } else {
                GroundValue::Int(BigInt::from(v.clone()))
            }
        }
        App::IntToBv { arg, width } => bv(*width, from_signed(*width, &integer(op, arg)?)),

        App::BvUlt(a, b) | App::BvUle(a, b) | App::BvSlt(a, b) | App::BvSle(a, b) => {
            let ((w, x), (_, y)) = (bits(op, a)?, bits(op, b)?);
            let holds = match app {
                App::BvUlt(..) => x < y,
                App::BvUle(..) => x <= y,
                App::BvSlt(..) => to_signed(w, x) < to_signed(w, y),
                _ => to_signed(w, x) <= to_signed(w, y),
            };
            GroundValue::Bool(holds)
        }
        App::BvAdd(a, b)
        | App::BvSub(a, b)
        | App::BvMul(a, b)
        | App::BvUdiv(a, b)
        | App::BvUrem(a, b)
        | App::BvSdiv(a, b)
        | App::BvSrem(a, b)
        | App::BvAnd(a, b)
        | App::BvOr(a, b)
        | App::BvXor(a, b)
        | App::BvShl(a, b)
        | App::BvLshr(a, b)
        | App::BvAshr(a, b) => {
            let ((w, x), (_, y)) = (bits(op, a)?, bits(op, b)?);
            bv(w, bv_binary(app, w, x, y))
        }
        App::BvConcat(a, b) => {
            let ((wa, x), (wb, y)) = (bits(op, a)?, bits(op, b)?);
            bv(wa + wb, (x << wb) | y)
        }
        App::BvNeg(a) => {
            let (w, x) = bits(op, a)?;
            bv(w, (BigUint::one() << w) - x)
        }
        App::BvNot(a) => {
            let (w, x) = bits(op, a)?;
            bv(w, mask(w) ^ x)
        }
        App::BvExtract { arg, high, low } => {
            let (_, x) = bits(op, arg)?;
            bv(high - low + 1, x >> *low)
        }
        App::BvZext { arg, width } => bv(*width, bits(op, arg)?.1.clone()),
        App::BvSext { arg, width } => {
            let (w, x) = bits(op, arg)?;
            bv(*width, from_signed(*width, &to_signed(w, x)))
        }

        App::Select { array, indices } => match array {
            GroundValue::Array { default, entries } => {
                match entries.get(indices).or(default.as_deref()) {
                    Some(v) => v.clone(),
                    None => return Ok(None),
                }
            }
            other => return Err(ill_typed(op, other)),
        },
        App::Update {
            array,
            indices,
            value,
        } => {
            let mut out = array.clone();
            match &mut out {
                GroundValue::Array { entries, .. } => {
                    entries.insert(indices.clone(), value.clone());
                }
                other => return Err(ill_typed(op, other)),
            }
            out
        }
        App::ArrayMap { base, updates } => {
            let mut out = base.clone();
            match &mut out {
                GroundValue::Array { entries, .. } => {
                    for (indices, value) in updates {
                        let key = indices.iter().map(GroundValue::from_literal).collect();
                        entries.insert(key, value.clone());
                    }
                }
                other => return Err(ill_typed(op, other)),
            }
            out
        }
        App::ConstArray { value, .. } => GroundValue::Array {
            default: Some(Box::new(value.clone())),
            entries: BTreeMap::new(),
        },
        App::MkStruct(fields) => GroundValue::Struct(fields.clone()),
        App::StructField { arg, index } => match arg {
            GroundValue::Struct(fields) if *index < fields.len() => fields[*index].clone(),
            other => return Err(ill_typed(op, other)),
        },
        App::MkComplex(re, im) => GroundValue::Complex(rational(op, re)?, rational(op, im)?),
        App::RealPart(c) | App::ImagPart(c) => match c {
            GroundValue::Complex(re, im) => match app {
                App::RealPart(..) => GroundValue::Real(re.clone()),
                _ => GroundValue::Real(im.clone()),
            },
            other => return Err(ill_typed(op, other)),
        },
    };
    Ok(Some(v))
}

/// Bit-vector arithmetic with SMT-LIB semantics for division by zero.
fn bv_binary(app: &App<GroundValue>, w: usize, x: &BigUint, y: &BigUint) -> BigUint {
    let shift = |amount: &BigUint| amount.to_usize().filter(|s| *s < w);
    match app {
        App::BvAdd(..) => x + y,
        App::BvSub(..) => (BigUint::one() << w) + x - y,
        App::BvMul(..) => x * y,
        App::BvUdiv(..) if y.is_zero() => mask(w),
        App::BvUdiv(..) => x / y,
        App::BvUrem(..) if y.is_zero() => x.clone(),
        App::BvUrem(..) => x % y,
        App::BvSdiv(..) => {
            let (sx, sy) = (to_signed(w, x), to_signed(w, y));
            if sy.is_zero() {
                if sx.is_negative() {
                    BigUint::one()
                } else {
                    mask(w)
                }
            } else {
                from_signed(w, &(sx / sy))
            }
        }
        App::BvSrem(..) => {
            let (sx, sy) = (to_signed(w, x), to_signed(w, y));
            if sy.is_zero() {
                x.clone()
            } else {
                from_signed(w, &(sx % sy))
            }
        }
        App::BvAnd(..) => x & y,
        App::BvOr(..) => x | y,
        App::BvXor(..) => x ^ y,
        App::BvShl(..) => match shift(y) {
            Some(s) => x << s,
            None => BigUint::zero(),
        },
        App::BvLshr(..) => match shift(y) {
            Some(s) => x >> s,
            None => BigUint::zero(),
        },
        App::BvAshr(..) => {
            let sx = to_signed(w, x);
            let shifted = match shift(y) {
                Some(s) => sx >> s,
                None if sx.is_negative() => -BigInt::one(),
                None => BigInt::zero(),
            };
            from_signed(w, &shifted)
        }
        _ => unreachable!("bv_binary called with {}", app.operator()),
    }
}

/// Every point of a finite index domain, if it has at most
/// [`MAX_ENUMERATED_DOMAIN`] points.
fn enumerate_domain(index: &[BaseType]) -> Option<Vec<Vec<GroundValue>>> {
    let mut points: Vec<Vec<GroundValue>> = vec![Vec::new()];
    for ty in index {
        let values: Vec<GroundValue> = match ty {
            BaseType::Bool => vec![GroundValue::Bool(false), GroundValue::Bool(true)],
            BaseType::BitVec(w) if *w <= 8 => (0u32..(1u32 << w))
                .map(|v| GroundValue::BitVec {
                    width: *w,
                    value: BigUint::from(v),
                })
                .collect(),
            _ => return None,
        };
        if points.len() * values.len() > MAX_ENUMERATED_DOMAIN {
            return None;
        }
        points = points
            .iter()
            .flat_map(|p| {
                values.iter().map(move |v| {
                    let mut q = p.clone();
                    q.push(v.clone());
                    q
                })
            })
            .collect();
    }
    Some(points)
}

fn index_term<B: TermAlgebra>(b: &B, v: &GroundValue) -> B::Term {
    match v {
        GroundValue::BitVec { width, value } => b.bv_lit(*width, value),
        GroundValue::Bool(x) => b.bool_lit(*x),
        _ => unreachable!("only bool and bit-vector indices are enumerated"),
    }
}

fn model_decode(term: &impl fmt::Display, reason: impl fmt::Display) -> BridgeError {
    BridgeError::ModelDecode {
        term: term.to_string(),
        reason: reason.to_string(),
    }
}

fn real<T: fmt::Display, F: GroundEvalFns<T>>(fns: &mut F, t: &T) -> Result<BigRational> {
    fns.eval_real(t).map_err(|e| model_decode(t, e))
}

/// Decodes the model value of `term`, which has encoding `enc` and source
/// type `ty`.
fn decode<B, F>(
    b: &B,
    fns: &mut F,
    term: &B::Term,
    enc: &Encoding,
    ty: &BaseType,
) -> Result<GroundValue>
where
    B: TermAlgebra,
    F: GroundEvalFns<B::Term>,
{
    Ok(match (enc, ty) {
        (Encoding::Bool, _) => {
            GroundValue::Bool(fns.eval_bool(term).map_err(|e| model_decode(term, e))?)
        }
        (Encoding::BitVec(w), _) => GroundValue::BitVec {
            width: *w,
            value: fns
                .eval_bv(*w, term)
                .map_err(|e| model_decode(term, e))?,
        },
        (Encoding::Int, _) => {
            let r = real(fns, term)?;
            if !r.is_integer() {
                return Err(model_decode(term, format!("non-integral value {}", r)));
            }
            let i = r.to_integer();
            if *ty == BaseType::Nat {
                match i.to_biguint() {
                    Some(n) => GroundValue::Nat(n),
                    None => return Err(model_decode(term, format!("negative natural {}", i))),
                }
            } else {
                GroundValue::Int(i)
            }
        }
        (Encoding::Real, _) => GroundValue::Real(real(fns, term)?),
        (Encoding::ComplexStruct, _) => GroundValue::Complex(
            real(fns, &b.struct_field(2, 0, term))?,
            real(fns, &b.struct_field(2, 1, term))?,
        ),
        (Encoding::ComplexArray, _) => GroundValue::Complex(
            real(fns, &b.select(term, &b.bool_lit(false)))?,
            real(fns, &b.select(term, &b.bool_lit(true)))?,
        ),
        (Encoding::Struct(fields), BaseType::Struct(tys)) if fields.len() == tys.len() => {
            let mut values = Vec::with_capacity(fields.len());
            for (i, (fe, ft)) in fields.iter().zip(tys).enumerate() {
                let field = b.struct_field(fields.len(), i, term);
                values.push(decode(b, fns, &field, fe, ft)?);
            }
            GroundValue::Struct(values)
        }
        (
            Encoding::Array {
                element: elem_enc,
                repr,
                ..
            },
            BaseType::Array { index, element },
        ) => {
            let points = enumerate_domain(index).ok_or_else(|| {
                model_decode(
                    term,
                    format!(
                        "index domain of {} has more than {} points",
                        ty, MAX_ENUMERATED_DOMAIN
                    ),
                )
            })?;
            let mut entries = BTreeMap::new();
            for point in points {
                let idx: Vec<B::Term> = point.iter().map(|v| index_term(b, v)).collect();
                let at = match (repr, idx.as_slice()) {
                    (ArrayRepr::Function, _) => b.apply(term, &idx),
                    (ArrayRepr::Native, [single]) => b.select(term, single),
                    (ArrayRepr::Native, _) => b.select(term, &b.mk_struct(&idx)),
                };
                let value = decode(b, fns, &at, elem_enc, element)?;
                entries.insert(point, value);
            }
            GroundValue::Array {
                default: None,
                entries,
            }
        }
        _ => {
            return Err(model_decode(
                term,
                format!("encoding {} does not represent {}", enc, ty),
            ))
        }
    })
}

/// Per-model evaluation state. Values are cached by node identity; start a
/// new evaluator (or call [`Evaluator::clear`]) when the model changes.
#[derive(Debug, Default)]
pub struct Evaluator {
    values: HashMap<Nonce, GroundValue>,
    non_local: HashSet<Nonce>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.non_local.clear();
    }

    /// Value of `expr` if it is computable from literals alone.
    pub fn evaluate_local(&mut self, expr: &ExprRef) -> Result<Option<GroundValue>> {
        if let Some(v) = self.values.get(&expr.id) {
            return Ok(Some(v.clone()));
        }
        if self.non_local.contains(&expr.id) {
            return Ok(None);
        }
        let value = match &expr.kind {
            ExprKind::Literal(lit) => Some(GroundValue::from_literal(lit)),
            ExprKind::App(app) => {
                let mut local = true;
                for operand in app.operands() {
                    if self.evaluate_local(operand)?.is_none() {
                        local = false;
                        break;
                    }
                }
                if local {
                    let operands = app.try_map(|c| self.known(c))?;
                    apply_local(&expr.ty, &operands)?
                } else {
                    None
                }
            }
            _ => None,
        };
        match &value {
            Some(v) => {
                self.values.insert(expr.id, v.clone());
            }
            None => {
                self.non_local.insert(expr.id);
            }
        }
        Ok(value)
    }

    fn known(&self, expr: &ExprRef) -> Result<GroundValue> {
        self.values
            .get(&expr.id)
            .cloned()
            .ok_or_else(|| BridgeError::NotCompiled {
                expr: expr.describe(),
            })
    }

    /// Value of `expr` under the model answered by `fns`.
    pub fn evaluate<B, W, F>(
        &mut self,
        conn: &Connection<B, W>,
        fns: &mut F,
        expr: &ExprRef,
    ) -> Result<GroundValue>
    where
        B: TermAlgebra,
        W: Write,
        F: GroundEvalFns<B::Term>,
    {
        if let Some(v) = self.evaluate_local(expr)? {
            return Ok(v);
        }
        if let Some(v) = self.values.get(&expr.id) {
            return Ok(v.clone());
        }
        let key = match &expr.kind {
            ExprKind::Var(var) => var.id,
            _ => expr.id,
        };
        let cached: Option<SolverTerm<B::Term>> = conn.lookup_cache(key).cloned();
        let value = match cached {
            Some(t) if t.name().is_some() => self.query(conn, fns, &t, &expr.ty)?,
            cached => match self.evaluate_from_operands(conn, fns, expr)? {
                Some(v) => v,
                None => match cached {
                    Some(t) => self.query(conn, fns, &t, &expr.ty)?,
                    None => {
                        return Err(BridgeError::NotCompiled {
                            expr: expr.describe(),
                        })
                    }
                },
            },
        };
        log::trace!("{} evaluates to {}", expr.describe(), value);
        self.values.insert(expr.id, value.clone());
        Ok(value)
    }

    fn evaluate_from_operands<B, W, F>(
        &mut self,
        conn: &Connection<B, W>,
        fns: &mut F,
        expr: &ExprRef,
    ) -> Result<Option<GroundValue>>
    where
        B: TermAlgebra,
        W: Write,
        F: GroundEvalFns<B::Term>,
    {
        match &expr.kind {
            ExprKind::App(app) => {
                let operands = app.try_map(|c| self.evaluate(conn, fns, c))?;
                apply_local(&expr.ty, &operands)
            }
            _ => Ok(None),
        }
    }

    fn query<B, W, F>(
        &self,
        conn: &Connection<B, W>,
        fns: &mut F,
        t: &SolverTerm<B::Term>,
        ty: &BaseType,
    ) -> Result<GroundValue>
    where
        B: TermAlgebra,
        W: Write,
        F: GroundEvalFns<B::Term>,
    {
        let b = conn.backend();
        decode(b, fns, &t.term(b), &t.encoding, ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::SmtLib2;
    use crate::capabilities::Capabilities;
    use crate::connection::SymbolBindings;
    use crate::expr::ExprBuilder;
    use crate::test_utils::MapModel;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn open() -> Connection<SmtLib2, Vec<u8>> {
        Connection::open(Vec::new(), SmtLib2::new(), Capabilities::z3(), SymbolBindings::new())
            .unwrap()
    }

    fn bv4(v: u64) -> GroundValue {
        GroundValue::BitVec {
            width: 4,
            value: BigUint::from(v),
        }
    }

    #[test_case(App::BvUdiv(bv4(5), bv4(0)), bv4(15); "udiv by zero is all ones")]
    #[test_case(App::BvUrem(bv4(5), bv4(0)), bv4(5); "urem by zero is dividend")]
    #[test_case(App::BvSdiv(bv4(0b1010), bv4(0)), bv4(1); "sdiv of negative by zero")]
    #[test_case(App::BvSdiv(bv4(0b1010), bv4(2)), bv4(0b1101); "sdiv truncates")]
    #[test_case(App::BvAshr(bv4(0b1000), bv4(9)), bv4(0b1111); "ashr saturates")]
    #[test_case(App::BvSub(bv4(1), bv4(2)), bv4(15); "sub wraps")]
    fn test_bv_semantics(app: App<GroundValue>, expected: GroundValue) {
        let v = apply_local(&BaseType::BitVec(4), &app).unwrap();
        assert_eq!(v, Some(expected));
    }

    #[test]
    fn test_int_division_is_euclidean() {
        let q = apply_local(
            &BaseType::Integer,
            &App::IntDiv(GroundValue::Int((-7).into()), GroundValue::Int(2.into())),
        )
        .unwrap();
        assert_eq!(q, Some(GroundValue::Int((-4).into())));
        let undefined = apply_local(
            &BaseType::Integer,
            &App::IntMod(GroundValue::Int(7.into()), GroundValue::Int(0.into())),
        )
        .unwrap();
        assert_eq!(undefined, None);
    }

    #[test]
    fn test_literal_subgraph_needs_no_model() {
        let conn = open();
        let b = ExprBuilder::new();
        let sum = b
            .app(App::Add(vec![
                b.literal(Literal::int(2)),
                b.literal(Literal::int(3)),
            ]))
            .unwrap();
        let prod = b.app(App::Mul(sum, b.literal(Literal::int(4)))).unwrap();
        let mut model = MapModel::new();
        let v = Evaluator::new().evaluate(&conn, &mut model, &prod).unwrap();
        assert_eq!(v, GroundValue::Int(20.into()));
        assert!(model.queries().is_empty());
    }

    #[test]
    fn test_uncompiled_node_is_computed_from_operands() {
        let mut conn = open();
        let b = ExprBuilder::new();
        let x = b.free_var("x", BaseType::Real);
        conn.compile(&x).unwrap();
        let fl = b.app(App::Floor(x)).unwrap();
        let mut model = MapModel::new().with_real("x", 37, 10);
        let v = Evaluator::new().evaluate(&conn, &mut model, &fl).unwrap();
        assert_eq!(v, GroundValue::Int(3.into()));
        assert_eq!(model.queries(), &["x".to_string()]);
    }

    #[test]
    fn test_never_compiled_variable() {
        let conn = open();
        let b = ExprBuilder::new();
        let y = b.free_var("y", BaseType::Bool);
        let err = Evaluator::new()
            .evaluate(&conn, &mut MapModel::new(), &y)
            .unwrap_err();
        assert!(matches!(err, BridgeError::NotCompiled { .. }));
    }

    #[test]
    fn test_small_array_is_enumerated() {
        let mut conn = open();
        let b = ExprBuilder::new();
        let a = b.free_var("a", BaseType::new_array(vec![BaseType::Bool], BaseType::Integer));
        conn.compile(&a).unwrap();
        let mut model = MapModel::new()
            .with_int("(select a false)", 4)
            .with_int("(select a true)", -1);
        let v = Evaluator::new().evaluate(&conn, &mut model, &a).unwrap();
        let mut entries = BTreeMap::new();
        entries.insert(vec![GroundValue::Bool(false)], GroundValue::Int(4.into()));
        entries.insert(vec![GroundValue::Bool(true)], GroundValue::Int((-1).into()));
        assert_eq!(
            v,
            GroundValue::Array {
                default: None,
                entries
            }
        );
    }

    #[test]
    fn test_failed_query_is_model_decode_error() {
        let mut conn = open();
        let b = ExprBuilder::new();
        let n = b.free_var("n", BaseType::Nat);
        conn.compile(&n).unwrap();
        let err = Evaluator::new()
            .evaluate(&conn, &mut MapModel::new(), &n)
            .unwrap_err();
        assert!(matches!(err, BridgeError::ModelDecode { ref term, .. } if term == "n"));
        let mut negative = MapModel::new().with_int("n", -2);
        let err = Evaluator::new()
            .evaluate(&conn, &mut negative, &n)
            .unwrap_err();
        assert!(err.to_string().contains("negative natural -2"));
    }
}
