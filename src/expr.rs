// SPDX-License-Identifier: Apache-2.0

//! The typed, shared expression graph consumed by the compiler.
//!
//! Nodes are immutable and reference-counted; identity is a process-unique
//! nonce assigned at construction, never structural equality. Two
//! structurally identical nodes built separately are distinct for
//! memoization purposes.
//!
//! Every node carries a runtime [`BaseType`] tag. [`ExprBuilder`] checks the
//! operand types of each operator application when the node is built, so
//! the compiler only ever sees well-typed graphs.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseType {
    Bool,
    BitVec(usize),
    Nat,
    Integer,
    Real,
    Complex,
    Array {
        index: Vec<BaseType>,
        element: Box<BaseType>,
    },
    Struct(Vec<BaseType>),
}

impl BaseType {
    pub fn new_array(index: Vec<BaseType>, element: BaseType) -> Self {
        BaseType::Array {
            index,
            element: Box::new(element),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, BaseType::Nat | BaseType::Integer | BaseType::Real)
    }

    pub fn bit_width(&self) -> Option<usize> {
        match self {
            BaseType::BitVec(w) => Some(*w),
            _ => None,
        }
    }

    /// Rejects types no solver can represent: bit-vectors of width zero,
    /// here or nested in an array or struct.
    pub fn check_well_formed(&self) -> Result<()> {
        match self {
            BaseType::BitVec(0) => Err(ill_typed("type", "zero-width bit-vector".to_string())),
            BaseType::Array { index, element } => {
                for i in index {
                    i.check_well_formed()?;
                }
                element.check_well_formed()
            }
            BaseType::Struct(fields) => fields.iter().try_for_each(|f| f.check_well_formed()),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BaseType::Bool => write!(f, "bool"),
            BaseType::BitVec(w) => write!(f, "bv{}", w),
            BaseType::Nat => write!(f, "nat"),
            BaseType::Integer => write!(f, "int"),
            BaseType::Real => write!(f, "real"),
            BaseType::Complex => write!(f, "complex"),
            BaseType::Array { index, element } => {
                write!(f, "array[")?;
                for (i, t) in index.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, " -> {}]", element)
            }
            BaseType::Struct(fields) => {
                write!(f, "struct{{")?;
                for (i, t) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Source location of the construct that produced a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProgramLoc {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

impl ProgramLoc {
    pub fn new(file: &str, line: u32, col: u32) -> Self {
        ProgramLoc {
            file: file.to_string(),
            line,
            col,
        }
    }
}

impl fmt::Display for ProgramLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

/// Process-unique identity of a node, variable or function symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nonce(u64);

static NEXT_NONCE: AtomicU64 = AtomicU64::new(1);

impl Nonce {
    pub fn fresh() -> Self {
        Nonce(NEXT_NONCE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get_wrapped_id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "LiteralRepr", into = "LiteralRepr")]
pub enum Literal {
    Bool(bool),
    BitVec { width: usize, value: BigUint },
    Nat(BigUint),
    Int(BigInt),
    Real(BigRational),
    Complex(BigRational, BigRational),
}

impl Literal {
    /// `value` wrapped to `width` bits. A zero `width` yields a literal of
    /// type `bv0`, which fails [`BaseType::check_well_formed`].
    pub fn bv(width: usize, value: u64) -> Self {
        let modulus = BigUint::from(1u8) << width;
        Literal::BitVec {
            width,
            value: BigUint::from(value) % modulus,
        }
    }

    pub fn int(value: i64) -> Self {
        Literal::Int(BigInt::from(value))
    }

    pub fn nat(value: u64) -> Self {
        Literal::Nat(BigUint::from(value))
    }

    pub fn real(numer: i64, denom: i64) -> Self {
        Literal::Real(BigRational::new(BigInt::from(numer), BigInt::from(denom)))
    }

    pub fn base_type(&self) -> BaseType {
        match self {
            Literal::Bool(_) => BaseType::Bool,
            Literal::BitVec { width, .. } => BaseType::BitVec(*width),
            Literal::Nat(_) => BaseType::Nat,
            Literal::Int(_) => BaseType::Integer,
            Literal::Real(_) => BaseType::Real,
            Literal::Complex(..) => BaseType::Complex,
        }
    }
}

/// Interchange form of [`Literal`]: numbers are decimal strings (rationals as
/// `n/d`) so graph files stay readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum LiteralRepr {
    Bool(bool),
    BitVec { width: usize, value: String },
    Nat(String),
    Int(String),
    Real(String),
    Complex { re: String, im: String },
}

fn parse_num<T: std::str::FromStr>(what: &str, s: &str) -> std::result::Result<T, String> {
    s.trim()
        .parse::<T>()
        .map_err(|_| format!("invalid {} literal `{}`", what, s))
}

impl TryFrom<LiteralRepr> for Literal {
    type Error = String;

    fn try_from(repr: LiteralRepr) -> std::result::Result<Self, Self::Error> {
        Ok(match repr {
            LiteralRepr::Bool(b) => Literal::Bool(b),
            LiteralRepr::BitVec { width, value } => {
                if width == 0 {
                    return Err("bit-vector literal must have positive width".to_string());
                }
                let value: BigUint = parse_num("bit-vector", &value)?;
                if value.bits() > width as u64 {
                    return Err(format!("value {} does not fit in {} bits", value, width));
                }
                Literal::BitVec { width, value }
            }
            LiteralRepr::Nat(s) => Literal::Nat(parse_num("nat", &s)?),
            LiteralRepr::Int(s) => Literal::Int(parse_num("int", &s)?),
            LiteralRepr::Real(s) => Literal::Real(parse_num("real", &s)?),
            LiteralRepr::Complex { re, im } => {
                Literal::Complex(parse_num("real", &re)?, parse_num("real", &im)?)
            }
        })
    }
}

impl From<Literal> for LiteralRepr {
    fn from(lit: Literal) -> Self {
        match lit {
            Literal::Bool(b) => LiteralRepr::Bool(b),
            Literal::BitVec { width, value } => LiteralRepr::BitVec {
                width,
                value: value.to_string(),
            },
            Literal::Nat(n) => LiteralRepr::Nat(n.to_string()),
            Literal::Int(i) => LiteralRepr::Int(i.to_string()),
            Literal::Real(r) => LiteralRepr::Real(r.to_string()),
            Literal::Complex(re, im) => LiteralRepr::Complex {
                re: re.to_string(),
                im: im.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKind {
    /// A free constant the solver chooses a value for.
    #[default]
    Uninterpreted,
    /// Bound by a quantifier.
    Quantified,
    /// A parameter of a defined function.
    FnParam,
}

#[derive(Debug)]
pub struct BoundVar {
    pub id: Nonce,
    pub name: String,
    pub ty: BaseType,
    pub kind: VarKind,
    pub loc: Option<ProgramLoc>,
}

#[derive(Debug)]
pub enum FnBody {
    Uninterpreted,
    Defined {
        params: Vec<Rc<BoundVar>>,
        body: ExprRef,
    },
}

#[derive(Debug)]
pub struct FnSymbol {
    pub id: Nonce,
    pub name: String,
    pub arg_types: Vec<BaseType>,
    pub ret_type: BaseType,
    pub body: FnBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantifier {
    Forall,
    Exists,
}

/// Operator applications, generic over the operand reference so the same
/// shape serves both the in-memory graph (`App<ExprRef>`) and the
/// interchange format (`App<usize>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum App<E> {
    Not(E),
    And(Vec<E>),
    Or(Vec<E>),
    Xor(E, E),
    Implies(E, E),
    Ite(E, E, E),
    Eq(E, E),
    Distinct(Vec<E>),

    Le(E, E),
    Lt(E, E),
    Add(Vec<E>),
    Sub(E, E),
    Mul(E, E),
    Neg(E),
    Abs(E),
    NatDiv(E, E),
    NatMod(E, E),
    IntDiv(E, E),
    IntMod(E, E),
    RealDiv(E, E),
    Sqrt(E),
    Floor(E),
    Ceiling(E),
    /// Round to nearest, ties away from zero.
    Round(E),
    NatToInt(E),
    /// Accepts natural or integer operands.
    IntToReal(E),
    /// Clamps negative values to zero.
    IntToNat(E),
    BvToInt { arg: E, signed: bool },
    /// Wrap-around conversion into a `width`-bit vector.
    IntToBv { arg: E, width: usize },

    BvUlt(E, E),
    BvUle(E, E),
    BvSlt(E, E),
    BvSle(E, E),
    BvAdd(E, E),
    BvSub(E, E),
    BvMul(E, E),
    BvNeg(E),
    BvUdiv(E, E),
    BvUrem(E, E),
    BvSdiv(E, E),
    BvSrem(E, E),
    BvAnd(E, E),
    BvOr(E, E),
    BvXor(E, E),
    BvNot(E),
    BvShl(E, E),
    BvLshr(E, E),
    BvAshr(E, E),
    BvConcat(E, E),
    BvExtract { arg: E, high: usize, low: usize },
    /// Extends to `width` total bits.
    BvZext { arg: E, width: usize },
    BvSext { arg: E, width: usize },

    Select { array: E, indices: Vec<E> },
    Update { array: E, indices: Vec<E>, value: E },
    /// Point updates at literal indices applied over `base`.
    ArrayMap { base: E, updates: Vec<(Vec<Literal>, E)> },
    ConstArray { index: Vec<BaseType>, value: E },

    MkStruct(Vec<E>),
    StructField { arg: E, index: usize },

    MkComplex(E, E),
    RealPart(E),
    ImagPart(E),
}

impl<E> App<E> {
    pub fn operator(&self) -> &'static str {
        match self {
            App::Not(..) => "not",
            App::And(..) => "and",
            App::Or(..) => "or",
            App::Xor(..) => "xor",
            App::Implies(..) => "implies",
            App::Ite(..) => "ite",
            App::Eq(..) => "eq",
            App::Distinct(..) => "distinct",
            App::Le(..) => "le",
            App::Lt(..) => "lt",
            App::Add(..) => "add",
            App::Sub(..) => "sub",
            App::Mul(..) => "mul",
            App::Neg(..) => "neg",
            App::Abs(..) => "abs",
            App::NatDiv(..) => "nat_div",
            App::NatMod(..) => "nat_mod",
            App::IntDiv(..) => "int_div",
            App::IntMod(..) => "int_mod",
            App::RealDiv(..) => "real_div",
            App::Sqrt(..) => "sqrt",
            App::Floor(..) => "floor",
            App::Ceiling(..) => "ceiling",
            App::Round(..) => "round",
            App::NatToInt(..) => "nat_to_int",
            App::IntToReal(..) => "int_to_real",
            App::IntToNat(..) => "int_to_nat",
            App::BvToInt { .. } => "bv_to_int",
            App::IntToBv { .. } => "int_to_bv",
            App::BvUlt(..) => "bvult",
            App::BvUle(..) => "bvule",
            App::BvSlt(..) => "bvslt",
            App::BvSle(..) => "bvsle",
            App::BvAdd(..) => "bvadd",
            App::BvSub(..) => "bvsub",
            App::BvMul(..) => "bvmul",
            App::BvNeg(..) => "bvneg",
            App::BvUdiv(..) => "bvudiv",
            App::BvUrem(..) => "bvurem",
            App::BvSdiv(..) => "bvsdiv",
            App::BvSrem(..) => "bvsrem",
            App::BvAnd(..) => "bvand",
            App::BvOr(..) => "bvor",
            App::BvXor(..) => "bvxor",
            App::BvNot(..) => "bvnot",
            App::BvShl(..) => "bvshl",
            App::BvLshr(..) => "bvlshr",
            App::BvAshr(..) => "bvashr",
            App::BvConcat(..) => "concat",
            App::BvExtract { .. } => "extract",
            App::BvZext { .. } => "zero_extend",
            App::BvSext { .. } => "sign_extend",
            App::Select { .. } => "select",
            App::Update { .. } => "update",
            App::ArrayMap { .. } => "array_map",
            App::ConstArray { .. } => "const_array",
            App::MkStruct(..) => "mk_struct",
            App::StructField { .. } => "struct_field",
            App::MkComplex(..) => "mk_complex",
            App::RealPart(..) => "real_part",
            App::ImagPart(..) => "imag_part",
        }
    }

    /// Operands in evaluation order.
    pub fn operands(&self) -> Vec<&E> {
        match self {
            App::Not(a)
            | App::Neg(a)
            | App::Abs(a)
            | App::Sqrt(a)
            | App::Floor(a)
            | App::Ceiling(a)
            | App::Round(a)
            | App::NatToInt(a)
            | App::IntToReal(a)
            | App::IntToNat(a)
            | App::BvToInt { arg: a, .. }
            | App::IntToBv { arg: a, .. }
            | App::BvNeg(a)
            | App::BvNot(a)
            | App::BvExtract { arg: a, .. }
            | App::BvZext { arg: a, .. }
            | App::BvSext { arg: a, .. }
            | App::ConstArray { value: a, .. }
            | App::StructField { arg: a, .. }
            | App::RealPart(a)
            | App::ImagPart(a) => vec![a],
            App::And(xs) | App::Or(xs) | App::Distinct(xs) | App::Add(xs) | App::MkStruct(xs) => {
                xs.iter().collect()
            }
            App::Xor(a, b)
            | App::Implies(a, b)
            | App::Eq(a, b)
            | App::Le(a, b)
            | App::Lt(a, b)
            | App::Sub(a, b)
            | App::Mul(a, b)
            | App::NatDiv(a, b)
            | App::NatMod(a, b)
            | App::IntDiv(a, b)
            | App::IntMod(a, b)
            | App::RealDiv(a, b)
            | App::BvUlt(a, b)
            | App::BvUle(a, b)
            | App::BvSlt(a, b)
            | App::BvSle(a, b)
            | App::BvAdd(a, b)
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
            | App::BvAshr(a, b)
            | App::BvConcat(a, b)
            | App::MkComplex(a, b) => vec![a, b],
            App::Ite(c, t, e) => vec![c, t, e],
            App::Select { array, indices } => {
                let mut v = vec![array];
                v.extend(indices.iter());
                v
            }
            App::Update {
                array,
                indices,
                value,
            } => {
                let mut v = vec![array];
                v.extend(indices.iter());
                v.push(value);
                v
            }
            App::ArrayMap { base, updates } => {
                let mut v = vec![base];
                v.extend(updates.iter().map(|(_, e)| e));
                v
            }
        }
    }

    /// Rebuilds the application with every operand mapped through `f`.
    pub fn try_map<R, F>(&self, mut f: F) -> Result<App<R>>
    where
        F: FnMut(&E) -> Result<R>,
    {
        let many = |xs: &Vec<E>, f: &mut F| -> Result<Vec<R>> { xs.iter().map(|x| f(x)).collect() };
        Ok(match self {
            App::Not(a) => App::Not(f(a)?),
            App::And(xs) => App::And(many(xs, &mut f)?),
            App::Or(xs) => App::Or(many(xs, &mut f)?),
            App::Xor(a, b) => App::Xor(f(a)?, f(b)?),
            App::Implies(a, b) => App::Implies(f(a)?, f(b)?),
            App::Ite(c, t, e) => App::Ite(f(c)?, f(t)?, f(e)?),
            App::Eq(a, b) => App::Eq(f(a)?, f(b)?),
            App::Distinct(xs) => App::Distinct(many(xs, &mut f)?),
            App::Le(a, b) => App::Le(f(a)?, f(b)?),
            App::Lt(a, b) => App::Lt(f(a)?, f(b)?),
            App::Add(xs) => App::Add(many(xs, &mut f)?),
            App::Sub(a, b) => App::Sub(f(a)?, f(b)?),
            App::Mul(a, b) => App::Mul(f(a)?, f(b)?),
            App::Neg(a) => App::Neg(f(a)?),
            App::Abs(a) => App::Abs(f(a)?),
            App::NatDiv(a, b) => App::NatDiv(f(a)?, f(b)?),
            App::NatMod(a, b) => App::NatMod(f(a)?, f(b)?),
            App::IntDiv(a, b) => App::IntDiv(f(a)?, f(b)?),
            App::IntMod(a, b) => App::IntMod(f(a)?, f(b)?),
            App::RealDiv(a, b) => App::RealDiv(f(a)?, f(b)?),
            App::Sqrt(a) => App::Sqrt(f(a)?),
            App::Floor(a) => App::Floor(f(a)?),
            App::Ceiling(a) => App::Ceiling(f(a)?),
            App::Round(a) => App::Round(f(a)?),
            App::NatToInt(a) => App::NatToInt(f(a)?),
            App::IntToReal(a) => App::IntToReal(f(a)?),
            App::IntToNat(a) => App::IntToNat(f(a)?),
            App::BvToInt { arg, signed } => App::BvToInt {
                arg: f(arg)?,
                signed: *signed,
            },
            App::IntToBv { arg, width } => App::IntToBv {
                arg: f(arg)?,
                width: *width,
            },
            App::BvUlt(a, b) => App::BvUlt(f(a)?, f(b)?),
            App::BvUle(a, b) => App::BvUle(f(a)?, f(b)?),
            App::BvSlt(a, b) => App::BvSlt(f(a)?, f(b)?),
            App::BvSle(a, b) => App::BvSle(f(a)?, f(b)?),
            App::BvAdd(a, b) => App::BvAdd(f(a)?, f(b)?),
            App::BvSub(a, b) => App::BvSub(f(a)?, f(b)?),
            App::BvMul(a, b) => App::BvMul(f(a)?, f(b)?),
            App::BvNeg(a) => App::BvNeg(f(a)?),
            App::BvUdiv(a, b) => App::BvUdiv(f(a)?, f(b)?),
            App::BvUrem(a, b) => App::BvUrem(f(a)?, f(b)?),
            App::BvSdiv(a, b) => App::BvSdiv(f(a)?, f(b)?),
            App::BvSrem(a, b) => App::BvSrem(f(a)?, f(b)?),
            App::BvAnd(a, b) => App::BvAnd(f(a)?, f(b)?),
            App::BvOr(a, b) => App::BvOr(f(a)?, f(b)?),
            App::BvXor(a, b) => App::BvXor(f(a)?, f(b)?),
            App::BvNot(a) => App::BvNot(f(a)?),
            App::BvShl(a, b) => App::BvShl(f(a)?, f(b)?),
            App::BvLshr(a, b) => App::BvLshr(f(a)?, f(b)?),
            App::BvAshr(a, b) => App::BvAshr(f(a)?, f(b)?),
            App::BvConcat(a, b) => App::BvConcat(f(a)?, f(b)?),
            App::BvExtract { arg, high, low } => App::BvExtract {
                arg: f(arg)?,
                high: *high,
                low: *low,
            },
            App::BvZext { arg, width } => App::BvZext {
                arg: f(arg)?,
                width: *width,
            },
            App::BvSext { arg, width } => App::BvSext {
                arg: f(arg)?,
                width: *width,
            },
            App::Select { array, indices } => App::Select {
                array: f(array)?,
                indices: many(indices, &mut f)?,
            },
            App::Update {
                array,
                indices,
                value,
            } => App::Update {
                array: f(array)?,
                indices: many(indices, &mut f)?,
                value: f(value)?,
            },
            App::ArrayMap { base, updates } => {
                let base = f(base)?;
                let mut mapped = Vec::with_capacity(updates.len());
                for (idx, value) in updates {
                    mapped.push((idx.clone(), f(value)?));
                }
                App::ArrayMap {
                    base,
                    updates: mapped,
                }
            }
            App::ConstArray { index, value } => App::ConstArray {
                index: index.clone(),
                value: f(value)?,
            },
            App::MkStruct(xs) => App::MkStruct(many(xs, &mut f)?),
            App::StructField { arg, index } => App::StructField {
                arg: f(arg)?,
                index: *index,
            },
            App::MkComplex(a, b) => App::MkComplex(f(a)?, f(b)?),
            App::RealPart(a) => App::RealPart(f(a)?),
            App::ImagPart(a) => App::ImagPart(f(a)?),
        })
    }
}

fn ill_typed(operation: &str, detail: String) -> BridgeError {
    BridgeError::IllTyped {
        operation: operation.to_string(),
        detail,
    }
}

fn expect_ty(op: &str, actual: &BaseType, expected: &BaseType) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(ill_typed(
            op,
            format!("expected operand of type {}, got {}", expected, actual),
        ))
    }
}

fn expect_same(op: &str, a: &BaseType, b: &BaseType) -> Result<BaseType> {
    expect_ty(op, b, a)?;
    Ok(a.clone())
}

fn expect_numeric(op: &str, ty: &BaseType) -> Result<()> {
    if ty.is_numeric() {
        Ok(())
    } else {
        Err(ill_typed(op, format!("expected numeric operand, got {}", ty)))
    }
}

fn expect_signed_numeric(op: &str, ty: &BaseType) -> Result<()> {
    match ty {
        BaseType::Integer | BaseType::Real => Ok(()),
        _ => Err(ill_typed(
            op,
            format!("expected int or real operand, got {}", ty),
        )),
    }
}

fn expect_bv(op: &str, ty: &BaseType) -> Result<usize> {
    ty.bit_width()
        .ok_or_else(|| ill_typed(op, format!("expected bit-vector operand, got {}", ty)))
}

fn expect_array<'a>(op: &str, ty: &'a BaseType) -> Result<(&'a [BaseType], &'a BaseType)> {
    match ty {
        BaseType::Array { index, element } => Ok((index, element)),
        _ => Err(ill_typed(op, format!("expected array operand, got {}", ty))),
    }
}

fn expect_indices(op: &str, expected: &[BaseType], actual: &[&BaseType]) -> Result<()> {
    if expected.len() != actual.len() {
        return Err(ill_typed(
            op,
            format!("expected {} indices, got {}", expected.len(), actual.len()),
        ));
    }
    for (e, a) in expected.iter().zip(actual.iter()) {
        expect_ty(op, a, e)?;
    }
    Ok(())
}

impl App<ExprRef> {
    /// Checks operand types and computes the result type.
    pub fn result_type(&self) -> Result<BaseType> {
        let op = self.operator();
        let bool_ty = BaseType::Bool;
        match self {
            App::Not(a) => {
                expect_ty(op, &a.ty, &bool_ty)?;
                Ok(bool_ty)
            }
            App::And(xs) | App::Or(xs) => {
                for x in xs {
                    expect_ty(op, &x.ty, &bool_ty)?;
                }
                Ok(bool_ty)
            }
            App::Xor(a, b) | App::Implies(a, b) => {
                expect_ty(op, &a.ty, &bool_ty)?;
                expect_ty(op, &b.ty, &bool_ty)?;
                Ok(bool_ty)
            }
            App::Ite(c, t, e) => {
                expect_ty(op, &c.ty, &bool_ty)?;
                expect_same(op, &t.ty, &e.ty)
            }
            App::Eq(a, b) => {
                expect_same(op, &a.ty, &b.ty)?;
                Ok(bool_ty)
            }
            App::Distinct(xs) => {
                if let Some(first) = xs.first() {
                    for x in xs.iter().skip(1) {
                        expect_same(op, &first.ty, &x.ty)?;
                    }
                }
                Ok(bool_ty)
            }
            App::Le(a, b) | App::Lt(a, b) => {
                expect_numeric(op, &a.ty)?;
                expect_same(op, &a.ty, &b.ty)?;
                Ok(bool_ty)
            }
            App::Add(xs) => {
                let first = xs
                    .first()
                    .ok_or_else(|| ill_typed(op, "no operands".to_string()))?;
                expect_numeric(op, &first.ty)?;
                for x in xs.iter().skip(1) {
                    expect_same(op, &first.ty, &x.ty)?;
                }
                Ok(first.ty.clone())
            }
            App::Mul(a, b) => {
                expect_numeric(op, &a.ty)?;
                expect_same(op, &a.ty, &b.ty)
            }
            App::Sub(a, b) => {
                expect_signed_numeric(op, &a.ty)?;
                expect_same(op, &a.ty, &b.ty)
            }
            App::Neg(a) | App::Abs(a) => {
                expect_signed_numeric(op, &a.ty)?;
                Ok(a.ty.clone())
            }
            App::NatDiv(a, b) | App::NatMod(a, b) => {
                expect_ty(op, &a.ty, &BaseType::Nat)?;
                expect_ty(op, &b.ty, &BaseType::Nat)?;
                Ok(BaseType::Nat)
            }
            App::IntDiv(a, b) | App::IntMod(a, b) => {
                expect_ty(op, &a.ty, &BaseType::Integer)?;
                expect_ty(op, &b.ty, &BaseType::Integer)?;
                Ok(BaseType::Integer)
            }
            App::RealDiv(a, b) => {
                expect_ty(op, &a.ty, &BaseType::Real)?;
                expect_ty(op, &b.ty, &BaseType::Real)?;
                Ok(BaseType::Real)
            }
            App::Sqrt(a) => {
                expect_ty(op, &a.ty, &BaseType::Real)?;
                Ok(BaseType::Real)
            }
            App::Floor(a) | App::Ceiling(a) | App::Round(a) => {
                expect_ty(op, &a.ty, &BaseType::Real)?;
                Ok(BaseType::Integer)
            }
            App::NatToInt(a) => {
                expect_ty(op, &a.ty, &BaseType::Nat)?;
                Ok(BaseType::Integer)
            }
            App::IntToReal(a) => match a.ty {
                BaseType::Nat | BaseType::Integer => Ok(BaseType::Real),
                _ => Err(ill_typed(op, format!("expected nat or int, got {}", a.ty))),
            },
            App::IntToNat(a) => {
                expect_ty(op, &a.ty, &BaseType::Integer)?;
                Ok(BaseType::Nat)
            }
            App::BvToInt { arg, .. } => {
                expect_bv(op, &arg.ty)?;
                Ok(BaseType::Integer)
            }
            App::IntToBv { arg, width } => {
                expect_ty(op, &arg.ty, &BaseType::Integer)?;
                if *width == 0 {
                    return Err(ill_typed(op, "zero-width result".to_string()));
                }
                Ok(BaseType::BitVec(*width))
            }
            App::BvUlt(a, b) | App::BvUle(a, b) | App::BvSlt(a, b) | App::BvSle(a, b) => {
                expect_bv(op, &a.ty)?;
                expect_same(op, &a.ty, &b.ty)?;
                Ok(bool_ty)
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
                expect_bv(op, &a.ty)?;
                expect_same(op, &a.ty, &b.ty)
            }
            App::BvNeg(a) | App::BvNot(a) => {
                expect_bv(op, &a.ty)?;
                Ok(a.ty.clone())
            }
            App::BvConcat(a, b) => {
                let wa = expect_bv(op, &a.ty)?;
                let wb = expect_bv(op, &b.ty)?;
                Ok(BaseType::BitVec(wa + wb))
            }
            App::BvExtract { arg, high, low } => {
                let w = expect_bv(op, &arg.ty)?;
                if high < low || *high >= w {
                    return Err(ill_typed(
                        op,
                        format!("invalid slice [{}:{}] of bv{}", high, low, w),
                    ));
                }
                Ok(BaseType::BitVec(high - low + 1))
            }
            App::BvZext { arg, width } | App::BvSext { arg, width } => {
                let w = expect_bv(op, &arg.ty)?;
                if *width < w {
                    return Err(ill_typed(
                        op,
                        format!("cannot extend bv{} to bv{}", w, width),
                    ));
                }
                Ok(BaseType::BitVec(*width))
            }
            App::Select { array, indices } => {
                let (index, element) = expect_array(op, &array.ty)?;
                let actual: Vec<&BaseType> = indices.iter().map(|i| &i.ty).collect();
                expect_indices(op, index, &actual)?;
                Ok(element.clone())
            }
            App::Update {
                array,
                indices,
                value,
            } => {
                let (index, element) = expect_array(op, &array.ty)?;
                let actual: Vec<&BaseType> = indices.iter().map(|i| &i.ty).collect();
                expect_indices(op, index, &actual)?;
                expect_ty(op, &value.ty, element)?;
                Ok(array.ty.clone())
            }
            App::ArrayMap { base, updates } => {
                let (index, element) = expect_array(op, &base.ty)?;
                for (idx, value) in updates {
                    let tys: Vec<BaseType> = idx.iter().map(|l| l.base_type()).collect();
                    let actual: Vec<&BaseType> = tys.iter().collect();
                    expect_indices(op, index, &actual)?;
                    expect_ty(op, &value.ty, element)?;
                }
                Ok(base.ty.clone())
            }
            App::ConstArray { index, value } => {
                if index.is_empty() {
                    return Err(ill_typed(op, "array without index types".to_string()));
                }
                for i in index {
                    i.check_well_formed()?;
                }
                Ok(BaseType::new_array(index.clone(), value.ty.clone()))
            }
            App::MkStruct(xs) => Ok(BaseType::Struct(xs.iter().map(|x| x.ty.clone()).collect())),
            App::StructField { arg, index } => match &arg.ty {
                BaseType::Struct(fields) if *index < fields.len() => Ok(fields[*index].clone()),
                other => Err(ill_typed(
                    op,
                    format!("no field {} in {}", index, other),
                )),
            },
            App::MkComplex(a, b) => {
                expect_ty(op, &a.ty, &BaseType::Real)?;
                expect_ty(op, &b.ty, &BaseType::Real)?;
                Ok(BaseType::Complex)
            }
            App::RealPart(a) | App::ImagPart(a) => {
                expect_ty(op, &a.ty, &BaseType::Complex)?;
                Ok(BaseType::Real)
            }
        }
    }
}

#[derive(Debug)]
pub enum ExprKind {
    Literal(Literal),
    Var(Rc<BoundVar>),
    App(App<ExprRef>),
    Quantifier {
        quantifier: Quantifier,
        var: Rc<BoundVar>,
        body: ExprRef,
    },
    FnApp {
        func: Rc<FnSymbol>,
        args: Vec<ExprRef>,
    },
}

#[derive(Debug)]
pub struct Expr {
    pub id: Nonce,
    pub ty: BaseType,
    pub kind: ExprKind,
    pub loc: Option<ProgramLoc>,
}

pub type ExprRef = Rc<Expr>;

impl Expr {
    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.kind {
            ExprKind::Literal(l) => Some(l),
            _ => None,
        }
    }

    pub fn is_literal(&self) -> bool {
        self.as_literal().is_some()
    }

    /// Short human-readable description used in diagnostics.
    pub fn describe(&self) -> String {
        let what = match &self.kind {
            ExprKind::Literal(_) => "literal".to_string(),
            ExprKind::Var(v) => format!("var `{}`", v.name),
            ExprKind::App(app) => app.operator().to_string(),
            ExprKind::Quantifier { quantifier, .. } => match quantifier {
                Quantifier::Forall => "forall".to_string(),
                Quantifier::Exists => "exists".to_string(),
            },
            ExprKind::FnApp { func, .. } => format!("call `{}`", func.name),
        };
        format!("{}{}: {}", what, self.id, self.ty)
    }
}

/// Constructs type-checked nodes. Nodes built while a location is set carry
/// that location.
#[derive(Debug, Default)]
pub struct ExprBuilder {
    loc: Option<ProgramLoc>,
}

impl ExprBuilder {
    pub fn new() -> Self {
        ExprBuilder::default()
    }

    pub fn set_loc(&mut self, loc: Option<ProgramLoc>) {
        self.loc = loc;
    }

    fn mk(&self, ty: BaseType, kind: ExprKind) -> ExprRef {
        Rc::new(Expr {
            id: Nonce::fresh(),
            ty,
            kind,
            loc: self.loc.clone(),
        })
    }

    pub fn literal(&self, lit: Literal) -> ExprRef {
        self.mk(lit.base_type(), ExprKind::Literal(lit))
    }

    pub fn bool_lit(&self, b: bool) -> ExprRef {
        self.literal(Literal::Bool(b))
    }

    pub fn new_var(&self, name: &str, ty: BaseType, kind: VarKind) -> Rc<BoundVar> {
        Rc::new(BoundVar {
            id: Nonce::fresh(),
            name: name.to_string(),
            ty,
            kind,
            loc: self.loc.clone(),
        })
    }

    pub fn var_ref(&self, var: &Rc<BoundVar>) -> ExprRef {
        self.mk(var.ty.clone(), ExprKind::Var(Rc::clone(var)))
    }

    /// A fresh uninterpreted constant and a node referring to it.
    pub fn free_var(&self, name: &str, ty: BaseType) -> ExprRef {
        let var = self.new_var(name, ty, VarKind::Uninterpreted);
        self.var_ref(&var)
    }

    pub fn app(&self, app: App<ExprRef>) -> Result<ExprRef> {
        let ty = app.result_type()?;
        Ok(self.mk(ty, ExprKind::App(app)))
    }

    pub fn quantifier(
        &self,
        quantifier: Quantifier,
        var: &Rc<BoundVar>,
        body: ExprRef,
    ) -> Result<ExprRef> {
        if var.kind != VarKind::Quantified {
            return Err(ill_typed(
                "quantifier",
                format!("`{}` is not a quantifier-bound variable", var.name),
            ));
        }
        expect_ty("quantifier", &body.ty, &BaseType::Bool)?;
        Ok(self.mk(
            BaseType::Bool,
            ExprKind::Quantifier {
                quantifier,
                var: Rc::clone(var),
                body,
            },
        ))
    }

    pub fn forall(&self, var: &Rc<BoundVar>, body: ExprRef) -> Result<ExprRef> {
        self.quantifier(Quantifier::Forall, var, body)
    }

    pub fn exists(&self, var: &Rc<BoundVar>, body: ExprRef) -> Result<ExprRef> {
        self.quantifier(Quantifier::Exists, var, body)
    }

    pub fn uninterpreted_fn(
        &self,
        name: &str,
        arg_types: Vec<BaseType>,
        ret_type: BaseType,
    ) -> Rc<FnSymbol> {
        Rc::new(FnSymbol {
            id: Nonce::fresh(),
            name: name.to_string(),
            arg_types,
            ret_type,
            body: FnBody::Uninterpreted,
        })
    }

    pub fn defined_fn(
        &self,
        name: &str,
        params: Vec<Rc<BoundVar>>,
        body: ExprRef,
    ) -> Result<Rc<FnSymbol>> {
        for p in &params {
            if p.kind != VarKind::FnParam {
                return Err(ill_typed(
                    "define_fn",
                    format!("`{}` is not a function parameter", p.name),
                ));
            }
        }
        Ok(Rc::new(FnSymbol {
            id: Nonce::fresh(),
            name: name.to_string(),
            arg_types: params.iter().map(|p| p.ty.clone()).collect(),
            ret_type: body.ty.clone(),
            body: FnBody::Defined { params, body },
        }))
    }

    pub fn apply(&self, func: &Rc<FnSymbol>, args: Vec<ExprRef>) -> Result<ExprRef> {
        let actual: Vec<&BaseType> = args.iter().map(|a| &a.ty).collect();
        expect_indices(&format!("call `{}`", func.name), &func.arg_types, &actual)?;
        Ok(self.mk(
            func.ret_type.clone(),
            ExprKind::FnApp {
                func: Rc::clone(func),
                args,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_not_structural() {
        let b = ExprBuilder::new();
        let x = b.literal(Literal::int(3));
        let y = b.literal(Literal::int(3));
        assert_ne!(x.id, y.id);
    }

    #[test]
    fn test_result_type_of_bitvector_ops() {
        let b = ExprBuilder::new();
        let x = b.free_var("x", BaseType::BitVec(8));
        let y = b.free_var("y", BaseType::BitVec(4));
        let cat = b.app(App::BvConcat(x.clone(), y.clone())).unwrap();
        assert_eq!(cat.ty, BaseType::BitVec(12));
        let ext = b
            .app(App::BvExtract {
                arg: cat,
                high: 11,
                low: 4,
            })
            .unwrap();
        assert_eq!(ext.ty, BaseType::BitVec(8));
        assert!(b.app(App::BvAdd(x, y)).is_err());
    }

    #[test]
    fn test_ill_typed_select_reports_operator() {
        let b = ExprBuilder::new();
        let arr = b.free_var(
            "a",
            BaseType::new_array(vec![BaseType::Integer], BaseType::Bool),
        );
        let idx = b.free_var("i", BaseType::Real);
        let err = b
            .app(App::Select {
                array: arr,
                indices: vec![idx],
            })
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "ill-typed select: expected operand of type int, got real"
        );
    }

    #[test]
    fn test_quantifier_requires_quantified_var() {
        let b = ExprBuilder::new();
        let v = b.new_var("x", BaseType::Integer, VarKind::Uninterpreted);
        let body = b.bool_lit(true);
        assert!(b.forall(&v, body).is_err());
    }

    #[test]
    fn test_literal_json_uses_strings() {
        let lit: Literal = serde_json::from_str(r#"{"real": "-37/10"}"#).unwrap();
        assert_eq!(lit, Literal::real(-37, 10));
        let text = serde_json::to_string(&Literal::bv(8, 5)).unwrap();
        assert_eq!(text, r#"{"bit_vec":{"width":8,"value":"5"}}"#);
        assert!(serde_json::from_str::<Literal>(r#"{"bit_vec": {"width": 2, "value": "9"}}"#).is_err());
    }

    #[test]
    fn test_zero_width_bit_vectors_are_ill_formed() {
        assert!(BaseType::BitVec(1).check_well_formed().is_ok());
        let nested = BaseType::new_array(
            vec![BaseType::Integer],
            BaseType::Struct(vec![BaseType::Bool, BaseType::BitVec(0)]),
        );
        let err = nested.check_well_formed().unwrap_err();
        assert_eq!(err.to_string(), "ill-typed type: zero-width bit-vector");
        assert_eq!(Literal::bv(0, 7).base_type(), BaseType::BitVec(0));
    }

    #[test]
    fn test_bv_literal_wraps() {
        assert_eq!(
            Literal::bv(4, 0x1f),
            Literal::BitVec {
                width: 4,
                value: BigUint::from(0xfu8)
            }
        );
    }
}
