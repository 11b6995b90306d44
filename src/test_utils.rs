// SPDX-License-Identifier: Apache-2.0

//! Helpers for tests that need a model without a solver process.

use std::collections::HashMap;
use std::fmt::Display;
use std::io;

use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;

use crate::eval::GroundEvalFns;

#[derive(Debug, Clone)]
enum ModelValue {
    Bool(bool),
    BitVec(BigUint),
    Real(BigRational),
}

/// A model given as a map from rendered term text to value. Every query is
/// recorded so tests can check what the evaluator asked for.
#[derive(Debug, Default)]
pub struct MapModel {
    values: HashMap<String, ModelValue>,
    queries: Vec<String>,
}

impl MapModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bool(mut self, term: &str, value: bool) -> Self {
        self.values.insert(term.to_string(), ModelValue::Bool(value));
        self
    }

    pub fn with_bv(mut self, term: &str, value: u64) -> Self {
        self.values
            .insert(term.to_string(), ModelValue::BitVec(BigUint::from(value)));
        self
    }

    pub fn with_int(self, term: &str, value: i64) -> Self {
        self.with_real(term, value, 1)
    }

    pub fn with_real(mut self, term: &str, numer: i64, denom: i64) -> Self {
        let r = BigRational::new(BigInt::from(numer), BigInt::from(denom));
        self.values.insert(term.to_string(), ModelValue::Real(r));
        self
    }

    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    fn lookup(&mut self, term: &impl Display) -> io::Result<ModelValue> {
        let key = term.to_string();
        self.queries.push(key.clone());
        self.values.get(&key).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no model value for `{}`", key),
            )
        })
    }
}

fn wrong_sort(expected: &str, found: &ModelValue) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("expected {} value, found {:?}", expected, found),
    )
}

impl<T: Display> GroundEvalFns<T> for MapModel {
    fn eval_bool(&mut self, term: &T) -> io::Result<bool> {
        match self.lookup(term)? {
            ModelValue::Bool(b) => Ok(b),
            other => Err(wrong_sort("bool", &other)),
        }
    }

    fn eval_bv(&mut self, _width: usize, term: &T) -> io::Result<BigUint> {
        match self.lookup(term)? {
            ModelValue::BitVec(v) => Ok(v),
            other => Err(wrong_sort("bit-vector", &other)),
        }
    }

    fn eval_real(&mut self, term: &T) -> io::Result<BigRational> {
        match self.lookup(term)? {
            ModelValue::Real(r) => Ok(r),
            other => Err(wrong_sort("numeric", &other)),
        }
    }
}
