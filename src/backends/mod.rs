// SPDX-License-Identifier: Apache-2.0

//! Concrete [`crate::term_algebra::TermAlgebra`] implementations and the
//! enumeration used to select one from configuration or the command line.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capabilities::Capabilities;

pub mod smtlib2;
pub mod yices;

pub use smtlib2::SmtLib2;
pub use yices::Yices;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// SMT-LIB 2 text, as understood by Z3, CVC5 and friends.
    #[default]
    #[serde(rename = "smtlib2")]
    SmtLib2,
    /// The native Yices 2 input language.
    Yices,
}

impl BackendKind {
    /// Capability profile used when the configuration names no preset.
    pub fn default_capabilities(&self) -> Capabilities {
        match self {
            BackendKind::SmtLib2 => Capabilities::z3(),
            BackendKind::Yices => Capabilities::yices(),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendKind::SmtLib2 => "smtlib2",
            BackendKind::Yices => "yices",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "smtlib2" => Ok(Self::SmtLib2),
            "yices" => Ok(Self::Yices),
            _ => Err(format!("invalid backend: {}", s)),
        }
    }
}

/// Writes `items` separated by single spaces.
pub(crate) fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `value` as exactly `width` binary digits, most significant first.
pub(crate) fn binary_digits(width: usize, value: &num_bigint::BigUint) -> String {
    format!("{:0>width$}", value.to_str_radix(2), width = width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_round_trips_through_strings() {
        for kind in [BackendKind::SmtLib2, BackendKind::Yices] {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
        assert!("z3".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_binary_digits_pads() {
        assert_eq!(binary_digits(8, &num_bigint::BigUint::from(5u8)), "00000101");
    }
}
