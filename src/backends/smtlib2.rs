// SPDX-License-Identifier: Apache-2.0

//! SMT-LIB 2 text backend.
//!
//! Structs are the parametric datatypes `StructN`, declared once per arity:
//!
//! ```text
//! (declare-datatypes ((Struct2 2)) ((par (T0 T1) ((mk-struct2 (struct2-0 T0) (struct2-1 T1))))))
//! ```
//!
//! The preamble turns on `:global-declarations` so that declarations and
//! definitions made inside a `push` survive the matching `pop`; connections
//! cache free symbols across scopes and rely on this.

use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use num_traits::{Signed, Zero};

use super::{binary_digits, join};
use crate::command::Command;
use crate::encoding::{ArrayRepr, Encoding};
use crate::term_algebra::{BvBinOp, BvCmp, BvUnOp, TermAlgebra};

const RESERVED: &[&str] = &[
    "_", "!", "as", "let", "exists", "forall", "match", "par", "and", "or", "not", "xor", "ite",
    "=>", "=", "distinct", "true", "false", "select", "store", "div", "mod", "abs", "to_real",
    "to_int", "is_int", "concat", "extract", "Bool", "Int", "Real", "Array",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct SmtLib2;

impl SmtLib2 {
    pub fn new() -> Self {
        SmtLib2
    }

    fn sorted_vars(&self, vars: &[(String, Encoding)]) -> String {
        let parts: Vec<String> = vars
            .iter()
            .map(|(n, e)| format!("({} {})", n, self.sort(e)))
            .collect();
        format!("({})", parts.join(" "))
    }

    fn struct_datatype(arity: usize) -> String {
        if arity == 0 {
            return "(declare-datatypes ((Struct0 0)) (((mk-struct0))))".to_string();
        }
        let params: Vec<String> = (0..arity).map(|i| format!("T{}", i)).collect();
        let fields: Vec<String> = (0..arity)
            .map(|i| format!("(struct{}-{} T{})", arity, i, i))
            .collect();
        format!(
            "(declare-datatypes ((Struct{n} {n})) ((par ({params}) ((mk-struct{n} {fields})))))",
            n = arity,
            params = params.join(" "),
            fields = fields.join(" ")
        )
    }

    fn struct_sort(&self, fields: &[Encoding]) -> String {
        if fields.is_empty() {
            return "Struct0".to_string();
        }
        let sorts: Vec<String> = fields.iter().map(|f| self.sort(f)).collect();
        format!("(Struct{} {})", fields.len(), sorts.join(" "))
    }
}

fn is_simple_symbol_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "~!@$%^&*_-+=<>.?/".contains(c)
}

fn nary(op: &str, unit: &str, xs: &[String]) -> String {
    match xs.len() {
        0 => unit.to_string(),
        1 => xs[0].clone(),
        _ => format!("({} {})", op, join(xs)),
    }
}

impl TermAlgebra for SmtLib2 {
    type Term = String;

    fn name(&self) -> &'static str {
        "smtlib2"
    }

    fn sanitize_symbol(&self, raw: &str) -> String {
        if raw.is_empty() {
            return "_anon".to_string();
        }
        if RESERVED.contains(&raw) {
            return format!("{}_", raw);
        }
        let starts_ok = !raw.starts_with(|c: char| c.is_ascii_digit());
        if starts_ok && raw.chars().all(is_simple_symbol_char) {
            raw.to_string()
        } else {
            let body: String = raw.chars().filter(|c| *c != '|' && *c != '\\').collect();
            format!("|{}|", body)
        }
    }

    fn sort(&self, encoding: &Encoding) -> String {
        match encoding {
            Encoding::Bool => "Bool".to_string(),
            Encoding::BitVec(w) => format!("(_ BitVec {})", w),
            Encoding::Int => "Int".to_string(),
            Encoding::Real => "Real".to_string(),
            Encoding::ComplexStruct => "(Struct2 Real Real)".to_string(),
            Encoding::ComplexArray => "(Array Bool Real)".to_string(),
            Encoding::Array {
                index,
                element,
                repr: ArrayRepr::Native,
            } => {
                let index_sort = if index.len() == 1 {
                    self.sort(&index[0])
                } else {
                    self.struct_sort(index)
                };
                format!("(Array {} {})", index_sort, self.sort(element))
            }
            Encoding::Array {
                index,
                element,
                repr: ArrayRepr::Function,
            } => {
                let mut sorts: Vec<String> = index.iter().map(|i| self.sort(i)).collect();
                sorts.push(self.sort(element));
                format!("(-> {})", sorts.join(" "))
            }
            Encoding::Struct(fields) => self.struct_sort(fields),
        }
    }

    fn symbol(&self, name: &str) -> String {
        name.to_string()
    }

    fn bool_lit(&self, value: bool) -> String {
        value.to_string()
    }

    fn bv_lit(&self, width: usize, value: &BigUint) -> String {
        format!("#b{}", binary_digits(width, value))
    }

    fn int_lit(&self, value: &BigInt) -> String {
        if value.is_negative() {
            format!("(- {})", value.abs())
        } else {
            value.to_string()
        }
    }

    fn real_lit(&self, value: &BigRational) -> String {
        let magnitude = value.abs();
        let text = if magnitude.is_integer() {
            format!("{}.0", magnitude.numer())
        } else {
            format!("(/ {}.0 {}.0)", magnitude.numer(), magnitude.denom())
        };
        if value.is_negative() && !value.is_zero() {
            format!("(- {})", text)
        } else {
            text
        }
    }

    fn not(&self, a: &String) -> String {
        format!("(not {})", a)
    }

    fn and(&self, xs: &[String]) -> String {
        nary("and", "true", xs)
    }

    fn or(&self, xs: &[String]) -> String {
        nary("or", "false", xs)
    }

    fn xor(&self, a: &String, b: &String) -> String {
        format!("(xor {} {})", a, b)
    }

    fn implies(&self, a: &String, b: &String) -> String {
        format!("(=> {} {})", a, b)
    }

    fn ite(&self, c: &String, t: &String, e: &String) -> String {
        format!("(ite {} {} {})", c, t, e)
    }

    fn eq(&self, a: &String, b: &String) -> String {
        format!("(= {} {})", a, b)
    }

    fn distinct(&self, xs: &[String]) -> String {
        if xs.len() < 2 {
            "true".to_string()
        } else {
            format!("(distinct {})", join(xs))
        }
    }

    fn le(&self, a: &String, b: &String) -> String {
        format!("(<= {} {})", a, b)
    }

    fn lt(&self, a: &String, b: &String) -> String {
        format!("(< {} {})", a, b)
    }

    fn ge(&self, a: &String, b: &String) -> String {
        format!("(>= {} {})", a, b)
    }

    fn add(&self, xs: &[String]) -> String {
        nary("+", "0", xs)
    }

    fn sub(&self, a: &String, b: &String) -> String {
        format!("(- {} {})", a, b)
    }

    fn mul(&self, a: &String, b: &String) -> String {
        format!("(* {} {})", a, b)
    }

    fn neg(&self, a: &String) -> String {
        format!("(- {})", a)
    }

    fn real_div(&self, a: &String, b: &String) -> String {
        format!("(/ {} {})", a, b)
    }

    fn int_to_real(&self, a: &String) -> String {
        format!("(to_real {})", a)
    }

    fn bv_binop(&self, op: BvBinOp, a: &String, b: &String) -> String {
        let name = match op {
            BvBinOp::Add => "bvadd",
            BvBinOp::Sub => "bvsub",
            BvBinOp::Mul => "bvmul",
            BvBinOp::Udiv => "bvudiv",
            BvBinOp::Urem => "bvurem",
            BvBinOp::Sdiv => "bvsdiv",
            BvBinOp::Srem => "bvsrem",
            BvBinOp::And => "bvand",
            BvBinOp::Or => "bvor",
            BvBinOp::Xor => "bvxor",
            BvBinOp::Shl => "bvshl",
            BvBinOp::Lshr => "bvlshr",
            BvBinOp::Ashr => "bvashr",
            BvBinOp::Concat => "concat",
        };
        format!("({} {} {})", name, a, b)
    }

    fn bv_unop(&self, op: BvUnOp, a: &String) -> String {
        match op {
            BvUnOp::Neg => format!("(bvneg {})", a),
            BvUnOp::Not => format!("(bvnot {})", a),
        }
    }

    fn bv_cmp(&self, op: BvCmp, a: &String, b: &String) -> String {
        let name = match op {
            BvCmp::Ult => "bvult",
            BvCmp::Ule => "bvule",
            BvCmp::Slt => "bvslt",
            BvCmp::Sle => "bvsle",
        };
        format!("({} {} {})", name, a, b)
    }

    fn bv_extract(&self, a: &String, high: usize, low: usize) -> String {
        format!("((_ extract {} {}) {})", high, low, a)
    }

    fn bv_zero_extend(&self, a: &String, by: usize) -> String {
        if by == 0 {
            return a.clone();
        }
        format!("((_ zero_extend {}) {})", by, a)
    }

    fn bv_sign_extend(&self, a: &String, by: usize) -> String {
        if by == 0 {
            return a.clone();
        }
        format!("((_ sign_extend {}) {})", by, a)
    }

    fn select(&self, array: &String, index: &String) -> String {
        format!("(select {} {})", array, index)
    }

    fn store(&self, array: &String, index: &String, value: &String) -> String {
        format!("(store {} {} {})", array, index, value)
    }

    fn mk_struct(&self, fields: &[String]) -> String {
        if fields.is_empty() {
            "mk-struct0".to_string()
        } else {
            format!("(mk-struct{} {})", fields.len(), join(fields))
        }
    }

    fn struct_field(&self, arity: usize, index: usize, s: &String) -> String {
        format!("(struct{}-{} {})", arity, index, s)
    }

    fn apply(&self, f: &String, args: &[String]) -> String {
        if args.is_empty() {
            f.clone()
        } else {
            format!("({} {})", f, join(args))
        }
    }

    fn forall(&self, vars: &[(String, Encoding)], body: &String) -> String {
        if vars.is_empty() {
            return body.clone();
        }
        format!("(forall {} {})", self.sorted_vars(vars), body)
    }

    fn exists(&self, vars: &[(String, Encoding)], body: &String) -> String {
        if vars.is_empty() {
            return body.clone();
        }
        format!("(exists {} {})", self.sorted_vars(vars), body)
    }

    fn let_in(&self, bindings: &[(String, String)], body: &String) -> String {
        bindings
            .iter()
            .rev()
            .fold(body.clone(), |acc, (n, t)| format!("(let (({} {})) {})", n, t, acc))
    }

    fn const_array(
        &self,
        _params: &[(String, Encoding)],
        encoding: &Encoding,
        value: &String,
    ) -> Option<String> {
        match encoding {
            Encoding::Array {
                repr: ArrayRepr::Native,
                ..
            }
            | Encoding::ComplexArray => {
                Some(format!("((as const {}) {})", self.sort(encoding), value))
            }
            _ => None,
        }
    }

    fn preamble(&self) -> Vec<String> {
        vec![
            "(set-option :produce-models true)".to_string(),
            "(set-option :global-declarations true)".to_string(),
        ]
    }

    fn render_command(&self, cmd: &Command<String>) -> Option<String> {
        Some(match cmd {
            Command::Comment(text) => {
                let lines: Vec<String> = text.lines().map(|l| format!("; {}", l)).collect();
                lines.join("\n")
            }
            Command::Assert(t) => format!("(assert {})", t),
            Command::DeclareSymbol { name, args, ret } => {
                let sorts: Vec<String> = args.iter().map(|a| self.sort(a)).collect();
                format!(
                    "(declare-fun {} ({}) {})",
                    name,
                    sorts.join(" "),
                    self.sort(ret)
                )
            }
            Command::DefineSymbol {
                name,
                args,
                ret,
                body,
            } => format!(
                "(define-fun {} {} {} {})",
                name,
                self.sorted_vars(args),
                self.sort(ret),
                body
            ),
            Command::DeclareStructArity(arity) => Self::struct_datatype(*arity),
            Command::Push => "(push 1)".to_string(),
            Command::Pop => "(pop 1)".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_literals() {
        let b = SmtLib2::new();
        assert_eq!(b.bv_lit(4, &BigUint::from(5u8)), "#b0101");
        assert_eq!(b.int_lit(&BigInt::from(-3)), "(- 3)");
        assert_eq!(
            b.real_lit(&BigRational::new(BigInt::from(-7), BigInt::from(2))),
            "(- (/ 7.0 2.0))"
        );
        assert_eq!(b.real_const(3), "3.0");
    }

    #[test]
    fn test_sanitize_symbol() {
        let b = SmtLib2::new();
        assert_eq!(b.sanitize_symbol("x!3"), "x!3");
        assert_eq!(b.sanitize_symbol("a b"), "|a b|");
        assert_eq!(b.sanitize_symbol("1st"), "|1st|");
        assert_eq!(b.sanitize_symbol("select"), "select_");
    }

    #[test]
    fn test_struct_datatype_declaration() {
        let b = SmtLib2::new();
        assert_eq!(
            b.render_command(&Command::DeclareStructArity(2)).unwrap(),
            "(declare-datatypes ((Struct2 2)) ((par (T0 T1) ((mk-struct2 (struct2-0 T0) (struct2-1 T1))))))"
        );
    }

    #[test]
    fn test_define_and_declare() {
        let b = SmtLib2::new();
        let decl = Command::DeclareSymbol {
            name: "x".to_string(),
            args: vec![],
            ret: Encoding::BitVec(8),
        };
        assert_eq!(
            b.render_command(&decl).unwrap(),
            "(declare-fun x () (_ BitVec 8))"
        );
        let def = Command::DefineSymbol {
            name: "f".to_string(),
            args: vec![("a".to_string(), Encoding::Int)],
            ret: Encoding::Bool,
            body: b.ge(&"a".to_string(), &"0".to_string()),
        };
        assert_eq!(
            b.render_command(&def).unwrap(),
            "(define-fun f ((a Int)) Bool (>= a 0))"
        );
    }

    #[test]
    fn test_multi_index_array_sort() {
        let b = SmtLib2::new();
        let enc = Encoding::Array {
            index: vec![Encoding::Int, Encoding::Bool],
            element: Box::new(Encoding::Real),
            repr: ArrayRepr::Native,
        };
        assert_eq!(b.sort(&enc), "(Array (Struct2 Int Bool) Real)");
        assert_eq!(
            b.const_array(&[], &enc, &"0.0".to_string()).unwrap(),
            "((as const (Array (Struct2 Int Bool) Real)) 0.0)"
        );
    }

    #[test]
    fn test_nested_let() {
        let b = SmtLib2::new();
        let t = b.let_in(
            &[
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "(+ a 1)".to_string()),
            ],
            &"b".to_string(),
        );
        assert_eq!(t, "(let ((a 1)) (let ((b (+ a 1))) b))");
    }
}
