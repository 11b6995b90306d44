// SPDX-License-Identifier: Apache-2.0

//! Backend for the native Yices 2 language.
//!
//! Yices has no array theory; arrays are functions, updated with `update`
//! and built with `lambda`. Structs are tuples, which need no declaration
//! and whose fields are selected 1-based. Integers are a subtype of the
//! reals, so int-to-real conversion is the identity.

use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;

use super::{binary_digits, join};
use crate::command::Command;
use crate::encoding::{ArrayRepr, Encoding};
use crate::term_algebra::{BvBinOp, BvCmp, BvUnOp, TermAlgebra};

const RESERVED: &[&str] = &[
    "define-type", "define", "assert", "check", "push", "pop", "reset", "exit", "and", "or",
    "not", "xor", "ite", "if", "=>", "<=>", "=", "/=", "distinct", "true", "false", "let",
    "forall", "exists", "lambda", "update", "select", "tuple", "mk-tuple", "bool", "int", "real",
    "bitvector", "scalar",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct Yices;

impl Yices {
    pub fn new() -> Self {
        Yices
    }

    fn typed_vars(&self, vars: &[(String, Encoding)]) -> String {
        let parts: Vec<String> = vars
            .iter()
            .map(|(n, e)| format!("{}::{}", n, self.sort(e)))
            .collect();
        format!("({})", parts.join(" "))
    }

    fn fn_sort(&self, args: &[Encoding], ret: &Encoding) -> String {
        if args.is_empty() {
            return self.sort(ret);
        }
        let mut sorts: Vec<String> = args.iter().map(|a| self.sort(a)).collect();
        sorts.push(self.sort(ret));
        format!("(-> {})", sorts.join(" "))
    }
}

fn is_symbol_char(c: char) -> bool {
    !c.is_whitespace() && !"();:\"|".contains(c) && c.is_ascii_graphic()
}

fn nary(op: &str, unit: &str, xs: &[String]) -> String {
    match xs.len() {
        0 => unit.to_string(),
        1 => xs[0].clone(),
        _ => format!("({} {})", op, join(xs)),
    }
}

impl TermAlgebra for Yices {
    type Term = String;

    fn name(&self) -> &'static str {
        "yices"
    }

    fn sanitize_symbol(&self, raw: &str) -> String {
        let mut s: String = raw
            .chars()
            .map(|c| if is_symbol_char(c) { c } else { '_' })
            .collect();
        if s.is_empty() || s.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+') {
            s.insert(0, '_');
        }
        if RESERVED.contains(&s.as_str()) {
            s.push('_');
        }
        s
    }

    fn sort(&self, encoding: &Encoding) -> String {
        match encoding {
            Encoding::Bool => "bool".to_string(),
            Encoding::BitVec(w) => format!("(bitvector {})", w),
            Encoding::Int => "int".to_string(),
            Encoding::Real => "real".to_string(),
            Encoding::ComplexStruct => "(tuple real real)".to_string(),
            Encoding::ComplexArray => "(-> bool real)".to_string(),
            Encoding::Array {
                index,
                element,
                repr: ArrayRepr::Native,
            } if index.len() > 1 => {
                let tuple = self.sort(&Encoding::Struct(index.clone()));
                format!("(-> {} {})", tuple, self.sort(element))
            }
            Encoding::Array { index, element, .. } => self.fn_sort(index, element),
            Encoding::Struct(fields) => {
                let sorts: Vec<String> = fields.iter().map(|f| self.sort(f)).collect();
                format!("(tuple {})", sorts.join(" "))
            }
        }
    }

    fn symbol(&self, name: &str) -> String {
        name.to_string()
    }

    fn bool_lit(&self, value: bool) -> String {
        value.to_string()
    }

    fn bv_lit(&self, width: usize, value: &BigUint) -> String {
        format!("0b{}", binary_digits(width, value))
    }

    fn int_lit(&self, value: &BigInt) -> String {
        value.to_string()
    }

    fn real_lit(&self, value: &BigRational) -> String {
        value.to_string()
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
        a.clone()
    }

    fn bv_binop(&self, op: BvBinOp, a: &String, b: &String) -> String {
        let name = match op {
            BvBinOp::Add => "bv-add",
            BvBinOp::Sub => "bv-sub",
            BvBinOp::Mul => "bv-mul",
            BvBinOp::Udiv => "bv-div",
            BvBinOp::Urem => "bv-rem",
            BvBinOp::Sdiv => "bv-sdiv",
            BvBinOp::Srem => "bv-srem",
            BvBinOp::And => "bv-and",
            BvBinOp::Or => "bv-or",
            BvBinOp::Xor => "bv-xor",
            BvBinOp::Shl => "bv-shl",
            BvBinOp::Lshr => "bv-lshr",
            BvBinOp::Ashr => "bv-ashr",
            BvBinOp::Concat => "bv-concat",
        };
        format!("({} {} {})", name, a, b)
    }

    fn bv_unop(&self, op: BvUnOp, a: &String) -> String {
        match op {
            BvUnOp::Neg => format!("(bv-neg {})", a),
            BvUnOp::Not => format!("(bv-not {})", a),
        }
    }

    fn bv_cmp(&self, op: BvCmp, a: &String, b: &String) -> String {
        let name = match op {
            BvCmp::Ult => "bv-lt",
            BvCmp::Ule => "bv-le",
            BvCmp::Slt => "bv-slt",
            BvCmp::Sle => "bv-sle",
        };
        format!("({} {} {})", name, a, b)
    }

    fn bv_extract(&self, a: &String, high: usize, low: usize) -> String {
        format!("(bv-extract {} {} {})", high, low, a)
    }

    fn bv_zero_extend(&self, a: &String, by: usize) -> String {
        if by == 0 {
            return a.clone();
        }
        format!("(bv-zero-extend {} {})", a, by)
    }

    fn bv_sign_extend(&self, a: &String, by: usize) -> String {
        if by == 0 {
            return a.clone();
        }
        format!("(bv-sign-extend {} {})", a, by)
    }

    fn select(&self, array: &String, index: &String) -> String {
        format!("({} {})", array, index)
    }

    fn store(&self, array: &String, index: &String, value: &String) -> String {
        format!("(update {} ({}) {})", array, index, value)
    }

    fn mk_struct(&self, fields: &[String]) -> String {
        format!("(mk-tuple {})", join(fields))
    }

    fn struct_field(&self, _arity: usize, index: usize, s: &String) -> String {
        format!("(select {} {})", s, index + 1)
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
        format!("(forall {} {})", self.typed_vars(vars), body)
    }

    fn exists(&self, vars: &[(String, Encoding)], body: &String) -> String {
        if vars.is_empty() {
            return body.clone();
        }
        format!("(exists {} {})", self.typed_vars(vars), body)
    }

    fn let_in(&self, bindings: &[(String, String)], body: &String) -> String {
        bindings
            .iter()
            .rev()
            .fold(body.clone(), |acc, (n, t)| format!("(let (({} {})) {})", n, t, acc))
    }

    fn const_array(
        &self,
        params: &[(String, Encoding)],
        encoding: &Encoding,
        value: &String,
    ) -> Option<String> {
        match encoding {
            Encoding::Array { .. } | Encoding::ComplexArray => self.lambda(params, value),
            _ => None,
        }
    }

    fn fn_update(&self, f: &String, indices: &[String], value: &String) -> Option<String> {
        Some(format!("(update {} ({}) {})", f, join(indices), value))
    }

    fn lambda(&self, params: &[(String, Encoding)], body: &String) -> Option<String> {
        Some(format!("(lambda {} {})", self.typed_vars(params), body))
    }

    fn render_command(&self, cmd: &Command<String>) -> Option<String> {
        match cmd {
            Command::Comment(text) => {
                let lines: Vec<String> = text.lines().map(|l| format!(";; {}", l)).collect();
                Some(lines.join("\n"))
            }
            Command::Assert(t) => Some(format!("(assert {})", t)),
            Command::DeclareSymbol { name, args, ret } => {
                Some(format!("(define {}::{})", name, self.fn_sort(args, ret)))
            }
            Command::DefineSymbol {
                name,
                args,
                ret,
                body,
            } => {
                let arg_encs: Vec<Encoding> = args.iter().map(|(_, e)| e.clone()).collect();
                let value = if args.is_empty() {
                    body.clone()
                } else {
                    format!("(lambda {} {})", self.typed_vars(args), body)
                };
                Some(format!(
                    "(define {}::{} {})",
                    name,
                    self.fn_sort(&arg_encs, ret),
                    value
                ))
            }
            Command::DeclareStructArity(_) => None,
            Command::Push => Some("(push)".to_string()),
            Command::Pop => Some("(pop)".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::ArrayRepr;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_literals() {
        let y = Yices::new();
        assert_eq!(y.bv_lit(3, &BigUint::from(1u8)), "0b001");
        assert_eq!(y.int_lit(&BigInt::from(-4)), "-4");
        assert_eq!(
            y.real_lit(&BigRational::new(BigInt::from(7), BigInt::from(2))),
            "7/2"
        );
    }

    #[test]
    fn test_tuples_are_one_based() {
        let y = Yices::new();
        assert_eq!(y.struct_field(2, 0, &"t".to_string()), "(select t 1)");
        assert_eq!(y.render_command(&Command::DeclareStructArity(2)), None);
    }

    #[test]
    fn test_define_function() {
        let y = Yices::new();
        let def = Command::DefineSymbol {
            name: "f".to_string(),
            args: vec![("a".to_string(), Encoding::Int)],
            ret: Encoding::Int,
            body: y.add(&["a".to_string(), "1".to_string()]),
        };
        assert_eq!(
            y.render_command(&def).unwrap(),
            "(define f::(-> int int) (lambda (a::int) (+ a 1)))"
        );
        let decl = Command::DeclareSymbol {
            name: "arr".to_string(),
            args: vec![Encoding::Int],
            ret: Encoding::Bool,
        };
        assert_eq!(y.render_command(&decl).unwrap(), "(define arr::(-> int bool))");
    }

    #[test]
    fn test_optional_combinators_present() {
        let y = Yices::new();
        let enc = Encoding::Array {
            index: vec![Encoding::Int],
            element: Box::new(Encoding::Bool),
            repr: ArrayRepr::Function,
        };
        assert_eq!(
            y.const_array(&[("k!4".to_string(), Encoding::Int)], &enc, &"false".to_string())
                .unwrap(),
            "(lambda (k!4::int) false)"
        );
        assert_eq!(
            y.fn_update(&"f".to_string(), &["3".to_string()], &"true".to_string())
                .unwrap(),
            "(update f (3) true)"
        );
    }

    #[test]
    fn test_sanitize_symbol() {
        let y = Yices::new();
        assert_eq!(y.sanitize_symbol("x!2"), "x!2");
        assert_eq!(y.sanitize_symbol("a b"), "a_b");
        assert_eq!(y.sanitize_symbol("define"), "define_");
        assert_eq!(y.sanitize_symbol("9lives"), "_9lives");
    }
}
