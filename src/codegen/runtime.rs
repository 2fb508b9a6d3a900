//! Names and calling conventions of the C runtime library.
//!
//! Generated code includes a single runtime header, [`HEADER_NAME`], whose
//! text ships with the compiler as [`HEADER`]. The generator never emits a
//! runtime call that the header does not declare:
//!
//! | Group | Primitives |
//! |---|---|
//! | bigint | `rt_int_{init,clear,copy,set_si,from_dec,from_dec_or_raise,to_si_checked}` |
//! | bigint arithmetic | `rt_int_{add,sub,mul,floordiv,mod,pow,powmod,cmp,truthy}` |
//! | strings | `rt_str_{from_cstr,concat,eq,len,free,null}`, `rt_str_from_{si,int,double}` |
//! | lists | `rt_list_si_{init,append,set,get,len,clear}` |
//! | dicts | `rt_dict_ssi_{init,set,get,len,clear}` |
//! | math | `rt_math_{abs,min,max}_si`, `rt_math_abs` |
//! | printing | `rt_print_{int,str,float,list_si,dict_ssi}` |
//! | exceptions | `rt_try_push`, `rt_try_pop`, `rt_raise`, `rt_reraise`, `rt_exc_is`, `rt_exc_clear` |
//!
//! `rt_int_to_si_checked` returns 1 when the value fits and `rt_str_eq`
//! returns 0 for equal strings.

use crate::types::Type;

pub const HEADER_NAME: &str = "pcc_rt.h";

pub const HEADER: &str = include_str!("../../runtime/pcc_rt.h");

pub const C_HEADERS: &str = r#"#include <limits.h>
#include <math.h>
#include <setjmp.h>
#include <stdio.h>
#include <stdlib.h>
#include "pcc_rt.h"
"#;

pub fn class_struct(class: &str) -> String {
    format!("struct pcc_class_{class}")
}

pub fn class_new(class: &str) -> String {
    format!("pcc_new_{class}")
}

pub fn class_delete(class: &str) -> String {
    format!("pcc_delete_{class}")
}

pub fn method_name(class: &str, method: &str) -> String {
    format!("pcc_m_{class}_{method}")
}

pub fn function_name(function: &str) -> String {
    format!("pcc_fn_{function}")
}

pub fn local_name(name: &str) -> String {
    format!("pcc_v_{name}")
}

pub fn param_name(name: &str) -> String {
    format!("pcc_p_{name}")
}

pub fn c_type(ty: &Type) -> String {
    match ty {
        Type::Int => "long long".to_string(),
        Type::BigInt => "rt_int".to_string(),
        Type::Float => "double".to_string(),
        Type::Str => "rt_str".to_string(),
        Type::List => "rt_list_si".to_string(),
        Type::Dict => "rt_dict_ssi".to_string(),
        Type::Object(class) => format!("{}*", class_struct(class)),
    }
}

/// Declaration plus initialization of a variable. `volatile` applies to
/// scalars that must survive a `longjmp` back into their function.
pub fn declare(ty: &Type, name: &str, volatile: bool) -> Vec<String> {
    let qualifier = if volatile { "volatile " } else { "" };
    match ty {
        Type::Int => vec![format!("{qualifier}long long {name} = 0;")],
        Type::Float => vec![format!("{qualifier}double {name} = 0.0;")],
        Type::BigInt => vec![format!("rt_int {name};"), format!("rt_int_init(&{name});")],
        Type::Str => vec![format!("rt_str {name} = rt_str_null();")],
        Type::List => vec![
            format!("rt_list_si {name};"),
            format!("rt_list_si_init(&{name});"),
        ],
        Type::Dict => vec![
            format!("rt_dict_ssi {name};"),
            format!("rt_dict_ssi_init(&{name});"),
        ],
        Type::Object(class) => {
            let pointer_qualifier = if volatile { "volatile " } else { "" };
            vec![format!(
                "{} *{pointer_qualifier}{name} = NULL;",
                class_struct(class)
            )]
        }
    }
}

/// Values stored as C structs rather than scalars or pointers.
pub fn is_struct(ty: &Type) -> bool {
    matches!(ty, Type::BigInt | Type::Str | Type::List | Type::Dict)
}

/// Declares `name` as a pointer to a heap cell holding a struct value, used
/// for struct locals of a function that calls `setjmp`. The value is
/// `(*name)`.
pub fn declare_boxed(ty: &Type, name: &str) -> Vec<String> {
    let c_type = c_type(ty);
    let init = match ty {
        Type::BigInt => format!("rt_int_init({name});"),
        Type::Str => format!("*{name} = rt_str_null();"),
        Type::List => format!("rt_list_si_init({name});"),
        Type::Dict => format!("rt_dict_ssi_init({name});"),
        _ => return declare(ty, name, true),
    };
    vec![
        format!("{c_type} *const {name} = ({c_type} *)malloc(sizeof({c_type}));"),
        init,
    ]
}

/// Releases the value in a heap cell from [`declare_boxed`], then the cell.
pub fn release_boxed(ty: &Type, name: &str) -> Vec<String> {
    release(ty, &format!("(*{name})"))
        .into_iter()
        .chain(std::iter::once(format!("free({name});")))
        .collect()
}

/// Statement that gives back whatever `name` owns, or `None` for values that
/// own nothing.
pub fn release(ty: &Type, name: &str) -> Option<String> {
    match ty {
        Type::Int | Type::Float => None,
        Type::BigInt => Some(format!("rt_int_clear(&{name});")),
        Type::Str => Some(format!("rt_str_free(&{name});")),
        Type::List => Some(format!("rt_list_si_clear(&{name});")),
        Type::Dict => Some(format!("rt_dict_ssi_clear(&{name});")),
        Type::Object(class) => Some(format!(
            "if ({name} != NULL) {}({name});",
            class_delete(class)
        )),
    }
}

/// C expression that is non-zero when the value is truthy.
pub fn truthy(ty: &Type, code: &str) -> String {
    match ty {
        Type::Int => format!("({code} != 0)"),
        Type::Float => format!("({code} != 0.0)"),
        Type::BigInt => format!("rt_int_truthy(&{code})"),
        Type::Str => format!("(rt_str_len(&{code}) != 0)"),
        Type::List => format!("(rt_list_si_len(&{code}) != 0)"),
        Type::Dict => format!("(rt_dict_ssi_len(&{code}) != 0)"),
        Type::Object(_) => format!("({code} != NULL)"),
    }
}

/// C literal for an integer that fits in `long long`.
pub fn int_literal(value: i64) -> String {
    if value == i64::MIN {
        "(-9223372036854775807LL - 1)".to_string()
    } else if value < 0 {
        format!("({value}LL)")
    } else {
        format!("{value}LL")
    }
}

pub fn float_literal(value: f64) -> String {
    let text = format!("{value:?}");
    if value < 0.0 { format!("({text})") } else { text }
}

pub fn c_string(value: &str) -> String {
    format!("\"{}\"", escape_c_string(value))
}

/// Escapes a string for a C literal. Non-printable bytes become three-digit
/// octal escapes, which never absorb a following digit.
pub fn escape_c_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'\\' => escaped.push_str("\\\\"),
            b'"' => escaped.push_str("\\\""),
            b'\n' => escaped.push_str("\\n"),
            b'\r' => escaped.push_str("\\r"),
            b'\t' => escaped.push_str("\\t"),
            b'?' => escaped.push_str("\\?"),
            0x20..=0x7e => escaped.push(byte as char),
            _ => escaped.push_str(&format!("\\{byte:03o}")),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_c_strings() {
        assert_eq!(escape_c_string("a\"b\\c\n"), "a\\\"b\\\\c\\n");
        assert_eq!(escape_c_string("\0"), "\\000");
        assert_eq!(escape_c_string("é"), "\\303\\251");
        assert_eq!(escape_c_string("??="), "\\?\\?=");
    }

    #[test]
    fn formats_integer_literals() {
        assert_eq!(int_literal(42), "42LL");
        assert_eq!(int_literal(-5), "(-5LL)");
        assert_eq!(int_literal(i64::MIN), "(-9223372036854775807LL - 1)");
    }

    #[test]
    fn declares_and_releases_by_type() {
        assert_eq!(
            declare(&Type::BigInt, "pcc_v_n", false),
            vec!["rt_int pcc_v_n;", "rt_int_init(&pcc_v_n);"]
        );
        assert_eq!(
            declare(&Type::Int, "pcc_v_i", true),
            vec!["volatile long long pcc_v_i = 0;"]
        );
        assert_eq!(
            declare(&Type::Object("P".to_string()), "pcc_v_p", false),
            vec!["struct pcc_class_P *pcc_v_p = NULL;"]
        );
        assert_eq!(
            declare_boxed(&Type::Str, "pcc_v_s"),
            vec![
                "rt_str *const pcc_v_s = (rt_str *)malloc(sizeof(rt_str));",
                "*pcc_v_s = rt_str_null();"
            ]
        );
        assert_eq!(
            release_boxed(&Type::BigInt, "pcc_v_n"),
            vec!["rt_int_clear(&(*pcc_v_n));", "free(pcc_v_n);"]
        );
        assert_eq!(release(&Type::Int, "pcc_v_i"), None);
        assert_eq!(
            release(&Type::Str, "pcc_v_s").as_deref(),
            Some("rt_str_free(&pcc_v_s);")
        );
    }
}
