//! Lowers a checked IR module to a single C translation unit.
//!
//! Each function body is emitted by a [`BodyGen`], which owns the body's
//! type environment and line buffer and borrows the module-wide
//! [`GenState`]. Every simple statement is emitted inside a *frame*: the
//! temporaries it needs are declared at the top of a C block and released at
//! its bottom, so compound statements never carry live temporaries into
//! their bodies.

use tracing::debug;

pub use self::error::{CodegenError, CodegenResult};
pub use self::state::GenState;
use self::writer::Writer;
use crate::backend::Backend;
use crate::config::Options;
use crate::ir::{FunctionDef, Module, Statement};
use crate::types::{Checker, Type, TypeEnv};

mod class;
mod error;
mod expr;
pub mod runtime;
mod state;
mod stmt;
mod writer;

/// A lowered expression: C code of the given type.
///
/// Scalars (`Int`, `Float`) carry an expression without side effects. Every
/// other type carries the name of an addressable variable or temporary,
/// which callers only borrow.
#[derive(Debug, Clone, PartialEq)]
struct Operand {
    code: String,
    ty: Type,
}

impl Operand {
    fn new(code: impl Into<String>, ty: Type) -> Self {
        Self {
            code: code.into(),
            ty,
        }
    }
}

#[derive(Debug)]
struct FrameTemp {
    name: String,
    ty: Type,
    /// Cleared once the value has been moved into a local.
    owned: bool,
}

#[derive(Debug)]
struct Frame {
    mark: usize,
    temps: Vec<FrameTemp>,
}

#[derive(Debug)]
struct LoopTarget {
    break_label: String,
    continue_label: String,
    try_depth: usize,
    /// Set once a `continue` jumps to `continue_label`.
    continued: bool,
}

struct BodyGen<'a, 'm> {
    checker: &'a Checker<'m>,
    state: &'a mut GenState,
    /// Quoted C literal naming the source file, for `rt_raise`.
    source: &'a str,
    env: TypeEnv,
    writer: Writer,
    frames: Vec<Frame>,
    loops: Vec<LoopTarget>,
    tries: Vec<String>,
    return_label: Option<String>,
    /// Receiver of the method being emitted; never deleted by this body.
    receiver: Option<String>,
    /// Struct locals live in heap cells because the body calls `setjmp`.
    boxed_locals: bool,
}

impl<'a, 'm> BodyGen<'a, 'm> {
    fn new(
        checker: &'a Checker<'m>,
        state: &'a mut GenState,
        source: &'a str,
        env: TypeEnv,
    ) -> Self {
        Self {
            checker,
            state,
            source,
            env,
            writer: Writer::new(1),
            frames: Vec::new(),
            loops: Vec::new(),
            tries: Vec::new(),
            return_label: None,
            receiver: None,
            boxed_locals: false,
        }
    }

    /// C lvalue of the local `name`.
    fn local(&self, name: &str) -> String {
        let c_name = runtime::local_name(name);
        match self.env.get(name) {
            Some(ty) if self.boxed_locals && runtime::is_struct(ty) => format!("(*{c_name})"),
            _ => c_name,
        }
    }

    fn int_type(&self) -> Type {
        self.checker.backend().int_type()
    }

    fn begin_frame(&mut self) {
        let mark = self.writer.mark();
        self.frames.push(Frame {
            mark,
            temps: Vec::new(),
        });
    }

    /// Closes the innermost frame, wrapping its lines in a block when it
    /// declared temporaries. Returns whether a block was emitted.
    fn end_frame(&mut self) -> bool {
        let Some(frame) = self.frames.pop() else {
            return false;
        };
        if frame.temps.is_empty() {
            return false;
        }
        let prologue: Vec<String> = frame
            .temps
            .iter()
            .flat_map(|temp| runtime::declare(&temp.ty, &temp.name, false))
            .collect();
        let epilogue: Vec<String> = frame
            .temps
            .iter()
            .rev()
            .filter(|temp| temp.owned)
            .filter_map(|temp| runtime::release(&temp.ty, &temp.name))
            .collect();
        self.writer.wrap(frame.mark, "", &prologue, &epilogue);
        true
    }

    fn temp(&mut self, ty: Type, line: usize) -> CodegenResult<String> {
        let name = self.state.temp();
        let frame = self
            .frames
            .last_mut()
            .ok_or_else(|| CodegenError::unsupported("temporary outside of a statement", line))?;
        frame.temps.push(FrameTemp {
            name: name.clone(),
            ty,
            owned: true,
        });
        Ok(name)
    }

    /// Transfers ownership of a frame temporary to the caller, so the frame
    /// no longer releases it.
    fn steal(&mut self, name: &str) -> bool {
        let Some(frame) = self.frames.last_mut() else {
            return false;
        };
        match frame
            .temps
            .iter_mut()
            .find(|temp| temp.name == name && temp.owned)
        {
            Some(temp) => {
                temp.owned = false;
                true
            }
            None => false,
        }
    }

    /// Declares every local. With `uses_setjmp`, scalars and object pointers
    /// are `volatile` and struct values are boxed.
    fn declare_locals(&mut self, uses_setjmp: bool) {
        self.boxed_locals = uses_setjmp;
        let declarations: Vec<String> = self
            .env
            .iter()
            .flat_map(|(name, ty)| {
                let c_name = runtime::local_name(name);
                if uses_setjmp && runtime::is_struct(ty) {
                    runtime::declare_boxed(ty, &c_name)
                } else {
                    runtime::declare(ty, &c_name, uses_setjmp)
                }
            })
            .collect();
        for line in declarations {
            self.writer.push_line(line);
        }
    }

    /// Releases every local that owns storage. `keep_objects` leaves class
    /// instances alone.
    fn release_locals(&mut self, keep_objects: bool) {
        let releases: Vec<String> = self
            .env
            .iter()
            .filter(|(name, ty)| {
                !(keep_objects && matches!(ty, Type::Object(_)))
                    && self.receiver.as_deref() != Some(*name)
            })
            .flat_map(|(name, ty)| {
                let c_name = runtime::local_name(name);
                if self.boxed_locals && runtime::is_struct(ty) {
                    runtime::release_boxed(ty, &c_name)
                } else {
                    runtime::release(ty, &c_name).into_iter().collect()
                }
            })
            .collect();
        for line in releases {
            self.writer.push_line(line);
        }
    }
}

fn contains_try(body: &[Statement]) -> bool {
    body.iter().any(|statement| match statement {
        Statement::Try { .. } => true,
        Statement::If {
            then_body,
            else_body,
            ..
        } => contains_try(then_body) || contains_try(else_body),
        Statement::While { body, .. } | Statement::ForRange { body, .. } => contains_try(body),
        _ => false,
    })
}

/// `static` prototype of a function or method, without the trailing `;`.
fn callable_signature(name: &str, params: &[(String, Type)], int_type: &Type) -> String {
    let mut parts = Vec::with_capacity(params.len() + 1);
    let precise = *int_type == Type::BigInt;
    if precise {
        parts.push("rt_int *pcc_ret".to_string());
    }
    for (param, ty) in params {
        let c_name = runtime::param_name(param);
        parts.push(match ty {
            Type::BigInt => format!("const rt_int *{c_name}"),
            Type::Object(class) => format!("{} *{c_name}", runtime::class_struct(class)),
            other => format!("{} {c_name}", runtime::c_type(other)),
        });
    }
    let params = if parts.is_empty() {
        "void".to_string()
    } else {
        parts.join(", ")
    };
    let return_type = if precise { "void" } else { "long long" };
    format!("static {return_type} {name}({params})")
}

fn function_params(function: &FunctionDef, int_type: &Type) -> Vec<(String, Type)> {
    function
        .params
        .iter()
        .map(|param| (param.clone(), int_type.clone()))
        .collect()
}

fn method_params(class: &str, method: &FunctionDef, int_type: &Type) -> Vec<(String, Type)> {
    method
        .params
        .iter()
        .enumerate()
        .map(|(index, param)| {
            let ty = if index == 0 {
                Type::Object(class.to_string())
            } else {
                int_type.clone()
            };
            (param.clone(), ty)
        })
        .collect()
}

struct Callable<'d> {
    c_name: String,
    def: &'d FunctionDef,
    params: Vec<(String, Type)>,
    env: TypeEnv,
    receiver: Option<String>,
}

pub struct Generator<'m> {
    checker: Checker<'m>,
    state: GenState,
    source: String,
}

impl<'m> Generator<'m> {
    pub fn new(module: &'m Module, options: &Options) -> Self {
        Self {
            checker: Checker::new(module, options.backend),
            state: GenState::new(),
            source: runtime::c_string(&options.source_name),
        }
    }

    pub fn generate(mut self) -> CodegenResult<String> {
        let module = self.checker.module();
        let backend = self.checker.backend();
        let int_type = backend.int_type();

        let mut callables = Vec::new();
        for class in &module.classes {
            for method in &class.methods {
                callables.push(Callable {
                    c_name: runtime::method_name(&class.name, &method.name),
                    def: method,
                    params: method_params(&class.name, method, &int_type),
                    env: self.checker.method_env(class, method)?,
                    receiver: method.params.first().cloned(),
                });
            }
        }
        for function in &module.functions {
            callables.push(Callable {
                c_name: runtime::function_name(&function.name),
                def: function,
                params: function_params(function, &int_type),
                env: self.checker.function_env(function)?,
                receiver: None,
            });
        }
        let main_env = self.checker.main_env()?;

        let mut output = format!("/* generated by pcc, {} backend */\n", backend.name());
        output.push_str(runtime::C_HEADERS);

        for class in &module.classes {
            output.push('\n');
            class::emit_struct(class, &mut output);
        }
        if !module.classes.is_empty() || !callables.is_empty() {
            output.push('\n');
        }
        for class in &module.classes {
            class::emit_lifecycle_prototypes(class, &mut output);
        }
        for callable in &callables {
            let signature = callable_signature(&callable.c_name, &callable.params, &int_type);
            output.push_str(&format!("{signature};\n"));
        }
        for class in &module.classes {
            output.push('\n');
            class::emit_lifecycle(class, &mut output)?;
        }
        for callable in callables {
            output.push('\n');
            self.emit_callable(callable, &int_type, &mut output)?;
        }
        output.push('\n');
        self.emit_main(main_env, &mut output)?;

        debug!(
            backend = backend.name(),
            bytes = output.len(),
            temps = self.state.temps_issued(),
            "generated C source"
        );
        Ok(output)
    }

    fn emit_callable(
        &mut self,
        callable: Callable<'_>,
        int_type: &Type,
        output: &mut String,
    ) -> CodegenResult<()> {
        let signature = callable_signature(&callable.c_name, &callable.params, int_type);
        let return_label = state::label("return", self.state.label_id());
        let uses_setjmp = contains_try(&callable.def.body);

        let mut body = BodyGen::new(&self.checker, &mut self.state, &self.source, callable.env);
        body.return_label = Some(return_label.clone());
        body.receiver = callable.receiver;
        body.declare_locals(uses_setjmp);
        match int_type {
            Type::BigInt => body.writer.push_line("rt_int_set_si(pcc_ret, 0);"),
            _ => body.writer.push_line("long long pcc_ret = 0;"),
        }
        for (param, param_ty) in &callable.params {
            body.bind_param(param, param_ty, callable.def.line)?;
        }
        body.block(&callable.def.body)?;
        body.writer.push_label(&return_label);
        body.release_locals(false);
        if *int_type != Type::BigInt {
            body.writer.push_line("return pcc_ret;");
        }

        output.push_str(&format!("{signature} {{\n"));
        body.writer.render_into(output);
        output.push_str("}\n");
        Ok(())
    }

    fn emit_main(&mut self, env: TypeEnv, output: &mut String) -> CodegenResult<()> {
        let main = &self.checker.module().main;
        let mut body = BodyGen::new(&self.checker, &mut self.state, &self.source, env);
        body.declare_locals(contains_try(main));
        body.block(main)?;
        body.release_locals(true);
        body.writer.push_line("return 0;");

        output.push_str("int main(void) {\n");
        body.writer.render_into(output);
        output.push_str("}\n");
        Ok(())
    }
}

/// Generates C for `module` with default options for `backend`.
pub fn generate(module: &Module, backend: Backend) -> CodegenResult<String> {
    let options = Options {
        backend,
        ..Options::default()
    };
    generate_with_options(module, &options)
}

pub fn generate_with_options(module: &Module, options: &Options) -> CodegenResult<String> {
    Generator::new(module, options).generate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use indoc::indoc;

    fn emit(source: &str, backend: Backend) -> String {
        let module = parse(source).unwrap_or_else(|err| panic!("parse failed: {err}"));
        generate(&module, backend).unwrap_or_else(|err| panic!("codegen failed: {err}"))
    }

    #[test]
    fn emits_headers_and_main() {
        let c = emit("x = 1\ny = 2\nprint(x + y)\n", Backend::Fast);
        assert!(c.starts_with("/* generated by pcc, fast backend */\n#include <limits.h>"));
        let runtime_includes: Vec<&str> = c
            .lines()
            .filter(|line| line.starts_with("#include \""))
            .collect();
        assert_eq!(runtime_includes, ["#include \"pcc_rt.h\""]);
        assert!(c.contains("int main(void) {\n    long long pcc_v_x = 0;\n    long long pcc_v_y = 0;\n"));
        assert!(c.contains("    pcc_v_x = 1LL;\n"));
        assert!(c.contains("printf(\"%lld\\n\", (pcc_v_x + pcc_v_y));"));
        assert!(c.trim_end().ends_with("return 0;\n}"));
    }

    #[test]
    fn output_is_deterministic() {
        let source = indoc! {"
            def f(a, b):
                return a // b
            s = \"x\" + \"y\"
            for i in range(3):
                print(f(i, 2))
            print(s)
        "};
        for backend in Backend::ALL {
            assert_eq!(emit(source, backend), emit(source, backend));
        }
    }

    #[test]
    fn fast_functions_use_native_signatures() {
        let c = emit("def add(a, b):\n    return a + b\nprint(add(2, 3))\n", Backend::Fast);
        assert!(c.contains("static long long pcc_fn_add(long long pcc_p_a, long long pcc_p_b);"));
        assert!(c.contains("    pcc_v_a = pcc_p_a;\n"));
        assert!(c.contains("goto pcc_L_return_1;"));
        assert!(c.contains("pcc_L_return_1: ;\n    return pcc_ret;\n}"));
    }

    #[test]
    fn precise_functions_use_out_parameters() {
        let c = emit("def add(a, b):\n    return a + b\nprint(add(2, 3))\n", Backend::Precise);
        assert!(c.contains(
            "static void pcc_fn_add(rt_int *pcc_ret, const rt_int *pcc_p_a, const rt_int *pcc_p_b);"
        ));
        assert!(c.contains("rt_int_copy(&pcc_v_a, pcc_p_a);"));
        assert!(c.contains("rt_int_add(&"));
        assert!(c.contains("rt_print_int(&"));
        assert!(!c.contains("long long pcc_ret"));
    }

    #[test]
    fn floor_division_checks_zero_and_corrects_sign() {
        let c = emit("a = -7\nb = 2\nprint(a // b)\nprint(a % b)\n", Backend::Fast);
        assert!(c.contains(
            "rt_raise(RT_EXC_ZeroDivisionError, \"integer division or modulo by zero\", \"<input>\", 3);"
        ));
        assert!(c.contains("!= 0 && ((pcc_t"));
        assert!(c.contains("-= 1;"));
    }

    #[test]
    fn while_loops_use_label_pairs() {
        let source = indoc! {"
            i = 0
            while i < 3:
                if i == 1:
                    i = i + 1
                    continue
                print(i)
                i = i + 1
        "};
        let c = emit(source, Backend::Fast);
        assert!(c.contains("pcc_L_while_1: ;\n    if (!(pcc_v_i < 3LL)) goto pcc_L_end_while_1;"));
        assert!(c.contains("goto pcc_L_while_1;\npcc_L_end_while_1: ;"));
    }

    #[test]
    fn try_blocks_push_and_pop_contexts() {
        let source = indoc! {"
            try:
                raise ValueError(\"bad\")
            except ZeroDivisionError:
                print(1)
            except:
                print(2)
        "};
        let c = emit(source, Backend::Fast);
        assert!(c.contains("rt_try_push(&pcc_try_1);"));
        assert!(c.contains("if (setjmp(pcc_try_1.env) == 0) {"));
        assert!(c.contains("rt_raise(RT_EXC_ValueError, \"bad\", \"<input>\", 2);"));
        assert!(c.contains("} else if (rt_exc_is(RT_EXC_ZeroDivisionError)) {"));
        assert!(c.contains("rt_exc_clear();\n            rt_try_pop(&pcc_try_1);"));
        assert!(!c.contains("rt_reraise();"));
    }

    #[test]
    fn unmatched_handlers_reraise() {
        let c = emit("try:\n    pass\nexcept KeyError:\n    pass\n", Backend::Fast);
        assert!(c.contains("rt_try_pop(&pcc_try_1);\n            rt_reraise();"));
    }

    #[test]
    fn break_inside_try_pops_context() {
        let source = indoc! {"
            while 1:
                try:
                    break
                except:
                    pass
        "};
        let c = emit(source, Backend::Fast);
        assert!(c.contains("rt_try_pop(&pcc_try_2);\n            goto pcc_L_end_while_1;"));
    }

    #[test]
    fn classes_emit_struct_and_lifecycle() {
        let source = indoc! {"
            class Counter:
                count = 5
                def bump(self, by):
                    self.count = self.count + by
                    return self.count
            c = Counter()
            print(c.bump(2))
        "};
        let c = emit(source, Backend::Fast);
        assert!(c.contains("struct pcc_class_Counter {\n    long long count;\n};"));
        assert!(c.contains("self->count = 5LL;"));
        assert!(c.contains(
            "static long long pcc_m_Counter_bump(struct pcc_class_Counter *pcc_p_self, long long pcc_p_by);"
        ));
        assert!(c.contains("pcc_v_self->count = "));
        assert!(!c.contains("pcc_delete_Counter(pcc_v_self)"));
    }

    #[test]
    fn large_literals_become_bigints_on_fast_path() {
        let c = emit("x = 123456789012345678901234567890\nprint(x)\n", Backend::Fast);
        assert!(c.contains("rt_int pcc_v_x;"));
        assert!(c.contains("rt_int_from_dec(&pcc_t1, \"123456789012345678901234567890\");"));
        assert!(c.contains("rt_print_int(&pcc_v_x);"));
        assert!(c.contains("rt_int_clear(&pcc_v_x);"));
    }

    #[test]
    fn strings_are_escaped_and_released() {
        let c = emit("s = \"a\\\"b\"\nprint(s + \"!\")\n", Backend::Fast);
        assert!(c.contains("rt_str_from_cstr(\"a\\\"b\")"));
        assert!(c.contains("rt_str_concat(pcc_v_s, pcc_t"));
        assert!(c.contains("rt_str_free(&pcc_v_s);\n    return 0;"));
    }

    #[test]
    fn range_with_runtime_step_checks_for_zero() {
        let source = "s = 2\nfor i in range(0, 10, s):\n    print(i)\n";
        let c = emit(source, Backend::Fast);
        assert!(c.contains("rt_raise(RT_EXC_ValueError, \"range() arg 3 must not be zero\""));
        assert!(c.contains("> 0 ? "));
    }

    #[test]
    fn printed_comparisons_are_long_long() {
        let c = emit("a = 0\nprint(1 < 2)\nprint(not a)\n", Backend::Fast);
        assert!(c.contains("printf(\"%lld\\n\", ((long long)(1LL < 2LL)));"));
        assert!(c.contains("printf(\"%lld\\n\", ((long long)(!(pcc_v_a != 0))));"));
    }

    #[test]
    fn native_division_by_minus_one_cannot_trap() {
        let source = "a = 5\nb = -1\nprint(a // b)\nprint(a % b)\nprint(a // 2)\nprint(a // -1)\n";
        let c = emit(source, Backend::Fast);
        assert!(c.contains(
            " == LLONG_MIN) rt_raise(RT_EXC_ValueError, \"integer too large for a native integer\", \"<input>\", 3);"
        ));
        assert!(c.contains(" == -1 ? 0 : "));
        assert_eq!(c.matches("LLONG_MIN").count(), 2);
    }

    #[test]
    fn runtime_range_step_tests_direction() {
        let c = emit("down = -2\nfor k in range(6, 0, down):\n    print(k)\n", Backend::Fast);
        assert!(c.contains("pcc_step_1 = pcc_v_down;"));
        assert!(c.contains(
            "if (pcc_step_1 > 0 ? pcc_iter_1 >= pcc_stop_1 : pcc_iter_1 <= pcc_stop_1) goto pcc_L_end_for_1;"
        ));
        assert!(c.contains("pcc_iter_1 += pcc_step_1;"));
    }

    #[test]
    fn struct_locals_are_boxed_around_setjmp() {
        let source = indoc! {"
            s = \"a\"
            n = 0
            try:
                s = s + \"b\"
                n = 1
                raise ValueError(\"x\")
            except:
                print(s)
                print(n)
        "};
        let c = emit(source, Backend::Fast);
        assert!(c.contains("volatile long long pcc_v_n = 0;"));
        assert!(c.contains("rt_str *const pcc_v_s = (rt_str *)malloc(sizeof(rt_str));\n    *pcc_v_s = rt_str_null();"));
        assert!(c.contains("rt_print_str((*pcc_v_s));"));
        assert!(c.contains("rt_str_free(&(*pcc_v_s));\n    free(pcc_v_s);\n    return 0;"));
        assert!(!c.contains("rt_str pcc_v_s"));

        let precise = emit("def f(x):\n    try:\n        x = x + 1\n    except:\n        pass\n    return x\nprint(f(1))\n", Backend::Precise);
        assert!(precise.contains("rt_int *const pcc_v_x = (rt_int *)malloc(sizeof(rt_int));"));
        assert!(precise.contains("rt_int_copy(&(*pcc_v_x), pcc_p_x);"));
    }

    #[test]
    fn locals_without_try_are_plain() {
        let c = emit("s = \"a\"\nprint(s)\n", Backend::Fast);
        assert!(c.contains("rt_str pcc_v_s = rt_str_null();"));
        assert!(!c.contains("malloc"));
    }

    #[test]
    fn continue_label_only_when_used() {
        let plain = emit("for i in range(3):\n    print(i)\n", Backend::Fast);
        assert!(!plain.contains("pcc_L_next_for"));
        let skipping = emit("for i in range(3):\n    if i == 1:\n        continue\n    print(i)\n", Backend::Fast);
        assert!(skipping.contains("goto pcc_L_next_for_1;"));
        assert!(skipping.contains("pcc_L_next_for_1: ;"));
    }

    #[test]
    fn string_length_goes_through_the_runtime() {
        let c = emit("s = \"abc\"\nprint(len(s))\nif s:\n    print(1)\n", Backend::Fast);
        assert!(c.contains("((long long)rt_str_len(&pcc_v_s))"));
        assert!(c.contains("(rt_str_len(&pcc_v_s) != 0)"));
        assert!(!c.contains(".len"));
    }

    #[test]
    fn every_runtime_call_is_declared() {
        let source = indoc! {"
            class P:
                x = 1
            def f(a):
                try:
                    return a // 2
                except ZeroDivisionError:
                    return 0
            s = str(3) + \"x\"
            xs = [1, 2]
            xs.append(3)
            d = {\"k\": 1}
            d[\"j\"] = 2
            p = P()
            print(len(s) + len(xs) + len(d) + xs[0] + d[\"k\"] + p.x)
            print(abs(-2) + min(xs) + max(1, 2) + int(\"5\") + pow(2, 3) + pow(2, 3, 5))
            print(f(9) < 3)
            print(1.5)
            print(str(2.5))
            print(s == \"3x\")
        "};
        for backend in Backend::ALL {
            let c = emit(source, backend);
            let body = c.split_once("#include \"pcc_rt.h\"").map_or("", |(_, body)| body);
            for call in body.split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_')) {
                if call.starts_with("rt_") || call.starts_with("RT_EXC_") {
                    assert!(
                        runtime::HEADER.contains(call),
                        "{backend}: {call} missing from {}",
                        runtime::HEADER_NAME
                    );
                }
            }
        }
    }

    #[test]
    fn surfaces_type_errors() {
        let module = parse("a = \"x\"\nb = a + 1\n").expect("parse");
        let err = generate(&module, Backend::Fast).expect_err("type error");
        assert_eq!(err.line(), 2);
        assert!(matches!(err, CodegenError::Type(_)));
    }
}
