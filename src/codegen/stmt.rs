use super::runtime::{self, int_literal};
use super::state::label;
use super::{BodyGen, CodegenError, CodegenResult, LoopTarget, Operand};
use crate::builtins::ErrorKind;
use crate::ir::{ExceptClause, Expression, Statement};
use crate::types::Type;

impl BodyGen<'_, '_> {
    pub(super) fn block(&mut self, body: &[Statement]) -> CodegenResult<()> {
        for statement in body {
            self.statement(statement)?;
        }
        Ok(())
    }

    /// Emits `statement`'s expression work inside its own frame.
    fn framed(
        &mut self,
        emit: impl FnOnce(&mut Self) -> CodegenResult<()>,
    ) -> CodegenResult<()> {
        self.begin_frame();
        let result = emit(self);
        self.end_frame();
        result
    }

    fn statement(&mut self, statement: &Statement) -> CodegenResult<()> {
        match statement {
            Statement::Assign { name, value, line } => self.framed(|body| {
                let value = body.expr(value, *line)?;
                body.assign_local(name, value, *line)
            }),
            Statement::AttrAssign {
                object,
                attribute,
                value,
                line,
            } => self.framed(|body| {
                let value = body.expr(value, *line)?;
                let value = body.native(value, *line)?;
                let object = body.local(object);
                body.writer
                    .push_line(format!("{object}->{attribute} = {value};"));
                Ok(())
            }),
            Statement::SubscriptAssign {
                object,
                index,
                value,
                line,
            } => self.framed(|body| body.subscript_assign(object, index, value, *line)),
            Statement::MethodCall {
                object,
                method,
                args,
                line,
            } => self.framed(|body| {
                if method == "append" && body.env.get(object) == Some(&Type::List) {
                    let [arg] = args.as_slice() else {
                        return Err(CodegenError::unsupported(
                            "append() takes exactly one argument",
                            *line,
                        ));
                    };
                    let value = body.expr(arg, *line)?;
                    let value = body.native(value, *line)?;
                    let list = body.local(object);
                    body.writer
                        .push_line(format!("rt_list_si_append(&{list}, {value});"));
                    return Ok(());
                }
                body.method_call(object, method, args, *line).map(|_| ())
            }),
            Statement::Expr { value, line } => {
                self.framed(|body| body.expr(value, *line).map(|_| ()))
            }
            Statement::Print { value, line } => self.framed(|body| {
                let value = body.expr(value, *line)?;
                body.print(&value, *line)
            }),
            Statement::If {
                condition,
                then_body,
                else_body,
                line,
            } => {
                let test = self.condition(condition, *line)?;
                self.writer.open(format!("if ({test})"));
                self.block(then_body)?;
                if !else_body.is_empty() {
                    self.writer.dedent();
                    self.writer.push_line("} else {");
                    self.writer.indent();
                    self.block(else_body)?;
                }
                self.writer.close();
                Ok(())
            }
            Statement::While {
                condition,
                body,
                line,
            } => {
                let id = self.state.label_id();
                let head = label("while", id);
                let end = label("end_while", id);
                self.writer.push_label(&head);
                let test = self.condition(condition, *line)?;
                self.writer.push_line(format!("if (!{test}) goto {end};"));
                self.loop_body(body, &end, &head)?;
                self.writer.push_line(format!("goto {head};"));
                self.writer.push_label(&end);
                Ok(())
            }
            Statement::ForRange {
                var,
                start,
                stop,
                step,
                body,
                line,
            } => self.for_range(var, [start, stop, step], body, *line),
            Statement::Try {
                body,
                handlers,
                line: _,
            } => self.try_except(body, handlers),
            Statement::Raise {
                kind,
                message,
                line,
            } => {
                let raise = self.raise(*kind, message.as_deref().unwrap_or(""), *line);
                self.writer.push_line(raise);
                Ok(())
            }
            Statement::Return { value, line } => self.return_statement(value.as_ref(), *line),
            Statement::Break { line } => {
                let target = self.loop_target("break", *line)?;
                self.leave_tries(target.1);
                self.writer.push_line(format!("goto {};", target.0));
                Ok(())
            }
            Statement::Continue { line } => {
                let target = self.loop_target("continue", *line)?;
                self.leave_tries(target.1);
                self.writer.push_line(format!("goto {};", target.2));
                if let Some(innermost) = self.loops.last_mut() {
                    innermost.continued = true;
                }
                Ok(())
            }
            Statement::Pass => Ok(()),
        }
    }

    /// Innermost loop as `(break label, try depth, continue label)`.
    fn loop_target(
        &self,
        keyword: &'static str,
        line: usize,
    ) -> CodegenResult<(String, usize, String)> {
        self.loops
            .last()
            .map(|target| {
                (
                    target.break_label.clone(),
                    target.try_depth,
                    target.continue_label.clone(),
                )
            })
            .ok_or(CodegenError::UnboundLoopTarget { keyword, line })
    }

    /// Pops every try context entered since `depth`, innermost first.
    fn leave_tries(&mut self, depth: usize) {
        let contexts: Vec<String> = self.tries[depth.min(self.tries.len())..]
            .iter()
            .rev()
            .map(|context| format!("rt_try_pop(&{context});"))
            .collect();
        for line in contexts {
            self.writer.push_line(line);
        }
    }

    /// Emits a loop body. Returns whether any `continue` targeted it.
    fn loop_body(
        &mut self,
        body: &[Statement],
        break_label: &str,
        continue_label: &str,
    ) -> CodegenResult<bool> {
        self.loops.push(LoopTarget {
            break_label: break_label.to_string(),
            continue_label: continue_label.to_string(),
            try_depth: self.tries.len(),
            continued: false,
        });
        let result = self.block(body);
        let target = self.loops.pop();
        result.map(|()| target.is_some_and(|target| target.continued))
    }

    /// Evaluates a branch condition. When it needs temporaries, the result
    /// is parked in a flag declared ahead of the frame's block.
    fn condition(&mut self, condition: &Expression, line: usize) -> CodegenResult<String> {
        let mark = self.writer.mark();
        self.begin_frame();
        let test = match self.truth(condition, line) {
            Ok(test) => test,
            Err(err) => {
                self.end_frame();
                return Err(err);
            }
        };
        let needs_flag = self.frames.last().is_some_and(|frame| !frame.temps.is_empty());
        if !needs_flag {
            self.end_frame();
            return Ok(test);
        }
        let flag = self.state.temp();
        self.writer.push_line(format!("{flag} = {test};"));
        self.end_frame();
        self.writer.insert(mark, format!("int {flag};"));
        Ok(flag)
    }

    pub(super) fn bind_param(&mut self, param: &str, param_ty: &Type, line: usize) -> CodegenResult<()> {
        let local = self.local(param);
        let incoming = runtime::param_name(param);
        let local_ty = self
            .env
            .get(param)
            .cloned()
            .ok_or_else(|| CodegenError::unsupported(format!("parameter '{param}' has no type"), line))?;
        let binding = match (param_ty, &local_ty) {
            (Type::BigInt, Type::BigInt) => format!("rt_int_copy(&{local}, {incoming});"),
            (Type::Int, Type::BigInt) => format!("rt_int_set_si(&{local}, {incoming});"),
            (from, to) if from == to => format!("{local} = {incoming};"),
            (from, to) => {
                return Err(CodegenError::unsupported(
                    format!("parameter '{param}' of type {from} stored as {to}"),
                    line,
                ));
            }
        };
        self.writer.push_line(binding);
        Ok(())
    }

    /// Stores `value` into the local `name`, converting integers to the
    /// local's storage type and taking over fresh temporaries.
    fn assign_local(&mut self, name: &str, value: Operand, line: usize) -> CodegenResult<()> {
        let local = self.local(name);
        let target = self
            .env
            .get(name)
            .cloned()
            .ok_or_else(|| CodegenError::unsupported(format!("name '{name}' has no type"), line))?;
        let value = self.coerce(value, &target, line)?;
        match &target {
            Type::Int | Type::Float => {
                self.writer.push_line(format!("{local} = {};", value.code));
            }
            Type::BigInt | Type::Str => {
                let fresh = if self.steal(&value.code) {
                    value.code
                } else if target == Type::BigInt {
                    return self.store(&local, &value, line);
                } else {
                    // Copy before freeing, the source may be the local itself.
                    let copy = self.temp(Type::Str, line)?;
                    self.writer.push_line(format!(
                        "{copy} = rt_str_concat({}, rt_str_null());",
                        value.code
                    ));
                    self.steal(&copy);
                    copy
                };
                if let Some(release) = runtime::release(&target, &local) {
                    self.writer.push_line(release);
                }
                self.writer.push_line(format!("{local} = {fresh};"));
            }
            Type::List | Type::Dict | Type::Object(_) => {
                if !self.steal(&value.code) {
                    return Err(CodegenError::unsupported(
                        format!("'{name}' can only be bound to a new {target}"),
                        line,
                    ));
                }
                let keeps_previous = self.receiver.as_deref() == Some(name);
                if !keeps_previous && let Some(release) = runtime::release(&target, &local) {
                    self.writer.push_line(release);
                }
                self.writer.push_line(format!("{local} = {};", value.code));
            }
        }
        Ok(())
    }

    fn subscript_assign(
        &mut self,
        object: &str,
        index: &Expression,
        value: &Expression,
        line: usize,
    ) -> CodegenResult<()> {
        let container = self.local(object);
        match self.env.get(object).cloned() {
            Some(Type::List) => {
                let index = self.expr(index, line)?;
                let index = self.native(index, line)?;
                let value = self.expr(value, line)?;
                let value = self.native(value, line)?;
                self.writer
                    .push_line(format!("rt_list_si_set(&{container}, {index}, {value});"));
            }
            Some(Type::Dict) => {
                let key = self.expr(index, line)?;
                let value = self.expr(value, line)?;
                let value = self.native(value, line)?;
                self.writer.push_line(format!(
                    "rt_dict_ssi_set(&{container}, {}, {value});",
                    key.code
                ));
            }
            other => {
                return Err(CodegenError::unsupported(
                    format!(
                        "'{object}' of type {} does not support item assignment",
                        other.map_or_else(|| "unknown".to_string(), |ty| ty.to_string())
                    ),
                    line,
                ));
            }
        }
        Ok(())
    }

    fn print(&mut self, value: &Operand, line: usize) -> CodegenResult<()> {
        let code = &value.code;
        let call = match &value.ty {
            Type::Int => format!("printf(\"%lld\\n\", {code});"),
            Type::BigInt => format!("rt_print_int(&{code});"),
            Type::Float => format!("rt_print_float({code});"),
            Type::Str => format!("rt_print_str({code});"),
            Type::List => format!("rt_print_list_si(&{code});"),
            Type::Dict => format!("rt_print_dict_ssi(&{code});"),
            Type::Object(class) => {
                return Err(CodegenError::unsupported(
                    format!("cannot print an instance of class '{class}'"),
                    line,
                ));
            }
        };
        self.writer.push_line(call);
        Ok(())
    }

    /// `for var in range(start, stop, step)`. Bounds and step are evaluated
    /// once into native integers; the direction follows the sign of the
    /// step at runtime.
    fn for_range(
        &mut self,
        var: &str,
        bounds: [&Expression; 3],
        body: &[Statement],
        line: usize,
    ) -> CodegenResult<()> {
        let id = self.state.label_id();
        let head = label("for", id);
        let next = label("next_for", id);
        let end = label("end_for", id);
        let start = format!("pcc_start_{id}");
        let stop = format!("pcc_stop_{id}");
        let step = format!("pcc_step_{id}");
        let iter = format!("pcc_iter_{id}");

        self.writer.push_line("{");
        self.writer.indent();
        for name in [&start, &stop, &step, &iter] {
            self.writer.push_line(format!("long long {name};"));
        }
        self.framed(|body| {
            for (name, bound) in [&start, &stop, &step].into_iter().zip(bounds) {
                let value = body.expr(bound, line)?;
                let value = body.native(value, line)?;
                body.writer.push_line(format!("{name} = {value};"));
            }
            Ok(())
        })?;
        let literal_step = matches!(bounds[2], Expression::Int(_));
        if !literal_step {
            let raise = self.raise(ErrorKind::Value, "range() arg 3 must not be zero", line);
            self.writer.push_line(format!("if ({step} == 0) {raise}"));
        }
        self.writer.push_line(format!("{iter} = {start};"));
        self.writer.push_label(&head);
        self.writer.push_line(format!(
            "if ({step} > 0 ? {iter} >= {stop} : {iter} <= {stop}) goto {end};"
        ));
        self.framed(|body| body.assign_local(var, Operand::new(iter.clone(), Type::Int), line))?;
        if self.loop_body(body, &end, &next)? {
            self.writer.push_label(&next);
        }
        self.writer.push_line(format!("{iter} += {step};"));
        self.writer.push_line(format!("goto {head};"));
        self.writer.push_label(&end);
        self.writer.close();
        Ok(())
    }

    fn try_except(&mut self, body: &[Statement], handlers: &[ExceptClause]) -> CodegenResult<()> {
        let context = format!("pcc_try_{}", self.state.label_id());
        self.writer.push_line("{");
        self.writer.indent();
        self.writer.push_line(format!("rt_try_ctx {context};"));
        self.writer.push_line(format!("rt_try_push(&{context});"));
        self.writer
            .open(format!("if (setjmp({context}.env) == 0)"));
        self.tries.push(context.clone());
        let result = self.block(body);
        self.tries.pop();
        result?;
        self.writer.push_line(format!("rt_try_pop(&{context});"));
        self.writer.dedent();

        let mut catches_everything = false;
        for handler in handlers {
            match handler.kind {
                None | Some(ErrorKind::Generic) => {
                    self.writer.push_line("} else {");
                    catches_everything = true;
                }
                Some(kind) => self
                    .writer
                    .push_line(format!("}} else if (rt_exc_is({})) {{", kind.c_name())),
            }
            self.writer.indent();
            self.writer.push_line("rt_exc_clear();");
            self.writer.push_line(format!("rt_try_pop(&{context});"));
            self.block(&handler.body)?;
            self.writer.dedent();
            if catches_everything {
                break;
            }
        }
        if !catches_everything {
            self.writer.push_line("} else {");
            self.writer.indent();
            self.writer.push_line(format!("rt_try_pop(&{context});"));
            self.writer.push_line("rt_reraise();");
            self.writer.dedent();
        }
        self.writer.push_line("}");
        self.writer.close();
        Ok(())
    }

    fn return_statement(&mut self, value: Option<&Expression>, line: usize) -> CodegenResult<()> {
        let Some(return_label) = self.return_label.clone() else {
            return Err(CodegenError::unsupported("'return' outside function", line));
        };
        if let Some(value) = value {
            let int_type = self.int_type();
            self.framed(|body| {
                let value = body.expr(value, line)?;
                let value = body.coerce(value, &int_type, line)?;
                let store = match int_type {
                    Type::BigInt => format!("rt_int_copy(pcc_ret, &{});", value.code),
                    _ => format!("pcc_ret = {};", value.code),
                };
                body.writer.push_line(store);
                Ok(())
            })?;
        } else if self.int_type() == Type::BigInt {
            self.writer.push_line("rt_int_set_si(pcc_ret, 0);");
        } else {
            self.writer.push_line(format!("pcc_ret = {};", int_literal(0)));
        }
        self.leave_tries(0);
        self.writer.push_line(format!("goto {return_label};"));
        Ok(())
    }
}
