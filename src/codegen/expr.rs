use super::runtime::{self, c_string, int_literal, truthy};
use super::{BodyGen, CodegenError, CodegenResult, Operand};
use crate::builtins::{Builtin, ErrorKind};
use crate::ir::{BinaryOperator, CompareOperator, Expression, LogicalOperator, UnaryOperator};
use crate::types::Type;

impl BodyGen<'_, '_> {
    fn type_of(&self, expr: &Expression, line: usize) -> CodegenResult<Type> {
        Ok(self.checker.expr_type(&self.env, expr, line)?)
    }

    pub(super) fn raise(&self, kind: ErrorKind, message: &str, line: usize) -> String {
        format!(
            "rt_raise({}, {}, {}, {line});",
            kind.c_name(),
            c_string(message),
            self.source
        )
    }

    /// Lowers `expr`, emitting whatever statements it needs into the
    /// current frame.
    pub(super) fn expr(&mut self, expr: &Expression, line: usize) -> CodegenResult<Operand> {
        let ty = self.type_of(expr, line)?;
        match expr {
            Expression::Int(digits) => self.int_literal(digits, ty, line),
            Expression::Float(value) => Ok(Operand::new(runtime::float_literal(*value), ty)),
            Expression::Str(value) => {
                let temp = self.temp(Type::Str, line)?;
                self.writer
                    .push_line(format!("{temp} = rt_str_from_cstr({});", c_string(value)));
                Ok(Operand::new(temp, ty))
            }
            Expression::List(elements) => {
                let temp = self.temp(Type::List, line)?;
                for element in elements {
                    let value = self.expr(element, line)?;
                    let value = self.native(value, line)?;
                    self.writer
                        .push_line(format!("rt_list_si_append(&{temp}, {value});"));
                }
                Ok(Operand::new(temp, ty))
            }
            Expression::Dict(entries) => {
                let temp = self.temp(Type::Dict, line)?;
                for (key, value) in entries {
                    let key = self.expr(key, line)?;
                    let value = self.expr(value, line)?;
                    let value = self.native(value, line)?;
                    self.writer.push_line(format!(
                        "rt_dict_ssi_set(&{temp}, {}, {value});",
                        key.code
                    ));
                }
                Ok(Operand::new(temp, ty))
            }
            Expression::Var(name) => Ok(Operand::new(self.local(name), ty)),
            Expression::Binary {
                op,
                left,
                right,
                line,
            } => self.binary(*op, left, right, ty, *line),
            Expression::Compare { op, left, right } => {
                let flag = self.compare(*op, left, right, line)?;
                self.from_flag(flag, &ty, line)
            }
            Expression::Unary {
                op: UnaryOperator::Neg,
                operand,
            } => self.negate(operand, ty, line),
            Expression::Unary {
                op: UnaryOperator::Not,
                operand,
            } => {
                let test = self.truth(operand, line)?;
                self.from_flag(format!("(!{test})"), &ty, line)
            }
            Expression::Logical { op, left, right } => self.logical_value(*op, left, right, ty, line),
            Expression::Subscript {
                object,
                index,
                line,
            } => {
                let container = self.type_of(&Expression::Var(object.clone()), *line)?;
                let object = self.local(object);
                let element = self.temp(Type::Int, *line)?;
                match container {
                    Type::List => {
                        let index = self.expr(index, *line)?;
                        let index = self.native(index, *line)?;
                        self.writer.push_line(format!(
                            "{element} = rt_list_si_get(&{object}, {index});"
                        ));
                    }
                    _ => {
                        let key = self.expr(index, *line)?;
                        self.writer.push_line(format!(
                            "{element} = rt_dict_ssi_get(&{object}, {});",
                            key.code
                        ));
                    }
                }
                self.coerce(Operand::new(element, Type::Int), &ty, *line)
            }
            Expression::Call { function, args } => {
                self.invoke(&runtime::function_name(function), None, args, line)
            }
            Expression::Attribute { object, attribute } => {
                let field = self.temp(Type::Int, line)?;
                let object = self.local(object);
                self.writer
                    .push_line(format!("{field} = {object}->{attribute};"));
                self.coerce(Operand::new(field, Type::Int), &ty, line)
            }
            Expression::MethodCall {
                object,
                method,
                args,
                line,
            } => self.method_call(object, method, args, *line),
            Expression::Constructor { class, args } => self.construct(class, args, line),
            Expression::Builtin {
                builtin,
                args,
                line,
            } => self.builtin(*builtin, args, ty, *line),
        }
    }

    fn int_literal(&mut self, digits: &str, ty: Type, line: usize) -> CodegenResult<Operand> {
        let native = digits.parse::<i64>().ok();
        match (ty, native) {
            (Type::Int, Some(value)) => Ok(Operand::new(int_literal(value), Type::Int)),
            (Type::BigInt, Some(value)) => {
                let temp = self.temp(Type::BigInt, line)?;
                self.writer
                    .push_line(format!("rt_int_set_si(&{temp}, {});", int_literal(value)));
                Ok(Operand::new(temp, Type::BigInt))
            }
            (Type::BigInt, None) => {
                let temp = self.temp(Type::BigInt, line)?;
                self.writer
                    .push_line(format!("rt_int_from_dec(&{temp}, {});", c_string(digits)));
                Ok(Operand::new(temp, Type::BigInt))
            }
            (ty, _) => Err(CodegenError::unsupported(
                format!("integer literal {digits} cannot be stored as {ty}"),
                line,
            )),
        }
    }

    /// Converts between the two integer representations. Narrowing raises
    /// `ValueError` at runtime when the value does not fit.
    pub(super) fn coerce(
        &mut self,
        operand: Operand,
        target: &Type,
        line: usize,
    ) -> CodegenResult<Operand> {
        if operand.ty == *target {
            return Ok(operand);
        }
        match (operand.ty.clone(), target) {
            (Type::Int, Type::BigInt) => {
                let temp = self.temp(Type::BigInt, line)?;
                self.writer
                    .push_line(format!("rt_int_set_si(&{temp}, {});", operand.code));
                Ok(Operand::new(temp, Type::BigInt))
            }
            (Type::BigInt, Type::Int) => {
                let code = self.native(operand, line)?;
                Ok(Operand::new(code, Type::Int))
            }
            (from, to) => Err(CodegenError::unsupported(
                format!("cannot convert {from} to {to}"),
                line,
            )),
        }
    }

    /// C expression of type `long long` for an integer operand.
    pub(super) fn native(&mut self, operand: Operand, line: usize) -> CodegenResult<String> {
        match operand.ty {
            Type::Int => Ok(operand.code),
            Type::BigInt => {
                let temp = self.temp(Type::Int, line)?;
                self.writer.push_line(format!(
                    "if (!rt_int_to_si_checked(&{}, &{temp})) {}",
                    operand.code,
                    self.raise(
                        ErrorKind::Value,
                        "integer too large for a native integer",
                        line
                    )
                ));
                Ok(temp)
            }
            other => Err(CodegenError::unsupported(
                format!("expected an integer, got {other}"),
                line,
            )),
        }
    }

    /// Wraps a C truth value, an `int`, as a value of the backend's
    /// integer type.
    fn from_flag(&mut self, flag: String, ty: &Type, line: usize) -> CodegenResult<Operand> {
        self.coerce(Operand::new(format!("((long long){flag})"), Type::Int), ty, line)
    }

    /// Copies a scalar operand into a fresh temporary so it can be read
    /// more than once.
    fn pin(&mut self, operand: Operand, line: usize) -> CodegenResult<String> {
        let temp = self.temp(operand.ty.clone(), line)?;
        self.writer.push_line(format!("{temp} = {};", operand.code));
        Ok(temp)
    }

    /// Overwrites the value held by `dest` with `source`.
    pub(super) fn store(&mut self, dest: &str, source: &Operand, line: usize) -> CodegenResult<()> {
        let code = &source.code;
        match source.ty {
            Type::Int | Type::Float => self.writer.push_line(format!("{dest} = {code};")),
            Type::BigInt => self.writer.push_line(format!("rt_int_copy(&{dest}, &{code});")),
            Type::Str => {
                self.writer.push_line(format!("rt_str_free(&{dest});"));
                self.writer
                    .push_line(format!("{dest} = rt_str_concat({code}, rt_str_null());"));
            }
            ref other => {
                return Err(CodegenError::unsupported(
                    format!("cannot copy a value of type {other}"),
                    line,
                ));
            }
        }
        Ok(())
    }

    /// C truth value of `expr`. Comparisons and boolean operators are
    /// lowered directly instead of through an integer value.
    pub(super) fn truth(&mut self, expr: &Expression, line: usize) -> CodegenResult<String> {
        match expr {
            Expression::Compare { op, left, right } => self.compare(*op, left, right, line),
            Expression::Unary {
                op: UnaryOperator::Not,
                operand,
            } => Ok(format!("(!{})", self.truth(operand, line)?)),
            Expression::Logical { op, left, right } => {
                let left = self.truth(left, line)?;
                let mark = self.writer.mark();
                let right = self.truth(right, line)?;
                let symbol = match op {
                    LogicalOperator::And => "&&",
                    LogicalOperator::Or => "||",
                };
                if self.writer.mark() == mark {
                    return Ok(format!("({left} {symbol} {right})"));
                }
                // The right operand emitted statements: run them only when
                // the left operand does not decide the result.
                let flag = self.temp(Type::Int, line)?;
                let guard = match op {
                    LogicalOperator::And => flag.clone(),
                    LogicalOperator::Or => format!("!{flag}"),
                };
                self.writer.insert(mark, format!("{flag} = {left};"));
                self.writer.wrap(
                    mark + 1,
                    &format!("if ({guard})"),
                    &[],
                    &[format!("{flag} = {right};")],
                );
                Ok(flag)
            }
            _ => {
                let value = self.expr(expr, line)?;
                Ok(truthy(&value.ty, &value.code))
            }
        }
    }

    fn compare(
        &mut self,
        op: CompareOperator,
        left: &Expression,
        right: &Expression,
        line: usize,
    ) -> CodegenResult<String> {
        let left = self.expr(left, line)?;
        let right = self.expr(right, line)?;
        let symbol = op.symbol();
        match (&left.ty, &right.ty) {
            (Type::Int, Type::Int) | (Type::Float, Type::Float) => {
                Ok(format!("({} {symbol} {})", left.code, right.code))
            }
            (Type::Str, Type::Str) => Ok(format!(
                "(rt_str_eq({}, {}) {symbol} 0)",
                left.code, right.code
            )),
            (l, r) if l.is_integer() && r.is_integer() => {
                let left = self.coerce(left, &Type::BigInt, line)?;
                let right = self.coerce(right, &Type::BigInt, line)?;
                Ok(format!(
                    "(rt_int_cmp(&{}, &{}) {symbol} 0)",
                    left.code, right.code
                ))
            }
            (l, r) => Err(CodegenError::unsupported(
                format!("cannot compare {l} and {r}"),
                line,
            )),
        }
    }

    fn binary(
        &mut self,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
        ty: Type,
        line: usize,
    ) -> CodegenResult<Operand> {
        let divisor_known_nonzero = match right {
            Expression::Int(_) => !right.is_literal_zero(),
            Expression::Float(value) => *value != 0.0,
            _ => false,
        };
        let divisor_not_minus_one = matches!(right, Expression::Int(digits) if digits != "-1");
        let left = self.expr(left, line)?;
        let right = self.expr(right, line)?;
        match ty {
            Type::Str => {
                let temp = self.temp(Type::Str, line)?;
                self.writer.push_line(format!(
                    "{temp} = rt_str_concat({}, {});",
                    left.code, right.code
                ));
                Ok(Operand::new(temp, Type::Str))
            }
            Type::Int => {
                let divisor = Divisor {
                    nonzero: divisor_known_nonzero,
                    not_minus_one: divisor_not_minus_one,
                };
                self.native_arithmetic(op, left, right, divisor, line)
            }
            Type::Float => self.float_arithmetic(op, left, right, divisor_known_nonzero, line),
            Type::BigInt => {
                let left = self.coerce(left, &Type::BigInt, line)?;
                let right = self.coerce(right, &Type::BigInt, line)?;
                let function = match op {
                    BinaryOperator::Add => "rt_int_add",
                    BinaryOperator::Sub => "rt_int_sub",
                    BinaryOperator::Mul => "rt_int_mul",
                    BinaryOperator::FloorDiv => "rt_int_floordiv",
                    BinaryOperator::Mod => "rt_int_mod",
                };
                if matches!(op, BinaryOperator::FloorDiv | BinaryOperator::Mod)
                    && !divisor_known_nonzero
                {
                    self.writer.push_line(format!(
                        "if (!rt_int_truthy(&{})) {}",
                        right.code,
                        self.raise(
                            ErrorKind::ZeroDivision,
                            "integer division or modulo by zero",
                            line
                        )
                    ));
                }
                let temp = self.temp(Type::BigInt, line)?;
                self.writer.push_line(format!(
                    "{function}(&{temp}, &{}, &{});",
                    left.code, right.code
                ));
                Ok(Operand::new(temp, Type::BigInt))
            }
            other => Err(CodegenError::unsupported(
                format!("arithmetic producing {other}"),
                line,
            )),
        }
    }

    /// `long long` arithmetic with floor semantics for `//` and `%`.
    /// `LLONG_MIN // -1` raises `ValueError` and `x % -1` is always 0, so
    /// the C division never traps.
    fn native_arithmetic(
        &mut self,
        op: BinaryOperator,
        left: Operand,
        right: Operand,
        divisor: Divisor,
        line: usize,
    ) -> CodegenResult<Operand> {
        if let BinaryOperator::Add | BinaryOperator::Sub | BinaryOperator::Mul = op {
            return Ok(Operand::new(
                format!("({} {} {})", left.code, op.symbol(), right.code),
                Type::Int,
            ));
        }
        let a = self.pin(left, line)?;
        let b = self.pin(right, line)?;
        if !divisor.nonzero {
            self.writer.push_line(format!(
                "if ({b} == 0) {}",
                self.raise(
                    ErrorKind::ZeroDivision,
                    "integer division or modulo by zero",
                    line
                )
            ));
        }
        let result = self.temp(Type::Int, line)?;
        if op == BinaryOperator::FloorDiv {
            if !divisor.not_minus_one {
                self.writer.push_line(format!(
                    "if ({b} == -1 && {a} == LLONG_MIN) {}",
                    self.raise(
                        ErrorKind::Value,
                        "integer too large for a native integer",
                        line
                    )
                ));
            }
            self.writer.push_line(format!("{result} = {a} / {b};"));
            self.writer.push_line(format!(
                "if ({a} % {b} != 0 && (({a} < 0) != ({b} < 0))) {result} -= 1;"
            ));
        } else {
            let remainder = if divisor.not_minus_one {
                format!("{a} % {b}")
            } else {
                format!("{b} == -1 ? 0 : {a} % {b}")
            };
            self.writer.push_line(format!("{result} = {remainder};"));
            self.writer.push_line(format!(
                "if ({result} != 0 && (({result} < 0) != ({b} < 0))) {result} += {b};"
            ));
        }
        Ok(Operand::new(result, Type::Int))
    }

    fn float_arithmetic(
        &mut self,
        op: BinaryOperator,
        left: Operand,
        right: Operand,
        divisor_known_nonzero: bool,
        line: usize,
    ) -> CodegenResult<Operand> {
        if let BinaryOperator::Add | BinaryOperator::Sub | BinaryOperator::Mul = op {
            return Ok(Operand::new(
                format!("({} {} {})", left.code, op.symbol(), right.code),
                Type::Float,
            ));
        }
        let a = self.pin(left, line)?;
        let b = self.pin(right, line)?;
        if !divisor_known_nonzero {
            let message = if op == BinaryOperator::FloorDiv {
                "float floor division by zero"
            } else {
                "float modulo"
            };
            self.writer.push_line(format!(
                "if ({b} == 0.0) {}",
                self.raise(ErrorKind::ZeroDivision, message, line)
            ));
        }
        let result = self.temp(Type::Float, line)?;
        if op == BinaryOperator::FloorDiv {
            self.writer.push_line(format!("{result} = floor({a} / {b});"));
        } else {
            self.writer.push_line(format!("{result} = fmod({a}, {b});"));
            self.writer.push_line(format!(
                "if ({result} != 0.0 && (({result} < 0.0) != ({b} < 0.0))) {result} += {b};"
            ));
        }
        Ok(Operand::new(result, Type::Float))
    }

    fn negate(&mut self, operand: &Expression, ty: Type, line: usize) -> CodegenResult<Operand> {
        let value = self.expr(operand, line)?;
        match ty {
            Type::Int | Type::Float => Ok(Operand::new(format!("(-{})", value.code), ty)),
            _ => {
                let value = self.coerce(value, &Type::BigInt, line)?;
                let zero = self.temp(Type::BigInt, line)?;
                let result = self.temp(Type::BigInt, line)?;
                self.writer.push_line(format!(
                    "rt_int_sub(&{result}, &{zero}, &{});",
                    value.code
                ));
                Ok(Operand::new(result, Type::BigInt))
            }
        }
    }

    /// `and`/`or` as values: the result is whichever operand decided it.
    fn logical_value(
        &mut self,
        op: LogicalOperator,
        left: &Expression,
        right: &Expression,
        ty: Type,
        line: usize,
    ) -> CodegenResult<Operand> {
        let result = self.temp(ty.clone(), line)?;
        let left = self.expr(left, line)?;
        let left = self.coerce(left, &ty, line)?;
        self.store(&result, &left, line)?;
        let test = truthy(&ty, &result);
        let guard = match op {
            LogicalOperator::And => test,
            LogicalOperator::Or => format!("!{test}"),
        };
        self.writer.open(format!("if ({guard})"));
        let right = self.expr(right, line)?;
        let right = self.coerce(right, &ty, line)?;
        self.store(&result, &right, line)?;
        self.writer.close();
        Ok(Operand::new(result, ty))
    }

    /// Calls a user function or method. `receiver` is the object pointer
    /// passed ahead of the arguments of a method.
    fn invoke(
        &mut self,
        callee: &str,
        receiver: Option<String>,
        args: &[Expression],
        line: usize,
    ) -> CodegenResult<Operand> {
        let int_type = self.int_type();
        let mut codes: Vec<String> = receiver.into_iter().collect();
        for arg in args {
            let value = self.expr(arg, line)?;
            let value = self.coerce(value, &int_type, line)?;
            codes.push(match value.ty {
                Type::BigInt => format!("&{}", value.code),
                _ => value.code,
            });
        }
        let result = self.temp(int_type.clone(), line)?;
        if int_type == Type::BigInt {
            codes.insert(0, format!("&{result}"));
            self.writer
                .push_line(format!("{callee}({});", codes.join(", ")));
        } else {
            self.writer
                .push_line(format!("{result} = {callee}({});", codes.join(", ")));
        }
        Ok(Operand::new(result, int_type))
    }

    pub(super) fn method_call(
        &mut self,
        object: &str,
        method: &str,
        args: &[Expression],
        line: usize,
    ) -> CodegenResult<Operand> {
        match self.type_of(&Expression::Var(object.to_string()), line)? {
            Type::Object(class) => {
                let receiver = self.local(object);
                self.invoke(&runtime::method_name(&class, method), Some(receiver), args, line)
            }
            other => Err(CodegenError::unsupported(
                format!("method '{method}' called on {other}"),
                line,
            )),
        }
    }

    fn construct(
        &mut self,
        class: &str,
        args: &[Expression],
        line: usize,
    ) -> CodegenResult<Operand> {
        let has_init = self
            .checker
            .module()
            .class(class)
            .is_some_and(|def| def.method("__init__").is_some());
        let ty = Type::Object(class.to_string());
        if !has_init {
            let instance = self.temp(ty.clone(), line)?;
            self.writer
                .push_line(format!("{instance} = {}();", runtime::class_new(class)));
            return Ok(Operand::new(instance, ty));
        }
        // Arguments are evaluated before the instance exists.
        let int_type = self.int_type();
        let mut codes = Vec::with_capacity(args.len() + 2);
        for arg in args {
            let value = self.expr(arg, line)?;
            let value = self.coerce(value, &int_type, line)?;
            codes.push(match value.ty {
                Type::BigInt => format!("&{}", value.code),
                _ => value.code,
            });
        }
        let instance = self.temp(ty.clone(), line)?;
        self.writer
            .push_line(format!("{instance} = {}();", runtime::class_new(class)));
        codes.insert(0, instance.clone());
        let init = runtime::method_name(class, "__init__");
        if int_type == Type::BigInt {
            let discarded = self.temp(Type::BigInt, line)?;
            codes.insert(0, format!("&{discarded}"));
            self.writer.push_line(format!("{init}({});", codes.join(", ")));
        } else {
            self.writer
                .push_line(format!("(void){init}({});", codes.join(", ")));
        }
        Ok(Operand::new(instance, ty))
    }

    fn builtin(
        &mut self,
        builtin: Builtin,
        args: &[Expression],
        ty: Type,
        line: usize,
    ) -> CodegenResult<Operand> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.expr(arg, line)?);
        }
        match builtin {
            Builtin::Len => {
                let [value] = values.as_slice() else {
                    return Err(arity_error(builtin, line));
                };
                let length = match value.ty {
                    Type::Str => format!("((long long)rt_str_len(&{}))", value.code),
                    Type::List => format!("((long long)rt_list_si_len(&{}))", value.code),
                    Type::Dict => format!("((long long)rt_dict_ssi_len(&{}))", value.code),
                    ref other => {
                        return Err(CodegenError::unsupported(
                            format!("len() of {other}"),
                            line,
                        ));
                    }
                };
                self.coerce(Operand::new(length, Type::Int), &ty, line)
            }
            Builtin::Abs => {
                let Some(value) = values.pop() else {
                    return Err(arity_error(builtin, line));
                };
                match value.ty {
                    Type::Int => Ok(Operand::new(
                        format!("rt_math_abs_si({})", value.code),
                        Type::Int,
                    )),
                    Type::Float => Ok(Operand::new(format!("fabs({})", value.code), Type::Float)),
                    _ => {
                        let value = self.coerce(value, &Type::BigInt, line)?;
                        let result = self.temp(Type::BigInt, line)?;
                        self.writer
                            .push_line(format!("rt_math_abs(&{result}, &{});", value.code));
                        Ok(Operand::new(result, Type::BigInt))
                    }
                }
            }
            Builtin::Min | Builtin::Max => {
                if let [Operand { ty: Type::List, .. }] = values.as_slice() {
                    let list = values.remove(0);
                    return self.list_extreme(builtin, &list.code, ty, line);
                }
                self.extreme(builtin, values, ty, line)
            }
            Builtin::Pow => self.power(values, ty, line),
            Builtin::Str => {
                let Some(value) = values.pop() else {
                    return Err(arity_error(builtin, line));
                };
                let conversion = match value.ty {
                    Type::Int => format!("rt_str_from_si({})", value.code),
                    Type::BigInt => format!("rt_str_from_int(&{})", value.code),
                    Type::Float => format!("rt_str_from_double({})", value.code),
                    Type::Str => format!("rt_str_concat({}, rt_str_null())", value.code),
                    ref other => {
                        return Err(CodegenError::unsupported(format!("str() of {other}"), line));
                    }
                };
                let result = self.temp(Type::Str, line)?;
                self.writer.push_line(format!("{result} = {conversion};"));
                Ok(Operand::new(result, Type::Str))
            }
            Builtin::Int => {
                let Some(value) = values.pop() else {
                    return Err(arity_error(builtin, line));
                };
                match value.ty {
                    Type::Int | Type::BigInt => self.coerce(value, &ty, line),
                    Type::Float => {
                        let truncated = Operand::new(format!("((long long)({}))", value.code), Type::Int);
                        self.coerce(truncated, &ty, line)
                    }
                    Type::Str => {
                        let result = self.temp(Type::BigInt, line)?;
                        self.writer.push_line(format!(
                            "rt_int_from_dec_or_raise(&{result}, {0}.data != NULL ? {0}.data : \"\");",
                            value.code
                        ));
                        self.coerce(Operand::new(result, Type::BigInt), &ty, line)
                    }
                    ref other => Err(CodegenError::unsupported(format!("int() of {other}"), line)),
                }
            }
        }
    }

    /// `min(xs)` / `max(xs)` over a list of native integers.
    fn list_extreme(
        &mut self,
        builtin: Builtin,
        list: &str,
        ty: Type,
        line: usize,
    ) -> CodegenResult<Operand> {
        let result = self.temp(Type::Int, line)?;
        let index = self.temp(Type::Int, line)?;
        let combine = if builtin == Builtin::Min {
            "rt_math_min_si"
        } else {
            "rt_math_max_si"
        };
        self.writer.push_line(format!(
            "if (rt_list_si_len(&{list}) == 0) {}",
            self.raise(
                ErrorKind::Value,
                &format!("{builtin}() arg is an empty sequence"),
                line
            )
        ));
        self.writer
            .push_line(format!("{result} = rt_list_si_get(&{list}, 0);"));
        self.writer.open(format!(
            "for ({index} = 1; {index} < (long long)rt_list_si_len(&{list}); ++{index})"
        ));
        self.writer.push_line(format!(
            "{result} = {combine}({result}, rt_list_si_get(&{list}, {index}));"
        ));
        self.writer.close();
        self.coerce(Operand::new(result, Type::Int), &ty, line)
    }

    /// `min(a, b, ...)` / `max(a, b, ...)`; the first extreme argument wins.
    fn extreme(
        &mut self,
        builtin: Builtin,
        values: Vec<Operand>,
        ty: Type,
        line: usize,
    ) -> CodegenResult<Operand> {
        let result = self.temp(ty.clone(), line)?;
        let mut values = values.into_iter();
        let Some(first) = values.next() else {
            return Err(arity_error(builtin, line));
        };
        let first = self.coerce(first, &ty, line)?;
        self.store(&result, &first, line)?;
        let ordering = if builtin == Builtin::Min { "<" } else { ">" };
        for value in values {
            let value = self.coerce(value, &ty, line)?;
            match ty {
                Type::Int => {
                    let combine = if builtin == Builtin::Min {
                        "rt_math_min_si"
                    } else {
                        "rt_math_max_si"
                    };
                    self.writer
                        .push_line(format!("{result} = {combine}({result}, {});", value.code));
                }
                Type::Float => self.writer.push_line(format!(
                    "if ({0} {ordering} {result}) {result} = {0};",
                    value.code
                )),
                _ => self.writer.push_line(format!(
                    "if (rt_int_cmp(&{0}, &{result}) {ordering} 0) rt_int_copy(&{result}, &{0});",
                    value.code
                )),
            }
        }
        Ok(Operand::new(result, ty))
    }

    fn power(&mut self, values: Vec<Operand>, ty: Type, line: usize) -> CodegenResult<Operand> {
        if ty == Type::Float {
            let [base, exponent] = values.as_slice() else {
                return Err(arity_error(Builtin::Pow, line));
            };
            let result = self.temp(Type::Float, line)?;
            self.writer.push_line(format!(
                "{result} = pow({}, {});",
                base.code, exponent.code
            ));
            return Ok(Operand::new(result, Type::Float));
        }

        let mut operands = Vec::with_capacity(values.len());
        for value in values {
            operands.push(self.coerce(value, &Type::BigInt, line)?.code);
        }
        let zero = self.temp(Type::BigInt, line)?;
        let result = self.temp(Type::BigInt, line)?;
        match operands.as_slice() {
            [base, exponent] => {
                self.writer.push_line(format!(
                    "if (rt_int_cmp(&{exponent}, &{zero}) < 0) {}",
                    self.raise(
                        ErrorKind::Value,
                        "negative exponents are not supported",
                        line
                    )
                ));
                self.writer
                    .push_line(format!("rt_int_pow(&{result}, &{base}, &{exponent});"));
            }
            [base, exponent, modulus] => {
                self.writer.push_line(format!(
                    "if (rt_int_cmp(&{exponent}, &{zero}) < 0) {}",
                    self.raise(
                        ErrorKind::Value,
                        "pow() 2nd argument cannot be negative when 3rd argument specified",
                        line
                    )
                ));
                self.writer.push_line(format!(
                    "if (!rt_int_truthy(&{modulus})) {}",
                    self.raise(ErrorKind::Value, "pow() 3rd argument cannot be 0", line)
                ));
                self.writer.push_line(format!(
                    "rt_int_powmod(&{result}, &{base}, &{exponent}, &{modulus});"
                ));
            }
            _ => return Err(arity_error(Builtin::Pow, line)),
        }
        Ok(Operand::new(result, Type::BigInt))
    }
}

/// What is statically known about the right operand of `//` or `%`.
#[derive(Debug, Clone, Copy)]
struct Divisor {
    nonzero: bool,
    /// An integer literal other than `-1`.
    not_minus_one: bool,
}

fn arity_error(builtin: Builtin, line: usize) -> CodegenError {
    CodegenError::unsupported(format!("{builtin}() expects {}", builtin.arity()), line)
}
