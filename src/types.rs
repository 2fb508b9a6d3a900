//! Flow-sensitive type inference over the IR.
//!
//! The checker computes, for each scope, the storage type of every local,
//! and answers per-expression type queries against that environment. The
//! code generator uses both: the environment to declare locals and the
//! expression types to pick a lowering.

use std::fmt;

use rustc_hash::FxHashSet;

pub use self::env::TypeEnv;
pub use self::error::{TypeError, TypeResult};
use crate::backend::Backend;
use crate::builtins::Builtin;
use crate::ir::{
    BinaryOperator, ClassDef, CompareOperator, Expression, FunctionDef, Module, Statement,
    UnaryOperator,
};

mod env;
mod error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// Native 64-bit integer.
    Int,
    /// Arbitrary-precision integer.
    BigInt,
    Float,
    Str,
    /// List of native integers.
    List,
    /// Dict from strings to native integers.
    Dict,
    Object(String),
}

impl Type {
    pub fn is_integer(&self) -> bool {
        matches!(self, Type::Int | Type::BigInt)
    }

    /// Values of these types have exactly one owning variable.
    pub fn is_handle(&self) -> bool {
        matches!(self, Type::List | Type::Dict | Type::Object(_))
    }

    fn join_integers(&self, other: &Type) -> Type {
        if *self == Type::BigInt || *other == Type::BigInt {
            Type::BigInt
        } else {
            Type::Int
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => f.write_str("int"),
            Type::BigInt => f.write_str("bigint"),
            Type::Float => f.write_str("float"),
            Type::Str => f.write_str("str"),
            Type::List => f.write_str("list[int]"),
            Type::Dict => f.write_str("dict[str, int]"),
            Type::Object(class) => write!(f, "{class}"),
        }
    }
}

pub struct Checker<'m> {
    module: &'m Module,
    backend: Backend,
}

impl<'m> Checker<'m> {
    pub fn new(module: &'m Module, backend: Backend) -> Self {
        Self { module, backend }
    }

    pub fn module(&self) -> &'m Module {
        self.module
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    fn int_type(&self) -> Type {
        self.backend.int_type()
    }

    /// Infers every scope in the module, surfacing the first type error.
    pub fn check_module(&self) -> TypeResult<()> {
        for function in &self.module.functions {
            self.function_env(function)?;
        }
        for class in &self.module.classes {
            for method in &class.methods {
                self.method_env(class, method)?;
            }
        }
        self.main_env()?;
        Ok(())
    }

    pub fn function_env(&self, function: &FunctionDef) -> TypeResult<TypeEnv> {
        let params: Vec<_> = function
            .params
            .iter()
            .map(|param| (param.as_str(), self.int_type()))
            .collect();
        self.infer_scope(&params, &function.body, function.line)
    }

    pub fn method_env(&self, class: &ClassDef, method: &FunctionDef) -> TypeResult<TypeEnv> {
        let params: Vec<_> = method
            .params
            .iter()
            .enumerate()
            .map(|(index, param)| {
                let ty = if index == 0 {
                    Type::Object(class.name.clone())
                } else {
                    self.int_type()
                };
                (param.as_str(), ty)
            })
            .collect();
        self.infer_scope(&params, &method.body, method.line)
    }

    pub fn main_env(&self) -> TypeResult<TypeEnv> {
        self.infer_scope(&[], &self.module.main, 1)
    }

    /// Runs inference until the set of widened names stops growing, so every
    /// use of a widened name sees its final storage type.
    fn infer_scope(
        &self,
        params: &[(&str, Type)],
        body: &[Statement],
        line: usize,
    ) -> TypeResult<TypeEnv> {
        let mut widened = FxHashSet::default();
        loop {
            let mut env = TypeEnv::with_widened(widened.clone());
            for (name, ty) in params {
                env.assign(name, ty.clone(), line)?;
            }
            self.infer_block(&mut env, body)?;
            if env.widened().len() == widened.len() {
                return Ok(env);
            }
            widened = env.widened().clone();
        }
    }

    fn infer_block(&self, env: &mut TypeEnv, body: &[Statement]) -> TypeResult<()> {
        for statement in body {
            self.infer_statement(env, statement)?;
        }
        Ok(())
    }

    fn infer_branch(&self, env: &TypeEnv, body: &[Statement]) -> TypeResult<TypeEnv> {
        let mut branch = env.clone();
        self.infer_block(&mut branch, body)?;
        Ok(branch)
    }

    fn infer_statement(&self, env: &mut TypeEnv, statement: &Statement) -> TypeResult<()> {
        match statement {
            Statement::Assign { name, value, line } => {
                let ty = self.expr_type(env, value, *line)?;
                if let Expression::Var(source) = value
                    && ty.is_handle()
                {
                    return Err(TypeError::new(
                        format!("cannot alias {ty} variable '{source}' as '{name}'"),
                        *line,
                    ));
                }
                env.assign(name, ty, *line)
            }
            Statement::AttrAssign {
                object,
                attribute,
                value,
                line,
            } => {
                let class = self.object_class(env, object, *line)?;
                self.require_field(class, attribute, *line)?;
                self.require_integer(env, value, *line, &format!("field '{attribute}'"))?;
                Ok(())
            }
            Statement::SubscriptAssign {
                object,
                index,
                value,
                line,
            } => {
                match self.variable_type(env, object, *line)? {
                    Type::List => {
                        self.require_integer(env, index, *line, "list index")?;
                    }
                    Type::Dict => {
                        self.require_type(env, index, *line, &Type::Str, "dict key")?;
                    }
                    other => {
                        return Err(TypeError::new(
                            format!("'{object}' of type {other} does not support item assignment"),
                            *line,
                        ));
                    }
                }
                self.require_integer(env, value, *line, "stored value")?;
                Ok(())
            }
            Statement::MethodCall {
                object,
                method,
                args,
                line,
            } => {
                self.method_call_type(env, object, method, args, *line, true)?;
                Ok(())
            }
            Statement::Expr { value, line } => {
                self.expr_type(env, value, *line)?;
                Ok(())
            }
            Statement::Print { value, line } => {
                let ty = self.expr_type(env, value, *line)?;
                if let Type::Object(class) = ty {
                    return Err(TypeError::new(
                        format!("cannot print an instance of class '{class}'"),
                        *line,
                    ));
                }
                Ok(())
            }
            Statement::If {
                condition,
                then_body,
                else_body,
                line,
            } => {
                self.check_condition(env, condition, *line)?;
                let then_env = self.infer_branch(env, then_body)?;
                let else_env = self.infer_branch(env, else_body)?;
                env.merge(then_env, *line)?;
                env.merge(else_env, *line)
            }
            Statement::While {
                condition,
                body,
                line,
            } => {
                self.check_condition(env, condition, *line)?;
                let body_env = self.infer_branch(env, body)?;
                env.merge(body_env, *line)
            }
            Statement::ForRange {
                var,
                start,
                stop,
                step,
                body,
                line,
            } => {
                self.require_integer(env, start, *line, "range() start")?;
                self.require_integer(env, stop, *line, "range() stop")?;
                self.require_integer(env, step, *line, "range() step")?;
                let mut body_env = env.clone();
                body_env.assign(var, self.int_type(), *line)?;
                self.infer_block(&mut body_env, body)?;
                env.merge(body_env, *line)
            }
            Statement::Try {
                body,
                handlers,
                line,
            } => {
                let mut branches = vec![self.infer_branch(env, body)?];
                for handler in handlers {
                    branches.push(self.infer_branch(env, &handler.body)?);
                }
                for branch in branches {
                    env.merge(branch, *line)?;
                }
                Ok(())
            }
            Statement::Return { value, line } => {
                if let Some(value) = value {
                    self.require_integer(env, value, *line, "return value")?;
                }
                Ok(())
            }
            Statement::Raise { .. }
            | Statement::Break { .. }
            | Statement::Continue { .. }
            | Statement::Pass => Ok(()),
        }
    }

    /// Conditions accept any operand type; `and`/`or`/`not` only test
    /// truthiness there, so their operands may differ in type.
    pub fn check_condition(
        &self,
        env: &TypeEnv,
        condition: &Expression,
        line: usize,
    ) -> TypeResult<()> {
        match condition {
            Expression::Logical { left, right, .. } => {
                self.check_condition(env, left, line)?;
                self.check_condition(env, right, line)
            }
            Expression::Unary {
                op: UnaryOperator::Not,
                operand,
            } => self.check_condition(env, operand, line),
            _ => self.expr_type(env, condition, line).map(|_| ()),
        }
    }

    pub fn expr_type(&self, env: &TypeEnv, expr: &Expression, line: usize) -> TypeResult<Type> {
        match expr {
            Expression::Int(digits) => Ok(self.backend.literal_type(digits)),
            Expression::Float(_) => Ok(Type::Float),
            Expression::Str(_) => Ok(Type::Str),
            Expression::List(elements) => {
                for element in elements {
                    self.require_integer(env, element, line, "list element")?;
                }
                Ok(Type::List)
            }
            Expression::Dict(entries) => {
                for (key, value) in entries {
                    self.require_type(env, key, line, &Type::Str, "dict key")?;
                    self.require_integer(env, value, line, "dict value")?;
                }
                Ok(Type::Dict)
            }
            Expression::Var(name) => self.variable_type(env, name, line),
            Expression::Binary {
                op,
                left,
                right,
                line,
            } => {
                let left = self.expr_type(env, left, *line)?;
                let right = self.expr_type(env, right, *line)?;
                self.binary_type(*op, &left, &right, *line)
            }
            Expression::Compare { op, left, right } => {
                let left = self.expr_type(env, left, line)?;
                let right = self.expr_type(env, right, line)?;
                self.compare_type(*op, &left, &right, line)
            }
            Expression::Unary {
                op: UnaryOperator::Neg,
                operand,
            } => match self.expr_type(env, operand, line)? {
                ty @ (Type::Int | Type::BigInt | Type::Float) => Ok(ty),
                other => Err(TypeError::new(
                    format!("bad operand type for unary -: '{other}'"),
                    line,
                )),
            },
            Expression::Unary {
                op: UnaryOperator::Not,
                operand,
            } => {
                self.check_condition(env, operand, line)?;
                Ok(self.int_type())
            }
            Expression::Logical { op, left, right } => {
                let left = self.expr_type(env, left, line)?;
                let right = self.expr_type(env, right, line)?;
                if left.is_integer() && right.is_integer() {
                    return Ok(left.join_integers(&right));
                }
                if left == right && matches!(left, Type::Float | Type::Str) {
                    return Ok(left);
                }
                let keyword = match op {
                    crate::ir::LogicalOperator::And => "and",
                    crate::ir::LogicalOperator::Or => "or",
                };
                Err(TypeError::new(
                    format!("operands of '{keyword}' must share an int, float or str type, got {left} and {right}"),
                    line,
                ))
            }
            Expression::Subscript {
                object,
                index,
                line,
            } => match self.variable_type(env, object, *line)? {
                Type::List => {
                    self.require_integer(env, index, *line, "list index")?;
                    Ok(self.int_type())
                }
                Type::Dict => {
                    self.require_type(env, index, *line, &Type::Str, "dict key")?;
                    Ok(self.int_type())
                }
                other => Err(TypeError::new(
                    format!("'{object}' of type {other} is not subscriptable"),
                    *line,
                )),
            },
            Expression::Call { function, args } => {
                let definition = self.module.function(function).ok_or_else(|| {
                    TypeError::new(format!("unknown function '{function}'"), line)
                })?;
                if definition.params.len() != args.len() {
                    return Err(TypeError::new(
                        format!(
                            "Function '{function}' expected {} arguments, got {}",
                            definition.params.len(),
                            args.len()
                        ),
                        line,
                    ));
                }
                for (position, arg) in args.iter().enumerate() {
                    self.require_integer(
                        env,
                        arg,
                        line,
                        &format!("argument {} of '{function}'", position + 1),
                    )?;
                }
                Ok(self.int_type())
            }
            Expression::Attribute { object, attribute } => {
                let class = self.object_class(env, object, line)?;
                self.require_field(class, attribute, line)?;
                Ok(self.int_type())
            }
            Expression::MethodCall {
                object,
                method,
                args,
                line,
            } => self.method_call_type(env, object, method, args, *line, false),
            Expression::Constructor { class, args } => {
                let definition = self.class_def(class, line)?;
                let expected = definition
                    .method("__init__")
                    .map(|init| init.params.len() - 1)
                    .unwrap_or(0);
                if expected != args.len() {
                    return Err(TypeError::new(
                        format!(
                            "Constructor '{class}' expected {expected} arguments, got {}",
                            args.len()
                        ),
                        line,
                    ));
                }
                for (position, arg) in args.iter().enumerate() {
                    self.require_integer(
                        env,
                        arg,
                        line,
                        &format!("argument {} of '{class}'", position + 1),
                    )?;
                }
                Ok(Type::Object(class.clone()))
            }
            Expression::Builtin {
                builtin,
                args,
                line,
            } => self.builtin_type(env, *builtin, args, *line),
        }
    }

    fn binary_type(
        &self,
        op: BinaryOperator,
        left: &Type,
        right: &Type,
        line: usize,
    ) -> TypeResult<Type> {
        match (op, left, right) {
            (BinaryOperator::Add, Type::Str, Type::Str) => Ok(Type::Str),
            (_, left, right) if left.is_integer() && right.is_integer() => {
                Ok(left.join_integers(right))
            }
            (_, Type::Float, Type::Float) => Ok(Type::Float),
            _ => Err(TypeError::new(
                format!(
                    "unsupported operand types for {}: '{left}' and '{right}'",
                    op.symbol()
                ),
                line,
            )),
        }
    }

    fn compare_type(
        &self,
        op: CompareOperator,
        left: &Type,
        right: &Type,
        line: usize,
    ) -> TypeResult<Type> {
        let comparable = match (left, right) {
            (left, right) if left.is_integer() && right.is_integer() => true,
            (Type::Float, Type::Float) => true,
            (Type::Str, Type::Str) => {
                if !op.is_equality() {
                    return Err(TypeError::new(
                        format!("'{}' not supported between 'str' and 'str'", op.symbol()),
                        line,
                    ));
                }
                true
            }
            _ => false,
        };
        if !comparable {
            return Err(TypeError::new(
                format!("cannot compare '{left}' and '{right}'"),
                line,
            ));
        }
        Ok(self.int_type())
    }

    fn builtin_type(
        &self,
        env: &TypeEnv,
        builtin: Builtin,
        args: &[Expression],
        line: usize,
    ) -> TypeResult<Type> {
        let types = args
            .iter()
            .map(|arg| self.expr_type(env, arg, line))
            .collect::<TypeResult<Vec<_>>>()?;
        let unsupported = |detail: String| TypeError::new(format!("{builtin}(): {detail}"), line);

        match (builtin, types.as_slice()) {
            (Builtin::Len, [Type::Str | Type::List | Type::Dict]) => Ok(self.int_type()),
            (Builtin::Len, [other]) => Err(unsupported(format!(
                "object of type '{other}' has no len()"
            ))),
            (Builtin::Abs, [ty @ (Type::Int | Type::BigInt | Type::Float)]) => Ok(ty.clone()),
            (Builtin::Min | Builtin::Max, [Type::List]) => Ok(self.int_type()),
            (Builtin::Min | Builtin::Max, [other]) => Err(unsupported(format!(
                "a single argument must be a list, got {other}"
            ))),
            (Builtin::Min | Builtin::Max, many) if many.iter().all(Type::is_integer) => Ok(many
                .iter()
                .fold(Type::Int, |acc, ty| acc.join_integers(ty))),
            (Builtin::Min | Builtin::Max, many) if many.iter().all(|ty| *ty == Type::Float) => {
                Ok(Type::Float)
            }
            (Builtin::Pow, [Type::Float, Type::Float]) => Ok(Type::Float),
            (Builtin::Pow, many) if many.iter().all(Type::is_integer) => Ok(Type::BigInt),
            (Builtin::Str, [Type::Int | Type::BigInt | Type::Float | Type::Str]) => Ok(Type::Str),
            (Builtin::Int, [ty @ (Type::Int | Type::BigInt)]) => Ok(ty.clone()),
            (Builtin::Int, [Type::Float]) => Ok(self.int_type()),
            (Builtin::Int, [Type::Str]) => Ok(Type::BigInt),
            (_, types) => {
                let listed = types
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(unsupported(format!("unsupported argument types ({listed})")))
            }
        }
    }

    fn method_call_type(
        &self,
        env: &TypeEnv,
        object: &str,
        method: &str,
        args: &[Expression],
        line: usize,
        as_statement: bool,
    ) -> TypeResult<Type> {
        match self.variable_type(env, object, line)? {
            Type::Object(class) => {
                let definition = self.class_def(&class, line)?;
                let target = definition.method(method).ok_or_else(|| {
                    TypeError::new(format!("class '{class}' has no method '{method}'"), line)
                })?;
                let expected = target.params.len() - 1;
                if expected != args.len() {
                    return Err(TypeError::new(
                        format!(
                            "Method '{class}.{method}' expected {expected} arguments, got {}",
                            args.len()
                        ),
                        line,
                    ));
                }
                for (position, arg) in args.iter().enumerate() {
                    self.require_integer(
                        env,
                        arg,
                        line,
                        &format!("argument {} of '{class}.{method}'", position + 1),
                    )?;
                }
                Ok(self.int_type())
            }
            Type::List if method == "append" => {
                if !as_statement {
                    return Err(TypeError::new("append() does not return a value", line));
                }
                let [value] = args else {
                    return Err(TypeError::new(
                        format!("append() takes exactly one argument ({} given)", args.len()),
                        line,
                    ));
                };
                self.require_integer(env, value, line, "appended value")?;
                Ok(self.int_type())
            }
            other => Err(TypeError::new(
                format!("'{object}' of type {other} has no method '{method}'"),
                line,
            )),
        }
    }

    fn variable_type(&self, env: &TypeEnv, name: &str, line: usize) -> TypeResult<Type> {
        env.get(name)
            .cloned()
            .ok_or_else(|| TypeError::new(format!("name '{name}' has no known type"), line))
    }

    fn object_class(&self, env: &TypeEnv, object: &str, line: usize) -> TypeResult<&'m ClassDef> {
        match self.variable_type(env, object, line)? {
            Type::Object(class) => self.class_def(&class, line),
            other => Err(TypeError::new(
                format!("'{object}' of type {other} has no attributes"),
                line,
            )),
        }
    }

    fn class_def(&self, class: &str, line: usize) -> TypeResult<&'m ClassDef> {
        self.module
            .class(class)
            .ok_or_else(|| TypeError::new(format!("unknown class '{class}'"), line))
    }

    fn require_field(&self, class: &ClassDef, field: &str, line: usize) -> TypeResult<()> {
        if class.has_field(field) {
            Ok(())
        } else {
            Err(TypeError::new(
                format!("class '{}' has no field '{field}'", class.name),
                line,
            ))
        }
    }

    fn require_integer(
        &self,
        env: &TypeEnv,
        expr: &Expression,
        line: usize,
        what: &str,
    ) -> TypeResult<Type> {
        let ty = self.expr_type(env, expr, line)?;
        if ty.is_integer() {
            Ok(ty)
        } else {
            Err(TypeError::new(format!("{what} must be int, got {ty}"), line))
        }
    }

    fn require_type(
        &self,
        env: &TypeEnv,
        expr: &Expression,
        line: usize,
        expected: &Type,
        what: &str,
    ) -> TypeResult<()> {
        let ty = self.expr_type(env, expr, line)?;
        if ty == *expected {
            Ok(())
        } else {
            Err(TypeError::new(
                format!("{what} must be {expected}, got {ty}"),
                line,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use indoc::indoc;

    fn main_env(source: &str, backend: Backend) -> TypeResult<TypeEnv> {
        let module = parse(source).unwrap_or_else(|err| panic!("parse failed: {err}"));
        Checker::new(&module, backend).main_env()
    }

    fn check(source: &str) -> TypeResult<()> {
        let module = parse(source).unwrap_or_else(|err| panic!("parse failed: {err}"));
        Checker::new(&module, Backend::Fast).check_module()
    }

    #[test]
    fn infers_literal_types_per_backend() {
        let source = "a = 1\nb = 99999999999999999999\ns = \"x\"\nf = 1.5\n";
        let fast = main_env(source, Backend::Fast).expect("fast");
        assert_eq!(fast.get("a"), Some(&Type::Int));
        assert_eq!(fast.get("b"), Some(&Type::BigInt));
        assert_eq!(fast.get("s"), Some(&Type::Str));
        assert_eq!(fast.get("f"), Some(&Type::Float));

        let precise = main_env(source, Backend::Precise).expect("precise");
        assert_eq!(precise.get("a"), Some(&Type::BigInt));
    }

    #[test]
    fn string_concatenation_requires_two_strings() {
        let env = main_env("a = \"x\"\nb = \"y\"\nc = a + b + a\n", Backend::Fast).expect("ok");
        assert_eq!(env.get("c"), Some(&Type::Str));

        let err = main_env("a = \"x\"\nb = a + 1\n", Backend::Fast).expect_err("mixed");
        assert_eq!(err.message, "unsupported operand types for +: 'str' and 'int'");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn rejects_reassignment_with_different_type() {
        let err = main_env("a = 1\na = \"s\"\n", Backend::Fast).expect_err("reassign");
        assert_eq!(err.message, "variable 'a' reassigned from int to str");
    }

    #[test]
    fn widens_earlier_uses_of_a_name_that_becomes_bigint() {
        let source = indoc! {"
            x = 1
            y = x + 1
            x = 100000000000000000000000
        "};
        let env = main_env(source, Backend::Fast).expect("ok");
        assert_eq!(env.get("x"), Some(&Type::BigInt));
        assert_eq!(env.get("y"), Some(&Type::BigInt));
    }

    #[test]
    fn rejects_branch_conflicts_but_carries_one_sided_names() {
        let conflict = indoc! {"
            c = 1
            if c:
                v = 1
            else:
                v = \"one\"
        "};
        let err = main_env(conflict, Backend::Fast).expect_err("conflict");
        assert!(err.message.contains("conflicting types int and str"));

        let one_sided = indoc! {"
            c = 1
            if c:
                only = \"x\"
            while c < 3:
                inner = 2.5
                c = c + 1
        "};
        let env = main_env(one_sided, Backend::Fast).expect("ok");
        assert_eq!(env.get("only"), Some(&Type::Str));
        assert_eq!(env.get("inner"), Some(&Type::Float));
    }

    #[test]
    fn comparisons_need_matching_types() {
        let err = main_env("a = \"x\"\nb = a < \"y\"\n", Backend::Fast).expect_err("str order");
        assert!(err.message.contains("'<' not supported"));
        let err = main_env("a = 1\nb = a == \"y\"\n", Backend::Fast).expect_err("mixed");
        assert_eq!(err.message, "cannot compare 'int' and 'str'");
    }

    #[test]
    fn conditions_accept_mixed_truthiness() {
        check("s = \"x\"\nn = 0\nif s and not n:\n    print(s)\n").expect("ok");
    }

    #[test]
    fn rejects_aliasing_of_containers() {
        let err = main_env("a = [1]\nb = a\n", Backend::Fast).expect_err("alias");
        assert_eq!(err.message, "cannot alias list[int] variable 'a' as 'b'");
    }

    #[test]
    fn types_builtins() {
        let source = indoc! {"
            xs = [3, 1]
            a = len(xs)
            b = max(xs)
            c = pow(2, 100)
            d = str(a)
            e = int(\"42\")
            f = abs(-1.5)
            g = min(1, 2, 3)
        "};
        let env = main_env(source, Backend::Fast).expect("ok");
        assert_eq!(env.get("a"), Some(&Type::Int));
        assert_eq!(env.get("b"), Some(&Type::Int));
        assert_eq!(env.get("c"), Some(&Type::BigInt));
        assert_eq!(env.get("d"), Some(&Type::Str));
        assert_eq!(env.get("e"), Some(&Type::BigInt));
        assert_eq!(env.get("f"), Some(&Type::Float));
        assert_eq!(env.get("g"), Some(&Type::Int));

        let err = main_env("n = 3\nm = len(n)\n", Backend::Fast).expect_err("len int");
        assert!(err.message.contains("has no len()"));
    }

    #[test]
    fn checks_object_fields_and_methods() {
        let source = indoc! {"
            class P:
                x = 0
                def get(self):
                    return self.x
            p = P()
            p.x = 3
            print(p.get())
            print(p.y)
        "};
        let err = check(source).expect_err("missing field");
        assert_eq!(err.message, "class 'P' has no field 'y'");
        assert_eq!(err.line, 8);
    }

    #[test]
    fn function_arguments_must_be_integers() {
        let source = "def f(a):\n    return a\nprint(f(\"s\"))\n";
        let err = check(source).expect_err("str argument");
        assert_eq!(err.message, "argument 1 of 'f' must be int, got str");
    }

    #[test]
    fn list_append_is_a_statement() {
        check("xs = []\nxs.append(4)\nprint(xs)\n").expect("append statement");
        let err = check("xs = []\nn = xs.append(4)\n").expect_err("append value");
        assert_eq!(err.message, "append() does not return a value");
    }

    #[test]
    fn method_params_use_backend_integer_type() {
        let source = indoc! {"
            class C:
                def m(self, a):
                    b = a
                    return b
        "};
        let module = parse(source).expect("parse");
        let class = &module.classes[0];
        let env = Checker::new(&module, Backend::Precise)
            .method_env(class, &class.methods[0])
            .expect("ok");
        assert_eq!(env.get("self"), Some(&Type::Object("C".to_string())));
        assert_eq!(env.get("a"), Some(&Type::BigInt));
    }
}
