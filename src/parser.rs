use rustc_hash::FxHashSet;

pub use self::error::{ParseError, ParseResult};
use self::scope::Scope;
use self::signatures::Signatures;
use crate::builtins::{Builtin, ErrorKind};
use crate::error::CompileError;
use crate::ir::{
    BinaryOperator, ClassDef, CompareOperator, ExceptClause, Expression, FieldDef, FunctionDef,
    LogicalOperator, Module, Statement, UnaryOperator,
};
use crate::lexer::{self, Span, Token, TokenKind};

mod error;
mod scope;
pub mod signatures;

/// Where the statements currently being parsed live.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Context {
    Module,
    Function,
    Method { class: String, is_init: bool },
}

/// Second parser pass: recursive descent over the token stream.
///
/// Tracks the names that are definitely assigned in the current scope and
/// how many loops enclose the current statement, so use-before-assignment
/// and stray `break`/`continue` are reported while building the IR.
pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    position: usize,
    signatures: Signatures,
    scope: Scope,
    loop_depth: usize,
    context: Context,
    self_fields: Vec<String>,
}

impl<'a> Parser<'a> {
    pub fn new(mut tokens: Vec<Token<'a>>) -> ParseResult<Self> {
        if tokens.last().is_none_or(|token| token.kind != TokenKind::EOF) {
            let span = tokens.last().map(|token| token.span).unwrap_or_default();
            tokens.push(Token::new(TokenKind::EOF, span));
        }
        let signatures = signatures::scan(&tokens)?;
        Ok(Self {
            tokens,
            position: 0,
            signatures,
            scope: Scope::default(),
            loop_depth: 0,
            context: Context::Module,
            self_fields: Vec::new(),
        })
    }

    pub fn parse_module(mut self) -> ParseResult<Module> {
        let mut module = Module::default();
        loop {
            self.consume_newlines();
            match self.kind() {
                TokenKind::EOF => break,
                TokenKind::Def => module.functions.push(self.parse_function_def()?),
                TokenKind::Class => module.classes.push(self.parse_class_def()?),
                _ => module.main.push(self.parse_statement()?),
            }
        }
        Ok(module)
    }

    fn parse_function_def(&mut self) -> ParseResult<FunctionDef> {
        let line = self.expect(&TokenKind::Def, "'def'")?.line;
        let (name, _) = self.expect_identifier("function name")?;
        let params = self.parse_params()?;
        let context = Context::Function;
        let body = self.parse_callable_body(&params, context)?;
        Ok(FunctionDef {
            name: name.to_string(),
            params,
            body,
            line,
        })
    }

    fn parse_method_def(&mut self, class: &str) -> ParseResult<FunctionDef> {
        let line = self.expect(&TokenKind::Def, "'def'")?.line;
        let (name, _) = self.expect_identifier("method name")?;
        let params = self.parse_params()?;
        let context = Context::Method {
            class: class.to_string(),
            is_init: name == "__init__",
        };
        let body = self.parse_callable_body(&params, context)?;
        Ok(FunctionDef {
            name: name.to_string(),
            params,
            body,
            line,
        })
    }

    fn parse_params(&mut self) -> ParseResult<Vec<String>> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        while self.kind() != &TokenKind::RParen {
            let (param, _) = self.expect_identifier("parameter name")?;
            params.push(param.to_string());
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(params)
    }

    /// Parses a function or method body in a fresh scope holding only the
    /// parameters.
    fn parse_callable_body(
        &mut self,
        params: &[String],
        context: Context,
    ) -> ParseResult<Vec<Statement>> {
        let scope = Scope::with_names(params.iter().map(String::as_str));
        let outer_scope = std::mem::replace(&mut self.scope, scope);
        let outer_depth = std::mem::replace(&mut self.loop_depth, 0);
        let outer_context = std::mem::replace(&mut self.context, context);

        let body = self.parse_block();

        self.scope = outer_scope;
        self.loop_depth = outer_depth;
        self.context = outer_context;
        body
    }

    fn parse_class_def(&mut self) -> ParseResult<ClassDef> {
        let line = self.expect(&TokenKind::Class, "'class'")?.line;
        let (name, _) = self.expect_identifier("class name")?;
        if self.eat(&TokenKind::LParen) {
            self.expect(&TokenKind::RParen, "')'")?;
        }
        self.expect(&TokenKind::Colon, "':'")?;
        self.expect(&TokenKind::Newline, "newline")?;
        self.expect(&TokenKind::Indent, "indented class body")?;

        let mut methods = Vec::new();
        let mut fields: Vec<FieldDef> = Vec::new();
        self.self_fields.clear();

        loop {
            self.consume_newlines();
            match self.kind().clone() {
                TokenKind::Dedent | TokenKind::EOF => break,
                TokenKind::Def => methods.push(self.parse_method_def(name)?),
                TokenKind::Pass => {
                    self.advance();
                    self.expect_statement_end()?;
                }
                TokenKind::Identifier(field) if self.peek_kind(1) == &TokenKind::Equal => {
                    let span = self.span();
                    self.advance();
                    self.advance();
                    let default = match self.parse_unary()? {
                        Expression::Int(digits) => digits,
                        _ => {
                            return Err(ParseError::new(
                                format!("class field '{field}' must be initialized with an integer literal"),
                                span,
                            ));
                        }
                    };
                    if fields.iter().any(|existing| existing.name == field) {
                        return Err(ParseError::new(
                            format!("duplicate field '{field}' in class '{name}'"),
                            span,
                        ));
                    }
                    fields.push(FieldDef {
                        name: field.to_string(),
                        default,
                    });
                    self.expect_statement_end()?;
                }
                other => {
                    return Err(self.error_here(format!(
                        "unsupported statement in class body: {other}"
                    )));
                }
            }
        }
        self.expect(&TokenKind::Dedent, "end of class body")?;

        for field in std::mem::take(&mut self.self_fields) {
            if !fields.iter().any(|existing| existing.name == field) {
                fields.push(FieldDef {
                    name: field,
                    default: "0".to_string(),
                });
            }
        }

        Ok(ClassDef {
            name: name.to_string(),
            methods,
            fields,
            line,
        })
    }

    /// Parses `: NEWLINE INDENT stmt+ DEDENT`, or a single simple statement
    /// on the same line as the colon.
    fn parse_block(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect(&TokenKind::Colon, "':'")?;
        if !self.eat(&TokenKind::Newline) {
            return Ok(vec![self.parse_simple_statement()?]);
        }
        self.expect(&TokenKind::Indent, "indented block")?;
        let mut body = Vec::new();
        loop {
            self.consume_newlines();
            if matches!(self.kind(), TokenKind::Dedent | TokenKind::EOF) {
                break;
            }
            body.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::Dedent, "end of block")?;
        Ok(body)
    }

    /// Parses a block against a copy of the current scope and returns the
    /// names it defined alongside the statements.
    fn parse_branch(&mut self) -> ParseResult<(Vec<Statement>, Scope)> {
        let outer = self.scope.clone();
        let body = self.parse_block();
        let branch = std::mem::replace(&mut self.scope, outer);
        Ok((body?, branch))
    }

    fn parse_loop_body(&mut self) -> ParseResult<(Vec<Statement>, Scope)> {
        self.loop_depth += 1;
        let result = self.parse_branch();
        self.loop_depth -= 1;
        result
    }

    fn parse_statement(&mut self) -> ParseResult<Statement> {
        match self.kind() {
            TokenKind::If => self.parse_if(),
            TokenKind::While => self.parse_while(),
            TokenKind::For => self.parse_for(),
            TokenKind::Try => self.parse_try(),
            TokenKind::Def => Err(self.error_here("nested function definitions are not supported")),
            TokenKind::Class => Err(self.error_here("nested class definitions are not supported")),
            _ => self.parse_simple_statement(),
        }
    }

    fn parse_simple_statement(&mut self) -> ParseResult<Statement> {
        let span = self.span();
        let line = span.line;
        let statement = match self.kind().clone() {
            TokenKind::Pass => {
                self.advance();
                Statement::Pass
            }
            TokenKind::Break | TokenKind::Continue => {
                let is_break = self.kind() == &TokenKind::Break;
                let keyword = if is_break { "break" } else { "continue" };
                if self.loop_depth == 0 {
                    return Err(ParseError::new(
                        format!("'{keyword}' outside loop at line {line}"),
                        span,
                    ));
                }
                self.advance();
                if is_break {
                    Statement::Break { line }
                } else {
                    Statement::Continue { line }
                }
            }
            TokenKind::Return => self.parse_return()?,
            TokenKind::Raise => self.parse_raise()?,
            TokenKind::Identifier("print") if self.peek_kind(1) == &TokenKind::LParen => {
                self.parse_print()?
            }
            TokenKind::Identifier(name) => match self.peek_kind(1).clone() {
                TokenKind::Equal => {
                    self.advance();
                    self.advance();
                    self.parse_assignment(name, line)?
                }
                kind if kind.is_augmented_assign() => {
                    self.advance();
                    self.parse_augmented_assignment(name, span)?
                }
                TokenKind::Dot => self.parse_dotted_statement(name, span)?,
                TokenKind::LBracket => self.parse_subscript_statement(name, span)?,
                _ => self.parse_expression_statement(line)?,
            },
            TokenKind::If | TokenKind::While | TokenKind::For | TokenKind::Try => {
                return Err(self.error_here("compound statement must start on its own line"));
            }
            _ => self.parse_expression_statement(line)?,
        };
        self.expect_statement_end()?;
        Ok(statement)
    }

    fn parse_assignment(&mut self, name: &str, line: usize) -> ParseResult<Statement> {
        if matches!(self.context, Context::Method { .. }) && name == "self" {
            return Err(self.error_here("cannot assign to 'self'"));
        }
        let value = self.parse_expression()?;
        self.scope.define(name);
        Ok(Statement::Assign {
            name: name.to_string(),
            value,
            line,
        })
    }

    fn parse_augmented_assignment(&mut self, name: &str, span: Span) -> ParseResult<Statement> {
        self.require_defined(name, span)?;
        let op_span = self.span();
        let op = match self.kind() {
            TokenKind::PlusEqual => BinaryOperator::Add,
            TokenKind::MinusEqual => BinaryOperator::Sub,
            TokenKind::StarEqual => BinaryOperator::Mul,
            TokenKind::DoubleSlashEqual => BinaryOperator::FloorDiv,
            _ => BinaryOperator::Mod,
        };
        self.advance();
        let right = self.parse_expression()?;
        self.check_divisor(op, &right, op_span)?;
        Ok(Statement::Assign {
            name: name.to_string(),
            value: Expression::Binary {
                op,
                left: Box::new(Expression::Var(name.to_string())),
                right: Box::new(right),
                line: span.line,
            },
            line: span.line,
        })
    }

    /// `obj.attr = value` or `obj.method(args)` as a statement.
    fn parse_dotted_statement(&mut self, object: &str, span: Span) -> ParseResult<Statement> {
        self.require_defined(object, span)?;
        self.advance();
        self.expect(&TokenKind::Dot, "'.'")?;
        let (member, _) = self.expect_identifier("attribute name")?;
        let line = span.line;

        match self.kind() {
            TokenKind::Equal => {
                self.advance();
                let value = self.parse_expression()?;
                if matches!(self.context, Context::Method { .. })
                    && object == "self"
                    && !self.self_fields.iter().any(|field| field == member)
                {
                    self.self_fields.push(member.to_string());
                }
                Ok(Statement::AttrAssign {
                    object: object.to_string(),
                    attribute: member.to_string(),
                    value,
                    line,
                })
            }
            TokenKind::LParen => {
                let args = self.parse_call_args()?;
                self.check_self_method(object, member, args.len(), span)?;
                self.reject_chained_access()?;
                Ok(Statement::MethodCall {
                    object: object.to_string(),
                    method: member.to_string(),
                    args,
                    line,
                })
            }
            TokenKind::Dot => Err(self.error_here("chained attribute access is not supported")),
            _ => Err(self.error_here(
                "only calls, assignments and attribute assignments may be used as statements",
            )),
        }
    }

    fn parse_subscript_statement(&mut self, object: &str, span: Span) -> ParseResult<Statement> {
        self.require_defined(object, span)?;
        self.advance();
        self.expect(&TokenKind::LBracket, "'['")?;
        let index = self.parse_expression()?;
        self.expect(&TokenKind::RBracket, "']'")?;
        if self.kind() == &TokenKind::LBracket {
            return Err(self.error_here("chained subscripts are not supported"));
        }
        self.expect(&TokenKind::Equal, "'=' after subscript")?;
        let value = self.parse_expression()?;
        Ok(Statement::SubscriptAssign {
            object: object.to_string(),
            index,
            value,
            line: span.line,
        })
    }

    fn parse_expression_statement(&mut self, line: usize) -> ParseResult<Statement> {
        let span = self.span();
        let value = self.parse_expression()?;
        match value {
            Expression::MethodCall {
                object,
                method,
                args,
                line,
            } => Ok(Statement::MethodCall {
                object,
                method,
                args,
                line,
            }),
            Expression::Call { .. } | Expression::Constructor { .. } | Expression::Builtin { .. } => {
                Ok(Statement::Expr { value, line })
            }
            _ => Err(ParseError::new(
                "only calls may be used as expression statements",
                span,
            )),
        }
    }

    fn parse_print(&mut self) -> ParseResult<Statement> {
        let span = self.span();
        self.advance();
        let args = self.parse_call_args()?;
        let mut args = args.into_iter();
        match (args.next(), args.next()) {
            (Some(value), None) => Ok(Statement::Print {
                value,
                line: span.line,
            }),
            _ => Err(ParseError::new("print() takes exactly one argument", span)),
        }
    }

    fn parse_return(&mut self) -> ParseResult<Statement> {
        let span = self.expect(&TokenKind::Return, "'return'")?;
        if self.context == Context::Module {
            return Err(ParseError::new("'return' outside function", span));
        }
        let value = if matches!(self.kind(), TokenKind::Newline | TokenKind::EOF) {
            None
        } else {
            if let Context::Method { is_init: true, .. } = self.context {
                return Err(ParseError::new("__init__ must not return a value", span));
            }
            Some(self.parse_expression()?)
        };
        Ok(Statement::Return {
            value,
            line: span.line,
        })
    }

    fn parse_raise(&mut self) -> ParseResult<Statement> {
        let span = self.expect(&TokenKind::Raise, "'raise'")?;
        if matches!(self.kind(), TokenKind::Newline | TokenKind::EOF) {
            return Err(ParseError::new("bare 'raise' is not supported", span));
        }
        let kind = self.parse_error_kind()?;
        let mut message = None;
        if self.eat(&TokenKind::LParen) {
            if let TokenKind::String(text) = self.kind().clone() {
                message = Some(text.into_owned());
                self.advance();
            } else if self.kind() != &TokenKind::RParen {
                return Err(self.error_here("raise message must be a string literal"));
            }
            self.expect(&TokenKind::RParen, "')'")?;
        }
        Ok(Statement::Raise {
            kind,
            message,
            line: span.line,
        })
    }

    fn parse_error_kind(&mut self) -> ParseResult<ErrorKind> {
        let (name, span) = self.expect_identifier("exception type")?;
        ErrorKind::from_name(name)
            .ok_or_else(|| ParseError::new(format!("unknown exception type '{name}'"), span))
    }

    /// Parses `if`/`elif` chains; each `elif` becomes a nested `If` in the
    /// enclosing else branch.
    fn parse_if(&mut self) -> ParseResult<Statement> {
        let line = self.span().line;
        self.advance();
        let condition = self.parse_expression()?;
        let (then_body, then_scope) = self.parse_branch()?;

        self.consume_newlines();
        let (else_body, else_scope) = match self.kind() {
            TokenKind::Elif => {
                let outer = self.scope.clone();
                let nested = self.parse_if();
                let branch = std::mem::replace(&mut self.scope, outer);
                (vec![nested?], branch)
            }
            TokenKind::Else => {
                self.advance();
                self.parse_branch()?
            }
            _ => (Vec::new(), Scope::default()),
        };

        self.scope.absorb(then_scope);
        self.scope.absorb(else_scope);
        Ok(Statement::If {
            condition,
            then_body,
            else_body,
            line,
        })
    }

    fn parse_while(&mut self) -> ParseResult<Statement> {
        let line = self.expect(&TokenKind::While, "'while'")?.line;
        let condition = self.parse_expression()?;
        let (body, body_scope) = self.parse_loop_body()?;
        self.scope.absorb(body_scope);
        Ok(Statement::While {
            condition,
            body,
            line,
        })
    }

    fn parse_for(&mut self) -> ParseResult<Statement> {
        let line = self.expect(&TokenKind::For, "'for'")?.line;
        let (var, _) = self.expect_identifier("loop variable")?;
        self.expect(&TokenKind::In, "'in'")?;
        let range_span = self.span();
        match self.kind() {
            TokenKind::Identifier("range") => self.advance(),
            _ => {
                return Err(ParseError::new(
                    "only 'for ... in range(...)' loops are supported",
                    range_span,
                ));
            }
        }
        let mut args = self.parse_call_args()?;
        let (start, stop, step) = match args.len() {
            1 => (Expression::int(0), args.remove(0), Expression::int(1)),
            2 => {
                let stop = args.remove(1);
                (args.remove(0), stop, Expression::int(1))
            }
            3 => {
                let step = args.remove(2);
                let stop = args.remove(1);
                (args.remove(0), stop, step)
            }
            count => {
                return Err(ParseError::new(
                    format!("range() expects 1 to 3 arguments, got {count}"),
                    range_span,
                ));
            }
        };
        if step.is_literal_zero() {
            return Err(ParseError::new("range() arg 3 must not be zero", range_span));
        }

        let outer = self.scope.clone();
        self.scope.define(var);
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        let body_scope = std::mem::replace(&mut self.scope, outer);
        let body = body?;
        self.scope.absorb(body_scope);

        Ok(Statement::ForRange {
            var: var.to_string(),
            start,
            stop,
            step,
            body,
            line,
        })
    }

    fn parse_try(&mut self) -> ParseResult<Statement> {
        let line = self.expect(&TokenKind::Try, "'try'")?.line;
        let (body, body_scope) = self.parse_branch()?;
        let mut branches = vec![body_scope];
        let mut handlers = Vec::new();
        let mut seen = FxHashSet::default();

        loop {
            self.consume_newlines();
            if self.kind() != &TokenKind::Except {
                break;
            }
            let span = self.span();
            if handlers.last().is_some_and(|clause: &ExceptClause| clause.kind.is_none()) {
                return Err(ParseError::new("default 'except:' must be last", span));
            }
            self.advance();
            let kind = if self.kind() == &TokenKind::Colon {
                None
            } else {
                Some(self.parse_error_kind()?)
            };
            if !seen.insert(kind) {
                return Err(ParseError::new("duplicate except clause", span));
            }
            let (handler_body, handler_scope) = self.parse_branch()?;
            branches.push(handler_scope);
            handlers.push(ExceptClause {
                kind,
                body: handler_body,
            });
        }

        if handlers.is_empty() {
            return Err(self.error_here("expected 'except' after 'try' block"));
        }
        for branch in branches {
            self.scope.absorb(branch);
        }
        Ok(Statement::Try {
            body,
            handlers,
            line,
        })
    }

    pub fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.parse_and()?;
            expr = Expression::Logical {
                op: LogicalOperator::Or,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_not()?;
        while self.eat(&TokenKind::And) {
            let right = self.parse_not()?;
            expr = Expression::Logical {
                op: LogicalOperator::And,
                left: Box::new(expr),
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> ParseResult<Expression> {
        if self.eat(&TokenKind::Not) {
            let operand = self.parse_not()?;
            return Ok(Expression::Unary {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn comparison_operator(&self) -> Option<CompareOperator> {
        match self.kind() {
            TokenKind::EqualEqual => Some(CompareOperator::Eq),
            TokenKind::NotEqual => Some(CompareOperator::NotEq),
            TokenKind::Less => Some(CompareOperator::Less),
            TokenKind::LessEqual => Some(CompareOperator::LessEq),
            TokenKind::Greater => Some(CompareOperator::Greater),
            TokenKind::GreaterEqual => Some(CompareOperator::GreaterEq),
            _ => None,
        }
    }

    fn parse_comparison(&mut self) -> ParseResult<Expression> {
        let left = self.parse_additive()?;
        let Some(op) = self.comparison_operator() else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_additive()?;
        if self.comparison_operator().is_some() {
            return Err(self.error_here("chained comparisons are not supported"));
        }
        Ok(Expression::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Sub,
                _ => break,
            };
            let line = self.span().line;
            self.advance();
            let right = self.parse_multiplicative()?;
            expr = Expression::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                line,
            };
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinaryOperator::Mul,
                TokenKind::DoubleSlash => BinaryOperator::FloorDiv,
                TokenKind::Percent => BinaryOperator::Mod,
                TokenKind::Slash => {
                    return Err(self.error_here("true division '/' is not supported; use '//'"));
                }
                _ => break,
            };
            let span = self.span();
            self.advance();
            let right = self.parse_unary()?;
            self.check_divisor(op, &right, span)?;
            expr = Expression::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(right),
                line: span.line,
            };
        }
        Ok(expr)
    }

    fn check_divisor(&self, op: BinaryOperator, divisor: &Expression, span: Span) -> ParseResult<()> {
        if matches!(op, BinaryOperator::FloorDiv | BinaryOperator::Mod) && divisor.is_literal_zero() {
            return Err(ParseError::new("integer division or modulo by zero", span));
        }
        Ok(())
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        if self.kind() != &TokenKind::Minus {
            return self.parse_primary();
        }
        self.advance();
        match self.kind().clone() {
            TokenKind::Integer(digits) => {
                self.advance();
                let digits = normalize_digits(digits);
                Ok(if digits == "0" {
                    Expression::Int(digits)
                } else {
                    Expression::Int(format!("-{digits}"))
                })
            }
            TokenKind::Float(text) => {
                self.advance();
                Ok(Expression::Float(-self.float_value(text)?))
            }
            _ => {
                let operand = self.parse_unary()?;
                Ok(Expression::Unary {
                    op: UnaryOperator::Neg,
                    operand: Box::new(operand),
                })
            }
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        let span = self.span();
        match self.kind().clone() {
            TokenKind::Integer(digits) => {
                self.advance();
                Ok(Expression::Int(normalize_digits(digits)))
            }
            TokenKind::Float(text) => {
                self.advance();
                Ok(Expression::Float(self.float_value(text)?))
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(Expression::Str(value.into_owned()))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expression::int(1))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expression::int(0))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while self.kind() != &TokenKind::RBracket {
                    elements.push(self.parse_expression()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket, "']'")?;
                Ok(Expression::List(elements))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                while self.kind() != &TokenKind::RBrace {
                    let key = self.parse_expression()?;
                    self.expect(&TokenKind::Colon, "':'")?;
                    let value = self.parse_expression()?;
                    entries.push((key, value));
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace, "'}'")?;
                Ok(Expression::Dict(entries))
            }
            TokenKind::Identifier(name) => {
                self.advance();
                self.parse_name_expression(name, span)
            }
            other => Err(ParseError::new(
                format!("Expected expression, got {other}"),
                span,
            )),
        }
    }

    /// Resolves what follows a bare name: a call, attribute or method access,
    /// a subscript, or a plain variable reference.
    fn parse_name_expression(&mut self, name: &str, span: Span) -> ParseResult<Expression> {
        match self.kind() {
            TokenKind::LParen => self.parse_call(name, span),
            TokenKind::Dot => {
                self.require_defined(name, span)?;
                self.advance();
                let (member, _) = self.expect_identifier("attribute name")?;
                let expr = if self.kind() == &TokenKind::LParen {
                    let args = self.parse_call_args()?;
                    self.check_self_method(name, member, args.len(), span)?;
                    Expression::MethodCall {
                        object: name.to_string(),
                        method: member.to_string(),
                        args,
                        line: span.line,
                    }
                } else {
                    Expression::Attribute {
                        object: name.to_string(),
                        attribute: member.to_string(),
                    }
                };
                self.reject_chained_access()?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.require_defined(name, span)?;
                self.advance();
                let index = self.parse_expression()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                if matches!(self.kind(), TokenKind::LBracket | TokenKind::Dot) {
                    return Err(self.error_here("chained subscripts are not supported"));
                }
                Ok(Expression::Subscript {
                    object: name.to_string(),
                    index: Box::new(index),
                    line: span.line,
                })
            }
            _ => {
                self.require_defined(name, span)?;
                Ok(Expression::Var(name.to_string()))
            }
        }
    }

    /// Resolves a call by name: builtin, then class constructor, then user
    /// function.
    fn parse_call(&mut self, name: &str, span: Span) -> ParseResult<Expression> {
        let args = self.parse_call_args()?;
        let found = args.len();

        if name == "print" {
            return Err(ParseError::new("print() cannot be used as a value", span));
        }
        if name == "range" {
            return Err(ParseError::new(
                "range() is only supported in for loops",
                span,
            ));
        }
        if let Some(builtin) = Builtin::from_name(name) {
            if !builtin.accepts(found) {
                return Err(ParseError::new(
                    format!("{builtin}() expects {}, got {found}", builtin.arity()),
                    span,
                ));
            }
            return Ok(Expression::Builtin {
                builtin,
                args,
                line: span.line,
            });
        }
        if let Some(class) = self.signatures.classes.get(name) {
            let expected = class.constructor_arity();
            if expected != found {
                return Err(ParseError::new(
                    format!("Constructor '{name}' expected {expected} arguments, got {found}"),
                    span,
                ));
            }
            return Ok(Expression::Constructor {
                class: name.to_string(),
                args,
            });
        }
        if let Some(&expected) = self.signatures.functions.get(name) {
            if expected != found {
                return Err(ParseError::new(
                    format!("Function '{name}' expected {expected} arguments, got {found}"),
                    span,
                ));
            }
            return Ok(Expression::Call {
                function: name.to_string(),
                args,
            });
        }
        Err(ParseError::new(
            format!("unknown function or class '{name}'"),
            span,
        ))
    }

    fn parse_call_args(&mut self) -> ParseResult<Vec<Expression>> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        while self.kind() != &TokenKind::RParen {
            args.push(self.parse_expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(args)
    }

    /// Calls on `self` can be checked against the enclosing class right away.
    fn check_self_method(
        &self,
        object: &str,
        method: &str,
        found: usize,
        span: Span,
    ) -> ParseResult<()> {
        let Context::Method { class, .. } = &self.context else {
            return Ok(());
        };
        if object != "self" {
            return Ok(());
        }
        let expected = self
            .signatures
            .classes
            .get(class)
            .and_then(|signature| signature.methods.get(method))
            .ok_or_else(|| {
                ParseError::new(format!("class '{class}' has no method '{method}'"), span)
            })?;
        if *expected != found {
            return Err(ParseError::new(
                format!("Method '{class}.{method}' expected {expected} arguments, got {found}"),
                span,
            ));
        }
        Ok(())
    }

    fn reject_chained_access(&self) -> ParseResult<()> {
        if matches!(self.kind(), TokenKind::Dot | TokenKind::LBracket | TokenKind::LParen) {
            return Err(self.error_here("chained attribute access is not supported"));
        }
        Ok(())
    }

    fn require_defined(&self, name: &str, span: Span) -> ParseResult<()> {
        if self.scope.is_defined(name) {
            Ok(())
        } else {
            Err(ParseError::new(format!("name '{name}' is not defined"), span))
        }
    }

    fn float_value(&self, text: &str) -> ParseResult<f64> {
        text.parse::<f64>()
            .map_err(|_| self.error_here(format!("Invalid float literal '{text}'")))
    }

    fn expect_statement_end(&mut self) -> ParseResult<()> {
        match self.kind() {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::EOF | TokenKind::Dedent => Ok(()),
            other => Err(self.error_here(format!("Expected end of statement, got {other}"))),
        }
    }

    fn consume_newlines(&mut self) {
        while self.kind() == &TokenKind::Newline {
            self.advance();
        }
    }

    fn kind(&self) -> &TokenKind<'a> {
        self.peek_kind(0)
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind<'a> {
        let index = (self.position + offset).min(self.tokens.len() - 1);
        &self.tokens[index].kind
    }

    fn span(&self) -> Span {
        let index = self.position.min(self.tokens.len() - 1);
        self.tokens[index].span
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
    }

    fn eat(&mut self, kind: &TokenKind<'_>) -> bool {
        if self.kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind<'_>, expected: &str) -> ParseResult<Span> {
        let span = self.span();
        if self.eat(kind) {
            Ok(span)
        } else {
            Err(self.error_here(format!("Expected {expected}, got {}", self.kind())))
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> ParseResult<(&'a str, Span)> {
        let span = self.span();
        if let TokenKind::Identifier(name) = *self.kind() {
            self.advance();
            Ok((name, span))
        } else {
            Err(self.error_here(format!("Expected {expected}, got {}", self.kind())))
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.span())
    }
}

fn normalize_digits(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn parse_tokens(tokens: Vec<Token<'_>>) -> ParseResult<Module> {
    Parser::new(tokens)?.parse_module()
}

pub fn parse(source: &str) -> Result<Module, CompileError> {
    let tokens = lexer::tokenize(source)?;
    Ok(parse_tokens(tokens)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn parse_ok(source: &str) -> Module {
        parse(source).unwrap_or_else(|err| panic!("parse failed: {err}"))
    }

    fn parse_err(source: &str) -> ParseError {
        match parse(source) {
            Err(CompileError::Parse(err)) => err,
            Err(other) => panic!("expected parse error, got {other}"),
            Ok(module) => panic!("expected parse error, got {module:?}"),
        }
    }

    #[test]
    fn parses_assignments_and_print() {
        let module = parse_ok("x = 1\ny = 2\nprint(x + y)\n");
        assert_eq!(module.main.len(), 3);
        assert_eq!(
            module.main[2],
            Statement::Print {
                value: Expression::Binary {
                    op: BinaryOperator::Add,
                    left: Box::new(Expression::Var("x".to_string())),
                    right: Box::new(Expression::Var("y".to_string())),
                    line: 3,
                },
                line: 3,
            }
        );
    }

    #[test]
    fn resolves_forward_function_references() {
        let source = indoc! {"
            def first(a):
                return second(a, 1)
            def second(a, b):
                return a + b
            print(first(2))
        "};
        let module = parse_ok(source);
        assert_eq!(module.functions.len(), 2);
        assert_eq!(module.functions[0].params, vec!["a".to_string()]);
    }

    #[test]
    fn folds_negative_literals() {
        let module = parse_ok("print(-7 // 2)\n");
        let Statement::Print { value, .. } = &module.main[0] else {
            panic!("expected print");
        };
        let Expression::Binary { left, .. } = value else {
            panic!("expected binary");
        };
        assert_eq!(**left, Expression::Int("-7".to_string()));
    }

    #[test]
    fn desugars_elif_and_augmented_assignment() {
        let source = indoc! {"
            x = 3
            if x < 1:
                x += 1
            elif x < 5:
                x -= 1
            else:
                pass
        "};
        let module = parse_ok(source);
        let Statement::If {
            then_body,
            else_body,
            ..
        } = &module.main[1]
        else {
            panic!("expected if");
        };
        assert!(matches!(
            &then_body[0],
            Statement::Assign {
                value: Expression::Binary {
                    op: BinaryOperator::Add,
                    ..
                },
                ..
            }
        ));
        assert!(matches!(&else_body[0], Statement::If { .. }));
    }

    #[test]
    fn rejects_use_before_assignment() {
        let err = parse_err("print(x)\n");
        assert_eq!(err.message, "name 'x' is not defined");
        assert_eq!(err.line, 1);
    }

    #[test]
    fn rejects_self_reference_in_first_assignment() {
        let err = parse_err("x = x + 1\n");
        assert_eq!(err.message, "name 'x' is not defined");
    }

    #[test]
    fn names_from_any_branch_are_defined_afterwards() {
        let source = indoc! {"
            c = 1
            if c:
                a = 1
            else:
                b = 2
            while c < 3:
                w = c
                c = c + 1
            for i in range(3):
                f = i
            print(a + b + w + f + i)
        "};
        parse_ok(source);
    }

    #[test]
    fn branch_names_are_not_visible_in_sibling_branch() {
        let source = indoc! {"
            c = 1
            if c:
                a = 1
            else:
                print(a)
        "};
        let err = parse_err(source);
        assert_eq!(err.message, "name 'a' is not defined");
        assert_eq!(err.line, 5);
    }

    #[test]
    fn rejects_break_outside_loop_at_any_depth() {
        let source = indoc! {"
            x = 1
            if x:
                if x:
                    break
        "};
        let err = parse_err(source);
        assert_eq!(err.message, "'break' outside loop at line 4");
        assert_eq!(err.line, 4);
    }

    #[test]
    fn rejects_continue_in_function_called_from_loop() {
        let source = indoc! {"
            def f():
                continue
            while True:
                f()
        "};
        let err = parse_err(source);
        assert!(err.message.contains("'continue' outside loop"));
    }

    #[test]
    fn accepts_break_inside_nested_if_in_loop() {
        let source = indoc! {"
            i = 0
            while i < 10:
                if i == 3:
                    break
                i = i + 1
        "};
        parse_ok(source);
    }

    #[test]
    fn parses_range_arities() {
        let source = indoc! {"
            for i in range(3):
                pass
            for j in range(1, 3):
                pass
            for k in range(10, 0, -2):
                pass
        "};
        let module = parse_ok(source);
        let Statement::ForRange {
            start, stop, step, ..
        } = &module.main[0]
        else {
            panic!("expected for");
        };
        assert_eq!(start, &Expression::int(0));
        assert_eq!(stop, &Expression::int(3));
        assert_eq!(step, &Expression::int(1));
        let Statement::ForRange { step, .. } = &module.main[2] else {
            panic!("expected for");
        };
        assert_eq!(step, &Expression::Int("-2".to_string()));
    }

    #[test]
    fn rejects_literal_zero_step() {
        let err = parse_err("for i in range(0, 5, 0):\n    pass\n");
        assert!(err.message.contains("must not be zero"));
    }

    #[test]
    fn rejects_range_with_too_many_arguments() {
        let err = parse_err("for i in range(1, 2, 3, 4):\n    pass\n");
        assert_eq!(err.message, "range() expects 1 to 3 arguments, got 4");
    }

    #[test]
    fn rejects_literal_zero_divisor() {
        assert!(parse_err("x = 5\nprint(x // 0)\n").message.contains("by zero"));
        assert!(parse_err("x = 5\nx %= 0\n").message.contains("by zero"));
    }

    #[test]
    fn rejects_true_division() {
        assert!(parse_err("print(4 / 2)\n").message.contains("use '//'"));
    }

    #[test]
    fn resolves_calls_in_order() {
        let source = indoc! {"
            class Point:
                def __init__(self, x):
                    self.x = x
            def make():
                return 1
            p = Point(3)
            n = len([1, 2])
            m = make()
        "};
        let module = parse_ok(source);
        assert!(matches!(
            &module.main[0],
            Statement::Assign { value: Expression::Constructor { .. }, .. }
        ));
        assert!(matches!(
            &module.main[1],
            Statement::Assign {
                value: Expression::Builtin {
                    builtin: Builtin::Len,
                    ..
                },
                ..
            }
        ));
        assert!(matches!(
            &module.main[2],
            Statement::Assign { value: Expression::Call { .. }, .. }
        ));
    }

    #[test]
    fn rejects_unknown_call_and_bad_arity() {
        assert_eq!(
            parse_err("x = nope(1)\n").message,
            "unknown function or class 'nope'"
        );
        let source = "def f(a):\n    return a\nprint(f(1, 2))\n";
        assert_eq!(
            parse_err(source).message,
            "Function 'f' expected 1 arguments, got 2"
        );
        assert!(parse_err("print(pow(2))\n").message.contains("2 or 3 arguments"));
    }

    #[test]
    fn collects_class_fields() {
        let source = indoc! {"
            class Counter:
                step = 2
                def __init__(self):
                    self.count = 0
                def bump(self):
                    self.count = self.count + self.step
                    return self.count
            c = Counter()
            c.bump()
            print(c.count)
        "};
        let module = parse_ok(source);
        let class = &module.classes[0];
        let fields: Vec<_> = class
            .fields
            .iter()
            .map(|field| (field.name.as_str(), field.default.as_str()))
            .collect();
        assert_eq!(fields, vec![("step", "2"), ("count", "0")]);
        assert!(matches!(&module.main[1], Statement::MethodCall { .. }));
    }

    #[test]
    fn checks_method_calls_on_self() {
        let source = indoc! {"
            class A:
                def f(self):
                    return self.g(1)
        "};
        assert_eq!(parse_err(source).message, "class 'A' has no method 'g'");
    }

    #[test]
    fn rejects_chained_attribute_access() {
        let source = indoc! {"
            class A:
                v = 1
            a = A()
            print(a.v.w)
        "};
        assert!(parse_err(source).message.contains("chained attribute access"));
    }

    #[test]
    fn rejects_attribute_on_undefined_receiver() {
        assert_eq!(parse_err("print(q.v)\n").message, "name 'q' is not defined");
    }

    #[test]
    fn rejects_return_at_module_level() {
        assert_eq!(parse_err("return 1\n").message, "'return' outside function");
    }

    #[test]
    fn rejects_nested_functions() {
        let source = "def f():\n    def g():\n        pass\n";
        assert!(parse_err(source).message.contains("nested function"));
    }

    #[test]
    fn parses_try_except_and_raise() {
        let source = indoc! {"
            try:
                raise ValueError(\"bad\")
            except ZeroDivisionError:
                pass
            except:
                pass
        "};
        let module = parse_ok(source);
        let Statement::Try { body, handlers, .. } = &module.main[0] else {
            panic!("expected try");
        };
        assert_eq!(
            body[0],
            Statement::Raise {
                kind: ErrorKind::Value,
                message: Some("bad".to_string()),
                line: 2,
            }
        );
        assert_eq!(handlers[0].kind, Some(ErrorKind::ZeroDivision));
        assert_eq!(handlers[1].kind, None);
    }

    #[test]
    fn rejects_bare_except_before_typed_one() {
        let source = indoc! {"
            try:
                pass
            except:
                pass
            except KeyError:
                pass
        "};
        assert!(parse_err(source).message.contains("must be last"));
    }

    #[test]
    fn rejects_non_call_expression_statement() {
        let err = parse_err("x = 1\nx + 1\n");
        assert_eq!(err.message, "only calls may be used as expression statements");
    }

    #[test]
    fn rejects_chained_comparisons() {
        let err = parse_err("a = 1\nprint(0 < a < 2)\n");
        assert!(err.message.contains("chained comparisons"));
    }

    #[test]
    fn parses_collections_and_subscripts() {
        let source = indoc! {"
            xs = [1, 2,
                  3]
            d = {\"a\": 1}
            xs[0] = d[\"a\"]
            print(xs[0])
        "};
        let module = parse_ok(source);
        assert!(matches!(&module.main[2], Statement::SubscriptAssign { .. }));
    }

    #[test]
    fn precedence_puts_not_below_comparison() {
        let module = parse_ok("a = 1\nb = not a == 2 or a\n");
        let Statement::Assign { value, .. } = &module.main[1] else {
            panic!("expected assign");
        };
        let Expression::Logical { op, left, .. } = value else {
            panic!("expected logical");
        };
        assert_eq!(*op, LogicalOperator::Or);
        assert!(matches!(
            **left,
            Expression::Unary {
                op: UnaryOperator::Not,
                ..
            }
        ));
    }
}
