//! Typed intermediate representation produced by the parser.
//!
//! Every node is a plain value. Names used inside expressions have already
//! been checked against the enclosing scope, calls have been resolved to a
//! builtin, a constructor or a user function, and syntactic sugar (`elif`,
//! augmented assignment, `True`/`False`) has been desugared.

use crate::builtins::{Builtin, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    FloorDiv,
    Mod,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::FloorDiv => "//",
            BinaryOperator::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOperator {
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

impl CompareOperator {
    /// The C operator with the same meaning.
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOperator::Eq => "==",
            CompareOperator::NotEq => "!=",
            CompareOperator::Less => "<",
            CompareOperator::LessEq => "<=",
            CompareOperator::Greater => ">",
            CompareOperator::GreaterEq => ">=",
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, CompareOperator::Eq | CompareOperator::NotEq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Decimal digits with an optional leading `-`.
    Int(String),
    Float(f64),
    Str(String),
    List(Vec<Expression>),
    Dict(Vec<(Expression, Expression)>),
    Var(String),
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
        line: usize,
    },
    Compare {
        op: CompareOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOperator,
        operand: Box<Expression>,
    },
    Logical {
        op: LogicalOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Subscript {
        object: String,
        index: Box<Expression>,
        line: usize,
    },
    Call {
        function: String,
        args: Vec<Expression>,
    },
    Attribute {
        object: String,
        attribute: String,
    },
    MethodCall {
        object: String,
        method: String,
        args: Vec<Expression>,
        line: usize,
    },
    Constructor {
        class: String,
        args: Vec<Expression>,
    },
    Builtin {
        builtin: Builtin,
        args: Vec<Expression>,
        line: usize,
    },
}

impl Expression {
    pub fn int(value: i64) -> Self {
        Expression::Int(value.to_string())
    }

    /// Whether the expression is an integer literal equal to zero.
    pub fn is_literal_zero(&self) -> bool {
        match self {
            Expression::Int(digits) => digits
                .trim_start_matches('-')
                .bytes()
                .all(|byte| byte == b'0'),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptClause {
    /// `None` for a bare `except:`.
    pub kind: Option<ErrorKind>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assign {
        name: String,
        value: Expression,
        line: usize,
    },
    AttrAssign {
        object: String,
        attribute: String,
        value: Expression,
        line: usize,
    },
    SubscriptAssign {
        object: String,
        index: Expression,
        value: Expression,
        line: usize,
    },
    /// A method call evaluated for its side effects.
    MethodCall {
        object: String,
        method: String,
        args: Vec<Expression>,
        line: usize,
    },
    /// A function, constructor or builtin call evaluated for its side effects.
    Expr {
        value: Expression,
        line: usize,
    },
    Print {
        value: Expression,
        line: usize,
    },
    If {
        condition: Expression,
        then_body: Vec<Statement>,
        else_body: Vec<Statement>,
        line: usize,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
        line: usize,
    },
    ForRange {
        var: String,
        start: Expression,
        stop: Expression,
        step: Expression,
        body: Vec<Statement>,
        line: usize,
    },
    Try {
        body: Vec<Statement>,
        handlers: Vec<ExceptClause>,
        line: usize,
    },
    Raise {
        kind: ErrorKind,
        message: Option<String>,
        line: usize,
    },
    Return {
        value: Option<Expression>,
        line: usize,
    },
    Break {
        line: usize,
    },
    Continue {
        line: usize,
    },
    Pass,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    /// Integer literal digits used to initialize the field on construction.
    pub default: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    /// Methods keep `self` as their first parameter.
    pub methods: Vec<FunctionDef>,
    pub fields: Vec<FieldDef>,
    pub line: usize,
}

impl ClassDef {
    pub fn method(&self, name: &str) -> Option<&FunctionDef> {
        self.methods.iter().find(|method| method.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub functions: Vec<FunctionDef>,
    pub classes: Vec<ClassDef>,
    pub main: Vec<Statement>,
}

impl Module {
    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|function| function.name == name)
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.iter().find(|class| class.name == name)
    }
}
