use crate::error::ExpressionError;
use nalgebra::DMatrix;
use std::f64::consts::{E, PI};
use std::fmt;

/// Longest expression source accepted, in bytes.
pub const MAX_EXPRESSION_LEN: usize = 4096;
/// Deepest nesting of parentheses, calls and unary signs accepted.
pub const MAX_DEPTH: usize = 64;

const NAMESPACE: &str = "np.";

/// Grid variables an expression may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
}

/// The only functions an expression can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Sqrt,
}

impl Function {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "tan" => Some(Function::Tan),
            "exp" => Some(Function::Exp),
            "sqrt" => Some(Function::Sqrt),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Exp => "exp",
            Function::Sqrt => "sqrt",
        }
    }

    fn apply(self, value: f64) -> f64 {
        match self {
            Function::Sin => value.sin(),
            Function::Cos => value.cos(),
            Function::Tan => value.tan(),
            Function::Exp => value.exp(),
            Function::Sqrt => value.sqrt(),
        }
    }
}

/// Abstract syntax tree of a field expression.
///
/// Names are resolved while parsing, so a tree can only ever mention the grid
/// variables and whitelisted functions. Constants are folded into `Number`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(Variable),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Call(Function, Box<Expr>),
}

/// Arrays an expression is evaluated against. Both must share a shape.
#[derive(Debug, Clone, Copy)]
pub struct GridEnvironment<'a> {
    pub x: &'a DMatrix<f64>,
    pub y: &'a DMatrix<f64>,
}

enum Value {
    Scalar(f64),
    Array(DMatrix<f64>),
}

impl Value {
    fn map(self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(v) => Value::Scalar(f(v)),
            Value::Array(mut m) => {
                m.apply(|v| *v = f(*v));
                Value::Array(m)
            }
        }
    }

    fn zip(self, other: Value, f: impl Fn(f64, f64) -> f64) -> Value {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(f(a, b)),
            (Value::Array(mut m), Value::Scalar(b)) => {
                m.apply(|v| *v = f(*v, b));
                Value::Array(m)
            }
            (Value::Scalar(a), Value::Array(mut m)) => {
                m.apply(|v| *v = f(a, *v));
                Value::Array(m)
            }
            (Value::Array(a), Value::Array(b)) => Value::Array(a.zip_map(&b, f)),
        }
    }

    fn into_matrix(self, rows: usize, cols: usize) -> DMatrix<f64> {
        match self {
            Value::Scalar(v) => DMatrix::from_element(rows, cols, v),
            Value::Array(m) => m,
        }
    }
}

impl Expr {
    /// Evaluates the tree once over the whole grid, element-wise.
    /// Constant sub-trees stay scalar and broadcast when combined with arrays.
    pub fn evaluate(&self, env: &GridEnvironment<'_>) -> DMatrix<f64> {
        let (rows, cols) = env.x.shape();
        self.evaluate_value(env).into_matrix(rows, cols)
    }

    fn evaluate_value(&self, env: &GridEnvironment<'_>) -> Value {
        match self {
            Expr::Number(v) => Value::Scalar(*v),
            Expr::Variable(Variable::X) => Value::Array(env.x.clone()),
            Expr::Variable(Variable::Y) => Value::Array(env.y.clone()),
            Expr::Binary(left, op, right) => {
                let op = *op;
                left.evaluate_value(env)
                    .zip(right.evaluate_value(env), move |a, b| op.apply(a, b))
            }
            Expr::Unary(UnaryOp::Neg, operand) => operand.evaluate_value(env).map(|v| -v),
            Expr::Call(func, arg) => {
                let func = *func;
                arg.evaluate_value(env).map(move |v| func.apply(v))
            }
        }
    }
}

/// A parsed expression together with the text it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldExpression {
    source: String,
    expr: Expr,
}

impl FieldExpression {
    pub fn compile(source: &str) -> Result<Self, ExpressionError> {
        let expr = parse(source)?;
        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Evaluates over the grid, rejecting any NaN or infinite entry.
    pub fn evaluate(&self, env: &GridEnvironment<'_>) -> Result<DMatrix<f64>, ExpressionError> {
        let values = self.expr.evaluate(env);
        let rows = values.nrows();
        // Column-major storage.
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(ExpressionError::NonFinite {
                row: index % rows,
                col: index / rows,
            });
        }
        Ok(values)
    }
}

// --- Parser ---

/// Parses untrusted text into an `Expr`.
pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    if input.len() > MAX_EXPRESSION_LEN {
        return Err(ExpressionError::TooLong {
            limit: MAX_EXPRESSION_LEN,
        });
    }
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExpressionError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(ExpressionError::UnexpectedToken {
            found: token.to_string(),
            position: parser.pos,
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    /// Spelled `**` or `^`; the spelling is kept for error messages.
    Pow(&'static str),
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {n}"),
            Token::Identifier(name) => write!(f, "name '{name}'"),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
            Token::Slash => f.write_str("'/'"),
            Token::Pow(op) => write!(f, "'{op}'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut literal = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    literal.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            // Exponent only when digits follow, so `2*e` keeps meaning Euler's number.
            if let Some(&(_, marker)) = chars.peek() {
                if marker == 'e' || marker == 'E' {
                    let rest = &input[position + literal.len() + 1..];
                    let unsigned = rest
                        .strip_prefix(|ch: char| ch == '+' || ch == '-')
                        .unwrap_or(rest);
                    if unsigned.starts_with(|ch: char| ch.is_ascii_digit()) {
                        literal.push(marker);
                        chars.next();
                        if let Some(&(_, sign)) = chars.peek() {
                            if sign == '+' || sign == '-' {
                                literal.push(sign);
                                chars.next();
                            }
                        }
                        while let Some(&(_, d)) = chars.peek() {
                            if d.is_ascii_digit() {
                                literal.push(d);
                                chars.next();
                            } else {
                                break;
                            }
                        }
                    }
                }
            }
            let value = literal
                .parse::<f64>()
                .map_err(|_| ExpressionError::InvalidNumber(literal.clone()))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = read_identifier(&mut chars);
            if ident == "np" {
                if let Some(&(_, '.')) = chars.peek() {
                    chars.next();
                    ident.push('.');
                    ident.push_str(&read_identifier(&mut chars));
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => {
                    chars.next();
                    if let Some(&(_, '*')) = chars.peek() {
                        chars.next();
                        tokens.push(Token::Pow("**"));
                    } else {
                        tokens.push(Token::Star);
                    }
                    continue;
                }
                '/' => Token::Slash,
                '^' => Token::Pow("^"),
                '(' => Token::LParen,
                ')' => Token::RParen,
                found => return Err(ExpressionError::UnexpectedChar { found, position }),
            };
            tokens.push(token);
            chars.next();
        }
    }
    Ok(tokens)
}

fn read_identifier(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&(_, d)) = chars.peek() {
        if d.is_alphanumeric() || d == '_' {
            ident.push(d);
            chars.next();
        } else {
            break;
        }
    }
    ident
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn descend(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::TooDeep { limit: MAX_DEPTH });
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn parse_expression(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_term()?;

        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.consume();
            let right = self.parse_term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        let negate = match self.peek() {
            Some(Token::Minus) => true,
            Some(Token::Plus) => false,
            _ => return self.parse_power(),
        };
        self.consume();
        self.descend()?;
        let operand = self.parse_unary()?;
        self.ascend();
        if negate {
            Ok(Expr::Unary(UnaryOp::Neg, Box::new(operand)))
        } else {
            Ok(operand)
        }
    }

    /// `a ** b ** c` groups to the right, and the exponent may carry a sign.
    fn parse_power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.parse_primary()?;
        if let Some(Token::Pow(_)) = self.peek() {
            self.consume();
            self.descend()?;
            let exponent = self.parse_unary()?;
            self.ascend();
            return Ok(Expr::Binary(Box::new(base), BinaryOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let position = self.pos;
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let func = Function::lookup(strip_namespace(&name))
                        .ok_or_else(|| ExpressionError::UnknownFunction(name.clone()))?;
                    let arg = self.parse_group()?;
                    Ok(Expr::Call(func, Box::new(arg)))
                } else {
                    resolve_name(&name)
                }
            }
            Some(Token::LParen) => self.parse_group(),
            Some(token) => Err(ExpressionError::UnexpectedToken {
                found: token.to_string(),
                position,
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }

    /// Parses the inside of a parenthesised group whose '(' was already consumed.
    fn parse_group(&mut self) -> Result<Expr, ExpressionError> {
        self.descend()?;
        let inner = self.parse_expression()?;
        self.ascend();
        match self.consume() {
            Some(Token::RParen) => Ok(inner),
            _ => Err(ExpressionError::UnclosedParen),
        }
    }
}

fn strip_namespace(name: &str) -> &str {
    name.strip_prefix(NAMESPACE).unwrap_or(name)
}

fn resolve_name(name: &str) -> Result<Expr, ExpressionError> {
    match name {
        "X" => return Ok(Expr::Variable(Variable::X)),
        "Y" => return Ok(Expr::Variable(Variable::Y)),
        _ => {}
    }
    match strip_namespace(name) {
        "pi" => Ok(Expr::Number(PI)),
        "e" => Ok(Expr::Number(E)),
        _ => Err(ExpressionError::UnknownName(name.to_string())),
    }
}
