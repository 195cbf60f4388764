// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Sandboxed distance expressions.

Expressions such as `"exp(-d / 2.5)"` or `"0.5 * (d < 3)"` describe weights,
delays or probabilities as functions of the distance between two neurons.
They are parsed once into a small AST; evaluation only ever touches the
allow-listed variables, constants and functions below. Any other identifier
is rejected when the expression is parsed.

| kind | names |
|---|---|
| variables | `d`, `dx`, `dy` |
| constants | `pi`, `e` |
| functions | `exp log sqrt abs sin cos tan pow min max floor ceil` |

Operators: `+ - * /`, `^` or `**` (right associative), comparisons
`< <= > >=` yielding `1.0` or `0.0`.
*/

use crate::types::{ConnectivityError, ConnectivityResult};

/// Distances between a pre- and a post-synaptic neuron
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DistanceVariables {
    pub d: f64,
    pub dx: f64,
    pub dy: f64,
}

impl DistanceVariables {
    pub fn between(pre: (f64, f64), post: (f64, f64)) -> Self {
        let dx = (post.0 - pre.0).abs();
        let dy = (post.1 - pre.1).abs();
        Self {
            d: (dx * dx + dy * dy).sqrt(),
            dx,
            dy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Variable {
    D,
    Dx,
    Dy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Function {
    Exp,
    Log,
    Sqrt,
    Abs,
    Sin,
    Cos,
    Tan,
    Pow,
    Min,
    Max,
    Floor,
    Ceil,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "exp" => Function::Exp,
            "log" => Function::Log,
            "sqrt" => Function::Sqrt,
            "abs" => Function::Abs,
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "pow" => Function::Pow,
            "min" => Function::Min,
            "max" => Function::Max,
            "floor" => Function::Floor,
            "ceil" => Function::Ceil,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Function::Pow | Function::Min | Function::Max => 2,
            _ => 1,
        }
    }

    fn apply(self, args: &[f64]) -> f64 {
        match self {
            Function::Exp => args[0].exp(),
            Function::Log => args[0].ln(),
            Function::Sqrt => args[0].sqrt(),
            Function::Abs => args[0].abs(),
            Function::Sin => args[0].sin(),
            Function::Cos => args[0].cos(),
            Function::Tan => args[0].tan(),
            Function::Pow => args[0].powf(args[1]),
            Function::Min => args[0].min(args[1]),
            Function::Max => args[0].max(args[1]),
            Function::Floor => args[0].floor(),
            Function::Ceil => args[0].ceil(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Var(Variable),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

impl Expr {
    fn eval(&self, vars: &DistanceVariables) -> f64 {
        match self {
            Expr::Number(v) => *v,
            Expr::Var(Variable::D) => vars.d,
            Expr::Var(Variable::Dx) => vars.dx,
            Expr::Var(Variable::Dy) => vars.dy,
            Expr::Neg(inner) => -inner.eval(vars),
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(vars);
                let b = rhs.eval(vars);
                let truth = |t: bool| if t { 1.0 } else { 0.0 };
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Pow => a.powf(b),
                    BinaryOp::Lt => truth(a < b),
                    BinaryOp::Le => truth(a <= b),
                    BinaryOp::Gt => truth(a > b),
                    BinaryOp::Ge => truth(a >= b),
                }
            }
            Expr::Call(function, args) => {
                let values: Vec<f64> = args.iter().map(|arg| arg.eval(vars)).collect();
                function.apply(&values)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(BinaryOp),
    LParen,
    RParen,
    Comma,
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("malformed number '{}'", text))?;
                tokens.push(Token::Number(value));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '+' => {
                tokens.push(Token::Op(BinaryOp::Add));
                i += 1;
            }
            '-' => {
                tokens.push(Token::Op(BinaryOp::Sub));
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Op(BinaryOp::Pow));
                i += 2;
            }
            '*' => {
                tokens.push(Token::Op(BinaryOp::Mul));
                i += 1;
            }
            '/' => {
                tokens.push(Token::Op(BinaryOp::Div));
                i += 1;
            }
            '^' => {
                tokens.push(Token::Op(BinaryOp::Pow));
                i += 1;
            }
            '<' | '>' => {
                let or_equal = chars.get(i + 1) == Some(&'=');
                let op = match (c, or_equal) {
                    ('<', false) => BinaryOp::Lt,
                    ('<', true) => BinaryOp::Le,
                    ('>', false) => BinaryOp::Gt,
                    _ => BinaryOp::Ge,
                };
                tokens.push(Token::Op(op));
                i += if or_equal { 2 } else { 1 };
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {:?}, found {:?}", expected, token)),
            None => Err(format!("expected {:?}, found end of input", expected)),
        }
    }

    fn comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.additive()?;
        if let Some(Token::Op(op @ (BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge))) =
            self.peek().cloned()
        {
            self.pos += 1;
            let rhs = self.additive()?;
            return Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.multiplicative()?;
        while let Some(Token::Op(op @ (BinaryOp::Add | BinaryOp::Sub))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ (BinaryOp::Mul | BinaryOp::Div))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(Token::Op(BinaryOp::Sub)) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Op(BinaryOp::Add)) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, String> {
        let base = self.primary()?;
        if let Some(Token::Op(BinaryOp::Pow)) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Number(v)) => Ok(Expr::Number(v)),
            Some(Token::LParen) => {
                let inner = self.comparison()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.identifier(&name),
            Some(token) => Err(format!("unexpected token {:?}", token)),
            None => Err("unexpected end of input".to_string()),
        }
    }

    fn identifier(&mut self, name: &str) -> Result<Expr, String> {
        match name {
            "d" => return Ok(Expr::Var(Variable::D)),
            "dx" => return Ok(Expr::Var(Variable::Dx)),
            "dy" => return Ok(Expr::Var(Variable::Dy)),
            "pi" => return Ok(Expr::Number(std::f64::consts::PI)),
            "e" => return Ok(Expr::Number(std::f64::consts::E)),
            _ => {}
        }
        let function = Function::lookup(name).ok_or_else(|| format!("'{}' is not allowed", name))?;
        self.expect(Token::LParen)?;
        let mut args = vec![self.comparison()?];
        while let Some(Token::Comma) = self.peek() {
            self.pos += 1;
            args.push(self.comparison()?);
        }
        self.expect(Token::RParen)?;
        if args.len() != function.arity() {
            return Err(format!(
                "'{}' takes {} argument(s), got {}",
                name,
                function.arity(),
                args.len()
            ));
        }
        Ok(Expr::Call(function, args))
    }
}

/// A parsed, allow-listed distance expression
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistanceExpression {
    source: String,
    ast: Expr,
}

impl DistanceExpression {
    /// Parse `source`, rejecting anything outside the allow-list
    ///
    /// # Example
    /// ```
    /// use synmatrix_connectivity::{DistanceExpression, DistanceVariables};
    ///
    /// let expr = DistanceExpression::parse("exp(-d / 2)").unwrap();
    /// assert_eq!(expr.evaluate(&DistanceVariables::default()), 1.0);
    /// assert!(DistanceExpression::parse("system(1)").is_err());
    /// ```
    pub fn parse(source: &str) -> ConnectivityResult<Self> {
        let invalid = |reason: String| ConnectivityError::InvalidExpression {
            expression: source.to_string(),
            reason,
        };
        let tokens = tokenize(source).map_err(invalid)?;
        let mut parser = Parser { tokens, pos: 0 };
        let ast = parser.comparison().map_err(invalid)?;
        if let Some(token) = parser.peek() {
            return Err(invalid(format!("trailing token {:?}", token)));
        }
        Ok(Self {
            source: source.to_string(),
            ast,
        })
    }

    pub fn evaluate(&self, vars: &DistanceVariables) -> f64 {
        self.ast.eval(vars)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl TryFrom<String> for DistanceExpression {
    type Error = ConnectivityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DistanceExpression> for String {
    fn from(expression: DistanceExpression) -> Self {
        expression.source
    }
}

impl std::fmt::Display for DistanceExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}
