use grid_core::{ErrorInfo, FieldMap, GridError, ParamValue};

/// Evaluates an arithmetic expression against already-fixed bindings.
///
/// Supported grammar: integer and float literals, identifiers naming
/// earlier-bound parameters, `+ - * / %`, unary minus and parentheses.
/// Integer operands stay integral; mixing an integer with a real promotes
/// to real. Referencing an identifier with no binding is fatal for the
/// whole sweep, so the error carries the offending name and source text.
pub fn eval(source: &str, bindings: &FieldMap) -> Result<ParamValue, GridError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens: &tokens,
        pos: 0,
        bindings,
    };
    let value = parser.expression()?;
    if parser.pos != tokens.len() {
        return Err(syntax_error(source, "trailing input after expression"));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Real(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<Token>, GridError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if text.contains('.') {
                    let v = text
                        .parse::<f64>()
                        .map_err(|_| syntax_error(source, format!("bad number `{text}`")))?;
                    tokens.push(Token::Real(v));
                } else {
                    let v = text
                        .parse::<i64>()
                        .map_err(|_| syntax_error(source, format!("bad number `{text}`")))?;
                    tokens.push(Token::Int(v));
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(syntax_error(source, format!("unexpected character `{other}`")));
            }
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: &'a [Token],
    pos: usize,
    bindings: &'a FieldMap,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expression(&mut self) -> Result<ParamValue, GridError> {
        let mut lhs = self.term()?;
        while let Some(op) = self.peek() {
            let op = match op {
                Token::Plus => '+',
                Token::Minus => '-',
                _ => break,
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = apply(self.source, op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<ParamValue, GridError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek() {
            let op = match op {
                Token::Star => '*',
                Token::Slash => '/',
                Token::Percent => '%',
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = apply(self.source, op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<ParamValue, GridError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.pos += 1;
            let value = self.unary()?;
            return match value {
                ParamValue::Int(v) => Ok(ParamValue::Int(-v)),
                ParamValue::Real(v) => Ok(ParamValue::Real(-v)),
                ParamValue::Text(_) => Err(type_error(self.source, "cannot negate text")),
            };
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<ParamValue, GridError> {
        match self.bump() {
            Some(Token::Int(v)) => Ok(ParamValue::Int(v)),
            Some(Token::Real(v)) => Ok(ParamValue::Real(v)),
            Some(Token::Ident(name)) => match self.bindings.get(&name) {
                Some(value) => Ok(value.clone()),
                None => Err(GridError::Expr(
                    ErrorInfo::new("expr-unbound", "identifier is not bound")
                        .with_context("identifier", name)
                        .with_context("expression", self.source.to_string())
                        .with_hint("only parameters declared earlier are visible"),
                )),
            },
            Some(Token::LParen) => {
                let value = self.expression()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(syntax_error(self.source, "expected `)`")),
                }
            }
            _ => Err(syntax_error(self.source, "expected a value")),
        }
    }
}

fn apply(source: &str, op: char, lhs: ParamValue, rhs: ParamValue) -> Result<ParamValue, GridError> {
    use ParamValue::{Int, Real};
    match (lhs, rhs) {
        (Int(a), Int(b)) => match op {
            '+' => Ok(Int(a + b)),
            '-' => Ok(Int(a - b)),
            '*' => Ok(Int(a * b)),
            '/' if b == 0 => Err(type_error(source, "division by zero")),
            '/' => Ok(Int(a / b)),
            '%' if b == 0 => Err(type_error(source, "division by zero")),
            '%' => Ok(Int(a % b)),
            _ => unreachable!(),
        },
        (a, b) if a.is_numeric() && b.is_numeric() => {
            let a = a.as_f64().unwrap_or_default();
            let b = b.as_f64().unwrap_or_default();
            match op {
                '+' => Ok(Real(a + b)),
                '-' => Ok(Real(a - b)),
                '*' => Ok(Real(a * b)),
                '/' => Ok(Real(a / b)),
                '%' => Ok(Real(a % b)),
                _ => unreachable!(),
            }
        }
        _ => Err(type_error(source, "arithmetic on non-numeric operand")),
    }
}

fn syntax_error(source: &str, message: impl Into<String>) -> GridError {
    GridError::Expr(
        ErrorInfo::new("expr-syntax", message).with_context("expression", source.to_string()),
    )
}

fn type_error(source: &str, message: impl Into<String>) -> GridError {
    GridError::Expr(
        ErrorInfo::new("expr-type", message).with_context("expression", source.to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(pairs: &[(&str, ParamValue)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        let bindings = ctx(&[("a", ParamValue::Int(2))]);
        assert_eq!(eval("a*2", &bindings).unwrap(), ParamValue::Int(4));
        assert_eq!(eval("(a+1)/2", &bindings).unwrap(), ParamValue::Int(1));
        assert_eq!(eval("7 % a", &bindings).unwrap(), ParamValue::Int(1));
    }

    #[test]
    fn mixed_arithmetic_promotes_to_real() {
        let bindings = ctx(&[("scale", ParamValue::Real(0.5))]);
        assert_eq!(eval("scale * 4", &bindings).unwrap(), ParamValue::Real(2.0));
    }

    #[test]
    fn unbound_identifier_names_the_offender() {
        let err = eval("b + 1", &FieldMap::new()).unwrap_err();
        assert_eq!(err.info().code, "expr-unbound");
        assert_eq!(err.info().context.get("identifier").unwrap(), "b");
    }

    #[test]
    fn unary_minus_and_precedence() {
        let bindings = ctx(&[("n", ParamValue::Int(3))]);
        assert_eq!(eval("-n + 2 * 4", &bindings).unwrap(), ParamValue::Int(5));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let bindings = ctx(&[("n", ParamValue::Int(0))]);
        assert_eq!(eval("1/n", &bindings).unwrap_err().info().code, "expr-type");
    }
}
