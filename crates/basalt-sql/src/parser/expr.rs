use basalt_document::Value;

use crate::error::ParseError;
use crate::expr::{BinaryOperator, Expr, Function, UnaryOperator};
use crate::scanner::TokenInfo;
use crate::token::Token;

use super::Parser;

impl Parser<'_> {
    pub(crate) fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(1)
    }

    /// Parse an expression and capture the exact source text it consumed,
    /// used as the default result column name.
    pub(crate) fn parse_expr_with_raw(&mut self) -> Result<(Expr, String), ParseError> {
        let start = self.peek().start;
        let expr = self.parse_expr()?;
        let end = self.curr_end();
        let raw = self.src()[start..end].trim().to_string();
        Ok((expr, raw))
    }

    /// Precedence climbing over a left-associative operator ladder.
    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let tok = self.next();
            let prec = tok.tok.precedence();
            if prec == 0 || prec < min_prec {
                self.unscan();
                return Ok(lhs);
            }
            match tok.tok {
                Token::Between => {
                    lhs = self.parse_between(lhs, false, prec)?;
                }
                Token::Not => {
                    let follow = self.next();
                    match follow.tok {
                        Token::Like => {
                            let rhs = self.parse_binary(prec + 1)?;
                            lhs = Expr::binary(BinaryOperator::NotLike, lhs, rhs);
                        }
                        Token::In => {
                            let rhs = self.parse_binary(prec + 1)?;
                            lhs = Expr::binary(BinaryOperator::NotIn, lhs, rhs);
                        }
                        Token::Between => {
                            lhs = self.parse_between(lhs, true, prec)?;
                        }
                        _ => return Err(self.error_at(&follow, &["LIKE", "IN", "BETWEEN"])),
                    }
                }
                Token::Is => {
                    let op = if self.eat(Token::Not) {
                        BinaryOperator::IsNot
                    } else {
                        BinaryOperator::Is
                    };
                    let rhs = self.parse_binary(prec + 1)?;
                    lhs = Expr::binary(op, lhs, rhs);
                }
                _ => {
                    let op = plain_operator(tok.tok)
                        .ok_or_else(|| self.error_at(&tok, &["operator"]))?;
                    let rhs = self.parse_binary(prec + 1)?;
                    lhs = Expr::binary(op, lhs, rhs);
                }
            }
        }
    }

    /// `x BETWEEN a AND b` desugars to `x >= a AND x <= b`.
    fn parse_between(
        &mut self,
        operand: Expr,
        negated: bool,
        prec: u8,
    ) -> Result<Expr, ParseError> {
        let low = self.parse_binary(prec + 1)?;
        self.expect(Token::And)?;
        let high = self.parse_binary(prec + 1)?;
        let expr = if negated {
            Expr::binary(
                BinaryOperator::Or,
                Expr::binary(BinaryOperator::Lt, operand.clone(), low),
                Expr::binary(BinaryOperator::Gt, operand, high),
            )
        } else {
            Expr::binary(
                BinaryOperator::And,
                Expr::binary(BinaryOperator::Gte, operand.clone(), low),
                Expr::binary(BinaryOperator::Lte, operand, high),
            )
        };
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.next();
        match tok.tok {
            Token::Minus => {
                let operand = self.parse_unary()?;
                Ok(match operand {
                    Expr::Literal(Value::Integer(n)) => Expr::Literal(Value::Integer(-n)),
                    Expr::Literal(Value::Double(d)) => Expr::Literal(Value::Double(-d)),
                    Expr::Literal(Value::Duration(n)) => Expr::Literal(Value::Duration(-n)),
                    other => Expr::Unary {
                        op: UnaryOperator::Neg,
                        expr: Box::new(other),
                    },
                })
            }
            Token::Not => {
                // NOT folds into the inverted comparison operator.
                let operand = self.parse_binary(Token::Not.precedence())?;
                match operand {
                    Expr::Binary { op, lhs, rhs } if op.inverted().is_some() => Ok(Expr::Binary {
                        op: op.inverted().expect("checked above"),
                        lhs,
                        rhs,
                    }),
                    _ => Err(ParseError::with_message(
                        "NOT must be followed by a comparison",
                        tok.pos,
                    )),
                }
            }
            Token::Cast => {
                self.expect(Token::LParen)?;
                let expr = self.parse_expr()?;
                self.expect(Token::As)?;
                let target = self.parse_type()?;
                self.expect(Token::RParen)?;
                Ok(Expr::Cast {
                    expr: Box::new(expr),
                    target,
                })
            }
            Token::Ident => {
                if self.peek().tok == Token::LParen {
                    self.parse_function(&tok)
                } else {
                    Ok(Expr::Path(self.parse_path_from(tok.lit)?))
                }
            }
            Token::NamedParam => {
                self.note_named_param(&tok)?;
                Ok(Expr::NamedParam(tok.lit))
            }
            Token::PositionalParam => {
                let index = self.note_positional_param(&tok)?;
                Ok(Expr::PositionalParam(index))
            }
            Token::String => Ok(Expr::Literal(Value::Text(tok.lit))),
            Token::Integer => tok
                .lit
                .parse::<i64>()
                .map(|n| Expr::Literal(Value::Integer(n)))
                .map_err(|_| ParseError::with_message("integer out of range", tok.pos)),
            Token::Number => tok
                .lit
                .parse::<f64>()
                .map(|d| Expr::Literal(Value::Double(d)))
                .map_err(|_| ParseError::with_message("invalid number", tok.pos)),
            Token::Duration => parse_duration(&tok).map(|n| Expr::Literal(Value::Duration(n))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Star => Ok(Expr::Wildcard),
            Token::LBrace => {
                self.unscan();
                self.parse_document_literal()
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if !self.eat(Token::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if self.eat(Token::Comma) {
                            continue;
                        }
                        self.expect(Token::RBracket)?;
                        break;
                    }
                }
                Ok(Expr::List(items))
            }
            Token::LParen => {
                let first = self.parse_expr()?;
                if self.eat(Token::Comma) {
                    let mut items = vec![first];
                    loop {
                        items.push(self.parse_expr()?);
                        if self.eat(Token::Comma) {
                            continue;
                        }
                        break;
                    }
                    self.expect(Token::RParen)?;
                    Ok(Expr::List(items))
                } else {
                    self.expect(Token::RParen)?;
                    Ok(first)
                }
            }
            _ => Err(self.error_at(&tok, &["expression"])),
        }
    }

    /// `{ key: expr, ... }` with identifier or string keys.
    pub(crate) fn parse_document_literal(&mut self) -> Result<Expr, ParseError> {
        self.expect(Token::LBrace)?;
        let mut pairs = Vec::new();
        if !self.eat(Token::RBrace) {
            loop {
                let key_tok = self.next();
                let key = match key_tok.tok {
                    Token::Ident | Token::String => key_tok.lit,
                    _ => return Err(self.error_at(&key_tok, &["field name"])),
                };
                self.expect(Token::Colon)?;
                let value = self.parse_expr()?;
                pairs.push((key, value));
                if self.eat(Token::Comma) {
                    continue;
                }
                self.expect(Token::RBrace)?;
                break;
            }
        }
        Ok(Expr::KVPairs {
            pairs,
            self_referenced: false,
        })
    }

    fn parse_function(&mut self, name: &TokenInfo) -> Result<Expr, ParseError> {
        self.expect(Token::LParen)?;
        let func = match name.lit.to_ascii_lowercase().as_str() {
            "pk" => {
                self.expect(Token::RParen)?;
                Function::Pk
            }
            "count" => {
                if self.eat(Token::Star) {
                    self.expect(Token::RParen)?;
                    Function::Count {
                        wildcard: true,
                        expr: None,
                    }
                } else {
                    let expr = self.parse_expr()?;
                    self.expect(Token::RParen)?;
                    Function::Count {
                        wildcard: false,
                        expr: Some(Box::new(expr)),
                    }
                }
            }
            "sum" | "min" | "max" | "avg" => {
                let expr = Box::new(self.parse_expr()?);
                self.expect(Token::RParen)?;
                match name.lit.to_ascii_lowercase().as_str() {
                    "sum" => Function::Sum(expr),
                    "min" => Function::Min(expr),
                    "max" => Function::Max(expr),
                    _ => Function::Avg(expr),
                }
            }
            other => {
                return Err(ParseError::with_message(
                    format!("unknown function: {other}()"),
                    name.pos,
                ));
            }
        };
        Ok(Expr::Function(func))
    }
}

fn plain_operator(tok: Token) -> Option<BinaryOperator> {
    Some(match tok {
        Token::Or => BinaryOperator::Or,
        Token::And => BinaryOperator::And,
        Token::Eq => BinaryOperator::Eq,
        Token::Neq => BinaryOperator::Neq,
        Token::Lt => BinaryOperator::Lt,
        Token::Lte => BinaryOperator::Lte,
        Token::Gt => BinaryOperator::Gt,
        Token::Gte => BinaryOperator::Gte,
        Token::In => BinaryOperator::In,
        Token::Like => BinaryOperator::Like,
        Token::Pipe => BinaryOperator::BitOr,
        Token::Caret => BinaryOperator::BitXor,
        Token::Amp => BinaryOperator::BitAnd,
        Token::Plus => BinaryOperator::Add,
        Token::Minus => BinaryOperator::Sub,
        Token::Concat => BinaryOperator::Concat,
        Token::Star => BinaryOperator::Mul,
        Token::Slash => BinaryOperator::Div,
        Token::Percent => BinaryOperator::Mod,
        _ => return None,
    })
}

fn parse_duration(tok: &TokenInfo) -> Result<i64, ParseError> {
    let lit = &tok.lit;
    let split = lit
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| ParseError::with_message("invalid duration", tok.pos))?;
    let (digits, suffix) = lit.split_at(split);
    let base = digits
        .parse::<i64>()
        .map_err(|_| ParseError::with_message("duration out of range", tok.pos))?;
    let scale: i64 = match suffix {
        "x" => 1,
        "u" | "µ" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 3_600 * 1_000_000_000,
        "d" => 86_400 * 1_000_000_000,
        "w" => 604_800 * 1_000_000_000,
        _ => return Err(ParseError::with_message("invalid duration unit", tok.pos)),
    };
    base.checked_mul(scale)
        .ok_or_else(|| ParseError::with_message("duration out of range", tok.pos))
}
