use crate::ast::{DeleteStmt, InsertSource, InsertStmt, Projection, UpdateAction, UpdateStmt};
use crate::error::ParseError;
use crate::expr::Expr;
use crate::token::Token;

use super::Parser;

impl Parser<'_> {
    /// The `INSERT` keyword has already been consumed.
    pub(crate) fn parse_insert(&mut self) -> Result<InsertStmt, ParseError> {
        self.expect(Token::Into)?;
        let table = self.parse_ident()?;

        let mut columns = Vec::new();
        if self.eat(Token::LParen) {
            loop {
                columns.push(self.parse_ident()?);
                if self.eat(Token::Comma) {
                    continue;
                }
                self.expect(Token::RParen)?;
                break;
            }
        }

        let tok = self.next();
        let source = match tok.tok {
            Token::Values => {
                let mut values = vec![self.parse_insert_value(&columns)?];
                while self.eat(Token::Comma) {
                    values.push(self.parse_insert_value(&columns)?);
                }
                InsertSource::Values(values)
            }
            Token::Select => InsertSource::Select(Box::new(self.parse_select()?)),
            _ => return Err(self.error_at(&tok, &["VALUES", "SELECT"])),
        };

        let returning = self.parse_returning()?;

        Ok(InsertStmt {
            table,
            columns,
            source,
            returning,
        })
    }

    /// One inserted row: a document literal, a parenthesized value list
    /// zipped with the column list, or a parameter.
    fn parse_insert_value(&mut self, columns: &[String]) -> Result<Expr, ParseError> {
        let tok = self.peek();
        match tok.tok {
            Token::LBrace => {
                let expr = self.parse_document_literal()?;
                let Expr::KVPairs { pairs, .. } = expr else {
                    unreachable!("document literal parses to KVPairs");
                };
                Ok(Expr::KVPairs {
                    pairs,
                    self_referenced: true,
                })
            }
            Token::LParen => {
                if columns.is_empty() {
                    return Err(ParseError::with_message(
                        "a value list requires a column list",
                        tok.pos,
                    ));
                }
                self.next();
                let mut exprs = Vec::new();
                loop {
                    exprs.push(self.parse_expr()?);
                    if self.eat(Token::Comma) {
                        continue;
                    }
                    self.expect(Token::RParen)?;
                    break;
                }
                if exprs.len() != columns.len() {
                    return Err(ParseError::with_message(
                        format!(
                            "expected {} values, got {}",
                            columns.len(),
                            exprs.len()
                        ),
                        tok.pos,
                    ));
                }
                Ok(Expr::KVPairs {
                    pairs: columns.iter().cloned().zip(exprs).collect(),
                    self_referenced: false,
                })
            }
            Token::NamedParam | Token::PositionalParam => {
                let tok = self.next();
                match tok.tok {
                    Token::NamedParam => {
                        self.note_named_param(&tok)?;
                        Ok(Expr::NamedParam(tok.lit))
                    }
                    _ => {
                        let index = self.note_positional_param(&tok)?;
                        Ok(Expr::PositionalParam(index))
                    }
                }
            }
            _ => Err(self.error_at(&tok, &["document", "(", "parameter"])),
        }
    }

    /// The `UPDATE` keyword has already been consumed.
    pub(crate) fn parse_update(&mut self) -> Result<UpdateStmt, ParseError> {
        let table = self.parse_ident()?;
        let tok = self.next();
        let action = match tok.tok {
            Token::Set => {
                let mut pairs = Vec::new();
                loop {
                    let path = self.parse_path()?;
                    self.expect(Token::Eq)?;
                    let expr = self.parse_expr()?;
                    pairs.push((path, expr));
                    if !self.eat(Token::Comma) {
                        break;
                    }
                }
                UpdateAction::Set(pairs)
            }
            Token::Unset => {
                let mut fields = vec![self.parse_ident()?];
                while self.eat(Token::Comma) {
                    fields.push(self.parse_ident()?);
                }
                UpdateAction::Unset(fields)
            }
            _ => return Err(self.error_at(&tok, &["SET", "UNSET"])),
        };

        let filter = if self.eat(Token::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let returning = self.parse_returning()?;

        Ok(UpdateStmt {
            table,
            action,
            filter,
            returning,
        })
    }

    /// The `DELETE` keyword has already been consumed.
    pub(crate) fn parse_delete(&mut self) -> Result<DeleteStmt, ParseError> {
        self.expect(Token::From)?;
        let table = self.parse_ident()?;
        let filter = if self.eat(Token::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        let returning = self.parse_returning()?;
        Ok(DeleteStmt {
            table,
            filter,
            returning,
        })
    }

    fn parse_returning(&mut self) -> Result<Vec<Projection>, ParseError> {
        if !self.eat(Token::Returning) {
            return Ok(Vec::new());
        }
        let mut projections = vec![self.parse_projection()?];
        while self.eat(Token::Comma) {
            projections.push(self.parse_projection()?);
        }
        Ok(projections)
    }
}
