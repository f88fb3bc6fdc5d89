use crate::ast::{Direction, Projection, SelectStmt};
use crate::error::ParseError;
use crate::token::Token;

use super::Parser;

impl Parser<'_> {
    /// The `SELECT` keyword has already been consumed.
    pub(crate) fn parse_select(&mut self) -> Result<SelectStmt, ParseError> {
        let distinct = self.eat(Token::Distinct);

        let mut projections = vec![self.parse_projection()?];
        while self.eat(Token::Comma) {
            projections.push(self.parse_projection()?);
        }

        let table = if self.eat(Token::From) {
            Some(self.parse_ident()?)
        } else {
            None
        };

        let filter = if self.eat(Token::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let group_by = if self.eat(Token::Group) {
            self.expect(Token::By)?;
            Some(self.parse_expr()?)
        } else {
            None
        };

        let order_by = if self.eat(Token::Order) {
            self.expect(Token::By)?;
            let path = self.parse_path()?;
            let direction = if self.eat(Token::Asc) {
                Direction::Asc
            } else if self.eat(Token::Desc) {
                Direction::Desc
            } else {
                Direction::Asc
            };
            Some((path, direction))
        } else {
            None
        };

        let offset = if self.eat(Token::Offset) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let limit = if self.eat(Token::Limit) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        // OFFSET binds before LIMIT; the conventional order is rejected.
        let trailing = self.peek();
        if trailing.tok == Token::Offset {
            return Err(ParseError::with_message(
                "OFFSET must precede LIMIT",
                trailing.pos,
            ));
        }

        Ok(SelectStmt {
            distinct,
            projections,
            table,
            filter,
            group_by,
            order_by,
            offset,
            limit,
        })
    }

    pub(crate) fn parse_projection(&mut self) -> Result<Projection, ParseError> {
        if self.eat(Token::Star) {
            return Ok(Projection::Wildcard);
        }
        let (expr, raw) = self.parse_expr_with_raw()?;
        let name = if self.eat(Token::As) {
            self.parse_ident()?
        } else {
            raw
        };
        Ok(Projection::Expr { expr, name })
    }
}
