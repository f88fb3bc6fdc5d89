use basalt_document::{Path, ValueType};

use crate::ast::{
    CreateIndexStmt, CreateTableStmt, DropIndexStmt, DropTableStmt, FieldConstraint, ReindexStmt,
    Statement,
};
use crate::error::ParseError;
use crate::scanner::Pos;
use crate::token::Token;

use super::Parser;

impl Parser<'_> {
    /// The `CREATE` keyword has already been consumed.
    pub(crate) fn parse_create(&mut self) -> Result<Statement, ParseError> {
        let tok = self.next();
        match tok.tok {
            Token::Table => self.parse_create_table().map(Statement::CreateTable),
            Token::Unique => {
                self.expect(Token::Index)?;
                self.parse_create_index(true).map(Statement::CreateIndex)
            }
            Token::Index => self.parse_create_index(false).map(Statement::CreateIndex),
            _ => Err(self.error_at(&tok, &["TABLE", "INDEX", "UNIQUE"])),
        }
    }

    fn parse_if_not_exists(&mut self) -> Result<bool, ParseError> {
        if self.eat(Token::If) {
            self.expect(Token::Not)?;
            self.expect(Token::Exists)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn parse_create_table(&mut self) -> Result<CreateTableStmt, ParseError> {
        let if_not_exists = self.parse_if_not_exists()?;
        let name_tok = self.expect(Token::Ident)?;
        let table = name_tok.lit;

        let mut fields: Vec<FieldConstraint> = Vec::new();
        if self.eat(Token::LParen) {
            loop {
                self.parse_table_entry(&mut fields)?;
                if self.eat(Token::Comma) {
                    continue;
                }
                self.expect(Token::RParen)?;
                break;
            }
        }

        reconcile_primary_keys(&fields, name_tok.pos)?;
        Ok(CreateTableStmt {
            table,
            if_not_exists,
            fields,
        })
    }

    /// One entry of a CREATE TABLE body: a field definition, a table-level
    /// `PRIMARY KEY(path)`, or a table-level `UNIQUE(path)`. Constraints on
    /// an already-declared path merge into the earlier definition.
    fn parse_table_entry(&mut self, fields: &mut Vec<FieldConstraint>) -> Result<(), ParseError> {
        let tok = self.peek();
        match tok.tok {
            Token::Primary => {
                self.next();
                self.expect(Token::Key)?;
                self.expect(Token::LParen)?;
                let path = self.parse_path()?;
                self.expect(Token::RParen)?;
                let fc = constraint_for(fields, path);
                fc.primary_key = true;
                fc.not_null = true;
                Ok(())
            }
            Token::Unique => {
                self.next();
                self.expect(Token::LParen)?;
                let path = self.parse_path()?;
                self.expect(Token::RParen)?;
                constraint_for(fields, path).unique = true;
                Ok(())
            }
            _ => self.parse_field_definition(fields),
        }
    }

    fn parse_field_definition(
        &mut self,
        fields: &mut Vec<FieldConstraint>,
    ) -> Result<(), ParseError> {
        let path = self.parse_path()?;
        let ty = if self.peek().tok == Token::Ident {
            Some(self.parse_type()?)
        } else {
            None
        };

        let fc = constraint_for(fields, path);
        if let Some(ty) = ty {
            fc.ty = Some(ty);
        }

        loop {
            let tok = self.peek();
            match tok.tok {
                Token::Primary => {
                    self.next();
                    self.expect(Token::Key)?;
                    fc.primary_key = true;
                    fc.not_null = true;
                }
                Token::Not => {
                    self.next();
                    self.expect(Token::Null)?;
                    fc.not_null = true;
                }
                Token::Unique => {
                    self.next();
                    fc.unique = true;
                }
                Token::Default => {
                    self.next();
                    fc.default_value = Some(self.parse_expr_in_field()?);
                }
                Token::Autoincrement => {
                    self.next();
                    if !matches!(fc.ty, None | Some(ValueType::Integer)) {
                        return Err(ParseError::with_message(
                            "AUTOINCREMENT is only valid on integer fields",
                            tok.pos,
                        ));
                    }
                    fc.ty = Some(ValueType::Integer);
                    let mut start = 1;
                    let mut increment = 1;
                    if self.eat(Token::LParen) {
                        start = self.parse_integer()?;
                        self.expect(Token::Comma)?;
                        increment = self.parse_integer()?;
                        self.expect(Token::RParen)?;
                    }
                    fc.auto_increment = Some((start, increment));
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_integer(&mut self) -> Result<i64, ParseError> {
        let negative = self.eat(Token::Minus);
        let tok = self.expect(Token::Integer)?;
        let n = tok
            .lit
            .parse::<i64>()
            .map_err(|_| ParseError::with_message("integer out of range", tok.pos))?;
        Ok(if negative { -n } else { n })
    }

    fn parse_create_index(&mut self, unique: bool) -> Result<CreateIndexStmt, ParseError> {
        let if_not_exists = self.parse_if_not_exists()?;
        let name = if self.peek().tok == Token::Ident {
            Some(self.parse_ident()?)
        } else {
            None
        };
        self.expect(Token::On)?;
        let table = self.parse_ident()?;
        self.expect(Token::LParen)?;
        let mut paths = vec![self.parse_path()?];
        while self.eat(Token::Comma) {
            paths.push(self.parse_path()?);
        }
        self.expect(Token::RParen)?;
        Ok(CreateIndexStmt {
            name,
            table,
            paths,
            unique,
            if_not_exists,
        })
    }

    /// The `DROP` keyword has already been consumed.
    pub(crate) fn parse_drop(&mut self) -> Result<Statement, ParseError> {
        let tok = self.next();
        let if_exists = |p: &mut Self| -> Result<bool, ParseError> {
            if p.eat(Token::If) {
                p.expect(Token::Exists)?;
                return Ok(true);
            }
            Ok(false)
        };
        match tok.tok {
            Token::Table => {
                let if_exists = if_exists(self)?;
                let table = self.parse_ident()?;
                Ok(Statement::DropTable(DropTableStmt { table, if_exists }))
            }
            Token::Index => {
                let if_exists = if_exists(self)?;
                let name = self.parse_ident()?;
                Ok(Statement::DropIndex(DropIndexStmt { name, if_exists }))
            }
            _ => Err(self.error_at(&tok, &["TABLE", "INDEX"])),
        }
    }

    /// The `ALTER` keyword has already been consumed.
    pub(crate) fn parse_alter(&mut self) -> Result<Statement, ParseError> {
        self.expect(Token::Table)?;
        let table = self.parse_ident()?;
        self.expect(Token::Rename)?;
        self.expect(Token::To)?;
        let new_name = self.parse_ident()?;
        Ok(Statement::AlterTableRename { table, new_name })
    }

    /// The `REINDEX` keyword has already been consumed.
    pub(crate) fn parse_reindex(&mut self) -> Result<ReindexStmt, ParseError> {
        let target = if self.peek().tok == Token::Ident {
            Some(self.parse_ident()?)
        } else {
            None
        };
        Ok(ReindexStmt { target })
    }

    /// DEFAULT expressions stop before constraint keywords; a plain
    /// `parse_expr` would happily swallow `NOT NULL` as a comparison.
    fn parse_expr_in_field(&mut self) -> Result<crate::expr::Expr, ParseError> {
        if self.eat(Token::LParen) {
            let expr = self.parse_expr()?;
            self.expect(Token::RParen)?;
            return Ok(expr);
        }
        // Restrict to a unary literal-ish expression.
        self.parse_default_operand()
    }

    fn parse_default_operand(&mut self) -> Result<crate::expr::Expr, ParseError> {
        use crate::expr::Expr;
        use basalt_document::Value;

        let tok = self.next();
        Ok(match tok.tok {
            Token::String => Expr::Literal(Value::Text(tok.lit)),
            Token::Integer => tok
                .lit
                .parse::<i64>()
                .map(|n| Expr::Literal(Value::Integer(n)))
                .map_err(|_| ParseError::with_message("integer out of range", tok.pos))?,
            Token::Number => tok
                .lit
                .parse::<f64>()
                .map(|d| Expr::Literal(Value::Double(d)))
                .map_err(|_| ParseError::with_message("invalid number", tok.pos))?,
            Token::True => Expr::Literal(Value::Bool(true)),
            Token::False => Expr::Literal(Value::Bool(false)),
            Token::Null => Expr::Literal(Value::Null),
            Token::Minus => match self.parse_default_operand()? {
                Expr::Literal(Value::Integer(n)) => Expr::Literal(Value::Integer(-n)),
                Expr::Literal(Value::Double(d)) => Expr::Literal(Value::Double(-d)),
                _ => {
                    return Err(ParseError::with_message(
                        "DEFAULT expects a constant",
                        tok.pos,
                    ));
                }
            },
            _ => return Err(self.error_at(&tok, &["constant"])),
        })
    }
}

/// Find or create the constraint entry for a path.
fn constraint_for(fields: &mut Vec<FieldConstraint>, path: Path) -> &mut FieldConstraint {
    if let Some(i) = fields.iter().position(|fc| fc.path == path) {
        return &mut fields[i];
    }
    fields.push(FieldConstraint::new(path));
    fields.last_mut().expect("just pushed")
}

fn reconcile_primary_keys(fields: &[FieldConstraint], pos: Pos) -> Result<(), ParseError> {
    let pk_count = fields.iter().filter(|fc| fc.primary_key).count();
    if pk_count > 1 {
        return Err(ParseError::with_message(
            "only one primary key is allowed",
            pos,
        ));
    }
    Ok(())
}
