mod ddl;
mod dml;
mod expr;
mod select;

use basalt_document::{Fragment, Path, ValueType};

use crate::ast::Statement;
use crate::error::ParseError;
use crate::scanner::{BufScanner, TokenInfo};
use crate::token::Token;

/// Parse a `;`-separated list of statements. Empty statements are skipped.
pub fn parse_query(sql: &str) -> Result<Vec<Statement>, ParseError> {
    Parser::new(sql).parse_query()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamStyle {
    Named,
    Positional,
}

pub struct Parser<'a> {
    s: BufScanner<'a>,
    src: &'a str,
    param_style: Option<ParamStyle>,
    positional_count: usize,
}

impl<'a> Parser<'a> {
    pub fn new(sql: &'a str) -> Self {
        Self {
            s: BufScanner::new(sql),
            src: sql,
            param_style: None,
            positional_count: 0,
        }
    }

    pub fn parse_query(&mut self) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();
        loop {
            let tok = self.next();
            match tok.tok {
                Token::Eof => break,
                Token::Semicolon => continue,
                _ => {
                    self.unscan();
                    statements.push(self.parse_statement()?);
                    let end = self.next();
                    match end.tok {
                        Token::Semicolon => {}
                        Token::Eof => break,
                        _ => return Err(self.error_at(&end, &[";"])),
                    }
                }
            }
        }
        Ok(statements)
    }

    pub(crate) fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let tok = self.next();
        match tok.tok {
            Token::Select => self.parse_select().map(Statement::Select),
            Token::Insert => self.parse_insert().map(Statement::Insert),
            Token::Update => self.parse_update().map(Statement::Update),
            Token::Delete => self.parse_delete().map(Statement::Delete),
            Token::Create => self.parse_create(),
            Token::Drop => self.parse_drop(),
            Token::Alter => self.parse_alter(),
            Token::Reindex => self.parse_reindex().map(Statement::Reindex),
            Token::Explain => {
                let inner = self.parse_statement()?;
                Ok(Statement::Explain(Box::new(inner)))
            }
            Token::Begin => self.parse_begin(),
            Token::Commit => {
                self.eat(Token::Transaction);
                Ok(Statement::Commit)
            }
            Token::Rollback => {
                self.eat(Token::Transaction);
                Ok(Statement::Rollback)
            }
            _ => Err(self.error_at(
                &tok,
                &[
                    "SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "BEGIN",
                    "COMMIT", "ROLLBACK", "EXPLAIN", "REINDEX",
                ],
            )),
        }
    }

    fn parse_begin(&mut self) -> Result<Statement, ParseError> {
        self.eat(Token::Transaction);
        let mut read_only = false;
        if self.eat(Token::Read) {
            let tok = self.next();
            match tok.tok {
                Token::Only => read_only = true,
                Token::Write => read_only = false,
                _ => return Err(self.error_at(&tok, &["ONLY", "WRITE"])),
            }
        }
        Ok(Statement::Begin { read_only })
    }

    // ── Token helpers ───────────────────────────────────────────

    pub(crate) fn next(&mut self) -> TokenInfo {
        self.s.scan_ignore_whitespace()
    }

    pub(crate) fn unscan(&mut self) {
        self.s.unscan();
    }

    pub(crate) fn peek(&mut self) -> TokenInfo {
        let tok = self.next();
        self.s.unscan();
        tok
    }

    /// Consume the next token when it matches.
    pub(crate) fn eat(&mut self, tok: Token) -> bool {
        if self.peek().tok == tok {
            self.next();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, tok: Token) -> Result<TokenInfo, ParseError> {
        let info = self.next();
        if info.tok != tok {
            return Err(self.error_at(&info, &[&tok.to_string()]));
        }
        Ok(info)
    }

    pub(crate) fn error_at(&self, found: &TokenInfo, expected: &[&str]) -> ParseError {
        let found_text = if found.lit.is_empty() {
            found.tok.to_string()
        } else {
            found.lit.clone()
        };
        ParseError::new(
            found_text,
            expected.iter().map(|s| s.to_string()).collect(),
            found.pos,
        )
    }

    pub(crate) fn parse_ident(&mut self) -> Result<String, ParseError> {
        let tok = self.next();
        if tok.tok != Token::Ident {
            return Err(self.error_at(&tok, &["identifier"]));
        }
        Ok(tok.lit)
    }

    /// `IDENT (('.' IDENT) | ('.' INTEGER) | ('[' INTEGER ']'))*`
    pub(crate) fn parse_path(&mut self) -> Result<Path, ParseError> {
        let first = self.next();
        if first.tok != Token::Ident {
            return Err(self.error_at(&first, &["field name"]));
        }
        self.parse_path_from(first.lit)
    }

    /// Continue a path whose leading identifier was already consumed.
    pub(crate) fn parse_path_from(&mut self, first: String) -> Result<Path, ParseError> {
        let mut fragments = vec![Fragment::Field(first)];
        loop {
            if self.eat(Token::Dot) {
                let tok = self.next();
                match tok.tok {
                    Token::Ident => fragments.push(Fragment::Field(tok.lit)),
                    Token::Integer => {
                        let index = tok.lit.parse::<usize>().map_err(|_| {
                            ParseError::with_message("invalid array index", tok.pos)
                        })?;
                        fragments.push(Fragment::Index(index));
                    }
                    _ => return Err(self.error_at(&tok, &["field name", "array index"])),
                }
            } else if self.eat(Token::LBracket) {
                let tok = self.expect(Token::Integer)?;
                let index = tok
                    .lit
                    .parse::<usize>()
                    .map_err(|_| ParseError::with_message("invalid array index", tok.pos))?;
                fragments.push(Fragment::Index(index));
                self.expect(Token::RBracket)?;
            } else {
                return Ok(Path::new(fragments));
            }
        }
    }

    /// Type names and their aliases. All integer aliases map to Integer,
    /// text aliases to Text, floating aliases to Double.
    pub(crate) fn parse_type(&mut self) -> Result<ValueType, ParseError> {
        let tok = self.next();
        if tok.tok != Token::Ident {
            return Err(self.error_at(&tok, &["type name"]));
        }
        let ty = match tok.lit.to_ascii_uppercase().as_str() {
            "BYTES" | "BLOB" => ValueType::Blob,
            "BOOL" | "BOOLEAN" => ValueType::Bool,
            "INTEGER" | "INT" | "INT2" | "INT8" | "TINYINT" | "SMALLINT" | "MEDIUMINT"
            | "BIGINT" => ValueType::Integer,
            "DOUBLE" => {
                // DOUBLE PRECISION
                if self.peek().tok == Token::Ident
                    && self.peek().lit.eq_ignore_ascii_case("precision")
                {
                    self.next();
                }
                ValueType::Double
            }
            "REAL" => ValueType::Double,
            "TEXT" => ValueType::Text,
            "VARCHAR" | "CHARACTER" => {
                // The size argument is parsed and ignored.
                if self.eat(Token::LParen) {
                    self.expect(Token::Integer)?;
                    self.expect(Token::RParen)?;
                }
                ValueType::Text
            }
            "ARRAY" => ValueType::Array,
            "DOCUMENT" => ValueType::Document,
            "DURATION" => ValueType::Duration,
            _ => return Err(self.error_at(&tok, &["type name"])),
        };
        Ok(ty)
    }

    // ── Parameter bookkeeping ───────────────────────────────────

    pub(crate) fn note_named_param(&mut self, tok: &TokenInfo) -> Result<(), ParseError> {
        match self.param_style {
            Some(ParamStyle::Positional) => Err(ParseError::with_message(
                "cannot mix positional and named parameters",
                tok.pos,
            )),
            _ => {
                self.param_style = Some(ParamStyle::Named);
                Ok(())
            }
        }
    }

    pub(crate) fn note_positional_param(&mut self, tok: &TokenInfo) -> Result<usize, ParseError> {
        match self.param_style {
            Some(ParamStyle::Named) => Err(ParseError::with_message(
                "cannot mix positional and named parameters",
                tok.pos,
            )),
            _ => {
                self.param_style = Some(ParamStyle::Positional);
                self.positional_count += 1;
                Ok(self.positional_count)
            }
        }
    }

    pub(crate) fn src(&self) -> &'a str {
        self.src
    }

    pub(crate) fn curr_end(&self) -> usize {
        self.s.curr().end
    }
}
