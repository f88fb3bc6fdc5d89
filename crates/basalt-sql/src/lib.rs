mod ast;
mod error;
mod expr;
mod glob;
mod parser;
mod scanner;
mod token;

pub use ast::{
    CreateIndexStmt, CreateTableStmt, DeleteStmt, Direction, DropIndexStmt, DropTableStmt,
    FieldConstraint, InsertSource, InsertStmt, Projection, ReindexStmt, SelectStmt, Statement,
    UpdateAction, UpdateStmt,
};
pub use error::{EvalError, ParseError};
pub use expr::{
    ACCUMULATOR, BinaryOperator, CURRENT_VALUE, Environment, Expr, Function, GROUP_KEY, PRIMARY_KEY,
    Param, UnaryOperator,
};
pub use glob::like_match;
pub use parser::{Parser, parse_query};
pub use scanner::{BufScanner, Pos, Scanner, TokenInfo};
pub use token::Token;
