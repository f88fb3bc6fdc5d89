mod database;
mod error;
mod optimizer;
mod planner;
mod result;
mod runner;
mod stream;

pub use database::Database;
pub use error::{ConstraintError, Error};
pub use optimizer::optimize;
pub use result::ResultSet;
pub use runner::run_statement;
pub use stream::{AggregatorBuilder, IndexOperator, Op, Stream};

pub use basalt_engine::Transaction;
pub use basalt_sql::{Param, Statement, parse_query};
