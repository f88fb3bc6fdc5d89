use basalt_engine::{Engine, Transaction};
use basalt_sql::{Param, Statement, parse_query};
use basalt_store::Store;

use crate::error::Error;
use crate::result::ResultSet;
use crate::runner::run_statement;

/// An embedded database over a storage engine. Statements run in
/// auto-commit transactions unless the SQL opens one with `BEGIN`.
pub struct Database<S: Store> {
    engine: Engine<S>,
}

impl<S: Store> Database<S> {
    pub fn new(store: S) -> Result<Self, Error> {
        Ok(Self {
            engine: Engine::new(store)?,
        })
    }

    /// Open a transaction for manual statement execution.
    pub fn begin(&self, writable: bool) -> Result<Transaction<'_, S>, Error> {
        Ok(self.engine.begin(writable)?)
    }

    /// Parse and run a `;`-separated list of statements, returning the last
    /// statement's result.
    ///
    /// `BEGIN`/`COMMIT`/`ROLLBACK` manage an explicit transaction spanning
    /// the following statements; everything else auto-commits. A
    /// transaction left open at the end of the text is rolled back.
    pub fn exec(&self, sql: &str, params: &[Param]) -> Result<ResultSet, Error> {
        let statements = parse_query(sql)?;
        let mut session: Option<Transaction<'_, S>> = None;
        let mut last = ResultSet::default();

        for stmt in &statements {
            match stmt {
                Statement::Begin { read_only } => {
                    if session.is_some() {
                        return Err(Error::AlreadyInTransaction);
                    }
                    session = Some(self.engine.begin(!read_only)?);
                }
                Statement::Commit => {
                    session
                        .take()
                        .ok_or(Error::NoActiveTransaction)?
                        .commit()?;
                }
                Statement::Rollback => {
                    session
                        .take()
                        .ok_or(Error::NoActiveTransaction)?
                        .rollback()?;
                }
                other => match &session {
                    Some(tx) => {
                        last = run_statement(other, tx, params)?;
                    }
                    None => {
                        let writable = !other.is_read_only();
                        let tx = self.engine.begin(writable)?;
                        match run_statement(other, &tx, params) {
                            Ok(result) => {
                                if writable {
                                    tx.commit()?;
                                } else {
                                    tx.rollback()?;
                                }
                                last = result;
                            }
                            Err(e) => {
                                let _ = tx.rollback();
                                return Err(e);
                            }
                        }
                    }
                },
            }
        }

        if let Some(tx) = session {
            let _ = tx.rollback();
        }
        Ok(last)
    }

    /// Run read statements only.
    pub fn query(&self, sql: &str, params: &[Param]) -> Result<ResultSet, Error> {
        let statements = parse_query(sql)?;
        if let Some(stmt) = statements.iter().find(|s| !s.is_read_only()) {
            return Err(Error::InvalidStatement(format!(
                "query only accepts read statements, got {stmt:?}"
            )));
        }
        self.exec(sql, params)
    }
}
