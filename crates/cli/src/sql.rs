//! Real [`SqlSession`] backed by a blocking `postgres::Client`. The
//! wire protocol is treated as an external collaborator behind a
//! contract only; this is the CLI's default implementation of that
//! contract.
//!
//! Transactions are plain `BEGIN`/`COMMIT`/`ROLLBACK` statements rather
//! than `postgres::Transaction`, because the latter borrows the client
//! for the transaction's lifetime — incompatible with the `&mut dyn
//! SqlSession` trait object every other crate in the workspace programs
//! against. This mirrors how the original tool's SQL helper issued bare
//! transaction-control statements over one long-lived connection.

use std::io::Write;

use gpexpand_core::error::{GpExpandError, GpResult};
use gpexpand_core::traits::{Row, SqlSession};
use postgres::{Client, NoTls};

pub struct PostgresSqlSession {
    client: Client,
}

impl PostgresSqlSession {
    /// Connects with a libpq-style connection string, e.g.
    /// `host=cdw port=5432 dbname=mydb user=gpadmin`.
    pub fn connect(conninfo: &str) -> GpResult<Self> {
        let client = Client::connect(conninfo, NoTls)
            .map_err(|e| GpExpandError::Validation(format!("failed to connect: {e}")))?;
        Ok(PostgresSqlSession { client })
    }
}

impl SqlSession for PostgresSqlSession {
    fn execute(&mut self, sql: &str) -> GpResult<u64> {
        self.client
            .execute(sql, &[])
            .map_err(|e| GpExpandError::Validation(format!("execute failed: {e}")))
    }

    fn query(&mut self, sql: &str) -> GpResult<Vec<Row>> {
        let rows = self
            .client
            .query(sql, &[])
            .map_err(|e| GpExpandError::Validation(format!("query failed: {e}")))?;
        Ok(rows
            .iter()
            .map(|r| Row {
                columns: (0..r.len())
                    .map(|i| r.try_get::<_, Option<String>>(i).unwrap_or(None))
                    .collect(),
            })
            .collect())
    }

    fn begin(&mut self) -> GpResult<()> {
        self.execute("BEGIN").map(|_| ())
    }

    fn commit(&mut self) -> GpResult<()> {
        self.execute("COMMIT").map(|_| ())
    }

    fn rollback(&mut self) -> GpResult<()> {
        self.execute("ROLLBACK").map(|_| ())
    }

    fn copy_in(
        &mut self,
        sql: &str,
        rows: &mut dyn Iterator<Item = Vec<Option<String>>>,
    ) -> GpResult<u64> {
        let mut writer = self
            .client
            .copy_in(sql)
            .map_err(|e| GpExpandError::Validation(format!("copy_in open failed: {e}")))?;
        let mut count: u64 = 0;
        for row in rows {
            let line = row
                .iter()
                .map(|v| match v {
                    Some(s) => s.replace('\\', "\\\\").replace('\t', "\\t").replace('\n', "\\n"),
                    None => "\\N".to_string(),
                })
                .collect::<Vec<_>>()
                .join("\t");
            writer
                .write_all(line.as_bytes())
                .and_then(|_| writer.write_all(b"\n"))
                .map_err(|e| GpExpandError::Validation(format!("copy_in write failed: {e}")))?;
            count += 1;
        }
        writer
            .finish()
            .map_err(|e| GpExpandError::Validation(format!("copy_in finish failed: {e}")))?;
        Ok(count)
    }
}
