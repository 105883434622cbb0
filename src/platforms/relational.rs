//! Managed SQL adapter:
//! `/relational/<project>/<engine>/<instance>/<database>/<table>`.

use serde_json::{Number, Value};
use tracing::debug;

use crate::backend::sql::{ConnectionTarget, SqlConnector, SqlEngine, SqlRows, SqlSession, SqlValue};
use crate::core::ident;
use crate::core::{DriveError, NormalizedResult, Platform, RequestContext, Record, Result};

const PLATFORM: Platform = Platform::Relational;

const REQUIRED_PARAMS: usize = 5;

fn invalid(reason: impl Into<String>) -> DriveError {
    DriveError::invalid_parameters(PLATFORM.token(), PLATFORM.path_shape(), reason)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationalPlan {
    target: ConnectionTarget,
    table: String,
}

impl RelationalPlan {
    /// Segments past the fifth are ignored.
    pub fn from_params(params: &[String]) -> Result<Self> {
        let [project, engine, instance, database, table, ..] = params else {
            return Err(invalid(format!(
                "expected {REQUIRED_PARAMS} parameters, got {}",
                params.len()
            )));
        };

        let engine: SqlEngine = engine.parse().map_err(|reason: String| invalid(reason))?;

        if !ident::is_project_id(project) {
            return Err(invalid(format!("{project:?} is not a valid project id")));
        }
        if !ident::is_sql_name(instance) {
            return Err(invalid(format!("{instance:?} is not a valid instance name")));
        }
        if !ident::is_sql_name(database) {
            return Err(invalid(format!("{database:?} is not a valid database name")));
        }
        if !ident::is_sql_table(table) {
            return Err(invalid(format!("{table:?} is not a valid table name")));
        }

        Ok(Self {
            target: ConnectionTarget {
                engine,
                project: project.clone(),
                instance: instance.clone(),
                database: database.clone(),
            },
            table: table.clone(),
        })
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn query(&self) -> String {
        format!("SELECT * FROM {}", self.target.engine.quote_table(&self.table))
    }

    pub async fn open(
        self,
        connector: &dyn SqlConnector,
        ctx: &RequestContext,
    ) -> Result<RelationalHandle> {
        let session = ctx.run(connector.open(&self.target)).await?;
        Ok(RelationalHandle {
            session: Some(session),
            query: self.query(),
        })
    }
}

pub struct RelationalHandle {
    session: Option<Box<dyn SqlSession>>,
    query: String,
}

impl RelationalHandle {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_released(&self) -> bool {
        self.session.is_none()
    }

    pub async fn fetch(&mut self, ctx: &RequestContext) -> Result<NormalizedResult> {
        let session = self
            .session
            .as_deref_mut()
            .ok_or_else(|| DriveError::read_failure("sql session already released"))?;

        let rows = ctx.run(session.select_all(&self.query)).await?;
        debug!(rows = rows.rows.len(), columns = rows.columns.len(), "sql table read");
        Ok(NormalizedResult::Records(into_records(rows)))
    }

    pub async fn release(&mut self) -> Result<()> {
        match self.session.take() {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }
}

/// Column name to value maps, in row order. Byte columns are rendered as
/// text.
fn into_records(result: SqlRows) -> Vec<Record> {
    let SqlRows { columns, rows } = result;
    rows.into_iter()
        .map(|row| {
            columns
                .iter()
                .cloned()
                .zip(row.into_iter().map(to_json))
                .collect()
        })
        .collect()
}

fn to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(b),
        SqlValue::Int(i) => Value::from(i),
        SqlValue::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Bytes(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
    }
}
