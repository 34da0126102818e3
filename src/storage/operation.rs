//! Operations a connection can execute, and how they apply to table data.

use std::collections::BTreeMap;
use std::fmt;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::row::Row;
use crate::storage::types::{RowKey, TableName};

/// Table contents keyed by name, rows keyed by primary key.
pub(crate) type Tables = BTreeMap<TableName, BTreeMap<RowKey, Row>>;

/// Kind of data-access operation. Each kind has its own hook pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Create,
    Update,
    Delete,
    Raw,
    Query,
    Row,
}

impl OpKind {
    /// All kinds, in pipeline order.
    pub const ALL: [OpKind; 6] = [
        OpKind::Create,
        OpKind::Update,
        OpKind::Delete,
        OpKind::Raw,
        OpKind::Query,
        OpKind::Row,
    ];

    /// Check if operations of this kind modify data.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            OpKind::Create | OpKind::Update | OpKind::Delete | OpKind::Raw
        )
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::Create => "create",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
            OpKind::Raw => "raw",
            OpKind::Query => "query",
            OpKind::Row => "row",
        };
        f.write_str(name)
    }
}

/// Raw statements understood by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawStatement {
    CreateTable(TableName),
    DropTable(TableName),
    /// `DELETE FROM t` / `TRUNCATE t`: remove every row, keep the table.
    Truncate(TableName),
}

impl RawStatement {
    /// Parse `CREATE TABLE t`, `DROP TABLE t`, `DELETE FROM t` or `TRUNCATE [TABLE] t`.
    pub fn parse(sql: &str) -> StorageResult<Self> {
        let sql = sql.trim().trim_end_matches(';').trim();
        let words: Vec<&str> = sql.split_whitespace().collect();
        let upper: Vec<String> = words.iter().map(|w| w.to_uppercase()).collect();
        let upper: Vec<&str> = upper.iter().map(String::as_str).collect();

        let stmt = match (upper.as_slice(), words.as_slice()) {
            (["CREATE", "TABLE", _], [_, _, table]) => {
                RawStatement::CreateTable(TableName::new(*table)?)
            }
            (["DROP", "TABLE", _], [_, _, table]) => RawStatement::DropTable(TableName::new(*table)?),
            (["DELETE", "FROM", _], [_, _, table]) | (["TRUNCATE", "TABLE", _], [_, _, table]) => {
                RawStatement::Truncate(TableName::new(*table)?)
            }
            (["TRUNCATE", _], [_, table]) => RawStatement::Truncate(TableName::new(*table)?),
            _ if sql.is_empty() => {
                return Err(StorageError::UnsupportedStatement("empty statement".into()))
            }
            _ => return Err(StorageError::UnsupportedStatement(sql.to_string())),
        };
        Ok(stmt)
    }
}

/// A single data-access operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create { table: TableName, row: Row },
    Update { table: TableName, row: Row },
    Delete { table: TableName, key: RowKey },
    Raw(RawStatement),
    Query { table: TableName },
    Row { table: TableName, key: RowKey },
}

impl Operation {
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Create { .. } => OpKind::Create,
            Operation::Update { .. } => OpKind::Update,
            Operation::Delete { .. } => OpKind::Delete,
            Operation::Raw(_) => OpKind::Raw,
            Operation::Query { .. } => OpKind::Query,
            Operation::Row { .. } => OpKind::Row,
        }
    }

    /// Apply this operation to `tables`.
    ///
    /// Reads leave `tables` untouched. A failed write leaves it untouched too.
    pub(crate) fn apply(&self, tables: &mut Tables) -> StorageResult<Outcome> {
        match self {
            Operation::Create { table, row } => {
                let rows = rows_mut(tables, table)?;
                if rows.contains_key(&row.key) {
                    return Err(StorageError::RowAlreadyExists {
                        table: table.clone(),
                        key: row.key.clone(),
                    });
                }
                rows.insert(row.key.clone(), row.clone());
                Ok(Outcome::Affected(1))
            }
            Operation::Update { table, row } => {
                let rows = rows_mut(tables, table)?;
                let existing = rows.get_mut(&row.key).ok_or_else(|| StorageError::RowNotFound {
                    table: table.clone(),
                    key: row.key.clone(),
                })?;
                existing.merge_data(row.data.clone());
                Ok(Outcome::Affected(1))
            }
            Operation::Delete { table, key } => {
                let rows = rows_mut(tables, table)?;
                Ok(Outcome::Affected(usize::from(rows.remove(key).is_some())))
            }
            Operation::Raw(RawStatement::CreateTable(table)) => {
                if tables.contains_key(table) {
                    return Err(StorageError::TableAlreadyExists(table.clone()));
                }
                tables.insert(table.clone(), BTreeMap::new());
                Ok(Outcome::Affected(0))
            }
            Operation::Raw(RawStatement::DropTable(table)) => {
                let rows = tables
                    .remove(table)
                    .ok_or_else(|| StorageError::TableNotFound(table.clone()))?;
                Ok(Outcome::Affected(rows.len()))
            }
            Operation::Raw(RawStatement::Truncate(table)) => {
                let rows = rows_mut(tables, table)?;
                let removed = rows.len();
                rows.clear();
                Ok(Outcome::Affected(removed))
            }
            Operation::Query { .. } | Operation::Row { .. } => self.read(tables),
        }
    }

    /// Evaluate a read operation. Writes are rejected.
    pub(crate) fn read(&self, tables: &Tables) -> StorageResult<Outcome> {
        match self {
            Operation::Query { table } => {
                let rows = rows(tables, table)?;
                Ok(Outcome::Rows(rows.values().cloned().collect()))
            }
            Operation::Row { table, key } => {
                let rows = rows(tables, table)?;
                Ok(Outcome::Row(rows.get(key).cloned()))
            }
            other => Err(StorageError::Internal(format!(
                "{} is not a read operation",
                other.kind()
            ))),
        }
    }
}

fn rows<'a>(tables: &'a Tables, table: &TableName) -> StorageResult<&'a BTreeMap<RowKey, Row>> {
    tables
        .get(table)
        .ok_or_else(|| StorageError::TableNotFound(table.clone()))
}

fn rows_mut<'a>(
    tables: &'a mut Tables,
    table: &TableName,
) -> StorageResult<&'a mut BTreeMap<RowKey, Row>> {
    tables
        .get_mut(table)
        .ok_or_else(|| StorageError::TableNotFound(table.clone()))
}

/// Result of executing an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Rows affected by a write.
    Affected(usize),
    /// Rows returned by a query.
    Rows(Vec<Row>),
    /// Row returned by a row lookup.
    Row(Option<Row>),
}

impl Outcome {
    pub fn into_affected(self) -> StorageResult<usize> {
        match self {
            Outcome::Affected(n) => Ok(n),
            other => Err(unexpected("affected count", &other)),
        }
    }

    pub fn into_rows(self) -> StorageResult<Vec<Row>> {
        match self {
            Outcome::Rows(rows) => Ok(rows),
            other => Err(unexpected("row set", &other)),
        }
    }

    pub fn into_row(self) -> StorageResult<Option<Row>> {
        match self {
            Outcome::Row(row) => Ok(row),
            other => Err(unexpected("single row", &other)),
        }
    }
}

fn unexpected(expected: &str, found: &Outcome) -> StorageError {
    StorageError::Internal(format!("expected {}, found {:?}", expected, found))
}
