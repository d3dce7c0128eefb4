//! The generic command surface.
//!
//! Callers send a JSON payload such as
//! `{"command": "sql_command", "sql": "insert", "table": "favorites",
//!   "column_names": ["path"], "values": ["/a"]}`.
//! Payloads decode into a closed set of verbs over an allow-listed set of
//! tables and columns; identifiers in the generated SQL come only from the
//! allow-list, and values are always bound as parameters.

use super::sqlite::Database;
use crate::error::{Error, StoreContext};
use rusqlite::types::ValueRef;
use rusqlite::params_from_iter;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Files,
    Favorites,
    IgnoreFolders,
    FoldersToIndex,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Files => "files",
            Table::Favorites => "favorites",
            Table::IgnoreFolders => "ignore_folders",
            Table::FoldersToIndex => "folders_to_index",
        }
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Table::Files => &["path", "size", "modified", "root"],
            Table::Favorites | Table::IgnoreFolders | Table::FoldersToIndex => &["path"],
        }
    }

    /// `files` is owned by the scanner; only configuration tables accept
    /// inserts and deletes.
    pub fn is_writable(self) -> bool {
        !matches!(self, Table::Files)
    }

    /// Map a caller-supplied column name onto the allow-list.
    fn column(self, name: &str) -> Result<&'static str, Error> {
        self.columns()
            .iter()
            .copied()
            .find(|c| *c == name)
            .ok_or_else(|| {
                Error::protocol(format!(
                    "column '{}' is not allowed on table '{}'",
                    name,
                    self.as_str()
                ))
            })
    }
}

/// Envelope keyed by the `command` field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum Envelope {
    SqlCommand(SqlCommand),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "sql", rename_all = "lowercase")]
pub enum SqlCommand {
    Select {
        table: Table,
        /// Empty selects every allow-listed column.
        #[serde(default)]
        columns: Vec<String>,
    },
    Insert {
        table: Table,
        column_names: Vec<String>,
        values: Vec<String>,
    },
    Delete {
        table: Table,
        column: String,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    Rows(Vec<Vec<Value>>),
    Affected(usize),
}

impl CommandOutput {
    pub fn to_json(&self) -> Value {
        json!({ "result": self })
    }
}

impl SqlCommand {
    /// Decode and validate a caller payload. Fails before any store access.
    pub fn parse(payload: &Value) -> Result<Self, Error> {
        let Envelope::SqlCommand(cmd) = serde_json::from_value::<Envelope>(payload.clone())
            .map_err(|e| Error::protocol(e.to_string()))?;
        cmd.validate()?;
        Ok(cmd)
    }

    pub fn validate(&self) -> Result<(), Error> {
        match self {
            SqlCommand::Select { table, columns } => {
                for c in columns {
                    table.column(c)?;
                }
            }
            SqlCommand::Insert {
                table,
                column_names,
                values,
            } => {
                ensure_writable(*table)?;
                if column_names.is_empty() {
                    return Err(Error::protocol("insert requires column_names"));
                }
                if column_names.len() != values.len() {
                    return Err(Error::protocol(format!(
                        "insert has {} columns but {} values",
                        column_names.len(),
                        values.len()
                    )));
                }
                for (i, c) in column_names.iter().enumerate() {
                    table.column(c)?;
                    if column_names[..i].contains(c) {
                        return Err(Error::protocol(format!("duplicate column '{}'", c)));
                    }
                }
            }
            SqlCommand::Delete { table, column, .. } => {
                ensure_writable(*table)?;
                table.column(column)?;
            }
        }
        Ok(())
    }
}

fn ensure_writable(table: Table) -> Result<(), Error> {
    if table.is_writable() {
        Ok(())
    } else {
        Err(Error::protocol(format!(
            "table '{}' is read-only",
            table.as_str()
        )))
    }
}

fn json_from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => json!(i),
        ValueRef::Real(f) => json!(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => json!(b),
    }
}

impl Database {
    pub fn execute_command(&self, cmd: &SqlCommand) -> Result<CommandOutput, Error> {
        cmd.validate()?;
        match cmd {
            SqlCommand::Select { table, columns } => {
                let cols: Vec<&'static str> = if columns.is_empty() {
                    table.columns().to_vec()
                } else {
                    columns
                        .iter()
                        .map(|c| table.column(c))
                        .collect::<Result<_, _>>()?
                };
                let sql = format!(
                    "SELECT {} FROM {} ORDER BY id",
                    cols.join(", "),
                    table.as_str()
                );
                let conn = self.lock();
                let mut stmt = conn.prepare(&sql).during("sql_command")?;
                let rows = stmt
                    .query_map([], |row| {
                        (0..cols.len())
                            .map(|i| row.get_ref(i).map(json_from_value_ref))
                            .collect::<rusqlite::Result<Vec<_>>>()
                    })
                    .during("sql_command")?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .during("sql_command")?;
                Ok(CommandOutput::Rows(rows))
            }
            SqlCommand::Insert {
                table,
                column_names,
                values,
            } => {
                let cols: Vec<&'static str> = column_names
                    .iter()
                    .map(|c| table.column(c))
                    .collect::<Result<_, _>>()?;
                let placeholders: Vec<String> =
                    (1..=cols.len()).map(|i| format!("?{}", i)).collect();
                let sql = format!(
                    "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
                    table.as_str(),
                    cols.join(", "),
                    placeholders.join(", ")
                );
                let affected = self
                    .lock()
                    .execute(&sql, params_from_iter(values.iter()))
                    .during("sql_command")?;
                Ok(CommandOutput::Affected(affected))
            }
            SqlCommand::Delete {
                table,
                column,
                value,
            } => {
                let sql = format!(
                    "DELETE FROM {} WHERE {} = ?1",
                    table.as_str(),
                    table.column(column)?
                );
                let affected = self
                    .lock()
                    .execute(&sql, [value])
                    .during("sql_command")?;
                Ok(CommandOutput::Affected(affected))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_insert() {
        let cmd = SqlCommand::parse(&json!({
            "command": "sql_command",
            "sql": "insert",
            "table": "favorites",
            "column_names": ["path"],
            "values": ["/home/me/a.txt"],
        }))
        .unwrap();
        assert_eq!(
            cmd,
            SqlCommand::Insert {
                table: Table::Favorites,
                column_names: vec!["path".to_string()],
                values: vec!["/home/me/a.txt".to_string()],
            }
        );
    }

    #[test]
    fn test_parse_rejects_free_text_sql() {
        let err = SqlCommand::parse(&json!({
            "command": "sql_command",
            "sql": "drop table files",
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_command() {
        let err = SqlCommand::parse(&json!({"command": "shell", "sql": "select"})).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_parse_rejects_unknown_table() {
        let err = SqlCommand::parse(&json!({
            "command": "sql_command",
            "sql": "select",
            "table": "sqlite_master",
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_parse_rejects_injected_column() {
        let err = SqlCommand::parse(&json!({
            "command": "sql_command",
            "sql": "delete",
            "table": "favorites",
            "column": "path OR 1=1 --",
            "value": "x",
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_files_table_is_read_only() {
        let err = SqlCommand::parse(&json!({
            "command": "sql_command",
            "sql": "delete",
            "table": "files",
            "column": "path",
            "value": "/a",
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_insert_arity_mismatch() {
        let err = SqlCommand::parse(&json!({
            "command": "sql_command",
            "sql": "insert",
            "table": "ignore_folders",
            "column_names": ["path"],
            "values": [],
        }))
        .unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_insert_select_delete_round() {
        let db = Database::open_in_memory().unwrap();
        let insert = SqlCommand::Insert {
            table: Table::FoldersToIndex,
            column_names: vec!["path".to_string()],
            values: vec!["/data".to_string()],
        };
        assert_eq!(db.execute_command(&insert).unwrap(), CommandOutput::Affected(1));
        // ignore-on-conflict
        assert_eq!(db.execute_command(&insert).unwrap(), CommandOutput::Affected(0));

        let select = SqlCommand::Select {
            table: Table::FoldersToIndex,
            columns: vec![],
        };
        let out = db.execute_command(&select).unwrap();
        assert_eq!(out.to_json(), json!({ "result": [["/data"]] }));

        let delete = SqlCommand::Delete {
            table: Table::FoldersToIndex,
            column: "path".to_string(),
            value: "/data".to_string(),
        };
        assert_eq!(db.execute_command(&delete).unwrap(), CommandOutput::Affected(1));
        assert_eq!(
            db.execute_command(&select).unwrap(),
            CommandOutput::Rows(vec![])
        );
    }

    #[test]
    fn test_value_with_quote_is_bound_not_spliced() {
        let db = Database::open_in_memory().unwrap();
        let tricky = "/tmp/it's'); DROP TABLE favorites; --";
        db.execute_command(&SqlCommand::Insert {
            table: Table::Favorites,
            column_names: vec!["path".to_string()],
            values: vec![tricky.to_string()],
        })
        .unwrap();
        let out = db
            .execute_command(&SqlCommand::Select {
                table: Table::Favorites,
                columns: vec!["path".to_string()],
            })
            .unwrap();
        assert_eq!(out, CommandOutput::Rows(vec![vec![json!(tricky)]]));
    }
}
