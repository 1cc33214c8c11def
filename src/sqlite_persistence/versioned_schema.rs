use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OpenFlags};
use std::path::Path;
use tracing::{debug, info};

pub const DEFAULT_TIMESTAMP: &str = "(cast(strftime('%s','now') as int))";

/// Offset added to every schema version before it is written to `PRAGMA user_version`,
/// so that databases not created by this crate are rejected instead of migrated.
pub const BASE_DB_VERSION: usize = 99999;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                is_unique: false,
                default_value: None,
                foreign_key: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Blob,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Blob => "BLOB",
        }
    }

    fn from_sql(declared: &str) -> Option<&'static SqlType> {
        match declared {
            "TEXT" => Some(&SqlType::Text),
            "INTEGER" => Some(&SqlType::Integer),
            "REAL" => Some(&SqlType::Real),
            "BLOB" => Some(&SqlType::Blob),
            _ => None,
        }
    }
}

#[allow(unused)]
pub enum ForeignKeyOnChange {
    NoAction,
    Restrict,
    SetNull,
    SetDefault,
    Cascade,
}

impl ForeignKeyOnChange {
    fn as_sql(&self) -> &'static str {
        match self {
            ForeignKeyOnChange::NoAction => "NO ACTION",
            ForeignKeyOnChange::Restrict => "RESTRICT",
            ForeignKeyOnChange::SetNull => "SET NULL",
            ForeignKeyOnChange::SetDefault => "SET DEFAULT",
            ForeignKeyOnChange::Cascade => "CASCADE",
        }
    }
}

pub struct ForeignKey {
    pub foreign_table: &'static str,
    pub foreign_column: &'static str,
    pub on_delete: ForeignKeyOnChange,
}

#[derive(Clone, Copy)]
pub struct Column<'a> {
    pub name: &'static str,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub is_unique: bool,
    pub default_value: Option<&'static str>,
    pub foreign_key: Option<&'a ForeignKey>,
}

impl Column<'_> {
    /// The column clause as it appears inside `CREATE TABLE` or after `ADD COLUMN`.
    fn definition_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type.as_sql());
        if self.is_primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.non_null {
            sql.push_str(" NOT NULL");
        }
        if self.is_unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default_value) = self.default_value {
            sql.push_str(&format!(" DEFAULT {}", default_value));
        }
        if let Some(fk) = self.foreign_key {
            sql.push_str(&format!(
                " REFERENCES {}({}) ON DELETE {}",
                fk.foreign_table,
                fk.foreign_column,
                fk.on_delete.as_sql()
            ));
        }
        sql
    }
}

/// Column as reported back by `PRAGMA table_info`.
struct ObservedColumn {
    name: String,
    sql_type: String,
    non_null: bool,
    default_value: Option<String>,
    is_primary_key: bool,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static>],
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let mut clauses: Vec<String> = self.columns.iter().map(|c| c.definition_sql()).collect();
        for unique_constraint in self.unique_constraints {
            clauses.push(format!("UNIQUE ({})", unique_constraint.join(", ")));
        }
        let create_sql = format!("CREATE TABLE {} ({});", self.name, clauses.join(", "));
        conn.execute(&create_sql, params![])
            .with_context(|| format!("Failed to create table {}", self.name))?;

        for (index_name, column_name) in self.indices {
            conn.execute(
                &format!("CREATE INDEX {} ON {}({});", index_name, self.name, column_name),
                params![],
            )?;
        }
        Ok(())
    }

    /// Appends one of this table's declared columns to an existing table.
    pub fn add_column(&self, conn: &Connection, column_name: &str) -> Result<()> {
        let Some(column) = self.columns.iter().find(|c| c.name == column_name) else {
            bail!("Table {} declares no column {}", self.name, column_name);
        };
        conn.execute(
            &format!(
                "ALTER TABLE {} ADD COLUMN {}",
                self.name,
                column.definition_sql()
            ),
            params![],
        )?;
        Ok(())
    }

    fn observed_columns(&self, conn: &Connection) -> Result<Vec<ObservedColumn>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let columns = stmt
            .query_map(params![], |row| {
                Ok(ObservedColumn {
                    name: row.get(1)?,
                    sql_type: row.get(2)?,
                    non_null: row.get::<_, i32>(3)? == 1,
                    default_value: row.get(4)?,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    fn validate_columns(&self, conn: &Connection) -> Result<()> {
        let observed = self.observed_columns(conn)?;
        if observed.is_empty() {
            bail!("Table {} does not exist", self.name);
        }
        if observed.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}. Found: {}, expected: {}",
                self.name,
                observed.len(),
                self.columns.len(),
                observed
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                self.columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (actual, expected) in observed.iter().zip(self.columns.iter()) {
            if actual.name != expected.name {
                bail!(
                    "Table {} column name mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    actual.name
                );
            }
            match SqlType::from_sql(&actual.sql_type) {
                Some(t) if t == expected.sql_type => {}
                _ => bail!(
                    "Table {} column {} type mismatch: expected {:?}, got {}",
                    self.name,
                    expected.name,
                    expected.sql_type,
                    actual.sql_type
                ),
            }
            if actual.non_null != expected.non_null {
                bail!(
                    "Table {} column {} non-null mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.non_null,
                    actual.non_null
                );
            }
            // SQLite may report defaults wrapped in an extra pair of parentheses.
            let actual_default = actual.default_value.as_deref().map(unwrap_parentheses);
            let expected_default = expected.default_value.map(unwrap_parentheses);
            if actual_default != expected_default {
                bail!(
                    "Table {} column {} default value mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected.name,
                    expected.default_value,
                    actual.default_value
                );
            }
            if actual.is_primary_key != expected.is_primary_key {
                bail!(
                    "Table {} column {} primary key mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.is_primary_key,
                    actual.is_primary_key
                );
            }
        }
        Ok(())
    }

    fn validate_indices(&self, conn: &Connection) -> Result<()> {
        for (index_name, _) in self.indices {
            let exists = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    params![index_name, self.name],
                    |_| Ok(()),
                )
                .is_ok();
            if !exists {
                bail!("Table {} is missing index '{}'", self.name, index_name);
            }
        }
        Ok(())
    }

    fn validate_unique_constraints(&self, conn: &Connection) -> Result<()> {
        if self.unique_constraints.is_empty() {
            return Ok(());
        }
        let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", self.name))?;
        let unique_indices: Vec<String> = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i32>(2)?)))?
            .filter_map(|r| r.ok())
            .filter(|(_, unique)| *unique == 1)
            .map(|(name, _)| name)
            .collect();

        let mut covered: Vec<Vec<String>> = Vec::with_capacity(unique_indices.len());
        for index_name in &unique_indices {
            let mut info = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
            let mut columns: Vec<String> = info
                .query_map([], |row| row.get::<_, String>(2))?
                .filter_map(|r| r.ok())
                .collect();
            columns.sort();
            covered.push(columns);
        }

        for expected in self.unique_constraints {
            let mut wanted: Vec<&str> = expected.to_vec();
            wanted.sort();
            let present = covered
                .iter()
                .any(|cols| cols.iter().map(String::as_str).eq(wanted.iter().copied()));
            if !present {
                bail!(
                    "Table {} is missing unique constraint on columns ({})",
                    self.name,
                    expected.join(", ")
                );
            }
        }
        Ok(())
    }

    fn validate_foreign_keys(&self, conn: &Connection) -> Result<()> {
        // columns: id, seq, table, from, to, on_update, on_delete, match
        let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_list({})", self.name))?;
        let observed: Vec<(String, String, String, String)> = stmt
            .query_map([], |row| Ok((row.get(3)?, row.get(2)?, row.get(4)?, row.get(6)?)))?
            .filter_map(|r| r.ok())
            .collect();

        for column in self.columns {
            let Some(fk) = column.foreign_key else {
                continue;
            };
            let on_delete = fk.on_delete.as_sql();
            let matching = observed.iter().find(|(from, ..)| from == column.name);
            match matching {
                Some((_, table, to, action))
                    if table == fk.foreign_table
                        && to == fk.foreign_column
                        && action == on_delete => {}
                Some((_, table, to, action)) => bail!(
                    "Table {} column {} has foreign key mismatch: expected REFERENCES {}({}) ON DELETE {}, got REFERENCES {}({}) ON DELETE {}",
                    self.name,
                    column.name,
                    fk.foreign_table,
                    fk.foreign_column,
                    on_delete,
                    table,
                    to,
                    action
                ),
                None => bail!(
                    "Table {} column {} is missing foreign key: expected REFERENCES {}({}) ON DELETE {}",
                    self.name,
                    column.name,
                    fk.foreign_table,
                    fk.foreign_column,
                    on_delete
                ),
            }
        }
        Ok(())
    }
}

fn unwrap_parentheses(s: &str) -> &str {
    s.strip_prefix('(')
        .and_then(|inner| inner.strip_suffix(')'))
        .unwrap_or(s)
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute("PRAGMA foreign_keys = ON;", params![])?;
        for table in self.tables {
            table.create(conn)?;
        }
        write_user_version(conn, self.version)
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate_columns(conn)?;
            table.validate_indices(conn)?;
            table.validate_unique_constraints(conn)?;
            table.validate_foreign_keys(conn)?;
        }
        Ok(())
    }
}

fn write_user_version(conn: &Connection, version: usize) -> Result<()> {
    conn.execute(
        &format!("PRAGMA user_version = {}", BASE_DB_VERSION + version),
        [],
    )?;
    Ok(())
}

/// Reads the schema version stored in the database, relative to [`BASE_DB_VERSION`].
pub fn read_schema_version(conn: &Connection) -> Result<usize> {
    let raw = conn
        .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
        .context("Failed to read database version")?;
    let relative = raw - BASE_DB_VERSION as i64;
    if relative < 0 {
        bail!(
            "Database version {} is too old, does not contain base db version {}",
            raw,
            BASE_DB_VERSION
        );
    }
    Ok(relative as usize)
}

/// Opens (or creates) a database and brings it to the latest schema in `schemas`.
///
/// A new file gets the latest schema directly. An existing file is validated against the
/// schema its version claims, then every later migration runs in order.
pub fn open_versioned<P: AsRef<Path>>(
    db_path: P,
    schemas: &'static [VersionedSchema],
) -> Result<Connection> {
    let latest = schemas.last().context("No schema versions declared")?;
    let db_path = db_path.as_ref();

    let conn = if db_path.exists() {
        Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open database {}", db_path.display()))?
    } else {
        debug!("Creating new database at {}", db_path.display());
        let conn = Connection::open(db_path)?;
        latest.create(&conn)?;
        conn
    };
    conn.execute("PRAGMA foreign_keys = ON;", params![])?;

    let version = read_schema_version(&conn)?;
    let Some(current) = schemas.get(version) else {
        bail!("Database version {} is too new", version);
    };
    current.validate(&conn)?;
    migrate_from(&conn, schemas, version)?;
    Ok(conn)
}

fn migrate_from(conn: &Connection, schemas: &[VersionedSchema], version: usize) -> Result<()> {
    let mut reached = version;
    for schema in schemas.iter().skip(version + 1) {
        if let Some(migration) = schema.migration {
            info!("Migrating db from version {} to {}", reached, schema.version);
            migration(conn)
                .with_context(|| format!("Migration to version {} failed", schema.version))?;
        }
        reached = schema.version;
    }
    if reached != version {
        write_user_version(conn, reached)?;
        schemas[reached].validate(conn)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_column;
    use tempfile::TempDir;

    const BAND_FK: ForeignKey = ForeignKey {
        foreign_table: "band",
        foreign_column: "id",
        on_delete: ForeignKeyOnChange::Cascade,
    };

    const BAND_TABLE: Table = Table {
        name: "band",
        columns: &[
            sqlite_column!("id", &SqlType::Text, is_primary_key = true),
            sqlite_column!("name", &SqlType::Text, non_null = true),
        ],
        indices: &[("idx_band_name", "name")],
        unique_constraints: &[],
    };

    const GIG_TABLE_V_0: Table = Table {
        name: "gig",
        columns: &[
            sqlite_column!("id", &SqlType::Text, is_primary_key = true),
            sqlite_column!(
                "band_id",
                &SqlType::Text,
                non_null = true,
                foreign_key = Some(&BAND_FK)
            ),
            sqlite_column!("venue", &SqlType::Text, non_null = true),
        ],
        indices: &[],
        unique_constraints: &[&["band_id", "venue"]],
    };

    const GIG_TABLE_V_1: Table = Table {
        name: "gig",
        columns: &[
            sqlite_column!("id", &SqlType::Text, is_primary_key = true),
            sqlite_column!(
                "band_id",
                &SqlType::Text,
                non_null = true,
                foreign_key = Some(&BAND_FK)
            ),
            sqlite_column!("venue", &SqlType::Text, non_null = true),
            sqlite_column!("capacity", &SqlType::Integer),
        ],
        indices: &[],
        unique_constraints: &[&["band_id", "venue"]],
    };

    const SCHEMAS: &[VersionedSchema] = &[
        VersionedSchema {
            version: 0,
            tables: &[BAND_TABLE, GIG_TABLE_V_0],
            migration: None,
        },
        VersionedSchema {
            version: 1,
            tables: &[BAND_TABLE, GIG_TABLE_V_1],
            migration: Some(|conn: &Connection| GIG_TABLE_V_1.add_column(conn, "capacity")),
        },
    ];

    #[test]
    fn created_schema_validates() {
        let conn = Connection::open_in_memory().unwrap();
        SCHEMAS[1].create(&conn).unwrap();
        SCHEMAS[1].validate(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn detects_missing_index() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE band (id TEXT PRIMARY KEY, name TEXT NOT NULL)", [])
            .unwrap();
        let err = BAND_TABLE.validate_indices(&conn).unwrap_err().to_string();
        assert!(err.contains("missing index"));
        assert!(err.contains("idx_band_name"));
    }

    #[test]
    fn detects_missing_unique_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE band (id TEXT PRIMARY KEY, name TEXT NOT NULL)", [])
            .unwrap();
        conn.execute(
            "CREATE TABLE gig (id TEXT PRIMARY KEY, band_id TEXT NOT NULL REFERENCES band(id) ON DELETE CASCADE, venue TEXT NOT NULL)",
            [],
        )
        .unwrap();
        let err = GIG_TABLE_V_0
            .validate_unique_constraints(&conn)
            .unwrap_err()
            .to_string();
        assert!(err.contains("missing unique constraint"));
        assert!(err.contains("band_id, venue"));
    }

    #[test]
    fn detects_wrong_on_delete_action() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE band (id TEXT PRIMARY KEY, name TEXT NOT NULL)", [])
            .unwrap();
        conn.execute(
            "CREATE TABLE gig (id TEXT PRIMARY KEY, band_id TEXT NOT NULL REFERENCES band(id) ON DELETE SET NULL, venue TEXT NOT NULL, UNIQUE (venue, band_id))",
            [],
        )
        .unwrap();
        GIG_TABLE_V_0.validate_unique_constraints(&conn).unwrap();
        let err = GIG_TABLE_V_0
            .validate_foreign_keys(&conn)
            .unwrap_err()
            .to_string();
        assert!(err.contains("foreign key mismatch"));
        assert!(err.contains("SET NULL"));
    }

    #[test]
    fn detects_extra_column() {
        let conn = Connection::open_in_memory().unwrap();
        SCHEMAS[1].create(&conn).unwrap();
        let err = SCHEMAS[0].validate(&conn).unwrap_err().to_string();
        assert!(err.contains("has 4 columns, expected 3"));
    }

    #[test]
    fn open_versioned_migrates_old_database() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("gigs.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            SCHEMAS[0].create(&conn).unwrap();
            conn.execute("INSERT INTO band (id, name) VALUES ('b1', 'The Band')", [])
                .unwrap();
            conn.execute(
                "INSERT INTO gig (id, band_id, venue) VALUES ('g1', 'b1', 'Hall')",
                [],
            )
            .unwrap();
        }

        let conn = open_versioned(&db_path, SCHEMAS).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), 1);
        let capacity: Option<i64> = conn
            .query_row("SELECT capacity FROM gig WHERE id = 'g1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(capacity, None);
    }

    #[test]
    fn open_versioned_rejects_foreign_database() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("other.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute("CREATE TABLE unrelated (x INTEGER)", []).unwrap();
        }
        let err = open_versioned(&db_path, SCHEMAS).unwrap_err().to_string();
        assert!(err.contains("too old"));
    }
}
