//! SQLite implementation of the store contracts.
//!
//! Source tables are scanned in `rowid` order with keyset pagination, so a
//! scan never holds a statement open between chunks. Fact appends run in one
//! transaction per frame; a failed append leaves the table as it was.

use std::borrow::Cow;
use std::path::Path;

use chrono::NaiveDateTime;
use polars::prelude::{AnyValue, Column, DataFrame, DataType, NamedFrom, Series, TimeUnit};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::{debug, info};

use cms_common::{
    any_to_datetime, date_from_epoch_days, epoch_days, epoch_millis, format_date, parse_date,
    parse_datetime, parse_f64,
};
use cms_model::{
    DeclaredType, FactTableTemplate, NewUpload, SourceColumn, StarSettings, UploadRecord,
    UploadStatus,
};

use crate::error::{Result, StoreError};
use crate::store::{
    FactStore, IdentityRow, IdentityStore, QualifiedTable, RangeScan, SourceStore, StatusStore,
};

/// A single SQLite connection holding the star schema, optionally with the
/// source schema attached.
pub struct SqliteStore {
    conn: Connection,
    star: StarSettings,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, star: StarSettings) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened sqlite store");
        Ok(Self { conn, star })
    }

    pub fn open_in_memory(star: StarSettings) -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            star,
        })
    }

    /// Attaches another database file under `alias`.
    pub fn attach(&self, alias: &str, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_string_lossy().into_owned();
        self.conn.execute(
            &format!("ATTACH DATABASE ?1 AS {}", quote_ident(alias)),
            [path.as_str()],
        )?;
        debug!(alias, path, "attached database");
        Ok(())
    }

    /// The raw connection, for fixtures and ad hoc inspection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn star(&self) -> &StarSettings {
        &self.star
    }

    /// Creates the upload status and identity mapping tables when missing.
    pub fn init_star_schema(&self) -> Result<()> {
        let upload = qualified(&self.star_table(&self.star.upload_table));
        let pmap = qualified(&self.star_table(&self.star.patient_mapping));
        let emap = qualified(&self.star_table(&self.star.encounter_mapping));
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {upload} (
                upload_id INTEGER PRIMARY KEY AUTOINCREMENT,
                upload_label VARCHAR NOT NULL,
                user_id VARCHAR NOT NULL,
                source_cd VARCHAR NOT NULL,
                no_of_record INTEGER,
                loaded_record INTEGER,
                deleted_record INTEGER,
                load_date TIMESTAMP NOT NULL,
                end_date TIMESTAMP,
                load_status VARCHAR,
                message TEXT,
                input_file_name TEXT,
                log_file_name TEXT,
                transform_name VARCHAR
            );
            CREATE TABLE IF NOT EXISTS {pmap} (
                patient_ide VARCHAR NOT NULL,
                patient_ide_source VARCHAR NOT NULL,
                patient_num INTEGER NOT NULL,
                patient_ide_status VARCHAR,
                project_id VARCHAR,
                upload_id INTEGER,
                PRIMARY KEY (patient_ide, patient_ide_source)
            );
            CREATE TABLE IF NOT EXISTS {emap} (
                encounter_ide VARCHAR NOT NULL,
                encounter_ide_source VARCHAR NOT NULL,
                project_id VARCHAR,
                encounter_num INTEGER NOT NULL,
                patient_ide VARCHAR NOT NULL,
                patient_ide_source VARCHAR NOT NULL,
                encounter_ide_status VARCHAR,
                upload_id INTEGER,
                PRIMARY KEY (encounter_ide, encounter_ide_source)
            );"
        ))?;
        Ok(())
    }

    pub fn star_table(&self, name: &str) -> QualifiedTable {
        QualifiedTable::new(self.star.schema.clone(), name)
    }

    fn upload_table(&self) -> String {
        qualified(&self.star_table(&self.star.upload_table))
    }
}

/// Quotes an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(table: &QualifiedTable) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name))
}

fn scan_sql(scan: &RangeScan, columns: &[SourceColumn]) -> String {
    let selected: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
    format!(
        "SELECT rowid, {} FROM {} \
         WHERE CAST({} AS INTEGER) BETWEEN ?1 AND ?2 AND rowid > ?3 \
         ORDER BY rowid LIMIT ?4",
        selected.join(", "),
        qualified(&scan.table),
        quote_ident(&scan.bene_id_column),
    )
}

impl SourceStore for SqliteStore {
    fn table_columns(&self, table: &QualifiedTable) -> Result<Vec<SourceColumn>> {
        let sql = format!(
            "PRAGMA {}.table_info({})",
            quote_ident(&table.schema),
            quote_ident(&table.name)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let type_name: String = row.get(2)?;
                Ok(SourceColumn::new(name, DeclaredType::from_sql(&type_name)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        if columns.is_empty() {
            return Err(StoreError::MissingTable(table.to_string()));
        }
        Ok(columns)
    }

    fn explain_scan(&self, scan: &RangeScan, columns: &[SourceColumn]) -> Result<Vec<String>> {
        let sql = format!("EXPLAIN QUERY PLAN {}", scan_sql(scan, columns));
        let mut stmt = self.conn.prepare(&sql)?;
        let lines = stmt
            .query_map(
                params![scan.range.first, scan.range.last, i64::MIN, 1_i64],
                |row| row.get::<_, String>(3),
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(lines)
    }

    fn next_chunk(
        &self,
        scan: &mut RangeScan,
        columns: &[SourceColumn],
        limit: usize,
    ) -> Result<Option<DataFrame>> {
        if scan.exhausted {
            return Ok(None);
        }
        let sql = scan_sql(scan, columns);
        let mut stmt = self.conn.prepare(&sql)?;
        let first = scan.range.first;
        let last = scan.range.last;
        let after = scan.position.unwrap_or(i64::MIN);
        let sql_limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = stmt.query(params![first, last, after, sql_limit])?;

        let mut buffers: Vec<ColumnBuffer> = columns.iter().map(ColumnBuffer::for_column).collect();
        let mut fetched = 0_usize;
        while let Some(row) = rows.next()? {
            let rowid: i64 = row.get(0)?;
            for (idx, (buffer, column)) in buffers.iter_mut().zip(columns).enumerate() {
                buffer.push(&column.name, row.get_ref(idx + 1)?)?;
            }
            scan.position = Some(rowid);
            fetched += 1;
        }

        if fetched < limit {
            scan.exhausted = true;
        }
        if fetched == 0 {
            return Ok(None);
        }

        let frame_columns = buffers
            .into_iter()
            .zip(columns)
            .map(|(buffer, column)| buffer.into_column(&column.name))
            .collect::<Result<Vec<Column>>>()?;
        debug!(table = %scan.table, rows = fetched, "fetched source chunk");
        Ok(Some(DataFrame::new(frame_columns)?))
    }
}

impl IdentityStore for SqliteStore {
    fn patient_mapping(
        &self,
        ide_source: &str,
        bene_id_first: &str,
        bene_id_last: &str,
    ) -> Result<Vec<IdentityRow>> {
        let sql = format!(
            "SELECT patient_ide, patient_num FROM {} \
             WHERE patient_ide_source = ?1 AND patient_ide BETWEEN ?2 AND ?3",
            qualified(&self.star_table(&self.star.patient_mapping))
        );
        self.identity_rows(&sql, ide_source, bene_id_first, bene_id_last)
    }

    fn encounter_mapping(
        &self,
        ide_source: &str,
        bene_id_first: &str,
        bene_id_last: &str,
    ) -> Result<Vec<IdentityRow>> {
        let sql = format!(
            "SELECT encounter_ide, encounter_num FROM {} \
             WHERE encounter_ide_source = ?1 AND patient_ide BETWEEN ?2 AND ?3",
            qualified(&self.star_table(&self.star.encounter_mapping))
        );
        self.identity_rows(&sql, ide_source, bene_id_first, bene_id_last)
    }
}

impl SqliteStore {
    fn identity_rows(
        &self,
        sql: &str,
        ide_source: &str,
        first: &str,
        last: &str,
    ) -> Result<Vec<IdentityRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params![ide_source, first, last], |row| {
                Ok(IdentityRow {
                    source_id: row.get(0)?,
                    warehouse_id: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl FactStore for SqliteStore {
    fn current_timestamp(&self) -> Result<NaiveDateTime> {
        let now: String = self
            .conn
            .query_row("SELECT CURRENT_TIMESTAMP", [], |row| row.get(0))?;
        parse_datetime(&now).ok_or_else(|| StoreError::invalid("CURRENT_TIMESTAMP", now))
    }

    fn create_fact_table(
        &self,
        table: &QualifiedTable,
        template: &FactTableTemplate,
    ) -> Result<()> {
        let columns: Vec<String> = template
            .columns
            .iter()
            .map(|c| {
                let not_null = if c.nullable { "" } else { " NOT NULL" };
                format!("{} {}{not_null}", quote_ident(&c.name), c.sql_type.as_sql())
            })
            .collect();
        self.conn.execute_batch(&format!(
            "CREATE TABLE {} ({})",
            qualified(table),
            columns.join(", ")
        ))?;
        info!(table = %table, columns = columns.len(), "created fact table");
        Ok(())
    }

    fn append_frame(&self, table: &QualifiedTable, frame: &DataFrame) -> Result<usize> {
        let table_columns = self.table_columns(table)?;
        let frame_columns = frame.get_columns();
        for column in frame_columns {
            let name = column.name().as_str();
            if !table_columns.iter().any(|c| c.name == name) {
                return Err(StoreError::SchemaMismatch {
                    table: table.to_string(),
                    message: format!("no column named {name}"),
                });
            }
        }
        if frame.height() == 0 {
            return Ok(0);
        }

        let names: Vec<String> = frame_columns
            .iter()
            .map(|c| quote_ident(c.name().as_str()))
            .collect();
        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            qualified(table),
            names.join(", "),
            placeholders.join(", ")
        );

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            let mut values: Vec<Value> = Vec::with_capacity(frame_columns.len());
            for row in 0..frame.height() {
                values.clear();
                for column in frame_columns {
                    values.push(sql_value(column.name().as_str(), column.get(row)?)?);
                }
                stmt.execute(params_from_iter(values.iter()))?;
            }
        }
        tx.commit()?;
        Ok(frame.height())
    }

    fn row_count(&self, table: &QualifiedTable) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", qualified(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

impl StatusStore for SqliteStore {
    fn insert_upload(&self, upload: &NewUpload) -> Result<i64> {
        let sql = format!(
            "INSERT INTO {} (upload_label, user_id, source_cd, load_date, transform_name, load_status) \
             VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP, ?4, ?5)",
            self.upload_table()
        );
        self.conn.execute(
            &sql,
            params![
                upload.upload_label,
                upload.user_id,
                upload.source_cd,
                upload.transform_name,
                UploadStatus::Created.as_str(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_progress(&self, upload_id: i64, loaded_record: i64, message: &str) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET loaded_record = ?1, message = ?2, load_status = ?3 WHERE upload_id = ?4",
            self.upload_table()
        );
        let updated = self.conn.execute(
            &sql,
            params![
                loaded_record,
                message,
                UploadStatus::Running.as_str(),
                upload_id
            ],
        )?;
        if updated != 1 {
            return Err(StoreError::invalid("upload_id", upload_id.to_string()));
        }
        Ok(())
    }

    fn set_status(
        &self,
        upload_id: i64,
        status: UploadStatus,
        message: Option<&str>,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET load_status = ?1, message = COALESCE(?2, message), \
             end_date = CASE WHEN ?3 THEN CURRENT_TIMESTAMP ELSE end_date END \
             WHERE upload_id = ?4",
            self.upload_table()
        );
        let updated = self.conn.execute(
            &sql,
            params![status.as_str(), message, status.is_terminal(), upload_id],
        )?;
        if updated != 1 {
            return Err(StoreError::invalid("upload_id", upload_id.to_string()));
        }
        Ok(())
    }

    fn upload(&self, upload_id: i64) -> Result<Option<UploadRecord>> {
        let sql = format!(
            "SELECT upload_id, upload_label, user_id, source_cd, load_date, transform_name, \
             loaded_record, message, load_status FROM {} WHERE upload_id = ?1",
            self.upload_table()
        );
        let raw = self
            .conn
            .query_row(&sql, [upload_id], |row| {
                Ok((
                    UploadRecord {
                        upload_id: row.get(0)?,
                        upload_label: row.get(1)?,
                        user_id: row.get(2)?,
                        source_cd: row.get(3)?,
                        load_date: None,
                        transform_name: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                        loaded_record: row.get(6)?,
                        message: row.get(7)?,
                        load_status: UploadStatus::Created,
                    },
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(8)?,
                ))
            })
            .optional()?;

        let Some((mut record, load_date, load_status)) = raw else {
            return Ok(None);
        };
        record.load_date = load_date.as_deref().and_then(parse_datetime);
        if let Some(status) = load_status {
            record.load_status = status.parse()?;
        }
        Ok(Some(record))
    }
}

/// Accumulates one source column while rows stream in.
enum ColumnBuffer {
    Numeric(Vec<Option<f64>>),
    Date(Vec<Option<i32>>),
    Timestamp(Vec<Option<i64>>),
    Text(Vec<Option<String>>),
}

impl ColumnBuffer {
    fn for_column(column: &SourceColumn) -> Self {
        match column.declared_type {
            DeclaredType::Numeric => Self::Numeric(Vec::new()),
            DeclaredType::Date => Self::Date(Vec::new()),
            DeclaredType::Timestamp => Self::Timestamp(Vec::new()),
            DeclaredType::String { .. } | DeclaredType::Other(_) => Self::Text(Vec::new()),
        }
    }

    fn push(&mut self, column: &str, value: ValueRef<'_>) -> Result<()> {
        match self {
            Self::Numeric(values) => {
                let parsed = match value {
                    ValueRef::Null => None,
                    ValueRef::Integer(i) => Some(i as f64),
                    ValueRef::Real(f) => Some(f),
                    ValueRef::Text(_) | ValueRef::Blob(_) => match non_empty_text(value) {
                        None => None,
                        Some(text) => Some(
                            parse_f64(&text).ok_or_else(|| StoreError::invalid(column, text))?,
                        ),
                    },
                };
                values.push(parsed);
            }
            Self::Date(values) => {
                let parsed = match non_empty_text(value) {
                    None => None,
                    Some(text) => Some(
                        parse_date(&text)
                            .map(epoch_days)
                            .ok_or_else(|| StoreError::invalid(column, text))?,
                    ),
                };
                values.push(parsed);
            }
            Self::Timestamp(values) => {
                let parsed = match non_empty_text(value) {
                    None => None,
                    Some(text) => Some(
                        parse_datetime(&text)
                            .map(epoch_millis)
                            .ok_or_else(|| StoreError::invalid(column, text))?,
                    ),
                };
                values.push(parsed);
            }
            Self::Text(values) => values.push(match value {
                ValueRef::Null => None,
                ValueRef::Integer(i) => Some(i.to_string()),
                ValueRef::Real(f) => Some(f.to_string()),
                ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                    Some(String::from_utf8_lossy(bytes).into_owned())
                }
            }),
        }
        Ok(())
    }

    fn into_column(self, name: &str) -> Result<Column> {
        let series = match self {
            Self::Numeric(values) => Series::new(name.into(), values),
            Self::Date(values) => Series::new(name.into(), values).cast(&DataType::Date)?,
            Self::Timestamp(values) => Series::new(name.into(), values)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
            Self::Text(values) => Series::new(name.into(), values),
        };
        Ok(series.into())
    }
}

/// Text form of a cell for typed columns; empty strings count as null.
fn non_empty_text(value: ValueRef<'_>) -> Option<String> {
    let text: Cow<'_, str> = match value {
        ValueRef::Null => return None,
        ValueRef::Integer(i) => Cow::Owned(i.to_string()),
        ValueRef::Real(f) => Cow::Owned(f.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes),
    };
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Converts a frame cell to a SQLite value.
fn sql_value(column: &str, value: AnyValue<'_>) -> Result<Value> {
    Ok(match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Integer(i64::from(b)),
        AnyValue::Int8(v) => Value::Integer(i64::from(v)),
        AnyValue::Int16(v) => Value::Integer(i64::from(v)),
        AnyValue::Int32(v) => Value::Integer(i64::from(v)),
        AnyValue::Int64(v) => Value::Integer(v),
        AnyValue::UInt8(v) => Value::Integer(i64::from(v)),
        AnyValue::UInt16(v) => Value::Integer(i64::from(v)),
        AnyValue::UInt32(v) => Value::Integer(i64::from(v)),
        AnyValue::UInt64(v) => Value::Integer(
            i64::try_from(v).map_err(|_| StoreError::invalid(column, v.to_string()))?,
        ),
        AnyValue::Float32(v) => Value::Real(f64::from(v)),
        AnyValue::Float64(v) => Value::Real(v),
        AnyValue::String(s) => Value::Text(s.to_string()),
        AnyValue::StringOwned(s) => Value::Text(s.to_string()),
        AnyValue::Date(days) => Value::Text(
            date_from_epoch_days(days)
                .map(format_date)
                .ok_or_else(|| StoreError::invalid(column, days.to_string()))?,
        ),
        other => match any_to_datetime(other.clone()) {
            Some(ts) => Value::Text(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            None => return Err(StoreError::invalid(column, other.to_string())),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("bene_id"), "\"bene_id\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }

    #[test]
    fn sql_value_renders_dates_as_text() {
        let days = epoch_days(chrono::NaiveDate::from_ymd_opt(2015, 3, 9).unwrap());
        assert_eq!(
            sql_value("start_date", AnyValue::Date(days)).unwrap(),
            Value::Text("2015-03-09".to_string())
        );
        assert_eq!(sql_value("x", AnyValue::Null).unwrap(), Value::Null);
        assert_eq!(sql_value("n", AnyValue::Int64(7)).unwrap(), Value::Integer(7));
    }
}
