//! Database export
//!
//! Dumps either one table (CSV) or the whole database (one XLSX workbook
//! with one sheet per table). Columns and value types are discovered at
//! runtime from the sqlite catalog, so schema additions show up in exports
//! without code changes.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rust_xlsxwriter::Workbook;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::info;

/// One decoded table cell, typed by its runtime sqlite storage class.
enum Cell {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl Cell {
    fn csv_field(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Int(v) => v.to_string(),
            Self::Real(v) => v.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

pub struct Exporter {
    pool: Arc<SqlitePool>,
    export_dir: PathBuf,
}

impl Exporter {
    pub fn new(pool: Arc<SqlitePool>, export_dir: PathBuf) -> Self {
        Self { pool, export_dir }
    }

    /// User tables in the database, sorted by name.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&*self.pool)
        .await
        .context("failed to list database tables")
    }

    /// Export a single table to `<export_dir>/<name>.csv`.
    pub async fn export_table(&self, table: &str, name: &str) -> Result<PathBuf> {
        let tables = self.list_tables().await?;
        if !tables.iter().any(|t| t == table) {
            bail!("unknown table: {table}");
        }

        std::fs::create_dir_all(&self.export_dir)
            .with_context(|| format!("failed to create {}", self.export_dir.display()))?;
        let path = self.export_dir.join(format!("{name}.csv"));

        let (columns, rows) = self.read_table(table).await?;
        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        writer.write_record(&columns)?;
        for row in &rows {
            writer.write_record(row.iter().map(Cell::csv_field))?;
        }
        writer.flush().context("failed to flush CSV writer")?;

        info!("Exported table {table} to {}", path.display());
        Ok(path)
    }

    /// Export every user table into one workbook at
    /// `<export_dir>/<name>.xlsx`, one sheet per table.
    pub async fn export_all(&self, name: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.export_dir)
            .with_context(|| format!("failed to create {}", self.export_dir.display()))?;
        let path = self.export_dir.join(format!("{name}.xlsx"));

        let mut workbook = Workbook::new();
        let tables = self.list_tables().await?;
        for table in &tables {
            let (columns, rows) = self.read_table(table).await?;
            let sheet = workbook.add_worksheet();
            sheet
                .set_name(table.as_str())
                .with_context(|| format!("invalid sheet name {table}"))?;

            for (col, column_name) in columns.iter().enumerate() {
                sheet.write_string(0, u16::try_from(col)?, column_name.as_str())?;
            }
            for (row_index, row) in rows.iter().enumerate() {
                let xlsx_row = u32::try_from(row_index + 1)?;
                for (col, cell) in row.iter().enumerate() {
                    let xlsx_col = u16::try_from(col)?;
                    match cell {
                        Cell::Null => {}
                        Cell::Int(v) => {
                            sheet.write_number(xlsx_row, xlsx_col, *v as f64)?;
                        }
                        Cell::Real(v) => {
                            sheet.write_number(xlsx_row, xlsx_col, *v)?;
                        }
                        Cell::Text(s) => {
                            sheet.write_string(xlsx_row, xlsx_col, s.as_str())?;
                        }
                    }
                }
            }
        }
        workbook
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;

        info!("Exported {} tables to {}", tables.len(), path.display());
        Ok(path)
    }

    /// Read a full table: column names plus decoded cells.
    async fn read_table(&self, table: &str) -> Result<(Vec<String>, Vec<Vec<Cell>>)> {
        // Table names are validated against the catalog by the callers.
        let rows = sqlx::query(&format!("SELECT * FROM {table}"))
            .fetch_all(&*self.pool)
            .await
            .with_context(|| format!("failed to read table {table}"))?;

        let columns: Vec<String> = match rows.first() {
            Some(first) => first.columns().iter().map(|c| c.name().to_string()).collect(),
            None => {
                sqlx::query_scalar(&format!("SELECT name FROM pragma_table_info('{table}')"))
                    .fetch_all(&*self.pool)
                    .await
                    .with_context(|| format!("failed to read columns of {table}"))?
            }
        };

        let data = rows
            .iter()
            .map(|row| (0..columns.len()).map(|index| decode_cell(row, index)).collect())
            .collect();
        Ok((columns, data))
    }
}

/// Decode one cell using the value's runtime sqlite type.
fn decode_cell(row: &SqliteRow, index: usize) -> Cell {
    let Ok(raw) = row.try_get_raw(index) else {
        return Cell::Null;
    };
    if raw.is_null() {
        return Cell::Null;
    }

    match raw.type_info().name() {
        "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(index).map_or(Cell::Null, Cell::Int),
        "REAL" => row.try_get::<f64, _>(index).map_or(Cell::Null, Cell::Real),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map_or(Cell::Null, |v| Cell::Text(format!("<{} bytes>", v.len()))),
        _ => row.try_get::<String, _>(index).map_or(Cell::Null, Cell::Text),
    }
}
