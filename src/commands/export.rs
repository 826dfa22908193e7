use std::fs::File;
use std::io::{self, Write};

use anyhow::{Context, Result, bail};
use indexmap::IndexSet;
use rusqlite::{Connection, params};
use tracing::info;

use super::AppContext;
use crate::cli::{ExportArgs, ExportFormat};
use crate::model::{FILE_COLUMN, PAGE_COLUMN, ResultRow, RunRecord};

const SQLITE_FILE_NAME: &str = "docsnip_results.sqlite";

pub fn run(app: &AppContext, args: ExportArgs) -> Result<()> {
    let Some(record) = app.last_run()? else {
        bail!("nothing to export; run `docsnip process` or `docsnip session load` first");
    };

    match args.format {
        ExportFormat::Tsv => match &args.output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                let mut output = io::BufWriter::new(file);
                write_tsv(&mut output, &record.rows)?;
                output.flush()?;
                info!(path = %path.display(), rows = record.rows.len(), "exported rows as TSV");
            }
            None => {
                let mut output = io::BufWriter::new(io::stdout().lock());
                write_tsv(&mut output, &record.rows)?;
                output.flush()?;
            }
        },
        ExportFormat::Sqlite => {
            let path = args
                .output
                .clone()
                .unwrap_or_else(|| app.workspace.exports.join(SQLITE_FILE_NAME));
            let mut connection = Connection::open(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            let written = write_sqlite(&mut connection, &record)?;
            info!(path = %path.display(), run_id = %record.run_id, rows = written, "exported rows to SQLite");
        }
    }

    Ok(())
}

/// Columns across all rows in first-seen order, `File` and `Page` first.
fn column_order(rows: &[ResultRow]) -> IndexSet<String> {
    let mut columns = IndexSet::new();
    columns.insert(FILE_COLUMN.to_string());
    columns.insert(PAGE_COLUMN.to_string());
    for row in rows {
        for column in row.values.keys() {
            columns.insert(column.clone());
        }
    }
    columns
}

fn tsv_cell(value: &str) -> String {
    value
        .chars()
        .map(|character| match character {
            '\t' | '\n' | '\r' => ' ',
            other => other,
        })
        .collect()
}

pub fn write_tsv<W: Write>(output: &mut W, rows: &[ResultRow]) -> Result<()> {
    let columns = column_order(rows);
    let header = columns
        .iter()
        .map(|column| tsv_cell(column))
        .collect::<Vec<_>>();
    writeln!(output, "{}", header.join("\t"))?;

    for row in rows {
        let cells = columns
            .iter()
            .map(|column| match column.as_str() {
                FILE_COLUMN => tsv_cell(&row.file),
                PAGE_COLUMN => row.page.to_string(),
                other => row.values.get(other).map(|value| tsv_cell(value)).unwrap_or_default(),
            })
            .collect::<Vec<_>>();
        writeln!(output, "{}", cells.join("\t"))?;
    }
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS runs (
              run_id TEXT PRIMARY KEY,
              engine TEXT NOT NULL,
              status TEXT NOT NULL,
              started_at TEXT NOT NULL,
              finished_at TEXT NOT NULL,
              file_count INTEGER NOT NULL,
              row_count INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS results (
              run_id TEXT NOT NULL,
              row_index INTEGER NOT NULL,
              file TEXT NOT NULL,
              page INTEGER NOT NULL,
              column_name TEXT NOT NULL,
              value TEXT NOT NULL,
              PRIMARY KEY(run_id, row_index, column_name),
              FOREIGN KEY(run_id) REFERENCES runs(run_id)
            );
            ",
        )
        .context("failed to create export schema")
}

/// Replaces any earlier export of the same run. Returns the number of rows.
pub fn write_sqlite(connection: &mut Connection, record: &RunRecord) -> Result<usize> {
    ensure_schema(connection)?;
    let tx = connection.transaction()?;

    tx.execute("DELETE FROM results WHERE run_id = ?1", params![&record.run_id])?;
    tx.execute(
        "
        INSERT INTO runs(run_id, engine, status, started_at, finished_at, file_count, row_count)
        VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(run_id) DO UPDATE SET
          engine=excluded.engine,
          status=excluded.status,
          started_at=excluded.started_at,
          finished_at=excluded.finished_at,
          file_count=excluded.file_count,
          row_count=excluded.row_count
        ",
        params![
            &record.run_id,
            &record.engine,
            &record.status,
            &record.started_at,
            &record.finished_at,
            record.file_count as i64,
            record.rows.len() as i64
        ],
    )?;

    {
        let mut statement = tx.prepare(
            "
            INSERT INTO results(run_id, row_index, file, page, column_name, value)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )?;
        for (row_index, row) in record.rows.iter().enumerate() {
            for (column, value) in &row.values {
                statement.execute(params![
                    &record.run_id,
                    row_index as i64,
                    &row.file,
                    row.page,
                    column,
                    value
                ])?;
            }
        }
    }

    tx.commit()?;
    Ok(record.rows.len())
}
