use std::io::{self, Write};
use std::path::Path;
use std::process::Command;

use anyhow::Result;
use tracing::{info, warn};

use super::AppContext;
use crate::cli::StatusArgs;
use crate::config::list_files;

pub fn run(app: &AppContext, args: StatusArgs) -> Result<()> {
    info!(workspace = %app.workspace.root.display(), "status requested");

    let tesseract = Path::new(&app.config.tesseract_cmd);
    for (tool, program) in [
        ("tesseract", tesseract.to_path_buf()),
        ("pdfinfo", app.config.poppler_program("pdfinfo")),
        ("pdftotext", app.config.poppler_program("pdftotext")),
        ("pdftoppm", app.config.poppler_program("pdftoppm")),
    ] {
        match command_version_optional(&program, &["-v"]) {
            Some(version) => info!(tool, version = %version, "tool available"),
            None => warn!(tool, program = %program.display(), "tool not found"),
        }
    }

    let store = app.template_store()?;
    info!(
        imported = app.workspace.imported_files()?.len(),
        templates = store.templates().len(),
        cached = list_files(&app.workspace.cache)?.len(),
        default_engine = %app.config.default_ocr_engine,
        "workspace status"
    );

    let Some(record) = app.last_run()? else {
        return Ok(());
    };
    info!(
        run_id = %record.run_id,
        engine = %record.engine,
        status = %record.status,
        started_at = %record.started_at,
        finished_at = %record.finished_at,
        files = record.file_count,
        rows = record.row_count,
        failed = record.failed_count,
        "last run"
    );
    for warning in &record.warnings {
        warn!(
            file = %warning.file,
            page = warning.page.unwrap_or_default(),
            reason = %warning.message,
            "item failed during last run"
        );
    }

    if args.rows {
        let mut output = io::BufWriter::new(io::stdout().lock());
        for row in &record.rows {
            let cells = row
                .cells()
                .into_iter()
                .map(|(column, value)| format!("{column}={value}"))
                .collect::<Vec<_>>();
            writeln!(output, "{}", cells.join("\t"))?;
        }
        output.flush()?;
    }

    Ok(())
}

/// First non-empty line a tool prints for its version flag, if it runs at all.
fn command_version_optional(program: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let source = if stdout.trim().is_empty() {
        stderr
    } else {
        stdout
    };

    Some(
        source
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("unknown")
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tools_report_none() {
        assert!(command_version_optional(Path::new("docsnip-no-such-tool"), &["-v"]).is_none());
    }
}
