//! Session archives: a zip holding `session_data.json` and every imported
//! document under `imported_documents/`.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::SessionError;
use crate::model::{ResultRow, SessionDocument, SessionManifest, Template};
use crate::util::{base_name, now_utc_string, sha256_bytes, sha256_file};

pub const SESSION_VERSION: &str = "1.0";
pub const MANIFEST_NAME: &str = "session_data.json";
pub const DOCUMENTS_DIR: &str = "imported_documents";

#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub manifest: SessionManifest,
    /// Restored documents in manifest order.
    pub documents: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    imports_dir: PathBuf,
}

impl SessionStore {
    pub fn new(imports_dir: impl Into<PathBuf>) -> Self {
        Self {
            imports_dir: imports_dir.into(),
        }
    }

    /// Writes the archive next to `path` and renames it into place only once
    /// it is complete.
    pub fn save(
        &self,
        path: &Path,
        documents: &[PathBuf],
        templates: &[Template],
        rows: &[ResultRow],
        view_settings: &serde_json::Value,
    ) -> Result<SessionManifest, SessionError> {
        info!(path = %path.display(), documents = documents.len(), rows = rows.len(), "saving session");
        let write_error = |err: anyhow::Error| SessionError::Write {
            path: path.to_path_buf(),
            message: format!("{err:#}"),
        };

        let entries = describe_documents(documents).map_err(write_error)?;
        let manifest = SessionManifest {
            version: SESSION_VERSION.to_string(),
            saved_at: now_utc_string(),
            document_names: entries.iter().map(|(doc, _)| doc.name.clone()).collect(),
            documents: entries.iter().map(|(doc, _)| doc.clone()).collect(),
            templates: templates.to_vec(),
            rows: rows.to_vec(),
            view_settings: view_settings.clone(),
        };

        let staging = staging_path(path);
        if let Err(err) = write_archive(&staging, &manifest, &entries) {
            let _ = fs::remove_file(&staging);
            return Err(write_error(err));
        }
        if let Err(err) = fs::rename(&staging, path) {
            let _ = fs::remove_file(&staging);
            return Err(write_error(anyhow::Error::new(err).context("failed to move archive into place")));
        }

        info!(path = %path.display(), "session saved");
        Ok(manifest)
    }

    /// Replaces the import directory with the archive's documents. The import
    /// directory is cleared before the archive is opened, and cleared again if
    /// the archive turns out to be unusable, so it never holds a partial or
    /// unverified document set.
    pub fn load(&self, path: &Path) -> Result<LoadedSession, SessionError> {
        info!(path = %path.display(), "loading session");
        clear_directory(&self.imports_dir).map_err(|err| SessionError::Write {
            path: path.to_path_buf(),
            message: format!("{err:#}"),
        })?;

        self.restore(path).inspect_err(|err| {
            warn!(path = %path.display(), error = %err, "session rejected; clearing restored documents");
            if let Err(clear_err) = clear_directory(&self.imports_dir) {
                warn!(dir = %self.imports_dir.display(), error = %format!("{clear_err:#}"), "failed to clear import directory");
            }
        })
    }

    fn restore(&self, path: &Path) -> Result<LoadedSession, SessionError> {
        let write_error = |err: anyhow::Error| SessionError::Write {
            path: path.to_path_buf(),
            message: format!("{err:#}"),
        };
        let format_error = |message: String| SessionError::Format {
            path: path.to_path_buf(),
            message,
        };

        let file = File::open(path).map_err(|err| format_error(format!("cannot open: {err}")))?;
        let mut archive =
            ZipArchive::new(file).map_err(|err| format_error(format!("not a zip archive: {err}")))?;

        let manifest: SessionManifest = {
            let mut entry = archive
                .by_name(MANIFEST_NAME)
                .map_err(|_| format_error(format!("{MANIFEST_NAME} is missing")))?;
            let mut raw = Vec::new();
            entry
                .read_to_end(&mut raw)
                .map_err(|err| format_error(format!("cannot read {MANIFEST_NAME}: {err}")))?;
            serde_json::from_slice(&raw)
                .map_err(|err| format_error(format!("cannot parse {MANIFEST_NAME}: {err}")))?
        };

        let mut checksums: HashMap<String, String> = HashMap::new();
        for index in 0..archive.len() {
            let mut entry = archive
                .by_index(index)
                .map_err(|err| format_error(format!("unreadable entry #{index}: {err}")))?;
            if entry.is_dir() {
                continue;
            }
            let Some(entry_path) = entry.enclosed_name() else {
                warn!(entry = entry.name(), "skipping archive entry with unsafe path");
                continue;
            };
            if !entry_path.starts_with(DOCUMENTS_DIR) {
                continue;
            }
            let name = base_name(&entry_path);
            if name.is_empty() {
                continue;
            }

            let mut bytes = Vec::new();
            entry
                .read_to_end(&mut bytes)
                .map_err(|err| format_error(format!("cannot read document {name}: {err}")))?;
            let target = self.imports_dir.join(&name);
            fs::write(&target, &bytes)
                .with_context(|| format!("failed to write {}", target.display()))
                .map_err(write_error)?;
            checksums.insert(name, sha256_bytes(&bytes));
        }

        let expected = manifest.document_names.iter().cloned().collect::<BTreeSet<_>>();
        let extracted = checksums.keys().cloned().collect::<BTreeSet<_>>();
        if expected != extracted {
            return Err(format_error(format!(
                "documents in archive {:?} do not match manifest {:?}",
                extracted, expected
            )));
        }
        for document in &manifest.documents {
            if checksums.get(&document.name) != Some(&document.sha256) {
                return Err(format_error(format!(
                    "checksum mismatch for document {}",
                    document.name
                )));
            }
        }

        let documents = manifest
            .document_names
            .iter()
            .map(|name| self.imports_dir.join(name))
            .collect::<Vec<_>>();
        info!(
            path = %path.display(),
            documents = documents.len(),
            rows = manifest.rows.len(),
            templates = manifest.templates.len(),
            "session loaded"
        );
        Ok(LoadedSession {
            manifest,
            documents,
        })
    }
}

fn describe_documents(documents: &[PathBuf]) -> Result<Vec<(SessionDocument, &Path)>> {
    let mut seen = BTreeSet::new();
    let mut entries = Vec::with_capacity(documents.len());
    for document in documents {
        if !document.is_file() {
            bail!("document not found: {}", document.display());
        }
        let name = base_name(document);
        if !seen.insert(name.clone()) {
            bail!("two documents share the base name {name}");
        }
        let sha256 = sha256_file(document)?;
        entries.push((SessionDocument { name, sha256 }, document.as_path()));
    }
    Ok(entries)
}

fn write_archive(
    staging: &Path,
    manifest: &SessionManifest,
    entries: &[(SessionDocument, &Path)],
) -> Result<()> {
    let file = File::create(staging)
        .with_context(|| format!("failed to create {}", staging.display()))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest_json =
        serde_json::to_vec_pretty(manifest).context("failed to serialize session manifest")?;
    writer
        .start_file(MANIFEST_NAME, options)
        .context("failed to start manifest entry")?;
    writer
        .write_all(&manifest_json)
        .context("failed to write manifest entry")?;

    for (document, source) in entries {
        writer
            .start_file(format!("{DOCUMENTS_DIR}/{}", document.name), options)
            .with_context(|| format!("failed to start entry for {}", document.name))?;
        let mut input = File::open(source)
            .with_context(|| format!("failed to open {}", source.display()))?;
        io::copy(&mut input, &mut writer)
            .with_context(|| format!("failed to archive {}", source.display()))?;
    }

    let file = writer.finish().context("failed to finalize archive")?;
    file.sync_all().context("failed to flush archive")?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|value| value.to_string_lossy().into_owned())
        .unwrap_or_else(|| "session".to_string());
    path.with_file_name(format!(".{name}.{}.partial", std::process::id()))
}

fn clear_directory(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        return Ok(());
    }
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("failed to list {}", dir.display()))?
            .path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.with_context(|| format!("failed to remove {}", path.display()))?;
    }
    Ok(())
}
