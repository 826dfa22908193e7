use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use regex::RegexBuilder;
use tracing::{info, warn};

use crate::error::TemplateError;
use crate::model::{RESERVED_COLUMNS, Template, TemplateKind};

/// File-backed template collection, one pretty-printed JSON file per template.
#[derive(Debug)]
pub struct TemplateStore {
    dir: PathBuf,
    templates: Vec<Template>,
}

impl TemplateStore {
    /// Loads every `*.json` file in `dir`. Unreadable or corrupt files are
    /// logged and skipped.
    pub fn load(dir: &Path) -> Result<Self, TemplateError> {
        fs::create_dir_all(dir).map_err(|source| TemplateError::Storage {
            name: String::new(),
            path: dir.to_path_buf(),
            source,
        })?;
        let entries = fs::read_dir(dir).map_err(|source| TemplateError::Storage {
            name: String::new(),
            path: dir.to_path_buf(),
            source,
        })?;

        let mut templates: Vec<Template> = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_json = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false);
            if !is_json || !path.is_file() {
                continue;
            }

            let raw = match fs::read(&path) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable template file");
                    continue;
                }
            };
            let template: Template = match serde_json::from_slice(&raw) {
                Ok(template) => template,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping corrupt template file");
                    continue;
                }
            };
            if templates.iter().any(|known| known.name == template.name) {
                warn!(path = %path.display(), name = %template.name, "skipping duplicate template");
                continue;
            }
            templates.push(template);
        }
        templates.sort_by(|left, right| left.name.cmp(&right.name));

        info!(dir = %dir.display(), count = templates.len(), "loaded templates");
        Ok(Self {
            dir: dir.to_path_buf(),
            templates,
        })
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn find(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|template| template.name == name)
    }

    pub fn add(&mut self, template: Template) -> Result<(), TemplateError> {
        validate_template(&template)?;

        let file_name = template_file_name(&template.name);
        let clashes = self.templates.iter().any(|known| {
            known.name == template.name || template_file_name(&known.name) == file_name
        });
        if clashes {
            return Err(TemplateError::DuplicateName(template.name));
        }

        let path = self.dir.join(&file_name);
        write_template(&path, &template)?;

        info!(name = %template.name, path = %path.display(), "saved template");
        let position = self
            .templates
            .binary_search_by(|known| known.name.cmp(&template.name))
            .unwrap_or_else(|insert_at| insert_at);
        self.templates.insert(position, template);
        Ok(())
    }

    /// Removes `name` from memory and disk. Returns whether anything was removed.
    pub fn delete(&mut self, name: &str) -> Result<bool, TemplateError> {
        let Some(position) = self.templates.iter().position(|known| known.name == name) else {
            return Ok(false);
        };

        let path = self.dir.join(template_file_name(name));
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(TemplateError::Storage {
                    name: name.to_string(),
                    path,
                    source,
                });
            }
        }
        self.templates.remove(position);
        info!(name, "deleted template");
        Ok(true)
    }
}

pub fn template_file_name(name: &str) -> String {
    let safe = name
        .chars()
        .map(|character| {
            if character.is_ascii_alphanumeric() || character == '_' || character == '-' {
                character
            } else {
                '_'
            }
        })
        .collect::<String>();
    format!("{safe}.json")
}

pub fn validate_template(template: &Template) -> Result<(), TemplateError> {
    let name = template.name.trim();
    if name.is_empty() {
        return Err(TemplateError::EmptyName);
    }
    if template.kind == TemplateKind::TextParser && template.fields.is_empty() {
        return Err(TemplateError::NoFields {
            template: template.name.clone(),
        });
    }

    let mut seen = HashSet::new();
    for (index, field) in template.fields.iter().enumerate() {
        let column = field.column_name.trim();
        if column.is_empty() {
            return Err(TemplateError::EmptyColumnName {
                template: template.name.clone(),
                index,
            });
        }
        if RESERVED_COLUMNS.contains(&column) {
            return Err(TemplateError::ReservedColumn {
                template: template.name.clone(),
                column: column.to_string(),
            });
        }
        if !seen.insert(column) {
            return Err(TemplateError::DuplicateColumn {
                template: template.name.clone(),
                column: column.to_string(),
            });
        }

        if field.pattern.is_empty() {
            if template.kind == TemplateKind::TextParser {
                return Err(TemplateError::MissingPattern {
                    template: template.name.clone(),
                    column: column.to_string(),
                });
            }
            continue;
        }
        RegexBuilder::new(&field.pattern)
            .case_insensitive(true)
            .dot_matches_new_line(true)
            .build()
            .map_err(|source| TemplateError::InvalidPattern {
                template: template.name.clone(),
                column: column.to_string(),
                source,
            })?;
    }
    Ok(())
}

fn write_template(path: &Path, template: &Template) -> Result<(), TemplateError> {
    let storage_error = |source: std::io::Error| TemplateError::Storage {
        name: template.name.clone(),
        path: path.to_path_buf(),
        source,
    };

    let mut data = serde_json::to_vec_pretty(template)
        .map_err(|err| storage_error(std::io::Error::other(err)))?;
    data.push(b'\n');

    let staging = path.with_extension("json.tmp");
    fs::write(&staging, &data).map_err(storage_error)?;
    if let Err(err) = fs::rename(&staging, path) {
        let _ = fs::remove_file(&staging);
        return Err(storage_error(err));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Field, Region};

    fn invoice() -> Template {
        Template::text_parser(
            "Invoice",
            vec![
                Field::text("No", r"Invoice #(\d+)"),
                Field::text("Total", r"Total:\s*([\d.]+)"),
            ],
        )
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    #[test]
    fn added_template_survives_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = TemplateStore::load(dir.path()).unwrap();
        store.add(invoice()).unwrap();
        store
            .add(Template::visual(
                "Receipt Scan",
                true,
                vec![Field::region(
                    "Amount",
                    Region {
                        x: 5,
                        y: 6,
                        width: 70,
                        height: 20,
                    },
                )],
            ))
            .unwrap();

        let reloaded = TemplateStore::load(dir.path()).unwrap();
        assert_eq!(reloaded.templates(), store.templates());
        assert_eq!(reloaded.find("Invoice"), Some(&invoice()));
        assert_eq!(
            file_names(dir.path()),
            vec!["Invoice.json", "Receipt_Scan.json"]
        );
    }

    #[test]
    fn duplicate_add_leaves_store_unchanged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = TemplateStore::load(dir.path()).unwrap();
        store.add(invoice()).unwrap();
        let before_disk = fs::read(dir.path().join("Invoice.json")).unwrap();

        let mut other = invoice();
        other.fields.truncate(1);
        let err = store.add(other).unwrap_err();
        assert!(matches!(err, TemplateError::DuplicateName(ref name) if name == "Invoice"));

        assert_eq!(store.templates(), &[invoice()]);
        assert_eq!(fs::read(dir.path().join("Invoice.json")).unwrap(), before_disk);
        assert_eq!(file_names(dir.path()), vec!["Invoice.json"]);
    }

    #[test]
    fn names_that_share_a_file_name_are_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = TemplateStore::load(dir.path()).unwrap();
        store
            .add(Template::text_parser("Tax Form", vec![Field::text("A", "a")]))
            .unwrap();
        let err = store
            .add(Template::text_parser("Tax/Form", vec![Field::text("A", "a")]))
            .unwrap_err();
        assert!(matches!(err, TemplateError::DuplicateName(_)));
    }

    #[test]
    fn invalid_pattern_names_the_field_and_is_not_persisted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = TemplateStore::load(dir.path()).unwrap();
        let template = Template::text_parser(
            "Broken",
            vec![Field::text("Good", "ok"), Field::text("Bad", "(unclosed")],
        );

        let err = store.add(template).unwrap_err();
        assert!(err.is_invalid_template());
        match err {
            TemplateError::InvalidPattern { column, .. } => assert_eq!(column, "Bad"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.templates().is_empty());
        assert!(file_names(dir.path()).is_empty());
    }

    #[test]
    fn validation_rejects_structural_problems() {
        let no_fields = Template::text_parser("Empty", Vec::new());
        assert!(matches!(
            validate_template(&no_fields),
            Err(TemplateError::NoFields { .. })
        ));

        let blank_name = Template::text_parser("  ", vec![Field::text("A", "a")]);
        assert!(matches!(
            validate_template(&blank_name),
            Err(TemplateError::EmptyName)
        ));

        let reserved = Template::text_parser("R", vec![Field::text("Page", "p")]);
        assert!(matches!(
            validate_template(&reserved),
            Err(TemplateError::ReservedColumn { .. })
        ));

        let duplicate = Template::text_parser(
            "D",
            vec![Field::text("Total", "a"), Field::text("Total", "b")],
        );
        assert!(matches!(
            validate_template(&duplicate),
            Err(TemplateError::DuplicateColumn { .. })
        ));

        let missing = Template::text_parser("M", vec![Field::text("Total", "")]);
        assert!(matches!(
            validate_template(&missing),
            Err(TemplateError::MissingPattern { .. })
        ));

        let empty_column = Template::text_parser("C", vec![Field::text("", "x")]);
        assert!(matches!(
            validate_template(&empty_column),
            Err(TemplateError::EmptyColumnName { index: 0, .. })
        ));

        let visual = Template::visual("V", false, Vec::new());
        assert!(validate_template(&visual).is_ok());
    }

    #[test]
    fn corrupt_files_are_skipped_on_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = TemplateStore::load(dir.path()).unwrap();
        store.add(invoice()).unwrap();
        fs::write(dir.path().join("garbage.json"), b"{ nope").unwrap();
        fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let reloaded = TemplateStore::load(dir.path()).unwrap();
        assert_eq!(reloaded.templates(), &[invoice()]);
    }

    #[test]
    fn delete_removes_file_and_ignores_unknown_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = TemplateStore::load(dir.path()).unwrap();
        store.add(invoice()).unwrap();

        assert!(!store.delete("Unknown").unwrap());
        assert!(store.delete("Invoice").unwrap());
        assert!(store.find("Invoice").is_none());
        assert!(file_names(dir.path()).is_empty());
    }
}
