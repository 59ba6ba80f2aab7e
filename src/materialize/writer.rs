use crate::config::MigrationConfig;
use crate::error::{MigrationError, Result};
use crate::materialize::materializer::CollectionDocuments;
use crate::materialize::validator::infer_validator;
use crate::model::NoSqlModel;
use log::{debug, info};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Writes one collection's documents as a JSON array.
pub struct DocumentWriter<W: Write> {
    writer: W,
    pretty: bool,
}

impl<W: Write> DocumentWriter<W> {
    pub fn new(writer: W, pretty: bool) -> Self {
        DocumentWriter { writer, pretty }
    }

    pub fn write<T: Serialize + ?Sized>(&mut self, value: &T) -> serde_json::Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, value)
        } else {
            serde_json::to_writer(&mut self.writer, value)
        }
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Writes every root collection to `{prefix}{N}.json` in an output directory,
/// N being the collection's 1-based position among the schema roots.
/// Bundling the directory into an archive is up to the caller.
pub struct CollectionWriter {
    output_dir: PathBuf,
    file_prefix: String,
    pretty: bool,
    emit_validators: bool,
}

impl CollectionWriter {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        let defaults = MigrationConfig::default();
        CollectionWriter {
            output_dir: output_dir.as_ref().to_path_buf(),
            file_prefix: defaults.file_prefix,
            pretty: defaults.pretty,
            emit_validators: defaults.emit_validators,
        }
    }

    pub fn from_config<P: AsRef<Path>>(output_dir: P, config: &MigrationConfig) -> Self {
        Self::new(output_dir)
            .with_file_prefix(config.file_prefix.clone())
            .with_pretty(config.pretty)
            .with_validators(config.emit_validators)
    }

    pub fn with_file_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn with_validators(mut self, emit: bool) -> Self {
        self.emit_validators = emit;
        self
    }

    pub fn path_for(&self, position: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}{}.json", self.file_prefix, position))
    }

    pub fn validator_path_for(&self, position: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}{}.schema.json", self.file_prefix, position))
    }

    /// Write all collections; returns the written paths in order.
    ///
    /// `collections[i]` holds the documents of `schema.collections[i]`, as
    /// returned by `materialize_all`; a missing entry is written as `[]`.
    pub fn write(
        &self,
        schema: &NoSqlModel,
        collections: &[CollectionDocuments],
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.output_dir).map_err(|source| MigrationError::Persist {
            path: self.output_dir.clone(),
            source,
        })?;
        self.remove_stale()?;

        let mut written = Vec::new();
        for (i, collection) in schema.collections.iter().enumerate() {
            let position = i + 1;
            let documents = collections
                .get(i)
                .map_or(&[][..], |c| c.documents.as_slice());

            let path = self.path_for(position);
            self.write_file(&path, documents)?;
            debug!("wrote {} documents to {}", documents.len(), path.display());
            written.push(path);

            if self.emit_validators {
                let path = self.validator_path_for(position);
                self.write_file(&path, &infer_validator(collection, documents))?;
                written.push(path);
            }
        }

        info!(
            "wrote {} files to {}",
            written.len(),
            self.output_dir.display()
        );
        Ok(written)
    }

    fn write_file<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let persist = |source| MigrationError::Persist {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(persist)?;
        let mut writer = DocumentWriter::new(BufWriter::new(file), self.pretty);
        writer.write(value)?;
        writer.flush().map_err(persist)
    }

    /// Remove output of a previous run so positions never mix.
    fn remove_stale(&self) -> Result<()> {
        let persist = |source| MigrationError::Persist {
            path: self.output_dir.clone(),
            source,
        };

        for entry in fs::read_dir(&self.output_dir).map_err(persist)? {
            let path = entry.map_err(persist)?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if self.is_output_name(name) {
                fs::remove_file(&path).map_err(|source| MigrationError::Persist {
                    path: path.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    fn is_output_name(&self, name: &str) -> bool {
        let Some(rest) = name.strip_prefix(&self.file_prefix) else {
            return false;
        };
        let stem = rest
            .strip_suffix(".schema.json")
            .or_else(|| rest.strip_suffix(".json"));
        matches!(stem, Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Collection;
    use serde_json::{json, Value};

    fn schema() -> NoSqlModel {
        let mut schema = NoSqlModel::new("shop");
        schema.add_collection(Collection::new("users", ["id", "name"]));
        schema.add_collection(Collection::new("tags", ["label"]));
        schema
    }

    fn documents() -> Vec<CollectionDocuments> {
        vec![CollectionDocuments {
            collection: "users".to_string(),
            documents: vec![json!({"id": 1, "name": "Alice"})],
        }]
    }

    #[test]
    fn test_one_file_per_root() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CollectionWriter::new(dir.path());

        let written = writer.write(&schema(), &documents()).unwrap();
        assert_eq!(
            written,
            vec![dir.path().join("collection1.json"), dir.path().join("collection2.json")]
        );

        let first = fs::read_to_string(&written[0]).unwrap();
        assert_eq!(first, r#"[{"id":1,"name":"Alice"}]"#);
        let second = fs::read_to_string(&written[1]).unwrap();
        assert_eq!(second, "[]");
    }

    #[test]
    fn test_documents_follow_root_position() {
        let dir = tempfile::tempdir().unwrap();
        let mut schema = NoSqlModel::new("school");
        schema.add_collection(Collection::new("enrollments", ["id", "student_id_REF"]));
        schema.add_collection(Collection::new("enrollments", ["id", "grade"]));
        let documents = vec![
            CollectionDocuments {
                collection: "enrollments".to_string(),
                documents: vec![json!({"id": 1, "student_id_REF": 7})],
            },
            CollectionDocuments {
                collection: "enrollments".to_string(),
                documents: vec![json!({"id": 2, "grade": "A"})],
            },
        ];

        let written = CollectionWriter::new(dir.path()).write(&schema, &documents).unwrap();
        assert_eq!(fs::read_to_string(&written[0]).unwrap(), r#"[{"id":1,"student_id_REF":7}]"#);
        assert_eq!(fs::read_to_string(&written[1]).unwrap(), r#"[{"id":2,"grade":"A"}]"#);
    }

    #[test]
    fn test_stale_output_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("collection7.json"), "[]").unwrap();
        fs::write(dir.path().join("collection7.schema.json"), "{}").unwrap();
        fs::write(dir.path().join("collection_notes.json"), "{}").unwrap();
        fs::write(dir.path().join("readme.txt"), "keep").unwrap();

        CollectionWriter::new(dir.path())
            .write(&schema(), &documents())
            .unwrap();

        assert!(!dir.path().join("collection7.json").exists());
        assert!(!dir.path().join("collection7.schema.json").exists());
        assert!(dir.path().join("collection_notes.json").exists());
        assert!(dir.path().join("readme.txt").exists());
    }

    #[test]
    fn test_validators_and_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let config = MigrationConfig {
            file_prefix: "shop_".to_string(),
            emit_validators: true,
            pretty: true,
            ..MigrationConfig::default()
        };

        let written = CollectionWriter::from_config(dir.path(), &config)
            .write(&schema(), &documents())
            .unwrap();
        assert_eq!(written.len(), 4);
        assert_eq!(written[1], dir.path().join("shop_1.schema.json"));

        let validator: Value =
            serde_json::from_str(&fs::read_to_string(&written[1]).unwrap()).unwrap();
        assert_eq!(validator["$jsonSchema"]["title"], "users");
        assert!(fs::read_to_string(&written[0]).unwrap().contains('\n'));
    }
}
