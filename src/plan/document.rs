use crate::atomic::write_atomic;
use crate::error::{PlanError, PlanResult};
use anyhow::{anyhow, Context};
use chrono::Local;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocFormat {
    Yaml,
    Json,
}

impl DocFormat {
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DocFormat::Json,
            _ => DocFormat::Yaml,
        }
    }
}

/// The persisted plan: an `active_step` pointer plus free-form hierarchy.
///
/// Held as a JSON value with key order preserved so a rewrite keeps the
/// author's layout as far as the format allows.
#[derive(Debug, Clone)]
pub struct PlanDocument {
    path: PathBuf,
    format: DocFormat,
    root: Value,
}

impl PlanDocument {
    /// Read and parse the plan at `path`.
    pub fn load(path: &Path) -> PlanResult<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read plan {}", path.display()))?;
        let format = DocFormat::for_path(path);
        let root = parse(&text, format)?;
        Ok(Self {
            path: path.to_path_buf(),
            format,
            root,
        })
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Value {
        &mut self.root
    }

    pub fn active_step(&self) -> Option<&str> {
        self.root
            .get("active_step")
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
    }

    /// Serialize in the document's own format.
    pub fn render(&self) -> PlanResult<String> {
        match self.format {
            DocFormat::Json => serde_json::to_string_pretty(&self.root)
                .map(|text| text + "\n")
                .map_err(|err| PlanError::Io(anyhow!(err).context("serialize plan JSON"))),
            DocFormat::Yaml => serde_yaml::to_string(&self.root)
                .map_err(|err| PlanError::Io(anyhow!(err).context("serialize plan YAML"))),
        }
    }

    /// Back up the on-disk document, write this one, then re-read it.
    ///
    /// If the re-read does not match what was written, the backup is put
    /// back and `MalformedPlanDocument` is returned. Returns the backup path.
    pub fn save_with_backup(&self) -> PlanResult<PathBuf> {
        let rendered = self.render()?;
        let previous = fs::read(&self.path)
            .with_context(|| format!("read plan {}", self.path.display()))?;
        let backup = self.write_backup(&previous)?;
        write_atomic(&self.path, rendered.as_bytes())?;

        let verified = PlanDocument::load(&self.path)
            .and_then(|reloaded| {
                if reloaded.root == self.root {
                    Ok(())
                } else {
                    Err(PlanError::MalformedPlanDocument(
                        "re-read plan differs from what was written".to_string(),
                    ))
                }
            });
        if let Err(err) = verified {
            tracing::warn!(
                path = %self.path.display(),
                backup = %backup.display(),
                error = %err,
                "plan failed re-validation; restoring backup"
            );
            write_atomic(&self.path, &previous)?;
            return Err(match err {
                PlanError::MalformedPlanDocument(_) => err,
                other => PlanError::MalformedPlanDocument(other.to_string()),
            });
        }
        tracing::info!(path = %self.path.display(), backup = %backup.display(), "plan updated");
        Ok(backup)
    }

    fn write_backup(&self, previous: &[u8]) -> PlanResult<PathBuf> {
        let dir = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("plan");
        let base = format!("{name}.bak.{}", Local::now().format("%Y%m%d_%H%M%S_%3f"));
        // Two saves within one millisecond get `_1`, `_2`, ... after the stamp.
        let mut backup = dir.join(&base);
        let mut attempt = 0usize;
        while backup.exists() {
            attempt += 1;
            backup = dir.join(format!("{base}_{attempt}"));
        }
        write_atomic(&backup, previous)
            .with_context(|| format!("back up {}", self.path.display()))?;
        Ok(backup)
    }
}

fn parse(text: &str, format: DocFormat) -> PlanResult<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let root: Value = match format {
        DocFormat::Json => serde_json::from_str(text)
            .map_err(|err| PlanError::MalformedPlanDocument(err.to_string()))?,
        DocFormat::Yaml => serde_yaml::from_str(text)
            .map_err(|err| PlanError::MalformedPlanDocument(err.to_string()))?,
    };
    match root {
        Value::Object(_) => Ok(root),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(PlanError::MalformedPlanDocument(
            "plan root must be a mapping".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn backups(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".bak."))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn yaml_round_trip_keeps_key_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plan.yaml");
        fs::write(&path, "zeta: 1\nactive_step: null\nsteps:\n- id: '1.1'\n  status: done\n")
            .expect("write");
        let mut doc = PlanDocument::load(&path).expect("load");
        assert_eq!(doc.active_step(), None);
        doc.root_mut()["active_step"] = json!("1.1");
        let backup = doc.save_with_backup().expect("save");

        let text = fs::read_to_string(&path).expect("read");
        let zeta = text.find("zeta").expect("zeta");
        let active = text.find("active_step").expect("active");
        assert!(zeta < active, "key order changed:\n{text}");
        assert_eq!(PlanDocument::load(&path).expect("reload").active_step(), Some("1.1"));
        assert!(fs::read_to_string(backup).expect("backup").contains("active_step: null"));
    }

    #[test]
    fn every_save_leaves_its_own_backup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plan.json");
        fs::write(&path, r#"{"active_step": null}"#).expect("write");
        let mut doc = PlanDocument::load(&path).expect("load");
        doc.root_mut()["active_step"] = json!("a");
        doc.save_with_backup().expect("first save");
        doc.root_mut()["active_step"] = json!("b");
        doc.save_with_backup().expect("second save");
        assert_eq!(backups(dir.path()).len(), 2);
        let text = fs::read_to_string(&path).expect("read");
        assert!(text.starts_with("{\n"), "json plans stay json:\n{text}");
    }

    #[test]
    fn malformed_documents_are_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plan.yaml");
        fs::write(&path, "steps: [unclosed\n").expect("write");
        assert!(matches!(
            PlanDocument::load(&path),
            Err(PlanError::MalformedPlanDocument(_))
        ));
        fs::write(&path, "- just\n- a list\n").expect("write");
        assert!(matches!(
            PlanDocument::load(&path),
            Err(PlanError::MalformedPlanDocument(_))
        ));
        assert!(matches!(
            PlanDocument::load(&dir.path().join("missing.yaml")),
            Err(PlanError::Io(_))
        ));
    }

    #[test]
    fn empty_file_is_an_empty_plan() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("plan.yaml");
        fs::write(&path, "\n").expect("write");
        let doc = PlanDocument::load(&path).expect("load");
        assert_eq!(doc.root(), &json!({}));
    }
}
