//! Artifact packaging for extracted test cases.
//!
//! For every [`TestCaseRecord`] the packager writes a Selenium script
//! (`test_case_code_<id>.py`) and a description (`test_case_<id>.txt`),
//! bundles both into `test_case_<id>/` inside a zip archive, and builds the
//! combined plain-text download.
//!
//! Packaging never fails. Each filesystem problem is logged, recorded in
//! [`PackageReport::warnings`], and skipped, so a partial archive is still
//! handed back to the caller.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::OutputConfig;
use crate::models::TestCaseRecord;

/// A script written to disk for one test case.
#[derive(Debug, Clone, Serialize)]
pub struct PackagedScript {
    /// File-level id; equals the record id unless it was deduplicated.
    pub id: String,
    pub path: PathBuf,
}

/// Everything the packager produced for one answer.
#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    pub dir: PathBuf,
    /// `None` when archiving is disabled or the archive could not be written.
    pub archive: Option<PathBuf>,
    /// `None` when the combined text file could not be written.
    pub text_path: Option<PathBuf>,
    pub combined_text: String,
    pub scripts: Vec<PackagedScript>,
    pub warnings: Vec<String>,
}

impl PackageReport {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Directory that artifacts for the `run_seq`-th answer are written to.
pub fn output_dir(config: &OutputConfig, run_seq: u64) -> PathBuf {
    if config.namespace_by_query {
        config.dir.join(format!("run-{}", run_seq))
    } else {
        config.dir.clone()
    }
}

/// Text of the combined download: the story once, then every case.
pub fn combined_text(story: &str, records: &[TestCaseRecord]) -> String {
    let mut out = format!("User Story:\n\n{}\n", story.trim());
    for record in records {
        out.push('\n');
        out.push_str(&describe(&record.id, &record.body));
    }
    out
}

fn describe(id: &str, body: &str) -> String {
    format!("Test Case {}: {}\n", id, body)
}

/// Writes scripts, descriptions, the archive, and the combined text file
/// for `records`.
pub fn package_records(
    story: &str,
    records: &[TestCaseRecord],
    config: &OutputConfig,
    run_seq: u64,
) -> PackageReport {
    let dir = output_dir(config, run_seq);
    let mut report = PackageReport {
        dir: dir.clone(),
        archive: None,
        text_path: None,
        combined_text: combined_text(story, records),
        scripts: Vec::new(),
        warnings: Vec::new(),
    };

    if let Err(e) = std::fs::create_dir_all(&dir) {
        report.warn(format!("cannot create {}: {}", dir.display(), e));
    }

    let file_ids = unique_ids(records);
    let mut archive_entries: Vec<(String, &str)> = Vec::new();
    let mut descriptions: Vec<PathBuf> = Vec::new();
    let description_texts: Vec<String> = records
        .iter()
        .map(|record| describe(&record.id, &record.body))
        .collect();

    for ((record, file_id), description) in records.iter().zip(&file_ids).zip(&description_texts) {
        let folder = format!("test_case_{}", file_id);

        let desc_name = format!("test_case_{}.txt", file_id);
        let desc_path = dir.join(&desc_name);
        match std::fs::write(&desc_path, description) {
            Ok(()) => descriptions.push(desc_path),
            Err(e) => report.warn(format!("cannot write {}: {}", desc_path.display(), e)),
        }
        archive_entries.push((format!("{}/{}", folder, desc_name), description.as_str()));

        if let Some(script) = &record.script {
            let code_name = format!("test_case_code_{}.py", file_id);
            let code_path = dir.join(&code_name);
            match std::fs::write(&code_path, script) {
                Ok(()) => report.scripts.push(PackagedScript {
                    id: file_id.clone(),
                    path: code_path,
                }),
                Err(e) => report.warn(format!("cannot write {}: {}", code_path.display(), e)),
            }
            archive_entries.push((format!("{}/{}", folder, code_name), script.as_str()));
        }
    }

    if config.archive && !records.is_empty() {
        let archive_path = dir.join(&config.archive_name);
        match write_archive(&archive_path, &archive_entries) {
            Ok(()) => {
                report.archive = Some(archive_path);
                for path in &descriptions {
                    if let Err(e) = std::fs::remove_file(path) {
                        report.warn(format!("cannot remove {}: {}", path.display(), e));
                    }
                }
            }
            Err(e) => report.warn(format!("cannot write {}: {}", archive_path.display(), e)),
        }
    }

    let text_path = dir.join(&config.text_name);
    match std::fs::write(&text_path, &report.combined_text) {
        Ok(()) => report.text_path = Some(text_path),
        Err(e) => report.warn(format!("cannot write {}: {}", text_path.display(), e)),
    }

    info!(
        dir = %report.dir.display(),
        cases = records.len(),
        scripts = report.scripts.len(),
        warnings = report.warnings.len(),
        "packaged test cases"
    );
    report
}

fn write_archive(path: &Path, entries: &[(String, &str)]) -> zip::result::ZipResult<()> {
    let file = File::create(path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, contents) in entries {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(contents.as_bytes())?;
    }
    zip.finish()?;
    Ok(())
}

/// File-safe ids, with `_<n>` appended to repeats of the same id.
fn unique_ids(records: &[TestCaseRecord]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    records
        .iter()
        .map(|record| {
            let base = sanitize_id(&record.id);
            let n = seen.entry(base.clone()).or_insert(0);
            *n += 1;
            if *n == 1 {
                base
            } else {
                format!("{}_{}", base, n)
            }
        })
        .collect()
}

fn sanitize_id(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn record(id: &str, body: &str, script: Option<&str>) -> TestCaseRecord {
        TestCaseRecord {
            id: id.to_string(),
            body: body.to_string(),
            script: script.map(str::to_string),
        }
    }

    fn config(dir: &Path) -> OutputConfig {
        OutputConfig {
            dir: dir.to_path_buf(),
            ..OutputConfig::default()
        }
    }

    fn archive_names(path: &Path) -> Vec<String> {
        let file = File::open(path).unwrap();
        let archive = zip::ZipArchive::new(file).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[test]
    fn two_records_give_two_folders() {
        let tmp = tempfile::tempdir().unwrap();
        let records = vec![
            record("1", "Valid login", Some("login('ok')")),
            record("2", "Locked account", Some("login('locked')")),
        ];
        let report = package_records("As a user I log in", &records, &config(tmp.path()), 1);

        assert!(report.warnings.is_empty(), "{:?}", report.warnings);
        assert_eq!(report.dir, tmp.path().join("run-1"));
        let archive = report.archive.clone().unwrap();
        assert_eq!(
            archive_names(&archive),
            vec![
                "test_case_1/test_case_1.txt",
                "test_case_1/test_case_code_1.py",
                "test_case_2/test_case_2.txt",
                "test_case_2/test_case_code_2.py",
            ]
        );

        assert!(report.combined_text.starts_with("User Story:\n\nAs a user I log in\n"));
        assert!(report.combined_text.contains("Test Case 1: Valid login"));
        assert!(report.combined_text.contains("Test Case 2: Locked account"));

        assert_eq!(report.scripts.len(), 2);
        assert_eq!(
            std::fs::read_to_string(&report.scripts[1].path).unwrap(),
            "login('locked')"
        );
        assert!(!report.dir.join("test_case_1.txt").exists());
        assert_eq!(
            std::fs::read_to_string(report.text_path.unwrap()).unwrap(),
            report.combined_text
        );
    }

    #[test]
    fn archive_entry_contents_match() {
        let tmp = tempfile::tempdir().unwrap();
        let records = vec![record("3", "Empty cart", Some("check()"))];
        let report = package_records("story", &records, &config(tmp.path()), 7);

        let file = File::open(report.archive.unwrap()).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut text = String::new();
        archive
            .by_name("test_case_3/test_case_3.txt")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "Test Case 3: Empty cart\n");
    }

    #[test]
    fn duplicate_ids_are_suffixed() {
        let tmp = tempfile::tempdir().unwrap();
        let records = vec![
            record("1", "first", Some("a()")),
            record("1", "second", Some("b()")),
        ];
        let report = package_records("story", &records, &config(tmp.path()), 1);
        let ids: Vec<&str> = report.scripts.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "1_2"]);
        assert!(report.dir.join("test_case_code_1_2.py").exists());
    }

    #[test]
    fn without_namespacing_writes_into_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = OutputConfig {
            namespace_by_query: false,
            archive: false,
            ..config(tmp.path())
        };
        let records = vec![record("1", "body", Some("x()"))];
        let report = package_records("story", &records, &cfg, 9);
        assert_eq!(report.dir, tmp.path());
        assert!(report.archive.is_none());
        assert!(tmp.path().join("test_case_code_1.py").exists());
        assert!(tmp.path().join("test_case_1.txt").exists());
    }

    #[test]
    fn unwritable_dir_becomes_warnings() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocked");
        std::fs::write(&blocker, "not a directory").unwrap();
        let records = vec![record("1", "body", Some("x()"))];
        let report = package_records("story", &records, &config(&blocker), 1);

        assert!(!report.warnings.is_empty());
        assert!(report.archive.is_none());
        assert!(report.scripts.is_empty());
        assert!(report.combined_text.contains("Test Case 1: body"));
    }

    #[test]
    fn script_ids_are_file_safe() {
        assert_eq!(sanitize_id("2a"), "2a");
        assert_eq!(sanitize_id("../x"), "___x");
        assert_eq!(sanitize_id(""), "unnamed");
    }
}
