/// 操作日志
///
/// 收集一次编辑会话中的加载、变换与保存结果，生成纯文本摘要，
/// 并在每次保存后追加写入日志文件。

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use crate::editor::TransformReport;
use crate::loader::LoadReport;
use crate::utils::{FileFailure, Result};
use crate::writeback::SaveReport;

/// 默认日志文件名
pub const DEFAULT_LOG_FILE: &str = "titanbreak.log";

/// 日志条目
#[derive(Debug, Clone)]
pub enum AuditEntry {
    Load {
        format: String,
        files_attempted: usize,
        files_loaded: usize,
        records: usize,
        failures: Vec<FileFailure>,
    },
    Transform {
        label: String,
        considered: usize,
        changed: usize,
        protected: usize,
        skipped: usize,
    },
    Save {
        attempted: usize,
        succeeded: usize,
        failed: usize,
        backups: usize,
        backup_root: Option<PathBuf>,
        failures: Vec<FileFailure>,
        backup_failures: Vec<FileFailure>,
    },
}

/// 会话日志
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    source: Option<PathBuf>,
    destination: Option<PathBuf>,
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new(source: Option<PathBuf>, destination: Option<PathBuf>) -> Self {
        Self {
            source,
            destination,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn record_load(&mut self, format: &str, report: &LoadReport) {
        self.entries.push(AuditEntry::Load {
            format: format.to_string(),
            files_attempted: report.files_attempted,
            files_loaded: report.files_loaded,
            records: report.records_loaded,
            failures: report.failures.clone(),
        });
    }

    pub fn record_transform(&mut self, label: &str, report: &TransformReport) {
        self.entries.push(AuditEntry::Transform {
            label: label.to_string(),
            considered: report.considered,
            changed: report.changed,
            protected: report.protected,
            skipped: report.skipped,
        });
    }

    pub fn record_save(&mut self, report: &SaveReport) {
        self.entries.push(AuditEntry::Save {
            attempted: report.attempted,
            succeeded: report.succeeded,
            failed: report.failed,
            backups: report.backups.len(),
            backup_root: report.backup_root.clone(),
            failures: report.failures.clone(),
            backup_failures: report.backup_failures.clone(),
        });
    }

    /// 生成纯文本摘要
    pub fn render(&self) -> String {
        let mut out = String::new();
        let path_or_dash = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        let _ = writeln!(out, "Source: {}", path_or_dash(&self.source));
        let _ = writeln!(out, "Destination: {}", path_or_dash(&self.destination));

        for entry in &self.entries {
            match entry {
                AuditEntry::Load { format, files_attempted, files_loaded, records, failures } => {
                    let _ = writeln!(
                        out,
                        "Load [{}]: {} records from {} of {} files",
                        format, records, files_loaded, files_attempted
                    );
                    write_failures(&mut out, "load failure", failures);
                }
                AuditEntry::Transform { label, considered, changed, protected, skipped } => {
                    let _ = writeln!(
                        out,
                        "Transform {}: {} changed of {} considered ({} protected, {} skipped)",
                        label, changed, considered, protected, skipped
                    );
                }
                AuditEntry::Save {
                    attempted,
                    succeeded,
                    failed,
                    backups,
                    backup_root,
                    failures,
                    backup_failures,
                } => {
                    let _ = writeln!(
                        out,
                        "Save: {} of {} files written, {} failed, {} backups",
                        succeeded, attempted, failed, backups
                    );
                    if let Some(root) = backup_root {
                        let _ = writeln!(out, "Backup root: {}", root.display());
                    }
                    write_failures(&mut out, "save failure", failures);
                    write_failures(&mut out, "backup failure", backup_failures);
                }
            }
        }
        out
    }

    /// 追加写入日志文件（带时间戳）
    pub fn persist(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "=== {} ===", timestamp)?;
        file.write_all(self.render().as_bytes())?;
        writeln!(file)?;
        debug!(log = %path.display(), entries = self.entries.len(), "audit log appended");
        Ok(())
    }
}

fn write_failures(out: &mut String, label: &str, failures: &[FileFailure]) {
    for failure in failures {
        let _ = writeln!(out, "  {}: {}", label, failure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{EditorError, ErrorClass};
    use tempfile::TempDir;

    fn save_report() -> SaveReport {
        SaveReport {
            attempted: 2,
            succeeded: 1,
            failed: 1,
            failures: vec![FileFailure::new(
                "em002_00_dttune.48E8AC29",
                &EditorError::ReadOnlyTarget(PathBuf::from("em002_00_dttune.48E8AC29")),
            )],
            ..Default::default()
        }
    }

    #[test]
    fn test_render_lists_counts_and_failures() {
        let mut log = AuditLog::new(Some(PathBuf::from("/game")), None);
        log.record_save(&save_report());

        let text = log.render();
        assert!(text.contains("Source: /game"));
        assert!(text.contains("Destination: -"));
        assert!(text.contains("Save: 1 of 2 files written, 1 failed"));
        assert!(text.contains(&ErrorClass::IOError.to_string()));
        assert!(text.contains("em002_00_dttune.48E8AC29"));
    }

    #[test]
    fn test_persist_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join(DEFAULT_LOG_FILE);
        let mut log = AuditLog::new(None, None);
        log.record_save(&save_report());

        log.persist(&path).unwrap();
        log.persist(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("=== ").count(), 2);
        assert_eq!(content.matches("Save: 1 of 2").count(), 2);
    }
}
