/// 写回管理
///
/// 对每个包含已修改记录的文件：可选备份 → 将各记录重新编码并拼接进原始内容的副本 →
/// 整体写回。单个文件失败只中止该文件，其余文件继续处理。

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use crate::backup::{BackupOutcome, BackupPolicy, BackupSession, DEFAULT_BACKUP_DIR};
use crate::codec::RecordCodec;
use crate::io::{DefaultFileReader, DefaultFileWriter, FileReader, FileWriter};
use crate::record::{FileId, LoadedFile, RecordSet};
use crate::utils::{EditorError, ErrorClass, FileFailure, Result};

/// 写回配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteBackConfig {
    pub backup: BackupPolicy,
    /// 输出根目录；为空时原地覆盖
    pub output_root: Option<PathBuf>,
    /// 扫描根目录（默认备份目录的位置）
    pub source_root: Option<PathBuf>,
    /// 使用 rayon 并行写入文件
    pub parallel: bool,
}

/// 取消令牌
///
/// 只在文件之间检查，已开始的文件总会完整写入或完整跳过。
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 保存统计
#[derive(Debug, Clone, Default)]
pub struct SaveReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 写入失败（或被取消）的文件
    pub failures: Vec<FileFailure>,
    /// 成功写入的目标路径
    pub written: Vec<PathBuf>,
    /// 本次写入的备份
    pub backups: Vec<PathBuf>,
    /// 备份失败但仍继续写入的文件
    pub backup_failures: Vec<FileFailure>,
    /// 备份会话目录
    pub backup_root: Option<PathBuf>,
}

impl SaveReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn count_of(&self, class: ErrorClass) -> usize {
        self.failures.iter().filter(|f| f.class == class).count()
    }
}

impl fmt::Display for SaveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Saved {} of {} files ({} failed, {} backups",
            self.succeeded,
            self.attempted,
            self.failed,
            self.backups.len()
        )?;
        if !self.backup_failures.is_empty() {
            write!(f, ", {} backup failures", self.backup_failures.len())?;
        }
        write!(f, ")")
    }
}

/// 待写回的文件
struct WriteJob {
    id: FileId,
    source: PathBuf,
    target: PathBuf,
    relative_path: PathBuf,
    original: Arc<[u8]>,
    content: Vec<u8>,
}

/// 单个文件的处理结果
enum JobOutcome {
    Written {
        id: FileId,
        target: PathBuf,
        content: Vec<u8>,
        backup: Option<std::result::Result<BackupOutcome, FileFailure>>,
    },
    Failed {
        failure: FileFailure,
        backup: Option<std::result::Result<BackupOutcome, FileFailure>>,
    },
}

/// 写回管理器
pub struct WriteBackManager {
    config: WriteBackConfig,
    reader: Box<dyn FileReader>,
    writer: Box<dyn FileWriter>,
    cancel: CancelToken,
}

impl Default for WriteBackManager {
    fn default() -> Self {
        Self::new(WriteBackConfig::default())
    }
}

impl WriteBackManager {
    pub fn new(config: WriteBackConfig) -> Self {
        Self {
            config,
            reader: Box::new(DefaultFileReader),
            writer: Box::new(DefaultFileWriter),
            cancel: CancelToken::new(),
        }
    }

    /// 替换 IO 实现
    pub fn with_io(mut self, reader: Box<dyn FileReader>, writer: Box<dyn FileWriter>) -> Self {
        self.reader = reader;
        self.writer = writer;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &WriteBackConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// 写回所有包含已修改记录的文件
    ///
    /// 成功写入的文件会推进记录集中的原始快照，再次保存时不会重复写入。
    pub fn save(&self, set: &mut RecordSet) -> SaveReport {
        let mut report = SaveReport::default();
        let modified = set.modified_files();
        if modified.is_empty() {
            info!("nothing to save");
            return report;
        }

        let session = self.backup_session(set, &modified);
        report.backup_root = session.as_ref().map(|s| s.root().to_path_buf());

        let codec = RecordCodec::new(Arc::clone(set.schema()));
        let mut jobs = Vec::with_capacity(modified.len());
        for id in modified {
            report.attempted += 1;
            match self.prepare(set, &codec, id) {
                Ok(job) => jobs.push(job),
                Err((path, err)) => {
                    error!(path = %path.display(), class = %err.class(), "encode failed: {}", err);
                    report.failed += 1;
                    report.failures.push(FileFailure::new(path, &err));
                }
            }
        }

        let outcomes: Vec<JobOutcome> = if self.config.parallel {
            jobs.par_iter().map(|job| self.run(job, session.as_ref())).collect()
        } else {
            jobs.iter().map(|job| self.run(job, session.as_ref())).collect()
        };

        for outcome in outcomes {
            match outcome {
                JobOutcome::Written { id, target, content, backup } => {
                    Self::record_backup(&mut report, backup);
                    report.succeeded += 1;
                    report.written.push(target);
                    set.commit_file(id, Arc::from(content));
                }
                JobOutcome::Failed { failure, backup } => {
                    Self::record_backup(&mut report, backup);
                    report.failed += 1;
                    report.failures.push(failure);
                }
            }
        }

        info!("{}", report);
        report
    }

    fn record_backup(
        report: &mut SaveReport,
        backup: Option<std::result::Result<BackupOutcome, FileFailure>>,
    ) {
        match backup {
            Some(Ok(BackupOutcome::Written(path))) => report.backups.push(path),
            Some(Ok(BackupOutcome::AlreadyPresent(_))) | None => {}
            Some(Err(failure)) => report.backup_failures.push(failure),
        }
    }

    fn backup_session(&self, set: &RecordSet, modified: &[FileId]) -> Option<BackupSession> {
        let policy = &self.config.backup;
        if !policy.enabled {
            return None;
        }
        let base = policy
            .root
            .clone()
            .or_else(|| self.config.source_root.as_ref().map(|r| r.join(DEFAULT_BACKUP_DIR)))
            .or_else(|| {
                modified
                    .first()
                    .and_then(|id| set.file(*id))
                    .map(|file| scan_root(file).join(DEFAULT_BACKUP_DIR))
            })?;
        Some(BackupSession::start(&base))
    }

    /// 将文件的所有记录拼接进原始内容的副本
    fn prepare(
        &self,
        set: &RecordSet,
        codec: &RecordCodec,
        id: FileId,
    ) -> std::result::Result<WriteJob, (PathBuf, EditorError)> {
        let file = set
            .file(id)
            .ok_or_else(|| (PathBuf::new(), EditorError::UnknownFile(id.0.to_string())))?;

        let mut content = file.original.to_vec();
        for record in set.records_of(id) {
            codec
                .splice_into(&mut content, record)
                .map_err(|err| (file.path.clone(), err))?;
        }

        let target = match &self.config.output_root {
            Some(root) => root.join(&file.relative_path),
            None => file.path.clone(),
        };
        Ok(WriteJob {
            id,
            source: file.path.clone(),
            target,
            relative_path: file.relative_path.clone(),
            original: Arc::clone(&file.original),
            content,
        })
    }

    fn run(&self, job: &WriteJob, session: Option<&BackupSession>) -> JobOutcome {
        if self.cancel.is_cancelled() {
            warn!(path = %job.source.display(), "save cancelled before file");
            return JobOutcome::Failed {
                failure: FileFailure::new(&job.source, &EditorError::Cancelled),
                backup: None,
            };
        }

        let mut backup = None;
        if let Some(session) = session {
            match session.backup(&job.relative_path, &job.original, self.reader.as_ref(), self.writer.as_ref()) {
                Ok(outcome) => backup = Some(Ok(outcome)),
                Err(err) => {
                    warn!(path = %job.source.display(), class = %err.class(), "backup failed: {}", err);
                    let failure = FileFailure::new(&job.source, &err);
                    if !self.config.backup.continue_on_failure {
                        return JobOutcome::Failed {
                            failure: failure.clone(),
                            backup: Some(Err(failure)),
                        };
                    }
                    backup = Some(Err(failure));
                }
            }
        }

        match self.write(job) {
            Ok(()) => JobOutcome::Written {
                id: job.id,
                target: job.target.clone(),
                content: job.content.clone(),
                backup,
            },
            Err(err) => {
                error!(path = %job.target.display(), class = %err.class(), "write failed: {}", err);
                JobOutcome::Failed {
                    failure: FileFailure::new(&job.source, &err),
                    backup,
                }
            }
        }
    }

    fn write(&self, job: &WriteJob) -> Result<()> {
        self.writer.write(&job.target, &job.content)
    }
}

/// 由文件路径去掉相对路径部分得到扫描根目录
fn scan_root(file: &LoadedFile) -> PathBuf {
    let depth = file.relative_path.components().count();
    file.path
        .ancestors()
        .nth(depth)
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::{Operation, Selection, TransformEngine};
    use crate::format::presets;
    use crate::loader::{RecordLoader, SourceFile};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// 记录写入路径、可按文件名让写入失败的写入器
    #[derive(Default)]
    struct RecordingWriter {
        written: Mutex<Vec<PathBuf>>,
        fail_on: Option<String>,
    }

    impl FileWriter for RecordingWriter {
        fn write(&self, path: &Path, _bytes: &[u8]) -> Result<()> {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            if name.is_some() && name == self.fail_on {
                return Err(EditorError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "denied",
                )));
            }
            self.written.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    fn hp_source(root: &Path, name: &str, hp: u32) -> SourceFile {
        let mut bytes = vec![0xEEu8; 64];
        bytes[56..60].copy_from_slice(&hp.to_le_bytes());
        SourceFile::new(root.join(name), name, bytes)
    }

    fn loaded(root: &Path) -> RecordSet {
        let spec = presets::hp().unwrap();
        let sources = vec![
            hp_source(root, "em001_00_dttune.48E8AC29", 1000),
            hp_source(root, "em002_00_dttune.48E8AC29", 2000),
        ];
        RecordLoader::new(&spec).load(sources).0
    }

    #[test]
    fn test_nothing_to_save() {
        let mut set = loaded(Path::new("/data"));
        let report = WriteBackManager::default().save(&mut set);
        assert_eq!(report.attempted, 0);
        assert!(report.is_success());
    }

    #[test]
    fn test_only_modified_files_written() {
        let mut set = loaded(Path::new("/data"));
        TransformEngine::new(&mut set)
            .add_delta(1.0, &[], &Selection::Records(vec![1]))
            .unwrap();

        let manager = WriteBackManager::default()
            .with_io(Box::new(DefaultFileReader), Box::new(RecordingWriter::default()));
        let report = manager.save(&mut set);
        assert_eq!(report.attempted, 1);
        assert_eq!(report.written, vec![PathBuf::from("/data/em002_00_dttune.48E8AC29")]);
        assert!(set.modified_files().is_empty());
    }

    #[test]
    fn test_failure_does_not_halt_batch() {
        let mut set = loaded(Path::new("/data"));
        TransformEngine::new(&mut set)
            .apply(Operation::Percentage(10.0), &[], &Selection::All)
            .unwrap();

        let writer = RecordingWriter {
            fail_on: Some("em001_00_dttune.48E8AC29".to_string()),
            ..Default::default()
        };
        let config = WriteBackConfig {
            parallel: true,
            ..Default::default()
        };
        let report = WriteBackManager::new(config)
            .with_io(Box::new(DefaultFileReader), Box::new(writer))
            .save(&mut set);

        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.count_of(ErrorClass::IOError), 1);
        // 失败的文件保持修改状态，可再次保存
        assert_eq!(set.modified_files(), vec![set.find_file("em001_00_dttune.48E8AC29").unwrap()]);
    }

    #[test]
    fn test_cancelled_before_first_file() {
        let mut set = loaded(Path::new("/data"));
        TransformEngine::new(&mut set).add_delta(1.0, &[], &Selection::All).unwrap();

        let token = CancelToken::new();
        token.cancel();
        let report = WriteBackManager::default()
            .with_io(Box::new(DefaultFileReader), Box::new(RecordingWriter::default()))
            .with_cancel_token(token)
            .save(&mut set);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.count_of(ErrorClass::Cancelled), 2);
    }

    #[test]
    fn test_output_root_mirrors_relative_path() {
        let dir = TempDir::new().unwrap();
        let mut set = loaded(&dir.path().join("in"));
        TransformEngine::new(&mut set)
            .add_delta(5.0, &[], &Selection::Records(vec![0]))
            .unwrap();

        let config = WriteBackConfig {
            output_root: Some(dir.path().join("out")),
            ..Default::default()
        };
        let report = WriteBackManager::new(config).save(&mut set);
        assert!(report.is_success());

        let written = std::fs::read(dir.path().join("out/em001_00_dttune.48E8AC29")).unwrap();
        assert_eq!(&written[56..60], &1005u32.to_le_bytes());
        assert!(written[..56].iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn test_scan_root() {
        let file = LoadedFile::new(
            PathBuf::from("/data/game/em001/em001_00"),
            PathBuf::from("em001/em001_00"),
            vec![0u8; 4],
        );
        assert_eq!(scan_root(&file), PathBuf::from("/data/game"));
    }
}
