/// 文件备份
///
/// 每次保存会话使用一个带时间戳的备份根目录，按文件相对路径镜像存放原始字节。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use crate::io::{FileReader, FileWriter};
use crate::utils::{EditorError, Result};

/// 默认备份目录名
pub const DEFAULT_BACKUP_DIR: &str = "backups";

/// 备份策略
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupPolicy {
    /// 是否在写回前备份
    pub enabled: bool,
    /// 备份基目录；为空时使用扫描根目录下的 `backups`
    pub root: Option<PathBuf>,
    /// 备份失败时是否仍然写回
    pub continue_on_failure: bool,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            root: None,
            continue_on_failure: true,
        }
    }
}

impl BackupPolicy {
    /// 启用备份
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// 备份失败时中止该文件的写回
    pub fn strict(mut self) -> Self {
        self.continue_on_failure = false;
        self
    }
}

/// 单个文件的备份结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// 已写入新备份
    Written(PathBuf),
    /// 会话目录中已有该文件的备份，保持不动
    AlreadyPresent(PathBuf),
}

impl BackupOutcome {
    pub fn path(&self) -> &Path {
        match self {
            BackupOutcome::Written(path) | BackupOutcome::AlreadyPresent(path) => path,
        }
    }
}

/// 一次保存会话的备份目录
#[derive(Debug, Clone)]
pub struct BackupSession {
    root: PathBuf,
}

impl BackupSession {
    /// 在 `base` 下创建以当前时间命名的会话目录（延迟到首次备份时才真正创建）
    ///
    /// 同一秒内已存在同名目录时追加 `-1`、`-2` 等序号，每个会话独占一个目录。
    pub fn start(base: &Path) -> Self {
        let timestamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S").to_string();
        let mut root = base.join(&timestamp);
        let mut suffix = 1;
        while root.exists() {
            root = base.join(format!("{}-{}", timestamp, suffix));
            suffix += 1;
        }
        Self { root }
    }

    /// 使用指定的会话目录
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 文件的备份位置
    pub fn backup_path(&self, relative_path: &Path) -> PathBuf {
        self.root.join(relative_path)
    }

    /// 备份文件的原始字节
    ///
    /// 已存在的备份文件从不覆盖，保证其中始终是第一次备份时的内容。
    pub fn backup(
        &self,
        relative_path: &Path,
        original: &[u8],
        reader: &dyn FileReader,
        writer: &dyn FileWriter,
    ) -> Result<BackupOutcome> {
        let target = self.backup_path(relative_path);

        if reader.exists(&target) {
            debug!(backup = %target.display(), "backup already present; keeping it");
            return Ok(BackupOutcome::AlreadyPresent(target));
        }

        writer.write(&target, original).map_err(|err| match err {
            EditorError::Io(source) => EditorError::Backup {
                path: target.clone(),
                source,
            },
            other => other,
        })?;
        debug!(backup = %target.display(), bytes = original.len(), "backup written");
        Ok(BackupOutcome::Written(target))
    }
}
