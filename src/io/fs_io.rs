/// 文件系统 IO 实现
///
/// 基于 std::fs 的默认读写实现。写入先落到同目录下的临时文件，
/// 再重命名覆盖目标。

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use super::traits::{FileReader, FileWriter};
use crate::utils::{EditorError, Result};

/// 默认文件读取器
#[derive(Debug, Clone, Default)]
pub struct DefaultFileReader;

impl FileReader for DefaultFileReader {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(path)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// 默认文件写入器
#[derive(Debug, Clone, Default)]
pub struct DefaultFileWriter;

impl DefaultFileWriter {
    fn temp_path(path: &Path) -> PathBuf {
        let mut name: OsString = OsString::from(".");
        name.push(path.file_name().unwrap_or_default());
        name.push(format!(".tmp{}", std::process::id()));
        path.with_file_name(name)
    }
}

impl FileWriter for DefaultFileWriter {
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        // 只读属性对超级用户同样生效
        if let Ok(metadata) = fs::metadata(path) {
            if metadata.permissions().readonly() {
                return Err(EditorError::ReadOnlyTarget(path.to_path_buf()));
            }
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp = Self::temp_path(path);
        if let Err(err) = fs::write(&temp, bytes) {
            let _ = fs::remove_file(&temp);
            return Err(err.into());
        }
        if let Err(err) = fs::rename(&temp, path) {
            warn!(target = %path.display(), "rename failed: {}", err);
            let _ = fs::remove_file(&temp);
            return Err(err.into());
        }
        Ok(())
    }
}
