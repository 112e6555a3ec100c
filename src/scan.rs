/// 目录扫描
///
/// 遍历根目录，按格式的文件名通配符与排除前缀筛选候选文件，
/// 读取其内容交给加载流程。备份目录与输出目录可整体排除。

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;
use crate::format::FormatSpec;
use crate::loader::SourceFile;
use crate::utils::{EditorError, FileFailure, Result};

/// 扫描结果
#[derive(Debug, Default)]
pub struct ScanResult {
    /// 读取成功的候选文件（按路径排序）
    pub files: Vec<SourceFile>,
    /// 文件名匹配通配符的文件数
    pub matched: usize,
    /// 因排除前缀被跳过的文件数
    pub excluded: usize,
    /// 空文件数
    pub empty: usize,
    /// 读取失败的文件
    pub failures: Vec<FileFailure>,
}

/// 扫描目录下属于该格式的文件
///
/// `excluded_dirs` 中的目录（及其子目录）不会被遍历。
/// 根目录不存在时返回错误；单个文件读取失败只计入结果。
pub fn scan_directory(root: &Path, format: &FormatSpec, excluded_dirs: &[PathBuf]) -> Result<ScanResult> {
    if !root.is_dir() {
        return Err(EditorError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", root.display()),
        )));
    }

    // 同时按原样与规范化后的路径比较，调用方给出的相对/绝对写法都能命中
    let mut excluded: Vec<PathBuf> = excluded_dirs.to_vec();
    excluded.extend(excluded_dirs.iter().filter_map(|dir| std::fs::canonicalize(dir).ok()));

    let mut result = ScanResult::default();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && is_excluded_dir(entry.path(), &excluded)));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                warn!(path = %path.display(), "walk error: {}", err);
                let io = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                result.failures.push(FileFailure::new(path, &EditorError::Io(io)));
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if !crate::utils::glob_match(&format.file_pattern, &name) {
            continue;
        }
        result.matched += 1;
        if !format.matches_file_name(&name) {
            debug!(file = %name, "excluded by prefix");
            result.excluded += 1;
            continue;
        }

        let path = entry.path().to_path_buf();
        let relative = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => {
                debug!(path = %path.display(), "skipping empty file");
                result.empty += 1;
            }
            Ok(bytes) => result.files.push(SourceFile::new(path, relative, bytes)),
            Err(err) => {
                warn!(path = %path.display(), "read failed: {}", err);
                result.failures.push(FileFailure::new(path, &EditorError::Io(err)));
            }
        }
    }

    debug!(
        root = %root.display(),
        candidates = result.files.len(),
        excluded = result.excluded,
        "scan finished"
    );
    Ok(result)
}

fn is_excluded_dir(path: &Path, excluded_dirs: &[PathBuf]) -> bool {
    if excluded_dirs.is_empty() {
        return false;
    }
    excluded_dirs.iter().any(|dir| path.starts_with(dir))
        || std::fs::canonicalize(path).is_ok_and(|real| excluded_dirs.iter().any(|dir| real.starts_with(dir)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::presets;
    use tempfile::TempDir;

    #[test]
    fn test_scan_filters_and_excludes() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("em001")).unwrap();
        std::fs::create_dir_all(root.join("backups/em002")).unwrap();

        std::fs::write(root.join("em001/em001_00_dttune.48E8AC29"), [1u8; 64]).unwrap();
        std::fs::write(root.join("em001/ems001_00_dttune.48E8AC29"), [1u8; 64]).unwrap();
        std::fs::write(root.join("em001/em001_01_dttune.48E8AC29"), []).unwrap();
        std::fs::write(root.join("em001/notes.txt"), b"hello").unwrap();
        std::fs::write(root.join("backups/em002/em002_00_dttune.48E8AC29"), [1u8; 64]).unwrap();

        let spec = presets::hp().unwrap();
        let result = scan_directory(root, &spec, &[root.join("backups")]).unwrap();

        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].relative_path, PathBuf::from("em001/em001_00_dttune.48E8AC29"));
        assert_eq!(result.matched, 3);
        assert_eq!(result.excluded, 1);
        assert_eq!(result.empty, 1);
        assert!(result.failures.is_empty());
    }

    #[test]
    fn test_scan_skips_custom_backup_and_output_dirs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for sub in ["em001", "my_backups/2026-01-01-00-00-00/em001", "out/em001"] {
            std::fs::create_dir_all(root.join(sub)).unwrap();
            std::fs::write(root.join(sub).join("em001_00_dttune.48E8AC29"), [1u8; 64]).unwrap();
        }

        let spec = presets::hp().unwrap();
        let all = scan_directory(root, &spec, &[]).unwrap();
        assert_eq!(all.files.len(), 3);

        // 排除目录用规范化路径给出，扫描根用原始路径
        let canonical = std::fs::canonicalize(root).unwrap();
        let excluded = vec![canonical.join("my_backups"), root.join("out")];
        let result = scan_directory(root, &spec, &excluded).unwrap();
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].relative_path, PathBuf::from("em001/em001_00_dttune.48E8AC29"));
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = TempDir::new().unwrap();
        let spec = presets::hp().unwrap();
        let result = scan_directory(&dir.path().join("missing"), &spec, &[]);
        assert!(matches!(result, Err(EditorError::Io(_))));
    }
}
