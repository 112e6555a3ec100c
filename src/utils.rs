use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// 自定义错误类型
///
/// 除 `Schema` 外，所有错误都在文件边界被捕获并计入报告，不会中断批处理。
#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Format error: {0}")]
    Format(String),

    #[error("Truncated record at 0x{offset:X}: need {needed} bytes, only {available} available")]
    TruncatedRecord {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Block not found in scan window 0x{start:X}..=0x{end:X}")]
    BlockNotFound { start: usize, end: usize },

    #[error("Value {value} out of range [{min}, {max}] for field '{field}'")]
    Range {
        field: String,
        value: String,
        min: String,
        max: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Unknown record index: {0}")]
    UnknownRecord(usize),

    #[error("Unknown file: {0}")]
    UnknownFile(String),

    #[error("Field '{0}' is not editable")]
    FieldNotEditable(String),

    #[error("Backup of {path:?} failed: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Target {0:?} is read-only")]
    ReadOnlyTarget(PathBuf),

    #[error("Operation cancelled")]
    Cancelled,
}

/// 库内统一的 Result 别名
pub type Result<T> = std::result::Result<T, EditorError>;

/// 错误分类（用于失败报告）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorClass {
    SchemaError,
    FormatError,
    TruncatedRecord,
    BlockNotFound,
    RangeError,
    IOError,
    Cancelled,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::SchemaError => "SchemaError",
            ErrorClass::FormatError => "FormatError",
            ErrorClass::TruncatedRecord => "TruncatedRecord",
            ErrorClass::BlockNotFound => "BlockNotFound",
            ErrorClass::RangeError => "RangeError",
            ErrorClass::IOError => "IOError",
            ErrorClass::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

impl EditorError {
    /// 获取错误分类
    pub fn class(&self) -> ErrorClass {
        match self {
            EditorError::Schema(_) => ErrorClass::SchemaError,
            EditorError::Format(_) | EditorError::Json(_) => ErrorClass::FormatError,
            EditorError::TruncatedRecord { .. } => ErrorClass::TruncatedRecord,
            EditorError::BlockNotFound { .. } => ErrorClass::BlockNotFound,
            EditorError::Range { .. }
            | EditorError::UnknownField(_)
            | EditorError::UnknownRecord(_)
            | EditorError::UnknownFile(_)
            | EditorError::FieldNotEditable(_) => ErrorClass::RangeError,
            EditorError::Io(_) | EditorError::Backup { .. } | EditorError::ReadOnlyTarget(_) => {
                ErrorClass::IOError
            }
            EditorError::Cancelled => ErrorClass::Cancelled,
        }
    }

    pub(crate) fn schema(msg: impl Into<String>) -> Self {
        EditorError::Schema(msg.into())
    }

    pub(crate) fn format(msg: impl Into<String>) -> Self {
        EditorError::Format(msg.into())
    }
}

/// 单个文件的失败记录
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub class: ErrorClass,
    pub reason: String,
}

impl FileFailure {
    pub fn new(path: impl Into<PathBuf>, error: &EditorError) -> Self {
        Self {
            path: path.into(),
            class: error.class(),
            reason: error.to_string(),
        }
    }
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.path.display(), self.class, self.reason)
    }
}

/// 每秒的游戏刻数（计时字段的显示换算）
pub const TICKS_PER_SECOND: f64 = 30.0;

/// 刻数转换为秒
pub fn ticks_to_seconds(ticks: i64) -> f64 {
    ticks as f64 / TICKS_PER_SECOND
}

/// 秒转换为刻数（四舍五入）
pub fn seconds_to_ticks(seconds: f64) -> i64 {
    (seconds * TICKS_PER_SECOND).round() as i64
}

/// 简单的文件名通配符匹配
///
/// 支持 `*`（任意长度）和 `?`（单个字符），大小写敏感。
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();

    let (mut pi, mut ni) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut mark = 0usize;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ni;
            pi += 1;
        } else if let Some(s) = star {
            // 回溯：让上一个 `*` 多吞一个字符
            pi = s + 1;
            mark += 1;
            ni = mark;
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

/// 检查文件名是否以任一排除前缀开头（忽略大小写）
pub fn has_excluded_prefix(name: &str, prefixes: &[String]) -> bool {
    let lower = name.to_lowercase();
    prefixes
        .iter()
        .any(|prefix| lower.starts_with(&prefix.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("em*_*_dttune.48E8AC29", "em001_00_dttune.48E8AC29"));
        assert!(glob_match("em*_*_dttune.48E8AC29", "ems042_01_dttune.48E8AC29"));
        assert!(glob_match("*em_resident_dtbase.583F70B0", "em_resident_dtbase.583F70B0"));
        assert!(glob_match("file?.bin", "file1.bin"));
        assert!(!glob_match("em*_*_dttune.48E8AC29", "em001_00_dttune.48E8AC2"));
        assert!(!glob_match("file?.bin", "file12.bin"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn test_excluded_prefix() {
        let prefixes = vec!["ems".to_string()];
        assert!(has_excluded_prefix("ems001_00_dttune.48E8AC29", &prefixes));
        assert!(has_excluded_prefix("EMS001_00_dttune.48E8AC29", &prefixes));
        assert!(!has_excluded_prefix("em001_00_dttune.48E8AC29", &prefixes));
    }

    #[test]
    fn test_ticks() {
        assert_eq!(ticks_to_seconds(90), 3.0);
        assert_eq!(seconds_to_ticks(1.5), 45);
    }

    #[test]
    fn test_error_class() {
        let err = EditorError::BlockNotFound { start: 0xD0, end: 0x2D0 };
        assert_eq!(err.class(), ErrorClass::BlockNotFound);
        assert_eq!(err.class().to_string(), "BlockNotFound");

        let io = EditorError::from(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"));
        assert_eq!(io.class(), ErrorClass::IOError);
        assert_eq!(EditorError::ReadOnlyTarget(PathBuf::from("a")).class(), ErrorClass::IOError);
    }
}
