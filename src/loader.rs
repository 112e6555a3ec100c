/// 加载流程
///
/// 将 (文件标识, 字节) 列表经定位与解码转换为记录集。
/// 单个文件的失败只计入报告并跳过该文件，不会中断整个批次。

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use crate::codec::RecordCodec;
use crate::format::FormatSpec;
use crate::record::{FileId, LoadedFile, Record, RecordSet};
use crate::schema::Schema;
use crate::utils::{ErrorClass, FileFailure, Result};

/// 待加载的源文件
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub relative_path: PathBuf,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, relative_path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            relative_path: relative_path.into(),
            bytes,
        }
    }
}

/// 加载统计
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub files_attempted: usize,
    pub files_loaded: usize,
    pub records_loaded: usize,
    pub failures: Vec<FileFailure>,
}

impl LoadReport {
    /// 某类失败的数量
    pub fn count_of(&self, class: ErrorClass) -> usize {
        self.failures.iter().filter(|f| f.class == class).count()
    }
}

impl std::fmt::Display for LoadReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Loaded {} records from {} of {} files",
            self.records_loaded, self.files_loaded, self.files_attempted
        )?;
        if !self.failures.is_empty() {
            write!(
                f,
                " ({} failed, {} block not found)",
                self.failures.len(),
                self.count_of(ErrorClass::BlockNotFound)
            )?;
        }
        Ok(())
    }
}

/// 记录加载器
pub struct RecordLoader<'a> {
    format: &'a FormatSpec,
    schema: Arc<Schema>,
    codec: RecordCodec,
}

impl<'a> RecordLoader<'a> {
    pub fn new(format: &'a FormatSpec) -> Self {
        let schema = Arc::new(format.schema.clone());
        let codec = RecordCodec::new(Arc::clone(&schema));
        Self { format, schema, codec }
    }

    /// 加载全部源文件
    ///
    /// 返回按格式排序后的记录集与加载报告。
    pub fn load(&self, sources: Vec<SourceFile>) -> (RecordSet, LoadReport) {
        let mut set = RecordSet::new(Arc::clone(&self.schema));
        let mut report = LoadReport::default();

        for source in sources {
            report.files_attempted += 1;
            let path = source.path.clone();
            match self.load_file(&mut set, source) {
                Ok(count) => {
                    report.files_loaded += 1;
                    report.records_loaded += count;
                }
                Err(err) => {
                    warn!(path = %path.display(), class = %err.class(), "skipping file: {}", err);
                    report.failures.push(FileFailure::new(path, &err));
                }
            }
        }

        self.format.sort_records(&mut set);
        info!(format = %self.format.name, "{}", report);
        (set, report)
    }

    /// 加载单个文件；只有全部记录都解码成功才会加入记录集
    fn load_file(&self, set: &mut RecordSet, source: SourceFile) -> Result<usize> {
        let located = self.format.locator.locate(&source.bytes, self.codec.schema())?;

        let mut file = LoadedFile::new(source.path, source.relative_path, source.bytes);
        file.version = located.version;
        let original = Arc::clone(&file.original);
        let file_id = FileId(set.files().len());

        let records: Vec<Record> = located
            .offsets
            .iter()
            .enumerate()
            .map(|(index, &offset)| self.codec.decode(&original, file_id, offset, index))
            .collect::<Result<_>>()?;

        debug!(path = %file.path.display(), records = records.len(), "decoded file");
        let count = records.len();
        set.push_file(file);
        for record in records {
            set.push_record(record)?;
        }
        Ok(count)
    }
}
