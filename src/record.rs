use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use crate::datatypes::Value;
use crate::schema::Schema;
use crate::utils::{EditorError, Result};

/// 记录集中文件的序号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub usize);

/// 已加载的源文件
#[derive(Debug, Clone)]
pub struct LoadedFile {
    /// 文件路径（读取与写回的位置）
    pub path: PathBuf,
    /// 相对于扫描根目录的路径（备份与输出目录按此镜像）
    pub relative_path: PathBuf,
    /// 文件的原始完整内容
    pub original: Arc<[u8]>,
    /// 文件头中的格式版本
    pub version: Option<u32>,
}

impl LoadedFile {
    pub fn new(path: PathBuf, relative_path: PathBuf, bytes: Vec<u8>) -> Self {
        Self {
            path,
            relative_path,
            original: Arc::from(bytes),
            version: None,
        }
    }

    /// 对外使用的文件标识（相对路径，统一为 `/` 分隔）
    pub fn identifier(&self) -> String {
        self.relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// 文件名
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// 一个绑定到文件位置的记录实例
#[derive(Debug, Clone)]
pub struct Record {
    pub(crate) file: FileId,
    pub(crate) block_offset: usize,
    pub(crate) record_index: usize,
    /// 当前值，与 Schema 字段顺序一一对应
    pub(crate) values: Vec<Value>,
    /// 加载（或上次保存）时的值
    pub(crate) baseline: Vec<Value>,
    /// 所属文件的原始完整内容
    pub(crate) original: Arc<[u8]>,
}

impl Record {
    pub(crate) fn new(
        file: FileId,
        block_offset: usize,
        record_index: usize,
        values: Vec<Value>,
        original: Arc<[u8]>,
    ) -> Self {
        Self {
            file,
            block_offset,
            record_index,
            baseline: values.clone(),
            values,
            original,
        }
    }

    pub fn file(&self) -> FileId {
        self.file
    }

    /// 块在文件中的绝对偏移
    pub fn block_offset(&self) -> usize {
        self.block_offset
    }

    /// 同一文件内的记录序号
    pub fn record_index(&self) -> usize {
        self.record_index
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// 文件的原始字节
    pub fn original_bytes(&self) -> &[u8] {
        &self.original
    }

    /// 按字段名读取当前值
    pub fn get(&self, schema: &Schema, field: &str) -> Option<Value> {
        schema.index_of(field).and_then(|i| self.values.get(i).copied())
    }

    /// 当前值是否偏离加载时的值
    pub fn is_modified(&self) -> bool {
        self.values
            .iter()
            .zip(&self.baseline)
            .any(|(a, b)| !a.bit_eq(*b))
    }

    /// 值是否逐位相同
    pub fn same_values(&self, other: &Record) -> bool {
        self.values.len() == other.values.len()
            && self.values.iter().zip(&other.values).all(|(a, b)| a.bit_eq(*b))
    }
}

/// 单元格地址：(文件标识, 记录序号, 字段名)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellAddress {
    pub file: String,
    pub record_index: usize,
    pub field: String,
}

impl CellAddress {
    pub fn new(file: impl Into<String>, record_index: usize, field: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            record_index,
            field: field.into(),
        }
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}.{}", self.file, self.record_index, self.field)
    }
}

/// 记录集
///
/// 独占所有记录及其背后的字节缓冲区；记录的生命周期不会超过记录集。
#[derive(Debug, Clone)]
pub struct RecordSet {
    schema: Arc<Schema>,
    files: Vec<LoadedFile>,
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            files: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn files(&self) -> &[LoadedFile] {
        &self.files
    }

    pub fn file(&self, id: FileId) -> Option<&LoadedFile> {
        self.files.get(id.0)
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, row: usize) -> Option<&Record> {
        self.records.get(row)
    }

    pub(crate) fn records_mut(&mut self) -> &mut [Record] {
        &mut self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 清空记录集（释放所有记录与缓冲区）
    pub fn clear(&mut self) {
        self.records.clear();
        self.files.clear();
    }

    /// 注册一个文件
    pub(crate) fn push_file(&mut self, file: LoadedFile) -> FileId {
        self.files.push(file);
        FileId(self.files.len() - 1)
    }

    /// 加入一条记录
    ///
    /// 记录块必须完整位于所属文件内容中。
    pub(crate) fn push_record(&mut self, record: Record) -> Result<()> {
        let end = record.block_offset + self.schema.total_width();
        if end > record.original.len() {
            return Err(EditorError::TruncatedRecord {
                offset: record.block_offset,
                needed: self.schema.total_width(),
                available: record.original.len().saturating_sub(record.block_offset),
            });
        }
        self.records.push(record);
        Ok(())
    }

    /// 按文件标识（相对路径或完整路径）查找文件
    pub fn find_file(&self, identifier: &str) -> Option<FileId> {
        self.files
            .iter()
            .position(|f| f.identifier() == identifier || f.path == Path::new(identifier))
            .map(FileId)
    }

    /// 根据单元格地址找到记录所在行
    pub fn locate_row(&self, file: &str, record_index: usize) -> Result<usize> {
        let file_id = self
            .find_file(file)
            .ok_or_else(|| EditorError::UnknownFile(file.to_string()))?;
        self.records
            .iter()
            .position(|r| r.file == file_id && r.record_index == record_index)
            .ok_or(EditorError::UnknownRecord(record_index))
    }

    /// 读取单元格的当前值
    pub fn get_value(&self, address: &CellAddress) -> Result<Value> {
        let row = self.locate_row(&address.file, address.record_index)?;
        let field = self
            .schema
            .index_of(&address.field)
            .ok_or_else(|| EditorError::UnknownField(address.field.clone()))?;
        Ok(self.records[row].values[field])
    }

    /// 单元格地址（按行与字段序号）
    pub fn address_of(&self, row: usize, field: usize) -> Option<CellAddress> {
        let record = self.records.get(row)?;
        let file = self.file(record.file)?;
        let descriptor = self.schema.fields().get(field)?;
        Some(CellAddress::new(file.identifier(), record.record_index, descriptor.name.clone()))
    }

    /// 某文件的全部记录
    pub fn records_of(&self, file: FileId) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(move |r| r.file == file)
    }

    /// 包含已修改记录的文件（按文件序号）
    pub fn modified_files(&self) -> Vec<FileId> {
        let mut ids: Vec<FileId> = self
            .records
            .iter()
            .filter(|r| r.is_modified())
            .map(|r| r.file)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// 保存成功后推进文件快照
    ///
    /// 文件与其所有记录的原始字节替换为新内容，基线值同步为当前值。
    pub(crate) fn commit_file(&mut self, file: FileId, content: Arc<[u8]>) {
        if let Some(loaded) = self.files.get_mut(file.0) {
            loaded.original = Arc::clone(&content);
        }
        for record in self.records.iter_mut().filter(|r| r.file == file) {
            record.original = Arc::clone(&content);
            record.baseline = record.values.clone();
        }
    }

    /// 按比较函数重排记录（稳定排序）
    pub fn sort_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&LoadedFile, &Record, &LoadedFile, &Record) -> std::cmp::Ordering,
    {
        let files = &self.files;
        self.records.sort_by(|a, b| {
            compare(&files[a.file.0], a, &files[b.file.0], b)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::NumericKind;
    use crate::schema::FieldDescriptor;

    fn sample_set() -> RecordSet {
        let schema = Schema::new("hp", 4, vec![FieldDescriptor::new("base_hp", 0, NumericKind::Unsigned, 4)]).unwrap();
        let mut set = RecordSet::new(Arc::new(schema));
        let file = LoadedFile::new(PathBuf::from("/data/em001_00_dttune"), PathBuf::from("sub/em001_00_dttune"), vec![0u8; 8]);
        let original = Arc::clone(&file.original);
        let id = set.push_file(file);
        set.push_record(Record::new(id, 4, 0, vec![Value::Int(100)], original)).unwrap();
        set
    }

    #[test]
    fn test_get_value_by_address() {
        let set = sample_set();
        let address = CellAddress::new("sub/em001_00_dttune", 0, "base_hp");
        assert_eq!(set.get_value(&address).unwrap(), Value::Int(100));

        let missing = CellAddress::new("sub/em001_00_dttune", 0, "nope");
        assert!(matches!(set.get_value(&missing), Err(EditorError::UnknownField(_))));

        let bad_file = CellAddress::new("other", 0, "base_hp");
        assert!(matches!(set.get_value(&bad_file), Err(EditorError::UnknownFile(_))));
    }

    #[test]
    fn test_push_record_past_end_rejected() {
        let mut set = sample_set();
        let original = Arc::clone(&set.files()[0].original);
        let result = set.push_record(Record::new(FileId(0), 6, 1, vec![Value::Int(1)], original));
        assert!(matches!(result, Err(EditorError::TruncatedRecord { .. })));
    }

    #[test]
    fn test_modified_and_commit() {
        let mut set = sample_set();
        assert!(set.modified_files().is_empty());

        set.records_mut()[0].values[0] = Value::Int(150);
        assert_eq!(set.modified_files(), vec![FileId(0)]);

        set.commit_file(FileId(0), Arc::from(vec![1u8; 8]));
        assert!(set.modified_files().is_empty());
        assert_eq!(set.records()[0].original_bytes(), &[1u8; 8][..]);
    }

    #[test]
    fn test_identifier_uses_forward_slashes() {
        let set = sample_set();
        assert_eq!(set.files()[0].identifier(), "sub/em001_00_dttune");
        assert_eq!(set.address_of(0, 0).unwrap().to_string(), "sub/em001_00_dttune#0.base_hp");
    }
}
