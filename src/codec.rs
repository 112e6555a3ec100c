/// 记录编解码
///
/// 按 Schema 将块字节解码为字段值，或将记录的当前值重新编码为块字节。
/// 所有数值固定使用小端字节序。

use std::io::Cursor;
use std::sync::Arc;
use crate::datatypes::{read_value, write_value, Value};
use crate::record::{FileId, Record};
use crate::schema::Schema;
use crate::utils::{EditorError, Result};

/// 记录编解码器
#[derive(Debug, Clone)]
pub struct RecordCodec {
    schema: Arc<Schema>,
}

impl RecordCodec {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// 解码 `base` 处的字段值（按 Schema 字段顺序）
    pub fn decode_values(&self, bytes: &[u8], base: usize) -> Result<Vec<Value>> {
        let width = self.schema.total_width();
        if base + width > bytes.len() {
            return Err(EditorError::TruncatedRecord {
                offset: base,
                needed: width,
                available: bytes.len().saturating_sub(base),
            });
        }

        let mut cursor = Cursor::new(bytes);
        self.schema
            .fields()
            .iter()
            .map(|field| {
                cursor.set_position((base + field.offset) as u64);
                read_value(&mut cursor, field.kind, field.width).map_err(EditorError::from)
            })
            .collect()
    }

    /// 解码为绑定到文件位置的记录
    pub fn decode(&self, source: &Arc<[u8]>, file: FileId, base: usize, record_index: usize) -> Result<Record> {
        let values = self.decode_values(source, base)?;
        Ok(Record::new(file, base, record_index, values, Arc::clone(source)))
    }

    /// 将记录的当前值编码为块字节
    ///
    /// 以记录原始块字节为底，字段之间的填充与未建模字节原样保留。
    pub fn encode(&self, record: &Record) -> Result<Vec<u8>> {
        let width = self.schema.total_width();
        let start = record.block_offset();
        let original = record.original_bytes();
        let mut block = original
            .get(start..start + width)
            .ok_or(EditorError::TruncatedRecord {
                offset: start,
                needed: width,
                available: original.len().saturating_sub(start),
            })?
            .to_vec();

        let mut cursor = Cursor::new(block.as_mut_slice());
        for (field, value) in self.schema.fields().iter().zip(record.values()) {
            cursor.set_position(field.offset as u64);
            write_value(&mut cursor, field.kind, field.width, *value)?;
        }

        Ok(block)
    }

    /// 将记录编码后拼接到文件内容的副本中
    pub fn splice_into(&self, content: &mut [u8], record: &Record) -> Result<()> {
        let block = self.encode(record)?;
        let start = record.block_offset();
        let target = content
            .get_mut(start..start + block.len())
            .ok_or(EditorError::TruncatedRecord {
                offset: start,
                needed: block.len(),
                available: 0,
            })?;
        target.copy_from_slice(&block);
        Ok(())
    }
}
