/// 记录编辑器
///
/// 有状态的编辑接口：持有记录集与变更追踪器，所有修改仅在内存中进行，
/// 需要显式调用 [`RecordEditor::save`] 写回文件。

use crate::cells::{CellValue, ImportReport};
use crate::datatypes::Value;
use crate::record::{CellAddress, RecordSet};
use crate::utils::{EditorError, Result};
use crate::writeback::{SaveReport, WriteBackManager};
use super::delta::{ChangeDelta, FieldChange};
use super::transform::{Operation, Selection, TransformEngine, TransformReport};

/// 记录编辑器
///
/// ```rust,ignore
/// let (set, _) = RecordLoader::new(&format).load(sources);
/// let mut editor = RecordEditor::new(set);
///
/// editor.apply(Operation::Percentage(50.0), &["base_hp".into()], &Selection::All)?;
/// println!("{}", editor.summary());
///
/// let report = editor.save(&WriteBackManager::default());
/// ```
pub struct RecordEditor {
    set: RecordSet,
    modifications: ChangeDelta,
}

impl RecordEditor {
    pub fn new(set: RecordSet) -> Self {
        Self {
            set,
            modifications: ChangeDelta::new(),
        }
    }

    /// 批量变换
    pub fn apply(&mut self, op: Operation, fields: &[String], selection: &Selection) -> Result<TransformReport> {
        let mut report = TransformEngine::new(&mut self.set).apply(op, fields, selection)?;
        let label = if fields.is_empty() {
            format!("{} on all fields", op)
        } else {
            format!("{} on {}", op, fields.join(", "))
        };
        self.modifications.record(label, std::mem::take(&mut report.changes));
        Ok(report)
    }

    /// 单元格编辑
    pub fn set_cell(&mut self, address: &CellAddress, value: Value) -> Result<TransformReport> {
        let mut report = TransformEngine::new(&mut self.set).set_cell(address, value)?;
        self.modifications
            .record(format!("set {} = {}", address, value), std::mem::take(&mut report.changes));
        Ok(report)
    }

    /// 导入单元格列表，整个导入作为一个变更批次
    pub fn import_cells(&mut self, cells: &[CellValue]) -> ImportReport {
        let mut report = crate::cells::import_cells(&mut self.set, cells);
        self.modifications
            .record(format!("import {} cells", cells.len()), std::mem::take(&mut report.changes));
        report
    }

    pub fn get(&self, address: &CellAddress) -> Result<Value> {
        self.set.get_value(address)
    }

    /// 撤销最后一个批次；没有可撤销的操作时返回 `false`
    ///
    /// 地址全部解析成功后才移动撤销栈，失败时记录值与变更栈都保持原状。
    pub fn undo(&mut self) -> Result<bool> {
        let Some(batch) = self.modifications.peek_undo() else {
            return Ok(false);
        };
        let restore: Vec<(CellAddress, Value)> = batch
            .changes
            .iter()
            .rev()
            .map(|c| (c.address.clone(), c.old_value))
            .collect();
        let resolved = resolve_values(&self.set, &restore)?;
        self.modifications.undo();
        apply_values(&mut self.set, resolved);
        Ok(true)
    }

    /// 重做最后一次撤销的批次
    pub fn redo(&mut self) -> Result<bool> {
        let Some(batch) = self.modifications.peek_redo() else {
            return Ok(false);
        };
        let restore: Vec<(CellAddress, Value)> = batch
            .changes
            .iter()
            .map(|c| (c.address.clone(), c.new_value))
            .collect();
        let resolved = resolve_values(&self.set, &restore)?;
        self.modifications.redo();
        apply_values(&mut self.set, resolved);
        Ok(true)
    }

    /// 写回所有已修改的文件
    pub fn save(&mut self, manager: &WriteBackManager) -> SaveReport {
        manager.save(&mut self.set)
    }

    pub fn is_modified(&self) -> bool {
        !self.set.modified_files().is_empty()
    }

    /// 有效的变更批次数
    pub fn modified_count(&self) -> usize {
        self.modifications.len()
    }

    pub fn modifications(&self) -> &ChangeDelta {
        &self.modifications
    }

    /// 某条记录的有效变更
    pub fn changes_for_record(&self, file: &str, record_index: usize) -> Vec<&FieldChange> {
        self.modifications.changes_for_record(file, record_index)
    }

    pub fn records(&self) -> &RecordSet {
        &self.set
    }

    pub fn into_records(self) -> RecordSet {
        self.set
    }

    pub fn summary(&self) -> String {
        format!(
            "{} records in {} files, {} modified files, {}",
            self.set.len(),
            self.set.files().len(),
            self.set.modified_files().len(),
            self.modifications.summary()
        )
    }
}

/// 将单元格地址解析为 (行, 字段) 位置
fn resolve_values(set: &RecordSet, values: &[(CellAddress, Value)]) -> Result<Vec<(usize, usize, Value)>> {
    values
        .iter()
        .map(|(address, value)| {
            let row = set.locate_row(&address.file, address.record_index)?;
            let field = set
                .schema()
                .index_of(&address.field)
                .ok_or_else(|| EditorError::UnknownField(address.field.clone()))?;
            Ok((row, field, *value))
        })
        .collect()
}

/// 撤销/重做时直接恢复记录值，不经过保护与钳制
fn apply_values(set: &mut RecordSet, resolved: Vec<(usize, usize, Value)>) {
    let records = set.records_mut();
    for (row, field, value) in resolved {
        records[row].values[field] = value;
    }
}
