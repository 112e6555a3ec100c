/// 字段变更追踪
///
/// 记录每次操作实际写入的字段变更，支持撤销/重做。
/// 一次批量操作（或一次单元格编辑）对应一个变更批次，撤销以批次为单位。

use std::time::Instant;
use crate::datatypes::Value;
use crate::record::CellAddress;

/// 单个字段的变更
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// 单元格地址
    pub address: CellAddress,
    /// 修改前的值
    pub old_value: Value,
    /// 修改后的值
    pub new_value: Value,
}

impl FieldChange {
    pub fn new(address: CellAddress, old_value: Value, new_value: Value) -> Self {
        Self {
            address,
            old_value,
            new_value,
        }
    }
}

impl std::fmt::Display for FieldChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} -> {}", self.address, self.old_value, self.new_value)
    }
}

/// 一次操作产生的变更批次
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    /// 操作描述（如 "percentage +50% on quantity"）
    pub label: String,
    pub changes: Vec<FieldChange>,
    /// 应用时间戳
    pub applied_at: Instant,
}

/// 变更追踪器
///
/// 使用两个栈实现撤销/重做，栈中存储 `batches` 的索引。
#[derive(Debug, Clone, Default)]
pub struct ChangeDelta {
    batches: Vec<ChangeBatch>,
    undo_stack: Vec<usize>,
    redo_stack: Vec<usize>,
}

impl ChangeDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个批次
    ///
    /// 空批次不记录；新批次会清空重做栈。
    pub fn record(&mut self, label: impl Into<String>, changes: Vec<FieldChange>) {
        if changes.is_empty() {
            return;
        }
        let index = self.batches.len();
        self.batches.push(ChangeBatch {
            label: label.into(),
            changes,
            applied_at: Instant::now(),
        });
        self.undo_stack.push(index);
        self.redo_stack.clear();
    }

    /// 弹出最后一个有效批次，返回需要回滚的变更
    pub fn undo(&mut self) -> Option<&ChangeBatch> {
        let index = self.undo_stack.pop()?;
        self.redo_stack.push(index);
        Some(&self.batches[index])
    }

    /// 重新应用最后一次撤销的批次
    pub fn redo(&mut self) -> Option<&ChangeBatch> {
        let index = self.redo_stack.pop()?;
        self.undo_stack.push(index);
        Some(&self.batches[index])
    }

    /// 有效批次数
    /// 下一个将被撤销的批次（不移动栈）
    pub fn peek_undo(&self) -> Option<&ChangeBatch> {
        self.undo_stack.last().map(|&i| &self.batches[i])
    }

    /// 下一个将被重做的批次（不移动栈）
    pub fn peek_redo(&self) -> Option<&ChangeBatch> {
        self.redo_stack.last().map(|&i| &self.batches[i])
    }

    pub fn len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo_stack.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// 按应用顺序遍历有效批次
    pub fn iter(&self) -> impl Iterator<Item = &ChangeBatch> {
        self.undo_stack.iter().map(|&i| &self.batches[i])
    }

    /// 有效的字段变更总数
    pub fn change_count(&self) -> usize {
        self.iter().map(|b| b.changes.len()).sum()
    }

    /// 某条记录的全部有效变更
    pub fn changes_for_record(&self, file: &str, record_index: usize) -> Vec<&FieldChange> {
        self.iter()
            .flat_map(|b| b.changes.iter())
            .filter(|c| c.address.file == file && c.address.record_index == record_index)
            .collect()
    }

    pub fn clear(&mut self) {
        self.batches.clear();
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn summary(&self) -> String {
        format!(
            "batches: {}, active: {}, field changes: {}, can undo: {}, can redo: {}",
            self.batches.len(),
            self.undo_stack.len(),
            self.change_count(),
            self.can_undo(),
            self.can_redo()
        )
    }
}
