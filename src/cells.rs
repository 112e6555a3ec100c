/// 单元格导入导出
///
/// 以 (文件标识, 记录序号, 字段名) 寻址，将记录值导出为 JSON 列表，
/// 或把这样的列表重新应用到记录集。导入走单元格编辑路径，保护、范围与可编辑规则全部生效。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};
use crate::datatypes::Value;
use crate::editor::{FieldChange, TransformEngine};
use crate::record::{CellAddress, RecordSet};
use crate::utils::{ErrorClass, Result};

/// 一个单元格的值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellValue {
    #[serde(flatten)]
    pub address: CellAddress,
    pub value: Value,
}

/// 被拒绝的单元格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedCell {
    pub address: CellAddress,
    pub class: ErrorClass,
    pub reason: String,
}

/// 导入统计
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    /// 实际修改的单元格
    pub applied: usize,
    /// 值未变化的单元格
    pub unchanged: usize,
    /// 受保护而未修改的单元格
    pub protected: usize,
    pub rejected: Vec<RejectedCell>,
    pub changes: Vec<FieldChange>,
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} applied, {} unchanged, {} protected, {} rejected",
            self.applied,
            self.unchanged,
            self.protected,
            self.rejected.len()
        )
    }
}

/// 导出全部单元格（按记录顺序、字段顺序）
pub fn export_cells(set: &RecordSet) -> Vec<CellValue> {
    let width = set.schema().len();
    let mut cells = Vec::with_capacity(set.len() * width);
    for (row, record) in set.records().iter().enumerate() {
        for (field, value) in record.values().iter().enumerate() {
            if let Some(address) = set.address_of(row, field) {
                cells.push(CellValue { address, value: *value });
            }
        }
    }
    cells
}

pub fn export_json(set: &RecordSet) -> Result<String> {
    Ok(serde_json::to_string_pretty(&export_cells(set))?)
}

pub fn parse_cells(json: &str) -> Result<Vec<CellValue>> {
    Ok(serde_json::from_str(json)?)
}

pub fn read_cells_file(path: &Path) -> Result<Vec<CellValue>> {
    parse_cells(&std::fs::read_to_string(path)?)
}

/// 逐个应用单元格
///
/// 单个单元格失败只记入 `rejected`，不影响其它单元格。
pub fn import_cells(set: &mut RecordSet, cells: &[CellValue]) -> ImportReport {
    let mut report = ImportReport::default();
    let mut engine = TransformEngine::new(set);

    for cell in cells {
        match engine.set_cell(&cell.address, cell.value) {
            Ok(mut outcome) if outcome.changed > 0 => {
                report.applied += 1;
                report.changes.append(&mut outcome.changes);
            }
            Ok(outcome) if outcome.protected > 0 => report.protected += 1,
            Ok(_) => report.unchanged += 1,
            Err(err) => {
                debug!(cell = %cell.address, "rejected: {}", err);
                report.rejected.push(RejectedCell {
                    address: cell.address.clone(),
                    class: err.class(),
                    reason: err.to_string(),
                });
            }
        }
    }

    info!("cell import: {}", report);
    report
}
