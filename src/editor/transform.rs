/// 批量数值变换
///
/// 对所选记录的所选字段执行百分比、倍率、赋值、加减操作。
/// 每个 (记录, 字段) 依次经过：保护检查 → 计算 → 取整 → 钳制 → 无变化省略。
/// 保护检查基于操作开始前的记录快照，同一记录内的字段顺序不影响结果。

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};
use crate::datatypes::Value;
use crate::record::{CellAddress, RecordSet};
use crate::schema::{FieldDescriptor, Schema};
use crate::utils::{has_excluded_prefix, EditorError, Result};
use super::delta::FieldChange;

/// 变换操作
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "operand", rename_all = "snake_case")]
pub enum Operation {
    /// `new = current * (1 + p/100)`
    Percentage(f64),
    /// `new = current * m`
    Multiplier(f64),
    /// `new = v`
    Literal(Value),
    /// `new = current + d`
    Add(f64),
    /// `new = current - d`
    Subtract(f64),
}

impl Operation {
    /// 计算新值（未取整、未钳制）
    fn compute(&self, current: f64) -> f64 {
        match *self {
            Operation::Percentage(p) => current * (1.0 + p / 100.0),
            Operation::Multiplier(m) => current * m,
            Operation::Literal(v) => v.as_f64(),
            Operation::Add(d) => current + d,
            Operation::Subtract(d) => current - d,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Percentage(p) => write!(f, "{:+}%", p),
            Operation::Multiplier(m) => write!(f, "x{}", m),
            Operation::Literal(v) => write!(f, "={}", v),
            Operation::Add(d) => write!(f, "+{}", d),
            Operation::Subtract(d) => write!(f, "-{}", d),
        }
    }
}

/// 记录筛选条件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum RecordFilter {
    /// 字段值严格大于给定值
    FieldGreaterThan { field: String, value: f64 },
    /// 文件名以给定前缀开头（忽略大小写）
    FileNamePrefix { prefix: String },
}

/// 目标记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "select", content = "args", rename_all = "snake_case")]
pub enum Selection {
    /// 当前加载的全部记录
    #[default]
    All,
    /// 指定行号
    Records(Vec<usize>),
    /// 满足全部条件的记录
    Filtered(Vec<RecordFilter>),
}

/// 变换统计
#[derive(Debug, Clone, Default)]
pub struct TransformReport {
    /// 检查过的 (记录, 字段) 对
    pub considered: usize,
    /// 实际写入的字段数
    pub changed: usize,
    /// 因保护哨兵跳过的字段数
    pub protected: usize,
    /// 因不可编辑或结果非数值跳过的字段数
    pub skipped: usize,
    /// 至少有一个字段被修改的记录数
    pub records_touched: usize,
    /// 实际写入的变更
    pub changes: Vec<FieldChange>,
}

impl fmt::Display for TransformReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fields considered, {} changed in {} records, {} protected, {} skipped",
            self.considered, self.changed, self.records_touched, self.protected, self.skipped
        )
    }
}

/// 变换引擎
///
/// 独占借用记录集，保证同一时刻只有一个变换在执行。
pub struct TransformEngine<'a> {
    set: &'a mut RecordSet,
}

impl<'a> TransformEngine<'a> {
    pub fn new(set: &'a mut RecordSet) -> Self {
        Self { set }
    }

    /// 百分比缩放
    pub fn scale_percentage(&mut self, p: f64, fields: &[String], selection: &Selection) -> Result<TransformReport> {
        self.apply(Operation::Percentage(p), fields, selection)
    }

    /// 倍率缩放
    pub fn scale_multiplier(&mut self, m: f64, fields: &[String], selection: &Selection) -> Result<TransformReport> {
        self.apply(Operation::Multiplier(m), fields, selection)
    }

    /// 赋值（操作数超出任一目标字段范围时拒绝，且不修改任何值）
    pub fn set_literal(&mut self, v: Value, fields: &[String], selection: &Selection) -> Result<TransformReport> {
        self.apply(Operation::Literal(v), fields, selection)
    }

    pub fn add_delta(&mut self, d: f64, fields: &[String], selection: &Selection) -> Result<TransformReport> {
        self.apply(Operation::Add(d), fields, selection)
    }

    pub fn subtract_delta(&mut self, d: f64, fields: &[String], selection: &Selection) -> Result<TransformReport> {
        self.apply(Operation::Subtract(d), fields, selection)
    }

    /// 单元格编辑
    ///
    /// 与批量赋值走同一路径，保护与钳制规则相同；
    /// 字段不可编辑时返回 `FieldNotEditable`。
    pub fn set_cell(&mut self, address: &CellAddress, value: Value) -> Result<TransformReport> {
        let row = self.set.locate_row(&address.file, address.record_index)?;
        let descriptor = self
            .set
            .schema()
            .field(&address.field)
            .ok_or_else(|| EditorError::UnknownField(address.field.clone()))?;
        if !descriptor.editable {
            return Err(EditorError::FieldNotEditable(address.field.clone()));
        }
        self.apply(
            Operation::Literal(value),
            std::slice::from_ref(&address.field),
            &Selection::Records(vec![row]),
        )
    }

    /// 执行变换
    ///
    /// `fields` 为空时作用于全部字段。所有参数错误（未知字段、未知行号、
    /// 赋值越界）都在修改任何值之前返回。
    pub fn apply(&mut self, op: Operation, fields: &[String], selection: &Selection) -> Result<TransformReport> {
        let schema = std::sync::Arc::clone(self.set.schema());
        let targets: Vec<usize> = if fields.is_empty() {
            (0..schema.len()).collect()
        } else {
            schema.resolve(fields)?
        };

        if let Operation::Literal(v) = op {
            check_literal(&schema, &targets, v)?;
        }
        let rows = self.select_rows(&schema, selection)?;

        let mut report = TransformReport::default();
        for row in rows {
            let writes = self.plan_row(&schema, row, &targets, op, &mut report);
            if writes.is_empty() {
                continue;
            }
            report.records_touched += 1;
            for (field, old_value, new_value) in writes {
                if let Some(address) = self.set.address_of(row, field) {
                    report.changes.push(FieldChange::new(address, old_value, new_value));
                }
                self.set.records_mut()[row].values[field] = new_value;
                report.changed += 1;
            }
        }

        info!(op = %op, schema = schema.name(), "{}", report);
        Ok(report)
    }

    /// 计算一条记录需要写入的字段，不修改记录
    fn plan_row(
        &self,
        schema: &Schema,
        row: usize,
        targets: &[usize],
        op: Operation,
        report: &mut TransformReport,
    ) -> Vec<(usize, Value, Value)> {
        let Some(record) = self.set.get(row) else {
            return Vec::new();
        };
        // 操作前快照
        let snapshot = record.values();
        let lookup = |name: &str| schema.index_of(name).and_then(|i| snapshot.get(i).copied());

        let mut writes = Vec::new();
        for &field in targets {
            report.considered += 1;
            let descriptor = &schema.fields()[field];
            let current = snapshot[field];

            if !descriptor.editable {
                report.skipped += 1;
                continue;
            }
            if descriptor.protected.iter().any(|s| s.holds(current, lookup)) {
                debug!(row, field = %descriptor.name, value = %current, "protected");
                report.protected += 1;
                continue;
            }

            let Some(new_value) = finish(descriptor, op.compute(current.as_f64())) else {
                report.skipped += 1;
                continue;
            };
            if new_value != current {
                writes.push((field, current, new_value));
            }
        }
        writes
    }

    fn select_rows(&self, schema: &Schema, selection: &Selection) -> Result<Vec<usize>> {
        match selection {
            Selection::All => Ok((0..self.set.len()).collect()),
            Selection::Records(rows) => {
                if let Some(&bad) = rows.iter().find(|&&row| row >= self.set.len()) {
                    return Err(EditorError::UnknownRecord(bad));
                }
                let mut rows = rows.clone();
                rows.sort_unstable();
                rows.dedup();
                Ok(rows)
            }
            Selection::Filtered(filters) => {
                for filter in filters {
                    if let RecordFilter::FieldGreaterThan { field, .. } = filter {
                        if schema.index_of(field).is_none() {
                            return Err(EditorError::UnknownField(field.clone()));
                        }
                    }
                }
                Ok((0..self.set.len())
                    .filter(|&row| filters.iter().all(|f| self.matches(schema, row, f)))
                    .collect())
            }
        }
    }

    fn matches(&self, schema: &Schema, row: usize, filter: &RecordFilter) -> bool {
        let Some(record) = self.set.get(row) else {
            return false;
        };
        match filter {
            RecordFilter::FieldGreaterThan { field, value } => record
                .get(schema, field)
                .is_some_and(|v| v.as_f64() > *value),
            RecordFilter::FileNamePrefix { prefix } => self
                .set
                .file(record.file())
                .is_some_and(|f| has_excluded_prefix(&f.file_name(), std::slice::from_ref(prefix))),
        }
    }
}

/// 赋值操作数必须位于每个目标字段的范围内
fn check_literal(schema: &Schema, targets: &[usize], v: Value) -> Result<()> {
    for &field in targets {
        let descriptor = &schema.fields()[field];
        if !descriptor.editable {
            continue;
        }
        let range = descriptor.range();
        let candidate = if descriptor.kind.is_float() {
            v.as_f64() as f32 as f64
        } else {
            v.as_f64().round()
        };
        if !range.contains(candidate) {
            return Err(EditorError::Range {
                field: descriptor.name.clone(),
                value: v.to_string(),
                min: range.min.to_string(),
                max: range.max.to_string(),
            });
        }
    }
    Ok(())
}

/// 取整并钳制为字段可存储的值；结果为 NaN 时返回 `None`
///
/// 整数字段四舍五入（远离零），浮点字段保持 f32 精度。
fn finish(descriptor: &FieldDescriptor, raw: f64) -> Option<Value> {
    if raw.is_nan() {
        return None;
    }
    let range = descriptor.range();
    if descriptor.kind.is_float() {
        // 边界可被 f32 精确表示，转换后越界时退回边界本身
        let stored = range.clamp(raw) as f32;
        let stored = if (stored as f64) > range.max {
            range.max as f32
        } else if (stored as f64) < range.min {
            range.min as f32
        } else {
            stored
        };
        Some(Value::Float(stored))
    } else {
        Some(Value::Int(range.clamp(raw.round()) as i64))
    }
}
