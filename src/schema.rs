/// 记录结构描述
///
/// Schema 是一个记录中各字段的静态布局：偏移、宽度、数值类型、合法范围与保护规则。
/// 构造后不可变，字段按偏移升序排列，编解码与批量操作都按此顺序遍历。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::datatypes::{NumericKind, Value};
use crate::utils::{EditorError, Result};

/// 字段的闭区间取值范围
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldRange {
    pub min: f64,
    pub max: f64,
}

impl FieldRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// 由宽度与符号推导出的自然范围
    pub fn natural(kind: NumericKind, width: usize) -> Self {
        match kind {
            NumericKind::Float => Self::new(-(f32::MAX as f64), f32::MAX as f64),
            NumericKind::Signed => {
                let half = 1i64 << (width * 8 - 1);
                Self::new(-half as f64, (half - 1) as f64)
            }
            NumericKind::Unsigned => Self::new(0.0, ((1i64 << (width * 8)) - 1) as f64),
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    fn within(&self, outer: &FieldRange) -> bool {
        self.min >= outer.min && self.max <= outer.max
    }

    /// 边界本身能否被该类型精确存储：整数字段要求整数边界，浮点字段要求 f32 可表示
    fn storable_as(&self, kind: NumericKind) -> bool {
        let exact = |bound: f64| match kind {
            NumericKind::Float => (bound as f32) as f64 == bound,
            NumericKind::Signed | NumericKind::Unsigned => bound.fract() == 0.0,
        };
        exact(self.min) && exact(self.max)
    }
}

/// 保护哨兵
///
/// 当谓词在字段*当前*值上成立时，批量变换跳过该字段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum Sentinel {
    /// 字段自身等于给定值（例如 0 表示“未使用”）
    Equals { value: Value },
    /// 同一记录中另一个字段等于给定值（例如物品 ID 为保留值）
    FieldEquals { field: String, value: Value },
    /// 同一记录中的一组字段全部等于给定值（例如数量与概率同为 255）
    AllEqual { fields: Vec<String>, value: Value },
}

impl Sentinel {
    /// 判断谓词是否成立
    ///
    /// `own` 为被检查字段的当前值，`lookup` 按名称读取同一记录的其它字段。
    pub fn holds<F>(&self, own: Value, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<Value>,
    {
        match self {
            Sentinel::Equals { value } => own == *value,
            Sentinel::FieldEquals { field, value } => lookup(field).is_some_and(|v| v == *value),
            Sentinel::AllEqual { fields, value } => {
                !fields.is_empty() && fields.iter().all(|f| lookup(f).is_some_and(|v| v == *value))
            }
        }
    }

    fn referenced_fields(&self) -> Vec<&str> {
        match self {
            Sentinel::Equals { .. } => Vec::new(),
            Sentinel::FieldEquals { field, .. } => vec![field.as_str()],
            Sentinel::AllEqual { fields, .. } => fields.iter().map(String::as_str).collect(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// 字段描述符
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// 字段标识符
    pub name: String,
    /// 相对于块起点的字节偏移
    pub offset: usize,
    /// 字节宽度（1/2/4）
    pub width: usize,
    /// 数值类型
    pub kind: NumericKind,
    /// 显式范围（为空时使用自然范围）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<FieldRange>,
    /// 保护哨兵，任一成立即跳过
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protected: Vec<Sentinel>,
    /// 以游戏刻（30/秒）计时，仅影响显示
    #[serde(default)]
    pub time_scaled: bool,
    /// 是否允许编辑
    #[serde(default = "default_true")]
    pub editable: bool,
}

impl FieldDescriptor {
    pub fn new(name: &str, offset: usize, kind: NumericKind, width: usize) -> Self {
        Self {
            name: name.to_string(),
            offset,
            width,
            kind,
            range: None,
            protected: Vec::new(),
            time_scaled: false,
            editable: true,
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.range = Some(FieldRange::new(min, max));
        self
    }

    pub fn protected_when(mut self, sentinel: Sentinel) -> Self {
        self.protected.push(sentinel);
        self
    }

    pub fn time_scaled(mut self) -> Self {
        self.time_scaled = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.editable = false;
        self
    }

    /// 有效范围（显式范围优先）
    pub fn range(&self) -> FieldRange {
        self.range
            .unwrap_or_else(|| FieldRange::natural(self.kind, self.width))
    }

    /// 字段占用的字节区间（相对块起点）
    pub fn span(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.width
    }
}

/// Schema 的序列化形式（反序列化后经 [`Schema::new`] 校验）
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SchemaDef {
    name: String,
    total_width: usize,
    fields: Vec<FieldDescriptor>,
}

/// 已校验的记录结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SchemaDef", into = "SchemaDef")]
pub struct Schema {
    name: String,
    total_width: usize,
    fields: Vec<FieldDescriptor>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl TryFrom<SchemaDef> for Schema {
    type Error = EditorError;

    fn try_from(def: SchemaDef) -> Result<Self> {
        Schema::new(def.name, def.total_width, def.fields)
    }
}

impl From<Schema> for SchemaDef {
    fn from(schema: Schema) -> Self {
        SchemaDef {
            name: schema.name,
            total_width: schema.total_width,
            fields: schema.fields,
        }
    }
}

impl Schema {
    /// 构造并校验 Schema
    ///
    /// 字段会按偏移升序重排。任何重叠、越界、宽度与类型不符、
    /// 范围超出自然范围或哨兵引用未知字段，都返回 `SchemaError`。
    pub fn new(name: impl Into<String>, total_width: usize, mut fields: Vec<FieldDescriptor>) -> Result<Self> {
        let name = name.into();
        if total_width == 0 {
            return Err(EditorError::schema(format!("{}: total width must be positive", name)));
        }
        if fields.is_empty() {
            return Err(EditorError::schema(format!("{}: no fields declared", name)));
        }

        fields.sort_by_key(|f| f.offset);

        let mut index = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(EditorError::schema(format!("{}: field at 0x{:X} has no name", name, field.offset)));
            }
            if index.insert(field.name.clone(), i).is_some() {
                return Err(EditorError::schema(format!("{}: duplicate field '{}'", name, field.name)));
            }
            if !field.kind.accepts_width(field.width) {
                return Err(EditorError::schema(format!(
                    "{}: field '{}' width {} does not match kind {:?}",
                    name, field.name, field.width, field.kind
                )));
            }
            let end = field.offset.checked_add(field.width).ok_or_else(|| {
                EditorError::schema(format!("{}: field '{}' offset 0x{:X} overflows", name, field.name, field.offset))
            })?;
            if end > total_width {
                return Err(EditorError::schema(format!(
                    "{}: field '{}' ends at {} past record width {}",
                    name, field.name, end, total_width
                )));
            }
            if let Some(range) = field.range {
                let natural = FieldRange::natural(field.kind, field.width);
                if range.min > range.max || !range.within(&natural) || !range.storable_as(field.kind) {
                    return Err(EditorError::schema(format!(
                        "{}: field '{}' range [{}, {}] invalid for {:?}/{}",
                        name, field.name, range.min, range.max, field.kind, field.width
                    )));
                }
            }
        }

        for pair in fields.windows(2) {
            if pair[0].offset + pair[0].width > pair[1].offset {
                return Err(EditorError::schema(format!(
                    "{}: fields '{}' and '{}' overlap",
                    name, pair[0].name, pair[1].name
                )));
            }
        }

        for field in &fields {
            for sentinel in &field.protected {
                for referenced in sentinel.referenced_fields() {
                    if !index.contains_key(referenced) {
                        return Err(EditorError::schema(format!(
                            "{}: field '{}' sentinel references unknown field '{}'",
                            name, field.name, referenced
                        )));
                    }
                }
            }
        }

        Ok(Self {
            name,
            total_width,
            fields,
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 记录总宽度（字节）
    pub fn total_width(&self) -> usize {
        self.total_width
    }

    /// 按偏移升序排列的字段
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    /// 将字段名列表解析为索引（未知字段返回错误）
    pub fn resolve(&self, names: &[String]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|n| self.index_of(n).ok_or_else(|| EditorError::UnknownField(n.clone())))
            .collect()
    }
}
