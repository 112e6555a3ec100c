/// 文件格式定义
///
/// 每种文件格式只是一份数据：Schema + 定位策略 + 文件筛选规则 + 排序方式。
/// 所有格式共用同一套加载、变换与写回逻辑。

pub mod presets;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use crate::locator::BlockLocator;
use crate::record::{LoadedFile, Record, RecordSet};
use crate::schema::Schema;
use crate::utils::{glob_match, has_excluded_prefix, Result};

/// 记录排序方式
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum SortKey {
    /// 按文件名自然顺序（数字段按数值比较），再按记录序号
    #[default]
    FileName,
    /// 按字段值，再按文件与记录序号
    Field { field: String },
    /// 保持加载顺序
    None,
}

/// 文件格式定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatSpec {
    /// 格式名称
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 文件名通配符
    pub file_pattern: String,
    /// 需要排除的文件名前缀（忽略大小写）
    #[serde(default)]
    pub exclude_prefixes: Vec<String>,
    pub schema: Schema,
    pub locator: BlockLocator,
    #[serde(default)]
    pub sort: SortKey,
}

impl FormatSpec {
    /// 构造并校验格式定义
    pub fn new(
        name: &str,
        file_pattern: &str,
        schema: Schema,
        locator: BlockLocator,
    ) -> Result<Self> {
        let spec = Self {
            name: name.to_string(),
            description: String::new(),
            file_pattern: file_pattern.to_string(),
            exclude_prefixes: Vec::new(),
            schema,
            locator,
            sort: SortKey::FileName,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn excluding(mut self, prefix: &str) -> Self {
        self.exclude_prefixes.push(prefix.to_string());
        self
    }

    pub fn sorted_by(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    /// 校验定位器与排序字段
    pub fn validate(&self) -> Result<()> {
        self.locator.validate(&self.schema)?;
        if let SortKey::Field { field } = &self.sort {
            if self.schema.index_of(field).is_none() {
                return Err(crate::utils::EditorError::Schema(format!(
                    "{}: sort field '{}' is not in the schema",
                    self.name, field
                )));
            }
        }
        Ok(())
    }

    /// 从 JSON 字符串加载格式定义
    pub fn from_json_str(json: &str) -> Result<Self> {
        let spec: FormatSpec = serde_json::from_str(json)?;
        spec.validate()?;
        Ok(spec)
    }

    /// 从 JSON 文件加载格式定义
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 文件名是否属于该格式
    pub fn matches_file_name(&self, name: &str) -> bool {
        glob_match(&self.file_pattern, name) && !has_excluded_prefix(name, &self.exclude_prefixes)
    }

    /// 按格式的排序方式重排记录集
    pub fn sort_records(&self, set: &mut RecordSet) {
        match &self.sort {
            SortKey::None => {}
            SortKey::FileName => set.sort_by(|fa, ra, fb, rb| {
                compare_file_names(fa, fb).then(ra.record_index().cmp(&rb.record_index()))
            }),
            SortKey::Field { field } => {
                let Some(index) = set.schema().index_of(field) else {
                    return;
                };
                set.sort_by(|fa, ra, fb, rb| {
                    field_value(ra, index)
                        .total_cmp(&field_value(rb, index))
                        .then_with(|| compare_file_names(fa, fb))
                        .then(ra.record_index().cmp(&rb.record_index()))
                })
            }
        }
    }
}

fn field_value(record: &Record, index: usize) -> f64 {
    record.values().get(index).map(|v| v.as_f64()).unwrap_or(f64::NAN)
}

fn compare_file_names(a: &LoadedFile, b: &LoadedFile) -> Ordering {
    natural_key(&a.file_name())
        .cmp(&natural_key(&b.file_name()))
        .then_with(|| a.identifier().cmp(&b.identifier()))
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart {
    Num(u64),
    Text(String),
}

/// 自然排序键：连续数字按数值比较，其余按文本比较
///
/// `em002_00` 排在 `em010_00` 之前，`_00` 变体排在 `_01` 之前。
fn natural_key(name: &str) -> Vec<KeyPart> {
    let mut parts = Vec::new();
    let mut chars = name.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            let mut digits = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                digits.push(d);
                chars.next();
            }
            parts.push(KeyPart::Num(digits.parse().unwrap_or(u64::MAX)));
        } else {
            let mut text = String::new();
            while let Some(&t) = chars.peek().filter(|t| !t.is_ascii_digit()) {
                text.push(t.to_ascii_lowercase());
                chars.next();
            }
            parts.push(KeyPart::Text(text));
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_key_order() {
        assert!(natural_key("em002_00_dttune") < natural_key("em010_00_dttune"));
        assert!(natural_key("em002_00_dttune") < natural_key("em002_01_dttune"));
        assert!(natural_key("em100_00") > natural_key("em099_05"));
    }

    #[test]
    fn test_matches_file_name() {
        let spec = presets::enrage().unwrap();
        assert!(spec.matches_file_name("em001_00_dttune.48E8AC29"));
        assert!(!spec.matches_file_name("ems001_00_dttune.48E8AC29"));
        assert!(!spec.matches_file_name("em001_00_dttune.txt"));
    }

    #[test]
    fn test_json_roundtrip_for_presets() {
        for spec in presets::all().unwrap() {
            let json = spec.to_json().unwrap();
            let parsed = FormatSpec::from_json_str(&json).unwrap();
            assert_eq!(parsed, spec, "preset {} did not survive JSON", spec.name);
        }
    }

    #[test]
    fn test_unknown_sort_field_rejected() {
        let mut spec = presets::hp().unwrap();
        spec.sort = SortKey::Field { field: "missing".to_string() };
        assert!(spec.validate().is_err());
    }
}
