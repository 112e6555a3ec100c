/// 显示名称查找表
///
/// 只读的 ID → 名称映射，从 `{"<名称>": {"Id": n}}` 形式的 JSON 文件加载。
/// 只供显示层使用，加载与编辑流程不依赖它。

use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;
use crate::utils::{EditorError, Result};

/// ID → 名称映射
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    names: HashMap<u32, String>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析 JSON；缺少或无效 `Id` 的条目被跳过
    pub fn from_json_str(json: &str) -> Result<Self> {
        let root: JsonValue = serde_json::from_str(json)?;
        let JsonValue::Object(entries) = root else {
            return Err(EditorError::format("name table root is not an object"));
        };

        let mut names = HashMap::with_capacity(entries.len());
        for (name, data) in entries {
            let id = match data.get("Id") {
                Some(JsonValue::Number(n)) => n.as_u64().and_then(|v| u32::try_from(v).ok()),
                Some(JsonValue::String(s)) => s.trim().parse().ok(),
                _ => None,
            };
            match id {
                Some(id) => {
                    names.insert(id, name);
                }
                None => warn!(name = %name, "skipping name entry without a valid Id"),
            }
        }
        Ok(Self { names })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// 显示用文本：`名称 (ID: n)`，未知 ID 显示为 `Unknown (ID: n)`
    pub fn display(&self, id: u32) -> String {
        format!("{} (ID: {})", self.name(id).unwrap_or("Unknown"), id)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// 从文件名中提取怪物 ID
///
/// 匹配位于开头或 `_` 之后的 `em`/`ems` 加数字，例如
/// `em042_00_dttune.48E8AC29` → 42，`hagi_s1_ems007_01.33A84E14` → 7。
pub fn monster_id_from_file_name(name: &str) -> Option<u32> {
    name.split('_').find_map(|part| {
        let rest = part.strip_prefix("ems").or_else(|| part.strip_prefix("em"))?;
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            None
        } else {
            digits.parse().ok()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_table() {
        let json = r#"{
            "Rathalos": { "Id": 1 },
            "Arkveld": { "Id": "42" },
            "Broken": { "Name": "x" },
            "Negative": { "Id": -3 }
        }"#;
        let table = NameTable::from_json_str(json).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.name(1), Some("Rathalos"));
        assert_eq!(table.display(42), "Arkveld (ID: 42)");
        assert_eq!(table.display(7), "Unknown (ID: 7)");
    }

    #[test]
    fn test_root_must_be_object() {
        assert!(matches!(NameTable::from_json_str("[1, 2]"), Err(EditorError::Format(_))));
        assert!(matches!(NameTable::from_json_str("{"), Err(EditorError::Json(_))));
    }

    #[test]
    fn test_monster_id_from_file_name() {
        assert_eq!(monster_id_from_file_name("em042_00_dttune.48E8AC29"), Some(42));
        assert_eq!(monster_id_from_file_name("hagi_s1_ems007_01.33A84E14"), Some(7));
        assert_eq!(monster_id_from_file_name("em_resident_dtbase.583F70B0"), None);
    }
}
