/// 数据块定位
///
/// 根据文件字节返回记录块的起始偏移。支持三种策略：
/// - **Fixed**: 块总是位于已知的固定偏移
/// - **Scan**: 在有界窗口内逐字节扫描，首个使所有字段都“合理”的偏移即为结果
/// - **Table**: 文件头（魔数 + 版本 + 条目数）后紧跟 N 个定长条目
///
/// 定位是字节缓冲区上的纯函数，相同输入总是得到相同结果。

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::datatypes::{peek_f32, peek_u16, peek_u32, peek_u8, NumericKind};
use crate::schema::{FieldDescriptor, Schema};
use crate::utils::{EditorError, Result};

/// 文件签名（魔数）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// 魔数在文件中的偏移
    pub offset: usize,
    /// 期望的小端 u32 魔数
    pub magic: u32,
}

impl Signature {
    pub fn at_start(magic: u32) -> Self {
        Self { offset: 0, magic }
    }

    /// 校验签名
    pub fn verify(&self, bytes: &[u8]) -> Result<()> {
        let found = peek_u32(bytes, self.offset).ok_or_else(|| {
            EditorError::format(format!(
                "file too small for signature at 0x{:X} ({} bytes)",
                self.offset,
                bytes.len()
            ))
        })?;
        if found != self.magic {
            return Err(EditorError::format(format!(
                "magic number mismatch (got {:08X}, expected {:08X})",
                found, self.magic
            )));
        }
        Ok(())
    }
}

/// 扫描时的合理性判定
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plausibility {
    /// 浮点字段的最小合理值
    pub float_min: f64,
    /// 浮点字段的最大合理值
    pub float_max: f64,
}

impl Default for Plausibility {
    fn default() -> Self {
        Self {
            float_min: 0.001,
            float_max: 20.0,
        }
    }
}

impl Plausibility {
    /// 判断字段在 `at` 处的字节是否合理
    ///
    /// 浮点：有限、非零、位于合理区间；整数：位于字段声明的范围内。
    fn accepts(&self, bytes: &[u8], at: usize, field: &FieldDescriptor) -> bool {
        match field.kind {
            NumericKind::Float => match peek_f32(bytes, at) {
                Some(v) => {
                    let v = v as f64;
                    v.is_finite() && v != 0.0 && v >= self.float_min && v <= self.float_max
                }
                None => false,
            },
            NumericKind::Signed | NumericKind::Unsigned => {
                let raw = match (field.kind, field.width) {
                    (NumericKind::Unsigned, 1) => peek_u8(bytes, at).map(|v| v as f64),
                    (NumericKind::Unsigned, 2) => peek_u16(bytes, at).map(|v| v as f64),
                    (NumericKind::Unsigned, 4) => peek_u32(bytes, at).map(|v| v as f64),
                    (NumericKind::Signed, 1) => peek_u8(bytes, at).map(|v| v as i8 as f64),
                    (NumericKind::Signed, 2) => peek_u16(bytes, at).map(|v| v as i16 as f64),
                    (NumericKind::Signed, 4) => peek_u32(bytes, at).map(|v| v as i32 as f64),
                    _ => None,
                };
                raw.is_some_and(|v| field.range().contains(v))
            }
        }
    }
}

/// 扫描窗口
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanWindow {
    /// 最小起始偏移
    pub start: usize,
    /// 窗口大小（字节）
    pub window: usize,
    #[serde(default)]
    pub plausibility: Plausibility,
}

/// 条目数来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "offset", rename_all = "snake_case")]
pub enum EntryCount {
    /// 文件头中指定偏移处的 u8
    U8At(usize),
    /// 文件头中指定偏移处的小端 u16
    U16At(usize),
    /// 文件头中指定偏移处的小端 u32
    U32At(usize),
    /// 条目一直延续到文件末尾
    ToEnd,
}

/// 表格布局（文件头 + N 个定长条目）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLayout {
    /// 文件头大小（字节）
    pub header_size: usize,
    /// 条目数来源
    pub count: EntryCount,
    /// 相邻条目起点之间的距离
    pub stride: usize,
    /// 版本号（小端 u32）在文件头中的偏移
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_at: Option<usize>,
}

/// 定位策略
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum LocatorStrategy {
    Fixed { offset: usize },
    Scan(ScanWindow),
    Table(TableLayout),
}

/// 定位结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    /// 每个记录块的绝对偏移，按记录序号排列
    pub offsets: Vec<usize>,
    /// 文件头中的格式版本（如果布局声明了）
    pub version: Option<u32>,
}

/// 数据块定位器
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockLocator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    #[serde(flatten)]
    pub strategy: LocatorStrategy,
}

impl BlockLocator {
    pub fn fixed(offset: usize) -> Self {
        Self {
            signature: None,
            strategy: LocatorStrategy::Fixed { offset },
        }
    }

    pub fn scan(start: usize, window: usize, plausibility: Plausibility) -> Self {
        Self {
            signature: None,
            strategy: LocatorStrategy::Scan(ScanWindow {
                start,
                window,
                plausibility,
            }),
        }
    }

    pub fn table(layout: TableLayout) -> Self {
        Self {
            signature: None,
            strategy: LocatorStrategy::Table(layout),
        }
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// 校验定位器与 Schema 是否兼容
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        if let LocatorStrategy::Table(layout) = &self.strategy {
            if layout.stride < schema.total_width() {
                return Err(EditorError::schema(format!(
                    "{}: entry stride {} smaller than record width {}",
                    schema.name(),
                    layout.stride,
                    schema.total_width()
                )));
            }
        }
        Ok(())
    }

    /// 定位文件中的所有记录块
    ///
    /// 签名不匹配时在任何字段解码之前返回 `FormatError`。
    pub fn locate(&self, bytes: &[u8], schema: &Schema) -> Result<Located> {
        if let Some(signature) = &self.signature {
            signature.verify(bytes)?;
        }

        let width = schema.total_width();
        match &self.strategy {
            LocatorStrategy::Fixed { offset } => {
                ensure_fits(bytes, *offset, width)?;
                Ok(Located {
                    offsets: vec![*offset],
                    version: None,
                })
            }
            LocatorStrategy::Scan(window) => {
                let offset = scan_for_block(bytes, schema, window)?;
                Ok(Located {
                    offsets: vec![offset],
                    version: None,
                })
            }
            LocatorStrategy::Table(layout) => locate_table(bytes, width, layout),
        }
    }
}

fn ensure_fits(bytes: &[u8], offset: usize, width: usize) -> Result<()> {
    if offset.checked_add(width).map_or(true, |end| end > bytes.len()) {
        return Err(EditorError::TruncatedRecord {
            offset,
            needed: width,
            available: bytes.len().saturating_sub(offset),
        });
    }
    Ok(())
}

/// 启发式扫描：首个匹配即返回，不再寻找“更好”的后续匹配
fn scan_for_block(bytes: &[u8], schema: &Schema, window: &ScanWindow) -> Result<usize> {
    let width = schema.total_width();
    let not_found = |end: usize| EditorError::BlockNotFound {
        start: window.start,
        end,
    };

    if bytes.len() < width {
        return Err(not_found(window.start));
    }
    // 窗口为空（起点不小于终点）时直接判定未找到
    let end = window.start.saturating_add(window.window).min(bytes.len() - width);
    if window.start >= end {
        return Err(not_found(end));
    }

    for candidate in window.start..=end {
        let all_plausible = schema
            .fields()
            .iter()
            .all(|field| window.plausibility.accepts(bytes, candidate + field.offset, field));
        if all_plausible {
            debug!(offset = candidate, schema = schema.name(), "block located by scan");
            return Ok(candidate);
        }
    }

    Err(not_found(end))
}

fn locate_table(bytes: &[u8], width: usize, layout: &TableLayout) -> Result<Located> {
    if bytes.len() < layout.header_size {
        return Err(EditorError::format(format!(
            "file too small for header ({} < {} bytes)",
            bytes.len(),
            layout.header_size
        )));
    }

    let header = &bytes[..layout.header_size];
    let missing = |what: &str, at: usize| EditorError::format(format!("{} at 0x{:X} lies outside the header", what, at));

    let version = match layout.version_at {
        Some(at) => Some(peek_u32(header, at).ok_or_else(|| missing("version", at))?),
        None => None,
    };

    let count = match layout.count {
        EntryCount::U8At(at) => peek_u8(header, at).ok_or_else(|| missing("entry count", at))? as usize,
        EntryCount::U16At(at) => peek_u16(header, at).ok_or_else(|| missing("entry count", at))? as usize,
        EntryCount::U32At(at) => peek_u32(header, at).ok_or_else(|| missing("entry count", at))? as usize,
        EntryCount::ToEnd => {
            let body = bytes.len() - layout.header_size;
            if layout.stride == 0 {
                0
            } else {
                if body % layout.stride != 0 {
                    warn!(
                        trailing = body % layout.stride,
                        stride = layout.stride,
                        "entry data is not a multiple of the stride; ignoring trailing bytes"
                    );
                }
                body / layout.stride
            }
        }
    };

    let mut offsets = Vec::with_capacity(count.min(bytes.len() / layout.stride.max(1)));
    for i in 0..count {
        let offset = i
            .checked_mul(layout.stride)
            .and_then(|o| o.checked_add(layout.header_size))
            .ok_or_else(|| EditorError::format(format!("entry {} offset overflows", i)))?;
        ensure_fits(bytes, offset, width)?;
        offsets.push(offset);
    }

    Ok(Located { offsets, version })
}
