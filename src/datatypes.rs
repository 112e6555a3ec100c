use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Cursor, Write};

/// 字段的数值类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericKind {
    /// 有符号整数
    Signed,
    /// 无符号整数
    Unsigned,
    /// 32位浮点数
    Float,
}

impl NumericKind {
    /// 检查宽度与类型是否匹配
    pub fn accepts_width(self, width: usize) -> bool {
        match self {
            NumericKind::Float => width == 4,
            NumericKind::Signed | NumericKind::Unsigned => matches!(width, 1 | 2 | 4),
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, NumericKind::Float)
    }
}

/// 字段值
///
/// 整数统一存为 `i64`（足以容纳所有 32 位有符号/无符号值），
/// 浮点数保持 `f32` 精度，保证编码后再解码得到相同的值。
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f32),
}

impl Value {
    pub fn as_f64(self) -> f64 {
        match self {
            Value::Int(v) => v as f64,
            Value::Float(v) => v as f64,
        }
    }

    pub fn as_i64(self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(v),
            Value::Float(_) => None,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Value::Float(_))
    }

    /// 按位比较（浮点数比较位模式，NaN 与自身相等）
    pub fn bit_eq(self, other: Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    /// 数值比较：整数与浮点数之间按数值比较
    fn eq(&self, other: &Self) -> bool {
        match (*self, *other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
        }
    }
}

/// 按类型与宽度读取一个小端数值
pub fn read_value(cursor: &mut Cursor<&[u8]>, kind: NumericKind, width: usize) -> std::io::Result<Value> {
    let value = match (kind, width) {
        (NumericKind::Signed, 1) => Value::Int(cursor.read_i8()? as i64),
        (NumericKind::Signed, 2) => Value::Int(cursor.read_i16::<LittleEndian>()? as i64),
        (NumericKind::Signed, 4) => Value::Int(cursor.read_i32::<LittleEndian>()? as i64),
        (NumericKind::Unsigned, 1) => Value::Int(cursor.read_u8()? as i64),
        (NumericKind::Unsigned, 2) => Value::Int(cursor.read_u16::<LittleEndian>()? as i64),
        (NumericKind::Unsigned, 4) => Value::Int(cursor.read_u32::<LittleEndian>()? as i64),
        (NumericKind::Float, 4) => Value::Float(cursor.read_f32::<LittleEndian>()?),
        _ => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("unsupported field layout {:?}/{}", kind, width),
            ))
        }
    };
    Ok(value)
}

/// 按类型与宽度写入一个小端数值
///
/// 整数值按目标宽度截断写入；范围检查由调用方在写入前完成。
pub fn write_value(writer: &mut dyn Write, kind: NumericKind, width: usize, value: Value) -> std::io::Result<()> {
    match (kind, width, value) {
        (NumericKind::Float, 4, v) => writer.write_f32::<LittleEndian>(v.as_f64() as f32),
        (_, _, Value::Float(_)) => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "float value for integer field",
        )),
        (NumericKind::Signed, 1, Value::Int(v)) => writer.write_i8(v as i8),
        (NumericKind::Signed, 2, Value::Int(v)) => writer.write_i16::<LittleEndian>(v as i16),
        (NumericKind::Signed, 4, Value::Int(v)) => writer.write_i32::<LittleEndian>(v as i32),
        (NumericKind::Unsigned, 1, Value::Int(v)) => writer.write_u8(v as u8),
        (NumericKind::Unsigned, 2, Value::Int(v)) => writer.write_u16::<LittleEndian>(v as u16),
        (NumericKind::Unsigned, 4, Value::Int(v)) => writer.write_u32::<LittleEndian>(v as u32),
        _ => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("unsupported field layout {:?}/{}", kind, width),
        )),
    }
}

/// 读取指定偏移处的小端 u32（越界返回 None）
pub fn peek_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    bytes
        .get(offset..offset.checked_add(4)?)
        .map(LittleEndian::read_u32)
}

/// 读取指定偏移处的小端 u16（越界返回 None）
pub fn peek_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    bytes
        .get(offset..offset.checked_add(2)?)
        .map(LittleEndian::read_u16)
}

/// 读取指定偏移处的 u8（越界返回 None）
pub fn peek_u8(bytes: &[u8], offset: usize) -> Option<u8> {
    bytes.get(offset).copied()
}

/// 读取指定偏移处的小端 f32（越界返回 None）
pub fn peek_f32(bytes: &[u8], offset: usize) -> Option<f32> {
    bytes
        .get(offset..offset.checked_add(4)?)
        .map(LittleEndian::read_f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_signed() {
        let mut out = Vec::new();
        write_value(&mut out, NumericKind::Signed, 2, Value::Int(-2)).unwrap();
        assert_eq!(out, vec![0xFE, 0xFF]);

        let mut cursor = Cursor::new(out.as_slice());
        let value = read_value(&mut cursor, NumericKind::Signed, 2).unwrap();
        assert!(value.bit_eq(Value::Int(-2)));
    }

    #[test]
    fn test_read_unsigned_u32() {
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF];
        let mut cursor = Cursor::new(&bytes[..]);
        let value = read_value(&mut cursor, NumericKind::Unsigned, 4).unwrap();
        assert_eq!(value.as_i64(), Some(u32::MAX as i64));
    }

    #[test]
    fn test_float_layout() {
        let mut out = Vec::new();
        write_value(&mut out, NumericKind::Float, 4, Value::Float(1.5)).unwrap();
        assert_eq!(out, 1.5f32.to_le_bytes().to_vec());
        assert!(write_value(&mut out, NumericKind::Unsigned, 2, Value::Float(1.0)).is_err());
    }

    #[test]
    fn test_width_check() {
        assert!(NumericKind::Float.accepts_width(4));
        assert!(!NumericKind::Float.accepts_width(2));
        assert!(NumericKind::Unsigned.accepts_width(1));
        assert!(!NumericKind::Signed.accepts_width(3));
    }

    #[test]
    fn test_peek_helpers() {
        let bytes = [0x52, 0x44, 0x42, 0x00, 0x07];
        assert_eq!(peek_u32(&bytes, 0), Some(0x0042_4452));
        assert_eq!(peek_u32(&bytes, 2), None);
        assert_eq!(peek_u8(&bytes, 4), Some(7));
        assert_eq!(peek_u16(&bytes, 4), None);
    }

    #[test]
    fn test_value_numeric_eq() {
        assert_eq!(Value::Int(255), Value::Float(255.0));
        assert_ne!(Value::Int(1), Value::Int(2));
        assert!(!Value::Int(1).bit_eq(Value::Float(1.0)));
    }
}
