/// IO 抽象层 - trait 定义
///
/// 文件读写的抽象接口，写回与备份只通过这些 trait 访问文件系统，
/// 便于在测试中替换实现。

use std::path::Path;
use crate::utils::Result;

/// 文件读取 trait
///
/// 只负责取得原始字节，不负责定位与解码。
pub trait FileReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// 文件是否存在
    fn exists(&self, path: &Path) -> bool;
}

/// 文件写入 trait
///
/// # 约定
/// - 目标文件要么被完整写入，要么保持原样
/// - 目标为只读文件时必须失败
/// - 父目录不存在时自动创建
pub trait FileWriter: Send + Sync {
    fn write(&self, path: &Path, bytes: &[u8]) -> Result<()>;
}
