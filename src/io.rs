/// IO 抽象层模块
///
/// 文件读写的抽象接口与默认的文件系统实现。
///
/// - **traits**: `FileReader` / `FileWriter` 接口
/// - **fs_io**: 基于 std::fs 的默认实现（临时文件 + 重命名）
///
/// ```rust,ignore
/// use titanbreak::io::{DefaultFileReader, FileReader};
///
/// let bytes = DefaultFileReader.read(Path::new("em001_00_dttune.48E8AC29"))?;
/// ```
pub mod fs_io;
pub mod traits;

pub use fs_io::{DefaultFileReader, DefaultFileWriter};
pub use traits::{FileReader, FileWriter};
