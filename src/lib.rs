pub mod utils;
pub mod datatypes;
pub mod schema;
pub mod locator;
pub mod codec;
pub mod record;
pub mod format;
pub mod loader;
pub mod scan;
pub mod editor;
pub mod io;
pub mod backup;
pub mod writeback;
pub mod audit;
pub mod names;
pub mod cells;

// 重新导出主要结构
pub use audit::AuditLog;
pub use backup::{BackupPolicy, BackupSession, DEFAULT_BACKUP_DIR};
pub use cells::{export_cells, import_cells, CellValue, ImportReport};
pub use codec::RecordCodec;
pub use datatypes::{NumericKind, Value};
pub use editor::{ChangeDelta, FieldChange, Operation, RecordEditor, RecordFilter, Selection, TransformEngine, TransformReport};
pub use format::{presets, FormatSpec, SortKey};
pub use loader::{LoadReport, RecordLoader, SourceFile};
pub use locator::{BlockLocator, LocatorStrategy, Signature};
pub use names::NameTable;
pub use record::{CellAddress, FileId, LoadedFile, Record, RecordSet};
pub use scan::{scan_directory, ScanResult};
pub use schema::{FieldDescriptor, FieldRange, Schema, Sentinel};
pub use utils::{EditorError, ErrorClass, FileFailure, Result};
pub use writeback::{CancelToken, SaveReport, WriteBackConfig, WriteBackManager};

// 常量定义
pub const TOOL_NAME: &str = "titanbreak";
