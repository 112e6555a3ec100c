/// 编辑器层模块
///
/// 提供批量变换引擎与有状态的编辑接口，支持变更追踪与撤销/重做。
/// 遵循"修改-保存分离"原则，所有修改操作仅在内存中进行，需要显式调用保存。
///
/// - **transform**: 变换引擎（百分比/倍率/赋值/加减），含保护与钳制规则
/// - **delta**: 变更追踪，支持撤销/重做
/// - **record_editor**: 记录编辑器，组合记录集与变更追踪
///
/// ```rust,ignore
/// use titanbreak::{RecordEditor, Operation, Selection};
///
/// let mut editor = RecordEditor::new(set);
/// editor.apply(Operation::Add(1.0), &["quantity".into()], &Selection::All)?;
/// let report = editor.save(&WriteBackManager::default());
/// ```
pub mod delta;
pub mod record_editor;
pub mod transform;

pub use delta::{ChangeBatch, ChangeDelta, FieldChange};
pub use record_editor::RecordEditor;
pub use transform::{Operation, RecordFilter, Selection, TransformEngine, TransformReport};
