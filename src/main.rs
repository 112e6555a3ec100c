use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;
use titanbreak::audit::{AuditLog, DEFAULT_LOG_FILE};
use titanbreak::cells::{export_json, read_cells_file};
use titanbreak::names::{monster_id_from_file_name, NameTable};
use titanbreak::utils::ticks_to_seconds;
use titanbreak::{
    presets, scan_directory, BackupPolicy, FormatSpec, Operation, RecordEditor, RecordFilter,
    RecordLoader, RecordSet, Selection, Value, WriteBackConfig, WriteBackManager,
    DEFAULT_BACKUP_DIR,
};

#[derive(Parser)]
#[command(name = "titanbreak")]
#[command(about = "定位、批量修改并写回游戏数据文件中的数值块")]
#[command(version)]
struct Cli {
    /// 内置格式名称（enrage / hp / stagger / resident / loot）
    #[arg(short, long, global = true)]
    format: Option<String>,

    /// 从 JSON 文件加载格式定义（优先于 --format）
    #[arg(long, global = true)]
    format_file: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    /// 静默模式(仅输出警告和错误)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 列出内置格式，或输出某个格式的 JSON 定义
    Formats {
        /// 输出该格式的 JSON 定义
        #[arg(long)]
        json: Option<String>,
    },
    /// 加载目录并打印记录
    Show {
        /// 扫描根目录
        dir: PathBuf,
        /// 名称查找表（{"名称": {"Id": n}}）
        #[arg(long)]
        names: Option<PathBuf>,
    },
    /// 对记录执行批量变换并写回
    Apply {
        dir: PathBuf,
        /// 操作类型
        #[arg(long, value_enum)]
        op: OpKind,
        /// 操作数
        #[arg(long, allow_hyphen_values = true)]
        value: f64,
        /// 目标字段（逗号分隔，缺省为全部字段）
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
        /// 只处理该字段严格大于 --greater-than 的记录
        #[arg(long, requires = "greater_than")]
        where_field: Option<String>,
        #[arg(long)]
        greater_than: Option<f64>,
        /// 只处理文件名以该前缀开头的记录
        #[arg(long)]
        prefix: Option<String>,
        #[command(flatten)]
        write: WriteArgs,
    },
    /// 导出全部单元格为 JSON
    Export {
        dir: PathBuf,
        /// 输出文件（缺省输出到标准输出）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 从 JSON 导入单元格并写回
    Import {
        dir: PathBuf,
        /// 单元格 JSON 文件
        #[arg(long)]
        cells: PathBuf,
        #[command(flatten)]
        write: WriteArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OpKind {
    Percentage,
    Multiplier,
    Set,
    Add,
    Subtract,
}

#[derive(Args)]
struct WriteArgs {
    /// 写回前备份原文件
    #[arg(long)]
    backup: bool,
    /// 备份目录（缺省为 <dir>/backups）
    #[arg(long)]
    backup_dir: Option<PathBuf>,
    /// 写入该目录（按相对路径镜像）而不是原地覆盖
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// 并行写入
    #[arg(long)]
    parallel: bool,
    /// 只报告修改，不写回
    #[arg(long)]
    dry_run: bool,
    /// 操作日志文件（缺省为 <dir>/titanbreak.log）
    #[arg(long)]
    log: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    match &cli.command {
        Command::Formats { json } => handle_formats(json.as_deref()),
        Command::Show { dir, names } => handle_show(&cli, dir, names.as_deref()),
        Command::Apply {
            dir,
            op,
            value,
            fields,
            where_field,
            greater_than,
            prefix,
            write,
        } => {
            let operation = build_operation(*op, *value);
            let mut filters = Vec::new();
            if let (Some(field), Some(threshold)) = (where_field, greater_than) {
                filters.push(RecordFilter::FieldGreaterThan {
                    field: field.clone(),
                    value: *threshold,
                });
            }
            if let Some(prefix) = prefix {
                filters.push(RecordFilter::FileNamePrefix { prefix: prefix.clone() });
            }
            let selection = if filters.is_empty() {
                Selection::All
            } else {
                Selection::Filtered(filters)
            };
            handle_apply(&cli, dir, operation, fields, &selection, write)
        }
        Command::Export { dir, output } => handle_export(&cli, dir, output.as_deref()),
        Command::Import { dir, cells, write } => handle_import(&cli, dir, cells, write),
    }
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// 解析命令行选择的格式
fn resolve_format(cli: &Cli) -> Result<FormatSpec> {
    if let Some(path) = &cli.format_file {
        return FormatSpec::from_json_file(path)
            .with_context(|| format!("无法加载格式定义: {}", path.display()));
    }
    match &cli.format {
        Some(name) => Ok(presets::builtin(name)?),
        None => bail!("需要 --format 或 --format-file"),
    }
}

fn build_operation(kind: OpKind, value: f64) -> Operation {
    match kind {
        OpKind::Percentage => Operation::Percentage(value),
        OpKind::Multiplier => Operation::Multiplier(value),
        OpKind::Add => Operation::Add(value),
        OpKind::Subtract => Operation::Subtract(value),
        OpKind::Set if value.fract() == 0.0 && value.abs() < i64::MAX as f64 => {
            Operation::Literal(Value::Int(value as i64))
        }
        OpKind::Set => Operation::Literal(Value::Float(value as f32)),
    }
}

/// 扫描并加载目录
///
/// 默认备份目录与写入选项中的备份、输出目录都不参与扫描。
fn load(format: &FormatSpec, dir: &Path, write: Option<&WriteArgs>, audit: &mut AuditLog) -> Result<RecordSet> {
    let mut excluded = vec![dir.join(DEFAULT_BACKUP_DIR)];
    if let Some(write) = write {
        excluded.extend(write.backup_dir.iter().cloned());
        excluded.extend(write.output.iter().cloned());
    }
    let scan = scan_directory(dir, format, &excluded)
        .with_context(|| format!("无法扫描目录: {}", dir.display()))?;
    info!(
        matched = scan.matched,
        excluded = scan.excluded,
        empty = scan.empty,
        "scanned {}",
        dir.display()
    );
    let (set, mut report) = RecordLoader::new(format).load(scan.files);
    report.failures.extend(scan.failures);
    audit.record_load(&format.name, &report);
    Ok(set)
}

fn handle_formats(json: Option<&str>) -> Result<()> {
    if let Some(name) = json {
        println!("{}", presets::builtin(name)?.to_json()?);
        return Ok(());
    }
    for spec in presets::all()? {
        println!(
            "{:<10} {:<32} {:>2} fields  {}",
            spec.name,
            spec.file_pattern,
            spec.schema.len(),
            spec.description
        );
    }
    Ok(())
}

fn handle_show(cli: &Cli, dir: &Path, names: Option<&Path>) -> Result<()> {
    let format = resolve_format(cli)?;
    let names = match names {
        Some(path) => NameTable::from_json_file(path)
            .with_context(|| format!("无法加载名称表: {}", path.display()))?,
        None => NameTable::new(),
    };

    let mut audit = AuditLog::new(Some(dir.to_path_buf()), None);
    let set = load(&format, dir, None, &mut audit)?;
    let schema = set.schema();

    for record in set.records() {
        let Some(file) = set.file(record.file()) else {
            continue;
        };
        let label = match monster_id_from_file_name(&file.file_name()) {
            Some(id) if !names.is_empty() => names.display(id),
            _ => file.identifier(),
        };
        let values: Vec<String> = schema
            .fields()
            .iter()
            .zip(record.values())
            .map(|(field, value)| match value.as_i64() {
                Some(ticks) if field.time_scaled => {
                    format!("{}={} ({:.1}s)", field.name, ticks, ticks_to_seconds(ticks))
                }
                _ => format!("{}={}", field.name, value),
            })
            .collect();
        println!("{} #{}: {}", label, record.record_index(), values.join(" "));
    }
    Ok(())
}

fn handle_apply(
    cli: &Cli,
    dir: &Path,
    operation: Operation,
    fields: &[String],
    selection: &Selection,
    write: &WriteArgs,
) -> Result<()> {
    let format = resolve_format(cli)?;
    let mut audit = AuditLog::new(Some(dir.to_path_buf()), write.output.clone());
    let set = load(&format, dir, Some(write), &mut audit)?;

    let mut editor = RecordEditor::new(set);
    let report = editor.apply(operation, fields, selection)?;
    audit.record_transform(&operation.to_string(), &report);
    println!("{}", report);

    finish(editor, dir, write, audit)
}

fn handle_export(cli: &Cli, dir: &Path, output: Option<&Path>) -> Result<()> {
    let format = resolve_format(cli)?;
    let mut audit = AuditLog::new(Some(dir.to_path_buf()), None);
    let set = load(&format, dir, None, &mut audit)?;
    let json = export_json(&set)?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("无法写入: {}", path.display()))?;
            info!("exported {} records to {}", set.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn handle_import(cli: &Cli, dir: &Path, cells: &Path, write: &WriteArgs) -> Result<()> {
    let format = resolve_format(cli)?;
    let cells = read_cells_file(cells).with_context(|| format!("无法读取单元格文件: {}", cells.display()))?;
    let mut audit = AuditLog::new(Some(dir.to_path_buf()), write.output.clone());
    let set = load(&format, dir, Some(write), &mut audit)?;

    let mut editor = RecordEditor::new(set);
    let report = editor.import_cells(&cells);
    for rejected in &report.rejected {
        eprintln!("rejected {} [{}]: {}", rejected.address, rejected.class, rejected.reason);
    }
    println!("{}", report);

    finish(editor, dir, write, audit)
}

/// 写回（或在 dry-run 时只报告）并追加操作日志
fn finish(mut editor: RecordEditor, dir: &Path, write: &WriteArgs, mut audit: AuditLog) -> Result<()> {
    let modified = editor.records().modified_files().len();
    if write.dry_run {
        println!("dry run: {} files would be written", modified);
        return Ok(());
    }

    let mut backup = if write.backup {
        BackupPolicy::enabled()
    } else {
        BackupPolicy::default()
    };
    backup.root = write.backup_dir.clone();

    let config = WriteBackConfig {
        backup,
        output_root: write.output.clone(),
        source_root: Some(dir.to_path_buf()),
        parallel: write.parallel,
    };
    let report = editor.save(&WriteBackManager::new(config));
    println!("{}", report);
    for failure in &report.failures {
        eprintln!("failed {}", failure);
    }

    audit.record_save(&report);
    let log_path = write.log.clone().unwrap_or_else(|| dir.join(DEFAULT_LOG_FILE));
    audit
        .persist(&log_path)
        .with_context(|| format!("无法写入操作日志: {}", log_path.display()))?;

    if !report.is_success() {
        bail!("{} of {} files failed to save", report.failed, report.attempted);
    }
    Ok(())
}
