//! Purpose: `treewrap` CLI entry point: parse arguments and emit JSON results and errors.
//! Exports: Binary entry point (no public API).
//! Role: Thin wrapper over the library `api` for inspecting and filling store files.
//! Invariants: Successful output is JSON on stdout; diagnostics and logs go to stderr.
//! Invariants: Process exit code is derived from `to_exit_code` for stable scripting.
use std::io::{self, BufRead, IsTerminal};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use treewrap::api::{
    Chain, DEFAULT_CAPACITY, Error, ErrorKind, Leaf, MemoryStore, Store, TreeWrapper,
    Value as ColumnValue, ValueKind, VarrLeaf, to_exit_code,
};
use treewrap::notice::{ColumnRole, UnresolvedColumn};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint(clap_error_hint(&err)),
                    ColorMode::Auto,
                ));
            }
        },
    };

    init_tracing();
    let color_mode = cli.color;
    command_dispatch::dispatch_command(cli.command, color_mode)
        .map_err(add_corrupt_hint)
        .map_err(|err| (err, color_mode))
}

#[derive(Parser)]
#[command(
    name = "treewrap",
    version,
    about = "Typed column access over record stores",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"A store is a JSON file of named, typed columns sharing one record count.

Mental model:
  - `fill` writes records (one JSON object per stdin line)
  - `dump` iterates records and prints the requested columns
  - `info` summarizes a store's columns
"#,
    after_help = r#"EXAMPLES
  $ printf '{"x":5}\n{"x":7}\n' | treewrap fill events.json --column x:i32
  $ treewrap dump events.json --column x
  {"entry":0,"values":{"x":5}}
  $ treewrap dump events.json --array n:tracks:10 --stop-at 3

LOGGING
  RUST_LOG=debug treewrap dump events.json   # binding and pruning decisions"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Summarize a store file as JSON")]
    Info {
        #[arg(help = "Store file", value_hint = ValueHint::FilePath)]
        store: PathBuf,
    },
    #[command(
        about = "Print records, one JSON object per line",
        after_help = r#"NOTES
  - Without --column/--array, every column in the first store is printed.
  - Columns missing from the store are reported on stderr and skipped.
  - --chain appends more stores; entries are numbered across all of them."#
    )]
    Dump {
        #[arg(help = "Store file", value_hint = ValueHint::FilePath)]
        store: PathBuf,
        #[arg(long = "chain", value_name = "STORE", value_hint = ValueHint::FilePath)]
        chain: Vec<PathBuf>,
        #[arg(long = "column", value_name = "NAME", help = "Scalar or whole-vector column")]
        columns: Vec<String>,
        #[arg(
            long = "array",
            value_name = "LEN:NAME[:MAX]",
            help = "Array column sized by the LEN column, capped at MAX (default 100)"
        )]
        arrays: Vec<String>,
        #[arg(long, help = "Fetch each record in one call instead of per column")]
        read_all: bool,
        #[arg(long, value_name = "ENTRY", help = "First entry to print")]
        from: Option<u64>,
        #[arg(long, value_name = "ENTRY", help = "Last entry to print")]
        stop_at: Option<u64>,
    },
    #[command(
        about = "Create a store from JSON objects on stdin",
        after_help = r#"NOTES
  - Fields missing from an input object are written as the column default.
  - Fields not named by --column are ignored."#
    )]
    Fill {
        #[arg(help = "Store file to create", value_hint = ValueHint::FilePath)]
        store: PathBuf,
        #[arg(long = "column", value_name = "NAME:KIND", required = true)]
        columns: Vec<String>,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ColumnSpec {
    name: String,
    kind: ValueKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ArraySpec {
    length_column: String,
    name: String,
    capacity: usize,
}

fn parse_column_spec(input: &str) -> Result<ColumnSpec, Error> {
    let Some((name, kind)) = input.rsplit_once(':') else {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid column spec '{input}'"))
            .with_hint("Use NAME:KIND, for example `--column x:i32`."));
    };
    if name.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!("column spec '{input}' has an empty name")));
    }
    Ok(ColumnSpec {
        name: name.to_string(),
        kind: kind.parse()?,
    })
}

fn parse_array_spec(input: &str) -> Result<ArraySpec, Error> {
    let invalid = || {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid array spec '{input}'"))
            .with_hint("Use LEN:NAME or LEN:NAME:MAX, for example `--array n:tracks:10`.")
    };
    let mut parts = input.split(':');
    let (Some(length_column), Some(name)) = (parts.next(), parts.next()) else {
        return Err(invalid());
    };
    let capacity = match parts.next() {
        Some(max) => max.parse::<usize>().map_err(|_| invalid())?,
        None => DEFAULT_CAPACITY,
    };
    if parts.next().is_some() || length_column.is_empty() || name.is_empty() {
        return Err(invalid());
    }
    Ok(ArraySpec {
        length_column: length_column.to_string(),
        name: name.to_string(),
        capacity,
    })
}

/// Every column in the store, arrays keyed by their count column.
fn default_request(store: &MemoryStore) -> (Vec<String>, Vec<ArraySpec>) {
    let mut columns = Vec::new();
    let mut arrays = Vec::new();
    for desc in store.columns() {
        match &desc.count_column {
            Some(count) => arrays.push(ArraySpec {
                length_column: count.clone(),
                name: desc.name.clone(),
                capacity: DEFAULT_CAPACITY,
            }),
            None => columns.push(desc.name.clone()),
        }
    }
    (columns, arrays)
}

fn column_kind(store: &dyn Store, name: &str) -> Option<ValueKind> {
    let handle = store.locate_column(name)?;
    store.describe(handle).map(|desc| desc.kind)
}

struct DumpRequest {
    label: String,
    columns: Vec<String>,
    arrays: Vec<ArraySpec>,
    read_all: bool,
    from: Option<u64>,
    stop_at: Option<u64>,
}

/// Iterates `store` and prints one JSON line per record. Returns the number printed.
fn dump_store(
    store: &mut dyn Store,
    request: &DumpRequest,
    color_mode: ColorMode,
) -> Result<u64, Error> {
    let mut columns = Vec::new();
    for name in &request.columns {
        match column_kind(store, name) {
            Some(kind) => columns.push(ColumnSpec {
                name: name.clone(),
                kind,
            }),
            None => emit_unresolved(&request.label, name, ColumnRole::Scalar, color_mode),
        }
    }
    let mut arrays = Vec::new();
    for array in &request.arrays {
        let Some(length_kind) = column_kind(store, &array.length_column) else {
            emit_unresolved(&request.label, &array.length_column, ColumnRole::Length, color_mode);
            continue;
        };
        let Some(kind) = column_kind(store, &array.name) else {
            emit_unresolved(&request.label, &array.name, ColumnRole::Member, color_mode);
            continue;
        };
        arrays.push((array, length_kind, kind));
    }

    let mut wrapper = TreeWrapper::with_store(store);
    for column in &columns {
        wrapper.leaf(&column.name).read_value(column.kind)?;
    }
    for (array, length_kind, kind) in &arrays {
        wrapper
            .group_with_kind(&array.length_column, *length_kind)?
            .leaf(&array.name)
            .read_value(*kind, array.capacity)?;
    }
    if let Some(stop_at) = request.stop_at {
        wrapper.stop_at(stop_at);
    }
    if let Some(from) = request.from {
        wrapper.set_entry(from);
    }

    let mut printed = 0;
    while wrapper.advance_with(request.read_all)? {
        let mut values = Map::new();
        for column in &columns {
            if let Some(value) = wrapper.get_leaf(&column.name).and_then(Leaf::value) {
                values.insert(column.name.clone(), value.to_json());
            }
        }
        for (array, _, _) in &arrays {
            let value = wrapper
                .get_group(&array.length_column)
                .and_then(|group| group.leaf(&array.name))
                .and_then(VarrLeaf::value);
            if let Some(value) = value {
                values.insert(array.name.clone(), value.to_json());
            }
        }
        emit_line(&json!({ "entry": wrapper.entry(), "values": values }));
        printed += 1;
    }
    Ok(printed)
}

/// Writes one record per JSON object read from `input`. Returns the number written.
fn fill_store<R: BufRead>(
    store: &mut MemoryStore,
    specs: &[ColumnSpec],
    input: R,
) -> Result<u64, Error> {
    let mut wrapper = TreeWrapper::new();
    for spec in specs {
        wrapper
            .leaf(&spec.name)
            .assign(ColumnValue::default_of(spec.kind))?;
    }
    wrapper.init(store);

    let mut written = 0;
    for (line_no, line) in input.lines().enumerate() {
        let line = line.map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read stdin")
                .with_source(err)
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Value = serde_json::from_str(&line).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("line {} is not valid JSON", line_no + 1))
                .with_source(err)
        })?;
        let Some(fields) = record.as_object() else {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("line {} is not a JSON object", line_no + 1)));
        };
        for spec in specs {
            let field = fields.get(&spec.name).unwrap_or(&Value::Null);
            let value = ColumnValue::from_json(spec.kind, field)
                .map_err(|err| err.with_column(&spec.name).with_entry(written))?;
            wrapper.leaf(&spec.name).assign(value)?;
        }
        wrapper.fill(true)?;
        written += 1;
    }
    Ok(written)
}

fn store_info_json(path: &std::path::Path, store: &MemoryStore) -> Value {
    let columns: Vec<Value> = store
        .columns()
        .map(|desc| {
            let children: Vec<&str> = desc
                .children
                .iter()
                .filter_map(|child| store.describe(*child))
                .map(|child| child.name.as_str())
                .collect();
            json!({
                "name": desc.name,
                "kind": desc.kind.name(),
                "count_column": desc.count_column,
                "children": children,
            })
        })
        .collect();
    json!({
        "path": path.display().to_string(),
        "entries": store.record_count(),
        "columns": columns,
    })
}

fn add_corrupt_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Corrupt || err.hint().is_some() {
        return err;
    }
    err.with_hint("The store file could not be decoded; regenerate it with `treewrap fill`.")
}

fn emit_json(value: Value) {
    let is_tty = io::stdout().is_terminal();
    let json = if is_tty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_line(value: &Value) {
    let json = serde_json::to_string(value)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn notice_time_now() -> Option<String> {
    use time::format_description::well_known::Rfc3339;
    let duration = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(duration.as_nanos() as i128).ok()?;
    ts.format(&Rfc3339).ok()
}

fn emit_unresolved(store: &str, column: &str, role: ColumnRole, color_mode: ColorMode) {
    let notice = UnresolvedColumn::new(store, column, role).with_time(notice_time_now());
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = colorize_label("notice:", color_mode.use_color(is_tty), AnsiColor::Yellow);
        eprintln!("{label} {} (store: {})", notice.message(), notice.store);
        return;
    }

    let value = notice.to_json();
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::AlreadyExists => "already exists".to_string(),
        ErrorKind::TypeMismatch => "type mismatch".to_string(),
        ErrorKind::SchemaMismatch => "schema mismatch".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(column) = err.column() {
        inner.insert("column".to_string(), json!(column));
    }
    if let Some(entry) = err.entry() {
        inner.insert("entry".to_string(), json!(entry));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(column) = err.column() {
        lines.push(format!(
            "{} {column}",
            colorize_label("column:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(entry) = err.entry() {
        lines.push(format!(
            "{} {entry}",
            colorize_label("entry:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let subcommand = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .and_then(|usage| {
            let mut tokens = usage.split_whitespace().skip_while(|t| *t != "treewrap");
            tokens.next()?;
            tokens.next().filter(|token| {
                !token.starts_with('-') && !token.starts_with('<') && !token.starts_with('[')
            })
        });
    match subcommand {
        Some(name) => format!("Try `treewrap {name} --help`."),
        None => "Try `treewrap --help`.".to_string(),
    }
}
