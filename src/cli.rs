// Command-line front end for RSER streams.
//
// JSON is the interchange format on the outside: `encode` turns JSON
// documents into an RSER stream, `decode` renders each message back as
// JSON, and `inspect` walks the framing without building values.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use serde_json::{Map as JsonMap, Value as Json, json};

use crate::io::{FileContents, FileStats, read_stream, write_stream};
use crate::stream::DEFAULT_MAX_MESSAGE_LEN;
use crate::value::{BinaryValue, Record, RecordArray, Value};
use crate::wire::code_table::{self, ALL_TAGS};
use crate::wire::decoder::DecodeOptions;
use crate::wire::key_cache::{MAX_CACHED_KEY_LEN, SLOTS_PER_LEN};
use crate::wire::{Header, HeaderStatus, PROTOCOL_VERSION, decode_value, parse_header};

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// RSER binary serialization tool.
#[derive(Parser, Debug)]
#[command(
    name = "rser",
    version,
    about = "Encode, decode and inspect RSER streams",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use multiple times for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Machine-readable output (stats for encode/decode, records for inspect).
    #[arg(long = "json", global = true)]
    json_output: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Convert JSON documents into an RSER stream.
    Encode(EncodeArgs),
    /// Print every message of an RSER stream as JSON.
    Decode(DecodeArgs),
    /// List the stream header and messages of an RSER stream.
    Inspect(InspectArgs),
    /// Print format constants and build configuration.
    Config,
}

#[derive(Args, Debug)]
struct EncodeArgs {
    /// Treat the input as JSON Lines (one message per non-empty line).
    #[arg(long)]
    lines: bool,

    /// Input JSON file (stdin if omitted).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Output RSER file (stdout if omitted).
    #[arg(value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Pretty-print each message.
    #[arg(long)]
    pretty: bool,

    /// Input RSER file (stdin if omitted).
    #[arg(value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Input RSER file.
    #[arg(value_hint = ValueHint::FilePath)]
    input: PathBuf,
}

// ---------------------------------------------------------------------------
// Resolved command + options (flattened from Cli)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Encode,
    Decode,
    Inspect,
    Config,
}

struct Options {
    command: Command,
    force: bool,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    lines: bool,
    pretty: bool,
    input_file: Option<PathBuf>,
    output_file: Option<PathBuf>,
}

fn resolve_options(cli: Cli) -> Options {
    let mut opts = Options {
        command: Command::Config,
        force: cli.force,
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
        lines: false,
        pretty: false,
        input_file: None,
        output_file: None,
    };
    match cli.command {
        Cmd::Encode(args) => {
            opts.command = Command::Encode;
            opts.lines = args.lines;
            opts.input_file = args.input;
            opts.output_file = args.output;
        }
        Cmd::Decode(args) => {
            opts.command = Command::Decode;
            opts.pretty = args.pretty;
            opts.input_file = args.input;
        }
        Cmd::Inspect(args) => {
            opts.command = Command::Inspect;
            opts.input_file = Some(args.input);
        }
        Cmd::Config => {}
    }
    opts
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("rser".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// JSON conversion
// ---------------------------------------------------------------------------

const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Build a value from JSON.
///
/// Integers beyond the f64-exact range become `BigInt`.  Arrays of two or
/// more objects sharing one non-empty key order become templated arrays.
/// Single-key objects `{"$bigint": "..."}`, `{"$date": ms}` and
/// `{"$symbol": "..."}` map to the matching kinds.
pub fn json_to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) if i.unsigned_abs() > MAX_SAFE_INTEGER as u64 => Value::BigInt(i),
            Some(i) => Value::Number(i as f64),
            None => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => templated(items)
            .unwrap_or_else(|| Value::array(items.iter().map(json_to_value).collect())),
        Json::Object(fields) => tagged(fields).unwrap_or_else(|| {
            Value::object(fields.iter().map(|(k, v)| (k.clone(), json_to_value(v))))
        }),
    }
}

fn tagged(fields: &JsonMap<String, Json>) -> Option<Value> {
    if fields.len() != 1 {
        return None;
    }
    let (key, inner) = fields.iter().next()?;
    match (key.as_str(), inner) {
        ("$bigint", Json::String(s)) => s.parse().ok().map(Value::BigInt),
        ("$date", Json::Number(n)) => n.as_i64().map(Value::Date),
        ("$symbol", Json::String(s)) => Some(Value::Symbol(s.clone())),
        _ => None,
    }
}

fn templated(items: &[Json]) -> Option<Value> {
    if items.len() < 2 {
        return None;
    }
    let records = items
        .iter()
        .map(|item| match item {
            Json::Object(fields) if !fields.is_empty() && tagged(fields).is_none() => Some(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), json_to_value(v)))
                    .collect::<Record>(),
            ),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    RecordArray::from_records(&records).map(Value::records)
}

/// Render a value as JSON.  Kinds JSON cannot express become single-key
/// tagged objects; a back-edge to a value still being rendered becomes
/// `"[Circular]"`.
pub fn value_to_json(value: &Value) -> Json {
    render(value, &mut Vec::new())
}

fn render(value: &Value, active: &mut Vec<usize>) -> Json {
    if let Some(id) = value.identity()
        && !matches!(value, Value::SharedString(_))
    {
        if active.contains(&id) {
            return Json::String("[Circular]".into());
        }
        active.push(id);
        let out = render_composite(value, active);
        active.pop();
        return out;
    }

    match value {
        Value::Undefined | Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => render_number(*n),
        Value::BigInt(i) => json!({ "$bigint": i.to_string() }),
        Value::String(s) => Json::String(s.clone()),
        Value::SharedString(s) => Json::String(s.to_string()),
        Value::Symbol(s) => json!({ "$symbol": s }),
        Value::Date(ms) => json!({ "$date": ms }),
        Value::RegExp(re) => json!({ "$regexp": re.source, "flags": re.flags.to_string() }),
        Value::Error(err) => {
            let frames: Vec<Json> = err
                .frames
                .iter()
                .map(|f| {
                    json!({
                        "function": f.function_name,
                        "file": f.file_name,
                        "line": f.line,
                        "column": f.column,
                    })
                })
                .collect();
            json!({
                "$error": err.kind.name(),
                "message": err.message,
                "stack": err.stack,
                "properties": render_record(&err.properties, active),
                "frames": frames,
            })
        }
        Value::Binary(BinaryValue::Buffer(bytes)) => json!({ "$bytes": hex(bytes) }),
        Value::Binary(BinaryValue::View { kind, bytes }) => {
            json!({ "$view": format!("{kind:?}"), "bytes": hex(bytes) })
        }
        Value::Path(p) => json!({ "$path": p.path, "flavor": format!("{:?}", p.flavor) }),
        _ => render_composite(value, active),
    }
}

fn render_composite(value: &Value, active: &mut Vec<usize>) -> Json {
    match value {
        Value::Array(items) => Json::Array(items.borrow().iter().map(|v| render(v, active)).collect()),
        Value::Records(records) => Json::Array(
            records
                .borrow()
                .to_records()
                .iter()
                .map(|r| render_record(r, active))
                .collect(),
        ),
        Value::Map(map) => {
            let entries: Vec<Json> = map
                .borrow()
                .iter()
                .map(|(k, v)| Json::Array(vec![render(k, active), render(v, active)]))
                .collect();
            json!({ "$map": entries })
        }
        Value::Set(set) => {
            let items: Vec<Json> = set.borrow().iter().map(|v| render(v, active)).collect();
            json!({ "$set": items })
        }
        Value::Object(record) => render_record(&record.borrow(), active),
        Value::PathCollection(paths) => {
            let paths = paths.borrow();
            let items: Vec<Json> = paths.items.iter().map(|v| render(v, active)).collect();
            json!({ "$paths": items, "flavor": format!("{:?}", paths.flavor) })
        }
        _ => Json::Null,
    }
}

fn render_record(record: &Record, active: &mut Vec<usize>) -> Json {
    let mut out = JsonMap::new();
    for (k, v) in record.defined() {
        out.insert(k.to_owned(), render(v, active));
    }
    Json::Object(out)
}

fn render_number(n: f64) -> Json {
    if n.is_nan() {
        json!({ "$number": "NaN" })
    } else if n.is_infinite() {
        json!({ "$number": if n > 0.0 { "Infinity" } else { "-Infinity" } })
    } else if n == 0.0 && n.is_sign_negative() {
        json!({ "$number": "-0" })
    } else if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn open_input(opts: &Options) -> Result<Box<dyn Read>, String> {
    match &opts.input_file {
        Some(path) => File::open(path)
            .map(|f| Box::new(BufReader::with_capacity(BUF_SIZE, f)) as Box<dyn Read>)
            .map_err(|e| format!("input file: {}: {e}", path.display())),
        None => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

fn open_output(opts: &Options) -> Result<Box<dyn Write>, String> {
    match &opts.output_file {
        Some(path) => {
            if path.exists() && !opts.force {
                return Err(format!(
                    "output file exists, use -f to overwrite: {}",
                    path.display()
                ));
            }
            File::create(path)
                .map(|f| Box::new(BufWriter::with_capacity(BUF_SIZE, f)) as Box<dyn Write>)
                .map_err(|e| format!("output file: {}: {e}", path.display()))
        }
        None => Ok(Box::new(BufWriter::with_capacity(
            BUF_SIZE,
            io::stdout().lock(),
        ))),
    }
}

fn parse_json_input(text: &str, lines: bool) -> Result<Vec<Json>, String> {
    if lines {
        return text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|e| format!("line {}: {e}", i + 1))
            })
            .collect();
    }
    serde_json::Deserializer::from_str(text)
        .into_iter::<Json>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid JSON: {e}"))
}

// ---------------------------------------------------------------------------
// Config command
// ---------------------------------------------------------------------------

fn cmd_config() -> i32 {
    let version = env!("CARGO_PKG_VERSION");
    let defaults = DecodeOptions::default();
    eprintln!("rser version {version}");
    eprintln!("PROTOCOL_VERSION={PROTOCOL_VERSION}");
    eprintln!("TAGS={}", ALL_TAGS.len());
    eprintln!("FILE_IO={}", cfg!(feature = "file-io") as u8);
    eprintln!("MAX_DEPTH={}", defaults.max_depth);
    eprintln!("MAX_LENGTH={}", defaults.max_length);
    eprintln!("MAX_MESSAGE_LEN={DEFAULT_MAX_MESSAGE_LEN}");
    eprintln!("KEY_CACHE_MAX_LEN={MAX_CACHED_KEY_LEN}");
    eprintln!("KEY_CACHE_SLOTS={SLOTS_PER_LEN}");
    0
}

// ---------------------------------------------------------------------------
// Encode command
// ---------------------------------------------------------------------------

fn cmd_encode(opts: &Options) -> i32 {
    let mut text = String::new();
    let read = open_input(opts).and_then(|mut r| {
        r.read_to_string(&mut text)
            .map_err(|e| format!("read error: {e}"))
    });
    if let Err(e) = read {
        eprintln!("rser: {e}");
        return 1;
    }

    let documents = match parse_json_input(&text, opts.lines) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("rser: {e}");
            return 1;
        }
    };
    let values: Vec<Value> = documents.iter().map(json_to_value).collect();

    let mut writer = match open_output(opts) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("rser: {e}");
            return 1;
        }
    };
    let stats = match write_stream(&mut writer, &values) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("rser: encode error: {e}");
            return 1;
        }
    };
    if let Err(e) = writer.flush() {
        eprintln!("rser: write flush error: {e}");
        return 1;
    }

    report_stats("encode", &stats, opts);
    0
}

fn report_stats(command: &str, stats: &FileStats, opts: &Options) {
    let sha256 = stats.sha256.as_ref().map(|d| hex(d));
    if opts.verbose > 0 && !opts.quiet {
        eprintln!(
            "rser: {command}: messages: {}, bytes: {}",
            stats.messages, stats.bytes
        );
        if let Some(sha) = &sha256 {
            eprintln!("rser: sha256: {sha}");
        }
    }
    if opts.json_output {
        let json = json!({
            "command": command,
            "messages": stats.messages,
            "bytes": stats.bytes,
            "sha256": sha256,
        });
        eprintln!("{json:#}");
    }
}

// ---------------------------------------------------------------------------
// Decode command
// ---------------------------------------------------------------------------

fn cmd_decode(opts: &Options) -> i32 {
    let reader = match open_input(opts) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("rser: {e}");
            return 1;
        }
    };
    let values = match read_stream(reader) {
        Ok(FileContents::Values(v)) => v,
        Ok(FileContents::Incompatible { version }) => {
            eprintln!("rser: unsupported stream version {version} (this build reads {PROTOCOL_VERSION})");
            return 1;
        }
        Err(e) => {
            eprintln!("rser: decode error: {e}");
            return 1;
        }
    };

    let mut out = BufWriter::with_capacity(BUF_SIZE, io::stdout().lock());
    for value in &values {
        let json = value_to_json(value);
        let written = if opts.pretty {
            writeln!(out, "{json:#}")
        } else {
            writeln!(out, "{json}")
        };
        if let Err(e) = written {
            eprintln!("rser: write error: {e}");
            return 1;
        }
    }
    if let Err(e) = out.flush() {
        eprintln!("rser: write flush error: {e}");
        return 1;
    }

    if opts.verbose > 0 && !opts.quiet {
        eprintln!("rser: decode: messages: {}", values.len());
    }
    if opts.json_output {
        eprintln!("{:#}", json!({ "command": "decode", "messages": values.len() }));
    }
    0
}

// ---------------------------------------------------------------------------
// Inspect command
// ---------------------------------------------------------------------------

fn cmd_inspect(opts: &Options) -> i32 {
    let Some(path) = &opts.input_file else {
        eprintln!("rser: inspect requires an input file");
        return 1;
    };
    let data = match std::fs::read(path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("rser: input file: {}: {e}", path.display());
            return 1;
        }
    };

    let mut out = BufWriter::new(io::stdout().lock());
    let mut pos = 0;
    let mut messages = 0u64;
    while pos < data.len() {
        let (header, header_len) = match parse_header(&data[pos..]) {
            Ok(HeaderStatus::Complete { header, len }) => (header, len),
            Ok(HeaderStatus::NeedMore(_)) => {
                eprintln!("rser: truncated header at offset {pos}");
                return 1;
            }
            Err(e) => {
                eprintln!("rser: bad header at offset {pos}: {e}");
                return 1;
            }
        };

        let line = match header {
            Header::Stream { version } => {
                if opts.json_output {
                    json!({ "offset": pos, "kind": "stream", "version": version }).to_string()
                } else {
                    format!("{pos:>10}  STREAM_HEADER  version {version}")
                }
            }
            Header::Message { length } => {
                let start = pos + header_len;
                let Some(payload) = data.get(start..start + length) else {
                    eprintln!(
                        "rser: message at offset {pos} needs {length} bytes, {} available",
                        data.len() - start
                    );
                    return 1;
                };
                messages += 1;
                let root = payload
                    .first()
                    .and_then(|&b| code_table::lookup(b))
                    .map_or("INVALID", |t| t.name());
                let status = match decode_value(payload) {
                    Ok(v) if opts.verbose > 0 => format!("ok ({})", v.kind_name()),
                    Ok(_) => "ok".to_string(),
                    Err(e) => e.to_string(),
                };
                if opts.json_output {
                    json!({
                        "offset": pos,
                        "kind": "message",
                        "length": length,
                        "root": root,
                        "status": status,
                    })
                    .to_string()
                } else {
                    format!("{pos:>10}  MESSAGE  length {length:<8} root {root:<24} {status}")
                }
            }
        };
        if let Err(e) = writeln!(out, "{line}") {
            eprintln!("rser: write error: {e}");
            return 1;
        }
        pos += header_len
            + match header {
                Header::Message { length } => length,
                Header::Stream { .. } => 0,
            };
    }
    if let Err(e) = out.flush() {
        eprintln!("rser: write flush error: {e}");
        return 1;
    }
    if !opts.quiet && !opts.json_output {
        eprintln!("rser: {messages} messages, {} bytes", data.len());
    }
    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = Cli::parse();
    let opts = resolve_options(cli);

    let exit_code = match opts.command {
        Command::Encode => cmd_encode(&opts),
        Command::Decode => cmd_decode(&opts),
        Command::Inspect => cmd_inspect(&opts),
        Command::Config => cmd_config(),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
