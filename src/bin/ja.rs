//! ja: relational algebra over JSON Lines.
//!
//! Every command reads JSONL from a file or stdin (`-` or omitted) and
//! writes JSONL to stdout, so commands compose with shell pipes:
//!
//!   cat users.jsonl | ja select 'age > 25' | ja project name,email
//!   ja join users.jsonl orders.jsonl --on id=user_id
//!   ja sort timestamp huge.jsonl --window-size 1000
//!   ja repl users.jsonl

use std::io::Write;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ja::agg::{parse_agg_spec, AggOptions, AggRegistry};
use ja::error::{JaError, Result};
use ja::expr::{parse_projection, AdvancedQuery, CompiledExpr};
use ja::io::{open_output, JsonlReader, JsonlWriter, WriterConfig};
use ja::ops::{parse_join_on, EvalPolicy, JoinMode, ProjectOptions, RenameSpec};
use ja::pipeline::{Op, Pipeline};
use ja::plan::{self, Planner};
use ja::value::Path;
use ja::workspace::{DatasetKind, Session};

#[derive(Parser)]
#[command(name = "ja")]
#[command(about = "Relational algebra over JSON Lines", long_about = None)]
struct Cli {
    /// Write output to a file instead of stdout
    #[arg(long, short = 'o', global = true)]
    output: Option<String>,

    /// Drop rows that fail per-record evaluation instead of aborting
    #[arg(long, global = true)]
    lenient: bool,

    /// Emit object keys in sorted order
    #[arg(long, global = true)]
    sort_keys: bool,

    /// Report fatal errors as one JSON object per line on stderr
    #[arg(long, global = true)]
    json_errors: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter rows with a filter expression
    Select {
        /// e.g. 'amount > 100 and user.tier == "gold"'
        expr: String,
        /// Input file (stdin if omitted or -)
        file: Option<String>,
        /// Treat EXPR as a JMESPath query instead
        #[arg(long)]
        jmespath: bool,
    },

    /// Keep specific fields, or compute new ones with name=expr
    Project {
        /// Comma-separated paths or name=expr pairs
        fields: String,
        file: Option<String>,
        /// Nest dotted names into structured output
        #[arg(long, conflicts_with = "flatten")]
        nest: bool,
        /// Spell dotted names as flat keys (the default)
        #[arg(long)]
        flatten: bool,
        /// Serialize absent fields as null instead of omitting them
        #[arg(long)]
        nulls: bool,
    },

    /// Rename fields: old=new,old2=new2 (dotted paths allowed)
    Rename {
        mapping: String,
        file: Option<String>,
        /// Fail when a source path is missing
        #[arg(long)]
        strict: bool,
    },

    /// Unnest an array field, one output row per element
    Explode {
        path: String,
        file: Option<String>,
    },

    /// Remove duplicate rows, keeping first-seen order
    Distinct { file: Option<String> },

    /// Sort by one or more dotted paths
    Sort {
        /// Comma-separated sort keys
        keys: String,
        file: Option<String>,
        #[arg(long)]
        desc: bool,
        /// Sort each window of N rows independently (approximate)
        #[arg(long)]
        window_size: Option<usize>,
    },

    /// Concatenate two relations (never deduplicates)
    Union { left: String, right: String },

    /// Rows present in both relations (multiset)
    Intersection {
        left: String,
        right: String,
        #[arg(long)]
        window_size: Option<usize>,
    },

    /// Rows of A not cancelled by B (multiset)
    Difference {
        left: String,
        right: String,
        #[arg(long)]
        window_size: Option<usize>,
    },

    /// Cartesian product
    Product { left: String, right: String },

    /// Equi-join two relations over dotted paths
    Join {
        left: String,
        right: String,
        /// Comma-separated l_path=r_path pairs
        #[arg(long)]
        on: String,
        /// inner, left, right, or outer
        #[arg(long, default_value = "inner")]
        mode: String,
    },

    /// Group by a key; annotate with metadata, or aggregate with --agg
    Groupby {
        key: String,
        file: Option<String>,
        /// Aggregations, e.g. count,total=sum(amount)
        #[arg(long)]
        agg: Option<String>,
        #[arg(long)]
        window_size: Option<usize>,
        /// sum over an empty group yields 0 instead of an omitted key
        #[arg(long)]
        sum_empty_zero: bool,
    },

    /// Aggregate group-annotated rows (whole input is one group if bare)
    Agg {
        spec: String,
        file: Option<String>,
        #[arg(long)]
        sum_empty_zero: bool,
    },

    /// Infer or validate schemas
    Schema {
        #[command(subcommand)]
        cmd: SchemaCommands,
    },

    /// Interactive workspace over named datasets
    Repl { file: Option<String> },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Infer a JSON-Schema-style description of a relation
    Infer { file: Option<String> },
    /// Check every record of FILE against SCHEMA
    Validate { schema: String, file: String },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json_errors = cli.json_errors;
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json_errors {
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "error": e.kind(),
                        "message": e.to_string(),
                        "exit_code": e.exit_code(),
                    })
                );
            } else {
                eprintln!("ja: {}", e.render_diagnostic());
            }
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let policy = if cli.lenient {
        EvalPolicy::Lenient
    } else {
        EvalPolicy::Strict
    };
    let writer_config = WriterConfig {
        sort_keys: cli.sort_keys,
    };
    let output = cli.output.as_deref();

    match cli.cmd {
        Commands::Select {
            expr,
            file,
            jmespath,
        } => {
            let op = if jmespath {
                Op::SelectAdvanced {
                    query: AdvancedQuery::compile(&expr)?,
                    policy,
                }
            } else {
                Op::Select {
                    expr: CompiledExpr::compile(&expr)?,
                    policy,
                }
            };
            run_unary(op, file.as_deref(), None, cli.lenient, output, writer_config)
        }

        Commands::Project {
            fields,
            file,
            nest,
            nulls,
            ..
        } => {
            let op = Op::Project {
                fields: parse_projection(&fields)?,
                options: ProjectOptions { nest, nulls },
                policy,
            };
            run_unary(op, file.as_deref(), None, cli.lenient, output, writer_config)
        }

        Commands::Rename {
            mapping,
            file,
            strict,
        } => {
            let op = Op::Rename(RenameSpec::parse(&mapping, strict)?);
            run_unary(op, file.as_deref(), None, cli.lenient, output, writer_config)
        }

        Commands::Explode { path, file } => run_unary(
            Op::Explode(Path::parse(&path)),
            file.as_deref(),
            None,
            cli.lenient,
            output,
            writer_config,
        ),

        Commands::Distinct { file } => run_unary(
            Op::Distinct,
            file.as_deref(),
            None,
            cli.lenient,
            output,
            writer_config,
        ),

        Commands::Sort {
            keys,
            file,
            desc,
            window_size,
        } => {
            let op = Op::Sort {
                keys: parse_paths(&keys),
                descending: desc,
            };
            run_unary(op, file.as_deref(), window_size, cli.lenient, output, writer_config)
        }

        Commands::Union { left, right } => {
            check_stdin_sides(&left, &right)?;
            let a = JsonlReader::open(Some(&left), cli.lenient)?;
            let b = JsonlReader::open(Some(&right), cli.lenient)?;
            let mut writer = JsonlWriter::new(open_output(output)?, writer_config);
            writer.write_all(ja::ops::union(a, b))
        }

        Commands::Intersection {
            left,
            right,
            window_size,
        } => {
            check_stdin_sides(&left, &right)?;
            let other = read_all(&right, cli.lenient)?;
            run_binary(
                Op::Intersection { other },
                &left,
                window_size,
                cli.lenient,
                output,
                writer_config,
            )
        }

        Commands::Difference {
            left,
            right,
            window_size,
        } => {
            check_stdin_sides(&left, &right)?;
            let other = read_all(&right, cli.lenient)?;
            run_binary(
                Op::Difference { other },
                &left,
                window_size,
                cli.lenient,
                output,
                writer_config,
            )
        }

        Commands::Product { left, right } => {
            check_stdin_sides(&left, &right)?;
            let other = read_all(&right, cli.lenient)?;
            run_binary(
                Op::Product { other },
                &left,
                None,
                cli.lenient,
                output,
                writer_config,
            )
        }

        Commands::Join {
            left,
            right,
            on,
            mode,
        } => {
            check_stdin_sides(&left, &right)?;
            let op = Op::Join {
                right: read_all(&right, cli.lenient)?,
                on: parse_join_on(&on)?,
                mode: mode.parse::<JoinMode>()?,
            };
            run_binary(op, &left, None, cli.lenient, output, writer_config)
        }

        Commands::Groupby {
            key,
            file,
            agg,
            window_size,
            sum_empty_zero,
        } => {
            let mut pipeline = Pipeline::new().then(Op::GroupBy(Path::parse(&key)));
            if let Some(spec) = agg {
                pipeline = pipeline.then(Op::Aggregate {
                    specs: parse_agg_spec(&spec)?,
                    registry: AggRegistry::with_builtins(AggOptions {
                        sum_empty_is_zero: sum_empty_zero,
                    }),
                    empty_as_single_group: false,
                });
            }
            run_pipeline(
                pipeline,
                file.as_deref(),
                window_size,
                cli.lenient,
                output,
                writer_config,
            )
        }

        Commands::Agg {
            spec,
            file,
            sum_empty_zero,
        } => {
            let op = Op::Aggregate {
                specs: parse_agg_spec(&spec)?,
                registry: AggRegistry::with_builtins(AggOptions {
                    sum_empty_is_zero: sum_empty_zero,
                }),
                empty_as_single_group: true,
            };
            run_unary(op, file.as_deref(), None, cli.lenient, output, writer_config)
        }

        Commands::Schema { cmd } => match cmd {
            SchemaCommands::Infer { file } => {
                let records = read_all_opt(file.as_deref(), cli.lenient)?;
                let schema = ja::schema::infer_schema(&records);
                let mut out = open_output(output)?;
                let text = serde_json::to_string_pretty(&schema)
                    .map_err(|e| JaError::internal(format!("serialization failed: {e}")))?;
                writeln!(out, "{text}").map_err(JaError::Io)?;
                out.flush().map_err(JaError::Io)
            }
            SchemaCommands::Validate { schema, file } => {
                let schema_text = std::fs::read_to_string(&schema).map_err(JaError::Io)?;
                let schema_value: serde_json::Value = serde_json::from_str(&schema_text)
                    .map_err(|e| JaError::InputParse {
                        path: schema.clone(),
                        line: e.line(),
                        reason: e.to_string(),
                    })?;
                let mut violations = 0usize;
                for (idx, record) in JsonlReader::open(Some(&file), cli.lenient)?.enumerate() {
                    let record = record?;
                    for violation in
                        ja::schema::validate_record(&schema_value, &serde_json::Value::Object(record))
                    {
                        eprintln!("{file}: record {}: {violation}", idx + 1);
                        violations += 1;
                    }
                }
                if violations > 0 {
                    return Err(JaError::pipeline(format!("{violations} validation error(s)")));
                }
                Ok(())
            }
        },

        Commands::Repl { file } => repl(file.as_deref()),
    }
}

fn parse_paths(spec: &str) -> Vec<Path> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Path::parse)
        .collect()
}

/// Binary operators take stdin on at most one side.
fn check_stdin_sides(left: &str, right: &str) -> Result<()> {
    if left == "-" && right == "-" {
        return Err(JaError::Usage(
            "only one side of a binary operator may read stdin".into(),
        ));
    }
    Ok(())
}

fn read_all(path: &str, lenient: bool) -> Result<Vec<ja::Record>> {
    JsonlReader::open(Some(path), lenient)?.collect()
}

fn read_all_opt(path: Option<&str>, lenient: bool) -> Result<Vec<ja::Record>> {
    JsonlReader::open(path, lenient)?.collect()
}

fn run_unary(
    op: Op,
    file: Option<&str>,
    window_size: Option<usize>,
    lenient: bool,
    output: Option<&str>,
    writer_config: WriterConfig,
) -> Result<()> {
    run_pipeline(
        Pipeline::new().then(op),
        file,
        window_size,
        lenient,
        output,
        writer_config,
    )
}

fn run_binary(
    op: Op,
    left: &str,
    window_size: Option<usize>,
    lenient: bool,
    output: Option<&str>,
    writer_config: WriterConfig,
) -> Result<()> {
    run_pipeline(
        Pipeline::new().then(op),
        Some(left),
        window_size,
        lenient,
        output,
        writer_config,
    )
}

fn run_pipeline(
    pipeline: Pipeline,
    file: Option<&str>,
    window_size: Option<usize>,
    lenient: bool,
    output: Option<&str>,
    writer_config: WriterConfig,
) -> Result<()> {
    let planner = Planner {
        window_size,
        input_bytes: plan::input_size_hint(file),
        streaming_requested: false,
    };
    let execution_plan = planner.plan(&pipeline);
    plan::emit_warnings(&execution_plan);

    let reader = JsonlReader::open(file, lenient)?;
    let stream = plan::execute(&pipeline, Box::new(reader), &execution_plan);
    let mut writer = JsonlWriter::new(open_output(output)?, writer_config);
    writer.write_all(stream)
}

// ---------------------------------------------------------------------------
// REPL

fn repl(initial: Option<&str>) -> Result<()> {
    let mut session = Session::new()?;
    if let Some(path) = initial {
        match session.load(path, None) {
            Ok(name) => println!("loaded '{name}' from {path}"),
            Err(e) => eprintln!("ja: {e}"),
        }
    }

    println!("ja workspace. 'help' lists commands, 'exit' quits.");
    let stdin = std::io::stdin();
    loop {
        print!("ja> ");
        std::io::stdout().flush().map_err(JaError::Io)?;

        let mut line = String::new();
        if stdin.read_line(&mut line).map_err(JaError::Io)? == 0 {
            println!();
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }
        if let Some(cmd) = line.strip_prefix('!') {
            shell_out(cmd);
            continue;
        }
        if let Err(e) = dispatch(&mut session, line) {
            match e.downcast_ref::<JaError>() {
                Some(ja_error) => eprintln!("ja: {}", ja_error.render_diagnostic()),
                None => eprintln!("ja: {e:#}"),
            }
        }
    }
    Ok(())
}

fn shell_out(cmd: &str) {
    let status = std::process::Command::new("sh").arg("-c").arg(cmd).status();
    if let Err(e) = status {
        eprintln!("ja: shell: {e}");
    }
}

fn dispatch(session: &mut Session, line: &str) -> anyhow::Result<()> {
    let args = split_args(line)?;
    let (command, rest) = args
        .split_first()
        .ok_or_else(|| JaError::Usage("empty command".into()))?;

    match command.as_str() {
        "help" => {
            print_repl_help();
            Ok(())
        }
        "load" => {
            let path = rest
                .first()
                .ok_or_else(|| JaError::Usage("load <path> [name]".into()))?;
            let name = session.load(path, rest.get(1).map(String::as_str))?;
            println!("loaded '{name}'");
            Ok(())
        }
        "cd" => {
            let name = rest
                .first()
                .ok_or_else(|| JaError::Usage("cd <dataset>".into()))?;
            Ok(session.cd(name)?)
        }
        "pwd" => {
            match session.pwd() {
                Some(name) => println!("{name}"),
                None => println!("(no current dataset)"),
            }
            Ok(())
        }
        "datasets" => {
            for (name, dataset, is_current) in session.datasets() {
                let marker = if is_current { "*" } else { " " };
                let kind = match dataset.kind {
                    DatasetKind::Source => "source",
                    DatasetKind::Derived => "derived",
                };
                println!("{marker} {name}  [{kind}] {}", dataset.path.display());
            }
            Ok(())
        }
        "info" => {
            let info = session.info(rest.first().map(String::as_str))?;
            println!("name:  {}", info.name);
            println!("rows:  {}", info.row_count);
            println!("bytes: {}", info.size_bytes);
            println!("keys:  {}", info.top_level_keys.join(", "));
            if let Some(preview) = info.preview {
                println!(
                    "first: {}",
                    serde_json::to_string(&preview)
                        .map_err(|e| JaError::internal(format!("serialization failed: {e}")))?
                );
            }
            Ok(())
        }
        "ls" => {
            let (name, limit) = match rest {
                [] => (None, 10),
                [first] => match first.parse::<usize>() {
                    Ok(n) => (None, n),
                    Err(_) => (Some(first.as_str()), 10),
                },
                [first, second, ..] => (
                    Some(first.as_str()),
                    second
                        .parse::<usize>()
                        .context("ls limit must be a number")?,
                ),
            };
            for record in session.ls(name, limit)? {
                println!(
                    "{}",
                    serde_json::to_string(&record)
                        .map_err(|e| JaError::internal(format!("serialization failed: {e}")))?
                );
            }
            Ok(())
        }
        "save" => {
            let dest = rest
                .first()
                .ok_or_else(|| JaError::Usage("save <path>".into()))?;
            session.save(dest)?;
            println!("saved to {dest}");
            Ok(())
        }
        "compile" => {
            println!("{}", session.compile()?);
            Ok(())
        }
        _ => Ok(dispatch_operator(session, command, rest)?),
    }
}

fn dispatch_operator(session: &mut Session, command: &str, rest: &[String]) -> Result<()> {
    let (output, args) = rest
        .split_first()
        .ok_or_else(|| JaError::Usage(format!("{command} <output> ...")))?;

    let (pipeline, spelled) = match command {
        "select" => {
            let expr = args
                .first()
                .ok_or_else(|| JaError::Usage("select <output> <expr>".into()))?;
            let op = if args.iter().any(|a| a == "--jmespath") {
                Op::SelectAdvanced {
                    query: AdvancedQuery::compile(expr)?,
                    policy: EvalPolicy::Strict,
                }
            } else {
                Op::Select {
                    expr: CompiledExpr::compile(expr)?,
                    policy: EvalPolicy::Strict,
                }
            };
            (Pipeline::new().then(op), format!("select '{expr}'"))
        }
        "project" => {
            let fields = args
                .first()
                .ok_or_else(|| JaError::Usage("project <output> <fields>".into()))?;
            let op = Op::Project {
                fields: parse_projection(fields)?,
                options: ProjectOptions::default(),
                policy: EvalPolicy::Strict,
            };
            (Pipeline::new().then(op), format!("project {fields}"))
        }
        "rename" => {
            let mapping = args
                .first()
                .ok_or_else(|| JaError::Usage("rename <output> <old=new,...>".into()))?;
            let op = Op::Rename(RenameSpec::parse(mapping, false)?);
            (Pipeline::new().then(op), format!("rename {mapping}"))
        }
        "explode" => {
            let path = args
                .first()
                .ok_or_else(|| JaError::Usage("explode <output> <path>".into()))?;
            (
                Pipeline::new().then(Op::Explode(Path::parse(path))),
                format!("explode {path}"),
            )
        }
        "distinct" => (Pipeline::new().then(Op::Distinct), "distinct".to_string()),
        "sort" => {
            let keys = args
                .first()
                .ok_or_else(|| JaError::Usage("sort <output> <keys> [--desc]".into()))?;
            let descending = args.iter().any(|a| a == "--desc");
            let op = Op::Sort {
                keys: parse_paths(keys),
                descending,
            };
            let spelled = if descending {
                format!("sort {keys} --desc")
            } else {
                format!("sort {keys}")
            };
            (Pipeline::new().then(op), spelled)
        }
        "groupby" => {
            let key = args
                .first()
                .ok_or_else(|| JaError::Usage("groupby <output> <key> [--agg <spec>]".into()))?;
            let mut pipeline = Pipeline::new().then(Op::GroupBy(Path::parse(key)));
            let mut spelled = format!("groupby {key}");
            if let Some(pos) = args.iter().position(|a| a == "--agg") {
                let spec = args
                    .get(pos + 1)
                    .ok_or_else(|| JaError::Usage("--agg needs a spec".into()))?;
                pipeline = pipeline.then(Op::Aggregate {
                    specs: parse_agg_spec(spec)?,
                    registry: AggRegistry::default(),
                    empty_as_single_group: false,
                });
                spelled = format!("groupby {key} --agg '{spec}'");
            }
            (pipeline, spelled)
        }
        "agg" => {
            let spec = args
                .first()
                .ok_or_else(|| JaError::Usage("agg <output> <spec>".into()))?;
            let op = Op::Aggregate {
                specs: parse_agg_spec(spec)?,
                registry: AggRegistry::default(),
                empty_as_single_group: true,
            };
            (Pipeline::new().then(op), format!("agg '{spec}'"))
        }
        "join" => {
            let right = args
                .first()
                .ok_or_else(|| JaError::Usage("join <output> <dataset> --on <l=r,...>".into()))?;
            let on_pos = args
                .iter()
                .position(|a| a == "--on")
                .ok_or_else(|| JaError::Usage("join needs --on <l=r,...>".into()))?;
            let pairs = args
                .get(on_pos + 1)
                .ok_or_else(|| JaError::Usage("--on needs key pairs".into()))?;
            let mode = match args.iter().position(|a| a == "--mode") {
                Some(pos) => args
                    .get(pos + 1)
                    .ok_or_else(|| JaError::Usage("--mode needs a value".into()))?
                    .parse::<JoinMode>()?,
                None => JoinMode::Inner,
            };
            let op = Op::Join {
                right: session.materialize(right)?,
                on: parse_join_on(pairs)?,
                mode,
            };
            (
                Pipeline::new().then(op),
                format!("join {right} --on {pairs}"),
            )
        }
        "union" | "intersection" | "difference" | "product" => {
            let right = args
                .first()
                .ok_or_else(|| JaError::Usage(format!("{command} <output> <dataset>")))?;
            let other = session.materialize(right)?;
            let op = match command {
                "union" => Op::Union { other },
                "intersection" => Op::Intersection { other },
                "difference" => Op::Difference { other },
                _ => Op::Product { other },
            };
            (
                Pipeline::new().then(op),
                format!("{command} {right}"),
            )
        }
        other => {
            return Err(JaError::Usage(format!(
                "unknown command '{other}'; try 'help'"
            )))
        }
    };

    let name = session.apply(output, &pipeline, Planner::default(), &spelled)?;
    println!("-> {name}");
    Ok(())
}

fn print_repl_help() {
    println!("Workspace:");
    println!("  load <path> [name]        register a source dataset");
    println!("  cd <name> / pwd           move or show the current dataset");
    println!("  datasets                  list datasets (current marked *)");
    println!("  info [name]               row count, size, keys, preview");
    println!("  ls [name] [limit]         print the first rows");
    println!("  save <path>               copy the current dataset to a file");
    println!("  compile                   show the equivalent shell pipeline");
    println!("  !<cmd>                    run a shell command");
    println!();
    println!("Operators (read the current dataset, write a new one):");
    println!("  select <out> <expr> [--jmespath]");
    println!("  project <out> <fields>");
    println!("  rename <out> <old=new,...>");
    println!("  explode <out> <path>");
    println!("  distinct <out>");
    println!("  sort <out> <keys> [--desc]");
    println!("  groupby <out> <key> [--agg <spec>]");
    println!("  agg <out> <spec>");
    println!("  join <out> <dataset> --on <l=r,...> [--mode inner|left|right|outer]");
    println!("  union|intersection|difference|product <out> <dataset>");
    println!();
    println!("  exit                      quit (scratch files are removed)");
}

/// Split a command line on whitespace, honoring single and double quotes.
fn split_args(line: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut pending = false;

    for c in line.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    pending = true;
                }
                c if c.is_whitespace() => {
                    if pending {
                        args.push(std::mem::take(&mut current));
                        pending = false;
                    }
                }
                c => {
                    current.push(c);
                    pending = true;
                }
            },
        }
    }
    if quote.is_some() {
        return Err(JaError::Usage("unbalanced quote".into()));
    }
    if pending {
        args.push(current);
    }
    Ok(args)
}
