// Use jemalloc for better memory allocation performance on Unix-like systems
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

// Use mimalloc on Windows for better performance
#[cfg(target_env = "msvc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Args, Parser, Subcommand};
use colored::*;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;

use docmend_lib::config as docmend_config;
use docmend_lib::config::{Config, normalize_key};
use docmend_lib::exit_codes::exit;
use docmend_lib::file_processor::{self, CleanedFile, WalkOptions};
use docmend_lib::patch::{ApplyError, ApplyStatus};
use docmend_lib::utils::{LineEnding, detect_line_ending, normalize_line_ending};
use docmend_lib::{Pipeline, ProcessingContext, Proposal, apply_proposals, clean_proposal_with};

mod formatter;

#[derive(Parser)]
#[command(author, version, about, long_about = None, arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Control colored output: auto, always, never
    #[arg(long, global = true, default_value = "auto", value_parser = ["auto", "always", "never"])]
    color: String,

    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Ignore all configuration files and use built-in defaults
    #[arg(long, global = true)]
    no_config: bool,

    /// Ignore all configuration files (alias for --no-config)
    #[arg(long, global = true, conflicts_with = "no_config")]
    isolated: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean Markdown files or stdin through the processor pipeline
    Clean(CleanArgs),
    /// Apply a JSON batch of patch proposals to the files they target
    Apply(ApplyArgs),
    /// List registered processors and their enabled state
    Processors,
    /// Initialize a new configuration file
    Init,
    /// Show version information
    Version,
}

#[derive(Args, Debug)]
struct CleanArgs {
    /// Files or directories to clean (use '-' for stdin)
    #[arg(required = false)]
    paths: Vec<String>,

    /// Rewrite changed files in place
    #[arg(short, long)]
    write: bool,

    /// Show a diff of what would change instead of changing it
    #[arg(long, conflicts_with = "write")]
    diff: bool,

    /// Report files that would change, without printing content
    #[arg(long, conflicts_with_all = ["write", "diff"])]
    check: bool,

    /// Read from stdin instead of files
    #[arg(long)]
    stdin: bool,

    /// Filename to assume for stdin input (e.g. README.md)
    #[arg(long)]
    stdin_filename: Option<String>,

    /// Disable specific processors (comma-separated)
    #[arg(short, long)]
    disable: Option<String>,

    /// Enable only specific processors (comma-separated)
    #[arg(short, long)]
    enable: Option<String>,

    /// Exclude files or directories (comma-separated glob patterns)
    #[arg(long)]
    exclude: Option<String>,

    /// Disable all exclude patterns
    #[arg(long)]
    no_exclude: bool,

    /// Include only matching files (comma-separated glob patterns)
    #[arg(long)]
    include: Option<String>,

    /// Respect .gitignore files when scanning directories
    #[arg(long, default_value = "true")]
    respect_gitignore: bool,

    /// Show detailed output
    #[arg(short, long)]
    verbose: bool,

    /// Print nothing but still exit 1 when files need cleaning
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Path to a JSON file of proposals (use '-' for stdin)
    proposals: String,

    /// Print the patched documents instead of writing them
    #[arg(long)]
    dry_run: bool,

    /// Skip the cleaning pipeline and apply proposal text verbatim
    #[arg(long)]
    no_clean: bool,

    /// Emit the apply report as JSON
    #[arg(long)]
    json: bool,

    /// Show detailed output
    #[arg(short, long)]
    verbose: bool,

    /// Print nothing but still exit 1 when proposals fail
    #[arg(short, long)]
    quiet: bool,
}

/// How `clean` presents its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CleanMode {
    /// Print cleaned content to stdout (explicit files and stdin only).
    Print,
    Write,
    Diff,
    Check,
}

fn main() {
    // Reset SIGPIPE to default behavior on Unix so piping to `head` etc. works
    // correctly. Without this, Rust ignores SIGPIPE and `println!` panics on
    // broken pipe.
    #[cfg(unix)]
    {
        // SAFETY: setting SIGPIPE to SIG_DFL is the standard arrangement for
        // CLI tools whose output is meant to be piped.
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }

    let cli = Cli::parse();

    // Set color override globally based on --color flag
    match cli.color.as_str() {
        "always" => colored::control::set_override(true),
        "never" => colored::control::set_override(false),
        _ => colored::control::unset_override(),
    }

    // Catch panics and print a message, exit 2
    let result = std::panic::catch_unwind(|| {
        let isolated = cli.no_config || cli.isolated;
        let config_path = if isolated { None } else { cli.config.as_deref() };
        match cli.command {
            Commands::Clean(args) => run_clean(&args, config_path, isolated),
            Commands::Apply(args) => run_apply(&args, config_path, isolated),
            Commands::Processors => handle_processors_command(config_path, isolated),
            Commands::Init => handle_init_command(),
            Commands::Version => println!("docmend {}", env!("CARGO_PKG_VERSION")),
        }
    });
    if let Err(e) = result {
        eprintln!("[docmend panic handler] Uncaught panic: {e:?}");
        exit::tool_error();
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env().filter_level(level).init();
}

fn load_config_or_exit(config_path: Option<&str>, isolated: bool) -> Config {
    match Config::load_or_default(config_path.map(Path::new), isolated) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Config error".red().bold(), e);
            exit::tool_error();
        }
    }
}

fn split_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// CLI --enable replaces the config's enable list; --disable extends the
/// config's disable list. Names are canonicalized the same way config file
/// entries are, so `--disable Markdown_Format` matches.
fn merge_processor_flags(config: &mut Config, enable: Option<&str>, disable: Option<&str>) {
    if let Some(enable) = enable {
        config.global.enable = split_csv(enable).iter().map(|n| normalize_key(n)).collect();
    }
    if let Some(disable) = disable {
        config.global.disable.extend(split_csv(disable).iter().map(|n| normalize_key(n)));
    }
}

fn run_clean(args: &CleanArgs, config_path: Option<&str>, isolated: bool) {
    init_logging(args.verbose);

    let mut config = load_config_or_exit(config_path, isolated);
    merge_processor_flags(&mut config, args.enable.as_deref(), args.disable.as_deref());

    let pipeline = Pipeline::from_config(&config);
    if pipeline.is_empty() && !args.quiet {
        eprintln!(
            "{}: every processor is disabled, nothing will change",
            "warning".yellow().bold()
        );
    }

    if args.stdin || args.paths.first().is_some_and(|p| p == "-") {
        run_clean_stdin(args, &pipeline, &config);
        return;
    }

    // Content goes to stdout only when every input is an explicitly named
    // file; directory and discovery runs get check-style reporting instead.
    let explicit_files_only = !args.paths.is_empty() && args.paths.iter().all(|p| Path::new(p).is_file());
    let mode = if args.write {
        CleanMode::Write
    } else if args.diff {
        CleanMode::Diff
    } else if args.check || !explicit_files_only {
        CleanMode::Check
    } else {
        CleanMode::Print
    };

    let opts = WalkOptions {
        include: args.include.clone(),
        exclude: args.exclude.clone(),
        no_exclude: args.no_exclude,
        respect_gitignore: args.respect_gitignore && config.global.respect_gitignore,
    };

    let files = match file_processor::find_markdown_files(&args.paths, &opts, &config) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            exit::tool_error();
        }
    };

    if files.is_empty() {
        if !args.quiet {
            println!("No Markdown files found");
        }
        return;
    }

    let outcomes = file_processor::clean_files(&files, &pipeline, &config, mode == CleanMode::Write);

    let mut changed = 0usize;
    let mut errors = 0usize;
    for outcome in &outcomes {
        match outcome {
            Ok(file) => {
                if file.changed {
                    changed += 1;
                }
                report_cleaned_file(file, mode, args.quiet);
            }
            Err(e) => {
                errors += 1;
                eprintln!("{}: {}", "Error".red().bold(), e);
            }
        }
    }

    if !args.quiet {
        match mode {
            CleanMode::Write => println!("Cleaned {} of {} files", changed, files.len()),
            CleanMode::Check => println!("{} of {} files would be cleaned", changed, files.len()),
            CleanMode::Diff | CleanMode::Print => {}
        }
    }

    if errors > 0 {
        exit::tool_error();
    }
    if changed > 0 && matches!(mode, CleanMode::Check | CleanMode::Diff) {
        exit::issues_found();
    }
}

fn report_cleaned_file(file: &CleanedFile, mode: CleanMode, quiet: bool) {
    for warning in &file.warnings {
        eprintln!(
            "{}: {} {}",
            file.path.blue().underline(),
            "[warning]".yellow(),
            warning
        );
    }
    match mode {
        CleanMode::Print => print!("{}", normalize_line_ending(&file.cleaned, file.line_ending)),
        CleanMode::Write => {
            if file.written && !quiet {
                println!("{}: {}", file.path.blue().underline(), "cleaned".green());
            }
        }
        CleanMode::Diff => {
            if file.changed {
                print!("{}", formatter::generate_diff(&file.original, &file.cleaned, &file.path));
            }
        }
        CleanMode::Check => {
            if file.changed && !quiet {
                println!("{}: {}", file.path.blue().underline(), "would clean".yellow());
            }
        }
    }
}

fn run_clean_stdin(args: &CleanArgs, pipeline: &Pipeline, config: &Config) {
    if args.write {
        eprintln!("{}: --write cannot be used with stdin", "Error".red().bold());
        exit::tool_error();
    }

    let input = match io::read_to_string(io::stdin()) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("{}: failed to read stdin: {}", "Error".red().bold(), e);
            exit::tool_error();
        }
    };

    let path = args.stdin_filename.as_deref().unwrap_or("stdin.md");
    let line_ending = detect_line_ending(&input);
    let text = normalize_line_ending(&input, LineEnding::Lf);

    let ctx = ProcessingContext::new(path, &text);
    let outcome = pipeline.run_with_disabled(&text, &ctx, &config.disabled_for_file(path));

    for warning in &outcome.warnings {
        eprintln!("{}: {} {}", path.blue().underline(), "[warning]".yellow(), warning);
    }

    if args.diff {
        if outcome.modified {
            print!("{}", formatter::generate_diff(&text, &outcome.text, path));
            exit::issues_found();
        }
    } else if args.check {
        if outcome.modified {
            if !args.quiet {
                println!("{}: {}", path.blue().underline(), "would clean".yellow());
            }
            exit::issues_found();
        }
    } else {
        print!("{}", normalize_line_ending(&outcome.text, line_ending));
    }
}

/// How one proposal fared, flattened for reporting.
struct Disposition {
    status: &'static str,
    error: Option<(&'static str, String)>,
}

impl Disposition {
    fn from_status(status: &ApplyStatus) -> Self {
        match status {
            ApplyStatus::Applied => Disposition {
                status: "applied",
                error: None,
            },
            ApplyStatus::Skipped => Disposition {
                status: "skipped",
                error: None,
            },
            ApplyStatus::Failed(error) => Disposition {
                status: "failed",
                error: Some((error.kind(), error.to_string())),
            },
        }
    }

    fn failed(error: &ApplyError) -> Self {
        Disposition {
            status: "failed",
            error: Some((error.kind(), error.to_string())),
        }
    }
}

fn parse_proposals(raw: &str) -> Result<Vec<Proposal>, serde_json::Error> {
    if raw.trim_start().starts_with('[') {
        serde_json::from_str(raw)
    } else {
        serde_json::from_str::<Proposal>(raw).map(|p| vec![p])
    }
}

fn run_apply(args: &ApplyArgs, config_path: Option<&str>, isolated: bool) {
    init_logging(args.verbose);

    let config = load_config_or_exit(config_path, isolated);

    let raw = if args.proposals == "-" {
        match io::read_to_string(io::stdin()) {
            Ok(raw) => raw,
            Err(e) => {
                eprintln!("{}: failed to read stdin: {}", "Error".red().bold(), e);
                exit::tool_error();
            }
        }
    } else {
        match fs::read_to_string(&args.proposals) {
            Ok(raw) => raw,
            Err(e) => {
                eprintln!(
                    "{}: failed to read proposals file {}: {}",
                    "Error".red().bold(),
                    args.proposals,
                    e
                );
                exit::tool_error();
            }
        }
    };

    let mut proposals = match parse_proposals(&raw) {
        Ok(proposals) => proposals,
        Err(e) => {
            eprintln!("{}: invalid proposals JSON: {}", "Error".red().bold(), e);
            exit::tool_error();
        }
    };

    if proposals.is_empty() {
        if !args.quiet {
            println!("No proposals to apply");
        }
        return;
    }

    let pipeline = Pipeline::from_config(&config);
    if !args.no_clean {
        for proposal in proposals.iter_mut() {
            clean_proposal_with(&pipeline, proposal, &config);
        }
    }

    // Group by target file, preserving both the first-seen file order and
    // the input order of each file's proposals.
    let mut file_order: Vec<String> = Vec::new();
    let mut by_file: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, proposal) in proposals.iter().enumerate() {
        by_file
            .entry(proposal.target_path.clone())
            .or_insert_with(|| {
                file_order.push(proposal.target_path.clone());
                Vec::new()
            })
            .push(idx);
    }

    let mut dispositions: Vec<Option<Disposition>> = (0..proposals.len()).map(|_| None).collect();
    let mut file_reports: Vec<serde_json::Value> = Vec::new();
    let mut write_failed = false;

    for path in &file_order {
        let indices = &by_file[path];

        let raw_text = match file_processor::read_file_efficiently(Path::new(path)) {
            Ok(raw_text) => raw_text,
            Err(e) => {
                log::debug!("reading {path} failed: {e}");
                let error = ApplyError::FileNotFound { path: path.clone() };
                eprintln!("{}: {}", "Error".red().bold(), error);
                for &idx in indices {
                    dispositions[idx] = Some(Disposition::failed(&error));
                }
                continue;
            }
        };

        let line_ending = detect_line_ending(&raw_text);
        let text = normalize_line_ending(&raw_text, LineEnding::Lf);

        let group: Vec<Proposal> = indices.iter().map(|&i| proposals[i].clone()).collect();
        let report = apply_proposals(&text, &group);

        for outcome in &report.outcomes {
            dispositions[indices[outcome.index]] = Some(Disposition::from_status(&outcome.status));
        }

        let restored = normalize_line_ending(&report.text, line_ending);
        if args.dry_run {
            if args.json {
                file_reports.push(serde_json::json!({
                    "path": path,
                    "patched": restored,
                    "written": false,
                }));
            } else {
                if file_order.len() > 1 && !args.quiet {
                    println!("{}", format!("==> {path} <==").bold());
                }
                print!("{restored}");
            }
        } else {
            match fs::write(path, &restored) {
                Ok(()) => {
                    if args.json {
                        file_reports.push(serde_json::json!({"path": path, "written": true}));
                    }
                }
                Err(e) => {
                    write_failed = true;
                    eprintln!("{}: failed to write {}: {}", "Error".red().bold(), path, e);
                }
            }
        }
    }

    let counts = dispositions.iter().flatten().counts_by(|d| d.status);
    let applied = counts.get("applied").copied().unwrap_or(0);
    let skipped = counts.get("skipped").copied().unwrap_or(0);
    let failed = counts.get("failed").copied().unwrap_or(0);

    if args.json {
        let entries: Vec<serde_json::Value> = proposals
            .iter()
            .zip(&dispositions)
            .enumerate()
            .map(|(idx, (proposal, disposition))| {
                let mut entry = serde_json::json!({
                    "index": idx,
                    "targetPath": proposal.target_path,
                    "updateType": proposal.update_type.to_string(),
                    "status": disposition.as_ref().map_or("failed", |d| d.status),
                    "warnings": proposal.warnings,
                });
                if let Some((kind, message)) = disposition.as_ref().and_then(|d| d.error.as_ref()) {
                    entry["error"] = serde_json::json!({"kind": kind, "message": message});
                }
                entry
            })
            .collect();
        let report = serde_json::json!({
            "files": file_reports,
            "proposals": entries,
            "summary": {"applied": applied, "skipped": skipped, "failed": failed},
        });
        let rendered = serde_json::to_string_pretty(&report).unwrap_or_else(|e| {
            eprintln!("{}: failed to serialize report: {}", "Error".red().bold(), e);
            exit::tool_error();
        });
        println!("{rendered}");
    } else {
        for (idx, (proposal, disposition)) in proposals.iter().zip(&dispositions).enumerate() {
            for warning in &proposal.warnings {
                eprintln!(
                    "{}: {} {}",
                    proposal.target_path.blue().underline(),
                    "[warning]".yellow(),
                    warning
                );
            }
            let Some(disposition) = disposition else { continue };
            let show = !args.quiet || disposition.status == "failed";
            if !show {
                continue;
            }
            let status = match &disposition.error {
                Some((_, message)) => format!("failed: {message}").red().to_string(),
                None if disposition.status == "applied" => "applied".green().to_string(),
                None => "skipped".dimmed().to_string(),
            };
            let line = format!(
                "{}: proposal {} {} {}",
                proposal.target_path.blue().underline(),
                idx,
                proposal.update_type,
                status
            );
            // Dry runs put the patched documents on stdout, so the status
            // lines move to stderr to keep that output pipeable.
            if args.dry_run {
                eprintln!("{line}");
            } else {
                println!("{line}");
            }
        }
        if !args.quiet {
            let summary = format!("{applied} applied, {skipped} skipped, {failed} failed");
            if args.dry_run {
                eprintln!("{summary}");
            } else {
                println!("{summary}");
            }
        }
    }

    if write_failed {
        exit::tool_error();
    }
    if failed > 0 {
        exit::issues_found();
    }
}

fn handle_processors_command(config_path: Option<&str>, isolated: bool) {
    let config = load_config_or_exit(config_path, isolated);
    let enabled: HashSet<&'static str> = Pipeline::from_config(&config).processor_names().into_iter().collect();

    println!("Registered processors:");
    for processor in docmend_lib::processors::all_processors(&config) {
        let state = if enabled.contains(processor.name()) {
            "enabled".green()
        } else {
            "disabled".yellow()
        };
        println!("  {} - {} [{}]", processor.name(), processor.description(), state);
    }
}

fn handle_init_command() {
    match docmend_config::create_default_config(Path::new(".docmend.toml")) {
        Ok(()) => println!("Created default configuration file: .docmend.toml"),
        Err(e) => {
            eprintln!("{}: Failed to create config file: {}", "Error".red().bold(), e);
            exit::tool_error();
        }
    }
}
