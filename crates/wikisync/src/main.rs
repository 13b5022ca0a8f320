use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use wikisync_core::config::load_config;
use wikisync_core::expected::load_expected;
use wikisync_core::normalize::{
    KeySet, normalize_param_value_for_compare, normalize_qty_list_assume_one,
};
use wikisync_core::pages::scan_pages;
use wikisync_core::params::parse_template_params;
use wikisync_core::reconcile::{CompareRunOptions, run_compare};
use wikisync_core::report::render_report;
use wikisync_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths,
    ensure_runtime_ready_for_compare, init_layout, inspect_runtime, resolve_paths,
};
use wikisync_core::template::{find_template_blocks, template_has_meaningful_data};

#[derive(Debug, Parser)]
#[command(
    name = "wikisync",
    version,
    about = "Compare wiki template parameters against generated data and patch them in place"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH", help = "Expected data JSON")]
    expected: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    expected: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            expected: cli.expected.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create wiki_content/, .wikisync/ and a default config")]
    Init(InitArgs),
    #[command(about = "Show runtime layout and page counts")]
    Status,
    #[command(about = "Compare local pages with expected data")]
    Compare(CompareArgs),
    #[command(about = "Show template blocks and parsed parameters of a file")]
    Inspect(InspectArgs),
    #[command(about = "Print the comparison form of a value")]
    Normalize(NormalizeArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
    #[arg(long, help = "Skip writing .wikisync/config.toml")]
    no_config: bool,
}

#[derive(Debug, Args)]
struct CompareArgs {
    #[arg(long, help = "Write patched pages back (overrides dry_run)")]
    write: bool,
    #[arg(long = "page", value_name = "TITLE", help = "Limit the run to these titles")]
    pages: Vec<String>,
    #[arg(long, value_name = "PATH", help = "Report file (default .wikisync/reports/compare.txt)")]
    report: Option<PathBuf>,
    #[arg(long, help = "Include unified diffs of changed pages in the report")]
    diffs: bool,
    #[arg(long, help = "Print the report to stdout")]
    print: bool,
}

#[derive(Debug, Args)]
struct InspectArgs {
    file: PathBuf,
    #[arg(long, value_name = "NAME")]
    template: String,
    #[arg(long = "multiline", value_name = "KEY")]
    multiline: Vec<String>,
    #[arg(long, help = "Print JSON instead of text")]
    json: bool,
}

#[derive(Debug, Args)]
struct NormalizeArgs {
    value: String,
    #[arg(long, help = "Treat the value as a `;` quantity list")]
    qty: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::Compare(args)) => run_compare_command(&runtime, args),
        Some(Commands::Inspect(args)) => run_inspect(args),
        Some(Commands::Normalize(args)) => run_normalize(args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(
        &paths,
        &InitOptions {
            materialize_config: !args.no_config,
            force: args.force,
        },
    )?;

    println!("Initialized wikisync runtime layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("wiki_content: {}", normalize_path(&paths.wiki_content_dir));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("expected_path: {}", normalize_path(&paths.expected_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths);
    let pages = scan_pages(&paths)?;

    println!("runtime status");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!(
        "project_root_exists: {}",
        format_flag(status.project_root_exists)
    );
    println!(
        "wiki_content_exists: {}",
        format_flag(status.wiki_content_exists)
    );
    println!("state_dir_exists: {}", format_flag(status.state_dir_exists));
    println!("config_exists: {}", format_flag(status.config_exists));
    println!("expected_exists: {}", format_flag(status.expected_exists));
    println!("pages: {}", pages.len());
    if !status.warnings.is_empty() {
        println!("warnings:");
        for warning in &status.warnings {
            println!("  - {warning}");
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_compare_command(runtime: &RuntimeOptions, args: CompareArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths);
    ensure_runtime_ready_for_compare(&paths, &status)?;

    let config = load_config(&paths.config_path)?;
    let expected = load_expected(&paths.expected_path)?;
    let report_path = match args.report {
        Some(path) if path.is_absolute() => path,
        Some(path) => paths.project_root.join(path),
        None => paths.default_report_path(),
    };

    let report = run_compare(
        &paths,
        &config,
        &expected,
        &CompareRunOptions {
            titles: args.pages,
            write: args.write,
            include_diffs: args.diffs,
            report_path: Some(report_path.clone()),
        },
    )?;

    if args.print {
        print!("{}", render_report(&report));
        println!();
    }
    println!("compare");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("expected_path: {}", normalize_path(&paths.expected_path));
    println!("dry_run: {}", report.dry_run);
    println!("checks: {}", report.checks.join(", "));
    println!("pages_scanned: {}", report.pages_scanned);
    println!("pages_with_mismatches: {}", report.pages_with_mismatches());
    println!("pages_written: {}", report.pages_written);
    println!("warnings: {}", report.warning_count());
    println!("report_path: {}", normalize_path(&report_path));
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    if args.template.trim().is_empty() {
        bail!("--template must not be blank");
    }
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let multiline = KeySet::new(&args.multiline);
    let blocks = find_template_blocks(&text, &args.template);

    if args.json {
        let rendered = blocks
            .iter()
            .map(|block| {
                serde_json::json!({
                    "start": block.start,
                    "end": block.end,
                    "meaningful": template_has_meaningful_data(&block.text, &KeySet::default()),
                    "params": parse_template_params(&block.text, &multiline),
                })
            })
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&rendered)?);
        return Ok(());
    }

    println!("file: {}", normalize_path(&args.file));
    println!("template: {}", args.template.trim());
    println!("blocks: {}", blocks.len());
    for (index, block) in blocks.iter().enumerate() {
        println!();
        println!("[block {}] bytes {}..{}", index + 1, block.start, block.end);
        println!(
            "meaningful: {}",
            format_flag(template_has_meaningful_data(&block.text, &KeySet::default()))
        );
        for (key, value) in parse_template_params(&block.text, &multiline) {
            println!("  {key} = {}", value.replace('\n', "\\n"));
        }
    }
    Ok(())
}

fn run_normalize(args: NormalizeArgs) -> Result<()> {
    let value = if args.qty {
        normalize_qty_list_assume_one(&args.value)
    } else {
        args.value
    };
    println!("{}", normalize_param_value_for_compare(&value));
    Ok(())
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
        expected: runtime.expected.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
