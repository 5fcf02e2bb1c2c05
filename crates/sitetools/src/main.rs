use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use sitetools_core::batch::{BatchOptions, FormatBatchReport, plan_jobs, run_batch};
use sitetools_core::comment_import::import_comments_file;
use sitetools_core::comments::{editable_to_json, load_posts, write_editable};
use sitetools_core::config::{SiteConfig, load_config};
use sitetools_core::reformat::FormatStats;
use sitetools_core::renumber::renumber_file;
use sitetools_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, init_layout, inspect_runtime,
    resolve_paths,
};
use sitetools_core::secrets::{
    decode_secrets_file, encode_secrets_file, insert_isso_config_secrets, read_secrets_file,
};
use sitetools_core::site::{BuildOptions, DeployReport, build_site, deploy_site};
use sitetools_core::wordpress::extract_export_file;

#[derive(Debug, Parser)]
#[command(
    name = "sitetools",
    version,
    about = "Blog migration, formatting, and deployment tools for a Hugo site"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init(InitArgs),
    Status,
    #[command(about = "Reformat exported posts into Hugo-ready Markdown")]
    Format(FormatArgs),
    #[command(
        name = "renumber-refs",
        about = "Renumber reference-style links in order of first use"
    )]
    RenumberRefs(RenumberArgs),
    Secrets(SecretsArgs),
    #[command(about = "Inject secrets, run hugo, and optionally deploy")]
    Build(BuildArgs),
    #[command(about = "Copy the built site into the deploy directory")]
    Deploy(DeployArgs),
    Comments(CommentsArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
    #[arg(long, help = "Skip writing .sitetools/config.toml")]
    no_config: bool,
}

#[derive(Debug, Args)]
struct FormatArgs {
    #[arg(value_name = "SRC", help = "Post file or directory of .md posts")]
    source: PathBuf,
    #[arg(
        value_name = "DST",
        help = "Output file or directory (defaults to SRC, in place)"
    )]
    destination: Option<PathBuf>,
    #[arg(long, help = "Report what would change without writing")]
    check: bool,
    #[arg(long, value_name = "N", help = "Maximum line width")]
    width: Option<usize>,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct RenumberArgs {
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct SecretsArgs {
    #[command(subcommand)]
    command: SecretsSubcommand,
}

#[derive(Debug, Subcommand)]
enum SecretsSubcommand {
    Encode(SecretsIoArgs),
    Decode(SecretsIoArgs),
}

#[derive(Debug, Args)]
struct SecretsIoArgs {
    #[arg(short = 's', long, value_name = "PATH")]
    secrets: PathBuf,
    #[arg(short = 'o', long, value_name = "PATH")]
    output: PathBuf,
}

#[derive(Debug, Args)]
struct BuildArgs {
    #[arg(short = 's', long, value_name = "PATH", help = "Encoded secrets file")]
    secrets: PathBuf,
    #[arg(short = 'd', long, help = "Deploy after building")]
    deploy: bool,
    #[arg(short = 'o', long, value_name = "PATH", help = "Deploy directory")]
    output: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    isso_src: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    isso_dst: Option<PathBuf>,
    #[arg(long, help = "Copy over the deploy directory instead of replacing it")]
    keep_existing: bool,
}

#[derive(Debug, Args)]
struct DeployArgs {
    #[arg(short = 'o', long, value_name = "PATH", help = "Deploy directory")]
    output: Option<PathBuf>,
    #[arg(long, help = "Copy over the deploy directory instead of replacing it")]
    keep_existing: bool,
}

#[derive(Debug, Args)]
struct CommentsArgs {
    #[command(subcommand)]
    command: CommentsSubcommand,
}

#[derive(Debug, Subcommand)]
enum CommentsSubcommand {
    #[command(about = "Extract posts and comments from a WordPress XML export into JSON")]
    Extract { xml: PathBuf, output: PathBuf },
    #[command(about = "Write each comment to <comment_id>.md for hand editing")]
    Editable { json: PathBuf, dir: PathBuf },
    #[command(about = "Fold edited comment files back into the JSON export")]
    Apply {
        json: PathBuf,
        editable: PathBuf,
        output: PathBuf,
    },
    #[command(about = "Import exported comments into the Isso database")]
    Import {
        json: PathBuf,
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,
        #[arg(long, value_name = "PATH")]
        posts_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Status) => run_status(&runtime),
        Some(Commands::Format(args)) => run_format(&runtime, args),
        Some(Commands::RenumberRefs(args)) => run_renumber(&runtime, args),
        Some(Commands::Secrets(SecretsArgs { command })) => run_secrets(command),
        Some(Commands::Build(args)) => run_build(&runtime, args),
        Some(Commands::Deploy(args)) => run_deploy(&runtime, args),
        Some(Commands::Comments(CommentsArgs { command })) => run_comments(&runtime, command),
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

    println!("Initialized sitetools layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("posts_dir: {}", normalize_path(&paths.posts_dir));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("db_path: {}", normalize_path(&paths.db_path));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let status = inspect_runtime(&paths)?;

    println!("runtime status");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!(
        "project_root_exists: {}",
        format_flag(status.project_root_exists)
    );
    println!("posts_dir_exists: {}", format_flag(status.posts_dir_exists));
    println!("post_count: {}", status.post_count);
    println!("build_dir_exists: {}", format_flag(status.build_dir_exists));
    println!("state_dir_exists: {}", format_flag(status.state_dir_exists));
    println!("db_exists: {}", format_flag(status.db_exists));
    println!(
        "db_size_bytes: {}",
        status
            .db_size_bytes
            .map(|size| size.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!("config_exists: {}", format_flag(status.config_exists));
    println!(
        "site_domain: {}",
        config.domain().unwrap_or_else(|| "<none>".to_string())
    );
    println!("max_line_len: {}", config.max_line_len()?);
    if !status.warnings.is_empty() {
        println!("warnings:");
        for warning in &status.warnings {
            println!("  - {warning}");
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_format(runtime: &RuntimeOptions, args: FormatArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let mut format = config.format_options()?;
    if let Some(width) = args.width {
        format.max_line_len = width;
    }

    let destination = args.destination.as_deref().unwrap_or(&args.source);
    let jobs = plan_jobs(&args.source, destination)?;
    let report = run_batch(
        &jobs,
        &BatchOptions {
            format,
            check: args.check,
        },
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_format_report(&report);
    }
    print_diagnostics(runtime, &paths);

    if !report.failures.is_empty() {
        bail!("{} file(s) failed to format", report.failures.len());
    }
    Ok(())
}

fn print_format_report(report: &FormatBatchReport) {
    println!("format{}", if report.check { " (check)" } else { "" });
    for file in &report.files {
        println!(
            "{}: {}",
            file.source,
            if file.changed { "changed" } else { "unchanged" }
        );
        if let Some(diff) = &file.diff {
            print!("{diff}");
        }
    }
    for failure in &report.failures {
        println!("{}: failed: {}", failure.source, failure.message);
    }
    println!("format.files: {}", report.files.len() + report.failures.len());
    println!("format.changed: {}", report.changed_files());
    println!(
        "format.failed: {}",
        if report.failures.is_empty() {
            "<none>".to_string()
        } else {
            report.failures.len().to_string()
        }
    );
    print_format_stats("format.totals", &report.totals);
}

fn print_format_stats(prefix: &str, stats: &FormatStats) {
    println!("{prefix}.wrapped_lines: {}", stats.wrapped_lines);
    println!("{prefix}.unwrappable_lines: {}", stats.unwrappable_lines);
    println!("{prefix}.code_blocks: {}", stats.code_blocks);
    println!("{prefix}.images: {}", stats.images);
    println!("{prefix}.split_markers: {}", stats.split_markers);
    println!("{prefix}.rewritten_refs: {}", stats.rewritten_refs);
    println!("{prefix}.rewritten_links: {}", stats.rewritten_links);
}

fn run_renumber(runtime: &RuntimeOptions, args: RenumberArgs) -> Result<()> {
    for path in &args.paths {
        let report = renumber_file(path)?;
        println!("{}", normalize_path(path));
        println!("  references: {}", report.references);
        println!("  definitions_before: {}", report.definitions_before);
        println!("  definitions_after: {}", report.definitions_after);
    }
    if runtime.diagnostics {
        let paths = resolve_runtime_paths(runtime)?;
        print_diagnostics(runtime, &paths);
    }
    Ok(())
}

fn run_secrets(command: SecretsSubcommand) -> Result<()> {
    match command {
        SecretsSubcommand::Encode(args) => {
            encode_secrets_file(&args.secrets, &args.output)?;
            println!("encoded: {}", normalize_path(&args.output));
        }
        SecretsSubcommand::Decode(args) => {
            decode_secrets_file(&args.secrets, &args.output)?;
            println!("decoded: {}", normalize_path(&args.output));
        }
    }
    Ok(())
}

fn run_build(runtime: &RuntimeOptions, args: BuildArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let deploy_dir = if args.deploy {
        Some(require_deploy_dir(&config, &paths, args.output.as_deref())?)
    } else {
        None
    };

    let secrets_file = absolutize(&args.secrets)?;
    let secrets = read_secrets_file(&secrets_file)?
        .decoded()
        .with_context(|| format!("failed to decode {}", secrets_file.display()))?;

    let isso_src = args
        .isso_src
        .as_deref()
        .map(absolutize)
        .transpose()?
        .unwrap_or_else(|| config.isso_src(&paths));
    let isso_dst = args
        .isso_dst
        .as_deref()
        .map(absolutize)
        .transpose()?
        .unwrap_or_else(|| config.isso_dst(&paths));
    let isso = insert_isso_config_secrets(&isso_src, &isso_dst, &secrets)?;

    let report = build_site(&BuildOptions {
        project_root: paths.project_root.clone(),
        build_dir: paths.build_dir.clone(),
        generator: config.generator(),
        secrets_file: Some(secrets_file),
    })?;

    if !report.generator_stdout.is_empty() {
        println!("{}", report.generator_stdout);
    }
    println!("build");
    println!("isso_config: {}", normalize_path(&isso_dst));
    println!("isso_config.updated_keys: {}", isso.updated_keys);
    println!("isso_config.appended_keys: {}", isso.appended_keys);
    println!("generator: {}", report.generator);
    println!("build_dir: {}", report.build_dir);
    println!(
        "removed_previous_build: {}",
        format_flag(report.removed_previous_build)
    );
    println!(
        "contact_form_patched: {}",
        format_flag(report.contact_form_patched)
    );

    if let Some(deploy_dir) = deploy_dir {
        let deployed = deploy_site(&paths.build_dir, &deploy_dir, !args.keep_existing)?;
        print_deploy_report(&deployed);
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_deploy(runtime: &RuntimeOptions, args: DeployArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let deploy_dir = require_deploy_dir(&config, &paths, args.output.as_deref())?;

    let report = deploy_site(&paths.build_dir, &deploy_dir, !args.keep_existing)?;
    print_deploy_report(&report);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn require_deploy_dir(
    config: &SiteConfig,
    paths: &ResolvedPaths,
    output: Option<&Path>,
) -> Result<PathBuf> {
    if let Some(output) = output {
        return absolutize(output);
    }
    match config.deploy_dir(paths) {
        Some(dir) => Ok(dir),
        None => bail!("no deploy directory; pass --output or set [deploy] dir in the config"),
    }
}

fn print_deploy_report(report: &DeployReport) {
    println!("deploy");
    println!("build_dir: {}", report.build_dir);
    println!("deploy_dir: {}", report.deploy_dir);
    println!("removed_existing: {}", format_flag(report.removed_existing));
    println!("directories_created: {}", report.directories_created);
    println!("files_copied: {}", report.files_copied);
}

fn run_comments(runtime: &RuntimeOptions, command: CommentsSubcommand) -> Result<()> {
    match command {
        CommentsSubcommand::Extract { xml, output } => {
            let report = extract_export_file(&xml, &output)?;
            println!("source: {}", normalize_path(&xml));
            println!("output: {}", normalize_path(&output));
            println!("posts: {}", report.posts);
            println!("comments: {}", report.comments);
        }
        CommentsSubcommand::Editable { json, dir } => {
            let posts = load_posts(&json)?;
            let report = write_editable(&posts, &dir)?;
            println!("editable_dir: {}", report.directory);
            println!("files_written: {}", report.files_written);
        }
        CommentsSubcommand::Apply {
            json,
            editable,
            output,
        } => {
            let report = editable_to_json(&json, &editable, &output)?;
            println!("output: {}", normalize_path(&output));
            println!("files_read: {}", report.files_read);
            println!("comments_changed: {}", report.comments_changed);
        }
        CommentsSubcommand::Import {
            json,
            db,
            posts_dir,
        } => {
            let paths = resolve_runtime_paths(runtime)?;
            let config = load_config(&paths.config_path)?;
            let db_path = match db {
                Some(db) => absolutize(&db)?,
                None => config.comments_db(&paths),
            };
            let posts_dir = match posts_dir {
                Some(dir) => absolutize(&dir)?,
                None => config.posts_dir(&paths),
            };

            let posts = load_posts(&json)?;
            let report = import_comments_file(&db_path, &posts, &posts_dir)?;
            println!("comment import");
            println!("db_path: {}", normalize_path(&db_path));
            println!("posts_dir: {}", normalize_path(&posts_dir));
            println!("posts_with_comments: {}", report.posts_with_comments);
            println!("threads_created: {}", report.threads_created);
            println!("threads_reused: {}", report.threads_reused);
            println!("comments_inserted: {}", report.comments_inserted);
            print_diagnostics(runtime, &paths);
        }
    }
    Ok(())
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
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

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    Ok(cwd.join(path))
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
