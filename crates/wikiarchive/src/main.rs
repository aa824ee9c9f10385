use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use wikiarchive_core::config::{ArchiveConfig, load_config};
use wikiarchive_core::credentials::{
    ChainedCredentials, CredentialCheck, CredentialStore, Credentials, EnvCredentials,
    FileCredentials, validate_credentials,
};
use wikiarchive_core::error::{ErrorKind, Locale, classify};
use wikiarchive_core::filename::{ARCHIVES, FileNameParts, compose_file_name, parse_file_path};
use wikiarchive_core::mediawiki::{MediaWikiClient, MediaWikiClientConfig, WikiPageApi};
use wikiarchive_core::pages::soft_delete_page;
use wikiarchive_core::progress::LocalizedProgress;
use wikiarchive_core::publish::{PublishError, PublishOutcome, publish_batch};
use wikiarchive_core::runtime::{PathOverrides, ResolutionContext, ResolvedPaths, resolve_paths};

#[derive(Debug, Parser)]
#[command(
    name = "wikiarchive",
    version,
    about = "Publish scanned archival cases to Wikisource and Wikimedia Commons"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    credentials: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
    #[arg(long, global = true, default_value = "uk", help = "Message language (uk or en)")]
    locale: Locale,
    #[arg(long, global = true, help = "Print machine-readable JSON")]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    config: Option<PathBuf>,
    credentials: Option<PathBuf>,
    diagnostics: bool,
    locale: Locale,
    json: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            credentials: cli.credentials.clone(),
            diagnostics: cli.diagnostics,
            locale: cli.locale,
            json: cli.json,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create the page hierarchy and upload each file")]
    Publish(PublishArgs),
    #[command(about = "Check file names without touching the wikis")]
    Validate(ValidateArgs),
    #[command(about = "List known archive codes")]
    Archives,
    #[command(about = "Build a file name from its parts")]
    Compose(ComposeArgs),
    Credentials(CredentialsArgs),
    #[command(
        name = "soft-delete",
        about = "Replace a page with a speedy-deletion request"
    )]
    SoftDelete(SoftDeleteArgs),
    #[command(about = "Print the resolved configuration")]
    Config,
}

#[derive(Debug, Args)]
struct PublishArgs {
    #[arg(required = true, value_name = "FILE")]
    paths: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct ValidateArgs {
    #[arg(required = true, value_name = "NAME")]
    names: Vec<String>,
}

#[derive(Debug, Args)]
struct ComposeArgs {
    #[arg(long)]
    archive: String,
    #[arg(long)]
    fund: String,
    #[arg(long)]
    description: String,
    #[arg(long = "case")]
    case_name: String,
    #[arg(long, help = "Year or YYYY-YYYY range")]
    years: String,
    #[arg(long)]
    title: String,
    #[arg(long, default_value = "pdf")]
    extension: String,
}

#[derive(Debug, Args)]
struct CredentialsArgs {
    #[command(subcommand)]
    command: CredentialsSubcommand,
}

#[derive(Debug, Subcommand)]
enum CredentialsSubcommand {
    #[command(about = "Store bot credentials (password is read from stdin when omitted)")]
    Set {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    Show,
    Clear,
    Check {
        #[arg(long, help = "Also log in to the sources wiki")]
        login: bool,
    },
}

#[derive(Debug, Args)]
struct SoftDeleteArgs {
    title: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    let result = match cli.command {
        Commands::Publish(args) => run_publish(&runtime, args),
        Commands::Validate(args) => run_validate(&runtime, args),
        Commands::Archives => run_archives(&runtime),
        Commands::Compose(args) => run_compose(args),
        Commands::Credentials(CredentialsArgs { command }) => match command {
            CredentialsSubcommand::Set { username, password } => {
                run_credentials_set(&runtime, username, password)
            }
            CredentialsSubcommand::Show => run_credentials_show(&runtime),
            CredentialsSubcommand::Clear => run_credentials_clear(&runtime),
            CredentialsSubcommand::Check { login } => run_credentials_check(&runtime, login),
        },
        Commands::SoftDelete(SoftDeleteArgs { title }) => run_soft_delete(&runtime, &title),
        Commands::Config => run_config(&runtime),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let kind = classify(&error);
            if kind != ErrorKind::Other {
                eprintln!("error: {}", kind.message(runtime.locale));
            }
            eprintln!("detail: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn run_publish(runtime: &RuntimeOptions, args: PublishArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let credentials = credential_store(&paths).load()?;

    let total = args.paths.len();
    let mut progress = LocalizedProgress::new(runtime.locale, |percent: u8, message: &str| {
        eprintln!("[{percent:>3}%] {message}");
    });
    let outcomes = publish_batch(&args.paths, &credentials, &config, &mut progress);

    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        for outcome in &outcomes {
            print_outcome(outcome, runtime.locale);
        }
    }
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }

    let failed = outcomes
        .iter()
        .filter(|outcome| !outcome.is_success())
        .count();
    if failed > 0 {
        bail!("{failed} of {total} file(s) failed to publish");
    }
    Ok(())
}

fn print_outcome(outcome: &PublishOutcome, locale: Locale) {
    println!("file: {}", normalize_path(outcome.path()));
    match outcome {
        PublishOutcome::Published { report, .. } => {
            println!("status: published");
            println!("case_page: {}", report.titles.case_page);
            println!("case_page_url: {}", report.case_page_url);
            println!("created_pages: {}", report.created_pages.len());
            for page in &report.created_pages {
                println!("  - {page}");
            }
            for update in &report.table_updates {
                println!("table: {} <- {} ({:?})", update.page, update.child, update.change);
            }
            println!("chunks: {}", report.upload.chunk_count);
            println!(
                "source_url: {}",
                report.upload.source_url.as_deref().unwrap_or("<unknown>")
            );
        }
        PublishOutcome::Failed { kind, detail, .. } => {
            println!("status: failed");
            println!("error: {}", kind.message(locale));
            println!("detail: {detail}");
        }
    }
    println!();
}

fn run_validate(runtime: &RuntimeOptions, args: ValidateArgs) -> Result<()> {
    let mut invalid = 0usize;
    let mut parsed_names = Vec::new();
    for name in &args.names {
        match parse_file_path(Path::new(name)) {
            Ok(parsed) => {
                if !runtime.json {
                    let titles = parsed.page_titles();
                    println!("name: {name}");
                    println!("valid: yes");
                    println!("archive: {} ({})", parsed.archive_code, parsed.archive_full_name);
                    println!("archive_list_page: {}", titles.archive_list_page);
                    println!("fund_page: {}", titles.fund_page);
                    println!("description_page: {}", titles.description_page);
                    println!("case_page: {}", titles.case_page);
                    println!("file_page: {}", parsed.file_page());
                    println!();
                }
                parsed_names.push(parsed);
            }
            Err(error) => {
                invalid += 1;
                if !runtime.json {
                    println!("name: {name}");
                    println!("valid: no");
                    println!("error: {}", ErrorKind::InvalidFileName.message(runtime.locale));
                    println!();
                }
                debug!("{error}");
            }
        }
    }
    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&parsed_names)?);
    }
    if invalid > 0 {
        bail!("{invalid} of {} name(s) are invalid", args.names.len());
    }
    Ok(())
}

fn run_archives(runtime: &RuntimeOptions) -> Result<()> {
    if runtime.json {
        let archives = ARCHIVES
            .iter()
            .map(|(code, name)| serde_json::json!({ "code": code, "name": name }))
            .collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&archives)?);
        return Ok(());
    }
    for (code, name) in ARCHIVES {
        println!("{code}: {name}");
    }
    Ok(())
}

fn run_compose(args: ComposeArgs) -> Result<()> {
    let file_name = compose_file_name(&FileNameParts {
        archive: args.archive,
        fund: args.fund,
        description: args.description,
        case_name: args.case_name,
        years: args.years,
        title: args.title,
        extension: Some(args.extension),
    })?;
    println!("{file_name}");
    Ok(())
}

fn run_credentials_set(
    runtime: &RuntimeOptions,
    username: String,
    password: Option<String>,
) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let password = match password {
        Some(password) => password,
        None => read_password_from_stdin()?,
    };
    let credentials = Credentials::new(username.trim(), password);
    let check = validate_credentials(&credentials);
    if !check.is_valid() {
        bail!("{}", check.message(runtime.locale));
    }
    if check != CredentialCheck::Valid {
        eprintln!("warning: {}", check.message(runtime.locale));
    }

    let store = FileCredentials::new(&paths.credentials_path);
    store.save(&credentials)?;
    println!("saved: {}", normalize_path(store.path()));
    Ok(())
}

fn run_credentials_show(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let file_store = FileCredentials::new(&paths.credentials_path);
    let info = file_store.storage_info();
    let from_env = EnvCredentials.load()?;
    let credentials = credential_store(&paths).load()?;

    if runtime.json {
        let payload = serde_json::json!({
            "storage": info,
            "source": credential_source(&from_env, &credentials),
            "username": credentials.username,
            "has_credentials": credentials.has_credentials(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("path: {}", normalize_path(&info.path));
    println!("exists: {}", format_flag(info.exists));
    println!("encrypted: {}", format_flag(info.encrypted));
    match info.timestamp {
        Some(timestamp) => println!("timestamp: {timestamp}"),
        None => println!("timestamp: <none>"),
    }
    println!("source: {}", credential_source(&from_env, &credentials));
    println!(
        "username: {}",
        if credentials.username.is_empty() {
            "<none>"
        } else {
            credentials.username.as_str()
        }
    );
    println!("has_credentials: {}", format_flag(credentials.has_credentials()));
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_credentials_clear(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let removed = FileCredentials::new(&paths.credentials_path).clear()?;
    println!("cleared: {}", format_flag(removed));
    Ok(())
}

fn run_credentials_check(runtime: &RuntimeOptions, login: bool) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let credentials = credential_store(&paths).load()?;
    let check = validate_credentials(&credentials);
    println!("valid: {}", format_flag(check.is_valid()));
    println!("message: {}", check.message(runtime.locale));
    if !check.is_valid() {
        bail!("{}", check.message(runtime.locale));
    }

    if login {
        let config = load_config(&paths.config_path)?;
        let mut client = MediaWikiClient::new(MediaWikiClientConfig::sources(&config))?;
        client.login(&credentials.username, &credentials.password)?;
        println!("login: ok ({})", client.api_url());
    }
    Ok(())
}

fn run_soft_delete(runtime: &RuntimeOptions, title: &str) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let credentials = credential_store(&paths).load()?;
    if !credentials.has_credentials() {
        return Err(PublishError::MissingCredentials.into());
    }

    let mut client = MediaWikiClient::new(MediaWikiClientConfig::sources(&config))?;
    client.login(&credentials.username, &credentials.password)?;
    let saved = soft_delete_page(&mut client, title)?;
    println!("title: {title}");
    println!("saved: {}", format_flag(saved));
    println!("requests: {}", client.request_count());
    Ok(())
}

fn run_config(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    print_config(&config);
    println!("\n[diagnostics]\n{}", paths.diagnostics());
    Ok(())
}

fn print_config(config: &ArchiveConfig) {
    println!("sources_api_url: {}", config.sources_api_url());
    println!("sources_url: {}", config.sources_url());
    println!("commons_api_url: {}", config.commons_api_url());
    println!("user_agent: {}", config.user_agent());
    println!("timeout_ms: {}", config.timeout_ms());
    println!("upload_timeout_ms: {}", config.upload_timeout_ms());
    println!("chunk_size_bytes: {}", config.chunk_size_bytes());
    println!("upload_comment: {}", config.upload_comment());
}

fn credential_store(paths: &ResolvedPaths) -> ChainedCredentials {
    ChainedCredentials::new(FileCredentials::new(&paths.credentials_path))
}

fn credential_source(from_env: &Credentials, resolved: &Credentials) -> &'static str {
    if !resolved.has_credentials() {
        "none"
    } else if from_env.has_credentials() {
        "env"
    } else {
        "file"
    }
}

fn read_password_from_stdin() -> Result<String> {
    eprintln!("password:");
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        config: runtime.config.clone(),
        credentials: runtime.credentials.clone(),
    };
    let paths = resolve_paths(&context, &overrides)?;
    if runtime.diagnostics {
        debug!("{}", paths.diagnostics());
    }
    Ok(paths)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
