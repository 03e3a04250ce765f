//! Archy CLI
//!
//! Command-line interface for compiling intents and inspecting provider catalogs.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use archy::{
    is_url, lint_catalog, load_schema_auto, read_document, validate_attributes, ArchitectureOracle,
    CompileOptions, Compiler, DependencyResolver, DeploymentContext, Intent, KindStatus,
    LoadOptions, SchemaRepository, Severity, StaticOracle,
};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "archy")]
#[command(about = "Compile service intents into provider-valid configuration")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SchemaArgs {
    /// Capability schema source: file path or URL (http:// or https://)
    #[arg(long)]
    schema: String,

    /// Provider entry to load (full registry key or unambiguous suffix)
    #[arg(long, default_value = "hashicorp/azurerm")]
    provider: String,

    /// Provider version pin (overrides the document's provider_versions)
    #[arg(long)]
    provider_version: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile intents into configuration text
    Compile {
        #[command(flatten)]
        schema: SchemaArgs,

        /// Intent name (repeatable)
        #[arg(long = "intent", required_unless_present = "intents")]
        intent: Vec<String>,

        /// JSON file with an array of intents
        #[arg(long, conflicts_with = "intent")]
        intents: Option<PathBuf>,

        /// Oracle: JSON fixture file or HTTP endpoint
        #[arg(long)]
        oracle: String,

        /// Deployment context JSON file
        #[arg(long)]
        context: Option<PathBuf>,

        /// Scope to deploy into (overrides --context)
        #[arg(long)]
        scope: Option<String>,

        /// Target region (overrides --context)
        #[arg(long)]
        region: Option<String>,

        /// Provider account identifier (overrides --context)
        #[arg(long)]
        account: Option<String>,

        /// Maximum concurrent oracle calls
        #[arg(long, default_value_t = 4)]
        parallel: usize,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write a JSON run report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// List resource kinds in the catalog
    Kinds {
        #[command(flatten)]
        schema: SchemaArgs,

        /// Only kinds containing this substring
        #[arg(long)]
        filter: Option<String>,
    },

    /// Show a kind's model and inferred dependencies
    Inspect {
        /// Resource kind
        kind: String,

        #[command(flatten)]
        schema: SchemaArgs,

        /// Depth of the transitive dependency tree
        #[arg(long, default_value_t = 3)]
        depth: usize,
    },

    /// Validate attribute names against a kind
    Validate {
        /// Resource kind
        kind: String,

        #[command(flatten)]
        schema: SchemaArgs,

        /// Attribute names, comma separated
        #[arg(long, value_delimiter = ',')]
        attributes: Vec<String>,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Lint the catalog for dependency problems
    Lint {
        #[command(flatten)]
        schema: SchemaArgs,

        /// Output format: text (default) or json
        #[arg(long, default_value = "text")]
        format: String,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Only show errors
        #[arg(long, short)]
        quiet: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Compile {
            schema,
            intent,
            intents,
            oracle,
            context,
            scope,
            region,
            account,
            parallel,
            output,
            report,
        } => run_compile(CompileArgs {
            schema,
            intent_names: intent,
            intents_file: intents,
            oracle,
            context_file: context,
            scope,
            region,
            account,
            parallel,
            output,
            report,
        }),

        Commands::Kinds { schema, filter } => run_kinds(&schema, filter.as_deref()),

        Commands::Inspect {
            kind,
            schema,
            depth,
        } => run_inspect(&kind, &schema, depth),

        Commands::Validate {
            kind,
            schema,
            attributes,
            json,
        } => run_validate(&kind, &schema, &attributes, json),

        Commands::Lint {
            schema,
            format,
            strict,
            quiet,
        } => run_lint(&schema, &format, strict, quiet),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn load_repository(args: &SchemaArgs) -> Result<SchemaRepository, u8> {
    let mut options = LoadOptions::new(&args.provider);
    if let Some(version) = &args.provider_version {
        options = options.with_version(version);
    }
    load_schema_auto(&args.schema, &options).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })
}

struct CompileArgs {
    schema: SchemaArgs,
    intent_names: Vec<String>,
    intents_file: Option<PathBuf>,
    oracle: String,
    context_file: Option<PathBuf>,
    scope: Option<String>,
    region: Option<String>,
    account: Option<String>,
    parallel: usize,
    output: Option<PathBuf>,
    report: Option<PathBuf>,
}

fn run_compile(args: CompileArgs) -> Result<(), u8> {
    let repo = Arc::new(load_repository(&args.schema)?);
    let intents = load_intents(&args.intent_names, args.intents_file.as_deref())?;
    let context = deployment_context(&args)?;
    let oracle = build_oracle(&args.oracle, repo.conventions().name.as_str())?;

    let compiler = Compiler::new(Arc::clone(&repo), oracle)
        .with_options(CompileOptions::default().with_max_parallel(args.parallel));

    let compilation = compiler.compile(&intents, &context).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    for failed in compilation.failed_intents() {
        eprintln!(
            "Warning: intent '{}' skipped: {}",
            failed.intent,
            failed.error.as_deref().unwrap_or("unknown error")
        );
    }

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&compilation).map_err(|e| {
            eprintln!("Error serializing report: {}", e);
            2u8
        })?;
        write_file(path, &json)?;
    }

    match &args.output {
        Some(path) => write_file(path, &compilation.configuration)?,
        None => print!("{}", compilation.configuration),
    }

    Ok(())
}

fn load_intents(names: &[String], file: Option<&Path>) -> Result<Vec<Intent>, u8> {
    match file {
        Some(path) => {
            let document = read_document(path).map_err(|e| {
                eprintln!("Error loading intents: {}", e);
                e.exit_code() as u8
            })?;
            serde_json::from_value(document).map_err(|e| {
                eprintln!("Error: intents file must be an array of intents: {}", e);
                2u8
            })
        }
        None => Ok(names.iter().map(|name| Intent::new(name, "")).collect()),
    }
}

fn deployment_context(args: &CompileArgs) -> Result<DeploymentContext, u8> {
    let base: Option<DeploymentContext> = match &args.context_file {
        Some(path) => {
            let document = read_document(path).map_err(|e| {
                eprintln!("Error loading context: {}", e);
                e.exit_code() as u8
            })?;
            Some(serde_json::from_value(document).map_err(|e| {
                eprintln!("Error: invalid deployment context: {}", e);
                2u8
            })?)
        }
        None => None,
    };

    let scope = args
        .scope
        .clone()
        .or_else(|| base.as_ref().map(|c| c.scope_identifier.clone()));
    let region = args
        .region
        .clone()
        .or_else(|| base.as_ref().map(|c| c.region.clone()));
    let account = args
        .account
        .clone()
        .or_else(|| base.as_ref().and_then(|c| c.provider_account_identifier.clone()));

    let (Some(scope), Some(region)) = (scope, region) else {
        eprintln!("Error: deployment scope and region are required (--scope/--region or --context)");
        return Err(2);
    };

    let mut context = DeploymentContext::new(scope, region);
    if let Some(account) = account {
        context = context.with_account(account);
    }
    Ok(context)
}

fn build_oracle(source: &str, provider: &str) -> Result<Arc<dyn ArchitectureOracle>, u8> {
    if is_url(source) {
        #[cfg(feature = "remote")]
        {
            return Ok(Arc::new(archy::HttpOracle::new(source, provider)));
        }
        #[cfg(not(feature = "remote"))]
        {
            let _ = provider;
            eprintln!("Error: HTTP oracle requires the 'remote' feature");
            return Err(2);
        }
    }

    let oracle = StaticOracle::load(Path::new(source)).map_err(|e| {
        eprintln!("Error loading oracle fixture: {}", e);
        e.exit_code() as u8
    })?;
    Ok(Arc::new(oracle))
}

fn write_file(path: &Path, content: &str) -> Result<(), u8> {
    std::fs::write(path, content).map_err(|e| {
        eprintln!("Error writing to {}: {}", path.display(), e);
        3u8
    })
}

fn run_kinds(args: &SchemaArgs, filter: Option<&str>) -> Result<(), u8> {
    let repo = load_repository(args)?;
    for kind in repo.get_all_resource_kinds() {
        if filter.map_or(true, |f| kind.contains(f)) {
            println!("{}", kind);
        }
    }
    Ok(())
}

fn run_inspect(kind: &str, args: &SchemaArgs, depth: usize) -> Result<(), u8> {
    let repo = Arc::new(load_repository(args)?);
    let Some(model) = repo.get_resource_model(kind) else {
        eprintln!("Error: unknown resource kind: {}", kind);
        return Err(2);
    };

    let resolver = DependencyResolver::new(Arc::clone(&repo));
    let output = serde_json::json!({
        "kind": kind,
        "provider": repo.provider_key(),
        "provider_version": repo.provider_version(),
        "model": model,
        "allowlist": repo.get_attribute_allowlist(kind),
        "dependencies": resolver.get_dependencies(kind).as_ref(),
        "dependency_tree": resolver.build_dependency_tree(kind, depth),
    });

    let json = serde_json::to_string_pretty(&output).map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;
    println!("{}", json);
    Ok(())
}

fn run_validate(
    kind: &str,
    args: &SchemaArgs,
    attributes: &[String],
    json_output: bool,
) -> Result<(), u8> {
    let repo = load_repository(args)?;
    let result = validate_attributes(&repo, kind, attributes);

    if json_output {
        let output = serde_json::to_string(&result).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        println!("{}", output);
    } else if result.valid {
        println!("Valid");
    } else {
        eprintln!("Validation failed:");
        for error in &result.errors {
            eprintln!("  {}", error);
        }
    }

    if result.valid {
        Ok(())
    } else {
        Err(1)
    }
}

fn run_lint(args: &SchemaArgs, format: &str, strict: bool, quiet: bool) -> Result<(), u8> {
    let repo = Arc::new(load_repository(args)?);
    let resolver = DependencyResolver::new(repo);
    let result = lint_catalog(&resolver, strict);

    if format == "json" {
        let json = serde_json::to_string_pretty(&result).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        println!("{}", json);
    } else {
        if !quiet {
            println!("Linting {} ...\n", result.provider);
        }

        for kind_result in &result.results {
            let status_icon = match kind_result.status {
                KindStatus::Ok => "\x1b[32m✓\x1b[0m",
                KindStatus::Warning => "\x1b[33m⚠\x1b[0m",
                KindStatus::Error => "\x1b[31m✗\x1b[0m",
            };

            if !quiet || kind_result.status == KindStatus::Error {
                println!("  {} {}", status_icon, kind_result.kind);
            }

            for diag in &kind_result.diagnostics {
                let (color, label) = match diag.severity {
                    Severity::Error => ("\x1b[31m", "error"),
                    Severity::Warning => ("\x1b[33m", "warning"),
                };
                if !quiet || diag.severity == Severity::Error {
                    println!(
                        "    {}{}[{}]\x1b[0m: {}{}",
                        color,
                        label,
                        diag.code,
                        diag.attribute
                            .as_deref()
                            .map(|a| format!("{} - ", a))
                            .unwrap_or_default(),
                        diag.message
                    );
                }
            }
        }

        println!();
        if result.failed == 0 {
            println!(
                "\x1b[32m✓ {} kinds checked, all passed\x1b[0m",
                result.kinds_checked
            );
        } else {
            println!(
                "\x1b[31m✗ {} kinds checked: {} passed, {} failed ({} errors, {} warnings)\x1b[0m",
                result.kinds_checked, result.passed, result.failed, result.errors, result.warnings
            );
        }
    }

    if result.failed == 0 {
        Ok(())
    } else {
        Err(1)
    }
}
