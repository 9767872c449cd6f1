use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pagegist_core::RetrievalRequest;
use pagegist_local::{CapabilityRegistry, Visit, VisitConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pagegist")]
#[command(about = "Retrieve a web page and summarize it for a goal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a page, summarize it for a goal, print the three-section result.
    Visit(VisitCmd),
    /// Invoke a registered capability with raw JSON parameters.
    Call(CallCmd),
    /// List registered capabilities with their parameter schemas (json).
    Tools,
    /// Show the effective configuration and local prerequisites (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct VisitCmd {
    /// Page to retrieve.
    #[arg(long)]
    url: String,
    /// What information matters on the page.
    #[arg(long)]
    goal: String,
    /// Output format: text|json (json adds the per-attempt ledger).
    #[arg(long = "output", alias = "format", default_value = "text")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct CallCmd {
    /// Capability name (see `pagegist tools`).
    name: String,
    /// Parameters as a JSON object, e.g. '{"url": "...", "goal": "..."}'.
    #[arg(long, default_value = "{}")]
    params: String,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn load_env_file() {
    // `.env` in the working directory unless disabled; PAGEGIST_ENV_FILE points elsewhere.
    // Variables already set in the process environment are never overridden.
    if std::env::var("PAGEGIST_DOTENV").ok().as_deref() == Some("0") {
        return;
    }
    match std::env::var("PAGEGIST_ENV_FILE") {
        Ok(p) if !p.trim().is_empty() => {
            let _ = dotenvy::from_path(p.trim());
        }
        _ => {
            let _ = dotenvy::dotenv();
        }
    }
}

fn init_tracing() {
    // stdout carries the result; logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn node_version(node_bin: &str) -> std::result::Result<String, String> {
    let out = std::process::Command::new(node_bin)
        .arg("--version")
        .output()
        .map_err(|e| e.to_string())?;
    if !out.status.success() {
        return Err(format!("`{node_bin} --version` exited with {}", out.status));
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file();
    init_tracing();

    let cli = Cli::parse();
    let cfg = VisitConfig::from_env();
    tracing::debug!(api_base = %cfg.api_base, model = %cfg.model, "configuration loaded");

    match cli.command {
        Commands::Visit(args) => {
            let visit = Visit::from_config(&cfg).context("building visit pipeline")?;
            let req = RetrievalRequest::new(args.url, args.goal);
            let (result, digest) = visit.run(&req).await;
            let text = result.format();
            match args.output.to_ascii_lowercase().as_str() {
                "json" => {
                    let v = serde_json::json!({
                        "schema_version": 1,
                        "kind": "visit",
                        "ok": result.is_success(),
                        "request": req,
                        "result": result,
                        "text": text,
                        "attempts": digest.map(|d| d.attempts).unwrap_or_default(),
                    });
                    println!("{v}");
                }
                _ => println!("{}", text.trim()),
            }
        }
        Commands::Call(args) => {
            let params: serde_json::Value = serde_json::from_str(&args.params)
                .with_context(|| format!("--params is not valid JSON: {}", args.params))?;
            let registry = CapabilityRegistry::with_defaults(&cfg)?;
            println!("{}", registry.invoke(&args.name, params).await);
        }
        Commands::Tools => {
            let registry = CapabilityRegistry::with_defaults(&cfg)?;
            println!("{}", serde_json::to_string_pretty(&registry.describe())?);
        }
        Commands::Doctor(args) => {
            let node = node_version(&cfg.node_bin);
            let log_dir_ok = std::fs::create_dir_all(&cfg.log_dir).is_ok();
            let ok = node.is_ok() && log_dir_ok;
            let node_detail = match &node {
                Ok(v) => v.clone(),
                Err(e) => e.clone(),
            };
            let payload = serde_json::json!({
                "schema_version": 1,
                "kind": "doctor",
                "ok": ok,
                "name": "pagegist",
                "version": env!("CARGO_PKG_VERSION"),
                "api_key_configured": cfg.api_key.is_some(),
                "config": cfg,
                "checks": [
                    {
                        "name": "node",
                        "ok": node.is_ok(),
                        "detail": node_detail,
                    },
                    {
                        "name": "log_dir",
                        "ok": log_dir_ok,
                        "detail": cfg.log_dir.display().to_string(),
                    },
                ],
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => {
                    println!("pagegist {}", env!("CARGO_PKG_VERSION"));
                    println!("endpoint: {} (model {})", cfg.api_base, cfg.model);
                    match &node {
                        Ok(v) => println!("node: {v}"),
                        Err(e) => println!("node: unavailable ({e})"),
                    }
                    println!(
                        "log_dir: {} ({})",
                        cfg.log_dir.display(),
                        if log_dir_ok { "ok" } else { "not writable" }
                    );
                }
                _ => println!("{payload}"),
            }
        }
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "pagegist",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("pagegist {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }
    Ok(())
}
