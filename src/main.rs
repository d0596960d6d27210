use anyhow::{Context, Result};
use clap::Parser;
use protolens::config::Config;
use protolens::workspace::Workspace;
use protolens::{cli, rpc, watch};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "PROTOLENS_LOG";

fn main() -> Result<()> {
    let args = cli::Args::parse();
    init_tracing();

    let roots = args.workspace.roots;
    let mut config = Config::load(roots.first().map(|root| root.as_path()));
    config.no_ignore |= args.workspace.no_ignore;
    if let cli::Command::Implementations { strict: true } = args.command {
        config.strict_signatures = true;
    }
    let workspace = Workspace::new(roots, config).context("open workspace")?;

    match args.command {
        cli::Command::Services => print(&workspace.scan_and_parse_all_proto_files()?),
        cli::Command::Parse { path } => {
            let path = workspace.resolve_path(&path);
            print(&workspace.parse_proto_file(&path)?)
        }
        cli::Command::Analyze { path } => {
            let path = workspace.resolve_path(&path);
            print(&*workspace.analyze_path(&path)?)
        }
        cli::Command::Implementations { .. } => print(&workspace.get_all_implementations()?),
        cli::Command::Missing {
            interface,
            struct_name,
        } => {
            let params = json!({ "interface": interface, "struct": struct_name });
            print(&rpc::handle_method(&workspace, "missing_methods", params)?)
        }
        cli::Command::Url {
            service,
            method,
            host,
        } => {
            let params = json!({ "service": service, "method": method, "host": host });
            print(&rpc::handle_method(&workspace, "url_info", params)?)
        }
        cli::Command::Template { service, method } => {
            let params = json!({ "service": service, "method": method });
            print(&rpc::handle_method(&workspace, "request_template", params)?)
        }
        cli::Command::Serve {
            watch: watch_mode,
            watch_debounce_ms,
        } => {
            let watch_config = watch::WatchConfig::new(watch_mode, watch_debounce_ms);
            rpc::serve(workspace, watch_config)
        }
        cli::Command::Request {
            method,
            params,
            params_file,
            id,
        } => {
            let params_raw = match params_file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("read params file {}", path.display()))?,
                None => params,
            };
            let response = rpc::call(&workspace, method, &params_raw, &id)?;
            println!("{response}");
            Ok(())
        }
    }
}

/// Logs go to stderr; stdout carries JSON only.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
