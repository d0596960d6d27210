use crate::watch::WatchMode;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "protolens",
    version,
    about = "Proto service and Go implementation explorer",
    after_help = r#"Examples:
  protolens services --root .
  protolens parse api/helloworld/v1/greeter.proto
  protolens implementations --root . --strict
  protolens url --service helloworld.v1.Greeter --method SayHello --host api.local:8000
  protolens template --service Greeter --method SayHello
  protolens request --method missing_methods --params '{"interface":"GreeterRepo","struct":"greeterRepo"}'
  protolens serve --root . --watch auto
"#
)]
pub struct Args {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct WorkspaceArgs {
    /// Workspace root; repeat for several.
    #[arg(long = "root", global = true, default_value = ".")]
    pub roots: Vec<PathBuf>,
    /// Include files ignored by .gitignore.
    #[arg(long, global = true)]
    pub no_ignore: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// List every service of the workspace, filtered and sorted.
    Services,
    /// Parse one proto file, reporting what could not be extracted.
    Parse { path: PathBuf },
    /// Interfaces and structs of one Go file.
    Analyze { path: PathBuf },
    /// Every interface/struct implementation in the workspace.
    Implementations {
        /// Compare parameter and return types, not just counts.
        #[arg(long)]
        strict: bool,
    },
    /// Interface methods a struct does not implement.
    Missing {
        #[arg(long)]
        interface: String,
        #[arg(long = "struct")]
        struct_name: String,
    },
    /// gRPC and HTTP URLs of a method.
    Url {
        #[arg(long)]
        service: String,
        #[arg(long)]
        method: String,
        #[arg(long)]
        host: Option<String>,
    },
    /// Nested request template of a method.
    Template {
        #[arg(long)]
        service: String,
        #[arg(long)]
        method: String,
    },
    /// Run the JSONL request loop over stdin/stdout.
    Serve {
        /// File watch mode: auto|on|off.
        #[arg(long, default_value = "auto")]
        watch: WatchMode,
        /// Debounce window for filesystem events in milliseconds.
        #[arg(long, default_value_t = 300)]
        watch_debounce_ms: u64,
    },
    /// Run a single JSONL request and exit.
    Request {
        #[arg(long)]
        method: String,
        #[arg(long, default_value = "{}")]
        params: String,
        #[arg(long, value_name = "PATH")]
        params_file: Option<PathBuf>,
        #[arg(long, default_value = "1")]
        id: String,
    },
}
