use clap::{Args, Subcommand};
use tracing::debug;
use xenstore_client::{Client, ConnectConfig};

use crate::exit::{client_error, required, CliResult};
use crate::output::OutputFormat;

pub mod info;
pub mod list;
pub mod store;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Read values from xenstore by path.
    Read(PathArgs),
    /// Write values to xenstore by path.
    Write(WriteArgs),
    /// Remove a value from xenstore by path.
    Rm(PathArgs),
    /// List values from xenstore by path.
    #[command(visible_alias = "ls")]
    List(ListArgs),
    /// Create a path in xenstore.
    Mkdir(PathArgs),
    /// Get the home path of a domain.
    VmPath(VmPathArgs),
    /// Watch a xenstore path for changes until interrupted.
    Watch(WatchArgs),
    /// Display system information.
    Info(InfoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, config: &ConnectConfig, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Read(args) => {
            let path = required(args.path, "Please specify the XenStore path to read")?;
            with_client(config, |client| store::read(client, &path, format))
        }
        Command::Write(args) => {
            let path = required(args.path, "Please specify the XenStore path to write")?;
            let value = required(args.value, "Please specify the value to write")?;
            with_client(config, |client| store::write(client, &path, &value, format))
        }
        Command::Rm(args) => {
            let path = required(args.path, "Please specify the XenStore path to remove")?;
            with_client(config, |client| store::remove(client, &path, format))
        }
        Command::Mkdir(args) => {
            let path = required(args.path, "Please specify the XenStore path to create")?;
            with_client(config, |client| store::mkdir(client, &path, format))
        }
        Command::VmPath(args) => {
            let domid = required(args.domid, "Please specify the domid of the VM")?;
            let domid = store::parse_domid(&domid)?;
            with_client(config, |client| store::vm_path(client, domid, format))
        }
        Command::List(args) => {
            let path = required(args.path, "Please specify the XenStore path to list")?;
            with_client(config, |client| list::run(client, &path, args.long, format))
        }
        Command::Watch(args) => {
            let path = required(args.path, "Please specify the XenStore path to watch")?;
            let token = required(
                args.token,
                "Please specify the token to create the watch with",
            )?;
            with_client(config, |client| watch::run(client, &path, &token, format))
        }
        Command::Info(args) => info::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Connect, run `f`, then close the client. A failure from `f` wins over a
/// failure to close.
fn with_client<F>(config: &ConnectConfig, f: F) -> CliResult<i32>
where
    F: FnOnce(&Client) -> CliResult<i32>,
{
    debug!(
        backend = config.backend.kind(),
        path = %config.backend.path().display(),
        "connecting"
    );
    let client = Client::connect(config).map_err(|err| client_error("connect failed", err))?;

    let result = f(&client);
    let closed = client
        .close()
        .map_err(|err| client_error("connection failed", err));
    let code = result?;
    closed?;
    Ok(code)
}

#[derive(Args, Debug)]
pub struct PathArgs {
    /// XenStore path.
    pub path: Option<String>,
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    /// XenStore path.
    pub path: Option<String>,
    /// Value to store.
    pub value: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// XenStore path.
    pub path: Option<String>,
    /// Print each child's full path and permissions.
    #[arg(long, short = 'l')]
    pub long: bool,
}

#[derive(Args, Debug)]
pub struct VmPathArgs {
    /// Domain id.
    pub domid: Option<String>,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// XenStore path to watch.
    pub path: Option<String>,
    /// Token to register the watch with.
    pub token: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct InfoArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build details.
    #[arg(long)]
    pub extended: bool,
}
