mod cmd;
mod exit;
mod logging;
mod output;

use std::path::PathBuf;

use clap::Parser;
use xenstore_client::{unix_socket_path, xenbus_path, ConnectConfig};

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "xenstore", version, about = "XenStore command-line tools")]
struct Cli {
    /// Path to the xenstored Unix socket.
    #[arg(long, value_name = "PATH", env = "XENSTORED_PATH", global = true)]
    socket_path: Option<PathBuf>,

    /// Path to the XenBus device.
    #[arg(long, value_name = "PATH", global = true)]
    xenbus_path: Option<PathBuf>,

    /// Use the Unix socket rather than the XenBus device.
    #[arg(long, short = 's', global = true)]
    use_socket: bool,

    /// More verbose logging (same as --log-level debug).
    #[arg(long, short = 'V', global = true)]
    verbose: bool,

    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn connect_config(&self) -> ConnectConfig {
        if self.use_socket {
            ConnectConfig::unix_socket(self.socket_path.clone().unwrap_or_else(unix_socket_path))
        } else {
            ConnectConfig::xenbus(self.xenbus_path.clone().unwrap_or_else(xenbus_path))
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if !err.use_stderr() => err.exit(),
        Err(err) => {
            let _ = err.print();
            std::process::exit(exit::USAGE);
        }
    };

    init_logging(cli.log_format, cli.log_level.with_verbose(cli.verbose));

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let config = cli.connect_config();
    let result = cmd::run(cli.command, &config, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
