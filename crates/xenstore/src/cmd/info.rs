use serde::Serialize;
use xenstore_client::{control_domain, unix_socket_path, xenbus_path};

use crate::cmd::InfoArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct InfoOutput {
    socket_path: String,
    xenbus_path: String,
    control_domain: bool,
    version: &'static str,
    target: &'static str,
}

pub fn run(_args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let out = InfoOutput {
        socket_path: unix_socket_path().display().to_string(),
        xenbus_path: xenbus_path().display().to_string(),
        control_domain: control_domain(),
        version: env!("CARGO_PKG_VERSION"),
        target: option_env!("XENSTORE_BUILD_TARGET").unwrap_or("unknown"),
    };

    print_info(&out, format);
    Ok(SUCCESS)
}

fn print_info(out: &InfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Socket Path:   {}", out.socket_path);
            println!("XenBus Path:   {}", out.xenbus_path);
            println!("ControlDomain: {}", out.control_domain);
            println!();
            println!("Version:       {}", out.version);
            println!("Target:        {}", out.target);
        }
        OutputFormat::Raw => {
            println!("{}", out.socket_path);
            println!("{}", out.xenbus_path);
            println!("{}", out.control_domain);
        }
    }
}
