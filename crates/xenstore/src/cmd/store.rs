use xenstore_client::Client;

use crate::exit::{client_error, CliError, CliResult, SUCCESS};
use crate::output::{print_value, OutputFormat};

pub fn read(client: &Client, path: &str, format: OutputFormat) -> CliResult<i32> {
    let value = client
        .read(path)
        .map_err(|err| client_error("read failed", err))?;
    print_value("READ", path, &value, format);
    Ok(SUCCESS)
}

pub fn write(client: &Client, path: &str, value: &str, format: OutputFormat) -> CliResult<i32> {
    let ack = client
        .write(path, value)
        .map_err(|err| client_error("write failed", err))?;
    print_value("WRITE", path, &ack, format);
    Ok(SUCCESS)
}

pub fn remove(client: &Client, path: &str, format: OutputFormat) -> CliResult<i32> {
    let ack = client
        .remove(path)
        .map_err(|err| client_error("rm failed", err))?;
    print_value("RM", path, &ack, format);
    Ok(SUCCESS)
}

pub fn mkdir(client: &Client, path: &str, format: OutputFormat) -> CliResult<i32> {
    let ack = client
        .mkdir(path)
        .map_err(|err| client_error("mkdir failed", err))?;
    print_value("MKDIR", path, &ack, format);
    Ok(SUCCESS)
}

pub fn vm_path(client: &Client, domid: u32, format: OutputFormat) -> CliResult<i32> {
    let path = client
        .get_domain_path(domid)
        .map_err(|err| client_error("vm-path failed", err))?;
    print_value("GET_DOMAIN_PATH", &domid.to_string(), &path, format);
    Ok(SUCCESS)
}

pub fn parse_domid(input: &str) -> CliResult<u32> {
    input
        .trim()
        .parse()
        .map_err(|_| CliError::usage(format!("invalid domid: {input}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit::USAGE;

    #[test]
    fn parses_domid() {
        assert_eq!(parse_domid("0").unwrap(), 0);
        assert_eq!(parse_domid(" 17 ").unwrap(), 17);
    }

    #[test]
    fn rejects_bad_domid() {
        assert_eq!(parse_domid("dom0").unwrap_err().code, USAGE);
        assert_eq!(parse_domid("-1").unwrap_err().code, USAGE);
    }
}
