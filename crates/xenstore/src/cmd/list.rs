use xenstore_client::{join_path, Client};

use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_children, print_entries, Entry, OutputFormat};

pub fn run(client: &Client, path: &str, long: bool, format: OutputFormat) -> CliResult<i32> {
    let children = client
        .list(path)
        .map_err(|err| client_error("list failed", err))?;

    // The reply's terminating NUL yields an empty trailing name.
    let children: Vec<String> = children
        .into_iter()
        .filter(|child| !child.is_empty())
        .collect();

    if !long {
        print_children(path, &children, format);
        return Ok(SUCCESS);
    }

    let mut entries = Vec::with_capacity(children.len());
    for child in &children {
        let full = join_path(&[path, child]);
        let permissions = client
            .get_permissions(&full)
            .map_err(|err| client_error(&format!("getperms {full} failed"), err))?;
        entries.push(Entry {
            path: full,
            permissions,
        });
    }

    print_entries(&entries, format);
    Ok(SUCCESS)
}
