#![allow(dead_code)]

use std::collections::BTreeMap;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

use xenstore::wire::{Operation, Packet, PacketReader, PacketWriter};

pub fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/xscli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

/// In-memory xenstored speaking the wire protocol over a Unix socket.
pub struct FakeXenstored {
    pub dir: PathBuf,
    pub socket: PathBuf,
    pub requests: Arc<Mutex<Vec<Packet>>>,
}

impl FakeXenstored {
    pub fn start(tag: &str) -> Self {
        let dir = unique_temp_dir(tag);
        let socket = dir.join("socket");
        let listener = UnixListener::bind(&socket).expect("fake xenstored should bind");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let store = Arc::new(Mutex::new(seed()));
        let log = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { return };
                let store = Arc::clone(&store);
                let log = Arc::clone(&log);
                thread::spawn(move || serve(stream, &store, &log));
            }
        });

        Self {
            dir,
            socket,
            requests,
        }
    }

    /// Run the binary against this backend.
    pub fn run(&self, args: &[&str]) -> Output {
        self.command(args)
            .output()
            .expect("xenstore binary should run")
    }

    pub fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_xenstore"));
        cmd.arg("--log-level")
            .arg("error")
            .arg("-s")
            .arg("--socket-path")
            .arg(&self.socket)
            .args(args)
            .env_remove("XENSTORED_PATH")
            .stdin(Stdio::null());
        cmd
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.requests
            .lock()
            .expect("request log lock")
            .iter()
            .map(Packet::operation)
            .collect()
    }
}

impl Drop for FakeXenstored {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn seed() -> BTreeMap<String, String> {
    let mut store = BTreeMap::new();
    store.insert("/local/domain/0/name".to_string(), "Domain-0".to_string());
    store.insert("/local/domain/1/name".to_string(), "guest-1".to_string());
    store.insert("/local/domain/2/name".to_string(), "guest-2".to_string());
    store
}

fn serve(stream: UnixStream, store: &Mutex<BTreeMap<String, String>>, log: &Mutex<Vec<Packet>>) {
    let Ok(read_half) = stream.try_clone() else {
        return;
    };
    let mut reader = PacketReader::new(read_half);
    let mut writer = PacketWriter::new(stream);

    while let Ok(request) = reader.read_packet() {
        log.lock().expect("request log lock").push(request.clone());
        let mut store = store.lock().expect("store lock");
        for reply in handle(&request, &mut store) {
            if writer.write_packet(&reply).is_err() {
                return;
            }
        }
    }
}

fn handle(request: &Packet, store: &mut BTreeMap<String, String>) -> Vec<Packet> {
    let fields = request.payload_fields();
    let path = fields.first().cloned().unwrap_or_default();
    let reply = |op: Operation, payload: &str| {
        Packet::new(op, request.request_id(), request.transaction_id(), payload)
            .expect("reply should fit")
    };
    let error = |token: &str| vec![reply(Operation::Error, token)];

    match request.operation() {
        Operation::Read => match store.get(&path) {
            Some(value) => vec![reply(Operation::Read, value)],
            None => error("ENOENT"),
        },
        Operation::Write => {
            let value = fields.get(1).cloned().unwrap_or_default();
            store.insert(path, value);
            vec![reply(Operation::Write, "OK")]
        }
        Operation::Mkdir => {
            store.entry(path).or_default();
            vec![reply(Operation::Mkdir, "OK")]
        }
        Operation::Rm => {
            let prefix = format!("{path}/");
            let before = store.len();
            store.retain(|key, _| key != &path && !key.starts_with(&prefix));
            if store.len() == before {
                error("ENOENT")
            } else {
                vec![reply(Operation::Rm, "OK")]
            }
        }
        Operation::Directory => {
            let prefix = format!("{path}/");
            let mut children: Vec<&str> = store
                .keys()
                .filter_map(|key| key.strip_prefix(&prefix))
                .map(|rest| rest.split('/').next().unwrap_or(rest))
                .collect();
            children.dedup();
            if children.is_empty() {
                error("ENOENT")
            } else {
                vec![reply(Operation::Directory, &children.join("\0"))]
            }
        }
        Operation::GetPermissions => vec![reply(Operation::GetPermissions, "n0\0r1")],
        Operation::GetDomainPath => vec![reply(
            Operation::GetDomainPath,
            &format!("/local/domain/{path}"),
        )],
        Operation::Watch => {
            let token = fields.get(1).cloned().unwrap_or_default();
            vec![
                reply(Operation::Watch, "OK"),
                Packet::new(Operation::WatchEvent, 0, 0, format!("{path}\0{token}"))
                    .expect("event should fit"),
            ]
        }
        Operation::UnWatch => vec![reply(Operation::UnWatch, "OK")],
        _ => error("ENOSYS"),
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

pub fn missing_socket(dir: &Path) -> PathBuf {
    dir.join("no-such-socket")
}
