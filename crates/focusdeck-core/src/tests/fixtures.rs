//! Test fixtures and helpers

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::process::{ProcessController, ProcessTable, normalize_name};

#[derive(Debug, Clone)]
struct FakeProcess {
    name: String,
    alive: bool,
    exits_on_close: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    processes: BTreeMap<u32, FakeProcess>,
    next_pid: u32,
    spawned: Vec<(PathBuf, Vec<String>)>,
    close_requests: Vec<u32>,
    kills: Vec<u32>,
}

/// In-memory process table. Spawned processes are named after the file name
/// of their path and exit when asked to close.
#[derive(Debug, Default)]
pub struct FakeProcessTable {
    state: Mutex<FakeState>,
}

impl FakeProcessTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a running process. `exits_on_close: false` models a process that
    /// ignores close requests and has to be killed.
    pub fn add(&self, name: &str, exits_on_close: bool) -> u32 {
        let mut state = self.state.lock();
        state.next_pid += 1;
        let pid = 1000 + state.next_pid;
        state.processes.insert(
            pid,
            FakeProcess {
                name: name.to_string(),
                alive: true,
                exits_on_close,
            },
        );
        pid
    }

    pub fn running(&self, name: &str) -> usize {
        let wanted = normalize_name(name);
        self.state
            .lock()
            .processes
            .values()
            .filter(|p| p.alive && normalize_name(&p.name) == wanted)
            .count()
    }

    pub fn spawned(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.state.lock().spawned.clone()
    }

    pub fn close_requests(&self) -> Vec<u32> {
        self.state.lock().close_requests.clone()
    }

    pub fn kills(&self) -> Vec<u32> {
        self.state.lock().kills.clone()
    }
}

impl ProcessTable for FakeProcessTable {
    fn find(&self, name: &str) -> Vec<u32> {
        let wanted = normalize_name(name);
        self.state
            .lock()
            .processes
            .iter()
            .filter(|(_, p)| p.alive && normalize_name(&p.name) == wanted)
            .map(|(pid, _)| *pid)
            .collect()
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.state
            .lock()
            .processes
            .get(&pid)
            .is_some_and(|p| p.alive)
    }

    fn request_close(&self, pid: u32) -> io::Result<()> {
        let mut state = self.state.lock();
        state.close_requests.push(pid);
        if let Some(process) = state.processes.get_mut(&pid)
            && process.exits_on_close
        {
            process.alive = false;
        }
        Ok(())
    }

    fn kill(&self, pid: u32) -> io::Result<()> {
        let mut state = self.state.lock();
        state.kills.push(pid);
        if let Some(process) = state.processes.get_mut(&pid) {
            process.alive = false;
        }
        Ok(())
    }

    fn spawn(&self, path: &Path, args: &[String]) -> io::Result<u32> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pid = self.add(&name, true);
        self.state
            .lock()
            .spawned
            .push((path.to_path_buf(), args.to_vec()));
        Ok(pid)
    }
}

pub fn controller(table: &Arc<FakeProcessTable>) -> ProcessController {
    ProcessController::new(table.clone(), tracing::Span::none())
}

/// Create an empty file standing in for an executable.
pub fn fake_executable(dir: &TempDir, name: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, b"").unwrap();
    path.to_string_lossy().into_owned()
}

/// obs-websocket stand-in without authentication. Serves `connections`
/// sequential connections and returns the request types it received.
pub fn spawn_obs_server(listener: TcpListener, connections: usize) -> JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut requests = Vec::new();
        for _ in 0..connections {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let hello = json!({"op": 0, "d": {"obsWebSocketVersion": "5.4.2", "rpcVersion": 1}});
            ws.send(Message::Text(hello.to_string())).await.unwrap();

            while let Some(Ok(message)) = ws.next().await {
                let Message::Text(text) = message else {
                    continue;
                };
                let frame: Value = serde_json::from_str(&text).unwrap();
                match frame["op"].as_u64() {
                    Some(1) => {
                        let identified = json!({"op": 2, "d": {"negotiatedRpcVersion": 1}});
                        ws.send(Message::Text(identified.to_string())).await.unwrap();
                    }
                    Some(6) => {
                        requests.push(frame["d"]["requestType"].as_str().unwrap().to_string());
                    }
                    _ => {}
                }
            }
        }
        requests
    })
}
