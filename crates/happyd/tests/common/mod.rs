#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use happyd::spawn::CommandPlanner;
use happyd::spawn::SpawnRequest;
use happyd::supervisor::ControlPlane;
use happyd::{
    ClassifiedProcess, ProcessClassifier, ProcessControl, SessionEndEvent, SessionReport,
    TmuxControl, TmuxSessionRow, TmuxSpawnOutcome, TmuxTarget,
};

/// Fake process table: scripted liveness plus a record of signaled PIDs.
pub struct FakeProcessTable {
    alive: Mutex<HashSet<u32>>,
    terminated: Mutex<Vec<u32>>,
}

impl FakeProcessTable {
    pub fn new(alive: &[u32]) -> Self {
        Self {
            alive: Mutex::new(alive.iter().copied().collect()),
            terminated: Mutex::new(Vec::new()),
        }
    }

    pub fn terminated_pids(&self) -> Vec<u32> {
        self.terminated.lock().unwrap().clone()
    }
}

impl ProcessControl for FakeProcessTable {
    fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().unwrap().contains(&pid)
    }

    fn terminate(&self, pid: u32) -> bool {
        self.terminated.lock().unwrap().push(pid);
        self.alive.lock().unwrap().contains(&pid)
    }
}

/// Classifier whose process table tests rewrite mid-scenario to simulate
/// PID reuse.
pub struct ScriptedClassifier {
    table: Mutex<HashMap<u32, ClassifiedProcess>>,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
        }
    }

    pub fn set(&self, pid: u32, kind: &str, command: &str) {
        self.table.lock().unwrap().insert(
            pid,
            ClassifiedProcess {
                kind: kind.to_string(),
                command: command.to_string(),
            },
        );
    }

    pub fn forget(&self, pid: u32) {
        self.table.lock().unwrap().remove(&pid);
    }
}

impl ProcessClassifier for ScriptedClassifier {
    fn classify(&self, pid: u32) -> Option<ClassifiedProcess> {
        self.table.lock().unwrap().get(&pid).cloned()
    }
}

/// Planner that launches a fixed command, letting tests substitute cheap
/// real processes (`sleep`, `true`) for agent CLIs.
pub struct StaticPlanner(pub Vec<String>);

impl StaticPlanner {
    pub fn tokens(tokens: &[&str]) -> Self {
        Self(tokens.iter().map(|t| t.to_string()).collect())
    }
}

impl CommandPlanner for StaticPlanner {
    fn plan(&self, _request: &SpawnRequest) -> Vec<String> {
        self.0.clone()
    }
}

/// Planner that fails the test if the spawn path ever asks it for tokens.
pub struct PanicPlanner;

impl CommandPlanner for PanicPlanner {
    fn plan(&self, _request: &SpawnRequest) -> Vec<String> {
        panic!("spawn path planned a launch that should not have happened");
    }
}

/// One window spawn as seen by the scripted tmux wrapper.
#[derive(Debug, Clone)]
pub struct RecordedTmuxSpawn {
    pub tokens: Vec<String>,
    pub target: String,
    pub env: HashMap<String, String>,
}

/// Scripted tmux wrapper: fixed session rows, a fixed spawn outcome, and
/// a record of every window spawn asked of it.
pub struct ScriptedTmux {
    rows: Vec<TmuxSessionRow>,
    spawn_pid: Option<u32>,
    fail_spawn: bool,
    spawns: Mutex<Vec<RecordedTmuxSpawn>>,
}

impl ScriptedTmux {
    pub fn new(rows: &[(&str, bool, i64)], spawn_pid: Option<u32>) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|(name, attached, last_attached)| TmuxSessionRow {
                    name: name.to_string(),
                    attached: *attached,
                    last_attached: *last_attached,
                })
                .collect(),
            spawn_pid,
            fail_spawn: false,
            spawns: Mutex::new(Vec::new()),
        }
    }

    /// A wrapper whose window spawns always error out.
    pub fn failing() -> Self {
        let mut tmux = Self::new(&[], None);
        tmux.fail_spawn = true;
        tmux
    }

    pub fn spawns(&self) -> Vec<RecordedTmuxSpawn> {
        self.spawns.lock().unwrap().clone()
    }
}

#[async_trait]
impl TmuxControl for ScriptedTmux {
    async fn available(&self) -> bool {
        true
    }

    async fn list_sessions(&self) -> std::io::Result<Vec<TmuxSessionRow>> {
        Ok(self.rows.clone())
    }

    async fn spawn_in_window(
        &self,
        tokens: &[String],
        target: &TmuxTarget,
        env: &HashMap<String, String>,
    ) -> std::io::Result<TmuxSpawnOutcome> {
        if self.fail_spawn {
            return Err(std::io::Error::other("tmux server not responding"));
        }
        self.spawns.lock().unwrap().push(RecordedTmuxSpawn {
            tokens: tokens.to_vec(),
            target: target.reference(),
            env: env.clone(),
        });
        Ok(TmuxSpawnOutcome {
            pid: self.spawn_pid,
            session_name: target.session.clone(),
            window_name: target.window.clone(),
        })
    }
}

/// Control plane that records emitted session-end events.
pub struct CollectingControlPlane {
    events: Mutex<Vec<SessionEndEvent>>,
}

impl CollectingControlPlane {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<SessionEndEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ControlPlane for CollectingControlPlane {
    async fn emit_session_end(&self, event: SessionEndEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn report(session_id: &str, pid: u32, home: &Path) -> SessionReport {
    SessionReport {
        session_id: session_id.to_string(),
        host_pid: Some(pid),
        happy_home_dir: home.to_path_buf(),
        started_by: None,
        flavor: None,
        cwd: None,
        metadata: None,
    }
}
