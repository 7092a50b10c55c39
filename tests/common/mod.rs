//! Shared test infrastructure for integration tests.
//!
//! Each test gets its own gateway root in a temp dir with a config file and a
//! plan, and drives the compiled `agw` binary against it.
#![allow(dead_code)]

use serde_json::Value;
use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const TOKEN: &str = "s3cret-token";
pub const PLAN_REL: &str = "project/plans/project_plan_v3.yaml";

/// Environment that would leak host settings into a test run.
const SCRUBBED_ENV: [&str; 8] = [
    "APPROVALS_CONFIG",
    "PHONE_APPROVALS_TOKEN",
    "PHONE_TS_SKEW_SEC",
    "PHONE_NONCE_TTL_SEC",
    "PHONE_ALLOW_CIDRS",
    "PHONE_BIND",
    "PHONE_POLL_SEC",
    "RUST_LOG",
];

/// A throwaway gateway root.
pub struct GatewayFixture {
    dir: TempDir,
}

impl GatewayFixture {
    /// Root with a config (token set, poller off) and the given plan.
    pub fn new(plan_yaml: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp root");
        let fixture = Self { dir };
        fixture.write(
            "config/phone_approvals.yaml",
            &format!("token: \"{TOKEN}\"\npoll_interval_seconds: 0\n"),
        );
        fixture.write(PLAN_REL, plan_yaml);
        fixture
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent directory");
        }
        fs::write(&path, contents).expect("write fixture file");
    }

    /// `agw --root <root> <args...>` with host settings scrubbed.
    pub fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_agw"));
        cmd.arg("--root").arg(self.root()).args(args);
        for key in SCRUBBED_ENV {
            cmd.env_remove(key);
        }
        cmd
    }

    pub fn run(&self, args: &[&str]) -> Output {
        self.command(args).output().expect("run agw")
    }

    /// Run and require success, returning stdout.
    pub fn run_ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "agw {args:?} failed\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8(output.stdout).expect("utf-8 stdout")
    }

    /// Parsed plan document.
    pub fn plan(&self) -> Value {
        let text = fs::read_to_string(self.path(PLAN_REL)).expect("read plan");
        serde_yaml::from_str(&text).expect("parse plan")
    }

    /// Status field of the plan node with `id`, searching the `steps` list.
    pub fn step_status(&self, id: &str) -> Option<String> {
        self.plan()["steps"]
            .as_array()?
            .iter()
            .find(|step| step["id"] == id)
            .and_then(|step| step["status"].as_str().map(str::to_string))
    }

    pub fn file_names(&self, rel: &str) -> Vec<String> {
        let dir = self.path(rel);
        if !dir.is_dir() {
            return Vec::new();
        }
        let mut names: Vec<String> = fs::read_dir(dir)
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Start `agw serve` on a free loopback port and wait until it answers.
    pub fn serve(&self) -> RunningServer {
        let port = free_port();
        let bind = format!("127.0.0.1:{port}");
        let child = self
            .command(&["serve", "--bind", &bind])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn agw serve");
        let server = RunningServer {
            child,
            base_url: format!("http://{bind}"),
        };
        server.wait_ready();
        server
    }
}

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// An `agw serve` child process, killed on drop.
pub struct RunningServer {
    child: Child,
    pub base_url: String,
}

impl RunningServer {
    fn agent(&self) -> ureq::Agent {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(5)))
            .build();
        config.into()
    }

    fn wait_ready(&self) {
        let deadline = Instant::now() + Duration::from_secs(15);
        let agent = self.agent();
        while Instant::now() < deadline {
            if agent.get(&format!("{}/ping", self.base_url)).call().is_ok() {
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        panic!("agw serve did not come up at {}", self.base_url);
    }

    /// GET `route`, returning status and JSON body.
    pub fn get(&self, route: &str) -> (u16, Value) {
        let mut response = self
            .agent()
            .get(&format!("{}{route}", self.base_url))
            .call()
            .expect("GET request");
        let status = response.status().as_u16();
        (status, response.body_mut().read_json().expect("json body"))
    }

    /// POST `body` to `route` with an optional bearer token.
    pub fn post(&self, route: &str, token: Option<&str>, body: &Value) -> (u16, Value) {
        let agent = self.agent();
        let mut request = agent.post(&format!("{}{route}", self.base_url));
        if let Some(token) = token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        let mut response = request.send_json(body).expect("POST request");
        let status = response.status().as_u16();
        (status, response.body_mut().read_json().expect("json body"))
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Current epoch seconds.
pub fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs() as i64
}
