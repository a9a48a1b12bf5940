//! A simulated host for pipeline tests
//!
//! `FakeHost` answers the tunnel CLI and the container runtime from shared
//! in-memory state, and `FakeDns` resolves whatever has been routed, so a
//! deploy actually converges and a second deploy finds nothing to do.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tempfile::TempDir;

use tw_core::config::{DeployConfig, EndpointConfig, SettleConfig};
use tw_core::{CommandResult, CommandRunner, CommandSpec, TunnelId};
use tw_reconcile::probe::DnsLookup;
use tw_reconcile::{DnsResolver, Engine, Verifier};

pub const TUNNEL_A: &str = "6ff42ae2-765d-4adf-8112-31c55c1551ef";
pub const TUNNEL_B: &str = "0a1b2c3d-0000-4000-8000-123456789abc";

pub const ROUTING_CONFIG: &str = "\
tunnel: <tunnel-id>
credentials-file: /etc/cloudflared/credentials/<tunnel-id>.json

ingress:
  - hostname: app.example.com
    service: http://app:8080
  - service: http_status:404
";

#[derive(Debug, Default)]
pub struct World {
    pub tunnels: Vec<(String, String)>,
    pub routed: BTreeSet<String>,
    pub containers_up: bool,
    pub calls: Vec<String>,
    /// Id handed out by the next `tunnel create`
    pub next_id: String,
    pub project_dir: PathBuf,
    pub cert: PathBuf,
}

impl World {
    /// Commands that change something
    pub fn mutations(&self) -> Vec<String> {
        self.calls
            .iter()
            .filter(|c| !(c.starts_with("tunnel list") || c.starts_with("ps ")))
            .cloned()
            .collect()
    }
}

#[derive(Clone)]
pub struct FakeHost(pub Arc<Mutex<World>>);

#[async_trait]
impl CommandRunner for FakeHost {
    async fn run(&self, spec: &CommandSpec) -> CommandResult {
        let mut world = self.0.lock().unwrap();
        let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
        world.calls.push(args.join(" "));

        match args.as_slice() {
            ["tunnel", "login"] => {
                fs::write(&world.cert, "cert").unwrap();
                CommandResult::ok("")
            }
            ["tunnel", "list"] => {
                let mut out = String::from("ID NAME CREATED CONNECTIONS\n");
                for (id, name) in &world.tunnels {
                    out.push_str(&format!("{id} {name} 2024-03-01T10:00:00Z\n"));
                }
                CommandResult::ok(out)
            }
            ["tunnel", "create", name] => {
                let id = world.next_id.clone();
                let written = world.project_dir.join(format!("{id}.json"));
                fs::write(&written, "{}").unwrap();
                world.tunnels.push((id.clone(), name.to_string()));
                CommandResult::ok(format!(
                    "Tunnel credentials written to {}. Keep this file secret.\nCreated tunnel {name} with id {id}\n",
                    written.display()
                ))
            }
            ["tunnel", "route", "dns", _, host] => {
                if world.routed.insert(host.to_string()) {
                    CommandResult::ok("")
                } else {
                    CommandResult::failed(format!(
                        "Failed to add route: code: 1003, reason: An A, AAAA, or CNAME record with that host already exists. ({host})"
                    ))
                }
            }
            ["ps", ..] => {
                if world.containers_up {
                    CommandResult::ok("tunnel-example-app\ntunnel-example-cloudflared\nunrelated-db\n")
                } else {
                    CommandResult::ok("unrelated-db\n")
                }
            }
            ["compose", "build"] => CommandResult::ok(""),
            ["compose", "up", ..] => {
                world.containers_up = true;
                CommandResult::ok("")
            }
            other => CommandResult::failed(format!("unexpected command: {}", other.join(" "))),
        }
    }
}

pub struct FakeDns(pub Arc<Mutex<World>>);

#[async_trait]
impl DnsResolver for FakeDns {
    async fn lookup(&self, hostname: &str) -> DnsLookup {
        if self.0.lock().unwrap().routed.contains(hostname) {
            DnsLookup {
                status: Some(0),
                answers: vec!["104.16.0.1".to_string()],
            }
        } else {
            DnsLookup {
                status: Some(3),
                answers: Vec::new(),
            }
        }
    }
}

/// Backend serving the site and a health endpoint with the given status
pub async fn serve_backend(health: StatusCode) -> SocketAddr {
    let app = Router::new()
        .route("/", get(|| async { "<h1>Hello World</h1>" }))
        .route(
            "/health",
            get(move || async move { (health, r#"{"status":"healthy"}"#) }),
        );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub struct Harness {
    pub dir: TempDir,
    pub config: DeployConfig,
    pub world: Arc<Mutex<World>>,
}

impl Harness {
    /// A project with the routing config checked in and nothing else
    pub fn new(backend: SocketAddr) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DeployConfig::default();
        config.paths.project_dir = dir.path().to_path_buf();
        config.paths.origin_cert = dir.path().join("cert.pem");
        config.settle = SettleConfig {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(50),
            multiplier: 2.0,
            jitter: 0.0,
            deadline: Duration::from_secs(2),
        };
        config.endpoints = vec![
            EndpointConfig {
                name: "site".to_string(),
                url: format!("http://{backend}/"),
                expect_body: Some("Hello World".to_string()),
                timeout: Duration::from_secs(2),
                ..EndpointConfig::default()
            },
            EndpointConfig {
                name: "health".to_string(),
                url: format!("http://{backend}/health"),
                expect_body: Some("healthy".to_string()),
                timeout: Duration::from_secs(2),
                ..EndpointConfig::default()
            },
        ];

        fs::create_dir_all(dir.path().join("cloudflared")).unwrap();
        fs::write(config.paths.routing_config_path(), ROUTING_CONFIG).unwrap();

        let world = Arc::new(Mutex::new(World {
            next_id: TUNNEL_A.to_string(),
            project_dir: dir.path().to_path_buf(),
            cert: config.paths.origin_cert_path(),
            ..World::default()
        }));

        Self { dir, config, world }
    }

    /// Everything already reconciled onto `TUNNEL_A`
    pub fn deployed(backend: SocketAddr) -> Self {
        let harness = Self::new(backend);
        let id = TunnelId::parse(TUNNEL_A).unwrap();
        let config = &harness.config;

        fs::write(config.paths.origin_cert_path(), "cert").unwrap();
        fs::create_dir_all(config.paths.credentials_dir_path()).unwrap();
        fs::write(config.paths.credential_path(&id), "{}").unwrap();
        fs::write(
            config.paths.routing_config_path(),
            ROUTING_CONFIG.replace("<tunnel-id>", TUNNEL_A),
        )
        .unwrap();

        {
            let mut world = harness.world.lock().unwrap();
            world
                .tunnels
                .push((TUNNEL_A.to_string(), config.tunnel.name.clone()));
            world.routed.extend(config.tunnel.hostnames.iter().cloned());
            world.containers_up = true;
        }
        harness
    }

    pub fn engine(&self) -> Engine {
        Engine::new(
            self.config.clone(),
            Arc::new(FakeHost(self.world.clone())),
            Arc::new(FakeDns(self.world.clone())),
            Verifier::with_client(reqwest::Client::builder().no_proxy().build().unwrap()),
        )
    }

    pub fn clear_calls(&self) {
        self.world.lock().unwrap().calls.clear();
    }

    pub fn mutations(&self) -> Vec<String> {
        self.world.lock().unwrap().mutations()
    }
}
