//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use polling_transport::config::ServerConfig;
use polling_transport::{PollingServer, Shutdown, Transport};
use tokio::net::TcpListener;

/// A polling server running on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub transport: Transport,
    pub shutdown: Shutdown,
}

impl TestServer {
    /// URL of the polling endpoint for `sid`.
    pub fn url(&self, sid: &str) -> String {
        format!("http://{}/polling?sid={}", self.addr, sid)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a server with the given transport timeouts (milliseconds).
pub async fn start_server(ping_timeout_ms: u64, io_timeout_ms: u64) -> TestServer {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.transport.ping_timeout_ms = ping_timeout_ms;
    config.transport.receive_timeout_ms = io_timeout_ms;
    config.transport.send_timeout_ms = io_timeout_ms;
    config.transport.inbound_timeout_ms = io_timeout_ms;
    config
        .transport
        .headers
        .insert("X-Transport".to_string(), "polling".to_string());

    let transport = Transport::new(&config.transport).unwrap();
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = PollingServer::new(config, transport.clone()).unwrap();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestServer {
        addr,
        transport,
        shutdown,
    }
}

/// Wait until `polls` GET requests are parked on the transport.
pub async fn wait_until_parked(transport: &Transport, polls: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while transport.parked_polls() != polls {
        assert!(Instant::now() < deadline, "poll never parked");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
