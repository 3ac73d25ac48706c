use std::net::SocketAddr;
use std::sync::Arc;

use gatekeep::authz::engine::Resolver;
use gatekeep::authz::watcher::ReloadStatus;
use gatekeep::authz::web::{router, ApiState};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Access decision API bound to an ephemeral local port
pub struct TestServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
    client: reqwest::Client,
}

impl TestServer {
    pub async fn start(
        resolver: Arc<Resolver>,
        reload: Option<watch::Receiver<ReloadStatus>>,
    ) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("No local addr");
        let app = router(ApiState { resolver, reload });
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Test server failed");
        });
        Self {
            addr,
            handle,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> (u16, serde_json::Value) {
        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("Request failed");
        let status = response.status().as_u16();
        let body = response.json().await.expect("Response was not JSON");
        (status, body)
    }

    pub async fn get(&self, path: &str) -> (u16, String) {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("Request failed");
        let status = response.status().as_u16();
        (status, response.text().await.expect("No response body"))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
