#![allow(dead_code)]

use rerouter_config::Config;
use rerouter_server::{build_router, AppState};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;

pub const PROXY_BASE: &str = "https://a.example";
pub const ADMIN_TOKEN: &str = "s3cret";
pub const GOOGLEBOT: &str = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";
pub const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

pub fn config(upstream: &str, cache_dir: &Path) -> Config {
    let mut cfg = Config {
        b_base_url: upstream.to_string(),
        a_base_url: Some(PROXY_BASE.to_string()),
        ..Default::default()
    };
    cfg.cache.dir = cache_dir.display().to_string();
    cfg.admin.token = Some(ADMIN_TOKEN.to_string());
    cfg
}

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<AppState>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn spawn(cfg: Config) -> TestServer {
    let state = Arc::new(AppState::from_config(cfg).unwrap());
    let app = build_router(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    TestServer { addr, state }
}

/// Client that reports redirects instead of following them.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
