use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const VALID_ARTICLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE article PUBLIC "-//NLM//DTD JATS (Z39.96) Journal Archiving and Interchange DTD v1.2 20190208//EN" "JATS-archivearticle1.dtd">
<article>
  <front/>
</article>"#;

pub const DTD_WITH_ERROR: &str = r#"{"errors":[{"message":"bad","line":5,"column":2}],"warnings":[]}"#;

pub const SCHEMATRON_WITH_WARNING: &str =
    r#"{"results":{"errors":[],"warnings":[{"description":"ERROR: missing id","type":"warning","line":10}],"passed":[{},{}]}}"#;

pub const SCHEMATRON_CLEAN: &str = r#"{"results":{"errors":[],"warnings":[],"passed":[{}]}}"#;

pub const DTD_CLEAN: &str = r#"{"errors":[],"warnings":[]}"#;

#[derive(Clone, Debug)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    /// Lower-cased header names
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Clone, Debug)]
struct Route {
    status: u16,
    content_type: String,
    body: Vec<u8>,
    delay: Option<Duration>,
}

/// Minimal HTTP/1.1 server answering canned responses per path
pub struct MockHttpServer {
    addr: SocketAddr,
    routes: Arc<Mutex<HashMap<String, Route>>>,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    task: JoinHandle<()>,
}

impl MockHttpServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<Mutex<HashMap<String, Route>>> = Arc::default();
        let requests: Arc<Mutex<Vec<CapturedRequest>>> = Arc::default();

        let task = {
            let routes = Arc::clone(&routes);
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let routes = Arc::clone(&routes);
                    let requests = Arc::clone(&requests);
                    tokio::spawn(async move {
                        let _ = serve(stream, routes, requests).await;
                    });
                }
            })
        };

        Self {
            addr,
            routes,
            requests,
            task,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    pub fn respond_json(&self, path: &str, status: u16, body: &str) {
        self.route(path, status, "application/json", body, None);
    }

    pub fn respond_text(&self, path: &str, status: u16, body: &str) {
        self.route(path, status, "text/plain", body, None);
    }

    pub fn respond_slowly(&self, path: &str, delay: Duration) {
        self.route(path, 200, "application/json", "{}", Some(delay));
    }

    fn route(&self, path: &str, status: u16, content_type: &str, body: &str, delay: Option<Duration>) {
        self.routes.lock().unwrap().insert(
            path.to_string(),
            Route {
                status,
                content_type: content_type.to_string(),
                body: body.as_bytes().to_vec(),
                delay,
            },
        );
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockHttpServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    routes: Arc<Mutex<HashMap<String, Route>>>,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default();
    let path = target.split('?').next().unwrap_or_default().to_string();

    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_lowercase(), value.trim().to_string()))
        .collect();
    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    while buffer.len() < head_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    let body = buffer[head_end..].to_vec();

    requests.lock().unwrap().push(CapturedRequest {
        method,
        path: path.clone(),
        headers,
        body,
    });

    let route = routes.lock().unwrap().get(&path).cloned().unwrap_or(Route {
        status: 404,
        content_type: "text/plain".to_string(),
        body: b"not found".to_vec(),
        delay: None,
    });
    if let Some(delay) = route.delay {
        tokio::time::sleep(delay).await;
    }

    let response_head = format!(
        "HTTP/1.1 {} Mock\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        route.status,
        route.content_type,
        route.body.len()
    );
    stream.write_all(response_head.as_bytes()).await?;
    stream.write_all(&route.body).await?;
    stream.shutdown().await
}
