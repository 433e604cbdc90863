//! HTTP snapshot of the latest reading.
//!
//! Serves the value held by the [`ReadingStore`] at request time; nothing is
//! cached or queued. Uses `tiny_http`, which runs the same on the host and on
//! ESP-IDF (via `std::net`).
//!
//! | Request         | Response                                             |
//! |-----------------|------------------------------------------------------|
//! | `GET /`         | `Humidity: 50% \| Temperature: 20.0°C ~ 68.00°F`     |
//! | `GET /reading`  | `{"humidity":50,"celsius":20.0,"fahrenheit":68.0}`   |
//! | other path      | `404`                                                |
//! | non-GET         | `405` with `Allow: GET`                              |
//!
//! Both reading endpoints answer `503` until the first sample is stored.

use crate::sensor::Sample;
use crate::store::ReadingStore;
use log::{error, info, warn};
use serde::Serialize;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Method, Response, Server};

/// Receive poll interval; bounds how long `stop()` takes.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// JSON body of `GET /reading`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadingJson {
    pub humidity: u8,
    pub celsius: f32,
    pub fahrenheit: f32,
}

impl From<Sample> for ReadingJson {
    fn from(sample: Sample) -> Self {
        Self {
            humidity: sample.humidity(),
            celsius: sample.celsius(),
            fahrenheit: sample.fahrenheit(),
        }
    }
}

/// Response chosen for a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Plain-text reading.
    Text(String),
    /// JSON reading.
    Json(String),
    /// No sample stored yet.
    Unavailable,
    /// Unknown path.
    NotFound,
    /// Method other than GET.
    MethodNotAllowed,
}

impl Reply {
    /// HTTP status code.
    pub fn status(&self) -> u16 {
        match self {
            Self::Text(_) | Self::Json(_) => 200,
            Self::Unavailable => 503,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
        }
    }
}

/// Pick the response for `method path` given the stored sample.
pub fn route(method: &Method, path: &str, current: Option<Sample>) -> Reply {
    if method != &Method::Get {
        return Reply::MethodNotAllowed;
    }
    // Ignore any query string
    let path = path.split('?').next().unwrap_or(path);
    match path {
        "/" | "/reading" | "/reading/" => {}
        _ => return Reply::NotFound,
    }
    let Some(sample) = current else {
        return Reply::Unavailable;
    };
    if path == "/" {
        return Reply::Text(sample.to_string());
    }
    match serde_json::to_string(&ReadingJson::from(sample)) {
        Ok(json) => Reply::Json(json),
        Err(e) => {
            error!("Failed to serialize reading: {}", e);
            Reply::Unavailable
        }
    }
}

struct Headers {
    text: Header,
    json: Header,
    allow_get: Header,
}

impl Headers {
    fn new() -> io::Result<Self> {
        Ok(Self {
            text: header("Content-Type", "text/plain; charset=utf-8")?,
            json: header("Content-Type", "application/json")?,
            allow_get: header("Allow", "GET")?,
        })
    }
}

fn header(name: &str, value: &str) -> io::Result<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid header {}: {}", name, value),
        )
    })
}

/// HTTP snapshot server.
///
/// Runs in a background thread. Drop it to stop the server.
pub struct SnapshotServer {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    local_addr: Option<SocketAddr>,
}

impl SnapshotServer {
    /// Start serving `store` on `bind_addr:port` (`None` binds 0.0.0.0).
    pub fn start(
        bind_addr: Option<IpAddr>,
        port: u16,
        store: Arc<ReadingStore>,
    ) -> io::Result<Self> {
        let addr = match bind_addr {
            Some(ip) => format!("{}:{}", ip, port),
            None => format!("0.0.0.0:{}", port),
        };

        let server = Server::http(&addr)
            .map_err(|e| io::Error::new(io::ErrorKind::AddrInUse, format!("{}", e)))?;
        let local_addr = server.server_addr().to_ip();
        let headers = Headers::new()?;

        info!("Snapshot server listening on http://{}/", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = shutdown.clone();
        let handle = thread::Builder::new()
            .name("http".into())
            .spawn(move || Self::run_server(server, store, headers, shutdown_flag))?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
            local_addr,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    fn run_server(
        server: Server,
        store: Arc<ReadingStore>,
        headers: Headers,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Acquire) {
                info!("Snapshot server shutting down");
                break;
            }

            match server.recv_timeout(POLL_INTERVAL) {
                Ok(Some(request)) => {
                    let reply = route(request.method(), request.url(), store.current());
                    let status = reply.status();
                    let response = match reply {
                        Reply::Text(body) => {
                            Response::from_string(body).with_header(headers.text.clone())
                        }
                        Reply::Json(body) => {
                            Response::from_string(body).with_header(headers.json.clone())
                        }
                        Reply::Unavailable => Response::from_string("No reading yet"),
                        Reply::NotFound => Response::from_string("Not Found"),
                        Reply::MethodNotAllowed => Response::from_string("Method Not Allowed")
                            .with_header(headers.allow_get.clone()),
                    };
                    if let Err(e) = request.respond(response.with_status_code(status)) {
                        warn!("Failed to send response: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Server error: {}", e);
                    break;
                }
            }
        }
    }

    /// Stop the server. May take up to one poll interval.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SnapshotServer {
    fn drop(&mut self) {
        self.stop();
    }
}
