use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use webproxy::config::{LogConfig, LogFormat};
use webproxy::proxy::ServeSummary;
use webproxy::{HostFilter, ProxyConfig, ProxyServer};

pub fn test_config(pool_size: usize, max_requests: usize) -> ProxyConfig {
    ProxyConfig {
        port: 0,
        host: "127.0.0.1".to_string(),
        pool_size,
        max_requests,
        filter_path: "unused".into(),
        client_timeout: Some(Duration::from_secs(5)),
        connect_timeout: Some(Duration::from_secs(5)),
        log: LogConfig {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
        },
    }
}

// Bind the proxy on an ephemeral port and run its accept loop in the background.
pub fn start_proxy(
    config: ProxyConfig,
    filter: HostFilter,
) -> anyhow::Result<(JoinHandle<ServeSummary>, SocketAddr)> {
    let server = ProxyServer::bind(&config, Arc::new(filter))?;
    let addr = server.local_addr()?;
    let handle = thread::spawn(move || server.run());
    Ok((handle, addr))
}

// One-shot origin: records the request it receives and answers with `response`.
pub fn start_origin(response: &'static [u8]) -> anyhow::Result<(JoinHandle<Vec<u8>>, u16)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();

    let handle = thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return Vec::new();
        };
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        while !received.ends_with(b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => received.extend_from_slice(&buf[..n]),
            }
        }
        let _ = stream.write_all(response);
        received
    });

    Ok((handle, port))
}

// Send a raw request through the proxy and collect everything until it closes.
pub fn send_request(proxy: SocketAddr, raw: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(proxy)?;
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    stream.write_all(raw)?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;
    Ok(response)
}

pub fn as_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
