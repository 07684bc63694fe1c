//! 集成测试共用的工具：启动监听在随机端口上的服务器，并以原始字节收发 HTTP 报文。

#![allow(dead_code)]

use std::{
    collections::HashMap,
    io::{Read, Write},
    net::{SocketAddr, TcpStream},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use threaded_httpd::{Config, HttpServer, StaticTokenValidator};

pub const TOKEN: &str = "good-token";
pub const PRINCIPAL: &str = "alice";

/// 解析后的响应
#[derive(Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

pub fn config(workers: usize) -> Config {
    Config::new()
        .with_port(0)
        .with_worker_threads(workers)
        .with_read_timeout_secs(1)
}

/// 构建带静态令牌校验器的服务器，由 `setup` 注册路由后启动
pub fn start_server(config: Config, setup: impl FnOnce(&mut HttpServer)) -> HttpServer {
    let validator = StaticTokenValidator::new().with_token(TOKEN, PRINCIPAL);
    let mut server = HttpServer::new(config).with_validator(Arc::new(validator));
    setup(&mut server);
    server.start().expect("server should start");
    server
}

pub fn addr(server: &HttpServer) -> SocketAddr {
    server.local_addr().expect("server should be running")
}

/// 发送原始字节并读取到 EOF；连接未返回任何字节时得到 `None`
pub fn send_raw(addr: SocketAddr, raw: &[u8]) -> Option<RawResponse> {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    stream.write_all(raw).expect("write request");
    read_response(&mut stream)
}

pub fn read_response(stream: &mut TcpStream) -> Option<RawResponse> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(_) => break,
        }
    }
    parse_response(&buffer)
}

pub fn parse_response(buffer: &[u8]) -> Option<RawResponse> {
    if buffer.is_empty() {
        return None;
    }
    let split = buffer.windows(4).position(|w| w == b"\r\n\r\n")?;
    let head = String::from_utf8_lossy(&buffer[..split]).to_string();
    let mut lines = head.split("\r\n");

    // 解析状态行
    let status = lines
        .next()?
        .split_whitespace()
        .nth(1)?
        .parse::<u16>()
        .ok()?;

    // 解析头部
    let headers = lines
        .filter_map(|line| line.split_once(": "))
        .map(|(k, v)| (k.to_lowercase(), v.to_string()))
        .collect();

    Some(RawResponse {
        status,
        headers,
        body: buffer[split + 4..].to_vec(),
    })
}

pub fn get(addr: SocketAddr, path: &str, token: Option<&str>) -> Option<RawResponse> {
    let auth = token
        .map(|t| format!("Authorization: Bearer {}\r\n", t))
        .unwrap_or_default();
    let raw = format!("GET {} HTTP/1.1\r\nHost: localhost\r\n{}\r\n", path, auth);
    send_raw(addr, raw.as_bytes())
}

pub fn post(addr: SocketAddr, path: &str, body: &[u8], token: Option<&str>) -> Option<RawResponse> {
    let auth = token
        .map(|t| format!("Authorization: Bearer {}\r\n", t))
        .unwrap_or_default();
    let mut raw = format!(
        "POST {} HTTP/1.1\r\nHost: localhost\r\n{}Content-Length: {}\r\n\r\n",
        path,
        auth,
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(body);
    send_raw(addr, &raw)
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
