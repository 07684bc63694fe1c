//! # 连接处理器
//!
//! 负责单个 TCP 连接的完整生命周期：
//!
//! ```text
//! ACCEPTED → READING_REQUEST ─┬─ 解析失败 ─────────────────────────────→ RESPONDING(4xx)
//!                             └─ PARSED → ROUTING ─┬─ 未匹配 ───────────→ RESPONDING(404)
//!                                                  └─ AUTH_CHECK ─┬─ 拒绝 → RESPONDING(401)
//!                                                                 └─ HANDLING → RESPONDING(处理结果或500)
//!                                                                                   → CLOSED
//! ```
//!
//! 每个收到可解析请求行的连接都恰好得到一个响应，随后关闭，不复用连接。

use crate::{
    auth::AuthGate,
    exception::Exception,
    handler::Context,
    parser::RequestParser,
    request::Request,
    response::Response,
    router::Router,
    writer::ResponseWriter,
};
use log::{debug, error, info, warn};
use std::{
    io::{self, ErrorKind, Read},
    net::{Shutdown, TcpStream},
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::{Duration, Instant},
};

/// 关闭前最多丢弃的未读字节数
const DRAIN_LIMIT: usize = 65536;

/// 关闭前等待对端收尾的时间
const DRAIN_TIMEOUT: Duration = Duration::from_millis(200);

/// 所有工作线程共享的只读依赖
pub struct ConnectionContext {
    pub router: Arc<Router>,
    pub auth: Arc<AuthGate>,
    pub parser: RequestParser,
    pub read_timeout: Duration,
}

/// 处理一个连接直到关闭
pub fn handle_connection(mut stream: TcpStream, id: u128, ctx: &ConnectionContext) {
    if let Err(e) = stream.set_write_timeout(Some(ctx.read_timeout)) {
        error!("[ID{}]无法设置套接字超时: {}", id, e);
        return;
    }

    let start_time = Instant::now();
    // 读超时从连接开始计算，覆盖整个读取阶段
    let mut reader = DeadlineReader::new(&stream, ctx.read_timeout);
    let request = match ctx.parser.read_request(&mut reader, id) {
        Ok(request) => request,
        Err(e) => {
            match e.status_code() {
                Some(code) => {
                    warn!("[ID{}]请求读取失败：{}，返回{}", id, e, code);
                    let response = Response::from_status_code(code);
                    let _ = ResponseWriter::default().write_to(&mut stream, &response, id);
                    close(stream, id);
                }
                None => debug!("[ID{}]连接在收到请求行之前结束：{}", id, e),
            }
            return;
        }
    };

    let response = dispatch(&request, id, ctx);

    // 结构化访问日志：便于后期审计与性能监控
    info!(
        "[ID{}] {} {} HTTP/{} {} {} {}ms \"{}\"",
        id,
        request.method(),
        request.path(),
        request.version(),
        response.status_code(),
        response.body().len(),
        start_time.elapsed().as_millis(),
        request.user_agent(),
    );

    let writer = ResponseWriter::new(request.method() == "HEAD");
    // 写失败只记录日志，连接照常关闭
    let _ = writer.write_to(&mut stream, &response, id);
    close(stream, id);
}

/// 路由、鉴权并调用处理器，所有错误都在这里转换为响应
pub fn dispatch(request: &Request, id: u128, ctx: &ConnectionContext) -> Response {
    match route_and_handle(request, id, ctx) {
        Ok(response) => response,
        Err(e) => {
            let code = e.status_code().unwrap_or(500);
            debug!("[ID{}]请求以{}结束：{}", id, code, e);
            let mut response = Response::from_status_code(code);
            if let Exception::Unauthorized = e {
                response.set_header("WWW-Authenticate", "Bearer");
            }
            response
        }
    }
}

fn route_and_handle(
    request: &Request,
    id: u128,
    ctx: &ConnectionContext,
) -> Result<Response, Exception> {
    let matched = ctx.router.match_route(request.method(), request.path())?;
    let route = matched.route;
    debug!("[ID{}]匹配路由：{} {}", id, route.method(), route.pattern());

    let principal = ctx.auth.check(request, route.access(), id)?;
    let context = Context::new(id, matched.captures, principal);

    match panic::catch_unwind(AssertUnwindSafe(|| route.handler().handle(request, &context))) {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => {
            error!("[ID{}]处理器返回错误：{}", id, e);
            Err(Exception::HandlerFailed(e.to_string()))
        }
        Err(_) => {
            error!("[ID{}]处理器发生panic", id);
            Err(Exception::HandlerFailed("handler panicked".to_string()))
        }
    }
}

/// 半关闭写方向后丢弃对端尚未读取的数据，避免直接关闭时内核发送 RST 冲掉已写出的响应
fn close(stream: TcpStream, id: u128) {
    if stream.shutdown(Shutdown::Write).is_err() {
        return;
    }
    let mut reader = DeadlineReader::new(&stream, DRAIN_TIMEOUT);
    let mut drained = 0;
    let mut buf = [0u8; 4096];
    while drained < DRAIN_LIMIT {
        match reader.read(&mut buf) {
            Ok(0) | Err(_) => break,
            Ok(n) => drained += n,
        }
    }
    debug!("[ID{}]连接关闭", id);
}

/// 带截止时间的读取器。
///
/// 每次读取前把套接字的读超时收紧为距截止时间的剩余时长，截止时间一过就返回 `TimedOut`。
/// 对端逐字节慢速发送也无法让读取超过截止时间。
struct DeadlineReader<'a> {
    stream: &'a TcpStream,
    deadline: Instant,
}

impl<'a> DeadlineReader<'a> {
    fn new(stream: &'a TcpStream, budget: Duration) -> Self {
        Self {
            stream,
            deadline: Instant::now() + budget,
        }
    }
}

impl Read for DeadlineReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(ErrorKind::TimedOut, "read deadline elapsed"));
        }
        self.stream.set_read_timeout(Some(remaining))?;
        Read::read(&mut self.stream, buf)
    }
}
