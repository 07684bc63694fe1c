// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了服务器从启动、接收连接到处理单个请求的整个生命周期中可能出现的各类异常。
//!
//! ## 设计意图
//! - **错误分类**：涵盖启动期致命错误（绑定、监听）、协议解析错误、路由与鉴权错误，
//!   以及线程池、写回等连接级错误。
//! - **语义映射**：请求级的变体可以通过 [`Exception::status_code`] 转化为对应的 HTTP 状态码；
//!   返回 `None` 的变体只记录日志，不向客户端发送任何响应。
//! - **隔离**：请求级错误只在所属的工作线程内被消化为 HTTP 响应，不会跨越连接边界传播。

use std::{error::Error, fmt, io};

/// 服务器运行过程中发生的异常类型。
#[derive(Debug)]
pub enum Exception {
    /// 无法创建套接字或绑定到指定端口。启动期致命错误。
    Bind(io::Error),
    /// 套接字已绑定但无法进入监听状态。启动期致命错误。
    Listen(io::Error),
    /// 请求行缺失或无法解析，或某个标头行格式错误。对应 `400 Bad Request`。
    MalformedRequest,
    /// 请求头部无法按 UTF-8 解码。对应 `400 Bad Request`。
    RequestIsNotUtf8,
    /// 请求使用了 HTTP/1.x 以外的协议版本。对应 `400 Bad Request`。
    UnsupportedHttpVersion,
    /// 请求头部超过了配置的最大长度。对应 `400 Bad Request`。
    HeaderTooLarge,
    /// 声明的请求体长度超过了配置的上限。对应 `413 Content Too Large`。
    PayloadTooLarge,
    /// 已收到完整请求行，但在超时前没有收齐剩余数据。对应 `408 Request Timeout`。
    RequestTimeout,
    /// 对端在发送完整请求行之前断开或超时，不发送任何响应。
    ConnectionClosed,
    /// 当前方法下没有任何路由模式匹配该路径。对应 `404 Not Found`。
    NotFound,
    /// 受保护路由缺少或携带了无效的 Bearer 令牌。对应 `401 Unauthorized`。
    Unauthorized,
    /// 业务处理器返回错误或发生 panic。对应 `500 Internal Server Error`。
    HandlerFailed(String),
    /// 写回响应失败（通常是对端已关闭连接）。只记录日志。
    Write(io::Error),
    /// 线程池已开始停机，不再接受新任务。
    PoolStopped,
    /// 无法创建工作线程或接收线程。
    WorkerSpawn(io::Error),
    /// 注册路由时提供的模式不是合法的正则表达式。
    InvalidRoutePattern(String),
    /// 服务器正在运行，此时不允许修改路由表或重复启动。
    ServerRunning,
    /// 无法读取配置文件。
    ConfigLoad(String),
}

use Exception::*;

impl Exception {
    /// 返回该异常应当映射成的 HTTP 状态码。
    ///
    /// 返回 `None` 表示该异常不应产生任何 HTTP 响应。
    pub fn status_code(&self) -> Option<u16> {
        match self {
            MalformedRequest | RequestIsNotUtf8 | UnsupportedHttpVersion | HeaderTooLarge => {
                Some(400)
            }
            PayloadTooLarge => Some(413),
            RequestTimeout => Some(408),
            NotFound => Some(404),
            Unauthorized => Some(401),
            HandlerFailed(_) => Some(500),
            _ => None,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bind(e) => write!(f, "Couldn't bind listening socket: {}", e),
            Listen(e) => write!(f, "Couldn't listen on socket: {}", e),
            MalformedRequest => write!(f, "Malformed request (400)"),
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            HeaderTooLarge => write!(f, "Request header too large (400)"),
            PayloadTooLarge => write!(f, "Payload too large (413)"),
            RequestTimeout => write!(f, "Request timed out (408)"),
            ConnectionClosed => write!(f, "Connection closed before a request line arrived"),
            NotFound => write!(f, "Route not found (404)"),
            Unauthorized => write!(f, "Unauthorized (401)"),
            HandlerFailed(msg) => write!(f, "Handler failed: {}", msg),
            Write(e) => write!(f, "Couldn't write response: {}", e),
            PoolStopped => write!(f, "Thread pool is stopped"),
            WorkerSpawn(e) => write!(f, "Couldn't spawn thread: {}", e),
            InvalidRoutePattern(p) => write!(f, "Invalid route pattern: {}", p),
            ServerRunning => write!(f, "Server is running"),
            ConfigLoad(msg) => write!(f, "Couldn't load config: {}", msg),
        }
    }
}

impl Error for Exception {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Bind(e) | Listen(e) | Write(e) | WorkerSpawn(e) => Some(e),
            _ => None,
        }
    }
}
