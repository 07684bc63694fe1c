//! 业务处理器接口。
//!
//! 所有路由都通过同一个 [`Handler`] trait 调用；签名相符的闭包自动实现该 trait。

use crate::{auth::Principal, request::Request, response::Response};
use std::error::Error;

/// 处理器返回的错误。它的内容只会被写入日志，客户端只会看到通用的 500 响应。
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// 单次请求的处理上下文。
///
/// 鉴权得到的身份放在这里而不是 `Request` 中，请求本身在解析后保持不变。
#[derive(Debug, Clone, Default)]
pub struct Context {
    id: u128,
    captures: Vec<String>,
    principal: Option<Principal>,
}

impl Context {
    pub fn new(id: u128, captures: Vec<String>, principal: Option<Principal>) -> Self {
        Self {
            id,
            captures,
            principal,
        }
    }

    /// 连接的唯一编号，与日志中的 `[ID..]` 一致
    pub fn id(&self) -> u128 {
        self.id
    }

    /// 路由模式中各捕获组按位置提取出的值
    pub fn captures(&self) -> &[String] {
        &self.captures
    }

    /// 获取第 `index` 个捕获值（从 0 开始）
    pub fn capture(&self, index: usize) -> Option<&str> {
        self.captures.get(index).map(String::as_str)
    }

    /// 公开路由上始终为 `None`
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }
}

/// 业务处理器。
///
/// 实现必须是线程安全的：同一个处理器会被多个工作线程并发调用。
/// 处理器不应无限期阻塞，否则会一直占用所在的工作线程。
pub trait Handler: Send + Sync {
    fn handle(&self, request: &Request, context: &Context) -> Result<Response, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&Request, &Context) -> Result<Response, HandlerError> + Send + Sync,
{
    fn handle(&self, request: &Request, context: &Context) -> Result<Response, HandlerError> {
        self(request, context)
    }
}
