//! # HTTP 响应模块
//!
//! 处理器构建的 `Response` 只描述状态码、标头与响应体；
//! 序列化为报文（以及 `Content-Length` 的计算）由 [`crate::writer::ResponseWriter`] 负责。

use crate::param::*;
use bytes::Bytes;
use log::error;

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    status_code: u16,
    information: String,
    headers: Vec<(String, String)>,
    content: Bytes,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    /// 空的 `200 OK` 响应
    pub fn new() -> Self {
        Self {
            status_code: 200,
            information: reason_phrase(200).to_string(),
            headers: Vec::new(),
            content: Bytes::new(),
        }
    }

    /// 纯文本响应
    pub fn text(code: u16, body: impl Into<String>) -> Self {
        let mut response = Self::new();
        response
            .set_code(code)
            .set_header("Content-Type", DEFAULT_CONTENT_TYPE)
            .set_body(body.into());
        response
    }

    /// JSON 响应。序列化失败时退化为 500。
    pub fn json(code: u16, value: &serde_json::Value) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => {
                let mut response = Self::new();
                response
                    .set_code(code)
                    .set_header("Content-Type", "application/json")
                    .set_body(body);
                response
            }
            Err(e) => {
                error!("无法序列化JSON响应：{}", e);
                Self::from_status_code(500)
            }
        }
    }

    /// 错误页：响应体只包含状态码与原因短语，不泄露任何内部信息
    pub fn from_status_code(code: u16) -> Self {
        let information = reason_phrase(code);
        Self::text(code, format!("{} {}", code, information))
    }

    pub fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = reason_phrase(code).to_string();
        self
    }

    /// 设置标头，字段名大小写不敏感地覆盖已有值
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
        self
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.content = body.into();
        self
    }

    /// 链式构建用的标头设置
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.content
    }
}
