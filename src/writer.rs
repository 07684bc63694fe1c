//! # 响应序列化
//!
//! 把 `Response` 写成 HTTP/1.1 报文：状态行、标头、空行、响应体。
//! `Content-Length` 总是按实际响应体重新计算，处理器设置的值会被丢弃。

use crate::{exception::Exception, param::*, response::Response};
use chrono::prelude::*;
use log::{debug, warn};
use std::io::Write;

/// 由服务器统一写出的标头，处理器设置的同名标头会被忽略
const MANAGED_HEADERS: [&str; 4] = ["content-length", "date", "server", "connection"];

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseWriter {
    /// 为 HEAD 请求写响应时只写头部
    head_only: bool,
}

impl ResponseWriter {
    pub fn new(head_only: bool) -> Self {
        Self { head_only }
    }

    /// 生成完整的报文字节
    pub fn as_bytes(&self, response: &Response) -> Vec<u8> {
        let body = response.body();
        let mut header = String::with_capacity(256);
        header.push_str("HTTP/1.1 ");
        header.push_str(&response.status_code().to_string());
        header.push(' ');
        header.push_str(response.information());
        header.push_str(CRLF);

        let mut has_content_type = false;
        for (name, value) in response.headers() {
            if MANAGED_HEADERS.contains(&name.to_lowercase().as_str()) {
                continue;
            }
            if !is_safe_header(name, value) {
                warn!("丢弃含有控制字符的响应标头：{:?}", name);
                continue;
            }
            has_content_type |= name.eq_ignore_ascii_case("content-type");
            header.push_str(&[name.as_str(), ": ", value.as_str(), CRLF].concat());
        }
        if !has_content_type {
            header.push_str(&["Content-Type: ", DEFAULT_CONTENT_TYPE, CRLF].concat());
        }
        header.push_str(&format!("Content-Length: {}{}", body.len(), CRLF));
        header.push_str(&["Date: ", &format_date(&Utc::now()), CRLF].concat());
        header.push_str(&["Server: ", SERVER_NAME, CRLF].concat());
        header.push_str(&["Connection: close", CRLF].concat());
        header.push_str(CRLF);

        let mut bytes = header.into_bytes();
        if !self.head_only {
            bytes.extend_from_slice(body);
        }
        bytes
    }

    /// 写出响应并刷新。失败时返回 `Write`，调用方只需记录日志。
    pub fn write_to<W: Write>(
        &self,
        stream: &mut W,
        response: &Response,
        id: u128,
    ) -> Result<(), Exception> {
        let bytes = self.as_bytes(response);
        debug!("[ID{}]发送响应，长度: {}", id, bytes.len());
        stream
            .write_all(&bytes)
            .and_then(|_| stream.flush())
            .map_err(|e| {
                warn!("[ID{}]写回响应失败: {}", id, e);
                Exception::Write(e)
            })
    }
}

/// 标头名与值中不能出现 CR、LF，否则会把一个标头拆成多行甚至提前结束头部
fn is_safe_header(name: &str, value: &str) -> bool {
    !name.is_empty()
        && !name.contains(|c: char| c == ':' || c.is_ascii_control())
        && !value.contains(|c: char| c == '\r' || c == '\n')
}

/// RFC 7231 规定的 IMF-fixdate 格式
fn format_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
