// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求模块
//!
//! 该模块定义强类型的 `Request` 结构体，并负责把已经收齐的字节解析成请求：
//! 1. 请求行（Request-Line）的解析（方法、路径、查询字符串、版本）。
//! 2. 标头（Headers）的解析，字段名统一转为小写以便大小写不敏感地查询。
//! 3. 依据 `Content-Length` 截取请求体。
//!
//! 从套接字增量读取字节的逻辑位于 [`crate::parser`]。

use crate::{exception::Exception, param::*};
use bytes::Bytes;
use log::{debug, error};
use std::collections::HashMap;

/// 表示一个完整的 HTTP 请求。
///
/// 解析完成后不可变，只提供只读访问器。
#[derive(Debug, Clone)]
pub struct Request {
    /// 大写的请求方法
    method: String,
    /// 不含查询字符串的路径
    path: String,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 查询参数，同名键以最后一次出现为准
    query: HashMap<String, String>,
    /// 标头，键为小写字段名；重复字段以 ", " 拼接
    headers: HashMap<String, String>,
    /// 请求体
    body: Bytes,
}

/// 请求头部解析的中间结果，等待读取请求体后组装为 `Request`。
#[derive(Debug)]
pub struct RequestHead {
    method: String,
    path: String,
    version: HttpVersion,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
}

impl RequestHead {
    /// 解析 `Content-Length` 标头。缺失时视为 0，不是纯十进制数字时返回 `MalformedRequest`。
    pub fn content_length(&self) -> Result<usize, Exception> {
        let value = match self.headers.get("content-length") {
            Some(value) => value.trim(),
            None => return Ok(0),
        };
        // `usize::from_str` 接受前导 `+`，需要先确认只含数字
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Exception::MalformedRequest);
        }
        value.parse::<usize>().map_err(|_| Exception::MalformedRequest)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// 与读取到的请求体组装为最终的请求
    pub fn with_body(self, body: Bytes) -> Request {
        Request {
            method: self.method,
            path: self.path,
            version: self.version,
            query: self.query,
            headers: self.headers,
            body,
        }
    }
}

impl Request {
    /// 从一段已经包含完整头部（以及完整请求体）的缓冲区构建 `Request`。
    ///
    /// 缓冲区中超出 `Content-Length` 的字节会被忽略；若请求体不足声明长度，则视为格式错误。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let head_end = match find_header_end(buffer, 0) {
            Some(pos) => pos,
            None => {
                error!("[ID{}]请求中没有找到头部结束标记", id);
                return Err(Exception::MalformedRequest);
            }
        };
        let head = Self::parse_head(&buffer[..head_end], id)?;
        let content_length = head.content_length()?;
        let rest = &buffer[head_end + HEADER_TERMINATOR.len()..];
        if rest.len() < content_length {
            error!(
                "[ID{}]请求体长度不足：声明{}字节，实际{}字节",
                id,
                content_length,
                rest.len()
            );
            return Err(Exception::MalformedRequest);
        }
        Ok(head.with_body(Bytes::copy_from_slice(&rest[..content_length])))
    }

    /// 解析请求头部（不含结尾的空行）。
    ///
    /// # 逻辑步骤
    /// 1. 验证编码：头部必须是合法的 UTF-8。
    /// 2. 解析请求行：`方法 SP 目标 SP 版本`，目标再按第一个 `?` 拆分为路径和查询字符串。
    /// 3. 逐行解析 `name: value` 标头。
    pub fn parse_head(head: &[u8], id: u128) -> Result<RequestHead, Exception> {
        let head_str = match std::str::from_utf8(head) {
            Ok(s) => s,
            Err(_) => {
                error!("[ID{}]无法以UTF-8解析HTTP请求头部", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let mut lines = head_str.split(CRLF);
        let request_line = lines.next().unwrap_or("");
        let (method, target, version) = parse_request_line(request_line).ok_or_else(|| {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
            Exception::MalformedRequest
        })?;

        let version = match HttpVersion::parse(version) {
            Some(v) => v,
            None => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, version);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        let (path, query) = match target.split_once('?') {
            Some((path, raw_query)) => (path.to_string(), parse_query(raw_query)),
            None => (target.to_string(), HashMap::new()),
        };

        let mut headers: HashMap<String, String> = HashMap::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = match line.split_once(':') {
                Some(pair) => pair,
                None => {
                    error!("[ID{}]无法解析的标头行：{}", id, line);
                    return Err(Exception::MalformedRequest);
                }
            };
            let name = name.trim().to_lowercase();
            if name.is_empty() {
                error!("[ID{}]标头字段名为空：{}", id, line);
                return Err(Exception::MalformedRequest);
            }
            let value = value.trim();
            headers
                .entry(name)
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }

        debug!("[ID{}]请求行：{} {} HTTP/{}", id, method, path, version);
        Ok(RequestHead {
            method: method.to_uppercase(),
            path,
            version,
            query,
            headers,
        })
    }
}

/// 拆分请求行，返回 (方法, 请求目标, 版本)。
///
/// 请求行必须恰好由三个以空格分隔的部分组成，且方法只能由 ASCII 字母构成。
pub fn parse_request_line(line: &str) -> Option<(&str, &str, &str)> {
    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    let version = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    if !method.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    Some((method, target, version))
}

/// 按 `&` 与第一个 `=` 拆分原始查询字符串，不做百分号解码。
fn parse_query(raw: &str) -> HashMap<String, String> {
    raw.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

/// 从 `from` 开始查找 CRLFCRLF，返回其起始下标。
pub fn find_header_end(buffer: &[u8], from: usize) -> Option<usize> {
    let start = from.min(buffer.len());
    buffer[start..]
        .windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .map(|pos| pos + start)
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取大写的请求方法
    pub fn method(&self) -> &str {
        &self.method
    }

    /// 获取不含查询字符串的路径
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    /// 获取全部查询参数
    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// 获取单个查询参数
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// 大小写不敏感地获取标头值
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    /// 获取全部标头（键为小写）
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// 获取客户端标识字符串，缺失时为空
    pub fn user_agent(&self) -> &str {
        self.header("user-agent").unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 验证常规 GET 请求的解析，包括 Path 和 Headers
    #[test]
    fn test_parse_get_request() {
        let request_str =
            "GET / HTTP/1.1\r\nHost: localhost:7878\r\nUser-Agent: Test-Browser\r\n\r\n";

        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.method(), "GET");
        assert_eq!(request.path(), "/");
        assert_eq!(*request.version(), HttpVersion::V1_1);
        assert_eq!(request.user_agent(), "Test-Browser");
        assert!(request.body().is_empty());
    }

    /// 带请求体的 POST：请求体必须与 Content-Length 完全一致
    #[test]
    fn test_parse_post_body() {
        let request_str = "POST /api/users HTTP/1.1\r\nContent-Length: 17\r\n\r\n{\"name\":\"alice\"}";

        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.method(), "POST");
        assert_eq!(request.path(), "/api/users");
        assert_eq!(request.body(), b"{\"name\":\"alice\"}");
    }

    /// 超出 Content-Length 的字节不属于请求体
    #[test]
    fn test_trailing_bytes_ignored() {
        let request_str = "POST /submit HTTP/1.1\r\nContent-Length: 4\r\n\r\ntest=value";

        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.body(), b"test");
    }

    #[test]
    fn test_short_body_is_malformed() {
        let request_str = "POST /submit HTTP/1.1\r\nContent-Length: 40\r\n\r\nshort";

        let result = Request::try_from(request_str.as_bytes(), 0);

        assert!(matches!(result, Err(Exception::MalformedRequest)));
    }

    /// 查询字符串按 & 和 = 拆分，重复键以最后一次为准
    #[test]
    fn test_path_with_query_string() {
        let request_str =
            "GET /page?id=123&name=test&flag&id=456&&empty= HTTP/1.1\r\nHost: localhost\r\n\r\n";

        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.path(), "/page");
        assert_eq!(request.query_param("id"), Some("456"));
        assert_eq!(request.query_param("name"), Some("test"));
        assert_eq!(request.query_param("flag"), Some(""));
        assert_eq!(request.query_param("empty"), Some(""));
        assert_eq!(request.query().len(), 4);
    }

    /// 验证 Header 字段名是否大小写不敏感
    #[test]
    fn test_case_insensitive_headers() {
        let request_str =
            "GET / HTTP/1.1\r\nX-Trace-ID: abc\r\nAUTHORIZATION: Bearer t\r\n\r\n";

        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.header("x-trace-id"), Some("abc"));
        assert_eq!(request.header("Authorization"), Some("Bearer t"));
        assert!(request.headers().contains_key("authorization"));
    }

    #[test]
    fn test_repeated_headers_are_joined() {
        let request_str = "GET / HTTP/1.1\r\nAccept: text/html\r\naccept: application/json\r\n\r\n";

        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.header("accept"), Some("text/html, application/json"));
    }

    #[test]
    fn test_conflicting_content_length_is_malformed() {
        let request_str =
            "POST / HTTP/1.1\r\nContent-Length: 1\r\nContent-Length: 2\r\n\r\nab";

        let result = Request::try_from(request_str.as_bytes(), 0);

        assert!(matches!(result, Err(Exception::MalformedRequest)));
    }

    #[test]
    fn test_signed_content_length_is_malformed() {
        for value in ["+5", "-0", " +1", "5 5", "0x10"] {
            let request_str = format!("POST / HTTP/1.1\r\nContent-Length: {}\r\n\r\nhello", value);
            let result = Request::try_from(request_str.as_bytes(), 0);
            assert!(matches!(result, Err(Exception::MalformedRequest)), "{}", value);
        }
    }

    #[test]
    fn test_content_length_digits_with_padding() {
        let request_str = "POST / HTTP/1.1\r\nContent-Length:  005 \r\n\r\nhello";
        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();
        assert_eq!(request.body(), b"hello");
    }

    /// 验证请求方法的小写兼容性处理
    #[test]
    fn test_lowercase_method() {
        let request_str = "get / HTTP/1.1\r\nHost: localhost:7878\r\n\r\n";

        let request = Request::try_from(request_str.as_bytes(), 0).unwrap();

        assert_eq!(request.method(), "GET");
    }

    /// 非标准方法仍可解析，只是不会匹配到路由
    #[test]
    fn test_custom_method_is_kept() {
        let request = Request::try_from(b"PURGE /cache HTTP/1.1\r\n\r\n", 0).unwrap();
        assert_eq!(request.method(), "PURGE");
    }

    #[test]
    fn test_malformed_request_lines() {
        for raw in [
            "\r\n\r\n",
            "GET\r\n\r\n",
            "GET /\r\n\r\n",
            "GET / HTTP/1.1 extra\r\n\r\n",
            "G3T / HTTP/1.1\r\n\r\n",
        ] {
            let result = Request::try_from(raw.as_bytes(), 0);
            assert!(
                matches!(result, Err(Exception::MalformedRequest)),
                "expected malformed for {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_header_without_colon_is_malformed() {
        let result = Request::try_from(b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n", 0);
        assert!(matches!(result, Err(Exception::MalformedRequest)));
    }

    /// 确保不支持的版本（如 HTTP/2.0）被正确拒绝
    #[test]
    fn test_unsupported_http_version() {
        let result = Request::try_from(b"GET / HTTP/2.0\r\nHost: localhost\r\n\r\n", 0);
        assert!(matches!(result, Err(Exception::UnsupportedHttpVersion)));
    }

    /// 验证 UTF-8 编码检查
    #[test]
    fn test_invalid_utf8() {
        let buffer = [0xFF, 0xFE, 0xFD, b'\r', b'\n', b'\r', b'\n'];
        let result = Request::try_from(&buffer, 0);
        assert!(matches!(result, Err(Exception::RequestIsNotUtf8)));
    }

    #[test]
    fn test_find_header_end_from_offset() {
        let buffer = b"GET / HTTP/1.1\r\nA: b\r\n\r\nbody";
        assert_eq!(find_header_end(buffer, 0), Some(20));
        assert_eq!(find_header_end(buffer, 18), Some(20));
        assert_eq!(find_header_end(buffer, 21), None);
        assert_eq!(find_header_end(buffer, 100), None);
    }
}
