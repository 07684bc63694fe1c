//! # 请求读取器
//!
//! 从阻塞的字节流（通常是设置了读超时的 `TcpStream`）中增量读取一个完整请求：
//! 先读到 CRLFCRLF 为止的头部，再按 `Content-Length` 读取恰好数量的请求体字节。
//! 所有状态都保存在单次调用的局部变量中，不同连接之间没有共享的可变状态。

use crate::{
    exception::Exception,
    param::*,
    request::{find_header_end, parse_request_line, Request},
};
use bytes::Bytes;
use log::{debug, warn};
use std::io::{self, ErrorKind, Read};

/// 按配置的头部与请求体上限读取请求。
#[derive(Debug, Clone, Copy)]
pub struct RequestParser {
    max_header_size: usize,
    max_body_size: usize,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HEADER_SIZE, DEFAULT_MAX_BODY_SIZE)
    }
}

impl RequestParser {
    pub fn new(max_header_size: usize, max_body_size: usize) -> Self {
        Self {
            max_header_size,
            max_body_size,
        }
    }

    /// 从 `reader` 读取并解析一个请求。
    ///
    /// # 错误
    /// * `HeaderTooLarge` - 头部超过 `max_header_size`。
    /// * `PayloadTooLarge` - 声明的请求体超过 `max_body_size`，此时不会读取任何请求体字节。
    /// * `RequestTimeout` - 已收到完整请求行，但在读超时前没有收齐剩余数据。
    /// * `ConnectionClosed` - 在收到完整请求行之前对端断开或超时。
    /// * `MalformedRequest` 等 - 请求格式错误，或对端在请求体收齐前断开。
    pub fn read_request<R: Read>(&self, reader: &mut R, id: u128) -> Result<Request, Exception> {
        let mut buffer: Vec<u8> = Vec::with_capacity(READ_CHUNK_SIZE);
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut scanned = 0;

        // 1. 读取头部
        let head_end = loop {
            if let Some(pos) = find_header_end(&buffer, scanned) {
                break pos;
            }
            if buffer.len() > self.max_header_size {
                warn!("[ID{}]请求头部超过上限{}字节", id, self.max_header_size);
                return Err(Exception::HeaderTooLarge);
            }
            // 终止符可能跨越两次读取，回退3个字节重新扫描
            scanned = buffer.len().saturating_sub(HEADER_TERMINATOR.len() - 1);
            match read_some(reader, &mut chunk) {
                Ok(0) => {
                    debug!("[ID{}]读取头部时对端关闭连接", id);
                    return Err(incomplete_head_error(&buffer, Exception::MalformedRequest));
                }
                Ok(n) => buffer.extend_from_slice(&chunk[..n]),
                Err(e) if is_timeout(&e) => {
                    debug!("[ID{}]读取头部超时", id);
                    return Err(incomplete_head_error(&buffer, Exception::RequestTimeout));
                }
                Err(e) => {
                    warn!("[ID{}]读取头部失败: {}", id, e);
                    return Err(Exception::ConnectionClosed);
                }
            }
        };

        if head_end + HEADER_TERMINATOR.len() > self.max_header_size {
            warn!("[ID{}]请求头部超过上限{}字节", id, self.max_header_size);
            return Err(Exception::HeaderTooLarge);
        }

        // 2. 解析头部并检查请求体长度
        let head = Request::parse_head(&buffer[..head_end], id)?;
        let content_length = head.content_length()?;
        if content_length > self.max_body_size {
            warn!(
                "[ID{}]请求体声明长度{}超过上限{}",
                id, content_length, self.max_body_size
            );
            return Err(Exception::PayloadTooLarge);
        }

        // 3. 读取请求体：头部之后已读入的字节先计入请求体
        let mut body = buffer.split_off(head_end + HEADER_TERMINATOR.len());
        body.truncate(content_length);
        body.reserve(content_length - body.len());
        while body.len() < content_length {
            let want = (content_length - body.len()).min(chunk.len());
            match read_some(reader, &mut chunk[..want]) {
                Ok(0) => {
                    warn!(
                        "[ID{}]请求体不完整：声明{}字节，仅收到{}字节",
                        id,
                        content_length,
                        body.len()
                    );
                    return Err(Exception::MalformedRequest);
                }
                Ok(n) => body.extend_from_slice(&chunk[..n]),
                Err(e) if is_timeout(&e) => {
                    warn!("[ID{}]读取请求体超时", id);
                    return Err(Exception::RequestTimeout);
                }
                Err(e) => {
                    warn!("[ID{}]读取请求体失败: {}", id, e);
                    return Err(Exception::ConnectionClosed);
                }
            }
        }

        debug!(
            "[ID{}]请求读取完毕：{} {}，请求体{}字节",
            id,
            head.method(),
            head.path(),
            body.len()
        );
        Ok(head.with_body(Bytes::from(body)))
    }
}

/// 读取一次，自动重试被信号中断的调用
fn read_some<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

/// 套接字读超时在不同平台上分别表现为 `WouldBlock` 或 `TimedOut`
fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

/// 头部未收齐时的错误：只有收到了可解析的请求行才值得回应客户端。
fn incomplete_head_error(buffer: &[u8], otherwise: Exception) -> Exception {
    if has_request_line(buffer) {
        otherwise
    } else {
        Exception::ConnectionClosed
    }
}

fn has_request_line(buffer: &[u8]) -> bool {
    let line_end = match buffer.windows(2).position(|w| w == CRLF.as_bytes()) {
        Some(pos) => pos,
        None => return false,
    };
    std::str::from_utf8(&buffer[..line_end])
        .ok()
        .and_then(parse_request_line)
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// 每次 read 只返回一个预设分片的读取器，末尾可以模拟超时
    struct ChunkedReader {
        chunks: Vec<Vec<u8>>,
        timeout_at_end: bool,
    }

    impl ChunkedReader {
        fn new(chunks: &[&[u8]], timeout_at_end: bool) -> Self {
            Self {
                chunks: chunks.iter().rev().map(|c| c.to_vec()).collect(),
                timeout_at_end,
            }
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop() {
                Some(mut chunk) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.chunks.push(chunk.split_off(n));
                    }
                    Ok(n)
                }
                None if self.timeout_at_end => Err(io::Error::new(ErrorKind::WouldBlock, "timeout")),
                None => Ok(0),
            }
        }
    }

    #[test]
    fn test_read_simple_get() {
        let mut reader = Cursor::new(b"GET /events/42 HTTP/1.1\r\nHost: x\r\n\r\n".to_vec());
        let request = RequestParser::default().read_request(&mut reader, 0).unwrap();
        assert_eq!(request.method(), "GET");
        assert_eq!(request.path(), "/events/42");
    }

    /// 头部终止符被拆分在两次读取之间
    #[test]
    fn test_terminator_split_across_reads() {
        let mut reader = ChunkedReader::new(
            &[b"POST /echo HTTP/1.1\r\nContent-Length: 5\r", b"\n\r", b"\nhel", b"lo"],
            false,
        );
        let request = RequestParser::default().read_request(&mut reader, 0).unwrap();
        assert_eq!(request.body(), b"hello");
    }

    #[test]
    fn test_body_read_exactly_content_length() {
        let body = vec![b'x'; 5000];
        let mut raw = format!("POST /echo HTTP/1.1\r\nContent-Length: {}\r\n\r\n", body.len()).into_bytes();
        raw.extend_from_slice(&body);
        raw.extend_from_slice(b"GET /next HTTP/1.1\r\n\r\n");
        let mut reader = Cursor::new(raw);

        let request = RequestParser::default().read_request(&mut reader, 0).unwrap();

        assert_eq!(request.body().len(), 5000);
    }

    #[test]
    fn test_header_too_large() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        raw.extend(std::iter::repeat(b'a').take(300));
        let mut reader = Cursor::new(raw);

        let result = RequestParser::new(128, 1024).read_request(&mut reader, 0);

        assert!(matches!(result, Err(Exception::HeaderTooLarge)));
    }

    /// 终止符恰好落在上限之后也必须拒绝
    #[test]
    fn test_complete_header_over_limit() {
        let raw = b"GET / HTTP/1.1\r\nX-Padding: aaaaaaaaaa\r\n\r\n".to_vec();
        let limit = raw.len() - 1;
        let mut reader = Cursor::new(raw);

        let result = RequestParser::new(limit, 1024).read_request(&mut reader, 0);

        assert!(matches!(result, Err(Exception::HeaderTooLarge)));
    }

    #[test]
    fn test_payload_too_large_reads_no_body() {
        let mut reader = ChunkedReader::new(
            &[b"POST /upload HTTP/1.1\r\nContent-Length: 2048\r\n\r\n"],
            true,
        );

        let result = RequestParser::new(1024, 1024).read_request(&mut reader, 0);

        assert!(matches!(result, Err(Exception::PayloadTooLarge)));
    }

    #[test]
    fn test_body_timeout() {
        let mut reader = ChunkedReader::new(
            &[b"POST /echo HTTP/1.1\r\nContent-Length: 10\r\n\r\n", b"abc"],
            true,
        );

        let result = RequestParser::default().read_request(&mut reader, 0);

        assert!(matches!(result, Err(Exception::RequestTimeout)));
    }

    #[test]
    fn test_header_timeout_after_request_line() {
        let mut reader = ChunkedReader::new(&[b"GET / HTTP/1.1\r\nHost: loc"], true);

        let result = RequestParser::default().read_request(&mut reader, 0);

        assert!(matches!(result, Err(Exception::RequestTimeout)));
    }

    #[test]
    fn test_timeout_before_request_line_is_silent() {
        let mut reader = ChunkedReader::new(&[b"GET / HT"], true);

        let result = RequestParser::default().read_request(&mut reader, 0);

        assert!(matches!(result, Err(Exception::ConnectionClosed)));
    }

    #[test]
    fn test_eof_without_bytes_is_silent() {
        let mut reader = Cursor::new(Vec::new());
        let result = RequestParser::default().read_request(&mut reader, 0);
        assert!(matches!(result, Err(Exception::ConnectionClosed)));
    }

    #[test]
    fn test_eof_during_body_is_malformed() {
        let mut reader = Cursor::new(b"POST /echo HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc".to_vec());
        let result = RequestParser::default().read_request(&mut reader, 0);
        assert!(matches!(result, Err(Exception::MalformedRequest)));
    }

    #[test]
    fn test_invalid_content_length() {
        let mut reader = Cursor::new(b"POST /echo HTTP/1.1\r\nContent-Length: ten\r\n\r\n".to_vec());
        let result = RequestParser::default().read_request(&mut reader, 0);
        assert!(matches!(result, Err(Exception::MalformedRequest)));
    }
}
