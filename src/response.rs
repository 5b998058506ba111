//! # HTTP 响应写出
//!
//! REST 处理函数通过 [`RestOutput`] 写响应：设置状态码与标头，然后像普通的
//! `Write` 一样写入响应体。报文格式由 [`HttpOutput`] 负责：
//!
//! - 处理函数从未调用 `flush()`：响应体完整缓冲，结束时以 `Content-Length` 发送；
//! - 处理函数调用过 `flush()`：立即发送标头，之后的数据以分块传输编码发送
//!   （HTTP/1.0 客户端不支持分块，改为发送完毕后关闭连接）。
//!
//! 标头一旦发送，再修改状态码或标头都会返回错误。HEAD 请求的响应体被丢弃，
//! 但标头（包括 `Content-Length`）保持与 GET 一致。

use bytes::BytesMut;
use chrono::Utc;
use log::debug;

use std::io::{self, Write};

use crate::param::{reason_phrase, HttpVersion, CRLF, SERVER_NAME};

/// REST 处理函数看到的响应写出接口。
pub trait RestOutput: Write {
    /// 当前状态码，默认 200
    fn status(&self) -> u16;

    /// 设置状态码。标头已发送时返回错误。
    fn set_status(&mut self, code: u16) -> io::Result<()>;

    /// 读取已设置的标头（字段名大小写不敏感）
    fn header(&self, name: &str) -> Option<&str>;

    /// 设置标头，覆盖同名的旧值。标头已发送时返回错误。
    fn set_header(&mut self, name: &str, value: &str) -> io::Result<()>;

    fn contains_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }

    /// 标头是否已经发送
    fn is_committed(&self) -> bool;

    /// 结束响应。重复调用无副作用。
    fn close(&mut self) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Buffering,
    Streaming { chunked: bool },
    Finished,
}

pub struct HttpOutput<W: Write> {
    out: W,
    version: HttpVersion,
    status: u16,
    headers: Vec<(String, String)>,
    buffer: BytesMut,
    state: State,
    message_body: bool,
    keep_alive: bool,
}

fn header_sent() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "HTTP header already sent")
}

impl<W: Write> HttpOutput<W> {
    pub fn new(out: W, version: HttpVersion) -> Self {
        Self {
            out,
            version,
            status: 200,
            headers: Vec::new(),
            buffer: BytesMut::new(),
            state: State::Buffering,
            message_body: true,
            keep_alive: version >= HttpVersion::V1_1,
        }
    }

    /// 丢弃响应体，只发送标头。用于以 GET 处理函数响应 HEAD 请求。
    pub fn deactivate_message_body(&mut self) {
        self.message_body = false;
    }

    /// 设置本次响应后是否保持连接。为 `false` 时发送 `Connection: close`。
    pub fn set_keep_alive(&mut self, keep_alive: bool) {
        self.keep_alive = keep_alive && self.version >= HttpVersion::V1_1;
    }

    /// 响应结束后连接是否可以继续使用
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// 标头尚未发送时丢弃已写入的一切（状态码、标头、缓冲的响应体），返回是否成功。
    pub fn reset(&mut self) -> bool {
        if self.state != State::Buffering {
            return false;
        }
        self.status = 200;
        self.headers.clear();
        self.buffer.clear();
        true
    }

    /// 结束响应：未 flush 过的响应以 `Content-Length` 发出，分块响应写出终止块。
    pub fn finish(&mut self) -> io::Result<()> {
        match self.state {
            State::Buffering => {
                if has_body(self.status) {
                    let length = self.buffer.len().to_string();
                    self.put_header("Content-Length", &length);
                }
                self.send_header()?;
                if self.message_body && has_body(self.status) {
                    let body = self.buffer.split();
                    self.out.write_all(&body)?;
                }
            }
            State::Streaming { chunked: true } => {
                if self.message_body {
                    self.out.write_all(b"0\r\n\r\n")?;
                }
            }
            State::Streaming { chunked: false } => {}
            State::Finished => return Ok(()),
        }
        self.state = State::Finished;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn put_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    /// 切换到流式发送：先发标头，再把已缓冲的数据作为第一块发出
    fn start_streaming(&mut self) -> io::Result<()> {
        let chunked = self.version >= HttpVersion::V1_1;
        if chunked {
            self.put_header("Transfer-Encoding", "chunked");
        } else {
            // 没有长度也没有分块，只能靠关闭连接来界定响应体
            self.keep_alive = false;
        }
        self.send_header()?;
        self.state = State::Streaming { chunked };
        let buffered = self.buffer.split();
        self.write_body(&buffered)
    }

    fn write_body(&mut self, data: &[u8]) -> io::Result<()> {
        if !self.message_body || data.is_empty() {
            return Ok(());
        }
        match self.state {
            State::Streaming { chunked: true } => {
                write!(self.out, "{:X}{}", data.len(), CRLF)?;
                self.out.write_all(data)?;
                self.out.write_all(CRLF.as_bytes())
            }
            _ => self.out.write_all(data),
        }
    }

    fn send_header(&mut self) -> io::Result<()> {
        if self.version == HttpVersion::V0_9 {
            return Ok(());
        }
        if !self.contains_header("Date") {
            let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
            self.put_header("Date", &date);
        }
        if !self.contains_header("Server") {
            self.put_header("Server", SERVER_NAME);
        }
        if !self.keep_alive && self.version >= HttpVersion::V1_1 {
            self.put_header("Connection", "close");
        }

        let mut head = format!(
            "{} {} {}{}",
            self.version,
            self.status,
            reason_phrase(self.status),
            CRLF
        );
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}{}", name, value, CRLF));
        }
        head.push_str(CRLF);
        debug!("发送响应标头：{} {}", self.version, self.status);
        self.out.write_all(head.as_bytes())
    }
}

/// 1xx、204、304 响应不允许携带响应体
fn has_body(status: u16) -> bool {
    !(100..200).contains(&status) && status != 204 && status != 304
}

impl<W: Write> Write for HttpOutput<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.state {
            State::Buffering => self.buffer.extend_from_slice(buf),
            State::Streaming { .. } => self.write_body(buf)?,
            State::Finished => {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "HTTP response already finished",
                ))
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.state == State::Buffering {
            self.start_streaming()?;
        }
        self.out.flush()
    }
}

impl<W: Write> RestOutput for HttpOutput<W> {
    fn status(&self) -> u16 {
        self.status
    }

    fn set_status(&mut self, code: u16) -> io::Result<()> {
        if self.state != State::Buffering {
            return Err(header_sent());
        }
        self.status = code;
        Ok(())
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn set_header(&mut self, name: &str, value: &str) -> io::Result<()> {
        if self.state != State::Buffering {
            return Err(header_sent());
        }
        self.put_header(name, value);
        Ok(())
    }

    fn is_committed(&self) -> bool {
        self.state != State::Buffering
    }

    fn close(&mut self) -> io::Result<()> {
        self.finish()
    }
}
