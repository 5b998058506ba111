// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求读取模块
//!
//! 从连接的读端逐行读取一个 HTTP 请求，解析为强类型的 `Request` 结构体，供路由和
//! REST 处理函数使用。它涵盖了：
//! 1. 请求行（Request-Line）的解析（方法、URI、可选的版本）。
//! 2. 标头（Headers）的解析，字段名大小写不敏感。
//! 3. 按 `Content-Length` 读取请求体。

use crate::{exception::Exception, param::*};
use lazy_static::lazy_static;
use log::{debug, error};
use regex::Regex;

use std::{
    collections::HashMap,
    io::{self, BufRead, Read},
};

lazy_static! {
    /// 请求行：方法、URI，以及 HTTP/0.9 中可以省略的版本
    static ref REQUEST_LINE: Regex =
        Regex::new(r"^([A-Za-z]+) ([^ ]+)(?: HTTP/(\d+)\.(\d+))?$").unwrap();
    /// 标头行：`字段名: 值`
    static ref HEADER_LINE: Regex = Regex::new(r"^([A-Za-z0-9!#$%&'*+.^_`|~-]+):\s*(.*?)\s*$").unwrap();
}

/// 表示一个完整的 HTTP 请求。
#[derive(Debug, Clone)]
pub struct Request {
    /// 连接内的请求序号，用于日志追踪
    id: u64,
    /// HTTP 请求方法
    method: HttpRequestMethod,
    /// 请求行中的原始 URI（包含查询字符串）
    uri: String,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 标头，字段名统一为小写
    headers: HashMap<String, String>,
    /// 请求体
    body: Vec<u8>,
}

impl Request {
    /// 从连接的读端读取一个请求。
    ///
    /// # 返回值
    /// - `Ok(None)`：对端在发送请求行之前关闭了连接（或只发送了空行）。
    /// - `Ok(Some(request))`：成功读取的请求。
    ///
    /// # 错误处理
    /// 格式不符合 HTTP 规范、使用了不支持的方法或版本时返回相应的 `Exception`；
    /// 读超时以 `Exception::Io` 返回，由调用方转换为 `408`。
    pub fn read_from<R: BufRead>(reader: &mut R, id: u64) -> Result<Option<Self>, Exception> {
        // 1. 读取请求行，跳过请求之间可能残留的空行（RFC 9112 2.2）
        let request_line = loop {
            match read_line(reader, id, Exception::UriTooLong)? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => break line,
            }
        };

        // 2. 解析请求行 (e.g., "GET /index.html HTTP/1.1")
        let captures = match REQUEST_LINE.captures(&request_line) {
            Some(c) => c,
            None => {
                error!("[ID{}]HTTP请求行格式不正确：{}", id, request_line);
                return Err(Exception::BadRequest);
            }
        };
        let method_str = &captures[1];
        let uri = captures[2].to_string();
        let version = match (captures.get(3), captures.get(4)) {
            (Some(major), Some(minor)) => {
                let major = major.as_str().parse().map_err(|_| Exception::BadRequest)?;
                let minor = minor.as_str().parse().map_err(|_| Exception::BadRequest)?;
                match HttpVersion::from_numbers(major, minor) {
                    Some(v) => v,
                    None => {
                        error!("[ID{}]不支持的HTTP协议版本：{}.{}", id, major, minor);
                        return Err(Exception::UnsupportedHttpVersion);
                    }
                }
            }
            _ => HttpVersion::V0_9,
        };
        let method = match HttpRequestMethod::parse(method_str) {
            Some(m) => m,
            None => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, method_str);
                return Err(Exception::UnsupportedRequestMethod);
            }
        };

        // 3. HTTP/0.9 只有 GET，没有标头
        let mut headers = HashMap::new();
        if version == HttpVersion::V0_9 {
            if method != HttpRequestMethod::Get {
                return Err(Exception::BadRequest);
            }
        } else {
            let mut count = 0;
            loop {
                let line = match read_line(reader, id, Exception::BadRequest)? {
                    None => break,
                    Some(line) if line.is_empty() => break,
                    Some(line) => line,
                };
                count += 1;
                if count > MAX_HEADER_LINES {
                    error!("[ID{}]请求标头过多", id);
                    return Err(Exception::BadRequest);
                }
                let header = match HEADER_LINE.captures(&line) {
                    Some(c) => c,
                    None => {
                        error!("[ID{}]无法解析标头：{}", id, line);
                        return Err(Exception::BadRequest);
                    }
                };
                headers.insert(header[1].to_lowercase(), header[2].to_string());
            }
            if version >= HttpVersion::V1_1 && !headers.contains_key("host") {
                error!("[ID{}]HTTP/1.1请求缺少Host标头", id);
                return Err(Exception::BadRequest);
            }
        }

        // 4. 读取请求体
        let body = match headers.get("content-length") {
            Some(len) => {
                let len: u64 = len.parse().map_err(|_| Exception::BadRequest)?;
                if len > MAX_BODY_SIZE as u64 {
                    error!("[ID{}]请求体过大：{} 字节", id, len);
                    return Err(Exception::PayloadTooLarge);
                }
                let mut body = Vec::new();
                reader.by_ref().take(len).read_to_end(&mut body)?;
                if (body.len() as u64) < len {
                    return Err(Exception::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "request body ended early",
                    )));
                }
                body
            }
            None => Vec::new(),
        };

        debug!("[ID{}]成功解析HTTP请求：{} {} {}", id, method, uri, version);
        Ok(Some(Self {
            id,
            method,
            uri,
            version,
            headers,
            body,
        }))
    }

    /// 直接构造请求，便于在没有网络连接时调用 REST 处理函数
    pub fn new(method: HttpRequestMethod, uri: &str) -> Self {
        Self {
            id: 0,
            method,
            uri: uri.to_string(),
            version: HttpVersion::V1_1,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }
}

/// 读取一行，去掉行尾的 CRLF（或单独的 LF）。EOF 返回 `None`。
///
/// 超过 `MAX_LINE_LEN` 的行不再继续读取，返回 `too_long`。
fn read_line<R: BufRead>(
    reader: &mut R,
    id: u64,
    too_long: Exception,
) -> Result<Option<String>, Exception> {
    let mut buf = Vec::new();
    let read = reader
        .by_ref()
        .take(MAX_LINE_LEN as u64 + 1)
        .read_until(b'\n', &mut buf)?;
    if read == 0 {
        return Ok(None);
    }
    if read > MAX_LINE_LEN {
        error!("[ID{}]请求行或标头行过长", id);
        return Err(too_long);
    }
    while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
        buf.pop();
    }
    match String::from_utf8(buf) {
        Ok(line) => Ok(Some(line)),
        Err(_) => {
            error!("[ID{}]无法解析HTTP请求", id);
            Err(Exception::RequestIsNotUtf8)
        }
    }
}

// --- Getter 访问器实现 ---

impl Request {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 获取 HTTP 协议版本
    pub fn version(&self) -> HttpVersion {
        self.version
    }

    /// 获取请求方法
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 获取原始 URI（含查询参数）
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// 获取请求路径（不含查询参数），路由按路径匹配
    pub fn path(&self) -> &str {
        match self.uri.split_once('?') {
            Some((path, _)) => path,
            None => &self.uri,
        }
    }

    /// 获取查询字符串
    pub fn query(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, query)| query)
    }

    /// 按字段名（大小写不敏感）获取标头
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// 本次响应之后连接是否继续保持。
    ///
    /// HTTP/1.1 默认保持，除非客户端发送 `Connection: close`；更早的版本总是关闭。
    pub fn keep_alive(&self) -> bool {
        self.version >= HttpVersion::V1_1
            && !self
                .header("connection")
                .map_or(false, |c| c.eq_ignore_ascii_case("close"))
    }
}
