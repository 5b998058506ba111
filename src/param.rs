// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块定义了 `restserver` 遵循的 HTTP 协议相关常量和数据结构，包括：
//! - 常见的 HTTP 状态码及其原因短语（Reason Phrase）。
//! - 服务器生命周期相关的默认值（Socket 超时、停机轮询间隔）。
//! - HTTP 方法与版本的强类型枚举。

use lazy_static::lazy_static;
use std::{collections::HashMap, fmt, time::Duration};

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "restserver";

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 新连接默认的读写超时（soTimeout），单位毫秒
pub const DEFAULT_SO_TIMEOUT_MS: u64 = 10_000;

/// 停机时轮询工作线程池排空状态的间隔
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 未指定名称时服务器使用的线程名
pub const DEFAULT_SERVER_NAME: &str = "WebServer";

/// 请求头部分（请求行 + 全部标头）允许的最大行数，超出视为畸形请求
pub const MAX_HEADER_LINES: usize = 100;

/// 单行（请求行或标头行，含行尾）允许的最大字节数
pub const MAX_LINE_LEN: usize = 8192;

/// 请求体允许的最大字节数，更大的 `Content-Length` 返回 `413`
pub const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

lazy_static! {
    /// HTTP 状态码与其对应的标准原因短语映射表。
    ///
    /// 参考标准：[RFC 9110: HTTP Semantics](https://www.rfc-editor.org/rfc/rfc9110.html)。
    pub static ref STATUS_CODES: HashMap<u16, &'static str> = {
        let mut map = HashMap::new();
        // 1xx: 信息响应 (Informational)
        map.insert(100, "Continue");
        map.insert(101, "Switching Protocols");

        // 2xx: 成功响应 (Successful)
        map.insert(200, "OK");
        map.insert(201, "Created");
        map.insert(202, "Accepted");
        map.insert(204, "No Content");

        // 3xx: 重定向 (Redirection)
        map.insert(301, "Moved Permanently");
        map.insert(302, "Found");
        map.insert(303, "See Other");
        map.insert(304, "Not Modified");
        map.insert(307, "Temporary Redirect");
        map.insert(308, "Permanent Redirect");

        // 4xx: 客户端错误 (Client Error)
        map.insert(400, "Bad Request");
        map.insert(401, "Unauthorized");
        map.insert(403, "Forbidden");
        map.insert(404, "Not Found");
        map.insert(405, "Method Not Allowed");
        map.insert(408, "Request Timeout");
        map.insert(411, "Length Required");
        map.insert(413, "Content Too Large");
        map.insert(414, "URI Too Long");

        // 5xx: 服务端错误 (Server Error)
        map.insert(500, "Internal Server Error");
        map.insert(501, "Not Implemented");
        map.insert(503, "Service Unavailable");
        map.insert(505, "HTTP Version Not Supported");
        map
    };
}

/// 返回状态码对应的原因短语，未知状态码返回空串。
pub fn reason_phrase(code: u16) -> &'static str {
    STATUS_CODES.get(&code).copied().unwrap_or("")
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HttpVersion {
    /// HTTP/0.9：只有请求行，响应不带状态行和标头
    V0_9,
    /// HTTP/1.0 版本
    V1_0,
    /// HTTP/1.1 版本
    V1_1,
}

impl HttpVersion {
    /// 根据请求行中的主次版本号查找版本，不支持的组合返回 `None`。
    pub fn from_numbers(major: u32, minor: u32) -> Option<Self> {
        match (major, minor) {
            (0, 9) => Some(HttpVersion::V0_9),
            (1, 0) => Some(HttpVersion::V1_0),
            (1, 1) => Some(HttpVersion::V1_1),
            _ => None,
        }
    }
}

/// 标准 HTTP 请求方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpRequestMethod {
    /// 获取资源
    Get,
    /// 获取资源的元数据（不包含响应体），总是由 GET 路由隐式提供
    Head,
    /// 提交数据或执行操作
    Post,
    /// 替换资源
    Put,
    /// 删除资源
    Delete,
    /// 查询服务器支持的选项
    Options,
}

impl HttpRequestMethod {
    /// 解析大写的方法名。方法名大小写敏感（RFC 9110 9.1）。
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "GET" => Some(HttpRequestMethod::Get),
            "HEAD" => Some(HttpRequestMethod::Head),
            "POST" => Some(HttpRequestMethod::Post),
            "PUT" => Some(HttpRequestMethod::Put),
            "DELETE" => Some(HttpRequestMethod::Delete),
            "OPTIONS" => Some(HttpRequestMethod::Options),
            _ => None,
        }
    }

    /// 路由声明中允许出现的方法。HEAD 与 OPTIONS 由前端自动处理，不能声明。
    pub fn is_declarable(&self) -> bool {
        matches!(
            self,
            HttpRequestMethod::Get
                | HttpRequestMethod::Post
                | HttpRequestMethod::Put
                | HttpRequestMethod::Delete
        )
    }
}

impl fmt::Display for HttpVersion {
    /// 将枚举格式化为 HTTP 报文中的版本字符串
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V0_9 => write!(f, "HTTP/0.9"),
            HttpVersion::V1_0 => write!(f, "HTTP/1.0"),
            HttpVersion::V1_1 => write!(f, "HTTP/1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Post => write!(f, "POST"),
            HttpRequestMethod::Put => write!(f, "PUT"),
            HttpRequestMethod::Delete => write!(f, "DELETE"),
            HttpRequestMethod::Options => write!(f, "OPTIONS"),
        }
    }
}
