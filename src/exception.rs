// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了服务器在启动、路由注册与请求处理过程中可能出现的各类异常情况。
//!
//! ## 设计意图
//! - **错误分类**：`Exception` 覆盖绑定端口失败、配置错误、路由声明错误以及协议解析错误；
//!   `ConnectionError` 只描述单个连接范围内的失败，永远不会终止接收线程。
//! - **语义映射**：协议解析相关的变体对应特定的 HTTP 状态码，便于前端转换为响应。

use std::{error, fmt, io};

use crate::param::HttpRequestMethod;

/// 服务器启动、路由注册或请求解析过程中发生的异常。
#[derive(Debug)]
pub enum Exception {
    /// 无法绑定监听端口。服务器不可用，由构造函数直接返回给调用者。
    Bind(io::Error),
    /// 无法创建工作线程池所需的运行时。
    Runtime(io::Error),
    /// 配置文件无法读取。
    Config(String),
    /// 路由显式声明了 HEAD。HEAD 总是由 GET 路由隐式提供，显式声明属于编程错误。
    HeadDeclared(String),
    /// 路由没有声明任何方法。
    NoMethods(String),
    /// 路由声明了只能由前端自动处理的方法（如 OPTIONS）。
    UndeclarableMethod {
        uri: String,
        method: HttpRequestMethod,
    },
    /// 两条路由拥有相同的 URI、相同的子路径匹配标志以及重叠的方法。
    /// 对子路径路由而言，这正是两条候选在长度上打平的唯一情形。
    RouteConflict {
        uri: String,
        method: HttpRequestMethod,
        scan_children: bool,
    },
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    RequestIsNotUtf8,
    /// 请求行或标头格式非法。对应 `400 Bad Request`。
    BadRequest,
    /// 客户端使用了服务器不支持的 HTTP 方法。对应 `501 Not Implemented`。
    UnsupportedRequestMethod,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。对应 `505`。
    UnsupportedHttpVersion,
    /// 请求行超过长度上限。对应 `414 URI Too Long`。
    UriTooLong,
    /// `Content-Length` 超过请求体上限。对应 `413 Content Too Large`。
    PayloadTooLarge,
    /// 读取请求时发生的 I/O 错误（包括读超时）。
    Io(io::Error),
}

use Exception::*;

impl fmt::Display for Exception {
    /// 根据错误类型写入人类可读的描述文本。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bind(e) => write!(f, "Couldn't bind listening socket: {}", e),
            Runtime(e) => write!(f, "Couldn't build worker runtime: {}", e),
            Config(msg) => write!(f, "Invalid configuration: {}", msg),
            HeadDeclared(uri) => write!(f, "Route {} declares HEAD explicitly", uri),
            NoMethods(uri) => write!(f, "Route {} declares no method", uri),
            UndeclarableMethod { uri, method } => {
                write!(f, "Route {} can't declare {} explicitly", uri, method)
            }
            RouteConflict {
                uri,
                method,
                scan_children,
            } => write!(
                f,
                "Route {} {} (scan children: {}) is declared twice",
                method, uri, scan_children
            ),
            RequestIsNotUtf8 => write!(f, "Request bytes can't be parsed in UTF-8"),
            BadRequest => write!(f, "Malformed request (400)"),
            UnsupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            UriTooLong => write!(f, "Request line too long (414)"),
            PayloadTooLarge => write!(f, "Request body too large (413)"),
            Io(e) => write!(f, "I/O error while reading request: {}", e),
        }
    }
}

impl error::Error for Exception {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Bind(e) | Runtime(e) | Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Exception {
    fn from(e: io::Error) -> Self {
        Io(e)
    }
}

/// 单个连接处理失败的原因。
///
/// 这类错误只影响当前连接：连接会被关闭并记录日志，其他连接与接收线程不受影响。
#[derive(Debug)]
pub enum ConnectionError {
    /// 读写 Socket 时发生 I/O 错误。
    Io(io::Error),
    /// 对端在 soTimeout 内没有发送数据。
    Timeout,
    /// 连接处理器发生 panic，携带 panic 信息。
    Panicked(String),
    /// 连接处理器报告的其他失败。
    Handler(String),
}

impl ConnectionError {
    /// 判断 I/O 错误是否由 Socket 读写超时引起。
    ///
    /// 不同平台上超时分别表现为 `WouldBlock` 或 `TimedOut`。
    pub fn is_timeout(e: &io::Error) -> bool {
        matches!(
            e.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        )
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::Io(e) => write!(f, "connection I/O failed: {}", e),
            ConnectionError::Timeout => write!(f, "connection timed out"),
            ConnectionError::Panicked(msg) => write!(f, "connection handler panicked: {}", msg),
            ConnectionError::Handler(msg) => write!(f, "connection handler failed: {}", msg),
        }
    }
}

impl error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ConnectionError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        if ConnectionError::is_timeout(&e) {
            ConnectionError::Timeout
        } else {
            ConnectionError::Io(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_io_error_maps_to_timeout() {
        let e = io::Error::new(io::ErrorKind::WouldBlock, "slow peer");
        assert!(matches!(ConnectionError::from(e), ConnectionError::Timeout));

        let e = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(ConnectionError::from(e), ConnectionError::Io(_)));
    }

    #[test]
    fn test_display_mentions_route() {
        let e = Exception::RouteConflict {
            uri: "/a".to_string(),
            method: HttpRequestMethod::Get,
            scan_children: true,
        };
        let text = e.to_string();
        assert!(text.contains("GET /a"));
        assert!(text.contains("scan children: true"));
    }
}
