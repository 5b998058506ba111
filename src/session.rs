//! # HTTP 前端
//!
//! [`HttpSession`] 是服务器上唯一的连接处理器：在一个连接上循环读取请求，
//! 交给 [`Router`] 分发，并把分发结果转换为 HTTP 响应。
//!
//! | 结果 | 响应 |
//! |------|------|
//! | 匹配到路由 | 由处理函数决定 |
//! | 重定向 | `307` + `Location` |
//! | 没有路由覆盖该 URI | `404` |
//! | URI 已知、方法不支持 | `405` + `Allow` |
//! | 对已知 URI 的 `OPTIONS` | `204` + `Allow` |
//! | 处理函数出错且标头未发送 | `500` 并关闭连接 |
//!
//! 请求解析失败时分别返回 `400`、`501`、`505`，读超时返回 `408`，随后关闭连接。
//! [`WebServer`] 负责在启动前组装路由表，启动后路由表不再变化。

use log::{debug, info, warn};

use std::{
    io::{self, BufReader, Write},
    sync::Arc,
};

use crate::{
    config::Config,
    exception::{ConnectionError, Exception},
    handler::{Connection, ConnectionHandler},
    param::{HttpRequestMethod, HttpVersion},
    redirect::{Redirect, SimpleRedirect},
    request::Request,
    response::{HttpOutput, RestOutput},
    router::{DispatchResult, RestResource, Route, Router},
    server::{Server, ServerOptions},
    util::HtmlBuilder,
};

pub struct HttpSession {
    router: Arc<Router>,
}

impl HttpSession {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// 处理一个请求，返回连接是否可以继续使用
    fn respond(
        &self,
        connection: &mut Connection,
        request: &Request,
    ) -> Result<bool, ConnectionError> {
        let tag = format!("#{}.{} {}", connection.id(), request.id(), connection.peer_addr());
        let method = request.method();
        let mut out = HttpOutput::new(&mut *connection, request.version());
        out.set_keep_alive(request.keep_alive());
        if method == HttpRequestMethod::Head {
            out.deactivate_message_body();
        }

        let result = match self.router.invoke(request, &mut out) {
            Ok(result) => result,
            Err(e) => {
                if !out.reset() {
                    // 标头已经发出，只能断开连接让客户端察觉响应不完整
                    warn!("[{}]处理函数在发送标头后出错：{}", tag, e);
                    return Err(ConnectionError::Handler(e.to_string()));
                }
                warn!("[{}]处理函数出错，返回500：{}", tag, e);
                out.set_keep_alive(false);
                let html = HtmlBuilder::from_status_code(500, None).build();
                write_page(&mut out, 500, &html)?;
                out.finish()?;
                return Ok(false);
            }
        };

        match result {
            DispatchResult::Matched(route) => {
                debug!("[{}]{} {} 匹配路由{}", tag, method, request.path(), route.uri());
            }
            DispatchResult::Redirect(target) => {
                out.set_header("Location", &target)?;
                write_page(&mut out, 307, &HtmlBuilder::redirect(&target).build())?;
            }
            DispatchResult::MethodNotAllowed(allowed) if method == HttpRequestMethod::Options => {
                out.set_status(204)?;
                out.set_header("Allow", &allow_header(&allowed, true))?;
            }
            DispatchResult::MethodNotAllowed(allowed) => {
                out.set_header("Allow", &allow_header(&allowed, false))?;
                let html = HtmlBuilder::from_status_code(405, None).build();
                write_page(&mut out, 405, &html)?;
            }
            DispatchResult::NoMatch => {
                let html = HtmlBuilder::from_status_code(404, None).build();
                write_page(&mut out, 404, &html)?;
            }
        }
        out.finish()?;

        info!(
            "[{}] {}, {}, {}, {}",
            tag,
            request.version(),
            method,
            request.uri(),
            out.status()
        );
        Ok(out.keep_alive())
    }
}

impl ConnectionHandler for HttpSession {
    fn handle(&self, connection: &mut Connection) -> Result<(), ConnectionError> {
        let mut reader = BufReader::new(connection.try_clone_stream()?);
        let mut request_id = 0u64;
        loop {
            let request = match Request::read_from(&mut reader, request_id) {
                Ok(Some(request)) => request,
                Ok(None) => {
                    debug!("#{} 对端关闭了连接", connection.id());
                    return Ok(());
                }
                Err(Exception::Io(e)) if ConnectionError::is_timeout(&e) => {
                    debug!("#{} 读取请求超时，返回408", connection.id());
                    reject(connection, 408);
                    return Ok(());
                }
                Err(Exception::Io(e)) => return Err(e.into()),
                Err(e) => {
                    let code = match e {
                        Exception::UnsupportedRequestMethod => 501,
                        Exception::UnsupportedHttpVersion => 505,
                        Exception::UriTooLong => 414,
                        Exception::PayloadTooLarge => 413,
                        _ => 400,
                    };
                    warn!("#{} 无法解析请求，返回{}：{}", connection.id(), code, e);
                    reject(connection, code);
                    return Ok(());
                }
            };
            request_id += 1;
            if !self.respond(connection, &request)? {
                return Ok(());
            }
        }
    }
}

/// 对无法解析的请求给出错误响应。连接随后关闭，写失败不再上报。
fn reject(connection: &mut Connection, code: u16) {
    let mut out = HttpOutput::new(&mut *connection, HttpVersion::V1_1);
    out.set_keep_alive(false);
    let html = HtmlBuilder::from_status_code(code, None).build();
    let sent = write_page(&mut out, code, &html).and_then(|_| out.finish());
    if let Err(e) = sent {
        debug!("#{} 发送{}响应失败：{}", connection.id(), code, e);
    }
}

fn write_page(out: &mut dyn RestOutput, code: u16, html: &str) -> io::Result<()> {
    out.set_status(code)?;
    out.set_header("Content-Type", "text/html;charset=utf-8")?;
    out.write_all(html.as_bytes())
}

fn allow_header(allowed: &[HttpRequestMethod], with_options: bool) -> String {
    let mut methods: Vec<String> = allowed.iter().map(|m| m.to_string()).collect();
    if with_options {
        methods.push(HttpRequestMethod::Options.to_string());
    }
    methods.join(", ")
}

/// 在启动前组装路由表，然后以 [`HttpSession`] 作为连接处理器启动服务器。
#[derive(Default)]
pub struct WebServer {
    router: Router,
}

impl WebServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 安装配置文件中的重定向表（表为空时不安装）
    pub fn from_config(config: &Config) -> Self {
        let mut server = Self::new();
        let redirect = SimpleRedirect::from_config(config);
        if !redirect.is_empty() {
            info!("已载入{}条重定向规则，前缀：{:?}", redirect.len(), redirect.base());
            server.redirect(Arc::new(redirect));
        }
        server
    }

    pub fn route(&mut self, route: Route) -> Result<&mut Self, Exception> {
        self.router.route(route)?;
        Ok(self)
    }

    pub fn register<R: RestResource>(&mut self, resource: Arc<R>) -> Result<&mut Self, Exception> {
        self.router.register(resource)?;
        Ok(self)
    }

    pub fn redirect(&mut self, redirect: Arc<dyn Redirect>) -> &mut Self {
        self.router.add_redirect(redirect);
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// 冻结路由表并启动服务器
    pub fn start(self, options: ServerOptions) -> Result<Server, Exception> {
        info!("共注册{}条路由", self.router.routes().len());
        let session = HttpSession::new(Arc::new(self.router));
        Server::start(options, Arc::new(session))
    }

    pub fn start_ephemeral(self, name: &str) -> Result<Server, Exception> {
        self.start(ServerOptions::new(name))
    }
}
