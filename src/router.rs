//! # REST 路由分发
//!
//! 启动阶段通过显式注册构建路由表，每条 [`Route`] 包含 URI、支持的方法集合、
//! 是否匹配子路径，以及处理函数。一个对象的多个处理函数可以通过 [`RestResource`]
//! 一次性注册。
//!
//! ## 匹配顺序
//! 1. **重定向**：任意重定向器接受该 URI 时直接返回重定向目标，不再匹配路由。
//! 2. **精确匹配**：声明的 URI 与请求完全相同、且支持请求方法的普通路由。
//!    HEAD 请求总能由 GET 路由满足。
//! 3. **子路径匹配**：声明的 URI 等于请求 URI，或是请求 URI 在 `/` 边界上的前缀
//!    （`/foo` 不匹配 `/foobar`）。候选按声明 URI 从长到短尝试，第一条支持请求
//!    方法的胜出。方法不符的较长前缀和第 2 步一样被跳过。
//! 4. URI 被某条路由覆盖但方法不被支持时返回 `MethodNotAllowed`（`Allow` 为所有
//!    覆盖该 URI 的路由的方法并集），否则 `NoMatch`。
//!
//! 相同 URI、相同子路径标志、方法重叠的两条路由在注册时就会被拒绝，因此
//! 第 3 步不会出现长度相同、方法也相同的两条候选。

use log::debug;

use std::{
    cmp::Reverse,
    collections::BTreeSet,
    fmt,
    io,
    sync::Arc,
};

use crate::{
    exception::Exception,
    param::HttpRequestMethod,
    redirect::Redirect,
    request::Request,
    response::RestOutput,
};

/// REST 处理函数：读取请求，写出响应。返回的错误原样传给调用者。
pub type RestHandler =
    Arc<dyn Fn(&Request, &mut dyn RestOutput) -> io::Result<()> + Send + Sync>;

#[derive(Clone)]
pub struct Route {
    uri: String,
    methods: Vec<HttpRequestMethod>,
    scan_children: bool,
    handler: RestHandler,
}

impl Route {
    /// 创建一条只支持 GET 的精确匹配路由
    pub fn new<F>(uri: &str, handler: F) -> Self
    where
        F: Fn(&Request, &mut dyn RestOutput) -> io::Result<()> + Send + Sync + 'static,
    {
        Self {
            uri: uri.to_string(),
            methods: vec![HttpRequestMethod::Get],
            scan_children: false,
            handler: Arc::new(handler),
        }
    }

    /// 替换支持的方法集合。合法值为 GET、POST、PUT、DELETE。
    pub fn methods(mut self, methods: &[HttpRequestMethod]) -> Self {
        let set: BTreeSet<HttpRequestMethod> = methods.iter().copied().collect();
        self.methods = set.into_iter().collect();
        self
    }

    /// 是否同时匹配声明 URI 之下的子路径
    pub fn scan_children(mut self, scan_children: bool) -> Self {
        self.scan_children = scan_children;
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn declared_methods(&self) -> &[HttpRequestMethod] {
        &self.methods
    }

    pub fn scans_children(&self) -> bool {
        self.scan_children
    }

    /// 路由能否响应该方法。HEAD 由 GET 隐式提供。
    pub fn supports(&self, method: HttpRequestMethod) -> bool {
        let method = match method {
            HttpRequestMethod::Head => HttpRequestMethod::Get,
            m => m,
        };
        self.methods.contains(&method)
    }

    /// 声明的方法加上隐式的 HEAD，用于 `Allow` 标头
    pub fn allowed_methods(&self) -> impl Iterator<Item = HttpRequestMethod> + '_ {
        let head = self
            .supports(HttpRequestMethod::Head)
            .then_some(HttpRequestMethod::Head);
        self.methods.iter().copied().chain(head)
    }

    /// 路由的 URI 部分是否覆盖请求路径（不考虑方法）
    pub fn covers(&self, path: &str) -> bool {
        if self.uri == path {
            return true;
        }
        if !self.scan_children {
            return false;
        }
        match path.strip_prefix(self.uri.as_str()) {
            Some(rest) => self.uri.ends_with('/') || rest.starts_with('/'),
            None => false,
        }
    }

    pub fn invoke(&self, request: &Request, out: &mut dyn RestOutput) -> io::Result<()> {
        (self.handler)(request, out)
    }

    fn validate(&self) -> Result<(), Exception> {
        if self.methods.is_empty() {
            return Err(Exception::NoMethods(self.uri.clone()));
        }
        for method in &self.methods {
            match method {
                HttpRequestMethod::Head => return Err(Exception::HeadDeclared(self.uri.clone())),
                m if !m.is_declarable() => {
                    return Err(Exception::UndeclarableMethod {
                        uri: self.uri.clone(),
                        method: *m,
                    })
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn conflicts_with(&self, other: &Route) -> Option<HttpRequestMethod> {
        if self.uri != other.uri || self.scan_children != other.scan_children {
            return None;
        }
        self.methods
            .iter()
            .find(|m| other.methods.contains(m))
            .copied()
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
            && self.methods == other.methods
            && self.scan_children == other.scan_children
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("uri", &self.uri)
            .field("methods", &self.methods)
            .field("scan_children", &self.scan_children)
            .finish()
    }
}

/// 一个对象提供的一组 REST 处理函数。
///
/// 实现者通常在每个处理函数中持有 `Arc<Self>` 的克隆，从而共享对象状态。
pub trait RestResource: Send + Sync + 'static {
    fn routes(self: Arc<Self>) -> Vec<Route>;
}

/// 一次分发尝试的结果，且只会是其中一种
#[derive(Debug, PartialEq)]
pub enum DispatchResult<'a> {
    Matched(&'a Route),
    Redirect(String),
    /// URI 已知但方法不受支持，携带允许的方法
    MethodNotAllowed(Vec<HttpRequestMethod>),
    NoMatch,
}

#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    redirects: Vec<Arc<dyn Redirect>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一条路由。声明错误与冲突在这里立即报告。
    pub fn route(&mut self, route: Route) -> Result<(), Exception> {
        route.validate()?;
        if let Some(method) = self.routes.iter().find_map(|r| r.conflicts_with(&route)) {
            return Err(Exception::RouteConflict {
                uri: route.uri.clone(),
                method,
                scan_children: route.scan_children,
            });
        }
        debug!(
            "注册路由：{} {:?} scan_children={}",
            route.uri, route.methods, route.scan_children
        );
        self.routes.push(route);
        Ok(())
    }

    /// 注册一个对象的全部处理函数。任意一条失败时整个对象都不会被注册。
    pub fn register<R: RestResource>(&mut self, resource: Arc<R>) -> Result<(), Exception> {
        let mut staged = Router {
            routes: self.routes.clone(),
            redirects: Vec::new(),
        };
        for route in resource.routes() {
            staged.route(route)?;
        }
        self.routes = staged.routes;
        Ok(())
    }

    pub fn add_redirect(&mut self, redirect: Arc<dyn Redirect>) {
        self.redirects.push(redirect);
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// 为 (方法, 路径) 查找结果。对同一张路由表，同样的输入总是得到同样的结果。
    pub fn dispatch(&self, method: HttpRequestMethod, request_uri: &str) -> DispatchResult<'_> {
        if let Some(redirect) = self.redirects.iter().find(|r| r.can_redirect(request_uri)) {
            return DispatchResult::Redirect(redirect.redirect_target(request_uri));
        }

        let mut allowed = BTreeSet::new();

        for route in self
            .routes
            .iter()
            .filter(|r| !r.scan_children && r.uri == request_uri)
        {
            if route.supports(method) {
                return DispatchResult::Matched(route);
            }
            allowed.extend(route.allowed_methods());
        }

        let mut subtree: Vec<&Route> = self
            .routes
            .iter()
            .filter(|r| r.scan_children && r.covers(request_uri))
            .collect();
        // 同一请求的两个等长前缀必然是同一个 URI，注册时已保证方法不重叠
        subtree.sort_by_key(|r| Reverse(r.uri.len()));
        for route in subtree {
            if route.supports(method) {
                return DispatchResult::Matched(route);
            }
            allowed.extend(route.allowed_methods());
        }

        match allowed.is_empty() {
            true => DispatchResult::NoMatch,
            false => DispatchResult::MethodNotAllowed(allowed.into_iter().collect()),
        }
    }

    /// 分发并在匹配时调用处理函数。处理函数的错误原样返回。
    pub fn invoke(
        &self,
        request: &Request,
        out: &mut dyn RestOutput,
    ) -> io::Result<DispatchResult<'_>> {
        let result = self.dispatch(request.method(), request.path());
        if let DispatchResult::Matched(route) = &result {
            route.invoke(request, out)?;
        }
        Ok(result)
    }
}
