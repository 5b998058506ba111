// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 连接接收器（Server）
//!
//! `Server` 持有监听 Socket，在一个专用线程上循环 accept，并把每个连接交给
//! 线程池中的一个工作任务处理。
//!
//! ## 生命周期
//! 1. 构造：绑定监听地址（或接管调用者已经绑定好的监听器），立即启动接收线程。
//! 2. 运行：每个新连接在 accept 时读取*当前*的 soTimeout 作为读写超时，
//!    之后修改 soTimeout 不会影响已经接受的连接。
//! 3. 关闭：`close()` 关闭监听器使 accept 立即返回，等待接收线程结束，
//!    然后每 50ms 轮询一次线程池，直到所有连接自然处理完毕。处理中的连接
//!    不会被强行中断，它们最多被各自的 soTimeout 拖住。

use log::{debug, error, info, warn};
use tokio::{net::TcpListener, sync::watch};

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    config::Config,
    exception::{ConnectionError, Exception},
    handler::{Connection, ConnectionHandler, ConnectionObserver, LoggingObserver},
    param::{DEFAULT_SERVER_NAME, DEFAULT_SO_TIMEOUT_MS, DRAIN_POLL_INTERVAL},
    pool::{panic_message, WorkerPool},
};

/// 监听端点的来源
#[derive(Debug)]
pub enum Endpoint {
    /// 在通配地址上绑定一个临时端口
    Ephemeral,
    /// 绑定到指定地址
    Address(SocketAddr),
    /// 调用者已经绑定好的监听器
    Listener(StdTcpListener),
}

/// 服务器构造参数
pub struct ServerOptions {
    name: String,
    endpoint: Endpoint,
    so_timeout: Duration,
    worker_threads: usize,
    observer: Arc<dyn ConnectionObserver>,
}

impl ServerOptions {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            endpoint: Endpoint::Ephemeral,
            so_timeout: Duration::from_millis(DEFAULT_SO_TIMEOUT_MS),
            worker_threads: 1,
            observer: Arc::new(LoggingObserver),
        }
    }

    /// 按配置文件设置名称、监听地址、soTimeout 与核心线程数
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.name())
            .address(config.socket_addr())
            .so_timeout(config.so_timeout())
            .worker_threads(config.worker_threads())
    }

    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn address(self, address: SocketAddr) -> Self {
        self.endpoint(Endpoint::Address(address))
    }

    pub fn so_timeout(mut self, so_timeout: Duration) -> Self {
        self.so_timeout = so_timeout;
        self
    }

    /// 驱动 accept 的核心线程数；连接任务运行在按需增长的线程上，不受此限制
    pub fn worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observer = observer;
        self
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_NAME)
    }
}

pub struct Server {
    name: String,
    local_addr: SocketAddr,
    so_timeout: Arc<AtomicU64>,
    pool: Arc<WorkerPool>,
    closing: watch::Sender<bool>,
    acceptor: Option<JoinHandle<()>>,
}

impl Server {
    /// 绑定监听端点并立即开始接收连接。绑定失败时返回 `Exception::Bind`。
    pub fn start(
        options: ServerOptions,
        handler: Arc<dyn ConnectionHandler>,
    ) -> Result<Self, Exception> {
        let ServerOptions {
            name,
            endpoint,
            so_timeout,
            worker_threads,
            observer,
        } = options;

        let std_listener = match endpoint {
            Endpoint::Ephemeral => {
                StdTcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
            }
            Endpoint::Address(address) => StdTcpListener::bind(address),
            Endpoint::Listener(listener) => Ok(listener),
        }
        .map_err(Exception::Bind)?;
        std_listener.set_nonblocking(true).map_err(Exception::Bind)?;
        let local_addr = std_listener.local_addr().map_err(Exception::Bind)?;
        info!("[{}]监听地址{}绑定完成", name, local_addr);

        let pool = Arc::new(WorkerPool::new(&name, worker_threads)?);
        let runtime = pool.handle();
        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(std_listener).map_err(Exception::Bind)?
        };

        let so_timeout = Arc::new(AtomicU64::new(to_millis(so_timeout)));
        let (closing, closed) = watch::channel(false);
        let acceptor = Acceptor {
            name: name.clone(),
            listener,
            closed,
            pool: Arc::clone(&pool),
            so_timeout: Arc::clone(&so_timeout),
            handler,
            observer,
        };
        let acceptor = thread::Builder::new()
            .name(name.clone())
            .spawn(move || runtime.block_on(acceptor.run()))
            .map_err(Exception::Runtime)?;

        Ok(Self {
            name,
            local_addr,
            so_timeout,
            pool,
            closing,
            acceptor: Some(acceptor),
        })
    }

    /// 在通配地址的临时端口上启动服务器
    pub fn ephemeral<H>(name: &str, handler: H) -> Result<Self, Exception>
    where
        H: ConnectionHandler + 'static,
    {
        Self::start(ServerOptions::new(name), Arc::new(handler))
    }

    /// 在指定地址上启动服务器
    pub fn bind<H>(name: &str, handler: H, address: SocketAddr) -> Result<Self, Exception>
    where
        H: ConnectionHandler + 'static,
    {
        Self::start(ServerOptions::new(name).address(address), Arc::new(handler))
    }

    /// 接管一个已经绑定好的监听器（例如调用者事先包装过的监听器）
    pub fn from_listener<H>(
        name: &str,
        handler: H,
        listener: StdTcpListener,
    ) -> Result<Self, Exception>
    where
        H: ConnectionHandler + 'static,
    {
        Self::start(
            ServerOptions::new(name).endpoint(Endpoint::Listener(listener)),
            Arc::new(handler),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 实际绑定的端口（临时端口在构造后即可读取）
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn so_timeout(&self) -> Duration {
        Duration::from_millis(self.so_timeout.load(Ordering::SeqCst))
    }

    /// 修改之后接受的连接所使用的读写超时。`Duration::ZERO` 表示不超时。
    pub fn set_so_timeout(&self, so_timeout: Duration) {
        self.so_timeout.store(to_millis(so_timeout), Ordering::SeqCst);
    }

    /// 当前正在处理的连接数
    pub fn active_connections(&self) -> usize {
        self.pool.active_count()
    }

    pub fn is_closed(&self) -> bool {
        self.acceptor.is_none()
    }

    /// 关闭监听器并等待所有连接处理完毕。可以重复调用。
    pub fn close(&mut self) {
        let acceptor = match self.acceptor.take() {
            Some(acceptor) => acceptor,
            None => return,
        };
        info!("[{}]正在关闭服务器", self.name);
        self.closing.send_replace(true);
        if acceptor.join().is_err() {
            error!("[{}]接收线程异常退出", self.name);
        }
        self.pool.shutdown();
        while !self.pool.await_termination(DRAIN_POLL_INTERVAL) {
            debug!(
                "[{}]等待{}个连接处理完毕",
                self.name,
                self.pool.active_count()
            );
        }
        info!("[{}]服务器已关闭", self.name);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.close();
    }
}

/// 毫秒精度存储；不足 1ms 的非零超时向上取整，避免被当作"不超时"
fn to_millis(duration: Duration) -> u64 {
    match duration.as_millis() {
        0 if !duration.is_zero() => 1,
        ms => u64::try_from(ms).unwrap_or(u64::MAX),
    }
}

/// 运行在专用线程上的接收循环
struct Acceptor {
    name: String,
    listener: TcpListener,
    closed: watch::Receiver<bool>,
    pool: Arc<WorkerPool>,
    so_timeout: Arc<AtomicU64>,
    handler: Arc<dyn ConnectionHandler>,
    observer: Arc<dyn ConnectionObserver>,
}

impl Acceptor {
    async fn run(mut self) {
        let mut next_id: u64 = 0;
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.closed.changed() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    debug!("[{}]新的连接：{}", self.name, peer);
                    self.dispatch(next_id, stream);
                    next_id += 1;
                }
                Err(e) => {
                    // 关闭过程中 accept 失败属于正常停机
                    if !*self.closed.borrow() {
                        error!("[{}]服务器意外终止：{}", self.name, e);
                    }
                    break;
                }
            }
        }
        self.pool.shutdown();
        info!("[{}]接收循环结束，共接受{}个连接", self.name, next_id);
    }

    fn dispatch(&self, id: u64, stream: tokio::net::TcpStream) {
        let so_timeout = Duration::from_millis(self.so_timeout.load(Ordering::SeqCst));
        let connection = match stream
            .into_std()
            .and_then(|s| s.set_nonblocking(false).map(|_| s))
            .and_then(|s| Connection::new(id, s, so_timeout))
        {
            Ok(connection) => connection,
            Err(e) => {
                warn!("[{} #{}]无法初始化连接：{}", self.name, id, e);
                return;
            }
        };

        let name = self.name.clone();
        let handler = Arc::clone(&self.handler);
        let observer = Arc::clone(&self.observer);
        let submitted = self
            .pool
            .execute(move || client_job(&name, connection, handler.as_ref(), observer.as_ref()));
        if !submitted {
            debug!("[{} #{}]线程池已关闭，连接被丢弃", self.name, id);
        }
    }
}

/// 处理单个连接：调用处理器、通知观察者、无条件关闭连接
fn client_job(
    name: &str,
    mut connection: Connection,
    handler: &dyn ConnectionHandler,
    observer: &dyn ConnectionObserver,
) {
    debug!(
        "[{} #{} {}]开始处理连接",
        name,
        connection.id(),
        connection.peer_addr()
    );
    let result = match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&mut connection))) {
        Ok(result) => result,
        Err(payload) => Err(ConnectionError::Panicked(panic_message(&payload))),
    };
    observer.connection_closed(name, &connection, &result);
    connection.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;

    fn echo_once(connection: &mut Connection) -> Result<(), ConnectionError> {
        let mut buf = [0u8; 1];
        connection.read_exact(&mut buf)?;
        connection.write_all(&buf)?;
        Ok(())
    }

    #[test]
    fn test_to_millis_rounds_up_sub_millisecond() {
        assert_eq!(to_millis(Duration::ZERO), 0);
        assert_eq!(to_millis(Duration::from_micros(10)), 1);
        assert_eq!(to_millis(Duration::from_secs(10)), 10_000);
    }

    #[test]
    fn test_ephemeral_port_is_connectable() {
        let mut server = Server::ephemeral("UnitServer", echo_once).unwrap();
        assert_ne!(server.port(), 0);

        let mut socket = TcpStream::connect(("127.0.0.1", server.port())).unwrap();
        socket.write_all(&[7]).unwrap();
        let mut buf = [0u8; 1];
        socket.read_exact(&mut buf).unwrap();
        assert_eq!(buf[0], 7);

        server.close();
        assert!(server.is_closed());
    }

    #[test]
    fn test_so_timeout_accessors() {
        let server = Server::ephemeral("UnitServer", echo_once).unwrap();
        assert_eq!(server.so_timeout(), Duration::from_millis(DEFAULT_SO_TIMEOUT_MS));
        server.set_so_timeout(Duration::from_millis(100));
        assert_eq!(server.so_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut server = Server::ephemeral("UnitServer", echo_once).unwrap();
        server.close();
        server.close();
        assert!(server.is_closed());
    }

    #[test]
    fn test_bind_to_used_address_fails() {
        let taken = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let address = taken.local_addr().unwrap();
        let result = Server::bind("UnitServer", echo_once, address);
        assert!(matches!(result, Err(Exception::Bind(_))));
    }
}
