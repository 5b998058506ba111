//! # 连接处理器契约
//!
//! 接收线程与线程池只负责把已经 accept 的 Socket 交给 [`ConnectionHandler`]，
//! 所有 HTTP 相关的工作（请求解析、路由、写响应）都在处理器里完成。
//!
//! 处理器拿到的是 `&mut Connection`，因此无法自行关闭连接：连接总是在任务结束后
//! 由服务器关闭。处理器返回的错误只影响当前连接。

use log::{debug, warn};

use std::{
    io::{self, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream},
    time::Duration,
};

use crate::exception::ConnectionError;

/// 一个已经接受的连接，由唯一的工作任务独占。
#[derive(Debug)]
pub struct Connection {
    id: u64,
    peer: SocketAddr,
    stream: TcpStream,
}

impl Connection {
    /// 包装一个阻塞模式的 `TcpStream`，并设置读写超时。`Duration::ZERO` 表示不超时。
    pub fn new(id: u64, stream: TcpStream, so_timeout: Duration) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        let timeout = match so_timeout.is_zero() {
            true => None,
            false => Some(so_timeout),
        };
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        Ok(Self { id, peer, stream })
    }

    /// 服务器内单调递增的连接序号
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// 当前生效的读超时，`None` 表示永不超时
    pub fn read_timeout(&self) -> io::Result<Option<Duration>> {
        self.stream.read_timeout()
    }

    /// 复制底层 Socket 句柄，便于分别持有读端和写端
    pub fn try_clone_stream(&self) -> io::Result<TcpStream> {
        self.stream.try_clone()
    }

    /// 关闭连接。只有服务器会调用它；忽略对端已经断开时产生的错误。
    pub(crate) fn close(self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("#{} 关闭连接时出现错误（通常是对端已断开）：{}", self.id, e);
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// 处理一个已经接受的连接。
pub trait ConnectionHandler: Send + Sync {
    fn handle(&self, connection: &mut Connection) -> Result<(), ConnectionError>;
}

impl<F> ConnectionHandler for F
where
    F: Fn(&mut Connection) -> Result<(), ConnectionError> + Send + Sync,
{
    fn handle(&self, connection: &mut Connection) -> Result<(), ConnectionError> {
        self(connection)
    }
}

/// 每个连接结束时得到通知，包括处理结果。
pub trait ConnectionObserver: Send + Sync {
    fn connection_closed(
        &self,
        server: &str,
        connection: &Connection,
        result: &Result<(), ConnectionError>,
    );
}

/// 默认观察者：成功记 debug，失败记 warn。
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl ConnectionObserver for LoggingObserver {
    fn connection_closed(
        &self,
        server: &str,
        connection: &Connection,
        result: &Result<(), ConnectionError>,
    ) {
        match result {
            Ok(()) => debug!(
                "[{} #{} {}]连接处理完成",
                server,
                connection.id(),
                connection.peer_addr()
            ),
            Err(e) => warn!(
                "[{} #{} {}]连接处理失败：{}",
                server,
                connection.id(),
                connection.peer_addr(),
                e
            ),
        }
    }
}
