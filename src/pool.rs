//! # 工作线程池
//!
//! 一个可复用的弹性线程池：每个任务在独立线程上执行，空闲线程会被复用。
//! 底层借用 Tokio 运行时的阻塞线程池（`spawn_blocking`），运行时由每个服务器实例
//! 自己持有，不存在进程级的全局单例。
//!
//! Tokio 要求阻塞线程数有一个上限，这里是 [`MAX_BLOCKING_THREADS`]（4096）。
//! 同时运行的任务达到这个数量后，新任务会排队，直到有线程空闲下来。
//!
//! 线程池支持两个停机相关的操作：
//! - `shutdown()`：不再接受新任务；
//! - `is_terminated()` / `await_termination()`：查询所有已提交任务是否已经结束。

use log::{debug, warn};
use tokio::runtime::{Builder, Handle, Runtime};

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::{exception::Exception, param::DRAIN_POLL_INTERVAL};

/// 阻塞线程池的上限。超出后任务排队等待空闲线程。
pub const MAX_BLOCKING_THREADS: usize = 4096;

/// 空闲线程保留时长，超时后线程退出
const THREAD_KEEP_ALIVE: Duration = Duration::from_secs(60);

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    name: String,
    runtime: Option<Runtime>,
    accepting: AtomicBool,
    active: Arc<AtomicUsize>,
}

/// 任务结束时（包括 panic 展开）递减活跃计数
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkerPool {
    /// 创建线程池。`core_threads` 是驱动异步 I/O（如 accept）的核心线程数，
    /// 连接任务本身运行在按需增长的阻塞线程上。
    pub fn new(name: &str, core_threads: usize) -> Result<Self, Exception> {
        let thread_name = name.to_string();
        let counter = AtomicUsize::new(0);
        let runtime = Builder::new_multi_thread()
            .worker_threads(core_threads.max(1))
            .max_blocking_threads(MAX_BLOCKING_THREADS)
            .thread_keep_alive(THREAD_KEEP_ALIVE)
            .thread_name_fn(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                format!("{}-worker-{}", thread_name, n)
            })
            .enable_all()
            .build()
            .map_err(Exception::Runtime)?;
        Ok(Self {
            name: name.to_string(),
            runtime: Some(runtime),
            accepting: AtomicBool::new(true),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// 运行时句柄，供接收线程驱动异步的 accept。
    pub fn handle(&self) -> Handle {
        match &self.runtime {
            Some(runtime) => runtime.handle().clone(),
            None => unreachable!("runtime is only taken on drop"),
        }
    }

    /// 提交一个任务。线程池已停止接收任务时返回 `false`，任务被直接丢弃。
    pub fn execute<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        // 先计数再检查，保证 await_termination 不会错过一个正在提交的任务
        self.active.fetch_add(1, Ordering::SeqCst);
        if !self.accepting.load(Ordering::SeqCst) {
            self.active.fetch_sub(1, Ordering::SeqCst);
            debug!("[{}]线程池已关闭，拒绝新任务", self.name);
            return false;
        }
        let guard = ActiveGuard(Arc::clone(&self.active));
        let name = self.name.clone();
        let job: Job = Box::new(job);
        self.handle().spawn_blocking(move || {
            let _guard = guard;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                warn!("[{}]工作任务发生panic：{}", name, panic_message(&payload));
            }
        });
        true
    }

    /// 不再接受新任务。已提交的任务继续执行到自然结束。
    pub fn shutdown(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            debug!("[{}]线程池停止接收新任务", self.name);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        !self.accepting.load(Ordering::SeqCst)
    }

    /// 当前仍在执行的任务数
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// 已经调用过 `shutdown()` 且所有任务都已结束
    pub fn is_terminated(&self) -> bool {
        self.is_shutdown() && self.active_count() == 0
    }

    /// 在 `timeout` 内等待线程池排空，按固定间隔轮询。返回是否已排空。
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_terminated() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            std::thread::sleep(DRAIN_POLL_INTERVAL.min(deadline - now));
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(runtime) = self.runtime.take() {
            // 可能在异步上下文中被丢弃，不能阻塞等待
            runtime.shutdown_background();
        }
    }
}

pub(crate) fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_jobs_run_concurrently() {
        let pool = WorkerPool::new("TestPool", 1).unwrap();
        let (tx, rx) = mpsc::channel();
        let barrier = Arc::new(std::sync::Barrier::new(3));

        // 三个任务必须同时存活才能越过屏障，并发数不受核心线程数限制
        for i in 0..3 {
            let tx = tx.clone();
            let barrier = Arc::clone(&barrier);
            assert!(pool.execute(move || {
                barrier.wait();
                tx.send(i).unwrap();
            }));
        }

        let mut got: Vec<i32> = (0..3)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        got.sort();
        assert_eq!(got, vec![0, 1, 2]);
    }

    #[test]
    fn test_pool_grows_well_past_core_threads() {
        let jobs = 64;
        assert!(jobs < MAX_BLOCKING_THREADS);
        let pool = WorkerPool::new("TestPool", 1).unwrap();
        let barrier = Arc::new(std::sync::Barrier::new(jobs + 1));

        for _ in 0..jobs {
            let barrier = Arc::clone(&barrier);
            assert!(pool.execute(move || {
                barrier.wait();
            }));
        }
        barrier.wait();

        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_shutdown_rejects_new_jobs() {
        let pool = WorkerPool::new("TestPool", 1).unwrap();
        pool.shutdown();
        assert!(pool.is_shutdown());
        assert!(!pool.execute(|| panic!("must not run")));
        assert!(pool.is_terminated());
    }

    #[test]
    fn test_await_termination_waits_for_running_job() {
        let pool = WorkerPool::new("TestPool", 1).unwrap();
        let (tx, rx) = mpsc::channel::<()>();
        pool.execute(move || {
            let _ = rx.recv();
        });
        pool.shutdown();

        assert!(!pool.await_termination(Duration::from_millis(100)));
        assert_eq!(pool.active_count(), 1);

        tx.send(()).unwrap();
        assert!(pool.await_termination(Duration::from_secs(5)));
    }

    #[test]
    fn test_panicking_job_is_contained() {
        let pool = WorkerPool::new("TestPool", 1).unwrap();
        pool.execute(|| panic!("boom"));
        pool.shutdown();
        assert!(pool.await_termination(Duration::from_secs(5)));

        let (tx, rx) = mpsc::channel();
        let pool = WorkerPool::new("TestPool", 1).unwrap();
        pool.execute(|| panic!("boom"));
        pool.execute(move || tx.send(42).unwrap());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static str");
        assert_eq!(panic_message(&payload), "static str");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&payload), "owned");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&payload), "unknown panic");
    }
}
