use num_cpus;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::prelude::*;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use crate::exception::Exception;
use crate::param::{DEFAULT_SERVER_NAME, DEFAULT_SO_TIMEOUT_MS};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_name")]
    name: String,
    port: u16,
    local: bool,
    #[serde(default = "default_so_timeout_ms")]
    so_timeout_ms: u64,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default)]
    redirect: RedirectConfig,
}

/// 重定向表：`base` 前缀下的子路径到目标 URI 的精确映射
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct RedirectConfig {
    #[serde(default)]
    base: String,
    #[serde(default)]
    table: HashMap<String, String>,
}

fn default_name() -> String {
    DEFAULT_SERVER_NAME.to_string()
}

fn default_so_timeout_ms() -> u64 {
    DEFAULT_SO_TIMEOUT_MS
}

impl Config {
    pub fn new() -> Self {
        Self {
            name: default_name(),
            port: 0,
            local: true,
            so_timeout_ms: default_so_timeout_ms(),
            worker_threads: num_cpus::get(),
            redirect: RedirectConfig::default(),
        }
    }

    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let mut file = File::open(filename)
            .map_err(|e| Exception::Config(format!("no such file {}: {}", filename, e)))?;
        let mut str_val = String::new();
        file.read_to_string(&mut str_val)
            .map_err(|e| Exception::Config(format!("error reading {}: {}", filename, e)))?;
        Ok(Self::from_str(&str_val))
    }

    /// 解析 TOML 文本。解析失败时记录错误并退回默认配置。
    pub fn from_str(str_val: &str) -> Self {
        let mut raw_config: Config = match toml::from_str(str_val) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置：{}", e);
                Config::new()
            }
        };
        if raw_config.worker_threads == 0 {
            raw_config.worker_threads = num_cpus::get();
        }
        if raw_config.so_timeout_ms == 0 {
            warn!("so_timeout_ms被设置为0，连接将永不超时，慢速客户端可能阻塞停机。");
        }
        raw_config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local(&self) -> bool {
        self.local
    }

    /// 监听地址：`local` 为真时只监听本地回环，否则监听全部地址
    pub fn socket_addr(&self) -> SocketAddr {
        let address = match self.local {
            true => Ipv4Addr::new(127, 0, 0, 1),
            false => Ipv4Addr::new(0, 0, 0, 0),
        };
        SocketAddr::V4(SocketAddrV4::new(address, self.port))
    }

    pub fn so_timeout(&self) -> Duration {
        Duration::from_millis(self.so_timeout_ms)
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn redirect_base(&self) -> &str {
        &self.redirect.base
    }

    pub fn redirect_table(&self) -> &HashMap<String, String> {
        &self.redirect.table
    }
}
