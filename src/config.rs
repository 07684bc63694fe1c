use crate::{exception::Exception, param::*};
use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::prelude::*;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    port: u16,
    #[serde(default)]
    worker_threads: usize,
    #[serde(default = "default_local")]
    local: bool,
    #[serde(default = "default_read_timeout_secs")]
    read_timeout_secs: u64,
    #[serde(default = "default_max_header_size")]
    max_header_size: usize,
    #[serde(default = "default_max_body_size")]
    max_body_size: usize,
    #[serde(default = "default_backlog")]
    backlog: i32,
    // 令牌 → 身份，供演示用的静态校验器使用
    #[serde(default)]
    tokens: HashMap<String, String>,
}

fn default_local() -> bool {
    true
}

fn default_read_timeout_secs() -> u64 {
    DEFAULT_READ_TIMEOUT_SECS
}

fn default_max_header_size() -> usize {
    DEFAULT_MAX_HEADER_SIZE
}

fn default_max_body_size() -> usize {
    DEFAULT_MAX_BODY_SIZE
}

fn default_backlog() -> i32 {
    DEFAULT_BACKLOG
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            port: 7878,
            worker_threads: num_cpus::get(),
            local: default_local(),
            read_timeout_secs: default_read_timeout_secs(),
            max_header_size: default_max_header_size(),
            max_body_size: default_max_body_size(),
            backlog: default_backlog(),
            tokens: HashMap::new(),
        }
    }

    /// 从 TOML 文件加载配置。
    ///
    /// 文件无法读取时返回 `ConfigLoad`；内容无法解析时记录错误并使用默认配置。
    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let mut file = File::open(filename)
            .map_err(|e| Exception::ConfigLoad(format!("no such file {}: {}", filename, e)))?;
        let mut str_val = String::new();
        file.read_to_string(&mut str_val)
            .map_err(|e| Exception::ConfigLoad(format!("error reading {}: {}", filename, e)))?;

        let mut raw_config: Config = match toml::from_str(&str_val) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置：{}", e);
                Config::new()
            }
        };
        raw_config.normalize();
        Ok(raw_config)
    }

    /// 把 0 之类的“自动”取值替换为实际值
    fn normalize(&mut self) {
        if self.worker_threads == 0 {
            self.worker_threads = num_cpus::get();
        }
        if self.read_timeout_secs == 0 {
            warn!("read_timeout_secs被设置为0，这会让读操作永久阻塞，因此该值将被改为{}。", DEFAULT_READ_TIMEOUT_SECS);
            self.read_timeout_secs = DEFAULT_READ_TIMEOUT_SECS;
        }
        if self.backlog <= 0 {
            warn!("backlog必须为正数，该值将被改为{}。", DEFAULT_BACKLOG);
            self.backlog = DEFAULT_BACKLOG;
        }
    }
}

// --- 构建器，主要供测试和嵌入使用 ---

impl Config {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self.normalize();
        self
    }

    pub fn with_read_timeout_secs(mut self, secs: u64) -> Self {
        self.read_timeout_secs = secs;
        self.normalize();
        self
    }

    pub fn with_max_header_size(mut self, size: usize) -> Self {
        self.max_header_size = size;
        self
    }

    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn max_header_size(&self) -> usize {
        self.max_header_size
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    pub fn backlog(&self) -> i32 {
        self.backlog
    }

    pub fn tokens(&self) -> &HashMap<String, String> {
        &self.tokens
    }

    /// 支持全地址监听 (0.0.0.0) 或本地回环监听 (127.0.0.1)
    pub fn socket_addr(&self) -> SocketAddr {
        let address = match self.local {
            true => Ipv4Addr::new(127, 0, 0, 1),
            false => Ipv4Addr::new(0, 0, 0, 0),
        };
        SocketAddr::new(IpAddr::V4(address), self.port)
    }
}
