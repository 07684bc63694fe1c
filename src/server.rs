// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 服务器
//!
//! 组合监听器、线程池、请求读取器、路由表、鉴权闸门与响应序列化，提供路由注册与启停接口。
//!
//! ## 生命周期
//! 1. 构造后在启动前注册全部路由；服务器运行期间路由表只读。
//! 2. `start()` 绑定端口、创建线程池并启动接收线程。任何一步失败都不会留下运行中的部分状态。
//! 3. `stop()` 停止接收新连接，等待排队与进行中的请求全部完成后回收所有线程，可重复调用。

use crate::{
    auth::{Access, AuthGate, TokenValidator},
    config::Config,
    connection::{handle_connection, ConnectionContext},
    exception::Exception,
    handler::Handler,
    listener::{self, Listener},
    parser::RequestParser,
    param::HttpRequestMethod,
    pool::ThreadPool,
    router::Router,
};
use log::{error, info, warn};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
};

/// 运行期状态，只在 `start()` 与 `stop()` 之间存在
struct Running {
    pool: Arc<ThreadPool>,
    accept_thread: JoinHandle<()>,
    local_addr: SocketAddr,
}

pub struct HttpServer {
    config: Config,
    router: Arc<Router>,
    auth: Arc<AuthGate>,
    running_flag: Arc<AtomicBool>,
    running: Option<Running>,
}

impl HttpServer {
    /// 创建未配置令牌校验器的服务器，此时所有受保护路由都返回 401
    pub fn new(config: Config) -> Self {
        Self {
            config,
            router: Arc::new(Router::new()),
            auth: Arc::new(AuthGate::default()),
            running_flag: Arc::new(AtomicBool::new(false)),
            running: None,
        }
    }

    /// 注入令牌校验器
    pub fn with_validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.auth = Arc::new(AuthGate::new(validator));
        self
    }

    /// 通用注册接口。服务器运行期间返回 `ServerRunning`。
    pub fn route<H>(
        &mut self,
        method: &str,
        pattern: &str,
        access: Access,
        handler: H,
    ) -> Result<&mut Self, Exception>
    where
        H: Handler + 'static,
    {
        let router = Arc::get_mut(&mut self.router).ok_or(Exception::ServerRunning)?;
        router.register_route(method, pattern, access, Arc::new(handler))?;
        Ok(self)
    }

    /// 注册受保护的路由
    pub fn register_route<H>(
        &mut self,
        method: &str,
        pattern: &str,
        handler: H,
    ) -> Result<&mut Self, Exception>
    where
        H: Handler + 'static,
    {
        self.route(method, pattern, Access::Protected, handler)
    }

    /// 注册公开路由（登录、注册、健康检查等无需令牌的路径）
    pub fn public<H>(
        &mut self,
        method: HttpRequestMethod,
        pattern: &str,
        handler: H,
    ) -> Result<&mut Self, Exception>
    where
        H: Handler + 'static,
    {
        self.route(method.as_str(), pattern, Access::Public, handler)
    }

    pub fn get<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, Exception> {
        self.register_route(HttpRequestMethod::Get.as_str(), pattern, handler)
    }

    pub fn post<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, Exception> {
        self.register_route(HttpRequestMethod::Post.as_str(), pattern, handler)
    }

    pub fn put<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, Exception> {
        self.register_route(HttpRequestMethod::Put.as_str(), pattern, handler)
    }

    pub fn delete<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> Result<&mut Self, Exception> {
        self.register_route(HttpRequestMethod::Delete.as_str(), pattern, handler)
    }

    /// 绑定端口并开始接收连接
    pub fn start(&mut self) -> Result<(), Exception> {
        if self.running.is_some() {
            return Err(Exception::ServerRunning);
        }

        // 先绑定：端口不可用时不创建任何线程
        let listener = Listener::bind(self.config.socket_addr(), self.config.backlog())?;
        let local_addr = listener.local_addr();
        let pool = Arc::new(ThreadPool::new(self.config.worker_threads())?);

        let ctx = Arc::new(ConnectionContext {
            router: Arc::clone(&self.router),
            auth: Arc::clone(&self.auth),
            parser: RequestParser::new(self.config.max_header_size(), self.config.max_body_size()),
            read_timeout: self.config.read_timeout(),
        });

        self.running_flag.store(true, Ordering::SeqCst);
        let accept_thread = listener.spawn_accept_loop(
            Arc::clone(&pool),
            Arc::clone(&self.running_flag),
            move |stream, _addr, id| {
                let ctx = Arc::clone(&ctx);
                Box::new(move || handle_connection(stream, id, &ctx))
            },
        );
        let accept_thread = match accept_thread {
            Ok(handle) => handle,
            Err(e) => {
                self.running_flag.store(false, Ordering::SeqCst);
                pool.stop();
                return Err(e);
            }
        };

        info!(
            "服务器已启动：{}，工作线程数：{}，路由数：{}",
            local_addr,
            pool.size(),
            self.router.len()
        );
        self.running = Some(Running {
            pool,
            accept_thread,
            local_addr,
        });
        Ok(())
    }

    /// 停止接收新连接，排空线程池并回收全部线程。未运行时不做任何事。
    pub fn stop(&mut self) {
        let running = match self.running.take() {
            Some(running) => running,
            None => return,
        };
        info!("服务器开始停机...");
        self.running_flag.store(false, Ordering::SeqCst);
        if let Err(e) = listener::wake(running.local_addr) {
            warn!("无法唤醒接收线程：{}", e);
        }
        if running.accept_thread.join().is_err() {
            error!("接收线程异常退出");
        }
        running.pool.stop();
        info!("服务器已停止");
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// 实际绑定的地址；配置端口为 0 时可以由此获得系统分配的端口
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// (正在执行的任务数, 排队中的任务数)
    pub fn load(&self) -> Option<(usize, usize)> {
        self.running
            .as_ref()
            .map(|r| (r.pool.active_count(), r.pool.queued_count()))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.stop();
    }
}
