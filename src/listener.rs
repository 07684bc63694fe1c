//! # 监听与接收循环
//!
//! `Listener::bind` 依次完成创建套接字、设置地址复用、绑定、监听，任何一步失败都是启动期
//! 致命错误。接收循环运行在独立线程中，把每个新连接交给线程池。
//!
//! 停止时先清除运行标志，再向监听地址发起一次本地连接，把阻塞在 `accept()` 上的线程唤醒；
//! 接收线程看到标志后退出循环并关闭监听套接字。

use crate::{exception::Exception, pool::ThreadPool};
use log::{debug, error, info, warn};
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    io,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    pub fn bind(addr: SocketAddr, backlog: i32) -> Result<Self, Exception> {
        let domain = match addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(|e| {
            error!("无法创建套接字：{}", e);
            Exception::Bind(e)
        })?;
        socket.set_reuse_address(true).map_err(|e| {
            error!("无法设置地址复用：{}", e);
            Exception::Bind(e)
        })?;
        socket.bind(&addr.into()).map_err(|e| {
            error!("无法绑定地址{}：{}", addr, e);
            Exception::Bind(e)
        })?;
        socket.listen(backlog).map_err(|e| {
            error!("无法在{}上监听：{}", addr, e);
            Exception::Listen(e)
        })?;

        let inner: TcpListener = socket.into();
        let local_addr = inner.local_addr().map_err(Exception::Listen)?;
        info!("已在{}上监听，backlog={}", local_addr, backlog);
        Ok(Self { inner, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 启动接收线程。每个连接交给 `on_connection` 生成任务后提交到线程池。
    pub fn spawn_accept_loop<F>(
        self,
        pool: Arc<ThreadPool>,
        running: Arc<AtomicBool>,
        on_connection: F,
    ) -> Result<JoinHandle<()>, Exception>
    where
        F: Fn(TcpStream, SocketAddr, u128) -> Box<dyn FnOnce() + Send + 'static> + Send + 'static,
    {
        thread::Builder::new()
            .name("accept".to_string())
            .spawn(move || self.accept_loop(&pool, &running, on_connection))
            .map_err(Exception::WorkerSpawn)
    }

    fn accept_loop<F>(self, pool: &ThreadPool, running: &AtomicBool, on_connection: F)
    where
        F: Fn(TcpStream, SocketAddr, u128) -> Box<dyn FnOnce() + Send + 'static>,
    {
        let mut id: u128 = 0;
        loop {
            let accepted = self.inner.accept();
            if !running.load(Ordering::SeqCst) {
                info!("接收循环收到停机指令，正在退出...");
                break;
            }
            match accepted {
                Ok((stream, addr)) => {
                    debug!("[ID{}]新的连接：{}", id, addr);
                    // 被拒绝的任务连同其中的 TcpStream 一起析构，连接随之关闭
                    if let Err(e) = pool.submit(on_connection(stream, addr, id)) {
                        warn!("[ID{}]无法提交连接任务，关闭连接：{}", id, e);
                    }
                    id += 1;
                }
                Err(e) => {
                    error!("接收连接失败：{}", e);
                    // 文件描述符耗尽等错误会立即重复出现，稍作等待避免空转
                    thread::sleep(Duration::from_millis(10));
                }
            }
        }
        // self 在此析构，监听套接字关闭
    }
}

/// 唤醒阻塞在 `accept()` 上的接收线程。
///
/// 监听在通配地址上时改为连接对应的回环地址。
pub fn wake(addr: SocketAddr) -> io::Result<()> {
    let target = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    };
    TcpStream::connect_timeout(&target, Duration::from_secs(1)).map(|_| ())
}
