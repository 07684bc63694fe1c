// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 多线程 Web 服务器
//!
//! 该程序基于线程池实现了一个阻塞 I/O 的 HTTP/1.1 服务端，并挂载一组演示用的 API：
//! - `GET  /health`        公开的健康检查
//! - `POST /api/login`     公开的登录接口，用配置中的令牌表换取令牌
//! - `GET  /events/(\d+)`  受保护，返回事件详情
//! - `POST /api/users`     受保护，创建用户（内存存储）
//! - `POST /echo`          受保护，原样返回请求体
//!
//! 启动后在标准输入上提供管理控制台（stop / status / help）。

use threaded_httpd::{
    Config, Context, HandlerError, HttpRequestMethod, HttpServer, Request, Response,
    StaticTokenValidator,
};

use log::{error, info};
use serde_json::{json, Value};

use std::{
    collections::HashMap,
    io::{self, BufRead},
    process,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

/// 演示用的用户仓库。通过构造函数注入处理器，而不是作为全局单例存在。
#[derive(Default)]
struct UserStore {
    next_id: AtomicU64,
    users: Mutex<HashMap<u64, Value>>,
}

impl UserStore {
    fn create(&self, name: &str, owner: &str) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let user = json!({ "id": id, "name": name, "created_by": owner });
        let mut users = self.users.lock().unwrap_or_else(|p| p.into_inner());
        users.insert(id, user.clone());
        user
    }
}

fn main() {
    // 1. 初始化日志系统：log4rs 通过外部 YAML 配置级别与输出目的地
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
        process::exit(1);
    }

    // 2. 环境配置加载：从 TOML 文件读取运行参数
    let config = match Config::from_toml("config/development.toml") {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    info!("配置文件已载入");

    let tokens: StaticTokenValidator = config
        .tokens()
        .iter()
        .map(|(token, id)| (token.clone(), id.clone()))
        .collect();
    let token_table = Arc::new(config.tokens().clone());
    let mut server = HttpServer::new(config).with_validator(Arc::new(tokens));

    // 3. 路由注册
    if let Err(e) = register_routes(&mut server, token_table) {
        error!("路由注册失败：{}", e);
        process::exit(1);
    }

    // 4. 启动：绑定失败属于致命错误
    if let Err(e) = server.start() {
        error!("服务器启动失败：{}", e);
        process::exit(1);
    }

    // 5. 管理控制台，阻塞在主线程上
    run_console(&server);

    server.stop();
}

fn register_routes(
    server: &mut HttpServer,
    token_table: Arc<HashMap<String, String>>,
) -> Result<(), threaded_httpd::Exception> {
    let store = Arc::new(UserStore::default());

    server.public(HttpRequestMethod::Get, "/health", |_: &Request, _: &Context| -> Result<Response, HandlerError> {
        Ok(Response::json(200, &json!({ "status": "ok" })))
    })?;

    // 登录：{"user": "..."} → 该用户在令牌表中的令牌
    server.public(HttpRequestMethod::Post, "/api/login", move |request: &Request, _: &Context| -> Result<Response, HandlerError> {
        let body: Value = match serde_json::from_slice(request.body()) {
            Ok(v) => v,
            Err(_) => return Ok(Response::from_status_code(400)),
        };
        let user = body.get("user").and_then(Value::as_str).unwrap_or("");
        match token_table.iter().find(|(_, id)| id.as_str() == user) {
            Some((token, _)) => Ok(Response::json(200, &json!({ "token": token }))),
            None => Ok(Response::from_status_code(401)),
        }
    })?;

    server.get(r"/events/(\d+)", |_: &Request, ctx: &Context| -> Result<Response, HandlerError> {
        let id: u64 = ctx.capture(0).unwrap_or("0").parse()?;
        let viewer = ctx.principal().map(|p| p.id()).unwrap_or("");
        Ok(Response::json(200, &json!({ "id": id, "viewer": viewer })))
    })?;

    let users = Arc::clone(&store);
    server.post("/api/users", move |request: &Request, ctx: &Context| -> Result<Response, HandlerError> {
        let body: Value = match serde_json::from_slice(request.body()) {
            Ok(v) => v,
            Err(_) => return Ok(Response::from_status_code(400)),
        };
        let name = match body.get("name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => name,
            _ => return Ok(Response::from_status_code(422)),
        };
        let owner = ctx.principal().map(|p| p.id()).unwrap_or("");
        Ok(Response::json(201, &users.create(name, owner)))
    })?;

    server.post("/echo", |request: &Request, _: &Context| -> Result<Response, HandlerError> {
        let mut response = Response::new();
        response
            .set_header("Content-Type", request.header("content-type").unwrap_or("application/octet-stream"))
            .set_body(request.body().to_vec());
        Ok(response)
    })?;

    Ok(())
}

/// 交互式管理控制台：提供运维指令支持，读到 stop 或标准输入关闭时返回
fn run_console(server: &HttpServer) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let input = match line {
            Ok(input) => input,
            Err(_) => break,
        };
        match input.trim() {
            "stop" => {
                println!("停机指令已激活，服务器将在处理完排队中的请求后关闭...");
                return;
            }
            "help" => {
                println!("== threaded-httpd 帮助 ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前服务器运行状态");
                println!("help   - 显示此帮助信息");
                println!("====================");
            }
            "status" => {
                let (active, queued) = server.load().unwrap_or((0, 0));
                println!("== threaded-httpd 状态 ==");
                if let Some(addr) = server.local_addr() {
                    println!("监听地址: {}", addr);
                }
                println!("正在处理的连接数: {}", active);
                println!("排队中的连接数: {}", queued);
                println!("====================");
            }
            "" => {}
            cmd => println!("无效的命令：{}", cmd),
        }
    }
    // 标准输入关闭（例如以守护进程方式运行）时不能退出，否则服务器会立即停机
    info!("标准输入已关闭，控制台停止，服务器继续运行");
    loop {
        std::thread::park();
    }
}
