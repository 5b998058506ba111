// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 嵌入式 REST 服务器演示程序
//!
//! 读取配置、注册几条演示路由并启动服务器，然后在标准输入上提供一个简单的
//! 管理控制台：
//! - `stop`：关闭服务器，等待处理中的连接结束后退出
//! - `status`：查看监听地址、活跃连接数与 soTimeout
//! - `timeout <ms>`：修改之后接受的连接的读写超时
//! - `help`：显示帮助

use restserver::{
    Config, HttpRequestMethod, Request, RestOutput, Route, ServerOptions, WebServer,
};

use log::{error, info, warn};
use serde_json::json;

use std::{
    env,
    io::{self, BufRead, Write},
    process,
    time::{Duration, Instant},
};

const DEFAULT_CONFIG: &str = "config/development.toml";

fn main() {
    // 1. 初始化日志系统，通过外部 YAML 配置级别与输出目的地
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
    }

    // 2. 加载配置：命令行第一个参数，或默认的开发配置
    let path = env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config = match Config::from_toml(&path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{}，使用默认配置", e);
            Config::new()
        }
    };
    info!("配置文件已载入：{}", path);

    // 3. 组装路由表
    let started = Instant::now();
    let mut web = WebServer::from_config(&config);
    let registered = web
        .route(Route::new("/", hello))
        .and_then(|web| web.route(Route::new("/echo", echo).methods(&[HttpRequestMethod::Post])))
        .and_then(|web| web.route(Route::new("/status", move |r, out| status(r, out, started))));
    if let Err(e) = registered {
        error!("路由注册失败：{}", e);
        process::exit(1);
    }

    // 4. 启动服务器
    let mut server = match web.start(ServerOptions::from_config(&config)) {
        Ok(server) => server,
        Err(e) => {
            error!("服务器启动失败：{}", e);
            process::exit(1);
        }
    };
    info!("服务器{}已启动，监听地址：{}", server.name(), server.local_addr());

    // 5. 管理控制台
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let input = match line {
            Ok(input) => input,
            Err(_) => break,
        };
        let mut words = input.split_whitespace();
        match (words.next(), words.next()) {
            (Some("stop"), _) => {
                println!("停机指令已激活，等待处理中的连接结束...");
                break;
            }
            (Some("status"), _) => {
                println!("== {} 状态 ===", server.name());
                println!("监听地址: {}", server.local_addr());
                println!("当前活跃连接数: {}", server.active_connections());
                println!("soTimeout: {}ms", server.so_timeout().as_millis());
                println!("====================");
            }
            (Some("timeout"), Some(ms)) => match ms.parse::<u64>() {
                Ok(ms) => {
                    server.set_so_timeout(Duration::from_millis(ms));
                    println!("新连接的soTimeout已设置为{}ms", ms);
                }
                Err(_) => println!("无效的超时值：{}", ms),
            },
            (Some("help"), _) => {
                println!("== {} Help ==", server.name());
                println!("stop         - 关闭服务器");
                println!("status       - 查看当前服务器运行状态");
                println!("timeout <ms> - 设置新连接的读写超时，0 表示不超时");
                println!("help         - 显示此帮助信息");
                println!("====================");
            }
            (None, _) => {}
            (Some(_), _) => println!("无效的命令：{}", input.trim()),
        }
    }

    server.close();
}

fn hello(_request: &Request, out: &mut dyn RestOutput) -> io::Result<()> {
    out.set_header("Content-Type", "text/plain;charset=utf-8")?;
    out.write_all(b"Hello from restserver\n")
}

fn echo(request: &Request, out: &mut dyn RestOutput) -> io::Result<()> {
    let content_type = request
        .header("content-type")
        .unwrap_or("application/octet-stream")
        .to_string();
    out.set_header("Content-Type", &content_type)?;
    out.write_all(request.body())
}

fn status(request: &Request, out: &mut dyn RestOutput, started: Instant) -> io::Result<()> {
    let body = json!({
        "uptime_ms": started.elapsed().as_millis() as u64,
        "request": {
            "method": request.method().to_string(),
            "uri": request.uri(),
            "version": request.version().to_string(),
        },
    });
    out.set_header("Content-Type", "application/json")?;
    out.write_all(body.to_string().as_bytes())
}
