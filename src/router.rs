//! # 路由表
//!
//! 按请求方法分组保存有序的路由列表。每个路由模式都是一个正则表达式，注册时自动锚定首尾，
//! 其中的捕获组按位置提取为处理器可见的捕获值，例如 `/events/(\d+)` 匹配 `/events/42` 得到 `"42"`。
//!
//! ## 匹配规则
//! 1. 只在请求方法对应的列表中查找，按注册顺序返回第一个匹配。
//! 2. 该方法下没有任何模式匹配时返回 `NotFound`，即使其他方法下有模式能匹配该路径。
//!    这里不产生 405，所有未匹配的路由统一返回 404。
//!
//! 路由表在服务器启动前构建，运行期间只读，多个工作线程可以无锁并发匹配。

use crate::{auth::Access, exception::Exception, handler::Handler};
use log::{debug, error};
use regex::Regex;
use std::{collections::HashMap, fmt, sync::Arc};

/// 单条路由
pub struct Route {
    method: String,
    pattern: String,
    matcher: Regex,
    access: Access,
    handler: Arc<dyn Handler>,
}

impl Route {
    pub fn method(&self) -> &str {
        &self.method
    }

    /// 注册时提供的原始模式
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("access", &self.access)
            .finish()
    }
}

/// 一次成功匹配的结果
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub captures: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Router {
    routes: HashMap<String, Vec<Route>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条路由到方法对应列表的末尾。
    ///
    /// 方法名不区分大小写；模式不是合法正则表达式时返回 `InvalidRoutePattern`。
    pub fn register_route(
        &mut self,
        method: &str,
        pattern: &str,
        access: Access,
        handler: Arc<dyn Handler>,
    ) -> Result<(), Exception> {
        let method = method.to_uppercase();
        let matcher = match Regex::new(&format!("^(?:{})$", pattern)) {
            Ok(re) => re,
            Err(e) => {
                error!("无法编译路由模式{}：{}", pattern, e);
                return Err(Exception::InvalidRoutePattern(pattern.to_string()));
            }
        };
        debug!("注册路由：{} {} ({:?})", method, pattern, access);
        self.routes.entry(method.clone()).or_default().push(Route {
            method,
            pattern: pattern.to_string(),
            matcher,
            access,
            handler,
        });
        Ok(())
    }

    /// 为 (方法, 路径) 查找第一个匹配的路由，并按位置提取捕获值。
    ///
    /// 未参与匹配的可选捕获组对应空字符串。
    pub fn match_route(&self, method: &str, path: &str) -> Result<RouteMatch<'_>, Exception> {
        let routes = match self.routes.get(method) {
            Some(routes) => routes,
            None => return Err(Exception::NotFound),
        };
        for route in routes {
            if let Some(caps) = route.matcher.captures(path) {
                let captures = caps
                    .iter()
                    .skip(1)
                    .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                    .collect();
                return Ok(RouteMatch { route, captures });
            }
        }
        Err(Exception::NotFound)
    }

    /// 已注册的路由总数
    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
