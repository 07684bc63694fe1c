//! # 鉴权闸门
//!
//! 受保护的路由要求请求携带 `Authorization: Bearer <token>`，令牌交给外部注入的
//! [`TokenValidator`] 校验。缺少标头、标头格式错误、校验失败，都会在业务处理器执行之前
//! 以 `Unauthorized` 结束请求。

use crate::{exception::Exception, request::Request};
use log::{debug, warn};
use std::{collections::HashMap, fmt, sync::Arc};

#[cfg(test)]
use mockall::automock;

/// 由有效令牌解析出的调用者身份，对服务器核心而言是不透明的。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Principal(String);

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 令牌校验失败的原因，只用于日志。
#[derive(Debug, Clone, PartialEq)]
pub struct AuthError(pub String);

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token rejected: {}", self.0)
    }
}

impl std::error::Error for AuthError {}

/// 外部提供的令牌校验器，例如 JWT 校验或会话表查询。
#[cfg_attr(test, automock)]
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str) -> Result<Principal, AuthError>;
}

/// 路由的访问级别。默认受保护，公开路由需要显式声明。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    Protected,
    Public,
}

/// 基于内存映射表的令牌校验器：令牌 → 身份。
#[derive(Debug, Clone, Default)]
pub struct StaticTokenValidator {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, principal: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), Principal::new(principal));
        self
    }
}

impl FromIterator<(String, String)> for StaticTokenValidator {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            tokens: iter
                .into_iter()
                .map(|(token, id)| (token, Principal::new(id)))
                .collect(),
        }
    }
}

impl TokenValidator for StaticTokenValidator {
    fn validate(&self, token: &str) -> Result<Principal, AuthError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError("unknown token".to_string()))
    }
}

/// 在路由匹配之后、处理器执行之前运行的鉴权检查。
#[derive(Clone, Default)]
pub struct AuthGate {
    validator: Option<Arc<dyn TokenValidator>>,
}

impl AuthGate {
    pub fn new(validator: Arc<dyn TokenValidator>) -> Self {
        Self {
            validator: Some(validator),
        }
    }

    /// 检查请求能否访问指定级别的路由。
    ///
    /// 公开路由直接放行并返回 `None`；受保护路由成功时返回解析出的身份。
    /// 未配置校验器时所有受保护路由都会被拒绝。
    pub fn check(
        &self,
        request: &Request,
        access: Access,
        id: u128,
    ) -> Result<Option<Principal>, Exception> {
        if access == Access::Public {
            return Ok(None);
        }
        let token = match request.header("authorization").and_then(bearer_token) {
            Some(token) => token,
            None => {
                debug!("[ID{}]缺少或无法解析Authorization标头", id);
                return Err(Exception::Unauthorized);
            }
        };
        let validator = match &self.validator {
            Some(v) => v,
            None => {
                warn!("[ID{}]未配置令牌校验器，拒绝访问受保护路由", id);
                return Err(Exception::Unauthorized);
            }
        };
        match validator.validate(token) {
            Ok(principal) => {
                debug!("[ID{}]鉴权通过：{}", id, principal);
                Ok(Some(principal))
            }
            Err(e) => {
                debug!("[ID{}]鉴权失败：{}", id, e);
                Err(Exception::Unauthorized)
            }
        }
    }
}

/// 从 `Authorization` 标头值中提取 Bearer 令牌，方案名大小写不敏感。
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}
