//! 工作区凭证提供者
//!
//! 探针请求需要携带短期凭证，凭证的签发不属于本模块，这里只定义读取接口

use crate::error::TokenError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// 凭证提供者trait
///
/// 对探测引擎来说是只读的，可能被多个配置构建同时调用。
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// 获取指定工作区的凭证
    ///
    /// # 参数
    /// * `workspace_id` - 工作区ID
    ///
    /// # 返回
    /// * `Result<String, TokenError>` - 凭证或错误
    async fn get_token(&self, workspace_id: &str) -> Result<String, TokenError>;
}

/// 基于配置文件的静态凭证提供者
///
/// 配置热重载时可以整体替换凭证表。
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    /// 工作区ID到凭证的映射
    tokens: RwLock<HashMap<String, String>>,
}

impl StaticTokenProvider {
    /// 创建新的静态凭证提供者
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self {
            tokens: RwLock::new(tokens),
        }
    }

    /// 添加或替换凭证
    pub fn with_token(self, workspace_id: impl Into<String>, token: impl Into<String>) -> Self {
        let mut tokens = self.into_tokens();
        tokens.insert(workspace_id.into(), token.into());
        Self::new(tokens)
    }

    /// 整体替换凭证表
    pub fn replace_tokens(&self, tokens: HashMap<String, String>) {
        match self.tokens.write() {
            Ok(mut guard) => *guard = tokens,
            Err(poisoned) => *poisoned.into_inner() = tokens,
        }
    }

    fn into_tokens(self) -> HashMap<String, String> {
        self.tokens
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self, workspace_id: &str) -> Result<String, TokenError> {
        let tokens = self
            .tokens
            .read()
            .map_err(|_| TokenError::Issue("凭证表锁已损坏".to_string()))?;
        match tokens.get(workspace_id) {
            Some(token) if !token.trim().is_empty() => Ok(token.clone()),
            _ => Err(TokenError::NotFound {
                workspace_id: workspace_id.to_string(),
            }),
        }
    }
}
