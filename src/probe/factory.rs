//! 探针配置工厂
//!
//! 根据服务器描述和工作区凭证构建 [`ProbeConfig`]

use crate::error::{ConfigBuildError, TokenError};
use crate::probe::config::{ProbeConfig, ProbeTarget, Scheme, ServerDescriptor};
use crate::probe::policy::{PolicyTable, ProbePolicy, ServerKind};
use crate::token::TokenProvider;
use reqwest::header::HeaderValue;
use reqwest::Url;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// 请求头中携带凭证的字段名
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// 探针配置工厂
pub struct ProbeConfigFactory {
    /// 凭证提供者
    token_provider: Arc<dyn TokenProvider>,
    /// 服务器类型策略表
    policies: PolicyTable,
}

impl ProbeConfigFactory {
    /// 创建新的探针配置工厂
    ///
    /// # 参数
    /// * `token_provider` - 凭证提供者
    /// * `policies` - 服务器类型策略表
    pub fn new(token_provider: Arc<dyn TokenProvider>, policies: PolicyTable) -> Self {
        Self {
            token_provider,
            policies,
        }
    }

    /// 获取某种服务器类型的探测策略
    pub fn policy(&self, kind: ServerKind) -> ProbePolicy {
        self.policies.policy(kind)
    }

    /// 构建探针配置
    ///
    /// URL无效或凭证获取失败时返回错误，调用方不应自动重试。
    ///
    /// # 参数
    /// * `workspace_id` - 工作区ID
    /// * `server` - 服务器描述
    ///
    /// # 返回
    /// * `Result<ProbeConfig, ConfigBuildError>` - 探针配置或构建错误
    pub async fn build(
        &self,
        workspace_id: &str,
        server: &ServerDescriptor,
    ) -> Result<ProbeConfig, ConfigBuildError> {
        let target = parse_target(&server.url)?;

        let token = self.token_provider.get_token(workspace_id).await?;

        let authorization = format!("Bearer {token}");
        if HeaderValue::from_str(&authorization).is_err() {
            return Err(ConfigBuildError::Token(TokenError::Issue(format!(
                "工作区 {workspace_id} 的凭证包含请求头中不允许的字符"
            ))));
        }

        let mut headers = BTreeMap::new();
        headers.insert(AUTHORIZATION_HEADER.to_string(), authorization);

        let policy = self.policy(server.kind);
        let config = ProbeConfig::new(target, headers, &policy.defaults)?;

        debug!(
            "构建探针配置: workspace={}, server={}, kind={}, url={}",
            workspace_id,
            server.id,
            server.kind,
            config.url()
        );

        Ok(config)
    }
}

/// 解析服务器URL为探测目标
fn parse_target(raw_url: &str) -> Result<ProbeTarget, ConfigBuildError> {
    let invalid = |reason: String| ConfigBuildError::InvalidUrl {
        url: raw_url.to_string(),
        reason,
    };

    let url = Url::parse(raw_url).map_err(|e| invalid(e.to_string()))?;

    let scheme = match url.scheme() {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        other => return Err(invalid(format!("不支持的协议: {other}"))),
    };

    let host = match url.host_str() {
        Some(host) if !host.is_empty() => host.to_string(),
        _ => return Err(invalid("缺少主机名".to_string())),
    };

    let port = url.port().unwrap_or_else(|| scheme.default_port());
    if port == 0 {
        return Err(invalid("端口必须在1-65535之间".to_string()));
    }

    Ok(ProbeTarget {
        scheme,
        host,
        port,
        path: normalize_path(url.path()),
    })
}

/// 规范化路径，保证以 `/` 开头并以 `/` 结尾
fn normalize_path(path: &str) -> String {
    let mut normalized = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::policy::ProbeMethod;
    use crate::token::StaticTokenProvider;

    fn factory() -> ProbeConfigFactory {
        let provider = StaticTokenProvider::default().with_token("ws-1", "machine-token");
        ProbeConfigFactory::new(Arc::new(provider), PolicyTable::builtin())
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/api"), "/api/");
        assert_eq!(normalize_path("/api/"), "/api/");
    }

    #[test]
    fn test_parse_target_default_ports() {
        let http = parse_target("http://dev-machine/api").unwrap();
        assert_eq!(http.port, 80);
        assert_eq!(http.path, "/api/");

        let https = parse_target("https://dev-machine").unwrap();
        assert_eq!(https.port, 443);
        assert_eq!(https.path, "/");
    }

    #[test]
    fn test_parse_target_explicit_port_and_query() {
        let target = parse_target("http://10.0.0.5:4401/wsagent/api?token=x#frag").unwrap();
        assert_eq!(target.host, "10.0.0.5");
        assert_eq!(target.port, 4401);
        assert_eq!(target.path, "/wsagent/api/");
    }

    #[test]
    fn test_parse_target_rejects_malformed_urls() {
        for url in ["not a url", "ftp://host/path", "http://host:0/", "localhost:8080"] {
            let result = parse_target(url);
            assert!(
                matches!(result, Err(ConfigBuildError::InvalidUrl { .. })),
                "{url} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_build_attaches_bearer_token() {
        let server = ServerDescriptor::new("wsagent", "http://localhost:4401/api", ServerKind::WsAgent);

        let config = factory().build("ws-1", &server).await.unwrap();

        assert_eq!(config.url(), "http://localhost:4401/api/");
        assert_eq!(
            config.headers().get(AUTHORIZATION_HEADER).map(String::as_str),
            Some("Bearer machine-token")
        );
        assert_eq!(config.failure_threshold(), 3);
        assert_eq!(config.initial_delay_seconds(), 120);
        assert_eq!(config.method(), ProbeMethod::Get);
    }

    #[tokio::test]
    async fn test_build_fails_without_token() {
        let server = ServerDescriptor::new("terminal", "http://localhost:4411/", ServerKind::Terminal);

        let err = factory().build("ws-stopped", &server).await.unwrap_err();

        assert_eq!(
            err,
            ConfigBuildError::Token(TokenError::NotFound {
                workspace_id: "ws-stopped".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_build_rejects_token_not_valid_in_header() {
        let provider = StaticTokenProvider::default()
            .with_token("ws-1", "line-one\nline-two")
            .with_token("ws-2", "bad\u{7f}byte");
        let factory = ProbeConfigFactory::new(Arc::new(provider), PolicyTable::builtin());
        let server = ServerDescriptor::new("exec", "http://localhost:4412/", ServerKind::ExecAgent);

        for workspace_id in ["ws-1", "ws-2"] {
            let err = factory.build(workspace_id, &server).await.unwrap_err();
            assert!(
                matches!(err, ConfigBuildError::Token(TokenError::Issue(_))),
                "{workspace_id}: {err}"
            );
        }
    }

    #[tokio::test]
    async fn test_build_uses_policy_overrides() {
        let provider = StaticTokenProvider::default().with_token("ws-1", "t");
        let factory = ProbeConfigFactory::new(
            Arc::new(provider),
            PolicyTable::builtin().with_ws_agent_success_threshold(4),
        );
        let server = ServerDescriptor::new("wsagent", "https://ide.example.com/", ServerKind::WsAgent);

        let config = factory.build("ws-1", &server).await.unwrap();
        assert_eq!(config.success_threshold(), 4);
        assert_eq!(config.port(), 443);
    }
}
