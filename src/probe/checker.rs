//! HTTP探测执行器
//!
//! 对一个 [`ProbeConfig`] 执行一次带超时的HTTP检测，所有异常都转换为失败结果

use crate::error::{ProbeFailure, Result};
use crate::probe::config::ProbeConfig;
use crate::probe::policy::ProbeMethod;
use crate::probe::result::ProbeResult;
use async_trait::async_trait;
use reqwest::{redirect, Client, Method};
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// 探测执行器trait
#[async_trait]
pub trait Probe: Send + Sync {
    /// 执行一次探测
    ///
    /// 不返回错误：超时、连接失败和非预期状态码都体现在结果中。
    ///
    /// # 参数
    /// * `config` - 探针配置
    ///
    /// # 返回
    /// * `ProbeResult` - 探测结果
    async fn check(&self, config: &ProbeConfig) -> ProbeResult;
}

/// HTTP探测执行器
pub struct HttpProbe {
    /// HTTP客户端
    client: Client,
}

impl HttpProbe {
    /// 创建新的HTTP探测执行器
    ///
    /// 不跟随重定向，3xx 响应本身即视为成功。
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(format!("{}/{}", crate::APP_NAME, crate::VERSION))
            .build()?;

        Ok(Self { client })
    }

    /// 判断状态码是否表示成功
    fn is_success_status(status_code: u16) -> bool {
        (200..400).contains(&status_code)
    }

    /// 构建HTTP请求
    fn build_request(&self, config: &ProbeConfig) -> reqwest::RequestBuilder {
        let method = match config.method() {
            ProbeMethod::Get => Method::GET,
            ProbeMethod::Head => Method::HEAD,
        };

        let mut request = self.client.request(method, config.url());
        for (key, value) in config.headers() {
            request = request.header(key, value);
        }
        request
    }

    /// 将请求错误归类为探测失败原因
    fn classify_error(error: &reqwest::Error) -> ProbeFailure {
        if error.is_timeout() {
            return ProbeFailure::Timeout;
        }
        if let Some(status) = error.status() {
            return ProbeFailure::UnexpectedStatus(status.as_u16());
        }

        let error_str = format!("{error:?}").to_lowercase();
        if error.is_connect() {
            if error_str.contains("dns") || error_str.contains("resolve") {
                ProbeFailure::Connection("DNS resolution failed".to_string())
            } else if error_str.contains("certificate") || error_str.contains("tls") {
                ProbeFailure::Connection("SSL/TLS certificate error".to_string())
            } else {
                ProbeFailure::Connection("Connection refused".to_string())
            }
        } else if error.is_request() {
            ProbeFailure::Connection("Invalid request".to_string())
        } else {
            ProbeFailure::Connection(format!("Request failed: {error}"))
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn check(&self, config: &ProbeConfig) -> ProbeResult {
        let start_time = Instant::now();
        let request = self.build_request(config);

        let response_result = timeout(config.timeout(), request.send()).await;
        let response_time: Duration = start_time.elapsed();

        match response_result {
            Ok(Ok(response)) => {
                let status_code = response.status().as_u16();
                let result = if Self::is_success_status(status_code) {
                    ProbeResult::success(response_time)
                } else {
                    ProbeResult::failure(ProbeFailure::UnexpectedStatus(status_code), response_time)
                };
                result.with_status_code(status_code)
            }
            Ok(Err(e)) => ProbeResult::failure(Self::classify_error(&e), response_time),
            Err(_) => ProbeResult::failure(ProbeFailure::Timeout, response_time),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::config::{ProbeTarget, Scheme};
    use crate::probe::policy::{ProbeDefaults, ServerKind};
    use std::collections::BTreeMap;

    fn config_for(port: u16, path: &str, method: ProbeMethod) -> ProbeConfig {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer test-token".to_string());
        let defaults = ProbeDefaults {
            timeout_seconds: 1,
            period_seconds: 2,
            method,
            ..ServerKind::ExecAgent.builtin_policy().defaults
        };

        ProbeConfig::new(
            ProbeTarget {
                scheme: Scheme::Http,
                host: "127.0.0.1".to_string(),
                port,
                path: path.to_string(),
            },
            headers,
            &defaults,
        )
        .unwrap()
    }

    fn server_port(server: &mockito::Server) -> u16 {
        server.socket_address().port()
    }

    #[test]
    fn test_success_status_range() {
        assert!(HttpProbe::is_success_status(200));
        assert!(HttpProbe::is_success_status(302));
        assert!(HttpProbe::is_success_status(399));
        assert!(!HttpProbe::is_success_status(199));
        assert!(!HttpProbe::is_success_status(400));
        assert!(!HttpProbe::is_success_status(503));
    }

    #[tokio::test]
    async fn test_check_success_sends_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .create_async()
            .await;

        let probe = HttpProbe::new().unwrap();
        let result = probe
            .check(&config_for(server_port(&server), "/api/", ProbeMethod::Get))
            .await;

        mock.assert_async().await;
        assert!(result.outcome.is_success());
        assert_eq!(result.status_code, Some(200));
    }

    #[tokio::test]
    async fn test_check_redirect_is_success_and_not_followed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("HEAD", "/")
            .with_status(302)
            .with_header("location", "http://127.0.0.1:1/elsewhere")
            .create_async()
            .await;

        let probe = HttpProbe::new().unwrap();
        let result = probe
            .check(&config_for(server_port(&server), "/", ProbeMethod::Head))
            .await;

        mock.assert_async().await;
        assert!(result.outcome.is_success());
        assert_eq!(result.status_code, Some(302));
    }

    #[tokio::test]
    async fn test_check_unexpected_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/")
            .with_status(503)
            .create_async()
            .await;

        let probe = HttpProbe::new().unwrap();
        let result = probe
            .check(&config_for(server_port(&server), "/", ProbeMethod::Get))
            .await;

        assert_eq!(
            result.outcome.failure(),
            Some(&ProbeFailure::UnexpectedStatus(503))
        );
    }

    #[tokio::test]
    async fn test_check_connection_refused() {
        // 先占用端口再释放，得到一个大概率无人监听的端口
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = HttpProbe::new().unwrap();
        let result = probe.check(&config_for(port, "/", ProbeMethod::Get)).await;

        assert!(matches!(
            result.outcome.failure(),
            Some(ProbeFailure::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_check_timeout() {
        // 接受连接但从不响应
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accept_task = tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        let probe = HttpProbe::new().unwrap();
        let result = probe.check(&config_for(port, "/", ProbeMethod::Get)).await;

        assert_eq!(result.outcome.failure(), Some(&ProbeFailure::Timeout));
        assert!(result.response_time >= Duration::from_millis(900));
        accept_task.abort();
    }
}
