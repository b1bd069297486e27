//! 进程级 `tracing` 订阅器安装。

use std::sync::OnceLock;

use thiserror::Error;
use tracing::dispatcher;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, fmt};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// 安装订阅器可能出现的错误。
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// [`install`] 被重复调用。
    #[error("broker telemetry is already installed")]
    AlreadyInstalled,
    /// 外部已设置全局订阅器。
    #[error("a global tracing subscriber was set elsewhere")]
    SubscriberAlreadySet,
    /// 设置全局订阅器失败。
    #[error(transparent)]
    SetGlobalSubscriber(#[from] SetGlobalDefaultError),
}

/// 安装 `fmt + EnvFilter` 全局订阅器。
///
/// # 教案式说明
/// - **意图 (Why)**：宿主进程只需调用一次即可看到路由表注册、过滤链拒绝、挂起请求等结构化日志；
/// - **契约 (What)**：日志级别取自 `RUST_LOG`，缺省为 `info`；重复调用返回
///   [`TelemetryError::AlreadyInstalled`]，外部已设置订阅器时返回 [`TelemetryError::SubscriberAlreadySet`]。
pub fn install() -> Result<(), TelemetryError> {
    if INSTALLED.get().is_some() {
        return Err(TelemetryError::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(TelemetryError::SubscriberAlreadySet);
    }

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;
    INSTALLED
        .set(())
        .map_err(|_| TelemetryError::AlreadyInstalled)
}

/// `RUST_LOG` 优先，缺省 `info`。
#[must_use]
pub fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
