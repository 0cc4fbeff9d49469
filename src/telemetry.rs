//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了日志与链路追踪的初始化。

use crate::config::TelemetryConfig;
use crate::error::{FlashError, Result};
use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// 初始化全局 tracing subscriber
///
/// 日志级别优先取 `RUST_LOG`，否则使用配置中的 `log_filter`。
/// 启用 OpenTelemetry 时额外挂载一个 tracing-opentelemetry 层，
/// tracer provider 不带导出器，由部署方通过全局 provider 替换。
///
/// 应在进程启动时调用一次，重复调用返回错误
pub fn init_tracing(config: &TelemetryConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|e| FlashError::Config(format!("invalid log filter: {}", e)))?;

    let otel = if config.enable_opentelemetry {
        let provider = SdkTracerProvider::builder().build();
        global::set_tracer_provider(provider.clone());
        let tracer = provider.tracer(config.service_name.clone());
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .with(otel);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| FlashError::Config(format!("tracing already initialised: {}", e)))
}
