//! Demo node: wires an `EsbRuntime`, registers the built-in interceptors and
//! a couple of endpoints, and pushes sample exchanges through the channel.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use esb_core::{
    keys, properties, Exchange, NormalizedMessage, Pattern, ProcessingError, Properties,
    ServiceEndpoint, Value,
};
use esb_runtime::interceptors::{
    EndpointResolutionInterceptor, TransformInterceptor, ValidationInterceptor,
};
use esb_runtime::transport::CompletionOutcome;
use esb_runtime::{EsbRuntime, FilterMode, PlannerConfig, RuntimeConfig, SortingMode};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "esb-runtime", about = "Runs sample exchanges through the ESB interceptor runtime")]
struct Args {
    /// Node identifier used in logs.
    #[arg(long, env = "ESB_NODE_ID", default_value = "esb-node")]
    node_id: String,

    #[arg(long, env = "ESB_FILTER", value_enum, default_value = "hints")]
    filter: FilterMode,

    #[arg(long, env = "ESB_SORTING", value_enum, default_value = "priority")]
    sorting: SortingMode,

    /// Disable hint extraction.
    #[arg(long)]
    no_hints: bool,

    #[arg(long, env = "ESB_PRIORITY_KEY", default_value = keys::PRIORITY)]
    priority_key: String,

    #[arg(long, env = "ESB_TRACKING_CAPACITY", default_value_t = 10_000)]
    tracking_capacity: usize,

    /// Number of sample exchanges per service.
    #[arg(long, default_value_t = 3)]
    exchanges: usize,

    /// Emit logs as JSON.
    #[arg(long, env = "ESB_LOG_JSON")]
    log_json: bool,

    /// Serve Prometheus metrics on this address and keep running until Ctrl-C.
    #[arg(long, env = "ESB_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

impl Args {
    fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            node_id: self.node_id.clone(),
            planner: PlannerConfig {
                hints_enabled: !self.no_hints,
                filter: self.filter,
                sorting: self.sorting,
                priority_key: self.priority_key.clone(),
                ..PlannerConfig::default()
            },
            tracking_capacity: self.tracking_capacity,
            ..RuntimeConfig::default()
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Replies with the upper-cased request.
struct UppercaseEndpoint;

#[async_trait]
impl ServiceEndpoint for UppercaseEndpoint {
    async fn handle(&self, exchange: &mut Exchange) -> Result<(), ProcessingError> {
        let reply = NormalizedMessage::new(exchange.in_message().content.to_uppercase())
            .with_property("status", "ok");
        exchange
            .set_out_message(reply)
            .map_err(|e| ProcessingError::with_source("cannot attach reply", e))
    }
}

/// Rejects every request.
struct RejectingEndpoint;

#[async_trait]
impl ServiceEndpoint for RejectingEndpoint {
    async fn handle(&self, _exchange: &mut Exchange) -> Result<(), ProcessingError> {
        Err(ProcessingError::new("inventory is offline"))
    }
}

fn install(runtime: &EsbRuntime) -> anyhow::Result<()> {
    runtime.register_builtin_interceptors()?;
    runtime.register_interceptor(
        Arc::new(
            EndpointResolutionInterceptor::new()
                .with_endpoint("orders", "orders-v1")
                .with_endpoint("inventory", "inventory-v3"),
        ),
        Properties::new(),
    )?;
    runtime.register_interceptor(
        Arc::new(ValidationInterceptor::new().max_content_bytes(4096)),
        Properties::new(),
    )?;
    runtime.register_interceptor(
        Arc::new(TransformInterceptor::new("trim", |content| Ok(content.trim().to_string()))),
        properties([(keys::SERVICES, Value::from(vec!["orders"]))]),
    )?;

    runtime.register_endpoint("orders", Arc::new(UppercaseEndpoint));
    runtime.register_endpoint("inventory", Arc::new(RejectingEndpoint));
    Ok(())
}

fn sample(service: &str, n: usize) -> Exchange {
    Exchange::new(Pattern::InOut)
        .with_service(service)
        .with_operation("submit")
        .with_in_message(NormalizedMessage::new(format!("  request {n} for {service}  ")))
}

async fn run_samples(runtime: &EsbRuntime, count: usize) -> anyhow::Result<()> {
    for n in 0..count {
        for service in ["orders", "inventory"] {
            let exchange = runtime.channel().send_sync(sample(service, n)).await?;
            tracing::info!(
                exchange_id = %exchange.id(),
                service,
                status = ?exchange.status(),
                reply = exchange.out_message().map(|m| m.content.as_str()),
                fault = exchange.error().map(esb_core::ExchangeFault::message),
                "exchange finished"
            );
        }
    }

    // An empty request fails validation on the consumer leg.
    let rejected = Exchange::new(Pattern::InOut).with_service("orders");
    if let Err(e) = runtime.channel().send_sync(rejected).await {
        tracing::info!(error = %e, "empty request rejected");
    }

    let mut completions = runtime.channel().subscribe_completions();
    let id = runtime.channel().send(sample("orders", count)).await?;
    let completion = completions.recv().await.context("completion stream closed")?;
    match completion.outcome {
        CompletionOutcome::Delivered(exchange) => {
            tracing::info!(exchange_id = %id, status = ?exchange.status(), "asynchronous exchange delivered");
        }
        CompletionOutcome::Failed { message } => {
            tracing::warn!(exchange_id = %id, error = %message, "asynchronous exchange failed");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    if let Some(addr) = args.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        tracing::info!(%addr, "serving metrics");
    }

    let runtime = EsbRuntime::new(args.runtime_config())?;
    install(&runtime)?;
    run_samples(&runtime, args.exchanges).await?;

    for service in runtime.monitoring().services() {
        let counters = runtime.monitoring().counters(&service);
        tracing::info!(
            service = %service,
            consumer_legs = counters.consumer_legs,
            provider_legs = counters.provider_legs,
            faulted_legs = counters.faulted_legs,
            "service summary"
        );
    }
    let exceptions = serde_json::to_string(&runtime.recent_exceptions())?;
    tracing::info!(tracked = runtime.tracking_store().len(), %exceptions, "run complete");

    if args.metrics_addr.is_some() {
        tracing::info!("press Ctrl-C to exit");
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
