//! The `autoforge` binary.
//!
//! `autoforge up` runs the entire pipeline in one process: the memory and
//! planner HTTP servers, the gateway (HTTP + WebSocket), and every agent
//! service wired onto one shared in-process broker. `autoforge plan`
//! submits a request to a running gateway.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use autoforge_agents::developer::{DeveloperConfig, DeveloperService};
use autoforge_agents::planner::http::build_router as planner_router;
use autoforge_agents::planner::{PlannerConfig, PlannerService};
use autoforge_agents::qa::{QaConfig, QaService};
use autoforge_agents::replanner::ReplannerService;
use autoforge_agents::scm::{MockSourceControl, ScmService};
use autoforge_agents::security::SecurityService;
use autoforge_bus::{Broker, EventBus};
use autoforge_gateway::{
    build_router as gateway_router, consumers as gateway_consumers, GatewayConfig, GatewayState,
};
use autoforge_llm::provider_from_env;
use autoforge_memory::server::{build_router as memory_router, AppState};
use autoforge_memory::MemoryClient;

#[derive(Parser)]
#[command(name = "autoforge", about = "Autonomous multi-agent code-production pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every pipeline service in one process.
    Up {
        /// SQLite path for the memory store; omit for a fully in-memory run.
        #[arg(long)]
        db_path: Option<String>,
        /// Gateway listen port.
        #[arg(long, default_value_t = 8000)]
        gateway_port: u16,
        /// Memory service listen port.
        #[arg(long, default_value_t = 8001)]
        memory_port: u16,
        /// Planner listen port.
        #[arg(long, default_value_t = 8002)]
        planner_port: u16,
    },
    /// Submit a plan request to a running gateway.
    Plan {
        /// Natural-language request.
        prompt: String,
        #[arg(long, default_value = "default")]
        project_name: String,
        #[arg(long, default_value = "")]
        repo_url: String,
        #[arg(long, default_value = "http://127.0.0.1:8000")]
        gateway_url: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    match Cli::parse().command {
        Command::Up {
            db_path,
            gateway_port,
            memory_port,
            planner_port,
        } => up(db_path, gateway_port, memory_port, planner_port).await,
        Command::Plan {
            prompt,
            project_name,
            repo_url,
            gateway_url,
        } => plan(prompt, project_name, repo_url, gateway_url).await,
    }
}

async fn up(db_path: Option<String>, gateway_port: u16, memory_port: u16, planner_port: u16) {
    let broker = Arc::new(Broker::new());
    let bus = Arc::new(EventBus::new(broker));

    // Memory service.
    let memory_state = match &db_path {
        Some(path) => AppState::new(path).expect("failed to open memory database"),
        None => AppState::in_memory().expect("failed to create in-memory store"),
    };
    serve(memory_router(memory_state), memory_port, "memory").await;
    let memory = MemoryClient::new(format!("http://127.0.0.1:{memory_port}"));

    let llm = provider_from_env().expect("failed to initialize LLM provider");

    // Agent services.
    let planner = PlannerService::new(
        Arc::clone(&bus),
        memory.clone(),
        Arc::clone(&llm),
        PlannerConfig::from_env(),
    );
    planner.start().expect("planner failed to start");
    serve(planner_router(Arc::clone(&planner)), planner_port, "planner").await;

    DeveloperService::new(
        Arc::clone(&bus),
        memory.clone(),
        Arc::clone(&llm),
        DeveloperConfig::from_env(),
    )
    .start()
    .expect("developer failed to start");

    QaService::new(
        Arc::clone(&bus),
        memory.clone(),
        Arc::clone(&llm),
        QaConfig::from_env(),
    )
    .start()
    .expect("QA failed to start");

    SecurityService::new(Arc::clone(&bus), memory.clone())
        .start()
        .expect("security failed to start");

    ReplannerService::new(Arc::clone(&bus), memory.clone(), Arc::clone(&llm))
        .start()
        .expect("replanner failed to start");

    ScmService::new(
        Arc::clone(&bus),
        memory.clone(),
        Arc::new(MockSourceControl::new()),
    )
    .start()
    .expect("source-control executor failed to start");

    // Gateway.
    let gateway_config = GatewayConfig {
        planner_url: format!("http://127.0.0.1:{planner_port}"),
        ..GatewayConfig::from_env()
    };
    let gateway_state = GatewayState::new(Arc::clone(&bus), memory, gateway_config);
    gateway_consumers::start(&gateway_state).expect("gateway consumers failed to start");
    serve(gateway_router(gateway_state), gateway_port, "gateway").await;

    tracing::info!(
        gateway_port,
        memory_port,
        planner_port,
        "autoforge pipeline up"
    );

    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl-c");
    tracing::info!("shutting down");
    bus.shutdown();
}

async fn serve(app: axum::Router, port: u16, name: &'static str) {
    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{port}"))
        .await
        .unwrap_or_else(|e| panic!("failed to bind {name} port {port}: {e}"));
    tracing::info!(port, "{name} listening");
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(%err, "{name} server crashed");
        }
    });
}

async fn plan(prompt: String, project_name: String, repo_url: String, gateway_url: String) {
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/plan", gateway_url.trim_end_matches('/')))
        .json(&serde_json::json!({
            "prompt": prompt,
            "project_name": project_name,
            "repo_url": repo_url,
        }))
        .send()
        .await
        .expect("gateway request failed");

    let status = response.status();
    let body: serde_json::Value = response.json().await.expect("invalid gateway response");
    if !status.is_success() {
        eprintln!("plan request failed ({status}): {body}");
        std::process::exit(1);
    }
    println!("{}", serde_json::to_string_pretty(&body).expect("render response"));
}
