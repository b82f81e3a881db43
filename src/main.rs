//! Restock - 库存补货智能体
//!
//! 用法：
//! ```bash
//! restock [chat]                # 交互式对话（默认），exit / quit 退出
//! restock pipeline              # 运行一次固定流水线并打印终态
//! restock chat --events         # 同时把推理过程事件以 JSON 行输出到 stderr
//! restock pipeline --config path/to/restock.toml
//! ```
//! Ctrl+C 在下一个周期 / 阶段边界取消当前运行。

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use restock::config::{load_config, AppConfig};
use restock::react::{ConversationMemory, ReactEvent};
use restock::{observability, Orchestrator, OrchestratorBuilder, RunOptions, Workflow};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct Args {
    workflow: Workflow,
    config_path: Option<PathBuf>,
    events: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        workflow: Workflow::Agent,
        config_path: None,
        events: false,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "chat" => args.workflow = Workflow::Agent,
            "pipeline" => args.workflow = Workflow::Pipeline,
            "--events" => args.events = true,
            "--config" => {
                let path = iter.next().context("--config requires a path")?;
                args.config_path = Some(PathBuf::from(path));
            }
            other => bail!("unknown argument: {other} (expected chat | pipeline | --config PATH | --events)"),
        }
    }
    Ok(args)
}

fn deadline(cfg: &AppConfig) -> Option<Instant> {
    (cfg.agent.run_timeout_secs > 0)
        .then(|| Instant::now() + Duration::from_secs(cfg.agent.run_timeout_secs))
}

/// 等待 run 结束；期间收到 Ctrl+C 则取消令牌并继续等到边界处返回
async fn run_cancellable<F>(run: F, token: CancellationToken) -> String
where
    F: Future<Output = String>,
{
    tokio::pin!(run);
    tokio::select! {
        out = &mut run => out,
        _ = tokio::signal::ctrl_c() => {
            token.cancel();
            eprintln!("Cancelling at the next step boundary...");
            run.await
        }
    }
}

async fn run_pipeline(orchestrator: &Orchestrator, cfg: &AppConfig) -> anyhow::Result<()> {
    println!("Running inventory pipeline...");
    let token = CancellationToken::new();
    let options = RunOptions {
        cancel_token: Some(token.clone()),
        deadline: deadline(cfg),
        ..RunOptions::default()
    };
    let status =
        run_cancellable(orchestrator.run_with(Workflow::Pipeline, "", options), token).await;
    println!("Final Status: {status}");
    Ok(())
}

async fn run_chat(orchestrator: &Orchestrator, cfg: &AppConfig, events: bool) -> anyhow::Result<()> {
    let agent_name = cfg.app.agent_name.clone();
    let mut memory = ConversationMemory::new(cfg.app.max_history_turns);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("What can I help you with today? (Type 'exit' to exit.)");
    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "exit" | "quit") {
            println!("{agent_name}: Bye!");
            break;
        }

        let token = CancellationToken::new();
        let mut options = RunOptions {
            cancel_token: Some(token.clone()),
            deadline: deadline(cfg),
            history: memory.messages().to_vec(),
            event_tx: None,
        };
        let printer = if events {
            let (tx, rx) = mpsc::unbounded_channel();
            options.event_tx = Some(tx);
            Some(tokio::spawn(print_events(rx)))
        } else {
            None
        };

        let answer =
            run_cancellable(orchestrator.run_with(Workflow::Agent, input, options), token).await;
        if let Some(printer) = printer {
            let _ = printer.await;
        }
        println!("{agent_name}: {answer}");
        memory.push_exchange(input, answer);
    }
    Ok(())
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<ReactEvent>) {
    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(json) => eprintln!("{json}"),
            Err(e) => tracing::warn!(error = %e, "event not serializable"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args = parse_args()?;
    let cfg = load_config(args.config_path.clone()).context("failed to load configuration")?;
    let orchestrator = OrchestratorBuilder::new(cfg.clone())
        .build()
        .context("failed to build orchestrator")?;

    match args.workflow {
        Workflow::Pipeline => run_pipeline(&orchestrator, &cfg).await,
        Workflow::Agent => run_chat(&orchestrator, &cfg, args.events).await,
    }
}
