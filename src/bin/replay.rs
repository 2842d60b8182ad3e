// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测轨迹回放 - 用录制的检测结果重现拍摄触发序列
///
/// 主程序入口 - 直接运行: cargo run --bin capture-replay -- --trace trace.json
use align_capture_rs::capture::{load_trace, replay, CaptureAutomaton};
use align_capture_rs::SessionConfig;
use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

/// 拍摄轨迹回放程序
#[derive(Parser, Debug)]
#[command(author, version, about = "拍摄触发轨迹回放", long_about = None)]
struct Args {
    /// 会话配置文件 (不存在时写出默认配置)
    #[arg(short, long, default_value = "capture_config.json")]
    config: String,

    /// 检测轨迹 JSON: [{"t_ms": .., "detections": [..]}, ..]
    #[arg(short, long)]
    trace: Option<String>,

    /// 只写出默认配置并退出
    #[arg(long)]
    dump_config: bool,
}

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .try_init();
    let args = Args::parse();

    if args.dump_config {
        SessionConfig::default().save(&args.config);
        return Ok(());
    }

    let trace = match args.trace {
        Some(trace) => trace,
        None => bail!("--trace is required unless --dump-config is given"),
    };

    let config = SessionConfig::load(&args.config);
    config.validate()?;
    config.print_summary();

    let frames = load_trace(&trace)?;
    info!("📦 轨迹: {} ({} 帧)", trace, frames.len());

    let mut automaton = CaptureAutomaton::new(config.capture_plan()?, config.cooldown_ms);
    let mut write_error = None;
    let events = replay(&mut automaton, &frames, |event| {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => write_error = Some(e),
        }
    });
    if let Some(e) = write_error {
        return Err(e).context("failed to serialize fire event");
    }

    let stats = automaton.stats();
    info!(
        "✅ 回放完成: 触发 {}/{} 个目标 {:?}",
        events.len(),
        stats.total_goals,
        stats.completed_goal_ids
    );
    Ok(())
}
