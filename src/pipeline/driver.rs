// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 调度器 (Loop driver)
//!
//! 会话被移入独立工作线程; 主线程通过零容量通道交付帧:
//! `try_send` 只有在工作线程空闲 (阻塞在 recv) 时才会成功,
//! 所以任何时刻最多只有一个 tick 在执行, 忙碌期间到达的帧直接忽略。

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{select, Receiver, SendTimeoutError, Sender, TrySendError};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::session::Session;
use crate::input::{DecodedFrame, FrameSource};

/// 未设置节流时 pump 的默认轮询间隔
const DEFAULT_PUMP_INTERVAL: Duration = Duration::from_millis(33);

/// 调度统计
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DriverStats {
    pub accepted: u64,
    pub ignored: u64,
    pub completed: u64,
    pub failed: u64,
    pub ticks_per_sec: f64,
}

/// 工作线程侧的帧率统计
struct RateCounter {
    count: u64,
    last: Instant,
}

impl RateCounter {
    fn new() -> Self {
        Self {
            count: 0,
            last: Instant::now(),
        }
    }

    /// 每满一秒返回一次新的速率
    fn tick(&mut self) -> Option<f64> {
        self.count += 1;
        let now = Instant::now();
        if now.duration_since(self.last).as_secs() >= 1 {
            let rate = self.count as f64 / now.duration_since(self.last).as_secs_f64();
            self.count = 0;
            self.last = now;
            Some(rate)
        } else {
            None
        }
    }
}

pub struct LoopDriver {
    tx: Option<Sender<DecodedFrame>>,
    worker: Option<JoinHandle<Session>>,
    min_interval: Option<Duration>,
    last_accepted: Option<Instant>,
    stats: Arc<Mutex<DriverStats>>,
}

impl LoopDriver {
    /// 启动工作线程
    pub fn start(session: Session) -> Result<Self> {
        let min_interval = session
            .config()
            .max_ticks_per_sec
            .filter(|&n| n > 0)
            .map(|n| Duration::from_secs_f64(1.0 / n as f64));

        let (tx, rx) = crossbeam_channel::bounded::<DecodedFrame>(0);
        let stats = Arc::new(Mutex::new(DriverStats::default()));
        let worker_stats = stats.clone();
        let worker = thread::Builder::new()
            .name("capture-worker".to_string())
            .spawn(move || run_worker(session, rx, worker_stats))?;

        info!(
            "🚀 调度器启动 (节流: {})",
            match min_interval {
                Some(d) => format!("{:.0}ms", d.as_secs_f64() * 1000.0),
                None => "关闭".to_string(),
            }
        );

        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
            min_interval,
            last_accepted: None,
            stats,
        })
    }

    /// 请求处理一帧; 工作线程忙碌或未到节流间隔时忽略并返回 `false`
    pub fn schedule(&mut self, frame: DecodedFrame) -> bool {
        if let (Some(min), Some(last)) = (self.min_interval, self.last_accepted) {
            if last.elapsed() < min {
                self.bump(|s| s.ignored += 1);
                return false;
            }
        }
        self.offer(frame)
    }

    /// 等待工作线程空闲后交付, 最长 `timeout`; 不受节流限制
    pub fn schedule_timeout(&mut self, frame: DecodedFrame, timeout: Duration) -> bool {
        let tx = match &self.tx {
            Some(tx) => tx,
            None => return false,
        };
        match tx.send_timeout(frame, timeout) {
            Ok(()) => {
                self.last_accepted = Some(Instant::now());
                self.bump(|s| s.accepted += 1);
                true
            }
            Err(SendTimeoutError::Timeout(_)) => {
                self.bump(|s| s.ignored += 1);
                false
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                warn!("❌ 工作线程已退出, 无法调度");
                false
            }
        }
    }

    fn offer(&mut self, frame: DecodedFrame) -> bool {
        let tx = match &self.tx {
            Some(tx) => tx,
            None => return false,
        };
        match tx.try_send(frame) {
            Ok(()) => {
                self.last_accepted = Some(Instant::now());
                self.bump(|s| s.accepted += 1);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.bump(|s| s.ignored += 1);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("❌ 工作线程已退出, 无法调度");
                false
            }
        }
    }

    /// 无帧回调可用时, 用定时器轮询帧源, 直到 `stop` 收到消息或断开
    pub fn pump<S>(&mut self, source: &mut S, stop: &Receiver<()>)
    where
        S: FrameSource + ?Sized,
    {
        let interval = self.min_interval.unwrap_or(DEFAULT_PUMP_INTERVAL);
        let ticker = crossbeam_channel::tick(interval);
        debug!("⏱️ pump 间隔 {:?}", interval);
        loop {
            select! {
                recv(ticker) -> _ => {
                    // 定时器已经按节流间隔调度, 这里不再重复节流
                    if let Some(frame) = source.current_frame() {
                        self.offer(frame);
                    }
                }
                recv(stop) -> _ => break,
            }
        }
    }

    pub fn stats(&self) -> DriverStats {
        match self.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 关闭通道, 等待当前 tick 完成, 交回会话
    pub fn shutdown(mut self) -> Result<Session> {
        self.tx.take();
        let worker = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("capture worker already joined"))?;
        let session = worker
            .join()
            .map_err(|_| anyhow!("capture worker panicked"))?;
        let stats = self.stats();
        info!(
            "🛑 调度器关闭: 接受 {} | 忽略 {} | 完成 {} | 失败 {}",
            stats.accepted, stats.ignored, stats.completed, stats.failed
        );
        Ok(session)
    }

    fn bump<F: FnOnce(&mut DriverStats)>(&self, f: F) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut *stats);
        }
    }
}

impl Drop for LoopDriver {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(
    mut session: Session,
    rx: Receiver<DecodedFrame>,
    stats: Arc<Mutex<DriverStats>>,
) -> Session {
    info!("🔍 拍摄工作线程启动");
    let mut rate = RateCounter::new();

    for frame in rx.iter() {
        let result = session.tick(&frame);
        let fps = rate.tick();
        if let Ok(mut s) = stats.lock() {
            match &result {
                Ok(_) => s.completed += 1,
                Err(_) => s.failed += 1,
            }
            if let Some(fps) = fps {
                s.ticks_per_sec = fps;
            }
        }
        if let Err(e) = result {
            // 单帧错误只跳过本 tick
            warn!("⚠️ 跳过帧 {} ({}): {}", frame.frame_id, e.kind(), e);
        }
    }

    info!("🔍 拍摄工作线程退出");
    session
}
