// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 数字卫兵 (Digital Sentinel) - 客流分析演示
///
/// 系统架构:
/// 1. 模拟线程: 生成合成顾客的逐帧检测框 (独立工作线程)
/// 2. 主线程:   摄像头会话 (跟踪 → 行为分析 → 告警)
///
/// 结束后输出 JSON 会话报告。
use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, Sender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use store_sentinel::config::FrameSize;
use store_sentinel::{gen_time_string, AnalyticsConfig, BBox, CameraSession, Detection};

/// 数字卫兵参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "数字卫兵 - 门店客流分析演示", long_about = None)]
struct Args {
    /// 配置文件 (不存在时自动创建)
    #[arg(short, long, default_value = "analytics_config.json")]
    config: PathBuf,

    /// 摄像头ID
    #[arg(long, default_value = "cam-01")]
    camera: String,

    /// 模拟帧数
    #[arg(short, long, default_value_t = 3600)]
    frames: u64,

    /// 帧率
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// 顾客数量
    #[arg(short, long, default_value_t = 12)]
    shoppers: usize,

    /// 随机种子
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// 将报告保存为 sentinel_report_<时间>.json
    #[arg(long, default_value_t = false)]
    save_report: bool,
}

// ========== 模拟器消息 ==========

/// 模拟帧 (模拟线程 → 主线程)
struct SimFrame {
    frame_number: u64,
    timestamp: f64,
    detections: Vec<Detection>,
}

/// 合成顾客
struct Shopper {
    spawn_frame: u64,
    position: (f64, f64),
    waypoints: Vec<(f64, f64)>,
    next_waypoint: usize,
    speed: f64,        // 像素/帧
    dwell_frames: u64, // 每个途经点的停留帧数
    pause_left: u64,
    carries_bag: bool,
}

impl Shopper {
    fn random(rng: &mut StdRng, spawn_frame: u64, frame: FrameSize) -> Self {
        let (w, h) = (frame.width as f64, frame.height as f64);
        let entry = (w * 0.08, rng.gen_range(h * 0.2..h * 0.6));
        let exit = (w * 0.92, rng.gen_range(h * 0.2..h * 0.6));
        let checkout = (w * 0.5, h * 0.85);
        let persona = rng.gen_range(0..4);
        let mut aisle = || (rng.gen_range(w * 0.35..w * 0.65), rng.gen_range(h * 0.15..h * 0.6));

        let (waypoints, speed, dwell_frames) = match persona {
            // 路过
            0 => (vec![exit], 25.0, 0),
            // 浏览
            1 => (vec![aisle(), aisle(), exit], 6.0, 60),
            // 购买
            2 => (vec![aisle(), checkout, exit], 8.0, 90),
            // 闲置
            _ => (vec![aisle(), exit], 5.0, 2400),
        };

        Self {
            spawn_frame,
            position: entry,
            waypoints,
            next_waypoint: 0,
            speed,
            dwell_frames,
            pause_left: 0,
            carries_bag: rng.gen_bool(0.15),
        }
    }

    fn done(&self) -> bool {
        self.next_waypoint >= self.waypoints.len()
    }

    fn step(&mut self) {
        if self.pause_left > 0 {
            self.pause_left -= 1;
            return;
        }
        let Some(&target) = self.waypoints.get(self.next_waypoint) else {
            return;
        };
        let (dx, dy) = (target.0 - self.position.0, target.1 - self.position.1);
        let dist = (dx * dx + dy * dy).sqrt();
        if dist <= self.speed {
            self.position = target;
            self.next_waypoint += 1;
            self.pause_left = self.dwell_frames;
        } else {
            self.position.0 += dx / dist * self.speed;
            self.position.1 += dy / dist * self.speed;
        }
    }

    fn detections(&self, rng: &mut StdRng) -> Vec<Detection> {
        let (x, y) = (
            self.position.0 + rng.gen_range(-1.5..1.5),
            self.position.1 + rng.gen_range(-1.5..1.5),
        );
        let confidence = rng.gen_range(0.6..0.95);
        let mut dets = vec![Detection::person(x - 30.0, y - 80.0, x + 30.0, y + 80.0, confidence)];
        if self.carries_bag {
            let bag = BBox::new(x + 20.0, y, x + 50.0, y + 40.0);
            dets.push(Detection::new(bag, 0.55, 24, "backpack"));
        }
        dets
    }
}

/// 模拟线程: 逐帧发送检测结果, 接收端关闭时退出
fn simulate(args: &Args, frame: FrameSize, tx: Sender<SimFrame>) {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let spacing = (args.frames / (args.shoppers as u64 + 1)).max(1);
    let mut pending: Vec<Shopper> = (0..args.shoppers)
        .map(|i| Shopper::random(&mut rng, i as u64 * spacing + 1, frame))
        .collect();
    let mut walking: Vec<Shopper> = Vec::new();

    for frame_number in 1..=args.frames {
        let (arriving, waiting): (Vec<Shopper>, Vec<Shopper>) = pending
            .into_iter()
            .partition(|s| s.spawn_frame <= frame_number);
        pending = waiting;
        walking.extend(arriving);

        let mut detections = Vec::new();
        for shopper in walking.iter_mut() {
            shopper.step();
            detections.extend(shopper.detections(&mut rng));
        }
        walking.retain(|s| !s.done());

        let msg = SimFrame {
            frame_number,
            timestamp: frame_number as f64 / args.fps,
            detections,
        };
        if tx.send(msg).is_err() {
            warn!("⚠️  接收端已关闭, 模拟线程退出");
            return;
        }
    }
    info!("✅ 模拟完成: {} 帧", args.frames);
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("store_sentinel=info,sentinel=info")),
        )
        .init();

    let args = Args::parse();
    if !(args.fps.is_finite() && args.fps > 0.0) {
        anyhow::bail!("fps must be positive, got {}", args.fps);
    }

    println!("🚀 数字卫兵系统启动");
    let config = AnalyticsConfig::load(&args.config)
        .with_context(|| format!("加载配置失败: {}", args.config.display()))?;
    config.print_summary();

    let frame_size = config.frame;
    let mut session =
        CameraSession::new(args.camera.clone(), config).context("创建摄像头会话失败")?;

    let alert_count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = alert_count.clone();
    session.alerts().register_callback(move |alert| {
        counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        tracing::debug!("🔔 回调收到告警 {}", alert.id);
        Ok(())
    });

    // ========== 启动模拟线程 ==========
    let (tx, rx) = bounded::<SimFrame>(64);
    let sim_args = args.clone();
    let simulator = thread::spawn(move || simulate(&sim_args, frame_size, tx));

    // ========== 主线程: 逐帧处理 ==========
    for frame in rx.iter() {
        let report = session.process_frame(&frame.detections, frame.timestamp, frame.frame_number);
        for id in &report.exited_track_ids {
            tracing::debug!("帧 {}: 轨迹 {} 离场", report.frame_number, id);
        }
        if frame.frame_number % (args.fps as u64 * 10).max(1) == 0 {
            info!(
                "📊 帧 {} | 画面内 {} 人 | 活动告警 {}",
                frame.frame_number,
                report.active_tracks,
                session.alerts().active(None).len()
            );
        }
    }

    if simulator.join().is_err() {
        warn!("⚠️  模拟线程异常退出");
    }

    let report = session.finish();
    info!(
        "🔔 告警回调共触发 {} 次",
        alert_count.load(std::sync::atomic::Ordering::Relaxed)
    );

    let json = serde_json::to_string_pretty(&report).context("序列化会话报告失败")?;
    if args.save_report {
        let path = format!("sentinel_report_{}.json", gen_time_string(""));
        std::fs::write(&path, &json).with_context(|| format!("写入报告失败: {}", path))?;
        info!("💾 报告已保存到 {}", path);
    } else {
        println!("{}", json);
    }

    Ok(())
}
