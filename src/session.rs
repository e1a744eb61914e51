// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 摄像头会话 - 每路摄像头独立的跟踪 + 分析 + 告警上下文
//! Camera session: one tracker and one alert engine per stream
//!
//! 会话由调用方持有并按帧顺序驱动, 不存在全局注册表。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::alerts::{Alert, AlertEngine, AlertStatistics};
use crate::analysis::{
    insights, summarize, BehaviorAnalyzer, BehaviorResult, Insights, Recommendation, Summary,
    ZoneClassifier,
};
use crate::config::AnalyticsConfig;
use crate::detection::{Detection, PersonTracker, TrackPoint, TrackStatus};
use crate::error::Result;

/// 单帧处理结果
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrameReport {
    pub frame_number: u64,
    pub timestamp: f64,
    /// 未被淘汰的轨迹数
    pub active_tracks: usize,
    pub new_alerts: Vec<Alert>,
    pub exited_track_ids: Vec<u64>,
}

/// 实时轨迹快照
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LiveTrack {
    pub track_id: u64,
    pub correlation_token: Uuid,
    pub status: TrackStatus,
    pub duration: f64,
    pub is_moving: bool,
    pub zone: String,
    pub position: Option<TrackPoint>,
}

/// 会话结束报告
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionReport {
    pub camera_id: String,
    pub frames_processed: u64,
    pub results: Vec<BehaviorResult>,
    pub summary: Summary,
    pub recommendations: Vec<Recommendation>,
    pub alert_stats: AlertStatistics,
}

/// 摄像头会话
pub struct CameraSession {
    camera_id: String,
    config: AnalyticsConfig,
    tracker: PersonTracker,
    analyzer: BehaviorAnalyzer,
    alerts: Arc<AlertEngine>,
    /// 已离场轨迹的分析结果 (按离场顺序)
    results: Vec<BehaviorResult>,
    frames_processed: u64,
}

impl CameraSession {
    pub fn new(camera_id: impl Into<String>, config: AnalyticsConfig) -> Result<Self> {
        let zones = Arc::new(ZoneClassifier::from_layout(&config.zones)?);
        Self::with_zones(camera_id, config, zones)
    }

    /// 多路摄像头共享同一区域配置
    pub fn with_zones(
        camera_id: impl Into<String>,
        config: AnalyticsConfig,
        zones: Arc<ZoneClassifier>,
    ) -> Result<Self> {
        config.validate()?;
        let camera_id = camera_id.into();
        let tracker = PersonTracker::new(config.tracker.clone())?;
        let analyzer = BehaviorAnalyzer::new(&config, zones)?;
        let alerts = Arc::new(AlertEngine::new(&config)?);
        info!("📹 摄像头会话 {} 已创建", camera_id);

        Ok(Self {
            camera_id,
            tracker,
            config,
            analyzer,
            alerts,
            results: Vec::new(),
            frames_processed: 0,
        })
    }

    /// 处理一帧检测结果
    pub fn process_frame(
        &mut self,
        detections: &[Detection],
        timestamp: f64,
        frame_number: u64,
    ) -> FrameReport {
        let active_tracks = self
            .tracker
            .update_at_frame(detections, timestamp, frame_number)
            .len();
        self.frames_processed += 1;
        let timestamp = self.tracker.last_timestamp().unwrap_or(0.0);

        // 离场轨迹 → 行为分析
        let exited_track_ids = self.tracker.last_exited().to_vec();
        for track in self.tracker.newly_exited() {
            let result = self.analyzer.analyze(track);
            info!(
                "🚶 [{}] ID {} 离场: {} ({:.1}s)",
                self.camera_id,
                track.id(),
                result.label,
                result.duration_seconds
            );
            self.results.push(result);
        }

        let mut new_alerts = self.alerts.evaluate(self.tracker.active_tracks(), timestamp);
        new_alerts.extend(self.alerts.evaluate_objects(detections, timestamp));

        if frame_number % 300 == 0 {
            debug!("[{}] 帧 {} | {}", self.camera_id, frame_number, self.tracker.get_stats());
        }

        FrameReport {
            frame_number,
            timestamp,
            active_tracks,
            new_alerts,
            exited_track_ids,
        }
    }

    /// 重新分析跟踪器仍保留的离场轨迹 (最多 max_completed 条)
    pub fn analyze_completed(&self) -> Vec<BehaviorResult> {
        self.analyzer.analyze_all(self.tracker.completed_tracks())
    }

    /// 已离场轨迹的分析结果
    pub fn results(&self) -> &[BehaviorResult] {
        &self.results
    }

    pub fn summary(&self) -> Summary {
        summarize(&self.results)
    }

    pub fn insights(&self) -> Insights {
        insights(&self.results)
    }

    /// 当前画面中的轨迹
    pub fn live_snapshot(&self) -> Vec<LiveTrack> {
        let frame = self.config.frame;
        self.tracker
            .active_tracks()
            .iter()
            .map(|track| LiveTrack {
                track_id: track.id(),
                correlation_token: track.correlation_token(),
                status: track.status(),
                duration: track.duration(),
                is_moving: !track.is_stationary(&self.config.motion),
                zone: track
                    .last_position()
                    .map(|p| {
                        self.analyzer
                            .zones()
                            .classify(p, frame.width, frame.height)
                            .to_string()
                    })
                    .unwrap_or_default(),
                position: track.last_position(),
            })
            .collect()
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn tracker(&self) -> &PersonTracker {
        &self.tracker
    }

    /// 告警引擎 (可交给其他线程查询)
    pub fn alerts(&self) -> Arc<AlertEngine> {
        Arc::clone(&self.alerts)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// 结束会话
    ///
    /// 仍在画面中且已确认的轨迹按最后一帧离场处理后一并分析。
    pub fn finish(mut self) -> SessionReport {
        let timestamp = self.tracker.last_timestamp().unwrap_or(0.0);
        let frame = self.tracker.frame_count();
        let min_hits = self.config.tracker.min_hits as usize;

        let remaining: Vec<BehaviorResult> = self
            .tracker
            .active_tracks()
            .iter()
            .filter(|t| t.hits() >= min_hits)
            .map(|t| {
                let mut track = t.clone();
                track.mark_exited(timestamp, frame);
                self.analyzer.analyze(&track)
            })
            .collect();
        if !remaining.is_empty() {
            debug!("[{}] 结束时仍有 {} 条轨迹在画面中", self.camera_id, remaining.len());
        }
        self.results.extend(remaining);

        let Insights {
            summary,
            recommendations,
        } = insights(&self.results);
        info!(
            "🏁 [{}] 会话结束: {} 帧, {} 位访客, 转化率 {:.2}%",
            self.camera_id, self.frames_processed, summary.total_visitors, summary.conversion_rate
        );

        SessionReport {
            camera_id: self.camera_id,
            frames_processed: self.frames_processed,
            results: self.results,
            summary,
            recommendations,
            alert_stats: self.alerts.statistics(),
        }
    }
}
