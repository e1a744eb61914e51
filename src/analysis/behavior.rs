// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 购物行为分析
//! Shopper behavior classification for completed tracks
//!
//! 规则按固定优先级依次判定, 第一条命中的规则生效:
//! purchasing > idle > passing_through > browsing / window_shopping

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::zones::{ZoneClassifier, CHECKOUT};
use crate::config::{AnalyticsConfig, BehaviorConfig, FrameSize, MotionConfig};
use crate::detection::{Track, TrackPoint};
use crate::error::Result;

// ========== 行为标签 ==========

/// 行为标签
///
/// 序列化为 snake_case 字符串; 未知字符串保留为 `Other`, 以便汇总自定义标签。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BehaviorLabel {
    WindowShopping,
    Browsing,
    Purchasing,
    Idle,
    PassingThrough,
    Other(String),
}

impl BehaviorLabel {
    pub fn as_str(&self) -> &str {
        match self {
            BehaviorLabel::WindowShopping => "window_shopping",
            BehaviorLabel::Browsing => "browsing",
            BehaviorLabel::Purchasing => "purchasing",
            BehaviorLabel::Idle => "idle",
            BehaviorLabel::PassingThrough => "passing_through",
            BehaviorLabel::Other(label) => label,
        }
    }
}

impl From<String> for BehaviorLabel {
    fn from(label: String) -> Self {
        match label.as_str() {
            "window_shopping" => BehaviorLabel::WindowShopping,
            "browsing" => BehaviorLabel::Browsing,
            "purchasing" => BehaviorLabel::Purchasing,
            "idle" => BehaviorLabel::Idle,
            "passing_through" => BehaviorLabel::PassingThrough,
            _ => BehaviorLabel::Other(label),
        }
    }
}

impl From<BehaviorLabel> for String {
    fn from(label: BehaviorLabel) -> Self {
        label.as_str().to_string()
    }
}

impl fmt::Display for BehaviorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ========== 分析结果 ==========

/// 停顿 (帧间位移持续低于阈值的一段时间)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub position: TrackPoint,
}

/// 单条轨迹的行为分析结果
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BehaviorResult {
    pub track_id: u64,
    pub correlation_token: Option<Uuid>,
    pub label: BehaviorLabel,
    pub confidence: f64,
    pub rationale: String,
    pub zones_visited: BTreeSet<String>,
    pub visited_checkout: bool,
    /// 目前等同于 visited_checkout
    pub made_purchase: bool,
    pub duration_seconds: f64,
    pub movement_distance: f64,
    pub avg_speed: f64,
    pub is_stationary: bool,
    pub entry_time: Option<f64>,
    pub exit_time: Option<f64>,
    pub stops: Vec<Stop>,
    pub stationary_time: f64,
}

// ========== 规则 ==========

/// 分类用的轨迹指标
#[derive(Clone, Debug)]
struct TrackMetrics {
    duration: f64,
    movement_distance: f64,
    avg_speed: f64,
    is_stationary: bool,
    visited_checkout: bool,
}

/// 分类规则
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BehaviorRule {
    Purchasing,
    Idle,
    PassingThrough,
    /// 浏览 / 橱窗浏览 (兜底规则, 总是命中)
    Dwell,
}

impl BehaviorRule {
    /// 判定顺序
    pub const PRIORITY: [BehaviorRule; 4] = [
        BehaviorRule::Purchasing,
        BehaviorRule::Idle,
        BehaviorRule::PassingThrough,
        BehaviorRule::Dwell,
    ];

    fn evaluate(
        self,
        m: &TrackMetrics,
        config: &BehaviorConfig,
    ) -> Option<(BehaviorLabel, f64, String)> {
        match self {
            BehaviorRule::Purchasing if m.visited_checkout => Some((
                BehaviorLabel::Purchasing,
                0.9,
                "Customer visited checkout area".to_string(),
            )),
            BehaviorRule::Idle if m.is_stationary && m.duration > config.idle_time_threshold => {
                Some((
                    BehaviorLabel::Idle,
                    0.85,
                    format!("Person stationary for {:.1}s", m.duration),
                ))
            }
            BehaviorRule::PassingThrough
                if m.duration < config.passing_max_duration
                    && m.movement_distance < config.passing_max_distance =>
            {
                Some((
                    BehaviorLabel::PassingThrough,
                    0.8,
                    "Quick transit through store".to_string(),
                ))
            }
            BehaviorRule::Dwell => Some(if m.duration >= config.browsing_time_threshold {
                if m.avg_speed > config.active_browsing_speed {
                    (
                        BehaviorLabel::Browsing,
                        0.85,
                        format!(
                            "Active browsing for {:.1}s, moved {:.0}px",
                            m.duration, m.movement_distance
                        ),
                    )
                } else {
                    (
                        BehaviorLabel::Browsing,
                        0.75,
                        format!("Browsing with limited movement for {:.1}s", m.duration),
                    )
                }
            } else {
                (
                    BehaviorLabel::WindowShopping,
                    0.8,
                    format!("Brief visit of {:.1}s, possibly window shopping", m.duration),
                )
            }),
            _ => None,
        }
    }
}

// ========== 分析器 ==========

/// 行为分析器
///
/// 无内部可变状态, 相同轨迹总是得到相同结果。
#[derive(Clone, Debug)]
pub struct BehaviorAnalyzer {
    config: BehaviorConfig,
    motion: MotionConfig,
    frame: FrameSize,
    zones: Arc<ZoneClassifier>,
}

impl BehaviorAnalyzer {
    pub fn new(config: &AnalyticsConfig, zones: Arc<ZoneClassifier>) -> Result<Self> {
        config.behavior.validate()?;
        config.motion.validate()?;
        Ok(Self {
            config: config.behavior.clone(),
            motion: config.motion.clone(),
            frame: config.frame,
            zones,
        })
    }

    pub fn zones(&self) -> &Arc<ZoneClassifier> {
        &self.zones
    }

    /// 分析一条轨迹
    pub fn analyze(&self, track: &Track) -> BehaviorResult {
        let duration = finite_or_zero(track.duration());
        let movement_distance = finite_or_zero(track.movement_distance());

        if track.positions().len() < self.config.min_positions {
            debug!("轨迹 {} 数据不足 ({} 点)", track.id(), track.positions().len());
            return BehaviorResult {
                track_id: track.id(),
                correlation_token: Some(track.correlation_token()),
                label: BehaviorLabel::PassingThrough,
                confidence: 0.5,
                rationale: "Insufficient tracking data".to_string(),
                zones_visited: BTreeSet::new(),
                visited_checkout: false,
                made_purchase: false,
                duration_seconds: duration,
                movement_distance,
                avg_speed: 0.0,
                is_stationary: false,
                entry_time: track.entry_time(),
                exit_time: track.exit_time(),
                stops: Vec::new(),
                stationary_time: 0.0,
            };
        }

        let zones_visited: BTreeSet<String> = track
            .positions()
            .iter()
            .map(|&p| {
                self.zones
                    .classify(p, self.frame.width, self.frame.height)
                    .to_string()
            })
            .collect();
        let visited_checkout = zones_visited.contains(CHECKOUT);

        let metrics = TrackMetrics {
            duration,
            movement_distance,
            avg_speed: if duration > 0.0 {
                movement_distance / duration
            } else {
                0.0
            },
            is_stationary: track.is_stationary(&self.motion),
            visited_checkout,
        };

        let (label, confidence, rationale) = BehaviorRule::PRIORITY
            .iter()
            .find_map(|rule| rule.evaluate(&metrics, &self.config))
            .unwrap_or_else(|| {
                (
                    BehaviorLabel::PassingThrough,
                    0.5,
                    "No behavior rule matched".to_string(),
                )
            });

        let stops = self.detect_stops(track.positions(), track.timestamps());
        let stationary_time = stops.iter().map(|s| s.duration).sum();

        debug!(
            "🧠 轨迹 {} → {} ({:.2}): {}",
            track.id(),
            label,
            confidence,
            rationale
        );

        BehaviorResult {
            track_id: track.id(),
            correlation_token: Some(track.correlation_token()),
            label,
            confidence,
            rationale,
            zones_visited,
            visited_checkout,
            made_purchase: visited_checkout,
            duration_seconds: duration,
            movement_distance,
            avg_speed: metrics.avg_speed,
            is_stationary: metrics.is_stationary,
            entry_time: track.entry_time(),
            exit_time: track.exit_time(),
            stops,
            stationary_time,
        }
    }

    /// 批量分析
    pub fn analyze_all<'a>(
        &self,
        tracks: impl IntoIterator<Item = &'a Track>,
    ) -> Vec<BehaviorResult> {
        tracks.into_iter().map(|t| self.analyze(t)).collect()
    }

    /// 检测停顿: 帧间位移 < stop_movement_threshold 且持续 ≥ min_stop_duration
    pub fn detect_stops(&self, positions: &[TrackPoint], timestamps: &[f64]) -> Vec<Stop> {
        let len = positions.len().min(timestamps.len());
        if len < 2 {
            return Vec::new();
        }

        let mut stops = Vec::new();
        let mut stop_start: Option<usize> = None;

        let close_stop = |start: usize, end: usize, stops: &mut Vec<Stop>| {
            let duration = timestamps[end] - timestamps[start];
            if duration >= self.config.min_stop_duration {
                stops.push(Stop {
                    start_time: timestamps[start],
                    end_time: timestamps[end],
                    duration,
                    position: positions[start],
                });
            }
        };

        for i in 1..len {
            let moved = positions[i - 1].distance(&positions[i]);
            if moved < self.config.stop_movement_threshold {
                if stop_start.is_none() {
                    stop_start = Some(i - 1);
                }
            } else if let Some(start) = stop_start.take() {
                close_stop(start, i - 1, &mut stops);
            }
        }

        // 轨迹结束时仍处于停顿
        if let Some(start) = stop_start {
            close_stop(start, len - 1, &mut stops);
        }

        stops
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
