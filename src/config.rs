// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 分析引擎配置 - 通过JSON文件调整参数
//! Analytics configuration, loaded from / saved to JSON.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analysis::zones::ZoneRect;
use crate::error::{AnalyticsError, Result};

/// 跟踪器参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    pub iou_threshold: f64,          // IOU匹配阈值
    pub max_age: u32,                // 最大丢失帧数
    pub min_hits: u32,               // 确认轨迹所需的最少命中次数
    pub track_label: Option<String>, // 只跟踪该类别 (None = 全部类别)
    pub max_completed: usize,        // 保留的离场轨迹上限 (超出时丢弃最早的)
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_age: 30,
            min_hits: 3,
            track_label: Some("person".to_string()),
            max_completed: 1000,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.iou_threshold > 0.0 && self.iou_threshold <= 1.0) {
            return Err(AnalyticsError::threshold(
                "iou_threshold",
                format!("must be in (0, 1], got {}", self.iou_threshold),
            ));
        }
        if self.max_age == 0 {
            return Err(AnalyticsError::threshold("max_age", "must be positive"));
        }
        if self.min_hits == 0 {
            return Err(AnalyticsError::threshold("min_hits", "must be positive"));
        }
        if self.max_completed == 0 {
            return Err(AnalyticsError::threshold("max_completed", "must be positive"));
        }
        Ok(())
    }
}

/// 静止判定参数
///
/// 最近 `stationary_window` 个中心点的 x/y 方差都小于 `stationary_variance` (px²) 即视为静止。
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MotionConfig {
    pub stationary_window: usize,  // 静止判定窗口 (样本数)
    pub stationary_variance: f64,  // 静止方差阈值 (像素²)
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            stationary_window: 10,
            stationary_variance: 50.0,
        }
    }
}

impl MotionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stationary_window < 2 {
            return Err(AnalyticsError::threshold(
                "stationary_window",
                "needs at least 2 samples",
            ));
        }
        positive("stationary_variance", self.stationary_variance)
    }
}

/// 行为分类参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BehaviorConfig {
    pub idle_time_threshold: f64,     // 闲置判定时长 (秒)
    pub browsing_time_threshold: f64, // 浏览判定时长 (秒)
    pub passing_max_duration: f64,    // 路过: 最长停留 (秒)
    pub passing_max_distance: f64,    // 路过: 最大移动距离 (像素)
    pub active_browsing_speed: f64,   // 主动浏览平均速度 (像素/秒)
    pub min_positions: usize,         // 分类所需最少轨迹点
    pub stop_movement_threshold: f64, // 停顿: 帧间位移上限 (像素)
    pub min_stop_duration: f64,       // 停顿: 最短持续时间 (秒)
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            idle_time_threshold: 5.0,
            browsing_time_threshold: 3.0,
            passing_max_duration: 3.0,
            passing_max_distance: 100.0,
            active_browsing_speed: 10.0,
            min_positions: 5,
            stop_movement_threshold: 10.0,
            min_stop_duration: 2.0,
        }
    }
}

impl BehaviorConfig {
    pub fn validate(&self) -> Result<()> {
        positive("idle_time_threshold", self.idle_time_threshold)?;
        positive("browsing_time_threshold", self.browsing_time_threshold)?;
        positive("passing_max_duration", self.passing_max_duration)?;
        positive("passing_max_distance", self.passing_max_distance)?;
        positive("active_browsing_speed", self.active_browsing_speed)?;
        positive("stop_movement_threshold", self.stop_movement_threshold)?;
        positive("min_stop_duration", self.min_stop_duration)?;
        if self.min_positions == 0 {
            return Err(AnalyticsError::threshold("min_positions", "must be positive"));
        }
        Ok(())
    }
}

/// 告警参数
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AlertConfig {
    pub crowd_threshold: usize,       // 人群告警人数
    pub loitering_time: f64,          // 徘徊告警时长 (秒)
    pub idle_alert_time: f64,         // 闲置告警时长 (秒)
    pub security_labels: Vec<String>, // 安全物品类别
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            crowd_threshold: 10,
            loitering_time: 300.0,
            idle_alert_time: 60.0,
            security_labels: vec![
                "backpack".to_string(),
                "handbag".to_string(),
                "suitcase".to_string(),
            ],
        }
    }
}

impl AlertConfig {
    pub fn validate(&self) -> Result<()> {
        if self.crowd_threshold == 0 {
            return Err(AnalyticsError::threshold("crowd_threshold", "must be positive"));
        }
        positive("loitering_time", self.loitering_time)?;
        positive("idle_alert_time", self.idle_alert_time)
    }
}

/// 区域定义 (归一化坐标, 按 entry → exit → checkout 优先级匹配)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ZoneLayout {
    pub entry: ZoneRect,
    pub exit: ZoneRect,
    pub checkout: ZoneRect,
}

impl Default for ZoneLayout {
    fn default() -> Self {
        Self {
            entry: ZoneRect::new(0.0, 0.3, 0.0, 1.0),
            exit: ZoneRect::new(0.7, 1.0, 0.0, 1.0),
            checkout: ZoneRect::new(0.4, 0.6, 0.7, 1.0),
        }
    }
}

/// 画面尺寸 (像素)
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl Default for FrameSize {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// 分析引擎完整配置
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub tracker: TrackerConfig,
    pub motion: MotionConfig,
    pub behavior: BehaviorConfig,
    pub alerts: AlertConfig,
    pub zones: ZoneLayout,
    pub frame: FrameSize,
}

impl AnalyticsConfig {
    /// 从JSON文件加载配置
    ///
    /// 文件不存在时写入并返回默认配置;解析失败或数值非法时返回错误。
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => {
                let config: Self = serde_json::from_str(&json)?;
                config.validate()?;
                info!("✅ 配置已从 {} 加载", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("📝 配置文件 {} 不存在,创建默认配置...", path.display());
                let config = Self::default();
                config.save(path)?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        info!("💾 配置已保存到 {}", path.as_ref().display());
        Ok(())
    }

    /// 校验全部参数
    pub fn validate(&self) -> Result<()> {
        self.tracker.validate()?;
        self.motion.validate()?;
        self.behavior.validate()?;
        self.alerts.validate()?;
        self.zones.entry.validate("entry")?;
        self.zones.exit.validate("exit")?;
        self.zones.checkout.validate("checkout")?;
        if self.frame.width == 0 || self.frame.height == 0 {
            return Err(AnalyticsError::threshold(
                "frame",
                format!("{}x{} is not a usable frame size", self.frame.width, self.frame.height),
            ));
        }
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️  当前分析配置:");
        info!(
            "  跟踪: IOU {:.2} | 最大丢失帧 {} | 最少命中 {} | 保留离场轨迹 {}",
            self.tracker.iou_threshold,
            self.tracker.max_age,
            self.tracker.min_hits,
            self.tracker.max_completed
        );
        info!(
            "  静止判定: 最近 {} 点, 方差 < {:.1}px²",
            self.motion.stationary_window, self.motion.stationary_variance
        );
        info!(
            "  行为: 闲置 {:.1}s | 浏览 {:.1}s",
            self.behavior.idle_time_threshold, self.behavior.browsing_time_threshold
        );
        info!(
            "  告警: 人群 {} 人 | 徘徊 {:.0}s | 闲置 {:.0}s",
            self.alerts.crowd_threshold, self.alerts.loitering_time, self.alerts.idle_alert_time
        );
        info!("  画面: {}x{}", self.frame.width, self.frame.height);
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(AnalyticsError::threshold(
            name,
            format!("must be a positive number, got {}", value),
        ))
    }
}
