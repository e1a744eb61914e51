// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 门店客流跟踪与行为分析引擎
//! Person tracking, shopper-behavior analytics and real-time alerting
//! over per-frame object detections.
pub mod alerts; // 实时告警
pub mod analysis; // 区域 / 行为 / 汇总
pub mod config; // 分析参数
pub mod detection; // 检测结构与人员跟踪
pub mod error; // 错误类型
pub mod session; // 摄像头会话

pub use crate::alerts::{Alert, AlertEngine, AlertLevel, AlertStatistics, AlertSubject, AlertType};
pub use crate::analysis::{
    BehaviorAnalyzer, BehaviorLabel, BehaviorResult, Insights, Summary, ZoneClassifier,
};
pub use crate::config::AnalyticsConfig;
pub use crate::detection::{BBox, Detection, PersonTracker, Track, TrackPoint, TrackStatus};
pub use crate::error::{AnalyticsError, Result};
pub use crate::session::{CameraSession, FrameReport, SessionReport};

/// 生成时间字符串 (北京时间), 用于报告文件名等
pub fn gen_time_string(delimiter: &str) -> String {
    use chrono::Offset;
    let offset = chrono::FixedOffset::east_opt(8 * 60 * 60) // Beijing
        .unwrap_or_else(|| chrono::Utc.fix());
    let t_now = chrono::Utc::now().with_timezone(&offset);
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}
