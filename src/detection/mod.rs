// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测与跟踪系统 (Detection & Tracking System)
///
/// 每路摄像头一个实例, 按帧串行调用
/// - types:          检测框与检测结果
/// - tracker:        轨迹数据结构与 IOU / 方差工具
/// - person_tracker: 人员跟踪器 (贪心 IOU 关联)
pub mod person_tracker;
pub mod tracker;
pub mod types;

pub use person_tracker::PersonTracker;
pub use tracker::{compute_iou, Track, TrackPoint, TrackStatus};
pub use types::{BBox, Detection, PERSON_LABEL};
