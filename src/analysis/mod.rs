// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 行为分析系统 (Behavior Analysis System)
///
/// - zones:    区域划分 (entry / exit / checkout / main_area)
/// - behavior: 离场轨迹的行为分类
/// - summary:  客流汇总与经营建议
pub mod behavior;
pub mod summary;
pub mod zones;

pub use behavior::{BehaviorAnalyzer, BehaviorLabel, BehaviorResult, BehaviorRule, Stop};
pub use summary::{insights, summarize, Insights, Recommendation, Summary};
pub use zones::{Zone, ZoneClassifier, ZoneRect, MAIN_AREA};
