// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 实时告警引擎
//! Real-time alert engine: crowd, loitering, idle and security-object rules
//!
//! 同一 (类型, 对象) 最多只有一个未解决的告警, 条件再次满足时原地更新。
//! 状态由读写锁保护: 帧处理线程是唯一写者, 查询接口返回快照;
//! 回调执行期间不持有任何锁。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::{AlertConfig, AnalyticsConfig, MotionConfig};
use crate::detection::{Detection, Track, TrackPoint};
use crate::error::Result;

// ========== 数据结构 ==========

/// 告警级别
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    fn emoji(self) -> &'static str {
        match self {
            AlertLevel::Info => "ℹ️",
            AlertLevel::Warning => "⚠️",
            AlertLevel::Critical => "🚨",
        }
    }
}

/// 告警类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    CrowdDetected,
    Loitering,
    /// 闲置 (长时间静止)
    SuspiciousBehavior,
    SecurityObject,
    ZoneViolation,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::CrowdDetected => "crowd_detected",
            AlertType::Loitering => "loitering",
            AlertType::SuspiciousBehavior => "suspicious_behavior",
            AlertType::SecurityObject => "security_object",
            AlertType::ZoneViolation => "zone_violation",
        }
    }
}

/// 告警对象 (去重 / 解决的作用范围)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSubject {
    /// 整个视频流
    Stream,
    Track(u64),
    /// 物品类别
    Label(String),
    /// 手动告警, 每条独立
    Manual(u64),
}

/// 告警
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub level: AlertLevel,
    pub subject: AlertSubject,
    /// 视频流时间 (秒)
    pub created_at: f64,
    pub message: String,
    pub details: BTreeMap<String, Value>,
    pub location: Option<TrackPoint>,
    pub resolved: bool,
    pub resolved_at: Option<f64>,
}

/// 告警统计
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertStatistics {
    pub total_alerts: u64,
    pub active_alerts: u64,
    pub resolved_alerts: u64,
    pub alerts_by_type: BTreeMap<String, u64>,
    pub alert_history_size: usize,
}

/// 告警回调: 返回错误或 panic 都只影响自身
pub type AlertCallback = Arc<dyn Fn(&Alert) -> anyhow::Result<()> + Send + Sync>;

type AlertKey = (AlertType, AlertSubject);

#[derive(Default)]
struct AlertState {
    /// 全部告警 (按创建顺序), 未解决的告警在此原地更新
    history: Vec<Alert>,
    /// 未解决告警 → history 下标
    open: HashMap<AlertKey, usize>,
    total: u64,
    by_type: BTreeMap<AlertType, u64>,
    manual_seq: u64,
}

impl AlertState {
    fn open_alert(
        &mut self,
        key: AlertKey,
        level: AlertLevel,
        message: String,
        timestamp: f64,
    ) -> &mut Alert {
        let id = format!("ALERT_{}_{}", chrono::Utc::now().timestamp_millis(), self.total);
        self.total += 1;
        *self.by_type.entry(key.0).or_insert(0) += 1;

        let index = self.history.len();
        self.history.push(Alert {
            id,
            alert_type: key.0,
            level,
            subject: key.1.clone(),
            created_at: timestamp,
            message,
            details: BTreeMap::new(),
            location: None,
            resolved: false,
            resolved_at: None,
        });
        self.open.insert(key, index);
        &mut self.history[index]
    }

    fn open_index(&self, key: &AlertKey) -> Option<usize> {
        self.open.get(key).copied()
    }

    fn resolve_key(&mut self, key: &AlertKey, timestamp: f64) -> Option<Alert> {
        let index = self.open.remove(key)?;
        let alert = &mut self.history[index];
        alert.resolved = true;
        alert.resolved_at = Some(timestamp);
        Some(alert.clone())
    }
}

// ========== 告警引擎 ==========

/// 告警引擎 (每路摄像头一个实例)
pub struct AlertEngine {
    config: AlertConfig,
    motion: MotionConfig,
    state: RwLock<AlertState>,
    callbacks: RwLock<Vec<AlertCallback>>,
}

impl AlertEngine {
    pub fn new(config: &AnalyticsConfig) -> Result<Self> {
        config.alerts.validate()?;
        config.motion.validate()?;
        info!(
            "🔔 告警引擎已启动: 人群 {} 人, 徘徊 {:.0}s",
            config.alerts.crowd_threshold, config.alerts.loitering_time
        );
        Ok(Self {
            config: config.alerts.clone(),
            motion: config.motion.clone(),
            state: RwLock::new(AlertState::default()),
            callbacks: RwLock::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// 按当前轨迹评估人群 / 徘徊 / 闲置规则
    ///
    /// 返回本次新建的告警; 新建和更新的告警都会触发回调。
    pub fn evaluate(&self, tracks: &[Track], timestamp: f64) -> Vec<Alert> {
        let mut created = Vec::new();
        let mut updated = Vec::new();

        {
            let mut state = self.state.write();

            // 人群
            let count = tracks.len();
            let crowd_key = (AlertType::CrowdDetected, AlertSubject::Stream);
            if count >= self.config.crowd_threshold {
                match state.open_index(&crowd_key) {
                    Some(index) => {
                        let alert = &mut state.history[index];
                        if alert.details.get("current_count") != Some(&json!(count)) {
                            alert.details.insert("current_count".into(), json!(count));
                            updated.push(alert.clone());
                        }
                    }
                    None => {
                        let alert = state.open_alert(
                            crowd_key,
                            AlertLevel::Warning,
                            format!("Crowd detected: {} people", count),
                            timestamp,
                        );
                        alert.details.insert("people_count".into(), json!(count));
                        let threshold = self.config.crowd_threshold;
                        alert.details.insert("threshold".into(), json!(threshold));
                        alert.details.insert("current_count".into(), json!(count));
                        created.push(alert.clone());
                    }
                }
            } else if state.resolve_key(&crowd_key, timestamp).is_some() {
                debug!("✅ 人群告警解除 ({} 人)", count);
            }

            // 离开画面的轨迹: 关闭其单人告警
            let live: HashSet<u64> = tracks.iter().map(|t| t.id()).collect();
            let orphaned: Vec<AlertKey> = state
                .open
                .keys()
                .filter(|(_, subject)| {
                    matches!(subject, AlertSubject::Track(id) if !live.contains(id))
                })
                .cloned()
                .collect();
            for key in orphaned {
                state.resolve_key(&key, timestamp);
            }

            for track in tracks {
                // 徘徊
                let duration = track.duration();
                let loiter_key = (AlertType::Loitering, AlertSubject::Track(track.id()));
                if duration > self.config.loitering_time
                    && state.open_index(&loiter_key).is_none()
                {
                    let alert = state.open_alert(
                        loiter_key,
                        AlertLevel::Info,
                        format!("Person loitering: ID {}", track.id()),
                        timestamp,
                    );
                    alert.details.insert("track_id".into(), json!(track.id()));
                    alert.details.insert("duration".into(), json!(duration));
                    alert.details.insert("threshold".into(), json!(self.config.loitering_time));
                    alert.location = track.last_position();
                    created.push(alert.clone());
                }

                // 闲置
                let idle_key = (AlertType::SuspiciousBehavior, AlertSubject::Track(track.id()));
                let idle_duration = track.idle_duration(&self.motion);
                if idle_duration > self.config.idle_alert_time {
                    if state.open_index(&idle_key).is_none() {
                        let alert = state.open_alert(
                            idle_key,
                            AlertLevel::Info,
                            format!("Idle behavior detected: ID {}", track.id()),
                            timestamp,
                        );
                        alert.details.insert("track_id".into(), json!(track.id()));
                        alert.details.insert("idle_duration".into(), json!(idle_duration));
                        if let Some(p) = track.last_position() {
                            alert.details.insert("position".into(), json!([p.x, p.y]));
                        }
                        alert.location = track.last_position();
                        created.push(alert.clone());
                    }
                } else if idle_duration == 0.0 {
                    state.resolve_key(&idle_key, timestamp);
                }
            }
        }

        self.publish(&created, &updated);
        created
    }

    /// 安全物品规则: 每个配置类别最多一个未解决告警
    pub fn evaluate_objects(&self, detections: &[Detection], timestamp: f64) -> Vec<Alert> {
        let mut created = Vec::new();
        let mut updated = Vec::new();

        {
            let mut state = self.state.write();
            for label in &self.config.security_labels {
                let count = detections.iter().filter(|d| d.class_label == *label).count();
                let key = (AlertType::SecurityObject, AlertSubject::Label(label.clone()));

                if count == 0 {
                    state.resolve_key(&key, timestamp);
                    continue;
                }

                match state.open_index(&key) {
                    Some(index) => {
                        let alert = &mut state.history[index];
                        if alert.details.get("count") != Some(&json!(count)) {
                            alert.details.insert("count".into(), json!(count));
                            updated.push(alert.clone());
                        }
                    }
                    None => {
                        let location = detections
                            .iter()
                            .find(|d| d.class_label == *label)
                            .map(|d| TrackPoint::from(d.center()));
                        let alert = state.open_alert(
                            key,
                            AlertLevel::Warning,
                            format!("Security object detected: {}", label),
                            timestamp,
                        );
                        alert.details.insert("label".into(), json!(label));
                        alert.details.insert("count".into(), json!(count));
                        alert.location = location;
                        created.push(alert.clone());
                    }
                }
            }
        }

        self.publish(&created, &updated);
        created
    }

    /// 手动告警 (不经过规则评估)
    pub fn raise(
        &self,
        alert_type: AlertType,
        level: AlertLevel,
        message: impl Into<String>,
        details: BTreeMap<String, Value>,
        timestamp: f64,
    ) -> Alert {
        let alert = {
            let mut state = self.state.write();
            state.manual_seq += 1;
            let key = (alert_type, AlertSubject::Manual(state.manual_seq));
            let alert = state.open_alert(key, level, message.into(), timestamp);
            alert.details = details;
            alert.clone()
        };
        self.publish(std::slice::from_ref(&alert), &[]);
        alert
    }

    /// 按ID解决告警, 已解决或不存在时返回 false
    pub fn resolve(&self, alert_id: &str, timestamp: f64) -> bool {
        let mut state = self.state.write();
        let key = state
            .open
            .iter()
            .find(|entry| state.history[*entry.1].id == alert_id)
            .map(|(key, _)| key.clone());
        match key {
            Some(key) => state.resolve_key(&key, timestamp).is_some(),
            None => false,
        }
    }

    /// 未解决的告警 (可按类型过滤)
    pub fn active(&self, alert_type: Option<AlertType>) -> Vec<Alert> {
        let state = self.state.read();
        let mut indices: Vec<usize> = state
            .open
            .iter()
            .filter(|((t, _), _)| alert_type.map_or(true, |want| *t == want))
            .map(|(_, &index)| index)
            .collect();
        indices.sort_unstable();
        indices.into_iter().map(|i| state.history[i].clone()).collect()
    }

    /// 最近 `limit` 条历史告警 (可按类型过滤)
    pub fn history(&self, limit: usize, alert_type: Option<AlertType>) -> Vec<Alert> {
        let state = self.state.read();
        let filtered: Vec<&Alert> = state
            .history
            .iter()
            .filter(|a| alert_type.map_or(true, |want| a.alert_type == want))
            .collect();
        let skip = filtered.len().saturating_sub(limit);
        filtered.into_iter().skip(skip).cloned().collect()
    }

    pub fn statistics(&self) -> AlertStatistics {
        let state = self.state.read();
        let active = state.open.len() as u64;
        AlertStatistics {
            total_alerts: state.total,
            active_alerts: active,
            resolved_alerts: state.total - active,
            alerts_by_type: state
                .by_type
                .iter()
                .map(|(t, n)| (t.as_str().to_string(), *n))
                .collect(),
            alert_history_size: state.history.len(),
        }
    }

    /// 注册告警回调 (按注册顺序同步调用)
    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&Alert) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.callbacks.write().push(Arc::new(callback));
        debug!("告警回调已注册 (共 {} 个)", self.callback_count());
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.read().len()
    }

    /// 清空全部告警状态 (保留回调)
    pub fn reset(&self) {
        *self.state.write() = AlertState::default();
        info!("🔄 告警引擎已重置");
    }

    fn publish(&self, created: &[Alert], updated: &[Alert]) {
        if created.is_empty() && updated.is_empty() {
            return;
        }
        for alert in created {
            log_alert(alert);
        }

        // 快照回调列表后释放锁
        let callbacks: Vec<AlertCallback> = self.callbacks.read().clone();
        for alert in created.iter().chain(updated) {
            for (i, callback) in callbacks.iter().enumerate() {
                match catch_unwind(AssertUnwindSafe(|| callback(alert))) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("⚠️  告警回调 #{} 失败 ({}): {:#}", i, alert.id, e),
                    Err(_) => error!("❌ 告警回调 #{} panic ({})", i, alert.id),
                }
            }
        }
    }
}

fn log_alert(alert: &Alert) {
    let (emoji, kind) = (alert.level.emoji(), alert.alert_type.as_str());
    match alert.level {
        AlertLevel::Info => info!("{} [{}] {}", emoji, kind, alert.message),
        AlertLevel::Warning => warn!("{} [{}] {}", emoji, kind, alert.message),
        AlertLevel::Critical => error!("{} [{}] {}", emoji, kind, alert.message),
    }
}
