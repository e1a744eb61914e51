// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 多目标跟踪公共组件
//! Common components for multi-object tracking

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{BBox, Detection};
use crate::config::MotionConfig;

// ========== 公共数据结构 ==========

/// 跟踪点 (检测框中心)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub x: f64,
    pub y: f64,
}

impl From<(f64, f64)> for TrackPoint {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

impl TrackPoint {
    pub fn distance(&self, other: &TrackPoint) -> f64 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

/// 轨迹生命周期状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    /// 命中次数未达到 min_hits
    Tentative,
    /// 已确认, 本帧匹配成功
    Active,
    /// 已确认, 暂时丢失 (未超过 max_age)
    Lost,
    /// 已离场, 可进行行为分析
    Exited,
}

/// 跟踪对象 (一个人在整段视频中的身份与轨迹)
///
/// `positions`, `timestamps`, `frame_numbers`, `bboxes` 始终等长。
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    id: u64,
    correlation_token: Uuid,
    class_label: String,

    positions: Vec<TrackPoint>,
    timestamps: Vec<f64>,
    frame_numbers: Vec<u64>,
    bboxes: Vec<BBox>,

    status: TrackStatus,
    entry_time: Option<f64>,
    entry_frame: Option<u64>,
    exit_time: Option<f64>,
    exit_frame: Option<u64>,

    /// 连续未匹配帧数
    frames_without_match: u32,
}

impl Track {
    /// 由第一次检测创建轨迹
    pub fn new(id: u64, detection: &Detection, timestamp: f64, frame: u64, min_hits: u32) -> Self {
        let mut track = Self {
            id,
            correlation_token: Uuid::new_v4(),
            class_label: detection.class_label.clone(),
            positions: Vec::new(),
            timestamps: Vec::new(),
            frame_numbers: Vec::new(),
            bboxes: Vec::new(),
            status: TrackStatus::Tentative,
            entry_time: None,
            entry_frame: None,
            exit_time: None,
            exit_frame: None,
            frames_without_match: 0,
        };
        track.record(detection, timestamp, frame, min_hits);
        track
    }

    /// 由已有的位置/时间序列构建轨迹 (离线分析用)
    ///
    /// 两个序列长度不同时按较短者截断。
    pub fn from_history(id: u64, positions: &[(f64, f64)], timestamps: &[f64]) -> Self {
        let len = positions.len().min(timestamps.len());
        let mut track = Self {
            id,
            correlation_token: Uuid::new_v4(),
            class_label: super::types::PERSON_LABEL.to_string(),
            positions: Vec::with_capacity(len),
            timestamps: Vec::with_capacity(len),
            frame_numbers: Vec::with_capacity(len),
            bboxes: Vec::with_capacity(len),
            status: TrackStatus::Tentative,
            entry_time: None,
            entry_frame: None,
            exit_time: None,
            exit_frame: None,
            frames_without_match: 0,
        };
        for (i, (&(x, y), &t)) in positions.iter().zip(timestamps).take(len).enumerate() {
            let bbox = BBox::new(x - 1.0, y - 1.0, x + 1.0, y + 1.0);
            let det = Detection::new(bbox, 1.0, 0, super::types::PERSON_LABEL);
            track.record(&det, t, i as u64 + 1, 1);
        }
        track
    }

    /// 匹配成功: 追加轨迹点
    pub(crate) fn record(
        &mut self,
        detection: &Detection,
        timestamp: f64,
        frame: u64,
        min_hits: u32,
    ) {
        self.positions.push(detection.center().into());
        self.timestamps.push(timestamp);
        self.frame_numbers.push(frame);
        self.bboxes.push(detection.bbox);
        self.frames_without_match = 0;

        if self.entry_time.is_none() {
            self.entry_time = Some(timestamp);
            self.entry_frame = Some(frame);
        }

        self.status = if self.hits() >= min_hits as usize {
            TrackStatus::Active
        } else {
            TrackStatus::Tentative
        };
    }

    /// 匹配失败: 丢失计数加一
    pub(crate) fn mark_lost(&mut self, min_hits: u32) {
        self.frames_without_match += 1;
        if self.hits() >= min_hits as usize {
            self.status = TrackStatus::Lost;
        }
    }

    /// 标记离场 (离场时间只写一次)
    pub fn mark_exited(&mut self, timestamp: f64, frame: u64) {
        self.status = TrackStatus::Exited;
        if self.exit_time.is_none() {
            self.exit_time = Some(timestamp);
            self.exit_frame = Some(frame);
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn correlation_token(&self) -> Uuid {
        self.correlation_token
    }

    pub fn class_label(&self) -> &str {
        &self.class_label
    }

    pub fn status(&self) -> TrackStatus {
        self.status
    }

    pub fn positions(&self) -> &[TrackPoint] {
        &self.positions
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn frame_numbers(&self) -> &[u64] {
        &self.frame_numbers
    }

    pub fn bboxes(&self) -> &[BBox] {
        &self.bboxes
    }

    pub fn entry_time(&self) -> Option<f64> {
        self.entry_time
    }

    pub fn entry_frame(&self) -> Option<u64> {
        self.entry_frame
    }

    pub fn exit_time(&self) -> Option<f64> {
        self.exit_time
    }

    pub fn exit_frame(&self) -> Option<u64> {
        self.exit_frame
    }

    pub fn frames_without_match(&self) -> u32 {
        self.frames_without_match
    }

    /// 总命中次数
    pub fn hits(&self) -> usize {
        self.positions.len()
    }

    pub fn last_position(&self) -> Option<TrackPoint> {
        self.positions.last().copied()
    }

    pub fn last_bbox(&self) -> Option<&BBox> {
        self.bboxes.last()
    }

    /// 停留时长 (秒)
    pub fn duration(&self) -> f64 {
        match (self.entry_time, self.exit_time) {
            (Some(entry), Some(exit)) => exit - entry,
            _ => match (self.timestamps.first(), self.timestamps.last()) {
                (Some(first), Some(last)) => last - first,
                _ => 0.0,
            },
        }
    }

    /// 累计移动距离 (像素)
    pub fn movement_distance(&self) -> f64 {
        self.positions
            .windows(2)
            .map(|w| w[0].distance(&w[1]))
            .sum()
    }

    /// 最近窗口内是否静止
    pub fn is_stationary(&self, motion: &MotionConfig) -> bool {
        let window = motion.stationary_window;
        if window == 0 || self.positions.len() < window {
            return false;
        }
        let recent = &self.positions[self.positions.len() - window..];
        let (var_x, var_y) = variance(recent);
        var_x < motion.stationary_variance && var_y < motion.stationary_variance
    }

    /// 当前静止段持续时间 (秒)
    ///
    /// 取满足方差阈值的最长尾部序列 (至少一个窗口), 不静止时为 0。
    pub fn idle_duration(&self, motion: &MotionConfig) -> f64 {
        if !self.is_stationary(motion) {
            return 0.0;
        }

        let n = self.positions.len();
        let mut sum = (0.0, 0.0);
        let mut sum_sq = (0.0, 0.0);
        let mut start = n - 1;

        for i in (0..n).rev() {
            let p = self.positions[i];
            sum.0 += p.x;
            sum.1 += p.y;
            sum_sq.0 += p.x * p.x;
            sum_sq.1 += p.y * p.y;

            let count = (n - i) as f64;
            let var_x = sum_sq.0 / count - (sum.0 / count).powi(2);
            let var_y = sum_sq.1 / count - (sum.1 / count).powi(2);
            if count as usize >= motion.stationary_window
                && (var_x >= motion.stationary_variance || var_y >= motion.stationary_variance)
            {
                break;
            }
            start = i;
        }

        self.timestamps[n - 1] - self.timestamps[start]
    }
}

// ========== 工具函数 ==========

/// 计算两个边界框的IOU (Intersection over Union)
///
/// 不重叠、退化或含非有限坐标的框返回 0。
pub fn compute_iou(bbox1: &BBox, bbox2: &BBox) -> f64 {
    if !bbox1.is_valid() || !bbox2.is_valid() {
        return 0.0;
    }

    let x1 = bbox1.x1.max(bbox2.x1);
    let y1 = bbox1.y1.max(bbox2.y1);
    let x2 = bbox1.x2.min(bbox2.x2);
    let y2 = bbox1.y2.min(bbox2.y2);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let union = bbox1.area() + bbox2.area() - intersection;

    if !union.is_finite() || union <= 0.0 {
        return 0.0;
    }

    let iou = intersection / union;
    if iou.is_finite() {
        iou
    } else {
        0.0
    }
}

/// 坐标方差 (总体方差)
pub fn variance(points: &[TrackPoint]) -> (f64, f64) {
    if points.is_empty() {
        return (0.0, 0.0);
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;
    let var_x = points.iter().map(|p| (p.x - mean_x).powi(2)).sum::<f64>() / n;
    let var_y = points.iter().map(|p| (p.y - mean_y).powi(2)).sum::<f64>() / n;
    (var_x, var_y)
}
