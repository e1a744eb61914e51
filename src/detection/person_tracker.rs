// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 人员跟踪器 (贪心 IOU 关联)
//! Person tracker with greedy IoU data association
//!
//! 核心流程:
//! 1. 每条存活轨迹的最近一次检测框与本帧检测框计算 IOU 矩阵
//! 2. 反复取矩阵中最大的 IOU, 不低于阈值即配对 (简化版匈牙利匹配)
//! 3. 未匹配的检测 → 新轨迹; 未匹配的轨迹 → 丢失计数加一
//! 4. 丢失超过 max_age 的轨迹离场; 命中不足 min_hits 的视为噪声直接丢弃

use tracing::{debug, trace, warn};

use super::tracker::{compute_iou, Track, TrackStatus};
use super::types::Detection;
use crate::config::TrackerConfig;
use crate::error::Result;

/// 人员跟踪器
///
/// 单写者模型: 每路摄像头一个实例, 按帧顺序串行调用。
pub struct PersonTracker {
    config: TrackerConfig,

    /// 存活轨迹 (Tentative / Active / Lost)
    tracks: Vec<Track>,

    /// 已离场且命中数达到 min_hits 的轨迹, 最多保留 max_completed 条
    completed: Vec<Track>,

    /// 最近一次 update 中离场的轨迹ID
    last_exited: Vec<u64>,

    /// 下一个分配的ID
    next_id: u64,

    /// 已处理帧数
    frame_count: u64,

    /// 最近一个有效时间戳
    last_timestamp: Option<f64>,
}

impl PersonTracker {
    /// 创建跟踪器, 参数非法时返回错误
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_config(config))
    }

    fn with_config(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            completed: Vec::new(),
            last_exited: Vec::new(),
            next_id: 1,
            frame_count: 0,
            last_timestamp: None,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// 更新跟踪 (内部帧计数)
    pub fn update(&mut self, detections: &[Detection], timestamp: f64) -> &[Track] {
        let frame = self.frame_count + 1;
        self.update_at_frame(detections, timestamp, frame)
    }

    /// 更新跟踪 (调用方提供帧号)
    ///
    /// 返回当前所有未被淘汰的轨迹。
    pub fn update_at_frame(
        &mut self,
        detections: &[Detection],
        timestamp: f64,
        frame_number: u64,
    ) -> &[Track] {
        self.frame_count = frame_number;
        self.last_exited.clear();
        let timestamp = self.sanitize_timestamp(timestamp);

        // 1. 类别过滤
        let detections: Vec<&Detection> = detections
            .iter()
            .filter(|d| match &self.config.track_label {
                Some(label) => d.class_label == *label,
                None => true,
            })
            .collect();

        // 2. 关联
        let mut matched_det = vec![false; detections.len()];
        let mut matched_track = vec![false; self.tracks.len()];

        if !self.tracks.is_empty() {
            for (track_idx, det_idx) in self.greedy_assignment(&detections) {
                matched_det[det_idx] = true;
                matched_track[track_idx] = true;
                self.tracks[track_idx].record(
                    detections[det_idx],
                    timestamp,
                    frame_number,
                    self.config.min_hits,
                );
            }
        }

        // 3. 未匹配的轨迹 → 标记丢失
        for (track_idx, &matched) in matched_track.iter().enumerate() {
            if !matched {
                self.tracks[track_idx].mark_lost(self.config.min_hits);
            }
        }

        // 4. 未匹配的检测 → 新建轨迹
        for (det_idx, &matched) in matched_det.iter().enumerate() {
            if !matched {
                self.create_track(detections[det_idx], timestamp, frame_number);
            }
        }

        // 5. 淘汰丢失太久的轨迹
        self.evict_stale(timestamp, frame_number);

        &self.tracks
    }

    /// 贪心匹配: 每轮取剩余矩阵中的最大 IOU
    ///
    /// 并列时取行优先扫描中第一个出现的最大值, 结果确定但不保证全局最优。
    fn greedy_assignment(&self, detections: &[&Detection]) -> Vec<(usize, usize)> {
        if detections.is_empty() || self.tracks.is_empty() {
            return Vec::new();
        }

        // 计算 IOU 矩阵 (轨迹 × 检测)
        let iou_matrix: Vec<Vec<f64>> = self
            .tracks
            .iter()
            .map(|track| {
                detections
                    .iter()
                    .map(|det| match track.last_bbox() {
                        Some(last) => compute_iou(last, &det.bbox),
                        None => 0.0,
                    })
                    .collect()
            })
            .collect();

        let mut used_track = vec![false; self.tracks.len()];
        let mut used_det = vec![false; detections.len()];
        let mut assignments = Vec::new();

        loop {
            let mut best: Option<(f64, usize, usize)> = None;
            for (t_idx, row) in iou_matrix.iter().enumerate() {
                if used_track[t_idx] {
                    continue;
                }
                for (d_idx, &iou) in row.iter().enumerate() {
                    // NaN 永远不能作为候选, 否则会挡住后面的有效匹配
                    if used_det[d_idx] || !iou.is_finite() {
                        continue;
                    }
                    if best.map_or(true, |(max_iou, _, _)| iou > max_iou) {
                        best = Some((iou, t_idx, d_idx));
                    }
                }
            }

            match best {
                Some((iou, t_idx, d_idx)) if iou >= self.config.iou_threshold => {
                    trace!(
                        "匹配: 轨迹 {} ↔ 检测 {} (IOU {:.3})",
                        self.tracks[t_idx].id(),
                        d_idx,
                        iou
                    );
                    used_track[t_idx] = true;
                    used_det[d_idx] = true;
                    assignments.push((t_idx, d_idx));
                }
                _ => break,
            }
        }

        assignments
    }

    fn create_track(&mut self, detection: &Detection, timestamp: f64, frame: u64) {
        let track = Track::new(self.next_id, detection, timestamp, frame, self.config.min_hits);
        debug!("🆕 新轨迹 ID {} ({})", track.id(), track.correlation_token());
        self.tracks.push(track);
        self.next_id += 1;
    }

    fn evict_stale(&mut self, timestamp: f64, frame: u64) {
        let max_age = self.config.max_age;
        let min_hits = self.config.min_hits as usize;

        // 必须从后往前遍历
        for i in (0..self.tracks.len()).rev() {
            if self.tracks[i].frames_without_match() <= max_age {
                continue;
            }
            let mut track = self.tracks.remove(i);
            if track.hits() >= min_hits {
                track.mark_exited(timestamp, frame);
                debug!(
                    "🚪 轨迹 {} 离场, 停留 {:.1}s, 命中 {} 次",
                    track.id(),
                    track.duration(),
                    track.hits()
                );
                self.last_exited.push(track.id());
                self.completed.push(track);
            } else {
                trace!("轨迹 {} 命中不足 ({} 次), 作为噪声丢弃", track.id(), track.hits());
            }
        }
        self.last_exited.sort_unstable();
        let start = self.completed.len() - self.last_exited.len();
        self.completed[start..].sort_unstable_by_key(|t| t.id());

        // 本帧离场的轨迹始终保留
        let keep = self.config.max_completed.max(self.last_exited.len());
        if self.completed.len() > keep {
            let excess = self.completed.len() - keep;
            self.completed.drain(..excess);
            trace!("丢弃最早的 {} 条离场轨迹", excess);
        }
    }

    /// 最近一次 update 中离场的轨迹 (位于 completed 末尾)
    pub fn newly_exited(&self) -> &[Track] {
        let start = self.completed.len().saturating_sub(self.last_exited.len());
        &self.completed[start..]
    }

    /// 非有限时间戳用上一帧时间代替
    fn sanitize_timestamp(&mut self, timestamp: f64) -> f64 {
        if !timestamp.is_finite() {
            let fallback = self.last_timestamp.unwrap_or(0.0);
            warn!(
                "⚠️  帧 {} 时间戳无效 ({}), 使用 {:.3}",
                self.frame_count, timestamp, fallback
            );
            return fallback;
        }
        if let Some(last) = self.last_timestamp {
            if timestamp < last {
                debug!("帧 {} 时间戳倒退: {:.3} < {:.3}", self.frame_count, timestamp, last);
            }
        }
        self.last_timestamp = Some(timestamp);
        timestamp
    }

    /// 当前存活轨迹
    pub fn active_tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// 已确认且本帧匹配成功的轨迹
    pub fn confirmed_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks
            .iter()
            .filter(|t| t.status() == TrackStatus::Active)
    }

    /// 已离场的轨迹
    pub fn completed_tracks(&self) -> &[Track] {
        &self.completed
    }

    /// 全部轨迹 (存活 + 离场)
    pub fn all_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().chain(self.completed.iter())
    }

    /// 最近一次 update 中离场的轨迹ID
    pub fn last_exited(&self) -> &[u64] {
        &self.last_exited
    }

    /// 取出已离场轨迹 (长时间运行时释放内存)
    pub fn drain_completed(&mut self) -> Vec<Track> {
        std::mem::take(&mut self.completed)
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.last_timestamp
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// 重置跟踪器 (ID 计数不回退)
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.completed.clear();
        self.last_exited.clear();
        self.frame_count = 0;
        self.last_timestamp = None;
    }

    /// 获取跟踪统计信息
    pub fn get_stats(&self) -> String {
        format!(
            "跟踪: {} 人 | 离场: {} | 总ID: {}",
            self.tracks.len(),
            self.completed.len(),
            self.next_id - 1
        )
    }
}

impl Default for PersonTracker {
    fn default() -> Self {
        Self::with_config(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::BBox;

    fn tracker(min_hits: u32, max_age: u32) -> PersonTracker {
        PersonTracker::new(TrackerConfig {
            min_hits,
            max_age,
            ..TrackerConfig::default()
        })
        .unwrap()
    }

    fn ids(tracks: &[Track]) -> Vec<u64> {
        tracks.iter().map(|t| t.id()).collect()
    }

    #[test]
    fn test_first_frame_creates_tracks() {
        let mut tracker = tracker(1, 30);
        let dets = [
            Detection::person(10.0, 10.0, 50.0, 50.0, 0.9),
            Detection::person(200.0, 10.0, 240.0, 50.0, 0.9),
        ];
        let tracks = tracker.update(&dets, 0.0);
        assert_eq!(ids(tracks), vec![1, 2]);
        assert!(tracks.iter().all(|t| t.status() == TrackStatus::Active));
    }

    #[test]
    fn test_shifted_boxes_keep_identity() {
        let mut tracker = tracker(1, 30);
        let a = Detection::person(10.0, 10.0, 50.0, 50.0, 0.9);
        let b = Detection::person(200.0, 10.0, 240.0, 50.0, 0.9);
        tracker.update(&[a.clone(), b.clone()], 0.0);

        let a2 = Detection::new(a.bbox.shifted(5.0, 5.0), 0.9, 0, "person");
        let b2 = Detection::new(b.bbox.shifted(5.0, 5.0), 0.9, 0, "person");
        let tracks = tracker.update(&[b2, a2], 0.1).to_vec();

        assert_eq!(ids(&tracks), vec![1, 2]);
        assert!(tracks.iter().all(|t| t.positions().len() == 2));
        assert_eq!(tracker.next_id(), 3);
        // 轨迹1 跟随左侧的框
        assert_eq!(tracks[0].positions()[1].x, 35.0);
    }

    #[test]
    fn test_greedy_prefers_highest_iou() {
        let mut tracker = tracker(1, 30);
        tracker.update(&[Detection::person(0.0, 0.0, 100.0, 100.0, 0.9)], 0.0);

        // 两个候选: 一个几乎重合, 一个部分重叠
        let near = Detection::person(2.0, 0.0, 102.0, 100.0, 0.9);
        let far = Detection::person(40.0, 0.0, 140.0, 100.0, 0.9);
        let tracks = tracker.update(&[far, near], 0.1);

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id(), 1);
        assert_eq!(tracks[0].last_bbox(), Some(&BBox::new(2.0, 0.0, 102.0, 100.0)));
        assert_eq!(tracks[1].id(), 2);
    }

    #[test]
    fn test_below_threshold_creates_new_track() {
        let mut tracker = tracker(1, 30);
        tracker.update(&[Detection::person(0.0, 0.0, 100.0, 100.0, 0.9)], 0.0);
        // IOU = 0.2 / 1.8 ≈ 0.11 < 0.3
        let tracks = tracker.update(&[Detection::person(80.0, 0.0, 180.0, 100.0, 0.9)], 0.1);
        assert_eq!(ids(tracks), vec![1, 2]);
        assert_eq!(tracks[0].frames_without_match(), 1);
    }

    #[test]
    fn test_matching_is_one_to_one() {
        let mut tracker = tracker(1, 30);
        let base = Detection::person(0.0, 0.0, 100.0, 100.0, 0.9);
        tracker.update(&[base.clone()], 0.0);

        // 两个检测都与同一轨迹高度重叠, 只能匹配一个
        let tracks = tracker.update(&[base.clone(), base.clone()], 0.1);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].hits(), 2);
        assert_eq!(tracks[1].hits(), 1);
    }

    #[test]
    fn test_exit_after_max_age() {
        let mut tracker = tracker(3, 2);
        let det = Detection::person(0.0, 0.0, 50.0, 50.0, 0.9);
        for i in 0..3 {
            tracker.update(&[det.clone()], i as f64);
        }
        assert_eq!(tracker.active_tracks()[0].status(), TrackStatus::Active);

        // max_age = 2: 第 3 次未匹配时离场
        tracker.update(&[], 3.0);
        assert_eq!(tracker.active_tracks()[0].status(), TrackStatus::Lost);
        tracker.update(&[], 4.0);
        assert_eq!(tracker.active_tracks().len(), 1);
        tracker.update(&[], 5.0);

        assert!(tracker.active_tracks().is_empty());
        assert_eq!(tracker.last_exited(), &[1]);
        let done = &tracker.completed_tracks()[0];
        assert_eq!(done.status(), TrackStatus::Exited);
        assert_eq!(done.exit_time(), Some(5.0));
        assert_eq!(done.exit_frame(), Some(6));
        assert_eq!(done.duration(), 5.0);
    }

    #[test]
    fn test_noise_tracks_are_dropped_silently() {
        let mut tracker = tracker(3, 1);
        tracker.update(&[Detection::person(0.0, 0.0, 50.0, 50.0, 0.9)], 0.0);
        tracker.update(&[], 0.1);
        tracker.update(&[], 0.2);

        assert!(tracker.active_tracks().is_empty());
        assert!(tracker.completed_tracks().is_empty());
        assert!(tracker.last_exited().is_empty());
        assert_eq!(tracker.all_tracks().count(), 0);
    }

    #[test]
    fn test_ids_never_reused() {
        let mut tracker = tracker(1, 1);
        let mut seen = Vec::new();
        for round in 0..5 {
            let x = round as f64 * 500.0;
            let det = Detection::person(x, 0.0, x + 40.0, 40.0, 0.9);
            let tracks = tracker.update(&[det], round as f64);
            seen.extend(ids(tracks));
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);

        tracker.reset();
        let tracks = tracker.update(&[Detection::person(0.0, 0.0, 10.0, 10.0, 0.9)], 0.0);
        assert_eq!(ids(tracks), vec![6]);
    }

    #[test]
    fn test_class_filter() {
        let mut tracker = tracker(1, 30);
        let bag = Detection::new(BBox::new(0.0, 0.0, 20.0, 20.0), 0.8, 24, "backpack");
        let tracks = tracker.update(&[bag.clone()], 0.0);
        assert!(tracks.is_empty());

        let mut all = PersonTracker::new(TrackerConfig {
            track_label: None,
            ..TrackerConfig::default()
        })
        .unwrap();
        assert_eq!(all.update(&[bag], 0.0).len(), 1);
    }

    #[test]
    fn test_bad_input_never_halts() {
        let mut tracker = tracker(1, 30);
        tracker.update(&[Detection::person(0.0, 0.0, 50.0, 50.0, 0.9)], 1.0);

        let garbage = Detection::person(f64::NAN, 0.0, -5.0, f64::INFINITY, 0.9);
        let tracks = tracker.update(&[garbage], f64::NAN);
        assert_eq!(tracks.len(), 2);
        // 无效时间戳被替换为上一帧时间
        assert_eq!(tracks[1].timestamps()[0], 1.0);
        assert_eq!(tracks[0].frames_without_match(), 1);
    }

    #[test]
    fn test_overflowing_box_does_not_block_matching() {
        let mut tracker = tracker(1, 30);
        let frame = [
            Detection::person(1e200, 1e200, 2e200, 2e200, 0.9),
            Detection::person(10.0, 10.0, 50.0, 50.0, 0.9),
        ];
        tracker.update(&frame, 0.0);
        let tracks = tracker.update(&frame, 0.1);

        // 正常框继续沿用ID 2, 异常框每帧新建轨迹
        assert_eq!(ids(tracks), vec![1, 2, 3]);
        let normal = tracks.iter().find(|t| t.id() == 2).unwrap();
        assert_eq!(normal.hits(), 2);
        assert_eq!(normal.frames_without_match(), 0);
    }

    #[test]
    fn test_completed_tracks_are_capped() {
        let mut tracker = PersonTracker::new(TrackerConfig {
            min_hits: 1,
            max_age: 1,
            max_completed: 2,
            ..TrackerConfig::default()
        })
        .unwrap();

        // 每轮一个新人出现后消失
        for round in 0..4u64 {
            let x = round as f64 * 300.0;
            let t = round as f64 * 10.0;
            tracker.update(&[Detection::person(x, 0.0, x + 40.0, 40.0, 0.9)], t);
            tracker.update(&[], t + 1.0);
            tracker.update(&[], t + 2.0);
            assert_eq!(tracker.last_exited(), &[round + 1]);
            assert_eq!(ids(tracker.newly_exited()), vec![round + 1]);
        }

        assert_eq!(ids(tracker.completed_tracks()), vec![3, 4]);
    }

    #[test]
    fn test_newly_exited_keeps_whole_frame() {
        let mut tracker = PersonTracker::new(TrackerConfig {
            min_hits: 1,
            max_age: 1,
            max_completed: 1,
            ..TrackerConfig::default()
        })
        .unwrap();
        let a = Detection::person(0.0, 0.0, 40.0, 40.0, 0.9);
        let b = Detection::person(300.0, 0.0, 340.0, 40.0, 0.9);
        tracker.update(&[a, b], 0.0);
        tracker.update(&[], 0.1);
        tracker.update(&[], 0.2);

        // 同一帧离场的轨迹全部保留, 且按ID排序
        assert_eq!(tracker.last_exited(), &[1, 2]);
        assert_eq!(ids(tracker.newly_exited()), vec![1, 2]);

        tracker.drain_completed();
        assert!(tracker.newly_exited().is_empty());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let bad = TrackerConfig {
            iou_threshold: 1.5,
            ..TrackerConfig::default()
        };
        assert!(PersonTracker::new(bad).is_err());
        assert!(PersonTracker::new(TrackerConfig {
            max_age: 0,
            ..TrackerConfig::default()
        })
        .is_err());
    }

    #[test]
    fn test_caller_frame_numbers() {
        let mut tracker = tracker(1, 30);
        let det = Detection::person(0.0, 0.0, 50.0, 50.0, 0.9);
        tracker.update_at_frame(&[det.clone()], 0.0, 10);
        let tracks = tracker.update_at_frame(&[det], 1.0, 20);
        assert_eq!(tracks[0].frame_numbers(), &[10, 20]);
        assert_eq!(tracks[0].entry_frame(), Some(10));
        assert_eq!(tracker.frame_count(), 20);
    }
}
