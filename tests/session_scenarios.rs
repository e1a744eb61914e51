// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 端到端场景测试

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use store_sentinel::analysis::summarize;
use store_sentinel::config::TrackerConfig;
use store_sentinel::{
    AlertEngine, AlertLevel, AlertType, AnalyticsConfig, BehaviorAnalyzer, BehaviorLabel,
    CameraSession, Detection, PersonTracker, Track, TrackStatus, ZoneClassifier,
};

fn analyzer() -> BehaviorAnalyzer {
    let config = AnalyticsConfig::default();
    let zones = Arc::new(ZoneClassifier::from_layout(&config.zones).unwrap());
    BehaviorAnalyzer::new(&config, zones).unwrap()
}

fn people(n: usize) -> Vec<Track> {
    (0..n)
        .map(|i| {
            let x = 30.0 + i as f64 * 60.0;
            Track::from_history(i as u64 + 1, &[(x, 100.0), (x + 2.0, 100.0)], &[0.0, 0.5])
        })
        .collect()
}

#[test]
fn test_two_new_people_get_ids_one_and_two() {
    let mut tracker = PersonTracker::new(TrackerConfig {
        min_hits: 1,
        ..TrackerConfig::default()
    })
    .unwrap();
    let a = Detection::person(10.0, 10.0, 50.0, 50.0, 0.9);
    let b = Detection::person(200.0, 10.0, 240.0, 50.0, 0.9);

    let tracks = tracker.update(&[a.clone(), b.clone()], 0.0);
    let ids: Vec<u64> = tracks.iter().map(|t| t.id()).collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(tracks.iter().all(|t| t.status() == TrackStatus::Active));

    // 第 2 帧: 两个框各平移 5 像素, 沿用原ID
    let shifted = [
        Detection::new(a.bbox.shifted(5.0, 5.0), 0.9, 0, "person"),
        Detection::new(b.bbox.shifted(5.0, 5.0), 0.9, 0, "person"),
    ];
    let tracks = tracker.update(&shifted, 1.0 / 30.0);
    let ids: Vec<u64> = tracks.iter().map(|t| t.id()).collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(tracks.iter().all(|t| t.positions().len() == 2));
    assert_eq!(tracker.next_id(), 3);
}

#[test]
fn test_checkout_visit_means_purchasing() {
    let points = [
        (100.0, 300.0),
        (500.0, 300.0),
        (640.0, 650.0),
        (650.0, 650.0),
        (900.0, 300.0),
        (1200.0, 300.0),
    ];
    let timestamps = [0.0, 20.0, 50.0, 80.0, 100.0, 120.0];
    let track = Track::from_history(1, &points, &timestamps);

    let result = analyzer().analyze(&track);
    assert_eq!(result.duration_seconds, 120.0);
    assert_eq!(result.label, BehaviorLabel::Purchasing);
    assert_eq!(result.confidence, 0.9);
    assert!(result.visited_checkout);
    for zone in ["entry", "main_area", "checkout", "exit"] {
        assert!(result.zones_visited.contains(zone), "missing zone {}", zone);
    }
}

#[test]
fn test_slow_browsing_has_lower_confidence() {
    let xs = [600.0, 630.0, 660.0, 690.0, 720.0, 750.3];
    let points: Vec<(f64, f64)> = xs.iter().map(|&x| (x, 200.0)).collect();
    let timestamps = [0.0, 9.0, 18.0, 27.0, 36.0, 45.0];
    let track = Track::from_history(4, &points, &timestamps);

    let result = analyzer().analyze(&track);
    assert_eq!(result.duration_seconds, 45.0);
    assert!(!result.visited_checkout);
    assert_eq!(result.label, BehaviorLabel::Browsing);
    assert!((result.avg_speed - 3.34).abs() < 0.01);
    assert_eq!(result.confidence, 0.75);
}

#[test]
fn test_crowd_alert_lifecycle() {
    let engine = AlertEngine::new(&AnalyticsConfig::default()).unwrap();
    let notified = Arc::new(AtomicUsize::new(0));
    let counter = notified.clone();
    engine.register_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let alerts = engine.evaluate(&people(12), 1.0);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].message, "Crowd detected: 12 people");
    assert_eq!(alerts[0].level, AlertLevel::Warning);

    for frame in 2..10 {
        assert!(engine.evaluate(&people(11), frame as f64).is_empty());
        assert_eq!(engine.active(Some(AlertType::CrowdDetected)).len(), 1);
    }
    let open = engine.active(Some(AlertType::CrowdDetected));
    assert_eq!(open[0].details["current_count"], serde_json::json!(11));

    assert!(engine.evaluate(&people(5), 10.0).is_empty());
    assert!(engine.active(Some(AlertType::CrowdDetected)).is_empty());
    let stats = engine.statistics();
    assert_eq!(stats.total_alerts, 1);
    assert_eq!(stats.resolved_alerts, 1);

    // 新建 1 次 + 人数从 12 变为 11 更新 1 次
    assert_eq!(notified.load(Ordering::SeqCst), 2);
}

#[test]
fn test_empty_summary() {
    let summary = summarize(&[]);
    assert_eq!(summary.total_visitors, 0);
    assert_eq!(summary.purchasers, 0);
    assert_eq!(summary.conversion_rate, 0.0);
    assert_eq!(summary.avg_visit_duration, 0.0);
}

#[test]
fn test_session_end_to_end() {
    let mut config = AnalyticsConfig::default();
    config.tracker.max_age = 5;
    let mut session = CameraSession::new("front-door", config).unwrap();

    // 顾客 A: 入口 → 收银台, 20 秒后离开画面; 顾客 B: 快速路过
    let fps = 10.0;
    let mut frame = 0u64;
    for i in 0..200u64 {
        frame += 1;
        let t = i as f64 / fps;
        let ax = 100.0 + i as f64 * 2.7;
        let ay = 300.0 + i as f64 * 1.5;
        let mut dets = vec![Detection::person(ax - 25.0, ay - 60.0, ax + 25.0, ay + 60.0, 0.9)];
        if i < 12 {
            let bx = 50.0 + i as f64 * 8.0;
            dets.push(Detection::person(bx - 25.0, 100.0, bx + 25.0, 220.0, 0.8));
        }
        session.process_frame(&dets, t, frame);
    }
    for _ in 0..10 {
        frame += 1;
        session.process_frame(&[], frame as f64 / fps, frame);
    }

    let report = session.finish();
    assert_eq!(report.frames_processed, 210);
    assert_eq!(report.results.len(), 2);

    let a = report.results.iter().find(|r| r.track_id == 1).unwrap();
    assert_eq!(a.label, BehaviorLabel::Purchasing);
    let b = report.results.iter().find(|r| r.track_id == 2).unwrap();
    assert_eq!(b.label, BehaviorLabel::PassingThrough);

    assert_eq!(report.summary.total_visitors, 2);
    assert_eq!(report.summary.conversion_rate, 50.0);
    assert_eq!(report.alert_stats.total_alerts, 0);
}
