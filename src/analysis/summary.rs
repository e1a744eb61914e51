// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 客流汇总统计与经营建议
//! Visitor summary and business insights

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::behavior::{BehaviorLabel, BehaviorResult};
use super::zones::CHECKOUT;

/// 汇总统计 (每次调用重新计算, 不持久化)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_visitors: usize,
    pub total_customers: usize,
    pub window_shoppers: usize,
    pub browsers: usize,
    pub purchasers: usize,
    pub passing_through: usize,
    pub idle: usize,
    /// 百分比, 保留两位小数
    pub conversion_rate: f64,
    /// 秒, 保留两位小数
    pub avg_visit_duration: f64,
    pub total_checkout_visitors: usize,
    pub behavior_distribution: BTreeMap<String, usize>,
}

/// 汇总一批行为分析结果
///
/// 空输入返回全零结果。
pub fn summarize(results: &[BehaviorResult]) -> Summary {
    if results.is_empty() {
        return Summary::default();
    }

    let total_visitors = results.len();
    let mut summary = Summary {
        total_visitors,
        ..Summary::default()
    };

    let mut duration_sum = 0.0;
    for result in results {
        *summary
            .behavior_distribution
            .entry(result.label.as_str().to_string())
            .or_insert(0) += 1;

        match result.label {
            BehaviorLabel::WindowShopping => summary.window_shoppers += 1,
            BehaviorLabel::Browsing => summary.browsers += 1,
            BehaviorLabel::PassingThrough => summary.passing_through += 1,
            BehaviorLabel::Idle => summary.idle += 1,
            BehaviorLabel::Purchasing | BehaviorLabel::Other(_) => {}
        }

        let visited_checkout = result.visited_checkout || result.zones_visited.contains(CHECKOUT);
        if result.label == BehaviorLabel::Purchasing || visited_checkout || result.made_purchase {
            summary.purchasers += 1;
        }
        if visited_checkout {
            summary.total_checkout_visitors += 1;
        }

        if result.duration_seconds.is_finite() {
            duration_sum += result.duration_seconds;
        }
    }

    summary.total_customers = summary.purchasers;
    summary.conversion_rate = round2(summary.purchasers as f64 / total_visitors as f64 * 100.0);
    summary.avg_visit_duration = round2(duration_sum / total_visitors as f64);
    summary
}

/// 经营建议
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Insights {
    pub summary: Summary,
    pub recommendations: Vec<Recommendation>,
}

/// 根据汇总结果生成建议
pub fn insights(results: &[BehaviorResult]) -> Insights {
    let summary = summarize(results);
    let mut recommendations = Vec::new();
    let total = summary.total_visitors as f64;

    if summary.conversion_rate < 20.0 {
        recommendations.push(Recommendation {
            kind: "conversion".to_string(),
            message: "Low conversion rate detected. Consider improving product placement or checkout process.".to_string(),
        });
    }
    if summary.total_visitors > 0 && summary.idle as f64 > total * 0.2 {
        recommendations.push(Recommendation {
            kind: "engagement".to_string(),
            message: "High number of idle visitors. Consider adding more engaging displays or staff assistance.".to_string(),
        });
    }
    if summary.total_visitors > 0 && summary.passing_through as f64 > total * 0.4 {
        recommendations.push(Recommendation {
            kind: "attention".to_string(),
            message: "Many visitors passing through. Consider improving store entrance appeal."
                .to_string(),
        });
    }

    Insights {
        summary,
        recommendations,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn result(label: BehaviorLabel, duration: f64) -> BehaviorResult {
        BehaviorResult {
            track_id: 1,
            correlation_token: None,
            label,
            confidence: 0.8,
            rationale: String::new(),
            zones_visited: BTreeSet::new(),
            visited_checkout: false,
            made_purchase: false,
            duration_seconds: duration,
            movement_distance: 0.0,
            avg_speed: 0.0,
            is_stationary: false,
            entry_time: None,
            exit_time: None,
            stops: Vec::new(),
            stationary_time: 0.0,
        }
    }

    #[test]
    fn test_empty_summary_is_zero() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_visitors, 0);
        assert_eq!(summary.conversion_rate, 0.0);
        assert_eq!(summary.avg_visit_duration, 0.0);
        assert!(summary.behavior_distribution.is_empty());
    }

    #[test]
    fn test_counts_and_rates() {
        let results = vec![
            result(BehaviorLabel::Purchasing, 120.0),
            result(BehaviorLabel::Browsing, 45.0),
            result(BehaviorLabel::WindowShopping, 2.0),
        ];
        let summary = summarize(&results);
        assert_eq!(summary.total_visitors, 3);
        assert_eq!(summary.purchasers, 1);
        assert_eq!(summary.total_customers, 1);
        assert_eq!(summary.browsers, 1);
        assert_eq!(summary.window_shoppers, 1);
        assert_eq!(summary.conversion_rate, 33.33);
        assert_eq!(summary.avg_visit_duration, 55.67);
    }

    #[test]
    fn test_purchasers_union() {
        let mut via_flag = result(BehaviorLabel::Browsing, 10.0);
        via_flag.made_purchase = true;
        let mut via_zone = result(BehaviorLabel::Idle, 10.0);
        via_zone.zones_visited.insert("checkout".to_string());
        let plain = result(BehaviorLabel::Browsing, 10.0);

        let summary = summarize(&[via_flag, via_zone, plain]);
        assert_eq!(summary.purchasers, 2);
        assert_eq!(summary.total_checkout_visitors, 1);
        assert_eq!(summary.conversion_rate, 66.67);
    }

    #[test]
    fn test_custom_labels_and_bad_durations() {
        let results = vec![
            result(BehaviorLabel::Other("loitering".to_string()), f64::NAN),
            result(BehaviorLabel::Other("loitering".to_string()), 4.0),
        ];
        let summary = summarize(&results);
        assert_eq!(summary.behavior_distribution.get("loitering"), Some(&2));
        assert_eq!(summary.avg_visit_duration, 2.0);
    }

    #[test]
    fn test_insights() {
        let results = vec![
            result(BehaviorLabel::PassingThrough, 1.0),
            result(BehaviorLabel::PassingThrough, 1.0),
            result(BehaviorLabel::Idle, 30.0),
            result(BehaviorLabel::Browsing, 30.0),
        ];
        let insights = insights(&results);
        let kinds: Vec<&str> = insights
            .recommendations
            .iter()
            .map(|r| r.kind.as_str())
            .collect();
        assert_eq!(kinds, vec!["conversion", "engagement", "attention"]);

        let happy = vec![result(BehaviorLabel::Purchasing, 60.0)];
        assert!(super::insights(&happy).recommendations.is_empty());
    }
}
