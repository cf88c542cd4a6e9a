// ==========================================
// ZoneClassifier 性质测试
// ==========================================
// 测试目标: 全定义域有结果 / 单调 / 与区间参考表一致
// ==========================================

use mo_rating_engine::domain::types::Zone;
use mo_rating_engine::domain::ZoneThresholds;
use mo_rating_engine::engine::ZoneClassifier;
use proptest::prelude::*;

fn band_contains(min: Option<f64>, max: Option<f64>, total: f64) -> bool {
    min.map_or(true, |m| total >= m) && max.map_or(true, |m| total < m)
}

proptest! {
    #[test]
    fn prop_every_total_gets_exactly_one_zone(total in -100.0f64..200.0) {
        let classifier = ZoneClassifier::new();
        let thresholds = ZoneThresholds::default();
        let zone = classifier.classify(total, &thresholds);

        let matching: Vec<Zone> = classifier
            .bands(&thresholds)
            .into_iter()
            .filter(|b| band_contains(b.min_score, b.max_score, total))
            .map(|b| b.zone)
            .collect();
        prop_assert_eq!(matching, vec![zone]);
    }

    #[test]
    fn prop_classification_is_monotonic(a in -100.0f64..200.0, b in -100.0f64..200.0) {
        let classifier = ZoneClassifier::new();
        let thresholds = ZoneThresholds::default();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(classifier.classify(lo, &thresholds) <= classifier.classify(hi, &thresholds));
    }

    #[test]
    fn prop_custom_thresholds_respected(
        yellow in 0.0f64..50.0,
        gap in 0.0f64..50.0,
        total in -10.0f64..120.0,
    ) {
        let thresholds = ZoneThresholds { green_min: yellow + gap, yellow_min: yellow };
        let classifier = ZoneClassifier::new();
        prop_assert!(classifier.validate(&thresholds).is_ok());

        let expected = if total >= thresholds.green_min {
            Zone::Green
        } else if total >= thresholds.yellow_min {
            Zone::Yellow
        } else {
            Zone::Red
        };
        prop_assert_eq!(classifier.classify(total, &thresholds), expected);
    }
}

#[test]
fn test_default_thresholds() {
    let t = ZoneThresholds::default();
    assert_eq!(t.green_min, 53.0);
    assert_eq!(t.yellow_min, 29.0);
}
