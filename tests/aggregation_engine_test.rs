// ==========================================
// AggregationEngine 聚合引擎集成测试
// ==========================================
// 测试目标: 分项求和 / 保底 / 区间 / 零观测 / 幂等 / 顺序无关
// ==========================================

mod test_helpers;

use mo_rating_engine::domain::types::{Classification, Zone};
use mo_rating_engine::domain::{Criterion, Observation, UnitKey, ZoneThresholds};
use mo_rating_engine::engine::{
    AggregationEngine, Aggregator, ConsistencyRepair, CriteriaCatalog, EngineError, RepairScope,
};
use mo_rating_engine::domain::types::ClassificationPrefixes;
use proptest::prelude::*;
use test_helpers::*;

fn thresholds() -> ZoneThresholds {
    ZoneThresholds::default()
}

// ==========================================
// 场景测试
// ==========================================

#[test]
fn test_scenario_a_partition_sums() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);
    insert_scores(
        &ctx.repos,
        1,
        1,
        1,
        &[("pub_1", 3.0), ("pub_2", 5.0), ("closed_1", 4.0), ("pen_1", -3.0)],
    );

    let engine = AggregationEngine::new(ctx.repos.clone());
    let agg = engine.aggregate(1, 1, 1, &thresholds()).unwrap();

    assert_eq!(agg.score_public, 8.0);
    assert_eq!(agg.score_closed, 4.0);
    assert_eq!(agg.score_penalties, -3.0);
    assert_eq!(agg.score_total, 9.0);
    assert_eq!(agg.zone, Zone::Red);
    assert!(agg.updated_at.is_some());

    let stored = ctx
        .repos
        .aggregate_repo
        .find(UnitKey::new(1, 1, 1))
        .unwrap()
        .unwrap();
    assert!(stored.same_scores(&agg));
}

#[test]
fn test_scenario_b_green_zone() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);
    insert_scores(&ctx.repos, 1, 1, 1, &[("pub_1", 30.0), ("pub_2", 20.0), ("closed_1", 10.0)]);

    let agg = AggregationEngine::new(ctx.repos.clone())
        .aggregate(1, 1, 1, &thresholds())
        .unwrap();
    assert_eq!(agg.score_total, 60.0);
    assert_eq!(agg.zone, Zone::Green);
}

#[test]
fn test_scenario_c_yellow_zone() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);
    insert_scores(&ctx.repos, 1, 1, 1, &[("pub_1", 20.0), ("closed_1", 20.0)]);

    let agg = AggregationEngine::new(ctx.repos.clone())
        .aggregate(1, 1, 1, &thresholds())
        .unwrap();
    assert_eq!(agg.score_total, 40.0);
    assert_eq!(agg.zone, Zone::Yellow);
}

#[test]
fn test_scenario_d_no_observations_writes_zero_row() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);

    let agg = AggregationEngine::new(ctx.repos.clone())
        .aggregate(1, 1, 1, &thresholds())
        .unwrap();
    assert_eq!(agg.score_public, 0.0);
    assert_eq!(agg.score_closed, 0.0);
    assert_eq!(agg.score_penalties, 0.0);
    assert_eq!(agg.score_total, 0.0);
    assert_eq!(agg.zone, Zone::Red);
    assert_eq!(ctx.repos.aggregate_repo.count_all().unwrap(), 1);
}

#[test]
fn test_scenario_e_repair_then_aggregate_unclassified() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);
    insert_criterion(&ctx.repos, 1, "pub_9", None, 0.0, 10.0);
    insert_scores(&ctx.repos, 1, 1, 1, &[("pub_9", 5.0), ("closed_1", 2.0)]);

    // 修复前: 未分类标准导致单元失败
    let engine = AggregationEngine::new(ctx.repos.clone());
    let err = engine.aggregate(1, 1, 1, &thresholds()).unwrap_err();
    assert!(matches!(err, EngineError::UnclassifiedCriterion { .. }));
    assert!(ctx.repos.aggregate_repo.find(UnitKey::new(1, 1, 1)).unwrap().is_none());

    let report = ConsistencyRepair::new(ctx.repos.clone())
        .run(1, &RepairScope::default(), &ClassificationPrefixes::default(), None)
        .unwrap();
    assert_eq!(report.criteria_classified, 1);

    let agg = engine.aggregate(1, 1, 1, &thresholds()).unwrap();
    assert_eq!(agg.score_public, 5.0);
    assert_eq!(agg.score_closed, 2.0);
    assert_eq!(agg.score_total, 7.0);
}

#[test]
fn test_total_is_floored_at_zero() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);
    insert_scores(&ctx.repos, 1, 1, 1, &[("pub_1", 2.0), ("pen_1", -8.0), ("pen_2", -6.0)]);

    let agg = AggregationEngine::new(ctx.repos.clone())
        .aggregate(1, 1, 1, &thresholds())
        .unwrap();
    assert_eq!(agg.score_penalties, -14.0);
    assert_eq!(agg.score_total, 0.0);
    assert!(agg.score_total.is_sign_positive());
    assert_eq!(agg.zone, Zone::Red);
}

#[test]
fn test_threshold_boundaries_are_inclusive() {
    let ctx = setup();
    seed_base(&ctx.repos, 2);
    insert_scores(&ctx.repos, 1, 1, 1, &[("pub_1", 30.0), ("closed_1", 23.0)]);
    insert_scores(&ctx.repos, 2, 1, 1, &[("pub_1", 29.0)]);

    let engine = AggregationEngine::new(ctx.repos.clone());
    assert_eq!(engine.aggregate(1, 1, 1, &thresholds()).unwrap().zone, Zone::Green);
    assert_eq!(engine.aggregate(2, 1, 1, &thresholds()).unwrap().zone, Zone::Yellow);
}

#[test]
fn test_null_scores_resolve_from_raw_then_zero() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);
    insert_observation(&ctx.repos, 1, 1, 1, "pub_1", Some(12.0), None);
    insert_observation(&ctx.repos, 1, 1, 1, "closed_1", None, None);
    insert_observation(&ctx.repos, 1, 1, 1, "closed_2", Some(99.0), Some(7.0));

    let agg = AggregationEngine::new(ctx.repos.clone())
        .aggregate(1, 1, 1, &thresholds())
        .unwrap();
    assert_eq!(agg.score_public, 12.0);
    assert_eq!(agg.score_closed, 7.0);
}

#[test]
fn test_missing_methodology_is_reported() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);

    let err = AggregationEngine::new(ctx.repos.clone())
        .aggregate(1, 1, 42, &thresholds())
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingMethodology(42)));
    assert!(!err.is_fatal());
}

#[test]
fn test_methodology_versions_are_isolated() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);
    insert_methodology(&ctx.repos, 2);
    insert_criterion(&ctx.repos, 2, "pub_1", Some(Classification::Public), 0.0, 100.0);
    insert_scores(&ctx.repos, 1, 1, 1, &[("pub_1", 10.0)]);
    insert_scores(&ctx.repos, 1, 1, 2, &[("pub_1", 70.0)]);

    let engine = AggregationEngine::new(ctx.repos.clone());
    let v1 = engine.aggregate(1, 1, 1, &thresholds()).unwrap();
    let v2 = engine.aggregate(1, 1, 2, &thresholds()).unwrap();
    assert_eq!(v1.score_total, 10.0);
    assert_eq!(v2.score_total, 70.0);
    assert_eq!(v2.zone, Zone::Green);
}

#[test]
fn test_reaggregation_is_idempotent() {
    let ctx = setup();
    seed_base(&ctx.repos, 2);
    insert_scores(&ctx.repos, 1, 1, 1, &[("pub_1", 0.1), ("pub_2", 0.2), ("closed_1", 0.3)]);
    insert_scores(&ctx.repos, 2, 1, 1, &[("pen_1", -1.5)]);

    let engine = AggregationEngine::new(ctx.repos.clone());
    for entity_id in 1..=2 {
        engine.aggregate(entity_id, 1, 1, &thresholds()).unwrap();
    }
    let first = summary_snapshot(&ctx.conn);

    std::thread::sleep(std::time::Duration::from_millis(5));
    for entity_id in 1..=2 {
        engine.aggregate(entity_id, 1, 1, &thresholds()).unwrap();
    }
    let second = summary_snapshot(&ctx.conn);

    assert_eq!(first, second);
}

#[test]
fn test_changed_scores_refresh_updated_at() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);
    insert_scores(&ctx.repos, 1, 1, 1, &[("pub_1", 10.0)]);

    let engine = AggregationEngine::new(ctx.repos.clone());
    let before = engine.aggregate(1, 1, 1, &thresholds()).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    insert_scores(&ctx.repos, 1, 1, 1, &[("pub_1", 11.0)]);
    let after = engine.aggregate(1, 1, 1, &thresholds()).unwrap();

    assert_eq!(after.score_total, 11.0);
    assert!(after.updated_at > before.updated_at);
}

// ==========================================
// 性质测试 (纯折叠, 不访问存储)
// ==========================================

fn catalog_for(codes: &[(String, Classification)]) -> CriteriaCatalog {
    CriteriaCatalog::from_criteria(
        1,
        codes
            .iter()
            .map(|(code, classification)| {
                let (point_min, point_max) = match classification {
                    Classification::Penalty => (-100.0, 0.0),
                    _ => (0.0, 100.0),
                };
                Criterion {
                    methodology_version_id: 1,
                    code: code.clone(),
                    name: code.clone(),
                    block: None,
                    classification: Some(*classification),
                    point_min,
                    point_max,
                }
            })
            .collect(),
    )
}

fn observation_strategy() -> impl Strategy<Value = Vec<(Classification, f64)>> {
    prop::collection::vec(
        prop_oneof![
            (0.0f64..30.0).prop_map(|s| (Classification::Public, s)),
            (0.0f64..30.0).prop_map(|s| (Classification::Closed, s)),
            (-10.0f64..=0.0).prop_map(|s| (Classification::Penalty, s)),
        ],
        0..24,
    )
}

fn build(items: &[(Classification, f64)]) -> (CriteriaCatalog, Vec<Observation>) {
    let codes: Vec<(String, Classification)> = items
        .iter()
        .enumerate()
        .map(|(i, (c, _))| (format!("{}_{:03}", c.to_db_str().to_lowercase(), i), *c))
        .collect();
    let observations = codes
        .iter()
        .zip(items)
        .map(|((code, _), (_, score))| Observation {
            entity_id: 1,
            period_id: 1,
            criterion_code: code.clone(),
            methodology_version_id: 1,
            raw_value: None,
            score: Some(*score),
        })
        .collect();
    (catalog_for(&codes), observations)
}

proptest! {
    #[test]
    fn prop_partitions_are_exhaustive_and_floored(items in observation_strategy()) {
        let (catalog, observations) = build(&items);
        let b = Aggregator::new().fold(&observations, &catalog, &thresholds()).unwrap();

        let observed: f64 = items.iter().map(|(_, s)| s).sum();
        prop_assert!((b.pre_floor_total() - observed).abs() < 1e-6);
        prop_assert!(b.score_total >= 0.0);
        prop_assert!(b.score_penalties <= 0.0);
        prop_assert_eq!(b.score_total, b.pre_floor_total().max(0.0));
        prop_assert_eq!(b.observation_count, items.len());
    }

    #[test]
    fn prop_fold_is_order_independent(items in observation_strategy(), rotate in 0usize..24) {
        let (catalog, observations) = build(&items);
        let mut shuffled = observations.clone();
        shuffled.reverse();
        if !shuffled.is_empty() {
            let k = rotate % shuffled.len();
            shuffled.rotate_left(k);
        }

        let a = Aggregator::new().fold(&observations, &catalog, &thresholds()).unwrap();
        let b = Aggregator::new().fold(&shuffled, &catalog, &thresholds()).unwrap();
        prop_assert_eq!(a.score_public.to_bits(), b.score_public.to_bits());
        prop_assert_eq!(a.score_closed.to_bits(), b.score_closed.to_bits());
        prop_assert_eq!(a.score_penalties.to_bits(), b.score_penalties.to_bits());
        prop_assert_eq!(a.score_total.to_bits(), b.score_total.to_bits());
        prop_assert_eq!(a.zone, b.zone);
    }
}
