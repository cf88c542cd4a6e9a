// ==========================================
// ConsistencyRepair 一致性修复测试
// ==========================================
// 测试目标: 分类补齐 / 分值回填 / 异常只标记不改写 / 幂等 / 范围
// ==========================================

mod test_helpers;

use mo_rating_engine::domain::types::{Classification, ClassificationPrefixes};
use mo_rating_engine::domain::FlagType;
use mo_rating_engine::engine::{ConsistencyRepair, EngineError, RepairScope};
use test_helpers::*;

fn repair(ctx: &TestContext, scope: &RepairScope) -> mo_rating_engine::engine::RepairReport {
    ConsistencyRepair::new(ctx.repos.clone())
        .run(1, scope, &ClassificationPrefixes::default(), None)
        .unwrap()
}

#[test]
fn test_classifies_by_code_prefix() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);
    insert_criterion(&ctx.repos, 1, "pub_10", None, 0.0, 5.0);
    insert_criterion(&ctx.repos, 1, "closed_10", None, 0.0, 5.0);
    insert_criterion(&ctx.repos, 1, "pen_10", None, -5.0, 0.0);
    insert_criterion(&ctx.repos, 1, "other_1", None, 0.0, 5.0);

    let report = repair(&ctx, &RepairScope::default());
    assert_eq!(report.criteria_classified, 3);
    assert_eq!(report.unresolved_criteria, vec!["other_1".to_string()]);

    let repo = &ctx.repos.criterion_repo;
    let class_of = |code: &str| repo.find_by_code(1, code).unwrap().unwrap().classification;
    assert_eq!(class_of("pub_10"), Some(Classification::Public));
    assert_eq!(class_of("closed_10"), Some(Classification::Closed));
    assert_eq!(class_of("pen_10"), Some(Classification::Penalty));
    assert_eq!(class_of("other_1"), None);
}

#[test]
fn test_custom_prefixes() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);
    insert_criterion(&ctx.repos, 1, "o_1", None, 0.0, 5.0);
    insert_criterion(&ctx.repos, 1, "z_1", None, 0.0, 5.0);

    let prefixes = ClassificationPrefixes {
        public: "o_".to_string(),
        closed: "z_".to_string(),
        penalty: "s_".to_string(),
    };
    let report = ConsistencyRepair::new(ctx.repos.clone())
        .run(1, &RepairScope::default(), &prefixes, None)
        .unwrap();
    assert_eq!(report.criteria_classified, 2);
    let classification = ctx
        .repos
        .criterion_repo
        .find_by_code(1, "z_1")
        .unwrap()
        .unwrap()
        .classification;
    assert_eq!(classification, Some(Classification::Closed));
}

#[test]
fn test_existing_classification_is_never_overwritten() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);
    // 代码前缀看似公开, 但已明确登记为封闭
    insert_criterion(&ctx.repos, 1, "pub_x", Some(Classification::Closed), 0.0, 5.0);

    let report = repair(&ctx, &RepairScope::default());
    assert_eq!(report.criteria_classified, 0);
    let c = ctx.repos.criterion_repo.find_by_code(1, "pub_x").unwrap().unwrap();
    assert_eq!(c.classification, Some(Classification::Closed));
}

#[test]
fn test_backfills_null_scores_from_raw_then_zero() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);
    insert_observation(&ctx.repos, 1, 1, 1, "pub_1", Some(7.5), None);
    insert_observation(&ctx.repos, 1, 1, 1, "pub_2", None, None);
    insert_observation(&ctx.repos, 1, 1, 1, "closed_1", Some(1.0), Some(2.0));

    let report = repair(&ctx, &RepairScope::default());
    assert_eq!(report.scores_from_raw, 1);
    assert_eq!(report.scores_defaulted_to_zero, 1);

    let observations = ctx.repos.observation_repo.fetch_observations(1, 1, 1).unwrap();
    let score_of = |code: &str| {
        observations
            .iter()
            .find(|o| o.criterion_code == code)
            .and_then(|o| o.score)
    };
    assert_eq!(score_of("pub_1"), Some(7.5));
    assert_eq!(score_of("pub_2"), Some(0.0));
    assert_eq!(score_of("closed_1"), Some(2.0));
}

#[test]
fn test_out_of_range_and_sign_violations_are_flagged_not_rewritten() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);
    insert_scores(&ctx.repos, 1, 1, 1, &[("pub_1", 45.0), ("pen_1", 3.0)]);

    let report = repair(&ctx, &RepairScope::default());
    assert_eq!(report.out_of_range_scores, 1);
    assert_eq!(report.penalty_sign_violations, 1);
    assert_eq!(report.corrections(), 0);

    let observations = ctx.repos.observation_repo.fetch_observations(1, 1, 1).unwrap();
    assert!(observations.iter().any(|o| o.criterion_code == "pub_1" && o.score == Some(45.0)));
    assert!(observations.iter().any(|o| o.criterion_code == "pen_1" && o.score == Some(3.0)));

    let counts = ctx.repos.quality_repo.count_by_type(1, None).unwrap();
    assert!(counts.contains(&(FlagType::OutOfRange, 1)));
    assert!(counts.contains(&(FlagType::PenaltySign, 1)));
}

#[test]
fn test_repair_is_idempotent() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);
    insert_criterion(&ctx.repos, 1, "pub_10", None, 0.0, 5.0);
    insert_observation(&ctx.repos, 1, 1, 1, "pub_10", Some(3.0), None);

    let first = repair(&ctx, &RepairScope::default());
    assert_eq!(first.corrections(), 2);

    let second = repair(&ctx, &RepairScope::default());
    assert_eq!(second.corrections(), 0);
    assert_eq!(second.anomalies(), 0);
}

#[test]
fn test_scope_limits_observation_backfill() {
    let ctx = setup();
    seed_base(&ctx.repos, 2);
    insert_observation(&ctx.repos, 1, 1, 1, "pub_1", Some(4.0), None);
    insert_observation(&ctx.repos, 2, 1, 1, "pub_1", Some(6.0), None);

    let scope = RepairScope {
        period_id: Some(1),
        entity_ids: Some(vec![2]),
    };
    let report = repair(&ctx, &scope);
    assert_eq!(report.scores_from_raw, 1);

    let untouched = ctx.repos.observation_repo.fetch_observations(1, 1, 1).unwrap();
    assert_eq!(untouched[0].score, None);
    let repaired = ctx.repos.observation_repo.fetch_observations(2, 1, 1).unwrap();
    assert_eq!(repaired[0].score, Some(6.0));
}

#[test]
fn test_missing_methodology() {
    let ctx = setup();
    seed_base(&ctx.repos, 1);

    let err = ConsistencyRepair::new(ctx.repos.clone())
        .run(9, &RepairScope::default(), &ClassificationPrefixes::default(), None)
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingMethodology(9)));
}
