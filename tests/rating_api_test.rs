// ==========================================
// RatingApi 读侧接口测试
// ==========================================
// 测试目标: 排名 / 排序 / 分页 / 区间筛选 / 主体明细 / 对比 / 参考表 / CSV 导出
// ==========================================

mod test_helpers;

use mo_rating_engine::api::{ApiError, RatingApi, RatingQuery, RatingSortField, SortOrder};
use mo_rating_engine::domain::types::{Classification, Zone};
use mo_rating_engine::domain::ZoneThresholds;
use mo_rating_engine::engine::AggregationEngine;
use test_helpers::*;

/// 4 个主体: 60 / 38 / 38 / 5
fn seed_rated(ctx: &TestContext) -> RatingApi {
    seed_base(&ctx.repos, 4);
    insert_scores(&ctx.repos, 1, 1, 1, &[("pub_1", 30.0), ("closed_1", 30.0)]);
    insert_scores(&ctx.repos, 2, 1, 1, &[("pub_1", 20.0), ("closed_1", 20.0), ("pen_1", -2.0)]);
    insert_scores(&ctx.repos, 3, 1, 1, &[("pub_2", 28.0), ("closed_2", 10.0)]);
    insert_scores(&ctx.repos, 4, 1, 1, &[("pub_1", 5.0)]);

    let engine = AggregationEngine::new(ctx.repos.clone());
    for entity_id in 1..=4 {
        engine
            .aggregate(entity_id, 1, 1, &ZoneThresholds::default())
            .unwrap();
    }
    RatingApi::new(ctx.repos.clone(), ctx.config.clone())
}

#[test]
fn test_rating_table_ranks_with_ties() {
    let ctx = setup();
    let api = seed_rated(&ctx);

    let page = api.rating_table(&RatingQuery::new(1, 1)).unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.total_pages, 1);
    let ranks: Vec<(i64, usize)> = page.rows.iter().map(|r| (r.entity_id, r.rank)).collect();
    assert_eq!(ranks, vec![(1, 1), (2, 2), (3, 2), (4, 4)]);
    assert_eq!(page.rows[0].zone, Zone::Green);
    assert_eq!(page.rows[3].zone, Zone::Red);
    assert_eq!(page.rows[0].leader_name.as_deref(), Some("Глава 1"));
}

#[test]
fn test_sorting_keeps_rank_by_total() {
    let ctx = setup();
    let api = seed_rated(&ctx);

    let mut query = RatingQuery::new(1, 1);
    query.sort_by = RatingSortField::ScoreClosed;
    query.order = SortOrder::Asc;
    let page = api.rating_table(&query).unwrap();

    let ids: Vec<i64> = page.rows.iter().map(|r| r.entity_id).collect();
    assert_eq!(ids, vec![4, 3, 2, 1]);
    assert_eq!(page.rows[0].rank, 4);
}

#[test]
fn test_pagination() {
    let ctx = setup();
    let api = seed_rated(&ctx);

    let mut query = RatingQuery::new(1, 1);
    query.page_size = 3;
    query.page = 2;
    let page = api.rating_table(&query).unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.rows.len(), 1);
    assert_eq!(page.rows[0].entity_id, 4);

    query.page = 3;
    assert!(api.rating_table(&query).unwrap().rows.is_empty());

    query.page = 0;
    assert!(matches!(api.rating_table(&query), Err(ApiError::InvalidInput(_))));
    query.page = 1;
    query.page_size = 501;
    assert!(matches!(api.rating_table(&query), Err(ApiError::InvalidInput(_))));
}

#[test]
fn test_page_far_past_end_is_empty() {
    let ctx = setup();
    let api = seed_rated(&ctx);

    let mut query = RatingQuery::new(1, 1);
    query.page = usize::MAX / 2;
    query.page_size = 500;
    let page = api.rating_table(&query).unwrap();
    assert!(page.rows.is_empty());
    assert_eq!(page.total, 4);
    assert_eq!(page.total_pages, 1);

    query.page = usize::MAX;
    assert!(api.rating_table(&query).unwrap().rows.is_empty());
}

#[test]
fn test_entity_detail_groups_criteria_by_block() {
    let ctx = setup();
    let api = seed_rated(&ctx);
    set_block(&ctx.repos, 1, "pub_1", "Политический менеджмент");
    set_block(&ctx.repos, 1, "closed_1", "Политический менеджмент");
    set_block(&ctx.repos, 1, "pub_2", "Социальная сфера");

    let detail = api.entity_detail(2, 1, 1).unwrap();
    assert_eq!(detail.entity_name, "МО 02");
    assert_eq!(detail.leader_name.as_deref(), Some("Глава 2"));

    let blocks: Vec<(Option<&str>, f64, usize)> = detail
        .blocks
        .iter()
        .map(|b| (b.block.as_deref(), b.score, b.criteria.len()))
        .collect();
    assert_eq!(
        blocks,
        vec![
            (Some("Политический менеджмент"), 40.0, 2),
            (Some("Социальная сфера"), 0.0, 1),
            (None, -2.0, 3),
        ]
    );

    let codes: Vec<&str> = detail.blocks[0].criteria.iter().map(|c| c.code.as_str()).collect();
    assert_eq!(codes, vec!["closed_1", "pub_1"]);
    assert_eq!(
        detail.blocks[0].criteria[0].classification,
        Some(Classification::Closed)
    );
    assert!(!detail.blocks[1].criteria[0].observed);

    // 板块小计之和等于汇总总分
    let summary = detail.summary.unwrap();
    assert_eq!(summary.rank, 2);
    assert_eq!(summary.score_total, 38.0);
    let block_sum: f64 = detail.blocks.iter().map(|b| b.score).sum();
    assert_eq!(block_sum, summary.score_total);
}

#[test]
fn test_entity_detail_without_summary_and_unknown_ids() {
    let ctx = setup();
    let api = seed_rated(&ctx);
    insert_entity(&ctx.repos, 5, "МО 05");

    let detail = api.entity_detail(5, 1, 1).unwrap();
    assert!(detail.summary.is_none());
    assert_eq!(detail.blocks.len(), 1);
    assert!(detail.blocks[0].block.is_none());
    assert_eq!(detail.blocks[0].criteria.len(), 6);
    assert!(detail.blocks[0].criteria.iter().all(|c| c.score == 0.0 && !c.observed));

    assert!(matches!(api.entity_detail(99, 1, 1), Err(ApiError::NotFound(_))));
    assert!(matches!(api.entity_detail(1, 99, 1), Err(ApiError::NotFound(_))));
    assert!(matches!(
        api.entity_detail(1, 1, 42),
        Err(ApiError::MissingMethodology(42))
    ));
}

#[test]
fn test_zone_filter() {
    let ctx = setup();
    let api = seed_rated(&ctx);

    let mut query = RatingQuery::new(1, 1);
    query.zone = Some(Zone::Yellow);
    let page = api.rating_table(&query).unwrap();
    assert_eq!(page.total, 2);
    assert!(page.rows.iter().all(|r| r.zone == Zone::Yellow));
    // 名次仍按全表计算
    assert!(page.rows.iter().all(|r| r.rank == 2));
}

#[test]
fn test_unknown_methodology() {
    let ctx = setup();
    let api = seed_rated(&ctx);
    assert!(matches!(
        api.rating_table(&RatingQuery::new(77, 1)),
        Err(ApiError::MissingMethodology(77))
    ));
}

#[test]
fn test_compare_entities() {
    let ctx = setup();
    let api = seed_rated(&ctx);

    let comparison = api.compare_entities(&[4, 1], 1, 1).unwrap();
    assert_eq!(comparison.rows.len(), 2);
    assert_eq!(comparison.spread.score_total, 55.0);
    assert_eq!(comparison.spread.score_closed, 30.0);

    assert!(matches!(
        api.compare_entities(&[1, 1], 1, 1),
        Err(ApiError::InvalidInput(_))
    ));
    assert!(matches!(
        api.compare_entities(&[1, 99], 1, 1),
        Err(ApiError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_zone_reference_rows() {
    let ctx = setup();
    let api = seed_rated(&ctx);

    let rows = api.zone_reference(1).await.unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].zone, Zone::Green);
    assert_eq!(rows[0].min_score, Some(53.0));
    assert_eq!(rows[1].min_score, Some(29.0));
    assert_eq!(rows[1].max_score, Some(53.0));
    assert_eq!(rows[2].max_score, Some(29.0));
    assert!(rows.iter().all(|r| !r.label.is_empty() && r.color.starts_with('#')));
}

#[test]
fn test_methodology_info() {
    let ctx = setup();
    let api = seed_rated(&ctx);

    let info = api.methodology_info(1).unwrap();
    assert_eq!(info.criteria_total, 6);
    assert_eq!(info.max_total, 120.0);
    let penalty = info
        .by_classification
        .iter()
        .find(|c| c.classification == Some(Classification::Penalty))
        .unwrap();
    assert_eq!(penalty.criteria_count, 2);
    assert_eq!(api.list_methodologies().unwrap().len(), 1);
}

#[test]
fn test_data_stats() {
    let ctx = setup();
    let api = seed_rated(&ctx);

    let stats = api.data_stats().unwrap();
    assert_eq!(stats.entities, 4);
    assert_eq!(stats.periods, 1);
    assert_eq!(stats.criteria, 6);
    assert_eq!(stats.observations, 8);
    assert_eq!(stats.summaries, 4);
    assert_eq!(stats.observations_by_period.len(), 1);
    assert_eq!(stats.observations_by_period[0].observations, 8);
}

#[test]
fn test_export_csv() {
    let ctx = setup();
    let api = seed_rated(&ctx);

    let mut buffer: Vec<u8> = Vec::new();
    let written = api.export_rating_csv(&RatingQuery::new(1, 1), &mut buffer).unwrap();
    assert_eq!(written, 4);

    let text = String::from_utf8(buffer).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("rank,entity_id,entity_name"));
    assert!(lines[1].starts_with("1,1,МО 01"));
    assert!(lines[1].ends_with("GREEN"));
}
