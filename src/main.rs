// ==========================================
// 市级治理效能评分系统 - 命令行入口
// ==========================================
// 职责: 建库 / 演示数据 / 修复 / 聚合 / 评分表 / 区间参考 / 统计 / 运行日志
// ==========================================

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use mo_rating_engine::api::{ObservationInput, RatingQuery, RatingSortField, SortOrder};
use mo_rating_engine::app::{get_default_db_path, AppState};
use mo_rating_engine::domain::types::PeriodType;
use mo_rating_engine::engine::AggregationScope;
use mo_rating_engine::{
    i18n, logging, AggregationTrigger, Classification, Criterion, Entity, MethodologyVersion,
    Period,
};

#[derive(Parser, Debug)]
#[command(
    name = "mo-rating",
    about = "Aggregate municipal governance ratings and classify risk zones",
    version
)]
struct Cli {
    /// Database file (defaults to MO_RATING_DB_PATH or the user data directory)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Output locale for zone labels (ru / en)
    #[arg(long, global = true, default_value = "ru")]
    locale: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the schema if missing
    Init,
    /// Load a small demo dataset (one methodology, three entities, one period)
    SeedDemo,
    /// Run the consistency repair for a methodology version
    Repair {
        #[arg(long = "version")]
        methodology_version_id: i64,
    },
    /// Run batch aggregation over the given scope
    Aggregate(AggregateArgs),
    /// Print the rating table
    Rating(RatingArgs),
    /// Print one entity's criteria grouped by block
    Detail {
        #[arg(long = "entity")]
        entity_id: i64,
        #[arg(long = "period")]
        period_id: i64,
        #[arg(long = "version")]
        methodology_version_id: i64,
    },
    /// Print the zone reference table
    Zones {
        #[arg(long = "version")]
        methodology_version_id: i64,
    },
    /// Print row counts per table
    Stats,
    /// Print recent aggregation runs
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Args, Debug)]
struct AggregateArgs {
    #[arg(long = "period")]
    period_id: Option<i64>,
    #[arg(long = "version")]
    methodology_version_id: Option<i64>,
    /// Restrict to these entities (repeatable)
    #[arg(long = "entity")]
    entity_ids: Vec<i64>,
    /// IMPORT_COMPLETED / METHODOLOGY_CHANGED / MANUAL / SCHEDULED
    #[arg(long, default_value = "MANUAL")]
    trigger: String,
    #[arg(long)]
    source: Option<String>,
}

#[derive(Args, Debug)]
struct RatingArgs {
    #[arg(long = "period")]
    period_id: i64,
    #[arg(long = "version")]
    methodology_version_id: i64,
    /// score_total / score_public / score_closed / entity_name
    #[arg(long, default_value = "score_total")]
    sort: String,
    #[arg(long, default_value = "desc")]
    order: String,
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long, default_value_t = 50)]
    page_size: usize,
    /// Write the full table as CSV to this file instead of printing
    #[arg(long)]
    csv: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    i18n::set_locale(&cli.locale);

    let db_path = cli.db.clone().unwrap_or_else(get_default_db_path);
    let state = AppState::new(db_path).map_err(|e| anyhow!(e))?;

    match cli.command {
        Command::Init => {
            println!("schema ready: {}", state.db_path);
        }
        Command::SeedDemo => seed_demo(&state)?,
        Command::Repair {
            methodology_version_id,
        } => {
            let report = state
                .aggregation_api
                .repair(methodology_version_id)
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Aggregate(args) => run_aggregate(&state, args).await?,
        Command::Rating(args) => print_rating(&state, args)?,
        Command::Detail {
            entity_id,
            period_id,
            methodology_version_id,
        } => {
            let detail = state
                .rating_api
                .entity_detail(entity_id, period_id, methodology_version_id)?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }
        Command::Zones {
            methodology_version_id,
        } => {
            let rows = state
                .rating_api
                .zone_reference(methodology_version_id)
                .await?;
            for row in rows {
                let min = row.min_score.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
                let max = row.max_score.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
                println!(
                    "{:<8} {:<10} [{}, {})  {}  {}",
                    row.zone.as_str(),
                    row.label,
                    min,
                    max,
                    row.status,
                    row.color
                );
            }
        }
        Command::Stats => {
            let stats = state.rating_api.data_stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Runs { limit } => {
            let runs = state.aggregation_api.recent_runs(limit)?;
            println!("{}", serde_json::to_string_pretty(&runs)?);
        }
    }

    Ok(())
}

async fn run_aggregate(state: &AppState, args: AggregateArgs) -> Result<()> {
    let trigger = AggregationTrigger::from_str(&args.trigger)
        .ok_or_else(|| anyhow!("unknown trigger: {}", args.trigger))?;
    let scope = AggregationScope {
        period_id: args.period_id,
        methodology_version_id: args.methodology_version_id,
        entity_ids: if args.entity_ids.is_empty() {
            None
        } else {
            Some(args.entity_ids)
        },
    };

    let report = state
        .aggregation_api
        .run_aggregation(&scope, trigger, args.source.as_deref())
        .await?;

    if report.cancelled {
        println!(
            "{}",
            i18n::t_with_args(
                "aggregation.cancelled",
                &[("pending", &report.pending.len().to_string())]
            )
        );
    } else {
        println!(
            "{}",
            i18n::t_with_args(
                "aggregation.finished",
                &[
                    ("succeeded", &report.succeeded.len().to_string()),
                    ("failed", &report.failed.len().to_string()),
                ]
            )
        );
    }
    for failure in &report.failed {
        println!("  {} {}: {}", failure.unit, failure.kind, failure.reason);
    }
    Ok(())
}

fn print_rating(state: &AppState, args: RatingArgs) -> Result<()> {
    let mut query = RatingQuery::new(args.methodology_version_id, args.period_id);
    query.sort_by = RatingSortField::from_str(&args.sort)
        .ok_or_else(|| anyhow!("unknown sort field: {}", args.sort))?;
    query.order =
        SortOrder::from_str(&args.order).ok_or_else(|| anyhow!("unknown order: {}", args.order))?;
    query.page = args.page;
    query.page_size = args.page_size;

    if let Some(path) = args.csv {
        let file = std::fs::File::create(&path).with_context(|| format!("create {}", path))?;
        let written = state.rating_api.export_rating_csv(&query, file)?;
        println!("{} rows → {}", written, path);
        return Ok(());
    }

    let page = state.rating_api.rating_table(&query)?;
    println!(
        "{}",
        i18n::t_with_args(
            "rating.header",
            &[
                ("period", &args.period_id.to_string()),
                ("version", &args.methodology_version_id.to_string()),
            ]
        )
    );
    if page.rows.is_empty() {
        println!("{}", i18n::t("rating.empty"));
        return Ok(());
    }
    for row in &page.rows {
        println!(
            "{:>3}  {:<32} {:>7.2} {:>7.2} {:>7.2} {:>7.2}  {}",
            row.rank,
            row.entity_name,
            row.score_public,
            row.score_closed,
            row.score_penalties,
            row.score_total,
            row.zone.label()
        );
    }
    println!("page {}/{} ({} rows)", page.page, page.total_pages, page.total);
    Ok(())
}

fn date(y: i32, m: u32, d: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| anyhow!("invalid date {}-{}-{}", y, m, d))
}

fn seed_demo(state: &AppState) -> Result<()> {
    let import = &state.import_api;

    import.register_methodology(&MethodologyVersion {
        version_id: 1,
        version: "2.0".to_string(),
        valid_from: date(2025, 1, 1)?,
        valid_to: None,
        notes: Some("demo".to_string()),
    })?;
    import.register_period(&Period {
        period_id: 1,
        period_type: PeriodType::HalfYear,
        date_from: date(2025, 1, 1)?,
        date_to: date(2025, 6, 30)?,
    })?;

    let entities = [
        (1, "Городской округ Северный", "Иванов И.И."),
        (2, "Муниципальный район Южный", "Петрова А.С."),
        (3, "Городское поселение Озёрное", "Сидоров П.Н."),
    ];
    for (id, name, leader) in entities {
        import.register_entity(&Entity {
            entity_id: id,
            entity_name: name.to_string(),
            oktmo: None,
            leader_name: Some(leader.to_string()),
        })?;
    }

    let criteria = [
        ("pub_1", "Открытость бюджета", Some(Classification::Public), 0.0, 30.0),
        ("pub_2", "Обращения граждан", Some(Classification::Public), 0.0, 25.0),
        ("closed_1", "Исполнение нацпроектов", Some(Classification::Closed), 0.0, 30.0),
        ("closed_2", "Кадровый резерв", None, 0.0, 15.0),
        ("pen_1", "Нарушения сроков", Some(Classification::Penalty), -10.0, 0.0),
    ];
    for (code, name, classification, point_min, point_max) in criteria {
        import.register_criterion(&Criterion {
            methodology_version_id: 1,
            code: code.to_string(),
            name: name.to_string(),
            block: None,
            classification,
            point_min,
            point_max,
        })?;
    }

    let scores: [(i64, [Option<f64>; 5]); 3] = [
        (1, [Some(28.0), Some(20.0), Some(25.0), Some(10.0), Some(-2.0)]),
        (2, [Some(15.0), Some(10.0), Some(12.0), None, Some(-5.0)]),
        (3, [Some(5.0), Some(8.0), None, Some(3.0), Some(-9.0)]),
    ];
    let mut inputs = Vec::new();
    for (entity_id, values) in scores {
        for ((code, ..), score) in criteria.iter().zip(values) {
            inputs.push(ObservationInput {
                entity_id,
                period_id: 1,
                criterion_code: code.to_string(),
                methodology_version_id: 1,
                raw_value: None,
                score,
            });
        }
    }
    let summary = import.record_observations(&inputs)?;
    println!(
        "demo data loaded: {} observations accepted, {} rejected",
        summary.accepted,
        summary.rejected.len()
    );
    Ok(())
}
