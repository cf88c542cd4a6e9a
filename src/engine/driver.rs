// ==========================================
// 市级治理效能评分系统 - 批量聚合驱动
// ==========================================
// 职责: 按触发范围展开 (主体 × 周期 × 版本) 单元, 执行 修复 → 聚合 → 写入
// 红线: 单元失败互不影响, 汇总进报告; 只有连接/锁/事务失败才中止运行
// 红线: 从不因重算失败删除已有汇总
// 红线: 同一方法论版本同一时刻只有一个驱动在写
// ==========================================
// 并发: spawn_blocking + buffer_unordered 扇出
// 事务模式: 先全部计算, 再单事务写入 (读者不会看到半重建的评分表)
// ==========================================

use crate::config::RatingConfigReader;
use crate::domain::aggregate::{Aggregate, UnitKey, ZoneThresholds};
use crate::domain::types::{AggregationTrigger, RunStatus};
use crate::engine::aggregator::AggregationEngine;
use crate::engine::catalog::CriteriaCatalog;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::repair::{ConsistencyRepair, RepairReport, RepairScope};
use crate::engine::repositories::RatingRepositories;
use crate::engine::zone::ZoneClassifier;
use crate::perf::PerfGuard;
use crate::repository::error::{format_datetime, RepositoryError};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// AggregationScope - 触发范围
// ==========================================
// 全部为 None: 全量重算; 部分指定: 增量重算; 单个主体: 单体重算
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationScope {
    pub period_id: Option<i64>,
    pub methodology_version_id: Option<i64>,
    pub entity_ids: Option<Vec<i64>>,
}

impl AggregationScope {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn single(entity_id: i64, period_id: i64, methodology_version_id: i64) -> Self {
        Self {
            period_id: Some(period_id),
            methodology_version_id: Some(methodology_version_id),
            entity_ids: Some(vec![entity_id]),
        }
    }

    fn repair_scope(&self) -> RepairScope {
        RepairScope {
            period_id: self.period_id,
            entity_ids: self.entity_ids.clone(),
        }
    }
}

// ==========================================
// DriverOptions - 驱动参数
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverOptions {
    pub parallelism: usize,  // 并发单元数
    pub transactional: bool, // 整批单事务写入
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            parallelism: 4,
            transactional: true,
        }
    }
}

// ==========================================
// CancellationFlag - 取消信号
// ==========================================
// 取消后不再启动新单元; 已启动单元自然完成
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ==========================================
// AggregationObserver - 进度通知
// ==========================================
// 驱动层定义 trait, 上层 (CLI / 任务调度) 实现
pub trait AggregationObserver: Send + Sync {
    /// 单元计算完成 (事务模式下此时尚未落库)
    fn on_unit_completed(&self, unit: &UnitKey);
}

// ==========================================
// 运行报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub unit: UnitKey,
    pub kind: String,   // 错误类别 (UNKNOWN_CRITERION / MISSING_METHODOLOGY ...)
    pub reason: String, // 显式原因
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationReport {
    pub run_id: String,
    pub trigger: AggregationTrigger,
    pub succeeded: Vec<UnitKey>, // 完成集合 (可据此幂等续跑)
    pub failed: Vec<UnitFailure>,
    pub pending: Vec<UnitKey>, // 取消时尚未启动的单元
    pub cancelled: bool,
    pub repair: Vec<RepairReport>,
    pub elapsed_ms: u64,
}

impl AggregationReport {
    pub fn status(&self) -> RunStatus {
        if self.cancelled {
            RunStatus::Cancelled
        } else if self.failed.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::CompletedWithErrors
        }
    }

    pub fn total_units(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.pending.len()
    }
}

/// 单元执行结果
enum UnitOutcome {
    Done(Aggregate),
    Failed(UnitKey, EngineError),
    Skipped(UnitKey),
}

/// 版本级准备结果
struct PreparedVersion {
    catalog: Arc<CriteriaCatalog>,
    thresholds: ZoneThresholds,
}

// ==========================================
// AggregationDriver - 批量聚合驱动
// ==========================================
pub struct AggregationDriver<C: RatingConfigReader> {
    repos: Arc<RatingRepositories>,
    config: Arc<C>,
    engine: AggregationEngine,
    repair: ConsistencyRepair,
    version_guards: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
    observer: Option<Arc<dyn AggregationObserver>>,
}

impl<C: RatingConfigReader> AggregationDriver<C> {
    pub fn new(repos: Arc<RatingRepositories>, config: Arc<C>) -> Self {
        Self {
            engine: AggregationEngine::new(repos.clone()),
            repair: ConsistencyRepair::new(repos.clone()),
            repos,
            config,
            version_guards: Mutex::new(HashMap::new()),
            observer: None,
        }
    }

    /// 挂接进度通知
    pub fn with_observer(mut self, observer: Arc<dyn AggregationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// 读取驱动参数
    pub async fn load_options(&self) -> EngineResult<DriverOptions> {
        let parallelism = self
            .config
            .get_aggregation_parallelism()
            .await
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        let transactional = self
            .config
            .get_aggregation_transactional()
            .await
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        Ok(DriverOptions {
            parallelism: parallelism.max(1),
            transactional,
        })
    }

    /// 执行批量聚合 (参数取自配置)
    pub async fn run(
        &self,
        scope: &AggregationScope,
        trigger: AggregationTrigger,
        trigger_source: Option<&str>,
        cancel: &CancellationFlag,
    ) -> EngineResult<AggregationReport> {
        let options = self.load_options().await?;
        self.run_with_options(scope, trigger, trigger_source, options, cancel)
            .await
    }

    /// 执行批量聚合
    ///
    /// # 返回
    /// - Ok(AggregationReport): 单元失败/取消均体现在报告中
    /// - Err(StoreUnavailable): 连接/锁/事务失败, 运行中止
    #[instrument(skip(self, cancel), fields(trigger_type = trigger.as_str()))]
    pub async fn run_with_options(
        &self,
        scope: &AggregationScope,
        trigger: AggregationTrigger,
        trigger_source: Option<&str>,
        options: DriverOptions,
        cancel: &CancellationFlag,
    ) -> EngineResult<AggregationReport> {
        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let scope_json = serde_json::to_string(scope)
            .map_err(|e| EngineError::InvalidConfig(format!("范围序列化失败: {}", e)))?;

        self.repos.run_repo.insert_started(
            &run_id,
            trigger.as_str(),
            trigger_source,
            &scope_json,
            &format_datetime(&chrono::Utc::now().naive_utc()),
        )?;
        info!(run_id = %run_id, scope = %scope_json, ?options, "批量聚合开始");

        let mut report = AggregationReport {
            run_id: run_id.clone(),
            trigger,
            succeeded: Vec::new(),
            failed: Vec::new(),
            pending: Vec::new(),
            cancelled: false,
            repair: Vec::new(),
            elapsed_ms: 0,
        };

        let result = self.execute(scope, options, cancel, &mut report).await;
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report.succeeded.sort();
        report.pending.sort();
        report.failed.sort_by_key(|f| f.unit);

        match result {
            Ok(()) => {
                self.persist_run(&report, report.status())?;
                info!(
                    run_id = %run_id,
                    succeeded = report.succeeded.len(),
                    failed = report.failed.len(),
                    pending = report.pending.len(),
                    cancelled = report.cancelled,
                    elapsed_ms = report.elapsed_ms,
                    "批量聚合结束"
                );
                Ok(report)
            }
            Err(e) => {
                error!(run_id = %run_id, error = %e, "批量聚合中止");
                if let Err(log_err) = self.persist_run(&report, RunStatus::Failed) {
                    warn!(run_id = %run_id, error = %log_err, "运行日志写入失败");
                }
                Err(e)
            }
        }
    }

    /// 逐版本执行
    async fn execute(
        &self,
        scope: &AggregationScope,
        options: DriverOptions,
        cancel: &CancellationFlag,
        report: &mut AggregationReport,
    ) -> EngineResult<()> {
        let versions = match scope.methodology_version_id {
            Some(v) => vec![v],
            None => self.repos.methodology_repo.list_ids()?,
        };
        let periods = match scope.period_id {
            Some(p) => vec![p],
            None => self.repos.period_repo.list_ids()?,
        };
        let entities = match &scope.entity_ids {
            Some(ids) => {
                let mut ids = ids.clone();
                ids.sort_unstable();
                ids.dedup();
                ids
            }
            None => self.repos.entity_repo.list_ids()?,
        };

        // 显式范围中的未注册主体/周期记为单元失败, 不进入写入
        let known_entities: HashSet<i64> = match &scope.entity_ids {
            Some(_) => self.repos.entity_repo.list_ids()?.into_iter().collect(),
            None => entities.iter().copied().collect(),
        };
        let known_periods: HashSet<i64> = match scope.period_id {
            Some(_) => self.repos.period_repo.list_ids()?.into_iter().collect(),
            None => periods.iter().copied().collect(),
        };

        for version_id in versions {
            let mut units: Vec<UnitKey> = Vec::new();
            for &entity_id in &entities {
                for &period_id in &periods {
                    let unit = UnitKey::new(entity_id, period_id, version_id);
                    let unknown = if !known_entities.contains(&entity_id) {
                        Some(EngineError::UnknownEntity(entity_id))
                    } else if !known_periods.contains(&period_id) {
                        Some(EngineError::UnknownPeriod(period_id))
                    } else {
                        None
                    };
                    match unknown {
                        Some(e) => {
                            warn!(unit = %unit, error = %e, "范围包含未注册的主体或周期");
                            report.failed.push(UnitFailure {
                                unit,
                                kind: e.kind().to_string(),
                                reason: e.to_string(),
                            });
                        }
                        None => units.push(unit),
                    }
                }
            }
            if units.is_empty() {
                continue;
            }

            if cancel.is_cancelled() {
                report.cancelled = true;
                report.pending.extend(units);
                continue;
            }

            let guard = self.version_guard(version_id)?;
            let _held = guard.lock().await;

            let prepared = match self.prepare_version(version_id, scope, report).await {
                Ok(prepared) => prepared,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(methodology_version_id = version_id, error = %e, "版本准备失败, 该版本单元全部记为失败");
                    let kind = e.kind().to_string();
                    let reason = e.to_string();
                    report.failed.extend(units.into_iter().map(|unit| UnitFailure {
                        unit,
                        kind: kind.clone(),
                        reason: reason.clone(),
                    }));
                    continue;
                }
            };

            self.process_units(units, &prepared, options, cancel, report)
                .await?;
        }
        Ok(())
    }

    /// 修复 + 阈值 + 目录
    async fn prepare_version(
        &self,
        version_id: i64,
        scope: &AggregationScope,
        report: &mut AggregationReport,
    ) -> EngineResult<PreparedVersion> {
        let prefixes = self
            .config
            .get_classification_prefixes(version_id)
            .await
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        let thresholds = self
            .config
            .get_zone_thresholds(version_id)
            .await
            .map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        ZoneClassifier::new().validate(&thresholds)?;

        let repair = self.repair.clone();
        let repair_scope = scope.repair_scope();
        let run_id = report.run_id.clone();
        let repaired = tokio::task::spawn_blocking(move || {
            repair.run(version_id, &repair_scope, &prefixes, Some(&run_id))
        })
        .await
        .map_err(|e| EngineError::TaskFailed(e.to_string()))??;
        report.repair.push(repaired);

        let catalog = self.engine.load_catalog(version_id)?;
        Ok(PreparedVersion {
            catalog: Arc::new(catalog),
            thresholds,
        })
    }

    /// 扇出执行单元
    async fn process_units(
        &self,
        units: Vec<UnitKey>,
        prepared: &PreparedVersion,
        options: DriverOptions,
        cancel: &CancellationFlag,
        report: &mut AggregationReport,
    ) -> EngineResult<()> {
        let write_each = !options.transactional;

        let mut outcomes = stream::iter(units)
            .map(|unit| {
                let engine = self.engine.clone();
                let catalog = prepared.catalog.clone();
                let thresholds = prepared.thresholds;
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return UnitOutcome::Skipped(unit);
                    }
                    let joined = tokio::task::spawn_blocking(move || {
                        let _perf = PerfGuard::detail("aggregate_unit");
                        if write_each {
                            engine.aggregate_with_catalog(unit, &catalog, &thresholds)
                        } else {
                            engine.compute_with_catalog(unit, &catalog, &thresholds)
                        }
                    })
                    .await;
                    match joined {
                        Ok(Ok(aggregate)) => UnitOutcome::Done(aggregate),
                        Ok(Err(e)) => UnitOutcome::Failed(unit, e),
                        Err(join_err) => {
                            UnitOutcome::Failed(unit, EngineError::TaskFailed(join_err.to_string()))
                        }
                    }
                }
            })
            .buffer_unordered(options.parallelism.max(1));

        let mut computed: Vec<Aggregate> = Vec::new();
        while let Some(outcome) = outcomes.next().await {
            match outcome {
                UnitOutcome::Done(aggregate) => {
                    debug!(unit = %aggregate.key(), zone = aggregate.zone.as_str(), "单元完成");
                    if let Some(observer) = &self.observer {
                        observer.on_unit_completed(&aggregate.key());
                    }
                    computed.push(aggregate);
                }
                UnitOutcome::Failed(unit, e) if e.is_fatal() => {
                    error!(unit = %unit, error = %e, "存储不可用, 中止运行");
                    // 事务模式下尚未写入任何行
                    if write_each {
                        report.succeeded.extend(computed.iter().map(Aggregate::key));
                    }
                    return Err(e);
                }
                UnitOutcome::Failed(unit, e) => {
                    error!(unit = %unit, error = %e, "单元聚合失败");
                    report.failed.push(UnitFailure {
                        unit,
                        kind: e.kind().to_string(),
                        reason: e.to_string(),
                    });
                }
                UnitOutcome::Skipped(unit) => {
                    report.cancelled = true;
                    report.pending.push(unit);
                }
            }
        }
        drop(outcomes);

        if !write_each {
            if let Err(repo_err) = self.repos.aggregate_repo.upsert_batch(&computed) {
                let e = EngineError::from(repo_err);
                if e.is_fatal() {
                    return Err(e);
                }
                // 整批回滚: 本版本计算结果均未写入, 旧汇总保留
                error!(error = %e, units = computed.len(), "批量写入被拒绝, 本版本单元记为失败");
                let kind = e.kind().to_string();
                let reason = e.to_string();
                report.failed.extend(computed.iter().map(|a| UnitFailure {
                    unit: a.key(),
                    kind: kind.clone(),
                    reason: reason.clone(),
                }));
                return Ok(());
            }
        }
        report.succeeded.extend(computed.iter().map(Aggregate::key));
        Ok(())
    }

    /// 获取版本级互斥锁
    fn version_guard(&self, version_id: i64) -> EngineResult<Arc<tokio::sync::Mutex<()>>> {
        let mut guards = self
            .version_guards
            .lock()
            .map_err(|e| EngineError::StoreUnavailable(RepositoryError::LockError(e.to_string())))?;
        Ok(guards
            .entry(version_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }

    /// 写运行日志
    fn persist_run(&self, report: &AggregationReport, status: RunStatus) -> EngineResult<()> {
        let repaired_json = serde_json::to_string(&report.repair).ok();
        let failures_json = serde_json::to_string(&report.failed).ok();
        self.repos.run_repo.finish(
            &report.run_id,
            status.as_str(),
            report.succeeded.len() as i64,
            report.failed.len() as i64,
            repaired_json.as_deref(),
            failures_json.as_deref(),
            &format_datetime(&chrono::Utc::now().naive_utc()),
            report.elapsed_ms as i64,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_flag_is_shared() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_report_status() {
        let mut report = AggregationReport {
            run_id: "r".to_string(),
            trigger: AggregationTrigger::Manual,
            succeeded: vec![UnitKey::new(1, 1, 1)],
            failed: Vec::new(),
            pending: Vec::new(),
            cancelled: false,
            repair: Vec::new(),
            elapsed_ms: 0,
        };
        assert_eq!(report.status(), RunStatus::Completed);
        report.failed.push(UnitFailure {
            unit: UnitKey::new(2, 1, 1),
            kind: "UNKNOWN_CRITERION".to_string(),
            reason: "x".to_string(),
        });
        assert_eq!(report.status(), RunStatus::CompletedWithErrors);
        report.cancelled = true;
        assert_eq!(report.status(), RunStatus::Cancelled);
        assert_eq!(report.total_units(), 2);
    }

    #[test]
    fn test_single_scope() {
        let scope = AggregationScope::single(3, 2, 1);
        assert_eq!(scope.entity_ids, Some(vec![3]));
        assert_eq!(scope.repair_scope().period_id, Some(2));
    }
}
