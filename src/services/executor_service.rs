//! services/executor_service.rs
//! Orquestador de una corrida CRON: lee el rollout, toma candidatos de la
//! cola de riesgo, aplica límites, resuelve el teléfono justo a tiempo,
//! envía (o simula), clasifica el resultado y pasa los fallos al motor de
//! tickets. Cada corrida es independiente; toda coordinación va por la base.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use uuid::Uuid;

use crate::config::app_config::ExecutorSettings;
use crate::models::guide_model::Guide;
use crate::models::risk_model::{normalize, RankOptions, RiskLevel};
use crate::models::rollout_model::{RateLimits, RolloutConfig, RolloutPhase};
use crate::models::run_model::{
    ActionOutcome, ActionPlan, ActionPlanStatus, ExecutorHealth, ExecutorStatusResponse,
    RunStatus, RunSummary,
};
use crate::services::delivery_service::{DeliveryClient, DeliveryRequest, DeliveryResult};
use crate::services::guide_service::GuideService;
use crate::services::phone_resolver::{Phone, PhoneResolver, ResolveError};
use crate::services::rate_limit_service::{LimitScope, RateLimiter, RunKey};
use crate::services::risk_service::{rank, RiskService};
use crate::services::rollout_service::RolloutService;
use crate::services::run_service::RunService;
use crate::services::ticket_service::TicketService;

/// Tasa de fallos a partir de la cual el ejecutor se reporta "degraded"
const DEGRADED_FAILURE_RATE: f64 = 0.2;
const RUN_COUNTER_KEY: &str = "all";
const MAX_RUN_BUDGET: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
pub struct ExecutorService {
    rollout: RolloutService,
    risk: RiskService,
    guides: GuideService,
    resolver: PhoneResolver,
    limiter: RateLimiter,
    tickets: TicketService,
    runs: RunService,
    delivery: Option<Arc<dyn DeliveryClient>>,
    settings: ExecutorSettings,
}

/// Estado compartido por todas las guías de una corrida.
struct RunContext {
    run_id: String,
    run_key: RunKey,
    phase: RolloutPhase,
    limits: RateLimits,
    deadline: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuideResult {
    Success,
    Failed4xx(u16),
    /// `attempted` indica si llegó a haber llamada al proveedor
    Failed5xx { attempted: bool },
    Simulated,
    SkippedDuplicate,
    SkippedRateLimit,
    SkippedNoContact,
    NotAdmitted,
    Error,
}

impl GuideResult {
    fn outcome(&self) -> ActionOutcome {
        match self {
            GuideResult::Success => ActionOutcome::Success,
            GuideResult::Failed4xx(status) => ActionOutcome::Failed4xx(*status),
            GuideResult::Failed5xx { .. } => ActionOutcome::Failed5xx,
            _ => ActionOutcome::Skipped,
        }
    }
}

struct GuideReport {
    result: GuideResult,
    planned: bool,
    ticket_created: bool,
    /// Errores inesperados (incluye fallos al evaluar tickets)
    errors: u32,
}

impl GuideReport {
    fn new(result: GuideResult, planned: bool) -> Self {
        GuideReport {
            result,
            planned,
            ticket_created: false,
            errors: u32::from(result == GuideResult::Error),
        }
    }
}

impl ExecutorService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rollout: RolloutService,
        risk: RiskService,
        guides: GuideService,
        resolver: PhoneResolver,
        limiter: RateLimiter,
        tickets: TicketService,
        runs: RunService,
        delivery: Option<Arc<dyn DeliveryClient>>,
        settings: ExecutorSettings,
    ) -> Self {
        ExecutorService {
            rollout,
            risk,
            guides,
            resolver,
            limiter,
            tickets,
            runs,
            delivery,
            settings,
        }
    }

    /// Ejecuta una corrida completa y persiste su resumen.
    pub async fn run(&self) -> Result<RunSummary> {
        let started = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();

        // Lectura fresca: una pausa aplicada justo antes de esta corrida se respeta
        let config = self.rollout.get_config().await?;
        if !config.executor_enabled {
            log::info!("(run) run_id={} ejecutor pausado; no se procesa nada", run_id);
            let mut summary = RunSummary::empty(run_id, started_at, config.phase.as_str());
            summary.status = RunStatus::Paused;
            summary.duration_ms = started.elapsed().as_millis() as u64;
            self.runs.save_summary(&summary).await?;
            return Ok(summary);
        }

        let phase = self.effective_phase(&config);
        let (candidates, unreadable) = self.load_candidates(phase).await?;
        log::info!(
            "(run) run_id={} phase={} candidatos={} ilegibles={} per_run={}",
            run_id,
            phase.as_str(),
            candidates.len(),
            unreadable,
            config.rate_limits.per_run
        );

        let ctx = RunContext {
            run_id: run_id.clone(),
            run_key: RunKey::generate(),
            phase,
            limits: config.rate_limits.clone(),
            deadline: soft_deadline(started, self.settings.soft_deadline),
        };

        let reports: Vec<GuideReport> = stream::iter(candidates)
            .map(|guide| self.process_guide(&ctx, guide))
            .buffer_unordered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut summary = tally(RunSummary::empty(run_id, started_at, phase.as_str()), &reports);
        summary.errors += unreadable;
        summary.duration_ms = started.elapsed().as_millis() as u64;

        if let Err(e) = self.limiter.clear_run(&summary.run_id).await {
            log::warn!("(run) No se pudieron limpiar contadores: {:#}", e);
        }
        self.runs.save_summary(&summary).await?;

        log::info!(
            "(run) run_id={} status={} planned={} sent={} success={} 4xx={} 5xx={} dup={} rate={} errors={}",
            summary.run_id,
            summary.status.as_str(),
            summary.planned,
            summary.sent,
            summary.success,
            summary.failed_4xx,
            summary.failed_5xx,
            summary.skipped_duplicate,
            summary.skipped_rate_limit,
            summary.errors
        );
        Ok(summary)
    }

    /// Sin proveedor configurado no hay envíos reales: se degrada a simulación.
    fn effective_phase(&self, config: &RolloutConfig) -> RolloutPhase {
        if config.phase != RolloutPhase::Simulation && self.delivery.is_none() {
            log::warn!(
                "(effective_phase) Fase {} sin DELIVERY_API_URL; se corre en simulation",
                config.phase.as_str()
            );
            return RolloutPhase::Simulation;
        }
        config.phase
    }

    /// Candidatos ordenados y cuántas filas de guía no se pudieron leer.
    async fn load_candidates(&self, phase: RolloutPhase) -> Result<(Vec<Guide>, u32)> {
        let flags = self.risk.get_flags().await?;
        let batch = self.guides.list_guides(false).await?;
        let guides = batch.guides;
        let opts = RankOptions {
            level: (phase == RolloutPhase::Pilot).then_some(RiskLevel::High),
            limit: self.settings.candidate_limit,
            include_terminal: false,
        };
        let ranked = rank(&guides, &flags, self.risk.weights(), &opts, Utc::now());

        let mut by_id: HashMap<String, Guide> = guides
            .into_iter()
            .map(|g| (g.guide_id.clone(), g))
            .collect();
        let candidates = ranked
            .into_iter()
            .filter_map(|r| by_id.remove(&r.guide_id))
            .collect();
        Ok((candidates, batch.skipped))
    }

    /// Procesa una guía. Nunca falla: los errores quedan contados en el reporte.
    async fn process_guide(&self, ctx: &RunContext, guide: Guide) -> GuideReport {
        if Instant::now() >= ctx.deadline {
            return GuideReport::new(GuideResult::NotAdmitted, false);
        }

        let plan = match self
            .runs
            .insert_plan_if_absent(
                &ctx.run_id,
                &guide.guide_id,
                &self.settings.action_type,
                Utc::now(),
                self.settings.action_cooldown_hours,
            )
            .await
        {
            Ok(Some(plan)) => Some(plan),
            Ok(None) => None,
            Err(e) => {
                log::error!(
                    "(process_guide) guide_id={} no se pudo planificar: {:#}",
                    guide.guide_id,
                    e
                );
                return GuideReport::new(GuideResult::Error, false);
            }
        };

        let mut report = match &plan {
            None => GuideReport::new(GuideResult::SkippedDuplicate, false),
            Some(plan) => {
                let result = match self.execute_plan(ctx, &guide, plan).await {
                    Ok(result) => result,
                    Err(e) => {
                        log::error!(
                            "(process_guide) guide_id={} error inesperado: {:#}",
                            guide.guide_id,
                            e
                        );
                        GuideResult::Error
                    }
                };
                let (status, detail) = plan_status_for(result);
                if let Err(e) = self.runs.finish_plan(&plan.id, status, detail.as_deref()).await {
                    log::error!("(process_guide) plan={} sin cerrar: {:#}", plan.id, e);
                }
                GuideReport::new(result, true)
            }
        };

        if report.result != GuideResult::Error {
            match self
                .tickets
                .evaluate_and_ticket(&guide, report.result.outcome())
                .await
            {
                Ok(ticket) => report.ticket_created = ticket.is_some(),
                Err(e) => {
                    log::error!(
                        "(process_guide) guide_id={} fallo evaluando ticket: {:#}",
                        guide.guide_id,
                        e
                    );
                    report.errors += 1;
                }
            }
        }
        report
    }

    /// Límites, teléfono y envío para un plan ya reservado.
    async fn execute_plan(
        &self,
        ctx: &RunContext,
        guide: &Guide,
        plan: &ActionPlan,
    ) -> Result<GuideResult> {
        let mut held: Vec<(LimitScope, String)> = Vec::new();

        if !self
            .limiter
            .try_acquire(&ctx.run_id, LimitScope::Run, RUN_COUNTER_KEY, ctx.limits.per_run)
            .await?
        {
            return Ok(GuideResult::SkippedRateLimit);
        }
        held.push((LimitScope::Run, RUN_COUNTER_KEY.to_string()));

        if let Some(per_carrier) = ctx.limits.per_carrier {
            let carrier_key = normalize(&guide.carrier);
            if !self
                .limiter
                .try_acquire(&ctx.run_id, LimitScope::Carrier, &carrier_key, per_carrier)
                .await?
            {
                self.release_all(ctx, &held).await;
                return Ok(GuideResult::SkippedRateLimit);
            }
            held.push((LimitScope::Carrier, carrier_key));
        }

        if ctx.phase == RolloutPhase::Simulation {
            return Ok(GuideResult::Simulated);
        }

        // Una sola resolución por guía por corrida; el valor muere al final de este bloque
        let phone = match self.resolve_with_retry(&guide.guide_id).await {
            Ok(phone) => phone,
            Err(ResolveError::NotFound) => {
                self.release_all(ctx, &held).await;
                return Ok(GuideResult::SkippedNoContact);
            }
            Err(ResolveError::TransientFetch(e)) => {
                log::warn!(
                    "(execute_plan) guide_id={} contacto no disponible tras reintentos: {:#}",
                    guide.guide_id,
                    e
                );
                self.release_all(ctx, &held).await;
                return Ok(GuideResult::Failed5xx { attempted: false });
            }
        };

        if let Some(per_phone) = ctx.limits.per_phone {
            let phone_key = ctx.run_key.phone_key(&phone);
            if !self
                .limiter
                .try_acquire(&ctx.run_id, LimitScope::Phone, &phone_key, per_phone)
                .await?
            {
                self.release_all(ctx, &held).await;
                return Ok(GuideResult::SkippedRateLimit);
            }
        }

        let delivered = self.deliver_with_retry(ctx, plan, &phone).await;
        drop(phone);

        Ok(match delivered {
            DeliveryResult::Delivered => GuideResult::Success,
            DeliveryResult::ClientError(status) => GuideResult::Failed4xx(status),
            DeliveryResult::ServerError(_) | DeliveryResult::Transport => {
                GuideResult::Failed5xx { attempted: true }
            }
        })
    }

    async fn resolve_with_retry(&self, guide_id: &str) -> Result<Phone, ResolveError> {
        let attempts = self.settings.phone_fetch_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.resolver.resolve(guide_id).await {
                Err(ResolveError::TransientFetch(_)) if attempt < attempts => {
                    tokio::time::sleep(self.backoff(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Reintentos acotados solo para 5xx/red. Pasado el deadline no se
    /// reintenta: la llamada en curso termina y ahí se corta.
    async fn deliver_with_retry(
        &self,
        ctx: &RunContext,
        plan: &ActionPlan,
        phone: &Phone,
    ) -> DeliveryResult {
        let Some(delivery) = &self.delivery else {
            return DeliveryResult::Transport;
        };
        let max_attempts = self.settings.delivery_max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = delivery
                .deliver(DeliveryRequest {
                    guide_id: &plan.guide_id,
                    action_type: &plan.action_type,
                    phone,
                })
                .await;
            if !result.is_retryable() || attempt >= max_attempts || Instant::now() >= ctx.deadline
            {
                return result;
            }
            log::info!(
                "(deliver_with_retry) guide_id={} intento {} falló ({}); reintentando",
                plan.guide_id,
                attempt,
                result.detail_code()
            );
            tokio::time::sleep(self.backoff(attempt)).await;
            attempt += 1;
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.settings
            .retry_base_delay
            .saturating_mul(factor)
            .min(self.settings.retry_max_delay)
    }

    async fn release_all(&self, ctx: &RunContext, held: &[(LimitScope, String)]) {
        for (scope, key) in held {
            if let Err(e) = self.limiter.release(&ctx.run_id, *scope, key).await {
                log::warn!("(release_all) No se liberó cupo {}: {:#}", scope.as_str(), e);
            }
        }
    }

    /// Historial y salud para /admin/executor-status.
    pub async fn status(&self, limit: u32) -> Result<ExecutorStatusResponse> {
        let config = self.rollout.get_config().await?;
        let recent_runs = self.runs.recent_runs(limit).await?;
        Ok(ExecutorStatusResponse {
            health: compute_health(&config, &recent_runs),
            last_run: recent_runs.first().cloned(),
            recent_runs,
        })
    }
}

fn plan_status_for(result: GuideResult) -> (ActionPlanStatus, Option<String>) {
    match result {
        GuideResult::Success => (ActionPlanStatus::Sent, None),
        GuideResult::Failed4xx(status) => (ActionPlanStatus::Failed, Some(format!("http_{}", status))),
        GuideResult::Failed5xx { attempted: true } => {
            (ActionPlanStatus::Failed, Some("retries_exhausted".to_string()))
        }
        GuideResult::Failed5xx { attempted: false } => {
            (ActionPlanStatus::Failed, Some("transient_fetch".to_string()))
        }
        GuideResult::Simulated => (ActionPlanStatus::Skipped, Some("simulated".to_string())),
        GuideResult::SkippedRateLimit => (ActionPlanStatus::Skipped, Some("rate_limited".to_string())),
        GuideResult::SkippedNoContact => (ActionPlanStatus::Skipped, Some("no_contact".to_string())),
        GuideResult::SkippedDuplicate => (ActionPlanStatus::Skipped, Some("duplicate".to_string())),
        GuideResult::NotAdmitted => (ActionPlanStatus::Skipped, Some("not_admitted".to_string())),
        GuideResult::Error => (ActionPlanStatus::Failed, Some("error".to_string())),
    }
}

/// El presupuesto se acota a `MAX_RUN_BUDGET` para que la suma nunca desborde.
fn soft_deadline(started: Instant, budget: Duration) -> Instant {
    started + budget.min(MAX_RUN_BUDGET)
}

fn tally(mut summary: RunSummary, reports: &[GuideReport]) -> RunSummary {
    for r in reports {
        if r.planned {
            summary.planned += 1;
        }
        if r.ticket_created {
            summary.tickets_created += 1;
        }
        summary.errors += r.errors;
        match r.result {
            GuideResult::Success => {
                summary.would_send += 1;
                summary.sent += 1;
                summary.success += 1;
            }
            GuideResult::Failed4xx(_) => {
                summary.would_send += 1;
                summary.sent += 1;
                summary.failed_4xx += 1;
            }
            GuideResult::Failed5xx { attempted } => {
                summary.would_send += 1;
                if attempted {
                    summary.sent += 1;
                }
                summary.failed_5xx += 1;
            }
            GuideResult::Simulated => summary.would_send += 1,
            GuideResult::SkippedDuplicate => summary.skipped_duplicate += 1,
            GuideResult::SkippedRateLimit => summary.skipped_rate_limit += 1,
            GuideResult::SkippedNoContact => summary.skipped_no_contact += 1,
            GuideResult::NotAdmitted => summary.not_admitted += 1,
            GuideResult::Error => {}
        }
    }
    summary.status = if summary.not_admitted > 0 {
        RunStatus::Partial
    } else {
        RunStatus::Completed
    };
    summary
}

pub fn compute_health(config: &RolloutConfig, runs: &[RunSummary]) -> ExecutorHealth {
    let attempted: u32 = runs.iter().map(|r| r.sent + r.errors).sum();
    let failed: u32 = runs
        .iter()
        .map(|r| r.failed_4xx + r.failed_5xx + r.errors)
        .sum();
    let failure_rate = if attempted == 0 {
        0.0
    } else {
        f64::from(failed) / f64::from(attempted)
    };

    let status = if !config.executor_enabled {
        "paused"
    } else if runs.is_empty() {
        "idle"
    } else if failure_rate > DEGRADED_FAILURE_RATE {
        "degraded"
    } else {
        "healthy"
    };

    ExecutorHealth {
        status: status.to_string(),
        executor_enabled: config.executor_enabled,
        phase: config.phase.as_str().to_string(),
        last_run_at: runs.first().map(|r| r.started_at),
        failure_rate,
        runs_considered: runs.len(),
    }
}
