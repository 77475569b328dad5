//! services/ticket_service.rs
//! Motor de tickets: detecta disparadores, deduplica y administra la
//! máquina de estados OPEN -> IN_PROGRESS -> RESOLVED -> CLOSED.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};
use uuid::Uuid;

use crate::config::app_config::TicketThresholds;
use crate::db::{parse_ts, ts};
use crate::error::ControlError;
use crate::models::guide_model::Guide;
use crate::models::run_model::ActionOutcome;
use crate::models::ticket_model::{
    Ticket, TicketCounts, TicketFilter, TicketListQuery, TicketListResponse, TicketPatchRequest,
    TicketPriority, TicketStatus, TicketTrigger, DEFAULT_TICKET_PAGE, MAX_TICKET_PAGE,
};
use crate::pii;
use crate::services::audit_service;

const TICKET_COLUMNS: &str = r#"
    id, guide_id, trigger_kind, status, priority, carrier, guide_status,
    occurrences, resolution_notes, created_at, updated_at
"#;

const MAX_NOTES_LEN: usize = 2000;

#[derive(Clone, Debug)]
pub struct TicketService {
    db_pool: Pool<Sqlite>,
    thresholds: TicketThresholds,
}

impl TicketService {
    pub fn new(db_pool: Pool<Sqlite>, thresholds: TicketThresholds) -> Self {
        TicketService {
            db_pool,
            thresholds,
        }
    }

    /// Evalúa el resultado de una acción (y el estado de la guía) y abre un
    /// ticket si corresponde. Si ya hay uno abierto para la misma
    /// (guía, disparador) no crea otro: suma una ocurrencia y devuelve `None`.
    pub async fn evaluate_and_ticket(
        &self,
        guide: &Guide,
        outcome: ActionOutcome,
    ) -> Result<Option<Ticket>> {
        let now = Utc::now();
        let Some(trigger) = detect_trigger(guide, outcome, &self.thresholds, now) else {
            return Ok(None);
        };
        let priority = priority_for(trigger, guide, &self.thresholds, now);
        self.create_if_absent(guide, trigger, priority, now).await
    }

    async fn create_if_absent(
        &self,
        guide: &Guide,
        trigger: TicketTrigger,
        priority: TicketPriority,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>> {
        let ticket = Ticket {
            id: Uuid::new_v4().to_string(),
            guide_id: guide.guide_id.clone(),
            trigger,
            status: TicketStatus::Open,
            priority,
            carrier: Some(guide.carrier.clone()),
            guide_status: Some(guide.status.clone()),
            occurrences: 1,
            resolution_notes: None,
            created_at: now,
            updated_at: now,
        };

        // El índice único parcial hace que el insert sea condicional
        let inserted = sqlx::query(
            r#"
            INSERT INTO tickets (
                id, guide_id, trigger_kind, status, priority, carrier, guide_status,
                occurrences, resolution_notes, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, 'OPEN', ?4, ?5, ?6, 1, NULL, ?7, ?7)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&ticket.id)
        .bind(&ticket.guide_id)
        .bind(trigger.as_str())
        .bind(priority.as_str())
        .bind(&ticket.carrier)
        .bind(&ticket.guide_status)
        .bind(ts(now))
        .execute(&self.db_pool)
        .await
        .context("Fallo al insertar ticket")?;

        if inserted.rows_affected() == 1 {
            log::info!(
                "(create_if_absent) Ticket {} abierto guide_id={} trigger={} priority={}",
                ticket.id,
                ticket.guide_id,
                trigger.as_str(),
                priority.as_str()
            );
            return Ok(Some(ticket));
        }

        sqlx::query(
            r#"
            UPDATE tickets
            SET occurrences = occurrences + 1, updated_at = ?3
            WHERE guide_id = ?1 AND trigger_kind = ?2 AND status IN ('OPEN', 'IN_PROGRESS')
            "#,
        )
        .bind(&guide.guide_id)
        .bind(trigger.as_str())
        .bind(ts(now))
        .execute(&self.db_pool)
        .await
        .context("Fallo al sumar ocurrencia de ticket")?;

        log::debug!(
            "(create_if_absent) Ticket ya abierto guide_id={} trigger={}; sin duplicar",
            guide.guide_id,
            trigger.as_str()
        );
        Ok(None)
    }

    pub async fn list(&self, filter: &TicketFilter) -> Result<TicketListResponse> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut binds: Vec<&str> = Vec::new();
        if let Some(status) = filter.status {
            conditions.push("status = ?");
            binds.push(status.as_str());
        }
        if let Some(trigger) = filter.trigger {
            conditions.push("trigger_kind = ?");
            binds.push(trigger.as_str());
        }
        if let Some(priority) = filter.priority {
            conditions.push("priority = ?");
            binds.push(priority.as_str());
        }
        let where_sql = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM tickets {where_sql}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for b in &binds {
            count_query = count_query.bind(*b);
        }
        let total = count_query
            .fetch_one(&self.db_pool)
            .await
            .context("Fallo al contar tickets")?;

        let list_sql = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets {where_sql} \
             ORDER BY created_at DESC, id ASC LIMIT ? OFFSET ?"
        );
        let mut list_query = sqlx::query(&list_sql);
        for b in &binds {
            list_query = list_query.bind(*b);
        }
        let rows = list_query
            .bind(i64::from(filter.limit))
            .bind(i64::from(filter.offset))
            .fetch_all(&self.db_pool)
            .await
            .context("Fallo al listar tickets")?;

        let items = rows.iter().map(ticket_from_row).collect::<Result<Vec<_>>>()?;
        Ok(TicketListResponse {
            total: total.max(0) as u64,
            limit: filter.limit,
            offset: filter.offset,
            items,
        })
    }

    pub async fn get(&self, ticket_id: &str) -> Result<Ticket, ControlError> {
        let sql = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(ticket_id)
            .fetch_optional(&self.db_pool)
            .await
            .context("Fallo al consultar ticket")?;

        match row {
            Some(r) => Ok(ticket_from_row(&r)?),
            None => Err(ControlError::NotFound("ticket".to_string())),
        }
    }

    /// PATCH administrativo: estado (validado contra la máquina de estados),
    /// prioridad y notas (limpiadas de PII).
    pub async fn patch(
        &self,
        actor: &str,
        ticket_id: &str,
        req: TicketPatchRequest,
    ) -> Result<Ticket, ControlError> {
        let next_status = req
            .status
            .as_deref()
            .map(|raw| {
                TicketStatus::parse(raw)
                    .ok_or_else(|| ControlError::Validation(format!("estado desconocido: {}", raw)))
            })
            .transpose()?;
        let next_priority = req
            .priority
            .as_deref()
            .map(|raw| {
                TicketPriority::parse(raw).ok_or_else(|| {
                    ControlError::Validation(format!("prioridad desconocida: {}", raw))
                })
            })
            .transpose()?;
        let notes = req.resolution_notes.as_deref().map(pii::scrub);
        if let Some(n) = &notes {
            if n.chars().count() > MAX_NOTES_LEN {
                return Err(ControlError::Validation(format!(
                    "resolutionNotes admite a lo sumo {} caracteres",
                    MAX_NOTES_LEN
                )));
            }
        }
        if next_status.is_none() && next_priority.is_none() && notes.is_none() {
            return Err(ControlError::Validation("nada que actualizar".to_string()));
        }

        let current = self.get(ticket_id).await?;
        let target_status = next_status.unwrap_or(current.status);
        if target_status != current.status && !current.status.can_transition_to(target_status) {
            return Err(ControlError::InvalidTransition {
                from: current.status.as_str().to_string(),
                to: target_status.as_str().to_string(),
            });
        }
        if current.status == TicketStatus::Closed {
            // Un ticket cerrado ya no se edita
            return Err(ControlError::InvalidTransition {
                from: "CLOSED".to_string(),
                to: target_status.as_str().to_string(),
            });
        }

        let priority = next_priority.unwrap_or(current.priority);
        let now = Utc::now();

        let mut tx = self
            .db_pool
            .begin()
            .await
            .context("Fallo al abrir transacción de ticket")?;

        let updated = sqlx::query(
            r#"
            UPDATE tickets
            SET status = ?3,
                priority = ?4,
                resolution_notes = COALESCE(?5, resolution_notes),
                updated_at = ?6
            WHERE id = ?1 AND status = ?2
            "#,
        )
        .bind(ticket_id)
        .bind(current.status.as_str())
        .bind(target_status.as_str())
        .bind(priority.as_str())
        .bind(notes.as_deref())
        .bind(ts(now))
        .execute(&mut *tx)
        .await
        .context("Fallo al actualizar ticket")?;

        if updated.rows_affected() == 0 {
            // Otro admin cambió el estado entre la lectura y la escritura
            return Err(ControlError::InvalidTransition {
                from: current.status.as_str().to_string(),
                to: target_status.as_str().to_string(),
            });
        }

        let summary = format!(
            "ticket={} status={}->{} priority={} notes_updated={}",
            ticket_id,
            current.status.as_str(),
            target_status.as_str(),
            priority.as_str(),
            notes.is_some()
        );
        audit_service::append(&mut *tx, actor, "ticket.update", &summary).await?;
        tx.commit().await.context("Fallo al confirmar ticket")?;

        self.get(ticket_id).await
    }

    pub async fn counts(&self) -> Result<TicketCounts> {
        let rows = sqlx::query("SELECT status, priority, COUNT(*) AS n FROM tickets GROUP BY status, priority")
            .fetch_all(&self.db_pool)
            .await
            .context("Fallo al contar tickets por estado")?;

        let mut counts = TicketCounts::default();
        for r in rows {
            let status: String = r.try_get("status")?;
            let priority: String = r.try_get("priority")?;
            let n: i64 = r.try_get("n")?;
            let n = n.max(0) as u64;
            match TicketStatus::parse(&status) {
                Some(TicketStatus::Open) => counts.open += n,
                Some(TicketStatus::InProgress) => counts.in_progress += n,
                Some(TicketStatus::Resolved) => counts.resolved += n,
                Some(TicketStatus::Closed) => counts.closed += n,
                None => continue,
            }
            if TicketStatus::parse(&status).map_or(false, |s| s.is_open())
                && TicketPriority::parse(&priority) == Some(TicketPriority::Alta)
            {
                counts.open_alta += n;
            }
        }
        Ok(counts)
    }
}

/// Valida la query de listado.
pub fn parse_filter(query: &TicketListQuery) -> Result<TicketFilter, ControlError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|raw| {
            TicketStatus::parse(raw)
                .ok_or_else(|| ControlError::Validation(format!("estado desconocido: {}", raw)))
        })
        .transpose()?;
    let trigger = query
        .trigger
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|raw| {
            TicketTrigger::parse(raw)
                .ok_or_else(|| ControlError::Validation(format!("disparador desconocido: {}", raw)))
        })
        .transpose()?;
    let priority = query
        .priority
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|raw| {
            TicketPriority::parse(raw)
                .ok_or_else(|| ControlError::Validation(format!("prioridad desconocida: {}", raw)))
        })
        .transpose()?;

    Ok(TicketFilter {
        status,
        trigger,
        priority,
        limit: query
            .limit
            .unwrap_or(DEFAULT_TICKET_PAGE)
            .clamp(1, MAX_TICKET_PAGE),
        offset: query.offset.unwrap_or(0),
    })
}

/// Los fallos de la acción mandan; si no hubo fallo se revisa el estado de la guía.
pub fn detect_trigger(
    guide: &Guide,
    outcome: ActionOutcome,
    thresholds: &TicketThresholds,
    now: DateTime<Utc>,
) -> Option<TicketTrigger> {
    match outcome {
        ActionOutcome::Failed4xx(_) => return Some(TicketTrigger::Failed4xx),
        ActionOutcome::Failed5xx => return Some(TicketTrigger::Failed5xxRetries),
        ActionOutcome::Success | ActionOutcome::Skipped => {}
    }

    if guide.is_terminal() {
        return None;
    }
    if guide.is_at_office() && guide.days_without_movement(now) >= thresholds.at_office_days {
        return Some(TicketTrigger::AtOfficeStill);
    }
    if let Some(contacted_at) = guide.last_contact_at {
        let grace = Duration::hours(thresholds.no_movement_grace_hours);
        let unchanged_since_contact = guide.last_status_at <= contacted_at;
        if unchanged_since_contact && now - contacted_at >= grace {
            return Some(TicketTrigger::NoMovementAfterContact);
        }
    }
    None
}

/// Tabla disparador -> prioridad.
pub fn priority_for(
    trigger: TicketTrigger,
    guide: &Guide,
    thresholds: &TicketThresholds,
    now: DateTime<Utc>,
) -> TicketPriority {
    match trigger {
        TicketTrigger::Failed5xxRetries => TicketPriority::Alta,
        TicketTrigger::AtOfficeStill
            if guide.days_without_movement(now) >= thresholds.at_office_alta_days =>
        {
            TicketPriority::Alta
        }
        TicketTrigger::AtOfficeStill
        | TicketTrigger::Failed4xx
        | TicketTrigger::NoMovementAfterContact => TicketPriority::Media,
    }
}

fn ticket_from_row(r: &SqliteRow) -> Result<Ticket> {
    let trigger_raw: String = r.try_get("trigger_kind")?;
    let status_raw: String = r.try_get("status")?;
    let priority_raw: String = r.try_get("priority")?;
    let created_at: String = r.try_get("created_at")?;
    let updated_at: String = r.try_get("updated_at")?;
    let occurrences: i64 = r.try_get("occurrences")?;

    Ok(Ticket {
        id: r.try_get("id")?,
        guide_id: r.try_get("guide_id")?,
        trigger: TicketTrigger::parse(&trigger_raw)
            .with_context(|| format!("Disparador desconocido: {}", trigger_raw))?,
        status: TicketStatus::parse(&status_raw)
            .with_context(|| format!("Estado desconocido: {}", status_raw))?,
        priority: TicketPriority::parse(&priority_raw)
            .with_context(|| format!("Prioridad desconocida: {}", priority_raw))?,
        carrier: r.try_get("carrier")?,
        guide_status: r.try_get("guide_status")?,
        occurrences: occurrences.max(0) as u32,
        resolution_notes: r.try_get("resolution_notes")?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}
