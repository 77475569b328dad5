//! tests/executor_tests.rs
//! Corridas completas del ejecutor contra SQLite en memoria.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use actix_rt::test;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};

    use crate::db::ts;
    use crate::models::risk_model::RankOptions;
    use crate::models::run_model::{ActionPlanStatus, RunStatus};
    use crate::models::ticket_model::{TicketFilter, TicketPriority, TicketTrigger};
    use crate::services::delivery_service::{DeliveryClient, DeliveryResult};
    use crate::services::phone_resolver::{ContactStore, SqliteContactStore};
    use crate::services::run_service::RunService;
    use crate::tests::{
        executor, fast_settings, insert_guide, memory_pool, risk_service, set_risky, set_rollout,
        ticket_service, ScriptedDelivery,
    };

    /// Cuenta las consultas de contacto y delega en la tabla de guías.
    struct CountingContacts {
        inner: SqliteContactStore,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContactStore for CountingContacts {
        async fn fetch_phone(&self, guide_id: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch_phone(guide_id).await
        }
    }

    /// Almacén de contactos caído: cada consulta falla.
    struct FailingContacts {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContactStore for FailingContacts {
        async fn fetch_phone(&self, _guide_id: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("connection reset"))
        }
    }

    #[test]
    async fn paused_executor_sends_nothing() {
        let pool = memory_pool().await;
        insert_guide(&pool, "G1", "Servientrega", "Bogotá", "pending", 2, Some("3001112233")).await;
        set_rollout(&pool, "full", false, 50, Some(1), None).await;

        let delivery = Arc::new(ScriptedDelivery::default());
        let service = executor(
            &pool,
            Arc::new(SqliteContactStore::new(pool.clone())),
            Some(delivery.clone() as Arc<dyn DeliveryClient>),
            fast_settings(),
        );

        let summary = service.run().await.unwrap();
        assert_eq!(summary.status, RunStatus::Paused);
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.planned, 0);
        assert!(delivery.calls().is_empty());

        let stored = RunService::new(pool.clone()).recent_runs(5).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, RunStatus::Paused);
    }

    #[test]
    async fn pilot_only_contacts_high_band() {
        let pool = memory_pool().await;
        set_risky(&pool, &[], &["Servientrega"]).await;
        insert_guide(&pool, "G1", "Servientrega", "Cali", "at_office", 3, Some("3001112233")).await;
        insert_guide(&pool, "G2", "TCC", "Cali", "delivered", 10, Some("3002223344")).await;
        insert_guide(&pool, "G3", "Coordinadora", "Cali", "in_transit", 1, Some("3003334455")).await;
        set_rollout(&pool, "pilot", true, 10, None, None).await;

        let delivery = Arc::new(ScriptedDelivery::default());
        let service = executor(
            &pool,
            Arc::new(SqliteContactStore::new(pool.clone())),
            Some(delivery.clone() as Arc<dyn DeliveryClient>),
            fast_settings(),
        );

        let summary = service.run().await.unwrap();
        assert_eq!(delivery.calls(), vec!["G1".to_string()]);
        assert_eq!(summary.phase, "pilot");
        assert_eq!(summary.planned, 1);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.success, 1);
        assert_eq!(summary.status, RunStatus::Completed);
    }

    #[test]
    async fn provider_404_opens_failed_4xx_ticket_without_phone() {
        let pool = memory_pool().await;
        insert_guide(&pool, "G2", "TCC", "Medellín", "pending", 1, Some("3009876543")).await;
        set_rollout(&pool, "full", true, 10, Some(1), None).await;

        let delivery = Arc::new(
            ScriptedDelivery::default().with("G2", DeliveryResult::ClientError(404)),
        );
        let service = executor(
            &pool,
            Arc::new(SqliteContactStore::new(pool.clone())),
            Some(delivery.clone() as Arc<dyn DeliveryClient>),
            fast_settings(),
        );

        let summary = service.run().await.unwrap();
        assert_eq!(summary.failed_4xx, 1);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.tickets_created, 1);
        // 4xx no se reintenta
        assert_eq!(delivery.calls().len(), 1);

        let tickets = ticket_service(&pool)
            .list(&TicketFilter {
                limit: 10,
                ..TicketFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(tickets.total, 1);
        let ticket = &tickets.items[0];
        assert_eq!(ticket.trigger, TicketTrigger::Failed4xx);
        assert_eq!(ticket.priority, TicketPriority::Media);
        let body = serde_json::to_string(ticket).unwrap();
        assert!(!body.contains("3009876543"));

        let plans = RunService::new(pool.clone())
            .plans_for_run(&summary.run_id)
            .await
            .unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].status, ActionPlanStatus::Failed);
        assert_eq!(plans[0].detail.as_deref(), Some("http_404"));
    }

    #[test]
    async fn server_errors_exhaust_retries_and_open_alta_ticket() {
        let pool = memory_pool().await;
        insert_guide(&pool, "G5", "Envia", "Pasto", "pending", 0, Some("3005556677")).await;
        set_rollout(&pool, "full", true, 10, None, None).await;

        let delivery = Arc::new(
            ScriptedDelivery::default().with("G5", DeliveryResult::ServerError(503)),
        );
        let service = executor(
            &pool,
            Arc::new(SqliteContactStore::new(pool.clone())),
            Some(delivery.clone() as Arc<dyn DeliveryClient>),
            fast_settings(),
        );

        let summary = service.run().await.unwrap();
        assert_eq!(delivery.calls().len(), 3);
        assert_eq!(summary.failed_5xx, 1);
        assert_eq!(summary.success, 0);

        let tickets = ticket_service(&pool)
            .list(&TicketFilter {
                limit: 10,
                ..TicketFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(tickets.items[0].trigger, TicketTrigger::Failed5xxRetries);
        assert_eq!(tickets.items[0].priority, TicketPriority::Alta);
    }

    #[test]
    async fn per_run_limit_is_never_exceeded() {
        let pool = memory_pool().await;
        for (i, id) in ["A1", "A2", "A3", "A4"].iter().enumerate() {
            let phone = format!("30000000{:02}", i);
            insert_guide(&pool, id, "TCC", "Tunja", "pending", 1, Some(&phone)).await;
        }
        set_rollout(&pool, "full", true, 2, Some(1), None).await;

        let delivery = Arc::new(ScriptedDelivery::default());
        let service = executor(
            &pool,
            Arc::new(SqliteContactStore::new(pool.clone())),
            Some(delivery.clone() as Arc<dyn DeliveryClient>),
            fast_settings(),
        );

        let summary = service.run().await.unwrap();
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.skipped_rate_limit, 2);
        assert_eq!(delivery.calls().len(), 2);
    }

    #[test]
    async fn per_phone_limit_applies_across_guides() {
        let pool = memory_pool().await;
        insert_guide(&pool, "P1", "TCC", "Neiva", "pending", 1, Some("3007770000")).await;
        insert_guide(&pool, "P2", "TCC", "Neiva", "pending", 1, Some("3007770000")).await;
        set_rollout(&pool, "full", true, 10, Some(1), None).await;

        let delivery = Arc::new(ScriptedDelivery::default());
        let service = executor(
            &pool,
            Arc::new(SqliteContactStore::new(pool.clone())),
            Some(delivery.clone() as Arc<dyn DeliveryClient>),
            fast_settings(),
        );

        let summary = service.run().await.unwrap();
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.skipped_rate_limit, 1);
    }

    #[test]
    async fn second_run_skips_recent_plans() {
        let pool = memory_pool().await;
        insert_guide(&pool, "D1", "TCC", "Ibagué", "pending", 1, Some("3001231231")).await;
        insert_guide(&pool, "D2", "TCC", "Ibagué", "pending", 1, Some("3004564564")).await;
        set_rollout(&pool, "full", true, 10, None, None).await;

        let delivery = Arc::new(ScriptedDelivery::default());
        let service = executor(
            &pool,
            Arc::new(SqliteContactStore::new(pool.clone())),
            Some(delivery.clone() as Arc<dyn DeliveryClient>),
            fast_settings(),
        );

        let first = service.run().await.unwrap();
        assert_eq!(first.sent, 2);
        let second = service.run().await.unwrap();
        assert_eq!(second.skipped_duplicate, 2);
        assert_eq!(second.sent, 0);
        assert_eq!(delivery.calls().len(), 2);
    }

    #[test]
    async fn simulation_counts_without_resolving_phones() {
        let pool = memory_pool().await;
        insert_guide(&pool, "S1", "TCC", "Leticia", "pending", 4, Some("3001000000")).await;
        insert_guide(&pool, "S2", "TCC", "Leticia", "pending", 2, Some("3002000000")).await;
        set_rollout(&pool, "simulation", true, 10, Some(1), None).await;

        let contacts = Arc::new(CountingContacts {
            inner: SqliteContactStore::new(pool.clone()),
            calls: AtomicUsize::new(0),
        });
        let delivery = Arc::new(ScriptedDelivery::default());
        let service = executor(
            &pool,
            contacts.clone(),
            Some(delivery.clone() as Arc<dyn DeliveryClient>),
            fast_settings(),
        );

        let summary = service.run().await.unwrap();
        assert_eq!(summary.would_send, 2);
        assert_eq!(summary.sent, 0);
        assert_eq!(contacts.calls.load(Ordering::SeqCst), 0);
        assert!(delivery.calls().is_empty());

        // Los planes simulados no bloquean la siguiente corrida
        let again = service.run().await.unwrap();
        assert_eq!(again.skipped_duplicate, 0);
        assert_eq!(again.would_send, 2);
    }

    #[test]
    async fn live_phase_without_provider_falls_back_to_simulation() {
        let pool = memory_pool().await;
        insert_guide(&pool, "F1", "TCC", "Yopal", "pending", 1, Some("3001010101")).await;
        set_rollout(&pool, "full", true, 10, None, None).await;

        let service = executor(
            &pool,
            Arc::new(SqliteContactStore::new(pool.clone())),
            None,
            fast_settings(),
        );
        let summary = service.run().await.unwrap();
        assert_eq!(summary.phase, "simulation");
        assert_eq!(summary.would_send, 1);
        assert_eq!(summary.sent, 0);
    }

    #[test]
    async fn missing_phone_is_skipped_no_contact() {
        let pool = memory_pool().await;
        insert_guide(&pool, "N1", "TCC", "Quibdó", "pending", 1, None).await;
        set_rollout(&pool, "full", true, 10, None, None).await;

        let delivery = Arc::new(ScriptedDelivery::default());
        let service = executor(
            &pool,
            Arc::new(SqliteContactStore::new(pool.clone())),
            Some(delivery.clone() as Arc<dyn DeliveryClient>),
            fast_settings(),
        );
        let summary = service.run().await.unwrap();
        assert_eq!(summary.skipped_no_contact, 1);
        assert_eq!(summary.sent, 0);
        assert!(delivery.calls().is_empty());
    }

    #[test]
    async fn expired_deadline_admits_nothing_and_reports_partial() {
        let pool = memory_pool().await;
        insert_guide(&pool, "T1", "TCC", "Mocoa", "pending", 1, Some("3001212121")).await;
        insert_guide(&pool, "T2", "TCC", "Mocoa", "pending", 1, Some("3003434343")).await;
        set_rollout(&pool, "full", true, 10, None, None).await;

        let mut settings = fast_settings();
        settings.soft_deadline = Duration::ZERO;
        let delivery = Arc::new(ScriptedDelivery::default());
        let service = executor(
            &pool,
            Arc::new(SqliteContactStore::new(pool.clone())),
            Some(delivery.clone() as Arc<dyn DeliveryClient>),
            settings,
        );

        let summary = service.run().await.unwrap();
        assert_eq!(summary.status, RunStatus::Partial);
        assert_eq!(summary.not_admitted, 2);
        assert_eq!(summary.planned, 0);
        assert!(delivery.calls().is_empty());
    }

    #[test]
    async fn status_reports_recent_runs() {
        let pool = memory_pool().await;
        insert_guide(&pool, "H1", "TCC", "Tumaco", "pending", 1, Some("3009090909")).await;
        set_rollout(&pool, "full", true, 10, None, None).await;

        let service = executor(
            &pool,
            Arc::new(SqliteContactStore::new(pool.clone())),
            Some(Arc::new(ScriptedDelivery::default()) as Arc<dyn DeliveryClient>),
            fast_settings(),
        );
        let summary = service.run().await.unwrap();

        let status = service.status(10).await.unwrap();
        assert_eq!(status.health.status, "healthy");
        assert_eq!(status.recent_runs.len(), 1);
        assert_eq!(
            status.last_run.map(|r| r.run_id),
            Some(summary.run_id)
        );
    }

    #[test]
    async fn unreadable_guide_row_does_not_abort_run() {
        let pool = memory_pool().await;
        sqlx::query(
            r#"
            INSERT INTO guides (guide_id, carrier, city, status, has_novelty, last_status_at, phone)
            VALUES ('BAD', 'TCC', 'Cali', 'pending', 0, '2025-01-01 10:00:00', '3001110000')
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        insert_guide(&pool, "OK1", "TCC", "Cali", "pending", 1, Some("3002220000")).await;
        set_rollout(&pool, "full", true, 10, None, None).await;

        let delivery = Arc::new(ScriptedDelivery::default());
        let service = executor(
            &pool,
            Arc::new(SqliteContactStore::new(pool.clone())),
            Some(delivery.clone() as Arc<dyn DeliveryClient>),
            fast_settings(),
        );

        let summary = service.run().await.unwrap();
        assert_eq!(delivery.calls(), vec!["OK1".to_string()]);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.status, RunStatus::Completed);

        let stored = RunService::new(pool.clone()).recent_runs(5).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].errors, 1);

        let queue = risk_service(&pool)
            .risk_queue(&RankOptions::default())
            .await
            .unwrap();
        let ids: Vec<&str> = queue.items.iter().map(|r| r.guide_id.as_str()).collect();
        assert_eq!(ids, vec!["OK1"]);
    }

    #[test]
    async fn contact_store_outage_counts_as_failed_5xx() {
        let pool = memory_pool().await;
        insert_guide(&pool, "C1", "Envia", "Pasto", "pending", 1, Some("3004440000")).await;
        set_rollout(&pool, "full", true, 10, Some(1), None).await;

        let contacts = Arc::new(FailingContacts {
            calls: AtomicUsize::new(0),
        });
        let delivery = Arc::new(ScriptedDelivery::default());
        let settings = fast_settings();
        let attempts = settings.phone_fetch_attempts as usize;
        let service = executor(
            &pool,
            contacts.clone(),
            Some(delivery.clone() as Arc<dyn DeliveryClient>),
            settings,
        );

        let summary = service.run().await.unwrap();
        assert_eq!(contacts.calls.load(Ordering::SeqCst), attempts);
        assert_eq!(summary.failed_5xx, 1);
        assert_eq!(summary.would_send, 1);
        assert_eq!(summary.sent, 0);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.tickets_created, 1);
        assert!(delivery.calls().is_empty());

        let tickets = ticket_service(&pool)
            .list(&TicketFilter {
                limit: 10,
                ..TicketFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(tickets.total, 1);
        assert_eq!(tickets.items[0].trigger, TicketTrigger::Failed5xxRetries);
        assert_eq!(tickets.items[0].priority, TicketPriority::Alta);

        let plans = RunService::new(pool.clone())
            .plans_for_run(&summary.run_id)
            .await
            .unwrap();
        assert_eq!(plans[0].detail.as_deref(), Some("transient_fetch"));
    }

    #[test]
    async fn per_carrier_limit_caps_each_carrier() {
        let pool = memory_pool().await;
        insert_guide(&pool, "K1", "TCC", "Tunja", "pending", 1, Some("3000000011")).await;
        insert_guide(&pool, "K2", "tcc ", "Tunja", "pending", 1, Some("3000000022")).await;
        insert_guide(&pool, "K3", "TCC", "Tunja", "pending", 1, Some("3000000033")).await;
        insert_guide(&pool, "K4", "Envia", "Tunja", "pending", 1, Some("3000000044")).await;
        set_rollout(&pool, "full", true, 10, None, Some(1)).await;

        let delivery = Arc::new(ScriptedDelivery::default());
        let service = executor(
            &pool,
            Arc::new(SqliteContactStore::new(pool.clone())),
            Some(delivery.clone() as Arc<dyn DeliveryClient>),
            fast_settings(),
        );

        let summary = service.run().await.unwrap();
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.skipped_rate_limit, 2);
        let calls = delivery.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.contains(&"K4".to_string()));
    }

    #[test]
    async fn sent_plan_without_movement_opens_ticket_on_next_run() {
        let pool = memory_pool().await;
        insert_guide(&pool, "W1", "TCC", "Riohacha", "in_transit", 5, Some("3006660000")).await;
        sqlx::query(
            r#"
            INSERT INTO action_plans (id, run_id, guide_id, action_type, scheduled_at, status, detail)
            VALUES ('plan-old', 'run-old', 'W1', 'delivery_reminder', ?1, 'SENT', NULL)
            "#,
        )
        .bind(ts(Utc::now() - ChronoDuration::hours(60)))
        .execute(&pool)
        .await
        .unwrap();
        set_rollout(&pool, "simulation", true, 10, None, None).await;

        let service = executor(
            &pool,
            Arc::new(SqliteContactStore::new(pool.clone())),
            None,
            fast_settings(),
        );
        let summary = service.run().await.unwrap();
        assert_eq!(summary.tickets_created, 1);

        let tickets = ticket_service(&pool)
            .list(&TicketFilter {
                trigger: Some(TicketTrigger::NoMovementAfterContact),
                limit: 10,
                ..TicketFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(tickets.total, 1);
        assert_eq!(tickets.items[0].guide_id, "W1");
        assert_eq!(tickets.items[0].priority, TicketPriority::Media);
    }
}
