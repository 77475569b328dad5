//! services/mod.rs
//! Módulo que agrupa las capas de negocio del plano de control.

pub mod audit_service;
pub mod delivery_service;
pub mod executor_service;
pub mod guide_service;
pub mod phone_resolver;
pub mod rate_limit_service;
pub mod risk_service;
pub mod rollout_service;
pub mod run_service;
pub mod ticket_service;
