//! models/mod.rs
//! Módulo raíz para modelos/estructuras compartidas.

pub mod audit_model;
pub mod guide_model;
pub mod risk_model;
pub mod rollout_model;
pub mod run_model;
pub mod ticket_model;
