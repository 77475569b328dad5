//! config/mod.rs
//! Configuración de la aplicación (variables de entorno + valores por defecto).

pub mod app_config;
