//! services/delivery_service.rs
//! Cliente del proveedor de mensajería saliente.
//!
//! Solo se devuelve la clasificación del resultado (código HTTP); nunca el
//! cuerpo de la respuesta ni el número de destino.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::config::app_config::DeliverySettings;
use crate::services::phone_resolver::Phone;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryResult {
    Delivered,
    /// 4xx o cualquier código fuera de 2xx/5xx: no se reintenta
    ClientError(u16),
    /// 5xx: reintentable
    ServerError(u16),
    /// Timeout o error de red: reintentable
    Transport,
}

impl DeliveryResult {
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryResult::ServerError(_) | DeliveryResult::Transport)
    }

    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => DeliveryResult::Delivered,
            500..=599 => DeliveryResult::ServerError(status),
            _ => DeliveryResult::ClientError(status),
        }
    }

    /// Código corto para `action_plans.detail`
    pub fn detail_code(&self) -> String {
        match self {
            DeliveryResult::Delivered => "delivered".to_string(),
            DeliveryResult::ClientError(s) | DeliveryResult::ServerError(s) => format!("http_{}", s),
            DeliveryResult::Transport => "transport".to_string(),
        }
    }
}

/// Mensaje a enviar para una guía. `phone` se toma prestado; el cliente no
/// puede quedarse con él.
pub struct DeliveryRequest<'a> {
    pub guide_id: &'a str,
    pub action_type: &'a str,
    pub phone: &'a Phone,
}

#[async_trait]
pub trait DeliveryClient: Send + Sync {
    async fn deliver(&self, req: DeliveryRequest<'_>) -> DeliveryResult;
}

#[derive(Clone)]
pub struct HttpDeliveryClient {
    http_client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpDeliveryClient {
    pub fn from_settings(settings: &DeliverySettings) -> Result<Option<Self>> {
        let Some(base_url) = settings.api_url.clone() else {
            return Ok(None);
        };
        let timeout = if settings.request_timeout.is_zero() {
            Duration::from_secs(10)
        } else {
            settings.request_timeout
        };
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("No se pudo construir el cliente HTTP")?;
        Ok(Some(Self::new(http_client, base_url, settings.api_token.clone())))
    }

    pub fn new(http_client: Client, base_url: String, api_token: Option<String>) -> Self {
        HttpDeliveryClient {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        }
    }

    async fn post_message(&self, req: &DeliveryRequest<'_>) -> Result<u16> {
        let url = format!("{}/messages", self.base_url);
        let payload = serde_json::json!({
            "to": req.phone.expose(),
            "template": req.action_type,
            "reference": req.guide_id,
        });

        let mut request = self.http_client.post(&url).json(&payload);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        // El error de reqwest incluye la URL pero no el body; igual se descarta
        let resp = request
            .send()
            .await
            .map_err(|e| anyhow!("envío fallido (timeout={})", e.is_timeout()))?;
        Ok(resp.status().as_u16())
    }
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    async fn deliver(&self, req: DeliveryRequest<'_>) -> DeliveryResult {
        match self.post_message(&req).await {
            Ok(status) => {
                let result = DeliveryResult::from_status(status);
                log::info!(
                    "(deliver) guide_id={} action={} status={}",
                    req.guide_id,
                    req.action_type,
                    status
                );
                result
            }
            Err(e) => {
                log::warn!("(deliver) guide_id={} {}", req.guide_id, e);
                DeliveryResult::Transport
            }
        }
    }
}
