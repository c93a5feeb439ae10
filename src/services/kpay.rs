// src/services/kpay.rs

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::Sha256;

use crate::common::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Header com a assinatura HMAC-SHA256 (hex) do corpo cru do webhook.
pub const SIGNATURE_HEADER: &str = "x-kpay-signature";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRequest<'a> {
    pub reference: &'a str,
    pub phone: &'a str,
    pub amount: Decimal,
    pub currency: &'a str,
}

/// Início da cobrança mobile money no provedor.
#[async_trait]
pub trait KpayProvider: Send + Sync {
    async fn request_collection(&self, request: &CollectionRequest<'_>) -> Result<(), AppError>;
}

pub struct HttpKpayProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpKpayProvider {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl KpayProvider for HttpKpayProvider {
    async fn request_collection(&self, request: &CollectionRequest<'_>) -> Result<(), AppError> {
        self.client
            .post(format!("{}/v1/collections", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?
            .error_for_status()?;

        tracing::info!("💸 Cobrança KPay {} enviada ao provedor", request.reference);
        Ok(())
    }
}

pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Chave HMAC inválida: {}", e))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Comparação em tempo constante contra a assinatura enviada.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_teste";
    const BODY: &[u8] = br#"{"reference":"KP-1","status":"completed"}"#;

    #[test]
    fn accepts_its_own_signature() {
        let signature = sign_payload(SECRET, BODY).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify_signature(SECRET, BODY, &signature));
        assert!(verify_signature(SECRET, BODY, &signature.to_uppercase()));
    }

    #[test]
    fn rejects_tampered_body_or_wrong_secret() {
        let signature = sign_payload(SECRET, BODY).unwrap();
        let tampered = br#"{"reference":"KP-1","status":"failed"}"#;
        assert!(!verify_signature(SECRET, tampered, &signature));
        assert!(!verify_signature("outro", BODY, &signature));
    }

    #[test]
    fn rejects_garbage_signatures() {
        assert!(!verify_signature(SECRET, BODY, ""));
        assert!(!verify_signature(SECRET, BODY, "não-é-hex"));
        assert!(!verify_signature(SECRET, BODY, "abcd"));
    }
}
