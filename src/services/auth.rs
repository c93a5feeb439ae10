// src/services/auth.rs

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use crate::{common::error::AppError, middleware::auth::AuthenticatedUser, models::auth::Claims};

/// Só valida tokens; quem emite é o provedor de autenticação.
#[derive(Clone)]
pub struct AuthService {
    jwt_secret: String,
}

impl AuthService {
    pub fn new(jwt_secret: String) -> Self {
        Self { jwt_secret }
    }

    pub fn validate_token(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let validation = Validation::new(Algorithm::HS256);
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &validation,
        )
        .map_err(|_| AppError::InvalidToken)?;

        Ok(AuthenticatedUser {
            id: token_data.claims.sub,
            role: token_data.claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::Role;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use uuid::Uuid;

    fn token(secret: &str, role: Role, expires_in_secs: i64) -> (Uuid, String) {
        let sub = Uuid::new_v4();
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub,
            role,
            exp: (now + expires_in_secs) as usize,
            iat: now as usize,
        };
        let jwt = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        (sub, jwt)
    }

    #[test]
    fn valid_token_yields_user_and_role() {
        let service = AuthService::new("segredo".into());
        let (sub, jwt) = token("segredo", Role::Rider, 3600);

        let user = service.validate_token(&jwt).unwrap();
        assert_eq!(user.id, sub);
        assert_eq!(user.role, Role::Rider);
    }

    #[test]
    fn wrong_secret_or_expired_token_is_rejected() {
        let service = AuthService::new("segredo".into());

        let (_, forged) = token("outro", Role::Admin, 3600);
        assert!(matches!(service.validate_token(&forged), Err(AppError::InvalidToken)));

        let (_, expired) = token("segredo", Role::Admin, -3600);
        assert!(matches!(service.validate_token(&expired), Err(AppError::InvalidToken)));

        assert!(service.validate_token("lixo").is_err());
    }
}
