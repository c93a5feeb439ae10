// src/middleware/rbac.rs

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::marker::PhantomData;

use crate::{
    common::error::AppError, config::AppState, middleware::auth::AuthenticatedUser, models::auth::Role,
};

/// 1. O Trait que define quem pode passar
pub trait RoleDef: Send + Sync + 'static {
    fn allows(role: Role) -> bool;
}

/// 2. O Extractor (Guardião)
pub struct RequireRole<T>(pub PhantomData<T>);

impl<T, S> FromRequestParts<S> for RequireRole<T>
where
    T: RoleDef,
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;

        if !T::allows(user.role) {
            tracing::warn!("Usuário {} ({}) sem acesso à rota", user.id, user.role.as_str());
            return Err(AppError::Forbidden);
        }

        Ok(RequireRole(PhantomData))
    }
}

// ---
// DEFINIÇÃO DOS PAPÉIS (TIPOS)
// ---

pub struct AdminOnly;
impl RoleDef for AdminOnly {
    fn allows(role: Role) -> bool { role == Role::Admin }
}

pub struct RiderOnly;
impl RoleDef for RiderOnly {
    fn allows(role: Role) -> bool { role == Role::Rider }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_gates() {
        assert!(AdminOnly::allows(Role::Admin));
        assert!(!AdminOnly::allows(Role::Customer));
        assert!(!AdminOnly::allows(Role::Rider));

        assert!(RiderOnly::allows(Role::Rider));
        assert!(!RiderOnly::allows(Role::Admin));
    }
}
