// src/common/db_utils.rs

use sqlx::{PgPool, Postgres, Transaction};

use crate::{common::error::AppError, middleware::auth::AuthenticatedUser};

// ---
// Contexto de acesso ao banco
// ---
/// Quem está falando com o banco. É decidido uma vez por requisição (ou por tarefa)
/// e nunca ramificado dentro dos serviços.
#[derive(Debug, Clone)]
pub enum DbContext {
    /// Papel de serviço: webhooks da KPay e o relay de notificações.
    Privileged,
    /// Requisição de um usuário autenticado.
    User(AuthenticatedUser),
    /// Visitante sem token (checkout como convidado, consulta de pagamento).
    Anonymous,
}

impl DbContext {
    pub fn for_caller(user: Option<&AuthenticatedUser>) -> Self {
        match user {
            Some(user) => DbContext::User(user.clone()),
            None => DbContext::Anonymous,
        }
    }

    fn role(&self) -> &'static str {
        match self {
            DbContext::Privileged => "service_role",
            DbContext::User(user) => user.role.as_str(),
            DbContext::Anonymous => "anon",
        }
    }

    fn user_id(&self) -> String {
        match self {
            DbContext::Privileged | DbContext::Anonymous => String::new(),
            DbContext::User(user) => user.id.to_string(),
        }
    }
}

// ---
// Helper de contexto: quem está por trás da transação
// ---
/// Abre uma transação e define `app.role`/`app.user_id`, gravados pelo banco na
/// auditoria de estoque (`stock_movements.actor_*`). Autorização fica nos serviços.
/// `set_config(..., true)` vale só até o commit/rollback, então não vaza para a pool.
pub(crate) async fn begin_scoped_tx(
    pool: &PgPool,
    ctx: &DbContext,
) -> Result<Transaction<'static, Postgres>, AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT set_config('app.role', $1, true)")
        .bind(ctx.role())
        .execute(&mut *tx)
        .await?;

    sqlx::query("SELECT set_config('app.user_id', $1, true)")
        .bind(ctx.user_id())
        .execute(&mut *tx)
        .await?;

    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::Role;
    use uuid::Uuid;

    #[test]
    fn context_sets_role_and_user() {
        let user = AuthenticatedUser { id: Uuid::new_v4(), role: Role::Customer };

        let ctx = DbContext::for_caller(Some(&user));
        assert_eq!(ctx.role(), "customer");
        assert_eq!(ctx.user_id(), user.id.to_string());

        let ctx = DbContext::for_caller(None);
        assert_eq!(ctx.role(), "anon");
        assert!(ctx.user_id().is_empty());

        assert_eq!(DbContext::Privileged.role(), "service_role");
    }
}
