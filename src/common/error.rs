use thiserror::Error;

use crate::models::guild::GuildId;

// Nosso tipo de erro, com `thiserror` para melhor ergonomia.
#[derive(Debug, Error)]
pub enum AppError {
    // Alguém pediu o estado de uma guilda que nunca foi registrada (ou que
    // já foi removida do cache). Nunca devolvemos um default no lugar:
    // isso esconderia um bug de ordenação nos hooks de ciclo de vida.
    #[error("Guild {0} not cached")]
    GuildNotCached(GuildId),

    // Variante para erros de banco de dados (sqlx)
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}
