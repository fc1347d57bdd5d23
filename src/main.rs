//src/main.rs

use pickupbot_backend::config::AppState;
use pickupbot_backend::db::init_tables::init_db;

#[tokio::main]
async fn main() {
    // Inicializa o logger
    tracing_subscriber::fmt().with_target(false).compact().init();

    // .expect() é bom aqui: se a configuração falhar, a aplicação não deve iniciar.
    let app_state = AppState::new()
        .await
        .expect("Falha ao inicializar o estado da aplicação.");

    // Cria as tabelas na inicialização e semeia a allowlist de comandos
    init_db(&app_state.db_pool, &app_state.gated_commands)
        .await
        .expect("Falha ao inicializar as tabelas do banco de dados.");

    tracing::info!("✅ Tabelas do banco de dados inicializadas com sucesso!");
    tracing::info!("🚀 Núcleo de estado pronto, aguardando o gateway do chat");

    // O client do chat (fora deste núcleo) se conecta aqui e alimenta
    // app_state.guild_lifecycle e os managers com os eventos da plataforma.
    tokio::signal::ctrl_c()
        .await
        .expect("Falha ao aguardar o sinal de encerramento");
    tracing::info!("Encerrando");
}
