// src/managers/guild_state_manager.rs

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::{
    common::error::AppError,
    db::guild_repo::GuildRepository,
    models::guild::{
        GuildConfigUpdateResult, GuildId, GuildInfo, GuildSettings, GuildState, RoleId,
    },
    services::guild_state_cache::GuildStateCache,
};

/// Orquestra cache e repositório com exclusão mútua por guilda.
///
/// Toda mutação segue o mesmo protocolo: pre-check otimista no snapshot
/// atual, lock da guilda, re-validação (o pre-check pode ter ficado velho),
/// escrita no banco e só então a troca atômica da entrada no cache. Leituras
/// nunca esperam o lock — um leitor vê o snapshot anterior ou o novo, nunca
/// um intermediário.
pub struct GuildStateManager {
    cache: GuildStateCache,
    repository: Arc<dyn GuildRepository>,
    locks: DashMap<GuildId, Arc<Mutex<()>>>,
}

impl GuildStateManager {
    pub fn new(repository: Arc<dyn GuildRepository>) -> Self {
        Self {
            cache: GuildStateCache::new(),
            repository,
            locks: DashMap::new(),
        }
    }

    // Um lock por guilda, criado sob demanda. Os handles nunca são
    // recolhidos: ficam limitados pela cardinalidade de guildas do processo.
    fn guild_lock(&self, guild_id: GuildId) -> Arc<Mutex<()>> {
        self.locks
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    /// Carrega e cacheia o estado da guilda se ainda for preciso.
    pub async fn register_guild(&self, guild: &GuildInfo) -> Result<(), AppError> {
        // Só registra se não estiver no cache
        if self.cache.get(guild.guild_id).is_some() {
            return Ok(());
        }

        let lock = self.guild_lock(guild.guild_id);
        let _guard = lock.lock().await;

        if self.cache.get(guild.guild_id).is_some() {
            return Ok(());
        }

        let settings = self.repository.fetch_guild_settings(guild).await?;
        let role_command_permissions = self
            .repository
            .fetch_role_permissions(guild.guild_id)
            .await?;

        self.cache.set(
            guild.guild_id,
            Arc::new(GuildState::new(settings, role_command_permissions)),
        );

        Ok(())
    }

    pub async fn register_guilds(&self, guilds: &[GuildInfo]) -> Result<(), AppError> {
        for guild in guilds {
            self.register_guild(guild).await?;
        }

        Ok(())
    }

    pub fn get_guild_state(&self, guild_id: GuildId) -> Result<Arc<GuildState>, AppError> {
        self.cache
            .get(guild_id)
            .ok_or(AppError::GuildNotCached(guild_id))
    }

    /// Atualiza os canais da guilda no banco e no cache.
    ///
    /// Validação e anomalias do banco voltam como resultado estruturado
    /// (`ok = false`); só guilda não cacheada é erro de verdade.
    pub async fn update_guild_config(
        &self,
        guild_settings: GuildSettings,
    ) -> Result<GuildConfigUpdateResult, AppError> {
        if self.cache.get(guild_settings.guild_id).is_none() {
            return Err(AppError::GuildNotCached(guild_settings.guild_id));
        }

        // Validação pura, antes de tocar no lock ou no banco. Só rejeita
        // quando os dois canais existem: limpar ambos é permitido.
        if guild_settings.pickup_channel_id.is_some()
            && guild_settings.pickup_channel_id == guild_settings.listen_channel_id
        {
            return Ok(GuildConfigUpdateResult {
                ok: false,
                settings: None,
                error: Some("Pickup and Listen channel should differ from each other.".to_string()),
            });
        }

        let lock = self.guild_lock(guild_settings.guild_id);
        let _guard = lock.lock().await;

        let curr_state = self.get_guild_state(guild_settings.guild_id)?;

        let updated = self.repository.update_guild_settings(&guild_settings).await?;

        if !updated {
            // O banco não afetou nenhuma linha: anomalia da camada de dados.
            // O cache fica exatamente como estava.
            tracing::error!(
                "Update de configuração da guilda {} não afetou nenhuma linha",
                guild_settings.guild_id
            );
            return Ok(GuildConfigUpdateResult {
                ok: false,
                settings: None,
                error: Some("Something went wrong updating the database.".to_string()),
            });
        }

        let new_settings = GuildSettings {
            pickup_channel_id: guild_settings.pickup_channel_id,
            listen_channel_id: guild_settings.listen_channel_id,
            ..curr_state.settings.clone()
        };

        let new_state = GuildState {
            settings: new_settings.clone(),
            role_command_permissions: curr_state.role_command_permissions.clone(),
        };
        self.cache.set(guild_settings.guild_id, Arc::new(new_state));

        Ok(GuildConfigUpdateResult {
            ok: true,
            settings: Some(new_settings),
            error: None,
        })
    }

    // Nomes pedidos que passam pela allowlist e ainda faltam no grant do
    // cargo, na ordem recebida e sem repetição.
    fn missing_role_permissions(
        state: &GuildState,
        role_id: RoleId,
        command_names: &[String],
        valid_command_names: &[String],
    ) -> Vec<String> {
        let granted = state.role_command_permissions.get(&role_id);

        let mut missing: Vec<String> = Vec::new();
        for name in command_names {
            if !valid_command_names.contains(name) {
                continue;
            }
            if granted.is_some_and(|commands| commands.contains(name)) {
                continue;
            }
            if missing.contains(name) {
                continue;
            }
            missing.push(name.clone());
        }

        missing
    }

    // O dual: nomes válidos que existem no grant atual do cargo.
    fn present_role_permissions(
        state: &GuildState,
        role_id: RoleId,
        command_names: &[String],
        valid_command_names: &[String],
    ) -> Vec<String> {
        let granted = state.role_command_permissions.get(&role_id);

        let mut present: Vec<String> = Vec::new();
        for name in command_names {
            if !valid_command_names.contains(name) {
                continue;
            }
            if !granted.is_some_and(|commands| commands.contains(name)) {
                continue;
            }
            if present.contains(name) {
                continue;
            }
            present.push(name.clone());
        }

        present
    }

    /// Concede comandos a um cargo. Retorna os nomes realmente inseridos;
    /// lista vazia (e nenhuma escrita no banco) quando não há o que fazer.
    pub async fn add_role_permissions(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
        command_names: &[String],
        valid_command_names: &[String],
    ) -> Result<Vec<String>, AppError> {
        let state = self.get_guild_state(guild_id)?;
        if Self::missing_role_permissions(&state, role_id, command_names, valid_command_names)
            .is_empty()
        {
            return Ok(Vec::new());
        }

        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        // Recalcula com o snapshot mais novo: outra task pode ter concedido
        // parte dos comandos enquanto esperávamos o lock
        let curr_state = self.get_guild_state(guild_id)?;
        let missing = Self::missing_role_permissions(
            &curr_state,
            role_id,
            command_names,
            valid_command_names,
        );
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        self.repository
            .add_role_permissions(guild_id, role_id, &missing)
            .await?;

        let mut role_command_permissions = curr_state.role_command_permissions.clone();
        role_command_permissions
            .entry(role_id)
            .or_default()
            .extend(missing.iter().cloned());

        self.cache.set(
            guild_id,
            Arc::new(GuildState {
                settings: curr_state.settings.clone(),
                role_command_permissions,
            }),
        );

        Ok(missing)
    }

    /// Revoga comandos de um cargo. Retorna os nomes que de fato existiam e
    /// foram removidos (subconjunto do pedido).
    pub async fn remove_role_permissions(
        &self,
        guild_id: GuildId,
        role_id: RoleId,
        command_names: &[String],
        valid_command_names: &[String],
    ) -> Result<Vec<String>, AppError> {
        let state = self.get_guild_state(guild_id)?;
        if Self::present_role_permissions(&state, role_id, command_names, valid_command_names)
            .is_empty()
        {
            return Ok(Vec::new());
        }

        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        let curr_state = self.get_guild_state(guild_id)?;
        let present = Self::present_role_permissions(
            &curr_state,
            role_id,
            command_names,
            valid_command_names,
        );
        if present.is_empty() {
            return Ok(Vec::new());
        }

        // O cache espelha o que o banco apagou de verdade, não a nossa conta
        let removed = self
            .repository
            .remove_role_permissions(guild_id, role_id, &present)
            .await?;

        let mut role_command_permissions = curr_state.role_command_permissions.clone();
        if let Some(commands) = role_command_permissions.get_mut(&role_id) {
            for name in &removed {
                commands.remove(name);
            }
        }

        self.cache.set(
            guild_id,
            Arc::new(GuildState {
                settings: curr_state.settings.clone(),
                role_command_permissions,
            }),
        );

        Ok(removed)
    }

    // Cargos pedidos que ainda têm algum grant cacheado, sem repetição.
    fn elevated_roles(state: &GuildState, role_ids: &[RoleId]) -> Vec<RoleId> {
        let mut affected: Vec<RoleId> = Vec::new();
        for role_id in role_ids {
            if state.role_command_permissions.contains_key(role_id) && !affected.contains(role_id)
            {
                affected.push(*role_id);
            }
        }

        affected
    }

    /// Remove todos os grants dos cargos informados — usado quando a camada
    /// externa detecta cargos que não existem mais na plataforma. As chaves
    /// somem do mapeamento cacheado; retorna os cargos afetados.
    pub async fn remove_elevated_roles(
        &self,
        guild_id: GuildId,
        role_ids: &[RoleId],
    ) -> Result<Vec<RoleId>, AppError> {
        let state = self.get_guild_state(guild_id)?;
        if Self::elevated_roles(&state, role_ids).is_empty() {
            return Ok(Vec::new());
        }

        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        let curr_state = self.get_guild_state(guild_id)?;
        let affected = Self::elevated_roles(&curr_state, role_ids);
        if affected.is_empty() {
            return Ok(Vec::new());
        }

        self.repository
            .remove_elevated_roles(guild_id, &affected)
            .await?;

        let mut role_command_permissions = curr_state.role_command_permissions.clone();
        for role_id in &affected {
            role_command_permissions.remove(role_id);
        }

        self.cache.set(
            guild_id,
            Arc::new(GuildState {
                settings: curr_state.settings.clone(),
                role_command_permissions,
            }),
        );

        Ok(affected)
    }

    /// Tira a guilda do cache. A linha no banco fica: a limpeza no banco é
    /// uma decisão adiada de propósito.
    pub async fn evict_guild(&self, guild_id: GuildId) {
        if self.cache.get(guild_id).is_none() {
            return;
        }

        let lock = self.guild_lock(guild_id);
        let _guard = lock.lock().await;

        if self.cache.get(guild_id).is_some() {
            self.cache.delete(guild_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::GuildStateManager;
    use crate::common::error::AppError;
    use crate::db::guild_repo::mock::MockGuildRepository;
    use crate::models::guild::{GuildInfo, GuildSettings};

    fn guild_info(guild_id: i64) -> GuildInfo {
        GuildInfo {
            guild_id,
            name: format!("Guild {guild_id}"),
        }
    }

    fn channel_settings(
        guild_id: i64,
        pickup: Option<i64>,
        listen: Option<i64>,
    ) -> GuildSettings {
        GuildSettings {
            guild_id,
            prefix: "!".to_string(),
            pickup_channel_id: pickup,
            listen_channel_id: listen,
        }
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    // Manager com a guilda 1 já registrada
    async fn cached_manager() -> (Arc<GuildStateManager>, Arc<MockGuildRepository>) {
        let repo = Arc::new(MockGuildRepository::new());
        let manager = Arc::new(GuildStateManager::new(repo.clone()));
        manager
            .register_guild(&guild_info(1))
            .await
            .expect("registro inicial deveria funcionar");
        (manager, repo)
    }

    #[tokio::test]
    async fn register_guild_populates_cache_with_defaults() {
        let (manager, _repo) = cached_manager().await;

        let state = manager.get_guild_state(1).unwrap();
        assert_eq!(state.settings.prefix, "!");
        assert_eq!(state.settings.pickup_channel_id, None);
        assert_eq!(state.settings.listen_channel_id, None);
        assert!(state.role_command_permissions.is_empty());
    }

    #[tokio::test]
    async fn register_guild_is_idempotent() {
        let (manager, repo) = cached_manager().await;
        // Uma busca de settings + uma de permissões no caminho frio
        assert_eq!(repo.fetches(), 2);

        manager.register_guild(&guild_info(1)).await.unwrap();
        assert_eq!(repo.fetches(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_registration_loads_once() {
        let repo = Arc::new(MockGuildRepository::new());
        let manager = Arc::new(GuildStateManager::new(repo.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.register_guild(&guild_info(1)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(repo.fetches(), 2);
        assert!(manager.get_guild_state(1).is_ok());
    }

    #[tokio::test]
    async fn get_guild_state_fails_for_unknown_guild() {
        let repo = Arc::new(MockGuildRepository::new());
        let manager = GuildStateManager::new(repo);

        assert!(matches!(
            manager.get_guild_state(99),
            Err(AppError::GuildNotCached(99))
        ));
    }

    #[tokio::test]
    async fn update_config_requires_cached_guild() {
        let repo = Arc::new(MockGuildRepository::new());
        let manager = GuildStateManager::new(repo);

        let result = manager
            .update_guild_config(channel_settings(5, Some(100), Some(200)))
            .await;
        assert!(matches!(result, Err(AppError::GuildNotCached(5))));
    }

    #[tokio::test]
    async fn update_config_rejects_equal_channels_before_any_store_write() {
        let (manager, repo) = cached_manager().await;
        let before = manager.get_guild_state(1).unwrap();

        let result = manager
            .update_guild_config(channel_settings(1, Some(555), Some(555)))
            .await
            .unwrap();

        assert!(!result.ok);
        assert_eq!(
            result.error.as_deref(),
            Some("Pickup and Listen channel should differ from each other.")
        );
        assert_eq!(repo.writes(), 0);

        let after = manager.get_guild_state(1).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn update_config_allows_clearing_both_channels() {
        let (manager, _repo) = cached_manager().await;

        // None == None não pode disparar a validação de igualdade
        let result = manager
            .update_guild_config(channel_settings(1, None, None))
            .await
            .unwrap();

        assert!(result.ok);
    }

    #[tokio::test]
    async fn update_config_swaps_only_channel_fields() {
        let (manager, repo) = cached_manager().await;

        let result = manager
            .update_guild_config(channel_settings(1, Some(100), Some(200)))
            .await
            .unwrap();

        assert!(result.ok);
        let settings = result.settings.unwrap();
        assert_eq!(settings.prefix, "!");
        assert_eq!(settings.pickup_channel_id, Some(100));
        assert_eq!(settings.listen_channel_id, Some(200));

        let state = manager.get_guild_state(1).unwrap();
        assert_eq!(state.settings, settings);
        assert_eq!(repo.writes(), 1);
    }

    #[tokio::test]
    async fn update_config_store_failure_leaves_cache_untouched() {
        let (manager, repo) = cached_manager().await;
        let before = manager.get_guild_state(1).unwrap();

        repo.fail_settings_updates(true);
        let result = manager
            .update_guild_config(channel_settings(1, Some(100), Some(200)))
            .await
            .unwrap();

        assert!(!result.ok);
        assert_eq!(
            result.error.as_deref(),
            Some("Something went wrong updating the database.")
        );
        // A escrita foi tentada, mas o snapshot cacheado é o mesmo objeto
        assert_eq!(repo.writes(), 1);
        let after = manager.get_guild_state(1).unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[tokio::test]
    async fn add_role_permissions_filters_by_allowlist() {
        let (manager, repo) = cached_manager().await;

        let added = manager
            .add_role_permissions(1, 7, &strings(&["a", "b", "z"]), &strings(&["a", "b", "c"]))
            .await
            .unwrap();

        assert_eq!(added, strings(&["a", "b"]));
        let state = manager.get_guild_state(1).unwrap();
        let granted = state.role_command_permissions.get(&7).unwrap();
        assert!(granted.contains("a") && granted.contains("b"));
        assert!(!granted.contains("z"));
        assert_eq!(repo.stored_grants(1, 7), granted.clone());
    }

    #[tokio::test]
    async fn add_role_permissions_deduplicates_request() {
        let (manager, _repo) = cached_manager().await;

        let added = manager
            .add_role_permissions(1, 7, &strings(&["a", "a"]), &strings(&["a"]))
            .await
            .unwrap();

        assert_eq!(added, strings(&["a"]));
    }

    #[tokio::test]
    async fn add_role_permissions_noop_skips_store() {
        let (manager, repo) = cached_manager().await;

        manager
            .add_role_permissions(1, 7, &strings(&["a", "b"]), &strings(&["a", "b"]))
            .await
            .unwrap();
        let writes_after_first = repo.writes();

        // Tudo já concedido: lista vazia, zero escritas novas
        let added = manager
            .add_role_permissions(1, 7, &strings(&["a", "b"]), &strings(&["a", "b"]))
            .await
            .unwrap();

        assert!(added.is_empty());
        assert_eq!(repo.writes(), writes_after_first);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adds_accumulate_all_grants() {
        let (manager, repo) = cached_manager().await;
        let valid: Vec<String> = (0..8).map(|i| format!("cmd{i}")).collect();

        let mut handles = Vec::new();
        for i in 0..8 {
            let manager = manager.clone();
            let valid = valid.clone();
            let name = format!("cmd{i}");
            handles.push(tokio::spawn(async move {
                manager.add_role_permissions(1, 7, &[name], &valid).await
            }));
        }
        for handle in handles {
            let added = handle.await.unwrap().unwrap();
            assert_eq!(added.len(), 1);
        }

        // Sem updates perdidos: o conjunto final é a união dos 8
        let state = manager.get_guild_state(1).unwrap();
        let granted = state.role_command_permissions.get(&7).unwrap();
        assert_eq!(granted.len(), 8);
        assert_eq!(repo.stored_grants(1, 7), granted.clone());
    }

    #[tokio::test]
    async fn remove_role_permissions_set_algebra() {
        let (manager, repo) = cached_manager().await;
        let valid = strings(&["A", "B", "C", "D"]);

        manager
            .add_role_permissions(1, 7, &strings(&["A", "B", "C"]), &valid)
            .await
            .unwrap();

        let mut removed = manager
            .remove_role_permissions(1, 7, &strings(&["B", "C", "Z"]), &valid)
            .await
            .unwrap();
        removed.sort();

        assert_eq!(removed, strings(&["B", "C"]));
        let state = manager.get_guild_state(1).unwrap();
        let granted = state.role_command_permissions.get(&7).unwrap();
        assert_eq!(granted.len(), 1);
        assert!(granted.contains("A"));
        assert_eq!(repo.stored_grants(1, 7), granted.clone());
    }

    #[tokio::test]
    async fn remove_role_permissions_noop_skips_store() {
        let (manager, repo) = cached_manager().await;
        let valid = strings(&["A", "B"]);

        manager
            .add_role_permissions(1, 7, &strings(&["A"]), &valid)
            .await
            .unwrap();
        let writes_after_add = repo.writes();

        // "B" é válido mas nunca foi concedido; "Z" nem passa na allowlist
        let removed = manager
            .remove_role_permissions(1, 7, &strings(&["B", "Z"]), &valid)
            .await
            .unwrap();

        assert!(removed.is_empty());
        assert_eq!(repo.writes(), writes_after_add);
    }

    #[tokio::test]
    async fn remove_elevated_roles_drops_role_entries() {
        let (manager, repo) = cached_manager().await;
        let valid = strings(&["A", "B"]);

        manager
            .add_role_permissions(1, 7, &strings(&["A"]), &valid)
            .await
            .unwrap();
        manager
            .add_role_permissions(1, 8, &strings(&["B"]), &valid)
            .await
            .unwrap();

        let affected = manager.remove_elevated_roles(1, &[8, 9]).await.unwrap();

        assert_eq!(affected, vec![8]);
        let state = manager.get_guild_state(1).unwrap();
        // A chave do cargo 8 some por inteiro; o cargo 7 fica intacto
        assert!(!state.role_command_permissions.contains_key(&8));
        assert!(state.role_command_permissions.contains_key(&7));
        assert!(repo.stored_grants(1, 8).is_empty());
    }

    #[tokio::test]
    async fn remove_elevated_roles_noop_skips_store() {
        let (manager, repo) = cached_manager().await;
        let writes_before = repo.writes();

        let affected = manager.remove_elevated_roles(1, &[99]).await.unwrap();

        assert!(affected.is_empty());
        assert_eq!(repo.writes(), writes_before);
    }

    #[tokio::test]
    async fn evict_guild_keeps_store_row() {
        let (manager, repo) = cached_manager().await;

        manager
            .update_guild_config(channel_settings(1, Some(100), Some(200)))
            .await
            .unwrap();
        let before = manager.get_guild_state(1).unwrap().settings.clone();

        manager.evict_guild(1).await;
        assert!(matches!(
            manager.get_guild_state(1),
            Err(AppError::GuildNotCached(1))
        ));
        // A linha no banco sobrevive à remoção do cache
        assert_eq!(repo.stored_settings(1), Some(before.clone()));

        // Registrar de novo repovoa a partir da linha que sobreviveu no banco
        manager.register_guild(&guild_info(1)).await.unwrap();
        let after = manager.get_guild_state(1).unwrap();
        assert_eq!(after.settings, before);
    }

    #[tokio::test]
    async fn evict_guild_is_silent_for_unknown_guild() {
        let repo = Arc::new(MockGuildRepository::new());
        let manager = GuildStateManager::new(repo);

        manager.evict_guild(42).await;
    }

    #[tokio::test]
    async fn register_guilds_registers_all() {
        let repo = Arc::new(MockGuildRepository::new());
        let manager = GuildStateManager::new(repo);

        manager
            .register_guilds(&[guild_info(1), guild_info(2)])
            .await
            .unwrap();

        assert!(manager.get_guild_state(1).is_ok());
        assert!(manager.get_guild_state(2).is_ok());
    }
}
