//! The durable persistence port (SPEC_FULL.md §6): a `SnapshotStore` trait
//! plus a `sqlx`/Postgres implementation. Snapshots are optimistically
//! versioned; the event log is append-only and is never read back by the
//! manager except for the `loadEvents` audit operation.

use crate::machine::GameState;
use crate::types::{GameContext, GameEvent, GameId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;

/// A game's durable snapshot: its full context plus the state path it was
/// in when last saved, tagged with an optimistic-lock version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub game_id: GameId,
    pub version: i64,
    pub state: GameState,
    pub context: GameContext,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot for game {0} not found")]
    NotFound(GameId),
    #[error("version conflict saving game {0}: expected version {1}")]
    VersionConflict(GameId, i64),
    #[error("database unavailable: {0}")]
    DatabaseUnavailable(#[from] sqlx::Error),
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The persistence port. The manager depends only on this trait — the
/// concrete backend (Postgres here) is swappable without touching game
/// logic.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Inserts or updates `snapshot`. When `snapshot.version` is greater
    /// than 1, the write must be conditioned on the stored row currently
    /// being at `version - 1`; a mismatch (or no existing row for a
    /// version > 1) is a `VersionConflict`.
    async fn save_snapshot(&self, snapshot: &GameSnapshot) -> Result<(), StoreError>;

    async fn load_snapshot(&self, game_id: GameId) -> Result<Option<GameSnapshot>, StoreError>;

    /// Returns every snapshot whose state is not `Ended`, for recovery on
    /// process restart.
    async fn load_active_snapshots(&self) -> Result<Vec<GameSnapshot>, StoreError>;

    async fn save_event(&self, game_id: GameId, event: &GameEvent) -> Result<(), StoreError>;

    async fn load_events(&self, game_id: GameId) -> Result<Vec<GameEvent>, StoreError>;
}

/// Postgres-backed `SnapshotStore`: pool built at startup, schema ensured
/// inline with `CREATE TABLE IF NOT EXISTS`.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS game_snapshots (
                game_id UUID PRIMARY KEY,
                version BIGINT NOT NULL,
                status TEXT NOT NULL,
                state JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS game_events (
                event_id BIGSERIAL PRIMARY KEY,
                game_id UUID NOT NULL,
                event_type TEXT NOT NULL,
                data JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS game_events_game_id_idx ON game_events (game_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn status_label(state: GameState) -> &'static str {
        match state {
            GameState::Lobby => "lobby",
            GameState::Setup => "setup",
            GameState::Playing => "playing",
            GameState::Starvation => "starvation",
            GameState::Paused => "paused",
            GameState::Ended => "ended",
        }
    }

    fn row_to_snapshot(row: &sqlx::postgres::PgRow) -> Result<GameSnapshot, StoreError> {
        let game_id: uuid::Uuid = row.try_get("game_id")?;
        let version: i64 = row.try_get("version")?;
        let state_json: serde_json::Value = row.try_get("state")?;
        let status: String = row.try_get("status")?;
        let context: GameContext = serde_json::from_value(state_json)?;
        let state = match status.as_str() {
            "lobby" => GameState::Lobby,
            "setup" => GameState::Setup,
            "playing" => GameState::Playing,
            "starvation" => GameState::Starvation,
            "paused" => GameState::Paused,
            _ => GameState::Ended,
        };
        Ok(GameSnapshot { game_id, version, state, context })
    }
}

#[async_trait]
impl SnapshotStore for PostgresStore {
    async fn save_snapshot(&self, snapshot: &GameSnapshot) -> Result<(), StoreError> {
        let state_json = serde_json::to_value(&snapshot.context)?;
        let status = Self::status_label(snapshot.state);

        if snapshot.version <= 1 {
            sqlx::query(
                r#"
                INSERT INTO game_snapshots (game_id, version, status, state, updated_at)
                VALUES ($1, $2, $3, $4, now())
                ON CONFLICT (game_id) DO UPDATE
                SET version = EXCLUDED.version, status = EXCLUDED.status,
                    state = EXCLUDED.state, updated_at = now()
                "#,
            )
            .bind(snapshot.game_id)
            .bind(snapshot.version)
            .bind(status)
            .bind(state_json)
            .execute(&self.pool)
            .await?;
            return Ok(());
        }

        let result = sqlx::query(
            r#"
            UPDATE game_snapshots
            SET version = $2, status = $3, state = $4, updated_at = now()
            WHERE game_id = $1 AND version = $5
            "#,
        )
        .bind(snapshot.game_id)
        .bind(snapshot.version)
        .bind(status)
        .bind(state_json)
        .bind(snapshot.version - 1)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::VersionConflict(snapshot.game_id, snapshot.version - 1));
        }
        Ok(())
    }

    async fn load_snapshot(&self, game_id: GameId) -> Result<Option<GameSnapshot>, StoreError> {
        let row = sqlx::query("SELECT game_id, version, status, state FROM game_snapshots WHERE game_id = $1")
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_snapshot).transpose()
    }

    async fn load_active_snapshots(&self) -> Result<Vec<GameSnapshot>, StoreError> {
        let rows = sqlx::query(
            "SELECT game_id, version, status, state FROM game_snapshots WHERE status != 'ended' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_snapshot).collect()
    }

    async fn save_event(&self, game_id: GameId, event: &GameEvent) -> Result<(), StoreError> {
        let event_type = event_type_label(event);
        let data = serde_json::to_value(event)?;
        sqlx::query("INSERT INTO game_events (game_id, event_type, data) VALUES ($1, $2, $3)")
            .bind(game_id)
            .bind(event_type)
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn load_events(&self, game_id: GameId) -> Result<Vec<GameEvent>, StoreError> {
        let rows = sqlx::query("SELECT data FROM game_events WHERE game_id = $1 ORDER BY event_id ASC")
            .bind(game_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let data: serde_json::Value = row.try_get("data")?;
                Ok(serde_json::from_value(data)?)
            })
            .collect()
    }
}

fn event_type_label(event: &GameEvent) -> &'static str {
    match event {
        GameEvent::Move { .. } => "move",
        GameEvent::Push { .. } => "push",
        GameEvent::Eliminated { .. } => "eliminated",
        GameEvent::TurnEnded { .. } => "turn_ended",
        GameEvent::TurnSkipped { .. } => "turn_skipped",
        GameEvent::GameEnded { .. } => "game_ended",
        GameEvent::StarvationTriggered => "starvation_triggered",
        GameEvent::StarvationResolved => "starvation_resolved",
        GameEvent::JarlStarved { .. } => "jarl_starved",
        GameEvent::PlayerJoined { .. } => "player_joined",
        GameEvent::PlayerLeft { .. } => "player_left",
    }
}

/// An in-memory `SnapshotStore` used by manager/integration tests instead
/// of a live Postgres instance.
#[cfg(any(test, feature = "test-support"))]
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    pub struct InMemoryStore {
        snapshots: Mutex<HashMap<GameId, GameSnapshot>>,
        events: Mutex<HashMap<GameId, Vec<GameEvent>>>,
    }

    #[async_trait]
    impl SnapshotStore for InMemoryStore {
        async fn save_snapshot(&self, snapshot: &GameSnapshot) -> Result<(), StoreError> {
            let mut snapshots = self.snapshots.lock().await;
            if snapshot.version > 1 {
                match snapshots.get(&snapshot.game_id) {
                    Some(existing) if existing.version == snapshot.version - 1 => {}
                    _ => return Err(StoreError::VersionConflict(snapshot.game_id, snapshot.version - 1)),
                }
            }
            snapshots.insert(snapshot.game_id, snapshot.clone());
            Ok(())
        }

        async fn load_snapshot(&self, game_id: GameId) -> Result<Option<GameSnapshot>, StoreError> {
            Ok(self.snapshots.lock().await.get(&game_id).cloned())
        }

        async fn load_active_snapshots(&self) -> Result<Vec<GameSnapshot>, StoreError> {
            Ok(self
                .snapshots
                .lock()
                .await
                .values()
                .filter(|s| s.state != GameState::Ended)
                .cloned()
                .collect())
        }

        async fn save_event(&self, game_id: GameId, event: &GameEvent) -> Result<(), StoreError> {
            self.events.lock().await.entry(game_id).or_default().push(event.clone());
            Ok(())
        }

        async fn load_events(&self, game_id: GameId) -> Result<Vec<GameEvent>, StoreError> {
            Ok(self.events.lock().await.get(&game_id).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn optimistic_lock_rejects_stale_version() {
        let store = InMemoryStore::default();
        let game_id = GameId::new_v4();
        let ctx = GameContext::new(
            game_id,
            crate::types::GameConfig {
                player_count: 2,
                board_radius: 4,
                warrior_count: 3,
                turn_timer_ms: None,
                terrain: crate::types::Terrain::Calm,
            },
        );
        store
            .save_snapshot(&GameSnapshot { game_id, version: 1, state: GameState::Lobby, context: ctx.clone() })
            .await
            .unwrap();
        store
            .save_snapshot(&GameSnapshot { game_id, version: 2, state: GameState::Lobby, context: ctx.clone() })
            .await
            .unwrap();
        let conflict = store
            .save_snapshot(&GameSnapshot { game_id, version: 2, state: GameState::Lobby, context: ctx })
            .await;
        assert!(matches!(conflict, Err(StoreError::VersionConflict(_, _))));
    }

    #[tokio::test]
    async fn load_active_snapshots_excludes_ended() {
        let store = InMemoryStore::default();
        let make_ctx = || {
            GameContext::new(
                GameId::new_v4(),
                crate::types::GameConfig {
                    player_count: 2,
                    board_radius: 4,
                    warrior_count: 3,
                    turn_timer_ms: None,
                    terrain: crate::types::Terrain::Calm,
                },
            )
        };
        let active_id = GameId::new_v4();
        let ended_id = GameId::new_v4();
        store
            .save_snapshot(&GameSnapshot { game_id: active_id, version: 1, state: GameState::Playing, context: make_ctx() })
            .await
            .unwrap();
        store
            .save_snapshot(&GameSnapshot { game_id: ended_id, version: 1, state: GameState::Ended, context: make_ctx() })
            .await
            .unwrap();

        let active = store.load_active_snapshots().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].game_id, active_id);
    }
}
