//! # pb-db-sqlite Implementation
//!
//! SQLite-backed `ConfigStore`. Maps the `communities` table onto
//! `CommunityConfig` and keeps every record it has served in memory, so the
//! intake path only touches the database on first contact with a community.

use async_trait::async_trait;
use dashmap::DashMap;
use pb_core::error::AppError;
use pb_core::models::{ChannelId, CommunityConfig, CommunityId, RoleId};
use pb_core::traits::ConfigStore;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqliteConfigStore {
    pool: SqlitePool,
    cache: DashMap<CommunityId, CommunityConfig>,
}

// SQLite has no unsigned integers; snowflakes round-trip bit-for-bit through i64.
fn to_sql(id: u64) -> i64 {
    id as i64
}

fn from_sql(id: i64) -> u64 {
    id as u64
}

fn channel(row: &SqliteRow, column: &str) -> sqlx::Result<Option<ChannelId>> {
    Ok(row.try_get::<Option<i64>, _>(column)?.map(|id| ChannelId(from_sql(id))))
}

fn role(row: &SqliteRow, column: &str) -> sqlx::Result<Option<RoleId>> {
    Ok(row.try_get::<Option<i64>, _>(column)?.map(|id| RoleId(from_sql(id))))
}

fn config_from_row(row: &SqliteRow) -> sqlx::Result<CommunityConfig> {
    Ok(CommunityConfig {
        moderation_channel: channel(row, "moderation_channel")?,
        raid_containment_channel: channel(row, "raid_containment_channel")?,
        silence_containment_channel: channel(row, "silence_containment_channel")?,
        log_channel: channel(row, "log_channel")?,
        member_role: role(row, "member_role")?,
        silence_role: role(row, "silence_role")?,
        new_role: role(row, "new_role")?,
        role_setup_complete: row.try_get("role_setup_complete")?,
        max_pressure: row.try_get("max_pressure")?,
        base_pressure: row.try_get("base_pressure")?,
        media_pressure: row.try_get("media_pressure")?,
        char_pressure: row.try_get("char_pressure")?,
        line_pressure: row.try_get("line_pressure")?,
        mention_pressure: row.try_get("mention_pressure")?,
        repeat_pressure: row.try_get("repeat_pressure")?,
        pressure_dropoff: row.try_get("pressure_dropoff")?,
    })
}

impl SqliteConfigStore {
    /// Connects (creating the database file if needed) and runs migrations.
    pub async fn new(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool, cache: DashMap::new() })
    }

    /// Inserts or replaces the record for `community` and refreshes the cache.
    pub async fn upsert_config(
        &self,
        community: CommunityId,
        config: &CommunityConfig,
    ) -> anyhow::Result<()> {
        config.validate()?;

        let channel_id = |c: Option<ChannelId>| c.map(|c| to_sql(c.0));
        let role_id = |r: Option<RoleId>| r.map(|r| to_sql(r.0));

        sqlx::query(
            "INSERT INTO communities (
                id, moderation_channel, raid_containment_channel, silence_containment_channel,
                log_channel, member_role, silence_role, new_role, role_setup_complete,
                max_pressure, base_pressure, media_pressure, char_pressure, line_pressure,
                mention_pressure, repeat_pressure, pressure_dropoff
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                moderation_channel = excluded.moderation_channel,
                raid_containment_channel = excluded.raid_containment_channel,
                silence_containment_channel = excluded.silence_containment_channel,
                log_channel = excluded.log_channel,
                member_role = excluded.member_role,
                silence_role = excluded.silence_role,
                new_role = excluded.new_role,
                role_setup_complete = excluded.role_setup_complete,
                max_pressure = excluded.max_pressure,
                base_pressure = excluded.base_pressure,
                media_pressure = excluded.media_pressure,
                char_pressure = excluded.char_pressure,
                line_pressure = excluded.line_pressure,
                mention_pressure = excluded.mention_pressure,
                repeat_pressure = excluded.repeat_pressure,
                pressure_dropoff = excluded.pressure_dropoff",
        )
        .bind(to_sql(community.0))
        .bind(channel_id(config.moderation_channel))
        .bind(channel_id(config.raid_containment_channel))
        .bind(channel_id(config.silence_containment_channel))
        .bind(channel_id(config.log_channel))
        .bind(role_id(config.member_role))
        .bind(role_id(config.silence_role))
        .bind(role_id(config.new_role))
        .bind(config.role_setup_complete)
        .bind(config.max_pressure)
        .bind(config.base_pressure)
        .bind(config.media_pressure)
        .bind(config.char_pressure)
        .bind(config.line_pressure)
        .bind(config.mention_pressure)
        .bind(config.repeat_pressure)
        .bind(config.pressure_dropoff)
        .execute(&self.pool)
        .await?;

        self.cache.insert(community, config.clone());
        debug!(%community, "Stored community configuration");
        Ok(())
    }

    /// Registers `community` with default settings unless it already has a
    /// record, and returns whatever is stored.
    pub async fn ensure_community(&self, community: CommunityId) -> anyhow::Result<CommunityConfig> {
        sqlx::query("INSERT INTO communities (id) VALUES (?) ON CONFLICT(id) DO NOTHING")
            .bind(to_sql(community.0))
            .execute(&self.pool)
            .await?;

        let config = self.fetch(community).await?.ok_or_else(|| {
            AppError::Internal(format!("community {community} vanished after insert"))
        })?;
        Ok(config)
    }

    /// Reads straight from the database, refreshing the cache on a hit.
    async fn fetch(&self, community: CommunityId) -> anyhow::Result<Option<CommunityConfig>> {
        let row = sqlx::query("SELECT * FROM communities WHERE id = ?")
            .bind(to_sql(community.0))
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let config = config_from_row(&row)?;
        self.cache.insert(community, config.clone());
        Ok(Some(config))
    }
}

#[async_trait]
impl ConfigStore for SqliteConfigStore {
    async fn get_config(&self, community: CommunityId) -> anyhow::Result<Option<CommunityConfig>> {
        if let Some(cached) = self.cache.get(&community) {
            return Ok(Some(cached.clone()));
        }
        self.fetch(community).await
    }
}
