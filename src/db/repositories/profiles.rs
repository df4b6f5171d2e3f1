use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::optional_flag,
    models::{AccessToken, Profile},
};

fn row_to_profile(row: &Row) -> Result<Profile> {
    Ok(Profile {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        role: row.get("role")?,
        access_readings: optional_flag(row.get("access_readings")?),
        access_hr: optional_flag(row.get("access_hr")?),
        export: optional_flag(row.get("access_export")?),
        view: optional_flag(row.get("access_view")?),
    })
}

impl Database {
    pub async fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let user_id = user_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, email, role, access_readings, access_hr, access_export, access_view
                 FROM profiles
                 WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![user_id])?;
            let profile = match rows.next()? {
                Some(row) => Some(row_to_profile(row)?),
                None => None,
            };
            Ok(profile)
        })
        .await
    }

    pub async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        let record = profile.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO profiles (id, name, email, role, access_readings, access_hr, access_export, access_view)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                     name = excluded.name,
                     email = excluded.email,
                     role = excluded.role,
                     access_readings = excluded.access_readings,
                     access_hr = excluded.access_hr,
                     access_export = excluded.access_export,
                     access_view = excluded.access_view",
                params![
                    record.id,
                    record.name,
                    record.email,
                    record.role.as_deref().unwrap_or("user"),
                    record.access_readings,
                    record.access_hr,
                    record.export,
                    record.view,
                ],
            )
            .with_context(|| format!("failed to upsert profile {}", record.id))?;
            Ok(())
        })
        .await
    }

    /// Active access token with exactly this value.
    pub async fn find_active_access_token(&self, token: &str) -> Result<Option<AccessToken>> {
        let token = token.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, token, description, active
                 FROM access_tokens
                 WHERE token = ?1 AND active = 1",
            )?;
            let mut rows = stmt.query(params![token])?;
            let found = match rows.next()? {
                Some(row) => {
                    let active: i64 = row.get("active")?;
                    Some(AccessToken {
                        id: row.get("id")?,
                        token: row.get("token")?,
                        description: row.get("description")?,
                        active: active != 0,
                    })
                }
                None => None,
            };
            Ok(found)
        })
        .await
    }

    pub async fn insert_access_token(&self, access_token: &AccessToken) -> Result<()> {
        let record = access_token.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO access_tokens (id, token, description, active)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id,
                    record.token,
                    record.description,
                    record.active as i64,
                ],
            )
            .with_context(|| "failed to insert access token")?;
            Ok(())
        })
        .await
    }
}
