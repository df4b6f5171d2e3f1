use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::parse_commodity,
    models::{CommodityType, Floor, Meter},
};

const METER_COLUMNS: &str = "id, token, name, commodity, building, floor, active";

fn row_to_meter(row: &Row) -> Result<Meter> {
    let commodity: String = row.get("commodity")?;
    let floor: Option<String> = row.get("floor")?;
    let active: i64 = row.get("active")?;

    Ok(Meter {
        id: row.get("id")?,
        token: row.get("token")?,
        name: row.get("name")?,
        commodity: parse_commodity(&commodity)?,
        building: row.get("building")?,
        floor: Floor::from_column(floor),
        active: active != 0,
    })
}

impl Database {
    /// Strict-equality lookup of an active meter by its scan token.
    pub async fn get_meter_by_token(&self, token: &str) -> Result<Option<Meter>> {
        let token = token.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {METER_COLUMNS} FROM meters WHERE token = ?1 AND active = 1"
            ))?;
            let mut rows = stmt.query(params![token])?;
            let meter = match rows.next()? {
                Some(row) => Some(row_to_meter(row)?),
                None => None,
            };
            Ok(meter)
        })
        .await
    }

    pub async fn get_meter(&self, meter_id: &str) -> Result<Option<Meter>> {
        let meter_id = meter_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {METER_COLUMNS} FROM meters WHERE id = ?1 AND active = 1"
            ))?;
            let mut rows = stmt.query(params![meter_id])?;
            let meter = match rows.next()? {
                Some(row) => Some(row_to_meter(row)?),
                None => None,
            };
            Ok(meter)
        })
        .await
    }

    /// Active meters of one commodity, ordered by name (binary collation).
    pub async fn list_meters_by_commodity(&self, commodity: CommodityType) -> Result<Vec<Meter>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {METER_COLUMNS} FROM meters
                 WHERE commodity = ?1 AND active = 1
                 ORDER BY name COLLATE BINARY ASC, id ASC"
            ))?;

            let mut rows = stmt.query(params![commodity.as_str()])?;
            let mut meters = Vec::new();
            while let Some(row) = rows.next()? {
                meters.push(row_to_meter(row)?);
            }
            Ok(meters)
        })
        .await
    }

    /// Administrative insert-or-replace. The reading workflow never calls this.
    /// A token already printed on another meter is rejected.
    pub async fn upsert_meter(&self, meter: &Meter) -> Result<()> {
        let record = meter.clone();
        self.execute(move |conn| {
            if let Some(token) = record.token.as_deref() {
                let owner: Option<String> = conn
                    .query_row(
                        "SELECT id FROM meters WHERE token = ?1",
                        params![token],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(owner) = owner {
                    if owner != record.id {
                        anyhow::bail!("scan token already assigned to meter {owner}");
                    }
                }
            }

            conn.execute(
                "INSERT INTO meters (id, token, name, commodity, building, floor, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                     token = excluded.token,
                     name = excluded.name,
                     commodity = excluded.commodity,
                     building = excluded.building,
                     floor = excluded.floor,
                     active = excluded.active",
                params![
                    record.id,
                    record.token,
                    record.name,
                    record.commodity.as_str(),
                    record.building,
                    record.floor.as_column(),
                    record.active as i64,
                ],
            )
            .with_context(|| format!("failed to upsert meter {}", record.id))?;
            Ok(())
        })
        .await
    }
}
