use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, like_pattern, parse_datetime},
    models::{
        CommodityType, Floor, NewReading, ReadingFilter, ReadingPage, ReadingRecord,
        ReadingSample,
    },
};

const READING_COLUMNS: &str = "id, meter_name, building, floor, value, consumption, captured_at, evidence_url, annotation, operator";

fn row_to_record(row: &Row, commodity: CommodityType) -> Result<ReadingRecord> {
    let captured_at: String = row.get("captured_at")?;
    let floor: Option<String> = row.get("floor")?;

    Ok(ReadingRecord {
        id: row.get("id")?,
        commodity,
        meter_name: row.get("meter_name")?,
        building: row.get("building")?,
        floor: Floor::from_column(floor),
        value: row.get("value")?,
        consumption: row.get("consumption")?,
        captured_at: parse_datetime(&captured_at, "captured_at")?,
        evidence_url: row.get("evidence_url")?,
        annotation: row.get("annotation")?,
        operator: row.get("operator")?,
    })
}

fn row_to_sample(row: &Row) -> Result<ReadingSample> {
    let captured_at: String = row.get("captured_at")?;
    Ok(ReadingSample {
        value: row.get("value")?,
        consumption: row.get("consumption")?,
        captured_at: parse_datetime(&captured_at, "captured_at")?,
    })
}

impl Database {
    /// Append a reading. The consumption delta is taken against the latest
    /// reading of the same meter inside the same task, and is NULL for the
    /// meter's first reading.
    pub async fn append_reading(&self, reading: &NewReading) -> Result<ReadingRecord> {
        let record = reading.clone();
        self.execute(move |conn| {
            if !record.value.is_finite() {
                return Err(anyhow!("reading value must be finite"));
            }
            let table = record.commodity.readings_table();
            let tx = conn.transaction()?;

            let previous: Option<f64> = tx
                .query_row(
                    &format!(
                        "SELECT value FROM {table}
                         WHERE meter_name = ?1
                         ORDER BY captured_at DESC, id DESC
                         LIMIT 1"
                    ),
                    params![record.meter_name],
                    |row| row.get(0),
                )
                .optional()?;
            let consumption = previous.map(|prev| record.value - prev);

            tx.execute(
                &format!(
                    "INSERT INTO {table} (meter_name, building, floor, value, consumption, captured_at, evidence_url, annotation, operator)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    record.meter_name,
                    record.building,
                    record.floor.as_column(),
                    record.value,
                    consumption,
                    format_datetime(&record.captured_at),
                    record.evidence_url,
                    record.annotation,
                    record.operator,
                ],
            )
            .with_context(|| format!("failed to insert into {table}"))?;
            let id = tx.last_insert_rowid();
            tx.commit()?;

            Ok(ReadingRecord {
                id,
                commodity: record.commodity,
                meter_name: record.meter_name,
                building: record.building,
                floor: record.floor,
                value: record.value,
                consumption,
                captured_at: record.captured_at,
                evidence_url: record.evidence_url,
                annotation: record.annotation,
                operator: record.operator,
            })
        })
        .await
    }

    /// Samples captured in `[since, until]`, newest first.
    pub async fn readings_between(
        &self,
        commodity: CommodityType,
        meter_name: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ReadingSample>> {
        let meter_name = meter_name.to_string();
        self.execute(move |conn| {
            let table = commodity.readings_table();
            let mut stmt = conn.prepare(&format!(
                "SELECT value, consumption, captured_at FROM {table}
                 WHERE meter_name = ?1 AND captured_at >= ?2 AND captured_at <= ?3
                 ORDER BY captured_at DESC, id DESC"
            ))?;

            let mut rows = stmt.query(params![
                meter_name,
                format_datetime(&since),
                format_datetime(&until)
            ])?;
            let mut samples = Vec::new();
            while let Some(row) = rows.next()? {
                samples.push(row_to_sample(row)?);
            }
            Ok(samples)
        })
        .await
    }

    /// The `limit` most recent samples regardless of age, newest first.
    pub async fn latest_readings(
        &self,
        commodity: CommodityType,
        meter_name: &str,
        limit: usize,
    ) -> Result<Vec<ReadingSample>> {
        let meter_name = meter_name.to_string();
        let limit = limit as i64;
        self.execute(move |conn| {
            let table = commodity.readings_table();
            let mut stmt = conn.prepare(&format!(
                "SELECT value, consumption, captured_at FROM {table}
                 WHERE meter_name = ?1
                 ORDER BY captured_at DESC, id DESC
                 LIMIT ?2"
            ))?;

            let mut rows = stmt.query(params![meter_name, limit])?;
            let mut samples = Vec::new();
            while let Some(row) = rows.next()? {
                samples.push(row_to_sample(row)?);
            }
            Ok(samples)
        })
        .await
    }

    pub async fn get_reading(
        &self,
        commodity: CommodityType,
        reading_id: i64,
    ) -> Result<Option<ReadingRecord>> {
        self.execute(move |conn| {
            let table = commodity.readings_table();
            let mut stmt = conn.prepare(&format!(
                "SELECT {READING_COLUMNS} FROM {table} WHERE id = ?1"
            ))?;
            let mut rows = stmt.query(params![reading_id])?;
            let record = match rows.next()? {
                Some(row) => Some(row_to_record(row, commodity)?),
                None => None,
            };
            Ok(record)
        })
        .await
    }

    /// Newest-first page of persisted readings with the total matching count.
    pub async fn list_readings_paginated(
        &self,
        commodity: CommodityType,
        filter: ReadingFilter,
        limit: usize,
        offset: usize,
    ) -> Result<ReadingPage> {
        let limit = limit as i64;
        let offset = offset as i64;
        self.execute(move |conn| {
            let table = commodity.readings_table();

            let mut clauses = Vec::new();
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(building) = filter.building.clone() {
                clauses.push("building = ?");
                params_vec.push(Box::new(building));
            }
            match filter.floor.clone() {
                Some(Floor::None) => clauses.push("(floor IS NULL OR TRIM(floor) = '')"),
                Some(Floor::Level(label)) => {
                    clauses.push("floor = ?");
                    params_vec.push(Box::new(label));
                }
                None => {}
            }
            if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
                clauses.push("meter_name LIKE ? ESCAPE '\\'");
                params_vec.push(Box::new(like_pattern(search.trim())));
            }
            if let Some(from) = filter.from {
                clauses.push("captured_at >= ?");
                params_vec.push(Box::new(format_datetime(&from)));
            }
            if let Some(until) = filter.until {
                clauses.push("captured_at <= ?");
                params_vec.push(Box::new(format_datetime(&until)));
            }

            let where_clause = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {table} {where_clause}"),
                params_refs.as_slice(),
                |row| row.get(0),
            )?;

            let mut page_params = params_refs.clone();
            page_params.push(&limit);
            page_params.push(&offset);

            let mut stmt = conn.prepare(&format!(
                "SELECT {READING_COLUMNS} FROM {table} {where_clause}
                 ORDER BY captured_at DESC, id DESC
                 LIMIT ? OFFSET ?"
            ))?;
            let mut rows = stmt.query(page_params.as_slice())?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                records.push(row_to_record(row, commodity)?);
            }

            Ok(ReadingPage {
                records,
                total: u64::try_from(total).unwrap_or(0),
            })
        })
        .await
    }
}
