use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{json_column, to_json_text};
use crate::db::{DatabaseError, StatusChange};
use crate::models::enums::PrescriptionStatus;
use crate::models::{NewPrescription, PrescriptionRecord, PrescriptionStatsRow};

const PRESCRIPTION_COLUMNS: &str =
    "id, patient_id, patient_name, date, medications, status, image_url, created_by, created_at";

pub fn insert_prescription(
    conn: &Connection,
    id: &str,
    prescription: &NewPrescription,
    now: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO prescriptions (id, patient_id, patient_name, date, medications, status,
         image_url, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            id,
            prescription.patient_id,
            prescription.patient_name,
            prescription.date,
            to_json_text(&prescription.medications)?,
            prescription.status.as_str(),
            prescription.image_url,
            prescription.created_by,
            now,
        ],
    )?;
    Ok(())
}

type RawPrescription = (
    String,
    Option<String>,
    String,
    String,
    Option<String>,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn raw_from_row(row: &Row<'_>) -> rusqlite::Result<RawPrescription> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
    ))
}

fn prescription_from_raw(raw: RawPrescription) -> Result<PrescriptionRecord, DatabaseError> {
    let (id, patient_id, patient_name, date, medications, status, image_url, created_by, created_at) =
        raw;
    Ok(PrescriptionRecord {
        id,
        patient_id,
        patient_name,
        date,
        medications: json_column(medications),
        status: PrescriptionStatus::from_str(&status)?,
        image_url,
        created_by,
        created_at,
    })
}

pub fn get_prescription(
    conn: &Connection,
    id: &str,
) -> Result<Option<PrescriptionRecord>, DatabaseError> {
    let sql = format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE id = ?1");
    conn.query_row(&sql, params![id], raw_from_row)
        .optional()?
        .map(prescription_from_raw)
        .transpose()
}

pub fn list_prescriptions(
    conn: &Connection,
    limit: u32,
    offset: u32,
) -> Result<Vec<PrescriptionRecord>, DatabaseError> {
    let sql = format!(
        "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions
         ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![limit, offset], raw_from_row)?;

    let mut prescriptions = Vec::new();
    for row in rows {
        prescriptions.push(prescription_from_raw(row?)?);
    }
    Ok(prescriptions)
}

pub fn count_prescriptions(conn: &Connection) -> Result<u64, DatabaseError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM prescriptions", [], |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

/// Confirm-only status change inside one transaction.
pub fn update_prescription_status(
    conn: &mut Connection,
    id: &str,
    next: PrescriptionStatus,
) -> Result<StatusChange, DatabaseError> {
    let tx = conn.transaction()?;
    let current: Option<String> = tx
        .query_row(
            "SELECT status FROM prescriptions WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    let Some(current) = current else {
        return Ok(StatusChange::NotFound);
    };
    let current = PrescriptionStatus::from_str(&current)?;
    if !current.can_transition_to(next) {
        return Ok(StatusChange::Rejected { current });
    }

    tx.execute(
        "UPDATE prescriptions SET status = ?1 WHERE id = ?2",
        params![next.as_str(), id],
    )?;
    let updated = get_prescription(&tx, id)?.ok_or_else(|| DatabaseError::NotFound {
        entity_type: "prescription".into(),
        id: id.into(),
    })?;
    tx.commit()?;
    Ok(StatusChange::Updated(updated))
}

pub fn prescription_stats_rows(conn: &Connection) -> Result<Vec<PrescriptionStatsRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT status, date FROM prescriptions")?;
    let rows = stmt.query_map([], |row| {
        Ok(PrescriptionStatsRow {
            status: row.get(0)?,
            date: row.get(1)?,
        })
    })?;

    let mut stats = Vec::new();
    for row in rows {
        stats.push(row?);
    }
    Ok(stats)
}
