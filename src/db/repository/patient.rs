use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{json_column, to_json_text};
use crate::db::DatabaseError;
use crate::models::{NewPatientRecord, PatientStatsRow, StoredPatient};

const PATIENT_COLUMNS: &str = "id, name, age, gender, symptoms, history, urgency_score, urgency_level,
     wait_time, urgency_reasoning, avatar, risk_scores, ai_summary, created_by, created_at, updated_at";

pub fn insert_patient(
    conn: &Connection,
    id: &str,
    record: &NewPatientRecord,
    now: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, name, age, gender, symptoms, history, urgency_score, urgency_level,
         wait_time, urgency_reasoning, avatar, risk_scores, ai_summary, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
        params![
            id,
            record.intake.name,
            record.intake.age,
            record.intake.gender.map(|g| g.as_str()),
            record.intake.symptoms,
            to_json_text(&record.intake.history)?,
            record.urgency.score,
            record.urgency.level.as_str(),
            record.urgency.wait_time,
            record.urgency.reasoning,
            record.avatar,
            to_json_text(&record.risk_scores)?,
            to_json_text(&record.summary)?,
            record.created_by,
            now,
        ],
    )?;
    Ok(())
}

fn stored_patient_from_row(row: &Row<'_>) -> rusqlite::Result<StoredPatient> {
    Ok(StoredPatient {
        id: row.get(0)?,
        name: row.get(1)?,
        age: row.get(2)?,
        gender: row.get(3)?,
        symptoms: row.get(4)?,
        history: Some(json_column(row.get(5)?)),
        urgency_score: row.get(6)?,
        urgency_level: row.get(7)?,
        wait_time: row.get(8)?,
        urgency_reasoning: row.get(9)?,
        avatar: row.get(10)?,
        risk_scores: json_column(row.get(11)?),
        ai_summary: row
            .get::<_, Option<String>>(12)?
            .map(serde_json::Value::String)
            .unwrap_or_default(),
        created_by: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

pub fn get_patient(conn: &Connection, id: &str) -> Result<Option<StoredPatient>, DatabaseError> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id], stored_patient_from_row)
        .optional()?;
    Ok(row)
}

/// Highest urgency first; ties broken by arrival order.
pub fn list_patients(
    conn: &Connection,
    limit: u32,
    offset: u32,
) -> Result<Vec<StoredPatient>, DatabaseError> {
    let sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients
         ORDER BY urgency_score DESC, created_at ASC
         LIMIT ?1 OFFSET ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![limit, offset], stored_patient_from_row)?;

    let mut patients = Vec::new();
    for row in rows {
        patients.push(row?);
    }
    Ok(patients)
}

pub fn count_patients(conn: &Connection) -> Result<u64, DatabaseError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?;
    Ok(count.max(0) as u64)
}

pub fn delete_patient(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let deleted = conn.execute("DELETE FROM patients WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}

pub fn patient_stats_rows(conn: &Connection) -> Result<Vec<PatientStatsRow>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT urgency_level, wait_time, risk_scores FROM patients")?;
    let rows = stmt.query_map([], |row| {
        Ok(PatientStatsRow {
            urgency_level: row.get(0)?,
            wait_time: row.get(1)?,
            risk_scores: json_column(row.get(2)?),
        })
    })?;

    let mut stats = Vec::new();
    for row in rows {
        stats.push(row?);
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::{Gender, SeverityLevel};
    use crate::models::*;

    fn record(name: &str, score: u8) -> NewPatientRecord {
        NewPatientRecord {
            intake: PatientIntake {
                name: name.into(),
                age: Some(30),
                gender: Some(Gender::Female),
                symptoms: "fever".into(),
                history: vec!["Asthma".into()],
            },
            urgency: UrgencyAssessment {
                score,
                level: UrgencyAssessment::level_for_score(score),
                wait_time: UrgencyAssessment::wait_time_for_score(score).into(),
                reasoning: "test".into(),
            },
            risk_scores: vec![RiskFinding::general_assessment()],
            summary: ClinicalSummary::from_legacy_text("summary"),
            avatar: derive_avatar(name),
            created_by: None,
        }
    }

    #[test]
    fn insert_and_get_round_trip() {
        let conn = open_memory_database().unwrap();
        insert_patient(&conn, "p1", &record("Sara Ali", 40), "2026-01-01T00:00:00Z").unwrap();
        let row = get_patient(&conn, "p1").unwrap().unwrap();
        let patient = PatientRecord::from_stored(row);
        assert_eq!(patient.name, "Sara Ali");
        assert_eq!(patient.history, vec!["Asthma"]);
        assert_eq!(patient.urgency_level, SeverityLevel::Medium);
        assert_eq!(patient.ai_summary.clinical_summary_en, "summary");
        assert_eq!(patient.created_at.as_deref(), Some("2026-01-01T00:00:00Z"));
    }

    #[test]
    fn missing_patient_is_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_patient(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn list_is_ordered_by_urgency_and_paged() {
        let conn = open_memory_database().unwrap();
        insert_patient(&conn, "a", &record("Low One", 10), "2026-01-01T00:00:01Z").unwrap();
        insert_patient(&conn, "b", &record("High One", 90), "2026-01-01T00:00:02Z").unwrap();
        insert_patient(&conn, "c", &record("Mid One", 50), "2026-01-01T00:00:03Z").unwrap();

        let ids: Vec<String> = list_patients(&conn, 10, 0).unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        let page: Vec<String> = list_patients(&conn, 1, 1).unwrap().into_iter().map(|p| p.id).collect();
        assert_eq!(page, vec!["c"]);
        assert_eq!(count_patients(&conn).unwrap(), 3);
    }

    #[test]
    fn delete_reports_whether_a_row_matched() {
        let conn = open_memory_database().unwrap();
        insert_patient(&conn, "p1", &record("A B", 20), "t").unwrap();
        assert!(delete_patient(&conn, "p1").unwrap());
        assert!(!delete_patient(&conn, "p1").unwrap());
    }

    #[test]
    fn legacy_plain_summary_row_is_readable() {
        let conn = open_memory_database().unwrap();
        insert_patient(&conn, "p1", &record("A B", 20), "t").unwrap();
        conn.execute("UPDATE patients SET ai_summary = 'Old narrative' WHERE id = 'p1'", [])
            .unwrap();
        let patient = PatientRecord::from_stored(get_patient(&conn, "p1").unwrap().unwrap());
        assert_eq!(patient.ai_summary.clinical_summary_en, "Old narrative");
        assert!(!patient.ai_summary.suggested_actions.is_empty());
    }

    #[test]
    fn stats_projection() {
        let conn = open_memory_database().unwrap();
        insert_patient(&conn, "p1", &record("A B", 85), "t").unwrap();
        let rows = patient_stats_rows(&conn).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].urgency_level.as_deref(), Some("Critical"));
        assert_eq!(rows[0].wait_time.as_deref(), Some("Immediate"));
        assert!(rows[0].risk_scores.is_array());
    }
}
