//! Job repository: keyed reads and merge-patch writes for the `jobs` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::job::{JobKey, JobPatch, JobRecord, JobStatus, PatchOutcome};

fn parse_status(s: &str, job_id: &str) -> JobStatus {
    s.parse().unwrap_or_else(|_| {
        log::warn!(
            "Unknown job status '{}' for job {}, defaulting to Pending",
            s,
            job_id
        );
        JobStatus::Pending
    })
}

fn record_from_row(row: &Row<'_>) -> Result<JobRecord, rusqlite::Error> {
    let job_id: String = row.get("job_id")?;
    let status: String = row.get("status")?;
    let file_size: Option<i64> = row.get("file_size")?;

    Ok(JobRecord {
        status: parse_status(&status, &job_id),
        job_id,
        created_at: row.get("created_at")?,
        user_id: row.get("user_id")?,
        filename: row.get("filename")?,
        processing_stage: row.get("processing_stage")?,
        group_id: row.get("group_id")?,
        page_number: row.get("page_number")?,
        source_container: row.get("source_container")?,
        source_key: row.get("source_key")?,
        file_size: file_size.map(|s| s.max(0) as u64),
        mime_type: row.get("mime_type")?,
        recognition_handle: row.get("recognition_handle")?,
        extracted_text: row.get("extracted_text")?,
        corrected_text: row.get("corrected_text")?,
        confidence_score: row.get("confidence_score")?,
        correction_confidence: row.get("correction_confidence")?,
        combined_confidence: row.get("combined_confidence")?,
        corrections_applied: row.get("corrections_applied")?,
        correction_model: row.get("correction_model")?,
        document_type: row.get("document_type")?,
        error: row.get("error")?,
        updated_at: row.get("updated_at")?,
        completed_at: row.get("completed_at")?,
    })
}

/// Merges `patch` into the job identified by `key`, creating a `pending` row
/// first if none exists. Rows that are already terminal are left untouched.
pub fn patch(
    db: &Database,
    key: &JobKey,
    patch: &JobPatch,
    now: &str,
) -> Result<PatchOutcome, DatabaseError> {
    db.with_conn(|conn| {
        let tx = conn.unchecked_transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO jobs (job_id, created_at, status, updated_at)
             VALUES (?1, ?2, 'pending', ?3)",
            params![key.job_id, key.created_at, now],
        )?;

        let status = patch.status.map(|s| s.as_str());
        let changed = tx.execute(
            "UPDATE jobs SET
                user_id = COALESCE(?4, user_id),
                filename = COALESCE(?5, filename),
                status = COALESCE(?6, status),
                processing_stage = COALESCE(?7, processing_stage),
                group_id = COALESCE(?8, group_id),
                page_number = COALESCE(?9, page_number),
                source_container = COALESCE(?10, source_container),
                source_key = COALESCE(?11, source_key),
                file_size = COALESCE(?12, file_size),
                mime_type = COALESCE(?13, mime_type),
                recognition_handle = COALESCE(?14, recognition_handle),
                extracted_text = COALESCE(?15, extracted_text),
                corrected_text = COALESCE(?16, corrected_text),
                confidence_score = COALESCE(?17, confidence_score),
                correction_confidence = COALESCE(?18, correction_confidence),
                combined_confidence = COALESCE(?19, combined_confidence),
                corrections_applied = COALESCE(?20, corrections_applied),
                correction_model = COALESCE(?21, correction_model),
                document_type = COALESCE(?22, document_type),
                error = COALESCE(?23, error),
                completed_at = CASE WHEN ?6 IN ('completed', 'failed') THEN ?3 ELSE completed_at END,
                updated_at = ?3
             WHERE job_id = ?1 AND created_at = ?2 AND status NOT IN ('completed', 'failed')",
            params![
                key.job_id,
                key.created_at,
                now,
                patch.user_id,
                patch.filename,
                status,
                patch.processing_stage,
                patch.group_id,
                patch.page_number,
                patch.source_container,
                patch.source_key,
                patch.file_size.map(|s| s as i64),
                patch.mime_type,
                patch.recognition_handle,
                patch.extracted_text,
                patch.corrected_text,
                patch.confidence_score,
                patch.correction_confidence,
                patch.combined_confidence,
                patch.corrections_applied,
                patch.correction_model,
                patch.document_type,
                patch.error,
            ],
        )?;

        let outcome = if changed == 0 {
            let stored: String = tx.query_row(
                "SELECT status FROM jobs WHERE job_id = ?1 AND created_at = ?2",
                params![key.job_id, key.created_at],
                |r| r.get(0),
            )?;
            PatchOutcome::Terminal(parse_status(&stored, &key.job_id))
        } else {
            PatchOutcome::Applied
        };

        tx.commit()?;
        Ok(outcome)
    })
}

/// Finds a job by its composite key.
pub fn find(db: &Database, key: &JobKey) -> Result<Option<JobRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let record = conn
            .query_row(
                "SELECT * FROM jobs WHERE job_id = ?1 AND created_at = ?2",
                params![key.job_id, key.created_at],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    })
}

/// Lists a user's jobs, newest first.
pub fn list_for_user(
    db: &Database,
    user_id: &str,
    limit: u64,
) -> Result<Vec<JobRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM jobs WHERE user_id = ?1
             ORDER BY created_at DESC, job_id ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists jobs a worker had started (`processing`/`ai_correction`) whose last
/// write is older than `cutoff`. Queued jobs are still owed a delivery.
pub fn list_in_flight_before(
    db: &Database,
    cutoff: &str,
) -> Result<Vec<JobRecord>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM jobs
             WHERE status IN ('processing', 'ai_correction') AND updated_at < ?1
             ORDER BY updated_at ASC",
        )?;
        let rows = stmt
            .query_map(params![cutoff], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
