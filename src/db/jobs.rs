use tokio_rusqlite::rusqlite::OptionalExtension;
use tokio_rusqlite::{Connection, params, rusqlite};
use uuid::Uuid;

use super::failed;
use crate::core::catalog::QueryError;
use crate::core::models::{Job, JobData, JobStatus, JobStatusEntry, JobWithHistory};

fn encode_data(job: &Job) -> Result<String, QueryError> {
    serde_json::to_string(&JobData {
        description: job.description.clone(),
    })
    .map_err(failed)
}

fn decode_data(data: &str) -> Result<String, QueryError> {
    let data: JobData = serde_json::from_str(data).map_err(failed)?;
    Ok(data.description)
}

fn decode_status(status: &str) -> Result<JobStatus, QueryError> {
    JobStatus::from_str(status)
        .ok_or_else(|| QueryError::Failed(format!("Unknown job status '{}'", status)))
}

type JobRow = (String, Option<String>, String, String, String, String);

fn job_from_row(row: JobRow) -> Result<Job, QueryError> {
    let (id, user_id, status, data, created_at, updated_at) = row;
    Ok(Job {
        id,
        user_id,
        status: decode_status(&status)?,
        description: decode_data(&data)?,
        created_at: Some(created_at),
        updated_at: Some(updated_at),
    })
}

pub async fn create(conn: &Connection, job: &Job) -> Result<(), QueryError> {
    let data = encode_data(job)?;
    let job_id = job.id.clone();
    let user_id = job.user_id.clone();
    let status = job.status.as_str();
    let description = job.description.clone();

    conn.call(move |c| {
        let tx = c.transaction()?;

        tx.execute(
            "INSERT INTO jobs (id, user_id, status, data)
             VALUES (?1, ?2, ?3, ?4)",
            params![&job_id, &user_id, status, &data],
        )?;

        let log_id = Uuid::now_v7().to_string();
        tx.execute(
            "INSERT INTO job_status_log (id, job_id, status, description)
             VALUES (?1, ?2, ?3, ?4)",
            params![log_id, &job_id, status, &description],
        )?;

        tx.commit()?;
        Ok::<(), rusqlite::Error>(())
    })
    .await
    .map_err(failed)
}

pub async fn update(conn: &Connection, job: &Job) -> Result<(), QueryError> {
    let data = encode_data(job)?;
    let job_id = job.id.clone();
    let status = job.status.as_str();
    let description = job.description.clone();

    let updated = conn
        .call(move |c| {
            let tx = c.transaction()?;

            let changed = tx.execute(
                "UPDATE jobs SET status = ?2, data = ?3, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1",
                params![&job_id, status, &data],
            )?;
            if changed == 0 {
                return Ok::<bool, rusqlite::Error>(false);
            }

            let log_id = Uuid::now_v7().to_string();
            tx.execute(
                "INSERT INTO job_status_log (id, job_id, status, description)
                 VALUES (?1, ?2, ?3, ?4)",
                params![log_id, &job_id, status, &description],
            )?;

            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(failed)?;

    if !updated {
        return Err(QueryError::NotFound {
            entity: "Job",
            id: job.id.clone(),
        });
    }
    Ok(())
}

pub async fn get(conn: &Connection, job_id: &str) -> Result<JobWithHistory, QueryError> {
    let id = job_id.to_string();
    let (row, history) = conn
        .call(move |c| {
            let row: Option<JobRow> = c
                .query_row(
                    "SELECT id, user_id, status, data, created_at, updated_at
                     FROM jobs WHERE id = ?1",
                    params![&id],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    },
                )
                .optional()?;

            let mut stmt = c.prepare(
                "SELECT status, description, created_at FROM job_status_log
                 WHERE job_id = ?1 ORDER BY rowid ASC",
            )?;
            let history = stmt
                .query_map(params![&id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok::<_, rusqlite::Error>((row, history))
        })
        .await
        .map_err(failed)?;

    let row = row.ok_or_else(|| QueryError::NotFound {
        entity: "Job",
        id: job_id.to_string(),
    })?;

    let history = history
        .into_iter()
        .map(|(status, description, created_at)| {
            Ok(JobStatusEntry {
                status: decode_status(&status)?,
                description,
                created_at,
            })
        })
        .collect::<Result<Vec<_>, QueryError>>()?;

    Ok(JobWithHistory {
        job: job_from_row(row)?,
        history,
    })
}

pub async fn list(conn: &Connection, limit: u32, offset: u32) -> Result<Vec<Job>, QueryError> {
    let rows = conn
        .call(move |c| {
            let mut stmt = c.prepare(
                "SELECT id, user_id, status, data, created_at, updated_at
                 FROM jobs ORDER BY created_at DESC, rowid DESC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt
                .query_map(params![limit, offset], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })?
                .collect::<Result<Vec<JobRow>, _>>()?;
            Ok::<_, rusqlite::Error>(rows)
        })
        .await
        .map_err(failed)?;

    rows.into_iter().map(job_from_row).collect()
}
