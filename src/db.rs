use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{AttendanceRecord, FellowProfile, PayoutPeriod};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

struct FellowRow<'a> {
    id: &'a str,
    full_name: Option<&'a str>,
    supervisor_id: Option<&'a str>,
    mpesa_name: Option<&'a str>,
    mpesa_number: Option<&'a str>,
}

// Imports may leave optional columns blank; blanks never clear stored values.
const UPSERT_SUPERVISOR: &str = r#"
    INSERT INTO fellow_payouts.supervisors AS sup (id, full_name)
    VALUES ($1, COALESCE($2, $1))
    ON CONFLICT (id) DO UPDATE SET full_name = COALESCE($2, sup.full_name)
"#;

const UPSERT_FELLOW: &str = r#"
    INSERT INTO fellow_payouts.fellows AS f
    (id, full_name, supervisor_id, mpesa_name, mpesa_number)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (id) DO UPDATE
    SET full_name = COALESCE(EXCLUDED.full_name, f.full_name),
        supervisor_id = COALESCE(EXCLUDED.supervisor_id, f.supervisor_id),
        mpesa_name = COALESCE(EXCLUDED.mpesa_name, f.mpesa_name),
        mpesa_number = COALESCE(EXCLUDED.mpesa_number, f.mpesa_number)
"#;

const UPSERT_SCHOOL: &str = r#"
    INSERT INTO fellow_payouts.schools AS sch (id, name)
    VALUES ($1, COALESCE($2, $1))
    ON CONFLICT (id) DO UPDATE SET name = COALESCE($2, sch.name)
"#;

async fn upsert_supervisor(pool: &PgPool, id: &str, full_name: Option<&str>) -> anyhow::Result<()> {
    sqlx::query(UPSERT_SUPERVISOR)
        .bind(id)
        .bind(full_name)
        .execute(pool)
        .await?;
    Ok(())
}

async fn upsert_fellow(pool: &PgPool, fellow: &FellowRow<'_>) -> anyhow::Result<()> {
    sqlx::query(UPSERT_FELLOW)
        .bind(fellow.id)
        .bind(fellow.full_name)
        .bind(fellow.supervisor_id)
        .bind(fellow.mpesa_name)
        .bind(fellow.mpesa_number)
        .execute(pool)
        .await?;
    Ok(())
}

async fn upsert_school(pool: &PgPool, id: &str, name: Option<&str>) -> anyhow::Result<()> {
    sqlx::query(UPSERT_SCHOOL)
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;
    Ok(())
}

async fn upsert_session(
    pool: &PgPool,
    school_id: &str,
    session_type: &str,
    session_date: DateTime<Utc>,
    occurred: bool,
) -> anyhow::Result<String> {
    let id: String = sqlx::query(
        r#"
        INSERT INTO fellow_payouts.sessions
        (id, school_id, session_type, session_date, occurred)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (school_id, session_type, session_date) DO UPDATE
        SET occurred = EXCLUDED.occurred
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(school_id)
    .bind(session_type)
    .bind(session_date)
    .bind(occurred)
    .fetch_one(pool)
    .await?
    .try_get("id")?;
    Ok(id)
}

async fn insert_attendance(
    pool: &PgPool,
    fellow_id: &str,
    session_id: &str,
    attended: bool,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO fellow_payouts.fellow_attendances
        (id, fellow_id, session_id, attended, source_key)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(fellow_id)
    .bind(session_id)
    .bind(attended)
    .bind(source_key)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

fn seed_date(day: u32, hour: u32) -> anyhow::Result<DateTime<Utc>> {
    Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0)
        .single()
        .context("invalid seed date")
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    upsert_supervisor(pool, "sup-otieno", Some("Otieno Odhiambo")).await?;
    upsert_supervisor(pool, "sup-achieng", Some("Achieng Wafula")).await?;

    let fellows = [
        FellowRow {
            id: "fellow-wanjiru",
            full_name: Some("Wanjiru Kamau"),
            supervisor_id: Some("sup-otieno"),
            mpesa_name: Some("WANJIRU KAMAU"),
            mpesa_number: Some("0712345678"),
        },
        FellowRow {
            id: "fellow-kiprop",
            full_name: Some("Brian Kiprop"),
            supervisor_id: Some("sup-otieno"),
            mpesa_name: None,
            mpesa_number: None,
        },
        FellowRow {
            id: "fellow-njeri",
            full_name: Some("Njeri Mwangi"),
            supervisor_id: Some("sup-achieng"),
            mpesa_name: Some("NJERI MWANGI"),
            mpesa_number: Some("0722000111"),
        },
    ];
    for fellow in &fellows {
        upsert_fellow(pool, fellow).await?;
    }

    upsert_school(pool, "school-kibera", Some("Kibera Secondary")).await?;
    upsert_school(pool, "school-mathare", Some("Mathare North High")).await?;

    // Two weeks of sessions around 2024-06-12 so both cutoffs have data.
    let attendances = [
        ("seed-001", "fellow-wanjiru", "school-kibera", "s0", 6, true, true),
        ("seed-002", "fellow-wanjiru", "school-kibera", "s1", 10, true, true),
        ("seed-003", "fellow-wanjiru", "school-kibera", "s1", 10, true, true),
        ("seed-004", "fellow-wanjiru", "school-mathare", "s1", 11, true, true),
        ("seed-005", "fellow-kiprop", "school-kibera", "s0", 7, true, true),
        ("seed-006", "fellow-kiprop", "school-kibera", "s2", 12, true, true),
        ("seed-007", "fellow-njeri", "school-mathare", "s0", 8, true, true),
        ("seed-008", "fellow-njeri", "school-mathare", "s2", 12, true, false),
        ("seed-009", "fellow-njeri", "school-mathare", "s3", 11, false, true),
    ];

    for (source_key, fellow_id, school_id, session_type, day, occurred, attended) in attendances {
        let session_id =
            upsert_session(pool, school_id, session_type, seed_date(day, 9)?, occurred).await?;
        insert_attendance(pool, fellow_id, &session_id, attended, source_key).await?;
    }

    info!(fellows = fellows.len(), "seed data loaded");
    Ok(())
}

/// Attendance for occurred sessions inside `period` that the fellow attended.
pub async fn fetch_attendance(
    pool: &PgPool,
    period: &PayoutPeriod,
    supervisor_id: Option<&str>,
) -> anyhow::Result<Vec<AttendanceRecord>> {
    let mut query = String::from(
        "SELECT a.fellow_id, s.school_id, s.session_type, a.attended, s.occurred, \
         s.session_date, f.full_name, f.supervisor_id, sup.full_name AS supervisor_name, \
         f.mpesa_name, f.mpesa_number \
         FROM fellow_payouts.fellow_attendances a \
         JOIN fellow_payouts.sessions s ON s.id = a.session_id \
         JOIN fellow_payouts.fellows f ON f.id = a.fellow_id \
         LEFT JOIN fellow_payouts.supervisors sup ON sup.id = f.supervisor_id \
         WHERE s.occurred = TRUE AND a.attended = TRUE \
         AND s.session_date >= $1 AND s.session_date < $2",
    );

    if supervisor_id.is_some() {
        query.push_str(" AND f.supervisor_id = $3");
    }

    let mut rows = sqlx::query(&query).bind(period.start).bind(period.end);
    if let Some(value) = supervisor_id {
        rows = rows.bind(value);
    }

    let rows = rows
        .fetch_all(pool)
        .await
        .context("failed to fetch attendance")?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        records.push(AttendanceRecord {
            fellow_id: row.try_get("fellow_id")?,
            school_id: row.try_get("school_id")?,
            session_type: row.try_get("session_type")?,
            attended: row.try_get("attended")?,
            occurred: row.try_get("occurred")?,
            session_date: row.try_get("session_date")?,
            fellow: FellowProfile {
                name: row.try_get("full_name")?,
                supervisor_id: row.try_get("supervisor_id")?,
                supervisor_name: row.try_get("supervisor_name")?,
                mpesa_name: row.try_get("mpesa_name")?,
                mpesa_number: row.try_get("mpesa_number")?,
            },
        });
    }

    debug!(
        start = %period.start,
        end = %period.end,
        count = records.len(),
        "attendance fetched"
    );
    Ok(records)
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    fellow_id: String,
    fellow_name: Option<String>,
    supervisor_id: Option<String>,
    supervisor_name: Option<String>,
    mpesa_name: Option<String>,
    mpesa_number: Option<String>,
    school_id: String,
    school_name: Option<String>,
    session_type: String,
    session_date: DateTime<Utc>,
    occurred: bool,
    attended: bool,
    source_key: Option<String>,
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid row {}", line + 2))?;

        if let Some(supervisor_id) = row.supervisor_id.as_deref() {
            upsert_supervisor(pool, supervisor_id, row.supervisor_name.as_deref()).await?;
        }
        upsert_fellow(
            pool,
            &FellowRow {
                id: &row.fellow_id,
                full_name: row.fellow_name.as_deref(),
                supervisor_id: row.supervisor_id.as_deref(),
                mpesa_name: row.mpesa_name.as_deref(),
                mpesa_number: row.mpesa_number.as_deref(),
            },
        )
        .await?;
        upsert_school(pool, &row.school_id, row.school_name.as_deref()).await?;

        let session_id = upsert_session(
            pool,
            &row.school_id,
            &row.session_type,
            row.session_date,
            row.occurred,
        )
        .await?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        if insert_attendance(pool, &row.fellow_id, &session_id, row.attended, &source_key).await? {
            inserted += 1;
        }
    }

    info!(path = %csv_path.display(), inserted, "attendance imported");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_import_columns_read_as_missing() {
        let raw = "fellow_id,fellow_name,supervisor_id,supervisor_name,mpesa_name,mpesa_number,\
school_id,school_name,session_type,session_date,occurred,attended,source_key
fellow-wanjiru,,sup-otieno,,,,school-kibera,,s1,2024-06-10T09:00:00Z,true,true,
";
        let mut reader = csv::Reader::from_reader(raw.as_bytes());
        let row: CsvRow = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(row.supervisor_id.as_deref(), Some("sup-otieno"));
        assert_eq!(row.supervisor_name, None);
        assert_eq!(row.fellow_name, None);
        assert_eq!(row.mpesa_name, None);
        assert_eq!(row.mpesa_number, None);
        assert_eq!(row.school_name, None);
        assert_eq!(row.source_key, None);
    }

    #[test]
    fn upserts_keep_stored_values_when_columns_are_blank() {
        assert!(UPSERT_SUPERVISOR.contains("full_name = COALESCE($2, sup.full_name)"));
        assert!(UPSERT_SCHOOL.contains("name = COALESCE($2, sch.name)"));
        for column in ["full_name", "supervisor_id", "mpesa_name", "mpesa_number"] {
            let keep = format!("{column} = COALESCE(EXCLUDED.{column}, f.{column})");
            assert!(UPSERT_FELLOW.contains(&keep), "{column}");
        }
    }
}
