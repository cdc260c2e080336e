use crate::harmonize::HarmonizedMuseumRecord;
use anyhow::Result;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Museums Table - one row per (museum_name, country)
    // country defaults to '' rather than NULL so the UNIQUE key actually
    // collides on re-ingest (SQLite treats NULLs as distinct).
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS museums (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            museum_name TEXT NOT NULL,
            country TEXT NOT NULL DEFAULT '',
            city TEXT,
            location TEXT NOT NULL,
            visitors_millions REAL,
            raw_visitors_str TEXT,
            rank INTEGER,
            year INTEGER,
            coordinates TEXT,
            museum_type TEXT,
            matched_city TEXT,
            city_population INTEGER,
            match_score REAL,
            harmonized_at TEXT,
            UNIQUE(museum_name, country)
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_museum_identity ON museums(museum_name, country)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_museum_rank ON museums(rank)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// UPSERT
// ============================================================================

/// Insert or update one harmonized record, keyed on (museum_name, country).
/// Re-running harmonization updates the existing row - never a duplicate.
pub fn upsert_museum(conn: &Connection, record: &HarmonizedMuseumRecord) -> Result<()> {
    let harmonized_at = chrono::Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO museums (
            museum_name, country, city, location, visitors_millions,
            raw_visitors_str, rank, year, coordinates, museum_type,
            matched_city, city_population, match_score, harmonized_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT(museum_name, country) DO UPDATE SET
            city = excluded.city,
            location = excluded.location,
            visitors_millions = excluded.visitors_millions,
            raw_visitors_str = excluded.raw_visitors_str,
            rank = excluded.rank,
            year = excluded.year,
            coordinates = excluded.coordinates,
            museum_type = excluded.museum_type,
            matched_city = excluded.matched_city,
            city_population = excluded.city_population,
            match_score = excluded.match_score,
            harmonized_at = excluded.harmonized_at",
        params![
            record.name,
            record.country.clone().unwrap_or_default(),
            record.city,
            record.location,
            record.visitors_millions,
            record.raw_visitors_str,
            record.rank,
            record.year,
            record.coordinates,
            record.museum_type,
            record.matched_city,
            record.city_population,
            record.match_score,
            harmonized_at,
        ],
    )?;

    Ok(())
}

/// Upsert a batch; returns the number of rows written.
pub fn upsert_museums(conn: &Connection, records: &[HarmonizedMuseumRecord]) -> Result<usize> {
    for record in records {
        upsert_museum(conn, record)?;
    }
    Ok(records.len())
}

// ============================================================================
// QUERIES
// ============================================================================

pub fn get_all_museums(conn: &Connection) -> Result<Vec<HarmonizedMuseumRecord>> {
    let mut stmt = conn.prepare(
        "SELECT museum_name, country, city, location, visitors_millions,
                raw_visitors_str, rank, year, coordinates, museum_type,
                matched_city, city_population, match_score
         FROM museums
         ORDER BY museum_name, country",
    )?;

    let museums = stmt
        .query_map([], |row| {
            let country: String = row.get(1)?;
            Ok(HarmonizedMuseumRecord {
                name: row.get(0)?,
                country: if country.is_empty() { None } else { Some(country) },
                city: row.get(2)?,
                location: row.get(3)?,
                visitors_millions: row.get(4)?,
                raw_visitors_str: row.get(5)?,
                rank: row.get(6)?,
                year: row.get(7)?,
                coordinates: row.get(8)?,
                museum_type: row.get(9)?,
                matched_city: row.get(10)?,
                city_population: row.get(11)?,
                match_score: row.get(12)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(museums)
}

/// Joined row ready for modelling: visitor figure plus resolved population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRow {
    pub museum_name: String,
    pub country: String,
    pub matched_city: String,
    pub visitors_millions: f64,
    pub population: i64,
}

/// Rows usable for training: positive population and visitor count, with an
/// optional minimum-visitors cutoff (in millions). Ordered by record identity
/// so the same stored data always produces the same sample order.
pub fn fetch_training_rows(conn: &Connection, min_visitors: f64) -> Result<Vec<TrainingRow>> {
    let mut stmt = conn.prepare(
        "SELECT museum_name, country, matched_city, visitors_millions, city_population
         FROM museums
         WHERE visitors_millions IS NOT NULL
           AND visitors_millions > 0
           AND visitors_millions >= ?1
           AND city_population IS NOT NULL
           AND city_population > 0
         ORDER BY museum_name, country",
    )?;

    let rows = stmt
        .query_map(params![min_visitors], |row| {
            Ok(TrainingRow {
                museum_name: row.get(0)?,
                country: row.get(1)?,
                matched_city: row.get(2)?,
                visitors_millions: row.get(3)?,
                population: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM museums", [], |row| row.get(0))?;

    Ok(count)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn test_record(
        name: &str,
        country: &str,
        visitors: Option<f64>,
        population: Option<i64>,
    ) -> HarmonizedMuseumRecord {
        HarmonizedMuseumRecord {
            name: name.to_string(),
            location: format!("{country} Somewhere"),
            country: Some(country.to_string()),
            city: Some("Somewhere".to_string()),
            visitors_millions: visitors,
            raw_visitors_str: visitors.map(|v| v.to_string()),
            rank: Some(1),
            year: Some(2024),
            coordinates: None,
            museum_type: None,
            matched_city: population.map(|_| "Somewhere".to_string()),
            city_population: population,
            match_score: population.map(|_| 1.0),
        }
    }

    #[test]
    fn test_upsert_then_select_roundtrip() {
        let conn = test_conn();
        let record = test_record("Louvre", "France", Some(8.7), Some(2_100_000));

        upsert_museum(&conn, &record).unwrap();
        let all = get_all_museums(&conn).unwrap();

        assert_eq!(all.len(), 1);
        assert_eq!(all[0], record);
    }

    #[test]
    fn test_upsert_is_idempotent_on_identity() {
        let conn = test_conn();
        let record = test_record("Louvre", "France", Some(8.7), Some(2_100_000));

        upsert_museum(&conn, &record).unwrap();

        // Re-ingest with a corrected visitor figure: updates, not duplicates
        let mut updated = record.clone();
        updated.visitors_millions = Some(8.9);
        upsert_museum(&conn, &updated).unwrap();

        assert_eq!(verify_count(&conn).unwrap(), 1);
        let all = get_all_museums(&conn).unwrap();
        assert_eq!(all[0].visitors_millions, Some(8.9));
    }

    #[test]
    fn test_same_name_different_country_is_a_new_row() {
        let conn = test_conn();
        upsert_museum(
            &conn,
            &test_record("National Gallery", "United Kingdom", Some(3.0), None),
        )
        .unwrap();
        upsert_museum(
            &conn,
            &test_record("National Gallery", "United States", Some(3.3), None),
        )
        .unwrap();

        assert_eq!(verify_count(&conn).unwrap(), 2);
    }

    #[test]
    fn test_training_rows_filter_incomplete_and_nonpositive() {
        let conn = test_conn();
        upsert_museum(&conn, &test_record("Matched", "A", Some(2.0), Some(1_000_000))).unwrap();
        upsert_museum(&conn, &test_record("Unmatched", "B", Some(2.0), None)).unwrap();
        upsert_museum(&conn, &test_record("No Visitors", "C", None, Some(1_000_000))).unwrap();
        upsert_museum(&conn, &test_record("Zero Visitors", "D", Some(0.0), Some(1_000_000))).unwrap();

        let rows = fetch_training_rows(&conn, 0.0).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].museum_name, "Matched");
    }

    #[test]
    fn test_training_rows_respect_min_visitors() {
        let conn = test_conn();
        upsert_museum(&conn, &test_record("Big", "A", Some(5.0), Some(1_000_000))).unwrap();
        upsert_museum(&conn, &test_record("Small", "B", Some(0.2), Some(1_000_000))).unwrap();

        let rows = fetch_training_rows(&conn, 0.5).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].museum_name, "Big");
    }

    #[test]
    fn test_training_rows_are_identity_ordered() {
        let conn = test_conn();
        upsert_museum(&conn, &test_record("Zeta Museum", "A", Some(1.0), Some(1_000_000))).unwrap();
        upsert_museum(&conn, &test_record("Alpha Museum", "A", Some(1.0), Some(1_000_000))).unwrap();

        let rows = fetch_training_rows(&conn, 0.0).unwrap();
        let names: Vec<&str> = rows.iter().map(|r| r.museum_name.as_str()).collect();
        assert_eq!(names, vec!["Alpha Museum", "Zeta Museum"]);
    }
}
