use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

use crate::debug_println;
use crate::errors::SinkError;
use crate::models::HotelRecord;

/// Durable destination for normalized records. The append for one criteria
/// unit is atomic from the reader's point of view: all of the unit's rows
/// become visible together, or none do.
pub trait Sink {
    fn write_unit(&mut self, records: &[HotelRecord]) -> Result<(), SinkError>;

    /// Called once after the sweep completes. Sinks that maintain derived
    /// state (roll-up tables) refresh it here.
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// CSV file under the output directory, one row per record, fixed column
/// order. Each unit is serialized to an in-memory buffer first and appended
/// with a single write, so a crash mid-unit never leaves truncated rows.
pub struct CsvSink {
    path: PathBuf,
    file: File,
}

impl CsvSink {
    pub fn create(output_dir: &Path, file_stem: &str) -> Result<Self, SinkError> {
        fs::create_dir_all(output_dir)?;
        let path = output_dir.join(format!("{}.csv", file_stem));
        let is_new = !path.exists();

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        if is_new {
            let mut header = Vec::new();
            {
                let mut writer = csv::Writer::from_writer(&mut header);
                writer.write_record(HotelRecord::CSV_HEADER)?;
                writer.flush()?;
            }
            file.write_all(&header)?;
            file.flush()?;
        }

        println!("Writing records to {}", path.display());
        Ok(CsvSink { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for CsvSink {
    fn write_unit(&mut self, records: &[HotelRecord]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut buf);
            for record in records {
                writer.serialize(record)?;
            }
            writer.flush()?;
        }

        self.file.write_all(&buf)?;
        self.file.flush()?;
        debug_println!("Appended {} rows to {}", records.len(), self.path.display());
        Ok(())
    }
}

/// Optional relational sink: one `hotel_price` table keyed by
/// (hotel_id, check_in, check_out, currency), upsert semantics, one
/// transaction per unit. On finish the interquartile-mean price per
/// check-in date is refreshed into `average_price_by_date`.
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS hotel_price (
                hotel_id       TEXT NOT NULL,
                hotel          TEXT NOT NULL,
                location       TEXT NOT NULL,
                city           TEXT NOT NULL,
                country        TEXT NOT NULL,
                check_in       TEXT NOT NULL,
                check_out      TEXT NOT NULL,
                group_adults   INTEGER NOT NULL,
                group_children INTEGER NOT NULL,
                num_rooms      INTEGER NOT NULL,
                nightly_price  REAL,
                total_price    REAL,
                currency       TEXT NOT NULL,
                rating         REAL,
                available      INTEGER NOT NULL,
                as_of          TEXT NOT NULL,
                UNIQUE (hotel_id, check_in, check_out, currency)
            );",
        )?;
        println!("Mirroring records into SQLite database at {}", path.display());
        Ok(SqliteSink { conn })
    }
}

impl Sink for SqliteSink {
    fn write_unit(&mut self, records: &[HotelRecord]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO hotel_price (
                    hotel_id, hotel, location, city, country,
                    check_in, check_out, group_adults, group_children, num_rooms,
                    nightly_price, total_price, currency, rating, available, as_of
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.hotel_id,
                    record.hotel,
                    record.location,
                    record.city,
                    record.country,
                    record.check_in.to_string(),
                    record.check_out.to_string(),
                    record.group_adults,
                    record.group_children,
                    record.num_rooms,
                    record.nightly_price,
                    record.total_price,
                    record.currency,
                    record.rating,
                    record.available,
                    record.as_of.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        debug_println!("Committed {} rows to SQLite", records.len());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        // Roll-up tables, rebuilt from scratch at end of run. All of them
        // use the interquartile mean: average the middle two price
        // quartiles so a handful of luxury suites does not skew the
        // figures. Rows without a price are left out entirely.
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS average_price_by_date (
                check_in      TEXT NOT NULL,
                city          TEXT NOT NULL,
                average_price REAL NOT NULL,
                PRIMARY KEY (check_in, city)
            );
            DELETE FROM average_price_by_date;
            INSERT INTO average_price_by_date (check_in, city, average_price)
            SELECT check_in, city, AVG(nightly_price)
            FROM (
                SELECT check_in, city, nightly_price,
                       NTILE(4) OVER (
                           PARTITION BY check_in, city ORDER BY nightly_price
                       ) AS quartile
                FROM hotel_price
                WHERE nightly_price IS NOT NULL
            )
            WHERE quartile IN (2, 3)
            GROUP BY check_in, city;",
        )?;

        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS average_price_by_review (
                rating        REAL NOT NULL PRIMARY KEY,
                average_price REAL NOT NULL
            );
            DELETE FROM average_price_by_review;
            INSERT INTO average_price_by_review (rating, average_price)
            SELECT rating, AVG(nightly_price)
            FROM (
                SELECT rating, nightly_price,
                       NTILE(4) OVER (
                           PARTITION BY rating ORDER BY nightly_price
                       ) AS quartile
                FROM hotel_price
                WHERE nightly_price IS NOT NULL AND rating IS NOT NULL
            )
            WHERE quartile IN (2, 3)
            GROUP BY rating;",
        )?;

        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS average_price_by_day_of_week (
                day_of_week   TEXT NOT NULL PRIMARY KEY,
                average_price REAL NOT NULL
            );
            DELETE FROM average_price_by_day_of_week;
            INSERT INTO average_price_by_day_of_week (day_of_week, average_price)
            SELECT CASE strftime('%w', check_in)
                       WHEN '0' THEN 'Sunday'
                       WHEN '1' THEN 'Monday'
                       WHEN '2' THEN 'Tuesday'
                       WHEN '3' THEN 'Wednesday'
                       WHEN '4' THEN 'Thursday'
                       WHEN '5' THEN 'Friday'
                       WHEN '6' THEN 'Saturday'
                   END,
                   AVG(nightly_price)
            FROM (
                SELECT check_in, nightly_price,
                       NTILE(4) OVER (
                           PARTITION BY strftime('%w', check_in)
                           ORDER BY nightly_price
                       ) AS quartile
                FROM hotel_price
                WHERE nightly_price IS NOT NULL
            )
            WHERE quartile IN (2, 3)
            GROUP BY strftime('%w', check_in);",
        )?;

        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS average_price_by_month (
                month         TEXT NOT NULL PRIMARY KEY,
                average_price REAL NOT NULL,
                quarter       TEXT NOT NULL
            );
            DELETE FROM average_price_by_month;
            INSERT INTO average_price_by_month (month, average_price, quarter)
            SELECT CASE strftime('%m', check_in)
                       WHEN '01' THEN 'January'
                       WHEN '02' THEN 'February'
                       WHEN '03' THEN 'March'
                       WHEN '04' THEN 'April'
                       WHEN '05' THEN 'May'
                       WHEN '06' THEN 'June'
                       WHEN '07' THEN 'July'
                       WHEN '08' THEN 'August'
                       WHEN '09' THEN 'September'
                       WHEN '10' THEN 'October'
                       WHEN '11' THEN 'November'
                       WHEN '12' THEN 'December'
                   END,
                   AVG(nightly_price),
                   CASE
                       WHEN strftime('%m', check_in) IN ('01', '02', '03') THEN 'Quarter1'
                       WHEN strftime('%m', check_in) IN ('04', '05', '06') THEN 'Quarter2'
                       WHEN strftime('%m', check_in) IN ('07', '08', '09') THEN 'Quarter3'
                       WHEN strftime('%m', check_in) IN ('10', '11', '12') THEN 'Quarter4'
                   END
            FROM (
                SELECT check_in, nightly_price,
                       NTILE(4) OVER (
                           PARTITION BY strftime('%m', check_in)
                           ORDER BY nightly_price
                       ) AS quartile
                FROM hotel_price
                WHERE nightly_price IS NOT NULL
            )
            WHERE quartile IN (2, 3)
            GROUP BY strftime('%m', check_in);",
        )?;

        // Per-location table also carries the rating and price-per-rating
        // means; a location whose middle quartiles are empty gets 0, as the
        // columns are NOT NULL.
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS average_price_by_location (
                location                 TEXT NOT NULL PRIMARY KEY,
                average_price            REAL NOT NULL,
                average_rating           REAL NOT NULL,
                average_price_per_rating REAL NOT NULL
            );
            DELETE FROM average_price_by_location;
            INSERT INTO average_price_by_location
                (location, average_price, average_rating, average_price_per_rating)
            SELECT location,
                   COALESCE(AVG(CASE WHEN price_quartile IN (2, 3)
                                     THEN nightly_price END), 0),
                   COALESCE(AVG(CASE WHEN rating_quartile IN (2, 3)
                                     THEN rating END), 0),
                   COALESCE(AVG(CASE WHEN ratio_quartile IN (2, 3)
                                     THEN nightly_price / rating END), 0)
            FROM (
                SELECT location, nightly_price, rating,
                       NTILE(4) OVER (
                           PARTITION BY location ORDER BY nightly_price
                       ) AS price_quartile,
                       NTILE(4) OVER (
                           PARTITION BY location ORDER BY rating
                       ) AS rating_quartile,
                       NTILE(4) OVER (
                           PARTITION BY location ORDER BY nightly_price / rating
                       ) AS ratio_quartile
                FROM hotel_price
                WHERE nightly_price IS NOT NULL AND rating > 0
            )
            GROUP BY location;",
        )?;

        Ok(())
    }
}

/// Fans a unit out to several sinks (CSV always, SQLite optionally). The
/// write is only as atomic as each member sink's own append.
///
/// Per-member success is tracked until the whole unit lands: when one
/// member fails, a retry of the same unit reaches only the members that
/// have not taken it yet, so the ones that already appended never see the
/// unit twice.
pub struct MultiSink {
    sinks: Vec<Box<dyn Sink>>,
    written: Vec<bool>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Box<dyn Sink>>) -> Self {
        let written = vec![false; sinks.len()];
        MultiSink { sinks, written }
    }
}

impl Sink for MultiSink {
    fn write_unit(&mut self, records: &[HotelRecord]) -> Result<(), SinkError> {
        for (sink, written) in self.sinks.iter_mut().zip(self.written.iter_mut()) {
            if *written {
                continue;
            }
            sink.write_unit(records)?;
            *written = true;
        }
        self.written.fill(false);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        for sink in &mut self.sinks {
            sink.finish()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn record(hotel_id: &str, check_in: (i32, u32, u32)) -> HotelRecord {
        HotelRecord {
            hotel_id: hotel_id.to_string(),
            hotel: format!("Hotel {}", hotel_id),
            location: "Osaka".to_string(),
            city: "Osaka".to_string(),
            country: "Japan".to_string(),
            check_in: NaiveDate::from_ymd_opt(check_in.0, check_in.1, check_in.2).unwrap(),
            check_out: NaiveDate::from_ymd_opt(check_in.0, check_in.1, check_in.2).unwrap()
                + chrono::Duration::days(1),
            group_adults: 1,
            group_children: 0,
            num_rooms: 1,
            nightly_price: Some(120.0),
            total_price: Some(120.0),
            currency: "USD".to_string(),
            rating: Some(8.2),
            available: true,
            as_of: Utc.with_ymd_and_hms(2024, 8, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn csv_header_written_once_across_units() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::create(dir.path(), "osaka_hotel_data").unwrap();

        sink.write_unit(&[record("1", (2024, 8, 5)), record("2", (2024, 8, 5))]).unwrap();
        sink.write_unit(&[record("3", (2024, 8, 6))]).unwrap();

        let content = fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("hotel_id,hotel,location,city,country,check_in"));
        assert_eq!(content.matches("hotel_id,hotel").count(), 1);
        assert!(lines[1].starts_with("1,Hotel 1,Osaka,Osaka,Japan,2024-08-05,2024-08-06"));
    }

    #[test]
    fn csv_reopen_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut sink = CsvSink::create(dir.path(), "data").unwrap();
            sink.write_unit(&[record("1", (2024, 8, 5))]).unwrap();
        }
        {
            let mut sink = CsvSink::create(dir.path(), "data").unwrap();
            sink.write_unit(&[record("2", (2024, 8, 6))]).unwrap();
        }

        let content = fs::read_to_string(dir.path().join("data.csv")).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert_eq!(content.matches("hotel_id,hotel").count(), 1);
    }

    #[test]
    fn csv_absent_optionals_serialize_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::create(dir.path(), "data").unwrap();

        let mut r = record("1", (2024, 8, 5));
        r.rating = None;
        r.nightly_price = None;
        r.total_price = None;
        sink.write_unit(&[r]).unwrap();

        let content = fs::read_to_string(sink.path()).unwrap();
        let row = content.lines().nth(1).unwrap();
        // nightly_price, total_price empty, then currency, then empty rating
        assert!(row.contains(",,,USD,,true,"));
    }

    #[test]
    fn sqlite_upserts_on_record_key() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("hotels.db");
        let mut sink = SqliteSink::open(&db).unwrap();

        sink.write_unit(&[record("1", (2024, 8, 5)), record("2", (2024, 8, 5))]).unwrap();
        // Same unit again: the key dedupes, rows are replaced not duplicated.
        sink.write_unit(&[record("1", (2024, 8, 5)), record("2", (2024, 8, 5))]).unwrap();
        sink.write_unit(&[record("1", (2024, 8, 6)), record("2", (2024, 8, 6))]).unwrap();
        sink.finish().unwrap();

        let conn = Connection::open(&db).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM hotel_price", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 4);

        let averages: i64 = conn
            .query_row("SELECT COUNT(*) FROM average_price_by_date", [], |row| row.get(0))
            .unwrap();
        assert_eq!(averages, 2);
    }

    #[test]
    fn finish_builds_price_rollup_tables() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("hotels.db");
        let mut sink = SqliteSink::open(&db).unwrap();

        // Two Mondays-and-Tuesdays in August: two cities' worth of rated,
        // priced rows plus one row with neither price nor rating.
        let mut unit = vec![
            record("1", (2024, 8, 5)),
            record("2", (2024, 8, 5)),
            record("3", (2024, 8, 6)),
            record("4", (2024, 8, 6)),
            record("5", (2024, 8, 6)),
        ];
        unit[1].nightly_price = Some(200.0);
        unit[2].location = "Tokyo".to_string();
        unit[2].rating = Some(7.0);
        unit[2].nightly_price = Some(90.0);
        unit[3].location = "Tokyo".to_string();
        unit[3].rating = Some(7.0);
        unit[3].nightly_price = Some(110.0);
        unit[4].nightly_price = None;
        unit[4].rating = None;
        sink.write_unit(&unit).unwrap();
        sink.finish().unwrap();

        let conn = Connection::open(&db).unwrap();
        let count = |table: &str| -> i64 {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
                .unwrap()
        };
        assert_eq!(count("average_price_by_date"), 2);
        assert_eq!(count("average_price_by_review"), 2);
        assert_eq!(count("average_price_by_day_of_week"), 2);
        assert_eq!(count("average_price_by_month"), 1);
        assert_eq!(count("average_price_by_location"), 2);

        // August prices are 90, 110, 120, 200; the middle two quartiles
        // average to 115. The unpriced row never enters the roll-up.
        let (avg, quarter): (f64, String) = conn
            .query_row(
                "SELECT average_price, quarter FROM average_price_by_month
                 WHERE month = 'August'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(avg, 115.0);
        assert_eq!(quarter, "Quarter3");
    }

    struct FailOnce {
        failed: bool,
        units: usize,
    }

    impl Sink for FailOnce {
        fn write_unit(&mut self, _records: &[HotelRecord]) -> Result<(), SinkError> {
            if !self.failed {
                self.failed = true;
                return Err(SinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "database locked",
                )));
            }
            self.units += 1;
            Ok(())
        }
    }

    #[test]
    fn multi_sink_retry_skips_members_that_already_wrote() {
        let dir = tempfile::tempdir().unwrap();
        let csv = CsvSink::create(dir.path(), "data").unwrap();
        let path = csv.path().to_path_buf();
        let mut multi = MultiSink::new(vec![
            Box::new(csv),
            Box::new(FailOnce { failed: false, units: 0 }),
        ]);

        let unit = [record("1", (2024, 8, 5))];
        assert!(multi.write_unit(&unit).is_err());
        multi.write_unit(&unit).unwrap();

        // The CSV member took the unit on the first call and must not have
        // appended it again on the retry.
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);

        // A fresh unit reaches every member again.
        multi.write_unit(&[record("2", (2024, 8, 6))]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn empty_unit_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::create(dir.path(), "data").unwrap();
        sink.write_unit(&[]).unwrap();
        let content = fs::read_to_string(sink.path()).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
