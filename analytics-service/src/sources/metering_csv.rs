use std::{fs::File, io::Read, path::{Path, PathBuf}};

use csv::StringRecord;
use metering_client::{
    domain::{MeteringRecord, Plant, SettlementRecord, YearMonth},
    InMemoryStore,
};
use time::{format_description::FormatItem, macros::format_description, Date, PrimitiveDateTime};

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing column '{column}' in {table} CSV header")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },
}

/// Locations of the table exports that make up a CSV-backed store.
#[derive(Debug, Clone)]
pub struct CsvPaths {
    pub metering: PathBuf,
    pub settlement: PathBuf,
    pub plants: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub metering_rows: usize,
    pub settlement_rows: usize,
    pub plants: usize,
    /// Rows skipped or carrying unparseable cells, across all tables.
    pub malformed_rows: usize,
}

const DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const DATETIME: &[FormatItem<'static>] = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const DATETIME_T: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
const DATETIME_SHORT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day] [hour]:[minute]");

fn parse_optional_string(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_date(s: &str) -> Option<Date> {
    // Exports sometimes carry a midnight time on the date column.
    let s = s.trim();
    let day = s.get(..10).unwrap_or(s);
    Date::parse(day, DATE).ok()
}

fn parse_datetime(s: &str) -> Option<PrimitiveDateTime> {
    let s = s.trim();
    [DATETIME, DATETIME_T, DATETIME_SHORT]
        .iter()
        .find_map(|format| PrimitiveDateTime::parse(s, format).ok())
}

/// Header-addressed view of one CSV record. Unparseable optional cells read
/// as `None` and mark the row malformed.
struct CsvRow<'a> {
    headers: &'a StringRecord,
    record: &'a StringRecord,
    malformed: bool,
}

impl<'a> CsvRow<'a> {
    fn new(headers: &'a StringRecord, record: &'a StringRecord) -> Self {
        Self {
            headers,
            record,
            malformed: false,
        }
    }

    fn cell(&self, name: &str) -> Option<&'a str> {
        self.headers
            .iter()
            .position(|h| h.trim() == name)
            .and_then(|idx| self.record.get(idx))
            .filter(|v| !v.trim().is_empty())
    }

    fn text(&self, name: &str) -> Option<String> {
        self.cell(name).and_then(parse_optional_string)
    }

    fn parsed<T>(&mut self, name: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
        let raw = self.cell(name)?;
        let value = parse(raw);
        if value.is_none() {
            self.malformed = true;
        }
        value
    }

    fn number(&mut self, name: &str) -> Option<f64> {
        self.parsed(name, |s| s.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
    }
}

fn require_columns(
    table: &'static str,
    headers: &StringRecord,
    columns: &[&'static str],
) -> Result<(), SourceError> {
    for &column in columns {
        if !headers.iter().any(|h| h.trim() == column) {
            return Err(SourceError::MissingColumn { table, column });
        }
    }
    Ok(())
}

/// Decoded rows of one table export.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvTable<T> {
    /// Each row with whether any of its cells had to be read as null.
    pub rows: Vec<(T, bool)>,
    /// Rows dropped because a key column was empty or unparseable.
    pub skipped: usize,
}

impl<T> CsvTable<T> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Skipped rows plus rows with a nulled cell.
    pub fn malformed(&self) -> usize {
        self.skipped + self.rows.iter().filter(|(_, bad)| *bad).count()
    }

    pub fn into_records(self) -> Vec<T> {
        self.rows.into_iter().map(|(r, _)| r).collect()
    }
}

fn read_table<R, T>(
    table: &'static str,
    mut rdr: csv::Reader<R>,
    required: &[&'static str],
    decode: impl Fn(&mut CsvRow<'_>) -> Option<T>,
) -> Result<CsvTable<T>, SourceError>
where
    R: Read,
{
    let headers = rdr.headers()?.clone();
    require_columns(table, &headers, required)?;

    let mut parsed = CsvTable {
        rows: Vec::new(),
        skipped: 0,
    };
    for (line, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(table, line = line + 2, error = %e, "unreadable CSV record, skipping");
                parsed.skipped += 1;
                continue;
            }
        };

        let mut row = CsvRow::new(&headers, &record);
        match decode(&mut row) {
            Some(decoded) => {
                if row.malformed {
                    tracing::warn!(table, line = line + 2, "unparseable CSV cell read as null");
                }
                parsed.rows.push((decoded, row.malformed));
            }
            None => {
                tracing::warn!(table, line = line + 2, "CSV row without usable keys, skipping");
                parsed.skipped += 1;
            }
        }
    }

    let malformed = parsed.malformed();
    if malformed > 0 {
        metrics::counter!("metering_csv_parse_errors_total", "table" => table)
            .increment(malformed as u64);
    }
    Ok(parsed)
}

const METERING_COLUMNS: &[&str] = &[
    "client_name",
    "date",
    "slot_name",
    "allocated_generation",
    "consumption",
    "deficit",
    "surplus_demand",
    "surplus_generation",
    "settled",
];

const SETTLEMENT_COLUMNS: &[&str] = &[
    "client_name",
    "date",
    "matched_settled_sum",
    "intra_settlement",
    "inter_settlement",
];

/// Reads a `settlement_data` export. Rows without a client or a parseable
/// date are skipped.
///
/// The key, slot and numeric columns must all be present in the header;
/// `datetime`, `type` and `cons_unit` may be left out.
pub fn read_metering<R: Read>(rdr: csv::Reader<R>) -> Result<CsvTable<MeteringRecord>, SourceError> {
    read_table("settlement_data", rdr, METERING_COLUMNS, |row| {
        let client_id = row.text("client_name")?;
        let date = row.parsed("date", parse_date)?;
        Some(MeteringRecord {
            timestamp: row.parsed("datetime", parse_datetime),
            slot_name: row.text("slot_name"),
            plant_type: row.text("type"),
            cons_unit: row.text("cons_unit"),
            allocated_generation: row.number("allocated_generation"),
            consumption: row.number("consumption"),
            deficit: row.number("deficit"),
            surplus_demand: row.number("surplus_demand"),
            surplus_generation: row.number("surplus_generation"),
            settled: row.number("settled"),
            ..MeteringRecord::empty(client_id, date)
        })
    })
}

/// Reads a `banking_settlement` export; the date column selects the month.
pub fn read_settlement<R: Read>(rdr: csv::Reader<R>) -> Result<CsvTable<SettlementRecord>, SourceError> {
    read_table("banking_settlement", rdr, SETTLEMENT_COLUMNS, |row| {
        let client_id = row.text("client_name")?;
        let month = row.parsed("date", |s| s.trim().parse::<YearMonth>().ok())?;
        Some(SettlementRecord {
            client_id,
            month,
            matched_settled_sum: row.number("matched_settled_sum"),
            intra_settlement: row.number("intra_settlement"),
            inter_settlement: row.number("inter_settlement"),
        })
    })
}

pub fn read_plants<R: Read>(rdr: csv::Reader<R>) -> Result<CsvTable<Plant>, SourceError> {
    read_table("tbl_plants", rdr, &["plant_id", "client_name"], |row| {
        Some(Plant {
            plant_id: row.text("plant_id")?,
            client_id: row.text("client_name")?,
            plant_name: row.text("plant_name"),
            plant_type: row.text("type"),
        })
    })
}

fn open(path: &Path) -> Result<csv::Reader<File>, SourceError> {
    let file = File::open(path).map_err(|source| SourceError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::Reader::from_reader(file))
}

/// Loads table exports into an [`InMemoryStore`].
///
/// Rows with nulled cells keep their malformed flag in the store, so queries
/// over them report it. Skipped rows only show up in the [`LoadReport`].
/// This reads the files synchronously; call it before serving queries.
pub fn load_csv_store(paths: &CsvPaths) -> Result<(InMemoryStore, LoadReport), SourceError> {
    let metering = read_metering(open(&paths.metering)?)?;
    let settlement = read_settlement(open(&paths.settlement)?)?;
    let plants = match &paths.plants {
        Some(path) => read_plants(open(path)?)?,
        None => CsvTable {
            rows: Vec::new(),
            skipped: 0,
        },
    };

    let report = LoadReport {
        metering_rows: metering.len(),
        settlement_rows: settlement.len(),
        plants: plants.len(),
        malformed_rows: metering.malformed() + settlement.malformed() + plants.malformed(),
    };
    tracing::info!(
        metering_rows = report.metering_rows,
        settlement_rows = report.settlement_rows,
        plants = report.plants,
        malformed_rows = report.malformed_rows,
        "CSV store loaded"
    );

    let store = InMemoryStore::new()
        .with_flagged_metering(metering.rows)
        .with_flagged_settlements(settlement.rows)
        .with_plants(plants.into_records());
    Ok((store, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::{fetch_generation_consumption, DateRange};
    use std::io::Write;
    use time::macros::{date, datetime};

    const HEADER: &str = "client_name,date,datetime,slot_name,type,cons_unit,allocated_generation,consumption,deficit,surplus_demand,surplus_generation,settled";

    fn reader(data: &str) -> csv::Reader<&[u8]> {
        csv::Reader::from_reader(data.as_bytes())
    }

    fn metering_csv(rows: &[&str]) -> String {
        let mut data = format!("{HEADER}\n");
        for row in rows {
            data.push_str(row);
            data.push('\n');
        }
        data
    }

    #[test]
    fn reads_metering_rows() {
        let data = metering_csv(&[
            "acme,2024-03-01,2024-03-01 07:00:00,Morning Peak,solar,U-1,10.5,4,0,0,6.5,4",
            "acme,2024-03-01,2024-03-01T19:00:00,Evening Peak,solar,,1,5,,4,,1",
        ]);
        let table = read_metering(reader(&data)).unwrap();
        assert_eq!(table.malformed(), 0);
        assert_eq!(table.len(), 2);

        let (first, _) = &table.rows[0];
        assert_eq!(first.client_id, "acme");
        assert_eq!(first.date, date!(2024 - 03 - 01));
        assert_eq!(first.timestamp, Some(datetime!(2024-03-01 07:00)));
        assert_eq!(first.plant_type.as_deref(), Some("solar"));
        assert_eq!(first.allocated_generation, Some(10.5));

        let (second, _) = &table.rows[1];
        assert_eq!(second.timestamp, Some(datetime!(2024-03-01 19:00)));
        assert_eq!(second.cons_unit, None);
        assert_eq!(second.deficit, None);
    }

    #[test]
    fn optional_columns_may_be_left_out() {
        let data = "\
client_name,date,slot_name,allocated_generation,consumption,deficit,surplus_demand,surplus_generation,settled
acme,2024-03-01,Morning Peak,1,2,0,1,0,1
";
        let table = read_metering(reader(data)).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.malformed(), 0);
        assert_eq!(table.rows[0].0.timestamp, None);
    }

    #[test]
    fn bad_key_columns_skip_the_row() {
        let data = metering_csv(&[
            "acme,not-a-date,,Morning Peak,,,1,4,0,0,0,0",
            ",2024-03-01,,Morning Peak,,,1,4,0,0,0,0",
            "acme,2024-03-02,,Morning Peak,,,1,4,0,0,0,0",
        ]);
        let table = read_metering(reader(&data)).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.skipped, 2);
        assert_eq!(table.malformed(), 2);
    }

    #[test]
    fn bad_numeric_cell_becomes_null_and_flags_the_row() {
        let data = metering_csv(&["acme,2024-03-01,,Morning Peak,,,NaN,abc,0,0,0,0"]);
        let table = read_metering(reader(&data)).unwrap();
        assert_eq!(table.len(), 1);
        let (record, malformed) = &table.rows[0];
        assert_eq!(record.consumption, None);
        assert_eq!(record.allocated_generation, None);
        assert!(*malformed);
        assert_eq!(table.malformed(), 1);
    }

    #[test]
    fn missing_key_header_is_an_error() {
        let err = read_metering(reader("client_name,consumption\nacme,1\n")).unwrap_err();
        assert!(matches!(err, SourceError::MissingColumn { column: "date", .. }));
    }

    #[test]
    fn missing_numeric_header_is_an_error() {
        let data = "\
client_name,date,slot_name,allocated_generation,deficit,surplus_demand,surplus_generation,settled
acme,2024-03-01,Morning Peak,1,0,0,0,0
";
        let err = read_metering(reader(data)).unwrap_err();
        assert!(matches!(err, SourceError::MissingColumn { column: "consumption", .. }));

        let err = read_settlement(reader("client_name,date,matched_settled_sum\nacme,2024-01,1\n")).unwrap_err();
        assert!(matches!(err, SourceError::MissingColumn { column: "intra_settlement", .. }));
    }

    #[test]
    fn settlement_date_selects_month() {
        let data = "\
client_name,date,matched_settled_sum,intra_settlement,inter_settlement
acme,2024-01-01,200,300,
acme,2024-02,40,,
";
        let table = read_settlement(reader(data)).unwrap();
        assert_eq!(table.len(), 2);
        let (jan, _) = &table.rows[0];
        assert_eq!(jan.month.to_string(), "2024-01");
        assert_eq!(jan.intra_settlement, Some(300.0));
        assert_eq!(jan.inter_settlement, None);
        assert_eq!(table.rows[1].0.month.to_string(), "2024-02");
    }

    #[test]
    fn reads_plants() {
        let data = "\
plant_id,client_name,plant_name,type
P-1,acme,Rooftop Array,solar
P-2,acme,Legacy,
";
        let plants = read_plants(reader(data)).unwrap().into_records();
        assert_eq!(plants.len(), 2);
        assert_eq!(plants[1].plant_type, None);
    }

    #[test]
    fn missing_file_reports_path() {
        let paths = CsvPaths {
            metering: PathBuf::from("/nonexistent/settlement_data.csv"),
            settlement: PathBuf::from("/nonexistent/banking_settlement.csv"),
            plants: None,
        };
        assert!(matches!(load_csv_store(&paths), Err(SourceError::Open { .. })));
    }

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{name}", std::process::id()));
        let mut file = File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[tokio::test]
    async fn nulled_cells_surface_in_query_anomalies() {
        let metering = write_temp(
            "malformed_settlement_data.csv",
            &metering_csv(&[
                "acme,2024-03-01,,Morning Peak,,,10,abc,0,0,0,0",
                "acme,2024-03-02,2024-03-02 12:00:00,Morning Peak,,,10,5,0,0,0,0",
                "beta,2024-03-01,,Morning Peak,,,10,oops,0,0,0,0",
            ]),
        );
        let settlement = write_temp(
            "malformed_banking_settlement.csv",
            "client_name,date,matched_settled_sum,intra_settlement,inter_settlement\n",
        );

        let (store, report) = load_csv_store(&CsvPaths {
            metering: metering.clone(),
            settlement: settlement.clone(),
            plants: None,
        })
        .unwrap();
        assert_eq!(report.malformed_rows, 2);

        let range = DateRange::new(date!(2024 - 03 - 01), date!(2024 - 03 - 02)).unwrap();
        let agg = fetch_generation_consumption(&store, "acme", range).await.unwrap();
        assert_eq!(agg.len(), 2);
        assert_eq!(agg.rows[0].consumption, 0.0);
        assert_eq!(agg.anomalies.malformed_rows, 1);

        let clean = DateRange::single_day(date!(2024 - 03 - 02));
        let agg = fetch_generation_consumption(&store, "acme", clean).await.unwrap();
        assert_eq!(agg.anomalies.malformed_rows, 0);

        let _ = std::fs::remove_file(metering);
        let _ = std::fs::remove_file(settlement);
    }
}
