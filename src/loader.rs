use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::StringRecord;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::types::MarketRecord;

/// state, district, market, variety, group, arrivals, minPrice, maxPrice, modalPrice, reportedDate
const FIELD_COUNT: usize = 10;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d-%b-%Y"];

#[derive(Debug, Default, Clone)]
pub struct LoadStats {
    pub files_read: usize,
    pub rows_total: usize,
    pub accepted: usize,
    pub rejected_unreadable: usize,
    pub rejected_field_count: usize,
    pub rejected_numeric: usize,
    pub rejected_date: usize,
    pub rejected_empty_location: usize,
    pub rejected_non_positive_price: usize,
}

impl LoadStats {
    pub fn rejected(&self) -> usize {
        self.rejected_unreadable
            + self.rejected_field_count
            + self.rejected_numeric
            + self.rejected_date
            + self.rejected_empty_location
            + self.rejected_non_positive_price
    }
}

/// Why a single row was dropped. Never fatal.
#[derive(Debug, Clone, PartialEq)]
enum Rejection {
    FieldCount(usize),
    Numeric(&'static str, String),
    Date(String),
    EmptyLocation,
    NonPositivePrice(f64),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::FieldCount(n) => write!(f, "expected {FIELD_COUNT} fields, found {n}"),
            Rejection::Numeric(field, raw) => write!(f, "{field} is not numeric: {raw:?}"),
            Rejection::Date(raw) => write!(f, "unrecognised date {raw:?}"),
            Rejection::EmptyLocation => write!(f, "state, district or market is empty"),
            Rejection::NonPositivePrice(p) => write!(f, "modal price {p} is not positive"),
        }
    }
}

/// Load every record under `path`: a single CSV file, or every `*.csv` file
/// in a directory (one table per commodity). Fails only when nothing usable
/// was found at all.
pub fn load_records(path: &Path) -> Result<(Vec<MarketRecord>, LoadStats)> {
    let files = source_files(path)?;
    let mut records = Vec::new();
    let mut stats = LoadStats::default();

    for file in &files {
        let reader = File::open(file)?;
        let name = file.display().to_string();
        let before = records.len();
        records.extend(parse_table(reader, &name, &mut stats));
        stats.files_read += 1;
        debug!("Loaded {} records from {name}", records.len() - before);
    }

    if records.is_empty() {
        return Err(AppError::Load(format!(
            "no usable rows in {} ({} files, {} rows rejected)",
            path.display(),
            stats.files_read,
            stats.rejected(),
        )));
    }

    info!(
        files = stats.files_read,
        accepted = stats.accepted,
        rejected = stats.rejected(),
        "Loaded {} records from {}",
        stats.accepted,
        path.display(),
    );
    Ok((records, stats))
}

fn source_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(AppError::Load(format!("{} does not exist", path.display())));
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Parse one delimited table. The first non-blank line is the header. Every
/// following line is one row; rows that fail to parse are logged and skipped.
pub fn parse_table<R: Read>(mut input: R, source: &str, stats: &mut LoadStats) -> Vec<MarketRecord> {
    let mut raw = Vec::new();
    if let Err(e) = input.read_to_end(&mut raw) {
        stats.rejected_unreadable += 1;
        warn!("[LOAD] {source}: unreadable table skipped: {e}");
        return Vec::new();
    }
    let text = String::from_utf8_lossy(&raw);

    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());
    lines.next();

    let mut records = Vec::new();
    for (idx, line) in lines {
        let line_no = idx + 1;
        stats.rows_total += 1;
        let row = match read_line(line) {
            Ok(r) => r,
            Err(e) => {
                stats.rejected_unreadable += 1;
                warn!("[LOAD] {source}:{line_no}: unreadable row skipped: {e}");
                continue;
            }
        };
        match parse_row_checked(&row) {
            Ok(record) => {
                stats.accepted += 1;
                records.push(record);
            }
            Err(rejection) => {
                match rejection {
                    Rejection::FieldCount(_) => stats.rejected_field_count += 1,
                    Rejection::Numeric(..) => stats.rejected_numeric += 1,
                    Rejection::Date(_) => stats.rejected_date += 1,
                    Rejection::EmptyLocation => stats.rejected_empty_location += 1,
                    Rejection::NonPositivePrice(_) => stats.rejected_non_positive_price += 1,
                }
                warn!("[LOAD] {source}:{line_no}: row skipped: {rejection}");
            }
        }
    }
    records
}

/// Fields of a single physical line. An unbalanced quote ends at the line
/// break, so it can only spoil its own row.
fn read_line(line: &str) -> std::result::Result<StringRecord, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes());
    let mut row = StringRecord::new();
    reader.read_record(&mut row)?;
    Ok(row)
}

fn parse_row_checked(row: &StringRecord) -> std::result::Result<MarketRecord, Rejection> {
    if row.len() != FIELD_COUNT {
        return Err(Rejection::FieldCount(row.len()));
    }
    let field = |i: usize| row.get(i).unwrap_or("").trim();

    let arrivals_tonnes = parse_number(field(5), "arrivals")?;
    let min_price = parse_number(field(6), "minPrice")?;
    let max_price = parse_number(field(7), "maxPrice")?;
    let modal_price = parse_number(field(8), "modalPrice")?;
    let reported_date =
        parse_date(field(9)).ok_or_else(|| Rejection::Date(field(9).to_string()))?;

    let (state, district, market) = (field(0), field(1), field(2));
    if state.is_empty() || district.is_empty() || market.is_empty() {
        return Err(Rejection::EmptyLocation);
    }
    if modal_price <= 0.0 {
        return Err(Rejection::NonPositivePrice(modal_price));
    }

    Ok(MarketRecord {
        state: state.to_string(),
        district: district.to_string(),
        market: market.to_string(),
        variety: field(3).to_string(),
        group: field(4).to_string(),
        arrivals_tonnes,
        min_price,
        max_price,
        modal_price,
        reported_date,
    })
}

fn parse_number(raw: &str, name: &'static str) -> std::result::Result<f64, Rejection> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Rejection::Numeric(name, raw.to_string()))
}

/// Accepts the date layouts seen across commodity exports. A trailing time
/// component (`2023-01-15 00:00:00`) is ignored.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.split_whitespace().next()?;
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "state,district,market,variety,group,arrivals,minPrice,maxPrice,modalPrice,reportedDate\n";

    fn parse(body: &str) -> (Vec<MarketRecord>, LoadStats) {
        let mut stats = LoadStats::default();
        let input = format!("{HEADER}{body}");
        let records = parse_table(input.as_bytes(), "test.csv", &mut stats);
        (records, stats)
    }

    #[test]
    fn parses_valid_row() {
        let (records, stats) =
            parse("Kerala,Kollam,Punalur,Banana,Fruits,12.5,2000,2600,2400,2023-01-15\n");
        assert_eq!(records.len(), 1);
        assert_eq!(stats.accepted, 1);
        let r = &records[0];
        assert_eq!(r.market, "Punalur");
        assert!((r.arrivals_tonnes - 12.5).abs() < 1e-9);
        assert_eq!(r.reported_date, NaiveDate::from_ymd_opt(2023, 1, 15).unwrap());
    }

    #[test]
    fn quoted_field_keeps_embedded_comma() {
        let (records, _) = parse(
            "Kerala,Kollam,\"Punalur, Sub Yard\",Banana,Fruits,1,2000,2600,2400,15/01/2023\n",
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].market, "Punalur, Sub Yard");
    }

    #[test]
    fn bad_rows_are_skipped_not_fatal() {
        let (records, stats) = parse(concat!(
            "Kerala,Kollam,Punalur,Banana,Fruits,1,2000,2600,2400,2023-01-15\n",
            "Kerala,Kollam,Punalur,Banana\n",
            "Kerala,Kollam,Punalur,Banana,Fruits,1,abc,2600,2400,2023-01-15\n",
            "Kerala,Kollam,Punalur,Banana,Fruits,1,2000,2600,2400,not-a-date\n",
            "Kerala,,Punalur,Banana,Fruits,1,2000,2600,2400,2023-01-15\n",
            "Kerala,Kollam,Punalur,Banana,Fruits,1,2000,2600,0,2023-01-15\n",
            "Kerala,Kollam,Punalur,Banana,Fruits,1,2000,2600,2500,2023-02-15\n",
        ));
        assert_eq!(records.len(), 2);
        assert_eq!(stats.rows_total, 7);
        assert_eq!(stats.rejected_field_count, 1);
        assert_eq!(stats.rejected_numeric, 1);
        assert_eq!(stats.rejected_date, 1);
        assert_eq!(stats.rejected_empty_location, 1);
        assert_eq!(stats.rejected_non_positive_price, 1);
        assert_eq!(stats.rejected(), 5);
    }

    #[test]
    fn unbalanced_quote_only_loses_its_own_line() {
        let (records, stats) = parse(concat!(
            "Kerala,Kollam,\"Punalur,Banana,Fruits,1,2000,2600,2400,2023-01-15\n",
            "Kerala,Kollam,Anchal,Banana,Fruits,1,2000,2600,2400,2023-01-15\n",
            "Kerala,Kollam,Anchal,Banana,Fruits,1,2000,2700,2500,2023-02-15\n",
            "Kerala,Kollam,Anchal,Banana,Fruits,1,2000,2800,2600,2023-03-15\n",
        ));
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.market == "Anchal"));
        assert_eq!(stats.rows_total, 4);
        assert_eq!(stats.rejected(), 1);
    }

    #[test]
    fn blank_lines_and_crlf_are_tolerated() {
        let (records, stats) = parse(
            "\r\nKerala,Kollam,Punalur,Banana,Fruits,1,2000,2600,2400,2023-01-15\r\n\n",
        );
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].reported_date, NaiveDate::from_ymd_opt(2023, 1, 15).unwrap());
        assert_eq!(stats.rows_total, 1);
    }

    #[test]
    fn date_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 7, 4).unwrap();
        assert_eq!(parse_date("2023-07-04"), Some(expected));
        assert_eq!(parse_date("04/07/2023"), Some(expected));
        assert_eq!(parse_date("04-07-2023"), Some(expected));
        assert_eq!(parse_date("04-Jul-2023"), Some(expected));
        assert_eq!(parse_date("2023-07-04 00:00:00"), Some(expected));
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn empty_source_fails_load() {
        let dir = std::env::temp_dir().join(format!("commodity-intel-empty-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("only_header.csv"), HEADER).unwrap();
        let result = load_records(&dir);
        assert!(matches!(result, Err(AppError::Load(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn loads_every_csv_in_directory() {
        let dir = std::env::temp_dir().join(format!("commodity-intel-dir-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("banana.csv"),
            format!("{HEADER}Kerala,Kollam,Punalur,Banana,Fruits,1,2000,2600,2400,2023-01-15\n"),
        )
        .unwrap();
        std::fs::write(
            dir.join("pepper.csv"),
            format!("{HEADER}Kerala,Idukki,Kattappana,Pepper,Spices,3,40000,52000,50000,2023-03-01\n"),
        )
        .unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let (records, stats) = load_records(&dir).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(stats.files_read, 2);
        std::fs::remove_dir_all(&dir).ok();
    }
}
