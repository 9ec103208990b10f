//! Dataset CSV parser with encoding and delimiter auto-detection.
//!
//! Converts the daily time-series file into typed [`Observation`] rows.
//! Enrichment (rates, development time) happens later in [`crate::dataset`].

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::path::Path;

use crate::config::DatasetConfig;
use crate::error::{CsvError, CsvResult};
use crate::models::Observation;

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Parsed observations, in file order
    pub observations: Vec<Observation>,
    /// Detected encoding
    pub encoding: String,
    /// Detected delimiter
    pub delimiter: char,
    /// Column headers
    pub headers: Vec<String>,
    /// Whether `pop_flag` was derived from the population threshold
    pub pop_flag_derived: bool,
}


/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let decoded = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => String::from_utf8_lossy(bytes).to_string(),
        },
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.to_string(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.to_string(),
        // Fallback: UTF-8 with lossy conversion
        _ => String::from_utf8_lossy(bytes).to_string(),
    };

    if decoded.contains('\u{0}') {
        return Err(CsvError::EncodingError(format!(
            "content decoded as {} contains NUL bytes",
            encoding
        )));
    }

    Ok(decoded.trim_start_matches('\u{feff}').to_string())
}

/// Detect the delimiter by counting occurrences in the header line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse a dataset file with auto-detection of encoding and delimiter.
pub fn parse_csv_file_auto<P: AsRef<Path>>(
    path: P,
    config: &DatasetConfig,
) -> CsvResult<ParseResult> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_bytes_auto(&bytes, config)
}

/// Parse dataset bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(bytes: &[u8], config: &DatasetConfig) -> CsvResult<ParseResult> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(CsvError::EmptyFile);
    }

    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);

    parse_str(&content, delimiter, encoding, config)
}

/// Parse dataset text with an explicit delimiter.
pub fn parse_str(
    content: &str,
    delimiter: char,
    encoding: String,
    config: &DatasetConfig,
) -> CsvResult<ParseResult> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let header_record = reader.headers()?.clone();
    let headers: Vec<String> = header_record.iter().map(|h| h.to_string()).collect();
    let columns = Columns::locate(&header_record)?;

    let mut observations = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(idx + 2);
        observations.push(columns.observation(&record, line, config)?);
    }

    Ok(ParseResult {
        observations,
        encoding,
        delimiter,
        headers,
        pop_flag_derived: columns.pop_flag.is_none(),
    })
}

/// Column positions resolved from the header line.
struct Columns {
    date: usize,
    region: usize,
    subregion: usize,
    country: usize,
    country_area: usize,
    population: usize,
    confirmed_cases: usize,
    deaths: usize,
    recovered: usize,
    active: usize,
    latitude: Option<usize>,
    longitude: Option<usize>,
    pop_flag: Option<usize>,
}

impl Columns {
    fn locate(headers: &StringRecord) -> CsvResult<Self> {
        Ok(Self {
            date: require(headers, &["date"])?,
            region: require(headers, &["region"])?,
            subregion: require(headers, &["subregion", "sub_region"])?,
            country: require(headers, &["country"])?,
            country_area: require(headers, &["country_area", "area"])?,
            population: require(headers, &["population"])?,
            confirmed_cases: require(headers, &["confirmed_cases", "confirmed"])?,
            deaths: require(headers, &["deaths"])?,
            recovered: require(headers, &["recovered"])?,
            active: require(headers, &["active"])?,
            latitude: find(headers, &["latitude", "lat"]),
            longitude: find(headers, &["longitude", "long", "lon", "lng"]),
            pop_flag: find(headers, &["pop_flag"]),
        })
    }

    fn observation(
        &self,
        record: &StringRecord,
        line: usize,
        config: &DatasetConfig,
    ) -> CsvResult<Observation> {
        let cell = |idx: usize| record.get(idx).unwrap_or("");
        let text = |idx: usize| cell(idx).trim_matches('"').to_string();

        let date_raw = cell(self.date);
        let date = parse_date(date_raw)
            .ok_or_else(|| CsvError::invalid_value(line, "date", date_raw, "unrecognized date"))?;

        let population = parse_float(cell(self.population))
            .filter(|p| *p >= 0.0)
            .ok_or_else(|| {
                CsvError::invalid_value(
                    line,
                    "population",
                    cell(self.population),
                    "expected a non-negative number",
                )
            })?;

        let count = |idx: usize, column: &str| -> CsvResult<u64> {
            parse_count(cell(idx))
                .map_err(|msg| CsvError::invalid_value(line, column, cell(idx), msg))
        };

        let coordinate = |idx: Option<usize>, column: &str| -> CsvResult<f64> {
            match idx.map(|i| cell(i)) {
                None | Some("") => Ok(0.0),
                Some(raw) => parse_float(raw).ok_or_else(|| {
                    CsvError::invalid_value(line, column, raw, "expected a number")
                }),
            }
        };

        let pop_flag = match self.pop_flag {
            Some(idx) => parse_flag(cell(idx)).ok_or_else(|| {
                CsvError::invalid_value(line, "pop_flag", cell(idx), "expected a boolean")
            })?,
            None => population >= config.small_population_threshold,
        };

        Ok(Observation {
            date,
            region: text(self.region),
            subregion: text(self.subregion),
            country: text(self.country),
            country_area: text(self.country_area),
            latitude: coordinate(self.latitude, "latitude")?,
            longitude: coordinate(self.longitude, "longitude")?,
            population,
            confirmed_cases: count(self.confirmed_cases, "confirmed_cases")?,
            deaths: count(self.deaths, "deaths")?,
            recovered: count(self.recovered, "recovered")?,
            active: count(self.active, "active")?,
            pop_flag,
        })
    }
}

fn find(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    headers.iter().position(|h| {
        let h = h.trim().trim_matches('"').to_lowercase();
        names.iter().any(|name| h == *name)
    })
}

fn require(headers: &StringRecord, names: &[&str]) -> CsvResult<usize> {
    find(headers, names).ok_or_else(|| CsvError::MissingColumn(names[0].to_string()))
}

/// Parse a calendar date, ISO first, then day-first forms.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim().trim_matches('"');
    // Drop a time part such as "2020-03-01 00:00:00"
    let raw = raw.split_whitespace().next().unwrap_or("");
    let format = date_format(raw)?;
    NaiveDate::parse_from_str(raw, format).ok()
}

/// Pick the format from the separator and the width of the year segment.
///
/// chrono's `%Y` takes any number of digits, so a two-digit year must be
/// routed to `%y` before parsing.
fn date_format(raw: &str) -> Option<&'static str> {
    let sep = raw.chars().find(|c| matches!(c, '-' | '/' | '.'))?;
    let parts: Vec<&str> = raw.split(sep).collect();
    let [first, _, last] = parts.as_slice() else {
        return None;
    };

    match (sep, first.len(), last.len()) {
        ('-', 4, 1..=2) => Some("%Y-%m-%d"),
        ('/', 1..=2, 4) => Some("%d/%m/%Y"),
        ('-', 1..=2, 4) => Some("%d-%m-%Y"),
        ('.', 1..=2, 4) => Some("%d.%m.%Y"),
        ('/', 1..=2, 2) => Some("%d/%m/%y"),
        ('-', 1..=2, 2) => Some("%d-%m-%y"),
        ('.', 1..=2, 2) => Some("%d.%m.%y"),
        _ => None,
    }
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.trim()
        .trim_matches('"')
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Parse a non-negative integral count; empty cells count as zero.
fn parse_count(raw: &str) -> Result<u64, &'static str> {
    let raw = raw.trim().trim_matches('"');
    if raw.is_empty() {
        return Ok(0);
    }
    if let Ok(v) = raw.parse::<u64>() {
        return Ok(v);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 => Ok(v as u64),
        Ok(_) => Err("expected a non-negative integer count"),
        Err(_) => Err("expected a number"),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().trim_matches('"').to_lowercase().as_str() {
        "1" | "1.0" | "true" | "t" | "yes" | "y" => Some(true),
        "0" | "0.0" | "false" | "f" | "no" | "n" | "" => Some(false),
        _ => None,
    }
}
