// Reading and writing the route CSV files.
//
// Column order is fixed; the state/province column is optional and shifts
// every later column by one when present.

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use chrono::NaiveDateTime;
use csv::StringRecord;
use tracing::info;

use crate::models::{
    format_timestamp, is_sentinel_timezone, parse_timestamp, Result, Stop, TrackerError,
    WeatherFields,
};

pub const STATE_COLUMN: &str = "state_province";

const LEADING_COLUMNS: [&str; 3] = ["stop_number", "city", "country"];
const TRAILING_COLUMNS: [&str; 13] = [
    "latitude",
    "longitude",
    "timezone",
    "utc_offset",
    "utc_offset_rounded",
    "utc_time",
    "local_time",
    "population",
    "temperature_c",
    "weather_condition",
    "wind_speed_mps",
    "wind_direction_deg",
    "wind_gust_mps",
];

// ============================================================================
// Column Layout
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteLayout {
    pub has_state: bool,
}

impl RouteLayout {
    pub fn from_header(header: &StringRecord) -> Self {
        RouteLayout {
            has_state: header.iter().any(|column| column.trim() == STATE_COLUMN),
        }
    }

    fn shift(&self) -> usize {
        usize::from(self.has_state)
    }

    pub fn header(&self) -> StringRecord {
        let mut columns: Vec<&str> = LEADING_COLUMNS.to_vec();
        if self.has_state {
            columns.push(STATE_COLUMN);
        }
        columns.extend(TRAILING_COLUMNS);
        StringRecord::from(columns)
    }

    pub fn width(&self) -> usize {
        LEADING_COLUMNS.len() + TRAILING_COLUMNS.len() + self.shift()
    }

    pub fn stop_number(&self) -> usize { 0 }
    pub fn city(&self) -> usize { 1 }
    pub fn country(&self) -> usize { 2 }

    pub fn state(&self) -> Option<usize> {
        self.has_state.then_some(3)
    }

    pub fn latitude(&self) -> usize { 3 + self.shift() }
    pub fn longitude(&self) -> usize { 4 + self.shift() }
    pub fn timezone(&self) -> usize { 5 + self.shift() }
    pub fn utc_offset(&self) -> usize { 6 + self.shift() }
    pub fn utc_offset_rounded(&self) -> usize { 7 + self.shift() }
    pub fn utc_time(&self) -> usize { 8 + self.shift() }
    pub fn local_time(&self) -> usize { 9 + self.shift() }
    pub fn population(&self) -> usize { 10 + self.shift() }

    /// First of the five weather columns.
    pub fn weather(&self) -> usize { 11 + self.shift() }
}

// ============================================================================
// Raw Table
// ============================================================================

/// A route file held as raw fields, so patches keep everything they don't touch.
#[derive(Debug, Clone)]
pub struct RouteTable {
    pub header: StringRecord,
    pub rows: Vec<StringRecord>,
    pub layout: RouteLayout,
}

impl RouteTable {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let header = rdr.headers()?.clone();
        if header.is_empty() || header.get(0).is_none_or(|column| column.trim().is_empty()) {
            return Err(TrackerError::ValidationError(
                "Route file is missing its header row".to_string(),
            ));
        }

        let rows = rdr.records().collect::<std::result::Result<Vec<_>, _>>()?;
        let layout = RouteLayout::from_header(&header);

        Ok(RouteTable { header, rows, layout })
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(writer);
        wtr.write_record(&self.header)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()
            .map_err(|e| TrackerError::FileError(format!("Failed to flush route table: {}", e)))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .map_err(|e| TrackerError::FileError(format!("Failed to open {}: {}", path.display(), e)))?;
        let table = Self::from_reader(file)?;
        info!("Loaded {} rows from {}", table.rows.len(), path.display());
        Ok(table)
    }

    /// Writes a sibling temp file and renames it over `path`, so readers never see a partial file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| TrackerError::FileError(format!("Failed to create a temp file in {}: {}", dir.display(), e)))?;
        self.to_writer(tmp.as_file_mut())?;
        tmp.persist(path)
            .map_err(|e| TrackerError::FileError(format!("Failed to replace {}: {}", path.display(), e)))?;
        info!("Wrote {} rows to {}", self.rows.len(), path.display());
        Ok(())
    }

    pub fn from_stops(stops: &[Stop]) -> Self {
        let layout = RouteLayout {
            has_state: stops.iter().any(|stop| stop.state.is_some()),
        };
        let rows = stops.iter().map(|stop| stop_record(stop, &layout)).collect();

        RouteTable {
            header: layout.header(),
            rows,
            layout,
        }
    }

    pub fn stops(&self) -> Result<Vec<Stop>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| parse_stop(row, &self.layout, index + 2))
            .collect()
    }

    /// Field at `index`, or "" when the row is shorter than that.
    pub fn field<'a>(row: &'a StringRecord, index: usize) -> &'a str {
        row.get(index).unwrap_or("")
    }

    /// Overwrite consecutive fields starting at `start`, padding the row if needed.
    pub fn set_fields(&self, row: &mut StringRecord, start: usize, values: &[String]) {
        let mut fields: Vec<String> = row.iter().map(String::from).collect();
        let needed = (start + values.len())
            .max(self.header.len())
            .max(self.layout.width());
        if fields.len() < needed {
            fields.resize(needed, String::new());
        }
        for (offset, value) in values.iter().enumerate() {
            fields[start + offset] = value.clone();
        }
        *row = StringRecord::from(fields);
    }

    pub fn is_sentinel_row(&self, row: &StringRecord) -> bool {
        is_sentinel_timezone(Self::field(row, self.layout.timezone()))
    }
}

// ============================================================================
// Stop Codec
// ============================================================================

pub fn write_route_file(path: &Path, stops: &[Stop]) -> Result<()> {
    RouteTable::from_stops(stops).save(path)
}

pub fn read_route_file(path: &Path) -> Result<Vec<Stop>> {
    RouteTable::load(path)?.stops()
}

pub fn weather_values(weather: &WeatherFields) -> Vec<String> {
    vec![
        optional_number(weather.temperature_c),
        weather.condition.clone().unwrap_or_default(),
        optional_number(weather.wind_speed_mps),
        optional_number(weather.wind_direction_deg),
        optional_number(weather.wind_gust_mps),
    ]
}

fn optional_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn stop_record(stop: &Stop, layout: &RouteLayout) -> StringRecord {
    let mut fields = vec![
        stop.stop_number.to_string(),
        stop.city.clone(),
        stop.country.clone(),
    ];
    if layout.has_state {
        fields.push(stop.state.clone().unwrap_or_default());
    }
    fields.extend([
        stop.latitude.to_string(),
        stop.longitude.to_string(),
        stop.timezone.clone(),
        stop.utc_offset.to_string(),
        stop.utc_offset_rounded.to_string(),
        format_timestamp(&stop.utc_time.naive_utc()),
        format_timestamp(&stop.local_time),
        stop.population.to_string(),
    ]);
    fields.extend(weather_values(&stop.weather));
    StringRecord::from(fields)
}

fn parse_stop(row: &StringRecord, layout: &RouteLayout, line: usize) -> Result<Stop> {
    let text = |index: usize| RouteTable::field(row, index).trim();

    let state = layout
        .state()
        .map(text)
        .filter(|value| !value.is_empty())
        .map(String::from);

    let utc_time: NaiveDateTime = parse_timestamp(text(layout.utc_time()))
        .map_err(|e| line_error(line, "utc_time", &e.to_string()))?;
    let local_time = parse_timestamp(text(layout.local_time()))
        .map_err(|e| line_error(line, "local_time", &e.to_string()))?;

    let weather_start = layout.weather();
    let weather = WeatherFields {
        temperature_c: optional_field(text(weather_start), line, "temperature_c")?,
        condition: Some(text(weather_start + 1))
            .filter(|value| !value.is_empty())
            .map(String::from),
        wind_speed_mps: optional_field(text(weather_start + 2), line, "wind_speed_mps")?,
        wind_direction_deg: optional_field(text(weather_start + 3), line, "wind_direction_deg")?,
        wind_gust_mps: optional_field(text(weather_start + 4), line, "wind_gust_mps")?,
    };

    Ok(Stop {
        stop_number: required_field(text(layout.stop_number()), line, "stop_number")?,
        city: text(layout.city()).to_string(),
        country: text(layout.country()).to_string(),
        state,
        latitude: required_field(text(layout.latitude()), line, "latitude")?,
        longitude: required_field(text(layout.longitude()), line, "longitude")?,
        timezone: text(layout.timezone()).to_string(),
        utc_offset: required_field(text(layout.utc_offset()), line, "utc_offset")?,
        utc_offset_rounded: required_field(text(layout.utc_offset_rounded()), line, "utc_offset_rounded")?,
        utc_time: utc_time.and_utc(),
        local_time,
        population: required_field(text(layout.population()), line, "population")?,
        weather,
    })
}

fn required_field<T: std::str::FromStr>(value: &str, line: usize, column: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| line_error(line, column, &format!("cannot parse '{}'", value)))
}

fn optional_field<T: std::str::FromStr>(value: &str, line: usize, column: &str) -> Result<Option<T>> {
    if value.is_empty() {
        return Ok(None);
    }
    required_field(value, line, column).map(Some)
}

fn line_error(line: usize, column: &str, message: &str) -> TrackerError {
    TrackerError::ValidationError(format!("line {}: {}: {}", line, column, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SentinelLocation;
    use crate::route_builder::build_route;
    use chrono::{TimeZone, Utc};

    fn read_stops(input: &str) -> Result<Vec<Stop>> {
        RouteTable::from_reader(input.as_bytes())?.stops()
    }

    const SAMPLE: &str = "\
stop_number,city,country,latitude,longitude,timezone,utc_offset,utc_offset_rounded,utc_time,local_time,population,temperature_c,weather_condition,wind_speed_mps,wind_direction_deg,wind_gust_mps
1,North Pole,Arctic,90,0,UTC+14,14,14,2025-12-24 10:00:00,2025-12-25 00:00:00,0,,,,,
2,\"Washington, D.C.\",United States,38.9072,-77.0369,America/New_York,-5,-5,2025-12-24 10:30:00,2025-12-24 05:30:00,689545,-1.5,\"clear sky, cold\",3.2,270,
3,Honolulu,United States,21.31,-157.86,Pacific/Honolulu,-10,-10,2025-12-24 11:00:00,2025-12-24 01:00:00,350964
";

    fn sample_route() -> Vec<Stop> {
        let cities = vec![
            crate::models::City {
                name: "Kiritimati".to_string(),
                country: "Kiribati".to_string(),
                state: None,
                latitude: 1.87,
                longitude: -157.36,
                timezone: "Pacific/Kiritimati".to_string(),
                utc_offset: 14.0,
                population: 6456,
            },
            crate::models::City {
                name: "Honolulu".to_string(),
                country: "United States".to_string(),
                state: Some("Hawaii".to_string()),
                latitude: 21.31,
                longitude: -157.86,
                timezone: "Pacific/Honolulu".to_string(),
                utc_offset: -10.0,
                population: 350964,
            },
        ];
        let start = Utc.with_ymd_and_hms(2025, 12, 24, 10, 0, 0).unwrap();
        build_route(&cities, start, &SentinelLocation::north_pole()).unwrap()
    }

    #[test]
    fn reads_quoted_fields_with_commas() {
        let stops = read_stops(SAMPLE).unwrap();
        assert_eq!(stops.len(), 3);

        let washington = &stops[1];
        assert_eq!(washington.city, "Washington, D.C.");
        assert_eq!(washington.state, None);
        assert_eq!(washington.weather.temperature_c, Some(-1.5));
        assert_eq!(washington.weather.condition.as_deref(), Some("clear sky, cold"));
        assert_eq!(washington.weather.wind_direction_deg, Some(270.0));
        assert_eq!(washington.weather.wind_gust_mps, None);
    }

    #[test]
    fn missing_weather_columns_read_as_empty() {
        let stops = read_stops(SAMPLE).unwrap();
        assert_eq!(stops[2].weather, WeatherFields::default());
        assert!(stops[0].is_sentinel());
    }

    #[test]
    fn written_route_reads_back_unchanged() {
        let mut stops = sample_route();
        stops[1].weather = WeatherFields {
            temperature_c: Some(27.5),
            condition: Some("scattered clouds, breezy".to_string()),
            wind_speed_mps: Some(6.7),
            wind_direction_deg: Some(60.0),
            wind_gust_mps: None,
        };

        let mut buffer = Vec::new();
        RouteTable::from_stops(&stops).to_writer(&mut buffer).unwrap();
        let parsed = read_stops(&String::from_utf8(buffer).unwrap()).unwrap();

        assert_eq!(parsed, stops);
    }

    #[test]
    fn state_column_appears_only_when_needed() {
        let stops = sample_route();
        let table = RouteTable::from_stops(&stops);
        assert!(table.layout.has_state);
        assert_eq!(table.header.get(3), Some(STATE_COLUMN));
        assert_eq!(table.header.len(), table.layout.width());

        let without_state: Vec<Stop> = stops
            .into_iter()
            .map(|mut stop| {
                stop.state = None;
                stop
            })
            .collect();
        let table = RouteTable::from_stops(&without_state);
        assert!(!table.layout.has_state);
        assert_eq!(table.header.len(), 16);
        assert_eq!(table.layout.timezone(), 5);
    }

    #[test]
    fn header_survives_a_raw_rewrite() {
        let table = RouteTable::from_reader(SAMPLE.as_bytes()).unwrap();
        let mut buffer = Vec::new();
        table.to_writer(&mut buffer).unwrap();

        let written = String::from_utf8(buffer).unwrap();
        assert_eq!(written.lines().next(), SAMPLE.lines().next());
        assert_eq!(written.lines().count(), 4);
    }

    #[test]
    fn set_fields_pads_short_rows() {
        let mut table = RouteTable::from_reader(SAMPLE.as_bytes()).unwrap();
        let start = table.layout.weather();
        let mut row = table.rows[2].clone();
        table.set_fields(&mut row, start, &["20".to_string(), "rain".to_string()]);
        table.rows[2] = row;

        assert_eq!(table.rows[2].len(), 16);
        assert_eq!(RouteTable::field(&table.rows[2], start + 1), "rain");
        assert_eq!(RouteTable::field(&table.rows[2], start + 4), "");
    }

    #[test]
    fn bad_numbers_name_the_line() {
        let broken = SAMPLE.replace("38.9072", "north-ish");
        let err = read_stops(&broken).unwrap_err();
        assert!(err.to_string().contains("line 3"), "{}", err);
        assert!(err.to_string().contains("latitude"), "{}", err);
    }

    #[test]
    fn save_replaces_the_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("santa_route.csv");
        fs::write(&path, "stale contents that are longer than nothing\n".repeat(100)).unwrap();

        let table = RouteTable::from_reader(SAMPLE.as_bytes()).unwrap();
        table.save(&path).unwrap();
        table.save(&path).unwrap();

        assert_eq!(RouteTable::load(&path).unwrap().rows, table.rows);
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn save_into_a_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let table = RouteTable::from_reader(SAMPLE.as_bytes()).unwrap();
        let result = table.save(&dir.path().join("missing").join("santa_route.csv"));
        assert!(matches!(result, Err(TrackerError::FileError(_))));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("santa_route.csv");
        let stops = sample_route();

        write_route_file(&path, &stops).unwrap();
        assert_eq!(read_route_file(&path).unwrap(), stops);
    }
}
