// In-place repairs of generated route files.
//
// Every patcher works on a `RouteTable`: the file is read whole, fields are
// overwritten at fixed column positions, and the caller writes it back with
// the header untouched.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate, Offset};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::models::{
    format_timestamp, parse_timestamp, Result, TrackerError, WeatherFields, WeatherReport,
    WeatherUpdate,
};
use crate::route_builder::rounded_offset;
use crate::route_csv::{weather_values, RouteTable};

const DATE_LEN: usize = "YYYY-MM-DD".len();

/// Moves the date part of `utc_time` and `local_time` by `days`.
///
/// Not idempotent: running it twice shifts by twice the delta.
pub fn shift_dates(table: &mut RouteTable, days: i64) -> Result<usize> {
    let columns = [table.layout.utc_time(), table.layout.local_time()];
    let mut substitutions: HashMap<String, String> = HashMap::new();
    let mut changed = 0;

    for (index, row) in table.rows.iter_mut().enumerate() {
        let mut fields: Vec<String> = row.iter().map(String::from).collect();
        for &column in &columns {
            let Some(value) = fields.get_mut(column) else {
                continue;
            };
            if value.trim().is_empty() {
                continue;
            }

            let date = value.trim_start().get(..DATE_LEN).ok_or_else(|| {
                TrackerError::ValidationError(format!(
                    "line {}: '{}' does not start with a date",
                    index + 2,
                    value
                ))
            })?;

            let replacement = match substitutions.get(date) {
                Some(shifted) => shifted.clone(),
                None => {
                    let shifted = shifted_date(date, days).map_err(|e| {
                        TrackerError::ValidationError(format!("line {}: {}", index + 2, e))
                    })?;
                    substitutions.insert(date.to_string(), shifted.clone());
                    shifted
                }
            };

            *value = value.replacen(date, &replacement, 1);
            changed += 1;
        }
        *row = fields.into();
    }

    for (from, to) in &substitutions {
        debug!("Date {} -> {}", from, to);
    }
    info!("Shifted {} timestamps by {} days", changed, days);
    Ok(changed)
}

fn shifted_date(date: &str, days: i64) -> Result<String> {
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| TrackerError::ValidationError(format!("Invalid date '{}': {}", date, e)))?;
    let shifted = parsed
        .checked_add_signed(Duration::days(days))
        .ok_or_else(|| TrackerError::ValidationError(format!("Date '{}' shifted out of range", date)))?;
    Ok(shifted.format("%Y-%m-%d").to_string())
}

/// Overwrites the five weather columns of every row whose stop number has an
/// update. Returns how many rows were updated.
pub fn patch_weather(table: &mut RouteTable, updates: &[WeatherUpdate]) -> usize {
    let by_stop: HashMap<usize, &WeatherFields> = updates
        .iter()
        .map(|update| (update.stop_number, &update.weather))
        .collect();

    let stop_column = table.layout.stop_number();
    let weather_column = table.layout.weather();
    let mut rows = std::mem::take(&mut table.rows);
    let mut updated = 0;

    for row in rows.iter_mut() {
        let Ok(stop_number) = RouteTable::field(row, stop_column).trim().parse::<usize>() else {
            warn!("Skipping row with unreadable stop number: {:?}", row);
            continue;
        };
        if let Some(weather) = by_stop.get(&stop_number) {
            table.set_fields(row, weather_column, &weather_values(weather));
            updated += 1;
        }
    }

    table.rows = rows;
    info!("Updated weather for {} of {} requested stops", updated, by_stop.len());
    updated
}

/// Recomputes the offset columns and local time of every city row from its
/// IANA zone at that row's UTC time. Returns how many rows changed.
pub fn fix_timezones(table: &mut RouteTable) -> Result<usize> {
    let layout = table.layout;
    let mut rows = std::mem::take(&mut table.rows);
    let mut changed = 0;

    for (index, row) in rows.iter_mut().enumerate() {
        if table.is_sentinel_row(row) {
            continue;
        }
        let line = index + 2;
        let zone_name = RouteTable::field(row, layout.timezone()).trim();
        let tz: Tz = zone_name.parse().map_err(|_| {
            TrackerError::ValidationError(format!("line {}: unknown timezone '{}'", line, zone_name))
        })?;
        let utc_time = parse_timestamp(RouteTable::field(row, layout.utc_time()))
            .map_err(|e| TrackerError::ValidationError(format!("line {}: {}", line, e)))?
            .and_utc();

        let zoned = utc_time.with_timezone(&tz);
        let offset_hours = f64::from(zoned.offset().fix().local_minus_utc()) / 3600.0;

        let offsets = [
            offset_hours.to_string(),
            rounded_offset(offset_hours).to_string(),
        ];
        let local = format_timestamp(&zoned.naive_local());

        let current_offsets = [
            RouteTable::field(row, layout.utc_offset()),
            RouteTable::field(row, layout.utc_offset_rounded()),
        ];
        let offsets_match = current_offsets
            .iter()
            .zip(&offsets)
            .all(|(current, fresh)| same_number(current, fresh));
        let local_matches = RouteTable::field(row, layout.local_time()).trim() == local;
        if offsets_match && local_matches {
            continue;
        }

        debug!(
            "line {}: {} -> offset {} local {}",
            line, zone_name, offsets[0], local
        );
        table.set_fields(row, layout.utc_offset(), &offsets);
        table.set_fields(row, layout.local_time(), &[local]);
        changed += 1;
    }

    table.rows = rows;
    info!("Corrected timezone fields on {} rows", changed);
    Ok(changed)
}

fn same_number(current: &str, fresh: &str) -> bool {
    match (current.trim().parse::<f64>(), fresh.parse::<f64>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillSummary {
    pub filled: usize,
    pub failed: usize,
}

/// Looks up current weather for every city row and writes it into the weather
/// columns. A failed lookup is logged and leaves that row as it was.
pub fn fill_weather<F>(table: &mut RouteTable, mut lookup: F) -> Result<FillSummary>
where
    F: FnMut(f64, f64) -> Result<WeatherReport>,
{
    let layout = table.layout;
    let mut rows = std::mem::take(&mut table.rows);
    let mut summary = FillSummary::default();

    for (index, row) in rows.iter_mut().enumerate() {
        if table.is_sentinel_row(row) {
            continue;
        }
        let line = index + 2;
        let coordinate = |column: usize, name: &str| {
            RouteTable::field(row, column).trim().parse::<f64>().map_err(|_| {
                TrackerError::ValidationError(format!("line {}: invalid {}", line, name))
            })
        };
        let latitude = coordinate(layout.latitude(), "latitude")?;
        let longitude = coordinate(layout.longitude(), "longitude")?;
        let city = RouteTable::field(row, layout.city()).to_string();

        match lookup(latitude, longitude) {
            Ok(report) => {
                let weather = WeatherFields::from(report);
                table.set_fields(row, layout.weather(), &weather_values(&weather));
                summary.filled += 1;
            }
            Err(e) => {
                warn!("No weather for {} ({}, {}): {}", city, latitude, longitude, e);
                summary.failed += 1;
            }
        }
    }

    table.rows = rows;
    info!(
        "Filled weather for {} stops, {} lookups failed",
        summary.filled, summary.failed
    );
    Ok(summary)
}
