// Builds the flight route from a city list.
//
// Cities are grouped by their UTC offset truncated toward zero and the groups
// are flown east to west. Each group gets exactly one hour of mission time,
// spread evenly over its members. Inside a group the stops alternate between
// north-to-south and south-to-north so the path snakes across the map.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::models::{City, Result, SentinelLocation, Stop, TrackerError, WeatherFields};

const GROUP_DURATION_MS: i64 = 3_600_000;

/// Offset used for grouping only: 5.5 -> 5, -3.75 -> -3.
pub fn rounded_offset(utc_offset: f64) -> i32 {
    utc_offset.trunc() as i32
}

enum Slot<'a> {
    City(&'a City),
    Sentinel,
}

pub fn build_route(
    cities: &[City],
    mission_start: DateTime<Utc>,
    origin: &SentinelLocation,
) -> Result<Vec<Stop>> {
    if cities.is_empty() {
        return Err(TrackerError::EmptyInput(
            "cannot build a route without any cities".to_string(),
        ));
    }

    let mut groups: BTreeMap<i32, Vec<&City>> = BTreeMap::new();
    for city in cities {
        groups
            .entry(rounded_offset(city.utc_offset))
            .or_default()
            .push(city);
    }

    let group_count = groups.len();
    let mut stops = Vec::with_capacity(cities.len() + 2);
    let mut cursor = mission_start;

    for (index, (offset, mut members)) in groups.into_iter().rev().enumerate() {
        members.sort_by(|a, b| b.latitude.total_cmp(&a.latitude));
        if index % 2 == 1 {
            members.reverse();
        }

        let mut slots: Vec<Slot> = members.into_iter().map(Slot::City).collect();
        if index == 0 {
            slots.insert(0, Slot::Sentinel);
        }
        if index == group_count - 1 {
            slots.push(Slot::Sentinel);
        }

        let size = slots.len() as i64;
        debug!("Group UTC{:+}: {} stops starting at {}", offset, size, cursor);

        for (position, slot) in slots.iter().enumerate() {
            let utc_time = cursor + Duration::milliseconds(position as i64 * GROUP_DURATION_MS / size);
            let stop = match slot {
                Slot::City(city) => city_stop(city, offset, utc_time)?,
                Slot::Sentinel => sentinel_stop(origin, offset, utc_time)?,
            };
            stops.push(stop);
        }

        cursor += Duration::milliseconds(GROUP_DURATION_MS);
    }

    for (position, stop) in stops.iter_mut().enumerate() {
        stop.stop_number = position + 1;
    }

    info!(
        "Built route with {} stops across {} timezone groups",
        stops.len(),
        group_count
    );

    Ok(stops)
}

/// Headline numbers of a built or loaded route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSummary {
    pub cities: usize,
    pub groups: usize,
    pub departure: DateTime<Utc>,
    pub arrival: DateTime<Utc>,
}

pub fn summarize(stops: &[Stop]) -> Option<RouteSummary> {
    let departure = stops.first()?.utc_time;
    let arrival = stops.last()?.utc_time;

    let mut offsets: Vec<i32> = stops.iter().map(|s| s.utc_offset_rounded).collect();
    offsets.dedup();

    Some(RouteSummary {
        cities: stops.iter().filter(|s| !s.is_sentinel()).count(),
        groups: offsets.len(),
        departure,
        arrival,
    })
}

fn city_stop(city: &City, rounded: i32, utc_time: DateTime<Utc>) -> Result<Stop> {
    let tz: Tz = city.timezone.parse().map_err(|_| {
        TrackerError::ValidationError(format!(
            "Unknown timezone '{}' for {}, {}",
            city.timezone, city.name, city.country
        ))
    })?;

    Ok(Stop {
        stop_number: 0,
        city: city.name.clone(),
        country: city.country.clone(),
        state: city.state.clone(),
        latitude: city.latitude,
        longitude: city.longitude,
        timezone: city.timezone.clone(),
        utc_offset: city.utc_offset,
        utc_offset_rounded: rounded,
        utc_time,
        local_time: utc_time.with_timezone(&tz).naive_local(),
        population: city.population,
        weather: WeatherFields::default(),
    })
}

// The sentinel has no real zone, so its local time is a whole-hour shift.
fn sentinel_stop(origin: &SentinelLocation, rounded: i32, utc_time: DateTime<Utc>) -> Result<Stop> {
    let shift = rounded.checked_mul(3600).and_then(FixedOffset::east_opt).ok_or_else(|| {
        TrackerError::ValidationError(format!("UTC offset {} is out of range", rounded))
    })?;

    Ok(Stop {
        stop_number: 0,
        city: origin.name.clone(),
        country: origin.country.clone(),
        state: None,
        latitude: origin.latitude,
        longitude: origin.longitude,
        timezone: SentinelLocation::timezone_label(rounded),
        utc_offset: f64::from(rounded),
        utc_offset_rounded: rounded,
        utc_time,
        local_time: utc_time.with_timezone(&shift).naive_local(),
        population: 0,
        weather: WeatherFields::default(),
    })
}
