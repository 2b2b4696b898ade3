// Loading the source city table.

use std::fs;
use std::io::Read;
use std::path::Path;

use tracing::info;

use crate::models::{City, Result, TrackerError};

pub fn read_cities<R: Read>(reader: R) -> Result<Vec<City>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut cities = Vec::new();
    for (index, record) in rdr.deserialize::<City>().enumerate() {
        let city = record.map_err(|e| {
            TrackerError::ValidationError(format!("cities line {}: {}", index + 2, e))
        })?;
        check_city(&city).map_err(|message| {
            TrackerError::ValidationError(format!("cities line {}: {}", index + 2, message))
        })?;
        cities.push(city);
    }

    Ok(cities)
}

fn check_city(city: &City) -> std::result::Result<(), String> {
    let ranges = [
        ("latitude", city.latitude, 90.0),
        ("longitude", city.longitude, 180.0),
        ("utc_offset", city.utc_offset, 14.0),
    ];
    for (column, value, limit) in ranges {
        if !value.is_finite() || value.abs() > limit {
            return Err(format!("{} {} is outside [-{}, {}]", column, value, limit, limit));
        }
    }
    Ok(())
}

pub fn load_cities(path: &Path) -> Result<Vec<City>> {
    let file = fs::File::open(path)
        .map_err(|e| TrackerError::FileError(format!("Failed to open {}: {}", path.display(), e)))?;
    let cities = read_cities(file)?;
    info!("Loaded {} cities from {}", cities.len(), path.display());
    Ok(cities)
}

/// Keeps the `limit` most populous cities, preserving their input order.
pub fn most_populous(cities: Vec<City>, limit: usize) -> Vec<City> {
    if cities.len() <= limit {
        return cities;
    }

    let mut ranked: Vec<(usize, City)> = cities.into_iter().enumerate().collect();
    ranked.sort_by(|(a_index, a), (b_index, b)| {
        b.population.cmp(&a.population).then(a_index.cmp(b_index))
    });
    ranked.truncate(limit);
    ranked.sort_by_key(|(index, _)| *index);

    ranked.into_iter().map(|(_, city)| city).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CITIES: &str = "\
name,country,state,latitude,longitude,timezone,utc_offset,population
Tokyo,Japan,,35.6762,139.6503,Asia/Tokyo,9,37400068
\"Washington, D.C.\",United States,District of Columbia,38.9072,-77.0369,America/New_York,-5,689545
Mumbai,India,Maharashtra,19.076,72.8777,Asia/Kolkata,5.5,20411274
Adelaide,Australia,South Australia,-34.9285,138.6007,Australia/Adelaide,10.5,1376601
";

    #[test]
    fn reads_city_rows() {
        let cities = read_cities(CITIES.as_bytes()).unwrap();
        assert_eq!(cities.len(), 4);
        assert_eq!(cities[0].state, None);
        assert_eq!(cities[1].name, "Washington, D.C.");
        assert_eq!(cities[1].state.as_deref(), Some("District of Columbia"));
        assert_eq!(cities[2].utc_offset, 5.5);
    }

    #[test]
    fn state_column_is_optional() {
        let csv = "name,country,latitude,longitude,timezone,utc_offset,population\n\
                   Tokyo,Japan,35.6762,139.6503,Asia/Tokyo,9,37400068\n";
        let cities = read_cities(csv.as_bytes()).unwrap();
        assert_eq!(cities.len(), 1);
        assert_eq!(cities[0].state, None);
    }

    #[test]
    fn malformed_rows_name_the_line() {
        let broken = CITIES.replace("20411274", "lots");
        let err = read_cities(broken.as_bytes()).unwrap_err();
        assert!(matches!(err, TrackerError::ValidationError(_)));
        assert!(err.to_string().contains("line 4"), "{}", err);
    }

    #[test]
    fn out_of_range_values_name_the_line() {
        for (from, to, column) in [
            ("35.6762", "NaN", "latitude"),
            ("35.6762", "95", "latitude"),
            ("-77.0369", "-181", "longitude"),
            ("Asia/Kolkata,5.5", "Asia/Kolkata,NaN", "utc_offset"),
            ("Asia/Kolkata,5.5", "Asia/Kolkata,1000000", "utc_offset"),
        ] {
            let broken = CITIES.replace(from, to);
            let err = read_cities(broken.as_bytes()).unwrap_err();
            assert!(matches!(err, TrackerError::ValidationError(_)), "{}", to);
            assert!(err.to_string().contains(column), "{}", err);
            assert!(err.to_string().contains("line"), "{}", err);
        }

        let edge = CITIES.replace("35.6762,139.6503", "90,-180");
        assert_eq!(read_cities(edge.as_bytes()).unwrap()[0].latitude, 90.0);
    }

    #[test]
    fn limit_keeps_the_largest_in_input_order() {
        let cities = read_cities(CITIES.as_bytes()).unwrap();
        let kept = most_populous(cities, 2);
        let names: Vec<&str> = kept.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Tokyo", "Mumbai"]);
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.csv");
        fs::write(&path, CITIES).unwrap();
        assert_eq!(load_cities(&path).unwrap().len(), 4);
        assert!(load_cities(&dir.path().join("missing.csv")).is_err());
    }
}
