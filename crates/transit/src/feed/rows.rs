//! Typed conversion of feed tables.
//!
//! Each table must carry its key columns; a table without them is a decode
//! error. Individual rows with a missing key or unparseable numbers are
//! dropped with a warning so one bad line does not sink a whole feed.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::warn;

use crate::feed::csv_table::{CsvRow, CsvTable};
use crate::identifiers::*;
use crate::models::calendar::{OperatingDays, ServiceCalendar, WeeklyPattern};
use crate::models::types::*;

fn require_columns(table: &CsvTable, name: &str, columns: &[&str]) -> Result<()> {
    match columns.iter().find(|c| !table.has_column(c)) {
        Some(missing) => Err(TransitError::Decode(format!(
            "{name}.txt is missing column {missing}"
        ))),
        None => Ok(()),
    }
}

fn owned(row: &CsvRow<'_>, column: &str) -> Option<String> {
    row.non_empty(column).map(str::to_string)
}

/// Report rows dropped while converting a table
fn report_skipped(table: &str, skipped: usize) {
    if skipped > 0 {
        warn!(table, skipped, "dropped malformed feed rows");
    }
}

pub fn parse_routes(table: &CsvTable) -> Result<Vec<Route>> {
    require_columns(table, "routes", &["route_id"])?;

    let mut skipped = 0;
    let routes = table
        .rows()
        .filter_map(|row| {
            let Some(id) = row.non_empty("route_id") else {
                skipped += 1;
                return None;
            };
            Some(Route {
                id: RouteIdentifier::new(id),
                short_name: owned(&row, "route_short_name"),
                long_name: owned(&row, "route_long_name"),
                color: owned(&row, "route_color"),
                text_color: owned(&row, "route_text_color"),
                route_type: row.parse::<u16>("route_type").and_then(RouteType::from_gtfs),
            })
        })
        .collect();

    report_skipped("routes", skipped);
    Ok(routes)
}

pub fn parse_stops(table: &CsvTable) -> Result<Vec<Stop>> {
    require_columns(table, "stops", &["stop_id", "stop_lat", "stop_lon"])?;

    let mut skipped = 0;
    let stops = table
        .rows()
        .filter_map(|row| {
            let parsed = (|| {
                let id = row.non_empty("stop_id")?;
                Some(Stop {
                    id: StopIdentifier::new(id),
                    name: row.non_empty("stop_name").unwrap_or(id).to_string(),
                    lat: row.parse("stop_lat")?,
                    lon: row.parse("stop_lon")?,
                    timezone: owned(&row, "stop_timezone"),
                    parent_station: row.non_empty("parent_station").map(StopIdentifier::new),
                })
            })();
            if parsed.is_none() {
                skipped += 1;
            }
            parsed
        })
        .collect();

    report_skipped("stops", skipped);
    Ok(stops)
}

pub fn parse_stop_times(table: &CsvTable) -> Result<Vec<StopTime>> {
    require_columns(table, "stop_times", &["trip_id", "stop_id", "stop_sequence"])?;

    let mut skipped = 0;
    let stop_times = table
        .rows()
        .filter_map(|row| {
            let parsed = (|| {
                Some(StopTime {
                    trip_id: TripIdentifier::new(row.non_empty("trip_id")?),
                    stop_id: StopIdentifier::new(row.non_empty("stop_id")?),
                    arrival_time: row.get("arrival_time").unwrap_or_default().to_string(),
                    departure_time: row.get("departure_time").unwrap_or_default().to_string(),
                    stop_sequence: row.parse("stop_sequence")?,
                })
            })();
            if parsed.is_none() {
                skipped += 1;
            }
            parsed
        })
        .collect();

    report_skipped("stop_times", skipped);
    Ok(stop_times)
}

pub fn parse_shapes(table: &CsvTable) -> Result<Vec<ShapeRow>> {
    require_columns(
        table,
        "shapes",
        &["shape_id", "shape_pt_lat", "shape_pt_lon", "shape_pt_sequence"],
    )?;

    let mut skipped = 0;
    let shapes = table
        .rows()
        .filter_map(|row| {
            let parsed = (|| {
                Some(ShapeRow {
                    shape_id: ShapeIdentifier::new(row.non_empty("shape_id")?),
                    point: ShapePoint {
                        lat: row.parse("shape_pt_lat")?,
                        lon: row.parse("shape_pt_lon")?,
                        sequence: row.parse("shape_pt_sequence")?,
                    },
                })
            })();
            if parsed.is_none() {
                skipped += 1;
            }
            parsed
        })
        .collect();

    report_skipped("shapes", skipped);
    Ok(shapes)
}

pub fn parse_trips(table: &CsvTable) -> Result<Vec<Trip>> {
    require_columns(table, "trips", &["trip_id", "route_id"])?;

    let mut skipped = 0;
    let trips = table
        .rows()
        .filter_map(|row| {
            let parsed = (|| {
                Some(Trip {
                    id: TripIdentifier::new(row.non_empty("trip_id")?),
                    route_id: RouteIdentifier::new(row.non_empty("route_id")?),
                    service_id: ServiceIdentifier::new(row.get("service_id").unwrap_or_default()),
                    headsign: owned(&row, "trip_headsign"),
                    short_name: owned(&row, "trip_short_name"),
                    shape_id: row.non_empty("shape_id").map(ShapeIdentifier::new),
                    direction: row.parse::<u8>("direction_id").and_then(DirectionId::from_gtfs),
                })
            })();
            if parsed.is_none() {
                skipped += 1;
            }
            parsed
        })
        .collect();

    report_skipped("trips", skipped);
    Ok(trips)
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y%m%d").ok()
}

/// Merge `calendar.txt` and `calendar_dates.txt` into one calendar per service.
/// Either table may be absent.
pub fn parse_calendars(
    calendar: Option<&CsvTable>,
    calendar_dates: Option<&CsvTable>,
) -> Result<Vec<ServiceCalendar>> {
    const DAYS: [&str; 7] = [
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
    ];

    let mut services: HashMap<ServiceIdentifier, ServiceCalendar> = HashMap::new();

    if let Some(table) = calendar {
        require_columns(table, "calendar", &["service_id", "start_date", "end_date"])?;

        let mut skipped = 0;
        for row in table.rows() {
            let parsed = (|| {
                let service_id = ServiceIdentifier::new(row.non_empty("service_id")?);
                let pattern = WeeklyPattern {
                    start: parse_date(row.get("start_date")?)?,
                    end: parse_date(row.get("end_date")?)?,
                    days: OperatingDays::from_columns(DAYS.map(|day| row.get(day) == Some("1"))),
                };
                Some(ServiceCalendar::new(service_id, Some(pattern)))
            })();

            match parsed {
                Some(service) => {
                    services.insert(service.service_id.clone(), service);
                }
                None => skipped += 1,
            }
        }
        report_skipped("calendar", skipped);
    }

    if let Some(table) = calendar_dates {
        require_columns(table, "calendar_dates", &["service_id", "date", "exception_type"])?;

        let mut skipped = 0;
        for row in table.rows() {
            let parsed = (|| {
                let service_id = ServiceIdentifier::new(row.non_empty("service_id")?);
                let date = parse_date(row.get("date")?)?;
                let exception: u8 = row.parse("exception_type")?;
                Some((service_id, date, exception))
            })();

            let Some((service_id, date, exception)) = parsed else {
                skipped += 1;
                continue;
            };

            let service = services
                .entry(service_id.clone())
                .or_insert_with(|| ServiceCalendar::new(service_id, None));
            match exception {
                1 => {
                    service.added_dates.insert(date);
                }
                2 => {
                    service.removed_dates.insert(date);
                }
                _ => skipped += 1,
            }
        }
        report_skipped("calendar_dates", skipped);
    }

    let mut calendars: Vec<_> = services.into_values().collect();
    calendars.sort_by(|a, b| a.service_id.cmp(&b.service_id));
    Ok(calendars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(data: &str) -> CsvTable {
        CsvTable::parse(data.as_bytes()).unwrap()
    }

    #[test]
    fn test_parse_routes() {
        let routes = parse_routes(&table(
            "route_id,route_short_name,route_long_name,route_type,route_color\n\
             88,,Northeast Regional,2,1F4E8C\n\
             ,,Orphan,2,\n",
        ))
        .unwrap();

        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].short_name, None);
        assert_eq!(routes[0].route_type, Some(RouteType::Rail));
        assert_eq!(routes[0].color.as_deref(), Some("1F4E8C"));
    }

    #[test]
    fn test_parse_stops_skips_bad_coordinates() {
        let stops = parse_stops(&table(
            "stop_id,stop_name,stop_lat,stop_lon,stop_timezone\n\
             CHI,Chicago Union Station,41.8787,-87.6394,America/Chicago\n\
             XXX,Nowhere,north,-1\n",
        ))
        .unwrap();

        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].timezone.as_deref(), Some("America/Chicago"));
    }

    #[test]
    fn test_missing_key_column_is_decode_error() {
        let result = parse_stop_times(&table("trip_id,stop_id\nT1,A\n"));
        assert!(matches!(result, Err(TransitError::Decode(_))));
    }

    #[test]
    fn test_parse_stop_times_keeps_raw_clock() {
        let rows = parse_stop_times(&table(
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,25:30:00,25:35:00,B,2\n",
        ))
        .unwrap();

        assert_eq!(rows[0].arrival_time, "25:30:00");
        assert_eq!(rows[0].stop_sequence, 2);
    }

    #[test]
    fn test_parse_trips() {
        let trips = parse_trips(&table(
            "route_id,service_id,trip_id,trip_short_name,direction_id,shape_id\n\
             88,WKDY,2026-01-16_AMTK_171,171,0,S1\n",
        ))
        .unwrap();

        assert_eq!(trips[0].short_name.as_deref(), Some("171"));
        assert_eq!(trips[0].direction, Some(DirectionId::Outbound));
        assert_eq!(trips[0].shape_id, Some(ShapeIdentifier::new("S1")));
    }

    #[test]
    fn test_parse_calendars_merges_exceptions() {
        let calendar = table(
            "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,\
             start_date,end_date\n\
             WKDY,1,1,1,1,1,0,0,20260101,20261231\n",
        );
        let dates = table(
            "service_id,date,exception_type\n\
             WKDY,20260525,2\n\
             XMAS,20261225,1\n",
        );

        let calendars = parse_calendars(Some(&calendar), Some(&dates)).unwrap();
        assert_eq!(calendars.len(), 2);

        let weekday = &calendars[0];
        assert_eq!(weekday.service_id.as_str(), "WKDY");
        let memorial_day = NaiveDate::from_ymd_opt(2026, 5, 25).unwrap();
        assert!(!weekday.runs_on(memorial_day));
        assert!(weekday.runs_on(NaiveDate::from_ymd_opt(2026, 5, 26).unwrap()));

        let christmas = NaiveDate::from_ymd_opt(2026, 12, 25).unwrap();
        assert!(calendars[1].runs_on(christmas));
    }
}
