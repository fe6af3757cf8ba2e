//! Static feed parsing: zip archive in, typed rows out.

pub mod archive;
pub mod csv_table;
pub mod rows;

pub use archive::FeedArchive;
pub use csv_table::{CsvRow, CsvTable};

use crate::models::calendar::ServiceCalendar;
use crate::models::types::*;

/// Every parsed table of one static feed
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeedTables {
    pub routes: Vec<Route>,
    pub stops: Vec<Stop>,
    pub stop_times: Vec<StopTime>,
    pub shapes: Vec<ShapeRow>,
    pub trips: Vec<Trip>,
    pub calendars: Vec<ServiceCalendar>,
}

impl FeedTables {
    /// Parse a whole archive in one go.
    ///
    /// `routes`, `stops` and `stop_times` are required; the remaining tables
    /// default to empty.
    pub fn from_archive(bytes: &[u8]) -> Result<Self> {
        let mut archive = FeedArchive::from_bytes(bytes)?;

        let routes = rows::parse_routes(&archive.required_table("routes")?)?;
        let stops = rows::parse_stops(&archive.required_table("stops")?)?;
        let stop_times = rows::parse_stop_times(&archive.required_table("stop_times")?)?;

        let trips = match archive.table("trips")? {
            Some(table) => rows::parse_trips(&table)?,
            None => Vec::new(),
        };
        let shapes = match archive.table("shapes")? {
            Some(table) => rows::parse_shapes(&table)?,
            None => Vec::new(),
        };
        let calendar = archive.table("calendar")?;
        let calendar_dates = archive.table("calendar_dates")?;
        let calendars = rows::parse_calendars(calendar.as_ref(), calendar_dates.as_ref())?;

        Ok(Self {
            routes,
            stops,
            stop_times,
            shapes,
            trips,
            calendars,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::archive::test_archive::zip_entries;
    use super::*;

    #[test]
    fn test_from_archive_without_optional_tables() {
        let bytes = zip_entries(&[
            ("routes.txt", "route_id,route_long_name\n1,Empire Builder\n"),
            ("stops.txt", "stop_id,stop_name,stop_lat,stop_lon\nCHI,Chicago,41.87,-87.63\n"),
            (
                "stop_times.txt",
                "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
                 7,14:55:00,14:55:00,CHI,1\n",
            ),
        ]);

        let tables = FeedTables::from_archive(&bytes).unwrap();
        assert_eq!(tables.routes.len(), 1);
        assert_eq!(tables.stops.len(), 1);
        assert_eq!(tables.stop_times.len(), 1);
        assert!(tables.shapes.is_empty());
        assert!(tables.trips.is_empty());
        assert!(tables.calendars.is_empty());
    }

    #[test]
    fn test_from_archive_requires_stop_times() {
        let bytes = zip_entries(&[
            ("routes.txt", "route_id\n1\n"),
            ("stops.txt", "stop_id,stop_lat,stop_lon\nCHI,41.87,-87.63\n"),
        ]);

        assert!(matches!(
            FeedTables::from_archive(&bytes),
            Err(TransitError::MissingTable(name)) if name == "stop_times"
        ));
    }
}
