use anyhow::{bail, Result};
use geo::Point;
use railwatch_transit::prelude::*;
use railwatch_transit::time::{add_delay_minutes, format_duration, scheduled_minutes};

use crate::Engine;

pub fn search(engine: &Engine, query: &str) -> Result<()> {
    let results = engine.schedule.search(query);
    if results.is_empty() {
        println!("No matches for {query:?}");
        return Ok(());
    }

    for result in results {
        let kind = match result {
            SearchResult::Stop { .. } => "station",
            SearchResult::Route { .. } => "route",
            SearchResult::Train { .. } => "train",
        };
        println!("{kind:<8} {:<24} {}", result.id(), result.label());
    }
    Ok(())
}

pub async fn trip(engine: &Engine, trip_id: &str, live: bool) -> Result<()> {
    let index = engine.schedule.index();
    let stops = index.stop_times_for_trip(trip_id);
    if stops.is_empty() {
        bail!("Unknown trip: {trip_id}");
    }

    let route = index
        .route_for_trip(trip_id)
        .map(|r| r.display_name().to_string())
        .unwrap_or_default();
    println!("Train {} {route}", index.train_number(trip_id));

    let (first, last) = (&stops[0].stop_time, &stops[stops.len() - 1].stop_time);
    if let Ok(minutes) = scheduled_minutes(&first.departure_time, &last.arrival_time) {
        println!("Scheduled running time {}", format_duration(minutes));
    }

    let snapshot = if live {
        Some(engine.realtime.snapshot().await)
    } else {
        None
    };
    if let Some(position) = snapshot.as_ref().and_then(|s| s.position_for_trip(trip_id)) {
        println!("Last seen at {:.4}, {:.4}", position.lat, position.lon);
    }

    for view in &stops {
        let raw = if view.stop_time.departure_time.is_empty() {
            &view.stop_time.arrival_time
        } else {
            &view.stop_time.departure_time
        };
        let Ok(scheduled) = format_with_day_offset(raw) else {
            println!("  {:>10}  {}", "--", view.stop_name);
            continue;
        };

        let mut line = format!(
            "  {:>8}{}  {}",
            scheduled.time,
            day_marker(scheduled.day_offset),
            view.stop_name
        );

        if let Some(snapshot) = &snapshot {
            let delay = snapshot.propagated_delay(trip_id, view.stop_time.stop_id.as_str(), &index);
            line.push_str(&format!("  [{}]", format_delay(delay)));
            if let Some(minutes) = delay.filter(|m| *m != 0) {
                let expected = add_delay_minutes(&scheduled.time, minutes, scheduled.day_offset);
                if let Ok(expected) = expected {
                    let marker = day_marker(expected.day_offset);
                    line.push_str(&format!(" expected {}{marker}", expected.time));
                }
            }
        }
        println!("{line}");
    }
    Ok(())
}

fn day_marker(day_offset: i32) -> String {
    match day_offset {
        0 => "  ".to_string(),
        n if n > 0 => format!("+{n}"),
        n => format!("{n}"),
    }
}

pub fn stop(engine: &Engine, stop_id: &str, limit: usize) -> Result<()> {
    let index = engine.schedule.index();
    let Some(stop) = index.stop(stop_id) else {
        bail!("Unknown station: {stop_id}");
    };
    println!("{} ({})", stop.name, stop.id);

    let trips = index.trips_for_stop(stop_id);
    for trip_id in trips.iter().take(limit) {
        let call = index
            .stop_times(trip_id.as_str())
            .iter()
            .find(|st| st.stop_id.as_str() == stop_id);
        let time = call
            .and_then(|st| format_with_day_offset(&st.departure_time).ok())
            .map(|t| t.time)
            .unwrap_or_else(|| "--".into());
        let headsign = index
            .trip(trip_id.as_str())
            .and_then(|t| t.headsign.clone())
            .unwrap_or_default();
        println!(
            "  {time:>8}  Train {:<6} {headsign}",
            index.train_number(trip_id.as_str())
        );
    }
    if trips.len() > limit {
        println!("  ... {} more", trips.len() - limit);
    }

    let nearby = index.stops_near(stop.location(), 5_000.0);
    if nearby.len() > 1 {
        let names: Vec<_> = nearby
            .iter()
            .filter(|s| s.id != stop.id)
            .map(|s| s.name.as_str())
            .collect();
        println!("Nearby: {}", names.join(", "));
    }
    Ok(())
}

pub async fn train(engine: &Engine, number: &str) -> Result<()> {
    if engine.config.realtime_feed_url.is_none() {
        bail!("No realtime feed configured; set RAILWATCH_REALTIME_FEED_URL");
    }

    let snapshot = engine.realtime.snapshot().await;
    let Some(position) = snapshot.position_for_trip(number) else {
        println!("Train {number} is not reporting right now");
        return Ok(());
    };

    println!(
        "Train {} ({}) at {:.4}, {:.4}",
        position.train_number, position.trip_id, position.lat, position.lon
    );
    if let Some(speed) = position.speed {
        println!("  speed {:.0} km/h", f64::from(speed) * 3.6);
    }

    let index = engine.schedule.index();
    for delay in snapshot.delays_for_trip(number) {
        let Some(stop_id) = &delay.stop_id else {
            continue;
        };
        let name = index.stop_name(stop_id.as_str()).unwrap_or(stop_id.as_str());
        println!("  {name:<32} {}", format_delay(delay.delay_minutes()));
    }
    Ok(())
}

pub async fn clusters(engine: &Engine, zoom: f64, trains: bool) -> Result<()> {
    let clustering = ClusterEngine::new(engine.config.cluster);

    let groups: Vec<(Point, usize, String)> = if trains {
        let active = engine.realtime.all_active_trains().await;
        clustering
            .cluster_trains(&active, zoom)
            .iter()
            .map(|c| {
                let label = match c {
                    Cluster::Single(train) => format!("Train {}", train.train_number),
                    Cluster::Group { members, .. } => format!("{} trains", members.len()),
                };
                (c.location(), c.member_count(), label)
            })
            .collect()
    } else {
        let index = engine.schedule.index();
        let stations: Vec<_> = index.stops().cloned().collect();
        clustering
            .cluster_stations(&stations, zoom)
            .iter()
            .map(|c| {
                let label = match c {
                    Cluster::Single(stop) => stop.name.clone(),
                    Cluster::Group { members, .. } => format!("{} stations", members.len()),
                };
                (c.location(), c.member_count(), label)
            })
            .collect()
    };

    for (point, count, label) in &groups {
        println!("{:>9.4} {:>10.4} {count:>5}  {label}", point.y(), point.x());
    }
    println!("{} markers", groups.len());
    Ok(())
}
