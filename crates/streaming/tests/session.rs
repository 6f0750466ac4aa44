use std::sync::Arc;
use std::time::Duration;

use foundation::geo::Coordinate;
use foundation::viewport::{Span, Viewport};
use layers::detail::DetailKind;
use layers::distance::DistanceLabel;
use pretty_assertions::assert_eq;
use scene::cluster::Marker;
use scene::entity::EntityId;
use scene::records::{FacilityId, FacilityRecord, IndoorOutdoor, SubRecord};
use scene::selection::SelectionState;
use streaming::{
    MapSession, MemorySource, ServerMessage, SessionCommand, SessionConfig, SessionOutput,
    SharedLocation,
};
use tokio::sync::mpsc;

fn facility(id: &str, lat: &str, lon: &str, kind: IndoorOutdoor) -> FacilityRecord {
    FacilityRecord {
        id: FacilityId::new(id),
        name: format!("park {id}"),
        indoor_outdoor: kind,
        latitude: lat.into(),
        longitude: lon.into(),
    }
}

fn ride(id: &str, facility: &str, category: &str) -> SubRecord {
    SubRecord {
        id: id.into(),
        facility_id: FacilityId::new(facility),
        install_date: "2019-07-01".into(),
        name: format!("ride {id}"),
        category: category.into(),
        address: format!("{facility} gate"),
        latitude: String::new(),
        longitude: String::new(),
    }
}

fn neighbourhood() -> MemorySource {
    MemorySource::new(
        vec![
            facility("A", "37.5665", "126.9780", IndoorOutdoor::Outdoor),
            facility("B", "37.6000", "127.0100", IndoorOutdoor::Indoor),
            facility("C", "37.5500", "126.9600", IndoorOutdoor::Outdoor),
            facility("broken", "n/a", "126.9780", IndoorOutdoor::Outdoor),
        ],
        vec![
            ride("a1", "A", "swing"),
            ride("a2", "A", "slide"),
            ride("b1", "B", "seesaw"),
            ride("c1", "C", "swing"),
        ],
    )
    .with_failing_facility(FacilityId::new("C"))
    .with_sub_record_latency(Duration::from_millis(20))
}

fn seoul() -> Viewport {
    Viewport::new(Coordinate::new(37.5665, 126.9780), Span::new(0.1, 0.1))
}

async fn next(rx: &mut mpsc::Receiver<SessionOutput>) -> SessionOutput {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("session output within 5s")
        .expect("session still running")
}

#[tokio::test]
async fn full_session_walkthrough() {
    let location = SharedLocation::default();
    let (handle, mut rx) = MapSession::spawn(
        Arc::new(neighbourhood()),
        Arc::new(location.clone()),
        SessionConfig::default(),
    );

    handle.send(SessionCommand::ViewportChanged(seoul())).await.unwrap();
    let SessionOutput::Entities(frame) = next(&mut rx).await else {
        panic!("expected an entity frame");
    };

    let mut ids: Vec<&str> = frame.entities.iter().map(|e| e.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["a1", "a2", "b1"]);
    assert_eq!(frame.report.facilities_failed, vec![FacilityId::new("C")]);
    assert!(frame.report.is_partial());
    assert!(frame.entities.iter().all(|e| e.distance_from_user_m.is_none()));

    // a1 and a2 share their facility's position and collapse into one marker.
    assert_eq!(frame.render.entity_count(), 3);
    let cluster = frame
        .render
        .markers
        .iter()
        .find_map(|m| match m {
            Marker::Cluster(c) => Some(c.clone()),
            Marker::Single { .. } => None,
        })
        .expect("a1/a2 cluster");
    assert_eq!(cluster.representative.id.as_str(), "a1");
    assert_eq!(cluster.count(), 2);

    let wire = ServerMessage::from(SessionOutput::Entities(frame));
    assert!(matches!(wire, ServerMessage::Entities { partial: true, .. }));

    // Open the cluster.
    handle.send(SessionCommand::ClusterTapped(cluster.member_ids())).await.unwrap();
    let SessionOutput::Selection(SelectionState::ClusterSelected { members }) = next(&mut rx).await
    else {
        panic!("expected cluster selection");
    };
    assert_eq!(members.len(), 2);
    let SessionOutput::Detail(Some(detail)) = next(&mut rx).await else {
        panic!("expected detail");
    };
    assert_eq!(detail.kind, DetailKind::Cluster);
    assert_eq!(detail.title, "park A");
    assert_eq!(detail.distance, DistanceLabel::Unavailable);
    assert_eq!(detail.icons, vec!["icon.swing".to_string(), "icon.slide".to_string()]);

    // Location arrives: distances fill in everywhere.
    location.set(Some(Coordinate::new(37.5665, 126.9780)));
    handle.send(SessionCommand::UserLocationChanged).await.unwrap();
    let SessionOutput::Entities(frame) = next(&mut rx).await else {
        panic!("expected refreshed frame");
    };
    assert!(frame.entities.iter().all(|e| e.distance_from_user_m.is_some()));
    assert!(matches!(
        next(&mut rx).await,
        SessionOutput::Selection(SelectionState::ClusterSelected { .. })
    ));
    let SessionOutput::Detail(Some(detail)) = next(&mut rx).await else {
        panic!("expected detail");
    };
    assert_eq!(detail.distance_text, "0m");

    // Drill into one member, then dismiss.
    handle.send(SessionCommand::EntityTapped(EntityId::new("a2"))).await.unwrap();
    let SessionOutput::Selection(SelectionState::SingleSelected { entity }) = next(&mut rx).await
    else {
        panic!("expected single selection");
    };
    assert_eq!(entity.id.as_str(), "a2");
    let SessionOutput::Detail(Some(detail)) = next(&mut rx).await else {
        panic!("expected detail");
    };
    assert_eq!(detail.kind, DetailKind::Single);
    assert_eq!(detail.badge.as_deref(), Some("badge.outdoor"));

    handle.send(SessionCommand::Dismissed).await.unwrap();
    assert_eq!(next(&mut rx).await, SessionOutput::Selection(SelectionState::Dismissed));
    assert_eq!(next(&mut rx).await, SessionOutput::Selection(SelectionState::Idle));
    assert_eq!(next(&mut rx).await, SessionOutput::Detail(None));

    handle.shutdown().await;
}

#[tokio::test]
async fn category_change_requeries_and_unknown_taps_are_ignored() {
    let (handle, mut rx) = MapSession::spawn(
        Arc::new(neighbourhood()),
        Arc::new(SharedLocation::default()),
        SessionConfig::default(),
    );

    handle.send(SessionCommand::ViewportChanged(seoul())).await.unwrap();
    assert!(matches!(next(&mut rx).await, SessionOutput::Entities(_)));

    let indoor = SessionCommand::CategoryChanged(scene::records::CategoryFilter::Indoor);
    handle.send(indoor).await.unwrap();
    let SessionOutput::Entities(frame) = next(&mut rx).await else {
        panic!("expected an entity frame");
    };
    let ids: Vec<&str> = frame.entities.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["b1"]);
    assert!(!frame.report.is_partial());

    // Tapping something that is not on the map produces nothing.
    handle.send(SessionCommand::EntityTapped(EntityId::new("a1"))).await.unwrap();
    handle.send(SessionCommand::Dismissed).await.unwrap();
    handle.send(SessionCommand::SnapshotMetrics).await.unwrap();
    let SessionOutput::Metrics(snapshot) = next(&mut rx).await else {
        panic!("expected metrics, not a selection change");
    };
    assert!(snapshot.counters.contains(&("cycles_delivered", 2)));
    assert!(snapshot.counters.contains(&("secondary_failures", 1)));
    assert_eq!(snapshot.merged_entities.count, 2);

    handle.shutdown().await;
}
