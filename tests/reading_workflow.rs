//! End-to-end reading entry against SQLite and the filesystem object store.

mod common;

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use meterdesk_lib::{
    auth::{login_with_access_token, SessionEstablisher, SessionState, StaticIdentity},
    classifier::{Classification, Justification},
    commands::{self, AppState},
    db::{
        AccessToken, CommodityType, Database, Floor, Meter, NewReading, ReadingFilter, Role,
    },
    directory::MeterDirectory,
    history::HistoryRetriever,
    session::{ReadingSession, SessionConfig},
    settings::SettingsStore,
    storage::LocalObjectStore,
    submission::SubmissionAssembler,
};

use common::{evidence, operator};

struct Env {
    _dir: TempDir,
    db: Database,
    session: ReadingSession,
    evidence_dir: std::path::PathBuf,
}

fn setup() -> Env {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("meterdesk.sqlite3")).unwrap();
    let evidence_dir = dir.path().join("evidence");
    let objects = LocalObjectStore::new(evidence_dir.clone(), None).unwrap();

    let source = Arc::new(db.clone());
    let session = ReadingSession::new(
        CommodityType::Water,
        MeterDirectory::new(source.clone()),
        HistoryRetriever::new(source.clone()),
        SubmissionAssembler::new(Arc::new(objects), source),
        Arc::new(StaticIdentity::new(Some(operator(Role::N1, true)))),
        SessionConfig::default(),
    );

    Env {
        _dir: dir,
        db,
        session,
        evidence_dir,
    }
}

fn tower_meter() -> Meter {
    Meter {
        id: "m-1".into(),
        token: Some("da81ac95e1".into()),
        name: "HD-101".into(),
        commodity: CommodityType::Water,
        building: "Tower A".into(),
        floor: Floor::Level("1".into()),
        active: true,
    }
}

async fn enter(session: &ReadingSession, value: &str) {
    session.select_meter_by_id("m-1").await.unwrap();
    session.wait_for_history().await;
    session.set_value(value).await.unwrap();
    session.attach_evidence(evidence()).await.unwrap();
}

#[tokio::test]
async fn submitted_readings_feed_the_next_validation() {
    let env = setup();
    env.db.upsert_meter(&tower_meter()).await.unwrap();

    enter(&env.session, "100").await;
    let first = env.session.submit().await.unwrap();
    assert_eq!(first.consumption, None);
    assert_eq!(first.operator, "Ana Field");
    assert!(first.evidence_url.starts_with("file://"));

    enter(&env.session, "170").await;
    assert_eq!(env.session.view().await.previous, Some(100.0));
    let second = env.session.submit().await.unwrap();
    assert_eq!(second.consumption, Some(70.0));
    assert_eq!(second.annotation, "");

    let stored = env
        .db
        .get_reading(CommodityType::Water, second.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.value, 170.0);
    assert_eq!(stored.consumption, Some(70.0));
    assert_eq!(stored.evidence_url, second.evidence_url);
    assert!(env
        .db
        .get_reading(CommodityType::Energy, second.id)
        .await
        .unwrap()
        .is_none());

    enter(&env.session, "100").await;
    let evaluation = env.session.evaluation().await;
    assert_eq!(evaluation.classification, Classification::Regression);
    assert!(evaluation.blocked);
    env.session
        .set_justification(Some(Justification::MeterRollover))
        .await
        .unwrap();
    let third = env.session.submit().await.unwrap();
    assert_eq!(third.consumption, Some(-70.0));
    assert_eq!(third.annotation, "meter rollover");

    let history = HistoryRetriever::new(Arc::new(env.db.clone()))
        .snapshot("HD-101", CommodityType::Water)
        .await
        .unwrap();
    let values: Vec<f64> = history.samples.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![100.0, 170.0, 100.0]);
    assert_eq!(history.previous, Some(100.0));
    assert_eq!(history.baseline.value(), Some(70.0));

    let stored = std::fs::read_dir(&env.evidence_dir).unwrap().count();
    assert_eq!(stored, 3);
}

#[tokio::test]
async fn high_consumption_is_annotated_but_not_blocked() {
    let env = setup();
    env.db.upsert_meter(&tower_meter()).await.unwrap();

    for value in ["100", "110", "120"] {
        enter(&env.session, value).await;
        env.session.submit().await.unwrap();
    }

    enter(&env.session, "137.5").await;
    let evaluation = env.session.evaluation().await;
    assert_eq!(evaluation.classification, Classification::HighConsumption);
    assert!(evaluation.ready);

    let record = env.session.submit().await.unwrap();
    assert_eq!(record.annotation, "ALERT: high consumption (+75%)");
}

#[tokio::test]
async fn paginated_listing_filters_and_counts() {
    let env = setup();
    let base = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let rows = [
        ("HD-101", "Tower A", Floor::Level("1".into())),
        ("HD-102", "Tower A", Floor::None),
        ("hd-201", "Tower B", Floor::Level("2".into())),
        ("EN_9", "Tower B", Floor::Level("2".into())),
    ];
    for (index, (name, building, floor)) in rows.iter().enumerate() {
        env.db
            .append_reading(&NewReading {
                commodity: CommodityType::Water,
                meter_name: name.to_string(),
                building: building.to_string(),
                floor: floor.clone(),
                value: 10.0 * (index as f64 + 1.0),
                captured_at: base + Duration::hours(index as i64),
                evidence_url: format!("file:///tmp/{index}.png"),
                annotation: String::new(),
                operator: "Ana".into(),
            })
            .await
            .unwrap();
    }

    let all = env
        .db
        .list_readings_paginated(CommodityType::Water, ReadingFilter::default(), 2, 0)
        .await
        .unwrap();
    assert_eq!(all.total, 4);
    assert_eq!(all.records.len(), 2);
    assert_eq!(all.records[0].meter_name, "EN_9");

    let tower_b = env
        .db
        .list_readings_paginated(
            CommodityType::Water,
            ReadingFilter {
                building: Some("Tower B".into()),
                floor: Some(Floor::Level("2".into())),
                ..ReadingFilter::default()
            },
            10,
            0,
        )
        .await
        .unwrap();
    assert_eq!(tower_b.total, 2);

    let no_floor = env
        .db
        .list_readings_paginated(
            CommodityType::Water,
            ReadingFilter {
                floor: Some(Floor::None),
                ..ReadingFilter::default()
            },
            10,
            0,
        )
        .await
        .unwrap();
    assert_eq!(no_floor.total, 1);
    assert_eq!(no_floor.records[0].meter_name, "HD-102");

    let search = env
        .db
        .list_readings_paginated(
            CommodityType::Water,
            ReadingFilter {
                search: Some("HD-".into()),
                ..ReadingFilter::default()
            },
            10,
            0,
        )
        .await
        .unwrap();
    assert_eq!(search.total, 3);

    // `_` is literal, not a wildcard.
    let underscore = env
        .db
        .list_readings_paginated(
            CommodityType::Water,
            ReadingFilter {
                search: Some("N_".into()),
                ..ReadingFilter::default()
            },
            10,
            0,
        )
        .await
        .unwrap();
    assert_eq!(underscore.total, 1);

    let energy = env
        .db
        .list_readings_paginated(CommodityType::Energy, ReadingFilter::default(), 10, 0)
        .await
        .unwrap();
    assert_eq!(energy.total, 0);
}

#[tokio::test]
async fn access_token_login_accepts_only_active_tokens() {
    let env = setup();
    for (id, token, active) in [("t1", "field-crew-7", true), ("t2", "retired", false)] {
        env.db
            .insert_access_token(&AccessToken {
                id: id.into(),
                token: token.into(),
                description: format!("Crew {id}"),
                active,
            })
            .await
            .unwrap();
    }

    let user = login_with_access_token(&env.db, " field-crew-7 ").await.unwrap();
    assert_eq!(user.display_name, "Crew t1");
    assert_eq!(user.role, Role::N1);
    assert!(user.can_record_readings());

    assert!(login_with_access_token(&env.db, "retired").await.is_err());
    assert!(login_with_access_token(&env.db, "unknown").await.is_err());
    assert!(login_with_access_token(&env.db, "").await.is_err());
}

#[tokio::test]
async fn commands_register_scan_and_submit() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("meterdesk.sqlite3")).unwrap();
    let settings = SettingsStore::new(dir.path().join("settings.json")).unwrap();
    let objects = LocalObjectStore::new(dir.path().join("evidence"), None).unwrap();

    let auth = Arc::new(SessionEstablisher::default());
    auth.establish(&StaticIdentity::new(Some(operator(Role::Admin, false))))
        .await;

    let source = Arc::new(db.clone());
    let session = ReadingSession::new(
        CommodityType::Water,
        MeterDirectory::new(source.clone()),
        HistoryRetriever::new(source.clone()),
        SubmissionAssembler::new(Arc::new(objects), source),
        auth.clone(),
        settings.get().session_config(),
    );
    let state = AppState {
        db,
        session,
        auth,
        settings,
        data_dir: dir.path().to_path_buf(),
    };

    assert!(matches!(
        commands::get_auth_state(&state),
        SessionState::Established(_)
    ));

    let meter = commands::register_meter(&state, "EN-01", "energy", "Annex", None)
        .await
        .unwrap();
    assert_eq!(meter.floor, Floor::None);
    assert_eq!(commands::list_buildings(&state).await.unwrap(), Vec::<String>::new());

    commands::begin_scan(&state);
    let token = meter.token.clone().unwrap();
    let scanned = commands::offer_scan_token(&state, &token).await.unwrap().unwrap();
    assert_eq!(scanned.id, meter.id);
    assert_eq!(commands::list_buildings(&state).await.unwrap(), vec!["Annex".to_string()]);

    state.session.wait_for_history().await;
    commands::set_reading_value(&state, "12,5").await.unwrap();
    assert!(commands::submit_reading(&state).await.unwrap_err().contains("evidence"));

    let photo = dir.path().join("photo.png");
    std::fs::write(&photo, common::PNG).unwrap();
    let evaluation = commands::attach_evidence_file(&state, &photo).await.unwrap();
    assert!(evaluation.ready);

    let record = commands::submit_reading(&state).await.unwrap();
    assert_eq!(record.commodity, CommodityType::Energy);
    assert_eq!(record.value, 12.5);
    assert_eq!(record.meter_name, "EN-01");

    let page = commands::list_readings_paginated(&state, "energy", ReadingFilter::default(), 20, 0)
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert!(commands::list_readings_paginated(&state, "gas", ReadingFilter::default(), 20, 0)
        .await
        .is_err());
}

#[tokio::test]
async fn profile_identity_reads_role_and_access_flags() {
    use meterdesk_lib::{
        auth::{IdentityProvider, ProfileIdentity},
        db::Profile,
    };

    let env = setup();
    env.db
        .upsert_profile(&Profile {
            id: "u-hr".into(),
            name: Some("Bea Office".into()),
            email: Some("bea@example.com".into()),
            role: Some("user".into()),
            access_readings: Some(false),
            access_hr: Some(true),
            export: None,
            view: None,
        })
        .await
        .unwrap();

    let office = ProfileIdentity::new(env.db.clone(), "u-hr".into(), None)
        .current_user()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(office.display_name, "Bea Office");
    assert!(office.access.hr);
    assert!(!office.can_record_readings());

    let newcomer = ProfileIdentity::new(
        env.db.clone(),
        "u-new".into(),
        Some("new@example.com".into()),
    )
    .current_user()
    .await
    .unwrap()
    .unwrap();
    assert_eq!(newcomer.display_name, "new@example.com");
    assert_eq!(newcomer.role, Role::User);
    assert!(newcomer.can_record_readings());
}
