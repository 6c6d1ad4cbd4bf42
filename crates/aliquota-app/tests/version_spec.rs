//! Version comparison rules, record persistence, and the banner fetch
//! against a mock portal.

use chrono::{NaiveDate, NaiveDateTime};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use aliquota_app::version::{
    DATE_FORMAT, RemoteVersion, UpdateVerdict, VersionComparator, VersionError, VersionRecord,
    VersionStore, compare,
};

fn checked_at() -> NaiveDateTime {
    NaiveDateTime::parse_from_str("2025-07-01 08:00:00", "%Y-%m-%d %H:%M:%S").expect("timestamp")
}

fn remote(version: &str, vigencia_ate: &str) -> RemoteVersion {
    RemoteVersion {
        version: version.to_string(),
        vigencia_ate: vigencia_ate.to_string(),
        valid_until: NaiveDate::parse_from_str(vigencia_ate, DATE_FORMAT).expect("date"),
    }
}

fn record(version: &str, vigencia_ate: &str) -> VersionRecord {
    remote(version, vigencia_ate).into_record(checked_at())
}

#[test]
fn no_persisted_record_always_needs_update() {
    assert!(matches!(
        compare(None, remote("25.2.A", "31/07/2025")),
        UpdateVerdict::NeedsUpdate(_)
    ));
}

#[test]
fn identical_version_and_validity_is_up_to_date() {
    let persisted = record("25.2.A", "31/07/2025");
    assert!(matches!(
        compare(Some(&persisted), remote("25.2.A", "31/07/2025")),
        UpdateVerdict::UpToDate(_)
    ));
}

#[test]
fn same_validity_with_different_version_needs_update() {
    let persisted = record("25.2.B", "31/07/2025");
    assert!(matches!(
        compare(Some(&persisted), remote("25.2.A", "31/07/2025")),
        UpdateVerdict::NeedsUpdate(_)
    ));
}

#[test]
fn later_remote_validity_needs_update() {
    let persisted = record("25.2.A", "31/07/2025");
    assert!(matches!(
        compare(Some(&persisted), remote("25.3.A", "31/12/2025")),
        UpdateVerdict::NeedsUpdate(_)
    ));
}

#[test]
fn earlier_remote_validity_is_up_to_date() {
    let persisted = record("25.2.A", "31/07/2025");
    assert!(matches!(
        compare(Some(&persisted), remote("25.1.A", "30/06/2025")),
        UpdateVerdict::UpToDate(_)
    ));
}

#[test]
fn legacy_bare_date_record_is_normalized() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("last_version_downloaded.txt");
    std::fs::write(&path, "31/07/2025").expect("legacy record");

    let store = VersionStore::new(path);
    let loaded = store.load().expect("load").expect("record");
    assert_eq!(loaded.version, "unknown");
    assert_eq!(loaded.vigencia_ate, "31/07/2025");
    assert_eq!(
        loaded.valid_until(),
        NaiveDate::from_ymd_opt(2025, 7, 31).unwrap()
    );
}

#[test]
fn record_round_trip_preserves_version_and_validity() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = VersionStore::new(tmp.path().join("last_version_downloaded.txt"));
    let record = record("25.2.A", "31/07/2025");

    store.save(&record).expect("save");
    let loaded = store.load().expect("load").expect("record");
    assert_eq!(loaded.version, record.version);
    assert_eq!(loaded.vigencia_ate, record.vigencia_ate);
    assert_eq!(loaded.vigencia_datetime, record.vigencia_datetime);
}

#[test]
fn save_overwrites_the_previous_record() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = VersionStore::new(tmp.path().join("last_version_downloaded.txt"));

    store.save(&record("25.2.A", "31/07/2025")).expect("save");
    store.save(&record("25.3.A", "31/12/2025")).expect("overwrite");

    let loaded = store.load().expect("load").expect("record");
    assert_eq!(loaded.version, "25.3.A");
}

#[test]
fn unreadable_record_is_treated_as_missing() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("last_version_downloaded.txt");
    std::fs::write(&path, "definitely not a version record").expect("garbage");

    let store = VersionStore::new(path);
    assert!(store.load().expect("load").is_none());
}

#[tokio::test]
async fn comparator_reads_the_banner_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<html><body>
                 <div id="popupshadow">Comunicado: Versão 25.2.A, vigente até 31/07/2025.</div>
               </body></html>"#,
        ))
        .mount(&server)
        .await;

    let comparator = VersionComparator::new(&server.uri()).expect("comparator");
    match comparator.check_for_update(None).await.expect("verdict") {
        UpdateVerdict::NeedsUpdate(remote) => {
            assert_eq!(remote.version, "25.2.A");
            assert_eq!(remote.vigencia_ate, "31/07/2025");
        }
        other => panic!("expected NeedsUpdate with no persisted record, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_banner_is_a_distinct_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body>manutenção</body></html>"),
        )
        .mount(&server)
        .await;

    let comparator = VersionComparator::new(&server.uri()).expect("comparator");
    let err = comparator.fetch_remote().await.unwrap_err();
    assert!(matches!(err, VersionError::BannerMissing));
}
