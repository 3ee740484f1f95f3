mod util;

use std::fs;
use std::path::{Path, PathBuf};

use certmass::batch::{BatchReport, collect_entries, install_single, run_batch};
use certmass::error::CertMassError;
use certmass::install::{InstallOutcome, InstallParams, Installer};
use certmass::rename::UserContext;
use certmass::settings::{InstallEntry, Settings};
use util::{MockStore, personal_certificate, write_archive, write_certificate, write_folder_container};

fn seed_pair(store: &MockStore, certs: &Path, stem: &str, thumbprint: &str, fingerprint: &str) {
    let certificate = personal_certificate(thumbprint, "Иванов", "Иван", fingerprint);
    write_certificate(store, &certs.join(format!("{stem}.cer")), &certificate);
    write_folder_container(store, &certs.join(format!("{stem}.000")), fingerprint);
}

#[test]
fn test_settings_items_take_precedence() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    let manifest = dir.path().join("data.csv");
    fs::write(&manifest, "container;cert\nfrom-csv.000;from-csv.cer\n").unwrap();
    let settings = Settings::from_json(
        r#"{ "items": [ { "containerPath": "from-settings.000", "certificatePath": "from-settings.cer" } ] }"#,
    )
    .unwrap();

    let entries = collect_entries(&settings, &manifest, dir.path(), &store).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].container_path, "from-settings.000");
}

#[test]
fn test_manifest_used_when_no_items() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    seed_pair(&store, dir.path(), "discovered", "AA01", "1111111111111111");
    let manifest = dir.path().join("data.csv");
    fs::write(&manifest, "# manifest\npfx;cert;password\nfrom-csv.pfx;from-csv.cer;1234\n").unwrap();

    let entries = collect_entries(&Settings::default(), &manifest, dir.path(), &store).unwrap();

    assert_eq!(
        entries,
        vec![InstallEntry {
            container_path: "from-csv.pfx".into(),
            certificate_path: "from-csv.cer".into(),
            pfx_password: Some("1234".into()),
            ..InstallEntry::default()
        }]
    );
}

#[test]
fn test_discovery_when_no_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    seed_pair(&store, dir.path(), "ivanov", "AA01", "1111111111111111");

    let entries = collect_entries(&Settings::default(), &dir.path().join("data.csv"), dir.path(), &store).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].container_path, "ivanov.000");
    assert_eq!(entries[0].certificate_path, "ivanov.cer");
}

#[test]
fn test_malformed_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    let manifest = dir.path().join("data.csv");
    fs::write(&manifest, "container;name\na.000;x\n").unwrap();

    let result = collect_entries(&Settings::default(), &manifest, dir.path(), &store);

    assert!(matches!(result, Err(CertMassError::Manifest(_))));
}

#[test]
fn test_batch_continues_past_failures() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    let user = UserContext::new("ivanov");
    seed_pair(&store, dir.path(), "first", "AA01", "1111111111111111");
    seed_pair(&store, dir.path(), "second", "BB02", "2222222222222222");
    let entries = vec![
        InstallEntry {
            container_path: "missing.000".into(),
            certificate_path: "first.cer".into(),
            ..InstallEntry::default()
        },
        InstallEntry {
            container_path: "first.000".into(),
            certificate_path: "first.cer".into(),
            ..InstallEntry::default()
        },
        InstallEntry {
            container_path: "second.000".into(),
            certificate_path: "second.cer".into(),
            ..InstallEntry::default()
        },
        InstallEntry {
            container_path: "first.000".into(),
            certificate_path: "first.cer".into(),
            ..InstallEntry::default()
        },
    ];
    let installer = Installer::new(&store, &user, dir.path().join("keys"));

    let report = run_batch(&installer, &store, &entries, &Settings::default().default, dir.path());

    assert_eq!(
        report,
        BatchReport {
            installed: 2,
            already_installed: 1,
            failed: 1,
        }
    );
    assert_eq!(store.calls("absorb_certificates"), 1);
}

#[test]
fn test_batch_applies_default_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    let user = UserContext::new("ivanov");
    seed_pair(&store, dir.path(), "ivanov", "AA01", "1111111111111111");
    let settings = Settings::from_json(r##"{ "default": { "namePattern": "#subject.surname" } }"##).unwrap();
    let entries = vec![InstallEntry {
        container_path: "ivanov.000".into(),
        certificate_path: "ivanov.cer".into(),
        ..InstallEntry::default()
    }];
    let installer = Installer::new(&store, &user, dir.path().join("keys"));

    run_batch(&installer, &store, &entries, &settings.default, dir.path());

    assert_eq!(store.container_names(), vec![r"\\.\HDIMAGE\Иванов".to_string()]);
}

#[test]
fn test_install_single_resolves_against_certs_dir() {
    let dir = tempfile::tempdir().unwrap();
    let certs = dir.path().join("certs");
    let store = MockStore::new();
    let user = UserContext::new("ivanov");
    let certificate = personal_certificate("AA01", "Иванов", "Иван", "1111111111111111");
    write_certificate(&store, &certs.join("ivanov.cer"), &certificate);
    write_archive(&dir.path().join("ivanov.pfx"));
    let installer = Installer::new(&store, &user, dir.path().join("keys"));
    let params = InstallParams::builder()
        .container_path("ivanov.pfx")
        .certificate_path("ivanov.cer")
        .pfx_password("1234")
        .build();

    let outcome = install_single(&installer, &store, &certs, &params).unwrap();

    assert!(matches!(outcome, InstallOutcome::Installed(_)));
    assert_eq!(store.calls("install_from_archive"), 1);
    assert_eq!(store.calls("absorb_certificates"), 1);
}

#[test]
fn test_install_single_requires_paths() {
    let dir = tempfile::tempdir().unwrap();
    let store = MockStore::new();
    let user = UserContext::new("ivanov");
    let installer = Installer::new(&store, &user, dir.path().to_path_buf());

    let params = InstallParams::builder()
        .container_path("ivanov.000")
        .certificate_path(PathBuf::new())
        .build();
    assert!(matches!(
        install_single(&installer, &store, dir.path(), &params),
        Err(CertMassError::MissingParameter(ref what)) if what == "certificate"
    ));

    let params = InstallParams::builder()
        .container_path("absent.000")
        .certificate_path("absent.cer")
        .build();
    assert!(matches!(
        install_single(&installer, &store, dir.path(), &params),
        Err(CertMassError::NotFound(_))
    ));
    assert_eq!(store.calls("absorb_certificates"), 0);
}
