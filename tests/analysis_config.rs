use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use deepsecure::config::AnalysisConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "DEEPSECURE_CONFIG",
        "DEEPSECURE_DB_PATH",
        "DEEPSECURE_CASCADE_PATH",
        "DEEPSECURE_SAMPLE_INTERVAL",
        "DEEPSECURE_WORKERS",
        "DEEPSECURE_TIMEOUT_SECS",
        "DEEPSECURE_SCORER_SEED",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "db_path": "prod_users.db",
        "detector": {
            "cascade_path": "/models/frontal.xml",
            "scale_factor": 1.2,
            "min_neighbors": 6,
            "min_size": 30
        },
        "sampling": { "interval_secs": 2.5 },
        "contact_sheet": { "max_columns": 3, "thumbnail_width": 200 },
        "pipeline": { "workers": 2, "timeout_secs": 10 },
        "scorer": { "seed": 5 }
    }"#;
    file.write_all(json.as_bytes()).expect("write config");

    std::env::set_var("DEEPSECURE_CONFIG", file.path());
    std::env::set_var("DEEPSECURE_WORKERS", "8");
    std::env::set_var("DEEPSECURE_SCORER_SEED", "99");

    let cfg = AnalysisConfig::load().expect("load config");

    assert_eq!(cfg.db_path, "prod_users.db");
    assert_eq!(cfg.cascade_path.to_str(), Some("/models/frontal.xml"));
    assert_eq!(cfg.detection.scale_factor, 1.2);
    assert_eq!(cfg.detection.min_neighbors, 6);
    assert_eq!(cfg.detection.min_size, 30);
    assert_eq!(cfg.interval_secs, 2.5);
    assert_eq!(cfg.max_columns, 3);
    assert_eq!(cfg.thumbnail_width, 200);
    assert_eq!(cfg.workers, 8);
    assert_eq!(cfg.timeout, Some(Duration::from_secs(10)));
    assert_eq!(cfg.scorer_seed, Some(99));

    let options = cfg.pipeline_options();
    assert_eq!(options.workers, 8);
    assert_eq!(cfg.contact_sheet_builder().max_columns(), 3);

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
db_path = "toml_users.db"

[sampling]
interval_secs = 4.0

[pipeline]
timeout_secs = 0
"#;
    file.write_all(toml.as_bytes()).expect("write config");

    std::env::set_var("DEEPSECURE_CONFIG", file.path());
    std::env::set_var("DEEPSECURE_DB_PATH", "override.db");

    let cfg = AnalysisConfig::load().expect("load config");
    assert_eq!(cfg.db_path, "override.db");
    assert_eq!(cfg.interval_secs, 4.0);
    assert_eq!(cfg.timeout, None);
    assert_eq!(cfg.max_columns, 4);
    assert_eq!(cfg.scorer_seed, None);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DEEPSECURE_SAMPLE_INTERVAL", "soon");
    assert!(AnalysisConfig::load().is_err());
    clear_env();

    std::env::set_var("DEEPSECURE_SAMPLE_INTERVAL", "-2");
    assert!(AnalysisConfig::load().is_err());
    clear_env();

    std::env::set_var("DEEPSECURE_TIMEOUT_SECS", "1e300");
    let err = AnalysisConfig::load().unwrap_err();
    assert!(err.to_string().contains("DEEPSECURE_TIMEOUT_SECS"), "{}", err);
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(br#"{ "detector": { "scale_factor": 1.0 } }"#)
        .expect("write config");
    std::env::set_var("DEEPSECURE_CONFIG", file.path());
    assert!(AnalysisConfig::load().is_err());

    clear_env();
}
