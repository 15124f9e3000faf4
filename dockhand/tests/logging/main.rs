//! Per-run log file tests
//!
//! Kept in their own binary: `init_logging` installs the global subscriber.

use dockhand::logs::{init_logging, LogLevel, LogOptions};
use tracing::{debug, error, info, warn};

#[test]
fn test_run_log_mirrors_console_lines() {
    let dir = tempfile::tempdir().unwrap();
    let guard = init_logging(LogOptions {
        log_level: LogLevel::Info,
        ansi: true,
        log_dir: dir.path().join("logs"),
    })
    .unwrap();
    let path = guard.path().to_path_buf();

    info!("==> [1/8] Parameter collection");
    debug!("below the configured level");
    warn!("Validation: http://203.0.113.7/ answered 502");
    error!("not fatal here");
    info!("Deployment completed successfully");
    drop(guard);

    let file_name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("deploy_"));
    assert!(file_name.ends_with(".log"));
    assert_eq!(path.parent(), Some(dir.path().join("logs").as_path()));

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(!contents.contains('\u{1b}'), "log file contains ANSI codes");
    assert!(!contents.contains("below the configured level"));

    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with('['));
    assert!(lines[0].ends_with("] [INFO] ==> [1/8] Parameter collection"));
    assert!(lines[1].contains("] [WARN] Validation: http://203.0.113.7/ answered 502"));
    assert!(lines[2].contains("] [ERROR] not fatal here"));
    assert!(lines[3].ends_with("] [INFO] Deployment completed successfully"));
}
