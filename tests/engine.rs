mod support;

use anyhow::Result;
use ftpmirror::engine::{
    EngineHandle, MirrorEngine, SessionOptions, Step, STATUS_FINISHED, STATUS_MEASURING,
    STATUS_PENDING, STATUS_PREPARING, STATUS_SEARCHING, STATUS_WAITING,
};
use ftpmirror::events::{Dashboard, MirrorEvent};
use ftpmirror::logger::TextLogger;
use ftpmirror::signal::Pacing;
use ftpmirror::MirrorError;
use std::path::Path;
use std::sync::Arc;
use support::{remote_mtime, MemorySite, RecordingObserver};

fn options(root: &Path, auto_close: bool) -> SessionOptions {
    SessionOptions {
        host: "ftp.example.com".into(),
        local_root: root.to_path_buf(),
        sub_dir: None,
        auto_close,
    }
}

fn scenario_site() -> MemorySite {
    MemorySite::new().with_file("a.txt", 100).with_file("d/b.txt", 924)
}

fn run_recorded(
    site: MemorySite,
    options: SessionOptions,
) -> (ftpmirror::Result<ftpmirror::MirrorSession>, Arc<RecordingObserver>) {
    let engine = MirrorEngine::new(site, options).with_pacing(Pacing::immediate());
    let observer = Arc::new(RecordingObserver::default());
    engine.bus().subscribe(observer.clone());
    engine.signals().start();
    (engine.run(), observer)
}

#[test]
fn mirrors_small_tree_with_progress() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let (result, observer) = run_recorded(scenario_site(), options(dst.path(), true));
    let session = result?;

    assert_eq!(std::fs::read(dst.path().join("a.txt"))?, support::content(100));
    assert_eq!(std::fs::read(dst.path().join("d").join("b.txt"))?, support::content(924));
    assert_eq!(
        std::fs::metadata(dst.path().join("d").join("b.txt"))?.modified()?,
        remote_mtime()
    );
    // Writing b.txt moved the directory time; the engine puts it back
    assert_eq!(std::fs::metadata(dst.path().join("d"))?.modified()?, remote_mtime());
    assert_eq!(session.step, Step::Finished);
    assert_eq!(session.total_bytes, 1024);
    assert!(session.files.iter().all(|f| f.is_finished()));

    let progress = observer.progress();
    let last = progress.last().unwrap();
    assert_eq!(last.maximum_size, "1024.00 B");
    assert_eq!(last.current_size, "1024.00 B");
    assert_eq!(last.percent, 100.0);

    let percents: Vec<f64> = progress.iter().map(|p| p.percent).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
    assert!(percents.iter().all(|p| *p <= 100.0));
    assert_eq!(progress[0].current_size, "0 KB");
    assert_eq!(progress[0].maximum_size, "0 KB");
    Ok(())
}

#[test]
fn statuses_follow_the_steps() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let (result, observer) = run_recorded(scenario_site(), options(dst.path(), true));
    result?;
    assert_eq!(
        observer.statuses(),
        vec![
            STATUS_WAITING.to_string(),
            STATUS_SEARCHING.to_string(),
            STATUS_PENDING.to_string(),
            STATUS_MEASURING.to_string(),
            STATUS_PREPARING.to_string(),
            "Download: a.txt".to_string(),
            "Download: b.txt".to_string(),
            STATUS_FINISHED.to_string(),
        ]
    );
    let events = observer.events();
    assert_eq!(events[0], MirrorEvent::Title("Site: ftp.example.com".into()));
    assert_eq!(events.last(), Some(&MirrorEvent::Finished));
    Ok(())
}

#[test]
fn roster_is_published_in_discovery_order() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let site = MemorySite::new()
        .with_file("z.txt", 10)
        .with_file("b/inner.txt", 10)
        .with_file("a/deep/x.txt", 10)
        .with_file("a/y.txt", 10);
    let (result, observer) = run_recorded(site, options(dst.path(), true));
    result?;

    let mut dashboard = Dashboard::new();
    for event in observer.events() {
        dashboard.apply(&event);
    }
    let order: Vec<_> = dashboard.roster.iter().map(|r| r.relative_path.as_str()).collect();
    assert_eq!(order, ["z.txt", "a/y.txt", "a/deep/x.txt", "b/inner.txt"]);
    assert_eq!(dashboard.finished_files(), 4);
    assert!(dashboard.finished);
    assert!(dst.path().join("a").join("deep").join("x.txt").is_file());
    Ok(())
}

#[test]
fn finished_notification_requires_auto_close() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let (result, observer) = run_recorded(scenario_site(), options(dst.path(), false));
    result?;
    assert_eq!(observer.count(|e| matches!(e, MirrorEvent::Finished)), 0);
    assert_eq!(observer.statuses().last().map(String::as_str), Some(STATUS_FINISHED));
    Ok(())
}

#[test]
fn empty_tree_fails_at_measure() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let site = MemorySite::new().with_dir("empty");
    let (result, observer) = run_recorded(site, options(dst.path(), true));
    assert!(matches!(result, Err(MirrorError::NoMatchingUnit(0))));
    assert_eq!(observer.count(|e| matches!(e, MirrorEvent::Failed(_))), 1);
    assert_eq!(observer.count(|e| matches!(e, MirrorEvent::Finished)), 0);
    Ok(())
}

#[test]
fn interrupted_download_is_reported_once() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let mut site = scenario_site();
    site.broken = Some("d/b.txt".into());
    let (result, observer) = run_recorded(site, options(dst.path(), true));

    assert!(matches!(result, Err(MirrorError::Transfer(_))));
    let failures: Vec<_> = observer
        .events()
        .into_iter()
        .filter_map(|e| match e {
            MirrorEvent::Failed(msg) => Some(msg),
            _ => None,
        })
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("d/b.txt"));
    // The first file made it before the failure
    assert!(dst.path().join("a.txt").is_file());
    Ok(())
}

#[test]
fn missing_sub_dir_fails_enumeration() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let mut opts = options(dst.path(), true);
    opts.sub_dir = Some("nope".into());
    let (result, _) = run_recorded(scenario_site(), opts);
    let err = result.unwrap_err();
    assert!(err.is_connection());
    Ok(())
}

#[test]
fn sub_dir_is_mirrored_relative_to_itself() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let site = MemorySite::new()
        .with_file("pub/readme.txt", 50)
        .with_file("pub/docs/guide.txt", 70)
        .with_file("private.txt", 5);
    let mut opts = options(dst.path(), true);
    opts.sub_dir = Some("pub".into());
    let (result, _) = run_recorded(site, opts);
    let session = result?;
    assert_eq!(session.total_bytes, 120);
    assert!(dst.path().join("readme.txt").is_file());
    assert!(dst.path().join("docs").join("guide.txt").is_file());
    assert!(!dst.path().join("private.txt").exists());
    Ok(())
}

#[test]
fn cancel_before_start_ends_without_failure() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let engine = MirrorEngine::new(scenario_site(), options(dst.path(), true))
        .with_pacing(Pacing::immediate());
    let observer = Arc::new(RecordingObserver::default());
    engine.bus().subscribe(observer.clone());
    let handle = EngineHandle::spawn(engine)?;
    handle.cancel();
    assert!(matches!(handle.join(), Err(MirrorError::Cancelled)));
    assert_eq!(observer.count(|e| matches!(e, MirrorEvent::Failed(_))), 0);
    assert!(!dst.path().join("a.txt").exists());
    Ok(())
}

#[test]
fn handle_runs_engine_on_its_own_thread() -> Result<()> {
    let dst = tempfile::tempdir()?;
    let log = dst.path().join("session.log");
    let engine = MirrorEngine::new(scenario_site(), options(&dst.path().join("out"), true))
        .with_pacing(Pacing::immediate())
        .with_logger(Arc::new(TextLogger::new(&log)?));
    let events = engine.bus().subscribe_queued(256);
    let handle = EngineHandle::spawn(engine)?;
    handle.start();

    // Drain like a front end would; the channel closes when the engine ends
    let mut dashboard = Dashboard::new();
    for event in events.iter() {
        dashboard.apply(&event);
    }
    let session = handle.join()?;
    assert_eq!(session.files.len(), 2);
    assert!(dashboard.finished);
    assert_eq!(dashboard.finished_files(), 2);
    assert_eq!(dashboard.progress.current_size, "1024.00 B");

    let text = std::fs::read_to_string(&log)?;
    assert!(text.contains("START site=ftp.example.com"));
    assert!(text.contains("LIST files=2 dirs=1"));
    assert!(text.contains("DONE files=2 bytes=1024"));
    Ok(())
}
