use std::sync::Arc;

use armada_control_plane::{
    db::MemoryStore,
    formation::ProcessQuantityMap,
    jobs::{JobId, JobStatus},
    manager::ManagerConfig,
    model::{App, Image, ProcessCommands, Release},
    scheduler::{FakeScheduler, SchedulerOp},
    slugs::StaticExtractor,
    Error, Platform,
};
use armada_id::{AppName, ReleaseVersion};

const V1: &str = "remind101/acme-inc:v1";
const V2: &str = "remind101/acme-inc:v2";

fn commands(types: &[&str]) -> ProcessCommands {
    types
        .iter()
        .map(|t| (t.to_string(), format!("./bin/{t}")))
        .collect()
}

fn image(s: &str) -> Image {
    s.parse().unwrap()
}

fn quantities(pairs: &[(&str, u32)]) -> ProcessQuantityMap {
    pairs.iter().map(|(t, q)| (t.to_string(), *q)).collect()
}

struct Harness {
    platform: Platform,
    scheduler: Arc<FakeScheduler>,
    app: App,
}

impl Harness {
    async fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info,armada_control_plane=debug".into()),
            )
            .with_test_writer()
            .try_init();

        let scheduler = Arc::new(FakeScheduler::new());
        let extractor = StaticExtractor::new(commands(&["web"]))
            .with_image(image(V2), commands(&["web", "worker"]));
        let platform = Platform::new(
            Arc::new(MemoryStore::new()),
            scheduler.clone(),
            Arc::new(extractor),
            ManagerConfig::default(),
        );

        let app = platform
            .apps_create(AppName::parse("web-app").unwrap())
            .await
            .unwrap();

        Self {
            platform,
            scheduler,
            app,
        }
    }

    async fn release(&self, image_ref: &str) -> Release {
        self.platform
            .releases_create_from_image(&self.app, &image(image_ref), "deploy")
            .await
            .unwrap()
    }

    fn job(&self, version: u32, process_type: &str, index: u32) -> JobId {
        JobId::new(
            self.app.name.clone(),
            ReleaseVersion::new(version),
            process_type,
            index,
        )
    }

    async fn running(&self) -> Vec<String> {
        self.scheduler
            .running_jobs()
            .await
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

#[tokio::test]
async fn web_app_scales_up_and_reports_running_jobs() {
    let h = Harness::new().await;
    let release = h.release(V1).await;
    assert_eq!(release.version, ReleaseVersion::FIRST);
    assert_eq!(release.formation.quantity("web"), 1);

    let outcome = h
        .platform
        .scale(&release, &quantities(&[("web", 3)]))
        .await
        .unwrap();
    assert_eq!(outcome.formation.quantity("web"), 3);

    let states = h.platform.job_states_by_app(&h.app.name).await.unwrap();
    let indices: Vec<u32> = states.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert!(states.iter().all(|s| s.process_type == "web"));
    assert!(states.iter().all(|s| s.status == JobStatus::Running));
    assert!(states
        .iter()
        .all(|s| s.command.as_deref() == Some("./bin/web")));
}

#[tokio::test]
async fn scale_down_removes_highest_indices_first() {
    let h = Harness::new().await;
    let release = h.release(V1).await;
    h.platform
        .scale(&release, &quantities(&[("web", 3)]))
        .await
        .unwrap();
    h.scheduler.clear_operations().await;

    h.platform
        .scale(&release, &quantities(&[("web", 1)]))
        .await
        .unwrap();

    assert_eq!(
        h.scheduler.operations().await,
        vec![
            SchedulerOp::Unschedule(h.job(1, "web", 2)),
            SchedulerOp::Unschedule(h.job(1, "web", 1)),
        ]
    );
    assert_eq!(h.running().await, vec!["web-app.v1.web.0"]);
}

#[tokio::test]
async fn unknown_process_type_is_rejected_without_scheduler_calls() {
    let h = Harness::new().await;
    let release = h.release(V1).await;

    let err = h
        .platform
        .scale(&release, &quantities(&[("worker", 2)]))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(ref msg) if msg.contains("worker")));
    assert!(h.scheduler.operations().await.is_empty());
}

#[tokio::test]
async fn repeating_a_scale_is_a_noop() {
    let h = Harness::new().await;
    let release = h.release(V1).await;

    let first = h
        .platform
        .scale(&release, &quantities(&[("web", 2)]))
        .await
        .unwrap();
    h.scheduler.clear_operations().await;

    let second = h
        .platform
        .scale(&release, &quantities(&[("web", 2)]))
        .await
        .unwrap();

    assert!(h.scheduler.operations().await.is_empty());
    assert_eq!(first.seq, second.seq);
    assert_eq!(first.formation, second.formation);
}

#[tokio::test]
async fn scale_up_fills_indices_without_gaps() {
    let h = Harness::new().await;
    let release = h.release(V1).await;

    for count in [2, 1, 4] {
        h.platform
            .scale(&release, &quantities(&[("web", count)]))
            .await
            .unwrap();
    }

    assert_eq!(
        h.running().await,
        vec![
            "web-app.v1.web.0",
            "web-app.v1.web.1",
            "web-app.v1.web.2",
            "web-app.v1.web.3",
        ]
    );
}

#[tokio::test]
async fn lost_instance_is_rescheduled() {
    let h = Harness::new().await;
    let release = h.release(V1).await;
    h.platform
        .scale(&release, &quantities(&[("web", 3)]))
        .await
        .unwrap();

    assert!(h.scheduler.lose_job(&h.job(1, "web", 1)).await);
    h.scheduler.clear_operations().await;

    h.platform
        .scale(&release, &quantities(&[("web", 3)]))
        .await
        .unwrap();

    assert_eq!(
        h.scheduler.operations().await,
        vec![SchedulerOp::Schedule(h.job(1, "web", 1))]
    );
    assert_eq!(h.running().await.len(), 3);
}

#[tokio::test]
async fn failed_repair_is_not_recorded_as_running() {
    let h = Harness::new().await;
    let release = h.release(V1).await;
    h.platform
        .scale(&release, &quantities(&[("web", 3)]))
        .await
        .unwrap();

    let lost = h.job(1, "web", 1);
    assert!(h.scheduler.lose_job(&lost).await);
    h.scheduler.fail_schedule_of(lost.clone()).await;

    let err = h
        .platform
        .scale(&release, &quantities(&[("web", 3)]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Scheduler(_)));

    // Only web.0 and web.2 run, so the contiguous count is 1.
    assert_eq!(h.running().await, vec!["web-app.v1.web.0", "web-app.v1.web.2"]);
    let formation = h.platform.processes_all(&release).await.unwrap();
    assert_eq!(formation.quantity("web"), 1);

    h.scheduler.clear_failures().await;
    h.scheduler.clear_operations().await;
    let outcome = h
        .platform
        .scale(&release, &quantities(&[("web", 3)]))
        .await
        .unwrap();

    assert_eq!(h.scheduler.operations().await, vec![SchedulerOp::Schedule(lost)]);
    assert_eq!(outcome.formation.quantity("web"), 3);
}

#[tokio::test]
async fn deploy_replaces_jobs_of_previous_release() {
    let h = Harness::new().await;
    let v1 = h.release(V1).await;
    h.platform
        .scale(&v1, &quantities(&[("web", 2)]))
        .await
        .unwrap();

    let v2 = h.release(V2).await;
    assert_eq!(v2.version, ReleaseVersion::new(2));
    assert_eq!(v2.formation.quantity("web"), 2);
    assert_eq!(v2.formation.quantity("worker"), 0);
    h.scheduler.clear_operations().await;

    h.platform.scale(&v2, &ProcessQuantityMap::new()).await.unwrap();

    assert_eq!(
        h.scheduler.operations().await,
        vec![
            SchedulerOp::Schedule(h.job(2, "web", 0)),
            SchedulerOp::Schedule(h.job(2, "web", 1)),
            SchedulerOp::Unschedule(h.job(1, "web", 1)),
            SchedulerOp::Unschedule(h.job(1, "web", 0)),
        ]
    );

    let states = h.platform.job_states_by_app(&h.app.name).await.unwrap();
    assert!(states
        .iter()
        .all(|s| s.current_release == Some(ReleaseVersion::new(2))));
    assert_eq!(
        h.platform.processes_all(&v2).await.unwrap().quantity("web"),
        2
    );
}

#[tokio::test]
async fn failed_stop_keeps_old_job_and_is_retried() {
    let h = Harness::new().await;
    let v1 = h.release(V1).await;
    h.platform
        .scale(&v1, &quantities(&[("web", 2)]))
        .await
        .unwrap();
    let v2 = h.release(V2).await;

    h.scheduler.fail_unschedule_of(h.job(1, "web", 0)).await;
    let err = h
        .platform
        .scale(&v2, &quantities(&[("worker", 1)]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Scheduler(_)));

    // The new jobs started and are recorded; v1.web.0 is still known.
    let formation = h.platform.processes_all(&v2).await.unwrap();
    assert_eq!(formation.quantity("web"), 2);
    assert_eq!(formation.quantity("worker"), 1);
    assert!(h.running().await.contains(&"web-app.v1.web.0".to_string()));

    h.scheduler.clear_failures().await;
    h.scheduler.clear_operations().await;
    h.platform.scale(&v2, &ProcessQuantityMap::new()).await.unwrap();

    assert_eq!(
        h.scheduler.operations().await,
        vec![SchedulerOp::Unschedule(h.job(1, "web", 0))]
    );
}

#[tokio::test]
async fn partial_scale_up_records_what_started() {
    let h = Harness::new().await;
    let release = h.release(V1).await;
    h.scheduler.fail_schedule_of(h.job(1, "web", 1)).await;

    let err = h
        .platform
        .scale(&release, &quantities(&[("web", 3)]))
        .await
        .unwrap_err();
    assert!(!err.is_retryable());

    let formation = h.platform.processes_all(&release).await.unwrap();
    assert_eq!(formation.quantity("web"), 1);

    h.scheduler.clear_failures().await;
    h.platform
        .scale(&release, &quantities(&[("web", 3)]))
        .await
        .unwrap();
    assert_eq!(h.running().await.len(), 3);
}

#[tokio::test]
async fn destroying_an_app_stops_its_jobs() {
    let h = Harness::new().await;
    let release = h.release(V1).await;
    h.platform
        .scale(&release, &quantities(&[("web", 2)]))
        .await
        .unwrap();

    h.platform.apps_destroy(&h.app.name).await.unwrap();

    assert!(h.running().await.is_empty());
    assert!(h.platform.apps_all().await.unwrap().is_empty());
    assert!(h
        .platform
        .releases_find_by_app(&h.app.name)
        .await
        .unwrap()
        .is_empty());
}
