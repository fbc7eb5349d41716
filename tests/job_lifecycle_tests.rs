mod common;

use chrono::Utc;
use common::*;
use quality_jobs::core::jobs::JobHealth;
use quality_jobs::core::scheduler::{TriggerAdapter, TriggerState};
use quality_jobs::domain::entities::{JobInstance, JobType, SessionState};
use quality_jobs::domain::repositories::{JobInstanceRepository, JobRepository};
use quality_jobs::{AppError, JobErrorCode};

fn identity(job: &quality_jobs::domain::entities::JobDefinition) -> (String, String) {
    let (name, group) = job.scheduler_identity().unwrap();
    (name.to_string(), group.to_string())
}

#[tokio::test]
async fn test_add_assigns_identity_and_schedules() {
    let env = TestEnvironment::new();
    let job = env.add_job("orders_accuracy").await;

    let (name, group) = identity(&job);
    assert!(name.starts_with("orders_accuracy_"));
    assert_eq!(group, "simple");
    assert_eq!(job.metric_name.as_deref(), Some("orders_accuracy"));
    assert!(env.context.adapter.exists(&name, &group).await.unwrap());
    assert_eq!(env.stored_job(&job).await, job);

    let state = env
        .context
        .operator
        .get_state(&job, "query")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.state, "NORMAL");
    assert!(!state.can_start);
    assert!(state.can_stop);
    assert!(state.next_fire_time > 0);
    assert_eq!(state.previous_fire_time, -1);
}

#[tokio::test]
async fn test_src_tgt_admission_scenario() {
    let env = TestEnvironment::new();
    let measure = env.measure(&["src", "tgt"]).await;
    let service = &env.context.service;

    let ok = JobBuilder::new("ok_job")
        .measure(measure.id)
        .segments(&[("src", true), ("tgt", false)])
        .build();
    assert!(service.add_job(ok).await.is_ok());

    let no_baseline = JobBuilder::new("no_baseline")
        .measure(measure.id)
        .segments(&[("src", false), ("tgt", false)])
        .build();
    let err = service.add_job(no_baseline).await.unwrap_err();
    assert_eq!(err.error_code(), Some(JobErrorCode::MissingBaselineConfig));

    let duplicate = JobBuilder::new("duplicate")
        .measure(measure.id)
        .segments(&[("src", true), ("src", false)])
        .build();
    let err = service.add_job(duplicate).await.unwrap_err();
    assert_eq!(err.error_code(), Some(JobErrorCode::InvalidConnectorName));
}

#[tokio::test]
async fn test_rejected_jobs_leave_nothing_behind() {
    let env = TestEnvironment::new();
    let measure = env.measure(&["src", "tgt"]).await;

    let rejected = vec![
        JobBuilder::new("no_baseline").segments(&[("src", false)]),
        JobBuilder::new("unknown").segments(&[("src", true), ("other", false)]),
        JobBuilder::new("duplicate").segments(&[("tgt", true), ("tgt", false)]),
        JobBuilder::new("bad.name"),
    ];
    for builder in rejected {
        let err = env
            .context
            .service
            .add_job(builder.measure(measure.id).build())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    assert!(env.jobs.inner.all().await.is_empty());
    assert_eq!(env.engine.inner.job_count().await, 0);
}

#[tokio::test]
async fn test_unusable_repeat_interval_is_rejected() {
    let env = TestEnvironment::new();
    let measure = env.measure(&["src", "tgt"]).await;

    for interval_seconds in [0, 100_000_000_000_000_000, u64::MAX] {
        let err = env
            .context
            .service
            .add_job(
                JobBuilder::new("orders")
                    .measure(measure.id)
                    .interval_seconds(interval_seconds)
                    .build(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::BadRequest(JobErrorCode::InvalidJobSchedule)
        ));
    }

    assert!(env.jobs.inner.all().await.is_empty());
    assert_eq!(env.engine.inner.job_count().await, 0);
}

#[tokio::test]
async fn test_add_requires_existing_measure_and_free_name() {
    let env = TestEnvironment::new();
    let err = env
        .context
        .service
        .add_job(JobBuilder::new("orphan").build())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::NotFound(JobErrorCode::MeasureIdDoesNotExist)
    ));

    env.add_job("orders").await;
    let measure = env.measure(&["src", "tgt"]).await;
    let err = env
        .context
        .service
        .add_job(JobBuilder::new("orders").measure(measure.id).build())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), Some(JobErrorCode::InvalidJobName));
    assert_eq!(env.engine.inner.job_count().await, 1);
}

#[tokio::test]
async fn test_concurrent_adds_of_one_name_admit_one_job() {
    let env = TestEnvironment::new();
    let measure = env.measure(&["src", "tgt"]).await;
    let service = env.context.service.clone();

    let first = service.add_job(JobBuilder::new("orders").measure(measure.id).build());
    let second = service.add_job(JobBuilder::new("orders").measure(measure.id).build());
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
    assert_eq!(env.jobs.count_alive_by_name("orders").await.unwrap(), 1);
}

#[tokio::test]
async fn test_start_requires_paused_trigger() {
    let env = TestEnvironment::new();
    let operator = &env.context.operator;
    let job = env.add_job("orders").await;

    let err = operator.start(&job).await.unwrap_err();
    assert_eq!(err.error_code(), Some(JobErrorCode::JobIsNotInPausedStatus));

    operator.stop(&job).await.unwrap();
    let state = operator.get_state(&job, "stop").await.unwrap().unwrap();
    assert_eq!(state.state, "PAUSED");
    assert!(state.can_start);
    assert!(!state.can_stop);

    operator.start(&job).await.unwrap();
    let state = operator.get_state(&job, "start").await.unwrap().unwrap();
    assert_eq!(state.state, "NORMAL");
    assert!(!env.stored_job(&job).await.deleted);
}

#[tokio::test]
async fn test_start_on_unscheduled_job() {
    let env = TestEnvironment::new();
    let job = env.add_job("orders").await;
    let (name, group) = identity(&job);
    env.context.adapter.delete(&name, &group).await.unwrap();

    let err = env.context.operator.start(&job).await.unwrap_err();
    assert_eq!(err.error_code(), Some(JobErrorCode::JobIsNotScheduled));

    let mut never_admitted = JobBuilder::new("draft").build();
    never_admitted.trigger_group = Some("simple".to_string());
    let err = env.context.operator.start(&never_admitted).await.unwrap_err();
    assert_eq!(err.error_code(), Some(JobErrorCode::JobIsNotScheduled));
}

#[tokio::test]
async fn test_start_scheduler_failure_is_service_error() {
    let env = TestEnvironment::new();
    let job = env.add_job("orders").await;
    env.context.operator.stop(&job).await.unwrap();

    env.engine.fail(EngineOp::ResumeJob).await;
    let err = env.context.operator.start(&job).await.unwrap_err();
    assert!(matches!(err, AppError::ServiceError { .. }));
    assert_eq!(err.to_string(), "Failed to start job.");
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let env = TestEnvironment::new();
    let operator = &env.context.operator;
    let job = env.add_job("orders").await;

    let deleted = operator.delete(&job).await.unwrap();
    assert!(deleted.deleted);
    let deleted = operator.delete(&deleted).await.unwrap();
    assert!(deleted.deleted);
    assert!(env.stored_job(&job).await.deleted);

    let (name, group) = identity(&job);
    assert_eq!(
        env.context.adapter.state(&name, &group).await.unwrap(),
        TriggerState::Paused
    );
}

#[tokio::test]
async fn test_stop_and_delete_of_missing_trigger() {
    let env = TestEnvironment::new();
    let job = env.add_job("orders").await;
    let (name, group) = identity(&job);
    env.context.adapter.delete(&name, &group).await.unwrap();

    let stopped = env.context.operator.stop(&job).await.unwrap();
    assert!(!stopped.deleted);

    let err = env.context.operator.delete(&job).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::NotFound(JobErrorCode::JobKeyDoesNotExist)
    ));
    assert!(!env.stored_job(&job).await.deleted);
}

#[tokio::test]
async fn test_delete_closes_pending_predicates() {
    let env = TestEnvironment::new();
    let job = env.add_job("orders").await;
    let adapter: &TriggerAdapter = &env.context.adapter;

    let mut finding = JobInstance::new(job.id, "orders", "orders_p1", "PG", Utc::now());
    finding.created_at = Utc::now() - chrono::Duration::seconds(30);
    adapter
        .schedule_predicate(&finding, Utc::now(), chrono::Duration::seconds(300), 12)
        .await
        .unwrap();

    let mut running = JobInstance::new(job.id, "orders", "orders_p2", "PG", Utc::now());
    running.state = SessionState::Running;
    running.created_at = Utc::now() - chrono::Duration::seconds(20);

    let mut closed = JobInstance::new(job.id, "orders", "orders_p3", "PG", Utc::now());
    closed.state = SessionState::Finding;
    closed.predicate_deleted = true;
    closed.created_at = Utc::now() - chrono::Duration::seconds(10);

    for instance in [&finding, &running, &closed] {
        env.instances.save(instance).await.unwrap();
    }

    env.context.operator.delete(&job).await.unwrap();

    let finding = env.instances.find_by_id(finding.id).await.unwrap().unwrap();
    assert!(finding.predicate_deleted);
    assert_eq!(finding.state, SessionState::NotFound);
    assert!(!adapter.exists("orders_p1", "PG").await.unwrap());

    let running = env.instances.find_by_id(running.id).await.unwrap().unwrap();
    assert!(running.predicate_deleted);
    assert_eq!(running.state, SessionState::Running);

    let untouched = env.instances.find_by_id(closed.id).await.unwrap().unwrap();
    assert_eq!(untouched, closed);
}

#[tokio::test]
async fn test_one_shot_run() {
    let env = TestEnvironment::new();
    let job = env.add_job("orders").await;
    let (name, group) = identity(&job);

    env.context.service.trigger_once(job.id).await.unwrap();
    let triggers = env.context.adapter.triggers(&name, &group).await.unwrap();
    assert_eq!(triggers.len(), 2);
    assert_eq!(triggers[0].key.name, name);
    assert_eq!(
        triggers[1].key,
        TriggerAdapter::one_shot_key(JobType::Simple)
    );
    assert_eq!(triggers[1].repeat_count, Some(0));
    assert_eq!(env.stored_job(&job).await, job);

    let err = env.context.service.trigger_once(job.id).await.unwrap_err();
    assert!(matches!(err, AppError::SchedulerError(_)));
}

#[tokio::test]
async fn test_one_shot_of_unregistered_unit() {
    let env = TestEnvironment::new();
    let job = env.add_job("orders").await;
    let (name, group) = identity(&job);
    env.context.adapter.delete(&name, &group).await.unwrap();

    let err = env.context.operator.one(&job).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::NotFound(JobErrorCode::JobKeyDoesNotExist)
    ));
}

#[tokio::test]
async fn test_state_of_job_without_identity() {
    let env = TestEnvironment::new();
    let draft = JobBuilder::new("draft").build();
    assert!(env
        .context
        .operator
        .get_state(&draft, "query")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_fleet_health() {
    let env = TestEnvironment::new();
    let healthy = env.add_job("healthy").await;
    let failing = env.add_job("failing").await;
    let unscheduled = env.add_job("unscheduled").await;

    let (name, group) = identity(&unscheduled);
    env.context.adapter.delete(&name, &group).await.unwrap();

    let mut success = JobInstance::new(healthy.id, "healthy", "p1", "PG", Utc::now());
    success.state = SessionState::Success;
    let mut dead = JobInstance::new(failing.id, "failing", "p2", "PG", Utc::now());
    dead.state = SessionState::Dead;
    let mut also_success = JobInstance::new(unscheduled.id, "unscheduled", "p3", "PG", Utc::now());
    also_success.state = SessionState::Success;
    for instance in [&success, &dead, &also_success] {
        env.context.tracker.record(instance).await.unwrap();
    }

    let health = env.context.service.get_health_info().await.unwrap();
    assert_eq!(
        health,
        JobHealth {
            job_count: 2,
            healthy_job_count: 1
        }
    );
}

#[tokio::test]
async fn test_service_resolves_jobs() {
    let env = TestEnvironment::new();
    let service = &env.context.service;
    let job = env.add_job("orders").await;
    let other = env.add_job("customers").await;

    assert_eq!(service.get_job_config(job.id).await.unwrap(), job);
    assert_eq!(service.get_alive_jobs(Some(JobType::Simple)).await.unwrap().len(), 2);

    let view = service.on_action(job.id, "stop").await.unwrap();
    assert!(view.state.unwrap().can_start);
    let view = service.on_action(job.id, "start").await.unwrap();
    assert!(view.state.unwrap().can_stop);
    let err = service.on_action(job.id, "restart").await.unwrap_err();
    assert_eq!(err.error_code(), Some(JobErrorCode::NoSuchJobAction));

    service.delete_job_by_name("customers").await.unwrap();
    assert!(env.stored_job(&other).await.deleted);
    let err = service.delete_job_by_name("customers").await.unwrap_err();
    assert!(matches!(
        err,
        AppError::NotFound(JobErrorCode::JobNameDoesNotExist)
    ));

    service.delete_job_by_id(job.id).await.unwrap();
    let err = service.get_job_config(job.id).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::NotFound(JobErrorCode::JobIdDoesNotExist)
    ));
    assert!(service.get_alive_jobs(None).await.unwrap().is_empty());
    assert!(service
        .find_instances_of_job(job.id, 0, 10)
        .await
        .unwrap()
        .is_empty());
}
