//! End-to-end job lifecycle: create, run to completion, and the create
//! validation failures.

mod common;

use assert_matches::assert_matches;

use capstudio_core::error::CoreError;
use capstudio_core::job::{CreateJob, GeneratedCaption};
use capstudio_core::status::JobStatus;
use capstudio_core::store::CaptionStore;
use capstudio_core::types::Id;

use common::{json_reply, wait_for, wait_for_status, world, world_with_set, ScriptedBackend};

fn create_request(w: &common::World) -> CreateJob {
    CreateJob {
        caption_set_id: w.set_id,
        backend: None,
        model: None,
        template_id: None,
        seed: None,
        seed_mode: None,
        overwrite_existing: false,
    }
}

#[tokio::test]
async fn job_runs_to_completion_and_persists_captions() {
    let backend = ScriptedBackend::new();
    backend.push_reply(Ok(json_reply("a red barn in a field", 0.85)));
    backend.push_reply(Ok(json_reply("a snowy mountain pass", 0.9)));
    let w = world(2, backend);

    let job = w.controller.create(create_request(&w)).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.total_files, 2);

    let done = wait_for_status(&w.store, job.id, JobStatus::Completed).await;
    assert_eq!(done.completed_files, 2);
    assert_eq!(done.failed_files, 0);
    assert_eq!(done.percent_complete(), 100.0);
    assert_eq!(done.current_file_id, None);
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());

    let first = w.store.find_caption(w.set_id, w.files[0]).await.unwrap().unwrap();
    assert_eq!(first.text, "a red barn in a field");
    assert_eq!(first.caption_ru.as_deref(), Some("перевод"));
    assert_eq!(first.source, "generated");
    assert_eq!(first.model, done.model);
    assert_eq!(first.quality_score, Some(0.85));
    assert_eq!(
        first.quality_flags.as_deref(),
        Some(&["slightly_soft".to_string()][..])
    );
    assert!(w.store.find_caption(w.set_id, w.files[1]).await.unwrap().is_some());
}

#[tokio::test]
async fn quality_score_propagates_to_dataset_member() {
    let backend = ScriptedBackend::new();
    backend.push_reply(Ok(json_reply("a lighthouse at dusk", 0.72)));
    let w = world(1, backend);

    let job = w.controller.create(create_request(&w)).await.unwrap();
    wait_for_status(&w.store, job.id, JobStatus::Completed).await;

    let (score, flags) = w.store.member_quality(w.dataset_id, w.files[0]).unwrap();
    assert_eq!(score, 0.72);
    assert_eq!(flags.as_deref(), Some(&["slightly_soft".to_string()][..]));
}

#[tokio::test]
async fn trigger_phrase_is_prepended_when_model_omits_it() {
    let backend = ScriptedBackend::new();
    backend.push_reply(Ok(json_reply("a woman in a white dress", 0.8)));
    let w = world_with_set(1, backend, |set| {
        set.trigger_phrase = Some("sks style".into());
    });

    let job = w.controller.create(create_request(&w)).await.unwrap();
    wait_for_status(&w.store, job.id, JobStatus::Completed).await;

    let caption = w.store.find_caption(w.set_id, w.files[0]).await.unwrap().unwrap();
    assert_eq!(caption.text, "sks style, a woman in a white dress");
}

#[tokio::test]
async fn trigger_phrase_is_not_prepended_to_an_empty_caption() {
    let backend = ScriptedBackend::new();
    backend.push_reply(Ok(r#"{"caption": ""}"#.into()));
    let w = world_with_set(1, backend, |set| {
        set.trigger_phrase = Some("mytok".into());
    });

    let job = w.controller.create(create_request(&w)).await.unwrap();
    wait_for_status(&w.store, job.id, JobStatus::Completed).await;

    let caption = w.store.find_caption(w.set_id, w.files[0]).await.unwrap().unwrap();
    assert_eq!(caption.text, "");
}

#[tokio::test]
async fn unstructured_reply_still_produces_a_caption() {
    let backend = ScriptedBackend::new();
    backend.push_reply(Ok("Caption: a cat sleeping on a windowsill.".into()));
    let w = world(1, backend);

    let job = w.controller.create(create_request(&w)).await.unwrap();
    let done = wait_for_status(&w.store, job.id, JobStatus::Completed).await;
    assert_eq!(done.completed_files, 1);

    let caption = w.store.find_caption(w.set_id, w.files[0]).await.unwrap().unwrap();
    assert_eq!(caption.text, "a cat sleeping on a windowsill.");
    assert_eq!(caption.quality_score, None);
}

#[tokio::test]
async fn per_file_failure_continues_the_batch() {
    let backend = ScriptedBackend::new();
    backend.push_reply(Ok(json_reply("first", 0.8)));
    backend.push_reply(Err(CoreError::Unavailable("connection refused".into())));
    backend.push_reply(Ok(json_reply("third", 0.8)));
    let w = world(3, backend);

    let job = w.controller.create(create_request(&w)).await.unwrap();
    let done = wait_for_status(&w.store, job.id, JobStatus::Completed).await;

    assert_eq!(done.completed_files, 2);
    assert_eq!(done.failed_files, 1);
    let last_error = done.last_error.unwrap();
    assert!(last_error.contains("connection refused"), "{last_error}");

    assert!(w.store.find_caption(w.set_id, w.files[0]).await.unwrap().is_some());
    assert!(w.store.find_caption(w.set_id, w.files[1]).await.unwrap().is_none());
    assert!(w.store.find_caption(w.set_id, w.files[2]).await.unwrap().is_some());
}

#[tokio::test]
async fn unresolvable_file_counts_as_failure() {
    let w = world(2, ScriptedBackend::new());
    w.store.remove_path(w.files[0]);

    let job = w.controller.create(create_request(&w)).await.unwrap();
    let done = wait_for_status(&w.store, job.id, JobStatus::Completed).await;

    assert_eq!(done.completed_files, 1);
    assert_eq!(done.failed_files, 1);
    assert!(done.last_error.unwrap().contains("not found"));
}

#[tokio::test]
async fn create_fails_invalid_for_missing_caption_set() {
    let w = world(1, ScriptedBackend::new());
    let result = w
        .controller
        .create(CreateJob {
            caption_set_id: Id::new_v4(),
            ..create_request(&w)
        })
        .await;
    assert_matches!(result, Err(CoreError::Invalid(_)));
}

#[tokio::test]
async fn create_fails_invalid_for_unknown_backend() {
    let w = world(1, ScriptedBackend::new());
    let result = w
        .controller
        .create(CreateJob {
            backend: Some("ollama".into()),
            ..create_request(&w)
        })
        .await;
    assert_matches!(result, Err(CoreError::Invalid(_)));
}

#[tokio::test]
async fn create_fails_invalid_with_zero_eligible_files() {
    let w = world(0, ScriptedBackend::new());
    let result = w.controller.create(create_request(&w)).await;
    assert_matches!(result, Err(CoreError::Invalid(_)));
}

#[tokio::test]
async fn create_without_overwrite_skips_already_captioned_files() {
    let backend = ScriptedBackend::new();
    backend.push_reply(Ok(json_reply("only the second file", 0.8)));
    let w = world(2, backend);

    w.store
        .upsert_caption(&GeneratedCaption {
            caption_set_id: w.set_id,
            file_id: w.files[0],
            text: "written by hand".into(),
            caption_ru: None,
            source: "manual".into(),
            model: "n/a".into(),
            quality_score: None,
            quality_flags: None,
        })
        .await
        .unwrap();

    let job = w.controller.create(create_request(&w)).await.unwrap();
    assert_eq!(job.total_files, 1);

    let done = wait_for_status(&w.store, job.id, JobStatus::Completed).await;
    assert_eq!(done.completed_files, 1);
    assert_eq!(w.backend.calls(), 1);

    // The pre-existing caption is untouched.
    let first = w.store.find_caption(w.set_id, w.files[0]).await.unwrap().unwrap();
    assert_eq!(first.text, "written by hand");
    assert_eq!(
        w.store.find_caption(w.set_id, w.files[1]).await.unwrap().unwrap().text,
        "only the second file"
    );
}

#[tokio::test]
async fn create_with_fully_captioned_set_fails_invalid_without_overwrite() {
    let w = world(1, ScriptedBackend::new());
    w.store
        .upsert_caption(&GeneratedCaption {
            caption_set_id: w.set_id,
            file_id: w.files[0],
            text: "done already".into(),
            caption_ru: None,
            source: "manual".into(),
            model: "n/a".into(),
            quality_score: None,
            quality_flags: None,
        })
        .await
        .unwrap();

    let result = w.controller.create(create_request(&w)).await;
    assert_matches!(result, Err(CoreError::Invalid(_)));

    // With overwrite, the same set is a valid one-file job.
    let job = w
        .controller
        .create(CreateJob {
            overwrite_existing: true,
            ..create_request(&w)
        })
        .await
        .unwrap();
    assert_eq!(job.total_files, 1);
    wait_for_status(&w.store, job.id, JobStatus::Completed).await;
}

#[tokio::test]
async fn caption_set_vanishing_before_start_fails_the_job() {
    let w = world(1, ScriptedBackend::new());
    let job = w.controller.create(create_request(&w)).await.unwrap();
    // The worker task has not run yet on the current-thread runtime.
    w.store.remove_caption_set(w.set_id);

    let failed = wait_for_status(&w.store, job.id, JobStatus::Failed).await;
    assert!(failed.last_error.unwrap().contains("caption set"));
}

#[tokio::test]
async fn counters_never_exceed_total() {
    let backend = ScriptedBackend::new();
    backend.push_reply(Err(CoreError::Unavailable("down".into())));
    backend.push_reply(Err(CoreError::Unavailable("down".into())));
    backend.push_reply(Ok(json_reply("ok", 0.8)));
    let w = world(3, backend);

    let job = w.controller.create(create_request(&w)).await.unwrap();
    let done = wait_for(&w.store, job.id, |j| j.status.is_terminal()).await;
    assert_eq!(done.status, JobStatus::Completed);
    assert!(done.completed_files + done.failed_files <= done.total_files);
    assert_eq!(done.completed_files, 1);
    assert_eq!(done.failed_files, 2);
}
