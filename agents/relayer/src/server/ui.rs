use std::{collections::BTreeMap, str::FromStr};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing, Json, Router,
};
use derive_new::new;
use itertools::Itertools;
use relayer_base::{
    db::{Job, JobState},
    server::utils::{ServerErrorResponse, ServerResult},
};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::queue::JobQueue;

const UI_ROUTE: &str = "/ui";
const JOBS_ROUTE: &str = "/ui/jobs";
const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1_000;
const DASHBOARD_ROWS: usize = 20;

/// Query of `/ui/jobs`. Without a state, jobs of every state are listed.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListJobsRequest {
    state: Option<String>,
    limit: Option<usize>,
}

/// Body of `/ui/jobs`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobsResponse {
    /// Number of jobs per state
    pub counts: BTreeMap<String, usize>,
    /// The listed jobs
    pub jobs: Vec<Job>,
}

/// Queue dashboard.
#[derive(new, Clone, Debug)]
pub struct UiApi {
    queue: JobQueue,
}

fn internal_error(err: eyre::Report) -> ServerErrorResponse {
    ServerErrorResponse::with_message(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
}

impl UiApi {
    fn counts(&self) -> eyre::Result<BTreeMap<String, usize>> {
        Ok(self
            .queue
            .db()
            .job_counts()?
            .into_iter()
            .map(|(state, count)| (state.to_string(), count))
            .collect())
    }

    fn jobs(&self, states: &[JobState], limit: usize) -> eyre::Result<Vec<Job>> {
        let mut jobs = vec![];
        for state in states {
            jobs.extend(self.queue.db().jobs_in_state(*state, limit)?);
        }
        Ok(jobs)
    }

    /// Jobs matching `request`, with the queue's counts.
    pub fn list(&self, request: ListJobsRequest) -> ServerResult<JobsResponse> {
        let states = match &request.state {
            Some(state) => vec![JobState::from_str(state).map_err(|_| {
                ServerErrorResponse::with_message(
                    StatusCode::BAD_REQUEST,
                    format!("unknown job state `{state}`"),
                )
            })?],
            None => JobState::iter().collect(),
        };
        let limit = request.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        Ok(JobsResponse {
            counts: self.counts().map_err(internal_error)?,
            jobs: self.jobs(&states, limit).map_err(internal_error)?,
        })
    }

    /// The HTML dashboard.
    pub fn dashboard(&self) -> ServerResult<String> {
        let counts = self.counts().map_err(internal_error)?;
        let summary = counts
            .iter()
            .map(|(state, count)| format!("<li>{state}: {count}</li>"))
            .join("");
        let mut sections = String::new();
        for state in JobState::iter() {
            let rows = self
                .jobs(&[state], DASHBOARD_ROWS)
                .map_err(internal_error)?
                .iter()
                .map(job_row)
                .join("");
            sections.push_str(&format!(
                "<h2>{state}</h2><table><tr><th>id</th><th>attempts</th><th>tx</th><th>error</th></tr>{rows}</table>"
            ));
        }
        Ok(format!(
            "<!DOCTYPE html><html><head><title>Relayer queue</title></head>\
             <body><h1>Relayer queue</h1><ul>{summary}</ul>{sections}</body></html>"
        ))
    }

    /// `GET /ui` and `GET /ui/jobs?state=&limit=`
    pub fn router(&self) -> Router {
        Router::new()
            .route(UI_ROUTE, routing::get(dashboard))
            .route(JOBS_ROUTE, routing::get(list_jobs))
            .with_state(self.clone())
    }
}

fn job_row(job: &Job) -> String {
    format!(
        "<tr><td>{}</td><td>{}/{}</td><td>{}</td><td>{}</td></tr>",
        escape(&job.id),
        job.attempts,
        job.max_attempts,
        escape(job.tx_id.as_deref().unwrap_or_default()),
        escape(job.last_error.as_deref().unwrap_or_default()),
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

async fn dashboard(State(api): State<UiApi>) -> ServerResult<Html<String>> {
    api.dashboard().map(Html)
}

async fn list_jobs(
    State(api): State<UiApi>,
    Query(request): Query<ListJobsRequest>,
) -> ServerResult<Json<JobsResponse>> {
    api.list(request).map(Json)
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use relayer_base::db::{test_utils::run_test_db, RelayerDb};
    use relayer_core::test_utils::dummy_vaa;
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    use super::*;
    use crate::{server::body_json, settings::QueueConf, test_utils::test_metrics};

    fn get(path: &str) -> Request<Body> {
        Request::get(path).body(Body::empty()).unwrap()
    }

    fn api(db: relayer_base::db::DB) -> UiApi {
        let (events, _) = broadcast::channel(1);
        let queue = JobQueue::new(RelayerDb::new(db), QueueConf::default(), events, &test_metrics());
        for sequence in 0..3 {
            let mut vaa = dummy_vaa(vec![sequence as u8]);
            vaa.sequence = sequence;
            queue.add_vaa_to_queue(vaa.encode().unwrap()).unwrap();
        }
        UiApi::new(queue)
    }

    #[tokio::test]
    async fn lists_jobs_by_state() {
        run_test_db(|db| async move {
            let router = api(db).router();

            let response = router
                .clone()
                .oneshot(get("/ui/jobs?state=waiting&limit=2"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body: JobsResponse = serde_json::from_value(body_json(response).await).unwrap();
            assert_eq!(body.jobs.len(), 2);
            assert_eq!(body.counts["waiting"], 3);
            assert_eq!(body.counts["failed"], 0);

            let response = router.clone().oneshot(get("/ui/jobs")).await.unwrap();
            let body: JobsResponse = serde_json::from_value(body_json(response).await).unwrap();
            assert_eq!(body.jobs.len(), 3);

            let response = router.oneshot(get("/ui/jobs?state=stuck")).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        })
        .await;
    }

    #[tokio::test]
    async fn renders_dashboard() {
        run_test_db(|db| async move {
            let response = api(db).router().oneshot(get("/ui")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let body = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let html = String::from_utf8_lossy(&body);
            assert!(html.contains("<li>waiting: 3</li>"));
            assert!(html.contains(&dummy_vaa(()).id().route().at(0).to_string()));
        })
        .await;
    }

    #[test]
    fn escapes_errors() {
        assert_eq!(escape("<b>&\"</b>"), "&lt;b&gt;&amp;&quot;&lt;/b&gt;");
    }
}
