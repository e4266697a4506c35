//! GitHub REST adapter for [`IssueTracker`].

use crate::config::TrackerConfig;
use crate::error::{RemedyError, Result};
use crate::tracker::{IssueState, IssueTracker, RawIssue};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const PAGE_SIZE: &str = "100";

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<GhLabel>,
    state: String,
    /// Present only when the "issue" is really a pull request.
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl From<GhIssue> for RawIssue {
    fn from(gh: GhIssue) -> Self {
        RawIssue {
            number: gh.number,
            title: gh.title,
            body: gh.body.unwrap_or_default(),
            labels: gh.labels.into_iter().map(|l| l.name).collect(),
            state: if gh.state == "closed" {
                IssueState::Closed
            } else {
                IssueState::Open
            },
            pull_request: gh.pull_request.is_some(),
        }
    }
}

pub struct GithubTracker {
    client: Client,
    api_url: String,
    repository: String,
    token: String,
}

impl GithubTracker {
    pub fn new(
        api_url: impl Into<String>,
        repository: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("remedy/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            repository: repository.into(),
            token: token.into(),
        })
    }

    /// Build from config, reading the token from the configured
    /// environment variable.
    pub fn from_config(cfg: &TrackerConfig) -> Result<Self> {
        let token = std::env::var(&cfg.token_env)
            .map_err(|_| RemedyError::MissingToken(cfg.token_env.clone()))?;
        Self::new(
            cfg.api_url.clone(),
            cfg.repository.clone(),
            token,
            Duration::from_secs(cfg.timeout_seconds),
        )
    }

    fn issues_url(&self) -> String {
        format!("{}/repos/{}/issues", self.api_url, self.repository)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }
}

fn check(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body: String = resp.text().unwrap_or_default().chars().take(300).collect();
    Err(RemedyError::Tracker(format!("{what}: HTTP {status}: {body}")))
}

impl IssueTracker for GithubTracker {
    fn list_open(&self, label: &str, page: u32) -> Result<Vec<RawIssue>> {
        let page = page.to_string();
        let resp = self
            .authed(self.client.get(self.issues_url()))
            .query(&[
                ("state", "open"),
                ("labels", label),
                ("sort", "created"),
                ("direction", "asc"),
                ("per_page", PAGE_SIZE),
                ("page", page.as_str()),
            ])
            .send()?;
        let issues: Vec<GhIssue> = check(resp, "list issues")?.json()?;
        Ok(issues.into_iter().map(RawIssue::from).collect())
    }

    fn get(&self, number: u64) -> Result<Option<RawIssue>> {
        let url = format!("{}/{number}", self.issues_url());
        let resp = self.authed(self.client.get(url)).send()?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let issue: GhIssue = check(resp, &format!("get issue #{number}"))?.json()?;
        if issue.pull_request.is_some() {
            return Ok(None);
        }
        Ok(Some(issue.into()))
    }

    fn comment(&self, number: u64, body: &str) -> Result<()> {
        let url = format!("{}/{number}/comments", self.issues_url());
        let resp = self
            .authed(self.client.post(url))
            .json(&serde_json::json!({ "body": body }))
            .send()?;
        check(resp, &format!("comment on #{number}"))?;
        Ok(())
    }

    fn close(&self, number: u64) -> Result<()> {
        let url = format!("{}/{number}", self.issues_url());
        let resp = self
            .authed(self.client.patch(url))
            .json(&serde_json::json!({ "state": "closed" }))
            .send()?;
        check(resp, &format!("close #{number}"))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn tracker(server: &mockito::ServerGuard) -> GithubTracker {
        GithubTracker::new(server.url(), "ncanda/ops", "tok", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn list_open_maps_issues_and_flags_pull_requests() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/repos/ncanda/ops/issues")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("state".into(), "open".into()),
                Matcher::UrlEncoded("labels".into(), "update_visit_data".into()),
                Matcher::UrlEncoded("page".into(), "1".into()),
            ]))
            .match_header("authorization", "Bearer tok")
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                  {"number": 100, "title": "t", "body": "subject=S001 form=clinical",
                   "labels": [{"name": "update_visit_data"}], "state": "open"},
                  {"number": 101, "title": "pr", "body": null, "labels": [],
                   "state": "open", "pull_request": {"url": "x"}}
                ]"#,
            )
            .create();

        let issues = tracker(&server).list_open("update_visit_data", 1).unwrap();
        mock.assert();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].number, 100);
        assert!(issues[0].has_label("update_visit_data"));
        assert!(issues[0].is_open());
        assert!(!issues[0].pull_request);
        assert!(issues[1].pull_request);
    }

    #[test]
    fn scraper_pages_past_a_page_of_pull_requests() {
        use crate::forms::{FormsTable, MetadataRow};
        use crate::scraper::{ScrapeFilter, Scraper};

        let title = "redcap_import_record:Failed to import into REDCap";
        let mut server = mockito::Server::new();
        let pages = [
            (
                "1",
                serde_json::json!([{
                    "number": 1, "title": title, "body": "subject=S001 form=clinical",
                    "labels": [{"name": "uvd"}], "state": "open",
                    "pull_request": {"url": "x"}
                }])
                .to_string(),
            ),
            (
                "2",
                serde_json::json!([{
                    "number": 2, "title": title, "body": "subject=S001 form=clinical",
                    "labels": [{"name": "uvd"}], "state": "open"
                }])
                .to_string(),
            ),
            ("3", "[]".to_string()),
        ];
        let mocks: Vec<_> = pages
            .iter()
            .map(|(n, body)| {
                server
                    .mock("GET", "/repos/ncanda/ops/issues")
                    .match_query(Matcher::UrlEncoded("page".into(), n.to_string()))
                    .with_body(body.as_str())
                    .create()
            })
            .collect();

        let t = tracker(&server);
        let forms = FormsTable::from_metadata(vec![MetadataRow {
            form_name: "clinical".into(),
            field_name: "visit_date".into(),
        }]);
        let filter = ScrapeFilter::new("uvd", title);
        let numbers: Vec<u64> = Scraper::new(&t, &forms)
            .scrape(&filter)
            .map(|i| i.unwrap().number)
            .collect();
        assert_eq!(numbers, vec![2]);
        for m in mocks {
            m.assert();
        }
    }

    #[test]
    fn get_missing_issue_is_none() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/repos/ncanda/ops/issues/999")
            .with_status(404)
            .create();
        assert_eq!(tracker(&server).get(999).unwrap(), None);
    }

    #[test]
    fn get_closed_issue_keeps_state() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/repos/ncanda/ops/issues/7")
            .with_body(r#"{"number": 7, "title": "t", "labels": [], "state": "closed"}"#)
            .create();
        let issue = tracker(&server).get(7).unwrap().unwrap();
        assert_eq!(issue.state, IssueState::Closed);
        assert_eq!(issue.body, "");
    }

    #[test]
    fn comment_and_close_send_expected_payloads() {
        let mut server = mockito::Server::new();
        let comment = server
            .mock("POST", "/repos/ncanda/ops/issues/100/comments")
            .match_body(Matcher::Json(serde_json::json!({"body": "done"})))
            .with_status(201)
            .create();
        let close = server
            .mock("PATCH", "/repos/ncanda/ops/issues/100")
            .match_body(Matcher::Json(serde_json::json!({"state": "closed"})))
            .with_status(200)
            .create();

        let t = tracker(&server);
        t.comment(100, "done").unwrap();
        t.close(100).unwrap();
        comment.assert();
        close.assert();
    }

    #[test]
    fn http_failure_surfaces_as_tracker_error() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/repos/ncanda/ops/issues/5/comments")
            .with_status(403)
            .with_body("rate limited")
            .create();
        let err = tracker(&server).comment(5, "x").unwrap_err();
        match err {
            RemedyError::Tracker(msg) => {
                assert!(msg.contains("403"));
                assert!(msg.contains("rate limited"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
