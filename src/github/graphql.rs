//! GraphQL wire shapes and response parsing for the PR search.
//!
//! The search response is deserialized in two steps: edges are kept as
//! raw JSON first so each PR's node can be stored verbatim for
//! debugging, then each node is parsed into the typed shape.

use serde::Deserialize;
use tracing::warn;

use crate::error::FetchError;
use crate::types::{FetchedPr, ReviewThread, ThreadComment, TrackedPr, zero_time};

/// PR-level commenters that never count as "the last commenter".
const IGNORED_PR_COMMENTERS: &[&str] = &["github-actions", "vercel"];

pub(crate) fn viewer_query() -> &'static str {
    "query { viewer { login } }"
}

/// The search query for open PRs involving the user.
///
/// The `first:` node counts need calibration: too high and GitHub
/// rejects the query with MAX_NODE_LIMIT_EXCEEDED. `reviewThreads`
/// cannot be filtered on `isResolved`, so it overfetches.
pub(crate) fn search_prs_query(username: &str) -> String {
    format!(
        r#"query {{
  search(type: ISSUE, query: "state:open involves:{username} type:pr archived:false", first: 100) {{
    edges {{
      node {{
        ... on PullRequest {{
          title
          url
          isDraft
          reviewRequests(first: 100) {{
            nodes {{
              requestedReviewer {{
                ... on User {{
                  login
                }}
              }}
            }}
          }}
          repository {{
            url
            name
            owner {{
              login
            }}
          }}
          reviewDecision
          updatedAt
          author {{
            login
          }}
          additions
          deletions
          comments(last: 5) {{
            edges {{
              node {{
                author {{
                  login
                }}
              }}
            }}
          }}
          reviewThreads(first: 15) {{
            edges {{
              node {{
                isResolved
                isOutdated
                isCollapsed
                comments(first: 30) {{
                  nodes {{
                    author {{
                      login
                    }}
                    reactions(first: 7) {{
                      edges {{
                        node {{
                          user {{
                            login
                          }}
                        }}
                      }}
                    }}
                  }}
                }}
              }}
            }}
          }}
          reviews(first: 20) {{
            edges {{
              node {{
                state
              }}
            }}
          }}
        }}
      }}
    }}
  }}
}}"#
    )
}

// ── Response shapes ─────────────────────────────────────────────────

/// GraphQL error entries; returned with HTTP 200, so the body has to be
/// inspected even on success.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct GraphQlErrors {
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GraphQlError {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: SearchData,
}

#[derive(Debug, Default, Deserialize)]
struct SearchData {
    #[serde(default)]
    search: SearchConnection,
}

#[derive(Debug, Default, Deserialize)]
struct SearchConnection {
    #[serde(default)]
    edges: Vec<RawEdge>,
}

/// Edge kept as raw JSON so the node can be retained for debugging.
#[derive(Debug, Deserialize)]
struct RawEdge {
    node: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct Login {
    #[serde(default)]
    login: String,
}

#[derive(Debug, Default, Deserialize)]
struct Edges<T> {
    #[serde(default = "Vec::new")]
    edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
struct Edge<T> {
    node: T,
}

#[derive(Debug, Default, Deserialize)]
struct PrNode {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default, rename = "isDraft")]
    is_draft: bool,
    #[serde(default, rename = "reviewRequests")]
    review_requests: ReviewRequests,
    #[serde(default, rename = "reviewDecision")]
    review_decision: Option<String>,
    #[serde(default, rename = "updatedAt")]
    updated_at: String,
    #[serde(default)]
    author: Option<Login>,
    #[serde(default)]
    repository: RepositoryNode,
    #[serde(default)]
    additions: i64,
    #[serde(default)]
    deletions: i64,
    #[serde(default)]
    comments: Edges<CommentNode>,
    #[serde(default, rename = "reviewThreads")]
    review_threads: Edges<ThreadNode>,
    #[serde(default)]
    reviews: Edges<ReviewNode>,
}

#[derive(Debug, Default, Deserialize)]
struct ReviewRequests {
    #[serde(default)]
    nodes: Vec<ReviewRequestNode>,
}

#[derive(Debug, Default, Deserialize)]
struct ReviewRequestNode {
    #[serde(default, rename = "requestedReviewer")]
    requested_reviewer: Option<Login>,
}

#[derive(Debug, Default, Deserialize)]
struct RepositoryNode {
    #[serde(default)]
    url: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    owner: Login,
}

#[derive(Debug, Default, Deserialize)]
struct CommentNode {
    #[serde(default)]
    author: Option<Login>,
}

#[derive(Debug, Default, Deserialize)]
struct ThreadNode {
    #[serde(default, rename = "isResolved")]
    is_resolved: bool,
    #[serde(default, rename = "isOutdated")]
    is_outdated: bool,
    #[serde(default, rename = "isCollapsed")]
    is_collapsed: bool,
    #[serde(default)]
    comments: ThreadComments,
}

#[derive(Debug, Default, Deserialize)]
struct ThreadComments {
    #[serde(default)]
    nodes: Vec<ThreadCommentNode>,
}

#[derive(Debug, Default, Deserialize)]
struct ThreadCommentNode {
    #[serde(default)]
    author: Option<Login>,
    #[serde(default)]
    reactions: Edges<ReactionNode>,
}

#[derive(Debug, Default, Deserialize)]
struct ReactionNode {
    #[serde(default)]
    user: Option<Login>,
}

#[derive(Debug, Default, Deserialize)]
struct ReviewNode {
    #[serde(default)]
    state: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ViewerResponse {
    #[serde(default)]
    data: ViewerData,
}

#[derive(Debug, Default, Deserialize)]
struct ViewerData {
    #[serde(default)]
    viewer: Login,
}

// ── Parsing ─────────────────────────────────────────────────────────

fn login(opt: Option<Login>) -> String {
    opt.map(|l| l.login).unwrap_or_default()
}

/// Parse the viewer query response into a login name.
pub(crate) fn parse_viewer_response(body: &str) -> Result<String, FetchError> {
    let parsed: ViewerResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::Client(format!("could not parse viewer response: {e}")))?;
    Ok(parsed.data.viewer.login)
}

/// Parse the search response into PRs plus their review threads.
///
/// Malformed timestamps are logged and replaced with the zero timestamp;
/// they never fail the batch.
pub(crate) fn parse_search_response(body: &str) -> Result<Vec<FetchedPr>, FetchError> {
    let raw: SearchResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::Client(format!("could not parse search response: {e}")))?;

    let mut fetched = Vec::with_capacity(raw.data.search.edges.len());

    for edge in raw.data.search.edges {
        let node: PrNode = serde_json::from_value(edge.node.clone()).map_err(|e| {
            FetchError::Client(format!("could not parse PR node for debugging copy: {e}"))
        })?;

        let last_updated = match chrono::DateTime::parse_from_rfc3339(&node.updated_at) {
            Ok(t) => t.to_utc(),
            Err(_) => {
                warn!(updated_at = %node.updated_at, pr_url = %node.url, "could not parse time");
                zero_time()
            }
        };

        let mut last_pr_commenter = String::new();
        for c in node.comments.edges {
            let author = login(c.node.author);
            if IGNORED_PR_COMMENTERS.contains(&author.as_str()) {
                continue;
            }
            last_pr_commenter = author;
        }

        // The reviews graph can carry an approval that never made it
        // into reviewDecision. CHANGES_REQUESTED weighs higher, so the
        // fallback only fills an empty decision.
        let mut review_status = node.review_decision.unwrap_or_default();
        if review_status.is_empty()
            && node.reviews.edges.iter().any(|r| r.node.state == "APPROVED")
        {
            review_status = "APPROVED".to_string();
        }

        let review_requested_from: Vec<String> = node
            .review_requests
            .nodes
            .into_iter()
            .map(|r| login(r.requested_reviewer))
            .filter(|l| !l.is_empty())
            .collect();

        let threads: Vec<ReviewThread> = node
            .review_threads
            .edges
            .into_iter()
            .map(|t| ReviewThread {
                is_resolved: t.node.is_resolved,
                is_outdated: t.node.is_outdated,
                is_collapsed: t.node.is_collapsed,
                comments: t
                    .node
                    .comments
                    .nodes
                    .into_iter()
                    .map(|c| ThreadComment {
                        author: login(c.author),
                        reactors: c
                            .reactions
                            .edges
                            .into_iter()
                            .map(|r| login(r.node.user))
                            .filter(|l| !l.is_empty())
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        let pr = TrackedPr {
            url: node.url,
            title: node.title,
            author: login(node.author),
            repo_name: node.repository.name,
            repo_owner: node.repository.owner.login,
            repo_url: node.repository.url,
            review_status,
            is_draft: node.is_draft,
            last_updated,
            last_pr_commenter,
            threads_actionable: 0,
            threads_waiting: 0,
            additions: node.additions,
            deletions: node.deletions,
            review_requested_from,
            buried: false,
            raw_json: Some(edge.node),
        };

        fetched.push(FetchedPr { pr, threads });
    }

    Ok(fetched)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_body() -> String {
        r#"{
          "data": { "search": { "edges": [ { "node": {
            "title": "feat: add request retries",
            "url": "https://github.com/acme/api/pull/7",
            "isDraft": false,
            "reviewRequests": { "nodes": [
              { "requestedReviewer": { "login": "reviewer1" } },
              { "requestedReviewer": null }
            ] },
            "repository": { "url": "https://github.com/acme/api", "name": "api", "owner": { "login": "acme" } },
            "reviewDecision": null,
            "updatedAt": "2026-01-02T03:04:05Z",
            "author": { "login": "alice" },
            "additions": 120,
            "deletions": 8,
            "comments": { "edges": [
              { "node": { "author": { "login": "github-actions" } } },
              { "node": { "author": { "login": "bob" } } }
            ] },
            "reviewThreads": { "edges": [ { "node": {
              "isResolved": false,
              "isOutdated": false,
              "isCollapsed": false,
              "comments": { "nodes": [
                { "author": { "login": "bob" }, "reactions": { "edges": [] } }
              ] }
            } } ] },
            "reviews": { "edges": [ { "node": { "state": "APPROVED" } } ] }
          } } ] } }
        }"#
        .to_string()
    }

    #[test]
    fn parses_a_full_pr_node() {
        let fetched = parse_search_response(&sample_body()).unwrap();
        assert_eq!(fetched.len(), 1);

        let pr = &fetched[0].pr;
        assert_eq!(pr.url, "https://github.com/acme/api/pull/7");
        assert_eq!(pr.author, "alice");
        assert_eq!(pr.repo_owner, "acme");
        assert_eq!(pr.additions, 120);
        assert_eq!(pr.review_requested_from, vec!["reviewer1".to_string()]);
        assert!(pr.raw_json.is_some());

        assert_eq!(fetched[0].threads.len(), 1);
        assert_eq!(fetched[0].threads[0].comments[0].author, "bob");
    }

    #[test]
    fn bot_comments_do_not_become_the_last_commenter() {
        let fetched = parse_search_response(&sample_body()).unwrap();
        assert_eq!(fetched[0].pr.last_pr_commenter, "bob");

        let body = r#"{"data":{"search":{"edges":[{"node":{
            "url": "u", "updatedAt": "2026-01-02T03:04:05Z",
            "comments": { "edges": [
              { "node": { "author": { "login": "carol" } } },
              { "node": { "author": { "login": "github-actions" } } },
              { "node": { "author": { "login": "vercel" } } }
            ] }
        }}]}}}"#;
        let fetched = parse_search_response(body).unwrap();
        assert_eq!(fetched[0].pr.last_pr_commenter, "carol");
    }

    #[test]
    fn standalone_approval_fills_an_empty_review_decision() {
        let fetched = parse_search_response(&sample_body()).unwrap();
        assert_eq!(fetched[0].pr.review_status, "APPROVED");

        let decided = sample_body().replace(r#""reviewDecision": null"#, r#""reviewDecision": "CHANGES_REQUESTED""#);
        let fetched = parse_search_response(&decided).unwrap();
        assert_eq!(fetched[0].pr.review_status, "CHANGES_REQUESTED");
    }

    #[test]
    fn malformed_timestamp_degrades_to_zero_not_an_error() {
        let broken = sample_body().replace("2026-01-02T03:04:05Z", "not-a-time");
        let fetched = parse_search_response(&broken).unwrap();
        assert_eq!(fetched[0].pr.last_updated, zero_time());
    }

    #[test]
    fn empty_search_yields_no_prs() {
        let fetched = parse_search_response(r#"{"data":{"search":{"edges":[]}}}"#).unwrap();
        assert!(fetched.is_empty());
    }

    #[test]
    fn query_embeds_the_username() {
        let q = search_prs_query("octocat");
        assert!(q.contains("involves:octocat"));
        assert!(q.contains("reviewThreads(first: 15)"));
    }

    #[test]
    fn viewer_response_parses_to_login() {
        let login = parse_viewer_response(r#"{"data":{"viewer":{"login":"octocat"}}}"#).unwrap();
        assert_eq!(login, "octocat");
    }
}
