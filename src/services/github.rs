//! Read-mostly GitHub REST client backing the repository tools.
//!
//! Stateless: every call carries the bound token and `owner/name` path. No
//! retries — a failed call propagates so the model (or the user) can react.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("tessy/", env!("CARGO_PKG_VERSION"));
const DEFAULT_COMMIT_LIMIT: u64 = 10;
const DEFAULT_TREE_DEPTH: u64 = 2;

/// Typed failure of a GitHub call. `status` is absent for transport errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubError {
    pub status: Option<u16>,
    pub message: String,
}

impl GithubError {
    fn transport(err: impl std::fmt::Display) -> Self {
        Self {
            status: None,
            message: format!("Falha de conexão com o GitHub: {err}"),
        }
    }

    fn from_status(status: u16) -> Self {
        let message = match status {
            401 => "Token do GitHub inválido ou expirado.".to_string(),
            403 => "Acesso negado ou limite de requisições do GitHub atingido.".to_string(),
            404 => "Repositório ou recurso não encontrado.".to_string(),
            s => format!("Erro na API do GitHub (HTTP {s})."),
        };
        Self {
            status: Some(status),
            message,
        }
    }
}

impl std::fmt::Display for GithubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GithubError {}

/// Token + `owner/name` pair bound to the active project.
#[derive(Debug, Clone)]
pub struct RepoBinding {
    pub token: String,
    pub repo: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub author: String,
    pub date: String,
    pub url: String,
}

pub struct GithubClient {
    http: reqwest::Client,
}

impl Default for GithubClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GithubClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    async fn get_json(&self, token: &str, path: &str) -> Result<JsonValue, GithubError> {
        let response = self
            .http
            .get(format!("{API_BASE}{path}"))
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(GithubError::transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GithubError::from_status(status.as_u16()));
        }
        response.json().await.map_err(GithubError::transport)
    }

    async fn post_json(
        &self,
        token: &str,
        path: &str,
        body: &JsonValue,
    ) -> Result<JsonValue, GithubError> {
        let response = self
            .http
            .post(format!("{API_BASE}{path}"))
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .json(body)
            .send()
            .await
            .map_err(GithubError::transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GithubError::from_status(status.as_u16()));
        }
        response.json().await.map_err(GithubError::transport)
    }

    pub async fn repository(&self, token: &str, repo: &str) -> Result<JsonValue, GithubError> {
        self.get_json(token, &format!("/repos/{repo}")).await
    }

    pub async fn recent_commits(
        &self,
        token: &str,
        repo: &str,
        limit: u64,
    ) -> Result<Vec<CommitInfo>, GithubError> {
        let limit = if limit == 0 { DEFAULT_COMMIT_LIMIT } else { limit };
        let raw = self
            .get_json(token, &format!("/repos/{repo}/commits?per_page={limit}"))
            .await?;
        let commits = raw
            .as_array()
            .map(|list| list.iter().map(map_commit_summary).collect())
            .unwrap_or_default();
        Ok(commits)
    }

    pub async fn create_issue(
        &self,
        token: &str,
        repo: &str,
        title: &str,
        body: &str,
    ) -> Result<JsonValue, GithubError> {
        let issue = self
            .post_json(
                token,
                &format!("/repos/{repo}/issues"),
                &json!({ "title": title, "body": body }),
            )
            .await?;
        Ok(json!({
            "number": issue["number"],
            "title": issue["title"],
            "url": issue["html_url"],
        }))
    }

    pub async fn file_content(
        &self,
        token: &str,
        repo: &str,
        path: &str,
    ) -> Result<String, GithubError> {
        let raw = self
            .get_json(token, &format!("/repos/{repo}/contents/{path}"))
            .await?;
        let encoded: String = raw["content"]
            .as_str()
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = BASE64.decode(encoded).map_err(|e| GithubError {
            status: None,
            message: format!("Conteúdo do arquivo ilegível: {e}"),
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn list_directory(
        &self,
        token: &str,
        repo: &str,
        path: &str,
    ) -> Result<JsonValue, GithubError> {
        let raw = self
            .get_json(token, &format!("/repos/{repo}/contents/{path}"))
            .await?;
        let entries = raw
            .as_array()
            .map(|list| {
                list.iter()
                    .map(|entry| {
                        json!({
                            "name": entry["name"],
                            "path": entry["path"],
                            "type": entry["type"],
                            "size": entry["size"],
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(JsonValue::Array(entries))
    }

    pub async fn search_code(
        &self,
        token: &str,
        repo: &str,
        query: &str,
    ) -> Result<JsonValue, GithubError> {
        let raw = self
            .get_json(token, &search_code_path(repo, query))
            .await?;
        let items = raw["items"]
            .as_array()
            .map(|list| {
                list.iter()
                    .map(|item| {
                        json!({
                            "name": item["name"],
                            "path": item["path"],
                            "url": item["html_url"],
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(json!({
            "totalCount": raw["total_count"],
            "items": items,
        }))
    }

    pub async fn readme(&self, token: &str, repo: &str) -> Result<String, GithubError> {
        let raw = self.get_json(token, &format!("/repos/{repo}/readme")).await?;
        let encoded: String = raw["content"]
            .as_str()
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        let bytes = BASE64.decode(encoded).map_err(|e| GithubError {
            status: None,
            message: format!("README ilegível: {e}"),
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub async fn branches(&self, token: &str, repo: &str) -> Result<JsonValue, GithubError> {
        let raw = self
            .get_json(token, &format!("/repos/{repo}/branches"))
            .await?;
        let names = raw
            .as_array()
            .map(|list| {
                list.iter()
                    .map(|b| json!({ "name": b["name"], "protected": b["protected"] }))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(JsonValue::Array(names))
    }

    pub async fn commit_detail(
        &self,
        token: &str,
        repo: &str,
        sha: &str,
    ) -> Result<JsonValue, GithubError> {
        let raw = self
            .get_json(token, &format!("/repos/{repo}/commits/{sha}"))
            .await?;
        let files = raw["files"]
            .as_array()
            .map(|list| {
                list.iter()
                    .map(|f| {
                        json!({
                            "filename": f["filename"],
                            "status": f["status"],
                            "additions": f["additions"],
                            "deletions": f["deletions"],
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(json!({
            "sha": raw["sha"],
            "message": raw["commit"]["message"],
            "author": raw["commit"]["author"]["name"],
            "date": raw["commit"]["author"]["date"],
            "stats": raw["stats"],
            "files": files,
        }))
    }

    /// Repository tree filtered to entries at most `depth` path components
    /// deep, resolved against the default branch.
    pub async fn tree(
        &self,
        token: &str,
        repo: &str,
        depth: u64,
    ) -> Result<JsonValue, GithubError> {
        let depth = if depth == 0 { DEFAULT_TREE_DEPTH } else { depth };
        let meta = self.repository(token, repo).await?;
        let branch = meta["default_branch"].as_str().unwrap_or("main").to_string();
        let raw = self
            .get_json(
                token,
                &format!("/repos/{repo}/git/trees/{branch}?recursive=1"),
            )
            .await?;
        let entries = raw["tree"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter(|entry| {
                        entry["path"]
                            .as_str()
                            .map(|p| p.split('/').count() as u64 <= depth)
                            .unwrap_or(false)
                    })
                    .map(|entry| json!({ "path": entry["path"], "type": entry["type"] }))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(json!({
            "branch": branch,
            "truncated": raw["truncated"],
            "entries": entries,
        }))
    }
}

fn map_commit_summary(raw: &JsonValue) -> CommitInfo {
    CommitInfo {
        sha: raw["sha"].as_str().unwrap_or_default().to_string(),
        message: raw["commit"]["message"]
            .as_str()
            .unwrap_or_default()
            .lines()
            .next()
            .unwrap_or_default()
            .to_string(),
        author: raw["commit"]["author"]["name"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        date: raw["commit"]["author"]["date"]
            .as_str()
            .unwrap_or_default()
            .to_string(),
        url: raw["html_url"].as_str().unwrap_or_default().to_string(),
    }
}

fn search_code_path(repo: &str, query: &str) -> String {
    let q = format!("{query} repo:{repo}");
    format!("/search/code?q={}", urlencoding::encode(&q))
}

/// Execute a model function call by name against the client.
///
/// Always yields a `{success, ...}` envelope so tool failures flow back to
/// the model as data instead of aborting generation. With no binding, every
/// call fails with a configuration error and no network I/O happens.
pub async fn execute_repository_tool(
    client: &GithubClient,
    binding: Option<&RepoBinding>,
    name: &str,
    args: &JsonValue,
) -> JsonValue {
    let Some(binding) = binding else {
        return failure("Nenhum repositório ou token do GitHub configurado para este projeto.");
    };
    let token = binding.token.as_str();
    let repo = binding.repo.as_str();

    let result: Result<JsonValue, GithubError> = match name {
        "get_repository_info" => client.repository(token, repo).await.map(|meta| {
            json!({
                "name": meta["full_name"],
                "description": meta["description"],
                "language": meta["language"],
                "stars": meta["stargazers_count"],
                "defaultBranch": meta["default_branch"],
            })
        }),
        "get_recent_commits" => {
            let limit = args["limit"].as_u64().unwrap_or(DEFAULT_COMMIT_LIMIT);
            client
                .recent_commits(token, repo, limit)
                .await
                .map(|commits| serde_json::to_value(commits).unwrap_or_default())
        }
        "create_issue" => {
            let title = args["title"].as_str().unwrap_or_default();
            if title.trim().is_empty() {
                return failure("A issue precisa de um título.");
            }
            let body = args["body"].as_str().unwrap_or_default();
            client.create_issue(token, repo, title, body).await
        }
        "get_file_content" => {
            let path = args["path"].as_str().unwrap_or_default();
            client
                .file_content(token, repo, path)
                .await
                .map(|content| json!({ "path": path, "content": content }))
        }
        "list_directory" => {
            let path = args["path"].as_str().unwrap_or_default();
            client.list_directory(token, repo, path).await
        }
        "search_code" => {
            let query = args["query"].as_str().unwrap_or_default();
            client.search_code(token, repo, query).await
        }
        "get_readme" => client
            .readme(token, repo)
            .await
            .map(|content| json!({ "content": content })),
        "list_branches" => client.branches(token, repo).await,
        "get_commit_details" => {
            let sha = args["sha"].as_str().unwrap_or_default();
            client.commit_detail(token, repo, sha).await
        }
        "get_repository_tree" => {
            let depth = args["depth"].as_u64().unwrap_or(DEFAULT_TREE_DEPTH);
            client.tree(token, repo, depth).await
        }
        other => return failure(format!("Ferramenta desconhecida: {other}")),
    };

    match result {
        Ok(data) => json!({ "success": true, "data": data }),
        Err(err) => failure(err.message),
    }
}

fn failure(message: impl Into<String>) -> JsonValue {
    json!({ "success": false, "error": message.into() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_localized_messages() {
        assert_eq!(
            GithubError::from_status(401).message,
            "Token do GitHub inválido ou expirado."
        );
        assert_eq!(
            GithubError::from_status(403).message,
            "Acesso negado ou limite de requisições do GitHub atingido."
        );
        assert_eq!(
            GithubError::from_status(404).message,
            "Repositório ou recurso não encontrado."
        );
        let other = GithubError::from_status(500);
        assert_eq!(other.status, Some(500));
        assert!(other.message.contains("HTTP 500"));
    }

    #[tokio::test]
    async fn missing_binding_fails_without_network() {
        let client = GithubClient::new();
        let result =
            execute_repository_tool(&client, None, "get_repository_info", &json!({})).await;
        assert_eq!(result["success"], json!(false));
        assert!(result["error"].as_str().unwrap().contains("Nenhum repositório"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_in_the_envelope() {
        let client = GithubClient::new();
        let binding = RepoBinding {
            token: "t".to_string(),
            repo: "octo/repo".to_string(),
        };
        let result =
            execute_repository_tool(&client, Some(&binding), "fly_to_the_moon", &json!({})).await;
        assert_eq!(result["success"], json!(false));
        assert!(result["error"].as_str().unwrap().contains("desconhecida"));
    }

    #[test]
    fn commit_summary_takes_the_first_message_line() {
        let raw = json!({
            "sha": "abc123",
            "html_url": "https://github.com/octo/repo/commit/abc123",
            "commit": {
                "message": "fix: handle empty input\n\nlong body here",
                "author": { "name": "Ada", "date": "2025-03-10T12:00:00Z" }
            }
        });
        let info = map_commit_summary(&raw);
        assert_eq!(info.message, "fix: handle empty input");
        assert_eq!(info.author, "Ada");
    }

    #[test]
    fn search_path_percent_encodes_the_query() {
        assert_eq!(
            search_code_path("octo/repo", "fn main"),
            "/search/code?q=fn%20main%20repo%3Aocto%2Frepo"
        );
        assert_eq!(
            search_code_path("octo/repo", "a+b"),
            "/search/code?q=a%2Bb%20repo%3Aocto%2Frepo"
        );
    }
}
