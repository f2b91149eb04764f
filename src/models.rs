//! Domain Models
//!
//! Business entities and the request/response DTOs spoken on the wire.
//! Wire field names are camelCase to match the frontend contract.

use serde::{Deserialize, Serialize};

use crate::database::{
    AdminUserRow, ExploreUserRow, IssueRow, PublicRepositoryRow, PullRequestRow, RepositoryRow,
    StatsRow, UserRow,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    /// Storage representation ('OPEN' / 'CLOSED').
    pub fn as_str(self) -> &'static str {
        match self {
            IssueState::Open => "OPEN",
            IssueState::Closed => "CLOSED",
        }
    }

    pub fn from_db(state: &str) -> Self {
        if state == "CLOSED" {
            IssueState::Closed
        } else {
            IssueState::Open
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
}

impl PullRequestState {
    /// Storage representation ('OPEN' / 'CLOSED' / 'MERGED').
    pub fn as_str(self) -> &'static str {
        match self {
            PullRequestState::Open => "OPEN",
            PullRequestState::Closed => "CLOSED",
            PullRequestState::Merged => "MERGED",
        }
    }

    pub fn from_db(state: &str) -> Self {
        match state {
            "CLOSED" => PullRequestState::Closed,
            "MERGED" => PullRequestState::Merged,
            _ => PullRequestState::Open,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            full_name: row.full_name,
        }
    }
}

/// Display identity attached to repositories and issues.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub language: String,
    pub stars: i64,
    pub forks: i64,
    pub open_issues: i64,
    pub is_private: bool,
    pub owner_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<RepositoryRow> for Repository {
    fn from(row: RepositoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            language: row.language,
            stars: row.star_count,
            forks: row.fork_count,
            open_issues: row.open_issues_count,
            is_private: row.is_private,
            owner_id: row.owner_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryOwner {
    pub name: String,
    pub username: String,
}

/// Public explore listing entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicRepository {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub language: String,
    pub stars: i64,
    pub forks: i64,
    pub is_private: bool,
    pub updated_at: String,
    pub owner: RepositoryOwner,
}

impl From<PublicRepositoryRow> for PublicRepository {
    fn from(row: PublicRepositoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            language: row.language,
            stars: row.star_count,
            forks: row.fork_count,
            is_private: row.is_private,
            updated_at: row.updated_at,
            owner: RepositoryOwner {
                name: row.owner_full_name,
                username: row.owner_username,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub body: String,
    pub state: IssueState,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<String>,
    pub author: UserSummary,
}

impl From<IssueRow> for Issue {
    fn from(row: IssueRow) -> Self {
        Self {
            id: row.id,
            number: row.number,
            title: row.title,
            body: row.body,
            state: IssueState::from_db(&row.state),
            created_at: row.created_at,
            closed_at: row.closed_at,
            author: UserSummary {
                id: row.author_id,
                username: row.author_username,
                full_name: row.author_full_name,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub id: i64,
    pub number: i64,
    pub title: String,
    pub body: String,
    pub state: PullRequestState,
    pub head_branch: String,
    pub base_branch: String,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_at: Option<String>,
    pub author: UserSummary,
}

impl From<PullRequestRow> for PullRequest {
    fn from(row: PullRequestRow) -> Self {
        Self {
            id: row.id,
            number: row.number,
            title: row.title,
            body: row.body,
            state: PullRequestState::from_db(&row.state),
            head_branch: row.head_branch,
            base_branch: row.base_branch,
            created_at: row.created_at,
            closed_at: row.closed_at,
            merged_at: row.merged_at,
            author: UserSummary {
                id: row.author_id,
                username: row.author_username,
                full_name: row.author_full_name,
            },
        }
    }
}

/// Admin console listing entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub status: String,
    pub created_at: String,
    pub last_active: String,
    pub repository_count: i64,
}

impl From<AdminUserRow> for AdminUser {
    fn from(row: AdminUserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            full_name: row.full_name,
            status: row.status.to_lowercase(),
            created_at: row.created_at,
            last_active: row.last_active,
            repository_count: row.repository_count,
        }
    }
}

/// Public user directory entry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExploreUser {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub followers: i64,
    pub following: i64,
    pub repositories: i64,
}

impl From<ExploreUserRow> for ExploreUser {
    fn from(row: ExploreUserRow) -> Self {
        Self {
            id: row.id,
            name: row.full_name,
            username: row.username,
            followers: row.follower_count,
            following: row.following_count,
            repositories: row.repository_count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub user_count: i64,
    pub repository_count: i64,
    pub issue_count: i64,
}

impl From<StatsRow> for Stats {
    fn from(row: StatsRow) -> Self {
        Self {
            user_count: row.user_count,
            repository_count: row.repository_count,
            issue_count: row.issue_count,
        }
    }
}

// DTOs for incoming requests

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    // Absent fields deserialize to empty strings so handlers can answer
    // missing input with 400 instead of a body-rejection 422.
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRepositoryRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateIssueRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateIssueRequest {
    pub state: IssueState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePullRequestRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub head_branch: String,
    #[serde(default)]
    pub base_branch: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePullRequestRequest {
    pub state: PullRequestState,
}
