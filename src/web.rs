//! HTTP API Handlers
//!
//! JSON endpoints for accounts, repositories, stars, issues, follows and the
//! admin console. Every handler authorizes the request, resolves the target
//! entity, then mutates or reads state; failures are `ApiError`s rendered as
//! `{"success": false, "message": ...}` with the matching status code.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, patch, post},
};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::auth;
use crate::config::Config;
use crate::database::{Database, DatabaseError};
use crate::error::ApiError;
use crate::models::{
    AdminLoginRequest, AdminUser, CreateIssueRequest, CreatePullRequestRequest,
    CreateRepositoryRequest, ExploreUser, Issue, PublicRepository, PullRequest, Repository,
    SigninRequest, SignupRequest, Stats, UpdateIssueRequest, UpdatePullRequestRequest, User,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
}

impl AppState {
    pub fn new(db: Database, config: Config) -> Self {
        Self { db, config }
    }
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    success: bool,
    token: String,
    user: User,
}

#[derive(Debug, Serialize)]
struct RepositoriesResponse {
    success: bool,
    repositories: Vec<Repository>,
}

#[derive(Debug, Serialize)]
struct ExploreRepositoriesResponse {
    success: bool,
    repositories: Vec<PublicRepository>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RepositoryDetailResponse {
    success: bool,
    repository: Repository,
    is_starred: bool,
}

#[derive(Debug, Serialize)]
struct IssuesResponse {
    success: bool,
    issues: Vec<Issue>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestsResponse {
    success: bool,
    pull_requests: Vec<PullRequest>,
}

// ========== Health ==========

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "devit",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

// ========== Auth ==========

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if req.username.is_empty()
        || req.email.is_empty()
        || req.full_name.is_empty()
        || req.password.is_empty()
    {
        return Err(ApiError::InvalidInput("All fields are required".to_string()));
    }

    let password_hash = auth::hash_password(&req.password).map_err(|_| ApiError::Internal)?;
    let user = state
        .db
        .create_user(&req.username, &req.email, &req.full_name, &password_hash)
        .await?;

    info!(user_id = user.id, username = user.username.as_str(), "User signed up");

    let token =
        auth::issue_user_token(&user, &state.config.jwt_secret).map_err(|_| ApiError::Internal)?;

    Ok(Json(AuthResponse {
        success: true,
        token,
        user: user.into(),
    }))
}

async fn signin(
    State(state): State<AppState>,
    Json(req): Json<SigninRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::InvalidInput("Email and password are required".to_string()));
    }

    // An unknown email and a wrong password produce the same rejection, so
    // responses never reveal which of the two was wrong.
    let user = state
        .db
        .get_user_by_email(&req.email)
        .await?
        .filter(|user| auth::verify_password(&req.password, &user.password_hash))
        .ok_or_else(|| ApiError::Unauthenticated("Invalid email or password".to_string()))?;

    state.db.touch_last_active(user.id).await?;

    let token =
        auth::issue_user_token(&user, &state.config.jwt_secret).map_err(|_| ApiError::Internal)?;

    Ok(Json(AuthResponse {
        success: true,
        token,
        user: user.into(),
    }))
}

async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let claims = auth::authenticate(&headers, &state.config.jwt_secret)?;
    let user = state.db.get_user_by_id(claims.user_id()?).await?;

    Ok(Json(json!({
        "success": true,
        "user": User::from(user),
    })))
}

// ========== Admin Console ==========

async fn admin_login(
    State(state): State<AppState>,
    Json(req): Json<AdminLoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.username != state.config.admin_username || req.password != state.config.admin_password {
        return Err(ApiError::Unauthenticated("Invalid credentials".to_string()));
    }

    let token = auth::issue_admin_token(&req.username, &state.config.jwt_secret)
        .map_err(|_| ApiError::Internal)?;

    info!(username = req.username.as_str(), "Admin logged in");

    Ok(Json(json!({
        "success": true,
        "token": token,
        "user": {
            "id": "admin-1",
            "username": req.username,
            "role": "Administrator",
        },
    })))
}

async fn admin_users(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    auth::require_admin(&headers, &state.config.jwt_secret)?;

    let users: Vec<AdminUser> = state
        .db
        .list_users()
        .await?
        .into_iter()
        .map(AdminUser::from)
        .collect();

    Ok(Json(json!({
        "success": true,
        "total": users.len(),
        "users": users,
    })))
}

async fn admin_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Stats>, ApiError> {
    auth::require_admin(&headers, &state.config.jwt_secret)?;
    let stats = state.db.stats().await?;
    Ok(Json(stats.into()))
}

// ========== Repositories ==========

async fn list_repositories(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RepositoriesResponse>, ApiError> {
    let claims = auth::authenticate(&headers, &state.config.jwt_secret)?;
    let repositories = state
        .db
        .list_repositories_by_owner(claims.user_id()?)
        .await?
        .into_iter()
        .map(Repository::from)
        .collect();

    Ok(Json(RepositoriesResponse {
        success: true,
        repositories,
    }))
}

async fn create_repository(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateRepositoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = auth::authenticate(&headers, &state.config.jwt_secret)?;

    if req.name.is_empty() {
        return Err(ApiError::InvalidInput("Repository name is required".to_string()));
    }

    let repository = state
        .db
        .create_repository(claims.user_id()?, &req.name, &req.description, req.is_private)
        .await?;

    info!(
        repository_id = repository.id,
        owner = claims.username.as_str(),
        name = repository.name.as_str(),
        "Repository created"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "repository": Repository::from(repository),
        })),
    ))
}

async fn explore_repositories(
    State(state): State<AppState>,
) -> Result<Json<ExploreRepositoriesResponse>, ApiError> {
    let repositories = state
        .db
        .list_public_repositories()
        .await?
        .into_iter()
        .map(PublicRepository::from)
        .collect();

    Ok(Json(ExploreRepositoriesResponse {
        success: true,
        repositories,
    }))
}

async fn get_repository(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<RepositoryDetailResponse>, ApiError> {
    let claims = auth::authenticate(&headers, &state.config.jwt_secret)?;
    let user_id = claims.user_id()?;

    let repository = state.db.find_repository(user_id, &name).await?;
    let is_starred = state.db.is_starred(user_id, repository.id).await?;

    Ok(Json(RepositoryDetailResponse {
        success: true,
        repository: repository.into(),
        is_starred,
    }))
}

// ========== Stars ==========

/// Already-starred / not-starred conflicts surface as 400 on the wire.
fn star_error(err: DatabaseError) -> ApiError {
    match err {
        DatabaseError::Conflict(msg) => ApiError::InvalidInput(msg),
        e => e.into(),
    }
}

async fn star_repository(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = auth::authenticate(&headers, &state.config.jwt_secret)?;
    let user_id = claims.user_id()?;

    let repository = state.db.find_repository(user_id, &name).await?;
    state
        .db
        .star_repository(user_id, repository.id)
        .await
        .map_err(star_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Repository starred successfully",
    })))
}

async fn unstar_repository(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = auth::authenticate(&headers, &state.config.jwt_secret)?;
    let user_id = claims.user_id()?;

    let repository = state.db.find_repository(user_id, &name).await?;
    state
        .db
        .unstar_repository(user_id, repository.id)
        .await
        .map_err(star_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Repository unstarred successfully",
    })))
}

// ========== Issues ==========

async fn list_issues(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<IssuesResponse>, ApiError> {
    let claims = auth::authenticate(&headers, &state.config.jwt_secret)?;

    let repository = state.db.find_repository(claims.user_id()?, &name).await?;
    let issues = state
        .db
        .list_issues(repository.id)
        .await?
        .into_iter()
        .map(Issue::from)
        .collect();

    Ok(Json(IssuesResponse {
        success: true,
        issues,
    }))
}

async fn create_issue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(req): Json<CreateIssueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = auth::authenticate(&headers, &state.config.jwt_secret)?;
    let user_id = claims.user_id()?;

    if req.title.is_empty() {
        return Err(ApiError::InvalidInput("Issue title is required".to_string()));
    }

    let repository = state.db.find_repository(user_id, &name).await?;
    let issue = state
        .db
        .create_issue(repository.id, user_id, &req.title, &req.body)
        .await?;

    info!(
        repository = name.as_str(),
        issue_number = issue.number,
        author = claims.username.as_str(),
        "Issue created"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "issue": Issue::from(issue),
        })),
    ))
}

async fn update_issue(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, number)): Path<(String, i64)>,
    Json(req): Json<UpdateIssueRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = auth::authenticate(&headers, &state.config.jwt_secret)?;

    let repository = state.db.find_repository(claims.user_id()?, &name).await?;
    let issue = state
        .db
        .set_issue_state(repository.id, number, req.state)
        .await?;

    Ok(Json(json!({
        "success": true,
        "issue": Issue::from(issue),
    })))
}

// ========== Pull Requests ==========

async fn list_pull_requests(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<PullRequestsResponse>, ApiError> {
    let claims = auth::authenticate(&headers, &state.config.jwt_secret)?;

    let repository = state.db.find_repository(claims.user_id()?, &name).await?;
    let pull_requests = state
        .db
        .list_pull_requests(repository.id)
        .await?
        .into_iter()
        .map(PullRequest::from)
        .collect();

    Ok(Json(PullRequestsResponse {
        success: true,
        pull_requests,
    }))
}

async fn create_pull_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(req): Json<CreatePullRequestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = auth::authenticate(&headers, &state.config.jwt_secret)?;
    let user_id = claims.user_id()?;

    if req.title.is_empty() || req.head_branch.is_empty() || req.base_branch.is_empty() {
        return Err(ApiError::InvalidInput(
            "Title, head branch and base branch are required".to_string(),
        ));
    }
    if req.head_branch == req.base_branch {
        return Err(ApiError::InvalidInput(
            "Head and base branch must differ".to_string(),
        ));
    }

    let repository = state.db.find_repository(user_id, &name).await?;
    let pull_request = state
        .db
        .create_pull_request(
            repository.id,
            user_id,
            &req.title,
            &req.body,
            &req.head_branch,
            &req.base_branch,
        )
        .await?;

    info!(
        repository = name.as_str(),
        pull_request_number = pull_request.number,
        author = claims.username.as_str(),
        "Pull request opened"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "pullRequest": PullRequest::from(pull_request),
        })),
    ))
}

async fn get_pull_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, number)): Path<(String, i64)>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = auth::authenticate(&headers, &state.config.jwt_secret)?;

    let repository = state.db.find_repository(claims.user_id()?, &name).await?;
    let pull_request = state.db.get_pull_request(repository.id, number).await?;

    Ok(Json(json!({
        "success": true,
        "pullRequest": PullRequest::from(pull_request),
    })))
}

async fn update_pull_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((name, number)): Path<(String, i64)>,
    Json(req): Json<UpdatePullRequestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = auth::authenticate(&headers, &state.config.jwt_secret)?;

    let repository = state.db.find_repository(claims.user_id()?, &name).await?;
    let pull_request = state
        .db
        .set_pull_request_state(repository.id, number, req.state)
        .await?;

    Ok(Json(json!({
        "success": true,
        "pullRequest": PullRequest::from(pull_request),
    })))
}

// ========== Users ==========

async fn explore_users(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let users: Vec<ExploreUser> = state
        .db
        .explore_users()
        .await?
        .into_iter()
        .map(ExploreUser::from)
        .collect();

    Ok(Json(json!({
        "success": true,
        "users": users,
    })))
}

async fn follow_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = auth::authenticate(&headers, &state.config.jwt_secret)?;

    let target = state.db.get_user_by_username(&username).await?;
    state.db.follow_user(claims.user_id()?, target.id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Now following this user",
    })))
}

async fn unfollow_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = auth::authenticate(&headers, &state.config.jwt_secret)?;

    let target = state.db.get_user_by_username(&username).await?;
    state.db.unfollow_user(claims.user_id()?, target.id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "No longer following this user",
    })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/signin", post(signin))
        .route("/api/auth/me", get(me))
        .route("/api/admin/auth/login", post(admin_login))
        .route("/api/admin/users", get(admin_users))
        .route("/api/admin/stats", get(admin_stats))
        .route("/api/users/explore", get(explore_users))
        .route("/api/users/{username}/follow", post(follow_user))
        .route("/api/users/{username}/follow", delete(unfollow_user))
        .route("/api/repositories", get(list_repositories).post(create_repository))
        .route("/api/repositories/explore", get(explore_repositories))
        .route("/api/repositories/{name}", get(get_repository))
        .route("/api/repositories/{name}/star", post(star_repository))
        .route("/api/repositories/{name}/star", delete(unstar_repository))
        .route("/api/repositories/{name}/issues", get(list_issues).post(create_issue))
        .route("/api/repositories/{name}/issues/{number}", patch(update_issue))
        .route(
            "/api/repositories/{name}/pulls",
            get(list_pull_requests).post(create_pull_request),
        )
        .route(
            "/api/repositories/{name}/pulls/{number}",
            get(get_pull_request).patch(update_pull_request),
        )
}
