use actix_web::{delete, get, http::StatusCode, patch, post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db::{Role, User, UserQuery},
    error::{AppError, Result},
    guards::{require_role, require_self_or_role},
    middleware::{hint_status, AuthenticatedUser},
    pagination::{PageRequest, SearchScope},
    services::{NewUser, UserPatch, UserService},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            is_email_verified: user.is_email_verified,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListUsersParams {
    pub search: Option<String>,
    pub scope: Option<String>,
    pub role: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListUsersResponse {
    pub results: Vec<UserResponse>,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
    pub total_results: u64,
}

fn parse_role(raw: Option<&str>) -> Result<Option<Role>> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        Some(raw) => raw.parse::<Role>().map(Some).map_err(AppError::invalid_argument),
        None => Ok(None),
    }
}

impl ListUsersParams {
    fn split(self) -> Result<(UserQuery, PageRequest)> {
        let scope = SearchScope::parse(self.scope.as_deref().unwrap_or_default())
            .ok_or_else(|| AppError::invalid_argument("Invalid search scope"))?;

        let query = UserQuery {
            search: self.search.filter(|s| !s.trim().is_empty()),
            scope,
            role: parse_role(self.role.as_deref())?,
        };
        let page = PageRequest {
            page: self.page,
            limit: self.limit,
            sort: self.sort,
        };
        Ok((query, page))
    }
}

#[post("")]
pub async fn create_user(
    user: AuthenticatedUser,
    req: web::Json<CreateUserRequest>,
    users: web::Data<UserService>,
) -> Result<HttpResponse> {
    require_role(&user, Role::Admin)?;

    let req = req.into_inner();
    let created = users
        .create_user(NewUser {
            role: parse_role(req.role.as_deref())?.unwrap_or_default(),
            name: req.name,
            email: req.email,
            password: req.password,
        })
        .await?;

    Ok(hint_status(&mut HttpResponse::Ok(), StatusCode::CREATED).json(UserResponse::from(&created)))
}

#[get("")]
pub async fn list_users(
    user: AuthenticatedUser,
    params: web::Query<ListUsersParams>,
    users: web::Data<UserService>,
) -> Result<HttpResponse> {
    require_role(&user, Role::Admin)?;

    let (query, page) = params.into_inner().split()?;
    let listing = users.list_users(&query, page).await?;

    Ok(HttpResponse::Ok().json(ListUsersResponse {
        results: listing.users.iter().map(UserResponse::from).collect(),
        page: listing.page,
        limit: listing.limit,
        total_pages: listing.total_pages,
        total_results: listing.total_results,
    }))
}

#[get("/{id}")]
pub async fn get_user(
    user: AuthenticatedUser,
    path: web::Path<String>,
    users: web::Data<UserService>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    require_self_or_role(&user, &id, Role::Admin)?;

    let found = users.get_user(&id).await?;
    Ok(HttpResponse::Ok().json(UserResponse::from(&found)))
}

#[patch("/{id}")]
pub async fn update_user(
    user: AuthenticatedUser,
    path: web::Path<String>,
    req: web::Json<UpdateUserRequest>,
    users: web::Data<UserService>,
) -> Result<HttpResponse> {
    require_role(&user, Role::Admin)?;

    let req = req.into_inner();
    let updated = users
        .update_user(
            &path.into_inner(),
            UserPatch {
                name: req.name,
                email: req.email,
                password: req.password,
            },
        )
        .await?;

    Ok(HttpResponse::Ok().json(UserResponse::from(&updated)))
}

#[delete("/{id}")]
pub async fn delete_user(
    user: AuthenticatedUser,
    path: web::Path<String>,
    users: web::Data<UserService>,
) -> Result<HttpResponse> {
    require_role(&user, Role::Admin)?;

    users.delete_user(&path.into_inner()).await?;
    Ok(hint_status(&mut HttpResponse::Ok(), StatusCode::NO_CONTENT).finish())
}
