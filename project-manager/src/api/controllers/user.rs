use axum::Json;

use crate::api::controllers::auth::AuthSession;
use crate::api::models::auth::UserResponse;

pub async fn info(AuthSession(session): AuthSession) -> Json<UserResponse> {
    Json(UserResponse {
        user: session.user.clone(),
    })
}
