use crate::server::{
    Result, ServerError, ServerRouter, ServerState,
    json::Json,
    pages::{home_page, post_page, profile_page},
    prefetch::ServerPrefetchHelper,
    procedures::Context,
};
use axum::{Router, extract::State};
use axum_extra::routing::{RouterExt, TypedPath};
use chirp_client::pages::{PageProps, PostParams, ProfileParams};
use serde::Deserialize;

pub fn routes() -> ServerRouter {
    Router::new()
        .typed_get(get_home)
        .typed_get(get_profile)
        .typed_get(get_post)
}

fn helper(state: ServerState) -> ServerPrefetchHelper {
    ServerPrefetchHelper::new(Context::anonymous(state.store, state.rate_limiter))
}

#[derive(TypedPath)]
#[typed_path("/pages/home")]
struct HomePath;

async fn get_home(_: HomePath, State(state): State<ServerState>) -> Result<Json<PageProps<()>>> {
    Ok(Json(home_page(helper(state)).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/pages/profile/{slug}", rejection(ServerError))]
struct ProfilePath {
    slug: String,
}

async fn get_profile(
    ProfilePath { slug }: ProfilePath,
    State(state): State<ServerState>,
) -> Result<Json<PageProps<ProfileParams>>> {
    Ok(Json(profile_page(helper(state), &slug).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/pages/post/{id}", rejection(ServerError))]
struct PostPath {
    id: String,
}

async fn get_post(
    PostPath { id }: PostPath,
    State(state): State<ServerState>,
) -> Result<Json<PageProps<PostParams>>> {
    Ok(Json(post_page(helper(state), &id).await?))
}
