use crate::server::{
    Result, ServerRouter, ServerState,
    auth::Session,
    json::Json,
    procedures::{Context, ServerProcedure},
};
use axum::{Router, extract::State, routing::post};
use chirp_common::procedure::{
    CreatePost, GetAllPosts, GetPostById, GetPostsByUserId, GetUserByUsername,
};

pub fn routes() -> ServerRouter {
    Router::new()
        .route(&path::<GetAllPosts>(), post(call::<GetAllPosts>))
        .route(&path::<GetPostsByUserId>(), post(call::<GetPostsByUserId>))
        .route(&path::<GetPostById>(), post(call::<GetPostById>))
        .route(&path::<CreatePost>(), post(call::<CreatePost>))
        .route(&path::<GetUserByUsername>(), post(call::<GetUserByUsername>))
}

fn path<P: ServerProcedure>() -> String {
    format!("/rpc/{}", P::NAME)
}

async fn call<P: ServerProcedure>(
    State(state): State<ServerState>,
    Session(session): Session,
    Json(input): Json<P::Input>,
) -> Result<Json<P::Output>> {
    let ctx = Context {
        store: state.store,
        rate_limiter: state.rate_limiter,
        session,
    };

    Ok(Json(P::call(&ctx, input).await?))
}
