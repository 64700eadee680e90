use crate::server::ServerRouter;
use axum::Router;

mod pages;
mod rpc;

pub fn routes() -> ServerRouter {
    Router::new().merge(rpc::routes()).merge(pages::routes())
}
