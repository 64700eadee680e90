//! Page props generation: one prefetch per page, then the dehydrated cache.

use crate::server::prefetch::{PrefetchError, ServerPrefetchHelper};
use chirp_client::pages::{PageProps, PostParams, ProfileParams};
use chirp_common::{
    model::{
        Id, InvalidIdError,
        user::{InvalidUsernameError, Username},
    },
    procedure::{GetAllPosts, GetPostById, GetUserByUsername, PostByIdInput, UsernameInput},
};
use thiserror::Error;

/// A page that cannot be generated at all. Unlike a failed query this is never
/// rendered, the route fails instead.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("Route parameter {0} is missing")]
    MissingParam(&'static str),
    #[error("Profile slug {slug:?} names no valid user: {source}")]
    InvalidSlug {
        slug: String,
        source: InvalidUsernameError,
    },
    #[error("Post id {id:?} is malformed: {source}")]
    InvalidPostId { id: String, source: InvalidIdError },
    #[error(transparent)]
    Prefetch(#[from] PrefetchError),
}

pub async fn home_page(helper: ServerPrefetchHelper) -> Result<PageProps<()>, PageError> {
    helper.prefetch::<GetAllPosts>(()).await?;

    Ok(PageProps {
        state: helper.dehydrate(),
        params: (),
    })
}

/// `slug` is a username, optionally prefixed with `@`.
pub async fn profile_page(
    helper: ServerPrefetchHelper,
    slug: &str,
) -> Result<PageProps<ProfileParams>, PageError> {
    if slug.is_empty() {
        return Err(PageError::MissingParam("slug"));
    }
    let username = Username::from_slug(slug).map_err(|source| PageError::InvalidSlug {
        slug: slug.to_owned(),
        source,
    })?;

    helper
        .prefetch::<GetUserByUsername>(UsernameInput {
            username: username.clone(),
        })
        .await?;

    Ok(PageProps {
        state: helper.dehydrate(),
        params: ProfileParams { username },
    })
}

pub async fn post_page(
    helper: ServerPrefetchHelper,
    id: &str,
) -> Result<PageProps<PostParams>, PageError> {
    if id.is_empty() {
        return Err(PageError::MissingParam("id"));
    }
    let id: Id<_> = id.parse().map_err(|source| PageError::InvalidPostId {
        id: id.to_owned(),
        source,
    })?;

    helper.prefetch::<GetPostById>(PostByIdInput { id }).await?;

    Ok(PageProps {
        state: helper.dehydrate(),
        params: PostParams { id },
    })
}

#[cfg(test)]
mod tests {
    use crate::server::{
        pages::{PageError, post_page, profile_page},
        prefetch::ServerPrefetchHelper,
        procedures::Context,
        rate_limit::RateLimiter,
    };
    use chirp_client::{
        client::RemoteProcedureClient,
        pages::{PageState, ProfilePage},
        transport::Transport,
    };
    use chirp_common::{
        error::RpcError,
        model::user::{CreateUser, Username},
    };
    use chirp_db::{client::Store, memory::MemoryStore};
    use serde_json::Value;
    use std::sync::Arc;

    /// Any call reaching this transport means the page was not served from its props.
    struct Offline;

    #[async_trait::async_trait]
    impl Transport for Offline {
        async fn call(&self, procedure: &str, _: Value) -> Result<Value, RpcError> {
            panic!("{procedure} was fetched instead of hydrated");
        }
    }

    fn helper(store: &Arc<MemoryStore>) -> ServerPrefetchHelper {
        ServerPrefetchHelper::new(Context::anonymous(
            store.clone(),
            Arc::new(RateLimiter::default()),
        ))
    }

    #[tokio::test]
    async fn slug_accepts_an_at_sign() {
        let store = Arc::new(MemoryStore::default());
        let alice = store
            .create_user(&CreateUser {
                username: Username::new("alice".to_owned()).unwrap(),
                profile_image_url: String::new(),
            })
            .await
            .unwrap();

        let props = profile_page(helper(&store), "@alice").await.unwrap();
        assert_eq!(props.params.username, alice.username);

        let client = RemoteProcedureClient::new(Arc::new(Offline));
        let page = ProfilePage::mount(&client, props);
        assert_eq!(page.state(), PageState::Ready(alice));
    }

    #[tokio::test]
    async fn missing_user_renders_not_found() {
        let store = Arc::new(MemoryStore::default());
        let props = profile_page(helper(&store), "alice").await.unwrap();

        let client = RemoteProcedureClient::new(Arc::new(Offline));
        let page = ProfilePage::mount(&client, props);
        assert_eq!(page.state(), PageState::NotFound);
    }

    #[tokio::test]
    async fn bad_parameters_fail_the_page() {
        let store = Arc::new(MemoryStore::default());

        assert!(matches!(
            post_page(helper(&store), "not-a-number").await,
            Err(PageError::InvalidPostId { .. })
        ));
        assert!(matches!(
            post_page(helper(&store), "").await,
            Err(PageError::MissingParam("id"))
        ));
        assert!(matches!(
            profile_page(helper(&store), "@").await,
            Err(PageError::InvalidSlug { .. })
        ));
    }
}
