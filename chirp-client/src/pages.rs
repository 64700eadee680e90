//! The three pages of the app, built from the props the server generates for them.
//!
//! A page hydrates the prefetched state into the client first, so its initial
//! query is answered from the cache without a round trip.

use crate::{
    cache::{CacheEntry, QueryStatus},
    client::{Query, RemoteProcedureClient},
    feed::{FeedController, FeedSource},
    hydration::DehydratedState,
    mutation::MutationController,
    view::PostCard,
};
use chirp_common::{
    error::{ErrorKind, RpcError},
    model::{
        Id,
        post::{PostMarker, PostWithAuthor},
        user::{Author, Username},
    },
    procedure::{GetPostById, GetUserByUsername, PostByIdInput, UsernameInput},
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const HOME_TITLE: &str = "chirp";

/// What the server hands a page: the dehydrated cache plus the route parameters.
#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct PageProps<Params> {
    pub state: DehydratedState,
    pub params: Params,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct ProfileParams {
    pub username: Username,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct PostParams {
    pub id: Id<PostMarker>,
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum PageState<T> {
    Loading,
    /// The subject of the page does not exist. This is not an error.
    NotFound,
    Error(RpcError),
    Ready(T),
}

impl<T> PageState<T> {
    fn from_entry(entry: CacheEntry<T>) -> Self {
        match entry.status {
            QueryStatus::Idle | QueryStatus::Loading => PageState::Loading,
            QueryStatus::Error => match entry.error {
                Some(error) if error.kind == ErrorKind::NotFound => PageState::NotFound,
                Some(error) => PageState::Error(error),
                None => PageState::Error(RpcError::unknown("Failed to load page")),
            },
            QueryStatus::Success => entry.data.map_or(PageState::NotFound, PageState::Ready),
        }
    }

    #[must_use]
    pub fn ready(&self) -> Option<&T> {
        match self {
            PageState::Ready(value) => Some(value),
            PageState::Loading | PageState::NotFound | PageState::Error(_) => None,
        }
    }
}

impl<T> PageState<Option<T>> {
    fn flatten(self) -> PageState<T> {
        match self {
            PageState::Ready(Some(value)) => PageState::Ready(value),
            PageState::Ready(None) | PageState::NotFound => PageState::NotFound,
            PageState::Loading => PageState::Loading,
            PageState::Error(error) => PageState::Error(error),
        }
    }
}

/// `/`: the global feed, and a composer for signed in users.
pub struct HomePage {
    feed: FeedController,
    composer: Option<MutationController>,
}

impl HomePage {
    pub fn mount(
        client: &RemoteProcedureClient,
        props: PageProps<()>,
        signed_in: Option<Author>,
    ) -> Self {
        client.hydrate(props.state);

        Self {
            feed: FeedController::mount(client, FeedSource::Global),
            composer: signed_in.map(|author| MutationController::new(client.clone(), author)),
        }
    }

    #[must_use]
    pub fn title(&self) -> &'static str {
        HOME_TITLE
    }

    pub fn feed(&mut self) -> &mut FeedController {
        &mut self.feed
    }

    #[must_use]
    pub fn composer(&self) -> Option<&MutationController> {
        self.composer.as_ref()
    }
}

/// `/@{username}`: a user's profile and their posts.
pub struct ProfilePage {
    client: RemoteProcedureClient,
    user: Query<GetUserByUsername>,
}

impl ProfilePage {
    pub fn mount(client: &RemoteProcedureClient, props: PageProps<ProfileParams>) -> Self {
        client.hydrate(props.state);
        let user = client.query::<GetUserByUsername>(UsernameInput {
            username: props.params.username,
        });

        Self {
            client: client.clone(),
            user,
        }
    }

    #[must_use]
    pub fn state(&self) -> PageState<Author> {
        PageState::from_entry(self.user.entry()).flatten()
    }

    pub async fn settled(&mut self) -> PageState<Author> {
        PageState::from_entry(self.user.settled().await).flatten()
    }

    #[must_use]
    pub fn title(&self) -> Option<String> {
        self.state()
            .ready()
            .map(|author| author.username.get().to_owned())
    }

    /// The user's feed, once the user is known.
    #[must_use]
    pub fn feed(&self) -> Option<FeedController> {
        let PageState::Ready(author) = self.state() else {
            return None;
        };
        Some(FeedController::mount(
            &self.client,
            FeedSource::Author(author.id),
        ))
    }
}

/// `/post/{id}`: a single post.
pub struct PostPage {
    post: Query<GetPostById>,
}

impl PostPage {
    pub fn mount(client: &RemoteProcedureClient, props: PageProps<PostParams>) -> Self {
        client.hydrate(props.state);

        Self {
            post: client.query::<GetPostById>(PostByIdInput {
                id: props.params.id,
            }),
        }
    }

    #[must_use]
    pub fn state(&self) -> PageState<PostWithAuthor> {
        PageState::from_entry(self.post.entry())
    }

    pub async fn settled(&mut self) -> PageState<PostWithAuthor> {
        PageState::from_entry(self.post.settled().await)
    }

    #[must_use]
    pub fn title(&self) -> Option<String> {
        self.state().ready().map(|post| {
            format!(
                "{} - @{}",
                post.post().content.get(),
                post.author().username.get()
            )
        })
    }

    #[must_use]
    pub fn card(&self, now: OffsetDateTime) -> Option<PostCard> {
        self.state().ready().map(|post| PostCard::new(post, now))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        client::RemoteProcedureClient,
        feed::FeedState,
        hydration::dehydrate,
        pages::{
            HOME_TITLE, HomePage, PageProps, PageState, PostPage, PostParams, ProfilePage,
            ProfileParams,
        },
        testing::{FakeServer, author},
    };
    use chirp_common::{
        model::user::Username,
        procedure::{GetPostById, GetUserByUsername, PostByIdInput, UsernameInput},
    };
    use std::sync::Arc;
    use time::OffsetDateTime;

    fn username(name: &str) -> Username {
        Username::new(name.to_owned()).unwrap()
    }

    /// Fetches through one client and returns its cache as page props.
    async fn props_for<Params>(server: &Arc<FakeServer>, params: Params) -> PageProps<Params> {
        let prefetcher = RemoteProcedureClient::new(server.clone());
        prefetcher
            .fetch::<GetUserByUsername>(UsernameInput {
                username: username("alice"),
            })
            .await;
        prefetcher
            .fetch::<GetUserByUsername>(UsernameInput {
                username: username("ghost"),
            })
            .await;
        prefetcher
            .fetch::<GetPostById>(PostByIdInput { id: 100.into() })
            .await;

        PageProps {
            state: dehydrate(&prefetcher.cache().snapshot()),
            params,
        }
    }

    #[tokio::test]
    async fn hydrated_profile_renders_without_a_fetch() {
        let server = Arc::new(FakeServer::with_posts(1));
        let props = props_for(
            &server,
            ProfileParams {
                username: username("alice"),
            },
        )
        .await;
        let calls_before = server.total_calls();

        let client = RemoteProcedureClient::new(server.clone());
        let page = ProfilePage::mount(&client, props);

        assert_eq!(page.state(), PageState::Ready(author()));
        assert_eq!(page.title().as_deref(), Some("alice"));
        assert_eq!(server.total_calls(), calls_before);

        let mut feed = page.feed().unwrap();
        assert!(matches!(feed.settled().await, FeedState::Ready(posts) if posts.len() == 1));
    }

    #[tokio::test]
    async fn missing_user_is_not_found_not_an_error() {
        let server = Arc::new(FakeServer::with_posts(0));
        let props = props_for(
            &server,
            ProfileParams {
                username: username("ghost"),
            },
        )
        .await;

        let client = RemoteProcedureClient::new(server);
        let mut page = ProfilePage::mount(&client, props);

        assert_eq!(page.settled().await, PageState::NotFound);
        assert!(page.title().is_none());
        assert!(page.feed().is_none());
    }

    #[tokio::test]
    async fn post_page_titles_and_cards_the_post() {
        let server = Arc::new(FakeServer::with_posts(1));
        let props = props_for(&server, PostParams { id: 100.into() }).await;

        let client = RemoteProcedureClient::new(server);
        let page = PostPage::mount(&client, props);

        assert_eq!(
            page.title().as_deref(),
            Some("post number 0 - @alice")
        );
        let card = page.card(OffsetDateTime::now_utc()).unwrap();
        assert_eq!(card.permalink, "/post/100");
    }

    #[tokio::test]
    async fn unknown_post_is_not_found() {
        let server = Arc::new(FakeServer::with_posts(0));
        let client = RemoteProcedureClient::new(server);

        let mut page = PostPage::mount(
            &client,
            PageProps {
                state: Default::default(),
                params: PostParams { id: 5.into() },
            },
        );

        assert_eq!(page.state(), PageState::Loading);
        assert_eq!(page.settled().await, PageState::NotFound);
    }

    #[tokio::test]
    async fn home_page_offers_a_composer_only_when_signed_in() {
        let server = Arc::new(FakeServer::with_posts(0));
        let client = RemoteProcedureClient::new(server);

        let mut anonymous = HomePage::mount(&client, PageProps::default(), None);
        assert!(anonymous.composer().is_none());
        assert_eq!(anonymous.title(), HOME_TITLE);
        assert_eq!(anonymous.feed().settled().await, FeedState::Empty);

        let signed_in = HomePage::mount(&client, PageProps::default(), Some(author()));
        assert_eq!(signed_in.composer().unwrap().author(), &author());
    }
}
