//! Display data for a single post, as shown in every feed and on the post page.

use chirp_common::model::{Id, post::PostWithAuthor, user::UserMarker};
use time::{Duration, OffsetDateTime};

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct PostCard {
    pub author_id: Id<UserMarker>,
    pub author_handle: String,
    pub profile_image_url: String,
    pub content: String,
    pub relative_time: String,
    pub permalink: String,
    pub profile_link: String,
}

impl PostCard {
    #[must_use]
    pub fn new(post: &PostWithAuthor, now: OffsetDateTime) -> Self {
        let author = post.author();
        let post = post.post();

        Self {
            author_id: author.id,
            author_handle: format!("@{}", author.username.get()),
            profile_image_url: author.profile_image_url.clone(),
            content: post.content.get().to_owned(),
            relative_time: relative_time(post.created_at, now),
            permalink: format!("/post/{}", post.id),
            profile_link: format!("/@{}", author.username.get()),
        }
    }
}

/// Describes `then` relative to `now` in words, like "3 minutes ago".
///
/// Amounts are rounded and each unit is used from the point where rounding the
/// next smaller one would look odd: 45 seconds, 45 minutes, 22 hours, 26 days,
/// 11 months.
#[must_use]
pub fn relative_time(then: OffsetDateTime, now: OffsetDateTime) -> String {
    let elapsed = now - then;
    let phrase = duration_phrase(elapsed.abs());

    if elapsed.is_negative() {
        format!("in {phrase}")
    } else {
        format!("{phrase} ago")
    }
}

fn duration_phrase(duration: Duration) -> String {
    let seconds = duration.as_seconds_f64();
    let minutes = seconds / 60.0;
    let hours = minutes / 60.0;
    let days = hours / 24.0;
    let months = days / 30.0;
    let years = months / 12.0;

    let (amount, unit, single) = if seconds < 45.0 {
        return "a few seconds".to_owned();
    } else if seconds < 90.0 {
        (1.0, "minutes", "a minute")
    } else if minutes < 45.0 {
        (minutes, "minutes", "a minute")
    } else if minutes < 90.0 {
        (1.0, "hours", "an hour")
    } else if hours < 22.0 {
        (hours, "hours", "an hour")
    } else if hours < 36.0 {
        (1.0, "days", "a day")
    } else if days < 26.0 {
        (days, "days", "a day")
    } else if days < 46.0 {
        (1.0, "months", "a month")
    } else if months < 11.0 {
        (months, "months", "a month")
    } else if months < 18.0 {
        (1.0, "years", "a year")
    } else {
        (years, "years", "a year")
    };

    #[allow(clippy::cast_possible_truncation)]
    let amount = amount.round() as i64;
    match amount {
        ..=1 => single.to_owned(),
        amount => format!("{amount} {unit}"),
    }
}

#[cfg(test)]
mod tests {
    use crate::view::{PostCard, relative_time};
    use chirp_common::model::{
        post::{Post, PostContent, PostWithAuthor},
        user::{Author, Username},
    };
    use time::{Duration, macros::datetime};

    #[test]
    fn relative_times_read_naturally() {
        let now = datetime!(2025-06-01 12:00 UTC);
        let ago = |duration: Duration| relative_time(now - duration, now);

        assert_eq!(ago(Duration::seconds(10)), "a few seconds ago");
        assert_eq!(ago(Duration::seconds(60)), "a minute ago");
        assert_eq!(ago(Duration::minutes(3)), "3 minutes ago");
        assert_eq!(ago(Duration::minutes(50)), "an hour ago");
        assert_eq!(ago(Duration::hours(5)), "5 hours ago");
        assert_eq!(ago(Duration::hours(30)), "a day ago");
        assert_eq!(ago(Duration::days(10)), "10 days ago");
        assert_eq!(ago(Duration::days(30)), "a month ago");
        assert_eq!(ago(Duration::days(90)), "3 months ago");
        assert_eq!(ago(Duration::days(400)), "a year ago");
        assert_eq!(ago(Duration::days(365 * 3)), "3 years ago");
        assert_eq!(relative_time(now + Duration::minutes(5), now), "in 5 minutes");
    }

    #[test]
    fn card_links_to_post_and_profile() {
        let author = Author {
            id: 1.into(),
            username: Username::new("alice".to_owned()).unwrap(),
            profile_image_url: "https://img.example/alice.png".to_owned(),
        };
        let post = Post {
            id: 42.into(),
            content: PostContent::new("🦀".to_owned()).unwrap(),
            created_at: datetime!(2025-06-01 11:57 UTC),
            author_id: 1.into(),
        };
        let post = PostWithAuthor::new(post, author).unwrap();

        let card = PostCard::new(&post, datetime!(2025-06-01 12:00 UTC));

        assert_eq!(card.author_handle, "@alice");
        assert_eq!(card.permalink, "/post/42");
        assert_eq!(card.profile_link, "/@alice");
        assert_eq!(card.relative_time, "3 minutes ago");
        assert_eq!(card.content, "🦀");
    }
}
