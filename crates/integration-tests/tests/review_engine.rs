//! Review submission, moderation and aggregate consistency against the
//! in-memory store.

use std::sync::Arc;

use chrono::{Duration, Utc};

use domains::{
    Aggregate, AuthorDisplay, DomainError, LookupError, MockDisplayNameLookup, RateLimitEntry,
    ReviewId, SiteId,
};
use integration_tests::{site, user, Harness};
use services::reviews::{ListReviews, ReviewSort, UpdateReview};

#[tokio::test]
async fn anonymous_rating_is_limited_per_origin_and_site() {
    let h = Harness::new();
    let lake = h.insert(site(40.0, -105.0, "Lost Lake")).await;
    let ridge = h.insert(site(40.1, -105.1, "Ridge Camp")).await;

    let first = h.anon_submit(lake.id, 5, "1.2.3.4").await.unwrap();
    assert!(first.created);
    assert_eq!(
        first.aggregate,
        Aggregate {
            average_rating: Some(5.0),
            review_count: 1
        }
    );

    assert_eq!(
        h.anon_submit(lake.id, 3, "1.2.3.4").await,
        Err(DomainError::RateLimited)
    );

    // Other origins and other sites are unaffected.
    let other = h.anon_submit(lake.id, 3, "5.6.7.8").await.unwrap();
    assert_eq!(other.aggregate.average_rating, Some(4.0));
    assert!(h.anon_submit(ridge.id, 2, "1.2.3.4").await.is_ok());

    h.assert_consistent(lake.id).await;
    h.assert_consistent(ridge.id).await;
}

#[tokio::test]
async fn rate_limit_window_is_rolling() {
    let h = Harness::new();
    let recent = h.insert(site(40.0, -105.0, "Recent")).await;
    let stale = h.insert(site(40.0, -105.2, "Stale")).await;
    let origin = h.origins.hash("1.2.3.4");

    h.store.record_rate_limit(RateLimitEntry {
        origin: origin.clone(),
        site_id: recent.id,
        created_at: Utc::now() - Duration::hours(23),
    });
    h.store.record_rate_limit(RateLimitEntry {
        origin,
        site_id: stale.id,
        created_at: Utc::now() - Duration::hours(25),
    });

    assert_eq!(
        h.anon_submit(recent.id, 4, "1.2.3.4").await,
        Err(DomainError::RateLimited)
    );
    assert!(h.anon_submit(stale.id, 4, "1.2.3.4").await.is_ok());
}

#[tokio::test]
async fn validation_fails_before_any_write() {
    let h = Harness::new();
    let camp = h.insert(site(40.0, -105.0, "Camp")).await;
    let alice = user("alice");

    assert_eq!(
        h.anon_submit(camp.id, 6, "1.2.3.4").await,
        Err(DomainError::InvalidRating)
    );
    assert_eq!(
        h.anon_submit(camp.id, 0, "1.2.3.4").await,
        Err(DomainError::InvalidRating)
    );
    let anonymous_comment = h
        .reviews
        .submit(services::reviews::SubmitReview {
            site_id: camp.id,
            rating: 4,
            comment: Some("lovely".into()),
            requester: None,
            origin: "1.2.3.4".into(),
        })
        .await;
    assert_eq!(anonymous_comment, Err(DomainError::CommentRequiresIdentity));
    assert_eq!(
        h.submit_as(camp.id, &alice, 4, Some(&"x".repeat(1001))).await,
        Err(DomainError::CommentTooLong {
            len: 1001,
            max: 1000
        })
    );

    // Nothing was written, and the origin was not consumed.
    assert_eq!(h.stored_site(camp.id).await.review_count, 0);
    assert!(h.anon_submit(camp.id, 4, "1.2.3.4").await.is_ok());
    assert!(h
        .submit_as(camp.id, &alice, 4, Some(&"x".repeat(1000)))
        .await
        .is_ok());
}

#[tokio::test]
async fn validation_precedes_site_lookup() {
    let h = Harness::new();
    let missing = SiteId::new();
    assert_eq!(
        h.anon_submit(missing, 9, "1.2.3.4").await,
        Err(DomainError::InvalidRating)
    );
    assert_eq!(
        h.anon_submit(missing, 3, "1.2.3.4").await,
        Err(DomainError::SiteNotFound(missing))
    );
}

#[tokio::test]
async fn second_identified_review_replaces_the_first() {
    let h = Harness::new();
    let camp = h.insert(site(40.0, -105.0, "Camp")).await;
    let alice = user("alice");

    let first = h.submit_as(camp.id, &alice, 4, Some("good")).await.unwrap();
    let second = h.submit_as(camp.id, &alice, 2, None).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.review_id, second.review_id);
    assert_eq!(
        second.aggregate,
        Aggregate {
            average_rating: Some(2.0),
            review_count: 1
        }
    );

    let view = h.reviews.get(second.review_id, None).await.unwrap();
    assert_eq!(view.comment, None);
    h.assert_consistent(camp.id).await;
}

#[tokio::test]
async fn average_is_rounded_to_two_decimals() {
    let h = Harness::new();
    let camp = h.insert(site(40.0, -105.0, "Camp")).await;

    for (name, rating) in [("a", 5), ("b", 4), ("c", 4)] {
        h.submit_as(camp.id, &user(name), rating, None).await.unwrap();
    }
    assert_eq!(h.stored_site(camp.id).await.average_rating, Some(4.33));

    h.submit_as(camp.id, &user("d"), 5, None).await.unwrap();
    h.submit_as(camp.id, &user("e"), 5, None).await.unwrap();
    h.submit_as(camp.id, &user("f"), 5, None).await.unwrap();
    // (5+4+4+5+5+5) / 6 = 4.666..
    assert_eq!(h.stored_site(camp.id).await.average_rating, Some(4.67));
    h.assert_consistent(camp.id).await;
}

#[tokio::test]
async fn third_distinct_flag_hides_the_review() {
    let h = Harness::new();
    let camp = h.insert(site(40.0, -105.0, "Camp")).await;
    let bob = user("bob");
    h.submit_as(camp.id, &user("alice"), 5, None).await.unwrap();
    let target = h.submit_as(camp.id, &bob, 1, Some("awful")).await.unwrap().review_id;

    for flagger in ["f1", "f2"] {
        let outcome = h.reviews.flag(target, &user(flagger), "spam").await.unwrap();
        assert!(!outcome.hidden);
    }
    // Two flags: still counted and listed.
    let site_now = h.stored_site(camp.id).await;
    assert_eq!((site_now.review_count, site_now.average_rating), (2, Some(3.0)));
    let page = h.reviews.list(camp.id, ListReviews::default()).await.unwrap();
    assert_eq!(page.reviews.len(), 2);

    assert_eq!(
        h.reviews.flag(target, &user("f1"), "again").await,
        Err(DomainError::AlreadyFlagged)
    );

    let third = h.reviews.flag(target, &user("f3"), "spam").await.unwrap();
    assert!(third.hidden);
    assert_eq!(third.flag_count, 3);

    let site_now = h.stored_site(camp.id).await;
    assert_eq!((site_now.review_count, site_now.average_rating), (1, Some(5.0)));
    let page = h.reviews.list(camp.id, ListReviews::default()).await.unwrap();
    assert_eq!(page.reviews.len(), 1);
    assert_eq!(page.pagination.total, 1);
    h.assert_consistent(camp.id).await;

    // Hidden reviews stay readable by their author only.
    assert!(h.reviews.get(target, Some(&bob)).await.unwrap().hidden);
    assert_eq!(
        h.reviews.get(target, None).await,
        Err(DomainError::ReviewNotFound(target))
    );

    // Further flags count but do not report a new transition.
    let fourth = h.reviews.flag(target, &user("f4"), "spam").await.unwrap();
    assert_eq!((fourth.flag_count, fourth.hidden), (4, false));
}

#[tokio::test]
async fn authors_cannot_flag_their_own_review() {
    let h = Harness::new();
    let camp = h.insert(site(40.0, -105.0, "Camp")).await;
    let bob = user("bob");
    let id = h.submit_as(camp.id, &bob, 1, None).await.unwrap().review_id;

    assert_eq!(h.reviews.flag(id, &bob, "spam").await, Err(DomainError::Forbidden));
    // The rejected attempt left no flag behind.
    assert_eq!(h.reviews.flag(id, &user("f1"), "spam").await.unwrap().flag_count, 1);
}

#[tokio::test]
async fn identified_authors_are_listed_by_their_token_claims() {
    let h = Harness::new();
    let camp = h.insert(site(40.0, -105.0, "Camp")).await;
    let mut carol = user("carol");
    carol.display_name = Some("Carol".into());
    carol.email = Some("carol@example.com".into());
    carol.email_verified = true;
    h.submit_as(camp.id, &carol, 4, Some("shady")).await.unwrap();

    let page = h.reviews.list(camp.id, ListReviews::default()).await.unwrap();
    let author = &page.reviews[0].author;
    assert!(!author.anonymous);
    assert_eq!(author.display_name.as_deref(), Some("Carol"));
    assert_eq!(author.email.as_deref(), Some("carol@example.com"));
}

#[tokio::test]
async fn flag_requires_reason() {
    let h = Harness::new();
    let camp = h.insert(site(40.0, -105.0, "Camp")).await;
    let id = h.anon_submit(camp.id, 3, "1.2.3.4").await.unwrap().review_id;

    assert_eq!(
        h.reviews.flag(id, &user("f1"), "   ").await,
        Err(DomainError::ReasonRequired)
    );
    let missing = ReviewId::new();
    assert_eq!(
        h.reviews.flag(missing, &user("f1"), "spam").await,
        Err(DomainError::ReviewNotFound(missing))
    );
}

#[tokio::test]
async fn only_the_author_may_edit_or_delete() {
    let h = Harness::new();
    let camp = h.insert(site(40.0, -105.0, "Camp")).await;
    let alice = user("alice");
    let mallory = user("mallory");
    let own = h.submit_as(camp.id, &alice, 4, Some("nice")).await.unwrap().review_id;
    let anon = h.anon_submit(camp.id, 2, "1.2.3.4").await.unwrap().review_id;

    let change = UpdateReview {
        rating: Some(1),
        comment: None,
    };
    assert_eq!(
        h.reviews.update(own, &mallory, change.clone()).await,
        Err(DomainError::Forbidden)
    );
    assert_eq!(h.reviews.delete(own, &mallory).await, Err(DomainError::Forbidden));
    assert_eq!(
        h.reviews.update(anon, &alice, change).await,
        Err(DomainError::Forbidden)
    );
    assert_eq!(h.reviews.delete(anon, &alice).await, Err(DomainError::Forbidden));
    h.assert_consistent(camp.id).await;
}

#[tokio::test]
async fn update_recomputes_and_can_clear_comment() {
    let h = Harness::new();
    let camp = h.insert(site(40.0, -105.0, "Camp")).await;
    let alice = user("alice");
    let id = h.submit_as(camp.id, &alice, 4, Some("nice")).await.unwrap().review_id;
    h.anon_submit(camp.id, 2, "1.2.3.4").await.unwrap();

    let outcome = h
        .reviews
        .update(
            id,
            &alice,
            UpdateReview {
                rating: Some(5),
                comment: Some(String::new()),
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.aggregate.average_rating, Some(3.5));

    let view = h.reviews.get(id, Some(&alice)).await.unwrap();
    assert_eq!(view.comment, None);
    assert_eq!(view.rating.value(), 5);

    assert_eq!(
        h.reviews
            .update(
                id,
                &alice,
                UpdateReview {
                    rating: Some(7),
                    comment: None
                }
            )
            .await,
        Err(DomainError::InvalidRating)
    );
    h.assert_consistent(camp.id).await;
}

#[tokio::test]
async fn deleting_the_last_review_clears_the_average() {
    let h = Harness::new();
    let camp = h.insert(site(40.0, -105.0, "Camp")).await;
    let alice = user("alice");
    let id = h.submit_as(camp.id, &alice, 4, None).await.unwrap().review_id;

    let outcome = h.reviews.delete(id, &alice).await.unwrap();
    assert_eq!(outcome.aggregate, Aggregate::default());

    let stored = h.stored_site(camp.id).await;
    assert_eq!(stored.average_rating, None);
    assert_eq!(stored.review_count, 0);
    assert_eq!(
        h.reviews.get(id, Some(&alice)).await,
        Err(DomainError::ReviewNotFound(id))
    );
}

#[tokio::test]
async fn listing_sorts_and_resolves_authors() {
    let h = Harness::new();
    let camp = h.insert(site(40.0, -105.0, "Camp")).await;
    h.directory.register(
        user("alice").user_id,
        AuthorDisplay {
            display_name: Some("Alice".into()),
            email: Some("alice@example.com".into()),
        },
    );
    h.submit_as(camp.id, &user("alice"), 5, None).await.unwrap();
    h.submit_as(camp.id, &user("bob"), 3, None).await.unwrap();
    h.anon_submit(camp.id, 1, "1.2.3.4").await.unwrap();

    let highest = h
        .reviews
        .list(
            camp.id,
            ListReviews {
                sort: Some(ReviewSort::Highest),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let ratings: Vec<u8> = highest.reviews.iter().map(|r| r.rating.value()).collect();
    assert_eq!(ratings, vec![5, 3, 1]);
    assert_eq!(highest.reviews[0].author.display_name.as_deref(), Some("Alice"));
    // Submitting made bob known to the directory, with nothing to show.
    assert!(!highest.reviews[1].author.anonymous);
    assert_eq!(highest.reviews[1].author.display_name, None);
    assert!(highest.reviews[2].author.anonymous);

    let lowest = h
        .reviews
        .list(
            camp.id,
            ListReviews {
                sort: Some(ReviewSort::Lowest),
                page_size: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let ratings: Vec<u8> = lowest.reviews.iter().map(|r| r.rating.value()).collect();
    assert_eq!(ratings, vec![1, 3]);
    assert_eq!(lowest.pagination.total_pages, 2);

    let missing = SiteId::new();
    assert_eq!(
        h.reviews.list(missing, ListReviews::default()).await,
        Err(DomainError::SiteNotFound(missing))
    );
}

#[tokio::test]
async fn display_lookup_failure_degrades_to_anonymous() {
    let mut lookup = MockDisplayNameLookup::new();
    lookup
        .expect_display_for()
        .returning(|_| Err(LookupError::Unavailable("directory down".into())));
    lookup
        .expect_remember()
        .times(1)
        .returning(|_| Err(LookupError::Unavailable("directory down".into())));
    let h = Harness::with_lookup(Arc::new(lookup));
    let camp = h.insert(site(40.0, -105.0, "Camp")).await;
    h.submit_as(camp.id, &user("alice"), 4, Some("quiet")).await.unwrap();

    let page = h.reviews.list(camp.id, ListReviews::default()).await.unwrap();
    assert_eq!(page.reviews.len(), 1);
    assert!(page.reviews[0].author.anonymous);
    assert_eq!(page.reviews[0].comment.as_deref(), Some("quiet"));
}

#[tokio::test]
async fn store_outage_surfaces_as_retryable() {
    let h = Harness::new();
    let camp = h.insert(site(40.0, -105.0, "Camp")).await;
    h.store.set_unavailable(true);

    let err = h.anon_submit(camp.id, 4, "1.2.3.4").await.unwrap_err();
    assert!(matches!(err, DomainError::StoreUnavailable(_)));
    assert!(err.is_retryable());

    h.store.set_unavailable(false);
    assert_eq!(h.stored_site(camp.id).await.review_count, 0);
}
