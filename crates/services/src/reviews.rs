//! # Review aggregation engine
//!
//! Owns submit, list, read, update, delete and flag for reviews. Eligibility
//! and validation happen first; every accepted write is then handed to
//! [`commit_with_aggregate`] inside a site transaction, so the review and the
//! site's `average_rating`/`review_count` change together.
//!
//! Review lifecycle: `Active -> Hidden` once enough distinct users flag it.
//! Hidden reviews stay stored and readable by their author but no longer
//! count toward the aggregate or appear in listings.

use chrono::{DateTime, Duration, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

use domains::{
    Aggregate, DisplayNameLookup, DomainError, FlagRecord, Identity, RateLimitEntry, Rating,
    Review, ReviewId, ReviewStore, SiteId, SiteStore, SiteTransaction, UserId,
    ANONYMOUS_WINDOW_HOURS, FLAG_HIDE_THRESHOLD, MAX_COMMENT_CHARS,
};

use crate::consistency::commit_with_aggregate;
use crate::utils::{clamp_page, OriginHasher, Pagination};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReviewPolicy {
    pub flag_hide_threshold: u32,
    pub anonymous_window: Duration,
    pub max_comment_chars: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self {
            flag_hide_threshold: FLAG_HIDE_THRESHOLD,
            anonymous_window: Duration::hours(ANONYMOUS_WINDOW_HOURS),
            max_comment_chars: MAX_COMMENT_CHARS,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubmitReview {
    pub site_id: SiteId,
    pub rating: i64,
    pub comment: Option<String>,
    pub requester: Option<Identity>,
    /// Raw network origin of the request; hashed before it is stored.
    pub origin: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub review_id: ReviewId,
    /// `false` when an identified author's existing review was replaced.
    pub created: bool,
    pub aggregate: Aggregate,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateReview {
    pub rating: Option<i64>,
    /// `Some("")` clears the comment; `None` leaves it as is.
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    pub review_id: ReviewId,
    pub aggregate: Aggregate,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagOutcome {
    pub review_id: ReviewId,
    pub flag_count: u32,
    /// True only for the call that crossed the threshold.
    pub hidden: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewSort {
    #[default]
    Newest,
    Highest,
    Lowest,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListReviews {
    pub page: Option<u32>,
    #[serde(alias = "limit")]
    pub page_size: Option<u32>,
    pub sort: Option<ReviewSort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorView {
    pub anonymous: bool,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl AuthorView {
    fn anonymous() -> Self {
        Self {
            anonymous: true,
            display_name: None,
            email: None,
        }
    }
}

/// What callers see of a review: no origin, no flag records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub id: ReviewId,
    pub site_id: SiteId,
    pub rating: Rating,
    pub comment: Option<String>,
    pub author: AuthorView,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReviewView {
    fn new(review: Review, author: AuthorView) -> Self {
        Self {
            id: review.id,
            site_id: review.site_id,
            rating: review.rating,
            comment: review.comment,
            author,
            hidden: review.hidden,
            created_at: review.created_at,
            updated_at: review.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewPage {
    pub reviews: Vec<ReviewView>,
    pub pagination: Pagination,
}

pub struct ReviewService {
    sites: Arc<dyn SiteStore>,
    reviews: Arc<dyn ReviewStore>,
    directory: Arc<dyn DisplayNameLookup>,
    origins: OriginHasher,
    policy: ReviewPolicy,
}

impl ReviewService {
    pub fn new(
        sites: Arc<dyn SiteStore>,
        reviews: Arc<dyn ReviewStore>,
        directory: Arc<dyn DisplayNameLookup>,
        origins: OriginHasher,
        policy: ReviewPolicy,
    ) -> Self {
        Self {
            sites,
            reviews,
            directory,
            origins,
            policy,
        }
    }

    /// Creates a review, or replaces the requester's existing one for the
    /// same site. Anonymous submissions are limited to one per origin and
    /// site per rolling window.
    pub async fn submit(&self, input: SubmitReview) -> Result<SubmitOutcome, DomainError> {
        let rating = Rating::new(input.rating)?;
        let comment = normalize_comment(input.comment);
        if comment.is_some() && input.requester.is_none() {
            return Err(DomainError::CommentRequiresIdentity);
        }
        self.check_comment(comment.as_deref())?;

        let site_id = input.site_id;
        let mut tx = self.begin(site_id).await?;
        if tx.site().await.map_err(|e| e.into_store())?.is_none() {
            return Err(DomainError::SiteNotFound(site_id));
        }

        let now = Utc::now();
        let (review, created) = match &input.requester {
            None => {
                let origin = self.origins.hash(&input.origin);
                let last = tx
                    .latest_rate_limit(&origin)
                    .await
                    .map_err(|e| e.into_store())?;
                if last.is_some_and(|at| now.signed_duration_since(at) < self.policy.anonymous_window) {
                    return Err(DomainError::RateLimited);
                }
                tx.put_rate_limit(RateLimitEntry {
                    origin: origin.clone(),
                    site_id,
                    created_at: now,
                });
                (new_review(site_id, None, Some(origin), rating, None, now), true)
            }
            Some(identity) => {
                let existing = tx
                    .reviews()
                    .await
                    .map_err(|e| e.into_store())?
                    .into_iter()
                    .find(|r| r.is_authored_by(&identity.user_id));
                match existing {
                    Some(mut review) => {
                        review.rating = rating;
                        review.comment = comment;
                        review.updated_at = now;
                        (review, false)
                    }
                    None => (
                        new_review(site_id, Some(identity.user_id.clone()), None, rating, comment, now),
                        true,
                    ),
                }
            }
        };

        let review_id = review.id;
        tx.put_review(review);
        let aggregate = commit_with_aggregate(tx).await?;

        if let Some(identity) = &input.requester {
            if let Err(e) = self.directory.remember(identity).await {
                warn!(user = %identity.user_id, error = %e, "could not record author display");
            }
        }

        info!(%site_id, %review_id, created, anonymous = input.requester.is_none(), "review submitted");
        Ok(SubmitOutcome {
            review_id,
            created,
            aggregate,
        })
    }

    /// Non-hidden reviews of a site with best-effort author display data.
    pub async fn list(&self, site_id: SiteId, query: ListReviews) -> Result<ReviewPage, DomainError> {
        self.sites
            .get_site(site_id)
            .await
            .map_err(|e| e.into_store())?
            .ok_or(DomainError::SiteNotFound(site_id))?;

        let mut visible: Vec<Review> = self
            .reviews
            .reviews_for_site(site_id)
            .await
            .map_err(|e| e.into_store())?
            .into_iter()
            .filter(|r| !r.hidden)
            .collect();

        let sort = query.sort.unwrap_or_default();
        visible.sort_by(|a, b| compare_reviews(sort, a, b));

        let (page, page_size) = clamp_page(
            query.page,
            query.page_size,
            self.policy.default_page_size,
            self.policy.max_page_size,
        );
        let pagination = Pagination::new(page, page_size, visible.len());
        let reviews = join_all(
            pagination
                .slice(visible)
                .into_iter()
                .map(|review| async move {
                    let author = self.author_view(review.author_id.as_ref()).await;
                    ReviewView::new(review, author)
                }),
        )
        .await;

        Ok(ReviewPage {
            reviews,
            pagination,
        })
    }

    /// A hidden review is only returned to its author.
    pub async fn get(
        &self,
        review_id: ReviewId,
        requester: Option<&Identity>,
    ) -> Result<ReviewView, DomainError> {
        let review = self.load(review_id).await?;
        let is_author = requester.is_some_and(|r| review.is_authored_by(&r.user_id));
        if review.hidden && !is_author {
            return Err(DomainError::ReviewNotFound(review_id));
        }
        let author = self.author_view(review.author_id.as_ref()).await;
        Ok(ReviewView::new(review, author))
    }

    pub async fn update(
        &self,
        review_id: ReviewId,
        requester: &Identity,
        changes: UpdateReview,
    ) -> Result<WriteOutcome, DomainError> {
        let rating = changes.rating.map(Rating::new).transpose()?;
        let comment = changes.comment.map(|c| normalize_comment(Some(c)));
        if let Some(c) = &comment {
            self.check_comment(c.as_deref())?;
        }

        let (mut tx, mut review) = self.begin_owned(review_id, &requester.user_id).await?;
        if let Some(rating) = rating {
            review.rating = rating;
        }
        if let Some(comment) = comment {
            review.comment = comment;
        }
        review.updated_at = Utc::now();

        tx.put_review(review);
        let aggregate = commit_with_aggregate(tx).await?;

        info!(%review_id, "review updated");
        Ok(WriteOutcome {
            review_id,
            aggregate,
        })
    }

    /// Removes the review; the aggregate becomes absent, not zero, when no
    /// visible reviews remain.
    pub async fn delete(
        &self,
        review_id: ReviewId,
        requester: &Identity,
    ) -> Result<WriteOutcome, DomainError> {
        let (mut tx, _) = self.begin_owned(review_id, &requester.user_id).await?;
        tx.delete_review(review_id);
        let aggregate = commit_with_aggregate(tx).await?;

        info!(%review_id, "review deleted");
        Ok(WriteOutcome {
            review_id,
            aggregate,
        })
    }

    /// Records a flag from anyone but the author; the flag that reaches the
    /// threshold hides the review and drops it from the site aggregate.
    pub async fn flag(
        &self,
        review_id: ReviewId,
        flagger: &Identity,
        reason: &str,
    ) -> Result<FlagOutcome, DomainError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::ReasonRequired);
        }

        let (mut tx, mut review) = self.begin_with_review(review_id).await?;
        if review.is_authored_by(&flagger.user_id) {
            return Err(DomainError::Forbidden);
        }
        if review.has_flag_from(&flagger.user_id) {
            return Err(DomainError::AlreadyFlagged);
        }

        review.flags.push(FlagRecord {
            flagger_id: flagger.user_id.clone(),
            reason: reason.to_string(),
            flagged_at: Utc::now(),
        });
        review.flag_count += 1;
        let hidden_now = !review.hidden && review.flag_count >= self.policy.flag_hide_threshold;
        if hidden_now {
            review.hidden = true;
        }
        let flag_count = review.flag_count;

        tx.put_review(review);
        commit_with_aggregate(tx).await?;

        if hidden_now {
            info!(%review_id, flag_count, "review hidden by moderation threshold");
        }
        Ok(FlagOutcome {
            review_id,
            flag_count,
            hidden: hidden_now,
        })
    }

    async fn begin(&self, site_id: SiteId) -> Result<Box<dyn SiteTransaction>, DomainError> {
        self.reviews.begin(site_id).await.map_err(|e| e.into_store())
    }

    async fn load(&self, review_id: ReviewId) -> Result<Review, DomainError> {
        self.reviews
            .get_review(review_id)
            .await
            .map_err(|e| e.into_store())?
            .ok_or(DomainError::ReviewNotFound(review_id))
    }

    /// Opens a transaction on the review's site and re-reads the review
    /// inside it, so later writes never act on a stale copy.
    async fn begin_with_review(
        &self,
        review_id: ReviewId,
    ) -> Result<(Box<dyn SiteTransaction>, Review), DomainError> {
        let site_id = self.load(review_id).await?.site_id;
        let mut tx = self.begin(site_id).await?;
        let review = tx
            .reviews()
            .await
            .map_err(|e| e.into_store())?
            .into_iter()
            .find(|r| r.id == review_id)
            .ok_or(DomainError::ReviewNotFound(review_id))?;
        Ok((tx, review))
    }

    /// As `begin_with_review`, and the requester must be the author.
    /// Anonymous reviews have no author and are never modifiable.
    async fn begin_owned(
        &self,
        review_id: ReviewId,
        requester: &UserId,
    ) -> Result<(Box<dyn SiteTransaction>, Review), DomainError> {
        let (tx, review) = self.begin_with_review(review_id).await?;
        if !review.is_authored_by(requester) {
            return Err(DomainError::Forbidden);
        }
        Ok((tx, review))
    }

    fn check_comment(&self, comment: Option<&str>) -> Result<(), DomainError> {
        match comment {
            Some(c) if c.chars().count() > self.policy.max_comment_chars => {
                Err(DomainError::CommentTooLong {
                    len: c.chars().count(),
                    max: self.policy.max_comment_chars,
                })
            }
            _ => Ok(()),
        }
    }

    async fn author_view(&self, author: Option<&UserId>) -> AuthorView {
        let Some(user) = author else {
            return AuthorView::anonymous();
        };
        match self.directory.display_for(user).await {
            Ok(display) => AuthorView {
                anonymous: false,
                display_name: display.display_name,
                email: display.email,
            },
            Err(e) => {
                warn!(user = %user, error = %e, "author display lookup failed");
                AuthorView::anonymous()
            }
        }
    }
}

fn new_review(
    site_id: SiteId,
    author_id: Option<UserId>,
    origin: Option<String>,
    rating: Rating,
    comment: Option<String>,
    now: DateTime<Utc>,
) -> Review {
    Review {
        id: ReviewId::new(),
        site_id,
        author_id,
        origin,
        rating,
        comment,
        flag_count: 0,
        flags: Vec::new(),
        hidden: false,
        created_at: now,
        updated_at: now,
    }
}

/// Blank comments count as no comment.
fn normalize_comment(comment: Option<String>) -> Option<String> {
    comment.filter(|c| !c.trim().is_empty())
}

fn compare_reviews(sort: ReviewSort, a: &Review, b: &Review) -> Ordering {
    let primary = match sort {
        ReviewSort::Newest => Ordering::Equal,
        ReviewSort::Highest => b.rating.cmp(&a.rating),
        ReviewSort::Lowest => a.rating.cmp(&b.rating),
    };
    primary
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}
