//! # Consistency coordinator
//!
//! Every review write ends here. The aggregate is recomputed from the
//! transaction's own view of the review set (staged writes included) and
//! committed together with the write, so readers never see one without the
//! other.

use domains::{Aggregate, DomainError, Review, SiteTransaction};

/// Mean of non-hidden ratings rounded to two decimals; absent when there are
/// none.
pub fn recompute(reviews: &[Review]) -> Aggregate {
    let (sum, count) = reviews
        .iter()
        .filter(|r| !r.hidden)
        .fold((0u64, 0u32), |(sum, count), r| {
            (sum + u64::from(r.rating.value()), count + 1)
        });

    if count == 0 {
        return Aggregate::default();
    }
    Aggregate {
        average_rating: Some(round2(sum as f64 / f64::from(count))),
        review_count: count,
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Recomputes the site aggregate inside `tx` and commits.
pub async fn commit_with_aggregate(
    mut tx: Box<dyn SiteTransaction>,
) -> Result<Aggregate, DomainError> {
    let reviews = tx.reviews().await.map_err(|e| e.into_store())?;
    let aggregate = recompute(&reviews);
    tx.set_aggregate(aggregate);
    tx.commit().await.map_err(|e| e.into_store())?;
    Ok(aggregate)
}
