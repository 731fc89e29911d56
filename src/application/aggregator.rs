//! Per-model aggregation of price observations

use crate::domain::{AggregateResult, Availability, ModelOutcome, PriceObservation};

/// Fold filtered observations for one model into its output record.
///
/// Observations are expected in enumeration order; the first one supplies
/// the representative URL. No observations means the model is recorded as
/// not found, with the search URLs kept for audit.
pub fn aggregate(model: &str, observations: &[PriceObservation], search_urls: Vec<String>) -> ModelOutcome {
    aggregate_with_representative(model, observations, None, search_urls)
}

/// Like [`aggregate`], but with the representative URL taken from the first
/// accepted candidate before outlier filtering, when one is given.
pub fn aggregate_with_representative(
    model: &str,
    observations: &[PriceObservation],
    representative_url: Option<&str>,
    search_urls: Vec<String>,
) -> ModelOutcome {
    let Some(first) = observations.first() else {
        return ModelOutcome::NotFound {
            model: model.to_string(),
            search_urls,
        };
    };

    let low_price = observations.iter().map(|o| o.selling_price).min().unwrap_or(first.selling_price);
    let high_price = observations.iter().map(|o| o.selling_price).max().unwrap_or(first.selling_price);
    let max_reference_price = observations.iter().filter_map(|o| o.reference_price).max();

    ModelOutcome::Found(AggregateResult {
        model: model.to_string(),
        low_price,
        high_price,
        max_reference_price,
        representative_url: representative_url.unwrap_or(&first.candidate_url).to_string(),
        availability: fold_availability(observations.iter().map(|o| o.availability)),
        search_urls,
    })
}

/// In stock anywhere wins, then out of stock, then unknown.
fn fold_availability(states: impl Iterator<Item = Availability>) -> Availability {
    states.fold(Availability::Unknown, |acc, state| match (acc, state) {
        (Availability::InStock, _) | (_, Availability::InStock) => Availability::InStock,
        (Availability::OutOfStock, _) | (_, Availability::OutOfStock) => Availability::OutOfStock,
        _ => Availability::Unknown,
    })
}
