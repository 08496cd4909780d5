//! Weighted prize draw for the three-reel wheel.
//!
//! Everything here is pure: callers pass the prize snapshot and a source of
//! uniform values in `[0, 1)`, and get plain data back.

use rand::Rng;

use crate::error::DrawError;
use crate::types::{PrizeOption, SpinOutcome, UserAccount, WonPrizeTicket};
use crate::utils::{now_millis, now_rfc3339, random_base36, to_base36};

/// Random segment length of a ticket token.
pub const TICKET_RANDOM_LEN: usize = 10;

/// Sum of all weights, rejecting lists that cannot be drawn from.
pub fn total_weight(options: &[PrizeOption]) -> Result<f64, DrawError> {
    if options.is_empty() {
        return Err(DrawError::Configuration("no prizes configured".to_string()));
    }
    if let Some(bad) = options
        .iter()
        .find(|o| !o.weight.is_finite() || o.weight <= 0.0)
    {
        return Err(DrawError::Configuration(format!(
            "prize '{}' has invalid weight {}",
            bad.id, bad.weight
        )));
    }

    let total: f64 = options.iter().map(|o| o.weight).sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(DrawError::Configuration(format!(
            "total prize weight {} is not drawable",
            total
        )));
    }
    Ok(total)
}

/// Picks one index with probability `weight / total`.
pub fn select_weighted_index<R>(options: &[PrizeOption], random: &mut R) -> Result<usize, DrawError>
where
    R: FnMut() -> f64,
{
    let total = total_weight(options)?;
    let mut remainder = random() * total;

    for (index, option) in options.iter().enumerate() {
        remainder -= option.weight;
        if remainder <= 0.0 {
            return Ok(index);
        }
    }

    // Float accumulation can leave a tiny positive remainder.
    Ok(options.len() - 1)
}

/// Draws the three reels independently; a spin wins when all three land on
/// the same prize id.
pub fn evaluate_spin<R>(
    options: &[PrizeOption],
    random: &mut R,
    spin_cost: i64,
) -> Result<SpinOutcome, DrawError>
where
    R: FnMut() -> f64,
{
    if spin_cost < 0 {
        return Err(DrawError::Configuration(format!(
            "spin cost {} is negative",
            spin_cost
        )));
    }

    let first = select_weighted_index(options, random)?;
    let second = select_weighted_index(options, random)?;
    let third = select_weighted_index(options, random)?;

    let reels = [
        options[first].clone(),
        options[second].clone(),
        options[third].clone(),
    ];
    let is_winner = reels[0].id == reels[1].id && reels[1].id == reels[2].id;

    Ok(SpinOutcome {
        reels,
        is_winner,
        cost_charged: spin_cost,
    })
}

pub fn issue_ticket<G>(winning: &PrizeOption, owner: &UserAccount, id_generator: G) -> WonPrizeTicket
where
    G: FnOnce() -> String,
{
    WonPrizeTicket {
        ticket_id: id_generator(),
        prize_id: winning.id.clone(),
        prize_name: winning.display_name.clone(),
        prize_image: winning.image.clone(),
        owner_id: owner.id.clone(),
        owner_display_name: owner.display_name.clone(),
        claimed: false,
        redemption_id: None,
        issued_at: now_rfc3339(),
    }
}

/// `PRIZE-<base36 millis>-<random base36>`, uppercased.
pub fn generate_ticket_id() -> String {
    format!(
        "PRIZE-{}-{}",
        to_base36(now_millis()),
        random_base36(TICKET_RANDOM_LEN)
    )
    .to_uppercase()
}

/// Adapts any `rand` generator into the `[0, 1)` source the draw expects.
pub fn uniform_source<R: Rng>(rng: &mut R) -> impl FnMut() -> f64 + '_ {
    move || rng.gen_range(0.0..1.0)
}
