use super::print_json;
use crate::cli::CallerArgs;
use handover_core::{DateNegotiator, PickupService};
use handover_storage::{
    Caller, CreatePickupParams, PickupId, ProposedDate, ReceiverKind, UserRef,
};

impl From<CallerArgs> for Caller {
    fn from(args: CallerArgs) -> Self {
        Caller::new(args.user, args.role)
    }
}

/// Parse `"2025-01-10 10:00 AM"` into a candidate date.
fn parse_date_arg(raw: &str) -> Result<ProposedDate, Box<dyn std::error::Error>> {
    let (date, slot) = raw
        .trim()
        .split_once(' ')
        .ok_or_else(|| format!("expected \"YYYY-MM-DD H:00 AM|PM\", got {raw:?}"))?;
    Ok(DateNegotiator::parse_candidate(date, slot)?)
}

#[allow(clippy::too_many_arguments)]
pub async fn cmd_create(
    service: &PickupService,
    donor: UserRef,
    receiver: UserRef,
    receiver_kind: ReceiverKind,
    waste_type: String,
    item_name: String,
    quantity: f64,
    description: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let pickup = service
        .create_pickup(&CreatePickupParams {
            donor_ref: donor,
            receiver_ref: receiver,
            receiver_kind,
            waste_type,
            item_name,
            quantity,
            description,
        })
        .await?;
    print_json(&pickup)
}

pub async fn cmd_show(
    service: &PickupService,
    pickup_id: &PickupId,
    caller: CallerArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    print_json(&service.get_pickup(pickup_id, &caller.into()).await?)
}

pub async fn cmd_list(
    service: &PickupService,
    caller: CallerArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    print_json(&service.list_pickups(&caller.into()).await?)
}

pub async fn cmd_propose(
    service: &PickupService,
    pickup_id: &PickupId,
    caller: CallerArgs,
    dates: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let dates = dates
        .iter()
        .map(|raw| parse_date_arg(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let pickup = service
        .propose_dates(pickup_id, &caller.into(), dates)
        .await?;
    print_json(&pickup)
}

pub async fn cmd_confirm(
    service: &PickupService,
    pickup_id: &PickupId,
    caller: CallerArgs,
    date: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let choice = parse_date_arg(date)?;
    let pickup = service
        .confirm_date(pickup_id, &caller.into(), choice)
        .await?;
    print_json(&pickup)
}

pub async fn cmd_request_token(
    service: &PickupService,
    pickup_id: &PickupId,
    caller: CallerArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let issued = service.request_token(pickup_id, &caller.into()).await?;
    print_json(&issued)
}

pub async fn cmd_present(
    service: &PickupService,
    pickup_id: &PickupId,
    caller: CallerArgs,
    secret: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let pickup = service
        .present_token(pickup_id, &caller.into(), secret.trim())
        .await?;
    print_json(&pickup)
}

pub async fn cmd_complete(
    service: &PickupService,
    pickup_id: &PickupId,
    caller: CallerArgs,
    notes: Option<String>,
    bonus: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let pickup = service
        .complete(pickup_id, &caller.into(), notes, bonus)
        .await?;
    print_json(&pickup)
}

pub async fn cmd_cancel(
    service: &PickupService,
    pickup_id: &PickupId,
    caller: CallerArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let pickup = service.cancel(pickup_id, &caller.into()).await?;
    print_json(&pickup)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_argument_splits_on_first_space() {
        let parsed = parse_date_arg("2025-01-11 2:00 PM").unwrap();
        assert_eq!(parsed.to_string(), "2025-01-11 2:00 PM");
    }

    #[test]
    fn date_argument_without_slot_is_rejected() {
        assert!(parse_date_arg("2025-01-11").is_err());
        assert!(parse_date_arg("2025-01-11 2:15 PM").is_err());
    }
}
