mod common;

use chrono::Duration;
use common::{slot, Harness};
use futures::StreamExt;
use handover_core::{CoreError, Event};
use handover_events::{EventBus, EventStream, EventType, PickupEvent};
use handover_storage::{Caller, CallerRole, PickupStatus, TokenStatus, UserRef};
use uuid::Uuid;

#[tokio::test]
async fn end_to_end_handover() {
    let h = Harness::new().await;

    let p1 = h.pending().await;
    assert_eq!(p1.status, PickupStatus::Pending);
    assert_eq!(p1.quantity, 5.0);
    assert_eq!(p1.waste_type, "food");

    let p1 = h
        .service
        .propose_dates(
            &p1.id,
            &h.receiver,
            vec![slot("2025-01-10", "10:00 AM"), slot("2025-01-11", "2:00 PM")],
        )
        .await
        .unwrap();
    assert_eq!(p1.status, PickupStatus::DatesProposed);

    let p1 = h
        .service
        .confirm_date(&p1.id, &h.donor, slot("2025-01-11", "2:00 PM"))
        .await
        .unwrap();
    assert_eq!(p1.status, PickupStatus::Scheduled);
    assert_eq!(p1.confirmed_date, Some(slot("2025-01-11", "2:00 PM")));

    let issued = h.service.request_token(&p1.id, &h.receiver).await.unwrap();
    let stored = h.service.get_pickup(&p1.id, &h.donor).await.unwrap();
    assert_eq!(stored.status, PickupStatus::QrRequested);
    let token = stored.active_token().unwrap();
    assert_eq!(issued.expires_at, token.generated_at + Duration::minutes(15));

    h.clock.advance(Duration::minutes(5));
    let p1 = h
        .service
        .present_token(&p1.id, &h.donor, &issued.secret)
        .await
        .unwrap();
    assert_eq!(p1.status, PickupStatus::QrAccepted);

    let p1 = h
        .service
        .complete(&p1.id, &h.receiver, Some("left at gate".to_string()), 10)
        .await
        .unwrap();
    assert_eq!(p1.status, PickupStatus::Completed);
    assert_eq!(p1.additional_points, Some(10));
    assert_eq!(p1.completion_notes.as_deref(), Some("left at gate"));
    assert!(p1.completed_at.is_some());
    assert!(!p1.points_credit.as_ref().unwrap().is_pending());

    assert_eq!(h.ledger.credited(), 1);
    assert_eq!(h.ledger.balance(&h.donor.user), 20);
}

#[tokio::test]
async fn create_rejects_bad_quantity_and_same_party() {
    let h = Harness::new().await;

    for quantity in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        let mut params = h.params();
        params.quantity = quantity;
        assert!(matches!(
            h.service.create_pickup(&params).await,
            Err(CoreError::InvalidQuantity)
        ));
    }

    let mut params = h.params();
    params.receiver_ref = params.donor_ref;
    assert!(matches!(
        h.service.create_pickup(&params).await,
        Err(CoreError::InvalidParties)
    ));
}

#[tokio::test]
async fn list_returns_pickups_for_either_side() {
    let h = Harness::new().await;
    h.pending().await;
    h.pending().await;

    assert_eq!(h.service.list_pickups(&h.donor).await.unwrap().len(), 2);
    assert_eq!(h.service.list_pickups(&h.receiver).await.unwrap().len(), 2);
    let outsider = Caller::new(UserRef(Uuid::new_v4()), CallerRole::Donor);
    assert!(h.service.list_pickups(&outsider).await.unwrap().is_empty());
}

#[tokio::test]
async fn reads_never_reveal_the_active_secret() {
    let h = Harness::new().await;
    let p = h.scheduled().await;
    let issued = h.service.request_token(&p.id, &h.receiver).await.unwrap();

    let shown = h.service.get_pickup(&p.id, &h.donor).await.unwrap();
    let listed = h.service.list_pickups(&h.donor).await.unwrap();
    assert_eq!(shown.active_token().unwrap().id, issued.token_id);
    assert_eq!(listed[0].active_token().unwrap().id, issued.token_id);

    for rendered in [
        serde_json::to_string(&shown).unwrap(),
        serde_json::to_string(&listed).unwrap(),
    ] {
        assert!(!rendered.contains(&issued.secret));
    }

    // Without the receiver's QR the donor has nothing to present.
    assert!(matches!(
        h.service.present_token(&p.id, &h.donor, "").await,
        Err(CoreError::TokenMismatch)
    ));
}

#[tokio::test]
async fn outsiders_cannot_read_a_pickup() {
    let h = Harness::new().await;
    let p = h.pending().await;
    let outsider = Caller::new(UserRef(Uuid::new_v4()), CallerRole::Donor);

    assert!(matches!(
        h.service.get_pickup(&p.id, &outsider).await,
        Err(CoreError::NotAParty)
    ));
    assert!(h.service.get_pickup(&p.id, &h.receiver).await.is_ok());
}

#[tokio::test]
async fn unknown_pickup_is_not_found() {
    let h = Harness::new().await;
    let id = handover_storage::PickupId::new();
    assert!(matches!(
        h.service.get_pickup(&id, &h.donor).await,
        Err(CoreError::NotFound)
    ));
    assert!(matches!(
        h.service.cancel(&id, &h.donor).await,
        Err(CoreError::NotFound)
    ));
}

#[tokio::test]
async fn proposals_can_be_replaced_until_confirmed() {
    let h = Harness::new().await;
    let p = h.pending().await;

    h.service
        .propose_dates(&p.id, &h.receiver, vec![slot("2025-01-10", "10:00 AM")])
        .await
        .unwrap();
    let p = h
        .service
        .propose_dates(&p.id, &h.receiver, vec![slot("2025-01-12", "4:00 PM")])
        .await
        .unwrap();
    assert_eq!(p.proposed_dates, vec![slot("2025-01-12", "4:00 PM")]);

    assert!(matches!(
        h.service
            .confirm_date(&p.id, &h.donor, slot("2025-01-10", "10:00 AM"))
            .await,
        Err(CoreError::InvalidSelection)
    ));
}

#[tokio::test]
async fn past_dates_are_rejected() {
    let h = Harness::new().await;
    let p = h.pending().await;
    assert!(matches!(
        h.service
            .propose_dates(&p.id, &h.receiver, vec![slot("2025-01-09", "10:00 AM")])
            .await,
        Err(CoreError::InvalidDates(_))
    ));
    assert_eq!(
        h.service.get_pickup(&p.id, &h.donor).await.unwrap().status,
        PickupStatus::Pending
    );
}

#[tokio::test]
async fn repeated_token_requests_return_the_same_token() {
    let h = Harness::new().await;
    let p = h.scheduled().await;

    let first = h.service.request_token(&p.id, &h.receiver).await.unwrap();
    h.clock.advance(Duration::minutes(3));
    let second = h.service.request_token(&p.id, &h.receiver).await.unwrap();

    assert_eq!(first.token_id, second.token_id);
    assert_eq!(first.secret, second.secret);
    assert!(second.reused);

    let stored = h.service.get_pickup(&p.id, &h.donor).await.unwrap();
    assert_eq!(stored.tokens.len(), 1);
}

#[tokio::test]
async fn expired_token_is_burned_and_can_be_reissued() {
    let h = Harness::new().await;
    let p = h.scheduled().await;
    let issued = h.service.request_token(&p.id, &h.receiver).await.unwrap();

    // Exactly at expiry the token still works; one millisecond later it does not.
    h.clock.set(issued.expires_at + Duration::milliseconds(1));
    assert!(matches!(
        h.service.present_token(&p.id, &h.donor, &issued.secret).await,
        Err(CoreError::TokenExpired)
    ));

    let stored = h.service.get_pickup(&p.id, &h.donor).await.unwrap();
    assert_eq!(stored.status, PickupStatus::QrRequested);
    assert_eq!(stored.tokens[0].status, TokenStatus::Expired);

    // Presenting again keeps reporting expiry.
    assert!(matches!(
        h.service.present_token(&p.id, &h.donor, &issued.secret).await,
        Err(CoreError::TokenExpired)
    ));

    let fresh = h.service.request_token(&p.id, &h.receiver).await.unwrap();
    assert_ne!(fresh.token_id, issued.token_id);
    assert!(matches!(
        h.service.present_token(&p.id, &h.donor, &issued.secret).await,
        Err(CoreError::TokenMismatch)
    ));
    let accepted = h
        .service
        .present_token(&p.id, &h.donor, &fresh.secret)
        .await
        .unwrap();
    assert_eq!(accepted.status, PickupStatus::QrAccepted);
}

#[tokio::test]
async fn token_accepted_at_exact_expiry() {
    let h = Harness::new().await;
    let p = h.scheduled().await;
    let issued = h.service.request_token(&p.id, &h.receiver).await.unwrap();

    h.clock.set(issued.expires_at);
    let accepted = h
        .service
        .present_token(&p.id, &h.donor, &issued.secret)
        .await
        .unwrap();
    assert_eq!(accepted.status, PickupStatus::QrAccepted);
}

#[tokio::test]
async fn wrong_secret_leaves_token_usable() {
    let h = Harness::new().await;
    let p = h.scheduled().await;
    let issued = h.service.request_token(&p.id, &h.receiver).await.unwrap();

    let err = h
        .service
        .present_token(&p.id, &h.donor, "deadbeef")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::TokenMismatch));
    assert!(err.is_retryable());

    let before = h.service.get_pickup(&p.id, &h.donor).await.unwrap();
    assert_eq!(before.version, p.version + 1);
    assert_eq!(before.active_token().unwrap().id, issued.token_id);

    assert!(h
        .service
        .present_token(&p.id, &h.donor, &issued.secret)
        .await
        .is_ok());
}

#[tokio::test]
async fn requester_cannot_redeem_own_token() {
    let h = Harness::new().await;
    let p = h.scheduled().await;
    let issued = h.service.request_token(&p.id, &h.receiver).await.unwrap();

    assert!(matches!(
        h.service
            .present_token(&p.id, &h.receiver, &issued.secret)
            .await,
        Err(CoreError::Forbidden {
            event: Event::PresentToken,
            ..
        })
    ));
}

#[tokio::test]
async fn outsiders_are_rejected() {
    let h = Harness::new().await;
    let p = h.scheduled().await;
    let outsider = Caller::new(UserRef(Uuid::new_v4()), CallerRole::Ngo);

    assert!(matches!(
        h.service.request_token(&p.id, &outsider).await,
        Err(CoreError::NotAParty)
    ));
    assert!(matches!(
        h.service.cancel(&p.id, &outsider).await,
        Err(CoreError::NotAParty)
    ));
}

#[tokio::test]
async fn cancel_is_idempotent_and_final() {
    let h = Harness::new().await;
    let p = h.scheduled().await;
    h.service.request_token(&p.id, &h.receiver).await.unwrap();

    let cancelled = h.service.cancel(&p.id, &h.donor).await.unwrap();
    assert_eq!(cancelled.status, PickupStatus::Cancelled);
    assert_eq!(cancelled.tokens[0].status, TokenStatus::Expired);

    let again = h.service.cancel(&p.id, &h.receiver).await.unwrap();
    assert_eq!(again.version, cancelled.version);

    assert!(matches!(
        h.service.request_token(&p.id, &h.receiver).await,
        Err(CoreError::InvalidTransition {
            from: PickupStatus::Cancelled,
            ..
        })
    ));
}

#[tokio::test]
async fn completed_pickup_cannot_be_cancelled() {
    let h = Harness::new().await;
    let p = h.accepted().await;
    h.service
        .complete(&p.id, &h.receiver, None, 0)
        .await
        .unwrap();

    assert!(matches!(
        h.service.cancel(&p.id, &h.donor).await,
        Err(CoreError::InvalidTransition {
            from: PickupStatus::Completed,
            event: Event::Cancel,
        })
    ));
}

#[tokio::test]
async fn sweep_marks_stale_tokens_expired() {
    let h = Harness::new().await;
    let stale = h.scheduled().await;
    let fresh = h.scheduled().await;

    h.service
        .request_token(&stale.id, &h.receiver)
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(10));
    h.service
        .request_token(&fresh.id, &h.receiver)
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(10));

    assert_eq!(h.service.sweep_expired_tokens().await.unwrap(), 1);
    assert_eq!(h.service.sweep_expired_tokens().await.unwrap(), 0);

    let stale = h.service.get_pickup(&stale.id, &h.donor).await.unwrap();
    assert_eq!(stale.tokens[0].status, TokenStatus::Expired);
    assert!(stale.active_token().is_none());
    let fresh = h.service.get_pickup(&fresh.id, &h.donor).await.unwrap();
    assert!(fresh.active_token().is_some());
}

async fn collect(stream: &mut EventStream, n: usize) -> Vec<PickupEvent> {
    let mut events = Vec::with_capacity(n);
    for _ in 0..n {
        let event = tokio::time::timeout(std::time::Duration::from_secs(1), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        events.push(event);
    }
    events
}

#[tokio::test]
async fn counterpart_is_notified_of_each_transition() {
    let h = Harness::new().await;
    let mut donor_events = h.events.subscribe(&h.donor.user).await.unwrap();
    let mut receiver_events = h.events.subscribe(&h.receiver.user).await.unwrap();

    let p = h.accepted().await;
    h.service
        .complete(&p.id, &h.receiver, None, 0)
        .await
        .unwrap();

    // Receiver-driven events reach the donor.
    let to_donor = collect(&mut donor_events, 3).await;
    let kinds: Vec<EventType> = to_donor.iter().map(|e| e.event_type).collect();
    assert!(kinds.contains(&EventType::DatesProposed));
    assert!(kinds.contains(&EventType::TokenIssued));
    let done = to_donor
        .iter()
        .find(|e| e.event_type == EventType::Completed)
        .expect("completion notice");
    assert_eq!(done.pickup_id, p.id);
    assert_eq!(done.status, PickupStatus::Completed);

    // Donor-driven events reach the receiver.
    let to_receiver = collect(&mut receiver_events, 2).await;
    let kinds: Vec<EventType> = to_receiver.iter().map(|e| e.event_type).collect();
    assert!(kinds.contains(&EventType::DateConfirmed));
    assert!(kinds.contains(&EventType::TokenAccepted));
}
