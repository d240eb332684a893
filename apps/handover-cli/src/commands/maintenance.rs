use super::print_json;
use handover_core::PickupService;
use serde_json::json;

pub async fn cmd_sweep(service: &PickupService) -> Result<(), Box<dyn std::error::Error>> {
    let swept = service.sweep_expired_tokens().await?;
    print_json(&json!({ "swept": swept }))
}

pub async fn cmd_redeliver(service: &PickupService) -> Result<(), Box<dyn std::error::Error>> {
    let delivered = service.redeliver_pending_credits().await?;
    print_json(&json!({ "delivered": delivered }))
}
