use axum::Json;
use protocol::messages::HealthInfo;

/// Identity document: clients verify the service name here before treating
/// the endpoint as the status daemon.
pub async fn health() -> Json<HealthInfo> {
    Json(HealthInfo::current())
}
