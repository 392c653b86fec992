use crate::models::DashboardStats;
use crate::services::state::AppState;

pub async fn get_dashboard_stats(state: &AppState) -> Result<DashboardStats, String> {
    state.dashboard().await.map_err(|e| e.user_message())
}
