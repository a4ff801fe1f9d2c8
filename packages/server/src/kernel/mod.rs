pub mod ai;
pub mod campaign_api;
pub mod sheets;

pub use ai::LlmClient;
pub use campaign_api::CampaignApiClient;
pub use sheets::GoogleSheetsSink;
