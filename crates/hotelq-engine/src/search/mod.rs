//! Reference search operations over an external lodging backend.

mod operations;

pub use operations::{FuzzyHotelSearch, HotelSearch, PlanSearch, PoiSearch};

use async_trait::async_trait;
use serde_json::Value;

use hotelq_core::{SearchError, SearchFilters};

/// The remote vacancy / hotel / plan / places service.
#[async_trait]
pub trait LodgingBackend: Send + Sync {
    /// Hotels with vacancies matching the filters.
    async fn search_vacancies(&self, filters: &SearchFilters) -> Result<Vec<Value>, SearchError>;

    /// Hotels whose name matches `keyword`.
    async fn search_by_name(&self, keyword: &str) -> Result<Vec<Value>, SearchError>;

    /// Bookable plans of the hotels named by `filters.hotel_keyword`.
    async fn search_plans(&self, filters: &SearchFilters) -> Result<Vec<Value>, SearchError>;

    /// Places matching `keyword` near the hotel called `hotel_name`.
    async fn search_nearby(
        &self,
        hotel_name: &str,
        keyword: &str,
    ) -> Result<Vec<Value>, SearchError>;
}
