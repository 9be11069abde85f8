//! Travel and reservation search for the booking handler.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use concierge_types::decision::BookingType;
use concierge_types::error::BackendError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingOption {
    pub id: String,
    pub booking_type: BookingType,
    pub description: String,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub reference: String,
    pub option: BookingOption,
}

/// Search-and-book operations behind the booking handler.
pub trait BookingBackend: Send + Sync {
    fn search(
        &self,
        booking_type: BookingType,
        query: &str,
    ) -> impl Future<Output = Result<Vec<BookingOption>, BackendError>> + Send;

    fn book(
        &self,
        option_id: &str,
    ) -> impl Future<Output = Result<BookingConfirmation, BackendError>> + Send;
}

impl<B: BookingBackend> BookingBackend for Arc<B> {
    fn search(
        &self,
        booking_type: BookingType,
        query: &str,
    ) -> impl Future<Output = Result<Vec<BookingOption>, BackendError>> + Send {
        (**self).search(booking_type, query)
    }

    fn book(
        &self,
        option_id: &str,
    ) -> impl Future<Output = Result<BookingConfirmation, BackendError>> + Send {
        (**self).book(option_id)
    }
}

/// Fixed catalog of options, three per booking type.
///
/// A production deployment replaces this with real travel and
/// reservation APIs; the handler logic is identical either way.
#[derive(Debug, Default)]
pub struct StaticBookingCatalog;

impl StaticBookingCatalog {
    pub fn new() -> Self {
        Self
    }

    fn options_for(booking_type: BookingType) -> Vec<BookingOption> {
        match booking_type {
            BookingType::Flight => vec![
                BookingOption {
                    id: "flight_001".to_string(),
                    booking_type,
                    description: "Nonstop departure 08:15, economy".to_string(),
                    price: 245.00,
                },
                BookingOption {
                    id: "flight_002".to_string(),
                    booking_type,
                    description: "One stop departure 11:40, economy".to_string(),
                    price: 189.00,
                },
                BookingOption {
                    id: "flight_003".to_string(),
                    booking_type,
                    description: "Nonstop departure 18:05, business".to_string(),
                    price: 560.00,
                },
            ],
            BookingType::Hotel => vec![
                BookingOption {
                    id: "hotel_001".to_string(),
                    booking_type,
                    description: "Downtown, 4 stars, breakfast included".to_string(),
                    price: 160.00,
                },
                BookingOption {
                    id: "hotel_002".to_string(),
                    booking_type,
                    description: "Near airport, 3 stars".to_string(),
                    price: 95.00,
                },
                BookingOption {
                    id: "hotel_003".to_string(),
                    booking_type,
                    description: "Boutique, 5 stars, spa access".to_string(),
                    price: 310.00,
                },
            ],
            BookingType::Restaurant => vec![
                BookingOption {
                    id: "restaurant_001".to_string(),
                    booking_type,
                    description: "Italian, table for two at 19:00".to_string(),
                    price: 0.00,
                },
                BookingOption {
                    id: "restaurant_002".to_string(),
                    booking_type,
                    description: "Sushi bar, counter seats at 20:00".to_string(),
                    price: 0.00,
                },
                BookingOption {
                    id: "restaurant_003".to_string(),
                    booking_type,
                    description: "Steakhouse, private room at 19:30".to_string(),
                    price: 0.00,
                },
            ],
        }
    }
}

impl BookingBackend for StaticBookingCatalog {
    async fn search(
        &self,
        booking_type: BookingType,
        _query: &str,
    ) -> Result<Vec<BookingOption>, BackendError> {
        Ok(Self::options_for(booking_type))
    }

    async fn book(&self, option_id: &str) -> Result<BookingConfirmation, BackendError> {
        let all_types = [
            BookingType::Flight,
            BookingType::Hotel,
            BookingType::Restaurant,
        ];
        let option = all_types
            .into_iter()
            .flat_map(Self::options_for)
            .find(|o| o.id == option_id)
            .ok_or_else(|| {
                BackendError::InvalidPayload(format!("unknown booking option: {option_id}"))
            })?;

        let uuid = Uuid::now_v7().simple().to_string();
        Ok(BookingConfirmation {
            reference: format!("BK-{}", &uuid[..8].to_uppercase()),
            option,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_returns_three_options_per_type() {
        let catalog = StaticBookingCatalog::new();
        for booking_type in [
            BookingType::Flight,
            BookingType::Hotel,
            BookingType::Restaurant,
        ] {
            let options = catalog.search(booking_type, "anything").await.unwrap();
            assert_eq!(options.len(), 3);
            assert!(options.iter().all(|o| o.booking_type == booking_type));
        }
    }

    #[tokio::test]
    async fn test_book_known_option_issues_reference() {
        let catalog = StaticBookingCatalog::new();
        let confirmation = catalog.book("hotel_002").await.unwrap();
        assert!(confirmation.reference.starts_with("BK-"));
        assert_eq!(confirmation.option.id, "hotel_002");
    }

    #[tokio::test]
    async fn test_book_unknown_option_fails() {
        let catalog = StaticBookingCatalog::new();
        let err = catalog.book("cruise_001").await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidPayload(_)));
    }
}
