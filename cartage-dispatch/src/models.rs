use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Collection names in the document store.
pub mod collections {
    pub const DELIVERIES: &str = "deliveries";
    pub const PAYMENTS: &str = "payments";
    pub const TRUCKS: &str = "trucks";
    pub const DRIVERS: &str = "drivers";
    pub const HELPERS: &str = "helpers";
    pub const CLIENTS: &str = "clients";
    pub const ALLOCATIONS: &str = "allocations";
    pub const NOTIFICATIONS: &str = "notifications";
}

/// Delivery status in the lifecycle.
///
/// Canonical form is lowercase kebab-case; the aliases cover legacy
/// spellings still sent by older mobile builds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryStatus {
    Pending,
    Accepted,
    #[serde(alias = "in-progress", alias = "in_progress")]
    Started,
    #[serde(alias = "picked_up")]
    PickedUp,
    #[serde(alias = "awaiting-confirmation")]
    Delivered,
    Completed,
    Cancelled,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Accepted => "accepted",
            DeliveryStatus::Started => "started",
            DeliveryStatus::PickedUp => "picked-up",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Completed => "completed",
            DeliveryStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Completed | DeliveryStatus::Cancelled)
    }

    /// Transition guard table. Self-transitions are never allowed, so a
    /// delivery already concluded cannot re-run its side effects.
    pub fn can_transition_to(&self, target: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, target),
            (Pending, Accepted)
                | (Pending, Cancelled)
                | (Accepted, Started)
                | (Accepted, Cancelled)
                | (Started, PickedUp)
                | (Started, Cancelled)
                | (PickedUp, Delivered)
                | (PickedUp, Cancelled)
                | (Delivered, Completed)
                | (Delivered, Cancelled)
        )
    }

    /// Crew (driver/helper) status mirrored onto the delivery for this
    /// transition.
    pub fn crew_status(&self) -> CrewStatus {
        match self {
            DeliveryStatus::Pending => CrewStatus::Active,
            DeliveryStatus::Accepted => CrewStatus::Accepted,
            DeliveryStatus::Started | DeliveryStatus::PickedUp => CrewStatus::InProgress,
            DeliveryStatus::Delivered => CrewStatus::Delivered,
            DeliveryStatus::Completed => CrewStatus::Completed,
            DeliveryStatus::Cancelled => CrewStatus::Cancelled,
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "accepted" => Ok(DeliveryStatus::Accepted),
            "started" | "in-progress" | "in_progress" => Ok(DeliveryStatus::Started),
            "picked-up" | "picked_up" => Ok(DeliveryStatus::PickedUp),
            "delivered" | "awaiting-confirmation" => Ok(DeliveryStatus::Delivered),
            "completed" => Ok(DeliveryStatus::Completed),
            "cancelled" => Ok(DeliveryStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognized delivery status: {0}")]
pub struct UnknownStatus(pub String);

/// Derived payment standing of a delivery or payment record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Pending,
    Paid,
    Overdue,
    Failed,
    Cancelled,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Paid => "paid",
            PaymentState::Overdue => "overdue",
            PaymentState::Failed => "failed",
            PaymentState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TruckStatus {
    Available,
    Free,
    OnDelivery,
    Maintenance,
}

impl TruckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TruckStatus::Available => "available",
            TruckStatus::Free => "free",
            TruckStatus::OnDelivery => "on-delivery",
            TruckStatus::Maintenance => "maintenance",
        }
    }
}

/// Driver/helper status vocabulary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CrewStatus {
    Active,
    Accepted,
    InProgress,
    Delivered,
    Completed,
    Cancelled,
}

impl CrewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrewStatus::Active => "active",
            CrewStatus::Accepted => "accepted",
            CrewStatus::InProgress => "in_progress",
            CrewStatus::Delivered => "delivered",
            CrewStatus::Completed => "completed",
            CrewStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// One truck-haul job from booking to completion.
///
/// Field names serialize in the document store's camelCase schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub id: String,
    pub client_id: String,
    #[serde(default)]
    pub truck_id: Option<String>,
    #[serde(default)]
    pub driver_id: Option<String>,
    #[serde(default)]
    pub driver_name: Option<String>,
    #[serde(default)]
    pub helper_id: Option<String>,
    pub status: DeliveryStatus,
    pub payment_status: PaymentState,
    #[serde(default)]
    pub rate: Option<f64>,
    #[serde(default)]
    pub distance_km: f64,
    #[serde(default)]
    pub delivery_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub picked_up_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub driver_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub final_completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub awaiting_client_confirmation: bool,
    #[serde(default)]
    pub location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Delivery {
    pub fn new(client_id: impl Into<String>, truck_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.into(),
            truck_id,
            driver_id: None,
            driver_name: None,
            helper_id: None,
            status: DeliveryStatus::Pending,
            payment_status: PaymentState::Pending,
            rate: None,
            distance_km: 0.0,
            delivery_date: None,
            due_date: None,
            accepted_at: None,
            started_at: None,
            picked_up_at: None,
            delivered_at: None,
            driver_completed_at: None,
            completed_at: None,
            final_completed_at: None,
            cancelled_at: None,
            awaiting_client_confirmation: false,
            location: None,
            created_at: now,
            updated_at: Some(now),
        }
    }
}

/// The billable record tied 1:1 to a delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: String,
    pub delivery_id: String,
    pub client_id: String,
    pub amount: f64,
    pub currency: String,
    pub status: PaymentState,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub intent_id: Option<String>,
    #[serde(default)]
    pub transaction_fee: Option<f64>,
    #[serde(default)]
    pub net_amount: Option<f64>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Billing defaults applied when a delivery has no stored override.
#[derive(Debug, Clone)]
pub struct PaymentRules {
    pub due_days: i64,
    pub default_rate: f64,
    pub currency: String,
}

impl Default for PaymentRules {
    fn default() -> Self {
        Self {
            due_days: 30,
            default_rate: 5000.0,
            currency: "PHP".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parses_legacy_spellings() {
        assert_eq!("in-progress".parse::<DeliveryStatus>().unwrap(), DeliveryStatus::Started);
        assert_eq!("picked_up".parse::<DeliveryStatus>().unwrap(), DeliveryStatus::PickedUp);
        assert_eq!(
            "awaiting-confirmation".parse::<DeliveryStatus>().unwrap(),
            DeliveryStatus::Delivered
        );
        assert!("unloading".parse::<DeliveryStatus>().is_err());
    }

    #[test]
    fn test_transition_guards() {
        use DeliveryStatus::*;

        assert!(Pending.can_transition_to(Accepted));
        assert!(PickedUp.can_transition_to(Delivered));
        assert!(Delivered.can_transition_to(Completed));
        assert!(Accepted.can_transition_to(Cancelled));

        // No skipping ahead, no going back, no repeats.
        assert!(!Pending.can_transition_to(Delivered));
        assert!(!Completed.can_transition_to(Accepted));
        assert!(!Completed.can_transition_to(Completed));
        assert!(!Cancelled.can_transition_to(Accepted));
    }

    #[test]
    fn test_delivery_roundtrips_camel_case() {
        let delivery = Delivery::new("client-1", Some("truck-1".to_string()));
        let value = serde_json::to_value(&delivery).unwrap();

        assert_eq!(value["clientId"], "client-1");
        assert_eq!(value["truckId"], "truck-1");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["paymentStatus"], "pending");

        let back: Delivery = serde_json::from_value(value).unwrap();
        assert_eq!(back.status, DeliveryStatus::Pending);
    }
}
