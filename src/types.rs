use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Weight used when a stored prize has no probability set.
pub const DEFAULT_PRIZE_WEIGHT: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrizeOption {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(default)]
    pub image: String,
    /// Unnormalized draw weight; the admin console calls it "probability".
    #[serde(rename = "probability")]
    pub weight: f64,
}

impl PrizeOption {
    pub fn new(id: &str, display_name: &str, weight: f64) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            image: String::new(),
            weight,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinOutcome {
    pub reels: [PrizeOption; 3],
    pub is_winner: bool,
    pub cost_charged: i64,
}

impl SpinOutcome {
    pub fn winning_option(&self) -> Option<&PrizeOption> {
        if self.is_winner {
            Some(&self.reels[0])
        } else {
            None
        }
    }

    pub fn result_ids(&self) -> Vec<String> {
        self.reels.iter().map(|r| r.id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WonPrizeTicket {
    pub ticket_id: String,
    pub prize_id: String,
    pub prize_name: String,
    pub prize_image: String,
    pub owner_id: String,
    pub owner_display_name: String,
    pub claimed: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub redemption_id: Option<i64>,
    #[serde(rename = "createdAt")]
    pub issued_at: String,
}

/// Audit row written for every committed spin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinRecord {
    pub id: i64,
    pub user_id: String,
    pub results: Vec<String>,
    pub is_winner: bool,
    pub prize: Option<String>,
    pub ticket_id: Option<String>,
    pub credits_spent: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub credits: i64,
}

/// Returned by the storage layer when a TEXT column holds an unexpected tag.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormCategory {
    #[serde(rename = "streaming")]
    Streaming,
    #[serde(rename = "giftcard")]
    GiftCard,
    #[serde(rename = "credits")]
    MobileCredit,
    #[serde(rename = "physical")]
    Physical,
    #[serde(rename = "default")]
    Generic,
}

impl FormCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormCategory::Streaming => "streaming",
            FormCategory::GiftCard => "giftcard",
            FormCategory::MobileCredit => "credits",
            FormCategory::Physical => "physical",
            FormCategory::Generic => "default",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownVariant> {
        match value {
            "streaming" => Ok(FormCategory::Streaming),
            "giftcard" => Ok(FormCategory::GiftCard),
            "credits" => Ok(FormCategory::MobileCredit),
            "physical" => Ok(FormCategory::Physical),
            "default" => Ok(FormCategory::Generic),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Email,
    Password,
    Tel,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormField {
    pub name: &'static str,
    pub label: &'static str,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub placeholder: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormSpec {
    pub category: FormCategory,
    pub title: &'static str,
    pub fields: &'static [FormField],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedemptionStatus {
    Pending,
    Success,
    Rejected,
}

impl RedemptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedemptionStatus::Pending => "pending",
            RedemptionStatus::Success => "success",
            RedemptionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownVariant> {
        match value {
            "pending" => Ok(RedemptionStatus::Pending),
            "success" => Ok(RedemptionStatus::Success),
            "rejected" => Ok(RedemptionStatus::Rejected),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl fmt::Display for RedemptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redemption {
    pub id: i64,
    pub ticket_id: String,
    pub prize_name: String,
    pub prize_image: String,
    pub user_id: String,
    pub user_name: String,
    pub user_phone: String,
    pub form_type: FormCategory,
    pub form_data: BTreeMap<String, String>,
    pub status: RedemptionStatus,
    pub created_at: String,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrizeWinCount {
    pub prize_id: String,
    pub prize_name: String,
    pub wins: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinStatistics {
    pub total_spins: i64,
    pub total_wins: i64,
    pub credits_spent: i64,
    pub wins_by_prize: Vec<PrizeWinCount>,
    pub pending_redemptions: i64,
    pub successful_redemptions: i64,
    pub rejected_redemptions: i64,
    /// Sum of amounts the relay confirmed, credited or not.
    pub revenue: i64,
    pub settled_payments: i64,
    pub failed_payments: i64,
    /// Settled by the relay but never credited; needs manual follow-up.
    pub uncredited_payments: i64,
}

/// Outcome of one purchase attempt against the payment relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
    Failed,
    /// The relay took the money but the credit award did not commit.
    Uncredited,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Uncredited => "uncredited",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownVariant> {
        match value {
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            "uncredited" => Ok(PaymentStatus::Uncredited),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    pub id: i64,
    pub user_id: String,
    pub amount: i64,
    pub number_phone: String,
    pub status: PaymentStatus,
    /// Relay transaction id, when the relay answered with one.
    pub transaction_id: Option<String>,
    pub message: String,
    pub credits_awarded: i64,
    pub created_at: String,
}
