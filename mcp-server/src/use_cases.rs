use anyhow::Result;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use prize_wheel::api::{PaymentRelayClient, purchase_credits};
use prize_wheel::database;
use prize_wheel::draw::total_weight;
use prize_wheel::reports;
use prize_wheel::utils::{now_millis, random_base36, to_base36};
use prize_wheel::{PrizeOption, RedemptionStatus, SpinService, UserAccount, classify, form_fields};

fn required_str<'a>(arguments: &'a HashMap<String, Value>, key: &str) -> Result<&'a str> {
    arguments
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Missing {} parameter", key))
}

fn required_i64(arguments: &HashMap<String, Value>, key: &str) -> Result<i64> {
    arguments
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| anyhow::anyhow!("Missing {} parameter", key))
}

const DEFAULT_HISTORY_LIMIT: i64 = 20;
const MAX_HISTORY_LIMIT: i64 = 100;

/// History page size, clamped so a negative value never means "no limit".
fn history_limit(arguments: &HashMap<String, Value>) -> i64 {
    arguments
        .get("limit")
        .and_then(|v| v.as_i64())
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT)
}

pub struct WheelUseCase {
    service: Arc<SpinService>,
}

impl WheelUseCase {
    pub fn new(service: Arc<SpinService>) -> Self {
        Self { service }
    }

    pub async fn spin(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let user_id = required_str(arguments, "user_id")?;
        let receipt = self.service.spin(user_id)?;

        Ok(json!({
            "success": true,
            "isWinner": receipt.outcome.is_winner,
            "receipt": receipt
        })
        .to_string())
    }

    pub async fn get_balance(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let user_id = required_str(arguments, "user_id")?;
        let user = database::get_user(&self.service.lock(), user_id)?
            .ok_or_else(|| anyhow::anyhow!("Unknown user: {}", user_id))?;

        Ok(json!({
            "success": true,
            "user_id": user.id,
            "credits": user.credits
        })
        .to_string())
    }

    pub async fn list_prizes(&self, _arguments: &HashMap<String, Value>) -> Result<String> {
        let prizes = database::get_all_prizes(&self.service.lock())?;
        let total = total_weight(&prizes).unwrap_or(0.0);
        let listed: Vec<Value> = prizes
            .iter()
            .map(|p| {
                let share = if total > 0.0 { p.weight / total } else { 0.0 };
                json!({
                    "id": p.id,
                    "name": p.display_name,
                    "image": p.image,
                    "probability": p.weight,
                    "share": share
                })
            })
            .collect();

        Ok(json!({
            "success": true,
            "prizes": listed
        })
        .to_string())
    }

    pub async fn get_spin_cost(&self, _arguments: &HashMap<String, Value>) -> Result<String> {
        let cost = database::get_spin_cost(&self.service.lock())?;

        Ok(json!({
            "success": true,
            "spin_cost": cost
        })
        .to_string())
    }

    pub async fn get_spin_history(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let user_id = required_str(arguments, "user_id")?;
        let limit = history_limit(arguments);

        let spins = database::get_spins_for_user(&self.service.lock(), user_id, limit)?;

        Ok(json!({
            "success": true,
            "spins": spins
        })
        .to_string())
    }

    pub async fn get_my_tickets(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let user_id = required_str(arguments, "user_id")?;
        let tickets = database::get_won_prizes_for_user(&self.service.lock(), user_id)?;

        Ok(json!({
            "success": true,
            "tickets": tickets
        })
        .to_string())
    }
}

pub struct RedemptionUseCase {
    service: Arc<SpinService>,
}

impl RedemptionUseCase {
    pub fn new(service: Arc<SpinService>) -> Self {
        Self { service }
    }

    pub async fn get_redemption_form(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let ticket_id = required_str(arguments, "ticket_id")?;
        let ticket = database::get_won_prize(&self.service.lock(), ticket_id)?
            .ok_or_else(|| anyhow::anyhow!("Prize ticket not found: {}", ticket_id))?;
        let form = form_fields(classify(&ticket.prize_name));

        Ok(json!({
            "success": true,
            "ticket": ticket,
            "form": form
        })
        .to_string())
    }

    pub async fn redeem_ticket(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let user_id = required_str(arguments, "user_id")?;
        let ticket_id = required_str(arguments, "ticket_id")?;
        let form_data: HashMap<String, String> = arguments
            .get("form_data")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        let redemption = self.service.redeem_ticket(user_id, ticket_id, &form_data)?;

        Ok(json!({
            "success": true,
            "redemption": redemption
        })
        .to_string())
    }
}

pub struct PaymentUseCase {
    service: Arc<SpinService>,
    client: Option<PaymentRelayClient>,
}

impl PaymentUseCase {
    pub fn new(service: Arc<SpinService>, relay_url: Option<&str>) -> Self {
        Self {
            service,
            client: relay_url.map(PaymentRelayClient::new),
        }
    }

    pub async fn purchase_credits(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Payments are disabled: PRIZE_WHEEL_RELAY_URL is not set"))?;
        let user_id = required_str(arguments, "user_id")?;
        let amount = required_i64(arguments, "amount")?;
        let number_phone = required_str(arguments, "number_phone")?;

        let receipt = purchase_credits(client, &self.service, user_id, amount, number_phone).await?;

        Ok(json!({
            "success": true,
            "receipt": receipt
        })
        .to_string())
    }

    pub async fn get_transaction_history(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        let user_id = required_str(arguments, "user_id")?;
        let limit = history_limit(arguments);
        let transactions = database::get_payments_for_user(&self.service.lock(), user_id, limit)?;

        Ok(json!({
            "success": true,
            "transactions": transactions
        })
        .to_string())
    }
}

pub struct AdminUseCase {
    service: Arc<SpinService>,
    admin_token: Option<String>,
    report_path: String,
}

impl AdminUseCase {
    pub fn new(service: Arc<SpinService>, admin_token: Option<String>, report_path: String) -> Self {
        Self {
            service,
            admin_token,
            report_path,
        }
    }

    fn authorize(&self, arguments: &HashMap<String, Value>) -> Result<()> {
        let expected = self
            .admin_token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Admin tools are disabled: PRIZE_WHEEL_ADMIN_TOKEN is not set"))?;
        let provided = arguments
            .get("admin_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Missing admin_token parameter"))?;

        if !tokens_match(provided.as_bytes(), expected.as_bytes()) {
            tracing::warn!("rejected admin call with invalid token");
            anyhow::bail!("Invalid admin token");
        }
        Ok(())
    }

    pub async fn create_user(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        self.authorize(arguments)?;
        let user = UserAccount {
            id: required_str(arguments, "user_id")?.to_string(),
            display_name: required_str(arguments, "display_name")?.to_string(),
            phone: arguments
                .get("phone")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            credits: arguments.get("credits").and_then(|v| v.as_i64()).unwrap_or(0),
        };
        if user.credits < 0 {
            anyhow::bail!("credits must not be negative");
        }
        database::create_user(&self.service.lock(), &user)?;

        Ok(json!({
            "success": true,
            "user": user
        })
        .to_string())
    }

    pub async fn adjust_credits(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        self.authorize(arguments)?;
        let user_id = required_str(arguments, "user_id")?;
        let delta = required_i64(arguments, "delta")?;
        let balance = self.service.adjust_credits(user_id, delta)?;

        Ok(json!({
            "success": true,
            "credits": balance
        })
        .to_string())
    }

    pub async fn upsert_prize(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        self.authorize(arguments)?;
        let name = required_str(arguments, "name")?;
        let weight = arguments
            .get("probability")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| anyhow::anyhow!("Missing probability parameter"))?;
        if !weight.is_finite() || weight <= 0.0 {
            anyhow::bail!("probability must be a positive number, got {}", weight);
        }

        let id = match arguments.get("id").and_then(|v| v.as_str()) {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => format!("{}{}", to_base36(now_millis()), random_base36(4)),
        };
        let prize = PrizeOption {
            id,
            display_name: name.to_string(),
            image: arguments
                .get("image")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            weight,
        };
        database::upsert_prize(&self.service.lock(), &prize)?;

        Ok(json!({
            "success": true,
            "prize": prize
        })
        .to_string())
    }

    pub async fn delete_prize(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        self.authorize(arguments)?;
        let id = required_str(arguments, "id")?;
        let deleted = database::delete_prize(&self.service.lock(), id)?;
        let message = if deleted {
            format!("Deleted prize {}", id)
        } else {
            format!("No prize with id {}", id)
        };

        Ok(json!({
            "success": deleted,
            "message": message
        })
        .to_string())
    }

    pub async fn set_spin_cost(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        self.authorize(arguments)?;
        let cost = required_i64(arguments, "cost")?;
        if cost < 0 {
            anyhow::bail!("cost must not be negative");
        }
        database::set_setting(&self.service.lock(), database::SPIN_COST_KEY, cost)?;

        Ok(json!({
            "success": true,
            "spin_cost": cost
        })
        .to_string())
    }

    pub async fn set_credits_per_purchase(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        self.authorize(arguments)?;
        let credits = required_i64(arguments, "credits")?;
        if credits <= 0 {
            anyhow::bail!("credits must be positive");
        }
        database::set_setting(&self.service.lock(), database::CREDITS_PER_PURCHASE_KEY, credits)?;

        Ok(json!({
            "success": true,
            "credits_per_purchase": credits
        })
        .to_string())
    }

    pub async fn search_ticket(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        self.authorize(arguments)?;
        let ticket_id = required_str(arguments, "ticket_id")?;
        let ticket = database::get_won_prize(&self.service.lock(), ticket_id)?;

        Ok(json!({
            "success": ticket.is_some(),
            "ticket": ticket
        })
        .to_string())
    }

    pub async fn list_redemptions(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        self.authorize(arguments)?;
        let status = arguments
            .get("status")
            .and_then(|v| v.as_str())
            .map(RedemptionStatus::parse)
            .transpose()?;
        let redemptions = database::get_redemptions_by_status(&self.service.lock(), status)?;

        Ok(json!({
            "success": true,
            "redemptions": redemptions
        })
        .to_string())
    }

    pub async fn update_redemption_status(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        self.authorize(arguments)?;
        let redemption_id = required_i64(arguments, "redemption_id")?;
        let status = RedemptionStatus::parse(required_str(arguments, "status")?)?;
        let redemption = self.service.update_redemption_status(redemption_id, status)?;

        Ok(json!({
            "success": true,
            "redemption": redemption
        })
        .to_string())
    }

    pub async fn delete_redemption(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        self.authorize(arguments)?;
        let redemption_id = required_i64(arguments, "redemption_id")?;
        let deleted = database::delete_redemption(&self.service.lock(), redemption_id)?;

        Ok(json!({
            "success": deleted
        })
        .to_string())
    }

    pub async fn generate_and_save_report(&self, arguments: &HashMap<String, Value>) -> Result<String> {
        self.authorize(arguments)?;
        let path = reports::generate_and_save_report(&self.service.lock(), &self.report_path)
            .map_err(|e| anyhow::anyhow!("Report generation error: {}", e))?;

        Ok(json!({
            "success": true,
            "message": format!("Report saved to {}", path.display())
        })
        .to_string())
    }
}

fn tokens_match(provided: &[u8], expected: &[u8]) -> bool {
    if provided.len() != expected.len() {
        return false;
    }
    provided
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::{history_limit, tokens_match};
    use serde_json::{Value, json};
    use std::collections::HashMap;

    fn limit_of(value: Value) -> i64 {
        let mut arguments = HashMap::new();
        arguments.insert("limit".to_string(), value);
        history_limit(&arguments)
    }

    #[test]
    fn history_limit_is_clamped() {
        assert_eq!(history_limit(&HashMap::new()), 20);
        assert_eq!(limit_of(json!(5)), 5);
        assert_eq!(limit_of(json!(-1)), 1);
        assert_eq!(limit_of(json!(0)), 1);
        assert_eq!(limit_of(json!(100_000)), 100);
        assert_eq!(limit_of(json!("ten")), 20);
    }

    #[test]
    fn token_comparison() {
        assert!(tokens_match(b"secret", b"secret"));
        assert!(!tokens_match(b"secret", b"secreT"));
        assert!(!tokens_match(b"secret", b"secret1"));
    }
}
