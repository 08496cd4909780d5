use rusqlite::{Connection, TransactionBehavior};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::database::{self, NewPayment, NewRedemption};
use crate::draw::{self, generate_ticket_id, uniform_source};
use crate::error::{DrawError, RedemptionError, SpinError};
use crate::events::{EventBus, WheelEvent};
use crate::redemption::{classify, validate_form};
use crate::types::{
    PaymentStatus, PaymentTransaction, Redemption, RedemptionStatus, SpinOutcome, SpinRecord,
    WonPrizeTicket,
};

/// What a committed spin hands back to the caller.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpinReceipt {
    pub outcome: SpinOutcome,
    pub ticket: Option<WonPrizeTicket>,
    pub record: SpinRecord,
    pub balance: i64,
}

/// Runs balance-changing wheel operations as single-writer transactions.
pub struct SpinService {
    connection: Arc<Mutex<Connection>>,
    events: EventBus,
}

impl SpinService {
    pub fn new(connection: Arc<Mutex<Connection>>) -> Self {
        Self::with_events(connection, EventBus::default())
    }

    pub fn with_events(connection: Arc<Mutex<Connection>>, events: EventBus) -> Self {
        Self { connection, events }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// A rolled-back transaction leaves the connection usable, so a poisoned
    /// lock is recovered rather than propagated.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn spin(&self, user_id: &str) -> Result<SpinReceipt, SpinError> {
        let mut rng = rand::thread_rng();
        self.spin_with(user_id, &mut uniform_source(&mut rng), generate_ticket_id)
    }

    /// Verify balance, debit, draw, mint the ticket on a win and write the
    /// audit row, all inside one IMMEDIATE transaction. Any error rolls back.
    pub fn spin_with<R, G>(
        &self,
        user_id: &str,
        random: &mut R,
        id_generator: G,
    ) -> Result<SpinReceipt, SpinError>
    where
        R: FnMut() -> f64,
        G: FnOnce() -> String,
    {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let prizes = database::get_all_prizes(&tx)?;
        draw::total_weight(&prizes)?;
        let cost = database::get_spin_cost(&tx)?;
        if cost < 0 {
            return Err(
                DrawError::Configuration(format!("spin cost {} is negative", cost)).into(),
            );
        }

        let user = database::get_user(&tx, user_id)?
            .ok_or_else(|| SpinError::UnknownUser(user_id.to_string()))?;
        if !database::debit_credits(&tx, user_id, cost)? {
            debug!(user_id, cost, available = user.credits, "spin refused");
            return Err(SpinError::InsufficientBalance {
                required: cost,
                available: user.credits,
            });
        }

        let outcome = draw::evaluate_spin(&prizes, random, cost)?;
        let ticket = match outcome.winning_option() {
            Some(winning) => {
                let ticket = draw::issue_ticket(winning, &user, id_generator);
                database::save_won_prize(&tx, &ticket)?;
                Some(ticket)
            }
            None => None,
        };
        let record = database::save_spin_record(
            &tx,
            user_id,
            &outcome,
            ticket.as_ref().map(|t| t.ticket_id.as_str()),
        )?;
        tx.commit()?;
        drop(conn);

        let balance = user.credits - cost;
        info!(
            user_id,
            winner = outcome.is_winner,
            results = ?record.results,
            balance,
            "spin committed"
        );

        if let Some(ticket) = &ticket {
            self.events.publish(WheelEvent::TicketIssued {
                ticket: ticket.clone(),
            });
        }
        self.events.publish(WheelEvent::SpinCompleted {
            record: record.clone(),
        });
        self.events.publish(WheelEvent::BalanceChanged {
            user_id: user_id.to_string(),
            credits: balance,
        });

        Ok(SpinReceipt {
            outcome,
            ticket,
            record,
            balance,
        })
    }

    /// Adds (or with a negative amount removes) credits; returns the new balance.
    pub fn adjust_credits(&self, user_id: &str, delta: i64) -> Result<i64, SpinError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let balance = apply_delta(&tx, user_id, delta)?;
        tx.commit()?;
        drop(conn);

        self.events.publish(WheelEvent::BalanceChanged {
            user_id: user_id.to_string(),
            credits: balance,
        });
        Ok(balance)
    }

    /// Credits the configured purchase reward and writes the settled payment
    /// row in one transaction. Returns the row and the new balance.
    pub fn settle_payment(
        &self,
        payment: &NewPayment<'_>,
    ) -> Result<(PaymentTransaction, i64), SpinError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let reward = database::get_credits_per_purchase(&tx)?;
        if reward <= 0 {
            return Err(SpinError::InvalidAmount(reward));
        }
        let balance = apply_delta(&tx, payment.user_id, reward)?;
        let record = database::save_payment(
            &tx,
            &NewPayment {
                status: PaymentStatus::Success,
                credits_awarded: reward,
                ..*payment
            },
        )?;
        tx.commit()?;
        drop(conn);

        self.events.publish(WheelEvent::BalanceChanged {
            user_id: payment.user_id.to_string(),
            credits: balance,
        });
        Ok((record, balance))
    }

    /// Writes a payment attempt that credited nothing.
    pub fn record_payment(&self, payment: &NewPayment<'_>) -> Result<PaymentTransaction, SpinError> {
        Ok(database::save_payment(&self.lock(), payment)?)
    }

    pub fn redeem_ticket(
        &self,
        user_id: &str,
        ticket_id: &str,
        form: &HashMap<String, String>,
    ) -> Result<Redemption, RedemptionError> {
        let ticket_id = ticket_id.trim();
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let ticket = database::get_won_prize(&tx, ticket_id)?
            .ok_or_else(|| RedemptionError::TicketNotFound(ticket_id.to_string()))?;
        if ticket.owner_id != user_id {
            warn!(user_id, ticket_id, "redemption attempt on another user's ticket");
            return Err(RedemptionError::NotOwner(ticket_id.to_string()));
        }
        if ticket.claimed {
            return Err(RedemptionError::AlreadyClaimed(ticket_id.to_string()));
        }

        let category = classify(&ticket.prize_name);
        let form_data = validate_form(category, form)?;
        let (user_name, user_phone) = match database::get_user(&tx, user_id)? {
            Some(user) => (user.display_name, user.phone),
            None => (ticket.owner_display_name.clone(), String::new()),
        };

        let redemption_id = database::save_redemption(
            &tx,
            &NewRedemption {
                ticket: &ticket,
                user_name: &user_name,
                user_phone: &user_phone,
                form_type: category,
                form_data: &form_data,
            },
        )?;
        if !database::mark_ticket_claimed(&tx, ticket_id, redemption_id)? {
            return Err(RedemptionError::AlreadyClaimed(ticket_id.to_string()));
        }
        let redemption = database::get_redemption(&tx, redemption_id)?
            .ok_or(RedemptionError::NotFound(redemption_id))?;
        tx.commit()?;
        drop(conn);

        info!(
            user_id,
            ticket_id,
            redemption_id,
            form_type = category.as_str(),
            "redemption requested"
        );
        self.events.publish(WheelEvent::RedemptionRequested {
            redemption_id,
            ticket_id: ticket_id.to_string(),
        });
        Ok(redemption)
    }

    pub fn update_redemption_status(
        &self,
        redemption_id: i64,
        status: RedemptionStatus,
    ) -> Result<Redemption, RedemptionError> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = database::get_redemption(&tx, redemption_id)?
            .ok_or(RedemptionError::NotFound(redemption_id))?;
        if status == RedemptionStatus::Pending || current.status != RedemptionStatus::Pending {
            return Err(RedemptionError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }
        if !database::update_redemption_status(&tx, redemption_id, status)? {
            return Err(RedemptionError::InvalidTransition {
                from: current.status,
                to: status,
            });
        }
        let updated = database::get_redemption(&tx, redemption_id)?
            .ok_or(RedemptionError::NotFound(redemption_id))?;
        tx.commit()?;
        drop(conn);

        info!(redemption_id, status = status.as_str(), "redemption status updated");
        self.events
            .publish(WheelEvent::RedemptionStatusChanged { redemption_id, status });
        Ok(updated)
    }
}

/// Checks the new balance in Rust before the UPDATE so SQLite never sees
/// an overflowing sum.
fn apply_delta(conn: &Connection, user_id: &str, delta: i64) -> Result<i64, SpinError> {
    let user = database::get_user(conn, user_id)?
        .ok_or_else(|| SpinError::UnknownUser(user_id.to_string()))?;
    let balance = user
        .credits
        .checked_add(delta)
        .ok_or(SpinError::InvalidAmount(delta))?;
    if balance < 0 || !database::adjust_credits(conn, user_id, delta)? {
        return Err(SpinError::InsufficientBalance {
            required: delta.checked_neg().ok_or(SpinError::InvalidAmount(delta))?,
            available: user.credits,
        });
    }
    Ok(balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PrizeOption, UserAccount};

    fn service_with(credits: i64, prizes: &[PrizeOption]) -> SpinService {
        let conn = Connection::open_in_memory().unwrap();
        database::create_database_with_connection(&conn).unwrap();
        for prize in prizes {
            database::upsert_prize(&conn, prize).unwrap();
        }
        database::create_user(
            &conn,
            &UserAccount {
                id: "u1".to_string(),
                display_name: "Ana".to_string(),
                phone: "+258841112222".to_string(),
                credits,
            },
        )
        .unwrap();
        SpinService::new(Arc::new(Mutex::new(conn)))
    }

    fn fixed(values: Vec<f64>) -> impl FnMut() -> f64 {
        let mut iter = values.into_iter().cycle();
        move || iter.next().unwrap_or(0.0)
    }

    fn abc() -> Vec<PrizeOption> {
        vec![
            PrizeOption::new("A", "Netflix Premium", 80.0),
            PrizeOption::new("B", "Xbox Gift Card", 15.0),
            PrizeOption::new("C", "Fone JBL", 5.0),
        ]
    }

    #[test]
    fn losing_spin_debits_and_records() {
        let service = service_with(30, &abc());
        let receipt = service
            .spin_with("u1", &mut fixed(vec![0.1, 0.9, 0.99]), || unreachable!())
            .unwrap();

        assert!(!receipt.outcome.is_winner);
        assert!(receipt.ticket.is_none());
        assert_eq!(receipt.balance, 20);
        assert_eq!(receipt.record.results, vec!["A", "B", "C"]);
        assert_eq!(receipt.record.prize, None);
        assert_eq!(receipt.record.credits_spent, 10);

        let conn = service.lock();
        assert_eq!(database::get_user(&conn, "u1").unwrap().unwrap().credits, 20);
        assert_eq!(database::count_spins(&conn).unwrap(), 1);
    }

    #[test]
    fn empty_wheel_refuses_without_touching_balance() {
        let service = service_with(10, &[]);
        let err = service.spin("u1").unwrap_err();
        assert!(matches!(err, SpinError::Configuration(_)));

        let conn = service.lock();
        assert_eq!(database::get_user(&conn, "u1").unwrap().unwrap().credits, 10);
        assert_eq!(database::count_spins(&conn).unwrap(), 0);
    }

    #[test]
    fn unknown_user_is_refused() {
        let service = service_with(10, &abc());
        assert!(matches!(service.spin("ghost"), Err(SpinError::UnknownUser(_))));
    }

    #[test]
    fn insufficient_balance_is_refused() {
        let service = service_with(9, &abc());
        match service.spin("u1") {
            Err(SpinError::InsufficientBalance {
                required,
                available,
            }) => {
                assert_eq!(required, 10);
                assert_eq!(available, 9);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn redemption_requires_owner_and_complete_form() {
        let service = service_with(10, &abc());
        let receipt = service
            .spin_with("u1", &mut fixed(vec![0.2]), || "PRIZE-T-1".to_string())
            .unwrap();
        assert_eq!(receipt.ticket.as_ref().map(|t| t.ticket_id.as_str()), Some("PRIZE-T-1"));

        let mut form = HashMap::new();
        form.insert("email".to_string(), "ana@example.com".to_string());

        assert!(matches!(
            service.redeem_ticket("u2", "PRIZE-T-1", &form),
            Err(RedemptionError::NotOwner(_))
        ));
        assert!(matches!(
            service.redeem_ticket("u1", "PRIZE-T-1", &form),
            Err(RedemptionError::MissingFields(_))
        ));

        form.insert("password".to_string(), "s3cret!".to_string());
        let redemption = service.redeem_ticket("u1", " PRIZE-T-1 ", &form).unwrap();
        assert_eq!(redemption.status, RedemptionStatus::Pending);
        assert_eq!(redemption.form_type.as_str(), "streaming");
        assert_eq!(redemption.user_phone, "+258841112222");

        assert!(matches!(
            service.redeem_ticket("u1", "PRIZE-T-1", &form),
            Err(RedemptionError::AlreadyClaimed(_))
        ));
    }

    #[test]
    fn redemption_status_cannot_go_back() {
        let service = service_with(10, &abc());
        service
            .spin_with("u1", &mut fixed(vec![0.97]), || "PRIZE-T-2".to_string())
            .unwrap();
        let mut form = HashMap::new();
        for field in ["fullName", "phone", "province", "city", "address", "reference"] {
            form.insert(field.to_string(), "x".to_string());
        }
        let redemption = service.redeem_ticket("u1", "PRIZE-T-2", &form).unwrap();

        assert!(matches!(
            service.update_redemption_status(redemption.id, RedemptionStatus::Pending),
            Err(RedemptionError::InvalidTransition { .. })
        ));
        let done = service
            .update_redemption_status(redemption.id, RedemptionStatus::Rejected)
            .unwrap();
        assert_eq!(done.status, RedemptionStatus::Rejected);
        assert!(done.updated_at.is_some());
        assert!(matches!(
            service.update_redemption_status(redemption.id, RedemptionStatus::Success),
            Err(RedemptionError::InvalidTransition { .. })
        ));
        assert!(matches!(
            service.update_redemption_status(999, RedemptionStatus::Success),
            Err(RedemptionError::NotFound(999))
        ));
    }

    #[test]
    fn committed_spin_is_published() {
        let service = service_with(10, &abc());
        let mut sub = service.events().subscribe();
        service
            .spin_with("u1", &mut fixed(vec![0.5]), || "PRIZE-T-3".to_string())
            .unwrap();

        assert!(matches!(sub.try_next(), Some(WheelEvent::TicketIssued { .. })));
        assert!(matches!(sub.try_next(), Some(WheelEvent::SpinCompleted { .. })));
        assert_eq!(
            sub.try_next(),
            Some(WheelEvent::BalanceChanged {
                user_id: "u1".to_string(),
                credits: 0
            })
        );
    }

    fn payment(user_id: &str) -> NewPayment<'_> {
        NewPayment {
            user_id,
            amount: 150,
            number_phone: "841234567",
            status: PaymentStatus::Failed,
            transaction_id: Some("tx-1"),
            message: "ok",
            credits_awarded: 0,
        }
    }

    #[test]
    fn purchase_reward_uses_setting() {
        let service = service_with(0, &abc());
        database::set_setting(&service.lock(), database::CREDITS_PER_PURCHASE_KEY, 25).unwrap();
        let (record, balance) = service.settle_payment(&payment("u1")).unwrap();
        assert_eq!(balance, 25);
        assert_eq!(record.status, PaymentStatus::Success);
        assert_eq!(record.credits_awarded, 25);
        assert!(matches!(
            service.adjust_credits("u1", -30),
            Err(SpinError::InsufficientBalance { .. })
        ));
        assert_eq!(service.adjust_credits("u1", -5).unwrap(), 20);
    }

    #[test]
    fn failed_settlement_writes_nothing() {
        let service = service_with(0, &abc());
        database::set_setting(&service.lock(), database::CREDITS_PER_PURCHASE_KEY, 0).unwrap();
        assert!(matches!(
            service.settle_payment(&payment("u1")),
            Err(SpinError::InvalidAmount(0))
        ));
        assert!(matches!(
            service.settle_payment(&payment("ghost")),
            Err(SpinError::InvalidAmount(0))
        ));

        database::set_setting(&service.lock(), database::CREDITS_PER_PURCHASE_KEY, 10).unwrap();
        assert!(matches!(
            service.settle_payment(&payment("ghost")),
            Err(SpinError::UnknownUser(_))
        ));
        let conn = service.lock();
        assert!(database::get_payments_for_user(&conn, "u1", 10).unwrap().is_empty());
        assert!(database::get_payments_for_user(&conn, "ghost", 10).unwrap().is_empty());
        assert_eq!(database::get_user(&conn, "u1").unwrap().unwrap().credits, 0);
    }

    #[test]
    fn extreme_deltas_are_refused_without_touching_balance() {
        let service = service_with(5, &abc());
        assert!(matches!(
            service.adjust_credits("u1", i64::MAX),
            Err(SpinError::InvalidAmount(i64::MAX))
        ));
        assert!(matches!(
            service.adjust_credits("u1", i64::MIN),
            Err(SpinError::InvalidAmount(i64::MIN))
        ));

        // The row still reads back as an integer balance.
        assert_eq!(
            database::get_user(&service.lock(), "u1").unwrap().unwrap().credits,
            5
        );
        assert_eq!(service.adjust_credits("u1", i64::MAX - 5).unwrap(), i64::MAX);
        assert!(matches!(
            service.adjust_credits("u1", 1),
            Err(SpinError::InvalidAmount(1))
        ));
    }

    #[test]
    fn zero_weight_wheel_refuses_without_touching_balance() {
        let service = service_with(10, &[]);
        service
            .lock()
            .execute(
                "INSERT INTO roulette_prizes (id, name, image, probability) VALUES ('z', 'Netflix', '', 0)",
                [],
            )
            .unwrap();

        assert!(matches!(service.spin("u1"), Err(SpinError::Configuration(_))));

        let conn = service.lock();
        assert_eq!(database::get_user(&conn, "u1").unwrap().unwrap().credits, 10);
        assert_eq!(database::count_spins(&conn).unwrap(), 0);
    }
}
