use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Result, Row};
use std::collections::BTreeMap;
use tracing::info;

use crate::types::{
    DEFAULT_PRIZE_WEIGHT, FormCategory, PaymentStatus, PaymentTransaction, PrizeOption,
    PrizeWinCount, Redemption, RedemptionStatus, SpinOutcome, SpinRecord, SpinStatistics,
    UserAccount, WonPrizeTicket,
};
use crate::utils::{ensure_parent_dir, now_rfc3339};

pub const SPIN_COST_KEY: &str = "rouletteSpinCost";
pub const CREDITS_PER_PURCHASE_KEY: &str = "creditsPerPurchase";
pub const DEFAULT_SPIN_COST: i64 = 10;
pub const DEFAULT_CREDITS_PER_PURCHASE: i64 = 10;

pub fn create_database(path: &str) -> Result<Connection> {
    ensure_parent_dir(path).map_err(|e| {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
            Some(format!("Failed to create directories: {}", e)),
        )
    })?;

    let conn = Connection::open(path)?;
    create_database_with_connection(&conn)?;
    info!(path, "database ready");
    Ok(conn)
}

pub fn create_database_with_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            phone TEXT NOT NULL DEFAULT '',
            credits INTEGER NOT NULL DEFAULT 0 CHECK (credits >= 0),
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS roulette_prizes (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            image TEXT NOT NULL DEFAULT '',
            probability REAL
        );

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS won_prizes (
            ticket_id TEXT PRIMARY KEY,
            prize_id TEXT NOT NULL,
            prize_name TEXT NOT NULL,
            prize_image TEXT NOT NULL,
            owner_id TEXT NOT NULL,
            owner_display_name TEXT NOT NULL,
            claimed INTEGER NOT NULL DEFAULT 0,
            redemption_id INTEGER,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS spins (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            results TEXT NOT NULL,
            is_winner INTEGER NOT NULL,
            prize TEXT,
            ticket_id TEXT,
            credits_spent INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS redemptions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ticket_id TEXT NOT NULL,
            prize_name TEXT NOT NULL,
            prize_image TEXT NOT NULL,
            user_id TEXT NOT NULL,
            user_name TEXT NOT NULL,
            user_phone TEXT NOT NULL,
            form_type TEXT NOT NULL,
            form_data TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            updated_at TEXT
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            amount INTEGER NOT NULL,
            number_phone TEXT NOT NULL,
            status TEXT NOT NULL,
            transaction_id TEXT,
            message TEXT NOT NULL DEFAULT '',
            credits_awarded INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_spins_user ON spins (user_id);
        CREATE INDEX IF NOT EXISTS idx_won_prizes_owner ON won_prizes (owner_id);
        CREATE INDEX IF NOT EXISTS idx_transactions_user ON transactions (user_id);",
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
        (SPIN_COST_KEY, DEFAULT_SPIN_COST),
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
        (CREDITS_PER_PURCHASE_KEY, DEFAULT_CREDITS_PER_PURCHASE),
    )?;

    Ok(())
}

fn to_json_text<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

fn from_json_text<T: serde::de::DeserializeOwned>(idx: usize, text: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

// Users

pub fn create_user(conn: &Connection, user: &UserAccount) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, display_name, phone, credits, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (
            &user.id,
            &user.display_name,
            &user.phone,
            user.credits,
            now_rfc3339(),
        ),
    )?;
    Ok(())
}

pub fn get_user(conn: &Connection, user_id: &str) -> Result<Option<UserAccount>> {
    let mut stmt =
        conn.prepare("SELECT id, display_name, phone, credits FROM users WHERE id = ?1")?;
    let user = stmt
        .query_row([user_id], |row| {
            Ok(UserAccount {
                id: row.get(0)?,
                display_name: row.get(1)?,
                phone: row.get(2)?,
                credits: row.get(3)?,
            })
        })
        .optional()?;
    Ok(user)
}

/// Debits only when the balance covers the amount; returns whether a row changed.
pub fn debit_credits(conn: &Connection, user_id: &str, amount: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET credits = credits - ?1 WHERE id = ?2 AND credits >= ?1",
        (amount, user_id),
    )?;
    Ok(changed > 0)
}

/// Applies a signed delta unless it would take the balance below zero.
pub fn adjust_credits(conn: &Connection, user_id: &str, delta: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET credits = credits + ?1 WHERE id = ?2 AND credits + ?1 >= 0",
        (delta, user_id),
    )?;
    Ok(changed > 0)
}

// Prizes and settings

pub fn upsert_prize(conn: &Connection, prize: &PrizeOption) -> Result<()> {
    conn.execute(
        "INSERT INTO roulette_prizes (id, name, image, probability) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            image = excluded.image,
            probability = excluded.probability",
        (&prize.id, &prize.display_name, &prize.image, prize.weight),
    )?;
    Ok(())
}

pub fn get_all_prizes(conn: &Connection) -> Result<Vec<PrizeOption>> {
    let mut stmt =
        conn.prepare("SELECT id, name, image, probability FROM roulette_prizes ORDER BY rowid")?;
    let prize_iter = stmt.query_map([], |row| {
        Ok(PrizeOption {
            id: row.get(0)?,
            display_name: row.get(1)?,
            image: row.get(2)?,
            weight: row
                .get::<_, Option<f64>>(3)?
                .unwrap_or(DEFAULT_PRIZE_WEIGHT),
        })
    })?;

    let mut prizes = Vec::new();
    for prize in prize_iter {
        prizes.push(prize?);
    }
    Ok(prizes)
}

pub fn delete_prize(conn: &Connection, prize_id: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM roulette_prizes WHERE id = ?1", [prize_id])?;
    Ok(changed > 0)
}

pub fn get_setting(conn: &Connection, key: &str, default: i64) -> Result<i64> {
    let value = conn
        .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| {
            row.get::<_, i64>(0)
        })
        .optional()?;
    Ok(value.unwrap_or(default))
}

pub fn set_setting(conn: &Connection, key: &str, value: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, value),
    )?;
    Ok(())
}

pub fn get_spin_cost(conn: &Connection) -> Result<i64> {
    get_setting(conn, SPIN_COST_KEY, DEFAULT_SPIN_COST)
}

pub fn get_credits_per_purchase(conn: &Connection) -> Result<i64> {
    get_setting(conn, CREDITS_PER_PURCHASE_KEY, DEFAULT_CREDITS_PER_PURCHASE)
}

// Won prize tickets

pub fn save_won_prize(conn: &Connection, ticket: &WonPrizeTicket) -> Result<()> {
    conn.execute(
        "INSERT INTO won_prizes (
            ticket_id, prize_id, prize_name, prize_image, owner_id,
            owner_display_name, claimed, redemption_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        (
            &ticket.ticket_id,
            &ticket.prize_id,
            &ticket.prize_name,
            &ticket.prize_image,
            &ticket.owner_id,
            &ticket.owner_display_name,
            ticket.claimed,
            ticket.redemption_id,
            &ticket.issued_at,
        ),
    )?;
    Ok(())
}

fn ticket_from_row(row: &Row<'_>) -> Result<WonPrizeTicket> {
    Ok(WonPrizeTicket {
        ticket_id: row.get(0)?,
        prize_id: row.get(1)?,
        prize_name: row.get(2)?,
        prize_image: row.get(3)?,
        owner_id: row.get(4)?,
        owner_display_name: row.get(5)?,
        claimed: row.get(6)?,
        redemption_id: row.get(7)?,
        issued_at: row.get(8)?,
    })
}

pub fn get_won_prize(conn: &Connection, ticket_id: &str) -> Result<Option<WonPrizeTicket>> {
    let mut stmt = conn.prepare(
        "SELECT ticket_id, prize_id, prize_name, prize_image, owner_id,
                owner_display_name, claimed, redemption_id, created_at
         FROM won_prizes WHERE ticket_id = ?1",
    )?;
    let ticket = stmt.query_row([ticket_id], ticket_from_row).optional()?;
    Ok(ticket)
}

pub fn get_won_prizes_for_user(conn: &Connection, user_id: &str) -> Result<Vec<WonPrizeTicket>> {
    let mut stmt = conn.prepare(
        "SELECT ticket_id, prize_id, prize_name, prize_image, owner_id,
                owner_display_name, claimed, redemption_id, created_at
         FROM won_prizes WHERE owner_id = ?1
         ORDER BY created_at DESC",
    )?;
    let ticket_iter = stmt.query_map([user_id], ticket_from_row)?;

    let mut tickets = Vec::new();
    for ticket in ticket_iter {
        tickets.push(ticket?);
    }
    Ok(tickets)
}

/// Flips an unclaimed ticket to claimed; false when it was already claimed.
pub fn mark_ticket_claimed(conn: &Connection, ticket_id: &str, redemption_id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE won_prizes SET claimed = 1, redemption_id = ?1
         WHERE ticket_id = ?2 AND claimed = 0",
        (redemption_id, ticket_id),
    )?;
    Ok(changed > 0)
}

// Spin audit records

pub fn save_spin_record(
    conn: &Connection,
    user_id: &str,
    outcome: &SpinOutcome,
    ticket_id: Option<&str>,
) -> Result<SpinRecord> {
    let results = outcome.result_ids();
    let prize = outcome.winning_option().map(|p| p.display_name.clone());
    let created_at = now_rfc3339();

    conn.execute(
        "INSERT INTO spins (user_id, results, is_winner, prize, ticket_id, credits_spent, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        (
            user_id,
            to_json_text(&results)?,
            outcome.is_winner,
            &prize,
            ticket_id,
            outcome.cost_charged,
            &created_at,
        ),
    )?;

    Ok(SpinRecord {
        id: conn.last_insert_rowid(),
        user_id: user_id.to_string(),
        results,
        is_winner: outcome.is_winner,
        prize,
        ticket_id: ticket_id.map(str::to_string),
        credits_spent: outcome.cost_charged,
        created_at,
    })
}

pub fn get_spins_for_user(conn: &Connection, user_id: &str, limit: i64) -> Result<Vec<SpinRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, results, is_winner, prize, ticket_id, credits_spent, created_at
         FROM spins WHERE user_id = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;
    let spin_iter = stmt.query_map((user_id, limit), |row| {
        let results: String = row.get(2)?;
        Ok(SpinRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            results: from_json_text(2, &results)?,
            is_winner: row.get(3)?,
            prize: row.get(4)?,
            ticket_id: row.get(5)?,
            credits_spent: row.get(6)?,
            created_at: row.get(7)?,
        })
    })?;

    let mut spins = Vec::new();
    for spin in spin_iter {
        spins.push(spin?);
    }
    Ok(spins)
}

pub fn count_spins(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM spins", [], |row| row.get(0))
}

// Redemptions

pub struct NewRedemption<'a> {
    pub ticket: &'a WonPrizeTicket,
    pub user_name: &'a str,
    pub user_phone: &'a str,
    pub form_type: FormCategory,
    pub form_data: &'a BTreeMap<String, String>,
}

pub fn save_redemption(conn: &Connection, redemption: &NewRedemption<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO redemptions (
            ticket_id, prize_name, prize_image, user_id, user_name, user_phone,
            form_type, form_data, status, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        (
            &redemption.ticket.ticket_id,
            &redemption.ticket.prize_name,
            &redemption.ticket.prize_image,
            &redemption.ticket.owner_id,
            redemption.user_name,
            redemption.user_phone,
            redemption.form_type.as_str(),
            to_json_text(redemption.form_data)?,
            RedemptionStatus::Pending.as_str(),
            now_rfc3339(),
        ),
    )?;
    Ok(conn.last_insert_rowid())
}

fn redemption_from_row(row: &Row<'_>) -> Result<Redemption> {
    let form_type: String = row.get(7)?;
    let form_data: String = row.get(8)?;
    let status: String = row.get(9)?;
    Ok(Redemption {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        prize_name: row.get(2)?,
        prize_image: row.get(3)?,
        user_id: row.get(4)?,
        user_name: row.get(5)?,
        user_phone: row.get(6)?,
        form_type: FormCategory::parse(&form_type)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?,
        form_data: from_json_text(8, &form_data)?,
        status: RedemptionStatus::parse(&status)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

const REDEMPTION_COLUMNS: &str = "id, ticket_id, prize_name, prize_image, user_id, user_name,
    user_phone, form_type, form_data, status, created_at, updated_at";

pub fn get_redemption(conn: &Connection, redemption_id: i64) -> Result<Option<Redemption>> {
    let query = format!(
        "SELECT {} FROM redemptions WHERE id = ?1",
        REDEMPTION_COLUMNS
    );
    let mut stmt = conn.prepare(&query)?;
    let redemption = stmt
        .query_row([redemption_id], redemption_from_row)
        .optional()?;
    Ok(redemption)
}

pub fn get_redemptions_by_status(
    conn: &Connection,
    status: Option<RedemptionStatus>,
) -> Result<Vec<Redemption>> {
    let query = if status.is_some() {
        format!(
            "SELECT {} FROM redemptions WHERE status = ?1 ORDER BY created_at DESC",
            REDEMPTION_COLUMNS
        )
    } else {
        format!(
            "SELECT {} FROM redemptions ORDER BY created_at DESC",
            REDEMPTION_COLUMNS
        )
    };

    let mut stmt = conn.prepare(&query)?;
    let redemption_iter = match status {
        Some(status) => stmt.query_map([status.as_str()], redemption_from_row)?,
        None => stmt.query_map([], redemption_from_row)?,
    };

    let mut redemptions = Vec::new();
    for redemption in redemption_iter {
        redemptions.push(redemption?);
    }
    Ok(redemptions)
}

/// Moves a pending redemption to `status`; false when it is not pending.
pub fn update_redemption_status(
    conn: &Connection,
    redemption_id: i64,
    status: RedemptionStatus,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE redemptions SET status = ?1, updated_at = ?2
         WHERE id = ?3 AND status = 'pending'",
        (status.as_str(), now_rfc3339(), redemption_id),
    )?;
    Ok(changed > 0)
}

pub fn delete_redemption(conn: &Connection, redemption_id: i64) -> Result<bool> {
    let changed = conn.execute("DELETE FROM redemptions WHERE id = ?1", [redemption_id])?;
    Ok(changed > 0)
}

// Payment ledger

#[derive(Debug, Clone, Copy)]
pub struct NewPayment<'a> {
    pub user_id: &'a str,
    pub amount: i64,
    pub number_phone: &'a str,
    pub status: PaymentStatus,
    pub transaction_id: Option<&'a str>,
    pub message: &'a str,
    pub credits_awarded: i64,
}

pub fn save_payment(conn: &Connection, payment: &NewPayment<'_>) -> Result<PaymentTransaction> {
    let created_at = now_rfc3339();
    conn.execute(
        "INSERT INTO transactions (
            user_id, amount, number_phone, status, transaction_id, message,
            credits_awarded, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        (
            payment.user_id,
            payment.amount,
            payment.number_phone,
            payment.status.as_str(),
            payment.transaction_id,
            payment.message,
            payment.credits_awarded,
            &created_at,
        ),
    )?;

    Ok(PaymentTransaction {
        id: conn.last_insert_rowid(),
        user_id: payment.user_id.to_string(),
        amount: payment.amount,
        number_phone: payment.number_phone.to_string(),
        status: payment.status,
        transaction_id: payment.transaction_id.map(str::to_string),
        message: payment.message.to_string(),
        credits_awarded: payment.credits_awarded,
        created_at,
    })
}

pub fn get_payments_for_user(
    conn: &Connection,
    user_id: &str,
    limit: i64,
) -> Result<Vec<PaymentTransaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, amount, number_phone, status, transaction_id, message,
                credits_awarded, created_at
         FROM transactions WHERE user_id = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;
    let payment_iter = stmt.query_map((user_id, limit), |row| {
        let status: String = row.get(4)?;
        Ok(PaymentTransaction {
            id: row.get(0)?,
            user_id: row.get(1)?,
            amount: row.get(2)?,
            number_phone: row.get(3)?,
            status: PaymentStatus::parse(&status)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?,
            transaction_id: row.get(5)?,
            message: row.get(6)?,
            credits_awarded: row.get(7)?,
            created_at: row.get(8)?,
        })
    })?;

    let mut payments = Vec::new();
    for payment in payment_iter {
        payments.push(payment?);
    }
    Ok(payments)
}

// Statistics

pub fn get_spin_statistics(conn: &Connection) -> Result<SpinStatistics> {
    let (total_spins, total_wins, credits_spent): (i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(is_winner), 0), COALESCE(SUM(credits_spent), 0) FROM spins",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let (revenue, settled_payments): (i64, i64) = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0), COUNT(*) FROM transactions WHERE status != ?1",
        [PaymentStatus::Failed.as_str()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let count_payments = |status: PaymentStatus| -> Result<i64> {
        conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE status = ?1",
            [status.as_str()],
            |row| row.get(0),
        )
    };

    let mut stmt = conn.prepare(
        "SELECT prize_id, prize_name, COUNT(*) AS wins
         FROM won_prizes
         GROUP BY prize_id, prize_name
         ORDER BY wins DESC, prize_name",
    )?;
    let win_iter = stmt.query_map([], |row| {
        Ok(PrizeWinCount {
            prize_id: row.get(0)?,
            prize_name: row.get(1)?,
            wins: row.get(2)?,
        })
    })?;
    let mut wins_by_prize = Vec::new();
    for win in win_iter {
        wins_by_prize.push(win?);
    }

    let count_status = |status: RedemptionStatus| -> Result<i64> {
        conn.query_row(
            "SELECT COUNT(*) FROM redemptions WHERE status = ?1",
            [status.as_str()],
            |row| row.get(0),
        )
    };

    Ok(SpinStatistics {
        total_spins,
        total_wins,
        credits_spent,
        wins_by_prize,
        pending_redemptions: count_status(RedemptionStatus::Pending)?,
        successful_redemptions: count_status(RedemptionStatus::Success)?,
        rejected_redemptions: count_status(RedemptionStatus::Rejected)?,
        revenue,
        settled_payments,
        failed_payments: count_payments(PaymentStatus::Failed)?,
        uncredited_payments: count_payments(PaymentStatus::Uncredited)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_database_with_connection(&conn).unwrap();
        conn
    }

    fn user(id: &str, credits: i64) -> UserAccount {
        UserAccount {
            id: id.to_string(),
            display_name: format!("User {}", id),
            phone: "+258840000000".to_string(),
            credits,
        }
    }

    #[test]
    fn settings_are_seeded_and_overridable() {
        let conn = memory_db();
        assert_eq!(get_spin_cost(&conn).unwrap(), DEFAULT_SPIN_COST);
        assert_eq!(get_credits_per_purchase(&conn).unwrap(), DEFAULT_CREDITS_PER_PURCHASE);

        set_setting(&conn, SPIN_COST_KEY, 25).unwrap();
        assert_eq!(get_spin_cost(&conn).unwrap(), 25);

        // Re-running the schema keeps admin changes.
        create_database_with_connection(&conn).unwrap();
        assert_eq!(get_spin_cost(&conn).unwrap(), 25);
    }

    #[test]
    fn prizes_keep_insertion_order_and_default_weight() {
        let conn = memory_db();
        upsert_prize(&conn, &PrizeOption::new("b", "Netflix", 20.0)).unwrap();
        upsert_prize(&conn, &PrizeOption::new("a", "Xbox", 5.0)).unwrap();
        conn.execute(
            "INSERT INTO roulette_prizes (id, name, image, probability) VALUES ('c', 'Recarga', '', NULL)",
            [],
        )
        .unwrap();

        upsert_prize(&conn, &PrizeOption::new("b", "Netflix 4K", 30.0)).unwrap();

        let prizes = get_all_prizes(&conn).unwrap();
        let ids: Vec<&str> = prizes.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(prizes[0].display_name, "Netflix 4K");
        assert_eq!(prizes[0].weight, 30.0);
        assert_eq!(prizes[2].weight, DEFAULT_PRIZE_WEIGHT);

        assert!(delete_prize(&conn, "a").unwrap());
        assert!(!delete_prize(&conn, "a").unwrap());
        assert_eq!(get_all_prizes(&conn).unwrap().len(), 2);
    }

    #[test]
    fn debit_never_overdraws() {
        let conn = memory_db();
        create_user(&conn, &user("u1", 15)).unwrap();

        assert!(debit_credits(&conn, "u1", 10).unwrap());
        assert!(!debit_credits(&conn, "u1", 10).unwrap());
        assert_eq!(get_user(&conn, "u1").unwrap().unwrap().credits, 5);

        assert!(!debit_credits(&conn, "missing", 1).unwrap());
        assert!(adjust_credits(&conn, "u1", 20).unwrap());
        assert!(!adjust_credits(&conn, "u1", -26).unwrap());
        assert_eq!(get_user(&conn, "u1").unwrap().unwrap().credits, 25);
    }

    #[test]
    fn ticket_claim_flips_once() {
        let conn = memory_db();
        let ticket = WonPrizeTicket {
            ticket_id: "PRIZE-ABC-123".to_string(),
            prize_id: "a".to_string(),
            prize_name: "Spotify".to_string(),
            prize_image: String::new(),
            owner_id: "u1".to_string(),
            owner_display_name: "User u1".to_string(),
            claimed: false,
            redemption_id: None,
            issued_at: now_rfc3339(),
        };
        save_won_prize(&conn, &ticket).unwrap();
        assert_eq!(get_won_prize(&conn, "PRIZE-ABC-123").unwrap(), Some(ticket));

        assert!(mark_ticket_claimed(&conn, "PRIZE-ABC-123", 7).unwrap());
        assert!(!mark_ticket_claimed(&conn, "PRIZE-ABC-123", 8).unwrap());

        let stored = get_won_prize(&conn, "PRIZE-ABC-123").unwrap().unwrap();
        assert!(stored.claimed);
        assert_eq!(stored.redemption_id, Some(7));
        assert_eq!(get_won_prizes_for_user(&conn, "u1").unwrap().len(), 1);
    }

    #[test]
    fn redemption_status_moves_only_from_pending() {
        let conn = memory_db();
        let ticket = WonPrizeTicket {
            ticket_id: "PRIZE-X-1".to_string(),
            prize_id: "p".to_string(),
            prize_name: "Fone".to_string(),
            prize_image: String::new(),
            owner_id: "u1".to_string(),
            owner_display_name: "User u1".to_string(),
            claimed: false,
            redemption_id: None,
            issued_at: now_rfc3339(),
        };
        let mut form = BTreeMap::new();
        form.insert("email".to_string(), "a@b.c".to_string());
        let id = save_redemption(
            &conn,
            &NewRedemption {
                ticket: &ticket,
                user_name: "User u1",
                user_phone: "",
                form_type: FormCategory::GiftCard,
                form_data: &form,
            },
        )
        .unwrap();

        let stored = get_redemption(&conn, id).unwrap().unwrap();
        assert_eq!(stored.status, RedemptionStatus::Pending);
        assert_eq!(stored.form_type, FormCategory::GiftCard);
        assert_eq!(stored.form_data, form);
        assert!(stored.updated_at.is_none());

        assert!(update_redemption_status(&conn, id, RedemptionStatus::Success).unwrap());
        assert!(!update_redemption_status(&conn, id, RedemptionStatus::Rejected).unwrap());

        assert!(get_redemptions_by_status(&conn, Some(RedemptionStatus::Pending))
            .unwrap()
            .is_empty());
        assert_eq!(get_redemptions_by_status(&conn, None).unwrap().len(), 1);
        assert!(delete_redemption(&conn, id).unwrap());
        assert!(get_redemption(&conn, id).unwrap().is_none());
    }

    #[test]
    fn payment_ledger_feeds_statistics() {
        let conn = memory_db();
        let attempt = NewPayment {
            user_id: "u1",
            amount: 150,
            number_phone: "841234567",
            status: PaymentStatus::Success,
            transaction_id: Some("tx-1"),
            message: "Transferência realizada",
            credits_awarded: 10,
        };
        save_payment(&conn, &attempt).unwrap();
        save_payment(
            &conn,
            &NewPayment {
                status: PaymentStatus::Failed,
                transaction_id: None,
                message: "Saldo insuficiente",
                credits_awarded: 0,
                ..attempt
            },
        )
        .unwrap();
        save_payment(
            &conn,
            &NewPayment {
                amount: 50,
                status: PaymentStatus::Uncredited,
                transaction_id: Some("tx-3"),
                credits_awarded: 0,
                ..attempt
            },
        )
        .unwrap();

        let history = get_payments_for_user(&conn, "u1", 10).unwrap();
        let statuses: Vec<PaymentStatus> = history.iter().map(|p| p.status).collect();
        assert_eq!(
            statuses,
            vec![PaymentStatus::Uncredited, PaymentStatus::Failed, PaymentStatus::Success]
        );
        assert_eq!(history[2].transaction_id.as_deref(), Some("tx-1"));
        assert_eq!(get_payments_for_user(&conn, "u1", 1).unwrap().len(), 1);
        assert!(get_payments_for_user(&conn, "u2", 10).unwrap().is_empty());

        let stats = get_spin_statistics(&conn).unwrap();
        assert_eq!(stats.revenue, 200);
        assert_eq!(stats.settled_payments, 2);
        assert_eq!(stats.failed_payments, 1);
        assert_eq!(stats.uncredited_payments, 1);
    }
}
