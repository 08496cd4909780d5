use rusqlite::Connection;
use std::collections::HashMap;
use std::error::Error;

use prize_wheel::database::{create_user, get_all_prizes, get_user, upsert_prize};
use prize_wheel::{PrizeOption, SpinError, SpinService, UserAccount, classify};

pub const DEMO_USER_ID: &str = "demo-user";

pub fn seed_demo_data(conn: &Connection) -> Result<(), Box<dyn Error>> {
    if get_all_prizes(conn)?.is_empty() {
        let prizes = [
            ("netflix", "Netflix Premium 1 mês", 5.0),
            ("psn", "PlayStation Gift Card 25$", 5.0),
            ("recarga", "Recarga M-Pesa 100MT", 30.0),
            ("fone", "Fone Bluetooth", 10.0),
            ("camiseta", "Camiseta da loja", 50.0),
        ];
        for (id, name, weight) in prizes {
            upsert_prize(conn, &PrizeOption::new(id, name, weight))?;
        }
        println!("🎡 Seeded {} demo prizes", prizes.len());
    }

    if get_user(conn, DEMO_USER_ID)?.is_none() {
        create_user(
            conn,
            &UserAccount {
                id: DEMO_USER_ID.to_string(),
                display_name: "Cliente Demo".to_string(),
                phone: "+258840000000".to_string(),
                credits: 100,
            },
        )?;
        println!("👤 Created demo user with 100 credits");
    }
    Ok(())
}

pub fn demonstrate_spins(service: &SpinService, spins: usize) -> Result<(), Box<dyn Error>> {
    println!("\n🎰 Spinning the wheel {} times...\n", spins);

    let mut won = Vec::new();
    for i in 1..=spins {
        match service.spin(DEMO_USER_ID) {
            Ok(receipt) => {
                let names: Vec<&str> = receipt
                    .outcome
                    .reels
                    .iter()
                    .map(|r| r.display_name.as_str())
                    .collect();
                println!(
                    "   {}. [{}] | balance: {}",
                    i,
                    names.join(" | "),
                    receipt.balance
                );
                if let Some(ticket) = receipt.ticket {
                    println!("      🏆 Winner! Ticket {}", ticket.ticket_id);
                    won.push(ticket);
                }
            }
            Err(SpinError::InsufficientBalance { required, available }) => {
                println!(
                    "   ⚠ Not enough credits: {} required, {} available",
                    required, available
                );
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if won.is_empty() {
        println!("\n😢 No prizes won this time.");
        return Ok(());
    }

    println!("\n📝 Redeeming won prizes:");
    for ticket in won {
        let category = classify(&ticket.prize_name);
        let form: HashMap<String, String> = prize_wheel::form_fields(category)
            .fields
            .iter()
            .map(|f| (f.name.to_string(), f.placeholder.to_string()))
            .collect();
        match service.redeem_ticket(DEMO_USER_ID, &ticket.ticket_id, &form) {
            Ok(redemption) => println!(
                "   ✓ {} → {} form, request #{} ({})",
                ticket.prize_name,
                category.as_str(),
                redemption.id,
                redemption.status
            ),
            Err(e) => println!("   ✗ {}: {}", ticket.ticket_id, e),
        }
    }
    Ok(())
}
