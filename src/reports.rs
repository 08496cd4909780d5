use chrono::Local;
use rusqlite::Connection;
use std::error::Error;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::database::{get_all_prizes, get_spin_cost, get_spin_statistics};
use crate::draw::total_weight;

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn format_share(weight: f64, total: f64) -> String {
    if total > 0.0 {
        format!("{:.1}%", weight / total * 100.0)
    } else {
        "-".to_string()
    }
}

pub fn generate_html_report(conn: &Connection) -> Result<String, Box<dyn Error>> {
    let stats = get_spin_statistics(conn)?;
    let prizes = get_all_prizes(conn)?;
    let spin_cost = get_spin_cost(conn)?;
    let total = total_weight(&prizes).unwrap_or(0.0);
    let win_rate = if stats.total_spins > 0 {
        format!("{:.2}%", stats.total_wins as f64 / stats.total_spins as f64 * 100.0)
    } else {
        "-".to_string()
    };

    let mut html = String::new();
    html.push_str(&format!(
        r#"
<!DOCTYPE html>
<html lang="pt">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Relatório da Roleta</title>
    <style>
        body {{
            font-family: 'Segoe UI', Tahoma, Geneva, sans-serif;
            margin: 0;
            padding: 20px;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            min-height: 100vh;
        }}
        .container {{
            max-width: 1000px;
            margin: 0 auto;
            background: white;
            border-radius: 15px;
            box-shadow: 0 20px 40px rgba(0,0,0,0.1);
            overflow: hidden;
        }}
        .header {{
            background: linear-gradient(135deg, #ff6b6b, #feca57);
            color: white;
            padding: 30px;
            text-align: center;
        }}
        .content {{
            padding: 30px;
        }}
        .stats-grid {{
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(180px, 1fr));
            gap: 15px;
            margin-bottom: 30px;
        }}
        .stat-item {{
            background: #edf2f7;
            padding: 15px;
            border-radius: 8px;
            text-align: center;
        }}
        .stat-number {{
            font-size: 2em;
            font-weight: 700;
            color: #4834d4;
        }}
        .stat-label {{
            color: #718096;
            font-size: 0.9em;
        }}
        table {{
            width: 100%;
            border-collapse: collapse;
            margin-bottom: 30px;
        }}
        th, td {{
            padding: 10px;
            border-bottom: 1px solid #e2e8f0;
            text-align: left;
        }}
        th {{
            background: #4834d4;
            color: white;
        }}
        .footer {{
            background: #2d3748;
            color: white;
            padding: 20px;
            text-align: center;
            font-size: 0.9em;
        }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>🎰 Relatório da Roleta</h1>
            <div>Custo por giro: {} créditos</div>
        </div>
        <div class="content">
            <div class="stats-grid">
                <div class="stat-item"><div class="stat-number">{}</div><div class="stat-label">Giros</div></div>
                <div class="stat-item"><div class="stat-number">{}</div><div class="stat-label">Vitórias</div></div>
                <div class="stat-item"><div class="stat-number">{}</div><div class="stat-label">Taxa de vitória</div></div>
                <div class="stat-item"><div class="stat-number">{}</div><div class="stat-label">Créditos gastos</div></div>
            </div>
"#,
        spin_cost, stats.total_spins, stats.total_wins, win_rate, stats.credits_spent
    ));

    html.push_str(
        "            <h3>Prêmios configurados</h3>\n            <table>\n                <tr><th>Prêmio</th><th>Peso</th><th>Chance por giro</th><th>Vitórias</th></tr>\n",
    );
    for prize in &prizes {
        let wins = stats
            .wins_by_prize
            .iter()
            .find(|w| w.prize_id == prize.id)
            .map(|w| w.wins)
            .unwrap_or(0);
        html.push_str(&format!(
            "                <tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&prize.display_name),
            prize.weight,
            format_share(prize.weight, total),
            wins
        ));
    }
    html.push_str("            </table>\n");

    html.push_str(&format!(
        r#"
            <h3>Resgates</h3>
            <div class="stats-grid">
                <div class="stat-item"><div class="stat-number">{}</div><div class="stat-label">Pendentes</div></div>
                <div class="stat-item"><div class="stat-number">{}</div><div class="stat-label">Sucesso</div></div>
                <div class="stat-item"><div class="stat-number">{}</div><div class="stat-label">Rejeitados</div></div>
            </div>
            <h3>Pagamentos</h3>
            <div class="stats-grid">
                <div class="stat-item"><div class="stat-number">{} MT</div><div class="stat-label">Receita</div></div>
                <div class="stat-item"><div class="stat-number">{}</div><div class="stat-label">Transações concluídas</div></div>
                <div class="stat-item"><div class="stat-number">{}</div><div class="stat-label">Falhadas</div></div>
                <div class="stat-item"><div class="stat-number">{}</div><div class="stat-label">Sem créditos atribuídos</div></div>
            </div>
        </div>
        <div class="footer">
            <p>📅 Relatório gerado em: {}</p>
        </div>
    </div>
</body>
</html>
"#,
        stats.pending_redemptions,
        stats.successful_redemptions,
        stats.rejected_redemptions,
        stats.revenue,
        stats.settled_payments,
        stats.failed_payments,
        stats.uncredited_payments,
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));

    Ok(html)
}

pub fn save_html_report_to_path(
    html_content: &str,
    filename: &str,
    report_path: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let filepath = Path::new(report_path).join(filename);

    if let Some(parent) = filepath.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = File::create(&filepath)?;
    file.write_all(html_content.as_bytes())?;
    Ok(filepath)
}

pub fn generate_and_save_report(
    conn: &Connection,
    report_path: &str,
) -> Result<PathBuf, Box<dyn Error>> {
    let html_content = generate_html_report(conn)?;
    let filename = format!(
        "roulette_report_{}.html",
        Local::now().format("%Y%m%d_%H%M%S")
    );
    save_html_report_to_path(&html_content, &filename, report_path)
}
