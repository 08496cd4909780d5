use chrono::{SecondsFormat, Utc};
use rand::Rng;
use std::error::Error;
use std::fs;
use std::path::Path;

const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

pub fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(BASE36_DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

pub fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| BASE36_DIGITS[rng.gen_range(0..36)] as char)
        .collect()
}

pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn ensure_parent_dir(path: &str) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

pub fn list_generated_reports(report_dir: &str) -> Result<Vec<String>, Box<dyn Error>> {
    let mut reports = Vec::new();
    if !Path::new(report_dir).exists() {
        return Ok(reports);
    }
    for entry in fs::read_dir(report_dir)? {
        let entry = entry?;
        if let Some(filename) = entry.file_name().to_str() {
            if filename.ends_with(".html") {
                reports.push(filename.to_string());
            }
        }
    }
    reports.sort();
    Ok(reports)
}
