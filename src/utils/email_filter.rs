use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures::StreamExt;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::RwLock;

/// Expected capacity and false-positive rate.
/// Tune these based on real head count.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

static EMAIL_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

/// Key under which an email is tracked by the filter and the cache.
/// Matches how accounts store it: trimmed and lowercased.
#[inline]
pub fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Check if an email might be registered (false positives possible).
/// A poisoned lock answers "maybe" so callers fall through to the database.
pub fn might_exist(email: &str) -> bool {
    let email = normalize(email);
    match EMAIL_FILTER.read() {
        Ok(filter) => filter.contains(&email),
        Err(_) => true,
    }
}

/// Insert a single email into the filter
pub fn insert(email: &str) {
    let email = normalize(email);
    if let Ok(mut filter) = EMAIL_FILTER.write() {
        filter.add(&email);
    }
}

/// Remove an email from the filter, e.g. after the account is deleted
pub fn remove(email: &str) {
    let email = normalize(email);
    if let Ok(mut filter) = EMAIL_FILTER.write() {
        filter.remove(&email);
    }
}

/// Warm up the email filter using streaming + batching
pub async fn warmup_email_filter(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String,)>("SELECT email FROM users").fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (email,) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;

        // stored addresses are already normalized; legacy rows may not be
        batch.push(normalize(&email));
        total += 1;

        if batch.len() == batch_size {
            insert_batch(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_batch(&batch);
    }

    log::info!("Email filter warmup complete: {} accounts", total);
    Ok(())
}

/// Insert a batch of normalized emails
fn insert_batch(emails: &[String]) {
    if let Ok(mut filter) = EMAIL_FILTER.write() {
        for email in emails {
            filter.add(email);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_emails_are_found_case_insensitively() {
        insert("Filter.Test@Example.com");
        assert!(might_exist("filter.test@example.com"));
        assert!(might_exist("  FILTER.TEST@EXAMPLE.COM"));
    }

    #[test]
    fn removed_emails_are_gone() {
        insert("gone@example.com");
        remove("gone@example.com");
        assert!(!might_exist("gone@example.com"));
    }
}
