use anyhow::Result;
use futures_util::StreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

use super::email_filter::normalize;

/// Emails known to belong to an account. Only taken emails are stored,
/// keyed by their normalized form.
pub static EMAIL_CACHE: Lazy<Cache<String, bool>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(500_000)
        .time_to_live(Duration::from_secs(86400)) // 24h TTL
        .build()
});

/// Mark a single email as taken
pub async fn mark_taken(email: &str) {
    EMAIL_CACHE.insert(normalize(email), true).await;
}

/// Forget an email, e.g. after the account is deleted
pub async fn forget(email: &str) {
    EMAIL_CACHE.invalidate(&normalize(email)).await;
}

/// Check if email is taken
pub async fn is_taken(email: &str) -> bool {
    EMAIL_CACHE
        .get(&normalize(email))
        .await
        .unwrap_or(false)
}

/// Batch mark emails as taken
async fn batch_mark(emails: &[String]) {
    let futures: Vec<_> = emails
        .iter()
        .map(|e| EMAIL_CACHE.insert(normalize(e), true))
        .collect();

    futures::future::join_all(futures).await;
}

/// Preloads addresses of accounts created in the last `days` days.
pub async fn warmup_email_cache(pool: &MySqlPool, days: u32, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String,)>(
        r#"
        SELECT email
        FROM users
        WHERE created_at >= NOW() - INTERVAL ? DAY
        ORDER BY created_at DESC
        "#,
    )
    .bind(days)
    .fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total_count = 0usize;

    while let Some(row) = stream.next().await {
        let (email,) = row?;
        batch.push(email);
        total_count += 1;

        if batch.len() >= batch_size {
            batch_mark(&batch).await;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        batch_mark(&batch).await;
    }

    log::info!(
        "Email cache warmup complete: {} accounts created in the last {} days",
        total_count,
        days
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn marks_and_forgets() {
        mark_taken("Cache.Test@Example.com").await;
        assert!(is_taken("cache.test@example.com").await);

        forget("cache.test@example.com").await;
        assert!(!is_taken("cache.test@example.com").await);
    }

    #[actix_web::test]
    async fn surrounding_whitespace_is_ignored() {
        mark_taken("  padded@example.com ").await;
        assert!(is_taken("PADDED@example.com").await);
        assert!(is_taken(" padded@example.com").await);
    }
}
